use questlog::{
    core::store::{OperationStore, Registered, StoreError},
    operation::OperationRecord,
    types::OperationStatus,
};

fn op(id: u64, status: OperationStatus) -> OperationRecord {
    OperationRecord::new(id, status, format!("operation {id}"))
}

fn install_tree(status: OperationStatus) -> OperationRecord {
    op(1, status)
        .with_subquest(op(2, OperationStatus::Successful))
        .with_subquest(op(3, OperationStatus::Running).with_subquest(op(4, OperationStatus::Pending)))
}

#[test]
fn register_flattens_every_descendant() {
    let mut store = OperationStore::new();
    let changes = store.register(install_tree(OperationStatus::Running));

    assert_eq!(store.len(), 4);
    assert_eq!(store.children(1), &[2, 3]);
    assert_eq!(store.children(3), &[4]);
    assert_eq!(store.parent(4), Some(3));
    assert_eq!(store.parent(1), None);
    assert!(store.get(1).unwrap().subquests.is_empty());
    // children are registered before their parent
    assert_eq!(changes.last(), Some(&Registered::Inserted(1)));
    assert_eq!(changes.len(), 4);
}

#[test]
fn tree_rebuilds_the_reported_shape() {
    let mut store = OperationStore::new();
    let tree = install_tree(OperationStatus::Running);
    store.register(tree.clone());

    assert_eq!(store.tree(1), Some(tree));
    assert_eq!(store.tree(99), None);
}

#[test]
fn unchanged_records_report_nothing() {
    let mut store = OperationStore::new();
    store.register(install_tree(OperationStatus::Running));
    assert!(store.register(install_tree(OperationStatus::Running)).is_empty());

    let changes = store.register(op(3, OperationStatus::Successful).with_subquest(op(4, OperationStatus::Successful)));
    assert_eq!(changes, vec![Registered::Updated(4), Registered::Updated(3)]);
    assert_eq!(store.status(3), Some(OperationStatus::Successful));
    // untouched entries survive a partial update
    assert_eq!(store.status(2), Some(OperationStatus::Successful));
}

#[test]
fn finished_records_do_not_regress() {
    let mut store = OperationStore::new();
    store.register(op(7, OperationStatus::Failed));

    let changes = store.register(op(7, OperationStatus::Running));
    assert_eq!(changes, vec![Registered::RegressionIgnored(7)]);
    assert_eq!(store.status(7), Some(OperationStatus::Failed));

    // terminal to terminal is accepted
    store.register(op(7, OperationStatus::Cancelled));
    assert_eq!(store.status(7), Some(OperationStatus::Cancelled));
}

#[test]
fn main_ids_and_finished_selection() {
    let mut store = OperationStore::new();
    store.register(install_tree(OperationStatus::Successful));
    store.register(op(10, OperationStatus::Running));
    store.register(op(11, OperationStatus::Unknown));

    assert!(store.set_main_ids(vec![1, 10, 11]));
    assert!(!store.set_main_ids(vec![1, 10, 11]));
    assert!(store.is_main(10));
    assert!(!store.is_main(2));
    assert_eq!(store.finished_main_ids(), vec![1, 11]);
}

#[test]
fn remove_tree_drops_descendants_and_main_entry() {
    let mut store = OperationStore::new();
    store.register(install_tree(OperationStatus::Successful));
    store.register(op(10, OperationStatus::Running));
    store.set_main_ids(vec![1, 10]);

    let mut removed = store.remove_tree(1).unwrap();
    removed.sort_unstable();
    assert_eq!(removed, vec![1, 2, 3, 4]);
    assert_eq!(store.len(), 1);
    assert_eq!(store.main_ids(), &[10]);
    assert_eq!(store.parent(4), None);
    assert_eq!(store.remove_tree(1), Err(StoreError::MissingOperation(1)));
}

#[test]
fn snapshot_is_sorted_and_searchable() {
    let mut store = OperationStore::new();
    store.register(op(5, OperationStatus::Running));
    store.register(install_tree(OperationStatus::Running));
    store.set_main_ids(vec![5, 1]);

    let snap = store.snapshot();
    let ids: Vec<u64> = snap.records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(snap.main_ids, vec![5, 1]);
    assert_eq!(snap.get(4).map(|r| r.status), Some(OperationStatus::Pending));
    assert!(snap.get(6).is_none());
}
