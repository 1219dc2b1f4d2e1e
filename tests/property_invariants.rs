use std::collections::HashMap;

use proptest::prelude::*;

use questlog::{
    core::store::OperationStore,
    operation::OperationRecord,
    types::{OperationId, OperationStatus},
};

const STATUSES: [OperationStatus; 8] = [
    OperationStatus::Pending,
    OperationStatus::Running,
    OperationStatus::Failing,
    OperationStatus::Successful,
    OperationStatus::Failed,
    OperationStatus::Cancelled,
    OperationStatus::Skipped,
    OperationStatus::Unknown,
];

/// A top-level id in `0..8` owning up to three children. Child ids are
/// derived from the parent so trees never share nodes.
#[derive(Debug, Clone)]
struct Report {
    root: u8,
    status: u8,
    children: Vec<u8>,
}

fn report_strategy() -> impl Strategy<Value = Report> {
    (0u8..8, 0u8..8, prop::collection::vec(0u8..8, 0..3))
        .prop_map(|(root, status, children)| Report { root, status, children })
}

fn build(report: &Report) -> OperationRecord {
    let root = OperationId::from(report.root) * 10;
    let mut rec = OperationRecord::new(root, STATUSES[usize::from(report.status)], "root");
    for (idx, status) in report.children.iter().enumerate() {
        rec = rec.with_subquest(OperationRecord::new(
            root + idx as u64 + 1,
            STATUSES[usize::from(*status)],
            "child",
        ));
    }
    rec
}

proptest! {
    #[test]
    fn stored_records_are_flat_and_linked(reports in prop::collection::vec(report_strategy(), 1..40)) {
        let mut store = OperationStore::new();
        for report in &reports {
            store.register(build(report));
        }

        let snap = store.snapshot();
        for rec in &snap.records {
            prop_assert!(rec.subquests.is_empty());
            for child in store.children(rec.id) {
                prop_assert_eq!(store.parent(*child), Some(rec.id));
            }
            if let Some(parent) = store.parent(rec.id) {
                prop_assert!(store.children(parent).contains(&rec.id));
            }
        }
    }

    #[test]
    fn terminal_status_never_regresses(reports in prop::collection::vec(report_strategy(), 1..60)) {
        let mut store = OperationStore::new();
        let mut seen_terminal: HashMap<OperationId, bool> = HashMap::new();

        for report in &reports {
            store.register(build(report));
            for rec in store.snapshot().records {
                let was = seen_terminal.entry(rec.id).or_insert(false);
                prop_assert!(!(*was && !rec.is_terminal()), "operation {} regressed", rec.id);
                *was |= rec.is_terminal();
            }
        }
    }

    #[test]
    fn latest_report_of_an_open_tree_wins(report in report_strategy()) {
        let mut store = OperationStore::new();
        let tree = build(&report);
        store.register(tree.clone());
        prop_assert_eq!(store.tree(tree.id), Some(tree));
    }

    #[test]
    fn main_ids_track_the_last_listing(lists in prop::collection::vec(prop::collection::vec(0u64..20, 0..10), 1..10)) {
        let mut store = OperationStore::new();
        for list in &lists {
            for id in list {
                store.register(OperationRecord::new(*id, OperationStatus::Running, "op"));
            }
            store.set_main_ids(list.clone());
            prop_assert_eq!(store.main_ids(), list.as_slice());
        }
    }
}
