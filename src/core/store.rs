use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::{
    core::indices::ChildIndex,
    operation::OperationRecord,
    types::{OperationId, OperationStatus},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    MissingOperation(OperationId),
}

/// Point-in-time copy of the store for readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub main_ids: Vec<OperationId>,
    /// Flat records ordered by id, children detached.
    pub records: Vec<OperationRecord>,
}

impl StoreSnapshot {
    pub fn get(&self, id: OperationId) -> Option<&OperationRecord> {
        self.records
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|idx| &self.records[idx])
    }
}

/// What happened to one record during [`OperationStore::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    Inserted(OperationId),
    Updated(OperationId),
    /// A non-terminal update for a finished record was dropped.
    RegressionIgnored(OperationId),
}

/// Flat id -> record map mirroring the backend's operation trees.
///
/// Records are stored with `subquests` detached; the tree shape lives in the
/// child index so any subtree can be rebuilt or removed.
#[derive(Debug, Default)]
pub struct OperationStore {
    records: HashMap<OperationId, OperationRecord>,
    children: ChildIndex,
    parent: HashMap<OperationId, OperationId>,
    main_ids: Vec<OperationId>,
}

impl OperationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flattens `record` and its descendants into the store.
    ///
    /// Entries not mentioned by `record` are left alone. Returns one entry
    /// per record that changed, children before parents.
    pub fn register(&mut self, record: OperationRecord) -> Vec<Registered> {
        let mut out = Vec::new();
        self.register_into(record, None, &mut out);
        out
    }

    /// Replaces the list of top-level ids. Returns true when it changed.
    pub fn set_main_ids(&mut self, ids: Vec<OperationId>) -> bool {
        if self.main_ids == ids {
            return false;
        }
        self.main_ids = ids;
        true
    }

    pub fn main_ids(&self) -> &[OperationId] {
        &self.main_ids
    }

    pub fn is_main(&self, id: OperationId) -> bool {
        self.main_ids.contains(&id)
    }

    pub fn get(&self, id: OperationId) -> Option<&OperationRecord> {
        self.records.get(&id)
    }

    pub fn get_cloned(&self, id: OperationId) -> Option<OperationRecord> {
        self.get(id).cloned()
    }

    pub fn status(&self, id: OperationId) -> Option<OperationStatus> {
        self.get(id).map(|r| r.status)
    }

    pub fn children(&self, id: OperationId) -> &[OperationId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parent(&self, id: OperationId) -> Option<OperationId> {
        self.parent.get(&id).copied()
    }

    /// Rebuilds the record for `id` with its current descendants attached.
    pub fn tree(&self, id: OperationId) -> Option<OperationRecord> {
        let mut rec = self.get_cloned(id)?;
        rec.subquests = self
            .children(id)
            .iter()
            .filter_map(|child| self.tree(*child))
            .collect();
        Some(rec)
    }

    /// Top-level ids whose stored record is terminal, in list order.
    pub fn finished_main_ids(&self) -> Vec<OperationId> {
        self.main_ids
            .iter()
            .copied()
            .filter(|id| self.status(*id).is_some_and(OperationStatus::is_terminal))
            .collect()
    }

    /// Drops `id` and every descendant. Returns the removed ids.
    pub fn remove_tree(&mut self, id: OperationId) -> Result<Vec<OperationId>, StoreError> {
        if !self.records.contains_key(&id) {
            return Err(StoreError::MissingOperation(id));
        }

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(kids) = self.children.remove(&next) {
                stack.extend(kids);
            }
            self.parent.remove(&next);
            if self.records.remove(&next).is_some() {
                removed.push(next);
            }
        }

        self.main_ids.retain(|main| *main != id);
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let mut records: Vec<OperationRecord> = self.records.values().cloned().collect();
        records.sort_by_key(|r| r.id);
        StoreSnapshot {
            main_ids: self.main_ids.clone(),
            records,
        }
    }

    fn register_into(
        &mut self,
        mut record: OperationRecord,
        parent: Option<OperationId>,
        out: &mut Vec<Registered>,
    ) {
        let id = record.id;
        let subquests = std::mem::take(&mut record.subquests);
        let child_ids: Vec<OperationId> = subquests.iter().map(|c| c.id).collect();
        for child in subquests {
            self.register_into(child, Some(id), out);
        }
        if let Some(previous) = self.children.get(&id) {
            for stale in previous.iter().filter(|c| !child_ids.contains(c)) {
                if self.parent.get(stale) == Some(&id) {
                    self.parent.remove(stale);
                }
            }
        }
        self.children.insert(id, child_ids);
        if let Some(parent) = parent {
            self.parent.insert(id, parent);
        }

        match self.records.get(&id) {
            Some(existing) if existing.is_terminal() && !record.is_terminal() => {
                tracing::warn!(
                    operation_id = id,
                    stored = %existing.status,
                    incoming = %record.status,
                    "ignoring status regression of finished operation"
                );
                out.push(Registered::RegressionIgnored(id));
            }
            Some(existing) if *existing == record => {}
            Some(_) => {
                self.records.insert(id, record);
                out.push(Registered::Updated(id));
            }
            None => {
                self.records.insert(id, record);
                out.push(Registered::Inserted(id));
            }
        }
    }
}
