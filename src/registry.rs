//! Dialog registry: the client's view of known dialog nodes.
//!
//! Roots arrive from full-list fetches, subdialogs from lazy hierarchy
//! fetches and creation events. Every merge is keyed by dialog address and
//! idempotent, so overlapping fetches for the same root cannot corrupt the
//! map. Status and task doc are root-owned; loaded subdialogs are re-stamped
//! whenever their root changes.

use std::collections::BTreeMap;

use crate::error::SyncError;
use crate::model::{DialogId, DialogNode, DialogRef, DialogStatus, RunState};

/// Whether a merge altered registry state. Unchanged merges signal nothing downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Changed,
    Unchanged,
}

impl MergeOutcome {
    pub fn changed(self) -> bool {
        matches!(self, MergeOutcome::Changed)
    }

    pub fn or(self, other: MergeOutcome) -> MergeOutcome {
        if self.changed() || other.changed() {
            MergeOutcome::Changed
        } else {
            MergeOutcome::Unchanged
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DialogRegistry {
    nodes: BTreeMap<DialogRef, DialogNode>,
    revision: u64,
}

fn stamp_from_root(node: &mut DialogNode, root: &DialogNode) {
    node.status = root.status;
    node.task_doc_path = root.task_doc_path.clone();
}

impl DialogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped on every state-changing merge.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, dialog: &DialogRef) -> Option<&DialogNode> {
        self.nodes.get(dialog)
    }

    pub fn contains(&self, dialog: &DialogRef) -> bool {
        self.nodes.contains_key(dialog)
    }

    pub fn root(&self, root_id: &DialogId) -> Option<&DialogNode> {
        self.nodes.get(&DialogRef::root(root_id.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DialogNode> {
        self.nodes.values()
    }

    pub fn roots(&self) -> impl Iterator<Item = &DialogNode> {
        self.nodes.values().filter(|n| n.is_root())
    }

    pub fn subdialogs_of<'a>(&'a self, root_id: &'a DialogId) -> impl Iterator<Item = &'a DialogNode> {
        self.nodes
            .values()
            .filter(move |n| &n.root_id == root_id && !n.is_root())
    }

    fn commit(&mut self, next: BTreeMap<DialogRef, DialogNode>) -> MergeOutcome {
        if next == self.nodes {
            return MergeOutcome::Unchanged;
        }
        self.nodes = next;
        self.revision += 1;
        MergeOutcome::Changed
    }

    /// Replace every root entry with a fresh full list.
    ///
    /// Subdialogs absent from `new_roots` survive when their root is still
    /// listed with a positive `subdialog_count`; they are re-stamped with the
    /// new root's status and task doc. Everything else not listed is dropped.
    pub fn replace_roots(&mut self, new_roots: Vec<DialogNode>) -> Result<MergeOutcome, SyncError> {
        for node in &new_roots {
            node.validate()?;
        }

        let mut next: BTreeMap<DialogRef, DialogNode> = new_roots
            .into_iter()
            .map(|node| (node.dialog_ref(), node))
            .collect();

        let carried: Vec<DialogNode> = self
            .nodes
            .iter()
            .filter(|(key, _)| !key.is_root() && !next.contains_key(*key))
            .filter_map(|(key, node)| {
                let root = next.get(&key.root_ref())?;
                if root.subdialog_count.unwrap_or(0) == 0 {
                    return None;
                }
                let mut node = node.clone();
                stamp_from_root(&mut node, root);
                Some(node)
            })
            .collect();

        for node in carried {
            next.insert(node.dialog_ref(), node);
        }

        Ok(self.commit(next))
    }

    /// Replace exactly the subdialog set under `root_id`.
    pub fn merge_subdialogs(
        &mut self,
        root_id: &DialogId,
        subdialogs: Vec<DialogNode>,
    ) -> Result<MergeOutcome, SyncError> {
        for node in &subdialogs {
            node.validate()?;
            if &node.root_id != root_id || node.is_root() {
                return Err(SyncError::ForeignSubdialog {
                    root_id: root_id.clone(),
                    dialog: node.dialog_ref(),
                });
            }
        }

        let mut next = self.nodes.clone();
        next.retain(|key, _| &key.root_id != root_id || key.is_root());

        let root = next.get(&DialogRef::root(root_id.clone())).cloned();
        for mut node in subdialogs {
            if let Some(ref root) = root {
                stamp_from_root(&mut node, root);
            }
            next.insert(node.dialog_ref(), node);
        }

        Ok(self.commit(next))
    }

    /// Update one node's run state. Unknown nodes are ignored: they may simply not be loaded.
    pub fn patch_run_state(&mut self, dialog: &DialogRef, run_state: RunState) -> MergeOutcome {
        match self.nodes.get_mut(dialog) {
            Some(node) if node.run_state.as_ref() != Some(&run_state) => {
                node.run_state = Some(run_state);
                self.revision += 1;
                MergeOutcome::Changed
            }
            _ => MergeOutcome::Unchanged,
        }
    }

    /// Advance one node's latest course. Never moves backwards; unknown nodes are ignored.
    pub fn patch_course(&mut self, dialog: &DialogRef, course: u32) -> MergeOutcome {
        match self.nodes.get_mut(dialog) {
            Some(node) if course > node.current_course => {
                node.current_course = course;
                self.revision += 1;
                MergeOutcome::Changed
            }
            _ => MergeOutcome::Unchanged,
        }
    }

    /// Effective status of a dialog, falling back to its root's bucket.
    pub fn resolve_status(&self, dialog: &DialogRef) -> Option<DialogStatus> {
        self.nodes
            .get(dialog)
            .or_else(|| self.nodes.get(&dialog.root_ref()))
            .map(|node| node.status)
    }

    /// Insert or refresh root entries without touching the rest of the list.
    pub fn upsert_roots(&mut self, roots: Vec<DialogNode>) -> Result<MergeOutcome, SyncError> {
        for node in &roots {
            node.validate()?;
            if !node.is_root() {
                return Err(SyncError::ForeignSubdialog {
                    root_id: node.root_id.clone(),
                    dialog: node.dialog_ref(),
                });
            }
        }

        let mut next = self.nodes.clone();
        for root in roots {
            for (key, node) in next.iter_mut() {
                if key.root_id == root.root_id && !key.is_root() {
                    stamp_from_root(node, &root);
                }
            }
            next.insert(root.dialog_ref(), root);
        }

        Ok(self.commit(next))
    }

    /// Add one subdialog announced by the stream.
    pub fn insert_subdialog(&mut self, mut node: DialogNode) -> Result<MergeOutcome, SyncError> {
        node.validate()?;
        if node.is_root() {
            return Err(SyncError::ForeignSubdialog {
                root_id: node.root_id.clone(),
                dialog: node.dialog_ref(),
            });
        }

        let mut next = self.nodes.clone();
        let key = node.dialog_ref();
        let is_new = !next.contains_key(&key);
        if let Some(root) = next.get_mut(&key.root_ref()) {
            stamp_from_root(&mut node, root);
            if is_new {
                root.subdialog_count = Some(root.subdialog_count.unwrap_or(0) + 1);
            }
        }
        next.insert(key, node);

        Ok(self.commit(next))
    }

    /// Move roots (and their loaded subdialogs) to a new status bucket.
    pub fn move_roots(&mut self, root_ids: &[DialogId], status: DialogStatus) -> MergeOutcome {
        let mut next = self.nodes.clone();
        for node in next.values_mut() {
            if root_ids.contains(&node.root_id) {
                node.status = status;
            }
        }
        self.commit(next)
    }

    /// Drop roots and everything loaded beneath them.
    pub fn remove_roots(&mut self, root_ids: &[DialogId]) -> MergeOutcome {
        let mut next = self.nodes.clone();
        next.retain(|key, _| !root_ids.contains(&key.root_id));
        self.commit(next)
    }

    /// Apply a lazy hierarchy fetch: the root in place, then its full subdialog set.
    pub fn apply_hierarchy(
        &mut self,
        root: DialogNode,
        subdialogs: Vec<DialogNode>,
    ) -> Result<MergeOutcome, SyncError> {
        let root_id = root.root_id.clone();
        // Check the subdialogs first so a bad payload leaves the root untouched.
        for node in &subdialogs {
            node.validate()?;
            if node.root_id != root_id || node.is_root() {
                return Err(SyncError::ForeignSubdialog {
                    root_id,
                    dialog: node.dialog_ref(),
                });
            }
        }
        let root_outcome = self.upsert_roots(vec![root])?;
        let sub_outcome = self.merge_subdialogs(&root_id, subdialogs)?;
        Ok(root_outcome.or(sub_outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(id: &str) -> DialogNode {
        DialogNode::root(id, "planner", "tasks/plan.tsk")
    }

    fn sub(root_id: &str, id: &str) -> DialogNode {
        DialogNode::subdialog(root_id, id, "coder", "tasks/sub.tsk")
    }

    #[test]
    fn new_registry_is_empty() {
        let registry = DialogRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.revision(), 0);
    }

    #[test]
    fn replace_roots_drops_subdialogs_of_roots_without_count() {
        let mut registry = DialogRegistry::new();
        registry.replace_roots(vec![root("r1")]).unwrap();
        registry.merge_subdialogs(&"r1".into(), vec![sub("r1", "s1")]).unwrap();

        registry.replace_roots(vec![root("r1").with_subdialog_count(0)]).unwrap();

        assert!(!registry.contains(&DialogRef::new("r1", "s1")));
    }

    #[test]
    fn replace_roots_drops_subdialogs_of_vanished_roots() {
        let mut registry = DialogRegistry::new();
        registry
            .replace_roots(vec![root("r1").with_subdialog_count(1)])
            .unwrap();
        registry.merge_subdialogs(&"r1".into(), vec![sub("r1", "s1")]).unwrap();

        registry.replace_roots(vec![root("r2")]).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.root(&"r2".into()).is_some());
    }

    #[test]
    fn patch_unknown_node_is_noop() {
        let mut registry = DialogRegistry::new();
        let outcome = registry.patch_run_state(&DialogRef::root("ghost"), RunState::Proceeding);
        assert_eq!(outcome, MergeOutcome::Unchanged);
        assert_eq!(registry.revision(), 0);
    }

    #[test]
    fn patch_same_run_state_twice_changes_once() {
        let mut registry = DialogRegistry::new();
        registry.replace_roots(vec![root("r1")]).unwrap();
        let key = DialogRef::root("r1");

        assert!(registry.patch_run_state(&key, RunState::Proceeding).changed());
        assert!(!registry.patch_run_state(&key, RunState::Proceeding).changed());
    }

    #[test]
    fn merge_subdialogs_rejects_foreign_nodes() {
        let mut registry = DialogRegistry::new();
        let err = registry
            .merge_subdialogs(&"r1".into(), vec![sub("r2", "s1")])
            .unwrap_err();
        assert!(matches!(err, SyncError::ForeignSubdialog { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn merge_subdialogs_stamps_root_status() {
        let mut registry = DialogRegistry::new();
        registry
            .replace_roots(vec![root("r1").with_status(DialogStatus::Archived)])
            .unwrap();
        registry.merge_subdialogs(&"r1".into(), vec![sub("r1", "s1")]).unwrap();

        let node = registry.get(&DialogRef::new("r1", "s1")).unwrap();
        assert_eq!(node.status, DialogStatus::Archived);
    }

    #[test]
    fn insert_subdialog_bumps_root_count_once() {
        let mut registry = DialogRegistry::new();
        registry.replace_roots(vec![root("r1")]).unwrap();
        let s1 = sub("r1", "s1");

        registry.insert_subdialog(s1.clone()).unwrap();
        let outcome = registry.insert_subdialog(s1).unwrap();

        assert_eq!(outcome, MergeOutcome::Unchanged);
        assert_eq!(registry.root(&"r1".into()).unwrap().subdialog_count, Some(1));
    }

    #[test]
    fn insert_root_as_subdialog_rejected() {
        let mut registry = DialogRegistry::new();
        assert!(registry.insert_subdialog(root("r1")).is_err());
    }

    #[test]
    fn move_roots_restamps_subdialogs() {
        let mut registry = DialogRegistry::new();
        registry.replace_roots(vec![root("r1")]).unwrap();
        registry.insert_subdialog(sub("r1", "s1")).unwrap();

        registry.move_roots(&["r1".into()], DialogStatus::Completed);

        assert_eq!(
            registry.resolve_status(&DialogRef::new("r1", "s1")),
            Some(DialogStatus::Completed)
        );
    }

    #[test]
    fn remove_roots_drops_whole_tree() {
        let mut registry = DialogRegistry::new();
        registry.replace_roots(vec![root("r1"), root("r2")]).unwrap();
        registry.insert_subdialog(sub("r1", "s1")).unwrap();

        registry.remove_roots(&["r1".into()]);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.subdialogs_of(&"r1".into()).count(), 0);
    }

    #[test]
    fn apply_hierarchy_reports_unchanged_on_repeat() {
        let mut registry = DialogRegistry::new();
        let (r1, s1) = (root("r1"), sub("r1", "s1"));
        let first = registry
            .apply_hierarchy(r1.clone(), vec![s1.clone()])
            .unwrap();
        let second = registry.apply_hierarchy(r1, vec![s1]).unwrap();

        assert!(first.changed());
        assert!(!second.changed());
    }
}
