//! Global set of pending questions-for-human.
//!
//! Incremental events and full snapshots merge by question id. A snapshot
//! only enumerates questions of running dialogs, so absence from it proves
//! deletion only when the owning dialog is known to be running.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::SyncError;
use crate::model::{DialogId, DialogRef, DialogStatus, Q4hQuestion, QuestionGroup, QuestionId};
use crate::registry::MergeOutcome;

#[derive(Debug, Clone, Default)]
pub struct Q4hReconciler {
    questions: Vec<Q4hQuestion>,
    revision: u64,
    snapshot_generation: u64,
}

impl Q4hReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of snapshots applied so far.
    pub fn snapshot_generation(&self) -> u64 {
        self.snapshot_generation
    }

    pub fn held(&self) -> &[Q4hQuestion] {
        &self.questions
    }

    pub fn held_len(&self) -> usize {
        self.questions.len()
    }

    pub fn get(&self, id: &QuestionId) -> Option<&Q4hQuestion> {
        self.questions.iter().find(|q| &q.id == id)
    }

    /// A question id is never reused; a repeat is an upstream bug.
    pub fn apply_asked(&mut self, question: Q4hQuestion) -> Result<(), SyncError> {
        if self.get(&question.id).is_some() {
            return Err(SyncError::DuplicateQuestion { id: question.id });
        }
        self.questions.push(question);
        self.revision += 1;
        Ok(())
    }

    /// Returns whether anything was removed. A missing id is not an error.
    pub fn apply_answered(&mut self, id: &QuestionId) -> bool {
        let before = self.questions.len();
        self.questions.retain(|q| &q.id != id);
        let removed = self.questions.len() != before;
        if removed {
            self.revision += 1;
        }
        removed
    }

    /// Three-way merge of an authoritative snapshot into the held set.
    ///
    /// `status_of` resolves a dialog's status bucket; `None` means unknown and
    /// always keeps the question.
    pub fn apply_snapshot<F>(
        &mut self,
        incoming: Vec<Q4hQuestion>,
        status_of: F,
    ) -> Result<MergeOutcome, SyncError>
    where
        F: Fn(&DialogRef) -> Option<DialogStatus>,
    {
        let mut incoming_by_id: BTreeMap<QuestionId, Q4hQuestion> = BTreeMap::new();
        let mut incoming_order: Vec<QuestionId> = Vec::with_capacity(incoming.len());
        for question in incoming {
            let id = question.id.clone();
            if incoming_by_id.insert(id.clone(), question).is_some() {
                return Err(SyncError::DuplicateInSnapshot { id });
            }
            incoming_order.push(id);
        }

        let mut merged: Vec<Q4hQuestion> = Vec::with_capacity(self.questions.len() + incoming_order.len());
        for held in &self.questions {
            if let Some(fresh) = incoming_by_id.remove(&held.id) {
                merged.push(fresh);
                continue;
            }
            let proven_gone = status_of(&held.dialog()) == Some(DialogStatus::Running);
            if !proven_gone {
                merged.push(held.clone());
            }
        }
        for id in incoming_order {
            if let Some(question) = incoming_by_id.remove(&id) {
                merged.push(question);
            }
        }

        let mut seen = BTreeSet::new();
        for question in &merged {
            if !seen.insert(&question.id) {
                return Err(SyncError::DuplicateAfterMerge {
                    id: question.id.clone(),
                });
            }
        }

        self.snapshot_generation += 1;
        if merged == self.questions {
            return Ok(MergeOutcome::Unchanged);
        }
        self.questions = merged;
        self.revision += 1;
        Ok(MergeOutcome::Changed)
    }

    /// Drop every question owned by the given roots.
    pub fn drop_for_roots(&mut self, root_ids: &[DialogId]) -> bool {
        let before = self.questions.len();
        self.questions.retain(|q| !root_ids.contains(&q.root_id));
        let removed = self.questions.len() != before;
        if removed {
            self.revision += 1;
        }
        removed
    }

    /// Questions whose dialog is not completed or archived. Does not mutate the held set.
    pub fn visible<F>(&self, status_of: F) -> Vec<&Q4hQuestion>
    where
        F: Fn(&DialogRef) -> Option<DialogStatus>,
    {
        self.questions
            .iter()
            .filter(|q| !status_of(&q.dialog()).is_some_and(DialogStatus::hides_questions))
            .collect()
    }
}

/// Group questions by owning dialog, root-owned groups first.
/// Within each class, groups keep first-appearance order.
pub fn group_by_dialog<'a, I>(questions: I) -> Vec<QuestionGroup<'a>>
where
    I: IntoIterator<Item = &'a Q4hQuestion>,
{
    let mut groups: Vec<QuestionGroup<'a>> = Vec::new();
    for question in questions {
        let dialog = question.dialog();
        match groups.iter_mut().find(|g| g.dialog == dialog) {
            Some(group) => group.questions.push(question),
            None => groups.push(QuestionGroup {
                dialog,
                questions: vec![question],
            }),
        }
    }
    groups.sort_by_key(|g| !g.dialog.is_root());
    groups
}
