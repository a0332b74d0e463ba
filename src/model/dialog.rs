use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{AgentId, DialogId};
use crate::error::SyncError;

/// Address of one dialog: the root conversation plus the dialog's own id.
/// Roots have `self_id == root_id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogRef {
    pub root_id: DialogId,
    pub self_id: DialogId,
}

impl DialogRef {
    pub fn new(root_id: impl Into<DialogId>, self_id: impl Into<DialogId>) -> Self {
        Self {
            root_id: root_id.into(),
            self_id: self_id.into(),
        }
    }

    pub fn root(root_id: impl Into<DialogId>) -> Self {
        let root_id = root_id.into();
        Self {
            self_id: root_id.clone(),
            root_id,
        }
    }

    pub fn is_root(&self) -> bool {
        self.root_id == self.self_id
    }

    pub fn root_ref(&self) -> DialogRef {
        DialogRef::root(self.root_id.clone())
    }
}

impl fmt::Display for DialogRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "{}", self.root_id)
        } else {
            write!(f, "{}/{}", self.root_id, self.self_id)
        }
    }
}

/// Persisted status bucket. Owned by the root; subdialogs inherit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogStatus {
    Running,
    Completed,
    Archived,
}

impl DialogStatus {
    /// Questions of dialogs in these buckets are hidden, never dropped.
    pub fn hides_questions(self) -> bool {
        matches!(self, DialogStatus::Completed | DialogStatus::Archived)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedReason {
    NeedsHumanInput,
    NeedsHumanInputAndSubdialogs,
    #[serde(other)]
    Other,
}

/// Current execution state of one dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunState {
    Proceeding,
    ProceedingStopRequested,
    Interrupted {
        #[serde(default)]
        reason: Option<String>,
    },
    Blocked {
        reason: BlockedReason,
    },
    Dead,
}

impl RunState {
    pub fn interrupted() -> Self {
        Self::Interrupted { reason: None }
    }

    pub fn blocked(reason: BlockedReason) -> Self {
        Self::Blocked { reason }
    }

    pub fn is_stoppable(&self) -> bool {
        matches!(self, RunState::Proceeding | RunState::ProceedingStopRequested)
    }

    pub fn is_resumable(&self) -> bool {
        matches!(self, RunState::Interrupted { .. })
    }

    pub fn awaits_human(&self) -> bool {
        matches!(
            self,
            RunState::Blocked {
                reason: BlockedReason::NeedsHumanInput | BlockedReason::NeedsHumanInputAndSubdialogs
            }
        )
    }
}

/// One conversation thread as known to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogNode {
    pub root_id: DialogId,
    pub self_id: DialogId,
    pub agent_id: AgentId,
    #[serde(default)]
    pub task_doc_path: String,
    pub status: DialogStatus,
    #[serde(default)]
    pub current_course: u32,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supdialog_id: Option<DialogId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_state: Option<RunState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdialog_count: Option<u32>,
}

impl DialogNode {
    pub fn root(root_id: impl Into<DialogId>, agent_id: impl Into<AgentId>, task_doc_path: &str) -> Self {
        let root_id = root_id.into();
        let now = Utc::now();
        Self {
            self_id: root_id.clone(),
            root_id,
            agent_id: agent_id.into(),
            task_doc_path: task_doc_path.to_string(),
            status: DialogStatus::Running,
            current_course: 1,
            created_at: now,
            last_modified: now,
            supdialog_id: None,
            run_state: None,
            subdialog_count: None,
        }
    }

    pub fn subdialog(
        root_id: impl Into<DialogId>,
        self_id: impl Into<DialogId>,
        agent_id: impl Into<AgentId>,
        task_doc_path: &str,
    ) -> Self {
        let root_id = root_id.into();
        let mut node = Self::root(root_id.clone(), agent_id, task_doc_path);
        node.self_id = self_id.into();
        node.supdialog_id = Some(root_id);
        node
    }

    pub fn with_status(mut self, status: DialogStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_run_state(mut self, run_state: RunState) -> Self {
        self.run_state = Some(run_state);
        self
    }

    pub fn with_subdialog_count(mut self, count: u32) -> Self {
        self.subdialog_count = Some(count);
        self
    }

    pub fn with_course(mut self, course: u32) -> Self {
        self.current_course = course;
        self
    }

    pub fn dialog_ref(&self) -> DialogRef {
        DialogRef {
            root_id: self.root_id.clone(),
            self_id: self.self_id.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.root_id == self.self_id
    }

    /// A dialog without its assignment descriptor cannot be acted on correctly.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.task_doc_path.trim().is_empty() {
            return Err(SyncError::MissingTaskDoc {
                dialog: self.dialog_ref(),
            });
        }
        Ok(())
    }
}

/// Result of a lazy hierarchy fetch: one root plus every subdialog beneath it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogHierarchy {
    pub root: DialogNode,
    #[serde(default)]
    pub subdialogs: Vec<DialogNode>,
}
