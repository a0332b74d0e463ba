use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dialog::DialogRef;
use super::ids::{CallId, DialogId, QuestionId};

/// Where in a dialog's transcript a question was asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSite {
    pub course: u32,
    pub message_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<CallId>,
}

/// One outstanding question a backend agent has asked of a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Q4hQuestion {
    pub id: QuestionId,
    pub root_id: DialogId,
    pub self_id: DialogId,
    pub tellask_content: String,
    pub asked_at: DateTime<Utc>,
    pub call_site: CallSite,
}

impl Q4hQuestion {
    pub fn new(id: impl Into<QuestionId>, dialog: DialogRef, course: u32, message_index: u32) -> Self {
        Self {
            id: id.into(),
            root_id: dialog.root_id,
            self_id: dialog.self_id,
            tellask_content: String::new(),
            asked_at: Utc::now(),
            call_site: CallSite {
                course,
                message_index,
                call_id: None,
            },
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.tellask_content = content.into();
        self
    }

    pub fn with_call_id(mut self, call_id: impl Into<CallId>) -> Self {
        self.call_site.call_id = Some(call_id.into());
        self
    }

    pub fn dialog(&self) -> DialogRef {
        DialogRef {
            root_id: self.root_id.clone(),
            self_id: self.self_id.clone(),
        }
    }

    pub fn owned_by_root(&self) -> bool {
        self.root_id == self.self_id
    }
}

/// Questions sharing one owning dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionGroup<'a> {
    pub dialog: DialogRef,
    pub questions: Vec<&'a Q4hQuestion>,
}
