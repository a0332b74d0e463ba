use crate::model::{CallId, DialogId, DialogRef, OutboundMessage, QuestionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Error,
    Warning,
    Info,
}

/// User-visible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
}

impl Toast {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Error,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Warning,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Info,
            message: message.into(),
        }
    }
}

/// Requests to the dialog-view collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCommand {
    SelectDialog {
        dialog: DialogRef,
    },
    NavigateCourse {
        dialog: DialogRef,
        course: u32,
    },
    ScrollToCallSite {
        dialog: DialogRef,
        course: u32,
        call_id: CallId,
    },
    ScrollToGenseq {
        dialog: DialogRef,
        course: u32,
        genseq: u32,
    },
    ScrollToQuestion {
        question_id: QuestionId,
        dialog: DialogRef,
        course: u32,
        message_index: u32,
        call_id: Option<CallId>,
    },
    CloseView {
        dialog: DialogRef,
    },
}

/// Side effect returned by `update`, executed by the runtime shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send(OutboundMessage),
    FetchRoots,
    FetchHierarchy { root_id: DialogId },
    View(ViewCommand),
    Toast(Toast),
    /// Fetch was rejected as unauthenticated; hand off to re-authentication.
    ReauthRequired,
}
