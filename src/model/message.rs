use serde::{Deserialize, Serialize};

use super::dialog::{DialogNode, DialogRef, DialogStatus, RunState};
use super::ids::{CallId, DialogId, QuestionId};
use super::question::Q4hQuestion;
use crate::error::SyncError;

/// Backend hint that authoritative root state should be re-fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshReason {
    ResumeAll,
    EmergencyStop,
    RunStateMarkerInterrupted,
    RunStateMarkerResumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStateMarker {
    Interrupted,
    Resumed,
}

impl RunStateMarker {
    pub fn refresh_reason(self) -> RefreshReason {
        match self {
            RunStateMarker::Interrupted => RefreshReason::RunStateMarkerInterrupted,
            RunStateMarker::Resumed => RefreshReason::RunStateMarkerResumed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemSeverity {
    Info,
    Warning,
    Error,
}

/// Workspace-level problem reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub severity: ProblemSeverity,
    pub message: String,
}

/// Inbound stream message, already decoded by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    // --- global ---
    Welcome {
        #[serde(default)]
        server_version: Option<String>,
    },
    DialogsCreated {
        dialogs: Vec<DialogNode>,
    },
    DialogsMoved {
        root_ids: Vec<DialogId>,
        to_status: DialogStatus,
    },
    DialogsDeleted {
        root_ids: Vec<DialogId>,
    },
    Q4hStateResponse {
        questions: Vec<Q4hQuestion>,
    },
    NewQ4hAsked {
        question: Q4hQuestion,
    },
    Q4hAnswered {
        question_id: QuestionId,
    },
    RunControlRefresh {
        reason: RefreshReason,
    },
    ProblemsSnapshot {
        problems: Vec<Problem>,
    },
    Error {
        message: String,
    },

    // --- dialog-scoped ---
    CourseUpdate {
        dialog: DialogRef,
        course: u32,
        total_courses: u32,
    },
    RunState {
        dialog: DialogRef,
        run_state: RunState,
    },
    RunStateMarker {
        dialog: DialogRef,
        marker: RunStateMarker,
    },
    SubdialogCreated {
        parent_dialog: DialogRef,
        sub_dialog: DialogRef,
        node: DialogNode,
    },
    GeneratingStart {
        dialog: DialogRef,
        course: u32,
        genseq: u32,
    },
    StreamChunk {
        dialog: DialogRef,
        course: u32,
        genseq: u32,
        content: String,
    },
    GeneratingFinish {
        dialog: DialogRef,
        course: u32,
        genseq: u32,
    },
    TellaskCall {
        dialog: DialogRef,
        course: u32,
        message_index: u32,
        #[serde(default)]
        call_id: Option<CallId>,
        content: String,
    },
    DiligencePush {
        dialog: DialogRef,
        enabled: bool,
        remaining_budget: u32,
    },
}

/// Global messages carry no dialog identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageScope<'a> {
    Global,
    Dialog(&'a DialogRef),
}

impl ServerMessage {
    pub fn scope(&self) -> MessageScope<'_> {
        match self {
            ServerMessage::Welcome { .. }
            | ServerMessage::DialogsCreated { .. }
            | ServerMessage::DialogsMoved { .. }
            | ServerMessage::DialogsDeleted { .. }
            | ServerMessage::Q4hStateResponse { .. }
            | ServerMessage::NewQ4hAsked { .. }
            | ServerMessage::Q4hAnswered { .. }
            | ServerMessage::RunControlRefresh { .. }
            | ServerMessage::ProblemsSnapshot { .. }
            | ServerMessage::Error { .. } => MessageScope::Global,

            ServerMessage::CourseUpdate { dialog, .. }
            | ServerMessage::RunState { dialog, .. }
            | ServerMessage::RunStateMarker { dialog, .. }
            | ServerMessage::GeneratingStart { dialog, .. }
            | ServerMessage::StreamChunk { dialog, .. }
            | ServerMessage::GeneratingFinish { dialog, .. }
            | ServerMessage::TellaskCall { dialog, .. }
            | ServerMessage::DiligencePush { dialog, .. } => MessageScope::Dialog(dialog),

            ServerMessage::SubdialogCreated { parent_dialog, .. } => {
                MessageScope::Dialog(parent_dialog)
            }
        }
    }

    /// Short discriminant name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::DialogsCreated { .. } => "dialogs_created",
            ServerMessage::DialogsMoved { .. } => "dialogs_moved",
            ServerMessage::DialogsDeleted { .. } => "dialogs_deleted",
            ServerMessage::Q4hStateResponse { .. } => "q4h_state_response",
            ServerMessage::NewQ4hAsked { .. } => "new_q4h_asked",
            ServerMessage::Q4hAnswered { .. } => "q4h_answered",
            ServerMessage::RunControlRefresh { .. } => "run_control_refresh",
            ServerMessage::ProblemsSnapshot { .. } => "problems_snapshot",
            ServerMessage::Error { .. } => "error",
            ServerMessage::CourseUpdate { .. } => "course_update",
            ServerMessage::RunState { .. } => "run_state",
            ServerMessage::RunStateMarker { .. } => "run_state_marker",
            ServerMessage::SubdialogCreated { .. } => "subdialog_created",
            ServerMessage::GeneratingStart { .. } => "generating_start",
            ServerMessage::StreamChunk { .. } => "stream_chunk",
            ServerMessage::GeneratingFinish { .. } => "generating_finish",
            ServerMessage::TellaskCall { .. } => "tellask_call",
            ServerMessage::DiligencePush { .. } => "diligence_push",
        }
    }

    /// Structural checks serde cannot express. Run once at the boundary.
    pub fn validate(&self) -> Result<(), SyncError> {
        match self {
            ServerMessage::DialogsCreated { dialogs } => {
                for node in dialogs {
                    node.validate()?;
                }
                Ok(())
            }
            ServerMessage::SubdialogCreated {
                parent_dialog,
                sub_dialog,
                node,
            } => {
                let actual = node.dialog_ref();
                if &actual != sub_dialog {
                    return Err(SyncError::SubdialogAddressMismatch {
                        expected: sub_dialog.clone(),
                        actual,
                    });
                }
                if parent_dialog.root_id != sub_dialog.root_id {
                    return Err(SyncError::SubdialogAddressMismatch {
                        expected: DialogRef::new(parent_dialog.root_id.clone(), sub_dialog.self_id.clone()),
                        actual,
                    });
                }
                // The node names its parent; it must be the one the message was sent for.
                if let Some(supdialog) = &node.supdialog_id {
                    if supdialog != &parent_dialog.self_id {
                        return Err(SyncError::SubdialogAddressMismatch {
                            expected: parent_dialog.clone(),
                            actual: DialogRef::new(node.root_id.clone(), supdialog.clone()),
                        });
                    }
                }
                node.validate()
            }
            _ => Ok(()),
        }
    }
}

/// Fire-and-forget control message sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    GetQ4hState,
    GetProblems,
    EmergencyStop,
    ResumeAll,
    DisplayDialog { dialog: DialogRef },
    SetDiligencePush { dialog: DialogRef, enabled: bool },
    RefillDiligencePushBudget { dialog: DialogRef },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_update_deserializes() {
        let json = r#"{"type":"course_update","dialog":{"rootId":"r1","selfId":"s1"},"course":2,"totalCourses":4}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.kind(), "course_update");
        assert_eq!(msg.scope(), MessageScope::Dialog(&DialogRef::new("r1", "s1")));
    }

    #[test]
    fn q4h_messages_are_global() {
        let json = r#"{"type":"q4h_answered","questionId":"q-1"}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.scope(), MessageScope::Global);
    }

    #[test]
    fn subdialog_created_scoped_to_parent() {
        let node = DialogNode::subdialog("r1", "s1", "coder", "t.tsk");
        let msg = ServerMessage::SubdialogCreated {
            parent_dialog: DialogRef::root("r1"),
            sub_dialog: DialogRef::new("r1", "s1"),
            node,
        };
        assert_eq!(msg.scope(), MessageScope::Dialog(&DialogRef::root("r1")));
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn subdialog_created_with_mismatched_node_rejected() {
        let node = DialogNode::subdialog("r1", "s2", "coder", "t.tsk");
        let msg = ServerMessage::SubdialogCreated {
            parent_dialog: DialogRef::root("r1"),
            sub_dialog: DialogRef::new("r1", "s1"),
            node,
        };
        assert!(matches!(
            msg.validate(),
            Err(SyncError::SubdialogAddressMismatch { .. })
        ));
    }

    #[test]
    fn subdialog_created_under_foreign_root_rejected() {
        let msg = ServerMessage::SubdialogCreated {
            parent_dialog: DialogRef::root("r2"),
            sub_dialog: DialogRef::new("r1", "s1"),
            node: DialogNode::subdialog("r1", "s1", "coder", "t.tsk"),
        };
        assert!(matches!(
            msg.validate(),
            Err(SyncError::SubdialogAddressMismatch { .. })
        ));
    }

    #[test]
    fn subdialog_created_with_other_supdialog_rejected() {
        // node says its parent is the root, the message says s1
        let msg = ServerMessage::SubdialogCreated {
            parent_dialog: DialogRef::new("r1", "s1"),
            sub_dialog: DialogRef::new("r1", "s2"),
            node: DialogNode::subdialog("r1", "s2", "coder", "t.tsk"),
        };
        assert!(matches!(
            msg.validate(),
            Err(SyncError::SubdialogAddressMismatch { .. })
        ));
    }

    #[test]
    fn nested_subdialog_created_accepted() {
        let mut node = DialogNode::subdialog("r1", "s2", "coder", "t.tsk");
        node.supdialog_id = Some("s1".into());
        let msg = ServerMessage::SubdialogCreated {
            parent_dialog: DialogRef::new("r1", "s1"),
            sub_dialog: DialogRef::new("r1", "s2"),
            node,
        };
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn unknown_message_type_rejected() {
        let json = r#"{"type":"mystery","dialog":{"rootId":"r1","selfId":"r1"}}"#;
        assert!(serde_json::from_str::<ServerMessage>(json).is_err());
    }

    #[test]
    fn outbound_serializes_with_type_tag() {
        let json = serde_json::to_value(OutboundMessage::GetQ4hState).unwrap();
        assert_eq!(json["type"], "get_q4h_state");

        let json = serde_json::to_value(OutboundMessage::SetDiligencePush {
            dialog: DialogRef::root("r1"),
            enabled: false,
        })
        .unwrap();
        assert_eq!(json["type"], "set_diligence_push");
        assert_eq!(json["dialog"]["rootId"], "r1");
        assert_eq!(json["enabled"], false);
    }

    #[test]
    fn marker_maps_to_refresh_reason() {
        assert_eq!(
            RunStateMarker::Interrupted.refresh_reason(),
            RefreshReason::RunStateMarkerInterrupted
        );
        assert_eq!(
            RunStateMarker::Resumed.refresh_reason(),
            RefreshReason::RunStateMarkerResumed
        );
    }
}
