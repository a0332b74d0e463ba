pub mod dialog;
pub mod ids;
pub mod intent;
pub mod message;
pub mod question;
pub mod serde_utils;

pub use dialog::{BlockedReason, DialogHierarchy, DialogNode, DialogRef, DialogStatus, RunState};
pub use ids::{AgentId, CallId, DialogId, EmptyIdError, QuestionId};
pub use intent::DeepLinkIntent;
pub use message::{
    MessageScope, OutboundMessage, Problem, ProblemSeverity, RefreshReason, RunStateMarker,
    ServerMessage,
};
pub use question::{CallSite, Q4hQuestion, QuestionGroup};
