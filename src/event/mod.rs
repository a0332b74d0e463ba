mod effect;

pub use effect::{Effect, Toast, ToastKind, ViewCommand};

use crate::error::FetchError;
use crate::model::{DeepLinkIntent, DialogHierarchy, DialogId, DialogNode, DialogRef, ServerMessage};

/// Transport connection state as reported by the transport collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

/// All events that can occur in the engine.
/// Sourced from the inbound stream, fetch completions, user intents, and timers.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Decoded message from the backend stream
    Server(ServerMessage),

    /// Root dialog list fetch completed
    RootsLoaded(Result<Vec<DialogNode>, FetchError>),

    /// Lazy hierarchy fetch for one root completed
    HierarchyLoaded {
        root_id: DialogId,
        result: Result<DialogHierarchy, FetchError>,
    },

    /// Transport connection state changed
    Connection(ConnectionState),

    /// Deep-link target parsed at start-up
    DeepLink(DeepLinkIntent),

    /// User selected a dialog for the main view
    SelectDialog(DialogRef),

    /// User moved the main view to another course
    NavigateCourse(u32),

    /// Standalone subdialog view opened
    OpenSubdialogView(DialogRef),

    /// Standalone subdialog view closed
    CloseSubdialogView(DialogId),

    /// User expanded a root; load its subdialogs
    ExpandRoot(DialogId),

    EmergencyStop,

    ResumeAll,

    SetDiligencePush { dialog: DialogRef, enabled: bool },

    RefillDiligenceBudget(DialogRef),

    RequestProblems,

    /// Timer fired; run due refreshes
    Tick,

    /// Engine shutting down
    Teardown,
}
