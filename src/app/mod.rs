pub mod routing;
pub mod state;
pub mod update;

pub use routing::{deliver, resolve_route, RouteTarget};
pub use state::{AppState, DialogView, DiligenceState, FetchLatch, TranscriptEntry};
pub use update::update;
