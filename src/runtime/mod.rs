//! Imperative shell around the pure `update` function.
//!
//! One task owns the state and multiplexes the inbound stream, connection
//! changes, fetch completions, the refresh timer, and shutdown. Each event
//! runs to completion before the next is taken.

mod sinks;

pub use sinks::{JsonlOutbox, LogPresenter, Outbound, Presenter, RecordingOutbound, RecordingPresenter};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::task::{self, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::api::DialogApi;
use crate::app::{update, AppState};
use crate::error::{FetchError, SyncError};
use crate::event::{AppEvent, ConnectionState, Effect};
use crate::model::DialogId;
use crate::source::InboundItem;

/// Counts reported when a run finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub messages: usize,
    pub malformed: usize,
    pub fetches: usize,
}

/// What a spawned fetch task is loading, kept so a task that dies still
/// settles its fetch latch.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FetchKind {
    Roots,
    Hierarchy(DialogId),
}

impl FetchKind {
    fn failed(self, err: &JoinError) -> AppEvent {
        let err = FetchError::Transport(format!("fetch task failed: {err}"));
        match self {
            FetchKind::Roots => AppEvent::RootsLoaded(Err(err)),
            FetchKind::Hierarchy(root_id) => AppEvent::HierarchyLoaded {
                root_id,
                result: Err(err),
            },
        }
    }
}

pub struct SyncEngine<O, P> {
    state: AppState,
    api: Arc<dyn DialogApi>,
    outbound: O,
    presenter: P,
    fetches: JoinSet<AppEvent>,
    fetch_kinds: HashMap<task::Id, FetchKind>,
    summary: RunSummary,
}

impl<O: Outbound, P: Presenter> SyncEngine<O, P> {
    pub fn new(state: AppState, api: Arc<dyn DialogApi>, outbound: O, presenter: P) -> Self {
        Self {
            state,
            api,
            outbound,
            presenter,
            fetches: JoinSet::new(),
            fetch_kinds: HashMap::new(),
            summary: RunSummary::default(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn outbound(&self) -> &O {
        &self.outbound
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Feed one event through `update` and execute what it returns.
    pub fn dispatch(&mut self, event: AppEvent) -> Result<(), SyncError> {
        let effects = update(&mut self.state, event, Instant::now()).inspect_err(|e| {
            error!(error = %e, "protocol violation; stopping");
        })?;
        for effect in effects {
            self.execute(effect);
        }
        Ok(())
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Send(message) => {
                if let Err(e) = self.outbound.send_raw(&message) {
                    warn!(error = %e, message = ?message, "failed to send control message");
                }
            }
            Effect::FetchRoots => {
                let api = Arc::clone(&self.api);
                self.summary.fetches += 1;
                let handle = self
                    .fetches
                    .spawn(async move { AppEvent::RootsLoaded(api.fetch_roots().await) });
                self.fetch_kinds.insert(handle.id(), FetchKind::Roots);
            }
            Effect::FetchHierarchy { root_id } => {
                let api = Arc::clone(&self.api);
                self.summary.fetches += 1;
                let kind = FetchKind::Hierarchy(root_id.clone());
                let handle = self.fetches.spawn(async move {
                    let result = api.fetch_hierarchy(&root_id).await;
                    AppEvent::HierarchyLoaded { root_id, result }
                });
                self.fetch_kinds.insert(handle.id(), kind);
            }
            Effect::View(command) => self.presenter.view(&command),
            Effect::Toast(toast) => self.presenter.toast(&toast),
            Effect::ReauthRequired => self.presenter.reauth_required(),
        }
    }

    /// Run until the inbound stream ends (after draining in-flight fetches)
    /// or `shutdown` flips to true (in-flight fetches are aborted).
    pub async fn run<S>(
        &mut self,
        inbound: S,
        connection: watch::Receiver<ConnectionState>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary, SyncError>
    where
        S: Stream<Item = InboundItem> + Unpin,
    {
        let result = self.run_loop(inbound, connection, shutdown).await;
        if result.is_err() {
            self.abort_fetches();
        }
        result?;
        self.dispatch(AppEvent::Teardown)?;
        info!(summary = ?self.summary, "engine stopped");
        Ok(self.summary)
    }

    fn fetch_joined(&mut self, joined: Result<(task::Id, AppEvent), JoinError>) -> Result<(), SyncError> {
        match joined {
            Ok((id, event)) => {
                self.fetch_kinds.remove(&id);
                self.dispatch(event)
            }
            Err(e) => match self.fetch_kinds.remove(&e.id()) {
                Some(kind) => {
                    warn!(error = %e, kind = ?kind, "fetch task failed");
                    self.dispatch(kind.failed(&e))
                }
                None => {
                    warn!(error = %e, "untracked fetch task failed");
                    Ok(())
                }
            },
        }
    }

    fn abort_fetches(&mut self) {
        self.fetches.abort_all();
        self.fetch_kinds.clear();
    }

    async fn run_loop<S>(
        &mut self,
        mut inbound: S,
        mut connection: watch::Receiver<ConnectionState>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), SyncError>
    where
        S: Stream<Item = InboundItem> + Unpin,
    {
        let initial = *connection.borrow_and_update();
        self.dispatch(AppEvent::Connection(initial))?;

        let mut inbound_done = false;
        let mut connection_open = true;
        let mut shutdown_open = true;

        loop {
            if inbound_done && self.fetches.is_empty() {
                debug!("inbound ended and fetches drained");
                return Ok(());
            }

            let next_due = self.state.run_control.next_due();
            let deadline = tokio::time::Instant::from_std(
                next_due.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600)),
            );

            tokio::select! {
                changed = shutdown.changed(), if shutdown_open => match changed {
                    Ok(()) => {
                        if *shutdown.borrow_and_update() {
                            info!(in_flight = self.fetches.len(), "shutdown requested");
                            self.abort_fetches();
                            return Ok(());
                        }
                    }
                    Err(_) => shutdown_open = false,
                },

                item = inbound.next(), if !inbound_done => match item {
                    Some(Ok(message)) => {
                        self.summary.messages += 1;
                        self.dispatch(AppEvent::Server(message))?;
                    }
                    Some(Err(e)) => {
                        self.summary.malformed += 1;
                        warn!(error = %e, "skipping malformed message");
                    }
                    None => {
                        info!("inbound stream ended");
                        inbound_done = true;
                    }
                },

                changed = connection.changed(), if connection_open => match changed {
                    Ok(()) => {
                        let next = *connection.borrow_and_update();
                        self.dispatch(AppEvent::Connection(next))?;
                    }
                    Err(_) => connection_open = false,
                },

                Some(joined) = self.fetches.join_next_with_id(), if !self.fetches.is_empty() => {
                    self.fetch_joined(joined)?;
                }

                _ = tokio::time::sleep_until(deadline), if next_due.is_some() => {
                    self.dispatch(AppEvent::Tick)?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FixtureApi;
    use crate::model::{DialogNode, OutboundMessage, ServerMessage};
    use futures::stream;

    fn engine(api: FixtureApi) -> SyncEngine<RecordingOutbound, RecordingPresenter> {
        SyncEngine::new(
            AppState::new(),
            Arc::new(api),
            RecordingOutbound::default(),
            RecordingPresenter::default(),
        )
    }

    #[tokio::test]
    async fn connected_source_loads_roots_before_stopping() {
        let mut engine = engine(FixtureApi::new(vec![DialogNode::root("r1", "planner", "t.tsk")]));
        let (_conn_tx, conn_rx) = watch::channel(ConnectionState::Connected);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let inbound = stream::iter(vec![Ok(ServerMessage::Welcome { server_version: None })]);

        let summary = engine.run(inbound, conn_rx, stop_rx).await.unwrap();

        assert_eq!(summary.messages, 1);
        assert_eq!(summary.fetches, 1);
        assert!(engine.state().registry.root(&"r1".into()).is_some());
        assert_eq!(
            engine.outbound().sent,
            vec![OutboundMessage::GetQ4hState, OutboundMessage::GetProblems]
        );
        assert!(engine.state().torn_down);
    }
}
