use std::time::Instant;

use tracing::{debug, info, warn};

use crate::app::routing::deliver;
use crate::app::state::{AppState, DialogView, DiligenceState, TranscriptEntry};
use crate::deep_link::ResolveStep;
use crate::error::{FetchError, SyncError};
use crate::event::{AppEvent, ConnectionState, Effect, Toast, ViewCommand};
use crate::model::{
    DialogHierarchy, DialogId, DialogNode, DialogRef, MessageScope, OutboundMessage, RefreshReason,
    ServerMessage,
};

/// Pure update function following Elm Architecture.
/// Takes current state, one event, and the current instant; returns the
/// effects the runtime must execute. No I/O.
///
/// An `Err` is a protocol violation: the event is rejected and the state
/// the reconcilers hold is left exactly as it was.
pub fn update(state: &mut AppState, event: AppEvent, now: Instant) -> Result<Vec<Effect>, SyncError> {
    let registry_rev = state.registry.revision();
    let q4h_rev = state.q4h.revision();
    let q4h_generation = state.q4h.snapshot_generation();
    let mut effects = Vec::new();
    let mut retry_deep_link = false;

    match event {
        AppEvent::Server(msg) => handle_server_message(state, msg, now, &mut effects)?,

        AppEvent::RootsLoaded(result) => on_roots_loaded(state, result, &mut effects)?,

        AppEvent::HierarchyLoaded { root_id, result } => {
            retry_deep_link = on_hierarchy_loaded(state, root_id, result, &mut effects)?;
        }

        AppEvent::Connection(next) => on_connection(state, next, &mut effects),

        AppEvent::DeepLink(intent) => {
            info!(intent = ?intent, "deep link received");
            state.deep_link.set_intent(intent);
            retry_deep_link = true;
        }

        AppEvent::SelectDialog(dialog) => select_main(state, dialog, &mut effects),

        AppEvent::NavigateCourse(course) => navigate_main(state, course, &mut effects),

        AppEvent::OpenSubdialogView(dialog) => {
            if dialog.is_root() {
                warn!(dialog = %dialog, "refusing standalone view for a root dialog");
            } else {
                let course = state.registry.get(&dialog).map(|n| n.current_course);
                state
                    .subdialog_views
                    .insert(dialog.self_id.clone(), DialogView::showing(dialog.clone(), course));
                effects.push(Effect::Send(OutboundMessage::DisplayDialog { dialog }));
            }
        }

        AppEvent::CloseSubdialogView(self_id) => {
            if state.subdialog_views.remove(&self_id).is_none() {
                debug!(dialog = %self_id, "no standalone view to close");
            }
        }

        AppEvent::ExpandRoot(root_id) => request_hierarchy(state, root_id, &mut effects),

        AppEvent::EmergencyStop => {
            if state.counts().stoppable == 0 {
                toast(state, &mut effects, Toast::info("No proceeding dialogs to stop"));
            } else {
                effects.push(Effect::Send(OutboundMessage::EmergencyStop));
                state
                    .run_control
                    .schedule_refresh(RefreshReason::EmergencyStop, now);
            }
        }

        AppEvent::ResumeAll => {
            if state.counts().resumable == 0 {
                toast(state, &mut effects, Toast::info("No interrupted dialogs to resume"));
            } else {
                effects.push(Effect::Send(OutboundMessage::ResumeAll));
                state.run_control.schedule_refresh(RefreshReason::ResumeAll, now);
            }
        }

        AppEvent::SetDiligencePush { dialog, enabled } => {
            effects.push(Effect::Send(OutboundMessage::SetDiligencePush { dialog, enabled }));
        }

        AppEvent::RefillDiligenceBudget(dialog) => {
            effects.push(Effect::Send(OutboundMessage::RefillDiligencePushBudget { dialog }));
        }

        AppEvent::RequestProblems => effects.push(Effect::Send(OutboundMessage::GetProblems)),

        AppEvent::Tick => {
            let due = state.run_control.take_due(now);
            if !due.is_empty() {
                debug!(count = due.len(), "scheduled refreshes due");
                request_roots(state, &mut effects);
            }
        }

        AppEvent::Teardown => {
            let cleared = state.run_control.cancel_all();
            state.torn_down = true;
            info!(cleared, "teardown: pending refreshes cancelled");
        }
    }

    let registry_changed = state.registry.revision() != registry_rev;
    if registry_changed && state.run_control.recompute(&state.registry) {
        debug!(counts = ?state.counts(), "run-control counts changed");
    }

    let q4h_changed =
        state.q4h.revision() != q4h_rev || state.q4h.snapshot_generation() != q4h_generation;
    if retry_deep_link || registry_changed || q4h_changed {
        attempt_deep_link(state, &mut effects);
    }

    Ok(effects)
}

fn handle_server_message(
    state: &mut AppState,
    msg: ServerMessage,
    now: Instant,
    effects: &mut Vec<Effect>,
) -> Result<(), SyncError> {
    msg.validate()?;
    match msg.scope() {
        MessageScope::Global => debug!(kind = msg.kind(), "server message"),
        MessageScope::Dialog(dialog) => debug!(kind = msg.kind(), dialog = %dialog, "server message"),
    }

    match msg {
        ServerMessage::Welcome { server_version } => {
            info!(server_version = ?server_version, "connected to backend");
            effects.push(Effect::Send(OutboundMessage::GetQ4hState));
            effects.push(Effect::Send(OutboundMessage::GetProblems));
        }

        ServerMessage::DialogsCreated { dialogs } => {
            state.registry.upsert_roots(dialogs)?;
        }

        ServerMessage::DialogsMoved { root_ids, to_status } => {
            state.registry.move_roots(&root_ids, to_status);
            if root_ids.iter().any(|id| state.registry.root(id).is_none()) {
                debug!("move references unknown roots; refreshing list");
                request_roots(state, effects);
            }
        }

        ServerMessage::DialogsDeleted { root_ids } => {
            state.registry.remove_roots(&root_ids);
            state.q4h.drop_for_roots(&root_ids);
            close_views_under(state, &root_ids, effects);
        }

        ServerMessage::Q4hStateResponse { questions } => {
            let registry = &state.registry;
            let outcome = state
                .q4h
                .apply_snapshot(questions, |dialog| registry.resolve_status(dialog))?;
            debug!(changed = outcome.changed(), held = state.q4h.held_len(), "q4h snapshot applied");
        }

        ServerMessage::NewQ4hAsked { question } => state.q4h.apply_asked(question)?,

        ServerMessage::Q4hAnswered { question_id } => {
            if !state.q4h.apply_answered(&question_id) {
                debug!(question = %question_id, "answer for question not held");
            }
        }

        ServerMessage::RunControlRefresh { reason } => schedule(state, reason, now),

        ServerMessage::ProblemsSnapshot { problems } => state.problems = problems,

        ServerMessage::Error { message } => {
            warn!(message = %message, "backend reported error");
            toast(state, effects, Toast::error(message));
        }

        ServerMessage::CourseUpdate {
            dialog,
            course,
            total_courses,
        } => {
            state
                .registry
                .patch_course(&dialog, course.max(total_courses));
            if let Some(view) = deliver(state, &dialog) {
                view.apply_course(course, total_courses);
            }
        }

        ServerMessage::RunState { dialog, run_state } => {
            let awaits_human = run_state.awaits_human();
            if let Some(view) = deliver(state, &dialog) {
                view.run_state = Some(run_state.clone());
            }
            state.registry.patch_run_state(&dialog, run_state);
            if awaits_human {
                effects.push(Effect::Send(OutboundMessage::GetQ4hState));
            }
        }

        ServerMessage::RunStateMarker { dialog, marker } => {
            debug!(dialog = %dialog, marker = ?marker, "run state marker");
            schedule(state, marker.refresh_reason(), now);
        }

        ServerMessage::SubdialogCreated {
            parent_dialog,
            sub_dialog,
            node,
        } => {
            state.registry.insert_subdialog(node)?;
            let capacity = state.config.transcript_capacity;
            if let Some(view) = deliver(state, &parent_dialog) {
                view.push_entry(TranscriptEntry::SubdialogCreated { dialog: sub_dialog }, capacity);
            }
        }

        ServerMessage::GeneratingStart {
            dialog,
            course,
            genseq,
        } => push_transcript(state, &dialog, TranscriptEntry::GenerationStarted { course, genseq }),

        ServerMessage::StreamChunk {
            dialog,
            course,
            genseq,
            content,
        } => push_transcript(
            state,
            &dialog,
            TranscriptEntry::Chunk {
                course,
                genseq,
                content,
            },
        ),

        ServerMessage::GeneratingFinish {
            dialog,
            course,
            genseq,
        } => push_transcript(state, &dialog, TranscriptEntry::GenerationFinished { course, genseq }),

        ServerMessage::TellaskCall {
            dialog,
            course,
            message_index,
            call_id,
            content,
        } => push_transcript(
            state,
            &dialog,
            TranscriptEntry::TellaskCall {
                course,
                message_index,
                call_id,
                content,
            },
        ),

        ServerMessage::DiligencePush {
            dialog,
            enabled,
            remaining_budget,
        } => {
            if let Some(view) = deliver(state, &dialog) {
                view.diligence = Some(DiligenceState {
                    enabled,
                    remaining_budget,
                });
            }
        }
    }
    Ok(())
}

fn push_transcript(state: &mut AppState, dialog: &DialogRef, entry: TranscriptEntry) {
    let capacity = state.config.transcript_capacity;
    if let Some(view) = deliver(state, dialog) {
        view.push_entry(entry, capacity);
    }
}

fn schedule(state: &mut AppState, reason: RefreshReason, now: Instant) {
    if !state.run_control.schedule_refresh(reason, now) {
        debug!(reason = ?reason, "refresh debounced");
    }
}

fn toast(state: &mut AppState, effects: &mut Vec<Effect>, toast: Toast) {
    state.push_toast(toast.clone());
    effects.push(Effect::Toast(toast));
}

fn close_views_under(state: &mut AppState, root_ids: &[DialogId], effects: &mut Vec<Effect>) {
    if let Some(shown) = state.main.dialog.clone() {
        if root_ids.contains(&shown.root_id) {
            state.main = DialogView::default();
            effects.push(Effect::View(ViewCommand::CloseView { dialog: shown }));
        }
    }
    let doomed: Vec<DialogRef> = state
        .subdialog_views
        .values()
        .filter_map(|view| view.dialog.clone())
        .filter(|dialog| root_ids.contains(&dialog.root_id))
        .collect();
    for dialog in doomed {
        state.subdialog_views.remove(&dialog.self_id);
        effects.push(Effect::View(ViewCommand::CloseView { dialog }));
    }
}

fn select_main(state: &mut AppState, dialog: DialogRef, effects: &mut Vec<Effect>) {
    let course = state.registry.get(&dialog).map(|node| node.current_course);
    info!(dialog = %dialog, "selecting dialog");
    state.main = DialogView::showing(dialog.clone(), course);
    effects.push(Effect::Send(OutboundMessage::DisplayDialog {
        dialog: dialog.clone(),
    }));
    effects.push(Effect::View(ViewCommand::SelectDialog { dialog }));
}

fn navigate_main(state: &mut AppState, course: u32, effects: &mut Vec<Effect>) {
    let Some(dialog) = state.main.dialog.clone() else {
        debug!(course, "no dialog selected; ignoring course navigation");
        return;
    };
    state.main.navigate(course);
    effects.push(Effect::View(ViewCommand::NavigateCourse { dialog, course }));
}

fn request_roots(state: &mut AppState, effects: &mut Vec<Effect>) {
    if state.roots_fetch.request() {
        effects.push(Effect::FetchRoots);
    } else {
        debug!("root fetch in flight; rerun queued");
    }
}

fn request_hierarchy(state: &mut AppState, root_id: DialogId, effects: &mut Vec<Effect>) {
    let latch = state.hierarchy_fetches.entry(root_id.clone()).or_default();
    if latch.request() {
        effects.push(Effect::FetchHierarchy { root_id });
    } else {
        debug!(root = %root_id, "hierarchy fetch in flight; rerun queued");
    }
}

fn fetch_failed(state: &mut AppState, what: &str, err: FetchError, effects: &mut Vec<Effect>) {
    match err {
        FetchError::Unauthorized => {
            warn!(what, "fetch rejected as unauthenticated");
            effects.push(Effect::ReauthRequired);
        }
        other => {
            warn!(what, error = %other, "fetch failed");
            toast(state, effects, Toast::error(format!("Failed to load {what}: {other}")));
        }
    }
}

fn on_roots_loaded(
    state: &mut AppState,
    result: Result<Vec<DialogNode>, FetchError>,
    effects: &mut Vec<Effect>,
) -> Result<(), SyncError> {
    let applied = match result {
        Ok(roots) => state.registry.replace_roots(roots).map(|outcome| {
            debug!(changed = outcome.changed(), dialogs = state.registry.len(), "root list applied");
        }),
        Err(err) => {
            fetch_failed(state, "dialog list", err, effects);
            Ok(())
        }
    };
    if state.roots_fetch.settle() {
        effects.push(Effect::FetchRoots);
    }
    applied
}

/// Returns whether the deep-link resolver was waiting on this fetch.
fn on_hierarchy_loaded(
    state: &mut AppState,
    root_id: DialogId,
    result: Result<DialogHierarchy, FetchError>,
    effects: &mut Vec<Effect>,
) -> Result<bool, SyncError> {
    let applied = match result {
        Ok(hierarchy) if hierarchy.root.root_id != root_id || !hierarchy.root.is_root() => {
            Err(SyncError::ForeignSubdialog {
                root_id: root_id.clone(),
                dialog: hierarchy.root.dialog_ref(),
            })
        }
        Ok(hierarchy) => state
            .registry
            .apply_hierarchy(hierarchy.root, hierarchy.subdialogs)
            .map(|outcome| debug!(root = %root_id, changed = outcome.changed(), "hierarchy applied")),
        Err(err) => {
            fetch_failed(state, &format!("dialog {root_id}"), err, effects);
            Ok(())
        }
    };

    let rerun = state
        .hierarchy_fetches
        .get_mut(&root_id)
        .is_some_and(|latch| latch.settle());
    if rerun {
        effects.push(Effect::FetchHierarchy {
            root_id: root_id.clone(),
        });
    } else {
        state.hierarchy_fetches.remove(&root_id);
    }

    let settled = state.deep_link.fetch_settled(&root_id);
    applied.map(|()| settled)
}

fn on_connection(state: &mut AppState, next: ConnectionState, effects: &mut Vec<Effect>) {
    let previous = std::mem::replace(&mut state.connection, next);
    info!(from = ?previous, to = ?next, "connection state changed");
    match next {
        ConnectionState::Connected => {
            if matches!(previous, ConnectionState::Reconnecting | ConnectionState::Disconnected) {
                toast(state, effects, Toast::info("Reconnected"));
                effects.push(Effect::Send(OutboundMessage::GetQ4hState));
            }
            request_roots(state, effects);
        }
        ConnectionState::Reconnecting | ConnectionState::Disconnected => {
            if previous == ConnectionState::Connected {
                toast(state, effects, Toast::warning("Connection lost; reconnecting"));
            }
        }
        ConnectionState::Connecting => {}
    }
}

fn attempt_deep_link(state: &mut AppState, effects: &mut Vec<Effect>) {
    match state.deep_link.attempt(&state.registry, &state.q4h) {
        ResolveStep::Wait => {}
        ResolveStep::Fetch(root_id) => request_hierarchy(state, root_id, effects),
        ResolveStep::RequestQ4h => effects.push(Effect::Send(OutboundMessage::GetQ4hState)),
        ResolveStep::Abandon(why) => toast(state, effects, Toast::warning(why)),
        ResolveStep::Navigate(target) => {
            select_main(state, target.dialog, effects);
            if let Some(course) = target.course {
                if state.main.current_course != Some(course) {
                    navigate_main(state, course, effects);
                }
            }
            if let Some(scroll) = target.scroll {
                effects.push(Effect::View(scroll));
            }
        }
    }
}
