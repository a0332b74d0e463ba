use std::collections::{BTreeMap, VecDeque};

use crate::config::SyncConfig;
use crate::deep_link::DeepLinkResolver;
use crate::event::{ConnectionState, Toast};
use crate::model::{CallId, DialogId, DialogRef, Problem, Q4hQuestion, QuestionGroup, RunState};
use crate::q4h::{group_by_dialog, Q4hReconciler};
use crate::registry::DialogRegistry;
use crate::run_control::{RunControl, RunControlCounts};

/// Engine state.
/// Updated only via `update(state, event, now) -> effects`.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: SyncConfig,

    /// Every dialog the client knows about
    pub registry: DialogRegistry,

    /// Pending questions for a human
    pub q4h: Q4hReconciler,

    /// Stoppable/resumable counters and the refresh schedule
    pub run_control: RunControl,

    pub deep_link: DeepLinkResolver,

    /// The main dialog view (at most one dialog shown)
    pub main: DialogView,

    /// Standalone subdialog views keyed by the subdialog's self id
    pub subdialog_views: BTreeMap<DialogId, DialogView>,

    pub connection: ConnectionState,

    /// Latest problems snapshot from the backend
    pub problems: Vec<Problem>,

    /// Ring buffer of user notifications (max `toast_capacity`)
    pub toasts: VecDeque<Toast>,

    /// Latch for the root dialog list fetch
    pub roots_fetch: FetchLatch,

    /// Latches for per-root hierarchy fetches
    pub hierarchy_fetches: BTreeMap<DialogId, FetchLatch>,

    /// Signal that teardown ran
    pub torn_down: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self {
            run_control: RunControl::new(&config),
            registry: DialogRegistry::new(),
            q4h: Q4hReconciler::new(),
            deep_link: DeepLinkResolver::new(),
            main: DialogView::default(),
            subdialog_views: BTreeMap::new(),
            connection: ConnectionState::Connecting,
            problems: Vec::new(),
            toasts: VecDeque::with_capacity(config.toast_capacity),
            roots_fetch: FetchLatch::default(),
            hierarchy_fetches: BTreeMap::new(),
            torn_down: false,
            config,
        }
    }

    pub fn counts(&self) -> RunControlCounts {
        self.run_control.counts()
    }

    /// Questions whose dialog is not in a completed/archived bucket.
    pub fn visible_questions(&self) -> Vec<&Q4hQuestion> {
        self.q4h.visible(|dialog| self.registry.resolve_status(dialog))
    }

    /// Count shown in the Q4H badge.
    pub fn q4h_question_count(&self) -> usize {
        self.visible_questions().len()
    }

    pub fn question_groups(&self) -> Vec<QuestionGroup<'_>> {
        group_by_dialog(self.visible_questions())
    }

    pub fn push_toast(&mut self, toast: Toast) {
        if self.toasts.len() >= self.config.toast_capacity {
            self.toasts.pop_front();
        }
        self.toasts.push_back(toast);
    }
}

/// Single-flight guard for a fetch: a request while one is in flight is
/// remembered and replayed once when it settles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchLatch {
    in_flight: bool,
    rerun: bool,
}

impl FetchLatch {
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Returns true when the caller should start the fetch now.
    pub fn request(&mut self) -> bool {
        if self.in_flight {
            self.rerun = true;
            false
        } else {
            self.in_flight = true;
            true
        }
    }

    /// Mark the fetch finished. Returns true when a queued rerun must start now.
    pub fn settle(&mut self) -> bool {
        let rerun = std::mem::take(&mut self.rerun);
        self.in_flight = rerun;
        rerun
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiligenceState {
    pub enabled: bool,
    pub remaining_budget: u32,
}

/// Content streamed into a dialog view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEntry {
    GenerationStarted {
        course: u32,
        genseq: u32,
    },
    Chunk {
        course: u32,
        genseq: u32,
        content: String,
    },
    GenerationFinished {
        course: u32,
        genseq: u32,
    },
    TellaskCall {
        course: u32,
        message_index: u32,
        call_id: Option<CallId>,
        content: String,
    },
    SubdialogCreated {
        dialog: DialogRef,
    },
}

/// State of one on-screen dialog view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialogView {
    /// Dialog currently shown (None = empty view)
    pub dialog: Option<DialogRef>,

    pub current_course: Option<u32>,

    /// Newest course the dialog has
    pub latest_course: Option<u32>,

    /// Input is only enabled on the latest course
    pub input_enabled: bool,

    pub run_state: Option<RunState>,

    pub diligence: Option<DiligenceState>,

    pub transcript: VecDeque<TranscriptEntry>,
}

impl DialogView {
    pub fn showing(dialog: DialogRef, course: Option<u32>) -> Self {
        Self {
            dialog: Some(dialog),
            current_course: course,
            latest_course: course,
            input_enabled: true,
            ..Self::default()
        }
    }

    pub fn shows(&self, dialog: &DialogRef) -> bool {
        self.dialog.as_ref() == Some(dialog)
    }

    /// Move to `course` without touching what the latest course is.
    pub fn navigate(&mut self, course: u32) {
        self.current_course = Some(course);
        self.transcript.clear();
        self.input_enabled = self.latest_course.map_or(true, |latest| course >= latest);
    }

    /// Backend reports the dialog's course position. The transcript is
    /// replayed after this, so it always starts empty.
    pub fn apply_course(&mut self, course: u32, total_courses: u32) {
        self.transcript.clear();
        self.current_course = Some(course);
        self.latest_course = Some(total_courses);
        self.input_enabled = course >= total_courses;
    }

    pub fn push_entry(&mut self, entry: TranscriptEntry, capacity: usize) {
        if capacity == 0 {
            return;
        }
        if self.transcript.len() >= capacity {
            self.transcript.pop_front();
        }
        self.transcript.push_back(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DialogNode;

    #[test]
    fn test_app_state_default() {
        let state = AppState::default();
        assert!(state.registry.is_empty());
        assert_eq!(state.q4h.held_len(), 0);
        assert!(state.main.dialog.is_none());
        assert!(state.subdialog_views.is_empty());
        assert_eq!(state.connection, ConnectionState::Connecting);
        assert!(state.toasts.is_empty());
        assert!(!state.torn_down);
    }

    #[test]
    fn test_toasts_capacity() {
        let state = AppState::new();
        assert!(state.toasts.capacity() >= 100);
    }

    #[test]
    fn test_toast_ring_buffer_drops_oldest() {
        let mut config = SyncConfig::default();
        config.toast_capacity = 2;
        let mut state = AppState::with_config(config);

        state.push_toast(Toast::info("one"));
        state.push_toast(Toast::info("two"));
        state.push_toast(Toast::info("three"));

        let messages: Vec<_> = state.toasts.iter().map(|t| t.message.as_str()).collect();
        assert_eq!(messages, vec!["two", "three"]);
    }

    #[test]
    fn test_q4h_count_uses_visibility() {
        let mut state = AppState::new();
        state
            .registry
            .replace_roots(vec![
                DialogNode::root("r1", "a", "t.tsk"),
                DialogNode::root("r2", "a", "t.tsk").with_status(crate::model::DialogStatus::Archived),
            ])
            .unwrap();
        state
            .q4h
            .apply_asked(Q4hQuestion::new("q1", DialogRef::root("r1"), 1, 0))
            .unwrap();
        state
            .q4h
            .apply_asked(Q4hQuestion::new("q2", DialogRef::root("r2"), 1, 0))
            .unwrap();

        assert_eq!(state.q4h.held_len(), 2);
        assert_eq!(state.q4h_question_count(), 1);
        assert_eq!(state.question_groups().len(), 1);
    }

    #[test]
    fn test_fetch_latch_coalesces_requests() {
        let mut latch = FetchLatch::default();
        assert!(latch.request());
        assert!(!latch.request());
        assert!(!latch.request());

        assert!(latch.settle());
        assert!(latch.in_flight());
        assert!(!latch.settle());
        assert!(!latch.in_flight());
    }

    #[test]
    fn test_view_input_only_on_latest_course() {
        let mut view = DialogView::showing(DialogRef::root("r1"), Some(4));
        assert!(view.input_enabled);

        view.navigate(2);
        assert!(!view.input_enabled);

        view.apply_course(5, 5);
        assert!(view.input_enabled);
        assert_eq!(view.latest_course, Some(5));
    }

    #[test]
    fn test_course_update_resets_transcript_on_same_course() {
        let mut view = DialogView::showing(DialogRef::root("r1"), Some(2));
        view.push_entry(TranscriptEntry::GenerationStarted { course: 2, genseq: 1 }, 10);

        view.apply_course(2, 2);

        assert!(view.transcript.is_empty());
        assert_eq!(view.current_course, Some(2));
    }

    #[test]
    fn test_transcript_capacity() {
        let mut view = DialogView::showing(DialogRef::root("r1"), Some(1));
        for genseq in 0..5 {
            view.push_entry(TranscriptEntry::GenerationStarted { course: 1, genseq }, 3);
        }
        assert_eq!(view.transcript.len(), 3);
        assert_eq!(
            view.transcript.front(),
            Some(&TranscriptEntry::GenerationStarted { course: 1, genseq: 2 })
        );
    }
}
