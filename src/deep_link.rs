//! Resolves a start-up navigation target against state that arrives later.
//!
//! The resolver never queues: while a lazy fetch it triggered is in flight,
//! further attempts are ignored, and the fetch settling re-arms exactly one
//! retry. Question targets wait for Q4H state instead of a timer.

use tracing::{debug, info};

use crate::event::ViewCommand;
use crate::model::{CallId, DeepLinkIntent, DialogId, DialogRef, Q4hQuestion};
use crate::q4h::Q4hReconciler;
use crate::registry::DialogRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverPhase {
    Unresolved,
    Resolving,
    Resolved,
    Abandoned,
}

/// Where a resolved intent lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLinkTarget {
    pub dialog: DialogRef,
    pub course: Option<u32>,
    pub scroll: Option<ViewCommand>,
}

/// What the caller should do after an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveStep {
    /// Nothing to do right now.
    Wait,
    /// Load this root's hierarchy, then retry.
    Fetch(DialogId),
    /// Ask the backend for a Q4H snapshot; retry when Q4H state changes.
    RequestQ4h,
    /// Give up and tell the user why.
    Abandon(String),
    Navigate(DeepLinkTarget),
}

#[derive(Debug, Clone)]
pub struct DeepLinkResolver {
    intent: Option<DeepLinkIntent>,
    phase: ResolverPhase,
    fetch_root: Option<DialogId>,
    fetch_attempted: bool,
    q4h_requested_at: Option<u64>,
}

impl Default for DeepLinkResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DeepLinkResolver {
    pub fn new() -> Self {
        Self {
            intent: None,
            phase: ResolverPhase::Unresolved,
            fetch_root: None,
            fetch_attempted: false,
            q4h_requested_at: None,
        }
    }

    pub fn with_intent(intent: DeepLinkIntent) -> Self {
        Self {
            intent: Some(intent),
            ..Self::new()
        }
    }

    pub fn intent(&self) -> Option<&DeepLinkIntent> {
        self.intent.as_ref()
    }

    pub fn phase(&self) -> ResolverPhase {
        self.phase
    }

    /// Install the intent. Parsed once; a second intent replaces a finished one only.
    pub fn set_intent(&mut self, intent: DeepLinkIntent) {
        if self.phase == ResolverPhase::Resolving {
            debug!("deep link already resolving; ignoring new intent");
            return;
        }
        *self = Self::with_intent(intent);
    }

    /// The lazy fetch for `root_id` finished (either way). Returns whether to retry now.
    pub fn fetch_settled(&mut self, root_id: &DialogId) -> bool {
        if self.phase == ResolverPhase::Resolving && self.fetch_root.as_ref() == Some(root_id) {
            self.phase = ResolverPhase::Unresolved;
            self.fetch_root = None;
            return true;
        }
        false
    }

    fn abandon(&mut self, why: String) -> ResolveStep {
        info!(reason = %why, "deep link abandoned");
        self.phase = ResolverPhase::Abandoned;
        ResolveStep::Abandon(why)
    }

    pub fn attempt(&mut self, registry: &DialogRegistry, q4h: &Q4hReconciler) -> ResolveStep {
        if self.phase != ResolverPhase::Unresolved {
            return ResolveStep::Wait;
        }
        let Some(intent) = self.intent.clone() else {
            return ResolveStep::Wait;
        };

        let target = match complete(&intent, q4h) {
            Some(target) => target,
            None => {
                let generation = q4h.snapshot_generation();
                return match self.q4h_requested_at {
                    None => {
                        self.q4h_requested_at = Some(generation);
                        ResolveStep::RequestQ4h
                    }
                    Some(asked) if generation > asked => {
                        self.abandon(format!("Question {} not found", question_id(&intent)))
                    }
                    Some(_) => ResolveStep::Wait,
                };
            }
        };

        if !registry.contains(&target.dialog) {
            if self.fetch_attempted {
                return self.abandon(format!("Dialog {} not found", target.dialog));
            }
            self.fetch_attempted = true;
            self.phase = ResolverPhase::Resolving;
            self.fetch_root = Some(target.dialog.root_id.clone());
            return ResolveStep::Fetch(target.dialog.root_id.clone());
        }

        info!(dialog = %target.dialog, "deep link resolved");
        self.phase = ResolverPhase::Resolved;
        ResolveStep::Navigate(target)
    }
}

fn question_id(intent: &DeepLinkIntent) -> String {
    match intent {
        DeepLinkIntent::Q4h { question_id, .. } => question_id.to_string(),
        _ => String::new(),
    }
}

fn question_scroll(
    question: &Q4hQuestion,
    course: u32,
    message_index: u32,
    intent_call: Option<&CallId>,
) -> ViewCommand {
    ViewCommand::ScrollToQuestion {
        question_id: question.id.clone(),
        dialog: question.dialog(),
        course,
        message_index,
        call_id: intent_call.cloned().or_else(|| question.call_site.call_id.clone()),
    }
}

/// Fill in what the intent leaves out. `None` means Q4H state is needed first.
fn complete(intent: &DeepLinkIntent, q4h: &Q4hReconciler) -> Option<DeepLinkTarget> {
    match intent {
        DeepLinkIntent::Dialog { dialog } => Some(DeepLinkTarget {
            dialog: dialog.clone(),
            course: None,
            scroll: None,
        }),
        DeepLinkIntent::Callsite {
            dialog,
            course,
            call_id,
        } => Some(DeepLinkTarget {
            dialog: dialog.clone(),
            course: Some(*course),
            scroll: Some(ViewCommand::ScrollToCallSite {
                dialog: dialog.clone(),
                course: *course,
                call_id: call_id.clone(),
            }),
        }),
        DeepLinkIntent::Genseq {
            dialog,
            course,
            genseq,
        } => Some(DeepLinkTarget {
            dialog: dialog.clone(),
            course: Some(*course),
            scroll: Some(ViewCommand::ScrollToGenseq {
                dialog: dialog.clone(),
                course: *course,
                genseq: *genseq,
            }),
        }),
        DeepLinkIntent::Q4h {
            question_id,
            course,
            message_index,
            call_id,
            ..
        } => {
            if let Some(question) = q4h.get(question_id) {
                let course = course.unwrap_or(question.call_site.course);
                let message_index = message_index.unwrap_or(question.call_site.message_index);
                return Some(DeepLinkTarget {
                    dialog: question.dialog(),
                    course: Some(course),
                    scroll: Some(question_scroll(question, course, message_index, call_id.as_ref())),
                });
            }
            // Fully specified links do not need the question to be loaded.
            let dialog = intent.dialog()?;
            let (course, message_index) = ((*course)?, (*message_index)?);
            Some(DeepLinkTarget {
                dialog: dialog.clone(),
                course: Some(course),
                scroll: Some(ViewCommand::ScrollToQuestion {
                    question_id: question_id.clone(),
                    dialog,
                    course,
                    message_index,
                    call_id: call_id.clone(),
                }),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DialogNode, DialogStatus};

    fn registry_with(nodes: Vec<DialogNode>) -> DialogRegistry {
        let mut registry = DialogRegistry::new();
        registry.replace_roots(nodes).unwrap();
        registry
    }

    #[test]
    fn no_intent_waits() {
        let mut resolver = DeepLinkResolver::new();
        let step = resolver.attempt(&DialogRegistry::new(), &Q4hReconciler::new());
        assert_eq!(step, ResolveStep::Wait);
    }

    #[test]
    fn known_dialog_resolves_immediately() {
        let registry = registry_with(vec![DialogNode::root("r1", "planner", "t.tsk")]);
        let mut resolver = DeepLinkResolver::with_intent(DeepLinkIntent::Dialog {
            dialog: DialogRef::root("r1"),
        });

        let step = resolver.attempt(&registry, &Q4hReconciler::new());

        assert!(matches!(step, ResolveStep::Navigate(DeepLinkTarget { course: None, scroll: None, .. })));
        assert_eq!(resolver.phase(), ResolverPhase::Resolved);
        assert_eq!(resolver.attempt(&registry, &Q4hReconciler::new()), ResolveStep::Wait);
    }

    #[test]
    fn unknown_dialog_fetches_once_then_abandons() {
        let registry = DialogRegistry::new();
        let q4h = Q4hReconciler::new();
        let mut resolver = DeepLinkResolver::with_intent(DeepLinkIntent::Dialog {
            dialog: DialogRef::new("r1", "s1"),
        });

        assert_eq!(resolver.attempt(&registry, &q4h), ResolveStep::Fetch("r1".into()));
        // re-entrant attempts while the fetch is in flight are ignored
        assert_eq!(resolver.attempt(&registry, &q4h), ResolveStep::Wait);

        assert!(resolver.fetch_settled(&"r1".into()));
        assert!(matches!(resolver.attempt(&registry, &q4h), ResolveStep::Abandon(_)));
        assert_eq!(resolver.phase(), ResolverPhase::Abandoned);
    }

    #[test]
    fn unrelated_fetch_does_not_rearm() {
        let mut resolver = DeepLinkResolver::with_intent(DeepLinkIntent::Dialog {
            dialog: DialogRef::root("r1"),
        });
        resolver.attempt(&DialogRegistry::new(), &Q4hReconciler::new());

        assert!(!resolver.fetch_settled(&"r2".into()));
        assert_eq!(resolver.phase(), ResolverPhase::Resolving);
    }

    #[test]
    fn question_waits_for_snapshot_then_abandons_if_missing() {
        let registry = DialogRegistry::new();
        let mut q4h = Q4hReconciler::new();
        let mut resolver = DeepLinkResolver::with_intent(DeepLinkIntent::question("q-1"));

        assert_eq!(resolver.attempt(&registry, &q4h), ResolveStep::RequestQ4h);
        assert_eq!(resolver.attempt(&registry, &q4h), ResolveStep::Wait);

        q4h.apply_snapshot(vec![], |_| Some(DialogStatus::Running)).unwrap();

        assert!(matches!(resolver.attempt(&registry, &q4h), ResolveStep::Abandon(_)));
    }

    #[test]
    fn fully_specified_question_skips_q4h() {
        let registry = registry_with(vec![DialogNode::root("r1", "planner", "t.tsk")]);
        let intent: DeepLinkIntent = "q4h/q-9?root=r1&course=2&msg=4".parse().unwrap();
        let mut resolver = DeepLinkResolver::with_intent(intent);

        match resolver.attempt(&registry, &Q4hReconciler::new()) {
            ResolveStep::Navigate(target) => {
                assert_eq!(target.dialog, DialogRef::root("r1"));
                assert_eq!(target.course, Some(2));
            }
            other => panic!("Expected navigate, got {other:?}"),
        }
    }
}
