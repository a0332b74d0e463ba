use std::collections::BTreeMap;

use tracing::debug;

use super::state::{AppState, DialogView};
use crate::model::{DialogId, DialogRef};

/// Which view a dialog-scoped message is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    Main,
    Subdialog(DialogId),
}

/// Pick the destination view for a message addressed to `target`.
///
/// 1. No target: main view.
/// 2. The main view displays `target`: main view.
/// 3. A standalone view for `target` exists: that view.
/// 4. Otherwise: main view, which accepts only what it displays.
pub fn resolve_route<V>(
    displayed: Option<&DialogRef>,
    tracked: &BTreeMap<DialogId, V>,
    target: Option<&DialogId>,
) -> RouteTarget {
    let Some(target) = target else {
        return RouteTarget::Main;
    };
    if displayed.is_some_and(|d| &d.self_id == target) {
        return RouteTarget::Main;
    }
    if tracked.contains_key(target) {
        return RouteTarget::Subdialog(target.clone());
    }
    RouteTarget::Main
}

/// Route a message for `dialog` and return the view that accepts it.
/// Views only take events for the dialog they currently show.
pub fn deliver<'a>(state: &'a mut AppState, dialog: &DialogRef) -> Option<&'a mut DialogView> {
    let route = resolve_route(
        state.main.dialog.as_ref(),
        &state.subdialog_views,
        Some(&dialog.self_id),
    );
    let view = match &route {
        RouteTarget::Main => &mut state.main,
        RouteTarget::Subdialog(id) => state.subdialog_views.get_mut(id)?,
    };
    if view.shows(dialog) {
        Some(view)
    } else {
        debug!(dialog = %dialog, route = ?route, "dropping event for dialog not on display");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked(ids: &[&str]) -> BTreeMap<DialogId, ()> {
        ids.iter().map(|id| (DialogId::from(*id), ())).collect()
    }

    #[test]
    fn untargeted_goes_to_main() {
        let route = resolve_route(None, &tracked(&["s1"]), None);
        assert_eq!(route, RouteTarget::Main);
    }

    #[test]
    fn displayed_dialog_goes_to_main_even_when_tracked() {
        let shown = DialogRef::new("r1", "s1");
        let route = resolve_route(Some(&shown), &tracked(&["s1"]), Some(&"s1".into()));
        assert_eq!(route, RouteTarget::Main);
    }

    #[test]
    fn tracked_view_gets_its_events() {
        let shown = DialogRef::root("r1");
        let route = resolve_route(Some(&shown), &tracked(&["s1"]), Some(&"s1".into()));
        assert_eq!(route, RouteTarget::Subdialog("s1".into()));
    }

    #[test]
    fn unknown_target_falls_back_to_main() {
        let route = resolve_route(None, &tracked(&[]), Some(&"s9".into()));
        assert_eq!(route, RouteTarget::Main);
    }

    #[test]
    fn main_rejects_events_for_other_dialogs() {
        let mut state = AppState::new();
        state.main = DialogView::showing(DialogRef::new("r1", "s1"), Some(1));

        assert!(deliver(&mut state, &DialogRef::root("r1")).is_none());
        assert!(deliver(&mut state, &DialogRef::new("r1", "s1")).is_some());
    }
}
