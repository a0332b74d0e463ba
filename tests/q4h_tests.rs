use dialog_sync::error::SyncError;
use dialog_sync::model::{DialogRef, DialogStatus, Q4hQuestion};
use dialog_sync::q4h::{group_by_dialog, Q4hReconciler};
use dialog_sync::registry::MergeOutcome;

fn question(id: &str, root: &str, self_id: &str) -> Q4hQuestion {
    Q4hQuestion::new(id, DialogRef::new(root, self_id), 1, 0)
}

fn running(_: &DialogRef) -> Option<DialogStatus> {
    Some(DialogStatus::Running)
}

fn unknown(_: &DialogRef) -> Option<DialogStatus> {
    None
}

#[test]
fn asking_the_same_id_twice_is_an_error() {
    let mut q4h = Q4hReconciler::new();
    q4h.apply_asked(question("q-1", "r1", "r1")).unwrap();

    let err = q4h
        .apply_asked(question("q-1", "r1", "r1").with_content("rewritten"))
        .unwrap_err();

    assert!(matches!(err, SyncError::DuplicateQuestion { .. }));
    assert_eq!(q4h.held_len(), 1);
    assert_eq!(q4h.held()[0].tellask_content, "");
}

#[test]
fn answered_unknown_id_is_a_noop() {
    let mut q4h = Q4hReconciler::new();
    assert!(!q4h.apply_answered(&"q-404".into()));
    assert_eq!(q4h.revision(), 0);
}

#[test]
fn snapshot_keeps_questions_of_unknown_status() {
    let mut q4h = Q4hReconciler::new();
    q4h.apply_asked(question("q-1", "r1", "s1")).unwrap();

    let outcome = q4h.apply_snapshot(vec![], unknown).unwrap();

    assert_eq!(outcome, MergeOutcome::Unchanged);
    assert_eq!(q4h.held_len(), 1);
}

#[test]
fn snapshot_drops_absent_questions_of_running_dialogs() {
    let mut q4h = Q4hReconciler::new();
    q4h.apply_asked(question("q-1", "r1", "r1")).unwrap();
    q4h.apply_asked(question("q-2", "r2", "r2")).unwrap();

    q4h.apply_snapshot(vec![question("q-2", "r2", "r2")], running)
        .unwrap();

    assert!(q4h.get(&"q-1".into()).is_none());
    assert!(q4h.get(&"q-2".into()).is_some());
}

#[test]
fn snapshot_keeps_hidden_bucket_questions() {
    let mut q4h = Q4hReconciler::new();
    q4h.apply_asked(question("q-1", "r1", "r1")).unwrap();

    q4h.apply_snapshot(vec![], |_| Some(DialogStatus::Completed))
        .unwrap();

    assert_eq!(q4h.held_len(), 1);
    assert!(q4h.visible(|_| Some(DialogStatus::Completed)).is_empty());
    assert_eq!(q4h.visible(running).len(), 1);
}

#[test]
fn snapshot_with_duplicate_ids_is_rejected_atomically() {
    let mut q4h = Q4hReconciler::new();
    q4h.apply_asked(question("q-1", "r1", "r1")).unwrap();

    let err = q4h
        .apply_snapshot(
            vec![question("q-2", "r1", "r1"), question("q-2", "r1", "r1")],
            running,
        )
        .unwrap_err();

    assert!(matches!(err, SyncError::DuplicateInSnapshot { .. }));
    assert_eq!(q4h.held_len(), 1);
    assert_eq!(q4h.snapshot_generation(), 0);
}

#[test]
fn snapshot_replaces_held_copy_with_fresh_one() {
    let mut q4h = Q4hReconciler::new();
    q4h.apply_asked(question("q-1", "r1", "r1")).unwrap();

    q4h.apply_snapshot(
        vec![question("q-1", "r1", "r1").with_content("fresh")],
        running,
    )
    .unwrap();

    assert_eq!(q4h.held_len(), 1);
    assert_eq!(q4h.held()[0].tellask_content, "fresh");
}

#[test]
fn groups_put_root_owned_questions_first() {
    let questions = vec![
        question("q-1", "r1", "s1"),
        question("q-2", "r2", "r2"),
        question("q-3", "r1", "s1"),
        question("q-4", "r1", "r1"),
    ];

    let groups = group_by_dialog(&questions);

    let order: Vec<_> = groups.iter().map(|g| g.dialog.to_string()).collect();
    assert_eq!(order, vec!["r2", "r1", "r1/s1"]);
    assert_eq!(groups[2].questions.len(), 2);
}
