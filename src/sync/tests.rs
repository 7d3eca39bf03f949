use std::sync::Arc;

use super::engine::placeholder_title;
use super::*;
use crate::bridge::UserBridge;
use crate::error::SyncError;
use crate::providers::tests::{Call, FakeSource, FakeTarget};

struct Harness {
    source: Arc<FakeSource>,
    target: Arc<FakeTarget>,
    engine: ReconciliationEngine,
}

fn harness_with(options: EngineOptions) -> Harness {
    let source = Arc::new(FakeSource::new());
    let target = Arc::new(FakeTarget::with_board());
    target.add_user("U_alice", "alice-gh");
    target.add_user("U_bob", "bob-gh");

    let bridge =
        UserBridge::from_json(r#"{"mapping": {"alice": "alice-gh", "bob": "bob-gh"}}"#).unwrap();
    let engine = ReconciliationEngine::new(source.clone(), target.clone(), bridge, options);
    Harness {
        source,
        target,
        engine,
    }
}

fn harness() -> Harness {
    harness_with(EngineOptions {
        board: "Roadmap".into(),
        ..EngineOptions::default()
    })
}

/// Epic E1 "Launch" with T1 "Design" (alice, To Do) and T2 "Build"
/// (unassigned, Done).
fn launch(h: &Harness) {
    h.source.add_epic("E1", "Launch");
    h.source.add_issue("T1", "Design", "To Do", Some("E1"));
    h.source.assign("T1", Some("alice"));
    h.source.add_issue("T2", "Build", "Done", Some("E1"));
}

fn assignee_calls(target: &FakeTarget) -> usize {
    target.count(|c| matches!(c, Call::AddAssignees(..) | Call::RemoveAssignees(..)))
}

#[tokio::test]
async fn first_pass_builds_the_board() {
    let h = harness();
    launch(&h);

    let report = h.engine.run_pass().await.unwrap();

    let milestones = h.target.milestones();
    assert_eq!(milestones.len(), 1);
    assert_eq!(milestones[0].title, "[E1] Launch");
    assert_eq!(milestones[0].description, "Launch epic");

    let design = h.target.issue("[T1] Design").unwrap();
    assert_eq!(h.target.logins("[T1] Design"), vec!["alice-gh"]);
    assert_eq!(design.body, "Design description");
    assert_eq!(design.milestone_id.as_deref(), Some(milestones[0].id.as_str()));
    assert!(!design.closed);
    assert_eq!(h.target.board_status(&design.id).as_deref(), Some("Todo"));

    let build = h.target.issue("[T2] Build").unwrap();
    assert!(build.assignees.is_empty());
    assert_eq!(h.target.board_status(&build.id).as_deref(), Some("Done"));

    assert_eq!(report.milestones_created, 1);
    assert_eq!(report.milestones_updated, 0);
    assert_eq!(report.issues_created, 2);
    assert_eq!(report.issues_updated, 2);
    assert_eq!(report.assignee_additions, 1);
    assert_eq!(report.issues_closed, 0);
}

#[tokio::test]
async fn placeholders_carry_the_correlation_key() {
    let h = harness();
    launch(&h);

    h.engine.run_pass().await.unwrap();

    let created: Vec<Call> = h
        .target
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::CreateIssue(_)))
        .collect();
    assert_eq!(
        created,
        vec![
            Call::CreateIssue(placeholder_title("T1")),
            Call::CreateIssue(placeholder_title("T2")),
        ]
    );
}

#[tokio::test]
async fn second_pass_is_idempotent() {
    let h = harness();
    launch(&h);
    h.engine.run_pass().await.unwrap();
    let before = h.target.issues();
    h.target.clear_calls();

    let report = h.engine.run_pass().await.unwrap();

    assert_eq!(assignee_calls(&h.target), 0);
    assert_eq!(h.target.count(|c| matches!(c, Call::CreateIssue(_))), 0);
    assert_eq!(h.target.count(|c| matches!(c, Call::CreateMilestone(_))), 0);
    assert_eq!(h.target.count(|c| matches!(c, Call::AddProjectItem(_))), 0);
    assert_eq!(h.target.count(|c| matches!(c, Call::UpdateMilestone(_))), 1);
    assert_eq!(report.issues_created, 0);
    assert_eq!(report.issues_updated, 2);

    let after = h.target.issues();
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(a.title, b.title);
        assert_eq!(a.body, b.body);
        assert_eq!(a.closed, b.closed);
        assert_eq!(a.assignees, b.assignees);
        assert_eq!(a.milestone_id, b.milestone_id);
        assert_eq!(h.target.board_status(&a.id), h.target.board_status(&b.id));
    }
}

#[tokio::test]
async fn rename_updates_instead_of_duplicating() {
    let h = harness();
    launch(&h);
    h.engine.run_pass().await.unwrap();
    let original = h.target.issue("[T1] Design").unwrap();

    h.source.rename("T1", "Design the landing page");
    h.target.clear_calls();
    h.engine.run_pass().await.unwrap();

    assert_eq!(h.target.count(|c| matches!(c, Call::CreateIssue(_))), 0);
    assert_eq!(h.target.issues().len(), 2);
    let renamed = h.target.issue("[T1] Design the landing page").unwrap();
    assert_eq!(renamed.id, original.id);
    assert!(h.target.issue("[T1] Design").is_none());
}

#[tokio::test]
async fn existing_milestone_is_reused_and_retitled() {
    let h = harness();
    h.target.add_milestone("[E1] Old launch name");
    launch(&h);

    let report = h.engine.run_pass().await.unwrap();

    let milestones = h.target.milestones();
    assert_eq!(milestones.len(), 1);
    assert_eq!(milestones[0].title, "[E1] Launch");
    assert_eq!(h.target.count(|c| matches!(c, Call::CreateMilestone(_))), 0);
    assert_eq!(report.milestones_created, 0);
    assert_eq!(report.milestones_updated, 1);
}

#[tokio::test]
async fn new_milestones_are_not_counted_as_updated() {
    let h = harness();
    launch(&h);
    h.source.add_epic("E2", "Hardening");

    let first = h.engine.run_pass().await.unwrap();
    assert_eq!(first.milestones_created, 2);
    assert_eq!(first.milestones_updated, 0);
    assert_eq!(h.target.count(|c| matches!(c, Call::UpdateMilestone(_))), 2);

    let second = h.engine.run_pass().await.unwrap();
    assert_eq!(second.milestones_created, 0);
    assert_eq!(second.milestones_updated, 2);
}

#[tokio::test]
async fn orphans_are_closed_exactly_once() {
    let h = harness();
    launch(&h);
    let orphan = h.target.add_issue("[OLD-1] Legacy task", false, &[]);
    let manual = h.target.add_issue("Manually filed bug", false, &[]);

    let report = h.engine.run_pass().await.unwrap();
    assert_eq!(report.issues_closed, 1);

    let closes_of = |target: &FakeTarget, id: &str| {
        target.count(|c| matches!(c, Call::UpdateIssue(u) if u.id == id && u.closed))
    };
    assert_eq!(closes_of(&h.target, &orphan), 1);
    assert!(h.target.issue("[OLD-1] Legacy task").unwrap().closed);
    assert!(!h.target.issue("Manually filed bug").unwrap().closed);
    assert_eq!(h.target.count(|c| matches!(c, Call::UpdateIssue(u) if u.id == manual)), 0);

    h.target.clear_calls();
    let report = h.engine.run_pass().await.unwrap();
    assert_eq!(report.issues_closed, 0);
    assert_eq!(h.target.count(|c| matches!(c, Call::UpdateIssue(u) if u.id == orphan)), 0);
}

#[tokio::test]
async fn removed_source_issue_is_closed_and_not_re_registered() {
    let h = harness();
    launch(&h);
    h.engine.run_pass().await.unwrap();
    let build = h.target.issue("[T2] Build").unwrap();

    h.source.remove_issue("T2");
    h.target.clear_calls();
    h.engine.run_pass().await.unwrap();

    assert!(h.target.issue("[T2] Build").unwrap().closed);
    assert_eq!(
        h.target
            .count(|c| matches!(c, Call::SetField { .. })),
        1,
        "only the live issue gets its status set"
    );
    assert_eq!(h.target.count(|c| *c == Call::DeleteIssue(build.id.clone())), 0);
}

#[tokio::test]
async fn reassignment_is_one_remove_and_one_add() {
    let h = harness();
    launch(&h);
    h.engine.run_pass().await.unwrap();
    let design = h.target.issue("[T1] Design").unwrap();

    h.source.assign("T1", Some("bob"));
    h.target.clear_calls();
    h.engine.run_pass().await.unwrap();

    let assignment: Vec<Call> = h
        .target
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::AddAssignees(..) | Call::RemoveAssignees(..)))
        .collect();
    assert_eq!(
        assignment,
        vec![
            Call::RemoveAssignees(design.id.clone(), vec!["U_alice".into()]),
            Call::AddAssignees(design.id.clone(), vec!["U_bob".into()]),
        ]
    );
    assert_eq!(h.target.logins("[T1] Design"), vec!["bob-gh"]);
}

#[tokio::test]
async fn unassigning_in_source_clears_the_target() {
    let h = harness();
    launch(&h);
    h.engine.run_pass().await.unwrap();

    h.source.assign("T1", None);
    h.engine.run_pass().await.unwrap();

    assert!(h.target.logins("[T1] Design").is_empty());
}

#[tokio::test]
async fn unmapped_assignee_keeps_current_assignees() {
    let h = harness();
    launch(&h);
    h.engine.run_pass().await.unwrap();

    h.source.assign("T1", Some("carol"));
    h.target.clear_calls();
    let report = h.engine.run_pass().await.unwrap();

    assert_eq!(report.unmapped_assignees, 1);
    assert_eq!(assignee_calls(&h.target), 0);
    assert_eq!(h.target.logins("[T1] Design"), vec!["alice-gh"]);
}

#[tokio::test]
async fn bridged_users_are_resolved_once_per_pass() {
    let h = harness();
    h.source.add_issue("T1", "One", "To Do", None);
    h.source.add_issue("T2", "Two", "To Do", None);
    h.source.assign("T1", Some("alice"));
    h.source.assign("T2", Some("alice"));

    h.engine.run_pass().await.unwrap();

    assert_eq!(
        h.target.count(|c| *c == Call::GetUser("alice-gh".into())),
        1
    );
}

#[tokio::test]
async fn status_changes_move_the_board_item() {
    let h = harness();
    launch(&h);
    h.engine.run_pass().await.unwrap();

    h.source.set_status("T1", "In Review");
    h.engine.run_pass().await.unwrap();

    let design = h.target.issue("[T1] Design").unwrap();
    assert_eq!(h.target.board_status(&design.id).as_deref(), Some("In Progress"));
}

#[tokio::test]
async fn unknown_status_aborts_before_touching_issues() {
    let h = harness();
    launch(&h);
    h.source.set_status("T2", "Waiting for QA");

    let err = h.engine.run_pass().await.unwrap_err();

    assert!(matches!(err, SyncError::MappingExhausted(ref s) if s == "Waiting for QA"));
    assert!(h.target.issues().is_empty());
}

#[tokio::test]
async fn missing_board_is_not_found() {
    let h = harness();
    launch(&h);
    h.target.remove_board();

    let err = h.engine.run_pass().await.unwrap_err();

    assert!(matches!(err, SyncError::NotFound { kind: "board project", .. }));
    assert!(h.target.calls().is_empty());
}

#[tokio::test]
async fn missing_issue_type_is_not_found() {
    let h = harness_with(EngineOptions {
        board: "Roadmap".into(),
        issue_type: "Story".into(),
        ..EngineOptions::default()
    });
    launch(&h);

    let err = h.engine.run_pass().await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound { kind: "issue type", .. }));
}

#[tokio::test]
async fn dangling_bridge_entry_aborts_the_pass() {
    let source = Arc::new(FakeSource::new());
    let target = Arc::new(FakeTarget::with_board());
    source.add_issue("T1", "Design", "To Do", None);
    source.assign("T1", Some("alice"));
    let bridge = UserBridge::from_json(r#"{"mapping": {"alice": "ghost"}}"#).unwrap();
    let engine = ReconciliationEngine::new(
        source,
        target,
        bridge,
        EngineOptions {
            board: "Roadmap".into(),
            ..EngineOptions::default()
        },
    );

    let err = engine.run_pass().await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound { kind: "target user", .. }));
}

#[tokio::test]
async fn transport_failure_aborts_and_keeps_earlier_mutations() {
    let h = harness();
    launch(&h);
    h.target.fail_on("update_issue");

    let err = h.engine.run_pass().await.unwrap_err();
    assert!(matches!(err, SyncError::Transport(_)));

    // The placeholder for T1 survives and is picked up by the next pass.
    let issues = h.target.issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].title, placeholder_title("T1"));

    h.target.recover();
    h.target.clear_calls();
    h.engine.run_pass().await.unwrap();

    assert_eq!(
        h.target.calls().into_iter().filter(|c| matches!(c, Call::CreateIssue(_))).collect::<Vec<_>>(),
        vec![Call::CreateIssue(placeholder_title("T2"))]
    );
    assert!(h.target.issue("[T1] Design").is_some());
    assert_eq!(h.target.issues().len(), 2);
}

#[tokio::test]
async fn duplicate_keys_update_only_the_oldest() {
    let h = harness();
    h.source.add_issue("T1", "Design", "To Do", None);
    let oldest = h.target.add_issue("[T1] Design", false, &[]);
    let copy = h.target.add_issue("[T1] Design (copy)", false, &[]);

    h.engine.run_pass().await.unwrap();

    assert_eq!(h.target.count(|c| matches!(c, Call::CreateIssue(_))), 0);
    assert_eq!(h.target.count(|c| matches!(c, Call::UpdateIssue(u) if u.id == oldest)), 1);
    assert_eq!(h.target.count(|c| matches!(c, Call::UpdateIssue(u) if u.id == copy)), 0);
}

#[tokio::test]
async fn close_done_closes_finished_tasks() {
    let h = harness_with(EngineOptions {
        board: "Roadmap".into(),
        close_done: true,
        ..EngineOptions::default()
    });
    launch(&h);

    h.engine.run_pass().await.unwrap();

    assert!(h.target.issue("[T2] Build").unwrap().closed);
    assert!(!h.target.issue("[T1] Design").unwrap().closed);
}

#[tokio::test]
async fn reappearing_source_issue_reopens_its_target() {
    let h = harness();
    launch(&h);
    h.engine.run_pass().await.unwrap();

    h.source.remove_issue("T1");
    h.engine.run_pass().await.unwrap();
    assert!(h.target.issue("[T1] Design").unwrap().closed);

    h.source.add_issue("T1", "Design", "In Progress", Some("E1"));
    h.engine.run_pass().await.unwrap();

    let design = h.target.issue("[T1] Design").unwrap();
    assert!(!design.closed);
    assert_eq!(h.target.issues().len(), 2);
}
