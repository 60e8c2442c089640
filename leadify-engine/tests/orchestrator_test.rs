//! Integration tests for the research orchestrator state machine
//!
//! All collaborators are deterministic stubs, so every assertion here
//! (stop conditions, resume equivalence, query non-repetition) is exact.

mod common;

use common::{assignment, engine_config, orchestrator, ExtractionMode, ResearchLlm};
use leadify_engine::research::query::normalize_query;
use leadify_engine::{EngineError, ResearchStatus};
use std::collections::HashSet;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn reaches_target_and_stops_without_extra_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let llm = ResearchLlm::new(9.0, ExtractionMode::FromMarker);

    // 2 sources per cycle, each yielding one unique entity: cycle totals
    // run 2, 4, 6. The target of 5 is reached at the end of cycle 3, so
    // no cycle 4 may start even though max_cycles allows 10.
    let (mut orch, _handle) = orchestrator(llm, dir.path(), engine_config());
    let outcome = orch.run(assignment(5, 10, 2)).await.unwrap();

    assert_eq!(outcome.status, ResearchStatus::Complete);
    assert_eq!(outcome.cycles_run, 3);
    assert!(outcome.snapshot.total_entities() >= 5);
}

#[tokio::test]
async fn exhausting_max_cycles_completes() {
    let dir = tempfile::tempdir().unwrap();
    let llm = ResearchLlm::new(9.0, ExtractionMode::FromMarker);

    let (mut orch, _handle) = orchestrator(llm, dir.path(), engine_config());
    let outcome = orch.run(assignment(100, 2, 2)).await.unwrap();

    assert_eq!(outcome.status, ResearchStatus::Complete);
    assert_eq!(outcome.cycles_run, 2);
    // Target unmet, budget spent
    assert!(outcome.snapshot.total_entities() < 100);
}

#[tokio::test]
async fn two_zero_yield_cycles_trigger_diminishing_returns_stop() {
    let dir = tempfile::tempdir().unwrap();
    // Sources score well but never contain a relevant entity
    let llm = ResearchLlm::new(9.0, ExtractionMode::Empty);

    let (mut orch, _handle) = orchestrator(llm, dir.path(), engine_config());
    let outcome = orch.run(assignment(10, 20, 2)).await.unwrap();

    assert_eq!(outcome.status, ResearchStatus::Complete);
    assert_eq!(outcome.cycles_run, 2);
    assert_eq!(outcome.snapshot.total_entities(), 0);
}

#[tokio::test]
async fn rejected_sources_yield_no_extraction_calls() {
    let dir = tempfile::tempdir().unwrap();
    // Every source scores 2, far below the 7.0 threshold
    let llm = ResearchLlm::new(2.0, ExtractionMode::FromMarker);

    let (mut orch, _handle) = orchestrator(llm.clone(), dir.path(), engine_config());
    let outcome = orch.run(assignment(10, 20, 2)).await.unwrap();

    // Nothing accepted -> nothing extracted -> diminishing returns stop
    assert_eq!(outcome.status, ResearchStatus::Complete);
    assert_eq!(outcome.cycles_run, 2);
    assert_eq!(outcome.snapshot.total_entities(), 0);
    assert_eq!(outcome.snapshot.sources_accepted, 0);
    assert!(outcome.snapshot.sources_rejected > 0);

    // Per cycle: 1 query-generation call + 2 evaluation calls, never more
    let calls = llm.calls.load(Ordering::SeqCst);
    assert_eq!(calls, 6, "extraction must not be called for rejected sources");
}

#[tokio::test]
async fn malformed_extraction_never_crashes_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let llm = ResearchLlm::new(9.0, ExtractionMode::Malformed);

    let (mut orch, _handle) = orchestrator(llm, dir.path(), engine_config());
    let outcome = orch.run(assignment(10, 20, 2)).await.unwrap();

    // Two malformed responses per source degrade to zero findings,
    // which then trips the diminishing-returns stop.
    assert_eq!(outcome.status, ResearchStatus::Complete);
    assert_eq!(outcome.snapshot.total_entities(), 0);
    assert!(outcome.snapshot.sources_accepted > 0);
}

#[tokio::test]
async fn queries_never_repeat_across_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let llm = ResearchLlm::new(9.0, ExtractionMode::FromMarker);

    let (mut orch, _handle) = orchestrator(llm, dir.path(), engine_config());
    let a = assignment(100, 4, 3);
    let signature = a.signature();
    let outcome = orch.run(a).await.unwrap();
    assert_eq!(outcome.cycles_run, 4);

    let checkpoints = leadify_engine::CheckpointStore::new(dir.path()).unwrap();
    let checkpoint = checkpoints.load_latest(&signature).await.unwrap().unwrap();

    let normalized: Vec<String> = checkpoint
        .issued_queries
        .iter()
        .map(|q| normalize_query(q))
        .collect();
    let distinct: HashSet<&String> = normalized.iter().collect();
    assert_eq!(
        normalized.len(),
        distinct.len(),
        "a query was issued twice: {:?}",
        normalized
    );

    // The per-cycle records agree with the global history
    let from_cycles: usize = checkpoint.cycles.iter().map(|c| c.queries.len()).sum();
    assert_eq!(from_cycles, normalized.len());
}

#[tokio::test]
async fn resume_after_every_cycle_matches_uninterrupted_run() {
    let a = assignment(7, 5, 2);

    // Uninterrupted reference run
    let reference_dir = tempfile::tempdir().unwrap();
    let llm = ResearchLlm::new(9.0, ExtractionMode::FromMarker);
    let (mut orch, _handle) = orchestrator(llm, reference_dir.path(), engine_config());
    let reference = orch.run(a.clone()).await.unwrap();
    assert_eq!(reference.status, ResearchStatus::Complete);

    // Forced-restart run: a fresh orchestrator per cycle, one cycle per
    // process, always resuming from the checkpoint.
    let restart_dir = tempfile::tempdir().unwrap();
    let mut capped = engine_config();
    capped.cycles_per_run = Some(1);

    let mut last = None;
    for _ in 0..20 {
        let llm = ResearchLlm::new(9.0, ExtractionMode::FromMarker);
        let (mut orch, _handle) = orchestrator(llm, restart_dir.path(), capped.clone());
        let outcome = orch.run(a.clone()).await.unwrap();
        let done = outcome.status == ResearchStatus::Complete;
        last = Some(outcome);
        if done {
            break;
        }
    }
    let restarted = last.expect("at least one run");
    assert_eq!(restarted.status, ResearchStatus::Complete);

    assert_eq!(restarted.cycles_run, reference.cycles_run);

    let reference_entities = serde_json::to_value(
        reference
            .snapshot
            .hot
            .iter()
            .chain(&reference.snapshot.warm)
            .chain(&reference.snapshot.cold)
            .collect::<Vec<_>>(),
    )
    .unwrap();
    let restarted_entities = serde_json::to_value(
        restarted
            .snapshot
            .hot
            .iter()
            .chain(&restarted.snapshot.warm)
            .chain(&restarted.snapshot.cold)
            .collect::<Vec<_>>(),
    )
    .unwrap();
    assert_eq!(reference_entities, restarted_entities);
}

#[tokio::test]
async fn completed_assignment_does_not_rerun() {
    let dir = tempfile::tempdir().unwrap();
    let a = assignment(3, 5, 2);

    let llm = ResearchLlm::new(9.0, ExtractionMode::FromMarker);
    let (mut orch, _handle) = orchestrator(llm, dir.path(), engine_config());
    let first = orch.run(a.clone()).await.unwrap();
    assert_eq!(first.status, ResearchStatus::Complete);

    // Second run returns the checkpointed result without any LLM traffic
    let llm = ResearchLlm::new(9.0, ExtractionMode::FromMarker);
    let (mut orch, _handle) = orchestrator(llm.clone(), dir.path(), engine_config());
    let second = orch.run(a).await.unwrap();

    assert_eq!(second.status, ResearchStatus::Complete);
    assert_eq!(second.cycles_run, first.cycles_run);
    assert_eq!(
        second.snapshot.total_entities(),
        first.snapshot.total_entities()
    );
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn abort_signal_exits_with_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let llm = ResearchLlm::new(9.0, ExtractionMode::FromMarker);

    let (mut orch, handle) = orchestrator(llm, dir.path(), engine_config());
    handle.abort();

    let a = assignment(10, 5, 2);
    let signature = a.signature();
    let outcome = orch.run(a).await.unwrap();

    assert_eq!(outcome.status, ResearchStatus::Aborted);
    assert_eq!(outcome.cycles_run, 0);

    let checkpoints = leadify_engine::CheckpointStore::new(dir.path()).unwrap();
    let checkpoint = checkpoints.load_latest(&signature).await.unwrap().unwrap();
    assert_eq!(checkpoint.status, ResearchStatus::Aborted);
}

#[tokio::test]
async fn repeated_llm_failures_escalate_to_failed() {
    let dir = tempfile::tempdir().unwrap();
    let llm = ResearchLlm::failing();

    let (mut orch, _handle) = orchestrator(llm, dir.path(), engine_config());
    let a = assignment(10, 5, 2);
    let signature = a.signature();

    let err = orch.run(a).await.unwrap_err();
    match err {
        EngineError::CollaboratorUnavailable {
            consecutive_failures,
        } => assert!(consecutive_failures >= 3),
        other => panic!("expected CollaboratorUnavailable, got {:?}", other),
    }

    // The failure still leaves a resumable checkpoint behind
    let checkpoints = leadify_engine::CheckpointStore::new(dir.path()).unwrap();
    let checkpoint = checkpoints.load_latest(&signature).await.unwrap().unwrap();
    assert_eq!(checkpoint.status, ResearchStatus::Failed);
}

#[tokio::test]
async fn invalid_assignment_fails_fast_without_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let llm = ResearchLlm::new(9.0, ExtractionMode::FromMarker);

    let (mut orch, _handle) = orchestrator(llm, dir.path(), engine_config());
    let mut a = assignment(10, 5, 2);
    a.objective = "  ".to_string();

    let err = orch.run(a).await.unwrap_err();
    match err {
        EngineError::InvalidAssignment { field, .. } => {
            assert_eq!(field.as_deref(), Some("objective"));
        }
        other => panic!("expected InvalidAssignment, got {:?}", other),
    }

    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(files.is_empty(), "no checkpoint may be written");
}
