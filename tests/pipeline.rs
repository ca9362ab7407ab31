//! Pipeline State Machine Integration Tests
//!
//! Stage transitions, the single-active-move rule, stage buckets, and
//! pipeline metrics.

use std::sync::Arc;

use donorflow::domain::{MoveFilter, NewDonorMove, PipelineStage, Priority};
use donorflow::engine::Pipeline;
use donorflow::{Error, Store};
use uuid::Uuid;

fn pipeline() -> Pipeline {
    Pipeline::new(Arc::new(Store::in_memory()))
}

#[tokio::test]
async fn test_advance_stage_updates_history() {
    let pipeline = pipeline();
    let m = pipeline
        .create_move(NewDonorMove::new(Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(m.current_stage, PipelineStage::Identification);
    assert_eq!(m.previous_stage, None);

    let advanced = pipeline
        .advance_stage(m.id, PipelineStage::Cultivation)
        .await
        .unwrap();

    assert_eq!(advanced.current_stage, PipelineStage::Cultivation);
    assert_eq!(advanced.previous_stage, Some(PipelineStage::Identification));
    assert!(advanced.stage_entered_at > m.stage_entered_at);
}

#[tokio::test]
async fn test_advance_to_same_stage_is_noop() {
    let pipeline = pipeline();
    let m = pipeline
        .create_move(NewDonorMove::new(Uuid::new_v4()).with_stage(PipelineStage::Qualification))
        .await
        .unwrap();

    let unchanged = pipeline
        .advance_stage(m.id, PipelineStage::Qualification)
        .await
        .unwrap();

    // Nothing changes, including stage_entered_at and updated_at.
    assert_eq!(unchanged, m);
}

#[tokio::test]
async fn test_any_stage_reachable_from_any_other() {
    let pipeline = pipeline();
    let m = pipeline
        .create_move(NewDonorMove::new(Uuid::new_v4()))
        .await
        .unwrap();

    // Jump straight to stewardship, then regress to identification.
    let jumped = pipeline
        .advance_stage(m.id, PipelineStage::Stewardship)
        .await
        .unwrap();
    assert_eq!(jumped.current_stage, PipelineStage::Stewardship);

    let regressed = pipeline
        .advance_stage(m.id, PipelineStage::Identification)
        .await
        .unwrap();
    assert_eq!(regressed.current_stage, PipelineStage::Identification);
    assert_eq!(regressed.previous_stage, Some(PipelineStage::Stewardship));
}

#[tokio::test]
async fn test_stage_guard_can_reject() {
    let store = Arc::new(Store::in_memory());
    let pipeline = Pipeline::new(store).with_stage_guard(Box::new(|from, to| {
        if from == PipelineStage::Identification && to == PipelineStage::Stewardship {
            Err("cannot skip straight to stewardship".to_string())
        } else {
            Ok(())
        }
    }));

    let m = pipeline
        .create_move(NewDonorMove::new(Uuid::new_v4()))
        .await
        .unwrap();

    let err = pipeline
        .advance_stage(m.id, PipelineStage::Stewardship)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // Other transitions still pass.
    pipeline
        .advance_stage(m.id, PipelineStage::Qualification)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_advance_unknown_move_is_not_found() {
    let pipeline = pipeline();
    let err = pipeline
        .advance_stage(Uuid::new_v4(), PipelineStage::Cultivation)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn test_one_active_move_per_client() {
    let pipeline = pipeline();
    let client_id = Uuid::new_v4();

    pipeline
        .create_move(NewDonorMove::new(client_id))
        .await
        .unwrap();
    let err = pipeline
        .create_move(NewDonorMove::new(client_id))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    // After retiring the active move a new one is accepted.
    let active = pipeline.active_move_for_client(client_id).await.unwrap();
    pipeline.retire_move(active.id).await.unwrap();
    pipeline
        .create_move(NewDonorMove::new(client_id))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_metrics_treat_missing_target_as_zero_value() {
    let pipeline = pipeline();

    pipeline
        .create_move(NewDonorMove::new(Uuid::new_v4()).with_target_gift(5000.0))
        .await
        .unwrap();
    pipeline
        .create_move(NewDonorMove::new(Uuid::new_v4()).with_target_gift(2500.0))
        .await
        .unwrap();
    // No target amount: counts toward totals, contributes no value.
    pipeline
        .create_move(NewDonorMove::new(Uuid::new_v4()))
        .await
        .unwrap();

    let metrics = pipeline.metrics().await;
    assert_eq!(metrics.total_active, 3);
    assert!((metrics.total_value - 7500.0).abs() < f64::EPSILON);

    let identification = &metrics.stages[0];
    assert_eq!(identification.stage, PipelineStage::Identification);
    assert_eq!(identification.count, 3);
    assert!((identification.value - 7500.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_retired_moves_excluded_from_board_and_metrics() {
    let pipeline = pipeline();

    let kept = pipeline
        .create_move(NewDonorMove::new(Uuid::new_v4()).with_target_gift(100.0))
        .await
        .unwrap();
    let retired = pipeline
        .create_move(NewDonorMove::new(Uuid::new_v4()).with_target_gift(900.0))
        .await
        .unwrap();
    pipeline.retire_move(retired.id).await.unwrap();

    let metrics = pipeline.metrics().await;
    assert_eq!(metrics.total_active, 1);
    assert!((metrics.total_value - 100.0).abs() < f64::EPSILON);

    let board = pipeline.list_by_stage(&MoveFilter::default()).await;
    let column = board.column(PipelineStage::Identification);
    assert_eq!(column.moves.len(), 1);
    assert_eq!(column.moves[0].id, kept.id);
}

#[tokio::test]
async fn test_board_has_all_six_buckets_and_filters() {
    let pipeline = pipeline();

    pipeline
        .create_move(
            NewDonorMove::new(Uuid::new_v4())
                .with_donor_type("individual")
                .with_giving_capacity("major"),
        )
        .await
        .unwrap();
    pipeline
        .create_move(
            NewDonorMove::new(Uuid::new_v4())
                .with_stage(PipelineStage::Lapsed)
                .with_donor_type("foundation")
                .with_giving_capacity("major"),
        )
        .await
        .unwrap();

    let board = pipeline.list_by_stage(&MoveFilter::default()).await;
    assert_eq!(board.columns.len(), 6);
    assert_eq!(board.column(PipelineStage::Lapsed).moves.len(), 1);

    // Filters AND-combine.
    let filter = MoveFilter {
        donor_type: Some("individual".to_string()),
        giving_capacity: Some("major".to_string()),
    };
    let board = pipeline.list_by_stage(&filter).await;
    assert_eq!(board.column(PipelineStage::Identification).moves.len(), 1);
    assert_eq!(board.column(PipelineStage::Lapsed).moves.len(), 0);
}

#[tokio::test]
async fn test_affinity_score_validated() {
    let pipeline = pipeline();
    let err = pipeline
        .create_move(NewDonorMove::new(Uuid::new_v4()).with_affinity_score(101))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_update_move_preserves_stage_fields() {
    let pipeline = pipeline();
    let m = pipeline
        .create_move(NewDonorMove::new(Uuid::new_v4()))
        .await
        .unwrap();

    let updated = pipeline
        .update_move(
            m.id,
            donorflow::domain::MoveUpdate {
                priority: Some(Priority::Urgent),
                notes: Some("board member introduction".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.priority, Priority::Urgent);
    assert_eq!(updated.current_stage, m.current_stage);
    assert_eq!(updated.stage_entered_at, m.stage_entered_at);
}
