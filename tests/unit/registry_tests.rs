//! Unit tests for the stage table, transition rules, and weighted progress.

use std::str::FromStr;

use pipeline_progress::models::stage::{Stage, StageInfo};
use pipeline_progress::registry::StageRegistry;
use pipeline_progress::AppError;

const ALL: [Stage; 9] = [
    Stage::Idle,
    Stage::Uploading,
    Stage::Preprocessing,
    Stage::AiAnalysis,
    Stage::DataExtraction,
    Stage::Validation,
    Stage::Completed,
    Stage::Error,
    Stage::Cancelled,
];

#[test]
fn working_stage_weights_sum_to_one() {
    let registry = StageRegistry::default();
    let sum: f64 = Stage::WORKING.iter().map(|s| registry.weight(*s)).sum();
    assert!((sum - 1.0).abs() < 1e-9, "weights sum to {sum}");
    assert!((registry.weight(Stage::Uploading) - 0.05).abs() < 1e-12);
    assert!((registry.weight(Stage::Preprocessing) - 0.15).abs() < 1e-12);
    assert!((registry.weight(Stage::AiAnalysis) - 0.60).abs() < 1e-12);
    assert!((registry.weight(Stage::DataExtraction) - 0.15).abs() < 1e-12);
    assert!((registry.weight(Stage::Validation) - 0.05).abs() < 1e-12);
}

#[test]
fn non_working_stage_weights() {
    let registry = StageRegistry::default();
    assert_eq!(registry.weight(Stage::Completed), 1.0);
    assert_eq!(registry.weight(Stage::Idle), 0.0);
    assert_eq!(registry.weight(Stage::Error), 0.0);
    assert_eq!(registry.weight(Stage::Cancelled), 0.0);
}

#[test]
fn next_stage_follows_pipeline_order() {
    let registry = StageRegistry::default();
    assert_eq!(registry.next_stage(Stage::Idle), Some(Stage::Uploading));
    assert_eq!(registry.next_stage(Stage::Uploading), Some(Stage::Preprocessing));
    assert_eq!(registry.next_stage(Stage::Preprocessing), Some(Stage::AiAnalysis));
    assert_eq!(registry.next_stage(Stage::AiAnalysis), Some(Stage::DataExtraction));
    assert_eq!(registry.next_stage(Stage::DataExtraction), Some(Stage::Validation));
    assert_eq!(registry.next_stage(Stage::Validation), Some(Stage::Completed));
    assert_eq!(registry.next_stage(Stage::Completed), None);
    assert_eq!(registry.next_stage(Stage::Error), None);
    assert_eq!(registry.next_stage(Stage::Cancelled), None);
}

#[test]
fn error_and_cancelled_reachable_from_every_stage() {
    let registry = StageRegistry::default();
    for from in ALL {
        assert!(registry.is_valid_transition(from, Stage::Error), "{from} -> error");
        assert!(registry.is_valid_transition(from, Stage::Cancelled), "{from} -> cancelled");
    }
}

#[test]
fn restart_to_idle_only_from_terminal_stages() {
    let registry = StageRegistry::default();
    for from in ALL {
        let expected = matches!(from, Stage::Completed | Stage::Error | Stage::Cancelled);
        assert_eq!(
            registry.is_valid_transition(from, Stage::Idle),
            expected,
            "{from} -> idle"
        );
    }
}

#[test]
fn skipping_or_going_backwards_is_rejected() {
    let registry = StageRegistry::default();
    assert!(!registry.is_valid_transition(Stage::Idle, Stage::DataExtraction));
    assert!(!registry.is_valid_transition(Stage::Idle, Stage::Completed));
    assert!(!registry.is_valid_transition(Stage::AiAnalysis, Stage::Preprocessing));
    assert!(!registry.is_valid_transition(Stage::Completed, Stage::Uploading));
    assert!(!registry.is_valid_transition(Stage::Uploading, Stage::Uploading));
    assert!(registry.is_valid_transition(Stage::Validation, Stage::Completed));
}

#[test]
fn cumulative_weight_counts_only_earlier_working_stages() {
    let registry = StageRegistry::default();
    assert_eq!(registry.cumulative_weight(Stage::Idle), 0.0);
    assert_eq!(registry.cumulative_weight(Stage::Uploading), 0.0);
    assert!((registry.cumulative_weight(Stage::AiAnalysis) - 0.20).abs() < 1e-9);
    assert!((registry.cumulative_weight(Stage::Validation) - 0.95).abs() < 1e-9);
    assert!((registry.cumulative_weight(Stage::Completed) - 1.0).abs() < 1e-9);
    assert_eq!(registry.cumulative_weight(Stage::Error), 0.0);
}

#[test]
fn overall_progress_examples() {
    let registry = StageRegistry::default();
    assert_eq!(registry.calculate_overall_progress(Stage::Idle, 100.0), 0.0);
    assert!((registry.calculate_overall_progress(Stage::Uploading, 100.0) - 5.0).abs() < 1e-9);
    assert!((registry.calculate_overall_progress(Stage::AiAnalysis, 50.0) - 50.0).abs() < 1e-9);
    assert_eq!(registry.calculate_overall_progress(Stage::Completed, 0.0), 100.0);
}

#[test]
fn overall_progress_is_capped_and_clamped() {
    let registry = StageRegistry::default();
    assert_eq!(registry.calculate_overall_progress(Stage::Completed, 100.0), 100.0);
    let over = registry.calculate_overall_progress(Stage::Uploading, 250.0);
    let full = registry.calculate_overall_progress(Stage::Uploading, 100.0);
    assert_eq!(over, full);
    assert_eq!(registry.calculate_overall_progress(Stage::Uploading, -10.0), 0.0);
    assert_eq!(registry.calculate_overall_progress(Stage::Uploading, f64::NAN), 0.0);
}

#[test]
fn overall_progress_is_monotonic_within_each_stage() {
    let registry = StageRegistry::default();
    for stage in ALL {
        let mut last = f64::MIN;
        for pct in 0..=100 {
            let value = registry.calculate_overall_progress(stage, f64::from(pct));
            assert!(value >= last, "{stage} regressed at {pct}%");
            assert!((0.0..=100.0).contains(&value));
            last = value;
        }
    }
}

#[test]
fn overall_progress_end_of_stage_matches_start_of_next() {
    let registry = StageRegistry::default();
    for pair in Stage::PIPELINE.windows(2) {
        let end = registry.calculate_overall_progress(pair[0], 100.0);
        let start = registry.calculate_overall_progress(pair[1], 0.0);
        assert!((end - start).abs() < 1e-9, "{} -> {}", pair[0], pair[1]);
    }
}

#[test]
fn cancellable_flags() {
    let registry = StageRegistry::default();
    assert!(registry.is_cancellable(Stage::Idle));
    assert!(registry.is_cancellable(Stage::Uploading));
    assert!(registry.is_cancellable(Stage::Preprocessing));
    assert!(!registry.is_cancellable(Stage::AiAnalysis));
    assert!(!registry.is_cancellable(Stage::DataExtraction));
    assert!(!registry.is_cancellable(Stage::Validation));
    assert!(!registry.is_cancellable(Stage::Completed));
}

#[test]
fn total_expected_duration_sums_working_stages() {
    let registry = StageRegistry::default();
    assert_eq!(registry.total_expected_duration_ms(), 14_000);
}

#[test]
fn custom_table_missing_stage_reports_unknown_stage() {
    let registry = StageRegistry::from_table(vec![
        StageInfo::new(Stage::Uploading, "Up", "", 100, 0.5, true),
        StageInfo::new(Stage::AiAnalysis, "AI", "", 100, 0.5, false),
    ])
    .expect("valid table");

    let err = registry.stage_info(Stage::Validation).unwrap_err();
    assert!(matches!(err, AppError::UnknownStage(ref s) if s == "validation"));
    assert_eq!(registry.weight(Stage::Validation), 0.0);
    assert!(!registry.is_cancellable(Stage::Validation));
}

#[test]
fn custom_table_weights_must_sum_to_one() {
    let result = StageRegistry::from_table(vec![
        StageInfo::new(Stage::Uploading, "Up", "", 100, 0.5, true),
        StageInfo::new(Stage::AiAnalysis, "AI", "", 100, 0.4, false),
    ]);
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn custom_table_rejects_duplicates() {
    let result = StageRegistry::from_table(vec![
        StageInfo::new(Stage::Uploading, "Up", "", 100, 0.5, true),
        StageInfo::new(Stage::Uploading, "Up again", "", 100, 0.5, true),
    ]);
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn stage_names_round_trip_and_unknown_names_fail() {
    for stage in ALL {
        assert_eq!(Stage::from_str(stage.as_str()).unwrap(), stage);
    }
    let err = Stage::from_str("ocr").unwrap_err();
    assert_eq!(err.to_string(), "unknown stage: ocr");
}
