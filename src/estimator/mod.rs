//! Heuristic time-to-completion estimation.
//!
//! An initial estimate is derived from the input image and the host; it is
//! then revised each time the driver reports progress by comparing the
//! elapsed time against what the stage weights say should have elapsed.

pub mod system;

use std::sync::Arc;

use crate::models::estimation::{
    ComplexityCategory, ImageMetadata, PerformanceTier, SizeCategory, TimeEstimation,
};
use crate::models::stage::Stage;
use crate::registry::StageRegistry;

pub use system::SystemProfile;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

const DEFAULT_CONFIDENCE: f64 = 0.8;
const TYPICAL_CONFIDENCE: f64 = 0.9;
const EXTREME_CONFIDENCE: f64 = 0.6;
const MAX_CONFIDENCE: f64 = 0.95;
const MIN_CONFIDENCE: f64 = 0.3;

/// Revises estimates against observed progress.
#[derive(Debug, Clone)]
pub struct TimeEstimator {
    registry: Arc<StageRegistry>,
    profile: SystemProfile,
}

impl TimeEstimator {
    /// Create an estimator for the given stage table and host.
    #[must_use]
    pub fn new(registry: Arc<StageRegistry>, profile: SystemProfile) -> Self {
        Self { registry, profile }
    }

    /// Initial estimate before any progress is known.
    ///
    /// Missing metadata is treated as a medium-size, medium-complexity image.
    #[must_use]
    pub fn calculate_initial_estimate(&self, metadata: Option<&ImageMetadata>) -> TimeEstimation {
        let (size, complexity) = metadata.map_or(
            (SizeCategory::Medium, ComplexityCategory::Medium),
            |m| (categorize_size(m.size), categorize_complexity(m)),
        );

        let confidence = match (size, complexity) {
            (SizeCategory::Xlarge, _) | (_, ComplexityCategory::VeryHigh) => EXTREME_CONFIDENCE,
            (SizeCategory::Medium, ComplexityCategory::Medium) => TYPICAL_CONFIDENCE,
            _ => DEFAULT_CONFIDENCE,
        };

        TimeEstimation::from_factors(
            self.registry.total_expected_duration_ms(),
            size_factor(size),
            complexity_factor(complexity),
            performance_factor(self.profile.tier()),
            confidence,
        )
    }

    /// Rescale `current` by how far actual elapsed time strays from the
    /// elapsed time implied by `stage` at `stage_progress` percent.
    ///
    /// Returns `current` unchanged when there is nothing to compare yet.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn update_estimate(
        &self,
        current: &TimeEstimation,
        elapsed_ms: u64,
        stage: Stage,
        stage_progress: f64,
    ) -> TimeEstimation {
        let expected_fraction =
            self.registry.calculate_overall_progress(stage, stage_progress) / 100.0;
        if expected_fraction <= 0.0 || elapsed_ms == 0 || current.estimated_time_ms == 0 {
            return current.clone();
        }

        let expected_elapsed = current.estimated_time_ms as f64 * expected_fraction;
        let ratio = elapsed_ms as f64 / expected_elapsed;
        if !ratio.is_finite() {
            return current.clone();
        }
        let deviation = (ratio - 1.0).abs();

        let confidence = if deviation <= 0.1 {
            (current.confidence + 0.1).min(MAX_CONFIDENCE)
        } else if deviation > 0.5 {
            (current.confidence - 0.2).max(MIN_CONFIDENCE)
        } else {
            current.confidence
        };

        // The observed pace is folded into the performance factor so that the
        // estimate stays the product of its factors.
        TimeEstimation::from_factors(
            current.base_time_ms,
            current.size_factor,
            current.complexity_factor,
            current.performance_factor * ratio,
            confidence,
        )
    }
}

/// Remaining milliseconds given elapsed time and overall progress.
///
/// With no progress the whole estimate remains; otherwise the total is
/// projected linearly from the pace so far.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_remaining(
    estimate: &TimeEstimation,
    elapsed_ms: u64,
    overall_progress: f64,
) -> u64 {
    if overall_progress.is_nan() || overall_progress <= 0.0 {
        return estimate.estimated_time_ms;
    }
    if overall_progress >= 100.0 {
        return 0;
    }
    let projected_total = elapsed_ms as f64 / (overall_progress / 100.0);
    (projected_total - elapsed_ms as f64).max(0.0).round() as u64
}

/// Bucket a file size in bytes.
#[must_use]
pub fn categorize_size(bytes: u64) -> SizeCategory {
    if bytes < 500 * KIB {
        SizeCategory::Small
    } else if bytes < 2 * MIB {
        SizeCategory::Medium
    } else if bytes < 5 * MIB {
        SizeCategory::Large
    } else {
        SizeCategory::Xlarge
    }
}

/// Bucket image complexity.
///
/// An explicit score wins; otherwise bytes-per-pixel stands in for how
/// poorly the image compresses.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn categorize_complexity(metadata: &ImageMetadata) -> ComplexityCategory {
    if let Some(score) = metadata.complexity {
        return if score < 0.25 {
            ComplexityCategory::Low
        } else if score < 0.5 {
            ComplexityCategory::Medium
        } else if score < 0.75 {
            ComplexityCategory::High
        } else {
            ComplexityCategory::VeryHigh
        };
    }

    let pixels = metadata.pixel_count();
    if pixels == 0 {
        return ComplexityCategory::Medium;
    }
    let bytes_per_pixel = metadata.size as f64 / pixels as f64;
    if bytes_per_pixel < 1.0 {
        ComplexityCategory::Low
    } else if bytes_per_pixel < 2.0 {
        ComplexityCategory::Medium
    } else if bytes_per_pixel < 4.0 {
        ComplexityCategory::High
    } else {
        ComplexityCategory::VeryHigh
    }
}

fn size_factor(category: SizeCategory) -> f64 {
    match category {
        SizeCategory::Small => 0.7,
        SizeCategory::Medium => 1.0,
        SizeCategory::Large => 1.5,
        SizeCategory::Xlarge => 2.2,
    }
}

fn complexity_factor(category: ComplexityCategory) -> f64 {
    match category {
        ComplexityCategory::Low => 0.8,
        ComplexityCategory::Medium => 1.0,
        ComplexityCategory::High => 1.3,
        ComplexityCategory::VeryHigh => 1.6,
    }
}

fn performance_factor(tier: PerformanceTier) -> f64 {
    match tier {
        PerformanceTier::High => 0.8,
        PerformanceTier::Medium => 1.0,
        PerformanceTier::Low => 1.3,
    }
}
