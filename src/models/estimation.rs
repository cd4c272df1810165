//! Time estimation value objects and the input metadata they derive from.

use serde::{Deserialize, Serialize};

/// Image description supplied by the driver when a session starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ImageMetadata {
    /// Encoded file size in bytes.
    pub size: u64,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// MIME type, e.g. `image/jpeg`.
    pub format: String,
    /// Optional driver-computed complexity score in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<f64>,
}

impl ImageMetadata {
    /// Construct metadata without an explicit complexity score.
    #[must_use]
    pub fn new(size: u64, width: u32, height: u32, format: impl Into<String>) -> Self {
        Self {
            size,
            width,
            height,
            format: format.into(),
            complexity: None,
        }
    }

    /// Attach a complexity score, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_complexity(mut self, complexity: f64) -> Self {
        self.complexity = Some(complexity.clamp(0.0, 1.0));
        self
    }

    /// Total pixel count.
    #[must_use]
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// File size bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SizeCategory {
    /// Under 500 KiB.
    Small,
    /// 500 KiB up to 2 MiB.
    Medium,
    /// 2 MiB up to 5 MiB.
    Large,
    /// 5 MiB and above.
    Xlarge,
}

/// Image content complexity bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityCategory {
    /// Highly compressible, sparse content.
    Low,
    /// Typical scanned document.
    Medium,
    /// Dense content.
    High,
    /// Photographic or noisy content.
    VeryHigh,
}

/// Host performance bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    /// Few cores.
    Low,
    /// Typical workstation, or unknown host.
    Medium,
    /// Many cores and plenty of memory.
    High,
}

/// Confidence-scored projection of total processing time.
///
/// `estimated_time_ms` is always the rounded product of the base time and
/// the three factors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TimeEstimation {
    /// Sum of expected stage durations.
    pub base_time_ms: u64,
    /// Multiplier from the file size bucket.
    pub size_factor: f64,
    /// Multiplier from the complexity bucket.
    pub complexity_factor: f64,
    /// Multiplier from host performance, revised by observed progress.
    pub performance_factor: f64,
    /// Projected total duration.
    pub estimated_time_ms: u64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl TimeEstimation {
    /// Build an estimation from its factors, computing the product.
    #[must_use]
    pub fn from_factors(
        base_time_ms: u64,
        size_factor: f64,
        complexity_factor: f64,
        performance_factor: f64,
        confidence: f64,
    ) -> Self {
        let mut estimation = Self {
            base_time_ms,
            size_factor,
            complexity_factor,
            performance_factor,
            estimated_time_ms: 0,
            confidence: confidence.clamp(0.0, 1.0),
        };
        estimation.estimated_time_ms = estimation.product_ms();
        estimation
    }

    /// `base * size * complexity * performance`, rounded to whole milliseconds.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn product_ms(&self) -> u64 {
        let product = self.base_time_ms as f64
            * self.size_factor
            * self.complexity_factor
            * self.performance_factor;
        product.max(0.0).round() as u64
    }
}
