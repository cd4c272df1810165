//! Pipeline stage enumeration and per-stage metadata.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AppError;

/// One phase of the document processing pipeline.
///
/// Declaration order is the forward pipeline order; `Error` and `Cancelled`
/// are side-terminals reachable from anywhere.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Session created, no work reported yet.
    Idle,
    /// Source image is being uploaded.
    Uploading,
    /// Local image normalization before model submission.
    Preprocessing,
    /// Remote OCR/LLM analysis call in flight.
    AiAnalysis,
    /// Structured fields being pulled from the model response.
    DataExtraction,
    /// Extracted record being validated.
    Validation,
    /// Pipeline finished successfully.
    Completed,
    /// Pipeline failed.
    Error,
    /// Pipeline cancelled by the operator.
    Cancelled,
}

impl Stage {
    /// Fixed forward order from `Idle` to `Completed`.
    pub const PIPELINE: [Stage; 7] = [
        Stage::Idle,
        Stage::Uploading,
        Stage::Preprocessing,
        Stage::AiAnalysis,
        Stage::DataExtraction,
        Stage::Validation,
        Stage::Completed,
    ];

    /// Stages that contribute a share of overall progress.
    pub const WORKING: [Stage; 5] = [
        Stage::Uploading,
        Stage::Preprocessing,
        Stage::AiAnalysis,
        Stage::DataExtraction,
        Stage::Validation,
    ];

    /// Kebab-case wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::Preprocessing => "preprocessing",
            Self::AiAnalysis => "ai-analysis",
            Self::DataExtraction => "data-extraction",
            Self::Validation => "validation",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// `Completed`, `Error`, or `Cancelled`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// `Error` or `Cancelled`.
    #[must_use]
    pub fn is_side_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Cancelled)
    }

    /// Whether the stage carries a progress weight in the pipeline sum.
    #[must_use]
    pub fn is_working(self) -> bool {
        Self::WORKING.contains(&self)
    }

    /// Position in [`Stage::PIPELINE`], `None` for side-terminals.
    #[must_use]
    pub fn pipeline_index(self) -> Option<usize> {
        Self::PIPELINE.iter().position(|s| *s == self)
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "uploading" => Ok(Self::Uploading),
            "preprocessing" => Ok(Self::Preprocessing),
            "ai-analysis" => Ok(Self::AiAnalysis),
            "data-extraction" => Ok(Self::DataExtraction),
            "validation" => Ok(Self::Validation),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(AppError::UnknownStage(other.to_owned())),
        }
    }
}

/// Static metadata describing one stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct StageInfo {
    /// Stage this entry describes.
    pub stage: Stage,
    /// Human-readable label.
    pub name: String,
    /// Short description shown to operators.
    pub description: String,
    /// Typical duration of the stage in milliseconds.
    pub expected_duration_ms: u64,
    /// Fraction of overall progress earned by completing the stage.
    pub weight: f64,
    /// Whether a cancel request is honored while in this stage.
    pub cancellable: bool,
}

impl StageInfo {
    /// Construct a stage entry.
    #[must_use]
    pub fn new(
        stage: Stage,
        name: &str,
        description: &str,
        expected_duration_ms: u64,
        weight: f64,
        cancellable: bool,
    ) -> Self {
        Self {
            stage,
            name: name.to_owned(),
            description: description.to_owned(),
            expected_duration_ms,
            weight,
            cancellable,
        }
    }
}
