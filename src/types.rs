//! Core types for the Readlens engine
//!
//! This module defines the data structures that flow through the engine:
//! device descriptors, calibration records, gaze samples and chunks, passage
//! configuration, computed reading metrics and analysis artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Gaze sample classification, assigned by the upstream capture layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GazeType {
    Fixation,
    Saccade,
    Blink,
}

/// A single gaze sample on the normalized screen plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazePoint {
    /// Screen x coordinate (0-1 normalized)
    pub x: f64,
    /// Screen y coordinate (0-1 normalized)
    pub y: f64,
    /// Monotonic timestamp in milliseconds
    pub timestamp: i64,
    /// Estimator confidence (0-1)
    pub confidence: f64,
    /// Sample classification
    #[serde(rename = "type")]
    pub gaze_type: GazeType,
}

impl GazePoint {
    /// Whether the sample survives ingestion filtering: not a blink and
    /// confidence at or above the minimum.
    pub fn is_usable(&self) -> bool {
        self.gaze_type != GazeType::Blink && self.confidence >= MIN_GAZE_CONFIDENCE
    }
}

/// Minimum confidence for a gaze sample to be retained
pub const MIN_GAZE_CONFIDENCE: f64 = 0.5;

/// An ordered, immutable batch of gaze samples for one passage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazeChunk {
    /// Chunk identifier
    pub id: String,
    /// Owning vision session
    pub vision_session_id: String,
    /// Passage this chunk was captured over
    pub passage_id: String,
    /// Surviving gaze samples, in capture order
    pub points: Vec<GazePoint>,
    /// Stored sample count
    pub total_points: usize,
    /// Capture window start
    pub start_time: DateTime<Utc>,
    /// Capture window end
    pub end_time: DateTime<Utc>,
}

/// Incoming gaze batch as sent by the capture client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazeChunkInput {
    pub passage_id: String,
    pub points: Vec<GazePoint>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Device descriptor supplied by the capture client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub user_agent: String,
    /// Screen width in pixels
    pub screen_width: f64,
    /// Screen height in pixels
    pub screen_height: f64,
    pub device_pixel_ratio: f64,
    #[serde(default)]
    pub platform: String,
}

/// Compatibility verdict for a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentCheck {
    pub compatible: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub required_permissions: Vec<String>,
}

/// A single recorded calibration target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationPoint {
    /// Target id (1-9)
    pub id: u8,
    /// Expected position x (normalized 0-1)
    pub screen_x: f64,
    /// Expected position y (normalized 0-1)
    pub screen_y: f64,
    /// Observed gaze x (normalized 0-1)
    pub actual_x: f64,
    /// Observed gaze y (normalized 0-1)
    pub actual_y: f64,
    /// Euclidean distance between observed and expected, in pixels
    pub error_px: f64,
    /// Times this target was recorded (incremented on retry)
    pub attempts: u32,
}

/// Calibration target position handed to the client
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalibrationTarget {
    pub id: u8,
    pub x: f64,
    pub y: f64,
}

/// In-progress calibration attempt. Ephemeral; lives in the calibration
/// session store until validated or abandoned, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationAttempt {
    pub owner_id: String,
    pub device_info: DeviceInfo,
    /// Recorded points, at most one per target id
    pub points: Vec<CalibrationPoint>,
    pub started_at: DateTime<Utc>,
}

/// A validated, persisted calibration. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calibration {
    pub id: String,
    pub owner_id: String,
    pub points: Vec<CalibrationPoint>,
    /// Overall accuracy (0-100)
    pub overall_accuracy: f64,
    /// 3x3 affine transform mapping observed to expected coordinates
    pub transform_matrix: [[f64; 3]; 3],
    pub device_info: DeviceInfo,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Calibration {
    /// Whether the calibration is still valid at `now`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Summary returned by active-calibration lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationSummary {
    pub calibration_id: String,
    pub overall_accuracy: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub days_remaining: i64,
}

/// Result of a successful calibration validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub calibration_id: String,
    pub overall_accuracy: f64,
    pub points: Vec<CalibrationPoint>,
    pub transform_matrix: [[f64; 3]; 3],
    pub expires_at: DateTime<Utc>,
}

/// Host test-session status driven by the vision lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostSessionStatus {
    Pending,
    InProgress,
    Completed,
}

/// Test type configured on the host session's template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    GazeTracking,
    Standard,
}

/// View of a host test session, owned by the external testing platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSession {
    pub id: String,
    /// Student/owner id used for calibration ownership checks
    pub student_id: String,
    /// Student grade level (1-9), consumed by strategy analysis
    pub grade: u8,
    pub test_type: TestType,
    pub status: HostSessionStatus,
    /// Passage configuration from the host template
    pub config: VisionConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// One reading passage with its geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionPassage {
    pub id: String,
    pub word_count: u32,
    /// Font size in pixels
    pub font_size: f64,
    /// Line height multiplier
    pub line_height: f64,
    /// Difficulty rating (1-10)
    pub difficulty: u8,
    pub expected_wpm: f64,
}

/// Expected metric bands used to normalize the overall score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedMetrics {
    /// Saccade amplitude band [min, max] in pixels
    pub saccade_px: [f64; 2],
    /// Fixation duration band [min, max] in milliseconds
    pub fixation_ms: [f64; 2],
    /// Maximum acceptable regression rate (percentage)
    pub max_regression_pct: f64,
    /// Words-per-minute band [min, max]
    pub wpm: [f64; 2],
}

impl Default for ExpectedMetrics {
    fn default() -> Self {
        Self {
            saccade_px: [40.0, 160.0],
            fixation_ms: [150.0, 300.0],
            max_regression_pct: 30.0,
            wpm: [60.0, 200.0],
        }
    }
}

/// Passage configuration taken from the host template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    pub passages: Vec<VisionPassage>,
    #[serde(default)]
    pub expected_metrics: ExpectedMetrics,
}

impl VisionConfig {
    /// Total word count across all passages
    pub fn total_words(&self) -> u32 {
        self.passages.iter().map(|p| p.word_count).sum()
    }
}

/// Vision session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisionSessionState {
    Active,
    Submitted,
}

/// One-to-one companion to a host test session, created at start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionTestSession {
    pub id: String,
    pub host_session_id: String,
    pub calibration_id: String,
    /// Calibration accuracy snapshot taken at session start
    pub calibration_score: f64,
    pub state: VisionSessionState,
    pub created_at: DateTime<Utc>,
    /// Strategy label, attached once analysis has run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_strategy: Option<ReadingStrategy>,
}

/// Saccade amplitude distribution by approximate character span
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaccadeDistribution {
    /// Share of saccades under ~4 characters
    pub short: f64,
    /// Share of saccades spanning ~4-8 characters
    pub medium: f64,
    /// Share of saccades over ~8 characters
    pub long: f64,
}

/// Fixation duration distribution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixationDistribution {
    /// Share under 150 ms
    pub brief: f64,
    /// Share within 150-300 ms
    pub normal: f64,
    /// Share over 300 ms
    pub prolonged: f64,
}

/// Regression counts by span
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegressionTypes {
    pub inter_word: u32,
    pub intra_line: u32,
    pub inter_line: u32,
}

/// Reading speed across session halves
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadingSpeedProgression {
    pub first_half_wpm: f64,
    pub second_half_wpm: f64,
    /// Relative fluctuation between halves (0 = steady)
    pub fluctuation: f64,
}

/// Detailed breakdown attached to computed metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailedAnalysis {
    pub saccade_distribution: SaccadeDistribution,
    pub fixation_distribution: FixationDistribution,
    pub regression_types: RegressionTypes,
    pub reading_speed: ReadingSpeedProgression,
}

/// Peer comparison placeholder, populated by an external statistics service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerComparison {
    pub grade: u8,
    pub sample_size: u32,
    pub percentile_rank: f64,
    pub metrics_comparison: HashMap<String, PeerMetricComparison>,
}

/// Per-metric peer statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerMetricComparison {
    pub student_value: f64,
    pub peer_average: f64,
    pub peer_std_dev: f64,
    pub z_score: f64,
}

/// The fifteen reading-behavior metrics plus the overall score.
/// Computed once per session after submission, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionMetrics {
    pub vision_session_id: String,

    // Eye-movement pattern (6 metrics)
    /// Average saccade amplitude in pixels
    pub average_saccade_amplitude: f64,
    /// Standard deviation of saccade amplitudes
    pub saccade_variability: f64,
    /// Average saccade velocity in pixels/second
    pub average_saccade_velocity: f64,
    /// Percentage of fixations in the optimal landing band (0-100)
    pub optimal_landing_rate: f64,
    /// Percentage of return sweeps landing near the left margin (0-100)
    pub return_sweep_accuracy: f64,
    /// Net forward progress over total path length (0-1)
    pub scan_path_efficiency: f64,

    // Fixation behavior (4 metrics)
    /// Average fixation duration in milliseconds
    pub average_fixation_duration: f64,
    /// Fixation count over total passage word count
    pub fixations_per_word: f64,
    /// Percentage of backward-moving samples (0-100)
    pub regression_rate: f64,
    /// Word-difficulty proxy from prolonged/repeated dwell (0-100)
    pub vocabulary_gap_score: f64,

    // Reading speed & rhythm (3 metrics)
    pub words_per_minute: f64,
    /// 1 - normalized coefficient of variation of fixation durations (0-1)
    pub rhythm_regularity: f64,
    /// Early- vs late-session pace comparison (0-100)
    pub stamina_score: f64,

    // Comprehension & cognitive (2 metrics)
    /// Fixation-efficiency vs comprehension proxy (-1..1, 0 when absent)
    pub gaze_comprehension_correlation: f64,
    /// Composite of regression rate and fixation variability (0-100)
    pub cognitive_load_index: f64,

    /// Weighted composite of the metric groups (0-100)
    pub overall_score: f64,

    pub detailed_analysis: DetailedAnalysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_with_peers: Option<PeerComparison>,

    pub computed_at: DateTime<Utc>,
}

/// One populated attention-grid cell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapCell {
    /// Grid column (0-based)
    pub x: u32,
    /// Grid row (0-based)
    pub y: u32,
    /// Dwell normalized by the passage maximum (0-1)
    pub intensity: f64,
    pub fixation_count: u32,
    /// Average dwell per sample in milliseconds
    pub average_dwell_ms: f64,
}

/// Attention heatmap for one passage. Only populated cells are listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapData {
    pub passage_id: String,
    pub grid_width: u32,
    pub grid_height: u32,
    pub cells: Vec<HeatmapCell>,
}

/// Reading strategy classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingStrategy {
    Advanced,
    Fluent,
    Developing,
    Struggling,
}

impl ReadingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStrategy::Advanced => "advanced",
            ReadingStrategy::Fluent => "fluent",
            ReadingStrategy::Developing => "developing",
            ReadingStrategy::Struggling => "struggling",
        }
    }
}

/// Output of the reading-strategy analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyAnalysis {
    pub reading_strategy: ReadingStrategy,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
    pub narrative: String,
    /// Analyzer confidence (0-1)
    pub confidence_score: f64,
}

/// Advisory calibration adjustment parameters recorded by an admin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationAdjustment {
    /// Horizontal offset in pixels
    pub offset_x: f64,
    /// Vertical offset in pixels
    pub offset_y: f64,
    /// Horizontal scale multiplier
    pub scale_x: f64,
    /// Vertical scale multiplier
    pub scale_y: f64,
    /// Rotation in degrees
    pub rotation: f64,
}

/// Persisted adjustment annotation. Advisory only; never triggers
/// recomputation of stored gaze data or metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentRecord {
    pub id: String,
    pub vision_session_id: String,
    pub admin_id: String,
    pub adjustments: CalibrationAdjustment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaze_type_serialization() {
        let json = serde_json::to_string(&GazeType::Fixation).unwrap();
        assert_eq!(json, "\"fixation\"");

        let parsed: GazeType = serde_json::from_str("\"blink\"").unwrap();
        assert_eq!(parsed, GazeType::Blink);
    }

    #[test]
    fn test_gaze_point_wire_shape() {
        let json = r#"{
            "x": 0.42,
            "y": 0.17,
            "timestamp": 1700000000123,
            "confidence": 0.91,
            "type": "saccade"
        }"#;

        let point: GazePoint = serde_json::from_str(json).unwrap();
        assert_eq!(point.gaze_type, GazeType::Saccade);
        assert_eq!(point.timestamp, 1700000000123);
        assert!(point.is_usable());
    }

    #[test]
    fn test_usability_filter() {
        let mut point = GazePoint {
            x: 0.5,
            y: 0.5,
            timestamp: 0,
            confidence: 0.9,
            gaze_type: GazeType::Fixation,
        };
        assert!(point.is_usable());

        point.confidence = 0.49;
        assert!(!point.is_usable());

        point.confidence = 0.9;
        point.gaze_type = GazeType::Blink;
        assert!(!point.is_usable());
    }

    #[test]
    fn test_calibration_expiry() {
        let now = Utc::now();
        let calibration = Calibration {
            id: "c1".into(),
            owner_id: "u1".into(),
            points: vec![],
            overall_accuracy: 92.0,
            transform_matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            device_info: DeviceInfo {
                user_agent: "test".into(),
                screen_width: 1024.0,
                screen_height: 1366.0,
                device_pixel_ratio: 2.0,
                platform: "test".into(),
            },
            created_at: now,
            expires_at: now + chrono::Duration::days(7),
        };

        assert!(calibration.is_active(now));
        assert!(!calibration.is_active(now + chrono::Duration::days(8)));
    }

    #[test]
    fn test_config_total_words() {
        let config = VisionConfig {
            passages: vec![
                VisionPassage {
                    id: "p1".into(),
                    word_count: 120,
                    font_size: 18.0,
                    line_height: 1.6,
                    difficulty: 3,
                    expected_wpm: 110.0,
                },
                VisionPassage {
                    id: "p2".into(),
                    word_count: 80,
                    font_size: 18.0,
                    line_height: 1.6,
                    difficulty: 4,
                    expected_wpm: 100.0,
                },
            ],
            expected_metrics: ExpectedMetrics::default(),
        };

        assert_eq!(config.total_words(), 200);
    }

    #[test]
    fn test_reading_strategy_serialization() {
        let json = serde_json::to_string(&ReadingStrategy::Struggling).unwrap();
        assert_eq!(json, "\"struggling\"");
    }
}
