//! Metrics engine
//!
//! One-shot batch computation over the full chronological gaze stream of a
//! submitted session. Every metric is a pure function of the filtered point
//! sequence and the passage configuration; every division carries a guarded
//! zero-denominator path so degenerate inputs (single point, zero duration,
//! zero words) resolve to documented sentinels instead of NaN.

use crate::error::VisionError;
use crate::types::{
    DetailedAnalysis, FixationDistribution, GazePoint, GazeType, ReadingSpeedProgression,
    RegressionTypes, SaccadeDistribution, VisionConfig, VisionMetrics,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Normalized gaze coordinates are projected onto this reference surface
/// for all pixel-unit metrics, regardless of the capture device.
pub const REFERENCE_SURFACE_WIDTH: f64 = 1920.0;
pub const REFERENCE_SURFACE_HEIGHT: f64 = 1080.0;

/// Consecutive fixation samples closer than this gap belong to one fixation
pub const FIXATION_GROUP_GAP_MS: i64 = 100;

/// Dwell beyond this marks a prolonged fixation (word-difficulty signal)
pub const PROLONGED_FIXATION_MS: f64 = 400.0;

/// Fixation duration band considered optimal for fluent reading
pub const OPTIMAL_FIXATION_MIN_MS: f64 = 150.0;
pub const OPTIMAL_FIXATION_MAX_MS: f64 = 300.0;

/// Normalized leftward movement beyond this counts as a regression
pub const REGRESSION_DX_THRESHOLD: f64 = -0.05;

/// A return sweep is a large leftward jump with downward drift
pub const RETURN_SWEEP_DX_THRESHOLD: f64 = -0.5;
pub const RETURN_SWEEP_DY_THRESHOLD: f64 = 0.05;

/// An accurate return sweep lands within the left margin band
pub const LEFT_MARGIN_X: f64 = 0.2;

/// Approximate character width on the reference surface, used to bucket
/// saccade amplitudes into short/medium/long spans
const APPROX_CHAR_WIDTH_PX: f64 = 12.0;

fn to_pixels(p: &GazePoint) -> (f64, f64) {
    (p.x * REFERENCE_SURFACE_WIDTH, p.y * REFERENCE_SURFACE_HEIGHT)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// One grouped fixation: consecutive fixation samples with inter-sample
/// gaps at most [`FIXATION_GROUP_GAP_MS`]
#[derive(Debug, Clone, PartialEq)]
pub struct FixationGroup {
    /// Centroid in normalized coordinates
    pub x: f64,
    pub y: f64,
    pub start_ms: i64,
    pub duration_ms: f64,
    pub sample_count: usize,
}

/// Collapse consecutive fixation-typed samples into fixation groups.
/// A lone trailing sample forms a zero-duration group.
pub fn group_fixations(points: &[GazePoint]) -> Vec<FixationGroup> {
    let fixations: Vec<&GazePoint> = points
        .iter()
        .filter(|p| p.gaze_type == GazeType::Fixation)
        .collect();
    if fixations.is_empty() {
        return Vec::new();
    }

    let mut groups = Vec::new();
    let mut run: Vec<&GazePoint> = vec![fixations[0]];
    for &p in &fixations[1..] {
        let gap = p.timestamp - run[run.len() - 1].timestamp;
        if gap <= FIXATION_GROUP_GAP_MS {
            run.push(p);
        } else {
            groups.push(close_group(&run));
            run = vec![p];
        }
    }
    groups.push(close_group(&run));
    groups
}

fn close_group(run: &[&GazePoint]) -> FixationGroup {
    let n = run.len() as f64;
    FixationGroup {
        x: run.iter().map(|p| p.x).sum::<f64>() / n,
        y: run.iter().map(|p| p.y).sum::<f64>() / n,
        start_ms: run[0].timestamp,
        duration_ms: (run[run.len() - 1].timestamp - run[0].timestamp) as f64,
        sample_count: run.len(),
    }
}

/// Euclidean pixel distances between consecutive saccade-typed samples
pub fn compute_saccade_amplitudes(points: &[GazePoint]) -> Vec<f64> {
    let saccades: Vec<&GazePoint> = points
        .iter()
        .filter(|p| p.gaze_type == GazeType::Saccade)
        .collect();
    saccades
        .windows(2)
        .map(|w| {
            let (x0, y0) = to_pixels(w[0]);
            let (x1, y1) = to_pixels(w[1]);
            ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt()
        })
        .collect()
}

/// Average saccade velocity in pixels per second. Pairs with a zero time
/// delta are skipped; no pairs at all yields 0.
pub fn compute_saccade_velocity(points: &[GazePoint]) -> f64 {
    let saccades: Vec<&GazePoint> = points
        .iter()
        .filter(|p| p.gaze_type == GazeType::Saccade)
        .collect();
    let velocities: Vec<f64> = saccades
        .windows(2)
        .filter_map(|w| {
            let dt_ms = (w[1].timestamp - w[0].timestamp) as f64;
            if dt_ms <= 0.0 {
                return None;
            }
            let (x0, y0) = to_pixels(w[0]);
            let (x1, y1) = to_pixels(w[1]);
            let dist = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
            Some(dist / (dt_ms / 1000.0))
        })
        .collect();
    mean(&velocities)
}

/// Percentage of fixation groups whose duration falls in the optimal band
pub fn compute_optimal_landing_rate(groups: &[FixationGroup]) -> f64 {
    if groups.is_empty() {
        return 0.0;
    }
    let optimal = groups
        .iter()
        .filter(|g| {
            g.duration_ms >= OPTIMAL_FIXATION_MIN_MS && g.duration_ms <= OPTIMAL_FIXATION_MAX_MS
        })
        .count();
    optimal as f64 / groups.len() as f64 * 100.0
}

/// Percentage of return sweeps that land near the left margin.
/// A stream without any return sweep scores 100 (nothing was missed).
pub fn compute_return_sweep_accuracy(points: &[GazePoint]) -> f64 {
    let mut sweeps = 0usize;
    let mut accurate = 0usize;
    for w in points.windows(2) {
        let dx = w[1].x - w[0].x;
        let dy = w[1].y - w[0].y;
        if dx < RETURN_SWEEP_DX_THRESHOLD && dy > RETURN_SWEEP_DY_THRESHOLD {
            sweeps += 1;
            if w[1].x < LEFT_MARGIN_X {
                accurate += 1;
            }
        }
    }
    if sweeps == 0 {
        return 100.0;
    }
    accurate as f64 / sweeps as f64 * 100.0
}

/// Net displacement over total path length, in [0, 1]. Zero path yields 0.
pub fn compute_scan_path_efficiency(points: &[GazePoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let total: f64 = points
        .windows(2)
        .map(|w| {
            let (x0, y0) = to_pixels(&w[0]);
            let (x1, y1) = to_pixels(&w[1]);
            ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt()
        })
        .sum();
    if total <= 0.0 {
        return 0.0;
    }
    let (fx, fy) = to_pixels(&points[0]);
    let (lx, ly) = to_pixels(&points[points.len() - 1]);
    let net = ((lx - fx).powi(2) + (ly - fy).powi(2)).sqrt();
    (net / total).clamp(0.0, 1.0)
}

/// Percentage of movements that jump leftward past the regression threshold.
/// Return sweeps are line changes, not regressions, and are excluded.
pub fn compute_regression_rate(points: &[GazePoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut movements = 0usize;
    let mut regressions = 0usize;
    for w in points.windows(2) {
        let dx = w[1].x - w[0].x;
        let dy = w[1].y - w[0].y;
        movements += 1;
        let is_sweep = dx < RETURN_SWEEP_DX_THRESHOLD && dy > RETURN_SWEEP_DY_THRESHOLD;
        if dx < REGRESSION_DX_THRESHOLD && !is_sweep {
            regressions += 1;
        }
    }
    regressions as f64 / movements as f64 * 100.0
}

/// Break regressions down by span: a vertical component marks an inter-line
/// jump, small leftward steps re-read the previous word, larger ones re-read
/// within the line.
pub fn compute_regression_types(points: &[GazePoint]) -> RegressionTypes {
    let mut types = RegressionTypes::default();
    for w in points.windows(2) {
        let dx = w[1].x - w[0].x;
        let dy = w[1].y - w[0].y;
        let is_sweep = dx < RETURN_SWEEP_DX_THRESHOLD && dy > RETURN_SWEEP_DY_THRESHOLD;
        if dx >= REGRESSION_DX_THRESHOLD || is_sweep {
            continue;
        }
        if dy.abs() > RETURN_SWEEP_DY_THRESHOLD {
            types.inter_line += 1;
        } else if dx > -0.15 {
            types.inter_word += 1;
        } else {
            types.intra_line += 1;
        }
    }
    types
}

/// Word-difficulty proxy: share of prolonged fixation groups, doubled and
/// capped at 100 so even moderate prolonged dwell registers.
pub fn compute_vocabulary_gap_score(groups: &[FixationGroup]) -> f64 {
    if groups.is_empty() {
        return 0.0;
    }
    let prolonged = groups
        .iter()
        .filter(|g| g.duration_ms > PROLONGED_FIXATION_MS)
        .count();
    (prolonged as f64 / groups.len() as f64 * 100.0 * 2.0).min(100.0)
}

/// 1 minus the coefficient of variation of fixation durations, in [0, 1].
/// Fewer than two groups, or all-zero durations, count as fully regular.
pub fn compute_rhythm_regularity(groups: &[FixationGroup]) -> f64 {
    let durations: Vec<f64> = groups.iter().map(|g| g.duration_ms).collect();
    let m = mean(&durations);
    if durations.len() < 2 || m <= 0.0 {
        return 1.0;
    }
    let cv = std_dev(&durations) / m;
    (1.0 - cv).clamp(0.0, 1.0)
}

/// Stamina: second-half scan path over first-half scan path, capped at 100.
/// A shrinking second half signals fatigue. An empty first half scores 100.
pub fn compute_stamina_score(points: &[GazePoint]) -> f64 {
    if points.len() < 4 {
        return 100.0;
    }
    let mid = points.len() / 2;
    let path = |slice: &[GazePoint]| -> f64 {
        slice
            .windows(2)
            .map(|w| {
                let (x0, y0) = to_pixels(&w[0]);
                let (x1, y1) = to_pixels(&w[1]);
                ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt()
            })
            .sum()
    };
    let first = path(&points[..mid]);
    let second = path(&points[mid..]);
    if first <= 0.0 {
        return 100.0;
    }
    (second / first * 100.0).min(100.0)
}

/// Words per minute over the whole stream. Zero duration or zero words
/// yields 0.
pub fn compute_words_per_minute(total_words: u32, duration_seconds: f64) -> f64 {
    if duration_seconds <= 0.0 || total_words == 0 {
        return 0.0;
    }
    total_words as f64 / (duration_seconds / 60.0)
}

/// Alignment proxy between fixation quality and graded comprehension, in
/// [-1, 1]. Neutral 0 when no accuracy was supplied. Both signals are
/// normalized to [0, 1]; perfect agreement maps to 1, full disagreement
/// to -1.
pub fn compute_gaze_comprehension_correlation(
    optimal_landing_rate: f64,
    comprehension_accuracy: Option<f64>,
) -> f64 {
    let accuracy = match comprehension_accuracy {
        Some(a) => a,
        None => return 0.0,
    };
    let fixation_quality = (optimal_landing_rate / 100.0).clamp(0.0, 1.0);
    let comprehension = (accuracy / 100.0).clamp(0.0, 1.0);
    (1.0 - 2.0 * (fixation_quality - comprehension).abs()).clamp(-1.0, 1.0)
}

/// Composite load index: half regression pressure, half fixation-duration
/// variability (std dev in ms, halved and capped)
pub fn compute_cognitive_load_index(regression_rate: f64, groups: &[FixationGroup]) -> f64 {
    let durations: Vec<f64> = groups.iter().map(|g| g.duration_ms).collect();
    let variability = (std_dev(&durations) / 2.0).min(100.0);
    (0.5 * regression_rate.clamp(0.0, 100.0) + 0.5 * variability).clamp(0.0, 100.0)
}

/// Score 100 inside [lo, hi], linearly decaying to 0 one band-width outside
fn band_score(value: f64, lo: f64, hi: f64) -> f64 {
    let width = hi - lo;
    if width <= 0.0 {
        return 0.0;
    }
    let dist = if value < lo {
        lo - value
    } else if value > hi {
        value - hi
    } else {
        return 100.0;
    };
    (100.0 * (1.0 - dist / width)).max(0.0)
}

/// Overall composite, 0-100. Fixed documented weights:
/// saccade amplitude 0.10, fixation duration 0.15, fixations/word 0.05,
/// regression rate 0.15, words per minute 0.20, scan-path efficiency 0.15,
/// rhythm 0.05, stamina 0.15.
pub fn compute_overall_score(m: &VisionMetrics, config: &VisionConfig) -> f64 {
    let saccade = band_score(
        m.average_saccade_amplitude,
        config.expected_metrics.saccade_px[0],
        config.expected_metrics.saccade_px[1],
    );
    let fixation = band_score(
        m.average_fixation_duration,
        config.expected_metrics.fixation_ms[0],
        config.expected_metrics.fixation_ms[1],
    );
    let fpw = if m.fixations_per_word <= 1.0 {
        100.0
    } else {
        (100.0 - (m.fixations_per_word - 1.0) * 100.0).max(0.0)
    };
    let regression = if config.expected_metrics.max_regression_pct > 0.0 {
        (100.0 * (1.0 - m.regression_rate / config.expected_metrics.max_regression_pct)).max(0.0)
    } else {
        0.0
    };
    let speed = band_score(
        m.words_per_minute,
        config.expected_metrics.wpm[0],
        config.expected_metrics.wpm[1],
    );
    let efficiency = m.scan_path_efficiency * 100.0;
    let rhythm = m.rhythm_regularity * 100.0;

    let score = 0.10 * saccade
        + 0.15 * fixation
        + 0.05 * fpw
        + 0.15 * regression
        + 0.20 * speed
        + 0.15 * efficiency
        + 0.05 * rhythm
        + 0.15 * m.stamina_score;
    score.clamp(0.0, 100.0)
}

fn compute_saccade_distribution(amplitudes: &[f64]) -> SaccadeDistribution {
    if amplitudes.is_empty() {
        return SaccadeDistribution::default();
    }
    let short_max = 4.0 * APPROX_CHAR_WIDTH_PX;
    let medium_max = 8.0 * APPROX_CHAR_WIDTH_PX;
    let n = amplitudes.len() as f64;
    let short = amplitudes.iter().filter(|a| **a < short_max).count() as f64;
    let long = amplitudes.iter().filter(|a| **a > medium_max).count() as f64;
    SaccadeDistribution {
        short: short / n,
        medium: (n - short - long) / n,
        long: long / n,
    }
}

fn compute_fixation_distribution(groups: &[FixationGroup]) -> FixationDistribution {
    if groups.is_empty() {
        return FixationDistribution::default();
    }
    let n = groups.len() as f64;
    let brief = groups
        .iter()
        .filter(|g| g.duration_ms < OPTIMAL_FIXATION_MIN_MS)
        .count() as f64;
    let prolonged = groups
        .iter()
        .filter(|g| g.duration_ms > OPTIMAL_FIXATION_MAX_MS)
        .count() as f64;
    FixationDistribution {
        brief: brief / n,
        normal: (n - brief - prolonged) / n,
        prolonged: prolonged / n,
    }
}

/// Per-half pace, assuming words are covered evenly across the session
fn compute_reading_speed_progression(
    points: &[GazePoint],
    total_words: u32,
) -> ReadingSpeedProgression {
    if points.len() < 4 {
        return ReadingSpeedProgression::default();
    }
    let mid = points.len() / 2;
    let half_words = total_words / 2;
    let first_secs = (points[mid - 1].timestamp - points[0].timestamp) as f64 / 1000.0;
    let second_secs = (points[points.len() - 1].timestamp - points[mid].timestamp) as f64 / 1000.0;
    let first = compute_words_per_minute(half_words, first_secs);
    let second = compute_words_per_minute(half_words, second_secs);
    let peak = first.max(second);
    let fluctuation = if peak > 0.0 {
        (first - second).abs() / peak
    } else {
        0.0
    };
    ReadingSpeedProgression {
        first_half_wpm: first,
        second_half_wpm: second,
        fluctuation,
    }
}

/// Compute the full metric set from the chronological gaze stream of one
/// session. Fails only when no usable point survives the defensive
/// re-filter; every other degenerate input resolves to sentinels.
pub fn compute_metrics(
    vision_session_id: &str,
    points: &[GazePoint],
    config: &VisionConfig,
    comprehension_accuracy: Option<f64>,
) -> Result<VisionMetrics, VisionError> {
    let mut usable: Vec<GazePoint> = points.iter().filter(|p| p.is_usable()).cloned().collect();
    if usable.is_empty() {
        return Err(VisionError::MetricsCalculationFailed(format!(
            "no usable gaze data for session {vision_session_id}"
        )));
    }
    usable.sort_by_key(|p| p.timestamp);

    let duration_seconds =
        (usable[usable.len() - 1].timestamp - usable[0].timestamp) as f64 / 1000.0;
    let total_words = config.total_words();

    let groups = group_fixations(&usable);
    let amplitudes = compute_saccade_amplitudes(&usable);
    let group_durations: Vec<f64> = groups.iter().map(|g| g.duration_ms).collect();

    let optimal_landing_rate = compute_optimal_landing_rate(&groups);
    let regression_rate = compute_regression_rate(&usable);
    let fixations_per_word = if total_words > 0 {
        groups.len() as f64 / total_words as f64
    } else {
        0.0
    };

    let mut metrics = VisionMetrics {
        vision_session_id: vision_session_id.to_string(),
        average_saccade_amplitude: mean(&amplitudes),
        saccade_variability: std_dev(&amplitudes),
        average_saccade_velocity: compute_saccade_velocity(&usable),
        optimal_landing_rate,
        return_sweep_accuracy: compute_return_sweep_accuracy(&usable),
        scan_path_efficiency: compute_scan_path_efficiency(&usable),
        average_fixation_duration: mean(&group_durations),
        fixations_per_word,
        regression_rate,
        vocabulary_gap_score: compute_vocabulary_gap_score(&groups),
        words_per_minute: compute_words_per_minute(total_words, duration_seconds),
        rhythm_regularity: compute_rhythm_regularity(&groups),
        stamina_score: compute_stamina_score(&usable),
        gaze_comprehension_correlation: compute_gaze_comprehension_correlation(
            optimal_landing_rate,
            comprehension_accuracy,
        ),
        cognitive_load_index: compute_cognitive_load_index(regression_rate, &groups),
        overall_score: 0.0,
        detailed_analysis: DetailedAnalysis {
            saccade_distribution: compute_saccade_distribution(&amplitudes),
            fixation_distribution: compute_fixation_distribution(&groups),
            regression_types: compute_regression_types(&usable),
            reading_speed: compute_reading_speed_progression(&usable, total_words),
        },
        comparison_with_peers: None,
        computed_at: Utc::now(),
    };
    metrics.overall_score = compute_overall_score(&metrics, config);
    Ok(metrics)
}

/// Persisted metrics keyed by vision session id, write-once
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MetricsStore {
    metrics: HashMap<String, VisionMetrics>,
}

impl MetricsStore {
    pub fn get(&self, vision_session_id: &str) -> Option<&VisionMetrics> {
        self.metrics.get(vision_session_id)
    }

    pub fn contains(&self, vision_session_id: &str) -> bool {
        self.metrics.contains_key(vision_session_id)
    }

    /// First write wins; recomputation never replaces stored metrics
    pub fn insert_once(&mut self, metrics: VisionMetrics) -> &VisionMetrics {
        self.metrics
            .entry(metrics.vision_session_id.clone())
            .or_insert(metrics)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
