//! Calibration management
//!
//! Runs the 9-point calibration protocol: a fixed 3x3 target grid is shown,
//! observed gaze positions are recorded per target, and validation scores the
//! attempt, derives a simplified affine transform and persists a time-boxed
//! calibration when accuracy clears the threshold.
//!
//! In-progress attempts live behind the [`CalibrationSessionStore`]
//! capability so the process-local map can be swapped for a shared,
//! TTL-aware store without touching calibration logic.

use crate::error::VisionError;
use crate::types::{
    Calibration, CalibrationAttempt, CalibrationPoint, CalibrationResult, CalibrationSummary,
    CalibrationTarget, DeviceInfo,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Minimum accuracy (0-100) for a calibration to be persisted
pub const ACCURACY_THRESHOLD: f64 = 70.0;
/// Mean pixel error mapping to 0% accuracy
pub const MAX_MEAN_ERROR_PX: f64 = 200.0;
/// Calibration validity window
pub const CALIBRATION_VALIDITY_DAYS: i64 = 7;
/// Number of targets in the calibration grid
pub const CALIBRATION_POINT_COUNT: usize = 9;

/// Normalized 3x3 target grid, row-major
pub const GRID_POSITIONS: [(f64, f64); 9] = [
    (0.1, 0.1),
    (0.5, 0.1),
    (0.9, 0.1),
    (0.1, 0.5),
    (0.5, 0.5),
    (0.9, 0.5),
    (0.1, 0.9),
    (0.5, 0.9),
    (0.9, 0.9),
];

/// Keyed storage for in-progress calibration attempts.
///
/// The default implementation is process-local; a multi-instance deployment
/// should provide a shared, TTL-capable implementation.
pub trait CalibrationSessionStore {
    fn get(&self, attempt_id: &str) -> Option<CalibrationAttempt>;
    fn put(&mut self, attempt_id: String, attempt: CalibrationAttempt);
    fn delete(&mut self, attempt_id: &str);
}

/// In-memory calibration session store for single-process deployments
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    attempts: HashMap<String, CalibrationAttempt>,
}

impl CalibrationSessionStore for InMemorySessionStore {
    fn get(&self, attempt_id: &str) -> Option<CalibrationAttempt> {
        self.attempts.get(attempt_id).cloned()
    }

    fn put(&mut self, attempt_id: String, attempt: CalibrationAttempt) {
        self.attempts.insert(attempt_id, attempt);
    }

    fn delete(&mut self, attempt_id: &str) {
        self.attempts.remove(attempt_id);
    }
}

/// Persisted calibrations keyed by id. Records are immutable once inserted.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CalibrationStore {
    calibrations: HashMap<String, Calibration>,
}

impl CalibrationStore {
    pub fn get(&self, calibration_id: &str) -> Option<&Calibration> {
        self.calibrations.get(calibration_id)
    }

    pub fn insert(&mut self, calibration: Calibration) {
        self.calibrations.insert(calibration.id.clone(), calibration);
    }

    /// Most recent unexpired calibration for an owner
    pub fn active_for_owner(&self, owner_id: &str, now: DateTime<Utc>) -> Option<&Calibration> {
        self.calibrations
            .values()
            .filter(|c| c.owner_id == owner_id && c.is_active(now))
            .max_by_key(|c| c.created_at)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Response to starting a calibration attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartCalibrationResponse {
    pub attempt_id: String,
    pub targets: Vec<CalibrationTarget>,
}

/// Response to recording a single calibration point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPointResponse {
    pub point_id: u8,
    pub error_px: f64,
    pub attempts: u32,
    pub recorded_points: usize,
    pub total_points: usize,
}

/// Calibration manager: protocol driver over the attempt and calibration stores
pub struct CalibrationManager {
    attempts: Box<dyn CalibrationSessionStore + Send>,
    store: CalibrationStore,
}

impl Default for CalibrationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationManager {
    /// Create a manager backed by the in-memory attempt store
    pub fn new() -> Self {
        Self {
            attempts: Box::new(InMemorySessionStore::default()),
            store: CalibrationStore::default(),
        }
    }

    /// Create a manager with a custom attempt store implementation
    pub fn with_session_store(attempts: Box<dyn CalibrationSessionStore + Send>) -> Self {
        Self {
            attempts,
            store: CalibrationStore::default(),
        }
    }

    /// The fixed 3x3 target grid handed to clients
    pub fn targets() -> Vec<CalibrationTarget> {
        GRID_POSITIONS
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| CalibrationTarget {
                id: (i + 1) as u8,
                x,
                y,
            })
            .collect()
    }

    /// Begin a calibration attempt for an owner and device.
    /// Returns the fresh attempt id and the 9 target points.
    pub fn start_calibration(
        &mut self,
        owner_id: &str,
        device_info: DeviceInfo,
    ) -> StartCalibrationResponse {
        let attempt_id = Uuid::new_v4().to_string();
        log::debug!("starting calibration attempt {attempt_id} for owner {owner_id}");

        self.attempts.put(
            attempt_id.clone(),
            CalibrationAttempt {
                owner_id: owner_id.to_string(),
                device_info,
                points: Vec::new(),
                started_at: Utc::now(),
            },
        );

        StartCalibrationResponse {
            attempt_id,
            targets: Self::targets(),
        }
    }

    /// Record the observed gaze position for one target.
    ///
    /// The pixel error is the Euclidean distance between observed and
    /// expected positions after scaling both by the device screen
    /// dimensions. Re-recording a target overwrites it and increments its
    /// attempt counter.
    pub fn record_point(
        &mut self,
        attempt_id: &str,
        point_id: u8,
        observed_x: f64,
        observed_y: f64,
    ) -> Result<RecordPointResponse, VisionError> {
        let mut attempt = self
            .attempts
            .get(attempt_id)
            .ok_or_else(|| VisionError::CalibrationNotFound(attempt_id.to_string()))?;

        if point_id == 0 || point_id as usize > CALIBRATION_POINT_COUNT {
            return Err(VisionError::InvalidGazeData(format!(
                "calibration point id out of range: {point_id}"
            )));
        }

        let (expected_x, expected_y) = GRID_POSITIONS[(point_id - 1) as usize];
        let dx = (observed_x - expected_x) * attempt.device_info.screen_width;
        let dy = (observed_y - expected_y) * attempt.device_info.screen_height;
        let error_px = (dx * dx + dy * dy).sqrt();

        let mut point = CalibrationPoint {
            id: point_id,
            screen_x: expected_x,
            screen_y: expected_y,
            actual_x: observed_x,
            actual_y: observed_y,
            error_px,
            attempts: 1,
        };

        // Upsert by target id; retries replace the prior observation.
        if let Some(existing) = attempt.points.iter_mut().find(|p| p.id == point_id) {
            point.attempts = existing.attempts + 1;
            *existing = point.clone();
        } else {
            attempt.points.push(point.clone());
        }

        let recorded = attempt.points.len();
        self.attempts.put(attempt_id.to_string(), attempt);

        Ok(RecordPointResponse {
            point_id,
            error_px,
            attempts: point.attempts,
            recorded_points: recorded,
            total_points: CALIBRATION_POINT_COUNT,
        })
    }

    /// Score the attempt, derive the transform and persist a calibration.
    ///
    /// Accuracy is `clamp(100 - (mean error / 200) * 100, 0, 100)`. On
    /// success the ephemeral attempt is discarded and a calibration with a
    /// 7-day expiry is stored; on an accuracy failure nothing is persisted
    /// and the numeric diagnostics are returned in the error.
    pub fn validate(&mut self, attempt_id: &str) -> Result<CalibrationResult, VisionError> {
        let attempt = self
            .attempts
            .get(attempt_id)
            .ok_or_else(|| VisionError::CalibrationNotFound(attempt_id.to_string()))?;

        if attempt.points.len() < CALIBRATION_POINT_COUNT {
            return Err(VisionError::InvalidGazeData(format!(
                "only {}/{} calibration points recorded",
                attempt.points.len(),
                CALIBRATION_POINT_COUNT
            )));
        }

        let mean_error_px =
            attempt.points.iter().map(|p| p.error_px).sum::<f64>() / attempt.points.len() as f64;
        let accuracy = (100.0 - (mean_error_px / MAX_MEAN_ERROR_PX) * 100.0).clamp(0.0, 100.0);

        if accuracy < ACCURACY_THRESHOLD {
            log::info!(
                "calibration attempt {attempt_id} rejected: accuracy {accuracy:.1}% below threshold"
            );
            return Err(VisionError::CalibrationAccuracyLow {
                accuracy,
                threshold: ACCURACY_THRESHOLD,
                mean_error_px,
                points: attempt.points.clone(),
            });
        }

        let transform_matrix = compute_transform_matrix(&attempt.points);
        let now = Utc::now();
        let calibration = Calibration {
            id: Uuid::new_v4().to_string(),
            owner_id: attempt.owner_id.clone(),
            points: attempt.points.clone(),
            overall_accuracy: accuracy,
            transform_matrix,
            device_info: attempt.device_info.clone(),
            created_at: now,
            expires_at: now + Duration::days(CALIBRATION_VALIDITY_DAYS),
        };

        let result = CalibrationResult {
            calibration_id: calibration.id.clone(),
            overall_accuracy: accuracy,
            points: calibration.points.clone(),
            transform_matrix,
            expires_at: calibration.expires_at,
        };

        log::info!(
            "calibration {} persisted for owner {} at {:.1}% accuracy",
            calibration.id,
            calibration.owner_id,
            accuracy
        );
        self.store.insert(calibration);
        self.attempts.delete(attempt_id);

        Ok(result)
    }

    /// Most recent unexpired calibration for an owner, or `None`
    pub fn get_active_calibration(&self, owner_id: &str) -> Option<CalibrationSummary> {
        let now = Utc::now();
        self.store.active_for_owner(owner_id, now).map(|c| {
            let days_remaining = (c.expires_at - now).num_days().max(0) + 1;
            CalibrationSummary {
                calibration_id: c.id.clone(),
                overall_accuracy: c.overall_accuracy,
                created_at: c.created_at,
                expires_at: c.expires_at,
                days_remaining,
            }
        })
    }

    /// Look up a persisted calibration by id
    pub fn get_calibration(&self, calibration_id: &str) -> Option<&Calibration> {
        self.store.get(calibration_id)
    }

    /// Import a previously persisted calibration (state restore)
    pub fn import_calibration(&mut self, calibration: Calibration) {
        self.store.insert(calibration);
    }

    /// Access the persisted store for state export
    pub fn store(&self) -> &CalibrationStore {
        &self.store
    }

    /// Replace the persisted store (state restore)
    pub fn set_store(&mut self, store: CalibrationStore) {
        self.store = store;
    }
}

/// Derive the simplified affine transform from the 9 recorded points.
///
/// Offsets are the averaged (observed - expected) deltas over all points.
/// Scale ratios average observed/expected only over the 6 non-center points
/// per axis: the center coordinate 0.5 would make the ratio degenerate.
/// Deterministic; same points produce the same matrix.
pub fn compute_transform_matrix(points: &[CalibrationPoint]) -> [[f64; 3]; 3] {
    let mut sum_offset_x = 0.0;
    let mut sum_offset_y = 0.0;
    let mut sum_scale_x = 0.0;
    let mut sum_scale_y = 0.0;
    let mut scale_x_count = 0usize;
    let mut scale_y_count = 0usize;

    for point in points {
        sum_offset_x += point.actual_x - point.screen_x;
        sum_offset_y += point.actual_y - point.screen_y;

        if point.screen_x != 0.5 {
            sum_scale_x += point.actual_x / point.screen_x;
            scale_x_count += 1;
        }
        if point.screen_y != 0.5 {
            sum_scale_y += point.actual_y / point.screen_y;
            scale_y_count += 1;
        }
    }

    let n = points.len() as f64;
    let offset_x = if points.is_empty() { 0.0 } else { sum_offset_x / n };
    let offset_y = if points.is_empty() { 0.0 } else { sum_offset_y / n };
    let scale_x = if scale_x_count > 0 {
        sum_scale_x / scale_x_count as f64
    } else {
        1.0
    };
    let scale_y = if scale_y_count > 0 {
        sum_scale_y / scale_y_count as f64
    } else {
        1.0
    };

    [
        [scale_x, 0.0, offset_x],
        [0.0, scale_y, offset_y],
        [0.0, 0.0, 1.0],
    ]
}
