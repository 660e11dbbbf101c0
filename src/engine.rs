//! Engine facade
//!
//! Single entry point wiring the calibration manager, session lifecycle,
//! metrics engine, heatmap generator, strategy analyzer and admin replay
//! over one host-platform boundary. All processing is synchronous and
//! in-memory; the whole engine state exports to and restores from JSON.

use crate::analysis::{self, NarrativeGenerator, TemplateNarrativeGenerator};
use crate::calibration::{
    CalibrationManager, CalibrationStore, RecordPointResponse, StartCalibrationResponse,
};
use crate::error::VisionError;
use crate::heatmap;
use crate::metrics::{self, MetricsStore};
use crate::replay::{self, AdjustmentStore, GazeReplay};
use crate::session::{
    GazeChunkStore, HostPlatform, SaveGazeResponse, SessionManager, StartSessionResponse,
    SubmitResponse, VisionSessionStore,
};
use crate::types::{
    AdjustmentRecord, CalibrationAdjustment, CalibrationResult, CalibrationSummary, DeviceInfo,
    EnvironmentCheck, GazeChunkInput, HeatmapData, ReadingStrategy, StrategyAnalysis, TestType,
    VisionMetrics, VisionSessionState,
};
use serde::{Deserialize, Serialize};

/// Compact session status for host-side dashboards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub vision_session_id: String,
    pub host_session_id: String,
    pub state: VisionSessionState,
    pub calibration_id: String,
    pub calibration_score: f64,
    pub chunk_count: usize,
    pub metrics_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_strategy: Option<ReadingStrategy>,
}

/// Serializable snapshot of all engine stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub calibrations: CalibrationStore,
    pub sessions: VisionSessionStore,
    pub chunks: GazeChunkStore,
    pub metrics: MetricsStore,
    pub adjustments: AdjustmentStore,
}

/// The gaze reading-test engine.
///
/// Owns every store and the host boundary; callers drive the full flow
/// through this type: calibrate, start, ingest, submit, then compute
/// metrics, heatmaps and strategy analysis.
pub struct VisionEngine {
    host: Box<dyn HostPlatform + Send>,
    calibration: CalibrationManager,
    sessions: SessionManager,
    metrics: MetricsStore,
    adjustments: AdjustmentStore,
    narrator: Box<dyn NarrativeGenerator + Send>,
}

impl VisionEngine {
    pub fn new(host: Box<dyn HostPlatform + Send>) -> Self {
        Self {
            host,
            calibration: CalibrationManager::new(),
            sessions: SessionManager::new(),
            metrics: MetricsStore::default(),
            adjustments: AdjustmentStore::default(),
            narrator: Box::new(TemplateNarrativeGenerator),
        }
    }

    /// Swap in a different narrative backend
    pub fn with_narrator(mut self, narrator: Box<dyn NarrativeGenerator + Send>) -> Self {
        self.narrator = narrator;
        self
    }

    // --- pre-flight ---

    pub fn check_environment(&self, device: &DeviceInfo) -> EnvironmentCheck {
        crate::device::check_environment(device)
    }

    // --- calibration ---

    pub fn start_calibration(
        &mut self,
        owner_id: &str,
        device_info: DeviceInfo,
    ) -> StartCalibrationResponse {
        self.calibration.start_calibration(owner_id, device_info)
    }

    pub fn record_calibration_point(
        &mut self,
        attempt_id: &str,
        point_id: u8,
        observed_x: f64,
        observed_y: f64,
    ) -> Result<RecordPointResponse, VisionError> {
        self.calibration
            .record_point(attempt_id, point_id, observed_x, observed_y)
    }

    pub fn validate_calibration(
        &mut self,
        attempt_id: &str,
    ) -> Result<CalibrationResult, VisionError> {
        self.calibration.validate(attempt_id)
    }

    pub fn get_active_calibration(&self, owner_id: &str) -> Option<CalibrationSummary> {
        self.calibration.get_active_calibration(owner_id)
    }

    /// Direct access to the calibration manager, for embedders that
    /// provision calibrations out of band
    pub fn calibration_manager_mut(&mut self) -> &mut CalibrationManager {
        &mut self.calibration
    }

    // --- session lifecycle ---

    /// Start a vision session for a host session against a specific
    /// calibration. The test-type gate runs before any calibration
    /// lookup; an unknown calibration id is not-found, a known but
    /// expired one is expired. Neither failure creates a session.
    pub fn start_vision_session(
        &mut self,
        host_session_id: &str,
        calibration_id: &str,
    ) -> Result<StartSessionResponse, VisionError> {
        let host_session = self
            .host
            .find_session(host_session_id)
            .ok_or_else(|| VisionError::SessionNotFound(host_session_id.to_string()))?;

        if host_session.test_type != TestType::GazeTracking {
            return Err(VisionError::InvalidState(format!(
                "host session {host_session_id} is not configured for gaze tracking"
            )));
        }

        let calibration = self
            .calibration
            .get_calibration(calibration_id)
            .ok_or_else(|| VisionError::CalibrationNotFound(calibration_id.to_string()))?
            .clone();

        self.sessions
            .start_session(self.host.as_mut(), host_session_id, &calibration)
    }

    pub fn save_gaze_data(
        &mut self,
        vision_session_id: &str,
        input: GazeChunkInput,
    ) -> Result<SaveGazeResponse, VisionError> {
        self.sessions.save_gaze_data(vision_session_id, input)
    }

    pub fn submit_vision_session(
        &mut self,
        vision_session_id: &str,
        final_chunk: Option<GazeChunkInput>,
    ) -> Result<SubmitResponse, VisionError> {
        self.sessions
            .submit_session(self.host.as_mut(), vision_session_id, final_chunk)
    }

    pub fn session_summary(&self, host_session_id: &str) -> Result<SessionSummary, VisionError> {
        let session = self
            .sessions
            .by_host_session(host_session_id)
            .ok_or_else(|| VisionError::SessionNotFound(host_session_id.to_string()))?;
        Ok(SessionSummary {
            vision_session_id: session.id.clone(),
            host_session_id: session.host_session_id.clone(),
            state: session.state,
            calibration_id: session.calibration_id.clone(),
            calibration_score: session.calibration_score,
            chunk_count: self.sessions.chunks_for(&session.id).len(),
            metrics_available: self.metrics.contains(&session.id),
            reading_strategy: session.reading_strategy,
        })
    }

    // --- post-submission computation ---

    /// Compute and persist metrics for a submitted session. Write-once:
    /// a second call returns the stored result unchanged.
    pub fn calculate_metrics(
        &mut self,
        vision_session_id: &str,
    ) -> Result<VisionMetrics, VisionError> {
        if let Some(existing) = self.metrics.get(vision_session_id) {
            log::debug!("metrics for session {vision_session_id} already computed");
            return Ok(existing.clone());
        }

        let session = self
            .sessions
            .get_session(vision_session_id)
            .ok_or_else(|| VisionError::SessionNotFound(vision_session_id.to_string()))?;
        if session.state != VisionSessionState::Submitted {
            return Err(VisionError::InvalidState(format!(
                "session {vision_session_id} has not been submitted"
            )));
        }
        let host_session_id = session.host_session_id.clone();

        let host_session = self
            .host
            .find_session(&host_session_id)
            .ok_or_else(|| VisionError::SessionNotFound(host_session_id.clone()))?;
        let accuracy = self.host.comprehension_accuracy(&host_session_id);

        let chunks = self.sessions.chunks_for(vision_session_id);
        let points: Vec<_> = chunks.iter().flat_map(|c| c.points.iter().cloned()).collect();
        let computed =
            metrics::compute_metrics(vision_session_id, &points, &host_session.config, accuracy)?;
        Ok(self.metrics.insert_once(computed).clone())
    }

    /// Previously computed metrics for a host session
    pub fn get_metrics(&self, host_session_id: &str) -> Result<&VisionMetrics, VisionError> {
        let session = self
            .sessions
            .by_host_session(host_session_id)
            .ok_or_else(|| VisionError::SessionNotFound(host_session_id.to_string()))?;
        self.metrics.get(&session.id).ok_or_else(|| {
            VisionError::MetricsCalculationFailed(format!(
                "metrics not yet computed for session {}",
                session.id
            ))
        })
    }

    /// Per-passage attention heatmaps from the stored chunks
    pub fn generate_heatmaps(
        &self,
        vision_session_id: &str,
    ) -> Result<Vec<HeatmapData>, VisionError> {
        self.sessions
            .get_session(vision_session_id)
            .ok_or_else(|| VisionError::SessionNotFound(vision_session_id.to_string()))?;
        Ok(heatmap::generate_heatmaps(
            self.sessions.chunks_for(vision_session_id),
        ))
    }

    /// Classify reading strategy from computed metrics and record the
    /// label on the session
    pub fn analyze_strategy(
        &mut self,
        vision_session_id: &str,
    ) -> Result<StrategyAnalysis, VisionError> {
        let session = self
            .sessions
            .get_session(vision_session_id)
            .ok_or_else(|| VisionError::SessionNotFound(vision_session_id.to_string()))?;
        let host_session_id = session.host_session_id.clone();

        let computed = self.metrics.get(vision_session_id).cloned().ok_or_else(|| {
            VisionError::InvalidState(format!(
                "metrics must be computed before analyzing session {vision_session_id}"
            ))
        })?;

        let host_session = self
            .host
            .find_session(&host_session_id)
            .ok_or_else(|| VisionError::SessionNotFound(host_session_id.clone()))?;
        let accuracy = self.host.comprehension_accuracy(&host_session_id);

        let result = analysis::analyze_reading_strategy(
            &computed,
            host_session.grade,
            accuracy,
            self.narrator.as_ref(),
        );
        if let Some(session) = self.sessions.get_session_mut(vision_session_id) {
            session.reading_strategy = Some(result.reading_strategy);
        }
        Ok(result)
    }

    // --- admin ---

    pub fn replay_session(&self, vision_session_id: &str) -> Result<GazeReplay, VisionError> {
        self.sessions
            .get_session(vision_session_id)
            .ok_or_else(|| VisionError::SessionNotFound(vision_session_id.to_string()))?;
        replay::build_replay(vision_session_id, self.sessions.chunks_for(vision_session_id))
    }

    pub fn adjust_calibration(
        &mut self,
        vision_session_id: &str,
        admin_id: &str,
        adjustments: CalibrationAdjustment,
        notes: Option<String>,
    ) -> Result<AdjustmentRecord, VisionError> {
        self.sessions
            .get_session(vision_session_id)
            .ok_or_else(|| VisionError::SessionNotFound(vision_session_id.to_string()))?;
        Ok(self
            .adjustments
            .record(vision_session_id, admin_id, adjustments, notes)
            .clone())
    }

    pub fn adjustments_for(&self, vision_session_id: &str) -> &[AdjustmentRecord] {
        self.adjustments.for_session(vision_session_id)
    }

    // --- state persistence ---

    pub fn export_state(&self) -> Result<String, VisionError> {
        let state = EngineState {
            calibrations: self.calibration.store().clone(),
            sessions: self.sessions.session_store().clone(),
            chunks: self.sessions.chunk_store().clone(),
            metrics: self.metrics.clone(),
            adjustments: self.adjustments.clone(),
        };
        Ok(serde_json::to_string(&state)?)
    }

    pub fn import_state(&mut self, json: &str) -> Result<(), VisionError> {
        let state: EngineState = serde_json::from_str(json)?;
        self.calibration.set_store(state.calibrations);
        self.sessions.restore(state.sessions, state.chunks);
        self.metrics = state.metrics;
        self.adjustments = state.adjustments;
        Ok(())
    }
}
