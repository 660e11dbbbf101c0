//! Vision session lifecycle
//!
//! Binds a host test session to a calibration and gates the start → ingest →
//! submit flow. Gaze chunks are filtered on ingestion and appended to an
//! immutable, append-only store; the lifecycle also drives the host
//! session's own status field (in-progress on start, completed on submit).

use crate::error::VisionError;
use crate::types::{
    GazeChunk, GazeChunkInput, HostSession, HostSessionStatus, TestType, VisionConfig,
    VisionPassage, VisionSessionState, VisionTestSession,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Boundary to the host testing platform.
///
/// The host owns session existence, ownership, the test-type flag and the
/// passage configuration; this engine only reads them and drives the status
/// field.
pub trait HostPlatform {
    fn find_session(&self, host_session_id: &str) -> Option<HostSession>;
    fn set_status(
        &mut self,
        host_session_id: &str,
        status: HostSessionStatus,
        at: DateTime<Utc>,
    ) -> Result<(), VisionError>;
    /// Comprehension accuracy percentage from the host's grading pipeline,
    /// once available
    fn comprehension_accuracy(&self, host_session_id: &str) -> Option<f64>;
}

/// In-memory host platform, used in tests and single-process embeddings
#[derive(Debug, Default)]
pub struct InMemoryHostPlatform {
    sessions: HashMap<String, HostSession>,
    accuracy: HashMap<String, f64>,
}

impl InMemoryHostPlatform {
    pub fn register_session(&mut self, session: HostSession) {
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn record_accuracy(&mut self, host_session_id: &str, percentage: f64) {
        self.accuracy.insert(host_session_id.to_string(), percentage);
    }
}

impl HostPlatform for InMemoryHostPlatform {
    fn find_session(&self, host_session_id: &str) -> Option<HostSession> {
        self.sessions.get(host_session_id).cloned()
    }

    fn set_status(
        &mut self,
        host_session_id: &str,
        status: HostSessionStatus,
        at: DateTime<Utc>,
    ) -> Result<(), VisionError> {
        let session = self
            .sessions
            .get_mut(host_session_id)
            .ok_or_else(|| VisionError::SessionNotFound(host_session_id.to_string()))?;
        session.status = status;
        match status {
            HostSessionStatus::InProgress => session.started_at = Some(at),
            HostSessionStatus::Completed => session.completed_at = Some(at),
            HostSessionStatus::Pending => {}
        }
        Ok(())
    }

    fn comprehension_accuracy(&self, host_session_id: &str) -> Option<f64> {
        self.accuracy.get(host_session_id).copied()
    }
}

/// Append-only storage of filtered gaze chunks, keyed by vision session
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GazeChunkStore {
    chunks: HashMap<String, Vec<GazeChunk>>,
}

impl GazeChunkStore {
    pub fn append(&mut self, chunk: GazeChunk) {
        self.chunks
            .entry(chunk.vision_session_id.clone())
            .or_default()
            .push(chunk);
    }

    /// Chunks for a session in append order
    pub fn for_session(&self, vision_session_id: &str) -> &[GazeChunk] {
        self.chunks
            .get(vision_session_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn chunk_count(&self, vision_session_id: &str) -> usize {
        self.for_session(vision_session_id).len()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Persisted vision sessions keyed by id
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct VisionSessionStore {
    sessions: HashMap<String, VisionTestSession>,
    /// host session id -> vision session id, enforcing the one-to-one bind
    by_host: HashMap<String, String>,
}

impl VisionSessionStore {
    pub fn get(&self, vision_session_id: &str) -> Option<&VisionTestSession> {
        self.sessions.get(vision_session_id)
    }

    pub fn get_mut(&mut self, vision_session_id: &str) -> Option<&mut VisionTestSession> {
        self.sessions.get_mut(vision_session_id)
    }

    pub fn by_host_session(&self, host_session_id: &str) -> Option<&VisionTestSession> {
        self.by_host
            .get(host_session_id)
            .and_then(|id| self.sessions.get(id))
    }

    pub fn insert(&mut self, session: VisionTestSession) {
        self.by_host
            .insert(session.host_session_id.clone(), session.id.clone());
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Response to starting a vision session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub vision_session_id: String,
    pub passages: Vec<VisionPassage>,
    pub calibration_score: f64,
}

/// Outcome of saving one gaze chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveGazeResponse {
    /// False when every point was filtered out; not an error
    pub saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    pub stored_points: usize,
    pub filtered_points: usize,
}

/// Submission acknowledgment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub vision_session_id: String,
    pub chunk_count: usize,
    pub completed_at: DateTime<Utc>,
}

/// Session lifecycle manager over the vision-session and chunk stores
pub struct SessionManager {
    sessions: VisionSessionStore,
    chunks: GazeChunkStore,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: VisionSessionStore::default(),
            chunks: GazeChunkStore::default(),
        }
    }

    /// Start a vision session against a host session and calibration.
    ///
    /// The calibration must be unexpired, above the accuracy threshold by
    /// construction, and owned by the host session's student. A second
    /// start for the same host session is rejected, not a no-op.
    pub fn start_session(
        &mut self,
        host: &mut dyn HostPlatform,
        host_session_id: &str,
        calibration: &crate::types::Calibration,
    ) -> Result<StartSessionResponse, VisionError> {
        let host_session = host
            .find_session(host_session_id)
            .ok_or_else(|| VisionError::SessionNotFound(host_session_id.to_string()))?;

        if host_session.test_type != TestType::GazeTracking {
            return Err(VisionError::InvalidState(format!(
                "host session {host_session_id} is not configured for gaze tracking"
            )));
        }

        let now = Utc::now();
        if !calibration.is_active(now) {
            return Err(VisionError::CalibrationExpired(calibration.id.clone()));
        }

        if calibration.owner_id != host_session.student_id {
            return Err(VisionError::OwnershipMismatch(format!(
                "calibration {} does not belong to student {}",
                calibration.id, host_session.student_id
            )));
        }

        if self.sessions.by_host_session(host_session_id).is_some() {
            return Err(VisionError::InvalidState(format!(
                "vision session already started for host session {host_session_id}"
            )));
        }

        let session = VisionTestSession {
            id: Uuid::new_v4().to_string(),
            host_session_id: host_session_id.to_string(),
            calibration_id: calibration.id.clone(),
            calibration_score: calibration.overall_accuracy,
            state: VisionSessionState::Active,
            created_at: now,
            reading_strategy: None,
        };
        let vision_session_id = session.id.clone();
        self.sessions.insert(session);

        host.set_status(host_session_id, HostSessionStatus::InProgress, now)?;
        log::info!(
            "vision session {vision_session_id} started for host session {host_session_id}"
        );

        Ok(StartSessionResponse {
            vision_session_id,
            passages: host_session.config.passages,
            calibration_score: calibration.overall_accuracy,
        })
    }

    /// Ingest one gaze chunk.
    ///
    /// Blink samples and samples under the confidence floor are dropped. A
    /// chunk that filters down to nothing is accepted with `saved: false`
    /// so a blink-heavy interval never interrupts the client stream.
    pub fn save_gaze_data(
        &mut self,
        vision_session_id: &str,
        input: GazeChunkInput,
    ) -> Result<SaveGazeResponse, VisionError> {
        self.sessions
            .get(vision_session_id)
            .ok_or_else(|| VisionError::SessionNotFound(vision_session_id.to_string()))?;

        if input.points.is_empty() {
            return Err(VisionError::InvalidGazeData(
                "gaze chunk contains no data points".to_string(),
            ));
        }

        let total = input.points.len();
        let surviving: Vec<_> = input.points.into_iter().filter(|p| p.is_usable()).collect();
        let filtered = total - surviving.len();

        if surviving.is_empty() {
            log::debug!(
                "gaze chunk for session {vision_session_id} dropped entirely ({total} samples filtered)"
            );
            return Ok(SaveGazeResponse {
                saved: false,
                chunk_id: None,
                stored_points: 0,
                filtered_points: filtered,
            });
        }

        let chunk = GazeChunk {
            id: Uuid::new_v4().to_string(),
            vision_session_id: vision_session_id.to_string(),
            passage_id: input.passage_id,
            total_points: surviving.len(),
            points: surviving,
            start_time: input.start_time,
            end_time: input.end_time,
        };
        let chunk_id = chunk.id.clone();
        let stored = chunk.total_points;
        self.chunks.append(chunk);

        Ok(SaveGazeResponse {
            saved: true,
            chunk_id: Some(chunk_id),
            stored_points: stored,
            filtered_points: filtered,
        })
    }

    /// Submit the session, optionally flushing one final chunk first.
    ///
    /// Fails when no chunks exist at all after the flush. Metrics are not
    /// computed here; that is a separate, explicitly triggered step so the
    /// host's own grading can finish first.
    pub fn submit_session(
        &mut self,
        host: &mut dyn HostPlatform,
        vision_session_id: &str,
        final_chunk: Option<GazeChunkInput>,
    ) -> Result<SubmitResponse, VisionError> {
        let session = self
            .sessions
            .get(vision_session_id)
            .ok_or_else(|| VisionError::SessionNotFound(vision_session_id.to_string()))?;
        if session.state == VisionSessionState::Submitted {
            return Err(VisionError::InvalidState(format!(
                "vision session {vision_session_id} has already been submitted"
            )));
        }
        let host_session_id = session.host_session_id.clone();

        if let Some(chunk) = final_chunk {
            if !chunk.points.is_empty() {
                self.save_gaze_data(vision_session_id, chunk)?;
            }
        }

        let chunk_count = self.chunks.chunk_count(vision_session_id);
        if chunk_count == 0 {
            return Err(VisionError::InvalidGazeData(
                "no gaze data recorded for this session".to_string(),
            ));
        }

        let now = Utc::now();
        if let Some(session) = self.sessions.get_mut(vision_session_id) {
            session.state = VisionSessionState::Submitted;
        }
        host.set_status(&host_session_id, HostSessionStatus::Completed, now)?;
        log::info!("vision session {vision_session_id} submitted with {chunk_count} chunks");

        Ok(SubmitResponse {
            vision_session_id: vision_session_id.to_string(),
            chunk_count,
            completed_at: now,
        })
    }

    pub fn get_session(&self, vision_session_id: &str) -> Option<&VisionTestSession> {
        self.sessions.get(vision_session_id)
    }

    pub fn get_session_mut(&mut self, vision_session_id: &str) -> Option<&mut VisionTestSession> {
        self.sessions.get_mut(vision_session_id)
    }

    pub fn by_host_session(&self, host_session_id: &str) -> Option<&VisionTestSession> {
        self.sessions.by_host_session(host_session_id)
    }

    pub fn chunks_for(&self, vision_session_id: &str) -> &[GazeChunk] {
        self.chunks.for_session(vision_session_id)
    }

    pub fn session_store(&self) -> &VisionSessionStore {
        &self.sessions
    }

    pub fn chunk_store(&self) -> &GazeChunkStore {
        &self.chunks
    }

    pub fn restore(&mut self, sessions: VisionSessionStore, chunks: GazeChunkStore) {
        self.sessions = sessions;
        self.chunks = chunks;
    }
}

/// Test/demo helper: a minimal gaze-tracking host session
pub fn host_session_fixture(id: &str, student_id: &str, config: VisionConfig) -> HostSession {
    HostSession {
        id: id.to_string(),
        student_id: student_id.to_string(),
        grade: 3,
        test_type: TestType::GazeTracking,
        status: HostSessionStatus::Pending,
        config,
        started_at: None,
        completed_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Calibration, DeviceInfo, ExpectedMetrics, GazePoint, GazeType, VisionPassage,
    };
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn test_config() -> VisionConfig {
        VisionConfig {
            passages: vec![VisionPassage {
                id: "p1".into(),
                word_count: 100,
                font_size: 18.0,
                line_height: 1.6,
                difficulty: 3,
                expected_wpm: 110.0,
            }],
            expected_metrics: ExpectedMetrics::default(),
        }
    }

    fn test_calibration(owner: &str, expired: bool) -> Calibration {
        let now = Utc::now();
        Calibration {
            id: format!("calib-{owner}"),
            owner_id: owner.to_string(),
            points: vec![],
            overall_accuracy: 88.0,
            transform_matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            device_info: DeviceInfo {
                user_agent: "iPad Safari/16.1".into(),
                screen_width: 1024.0,
                screen_height: 1366.0,
                device_pixel_ratio: 2.0,
                platform: "iPad".into(),
            },
            created_at: now - Duration::days(8),
            expires_at: if expired {
                now - Duration::days(1)
            } else {
                now + Duration::days(6)
            },
        }
    }

    fn sample_point(t: i64, gaze_type: GazeType, confidence: f64) -> GazePoint {
        GazePoint {
            x: 0.4,
            y: 0.3,
            timestamp: t,
            confidence,
            gaze_type,
        }
    }

    fn chunk_input(points: Vec<GazePoint>) -> GazeChunkInput {
        GazeChunkInput {
            passage_id: "p1".into(),
            points,
            start_time: Utc::now(),
            end_time: Utc::now(),
        }
    }

    fn started_session(
        manager: &mut SessionManager,
        host: &mut InMemoryHostPlatform,
    ) -> String {
        host.register_session(host_session_fixture("host-1", "student-1", test_config()));
        let calibration = test_calibration("student-1", false);
        manager
            .start_session(host, "host-1", &calibration)
            .unwrap()
            .vision_session_id
    }

    #[test]
    fn test_start_session_success() {
        let mut manager = SessionManager::new();
        let mut host = InMemoryHostPlatform::default();
        host.register_session(host_session_fixture("host-1", "student-1", test_config()));

        let calibration = test_calibration("student-1", false);
        let response = manager.start_session(&mut host, "host-1", &calibration).unwrap();

        assert_eq!(response.calibration_score, 88.0);
        assert_eq!(response.passages.len(), 1);

        // Host session flipped to in-progress with a start timestamp
        let host_session = host.find_session("host-1").unwrap();
        assert_eq!(host_session.status, HostSessionStatus::InProgress);
        assert!(host_session.started_at.is_some());

        // Accuracy snapshot captured on the vision session
        let session = manager.get_session(&response.vision_session_id).unwrap();
        assert_eq!(session.calibration_score, 88.0);
        assert_eq!(session.state, VisionSessionState::Active);
    }

    #[test]
    fn test_start_unknown_host_session() {
        let mut manager = SessionManager::new();
        let mut host = InMemoryHostPlatform::default();
        let calibration = test_calibration("student-1", false);

        let result = manager.start_session(&mut host, "missing", &calibration);
        assert!(matches!(result, Err(VisionError::SessionNotFound(_))));
    }

    #[test]
    fn test_start_wrong_test_type() {
        let mut manager = SessionManager::new();
        let mut host = InMemoryHostPlatform::default();
        let mut session = host_session_fixture("host-1", "student-1", test_config());
        session.test_type = TestType::Standard;
        host.register_session(session);

        let calibration = test_calibration("student-1", false);
        let result = manager.start_session(&mut host, "host-1", &calibration);
        assert!(matches!(result, Err(VisionError::InvalidState(_))));
    }

    #[test]
    fn test_start_with_expired_calibration() {
        let mut manager = SessionManager::new();
        let mut host = InMemoryHostPlatform::default();
        host.register_session(host_session_fixture("host-1", "student-1", test_config()));

        let calibration = test_calibration("student-1", true);
        let result = manager.start_session(&mut host, "host-1", &calibration);
        assert!(matches!(result, Err(VisionError::CalibrationExpired(_))));

        // No vision session was created
        assert!(manager.by_host_session("host-1").is_none());
        // Host session untouched
        assert_eq!(
            host.find_session("host-1").unwrap().status,
            HostSessionStatus::Pending
        );
    }

    #[test]
    fn test_start_ownership_mismatch() {
        let mut manager = SessionManager::new();
        let mut host = InMemoryHostPlatform::default();
        host.register_session(host_session_fixture("host-1", "student-1", test_config()));

        let calibration = test_calibration("someone-else", false);
        let result = manager.start_session(&mut host, "host-1", &calibration);
        assert!(matches!(result, Err(VisionError::OwnershipMismatch(_))));
    }

    #[test]
    fn test_second_start_rejected() {
        let mut manager = SessionManager::new();
        let mut host = InMemoryHostPlatform::default();
        started_session(&mut manager, &mut host);

        let calibration = test_calibration("student-1", false);
        let result = manager.start_session(&mut host, "host-1", &calibration);
        assert!(matches!(result, Err(VisionError::InvalidState(_))));
    }

    #[test]
    fn test_save_gaze_filters_blinks_and_low_confidence() {
        let mut manager = SessionManager::new();
        let mut host = InMemoryHostPlatform::default();
        let session_id = started_session(&mut manager, &mut host);

        let points = vec![
            sample_point(0, GazeType::Fixation, 0.9),
            sample_point(50, GazeType::Blink, 0.9),
            sample_point(100, GazeType::Saccade, 0.3),
            sample_point(150, GazeType::Fixation, 0.5),
        ];

        let response = manager.save_gaze_data(&session_id, chunk_input(points)).unwrap();
        assert!(response.saved);
        assert_eq!(response.stored_points, 2);
        assert_eq!(response.filtered_points, 2);

        let chunks = manager.chunks_for(&session_id);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].total_points, 2);
    }

    #[test]
    fn test_save_empty_chunk_is_error() {
        let mut manager = SessionManager::new();
        let mut host = InMemoryHostPlatform::default();
        let session_id = started_session(&mut manager, &mut host);

        let result = manager.save_gaze_data(&session_id, chunk_input(vec![]));
        assert!(matches!(result, Err(VisionError::InvalidGazeData(_))));
    }

    #[test]
    fn test_all_filtered_chunk_is_lenient() {
        let mut manager = SessionManager::new();
        let mut host = InMemoryHostPlatform::default();
        let session_id = started_session(&mut manager, &mut host);

        let points = vec![
            sample_point(0, GazeType::Blink, 0.9),
            sample_point(50, GazeType::Blink, 0.9),
        ];

        let response = manager.save_gaze_data(&session_id, chunk_input(points)).unwrap();
        assert!(!response.saved);
        assert_eq!(response.stored_points, 0);
        assert_eq!(response.filtered_points, 2);
        assert_eq!(manager.chunks_for(&session_id).len(), 0);
    }

    #[test]
    fn test_save_unknown_session() {
        let mut manager = SessionManager::new();
        let points = vec![sample_point(0, GazeType::Fixation, 0.9)];
        let result = manager.save_gaze_data("missing", chunk_input(points));
        assert!(matches!(result, Err(VisionError::SessionNotFound(_))));
    }

    #[test]
    fn test_submit_flushes_final_chunk() {
        let mut manager = SessionManager::new();
        let mut host = InMemoryHostPlatform::default();
        let session_id = started_session(&mut manager, &mut host);

        let final_chunk = chunk_input(vec![sample_point(0, GazeType::Fixation, 0.9)]);
        let response = manager
            .submit_session(&mut host, &session_id, Some(final_chunk))
            .unwrap();

        assert_eq!(response.chunk_count, 1);
        assert_eq!(
            host.find_session("host-1").unwrap().status,
            HostSessionStatus::Completed
        );
        assert!(host.find_session("host-1").unwrap().completed_at.is_some());
        assert_eq!(
            manager.get_session(&session_id).unwrap().state,
            VisionSessionState::Submitted
        );
    }

    #[test]
    fn test_second_submit_rejected() {
        let mut manager = SessionManager::new();
        let mut host = InMemoryHostPlatform::default();
        let session_id = started_session(&mut manager, &mut host);

        manager
            .save_gaze_data(
                &session_id,
                chunk_input(vec![sample_point(0, GazeType::Fixation, 0.9)]),
            )
            .unwrap();
        let first = manager.submit_session(&mut host, &session_id, None).unwrap();

        // repeat submit is rejected, even with a fresh final chunk
        let again = manager.submit_session(
            &mut host,
            &session_id,
            Some(chunk_input(vec![sample_point(100, GazeType::Fixation, 0.9)])),
        );
        assert!(matches!(again, Err(VisionError::InvalidState(_))));

        // the rejected call stored nothing and the host stayed completed
        assert_eq!(manager.chunks_for(&session_id).len(), first.chunk_count);
        assert_eq!(
            host.find_session("host-1").unwrap().status,
            HostSessionStatus::Completed
        );
    }

    #[test]
    fn test_submit_without_any_chunks_fails() {
        let mut manager = SessionManager::new();
        let mut host = InMemoryHostPlatform::default();
        let session_id = started_session(&mut manager, &mut host);

        let result = manager.submit_session(&mut host, &session_id, None);
        assert!(matches!(result, Err(VisionError::InvalidGazeData(_))));

        // Host stays in progress
        assert_eq!(
            host.find_session("host-1").unwrap().status,
            HostSessionStatus::InProgress
        );
    }

    #[test]
    fn test_submit_with_all_blink_final_chunk_counts_prior_chunks() {
        let mut manager = SessionManager::new();
        let mut host = InMemoryHostPlatform::default();
        let session_id = started_session(&mut manager, &mut host);

        manager
            .save_gaze_data(
                &session_id,
                chunk_input(vec![sample_point(0, GazeType::Fixation, 0.9)]),
            )
            .unwrap();

        let blink_chunk = chunk_input(vec![sample_point(100, GazeType::Blink, 0.9)]);
        let response = manager
            .submit_session(&mut host, &session_id, Some(blink_chunk))
            .unwrap();

        // The blink-only flush stored nothing; the earlier chunk carries it
        assert_eq!(response.chunk_count, 1);
    }

    #[test]
    fn test_store_round_trip() {
        let mut manager = SessionManager::new();
        let mut host = InMemoryHostPlatform::default();
        let session_id = started_session(&mut manager, &mut host);
        manager
            .save_gaze_data(
                &session_id,
                chunk_input(vec![sample_point(0, GazeType::Fixation, 0.9)]),
            )
            .unwrap();

        let sessions = VisionSessionStore::from_json(
            &manager.session_store().to_json().unwrap(),
        )
        .unwrap();
        let chunks = GazeChunkStore::from_json(&manager.chunk_store().to_json().unwrap()).unwrap();

        let mut restored = SessionManager::new();
        restored.restore(sessions, chunks);
        assert!(restored.get_session(&session_id).is_some());
        assert_eq!(restored.chunks_for(&session_id).len(), 1);
    }
}
