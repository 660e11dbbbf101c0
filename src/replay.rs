//! Admin replay and calibration-adjustment annotations
//!
//! Read-side view of a session's gaze stream for visualization, plus
//! advisory adjustment records. Adjustments are annotations only; stored
//! gaze data and computed metrics are never rewritten from them.

use crate::error::VisionError;
use crate::types::{AdjustmentRecord, CalibrationAdjustment, GazeChunk};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Full gaze stream of one session, ordered for playback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazeReplay {
    pub vision_session_id: String,
    /// Chunks in chronological order by start time
    pub chunks: Vec<GazeChunk>,
    pub total_points: usize,
    /// Wall-clock span from first chunk start to last chunk end, ms
    pub total_duration_ms: i64,
}

/// Assemble a replay from a session's stored chunks.
/// A session with no chunks has nothing to replay.
pub fn build_replay(
    vision_session_id: &str,
    chunks: &[GazeChunk],
) -> Result<GazeReplay, VisionError> {
    if chunks.is_empty() {
        return Err(VisionError::InvalidGazeData(format!(
            "no gaze data recorded for session {vision_session_id}"
        )));
    }

    let mut ordered: Vec<GazeChunk> = chunks.to_vec();
    ordered.sort_by_key(|c| c.start_time);

    let total_points = ordered.iter().map(|c| c.total_points).sum();
    let first_start: DateTime<Utc> = ordered[0].start_time;
    let last_end = ordered
        .iter()
        .map(|c| c.end_time)
        .max()
        .unwrap_or(first_start);
    let total_duration_ms = (last_end - first_start).num_milliseconds().max(0);

    Ok(GazeReplay {
        vision_session_id: vision_session_id.to_string(),
        chunks: ordered,
        total_points,
        total_duration_ms,
    })
}

/// Append-only adjustment annotations keyed by vision session
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AdjustmentStore {
    records: HashMap<String, Vec<AdjustmentRecord>>,
}

impl AdjustmentStore {
    pub fn record(
        &mut self,
        vision_session_id: &str,
        admin_id: &str,
        adjustments: CalibrationAdjustment,
        notes: Option<String>,
    ) -> &AdjustmentRecord {
        let record = AdjustmentRecord {
            id: Uuid::new_v4().to_string(),
            vision_session_id: vision_session_id.to_string(),
            admin_id: admin_id.to_string(),
            adjustments,
            notes,
            created_at: Utc::now(),
        };
        log::info!(
            "adjustment {} recorded for session {vision_session_id} by {admin_id}",
            record.id
        );
        let entries = self
            .records
            .entry(vision_session_id.to_string())
            .or_default();
        entries.push(record);
        &entries[entries.len() - 1]
    }

    /// Annotations for a session in recording order
    pub fn for_session(&self, vision_session_id: &str) -> &[AdjustmentRecord] {
        self.records
            .get(vision_session_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GazePoint, GazeType};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn chunk(id: &str, start_offset_s: i64, n_points: usize) -> GazeChunk {
        let base = DateTime::<Utc>::UNIX_EPOCH;
        let start = base + Duration::seconds(start_offset_s);
        GazeChunk {
            id: id.into(),
            vision_session_id: "vs-1".into(),
            passage_id: "p1".into(),
            points: (0..n_points)
                .map(|i| GazePoint {
                    x: 0.5,
                    y: 0.5,
                    timestamp: i as i64 * 50,
                    confidence: 0.9,
                    gaze_type: GazeType::Fixation,
                })
                .collect(),
            total_points: n_points,
            start_time: start,
            end_time: start + Duration::seconds(5),
        }
    }

    #[test]
    fn test_replay_orders_chunks_chronologically() {
        let chunks = vec![chunk("c2", 10, 3), chunk("c1", 0, 2)];
        let replay = build_replay("vs-1", &chunks).unwrap();

        assert_eq!(replay.chunks[0].id, "c1");
        assert_eq!(replay.chunks[1].id, "c2");
        assert_eq!(replay.total_points, 5);
        // first start to last end: 10s offset + 5s chunk span
        assert_eq!(replay.total_duration_ms, 15_000);
    }

    #[test]
    fn test_replay_without_chunks_fails() {
        let result = build_replay("vs-1", &[]);
        assert!(matches!(result, Err(VisionError::InvalidGazeData(_))));
    }

    #[test]
    fn test_adjustments_accumulate() {
        let mut store = AdjustmentStore::default();
        let adjustment = CalibrationAdjustment {
            offset_x: 12.0,
            offset_y: -4.0,
            scale_x: 1.02,
            scale_y: 0.98,
            rotation: 0.5,
        };
        store.record("vs-1", "admin-1", adjustment.clone(), Some("drift".into()));
        store.record("vs-1", "admin-2", adjustment, None);

        let records = store.for_session("vs-1");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].admin_id, "admin-1");
        assert_eq!(records[0].notes.as_deref(), Some("drift"));
        assert!(store.for_session("vs-other").is_empty());
    }

    #[test]
    fn test_store_round_trip() {
        let mut store = AdjustmentStore::default();
        store.record(
            "vs-1",
            "admin-1",
            CalibrationAdjustment {
                offset_x: 0.0,
                offset_y: 0.0,
                scale_x: 1.0,
                scale_y: 1.0,
                rotation: 0.0,
            },
            None,
        );
        let restored = AdjustmentStore::from_json(&store.to_json().unwrap()).unwrap();
        assert_eq!(restored.for_session("vs-1").len(), 1);
    }
}
