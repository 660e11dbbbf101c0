//! Attention heatmap generator
//!
//! Bins non-blink gaze samples into a fixed 32x18 grid per passage. Dwell
//! for a sample is the time until the next sample in the same passage; the
//! last sample contributes presence but no dwell. Cell intensity is dwell
//! normalized by the passage's busiest cell, so every passage spans the
//! full intensity range independently.

use crate::types::{GazeChunk, GazePoint, GazeType, HeatmapCell, HeatmapData};
use std::collections::HashMap;

pub const HEATMAP_GRID_WIDTH: u32 = 32;
pub const HEATMAP_GRID_HEIGHT: u32 = 18;

#[derive(Debug, Default, Clone, Copy)]
struct CellAccumulator {
    dwell_ms: f64,
    samples: u32,
}

fn cell_index(p: &GazePoint) -> (u32, u32) {
    let col = (p.x.clamp(0.0, 1.0) * HEATMAP_GRID_WIDTH as f64) as u32;
    let row = (p.y.clamp(0.0, 1.0) * HEATMAP_GRID_HEIGHT as f64) as u32;
    // x or y exactly 1.0 maps into the last cell, not past it
    (
        col.min(HEATMAP_GRID_WIDTH - 1),
        row.min(HEATMAP_GRID_HEIGHT - 1),
    )
}

/// Build one heatmap per passage from a session's chunks.
/// Passages come out in first-seen order; empty input yields no maps.
pub fn generate_heatmaps(chunks: &[GazeChunk]) -> Vec<HeatmapData> {
    let mut passage_order: Vec<String> = Vec::new();
    let mut by_passage: HashMap<String, Vec<GazePoint>> = HashMap::new();

    for chunk in chunks {
        if !by_passage.contains_key(&chunk.passage_id) {
            passage_order.push(chunk.passage_id.clone());
        }
        let entry = by_passage.entry(chunk.passage_id.clone()).or_default();
        entry.extend(
            chunk
                .points
                .iter()
                .filter(|p| p.gaze_type != GazeType::Blink)
                .cloned(),
        );
    }

    passage_order
        .into_iter()
        .filter_map(|passage_id| {
            let mut points = by_passage.remove(&passage_id)?;
            if points.is_empty() {
                return None;
            }
            points.sort_by_key(|p| p.timestamp);
            Some(heatmap_for_passage(passage_id, &points))
        })
        .collect()
}

fn heatmap_for_passage(passage_id: String, points: &[GazePoint]) -> HeatmapData {
    let mut cells: HashMap<(u32, u32), CellAccumulator> = HashMap::new();

    for (i, p) in points.iter().enumerate() {
        let acc = cells.entry(cell_index(p)).or_default();
        acc.samples += 1;
        if let Some(next) = points.get(i + 1) {
            let dwell = (next.timestamp - p.timestamp).max(0) as f64;
            acc.dwell_ms += dwell;
        }
    }

    let max_dwell = cells
        .values()
        .map(|c| c.dwell_ms)
        .fold(0.0_f64, f64::max);

    let mut out: Vec<HeatmapCell> = cells
        .into_iter()
        .map(|((x, y), acc)| HeatmapCell {
            x,
            y,
            intensity: if max_dwell > 0.0 {
                acc.dwell_ms / max_dwell
            } else {
                0.0
            },
            fixation_count: acc.samples,
            average_dwell_ms: if acc.samples > 0 {
                acc.dwell_ms / acc.samples as f64
            } else {
                0.0
            },
        })
        .collect();
    // deterministic output order, row-major
    out.sort_by_key(|c| (c.y, c.x));

    HeatmapData {
        passage_id,
        grid_width: HEATMAP_GRID_WIDTH,
        grid_height: HEATMAP_GRID_HEIGHT,
        cells: out,
    }
}
