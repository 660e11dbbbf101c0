//! readlens: an on-device gaze-tracking reading-test engine.
//!
//! The crate turns raw eye-tracking samples captured during a reading test
//! into reading-behavior metrics, attention heatmaps and a reading-strategy
//! classification. The flow mirrors how a test actually runs:
//!
//! 1. **Calibrate** - a 9-point protocol produces a scored, 7-day
//!    calibration gated at 70% accuracy ([`calibration`]).
//! 2. **Start** - a vision session binds a host test session to a valid
//!    calibration and snapshots its accuracy ([`session`]).
//! 3. **Ingest** - gaze chunks stream in; blinks and low-confidence
//!    samples are filtered before storage ([`session`]).
//! 4. **Submit & compute** - one batch pass derives the 15-metric set
//!    ([`metrics`]), per-passage heatmaps ([`heatmap`]) and a strategy
//!    analysis ([`analysis`]).
//!
//! [`VisionEngine`] wires all stages over a pluggable [`HostPlatform`]
//! boundary and exports/restores its full state as JSON. All computation
//! is synchronous, in-memory and deterministic apart from timestamps and
//! generated ids.
//!
//! ```
//! use readlens::{VisionEngine, InMemoryHostPlatform};
//!
//! let engine = VisionEngine::new(Box::new(InMemoryHostPlatform::default()));
//! ```

pub mod analysis;
pub mod calibration;
pub mod device;
pub mod engine;
pub mod error;
pub mod heatmap;
pub mod metrics;
pub mod replay;
pub mod session;
pub mod types;

pub use analysis::{analyze_reading_strategy, NarrativeGenerator, TemplateNarrativeGenerator};
pub use calibration::{CalibrationManager, CalibrationSessionStore, CalibrationStore};
pub use device::check_environment;
pub use engine::{EngineState, SessionSummary, VisionEngine};
pub use error::VisionError;
pub use heatmap::{generate_heatmaps, HEATMAP_GRID_HEIGHT, HEATMAP_GRID_WIDTH};
pub use metrics::{compute_metrics, MetricsStore};
pub use replay::{build_replay, GazeReplay};
pub use session::{HostPlatform, InMemoryHostPlatform, SessionManager};
pub use types::{
    Calibration, CalibrationResult, DeviceInfo, GazeChunk, GazeChunkInput, GazePoint, GazeType,
    HeatmapData, HostSession, ReadingStrategy, StrategyAnalysis, VisionConfig, VisionMetrics,
    VisionTestSession,
};

/// Engine version, from the crate version
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
