//! Per-viewer overlay cache and chunk-packet synthesis engine.
//!
//! Lets a voxel-world server show different block content to different
//! viewers without touching the shared authoritative world: named layers
//! of block overrides are merged per viewer, full chunk columns are
//! synthesized against a world snapshot (including packed illumination),
//! and delivery is rate limited and cancellable per viewer.

pub mod config;
pub mod engine;
pub mod light;
pub mod metrics;
pub mod overlay;
pub mod result_cache;
pub mod scheduler;
pub mod snapshot;
pub mod state_cache;
pub mod synth;
pub mod transport;

pub use config::EngineConfig;
pub use engine::OverlayEngine;
pub use light::{LightMode, LightOverrideStore};
pub use overlay::{EffectiveOverlay, OverlayCache, ViewerId};
pub use snapshot::{ColumnSnapshot, SectionSnapshot, WorldView};
pub use synth::{ChunkSynthesizer, ColumnUnit};
pub use transport::ChunkTransport;
