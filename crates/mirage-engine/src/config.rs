use crate::light::LightMode;
use mirage_common::{MirageError, Result};
use serde::{Deserialize, Serialize};

/// Construction-time configuration for the engine. Plain values handed in
/// by the owning system; there is no file or CLI surface here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Synthesis worker threads. Defaults to twice the core count.
    pub pool_size: usize,
    /// Maximum chunk units dequeued per viewer per tick.
    pub chunks_per_tick: usize,
    /// Bound on the worker task queue; a full queue defers the chunk to
    /// the next tick instead of growing memory under overload.
    pub task_queue_bound: usize,
    /// Capacity of the synthesized-overlay result cache.
    pub result_cache_capacity: usize,
    pub light_mode: LightMode,
    /// Biome id used to fill every column (layers do not override biome).
    pub default_biome: i32,
    /// Vertical sections per column; must match the host world height.
    pub world_sections: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: num_cpus::get() * 2,
            chunks_per_tick: 4,
            task_queue_bound: 256,
            result_cache_capacity: 512,
            light_mode: LightMode::Copy,
            default_biome: 127,
            world_sections: 16,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(MirageError::InvalidInput("pool_size must be >= 1".into()));
        }
        if self.chunks_per_tick == 0 {
            return Err(MirageError::InvalidInput(
                "chunks_per_tick must be >= 1".into(),
            ));
        }
        if self.task_queue_bound == 0 {
            return Err(MirageError::InvalidInput(
                "task_queue_bound must be >= 1".into(),
            ));
        }
        if self.result_cache_capacity == 0 {
            return Err(MirageError::InvalidInput(
                "result_cache_capacity must be >= 1".into(),
            ));
        }
        // Section masks travel as 32-bit ints.
        if self.world_sections == 0 || self.world_sections > 32 {
            return Err(MirageError::InvalidInput(
                "world_sections must be in 1..=32".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.pool_size >= 2);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = EngineConfig::default();
        config.chunks_per_tick = 0;
        assert_matches!(config.validate(), Err(MirageError::InvalidInput(_)));

        let mut config = EngineConfig::default();
        config.world_sections = 33;
        assert_matches!(config.validate(), Err(MirageError::InvalidInput(_)));
    }
}
