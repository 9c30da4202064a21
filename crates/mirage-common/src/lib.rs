pub mod block;
pub mod error;
pub mod light;
pub mod pos;

pub use block::BlockState;
pub use error::{MirageError, Result};
pub use light::{LightLevel, LightOverride};
pub use pos::{BlockPos, ChunkPos};
