use serde::{Deserialize, Serialize};

/// Opaque handle to a material + state description. Owned by the host's
/// block registry; this subsystem only needs equality, hashing and the
/// protocol-global id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockState {
    pub block_type: u16,
    pub properties: u16,
}

impl BlockState {
    pub fn new(block_type: u16, properties: u16) -> Self {
        Self {
            block_type,
            properties,
        }
    }

    pub fn is_air(&self) -> bool {
        self.block_type == 0
    }

    /// Global palette id used on the wire.
    pub fn global_id(&self) -> u32 {
        ((self.block_type as u32) << 16) | (self.properties as u32)
    }

    pub fn from_global_id(id: u32) -> Self {
        Self {
            block_type: ((id >> 16) & 0xFFFF) as u16,
            properties: (id & 0xFFFF) as u16,
        }
    }
}

impl Default for BlockState {
    fn default() -> Self {
        // Air
        Self {
            block_type: 0,
            properties: 0,
        }
    }
}
