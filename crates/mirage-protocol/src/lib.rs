pub mod block_change;
pub mod chunk_data;
pub mod packet;
pub mod unload_chunk;
pub mod update_light;

pub use block_change::MultiBlockChangePacket;
pub use chunk_data::{ChunkDataPacket, ChunkSection, Palette};
pub use packet::{send_packet, Packet, PacketBuffer};
pub use unload_chunk::UnloadChunkPacket;
pub use update_light::UpdateLightPacket;
