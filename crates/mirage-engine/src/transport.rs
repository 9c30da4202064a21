use crate::overlay::ViewerId;
use crate::synth::ColumnUnit;
use mirage_common::ChunkPos;
use mirage_protocol::MultiBlockChangePacket;
use std::io;

/// Host-side delivery of synthesized packets to a viewer's connection.
/// Implementations are called from the main loop only; they own their own
/// buffering and connection state. Errors are logged and counted by the
/// engine, never propagated.
pub trait ChunkTransport: Send + Sync {
    /// Transmits one full column unit (chunk data + light).
    fn send_column(&self, viewer: ViewerId, unit: &ColumnUnit) -> io::Result<()>;

    /// Transmits the "forget this chunk" signal.
    fn send_unload(&self, viewer: ViewerId, chunk: ChunkPos) -> io::Result<()>;

    /// Transmits a small batch of single-block deltas.
    fn send_block_changes(
        &self,
        viewer: ViewerId,
        packet: &MultiBlockChangePacket,
    ) -> io::Result<()>;
}
