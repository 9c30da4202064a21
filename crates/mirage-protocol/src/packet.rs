use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Client-bound packet. The engine only ever writes these; reading is left
/// default-unimplemented because no packet here travels server-bound.
pub trait Packet {
    /// Protocol packet ID.
    fn packet_id() -> i32
    where
        Self: Sized;

    /// Writes the packet body (ID included) into the buffer.
    fn write_to_buffer(&self, buffer: &mut PacketBuffer) -> io::Result<()>;
}

/// Sends a packet over the given stream, framed by a VarInt body length.
pub async fn send_packet<T: Packet, W: AsyncWrite + Unpin>(
    packet: T,
    socket: &mut W,
) -> io::Result<()> {
    let mut body = PacketBuffer::new();
    packet.write_to_buffer(&mut body)?;

    let mut framed = PacketBuffer::new();
    framed.write_varint(body.buffer.len() as i32);
    framed.buffer.extend_from_slice(&body.buffer);

    socket.write_all(&framed.buffer).await?;
    Ok(())
}

/// Growable wire buffer with a read cursor. Writes append; reads advance
/// the cursor. All multi-byte values are network (big-endian) order.
#[derive(Debug, Default)]
pub struct PacketBuffer {
    pub buffer: Vec<u8>,
    cursor: usize,
}

impl PacketBuffer {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            buffer: bytes,
            cursor: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Writes a VarInt: 7 bits per byte, high bit set on every byte except
    /// the last.
    pub fn write_varint(&mut self, mut value: i32) {
        while (value & !0x7F) != 0 {
            self.buffer.push(((value & 0x7F) as u8) | 0x80);
            value = ((value as u32) >> 7) as i32;
        }
        self.buffer.push((value & 0x7F) as u8);
    }

    pub fn read_varint(&mut self) -> io::Result<i32> {
        let mut result = 0;
        let mut shift = 0;

        loop {
            if self.cursor >= self.buffer.len() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "EOF while reading VarInt",
                ));
            }

            let byte = self.buffer[self.cursor];
            self.cursor += 1;

            result |= ((byte & 0x7F) as i32) << shift;
            shift += 7;

            if (byte & 0x80) == 0 {
                break;
            }

            if shift >= 32 {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "VarInt too big"));
            }
        }

        Ok(result)
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(value as u8);
    }

    pub fn read_bool(&mut self) -> io::Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        if self.cursor >= self.buffer.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Not enough bytes to read u8",
            ));
        }
        let value = self.buffer[self.cursor];
        self.cursor += 1;
        Ok(value)
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        if self.cursor + 2 > self.buffer.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Not enough bytes to read u16",
            ));
        }
        let mut bytes = [0u8; 2];
        bytes.copy_from_slice(&self.buffer[self.cursor..self.cursor + 2]);
        self.cursor += 2;
        Ok(u16::from_be_bytes(bytes))
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn read_i32(&mut self) -> io::Result<i32> {
        if self.cursor + 4 > self.buffer.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Not enough bytes to read i32",
            ));
        }
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.buffer[self.cursor..self.cursor + 4]);
        self.cursor += 4;
        Ok(i32::from_be_bytes(bytes))
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn read_i64(&mut self) -> io::Result<i64> {
        if self.cursor + 8 > self.buffer.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Not enough bytes to read i64",
            ));
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.buffer[self.cursor..self.cursor + 8]);
        self.cursor += 8;
        Ok(i64::from_be_bytes(bytes))
    }

    pub fn write_bytes_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }
}
