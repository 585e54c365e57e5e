use bitstream_io::{BitWrite, BitWriter, Endianness};

use super::name::Name;
use super::ParseError;

/// Serialization half of the wire codec. Components are written through a
/// `BitWriter` (the header is genuinely bit-packed; everything else is byte
/// aligned). Parsing is done with explicit offsets instead, because
/// compression pointers reference absolute positions in the packet.
pub trait PacketComponent {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError>;

    /// Write a name without compression
    fn write_name<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
        name: &Name,
    ) -> Result<(), ParseError> {
        for label in name.labels() {
            writer.write::<u8>(8, label.len() as u8)?;
            writer.write_bytes(label.as_bytes())?;
        }
        writer.write::<u8>(8, 0)?;
        Ok(())
    }
}

/// Read a big-endian u16 at `offset`
pub fn read_u16_at(buf: &[u8], offset: usize) -> Result<u16, ParseError> {
    if offset + 2 > buf.len() {
        return Err(ParseError::InvalidBitStream("unexpected end of packet".into()));
    }
    Ok(u16::from_be_bytes([buf[offset], buf[offset + 1]]))
}

/// Read a big-endian u32 at `offset`
pub fn read_u32_at(buf: &[u8], offset: usize) -> Result<u32, ParseError> {
    if offset + 4 > buf.len() {
        return Err(ParseError::InvalidBitStream("unexpected end of packet".into()));
    }
    Ok(u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ]))
}
