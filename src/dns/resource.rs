use bitstream_io::{BitWrite, BitWriter, Endianness};

use super::{
    common::{read_u16_at, read_u32_at, PacketComponent},
    enums::{RecordClass, RecordType},
    name::{read_name_at, Name},
    rdata::RecordData,
    ParseError,
};

/// A single resource record with typed rdata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DnsRecord {
    pub name: Name,
    pub rtype: RecordType,
    pub class: RecordClass,
    pub ttl: u32,
    pub data: RecordData,
}

impl DnsRecord {
    pub fn new(name: Name, rtype: RecordType, ttl: u32, data: RecordData) -> Self {
        DnsRecord {
            name,
            rtype,
            class: RecordClass::IN,
            ttl,
            data,
        }
    }

    /// Parse a record at `offset`, returning it and the offset just past it.
    /// The full packet is needed so names in the rdata can follow
    /// compression pointers.
    pub fn read_at(packet: &[u8], offset: usize) -> Result<(Self, usize), ParseError> {
        let (name, after_name) = read_name_at(packet, offset)?;
        let rtype: RecordType = read_u16_at(packet, after_name)?.into();
        let class: RecordClass = read_u16_at(packet, after_name + 2)?.into();
        let ttl = read_u32_at(packet, after_name + 4)?;
        let rdlength = read_u16_at(packet, after_name + 8)? as usize;
        let rdata_start = after_name + 10;

        let data = RecordData::parse(rtype, packet, rdata_start, rdlength)?;

        Ok((
            DnsRecord {
                name,
                rtype,
                class,
                ttl,
                data,
            },
            rdata_start + rdlength,
        ))
    }

    /// Canonical wire form of the rdata; used for RRset ordering and signing
    pub fn canonical_rdata(&self) -> Vec<u8> {
        self.data.to_wire(true)
    }
}

impl PacketComponent for DnsRecord {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        self.write_name(writer, &self.name)?;
        writer.write::<u16>(16, self.rtype.to_u16())?;
        writer.write::<u16>(16, self.class.to_u16())?;
        writer.write::<u32>(32, self.ttl)?;

        let rdata = self.data.to_wire(false);
        writer.write::<u16>(16, rdata.len() as u16)?;
        writer.write_bytes(&rdata)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitstream_io::BigEndian;
    use std::net::Ipv4Addr;

    #[test]
    fn test_record_round_trip() {
        let record = DnsRecord::new(
            Name::parse("host.example.").unwrap(),
            RecordType::A,
            600,
            RecordData::A(Ipv4Addr::new(10, 0, 0, 2)),
        );

        let mut buf = Vec::new();
        let mut writer = BitWriter::<_, BigEndian>::new(&mut buf);
        record.write(&mut writer).unwrap();

        let (parsed, end) = DnsRecord::read_at(&buf, 0).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(end, buf.len());
    }
}
