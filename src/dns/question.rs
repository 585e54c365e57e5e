use bitstream_io::{BitWrite, BitWriter, Endianness};

use super::{
    common::{read_u16_at, PacketComponent},
    enums::{RecordClass, RecordType},
    name::{read_name_at, Name},
    ParseError,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: Name,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

impl DnsQuestion {
    pub fn new(name: Name, qtype: RecordType) -> Self {
        DnsQuestion {
            name,
            qtype,
            qclass: RecordClass::IN,
        }
    }

    /// Parse a question at `offset`, returning it and the offset just past it
    pub fn read_at(packet: &[u8], offset: usize) -> Result<(Self, usize), ParseError> {
        let (name, after_name) = read_name_at(packet, offset)?;
        let qtype = read_u16_at(packet, after_name)?.into();
        let qclass = read_u16_at(packet, after_name + 2)?.into();
        Ok((
            DnsQuestion {
                name,
                qtype,
                qclass,
            },
            after_name + 4,
        ))
    }
}

impl PacketComponent for DnsQuestion {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        self.write_name(writer, &self.name)?;
        writer.write::<u16>(16, self.qtype.to_u16())?;
        writer.write::<u16>(16, self.qclass.to_u16())?;
        Ok(())
    }
}
