use std::net::{Ipv4Addr, Ipv6Addr};

use super::enums::RecordType;
use super::name::{read_name_at, Name};
use super::ParseError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SoaData {
    pub mname: Name,
    pub rname: Name,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DsData {
    pub key_tag: u16,
    pub algorithm: u8,
    pub digest_type: u8,
    pub digest: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DnskeyData {
    pub flags: u16,
    pub protocol: u8,
    pub algorithm: u8,
    pub public_key: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RrsigData {
    pub type_covered: RecordType,
    pub algorithm: u8,
    pub labels: u8,
    pub original_ttl: u32,
    pub expiration: u32,
    pub inception: u32,
    pub key_tag: u16,
    pub signer_name: Name,
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Nsec3Data {
    pub hash_algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Vec<u8>,
    pub next_hashed: Vec<u8>,
    pub type_bit_maps: Vec<RecordType>,
}

/// Typed resource data. Types the responder never constructs are carried as
/// raw bytes so they survive untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(Name),
    Cname(Name),
    Txt(Vec<String>),
    Soa(SoaData),
    Ds(DsData),
    Dnskey(DnskeyData),
    Rrsig(RrsigData),
    Nsec3(Nsec3Data),
    Unknown(Vec<u8>),
}

impl Default for RecordData {
    fn default() -> Self {
        RecordData::Unknown(Vec::new())
    }
}

impl RecordData {
    /// Serialize to uncompressed wire format. Canonical form lowercases all
    /// embedded names (RFC 4034 section 6.2); it is what gets signed.
    pub fn to_wire(&self, canonical: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            RecordData::A(addr) => buf.extend_from_slice(&addr.octets()),
            RecordData::Aaaa(addr) => buf.extend_from_slice(&addr.octets()),
            RecordData::Ns(name) | RecordData::Cname(name) => {
                name.write_wire(&mut buf, canonical);
            }
            RecordData::Txt(strings) => {
                for s in strings {
                    let bytes = s.as_bytes();
                    let len = bytes.len().min(255);
                    buf.push(len as u8);
                    buf.extend_from_slice(&bytes[..len]);
                }
            }
            RecordData::Soa(soa) => {
                soa.mname.write_wire(&mut buf, canonical);
                soa.rname.write_wire(&mut buf, canonical);
                buf.extend_from_slice(&soa.serial.to_be_bytes());
                buf.extend_from_slice(&soa.refresh.to_be_bytes());
                buf.extend_from_slice(&soa.retry.to_be_bytes());
                buf.extend_from_slice(&soa.expire.to_be_bytes());
                buf.extend_from_slice(&soa.minimum.to_be_bytes());
            }
            RecordData::Ds(ds) => {
                buf.extend_from_slice(&ds.key_tag.to_be_bytes());
                buf.push(ds.algorithm);
                buf.push(ds.digest_type);
                buf.extend_from_slice(&ds.digest);
            }
            RecordData::Dnskey(key) => {
                buf.extend_from_slice(&key.flags.to_be_bytes());
                buf.push(key.protocol);
                buf.push(key.algorithm);
                buf.extend_from_slice(&key.public_key);
            }
            RecordData::Rrsig(sig) => {
                buf.extend_from_slice(&sig.type_covered.to_u16().to_be_bytes());
                buf.push(sig.algorithm);
                buf.push(sig.labels);
                buf.extend_from_slice(&sig.original_ttl.to_be_bytes());
                buf.extend_from_slice(&sig.expiration.to_be_bytes());
                buf.extend_from_slice(&sig.inception.to_be_bytes());
                buf.extend_from_slice(&sig.key_tag.to_be_bytes());
                // signer name is never compressed (RFC 4034 section 3.1.7)
                sig.signer_name.write_wire(&mut buf, canonical);
                buf.extend_from_slice(&sig.signature);
            }
            RecordData::Nsec3(nsec3) => {
                buf.push(nsec3.hash_algorithm);
                buf.push(nsec3.flags);
                buf.extend_from_slice(&nsec3.iterations.to_be_bytes());
                buf.push(nsec3.salt.len() as u8);
                buf.extend_from_slice(&nsec3.salt);
                buf.push(nsec3.next_hashed.len() as u8);
                buf.extend_from_slice(&nsec3.next_hashed);
                buf.extend_from_slice(&encode_type_bitmap(&nsec3.type_bit_maps));
            }
            RecordData::Unknown(raw) => buf.extend_from_slice(raw),
        }
        buf
    }

    /// Parse the rdata occupying `packet[start..start + len]`. Names inside
    /// the rdata may point back into earlier parts of `packet`.
    pub fn parse(
        rtype: RecordType,
        packet: &[u8],
        start: usize,
        len: usize,
    ) -> Result<Self, ParseError> {
        let end = start
            .checked_add(len)
            .filter(|&e| e <= packet.len())
            .ok_or(ParseError::InvalidBitStream("rdata out of bounds".into()))?;
        let rdata = &packet[start..end];

        let parsed = match rtype {
            RecordType::A => {
                if rdata.len() != 4 {
                    return Err(ParseError::InvalidBitStream("bad A rdata length".into()));
                }
                RecordData::A(Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]))
            }
            RecordType::AAAA => {
                if rdata.len() != 16 {
                    return Err(ParseError::InvalidBitStream("bad AAAA rdata length".into()));
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(rdata);
                RecordData::Aaaa(Ipv6Addr::from(octets))
            }
            RecordType::NS => {
                let (name, _) = read_name_at(packet, start)?;
                RecordData::Ns(name)
            }
            RecordType::CNAME => {
                let (name, _) = read_name_at(packet, start)?;
                RecordData::Cname(name)
            }
            RecordType::TXT => {
                let mut strings = Vec::new();
                let mut pos = 0;
                while pos < rdata.len() {
                    let slen = rdata[pos] as usize;
                    pos += 1;
                    if pos + slen > rdata.len() {
                        return Err(ParseError::InvalidBitStream("bad TXT rdata".into()));
                    }
                    let text = String::from_utf8(rdata[pos..pos + slen].to_vec())
                        .map_err(|_| ParseError::InvalidBitStream("non-UTF8 TXT".into()))?;
                    strings.push(text);
                    pos += slen;
                }
                RecordData::Txt(strings)
            }
            RecordType::SOA => {
                let (mname, after_mname) = read_name_at(packet, start)?;
                let (rname, after_rname) = read_name_at(packet, after_mname)?;
                if after_rname + 20 > end {
                    return Err(ParseError::InvalidBitStream("short SOA rdata".into()));
                }
                let f = &packet[after_rname..after_rname + 20];
                RecordData::Soa(SoaData {
                    mname,
                    rname,
                    serial: u32::from_be_bytes([f[0], f[1], f[2], f[3]]),
                    refresh: u32::from_be_bytes([f[4], f[5], f[6], f[7]]),
                    retry: u32::from_be_bytes([f[8], f[9], f[10], f[11]]),
                    expire: u32::from_be_bytes([f[12], f[13], f[14], f[15]]),
                    minimum: u32::from_be_bytes([f[16], f[17], f[18], f[19]]),
                })
            }
            RecordType::DS => {
                if rdata.len() < 4 {
                    return Err(ParseError::InvalidBitStream("short DS rdata".into()));
                }
                RecordData::Ds(DsData {
                    key_tag: u16::from_be_bytes([rdata[0], rdata[1]]),
                    algorithm: rdata[2],
                    digest_type: rdata[3],
                    digest: rdata[4..].to_vec(),
                })
            }
            RecordType::DNSKEY => {
                if rdata.len() < 4 {
                    return Err(ParseError::InvalidBitStream("short DNSKEY rdata".into()));
                }
                RecordData::Dnskey(DnskeyData {
                    flags: u16::from_be_bytes([rdata[0], rdata[1]]),
                    protocol: rdata[2],
                    algorithm: rdata[3],
                    public_key: rdata[4..].to_vec(),
                })
            }
            RecordType::RRSIG => {
                if rdata.len() < 18 {
                    return Err(ParseError::InvalidBitStream("short RRSIG rdata".into()));
                }
                let (signer_name, after_name) = read_name_at(packet, start + 18)?;
                if after_name > end {
                    return Err(ParseError::InvalidBitStream("bad RRSIG rdata".into()));
                }
                RecordData::Rrsig(RrsigData {
                    type_covered: u16::from_be_bytes([rdata[0], rdata[1]]).into(),
                    algorithm: rdata[2],
                    labels: rdata[3],
                    original_ttl: u32::from_be_bytes([rdata[4], rdata[5], rdata[6], rdata[7]]),
                    expiration: u32::from_be_bytes([rdata[8], rdata[9], rdata[10], rdata[11]]),
                    inception: u32::from_be_bytes([rdata[12], rdata[13], rdata[14], rdata[15]]),
                    key_tag: u16::from_be_bytes([rdata[16], rdata[17]]),
                    signer_name,
                    signature: packet[after_name..end].to_vec(),
                })
            }
            RecordType::NSEC3 => {
                if rdata.len() < 5 {
                    return Err(ParseError::InvalidBitStream("short NSEC3 rdata".into()));
                }
                let salt_len = rdata[4] as usize;
                let mut pos = 5;
                if pos + salt_len + 1 > rdata.len() {
                    return Err(ParseError::InvalidBitStream("bad NSEC3 salt".into()));
                }
                let salt = rdata[pos..pos + salt_len].to_vec();
                pos += salt_len;
                let hash_len = rdata[pos] as usize;
                pos += 1;
                if pos + hash_len > rdata.len() {
                    return Err(ParseError::InvalidBitStream("bad NSEC3 hash".into()));
                }
                let next_hashed = rdata[pos..pos + hash_len].to_vec();
                pos += hash_len;
                let type_bit_maps = decode_type_bitmap(&rdata[pos..])?;
                RecordData::Nsec3(Nsec3Data {
                    hash_algorithm: rdata[0],
                    flags: rdata[1],
                    iterations: u16::from_be_bytes([rdata[2], rdata[3]]),
                    salt,
                    next_hashed,
                    type_bit_maps,
                })
            }
            _ => RecordData::Unknown(rdata.to_vec()),
        };

        Ok(parsed)
    }
}

/// Encode a type set as windowed bitmaps (RFC 5155 section 3.2.1, shared with
/// NSEC). Types must not repeat; order of the input does not matter.
pub fn encode_type_bitmap(types: &[RecordType]) -> Vec<u8> {
    use std::collections::BTreeMap;

    let mut windows: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
    for rtype in types {
        let code = rtype.to_u16();
        let window = (code >> 8) as u8;
        let low = (code & 0x00FF) as u8;
        let index = (low / 8) as usize;
        let bit = 0b1000_0000u8 >> (low % 8);

        let bitmap = windows.entry(window).or_default();
        if bitmap.len() < index + 1 {
            bitmap.resize(index + 1, 0);
        }
        bitmap[index] |= bit;
    }

    let mut out = Vec::new();
    for (window, bitmap) in windows {
        out.push(window);
        out.push(bitmap.len() as u8);
        out.extend_from_slice(&bitmap);
    }
    out
}

pub fn decode_type_bitmap(mut data: &[u8]) -> Result<Vec<RecordType>, ParseError> {
    let mut types = Vec::new();
    while !data.is_empty() {
        if data.len() < 2 {
            return Err(ParseError::InvalidBitStream("bad type bitmap".into()));
        }
        let window = data[0];
        let len = data[1] as usize;
        if len == 0 || len > 32 || data.len() < 2 + len {
            return Err(ParseError::InvalidBitStream("bad type bitmap window".into()));
        }
        for (index, byte) in data[2..2 + len].iter().enumerate() {
            for bit in 0..8 {
                if byte & (0b1000_0000 >> bit) != 0 {
                    let code = ((window as u16) << 8) | (index as u16 * 8 + bit as u16);
                    types.push(RecordType::from_u16(code));
                }
            }
        }
        data = &data[2 + len..];
    }
    Ok(types)
}
