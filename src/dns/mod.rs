pub mod common;
pub mod edns;
pub mod enums;
pub mod header;
pub mod name;
pub mod question;
pub mod rdata;
pub mod resource;

use bitstream_io::{BigEndian, BitReader, BitWriter};
use thiserror::Error;

use common::PacketComponent;
use edns::EdnsOpt;
use enums::{RecordClass, RecordType, ResponseCode};
use header::MessageHeader;
use question::DnsQuestion;
use resource::DnsRecord;

pub use name::Name;

#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("Invalid DNS header")]
    InvalidHeader,
    #[error("Invalid DNS label")]
    InvalidLabel,
    #[error("Invalid question section")]
    InvalidQuestionSection,
    #[error("Invalid answer section")]
    InvalidAnswerSection,
    #[error("Invalid authority section")]
    InvalidAuthoritySection,
    #[error("Invalid additional section")]
    InvalidAdditionalSection,
    #[error("Invalid bit stream: {0}")]
    InvalidBitStream(String),
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::InvalidBitStream(e.to_string())
    }
}

/// A full DNS message. The EDNS OPT pseudo-record is extracted from the
/// additional section on parse and appended back on serialize.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DnsMessage {
    pub header: MessageHeader,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsRecord>,
    pub authorities: Vec<DnsRecord>,
    pub additionals: Vec<DnsRecord>,
    pub edns: Option<EdnsOpt>,
}

impl DnsMessage {
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        if buf.len() < 12 {
            return Err(ParseError::InvalidHeader);
        }

        let mut message = DnsMessage::default();
        let mut reader = BitReader::<_, BigEndian>::new(buf);
        message.header.read(&mut reader)?;

        let mut offset = 12;

        for _ in 0..message.header.qdcount {
            let (question, next) = DnsQuestion::read_at(buf, offset)
                .map_err(|_| ParseError::InvalidQuestionSection)?;
            message.questions.push(question);
            offset = next;
        }

        for _ in 0..message.header.ancount {
            let (record, next) =
                DnsRecord::read_at(buf, offset).map_err(|_| ParseError::InvalidAnswerSection)?;
            message.answers.push(record);
            offset = next;
        }

        for _ in 0..message.header.nscount {
            let (record, next) =
                DnsRecord::read_at(buf, offset).map_err(|_| ParseError::InvalidAuthoritySection)?;
            message.authorities.push(record);
            offset = next;
        }

        for _ in 0..message.header.arcount {
            let (record, next) = DnsRecord::read_at(buf, offset)
                .map_err(|_| ParseError::InvalidAdditionalSection)?;

            if record.rtype == RecordType::OPT && record.name.is_root() {
                // the class field of an OPT record carries the UDP payload size
                let rdata = record.data.to_wire(false);
                let edns =
                    EdnsOpt::parse_from_resource(record.class.to_u16(), record.ttl, &rdata)?;
                message.edns = Some(edns);
            } else {
                message.additionals.push(record);
            }
            offset = next;
        }

        Ok(message)
    }

    pub fn serialize(&self) -> Result<Vec<u8>, ParseError> {
        let mut buf = Vec::new();
        let mut writer: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(&mut buf);

        // counts reflect the actual sections, not whatever the header claims
        let mut header = self.header.clone();
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authorities.len() as u16;
        header.arcount = self.additionals.len() as u16 + self.edns.is_some() as u16;
        header.write(&mut writer)?;

        for question in &self.questions {
            question.write(&mut writer)?;
        }
        for answer in &self.answers {
            answer.write(&mut writer)?;
        }
        for authority in &self.authorities {
            authority.write(&mut writer)?;
        }
        for additional in &self.additionals {
            additional.write(&mut writer)?;
        }

        if let Some(edns) = &self.edns {
            use bitstream_io::BitWrite;

            let (udp_payload_size, ttl, rdata) = edns.to_resource_format();

            // root owner name
            writer.write::<u8>(8, 0)?;
            writer.write::<u16>(16, RecordType::OPT.to_u16())?;
            writer.write::<u16>(16, udp_payload_size)?;
            writer.write::<u32>(32, ttl)?;
            writer.write::<u16>(16, rdata.len() as u16)?;
            writer.write_bytes(&rdata)?;
        }

        Ok(buf)
    }

    /// Build the reply skeleton: same id and opcode, question echoed,
    /// authoritative answer flag set, EDNS OPT echoed when present.
    pub fn reply_to(request: &DnsMessage) -> Self {
        let mut response = DnsMessage {
            header: MessageHeader {
                id: request.header.id,
                qr: true,
                opcode: request.header.opcode,
                aa: true,
                rd: request.header.rd,
                ..Default::default()
            },
            questions: request.questions.clone(),
            ..Default::default()
        };
        response.edns = request.edns.clone();
        response
    }

    pub fn set_rcode(&mut self, rcode: ResponseCode) {
        self.header.rcode = rcode.to_u8();
    }

    /// Bring the header counts in line with the actual sections
    pub fn update_counts(&mut self) {
        self.header.qdcount = self.questions.len() as u16;
        self.header.ancount = self.answers.len() as u16;
        self.header.nscount = self.authorities.len() as u16;
        self.header.arcount = self.additionals.len() as u16 + self.edns.is_some() as u16;
    }

    /// Whether the requestor asked for DNSSEC records (EDNS DO flag)
    pub fn dnssec_requested(&self) -> bool {
        self.edns.as_ref().map(|e| e.do_flag()).unwrap_or(false)
    }

    pub fn max_udp_payload_size(&self) -> u16 {
        self.edns.as_ref().map(|e| e.payload_size()).unwrap_or(512)
    }

    /// An empty copy of this response with the TC bit set, for clients that
    /// need to retry over TCP
    pub fn truncated(&self) -> Self {
        DnsMessage {
            header: MessageHeader {
                tc: true,
                ancount: 0,
                nscount: 0,
                arcount: 0,
                ..self.header.clone()
            },
            questions: self.questions.clone(),
            edns: self.edns.clone(),
            ..Default::default()
        }
    }

    /// First question of classes this responder serves (IN or ANY)
    pub fn is_query(&self) -> bool {
        !self.header.qr
    }
}

/// True when the responder should answer questions of this class
pub fn class_is_served(class: RecordClass) -> bool {
    matches!(class, RecordClass::IN | RecordClass::ANY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdata::RecordData;
    use std::net::Ipv4Addr;

    fn sample_query() -> DnsMessage {
        let mut query = DnsMessage::default();
        query.header.id = 0x1234;
        query.header.rd = true;
        query
            .questions
            .push(DnsQuestion::new(Name::parse("host.example.").unwrap(), RecordType::A));
        query
    }

    #[test]
    fn test_query_round_trip() {
        let query = sample_query();
        let wire = query.serialize().unwrap();
        let parsed = DnsMessage::parse(&wire).unwrap();
        assert_eq!(parsed.header.id, 0x1234);
        assert_eq!(parsed.questions.len(), 1);
        assert_eq!(parsed.questions[0].qtype, RecordType::A);
        assert_eq!(parsed.questions[0].name.to_string(), "host.example.");
    }

    #[test]
    fn test_response_round_trip_with_sections() {
        let query = sample_query();
        let mut response = DnsMessage::reply_to(&query);
        response.answers.push(DnsRecord::new(
            Name::parse("host.example.").unwrap(),
            RecordType::A,
            600,
            RecordData::A(Ipv4Addr::new(10, 0, 0, 2)),
        ));

        let wire = response.serialize().unwrap();
        let parsed = DnsMessage::parse(&wire).unwrap();
        assert!(parsed.header.qr);
        assert!(parsed.header.aa);
        assert_eq!(parsed.header.ancount, 1);
        assert_eq!(parsed.answers.len(), 1);
        assert_eq!(
            parsed.answers[0].data,
            RecordData::A(Ipv4Addr::new(10, 0, 0, 2))
        );
    }

    #[test]
    fn test_edns_echo_round_trip() {
        let mut query = sample_query();
        let mut edns = EdnsOpt {
            udp_payload_size: 4096,
            ..Default::default()
        };
        edns.set_do_flag(true);
        query.edns = Some(edns);

        let wire = query.serialize().unwrap();
        let parsed = DnsMessage::parse(&wire).unwrap();
        assert!(parsed.dnssec_requested());
        assert_eq!(parsed.max_udp_payload_size(), 4096);
        assert_eq!(parsed.header.arcount, 1);
        assert!(parsed.additionals.is_empty());

        let response = DnsMessage::reply_to(&parsed);
        assert!(response.dnssec_requested());
    }

    #[test]
    fn test_truncated_keeps_question_and_id() {
        let query = sample_query();
        let mut response = DnsMessage::reply_to(&query);
        response.answers.push(DnsRecord::new(
            Name::parse("host.example.").unwrap(),
            RecordType::A,
            600,
            RecordData::A(Ipv4Addr::new(10, 0, 0, 2)),
        ));

        let truncated = response.truncated();
        assert!(truncated.header.tc);
        assert!(truncated.answers.is_empty());
        assert_eq!(truncated.questions.len(), 1);
        assert_eq!(truncated.header.id, 0x1234);
    }

    #[test]
    fn test_short_packet_rejected() {
        assert!(DnsMessage::parse(&[0u8; 5]).is_err());
    }
}
