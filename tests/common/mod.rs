// not every test binary uses every fixture
#![allow(dead_code)]

use std::net::Ipv4Addr;
use std::sync::Arc;

use mimir::backend::MemoryBackend;
use mimir::dns::enums::RecordType;
use mimir::dns::question::DnsQuestion;
use mimir::dns::rdata::{DsData, RecordData, SoaData};
use mimir::dns::resource::DnsRecord;
use mimir::dns::{DnsMessage, Name};
use mimir::dnssec::{ZoneKey, FLAG_SEP, FLAG_ZONE};
use mimir::resolver::QueryResolver;

pub fn name(s: &str) -> Name {
    Name::parse(s).unwrap()
}

pub fn a_record(owner: &str, addr: [u8; 4]) -> DnsRecord {
    DnsRecord::new(
        name(owner),
        RecordType::A,
        600,
        RecordData::A(Ipv4Addr::from(addr)),
    )
}

pub fn ns_record(owner: &str, target: &str) -> DnsRecord {
    DnsRecord::new(name(owner), RecordType::NS, 600, RecordData::Ns(name(target)))
}

pub fn soa_record(owner: &str) -> DnsRecord {
    DnsRecord::new(
        name(owner),
        RecordType::SOA,
        600,
        RecordData::Soa(SoaData {
            mname: name(&format!("ns1.{}", owner.trim_start_matches('.'))),
            rname: name(&format!("hostmaster.{}", owner.trim_start_matches('.'))),
            serial: 2024010101,
            refresh: 3600,
            retry: 900,
            expire: 604800,
            minimum: 600,
        }),
    )
}

pub fn ds_record(owner: &str) -> DnsRecord {
    DnsRecord::new(
        name(owner),
        RecordType::DS,
        600,
        RecordData::Ds(DsData {
            key_tag: 12345,
            algorithm: 8,
            digest_type: 2,
            digest: vec![0xAB; 32],
        }),
    )
}

/// The zone from the specification scenarios: `example.` with one in-zone
/// host, one nameserver, and a signed delegation at `sub.example.`
pub fn example_zone() -> MemoryBackend {
    let mut backend = MemoryBackend::new();
    backend.insert(soa_record("example."));
    backend.insert(ns_record("example.", "ns1.example."));
    backend.insert(a_record("ns1.example.", [10, 0, 0, 1]));
    backend.insert(a_record("host.example.", [10, 0, 0, 2]));
    backend.insert(ns_record("sub.example.", "ns1.sub.example."));
    backend.insert(ds_record("sub.example."));
    backend.insert(a_record("ns1.sub.example.", [10, 0, 0, 3]));
    backend
}

pub fn example_resolver() -> QueryResolver {
    QueryResolver::new(
        Arc::new(example_zone()),
        ZoneKey::generate(FLAG_ZONE | FLAG_SEP).unwrap(),
        ZoneKey::generate_zsk().unwrap(),
    )
}

/// A query with the EDNS DO flag set, the way a validating resolver asks
pub fn dnssec_query(qname: &str, qtype: RecordType) -> DnsMessage {
    let mut request = plain_query(qname, qtype);
    let mut edns = mimir::dns::edns::EdnsOpt {
        udp_payload_size: 4096,
        ..Default::default()
    };
    edns.set_do_flag(true);
    request.edns = Some(edns);
    request
}

pub fn plain_query(qname: &str, qtype: RecordType) -> DnsMessage {
    let mut request = DnsMessage::default();
    request.header.id = 0x2A2A;
    request.questions.push(DnsQuestion::new(name(qname), qtype));
    request
}

/// Records of a given type in a section
pub fn of_type(section: &[DnsRecord], rtype: RecordType) -> Vec<&DnsRecord> {
    section.iter().filter(|r| r.rtype == rtype).collect()
}

/// The RRSIGs in a section covering a given type
pub fn sigs_covering(section: &[DnsRecord], covered: RecordType) -> Vec<&DnsRecord> {
    section
        .iter()
        .filter(|r| match &r.data {
            RecordData::Rrsig(sig) => sig.type_covered == covered,
            _ => false,
        })
        .collect()
}
