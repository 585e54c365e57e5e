use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::trace;

use super::keys::ZoneKey;
use crate::dns::enums::RecordType;
use crate::dns::rdata::{RecordData, RrsigData};
use crate::dns::resource::DnsRecord;
use crate::dns::Name;
use crate::error::Result;

/// RRSIG validity interval, computed once per response so every signature in
/// a reply carries the same window. Inception is backdated to absorb clock
/// skew between us and the validator.
#[derive(Clone, Copy, Debug)]
pub struct SigningWindow {
    pub inception: u32,
    pub expiration: u32,
}

const INCEPTION_SKEW: u64 = 600;
const VALIDITY: u64 = 3600;

impl SigningWindow {
    pub fn current() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        SigningWindow {
            inception: now.saturating_sub(INCEPTION_SKEW) as u32,
            expiration: (now + VALIDITY) as u32,
        }
    }
}

/// Serialize the data to be signed for one RRset (RFC 4034 section 3.1.8.1):
/// the RRSIG rdata with the signature field excluded, then each record in
/// canonical form and canonical order.
pub fn rrset_tbs(
    records: &[&DnsRecord],
    key: &ZoneKey,
    signer_name: &Name,
    window: &SigningWindow,
) -> Vec<u8> {
    let owner = records[0].name.to_lowercase();
    let rtype = records[0].rtype;
    let class = records[0].class;
    let original_ttl = records[0].ttl;

    let mut buf = Vec::new();
    buf.extend_from_slice(&rtype.to_u16().to_be_bytes());
    buf.push(key.dnskey.algorithm);
    buf.push(rrsig_labels(&owner));
    buf.extend_from_slice(&original_ttl.to_be_bytes());
    buf.extend_from_slice(&window.expiration.to_be_bytes());
    buf.extend_from_slice(&window.inception.to_be_bytes());
    buf.extend_from_slice(&key.key_tag.to_be_bytes());
    signer_name.write_wire(&mut buf, true);

    let mut rrset: Vec<&DnsRecord> = records.to_vec();
    rrset.sort_by_key(|r| r.canonical_rdata());

    for record in rrset {
        owner.write_wire(&mut buf, true);
        buf.extend_from_slice(&rtype.to_u16().to_be_bytes());
        buf.extend_from_slice(&class.to_u16().to_be_bytes());
        buf.extend_from_slice(&original_ttl.to_be_bytes());
        let rdata = record.canonical_rdata();
        buf.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        buf.extend_from_slice(&rdata);
    }

    buf
}

/// Produce the RRSIG covering one RRset
fn rrsig_for_rrset(
    records: &[&DnsRecord],
    key: &ZoneKey,
    signer_name: &Name,
    window: &SigningWindow,
) -> Result<DnsRecord> {
    let tbs = rrset_tbs(records, key, signer_name, window);
    let signature = key.sign(&tbs)?;

    let owner = records[0].name.to_lowercase();
    trace!(
        "signed {} {:?} with key tag {}",
        owner,
        records[0].rtype,
        key.key_tag
    );

    let data = RrsigData {
        type_covered: records[0].rtype,
        algorithm: key.dnskey.algorithm,
        labels: rrsig_labels(&owner),
        original_ttl: records[0].ttl,
        expiration: window.expiration,
        inception: window.inception,
        key_tag: key.key_tag,
        signer_name: signer_name.to_lowercase(),
        signature,
    };

    let mut record = DnsRecord::new(owner, RecordType::RRSIG, records[0].ttl, RecordData::Rrsig(data));
    record.class = records[0].class;
    Ok(record)
}

/// Sign every RRset in `section` that `should_sign` admits, appending the
/// RRSIGs to the same section. DNSKEY sets are signed by the KSK, everything
/// else by the ZSK. RRSIGs themselves are never covered.
pub fn sign_section<F>(
    section: &mut Vec<DnsRecord>,
    zsk: &ZoneKey,
    ksk: &ZoneKey,
    signer_name: &Name,
    window: &SigningWindow,
    should_sign: F,
) -> Result<()>
where
    F: Fn(&DnsRecord) -> bool,
{
    let mut seen: HashSet<(String, u16)> = HashSet::new();
    let mut rrsigs = Vec::new();

    for record in section.iter() {
        if record.rtype == RecordType::RRSIG || !should_sign(record) {
            continue;
        }
        let group_key = (record.name.lookup_key(), record.rtype.to_u16());
        if !seen.insert(group_key.clone()) {
            continue;
        }

        let rrset: Vec<&DnsRecord> = section
            .iter()
            .filter(|r| {
                r.rtype == record.rtype && r.name.lookup_key() == group_key.0
            })
            .collect();

        let key = if record.rtype == RecordType::DNSKEY {
            ksk
        } else {
            zsk
        };
        rrsigs.push(rrsig_for_rrset(&rrset, key, signer_name, window)?);
    }

    section.extend(rrsigs);
    Ok(())
}

/// The RRSIG Labels field: label count of the owner, with a leading wildcard
/// label not counted (RFC 4034 section 3.1.3)
fn rrsig_labels(owner: &Name) -> u8 {
    match owner.labels().first() {
        Some(label) if label == "*" => owner.num_labels() - 1,
        _ => owner.num_labels(),
    }
}
