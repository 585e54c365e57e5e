//! End-to-end signature checks: every RRSIG a response carries must verify
//! against the canonical form of the RRset it covers, with the right key.

mod common;

use mimir::dns::enums::RecordType;
use mimir::dns::rdata::RecordData;
use mimir::dns::resource::DnsRecord;
use mimir::dns::DnsMessage;
use mimir::dnssec::signer::{rrset_tbs, SigningWindow};
use mimir::resolver::QueryResolver;

use common::*;

/// Verify every RRSIG in a section against the records beside it. Returns
/// how many signatures were checked.
fn verify_section(resolver: &QueryResolver, section: &[DnsRecord]) -> usize {
    let mut checked = 0;

    for record in section {
        let sig = match &record.data {
            RecordData::Rrsig(sig) => sig,
            _ => continue,
        };

        let rrset: Vec<&DnsRecord> = section
            .iter()
            .filter(|r| {
                r.rtype == sig.type_covered && r.name.lookup_key() == record.name.lookup_key()
            })
            .collect();
        assert!(
            !rrset.is_empty(),
            "RRSIG covering {:?} has no RRset beside it",
            sig.type_covered
        );

        // DNSKEY sets are signed by the KSK, everything else by the ZSK
        let key = if sig.type_covered == RecordType::DNSKEY {
            resolver.ksk()
        } else {
            resolver.zsk()
        };
        assert_eq!(key.key_tag, sig.key_tag, "RRSIG names the wrong key");

        let window = SigningWindow {
            inception: sig.inception,
            expiration: sig.expiration,
        };
        let tbs = rrset_tbs(&rrset, key, &sig.signer_name, &window);
        assert!(
            key.verify(&tbs, &sig.signature).unwrap(),
            "signature over {:?} does not verify",
            sig.type_covered
        );
        checked += 1;
    }

    checked
}

async fn verified_response(qname: &str, qtype: RecordType) -> (DnsMessage, usize) {
    let resolver = example_resolver();
    let response = resolver.resolve(&dnssec_query(qname, qtype)).await;
    let checked = verify_section(&resolver, &response.answers)
        + verify_section(&resolver, &response.authorities)
        + verify_section(&resolver, &response.additionals);
    (response, checked)
}

#[tokio::test]
async fn test_positive_answer_signature_verifies() {
    let (_, checked) = verified_response("host.example.", RecordType::A).await;
    assert_eq!(checked, 1);
}

#[tokio::test]
async fn test_soa_and_nsec3_signatures_verify() {
    let (_, checked) = verified_response("host.example.", RecordType::MX).await;
    // SOA and NSEC3, both in the authority section
    assert_eq!(checked, 2);
}

#[tokio::test]
async fn test_dnskey_signature_verifies_with_ksk() {
    let resolver = example_resolver();
    let response = resolver
        .resolve(&dnssec_query("example.", RecordType::DNSKEY))
        .await;

    let sigs = sigs_covering(&response.answers, RecordType::DNSKEY);
    assert_eq!(sigs.len(), 1);
    match &sigs[0].data {
        RecordData::Rrsig(sig) => {
            assert_eq!(sig.key_tag, resolver.ksk().key_tag);
            assert_eq!(sig.algorithm, 8);
            assert_eq!(sig.signer_name, name("example."));
        }
        other => panic!("expected RRSIG, got {:?}", other),
    }

    assert_eq!(verify_section(&resolver, &response.answers), 1);
}

#[tokio::test]
async fn test_referral_ds_signature_verifies() {
    let (response, checked) = verified_response("foo.sub.example.", RecordType::A).await;
    assert_eq!(checked, 1);
    // that one signature covers the DS set
    assert_eq!(sigs_covering(&response.authorities, RecordType::DS).len(), 1);
}

#[tokio::test]
async fn test_signature_window_brackets_now() {
    let (response, _) = verified_response("host.example.", RecordType::A).await;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as u32;

    let mut windows = Vec::new();
    for record in response.answers.iter().chain(&response.authorities) {
        if let RecordData::Rrsig(sig) = &record.data {
            assert!(sig.inception <= now, "inception in the future");
            assert!(sig.expiration > now, "already expired");
            windows.push((sig.inception, sig.expiration));
        }
    }

    // one window per response
    windows.dedup();
    assert_eq!(windows.len(), 1);
}

#[tokio::test]
async fn test_signatures_survive_the_wire() {
    let resolver = example_resolver();
    let response = resolver
        .resolve(&dnssec_query("host.example.", RecordType::MX))
        .await;

    let wire = response.serialize().unwrap();
    let parsed = DnsMessage::parse(&wire).unwrap();
    assert_eq!(verify_section(&resolver, &parsed.authorities), 2);
}

#[tokio::test]
async fn test_tampered_record_fails_verification() {
    let resolver = example_resolver();
    let mut response = resolver
        .resolve(&dnssec_query("host.example.", RecordType::A))
        .await;

    // flip the answered address
    response.answers[0].data = RecordData::A("10.9.9.9".parse().unwrap());

    let sig = match &response.answers[1].data {
        RecordData::Rrsig(sig) => sig,
        other => panic!("expected RRSIG, got {:?}", other),
    };
    let window = SigningWindow {
        inception: sig.inception,
        expiration: sig.expiration,
    };
    let tbs = rrset_tbs(
        &[&response.answers[0]],
        resolver.zsk(),
        &sig.signer_name,
        &window,
    );
    assert!(!resolver.zsk().verify(&tbs, &sig.signature).unwrap());
}
