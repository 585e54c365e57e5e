use ring::digest;

use crate::dns::enums::RecordType;
use crate::dns::rdata::{Nsec3Data, RecordData};
use crate::dns::resource::DnsRecord;
use crate::dns::Name;

/// NSEC3 parameters are fixed: SHA-1, one extra iteration, one salt byte.
/// Validators learn them from the records themselves, so changing them is a
/// compatibility decision, not a correctness one.
pub const NSEC3_HASH_ALGORITHM: u8 = 1;
pub const NSEC3_ITERATIONS: u16 = 1;
pub const NSEC3_SALT: [u8; 1] = [0x8F];
pub const NSEC3_TTL: u32 = 600;

/// NSEC3 hash of a name (RFC 5155 section 5): SHA-1 over the canonical wire
/// name and salt, re-hashed `iterations` more times
pub fn nsec3_hash(name: &Name, salt: &[u8], iterations: u16) -> Vec<u8> {
    let mut wire_name = Vec::new();
    name.write_wire(&mut wire_name, true);

    let mut input = wire_name;
    input.extend_from_slice(salt);
    let mut hash = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, &input);

    for _ in 0..iterations {
        let mut next = hash.as_ref().to_vec();
        next.extend_from_slice(salt);
        hash = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, &next);
    }

    hash.as_ref().to_vec()
}

/// Base32 with the extended hex alphabet, lower-case and unpadded; the
/// encoding NSEC3 owner labels use (RFC 4648 section 7)
pub fn base32hex_encode(bytes: &[u8]) -> String {
    base32::encode(base32::Alphabet::Rfc4648Hex { padding: false }, bytes).to_lowercase()
}

/// The hash immediately after `hash` in the NSEC3 chain: increment as a
/// big-endian integer, wrapping at the top of the space
pub fn step_hash(hash: &[u8]) -> Vec<u8> {
    let mut next = hash.to_vec();
    for byte in next.iter_mut().rev() {
        *byte = byte.wrapping_add(1);
        if *byte != 0 {
            break;
        }
    }
    next
}

/// Build the NSEC3 record denying `qname`. The covered interval is the
/// narrowest one possible: H(qname) up to its immediate successor, with the
/// type bit map advertising what does exist at the name.
pub fn denial_record(qname: &Name, apex: &Name, mut types: Vec<RecordType>) -> DnsRecord {
    let hash = nsec3_hash(qname, &NSEC3_SALT, NSEC3_ITERATIONS);
    let next_hashed = step_hash(&hash);

    types.sort_by_key(|t| t.to_u16());
    types.dedup();

    let owner = apex.prepend(&base32hex_encode(&hash));

    DnsRecord::new(
        owner,
        RecordType::NSEC3,
        NSEC3_TTL,
        RecordData::Nsec3(Nsec3Data {
            hash_algorithm: NSEC3_HASH_ALGORITHM,
            flags: 0,
            iterations: NSEC3_ITERATIONS,
            salt: NSEC3_SALT.to_vec(),
            next_hashed,
            type_bit_maps: types,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nsec3_hash_matches_reference() {
        // RFC 5155 Appendix A: H(example) with salt aabbccdd, 12 extra
        // iterations hashes to 0p9mhaveqvm6t7vbl5lop2u3t2rp3tom
        let name = Name::parse("example.").unwrap();
        let hash = nsec3_hash(&name, &[0xAA, 0xBB, 0xCC, 0xDD], 12);
        assert_eq!(base32hex_encode(&hash), "0p9mhaveqvm6t7vbl5lop2u3t2rp3tom");
    }

    #[test]
    fn test_hash_depends_on_salt_and_iterations() {
        let name = Name::parse("example.").unwrap();
        let base = nsec3_hash(&name, &NSEC3_SALT, 1);
        assert_ne!(base, nsec3_hash(&name, &[0x00], 1));
        assert_ne!(base, nsec3_hash(&name, &NSEC3_SALT, 2));
        assert_eq!(base.len(), 20);
    }

    #[test]
    fn test_hash_is_case_insensitive() {
        let lower = Name::parse("host.example.").unwrap();
        let upper = Name::parse("HOST.EXAMPLE.").unwrap();
        assert_eq!(
            nsec3_hash(&lower, &NSEC3_SALT, 1),
            nsec3_hash(&upper, &NSEC3_SALT, 1)
        );
    }

    #[test]
    fn test_step_hash_increments() {
        assert_eq!(step_hash(&[0x00, 0x00]), vec![0x00, 0x01]);
        assert_eq!(step_hash(&[0x00, 0xFF]), vec![0x01, 0x00]);
        // the top of the space wraps to the bottom
        assert_eq!(step_hash(&[0xFF, 0xFF]), vec![0x00, 0x00]);
    }

    #[test]
    fn test_denial_record_shape() {
        let qname = Name::parse("nothere.example.").unwrap();
        let apex = Name::parse("example.").unwrap();
        let record = denial_record(
            &qname,
            &apex,
            vec![RecordType::SOA, RecordType::A, RecordType::A],
        );

        assert_eq!(record.rtype, RecordType::NSEC3);
        assert_eq!(record.ttl, NSEC3_TTL);
        assert_eq!(record.name.num_labels(), 2);
        assert_eq!(record.name.parent(), apex);
        // hashed owner label is 20 bytes of base32hex
        assert_eq!(record.name.labels()[0].len(), 32);

        match &record.data {
            RecordData::Nsec3(nsec3) => {
                assert_eq!(nsec3.hash_algorithm, 1);
                assert_eq!(nsec3.iterations, 1);
                assert_eq!(nsec3.salt, vec![0x8F]);
                assert_eq!(nsec3.next_hashed.len(), 20);
                // sorted and deduplicated
                assert_eq!(nsec3.type_bit_maps, vec![RecordType::A, RecordType::SOA]);
                assert_eq!(
                    nsec3.next_hashed,
                    step_hash(&nsec3_hash(&qname, &NSEC3_SALT, 1))
                );
            }
            other => panic!("expected NSEC3, got {:?}", other),
        }
    }
}
