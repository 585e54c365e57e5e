use std::fs;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::{Signer, Verifier};
use tracing::info;

use super::{ALG_RSASHA256, DNSKEY_PROTOCOL, FLAG_SEP, FLAG_ZONE};
use crate::dns::enums::RecordType;
use crate::dns::rdata::{DnskeyData, RecordData};
use crate::dns::resource::DnsRecord;
use crate::dns::Name;
use crate::error::{MimirError, Result};

/// DNSKEY TTL used for loaded and generated keys
const DNSKEY_TTL: u32 = 3600;

/// A DNSKEY together with its private half. The owner name is left unset
/// until response time, when it is bound to the discovered zone apex.
pub struct ZoneKey {
    pub dnskey: DnskeyData,
    pub ttl: u32,
    pub key_tag: u16,
    pkey: PKey<Private>,
}

impl ZoneKey {
    /// Load a key pair: the public half is a zone-file DNSKEY line, the
    /// private half a PEM RSA key.
    pub fn load(public_path: &str, private_path: &str) -> Result<Self> {
        let public_text = fs::read_to_string(public_path)
            .map_err(|e| MimirError::KeyFile(public_path.to_string(), e.to_string()))?;
        let dnskey = parse_dnskey_line(&public_text)
            .ok_or_else(|| {
                MimirError::KeyFile(
                    public_path.to_string(),
                    "no DNSKEY record in key file".to_string(),
                )
            })?;

        if dnskey.algorithm != ALG_RSASHA256 {
            return Err(MimirError::KeyFile(
                public_path.to_string(),
                format!("unsupported DNSKEY algorithm {}", dnskey.algorithm),
            ));
        }

        let private_pem = fs::read(private_path)
            .map_err(|e| MimirError::KeyFile(private_path.to_string(), e.to_string()))?;
        let pkey = PKey::private_key_from_pem(&private_pem)
            .map_err(|e| MimirError::KeyFile(private_path.to_string(), e.to_string()))?;

        let key_tag = calculate_key_tag(
            dnskey.flags,
            dnskey.protocol,
            dnskey.algorithm,
            &dnskey.public_key,
        );

        info!(
            "loaded DNSKEY from {}: flags={} tag={}",
            public_path, dnskey.flags, key_tag
        );

        Ok(ZoneKey {
            dnskey,
            ttl: DNSKEY_TTL,
            key_tag,
            pkey,
        })
    }

    /// Generate a transient ZSK: 2048-bit RSA, RSA/SHA-256, zone flag only.
    /// It lives for this process and is lost on restart; the KSK signs the
    /// DNSKEY set, so trust chains to the KSK only.
    pub fn generate_zsk() -> Result<Self> {
        Self::generate(FLAG_ZONE)
    }

    /// Generate a key with the given DNSKEY flags
    pub fn generate(flags: u16) -> Result<Self> {
        let rsa = Rsa::generate(2048).map_err(|e| MimirError::KeyGeneration(e.to_string()))?;
        let public_key = encode_rsa_public_key(&rsa.e().to_vec(), &rsa.n().to_vec());
        let pkey =
            PKey::from_rsa(rsa).map_err(|e| MimirError::KeyGeneration(e.to_string()))?;

        let dnskey = DnskeyData {
            flags,
            protocol: DNSKEY_PROTOCOL,
            algorithm: ALG_RSASHA256,
            public_key,
        };
        let key_tag = calculate_key_tag(
            dnskey.flags,
            dnskey.protocol,
            dnskey.algorithm,
            &dnskey.public_key,
        );

        Ok(ZoneKey {
            dnskey,
            ttl: DNSKEY_TTL,
            key_tag,
            pkey,
        })
    }

    pub fn is_ksk(&self) -> bool {
        self.dnskey.flags & FLAG_SEP != 0
    }

    /// The DNSKEY record with its owner bound to `owner` (the zone apex)
    pub fn dnskey_record(&self, owner: &Name) -> DnsRecord {
        DnsRecord::new(
            owner.clone(),
            RecordType::DNSKEY,
            self.ttl,
            RecordData::Dnskey(self.dnskey.clone()),
        )
    }

    /// RSA PKCS#1 v1.5 signature over `data` with SHA-256
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut signer = Signer::new(MessageDigest::sha256(), &self.pkey)?;
        signer.update(data)?;
        Ok(signer.sign_to_vec()?)
    }

    /// Verify a signature produced by `sign`; exercised by the test suite
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool> {
        let mut verifier = Verifier::new(MessageDigest::sha256(), &self.pkey)?;
        verifier.update(data)?;
        Ok(verifier.verify(signature)?)
    }
}

/// Parse the first DNSKEY record out of zone-file text:
/// `<owner> [TTL] [IN] DNSKEY <flags> <protocol> <algorithm> <base64...>`.
/// Parentheses and line continuations are tolerated; comments are dropped.
fn parse_dnskey_line(text: &str) -> Option<DnskeyData> {
    let joined: String = text
        .lines()
        .map(|line| line.split(';').next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join(" ");

    let fields: Vec<&str> = joined
        .split_whitespace()
        .filter(|f| *f != "(" && *f != ")")
        .collect();

    let at = fields.iter().position(|f| f.eq_ignore_ascii_case("DNSKEY"))?;
    let rest = &fields[at + 1..];
    if rest.len() < 4 {
        return None;
    }

    let flags = rest[0].parse::<u16>().ok()?;
    let protocol = rest[1].parse::<u8>().ok()?;
    let algorithm = rest[2].parse::<u8>().ok()?;
    let public_key = BASE64.decode(rest[3..].concat()).ok()?;

    Some(DnskeyData {
        flags,
        protocol,
        algorithm,
        public_key,
    })
}

/// RFC 3110 RSA public key encoding: exponent length, exponent, modulus
fn encode_rsa_public_key(e: &[u8], n: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(3 + e.len() + n.len());
    if e.len() <= 255 {
        out.push(e.len() as u8);
    } else {
        out.push(0);
        out.extend_from_slice(&(e.len() as u16).to_be_bytes());
    }
    out.extend_from_slice(e);
    out.extend_from_slice(n);
    out
}

/// Key tag for a DNSKEY (RFC 4034 Appendix B)
pub fn calculate_key_tag(flags: u16, protocol: u8, algorithm: u8, public_key: &[u8]) -> u16 {
    let mut rdata = Vec::with_capacity(4 + public_key.len());
    rdata.extend_from_slice(&flags.to_be_bytes());
    rdata.push(protocol);
    rdata.push(algorithm);
    rdata.extend_from_slice(public_key);

    let mut accumulator: u32 = 0;
    for (i, &byte) in rdata.iter().enumerate() {
        if i % 2 == 0 {
            accumulator += u32::from(byte) << 8;
        } else {
            accumulator += u32::from(byte);
        }
    }

    accumulator += accumulator >> 16;
    (accumulator & 0xFFFF) as u16
}
