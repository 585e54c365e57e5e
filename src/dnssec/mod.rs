pub mod denial;
pub mod keys;
pub mod signer;

pub use denial::denial_record;
pub use keys::{calculate_key_tag, ZoneKey};
pub use signer::{sign_section, SigningWindow};

/// RSA/SHA-256 (RFC 5702); the only signing algorithm this responder produces
pub const ALG_RSASHA256: u8 = 8;

/// DNSKEY protocol field, fixed at 3 (RFC 4034 section 2.1.2)
pub const DNSKEY_PROTOCOL: u8 = 3;

/// Zone Key flag bit (RFC 4034 section 2.1.1)
pub const FLAG_ZONE: u16 = 0x0100;

/// Secure Entry Point flag bit; set on the KSK
pub const FLAG_SEP: u16 = 0x0001;
