pub mod memory;
pub mod namecoin;

use async_trait::async_trait;
use thiserror::Error;

use crate::dns::resource::DnsRecord;

pub use memory::MemoryBackend;
pub use namecoin::NamecoinBackend;

/// Failure modes of a name lookup. The resolver branches on these, so they
/// are kept apart from the crate-wide error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The name and all names under it are absent
    #[error("no such domain")]
    NoSuchDomain,
    /// The name exists but holds no records
    #[error("no results")]
    NoResults,
    /// No zone apex was found anywhere above the queried name
    #[error("name not in any served zone")]
    NotInZone,
    /// The backend itself failed
    #[error("backend failure: {0}")]
    Backend(String),
}

pub type LookupResult = std::result::Result<Vec<DnsRecord>, LookupError>;

/// A source of name records. One operation: hand back every record at a
/// name, regardless of type. `name` is absolute, lower-case, without the
/// trailing dot. All returned records must carry that exact owner name;
/// the resolver does not filter by owner.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn lookup(&self, name: &str) -> LookupResult;
}
