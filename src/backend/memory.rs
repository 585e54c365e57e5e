use std::collections::HashMap;

use async_trait::async_trait;

use super::{Backend, LookupError, LookupResult};
use crate::dns::resource::DnsRecord;

/// A fixed name→records map. Used by the test suite and for serving small
/// static zones without a namecoind.
///
/// `NoSuchDomain` and `NoResults` are derived from the map shape: a missing
/// name with no names below it is NoSuchDomain; a missing name that has
/// descendants is an empty non-terminal and yields NoResults.
#[derive(Default)]
pub struct MemoryBackend {
    records: HashMap<String, Vec<DnsRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record under its owner name (lower-cased, trailing dot stripped)
    pub fn insert(&mut self, record: DnsRecord) {
        let key = record.name.lookup_key();
        self.records.entry(key).or_default().push(record);
    }

    fn has_descendants(&self, name: &str) -> bool {
        let suffix = format!(".{}", name);
        self.records.keys().any(|k| k.ends_with(&suffix))
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn lookup(&self, name: &str) -> LookupResult {
        match self.records.get(name) {
            Some(records) => Ok(records.clone()),
            None if name.is_empty() => Err(LookupError::NoSuchDomain),
            None if self.has_descendants(name) => Err(LookupError::NoResults),
            None => Err(LookupError::NoSuchDomain),
        }
    }
}
