use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, trace, warn};

use super::{Backend, LookupError, LookupResult};
use crate::config::ServerConfig;
use crate::dns::enums::RecordType;
use crate::dns::rdata::{DsData, RecordData, SoaData};
use crate::dns::resource::DnsRecord;
use crate::dns::Name;

const RECORD_TTL: u32 = 600;
const CACHE_TTL: Duration = Duration::from_secs(60);

/// Backend serving a Namecoin-style name database over JSON-RPC.
///
/// Queried names are mapped onto `d/` entries: the label directly under the
/// configured suffix selects the entry, deeper labels navigate its `map`
/// tree. The zone apex (SOA, NS) and the nameserver's own glue record are
/// synthesized from configuration; everything else comes from `name_show`.
pub struct NamecoinBackend {
    client: reqwest::Client,
    rpc_url: String,
    rpc_username: String,
    rpc_password: String,
    suffix: String,
    self_name: Name,
    self_ip: Ipv4Addr,
    cache: DashMap<String, CacheEntry>,
    cache_max_entries: usize,
}

#[derive(Clone)]
enum CachedValue {
    Present(Value),
    Absent,
}

#[derive(Clone)]
struct CacheEntry {
    value: CachedValue,
    stored_at: Instant,
}

#[derive(Deserialize)]
struct RpcReply {
    result: Option<RpcNameInfo>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcNameInfo {
    value: String,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl NamecoinBackend {
    pub fn new(config: &ServerConfig) -> Self {
        let self_name = match &config.self_name {
            Some(name) => Name::from_labels(name.split('.').map(|l| l.to_string()).collect()),
            // pseudo-hostname under the apex, resolving to self_ip
            None => Name::from_labels(vec![
                "this".to_string(),
                "ns".to_string(),
                config.zone_suffix.clone(),
            ]),
        };

        NamecoinBackend {
            client: reqwest::Client::new(),
            rpc_url: config.namecoin_rpc_url.clone(),
            rpc_username: config.namecoin_rpc_username.clone(),
            rpc_password: config.namecoin_rpc_password.clone(),
            suffix: config.zone_suffix.clone(),
            self_name,
            self_ip: config.self_ip,
            cache: DashMap::new(),
            cache_max_entries: config.cache_max_entries,
        }
    }

    fn apex(&self) -> Name {
        Name::from_labels(vec![self.suffix.clone()])
    }

    fn apex_records(&self) -> Vec<DnsRecord> {
        let apex = self.apex();
        let soa = DnsRecord::new(
            apex.clone(),
            RecordType::SOA,
            RECORD_TTL,
            RecordData::Soa(SoaData {
                mname: self.self_name.clone(),
                rname: apex.prepend("hostmaster"),
                serial: 1,
                refresh: 600,
                retry: 600,
                expire: 7200,
                minimum: RECORD_TTL,
            }),
        );
        let ns = DnsRecord::new(
            apex,
            RecordType::NS,
            RECORD_TTL,
            RecordData::Ns(self.self_name.clone()),
        );
        vec![soa, ns]
    }

    /// Fetch the domain JSON for a `d/` entry, going through the cache
    async fn fetch_entry(&self, base: &str) -> Result<Option<Value>, LookupError> {
        if let Some(entry) = self.cache.get(base) {
            if entry.stored_at.elapsed() < CACHE_TTL {
                trace!("cache hit for d/{}", base);
                return Ok(match &entry.value {
                    CachedValue::Present(v) => Some(v.clone()),
                    CachedValue::Absent => None,
                });
            }
        }

        let fetched = self.name_show(base).await?;

        // crude bound: drop everything rather than tracking recency
        if self.cache.len() >= self.cache_max_entries {
            self.cache.clear();
        }
        self.cache.insert(
            base.to_string(),
            CacheEntry {
                value: match &fetched {
                    Some(v) => CachedValue::Present(v.clone()),
                    None => CachedValue::Absent,
                },
                stored_at: Instant::now(),
            },
        );

        Ok(fetched)
    }

    async fn name_show(&self, base: &str) -> Result<Option<Value>, LookupError> {
        let request = json!({
            "jsonrpc": "1.0",
            "id": "mimir",
            "method": "name_show",
            "params": [format!("d/{}", base)],
        });

        debug!("name_show d/{}", base);

        let mut builder = self.client.post(&self.rpc_url).json(&request);
        if !self.rpc_username.is_empty() {
            builder = builder.basic_auth(&self.rpc_username, Some(&self.rpc_password));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LookupError::Backend(format!("namecoin RPC: {}", e)))?;

        let reply: RpcReply = response
            .json()
            .await
            .map_err(|e| LookupError::Backend(format!("namecoin RPC decode: {}", e)))?;

        if let Some(error) = reply.error {
            // namecoind reports unknown names through the error channel
            if error.code == -4 {
                return Ok(None);
            }
            return Err(LookupError::Backend(format!(
                "namecoin RPC error {}: {}",
                error.code, error.message
            )));
        }

        let info = match reply.result {
            Some(info) => info,
            None => return Ok(None),
        };

        match serde_json::from_str(&info.value) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                // a malformed entry denies its own existence rather than the zone's
                warn!("unparseable value for d/{}: {}", base, e);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Backend for NamecoinBackend {
    async fn lookup(&self, name: &str) -> LookupResult {
        if name == self.suffix {
            return Ok(self.apex_records());
        }

        if name == self.self_name.lookup_key() {
            return Ok(vec![DnsRecord::new(
                self.self_name.clone(),
                RecordType::A,
                RECORD_TTL,
                RecordData::A(self.self_ip),
            )]);
        }

        let relative = match name.strip_suffix(&format!(".{}", self.suffix)) {
            Some(rel) => rel,
            None => return Err(LookupError::NoSuchDomain),
        };

        // the label next to the suffix selects the d/ entry
        let mut labels: Vec<&str> = relative.split('.').collect();
        let base = match labels.pop() {
            Some(base) if !base.is_empty() => base,
            _ => return Err(LookupError::NoSuchDomain),
        };

        let entry = match self.fetch_entry(base).await? {
            Some(entry) => entry,
            None => return Err(LookupError::NoSuchDomain),
        };

        let node = match navigate(&entry, &labels) {
            Some(node) => node,
            None => return Err(LookupError::NoSuchDomain),
        };

        let owner = Name::from_labels(name.split('.').map(|l| l.to_string()).collect());
        Ok(records_from_value(&owner, &node))
    }
}

/// Walk the `map` tree; `path` holds the labels under the base entry,
/// outermost last. A `"*"` entry matches any missing label.
fn navigate(entry: &Value, path: &[&str]) -> Option<Value> {
    let mut node = entry.clone();

    for label in path.iter().rev() {
        let map = match node.get("map") {
            Some(Value::Object(map)) => map,
            _ => return None,
        };
        node = match map.get(*label).or_else(|| map.get("*")) {
            Some(next) => next.clone(),
            None => return None,
        };
    }

    Some(node)
}

/// Translate one JSON node into the records at `owner`. A bare string is
/// shorthand for `{"ip": ...}`; an empty-key map entry merges into its
/// parent and is handled here by consulting it for every field.
fn records_from_value(owner: &Name, node: &Value) -> Vec<DnsRecord> {
    let node = match node {
        Value::String(ip) => json!({ "ip": ip }),
        other => other.clone(),
    };

    let mut records = Vec::new();

    for source in [Some(&node), node.get("map").and_then(|m| m.get(""))]
        .into_iter()
        .flatten()
    {
        collect_field(owner, source, "ip", &mut records, |owner, text| {
            text.parse::<Ipv4Addr>().ok().map(|addr| {
                DnsRecord::new(owner.clone(), RecordType::A, RECORD_TTL, RecordData::A(addr))
            })
        });

        collect_field(owner, source, "ip6", &mut records, |owner, text| {
            text.parse::<Ipv6Addr>().ok().map(|addr| {
                DnsRecord::new(
                    owner.clone(),
                    RecordType::AAAA,
                    RECORD_TTL,
                    RecordData::Aaaa(addr),
                )
            })
        });

        for key in ["ns", "dns"] {
            collect_field(owner, source, key, &mut records, |owner, text| {
                Name::parse(text).ok().map(|target| {
                    DnsRecord::new(
                        owner.clone(),
                        RecordType::NS,
                        RECORD_TTL,
                        RecordData::Ns(target.to_lowercase()),
                    )
                })
            });
        }

        if let Some(Value::String(alias)) = source.get("alias") {
            if let Ok(target) = Name::parse(alias) {
                records.push(DnsRecord::new(
                    owner.clone(),
                    RecordType::CNAME,
                    RECORD_TTL,
                    RecordData::Cname(target.to_lowercase()),
                ));
            }
        }

        collect_field(owner, source, "txt", &mut records, |owner, text| {
            Some(DnsRecord::new(
                owner.clone(),
                RecordType::TXT,
                RECORD_TTL,
                RecordData::Txt(vec![text.to_string()]),
            ))
        });

        if let Some(Value::Array(entries)) = source.get("ds") {
            for ds in entries {
                if let Some(record) = ds_from_value(owner, ds) {
                    records.push(record);
                }
            }
        }
    }

    records
}

/// Apply `build` to a field that may be a single string or an array of them
fn collect_field<F>(
    owner: &Name,
    node: &Value,
    key: &str,
    records: &mut Vec<DnsRecord>,
    build: F,
) where
    F: Fn(&Name, &str) -> Option<DnsRecord>,
{
    match node.get(key) {
        Some(Value::String(text)) => {
            if let Some(record) = build(owner, text) {
                records.push(record);
            }
        }
        Some(Value::Array(entries)) => {
            for entry in entries {
                if let Some(text) = entry.as_str() {
                    if let Some(record) = build(owner, text) {
                        records.push(record);
                    }
                }
            }
        }
        _ => {}
    }
}

/// `[key_tag, algorithm, digest_type, base64(digest)]`
fn ds_from_value(owner: &Name, value: &Value) -> Option<DnsRecord> {
    let fields = value.as_array()?;
    if fields.len() != 4 {
        return None;
    }
    let key_tag = fields[0].as_u64()? as u16;
    let algorithm = fields[1].as_u64()? as u8;
    let digest_type = fields[2].as_u64()? as u8;
    let digest = BASE64.decode(fields[3].as_str()?).ok()?;

    Some(DnsRecord::new(
        owner.clone(),
        RecordType::DS,
        RECORD_TTL,
        RecordData::Ds(DsData {
            key_tag,
            algorithm,
            digest_type,
            digest,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(name: &str) -> Name {
        Name::parse(name).unwrap()
    }

    #[test]
    fn test_bare_string_is_an_address() {
        let records = records_from_value(&owner("foo.bit."), &json!("10.1.2.3"));
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].data,
            RecordData::A("10.1.2.3".parse().unwrap())
        );
    }

    #[test]
    fn test_full_entry_translation() {
        let node = json!({
            "ip": ["10.1.2.3", "10.1.2.4"],
            "ip6": "2001:db8::1",
            "ns": ["ns1.example.com.", "ns2.example.com."],
            "ds": [[12345, 8, 2, BASE64.encode([0xABu8; 32])]],
            "txt": "hello",
        });

        let records = records_from_value(&owner("foo.bit."), &node);
        let count = |t: RecordType| records.iter().filter(|r| r.rtype == t).count();
        assert_eq!(count(RecordType::A), 2);
        assert_eq!(count(RecordType::AAAA), 1);
        assert_eq!(count(RecordType::NS), 2);
        assert_eq!(count(RecordType::DS), 1);
        assert_eq!(count(RecordType::TXT), 1);
        assert!(records.iter().all(|r| r.name == owner("foo.bit.")));
    }

    #[test]
    fn test_map_navigation() {
        let entry = json!({
            "ip": "10.0.0.1",
            "map": {
                "www": { "ip": "10.0.0.2" },
                "*": { "ip": "10.0.0.3" },
            },
        });

        let www = navigate(&entry, &["www"]).unwrap();
        assert_eq!(www.get("ip").unwrap(), "10.0.0.2");

        // unmatched labels fall through to the wildcard
        let other = navigate(&entry, &["mail"]).unwrap();
        assert_eq!(other.get("ip").unwrap(), "10.0.0.3");

        // no map below a leaf
        assert!(navigate(&entry, &["www", "deep"]).is_none());
    }

    #[test]
    fn test_empty_key_merges_into_parent() {
        let node = json!({
            "ns": ["ns1.example.com."],
            "map": { "": { "ip": "10.0.0.9" } },
        });
        let records = records_from_value(&owner("foo.bit."), &node);
        assert!(records.iter().any(|r| r.rtype == RecordType::NS));
        assert!(records.iter().any(|r| r.rtype == RecordType::A));
    }

    #[test]
    fn test_malformed_ds_skipped() {
        let node = json!({ "ds": [[1, 2, 3], "junk", [1, 2, 3, "?b64?"]] });
        let records = records_from_value(&owner("foo.bit."), &node);
        assert!(records.is_empty());
    }
}
