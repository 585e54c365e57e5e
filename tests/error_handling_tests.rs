//! How backend failures surface in the response code, and how far a request
//! gets processed once something fails.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use mimir::backend::{Backend, LookupError, LookupResult, MemoryBackend};
use mimir::dns::enums::{RecordType, ResponseCode};
use mimir::dns::question::DnsQuestion;
use mimir::dnssec::{ZoneKey, FLAG_SEP, FLAG_ZONE};
use mimir::resolver::QueryResolver;

use common::*;

/// Serves the apex normally, fails below it
struct FlakyBackend {
    inner: MemoryBackend,
}

#[async_trait]
impl Backend for FlakyBackend {
    async fn lookup(&self, name: &str) -> LookupResult {
        if name == "example" {
            return self.inner.lookup(name).await;
        }
        Err(LookupError::Backend("rpc connection refused".to_string()))
    }
}

fn resolver_with(backend: impl Backend + 'static) -> QueryResolver {
    QueryResolver::new(
        Arc::new(backend),
        ZoneKey::generate(FLAG_ZONE | FLAG_SEP).unwrap(),
        ZoneKey::generate_zsk().unwrap(),
    )
}

#[tokio::test]
async fn test_backend_failure_is_servfail() {
    let mut inner = MemoryBackend::new();
    inner.insert(soa_record("example."));
    let resolver = resolver_with(FlakyBackend { inner });

    let response = resolver
        .resolve(&plain_query("host.example.", RecordType::A))
        .await;
    assert_eq!(response.header.rcode, ResponseCode::ServFail.to_u8());
}

#[tokio::test]
async fn test_empty_name_set_is_noerror_with_soa() {
    // "sub.example" exists in the tree only through its descendant, so the
    // backend reports NoResults rather than NoSuchDomain
    let mut backend = MemoryBackend::new();
    backend.insert(soa_record("example."));
    backend.insert(a_record("deep.empty.example.", [10, 0, 0, 7]));
    let resolver = resolver_with(backend);

    let response = resolver
        .resolve(&plain_query("empty.example.", RecordType::A))
        .await;

    assert_eq!(response.header.rcode, ResponseCode::NoError.to_u8());
    assert!(response.answers.is_empty());
    assert_eq!(of_type(&response.authorities, RecordType::SOA).len(), 1);
}

#[tokio::test]
async fn test_first_failing_question_stops_processing() {
    let resolver = example_resolver();

    let mut request = plain_query("nothere.example.", RecordType::A);
    request
        .questions
        .push(DnsQuestion::new(name("host.example."), RecordType::A));

    let response = resolver.resolve(&request).await;
    assert_eq!(response.header.rcode, ResponseCode::NxDomain.to_u8());
    // the second question was never answered
    assert!(response.answers.is_empty());
}

#[tokio::test]
async fn test_glue_lookup_failure_leaves_additional_empty() {
    // delegation whose nameserver lookup fails: the referral still goes out
    struct GlueLessBackend {
        inner: MemoryBackend,
    }

    #[async_trait]
    impl Backend for GlueLessBackend {
        async fn lookup(&self, name: &str) -> LookupResult {
            if name == "ns1.sub.example" {
                return Err(LookupError::Backend("rpc timeout".to_string()));
            }
            self.inner.lookup(name).await
        }
    }

    let resolver = resolver_with(GlueLessBackend {
        inner: example_zone(),
    });

    let response = resolver
        .resolve(&plain_query("foo.sub.example.", RecordType::A))
        .await;

    // the failure is swallowed: NOERROR referral, just without glue
    assert_eq!(response.header.rcode, ResponseCode::NoError.to_u8());
    assert!(!of_type(&response.authorities, RecordType::NS).is_empty());
    assert!(response.additionals.is_empty());
}
