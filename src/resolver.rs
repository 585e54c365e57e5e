use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{Backend, LookupError};
use crate::dns::enums::{RecordClass, RecordType, ResponseCode};
use crate::dns::resource::DnsRecord;
use crate::dns::{class_is_served, DnsMessage, Name};
use crate::dnssec::signer::{sign_section, SigningWindow};
use crate::dnssec::{denial_record, ZoneKey};
use crate::error::MimirError;

/// Answers queries out of the name backend: walks the query name upward to
/// find the zone apex, classifies the query, assembles the response sections
/// and signs the authoritative data.
pub struct QueryResolver {
    backend: Arc<dyn Backend>,
    ksk: ZoneKey,
    zsk: ZoneKey,
}

impl QueryResolver {
    pub fn new(backend: Arc<dyn Backend>, ksk: ZoneKey, zsk: ZoneKey) -> Self {
        QueryResolver { backend, ksk, zsk }
    }

    pub fn ksk(&self) -> &ZoneKey {
        &self.ksk
    }

    pub fn zsk(&self) -> &ZoneKey {
        &self.zsk
    }

    /// Build the full response for a request. Questions are handled in
    /// order; the first failing question decides the rcode and stops
    /// processing.
    pub async fn resolve(&self, request: &DnsMessage) -> DnsMessage {
        let mut response = DnsMessage::reply_to(request);

        let mut tx = Tx {
            resolver: self,
            dnssec_requested: request.dnssec_requested(),
            res: &mut response,
            qname: Name::root(),
            qtype: RecordType::A,
            qclass: RecordClass::IN,
            rcode: ResponseCode::NoError,
            types_at_qname: HashSet::new(),
            additional_queue: BTreeSet::new(),
            soa: None,
            delegation_point: None,
            query_is_at_delegation_point: false,
            consolation_soa: false,
            suppress_nsec: false,
        };

        for question in &request.questions {
            if !class_is_served(question.qclass) {
                continue;
            }

            tx.qname = question.name.to_lowercase();
            tx.qtype = question.qtype;
            tx.qclass = question.qclass;

            info!("query: {} {:?}", tx.qname, tx.qtype);

            if let Err(err) = tx.add_answers().await {
                tx.rcode = match err {
                    MimirError::Lookup(LookupError::NoResults) => ResponseCode::NoError,
                    MimirError::Lookup(LookupError::NoSuchDomain) => ResponseCode::NxDomain,
                    MimirError::Lookup(LookupError::NotInZone) => ResponseCode::Refused,
                    other => {
                        warn!("handler error, answering SERVFAIL: {}", other);
                        if tx.rcode != ResponseCode::NoError {
                            tx.rcode
                        } else {
                            ResponseCode::ServFail
                        }
                    }
                };
                break;
            }
        }

        let rcode = tx.rcode;
        response.set_rcode(rcode);
        response.update_counts();
        response
    }
}

/// Per-request mutable state. Created with the response builder it fills and
/// destroyed once the reply is complete.
struct Tx<'a> {
    resolver: &'a QueryResolver,
    dnssec_requested: bool,
    res: &'a mut DnsMessage,

    qname: Name,
    qtype: RecordType,
    #[allow(dead_code)]
    qclass: RecordClass,
    rcode: ResponseCode,

    /// Types that actually exist at qname; becomes the NSEC3 type bit map
    types_at_qname: HashSet<RecordType>,
    /// Names whose A/AAAA go into the additional section
    additional_queue: BTreeSet<String>,
    /// The apex SOA discovered on the walk
    soa: Option<DnsRecord>,
    /// Lowest name on the walk that bore NS records
    delegation_point: Option<Name>,
    /// The query was made for the delegation point itself
    query_is_at_delegation_point: bool,
    /// Append the apex SOA to the authority section (empty answers)
    consolation_soa: bool,
    /// Skip NSEC3 denial (DS answers at a delegation)
    suppress_nsec: bool,
}

impl<'a> Tx<'a> {
    /// Whether `t` matches the question type; ANY matches everything
    fn istype(&self, t: RecordType) -> bool {
        self.qtype == t || self.qtype == RecordType::ANY
    }

    /// Backend lookup with empty results normalized to NoResults
    async fn blookup(&self, qname: &str) -> Result<Vec<DnsRecord>, LookupError> {
        debug!("blookup: {}", qname);
        let rrs = self.resolver.backend.lookup(qname).await?;
        if rrs.is_empty() {
            return Err(LookupError::NoResults);
        }
        Ok(rrs)
    }

    async fn add_answers(&mut self) -> Result<(), MimirError> {
        // NXDOMAIN and empty answers still get the consolation SOA and the
        // denial records below before the error decides the rcode
        let pending = match self.add_answers_main().await {
            Ok(()) => None,
            Err(MimirError::Lookup(err))
                if matches!(err, LookupError::NoSuchDomain | LookupError::NoResults) =>
            {
                self.consolation_soa = true;
                Some(err)
            }
            Err(other) => return Err(other),
        };

        // If we are at the zone apex, DNSKEYs live here too
        if self.soa.is_some() && self.types_at_qname.contains(&RecordType::SOA) {
            if self.istype(RecordType::DNSKEY) {
                let apex = self.apex_name();
                self.res.answers.push(self.resolver.ksk.dnskey_record(&apex));
                self.res.answers.push(self.resolver.zsk.dnskey_record(&apex));

                // the answer is no longer empty, so no consolation SOA
                self.consolation_soa = false;
            }

            self.types_at_qname.insert(RecordType::DNSKEY);
        }

        if self.consolation_soa {
            if let Some(soa) = &self.soa {
                self.res.authorities.push(soa.clone());
            }
        }

        self.add_nsec();
        self.add_additional().await;
        self.sign_response()?;

        match pending {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// The zone walk: find the apex by looking up progressively shorter
    /// names, then classify the query as authoritative or delegation.
    async fn add_answers_main(&mut self) -> Result<(), MimirError> {
        let mut soa: Option<DnsRecord> = None;
        let mut orig: Option<Result<Vec<DnsRecord>, LookupError>> = None;
        let mut nss: Vec<DnsRecord> = Vec::new();
        let mut first_ns_at_len: isize = -1;
        let mut first_soa_at_len: isize = -1;

        let norig = self.qname.lookup_key();
        let mut n = norig.clone();

        'walk: while !n.is_empty() {
            let result = self.blookup(&n).await;

            if n == norig {
                // keep the records at the original qname for the
                // authoritative branch
                orig = Some(result.clone());
            }

            if let Ok(rrs) = &result {
                for record in rrs {
                    match record.rtype {
                        RecordType::SOA => {
                            // the apex of the closest zone we are
                            // authoritative for; SOA shadows any delegation
                            // found deeper, so the walk can stop
                            if soa.is_none() {
                                soa = Some(record.clone());
                            }
                            if first_soa_at_len < 0 {
                                first_soa_at_len = n.len() as isize;
                            }
                            break 'walk;
                        }
                        RecordType::NS => {
                            if first_ns_at_len < 0 {
                                first_ns_at_len = n.len() as isize;
                                nss = rrs.clone();

                                self.delegation_point =
                                    Some(Name::parse(&n).map_err(MimirError::Packet)?);

                                if n == norig {
                                    self.query_is_at_delegation_point = true;
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }

            n = match n.split_once('.') {
                Some((_, rest)) => rest.to_string(),
                None => break,
            };
        }

        if soa.is_none() {
            // no SOA anywhere above: no appropriate zone for this query
            return Err(LookupError::NotInZone.into());
        }
        self.soa = soa;

        if first_soa_at_len >= first_ns_at_len {
            // SOA at the same level or below any NS: not a delegation
            let (rrs, err) = match orig {
                Some(Ok(rrs)) => (rrs, None),
                Some(Err(err)) => (Vec::new(), Some(err)),
                None => (Vec::new(), Some(LookupError::NoResults)),
            };
            self.add_answers_authoritative(rrs, err)
        } else {
            self.add_answers_delegation(nss)
        }
    }

    /// Serve records at the queried name as authoritative data
    fn add_answers_authoritative(
        &mut self,
        rrs: Vec<DnsRecord>,
        origerr: Option<LookupError>,
    ) -> Result<(), MimirError> {
        debug!("authoritative");

        if let Some(err) = origerr {
            return Err(err.into());
        }

        let cname = rrs.iter().find(|r| r.rtype == RecordType::CNAME);
        if let Some(cname) = cname {
            if !self.istype(RecordType::CNAME) {
                // an alias; the resolver in front of us chases it
                self.res.answers.push(cname.clone());
                return Ok(());
            }
        }

        for record in &rrs {
            if self.istype(record.rtype) {
                self.res.answers.push(record.clone());
            }

            // track what really exists here in case we have to deny types
            self.types_at_qname.insert(record.rtype);
        }

        if self.res.answers.is_empty() {
            // no matching records; hand out the SOA later (may yet be
            // quashed by DNSKEY answers)
            self.consolation_soa = true;
        }

        Ok(())
    }

    /// Serve a referral for a query crossing a delegation
    fn add_answers_delegation(&mut self, nss: Vec<DnsRecord>) -> Result<(), MimirError> {
        if let Some(delegation_point) = &self.delegation_point {
            debug!("delegation at {}", delegation_point);
        }

        // must not match ANY: DS is only special when asked for by name
        if self.qtype == RecordType::DS && self.query_is_at_delegation_point {
            // the parent side answers DS authoritatively; a consolation SOA
            // or NSEC3 takes its place when there is none
            let mut added = false;
            for record in &nss {
                if record.rtype == RecordType::DS {
                    added = true;
                    self.res.answers.push(record.clone());
                }
            }
            if added {
                self.suppress_nsec = true;
            } else {
                self.consolation_soa = true;
            }
        } else {
            self.res.header.aa = false;

            for record in &nss {
                match record.rtype {
                    RecordType::NS => {
                        self.res.authorities.push(record.clone());
                        if let crate::dns::rdata::RecordData::Ns(target) = &record.data {
                            self.additional_queue.insert(target.lookup_key());
                        }
                    }
                    RecordType::DS => {
                        self.res.authorities.push(record.clone());
                        self.suppress_nsec = true;
                    }
                    _ => {}
                }
            }
        }

        // the NSEC type map advertises NS at the delegation owner even in
        // the referral case
        self.types_at_qname.insert(RecordType::NS);

        Ok(())
    }

    /// Deny the queried name with an NSEC3 record when nothing answered
    fn add_nsec(&mut self) {
        if !self.dnssec_requested || self.suppress_nsec {
            return;
        }

        // NSEC replies are owed for empty answers of all kinds: missing
        // type, missing name, and the DS case handled above.
        //
        // TODO: RFC 5155 also wants the closest-encloser and wildcard-denial
        // records here; only the name denial is produced for now.
        if self.res.answers.is_empty() {
            debug!("adding NSEC3");
            let types: Vec<RecordType> = self.types_at_qname.iter().copied().collect();
            let denial = denial_record(&self.qname, &self.apex_name(), types);
            self.res.authorities.push(denial);
        }
    }

    /// Resolve queued nameserver targets into additional-section glue.
    /// Failures leave the section incomplete but never fail the response.
    async fn add_additional(&mut self) {
        let queue: Vec<String> = self.additional_queue.iter().cloned().collect();
        for aname in queue {
            debug!("additional: {}", aname);
            match self.blookup(&aname).await {
                Ok(rrs) => {
                    for record in rrs {
                        if matches!(record.rtype, RecordType::A | RecordType::AAAA) {
                            self.res.additionals.push(record);
                        }
                    }
                }
                Err(err) => {
                    debug!("additional lookup {} failed: {}", aname, err);
                }
            }
        }
    }

    /// Sign the authoritative RRsets in the answer and authority sections.
    /// In a referral only the parent-side data is ours to sign: the DS set
    /// and the NSEC3 denying it. The child's NS set and glue are not.
    fn sign_response(&mut self) -> Result<(), MimirError> {
        if !self.dnssec_requested {
            return Ok(());
        }

        let apex = match &self.soa {
            Some(soa) => soa.name.clone(),
            None => return Ok(()),
        };

        let window = SigningWindow::current();
        let authoritative = self.res.header.aa;
        let zsk = &self.resolver.zsk;
        let ksk = &self.resolver.ksk;

        if authoritative {
            sign_section(&mut self.res.answers, zsk, ksk, &apex, &window, |_| true)?;
        }
        sign_section(&mut self.res.authorities, zsk, ksk, &apex, &window, |r| {
            authoritative || matches!(r.rtype, RecordType::DS | RecordType::NSEC3)
        })?;

        Ok(())
    }

    fn apex_name(&self) -> Name {
        self.soa
            .as_ref()
            .map(|soa| soa.name.clone())
            .unwrap_or_else(Name::root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::dns::question::DnsQuestion;
    use crate::dns::rdata::{RecordData, SoaData};
    use crate::dnssec::{FLAG_SEP, FLAG_ZONE};
    use std::net::Ipv4Addr;

    fn soa_record(owner: &str) -> DnsRecord {
        let name = Name::parse(owner).unwrap();
        DnsRecord::new(
            name.clone(),
            RecordType::SOA,
            600,
            RecordData::Soa(SoaData {
                mname: name.prepend("ns1"),
                rname: name.prepend("hostmaster"),
                serial: 1,
                refresh: 600,
                retry: 600,
                expire: 7200,
                minimum: 600,
            }),
        )
    }

    fn resolver_for(backend: MemoryBackend) -> QueryResolver {
        QueryResolver::new(
            Arc::new(backend),
            ZoneKey::generate(FLAG_ZONE | FLAG_SEP).unwrap(),
            ZoneKey::generate_zsk().unwrap(),
        )
    }

    fn query(name: &str, qtype: RecordType) -> DnsMessage {
        let mut request = DnsMessage::default();
        request.header.id = 42;
        request
            .questions
            .push(DnsQuestion::new(Name::parse(name).unwrap(), qtype));
        request
    }

    #[tokio::test]
    async fn test_out_of_zone_is_refused() {
        let mut backend = MemoryBackend::new();
        backend.insert(soa_record("example."));
        let resolver = resolver_for(backend);

        let response = resolver.resolve(&query("elsewhere.test.", RecordType::A)).await;
        assert_eq!(response.header.rcode, ResponseCode::Refused.to_u8());
        assert!(response.answers.is_empty());
    }

    #[tokio::test]
    async fn test_chaos_class_question_is_skipped() {
        let mut backend = MemoryBackend::new();
        backend.insert(soa_record("example."));
        let resolver = resolver_for(backend);

        let mut request = query("example.", RecordType::SOA);
        request.questions[0].qclass = RecordClass::CH;

        let response = resolver.resolve(&request).await;
        assert_eq!(response.header.rcode, 0);
        assert!(response.answers.is_empty());
        assert!(response.authorities.is_empty());
    }

    #[tokio::test]
    async fn test_qname_is_lowercased_before_lookup() {
        let mut backend = MemoryBackend::new();
        backend.insert(soa_record("example."));
        backend.insert(DnsRecord::new(
            Name::parse("host.example.").unwrap(),
            RecordType::A,
            600,
            RecordData::A(Ipv4Addr::new(10, 0, 0, 2)),
        ));
        let resolver = resolver_for(backend);

        let response = resolver.resolve(&query("HOST.Example.", RecordType::A)).await;
        assert_eq!(response.header.rcode, 0);
        assert_eq!(response.answers.len(), 1);
    }

    #[tokio::test]
    async fn test_apex_soa_query() {
        let mut backend = MemoryBackend::new();
        backend.insert(soa_record("example."));
        let resolver = resolver_for(backend);

        let response = resolver.resolve(&query("example.", RecordType::SOA)).await;
        assert_eq!(response.header.rcode, 0);
        assert!(response.header.aa);
        assert_eq!(response.answers.len(), 1);
        assert_eq!(response.answers[0].rtype, RecordType::SOA);
    }
}
