mod forwarding;
mod iterative;

use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::cache::{CacheStats, QueryCache};
use crate::config::{ResolutionMode, ResolverConfig};
use crate::dnssec::{ChainSource, TrustAnchorStore, UnverifiedReason, Verifier};
use crate::error::Result;
use crate::message::{DnsMessage, Edns, Question, RecordData, RecordType};
use crate::name::DnsName;
use crate::transport::{DnsDataSource, UdpTcpDataSource};

use iterative::{Iterative, ResolutionState};

/// A response together with its authentication verdict. `unverified_reasons`
/// is empty for authenticated answers and for lookups that never attempted
/// validation; `is_authentic` tells the two apart.
#[derive(Clone, Debug)]
pub struct ResolvedMessage {
    pub message: DnsMessage,
    pub unverified_reasons: Vec<UnverifiedReason>,
    authenticated: bool,
}

impl ResolvedMessage {
    pub fn is_authentic(&self) -> bool {
        self.authenticated
    }
}

/// The resolver client: forwarding or iterative resolution, a shared cache,
/// and optional DNSSEC validation on top.
pub struct DnsClient {
    config: ResolverConfig,
    cache: Arc<QueryCache>,
    data_source: Arc<dyn DnsDataSource>,
    /// Forwarders that answered without the RA bit; never asked again.
    blacklist: DashMap<SocketAddr, ()>,
    trust_anchors: Arc<TrustAnchorStore>,
}

impl DnsClient {
    pub fn new(config: ResolverConfig) -> Self {
        let data_source = Arc::new(UdpTcpDataSource::new(
            config.query_timeout,
            config.udp_payload_size,
        ));
        Self::with_data_source(config, data_source)
    }

    /// Build a client over an arbitrary data source, typically a scripted
    /// one in tests.
    pub fn with_data_source(config: ResolverConfig, data_source: Arc<dyn DnsDataSource>) -> Self {
        let cache = Arc::new(QueryCache::new(config.cache_capacity, config.max_cache_ttl));
        DnsClient {
            config,
            cache,
            data_source,
            blacklist: DashMap::new(),
            trust_anchors: Arc::new(TrustAnchorStore::default()),
        }
    }

    pub fn trust_anchors(mut self, anchors: Arc<TrustAnchorStore>) -> Self {
        self.trust_anchors = anchors;
        self
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Resolve one question, consulting the cache first. Cached responses
    /// are re-validated on every hit when DNSSEC is enabled, since the
    /// validity window of a signature can lapse while the records live on.
    pub async fn query(&self, question: Question) -> Result<ResolvedMessage> {
        if let Some(cached) = self.cache.get(&question) {
            debug!(%question, "cache hit");
            return self.finalize(&question, cached).await;
        }

        let response = self.query_raw(&question).await?;
        self.cache.put(question.clone(), response.clone());
        self.finalize(&question, response).await
    }

    /// The addresses of a host, in the configured family order.
    pub async fn resolve_ips(&self, name: &DnsName) -> Result<Vec<IpAddr>> {
        let mut v4 = Vec::new();
        let mut v6 = Vec::new();
        if self.config.ip_version.wants_v4() {
            let resolved = self.query(Question::new(name.clone(), RecordType::A)).await?;
            v4.extend(resolved.message.answers.iter().filter_map(|r| match r.data {
                RecordData::A(addr) => Some(addr),
                _ => None,
            }));
        }
        if self.config.ip_version.wants_v6() {
            let resolved = self
                .query(Question::new(name.clone(), RecordType::Aaaa))
                .await?;
            v6.extend(resolved.message.answers.iter().filter_map(|r| match r.data {
                RecordData::Aaaa(addr) => Some(addr),
                _ => None,
            }));
        }
        Ok(self.config.ip_version.order(v4, v6))
    }

    async fn query_raw(&self, question: &Question) -> Result<DnsMessage> {
        match self.config.mode {
            ResolutionMode::Forwarding => self.forward(question).await,
            ResolutionMode::Iterative => self.iterate(question).await,
            ResolutionMode::ForwardingWithIterativeFallback => {
                match self.forward(question).await {
                    Ok(response) => Ok(response),
                    Err(err) if err.is_fatal() => Err(err),
                    Err(err) => {
                        debug!(%question, %err, "forwarding failed, resolving iteratively");
                        self.iterate(question).await
                    }
                }
            }
        }
    }

    async fn forward(&self, question: &Question) -> Result<DnsMessage> {
        let query = self.build_query(question);
        let candidates = self.config.upstream_candidates();
        forwarding::resolve(
            self.data_source.as_ref(),
            &candidates,
            &self.blacklist,
            &query,
            |response| self.acceptable(question, response),
        )
        .await
    }

    async fn iterate(&self, question: &Question) -> Result<DnsMessage> {
        let mut state = ResolutionState::new(self.config.max_steps);
        let walker = Iterative {
            data_source: self.data_source.as_ref(),
            cache: &self.cache,
            config: &self.config,
        };
        walker.resolve(&mut state, question).await
    }

    async fn finalize(&self, question: &Question, mut message: DnsMessage) -> Result<ResolvedMessage> {
        if !self.config.ask_for_dnssec {
            return Ok(ResolvedMessage {
                message,
                unverified_reasons: Vec::new(),
                authenticated: false,
            });
        }

        let verifier = Verifier::new(self, &self.trust_anchors, self.config.dlv_zone.clone());
        let reasons = verifier.verify_message(question, &message).await?;
        let authenticated = reasons.is_empty();
        if authenticated {
            message.authentic_data = true;
            if self.config.strip_signature_records {
                message.strip_signature_records();
            }
        } else {
            for reason in &reasons {
                warn!(%question, %reason, "response could not be authenticated");
            }
        }
        Ok(ResolvedMessage {
            message,
            unverified_reasons: reasons,
            authenticated,
        })
    }

    fn build_query(&self, question: &Question) -> DnsMessage {
        let mut edns = Edns::new(self.config.udp_payload_size);
        let mut builder = DnsMessage::builder()
            .id(rand::random())
            .query()
            .question(question.clone());
        if self.config.ask_for_dnssec {
            edns.set_dnssec_ok(true);
            builder = builder.checking_disabled(true);
        }
        builder.edns(edns).build()
    }

    /// Forwarding-mode acceptance: the answer section must relate to the
    /// question, and a validating lookup requires the upstream to echo the
    /// DNSSEC flags so stripped signatures are detectable.
    fn acceptable(&self, question: &Question, response: &DnsMessage) -> std::result::Result<(), String> {
        if !self.config.disable_result_filter && !answers_question(question, response) {
            return Err(format!(
                "answer section does not match question {question}"
            ));
        }
        if self.config.ask_for_dnssec {
            if !response.asking_for_dnssec() {
                return Err("upstream did not echo the DNSSEC-OK flag".to_string());
            }
            if !response.checking_disabled {
                return Err("upstream did not echo the checking-disabled flag".to_string());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChainSource for DnsClient {
    /// Plain lookups for the trust-chain walk. These go through the cache
    /// but never through validation, which is what makes the recursion
    /// bottom out.
    async fn lookup(&self, name: DnsName, rtype: RecordType) -> Result<DnsMessage> {
        let question = Question::new(name, rtype);
        if let Some(cached) = self.cache.get(&question) {
            return Ok(cached);
        }
        let response = self.query_raw(&question).await?;
        self.cache.put(question, response.clone());
        Ok(response)
    }
}

/// Whether the answer section is responsive to the question: empty (a
/// negative answer), or reachable from the queried name through a CNAME
/// chain ending in the queried type.
fn answers_question(question: &Question, response: &DnsMessage) -> bool {
    if response.answers.is_empty() {
        return true;
    }
    let mut current = question.name.clone();
    for _ in 0..=response.answers.len() {
        if response
            .answers
            .iter()
            .any(|r| r.name == current && r.rtype() == question.qtype)
        {
            return true;
        }
        let link = response.answers.iter().find_map(|r| match &r.data {
            RecordData::Cname(target) if r.name == current => Some(target.clone()),
            _ => None,
        });
        match link {
            Some(target) => current = target,
            None => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Record, RecordClass};
    use std::net::Ipv4Addr;

    fn question(name: &str) -> Question {
        Question::new(DnsName::parse(name).unwrap(), RecordType::A)
    }

    fn a_record(name: &str) -> Record {
        Record::new(
            DnsName::parse(name).unwrap(),
            RecordClass::In,
            60,
            RecordData::A(Ipv4Addr::new(192, 0, 2, 1)),
        )
    }

    fn cname(name: &str, target: &str) -> Record {
        Record::new(
            DnsName::parse(name).unwrap(),
            RecordClass::In,
            60,
            RecordData::Cname(DnsName::parse(target).unwrap()),
        )
    }

    #[test]
    fn direct_answer_matches() {
        let response = DnsMessage::builder().answer(a_record("example.com")).build();
        assert!(answers_question(&question("example.com"), &response));
        assert!(!answers_question(&question("other.com"), &response));
    }

    #[test]
    fn cname_chain_matches() {
        let response = DnsMessage::builder()
            .answer(cname("www.example.com", "cdn.example.net"))
            .answer(a_record("cdn.example.net"))
            .build();
        assert!(answers_question(&question("www.example.com"), &response));
    }

    #[test]
    fn dangling_cname_does_not_match() {
        let response = DnsMessage::builder()
            .answer(cname("www.example.com", "cdn.example.net"))
            .answer(a_record("unrelated.org"))
            .build();
        assert!(!answers_question(&question("www.example.com"), &response));
    }

    #[test]
    fn empty_answer_is_responsive() {
        let response = DnsMessage::builder().build();
        assert!(answers_question(&question("example.com"), &response));
    }
}
