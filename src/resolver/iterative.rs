use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;

use tracing::{debug, trace};

use crate::cache::QueryCache;
use crate::config::{root_hints, ResolverConfig, DNS_PORT};
use crate::error::{DnsError, Result};
use crate::message::{DnsMessage, Edns, Question, RecordData, RecordType, ResponseCode};
use crate::name::DnsName;
use crate::transport::DnsDataSource;

/// Per-lookup bookkeeping shared across the whole recursion: which questions
/// have already been put to which servers, and how many queries remain in
/// the budget. A repeated (server, question) pair is a referral loop and
/// aborts the lookup.
pub(crate) struct ResolutionState {
    sent: HashMap<SocketAddr, HashSet<Question>>,
    steps_remaining: u32,
}

impl ResolutionState {
    pub(crate) fn new(max_steps: u32) -> Self {
        ResolutionState {
            sent: HashMap::new(),
            steps_remaining: max_steps,
        }
    }

    fn register(&mut self, server: SocketAddr, question: &Question) -> Result<()> {
        if self.steps_remaining == 0 {
            return Err(DnsError::MaxStepsReached);
        }
        self.steps_remaining -= 1;
        if !self
            .sent
            .entry(server)
            .or_default()
            .insert(question.clone())
        {
            return Err(DnsError::LoopDetected {
                server,
                question: question.to_string(),
            });
        }
        Ok(())
    }
}

/// A referral extracted from a non-authoritative response: the delegated
/// zone, the nameserver addresses the additional section glued in, and the
/// nameserver names that came without glue.
struct Delegation {
    zone: DnsName,
    glued: Vec<SocketAddr>,
    unglued: Vec<DnsName>,
}

type BoxedResult<'b, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'b>>;

/// Walks the delegation tree from the closest cached authority (or the root
/// hints) down to an authoritative answer.
pub(crate) struct Iterative<'a> {
    pub data_source: &'a dyn DnsDataSource,
    pub cache: &'a QueryCache,
    pub config: &'a ResolverConfig,
}

impl Iterative<'_> {
    pub(crate) async fn resolve(
        &self,
        state: &mut ResolutionState,
        question: &Question,
    ) -> Result<DnsMessage> {
        self.resolve_from_closest(state, question.clone()).await
    }

    fn resolve_from_closest<'b>(
        &'b self,
        state: &'b mut ResolutionState,
        question: Question,
    ) -> BoxedResult<'b, DnsMessage> {
        Box::pin(async move {
            let (zone, servers) = self.closest_known_authority(&question.name);
            debug!(%question, %zone, candidates = servers.len(), "iterative lookup");

            let mut errors = Vec::new();
            for server in servers {
                match self.query_at(state, &question, server).await {
                    Ok(response) => return Ok(response),
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => errors.push(err),
                }
            }
            Err(DnsError::NoServersReached(errors))
        })
    }

    /// Walk the ancestry of `name` and return the deepest zone with a live
    /// cached referral that carries usable glue; the root hints otherwise.
    fn closest_known_authority(&self, name: &DnsName) -> (DnsName, Vec<SocketAddr>) {
        for zone in name.ancestry() {
            if zone.is_root() {
                break;
            }
            if let Some(referral) = self.cache.get_authority(&zone) {
                if let Some(delegation) = self.delegation_from(&referral, name) {
                    if !delegation.glued.is_empty() {
                        trace!(%zone, "starting from cached delegation");
                        return (zone, delegation.glued);
                    }
                }
            }
        }
        (DnsName::root(), root_hints(self.config.ip_version))
    }

    fn query_at<'b>(
        &'b self,
        state: &'b mut ResolutionState,
        question: &'b Question,
        server: SocketAddr,
    ) -> BoxedResult<'b, DnsMessage> {
        Box::pin(async move {
            state.register(server, question)?;

            let query = self.build_query(question);
            let response = self.data_source.query(&query, server).await?;

            if response.authoritative {
                return self.conclude(state, question, response).await;
            }

            let Some(delegation) = self.delegation_from(&response, &question.name) else {
                return Err(DnsError::NotAuthoritativeNorGlue(question.name.to_string()));
            };
            trace!(
                zone = %delegation.zone,
                glued = delegation.glued.len(),
                unglued = delegation.unglued.len(),
                "following referral"
            );
            self.cache
                .offer_authority(delegation.zone.clone(), response.clone());

            let mut errors = Vec::new();
            for addr in delegation.glued {
                match self.query_at(state, question, addr).await {
                    Ok(response) => return Ok(response),
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => errors.push(err),
                }
            }

            // Gluelessly delegated nameservers need a lookup of their own
            // before the referral can be followed.
            for ns in delegation.unglued {
                let addrs = match self.resolve_host(state, ns.clone()).await {
                    Ok(addrs) => addrs,
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        errors.push(err);
                        continue;
                    }
                };
                for ip in addrs {
                    let addr = SocketAddr::new(ip, DNS_PORT);
                    match self.query_at(state, question, addr).await {
                        Ok(response) => return Ok(response),
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => errors.push(err),
                    }
                }
            }

            if errors.is_empty() {
                Err(DnsError::NotAuthoritativeNorGlue(
                    delegation.zone.to_string(),
                ))
            } else {
                Err(DnsError::NoServersReached(errors))
            }
        })
    }

    /// Accept an authoritative response, following a CNAME chain when the
    /// question asked for something else.
    fn conclude<'b>(
        &'b self,
        state: &'b mut ResolutionState,
        question: &'b Question,
        response: DnsMessage,
    ) -> BoxedResult<'b, DnsMessage> {
        Box::pin(async move {
            match response.rcode {
                ResponseCode::NoError | ResponseCode::NxDomain => {}
                other => return Err(DnsError::ErrorResponse(other.to_u16())),
            }

            let mut current = question.name.clone();
            let mut chain = Vec::new();
            // The chain cannot be longer than the answer section.
            for _ in 0..=response.answers.len() {
                if response
                    .answers
                    .iter()
                    .any(|r| r.name == current && r.rtype() == question.qtype)
                {
                    return Ok(response);
                }
                let link = response.answers.iter().find_map(|r| match &r.data {
                    RecordData::Cname(target) if r.name == current => {
                        Some((r.clone(), target.clone()))
                    }
                    _ => None,
                });
                match link {
                    Some((record, target)) => {
                        chain.push(record);
                        current = target;
                    }
                    None => break,
                }
            }

            if !chain.is_empty() && question.qtype != RecordType::Cname {
                debug!(%question, target = %current, "following CNAME");
                let next = Question {
                    name: current,
                    qtype: question.qtype,
                    qclass: question.qclass,
                    unicast: false,
                };
                let mut tail = self.resolve_from_closest(state, next).await?;
                chain.append(&mut tail.answers);
                tail.answers = chain;
                tail.questions = vec![question.clone()];
                return Ok(tail);
            }

            if response.answers.is_empty() || self.config.disable_result_filter {
                // Negative answer (NXDOMAIN or NODATA), or filtering is off.
                Ok(response)
            } else {
                Err(DnsError::Io(format!(
                    "answer section does not match question {question}"
                )))
            }
        })
    }

    /// Resolve a nameserver host to addresses, in the configured family
    /// order. Transient failures of one family fall through to the other.
    fn resolve_host<'b>(
        &'b self,
        state: &'b mut ResolutionState,
        host: DnsName,
    ) -> BoxedResult<'b, Vec<IpAddr>> {
        Box::pin(async move {
            let mut v4 = Vec::new();
            let mut v6 = Vec::new();

            if self.config.ip_version.wants_v4() {
                let question = Question::new(host.clone(), RecordType::A);
                match self.resolve_from_closest(state, question).await {
                    Ok(response) => {
                        v4.extend(response.answers.iter().filter_map(|r| match r.data {
                            RecordData::A(addr) => Some(addr),
                            _ => None,
                        }));
                    }
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => trace!(%host, %err, "A lookup for nameserver failed"),
                }
            }
            if self.config.ip_version.wants_v6() {
                let question = Question::new(host.clone(), RecordType::Aaaa);
                match self.resolve_from_closest(state, question).await {
                    Ok(response) => {
                        v6.extend(response.answers.iter().filter_map(|r| match r.data {
                            RecordData::Aaaa(addr) => Some(addr),
                            _ => None,
                        }));
                    }
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => trace!(%host, %err, "AAAA lookup for nameserver failed"),
                }
            }

            let ordered = self.config.ip_version.order(v4, v6);
            if ordered.is_empty() {
                Err(DnsError::Io(format!("no address known for nameserver {host}")))
            } else {
                Ok(ordered)
            }
        })
    }

    /// Extract the deepest delegation covering `qname` from the authority
    /// section, with glue addresses in the configured family order.
    fn delegation_from(&self, response: &DnsMessage, qname: &DnsName) -> Option<Delegation> {
        let mut zone: Option<DnsName> = None;
        for record in response.authorities_of_type(RecordType::Ns) {
            if (*qname == record.name || qname.is_child_of(&record.name))
                && zone
                    .as_ref()
                    .map_or(true, |z| record.name.label_count() > z.label_count())
            {
                zone = Some(record.name.clone());
            }
        }
        let zone = zone?;

        let mut v4 = Vec::new();
        let mut v6 = Vec::new();
        let mut unglued = Vec::new();
        for record in response.authorities_of_type(RecordType::Ns) {
            if record.name != zone {
                continue;
            }
            let RecordData::Ns(target) = &record.data else {
                continue;
            };
            let mut found_glue = false;
            for glue in response.additionals.iter().filter(|r| r.name == *target) {
                match &glue.data {
                    RecordData::A(addr) if self.config.ip_version.wants_v4() => {
                        v4.push(*addr);
                        found_glue = true;
                    }
                    RecordData::Aaaa(addr) if self.config.ip_version.wants_v6() => {
                        v6.push(*addr);
                        found_glue = true;
                    }
                    _ => {}
                }
            }
            if !found_glue {
                unglued.push(target.clone());
            }
        }

        let glued = self
            .config
            .ip_version
            .order(v4, v6)
            .into_iter()
            .map(|ip| SocketAddr::new(ip, DNS_PORT))
            .collect();
        Some(Delegation {
            zone,
            glued,
            unglued,
        })
    }

    fn build_query(&self, question: &Question) -> DnsMessage {
        let mut edns = Edns::new(self.config.udp_payload_size);
        let mut builder = DnsMessage::builder()
            .id(rand::random())
            .question(question.clone())
            .recursion_desired(false);
        if self.config.ask_for_dnssec {
            edns.set_dnssec_ok(true);
            builder = builder.checking_disabled(true);
        }
        builder.edns(edns).build()
    }
}
