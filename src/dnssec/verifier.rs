use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::dnssec::{algorithm, denial, digest, key_tag, TrustAnchorStore, UnverifiedReason};
use crate::error::{DnsError, Result};
use crate::message::{
    DnsMessage, Dnskey, Ds, Question, Record, RecordData, RecordType, Rrsig,
};
use crate::name::DnsName;
use crate::rrset::RrSet;

/// Where the verifier obtains DNSKEY and DS records while walking the trust
/// chain. The client implements this with plain, non-validating lookups.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn lookup(&self, name: DnsName, rtype: RecordType) -> Result<DnsMessage>;
}

/// Build the octet sequence an RRSIG signs (RFC 4035 §5.3.2): the signature
/// rdata up to the signature itself, followed by the canonical form of every
/// record, sorted by rdata. A signature whose label count is smaller than
/// the owner's proves wildcard synthesis, so the owner is rewritten to the
/// wildcard form first.
pub fn signed_data(owner: &DnsName, records: &[Record], sig: &Rrsig) -> Vec<u8> {
    let owner = if (sig.labels as usize) < owner.label_count() {
        let truncated = owner.truncate_to(sig.labels as usize);
        match truncated.child("*") {
            Ok(wildcard) => wildcard,
            Err(_) => truncated,
        }
    } else {
        owner.clone()
    };

    let mut wires: Vec<Vec<u8>> = records
        .iter()
        .map(|record| {
            let mut canonical = record.clone();
            canonical.name = owner.clone();
            canonical.ttl = sig.original_ttl;
            canonical.unicast = false;
            canonical.to_wire()
        })
        .collect();
    // Canonical RRset order sorts by rdata; the wire prefix before it is
    // identical apart from the length field, which must not participate.
    let rdata_at = owner.wire_len() + 10;
    wires.sort_by(|a, b| a[rdata_at..].cmp(&b[rdata_at..]));

    let mut out = sig.rdata_without_signature();
    for wire in wires {
        out.extend_from_slice(&wire);
    }
    out
}

enum Outcome {
    Verified,
    Unverified(Vec<UnverifiedReason>),
}

enum KeysOutcome {
    Trusted(Vec<Dnskey>),
    Unverified(Vec<UnverifiedReason>),
}

/// The trusted DS set for a zone, with its provenance: a mismatch against a
/// locally configured anchor is a soft conflict, while a mismatch against a
/// verified parent DS or lookaside record is a broken chain.
enum SepSet {
    Anchored(Vec<Ds>),
    Delegated(Vec<Ds>, Vec<UnverifiedReason>),
    Missing(Vec<UnverifiedReason>),
}

type Boxed<'b, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'b>>;

/// Walks signatures up to a trust anchor. Failure to build a chain is a
/// soft outcome reported as reasons; a signature that exists, is covered by
/// a trusted key and still does not verify is fatal.
pub struct Verifier<'a> {
    source: &'a dyn ChainSource,
    anchors: &'a TrustAnchorStore,
    dlv_zone: Option<DnsName>,
    now: u32,
}

impl<'a> Verifier<'a> {
    pub fn new(
        source: &'a dyn ChainSource,
        anchors: &'a TrustAnchorStore,
        dlv_zone: Option<DnsName>,
    ) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        Verifier {
            source,
            anchors,
            dlv_zone,
            now,
        }
    }

    /// Verify every RRset of a response. An empty reason list means the
    /// response is fully authenticated.
    pub async fn verify_message(
        &self,
        question: &Question,
        message: &DnsMessage,
    ) -> Result<Vec<UnverifiedReason>> {
        let mut reasons = Vec::new();

        for (section, sets) in [
            (&message.answers, RrSet::partition(&message.answers)),
            (&message.authorities, RrSet::partition(&message.authorities)),
        ] {
            for set in &sets {
                if set.rtype() == RecordType::Rrsig {
                    continue;
                }
                let sigs = signatures_covering(section, set.name(), set.rtype());
                match self.verify_rrset(set.name(), set.records(), &sigs).await? {
                    Outcome::Verified => {}
                    Outcome::Unverified(mut more) => reasons.append(&mut more),
                }
            }
        }

        if message.answers.is_empty() && !self.denial_proven(question, &message.authorities) {
            reasons.push(UnverifiedReason::NsecMismatch {
                question: question.to_string(),
            });
        }

        Ok(dedup(reasons))
    }

    /// Verify one RRset against its signatures. One verifying signature is
    /// enough; a trusted key whose signature does not match aborts.
    fn verify_rrset<'b>(
        &'b self,
        owner: &'b DnsName,
        records: &'b [Record],
        sigs: &'b [Rrsig],
    ) -> Boxed<'b, Outcome> {
        Box::pin(async move {
            let describe = || format!("{owner} {}", records[0].rtype());

            if sigs.is_empty() {
                return Ok(Outcome::Unverified(vec![UnverifiedReason::NoSignatures {
                    rrset: describe(),
                }]));
            }
            let active: Vec<&Rrsig> = sigs.iter().filter(|s| s.is_active_at(self.now)).collect();
            if active.is_empty() {
                return Ok(Outcome::Unverified(vec![
                    UnverifiedReason::NoActiveSignatures { rrset: describe() },
                ]));
            }

            let mut reasons = Vec::new();
            for sig in active {
                if !algorithm::is_supported(sig.algorithm) {
                    reasons.push(UnverifiedReason::AlgorithmUnsupported {
                        algorithm: sig.algorithm,
                    });
                    continue;
                }
                // The signer must be the owner's zone or an ancestor of it;
                // this also keeps the chain walk monotone towards the root.
                if sig.signer != *owner && !owner.is_child_of(&sig.signer) {
                    trace!(%owner, signer = %sig.signer, "signer outside owner ancestry");
                    continue;
                }

                let keys = match self.authenticated_keys(&sig.signer).await? {
                    KeysOutcome::Trusted(keys) => keys,
                    KeysOutcome::Unverified(mut more) => {
                        reasons.append(&mut more);
                        continue;
                    }
                };
                let Some(key) = keys
                    .iter()
                    .find(|k| k.algorithm == sig.algorithm && key_tag::key_tag(k) == sig.key_tag)
                else {
                    reasons.push(UnverifiedReason::SignerKeyMissing {
                        signer: sig.signer.clone(),
                        key_tag: sig.key_tag,
                    });
                    continue;
                };

                let data = signed_data(owner, records, sig);
                algorithm::verify(sig.algorithm, &key.public_key, &data, &sig.signature)?;
                trace!(rrset = %describe(), signer = %sig.signer, "signature verified");
                return Ok(Outcome::Verified);
            }
            Ok(Outcome::Unverified(reasons))
        })
    }

    /// Authenticate the DNSKEY RRset of a zone: establish trusted DS records
    /// (anchor, parent or lookaside), match them against the zone's SEP
    /// keys, and check the self-signature. On success every key of the zone
    /// becomes trusted.
    fn authenticated_keys<'b>(&'b self, zone: &'b DnsName) -> Boxed<'b, KeysOutcome> {
        Box::pin(async move {
            let response = self.source.lookup(zone.clone(), RecordType::Dnskey).await?;
            let key_records: Vec<Record> = response
                .answers
                .iter()
                .filter(|r| r.name == *zone && matches!(r.data, RecordData::Dnskey(_)))
                .cloned()
                .collect();
            let keys: Vec<Dnskey> = key_records
                .iter()
                .filter_map(|r| match &r.data {
                    RecordData::Dnskey(k) => Some(k.clone()),
                    _ => None,
                })
                .collect();
            if keys.is_empty() {
                return Ok(KeysOutcome::Unverified(vec![
                    UnverifiedReason::NoTrustAnchor { zone: zone.clone() },
                ]));
            }

            let (ds_set, anchored, mut reasons) = match self.secure_entry_points(zone).await? {
                SepSet::Anchored(ds_set) => (ds_set, true, Vec::new()),
                SepSet::Delegated(ds_set, reasons) => (ds_set, false, reasons),
                SepSet::Missing(reasons) => return Ok(KeysOutcome::Unverified(reasons)),
            };

            let mut sep_keys: Vec<Dnskey> = Vec::new();
            let mut unmatched_tag = None;
            for ds in &ds_set {
                if !digest::is_supported(ds.digest_type) {
                    reasons.push(UnverifiedReason::DigestUnsupported {
                        digest_type: ds.digest_type,
                    });
                    continue;
                }
                match keys.iter().find(|k| {
                    key_tag::key_tag(k) == ds.key_tag
                        && digest::ds_matches(zone, k, ds) == Some(true)
                }) {
                    Some(key) => sep_keys.push(key.clone()),
                    None => unmatched_tag = Some(ds.key_tag),
                }
            }
            if sep_keys.is_empty() {
                if let Some(tag) = unmatched_tag {
                    if !anchored {
                        // The parent vouched for a key the zone does not
                        // publish: an inconsistent chain, not a missing one.
                        return Err(DnsError::ValidationFailed(format!(
                            "DS with key tag {tag} matches no key of zone {zone}"
                        )));
                    }
                    reasons.push(UnverifiedReason::ConflictsWithTrustAnchor {
                        zone: zone.clone(),
                        key_tag: tag,
                    });
                }
                return Ok(KeysOutcome::Unverified(reasons));
            }

            let sigs = signatures_covering(&response.answers, zone, RecordType::Dnskey);
            for sig in &sigs {
                if !sig.is_active_at(self.now) || !algorithm::is_supported(sig.algorithm) {
                    continue;
                }
                if let Some(sep) = sep_keys
                    .iter()
                    .find(|k| k.algorithm == sig.algorithm && key_tag::key_tag(k) == sig.key_tag)
                {
                    let data = signed_data(zone, &key_records, sig);
                    algorithm::verify(sig.algorithm, &sep.public_key, &data, &sig.signature)?;
                    debug!(%zone, key_tag = sig.key_tag, "DNSKEY RRset authenticated");
                    return Ok(KeysOutcome::Trusted(keys));
                }
            }
            reasons.push(UnverifiedReason::NoActiveSignatures {
                rrset: format!("{zone} DNSKEY"),
            });
            Ok(KeysOutcome::Unverified(reasons))
        })
    }

    /// Establish the trusted DS set for a zone: a configured anchor wins,
    /// then the parent-published DS RRset (itself verified), then the
    /// lookaside zone when one is configured.
    fn secure_entry_points<'b>(&'b self, zone: &'b DnsName) -> Boxed<'b, SepSet> {
        Box::pin(async move {
            if let Some(anchors) = self.anchors.anchors_for(zone) {
                return Ok(SepSet::Anchored(anchors));
            }
            if zone.is_root() {
                return Ok(SepSet::Missing(vec![
                    UnverifiedReason::NoRootSecureEntryPoint,
                ]));
            }

            let mut reasons = Vec::new();
            let response = self.source.lookup(zone.clone(), RecordType::Ds).await?;
            let ds_records: Vec<Record> = response
                .answers
                .iter()
                .filter(|r| r.name == *zone && matches!(r.data, RecordData::Ds(_)))
                .cloned()
                .collect();
            if !ds_records.is_empty() {
                // A DS RRset lives in the parent zone, so only signatures by
                // a strict ancestor count; this also keeps the recursion
                // finite.
                let mut sigs = signatures_covering(&response.answers, zone, RecordType::Ds);
                sigs.retain(|s| zone.is_child_of(&s.signer));
                match self.verify_rrset(zone, &ds_records, &sigs).await? {
                    Outcome::Verified => {
                        let ds_set = ds_records
                            .iter()
                            .filter_map(|r| match &r.data {
                                RecordData::Ds(ds) => Some(ds.clone()),
                                _ => None,
                            })
                            .collect();
                        return Ok(SepSet::Delegated(ds_set, reasons));
                    }
                    Outcome::Unverified(mut more) => reasons.append(&mut more),
                }
            }

            if let Some(ds_set) = self.lookaside(zone, &mut reasons).await? {
                return Ok(SepSet::Delegated(ds_set, reasons));
            }

            reasons.push(UnverifiedReason::NoTrustAnchor { zone: zone.clone() });
            Ok(SepSet::Missing(reasons))
        })
    }

    /// DNSSEC lookaside validation (RFC 4431): DLV records for
    /// `<zone>.<dlv-zone>` stand in for a missing DS RRset.
    async fn lookaside(
        &self,
        zone: &DnsName,
        reasons: &mut Vec<UnverifiedReason>,
    ) -> Result<Option<Vec<Ds>>> {
        let Some(dlv_zone) = &self.dlv_zone else {
            return Ok(None);
        };
        let mut labels: Vec<String> = zone.labels().to_vec();
        labels.extend(dlv_zone.labels().iter().cloned());
        let Ok(dlv_name) = DnsName::from_labels(labels) else {
            return Ok(None);
        };

        let response = self.source.lookup(dlv_name.clone(), RecordType::Dlv).await?;
        let dlv_records: Vec<Record> = response
            .answers
            .iter()
            .filter(|r| r.name == dlv_name && matches!(r.data, RecordData::Dlv(_)))
            .cloned()
            .collect();
        if dlv_records.is_empty() {
            return Ok(None);
        }

        let sigs = signatures_covering(&response.answers, &dlv_name, RecordType::Dlv);
        match self.verify_rrset(&dlv_name, &dlv_records, &sigs).await? {
            Outcome::Verified => {
                debug!(%zone, %dlv_name, "trusting lookaside entry");
                Ok(Some(
                    dlv_records
                        .iter()
                        .filter_map(|r| match &r.data {
                            RecordData::Dlv(ds) => Some(ds.clone()),
                            _ => None,
                        })
                        .collect(),
                ))
            }
            Outcome::Unverified(mut more) => {
                reasons.append(&mut more);
                Ok(None)
            }
        }
    }

    /// Whether the authority section's NSEC/NSEC3 records prove the
    /// question has no answer.
    fn denial_proven(&self, question: &Question, authorities: &[Record]) -> bool {
        for record in authorities {
            match &record.data {
                RecordData::Nsec(nsec) => {
                    if denial::nsec_proves(question, &record.name, nsec) {
                        return true;
                    }
                }
                RecordData::Nsec3(nsec3) => {
                    let Some(owner_label) = record.name.labels().first() else {
                        continue;
                    };
                    if denial::nsec3_proves(question, owner_label, nsec3) {
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }
}

/// The RRSIGs in `section` covering the RRset at (`owner`, `rtype`).
fn signatures_covering(section: &[Record], owner: &DnsName, rtype: RecordType) -> Vec<Rrsig> {
    section
        .iter()
        .filter_map(|r| match &r.data {
            RecordData::Rrsig(sig) if r.name == *owner && sig.type_covered == rtype => {
                Some(sig.clone())
            }
            _ => None,
        })
        .collect()
}

fn dedup(reasons: Vec<UnverifiedReason>) -> Vec<UnverifiedReason> {
    let mut unique = Vec::with_capacity(reasons.len());
    for reason in reasons {
        if !unique.contains(&reason) {
            unique.push(reason);
        }
    }
    unique
}
