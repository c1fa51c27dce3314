pub mod algorithm;
pub mod denial;
pub mod digest;
pub mod key_tag;
pub mod trust_anchor;
pub mod verifier;

use std::fmt;

use crate::name::DnsName;

pub use trust_anchor::TrustAnchorStore;
pub use verifier::{ChainSource, Verifier};

/// Why a response could not be authenticated. These are soft outcomes: the
/// answer is still returned, marked unverified, as opposed to a failed
/// signature check which aborts the lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnverifiedReason {
    /// An RRset carried no signature at all.
    NoSignatures { rrset: String },
    /// Signatures exist but none is within its validity window.
    NoActiveSignatures { rrset: String },
    /// The signature uses an algorithm this build cannot verify.
    AlgorithmUnsupported { algorithm: u8 },
    /// A DS record uses a digest this build cannot compute.
    DigestUnsupported { digest_type: u8 },
    /// No trust anchor is configured for the root zone.
    NoRootSecureEntryPoint,
    /// The chain reached a zone with no configured anchor, no DS record in
    /// its parent and no lookaside entry.
    NoTrustAnchor { zone: DnsName },
    /// A configured trust anchor matches none of the zone's keys.
    ConflictsWithTrustAnchor { zone: DnsName, key_tag: u16 },
    /// A signature references a key tag the signer zone does not publish.
    SignerKeyMissing { signer: DnsName, key_tag: u16 },
    /// A negative response whose NSEC/NSEC3 records do not actually cover
    /// the question.
    NsecMismatch { question: String },
}

impl fmt::Display for UnverifiedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnverifiedReason::NoSignatures { rrset } => {
                write!(f, "no signatures for {rrset}")
            }
            UnverifiedReason::NoActiveSignatures { rrset } => {
                write!(f, "no signature for {rrset} is currently valid")
            }
            UnverifiedReason::AlgorithmUnsupported { algorithm } => {
                write!(f, "unsupported signature algorithm {algorithm}")
            }
            UnverifiedReason::DigestUnsupported { digest_type } => {
                write!(f, "unsupported digest type {digest_type}")
            }
            UnverifiedReason::NoRootSecureEntryPoint => {
                write!(f, "no trust anchor for the root zone")
            }
            UnverifiedReason::NoTrustAnchor { zone } => {
                write!(f, "no trust anchor reaches zone {zone}")
            }
            UnverifiedReason::ConflictsWithTrustAnchor { zone, key_tag } => {
                write!(
                    f,
                    "trust anchor with key tag {key_tag} matches no key of zone {zone}"
                )
            }
            UnverifiedReason::SignerKeyMissing { signer, key_tag } => {
                write!(f, "zone {signer} publishes no key with tag {key_tag}")
            }
            UnverifiedReason::NsecMismatch { question } => {
                write!(f, "denial-of-existence records do not cover {question}")
            }
        }
    }
}
