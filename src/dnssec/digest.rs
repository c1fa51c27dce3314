use ring::digest::{self, SHA256, SHA384, SHA1_FOR_LEGACY_USE_ONLY};

use crate::message::{Dnskey, Ds};
use crate::name::DnsName;

/// DS digest type numbers (RFC 4034, RFC 4509, RFC 6605).
pub const SHA1: u8 = 1;
pub const SHA_256: u8 = 2;
pub const SHA_384: u8 = 4;

pub fn is_supported(digest_type: u8) -> bool {
    matches!(digest_type, SHA1 | SHA_256 | SHA_384)
}

fn algorithm_for(digest_type: u8) -> Option<&'static digest::Algorithm> {
    match digest_type {
        SHA1 => Some(&SHA1_FOR_LEGACY_USE_ONLY),
        SHA_256 => Some(&SHA256),
        SHA_384 => Some(&SHA384),
        _ => None,
    }
}

/// The digest a DS record carries: hash over the owner name in wire form
/// followed by the DNSKEY rdata (RFC 4034 §5.1.4). `None` when the digest
/// type is not supported.
pub fn dnskey_digest(owner: &DnsName, dnskey: &Dnskey, digest_type: u8) -> Option<Vec<u8>> {
    let algorithm = algorithm_for(digest_type)?;
    let mut data = owner.to_wire();
    data.extend_from_slice(&dnskey.rdata_wire());
    Some(digest::digest(algorithm, &data).as_ref().to_vec())
}

/// Whether `ds` legitimately describes `dnskey` at `owner`. A `None` means
/// the digest type could not be checked, as opposed to a definite mismatch.
pub fn ds_matches(owner: &DnsName, dnskey: &Dnskey, ds: &Ds) -> Option<bool> {
    let computed = dnskey_digest(owner, dnskey, ds.digest_type)?;
    Some(computed == ds.digest)
}
