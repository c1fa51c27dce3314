use std::cmp::Ordering;

use ring::digest::{digest, SHA1_FOR_LEGACY_USE_ONLY};

use crate::message::{Nsec, Nsec3, Question};
use crate::name::DnsName;

/// NSEC3 hash algorithm numbers (RFC 5155 §11). Only SHA-1 is assigned.
pub const NSEC3_SHA1: u8 = 1;

/// Whether `query` falls strictly inside the canonical-order interval
/// (`owner`, `next`) that an NSEC record spans. Descendants of a bound count
/// as after it, so a bound also covers everything below itself.
pub fn nsec_matches(query: &DnsName, owner: &DnsName, next: &DnsName) -> bool {
    let after_owner =
        query.is_child_of(owner) || truncated_cmp(query, owner) == Ordering::Greater;
    let before_next = query.is_child_of(next) || truncated_cmp(query, next) == Ordering::Less;
    after_owner && before_next
}

/// Canonical comparison of `query` against a bound, with the longer name
/// first truncated to the bound's label count so a name compares equal to
/// its own ancestor prefix.
fn truncated_cmp(query: &DnsName, bound: &DnsName) -> Ordering {
    let count = query.label_count().min(bound.label_count());
    query
        .truncate_to(count)
        .canonical_cmp(&bound.truncate_to(count))
}

/// Whether this NSEC record proves the question unanswerable: either the
/// owner is the queried name and the type bitmap lacks the queried type, or
/// the queried name falls in the gap the record spans.
pub fn nsec_proves(question: &Question, owner: &DnsName, nsec: &Nsec) -> bool {
    if owner == &question.name {
        return !nsec.types.contains(&question.qtype);
    }
    nsec_matches(&question.name, owner, &nsec.next)
}

/// The iterated NSEC3 hash of a name (RFC 5155 §5): H(name), then
/// `iterations` more rounds of H(previous || salt). `None` for hash
/// algorithms other than SHA-1.
pub fn nsec3_hash(algorithm: u8, salt: &[u8], iterations: u16, name: &DnsName) -> Option<Vec<u8>> {
    if algorithm != NSEC3_SHA1 {
        return None;
    }
    let mut data = name.to_wire();
    data.extend_from_slice(salt);
    let mut hash = digest(&SHA1_FOR_LEGACY_USE_ONLY, &data).as_ref().to_vec();
    for _ in 0..iterations {
        let mut round = hash;
        round.extend_from_slice(salt);
        hash = digest(&SHA1_FOR_LEGACY_USE_ONLY, &round).as_ref().to_vec();
    }
    Some(hash)
}

/// Base32 with the extended-hex alphabet, lowercased, as used for NSEC3
/// owner labels.
pub fn base32_hex(data: &[u8]) -> String {
    base32::encode(base32::Alphabet::Rfc4648Hex { padding: false }, data).to_ascii_lowercase()
}

/// Whether this NSEC3 record proves the question unanswerable. `owner_label`
/// is the leaf label of the record's owner name, the base32hex form of the
/// hashed original owner.
pub fn nsec3_proves(question: &Question, owner_label: &str, nsec3: &Nsec3) -> bool {
    let Some(hash) = nsec3_hash(
        nsec3.algorithm,
        &nsec3.salt,
        nsec3.iterations,
        &question.name,
    ) else {
        return false;
    };

    if base32_hex(&hash).eq_ignore_ascii_case(owner_label) {
        // Exact hash match: NODATA proof via the type bitmap.
        return !nsec3.types.contains(&question.qtype);
    }

    let Some(owner_hash) = decode_base32_hex(owner_label) else {
        return false;
    };
    hash_in_interval(&hash, &owner_hash, &nsec3.next_hashed)
}

fn decode_base32_hex(label: &str) -> Option<Vec<u8>> {
    base32::decode(
        base32::Alphabet::Rfc4648Hex { padding: false },
        &label.to_ascii_uppercase(),
    )
}

/// Strictly between owner and next in hash order, including the wrap-around
/// interval at the end of the hash space.
fn hash_in_interval(hash: &[u8], owner: &[u8], next: &[u8]) -> bool {
    if owner < next {
        owner < hash && hash < next
    } else {
        // Last interval of the zone: covers everything after the owner and
        // everything before the smallest hash.
        hash > owner || hash < next
    }
}
