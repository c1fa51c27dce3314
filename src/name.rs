use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{DnsError, Result};

/// Maximum length of a single label in octets.
pub const MAX_LABEL_LEN: usize = 63;
/// Maximum wire-encoded length of a name, including length octets and the
/// terminating zero.
pub const MAX_WIRE_LEN: usize = 255;
/// Maximum number of labels in a name.
pub const MAX_LABELS: usize = 128;

/// Top two bits of a length octet mark a compression pointer.
const POINTER_MASK: u8 = 0xC0;

/// An immutable, ASCII-compatible-encoded domain name.
///
/// The name is stored in its lowercased ACE form ("www.example.com", empty
/// string for the root) together with the derived label sequence. Equality
/// and hashing operate on the ACE form, which makes comparisons
/// case-insensitive by construction.
#[derive(Clone)]
pub struct DnsName {
    ace: String,
    labels: Vec<String>,
}

impl DnsName {
    /// The root name (zero labels).
    pub fn root() -> Self {
        DnsName {
            ace: String::new(),
            labels: Vec::new(),
        }
    }

    /// Build a name from a human-entered string, applying IDNA ToASCII to
    /// internationalized labels and enforcing the wire-length limits.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.strip_suffix('.').unwrap_or(input);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let ace = if trimmed.is_ascii() {
            trimmed.to_ascii_lowercase()
        } else {
            idna::domain_to_ascii(trimmed)
                .map_err(|e| DnsError::InvalidName(format!("{input:?}: {e}")))?
        };
        let labels: Vec<String> = ace.split('.').map(str::to_owned).collect();
        Self::from_labels(labels)
    }

    /// Build a name from leaf-first labels (["www", "example", "com"]).
    pub fn from_labels(labels: Vec<String>) -> Result<Self> {
        if labels.len() > MAX_LABELS {
            return Err(DnsError::InvalidName(format!(
                "too many labels: {}",
                labels.len()
            )));
        }
        let mut wire_len = 1;
        for label in &labels {
            if label.is_empty() {
                return Err(DnsError::InvalidName("empty label".to_string()));
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(DnsError::InvalidName(format!(
                    "label exceeds {MAX_LABEL_LEN} octets: {label:?}"
                )));
            }
            wire_len += 1 + label.len();
        }
        if wire_len > MAX_WIRE_LEN {
            return Err(DnsError::InvalidName(format!(
                "wire form is {wire_len} octets, limit is {MAX_WIRE_LEN}"
            )));
        }
        let labels: Vec<String> = labels
            .into_iter()
            .map(|l| l.to_ascii_lowercase())
            .collect();
        let ace = labels.join(".");
        Ok(DnsName { ace, labels })
    }

    /// Prepend a label, producing the child name.
    pub fn child(&self, label: &str) -> Result<Self> {
        let mut labels = Vec::with_capacity(self.labels.len() + 1);
        labels.push(label.to_string());
        labels.extend(self.labels.iter().cloned());
        Self::from_labels(labels)
    }

    /// Decode a name from wire format starting at `offset` in the full
    /// message buffer. Returns the name and the number of octets consumed at
    /// the original position (a compression pointer consumes two).
    ///
    /// Every pointer target is recorded in a visited set; revisiting one is a
    /// cyclic reference and fails instead of looping. Pointers must also
    /// point strictly backwards.
    pub fn parse_wire(buf: &[u8], offset: usize) -> Result<(Self, usize)> {
        let mut labels = Vec::new();
        let mut pos = offset;
        let mut consumed = None;
        let mut visited: HashSet<usize> = HashSet::new();

        loop {
            let len = *buf.get(pos).ok_or(DnsError::TruncatedMessage)? as usize;

            if len as u8 & POINTER_MASK == POINTER_MASK {
                let low = *buf.get(pos + 1).ok_or(DnsError::TruncatedMessage)?;
                let target = ((len & !(POINTER_MASK as usize)) << 8) | low as usize;
                if consumed.is_none() {
                    consumed = Some(pos + 2 - offset);
                }
                if target >= pos {
                    return Err(DnsError::InvalidName(
                        "compression pointer does not point backwards".to_string(),
                    ));
                }
                if !visited.insert(target) {
                    return Err(DnsError::InvalidName(
                        "cyclic compression pointer".to_string(),
                    ));
                }
                pos = target;
                continue;
            }

            if len as u8 & POINTER_MASK != 0 {
                return Err(DnsError::InvalidName(format!(
                    "reserved label length octet 0x{len:02x}"
                )));
            }

            if len == 0 {
                pos += 1;
                break;
            }

            if len > MAX_LABEL_LEN {
                return Err(DnsError::InvalidName(format!("label length {len}")));
            }
            let end = pos + 1 + len;
            let raw = buf.get(pos + 1..end).ok_or(DnsError::TruncatedMessage)?;
            let label = std::str::from_utf8(raw)
                .map_err(|_| DnsError::InvalidName("label is not valid UTF-8".to_string()))?;
            labels.push(label.to_string());
            pos = end;
        }

        let name = Self::from_labels(labels)?;
        Ok((name, consumed.unwrap_or(pos - offset)))
    }

    /// Append the uncompressed wire form to `out`. Compression is accepted on
    /// input but never emitted.
    pub fn write_wire(&self, out: &mut Vec<u8>) {
        for label in &self.labels {
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
        out.push(0);
    }

    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        self.write_wire(&mut out);
        out
    }

    /// Wire-encoded length including length octets and terminator.
    pub fn wire_len(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Leaf-first labels.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The lowercased ACE form without a trailing dot; empty for the root.
    pub fn ace(&self) -> &str {
        &self.ace
    }

    /// The name with the leaf label removed; the root is its own parent.
    pub fn parent(&self) -> DnsName {
        if self.is_root() {
            return self.clone();
        }
        let labels = self.labels[1..].to_vec();
        let ace = labels.join(".");
        DnsName { ace, labels }
    }

    /// Keep only the `count` labels closest to the root.
    pub fn truncate_to(&self, count: usize) -> DnsName {
        if count >= self.labels.len() {
            return self.clone();
        }
        let labels = self.labels[self.labels.len() - count..].to_vec();
        let ace = labels.join(".");
        DnsName { ace, labels }
    }

    /// True if `self` is a strict descendant of `ancestor`.
    pub fn is_child_of(&self, ancestor: &DnsName) -> bool {
        self.labels.len() > ancestor.labels.len()
            && self.truncate_to(ancestor.labels.len()) == *ancestor
    }

    /// Iterate from this name up to and including the root.
    pub fn ancestry(&self) -> impl Iterator<Item = DnsName> + '_ {
        (0..=self.labels.len())
            .rev()
            .map(move |count| self.truncate_to(count))
    }

    /// Canonical DNS ordering (RFC 4034 §6.1): compare label sequences from
    /// the root outward, byte-wise per label, an absent label sorting first.
    pub fn canonical_cmp(&self, other: &DnsName) -> Ordering {
        let a = self.labels.iter().rev();
        let b = other.labels.iter().rev();
        for (la, lb) in a.zip(b) {
            match la.as_bytes().cmp(lb.as_bytes()) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        self.labels.len().cmp(&other.labels.len())
    }
}

impl PartialEq for DnsName {
    fn eq(&self, other: &Self) -> bool {
        self.ace == other.ace
    }
}

impl Eq for DnsName {}

impl Hash for DnsName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ace.hash(state);
    }
}

impl fmt::Display for DnsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, ".")
        } else {
            write!(f, "{}", self.ace)
        }
    }
}

impl fmt::Debug for DnsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DnsName({self})")
    }
}

impl FromStr for DnsName {
    type Err = DnsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
