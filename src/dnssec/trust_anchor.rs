use std::collections::HashMap;

use parking_lot::RwLock;

use crate::message::Ds;
use crate::name::DnsName;

/// DS records trusted a priori, keyed by the exact zone they anchor. The
/// default store carries the IANA root key signing keys; tests usually start
/// from an empty store and add their own.
pub struct TrustAnchorStore {
    anchors: RwLock<HashMap<DnsName, Vec<Ds>>>,
}

impl TrustAnchorStore {
    pub fn empty() -> Self {
        TrustAnchorStore {
            anchors: RwLock::new(HashMap::new()),
        }
    }

    /// A store preloaded with the root zone trust anchors: KSK-2024 (key
    /// tag 38696) and KSK-2017 (key tag 20326).
    pub fn with_root_anchors() -> Self {
        let store = Self::empty();
        store.add(
            DnsName::root(),
            Ds {
                key_tag: 38696,
                algorithm: 8,
                digest_type: 2,
                digest: hex_digest(
                    "683D2D0ACB8C9B712A1948B27F741219298D0A450D612C483AF444A4C0FB2B16",
                ),
            },
        );
        store.add(
            DnsName::root(),
            Ds {
                key_tag: 20326,
                algorithm: 8,
                digest_type: 2,
                digest: hex_digest(
                    "E06D44B80B8F1D39A95C0B0D7C65D08458E880409BBC683457104237C7F8EC8D",
                ),
            },
        );
        store
    }

    pub fn add(&self, zone: DnsName, ds: Ds) {
        self.anchors.write().entry(zone).or_default().push(ds);
    }

    /// Anchors for exactly this zone; ancestry is not searched, the chain
    /// walk does that itself.
    pub fn anchors_for(&self, zone: &DnsName) -> Option<Vec<Ds>> {
        self.anchors.read().get(zone).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.read().is_empty()
    }
}

impl Default for TrustAnchorStore {
    fn default() -> Self {
        Self::with_root_anchors()
    }
}

fn hex_digest(hex: &str) -> Vec<u8> {
    // The literals above are well-formed by construction.
    hex::decode(hex).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_anchors_present_by_default() {
        let store = TrustAnchorStore::default();
        let anchors = store.anchors_for(&DnsName::root()).unwrap();
        assert_eq!(anchors.len(), 2);
        assert!(anchors.iter().any(|ds| ds.key_tag == 20326));
        assert!(anchors.iter().any(|ds| ds.key_tag == 38696));
        assert!(anchors.iter().all(|ds| ds.digest.len() == 32));
    }

    #[test]
    fn lookup_is_exact() {
        let store = TrustAnchorStore::default();
        assert!(store
            .anchors_for(&DnsName::parse("com").unwrap())
            .is_none());
    }
}
