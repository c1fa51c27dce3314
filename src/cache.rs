use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use crate::message::{DnsMessage, Question};
use crate::name::DnsName;

/// Cache key: the question with the owner name already normalized by
/// `DnsName`, so lookups are case-insensitive for free.
type CacheKey = Question;

#[derive(Clone, Debug)]
struct CacheEntry {
    message: DnsMessage,
    inserted: Instant,
    /// Smallest record TTL, capped by the configured maximum.
    lifetime: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted) > self.lifetime
    }
}

/// Point-in-time counters, all monotonically increasing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub evictions: u64,
}

/// TTL-respecting response cache with LRU eviction, plus a side table of
/// delegation responses keyed by zone for the iterative resolver.
pub struct QueryCache {
    capacity: usize,
    max_ttl: Duration,
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
}

struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Keys in least-recently-used-first order.
    order: VecDeque<CacheKey>,
    /// Referral responses by the zone they delegate, bounded like `entries`.
    authorities: HashMap<DnsName, CacheEntry>,
    /// Zones in least-recently-used-first order.
    authority_order: VecDeque<DnsName>,
}

impl QueryCache {
    pub fn new(capacity: usize, max_ttl: Duration) -> Self {
        QueryCache {
            capacity,
            max_ttl,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                authorities: HashMap::new(),
                authority_order: VecDeque::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn get(&self, question: &Question) -> Option<DnsMessage> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.entries.get(question) {
            Some(entry) if entry.is_expired(now) => {
                inner.entries.remove(question);
                inner.order.retain(|k| k != question);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => {
                let message = entry.message.clone();
                inner.order.retain(|k| k != question);
                inner.order.push_back(question.clone());
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(message)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, question: Question, message: DnsMessage) {
        let Some(lifetime) = self.lifetime_of(&message) else {
            trace!(%question, "response has no records, not caching");
            return;
        };
        let entry = CacheEntry {
            message,
            inserted: Instant::now(),
            lifetime,
        };
        let mut inner = self.inner.lock();
        if inner.entries.insert(question.clone(), entry).is_some() {
            inner.order.retain(|k| k != &question);
        }
        inner.order.push_back(question);
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Store a referral (a non-authoritative response whose authority
    /// section delegates `zone`) so future lookups under that zone can skip
    /// the upper delegation levels.
    pub fn offer_authority(&self, zone: DnsName, referral: DnsMessage) {
        let Some(lifetime) = self.lifetime_of(&referral) else {
            return;
        };
        let entry = CacheEntry {
            message: referral,
            inserted: Instant::now(),
            lifetime,
        };
        let mut inner = self.inner.lock();
        if inner.authorities.insert(zone.clone(), entry).is_some() {
            inner.authority_order.retain(|z| z != &zone);
        }
        inner.authority_order.push_back(zone);
        while inner.authorities.len() > self.capacity {
            let Some(oldest) = inner.authority_order.pop_front() else {
                break;
            };
            inner.authorities.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// The cached referral for exactly this zone, if still live.
    pub fn get_authority(&self, zone: &DnsName) -> Option<DnsMessage> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.authorities.get(zone) {
            Some(entry) if entry.is_expired(now) => {
                inner.authorities.remove(zone);
                inner.authority_order.retain(|z| z != zone);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => {
                let message = entry.message.clone();
                inner.authority_order.retain(|z| z != zone);
                inner.authority_order.push_back(zone.clone());
                Some(message)
            }
            None => None,
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// How long the response may be served: the minimum TTL across all
    /// sections, capped by the configured maximum. Responses without any
    /// record carry no TTL and are not cacheable.
    fn lifetime_of(&self, message: &DnsMessage) -> Option<Duration> {
        let min_ttl = message
            .answers
            .iter()
            .chain(&message.authorities)
            .chain(&message.additionals)
            .map(|r| r.ttl)
            .min()?;
        Some(Duration::from_secs(min_ttl as u64).min(self.max_ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Record, RecordClass, RecordData, RecordType};
    use std::net::Ipv4Addr;

    fn question(name: &str) -> Question {
        Question::new(DnsName::parse(name).unwrap(), RecordType::A)
    }

    fn response(name: &str, ttl: u32) -> DnsMessage {
        DnsMessage::builder()
            .question(question(name))
            .answer(Record::new(
                DnsName::parse(name).unwrap(),
                RecordClass::In,
                ttl,
                RecordData::A(Ipv4Addr::new(192, 0, 2, 1)),
            ))
            .build()
    }

    #[test]
    fn hit_and_miss_counting() {
        let cache = QueryCache::new(16, Duration::from_secs(3600));
        assert!(cache.get(&question("example.com")).is_none());
        cache.put(question("example.com"), response("example.com", 300));
        assert!(cache.get(&question("example.com")).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let cache = QueryCache::new(16, Duration::from_secs(3600));
        cache.put(question("Example.COM"), response("example.com", 300));
        assert!(cache.get(&question("example.com")).is_some());
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let cache = QueryCache::new(2, Duration::from_secs(3600));
        cache.put(question("a.com"), response("a.com", 300));
        cache.put(question("b.com"), response("b.com", 300));
        // Touch a.com so b.com becomes the eviction candidate.
        assert!(cache.get(&question("a.com")).is_some());
        cache.put(question("c.com"), response("c.com", 300));

        assert!(cache.get(&question("a.com")).is_some());
        assert!(cache.get(&question("b.com")).is_none());
        assert!(cache.get(&question("c.com")).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let cache = QueryCache::new(16, Duration::from_secs(3600));
        cache.put(question("example.com"), response("example.com", 0));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get(&question("example.com")).is_none());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn recordless_responses_are_not_cached() {
        let cache = QueryCache::new(16, Duration::from_secs(3600));
        let empty = DnsMessage::builder().question(question("example.com")).build();
        cache.put(question("example.com"), empty);
        assert!(cache.get(&question("example.com")).is_none());
    }

    #[test]
    fn authority_side_table() {
        let cache = QueryCache::new(16, Duration::from_secs(3600));
        let zone = DnsName::parse("com").unwrap();
        cache.offer_authority(zone.clone(), response("com", 300));
        assert!(cache.get_authority(&zone).is_some());
        assert!(cache
            .get_authority(&DnsName::parse("org").unwrap())
            .is_none());
    }

    #[test]
    fn authority_table_is_capacity_bounded() {
        let cache = QueryCache::new(2, Duration::from_secs(3600));
        let zone = |s: &str| DnsName::parse(s).unwrap();
        cache.offer_authority(zone("a.com"), response("a.com", 300));
        cache.offer_authority(zone("b.com"), response("b.com", 300));
        // Touch a.com so b.com becomes the eviction candidate.
        assert!(cache.get_authority(&zone("a.com")).is_some());
        cache.offer_authority(zone("c.com"), response("c.com", 300));

        assert!(cache.get_authority(&zone("a.com")).is_some());
        assert!(cache.get_authority(&zone("b.com")).is_none());
        assert!(cache.get_authority(&zone("c.com")).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }
}
