use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use crate::name::DnsName;

pub const DNS_PORT: u16 = 53;

/// Which address families to resolve and in which order to try them.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum IpVersion {
    V4Only,
    V6Only,
    /// Prefer IPv4, fall back to IPv6.
    #[default]
    V4V6,
    /// Prefer IPv6, fall back to IPv4.
    V6V4,
}

impl IpVersion {
    pub fn wants_v4(self) -> bool {
        !matches!(self, IpVersion::V6Only)
    }

    pub fn wants_v6(self) -> bool {
        !matches!(self, IpVersion::V4Only)
    }

    /// Interleave candidate addresses according to the preference order.
    pub fn order(self, v4: Vec<Ipv4Addr>, v6: Vec<Ipv6Addr>) -> Vec<IpAddr> {
        let v4 = v4.into_iter().map(IpAddr::V4);
        let v6 = v6.into_iter().map(IpAddr::V6);
        match self {
            IpVersion::V4Only => v4.collect(),
            IpVersion::V6Only => v6.collect(),
            IpVersion::V4V6 => v4.chain(v6).collect(),
            IpVersion::V6V4 => v6.chain(v4).collect(),
        }
    }
}

/// How the client obtains answers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ResolutionMode {
    /// Send recursion-desired queries to configured upstream servers.
    #[default]
    Forwarding,
    /// Walk the delegation tree from the root hints.
    Iterative,
    /// Forward first; when every upstream fails or rejects the query,
    /// resolve iteratively instead.
    ForwardingWithIterativeFallback,
}

/// Resolver configuration. Plain data; the client takes a copy at
/// construction time.
#[derive(Clone, Debug)]
pub struct ResolverConfig {
    pub mode: ResolutionMode,
    pub ip_version: IpVersion,
    /// Upstream servers for forwarding mode.
    pub forward_servers: Vec<SocketAddr>,
    /// Fall back to well-known public resolvers when `forward_servers`
    /// yields nothing.
    pub use_hardcoded_fallback_servers: bool,
    /// Request and validate DNSSEC signatures.
    pub ask_for_dnssec: bool,
    /// Remove RRSIG records from validated answers.
    pub strip_signature_records: bool,
    /// DNSSEC lookaside validation zone, if any (RFC 4431).
    pub dlv_zone: Option<DnsName>,
    /// Accept responses whose answer section is unrelated to the question.
    pub disable_result_filter: bool,
    /// Budget for the iterative resolver; one budget is shared across the
    /// whole recursion for a single lookup.
    pub max_steps: u32,
    pub cache_capacity: usize,
    /// Cap on how long any record may be served from cache, regardless of
    /// its TTL.
    pub max_cache_ttl: Duration,
    pub query_timeout: Duration,
    /// Advertised EDNS UDP payload size.
    pub udp_payload_size: u16,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            mode: ResolutionMode::Forwarding,
            ip_version: IpVersion::default(),
            forward_servers: Vec::new(),
            use_hardcoded_fallback_servers: true,
            ask_for_dnssec: false,
            strip_signature_records: true,
            dlv_zone: None,
            disable_result_filter: false,
            max_steps: 128,
            cache_capacity: 512,
            max_cache_ttl: Duration::from_secs(24 * 60 * 60),
            query_timeout: Duration::from_secs(5),
            udp_payload_size: 1232,
        }
    }
}

impl ResolverConfig {
    /// Candidate upstream servers in query order, honoring the address
    /// family preference and the fallback switch.
    pub fn upstream_candidates(&self) -> Vec<SocketAddr> {
        let mut candidates: Vec<SocketAddr> = self
            .forward_servers
            .iter()
            .copied()
            .filter(|addr| match addr {
                SocketAddr::V4(_) => self.ip_version.wants_v4(),
                SocketAddr::V6(_) => self.ip_version.wants_v6(),
            })
            .collect();
        if candidates.is_empty() && self.use_hardcoded_fallback_servers {
            candidates = fallback_servers(self.ip_version);
        }
        candidates
    }
}

fn v4(a: u8, b: u8, c: u8, d: u8) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(a, b, c, d)), DNS_PORT)
}

fn v6(segments: [u16; 8]) -> SocketAddr {
    SocketAddr::new(IpAddr::V6(Ipv6Addr::from(segments)), DNS_PORT)
}

/// Well-known public resolvers used when no upstream servers are known.
pub fn fallback_servers(ip_version: IpVersion) -> Vec<SocketAddr> {
    let mut servers = Vec::new();
    if ip_version.wants_v4() {
        servers.push(v4(1, 1, 1, 1));
        servers.push(v4(8, 8, 8, 8));
        servers.push(v4(9, 9, 9, 9));
    }
    if ip_version.wants_v6() {
        servers.push(v6([0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1111]));
        servers.push(v6([0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8888]));
        servers.push(v6([0x2620, 0x00fe, 0, 0, 0, 0, 0, 0x00fe]));
    }
    servers
}

/// The root server addresses, the iterative resolver's starting point when
/// the cache knows nothing closer.
pub fn root_hints(ip_version: IpVersion) -> Vec<SocketAddr> {
    let mut servers = Vec::new();
    if ip_version.wants_v4() {
        servers.extend([
            v4(198, 41, 0, 4),
            v4(170, 247, 170, 2),
            v4(192, 33, 4, 12),
            v4(199, 7, 91, 13),
            v4(192, 203, 230, 10),
            v4(192, 5, 5, 241),
            v4(192, 112, 36, 4),
            v4(198, 97, 190, 53),
            v4(192, 36, 148, 17),
            v4(192, 58, 128, 30),
            v4(193, 0, 14, 129),
            v4(199, 7, 83, 42),
            v4(202, 12, 27, 33),
        ]);
    }
    if ip_version.wants_v6() {
        servers.extend([
            v6([0x2001, 0x0503, 0xba3e, 0, 0, 0, 2, 0x0030]),
            v6([0x2801, 0x01b8, 0x0010, 0, 0, 0, 0, 0x000b]),
            v6([0x2001, 0x0500, 2, 0, 0, 0, 0, 0x000c]),
            v6([0x2001, 0x0500, 0x002d, 0, 0, 0, 0, 0x000d]),
            v6([0x2001, 0x0500, 0x00a8, 0, 0, 0, 0, 0x000e]),
            v6([0x2001, 0x0500, 0x002f, 0, 0, 0, 0, 0x000f]),
            v6([0x2001, 0x0500, 0x0012, 0, 0, 0, 0, 0x0d0d]),
            v6([0x2001, 0x0500, 1, 0, 0, 0, 0, 0x0053]),
            v6([0x2001, 0x07fe, 0, 0, 0, 0, 0, 0x0053]),
            v6([0x2001, 0x0503, 0x0c27, 0, 0, 0, 2, 0x0030]),
            v6([0x2001, 0x07fd, 0, 0, 0, 0, 0, 1]),
            v6([0x2001, 0x0500, 0x009f, 0, 0, 0, 0, 0x0042]),
            v6([0x2001, 0x0dc3, 0, 0, 0, 0, 0, 0x0035]),
        ]);
    }
    servers
}
