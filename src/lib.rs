//! A DNS resolution library: wire codec, forwarding and iterative
//! resolution, and DNSSEC trust-chain validation.
//!
//! The entry point is [`DnsClient`]; construct it from a
//! [`ResolverConfig`] and ask it questions:
//!
//! ```no_run
//! use mimir::{DnsClient, DnsName, Question, RecordType, ResolverConfig};
//!
//! # async fn example() -> mimir::Result<()> {
//! let client = DnsClient::new(ResolverConfig::default());
//! let question = Question::new(DnsName::parse("example.com")?, RecordType::A);
//! let resolved = client.query(question).await?;
//! for record in &resolved.message.answers {
//!     println!("{record:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod dnssec;
pub mod error;
pub mod message;
pub mod name;
pub mod resolver;
pub mod rrset;
pub mod transport;

pub use cache::{CacheStats, QueryCache};
pub use config::{IpVersion, ResolutionMode, ResolverConfig};
pub use dnssec::{TrustAnchorStore, UnverifiedReason};
pub use error::{DnsError, Result};
pub use message::{
    DnsMessage, Edns, Opcode, Question, Record, RecordClass, RecordData, RecordType, ResponseCode,
};
pub use name::DnsName;
pub use resolver::{DnsClient, ResolvedMessage};
pub use rrset::RrSet;
pub use transport::{DnsDataSource, UdpTcpDataSource};
