#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;

use async_trait::async_trait;
use parking_lot::Mutex;

use mimir::{DnsDataSource, DnsError, DnsMessage, Question, Result};

/// Route resolver tracing through the test harness; `RUST_LOG` controls the
/// level as usual.
pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A scripted network: responses keyed by (server, question). Unknown pairs
/// time out, which the resolver treats as a transient failure.
#[derive(Default)]
pub struct MockDataSource {
    responses: Mutex<HashMap<(SocketAddr, Question), DnsMessage>>,
    log: Mutex<Vec<(SocketAddr, Question)>>,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, server: SocketAddr, question: Question, response: DnsMessage) {
        self.responses.lock().insert((server, question), response);
    }

    pub fn queries_to(&self, server: SocketAddr) -> usize {
        self.log.lock().iter().filter(|(s, _)| *s == server).count()
    }

    pub fn query_count(&self) -> usize {
        self.log.lock().len()
    }
}

#[async_trait]
impl DnsDataSource for MockDataSource {
    async fn query(&self, message: &DnsMessage, server: SocketAddr) -> Result<DnsMessage> {
        let question = message
            .question()
            .cloned()
            .ok_or_else(|| DnsError::Io("query without question".to_string()))?;
        self.log.lock().push((server, question.clone()));

        match self.responses.lock().get(&(server, question)) {
            Some(scripted) => {
                let mut response = scripted.clone();
                response.id = message.id;
                response.qr = true;
                Ok(response)
            }
            None => Err(DnsError::Timeout(server)),
        }
    }
}
