use std::net::SocketAddr;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::{DnsError, Result};
use crate::message::{DnsMessage, ResponseCode};
use crate::transport::DnsDataSource;

/// Send a recursion-desired query to the candidate servers in order and
/// return the first acceptable response. Servers that turn out not to offer
/// recursion land on the blacklist and are skipped for the lifetime of the
/// client. Every failed candidate's error is kept so the aggregate error
/// explains the whole attempt.
pub(crate) async fn resolve<F>(
    data_source: &dyn DnsDataSource,
    candidates: &[SocketAddr],
    blacklist: &DashMap<SocketAddr, ()>,
    query: &DnsMessage,
    accept: F,
) -> Result<DnsMessage>
where
    F: Fn(&DnsMessage) -> std::result::Result<(), String>,
{
    let mut errors = Vec::new();

    for &server in candidates {
        if blacklist.contains_key(&server) {
            debug!(%server, "skipping blacklisted server");
            continue;
        }

        let response = match data_source.query(query, server).await {
            Ok(response) => response,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                debug!(%server, %err, "candidate failed");
                errors.push(err);
                continue;
            }
        };

        if !response.recursion_available {
            warn!(%server, "server does not offer recursion, blacklisting");
            blacklist.insert(server, ());
            errors.push(DnsError::Io(format!(
                "server {server} does not offer recursion"
            )));
            continue;
        }

        match response.rcode {
            ResponseCode::NoError | ResponseCode::NxDomain => {}
            other => {
                debug!(%server, rcode = other.to_u16(), "error response");
                errors.push(DnsError::ErrorResponse(other.to_u16()));
                continue;
            }
        }

        if let Err(reason) = accept(&response) {
            debug!(%server, reason, "response not acceptable");
            errors.push(DnsError::Io(reason));
            continue;
        }

        return Ok(response);
    }

    Err(DnsError::NoServersReached(errors))
}
