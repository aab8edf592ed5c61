//! Failover across candidate routers
//!
//! Candidates are attempted strictly sequentially in a deterministic order:
//! descending priority, ties in original descriptor order. Network failures
//! advance the loop; anything else (bad credentials, protocol mismatch)
//! aborts it immediately so a misconfiguration is never masked as "all
//! routers unreachable".

use crate::client::{ConnectTarget, RouterCandidate, Routing, SessionSettings, TlsMaterial};
use crate::{Error, Result};
use std::time::Duration;
use tracing::{info, warn};

/// Opens a transport to one endpoint.
///
/// This is the seam between the connection layer and the wire protocol:
/// implementations dial the endpoint, perform whatever handshake they own
/// (including TLS) and classify failures as network
/// ([`Error::is_network`]) or fatal. The classification drives the
/// failover loop.
#[allow(async_fn_in_trait)]
pub trait TransportOpener {
    /// Opened transport handle
    type Handle;

    /// Open a transport to `target`, observing `timeout` for the dial.
    async fn open(
        &self,
        target: &ConnectTarget,
        tls: Option<&TlsMaterial>,
        timeout: Duration,
    ) -> Result<Self::Handle>;
}

/// A successfully opened transport plus the endpoint that won, for
/// diagnostics by the caller.
#[derive(Debug)]
pub struct Connected<H> {
    /// The opened transport
    pub handle: H,
    /// The candidate that succeeded
    pub target: ConnectTarget,
}

/// Candidates in attempt order: stable sort by descending priority, so
/// equal priorities keep their original relative order. The order depends
/// only on the input list, never on any unordered intermediate structure.
fn ordered_candidates(routers: &[RouterCandidate]) -> Vec<&RouterCandidate> {
    let mut candidates: Vec<&RouterCandidate> = routers.iter().collect();
    candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
    candidates
}

/// Establish a transport-level session against the settings' endpoint(s).
///
/// A single endpoint is attempted once, propagating whatever the opener
/// reports. A router list is walked in priority order; when every candidate
/// fails with a network-classified error the result is
/// [`Error::Exhausted`] (code 4001) carrying the per-candidate causes.
///
/// Configuration errors (codes 4000, 4007) are raised before any network
/// activity.
pub async fn connect<O: TransportOpener>(
    settings: &SessionSettings,
    opener: &O,
    timeout: Duration,
) -> Result<Connected<O::Handle>> {
    settings.validate()?;

    let routers = match &settings.routing {
        Routing::Single(target) => {
            let handle = opener.open(target, settings.tls.as_ref(), timeout).await?;
            info!(endpoint = %target, "session transport opened");
            return Ok(Connected {
                handle,
                target: target.clone(),
            });
        }
        Routing::Routers(routers) => routers,
    };

    let candidates = ordered_candidates(routers);
    let mut failures = Vec::with_capacity(candidates.len());

    for candidate in &candidates {
        let target = candidate.target();
        match opener.open(&target, settings.tls.as_ref(), timeout).await {
            Ok(handle) => {
                info!(endpoint = %target, "session transport opened");
                return Ok(Connected { handle, target });
            }
            Err(err) if err.is_network() => {
                warn!(endpoint = %target, error = %err, "router unreachable, trying next");
                failures.push(format!("{}: {}", target, err));
            }
            // Reached the server but it rejected us: retrying other routers
            // would only hide the real problem.
            Err(err) => return Err(err),
        }
    }

    Err(Error::Exhausted {
        attempts: candidates.len(),
        failures,
    })
}
