//! Connection establishment
//!
//! This module turns validated [`SessionSettings`](crate::SessionSettings)
//! into an open transport:
//! * `failover` walks router candidates in priority order
//! * `transport` dials TCP/TLS/Unix endpoints
//! * `tls` compiles descriptor TLS material into a rustls config

mod failover;
mod tls;
mod transport;

pub use failover::{connect, Connected, TransportOpener};
pub use tls::{client_config, server_name};
pub use transport::{NetOpener, TcpVariant, Transport};
