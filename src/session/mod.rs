//! Root/dependent session hierarchy
//!
//! A [`Session`] owns the transport and a registry of dependents bound to
//! it. Closing or breaking the root closes every dependent in the same
//! call; a dependent failing or closing never touches the root or its
//! siblings.

use crate::client::SessionSettings;
use crate::connection::{self, NetOpener, Transport, TransportOpener};
use crate::{ConnectTarget, Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default dial timeout per endpoint for [`Session::connect`].
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Liveness registry shared by a root and its dependents.
///
/// Each dependent holds its own flag; the root holds the map, so cascading
/// closure is one pass over the map under one lock.
#[derive(Debug)]
struct Registry {
    open: bool,
    next_id: u64,
    dependents: HashMap<u64, Arc<AtomicBool>>,
}

impl Registry {
    fn new() -> Self {
        Self {
            open: true,
            next_id: 0,
            dependents: HashMap::new(),
        }
    }

    // Binding and closing both happen under the registry lock, so a close
    // racing a bind can never produce a dependent orphaned from a closed
    // root.
    fn bind(&mut self) -> Result<(u64, Arc<AtomicBool>)> {
        if !self.open {
            return Err(Error::SessionState("session is closed".to_string()));
        }
        let id = self.next_id;
        self.next_id += 1;
        let flag = Arc::new(AtomicBool::new(true));
        self.dependents.insert(id, Arc::clone(&flag));
        Ok((id, flag))
    }

    fn close_all(&mut self) -> usize {
        self.open = false;
        let closed = self
            .dependents
            .values()
            .filter(|flag| flag.swap(false, Ordering::SeqCst))
            .count();
        self.dependents.clear();
        closed
    }
}

/// A root session: an open transport plus the registry of dependents
/// bound to it.
///
/// The handle type is generic so that the hierarchy can be exercised
/// without touching the network; production code uses
/// [`Session::connect`], which fixes it to [`Transport`].
#[derive(Debug)]
pub struct Session<H = Transport> {
    settings: Arc<SessionSettings>,
    target: ConnectTarget,
    handle: Mutex<Option<H>>,
    registry: Arc<Mutex<Registry>>,
}

impl Session<Transport> {
    /// Parse `descriptor` and connect, failing over across routers when the
    /// descriptor names more than one.
    ///
    /// Uses [`DEFAULT_CONNECT_TIMEOUT`] per endpoint.
    pub async fn connect(descriptor: &str) -> Result<Self> {
        let settings = SessionSettings::parse(descriptor)?;
        Self::connect_with(settings, &NetOpener, DEFAULT_CONNECT_TIMEOUT).await
    }
}

impl<H> Session<H> {
    /// Connect with an explicit opener and per-endpoint dial timeout.
    pub async fn connect_with<O>(
        settings: SessionSettings,
        opener: &O,
        timeout: Duration,
    ) -> Result<Self>
    where
        O: TransportOpener<Handle = H>,
    {
        let connected = connection::connect(&settings, opener, timeout).await?;
        Ok(Self {
            settings: Arc::new(settings),
            target: connected.target,
            handle: Mutex::new(Some(connected.handle)),
            registry: Arc::new(Mutex::new(Registry::new())),
        })
    }

    /// The settings this session was established from.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// The endpoint this session is connected to.
    pub fn target(&self) -> &ConnectTarget {
        &self.target
    }

    /// Whether the session is still open.
    pub fn is_open(&self) -> bool {
        self.registry.lock().unwrap().open
    }

    /// Error out when the session is closed. The check has no side effects.
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::SessionState("session is closed".to_string()))
        }
    }

    /// Run `f` against the transport handle.
    pub fn with_handle<R>(&self, f: impl FnOnce(&mut H) -> R) -> Result<R> {
        let mut guard = self.handle.lock().unwrap();
        match guard.as_mut() {
            Some(handle) => Ok(f(handle)),
            None => Err(Error::SessionState("session is closed".to_string())),
        }
    }

    /// Bind a new dependent session to this root.
    ///
    /// The dependent shares the root's settings and reports open until it
    /// is closed, fails, or the root goes away.
    pub fn bind_dependent(&self) -> Result<DependentSession> {
        let (id, open) = self.registry.lock().unwrap().bind()?;
        debug!(dependent = id, "dependent session bound");
        Ok(DependentSession {
            id,
            settings: Arc::clone(&self.settings),
            open,
            registry: Arc::clone(&self.registry),
        })
    }

    /// Number of dependents currently bound and open.
    pub fn dependent_count(&self) -> usize {
        self.registry.lock().unwrap().dependents.len()
    }

    /// Close the session and every dependent bound to it.
    ///
    /// Dropping the handle closes the underlying transport. Idempotent:
    /// closing a closed session does nothing.
    pub fn close(&self) {
        let closed = {
            let mut registry = self.registry.lock().unwrap();
            if !registry.open {
                return;
            }
            registry.close_all()
        };
        drop(self.handle.lock().unwrap().take());
        info!(endpoint = %self.target, dependents = closed, "session closed");
    }

    /// Record the session as broken after an unrecoverable transport
    /// failure. Same cascade as [`close`](Self::close), logged louder.
    pub fn mark_broken(&self, reason: &str) {
        if self.is_open() {
            warn!(endpoint = %self.target, reason, "session broken");
        }
        self.close();
    }
}

impl<H> Drop for Session<H> {
    fn drop(&mut self) {
        self.close();
    }
}

/// A session bound to a root [`Session`].
///
/// Lives at most as long as its root stays open; its own closure or
/// failure is isolated and never propagates upward or to siblings.
#[derive(Debug)]
pub struct DependentSession {
    id: u64,
    settings: Arc<SessionSettings>,
    open: Arc<AtomicBool>,
    registry: Arc<Mutex<Registry>>,
}

impl DependentSession {
    /// The settings shared with the root.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Whether this dependent is still open. Flips when either this
    /// dependent or its root closes.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Error out when the dependent is closed.
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::SessionState("dependent session is closed".to_string()))
        }
    }

    /// Close this dependent. The root and any sibling dependents are
    /// unaffected. Idempotent.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.registry.lock().unwrap().dependents.remove(&self.id);
            debug!(dependent = self.id, "dependent session closed");
        }
    }

    /// Record this dependent as broken. Isolation still holds: only this
    /// dependent closes.
    pub fn mark_broken(&self, reason: &str) {
        if self.is_open() {
            warn!(dependent = self.id, reason, "dependent session broken");
        }
        self.close();
    }
}

impl Drop for DependentSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{TlsMaterial, DEFAULT_PORT};
    use crate::connection::Connected;

    /// Opener that always succeeds with a unit handle.
    struct UnitOpener;

    impl TransportOpener for UnitOpener {
        type Handle = ();

        async fn open(
            &self,
            _target: &ConnectTarget,
            _tls: Option<&TlsMaterial>,
            _timeout: Duration,
        ) -> Result<()> {
            Ok(())
        }
    }

    async fn open_session() -> Session<()> {
        let settings = SessionSettings::single("localhost", DEFAULT_PORT);
        Session::connect_with(settings, &UnitOpener, Duration::from_secs(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_session_reports_winning_target() {
        let session = open_session().await;
        assert!(session.is_open());
        assert_eq!(
            *session.target(),
            ConnectTarget::Tcp {
                host: "localhost".to_string(),
                port: DEFAULT_PORT,
            }
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let session = open_session().await;
        session.close();
        assert!(!session.is_open());
        session.close();
        assert!(!session.is_open());
        assert!(matches!(
            session.ensure_open(),
            Err(Error::SessionState(_))
        ));
    }

    #[tokio::test]
    async fn test_root_close_cascades_to_dependents() {
        let session = open_session().await;
        let a = session.bind_dependent().unwrap();
        let b = session.bind_dependent().unwrap();
        assert!(a.is_open() && b.is_open());
        assert_eq!(session.dependent_count(), 2);

        session.close();
        assert!(!a.is_open());
        assert!(!b.is_open());
        assert_eq!(session.dependent_count(), 0);
    }

    #[tokio::test]
    async fn test_dependent_close_is_isolated() {
        let session = open_session().await;
        let a = session.bind_dependent().unwrap();
        let b = session.bind_dependent().unwrap();

        a.close();
        assert!(!a.is_open());
        assert!(b.is_open());
        assert!(session.is_open());
        assert_eq!(session.dependent_count(), 1);
    }

    #[tokio::test]
    async fn test_dependent_failure_is_isolated() {
        let session = open_session().await;
        let a = session.bind_dependent().unwrap();
        let b = session.bind_dependent().unwrap();

        a.mark_broken("read timed out");
        assert!(!a.is_open());
        assert!(b.is_open());
        assert!(session.is_open());
    }

    #[tokio::test]
    async fn test_root_break_cascades() {
        let session = open_session().await;
        let a = session.bind_dependent().unwrap();

        session.mark_broken("transport reset by peer");
        assert!(!session.is_open());
        assert!(!a.is_open());
    }

    #[tokio::test]
    async fn test_bind_on_closed_root_fails() {
        let session = open_session().await;
        session.close();
        assert!(matches!(
            session.bind_dependent(),
            Err(Error::SessionState(_))
        ));
    }

    #[tokio::test]
    async fn test_dependent_drop_unregisters() {
        let session = open_session().await;
        {
            let _a = session.bind_dependent().unwrap();
            assert_eq!(session.dependent_count(), 1);
        }
        assert_eq!(session.dependent_count(), 0);
    }

    #[tokio::test]
    async fn test_with_handle_after_close_errors() {
        let session = open_session().await;
        assert!(session.with_handle(|_| ()).is_ok());
        session.close();
        assert!(matches!(
            session.with_handle(|_| ()),
            Err(Error::SessionState(_))
        ));
    }

    #[test]
    fn test_connected_struct_is_constructible() {
        let connected = Connected {
            handle: (),
            target: ConnectTarget::Tcp {
                host: "localhost".to_string(),
                port: DEFAULT_PORT,
            },
        };
        assert_eq!(connected.target.to_string(), "localhost:33060");
    }
}
