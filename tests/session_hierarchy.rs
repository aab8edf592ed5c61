//! Session hierarchy behavior through the public API

use mysqlx_connect::{
    ConnectTarget, Error, Session, SessionSettings, TlsMaterial, TransportOpener,
};
use std::time::Duration;
use tokio_test::assert_ok;

struct AlwaysAccept;

impl TransportOpener for AlwaysAccept {
    type Handle = u32;

    async fn open(
        &self,
        _target: &ConnectTarget,
        _tls: Option<&TlsMaterial>,
        _timeout: Duration,
    ) -> mysqlx_connect::Result<u32> {
        Ok(7)
    }
}

async fn open_root() -> Session<u32> {
    let settings = SessionSettings::parse("user:password@localhost").unwrap();
    Session::connect_with(settings, &AlwaysAccept, Duration::from_secs(1))
        .await
        .unwrap()
}

#[tokio::test]
async fn root_exposes_parsed_settings() {
    let root = open_root().await;
    assert_eq!(root.settings().user, "user");
    assert_eq!(root.settings().password, "password");
    assert_eq!(root.with_handle(|h| *h).unwrap(), 7);
}

#[tokio::test]
async fn dependents_share_root_settings() {
    let root = open_root().await;
    let dependent = root.bind_dependent().unwrap();
    assert_eq!(dependent.settings().user, "user");
    assert!(dependent.is_open());
    tokio_test::assert_ok!(dependent.ensure_open());
}

#[tokio::test]
async fn closing_root_closes_all_dependents() {
    let root = open_root().await;
    let a = root.bind_dependent().unwrap();
    let b = root.bind_dependent().unwrap();
    let c = root.bind_dependent().unwrap();

    root.close();

    for dependent in [&a, &b, &c] {
        assert!(!dependent.is_open());
        assert!(matches!(
            dependent.ensure_open(),
            Err(Error::SessionState(_))
        ));
    }
}

#[tokio::test]
async fn dependent_failure_never_propagates() {
    let root = open_root().await;
    let failing = root.bind_dependent().unwrap();
    let sibling = root.bind_dependent().unwrap();

    failing.mark_broken("server went away mid-statement");

    assert!(!failing.is_open());
    assert!(sibling.is_open());
    assert!(root.is_open());

    // The root can still hand out new dependents afterwards
    let fresh = tokio_test::assert_ok!(root.bind_dependent());
    assert!(fresh.is_open());
}

#[tokio::test]
async fn broken_root_cascades_like_close() {
    let root = open_root().await;
    let dependent = root.bind_dependent().unwrap();

    root.mark_broken("transport reset");

    assert!(!root.is_open());
    assert!(!dependent.is_open());
    assert!(matches!(root.bind_dependent(), Err(Error::SessionState(_))));
}

#[tokio::test]
async fn close_then_close_again_is_a_no_op() {
    let root = open_root().await;
    let dependent = root.bind_dependent().unwrap();

    root.close();
    root.close();
    dependent.close();
    dependent.close();

    assert!(!root.is_open());
    assert!(!dependent.is_open());
}
