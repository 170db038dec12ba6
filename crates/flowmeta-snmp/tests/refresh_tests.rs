//! Proactive refresh under a mocked clock.
//!
//! Mock-clock advances move cache time; short real sleeps after each
//! advance let the woken tasks drain before asserting.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use flowmeta_core::Clock;
use flowmeta_snmp::{MockClock, MockPoller, SnmpConfig, SnmpResolver};

fn ip(addr: &str) -> IpAddr {
    addr.parse().unwrap()
}

const MINUTE: Duration = Duration::from_secs(60);

async fn drain() {
    tokio::time::sleep(Duration::from_millis(120)).await;
}

#[tokio::test]
async fn test_auto_refresh_keeps_hot_entry_alive() {
    let clock = Arc::new(MockClock::new());
    let poller = Arc::new(MockPoller::new());
    let config = SnmpConfig {
        poller_coalesce: Duration::ZERO,
        ..SnmpConfig::default()
    };
    let resolver = SnmpResolver::new(config, clock.clone(), poller.clone()).unwrap();

    // Cold fetch at t=0.
    assert!(resolver.lookup(clock.now(), ip("127.0.0.1"), 765).is_none());
    drain().await;
    assert!(resolver.lookup(clock.now(), ip("127.0.0.1"), 765).is_some());

    // t=25 min: the scan refreshes the aging, in-use entry; the lookup
    // keeps it hot.
    clock.advance(25 * MINUTE);
    drain().await;
    assert!(resolver.lookup(clock.now(), ip("127.0.0.1"), 765).is_some());

    // t=50 min: same again. Without the refresh at t=25 the entry would
    // have expired at t=30.
    clock.advance(25 * MINUTE);
    drain().await;
    assert!(resolver.lookup(clock.now(), ip("127.0.0.1"), 765).is_some());

    // t=63 min: still served, still the same record.
    clock.advance(13 * MINUTE);
    drain().await;
    let found = resolver.lookup(clock.now(), ip("127.0.0.1"), 765).unwrap();
    assert_eq!(found.exporter_name, "127_0_0_1");
    assert_eq!(found.interface.name, "Gi0/0/765");
    assert_eq!(found.interface.speed, 1000);

    let metrics = resolver.metrics();
    assert_eq!(metrics.cache_miss.get(), 1);
    assert_eq!(metrics.cache_hit.get(), 4);
    assert_eq!(metrics.cache_refresh.get(), 2);
    assert_eq!(metrics.cache_expired.get(), 0);
    assert_eq!(metrics.cache_size.get(), 1);
    // One scan per advance past the two-minute deadline.
    assert_eq!(metrics.cache_refresh_runs.get(), 3);
    // Initial fetch plus two refresh polls.
    assert_eq!(poller.poll_count(), 3);
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_unused_entry_expires_instead_of_refreshing() {
    let clock = Arc::new(MockClock::new());
    let poller = Arc::new(MockPoller::new());
    let config = SnmpConfig {
        poller_coalesce: Duration::ZERO,
        ..SnmpConfig::default()
    };
    let resolver = SnmpResolver::new(config, clock.clone(), poller.clone()).unwrap();

    assert!(resolver.lookup(clock.now(), ip("127.0.0.1"), 765).is_none());
    drain().await;
    assert_eq!(resolver.cache_len(), 1);

    // Nobody touches the entry again. The t=26 scan finds it old enough
    // to refresh but out of use, so it is left to expire; the t=31 scan
    // evicts it.
    clock.advance(26 * MINUTE);
    drain().await;
    clock.advance(5 * MINUTE);
    drain().await;

    assert_eq!(resolver.cache_len(), 0);
    let metrics = resolver.metrics();
    assert_eq!(metrics.cache_refresh.get(), 0);
    assert_eq!(metrics.cache_expired.get(), 1);
    assert_eq!(poller.poll_count(), 1);
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_refresh_disabled_lets_hot_entries_expire() {
    let clock = Arc::new(MockClock::new());
    let poller = Arc::new(MockPoller::new());
    let config = SnmpConfig {
        cache_refresh: Duration::ZERO,
        poller_coalesce: Duration::ZERO,
        ..SnmpConfig::default()
    };
    let resolver = SnmpResolver::new(config, clock.clone(), poller.clone()).unwrap();

    assert!(resolver.lookup(clock.now(), ip("127.0.0.1"), 765).is_none());
    drain().await;

    // Keep it hot; without refreshing it still dies at t=30.
    clock.advance(25 * MINUTE);
    drain().await;
    assert!(resolver.lookup(clock.now(), ip("127.0.0.1"), 765).is_some());

    clock.advance(6 * MINUTE);
    drain().await;
    assert_eq!(resolver.cache_len(), 0);
    assert_eq!(resolver.metrics().cache_refresh.get(), 0);
    assert_eq!(resolver.metrics().cache_expired.get(), 1);
    resolver.shutdown().await;
}
