//! Lookup path: cold miss, warm hit, negative caching.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use flowmeta_snmp::{MockPoller, SnmpConfig, SnmpResolver, SystemClock};

fn ip(addr: &str) -> IpAddr {
    addr.parse().unwrap()
}

fn resolver(config: SnmpConfig, poller: Arc<MockPoller>) -> SnmpResolver {
    SnmpResolver::new(config, Arc::new(SystemClock), poller).unwrap()
}

#[tokio::test]
async fn test_cold_lookup_then_warm_lookup() {
    let poller = Arc::new(MockPoller::new());
    let resolver = resolver(SnmpConfig::default(), poller.clone());

    // Nothing cached yet: both lookups miss and trigger background polls.
    assert!(resolver.lookup(Utc::now(), ip("127.0.0.1"), 765).is_none());
    assert!(resolver.lookup(Utc::now(), ip("127.0.0.1"), 999).is_none());

    tokio::time::sleep(Duration::from_millis(150)).await;

    let found = resolver.lookup(Utc::now(), ip("127.0.0.1"), 765).unwrap();
    assert_eq!(found.exporter_name, "127_0_0_1");
    assert_eq!(found.interface.name, "Gi0/0/765");
    assert_eq!(found.interface.description, "Interface 765");
    assert_eq!(found.interface.speed, 1000);

    // The exporter answered but does not know ifIndex 999: negative
    // record with the exporter name only.
    let unknown = resolver.lookup(Utc::now(), ip("127.0.0.1"), 999).unwrap();
    assert_eq!(unknown.exporter_name, "127_0_0_1");
    assert!(unknown.interface.is_empty());

    let metrics = resolver.metrics();
    assert_eq!(metrics.cache_miss.get(), 2);
    assert_eq!(metrics.cache_hit.get(), 2);
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_ipv4_and_mapped_ipv6_share_entries() {
    let poller = Arc::new(MockPoller::new());
    let resolver = resolver(SnmpConfig::default(), poller.clone());

    assert!(resolver.lookup(Utc::now(), ip("127.0.0.1"), 765).is_none());
    tokio::time::sleep(Duration::from_millis(150)).await;

    // The mapped form hits the entry created through the plain form.
    let found = resolver
        .lookup(Utc::now(), ip("::ffff:127.0.0.1"), 765)
        .unwrap();
    assert_eq!(found.exporter_name, "127_0_0_1");
    assert_eq!(poller.poll_count(), 1);
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_lookup_does_not_wait_for_slow_poller() {
    let poller = Arc::new(MockPoller::new().with_delay(Duration::from_millis(300)));
    let resolver = resolver(SnmpConfig::default(), poller.clone());

    let start = std::time::Instant::now();
    assert!(resolver.lookup(Utc::now(), ip("127.0.0.1"), 765).is_none());
    assert!(resolver.lookup(Utc::now(), ip("127.0.0.1"), 766).is_none());
    // Both lookups return without waiting out the poller delay.
    assert!(start.elapsed() < Duration::from_millis(200));
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_start_stop_with_multiple_workers() {
    let poller = Arc::new(MockPoller::new());
    let config = SnmpConfig {
        workers: 5,
        ..SnmpConfig::default()
    };
    let resolver = resolver(config, poller.clone());

    for if_index in [1, 2, 3, 4, 5] {
        resolver.lookup(Utc::now(), ip("192.0.2.1"), if_index);
    }
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(resolver.lookup(Utc::now(), ip("192.0.2.1"), 1).is_some());
    resolver.shutdown().await;
}
