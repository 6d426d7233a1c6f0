//! End-to-end protocol tests: each spins up a real server bound to an
//! ephemeral port and drives it with `linecached-client`, the way
//! `Shopify-async-memcached`'s `tests/integration_tests.rs` drives a live
//! memcached. Every test gets its own server instance, so there is no
//! shared-key interference between tests running concurrently.

use linecached_client::Client;
use linecached_server::config::Config;
use linecached_server::server;
use tokio::net::TcpListener;

async fn spawn_server(mut cfg: Config) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local_addr");
    cfg.server_address = addr.to_string();
    tokio::spawn(async move {
        let _ = server::serve(listener, cfg).await;
    });
    addr
}

fn test_config() -> Config {
    Config {
        cache_max_size_mb: 8,
        cache_max_item_size: 64 * 1024,
        idle_timeout_secs: 5,
        max_connections: 16,
        ..Config::default()
    }
}

// Scenario A: set then get round-trips the stored value and flags.
#[tokio::test]
async fn set_then_get_round_trips_value_and_flags() {
    let addr = spawn_server(test_config()).await;
    let mut client = Client::connect(addr).await.expect("connect");

    client.set("alpha", 7, 0, b"hello world").await.expect("set");

    let items = client.get(&["alpha"]).await.expect("get");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].key, "alpha");
    assert_eq!(items[0].flags, 7);
    assert_eq!(&items[0].value[..], b"hello world");
}

// Scenario: a miss on `get` yields no VALUE line, just END.
#[tokio::test]
async fn get_on_missing_key_returns_empty() {
    let addr = spawn_server(test_config()).await;
    let mut client = Client::connect(addr).await.expect("connect");

    let items = client.get(&["does-not-exist"]).await.expect("get");
    assert!(items.is_empty());
}

// Scenario: `gets` attaches a CAS token that `get` omits.
#[tokio::test]
async fn gets_attaches_a_cas_token() {
    let addr = spawn_server(test_config()).await;
    let mut client = Client::connect(addr).await.expect("connect");

    client.set("beta", 0, 0, b"v1").await.expect("set");

    let plain = client.get(&["beta"]).await.expect("get");
    assert_eq!(plain[0].cas, None);

    let with_cas = client.gets(&["beta"]).await.expect("gets");
    assert!(with_cas[0].cas.is_some());
}

// Scenario: multi-key get preserves request order and drops misses in place.
#[tokio::test]
async fn multi_get_preserves_order_and_skips_misses() {
    let addr = spawn_server(test_config()).await;
    let mut client = Client::connect(addr).await.expect("connect");

    client.set("k1", 0, 0, b"one").await.expect("set k1");
    client.set("k3", 0, 0, b"three").await.expect("set k3");

    let items = client.get(&["k1", "k2", "k3"]).await.expect("get");
    let keys: Vec<&str> = items.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, vec!["k1", "k3"]);
}

// Scenario B: delete reports DELETED for a present key, NOT_FOUND otherwise.
#[tokio::test]
async fn delete_reports_hit_and_miss() {
    let addr = spawn_server(test_config()).await;
    let mut client = Client::connect(addr).await.expect("connect");

    client.set("gamma", 0, 0, b"bye").await.expect("set");
    assert!(client.delete("gamma").await.expect("delete hit"));
    assert!(!client.delete("gamma").await.expect("delete miss"));

    let items = client.get(&["gamma"]).await.expect("get after delete");
    assert!(items.is_empty());
}

// Scenario C: flush_all with no delay clears the whole keyspace immediately.
#[tokio::test]
async fn flush_all_clears_keyspace() {
    let addr = spawn_server(test_config()).await;
    let mut client = Client::connect(addr).await.expect("connect");

    client.set("one", 0, 0, b"1").await.expect("set one");
    client.set("two", 0, 0, b"2").await.expect("set two");

    client.flush_all().await.expect("flush_all");

    let items = client.get(&["one", "two"]).await.expect("get after flush");
    assert!(items.is_empty());
}

// Scenario: cache_memlimit accepts a new ceiling and stats reflects it.
#[tokio::test]
async fn cache_memlimit_updates_limit_maxbytes() {
    let addr = spawn_server(test_config()).await;
    let mut client = Client::connect(addr).await.expect("connect");

    client.cache_memlimit(32).await.expect("cache_memlimit");

    let stats = client.stats().await.expect("stats");
    assert_eq!(stats.get("limit_maxbytes").map(String::as_str), Some("33554432"));
}

// Scenario D: stats enumerates the full field set, not a subset.
#[tokio::test]
async fn stats_reports_the_full_field_set() {
    let addr = spawn_server(test_config()).await;
    let mut client = Client::connect(addr).await.expect("connect");

    client.set("tracked", 0, 0, b"x").await.expect("set");
    client.get(&["tracked"]).await.expect("get");
    client.get(&["missing"]).await.expect("get miss");

    let stats = client.stats().await.expect("stats");
    for field in [
        "pid",
        "uptime",
        "time",
        "version",
        "rusage_user",
        "rusage_system",
        "curr_connections",
        "cmd_get",
        "cmd_set",
        "get_hits",
        "get_misses",
        "bytes",
        "limit_maxbytes",
        "curr_items",
        "total_items",
        "evictions",
    ] {
        assert!(stats.contains_key(field), "missing stat field {field}");
    }
    assert_eq!(stats.get("cmd_set").map(String::as_str), Some("1"));
    assert_eq!(stats.get("get_hits").map(String::as_str), Some("1"));
    assert_eq!(stats.get("get_misses").map(String::as_str), Some("1"));
}

// Scenario: version reports the crate's own version string.
#[tokio::test]
async fn version_reports_crate_version() {
    let addr = spawn_server(test_config()).await;
    let mut client = Client::connect(addr).await.expect("connect");

    let version = client.version().await.expect("version");
    assert_eq!(version, env!("CARGO_PKG_VERSION"));
}

// Scenario E: an oversized set is rejected before its payload is consumed,
// and the connection stays alive for the next command.
#[tokio::test]
async fn oversized_set_is_rejected_without_desyncing_the_connection() {
    let mut cfg = test_config();
    cfg.cache_max_item_size = 16;
    let addr = spawn_server(cfg).await;
    let mut client = Client::connect(addr).await.expect("connect");

    let big = vec![b'x'; 1024];
    let result = client.set("too-big", 0, 0, &big).await;
    assert!(result.is_err(), "oversized set should be rejected");

    // the connection must still be usable afterwards
    client.set("fits", 0, 0, b"ok").await.expect("set after rejection");
    let items = client.get(&["fits"]).await.expect("get after rejection");
    assert_eq!(&items[0].value[..], b"ok");
}

// Scenario F: quit closes the connection without a reply.
#[tokio::test]
async fn quit_closes_without_a_reply() {
    let addr = spawn_server(test_config()).await;
    let client = Client::connect(addr).await.expect("connect");
    client.quit().await.expect("quit should not error");
}

// The connection cap rejects new connections once the limit is reached,
// counting them separately from ordinary accepted connections.
#[tokio::test]
async fn connections_beyond_the_cap_are_rejected() {
    let mut cfg = test_config();
    cfg.max_connections = 1;
    let addr = spawn_server(cfg).await;

    let _held = Client::connect(addr).await.expect("first connection accepted");

    let mut second = Client::connect(addr).await.expect("tcp connect succeeds");
    let result = second.version().await;
    assert!(result.is_err(), "second connection should be rejected at the cap");
}
