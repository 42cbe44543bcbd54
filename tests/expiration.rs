//! End-to-end expiration scenarios driven through the public server API.

use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stratakv::{Config, KvStore, ServerEntry, StoreMode, ValueType};

const TICK: Duration = Duration::from_millis(30);

fn quick_config(shards: u32) -> Config {
    Config::default()
        .with_shard_count(shards)
        .with_pause(TICK)
}

/// Poll `cond` every 10ms until it holds or `timeout` elapses.
fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

fn insert_expired(store: &Arc<KvStore>, name: &str) {
    let past = store.current_time() - 1000;
    store
        .set(
            0,
            Bytes::from(name.as_bytes().to_vec()),
            Bytes::from_static(b"v"),
            ValueType::String,
            Some(past),
        )
        .unwrap();
}

/// Generate `per_shard` key names routed to each shard of the server.
fn keys_per_shard(server: &ServerEntry, per_shard: usize) -> Vec<Vec<String>> {
    let segment = &server.context().segment;
    let mut buckets: Vec<Vec<String>> = (0..server.store_count()).map(|_| Vec::new()).collect();
    let mut i = 0u32;
    while buckets.iter().any(|b| b.len() < per_shard) {
        let name = format!("key:{i}");
        let shard = segment.shard_for_key(name.as_bytes()) as usize;
        if buckets[shard].len() < per_shard {
            buckets[shard].push(name);
        }
        i += 1;
    }
    buckets
}

#[test]
fn basic_expiration_drains_every_key() {
    let config = quick_config(1).with_scan_batch(4).with_del_batch(4);
    let server = ServerEntry::startup(config).unwrap();
    let store = server.store(0).unwrap().clone();

    for i in 0..10 {
        insert_expired(&store, &format!("key:{i}"));
    }

    assert!(wait_until(Duration::from_secs(5), || store.key_count() == 0));
    assert!(wait_until(Duration::from_secs(5), || {
        server.expire().total_enqueue() == 10 && server.expire().total_dequeue() == 10
    }));
    server.stop();
}

#[test]
fn resume_cursor_never_reenqueues_entries() {
    // Seven expired entries scanned three at a time: the resume cursor walks
    // the index without revisiting, so exactly seven enqueues happen.
    let config = quick_config(1).with_scan_batch(3).with_del_batch(3);
    let server = ServerEntry::startup(config).unwrap();
    let store = server.store(0).unwrap().clone();

    for name in ["a", "b", "c", "d", "e", "f", "g"] {
        insert_expired(&store, name);
    }

    assert!(wait_until(Duration::from_secs(5), || store.key_count() == 0));
    // Settle a few more ticks; totals must not move past the entry count.
    std::thread::sleep(TICK * 3);
    assert_eq!(server.expire().total_enqueue(), 7);
    assert_eq!(server.expire().total_dequeue(), 7);
    server.stop();
}

#[test]
fn replicate_only_shards_keep_their_keys() {
    let server = ServerEntry::startup(quick_config(2)).unwrap();
    let replica = server.store(1).unwrap().clone();
    server
        .set_store_mode(&replica, StoreMode::ReplicateOnly)
        .unwrap();

    let buckets = keys_per_shard(&server, 5);
    let writable = server.store(0).unwrap().clone();
    for name in &buckets[0] {
        insert_expired(&writable, name);
    }
    for name in &buckets[1] {
        insert_expired(&replica, name);
    }

    // The writable shard drains; the replica is never scanned.
    assert!(wait_until(Duration::from_secs(5), || {
        server.store(0).unwrap().key_count() == 0
    }));
    std::thread::sleep(TICK * 5);
    assert_eq!(replica.key_count(), 5);
    assert_eq!(server.expire().total_dequeue(), 5);
    server.stop();
}

#[test]
fn stop_store_halts_expiration_for_the_shard() {
    // Small delete batches so the backlog outlives the first few ticks.
    let config = quick_config(1).with_scan_batch(1000).with_del_batch(2);
    let server = ServerEntry::startup(config).unwrap();
    let store = server.store(0).unwrap().clone();

    for i in 0..200 {
        insert_expired(&store, &format!("key:{i}"));
    }

    // Let the pipeline start moving, then disable the shard mid-flight.
    assert!(wait_until(Duration::from_secs(5), || {
        server.expire().total_dequeue() > 0
    }));
    server.expire().stop_store(0).unwrap();

    // In-flight jobs settle and nothing else is deleted afterwards.
    assert!(wait_until(Duration::from_secs(5), || {
        server.expire().scan_in_flight(0) == 0 && server.expire().del_in_flight(0) == 0
    }));
    let survivors = store.key_count();
    assert!(survivors > 0, "expiration kept running on a disabled shard");
    std::thread::sleep(TICK * 10);
    assert_eq!(store.key_count(), survivors);
    server.stop();
}

#[test]
fn migration_defers_expiration_until_finished() {
    let config = quick_config(1).with_cluster_enabled(true);
    let server = ServerEntry::startup(config).unwrap();
    let store = server.store(0).unwrap().clone();

    let task = server.context().migrate.register_task(0);
    for i in 0..5 {
        insert_expired(&store, &format!("key:{i}"));
    }

    // Many ticks with a live migrate task: nothing is enqueued.
    std::thread::sleep(TICK * 10);
    assert_eq!(server.expire().total_enqueue(), 0);
    assert_eq!(store.key_count(), 5);

    server.context().migrate.finish_task(task);
    assert!(wait_until(Duration::from_secs(5), || store.key_count() == 0));
    server.stop();
}

#[test]
fn stop_joins_every_engine_thread() {
    let server = ServerEntry::startup(quick_config(4)).unwrap();
    let buckets = keys_per_shard(&server, 5);
    for (shard, names) in buckets.iter().enumerate() {
        let store = server.store(shard as u32).unwrap().clone();
        for name in names {
            insert_expired(&store, name);
        }
    }
    let store = server.store(0).unwrap().clone();

    assert!(server.is_running());
    server.stop();
    assert!(!server.is_running());
    assert!(!server.expire().is_running());

    // Stopping again is a harmless no-op.
    server.stop();
    // Stores are closed; no writes are accepted after shutdown.
    assert!(store
        .set(0, Bytes::from_static(b"late"), Bytes::from_static(b"v"), ValueType::String, None)
        .is_err());
}
