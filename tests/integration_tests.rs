//! End-to-end scenarios against the public API.

use comet_dict::types::{KEY_CLIENTS, KEY_SYNCED, KEY_UNSUBSCRIBE};
use comet_dict::{Config, Hooks, Message, Server};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct TestServer {
    _dir: tempfile::TempDir,
    server: Server,
}

fn server_with(hooks: Hooks, receive_ms: u64, client_ms: u64) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::new(dir.path());
    config.receive_timeout = Duration::from_millis(receive_ms);
    config.client_timeout = Duration::from_millis(client_ms);
    let server = Server::new(&config, hooks).unwrap();
    TestServer { _dir: dir, server }
}

fn quick_server() -> TestServer {
    server_with(Hooks::new(), 300, 60_000)
}

fn parse(payload: &[u8]) -> Vec<Message> {
    serde_json::from_slice(payload).unwrap()
}

async fn next_batch(server: &Server, client: &str) -> Vec<Message> {
    let payload = server
        .push
        .receive(client)
        .await
        .unwrap()
        .expect("expected a queued batch");
    parse(&payload)
}

#[tokio::test]
async fn test_basic_pub_sub() {
    let t = quick_server();
    t.server.push.connect("a");
    t.server.push.connect("b");
    t.server.store.subscribe("b", "d1").unwrap();
    t.server.store.subscribe("a", "d1").unwrap();

    // Drain both replays and b's join notice for a.
    assert!(!next_batch(&t.server, "b").await.is_empty());
    assert!(!next_batch(&t.server, "a").await.is_empty());
    assert_eq!(next_batch(&t.server, "b").await[0].key, "_subscribe");

    let batch = serde_json::to_string(&vec![Message::create("d1", "k1", "v1", "ver1")]).unwrap();
    t.server.store.messages("a", &batch).unwrap();

    let got = next_batch(&t.server, "b").await;
    assert_eq!(got, vec![Message::create("d1", "k1", "v1", "ver1")]);
}

#[tokio::test]
async fn test_replay_lists_state_then_clients_then_synced() {
    let t = quick_server();
    t.server.store.create("d1", "k1", "v1", "ver1").unwrap();

    t.server.push.connect("c");
    t.server.store.subscribe("c", "d1").unwrap();

    let replay = next_batch(&t.server, "c").await;
    assert_eq!(replay.len(), 3);
    assert_eq!(replay[0], Message::create("d1", "k1", "v1", "ver1"));
    assert_eq!(replay[1].key, KEY_CLIENTS);
    assert_eq!(replay[1].value.as_deref(), Some(r#"["c"]"#));
    assert_eq!(replay[2].key, KEY_SYNCED);
    assert_eq!(replay[2].value.as_deref(), Some("true"));
}

#[tokio::test]
async fn test_version_collision_keeps_first_writer() {
    let (collision_tx, mut collision_rx) = tokio::sync::mpsc::unbounded_channel();
    let hooks = Hooks::new().on_collision(move |msg: &Message| {
        let _ = collision_tx.send(msg.clone());
    });
    let t = server_with(hooks, 300, 60_000);

    t.server.store.create("d1", "k1", "v1", "ver1").unwrap();
    t.server.push.connect("a");
    t.server.push.connect("b");

    let fresh =
        serde_json::to_string(&vec![Message::update("d1", "k1", "v2", "ver1", "ver2")]).unwrap();
    t.server.store.messages("a", &fresh).unwrap();
    let stale =
        serde_json::to_string(&vec![Message::update("d1", "k1", "v3", "ver1", "ver3")]).unwrap();
    t.server.store.messages("b", &stale).unwrap();

    let collided = collision_rx.recv().await.unwrap();
    assert_eq!(collided.value.as_deref(), Some("v3"));

    // A late subscriber observes the surviving state (v2, ver2).
    t.server.push.connect("c");
    t.server.store.subscribe("c", "d1").unwrap();
    let replay = next_batch(&t.server, "c").await;
    assert_eq!(replay[0], Message::create("d1", "k1", "v2", "ver2"));
}

#[tokio::test]
async fn test_receive_times_out_near_deadline() {
    let t = server_with(Hooks::new(), 500, 60_000);
    t.server.push.connect("c");

    let started = Instant::now();
    let got = t.server.push.receive("c").await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(got, None);
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_millis(700), "{elapsed:?}");
    assert!(t.server.push.present("c"));
}

#[tokio::test]
async fn test_silent_client_is_implicitly_disconnected() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let hooks = Hooks::new().on_disconnect(move |id| {
        let _ = tx.send(id.to_string());
    });
    let t = server_with(hooks, 50, 150);

    t.server.push.connect("quiet");
    // Never calls receive; the watchdog fires after ~client_timeout.
    let gone = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(gone, "quiet");
    assert!(!t.server.push.present("quiet"));
}

#[tokio::test]
async fn test_lost_recipient_cascades_unsubscribe_notice() {
    let t = quick_server();
    t.server.push.connect("a");
    t.server.push.connect("b");
    t.server.store.subscribe("a", "d1").unwrap();
    t.server.store.subscribe("b", "d1").unwrap();
    assert!(!next_batch(&t.server, "a").await.is_empty()); // replay
    assert!(!next_batch(&t.server, "a").await.is_empty()); // b joined
    assert!(!next_batch(&t.server, "b").await.is_empty()); // replay

    // Destroy b's push record out from under the domain. Disconnect also
    // enqueues an unsubscribe, so drain that notice first.
    t.server.push.disconnect("b");
    let notice = next_batch(&t.server, "a").await;
    assert_eq!(notice[0].key, KEY_UNSUBSCRIBE);
    assert_eq!(notice[0].value.as_deref(), Some("b"));

    t.server.push.connect("sender");
    let batch = serde_json::to_string(&vec![Message::create("d1", "k1", "v1", "ver1")]).unwrap();
    t.server.store.messages("sender", &batch).unwrap();

    let got = next_batch(&t.server, "a").await;
    assert_eq!(got[0].key, "k1");
}

#[tokio::test]
async fn test_round_trip_server_create_then_subscribe() {
    let t = quick_server();
    t.server.store.create("d1", "k1", "v1", "ver1").unwrap();

    t.server.push.connect("c");
    t.server.store.subscribe("c", "d1").unwrap();

    let replay = next_batch(&t.server, "c").await;
    assert_eq!(replay[0], Message::create("d1", "k1", "v1", "ver1"));
    assert_eq!(replay.last().unwrap().key, KEY_SYNCED);
}

#[tokio::test]
async fn test_domains_are_isolated() {
    let t = quick_server();
    t.server.push.connect("c1");
    t.server.push.connect("c2");
    t.server.store.subscribe("c1", "d1").unwrap();
    t.server.store.subscribe("c2", "d2").unwrap();
    assert!(!next_batch(&t.server, "c1").await.is_empty());
    assert!(!next_batch(&t.server, "c2").await.is_empty());

    t.server.store.create("d1", "k1", "v1", "ver1").unwrap();
    t.server.store.create("d2", "k2", "v2", "ver1").unwrap();

    let got1 = next_batch(&t.server, "c1").await;
    assert_eq!(got1[0].domain, "d1");
    assert_eq!(t.server.push.receive("c1").await.unwrap(), None);

    let got2 = next_batch(&t.server, "c2").await;
    assert_eq!(got2[0].domain, "d2");
    assert_eq!(t.server.push.receive("c2").await.unwrap(), None);
}

#[tokio::test]
async fn test_ephemeral_keys_broadcast_but_not_replayed() {
    let t = quick_server();
    t.server.push.connect("a");
    t.server.push.connect("b");
    t.server.store.subscribe("b", "d1").unwrap();
    assert!(!next_batch(&t.server, "b").await.is_empty());

    let batch =
        serde_json::to_string(&vec![Message::create("d1", "%cursor", "14", "ver1")]).unwrap();
    t.server.store.messages("a", &batch).unwrap();

    let got = next_batch(&t.server, "b").await;
    assert_eq!(got[0].key, "%cursor");

    // A later subscriber sees no trace of the ephemeral key.
    t.server.push.connect("late");
    t.server.store.subscribe("late", "d1").unwrap();
    let replay = next_batch(&t.server, "late").await;
    assert_eq!(replay.len(), 2); // just _clients and _synced
    assert_eq!(replay[0].key, KEY_CLIENTS);
}

#[tokio::test]
async fn test_disconnect_twice_matches_disconnect_once() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let hooks = Hooks::new().on_disconnect(move |id| {
        let _ = tx.send(id.to_string());
    });
    let t = server_with(hooks, 300, 60_000);

    t.server.push.connect("c");
    t.server.push.disconnect("c");
    t.server.push.disconnect("c");

    assert_eq!(rx.recv().await.unwrap(), "c");
    assert!(rx.try_recv().is_err());
    assert!(!t.server.push.present("c"));
}

#[tokio::test]
async fn test_shutdown_drains_workers() {
    let t = quick_server();
    t.server.push.connect("c");
    t.server.store.subscribe("c", "d1").unwrap();
    assert!(!next_batch(&t.server, "c").await.is_empty());

    t.server.store.create("d1", "k1", "v1", "ver1").unwrap();
    t.server.shutdown().await;

    // The mutation enqueued before shutdown was applied and persisted.
    let t2 = Server::new(
        &{
            let mut config = Config::new(t._dir.path());
            config.receive_timeout = Duration::from_millis(300);
            config
        },
        Hooks::new(),
    )
    .unwrap();
    t2.push.connect("c2");
    t2.store.subscribe("c2", "d1").unwrap();
    let replay = {
        let payload = t2.push.receive("c2").await.unwrap().unwrap();
        parse(&payload)
    };
    assert_eq!(replay[0], Message::create("d1", "k1", "v1", "ver1"));
}

#[tokio::test]
async fn test_many_clients_fan_out() {
    let t = quick_server();
    let push = &t.server.push;

    for i in 0..10 {
        push.connect(&format!("c{i}"));
        t.server.store.subscribe(&format!("c{i}"), "d1").unwrap();
    }
    // Drain replays and join notices.
    for i in 0..10 {
        let id = format!("c{i}");
        loop {
            match t.server.push.receive(&id).await.unwrap() {
                Some(_) => continue,
                None => break,
            }
        }
    }

    t.server.store.create("d1", "k1", "v1", "ver1").unwrap();

    let mut delivered = 0;
    for i in 0..10 {
        let got = next_batch(&t.server, &format!("c{i}")).await;
        assert_eq!(got[0].key, "k1");
        delivered += 1;
    }
    assert_eq!(delivered, 10);
}

#[tokio::test]
async fn test_flush_through_server() {
    let t = server_with(Hooks::new(), 5_000, 60_000);
    t.server.push.connect("c");

    let push = Arc::clone(&t.server.push);
    let parked = tokio::spawn(async move { push.receive("c").await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    t.server.push.flush("c").unwrap();

    let got = tokio::time::timeout(Duration::from_millis(500), parked)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(got, None);
}
