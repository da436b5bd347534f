
use std::time::Duration;

use common::{expect_presence_frame, login, recv_text, reserve_port, send_line, spawn_dialer, start_site_on};

/// Reserve both sites' listener ports up front so each site's peer table
/// can name the other's real address, then wire the two sites.
async fn federated_pair() -> (common::Site, common::Site) {
    let (a_chat, _) = reserve_port().await;
    let (a_exchange, a_exchange_addr) = reserve_port().await;
    let (b_chat, _) = reserve_port().await;
    let (b_exchange, b_exchange_addr) = reserve_port().await;

    let site_a = start_site_on(
        "s4",
        &[("alice", "pw1")],
        vec![("s5".to_string(), b_exchange_addr.ip().to_string(), b_exchange_addr.port())],
        a_chat,
        a_exchange,
    )
    .await;
    let site_b = start_site_on(
        "s5",
        &[("bob", "pw2")],
        vec![("s4".to_string(), a_exchange_addr.ip().to_string(), a_exchange_addr.port())],
        b_chat,
        b_exchange,
    )
    .await;

    spawn_dialer(&site_a, "s5");
    tokio::time::sleep(Duration::from_millis(200)).await;

    (site_a, site_b)
}

#[tokio::test]
async fn direct_message_crosses_sites_once_the_peer_link_is_up() {
    let (site_a, site_b) = federated_pair().await;

    let mut alice = login(site_a.chat_addr, "alice", "pw1", "PEM-A").await;
    expect_presence_frame(&mut alice).await;
    let mut bob = login(site_b.chat_addr, "bob", "pw2", "PEM-B").await;
    expect_presence_frame(&mut bob).await;

    send_line(&mut alice, "@bob@s5 ping across the mesh").await;
    assert_eq!(recv_text(&mut bob).await, "@alice@s4 to bob: ping across the mesh");
}

#[tokio::test]
async fn broadcast_message_reaches_the_remote_site() {
    let (site_a, site_b) = federated_pair().await;

    let mut alice = login(site_a.chat_addr, "alice", "pw1", "PEM-A").await;
    expect_presence_frame(&mut alice).await;
    let mut bob = login(site_b.chat_addr, "bob", "pw2", "PEM-B").await;
    expect_presence_frame(&mut bob).await;

    send_line(&mut alice, "hello federation").await;
    assert_eq!(recv_text(&mut bob).await, "BROADCAST from alice@s4: hello federation");
}

#[tokio::test]
async fn presence_propagates_to_the_remote_site_on_join() {
    let (site_a, site_b) = federated_pair().await;

    let mut bob = login(site_b.chat_addr, "bob", "pw2", "PEM-B").await;
    expect_presence_frame(&mut bob).await;

    let mut alice = login(site_a.chat_addr, "alice", "pw1", "PEM-A").await;
    expect_presence_frame(&mut alice).await;

    // Bob's directory gains alice@s4 once the LOCAL presence fans out
    // across the peer link and s5 rebroadcasts its flattened view.
    let frame = recv_text(&mut bob).await;
    assert!(frame.contains("\"tag\":\"presence\""));
    assert!(frame.contains("alice@s4"));
}

#[tokio::test]
async fn peer_link_recovers_after_outage() {
    let (site_a, site_b) = federated_pair().await;

    let mut alice = login(site_a.chat_addr, "alice", "pw1", "PEM-A").await;
    expect_presence_frame(&mut alice).await;
    let mut bob = login(site_b.chat_addr, "bob", "pw2", "PEM-B").await;
    expect_presence_frame(&mut bob).await;

    send_line(&mut alice, "@bob@s5 before the outage").await;
    assert_eq!(recv_text(&mut bob).await, "@alice@s4 to bob: before the outage");

    common::bounce_exchange_listener(&site_b).await;

    // spawn_dialer retries every 10s; give it room to notice the dead
    // link, redial the fresh listener, and exchange attendance/presence
    // again.
    tokio::time::sleep(Duration::from_secs(11)).await;

    // The redialed link sends attendance immediately; s5's presence reply
    // fans out to alice, proving the exchange resumed rather than just
    // the raw transport.
    expect_presence_frame(&mut alice).await;

    send_line(&mut alice, "@bob@s5 after the outage").await;
    assert_eq!(recv_text(&mut bob).await, "@alice@s4 to bob: after the outage");
}

#[tokio::test]
async fn unreachable_peer_drops_the_message_without_blocking_the_sender() {
    let (chat_listener, _) = reserve_port().await;
    let (exchange_listener, _) = reserve_port().await;
    let site = start_site_on(
        "s4",
        &[("alice", "pw1")],
        vec![("s5".to_string(), "127.0.0.1".to_string(), 1)],
        chat_listener,
        exchange_listener,
    )
    .await;

    let mut alice = login(site.chat_addr, "alice", "pw1", "PEM-A").await;
    expect_presence_frame(&mut alice).await;

    send_line(&mut alice, "@bob@s5 are you there").await;
    // No live transport to s5: the Exchange Node drops the envelope
    // silently (spec: no queuing). Confirm the sender's own session is
    // unaffected by sending a local command that does get a reply.
    send_line(&mut alice, "@ghost hi").await;
    assert_eq!(recv_text(&mut alice).await, "User ghost not found.");
}
