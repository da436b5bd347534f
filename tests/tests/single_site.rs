
use common::{expect_presence_frame, login, login_expect_rejection, recv_text, send_line, start_site};

#[tokio::test]
async fn direct_message_between_two_local_clients() {
    let site = start_site("s4", &[("alice", "pw1"), ("bob", "pw2")], vec![]).await;

    let mut alice = login(site.chat_addr, "alice", "pw1", "PEM-ALICE").await;
    expect_presence_frame(&mut alice).await; // alice's own join

    let mut bob = login(site.chat_addr, "bob", "pw2", "PEM-BOB").await;
    expect_presence_frame(&mut alice).await; // bob's join updates the directory
    assert_eq!(recv_text(&mut alice).await, "bob has joined the chat.\n");
    expect_presence_frame(&mut bob).await;

    send_line(&mut alice, "@bob hello there").await;
    assert_eq!(recv_text(&mut bob).await, "@alice@s4 to bob: hello there");
}

#[tokio::test]
async fn file_transfer_is_delivered_to_a_local_recipient() {
    let site = start_site("s4", &[("alice", "pw1"), ("bob", "pw2")], vec![]).await;

    let mut alice = login(site.chat_addr, "alice", "pw1", "PEM-A").await;
    expect_presence_frame(&mut alice).await;
    let mut bob = login(site.chat_addr, "bob", "pw2", "PEM-B").await;
    expect_presence_frame(&mut alice).await;
    assert_eq!(recv_text(&mut alice).await, "bob has joined the chat.\n");
    expect_presence_frame(&mut bob).await;

    send_line(&mut alice, "FILE bob@s4 notes.txt Y2lwaGVydGV4dA==").await;
    assert_eq!(recv_text(&mut bob).await, "FILE alice@s4 Y2lwaGVydGV4dA== notes.txt");
}

#[tokio::test]
async fn file_command_missing_its_site_qualifier_is_rejected() {
    let site = start_site("s4", &[("alice", "pw1")], vec![]).await;
    let mut alice = login(site.chat_addr, "alice", "pw1", "PEM-A").await;
    expect_presence_frame(&mut alice).await;

    send_line(&mut alice, "FILE bob notes.txt Y2lwaGVydGV4dA==").await;
    assert_eq!(recv_text(&mut alice).await, "Invalid FILE command");
}

#[tokio::test]
async fn unknown_local_target_gets_not_found_reply() {
    let site = start_site("s4", &[("alice", "pw1")], vec![]).await;
    let mut alice = login(site.chat_addr, "alice", "pw1", "PEM-ALICE").await;
    expect_presence_frame(&mut alice).await;

    send_line(&mut alice, "@ghost hi").await;
    assert_eq!(recv_text(&mut alice).await, "User ghost not found.");
}

#[tokio::test]
async fn duplicate_login_is_rejected_while_first_session_stays_live() {
    let site = start_site("s4", &[("alice", "pw1"), ("bob", "pw2")], vec![]).await;
    let mut alice = login(site.chat_addr, "alice", "pw1", "PEM-1").await;
    expect_presence_frame(&mut alice).await;

    let rejection = login_expect_rejection(site.chat_addr, "alice", "pw1").await;
    assert_eq!(rejection, "Authentication failed: username already logged in");

    let mut bob = login(site.chat_addr, "bob", "pw2", "PEM-2").await;
    expect_presence_frame(&mut alice).await;
    assert_eq!(recv_text(&mut alice).await, "bob has joined the chat.\n");
    expect_presence_frame(&mut bob).await;

    send_line(&mut alice, "still kicking").await;
    assert_eq!(recv_text(&mut bob).await, "alice: still kicking");
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let site = start_site("s4", &[("alice", "pw1")], vec![]).await;
    let rejection = login_expect_rejection(site.chat_addr, "alice", "not-the-password").await;
    assert_eq!(rejection, "Authentication failed");
}

#[tokio::test]
async fn broadcast_fans_out_to_every_other_local_client_but_not_the_sender() {
    let site = start_site("s4", &[("alice", "pw1"), ("bob", "pw2"), ("carl", "pw3")], vec![]).await;

    let mut alice = login(site.chat_addr, "alice", "pw1", "PEM-A").await;
    expect_presence_frame(&mut alice).await;

    let mut bob = login(site.chat_addr, "bob", "pw2", "PEM-B").await;
    expect_presence_frame(&mut alice).await;
    assert_eq!(recv_text(&mut alice).await, "bob has joined the chat.\n");
    expect_presence_frame(&mut bob).await;

    let mut carl = login(site.chat_addr, "carl", "pw3", "PEM-C").await;
    expect_presence_frame(&mut alice).await;
    assert_eq!(recv_text(&mut alice).await, "carl has joined the chat.\n");
    expect_presence_frame(&mut bob).await;
    assert_eq!(recv_text(&mut bob).await, "carl has joined the chat.\n");
    expect_presence_frame(&mut carl).await;

    send_line(&mut bob, "hi everyone").await;
    assert_eq!(recv_text(&mut alice).await, "bob: hi everyone");
    assert_eq!(recv_text(&mut carl).await, "bob: hi everyone");
}

#[tokio::test]
async fn exit_disconnects_and_announces_departure() {
    let site = start_site("s4", &[("alice", "pw1"), ("bob", "pw2")], vec![]).await;
    let mut alice = login(site.chat_addr, "alice", "pw1", "PEM-A").await;
    expect_presence_frame(&mut alice).await;

    let mut bob = login(site.chat_addr, "bob", "pw2", "PEM-B").await;
    expect_presence_frame(&mut alice).await;
    assert_eq!(recv_text(&mut alice).await, "bob has joined the chat.\n");
    expect_presence_frame(&mut bob).await;

    send_line(&mut bob, "EXIT").await;
    expect_presence_frame(&mut alice).await;
    assert_eq!(recv_text(&mut alice).await, "bob has left the chat.");
}
