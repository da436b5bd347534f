//! The Chat Node: terminates client WebSocket connections, authenticates
//! them, and routes each Active-mode command per spec §4.1.

use std::sync::Arc;
use std::sync::OnceLock;

use async_trait::async_trait;
use chat_presence::{split_jid, ChatHandle, ExchangeHandle};
use dashmap::DashMap;
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::auth::Authenticator;
use crate::command::{self, Command};
use crate::session::ClientSession;
use crate::transport::ClientTransport;

type ClientStream = SplitStream<WebSocketStream<TcpStream>>;

/// Local client gateway. Owns the session table (`username -> transport`)
/// and the one-time-wired back-reference to its Exchange Node.
pub struct ChatNode {
    server_name: String,
    authenticator: Arc<dyn Authenticator>,
    sessions: DashMap<String, Arc<ClientSession>>,
    exchange: OnceLock<Arc<dyn ExchangeHandle>>,
}

impl ChatNode {
    pub fn new(server_name: impl Into<String>, authenticator: Arc<dyn Authenticator>) -> Arc<Self> {
        Arc::new(Self {
            server_name: server_name.into(),
            authenticator,
            sessions: DashMap::new(),
            exchange: OnceLock::new(),
        })
    }

    /// Wire the back-reference to the Exchange Node. Must be called once,
    /// before any connection is served.
    pub fn set_exchange_handle(&self, handle: Arc<dyn ExchangeHandle>) {
        self.exchange.set(handle).ok();
    }

    fn exchange(&self) -> &Arc<dyn ExchangeHandle> {
        self.exchange.get().expect("exchange handle must be wired before serving connections")
    }

    fn local_jid(&self, username: &str) -> String {
        chat_presence::make_jid(username, &self.server_name)
    }

    /// Accept and run one client connection to completion.
    pub async fn handle_connection(self: &Arc<Self>, stream: TcpStream) {
        let ws = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(err) => {
                tracing::warn!(error = %err, "client websocket handshake failed");
                return;
            }
        };
        let (sink, mut reader) = ws.split();
        let transport = Arc::new(ClientTransport::new(sink));

        let Some((username, public_key)) = self.authenticate(&transport, &mut reader).await else {
            transport.close().await;
            return;
        };

        let session = Arc::new(ClientSession { username: username.clone(), public_key: public_key.clone(), transport });
        self.sessions.insert(username.clone(), session.clone());
        tracing::info!(%username, "client authenticated");

        self.exchange().update_presence("LOCAL", &username, &username, &public_key).await;
        self.broadcast_excluding(&username, &format!("{username} has joined the chat.\n")).await;

        self.run_active_loop(&session, &mut reader).await;
        self.disconnect(&session).await;
    }

    async fn authenticate(&self, transport: &Arc<ClientTransport>, reader: &mut ClientStream) -> Option<(String, String)> {
        transport.send("Enter your username: ").await.ok()?;
        let username = next_text(reader).await?.trim().to_string();

        transport.send("Enter your password: ").await.ok()?;
        let password = next_text(reader).await?.trim().to_string();

        if self.sessions.contains_key(&username) {
            tracing::warn!(%username, "duplicate login attempt");
            let _ = transport.send("Authentication failed: username already logged in").await;
            return None;
        }

        match self.authenticator.verify(&username, &password).await {
            Ok(true) => {}
            Ok(false) => {
                let _ = transport.send("Authentication failed").await;
                return None;
            }
            Err(err) => {
                tracing::warn!(%username, error = %err, "credential store read failed");
                let _ = transport.send("Authentication failed").await;
                return None;
            }
        }

        transport.send("Authentication successful").await.ok()?;
        let public_key = next_text(reader).await?;
        Some((username, public_key))
    }

    async fn run_active_loop(self: &Arc<Self>, session: &Arc<ClientSession>, reader: &mut ClientStream) {
        loop {
            let frame = match reader.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    tracing::debug!(error = %err, username = %session.username, "client read error");
                    break;
                }
            };

            match command::parse(&frame) {
                None => {}
                Some(Command::Exit) => break,
                Some(Command::Direct { target_user, target_site, payload }) => {
                    self.dispatch_direct(session, target_user, target_site, payload).await;
                }
                Some(Command::File { target_user, target_site, filename, ciphertext }) => {
                    self.dispatch_file(session, target_user, target_site, filename, ciphertext).await;
                }
                Some(Command::FileInvalid) => {
                    let _ = session.transport.send("Invalid FILE command").await;
                }
                Some(Command::Broadcast(payload)) => {
                    self.dispatch_broadcast(session, payload).await;
                }
            }

            if session.transport.is_closed() {
                break;
            }
        }
    }

    async fn dispatch_direct(self: &Arc<Self>, session: &Arc<ClientSession>, target_user: String, target_site: Option<String>, payload: String) {
        let sender_jid = self.local_jid(&session.username);
        match target_site {
            Some(site) if site != self.server_name => {
                self.exchange().send_message_to_server(&sender_jid, &site, &target_user, &payload).await;
            }
            _ => {
                self.send_message_to_client(&payload, &sender_jid, &target_user).await;
            }
        }
    }

    async fn dispatch_file(self: &Arc<Self>, session: &Arc<ClientSession>, target_user: String, target_site: String, filename: String, ciphertext: String) {
        let sender_jid = self.local_jid(&session.username);
        if target_site == self.server_name {
            self.handle_file_transfer(&sender_jid, &target_user, &filename, &ciphertext).await;
        } else {
            self.exchange().send_file_to_server(&sender_jid, &target_site, &target_user, &filename, &ciphertext).await;
        }
    }

    async fn dispatch_broadcast(self: &Arc<Self>, session: &Arc<ClientSession>, payload: String) {
        let text = format!("{}: {}", session.username, payload);
        self.broadcast_excluding(&session.username, &text).await;
        let sender_jid = self.local_jid(&session.username);
        self.exchange().broadcast_message(&sender_jid, &payload).await;
    }

    /// Fan `text` out to every local client except `excluded_username`.
    /// Failures are isolated per recipient (§7/§8 fan-out isolation).
    async fn broadcast_excluding(self: &Arc<Self>, excluded_username: &str, text: &str) {
        let recipients: Vec<Arc<ClientSession>> =
            self.sessions.iter().filter(|entry| entry.key() != excluded_username).map(|entry| entry.value().clone()).collect();
        for recipient in recipients {
            if recipient.transport.send(text).await.is_err() {
                self.disconnect(&recipient).await;
            }
        }
    }

    /// Idempotent session teardown: removes the session, notifies the
    /// Exchange Node so presence is retracted, and announces departure to
    /// the remaining local clients. Safe to call more than once for the
    /// same session (a concurrent fan-out failure and the read loop ending
    /// can both observe the same dead transport).
    async fn disconnect(self: &Arc<Self>, session: &Arc<ClientSession>) {
        session.transport.close().await;
        if self.sessions.remove(&session.username).is_none() {
            return;
        }
        tracing::info!(username = %session.username, "client disconnected");
        let jid = self.local_jid(&session.username);
        self.exchange().remove_presence("LOCAL", &jid).await;
        self.broadcast_excluding(&session.username, &format!("{} has left the chat.", session.username)).await;
    }
}

#[async_trait]
impl ChatHandle for ChatNode {
    async fn send_message_to_client(&self, payload: &str, sender_jid: &str, local_user: &str) {
        if let Some(session) = self.sessions.get(local_user) {
            let text = format!("@{sender_jid} to {local_user}: {payload}");
            if session.transport.send(text).await.is_err() {
                let session = session.value().clone();
                drop(self.sessions.remove(local_user));
                session.transport.close().await;
            }
            return;
        }
        // §7: reply only if the miss was reported by a live local client;
        // a peer-originated miss (sender on another site) is dropped silently.
        self.reply_not_found_if_local_sender(sender_jid, local_user).await;
    }

    async fn send_message_to_all_clients(&self, payload: &str, sender_jid: &str) {
        let text = format!("BROADCAST from {sender_jid}: {payload}");
        let recipients: Vec<Arc<ClientSession>> = self.sessions.iter().map(|entry| entry.value().clone()).collect();
        for recipient in recipients {
            if recipient.transport.send(&text).await.is_err() {
                drop(self.sessions.remove(&recipient.username));
                recipient.transport.close().await;
            }
        }
    }

    async fn handle_file_transfer(&self, sender_jid: &str, local_user: &str, filename: &str, ciphertext: &str) {
        if let Some(session) = self.sessions.get(local_user) {
            let text = format!("FILE {sender_jid} {ciphertext} {filename}");
            if session.transport.send(text).await.is_err() {
                let session = session.value().clone();
                drop(self.sessions.remove(local_user));
                session.transport.close().await;
            }
            return;
        }
        self.reply_not_found_if_local_sender(sender_jid, local_user).await;
    }

    async fn broadcast_presence(&self, presence_envelope_text: &str) {
        let recipients: Vec<Arc<ClientSession>> = self.sessions.iter().map(|entry| entry.value().clone()).collect();
        for recipient in recipients {
            if recipient.transport.send(presence_envelope_text).await.is_err() {
                drop(self.sessions.remove(&recipient.username));
                recipient.transport.close().await;
            }
        }
    }
}

impl ChatNode {
    async fn reply_not_found_if_local_sender(&self, sender_jid: &str, target_user: &str) {
        let Some((sender_user, sender_site)) = split_jid(sender_jid) else { return };
        if sender_site != self.server_name {
            tracing::warn!(%target_user, %sender_jid, "dropping peer-originated miss for unknown local user");
            return;
        }
        if let Some(sender_session) = self.sessions.get(sender_user) {
            let _ = sender_session.transport.send(format!("User {target_user} not found.")).await;
        }
    }
}

async fn next_text(reader: &mut ClientStream) -> Option<String> {
    loop {
        match reader.next().await? {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}
