//! The Exchange Node: peer lifecycle, the presence directory, envelope
//! dispatch/routing, and the per-peer outbound dialer loop (spec §4.2).

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::OnceLock;

use async_trait::async_trait;
use chat_presence::{make_jid, split_jid, ChatHandle, Envelope, EnvelopeError, ExchangeHandle, Presence, PresenceDirectory, LOCAL};
use dashmap::DashMap;
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::ExchangeError;
use crate::peer::PeerLink;
use crate::transport::PeerTransport;

const DIAL_RETRY: Duration = Duration::from_secs(10);

type PeerReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Federation node. Owns the peer table, the shared presence directory,
/// and the one-time-wired back-reference to its Chat Node.
pub struct ExchangeNode {
    site_name: String,
    peers: DashMap<String, Arc<PeerLink>>,
    directory: Arc<PresenceDirectory>,
    chat: OnceLock<Arc<dyn ChatHandle>>,
}

impl ExchangeNode {
    pub fn new(site_name: impl Into<String>, directory: Arc<PresenceDirectory>, peers: Vec<(String, String, u16)>) -> Arc<Self> {
        let table = DashMap::new();
        for (name, host, port) in peers {
            table.insert(name.clone(), Arc::new(PeerLink::new(name, host, port)));
        }
        Arc::new(Self { site_name: site_name.into(), peers: table, directory, chat: OnceLock::new() })
    }

    /// Wire the back-reference to the Chat Node. Must be called once,
    /// before any connection is served.
    pub fn set_chat_handle(&self, handle: Arc<dyn ChatHandle>) {
        self.chat.set(handle).ok();
    }

    fn chat(&self) -> &Arc<dyn ChatHandle> {
        self.chat.get().expect("chat handle must be wired before serving connections")
    }

    /// Accept one inbound peer connection. The peer is identified by its
    /// source address; unknown hosts are closed immediately.
    pub async fn handle_inbound(self: &Arc<Self>, stream: TcpStream, peer_addr: IpAddr) {
        let Some(link) = self.find_peer_by_host(&peer_addr.to_string()) else {
            let err = ExchangeError::UnknownPeer(peer_addr);
            tracing::warn!(error = %err, "rejecting inbound connection from unconfigured host");
            return;
        };

        let ws = match tokio_tungstenite::accept_async(MaybeTlsStream::Plain(stream)).await {
            Ok(ws) => ws,
            Err(err) => {
                tracing::warn!(error = %err, peer = %link.name, "peer websocket handshake failed");
                return;
            }
        };
        let (sink, reader) = ws.split();
        let transport = Arc::new(PeerTransport::new(sink));
        link.set_inbound(transport.clone()).await;
        tracing::info!(peer = %link.name, "inbound peer link established");

        self.run_link_loop(&link, reader, &transport).await;
        link.clear_inbound().await;
    }

    fn find_peer_by_host(&self, host: &str) -> Option<Arc<PeerLink>> {
        self.peers.iter().find(|entry| entry.value().host == host).map(|entry| entry.value().clone())
    }

    /// Spawn the outbound dialer loop for one configured peer. Intended to
    /// be `tokio::spawn`ed once per peer at process startup; the returned
    /// future runs until the process shuts down.
    pub async fn spawn_dialer(self: Arc<Self>, peer_name: String) {
        loop {
            let Some(link) = self.peers.get(&peer_name).map(|e| e.value().clone()) else { return };
            if !link.is_reachable().await {
                match tokio_tungstenite::connect_async(format!("ws://{}:{}", link.host, link.port)).await {
                    Ok((ws, _)) => {
                        let (sink, reader) = ws.split();
                        let transport = Arc::new(PeerTransport::new(sink));
                        link.set_outbound(transport.clone()).await;
                        tracing::info!(peer = %peer_name, "outbound peer link established");
                        let _ = transport.send(Envelope::Attendance.to_frame()).await;

                        self.run_link_loop(&link, reader, &transport).await;
                        link.clear_outbound().await;
                    }
                    Err(err) => {
                        let err = ExchangeError::from(err);
                        tracing::debug!(peer = %peer_name, error = %err, "dial failed, will retry");
                    }
                }
            }
            tokio::time::sleep(DIAL_RETRY).await;
        }
    }

    /// Read and dispatch envelopes from one transport until it closes.
    /// `transport` is the same slot `link` just registered under
    /// (`inbound` or `outbound`) - `check`/`attendance` replies go back on
    /// it directly rather than through `link.preferred()`, since the peer
    /// expects its reply on the transport it sent the request on.
    async fn run_link_loop(self: &Arc<Self>, link: &Arc<PeerLink>, mut reader: PeerReader, transport: &Arc<PeerTransport>) {
        loop {
            let frame = match reader.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    tracing::debug!(error = %err, peer = %link.name, "peer read error");
                    break;
                }
            };

            match Envelope::from_frame(&frame) {
                Ok(envelope) => self.dispatch_envelope(link, transport, envelope).await,
                Err(EnvelopeError::Malformed(err)) => {
                    tracing::warn!(peer = %link.name, error = %err, "malformed envelope, dropping");
                }
            }
        }
    }

    async fn dispatch_envelope(self: &Arc<Self>, link: &Arc<PeerLink>, transport: &Arc<PeerTransport>, envelope: Envelope) {
        match envelope {
            Envelope::Check => {
                let _ = transport.send(Envelope::Checked.to_frame()).await;
            }
            Envelope::Checked => {}
            Envelope::Attendance => {
                let presences = self.directory.local_view();
                let _ = transport.send(Envelope::presence(presences).to_frame()).await;
            }
            Envelope::Presence { presence } => {
                self.update_group_presence(&link.name, presence).await;
            }
            Envelope::Message { from, to, info } => {
                self.route_message(&from, &to, &info).await;
            }
            Envelope::File { from, to, filename, info } => {
                self.route_file(&from, &to, &filename, &info).await;
            }
        }
    }

    async fn route_message(&self, from: &str, to: &str, info: &str) {
        if from.is_empty() || to.is_empty() || info.is_empty() {
            let err = ExchangeError::Routing("message envelope with empty from/to/info".to_string());
            tracing::warn!(error = %err);
            return;
        }
        if to == "public" {
            self.chat().send_message_to_all_clients(info, from).await;
            return;
        }
        let Some((user, site)) = split_jid(to) else {
            let err = ExchangeError::Routing(format!("malformed target jid: {to}"));
            tracing::warn!(error = %err);
            return;
        };
        if site != self.site_name {
            let err = ExchangeError::Routing(format!("message addressed to foreign site {site}: {to}"));
            tracing::warn!(error = %err);
            return;
        }
        if self.directory.get(LOCAL, to).is_some() {
            self.chat().send_message_to_client(info, from, user).await;
        } else {
            let err = ExchangeError::Routing(format!("unknown local user: {to}"));
            tracing::warn!(error = %err);
        }
    }

    async fn route_file(&self, from: &str, to: &str, filename: &str, info: &str) {
        if from.is_empty() || to.is_empty() || info.is_empty() {
            let err = ExchangeError::Routing("file envelope with empty from/to/info".to_string());
            tracing::warn!(error = %err);
            return;
        }
        let Some((user, site)) = split_jid(to) else {
            let err = ExchangeError::Routing(format!("malformed target jid: {to}"));
            tracing::warn!(error = %err);
            return;
        };
        if site != self.site_name {
            let err = ExchangeError::Routing(format!("file addressed to foreign site {site}: {to}"));
            tracing::warn!(error = %err);
            return;
        }
        if self.directory.get(LOCAL, to).is_none() {
            let err = ExchangeError::Routing(format!("unknown local user: {to}"));
            tracing::warn!(error = %err);
            return;
        }
        let filename = if filename.is_empty() { format!("{}.tmp", uuid::Uuid::new_v4()) } else { filename.to_string() };
        self.chat().handle_file_transfer(from, user, &filename, info).await;
    }

    async fn update_group_presence(&self, peer_name: &str, presences: Vec<Presence>) {
        self.directory.replace_bucket(peer_name, presences);
        self.chat().broadcast_presence(&Envelope::presence(self.directory.flatten()).to_frame()).await;
    }

    /// Fan `envelope` out to every connected peer on its preferred
    /// transport. A send failure resets that peer's outbound transport so
    /// the dialer loop reconnects; other peers are unaffected.
    async fn broadcast_to_peers(&self, envelope: &Envelope) {
        let frame = envelope.to_frame();
        let links: Vec<Arc<PeerLink>> = self.peers.iter().map(|entry| entry.value().clone()).collect();
        for link in links {
            if let Some(transport) = link.preferred().await {
                if transport.send(frame.clone()).await.is_err() {
                    link.clear_outbound().await;
                }
            }
        }
    }
}

#[async_trait]
impl ExchangeHandle for ExchangeNode {
    async fn send_message_to_server(&self, sender_jid: &str, target_site: &str, target_user: &str, payload: &str) {
        let Some(link) = self.peers.get(target_site).map(|e| e.value().clone()) else {
            tracing::warn!(%target_site, "no peer link configured for target site");
            return;
        };
        let Some(transport) = link.preferred().await else {
            tracing::warn!(%target_site, "no live transport to target site, dropping message");
            return;
        };
        let to = make_jid(target_user, target_site);
        let envelope = Envelope::message(sender_jid, to, payload);
        if transport.send(envelope.to_frame()).await.is_err() {
            link.clear_outbound().await;
        }
    }

    async fn send_file_to_server(&self, sender_jid: &str, target_site: &str, target_user: &str, filename: &str, ciphertext: &str) {
        let Some(link) = self.peers.get(target_site).map(|e| e.value().clone()) else {
            tracing::warn!(%target_site, "no peer link configured for target site");
            return;
        };
        let Some(transport) = link.preferred().await else {
            tracing::warn!(%target_site, "no live transport to target site, dropping file");
            return;
        };
        let to = make_jid(target_user, target_site);
        let envelope = Envelope::file(sender_jid, to, filename, ciphertext);
        if transport.send(envelope.to_frame()).await.is_err() {
            link.clear_outbound().await;
        }
    }

    async fn broadcast_message(&self, sender_jid: &str, payload: &str) {
        let envelope = Envelope::broadcast(sender_jid, payload);
        self.broadcast_to_peers(&envelope).await;
    }

    async fn update_presence(&self, site: &str, jid: &str, nickname: &str, public_key: &str) {
        let jid = if site == LOCAL { make_jid(jid, &self.site_name) } else { jid.to_string() };
        self.directory.insert(site, Presence::new(nickname, jid, public_key));

        self.chat().broadcast_presence(&Envelope::presence(self.directory.flatten()).to_frame()).await;
        if site == LOCAL {
            self.broadcast_to_peers(&Envelope::presence(self.directory.local_view())).await;
        }
    }

    async fn remove_presence(&self, site: &str, jid: &str) {
        self.directory.remove(site, jid);

        self.chat().broadcast_presence(&Envelope::presence(self.directory.flatten()).to_frame()).await;
        if site == LOCAL {
            self.broadcast_to_peers(&Envelope::presence(self.directory.local_view())).await;
        }
    }
}
