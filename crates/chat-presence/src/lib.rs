//! Presence directory and wire envelope types shared by the Chat Node and
//! Exchange Node.
//!
//! A [`PresenceDirectory`] is a two-level map `site -> jid -> Presence`. The
//! reserved bucket name [`LOCAL`] holds presences owned by this site; every
//! other key is the name of a configured remote peer. The directory itself
//! is a plain concurrent data structure - the broadcast side effects that
//! original spec ties to mutation (fan-out to peers/local clients) are the
//! Exchange Node's responsibility, not this crate's.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod capability;
pub use capability::{ChatHandle, ExchangeHandle};

/// Reserved bucket name for presences owned by this site.
pub const LOCAL: &str = "LOCAL";

/// A publicly advertised record indicating that `jid` is currently reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub nickname: String,
    pub jid: String,
    #[serde(rename = "publickey")]
    pub public_key: String,
}

impl Presence {
    pub fn new(nickname: impl Into<String>, jid: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            jid: jid.into(),
            public_key: public_key.into(),
        }
    }
}

/// `site -> jid -> Presence`.
#[derive(Debug, Default)]
pub struct PresenceDirectory {
    sites: DashMap<String, DashMap<String, Presence>>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a single presence in `site`'s bucket.
    pub fn insert(&self, site: &str, presence: Presence) {
        self.sites
            .entry(site.to_string())
            .or_default()
            .insert(presence.jid.clone(), presence);
    }

    /// Remove a single presence from `site`'s bucket, if present.
    pub fn remove(&self, site: &str, jid: &str) -> Option<Presence> {
        self.sites.get(site).and_then(|bucket| bucket.remove(jid).map(|(_, v)| v))
    }

    /// Wholesale replace `site`'s bucket with `presences` (used when
    /// applying an inbound `presence` envelope from that peer).
    pub fn replace_bucket(&self, site: &str, presences: Vec<Presence>) {
        let bucket = DashMap::new();
        for presence in presences {
            bucket.insert(presence.jid.clone(), presence);
        }
        self.sites.insert(site.to_string(), bucket);
    }

    /// Look up a single presence in `site`'s bucket by jid.
    pub fn get(&self, site: &str, jid: &str) -> Option<Presence> {
        self.sites.get(site).and_then(|bucket| bucket.get(jid).map(|entry| entry.value().clone()))
    }

    /// The presences currently held in [`LOCAL`].
    pub fn local_view(&self) -> Vec<Presence> {
        self.sites
            .get(LOCAL)
            .map(|bucket| bucket.iter().map(|entry| entry.value().clone()).collect())
            .unwrap_or_default()
    }

    /// The union over all sites' buckets. Each `jid` appears at most once
    /// because local jids are scoped by site name and remote buckets are
    /// keyed by the owning peer.
    pub fn flatten(&self) -> Vec<Presence> {
        self.sites
            .iter()
            .flat_map(|bucket| bucket.value().iter().map(|entry| entry.value().clone()).collect::<Vec<_>>())
            .collect()
    }
}

/// Errors surfaced when decoding a peer-transport text frame.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope json: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A peer-link text frame. One JSON object per frame, discriminated by the
/// `tag` field. Field `publickey` is spelled lowercase on the wire (see
/// [`Presence`]); everything else matches the Rust field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "lowercase")]
pub enum Envelope {
    Message { from: String, to: String, info: String },
    File {
        from: String,
        to: String,
        #[serde(default)]
        filename: String,
        info: String,
    },
    Presence { presence: Vec<Presence> },
    Attendance,
    Check,
    Checked,
}

impl Envelope {
    pub fn message(from: impl Into<String>, to: impl Into<String>, info: impl Into<String>) -> Self {
        Envelope::Message { from: from.into(), to: to.into(), info: info.into() }
    }

    pub fn broadcast(from: impl Into<String>, info: impl Into<String>) -> Self {
        Envelope::Message { from: from.into(), to: "public".to_string(), info: info.into() }
    }

    pub fn file(
        from: impl Into<String>,
        to: impl Into<String>,
        filename: impl Into<String>,
        info: impl Into<String>,
    ) -> Self {
        Envelope::File { from: from.into(), to: to.into(), filename: filename.into(), info: info.into() }
    }

    pub fn presence(presence: Vec<Presence>) -> Self {
        Envelope::Presence { presence }
    }

    /// Serialize as the single JSON text frame sent over the wire.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).expect("Envelope serialization is infallible")
    }

    /// Parse a single text frame. Unknown `tag` values and malformed JSON
    /// both surface as [`EnvelopeError`] - callers log and continue per
    /// the peer-protocol error taxonomy rather than treating this as fatal.
    pub fn from_frame(frame: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(frame)?)
    }
}

/// Split a jid of the form `<user>@<site>` into its parts.
pub fn split_jid(jid: &str) -> Option<(&str, &str)> {
    let mut parts = jid.splitn(2, '@');
    let user = parts.next()?;
    let site = parts.next()?;
    if user.is_empty() || site.is_empty() {
        return None;
    }
    Some((user, site))
}

/// Build a jid of the form `<user>@<site>`.
pub fn make_jid(user: &str, site: &str) -> String {
    format!("{user}@{site}")
}
