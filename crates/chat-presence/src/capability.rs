//! The narrow capability interfaces the Chat Node and Exchange Node expose
//! to each other, per the cyclic-reference design note: each side is
//! unit-testable against a mock of the other.

use async_trait::async_trait;

/// Operations the Chat Node consumes from the Exchange Node.
#[async_trait]
pub trait ExchangeHandle: Send + Sync {
    /// Forward a direct message bound for a remote site.
    async fn send_message_to_server(&self, sender_jid: &str, target_site: &str, target_user: &str, payload: &str);

    /// Forward a file transfer bound for a remote site.
    async fn send_file_to_server(
        &self,
        sender_jid: &str,
        target_site: &str,
        target_user: &str,
        filename: &str,
        ciphertext: &str,
    );

    /// Broadcast a local chat message to every connected peer.
    async fn broadcast_message(&self, sender_jid: &str, payload: &str);

    /// Record/refresh a presence entry and fan it out per the directory's
    /// mutation rules.
    async fn update_presence(&self, site: &str, jid: &str, nickname: &str, public_key: &str);

    /// Remove a presence entry and fan out the result.
    async fn remove_presence(&self, site: &str, jid: &str);
}

/// Operations the Exchange Node consumes from the Chat Node.
#[async_trait]
pub trait ChatHandle: Send + Sync {
    /// Deliver `payload` to a single local user, or reply to `local_user`
    /// that the target was not found.
    async fn send_message_to_client(&self, payload: &str, sender_jid: &str, local_user: &str);

    /// Fan a remotely-originated broadcast out to every local client.
    async fn send_message_to_all_clients(&self, payload: &str, sender_jid: &str);

    /// Deliver a file transfer to a single local user.
    async fn handle_file_transfer(&self, sender_jid: &str, local_user: &str, filename: &str, ciphertext: &str);

    /// Fan a presence snapshot frame out to every local client.
    async fn broadcast_presence(&self, presence_envelope_text: &str);
}
