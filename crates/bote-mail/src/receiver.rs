//! Receiving side: decrypt, reassemble, and prepare delete requests

use std::sync::Arc;

use bote_crypto::{CryptoRegistry, EmailIdentity};
use bote_protocol::{
    DhtStorable, EmailPacketDeleteRequest, EncryptedEmailPacket, Hash, IndexPacketDeleteRequest,
};
use tracing::warn;

use crate::error::Result;
use crate::incomplete::IncompleteEmailFolder;

/// Outcome of processing one encrypted packet
#[derive(Debug, Clone)]
pub struct ReceivedPacket {
    /// Whether this packet completed an email
    pub completed: bool,
    /// Deletes the packet from storage peers
    pub delete_request: EmailPacketDeleteRequest,
    /// Removes the packet from the recipient's index
    pub index_delete_request: IndexPacketDeleteRequest,
}

pub struct MailReceiver {
    incomplete: Arc<IncompleteEmailFolder>,
}

impl MailReceiver {
    pub fn new(incomplete: Arc<IncompleteEmailFolder>) -> Self {
        MailReceiver { incomplete }
    }

    /// Decrypt a packet for `identity` and feed its fragment to reassembly
    ///
    /// A packet encrypted for a different crypto implementation than the
    /// identity's is rejected. The returned delete requests carry the
    /// fragment's delete authorization; they are valid even when the
    /// fragment belonged to an email that was already delivered.
    pub fn process_packet(
        &self,
        packet: &EncryptedEmailPacket,
        identity: &EmailIdentity,
        registry: &CryptoRegistry,
    ) -> Result<ReceivedPacket> {
        let fragment = packet.decrypt(identity, registry)?;
        let authorization = *fragment.delete_authorization();
        let dht_key = packet.dht_key();

        let completed = self.incomplete.add_email_fragment(fragment)?;

        let mut index_delete_request =
            IndexPacketDeleteRequest::new(Hash::from_bytes(identity.destination().hash()));
        index_delete_request.put(dht_key, authorization)?;

        Ok(ReceivedPacket {
            completed,
            delete_request: EmailPacketDeleteRequest::new(dht_key, authorization),
            index_delete_request,
        })
    }

    /// Process several packets; a failing packet is logged and skipped
    pub fn process_packets<'a, I>(
        &self,
        packets: I,
        identity: &EmailIdentity,
        registry: &CryptoRegistry,
    ) -> Vec<ReceivedPacket>
    where
        I: IntoIterator<Item = &'a EncryptedEmailPacket>,
    {
        packets
            .into_iter()
            .filter_map(|packet| match self.process_packet(packet, identity, registry) {
                Ok(received) => Some(received),
                Err(e) => {
                    warn!("dropping email packet {}: {}", packet.dht_key(), e);
                    None
                }
            })
            .collect()
    }
}
