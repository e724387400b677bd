//! Bote Core Library
//!
//! Ties together the Bote components:
//! - Cryptography (crypto registry, keys, email identities)
//! - Protocol (packet types and their wire encoding)
//! - DHT (packet storage, deletion authorization, expiration)
//! - Mail (fragmentation, reassembly, inbox)

use std::sync::Arc;

pub use bote_crypto as crypto;
pub use bote_dht as dht;
pub use bote_mail as mail;
pub use bote_protocol as protocol;

pub use crypto::{CryptoError, CryptoId, CryptoRegistry};
pub use dht::DhtError;
pub use mail::MailError;
pub use protocol::ProtocolError;

/// Build the crypto registry shared by every component
pub fn init() -> Arc<CryptoRegistry> {
    Arc::new(CryptoRegistry::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        let registry = init();
        for id in CryptoId::ALL {
            assert_eq!(registry.get(id).id(), id);
        }
    }

    #[test]
    fn test_module_exports() {
        let packet = protocol::DeletionQuery::new(protocol::Hash::digest(b"key"));
        let bytes = protocol::WirePacket::to_bytes(&packet).unwrap();
        assert_eq!(protocol::decode_packet(&bytes).unwrap(), protocol::Packet::from(packet));

        let folder = dht::MemoryFolder::new();
        assert!(dht::Folder::list(&folder).unwrap().is_empty());

        let email = mail::Email::new(b"hello".to_vec());
        assert_eq!(email.content(), b"hello");
    }
}
