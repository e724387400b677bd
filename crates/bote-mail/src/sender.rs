//! Turning an email into packets ready for storage peers

use bote_crypto::{CryptoRegistry, EmailDestination};
use bote_protocol::email::UNENCRYPTED_OVERHEAD;
use bote_protocol::{
    check_datagram_size, DhtStorable, EncryptedEmailPacket, Hash, IndexPacket, IndexPacketEntry,
    UnencryptedEmailPacket, WirePacket,
};
use tracing::debug;

use crate::email::Email;
use crate::error::{MailError, Result};

/// Fragment content size that keeps every encrypted packet within one datagram
pub const DEFAULT_FRAGMENT_SIZE: usize = 28 * 1024;

/// Encrypted fragments of one email plus the index entries pointing at them
#[derive(Debug, Clone)]
pub struct PreparedEmail {
    pub packets: Vec<EncryptedEmailPacket>,
    pub index: IndexPacket,
}

pub struct EmailSender;

impl EmailSender {
    /// Split an email into fragments of at most `fragment_size` content bytes
    ///
    /// Every fragment gets its own random delete authorization. An empty
    /// email still yields one (empty) fragment.
    pub fn fragment(email: &Email, fragment_size: usize) -> Result<Vec<UnencryptedEmailPacket>> {
        let max = u16::MAX as usize;
        if fragment_size == 0 || fragment_size > max {
            return Err(MailError::InvalidFragmentSize {
                size: fragment_size,
                max,
            });
        }

        let content = email.content();
        let count = content.len().div_ceil(fragment_size).max(1);
        if count > max {
            return Err(MailError::TooManyFragments {
                size: content.len(),
                max,
            });
        }

        let mut fragments = Vec::with_capacity(count);
        for index in 0..count {
            let start = index * fragment_size;
            let end = (start + fragment_size).min(content.len());
            fragments.push(UnencryptedEmailPacket::new(
                *email.message_id(),
                index as u16,
                count as u16,
                content[start..end].to_vec(),
            )?);
        }
        Ok(fragments)
    }

    /// Fragment, encrypt for `recipient` and index an email
    pub fn prepare(
        email: &Email,
        recipient: &EmailDestination,
        registry: &CryptoRegistry,
        fragment_size: usize,
    ) -> Result<PreparedEmail> {
        let max = registry
            .get(recipient.crypto_id())
            .max_plaintext_len()
            .saturating_sub(UNENCRYPTED_OVERHEAD)
            .min(u16::MAX as usize);
        if fragment_size > max {
            return Err(MailError::InvalidFragmentSize {
                size: fragment_size,
                max,
            });
        }

        let mut index = IndexPacket::new(Hash::from_bytes(recipient.hash()));
        let mut packets = Vec::new();
        for fragment in Self::fragment(email, fragment_size)? {
            let packet = EncryptedEmailPacket::encrypt(&fragment, recipient, registry)?;
            check_datagram_size(&packet.to_bytes()?)?;
            index.put(IndexPacketEntry {
                email_packet_key: packet.dht_key(),
                delete_verification_hash: *packet.delete_verification_hash(),
                store_time: 0,
            });
            packets.push(packet);
        }

        debug!(
            "prepared email {} as {} packets",
            email.message_id().to_base64(),
            packets.len()
        );
        Ok(PreparedEmail { packets, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bote_crypto::{CryptoId, EmailIdentity};

    #[test]
    fn test_fragment_sizes() {
        let email = Email::new(vec![7u8; 1000]);
        let fragments = EmailSender::fragment(&email, 300).unwrap();
        let sizes: Vec<_> = fragments.iter().map(|f| f.content().len()).collect();
        assert_eq!(sizes, vec![300, 300, 300, 100]);
        assert!(fragments.iter().all(|f| f.num_fragments() == 4));
        assert!(fragments.iter().all(|f| f.message_id() == email.message_id()));

        let exact = EmailSender::fragment(&Email::new(vec![1u8; 600]), 300).unwrap();
        assert_eq!(exact.len(), 2);
    }

    #[test]
    fn test_empty_email_is_one_fragment() {
        let fragments = EmailSender::fragment(&Email::new(Vec::new()), 100).unwrap();
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].content().is_empty());
    }

    #[test]
    fn test_delete_authorizations_are_per_fragment() {
        let fragments = EmailSender::fragment(&Email::new(vec![0u8; 50]), 10).unwrap();
        for (i, a) in fragments.iter().enumerate() {
            for b in &fragments[i + 1..] {
                assert_ne!(a.delete_authorization(), b.delete_authorization());
            }
        }
    }

    #[test]
    fn test_invalid_fragment_size() {
        let email = Email::new(vec![0u8; 10]);
        assert!(matches!(
            EmailSender::fragment(&email, 0),
            Err(MailError::InvalidFragmentSize { .. })
        ));
        assert!(matches!(
            EmailSender::fragment(&Email::new(vec![0u8; 70_000]), 1),
            Err(MailError::TooManyFragments { .. })
        ));
    }

    #[test]
    fn test_prepare_builds_index() {
        let registry = CryptoRegistry::new();
        let identity = EmailIdentity::generate(&registry, CryptoId::Ecdh256Ecdsa256, "bob").unwrap();
        let email = Email::new(vec![42u8; 2500]);

        let prepared = EmailSender::prepare(&email, identity.destination(), &registry, 1000).unwrap();
        assert_eq!(prepared.packets.len(), 3);
        assert_eq!(prepared.index.len(), 3);
        assert_eq!(
            prepared.index.destination_hash().as_bytes(),
            &identity.destination().hash()
        );
        for packet in &prepared.packets {
            let entry = prepared.index.get(&packet.dht_key()).unwrap();
            assert_eq!(&entry.delete_verification_hash, packet.delete_verification_hash());
            assert!(packet.verify_dht_key());
        }
    }

    #[test]
    fn test_prepare_rejects_oversized_fragments() {
        let registry = CryptoRegistry::new();
        let identity = EmailIdentity::generate(&registry, CryptoId::Ecdh256Ecdsa256, "bob").unwrap();
        assert!(matches!(
            EmailSender::prepare(&Email::new(vec![0u8; 10]), identity.destination(), &registry, 40_000),
            Err(MailError::InvalidFragmentSize { .. })
        ));
    }
}
