//! Email fragment packets
//!
//! An [`UnencryptedEmailPacket`] is one fragment of an email together with a
//! random delete authorization. It travels only inside the encrypted payload
//! of an [`EncryptedEmailPacket`], which is what storage peers hold.
//!
//! `U` layout: messageId[32], deleteAuthorization[32], fragmentIndex u16,
//! numFragments u16, contentLen u16, content
//!
//! `E` layout: dhtKey[32], storeTime u32, deleteVerificationHash[32],
//! cryptoImplId u8, payloadLen u16, payload

use bote_crypto::{CryptoId, CryptoRegistry, EmailDestination, EmailIdentity};
use tracing::debug;

use crate::codec::{PacketReader, PacketWriter, HEADER_SIZE};
use crate::error::{ProtocolError, Result};
use crate::packet::{DhtStorable, PacketType, WirePacket};
use crate::types::{Hash, UniqueId, HASH_SIZE, UNIQUE_ID_SIZE};

/// Encoded size of a `U` packet without its content
pub const UNENCRYPTED_OVERHEAD: usize = HEADER_SIZE + 2 * UNIQUE_ID_SIZE + 2 + 2 + 2;

/// Encoded size of an `E` packet without its payload
pub const ENCRYPTED_OVERHEAD: usize = HEADER_SIZE + HASH_SIZE + 4 + HASH_SIZE + 1 + 2;

/// One fragment of an email, in the clear
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnencryptedEmailPacket {
    message_id: UniqueId,
    delete_authorization: UniqueId,
    fragment_index: u16,
    num_fragments: u16,
    content: Vec<u8>,
}

impl UnencryptedEmailPacket {
    /// Create a fragment with a fresh random delete authorization
    pub fn new(
        message_id: UniqueId,
        fragment_index: u16,
        num_fragments: u16,
        content: Vec<u8>,
    ) -> Result<Self> {
        Self::with_authorization(
            message_id,
            UniqueId::random(),
            fragment_index,
            num_fragments,
            content,
        )
    }

    /// Create a fragment with a given delete authorization
    pub fn with_authorization(
        message_id: UniqueId,
        delete_authorization: UniqueId,
        fragment_index: u16,
        num_fragments: u16,
        content: Vec<u8>,
    ) -> Result<Self> {
        validate_fragment(fragment_index, num_fragments)?;
        if content.len() > u16::MAX as usize {
            return Err(ProtocolError::InvalidField(format!(
                "fragment content of {} bytes",
                content.len()
            )));
        }
        Ok(UnencryptedEmailPacket {
            message_id,
            delete_authorization,
            fragment_index,
            num_fragments,
            content,
        })
    }

    pub fn message_id(&self) -> &UniqueId {
        &self.message_id
    }

    pub fn delete_authorization(&self) -> &UniqueId {
        &self.delete_authorization
    }

    pub fn fragment_index(&self) -> u16 {
        self.fragment_index
    }

    pub fn num_fragments(&self) -> u16 {
        self.num_fragments
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn into_content(self) -> Vec<u8> {
        self.content
    }
}

fn validate_fragment(fragment_index: u16, num_fragments: u16) -> Result<()> {
    if num_fragments == 0 || fragment_index >= num_fragments {
        return Err(ProtocolError::InvalidField(format!(
            "fragment index {} of {}",
            fragment_index, num_fragments
        )));
    }
    Ok(())
}

impl WirePacket for UnencryptedEmailPacket {
    const TYPE: PacketType = PacketType::UnencryptedEmail;

    fn write_fields(&self, w: &mut PacketWriter) -> Result<()> {
        w.put_id(&self.message_id);
        w.put_id(&self.delete_authorization);
        w.put_u16(self.fragment_index);
        w.put_u16(self.num_fragments);
        w.put_var_bytes("content", &self.content)
    }

    fn read_fields(r: &mut PacketReader<'_>) -> Result<Self> {
        let message_id = r.id()?;
        let delete_authorization = r.id()?;
        let fragment_index = r.u16()?;
        let num_fragments = r.u16()?;
        let content = r.var_bytes()?.to_vec();
        validate_fragment(fragment_index, num_fragments)?;

        Ok(UnencryptedEmailPacket {
            message_id,
            delete_authorization,
            fragment_index,
            num_fragments,
            content,
        })
    }
}

/// An encrypted fragment as stored in the DHT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEmailPacket {
    dht_key: Hash,
    store_time: u32,
    delete_verification_hash: Hash,
    crypto_id: CryptoId,
    encrypted_payload: Vec<u8>,
}

impl EncryptedEmailPacket {
    /// Encrypt a fragment for `recipient`
    pub fn encrypt(
        fragment: &UnencryptedEmailPacket,
        recipient: &EmailDestination,
        registry: &CryptoRegistry,
    ) -> Result<Self> {
        let plaintext = fragment.to_bytes()?;
        let crypto_id = recipient.crypto_id();
        let encrypted_payload = registry
            .get(crypto_id)
            .encrypt(&plaintext, recipient.encryption_key())?;

        Self::from_payload(
            encrypted_payload,
            fragment.delete_authorization().hash(),
            crypto_id,
        )
    }

    /// Wrap an already encrypted payload; the DHT key is derived from it
    pub fn from_payload(
        encrypted_payload: Vec<u8>,
        delete_verification_hash: Hash,
        crypto_id: CryptoId,
    ) -> Result<Self> {
        if encrypted_payload.len() > u16::MAX as usize {
            return Err(ProtocolError::PacketTooLarge {
                size: encrypted_payload.len(),
                max: u16::MAX as usize,
            });
        }
        Ok(EncryptedEmailPacket {
            dht_key: Self::compute_dht_key(&encrypted_payload),
            store_time: 0,
            delete_verification_hash,
            crypto_id,
            encrypted_payload,
        })
    }

    /// `SHA256(u16 length || payload)`
    pub fn compute_dht_key(payload: &[u8]) -> Hash {
        let mut data = Vec::with_capacity(2 + payload.len());
        data.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        data.extend_from_slice(payload);
        Hash::digest(&data)
    }

    /// Whether the DHT key field matches the payload
    pub fn verify_dht_key(&self) -> bool {
        self.dht_key == Self::compute_dht_key(&self.encrypted_payload)
    }

    /// Decrypt with the recipient identity
    ///
    /// Fails with a crypto id mismatch if the packet was encrypted for a
    /// different implementation than the identity's.
    pub fn decrypt(
        &self,
        identity: &EmailIdentity,
        registry: &CryptoRegistry,
    ) -> Result<UnencryptedEmailPacket> {
        if self.crypto_id != identity.crypto_id() {
            debug!(
                "packet {} encrypted with {}, identity uses {}",
                self.dht_key,
                self.crypto_id,
                identity.crypto_id()
            );
            return Err(bote_crypto::CryptoError::CryptoIdMismatch {
                expected: identity.crypto_id().to_u8(),
                actual: self.crypto_id.to_u8(),
            }
            .into());
        }

        let plaintext = identity.decrypt(registry, &self.encrypted_payload)?;
        UnencryptedEmailPacket::from_bytes(&plaintext)
    }

    /// Whether `authorization` hashes to the stored verification hash
    pub fn is_delete_authorization_valid(&self, authorization: &UniqueId) -> bool {
        authorization.hash() == self.delete_verification_hash
    }

    pub fn store_time(&self) -> u32 {
        self.store_time
    }

    pub fn set_store_time(&mut self, store_time: u32) {
        self.store_time = store_time;
    }

    pub fn delete_verification_hash(&self) -> &Hash {
        &self.delete_verification_hash
    }

    pub fn crypto_id(&self) -> CryptoId {
        self.crypto_id
    }

    pub fn encrypted_payload(&self) -> &[u8] {
        &self.encrypted_payload
    }
}

impl DhtStorable for EncryptedEmailPacket {
    fn dht_key(&self) -> Hash {
        self.dht_key
    }
}

impl WirePacket for EncryptedEmailPacket {
    const TYPE: PacketType = PacketType::EncryptedEmail;

    fn write_fields(&self, w: &mut PacketWriter) -> Result<()> {
        w.put_hash(&self.dht_key);
        w.put_u32(self.store_time);
        w.put_hash(&self.delete_verification_hash);
        w.put_u8(self.crypto_id.to_u8());
        w.put_var_bytes("payload", &self.encrypted_payload)
    }

    /// The DHT key is reproduced as sent; storage checks it separately
    fn read_fields(r: &mut PacketReader<'_>) -> Result<Self> {
        let dht_key = r.hash()?;
        let store_time = r.u32()?;
        let delete_verification_hash = r.hash()?;
        let crypto_id = CryptoId::from_u8(r.u8()?)?;
        let encrypted_payload = r.var_bytes()?.to_vec();

        Ok(EncryptedEmailPacket {
            dht_key,
            store_time,
            delete_verification_hash,
            crypto_id,
            encrypted_payload,
        })
    }
}
