use anyhow::{Context, Result};
use bote_crypto::{CryptoRegistry, EmailDestination, EmailIdentity};
use bote_dht::DhtError;
use bote_mail::{Email, EmailSender, MailReceiver, PreparedEmail, ReceivedPacket};
use bote_protocol::{
    decode_packet, DeletionQuery, EmailPacketDeleteRequest, EncryptedEmailPacket,
    IndexPacketDeleteRequest, Packet, PacketType, ResponsePacket, RetrieveRequest, StatusCode,
    StorablePacket, StoreRequest, WirePacket, MAX_DATAGRAM_SIZE, RESPONSE_OVERHEAD,
};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::storage::Storage;

/// A Bote node: answers storage requests from peers and handles local mail
pub struct Node {
    config: Config,
    registry: Arc<CryptoRegistry>,
    storage: Arc<Storage>,
    receiver: MailReceiver,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl Node {
    pub fn open(config: Config, registry: Arc<CryptoRegistry>) -> Result<Self> {
        info!("Initializing node {}...", config.node.name);
        let storage = Storage::open(&config)?;
        Ok(Self::with_storage(config, registry, storage))
    }

    pub fn with_storage(config: Config, registry: Arc<CryptoRegistry>, storage: Storage) -> Self {
        let receiver = MailReceiver::new(storage.incomplete.clone());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Node {
            config,
            registry,
            storage: Arc::new(storage),
            receiver,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Answer one datagram from a peer
    ///
    /// Returns the encoded responses in sending order. An index too large
    /// for one datagram is answered with one response per part. The result
    /// is empty when the input does not decode or the packet type is not a
    /// request this node answers.
    pub fn handle_packet(&self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let packet = match decode_packet(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping undecodable packet ({} bytes): {}", bytes.len(), e);
                return Vec::new();
            }
        };

        let mut encoded = Vec::new();
        for response in self.dispatch(packet) {
            debug!("Responding {} to request {}", response.status, response.packet_id);
            match response.to_bytes() {
                Ok(bytes) => encoded.push(bytes),
                Err(e) => error!("Failed to encode response: {}", e),
            }
        }
        encoded
    }

    fn dispatch(&self, packet: Packet) -> Vec<ResponsePacket> {
        match packet {
            Packet::StoreRequest(request) => vec![self.handle_store(request)],
            Packet::RetrieveRequest(request) => self.handle_retrieve(request),
            Packet::EmailPacketDeleteRequest(request) => vec![self.handle_email_delete(request)],
            Packet::IndexPacketDeleteRequest(request) => vec![self.handle_index_delete(request)],
            Packet::DeletionQuery(query) => vec![self.handle_deletion_query(query)],
            Packet::FindClosePeers(request) => {
                debug!("Ignoring peer lookup {}: no routing table", request.packet_id);
                Vec::new()
            }
            other => {
                debug!("Ignoring unsolicited {:?} packet", other.packet_type());
                Vec::new()
            }
        }
    }

    fn handle_store(&self, request: StoreRequest) -> ResponsePacket {
        let id = request.packet_id;
        if !self.config.dht.accept_stores {
            debug!("Refusing store request {}: stores disabled", id);
            return ResponsePacket::new(id, StatusCode::GeneralError, None);
        }

        let result = match request.packet {
            StorablePacket::EncryptedEmail(packet) => {
                self.storage.email_packets.store(packet).map(|_| ())
            }
            StorablePacket::Index(packet) => self.storage.indexes.store(&packet).map(|_| ()),
        };
        match result {
            Ok(()) => ResponsePacket::new(id, StatusCode::Ok, None),
            Err(e) => {
                let status = status_for(&e);
                info!("Store request {} failed: {}", id, e);
                ResponsePacket::new(id, status, None)
            }
        }
    }

    fn handle_retrieve(&self, request: RetrieveRequest) -> Vec<ResponsePacket> {
        let id = request.packet_id;
        let found: bote_dht::Result<Vec<Packet>> = match request.data_type {
            PacketType::EncryptedEmail => self
                .storage
                .email_packets
                .get(&request.key)
                .map(|p| p.map(Packet::from).into_iter().collect()),
            PacketType::Index => self.storage.indexes.get(&request.key).and_then(|index| {
                let Some(index) = index.filter(|i| !i.is_empty()) else {
                    return Ok(Vec::new());
                };
                let parts = index.split_within(MAX_DATAGRAM_SIZE - RESPONSE_OVERHEAD)?;
                if parts.len() > 1 {
                    debug!("Index {} answered in {} parts", request.key, parts.len());
                }
                Ok(parts.into_iter().map(Packet::from).collect())
            }),
            other => {
                debug!("Retrieve request {} for non-storable {:?}", id, other);
                return vec![ResponsePacket::new(id, StatusCode::InvalidPacket, None)];
            }
        };

        match found {
            Ok(packets) if packets.is_empty() => {
                vec![ResponsePacket::new(id, StatusCode::NoDataFound, None)]
            }
            Ok(packets) => packets
                .into_iter()
                .map(|packet| ResponsePacket::new(id, StatusCode::Ok, Some(packet)))
                .collect(),
            Err(e) => {
                warn!("Retrieve of {} failed: {}", request.key, e);
                vec![ResponsePacket::new(id, status_for(&e), None)]
            }
        }
    }

    fn handle_email_delete(&self, request: EmailPacketDeleteRequest) -> ResponsePacket {
        // a mismatched or unknown key is acknowledged like a successful delete
        let status = match self.storage.email_packets.process_delete_request(&request) {
            Ok(_) => StatusCode::Ok,
            Err(e) => {
                warn!("Delete of {} failed: {}", request.dht_key, e);
                status_for(&e)
            }
        };
        ResponsePacket::new(request.packet_id, status, None)
    }

    fn handle_index_delete(&self, request: IndexPacketDeleteRequest) -> ResponsePacket {
        let status = match self.storage.indexes.process_delete_request(&request) {
            Ok(removed) => {
                debug!(
                    "Removed {} of {} index entries for {}",
                    removed,
                    request.entries().len(),
                    request.destination_hash
                );
                StatusCode::Ok
            }
            Err(e) => {
                warn!("Index delete for {} failed: {}", request.destination_hash, e);
                status_for(&e)
            }
        };
        ResponsePacket::new(request.packet_id, status, None)
    }

    fn handle_deletion_query(&self, query: DeletionQuery) -> ResponsePacket {
        match self.storage.email_packets.deletion_info(&query.dht_key) {
            Ok(Some(info)) => ResponsePacket::new(query.packet_id, StatusCode::Ok, Some(info.into())),
            Ok(None) => ResponsePacket::new(query.packet_id, StatusCode::NoDataFound, None),
            Err(e) => {
                warn!("Deletion query for {} failed: {}", query.dht_key, e);
                ResponsePacket::new(query.packet_id, status_for(&e), None)
            }
        }
    }

    /// Fragment and encrypt an outgoing email with the configured fragment size
    pub fn prepare_email(&self, email: &Email, recipient: &EmailDestination) -> Result<PreparedEmail> {
        EmailSender::prepare(email, recipient, &self.registry, self.config.mail.fragment_size)
            .context("Failed to prepare email")
    }

    /// Decrypt packets fetched for `identity` and deliver completed emails
    pub fn receive_mail<'a, I>(&self, packets: I, identity: &EmailIdentity) -> Vec<ReceivedPacket>
    where
        I: IntoIterator<Item = &'a EncryptedEmailPacket>,
    {
        self.receiver.process_packets(packets, identity, &self.registry)
    }

    /// Run one expiration pass off the async runtime
    pub async fn sweep(&self) -> Result<usize> {
        sweep_storage(self.storage.clone()).await
    }

    pub async fn run(&mut self) -> Result<()> {
        let period = Duration::from_secs(self.config.storage.sweep_interval_secs.max(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("═══════════════════════════════════════════════");
        info!("  Bote node {} is now running", self.config.node.name);
        info!("  Data Dir: {}", self.config.data_directory.display());
        info!("  Sweep interval: {}s", period.as_secs());
        info!("═══════════════════════════════════════════════");

        let storage = self.storage.clone();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = sweep_storage(storage.clone()).await {
                        error!("Expiration sweep failed: {:#}", e);
                    }
                }
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C signal");
                    break;
                }
                _ = self.shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        info!("Shutdown complete");
        Ok(())
    }

    pub fn shutdown_handle(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }
}

async fn sweep_storage(storage: Arc<Storage>) -> Result<usize> {
    let removed = tokio::task::spawn_blocking(move || storage.sweep())
        .await
        .context("Expiration sweep task panicked")?;
    debug!("Sweep removed {} entries", removed);
    Ok(removed)
}

/// Response status for a storage failure
fn status_for(error: &DhtError) -> StatusCode {
    match error {
        DhtError::StorageFull { .. } => StatusCode::NoDiskSpace,
        DhtError::InvalidDhtKey { .. } | DhtError::AlreadyDeleted(_) | DhtError::Protocol(_) => {
            StatusCode::InvalidPacket
        }
        _ => StatusCode::GeneralError,
    }
}
