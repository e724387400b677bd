use anyhow::{Context, Result};
use bote_dht::folder::SALT_LEN;
use bote_dht::{
    EmailPacketStore, EncryptedFolder, Expirable, FileFolder, Folder, IndexPacketStore, KeySource,
    PasswordKeySource, StorageQuota,
};
use bote_mail::{FolderInbox, IncompleteEmailFolder, MessageIdCache};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;

const SALT_FILE: &str = "mail.salt";

/// All persistent state of a node, laid out under the data directory:
///
/// ```text
/// dht/email      encrypted email packets held for other users
/// dht/deleted    deletion records
/// dht/index      index packets
/// mail/inbox     assembled emails
/// mail/incomplete fragments waiting for the rest of their email
/// mail/          message id cache
/// ```
pub struct Storage {
    pub email_packets: EmailPacketStore,
    pub indexes: IndexPacketStore,
    pub inbox: Arc<FolderInbox>,
    pub message_ids: Arc<MessageIdCache>,
    pub incomplete: Arc<IncompleteEmailFolder>,
    quota: Arc<StorageQuota>,
}

impl Storage {
    /// Open storage, reading the mail password from the configured
    /// environment variable when mail encryption is on
    pub fn open(config: &Config) -> Result<Self> {
        let keys: Option<Arc<dyn KeySource>> = if config.storage.encrypt_mail {
            let password = std::env::var(&config.storage.password_env).with_context(|| {
                format!(
                    "Mail encryption is enabled; set {} to the folder password",
                    config.storage.password_env
                )
            })?;
            let salt = load_or_create_salt(&config.data_directory)?;
            Some(Arc::new(PasswordKeySource::new(password, salt)))
        } else {
            None
        };
        Self::open_with_keys(config, keys)
    }

    /// Open storage with an explicit key source for the mail folders
    pub fn open_with_keys(config: &Config, keys: Option<Arc<dyn KeySource>>) -> Result<Self> {
        let data_dir = &config.data_directory;
        info!("Opening storage in {}", data_dir.display());

        let quota = Arc::new(StorageQuota::new(config.storage.max_bytes));
        let retention = config.dht.retention_secs();

        let email_packets = EmailPacketStore::open(
            file_folder(data_dir, "dht/email")?,
            file_folder(data_dir, "dht/deleted")?,
            quota.clone(),
        )
        .context("Failed to open email packet store")?
        .with_retention(retention);

        let indexes = IndexPacketStore::open(file_folder(data_dir, "dht/index")?, quota.clone())
            .context("Failed to open index packet store")?
            .with_retention(retention);

        let mail_folder = |dir: &str| -> Result<Box<dyn Folder>> {
            let folder = FileFolder::open(data_dir.join(dir))
                .with_context(|| format!("Failed to open folder {}", dir))?;
            Ok(match &keys {
                Some(keys) => Box::new(EncryptedFolder::new(folder, keys.clone())),
                None => Box::new(folder),
            })
        };

        let inbox = Arc::new(FolderInbox::new(mail_folder("mail/inbox")?));
        let message_ids = Arc::new(
            MessageIdCache::open(mail_folder("mail")?, config.mail.message_id_cache_size)
                .context("Failed to open message id cache")?,
        );
        let incomplete = Arc::new(
            IncompleteEmailFolder::new(
                mail_folder("mail/incomplete")?,
                message_ids.clone(),
                inbox.clone(),
            )
            .with_max_age(config.mail.incomplete_max_age_secs()),
        );

        info!(
            "Storage ready: {} email packets, {} bytes of {} used",
            email_packets.len()?,
            quota.used(),
            quota.max()
        );

        Ok(Storage {
            email_packets,
            indexes,
            inbox,
            message_ids,
            incomplete,
            quota,
        })
    }

    pub fn quota(&self) -> &StorageQuota {
        &self.quota
    }

    /// Everything swept by the expiration task
    pub fn expirables(&self) -> [(&'static str, &dyn Expirable); 3] {
        [
            ("email packets", &self.email_packets as &dyn Expirable),
            ("index packets", &self.indexes as &dyn Expirable),
            ("incomplete emails", self.incomplete.as_ref() as &dyn Expirable),
        ]
    }

    /// Run one expiration pass; a failing store is logged and skipped
    pub fn sweep_at(&self, now: u32) -> usize {
        let mut total = 0;
        for (name, store) in self.expirables() {
            match store.delete_expired_at(now) {
                Ok(removed) => {
                    if removed > 0 {
                        info!("Expired {} entries from {}", removed, name);
                    }
                    total += removed;
                }
                Err(e) => warn!("Expiration sweep of {} failed: {}", name, e),
            }
        }
        total
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(bote_protocol::now())
    }
}

fn file_folder(data_dir: &Path, dir: &str) -> Result<Box<dyn Folder>> {
    let folder = FileFolder::open(data_dir.join(dir))
        .with_context(|| format!("Failed to open folder {}", dir))?;
    Ok(Box::new(folder))
}

/// The salt is created once and kept next to the folders it protects
fn load_or_create_salt(data_dir: &Path) -> Result<[u8; SALT_LEN]> {
    let path = data_dir.join(SALT_FILE);
    if path.exists() {
        let bytes = fs::read(&path).context("Failed to read salt file")?;
        let salt: [u8; SALT_LEN] = bytes.as_slice().try_into().map_err(|_| {
            anyhow::anyhow!("Salt file {} has {} bytes, expected {}", path.display(), bytes.len(), SALT_LEN)
        })?;
        return Ok(salt);
    }

    fs::create_dir_all(data_dir)?;
    let salt = PasswordKeySource::generate_salt();
    fs::write(&path, salt).context("Failed to write salt file")?;
    info!("Created new folder salt at {}", path.display());
    Ok(salt)
}
