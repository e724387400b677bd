use anyhow::{Context, Result};
use bote_crypto::CryptoId;
use bote_dht::DEFAULT_MAX_STORAGE_BYTES;
use bote_mail::{incomplete, message_id_cache, sender};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const SECS_PER_DAY: u32 = 24 * 60 * 60;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    pub storage: StorageConfig,
    pub dht: DhtConfig,
    pub mail: MailConfig,
    pub logging: LoggingConfig,

    #[serde(skip)]
    config_file_path: PathBuf,
    #[serde(skip)]
    pub data_directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    /// Identities file, relative to the data directory unless absolute
    #[serde(default = "default_identities_file")]
    pub identities_file: PathBuf,
}

fn default_identities_file() -> PathBuf {
    PathBuf::from("identities.yaml")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Byte budget shared by email and index packets
    pub max_bytes: u64,
    pub sweep_interval_secs: u64,
    /// Encrypt local mail folders with a password-derived key
    #[serde(default)]
    pub encrypt_mail: bool,
    /// Environment variable holding the folder password
    #[serde(default = "default_password_env")]
    pub password_env: String,
}

fn default_password_env() -> String {
    "BOTE_PASSWORD".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhtConfig {
    /// Accept store requests from other peers
    pub accept_stores: bool,
    /// Days before stored packets and deletion records expire
    pub expiration_days: u32,
}

impl DhtConfig {
    pub fn retention_secs(&self) -> u32 {
        self.expiration_days.saturating_mul(SECS_PER_DAY)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub fragment_size: usize,
    pub message_id_cache_size: usize,
    pub incomplete_max_age_days: u32,
    /// Crypto implementation id used by `keygen`
    #[serde(default = "default_crypto_id")]
    pub crypto_id: u8,
}

fn default_crypto_id() -> u8 {
    CryptoId::Ecdh256Ecdsa256.to_u8()
}

impl MailConfig {
    pub fn incomplete_max_age_secs(&self) -> u32 {
        self.incomplete_max_age_days.saturating_mul(SECS_PER_DAY)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(config_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(Self::default_config_path);
        let data_dir = data_dir.unwrap_or_else(Self::default_data_dir);

        if !config_path.exists() {
            anyhow::bail!(
                "Configuration file not found: {}\nRun with --init to create a new configuration",
                config_path.display()
            );
        }

        let contents =
            fs::read_to_string(&config_path).context("Failed to read configuration file")?;

        let mut config: Config =
            serde_yaml::from_str(&contents).context("Failed to parse configuration file")?;

        config.config_file_path = config_path;
        config.data_directory = data_dir;

        Ok(config)
    }

    /// Default settings for the given locations, without touching the disk
    pub fn with_paths(config_path: PathBuf, data_dir: PathBuf) -> Self {
        Config {
            node: NodeConfig {
                name: "bote".to_string(),
                identities_file: default_identities_file(),
            },
            storage: StorageConfig {
                max_bytes: DEFAULT_MAX_STORAGE_BYTES,
                sweep_interval_secs: 3600,
                encrypt_mail: false,
                password_env: default_password_env(),
            },
            dht: DhtConfig {
                accept_stores: true,
                expiration_days: bote_dht::EXPIRATION_TIME_SECS / SECS_PER_DAY,
            },
            mail: MailConfig {
                fragment_size: sender::DEFAULT_FRAGMENT_SIZE,
                message_id_cache_size: message_id_cache::DEFAULT_CAPACITY,
                incomplete_max_age_days: incomplete::DEFAULT_MAX_AGE_SECS / SECS_PER_DAY,
                crypto_id: default_crypto_id(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
            config_file_path: config_path,
            data_directory: data_dir,
        }
    }

    /// Create a new default configuration and write it out
    pub fn create_default(config_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(Self::default_config_path);
        let data_dir = data_dir.unwrap_or_else(Self::default_data_dir);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&data_dir)?;

        let config = Self::with_paths(config_path, data_dir);
        config.save()?;
        Ok(config)
    }

    /// Write the configuration back to its file
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(&self.config_file_path, yaml).with_context(|| {
            format!(
                "Failed to write configuration file {}",
                self.config_file_path.display()
            )
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_file_path
    }

    pub fn identities_path(&self) -> PathBuf {
        self.data_directory.join(&self.node.identities_file)
    }

    pub fn crypto_id(&self) -> Result<CryptoId> {
        CryptoId::from_u8(self.mail.crypto_id).context("Invalid mail.crypto_id")
    }

    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bote")
            .join("config.yaml")
    }

    fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bote")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_load() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("conf/config.yaml");
        let data_dir = dir.path().join("data");

        let created = Config::create_default(Some(config_path.clone()), Some(data_dir.clone())).unwrap();
        assert!(config_path.exists());
        assert!(data_dir.is_dir());

        let loaded = Config::load(Some(config_path.clone()), Some(data_dir.clone())).unwrap();
        assert_eq!(loaded.config_path(), config_path);
        assert_eq!(loaded.storage.max_bytes, created.storage.max_bytes);
        assert_eq!(loaded.dht.expiration_days, 100);
        assert_eq!(loaded.dht.retention_secs(), bote_dht::EXPIRATION_TIME_SECS);
        assert_eq!(loaded.mail.incomplete_max_age_days, 30);
        assert_eq!(loaded.identities_path(), data_dir.join("identities.yaml"));
    }

    #[test]
    fn test_missing_file_mentions_init() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(dir.path().join("nope.yaml")), None).unwrap_err();
        assert!(err.to_string().contains("--init"));
    }

    #[test]
    fn test_optional_fields_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "node: { name: n }\n\
             storage: { max_bytes: 1000, sweep_interval_secs: 60 }\n\
             dht: { accept_stores: false, expiration_days: 1 }\n\
             mail: { fragment_size: 100, message_id_cache_size: 5, incomplete_max_age_days: 2 }\n\
             logging: { level: debug }\n",
        )
        .unwrap();

        let config = Config::load(Some(path), Some(dir.path().to_path_buf())).unwrap();
        assert!(!config.storage.encrypt_mail);
        assert_eq!(config.storage.password_env, "BOTE_PASSWORD");
        assert!(!config.logging.json);
        assert_eq!(config.crypto_id().unwrap(), CryptoId::Ecdh256Ecdsa256);
        assert_eq!(config.mail.incomplete_max_age_secs(), 2 * 24 * 60 * 60);
    }

    #[test]
    fn test_invalid_crypto_id() {
        let mut config = Config::with_paths(PathBuf::from("c.yaml"), PathBuf::from("d"));
        config.mail.crypto_id = 9;
        assert!(config.crypto_id().is_err());
    }
}
