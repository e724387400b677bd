//! Email identities kept in a YAML file next to the node data

use anyhow::{Context, Result};
use bote_crypto::{CryptoId, CryptoRegistry, EmailIdentity};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
struct IdentityRecords {
    identities: Vec<EmailIdentity>,
}

/// Identities file, loaded fully into memory
pub struct IdentityFile {
    path: PathBuf,
    identities: Vec<EmailIdentity>,
}

impl IdentityFile {
    /// Load the file, or start empty when it does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let identities = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read identities file {}", path.display()))?;
            let records: IdentityRecords = serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse identities file {}", path.display()))?;
            records.identities
        } else {
            Vec::new()
        };
        Ok(IdentityFile { path, identities })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identities(&self) -> &[EmailIdentity] {
        &self.identities
    }

    pub fn find(&self, public_name: &str) -> Option<&EmailIdentity> {
        self.identities.iter().find(|i| i.public_name() == public_name)
    }

    /// Generate a new identity and persist the file
    pub fn generate(
        &mut self,
        registry: &CryptoRegistry,
        crypto_id: CryptoId,
        public_name: &str,
    ) -> Result<&EmailIdentity> {
        if self.find(public_name).is_some() {
            anyhow::bail!("An identity named {:?} already exists", public_name);
        }
        let identity = EmailIdentity::generate(registry, crypto_id, public_name)
            .context("Failed to generate email identity")?;
        info!(
            "Generated {} identity {:?}",
            crypto_id.name(),
            identity.public_name()
        );
        self.identities.push(identity);
        self.save()?;
        Ok(&self.identities[self.identities.len() - 1])
    }

    /// Write via a temp file so a crash never leaves a truncated file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(&IdentityRecords {
            identities: self.identities.clone(),
        })?;
        let tmp = self.path.with_extension("yaml.tmp");
        fs::write(&tmp, yaml)
            .with_context(|| format!("Failed to write identities file {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace identities file {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("identities.yaml");
        let registry = CryptoRegistry::new();

        let mut file = IdentityFile::open(&path).unwrap();
        assert!(file.identities().is_empty());
        let destination = file
            .generate(&registry, CryptoId::Ecdh256Ecdsa256, "alice")
            .unwrap()
            .destination()
            .clone();

        let reloaded = IdentityFile::open(&path).unwrap();
        assert_eq!(reloaded.identities().len(), 1);
        let alice = reloaded.find("alice").unwrap();
        assert_eq!(alice.destination(), &destination);
        assert_eq!(alice.crypto_id(), CryptoId::Ecdh256Ecdsa256);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = CryptoRegistry::new();
        let mut file = IdentityFile::open(dir.path().join("ids.yaml")).unwrap();
        file.generate(&registry, CryptoId::Ecdh256Ecdsa256, "bob").unwrap();
        assert!(file.generate(&registry, CryptoId::Ecdh521Ecdsa521, "bob").is_err());
        assert_eq!(file.identities().len(), 1);
    }

    #[test]
    fn test_garbage_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ids.yaml");
        fs::write(&path, "identities: [ { nope: 1 } ]").unwrap();
        assert!(IdentityFile::open(&path).is_err());
    }
}
