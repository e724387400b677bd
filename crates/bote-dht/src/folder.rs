//! Named-entry storage folders
//!
//! A [`Folder`] maps entry names to byte blobs. [`FileFolder`] keeps one file
//! per entry, [`MemoryFolder`] keeps entries in memory, and
//! [`EncryptedFolder`] wraps either one with AES-256-GCM using a cipher
//! obtained from a [`KeySource`].
//!
//! Entry names are restricted to the I2P base64 alphabet plus `.` and `_`
//! so they are always safe file names.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{DhtError, PasswordError, Result};

const TEMP_SUFFIX: &str = ".tmp";

/// Storage contract for packet and fragment files
pub trait Folder: Send + Sync {
    /// Read an entry; `None` if it does not exist
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Create or replace an entry
    fn put(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Remove an entry; returns whether it existed
    fn delete(&self, name: &str) -> Result<bool>;

    /// Names of all entries, sorted
    fn list(&self) -> Result<Vec<String>>;

    /// Sorted names starting with `prefix`
    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = self.list()?;
        names.retain(|name| name.starts_with(prefix));
        Ok(names)
    }
}

/// Reject names that could escape the folder or collide with temp files
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with(TEMP_SUFFIX)
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '~' | '=' | '.' | '_'));
    if valid {
        Ok(())
    } else {
        Err(DhtError::InvalidName(name.to_string()))
    }
}

/// One file per entry in a directory
#[derive(Debug, Clone)]
pub struct FileFolder {
    dir: PathBuf,
}

impl FileFolder {
    /// Open a directory, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(FileFolder { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(name))
    }
}

impl Folder for FileFolder {
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.entry_path(name)?) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Written to a temp file first, then renamed over the entry
    fn put(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.entry_path(name)?;
        let temp = self.dir.join(format!("{}{}", name, TEMP_SUFFIX));
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &path)?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<bool> {
        match fs::remove_file(self.entry_path(name)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        self.list_prefix("")
    }

    /// Other files are skipped before their type is checked
    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) if !name.starts_with(prefix) => continue,
                Ok(name) => name,
                Err(_) => {
                    debug!("ignoring non-UTF-8 file in {}", self.dir.display());
                    continue;
                }
            };
            if !entry.file_type()?.is_file() {
                continue;
            }
            if validate_name(&name).is_ok() {
                names.push(name);
            } else {
                debug!("ignoring {} in {}", name, self.dir.display());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// In-memory folder
#[derive(Debug, Default)]
pub struct MemoryFolder {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryFolder {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Folder for MemoryFolder {
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        validate_name(name)?;
        Ok(self.entries().get(name).cloned())
    }

    fn put(&self, name: &str, data: &[u8]) -> Result<()> {
        validate_name(name)?;
        self.entries().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        Ok(self.entries().remove(name).is_some())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.entries().keys().cloned().collect())
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries()
            .range(prefix.to_string()..)
            .map(|(name, _)| name)
            .take_while(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }
}

macro_rules! forward_folder {
    ($($wrapper:ident),*) => {
        $(
            impl<F: Folder + ?Sized> Folder for $wrapper<F> {
                fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
                    (**self).get(name)
                }

                fn put(&self, name: &str, data: &[u8]) -> Result<()> {
                    (**self).put(name, data)
                }

                fn delete(&self, name: &str) -> Result<bool> {
                    (**self).delete(name)
                }

                fn list(&self) -> Result<Vec<String>> {
                    (**self).list()
                }

                fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
                    (**self).list_prefix(prefix)
                }
            }
        )*
    };
}

forward_folder!(Box, Arc);

/// AES-256-GCM cipher for folder entries
///
/// Sealed layout: `magic (4) || nonce (12) || ciphertext+tag`
#[derive(Clone)]
pub struct FolderCipher {
    key: Zeroizing<[u8; 32]>,
}

const CIPHER_MAGIC: &[u8; 4] = b"BOTE";
const CIPHER_NONCE_LEN: usize = 12;

impl FolderCipher {
    pub fn new(key: [u8; 32]) -> Self {
        FolderCipher {
            key: Zeroizing::new(key),
        }
    }

    fn aead(&self) -> Aes256Gcm {
        Aes256Gcm::new((&*self.key).into())
    }

    pub fn seal(&self, name: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; CIPHER_NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .aead()
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| corrupt(name, "encryption failed"))?;

        let mut out = Vec::with_capacity(CIPHER_MAGIC.len() + CIPHER_NONCE_LEN + ciphertext.len());
        out.extend_from_slice(CIPHER_MAGIC);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn open(&self, name: &str, sealed: &[u8]) -> Result<Vec<u8>> {
        let header = CIPHER_MAGIC.len() + CIPHER_NONCE_LEN;
        if sealed.len() < header || &sealed[..CIPHER_MAGIC.len()] != CIPHER_MAGIC {
            return Err(corrupt(name, "not an encrypted entry"));
        }
        let nonce = Nonce::from_slice(&sealed[CIPHER_MAGIC.len()..header]);
        self.aead()
            .decrypt(nonce, &sealed[header..])
            .map_err(|_| corrupt(name, "authentication failed"))
    }
}

impl std::fmt::Debug for FolderCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FolderCipher([redacted])")
    }
}

fn corrupt(name: &str, reason: &str) -> DhtError {
    DhtError::CorruptEntry {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Supplies the cipher for encrypted folders
pub trait KeySource: Send + Sync {
    fn cipher(&self) -> std::result::Result<FolderCipher, PasswordError>;
}

/// Salt length for the password KDF
pub const SALT_LEN: usize = 16;

/// Derives the folder key from a password with Argon2id
///
/// The derived cipher is cached after the first successful call.
pub struct PasswordKeySource {
    password: Zeroizing<String>,
    salt: [u8; SALT_LEN],
    cached: Mutex<Option<FolderCipher>>,
}

impl PasswordKeySource {
    pub fn new(password: impl Into<String>, salt: [u8; SALT_LEN]) -> Self {
        PasswordKeySource {
            password: Zeroizing::new(password.into()),
            salt,
            cached: Mutex::new(None),
        }
    }

    /// Fresh random salt, to be persisted next to the folders
    pub fn generate_salt() -> [u8; SALT_LEN] {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        salt
    }
}

impl KeySource for PasswordKeySource {
    fn cipher(&self) -> std::result::Result<FolderCipher, PasswordError> {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cipher) = cached.as_ref() {
            return Ok(cipher.clone());
        }
        if self.password.is_empty() {
            return Err(PasswordError::Missing);
        }

        let params = Params::new(19 * 1024, 2, 1, Some(32))
            .map_err(|e| PasswordError::Derivation(e.to_string()))?;
        let mut key = Zeroizing::new([0u8; 32]);
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(self.password.as_bytes(), &self.salt, &mut key[..])
            .map_err(|e| PasswordError::Derivation(e.to_string()))?;

        let cipher = FolderCipher::new(*key);
        *cached = Some(cipher.clone());
        Ok(cipher)
    }
}

/// Fixed key, mainly for tests and callers that manage keys themselves
pub struct StaticKeySource(pub FolderCipher);

impl KeySource for StaticKeySource {
    fn cipher(&self) -> std::result::Result<FolderCipher, PasswordError> {
        Ok(self.0.clone())
    }
}

/// Encrypts every entry of an inner folder
///
/// The cipher is requested from the key source on every operation; a
/// failing key source aborts the operation before any data is touched.
pub struct EncryptedFolder<F> {
    inner: F,
    keys: Arc<dyn KeySource>,
}

impl<F: Folder> EncryptedFolder<F> {
    pub fn new(inner: F, keys: Arc<dyn KeySource>) -> Self {
        EncryptedFolder { inner, keys }
    }
}

impl<F: Folder> Folder for EncryptedFolder<F> {
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let cipher = self.keys.cipher()?;
        match self.inner.get(name)? {
            Some(sealed) => Ok(Some(cipher.open(name, &sealed)?)),
            None => Ok(None),
        }
    }

    fn put(&self, name: &str, data: &[u8]) -> Result<()> {
        let cipher = self.keys.cipher()?;
        let sealed = cipher.seal(name, data)?;
        self.inner.put(name, &sealed)
    }

    fn delete(&self, name: &str) -> Result<bool> {
        self.inner.delete(name)
    }

    fn list(&self) -> Result<Vec<String>> {
        self.inner.list()
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list_prefix(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(folder: &dyn Folder) {
        assert_eq!(folder.get("a").unwrap(), None);
        folder.put("a", b"one").unwrap();
        folder.put("b~=", b"two").unwrap();
        folder.put("a", b"three").unwrap();
        assert_eq!(folder.get("a").unwrap(), Some(b"three".to_vec()));
        assert_eq!(folder.list().unwrap(), vec!["a".to_string(), "b~=".to_string()]);
        folder.put("b_1", b"four").unwrap();
        assert_eq!(folder.list_prefix("b").unwrap(), vec!["b_1".to_string(), "b~=".to_string()]);
        assert_eq!(folder.list_prefix("b_").unwrap(), vec!["b_1".to_string()]);
        assert!(folder.list_prefix("c").unwrap().is_empty());
        assert!(folder.delete("b_1").unwrap());
        assert!(folder.delete("a").unwrap());
        assert!(!folder.delete("a").unwrap());
        assert_eq!(folder.list().unwrap(), vec!["b~=".to_string()]);
    }

    #[test]
    fn test_memory_folder() {
        exercise(&MemoryFolder::new());
    }

    #[test]
    fn test_file_folder() {
        let dir = TempDir::new().unwrap();
        let folder = FileFolder::open(dir.path().join("packets")).unwrap();
        exercise(&folder);
        assert!(!dir.path().join("packets").join("b~=.tmp").exists());
    }

    #[test]
    fn test_file_folder_ignores_stray_files() {
        let dir = TempDir::new().unwrap();
        let folder = FileFolder::open(dir.path()).unwrap();
        folder.put("good", b"x").unwrap();
        fs::write(dir.path().join("half-written.tmp"), b"y").unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();
        assert_eq!(folder.list().unwrap(), vec!["good".to_string()]);
        assert!(folder.list_prefix("half").unwrap().is_empty());
        assert_eq!(folder.list_prefix("go").unwrap(), vec!["good".to_string()]);
    }

    #[test]
    fn test_invalid_names() {
        let folder = MemoryFolder::new();
        for name in ["", "../x", "a/b", ".hidden", "x.tmp", "sp ace"] {
            assert!(matches!(folder.put(name, b""), Err(DhtError::InvalidName(_))), "{}", name);
        }
    }

    #[test]
    fn test_encrypted_folder() {
        let keys: Arc<dyn KeySource> = Arc::new(StaticKeySource(FolderCipher::new([7; 32])));
        let dir = TempDir::new().unwrap();
        let folder = EncryptedFolder::new(FileFolder::open(dir.path()).unwrap(), keys);
        exercise(&folder);

        let raw = fs::read(dir.path().join("b~=")).unwrap();
        assert_ne!(raw, b"two");
        assert_eq!(&raw[..4], CIPHER_MAGIC);
    }

    #[test]
    fn test_wrong_key_is_corrupt_entry() {
        let inner = Arc::new(MemoryFolder::new());
        let writer = EncryptedFolder::new(
            inner.clone(),
            Arc::new(StaticKeySource(FolderCipher::new([1; 32]))),
        );
        writer.put("x", b"secret").unwrap();

        let reader = EncryptedFolder::new(
            inner,
            Arc::new(StaticKeySource(FolderCipher::new([2; 32]))),
        );
        assert!(matches!(reader.get("x"), Err(DhtError::CorruptEntry { .. })));
    }

    #[test]
    fn test_missing_password_aborts() {
        let inner = MemoryFolder::new();
        inner.put("x", b"plain").unwrap();
        let folder = EncryptedFolder::new(inner, Arc::new(PasswordKeySource::new("", [0; SALT_LEN])));
        assert!(matches!(
            folder.put("y", b"data"),
            Err(DhtError::Password(PasswordError::Missing))
        ));
        assert!(matches!(
            folder.get("x"),
            Err(DhtError::Password(PasswordError::Missing))
        ));
        assert_eq!(folder.list().unwrap(), vec!["x".to_string()]);
    }

    #[test]
    fn test_password_key_source_is_deterministic() {
        let salt = PasswordKeySource::generate_salt();
        let a = PasswordKeySource::new("hunter2", salt).cipher().unwrap();
        let b = PasswordKeySource::new("hunter2", salt).cipher().unwrap();
        let sealed = a.seal("n", b"payload").unwrap();
        assert_eq!(b.open("n", &sealed).unwrap(), b"payload");

        let other = PasswordKeySource::new("hunter3", salt).cipher().unwrap();
        assert!(other.open("n", &sealed).is_err());
    }
}
