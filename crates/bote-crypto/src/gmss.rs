//! Two-layer Merkle signature scheme with Winternitz one-time signatures
//!
//! A GMSS-style construction over SHA-256. The top tree's leaves sign the
//! roots of the bottom trees; bottom leaves sign message digests. With layer
//! height `h` a key pair can produce `2^(2h)` signatures.
//!
//! All one-time keys are derived from a 32-byte seed, so the private key is
//! just `seed || next index (u32) || h` and trees are recomputed on demand.
//! Signing consumes the current index. The caller persists the returned key
//! before using the signature and never signs with an older state again.
//!
//! Signature layout:
//! `index (u32) || bottom WOTS sig || bottom auth path || top WOTS sig || top auth path`

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

pub const N: usize = 32;

/// Winternitz parameter
const W: u8 = 16;
const LEN1: usize = 64;
const LEN2: usize = 3;
pub const WOTS_LEN: usize = LEN1 + LEN2;

pub const DEFAULT_HEIGHT: u8 = 5;
pub const MAX_HEIGHT: u8 = 10;

pub const PRIVATE_KEY_LEN: usize = N + 4 + 1;
pub const PUBLIC_KEY_LEN: usize = N + 1;

const PREFIX_LEAF: u8 = 0x00;
const PREFIX_NODE: u8 = 0x01;
const PREFIX_CHAIN: u8 = 0x02;
const PREFIX_SECRET: u8 = 0x03;

const TOP_LAYER: u8 = 1;
const BOTTOM_LAYER: u8 = 0;

type Node = [u8; N];

/// Length of a signature for a given layer height
pub const fn signature_len(height: u8) -> usize {
    4 + 2 * (WOTS_LEN + height as usize) * N
}

/// Position of a one-time key
#[derive(Debug, Clone, Copy)]
struct Address {
    layer: u8,
    tree: u32,
    leaf: u32,
}

impl Address {
    fn to_bytes(self) -> [u8; 9] {
        let mut out = [0u8; 9];
        out[0] = self.layer;
        out[1..5].copy_from_slice(&self.tree.to_be_bytes());
        out[5..9].copy_from_slice(&self.leaf.to_be_bytes());
        out
    }
}

/// Decoded private key state
#[derive(Clone)]
pub struct GmssPrivateKey {
    seed: Zeroizing<[u8; N]>,
    pub index: u32,
    pub height: u8,
}

impl GmssPrivateKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PRIVATE_KEY_LEN {
            return Err(CryptoError::InvalidKey("GMSS private key length".to_string()));
        }
        let height = bytes[N + 4];
        check_height(height)?;

        let mut seed = Zeroizing::new([0u8; N]);
        seed.copy_from_slice(&bytes[..N]);
        let mut index = [0u8; 4];
        index.copy_from_slice(&bytes[N..N + 4]);

        Ok(GmssPrivateKey {
            seed,
            index: u32::from_be_bytes(index),
            height,
        })
    }

    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(PRIVATE_KEY_LEN));
        out.extend_from_slice(self.seed.as_ref());
        out.extend_from_slice(&self.index.to_be_bytes());
        out.push(self.height);
        out
    }

    /// Total number of signatures this key can produce
    pub fn capacity(&self) -> u64 {
        1u64 << (2 * self.height as u32)
    }

    /// Signatures left before exhaustion
    pub fn remaining(&self) -> u64 {
        self.capacity().saturating_sub(self.index as u64)
    }
}

/// Decoded public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GmssPublicKey {
    pub root: Node,
    pub height: u8,
}

impl GmssPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(CryptoError::InvalidKey("GMSS public key length".to_string()));
        }
        let height = bytes[N];
        check_height(height)?;
        let mut root = [0u8; N];
        root.copy_from_slice(&bytes[..N]);
        Ok(GmssPublicKey { root, height })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PUBLIC_KEY_LEN);
        out.extend_from_slice(&self.root);
        out.push(self.height);
        out
    }
}

fn check_height(height: u8) -> Result<()> {
    if height == 0 || height > MAX_HEIGHT {
        return Err(CryptoError::InvalidKey(format!(
            "GMSS tree height {} out of range",
            height
        )));
    }
    Ok(())
}

fn secret_element(seed: &[u8; N], address: Address, chain: u8) -> Zeroizing<Node> {
    let mut hasher = Sha256::new();
    hasher.update([PREFIX_SECRET]);
    hasher.update(seed);
    hasher.update(address.to_bytes());
    hasher.update([chain]);
    Zeroizing::new(hasher.finalize().into())
}

/// Apply the chain function `steps` times starting at position `start`
fn chain(value: &Node, address: Address, chain: u8, start: u8, steps: u8) -> Node {
    let mut out = *value;
    for step in start..start + steps {
        let mut hasher = Sha256::new();
        hasher.update([PREFIX_CHAIN]);
        hasher.update(address.to_bytes());
        hasher.update([chain, step]);
        hasher.update(out);
        out = hasher.finalize().into();
    }
    out
}

/// Message digest in base 16 followed by its checksum
fn base_w(digest: &Node) -> [u8; WOTS_LEN] {
    let mut out = [0u8; WOTS_LEN];
    for (i, byte) in digest.iter().enumerate() {
        out[2 * i] = byte >> 4;
        out[2 * i + 1] = byte & 0x0F;
    }

    let checksum: u16 = out[..LEN1].iter().map(|d| (W - 1 - d) as u16).sum();
    out[LEN1] = ((checksum >> 8) & 0x0F) as u8;
    out[LEN1 + 1] = ((checksum >> 4) & 0x0F) as u8;
    out[LEN1 + 2] = (checksum & 0x0F) as u8;
    out
}

fn compress_leaf(address: Address, chain_ends: &[Node]) -> Node {
    let mut hasher = Sha256::new();
    hasher.update([PREFIX_LEAF]);
    hasher.update(address.to_bytes());
    for end in chain_ends {
        hasher.update(end);
    }
    hasher.finalize().into()
}

fn wots_leaf(seed: &[u8; N], address: Address) -> Node {
    let ends: Vec<Node> = (0..WOTS_LEN as u8)
        .map(|i| chain(&secret_element(seed, address, i), address, i, 0, W - 1))
        .collect();
    compress_leaf(address, &ends)
}

fn wots_sign(seed: &[u8; N], address: Address, message: &Node, out: &mut Vec<u8>) {
    for (i, digit) in base_w(message).iter().enumerate() {
        let i = i as u8;
        out.extend_from_slice(&chain(&secret_element(seed, address, i), address, i, 0, *digit));
    }
}

fn wots_leaf_from_signature(signature: &[u8], address: Address, message: &Node) -> Node {
    let ends: Vec<Node> = base_w(message)
        .iter()
        .enumerate()
        .map(|(i, digit)| {
            let mut element = [0u8; N];
            element.copy_from_slice(&signature[i * N..(i + 1) * N]);
            chain(&element, address, i as u8, *digit, W - 1 - digit)
        })
        .collect();
    compress_leaf(address, &ends)
}

fn node_hash(left: &Node, right: &Node) -> Node {
    let mut hasher = Sha256::new();
    hasher.update([PREFIX_NODE]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// All levels of a Merkle tree, leaves first
fn build_tree(seed: &[u8; N], layer: u8, tree: u32, height: u8) -> Vec<Vec<Node>> {
    let leaves: Vec<Node> = (0..1u32 << height)
        .map(|leaf| wots_leaf(seed, Address { layer, tree, leaf }))
        .collect();

    let mut levels = vec![leaves];
    while levels.last().map_or(0, |l| l.len()) > 1 {
        let next = levels[levels.len() - 1]
            .chunks(2)
            .map(|pair| node_hash(&pair[0], &pair[1]))
            .collect();
        levels.push(next);
    }
    levels
}

fn root_of(levels: &[Vec<Node>]) -> Node {
    levels[levels.len() - 1][0]
}

fn auth_path(levels: &[Vec<Node>], mut index: usize, out: &mut Vec<u8>) {
    for level in &levels[..levels.len() - 1] {
        out.extend_from_slice(&level[index ^ 1]);
        index >>= 1;
    }
}

fn root_from_path(leaf: Node, mut index: u32, path: &[u8]) -> Node {
    let mut node = leaf;
    for sibling in path.chunks(N) {
        let mut other = [0u8; N];
        other.copy_from_slice(sibling);
        node = if index & 1 == 0 {
            node_hash(&node, &other)
        } else {
            node_hash(&other, &node)
        };
        index >>= 1;
    }
    node
}

/// Derive a key pair from a seed
pub fn generate(seed: [u8; N], height: u8) -> Result<(GmssPrivateKey, GmssPublicKey)> {
    check_height(height)?;
    let levels = build_tree(&seed, TOP_LAYER, 0, height);
    let public = GmssPublicKey {
        root: root_of(&levels),
        height,
    };
    let private = GmssPrivateKey {
        seed: Zeroizing::new(seed),
        index: 0,
        height,
    };
    Ok((private, public))
}

/// Sign a message, returning the signature and the advanced key state
pub fn sign(key: &GmssPrivateKey, message: &[u8]) -> Result<(Vec<u8>, GmssPrivateKey)> {
    if key.index as u64 >= key.capacity() {
        return Err(CryptoError::KeyExhausted(key.capacity()));
    }

    let height = key.height;
    let mask = (1u32 << height) - 1;
    let top_leaf = key.index >> height;
    let bottom_leaf = key.index & mask;
    let digest: Node = Sha256::digest(message).into();

    let bottom = build_tree(&key.seed, BOTTOM_LAYER, top_leaf, height);
    let top = build_tree(&key.seed, TOP_LAYER, 0, height);

    let mut signature = Vec::with_capacity(signature_len(height));
    signature.extend_from_slice(&key.index.to_be_bytes());

    let bottom_address = Address {
        layer: BOTTOM_LAYER,
        tree: top_leaf,
        leaf: bottom_leaf,
    };
    wots_sign(&key.seed, bottom_address, &digest, &mut signature);
    auth_path(&bottom, bottom_leaf as usize, &mut signature);

    let top_address = Address {
        layer: TOP_LAYER,
        tree: 0,
        leaf: top_leaf,
    };
    wots_sign(&key.seed, top_address, &root_of(&bottom), &mut signature);
    auth_path(&top, top_leaf as usize, &mut signature);

    let next = GmssPrivateKey {
        seed: key.seed.clone(),
        index: key.index + 1,
        height,
    };
    Ok((signature, next))
}

/// Check a signature against a public key
pub fn verify(key: &GmssPublicKey, message: &[u8], signature: &[u8]) -> bool {
    let height = key.height;
    if signature.len() != signature_len(height) {
        return false;
    }

    let mut index = [0u8; 4];
    index.copy_from_slice(&signature[..4]);
    let index = u32::from_be_bytes(index);
    if index as u64 >= 1u64 << (2 * height as u32) {
        return false;
    }

    let mask = (1u32 << height) - 1;
    let top_leaf = index >> height;
    let bottom_leaf = index & mask;
    let digest: Node = Sha256::digest(message).into();

    let wots_len = WOTS_LEN * N;
    let path_len = height as usize * N;
    let mut offset = 4;
    let bottom_sig = &signature[offset..offset + wots_len];
    offset += wots_len;
    let bottom_path = &signature[offset..offset + path_len];
    offset += path_len;
    let top_sig = &signature[offset..offset + wots_len];
    offset += wots_len;
    let top_path = &signature[offset..offset + path_len];

    let bottom_address = Address {
        layer: BOTTOM_LAYER,
        tree: top_leaf,
        leaf: bottom_leaf,
    };
    let leaf = wots_leaf_from_signature(bottom_sig, bottom_address, &digest);
    let bottom_root = root_from_path(leaf, bottom_leaf, bottom_path);

    let top_address = Address {
        layer: TOP_LAYER,
        tree: 0,
        leaf: top_leaf,
    };
    let leaf = wots_leaf_from_signature(top_sig, top_address, &bottom_root);
    root_from_path(leaf, top_leaf, top_path) == key.root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_w_checksum() {
        let digits = base_w(&[0u8; N]);
        assert!(digits[..LEN1].iter().all(|d| *d == 0));
        // 64 * 15 = 960 = 0x3C0
        assert_eq!(&digits[LEN1..], &[0x3, 0xC, 0x0]);

        let digits = base_w(&[0xFF; N]);
        assert_eq!(&digits[LEN1..], &[0, 0, 0]);
    }

    #[test]
    fn test_sign_verify_advances_index() {
        let (key, public) = generate([1u8; N], 2).unwrap();
        let (sig1, key) = sign(&key, b"first").unwrap();
        let (sig2, key) = sign(&key, b"second").unwrap();
        assert_eq!(key.index, 2);
        assert_eq!(sig1.len(), signature_len(2));

        assert!(verify(&public, b"first", &sig1));
        assert!(verify(&public, b"second", &sig2));
        assert!(!verify(&public, b"second", &sig1));
    }

    #[test]
    fn test_signatures_cross_bottom_trees() {
        // Height 1: two bottom trees with two leaves each
        let (mut key, public) = generate([2u8; N], 1).unwrap();
        for i in 0..4u32 {
            let message = i.to_be_bytes();
            let (signature, next) = sign(&key, &message).unwrap();
            assert!(verify(&public, &message, &signature));
            key = next;
        }
        assert!(matches!(sign(&key, b"x"), Err(CryptoError::KeyExhausted(4))));
    }

    #[test]
    fn test_bit_flips_rejected() {
        let (key, public) = generate([3u8; N], 2).unwrap();
        let (signature, _) = sign(&key, b"data").unwrap();
        for byte in [0usize, 3, 4, 100, signature.len() / 2, signature.len() - 1] {
            let mut flipped = signature.clone();
            flipped[byte] ^= 0x01;
            assert!(!verify(&public, b"data", &flipped), "flip at {}", byte);
        }
    }

    #[test]
    fn test_key_encoding() {
        let (key, public) = generate([4u8; N], DEFAULT_HEIGHT).unwrap();
        let decoded = GmssPrivateKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(decoded.index, 0);
        assert_eq!(decoded.height, DEFAULT_HEIGHT);
        assert_eq!(decoded.remaining(), 1024);
        assert_eq!(GmssPublicKey::from_bytes(&public.to_bytes()).unwrap(), public);
        assert!(GmssPublicKey::from_bytes(&[0u8; PUBLIC_KEY_LEN]).is_err());
    }
}
