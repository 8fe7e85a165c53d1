//! Laplace noise drawn from a keyed pseudorandom function, so the noise of
//! a tree node is a deterministic function of the key and the node.
//!
//! Like any floating-point Laplace sampler this is exposed to the
//! least-significant-bits attack of Mironov, CCS 2012.

use std::fmt;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes256;
use rand::RngCore;
use sha2::{Digest, Sha256};

use hillview_types::error::{HillviewError, Result};

/// 2^-53: spacing of the uniform samples.
const NORMALIZER: f64 = 1.0 / (1u64 << 53) as f64;

pub struct SecureLaplace {
    cipher: Aes256,
}

impl fmt::Debug for SecureLaplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureLaplace")
    }
}

impl SecureLaplace {
    /// AES-256 keyed by the SHA-256 digest of `key_material`.
    pub fn new(key_material: &[u8]) -> Result<Self> {
        let digest = Sha256::digest(key_material);
        let cipher = Aes256::new_from_slice(&digest)
            .map_err(|e| HillviewError::Config(format!("Bad noise key: {}", e)))?;
        Ok(SecureLaplace { cipher })
    }

    /// A fresh random key.
    pub fn random() -> Result<Self> {
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self::new(&key)
    }

    fn uniform(&self, block: [u8; 16]) -> f64 {
        let mut block = GenericArray::from(block);
        self.cipher.encrypt_block(&mut block);
        let mut word = [0u8; 8];
        word.copy_from_slice(&block[..8]);
        (u64::from_be_bytes(word) >> 11) as f64 * NORMALIZER
    }

    fn laplace(uniform: f64, scale: f64) -> f64 {
        let r = 0.5 - uniform;
        let tail = (1.0 - 2.0 * r.abs()).max(f64::MIN_POSITIVE).ln();
        if r < 0.0 {
            -scale * tail
        } else {
            scale * tail
        }
    }

    /// Uniform in `[0, 1)` on a 2^-53 grid, indexed by a tree node.
    pub fn sample_uniform(&self, (start, len): (usize, usize)) -> f64 {
        let mut block = [0u8; 16];
        block[..8].copy_from_slice(&(start as u64).to_be_bytes());
        block[8..].copy_from_slice(&(len as u64).to_be_bytes());
        self.uniform(block)
    }

    /// `Laplace(0, scale)` noise for a tree node.
    pub fn sample_laplace(&self, node: (usize, usize), scale: f64) -> f64 {
        Self::laplace(self.sample_uniform(node), scale)
    }

    /// `Laplace(0, scale)` noise for a node of a two-dimensional tree.
    pub fn sample_laplace_2d(
        &self,
        (x_start, x_len): (usize, usize),
        (y_start, y_len): (usize, usize),
        scale: f64,
    ) -> f64 {
        let mut block = [0u8; 16];
        for (i, v) in [x_start, x_len, y_start, y_len].into_iter().enumerate() {
            block[4 * i..4 * i + 4].copy_from_slice(&(v as u32).to_be_bytes());
        }
        Self::laplace(self.uniform(block), scale)
    }
}
