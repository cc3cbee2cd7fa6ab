// SPDX-License-Identifier: LGPL-2.1-only
// Copyright (c) 2026 Red Hat, Inc.

use openssl::{hash::MessageDigest, rand::rand_bytes};

use crate::error::{Result, TpmError};

/// Largest qualifying data a TPM2B_DATA can carry.
pub const MAX_NONCE_SIZE: usize = 64;

/// Qualifying data bound into a quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce(Vec<u8>);

impl Nonce {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        check_len(bytes.len())?;
        Ok(Self(bytes))
    }

    /// `len` bytes from the OpenSSL CSPRNG.
    pub fn random(len: usize) -> Result<Self> {
        check_len(len)?;
        let mut buf = vec![0; len];
        rand_bytes(&mut buf)?;
        Ok(Self(buf))
    }

    /* SHA-256 of a fixed label, truncated to `len`. The same label always
       yields the same nonce, so this does not protect against replay. */
    pub fn from_label(label: &str, len: usize) -> Result<Self> {
        let digest = openssl::hash::hash(MessageDigest::sha256(), label.as_bytes())?;
        if len > digest.len() {
            return Err(TpmError::MalformedNonce(format!(
                "a SHA-256 label nonce has at most {} bytes, {len} requested",
                digest.len()
            )));
        }
        Self::new(digest[..len].to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn check_len(len: usize) -> Result<()> {
    if len > MAX_NONCE_SIZE {
        return Err(TpmError::MalformedNonce(format!(
            "{len} bytes, at most {MAX_NONCE_SIZE} are allowed"
        )));
    }
    Ok(())
}
