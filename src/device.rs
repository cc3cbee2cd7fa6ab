// SPDX-License-Identifier: LGPL-2.1-only
// Copyright (c) 2026 Red Hat, Inc.

//! The operations the attestation workflow needs from a TPM, and the values
//! they produce.

use std::fmt;

use crate::algorithms::{HashAlgorithm, KeyAlgorithm, SigningAlgorithm};
use crate::ek::EkCertificate;
use crate::error::Result;
use crate::nonce::Nonce;
use crate::pcr::{PcrSelection, PcrValue};
use crate::tcg;

/// Platform TPM access layer.
///
/// Implementations own the transport. They are driven through
/// [`TpmSession`](crate::session::TpmSession), which guarantees that every
/// key is flushed and that `close` runs exactly once.
pub trait TpmDevice {
    /// Handle of a loaded attestation key.
    type Key;

    fn info(&mut self) -> Result<TpmInfo>;

    fn endorsement_keys(&mut self) -> Result<Vec<EndorsementKey>>;

    fn create_ak(&mut self, config: &AkConfig) -> Result<(Self::Key, AkPublic)>;

    fn quote(
        &mut self,
        key: &Self::Key,
        nonce: &Nonce,
        hash: HashAlgorithm,
        pcrs: &PcrSelection,
    ) -> Result<Quote>;

    fn flush(&mut self, key: Self::Key) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// How the TPM is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmInterface {
    /// Raw character device, no resource manager.
    Direct,
    /// In-kernel resource manager.
    KernelManaged,
    /// TCP connection to a TPM simulator.
    Simulator,
    /// Windows TPM Base Services.
    Windows,
}

impl fmt::Display for TpmInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TpmInterface::Direct => "direct",
            TpmInterface::KernelManaged => "kernel-managed",
            TpmInterface::Simulator => "simulator",
            TpmInterface::Windows => "windows-tbs",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manufacturer {
    /// Raw TPM_PT_MANUFACTURER.
    pub id: u32,
    /// The id as ASCII, e.g. "IFX".
    pub ascii: String,
    pub name: Option<&'static str>,
}

impl Manufacturer {
    pub fn from_id(id: u32) -> Self {
        let ascii = tcg::manufacturer_ascii(id);
        let name = tcg::vendor_name(&ascii);
        Self { id, ascii, name }
    }
}

impl fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => write!(f, "{} ({})", name, self.ascii),
            None if self.ascii.is_empty() => write!(f, "{:#010x}", self.id),
            None => f.write_str(&self.ascii),
        }
    }
}

/// Static identity of the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmInfo {
    pub manufacturer: Manufacturer,
    pub vendor_info: String,
    pub firmware_major: u16,
    pub firmware_minor: u16,
    pub family: String,
    pub interface: TpmInterface,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EkSource {
    /// Public key taken from the EK certificate in NV.
    Certificate(EkCertificate),
    /// Public area read from a persistent handle.
    Persistent(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndorsementKey {
    pub algorithm: KeyAlgorithm,
    pub public_pem: String,
    pub source: EkSource,
}

/// Options for a new attestation key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AkConfig {
    pub algorithm: SigningAlgorithm,
    /// Digest bound to the key's signing scheme.
    pub hash: HashAlgorithm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AkPublic {
    pub algorithm: SigningAlgorithm,
    pub public_pem: String,
}

/// A signed statement over PCR values and a nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    /// Marshalled TPMS_ATTEST that the signature covers.
    pub attest: Vec<u8>,
    /// Raw signature bytes. For ECDSA this is r followed by s.
    pub signature: Vec<u8>,
    pub signing: SigningAlgorithm,
    pub hash: HashAlgorithm,
    pub pcrs: Vec<PcrValue>,
}
