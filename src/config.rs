// SPDX-License-Identifier: LGPL-2.1-only
// Copyright (c) 2026 Red Hat, Inc.

use std::path::Path;

use crate::algorithms::HashAlgorithm;
use crate::device::{AkConfig, TpmInterface};
use crate::error::{Result, TpmError};

/// Connection string of the reference TPM simulator.
pub const DEFAULT_SIMULATOR: &str = "host=localhost,port=2321";
pub const TPMRM_DEVICE: &str = "/dev/tpmrm0";
pub const TPM_DEVICE: &str = "/dev/tpm0";

/// Length of the nonce sent with each quote.
pub const NONCE_LEN: usize = 20;

/// PCRs quoted by the attestation run: firmware code and Secure Boot state.
pub const QUOTED_PCRS: [i64; 2] = [0, 7];

/// Which transport to try when opening the TPM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommandChannel {
    /// TBS on Windows, otherwise the resource manager device, then the raw
    /// device. A configured simulator takes precedence.
    #[default]
    Auto,
    KernelManaged,
    Direct,
    Simulator,
    Tbs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenConfig {
    pub channel: CommandChannel,
    /// mssim connection string, e.g. "host=localhost,port=2321".
    pub simulator: Option<String>,
}

/// Resolved transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Device { path: String, interface: TpmInterface },
    Simulator(String),
    Tbs,
}

impl Transport {
    pub fn interface(&self) -> TpmInterface {
        match self {
            Transport::Device { interface, .. } => *interface,
            Transport::Simulator(_) => TpmInterface::Simulator,
            Transport::Tbs => TpmInterface::Windows,
        }
    }
}

impl OpenConfig {
    /* Picks the transport without touching it. `exists` is injected so the
       device probing order can be tested. */
    pub fn resolve(&self, exists: impl Fn(&Path) -> bool) -> Result<Transport> {
        let device = |path: &str, interface| {
            if exists(Path::new(path)) {
                Ok(Transport::Device {
                    path: path.to_string(),
                    interface,
                })
            } else {
                Err(TpmError::NotFound(format!("{path} does not exist")))
            }
        };
        let simulator = || {
            Transport::Simulator(
                self.simulator
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SIMULATOR.to_string()),
            )
        };

        match self.channel {
            CommandChannel::Auto if self.simulator.is_some() => Ok(simulator()),
            CommandChannel::Auto if cfg!(windows) => Ok(Transport::Tbs),
            CommandChannel::Auto => device(TPMRM_DEVICE, TpmInterface::KernelManaged)
                .or_else(|_| device(TPM_DEVICE, TpmInterface::Direct))
                .map_err(|_| {
                    TpmError::NotFound(format!("neither {TPMRM_DEVICE} nor {TPM_DEVICE} exists"))
                }),
            CommandChannel::KernelManaged => device(TPMRM_DEVICE, TpmInterface::KernelManaged),
            CommandChannel::Direct => device(TPM_DEVICE, TpmInterface::Direct),
            CommandChannel::Simulator => Ok(simulator()),
            CommandChannel::Tbs if cfg!(windows) => Ok(Transport::Tbs),
            CommandChannel::Tbs => Err(TpmError::PlatformUnsupported("tbs")),
        }
    }
}

/// Everything the attestation run needs besides the nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestConfig {
    pub open: OpenConfig,
    pub ak: AkConfig,
    pub hash: HashAlgorithm,
    pub pcrs: Vec<i64>,
}

impl Default for AttestConfig {
    fn default() -> Self {
        Self {
            open: OpenConfig::default(),
            ak: AkConfig::default(),
            hash: HashAlgorithm::Sha256,
            pcrs: QUOTED_PCRS.to_vec(),
        }
    }
}
