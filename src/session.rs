// SPDX-License-Identifier: LGPL-2.1-only
// Copyright (c) 2026 Red Hat, Inc.

//! Scoped ownership of a TPM and the attestation keys created on it.
//!
//! A [`TpmSession`] is closed exactly once: by [`TpmSession::close`] or when
//! it is dropped. An [`AttestationKey`] borrows the session that created it,
//! so the session cannot be closed while the key is alive, and the key is
//! flushed from the TPM when it is closed or dropped.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};

use crate::algorithms::HashAlgorithm;
use crate::config::OpenConfig;
use crate::device::{AkConfig, AkPublic, EndorsementKey, Quote, TpmDevice, TpmInfo};
use crate::error::{Result, TpmError};
use crate::esapi::EsapiDevice;
use crate::nonce::Nonce;
use crate::pcr::PcrSelection;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub struct TpmSession<D: TpmDevice> {
    id: u64,
    device: RefCell<Option<D>>,
}

impl TpmSession<EsapiDevice> {
    /// Opens the platform TPM selected by `config`.
    pub fn open(config: &OpenConfig) -> Result<Self> {
        Ok(Self::from_device(EsapiDevice::open(config)?))
    }
}

impl<D: TpmDevice> TpmSession<D> {
    pub fn from_device(device: D) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        debug!("TPM session {id} opened");
        Self {
            id,
            device: RefCell::new(Some(device)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.device.borrow().is_some()
    }

    pub fn info(&self) -> Result<TpmInfo> {
        self.with_device(|d| d.info())
    }

    pub fn endorsement_keys(&self) -> Result<Vec<EndorsementKey>> {
        self.with_device(|d| d.endorsement_keys())
    }

    pub fn new_ak(&self, config: &AkConfig) -> Result<AttestationKey<'_, D>> {
        let (key, public) = self.with_device(|d| d.create_ak(config))?;
        debug!("attestation key ({}) created in session {}", public.algorithm, self.id);
        Ok(AttestationKey {
            session: self,
            key: Some(key),
            public,
        })
    }

    /// Quotes the PCRs in `pcrs` from the `hash` bank, signed by `ak`.
    pub fn quote_pcrs(
        &self,
        ak: &AttestationKey<'_, D>,
        nonce: &Nonce,
        hash: HashAlgorithm,
        pcrs: &PcrSelection,
    ) -> Result<Quote> {
        if ak.session.id != self.id {
            return Err(TpmError::InvalidHandle);
        }
        let key = ak.key.as_ref().ok_or(TpmError::InvalidHandle)?;
        self.with_device(|d| d.quote(key, nonce, hash, pcrs))
    }

    /// Releases the TPM. A second call fails with `AlreadyClosed`.
    pub fn close(&mut self) -> Result<()> {
        let mut device = self.device.get_mut().take().ok_or(TpmError::AlreadyClosed)?;
        debug!("closing TPM session {}", self.id);
        device.close()
    }

    fn with_device<T>(&self, f: impl FnOnce(&mut D) -> Result<T>) -> Result<T> {
        let mut guard = self.device.borrow_mut();
        let device = guard
            .as_mut()
            .ok_or_else(|| TpmError::Communication("TPM session is closed".to_string()))?;
        f(device)
    }
}

impl<D: TpmDevice> Drop for TpmSession<D> {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(err) = self.close() {
                warn!("failed to close TPM session {}: {}", self.id, err);
            }
        }
    }
}

/// A TPM-resident signing key owned by the session that created it.
pub struct AttestationKey<'s, D: TpmDevice> {
    session: &'s TpmSession<D>,
    key: Option<D::Key>,
    public: AkPublic,
}

impl<D: TpmDevice> AttestationKey<'_, D> {
    pub fn public(&self) -> &AkPublic {
        &self.public
    }

    /// Flushes the key from the TPM.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        match self.key.take() {
            Some(key) => {
                debug!("flushing attestation key from session {}", self.session.id);
                self.session.with_device(|d| d.flush(key))
            }
            None => Ok(()),
        }
    }
}

impl<D: TpmDevice> Drop for AttestationKey<'_, D> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("failed to flush attestation key: {}", err);
        }
    }
}
