// SPDX-License-Identifier: LGPL-2.1-only
// Copyright (c) 2026 Red Hat, Inc.

//! Software TPM used by the unit tests.
//!
//! Keys live in OpenSSL, PCR banks hold fixed digests, and the "attest"
//! structure is a simple concatenation of the values a real TPMS_ATTEST
//! binds: PCR digest, nonce, and signer name.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use openssl::{
    ec::{EcGroup, EcKey},
    ecdsa::EcdsaSig,
    hash::hash,
    nid::Nid,
    pkey::{PKey, Private},
    rsa::Rsa,
    sign::Signer,
};

use crate::algorithms::{HashAlgorithm, KeyAlgorithm, SigningAlgorithm};
use crate::device::{
    AkConfig, AkPublic, EkSource, EndorsementKey, Manufacturer, Quote, TpmDevice, TpmInfo,
    TpmInterface,
};
use crate::ek::ecdsa_raw;
use crate::error::{Result, TpmError};
use crate::nonce::Nonce;
use crate::pcr::{PcrSelection, PcrValue};
use crate::tcg;

const DEFAULT_OBJECT_SLOTS: usize = 3;
const ATTEST_MAGIC: &[u8] = b"\xffTCG";

/// Step at which the fake fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Info,
    EndorsementKeys,
    CreateAk,
    Quote,
}

/// Shared view of what the fake has been asked to release.
#[derive(Clone, Default)]
pub struct Counters {
    closes: Rc<Cell<u32>>,
    flushes: Rc<Cell<u32>>,
    loaded: Rc<Cell<usize>>,
}

impl Counters {
    pub fn closes(&self) -> u32 {
        self.closes.get()
    }

    pub fn flushes(&self) -> u32 {
        self.flushes.get()
    }

    pub fn loaded(&self) -> usize {
        self.loaded.get()
    }
}

pub struct FakeTpm {
    manufacturer: u32,
    eks: Vec<EndorsementKey>,
    slots: usize,
    fail_at: Option<FailAt>,
    keys: HashMap<u32, (PKey<Private>, AkConfig)>,
    next_handle: u32,
    counters: Counters,
}

impl FakeTpm {
    pub fn new() -> Self {
        Self {
            // "IBM "
            manufacturer: 0x4942_4d20,
            eks: Vec::new(),
            slots: DEFAULT_OBJECT_SLOTS,
            fail_at: None,
            keys: HashMap::new(),
            next_handle: 0x8000_0000,
            counters: Counters::default(),
        }
    }

    pub fn counters(&self) -> Counters {
        self.counters.clone()
    }

    pub fn with_object_slots(mut self, slots: usize) -> Self {
        self.slots = slots;
        self
    }

    pub fn failing_at(mut self, step: FailAt) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// Provisions an RSA EK at the TCG persistent handle.
    pub fn with_persistent_ek(mut self) -> Self {
        let key = Rsa::generate(2048).unwrap();
        let pem = PKey::from_rsa(key).unwrap().public_key_to_pem().unwrap();
        self.eks.push(EndorsementKey {
            algorithm: KeyAlgorithm::Rsa,
            public_pem: String::from_utf8(pem).unwrap(),
            source: EkSource::Persistent(tcg::PERSISTENT_RSA_EK),
        });
        self
    }

    fn check(&self, step: FailAt) -> Result<()> {
        if self.fail_at != Some(step) {
            return Ok(());
        }
        Err(match step {
            FailAt::Info => TpmError::Communication("capability query timed out".into()),
            FailAt::EndorsementKeys => TpmError::Parse {
                what: "EK certificate",
                reason: "truncated".into(),
            },
            FailAt::CreateAk => TpmError::KeyCreation("TPM_RC_FAILURE".into()),
            FailAt::Quote => TpmError::Signing("TPM_RC_SCHEME".into()),
        })
    }

    fn pcr_value(alg: HashAlgorithm, index: u8) -> Result<Vec<u8>> {
        Ok(hash(alg.message_digest(), &[index])?.to_vec())
    }
}

impl TpmDevice for FakeTpm {
    type Key = u32;

    fn info(&mut self) -> Result<TpmInfo> {
        self.check(FailAt::Info)?;
        Ok(TpmInfo {
            manufacturer: Manufacturer::from_id(self.manufacturer),
            vendor_info: "SW   TPM".to_string(),
            firmware_major: 0x2019,
            firmware_minor: 0x1023,
            family: "2.0".to_string(),
            interface: TpmInterface::Simulator,
        })
    }

    fn endorsement_keys(&mut self) -> Result<Vec<EndorsementKey>> {
        self.check(FailAt::EndorsementKeys)?;
        Ok(self.eks.clone())
    }

    fn create_ak(&mut self, config: &AkConfig) -> Result<(u32, AkPublic)> {
        self.check(FailAt::CreateAk)?;
        if self.keys.len() >= self.slots {
            return Err(TpmError::ResourceExhausted(
                "create attestation key: TPM_RC_OBJECT_MEMORY".into(),
            ));
        }
        let key = match config.algorithm {
            SigningAlgorithm::RsaSsa => PKey::from_rsa(Rsa::generate(2048)?)?,
            SigningAlgorithm::EcDsa => {
                let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
                PKey::from_ec_key(EcKey::generate(&group)?)?
            }
        };
        let public = AkPublic {
            algorithm: config.algorithm,
            public_pem: String::from_utf8_lossy(&key.public_key_to_pem()?).into_owned(),
        };

        let handle = self.next_handle;
        self.next_handle += 1;
        self.keys.insert(handle, (key, *config));
        self.counters.loaded.set(self.keys.len());
        Ok((handle, public))
    }

    fn quote(
        &mut self,
        key: &u32,
        nonce: &Nonce,
        hash_alg: HashAlgorithm,
        pcrs: &PcrSelection,
    ) -> Result<Quote> {
        self.check(FailAt::Quote)?;
        let (pkey, config) = self.keys.get(key).ok_or(TpmError::InvalidHandle)?;

        let pcrs = pcrs
            .indices()
            .iter()
            .map(|&index| {
                Ok(PcrValue {
                    index,
                    digest: Self::pcr_value(hash_alg, index)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let composite: Vec<u8> = pcrs.iter().flat_map(|p| p.digest.clone()).collect();
        let name = hash(config.hash.message_digest(), &pkey.public_key_to_der()?)?;

        let mut attest = ATTEST_MAGIC.to_vec();
        attest.extend_from_slice(&name);
        attest.extend_from_slice(nonce.as_bytes());
        attest.extend_from_slice(&hash(hash_alg.message_digest(), &composite)?);

        let signature = match config.algorithm {
            SigningAlgorithm::RsaSsa => {
                let mut signer = Signer::new(config.hash.message_digest(), pkey)?;
                signer.update(&attest)?;
                signer.sign_to_vec()?
            }
            SigningAlgorithm::EcDsa => {
                let digest = hash(config.hash.message_digest(), &attest)?;
                let sig = EcdsaSig::sign(&digest, &pkey.ec_key()?)?;
                ecdsa_raw(&sig.r().to_vec(), &sig.s().to_vec(), 32)?
            }
        };

        Ok(Quote {
            attest,
            signature,
            signing: config.algorithm,
            hash: hash_alg,
            pcrs,
        })
    }

    fn flush(&mut self, key: u32) -> Result<()> {
        self.keys.remove(&key).ok_or(TpmError::InvalidHandle)?;
        self.counters.flushes.set(self.counters.flushes.get() + 1);
        self.counters.loaded.set(self.keys.len());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.counters.closes.set(self.counters.closes.get() + 1);
        Ok(())
    }
}
