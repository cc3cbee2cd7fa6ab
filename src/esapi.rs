// SPDX-License-Identifier: LGPL-2.1-only
// Copyright (c) 2026 Red Hat, Inc.

//! [`TpmDevice`] backed by the TCG ESAPI through `tss-esapi`.

use std::fs::OpenOptions;
use std::io;
use std::str::FromStr;

use log::{debug, warn};
use tss_esapi::{
    Context, TctiNameConf,
    abstraction::{AsymmetricAlgorithmSelection, DefaultKey, ak as tss_ak, ek as tss_ek, pcr},
    constants::{StartupType, property_tag::PropertyTag},
    handles::{KeyHandle, PersistentTpmHandle, TpmHandle},
    interface_types::{algorithm::AsymmetricAlgorithm, ecc::EccCurve, key_bits::RsaKeyBits},
    structures::{AttestInfo, Data, Public, Signature, SignatureScheme},
    tcti_ldr::NetworkTPMConfig,
    traits::Marshall,
};

use crate::algorithms::{HashAlgorithm, KeyAlgorithm, SigningAlgorithm};
use crate::config::{OpenConfig, Transport};
use crate::device::{
    AkConfig, AkPublic, EkSource, EndorsementKey, Manufacturer, Quote, TpmDevice, TpmInfo,
    TpmInterface,
};
use crate::ek::{EkCertificate, ecc_field_len, ecdsa_raw, public_to_pem};
use crate::error::{Result, TpmError, is_absent};
use crate::nonce::Nonce;
use crate::pcr::{PcrSelection, PcrValue, pcr_slot};
use crate::tcg;

const EK_SLOTS: [(KeyAlgorithm, AsymmetricAlgorithmSelection, u32, u32); 2] = [
    (
        KeyAlgorithm::Rsa,
        AsymmetricAlgorithmSelection::Rsa(RsaKeyBits::Rsa2048),
        tcg::NV_INDEX_RSA_EK_CERT,
        tcg::PERSISTENT_RSA_EK,
    ),
    (
        KeyAlgorithm::Ecc,
        AsymmetricAlgorithmSelection::Ecc(EccCurve::NistP256),
        tcg::NV_INDEX_ECC_EK_CERT,
        tcg::PERSISTENT_ECC_EK,
    ),
];

/// A loaded attestation key.
#[derive(Debug)]
pub struct LoadedAk {
    handle: KeyHandle,
    /// Coordinate size of an ECC key, used to pad its signatures.
    ecc_field_len: Option<usize>,
}

pub struct EsapiDevice {
    context: Option<Context>,
    interface: TpmInterface,
}

impl EsapiDevice {
    pub fn open(config: &OpenConfig) -> Result<Self> {
        let transport = config.resolve(|path| path.exists())?;
        debug!("opening TPM via {transport:?}");

        let context = match &transport {
            Transport::Device { path, .. } => open_device(path)?,
            Transport::Simulator(uri) => connect_and_reset_simulator(uri)?,
            Transport::Tbs => Context::new(tbs_tcti()?)
                .map_err(|e| TpmError::from_tss("open TBS", e, TpmError::NotFound))?,
        };

        Ok(Self {
            context: Some(context),
            interface: transport.interface(),
        })
    }

    fn context(&mut self) -> Result<&mut Context> {
        self.context
            .as_mut()
            .ok_or_else(|| TpmError::Communication("TPM context is closed".to_string()))
    }
}

/* The TCTI loader reports a missing or inaccessible device as a generic
   failure, so access is probed first to tell the two apart. */
fn open_device(path: &str) -> Result<Context> {
    match OpenOptions::new().read(true).write(true).open(path) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(TpmError::PermissionDenied(path.to_string()));
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(TpmError::NotFound(format!("{path} does not exist")));
        }
        Err(e) => return Err(TpmError::Communication(format!("{path}: {e}"))),
    }

    let tcti = TctiNameConf::from_str(&format!("device:{path}")).map_err(|e| {
        TpmError::from_tss("parse device TCTI", e, TpmError::Communication)
    })?;
    Context::new(tcti).map_err(|e| TpmError::from_tss("open TPM device", e, TpmError::Communication))
}

/* Connects to the simulator and performs a Shutdown(Clear) + Startup(Clear)
   cycle, which a freshly started simulator requires. */
fn connect_and_reset_simulator(uri: &str) -> Result<Context> {
    let config = NetworkTPMConfig::from_str(uri).map_err(|e| {
        TpmError::from_tss("parse simulator address", e, TpmError::Communication)
    })?;
    let mut ctx = Context::new(TctiNameConf::Mssim(config))
        .map_err(|e| TpmError::from_tss("connect to simulator", e, TpmError::NotFound))?;

    /* Shutdown fails when the simulator was never started up, only Startup
       has to succeed. */
    let _ = ctx.shutdown(StartupType::Clear);

    ctx.startup(StartupType::Clear)
        .map_err(|e| TpmError::from_tss("start up simulator", e, TpmError::Communication))?;
    Ok(ctx)
}

#[cfg(windows)]
fn tbs_tcti() -> Result<TctiNameConf> {
    Ok(TctiNameConf::Tbs)
}

#[cfg(not(windows))]
fn tbs_tcti() -> Result<TctiNameConf> {
    Err(TpmError::PlatformUnsupported("tbs"))
}

fn property(ctx: &mut Context, tag: PropertyTag) -> Result<Option<u32>> {
    ctx.get_tpm_property(tag)
        .map_err(|e| TpmError::from_tss("read TPM properties", e, TpmError::Communication))
}

/* Reads the public area behind a persistent handle, if the handle exists. */
fn read_persistent_public(ctx: &mut Context, handle: u32) -> tss_esapi::Result<Public> {
    let tpm_handle = TpmHandle::Persistent(PersistentTpmHandle::new(handle)?);
    let mut object = ctx.execute_without_session(|ctx| ctx.tr_from_tpm_public(tpm_handle))?;
    let public = ctx.read_public(object.into()).map(|(public, _, _)| public);
    ctx.tr_close(&mut object)?;
    public
}

fn create_and_load_ak(
    ctx: &mut Context,
    ek_handle: KeyHandle,
    config: &AkConfig,
) -> tss_esapi::Result<(KeyHandle, Public)> {
    let ak = tss_ak::create_ak(
        ctx,
        ek_handle,
        config.hash.into(),
        config.algorithm.into(),
        None,
        DefaultKey,
    )?;
    let handle = tss_ak::load_ak(ctx, ek_handle, None, ak.out_private, ak.out_public.clone())?;
    Ok((handle, ak.out_public))
}

/* Looks every EK up by its certificate, then by its persistent handle.
   Absent indices and handles are skipped, any other failure is returned. */
fn find_endorsement_keys<C>(
    ctx: &mut C,
    read_cert: impl Fn(&mut C, AsymmetricAlgorithmSelection) -> tss_esapi::Result<Vec<u8>>,
    read_public: impl Fn(&mut C, u32) -> tss_esapi::Result<Public>,
) -> Result<Vec<EndorsementKey>> {
    let mut keys = Vec::new();

    for (algorithm, tss_alg, nv_index, persistent) in EK_SLOTS {
        match read_cert(ctx, tss_alg) {
            Ok(der) => {
                let cert = EkCertificate::from_der(&der)?;
                keys.push(EndorsementKey {
                    algorithm,
                    public_pem: cert.public_key_pem()?,
                    source: EkSource::Certificate(cert),
                });
                continue;
            }
            Err(e) if is_absent(&e) => {
                debug!("no {algorithm} EK certificate at NV index {nv_index:#x}: {e}")
            }
            Err(e) => {
                return Err(TpmError::from_tss("read EK certificate", e, TpmError::Communication));
            }
        }

        match read_public(ctx, persistent) {
            Ok(public) => keys.push(EndorsementKey {
                algorithm,
                public_pem: public_to_pem(&public)?,
                source: EkSource::Persistent(persistent),
            }),
            Err(e) if is_absent(&e) => {
                debug!("no {algorithm} EK at persistent handle {persistent:#x}: {e}")
            }
            Err(e) => {
                return Err(TpmError::from_tss("read persistent EK", e, TpmError::Communication));
            }
        }
    }

    Ok(keys)
}

fn raw_signature(
    signature: &Signature,
    ecc_field_len: Option<usize>,
) -> Result<(SigningAlgorithm, Vec<u8>)> {
    match signature {
        Signature::RsaSsa(sig) => Ok((SigningAlgorithm::RsaSsa, sig.signature().value().to_vec())),
        Signature::EcDsa(sig) => {
            let field_len = ecc_field_len.ok_or_else(|| {
                TpmError::Signing("ECDSA signature from a key that is not ECC".to_string())
            })?;
            Ok((
                SigningAlgorithm::EcDsa,
                ecdsa_raw(sig.signature_r().value(), sig.signature_s().value(), field_len)?,
            ))
        }
        other => Err(TpmError::Signing(format!(
            "unexpected signature algorithm {:?}",
            other.algorithm()
        ))),
    }
}

impl TpmDevice for EsapiDevice {
    type Key = LoadedAk;

    fn info(&mut self) -> Result<TpmInfo> {
        let interface = self.interface;
        let ctx = self.context()?;

        let manufacturer = property(ctx, PropertyTag::Manufacturer)?.ok_or_else(|| {
            TpmError::Communication("TPM did not report a manufacturer".to_string())
        })?;

        let mut vendor = Vec::with_capacity(4);
        for tag in [
            PropertyTag::VendorString1,
            PropertyTag::VendorString2,
            PropertyTag::VendorString3,
            PropertyTag::VendorString4,
        ] {
            vendor.push(property(ctx, tag)?.unwrap_or(0));
        }

        let firmware = property(ctx, PropertyTag::FirmwareVersion1)?.unwrap_or(0);
        let family = property(ctx, PropertyTag::FamilyIndicator)?.unwrap_or(0);

        Ok(TpmInfo {
            manufacturer: Manufacturer::from_id(manufacturer),
            vendor_info: tcg::property_string(&vendor),
            firmware_major: (firmware >> 16) as u16,
            firmware_minor: (firmware & 0xffff) as u16,
            family: tcg::property_string(&[family]),
            interface,
        })
    }

    fn endorsement_keys(&mut self) -> Result<Vec<EndorsementKey>> {
        let ctx = self.context()?;
        find_endorsement_keys(ctx, tss_ek::retrieve_ek_pubcert, read_persistent_public)
    }

    fn create_ak(&mut self, config: &AkConfig) -> Result<(LoadedAk, AkPublic)> {
        let ctx = self.context()?;

        let ek_handle = tss_ek::create_ek_object(ctx, AsymmetricAlgorithm::Rsa, DefaultKey)
            .map_err(|e| TpmError::from_tss("create EK primary", e, TpmError::KeyCreation))?;

        let created = create_and_load_ak(ctx, ek_handle, config);
        if let Err(e) = ctx.flush_context(ek_handle.into()) {
            warn!("failed to flush EK primary: {e}");
        }
        let (handle, public) = created
            .map_err(|e| TpmError::from_tss("create attestation key", e, TpmError::KeyCreation))?;

        let described = public_to_pem(&public)
            .and_then(|pem| Ok((pem, ecc_field_len(&public)?)));
        match described {
            Ok((public_pem, ecc_field_len)) => Ok((
                LoadedAk {
                    handle,
                    ecc_field_len,
                },
                AkPublic {
                    algorithm: config.algorithm,
                    public_pem,
                },
            )),
            Err(e) => {
                if let Err(flush_err) = ctx.flush_context(handle.into()) {
                    warn!("failed to flush attestation key: {flush_err}");
                }
                Err(e)
            }
        }
    }

    fn quote(
        &mut self,
        key: &LoadedAk,
        nonce: &Nonce,
        hash: HashAlgorithm,
        pcrs: &PcrSelection,
    ) -> Result<Quote> {
        let ctx = self.context()?;
        let selection = pcrs.to_selection_list(hash)?;
        let data = Data::try_from(nonce.as_bytes())
            .map_err(|e| TpmError::MalformedNonce(e.to_string()))?;

        let pcr_data = ctx
            .execute_without_session(|ctx| pcr::read_all(ctx, selection.clone()))
            .map_err(|e| TpmError::from_tss("read PCRs", e, TpmError::Communication))?;

        // the key's own scheme signs; `hash` only picks the PCR bank
        let (attest, signature) = ctx
            .execute_with_nullauth_session(|ctx| {
                ctx.quote(key.handle, data, SignatureScheme::Null, selection)
            })
            .map_err(|e| TpmError::from_tss("quote", e, TpmError::Signing))?;

        let bank = pcr_data.pcr_bank(hash.into()).ok_or_else(|| {
            TpmError::Communication(format!("TPM returned no {hash} PCR bank"))
        })?;
        let values = pcrs
            .indices()
            .iter()
            .map(|&index| {
                bank.get_digest(pcr_slot(index))
                    .map(|digest| PcrValue {
                        index,
                        digest: digest.value().to_vec(),
                    })
                    .ok_or_else(|| {
                        TpmError::Communication(format!("TPM returned no value for PCR {index}"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        if let AttestInfo::Quote { info } = attest.attested() {
            let composite: Vec<u8> = values.iter().flat_map(|v| v.digest.clone()).collect();
            let digest = openssl::hash::hash(hash.message_digest(), &composite)?;
            if info.pcr_digest().value() != &digest[..] {
                warn!("PCRs changed between reading them and quoting them");
            }
        }

        let (signing, raw) = raw_signature(&signature, key.ecc_field_len)?;
        let attest = attest
            .marshall()
            .map_err(|e| TpmError::from_tss("marshall attestation", e, TpmError::Signing))?;

        Ok(Quote {
            attest,
            signature: raw,
            signing,
            hash,
            pcrs: values,
        })
    }

    fn flush(&mut self, key: LoadedAk) -> Result<()> {
        self.context()?
            .flush_context(key.handle.into())
            .map_err(|e| TpmError::from_tss("flush attestation key", e, TpmError::Communication))
    }

    fn close(&mut self) -> Result<()> {
        let mut ctx = self.context.take().ok_or(TpmError::AlreadyClosed)?;
        ctx.clear_sessions();
        Ok(())
    }
}
