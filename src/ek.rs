// SPDX-License-Identifier: LGPL-2.1-only
// Copyright (c) 2026 Red Hat, Inc.

//! EK certificate parsing and public key encoding.

use openssl::{
    bn::BigNum,
    ec::{EcGroup, EcKey},
    nid::Nid,
    pkey::{PKey, Public as PKeyPublic},
    rsa::Rsa,
};
use tss_esapi::{interface_types::ecc::EccCurve, structures::Public};
use x509_cert::{
    Certificate,
    der::{Decode, Encode, oid::ObjectIdentifier},
    ext::pkix::{SubjectAltName, name::GeneralName},
    name::Name,
};

use crate::error::{Result, TpmError};
use crate::tcg::{OID_TPM_MANUFACTURER, OID_TPM_MODEL, OID_TPM_VERSION};

const OID_SUBJECT_ALT_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.17");
const RSA_DEFAULT_EXPONENT: u32 = 65537;

/// TPM attributes from the subject alternative name of an EK certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmAttributes {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EkCertificate {
    pub der: Vec<u8>,
    pub subject: String,
    pub issuer: String,
    pub tpm: TpmAttributes,
    /// SubjectPublicKeyInfo, DER encoded.
    pub public_key_der: Vec<u8>,
}

impl EkCertificate {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let cert = Certificate::from_der(der)?;
        let tbs = &cert.tbs_certificate;

        let mut tpm = TpmAttributes::default();
        for ext in tbs.extensions.iter().flatten() {
            if ext.extn_id != OID_SUBJECT_ALT_NAME {
                continue;
            }
            let san = SubjectAltName::from_der(ext.extn_value.as_bytes())?;
            for name in &san.0 {
                if let GeneralName::DirectoryName(dir) = name {
                    tpm.merge(tpm_attributes(dir));
                }
            }
        }

        Ok(Self {
            der: der.to_vec(),
            subject: tbs.subject.to_string(),
            issuer: tbs.issuer.to_string(),
            tpm,
            public_key_der: tbs.subject_public_key_info.to_der()?,
        })
    }

    pub fn public_key_pem(&self) -> Result<String> {
        let pkey = PKey::public_key_from_der(&self.public_key_der)?;
        pem_string(&pkey)
    }
}

impl TpmAttributes {
    fn merge(&mut self, other: TpmAttributes) {
        self.manufacturer = self.manufacturer.take().or(other.manufacturer);
        self.model = self.model.take().or(other.model);
        self.version = self.version.take().or(other.version);
    }
}

/* The TCG attributes may be spread over several RDNs or share a single
   multi-valued one, so every attribute is inspected. */
pub fn tpm_attributes(name: &Name) -> TpmAttributes {
    let mut attrs = TpmAttributes::default();
    for rdn in name.0.iter() {
        for atv in rdn.0.iter() {
            let value = String::from_utf8_lossy(atv.value.value()).into_owned();
            if atv.oid == OID_TPM_MANUFACTURER {
                attrs.manufacturer = Some(value);
            } else if atv.oid == OID_TPM_MODEL {
                attrs.model = Some(value);
            } else if atv.oid == OID_TPM_VERSION {
                attrs.version = Some(value);
            }
        }
    }
    attrs
}

/* Converts a TPM public area to PEM. TPM format is different from openssl,
   so the key is rebuilt from its components. */
pub fn public_to_pem(public: &Public) -> Result<String> {
    let pkey = match public {
        Public::Rsa {
            unique, parameters, ..
        } => {
            let exponent = match parameters.exponent().value() {
                0 => RSA_DEFAULT_EXPONENT,
                e => e,
            };
            let n = BigNum::from_slice(unique.value())?;
            let e = BigNum::from_u32(exponent)?;
            PKey::from_rsa(Rsa::from_public_components(n, e)?)?
        }
        Public::Ecc {
            unique, parameters, ..
        } => {
            let group = EcGroup::from_curve_name(curve_nid(parameters.ecc_curve())?)?;
            let x = BigNum::from_slice(unique.x().value())?;
            let y = BigNum::from_slice(unique.y().value())?;
            let key = EcKey::from_public_key_affine_coordinates(&group, &x, &y)?;
            key.check_key()?;
            PKey::from_ec_key(key)?
        }
        _ => {
            return Err(TpmError::Parse {
                what: "public key",
                reason: "neither an RSA nor an ECC key".to_string(),
            });
        }
    };
    pem_string(&pkey)
}

fn curve_nid(curve: EccCurve) -> Result<Nid> {
    match curve {
        EccCurve::NistP256 => Ok(Nid::X9_62_PRIME256V1),
        EccCurve::NistP384 => Ok(Nid::SECP384R1),
        EccCurve::NistP521 => Ok(Nid::SECP521R1),
        other => Err(TpmError::Parse {
            what: "public key",
            reason: format!("unsupported curve {other:?}"),
        }),
    }
}

/// Bytes per coordinate on `curve`.
pub fn curve_field_len(curve: EccCurve) -> Result<usize> {
    let degree = EcGroup::from_curve_name(curve_nid(curve)?)?.degree();
    Ok(degree.div_ceil(8) as usize)
}

/// Coordinate size of an ECC public area, `None` for other key types.
pub fn ecc_field_len(public: &Public) -> Result<Option<usize>> {
    match public {
        Public::Ecc { parameters, .. } => curve_field_len(parameters.ecc_curve()).map(Some),
        _ => Ok(None),
    }
}

fn pem_string(pkey: &PKey<PKeyPublic>) -> Result<String> {
    let pem = pkey.public_key_to_pem()?;
    String::from_utf8(pem).map_err(|e| TpmError::Parse {
        what: "public key",
        reason: e.to_string(),
    })
}

/* Raw coordinates of an ECDSA signature are printed r then s, each padded
   to the curve size. */
pub fn ecdsa_raw(r: &[u8], s: &[u8], field_len: usize) -> Result<Vec<u8>> {
    let len = i32::try_from(field_len).map_err(|e| TpmError::Signing(e.to_string()))?;
    let mut out = Vec::with_capacity(field_len * 2);
    for part in [r, s] {
        out.extend(BigNum::from_slice(part)?.to_vec_padded(len)?);
    }
    Ok(out)
}
