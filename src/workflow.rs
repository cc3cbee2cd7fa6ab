// SPDX-License-Identifier: LGPL-2.1-only
// Copyright (c) 2026 Red Hat, Inc.

//! The attestation run: query the TPM, list its EKs, create an AK and quote
//! the configured PCRs.

use std::io::Write;

use anyhow::{Context as _, Result};
use log::debug;

use crate::config::AttestConfig;
use crate::device::{EkSource, EndorsementKey, Quote, TpmDevice};
use crate::nonce::Nonce;
use crate::pcr::PcrSelection;
use crate::session::TpmSession;

/// Runs every step after the TPM has been opened and writes one status line
/// per step to `out`. The session is closed on success and dropped (which
/// closes it) on failure.
pub fn attest<D: TpmDevice>(
    mut session: TpmSession<D>,
    config: &AttestConfig,
    nonce: &Nonce,
    out: &mut impl Write,
) -> Result<Quote> {
    let pcrs = PcrSelection::new(&config.pcrs).context("Invalid PCR selection")?;

    /* 2. Capability query */
    let info = session.info().context("Failed to query TPM info")?;
    writeln!(
        out,
        "TPM manufacturer: {}  interface: {}",
        info.manufacturer, info.interface
    )?;
    writeln!(
        out,
        "TPM family: {}  firmware: {}.{}  vendor: {}",
        info.family, info.firmware_major, info.firmware_minor, info.vendor_info
    )?;

    /* 3. Endorsement keys */
    let eks = session
        .endorsement_keys()
        .context("Failed to enumerate endorsement keys")?;
    writeln!(out, "Found {} endorsement keys", eks.len())?;
    for ek in &eks {
        writeln!(out, "  {}", describe_ek(ek))?;
        debug!("{} EK public key:\n{}", ek.algorithm, ek.public_pem);
    }

    /* 4. Attestation key */
    let ak = session
        .new_ak(&config.ak)
        .context("Failed to create attestation key")?;
    writeln!(out, "Created attestation key ({})", ak.public().algorithm)?;
    write!(out, "{}", ak.public().public_pem)?;

    /* 5. Quote */
    let quote = session
        .quote_pcrs(&ak, nonce, config.hash, &pcrs)
        .context("Failed to quote PCRs")?;

    /* 6. Report */
    writeln!(out, "Nonce ({} bytes): {}", nonce.len(), hex::encode(nonce.as_bytes()))?;
    writeln!(out, "Quote signature length: {} bytes", quote.signature.len())?;
    writeln!(out, "Quote signature (hex): {}", hex::encode(&quote.signature))?;
    for pcr in &quote.pcrs {
        writeln!(
            out,
            "PCR[{}] {}: {}",
            pcr.index,
            quote.hash,
            hex::encode(&pcr.digest)
        )?;
    }

    ak.close().context("Failed to flush attestation key")?;
    session.close().context("Failed to close TPM")?;
    Ok(quote)
}

fn describe_ek(ek: &EndorsementKey) -> String {
    match &ek.source {
        EkSource::Certificate(cert) => {
            let mut line = format!("{} EK certificate, subject: {}", ek.algorithm, cert.subject);
            if let Some(manufacturer) = &cert.tpm.manufacturer {
                line.push_str(&format!(", TPM manufacturer: {manufacturer}"));
            }
            line
        }
        EkSource::Persistent(handle) => {
            format!("{} EK at persistent handle {:#x}", ek.algorithm, handle)
        }
    }
}
