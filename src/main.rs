// SPDX-License-Identifier: LGPL-2.1-only
// Copyright (c) 2026 Red Hat, Inc.

use anyhow::{Context as _, Result};
use log::{debug, error};

use tpm_attest::{
    TpmSession,
    config::{AttestConfig, NONCE_LEN},
    nonce::Nonce,
    workflow,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    println!("TPM Attestation Quote");
    let config = AttestConfig::default();

    /* Qualifying data for the quote */
    let nonce = Nonce::random(NONCE_LEN).context("Failed to generate nonce")?;

    /* 1. Open the platform TPM */
    let session = TpmSession::open(&config.open).context("Failed to open TPM")?;
    println!("Opened TPM");

    /* 2-6. Query, enumerate EKs, create AK, quote, report */
    let mut stdout = std::io::stdout().lock();
    let quote = workflow::attest(session, &config, &nonce, &mut stdout)?;
    debug!("attest structure is {} bytes", quote.attest.len());

    Ok(())
}
