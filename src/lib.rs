// SPDX-License-Identifier: LGPL-2.1-only
// Copyright (c) 2026 Red Hat, Inc.

//! Open the platform TPM, list its endorsement keys, create an attestation
//! key and quote PCRs with it.

pub mod algorithms;
pub mod config;
pub mod device;
pub mod ek;
pub mod error;
pub mod esapi;
pub mod nonce;
pub mod pcr;
pub mod session;
pub mod tcg;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use error::{ErrorKind, TpmError};
pub use session::{AttestationKey, TpmSession};
