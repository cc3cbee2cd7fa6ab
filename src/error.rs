// SPDX-License-Identifier: LGPL-2.1-only
// Copyright (c) 2026 Red Hat, Inc.

use thiserror::Error;
use tss_esapi::{Error::Tss2Error, constants::response_code::Tss2ResponseCodeKind};

use crate::pcr::MAX_PCR_INDEX;

/// Coarse grouping of [`TpmError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Opening, talking to, or closing the TPM.
    Session,
    /// Key slots and key handle lifecycle.
    Resource,
    /// Caller supplied arguments.
    Parameter,
    /// The TPM refused to produce a quote.
    Signing,
}

#[derive(Error, Debug)]
pub enum TpmError {
    #[error("no TPM found: {0}")]
    NotFound(String),
    #[error("permission denied opening {0}")]
    PermissionDenied(String),
    #[error("command channel {0} is not supported on this platform")]
    PlatformUnsupported(&'static str),
    #[error("TPM communication failure: {0}")]
    Communication(String),
    #[error("TPM session already closed")]
    AlreadyClosed,
    #[error("failed to parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },

    #[error("attestation key creation failed: {0}")]
    KeyCreation(String),
    #[error("TPM resources exhausted: {0}")]
    ResourceExhausted(String),
    #[error("key does not belong to this TPM session")]
    InvalidHandle,

    #[error("invalid PCR index {0}, only 0-{max} can be selected", max = MAX_PCR_INDEX)]
    InvalidPcrIndex(i64),
    #[error("PCR selection is empty")]
    EmptyPcrSelection,
    #[error("malformed nonce: {0}")]
    MalformedNonce(String),

    #[error("TPM refused to sign quote: {0}")]
    Signing(String),

    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
}

impl TpmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TpmError::NotFound(_)
            | TpmError::PermissionDenied(_)
            | TpmError::PlatformUnsupported(_)
            | TpmError::Communication(_)
            | TpmError::AlreadyClosed
            | TpmError::Parse { .. }
            | TpmError::OpenSsl(_) => ErrorKind::Session,
            TpmError::KeyCreation(_) | TpmError::ResourceExhausted(_) | TpmError::InvalidHandle => {
                ErrorKind::Resource
            }
            TpmError::InvalidPcrIndex(_)
            | TpmError::EmptyPcrSelection
            | TpmError::MalformedNonce(_) => ErrorKind::Parameter,
            TpmError::Signing(_) => ErrorKind::Signing,
        }
    }

    /* Classifies a TSS error raised while running `op`. Memory and handle
       exhaustion response codes become ResourceExhausted, anything else is
       handed to `fallback`. */
    pub fn from_tss(
        op: &str,
        err: tss_esapi::Error,
        fallback: fn(String) -> TpmError,
    ) -> TpmError {
        let exhausted = matches!(
            &err,
            Tss2Error(rc) if matches!(
                rc.kind(),
                Some(
                    Tss2ResponseCodeKind::ObjectMemory
                        | Tss2ResponseCodeKind::SessionMemory
                        | Tss2ResponseCodeKind::Memory
                        | Tss2ResponseCodeKind::ObjectHandles
                        | Tss2ResponseCodeKind::SessionHandles
                )
            )
        );
        let message = format!("{op}: {err}");
        if exhausted {
            TpmError::ResourceExhausted(message)
        } else {
            fallback(message)
        }
    }
}

/* True when `err` only says the NV index or persistent handle looked up is
   not there (TPM_RC_HANDLE, or an index that was defined but never written). */
pub fn is_absent(err: &tss_esapi::Error) -> bool {
    matches!(
        err,
        Tss2Error(rc) if matches!(
            rc.kind(),
            Some(Tss2ResponseCodeKind::Handle | Tss2ResponseCodeKind::NvUninitialized)
        )
    )
}

impl From<tss_esapi::Error> for TpmError {
    fn from(err: tss_esapi::Error) -> Self {
        TpmError::from_tss("TPM command", err, TpmError::Communication)
    }
}

impl From<x509_cert::der::Error> for TpmError {
    fn from(err: x509_cert::der::Error) -> Self {
        TpmError::Parse {
            what: "EK certificate",
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TpmError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tss_esapi::{WrapperErrorKind, constants::response_code::Tss2ResponseCode};

    // TPM_RC_OBJECT_MEMORY
    const RC_OBJECT_MEMORY: u32 = 0x902;
    // TPM_RC_SCHEME
    const RC_SCHEME: u32 = 0x092;
    // TPM_RC_HANDLE on handle 1
    const RC_HANDLE: u32 = 0x18b;
    // TPM_RC_NV_UNINITIALIZED
    const RC_NV_UNINITIALIZED: u32 = 0x14a;
    // TSS2_TCTI_RC_IO_ERROR
    const RC_TCTI_IO: u32 = 0xa000a;

    fn tss(rc: u32) -> tss_esapi::Error {
        Tss2Error(Tss2ResponseCode::try_from(rc).unwrap())
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(TpmError::NotFound("x".into()).kind(), ErrorKind::Session);
        assert_eq!(TpmError::AlreadyClosed.kind(), ErrorKind::Session);
        assert_eq!(
            TpmError::ResourceExhausted("slots".into()).kind(),
            ErrorKind::Resource
        );
        assert_eq!(TpmError::InvalidHandle.kind(), ErrorKind::Resource);
        assert_eq!(TpmError::InvalidPcrIndex(-1).kind(), ErrorKind::Parameter);
        assert_eq!(TpmError::EmptyPcrSelection.kind(), ErrorKind::Parameter);
        assert_eq!(TpmError::Signing("no".into()).kind(), ErrorKind::Signing);
    }

    #[test]
    fn memory_exhaustion_overrides_fallback() {
        let err = TpmError::from_tss(
            "create attestation key",
            tss(RC_OBJECT_MEMORY),
            TpmError::KeyCreation,
        );
        assert!(matches!(err, TpmError::ResourceExhausted(_)));
        assert_eq!(err.kind(), ErrorKind::Resource);
    }

    #[test]
    fn other_codes_use_fallback() {
        let err = TpmError::from_tss("quote", tss(RC_SCHEME), TpmError::Signing);
        match err {
            TpmError::Signing(msg) => assert!(msg.starts_with("quote: ")),
            other => panic!("expected Signing, got {other:?}"),
        }

        let err = TpmError::from_tss("create EK primary", tss(RC_SCHEME), TpmError::KeyCreation);
        assert!(matches!(err, TpmError::KeyCreation(_)));
    }

    #[test]
    fn wrapper_errors_use_fallback() {
        let err = TpmError::from_tss(
            "connect to simulator",
            tss_esapi::Error::WrapperError(WrapperErrorKind::InvalidParam),
            TpmError::NotFound,
        );
        assert!(matches!(err, TpmError::NotFound(_)));

        let err: TpmError = tss_esapi::Error::WrapperError(WrapperErrorKind::InvalidParam).into();
        assert!(matches!(err, TpmError::Communication(_)));
    }

    #[test]
    fn only_missing_objects_are_absent() {
        assert!(is_absent(&tss(RC_HANDLE)));
        assert!(is_absent(&tss(RC_NV_UNINITIALIZED)));

        assert!(!is_absent(&tss(RC_TCTI_IO)));
        assert!(!is_absent(&tss(RC_SCHEME)));
        assert!(!is_absent(&tss(RC_OBJECT_MEMORY)));
        assert!(!is_absent(&tss_esapi::Error::WrapperError(
            WrapperErrorKind::InvalidParam
        )));
    }

    #[test]
    fn pcr_index_message_names_range() {
        let msg = TpmError::InvalidPcrIndex(24).to_string();
        assert_eq!(msg, "invalid PCR index 24, only 0-23 can be selected");
    }
}
