// SPDX-License-Identifier: LGPL-2.1-only
// Copyright (c) 2026 Red Hat, Inc.

use tss_esapi::structures::{PcrSelectionList, PcrSlot};

use crate::algorithms::HashAlgorithm;
use crate::error::{Result, TpmError};

/// Highest PCR index a quote may cover.
pub const MAX_PCR_INDEX: u8 = 23;

/// A validated, sorted and de-duplicated set of PCR indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcrSelection(Vec<u8>);

impl PcrSelection {
    pub fn new(indices: &[i64]) -> Result<Self> {
        if indices.is_empty() {
            return Err(TpmError::EmptyPcrSelection);
        }
        let mut pcrs = indices
            .iter()
            .map(|&index| {
                u8::try_from(index)
                    .ok()
                    .filter(|&i| i <= MAX_PCR_INDEX)
                    .ok_or(TpmError::InvalidPcrIndex(index))
            })
            .collect::<Result<Vec<u8>>>()?;
        pcrs.sort_unstable();
        pcrs.dedup();
        Ok(Self(pcrs))
    }

    pub fn indices(&self) -> &[u8] {
        &self.0
    }

    /* Builds the ESAPI selection list for one bank. */
    pub fn to_selection_list(&self, hash: HashAlgorithm) -> Result<PcrSelectionList> {
        let slots: Vec<PcrSlot> = self.0.iter().map(|&i| pcr_slot(i)).collect();
        PcrSelectionList::builder()
            .with_selection(hash.into(), &slots)
            .build()
            .map_err(|e| TpmError::from_tss("build PCR selection", e, TpmError::Communication))
    }
}

pub fn pcr_slot(index: u8) -> PcrSlot {
    match index {
        0 => PcrSlot::Slot0,
        1 => PcrSlot::Slot1,
        2 => PcrSlot::Slot2,
        3 => PcrSlot::Slot3,
        4 => PcrSlot::Slot4,
        5 => PcrSlot::Slot5,
        6 => PcrSlot::Slot6,
        7 => PcrSlot::Slot7,
        8 => PcrSlot::Slot8,
        9 => PcrSlot::Slot9,
        10 => PcrSlot::Slot10,
        11 => PcrSlot::Slot11,
        12 => PcrSlot::Slot12,
        13 => PcrSlot::Slot13,
        14 => PcrSlot::Slot14,
        15 => PcrSlot::Slot15,
        16 => PcrSlot::Slot16,
        17 => PcrSlot::Slot17,
        18 => PcrSlot::Slot18,
        19 => PcrSlot::Slot19,
        20 => PcrSlot::Slot20,
        21 => PcrSlot::Slot21,
        22 => PcrSlot::Slot22,
        // PcrSelection never holds anything above MAX_PCR_INDEX
        _ => PcrSlot::Slot23,
    }
}

/// Value of one PCR at quote time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcrValue {
    pub index: u8,
    pub digest: Vec<u8>,
}
