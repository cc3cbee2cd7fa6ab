// SPDX-License-Identifier: LGPL-2.1-only
// Copyright (c) 2026 Red Hat, Inc.

//! Tcg module is used to define constants from the official TCG documentation
//! [TCG OID Registry](https://trustedcomputinggroup.org/wp-content/uploads/TCG-OID-Registry-Version-1.00_pub-1.pdf)

// Reference: TCG EK Credential Profile 2.0
// https://trustedcomputinggroup.org/wp-content/uploads/TCG-EK-Credential-Profile-for-TPM-Family-2.0-Level-0-Version-2.6_pub.pdf

use x509_cert::der::oid::ObjectIdentifier;

// TCG OID Root: 2.23.133.2 (Platform Attribute)
/// 2.23.133.2.1
pub const OID_TPM_MANUFACTURER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.23.133.2.1");

/// 2.23.133.2.2
pub const OID_TPM_MODEL: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.23.133.2.2");

/// 2.23.133.2.3
pub const OID_TPM_VERSION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.23.133.2.3");

// EK Credential Profile 2.0, section 2.2.1.4 (Low Range)
/// NV index of the RSA 2048 EK certificate.
pub const NV_INDEX_RSA_EK_CERT: u32 = 0x01c00002;

/// NV index of the ECC NIST P-256 EK certificate.
pub const NV_INDEX_ECC_EK_CERT: u32 = 0x01c0000a;

// TCG TPM v2.0 Provisioning Guidance, section 7.8
/// Persistent handle of the RSA EK.
pub const PERSISTENT_RSA_EK: u32 = 0x81010001;

/// Persistent handle of the ECC EK.
pub const PERSISTENT_ECC_EK: u32 = 0x81010002;

// TCG TPM Vendor ID Registry, version 1.02
const VENDORS: &[(&str, &str)] = &[
    ("AMD", "AMD"),
    ("ATML", "Atmel"),
    ("BRCM", "Broadcom"),
    ("CSCO", "Cisco"),
    ("FLYS", "Flyslice Technologies"),
    ("GOOG", "Google"),
    ("HISI", "Huawei"),
    ("HPE", "HPE"),
    ("IBM", "IBM"),
    ("IFX", "Infineon"),
    ("INTC", "Intel"),
    ("LEN", "Lenovo"),
    ("MSFT", "Microsoft"),
    ("NSM", "National Semiconductor"),
    ("NTZ", "Nationz"),
    ("NTC", "Nuvoton Technology"),
    ("QCOM", "Qualcomm"),
    ("ROCC", "Fuzhou Rockchip"),
    ("SMSC", "SMSC"),
    ("SMSN", "Samsung"),
    ("SNS", "Sinosun"),
    ("STM", "ST Microelectronics"),
    ("TXN", "Texas Instruments"),
    ("WEC", "Winbond"),
];

/* String properties (TPM_PT_MANUFACTURER, TPM_PT_VENDOR_STRING_x) pack four
   ASCII characters big endian per value, padded with spaces or NULs. */
pub fn property_string(values: &[u32]) -> String {
    let text: String = values
        .iter()
        .flat_map(|v| v.to_be_bytes())
        .filter(|b| b.is_ascii_graphic() || *b == b' ')
        .map(char::from)
        .collect();
    text.trim().to_string()
}

pub fn manufacturer_ascii(id: u32) -> String {
    property_string(&[id])
}

pub fn vendor_name(ascii_id: &str) -> Option<&'static str> {
    VENDORS
        .iter()
        .find(|(id, _)| *id == ascii_id)
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_padded_manufacturer() {
        // "IBM " as reported by the reference simulator
        assert_eq!(manufacturer_ascii(0x4942_4d20), "IBM");
        assert_eq!(manufacturer_ascii(0x4946_5800), "IFX");
        assert_eq!(manufacturer_ascii(0x4e54_4300), "NTC");
    }

    #[test]
    fn joins_vendor_strings() {
        // "SW  " " TPM" as reported by the reference simulator
        assert_eq!(property_string(&[0x5357_2020, 0x2054_504d, 0, 0]), "SW   TPM");
        assert_eq!(property_string(&[0x322e_3000]), "2.0");
    }

    #[test]
    fn looks_up_vendor() {
        assert_eq!(vendor_name("IFX"), Some("Infineon"));
        assert_eq!(vendor_name(&manufacturer_ascii(0x4e54_4300)), Some("Nuvoton Technology"));
        assert_eq!(vendor_name("ZZZZ"), None);
    }

    #[test]
    fn oids() {
        assert_eq!(OID_TPM_MANUFACTURER.to_string(), "2.23.133.2.1");
        assert_eq!(OID_TPM_MODEL.to_string(), "2.23.133.2.2");
        assert_eq!(OID_TPM_VERSION.to_string(), "2.23.133.2.3");
    }
}
