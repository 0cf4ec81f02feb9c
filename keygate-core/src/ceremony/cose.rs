//! COSE_Key decoding and signature verification
//!
//! Supported keys: EC2/P-256 with ES256 and OKP/Ed25519 with EdDSA.

use ciborium::value::Value;
use p256::ecdsa::VerifyingKey as P256VerifyingKey;
use p256::{EncodedPoint, FieldBytes};

/// COSE algorithm identifier for ECDSA with SHA-256 on P-256.
pub const ALG_ES256: i64 = -7;
/// COSE algorithm identifier for EdDSA.
pub const ALG_EDDSA: i64 = -8;

/// Algorithms offered in registration options, in preference order.
pub const SUPPORTED_ALGORITHMS: [i64; 2] = [ALG_ES256, ALG_EDDSA];

const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const CRV_P256: i64 = 1;
const CRV_ED25519: i64 = 6;

pub(crate) enum CoseKey {
    Es256(P256VerifyingKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl CoseKey {
    pub(crate) fn from_cbor(bytes: &[u8]) -> Result<Self, String> {
        let value: Value = ciborium::from_reader(bytes)
            .map_err(|e| format!("COSE key is not valid CBOR: {:?}", e))?;
        let Value::Map(entries) = value else {
            return Err("COSE key is not a CBOR map".into());
        };

        let kty = int_param(&entries, LABEL_KTY)?;
        let alg = int_param(&entries, LABEL_ALG)?;

        match (kty, alg) {
            (KTY_EC2, ALG_ES256) => {
                if int_param(&entries, LABEL_CRV)? != CRV_P256 {
                    return Err("ES256 key is not on P-256".into());
                }
                let x = bytes_param(&entries, LABEL_X)?;
                let y = bytes_param(&entries, LABEL_Y)?;
                if x.len() != 32 || y.len() != 32 {
                    return Err("P-256 coordinates must be 32 bytes".into());
                }
                let point = EncodedPoint::from_affine_coordinates(
                    FieldBytes::from_slice(x),
                    FieldBytes::from_slice(y),
                    false,
                );
                let key = P256VerifyingKey::from_encoded_point(&point)
                    .map_err(|_| "EC2 key is not a valid P-256 point".to_string())?;
                Ok(CoseKey::Es256(key))
            }
            (KTY_OKP, ALG_EDDSA) => {
                if int_param(&entries, LABEL_CRV)? != CRV_ED25519 {
                    return Err("EdDSA key is not on Ed25519".into());
                }
                let x: [u8; 32] = bytes_param(&entries, LABEL_X)?
                    .try_into()
                    .map_err(|_| "Ed25519 key must be 32 bytes".to_string())?;
                let key = ed25519_dalek::VerifyingKey::from_bytes(&x)
                    .map_err(|_| "OKP key is not a valid Ed25519 point".to_string())?;
                Ok(CoseKey::Ed25519(key))
            }
            _ => Err(format!("unsupported COSE key (kty={}, alg={})", kty, alg)),
        }
    }

    pub(crate) fn algorithm(&self) -> i64 {
        match self {
            CoseKey::Es256(_) => ALG_ES256,
            CoseKey::Ed25519(_) => ALG_EDDSA,
        }
    }

    /// Verify `signature` over `message`. ES256 signatures are DER encoded.
    pub(crate) fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), String> {
        match self {
            CoseKey::Es256(key) => {
                let signature = p256::ecdsa::Signature::from_der(signature)
                    .map_err(|_| "ES256 signature is not valid DER".to_string())?;
                p256::ecdsa::signature::Verifier::verify(key, message, &signature)
                    .map_err(|_| "signature verification failed".to_string())
            }
            CoseKey::Ed25519(key) => {
                let signature = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|_| "EdDSA signature must be 64 bytes".to_string())?;
                ed25519_dalek::Verifier::verify(key, message, &signature)
                    .map_err(|_| "signature verification failed".to_string())
            }
        }
    }
}

fn param(entries: &[(Value, Value)], label: i64) -> Option<&Value> {
    entries
        .iter()
        .find(|(key, _)| matches!(key, Value::Integer(i) if i128::from(*i) == i128::from(label)))
        .map(|(_, value)| value)
}

fn int_param(entries: &[(Value, Value)], label: i64) -> Result<i64, String> {
    match param(entries, label) {
        Some(Value::Integer(i)) => {
            i64::try_from(*i).map_err(|_| format!("COSE parameter {} out of range", label))
        }
        _ => Err(format!("COSE key missing integer parameter {}", label)),
    }
}

fn bytes_param(entries: &[(Value, Value)], label: i64) -> Result<&[u8], String> {
    match param(entries, label) {
        Some(Value::Bytes(bytes)) => Ok(bytes.as_slice()),
        _ => Err(format!("COSE key missing byte string parameter {}", label)),
    }
}
