//! Wire format for WebAuthn ceremony payloads
//!
//! Browsers send credentials as JSON with base64url binary fields. This
//! module decodes that shape into the internal response types before any
//! verification runs; every decoding problem is a
//! [`KeygateError::MalformedResponse`].

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{KeygateError, Result};

/// URL-safe base64: unpadded output, padding tolerated on input.
pub const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Only credential type WebAuthn defines.
pub const PUBLIC_KEY_TYPE: &str = "public-key";

pub fn encode(bytes: &[u8]) -> String {
    BASE64URL.encode(bytes)
}

/// Decode a base64url field, naming it in the error.
pub fn decode(field: &str, value: &str) -> Result<Vec<u8>> {
    BASE64URL
        .decode(value)
        .map_err(|e| KeygateError::MalformedResponse(format!("{} is not valid base64url: {}", field, e)))
}

/// Serde adapter for binary fields carried as base64url strings.
pub mod b64url {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::BASE64URL
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

fn default_credential_type() -> String {
    PUBLIC_KEY_TYPE.to_string()
}

// ============================================================================
// JSON shapes
// ============================================================================

/// `PublicKeyCredential` produced by `navigator.credentials.create()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationCredentialJson {
    pub id: String,
    pub raw_id: String,
    pub response: AttestationResponseJson,
    #[serde(rename = "type", default = "default_credential_type")]
    pub credential_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationResponseJson {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "attestationObject")]
    pub attestation_object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<String>>,
}

/// `PublicKeyCredential` produced by `navigator.credentials.get()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationCredentialJson {
    pub id: String,
    pub raw_id: String,
    pub response: AssertionResponseJson,
    #[serde(rename = "type", default = "default_credential_type")]
    pub credential_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionResponseJson {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: String,
    pub signature: String,
    #[serde(rename = "userHandle", default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

// ============================================================================
// Decoded responses
// ============================================================================

/// Registration response with all binary fields decoded.
#[derive(Debug, Clone)]
pub struct RegistrationResponse {
    pub credential_id: Vec<u8>,
    pub credential_type: String,
    pub client_data_json: Vec<u8>,
    pub attestation_object: Vec<u8>,
}

/// Authentication response with all binary fields decoded.
#[derive(Debug, Clone)]
pub struct AuthenticationResponse {
    pub credential_id: Vec<u8>,
    pub credential_type: String,
    pub client_data_json: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
}

/// `id` and `rawId` must name the same bytes.
fn decode_credential_id(id: &str, raw_id: &str) -> Result<Vec<u8>> {
    let raw = decode("rawId", raw_id)?;
    if raw.is_empty() {
        return Err(KeygateError::MalformedResponse("rawId is empty".into()));
    }
    if decode("id", id)? != raw {
        return Err(KeygateError::MalformedResponse("id does not match rawId".into()));
    }
    Ok(raw)
}

impl TryFrom<RegistrationCredentialJson> for RegistrationResponse {
    type Error = KeygateError;

    fn try_from(json: RegistrationCredentialJson) -> Result<Self> {
        Ok(Self {
            credential_id: decode_credential_id(&json.id, &json.raw_id)?,
            credential_type: json.credential_type,
            client_data_json: decode("clientDataJSON", &json.response.client_data_json)?,
            attestation_object: decode("attestationObject", &json.response.attestation_object)?,
        })
    }
}

impl TryFrom<AuthenticationCredentialJson> for AuthenticationResponse {
    type Error = KeygateError;

    fn try_from(json: AuthenticationCredentialJson) -> Result<Self> {
        let user_handle = match json.response.user_handle.as_deref() {
            None | Some("") => None,
            Some(handle) => Some(decode("userHandle", handle)?),
        };

        Ok(Self {
            credential_id: decode_credential_id(&json.id, &json.raw_id)?,
            credential_type: json.credential_type,
            client_data_json: decode("clientDataJSON", &json.response.client_data_json)?,
            authenticator_data: decode("authenticatorData", &json.response.authenticator_data)?,
            signature: decode("signature", &json.response.signature)?,
            user_handle,
        })
    }
}
