//! Options handed to the browser's `navigator.credentials` calls.

use serde::{Deserialize, Serialize};

use super::cose::SUPPORTED_ALGORITHMS;
use super::{RelyingParty, UserIdentity};
use crate::challenge::Challenge;
use crate::credential::Credential;
use crate::wire::{self, PUBLIC_KEY_TYPE};

/// Ceremony timeout advertised to the client, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorAttachment {
    CrossPlatform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKeyRequirement {
    Discouraged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Discouraged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyance {
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticatorTransport {
    Usb,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelyingPartyEntity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// User handle: the user id bytes
    #[serde(with = "wire::b64url")]
    pub id: Vec<u8>,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialParameter {
    #[serde(rename = "type")]
    pub credential_type: String,
    pub alg: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub credential_type: String,
    #[serde(with = "wire::b64url")]
    pub id: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<AuthenticatorTransport>,
}

impl CredentialDescriptor {
    fn for_credential(credential: &Credential, transports: &[AuthenticatorTransport]) -> Self {
        Self {
            credential_type: PUBLIC_KEY_TYPE.to_string(),
            id: credential.credential_id.clone(),
            transports: transports.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    pub authenticator_attachment: AuthenticatorAttachment,
    pub resident_key: ResidentKeyRequirement,
    pub require_resident_key: bool,
    pub user_verification: UserVerificationRequirement,
}

/// `PublicKeyCredentialCreationOptions`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    pub rp: RelyingPartyEntity,
    pub user: UserEntity,
    #[serde(with = "wire::b64url")]
    pub challenge: Vec<u8>,
    pub pub_key_cred_params: Vec<CredentialParameter>,
    pub timeout: u64,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub authenticator_selection: AuthenticatorSelection,
    pub attestation: AttestationConveyance,
}

impl RegistrationOptions {
    pub(crate) fn new(
        rp: &RelyingParty,
        user: &UserIdentity,
        challenge: &Challenge,
        existing: &[Credential],
        timeout: u64,
    ) -> Self {
        Self {
            rp: RelyingPartyEntity {
                id: rp.id.clone(),
                name: rp.name.clone(),
            },
            user: UserEntity {
                id: user.id.as_bytes().to_vec(),
                name: user.name.clone(),
                display_name: user.display_name.clone(),
            },
            challenge: challenge.as_bytes().to_vec(),
            pub_key_cred_params: SUPPORTED_ALGORITHMS
                .iter()
                .map(|&alg| CredentialParameter {
                    credential_type: PUBLIC_KEY_TYPE.to_string(),
                    alg,
                })
                .collect(),
            timeout,
            exclude_credentials: existing
                .iter()
                .map(|c| CredentialDescriptor::for_credential(c, &[]))
                .collect(),
            authenticator_selection: AuthenticatorSelection {
                authenticator_attachment: AuthenticatorAttachment::CrossPlatform,
                resident_key: ResidentKeyRequirement::Discouraged,
                require_resident_key: false,
                user_verification: UserVerificationRequirement::Discouraged,
            },
            attestation: AttestationConveyance::None,
        }
    }
}

/// `PublicKeyCredentialRequestOptions`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptions {
    #[serde(with = "wire::b64url")]
    pub challenge: Vec<u8>,
    pub timeout: u64,
    pub rp_id: String,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub user_verification: UserVerificationRequirement,
}

impl AuthenticationOptions {
    pub(crate) fn new(
        rp: &RelyingParty,
        challenge: &Challenge,
        credentials: &[Credential],
        timeout: u64,
    ) -> Self {
        const TRANSPORTS: [AuthenticatorTransport; 2] =
            [AuthenticatorTransport::Usb, AuthenticatorTransport::Hybrid];

        Self {
            challenge: challenge.as_bytes().to_vec(),
            timeout,
            rp_id: rp.id.clone(),
            allow_credentials: credentials
                .iter()
                .map(|c| CredentialDescriptor::for_credential(c, &TRANSPORTS))
                .collect(),
            user_verification: UserVerificationRequirement::Discouraged,
        }
    }
}
