use sha2::{Digest, Sha256};

use super::authenticator_data::AuthenticatorData;
use super::client_data::{CollectedClientData, TYPE_GET};
use super::cose::CoseKey;
use super::options::AuthenticationOptions;
use super::{CeremonyVerifier, UserIdentity};
use crate::challenge::{CeremonyPurpose, Challenge};
use crate::credential::Credential;
use crate::error::{KeygateError, Result};
use crate::wire::{AuthenticationResponse, PUBLIC_KEY_TYPE};

impl CeremonyVerifier {
    /// Start an assertion for `user` over all of their credentials.
    pub async fn begin_authentication(
        &self,
        session_id: &str,
        user: &UserIdentity,
    ) -> Result<AuthenticationOptions> {
        let credentials = self.credentials.find_by_owner(&user.id).await?;
        if credentials.is_empty() {
            tracing::debug!(user = %user.name, "No credentials to authenticate with");
            return Err(KeygateError::NoCredentialsRegistered);
        }

        let challenge = Challenge::generate();
        let options = AuthenticationOptions::new(&self.rp, &challenge, &credentials, self.timeout_ms);

        self.challenges
            .put(session_id, CeremonyPurpose::Authentication, challenge)
            .await?;

        tracing::debug!(
            user = %user.name,
            credentials = credentials.len(),
            "Authentication options issued"
        );
        Ok(options)
    }

    /// Verify an assertion and advance the credential's signature counter.
    ///
    /// Counters must strictly increase, except that an authenticator which
    /// reports zero for a credential stored at zero is accepted without a
    /// write. A counter advance refused by the repository (another request
    /// got there first) fails the attempt.
    pub async fn finish_authentication(
        &self,
        session_id: &str,
        user: &UserIdentity,
        response: &AuthenticationResponse,
    ) -> Result<()> {
        let challenge = self
            .challenges
            .take(session_id, CeremonyPurpose::Authentication)
            .await?;

        let credential = match self.credentials.find_by_id(&response.credential_id).await? {
            Some(credential) if credential.owner_id == user.id => credential,
            _ => {
                tracing::warn!(
                    user = %user.name,
                    credential_id = %hex::encode(&response.credential_id),
                    "Assertion for unknown credential"
                );
                return Err(KeygateError::UnknownCredential);
            }
        };

        let reported = self
            .verify_assertion(user, response, &credential, &challenge)
            .map_err(|reason| {
                tracing::warn!(user = %user.name, reason = %reason, "Authentication rejected");
                KeygateError::AuthenticationFailed(reason)
            })?;

        let stored = credential.signature_counter;
        if reported == 0 && stored == 0 {
            tracing::info!(
                user = %user.name,
                credential_id = %credential.id_base64url(),
                "Authenticated (authenticator has no counter)"
            );
            return Ok(());
        }

        if reported <= stored {
            tracing::warn!(
                user = %user.name,
                credential_id = %credential.id_base64url(),
                stored,
                reported,
                "Signature counter did not advance, possible cloned authenticator"
            );
            return Err(KeygateError::ReplaySuspected { stored, reported });
        }

        if !self
            .credentials
            .update_counter(&credential.credential_id, reported)
            .await?
        {
            tracing::warn!(
                user = %user.name,
                credential_id = %credential.id_base64url(),
                stored,
                reported,
                "Counter advance refused, concurrent assertion"
            );
            return Err(KeygateError::ReplaySuspected { stored, reported });
        }

        tracing::info!(
            user = %user.name,
            credential_id = %credential.id_base64url(),
            counter = reported,
            "Authenticated"
        );
        Ok(())
    }

    /// Returns the counter the authenticator reported.
    fn verify_assertion(
        &self,
        user: &UserIdentity,
        response: &AuthenticationResponse,
        credential: &Credential,
        challenge: &Challenge,
    ) -> std::result::Result<u32, String> {
        if response.credential_type != PUBLIC_KEY_TYPE {
            return Err(format!("credential type '{}' is not supported", response.credential_type));
        }

        if let Some(handle) = &response.user_handle {
            if handle.as_slice() != user.id.as_bytes() {
                return Err("user handle does not match the signed-in user".into());
            }
        }

        let client_data = CollectedClientData::parse(&response.client_data_json)?;
        self.check_client_data(&client_data, TYPE_GET, challenge)?;

        let auth_data = AuthenticatorData::parse(&response.authenticator_data)?;
        self.check_authenticator_data(&auth_data)?;

        let key = CoseKey::from_cbor(&credential.public_key)?;
        let mut signed = Vec::with_capacity(response.authenticator_data.len() + 32);
        signed.extend_from_slice(&response.authenticator_data);
        signed.extend_from_slice(&Sha256::digest(&response.client_data_json));
        key.verify(&signed, &response.signature)?;

        Ok(auth_data.sign_count)
    }
}
