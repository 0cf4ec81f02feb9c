use sha2::{Digest, Sha256};

use super::attestation::{AttestationFormat, AttestationObject};
use super::authenticator_data::AuthenticatorData;
use super::client_data::{CollectedClientData, TYPE_CREATE};
use super::cose::CoseKey;
use super::options::RegistrationOptions;
use super::{CeremonyVerifier, UserIdentity};
use crate::challenge::{CeremonyPurpose, Challenge};
use crate::credential::Credential;
use crate::error::{KeygateError, Result};
use crate::wire::{RegistrationResponse, PUBLIC_KEY_TYPE};

impl CeremonyVerifier {
    /// Start registering a new credential for `user`.
    ///
    /// The user's existing credentials are listed in `excludeCredentials` so
    /// an authenticator is not registered twice.
    pub async fn begin_registration(&self, session_id: &str, user: &UserIdentity) -> Result<RegistrationOptions> {
        let existing = self.credentials.find_by_owner(&user.id).await?;
        let challenge = Challenge::generate();
        let options = RegistrationOptions::new(&self.rp, user, &challenge, &existing, self.timeout_ms);

        self.challenges
            .put(session_id, CeremonyPurpose::Registration, challenge)
            .await?;

        tracing::debug!(
            user = %user.name,
            existing = existing.len(),
            "Registration options issued"
        );
        Ok(options)
    }

    /// Verify a registration response and persist the new credential.
    ///
    /// The outstanding challenge is consumed even when verification fails.
    pub async fn finish_registration(
        &self,
        session_id: &str,
        user: &UserIdentity,
        response: &RegistrationResponse,
    ) -> Result<Credential> {
        let challenge = self
            .challenges
            .take(session_id, CeremonyPurpose::Registration)
            .await?;

        let (credential, format) = self
            .verify_registration(user, response, &challenge)
            .map_err(|reason| {
                tracing::warn!(user = %user.name, reason = %reason, "Registration rejected");
                KeygateError::RegistrationFailed(reason)
            })?;

        if let Err(e) = self.credentials.insert(credential.clone()).await {
            tracing::warn!(
                user = %user.name,
                credential_id = %credential.id_base64url(),
                error = %e,
                "Credential not stored"
            );
            return Err(e);
        }

        tracing::info!(
            user = %user.name,
            credential_id = %credential.id_base64url(),
            attestation = format.as_str(),
            counter = credential.signature_counter,
            "Credential registered"
        );
        Ok(credential)
    }

    fn verify_registration(
        &self,
        user: &UserIdentity,
        response: &RegistrationResponse,
        challenge: &Challenge,
    ) -> std::result::Result<(Credential, AttestationFormat), String> {
        if response.credential_type != PUBLIC_KEY_TYPE {
            return Err(format!("credential type '{}' is not supported", response.credential_type));
        }

        let client_data = CollectedClientData::parse(&response.client_data_json)?;
        self.check_client_data(&client_data, TYPE_CREATE, challenge)?;

        let attestation = AttestationObject::parse(&response.attestation_object)?;
        let auth_data = AuthenticatorData::parse(&attestation.auth_data)?;
        self.check_authenticator_data(&auth_data)?;

        let attested = auth_data
            .attested
            .as_ref()
            .ok_or_else(|| "authenticator data has no attested credential".to_string())?;
        if attested.credential_id != response.credential_id.as_slice() {
            return Err("attested credential id does not match rawId".into());
        }

        let key = CoseKey::from_cbor(attested.public_key)?;
        let client_data_hash = Sha256::digest(&response.client_data_json);
        let format = attestation.verify_statement(&key, &client_data_hash)?;

        tracing::debug!(
            aaguid = %hex::encode(attested.aaguid),
            user_verified = auth_data.user_verified(),
            alg = key.algorithm(),
            "Attestation verified"
        );

        let credential = Credential {
            credential_id: attested.credential_id.to_vec(),
            public_key: attested.public_key.to_vec(),
            owner_id: user.id.clone(),
            signature_counter: auth_data.sign_count,
        };
        Ok((credential, format))
    }
}

#[cfg(test)]
mod tests {
    use ciborium::value::Value;

    use crate::ceremony::fixtures::{alice, verifier, ORIGIN, RP_ID, SESSION};
    use crate::credential::CredentialRepository;
    use crate::error::KeygateError;
    use crate::testing::{SoftAuthenticator, FLAG_USER_PRESENT};
    use crate::wire::{self, RegistrationCredentialJson, RegistrationResponse};

    fn decode(json: RegistrationCredentialJson) -> RegistrationResponse {
        RegistrationResponse::try_from(json).unwrap()
    }

    #[tokio::test]
    async fn test_register_p256_none_attestation() {
        let (verifier, repo) = verifier();
        let authenticator = SoftAuthenticator::p256();

        let options = verifier.begin_registration(SESSION, &alice()).await.unwrap();
        assert_eq!(options.rp.id, RP_ID);
        assert_eq!(options.user.id, alice().id.as_bytes());
        assert!(options.exclude_credentials.is_empty());

        let response = decode(authenticator.register(RP_ID, ORIGIN, &options.challenge));
        let credential = verifier
            .finish_registration(SESSION, &alice(), &response)
            .await
            .unwrap();

        assert_eq!(credential.credential_id, authenticator.credential_id());
        assert_eq!(credential.public_key, authenticator.cose_public_key());
        assert_eq!(credential.owner_id, alice().id);
        assert_eq!(credential.signature_counter, 0);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_register_ed25519_packed_self_attestation() {
        let (verifier, repo) = verifier();
        let mut authenticator = SoftAuthenticator::ed25519();
        authenticator.set_counter(7);

        let options = verifier.begin_registration(SESSION, &alice()).await.unwrap();
        let response = decode(authenticator.register_packed(RP_ID, ORIGIN, &options.challenge));
        let credential = verifier
            .finish_registration(SESSION, &alice(), &response)
            .await
            .unwrap();

        assert_eq!(credential.signature_counter, 7);
        assert_eq!(repo.find_by_owner(&alice().id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_finish_without_begin_is_no_challenge() {
        let (verifier, repo) = verifier();
        let authenticator = SoftAuthenticator::p256();
        let response = decode(authenticator.register(RP_ID, ORIGIN, &[0u8; 32]));

        let result = verifier.finish_registration(SESSION, &alice(), &response).await;
        assert!(matches!(result, Err(KeygateError::NoChallenge)));
        assert!(repo.is_empty());
    }

    /// Runs one registration with a broken response and checks nothing was
    /// stored and the challenge is gone.
    async fn assert_rejected(build: impl FnOnce(&SoftAuthenticator, &[u8]) -> RegistrationCredentialJson) {
        let (verifier, repo) = verifier();
        let authenticator = SoftAuthenticator::p256();

        let options = verifier.begin_registration(SESSION, &alice()).await.unwrap();
        let response = decode(build(&authenticator, options.challenge.as_slice()));

        let result = verifier.finish_registration(SESSION, &alice(), &response).await;
        assert!(
            matches!(result, Err(KeygateError::RegistrationFailed(_))),
            "expected RegistrationFailed, got {:?}",
            result
        );
        assert!(repo.is_empty());

        let retry = decode(authenticator.register(RP_ID, ORIGIN, &options.challenge));
        assert!(matches!(
            verifier.finish_registration(SESSION, &alice(), &retry).await,
            Err(KeygateError::NoChallenge)
        ));
    }

    #[tokio::test]
    async fn test_wrong_origin_rejected() {
        assert_rejected(|a, c| a.register(RP_ID, "https://evil.example", c)).await;
    }

    #[tokio::test]
    async fn test_wrong_rp_id_rejected() {
        assert_rejected(|a, c| a.register("evil.example", ORIGIN, c)).await;
    }

    #[tokio::test]
    async fn test_wrong_challenge_rejected() {
        assert_rejected(|a, c| {
            let mut other = c.to_vec();
            other[0] ^= 0xff;
            a.register(RP_ID, ORIGIN, &other)
        })
        .await;
    }

    #[tokio::test]
    async fn test_wrong_client_data_type_rejected() {
        assert_rejected(|a, c| {
            let client_data = SoftAuthenticator::client_data("webauthn.get", c, ORIGIN);
            let auth_data = a.authenticator_data(RP_ID, FLAG_USER_PRESENT, true);
            let object = SoftAuthenticator::attestation_object("none", vec![], auth_data);
            a.registration_json(&client_data, &object)
        })
        .await;
    }

    #[tokio::test]
    async fn test_user_not_present_rejected() {
        assert_rejected(|a, c| {
            let client_data = SoftAuthenticator::client_data("webauthn.create", c, ORIGIN);
            let auth_data = a.authenticator_data(RP_ID, 0, true);
            let object = SoftAuthenticator::attestation_object("none", vec![], auth_data);
            a.registration_json(&client_data, &object)
        })
        .await;
    }

    #[tokio::test]
    async fn test_missing_attested_credential_rejected() {
        assert_rejected(|a, c| {
            let client_data = SoftAuthenticator::client_data("webauthn.create", c, ORIGIN);
            let auth_data = a.authenticator_data(RP_ID, FLAG_USER_PRESENT, false);
            let object = SoftAuthenticator::attestation_object("none", vec![], auth_data);
            a.registration_json(&client_data, &object)
        })
        .await;
    }

    #[tokio::test]
    async fn test_raw_id_must_match_attested_id() {
        assert_rejected(|a, c| {
            let mut json = a.register(RP_ID, ORIGIN, c);
            json.id = wire::encode(b"some-other-credential");
            json.raw_id = json.id.clone();
            json
        })
        .await;
    }

    #[tokio::test]
    async fn test_none_with_statement_rejected() {
        assert_rejected(|a, c| {
            let client_data = SoftAuthenticator::client_data("webauthn.create", c, ORIGIN);
            let auth_data = a.authenticator_data(RP_ID, FLAG_USER_PRESENT, true);
            let statement = vec![(Value::Text("sig".into()), Value::Bytes(vec![1, 2, 3]))];
            let object = SoftAuthenticator::attestation_object("none", statement, auth_data);
            a.registration_json(&client_data, &object)
        })
        .await;
    }

    #[tokio::test]
    async fn test_packed_with_bad_signature_rejected() {
        assert_rejected(|a, c| {
            let client_data = SoftAuthenticator::client_data("webauthn.create", c, ORIGIN);
            let auth_data = a.authenticator_data(RP_ID, FLAG_USER_PRESENT, true);
            // Signed over different client data
            let statement = a.packed_statement(&auth_data, b"{}");
            let object = SoftAuthenticator::attestation_object("packed", statement, auth_data);
            a.registration_json(&client_data, &object)
        })
        .await;
    }

    #[tokio::test]
    async fn test_packed_alg_mismatch_rejected() {
        assert_rejected(|a, c| {
            let client_data = SoftAuthenticator::client_data("webauthn.create", c, ORIGIN);
            let auth_data = a.authenticator_data(RP_ID, FLAG_USER_PRESENT, true);
            let mut statement = a.packed_statement(&auth_data, &client_data);
            statement[0].1 = Value::Integer((-8).into());
            let object = SoftAuthenticator::attestation_object("packed", statement, auth_data);
            a.registration_json(&client_data, &object)
        })
        .await;
    }

    #[tokio::test]
    async fn test_packed_with_certificate_chain_rejected() {
        assert_rejected(|a, c| {
            let client_data = SoftAuthenticator::client_data("webauthn.create", c, ORIGIN);
            let auth_data = a.authenticator_data(RP_ID, FLAG_USER_PRESENT, true);
            let mut statement = a.packed_statement(&auth_data, &client_data);
            statement.push((
                Value::Text("x5c".into()),
                Value::Array(vec![Value::Bytes(vec![0x30, 0x00])]),
            ));
            let object = SoftAuthenticator::attestation_object("packed", statement, auth_data);
            a.registration_json(&client_data, &object)
        })
        .await;
    }

    #[tokio::test]
    async fn test_unsupported_format_rejected() {
        assert_rejected(|a, c| {
            let client_data = SoftAuthenticator::client_data("webauthn.create", c, ORIGIN);
            let auth_data = a.authenticator_data(RP_ID, FLAG_USER_PRESENT, true);
            let object = SoftAuthenticator::attestation_object("fido-u2f", vec![], auth_data);
            a.registration_json(&client_data, &object)
        })
        .await;
    }

    #[tokio::test]
    async fn test_duplicate_credential_not_stored_twice() {
        let (verifier, repo) = verifier();
        let authenticator = SoftAuthenticator::p256();

        let options = verifier.begin_registration(SESSION, &alice()).await.unwrap();
        let response = decode(authenticator.register(RP_ID, ORIGIN, &options.challenge));
        verifier.finish_registration(SESSION, &alice(), &response).await.unwrap();

        let options = verifier.begin_registration(SESSION, &alice()).await.unwrap();
        assert_eq!(options.exclude_credentials.len(), 1);
        assert_eq!(options.exclude_credentials[0].id, authenticator.credential_id());

        let response = decode(authenticator.register(RP_ID, ORIGIN, &options.challenge));
        let result = verifier.finish_registration(SESSION, &alice(), &response).await;
        assert!(matches!(result, Err(KeygateError::CredentialExists)));
        assert_eq!(repo.len(), 1);
    }
}
