//! Software authenticator for tests
//!
//! Produces genuine attestation and assertion responses signed with an
//! in-memory P-256 or Ed25519 key. The lower-level builders are public so
//! tests can assemble deliberately broken responses.

use ciborium::value::Value;
use p256::ecdsa::SigningKey as P256SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::ceremony::cose::{ALG_EDDSA, ALG_ES256};
use crate::wire::{
    self, AssertionResponseJson, AttestationResponseJson, AuthenticationCredentialJson,
    RegistrationCredentialJson, PUBLIC_KEY_TYPE,
};

pub const FLAG_USER_PRESENT: u8 = 0x01;
pub const FLAG_ATTESTED: u8 = 0x40;

enum SoftKey {
    P256(P256SigningKey),
    Ed25519(ed25519_dalek::SigningKey),
}

pub struct SoftAuthenticator {
    key: SoftKey,
    credential_id: Vec<u8>,
    counter: u32,
}

impl SoftAuthenticator {
    pub fn p256() -> Self {
        Self::with_key(SoftKey::P256(P256SigningKey::random(&mut OsRng)))
    }

    pub fn ed25519() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::with_key(SoftKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(&seed)))
    }

    fn with_key(key: SoftKey) -> Self {
        let mut credential_id = vec![0u8; 16];
        OsRng.fill_bytes(&mut credential_id);
        Self {
            key,
            credential_id,
            counter: 0,
        }
    }

    pub fn credential_id(&self) -> &[u8] {
        &self.credential_id
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn set_counter(&mut self, counter: u32) {
        self.counter = counter;
    }

    pub fn algorithm(&self) -> i64 {
        match self.key {
            SoftKey::P256(_) => ALG_ES256,
            SoftKey::Ed25519(_) => ALG_EDDSA,
        }
    }

    /// Public key as a COSE_Key map.
    pub fn cose_public_key(&self) -> Vec<u8> {
        let entries = match &self.key {
            SoftKey::P256(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                vec![
                    (Value::Integer(1.into()), Value::Integer(2.into())),
                    (Value::Integer(3.into()), Value::Integer(ALG_ES256.into())),
                    (Value::Integer((-1).into()), Value::Integer(1.into())),
                    (
                        Value::Integer((-2).into()),
                        Value::Bytes(point.x().expect("uncompressed point").to_vec()),
                    ),
                    (
                        Value::Integer((-3).into()),
                        Value::Bytes(point.y().expect("uncompressed point").to_vec()),
                    ),
                ]
            }
            SoftKey::Ed25519(key) => vec![
                (Value::Integer(1.into()), Value::Integer(1.into())),
                (Value::Integer(3.into()), Value::Integer(ALG_EDDSA.into())),
                (Value::Integer((-1).into()), Value::Integer(6.into())),
                (
                    Value::Integer((-2).into()),
                    Value::Bytes(key.verifying_key().to_bytes().to_vec()),
                ),
            ],
        };
        to_cbor(&Value::Map(entries))
    }

    /// DER for ES256, raw 64 bytes for EdDSA.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match &self.key {
            SoftKey::P256(key) => {
                let signature: p256::ecdsa::Signature =
                    p256::ecdsa::signature::Signer::sign(key, message);
                signature.to_der().as_bytes().to_vec()
            }
            SoftKey::Ed25519(key) => ed25519_dalek::Signer::sign(key, message).to_bytes().to_vec(),
        }
    }

    pub fn client_data(ceremony_type: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": ceremony_type,
            "challenge": wire::encode(challenge),
            "origin": origin,
            "crossOrigin": false,
        }))
        .expect("client data serializes")
    }

    /// Authenticator data with the current counter, optionally carrying the
    /// attested credential.
    pub fn authenticator_data(&self, rp_id: &str, flags: u8, attested: bool) -> Vec<u8> {
        let mut data = Sha256::digest(rp_id.as_bytes()).to_vec();
        data.push(if attested { flags | FLAG_ATTESTED } else { flags });
        data.extend_from_slice(&self.counter.to_be_bytes());
        if attested {
            data.extend_from_slice(&[0u8; 16]);
            data.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
            data.extend_from_slice(&self.credential_id);
            data.extend_from_slice(&self.cose_public_key());
        }
        data
    }

    pub fn attestation_object(fmt: &str, statement: Vec<(Value, Value)>, auth_data: Vec<u8>) -> Vec<u8> {
        to_cbor(&Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text(fmt.into())),
            (Value::Text("attStmt".into()), Value::Map(statement)),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]))
    }

    /// Self-attested `packed` statement over `auth_data || SHA-256(client_data)`.
    pub fn packed_statement(&self, auth_data: &[u8], client_data: &[u8]) -> Vec<(Value, Value)> {
        let mut signed = auth_data.to_vec();
        signed.extend_from_slice(&Sha256::digest(client_data));
        vec![
            (Value::Text("alg".into()), Value::Integer(self.algorithm().into())),
            (Value::Text("sig".into()), Value::Bytes(self.sign(&signed))),
        ]
    }

    pub fn registration_json(&self, client_data: &[u8], attestation_object: &[u8]) -> RegistrationCredentialJson {
        let id = wire::encode(&self.credential_id);
        RegistrationCredentialJson {
            id: id.clone(),
            raw_id: id,
            response: AttestationResponseJson {
                client_data_json: wire::encode(client_data),
                attestation_object: wire::encode(attestation_object),
                transports: Some(vec!["usb".into()]),
            },
            credential_type: PUBLIC_KEY_TYPE.to_string(),
        }
    }

    /// Registration response with `none` attestation.
    pub fn register(&self, rp_id: &str, origin: &str, challenge: &[u8]) -> RegistrationCredentialJson {
        let client_data = Self::client_data("webauthn.create", challenge, origin);
        let auth_data = self.authenticator_data(rp_id, FLAG_USER_PRESENT, true);
        let object = Self::attestation_object("none", vec![], auth_data);
        self.registration_json(&client_data, &object)
    }

    /// Registration response with self-attested `packed` attestation.
    pub fn register_packed(&self, rp_id: &str, origin: &str, challenge: &[u8]) -> RegistrationCredentialJson {
        let client_data = Self::client_data("webauthn.create", challenge, origin);
        let auth_data = self.authenticator_data(rp_id, FLAG_USER_PRESENT, true);
        let statement = self.packed_statement(&auth_data, &client_data);
        let object = Self::attestation_object("packed", statement, auth_data);
        self.registration_json(&client_data, &object)
    }

    pub fn assertion_json(
        &self,
        client_data: &[u8],
        auth_data: &[u8],
        signature: &[u8],
    ) -> AuthenticationCredentialJson {
        let id = wire::encode(&self.credential_id);
        AuthenticationCredentialJson {
            id: id.clone(),
            raw_id: id,
            response: AssertionResponseJson {
                client_data_json: wire::encode(client_data),
                authenticator_data: wire::encode(auth_data),
                signature: wire::encode(signature),
                user_handle: None,
            },
            credential_type: PUBLIC_KEY_TYPE.to_string(),
        }
    }

    /// Assertion signed over `auth_data || SHA-256(client_data)` with the
    /// current counter.
    pub fn authenticate(&self, rp_id: &str, origin: &str, challenge: &[u8]) -> AuthenticationCredentialJson {
        let client_data = Self::client_data("webauthn.get", challenge, origin);
        let auth_data = self.authenticator_data(rp_id, FLAG_USER_PRESENT, false);
        let mut signed = auth_data.clone();
        signed.extend_from_slice(&Sha256::digest(&client_data));
        let signature = self.sign(&signed);
        self.assertion_json(&client_data, &auth_data, &signature)
    }
}

fn to_cbor(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out).expect("CBOR encoding into a Vec cannot fail");
    out
}
