//! Attestation object parsing and statement checks
//!
//! Only `none` and self-attested `packed` statements are accepted; there is
//! no certificate chain validation.

use ciborium::value::Value;

use super::cose::CoseKey;

/// Accepted attestation statement formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationFormat {
    None,
    PackedSelf,
}

impl AttestationFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttestationFormat::None => "none",
            AttestationFormat::PackedSelf => "packed",
        }
    }
}

pub(crate) struct AttestationObject {
    pub fmt: String,
    pub att_stmt: Vec<(Value, Value)>,
    pub auth_data: Vec<u8>,
}

impl AttestationObject {
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self, String> {
        let value: Value = ciborium::from_reader(bytes)
            .map_err(|e| format!("attestation object is not valid CBOR: {:?}", e))?;
        let Value::Map(entries) = value else {
            return Err("attestation object is not a CBOR map".into());
        };

        let mut fmt = None;
        let mut att_stmt = None;
        let mut auth_data = None;
        for (key, value) in entries {
            match (key, value) {
                (Value::Text(key), Value::Text(v)) if key == "fmt" => fmt = Some(v),
                (Value::Text(key), Value::Map(v)) if key == "attStmt" => att_stmt = Some(v),
                (Value::Text(key), Value::Bytes(v)) if key == "authData" => auth_data = Some(v),
                _ => {}
            }
        }

        Ok(Self {
            fmt: fmt.ok_or("attestation object has no fmt")?,
            att_stmt: att_stmt.ok_or("attestation object has no attStmt")?,
            auth_data: auth_data.ok_or("attestation object has no authData")?,
        })
    }

    /// Check the statement against the attested credential key.
    pub(crate) fn verify_statement(
        &self,
        credential_key: &CoseKey,
        client_data_hash: &[u8],
    ) -> Result<AttestationFormat, String> {
        match self.fmt.as_str() {
            "none" => {
                if self.att_stmt.is_empty() {
                    Ok(AttestationFormat::None)
                } else {
                    Err("none attestation must have an empty statement".into())
                }
            }
            "packed" => {
                if statement_field(&self.att_stmt, "x5c").is_some() {
                    return Err("packed attestation with a certificate chain is not supported".into());
                }

                let alg = match statement_field(&self.att_stmt, "alg") {
                    Some(Value::Integer(alg)) => i64::try_from(*alg)
                        .map_err(|_| "packed attestation alg out of range".to_string())?,
                    _ => return Err("packed attestation has no alg".into()),
                };
                if alg != credential_key.algorithm() {
                    return Err(format!(
                        "packed attestation alg {} does not match credential key alg {}",
                        alg,
                        credential_key.algorithm()
                    ));
                }

                let sig = match statement_field(&self.att_stmt, "sig") {
                    Some(Value::Bytes(sig)) => sig,
                    _ => return Err("packed attestation has no sig".into()),
                };

                let mut signed = Vec::with_capacity(self.auth_data.len() + client_data_hash.len());
                signed.extend_from_slice(&self.auth_data);
                signed.extend_from_slice(client_data_hash);
                credential_key
                    .verify(&signed, sig)
                    .map_err(|e| format!("packed self attestation: {}", e))?;

                Ok(AttestationFormat::PackedSelf)
            }
            other => Err(format!("unsupported attestation format '{}'", other)),
        }
    }
}

fn statement_field<'a>(statement: &'a [(Value, Value)], name: &str) -> Option<&'a Value> {
    statement
        .iter()
        .find(|(key, _)| matches!(key, Value::Text(k) if k == name))
        .map(|(_, value)| value)
}
