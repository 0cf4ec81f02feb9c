//! Authenticator data parsing
//!
//! Layout: rpIdHash (32) | flags (1) | signCount (4, big endian), then
//! attested credential data when AT is set and an extensions map when ED
//! is set.

use std::io::Cursor;

use ciborium::value::Value;

pub(crate) const FLAG_UP: u8 = 0x01;
pub(crate) const FLAG_UV: u8 = 0x04;
pub(crate) const FLAG_AT: u8 = 0x40;
pub(crate) const FLAG_ED: u8 = 0x80;

const HEADER_LEN: usize = 37;
const AAGUID_LEN: usize = 16;

pub(crate) struct AuthenticatorData<'a> {
    pub rp_id_hash: &'a [u8],
    pub flags: u8,
    pub sign_count: u32,
    pub attested: Option<AttestedCredential<'a>>,
}

pub(crate) struct AttestedCredential<'a> {
    pub aaguid: &'a [u8],
    pub credential_id: &'a [u8],
    /// Raw COSE_Key bytes.
    pub public_key: &'a [u8],
}

impl<'a> AuthenticatorData<'a> {
    pub(crate) fn parse(data: &'a [u8]) -> Result<Self, String> {
        if data.len() < HEADER_LEN {
            return Err(format!("authenticator data too short ({} bytes)", data.len()));
        }

        let rp_id_hash = &data[..32];
        let flags = data[32];
        let sign_count = u32::from_be_bytes([data[33], data[34], data[35], data[36]]);
        let mut offset = HEADER_LEN;

        let attested = if flags & FLAG_AT != 0 {
            if data.len() < offset + AAGUID_LEN + 2 {
                return Err("attested credential data truncated".into());
            }
            let aaguid = &data[offset..offset + AAGUID_LEN];
            offset += AAGUID_LEN;

            let id_len = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
            offset += 2;
            if id_len == 0 || data.len() < offset + id_len {
                return Err("credential id length out of range".into());
            }
            let credential_id = &data[offset..offset + id_len];
            offset += id_len;

            let key_len = cbor_item_len(&data[offset..])?;
            let public_key = &data[offset..offset + key_len];
            offset += key_len;

            Some(AttestedCredential {
                aaguid,
                credential_id,
                public_key,
            })
        } else {
            None
        };

        if flags & FLAG_ED != 0 {
            offset += cbor_item_len(&data[offset..])?;
        }

        if offset != data.len() {
            return Err(format!(
                "{} trailing bytes in authenticator data",
                data.len() - offset
            ));
        }

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested,
        })
    }

    pub(crate) fn user_present(&self) -> bool {
        self.flags & FLAG_UP != 0
    }

    pub(crate) fn user_verified(&self) -> bool {
        self.flags & FLAG_UV != 0
    }
}

/// Length in bytes of the single CBOR item at the start of `bytes`.
fn cbor_item_len(bytes: &[u8]) -> Result<usize, String> {
    let mut cursor = Cursor::new(bytes);
    let _: Value = ciborium::from_reader(&mut cursor)
        .map_err(|e| format!("invalid CBOR in authenticator data: {:?}", e))?;
    usize::try_from(cursor.position()).map_err(|_| "CBOR item too large".to_string())
}
