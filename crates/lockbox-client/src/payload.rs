//! Structured secrets as stored (encrypted) in vault records

use lockbox_core::types::DataType;
use serde::{Deserialize, Serialize};

use crate::ClientError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub service: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub card_name: String,
    pub card_number: String,
    pub expiry: String,
    pub cvv: String,
    #[serde(default)]
    pub cardholder: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub title: String,
    pub content: String,
}

/// Plaintext of a non-binary record. Serialized as the bare inner object;
/// the record's `data_type` says which shape to expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SecretPayload {
    Credential(Credential),
    Card(Card),
    Text(Note),
}

impl SecretPayload {
    pub fn data_type(&self) -> DataType {
        match self {
            SecretPayload::Credential(_) => DataType::Credentials,
            SecretPayload::Card(_) => DataType::Card,
            SecretPayload::Text(_) => DataType::Text,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ClientError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode plaintext according to the record's type. Binary records
    /// carry raw file bytes and have no structured form.
    pub fn from_json(data_type: DataType, bytes: &[u8]) -> Result<Self, ClientError> {
        match data_type {
            DataType::Credentials => Ok(SecretPayload::Credential(serde_json::from_slice(bytes)?)),
            DataType::Card => Ok(SecretPayload::Card(serde_json::from_slice(bytes)?)),
            DataType::Text => Ok(SecretPayload::Text(serde_json::from_slice(bytes)?)),
            DataType::Binary => Err(ClientError::Protocol(
                "binary records have no structured payload".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_encodes_as_bare_object() {
        let payload = SecretPayload::Text(Note {
            title: "note".into(),
            content: "hi".into(),
        });
        let json: serde_json::Value = serde_json::from_slice(&payload.to_json().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"title": "note", "content": "hi"}));
        assert_eq!(payload.data_type(), DataType::Text);
    }

    #[test]
    fn test_decode_by_data_type() {
        let bytes = br#"{"service":"github","username":"alice","password":"pw"}"#;
        let decoded = SecretPayload::from_json(DataType::Credentials, bytes).unwrap();
        match decoded {
            SecretPayload::Credential(c) => {
                assert_eq!(c.service, "github");
                assert_eq!(c.url, "");
            }
            other => panic!("unexpected {other:?}"),
        }
        // shape must match the declared type
        assert!(SecretPayload::from_json(DataType::Card, bytes).is_err());
        assert!(SecretPayload::from_json(DataType::Binary, bytes).is_err());
    }
}
