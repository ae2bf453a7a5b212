use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LockboxError;

pub type UserId = i64;
pub type RecordId = i64;

/// Free-form record metadata (file name, size, card label, ...)
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Kind of secret stored in a vault record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Credentials,
    Card,
    Text,
    Binary,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Credentials => "credentials",
            DataType::Card => "card",
            DataType::Text => "text",
            DataType::Binary => "binary",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = LockboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credentials" => Ok(DataType::Credentials),
            "card" => Ok(DataType::Card),
            "text" => Ok(DataType::Text),
            "binary" => Ok(DataType::Binary),
            other => Err(LockboxError::UnknownDataType(other.to_string())),
        }
    }
}

/// A stored vault record. The payload is always an encrypted blob; the
/// server never sees plaintext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultRecord {
    pub id: RecordId,
    pub user_id: UserId,
    pub name: String,
    pub data_type: DataType,
    #[serde(with = "blob_base64")]
    pub encrypted_data: Vec<u8>,
    #[serde(default)]
    pub meta_data: Metadata,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub active: bool,
}

impl VaultRecord {
    /// Copy of every field except the payload. Used for upload replies and
    /// as the per-chunk header of streamed listings.
    pub fn summary(&self) -> VaultRecord {
        VaultRecord {
            id: self.id,
            user_id: self.user_id,
            name: self.name.clone(),
            data_type: self.data_type,
            encrypted_data: Vec::new(),
            meta_data: self.meta_data.clone(),
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            active: self.active,
        }
    }
}

/// Insert request; storage assigns id, version, timestamps and `active`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVaultRecord {
    pub user_id: UserId,
    pub name: String,
    pub data_type: DataType,
    pub encrypted_data: Vec<u8>,
    pub meta_data: Metadata,
}

/// Registered account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub login: String,
    /// Opaque one-way hash (PHC string)
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub active: bool,
}

mod blob_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> VaultRecord {
        let now = Utc::now();
        let mut meta = Metadata::new();
        meta.insert("file_name".into(), "notes.txt".into());
        VaultRecord {
            id: 7,
            user_id: 1,
            name: "notes".into(),
            data_type: DataType::Binary,
            encrypted_data: vec![0xde, 0xad, 0xbe, 0xef],
            meta_data: meta,
            version: 1,
            created_at: now,
            updated_at: now,
            active: true,
        }
    }

    #[test]
    fn test_data_type_parse_and_display() {
        for dt in [
            DataType::Credentials,
            DataType::Card,
            DataType::Text,
            DataType::Binary,
        ] {
            assert_eq!(dt.to_string().parse::<DataType>().unwrap(), dt);
        }
        assert!(matches!(
            "password".parse::<DataType>(),
            Err(LockboxError::UnknownDataType(s)) if s == "password"
        ));
    }

    #[test]
    fn test_summary_strips_payload_only() {
        let record = sample_record();
        let summary = record.summary();
        assert!(summary.encrypted_data.is_empty());
        assert_eq!(summary.id, record.id);
        assert_eq!(summary.meta_data, record.meta_data);
        assert_eq!(summary.version, record.version);
    }

    #[test]
    fn test_record_json_encodes_blob_as_base64() {
        let record = sample_record();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["encrypted_data"], "3q2+7w==");
        assert_eq!(json["data_type"], "binary");

        let back: VaultRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
