//! Conversions between domain types and their protobuf wire forms.

use chrono::{DateTime, SecondsFormat, Utc};
use prost_types::{value::Kind, ListValue, Struct, Value};

use crate::error::{LockboxError, LockboxResult};
use crate::proto;
use crate::types::{Metadata, VaultRecord};

/// JSON object map → `google.protobuf.Struct`
pub fn metadata_to_struct(meta: &Metadata) -> Struct {
    Struct {
        fields: meta
            .iter()
            .map(|(k, v)| (k.clone(), json_to_value(v)))
            .collect(),
    }
}

/// `google.protobuf.Struct` → JSON object map. A missing struct is an
/// empty map.
pub fn struct_to_metadata(s: Option<Struct>) -> Metadata {
    s.map(|s| {
        s.fields
            .into_iter()
            .map(|(k, v)| (k, value_to_json(v)))
            .collect()
    })
    .unwrap_or_default()
}

fn json_to_value(v: &serde_json::Value) -> Value {
    let kind = match v {
        serde_json::Value::Null => Kind::NullValue(0),
        serde_json::Value::Bool(b) => Kind::BoolValue(*b),
        // Struct numbers are doubles
        serde_json::Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or_default()),
        serde_json::Value::String(s) => Kind::StringValue(s.clone()),
        serde_json::Value::Array(items) => Kind::ListValue(ListValue {
            values: items.iter().map(json_to_value).collect(),
        }),
        serde_json::Value::Object(map) => Kind::StructValue(metadata_to_struct(map)),
    };
    Value { kind: Some(kind) }
}

fn value_to_json(v: Value) -> serde_json::Value {
    match v.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::NumberValue(n)) => serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => serde_json::Value::Object(struct_to_metadata(Some(s))),
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> LockboxResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|source| LockboxError::Timestamp {
            value: value.to_string(),
            source,
        })
}

/// Full record → wire item, payload included.
pub fn record_to_item(record: &VaultRecord) -> proto::VaultItem {
    proto::VaultItem {
        id: record.id,
        user_id: record.user_id,
        name: record.name.clone(),
        data_type: record.data_type.to_string(),
        encrypted_data: record.encrypted_data.clone(),
        meta_data: Some(metadata_to_struct(&record.meta_data)),
        version: record.version,
        created_at: format_timestamp(&record.created_at),
        updated_at: format_timestamp(&record.updated_at),
        active: record.active,
    }
}

/// Wire item → record. Fails on an unknown data type or a malformed
/// timestamp.
pub fn item_to_record(item: proto::VaultItem) -> LockboxResult<VaultRecord> {
    Ok(VaultRecord {
        id: item.id,
        user_id: item.user_id,
        name: item.name,
        data_type: item.data_type.parse()?,
        encrypted_data: item.encrypted_data,
        meta_data: struct_to_metadata(item.meta_data),
        version: item.version,
        created_at: parse_timestamp(&item.created_at)?,
        updated_at: parse_timestamp(&item.updated_at)?,
        active: item.active,
    })
}
