//! CBOR form of document values.
//!
//! Scalars map onto their plain CBOR types. Values CBOR has no native
//! type for are tagged:
//!
//! | Value      | Tag | Payload                      |
//! |------------|-----|------------------------------|
//! | `NONE`     | 6   | `null`                       |
//! | datetime   | 0   | RFC 3339 text                |
//! | record id  | 8   | `[table, id]` or `"table:id"` |
//! | duration   | 14  | `[secs, nanos]`              |
//! | uuid       | 37  | 16 bytes                     |

use crate::error::{CoreError, CoreResult};
use crate::sql::{parse_target, Vars};
use crate::value::{Id, Number, Object, Thing, Value, MAX_NESTING_DEPTH};
use ciborium::value::Value as Cbor;
use std::time::Duration;
use uuid::Uuid;

/// Tag for an RFC 3339 datetime string.
pub const TAG_DATETIME: u64 = 0;
/// Tag marking an absent value.
pub const TAG_NONE: u64 = 6;
/// Tag for a record id.
pub const TAG_RECORD_ID: u64 = 8;
/// Tag for a `[secs, nanos]` duration.
pub const TAG_DURATION: u64 = 14;
/// Tag for a binary UUID.
pub const TAG_UUID: u64 = 37;

fn tagged(tag: u64, value: Cbor) -> Cbor {
    Cbor::Tag(tag, Box::new(value))
}

/// Encodes a value. Every value has a CBOR form.
pub fn encode(value: Value) -> Cbor {
    match value {
        Value::None => tagged(TAG_NONE, Cbor::Null),
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(b),
        Value::Number(Number::Int(i)) => Cbor::Integer(i.into()),
        Value::Number(Number::Float(f)) => Cbor::Float(f),
        Value::Strand(s) => Cbor::Text(s),
        Value::Duration(d) => tagged(
            TAG_DURATION,
            Cbor::Array(vec![
                Cbor::Integer(d.as_secs().into()),
                Cbor::Integer(d.subsec_nanos().into()),
            ]),
        ),
        Value::Datetime(s) => tagged(TAG_DATETIME, Cbor::Text(s)),
        Value::Uuid(u) => tagged(TAG_UUID, Cbor::Bytes(u.as_bytes().to_vec())),
        Value::Array(a) => Cbor::Array(a.into_iter().map(encode).collect()),
        Value::Object(o) => encode_object(o),
        Value::Bytes(b) => Cbor::Bytes(b),
        Value::Thing(t) => tagged(
            TAG_RECORD_ID,
            Cbor::Array(vec![Cbor::Text(t.tb), encode_id(t.id)]),
        ),
    }
}

fn encode_object(obj: Object) -> Cbor {
    Cbor::Map(
        obj.0
            .into_iter()
            .map(|(k, v)| (Cbor::Text(k), encode(v)))
            .collect(),
    )
}

fn encode_id(id: Id) -> Cbor {
    match id {
        Id::Number(n) => Cbor::Integer(n.into()),
        Id::String(s) => Cbor::Text(s),
        Id::Array(a) => Cbor::Array(a.into_iter().map(encode).collect()),
        Id::Object(o) => encode_object(o),
    }
}

/// Decodes a value from untrusted input.
pub fn decode(value: Cbor) -> CoreResult<Value> {
    decode_at(value, 0)
}

fn descend(depth: usize) -> CoreResult<usize> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(CoreError::invalid_request("nesting too deep"));
    }
    Ok(depth + 1)
}

fn decode_at(value: Cbor, depth: usize) -> CoreResult<Value> {
    Ok(match value {
        Cbor::Null => Value::Null,
        Cbor::Bool(b) => Value::Bool(b),
        Cbor::Integer(i) => Value::from(
            i64::try_from(i).map_err(|_| CoreError::invalid_request("integer out of range"))?,
        ),
        Cbor::Float(f) => Value::from(f),
        Cbor::Text(s) => Value::Strand(s),
        Cbor::Bytes(b) => Value::Bytes(b),
        Cbor::Array(items) => {
            let depth = descend(depth)?;
            Value::Array(
                items
                    .into_iter()
                    .map(|v| decode_at(v, depth))
                    .collect::<CoreResult<_>>()?,
            )
        }
        Cbor::Map(entries) => Value::Object(decode_object(entries, descend(depth)?)?),
        Cbor::Tag(tag, inner) => decode_tagged(tag, *inner, depth)?,
        other => {
            return Err(CoreError::invalid_request(format!(
                "unsupported CBOR item {other:?}"
            )))
        }
    })
}

fn decode_object(entries: Vec<(Cbor, Cbor)>, depth: usize) -> CoreResult<Object> {
    entries
        .into_iter()
        .map(|(k, v)| match k {
            Cbor::Text(k) => Ok((k, decode_at(v, depth)?)),
            _ => Err(CoreError::invalid_request("object keys must be text")),
        })
        .collect()
}

fn decode_tagged(tag: u64, inner: Cbor, depth: usize) -> CoreResult<Value> {
    match (tag, inner) {
        (TAG_NONE, _) => Ok(Value::None),
        (TAG_DATETIME, Cbor::Text(s)) => Ok(Value::Datetime(s)),
        (TAG_UUID, Cbor::Bytes(b)) => Uuid::from_slice(&b)
            .map(Value::Uuid)
            .map_err(|e| CoreError::invalid_request(format!("invalid uuid: {e}"))),
        (TAG_DURATION, Cbor::Array(parts)) => decode_duration(parts).map(Value::Duration),
        (TAG_RECORD_ID, Cbor::Array(parts)) => {
            let depth = descend(depth)?;
            let mut parts = parts.into_iter();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(Cbor::Text(tb)), Some(id), None) => {
                    Ok(Value::Thing(Thing::new(tb, decode_id(id, depth)?)))
                }
                _ => Err(CoreError::invalid_request(
                    "a record id must be [table, id]",
                )),
            }
        }
        (TAG_RECORD_ID, Cbor::Text(s)) => {
            let target = parse_target(&s)?;
            match target.resolve_id(&Vars::new())? {
                Some(id) => Ok(Value::Thing(Thing::new(target.table(), id))),
                None => Err(CoreError::invalid_request(format!(
                    "`{s}` is not a record id"
                ))),
            }
        }
        (tag, _) => Err(CoreError::invalid_request(format!(
            "unsupported or malformed CBOR tag {tag}"
        ))),
    }
}

fn decode_id(id: Cbor, depth: usize) -> CoreResult<Id> {
    match id {
        Cbor::Integer(i) => i64::try_from(i)
            .map(Id::Number)
            .map_err(|_| CoreError::invalid_request("record id out of range")),
        Cbor::Text(s) => Ok(Id::String(s)),
        Cbor::Array(items) => {
            let depth = descend(depth)?;
            items
                .into_iter()
                .map(|v| decode_at(v, depth))
                .collect::<CoreResult<_>>()
                .map(Id::Array)
        }
        Cbor::Map(entries) => decode_object(entries, descend(depth)?).map(Id::Object),
        _ => Err(CoreError::invalid_request(
            "a record id must be an int, string, array or object",
        )),
    }
}

fn decode_duration(parts: Vec<Cbor>) -> CoreResult<Duration> {
    let field = |v: Option<&Cbor>| -> CoreResult<u64> {
        match v {
            None => Ok(0),
            Some(Cbor::Integer(i)) => {
                u64::try_from(*i).map_err(|_| CoreError::invalid_request("duration out of range"))
            }
            Some(_) => Err(CoreError::invalid_request("duration parts must be integers")),
        }
    };
    if parts.len() > 2 {
        return Err(CoreError::invalid_request("a duration must be [secs, nanos]"));
    }
    let secs = field(parts.first())?;
    let nanos = field(parts.get(1))?;
    Duration::from_secs(secs)
        .checked_add(Duration::from_nanos(nanos))
        .ok_or_else(|| CoreError::invalid_request("duration out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thing(tb: &str, n: i64) -> Value {
        Value::Thing(Thing::new(tb, Id::Number(n)))
    }

    #[test]
    fn tagged_values_survive() {
        let mut obj = Object::new();
        obj.insert("none", Value::None);
        obj.insert("when", Value::Datetime("2024-01-01T00:00:00Z".into()));
        obj.insert("span", Value::Duration(Duration::new(90, 5)));
        obj.insert("uid", Value::Uuid(Uuid::from_bytes([7; 16])));
        obj.insert("rec", thing("foo", 1));
        obj.insert("blob", Value::Bytes(vec![0, 255]));
        let value = Value::Object(obj);
        assert_eq!(decode(encode(value.clone())).unwrap(), value);
    }

    #[test]
    fn none_and_null_stay_apart() {
        assert_eq!(encode(Value::Null), Cbor::Null);
        assert_eq!(decode(encode(Value::None)).unwrap(), Value::None);
        assert_eq!(decode(Cbor::Null).unwrap(), Value::Null);
    }

    #[test]
    fn record_id_text_form() {
        let text = tagged(TAG_RECORD_ID, Cbor::Text("foo:1".into()));
        assert_eq!(decode(text).unwrap(), thing("foo", 1));
        let table = tagged(TAG_RECORD_ID, Cbor::Text("foo".into()));
        assert!(decode(table).is_err());
    }

    #[test]
    fn malformed_input_is_rejected() {
        let key = Cbor::Map(vec![(Cbor::Integer(1.into()), Cbor::Null)]);
        assert!(matches!(
            decode(key).unwrap_err(),
            CoreError::InvalidRequest { .. }
        ));
        assert!(decode(tagged(99, Cbor::Null)).is_err());
        assert!(decode(tagged(TAG_UUID, Cbor::Bytes(vec![1, 2]))).is_err());
        assert!(decode(Cbor::Integer(u64::MAX.into())).is_err());
    }

    #[test]
    fn deep_input_is_rejected() {
        let mut value = Cbor::Null;
        for _ in 0..1000 {
            value = Cbor::Array(vec![value]);
        }
        assert_eq!(
            decode(value).unwrap_err(),
            CoreError::invalid_request("nesting too deep")
        );
    }
}
