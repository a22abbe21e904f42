//! Dynamic document value model.
//!
//! This is the engine-side representation that the boundary layer
//! marshals into its fixed C layout. `Display` renders every value in
//! the statement language's literal syntax, so rendered values can be
//! parsed back.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::time::Duration;
use uuid::Uuid;

/// Deepest nesting of arrays, objects and record ids the engine accepts,
/// both in statement text and in values handed in through parameters.
pub const MAX_NESTING_DEPTH: usize = 128;

/// A dynamic document value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent field.
    #[default]
    None,
    /// Explicit null.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer or floating-point number.
    Number(Number),
    /// UTF-8 string.
    Strand(String),
    /// Span of time.
    Duration(Duration),
    /// Point in time, kept in its RFC 3339 string form.
    Datetime(String),
    /// 128-bit UUID.
    Uuid(Uuid),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Ordered string-keyed map.
    Object(Object),
    /// Raw byte blob.
    Bytes(Vec<u8>),
    /// Record reference.
    Thing(Thing),
}

/// A number, keeping integer and float apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
}

impl Number {
    /// Returns the number as a float, for numeric comparison.
    pub fn as_f64(self) -> f64 {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

/// An ordered string-keyed map of values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Object(pub BTreeMap<String, Value>);

impl Object {
    /// Creates an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Inserts a field, returning the displaced value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Removes a field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the object has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<BTreeMap<String, Value>> for Object {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A record reference: table name plus record id.
#[derive(Debug, Clone, PartialEq)]
pub struct Thing {
    /// Table name.
    pub tb: String,
    /// Record id within the table.
    pub id: Id,
}

impl Thing {
    /// Creates a record reference.
    pub fn new(tb: impl Into<String>, id: Id) -> Self {
        Self { tb: tb.into(), id }
    }
}

/// The identifying key of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Id {
    /// Integer id.
    Number(i64),
    /// String id.
    String(String),
    /// Composite array id.
    Array(Vec<Value>),
    /// Composite object id.
    Object(Object),
}

impl Id {
    /// Generates a random string id.
    pub fn rand() -> Self {
        Id::String(Uuid::new_v4().simple().to_string())
    }

    /// Returns the key used to order and index records in a table.
    pub fn key(&self) -> RecordKey {
        match self {
            Id::Number(n) => RecordKey::Number(*n),
            Id::String(s) => RecordKey::String(s.clone()),
            Id::Array(_) | Id::Object(_) => RecordKey::Composite(self.to_string()),
        }
    }
}

/// Total ordering over record ids: numbers, then strings, then composites.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKey {
    /// Integer id.
    Number(i64),
    /// String id.
    String(String),
    /// Array or object id, keyed by its rendering.
    Composite(String),
}

impl Value {
    /// Returns true for `NONE`.
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Returns the inner object, if this is one.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Returns the inner integer, if this is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Number(Number::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Name of the value's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(Number::Int(_)) => "int",
            Value::Number(Number::Float(_)) => "float",
            Value::Strand(_) => "string",
            Value::Duration(_) => "duration",
            Value::Datetime(_) => "datetime",
            Value::Uuid(_) => "uuid",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Bytes(_) => "bytes",
            Value::Thing(_) => "record",
        }
    }

    /// Compares two values the way a `WHERE` clause does.
    ///
    /// Integers and floats compare numerically. Values of unrelated kinds
    /// are unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.as_f64().partial_cmp(&b.as_f64()),
            (Value::Strand(a), Value::Strand(b)) | (Value::Datetime(a), Value::Datetime(b)) => {
                Some(a.cmp(b))
            }
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::Thing(a), Value::Thing(b)) if a.tb == b.tb => Some(a.id.key().cmp(&b.id.key())),
            (a, b) if a == b => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(Number::Int(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(Number::Float(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Strand(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Strand(v)
    }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self {
        Value::Object(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Thing> for Value {
    fn from(v: Thing) -> Self {
        Value::Thing(v)
    }
}

/// Returns true if `s` can be written without quotes as an identifier.
pub(crate) fn is_plain_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('\'')?;
    for c in s.chars() {
        match c {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\0' => f.write_str("\\0")?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('\'')
}

fn write_list(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    f.write_char('[')?;
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{v}")?;
    }
    f.write_char(']')
}

/// Writes a duration in unit form, largest unit first (`1h30m`).
fn write_duration(f: &mut fmt::Formatter<'_>, d: Duration) -> fmt::Result {
    const UNITS: [(&str, u128); 9] = [
        ("y", 365 * 86_400 * 1_000_000_000),
        ("w", 7 * 86_400 * 1_000_000_000),
        ("d", 86_400 * 1_000_000_000),
        ("h", 3_600 * 1_000_000_000),
        ("m", 60 * 1_000_000_000),
        ("s", 1_000_000_000),
        ("ms", 1_000_000),
        ("us", 1_000),
        ("ns", 1),
    ];
    let mut rest = d.as_nanos();
    if rest == 0 {
        return f.write_str("0ns");
    }
    for (suffix, size) in UNITS {
        let count = rest / size;
        if count > 0 {
            write!(f, "{count}{suffix}")?;
            rest %= size;
        }
    }
    Ok(())
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(v) if v.is_nan() => f.write_str("NaN"),
            Number::Float(v) if v.is_infinite() => {
                f.write_str(if *v > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Number::Float(v) => {
                let s = format!("{v:?}");
                if s.contains(['.', 'e', 'E']) {
                    f.write_str(&s)
                } else {
                    write!(f, "{s}f")
                }
            }
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("{}");
        }
        f.write_str("{ ")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if is_plain_ident(k) {
                f.write_str(k)?;
            } else {
                write_quoted(f, k)?;
            }
            write!(f, ": {v}")?;
        }
        f.write_str(" }")
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{n}"),
            Id::String(s) if is_plain_ident(s) => f.write_str(s),
            Id::String(s) => write_quoted(f, s),
            Id::Array(a) => write_list(f, a),
            Id::Object(o) => write!(f, "{o}"),
        }
    }
}

impl fmt::Display for Thing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tb, self.id)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("NONE"),
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Strand(s) => write_quoted(f, s),
            Value::Duration(d) => write_duration(f, *d),
            Value::Datetime(s) => write!(f, "d\"{s}\""),
            Value::Uuid(u) => write!(f, "u\"{u}\""),
            Value::Array(a) => write_list(f, a),
            Value::Object(o) => write!(f, "{o}"),
            Value::Bytes(b) => {
                f.write_str("b\"")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                f.write_char('"')
            }
            Value::Thing(t) => write!(f, "{t}"),
        }
    }
}
