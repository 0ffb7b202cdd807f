//! Dynamic SQL values and conversions to and from Rust field types.

use chrono::{NaiveDate, NaiveDateTime, SubsecRound};
use compact_str::CompactString;

use crate::error::{KilnError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A single SQL value, either bound as an argument or read back from a row.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
    /// Bind-time only: expanded into one placeholder per element.
    List(Vec<Value>),
}

/// Hashable projection of a [`Value`] used to match keys across batches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Text(CompactString),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Zero values mark unset keys: NULL, 0, "", the nil UUID, the epoch.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !*b,
            Value::Int(i) => *i == 0,
            Value::Float(f) => *f == 0.0,
            Value::Text(s) => s.is_empty() || s == NIL_UUID,
            Value::Bytes(b) => b.is_empty(),
            Value::Timestamp(ts) => *ts == NaiveDateTime::default(),
            Value::List(items) => items.is_empty(),
        }
    }

    /// The matching key for this value, or `None` when it is zero.
    pub fn key(&self) -> Option<Key> {
        if self.is_zero() {
            return None;
        }
        match self {
            Value::Bool(b) => Some(Key::Int(i64::from(*b))),
            Value::Int(i) => Some(Key::Int(*i)),
            Value::Float(f) if f.fract() == 0.0 => Some(Key::Int(*f as i64)),
            Value::Float(f) => Some(Key::Text(CompactString::from(f.to_string()))),
            Value::Text(s) => match s.parse::<i64>() {
                Ok(i) if i.to_string() == *s => Some(Key::Int(i)),
                _ => Some(Key::Text(CompactString::from(s.as_str()))),
            },
            Value::Bytes(b) => Some(Key::Bytes(b.clone())),
            Value::Timestamp(ts) => Some(Key::Text(CompactString::from(
                ts.format(TIMESTAMP_FORMAT).to_string(),
            ))),
            Value::Null | Value::List(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::List(_) => "list",
        }
    }

    /// Text form used by stores without a native timestamp type.
    pub fn timestamp_text(ts: &NaiveDateTime) -> String {
        ts.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Current UTC time, truncated to what every dialect can store.
    pub fn now() -> Value {
        Value::Timestamp(chrono::Utc::now().naive_utc().trunc_subsecs(6))
    }
}

const NIL_UUID: &str = "00000000-0000-0000-0000-000000000000";

/// Fresh random key for UUID primary keys.
#[cfg(feature = "uuid")]
pub fn generate_uuid() -> Value {
    Value::Text(uuid::Uuid::new_v4().to_string())
}

/// Conversion of a Rust field into a [`Value`].
pub trait ToValue {
    fn to_value(&self) -> Value;
}

/// Conversion of a [`Value`] into a Rust field.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch<T>(expected: &str, value: &Value) -> Result<T> {
    Err(KilnError::Mapping(format!(
        "cannot convert {} value into {}",
        value.type_name(),
        expected
    )))
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Slices bind as lists, so `args![&ids[..]]` feeds an `IN (?)` placeholder.
impl<T: ToValue> ToValue for [T] {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: ToValue, const N: usize> ToValue for [T; N] {
    fn to_value(&self) -> Value {
        self.as_slice().to_value()
    }
}

macro_rules! impl_integer {
    ($($ty:ty),*) => { $(
        impl ToValue for $ty {
            fn to_value(&self) -> Value {
                Value::Int(*self as i64)
            }
        }

        impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self> {
                let wide = match &value {
                    Value::Int(i) => *i,
                    Value::Bool(b) => i64::from(*b),
                    Value::Float(f) if f.fract() == 0.0 => *f as i64,
                    Value::Text(s) => match s.trim().parse::<i64>() {
                        Ok(i) => i,
                        Err(_) => return mismatch(stringify!($ty), &value),
                    },
                    _ => return mismatch(stringify!($ty), &value),
                };
                <$ty>::try_from(wide).map_err(|_| {
                    KilnError::Mapping(format!("{} is out of range for {}", wide, stringify!($ty)))
                })
            }
        }
    )* }
}

impl_integer!(i8, i16, i32, i64, isize, u8, u16, u32);

impl ToValue for u64 {
    fn to_value(&self) -> Value {
        Value::Int(i64::try_from(*self).unwrap_or(i64::MAX))
    }
}

impl FromValue for u64 {
    fn from_value(value: Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        u64::try_from(wide)
            .map_err(|_| KilnError::Mapping(format!("{wide} is out of range for u64")))
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            Value::Text(ref s) => match s.as_str() {
                "t" | "true" | "1" => Ok(true),
                "f" | "false" | "0" => Ok(false),
                _ => mismatch("bool", &value),
            },
            other => mismatch("bool", &other),
        }
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            Value::Text(ref s) => s.parse().or_else(|_| mismatch("f64", &value)),
            other => mismatch("f64", &other),
        }
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Text(self.to_owned())
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Timestamp(ts) => Ok(Value::timestamp_text(&ts)),
            Value::Bytes(b) => String::from_utf8(b)
                .map_err(|e| KilnError::Mapping(format!("invalid utf-8 in text column: {e}"))),
            other => mismatch("String", &other),
        }
    }
}

impl ToValue for CompactString {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl FromValue for CompactString {
    fn from_value(value: Value) -> Result<Self> {
        String::from_value(value).map(CompactString::from)
    }
}

impl ToValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::Text(s) => Ok(s.into_bytes()),
            other => mismatch("Vec<u8>", &other),
        }
    }
}

impl ToValue for NaiveDateTime {
    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(ts) => Ok(ts),
            Value::Text(ref s) => parse_timestamp(s).ok_or_else(|| {
                KilnError::Mapping(format!("'{s}' is not a recognised timestamp"))
            }),
            other => mismatch("NaiveDateTime", &other),
        }
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 3] = [TIMESTAMP_FORMAT, "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.fZ"];
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(feature = "uuid")]
impl ToValue for uuid::Uuid {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }
}

#[cfg(feature = "uuid")]
impl FromValue for uuid::Uuid {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(ref s) => uuid::Uuid::parse_str(s)
                .map_err(|e| KilnError::Mapping(format!("invalid uuid '{s}': {e}"))),
            Value::Bytes(ref b) => uuid::Uuid::from_slice(b)
                .map_err(|e| KilnError::Mapping(format!("invalid uuid bytes: {e}"))),
            Value::Null => Ok(uuid::Uuid::nil()),
            other => mismatch("Uuid", &other),
        }
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty),*) => { $(
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                v.to_value()
            }
        }
    )* }
}

impl_from_for_value!(i32, i64, u32, bool, f64, String, &str, NaiveDateTime);

/// Builds a `Vec<Value>` of bind arguments from heterogeneous expressions.
///
/// ```ignore
/// let args = args![1, "john", Some(3_i64)];
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::value::Value>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::value::ToValue::to_value(&$arg)),+]
    };
}
