//! `PostgresValue`: the concrete [`SQLParam`] bound to `tokio-postgres`'s
//! wire types. Grounded in psycopg2's adaptation rules that `field.py`
//! relies on implicitly — a Rust enum standing in for "whatever Python type
//! the driver auto-adapted", made explicit the way a typed driver binding
//! has to be.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use relquery_core::value::{Dialect, SQLParam};
use std::error::Error as StdError;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};
use uuid::Uuid;

/// A PostgreSQL `interval`: months, days, and microseconds kept separate
/// per its wire format (a 1-month interval and a 30-day interval are
/// distinct values even though `\dt`-style output can render them the
/// same way). Encoded/decoded directly against the binary protocol since
/// neither `chrono` nor `tokio-postgres`'s chrono feature models it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgInterval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

impl ToSql for PgInterval {
    fn to_sql(&self, _ty: &Type, out: &mut bytes::BytesMut) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        out.extend_from_slice(&self.microseconds.to_be_bytes());
        out.extend_from_slice(&self.days.to_be_bytes());
        out.extend_from_slice(&self.months.to_be_bytes());
        Ok(IsNull::No)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }

    tokio_postgres::types::to_sql_checked!();
}

impl<'a> FromSql<'a> for PgInterval {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        if raw.len() != 16 {
            return Err("invalid interval wire length".into());
        }
        let microseconds = i64::from_be_bytes(raw[0..8].try_into().unwrap());
        let days = i32::from_be_bytes(raw[8..12].try_into().unwrap());
        let months = i32::from_be_bytes(raw[12..16].try_into().unwrap());
        Ok(PgInterval { months, days, microseconds })
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostgresValue {
    Null,
    Bool(bool),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Interval(PgInterval),
    Json(serde_json::Value),
    Array(Vec<PostgresValue>),
}

impl SQLParam for PostgresValue {
    const DIALECT: Dialect = Dialect::PostgreSQL;

    fn null() -> Self {
        PostgresValue::Null
    }

    fn array(values: Vec<Self>) -> Self {
        PostgresValue::Array(values)
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            PostgresValue::SmallInt(n) => Some(*n as i64),
            PostgresValue::Int(n) => Some(*n as i64),
            PostgresValue::BigInt(n) => Some(*n),
            _ => None,
        }
    }

    /// `like`/`ilike` operands are bound as ordinary parameters, never
    /// spliced into rendered SQL text, so there is normally nothing to
    /// escape; this only fires when `Field::where_repr` applies it under
    /// the legacy `%`-escaping quirk (§4.2, §9).
    fn escape_percent(&self) -> Self {
        match self {
            PostgresValue::Text(s) => PostgresValue::Text(s.replace('%', "%%")),
            other => other.clone(),
        }
    }
}

impl PostgresValue {
    /// Narrower scalar-to-string conversion for a JSON-shaped join result
    /// (§4.7.1): types `serde_json::Value` has no native representation for
    /// — UUID, date, timestamp, time, interval — render as their textual
    /// form instead of failing the conversion.
    pub fn json_scalar(&self) -> serde_json::Value {
        match self {
            PostgresValue::Null => serde_json::Value::Null,
            PostgresValue::Bool(v) => serde_json::Value::Bool(*v),
            PostgresValue::SmallInt(v) => (*v).into(),
            PostgresValue::Int(v) => (*v).into(),
            PostgresValue::BigInt(v) => (*v).into(),
            PostgresValue::Real(v) => serde_json::Number::from_f64(*v as f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PostgresValue::Double(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PostgresValue::Text(v) => serde_json::Value::String(v.clone()),
            PostgresValue::Bytes(v) => serde_json::Value::String(hex_encode(v)),
            PostgresValue::Uuid(v) => serde_json::Value::String(v.to_string()),
            PostgresValue::Timestamp(v) => serde_json::Value::String(v.to_string()),
            PostgresValue::TimestampTz(v) => serde_json::Value::String(v.to_rfc3339()),
            PostgresValue::Date(v) => serde_json::Value::String(v.to_string()),
            PostgresValue::Time(v) => serde_json::Value::String(v.to_string()),
            PostgresValue::Interval(v) => serde_json::Value::String(format!(
                "{} months {} days {} us",
                v.months, v.days, v.microseconds
            )),
            PostgresValue::Json(v) => v.clone(),
            PostgresValue::Array(values) => {
                serde_json::Value::Array(values.iter().map(PostgresValue::json_scalar).collect())
            }
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

macro_rules! from_impl {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for PostgresValue {
            fn from(value: $ty) -> Self {
                PostgresValue::$variant(value)
            }
        }
    };
}

from_impl!(bool, Bool);
from_impl!(i16, SmallInt);
from_impl!(i32, Int);
from_impl!(i64, BigInt);
from_impl!(f32, Real);
from_impl!(f64, Double);
from_impl!(String, Text);
from_impl!(Vec<u8>, Bytes);
from_impl!(Uuid, Uuid);
from_impl!(NaiveDateTime, Timestamp);
from_impl!(DateTime<Utc>, TimestampTz);
from_impl!(NaiveDate, Date);
from_impl!(NaiveTime, Time);
from_impl!(PgInterval, Interval);
from_impl!(serde_json::Value, Json);

impl<T: Into<PostgresValue>> From<Option<T>> for PostgresValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(PostgresValue::Null)
    }
}

/// Binds a `PostgresValue` as a `tokio-postgres` query parameter. NULL
/// encodes as SQL NULL regardless of the column's declared type, matching
/// how the engine's NULL sentinel is dialect-agnostic.
impl ToSql for PostgresValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self {
            PostgresValue::Null => Ok(IsNull::Yes),
            PostgresValue::Bool(v) => v.to_sql(ty, out),
            PostgresValue::SmallInt(v) => v.to_sql(ty, out),
            PostgresValue::Int(v) => v.to_sql(ty, out),
            PostgresValue::BigInt(v) => v.to_sql(ty, out),
            PostgresValue::Real(v) => v.to_sql(ty, out),
            PostgresValue::Double(v) => v.to_sql(ty, out),
            PostgresValue::Text(v) => v.to_sql(ty, out),
            PostgresValue::Bytes(v) => v.to_sql(ty, out),
            PostgresValue::Uuid(v) => v.to_sql(ty, out),
            PostgresValue::Timestamp(v) => v.to_sql(ty, out),
            PostgresValue::TimestampTz(v) => v.to_sql(ty, out),
            PostgresValue::Date(v) => v.to_sql(ty, out),
            PostgresValue::Time(v) => v.to_sql(ty, out),
            PostgresValue::Interval(v) => v.to_sql(ty, out),
            PostgresValue::Json(v) => v.to_sql(ty, out),
            PostgresValue::Array(values) => {
                let encoded: Vec<&PostgresValue> = values.iter().collect();
                encoded.to_sql(ty, out)
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

impl<'a> FromSql<'a> for PostgresValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        use tokio_postgres::types::Type as T;
        Ok(match *ty {
            T::BOOL => PostgresValue::Bool(bool::from_sql(ty, raw)?),
            T::INT2 => PostgresValue::SmallInt(i16::from_sql(ty, raw)?),
            T::INT4 => PostgresValue::Int(i32::from_sql(ty, raw)?),
            T::INT8 => PostgresValue::BigInt(i64::from_sql(ty, raw)?),
            T::FLOAT4 => PostgresValue::Real(f32::from_sql(ty, raw)?),
            T::FLOAT8 => PostgresValue::Double(f64::from_sql(ty, raw)?),
            T::TEXT | T::VARCHAR | T::BPCHAR => PostgresValue::Text(String::from_sql(ty, raw)?),
            T::BYTEA => PostgresValue::Bytes(Vec::<u8>::from_sql(ty, raw)?),
            T::UUID => PostgresValue::Uuid(Uuid::from_sql(ty, raw)?),
            T::TIMESTAMP => PostgresValue::Timestamp(NaiveDateTime::from_sql(ty, raw)?),
            T::TIMESTAMPTZ => PostgresValue::TimestampTz(DateTime::<Utc>::from_sql(ty, raw)?),
            T::DATE => PostgresValue::Date(NaiveDate::from_sql(ty, raw)?),
            T::TIME => PostgresValue::Time(NaiveTime::from_sql(ty, raw)?),
            T::INTERVAL => PostgresValue::Interval(PgInterval::from_sql(ty, raw)?),
            T::JSON | T::JSONB => PostgresValue::Json(serde_json::Value::from_sql(ty, raw)?),
            _ => PostgresValue::Text(String::from_utf8_lossy(raw).into_owned()),
        })
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(PostgresValue::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_the_sentinel() {
        assert!(PostgresValue::Null.is_null());
        assert!(!PostgresValue::Int(0).is_null());
    }

    #[test]
    fn count_reads_back_as_i64() {
        assert_eq!(PostgresValue::BigInt(42).as_i64(), Some(42));
        assert_eq!(PostgresValue::Text("x".into()).as_i64(), None);
    }
}
