//! Record shaping: a typed row becomes a JSON mapping, with temporal and
//! numeric columns rendered in their canonical text forms.

use crate::config::{ColumnKind, EntityDescriptor};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Number, Value};
use sqlx::postgres::PgRow;
use sqlx::Row;

pub fn shape_row(entity: &EntityDescriptor, row: &PgRow) -> Value {
    let mut out = Map::new();
    for f in &entity.fields {
        out.insert(f.name.clone(), shape_cell(row, &f.name, f.kind));
    }
    Value::Object(out)
}

fn shape_cell(row: &PgRow, name: &str, kind: ColumnKind) -> Value {
    match decode_cell(row, name, kind) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(column = name, error = %e, "typed decode failed, falling back to raw value");
            fallback_cell(row, name)
        }
    }
}

pub(crate) fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub(crate) fn format_date(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn decode_cell(row: &PgRow, name: &str, kind: ColumnKind) -> Result<Value, sqlx::Error> {
    let value = match kind {
        ColumnKind::SmallInt => row
            .try_get::<Option<i16>, _>(name)?
            .map(|n| Value::Number(n.into())),
        ColumnKind::Int => row
            .try_get::<Option<i32>, _>(name)?
            .map(|n| Value::Number(n.into())),
        ColumnKind::BigInt => row
            .try_get::<Option<i64>, _>(name)?
            .map(|n| Value::Number(n.into())),
        ColumnKind::Float => row
            .try_get::<Option<f64>, _>(name)?
            .and_then(Number::from_f64)
            .map(Value::Number),
        // Selected as ::text, so the canonical string form arrives as-is.
        ColumnKind::Numeric | ColumnKind::Text => row
            .try_get::<Option<String>, _>(name)?
            .map(Value::String),
        ColumnKind::Bool => row.try_get::<Option<bool>, _>(name)?.map(Value::Bool),
        ColumnKind::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(name)?
            .map(|u| Value::String(u.to_string())),
        ColumnKind::Date => row
            .try_get::<Option<NaiveDate>, _>(name)?
            .map(|d| Value::String(format_date(&d))),
        ColumnKind::DateTime => match row.try_get::<Option<DateTime<Utc>>, _>(name) {
            Ok(v) => v.map(|dt| Value::String(format_datetime(&dt.naive_utc()))),
            // A timestamp column without a zone decodes as naive.
            Err(_) => row
                .try_get::<Option<NaiveDateTime>, _>(name)?
                .map(|dt| Value::String(format_datetime(&dt))),
        },
        ColumnKind::Json => row.try_get::<Option<Value>, _>(name)?,
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Best-effort raw decode used when the declared kind does not match what
/// the row actually carries.
fn fallback_cell(row: &PgRow, name: &str) -> Value {
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(v)) = row.try_get::<Option<Value>, _>(name) {
        return v;
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_format() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(17, 5, 3)
            .unwrap();
        assert_eq!(format_datetime(&dt), "2024-03-09 17:05:03");
    }

    #[test]
    fn test_date_format() {
        let d = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
        assert_eq!(format_date(&d), "2024-12-01");
    }
}
