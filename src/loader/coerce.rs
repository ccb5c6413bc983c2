//! Best-effort type coercion ahead of contract validation

use crate::schema::TableContract;
use crate::types::{Row, TypeClass, Value, parse_int};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Coerce every declared column of `rows` toward its contract type class
///
/// Values that cannot be coerced are left as they are so validation reports
/// them. Columns absent from a row are not added.
pub fn coerce_rows(contract: &TableContract, rows: &mut [Row]) {
    for row in rows.iter_mut() {
        for column in contract.required {
            let Some(class) = contract.class_of(column) else {
                continue;
            };
            if let Some(value) = row.get_mut(column) {
                *value = coerce(value, class);
            }
        }
    }
}

/// Coerce one value toward `class`
pub fn coerce(value: &Value, class: TypeClass) -> Value {
    match class {
        TypeClass::Numeric => numeric(value),
        TypeClass::Datetime => datetime(value),
        TypeClass::String => string(value),
        TypeClass::Null => value.clone(),
    }
}

fn numeric(value: &Value) -> Value {
    let Value::Text(s) = value else {
        return value.clone();
    };
    if let Some(v) = parse_int(s) {
        return Value::Int(v);
    }
    match s.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Value::Float(v),
        _ => value.clone(),
    }
}

fn datetime(value: &Value) -> Value {
    let Value::Text(s) = value else {
        return value.clone();
    };
    parse_date(s.trim()).map_or_else(|| value.clone(), Value::Date)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(s) {
        return Some(stamp.date_naive());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|stamp| stamp.date())
        .ok()
}

fn string(value: &Value) -> Value {
    match value {
        Value::Null => Value::Text(String::new()),
        Value::Text(_) => value.clone(),
        other => Value::Text(other.to_field()),
    }
}
