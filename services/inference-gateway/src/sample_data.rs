use crate::error::GatewayError;
use crate::model::Features;
use serde_json::{Number, Value};
use std::path::Path;

fn typed_field(raw: &str) -> Value {
    if raw.is_empty() { return Value::Null; }
    if let Ok(i) = raw.parse::<i64>() { return Value::from(i); }
    match raw.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(n) => Value::Number(n),
        None => Value::String(raw.to_string()),
    }
}

/// Reads a headed CSV into one object per row, typing numeric cells.
pub fn read_records(path: &Path) -> Result<Vec<Features>, GatewayError> {
    let err = |e: csv::Error| GatewayError::SampleData(format!("{}: {e}", path.display()));
    let mut rdr = csv::Reader::from_path(path).map_err(err)?;
    let headers = rdr.headers().map_err(err)?.clone();
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec.map_err(err)?;
        out.push(headers.iter().zip(rec.iter()).map(|(h, v)| (h.to_string(), typed_field(v))).collect::<Features>());
    }
    Ok(out)
}
