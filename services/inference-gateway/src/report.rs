//! Spreadsheet export of a caller-supplied history list.

use crate::error::GatewayError;
use crate::model::Features;
use rust_xlsxwriter::{Format, Workbook};
use serde_json::Value;
use std::collections::HashSet;

pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Header is the union of row keys in first-seen order.
pub fn columns(rows: &[Features]) -> Vec<&str> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut cols: Vec<&str> = Vec::new();
    for key in rows.iter().flat_map(|r| r.keys()) {
        if seen.insert(key.as_str()) { cols.push(key); }
    }
    cols
}

pub fn export_xlsx(rows: &[Features]) -> Result<Vec<u8>, GatewayError> {
    if rows.is_empty() { return Err(GatewayError::EmptyReport); }
    let cols = columns(rows);
    let bold = Format::new().set_bold();
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (c, name) in cols.iter().enumerate() {
        sheet.write_string_with_format(0, c as u16, *name, &bold)?;
    }
    for (r, row) in rows.iter().enumerate() {
        let r = r as u32 + 1;
        for (c, name) in cols.iter().enumerate() {
            let c = c as u16;
            match row.get(*name) {
                None | Some(Value::Null) => {}
                Some(Value::Number(n)) => match n.as_f64() {
                    Some(x) => { sheet.write_number(r, c, x)?; }
                    None => { sheet.write_string(r, c, n.to_string())?; }
                },
                Some(Value::String(s)) => { sheet.write_string(r, c, s)?; }
                Some(Value::Bool(b)) => { sheet.write_boolean(r, c, *b)?; }
                Some(other) => { sheet.write_string(r, c, other.to_string())?; }
            }
        }
    }
    Ok(workbook.save_to_buffer()?)
}
