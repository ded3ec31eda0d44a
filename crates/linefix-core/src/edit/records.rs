//! Validation of loosely-typed edit records (model output, HTTP bodies).

use super::Edit;
use serde_json::Value;
use thiserror::Error;

/// A record that cannot become an [`Edit`]. Positions are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditRecordError {
    #[error("`edits` must be an array of {{line, new}} records")]
    EditsNotAnArray,
    #[error("edit {position}: expected an object, found {found}")]
    NotAnObject { position: usize, found: &'static str },
    #[error("edit {position}: missing required field `{field}`")]
    MissingField {
        position: usize,
        field: &'static str,
    },
    #[error("edit {position}: `line` must be an integer, found {found}")]
    InvalidLine { position: usize, found: String },
    #[error("edit {position}: `new` must be a string")]
    InvalidReplacement { position: usize },
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_line(position: usize, value: &Value) -> Result<i64, EditRecordError> {
    let invalid = || EditRecordError::InvalidLine {
        position,
        found: value.to_string(),
    };
    match value {
        Value::Number(n) => {
            if let Some(line) = n.as_i64() {
                return Ok(line);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                _ => Err(invalid()),
            }
        }
        // Models occasionally quote the number.
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn edit_from_value(position: usize, value: &Value) -> Result<Edit, EditRecordError> {
    let obj = value.as_object().ok_or(EditRecordError::NotAnObject {
        position,
        found: kind_of(value),
    })?;

    let line = obj.get("line").ok_or(EditRecordError::MissingField {
        position,
        field: "line",
    })?;
    let new = obj.get("new").ok_or(EditRecordError::MissingField {
        position,
        field: "new",
    })?;

    Ok(Edit {
        line: parse_line(position, line)?,
        new: new
            .as_str()
            .ok_or(EditRecordError::InvalidReplacement { position })?
            .to_string(),
    })
}

/// Validate an `edits` array into typed [`Edit`]s.
///
/// The whole batch is rejected on the first malformed record; nothing is
/// applied from a batch that fails here.
pub fn edits_from_value(value: &Value) -> Result<Vec<Edit>, EditRecordError> {
    let records = value.as_array().ok_or(EditRecordError::EditsNotAnArray)?;
    records
        .iter()
        .enumerate()
        .map(|(i, record)| edit_from_value(i + 1, record))
        .collect()
}
