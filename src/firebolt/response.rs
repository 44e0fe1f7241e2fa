//! `JSON_Compact` result decoding.

use serde::Deserialize;
use serde_json::Value;

use super::FireboltError;

/// Result column metadata. Only the name is needed to address values.
#[derive(Debug, Clone, Deserialize)]
struct Column {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    description: String,
}

/// Result set of a single statement.
#[derive(Debug, Default, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    meta: Vec<Column>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
    #[serde(default)]
    errors: Option<Vec<ErrorEntry>>,
}

impl QueryResult {
    /// Parse a response body. An empty body (e.g. from `SET` or `USE`) is an
    /// empty result.
    pub fn from_body(body: &str) -> Result<Self, FireboltError> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }

        let result: Self = serde_json::from_str(body).map_err(|e| FireboltError::Decode {
            column: "<response>".to_string(),
            reason: e.to_string(),
        })?;

        if let Some(errors) = &result.errors
            && !errors.is_empty()
        {
            let message = errors
                .iter()
                .map(|e| e.description.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(FireboltError::Query {
                status: reqwest::StatusCode::OK,
                message,
            });
        }

        Ok(result)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over rows in server order.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.data.iter().map(move |values| Row {
            columns: &self.meta,
            values,
        })
    }

    /// First row, if any.
    pub fn first(&self) -> Option<Row<'_>> {
        self.rows().next()
    }
}

/// A single row. Values are looked up by column name; a missing column or a
/// SQL `NULL` decodes to `None`.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [Column],
    values: &'a [Value],
}

impl<'a> Row<'a> {
    fn value(&self, column: &str) -> Option<&'a Value> {
        let idx = self.columns.iter().position(|c| c.name == column)?;
        self.values.get(idx).filter(|v| !v.is_null())
    }

    fn decode_error(column: &str, value: &Value, expected: &str) -> FireboltError {
        FireboltError::Decode {
            column: column.to_string(),
            reason: format!("expected {expected}, got {value}"),
        }
    }

    pub fn get_str(&self, column: &str) -> Result<Option<String>, FireboltError> {
        match self.value(column) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(Some(v.to_string())),
            Some(v) => Err(Self::decode_error(column, v, "string")),
        }
    }

    /// Integers may arrive as JSON numbers or as numeric strings (64-bit types).
    pub fn get_i64(&self, column: &str) -> Result<Option<i64>, FireboltError> {
        match self.value(column) {
            None => Ok(None),
            Some(v @ Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(Some)
                .ok_or_else(|| Self::decode_error(column, v, "integer")),
            Some(v @ Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| Self::decode_error(column, v, "integer")),
            Some(v) => Err(Self::decode_error(column, v, "integer")),
        }
    }

    pub fn get_f64(&self, column: &str) -> Result<Option<f64>, FireboltError> {
        match self.value(column) {
            None => Ok(None),
            Some(v @ Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| Self::decode_error(column, v, "number")),
            Some(v @ Value::String(s)) => match s.trim() {
                "nan" | "NaN" => Ok(Some(f64::NAN)),
                "inf" | "+inf" => Ok(Some(f64::INFINITY)),
                "-inf" => Ok(Some(f64::NEG_INFINITY)),
                other => other
                    .parse()
                    .map(Some)
                    .map_err(|_| Self::decode_error(column, v, "number")),
            },
            Some(v) => Err(Self::decode_error(column, v, "number")),
        }
    }
}
