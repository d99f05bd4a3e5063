//! Metadata rewriting for multipart text fields.
//!
//! Every text field carries a JSON object. [`rewrite_metadata`] forces
//! `schemaName` to the configured value and drops `extraction`; all other
//! keys are left as they were. Files are never touched.

use serde_json::{Map, Value};

use super::decode::{FormData, TextField};
use crate::error::ProxyError;

pub const SCHEMA_NAME_KEY: &str = "schemaName";
pub const EXTRACTION_KEY: &str = "extraction";

pub fn set_schema(metadata: &mut Map<String, Value>, schema_name: &str) {
    metadata.insert(
        SCHEMA_NAME_KEY.to_string(),
        Value::String(schema_name.to_string()),
    );
}

pub fn strip_extraction(metadata: &mut Map<String, Value>) {
    metadata.remove(EXTRACTION_KEY);
}

/// Parse one field value, apply [`set_schema`] then [`strip_extraction`],
/// and serialize it back.
pub fn rewrite_metadata(field: &str, text: &str, schema_name: &str) -> Result<String, ProxyError> {
    let value: Value = serde_json::from_str(text).map_err(|source| ProxyError::FieldParse {
        field: field.to_string(),
        source,
    })?;
    let Value::Object(mut metadata) = value else {
        return Err(ProxyError::NotAnObject {
            field: field.to_string(),
        });
    };

    set_schema(&mut metadata, schema_name);
    strip_extraction(&mut metadata);

    Ok(Value::Object(metadata).to_string())
}

/// Rewrite every text field of `form`. One bad field fails the whole form.
pub fn transform(form: FormData, schema_name: &str) -> Result<FormData, ProxyError> {
    let fields = form
        .fields
        .into_iter()
        .map(|field| -> Result<TextField, ProxyError> {
            let value = rewrite_metadata(&field.name, &field.value, schema_name)?;
            Ok(TextField {
                name: field.name,
                value,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FormData {
        fields,
        files: form.files,
    })
}
