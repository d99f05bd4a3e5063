//! Inbound multipart decoding.
//!
//! Reads the whole `multipart/form-data` body through axum's
//! [`Multipart`] extractor. Parts carrying a filename become
//! [`UploadedFile`]s with their bytes in memory; everything else is a
//! [`TextField`].

use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::StatusCode;
use bytes::Bytes;

use crate::error::{is_length_limit, ProxyError};

/// MIME type assumed for file parts that do not declare one.
pub const DEFAULT_FILE_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field_name: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// A fully decoded form: text fields and files, each in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    pub fields: Vec<TextField>,
    pub files: Vec<UploadedFile>,
}

/// A body cut off by the size limit is `413`; any other failure is malformed
/// input.
fn decode_error<E>(status: StatusCode, e: E) -> ProxyError
where
    E: std::error::Error + Send + Sync + 'static,
{
    if status == StatusCode::PAYLOAD_TOO_LARGE || is_length_limit(&e) {
        ProxyError::PayloadTooLarge {
            source: Box::new(e),
        }
    } else {
        ProxyError::Decode {
            source: Box::new(e),
        }
    }
}

fn field_error(e: MultipartError) -> ProxyError {
    decode_error(e.status(), e)
}

pub async fn decode(request: Request) -> Result<FormData, ProxyError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| decode_error(e.status(), e))?;

    let mut form = FormData::default();
    while let Some(field) = multipart.next_field().await.map_err(field_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let content_type = field
                .content_type()
                .unwrap_or(DEFAULT_FILE_CONTENT_TYPE)
                .to_string();
            let bytes = field.bytes().await.map_err(field_error)?;
            form.files.push(UploadedFile {
                field_name: name,
                file_name,
                content_type,
                bytes,
            });
        } else {
            let value = field.text().await.map_err(field_error)?;
            form.fields.push(TextField { name, value });
        }
    }

    tracing::debug!(
        fields = form.fields.len(),
        files = form.files.len(),
        "multipart body decoded"
    );
    Ok(form)
}
