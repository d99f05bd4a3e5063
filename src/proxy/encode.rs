//! Multipart re-encoding of a rewritten form.
//!
//! [`EncodedForm`] holds the body as an ordered list of [`Bytes`] chunks
//! (part headers, part content, separators) so file content is never
//! copied. Text fields come first, then files, each in their original
//! order.

use bytes::Bytes;

use super::decode::FormData;

/// Content type written for text fields.
pub const TEXT_FIELD_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

const BOUNDARY_PREFIX: &str = "extraction-proxy-";
const CRLF: &[u8] = b"\r\n";

#[derive(Debug, Clone)]
pub struct EncodedForm {
    boundary: String,
    chunks: Vec<Bytes>,
}

fn generate_boundary() -> String {
    format!("{BOUNDARY_PREFIX}{}", uuid::Uuid::new_v4().simple())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && memchr::memmem::find(haystack, needle).is_some()
}

fn collides(form: &FormData, boundary: &str) -> bool {
    let needle = boundary.as_bytes();
    form.fields.iter().any(|f| contains(f.value.as_bytes(), needle))
        || form.files.iter().any(|f| contains(&f.bytes, needle))
}

/// Escape a name or filename for a `Content-Disposition` parameter the
/// same way browsers do.
fn escape_param(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

impl EncodedForm {
    /// Encode `form` under a freshly generated boundary.
    #[must_use]
    pub fn encode(form: &FormData) -> Self {
        let mut boundary = generate_boundary();
        while collides(form, &boundary) {
            tracing::debug!("boundary collided with part content, regenerating");
            boundary = generate_boundary();
        }
        Self::with_boundary(form, boundary)
    }

    /// Encode `form` under a caller-chosen boundary. The caller is
    /// responsible for it not appearing in any part.
    #[must_use]
    pub fn with_boundary(form: &FormData, boundary: String) -> Self {
        let mut chunks = Vec::with_capacity(3 * (form.fields.len() + form.files.len()) + 1);

        for field in &form.fields {
            let head = format!(
                "--{boundary}\r\n\
                 Content-Disposition: form-data; name=\"{}\"\r\n\
                 Content-Type: {TEXT_FIELD_CONTENT_TYPE}\r\n\r\n",
                escape_param(&field.name),
            );
            chunks.push(Bytes::from(head));
            chunks.push(Bytes::copy_from_slice(field.value.as_bytes()));
            chunks.push(Bytes::from_static(CRLF));
        }

        for file in &form.files {
            let head = format!(
                "--{boundary}\r\n\
                 Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: {}\r\n\r\n",
                escape_param(&file.field_name),
                escape_param(&file.file_name),
                file.content_type,
            );
            chunks.push(Bytes::from(head));
            chunks.push(file.bytes.clone());
            chunks.push(Bytes::from_static(CRLF));
        }

        chunks.push(Bytes::from(format!("--{boundary}--\r\n")));

        Self { boundary, chunks }
    }

    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Exact body length, or `None` when it cannot be represented, in
    /// which case the body goes out chunked.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.chunks.iter().try_fold(0u64, |total, chunk| {
            total.checked_add(u64::try_from(chunk.len()).ok()?)
        })
    }

    #[must_use]
    pub fn into_chunks(self) -> Vec<Bytes> {
        self.chunks
    }
}
