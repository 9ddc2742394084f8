//! Multipart form construction
//!
//! Parts are either plain key/value text, an in-memory buffer, or a
//! reference to a file path. File parts are streamed from disk by the
//! transport; the core never reads them into memory. File validation
//! (existence, regular file, non-empty) happens before any request is
//! issued and fails with [`Error::File`].

use crate::http::{Error, Result};
use std::path::{Path, PathBuf};
use tokio_util::codec::{BytesCodec, FramedRead};

/// Payload of a single form part
#[derive(Debug, Clone)]
enum PartData {
    Text(String),
    Buffer { filename: String, data: Vec<u8> },
    File(PathBuf),
}

/// A named part of a multipart form
#[derive(Debug, Clone)]
pub struct Part {
    name: String,
    data: PartData,
    content_type: Option<String>,
}

impl Part {
    /// Plain key/value part
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: PartData::Text(value.into()),
            content_type: None,
        }
    }

    /// In-memory buffer part uploaded under the given filename
    pub fn buffer(
        name: impl Into<String>,
        filename: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            data: PartData::Buffer {
                filename: filename.into(),
                data: data.into(),
            },
            content_type: None,
        }
    }

    /// File part streamed from `path` at send time
    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            data: PartData::File(path.into()),
            content_type: None,
        }
    }

    /// Override the part's content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// An ordered set of named parts
#[derive(Debug, Clone, Default)]
pub struct Multipart {
    parts: Vec<Part>,
}

impl Multipart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Validate file parts and assemble the transport form.
    ///
    /// File parts become byte streams backed by the opened file; the body is
    /// produced chunk-wise during the transfer.
    pub(crate) async fn into_form(self) -> Result<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for part in self.parts {
            let built = match part.data {
                PartData::Text(value) => reqwest::multipart::Part::text(value),
                PartData::Buffer { filename, data } => {
                    reqwest::multipart::Part::bytes(data).file_name(filename)
                }
                PartData::File(path) => {
                    let filename = validate_upload_path(&path)?;
                    let file = tokio::fs::File::open(&path).await.map_err(|e| {
                        Error::file(
                            "Multipart::into_form",
                            format!("{}: {e}", path.display()),
                        )
                    })?;
                    let stream = FramedRead::new(file, BytesCodec::new());
                    reqwest::multipart::Part::stream(reqwest::Body::wrap_stream(stream))
                        .file_name(filename)
                }
            };
            let built = match part.content_type {
                Some(content_type) => built.mime_str(&content_type).map_err(|e| {
                    Error::file("Multipart::into_form", format!("invalid content type: {e}"))
                })?,
                None => built,
            };
            form = form.part(part.name, built);
        }
        Ok(form)
    }
}

/// Check that an upload path names an existing, non-empty regular file and
/// return its file name.
fn validate_upload_path(path: &Path) -> Result<String> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        Error::file(
            "Multipart::into_form",
            format!("{}: {e}", path.display()),
        )
    })?;
    if !metadata.is_file() {
        return Err(Error::file(
            "Multipart::into_form",
            format!("{}: not a regular file", path.display()),
        ));
    }
    if metadata.len() == 0 {
        return Err(Error::file(
            "Multipart::into_form",
            format!("{}: file is empty", path.display()),
        ));
    }
    Ok(path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default())
}
