//! The JSON bodies we send back.

use schemars::JsonSchema;
use serde_json::ser::PrettyFormatter;

use crate::prelude::*;

/// Response for an OCRed image.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ImageResponse {
    /// The recognized text, or a description of why recognition failed.
    pub text: String,

    /// `{"text": ...}` as an indented JSON document, ready to save.
    pub json: String,

    /// The text as a single-column CSV-like document with a `text` header.
    pub csv: String,
}

impl ImageResponse {
    /// Build all the representations of `text`.
    pub fn new(text: String) -> Result<Self> {
        Ok(Self {
            json: text_as_json_document(&text)?,
            csv: format!("text\n{}", text),
            text,
        })
    }
}

/// Response for a PDF.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PdfResponse {
    /// The extracted text, with a header for each pass or page.
    pub text: String,

    /// The name of the CSV file holding any tables we found, which can be
    /// downloaded from `/uploads/{name}`.
    pub csv: String,
}

/// Response body for any failed request.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorResponse {
    /// What went wrong.
    pub error: String,
}

/// Response body for `/upload`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UploadResponse {
    Image(ImageResponse),
    Pdf(PdfResponse),
}

/// Serialize `{"text": text}` with 4-space indentation.
fn text_as_json_document(text: &str) -> Result<String> {
    #[derive(Serialize)]
    struct TextDocument<'a> {
        text: &'a str,
    }

    let mut buf = Vec::new();
    let mut ser =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    TextDocument { text }
        .serialize(&mut ser)
        .context("failed to serialize text as JSON")?;
    String::from_utf8(buf).context("serialized JSON was not UTF-8")
}
