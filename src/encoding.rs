//! Byte stream decoding for markup sources.
//!
//! A template may start with a byte order mark or an XML declaration naming
//! its charset. The reader looks at a bounded prefix of the stream, picks the
//! declared encoding (or the configured default), decodes the whole stream
//! with it and hands the tokenizer text without the declaration.

use encoding_rs::Encoding;
use tracing::trace;

use crate::error::{MarkletError, MarkletResult};

/// How far ahead the reader looks for an XML declaration.
pub const READ_AHEAD_LIMIT: usize = 4000;

/// Decoded template text plus what was learned about its encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSource {
    pub text: String,
    /// The encoding named by the XML declaration, as written.
    pub declared_encoding: Option<String>,
    /// The name of the encoding actually used for decoding.
    pub encoding: String,
    /// The XML declaration, removed from `text`.
    pub xml_declaration: Option<String>,
}

/// Decodes `bytes`, honouring a BOM or an `<?xml ... encoding="X"?>` prolog.
///
/// # Errors
/// - [`MarkletError::Encoding`] if the declared or default encoding is unknown.
pub fn decode(bytes: &[u8], default_encoding: &str, key: &str) -> MarkletResult<DecodedSource> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        trace!(key, encoding = encoding.name(), "byte order mark found");
        let body = bytes.get(bom_len..).unwrap_or_default();
        let (text, _had_errors) = encoding.decode_without_bom_handling(body);
        let (declaration, rest) = split_xml_declaration(&text);
        return Ok(DecodedSource {
            declared_encoding: declaration.and_then(declared_encoding).map(str::to_string),
            xml_declaration: declaration.map(str::to_string),
            encoding: encoding.name().to_string(),
            text: rest.to_string(),
        });
    }

    let head = bytes.get(..READ_AHEAD_LIMIT).unwrap_or(bytes);
    let declaration_len = sniff_declaration(head);
    let declaration = declaration_len
        .and_then(|len| head.get(..len))
        .and_then(|raw| std::str::from_utf8(raw).ok());

    let declared = declaration.and_then(declared_encoding);
    let label = declared.unwrap_or(default_encoding);
    let encoding = Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
        MarkletError::Encoding {
            key: key.to_string(),
            label: label.to_string(),
        }
    })?;
    trace!(key, label, encoding = encoding.name(), "decoding markup");

    let body = bytes
        .get(declaration_len.unwrap_or(0)..)
        .unwrap_or_default();
    let (text, _had_errors) = encoding.decode_without_bom_handling(body);

    Ok(DecodedSource {
        text: text.into_owned(),
        declared_encoding: declared.map(str::to_string),
        encoding: encoding.name().to_string(),
        xml_declaration: declaration.map(|d| d.trim_start().to_string()),
    })
}

/// Whether `text` starts with an XML declaration rather than some other
/// processing instruction such as `<?xml-stylesheet ...?>`.
fn opens_declaration(text: &[u8]) -> bool {
    text.strip_prefix(b"<?xml").is_some_and(|rest| {
        rest.first().is_some_and(u8::is_ascii_whitespace) || rest.starts_with(b"?>")
    })
}

/// Returns the byte length of a leading XML declaration (including any
/// whitespace before it), provided it ends within `head`.
fn sniff_declaration(head: &[u8]) -> Option<usize> {
    let start = head.iter().position(|b| !b.is_ascii_whitespace())?;
    let from_start = head.get(start..)?;
    if !opens_declaration(from_start) {
        return None;
    }
    let end = from_start.windows(2).position(|w| w == b"?>")?;
    Some(start + end + 2)
}

/// Splits a leading `<?xml ...?>` declaration off already decoded text.
pub fn split_xml_declaration(text: &str) -> (Option<&str>, &str) {
    let trimmed = text.trim_start();
    if !opens_declaration(trimmed.as_bytes()) {
        return (None, text);
    }
    match trimmed.find("?>") {
        Some(end) => {
            let (declaration, rest) = trimmed.split_at(end + 2);
            (Some(declaration), rest)
        }
        None => (None, text),
    }
}

/// Extracts the value of the `encoding` pseudo-attribute of a declaration.
pub fn declared_encoding(declaration: &str) -> Option<&str> {
    let after = declaration.split_once("encoding")?.1.trim_start();
    let after = after.strip_prefix('=')?.trim_start();
    let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = after.get(1..)?;
    let end = value.find(quote)?;
    value.get(..end).filter(|v| !v.is_empty())
}
