//! Hand-written `multipart/form-data` decoder.
//!
//! The decoder walks the raw body as a small state machine
//! (`Preamble -> Delimiter -> Headers -> Body -> ... -> Epilogue`) and yields
//! [`RawPart`]s, which are then sorted into text fields and file payloads by
//! [`classify`].
use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

/// RFC 2046 caps boundaries at 70 characters.
const MAX_BOUNDARY_LEN: usize = 70;

/// Errors that abort decoding of a multipart body.
#[derive(Debug, Error)]
pub enum MultipartError {
    #[error("content type is not multipart/form-data: `{0}`")]
    NotFormData(String),
    #[error("missing boundary in multipart Content-Type")]
    MissingBoundary,
    #[error("invalid multipart boundary `{0}`")]
    InvalidBoundary(String),
    #[error("body does not contain the multipart delimiter `--{0}`")]
    MissingDelimiter(String),
    #[error("body is not valid base64")]
    Base64(#[from] base64::DecodeError),
}

/// Extract the boundary token from a `Content-Type` header value.
///
/// Format: `multipart/form-data; boundary=----WebKitFormBoundary...`
pub fn parse_boundary(content_type: &str) -> Result<String, MultipartError> {
    let mut params = content_type.split(';');
    let main = params.next().unwrap_or("").trim();
    if !main.eq_ignore_ascii_case("multipart/form-data") {
        return Err(MultipartError::NotFormData(main.to_string()));
    }

    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("boundary") {
            let boundary = unquote(value);
            if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
                return Err(MultipartError::InvalidBoundary(boundary.to_string()));
            }
            return Ok(boundary.to_string());
        }
    }

    Err(MultipartError::MissingBoundary)
}

/// Request body handed to the decoder.
#[derive(Clone, Copy, Debug)]
pub struct Body<'a> {
    pub bytes: &'a [u8],
    /// Whether the bytes are a base64 rendering of the real payload.
    pub base64: bool,
}

impl<'a> Body<'a> {
    pub fn raw(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            base64: false,
        }
    }

    pub fn base64(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            base64: true,
        }
    }
}

/// One segment between two delimiters, before classification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawPart {
    pub headers: Vec<String>,
    pub body: Vec<u8>,
}

impl RawPart {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then_some(value.trim())
        })
    }

    /// `name` and `filename` parameters of the `Content-Disposition` header.
    pub fn disposition(&self) -> Option<(Option<String>, Option<String>)> {
        let value = self.header("content-disposition")?;
        let mut name = None;
        let mut filename = None;

        for param in split_params(value) {
            let Some((key, raw)) = param.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.eq_ignore_ascii_case("name") {
                name = Some(unquote(raw).to_string());
            } else if key.eq_ignore_ascii_case("filename") {
                filename = Some(unquote(raw).to_string());
            }
        }

        Some((name, filename))
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type").filter(|value| !value.is_empty())
    }
}

/// A scalar form value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedField {
    pub name: String,
    pub value: String,
}

/// A file payload extracted from the body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedFile {
    pub field_name: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl DecodedFile {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Outcome of [`classify`] for a single part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PartKind {
    Field(DecodedField),
    File(DecodedFile),
    Dropped(DropReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    NoDisposition,
    NoName,
    EmptyFile,
    EmptyValue,
}

/// Sort a raw part into a field, a file or nothing.
///
/// A non-empty `filename` makes the part a file, unless its body is empty.
/// Otherwise the part is a field when its trimmed body is non-empty.
pub fn classify(part: RawPart) -> PartKind {
    let Some((name, filename)) = part.disposition() else {
        return PartKind::Dropped(DropReason::NoDisposition);
    };
    let Some(name) = name.filter(|name| !name.is_empty()) else {
        return PartKind::Dropped(DropReason::NoName);
    };

    if let Some(file_name) = filename.filter(|f| !f.trim().is_empty()) {
        if part.body.is_empty() {
            return PartKind::Dropped(DropReason::EmptyFile);
        }
        let content_type = part.content_type().map(str::to_string);
        return PartKind::File(DecodedFile {
            field_name: name,
            file_name,
            content_type,
            bytes: part.body,
        });
    }

    let value = String::from_utf8_lossy(&part.body).trim().to_string();
    if value.is_empty() {
        return PartKind::Dropped(DropReason::EmptyValue);
    }
    PartKind::Field(DecodedField { name, value })
}

/// Decoded form: last-write-wins fields plus files in arrival order.
#[derive(Clone, Debug, Default)]
pub struct DecodedForm {
    fields: HashMap<String, DecodedField>,
    files: Vec<DecodedFile>,
}

impl DecodedForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|f| f.value.as_str())
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Files in the order they appeared in the body.
    pub fn files(&self) -> &[DecodedFile] {
        &self.files
    }

    fn push(&mut self, kind: PartKind) {
        match kind {
            PartKind::Field(field) => {
                // Repeated names overwrite earlier values.
                self.fields.insert(field.name.clone(), field);
            }
            PartKind::File(file) => self.files.push(file),
            PartKind::Dropped(reason) => log::debug!("Dropping multipart part: {reason:?}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Preamble,
    /// Positioned right after a `--boundary` delimiter.
    Delimiter,
    /// Reading header lines of the part ending at `end`.
    Headers { end: usize },
    /// Header block done, body runs from the cursor to `end`.
    Body { end: usize },
    Epilogue,
}

/// Boundary-based decoder.
#[derive(Debug)]
pub struct MultipartDecoder {
    boundary: String,
    delimiter: Vec<u8>,
}

impl MultipartDecoder {
    pub fn new(boundary: &str) -> Self {
        Self {
            boundary: boundary.to_string(),
            delimiter: format!("--{boundary}").into_bytes(),
        }
    }

    /// Decode the body into fields and files.
    pub fn decode(&self, body: Body<'_>) -> Result<DecodedForm, MultipartError> {
        let decoded;
        let bytes = if body.base64 {
            let compact: Vec<u8> = body
                .bytes
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            decoded = STANDARD.decode(compact)?;
            decoded.as_slice()
        } else {
            body.bytes
        };

        let mut form = DecodedForm::default();
        for part in self.parts(bytes)? {
            form.push(classify(part));
        }
        Ok(form)
    }

    /// Split the body into raw parts.
    pub fn parts(&self, data: &[u8]) -> Result<Vec<RawPart>, MultipartError> {
        let mut parts = Vec::new();
        let mut current = RawPart::default();
        let mut pos = 0;
        let mut state = State::Preamble;

        loop {
            state = match state {
                State::Preamble => {
                    let start = self
                        .find_delimiter(data, 0, true)
                        .ok_or_else(|| MultipartError::MissingDelimiter(self.boundary.clone()))?;
                    pos = start + self.delimiter.len();
                    State::Delimiter
                }
                State::Delimiter => {
                    if data[pos..].starts_with(b"--") || pos >= data.len() {
                        State::Epilogue
                    } else {
                        // Transport padding may sit between the delimiter and its CRLF.
                        while pos < data.len() && matches!(data[pos], b' ' | b'\t') {
                            pos += 1;
                        }
                        if data[pos..].starts_with(b"\r\n") {
                            pos += 2;
                        }
                        let end = self
                            .find_delimiter(data, pos, false)
                            .map_or(data.len(), |at| at - 2);
                        State::Headers { end: end.max(pos) }
                    }
                }
                State::Headers { end } => match find_crlf(&data[pos..end]) {
                    Some(0) => {
                        pos += 2;
                        State::Body { end }
                    }
                    Some(len) => {
                        let line = String::from_utf8_lossy(&data[pos..pos + len]).to_string();
                        current.headers.push(line);
                        pos += len + 2;
                        State::Headers { end }
                    }
                    None => {
                        // No blank line before the next delimiter: keep the
                        // trailing header line and treat the body as empty.
                        if pos < end {
                            let line = String::from_utf8_lossy(&data[pos..end]).to_string();
                            current.headers.push(line);
                        }
                        pos = end;
                        State::Body { end }
                    }
                },
                State::Body { end } => {
                    current.body = data[pos..end].to_vec();
                    parts.push(std::mem::take(&mut current));
                    pos = self.skip_delimiter(data, end);
                    State::Delimiter
                }
                State::Epilogue => return Ok(parts),
            };
        }
    }

    /// Find a delimiter at or after `start`. Interior delimiters must be
    /// preceded by CRLF; the very first one may also start the body. The
    /// delimiter must end its line: `--`, transport padding, CRLF or the end
    /// of the body may follow, never more boundary characters.
    fn find_delimiter(&self, data: &[u8], start: usize, first: bool) -> Option<usize> {
        let len = self.delimiter.len();
        if data.len() < len {
            return None;
        }
        (start..=data.len() - len).find(|&i| {
            data[i..].starts_with(&self.delimiter)
                && ((first && i == 0) || (i >= 2 && &data[i - 2..i] == b"\r\n"))
                && ends_delimiter_line(&data[i + len..])
        })
    }

    /// Move past the CRLF and delimiter that close a part ending at `end`.
    fn skip_delimiter(&self, data: &[u8], end: usize) -> usize {
        if data[end..].starts_with(b"\r\n") && data[end + 2..].starts_with(&self.delimiter) {
            end + 2 + self.delimiter.len()
        } else if data[end..].starts_with(&self.delimiter) {
            end + self.delimiter.len()
        } else {
            data.len()
        }
    }
}

/// Decode a body for the given `Content-Type` header value.
pub fn decode(content_type: &str, body: Body<'_>) -> Result<DecodedForm, MultipartError> {
    let boundary = parse_boundary(content_type)?;
    MultipartDecoder::new(&boundary).decode(body)
}

fn ends_delimiter_line(rest: &[u8]) -> bool {
    rest.is_empty()
        || rest.starts_with(b"--")
        || rest.starts_with(b"\r\n")
        || matches!(rest[0], b' ' | b'\t')
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

/// Split header parameters on `;`, ignoring separators inside quotes.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(value[start..].trim());
    params
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}
