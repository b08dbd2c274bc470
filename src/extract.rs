//! XML document extraction.
//!
//! Pulls the body text and a fixed set of metadata fields out of one PMC
//! article. Extraction is the pipeline's failure-isolation boundary: a
//! malformed document is logged and reported as `text: None`, never as an
//! error, so one bad member cannot stop an archive walk.

use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::IngestError;

/// Metadata pulled from one article by fixed structural queries.
///
/// Every field is explicitly optional: "the document has no DOI" and "the
/// DOI is an empty string" are different statements and only the former is
/// representable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleMetadata {
    pub file: Option<String>,
    pub title: Option<String>,
    pub journal: Option<String>,
    pub year: Option<String>,
    pub doi: Option<String>,
    pub pmid: Option<String>,
}

/// Result of extracting one archive member.
///
/// `text: None` signals a parse failure; `Some("")` is a well-formed
/// document with an empty (or absent) body.
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    pub text: Option<String>,
    pub metadata: ArticleMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    None,
    Title,
    Journal,
    Year,
    Doi,
    Pmid,
}

impl Capture {
    fn element(self) -> &'static [u8] {
        match self {
            Capture::Title => b"article-title",
            Capture::Journal => b"journal-title",
            Capture::Year => b"year",
            Capture::Doi | Capture::Pmid => b"article-id",
            Capture::None => b"",
        }
    }
}

#[derive(Default)]
struct Fields {
    title: Option<String>,
    journal: Option<String>,
    year: Option<String>,
    doi: Option<String>,
    pmid: Option<String>,
}

impl Fields {
    fn slot(&mut self, capture: Capture) -> Option<&mut Option<String>> {
        match capture {
            Capture::Title => Some(&mut self.title),
            Capture::Journal => Some(&mut self.journal),
            Capture::Year => Some(&mut self.year),
            Capture::Doi => Some(&mut self.doi),
            Capture::Pmid => Some(&mut self.pmid),
            Capture::None => None,
        }
    }
}

/// Parses one document's raw bytes into body text plus metadata.
///
/// Missing fields are recorded as absent rather than failing; any parse or
/// encoding failure yields `(None, empty metadata)` and a warning naming the
/// member.
pub fn extract_article(bytes: &[u8], name: &str) -> ExtractedDocument {
    match parse_article(bytes, name) {
        Ok(document) => document,
        Err(err) => {
            warn!(member = name, kind = err.kind(), error = %err, "failed to extract document");
            ExtractedDocument::default()
        }
    }
}

fn parse_error(name: &str, detail: impl ToString) -> IngestError {
    IngestError::Parse {
        name: name.to_string(),
        detail: detail.to_string(),
    }
}

fn parse_article(bytes: &[u8], name: &str) -> Result<ExtractedDocument, IngestError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();

    let mut fields = Fields::default();
    let mut body_parts: Vec<String> = Vec::new();
    // Open-element count; the reader reports Eof without error on truncated
    // documents, so unclosed elements have to be caught here.
    let mut depth = 0usize;
    let mut body_depth = 0usize;
    let mut in_pub_date = false;
    let mut capture = Capture::None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => {
                depth += 1;
                match start.local_name().as_ref() {
                    b"body" => body_depth += 1,
                    b"pub-date" => in_pub_date = true,
                    b"article-title" if fields.title.is_none() && body_depth == 0 => {
                        capture = Capture::Title;
                    }
                    b"journal-title" if fields.journal.is_none() => {
                        capture = Capture::Journal;
                    }
                    b"year" if in_pub_date && fields.year.is_none() => {
                        capture = Capture::Year;
                    }
                    b"article-id" => {
                        match start
                            .try_get_attribute("pub-id-type")
                            .map_err(|err| parse_error(name, err))?
                        {
                            Some(attr) => match attr.value.as_ref() {
                                b"doi" if fields.doi.is_none() => capture = Capture::Doi,
                                b"pmid" if fields.pmid.is_none() => capture = Capture::Pmid,
                                _ => {}
                            },
                            None => {}
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(end)) => {
                depth = depth.saturating_sub(1);
                match end.local_name().as_ref() {
                    b"body" => body_depth = body_depth.saturating_sub(1),
                    b"pub-date" => in_pub_date = false,
                    _ => {}
                }
                if capture != Capture::None && end.local_name().as_ref() == capture.element() {
                    capture = Capture::None;
                }
            }
            Ok(Event::Text(text)) => {
                let decoded = text.unescape().map_err(|err| IngestError::Encoding {
                    name: name.to_string(),
                    detail: err.to_string(),
                })?;
                record_text(&decoded, body_depth, capture, &mut fields, &mut body_parts);
            }
            Ok(Event::CData(cdata)) => {
                let decoded = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                record_text(&decoded, body_depth, capture, &mut fields, &mut body_parts);
            }
            Ok(Event::Eof) => {
                if depth > 0 {
                    return Err(parse_error(
                        name,
                        format!("unexpected end of file with {depth} unclosed element(s)"),
                    ));
                }
                break;
            }
            Ok(_) => {}
            Err(err) => return Err(parse_error(name, err)),
        }
        buf.clear();
    }

    let metadata = ArticleMetadata {
        file: base_name(name),
        title: finalize(fields.title),
        journal: finalize(fields.journal),
        year: finalize(fields.year),
        doi: finalize(fields.doi),
        pmid: finalize(fields.pmid),
    };
    Ok(ExtractedDocument {
        text: Some(body_parts.join(" ").trim().to_string()),
        metadata,
    })
}

fn record_text(
    decoded: &str,
    body_depth: usize,
    capture: Capture,
    fields: &mut Fields,
    body_parts: &mut Vec<String>,
) {
    if body_depth > 0 {
        let trimmed = decoded.trim();
        if !trimmed.is_empty() {
            body_parts.push(trimmed.to_string());
        }
    }
    if let Some(slot) = fields.slot(capture) {
        slot.get_or_insert_with(String::new).push_str(decoded);
    }
}

fn finalize(field: Option<String>) -> Option<String> {
    field
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn base_name(name: &str) -> Option<String> {
    Path::new(name)
        .file_name()
        .map(|file| file.to_string_lossy().into_owned())
        .or_else(|| Some(name.to_string()))
}
