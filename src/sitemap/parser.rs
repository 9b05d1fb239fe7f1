use std::borrow::Cow;
use std::io::Read;

use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use thiserror::Error;

/// Upper bound on the inflated size of a gzipped sitemap.
/// The sitemap protocol caps an uncompressed file at 50MB; this leaves headroom
/// while still refusing decompression bombs.
const MAX_DECOMPRESSED_SIZE: u64 = 100 * 1024 * 1024; // 100MB

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One `<url>` entry from a URL-set sitemap.
///
/// Records only come out of [`parse_sitemap`]; there is no public constructor,
/// so a record always carries a non-empty location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRecord {
    #[serde(rename = "url")]
    location: String,
    last_modified: Option<String>,
    change_frequency: Option<String>,
    priority: Option<String>,
}

impl PageRecord {
    pub(crate) fn new(
        location: String,
        last_modified: Option<String>,
        change_frequency: Option<String>,
        priority: Option<String>,
    ) -> Self {
        debug_assert!(!location.is_empty());
        Self {
            location,
            last_modified,
            change_frequency,
            priority,
        }
    }

    /// Absolute URL of the page, exactly as written in `<loc>`.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// `<lastmod>` value, unvalidated.
    pub fn last_modified(&self) -> Option<&str> {
        self.last_modified.as_deref()
    }

    pub fn change_frequency(&self) -> Option<&str> {
        self.change_frequency.as_deref()
    }

    /// `<priority>` value as text; not parsed as a number.
    pub fn priority(&self) -> Option<&str> {
        self.priority.as_deref()
    }
}

/// Errors that can occur while turning a fetched resource into page records.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The body could not be decompressed or is not valid UTF-8.
    #[error("Failed to decode sitemap: {0}")]
    Decode(String),
    /// The XML parser could not build a document.
    #[error("{0}")]
    MalformedXml(String),
    /// The document is a sitemap index. Carries every child sitemap URL so the
    /// caller can run discovery against one of them.
    #[error("Multiple sitemaps found. Please use one of these URLs:\n{}", .0.join("\n"))]
    SitemapIndex(Vec<String>),
    /// The document is neither a populated `<urlset>` nor a `<sitemapindex>`.
    #[error("Invalid sitemap format: no URLs found")]
    NoUrlsFound,
}

/// Parses a sitemap body into page records.
///
/// `content_type` is the declared `Content-Type` of the response. When it
/// mentions gzip the body is inflated first; a body that starts with the gzip
/// magic bytes is inflated as well, since servers commonly label `.xml.gz`
/// files as `application/octet-stream`.
///
/// # Errors
///
/// - [`ParseError::Decode`] for corrupt gzip streams or invalid UTF-8
/// - [`ParseError::MalformedXml`] with the XML parser's message
/// - [`ParseError::SitemapIndex`] when the document lists other sitemaps
/// - [`ParseError::NoUrlsFound`] for any other document shape
pub fn parse_sitemap(bytes: &[u8], content_type: &str) -> Result<Vec<PageRecord>, ParseError> {
    let text = decode_body(bytes, content_type)?;
    parse_sitemap_xml(&text)
}

fn decode_body(bytes: &[u8], content_type: &str) -> Result<String, ParseError> {
    let declared_gzip = content_type.to_ascii_lowercase().contains("gzip");

    let raw: Cow<'_, [u8]> = if declared_gzip || bytes.starts_with(&GZIP_MAGIC) {
        Cow::Owned(gunzip(bytes)?)
    } else {
        Cow::Borrowed(bytes)
    };

    let body = raw.strip_prefix(b"\xef\xbb\xbf").unwrap_or(&raw);
    String::from_utf8(body.to_vec())
        .map_err(|e| ParseError::Decode(format!("invalid UTF-8: {e}")))
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, ParseError> {
    let mut out = Vec::new();
    GzDecoder::new(bytes)
        .take(MAX_DECOMPRESSED_SIZE + 1)
        .read_to_end(&mut out)
        .map_err(|e| ParseError::Decode(format!("gzip: {e}")))?;

    if out.len() as u64 > MAX_DECOMPRESSED_SIZE {
        return Err(ParseError::Decode(format!(
            "decompressed sitemap exceeds {MAX_DECOMPRESSED_SIZE} bytes"
        )));
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootKind {
    UrlSet,
    Index,
    Other,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Loc,
    LastMod,
    ChangeFreq,
    Priority,
}

/// Child values of the `<url>` or `<sitemap>` entry being read.
#[derive(Debug, Default)]
struct Entry {
    loc: Option<String>,
    lastmod: Option<String>,
    changefreq: Option<String>,
    priority: Option<String>,
}

impl Entry {
    /// First occurrence wins; later duplicates of the same child are ignored.
    fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Loc => &mut self.loc,
            Field::LastMod => &mut self.lastmod,
            Field::ChangeFreq => &mut self.changefreq,
            Field::Priority => &mut self.priority,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Streaming classifier over the XML event stream.
///
/// Depth 1 is the root, depth 2 the `<url>`/`<sitemap>` entries and depth 3
/// their direct children. Anything deeper (image and video extensions) is
/// walked for well-formedness but otherwise ignored.
#[derive(Default)]
struct SitemapBuilder {
    stack: Vec<Vec<u8>>,
    root: Option<RootKind>,
    entries_seen: usize,
    current: Option<Entry>,
    capturing: Option<Field>,
    text: String,
    records: Vec<PageRecord>,
    child_sitemaps: Vec<String>,
}

impl SitemapBuilder {
    fn open(&mut self, local_name: &[u8]) -> Result<(), ParseError> {
        if self.stack.is_empty() {
            if self.root.is_some() {
                return Err(ParseError::MalformedXml(
                    "document has more than one root element".to_owned(),
                ));
            }
            self.root = Some(match local_name {
                b"urlset" => RootKind::UrlSet,
                b"sitemapindex" => RootKind::Index,
                _ => RootKind::Other,
            });
        }

        self.stack.push(local_name.to_vec());

        match (self.stack.len(), self.root, local_name) {
            (2, Some(RootKind::UrlSet), b"url") | (2, Some(RootKind::Index), b"sitemap") => {
                self.entries_seen += 1;
                self.current = Some(Entry::default());
            }
            (3, _, name) if self.current.is_some() => {
                self.capturing = match name {
                    b"loc" => Some(Field::Loc),
                    b"lastmod" => Some(Field::LastMod),
                    b"changefreq" => Some(Field::ChangeFreq),
                    b"priority" => Some(Field::Priority),
                    _ => None,
                };
                self.text.clear();
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self) {
        let depth = self.stack.len();
        self.stack.pop();

        match depth {
            3 => {
                if let (Some(field), Some(entry)) = (self.capturing.take(), self.current.as_mut()) {
                    entry.set(field, self.text.trim().to_owned());
                }
            }
            2 => {
                if let Some(entry) = self.current.take() {
                    self.finish_entry(entry);
                }
            }
            _ => {}
        }
    }

    fn finish_entry(&mut self, entry: Entry) {
        let Some(loc) = non_empty(entry.loc) else {
            return;
        };
        match self.root {
            Some(RootKind::UrlSet) => self.records.push(PageRecord::new(
                loc,
                non_empty(entry.lastmod),
                non_empty(entry.changefreq),
                non_empty(entry.priority),
            )),
            Some(RootKind::Index) => self.child_sitemaps.push(loc),
            _ => {}
        }
    }

    fn text(&mut self, text: &str) -> Result<(), ParseError> {
        if self.stack.is_empty() {
            return Err(ParseError::MalformedXml(
                "text data outside of root element".to_owned(),
            ));
        }
        if self.capturing.is_some() {
            self.text.push_str(text);
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<PageRecord>, ParseError> {
        if let Some(open) = self.stack.last() {
            return Err(ParseError::MalformedXml(format!(
                "unexpected end of document: unclosed element <{}>",
                String::from_utf8_lossy(open)
            )));
        }

        match self.root {
            Some(RootKind::UrlSet) if self.entries_seen > 0 => Ok(self.records),
            Some(RootKind::Index) if self.entries_seen > 0 => {
                Err(ParseError::SitemapIndex(self.child_sitemaps))
            }
            _ => Err(ParseError::NoUrlsFound),
        }
    }
}

fn parse_sitemap_xml(content: &str) -> Result<Vec<PageRecord>, ParseError> {
    // SEC-002: quick-xml 0.37 never expands <!ENTITY> declarations; unescape()
    // resolves only the five predefined entities and character references.
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut builder = SitemapBuilder::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => builder.open(e.local_name().as_ref())?,
            Ok(Event::Empty(e)) => {
                builder.open(e.local_name().as_ref())?;
                builder.close();
            }
            Ok(Event::End(_)) => builder.close(),
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| ParseError::MalformedXml(err.to_string()))?;
                builder.text(&text)?;
            }
            Ok(Event::CData(e)) => {
                let bytes = e.into_inner();
                builder.text(&String::from_utf8_lossy(&bytes))?;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::MalformedXml(e.to_string())),
            _ => {}
        }
    }

    builder.finish()
}
