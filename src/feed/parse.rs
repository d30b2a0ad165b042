// src/feed/parse.rs
//! RSS 2.0 / RSS 1.0 / Atom 1.0 reader built on quick-xml events.

use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use super::{Entry, Feed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedFormat {
    Rss,
    Atom,
}

impl FeedFormat {
    fn from_root(name: &str) -> Option<Self> {
        match name {
            "rss" | "rdf:RDF" => Some(Self::Rss),
            "feed" => Some(Self::Atom),
            _ => None,
        }
    }
}

/// Parse a feed document. Fails on malformed XML or an unknown root element.
pub fn parse_feed(bytes: &[u8]) -> Result<Feed> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut state = ParseState::default();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).context("malformed feed xml")? {
            Event::Start(e) => state.open(&e),
            Event::Empty(e) if state.in_markup() => {
                state.text.push_str(&format!("<{}/>", String::from_utf8_lossy(&e)));
            }
            Event::Empty(e) => {
                state.open(&e);
                state.close(&qname(&e));
            }
            Event::Text(t) => {
                let raw = String::from_utf8_lossy(&t);
                if state.in_markup() {
                    state.text.push_str(&raw);
                } else {
                    state
                        .text
                        .push_str(&html_escape::decode_html_entities(&raw));
                }
            }
            Event::CData(c) => state.text.push_str(&String::from_utf8_lossy(&c)),
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if state.in_markup_child() {
                    state.stack.pop();
                    state.text.push_str(&format!("</{name}>"));
                } else {
                    state.close(&name);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    state.finish()
}

#[derive(Default)]
struct ParseState {
    format: Option<FeedFormat>,
    stack: Vec<String>,
    feed: Feed,
    entry: Option<Entry>,
    text: String,
    /// Stack depth of an open Atom `type="xhtml"` text construct. Its child elements
    /// are kept verbatim as the field's HTML instead of being parsed.
    markup: Option<usize>,
}

impl ParseState {
    fn in_markup(&self) -> bool {
        self.markup.is_some()
    }

    fn in_markup_child(&self) -> bool {
        self.markup.is_some_and(|depth| self.stack.len() > depth)
    }

    fn open(&mut self, e: &BytesStart) {
        let name = qname(e);
        if self.in_markup() {
            self.text
                .push_str(&format!("<{}>", String::from_utf8_lossy(e)));
            self.stack.push(name);
            return;
        }
        if self.stack.is_empty() && self.format.is_none() {
            self.format = FeedFormat::from_root(&name);
            if name == "feed" {
                self.feed.language = attr(e, "xml:lang");
            }
        }
        if matches!(name.as_str(), "item" | "entry") {
            self.entry = Some(Entry::default());
        }
        if name == "link" {
            self.take_link_href(e);
        }
        self.text.clear();
        let xhtml = self.entry.is_some()
            && matches!(name.as_str(), "content" | "summary")
            && attr(e, "type").as_deref() == Some("xhtml");
        self.stack.push(name);
        if xhtml {
            self.markup = Some(self.stack.len());
        }
    }

    // Atom links carry the URL in `href`; only alternate links are kept.
    fn take_link_href(&mut self, e: &BytesStart) {
        let Some(href) = attr(e, "href") else {
            return;
        };
        if attr(e, "rel").is_some_and(|rel| rel != "alternate") {
            return;
        }
        match self.stack.last().map(String::as_str) {
            Some("entry") | Some("item") => {
                if let Some(entry) = self.entry.as_mut() {
                    entry.link.get_or_insert(href);
                }
            }
            Some("feed") | Some("channel") => {
                self.feed.link.get_or_insert(href);
            }
            _ => {}
        }
    }

    fn close(&mut self, name: &str) {
        self.markup = None;
        self.stack.pop();
        let value = std::mem::take(&mut self.text).trim().to_string();
        let parent = self.stack.last().map(String::as_str).unwrap_or("");

        if matches!(name, "item" | "entry") {
            if let Some(entry) = self.entry.take() {
                self.feed.entries.push(entry);
            }
            return;
        }
        if value.is_empty() {
            return;
        }

        if let Some(entry) = self.entry.as_mut() {
            if parent == "author" && name == "name" {
                entry.author = Some(value);
                return;
            }
            if !matches!(parent, "item" | "entry") {
                return;
            }
            match name {
                "title" => entry.title = value,
                "link" => {
                    entry.link.get_or_insert(value);
                }
                "guid" | "id" => entry.id = Some(value),
                "description" | "summary" => entry.summary = Some(value),
                "content:encoded" | "content" => entry.content = Some(value),
                "pubDate" | "published" => entry.published = Some(normalize_date(&value)),
                "dc:date" => {
                    entry.published.get_or_insert(normalize_date(&value));
                }
                "updated" => entry.updated = Some(normalize_date(&value)),
                "author" | "dc:creator" => entry.author = Some(value),
                _ => {}
            }
        } else if matches!(parent, "channel" | "feed") {
            match name {
                "title" => self.feed.title = value,
                "link" => {
                    self.feed.link.get_or_insert(value);
                }
                "description" | "subtitle" => self.feed.description = Some(value),
                "lastBuildDate" | "updated" => self.feed.updated = Some(normalize_date(&value)),
                "pubDate" | "dc:date" => {
                    self.feed.updated.get_or_insert(normalize_date(&value));
                }
                "language" | "dc:language" => self.feed.language = Some(value),
                _ => {}
            }
        }
    }

    fn finish(self) -> Result<Feed> {
        if self.format.is_none() {
            bail!("not an RSS or Atom document");
        }
        Ok(self.feed)
    }
}

fn qname(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attr(e: &BytesStart, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key.as_bytes())
        .map(|a| html_escape::decode_html_entities(&String::from_utf8_lossy(&a.value)).into_owned())
}

/// RFC 2822 dates become RFC 3339; anything else is kept as-is.
pub(crate) fn normalize_date(raw: &str) -> String {
    OffsetDateTime::parse(raw, &Rfc2822)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_else(|| raw.to_string())
}
