// src/feed/mod.rs
pub mod atom;
pub mod parse;

pub use atom::render_atom;
pub use parse::parse_feed;

use serde::{Deserialize, Serialize};

/// Format-neutral view of an RSS or Atom document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    /// RFC 3339 when the source date could be parsed.
    pub updated: Option<String>,
    pub language: Option<String>,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: Option<String>,
    pub title: String,
    pub link: Option<String>,
    pub author: Option<String>,
    /// HTML.
    pub summary: Option<String>,
    /// HTML.
    pub content: Option<String>,
    pub published: Option<String>,
    pub updated: Option<String>,
}
