// src/feed/atom.rs
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::Feed;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const GENERATOR: &str = "feed-translator";

/// Render `feed` as an Atom 1.0 document.
pub fn render_atom(feed: &Feed) -> Result<Vec<u8>> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut root = BytesStart::new("feed");
    root.push_attribute(("xmlns", ATOM_NS));
    if let Some(lang) = feed.language.as_deref() {
        root.push_attribute(("xml:lang", lang));
    }
    w.write_event(Event::Start(root))?;

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let feed_updated = feed.updated.clone().unwrap_or(now);

    text_element(&mut w, "title", &feed.title)?;
    text_element(
        &mut w,
        "id",
        feed.link.as_deref().unwrap_or(feed.title.as_str()),
    )?;
    text_element(&mut w, "updated", &feed_updated)?;
    if let Some(link) = feed.link.as_deref() {
        link_element(&mut w, link)?;
    }
    if let Some(desc) = feed.description.as_deref() {
        text_element(&mut w, "subtitle", desc)?;
    }
    text_element(&mut w, "generator", GENERATOR)?;

    for entry in &feed.entries {
        w.write_event(Event::Start(BytesStart::new("entry")))?;
        text_element(&mut w, "title", &entry.title)?;
        let id = entry
            .id
            .as_deref()
            .or(entry.link.as_deref())
            .unwrap_or(entry.title.as_str());
        text_element(&mut w, "id", id)?;
        if let Some(link) = entry.link.as_deref() {
            link_element(&mut w, link)?;
        }
        let updated = entry
            .updated
            .as_deref()
            .or(entry.published.as_deref())
            .unwrap_or(feed_updated.as_str());
        text_element(&mut w, "updated", updated)?;
        if let Some(published) = entry.published.as_deref() {
            text_element(&mut w, "published", published)?;
        }
        if let Some(author) = entry.author.as_deref() {
            w.write_event(Event::Start(BytesStart::new("author")))?;
            text_element(&mut w, "name", author)?;
            w.write_event(Event::End(BytesEnd::new("author")))?;
        }
        if let Some(summary) = entry.summary.as_deref() {
            html_element(&mut w, "summary", summary)?;
        }
        if let Some(content) = entry.content.as_deref() {
            html_element(&mut w, "content", content)?;
        }
        w.write_event(Event::End(BytesEnd::new("entry")))?;
    }

    w.write_event(Event::End(BytesEnd::new("feed")))?;
    Ok(w.into_inner())
}

fn text_element(w: &mut Writer<Vec<u8>>, name: &str, value: &str) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(value)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn html_element(w: &mut Writer<Vec<u8>>, name: &str, html: &str) -> Result<()> {
    w.write_event(Event::Start(
        BytesStart::new(name).with_attributes([("type", "html")]),
    ))?;
    w.write_event(Event::Text(BytesText::new(html)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn link_element(w: &mut Writer<Vec<u8>>, href: &str) -> Result<()> {
    w.write_event(Event::Empty(
        BytesStart::new("link").with_attributes([("rel", "alternate"), ("href", href)]),
    ))?;
    Ok(())
}
