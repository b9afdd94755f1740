//! RSS 2.0 / RDF / Atom parser
//!
//! Only the handful of fields a headline ticker needs are extracted. Items
//! without a title are skipped.

use super::FeedError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use vitrine_common::models::NewsItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Summary,
    Link,
    Published,
}

#[derive(Debug, Default)]
struct ItemBuilder {
    title: Option<String>,
    summary: Option<String>,
    link: Option<String>,
    published: Option<String>,
}

impl ItemBuilder {
    fn set(&mut self, field: Field, value: String) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Summary => &mut self.summary,
            Field::Link => &mut self.link,
            Field::Published => &mut self.published,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }

    fn build(self) -> Option<NewsItem> {
        Some(NewsItem {
            title: self.title?,
            summary: self.summary,
            link: self.link,
            published: self.published,
        })
    }
}

fn field_for(local_name: &[u8]) -> Option<Field> {
    match local_name {
        b"title" => Some(Field::Title),
        b"description" | b"summary" | b"content" => Some(Field::Summary),
        b"link" => Some(Field::Link),
        b"pubDate" | b"published" | b"updated" | b"date" => Some(Field::Published),
        _ => None,
    }
}

/// Atom links carry the URL in `href`; prefer `rel="alternate"` or no rel
fn atom_href(e: &BytesStart<'_>) -> Option<String> {
    let mut href = None;
    let mut rel_ok = true;
    for attr in e.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(String::from_utf8_lossy(&attr.value).to_string()),
            b"rel" => rel_ok = attr.value.as_ref() == b"alternate",
            _ => {}
        }
    }
    href.filter(|_| rel_ok)
}

/// Parse a feed document into news items in document order
pub fn parse_feed(xml: &str) -> Result<Vec<NewsItem>, FeedError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::with_capacity(512);

    let mut saw_root = false;
    let mut current: Option<ItemBuilder> = None;
    let mut field: Option<Field> = None;
    let mut depth_in_field = 0usize;
    let mut text = String::new();
    let mut items = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                let name = name.as_ref();
                if !saw_root {
                    if !matches!(name, b"rss" | b"feed" | b"RDF") {
                        return Err(FeedError::Parse(format!(
                            "Unexpected root element <{}>",
                            String::from_utf8_lossy(name)
                        )));
                    }
                    saw_root = true;
                } else if field.is_some() {
                    // Markup nested inside a field, e.g. xhtml content
                    depth_in_field += 1;
                } else if matches!(name, b"item" | b"entry") {
                    current = Some(ItemBuilder::default());
                } else if let Some(item) = current.as_mut() {
                    if let Some(f) = field_for(name) {
                        if f == Field::Link {
                            if let Some(href) = atom_href(&e) {
                                item.set(Field::Link, href);
                            }
                        }
                        field = Some(f);
                        depth_in_field = 0;
                        text.clear();
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(item) = current.as_mut() {
                    if field.is_none() && e.local_name().as_ref() == b"link" {
                        if let Some(href) = atom_href(&e) {
                            item.set(Field::Link, href);
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if field.is_some() {
                    let unescaped = e
                        .unescape()
                        .map_err(|err| FeedError::Parse(err.to_string()))?;
                    text.push_str(&unescaped);
                }
            }
            Ok(Event::CData(e)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                let name = name.as_ref();
                if let Some(f) = field {
                    if depth_in_field > 0 {
                        depth_in_field -= 1;
                    } else {
                        if let Some(item) = current.as_mut() {
                            item.set(f, std::mem::take(&mut text));
                        }
                        field = None;
                    }
                } else if matches!(name, b"item" | b"entry") {
                    if let Some(item) = current.take().and_then(ItemBuilder::build) {
                        items.push(item);
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                return Err(FeedError::Parse(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
        buf.clear();
    }

    if !saw_root {
        return Err(FeedError::Parse("Document has no root element".to_string()));
    }
    Ok(items)
}
