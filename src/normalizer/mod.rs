use chrono::Utc;
use feed_rs::model::{Entry, Link};
use feed_rs::parser;
use html_escape::decode_html_entities;

use crate::app::{EstuaryError, Result};
use crate::domain::ParsedItem;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub html_url: Option<String>,
}

/// Turns raw RSS/Atom/JSON Feed bytes into item descriptors.
#[derive(Clone)]
pub struct Normalizer;

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, body: &[u8]) -> Result<(FeedMeta, Vec<ParsedItem>)> {
        // Entries without an id keep it empty so the link becomes their key
        let feed = parser::Builder::new()
            .id_generator(|_, _, _| String::new())
            .build()
            .parse(body)
            .map_err(|e| EstuaryError::FeedParse(e.to_string()))?;

        let meta = FeedMeta {
            title: feed.title.map(|t| decode_html_entities(&t.content).to_string()),
            description: feed
                .description
                .map(|d| decode_html_entities(&d.content).to_string()),
            html_url: alternate_link(&feed.links)
                .or_else(|| feed.links.first())
                .map(|l| l.href.clone()),
        };

        let items = feed.entries.into_iter().map(Self::convert_entry).collect();

        Ok((meta, items))
    }

    fn convert_entry(entry: Entry) -> ParsedItem {
        let link_href = entry.links.first().map(|l| l.href.clone());
        let link_alternate = alternate_link(&entry.links)
            .map(|l| l.href.clone())
            .filter(|href| Some(href) != link_href.as_ref());
        let author = entry.authors.first();

        ParsedItem {
            guid: Some(entry.id).filter(|id| !id.trim().is_empty()),
            title: entry
                .title
                .map(|t| decode_html_entities(&t.content).to_string()),
            link_href,
            link_alternate,
            author_name: author.map(|a| a.name.clone()).filter(|n| !n.is_empty()),
            author_email: author.and_then(|a| a.email.clone()),
            author_uri: author.and_then(|a| a.uri.clone()),
            published: entry
                .published
                .or(entry.updated)
                .map(|dt| dt.with_timezone(&Utc)),
            content: entry
                .content
                .and_then(|c| c.body)
                .map(|b| decode_html_entities(&b).to_string()),
            description: entry
                .summary
                .map(|s| decode_html_entities(&s.content).to_string()),
            category: entry.categories.first().map(|c| {
                c.label.clone().unwrap_or_else(|| c.term.clone())
            }),
        }
    }
}

fn alternate_link(links: &[Link]) -> Option<&Link> {
    links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Feed</title>
    <link>https://example.com/</link>
    <description>A test feed</description>
    <item>
      <title>Test Item 1</title>
      <link>https://example.com/item1</link>
      <guid>item-1</guid>
      <category>Rust</category>
      <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
      <description>This is item 1 &amp; more</description>
    </item>
    <item>
      <title>Test Item 2</title>
      <link>https://example.com/item2</link>
      <guid>item-2</guid>
      <description>This is item 2</description>
    </item>
  </channel>
</rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Test Feed</title>
  <subtitle>An Atom test feed</subtitle>
  <id>urn:feed</id>
  <updated>2024-01-01T00:00:00Z</updated>
  <entry>
    <title>Atom Entry 1</title>
    <link rel="alternate" href="https://example.com/atom1"/>
    <id>atom-entry-1</id>
    <updated>2024-01-01T00:00:00Z</updated>
    <author>
      <name>Jo Writer</name>
      <email>jo@example.com</email>
      <uri>https://example.com/~jo</uri>
    </author>
    <summary>This is Atom entry 1</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss() {
        let normalizer = Normalizer::new();
        let (meta, items) = normalizer.normalize(RSS_SAMPLE.as_bytes()).unwrap();

        assert_eq!(meta.title, Some("Test Feed".into()));
        assert_eq!(meta.description, Some("A test feed".into()));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, Some("Test Item 1".into()));
        assert_eq!(items[0].link_href, Some("https://example.com/item1".into()));
        assert_eq!(items[0].category, Some("Rust".into()));
        assert_eq!(
            items[0].description,
            Some("This is item 1 & more".into())
        );
        assert!(items[0].published.is_some());
        assert!(items[1].published.is_none());
    }

    #[test]
    fn test_parse_atom_author_fields() {
        let normalizer = Normalizer::new();
        let (meta, items) = normalizer.normalize(ATOM_SAMPLE.as_bytes()).unwrap();

        assert_eq!(meta.title, Some("Atom Test Feed".into()));
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.guid, Some("atom-entry-1".into()));
        assert_eq!(item.link_href, Some("https://example.com/atom1".into()));
        assert_eq!(item.author_name, Some("Jo Writer".into()));
        assert_eq!(item.author_email, Some("jo@example.com".into()));
        assert_eq!(item.author_uri, Some("https://example.com/~jo".into()));
    }

    #[test]
    fn test_identity_is_stable_across_parses() {
        let normalizer = Normalizer::new();
        let (_, first) = normalizer.normalize(RSS_SAMPLE.as_bytes()).unwrap();
        let (_, second) = normalizer.normalize(RSS_SAMPLE.as_bytes()).unwrap();

        assert_eq!(first[0].identity_key(), second[0].identity_key());
        assert_eq!(first[1].identity_key(), second[1].identity_key());
    }

    #[test]
    fn test_link_is_identity_without_guid() {
        let doc = |title: &str| {
            format!(
                r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title><link>https://a.example/</link>
<item><title>{title}</title><link>https://a.example/post</link></item>
</channel></rss>"#
            )
        };
        let normalizer = Normalizer::new();
        let (_, first) = normalizer.normalize(doc("Original").as_bytes()).unwrap();
        let (_, edited) = normalizer.normalize(doc("Edited title").as_bytes()).unwrap();

        assert_eq!(first[0].guid, None);
        assert_eq!(first[0].identity_key(), Some("https://a.example/post"));
        assert_eq!(edited[0].identity_key(), first[0].identity_key());
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let normalizer = Normalizer::new();
        let result = normalizer.normalize(b"<html><body>not a feed</body></html>");
        assert!(matches!(result, Err(EstuaryError::FeedParse(_))));
    }
}
