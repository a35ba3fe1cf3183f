//! Just enough HTML scraping to read page titles and `<meta>` tags.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").expect("title pattern"));
static META_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("meta pattern"));
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z_:.-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("attribute pattern")
});

/// Text of the first `<title>` element.
pub fn page_title(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .and_then(|captures| captures.get(1))
        .map(|title| decode_entities(title.as_str().trim()))
        .filter(|title| !title.is_empty())
}

/// `content` of every `<meta>` tag whose `attr` equals `value`, in document order.
pub fn meta_contents(html: &str, attr: &str, value: &str) -> Vec<String> {
    META_RE
        .find_iter(html)
        .filter_map(|tag| {
            let attrs = attributes(tag.as_str());
            if attrs.get(attr).map(String::as_str) != Some(value) {
                return None;
            }
            attrs.get("content").cloned()
        })
        .collect()
}

pub fn meta_content(html: &str, attr: &str, value: &str) -> Option<String> {
    meta_contents(html, attr, value).into_iter().next()
}

fn attributes(tag: &str) -> HashMap<String, String> {
    ATTR_RE
        .captures_iter(tag)
        .filter_map(|captures| {
            let name = captures.get(1)?.as_str().to_ascii_lowercase();
            let value = captures.get(2).or_else(|| captures.get(3))?.as_str();
            Some((name, decode_entities(value)))
        })
        .collect()
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html><html><head>
        <title>Never Gonna Give You Up - song and lyrics by Rick Astley | Spotify</title>
        <meta property="og:image" content="https://i.scdn.co/image/abc"/>
        <meta name="music:song" content="https://open.spotify.com/track/111">
        <meta content='https://open.spotify.com/track/222' name='music:song'>
        <meta name="music:song">
        <meta name="description" content="Tom &amp; Jerry">
    </head></html>"#;

    #[test]
    fn reads_title() {
        assert_eq!(
            page_title(PAGE).as_deref(),
            Some("Never Gonna Give You Up - song and lyrics by Rick Astley | Spotify")
        );
        assert_eq!(page_title("<html></html>"), None);
    }

    #[test]
    fn reads_meta_tags_in_order_skipping_empty_ones() {
        assert_eq!(
            meta_contents(PAGE, "name", "music:song"),
            vec!["https://open.spotify.com/track/111", "https://open.spotify.com/track/222"]
        );
        assert_eq!(
            meta_content(PAGE, "property", "og:image").as_deref(),
            Some("https://i.scdn.co/image/abc")
        );
        assert_eq!(meta_content(PAGE, "name", "description").as_deref(), Some("Tom & Jerry"));
        assert_eq!(meta_content(PAGE, "property", "og:audio"), None);
    }
}
