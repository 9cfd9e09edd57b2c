//! Readable text extraction from HTML.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static SKIPPED_ELEMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script\s*>|<style[^>]*>.*?</style\s*>|<noscript[^>]*>.*?</noscript\s*>")
        .expect("skipped elements pattern")
});
static COMMENTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment pattern"));
static BLOCK_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(div|p|br|h[1-6]|li|ul|ol|tr|td|th|table|blockquote|pre|section|article|header|footer|main|aside|nav|title)(\s[^>]*)?/?>")
        .expect("block tag pattern")
});
static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern"));
static NUMERIC_ENTITIES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(?:([0-9]+)|[xX]([0-9a-fA-F]+));").expect("numeric entity pattern"));

/// Extracts the readable text of an HTML page.
///
/// Script, style and noscript elements are dropped together with comments,
/// tags are stripped, common entities decoded, then every line is trimmed and
/// blank lines removed.
///
/// ```
/// use pagewise_core::web::extract_text;
///
/// let html = "<h1>Title</h1><script>track()</script><p>Fish &amp; chips</p>";
/// assert_eq!(extract_text(html), "Title\nFish & chips");
/// ```
pub fn extract_text(html: &str) -> String {
    let text = SKIPPED_ELEMENTS.replace_all(html, "");
    let text = COMMENTS.replace_all(&text, "");
    let text = BLOCK_TAGS.replace_all(&text, "\n");
    let text = TAGS.replace_all(&text, "");
    let text = decode_entities(&text);

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    let text = NUMERIC_ENTITIES.replace_all(text, |caps: &Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(dec), _) => dec.as_str().parse::<u32>().ok(),
            (_, Some(hex)) => u32::from_str_radix(hex.as_str(), 16).ok(),
            _ => None,
        };
        code.and_then(char::from_u32).map(String::from).unwrap_or_default()
    });

    // &amp; last so "&amp;lt;" decodes to "&lt;" and not "<"
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&ndash;", "\u{2013}")
        .replace("&mdash;", "\u{2014}")
        .replace("&hellip;", "\u{2026}")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_scripts_styles_and_comments() {
        let html = r#"<html><head><style>body { color: red; }</style></head>
            <body><!-- hidden --><p>Before</p><script type="text/javascript">alert('hi');</script>
            <noscript>Enable JS</noscript><p>After</p></body></html>"#;
        let text = extract_text(html);
        assert_eq!(text, "Before\nAfter");
    }

    #[test]
    fn test_trims_lines_and_drops_blanks() {
        let html = "<div>\n   first   \n\n\t\n  second\n</div>";
        assert_eq!(extract_text(html), "first\nsecond");
    }

    #[test]
    fn test_inline_tags_keep_words_together() {
        let html = "<p>Read the <a href=\"/docs\">manual</a> <b>first</b>.</p>";
        assert_eq!(extract_text(html), "Read the manual first.");
    }

    #[test]
    fn test_decodes_entities() {
        let html = "<p>Tom &amp; Jerry &lt;3 &#39;quoted&#x27; caf&#233; &amp;lt;</p>";
        assert_eq!(extract_text(html), "Tom & Jerry <3 'quoted' café &lt;");
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(extract_text(""), "");
        assert_eq!(extract_text("<html><body></body></html>"), "");
    }
}
