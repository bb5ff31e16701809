//! The small Markdown subset chat replies use, rendered to an HTML fragment.
//!
//! Input is always HTML-escaped before any substitution, so markup coming back from
//! the server (or echoed user text) is displayed rather than interpreted.

use once_cell::sync::Lazy;
use regex::Regex;

static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("bold pattern"));
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.*?)\*").expect("italic pattern"));
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").expect("code pattern"));
static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s<]+").expect("url pattern"));

const BREAK: &str = "<br>";
const BULLET: &str = "• ";

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Bold, italic, inline code, line breaks, then `• ` bullet lines, in that order.
pub fn render_markdown(text: &str) -> String {
    let escaped = escape_html(text);
    let bold = BOLD.replace_all(&escaped, "<strong>$1</strong>");
    let italic = ITALIC.replace_all(&bold, "<em>$1</em>");
    let code = INLINE_CODE.replace_all(&italic, "<code>$1</code>");
    let broken = line_breaks(&code);
    bullets(&broken)
}

/// Escaped text with line breaks only.
pub fn render_plain(text: &str) -> String {
    line_breaks(&escape_html(text))
}

/// Wraps bare `http(s)://` URLs in anchors. Expects already-escaped HTML.
pub fn linkify(html: &str) -> String {
    URL.replace_all(html, r#"<a href="$0" target="_blank" rel="noopener">$0</a>"#).into_owned()
}

/// Renders with the options a widget has switched on.
pub fn render(text: &str, markdown: bool, with_links: bool) -> String {
    let html = if markdown { render_markdown(text) } else { render_plain(text) };
    if with_links { linkify(&html) } else { html }
}

fn line_breaks(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', BREAK)
}

fn bullets(html: &str) -> String {
    let mut out = String::with_capacity(html.len() + 16);
    let mut previous_was_item = false;
    for (i, segment) in html.split(BREAK).enumerate() {
        let item = segment.strip_prefix(BULLET);
        if i > 0 && !(previous_was_item && item.is_some()) {
            out.push_str(BREAK);
        }
        match item {
            Some(body) => {
                out.push_str("<li>");
                out.push_str(body);
                out.push_str("</li>");
            }
            None => out.push_str(segment),
        }
        previous_was_item = item.is_some();
    }

    match (out.find("<li>"), out.rfind("</li>")) {
        (Some(start), Some(end)) => {
            let end = end + "</li>".len();
            format!("{}<ul>{}</ul>{}", &out[..start], &out[start..end], &out[end..])
        }
        _ => out,
    }
}
