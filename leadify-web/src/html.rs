//! Plain-text extraction from HTML
//!
//! A small tag-stripping pass tuned for the engine's needs: readable body
//! text for relevance scoring and fact extraction, not faithful rendering.
//! Script and style contents are dropped, block-level elements become line
//! breaks, common entities are decoded, and blank runs are collapsed.

/// Tags whose entire content is noise for extraction purposes
const SKIPPED_TAGS: [&str; 4] = ["script", "style", "noscript", "svg"];

/// Tags that terminate a line of visible text
const BLOCK_TAGS: [&str; 14] = [
    "p", "div", "br", "li", "tr", "section", "article", "h1", "h2", "h3", "h4", "h5", "h6",
    "blockquote",
];

/// Convert an HTML document into plain text.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 4);
    let mut rest = html;
    let mut skipping: Option<&str> = None;

    while let Some(open) = rest.find('<') {
        if skipping.is_none() {
            push_text(&mut out, &rest[..open]);
        }

        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('>') else {
            // Unterminated tag; drop the remainder
            rest = "";
            break;
        };

        let raw_tag = &after_open[..close];
        let (closing, name) = tag_name(raw_tag);

        match skipping {
            Some(awaited) => {
                if closing && name.eq_ignore_ascii_case(awaited) {
                    skipping = None;
                }
            }
            None => {
                if !closing {
                    if let Some(skip) = SKIPPED_TAGS
                        .iter()
                        .copied()
                        .find(|t| name.eq_ignore_ascii_case(t))
                    {
                        skipping = Some(skip);
                    }
                }
                if BLOCK_TAGS.iter().any(|t| name.eq_ignore_ascii_case(t)) {
                    out.push('\n');
                }
            }
        }

        rest = &after_open[close + 1..];
    }

    if skipping.is_none() {
        push_text(&mut out, rest);
    }

    collapse_whitespace(&out)
}

/// Split a raw tag body into (is_closing, name)
fn tag_name(raw: &str) -> (bool, &str) {
    let trimmed = raw.trim_start();
    let (closing, trimmed) = match trimmed.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let end = trimmed
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(trimmed.len());
    (closing, &trimmed[..end])
}

/// Append text content with entities decoded
fn push_text(out: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    out.push_str(&decoded);
}

/// Trim lines and collapse runs of blank lines
fn collapse_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            continue;
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Pull the document title, if present
pub fn html_title(html: &str) -> Option<String> {
    let bytes = html.as_bytes();
    let start = find_ascii_case_insensitive(bytes, b"<title")?;
    let content_start = start + bytes[start..].iter().position(|&b| b == b'>')? + 1;
    let end = content_start + find_ascii_case_insensitive(&bytes[content_start..], b"</title>")?;
    let title = collapse_whitespace(html.get(content_start..end)?);
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Byte-window search that ignores ASCII case, safe on non-ASCII documents
fn find_ascii_case_insensitive(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_keeps_text() {
        let html = "<html><body><h1>Acme Corp</h1><p>Based in <b>Osaka</b>.</p></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Acme Corp"));
        assert!(text.contains("Based in Osaka."));
        assert!(!text.contains('<'));
    }

    #[test]
    fn drops_script_and_style_content() {
        let html = "<p>visible</p><script>var secret = 1;</script><style>.x{color:red}</style><p>also visible</p>";
        let text = html_to_text(html);
        assert!(text.contains("visible"));
        assert!(text.contains("also visible"));
        assert!(!text.contains("secret"));
        assert!(!text.contains("color"));
    }

    #[test]
    fn block_tags_become_line_breaks() {
        let html = "<li>one</li><li>two</li><li>three</li>";
        let text = html_to_text(html);
        assert_eq!(text, "one\ntwo\nthree");
    }

    #[test]
    fn decodes_entities() {
        let html = "<p>R&amp;D &quot;lab&quot; &#39;beta&#39;&nbsp;wing</p>";
        let text = html_to_text(html);
        assert_eq!(text, "R&D \"lab\" 'beta' wing");
    }

    #[test]
    fn collapses_blank_runs() {
        let html = "<div>first</div>\n\n\n<div>   </div>\n<div>second</div>";
        let text = html_to_text(html);
        assert_eq!(text, "first\nsecond");
    }

    #[test]
    fn extracts_title() {
        let html = "<html><head><title> Acme Corp — Careers </title></head></html>";
        assert_eq!(html_title(html).unwrap(), "Acme Corp — Careers");
        assert_eq!(html_title("<p>no title</p>"), None);
    }

    #[test]
    fn survives_unterminated_markup() {
        let text = html_to_text("<p>content <a href=");
        assert_eq!(text, "content");
    }
}
