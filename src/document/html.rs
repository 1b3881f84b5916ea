//! Root-level markup scanner.
//!
//! Only the top level of the tree is materialized: the extractor needs the
//! outermost elements plus their boundaries, not a full DOM. Nested elements
//! are tracked on a stack so their close tags are matched correctly.

/// Elements that never have content or a close tag.
pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is raw text and is not scanned for tags.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// A raw attribute as written in an open tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub name: String,
    /// Value including its quotes, if any.
    pub value: Option<String>,
}

/// A top-level element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Lowercased tag name.
    pub tag: String,
    /// Offset of the `<` of the open tag.
    pub start: usize,
    /// Offset right after the `>` of the open tag, if the open tag is closed.
    pub start_tag_end: Option<usize>,
    /// Offset of the `<` of the close tag, if present.
    pub end_tag_start: Option<usize>,
    /// Offset right after the whole element.
    pub end: usize,
    pub attributes: Vec<RawAttribute>,
}

struct OpenTag {
    tag: String,
    start_tag_end: Option<usize>,
    end: usize,
    self_closing: bool,
    attributes: Vec<RawAttribute>,
}

/// Scan `text` and return the root-level elements in document order.
pub fn parse_roots(text: &str) -> Vec<Node> {
    let bytes = text.as_bytes();
    let mut roots: Vec<Node> = Vec::new();
    // Names of nested open elements; the root element lives in `current`.
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<Node> = None;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }

        if text[i..].starts_with("<!--") {
            i = match text[i + 4..].find("-->") {
                Some(end) => i + 4 + end + 3,
                None => bytes.len(),
            };
            continue;
        }

        if text[i..].starts_with("<!") || text[i..].starts_with("<?") {
            i = find_byte(bytes, i, b'>').map_or(bytes.len(), |p| p + 1);
            continue;
        }

        if bytes.get(i + 1) == Some(&b'/') {
            let (name, after) = read_name(text, i + 2);
            let close_end = find_byte(bytes, after, b'>').map_or(bytes.len(), |p| p + 1);
            if name.is_empty() {
                i = close_end;
                continue;
            }
            if let Some(depth) = stack.iter().rposition(|open| *open == name) {
                stack.truncate(depth);
            } else if current.as_ref().is_some_and(|node| node.tag == name) {
                if let Some(mut node) = current.take() {
                    node.end_tag_start = Some(i);
                    node.end = close_end;
                    stack.clear();
                    roots.push(node);
                }
            }
            i = close_end;
            continue;
        }

        if !bytes.get(i + 1).is_some_and(u8::is_ascii_alphabetic) {
            i += 1;
            continue;
        }

        let open = read_open_tag(text, i);
        let start = i;
        i = open.end;

        let is_void = open.self_closing || VOID_ELEMENTS.contains(&open.tag.as_str());
        let is_raw = RAW_TEXT_ELEMENTS.contains(&open.tag.as_str());

        if current.is_some() {
            if is_raw && !is_void {
                i = skip_raw_text(text, i, &open.tag).1;
            } else if !is_void {
                stack.push(open.tag);
            }
            continue;
        }

        let mut node = Node {
            tag: open.tag,
            start,
            start_tag_end: open.start_tag_end,
            end_tag_start: None,
            end: open.end,
            attributes: open.attributes,
        };

        if is_void || node.start_tag_end.is_none() {
            roots.push(node);
        } else if is_raw {
            let (close_start, close_end) = skip_raw_text(text, i, &node.tag);
            if close_start < bytes.len() {
                node.end_tag_start = Some(close_start);
            }
            node.end = close_end;
            i = close_end;
            roots.push(node);
        } else {
            current = Some(node);
        }
    }

    if let Some(mut node) = current {
        node.end = bytes.len();
        roots.push(node);
    }

    roots
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes[from.min(bytes.len())..]
        .iter()
        .position(|&b| b == needle)
        .map(|p| from + p)
}

fn read_name(text: &str, from: usize) -> (String, usize) {
    let rest = &text[from.min(text.len())..];
    let len = rest
        .find(|c: char| c.is_whitespace() || matches!(c, '>' | '/' | '='))
        .unwrap_or(rest.len());
    (rest[..len].to_ascii_lowercase(), from + len)
}

/// Find the close tag of a raw-text element. Returns `(close_start, close_end)`;
/// both are the text length when the element is never closed.
fn skip_raw_text(text: &str, from: usize, tag: &str) -> (usize, usize) {
    let needle = format!("</{tag}");
    let lower = text[from..].to_ascii_lowercase();
    let mut search = 0;
    while let Some(found) = lower[search..].find(&needle) {
        let close_start = from + search + found;
        let after = close_start + needle.len();
        let boundary = text[after..]
            .chars()
            .next()
            .map_or(true, |c| c == '>' || c.is_whitespace());
        if boundary {
            let close_end = find_byte(text.as_bytes(), after, b'>').map_or(text.len(), |p| p + 1);
            return (close_start, close_end);
        }
        search += found + needle.len();
    }
    (text.len(), text.len())
}

fn read_open_tag(text: &str, start: usize) -> OpenTag {
    let bytes = text.as_bytes();
    let (tag, mut i) = read_name(text, start + 1);
    let mut attributes = Vec::new();

    while i < bytes.len() {
        match bytes[i] {
            b'>' => {
                return OpenTag {
                    tag,
                    start_tag_end: Some(i + 1),
                    end: i + 1,
                    self_closing: false,
                    attributes,
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'>') => {
                return OpenTag {
                    tag,
                    start_tag_end: Some(i + 2),
                    end: i + 2,
                    self_closing: true,
                    attributes,
                }
            }
            // A new tag starts before this one was closed.
            b'<' => break,
            c if c.is_ascii_whitespace() || c == b'/' => i += 1,
            _ => {
                let (attribute, next) = read_attribute(text, i);
                attributes.push(attribute);
                i = next.max(i + 1);
            }
        }
    }

    OpenTag {
        tag,
        start_tag_end: None,
        end: i,
        self_closing: false,
        attributes,
    }
}

fn read_attribute(text: &str, from: usize) -> (RawAttribute, usize) {
    let bytes = text.as_bytes();
    let mut i = from;
    if bytes[i] == b'{' {
        // Shorthand `{name}` or spread `{...props}`.
        let end = matching_brace(bytes, i).map_or(bytes.len(), |p| p + 1);
        let name = text[i..end].to_string();
        return (RawAttribute { name, value: None }, end);
    }

    while i < bytes.len()
        && !bytes[i].is_ascii_whitespace()
        && !matches!(bytes[i], b'=' | b'>' | b'<')
        && !(bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'>'))
    {
        i += 1;
    }
    let name = text[from..i].to_string();

    let mut j = i;
    while j < bytes.len() && bytes[j].is_ascii_whitespace() {
        j += 1;
    }
    if bytes.get(j) != Some(&b'=') {
        return (RawAttribute { name, value: None }, i);
    }
    j += 1;
    while j < bytes.len() && bytes[j].is_ascii_whitespace() {
        j += 1;
    }

    let value_start = j;
    match bytes.get(j) {
        Some(&quote @ (b'"' | b'\'')) => {
            let end = find_byte(bytes, j + 1, quote).map_or(bytes.len(), |p| p + 1);
            let value = Some(text[value_start..end].to_string());
            (RawAttribute { name, value }, end)
        }
        Some(b'{') => {
            let end = matching_brace(bytes, j).map_or(bytes.len(), |p| p + 1);
            let value = Some(text[value_start..end].to_string());
            (RawAttribute { name, value }, end)
        }
        _ => {
            while j < bytes.len() && !bytes[j].is_ascii_whitespace() && bytes[j] != b'>' {
                j += 1;
            }
            let value = Some(text[value_start..j].to_string());
            (RawAttribute { name, value }, j)
        }
    }
}

/// Offset of the `}` balancing the `{` at `open`.
pub(crate) fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' | b'`' => quote = Some(b),
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(text: &str) -> Vec<String> {
        parse_roots(text).into_iter().map(|n| n.tag).collect()
    }

    #[test]
    fn only_root_elements_are_returned() {
        let text = "<div><style>a{}</style><p>x</p></div><style>b{}</style>";
        assert_eq!(tags(text), vec!["div", "style"]);
        let roots = parse_roots(text);
        assert_eq!(roots[0].end, 37);
        assert_eq!(roots[1].start, 37);
    }

    #[test]
    fn comments_are_skipped() {
        let text = "<!--<style>a{color:red}</style>--><style>b{}</style>";
        let roots = parse_roots(text);
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].start, 34);
    }

    #[test]
    fn raw_text_content_is_not_scanned() {
        let text = "<script>if (a < b) { x = '</div>' }</script><p></p>";
        let roots = parse_roots(text);
        assert_eq!(tags(text), vec!["script", "p"]);
        assert_eq!(roots[0].start_tag_end, Some(8));
        assert_eq!(roots[0].end_tag_start, Some(35));
    }

    #[test]
    fn attributes_keep_their_quotes() {
        let roots = parse_roots(r#"<script context="module" lang='ts' defer></script>"#);
        let attrs = &roots[0].attributes;
        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs[0].value.as_deref(), Some("\"module\""));
        assert_eq!(attrs[1].value.as_deref(), Some("'ts'"));
        assert_eq!(attrs[2].name, "defer");
        assert_eq!(attrs[2].value, None);
    }

    #[test]
    fn unclosed_raw_element_runs_to_end() {
        let text = "<style>a{}";
        let roots = parse_roots(text);
        assert_eq!(roots[0].end_tag_start, None);
        assert_eq!(roots[0].end, text.len());
    }

    #[test]
    fn void_and_self_closing_elements() {
        assert_eq!(tags("<br><img src=x /><Comp/><p></p>"), vec!["br", "img", "comp", "p"]);
    }
}
