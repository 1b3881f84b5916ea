//! A small stylesheet analyzer.
//!
//! The parser is error tolerant: it always produces a tree and records what it
//! had to recover from. Spans are byte offsets into the stylesheet text.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::Color;

/// Known properties with a short description.
pub const PROPERTIES: &[(&str, &str)] = &[
    ("align-items", "Aligns flex or grid items on the cross axis."),
    ("animation", "Shorthand for all animation properties."),
    ("background", "Shorthand for setting background properties."),
    ("background-color", "Sets the background color of an element."),
    ("background-image", "Sets one or more background images."),
    ("border", "Shorthand for border width, style and color."),
    ("border-color", "Sets the color of an element's border."),
    ("border-radius", "Rounds the corners of an element's outer border edge."),
    ("bottom", "Vertical offset from the bottom of the containing block."),
    ("box-shadow", "Adds shadow effects around an element's frame."),
    ("box-sizing", "Sets how the total width and height of an element are calculated."),
    ("color", "Sets the color of an element's text."),
    ("content", "Replaces an element with a generated value."),
    ("cursor", "Sets the mouse cursor shown over an element."),
    ("display", "Sets the display type of an element."),
    ("fill", "Paints the interior of an SVG shape."),
    ("flex", "Shorthand for flex-grow, flex-shrink and flex-basis."),
    ("flex-direction", "Sets the direction of the main axis of a flex container."),
    ("flex-wrap", "Sets whether flex items wrap onto multiple lines."),
    ("font", "Shorthand for font properties."),
    ("font-display", "Sets how a font face is displayed while it loads."),
    ("font-family", "Sets a prioritized list of font family names."),
    ("font-size", "Sets the size of the font."),
    ("font-style", "Sets whether a font is normal, italic or oblique."),
    ("font-weight", "Sets the weight of the font."),
    ("gap", "Sets the gaps between rows and columns."),
    ("grid-template-columns", "Defines the columns of a grid."),
    ("grid-template-rows", "Defines the rows of a grid."),
    ("height", "Sets the height of an element."),
    ("justify-content", "Distributes space between and around items on the main axis."),
    ("left", "Horizontal offset from the left of the containing block."),
    ("letter-spacing", "Sets the spacing between text characters."),
    ("line-height", "Sets the height of a line box."),
    ("list-style", "Shorthand for list style properties."),
    ("margin", "Sets the margin area on all four sides."),
    ("margin-bottom", "Sets the bottom margin."),
    ("margin-left", "Sets the left margin."),
    ("margin-right", "Sets the right margin."),
    ("margin-top", "Sets the top margin."),
    ("max-height", "Sets the maximum height of an element."),
    ("max-width", "Sets the maximum width of an element."),
    ("min-height", "Sets the minimum height of an element."),
    ("min-width", "Sets the minimum width of an element."),
    ("opacity", "Sets the opacity of an element."),
    ("outline", "Shorthand for outline width, style and color."),
    ("outline-color", "Sets the color of an element's outline."),
    ("overflow", "Sets what to do when content overflows the box."),
    ("padding", "Sets the padding area on all four sides."),
    ("padding-bottom", "Sets the bottom padding."),
    ("padding-left", "Sets the left padding."),
    ("padding-right", "Sets the right padding."),
    ("padding-top", "Sets the top padding."),
    ("pointer-events", "Sets whether an element can be the target of pointer events."),
    ("position", "Sets how an element is positioned."),
    ("right", "Horizontal offset from the right of the containing block."),
    ("src", "Specifies the resource of a font face."),
    ("stroke", "Paints the outline of an SVG shape."),
    ("text-align", "Sets the horizontal alignment of inline content."),
    ("text-decoration", "Shorthand for text decoration lines, color and style."),
    ("text-transform", "Sets the capitalization of text."),
    ("top", "Vertical offset from the top of the containing block."),
    ("transform", "Rotates, scales, skews or translates an element."),
    ("transition", "Shorthand for transition properties."),
    ("unicode-range", "Sets the range of characters a font face covers."),
    ("user-select", "Controls whether the user can select text."),
    ("vertical-align", "Sets vertical alignment of inline or table-cell boxes."),
    ("visibility", "Shows or hides an element without changing the layout."),
    ("white-space", "Sets how white space inside an element is handled."),
    ("width", "Sets the width of an element."),
    ("z-index", "Sets the stacking order of a positioned element."),
];

const COLOR_PROPERTIES: &[&str] = &[
    "color",
    "background",
    "background-color",
    "border",
    "border-color",
    "box-shadow",
    "fill",
    "outline",
    "outline-color",
    "stroke",
];

const NAMED_COLORS: &[&str] = &[
    "black", "blue", "currentColor", "gray", "green", "orange", "purple", "red", "transparent",
    "white", "yellow",
];

const GLOBAL_VALUES: &[&str] = &["inherit", "initial", "revert", "unset"];

/// Keyword values offered for common properties.
pub fn keyword_values(property: &str) -> &'static [&'static str] {
    match property {
        "display" => &["block", "contents", "flex", "grid", "inline", "inline-block", "none"],
        "position" => &["absolute", "fixed", "relative", "static", "sticky"],
        "overflow" => &["auto", "clip", "hidden", "scroll", "visible"],
        "text-align" => &["center", "end", "justify", "left", "right", "start"],
        "flex-direction" => &["column", "column-reverse", "row", "row-reverse"],
        "flex-wrap" => &["nowrap", "wrap", "wrap-reverse"],
        "align-items" | "justify-content" => {
            &["center", "end", "flex-end", "flex-start", "space-between", "start", "stretch"]
        }
        "box-sizing" => &["border-box", "content-box"],
        "cursor" => &["default", "grab", "not-allowed", "pointer", "text"],
        "font-style" => &["italic", "normal", "oblique"],
        "font-weight" => &["bold", "bolder", "lighter", "normal"],
        "visibility" => &["collapse", "hidden", "visible"],
        "white-space" => &["normal", "nowrap", "pre", "pre-line", "pre-wrap"],
        "pointer-events" => &["auto", "none"],
        "user-select" => &["all", "auto", "none", "text"],
        "text-transform" => &["capitalize", "lowercase", "none", "uppercase"],
        _ => &[],
    }
}

pub fn is_color_property(property: &str) -> bool {
    COLOR_PROPERTIES.contains(&property)
}

pub fn named_colors() -> &'static [&'static str] {
    NAMED_COLORS
}

pub fn global_values() -> &'static [&'static str] {
    GLOBAL_VALUES
}

pub fn property_description(property: &str) -> Option<&'static str> {
    PROPERTIES
        .iter()
        .find(|(name, _)| *name == property)
        .map(|(_, description)| *description)
}

/// Whether a property name is accepted without a warning.
pub fn is_known_property(property: &str) -> bool {
    // Custom properties and vendor prefixes are always accepted.
    property.starts_with('-') || property_description(&property.to_ascii_lowercase()).is_some()
}

/// `prop: value` inside a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub property: String,
    pub property_span: Range<usize>,
    pub value: String,
    pub value_span: Range<usize>,
    /// From the property start to the end of the value.
    pub span: Range<usize>,
}

/// A rule set or an at-rule with a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// The prelude: a selector list, or `@media ...` for at-rules.
    pub selector: String,
    pub selector_span: Range<usize>,
    /// Between the braces.
    pub body: Range<usize>,
    /// From the prelude to after the closing brace.
    pub span: Range<usize>,
    pub declarations: Vec<Declaration>,
    /// Nested rules.
    pub children: Vec<Rule>,
}

impl Rule {
    pub fn is_at_rule(&self) -> bool {
        self.selector.starts_with('@')
    }

    /// Whether the block holds neither declarations nor nested rules.
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty() && self.children.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub span: Range<usize>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stylesheet {
    pub rules: Vec<Rule>,
    pub comments: Vec<Range<usize>>,
    pub errors: Vec<SyntaxError>,
}

impl Stylesheet {
    /// Every rule, outer rules before the rules nested in them.
    pub fn all_rules(&self) -> Vec<&Rule> {
        fn walk<'a>(rules: &'a [Rule], out: &mut Vec<&'a Rule>) {
            for rule in rules {
                out.push(rule);
                walk(&rule.children, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.rules, &mut out);
        out
    }

    /// Rules whose span contains `offset`, outermost first.
    pub fn rules_at(&self, offset: usize) -> Vec<&Rule> {
        let mut chain = Vec::new();
        let mut rules = &self.rules;
        while let Some(rule) = rules
            .iter()
            .find(|r| r.span.start <= offset && offset <= r.span.end)
        {
            chain.push(rule);
            rules = &rule.children;
        }
        chain
    }
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    comments: Vec<Range<usize>>,
    errors: Vec<SyntaxError>,
}

/// Parse a stylesheet.
pub fn parse(text: &str) -> Stylesheet {
    let mut parser = Parser {
        text,
        bytes: text.as_bytes(),
        pos: 0,
        comments: Vec::new(),
        errors: Vec::new(),
    };
    let rules = parser.parse_top_level();
    Stylesheet {
        rules,
        comments: parser.comments,
        errors: parser.errors,
    }
}

impl Parser<'_> {
    fn error(&mut self, span: Range<usize>, message: &str) {
        self.errors.push(SyntaxError {
            span,
            message: message.to_string(),
        });
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Skip a comment starting at `at`, returning the offset after it.
    fn skip_comment(&mut self, at: usize) -> usize {
        let end = self.text[at + 2..]
            .find("*/")
            .map_or(self.bytes.len(), |p| at + 2 + p + 2);
        self.comments.push(at..end);
        end
    }

    fn skip_trivia(&mut self) {
        while let Some(byte) = self.peek() {
            if byte.is_ascii_whitespace() {
                self.pos += 1;
            } else if self.bytes[self.pos..].starts_with(b"/*") {
                self.pos = self.skip_comment(self.pos);
            } else {
                break;
            }
        }
    }

    /// Offset of the first of `stops` at paren depth zero, outside strings and
    /// comments, or the end of the text.
    fn scan_until(&mut self, stops: &[u8]) -> usize {
        let mut i = self.pos;
        let mut depth = 0usize;
        while i < self.bytes.len() {
            let byte = self.bytes[i];
            match byte {
                b'"' | b'\'' => {
                    i += 1;
                    while i < self.bytes.len() && self.bytes[i] != byte && self.bytes[i] != b'\n' {
                        i += if self.bytes[i] == b'\\' { 2 } else { 1 };
                    }
                    i += 1;
                    continue;
                }
                b'/' if self.bytes.get(i + 1) == Some(&b'*') => {
                    i = self.skip_comment(i);
                    continue;
                }
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                _ if depth == 0 && stops.contains(&byte) => return i,
                _ => {}
            }
            i += 1;
        }
        self.bytes.len()
    }

    fn trimmed(&self, range: Range<usize>) -> Range<usize> {
        let slice = &self.text[range.clone()];
        let start = range.start + (slice.len() - slice.trim_start().len());
        let end = range.end - (slice.len() - slice.trim_end().len());
        start..end.max(start)
    }

    fn parse_top_level(&mut self) -> Vec<Rule> {
        let mut rules = Vec::new();
        loop {
            self.skip_trivia();
            let Some(byte) = self.peek() else { break };
            if byte == b'}' {
                self.error(self.pos..self.pos + 1, "unexpected '}'");
                self.pos += 1;
                continue;
            }
            let start = self.pos;
            let stop = self.scan_until(b";{}");
            match self.bytes.get(stop) {
                Some(b'{') => rules.push(self.parse_rule(start, stop)),
                Some(b';') => self.pos = stop + 1,
                _ => {
                    let span = self.trimmed(start..stop);
                    self.error(span, "'{' expected");
                    self.pos = stop;
                }
            }
        }
        rules
    }

    /// Parse a rule whose prelude spans `start..open` and whose `{` is at `open`.
    fn parse_rule(&mut self, start: usize, open: usize) -> Rule {
        let selector_span = self.trimmed(start..open);
        self.pos = open + 1;
        let body_start = self.pos;
        let (declarations, children) = self.parse_block();

        let (body_end, end) = if self.peek() == Some(b'}') {
            (self.pos, self.pos + 1)
        } else {
            let len = self.bytes.len();
            self.error(len..len, "'}' expected");
            (len, len)
        };
        self.pos = end;

        Rule {
            selector: self.text[selector_span.clone()].to_string(),
            selector_span: selector_span.clone(),
            body: body_start..body_end,
            span: selector_span.start..end,
            declarations,
            children,
        }
    }

    /// Parse block items up to, not including, the closing `}`.
    fn parse_block(&mut self) -> (Vec<Declaration>, Vec<Rule>) {
        let mut declarations = Vec::new();
        let mut children = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None | Some(b'}') => break,
                Some(b';') => {
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }
            let start = self.pos;
            let stop = self.scan_until(b";{}");
            if self.bytes.get(stop) == Some(&b'{') {
                children.push(self.parse_rule(start, stop));
                continue;
            }
            if let Some(declaration) = self.declaration(start..stop) {
                declarations.push(declaration);
            }
            self.pos = stop;
        }
        (declarations, children)
    }

    fn declaration(&mut self, range: Range<usize>) -> Option<Declaration> {
        let span = self.trimmed(range);
        if span.is_empty() {
            return None;
        }
        let Some(colon) = self.text[span.clone()].find(':').map(|p| span.start + p) else {
            self.error(span, "colon expected");
            return None;
        };
        let property_span = self.trimmed(span.start..colon);
        let value_span = self.trimmed(colon + 1..span.end);
        Some(Declaration {
            property: self.text[property_span.clone()].to_string(),
            property_span,
            value: self.text[value_span.clone()].to_string(),
            value_span,
            span,
        })
    }
}

/// `(ids, classes, elements)` specificity of a single complex selector.
pub fn specificity(selector: &str) -> (u32, u32, u32) {
    let chars: Vec<char> = selector.chars().collect();
    let mut counts = (0, 0, 0);
    let mut i = 0;

    let ident_end = |from: usize| {
        let mut end = from;
        while end < chars.len() && (chars[end].is_alphanumeric() || matches!(chars[end], '-' | '_')) {
            end += 1;
        }
        end
    };
    let parens = |from: usize| -> Option<(String, usize)> {
        if chars.get(from) != Some(&'(') {
            return None;
        }
        let mut depth = 0;
        for (j, c) in chars.iter().enumerate().skip(from) {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((chars[from + 1..j].iter().collect(), j + 1));
                    }
                }
                _ => {}
            }
        }
        Some((chars[from + 1..].iter().collect(), chars.len()))
    };

    while i < chars.len() {
        match chars[i] {
            '#' => {
                counts.0 += 1;
                i = ident_end(i + 1);
            }
            '.' => {
                counts.1 += 1;
                i = ident_end(i + 1);
            }
            '[' => {
                counts.1 += 1;
                i = chars[i..]
                    .iter()
                    .position(|&c| c == ']')
                    .map_or(chars.len(), |p| i + p + 1);
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                counts.2 += 1;
                i = ident_end(i + 2);
                if let Some((_, after)) = parens(i) {
                    i = after;
                }
            }
            ':' => {
                let name_end = ident_end(i + 1);
                let name: String = chars[i + 1..name_end].iter().collect();
                let argument = parens(name_end);
                match (name.as_str(), &argument) {
                    ("where", _) => {}
                    ("not" | "is" | "has" | "global", Some((inner, _))) => {
                        let most = inner
                            .split(',')
                            .map(specificity)
                            .max()
                            .unwrap_or_default();
                        counts.0 += most.0;
                        counts.1 += most.1;
                        counts.2 += most.2;
                    }
                    _ => counts.1 += 1,
                }
                i = argument.map_or(name_end, |(_, after)| after);
            }
            c if c.is_alphabetic() => {
                counts.2 += 1;
                i = ident_end(i);
            }
            _ => i += 1,
        }
    }
    counts
}

static HEX_OR_RGB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)#([0-9a-f]{8}|[0-9a-f]{6}|[0-9a-f]{3,4})\b|rgba?\(\s*([\d.]+)\s*[,\s]\s*([\d.]+)\s*[,\s]\s*([\d.]+)\s*(?:[,/]\s*([\d.]+%?)\s*)?\)",
    )
    .unwrap()
});

fn parse_hex(hex: &str) -> Option<Color> {
    let expanded: String = if hex.len() <= 4 {
        hex.chars().flat_map(|c| [c, c]).collect()
    } else {
        hex.to_string()
    };
    let channel = |i: usize| {
        expanded
            .get(i..i + 2)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .map(|v| f32::from(v) / 255.0)
    };
    Some(Color {
        red: channel(0)?,
        green: channel(2)?,
        blue: channel(4)?,
        alpha: if expanded.len() == 8 { channel(6)? } else { 1.0 },
    })
}

fn parse_alpha(alpha: &str) -> Option<f32> {
    match alpha.strip_suffix('%') {
        Some(percent) => percent.parse::<f32>().ok().map(|p| p / 100.0),
        None => alpha.parse::<f32>().ok(),
    }
}

/// Hex and `rgb()`/`rgba()` colors in `value`, as `(span in value, color)`.
pub fn find_colors(value: &str) -> Vec<(Range<usize>, Color)> {
    HEX_OR_RGB
        .captures_iter(value)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let color = if let Some(hex) = caps.get(1) {
                parse_hex(hex.as_str())?
            } else {
                let channel = |i: usize| -> Option<f32> {
                    let v: f32 = caps.get(i)?.as_str().parse().ok()?;
                    Some((v / 255.0).clamp(0.0, 1.0))
                };
                Color {
                    red: channel(2)?,
                    green: channel(3)?,
                    blue: channel(4)?,
                    alpha: match caps.get(5) {
                        Some(alpha) => parse_alpha(alpha.as_str())?.clamp(0.0, 1.0),
                        None => 1.0,
                    },
                }
            };
            Some((whole.range(), color))
        })
        .collect()
}

fn to_byte(channel: f32) -> u8 {
    (channel.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn to_hsl(color: &Color) -> (f32, f32, f32) {
    let (r, g, b) = (color.red, color.green, color.blue);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let lightness = (max + min) / 2.0;
    let delta = max - min;
    if delta == 0.0 {
        return (0.0, 0.0, lightness);
    }
    let saturation = delta / (1.0 - (2.0 * lightness - 1.0).abs());
    let hue = if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    (hue, saturation, lightness)
}

fn format_alpha(alpha: f32) -> String {
    let rounded = (alpha * 100.0).round() / 100.0;
    format!("{rounded}")
}

/// The notations a color can be written in: rgb, hex, hsl.
pub fn color_labels(color: &Color) -> Vec<String> {
    let (r, g, b) = (to_byte(color.red), to_byte(color.green), to_byte(color.blue));
    let opaque = color.alpha >= 1.0;
    let (h, s, l) = to_hsl(color);
    let (h, s, l) = (h.round(), (s * 100.0).round(), (l * 100.0).round());

    if opaque {
        vec![
            format!("rgb({r}, {g}, {b})"),
            format!("#{r:02x}{g:02x}{b:02x}"),
            format!("hsl({h}, {s}%, {l}%)"),
        ]
    } else {
        let alpha = format_alpha(color.alpha);
        vec![
            format!("rgba({r}, {g}, {b}, {alpha})"),
            format!("#{r:02x}{g:02x}{b:02x}{:02x}", to_byte(color.alpha)),
            format!("hsla({h}, {s}%, {l}%, {alpha})"),
        ]
    }
}
