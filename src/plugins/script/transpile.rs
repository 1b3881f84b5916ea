//! Bundled script transpiler.
//!
//! Turns the body of a component `<script>` block into a standalone program:
//! a header line, the source with `export` dropped from declarations, and a
//! footer that references every prop so unused-variable checks stay quiet.
//! Every source line maps to the generated line below it; the header and the
//! footer are unmapped.

use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::Position;

use crate::error::{Error, Result};
use crate::mapping::MappingsBuilder;

pub const HEADER: &str = "// generated by svelsp";

static EXPORT_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)export\s+(let|const|var|function|class)\b").unwrap()
});

static PROP_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:let|var)\s+([A-Za-z_$][\w$]*)").unwrap());

/// Generated program plus the `mappings` string relating it to the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranspileOutput {
    pub code: String,
    pub mappings: String,
    /// Names declared with `export let` or `export var`.
    pub props: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptTranspiler;

impl ScriptTranspiler {
    pub fn new() -> Self {
        Self
    }

    pub fn transpile(&self, source: &str) -> Result<TranspileOutput> {
        check_terminated(source)?;

        let mut code = String::with_capacity(source.len() + HEADER.len() + 32);
        let mut builder = MappingsBuilder::new();
        let mut props = Vec::new();

        code.push_str(HEADER);
        code.push('\n');

        let mut generated_line = 1u32;
        for (line, text) in source.split('\n').enumerate() {
            let line = line as u32;
            match EXPORT_DECLARATION.captures(text) {
                Some(caps) => {
                    let indent = caps.get(1).map_or("", |m| m.as_str());
                    let keyword_start = caps.get(2).map_or(indent.len(), |m| m.start());
                    let dropped = keyword_start - indent.len();
                    let rest = &text[keyword_start..];

                    if let Some(name) = PROP_NAME.captures(rest).and_then(|c| c.get(1)) {
                        props.push(name.as_str().to_string());
                    }

                    // Indent and `export ` are ASCII, so byte lengths are UTF-16 columns.
                    if !indent.is_empty() {
                        builder.add(Position::new(generated_line, 0), Some(Position::new(line, 0)));
                    }
                    builder.add(
                        Position::new(generated_line, indent.len() as u32),
                        Some(Position::new(line, (indent.len() + dropped) as u32)),
                    );
                    code.push_str(indent);
                    code.push_str(rest);
                }
                None => {
                    builder.add(Position::new(generated_line, 0), Some(Position::new(line, 0)));
                    code.push_str(text);
                }
            }
            code.push('\n');
            generated_line += 1;
        }

        builder.add(Position::new(generated_line, 0), None);
        code.push_str(&format!(";({{ props: {{ {} }} }});\n", props.join(", ")));

        Ok(TranspileOutput {
            code,
            mappings: builder.finish(),
            props,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lexical {
    Code,
    LineComment,
    BlockComment,
    Quoted(char),
    Template,
}

/// Reject sources that end inside a comment, string, or template literal.
fn check_terminated(source: &str) -> Result<()> {
    let mut state = Lexical::Code;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        state = match state {
            Lexical::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    Lexical::LineComment
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    Lexical::BlockComment
                }
                '"' | '\'' => Lexical::Quoted(c),
                '`' => Lexical::Template,
                _ => Lexical::Code,
            },
            Lexical::LineComment if c == '\n' => Lexical::Code,
            Lexical::BlockComment if c == '*' && chars.peek() == Some(&'/') => {
                chars.next();
                Lexical::Code
            }
            Lexical::Quoted(_) | Lexical::Template if c == '\\' => {
                chars.next();
                state
            }
            Lexical::Quoted(quote) if c == quote => Lexical::Code,
            Lexical::Quoted(_) if c == '\n' => {
                return Err(Error::Transpile("unterminated string literal".to_string()));
            }
            Lexical::Template if c == '`' => Lexical::Code,
            other => other,
        };
    }

    match state {
        Lexical::BlockComment => Err(Error::Transpile("unterminated comment".to_string())),
        Lexical::Quoted(_) => Err(Error::Transpile("unterminated string literal".to_string())),
        Lexical::Template => Err(Error::Transpile("unterminated template literal".to_string())),
        Lexical::Code | Lexical::LineComment => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::decode_mappings;

    #[test]
    fn exports_are_stripped_and_props_referenced() {
        let out = ScriptTranspiler::new()
            .transpile("\n  export let count = 0;\n  export function reset() {}\n")
            .unwrap();
        assert_eq!(
            out.code,
            "// generated by svelsp\n\n  let count = 0;\n  function reset() {}\n\n;({ props: { count } });\n"
        );
        assert_eq!(out.props, vec!["count".to_string()]);
    }

    #[test]
    fn stripped_lines_map_past_the_keyword() {
        let out = ScriptTranspiler::new()
            .transpile("export let a = 1;\nlet b = a;")
            .unwrap();
        let lines = decode_mappings(&out.mappings).unwrap();
        assert!(lines[0].is_empty());
        assert_eq!(lines[1][0].generated_column, 0);
        assert_eq!(lines[1][0].source, Some((0, 7)));
        assert_eq!(lines[2][0].source, Some((1, 0)));
        // Footer.
        assert_eq!(lines[3][0].source, None);
    }

    #[test]
    fn indented_exports_keep_the_indent_mapped() {
        let out = ScriptTranspiler::new().transpile("\texport const x = 1;").unwrap();
        let lines = decode_mappings(&out.mappings).unwrap();
        assert_eq!(lines[1][0].source, Some((0, 0)));
        assert_eq!(lines[1][1].generated_column, 1);
        assert_eq!(lines[1][1].source, Some((0, 8)));
        assert!(out.props.is_empty());
    }

    #[test]
    fn unterminated_input_is_rejected() {
        let transpiler = ScriptTranspiler::new();
        for source in ["let a = 1; /* open", "const s = `abc", "let s = 'abc\nlet t;"] {
            assert!(
                matches!(transpiler.transpile(source), Err(Error::Transpile(_))),
                "{source:?}"
            );
        }
        assert!(transpiler.transpile("let s = `a\\`b`; // done").is_ok());
    }
}
