use std::path::PathBuf;
use std::sync::Arc;

use expect_test::expect;
use svelsp::host::{Capability, Provider, Section};
use svelsp::{create_host, discover_settings, Document, LsConfig, PluginHost};
use tower_lsp::lsp_types::{
    Diagnostic, DiagnosticSeverity, Hover, HoverContents, MarkedString, NumberOrString, Position,
    SymbolInformation, SymbolKind, Url,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Format diagnostics into a deterministic, human-readable string.
///
/// Each diagnostic becomes one line:
///   <start_line>:<start_col>-<end_line>:<end_col> <severity> [<code>]: <message>
fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    if diagnostics.is_empty() {
        return "OK (no diagnostics)".to_string();
    }

    let mut lines: Vec<String> = diagnostics
        .iter()
        .map(|d| {
            let range = &d.range;
            let severity = match d.severity {
                Some(DiagnosticSeverity::ERROR) => "error",
                Some(DiagnosticSeverity::WARNING) => "warning",
                Some(DiagnosticSeverity::INFORMATION) => "info",
                Some(DiagnosticSeverity::HINT) => "hint",
                _ => "unknown",
            };
            let code = match &d.code {
                Some(NumberOrString::String(s)) => format!(" [{}]", s),
                Some(NumberOrString::Number(n)) => format!(" [{}]", n),
                None => String::new(),
            };
            format!(
                "{}:{}-{}:{} {}{}: {}",
                range.start.line,
                range.start.character,
                range.end.line,
                range.end.character,
                severity,
                code,
                d.message,
            )
        })
        .collect();

    lines.sort();
    lines.join("\n")
}

/// One line per symbol, in the order providers returned them.
fn format_symbols(symbols: &[SymbolInformation]) -> String {
    symbols
        .iter()
        .map(|s| {
            let kind = match s.kind {
                SymbolKind::CLASS => "class",
                SymbolKind::MODULE => "module",
                SymbolKind::VARIABLE => "variable",
                SymbolKind::CONSTANT => "constant",
                SymbolKind::FUNCTION => "function",
                _ => "other",
            };
            let range = s.location.range;
            format!(
                "{} {} {}:{}-{}:{}",
                s.name,
                kind,
                range.start.line,
                range.start.character,
                range.end.line,
                range.end.character,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn app_uri() -> Url {
    Url::parse("file:///workspace/App.svelte").unwrap()
}

fn open(host: &PluginHost, text: &str) -> Arc<Document> {
    host.documents()
        .open_client_document(app_uri(), text.to_string(), 1, "svelte")
}

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(path)
}

const COMPONENT: &str = "<script>
  export let name = 'world';
  function greet() { return name; }
</script>
<style>
  h1 { colr: red; }
  .empty {}
</style>
{#each items as item}
  <h1>{item}</h1>
";

// ---------------------------------------------------------------------------
// Tests: projection through fragments
// ---------------------------------------------------------------------------

#[tokio::test]
async fn style_hover_lands_inside_the_style_block() {
    let host = create_host(LsConfig::default());
    let doc = open(&host, "<h1>Hi</h1>\n<style>h1{color:blue}</style>");

    // Offset 23 is inside `color`.
    let hover = host
        .hover(&app_uri(), doc.position_at(23))
        .await
        .unwrap()
        .unwrap();
    let range = hover.range.unwrap();
    assert_eq!(doc.offset_at(range.start), 22);
    assert_eq!(doc.offset_at(range.end), 27);
    assert!((19..=33).contains(&doc.offset_at(range.start)));
}

#[tokio::test]
async fn diagnostics_from_every_provider_use_component_coordinates() {
    let host = create_host(LsConfig::default());
    open(&host, COMPONENT);

    let diagnostics = host.diagnostics(&app_uri()).await.unwrap();
    let expected = expect![[r#"
        5:7-5:11 warning [unknown-property]: Unknown property: 'colr'
        6:2-6:11 warning [empty-rule]: Do not use empty rulesets
        8:0-8:6 error [unclosed-block]: {#each} block is never closed"#]];
    expected.assert_eq(&format_diagnostics(&diagnostics));
}

#[tokio::test]
async fn symbols_from_style_and_generated_script() {
    let host = create_host(LsConfig::default());
    open(&host, COMPONENT);

    let symbols = host.document_symbols(&app_uri()).await.unwrap();
    let expected = expect![[r#"
        h1 class 5:2-5:19
        .empty class 6:2-6:11
        name variable 1:13-1:17
        greet function 2:11-2:16"#]];
    expected.assert_eq(&format_symbols(&symbols));
}

#[tokio::test]
async fn definition_in_script_points_at_the_exported_prop() {
    let host = create_host(LsConfig::default());
    open(&host, COMPONENT);

    // `name` inside `return name;`
    let links = host
        .definitions(&app_uri(), Position::new(2, 30))
        .await
        .unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].target_uri, app_uri());
    assert_eq!(links[0].target_selection_range.start, Position::new(1, 13));
    assert_eq!(links[0].target_selection_range.end, Position::new(1, 17));
}

#[tokio::test]
async fn requests_for_unknown_documents_are_errors() {
    let host = create_host(LsConfig::default());
    let error = host.hover(&app_uri(), Position::new(0, 0)).await.unwrap_err();
    assert!(matches!(error, svelsp::Error::UnknownDocument(_)));
}

// ---------------------------------------------------------------------------
// Tests: dispatch
// ---------------------------------------------------------------------------

struct Fixed {
    name: &'static str,
    section: Section,
    hover: Option<&'static str>,
    fail: bool,
}

#[tower_lsp::async_trait]
impl Provider for Fixed {
    fn name(&self) -> &'static str {
        self.name
    }

    fn section(&self) -> Section {
        self.section
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Hover, Capability::Diagnostics]
    }

    async fn hover(&self, _document: &Document, _position: Position) -> svelsp::error::Result<Option<Hover>> {
        if self.fail {
            return Err(svelsp::Error::Provider {
                name: self.name,
                message: "boom".to_string(),
            });
        }
        Ok(self.hover.map(|text| Hover {
            contents: HoverContents::Scalar(MarkedString::String(text.to_string())),
            range: None,
        }))
    }

    async fn diagnostics(&self, _document: &Document) -> svelsp::error::Result<Vec<Diagnostic>> {
        if self.fail {
            panic!("{} panicked", self.name);
        }
        Ok(vec![Diagnostic {
            message: self.name.to_string(),
            ..Default::default()
        }])
    }
}

fn fixed(name: &'static str, section: Section, hover: Option<&'static str>, fail: bool) -> Arc<dyn Provider> {
    Arc::new(Fixed {
        name,
        section,
        hover,
        fail,
    })
}

fn bare_host(config: LsConfig) -> PluginHost {
    PluginHost::new(
        Arc::new(svelsp::DocumentManager::new()),
        Arc::new(svelsp::ConfigManager::new(config)),
    )
}

#[tokio::test]
async fn first_non_null_skips_failures_and_nulls() {
    let host = bare_host(LsConfig::default());
    host.register(fixed("failing", Section::Svelte, Some("never"), true));
    host.register(fixed("empty", Section::Css, None, false));
    host.register(fixed("answer", Section::Typescript, Some("42"), false));
    host.register(fixed("late", Section::Typescript, Some("late"), false));
    open(&host, "<p></p>");

    let hover = host.hover(&app_uri(), Position::new(0, 0)).await.unwrap();
    assert_eq!(
        hover.map(|h| h.contents),
        Some(HoverContents::Scalar(MarkedString::String("42".into())))
    );
}

#[tokio::test]
async fn collect_keeps_registration_order_and_survives_panics() {
    let host = bare_host(LsConfig::default());
    host.register(fixed("first", Section::Svelte, None, false));
    host.register(fixed("panicking", Section::Css, None, true));
    host.register(fixed("third", Section::Typescript, None, false));
    open(&host, "<p></p>");

    let diagnostics = host.diagnostics(&app_uri()).await.unwrap();
    let messages: Vec<_> = diagnostics.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(messages, ["first", "third"]);
}

#[tokio::test]
async fn disabled_sections_are_not_dispatched() {
    let mut config = LsConfig::default();
    config.typescript.hover.enable = false;
    let host = bare_host(config);
    host.register(fixed("script", Section::Typescript, Some("hidden"), false));
    host.register(fixed("css", Section::Css, Some("shown"), false));
    open(&host, "<p></p>");

    let hover = host.hover(&app_uri(), Position::new(0, 0)).await.unwrap();
    assert_eq!(
        hover.map(|h| h.contents),
        Some(HoverContents::Scalar(MarkedString::String("shown".into())))
    );
}

// ---------------------------------------------------------------------------
// Tests: workspace settings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn workspace_settings_shape_results() {
    let source = std::fs::read_to_string(fixture("workspace/src/App.svelte")).unwrap();

    let defaults = create_host(LsConfig::default());
    open(&defaults, &source);
    let diagnostics = defaults.diagnostics(&app_uri()).await.unwrap();
    let expected = expect![[
        r#"9:0-9:7 warning [duplicate-block]: A component can only have one <style> element"#
    ]];
    expected.assert_eq(&format_diagnostics(&diagnostics));
    assert!(defaults
        .hover(&app_uri(), Position::new(7, 6))
        .await
        .unwrap()
        .is_some());

    let (patch, dir) = discover_settings(&fixture("workspace/src"));
    assert_eq!(dir, fixture("workspace"));
    let mut config = LsConfig::default();
    config.apply(&patch);
    let configured = create_host(config);
    open(&configured, &source);

    let diagnostics = configured.diagnostics(&app_uri()).await.unwrap();
    let expected = expect![[r#"OK (no diagnostics)"#]];
    expected.assert_eq(&format_diagnostics(&diagnostics));
    assert!(configured
        .hover(&app_uri(), Position::new(7, 6))
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        configured.config().get("css.hover.enable"),
        Some(serde_json::Value::Bool(false))
    );
}
