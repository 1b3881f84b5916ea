//! Settings infrastructure for svelsp.
//!
//! Configuration is an explicit tree of structs. Updates arrive as a
//! [`ConfigPatch`] whose leaves are optional and are overlaid field by field,
//! so partial pushes from the editor never reset unrelated settings.
//!
//! Sources, in the order they are applied:
//! 1. built-in defaults (everything enabled)
//! 2. a `svelsp.toml` found by [`discover_settings`]
//! 3. `initializationOptions`
//! 4. every `workspace/didChangeConfiguration` push

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::host::{Capability, Section};

/// Name of the settings file looked up in the workspace.
pub const SETTINGS_FILE: &str = "svelsp.toml";

/// A single `{ enable }` leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toggle {
    pub enable: bool,
}

impl Default for Toggle {
    fn default() -> Self {
        Self { enable: true }
    }
}

/// Per-capability toggles of one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SectionConfig {
    /// Master switch for the whole section.
    pub enable: bool,
    pub diagnostics: Toggle,
    pub hover: Toggle,
    pub completions: Toggle,
    pub format: Toggle,
    pub tag_complete: Toggle,
    pub document_colors: Toggle,
    pub color_presentations: Toggle,
    pub document_symbols: Toggle,
    pub definitions: Toggle,
    pub code_actions: Toggle,
    pub folding_ranges: Toggle,
    pub selection_range: Toggle,
}

impl Default for SectionConfig {
    fn default() -> Self {
        Self {
            enable: true,
            diagnostics: Toggle::default(),
            hover: Toggle::default(),
            completions: Toggle::default(),
            format: Toggle::default(),
            tag_complete: Toggle::default(),
            document_colors: Toggle::default(),
            color_presentations: Toggle::default(),
            document_symbols: Toggle::default(),
            definitions: Toggle::default(),
            code_actions: Toggle::default(),
            folding_ranges: Toggle::default(),
            selection_range: Toggle::default(),
        }
    }
}

impl SectionConfig {
    /// The toggle for `capability`, or `None` for capabilities without one.
    pub fn toggle(&self, capability: Capability) -> Option<Toggle> {
        Some(match capability {
            Capability::Diagnostics => self.diagnostics,
            Capability::Hover => self.hover,
            Capability::Completions => self.completions,
            Capability::Formatting => self.format,
            Capability::TagComplete => self.tag_complete,
            Capability::DocumentColors => self.document_colors,
            Capability::ColorPresentations => self.color_presentations,
            Capability::DocumentSymbols => self.document_symbols,
            Capability::Definitions => self.definitions,
            Capability::CodeActions => self.code_actions,
            Capability::FoldingRanges => self.folding_ranges,
            Capability::SelectionRanges => self.selection_range,
            Capability::WatchedFiles => return None,
        })
    }

    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.enable && self.toggle(capability).map_or(true, |t| t.enable)
    }

    pub fn apply(&mut self, patch: &SectionPatch) {
        overlay(&mut self.enable, patch.enable);
        patch_toggle(&mut self.diagnostics, &patch.diagnostics);
        patch_toggle(&mut self.hover, &patch.hover);
        patch_toggle(&mut self.completions, &patch.completions);
        patch_toggle(&mut self.format, &patch.format);
        patch_toggle(&mut self.tag_complete, &patch.tag_complete);
        patch_toggle(&mut self.document_colors, &patch.document_colors);
        patch_toggle(&mut self.color_presentations, &patch.color_presentations);
        patch_toggle(&mut self.document_symbols, &patch.document_symbols);
        patch_toggle(&mut self.definitions, &patch.definitions);
        patch_toggle(&mut self.code_actions, &patch.code_actions);
        patch_toggle(&mut self.folding_ranges, &patch.folding_ranges);
        patch_toggle(&mut self.selection_range, &patch.selection_range);
    }
}

/// Override for a compiler warning code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    /// Drop the warning.
    Ignore,
    /// Report the warning as an error.
    Error,
}

/// Markup section: the usual toggles plus compiler warning overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SvelteConfig {
    #[serde(flatten)]
    pub features: SectionConfig,
    pub compiler_warnings: HashMap<String, WarningLevel>,
}

/// The complete server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LsConfig {
    pub svelte: SvelteConfig,
    pub css: SectionConfig,
    pub typescript: SectionConfig,
}

impl LsConfig {
    pub fn section(&self, section: Section) -> &SectionConfig {
        match section {
            Section::Svelte => &self.svelte.features,
            Section::Css => &self.css,
            Section::Typescript => &self.typescript,
        }
    }

    pub fn is_enabled(&self, section: Section, capability: Capability) -> bool {
        self.section(section).is_enabled(capability)
    }

    /// Overlay `patch`, keeping every value it does not mention.
    pub fn apply(&mut self, patch: &ConfigPatch) {
        if let Some(svelte) = &patch.svelte {
            self.svelte.features.apply(&svelte.features);
            // A dynamic-keyed map is replaced wholesale so it can be cleared.
            if let Some(warnings) = &svelte.compiler_warnings {
                self.svelte.compiler_warnings = warnings.clone();
            }
        }
        if let Some(css) = &patch.css {
            self.css.apply(css);
        }
        if let Some(typescript) = &patch.typescript {
            self.typescript.apply(typescript);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TogglePatch {
    pub enable: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SectionPatch {
    pub enable: Option<bool>,
    pub diagnostics: Option<TogglePatch>,
    pub hover: Option<TogglePatch>,
    pub completions: Option<TogglePatch>,
    pub format: Option<TogglePatch>,
    pub tag_complete: Option<TogglePatch>,
    pub document_colors: Option<TogglePatch>,
    pub color_presentations: Option<TogglePatch>,
    pub document_symbols: Option<TogglePatch>,
    pub definitions: Option<TogglePatch>,
    pub code_actions: Option<TogglePatch>,
    pub folding_ranges: Option<TogglePatch>,
    pub selection_range: Option<TogglePatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SveltePatch {
    #[serde(flatten)]
    pub features: SectionPatch,
    pub compiler_warnings: Option<HashMap<String, WarningLevel>>,
}

/// A partial configuration update. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub svelte: Option<SveltePatch>,
    pub css: Option<SectionPatch>,
    pub typescript: Option<SectionPatch>,
}

impl ConfigPatch {
    /// Parse a settings object pushed by the editor. Editors nest the plugin
    /// settings under `svelte.plugin`; a bare settings object is accepted too.
    pub fn from_client_settings(value: serde_json::Value) -> Result<Self> {
        let value = match value.pointer("/svelte/plugin") {
            Some(plugin) => plugin.clone(),
            None => value,
        };
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value).map_err(|e| Error::Settings(e.to_string()))
    }
}

fn overlay<T: Copy>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn patch_toggle(toggle: &mut Toggle, patch: &Option<TogglePatch>) {
    if let Some(patch) = patch {
        overlay(&mut toggle.enable, patch.enable);
    }
}

/// Shared, mutable view of the current configuration.
#[derive(Debug, Default)]
pub struct ConfigManager {
    config: RwLock<LsConfig>,
}

impl ConfigManager {
    pub fn new(config: LsConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    pub fn update(&self, patch: &ConfigPatch) {
        self.config.write().apply(patch);
        tracing::debug!(?patch, "configuration updated");
    }

    pub fn snapshot(&self) -> LsConfig {
        self.config.read().clone()
    }

    pub fn is_enabled(&self, section: Section, capability: Capability) -> bool {
        self.config.read().is_enabled(section, capability)
    }

    pub fn compiler_warning(&self, code: &str) -> Option<WarningLevel> {
        self.config.read().svelte.compiler_warnings.get(code).copied()
    }

    /// Look up a value by dotted path, e.g. `css.hover.enable`.
    pub fn get(&self, path: &str) -> Option<serde_json::Value> {
        let root = serde_json::to_value(&*self.config.read()).ok()?;
        path.split('.')
            .filter(|key| !key.is_empty())
            .try_fold(root, |value, key| match value {
                serde_json::Value::Object(mut map) => map.remove(key),
                _ => None,
            })
    }
}

/// Load a settings patch from a `svelsp.toml` file.
///
/// Returns an empty patch if the file doesn't exist or can't be parsed.
pub fn load_settings(path: &Path) -> ConfigPatch {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to parse {}: {}", SETTINGS_FILE, e);
                ConfigPatch::default()
            }
        },
        Err(_) => ConfigPatch::default(),
    }
}

/// Discover `svelsp.toml` by searching up the directory tree, then direct children.
///
/// Search order:
/// 1. Walk up from `start_dir` to filesystem root
/// 2. If not found, check immediate child directories of `start_dir`
///
/// Returns `(settings, settings_dir)` where `settings_dir` is the directory
/// containing the found file. If not found, returns an empty patch and
/// `start_dir`.
pub fn discover_settings(start_dir: &Path) -> (ConfigPatch, PathBuf) {
    // Phase 1: Walk up from start_dir
    let mut current = Some(start_dir);
    while let Some(dir) = current {
        let candidate = dir.join(SETTINGS_FILE);
        if candidate.is_file() {
            return (load_settings(&candidate), dir.to_path_buf());
        }
        current = dir.parent();
    }

    // Phase 2: Check immediate child directories
    if let Ok(entries) = std::fs::read_dir(start_dir) {
        for entry in entries.flatten() {
            if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
                let candidate = entry.path().join(SETTINGS_FILE);
                if candidate.is_file() {
                    return (load_settings(&candidate), entry.path());
                }
            }
        }
    }

    (ConfigPatch::default(), start_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(value: serde_json::Value) -> ConfigPatch {
        ConfigPatch::from_client_settings(value).unwrap()
    }

    #[test]
    fn defaults_enable_everything() {
        let config = LsConfig::default();
        for section in [Section::Svelte, Section::Css, Section::Typescript] {
            assert!(config.is_enabled(section, Capability::Hover));
            assert!(config.is_enabled(section, Capability::SelectionRanges));
        }
        assert!(config.svelte.compiler_warnings.is_empty());
    }

    #[test]
    fn partial_update_touches_one_leaf() {
        let mut config = LsConfig::default();
        config.apply(&patch(json!({ "css": { "hover": { "enable": false } } })));

        let mut expected = LsConfig::default();
        expected.css.hover.enable = false;
        assert_eq!(config, expected);
    }

    #[test]
    fn later_updates_keep_earlier_values() {
        let mut config = LsConfig::default();
        config.apply(&patch(json!({ "css": { "hover": { "enable": false } } })));
        config.apply(&patch(json!({ "css": { "completions": { "enable": false } } })));
        assert!(!config.css.hover.enable);
        assert!(!config.css.completions.enable);
        assert!(config.css.diagnostics.enable);
    }

    #[test]
    fn section_switch_disables_all_capabilities() {
        let mut config = LsConfig::default();
        config.apply(&patch(json!({ "typescript": { "enable": false } })));
        assert!(!config.is_enabled(Section::Typescript, Capability::Hover));
        assert!(!config.is_enabled(Section::Typescript, Capability::WatchedFiles));
        assert!(config.typescript.hover.enable);
    }

    #[test]
    fn compiler_warnings_replace_instead_of_merge() {
        let mut config = LsConfig::default();
        config.apply(&patch(json!({
            "svelte": { "compilerWarnings": { "a": "ignore", "b": "error" } }
        })));
        config.apply(&patch(json!({ "svelte": { "compilerWarnings": { "c": "ignore" } } })));
        assert_eq!(
            config.svelte.compiler_warnings,
            HashMap::from([("c".to_string(), WarningLevel::Ignore)])
        );

        config.apply(&patch(json!({ "svelte": { "compilerWarnings": {} } })));
        assert!(config.svelte.compiler_warnings.is_empty());

        // Absent key leaves the map alone.
        config.apply(&patch(json!({ "svelte": { "compilerWarnings": { "d": "error" } } })));
        config.apply(&patch(json!({ "svelte": { "hover": { "enable": false } } })));
        assert_eq!(config.svelte.compiler_warnings.len(), 1);
        assert!(!config.svelte.features.hover.enable);
    }

    #[test]
    fn client_settings_are_unwrapped() {
        let nested = patch(json!({
            "svelte": { "plugin": { "css": { "enable": false } } }
        }));
        assert_eq!(nested.css.unwrap().enable, Some(false));

        let bare = patch(json!({ "css": { "enable": false } }));
        assert_eq!(bare.css.unwrap().enable, Some(false));

        assert_eq!(patch(serde_json::Value::Null), ConfigPatch::default());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let result = ConfigPatch::from_client_settings(json!({ "css": { "enable": "yes" } }));
        assert!(matches!(result, Err(Error::Settings(_))));
    }

    #[test]
    fn dotted_lookup() {
        let manager = ConfigManager::default();
        manager.update(&patch(json!({ "css": { "hover": { "enable": false } } })));
        assert_eq!(manager.get("css.hover.enable"), Some(json!(false)));
        assert_eq!(manager.get("css.hover"), Some(json!({ "enable": false })));
        assert_eq!(manager.get("svelte.tagComplete.enable"), Some(json!(true)));
        assert_eq!(manager.get("svelte.compilerWarnings"), Some(json!({})));
        assert_eq!(manager.get("css.nope"), None);
        assert_eq!(manager.get("css.hover.enable.deeper"), None);
    }

    /// Create a unique temp directory for test isolation.
    fn make_test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("svelsp-test")
            .join(name)
            .join(format!("{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Clean up a test directory.
    fn cleanup_test_dir(dir: &Path) {
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn discover_settings_in_current_dir() {
        let dir = make_test_dir("discover-current");
        let settings_content = r#"
[css.hover]
enable = false

[svelte.compilerWarnings]
a11y-missing-attribute = "ignore"
"#;
        std::fs::write(dir.join(SETTINGS_FILE), settings_content).unwrap();

        let (settings, settings_dir) = discover_settings(&dir);
        assert_eq!(settings_dir, dir);
        let mut config = LsConfig::default();
        config.apply(&settings);
        assert!(!config.css.hover.enable);
        assert_eq!(
            config.svelte.compiler_warnings.get("a11y-missing-attribute"),
            Some(&WarningLevel::Ignore)
        );

        cleanup_test_dir(&dir);
    }

    #[test]
    fn discover_settings_in_parent_dir() {
        let parent = make_test_dir("discover-parent");
        let child = parent.join("src");
        std::fs::create_dir_all(&child).unwrap();
        std::fs::write(parent.join(SETTINGS_FILE), "[typescript]\nenable = false\n").unwrap();

        let (settings, settings_dir) = discover_settings(&child);
        assert_eq!(settings_dir, parent);
        assert_eq!(settings.typescript.unwrap().enable, Some(false));

        cleanup_test_dir(&parent);
    }

    #[test]
    fn discover_settings_in_child_dir() {
        let parent = make_test_dir("discover-child");
        let child = parent.join("app");
        std::fs::create_dir_all(&child).unwrap();
        std::fs::write(child.join(SETTINGS_FILE), "[css]\nenable = false\n").unwrap();

        let (settings, settings_dir) = discover_settings(&parent);
        assert_eq!(settings_dir, child);
        assert_eq!(settings.css.unwrap().enable, Some(false));

        cleanup_test_dir(&parent);
    }

    #[test]
    fn discover_settings_not_found() {
        let dir = make_test_dir("discover-none");

        let (settings, settings_dir) = discover_settings(&dir);
        assert_eq!(settings_dir, dir);
        assert_eq!(settings, ConfigPatch::default());

        cleanup_test_dir(&dir);
    }

    #[test]
    fn malformed_settings_file_is_ignored() {
        let dir = make_test_dir("discover-malformed");
        std::fs::write(dir.join(SETTINGS_FILE), "[css\nenable = ").unwrap();

        let (settings, _) = discover_settings(&dir);
        assert_eq!(settings, ConfigPatch::default());

        cleanup_test_dir(&dir);
    }
}
