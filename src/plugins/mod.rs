//! Built-in providers, one per embedded language.

pub mod css;
pub mod script;
pub mod svelte;

pub use css::CssProvider;
pub use script::{script_provider, GeneratedScriptSelector, ScriptProvider, ScriptTranspiler};
pub use svelte::SvelteProvider;
