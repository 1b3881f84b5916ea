//! Document state management and text utilities.
//!
//! This module provides:
//! - `LineIndex` and free functions for offset <-> LSP position conversion
//! - `TagInfo` extraction of top-level `<script>`/`<style>` blocks
//! - `Document` and `DocumentManager` for document lifecycle management
//! - `VersionedCache` for artifacts derived from a document version

mod cache;
mod events;
pub(crate) mod html;
mod region;
mod state;
mod store;
mod text;

pub use cache::VersionedCache;
pub use events::{DocumentEvent, EventBus, Listener, Phase};
pub use region::{blank_control_markers, extract_tags, DocumentTags, TagInfo};
pub use state::Document;
pub use store::DocumentManager;
pub use text::{line_offsets, offset_at, position_at, LineIndex};
