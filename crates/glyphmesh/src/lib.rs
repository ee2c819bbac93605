//! Text layout and glyph-mesh generation for bitmap-atlas fonts
//!
//! This crate provides:
//! - Symbol preprocessing (NFC normalization, grapheme segmentation, markup
//!   and bidi collaborator hooks)
//! - Word wrapping with backtracking and CJK-aware break rules
//! - Auto-fit font sizing against a target rectangle
//! - Per-atlas-page quad batches with packed style attributes
//! - Draw-range mapping for partial text reveal
//!
//! The engine is renderer-agnostic: it consumes a [`FontSource`] describing
//! pre-baked atlas pages and emits one [`PageMesh`] of positioned,
//! UV-mapped quads per referenced page.

pub mod bidi;
pub mod font;
pub mod layout;
pub mod mesh;
pub mod style;
pub mod symbol;

pub use bidi::UnicodeBidiReorder;
pub use font::{AtlasPage, BitmapFont, FontSource, GlyphMetrics};
pub use layout::{LayoutOptions, LineRecord, TargetBox, TextMeshEngine};
pub use mesh::{DrawRange, PageMesh, TextMesh};
pub use style::{OutlineStyle, Rgb, Rgba, ShadowStyle, Style, StylePalettes, SymbolStyle};
pub use symbol::{
    BidiReorder, MarkupEvaluator, MarkupSegments, MarkupStyle, PreparedText, Reordering, Symbol,
    SymbolPreprocessor,
};

use thiserror::Error;

/// Font description errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TextMeshError {
    #[error("Font base size must be positive, got {0}")]
    InvalidBaseSize(f32),

    #[error("Atlas page dimensions must be non-zero, got {width}x{height}")]
    InvalidPageSize { width: u32, height: u32 },

    #[error("Atlas page limit reached")]
    TooManyPages,

    #[error("Glyph {glyph:?} references unknown atlas page {page}")]
    UnknownAtlasPage { glyph: char, page: u16 },
}

pub type Result<T> = std::result::Result<T, TextMeshError>;
