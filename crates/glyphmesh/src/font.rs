//! Bitmap-font metrics boundary.
//!
//! The engine never parses font assets. It consumes baked per-glyph
//! metrics, kerning pairs, and atlas page dimensions through the
//! [`FontSource`] trait; [`BitmapFont`] is the table-backed implementation
//! for hosts that assemble their font description up front.

use crate::{Result, TextMeshError};
use rustc_hash::FxHashMap;

/// Baked metrics for one glyph, in atlas pixels at the font's baked size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlyphMetrics {
    /// Horizontal pen advance.
    pub advance: f32,
    /// Offset subtracted from the pen x when placing the quad.
    pub x_offset: f32,
    /// Offset subtracted from the baseline y when placing the quad
    /// (positive lifts the quad above the baseline in y-down space).
    pub y_offset: f32,
    /// Left edge of the glyph's rectangle in its atlas page.
    pub atlas_x: f32,
    /// Top edge of the glyph's rectangle in its atlas page.
    pub atlas_y: f32,
    /// Width of the atlas rectangle.
    pub width: f32,
    /// Height of the atlas rectangle.
    pub height: f32,
    /// Atlas page holding the bitmap.
    pub page: u16,
    /// Normalization scale; `None` falls back to the font's base size.
    pub scale: Option<f32>,
}

impl GlyphMetrics {
    /// Normalization scale to divide by when converting metric units to
    /// rendered pixels.
    pub fn scale_or(&self, base_size: f32) -> f32 {
        match self.scale {
            Some(s) if s.is_finite() && s > 0.0 => s,
            _ => base_size,
        }
    }
}

/// Read-only glyph metrics provider consumed by the layout engine.
///
/// Lookups happen once per symbol per layout attempt, so implementations
/// should be cheap to query.
pub trait FontSource {
    /// Metrics for one codepoint, or `None` when the font has no entry.
    fn glyph(&self, ch: char) -> Option<GlyphMetrics>;

    /// Kerning adjustment between two codepoints, in atlas pixels.
    fn kerning(&self, prev: char, next: char) -> f32 {
        let _ = (prev, next);
        0.0
    }

    /// Pixel dimensions of one atlas page.
    fn page_size(&self, page: u16) -> (u32, u32);

    /// Ascent above the baseline, in atlas pixels at the baked size.
    fn ascent(&self) -> f32;

    /// Descent below the baseline (positive), in atlas pixels at the baked size.
    fn descent(&self) -> f32;

    /// Size the atlas was baked at; also the default normalization scale.
    fn base_size(&self) -> f32;

    /// Lowest codepoint with a glyph; last resort for substitution.
    fn first_glyph(&self) -> Option<char> {
        None
    }
}

/// Pixel dimensions of one atlas texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasPage {
    pub width: u32,
    pub height: u32,
}

/// Table-backed [`FontSource`] built from baked font data.
///
/// Construction validates the description once so the layout pipeline can
/// trust it: pages have non-zero dimensions, every glyph references an
/// existing page, and the base size is a positive finite number.
#[derive(Debug, Clone)]
pub struct BitmapFont {
    base_size: f32,
    ascent: f32,
    descent: f32,
    pages: Vec<AtlasPage>,
    glyphs: FxHashMap<char, GlyphMetrics>,
    kerning: FxHashMap<(char, char), f32>,
    /// Lowest codepoint present, maintained on insert.
    first: Option<char>,
}

impl BitmapFont {
    /// Create an empty font description.
    ///
    /// `ascent` and `descent` are both positive distances from the baseline,
    /// in atlas pixels at `base_size`.
    pub fn new(base_size: f32, ascent: f32, descent: f32) -> Result<Self> {
        if !base_size.is_finite() || base_size <= 0.0 {
            return Err(TextMeshError::InvalidBaseSize(base_size));
        }
        Ok(Self {
            base_size,
            ascent,
            descent,
            pages: Vec::new(),
            glyphs: FxHashMap::default(),
            kerning: FxHashMap::default(),
            first: None,
        })
    }

    /// Register an atlas page and return its index.
    pub fn add_page(&mut self, width: u32, height: u32) -> Result<u16> {
        if width == 0 || height == 0 {
            return Err(TextMeshError::InvalidPageSize { width, height });
        }
        if self.pages.len() >= u16::MAX as usize {
            return Err(TextMeshError::TooManyPages);
        }
        let id = self.pages.len() as u16;
        self.pages.push(AtlasPage { width, height });
        Ok(id)
    }

    /// Register one glyph. The referenced page must already exist.
    pub fn add_glyph(&mut self, ch: char, metrics: GlyphMetrics) -> Result<()> {
        if metrics.page as usize >= self.pages.len() {
            return Err(TextMeshError::UnknownAtlasPage {
                glyph: ch,
                page: metrics.page,
            });
        }
        if self.first.map_or(true, |f| ch < f) {
            self.first = Some(ch);
        }
        self.glyphs.insert(ch, metrics);
        Ok(())
    }

    /// Register a kerning pair adjustment in atlas pixels.
    pub fn add_kerning(&mut self, prev: char, next: char, adjust: f32) {
        self.kerning.insert((prev, next), adjust);
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    pub fn page_count(&self) -> u16 {
        self.pages.len() as u16
    }
}

impl FontSource for BitmapFont {
    fn glyph(&self, ch: char) -> Option<GlyphMetrics> {
        self.glyphs.get(&ch).copied()
    }

    fn kerning(&self, prev: char, next: char) -> f32 {
        self.kerning.get(&(prev, next)).copied().unwrap_or(0.0)
    }

    fn page_size(&self, page: u16) -> (u32, u32) {
        self.pages
            .get(page as usize)
            .map(|p| (p.width, p.height))
            .unwrap_or((1, 1))
    }

    fn ascent(&self) -> f32 {
        self.ascent
    }

    fn descent(&self) -> f32 {
        self.descent
    }

    fn base_size(&self) -> f32 {
        self.base_size
    }

    fn first_glyph(&self) -> Option<char> {
        self.first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glyph_on_page(page: u16) -> GlyphMetrics {
        GlyphMetrics {
            advance: 10.0,
            width: 8.0,
            height: 8.0,
            page,
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_invalid_base_size() {
        assert!(BitmapFont::new(0.0, 24.0, 8.0).is_err());
        assert!(BitmapFont::new(-1.0, 24.0, 8.0).is_err());
        assert!(BitmapFont::new(f32::NAN, 24.0, 8.0).is_err());
        assert!(BitmapFont::new(32.0, 24.0, 8.0).is_ok());
    }

    #[test]
    fn test_rejects_zero_page_dimensions() {
        let mut font = BitmapFont::new(32.0, 24.0, 8.0).unwrap();
        assert!(font.add_page(0, 256).is_err());
        assert!(font.add_page(256, 0).is_err());
        assert_eq!(font.add_page(256, 128).unwrap(), 0);
        assert_eq!(font.add_page(256, 128).unwrap(), 1);
    }

    #[test]
    fn test_rejects_glyph_on_missing_page() {
        let mut font = BitmapFont::new(32.0, 24.0, 8.0).unwrap();
        font.add_page(256, 256).unwrap();

        assert!(font.add_glyph('a', glyph_on_page(0)).is_ok());
        let err = font.add_glyph('b', glyph_on_page(3)).unwrap_err();
        assert!(matches!(
            err,
            TextMeshError::UnknownAtlasPage { glyph: 'b', page: 3 }
        ));
    }

    #[test]
    fn test_first_glyph_is_lowest_codepoint() {
        let mut font = BitmapFont::new(32.0, 24.0, 8.0).unwrap();
        font.add_page(256, 256).unwrap();

        assert_eq!(font.first_glyph(), None);
        font.add_glyph('m', glyph_on_page(0)).unwrap();
        assert_eq!(font.first_glyph(), Some('m'));
        font.add_glyph('a', glyph_on_page(0)).unwrap();
        assert_eq!(font.first_glyph(), Some('a'));
        font.add_glyph('z', glyph_on_page(0)).unwrap();
        assert_eq!(font.first_glyph(), Some('a'));
    }

    #[test]
    fn test_kerning_defaults_to_zero() {
        let mut font = BitmapFont::new(32.0, 24.0, 8.0).unwrap();
        font.add_kerning('A', 'V', -2.5);

        assert_eq!(font.kerning('A', 'V'), -2.5);
        assert_eq!(font.kerning('V', 'A'), 0.0);
    }

    #[test]
    fn test_page_size_fallback_for_unknown_page() {
        let mut font = BitmapFont::new(32.0, 24.0, 8.0).unwrap();
        font.add_page(512, 256).unwrap();

        assert_eq!(font.page_size(0), (512, 256));
        assert_eq!(font.page_size(9), (1, 1));
    }

    #[test]
    fn test_glyph_scale_fallback() {
        let with_scale = GlyphMetrics {
            scale: Some(16.0),
            ..Default::default()
        };
        let without = GlyphMetrics::default();
        let degenerate = GlyphMetrics {
            scale: Some(0.0),
            ..Default::default()
        };

        assert_eq!(with_scale.scale_or(32.0), 16.0);
        assert_eq!(without.scale_or(32.0), 32.0);
        assert_eq!(degenerate.scale_or(32.0), 32.0);
    }
}
