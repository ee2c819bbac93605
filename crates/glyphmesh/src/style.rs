//! Style values and palettes.
//!
//! Text carries three independent style channels: fill color, outline, and
//! drop shadow. Values are byte-resolution (they end up packed into vertex
//! attributes) and live in deduplicated palettes; each symbol references a
//! palette entry or falls through to the element's base style (entry 0).

use rustc_hash::FxHashMap;
use std::hash::Hash;

/// Fill color at byte resolution (3 bytes per palette entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Rgb::WHITE
    }
}

/// Color with alpha, used by outline and shadow styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Rgba::TRANSPARENT
    }
}

/// Outline style: color plus thickness in atlas pixels (5 bytes per entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OutlineStyle {
    pub color: Rgba,
    pub thickness: u8,
}

impl OutlineStyle {
    /// Invisible outline; the default base style.
    pub const NONE: OutlineStyle = OutlineStyle {
        color: Rgba::TRANSPARENT,
        thickness: 0,
    };

    pub const fn new(color: Rgba, thickness: u8) -> Self {
        Self { color, thickness }
    }
}

/// Drop-shadow style: color plus a 2D pixel offset (6 bytes per entry).
///
/// Offsets are signed and measured in atlas pixels, y pointing down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShadowStyle {
    pub color: Rgba,
    pub offset_x: i8,
    pub offset_y: i8,
}

impl ShadowStyle {
    /// Invisible shadow; the default base style.
    pub const NONE: ShadowStyle = ShadowStyle {
        color: Rgba::TRANSPARENT,
        offset_x: 0,
        offset_y: 0,
    };

    pub const fn new(color: Rgba, offset_x: i8, offset_y: i8) -> Self {
        Self {
            color,
            offset_x,
            offset_y,
        }
    }
}

/// Reference from a symbol into one style palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Style {
    /// Use the element's base style (palette entry 0).
    #[default]
    Base,
    /// Use the palette entry at this index.
    Override(u16),
}

impl Style {
    /// Palette index this reference resolves to.
    pub fn index(self) -> u16 {
        match self {
            Style::Base => 0,
            Style::Override(idx) => idx,
        }
    }

    pub fn is_base(self) -> bool {
        matches!(self, Style::Base)
    }
}

/// Style references carried by one symbol, one per palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SymbolStyle {
    pub color: Style,
    pub outline: Style,
    pub shadow: Style,
}

/// A deduplicated style table. Entry 0 is always the base style; interning
/// an already-known value returns the existing index.
#[derive(Debug, Clone)]
pub struct Palette<T> {
    entries: Vec<T>,
    lookup: FxHashMap<T, u16>,
}

impl<T: Copy + Eq + Hash> Palette<T> {
    pub fn new(base: T) -> Self {
        let mut lookup = FxHashMap::default();
        lookup.insert(base, 0);
        Self {
            entries: vec![base],
            lookup,
        }
    }

    /// Intern a value and return its palette index.
    pub fn intern(&mut self, value: T) -> u16 {
        if let Some(&idx) = self.lookup.get(&value) {
            return idx;
        }
        if self.entries.len() > u16::MAX as usize {
            // Table saturated; degrade to the base style.
            return 0;
        }
        let idx = self.entries.len() as u16;
        self.entries.push(value);
        self.lookup.insert(value, idx);
        idx
    }

    /// Entry at `idx`, or the base entry when the index is out of range.
    pub fn get(&self, idx: u16) -> T {
        self.entries
            .get(idx as usize)
            .copied()
            .unwrap_or(self.entries[0])
    }

    /// Resolve a symbol's style reference.
    pub fn resolve(&self, style: Style) -> T {
        self.get(style.index())
    }

    pub fn base(&self) -> T {
        self.entries[0]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The three palettes backing one layout.
#[derive(Debug, Clone)]
pub struct StylePalettes {
    pub colors: Palette<Rgb>,
    pub outlines: Palette<OutlineStyle>,
    pub shadows: Palette<ShadowStyle>,
}

impl StylePalettes {
    /// Palettes seeded with the element's base styles as entry 0.
    pub fn new(color: Rgb, outline: OutlineStyle, shadow: ShadowStyle) -> Self {
        Self {
            colors: Palette::new(color),
            outlines: Palette::new(outline),
            shadows: Palette::new(shadow),
        }
    }

    pub fn color(&self, style: Style) -> Rgb {
        self.colors.resolve(style)
    }

    pub fn outline(&self, style: Style) -> OutlineStyle {
        self.outlines.resolve(style)
    }

    pub fn shadow(&self, style: Style) -> ShadowStyle {
        self.shadows.resolve(style)
    }
}

impl Default for StylePalettes {
    fn default() -> Self {
        Self::new(Rgb::default(), OutlineStyle::NONE, ShadowStyle::NONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_deduplicates_exact_values() {
        let mut palette = Palette::new(Rgb::WHITE);

        let red = palette.intern(Rgb::new(255, 0, 0));
        let green = palette.intern(Rgb::new(0, 255, 0));
        let red_again = palette.intern(Rgb::new(255, 0, 0));

        assert_eq!(red, red_again);
        assert_ne!(red, green);
        assert_eq!(palette.len(), 3);
    }

    #[test]
    fn test_interning_base_value_returns_entry_zero() {
        let mut palette = Palette::new(Rgb::WHITE);
        assert_eq!(palette.intern(Rgb::WHITE), 0);
        assert_eq!(palette.len(), 1);
    }

    #[test]
    fn test_out_of_range_index_falls_back_to_base() {
        let palette = Palette::new(OutlineStyle::NONE);
        assert_eq!(palette.get(500), OutlineStyle::NONE);
    }

    #[test]
    fn test_style_default_is_base() {
        let style = SymbolStyle::default();
        assert!(style.color.is_base());
        assert!(style.outline.is_base());
        assert!(style.shadow.is_base());
        assert_eq!(Style::Base.index(), 0);
        assert_eq!(Style::Override(7).index(), 7);
    }

    #[test]
    fn test_palettes_resolve_overrides() {
        let mut palettes = StylePalettes::new(Rgb::BLACK, OutlineStyle::NONE, ShadowStyle::NONE);
        let idx = palettes.colors.intern(Rgb::new(10, 20, 30));

        assert_eq!(palettes.color(Style::Base), Rgb::BLACK);
        assert_eq!(palettes.color(Style::Override(idx)), Rgb::new(10, 20, 30));

        let outline = OutlineStyle::new(Rgba::opaque(40, 50, 60), 2);
        let oidx = palettes.outlines.intern(outline);
        let resolved = palettes.outline(Style::Override(oidx));
        assert_eq!(resolved.color, Rgba::new(40, 50, 60, 255));
        assert_eq!(resolved.thickness, 2);
    }
}
