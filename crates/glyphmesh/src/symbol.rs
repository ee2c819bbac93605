//! Symbol preprocessing.
//!
//! Turns a raw string into the ordered symbol sequence the layout pass
//! consumes: NFC-normalized, one symbol per extended grapheme cluster,
//! never empty. Markup evaluation and bidi reordering are delegated to
//! host-registered collaborators; their results are wired into the style
//! palettes and the symbol order here.

use crate::style::{OutlineStyle, Rgb, ShadowStyle, Style, StylePalettes, SymbolStyle};
use icu_normalizer::ComposingNormalizerBorrowed;
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

/// One atomic renderable unit of text.
///
/// A symbol corresponds to one extended grapheme cluster; the cluster's
/// first scalar is the codepoint looked up in the font.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    /// Renderable codepoint.
    pub ch: char,
    /// Per-palette style references.
    pub style: SymbolStyle,
}

impl Symbol {
    pub fn plain(ch: char) -> Self {
        Self {
            ch,
            style: SymbolStyle::default(),
        }
    }
}

/// Style overrides one markup tag attaches to a symbol.
///
/// Fields the tag does not specify stay `None` and fall through to the
/// element's base style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarkupStyle {
    pub color: Option<Rgb>,
    pub outline: Option<OutlineStyle>,
    pub shadow: Option<ShadowStyle>,
}

/// Result of markup evaluation: tag-stripped symbols plus the per-symbol
/// overrides, parallel to `symbols`. `tags` is `None` when the text carried
/// no recognized tags.
#[derive(Debug, Clone, Default)]
pub struct MarkupSegments {
    pub symbols: Vec<String>,
    pub tags: Option<Vec<Option<MarkupStyle>>>,
}

/// Markup evaluator collaborator. The grammar is the host's business; the
/// engine only consumes the segmented output.
pub trait MarkupEvaluator {
    /// Strip tags from `text`, segment the remainder into grapheme
    /// clusters, and report per-cluster style overrides.
    fn segment_and_tag(&self, text: &str) -> MarkupSegments;
}

/// Result of bidi analysis over a symbol sequence.
#[derive(Debug, Clone)]
pub struct Reordering {
    /// Whether the paragraph renders right-to-left (drives mirroring).
    pub rtl: bool,
    /// Visual permutation: `order[new_position] = old_index`.
    pub order: Vec<u32>,
}

/// Bidi reordering collaborator, consumed as a pure function.
pub trait BidiReorder {
    fn reorder(&self, symbols: &[char]) -> Reordering;
}

/// Output of one preprocessing pass.
#[derive(Debug, Clone)]
pub struct PreparedText {
    pub symbols: Vec<Symbol>,
    pub is_rtl: bool,
}

/// Splits raw text into renderable symbols and wires style overrides into
/// the palettes.
pub struct SymbolPreprocessor<'a> {
    pub markup: Option<&'a dyn MarkupEvaluator>,
    pub reorder: Option<&'a dyn BidiReorder>,
}

impl<'a> SymbolPreprocessor<'a> {
    pub fn prepare(
        &self,
        text: &str,
        markup_enabled: bool,
        rtl_enabled: bool,
        palettes: &mut StylePalettes,
    ) -> PreparedText {
        let nfc = ComposingNormalizerBorrowed::new_nfc();
        let normalized = nfc.normalize(text);

        let mut symbols = if markup_enabled {
            match self.markup {
                Some(evaluator) => {
                    tagged_symbols(evaluator.segment_and_tag(&normalized), palettes)
                }
                None => {
                    warn!("markup requested but no evaluator registered; tags render literally");
                    segment_plain(&normalized)
                }
            }
        } else {
            segment_plain(&normalized)
        };

        // Layout always has something to place.
        if symbols.is_empty() {
            symbols.push(Symbol::plain(' '));
        }

        let mut is_rtl = false;
        if rtl_enabled {
            match self.reorder {
                Some(reorderer) => {
                    let chars: Vec<char> = symbols.iter().map(|s| s.ch).collect();
                    let result = reorderer.reorder(&chars);
                    match permute(&symbols, &result.order) {
                        Some(permuted) => {
                            symbols = permuted;
                            is_rtl = result.rtl;
                        }
                        None => {
                            warn!(
                                "reorder returned an invalid permutation ({} symbols, {} indices); keeping logical order",
                                symbols.len(),
                                result.order.len()
                            );
                        }
                    }
                }
                None => {
                    warn!("RTL reordering requested but no reorderer registered");
                }
            }
        }

        PreparedText { symbols, is_rtl }
    }
}

fn segment_plain(text: &str) -> Vec<Symbol> {
    text.graphemes(true)
        .filter_map(|cluster| cluster.chars().next())
        .map(Symbol::plain)
        .collect()
}

fn tagged_symbols(segments: MarkupSegments, palettes: &mut StylePalettes) -> Vec<Symbol> {
    let MarkupSegments { symbols, tags } = segments;
    let mut out = Vec::with_capacity(symbols.len());

    for (i, cluster) in symbols.iter().enumerate() {
        let Some(ch) = cluster.chars().next() else {
            continue;
        };
        let mut style = SymbolStyle::default();
        if let Some(tags) = tags.as_ref() {
            if let Some(Some(tag)) = tags.get(i) {
                if let Some(color) = tag.color {
                    style.color = Style::Override(palettes.colors.intern(color));
                }
                if let Some(outline) = tag.outline {
                    style.outline = Style::Override(palettes.outlines.intern(outline));
                }
                if let Some(shadow) = tag.shadow {
                    style.shadow = Style::Override(palettes.shadows.intern(shadow));
                }
            }
        }
        out.push(Symbol { ch, style });
    }

    out
}

/// Apply `order[new] = old` to the symbol sequence. Rejects permutations of
/// the wrong length or with out-of-range/duplicate indices.
fn permute(symbols: &[Symbol], order: &[u32]) -> Option<Vec<Symbol>> {
    if order.len() != symbols.len() {
        return None;
    }
    let mut seen = vec![false; symbols.len()];
    let mut out = Vec::with_capacity(symbols.len());
    for &old in order {
        let old = old as usize;
        if old >= symbols.len() || seen[old] {
            return None;
        }
        seen[old] = true;
        out.push(symbols[old]);
    }
    Some(out)
}
