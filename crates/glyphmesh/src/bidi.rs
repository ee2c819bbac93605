//! Bidi reordering backed by the Unicode Bidirectional Algorithm.

use crate::symbol::{BidiReorder, Reordering};
use unicode_bidi::BidiInfo;

/// [`BidiReorder`] implementation over the UBA.
///
/// Paragraph direction comes from the first strong character. The emitted
/// permutation is the pre-mirror layout order: RTL paragraphs hand over
/// the reverse of the visual run order (identity for plain RTL text),
/// which the engine's mirroring pass flips into visual order on screen.
/// Register it on the engine for self-contained RTL support, or supply a
/// custom collaborator when the host pipeline already resolves bidi.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeBidiReorder;

impl BidiReorder for UnicodeBidiReorder {
    fn reorder(&self, symbols: &[char]) -> Reordering {
        let text: String = symbols.iter().collect();
        let info = BidiInfo::new(&text, None);

        let rtl = info
            .paragraphs
            .first()
            .map(|para| para.level.is_rtl())
            .unwrap_or(false);

        // Symbol index for each byte position of the joined text.
        let mut char_at = vec![0u32; text.len()];
        for (char_idx, (byte_idx, _)) in text.char_indices().enumerate() {
            char_at[byte_idx] = char_idx as u32;
        }

        let mut order = Vec::with_capacity(symbols.len());
        for para in &info.paragraphs {
            let (levels, runs) = info.visual_runs(para, para.range.clone());
            let begin = order.len();
            for run in runs {
                let run_rtl = levels[run.start].is_rtl();
                let first = order.len();
                for (offset, _) in text[run.clone()].char_indices() {
                    order.push(char_at[run.start + offset]);
                }
                if run_rtl {
                    order[first..].reverse();
                }
            }
            // The mirroring pass flips each line's on-screen order, so RTL
            // paragraphs hand over visual order reversed; plain RTL text
            // then lays out logically and the mirror puts it in place.
            if rtl {
                order[begin..].reverse();
            }
        }

        Reordering { rtl, order }
    }
}
