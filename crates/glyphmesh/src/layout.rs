//! Layout pipeline: line breaking, auto-fit, and the engine entry point.
//!
//! [`TextMeshEngine::build`] runs the whole pipeline: preprocess the text
//! into symbols, walk them left to right placing quads and breaking lines,
//! shrink the font size until the block fits (when asked to), then apply
//! alignment and mirroring to the finished buffers. Word wrapping
//! backtracks: a partial word is rolled out of the page buffers and
//! replayed on the next line, so the output never holds duplicate quads.

use crate::font::FontSource;
use crate::mesh::{align_and_mirror, place_quad, resolve_glyph, PageArena, TextMesh};
use crate::style::{OutlineStyle, Rgb, ShadowStyle, StylePalettes};
use crate::symbol::{BidiReorder, MarkupEvaluator, Symbol, SymbolPreprocessor};
use std::ops::Range;
use tracing::{debug, warn};

/// Layout controls for one build. All pixel quantities are expressed at
/// the requested `font_size`.
#[derive(Debug, Clone)]
pub struct LayoutOptions {
    /// Requested font size in pixels; auto-fit never exceeds it.
    pub font_size: f32,
    /// Auto-fit floor in pixels. A floor at `font_size` disables shrinking.
    pub min_font_size: f32,
    /// Shrink the font so no line is wider than the box.
    pub fit_width: bool,
    /// Shrink the font so the block is no taller than the box.
    pub fit_height: bool,
    /// Wrap lines at the box width.
    pub wrap: bool,
    /// Line cap. Once reached, wrapping stops entirely and further break
    /// characters render as ordinary symbols. `None` leaves it uncapped.
    pub max_lines: Option<u32>,
    /// Advance multiplier; 1.0 keeps the font-defined spacing.
    pub letter_spacing: f32,
    /// Line height in pixels at `font_size`. `None` derives it from the
    /// font's ascent and descent.
    pub line_height: Option<f32>,
    /// Evaluate markup through the registered evaluator.
    pub markup: bool,
    /// Reorder symbols through the registered bidi collaborator and mirror
    /// the result.
    pub rtl: bool,
    /// Base fill color (palette entry 0).
    pub color: Rgb,
    /// Base outline (palette entry 0).
    pub outline: OutlineStyle,
    /// Base shadow (palette entry 0).
    pub shadow: ShadowStyle,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            font_size: 16.0,
            min_font_size: 1.0,
            fit_width: false,
            fit_height: false,
            wrap: true,
            max_lines: None,
            letter_spacing: 1.0,
            line_height: None,
            markup: false,
            rtl: false,
            color: Rgb::default(),
            outline: OutlineStyle::NONE,
            shadow: ShadowStyle::NONE,
        }
    }
}

/// Target rectangle the text is laid out into.
///
/// Pivot and alignment are normalized factors: 0 is the left/top edge,
/// 1 the right/bottom. A non-positive dimension means unbounded; wrapping
/// and fitting along that axis are disabled and alignment falls back to
/// the measured extent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TargetBox {
    pub width: f32,
    pub height: f32,
    /// Point of the box that sits at the host's origin; mesh coordinates
    /// are shifted so this point lands on (0, 0).
    pub pivot_x: f32,
    pub pivot_y: f32,
    /// Content alignment inside the box.
    pub align_x: f32,
    pub align_y: f32,
    /// The host applies the pivot itself; leave it out of the offsets.
    pub anchor_split: bool,
}

impl TargetBox {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }
}

/// One terminated line: measured width and the trimmed content range into
/// the symbol sequence. Consumed break characters and trailing whitespace
/// sit outside the range.
#[derive(Debug, Clone, PartialEq)]
pub struct LineRecord {
    pub width: f32,
    pub range: Range<u32>,
}

/// Text mesh engine. Owns the optional markup and bidi collaborators and
/// drives the preprocess, layout, fit and alignment passes.
pub struct TextMeshEngine {
    markup: Option<Box<dyn MarkupEvaluator>>,
    reorder: Option<Box<dyn BidiReorder>>,
}

impl TextMeshEngine {
    pub fn new() -> Self {
        Self {
            markup: None,
            reorder: None,
        }
    }

    /// Register the host's markup evaluator, consulted when
    /// [`LayoutOptions::markup`] is set.
    pub fn set_markup_evaluator(&mut self, evaluator: Box<dyn MarkupEvaluator>) {
        self.markup = Some(evaluator);
    }

    /// Register the host's bidi reorderer, consulted when
    /// [`LayoutOptions::rtl`] is set.
    pub fn set_reorderer(&mut self, reorderer: Box<dyn BidiReorder>) {
        self.reorder = Some(reorderer);
    }

    /// Lay out `text` into `target` and produce one geometry batch per
    /// referenced atlas page.
    ///
    /// Layout is total: unknown codepoints are substituted or skipped and
    /// degenerate option values are clamped, so every call yields a mesh.
    pub fn build(
        &self,
        text: &str,
        font: &dyn FontSource,
        options: &LayoutOptions,
        target: &TargetBox,
    ) -> TextMesh {
        let mut opts = options.clone();
        opts.font_size = options.font_size.max(1.0);
        opts.min_font_size = options.min_font_size.max(1.0).min(opts.font_size);

        let mut palettes = StylePalettes::new(opts.color, opts.outline, opts.shadow);
        let preprocessor = SymbolPreprocessor {
            markup: self.markup.as_deref(),
            reorder: self.reorder.as_deref(),
        };
        let prepared = preprocessor.prepare(text, opts.markup, opts.rtl, &mut palettes);
        let symbols = prepared.symbols;
        let is_rtl = prepared.is_rtl;

        let mut arena = PageArena::default();
        let mut lines = Vec::new();
        let mut placements = Vec::new();

        // Width fitting lands in one step per overflowing line and height
        // fitting walks a pixel at a time, so the span plus slack bounds
        // any converging run.
        let max_attempts = (opts.font_size - opts.min_font_size).ceil() as u32 + 8;
        let mut size = opts.font_size;
        let mut fit = opts.fit_width || opts.fit_height;
        let mut attempts = 0u32;
        let (width, height) = loop {
            let outcome = attempt(
                &symbols,
                font,
                &palettes,
                &opts,
                target,
                size,
                fit,
                is_rtl,
                &mut arena,
                &mut lines,
                &mut placements,
            );
            match outcome {
                Attempt::Stable { width, height } => break (width, height),
                Attempt::Retry(new_size) => {
                    attempts += 1;
                    debug!("auto-fit retry {}: {}px -> {}px", attempts, size, new_size);
                    size = new_size;
                    if attempts >= max_attempts {
                        warn!(
                            "auto-fit did not settle after {} attempts; staying at {}px",
                            attempts, size
                        );
                        fit = false;
                    }
                }
            }
        };

        let base = normalized_base(font);
        let ascent_px = font.ascent() * size / base;
        align_and_mirror(&mut arena, &lines, target, ascent_px, width, height, is_rtl);

        TextMesh {
            pages: arena.into_pages(),
            lines,
            symbols,
            placements,
            width,
            height,
            font_size: size,
            is_rtl,
        }
    }
}

impl Default for TextMeshEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one layout pass at a candidate font size.
enum Attempt {
    Stable { width: f32, height: f32 },
    Retry(f32),
}

/// Walk cursor state. Pen positions are relative to the line start; the
/// alignment pass shifts them into box space afterwards.
#[derive(Debug, Default)]
struct LayoutState {
    pen: f32,
    /// Pen position excluding trailing whitespace; recorded line widths
    /// come from here.
    trimmed_pen: f32,
    baseline: f32,
    line: u32,
    line_start: u32,
    placed_on_line: u32,
    word: Option<WordBoundary>,
    prev_char: Option<char>,
}

/// Wrap candidate: the line may be cut just before `index`.
#[derive(Debug, Clone, Copy)]
struct WordBoundary {
    index: u32,
    trimmed_pen: f32,
}

impl LayoutState {
    /// Close the current line: push its record with the trailing-whitespace
    /// trimmed content range, then reset the per-line accumulators.
    fn finish_line(
        &mut self,
        symbols: &[Symbol],
        lines: &mut Vec<LineRecord>,
        arena: &mut PageArena,
        end: u32,
        width: f32,
        next_start: u32,
        line_height: f32,
    ) {
        let mut trimmed = end;
        while trimmed > self.line_start && symbols[trimmed as usize - 1].ch.is_whitespace() {
            trimmed -= 1;
        }
        lines.push(LineRecord {
            width,
            range: self.line_start..trimmed,
        });
        self.line += 1;
        self.line_start = next_start;
        self.baseline += line_height;
        self.pen = 0.0;
        self.trimmed_pen = 0.0;
        self.placed_on_line = 0;
        self.word = None;
        self.prev_char = None;
        arena.mark_line_start();
    }
}

/// One full placement pass at `size`. Retries abort at the first fit
/// violation; the caller restarts with the proposed size.
#[allow(clippy::too_many_arguments)]
fn attempt(
    symbols: &[Symbol],
    font: &dyn FontSource,
    palettes: &StylePalettes,
    options: &LayoutOptions,
    target: &TargetBox,
    size: f32,
    fit: bool,
    is_rtl: bool,
    arena: &mut PageArena,
    lines: &mut Vec<LineRecord>,
    placements: &mut Vec<Option<(u16, u32)>>,
) -> Attempt {
    arena.clear();
    lines.clear();
    placements.clear();
    placements.resize(symbols.len(), None);

    let base = normalized_base(font);
    let line_height = effective_line_height(options, font, base, size);
    let max_width = if target.width > 0.0 {
        target.width
    } else {
        f32::INFINITY
    };
    let can_wrap = options.wrap && max_width.is_finite();

    let mut state = LayoutState::default();
    let n = symbols.len();
    let mut i = 0usize;
    while i < n {
        let symbol = symbols[i];

        if is_line_break(symbol.ch) && (!options.wrap || !line_cap_reached(options, state.line)) {
            let width = state.trimmed_pen;
            state.finish_line(
                symbols,
                lines,
                arena,
                i as u32,
                width,
                i as u32 + 1,
                line_height,
            );
            if fit {
                if let Some(new_size) = width_retry(width, size, options, target) {
                    return Attempt::Retry(new_size);
                }
            }
            i += 1;
            continue;
        }

        let Some(metrics) = resolve_glyph(font, symbol.ch) else {
            i += 1;
            continue;
        };
        let s = size / metrics.scale_or(base);
        let kern = match state.prev_char {
            Some(prev) => font.kerning(prev, symbol.ch),
            None => 0.0,
        };
        let advance = (metrics.advance + kern) * s * options.letter_spacing;

        if can_wrap
            && state.pen + advance > max_width
            && state.placed_on_line > 0
            && !symbol.ch.is_whitespace()
            && !line_cap_reached(options, state.line)
        {
            let (end, width, resume) = match state.word {
                Some(word) => {
                    // Pull the partial word off this line and replay it on
                    // the next one.
                    for j in (word.index as usize..i).rev() {
                        if let Some((page, _)) = placements[j].take() {
                            arena.page_mut(page).pop(state.line);
                        }
                    }
                    (word.index, word.trimmed_pen, word.index)
                }
                // No boundary on this line: cut mid-word.
                None => (i as u32, state.trimmed_pen, i as u32),
            };
            state.finish_line(symbols, lines, arena, end, width, resume, line_height);
            if fit {
                if let Some(new_size) = width_retry(width, size, options, target) {
                    return Attempt::Retry(new_size);
                }
            }
            i = resume as usize;
            continue;
        }

        let placement = place_quad(
            arena,
            font,
            palettes,
            &symbol,
            &metrics,
            state.pen,
            state.baseline,
            size,
            options.letter_spacing,
            is_rtl,
            state.line,
        );
        placements[i] = Some(placement);
        state.placed_on_line += 1;
        state.pen += advance;
        if !symbol.ch.is_whitespace() {
            state.trimmed_pen = state.pen;
        }
        state.prev_char = Some(symbol.ch);
        if i + 1 < n && is_word_boundary(symbol.ch, symbols[i + 1].ch) {
            state.word = Some(WordBoundary {
                index: i as u32 + 1,
                trimmed_pen: state.trimmed_pen,
            });
        }
        i += 1;
    }

    if (state.line_start as usize) < n || lines.is_empty() {
        let width = state.trimmed_pen;
        state.finish_line(symbols, lines, arena, n as u32, width, n as u32, line_height);
        if fit {
            if let Some(new_size) = width_retry(width, size, options, target) {
                return Attempt::Retry(new_size);
            }
        }
    }

    let measured_w = lines.iter().map(|l| l.width).fold(0.0, f32::max);
    let measured_h = lines.len().saturating_sub(1) as f32 * line_height
        + (font.ascent() + font.descent()) * size / base;
    if fit
        && options.fit_height
        && target.height > 0.0
        && measured_h > target.height
        && size > options.min_font_size
    {
        return Attempt::Retry((size - 1.0).max(options.min_font_size));
    }

    Attempt::Stable {
        width: measured_w,
        height: measured_h,
    }
}

fn normalized_base(font: &dyn FontSource) -> f32 {
    let base = font.base_size();
    if base > 0.0 {
        base
    } else {
        1.0
    }
}

/// Line height at the working size. The configured height is declared at
/// the requested size, so shrinking the font scales it proportionally.
fn effective_line_height(
    options: &LayoutOptions,
    font: &dyn FontSource,
    base: f32,
    size: f32,
) -> f32 {
    let requested = options.font_size;
    let configured = options
        .line_height
        .unwrap_or_else(|| (font.ascent() + font.descent()) * requested / base);
    configured * size / requested
}

/// Width-fit check for one finished line. Proposes the size at which the
/// line would exactly span the box, floored to land below it.
fn width_retry(
    line_width: f32,
    size: f32,
    options: &LayoutOptions,
    target: &TargetBox,
) -> Option<f32> {
    if !options.fit_width || target.width <= 0.0 || line_width <= target.width {
        return None;
    }
    let shrunk = (size * target.width / line_width).floor();
    let clamped = shrunk.max(options.min_font_size).min(options.font_size);
    if clamped != size {
        Some(clamped)
    } else {
        None
    }
}

fn line_cap_reached(options: &LayoutOptions, line: u32) -> bool {
    match options.max_lines {
        Some(max) => line + 1 >= max,
        None => false,
    }
}

fn is_line_break(ch: char) -> bool {
    // CRLF arrives as one symbol whose codepoint is the carriage return.
    matches!(ch, '\n' | '\r')
}

/// Whitespace that permits a line break. No-break spaces are excluded.
fn is_breakable_space(ch: char) -> bool {
    ch.is_whitespace() && !matches!(ch, '\u{00A0}' | '\u{202F}')
}

/// Characters that allow a break after themselves mid-text.
fn is_break_char(ch: char) -> bool {
    is_breakable_space(ch) || matches!(ch, '\u{002D}' | '\u{2010}' | '\u{200B}')
}

/// CJK codepoints break between any two characters, subject to the
/// no-break-before set.
fn is_cjk(ch: char) -> bool {
    matches!(ch as u32,
        0x1100..=0x11FF          // Hangul Jamo
        | 0x2E80..=0x2EFF        // CJK Radicals Supplement
        | 0x3000..=0x303F        // CJK Symbols and Punctuation
        | 0x3040..=0x309F        // Hiragana
        | 0x30A0..=0x30FF        // Katakana
        | 0x3130..=0x318F        // Hangul Compatibility Jamo
        | 0x31F0..=0x31FF        // Katakana Phonetic Extensions
        | 0x3400..=0x4DBF        // CJK Extension A
        | 0x4E00..=0x9FFF        // CJK Unified Ideographs
        | 0xAC00..=0xD7AF        // Hangul Syllables
        | 0xF900..=0xFAFF        // CJK Compatibility Ideographs
        | 0xFF00..=0xFFEF)       // Halfwidth and Fullwidth Forms
}

/// Small kana, sound marks, closing punctuation: a line must not start
/// with any of these.
fn no_break_before(ch: char) -> bool {
    matches!(
        ch,
        '、' | '。'
            | '，'
            | '．'
            | '：'
            | '；'
            | '！'
            | '？'
            | '」'
            | '』'
            | '】'
            | '〕'
            | '〉'
            | '》'
            | '）'
            | '］'
            | '｝'
            | '・'
            | '…'
            | '‥'
            | 'ー'
            | 'ゝ'
            | 'ゞ'
            | 'ヽ'
            | 'ヾ'
            | '々'
            | 'ぁ'
            | 'ぃ'
            | 'ぅ'
            | 'ぇ'
            | 'ぉ'
            | 'っ'
            | 'ゃ'
            | 'ゅ'
            | 'ょ'
            | 'ゎ'
            | 'ァ'
            | 'ィ'
            | 'ゥ'
            | 'ェ'
            | 'ォ'
            | 'ッ'
            | 'ャ'
            | 'ュ'
            | 'ョ'
            | 'ヮ'
            | 'ヵ'
            | 'ヶ'
    )
}

/// Whether a line may be cut between `current` and `next`.
fn is_word_boundary(current: char, next: char) -> bool {
    if is_break_char(current) {
        return true;
    }
    if is_cjk(current) && !is_cjk(next) && (is_break_char(next) || next.is_alphanumeric()) {
        return true;
    }
    if is_cjk(next) && !no_break_before(next) {
        return true;
    }
    false
}
