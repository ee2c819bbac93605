//! Per-page quad buffers and mesh assembly.
//!
//! Every atlas page referenced by placed text gets its own buffer set:
//! seven parallel vertex/index streams sized exactly to the quads on that
//! page. The layout pass appends and rolls back quads here; the alignment
//! and mirroring pass and the reveal-range mapper run over the finished
//! buffers.

use crate::font::{FontSource, GlyphMetrics};
use crate::layout::{LineRecord, TargetBox};
use crate::style::StylePalettes;
use crate::symbol::Symbol;
use rustc_hash::FxHashMap;
use tracing::error;

// Per-quad stream strides, four corners each.
const POS_STRIDE: usize = 12;
const UV_STRIDE: usize = 8;
const COLOR_STRIDE: usize = 16;
const PARAM_STRIDE: usize = 12;
const INDEX_STRIDE: usize = 6;

/// Geometry buffers for one atlas page.
///
/// Corner order within a quad is top-left, top-right, bottom-right,
/// bottom-left; the index pattern is `[0, 1, 2, 0, 2, 3]` per quad.
#[derive(Debug, Clone, Default)]
pub struct PageMesh {
    /// Atlas page these quads sample from.
    pub page: u16,
    /// Next free quad slot.
    cursor: u32,
    /// Line number -> one-past-last quad slot on that line.
    line_tail: FxHashMap<u32, u32>,
    /// Cursor value when the current line began; rollback never crosses it.
    line_begin: u32,
    positions: Vec<f32>,
    normals: Vec<f32>,
    uvs: Vec<f32>,
    colors: Vec<u8>,
    outline_params: Vec<f32>,
    shadow_params: Vec<f32>,
    indices: Vec<u32>,
}

/// Fully resolved per-quad data, ready to append.
pub(crate) struct Quad {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    /// u0, v_top, u1, v_bottom (already v-flipped).
    pub uv: [f32; 4],
    pub color: [u8; 4],
    pub outline: [f32; 3],
    pub shadow: [f32; 3],
}

impl PageMesh {
    fn new(page: u16) -> Self {
        Self {
            page,
            ..Default::default()
        }
    }

    /// Append one quad on `line` and return its slot.
    pub(crate) fn push(&mut self, line: u32, quad: &Quad) -> u32 {
        let slot = self.cursor;
        let corners = [
            (quad.x0, quad.y0, quad.uv[0], quad.uv[1]),
            (quad.x1, quad.y0, quad.uv[2], quad.uv[1]),
            (quad.x1, quad.y1, quad.uv[2], quad.uv[3]),
            (quad.x0, quad.y1, quad.uv[0], quad.uv[3]),
        ];
        for (x, y, u, v) in corners {
            self.positions.extend_from_slice(&[x, y, 0.0]);
            self.normals.extend_from_slice(&[0.0, 0.0, 1.0]);
            self.uvs.extend_from_slice(&[u, v]);
            self.colors.extend_from_slice(&quad.color);
            self.outline_params.extend_from_slice(&quad.outline);
            self.shadow_params.extend_from_slice(&quad.shadow);
        }
        let base = slot * 4;
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        self.cursor = slot + 1;
        self.line_tail.insert(line, self.cursor);
        slot
    }

    /// Release the most recent quad slot (backtracking wrap).
    pub(crate) fn pop(&mut self, line: u32) {
        debug_assert!(self.cursor > 0, "pop on empty page");
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let quads = self.cursor as usize;
        self.positions.truncate(quads * POS_STRIDE);
        self.normals.truncate(quads * POS_STRIDE);
        self.uvs.truncate(quads * UV_STRIDE);
        self.colors.truncate(quads * COLOR_STRIDE);
        self.outline_params.truncate(quads * PARAM_STRIDE);
        self.shadow_params.truncate(quads * PARAM_STRIDE);
        self.indices.truncate(quads * INDEX_STRIDE);
        if self.cursor > self.line_begin {
            self.line_tail.insert(line, self.cursor);
        } else {
            self.line_tail.remove(&line);
        }
    }

    /// Remember the cursor at the start of a new line.
    pub(crate) fn mark_line_start(&mut self) {
        self.line_begin = self.cursor;
    }

    /// Shift quad corners by per-line x offsets and a block y offset.
    pub(crate) fn apply_offsets(&mut self, line_dx: &[f32], dy: f32) {
        let mut entries: Vec<(u32, u32)> = self.line_tail.iter().map(|(&l, &t)| (l, t)).collect();
        entries.sort_unstable();
        let mut start = 0u32;
        for (line, tail) in entries {
            let dx = line_dx.get(line as usize).copied().unwrap_or(0.0);
            for slot in start..tail {
                let base = slot as usize * POS_STRIDE;
                for corner in 0..4 {
                    self.positions[base + corner * 3] += dx;
                    self.positions[base + corner * 3 + 1] += dy;
                }
            }
            start = tail;
        }
    }

    /// Reflect corner x about `axis` and swap corners 1/3 so winding stays
    /// consistent. Style attributes are uniform per quad, so only positions
    /// and UVs travel with the swap.
    pub(crate) fn mirror_x(&mut self, axis: f32) {
        for slot in 0..self.cursor as usize {
            let base = slot * POS_STRIDE;
            for corner in 0..4 {
                let x = &mut self.positions[base + corner * 3];
                *x = axis - *x;
            }
            for k in 0..3 {
                self.positions.swap(base + 3 + k, base + 9 + k);
            }
            let uv = slot * UV_STRIDE;
            self.uvs.swap(uv + 2, uv + 6);
            self.uvs.swap(uv + 3, uv + 7);
        }
    }

    /// Quads currently in the buffer.
    pub fn quad_count(&self) -> u32 {
        self.cursor
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// x, y, z per corner.
    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    pub fn normals(&self) -> &[f32] {
        &self.normals
    }

    /// u, v per corner, v-flipped (origin top).
    pub fn uvs(&self) -> &[f32] {
        &self.uvs
    }

    /// RGBA bytes per corner.
    pub fn colors(&self) -> &[u8] {
        &self.colors
    }

    /// Packed outline RG/BA/thickness per corner.
    pub fn outline_params(&self) -> &[f32] {
        &self.outline_params
    }

    /// Packed shadow RG/BA/offset per corner.
    pub fn shadow_params(&self) -> &[f32] {
        &self.shadow_params
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Raw byte views for direct GPU upload.
    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn normal_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.normals)
    }

    pub fn uv_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.uvs)
    }

    pub fn color_bytes(&self) -> &[u8] {
        &self.colors
    }

    pub fn outline_param_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.outline_params)
    }

    pub fn shadow_param_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.shadow_params)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// Arena of per-page geometry, keyed by atlas page id. Pages are created
/// on first use and keep their first-encounter order.
#[derive(Debug, Clone, Default)]
pub(crate) struct PageArena {
    pages: Vec<PageMesh>,
    by_id: FxHashMap<u16, usize>,
}

impl PageArena {
    pub(crate) fn clear(&mut self) {
        self.pages.clear();
        self.by_id.clear();
    }

    pub(crate) fn page_mut(&mut self, page: u16) -> &mut PageMesh {
        let idx = *self.by_id.entry(page).or_insert_with(|| {
            self.pages.push(PageMesh::new(page));
            self.pages.len() - 1
        });
        &mut self.pages[idx]
    }

    pub(crate) fn pages_mut(&mut self) -> &mut [PageMesh] {
        &mut self.pages
    }

    pub(crate) fn mark_line_start(&mut self) {
        for page in &mut self.pages {
            page.mark_line_start();
        }
    }

    /// Hand the buffers off, dropping pages whose quads were all rolled
    /// back.
    pub(crate) fn into_pages(self) -> Vec<PageMesh> {
        self.pages.into_iter().filter(|p| p.cursor > 0).collect()
    }
}

/// Two bytes carried in one float channel.
fn pack(hi: u8, lo: u8) -> f32 {
    hi as f32 * 256.0 + lo as f32
}

/// Signed pixel offset biased into the byte range.
fn offset_byte(value: f32) -> f32 {
    (value + 128.0).round().clamp(0.0, 255.0)
}

/// Resolve metrics for a codepoint, substituting the space glyph and then
/// the first glyph in the table. Returns `None` only for an empty font.
pub(crate) fn resolve_glyph(font: &dyn FontSource, ch: char) -> Option<GlyphMetrics> {
    if let Some(metrics) = font.glyph(ch) {
        return Some(metrics);
    }
    let substitute = font
        .glyph(' ')
        .or_else(|| font.first_glyph().and_then(|first| font.glyph(first)));
    match substitute {
        Some(metrics) => {
            error!("no glyph for {:?}, substituting", ch);
            Some(metrics)
        }
        None => {
            error!("no glyph for {:?} and the font has no substitute; skipping", ch);
            None
        }
    }
}

/// Build and append the quad for one placed symbol, returning its
/// (page, slot) assignment.
#[allow(clippy::too_many_arguments)]
pub(crate) fn place_quad(
    arena: &mut PageArena,
    font: &dyn FontSource,
    palettes: &StylePalettes,
    symbol: &Symbol,
    metrics: &GlyphMetrics,
    pen: f32,
    baseline: f32,
    font_size: f32,
    letter_spacing: f32,
    rtl: bool,
    line: u32,
) -> (u16, u32) {
    let scale = metrics.scale_or(font.base_size());
    let s = font_size / scale;
    let edge = font_size * (metrics.width + metrics.height) / 2.0 / scale;

    let mut x0 = pen - metrics.x_offset * s;
    let y0 = baseline - metrics.y_offset * s;
    if rtl {
        // Re-anchor inside the advance so the mirroring pass lands the
        // glyph back on its pen position.
        x0 -= edge - 2.0 * metrics.x_offset * s - letter_spacing * metrics.advance * s;
    }

    let (pw, ph) = font.page_size(metrics.page);
    let pw = pw.max(1) as f32;
    let ph = ph.max(1) as f32;
    let u0 = metrics.atlas_x / pw;
    let u1 = (metrics.atlas_x + metrics.width) / pw;
    let v_top = 1.0 - metrics.atlas_y / ph;
    let v_bottom = 1.0 - (metrics.atlas_y + metrics.height) / ph;

    let fill = palettes.color(symbol.style.color);
    let outline = palettes.outline(symbol.style.outline);
    let shadow = palettes.shadow(symbol.style.shadow);

    // Shadow offset is packed in x-pixel units: y is scaled by the page
    // aspect and negated so dividing both channels by page width yields a
    // v-flipped UV-space offset.
    let aspect = pw / ph;
    let sx = offset_byte(shadow.offset_x as f32);
    let sy = offset_byte(-(shadow.offset_y as f32) * aspect);

    let quad = Quad {
        x0,
        y0,
        x1: x0 + edge,
        y1: y0 + edge,
        uv: [u0, v_top, u1, v_bottom],
        color: [fill.r, fill.g, fill.b, 255],
        outline: [
            pack(outline.color.r, outline.color.g),
            pack(outline.color.b, outline.color.a),
            outline.thickness as f32,
        ],
        shadow: [
            pack(shadow.color.r, shadow.color.g),
            pack(shadow.color.b, shadow.color.a),
            sx * 256.0 + sy,
        ],
    };

    let mesh = arena.page_mut(metrics.page);
    let slot = mesh.push(line, &quad);
    (metrics.page, slot)
}

/// Apply per-line alignment offsets and, for RTL, the x mirror.
pub(crate) fn align_and_mirror(
    arena: &mut PageArena,
    lines: &[LineRecord],
    target: &TargetBox,
    ascent_px: f32,
    measured_w: f32,
    measured_h: f32,
    rtl: bool,
) {
    let box_w = if target.width > 0.0 {
        target.width
    } else {
        measured_w
    };
    let box_h = if target.height > 0.0 {
        target.height
    } else {
        measured_h
    };
    // With anchor_split the host positions the block; pivot drops out.
    let (pivot_x, pivot_y) = if target.anchor_split {
        (0.0, 0.0)
    } else {
        (target.pivot_x, target.pivot_y)
    };

    let line_dx: Vec<f32> = lines
        .iter()
        .map(|line| {
            let free = box_w - line.width;
            let mut dx = target.align_x * free;
            if rtl {
                // Mirrored back into place by the reflection below.
                dx = free - dx;
            }
            dx - pivot_x * box_w
        })
        .collect();
    let dy = target.align_y * (box_h - measured_h) + ascent_px - pivot_y * box_h;

    for page in arena.pages_mut() {
        page.apply_offsets(&line_dx, dy);
    }

    if rtl {
        let axis = box_w * (1.0 - 2.0 * pivot_x);
        for page in arena.pages_mut() {
            page.mirror_x(axis);
        }
    }
}

/// Per-page index-buffer sub-range for a reveal range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRange {
    pub page: u16,
    /// First index to draw.
    pub base: u32,
    /// Number of indices to draw.
    pub count: u32,
}

/// Finished layout: per-page geometry plus the measurements and records
/// the host needs to drive rendering.
#[derive(Debug, Clone)]
pub struct TextMesh {
    /// One buffer set per referenced atlas page, in first-encounter order.
    pub pages: Vec<PageMesh>,
    /// Terminated lines in order.
    pub lines: Vec<LineRecord>,
    /// The laid-out symbol sequence (post markup/reorder).
    pub symbols: Vec<Symbol>,
    /// Per-symbol (page, slot) assignment; `None` for consumed breaks and
    /// glyphless symbols.
    pub placements: Vec<Option<(u16, u32)>>,
    /// Widest line, trailing whitespace excluded.
    pub width: f32,
    /// Block height from font ascent/descent metrics.
    pub height: f32,
    /// Final resolved font size after auto-fit.
    pub font_size: f32,
    /// Whether the mirroring pass ran.
    pub is_rtl: bool,
}

impl TextMesh {
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Total quads across all pages.
    pub fn quad_count(&self) -> u32 {
        self.pages.iter().map(|p| p.quad_count()).sum()
    }

    /// Text content of one line record.
    pub fn line_content(&self, index: usize) -> Option<String> {
        let record = self.lines.get(index)?;
        let range = record.range.start as usize..record.range.end as usize;
        Some(self.symbols.get(range)?.iter().map(|s| s.ch).collect())
    }

    /// Per-page draw sub-ranges revealing symbols `[start, end)`.
    ///
    /// The range is clamped to the symbol count; an inverted range draws
    /// nothing. Cheap: one scan of the placement table, no relayout.
    pub fn draw_ranges(&self, start: usize, end: usize) -> Vec<DrawRange> {
        let len = self.placements.len();
        let start = start.min(len);
        let end = end.clamp(start, len);

        let mut before: FxHashMap<u16, u32> = FxHashMap::default();
        let mut within: FxHashMap<u16, u32> = FxHashMap::default();
        for placement in &self.placements[..start] {
            if let Some((page, _)) = placement {
                *before.entry(*page).or_default() += 1;
            }
        }
        for placement in &self.placements[start..end] {
            if let Some((page, _)) = placement {
                *within.entry(*page).or_default() += 1;
            }
        }

        self.pages
            .iter()
            .map(|mesh| {
                let skip = before.get(&mesh.page).copied().unwrap_or(0);
                let take = within.get(&mesh.page).copied().unwrap_or(0);
                DrawRange {
                    page: mesh.page,
                    base: skip * INDEX_STRIDE as u32,
                    count: take * INDEX_STRIDE as u32,
                }
            })
            .collect()
    }

    /// Draw ranges covering every placed symbol.
    pub fn full_ranges(&self) -> Vec<DrawRange> {
        self.draw_ranges(0, self.placements.len())
    }
}
