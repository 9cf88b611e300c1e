//! Page assembly: cursor, floats, footnote reservation, page chrome and the
//! paragraph handler seam.
//!
//! A [`TypesetContext`] is exclusively borrowed by one handler at a time.
//! Handlers move the cursor down the page, push positioned elements and ask
//! the context for a fresh page when content does not fit. Pushing a page
//! places the reserved footnotes at the bottom of the content area and the
//! header/footer in the page insets.

use std::collections::BTreeMap;

use galley::{
    Alignment, BoxContent, Document, FontMetrics, FontSpec, FootNoteId, FootNoteRef, Insets, Item,
    MeasureContext, NodeId, NodeKind, NodeStyle, Paragraph, ParagraphKind, Size, StyleLookup,
};
use log::{debug, trace, warn};

use crate::line_breaking::{line_ranges, BreakPoint, BreakingParams, LineBreaker, LineWidths};
use crate::object_layout::{
    CodeHandler, ImageHandler, MathHandler, MathLayouter, TableHandler, TocHandler,
};
use crate::render_engine::{QualityLevel, TypesetConfig, TypesetError};
use crate::render_ir::{Element, Page, RuleElement, TextElement, TextRole};

const EPSILON: f64 = 1e-6;
const FOOTNOTE_RULE_THICKNESS: f64 = 0.3;

/// Page size and the content area inside its insets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageGeometry {
    /// Full page size.
    pub page_size: Size,
    /// Page margins.
    pub insets: Insets,
}

impl PageGeometry {
    /// Geometry of a page.
    pub fn new(page_size: Size, insets: Insets) -> Self {
        Self { page_size, insets }
    }

    /// Left edge of the content area.
    pub fn content_left(&self) -> f64 {
        self.insets.left
    }

    /// Top edge of the content area.
    pub fn content_top(&self) -> f64 {
        self.insets.top
    }

    /// Bottom edge of the content area.
    pub fn content_bottom(&self) -> f64 {
        self.page_size.height - self.insets.bottom
    }

    /// Width of the content area; the default line width.
    pub fn content_width(&self) -> f64 {
        (self.page_size.width - self.insets.horizontal()).max(0.0)
    }

    /// Height of the content area.
    pub fn content_height(&self) -> f64 {
        (self.content_bottom() - self.content_top()).max(0.0)
    }
}

/// Layout cursor.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PositionContext {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position; top of the next line.
    pub y: f64,
}

/// Region beside a floating object that narrows the following lines.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FloatConfig {
    /// Lines starting above this y are narrowed.
    pub float_until_y: f64,
    /// Width taken away from narrowed lines.
    pub float_width: f64,
    /// Shift of narrowed lines (float width for left floats, zero otherwise).
    pub float_indent: f64,
}

impl FloatConfig {
    /// No active float.
    pub const fn none() -> Self {
        Self {
            float_until_y: 0.0,
            float_width: 0.0,
            float_indent: 0.0,
        }
    }

    /// Whether a line starting at `y` is beside the float.
    pub fn is_active_at(&self, y: f64) -> bool {
        self.float_width > 0.0 && y + EPSILON < self.float_until_y
    }
}

/// Inline run of a synthesized paragraph (captions, table cells, TOC labels).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InlineRun {
    /// Regular text.
    Plain(String),
    /// Bold text.
    Strong(String),
}

/// Typesetting of content outside the body flow.
///
/// Results are laid out on a page of the requested width with its origin at
/// `(0, 0)` and tall enough to hold the content; callers translate them into
/// place, usually through [`NestedBlock`].
pub trait NestedTypesetter {
    /// Typeset a detached subtree such as a footnote body.
    fn typeset_node(
        &self,
        document: &Document,
        node: NodeId,
        width: f64,
    ) -> Result<Vec<Page>, TypesetError>;

    /// Typeset a one-paragraph run list. Elements are attributed to `owner`.
    fn typeset_runs(
        &self,
        owner: NodeId,
        runs: &[InlineRun],
        class: Option<&str>,
        width: f64,
    ) -> Result<Vec<Page>, TypesetError>;

    /// Typeset a header or footer for `page_number`.
    fn typeset_chrome(
        &self,
        document: &Document,
        node: NodeId,
        width: f64,
        page_number: usize,
    ) -> Result<Vec<Page>, TypesetError> {
        let _ = page_number;
        self.typeset_node(document, node, width)
    }
}

/// One row of a [`NestedBlock`].
#[derive(Clone, Debug, PartialEq)]
pub struct NestedLine {
    /// Top of the row inside the block.
    pub top: f64,
    /// Top of the next row, or the block height for the last one.
    pub bottom: f64,
    /// Elements of the row.
    pub elements: Vec<Element>,
}

impl NestedLine {
    /// Row height including the spacing to the next row.
    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

/// Nested typesetting result flattened into one block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NestedBlock {
    /// Elements relative to the block origin.
    pub elements: Vec<Element>,
    /// Height the block occupies.
    pub height: f64,
}

impl NestedBlock {
    /// Stack the content of `pages` vertically.
    pub fn from_pages(pages: Vec<Page>) -> Self {
        let mut elements = Vec::new();
        let mut offset = 0.0f64;
        for page in pages {
            let mut bottom = offset + page.metrics.content_bottom;
            for mut element in page.content {
                element.translate(0.0, offset);
                let (_, y, _, height) = element.bounds();
                bottom = bottom.max(y + height);
                elements.push(element);
            }
            offset = bottom;
        }
        Self {
            elements,
            height: offset,
        }
    }

    /// Give body text runs a different role.
    pub fn with_role(mut self, role: TextRole) -> Self {
        for element in &mut self.elements {
            if let Element::Text(text) = element {
                if text.role == TextRole::Body {
                    text.role = role;
                }
            }
        }
        self
    }

    /// Whether the block holds nothing.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Split into rows of vertically overlapping elements.
    pub fn lines(&self) -> Vec<NestedLine> {
        let mut lines: Vec<NestedLine> = Vec::new();
        let mut row_bottom = f64::NEG_INFINITY;
        for element in &self.elements {
            let (_, y, _, height) = element.bounds();
            match lines.last_mut() {
                Some(line) if y + EPSILON < row_bottom => {
                    line.top = line.top.min(y);
                    line.elements.push(element.clone());
                }
                _ => lines.push(NestedLine {
                    top: y,
                    bottom: y,
                    elements: vec![element.clone()],
                }),
            }
            row_bottom = if lines.last().is_some_and(|line| line.elements.len() == 1) {
                y + height
            } else {
                row_bottom.max(y + height)
            };
        }
        let tops: Vec<f64> = lines.iter().map(|line| line.top).skip(1).collect();
        for (line, next_top) in lines
            .iter_mut()
            .zip(tops.into_iter().map(Some).chain(core::iter::once(None)))
        {
            line.bottom = next_top.unwrap_or(self.height).max(line.top);
        }
        lines
    }
}

/// Shared, read-only collaborators of a layout run.
#[derive(Clone, Copy)]
pub struct LayoutServices<'a> {
    /// Document being typeset.
    pub document: &'a Document,
    /// Engine configuration.
    pub config: &'a TypesetConfig,
    /// Style resolution.
    pub styles: &'a dyn StyleLookup,
    /// Text measurement.
    pub metrics: &'a dyn FontMetrics,
    /// Display math layout.
    pub math: &'a dyn MathLayouter,
    /// Out-of-flow typesetting.
    pub nested: &'a dyn NestedTypesetter,
    /// Line-breaking parameters of the current quality level.
    pub breaking: BreakingParams,
    /// Current quality level.
    pub quality: QualityLevel,
    /// Footnote occurrences of the flow being laid out.
    pub footnotes: &'a [FootNoteRef],
    /// Heading pages from the previous pass.
    pub previous_anchors: &'a BTreeMap<NodeId, usize>,
    /// Whether pushed pages receive headers and footers.
    pub chrome: bool,
}

/// Footnote body typeset and waiting for its page.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedFootNote {
    /// Displayed number.
    pub number: u32,
    /// Body block node.
    pub body_node: NodeId,
    /// Font of the number.
    pub font: FontSpec,
    /// Width of the number.
    pub number_width: f64,
    /// Baseline of the number.
    pub number_baseline: f64,
    /// Horizontal offset of the body.
    pub body_offset: f64,
    /// Typeset body.
    pub body: NestedBlock,
}

/// Pages and heading anchors produced by a layout run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutOutput {
    /// Finished pages.
    pub pages: Vec<Page>,
    /// Page number of each heading's first line.
    pub anchors: BTreeMap<NodeId, usize>,
}

/// Mutable layout state threaded through the paragraph handlers.
pub struct TypesetContext<'a> {
    services: LayoutServices<'a>,
    geometry: PageGeometry,
    position: PositionContext,
    float: FloatConfig,
    page: Page,
    pages: Vec<Page>,
    pending_footnotes: Vec<PlacedFootNote>,
    reserved: f64,
    anchors: BTreeMap<NodeId, usize>,
}

impl<'a> TypesetContext<'a> {
    /// Context positioned at the top of page `first_page_number`.
    pub fn new(services: LayoutServices<'a>, geometry: PageGeometry, first_page_number: usize) -> Self {
        let mut page = Page::new(first_page_number);
        page.metrics.quality = services.quality.0;
        Self {
            services,
            geometry,
            position: PositionContext {
                x: geometry.content_left(),
                y: geometry.content_top(),
            },
            float: FloatConfig::none(),
            page,
            pages: Vec::new(),
            pending_footnotes: Vec::new(),
            reserved: 0.0,
            anchors: BTreeMap::new(),
        }
    }

    /// Collaborators of this run.
    pub fn services(&self) -> LayoutServices<'a> {
        self.services
    }

    /// Page geometry.
    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    /// Cursor.
    pub fn position(&self) -> PositionContext {
        self.position
    }

    /// Move the cursor to `y`.
    pub fn set_y(&mut self, y: f64) {
        self.position.y = y;
    }

    /// Move the cursor down.
    pub fn advance(&mut self, dy: f64) {
        self.position.y += dy;
    }

    /// Active float.
    pub fn float(&self) -> FloatConfig {
        self.float
    }

    /// Replace the active float.
    pub fn set_float(&mut self, float: FloatConfig) {
        self.float = float;
    }

    /// Resolved style of `node`.
    pub fn style(&self, node: NodeId) -> NodeStyle {
        self.services.styles.style(self.services.document, node)
    }

    /// Page being filled.
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Displayed number of the page being filled.
    pub fn page_number(&self) -> usize {
        self.page.page_number
    }

    /// Whether nothing has been placed on the current page.
    pub fn is_page_empty(&self) -> bool {
        self.page.content.is_empty()
    }

    /// Whether the cursor sits at the top of the content area.
    pub fn is_at_page_top(&self) -> bool {
        self.position.y <= self.geometry.content_top() + EPSILON
    }

    /// Lowest y body content may reach on this page.
    pub fn available_bottom(&self) -> f64 {
        self.geometry.content_bottom() - self.reserved
    }

    /// Whether `height` fits below the cursor.
    pub fn fits(&self, height: f64) -> bool {
        self.position.y + height <= self.available_bottom() + EPSILON
    }

    /// Push the page when `height` does not fit and the page has content.
    pub fn ensure_room(&mut self, height: f64) -> Result<bool, TypesetError> {
        if self.fits(height) || self.is_page_empty() {
            return Ok(false);
        }
        self.push_page()?;
        Ok(true)
    }

    /// Place a body element.
    pub fn push_content(&mut self, element: Element) {
        let (_, y, _, height) = element.bounds();
        self.mark_content_bottom(y + height);
        self.page.push_content(element);
    }

    /// Place the elements of one line at the cursor and move below it.
    pub fn push_line(&mut self, elements: Vec<Element>, line_height: f64) {
        for element in elements {
            self.page.push_content(element);
        }
        self.position.y += line_height;
        self.page.metrics.line_count += 1;
        self.mark_content_bottom(self.position.y);
    }

    /// Record that body content reaches down to `y`.
    pub fn mark_content_bottom(&mut self, y: f64) {
        if y > self.page.metrics.content_bottom {
            self.page.metrics.content_bottom = y;
        }
    }

    /// Record the current page for a heading.
    pub fn record_anchor(&mut self, node: NodeId) {
        self.anchors.entry(node).or_insert(self.page.page_number);
    }

    /// Typeset the body of footnote occurrence `id`.
    ///
    /// Returns `None` when the occurrence has no body in this flow, which is
    /// the case for marks inside nested content.
    pub fn prepare_footnote(
        &self,
        id: FootNoteId,
    ) -> Result<Option<PlacedFootNote>, TypesetError> {
        let services = self.services;
        let Some(note) = services.footnotes.iter().find(|note| note.id == id) else {
            warn!("footnote mark {:?} outside the body flow dropped", id);
            return Ok(None);
        };
        let style = self.style(note.body);
        let label = note.number.to_string();
        let metrics = services.metrics.measure_string(
            MeasureContext::new(note.body, &style),
            None,
            &label,
        )?;
        let body_offset = metrics.width + services.config.footnote_number_gap;
        let width = (self.geometry.content_width() - body_offset).max(1.0);
        let pages = services
            .nested
            .typeset_node(services.document, note.body, width)?;
        Ok(Some(PlacedFootNote {
            number: note.number,
            body_node: note.body,
            font: style.font,
            number_width: metrics.width,
            number_baseline: metrics.baseline,
            body_offset,
            body: NestedBlock::from_pages(pages).with_role(TextRole::FootNote),
        }))
    }

    /// Extra page height `notes` need on the current page.
    pub fn footnote_height(&self, notes: &[PlacedFootNote]) -> f64 {
        if notes.is_empty() {
            return 0.0;
        }
        let separator = if self.pending_footnotes.is_empty() {
            self.services.config.footnote_separator_gap
        } else {
            0.0
        };
        separator + notes.iter().map(|note| note.body.height).sum::<f64>()
    }

    /// Reserve space for `notes` at the bottom of the current page.
    pub fn reserve_footnotes(&mut self, notes: Vec<PlacedFootNote>) {
        self.reserved += self.footnote_height(&notes);
        self.pending_footnotes.extend(notes);
    }

    /// Finish the current page and start the next one.
    ///
    /// Empty pages are not emitted. The cursor, float and footnote
    /// reservation are reset either way.
    pub fn push_page(&mut self) -> Result<(), TypesetError> {
        if !self.page.is_empty() || !self.pending_footnotes.is_empty() {
            self.place_footnotes();
            if self.services.chrome {
                self.place_chrome()?;
            }
            let mut next = Page::new(self.page.page_number + 1);
            next.metrics.quality = self.services.quality.0;
            let page = core::mem::replace(&mut self.page, next);
            debug!(
                "pushed page {} ({} lines, {} elements)",
                page.page_number,
                page.metrics.line_count,
                page.elements().size_hint().0
            );
            self.pages.push(page);
        }
        self.position = PositionContext {
            x: self.geometry.content_left(),
            y: self.geometry.content_top(),
        };
        self.float = FloatConfig::none();
        self.reserved = 0.0;
        Ok(())
    }

    /// Flush the last page and return the run's output.
    pub fn finish(mut self) -> Result<LayoutOutput, TypesetError> {
        self.push_page()?;
        Ok(LayoutOutput {
            pages: self.pages,
            anchors: self.anchors,
        })
    }

    fn place_footnotes(&mut self) {
        if self.pending_footnotes.is_empty() {
            return;
        }
        let left = self.geometry.content_left();
        let gap = self.services.config.footnote_separator_gap;
        let mut y = self.geometry.content_bottom() - self.reserved;
        self.page.push_footnote(Element::Rule(RuleElement {
            x: left,
            y: y + gap / 2.0,
            width: self.geometry.content_width() / 3.0,
            thickness: FOOTNOTE_RULE_THICKNESS,
        }));
        y += gap;
        for note in core::mem::take(&mut self.pending_footnotes) {
            let first_baseline = note.body.elements.iter().find_map(|element| {
                element
                    .as_text()
                    .map(|text| text.y + text.baseline)
            });
            let number_y = first_baseline.map_or(y, |baseline| y + baseline - note.number_baseline);
            self.page.push_footnote(Element::Text(TextElement {
                x: left,
                y: number_y,
                width: note.number_width,
                height: note.font.size,
                baseline: note.number_baseline,
                text: note.number.to_string(),
                font: note.font.clone(),
                node: note.body_node,
                role: TextRole::FootNote,
            }));
            for mut element in note.body.elements {
                element.translate(left + note.body_offset, y);
                self.page.push_footnote(element);
            }
            y += note.body.height;
        }
        self.page.metrics.footnote_height = self.reserved;
    }

    fn place_chrome(&mut self) -> Result<(), TypesetError> {
        let services = self.services;
        let number = self.page.page_number;
        let width = self.geometry.content_width();
        let left = self.geometry.content_left();
        let gap = services.config.chrome_gap;
        if let Some(header) = services.document.header_for(number) {
            let block = NestedBlock::from_pages(services.nested.typeset_chrome(
                services.document,
                header,
                width,
                number,
            )?)
            .with_role(TextRole::Chrome);
            let top = self.geometry.content_top() - gap - block.height;
            for mut element in block.elements {
                element.translate(left, top);
                self.page.push_chrome(element);
            }
        }
        if let Some(footer) = services.document.footer_for(number) {
            let block = NestedBlock::from_pages(services.nested.typeset_chrome(
                services.document,
                footer,
                width,
                number,
            )?)
            .with_role(TextRole::Chrome);
            let top = self.geometry.content_bottom() + gap;
            for mut element in block.elements {
                element.translate(left, top);
                self.page.push_chrome(element);
            }
        }
        Ok(())
    }
}

/// Layout of one paragraph kind.
pub trait ParagraphHandler {
    /// Kind handled.
    fn kind(&self) -> ParagraphKind;

    /// Lay `paragraph` out at the context cursor.
    fn handle(
        &self,
        paragraph: &Paragraph,
        ctx: &mut TypesetContext<'_>,
    ) -> Result<(), TypesetError>;
}

/// Paragraph kind to handler table.
pub struct HandlerRegistry {
    handlers: BTreeMap<ParagraphKind, Box<dyn ParagraphHandler>>,
}

impl core::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl HandlerRegistry {
    /// Registry without handlers.
    pub fn empty() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Registry with a handler for every paragraph kind.
    pub fn standard() -> Self {
        Self::empty()
            .with(TextHandler)
            .with(ImageHandler)
            .with(CodeHandler)
            .with(TableHandler)
            .with(MathHandler)
            .with(TocHandler)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, handler: impl ParagraphHandler + 'static) -> Self {
        self.register(handler);
        self
    }

    /// Add or replace the handler of the handler's kind.
    pub fn register(&mut self, handler: impl ParagraphHandler + 'static) {
        self.handlers.insert(handler.kind(), Box::new(handler));
    }

    /// Handler for `kind`.
    pub fn get(&self, kind: ParagraphKind) -> Result<&dyn ParagraphHandler, TypesetError> {
        self.handlers
            .get(&kind)
            .map(|handler| handler.as_ref())
            .ok_or(TypesetError::MissingHandler(kind))
    }

    /// Lay out `paragraph` with its handler.
    pub fn dispatch(
        &self,
        paragraph: &Paragraph,
        ctx: &mut TypesetContext<'_>,
    ) -> Result<(), TypesetError> {
        self.get(paragraph.kind())?.handle(paragraph, ctx)
    }
}

/// Per-line indent and width of a text paragraph.
///
/// Valid for the page the plan was made on; lines projected past
/// `page_bottom` get the full measure.
#[derive(Clone, Copy, Debug, PartialEq)]
struct LineWidthPlan {
    indent: f64,
    width: f64,
    start_y: f64,
    line_height: f64,
    page_bottom: f64,
    float: FloatConfig,
}

impl LineWidthPlan {
    fn slot(&self, line: usize) -> (f64, f64) {
        let y = self.start_y + line as f64 * self.line_height;
        if self.float.is_active_at(y) && y + self.line_height <= self.page_bottom + EPSILON {
            (
                self.indent + self.float.float_indent,
                (self.width - self.float.float_width).max(0.0),
            )
        } else {
            (self.indent, self.width)
        }
    }

    /// Whether any line of the plan is beside the float.
    fn has_float(&self) -> bool {
        self.float.float_until_y > self.start_y + EPSILON
    }
}

impl LineWidths for LineWidthPlan {
    fn line_width(&self, line: usize) -> f64 {
        self.slot(line).1
    }
}

/// Height of every line of a text paragraph: the largest text size times the
/// style's line height.
fn text_line_height(items: &[Item], style: &NodeStyle) -> f64 {
    let max_size = items
        .iter()
        .filter_map(Item::as_text)
        .map(|text| text.font.size)
        .fold(0.0f64, f64::max);
    if max_size > 0.0 {
        max_size * style.line_height
    } else {
        style.line_height_abs()
    }
}

/// Knuth-Plass text layout.
///
/// Lines are broken against a width plan for the current page. When a page
/// break lands inside a paragraph that was planned around a float, the rest
/// of the paragraph is broken again for the new page.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextHandler;

impl ParagraphHandler for TextHandler {
    fn kind(&self) -> ParagraphKind {
        ParagraphKind::Text
    }

    fn handle(
        &self,
        paragraph: &Paragraph,
        ctx: &mut TypesetContext<'_>,
    ) -> Result<(), TypesetError> {
        let text = paragraph
            .as_text()
            .ok_or_else(|| TypesetError::precondition(paragraph.node, "expected a text paragraph"))?;
        let services = ctx.services();
        let style = ctx.style(paragraph.node);
        if !ctx.is_at_page_top() {
            ctx.advance(style.insets.top);
        }

        let items = text.items();
        let line_height = text_line_height(items, &style);
        let indent = style.insets.left + text.left_inset();
        let width = (ctx.geometry().content_width() - style.insets.horizontal() - text.left_inset())
            .max(0.0);
        let heading = matches!(
            services.document.kind(paragraph.node),
            Some(NodeKind::Heading { .. })
        );
        let mut first_line = true;
        let mut start = 0;
        'segments: while start < items.len() {
            let segment = &items[start..];
            let plan = LineWidthPlan {
                indent,
                width,
                start_y: ctx.position().y,
                line_height,
                page_bottom: ctx.available_bottom(),
                float: ctx.float(),
            };
            let breaks = LineBreaker::new(services.breaking)
                .find_breakpoints(segment, &plan)
                .map_err(|err| {
                    TypesetError::from(err.with_node(paragraph.node).with_quality(services.quality.0))
                })?;
            trace!(
                "paragraph {} broke into {} lines at quality {} (from item {})",
                paragraph.node,
                breaks.len(),
                services.quality.0,
                start
            );

            for (line, (range, bp)) in line_ranges(segment, &breaks).into_iter().zip(&breaks).enumerate() {
                let line_start = range.start;
                let placement = LinePlacement {
                    items: &segment[range],
                    break_item: segment.get(bp.item_index),
                    breakpoint: bp,
                    slot: plan.slot(line),
                    line_height,
                    style: &style,
                };
                let notes = placement.footnotes(ctx)?;
                if !ctx.fits(line_height + ctx.footnote_height(&notes)) && !ctx.is_page_empty() {
                    ctx.push_page()?;
                    if plan.has_float() {
                        debug!(
                            "paragraph {} re-planned on page {} after leaving a float",
                            paragraph.node,
                            ctx.page_number()
                        );
                        start += line_start;
                        continue 'segments;
                    }
                }
                ctx.reserve_footnotes(notes);
                placement.draw(ctx);
                if heading && first_line {
                    ctx.record_anchor(paragraph.node);
                    first_line = false;
                }
            }
            break;
        }
        ctx.advance(style.insets.bottom);
        Ok(())
    }
}

struct LinePlacement<'p> {
    items: &'p [Item],
    break_item: Option<&'p Item>,
    breakpoint: &'p BreakPoint,
    slot: (f64, f64),
    line_height: f64,
    style: &'p NodeStyle,
}

impl LinePlacement<'_> {
    /// Typeset the bodies of the footnotes marked on this line.
    fn footnotes(&self, ctx: &TypesetContext<'_>) -> Result<Vec<PlacedFootNote>, TypesetError> {
        let mut notes = Vec::new();
        for mark in self.items.iter().filter_map(Item::as_footnote_mark) {
            if let Some(note) = ctx.prepare_footnote(mark.footnote)? {
                notes.push(note);
            }
        }
        Ok(notes)
    }

    /// Push the line's elements at the cursor.
    fn draw(&self, ctx: &mut TypesetContext<'_>) {
        let max_baseline = self
            .items
            .iter()
            .filter_map(Item::as_text)
            .map(|text| text.metrics.baseline)
            .fold(0.0f64, f64::max);

        let (indent, width) = self.slot;
        let natural: f64 = self.items.iter().map(Item::width).sum::<f64>()
            + self.break_item.map_or(0.0, Item::break_width);
        let (ratio, offset) = match self.style.alignment {
            Alignment::Justify => (self.breakpoint.ratio, 0.0),
            alignment => {
                let slack = width - natural;
                if slack < 0.0 {
                    (self.breakpoint.ratio.min(0.0), 0.0)
                } else {
                    let offset = match alignment {
                        Alignment::Center => slack / 2.0,
                        Alignment::Right => slack,
                        _ => 0.0,
                    };
                    (0.0, offset)
                }
            }
        };

        let top = ctx.position().y;
        let mut x = ctx.geometry().content_left() + indent + offset;
        let mut elements = Vec::with_capacity(self.items.len() / 2 + 1);
        for item in self.items {
            match item {
                Item::Box { width, content } => {
                    match content {
                        BoxContent::Text(text) => elements.push(Element::Text(TextElement {
                            x,
                            y: top + max_baseline - text.metrics.baseline,
                            width: *width,
                            height: text.metrics.height,
                            baseline: text.metrics.baseline,
                            text: text.text.clone(),
                            font: text.font.clone(),
                            node: text.node,
                            role: TextRole::Body,
                        })),
                        BoxContent::FootNoteMark(mark) => elements.push(Element::Text(TextElement {
                            x,
                            y: top,
                            width: *width,
                            height: mark.metrics.height,
                            baseline: mark.metrics.baseline,
                            text: mark.number.to_string(),
                            font: mark.font.clone(),
                            node: mark.node,
                            role: TextRole::FootNoteMark,
                        })),
                        BoxContent::Empty => {}
                    }
                    x += *width;
                }
                Item::Glue {
                    width,
                    stretch,
                    shrink,
                } => x += adjusted_glue(*width, *stretch, *shrink, ratio),
                Item::Penalty { .. } => {}
            }
        }
        if let Some(Item::Penalty { width: hyphen, .. }) = self.break_item {
            if *hyphen > 0.0 {
                if let Some(Element::Text(last)) = elements.last_mut() {
                    last.text.push('-');
                    last.width += *hyphen;
                }
            }
        }
        ctx.push_line(elements, self.line_height);
    }
}

/// Glue width after applying the line's adjustment ratio.
fn adjusted_glue(width: f64, stretch: f64, shrink: f64, ratio: f64) -> f64 {
    if ratio >= 0.0 {
        if stretch.is_finite() {
            width + ratio * stretch
        } else {
            width
        }
    } else {
        width + ratio * shrink
    }
}
