//! Handlers for block objects: images, code listings, tables, display math
//! and the table of contents.

use galley::{
    Alignment, FontMetrics, FontSpec, ImageParagraph, MeasureContext, NodeId, Paragraph,
    ParagraphBody, ParagraphKind, StringMetrics,
};
use log::warn;

use crate::render_engine::TypesetError;
use crate::render_ir::{Element, ImageElement, RuleElement, TextElement, TextRole};
use crate::render_layout::{
    FloatConfig, InlineRun, NestedBlock, ParagraphHandler, TypesetContext,
};

const EPSILON: f64 = 1e-6;
const FALLBACK_ASPECT_RATIO: f64 = 1.5;
const DEFAULT_FIGURE_PREFIX: &str = "Figure";
const DEFAULT_TABLE_PREFIX: &str = "Table";
const TABLE_RULE_THICKNESS: f64 = 0.2;
const TABLE_HEADER_RULE_THICKNESS: f64 = 0.5;
const TAB_WIDTH: usize = 4;

/// Place the rows of `block` with its origin at `(x, top)`.
///
/// When `breakable`, a row that does not fit moves to a fresh page and the
/// remaining rows follow it there. Returns the bottom of the last row.
fn place_rows(
    ctx: &mut TypesetContext<'_>,
    block: &NestedBlock,
    x: f64,
    top: f64,
    breakable: bool,
) -> Result<f64, TypesetError> {
    let mut offset = top;
    let mut bottom = top;
    for line in block.lines() {
        let line_top = offset + line.top;
        if breakable
            && line_top + line.height() > ctx.available_bottom() + EPSILON
            && !ctx.is_page_empty()
        {
            ctx.push_page()?;
            offset = ctx.position().y - line.top;
        }
        for mut element in line.elements {
            element.translate(x, offset);
            ctx.push_content(element);
        }
        bottom = offset + line.bottom;
    }
    ctx.mark_content_bottom(bottom);
    Ok(bottom)
}

fn text_element(
    x: f64,
    y: f64,
    text: &str,
    font: &FontSpec,
    metrics: &StringMetrics,
    node: NodeId,
    role: TextRole,
) -> Element {
    Element::Text(TextElement {
        x,
        y,
        width: metrics.width,
        height: metrics.height,
        baseline: metrics.baseline,
        text: text.to_string(),
        font: font.clone(),
        node,
        role,
    })
}

/// Block image with optional caption, floating beside text when asked to.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageHandler;

impl ImageHandler {
    fn caption_runs(image: &ImageParagraph, prefix: &str) -> Option<Vec<InlineRun>> {
        let caption = image.spec.caption.as_deref()?;
        let runs = match image.number {
            Some(number) => vec![
                InlineRun::Strong(format!("{} {}", prefix, number)),
                InlineRun::Plain(format!(": {}", caption)),
            ],
            None => vec![InlineRun::Plain(caption.to_string())],
        };
        Some(runs)
    }
}

impl ParagraphHandler for ImageHandler {
    fn kind(&self) -> ParagraphKind {
        ParagraphKind::Image
    }

    fn handle(
        &self,
        paragraph: &Paragraph,
        ctx: &mut TypesetContext<'_>,
    ) -> Result<(), TypesetError> {
        let ParagraphBody::Image(image) = &paragraph.body else {
            return Err(TypesetError::precondition(
                paragraph.node,
                "expected an image paragraph",
            ));
        };
        let services = ctx.services();
        let spec = &image.spec;
        let insets = ctx.style(paragraph.node).insets;
        ctx.advance(insets.top);

        let max_width = (ctx.geometry().content_width() - insets.horizontal()).max(0.0);
        let width = max_width * spec.width_ratio.clamp(0.0, 1.0);
        let aspect = spec
            .intrinsic_size
            .and_then(|size| size.aspect_ratio())
            .unwrap_or_else(|| {
                warn!(
                    "image {} ({}) has no intrinsic size; assuming aspect ratio {}",
                    paragraph.node, spec.src, FALLBACK_ASPECT_RATIO
                );
                FALLBACK_ASPECT_RATIO
            });
        let height = width / aspect;

        let x = ctx.geometry().content_left()
            + insets.left
            + match spec.alignment {
                Alignment::Left | Alignment::Justify => 0.0,
                Alignment::Center => (max_width - width) / 2.0,
                Alignment::Right => max_width - width,
            };
        let floating = spec.floating && spec.alignment != Alignment::Center;
        if !floating && !ctx.fits(height) && !ctx.is_page_empty() {
            ctx.push_page()?;
        }

        let y = ctx.position().y;
        ctx.push_content(Element::Image(ImageElement {
            x,
            y,
            width,
            height,
            src: spec.src.clone(),
            node: paragraph.node,
        }));
        let end_y = y + height + insets.bottom;
        if floating {
            let float_width = width + insets.horizontal();
            ctx.set_float(FloatConfig {
                float_until_y: end_y,
                float_width,
                float_indent: if spec.alignment == Alignment::Left {
                    float_width
                } else {
                    0.0
                },
            });
        } else {
            ctx.set_y(end_y);
        }

        let prefix = spec
            .caption_prefix
            .as_deref()
            .or_else(|| services.config.property("image.caption.prefix"))
            .unwrap_or(DEFAULT_FIGURE_PREFIX);
        let Some(runs) = Self::caption_runs(image, prefix) else {
            return Ok(());
        };
        let caption = NestedBlock::from_pages(services.nested.typeset_runs(
            paragraph.node,
            &runs,
            None,
            width.max(1.0),
        )?)
        .with_role(TextRole::Caption);
        let bottom = place_rows(ctx, &caption, x, end_y, !floating)? + insets.bottom;
        if floating {
            let mut float = ctx.float();
            float.float_until_y = bottom;
            ctx.set_float(float);
        } else {
            ctx.set_y(bottom);
        }
        Ok(())
    }
}

/// Monospace listing, one visual line per source line, long lines wrapped.
#[derive(Clone, Copy, Debug, Default)]
pub struct CodeHandler;

impl CodeHandler {
    fn segments(
        line: &str,
        width: f64,
        metrics: &dyn FontMetrics,
        cx: MeasureContext<'_>,
    ) -> Result<Vec<(String, StringMetrics)>, TypesetError> {
        let line = line.replace('\t', &" ".repeat(TAB_WIDTH));
        let line = line.trim_end();
        let whole = metrics.measure_string(cx, None, line)?;
        if whole.width <= width + EPSILON {
            return Ok(vec![(line.to_string(), whole)]);
        }
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut current_width = 0.0;
        let mut previous = None;
        for ch in line.chars() {
            let mut buffer = [0u8; 4];
            let mut glyph = metrics.measure_string(cx, previous, ch.encode_utf8(&mut buffer))?;
            if !current.is_empty() && current_width + glyph.width > width + EPSILON {
                let measured = metrics.measure_string(cx, None, &current)?;
                segments.push((core::mem::take(&mut current), measured));
                current_width = 0.0;
                // First glyph of a segment has nothing to kern against.
                glyph = metrics.measure_string(cx, None, ch.encode_utf8(&mut buffer))?;
            }
            current.push(ch);
            current_width += glyph.width;
            previous = Some(ch);
        }
        if !current.is_empty() {
            let measured = metrics.measure_string(cx, None, &current)?;
            segments.push((current, measured));
        }
        Ok(segments)
    }
}

impl ParagraphHandler for CodeHandler {
    fn kind(&self) -> ParagraphKind {
        ParagraphKind::Code
    }

    fn handle(
        &self,
        paragraph: &Paragraph,
        ctx: &mut TypesetContext<'_>,
    ) -> Result<(), TypesetError> {
        let ParagraphBody::Code(code) = &paragraph.body else {
            return Err(TypesetError::precondition(
                paragraph.node,
                "expected a code paragraph",
            ));
        };
        let services = ctx.services();
        let style = ctx.style(paragraph.node);
        if !ctx.is_at_page_top() {
            ctx.advance(style.insets.top);
        }
        let cx = MeasureContext::new(paragraph.node, &style);
        let width = (ctx.geometry().content_width() - style.insets.horizontal()).max(1.0);
        let x = ctx.geometry().content_left() + style.insets.left;
        let line_height = style.line_height_abs();

        for source_line in &code.lines {
            let segments = Self::segments(source_line, width, services.metrics, cx)?;
            if segments.len() > 1 {
                log::trace!(
                    "code line of {} chars wrapped into {} segments",
                    source_line.chars().count(),
                    segments.len()
                );
            }
            for (text, metrics) in segments {
                ctx.ensure_room(line_height)?;
                let mut elements = Vec::with_capacity(1);
                if !text.is_empty() {
                    elements.push(text_element(
                        x,
                        ctx.position().y,
                        &text,
                        &style.font,
                        &metrics,
                        paragraph.node,
                        TextRole::Code,
                    ));
                }
                ctx.push_line(elements, line_height);
            }
        }
        ctx.advance(style.insets.bottom);
        Ok(())
    }
}

/// Equal-width column table; cells are typeset through the nested typesetter.
#[derive(Clone, Copy, Debug, Default)]
pub struct TableHandler;

impl TableHandler {
    fn rule(ctx: &mut TypesetContext<'_>, x: f64, y: f64, width: f64, thickness: f64) {
        ctx.push_content(Element::Rule(RuleElement {
            x,
            y,
            width,
            thickness,
        }));
    }
}

impl ParagraphHandler for TableHandler {
    fn kind(&self) -> ParagraphKind {
        ParagraphKind::Table
    }

    fn handle(
        &self,
        paragraph: &Paragraph,
        ctx: &mut TypesetContext<'_>,
    ) -> Result<(), TypesetError> {
        let ParagraphBody::Table(table) = &paragraph.body else {
            return Err(TypesetError::precondition(
                paragraph.node,
                "expected a table paragraph",
            ));
        };
        let services = ctx.services();
        let style = ctx.style(paragraph.node);
        if !ctx.is_at_page_top() {
            ctx.advance(style.insets.top);
        }
        let columns = table.rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            ctx.advance(style.insets.bottom);
            return Ok(());
        }
        let width = (ctx.geometry().content_width() - style.insets.horizontal()).max(1.0);
        let left = ctx.geometry().content_left() + style.insets.left;
        let column_width = width / columns as f64;
        let padding = services.config.table_cell_padding;

        if let Some(number) = table.number {
            let prefix = services
                .config
                .property("table.caption.prefix")
                .unwrap_or(DEFAULT_TABLE_PREFIX);
            let title = NestedBlock::from_pages(services.nested.typeset_runs(
                paragraph.node,
                &[InlineRun::Strong(format!("{} {}", prefix, number))],
                None,
                width,
            )?)
            .with_role(TextRole::Caption);
            let top = ctx.position().y;
            let bottom = place_rows(ctx, &title, left, top, true)?;
            ctx.set_y(bottom);
        }

        for (row_index, row) in table.rows.iter().enumerate() {
            let header = row_index < table.header_rows;
            let mut cells = Vec::with_capacity(columns);
            for column in 0..columns {
                let text = row.get(column).map(String::as_str).unwrap_or("");
                if text.trim().is_empty() {
                    cells.push(NestedBlock::default());
                    continue;
                }
                let run = if header {
                    InlineRun::Strong(text.to_string())
                } else {
                    InlineRun::Plain(text.to_string())
                };
                let pages = services.nested.typeset_runs(
                    paragraph.node,
                    &[run],
                    Some("table-cell"),
                    (column_width - 2.0 * padding).max(1.0),
                )?;
                cells.push(NestedBlock::from_pages(pages).with_role(TextRole::TableCell));
            }
            let row_height = cells.iter().map(|cell| cell.height).fold(0.0, f64::max)
                + 2.0 * padding;

            let moved = ctx.ensure_room(row_height)?;
            let y = ctx.position().y;
            if row_index == 0 || moved {
                Self::rule(ctx, left, y, width, TABLE_RULE_THICKNESS);
            }
            for (column, cell) in cells.into_iter().enumerate() {
                let x = left + column as f64 * column_width + padding;
                for mut element in cell.elements {
                    element.translate(x, y + padding);
                    ctx.push_content(element);
                }
            }
            let thickness = if header && row_index + 1 == table.header_rows {
                TABLE_HEADER_RULE_THICKNESS
            } else {
                TABLE_RULE_THICKNESS
            };
            Self::rule(ctx, left, y + row_height, width, thickness);
            ctx.advance(row_height);
            ctx.mark_content_bottom(y + row_height);
        }
        ctx.advance(style.insets.bottom);
        Ok(())
    }
}

/// Positioned run inside a [`MathBox`].
#[derive(Clone, Debug, PartialEq)]
pub struct MathRun {
    /// Offset from the box's left edge.
    pub x: f64,
    /// Offset from the box's top edge.
    pub y: f64,
    /// Glyphs.
    pub text: String,
    /// Font.
    pub font: FontSpec,
    /// Measurement.
    pub metrics: StringMetrics,
}

/// Laid-out display formula.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MathBox {
    /// Total width.
    pub width: f64,
    /// Total height.
    pub height: f64,
    /// Baseline offset from the top.
    pub baseline: f64,
    /// Runs relative to the top-left corner.
    pub runs: Vec<MathRun>,
}

/// Display math layout supplier.
pub trait MathLayouter {
    /// Lay `expression` out in the font of `cx`.
    fn layout(
        &self,
        expression: &str,
        cx: MeasureContext<'_>,
        metrics: &dyn FontMetrics,
    ) -> Result<MathBox, TypesetError>;
}

/// Sets the expression source as a single italic run.
#[derive(Clone, Copy, Debug, Default)]
pub struct SourceMathLayouter;

impl MathLayouter for SourceMathLayouter {
    fn layout(
        &self,
        expression: &str,
        cx: MeasureContext<'_>,
        metrics: &dyn FontMetrics,
    ) -> Result<MathBox, TypesetError> {
        let source = expression.split_whitespace().collect::<Vec<_>>().join(" ");
        if source.is_empty() {
            return Err(TypesetError::Math {
                node: Some(cx.node),
                message: "empty expression".to_string(),
            });
        }
        let mut style = cx.style.clone();
        style.font.italic = true;
        let measured = metrics.measure_string(MeasureContext::new(cx.node, &style), None, &source)?;
        Ok(MathBox {
            width: measured.width,
            height: style.line_height_abs().max(measured.height),
            baseline: measured.baseline,
            runs: vec![MathRun {
                x: 0.0,
                y: 0.0,
                text: source,
                font: style.font,
                metrics: measured,
            }],
        })
    }
}

/// Display math, aligned per style with the equation number at the right edge.
#[derive(Clone, Copy, Debug, Default)]
pub struct MathHandler;

impl ParagraphHandler for MathHandler {
    fn kind(&self) -> ParagraphKind {
        ParagraphKind::Math
    }

    fn handle(
        &self,
        paragraph: &Paragraph,
        ctx: &mut TypesetContext<'_>,
    ) -> Result<(), TypesetError> {
        let ParagraphBody::Math(math) = &paragraph.body else {
            return Err(TypesetError::precondition(
                paragraph.node,
                "expected a math paragraph",
            ));
        };
        let services = ctx.services();
        let style = ctx.style(paragraph.node);
        if !ctx.is_at_page_top() {
            ctx.advance(style.insets.top);
        }
        let cx = MeasureContext::new(paragraph.node, &style);
        let formula = services
            .math
            .layout(&math.expression, cx, services.metrics)
            .map_err(|err| err.with_node(paragraph.node))?;
        let label = match math.number {
            Some(number) => {
                let text = format!("({})", number);
                let metrics = services.metrics.measure_string(cx, None, &text)?;
                Some((text, metrics))
            }
            None => None,
        };
        let height = label
            .as_ref()
            .map_or(formula.height, |(_, metrics)| formula.height.max(metrics.height));
        ctx.ensure_room(height)?;

        let width = (ctx.geometry().content_width() - style.insets.horizontal()).max(0.0);
        let left = ctx.geometry().content_left() + style.insets.left;
        let x = left
            + match style.alignment {
                Alignment::Left | Alignment::Justify => 0.0,
                Alignment::Center => (width - formula.width) / 2.0,
                Alignment::Right => width - formula.width,
            };
        let y = ctx.position().y;
        for run in &formula.runs {
            ctx.push_content(text_element(
                x + run.x,
                y + run.y,
                &run.text,
                &run.font,
                &run.metrics,
                paragraph.node,
                TextRole::Math,
            ));
        }
        if let Some((text, metrics)) = label {
            ctx.push_content(text_element(
                left + width - metrics.width,
                y + formula.baseline - metrics.baseline,
                &text,
                &style.font,
                &metrics,
                paragraph.node,
                TextRole::Math,
            ));
        }
        ctx.set_y(y + height);
        ctx.mark_content_bottom(y + height);
        ctx.advance(style.insets.bottom);
        Ok(())
    }
}

/// Table of contents with page numbers from the previous layout pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct TocHandler;

impl ParagraphHandler for TocHandler {
    fn kind(&self) -> ParagraphKind {
        ParagraphKind::TableOfContents
    }

    fn handle(
        &self,
        paragraph: &Paragraph,
        ctx: &mut TypesetContext<'_>,
    ) -> Result<(), TypesetError> {
        let ParagraphBody::TableOfContents(toc) = &paragraph.body else {
            return Err(TypesetError::precondition(
                paragraph.node,
                "expected a table-of-contents paragraph",
            ));
        };
        let services = ctx.services();
        let style = ctx.style(paragraph.node);
        if !ctx.is_at_page_top() {
            ctx.advance(style.insets.top);
        }
        let cx = MeasureContext::new(paragraph.node, &style);
        let width = (ctx.geometry().content_width() - style.insets.horizontal()).max(1.0);
        let left = ctx.geometry().content_left() + style.insets.left;

        for entry in &toc.entries {
            let indent = f64::from(entry.level.saturating_sub(1)) * services.config.toc_indent;
            let page = services
                .previous_anchors
                .get(&entry.target)
                .map_or_else(|| "?".to_string(), |page| page.to_string());
            let page_metrics = services.metrics.measure_string(cx, None, &page)?;
            let label_width =
                (width - indent - page_metrics.width - services.config.toc_page_gap).max(1.0);
            let run = if entry.level <= 1 {
                InlineRun::Strong(entry.label.clone())
            } else {
                InlineRun::Plain(entry.label.clone())
            };
            let block = NestedBlock::from_pages(services.nested.typeset_runs(
                paragraph.node,
                &[run],
                Some("toc-entry"),
                label_width,
            )?)
            .with_role(TextRole::TableOfContents);
            let first_row = block.lines().into_iter().next();
            let first_height = first_row.as_ref().map_or(0.0, |row| row.height());
            ctx.ensure_room(first_height)?;

            let top = ctx.position().y;
            let first_baseline = first_row
                .as_ref()
                .and_then(|row| row.elements.iter().find_map(Element::as_text))
                .map_or(page_metrics.baseline, |text| text.y + text.baseline);
            ctx.push_content(text_element(
                left + width - page_metrics.width,
                top + first_baseline - page_metrics.baseline,
                &page,
                &style.font,
                &page_metrics,
                paragraph.node,
                TextRole::TableOfContents,
            ));
            let bottom = place_rows(ctx, &block, left + indent, top, true)?;
            ctx.set_y(bottom.max(top + first_height));
        }
        ctx.advance(style.insets.bottom);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galley::{DocumentBuilder, HeuristicMetrics, NodeStyle};

    #[test]
    fn source_math_layouter_sets_italic_run() {
        let node = DocumentBuilder::new().root();
        let style = NodeStyle::default();
        let formula = SourceMathLayouter
            .layout("  a +   b ", MeasureContext::new(node, &style), &HeuristicMetrics::new())
            .unwrap_or_default();
        assert_eq!(formula.runs.len(), 1);
        assert_eq!(formula.runs[0].text, "a + b");
        assert!(formula.runs[0].font.italic);
        assert!(formula.width > 0.0);
        assert!((formula.height - style.line_height_abs()).abs() < 1e-9);
    }

    #[test]
    fn empty_formula_is_a_math_error() {
        let node = DocumentBuilder::new().root();
        let style = NodeStyle::default();
        let err = SourceMathLayouter
            .layout("   ", MeasureContext::new(node, &style), &HeuristicMetrics::new())
            .err();
        assert!(matches!(err, Some(TypesetError::Math { .. })));
    }

    #[test]
    fn long_code_lines_wrap_at_width() {
        let node = DocumentBuilder::new().root();
        let mut style = NodeStyle::default();
        style.font = FontSpec::new("monospace", 4.0);
        let metrics = HeuristicMetrics::new();
        let cx = MeasureContext::new(node, &style);
        // 0.6 em per monospace glyph: 2.4 units per char, 10 chars per 24 units.
        let segments = CodeHandler::segments("0123456789abcdefghij\t", 24.0, &metrics, cx)
            .unwrap_or_default();
        let texts: Vec<&str> = segments.iter().map(|(text, _)| text.as_str()).collect();
        assert_eq!(texts, vec!["0123456789", "abcdefghij"]);
        let short = CodeHandler::segments("", 24.0, &metrics, cx).unwrap_or_default();
        assert_eq!(short.len(), 1);
        assert_eq!(short[0].0, "");
    }

    /// Two units per char, one unit less for the glyph following `preceding`.
    struct KernedMetrics;

    impl FontMetrics for KernedMetrics {
        fn measure_string(
            &self,
            cx: MeasureContext<'_>,
            preceding: Option<char>,
            text: &str,
        ) -> Result<StringMetrics, galley::MeasurementError> {
            let kern = if preceding.is_some() && !text.is_empty() { 1.0 } else { 0.0 };
            Ok(StringMetrics {
                width: 2.0 * text.chars().count() as f64 - kern,
                height: cx.style.font.size,
                baseline: cx.style.font.size * 0.8,
                font_size: cx.style.font.size,
                ..StringMetrics::default()
            })
        }
    }

    #[test]
    fn wrapped_code_segment_starts_without_kerning() {
        let node = DocumentBuilder::new().root();
        let style = NodeStyle::default();
        let cx = MeasureContext::new(node, &style);
        // a=2 b=3 c=4 | d=2 e=3 f=4 | g=2 h=3
        let segments = CodeHandler::segments("abcdefgh", 4.5, &KernedMetrics, cx)
            .unwrap_or_default();
        let texts: Vec<&str> = segments.iter().map(|(text, _)| text.as_str()).collect();
        assert_eq!(texts, vec!["abc", "def", "gh"]);
        assert_eq!(segments[0].1.width, 6.0);
    }

    #[test]
    fn numbered_caption_gets_bold_prefix() {
        let mut spec = galley::ImageSpec::new("a.png");
        spec.caption = Some("A cat".to_string());
        let image = ImageParagraph {
            spec,
            number: Some(3),
        };
        let runs = ImageHandler::caption_runs(&image, "Figure").unwrap_or_default();
        assert_eq!(
            runs,
            vec![
                InlineRun::Strong("Figure 3".to_string()),
                InlineRun::Plain(": A cat".to_string()),
            ]
        );
        let plain = ImageParagraph {
            number: None,
            ..image
        };
        assert_eq!(
            ImageHandler::caption_runs(&plain, "Figure"),
            Some(vec![InlineRun::Plain("A cat".to_string())])
        );
    }
}
