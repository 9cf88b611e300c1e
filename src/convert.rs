//! Document tree to paragraph/item conversion.
//!
//! Text is scanned one character at a time with a word buffer. Spaces close
//! the word and emit interword glue, explicit hyphens close the word and emit
//! a flagged break penalty, and every closed word is hyphenated into boxes
//! separated by flagged penalties that carry the hyphen width. Block-level
//! nodes start new paragraphs; images, code, tables, math and tables of
//! contents become paragraphs of their own kind. Explicit page breaks split
//! the output into groups.

use crate::document::{Document, DocumentNode, NodeId, NodeKind};
use crate::error::ConvertError;
use crate::hyphenation::Hyphenator;
use crate::item::{BoxContent, FootNoteId, FootNoteMark, Item, TextBox, INFINITY};
use crate::metrics::{FontMetrics, MeasureContext};
use crate::paragraph::{
    CodeParagraph, FootNoteRef, ImageParagraph, MathParagraph, Paragraph, ParagraphBody,
    ParagraphFlow, TableParagraph, TextParagraphBuilder, TocEntry, TocParagraph,
};
use crate::reference::{
    ReferenceModel, EQUATION_COUNTER, FOOTNOTE_COUNTER, IMAGE_COUNTER, SECTION_COUNTER,
    TABLE_COUNTER,
};
use crate::style::{NodeStyle, StyleLookup};

/// Interword spacing hook.
pub trait GluePolicy {
    /// Stretch and shrink of a space of natural width `space_width` that
    /// follows the character `preceding`.
    fn interword_glue(&self, space_width: f64, preceding: Option<char>) -> (f64, f64);
}

/// Proportional interword spacing with extra room after sentence ends.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpacingPolicy {
    /// Stretch as a fraction of the space width.
    pub stretch_ratio: f64,
    /// Shrink as a fraction of the space width.
    pub shrink_ratio: f64,
    /// Extra stretch fraction after `.`, `!`, `?`, `:` and `;`.
    pub sentence_stretch_bonus: f64,
    /// Multiplier applied to every stretch; raised when quality relaxes.
    pub stretch_factor: f64,
}

impl Default for SpacingPolicy {
    fn default() -> Self {
        Self {
            stretch_ratio: 0.5,
            shrink_ratio: 1.0 / 3.0,
            sentence_stretch_bonus: 0.5,
            stretch_factor: 1.0,
        }
    }
}

impl SpacingPolicy {
    /// Same policy with a different stretch multiplier.
    pub fn with_stretch_factor(mut self, factor: f64) -> Self {
        self.stretch_factor = factor;
        self
    }
}

impl GluePolicy for SpacingPolicy {
    fn interword_glue(&self, space_width: f64, preceding: Option<char>) -> (f64, f64) {
        let mut stretch = space_width * self.stretch_ratio * self.stretch_factor;
        let mut shrink = space_width * self.shrink_ratio;
        if preceding.is_some_and(|ch| matches!(ch, '.' | '!' | '?' | ':' | ';')) {
            stretch *= 1.0 + self.sentence_stretch_bonus;
            shrink *= 0.8;
        }
        (stretch, shrink)
    }
}

/// Knobs of the conversion that are not part of node styles.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvertOptions {
    /// First-line indent for nodes whose style leaves it unset.
    pub first_line_indent: f64,
    /// Skip the first-line indent right after a heading.
    pub suppress_indent_after_heading: bool,
    /// Left inset per enumeration nesting level.
    pub list_indent: f64,
    /// Fixed gap between a list marker and the item text.
    pub list_marker_gap: f64,
    /// Footnote mark size relative to the surrounding text.
    pub footnote_mark_scale: f64,
    /// Value substituted for page-number fields.
    pub page_number: Option<usize>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            first_line_indent: 10.5,
            suppress_indent_after_heading: true,
            list_indent: 6.0,
            list_marker_gap: 1.5,
            footnote_mark_scale: 0.6,
            page_number: None,
        }
    }
}

/// Converts a document subtree into a [`ParagraphFlow`].
pub struct ParagraphConverter<'a> {
    document: &'a Document,
    styles: &'a dyn StyleLookup,
    metrics: &'a dyn FontMetrics,
    hyphenator: &'a dyn Hyphenator,
    glue: &'a dyn GluePolicy,
    options: ConvertOptions,
}

struct ConvertState<'r> {
    references: &'r mut dyn ReferenceModel,
    groups: Vec<Vec<Paragraph>>,
    group: Vec<Paragraph>,
    text: Option<TextParagraphBuilder>,
    footnotes: Vec<FootNoteRef>,
    footnote_counter: u32,
    prev_char: Option<char>,
    after_heading: bool,
    list_depth: usize,
}

impl ConvertState<'_> {
    fn text_mut(&mut self, node: NodeId) -> Result<&mut TextParagraphBuilder, ConvertError> {
        self.text.as_mut().ok_or_else(|| {
            ConvertError::new("CONVERT_NO_PARAGRAPH", "no text paragraph is open").with_node(node)
        })
    }

    fn push_paragraph(&mut self, paragraph: Paragraph) {
        self.after_heading = false;
        self.group.push(paragraph);
    }

    fn close_group(&mut self) {
        if !self.group.is_empty() {
            self.groups.push(core::mem::take(&mut self.group));
        }
    }
}

impl<'a> ParagraphConverter<'a> {
    /// Converter with default options.
    pub fn new(
        document: &'a Document,
        styles: &'a dyn StyleLookup,
        metrics: &'a dyn FontMetrics,
        hyphenator: &'a dyn Hyphenator,
        glue: &'a dyn GluePolicy,
    ) -> Self {
        Self {
            document,
            styles,
            metrics,
            hyphenator,
            glue,
            options: ConvertOptions::default(),
        }
    }

    /// Replace the options.
    pub fn with_options(mut self, options: ConvertOptions) -> Self {
        self.options = options;
        self
    }

    /// Options in effect.
    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Convert the subtree rooted at `root`.
    ///
    /// Citable nodes and footnote markers are numbered through `references`.
    pub fn convert(
        &self,
        root: NodeId,
        references: &mut dyn ReferenceModel,
    ) -> Result<ParagraphFlow, ConvertError> {
        let mut st = ConvertState {
            references,
            groups: Vec::new(),
            group: Vec::new(),
            text: None,
            footnotes: Vec::new(),
            footnote_counter: 0,
            prev_char: None,
            after_heading: false,
            list_depth: 0,
        };
        self.visit(root, &mut st)?;
        self.finish_text(&mut st);
        st.close_group();
        log::trace!(
            "converted node {} into {} paragraph groups ({} footnotes)",
            root,
            st.groups.len(),
            st.footnotes.len()
        );
        Ok(ParagraphFlow {
            groups: st.groups,
            footnotes: st.footnotes,
        })
    }

    fn style(&self, node: NodeId) -> NodeStyle {
        self.styles.style(self.document, node)
    }

    fn node(&self, id: NodeId) -> Result<&'a DocumentNode, ConvertError> {
        self.document.node(id).ok_or_else(|| {
            ConvertError::new("CONVERT_UNKNOWN_NODE", "node does not belong to the document")
                .with_node(id)
        })
    }

    fn visit(&self, id: NodeId, st: &mut ConvertState<'_>) -> Result<(), ConvertError> {
        let node = self.node(id)?;
        match node.kind() {
            NodeKind::Root => self.visit_children(node, st),
            NodeKind::Block | NodeKind::Caption => {
                self.finish_text(st);
                self.register_label(node, SECTION_COUNTER, st);
                self.begin_text(id, true, st);
                self.visit_children(node, st)?;
                self.finish_text(st);
                Ok(())
            }
            NodeKind::Heading { .. } => {
                self.finish_text(st);
                self.register_label(node, SECTION_COUNTER, st);
                self.begin_text(id, false, st);
                self.visit_children(node, st)?;
                self.finish_text(st);
                st.after_heading = true;
                Ok(())
            }
            NodeKind::Enumeration { ordered } => {
                self.finish_text(st);
                st.list_depth += 1;
                let mut ordinal = 0usize;
                for &child in node.children() {
                    if matches!(self.document.kind(child), Some(NodeKind::EnumerationItem)) {
                        ordinal += 1;
                        let marker = if *ordered {
                            format!("{}.", ordinal)
                        } else {
                            "\u{2022}".to_string()
                        };
                        self.visit_item(child, marker, st)?;
                    } else {
                        self.visit(child, st)?;
                    }
                }
                self.finish_text(st);
                st.list_depth = st.list_depth.saturating_sub(1);
                Ok(())
            }
            NodeKind::EnumerationItem => self.visit_item(id, "\u{2022}".to_string(), st),
            NodeKind::Text(text) | NodeKind::Formatted { text, .. } => {
                if st.text.is_none() && text.trim().is_empty() {
                    return Ok(());
                }
                self.ensure_text(node, st);
                self.append_text(id, text, st)
            }
            NodeKind::PageNumber => {
                self.ensure_text(node, st);
                let number = self
                    .options
                    .page_number
                    .map_or_else(|| "#".to_string(), |page| page.to_string());
                self.append_text(id, &number, st)
            }
            NodeKind::LineBreak => {
                let Some(text) = st.text.as_mut() else {
                    return Ok(());
                };
                if text.has_content() && !text.last().is_some_and(Item::is_mandatory_break) {
                    text.pop_trailing_glue();
                    text.push(Item::fill());
                    text.push(Item::forced_break());
                }
                st.prev_char = None;
                Ok(())
            }
            NodeKind::FootNote { key } => self.append_footnote(id, key, st),
            NodeKind::Image(spec) => {
                self.finish_text(st);
                let number = if spec.caption.is_some() || node.label().is_some() {
                    let counter = spec.counter.as_deref().unwrap_or(IMAGE_COUNTER);
                    Some(st.references.set_reference_number(counter, id))
                } else {
                    None
                };
                st.push_paragraph(Paragraph {
                    node: id,
                    body: ParagraphBody::Image(ImageParagraph {
                        spec: spec.clone(),
                        number,
                    }),
                });
                Ok(())
            }
            NodeKind::Code { text, language } => {
                self.finish_text(st);
                st.push_paragraph(Paragraph {
                    node: id,
                    body: ParagraphBody::Code(CodeParagraph {
                        lines: text.lines().map(str::to_string).collect(),
                        language: language.clone(),
                    }),
                });
                Ok(())
            }
            NodeKind::Table(spec) => {
                self.finish_text(st);
                let number = self.register_label(node, TABLE_COUNTER, st);
                st.push_paragraph(Paragraph {
                    node: id,
                    body: ParagraphBody::Table(TableParagraph {
                        rows: spec.rows.clone(),
                        header_rows: spec.header_rows,
                        number,
                    }),
                });
                Ok(())
            }
            NodeKind::Math { expression } => {
                self.finish_text(st);
                let number = self.register_label(node, EQUATION_COUNTER, st);
                st.push_paragraph(Paragraph {
                    node: id,
                    body: ParagraphBody::Math(MathParagraph {
                        expression: expression.clone(),
                        number,
                    }),
                });
                Ok(())
            }
            NodeKind::TableOfContents => {
                self.finish_text(st);
                st.push_paragraph(Paragraph {
                    node: id,
                    body: ParagraphBody::TableOfContents(TocParagraph {
                        entries: self.toc_entries(),
                    }),
                });
                Ok(())
            }
            NodeKind::PageBreak => {
                self.finish_text(st);
                st.close_group();
                Ok(())
            }
        }
    }

    fn visit_children(
        &self,
        node: &DocumentNode,
        st: &mut ConvertState<'_>,
    ) -> Result<(), ConvertError> {
        for &child in node.children() {
            self.visit(child, st)?;
        }
        Ok(())
    }

    fn visit_item(
        &self,
        id: NodeId,
        marker: String,
        st: &mut ConvertState<'_>,
    ) -> Result<(), ConvertError> {
        self.finish_text(st);
        let node = self.node(id)?;
        let style = self.style(id);
        let metrics = self
            .metrics
            .measure_string(MeasureContext::new(id, &style), None, &marker)?;
        let mut text = TextParagraphBuilder::new(id);
        text.set_left_inset(st.list_depth as f64 * self.options.list_indent);
        text.push(Item::text_box(TextBox {
            node: id,
            text: marker,
            font: style.font.clone(),
            metrics,
        }));
        // Keep the marker on the same line as the first word.
        text.push(Item::penalty(INFINITY, 0.0, false));
        text.push(Item::glue(self.options.list_marker_gap, 0.0, 0.0));
        st.text = Some(text);
        st.after_heading = false;
        st.prev_char = None;
        self.visit_children(node, st)?;
        self.finish_text(st);
        Ok(())
    }

    fn begin_text(&self, owner: NodeId, indent: bool, st: &mut ConvertState<'_>) {
        let style = self.style(owner);
        let mut text = TextParagraphBuilder::new(owner);
        text.set_left_inset(st.list_depth as f64 * self.options.list_indent);
        let suppressed = st.after_heading && self.options.suppress_indent_after_heading;
        let width = if indent && !suppressed {
            style
                .first_line_indent
                .unwrap_or(self.options.first_line_indent)
        } else {
            0.0
        };
        text.push(Item::empty_box(width.max(0.0)));
        st.text = Some(text);
        st.after_heading = false;
        st.prev_char = None;
    }

    fn ensure_text(&self, node: &DocumentNode, st: &mut ConvertState<'_>) {
        if st.text.is_none() {
            self.begin_text(node.parent().unwrap_or(node.id()), true, st);
        }
    }

    fn finish_text(&self, st: &mut ConvertState<'_>) {
        if let Some(text) = st.text.take() {
            if text.has_content() {
                st.push_paragraph(text.finish());
            }
        }
        st.prev_char = None;
    }

    fn register_label(
        &self,
        node: &DocumentNode,
        counter: &str,
        st: &mut ConvertState<'_>,
    ) -> Option<u32> {
        node.label()
            .map(|_| st.references.set_reference_number(counter, node.id()))
    }

    fn append_text(
        &self,
        id: NodeId,
        text: &str,
        st: &mut ConvertState<'_>,
    ) -> Result<(), ConvertError> {
        let style = self.style(id);
        let cx = MeasureContext::new(id, &style);
        let space_width = self.metrics.space_width(cx)?;
        let mut word = String::new();
        for ch in text.chars() {
            if ch.is_whitespace() && ch != '\u{00A0}' {
                let preceding = word.chars().last().or(st.prev_char);
                self.flush_word(cx, &mut word, st)?;
                let paragraph = st.text_mut(id)?;
                if !paragraph.has_content() || paragraph.last().is_some_and(Item::is_glue) {
                    continue;
                }
                let (stretch, shrink) = self.glue.interword_glue(space_width, preceding);
                paragraph.push(Item::glue(space_width, stretch, shrink));
                st.prev_char = None;
            } else if ch == '-' {
                word.push(ch);
                self.flush_word(cx, &mut word, st)?;
                let cost = self.hyphenator.explicit_hyphen_penalty();
                st.text_mut(id)?.push(Item::penalty(cost, 0.0, true));
            } else {
                word.push(ch);
            }
        }
        self.flush_word(cx, &mut word, st)
    }

    fn flush_word(
        &self,
        cx: MeasureContext<'_>,
        word: &mut String,
        st: &mut ConvertState<'_>,
    ) -> Result<(), ConvertError> {
        if word.is_empty() {
            return Ok(());
        }
        let parts = self.hyphenator.hyphenate(word);
        word.clear();
        let hyphen_width = if parts.len() > 1 {
            self.metrics.measure_string(cx, None, "-")?.width
        } else {
            0.0
        };
        let last = parts.len().saturating_sub(1);
        for (index, part) in parts.into_iter().enumerate() {
            if part.text.is_empty() {
                continue;
            }
            let metrics = self.metrics.measure_string(cx, st.prev_char, &part.text)?;
            st.prev_char = part.text.chars().last();
            let paragraph = st.text_mut(cx.node)?;
            paragraph.push(Item::text_box(TextBox {
                node: cx.node,
                text: part.text,
                font: cx.style.font.clone(),
                metrics,
            }));
            if index < last {
                paragraph.push(Item::penalty(part.penalty, hyphen_width, true));
            }
        }
        Ok(())
    }

    fn append_footnote(
        &self,
        id: NodeId,
        key: &str,
        st: &mut ConvertState<'_>,
    ) -> Result<(), ConvertError> {
        if st.text.is_none() {
            return Err(ConvertError::new(
                "CONVERT_FOOTNOTE_CONTEXT",
                "footnote marker must appear inside a text paragraph",
            )
            .with_node(id)
            .with_source("footnote"));
        }
        let body = self.document.footnote(key).ok_or_else(|| {
            ConvertError::new(
                "CONVERT_FOOTNOTE_MISSING",
                format!("no footnote body registered under key '{}'", key),
            )
            .with_node(id)
        })?;
        let number = st.references.set_reference_number(FOOTNOTE_COUNTER, id);
        st.footnote_counter += 1;
        let footnote = FootNoteId(st.footnote_counter);

        let mut style = self.style(id);
        style.font = style.font.scaled(self.options.footnote_mark_scale);
        let label = number.to_string();
        let metrics =
            self.metrics
                .measure_string(MeasureContext::new(id, &style), st.prev_char, &label)?;

        let paragraph = st.text_mut(id)?;
        paragraph.pop_trailing_glue();
        paragraph.push(Item::Box {
            width: metrics.width,
            content: BoxContent::FootNoteMark(FootNoteMark {
                node: id,
                footnote,
                number,
                font: style.font,
                metrics,
            }),
        });
        st.prev_char = None;
        st.footnotes.push(FootNoteRef {
            id: footnote,
            number,
            marker: id,
            body,
        });
        Ok(())
    }

    fn toc_entries(&self) -> Vec<TocEntry> {
        self.document
            .descendants(self.document.root())
            .filter_map(|id| match self.document.kind(id) {
                Some(NodeKind::Heading { level }) => Some(TocEntry {
                    target: id,
                    label: self.document.text_content(id),
                    level: *level,
                }),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentBuilder, Emphasis, ImageSpec};
    use crate::error::{ErrorPhase, MeasurementError};
    use crate::hyphenation::{EnglishHyphenator, NoHyphenation};
    use crate::metrics::StringMetrics;
    use crate::reference::ReferenceTable;
    use crate::style::StyleSheet;

    /// Every char is one unit wide.
    struct UnitMetrics;

    impl FontMetrics for UnitMetrics {
        fn measure_string(
            &self,
            cx: MeasureContext<'_>,
            _preceding: Option<char>,
            text: &str,
        ) -> Result<StringMetrics, MeasurementError> {
            if cx.style.font.family.as_ref() == "broken" {
                return Err(MeasurementError::new("broken", text, "no such font"));
            }
            Ok(StringMetrics {
                width: text.chars().count() as f64,
                height: cx.style.font.size,
                baseline: cx.style.font.size * 0.8,
                font_size: cx.style.font.size,
                kerning_adjustments: Default::default(),
            })
        }
    }

    fn convert_with(
        doc: &Document,
        hyphenator: &dyn Hyphenator,
    ) -> Result<(ParagraphFlow, ReferenceTable), ConvertError> {
        let styles = StyleSheet::default();
        let glue = SpacingPolicy::default();
        let mut references = doc.references().clone();
        let flow = ParagraphConverter::new(doc, &styles, &UnitMetrics, hyphenator, &glue)
            .convert(doc.root(), &mut references)?;
        Ok((flow, references))
    }

    fn texts(items: &[Item]) -> Vec<String> {
        items
            .iter()
            .filter_map(|item| item.as_text().map(|text| text.text.clone()))
            .collect()
    }

    #[test]
    fn four_words_produce_boxes_glue_and_closing_items() {
        let mut builder = DocumentBuilder::new();
        let block = builder.block(builder.root());
        builder.text(block, "one two three four");
        let doc = builder.build();

        let (flow, _) = convert_with(&doc, &NoHyphenation).unwrap();
        let paragraph = flow.paragraphs().next().unwrap().as_text().unwrap();
        let items = paragraph.items();
        assert_eq!(items.len(), 10);
        assert!(matches!(items[0], Item::Box { content: BoxContent::Empty, width } if width == 10.5));
        assert_eq!(texts(items), vec!["one", "two", "three", "four"]);
        assert!(items[2].is_glue() && items[4].is_glue() && items[6].is_glue());
        assert!(items[8].is_glue() && items[8].stretch().is_infinite());
        assert!(items[9].is_mandatory_break());
    }

    #[test]
    fn explicit_hyphen_emits_one_flagged_penalty() {
        let mut builder = DocumentBuilder::new();
        let block = builder.block(builder.root());
        builder.text(block, "well-known");
        let doc = builder.build();

        let (flow, _) = convert_with(&doc, &NoHyphenation).unwrap();
        let items = flow.paragraphs().next().unwrap().as_text().unwrap().items();
        assert_eq!(texts(items), vec!["well-", "known"]);
        let penalties: Vec<&Item> = items[..items.len() - 1]
            .iter()
            .filter(|item| item.penalty_cost().is_some())
            .collect();
        assert_eq!(penalties.len(), 1);
        assert!(penalties[0].is_flagged());
        assert_eq!(penalties[0].break_width(), 0.0);
        assert_eq!(penalties[0].penalty_cost(), Some(NoHyphenation.explicit_hyphen_penalty()));
        assert!(items[1].as_text().is_some() && items[2].penalty_cost().is_some());
    }

    #[test]
    fn hyphenated_parts_are_separated_by_hyphen_width_penalties() {
        let mut builder = DocumentBuilder::new();
        let block = builder.block(builder.root());
        builder.text(block, "typesetting");
        let doc = builder.build();

        let (flow, _) = convert_with(&doc, &EnglishHyphenator::default()).unwrap();
        let items = flow.paragraphs().next().unwrap().as_text().unwrap().items();
        assert_eq!(texts(items), vec!["type", "set", "ting"]);
        let hyphen_breaks: Vec<&Item> = items
            .iter()
            .filter(|item| item.is_flagged() && !item.is_mandatory_break())
            .collect();
        assert_eq!(hyphen_breaks.len(), 2);
        assert!(hyphen_breaks.iter().all(|item| item.break_width() == 1.0));
    }

    #[test]
    fn repeated_and_leading_spaces_collapse() {
        let mut builder = DocumentBuilder::new();
        let block = builder.block(builder.root());
        builder.text(block, "   a    b  ");
        let doc = builder.build();

        let (flow, _) = convert_with(&doc, &NoHyphenation).unwrap();
        let items = flow.paragraphs().next().unwrap().as_text().unwrap().items();
        let glue_count = items.iter().filter(|item| item.is_glue()).count();
        // One interword glue plus the closing fill.
        assert_eq!(glue_count, 2);
    }

    #[test]
    fn interword_glue_stretches_more_after_sentence_end() {
        let policy = SpacingPolicy::default();
        let (plain, _) = policy.interword_glue(3.0, Some('a'));
        let (sentence, _) = policy.interword_glue(3.0, Some('.'));
        assert!(sentence > plain);
        let (relaxed, _) = policy.with_stretch_factor(3.0).interword_glue(3.0, Some('a'));
        assert!((relaxed - plain * 3.0).abs() < 1e-9);
    }

    #[test]
    fn heading_suppresses_indent_of_next_paragraph() {
        let mut builder = DocumentBuilder::new();
        let heading = builder.heading(builder.root(), 1);
        builder.text(heading, "Intro");
        let first = builder.block(builder.root());
        builder.text(first, "after heading");
        let second = builder.block(builder.root());
        builder.text(second, "indented");
        let doc = builder.build();

        let (flow, _) = convert_with(&doc, &NoHyphenation).unwrap();
        let indents: Vec<f64> = flow
            .paragraphs()
            .map(|p| p.as_text().unwrap().items()[0].width())
            .collect();
        assert_eq!(indents, vec![0.0, 0.0, 10.5]);
    }

    #[test]
    fn footnote_outside_text_paragraph_is_rejected() {
        let mut builder = DocumentBuilder::new();
        let root = builder.root();
        builder.footnote(root);
        let doc = builder.build();

        let err = convert_with(&doc, &NoHyphenation).unwrap_err();
        assert_eq!(err.code, "CONVERT_FOOTNOTE_CONTEXT");
    }

    #[test]
    fn footnote_mark_replaces_trailing_glue() {
        let mut builder = DocumentBuilder::new();
        let block = builder.block(builder.root());
        builder.text(block, "see this ");
        let nodes = builder.footnote(block);
        builder.text(nodes.body, "the note");
        builder.text(block, " and more");
        let doc = builder.build();

        let (flow, references) = convert_with(&doc, &NoHyphenation).unwrap();
        let items = flow.paragraphs().next().unwrap().as_text().unwrap().items();
        let mark_index = items
            .iter()
            .position(|item| item.as_footnote_mark().is_some())
            .unwrap();
        assert_eq!(items[mark_index - 1].as_text().map(|t| t.text.as_str()), Some("this"));
        assert_eq!(flow.footnotes.len(), 1);
        assert_eq!(flow.footnotes[0].body, nodes.body);
        assert_eq!(flow.footnotes[0].number, 1);
        assert_eq!(references.reference_number(nodes.marker), Some(1));
        let mark = items[mark_index].as_footnote_mark().unwrap();
        assert!(mark.font.size < 4.0);
    }

    #[test]
    fn captioned_images_are_numbered_in_order() {
        let mut builder = DocumentBuilder::new();
        let root = builder.root();
        let mut first = ImageSpec::new("a.png");
        first.caption = Some("First".into());
        let mut second = ImageSpec::new("b.png");
        second.caption = Some("Second".into());
        builder.append(root, NodeKind::Image(ImageSpec::new("plain.png")));
        let a = builder.append(root, NodeKind::Image(first));
        let b = builder.append(root, NodeKind::Image(second));
        let doc = builder.build();

        let (flow, references) = convert_with(&doc, &NoHyphenation).unwrap();
        let numbers: Vec<Option<u32>> = flow
            .paragraphs()
            .map(|p| match &p.body {
                ParagraphBody::Image(image) => image.number,
                _ => None,
            })
            .collect();
        assert_eq!(numbers, vec![None, Some(1), Some(2)]);
        assert_eq!(references.reference_number(a), Some(1));
        assert_eq!(references.reference_number(b), Some(2));
    }

    #[test]
    fn page_breaks_split_groups() {
        let mut builder = DocumentBuilder::new();
        let root = builder.root();
        let a = builder.block(root);
        builder.text(a, "first");
        builder.append(root, NodeKind::PageBreak);
        builder.append(root, NodeKind::PageBreak);
        let b = builder.block(root);
        builder.text(b, "second");
        let doc = builder.build();

        let (flow, _) = convert_with(&doc, &NoHyphenation).unwrap();
        assert_eq!(flow.groups.len(), 2);
        assert_eq!(flow.groups[0][0].node, a);
        assert_eq!(flow.groups[1][0].node, b);
    }

    #[test]
    fn measurement_failures_abort_conversion() {
        let mut builder = DocumentBuilder::new();
        let block = builder.block(builder.root());
        builder.set_class(block, "broken-font");
        builder.text(block, "text");
        let doc = builder.build();
        let styles = StyleSheet::default().with_class(
            "broken-font",
            crate::style::StyleOverride::default().family("broken"),
        );
        let glue = SpacingPolicy::default();
        let mut references = ReferenceTable::default();

        let err = ParagraphConverter::new(&doc, &styles, &UnitMetrics, &NoHyphenation, &glue)
            .convert(doc.root(), &mut references)
            .unwrap_err();
        assert_eq!(err.phase, ErrorPhase::Measure);
    }

    #[test]
    fn ordered_list_items_get_numbered_markers_and_inset() {
        let mut builder = DocumentBuilder::new();
        let list = builder.append(builder.root(), NodeKind::Enumeration { ordered: true });
        for text in ["alpha", "beta"] {
            let item = builder.append(list, NodeKind::EnumerationItem);
            builder.text(item, text);
        }
        let doc = builder.build();

        let (flow, _) = convert_with(&doc, &NoHyphenation).unwrap();
        let paragraphs: Vec<_> = flow.paragraphs().map(|p| p.as_text().unwrap()).collect();
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(texts(paragraphs[1].items())[0], "2.");
        assert_eq!(paragraphs[0].left_inset(), 6.0);
        assert!(paragraphs[0].items()[1].is_forbidden_break());
    }

    #[test]
    fn line_break_inserts_forced_break_once() {
        let mut builder = DocumentBuilder::new();
        let block = builder.block(builder.root());
        builder.text(block, "first");
        builder.append(block, NodeKind::LineBreak);
        builder.append(block, NodeKind::LineBreak);
        builder.formatted(block, Emphasis::Strong, "second");
        let doc = builder.build();

        let (flow, _) = convert_with(&doc, &NoHyphenation).unwrap();
        let items = flow.paragraphs().next().unwrap().as_text().unwrap().items();
        let forced = items.iter().filter(|item| item.is_mandatory_break()).count();
        assert_eq!(forced, 2);
        let bold = items.iter().filter_map(Item::as_text).last().unwrap();
        assert_eq!(bold.font.weight, 700);
    }

    #[test]
    fn toc_lists_headings_in_document_order() {
        let mut builder = DocumentBuilder::new();
        let root = builder.root();
        builder.append(root, NodeKind::TableOfContents);
        let h1 = builder.heading(root, 1);
        builder.text(h1, "Start");
        let h2 = builder.heading(root, 2);
        builder.text(h2, "Detail");
        let doc = builder.build();

        let (flow, _) = convert_with(&doc, &NoHyphenation).unwrap();
        let ParagraphBody::TableOfContents(toc) = &flow.groups[0][0].body else {
            panic!("expected a table of contents first");
        };
        let labels: Vec<(&str, u8)> = toc
            .entries
            .iter()
            .map(|entry| (entry.label.as_str(), entry.level))
            .collect();
        assert_eq!(labels, vec![("Start", 1), ("Detail", 2)]);
    }
}
