//! Geometry primitives, resolved node styles, and the style lookup seam.
//!
//! Style cascade resolution is not this crate's business: consumers hand the
//! converter a [`StyleLookup`] and get resolved [`NodeStyle`] values back. The
//! bundled [`StyleSheet`] is a small kind/class keyed table that is enough for
//! tests, the CLI and documents without an external stylesheet.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::document::{Document, NodeId};

/// Width/height pair in document units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Size {
    /// Horizontal extent.
    pub width: f64,
    /// Vertical extent.
    pub height: f64,
}

impl Size {
    /// Create a size.
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Width divided by height, `None` for degenerate sizes.
    pub fn aspect_ratio(self) -> Option<f64> {
        if self.width > 0.0 && self.height > 0.0 {
            Some(self.width / self.height)
        } else {
            None
        }
    }
}

/// Edge insets (margins, paddings) in document units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Insets {
    /// Top edge.
    pub top: f64,
    /// Right edge.
    pub right: f64,
    /// Bottom edge.
    pub bottom: f64,
    /// Left edge.
    pub left: f64,
}

impl Insets {
    /// Same inset on every edge.
    pub const fn uniform(value: f64) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    /// Explicit edges in CSS order.
    pub const fn new(top: f64, right: f64, bottom: f64, left: f64) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    /// Sum of left and right.
    pub fn horizontal(self) -> f64 {
        self.left + self.right
    }

    /// Sum of top and bottom.
    pub fn vertical(self) -> f64 {
        self.top + self.bottom
    }
}

/// Horizontal alignment of lines and block objects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Alignment {
    /// Ragged right.
    Left,
    /// Centered.
    Center,
    /// Ragged left.
    Right,
    /// Both edges flush; glue absorbs the slack.
    #[default]
    Justify,
}

/// Font selection for a run of text.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FontSpec {
    /// Family name as understood by the metrics supplier.
    pub family: Arc<str>,
    /// CSS-like weight (400 regular, 700 bold).
    pub weight: u16,
    /// Italic flag.
    pub italic: bool,
    /// Font size in document units.
    pub size: f64,
}

impl FontSpec {
    /// Regular-weight upright font.
    pub fn new(family: &str, size: f64) -> Self {
        Self {
            family: Arc::from(family),
            weight: 400,
            italic: false,
            size,
        }
    }

    /// Same font at `factor` times the size.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            size: self.size * factor,
            ..self.clone()
        }
    }

    /// Whether the family names a fixed-pitch face.
    pub fn is_monospace(&self) -> bool {
        let family = self.family.to_ascii_lowercase();
        family.contains("mono") || family.contains("fixed") || family.contains("courier")
    }
}

/// Fully resolved style for one node.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeStyle {
    /// Font for text owned by the node.
    pub font: FontSpec,
    /// Line height as a multiple of the font size.
    pub line_height: f64,
    /// Line / object alignment.
    pub alignment: Alignment,
    /// Space around the block. Top/bottom act as space before/after.
    pub insets: Insets,
    /// First-line indent; `None` defers to the typesetter default.
    pub first_line_indent: Option<f64>,
}

impl NodeStyle {
    /// Absolute line height in document units.
    pub fn line_height_abs(&self) -> f64 {
        self.font.size * self.line_height
    }
}

impl Default for NodeStyle {
    fn default() -> Self {
        Self {
            font: FontSpec::new("serif", 4.0),
            line_height: 1.3,
            alignment: Alignment::Justify,
            insets: Insets::default(),
            first_line_indent: None,
        }
    }
}

/// Read-only style resolution for document nodes.
pub trait StyleLookup {
    /// Resolve the style that applies to `node`.
    fn style(&self, document: &Document, node: NodeId) -> NodeStyle;
}

/// Partial style applied on top of an inherited one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StyleOverride {
    /// Font family.
    pub family: Option<Arc<str>>,
    /// Font weight.
    pub weight: Option<u16>,
    /// Italic flag.
    pub italic: Option<bool>,
    /// Absolute font size.
    pub font_size: Option<f64>,
    /// Line height multiplier.
    pub line_height: Option<f64>,
    /// Alignment.
    pub alignment: Option<Alignment>,
    /// Block insets.
    pub insets: Option<Insets>,
    /// First-line indent.
    pub first_line_indent: Option<f64>,
}

impl StyleOverride {
    /// Set the family.
    pub fn family(mut self, family: &str) -> Self {
        self.family = Some(Arc::from(family));
        self
    }

    /// Set the weight.
    pub fn weight(mut self, weight: u16) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Set the italic flag.
    pub fn italic(mut self, italic: bool) -> Self {
        self.italic = Some(italic);
        self
    }

    /// Set the absolute font size.
    pub fn size(mut self, size: f64) -> Self {
        self.font_size = Some(size);
        self
    }

    /// Set the line height multiplier.
    pub fn line_height(mut self, line_height: f64) -> Self {
        self.line_height = Some(line_height);
        self
    }

    /// Set the alignment.
    pub fn align(mut self, alignment: Alignment) -> Self {
        self.alignment = Some(alignment);
        self
    }

    /// Set block insets.
    pub fn insets(mut self, insets: Insets) -> Self {
        self.insets = Some(insets);
        self
    }

    /// Set the first-line indent.
    pub fn indent(mut self, indent: f64) -> Self {
        self.first_line_indent = Some(indent);
        self
    }

    fn apply(&self, style: &mut NodeStyle) {
        if let Some(family) = &self.family {
            style.font.family = Arc::clone(family);
        }
        if let Some(weight) = self.weight {
            style.font.weight = weight;
        }
        if let Some(italic) = self.italic {
            style.font.italic = italic;
        }
        if let Some(size) = self.font_size {
            style.font.size = size;
        }
        if let Some(line_height) = self.line_height {
            style.line_height = line_height;
        }
        if let Some(alignment) = self.alignment {
            style.alignment = alignment;
        }
        if let Some(insets) = self.insets {
            style.insets = insets;
        }
        if let Some(indent) = self.first_line_indent {
            style.first_line_indent = Some(indent);
        }
    }
}

/// Kind- and class-keyed style table.
///
/// Rules apply from the outermost ancestor down to the node itself; for each
/// node the kind rule applies first, then the class rule.
#[derive(Clone, Debug, PartialEq)]
pub struct StyleSheet {
    base: NodeStyle,
    kinds: BTreeMap<&'static str, StyleOverride>,
    classes: BTreeMap<String, StyleOverride>,
}

impl StyleSheet {
    /// Sheet without any rules.
    pub fn empty(base: NodeStyle) -> Self {
        Self {
            base,
            kinds: BTreeMap::new(),
            classes: BTreeMap::new(),
        }
    }

    /// Add or replace the rule for a node kind key (see [`NodeKind::style_key`](crate::NodeKind::style_key)).
    pub fn with_kind(mut self, key: &'static str, rule: StyleOverride) -> Self {
        self.kinds.insert(key, rule);
        self
    }

    /// Add or replace the rule for a node class.
    pub fn with_class(mut self, class: impl Into<String>, rule: StyleOverride) -> Self {
        self.classes.insert(class.into(), rule);
        self
    }

    /// Base style every node starts from.
    pub fn base(&self) -> &NodeStyle {
        &self.base
    }
}

impl Default for StyleSheet {
    fn default() -> Self {
        let heading = |size: f64| {
            StyleOverride::default()
                .size(size)
                .weight(700)
                .align(Alignment::Left)
                .indent(0.0)
                .insets(Insets::new(4.0, 0.0, 2.0, 0.0))
        };
        let small_centered = StyleOverride::default()
            .size(3.2)
            .align(Alignment::Center)
            .indent(0.0);
        Self::empty(NodeStyle::default())
            .with_kind(
                "block",
                StyleOverride::default().insets(Insets::new(0.0, 0.0, 1.5, 0.0)),
            )
            .with_kind("h1", heading(7.0))
            .with_kind("h2", heading(5.6))
            .with_kind("h3", heading(4.8))
            .with_kind("h4", heading(4.2))
            .with_kind("h5", heading(4.0))
            .with_kind("h6", heading(4.0))
            .with_kind(
                "caption",
                StyleOverride::default()
                    .size(3.4)
                    .align(Alignment::Left)
                    .indent(0.0)
                    .insets(Insets::default()),
            )
            .with_kind(
                "item",
                StyleOverride::default()
                    .indent(0.0)
                    .insets(Insets::new(0.0, 0.0, 0.8, 0.0)),
            )
            .with_kind("strong", StyleOverride::default().weight(700))
            .with_kind("em", StyleOverride::default().italic(true))
            .with_kind("code-span", StyleOverride::default().family("monospace"))
            .with_kind(
                "code",
                StyleOverride::default()
                    .family("monospace")
                    .size(3.4)
                    .align(Alignment::Left)
                    .insets(Insets::new(1.5, 0.0, 1.5, 4.0)),
            )
            .with_kind("image", StyleOverride::default().insets(Insets::uniform(2.0)))
            .with_kind(
                "table",
                StyleOverride::default()
                    .size(3.6)
                    .insets(Insets::new(2.0, 0.0, 2.0, 0.0)),
            )
            .with_kind(
                "math",
                StyleOverride::default()
                    .align(Alignment::Center)
                    .insets(Insets::new(2.0, 0.0, 2.0, 0.0)),
            )
            .with_kind(
                "toc",
                StyleOverride::default()
                    .align(Alignment::Left)
                    .insets(Insets::new(0.0, 0.0, 3.0, 0.0)),
            )
            .with_class("header", small_centered.clone())
            .with_class("footer", small_centered)
            .with_class(
                "table-cell",
                StyleOverride::default()
                    .align(Alignment::Left)
                    .indent(0.0)
                    .insets(Insets::default()),
            )
            .with_class(
                "footnote-body",
                StyleOverride::default()
                    .size(3.2)
                    .indent(0.0)
                    .insets(Insets::default()),
            )
            .with_class(
                "toc-entry",
                StyleOverride::default()
                    .size(4.0)
                    .align(Alignment::Left)
                    .indent(0.0)
                    .insets(Insets::default()),
            )
    }
}

impl StyleLookup for StyleSheet {
    fn style(&self, document: &Document, node: NodeId) -> NodeStyle {
        let mut path = Vec::with_capacity(8);
        let mut cursor = document.node(node);
        while let Some(current) = cursor {
            path.push(current);
            cursor = current.parent().and_then(|parent| document.node(parent));
        }
        let mut style = self.base.clone();
        for current in path.iter().rev() {
            if let Some(rule) = self.kinds.get(current.kind().style_key()) {
                rule.apply(&mut style);
            }
            if let Some(rule) = current.class().and_then(|class| self.classes.get(class)) {
                rule.apply(&mut style);
            }
        }
        style
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentBuilder, Emphasis, NodeKind};

    #[test]
    fn heading_rule_overrides_base_size_and_weight() {
        let mut builder = DocumentBuilder::new();
        let heading = builder.heading(builder.root(), 1);
        let text = builder.text(heading, "Title");
        let doc = builder.build();
        let sheet = StyleSheet::default();

        let style = sheet.style(&doc, text);
        assert_eq!(style.font.size, 7.0);
        assert_eq!(style.font.weight, 700);
        assert_eq!(style.alignment, Alignment::Left);
    }

    #[test]
    fn formatted_rules_stack_on_inherited_style() {
        let mut builder = DocumentBuilder::new();
        let block = builder.block(builder.root());
        let strong = builder.append(
            block,
            NodeKind::Formatted {
                emphasis: Emphasis::Strong,
                text: "bold".into(),
            },
        );
        let doc = builder.build();

        let style = StyleSheet::default().style(&doc, strong);
        assert_eq!(style.font.weight, 700);
        assert_eq!(style.font.size, NodeStyle::default().font.size);
    }

    #[test]
    fn class_rule_applies_after_kind_rule() {
        let mut builder = DocumentBuilder::new();
        let header = builder.header(crate::PageRange::all());
        let doc = builder.build();

        let style = StyleSheet::default().style(&doc, header);
        assert_eq!(style.alignment, Alignment::Center);
        assert_eq!(style.font.size, 3.2);
    }

    #[test]
    fn monospace_detection_uses_family_name() {
        assert!(FontSpec::new("DejaVu Sans Mono", 3.0).is_monospace());
        assert!(!FontSpec::new("serif", 3.0).is_monospace());
    }
}
