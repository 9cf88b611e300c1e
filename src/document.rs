//! Arena-backed document tree.
//!
//! Nodes are addressed by [`NodeId`] and never removed. Header, footer and
//! footnote bodies are detached subtrees (no parent) registered on the
//! document; body content hangs off [`Document::root`].

use core::fmt;
use std::collections::BTreeMap;

use crate::reference::ReferenceTable;
use crate::style::{Alignment, Size};

/// Dense index of a node inside its [`Document`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(u32);

impl NodeId {
    /// Arena slot of this id.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or(u32::MAX))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Inline emphasis of a formatted text run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Emphasis {
    /// Bold.
    Strong,
    /// Italic.
    Emphasis,
    /// Inline code.
    Code,
}

/// Block image description.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageSpec {
    /// Image source reference, passed through to the output untouched.
    pub src: String,
    /// Intrinsic pixel size, used for the aspect ratio.
    pub intrinsic_size: Option<Size>,
    /// Fraction of the line width the image occupies.
    pub width_ratio: f64,
    /// Horizontal placement.
    pub alignment: Alignment,
    /// Let text flow beside the image. Centered images never float.
    pub floating: bool,
    /// Caption text.
    pub caption: Option<String>,
    /// Caption prefix override ("Figure", "Abbildung", ...).
    pub caption_prefix: Option<String>,
    /// Reference counter override; defaults to `"image"`.
    pub counter: Option<String>,
}

impl ImageSpec {
    /// Full-width centered image.
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            intrinsic_size: None,
            width_ratio: 1.0,
            alignment: Alignment::Center,
            floating: false,
            caption: None,
            caption_prefix: None,
            counter: None,
        }
    }
}

/// Simple table of text cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableSpec {
    /// Rows of cell texts; rows may be ragged.
    pub rows: Vec<Vec<String>>,
    /// Leading rows rendered as header rows.
    pub header_rows: usize,
}

/// Node variants.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// Document root.
    Root,
    /// Paragraph-level block.
    Block,
    /// Section heading.
    Heading {
        /// 1-based level.
        level: u8,
    },
    /// Caption block produced for nested typesetting.
    Caption,
    /// List container.
    Enumeration {
        /// Numbered instead of bulleted.
        ordered: bool,
    },
    /// List entry.
    EnumerationItem,
    /// Plain text run.
    Text(String),
    /// Emphasized text run.
    Formatted {
        /// Kind of emphasis.
        emphasis: Emphasis,
        /// Run text.
        text: String,
    },
    /// Forced line break inside a paragraph.
    LineBreak,
    /// Field replaced with the current page number (headers, footers).
    PageNumber,
    /// Footnote marker; the body is registered on the document under `key`.
    FootNote {
        /// Footnote body key.
        key: String,
    },
    /// Block image.
    Image(ImageSpec),
    /// Code listing.
    Code {
        /// Source text with explicit newlines.
        text: String,
        /// Optional language tag.
        language: Option<String>,
    },
    /// Table.
    Table(TableSpec),
    /// Display math.
    Math {
        /// Expression source handed to the math layouter.
        expression: String,
    },
    /// Table of contents placeholder.
    TableOfContents,
    /// Explicit page break.
    PageBreak,
}

impl NodeKind {
    /// Key used by [`StyleSheet`](crate::StyleSheet) kind rules.
    pub fn style_key(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Block => "block",
            Self::Heading { level } => match level {
                0 | 1 => "h1",
                2 => "h2",
                3 => "h3",
                4 => "h4",
                5 => "h5",
                _ => "h6",
            },
            Self::Caption => "caption",
            Self::Enumeration { .. } => "list",
            Self::EnumerationItem => "item",
            Self::Text(_) => "text",
            Self::Formatted { emphasis, .. } => match emphasis {
                Emphasis::Strong => "strong",
                Emphasis::Emphasis => "em",
                Emphasis::Code => "code-span",
            },
            Self::LineBreak => "br",
            Self::PageNumber => "page-number",
            Self::FootNote { .. } => "footnote",
            Self::Image(_) => "image",
            Self::Code { .. } => "code",
            Self::Table(_) => "table",
            Self::Math { .. } => "math",
            Self::TableOfContents => "toc",
            Self::PageBreak => "pagebreak",
        }
    }

    /// Inline text carried by the node, if any.
    pub fn inline_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) | Self::Formatted { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// One node of the tree.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentNode {
    id: NodeId,
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    label: Option<String>,
    class: Option<String>,
}

impl DocumentNode {
    /// Node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Node variant.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Parent, `None` for the root and detached subtrees.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in document order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Cross-reference label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Style class.
    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }
}

/// Inclusive 1-based page range; `last == None` is open-ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRange {
    /// First page in the range.
    pub first: usize,
    /// Last page in the range.
    pub last: Option<usize>,
}

impl PageRange {
    /// Every page.
    pub const fn all() -> Self {
        Self {
            first: 1,
            last: None,
        }
    }

    /// `first` and every page after it.
    pub const fn from(first: usize) -> Self {
        Self { first, last: None }
    }

    /// Closed range.
    pub const fn between(first: usize, last: usize) -> Self {
        Self {
            first,
            last: Some(last),
        }
    }

    /// Whether `page` falls inside the range.
    pub fn contains(self, page: usize) -> bool {
        page >= self.first && self.last.is_none_or(|last| page <= last)
    }

    /// Parse `"3"`, `"2-"`, `"1-4"` or `"*"`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text == "*" || text.is_empty() {
            return Some(Self::all());
        }
        match text.split_once('-') {
            None => {
                let page = text.parse().ok()?;
                Some(Self::between(page, page))
            }
            Some((first, last)) => {
                let first = first.trim().parse().ok()?;
                let last = last.trim();
                if last.is_empty() {
                    Some(Self::from(first))
                } else {
                    let last = last.parse().ok()?;
                    (last >= first).then_some(Self::between(first, last))
                }
            }
        }
    }
}

/// Header or footer content bound to a page range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageSection {
    /// Pages the section applies to.
    pub range: PageRange,
    /// Detached block holding the content.
    pub node: NodeId,
}

/// Immutable document tree plus its detached sections.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    nodes: Vec<DocumentNode>,
    root: NodeId,
    headers: Vec<PageSection>,
    footers: Vec<PageSection>,
    footnotes: BTreeMap<String, NodeId>,
    references: ReferenceTable,
}

impl Document {
    /// Root of the body content.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Option<&DocumentNode> {
        self.nodes.get(id.index())
    }

    /// Node variant, `None` for foreign ids.
    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.node(id).map(DocumentNode::kind)
    }

    /// Children of a node; empty for foreign ids.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], DocumentNode::children)
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; a document holds at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Registered headers in registration order.
    pub fn headers(&self) -> &[PageSection] {
        &self.headers
    }

    /// Registered footers in registration order.
    pub fn footers(&self) -> &[PageSection] {
        &self.footers
    }

    /// First header whose range contains `page`.
    pub fn header_for(&self, page: usize) -> Option<NodeId> {
        section_for(&self.headers, page)
    }

    /// First footer whose range contains `page`.
    pub fn footer_for(&self, page: usize) -> Option<NodeId> {
        section_for(&self.footers, page)
    }

    /// Footnote body registered under `key`.
    pub fn footnote(&self, key: &str) -> Option<NodeId> {
        self.footnotes.get(key).copied()
    }

    /// Reference numbers assigned while building the document.
    pub fn references(&self) -> &ReferenceTable {
        &self.references
    }

    /// Pre-order walk of the subtree rooted at `id`.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            document: self,
            stack: vec![id],
        }
    }

    /// Whether the body contains a table of contents.
    pub fn has_table_of_contents(&self) -> bool {
        self.descendants(self.root)
            .any(|id| matches!(self.kind(id), Some(NodeKind::TableOfContents)))
    }

    /// Concatenated inline text of a subtree, whitespace collapsed.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let Some(text) = self.kind(node).and_then(NodeKind::inline_text) {
                for word in text.split_whitespace() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(word);
                }
            }
        }
        out
    }
}

impl core::ops::Index<NodeId> for Document {
    type Output = DocumentNode;

    fn index(&self, id: NodeId) -> &DocumentNode {
        &self.nodes[id.index()]
    }
}

fn section_for(sections: &[PageSection], page: usize) -> Option<NodeId> {
    sections
        .iter()
        .find(|section| section.range.contains(page))
        .map(|section| section.node)
}

/// Pre-order iterator returned by [`Document::descendants`].
pub struct Descendants<'a> {
    document: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.document.children(id).iter().rev().copied());
        Some(id)
    }
}

/// Marker and body created by [`DocumentBuilder::footnote`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FootNoteNodes {
    /// Inline marker node.
    pub marker: NodeId,
    /// Detached body block.
    pub body: NodeId,
}

/// Incremental constructor for [`Document`].
#[derive(Clone, Debug)]
pub struct DocumentBuilder {
    nodes: Vec<DocumentNode>,
    headers: Vec<PageSection>,
    footers: Vec<PageSection>,
    footnotes: BTreeMap<String, NodeId>,
    references: ReferenceTable,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuilder {
    /// Builder holding only the root node.
    pub fn new() -> Self {
        let mut builder = Self {
            nodes: Vec::with_capacity(32),
            headers: Vec::new(),
            footers: Vec::new(),
            footnotes: BTreeMap::new(),
            references: ReferenceTable::default(),
        };
        builder.push_node(NodeKind::Root, None);
        builder
    }

    /// Root of the body content.
    pub fn root(&self) -> NodeId {
        NodeId::from_index(0)
    }

    fn push_node(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(DocumentNode {
            id,
            kind,
            parent,
            children: Vec::new(),
            label: None,
            class: None,
        });
        if let Some(parent) = parent.and_then(|parent| self.nodes.get_mut(parent.index())) {
            parent.children.push(id);
        }
        id
    }

    /// Append a child of any kind.
    pub fn append(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        self.push_node(kind, Some(parent))
    }

    /// Append a paragraph block.
    pub fn block(&mut self, parent: NodeId) -> NodeId {
        self.append(parent, NodeKind::Block)
    }

    /// Append a heading.
    pub fn heading(&mut self, parent: NodeId, level: u8) -> NodeId {
        self.append(parent, NodeKind::Heading { level })
    }

    /// Append a plain text run.
    pub fn text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        self.append(parent, NodeKind::Text(text.into()))
    }

    /// Append an emphasized text run.
    pub fn formatted(
        &mut self,
        parent: NodeId,
        emphasis: Emphasis,
        text: impl Into<String>,
    ) -> NodeId {
        self.append(
            parent,
            NodeKind::Formatted {
                emphasis,
                text: text.into(),
            },
        )
    }

    /// Append a footnote marker and create its detached body block.
    pub fn footnote(&mut self, parent: NodeId) -> FootNoteNodes {
        let key = format!("fn{}", self.footnotes.len() + 1);
        let body = self.push_node(NodeKind::Block, None);
        self.set_class(body, "footnote-body");
        self.footnotes.insert(key.clone(), body);
        let marker = self.append(parent, NodeKind::FootNote { key });
        FootNoteNodes { marker, body }
    }

    /// Create a detached header block shown on `range`.
    pub fn header(&mut self, range: PageRange) -> NodeId {
        let node = self.push_node(NodeKind::Block, None);
        self.set_class(node, "header");
        self.headers.push(PageSection { range, node });
        node
    }

    /// Create a detached footer block shown on `range`.
    pub fn footer(&mut self, range: PageRange) -> NodeId {
        let node = self.push_node(NodeKind::Block, None);
        self.set_class(node, "footer");
        self.footers.push(PageSection { range, node });
        node
    }

    /// Attach a cross-reference label.
    pub fn set_label(&mut self, node: NodeId, label: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(node.index()) {
            node.label = Some(label.into());
        }
    }

    /// Attach a style class.
    pub fn set_class(&mut self, node: NodeId, class: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(node.index()) {
            node.class = Some(class.into());
        }
    }

    /// Reference table seeded into the document.
    pub fn references_mut(&mut self) -> &mut ReferenceTable {
        &mut self.references
    }

    /// Freeze the tree.
    pub fn build(self) -> Document {
        Document {
            nodes: self.nodes,
            root: NodeId::from_index(0),
            headers: self.headers,
            footers: self.footers,
            footnotes: self.footnotes,
            references: self.references,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_links_parents_and_children() {
        let mut builder = DocumentBuilder::new();
        let block = builder.block(builder.root());
        let text = builder.text(block, "hello");
        let doc = builder.build();

        assert_eq!(doc.children(doc.root()), &[block]);
        assert_eq!(doc[text].parent(), Some(block));
        assert_eq!(doc.kind(text).and_then(NodeKind::inline_text), Some("hello"));
    }

    #[test]
    fn footnote_body_is_detached_and_registered() {
        let mut builder = DocumentBuilder::new();
        let block = builder.block(builder.root());
        let nodes = builder.footnote(block);
        builder.text(nodes.body, "note");
        let doc = builder.build();

        assert_eq!(doc[nodes.body].parent(), None);
        assert_eq!(doc.footnote("fn1"), Some(nodes.body));
        assert!(matches!(doc.kind(nodes.marker), Some(NodeKind::FootNote { key }) if key == "fn1"));
        assert!(!doc.descendants(doc.root()).any(|id| id == nodes.body));
    }

    #[test]
    fn page_range_parsing_and_matching() {
        assert_eq!(PageRange::parse("2-"), Some(PageRange::from(2)));
        assert_eq!(PageRange::parse("1-3"), Some(PageRange::between(1, 3)));
        assert_eq!(PageRange::parse("4"), Some(PageRange::between(4, 4)));
        assert_eq!(PageRange::parse("*"), Some(PageRange::all()));
        assert_eq!(PageRange::parse("5-2"), None);
        assert!(PageRange::from(2).contains(9));
        assert!(!PageRange::between(1, 3).contains(4));
    }

    #[test]
    fn first_matching_section_wins() {
        let mut builder = DocumentBuilder::new();
        let first = builder.header(PageRange::between(1, 1));
        let rest = builder.header(PageRange::all());
        let doc = builder.build();

        assert_eq!(doc.header_for(1), Some(first));
        assert_eq!(doc.header_for(2), Some(rest));
        assert_eq!(doc.footer_for(1), None);
    }

    #[test]
    fn text_content_collapses_whitespace_across_runs() {
        let mut builder = DocumentBuilder::new();
        let heading = builder.heading(builder.root(), 2);
        builder.text(heading, "  Line   breaking ");
        builder.formatted(heading, Emphasis::Emphasis, "basics");
        let doc = builder.build();

        assert_eq!(doc.text_content(heading), "Line breaking basics");
    }
}
