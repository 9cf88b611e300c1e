use core::fmt;

use crate::document::{ImageSpec, NodeId};
use crate::item::{FootNoteId, Item};

/// Paragraph type tag used to select a layout handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParagraphKind {
    /// Line-broken text.
    Text,
    /// Block image with optional caption.
    Image,
    /// Code listing.
    Code,
    /// Table.
    Table,
    /// Display math.
    Math,
    /// Table of contents.
    TableOfContents,
}

impl fmt::Display for ParagraphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Code => "code",
            Self::Table => "table",
            Self::Math => "math",
            Self::TableOfContents => "table-of-contents",
        };
        f.write_str(name)
    }
}

/// Frozen item sequence of a text paragraph.
///
/// Always ends with a fill glue and a mandatory break.
#[derive(Clone, Debug, PartialEq)]
pub struct TextParagraph {
    items: Vec<Item>,
    left_inset: f64,
}

impl TextParagraph {
    /// Items in order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Extra left inset applied to every line (list items).
    pub fn left_inset(&self) -> f64 {
        self.left_inset
    }
}

/// Mutable append cursor for a text paragraph.
#[derive(Clone, Debug)]
pub struct TextParagraphBuilder {
    node: NodeId,
    items: Vec<Item>,
    left_inset: f64,
    has_content: bool,
}

impl TextParagraphBuilder {
    /// Start a paragraph owned by `node`.
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            items: Vec::with_capacity(32),
            left_inset: 0.0,
            has_content: false,
        }
    }

    /// Owning node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Set the left inset applied to every line.
    pub fn set_left_inset(&mut self, inset: f64) {
        self.left_inset = inset;
    }

    /// Append an item.
    pub fn push(&mut self, item: Item) {
        self.has_content |= item.as_text().is_some() || item.as_footnote_mark().is_some();
        self.items.push(item);
    }

    /// Last appended item.
    pub fn last(&self) -> Option<&Item> {
        self.items.last()
    }

    /// Drop a trailing glue item; returns whether one was removed.
    pub fn pop_trailing_glue(&mut self) -> bool {
        if self.items.last().is_some_and(Item::is_glue) {
            self.items.pop();
            true
        } else {
            false
        }
    }

    /// Whether any box carries visible content.
    pub fn has_content(&self) -> bool {
        self.has_content
    }

    /// Close the paragraph with fill glue and a mandatory break.
    ///
    /// A paragraph already ending in a forced line break is not closed twice.
    pub fn finish(mut self) -> Paragraph {
        if !self.items.last().is_some_and(Item::is_mandatory_break) {
            self.pop_trailing_glue();
            self.items.push(Item::fill());
            self.items.push(Item::forced_break());
        }
        Paragraph {
            node: self.node,
            body: ParagraphBody::Text(TextParagraph {
                items: self.items,
                left_inset: self.left_inset,
            }),
        }
    }
}

/// Image paragraph payload.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageParagraph {
    /// Image description.
    pub spec: ImageSpec,
    /// Caption number, when the image is citable.
    pub number: Option<u32>,
}

/// Code paragraph payload.
#[derive(Clone, Debug, PartialEq)]
pub struct CodeParagraph {
    /// Source lines without terminators.
    pub lines: Vec<String>,
    /// Language tag.
    pub language: Option<String>,
}

/// Table paragraph payload.
#[derive(Clone, Debug, PartialEq)]
pub struct TableParagraph {
    /// Rows of cell texts.
    pub rows: Vec<Vec<String>>,
    /// Leading header rows.
    pub header_rows: usize,
    /// Table number, when labelled.
    pub number: Option<u32>,
}

/// Display math payload.
#[derive(Clone, Debug, PartialEq)]
pub struct MathParagraph {
    /// Expression source.
    pub expression: String,
    /// Equation number, when labelled.
    pub number: Option<u32>,
}

/// One table-of-contents line.
#[derive(Clone, Debug, PartialEq)]
pub struct TocEntry {
    /// Heading the entry points at.
    pub target: NodeId,
    /// Heading text.
    pub label: String,
    /// Heading level.
    pub level: u8,
}

/// Table-of-contents payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TocParagraph {
    /// Entries in document order.
    pub entries: Vec<TocEntry>,
}

/// Kind-specific paragraph content.
#[derive(Clone, Debug, PartialEq)]
pub enum ParagraphBody {
    /// Text.
    Text(TextParagraph),
    /// Image.
    Image(ImageParagraph),
    /// Code.
    Code(CodeParagraph),
    /// Table.
    Table(TableParagraph),
    /// Math.
    Math(MathParagraph),
    /// Table of contents.
    TableOfContents(TocParagraph),
}

/// Unit of layout dispatched to a paragraph handler.
#[derive(Clone, Debug, PartialEq)]
pub struct Paragraph {
    /// Owning node.
    pub node: NodeId,
    /// Content.
    pub body: ParagraphBody,
}

impl Paragraph {
    /// Type tag.
    pub fn kind(&self) -> ParagraphKind {
        match &self.body {
            ParagraphBody::Text(_) => ParagraphKind::Text,
            ParagraphBody::Image(_) => ParagraphKind::Image,
            ParagraphBody::Code(_) => ParagraphKind::Code,
            ParagraphBody::Table(_) => ParagraphKind::Table,
            ParagraphBody::Math(_) => ParagraphKind::Math,
            ParagraphBody::TableOfContents(_) => ParagraphKind::TableOfContents,
        }
    }

    /// Text payload.
    pub fn as_text(&self) -> Option<&TextParagraph> {
        match &self.body {
            ParagraphBody::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Footnote occurrence found during conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FootNoteRef {
    /// Occurrence id carried by the mark item.
    pub id: FootNoteId,
    /// Displayed number.
    pub number: u32,
    /// Marker node.
    pub marker: NodeId,
    /// Body block.
    pub body: NodeId,
}

/// Run of consecutive paragraphs laid out without an explicit page break.
pub type ParagraphGroup = Vec<Paragraph>;

/// Conversion output: paragraphs split at explicit page breaks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParagraphFlow {
    /// Groups in order; each group ends with a page push.
    pub groups: Vec<ParagraphGroup>,
    /// Footnote occurrences in document order.
    pub footnotes: Vec<FootNoteRef>,
}

impl ParagraphFlow {
    /// All paragraphs across groups.
    pub fn paragraphs(&self) -> impl Iterator<Item = &Paragraph> {
        self.groups.iter().flatten()
    }
}
