//! Document model and paragraph preparation for the `galley` typesetter.
//!
//! A [`Document`] is an arena tree of typed nodes. [`ParagraphConverter`]
//! walks it, measures text through [`FontMetrics`], splits words through a
//! [`Hyphenator`] and emits [`Paragraph`]s made of [`Item`]s (boxes, glue
//! and penalties) ready for line breaking. Page assembly lives in the
//! `galley-render` crate.
//!
//! ```
//! use galley::{DocumentBuilder, HeuristicMetrics, NoHyphenation, ParagraphConverter,
//!     SpacingPolicy, StyleSheet};
//!
//! let mut builder = DocumentBuilder::new();
//! let block = builder.block(builder.root());
//! builder.text(block, "Hello world");
//! let doc = builder.build();
//!
//! let styles = StyleSheet::default();
//! let metrics = HeuristicMetrics::new();
//! let glue = SpacingPolicy::default();
//! let mut references = doc.references().clone();
//! let flow = ParagraphConverter::new(&doc, &styles, &metrics, &NoHyphenation, &glue)
//!     .convert(doc.root(), &mut references)
//!     .unwrap();
//! assert_eq!(flow.paragraphs().count(), 1);
//! ```

#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

pub mod convert;
pub mod document;
pub mod error;
pub mod hyphenation;
pub mod item;
pub mod metrics;
pub mod paragraph;
pub mod reference;
pub mod style;
#[cfg(feature = "xml")]
pub mod xml;

pub use convert::{ConvertOptions, GluePolicy, ParagraphConverter, SpacingPolicy};
pub use document::{
    Document, DocumentBuilder, DocumentNode, Emphasis, FootNoteNodes, ImageSpec, NodeId, NodeKind,
    PageRange, PageSection, TableSpec,
};
pub use error::{ConvertError, ErrorPhase, MeasurementError};
pub use hyphenation::{
    EnglishHyphenator, HyphenatedPart, HyphenatedWord, Hyphenator, NoHyphenation,
    SoftHyphenPolicy, SOFT_HYPHEN,
};
pub use item::{
    BoxContent, FootNoteId, FootNoteMark, Item, TextBox, INFINITY, MIN_FINITE_PENALTY,
};
pub use metrics::{FontMetrics, HeuristicMetrics, MeasureContext, StringMetrics};
pub use paragraph::{
    CodeParagraph, FootNoteRef, ImageParagraph, MathParagraph, Paragraph, ParagraphBody,
    ParagraphFlow, ParagraphGroup, ParagraphKind, TableParagraph, TextParagraph,
    TextParagraphBuilder, TocEntry, TocParagraph,
};
pub use reference::{
    ReferenceModel, ReferenceTable, EQUATION_COUNTER, FOOTNOTE_COUNTER, IMAGE_COUNTER,
    SECTION_COUNTER, TABLE_COUNTER,
};
pub use style::{
    Alignment, FontSpec, Insets, NodeStyle, Size, StyleLookup, StyleOverride, StyleSheet,
};
#[cfg(feature = "xml")]
pub use xml::parse_document;
