//! Line breaking, page assembly and orchestration for `galley`.
//!
//! [`TypesetEngine`] converts a [`galley::Document`] into paragraphs, breaks
//! text with the Knuth-Plass algorithm in [`LineBreaker`] and lays every
//! paragraph out through a [`ParagraphHandler`] onto [`Page`]s. Infeasible
//! paragraphs are retried at relaxed [`QualityLevel`]s.
//!
//! ```
//! use galley::DocumentBuilder;
//! use galley_render::TypesetEngine;
//!
//! let mut builder = DocumentBuilder::new();
//! let block = builder.block(builder.root());
//! builder.text(block, "Hello world");
//! let doc = builder.build();
//!
//! let pages = TypesetEngine::default().typeset(&doc).unwrap();
//! assert_eq!(pages.len(), 1);
//! assert_eq!(pages[0].content_text(), "Hello world");
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

pub mod line_breaking;
mod object_layout;
mod render_engine;
mod render_ir;
mod render_layout;

pub use line_breaking::{
    line_ranges, line_start_after, BreakPoint, BreakPointId, BreakingParams, DuplicatePolicy,
    Fitness, LineBreaker, LineWidths, NoFeasibleSolution,
};
pub use object_layout::{
    CodeHandler, ImageHandler, MathBox, MathHandler, MathLayouter, MathRun, SourceMathLayouter,
    TableHandler, TocHandler,
};
pub use render_engine::{
    ConfigError, QualityLevel, TypesetConfig, TypesetEngine, TypesetError, TypesetOutput,
};
pub use render_ir::{
    Element, ImageElement, MergedElementIter, Page, PageMetrics, RuleElement, TextElement,
    TextRole,
};
pub use render_layout::{
    FloatConfig, HandlerRegistry, InlineRun, LayoutOutput, LayoutServices, NestedBlock,
    NestedLine, NestedTypesetter, PageGeometry, ParagraphHandler, PlacedFootNote,
    PositionContext, TextHandler, TypesetContext,
};
