//! Box / Glue / Penalty items consumed by the line breaker.
//!
//! Penalty cost bands:
//!
//! | cost | meaning |
//! |---|---|
//! | `-inf` | mandatory break |
//! | `(-inf, MIN_FINITE_PENALTY]` | allowed, no cost contribution |
//! | `(MIN_FINITE_PENALTY, 0)` | bonus, encourages a break |
//! | `[0, +inf)` | discourages a break |
//! | `+inf` | break forbidden |

use crate::document::NodeId;
use crate::metrics::StringMetrics;
use crate::style::FontSpec;

/// Positive infinity, used for unbounded stretch and forbidden breaks.
pub const INFINITY: f64 = f64::INFINITY;
/// Upper bound of the cost band that contributes nothing to demerits.
pub const MIN_FINITE_PENALTY: f64 = -10_000.0;

/// Per-occurrence footnote identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FootNoteId(pub u32);

/// Measured text fragment.
#[derive(Clone, Debug, PartialEq)]
pub struct TextBox {
    /// Node the text belongs to.
    pub node: NodeId,
    /// Fragment text.
    pub text: String,
    /// Font it is set in.
    pub font: FontSpec,
    /// Measurement result.
    pub metrics: StringMetrics,
}

/// Superscript footnote reference.
#[derive(Clone, Debug, PartialEq)]
pub struct FootNoteMark {
    /// Marker node.
    pub node: NodeId,
    /// Occurrence id.
    pub footnote: FootNoteId,
    /// Displayed number.
    pub number: u32,
    /// Reduced-size font of the mark.
    pub font: FontSpec,
    /// Measurement of the number.
    pub metrics: StringMetrics,
}

/// Payload of a box.
#[derive(Clone, Debug, PartialEq)]
pub enum BoxContent {
    /// Blank space such as a first-line indent.
    Empty,
    /// Text fragment.
    Text(TextBox),
    /// Footnote reference mark.
    FootNoteMark(FootNoteMark),
}

/// Unit of the line-breaking input.
#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    /// Unbreakable content of fixed width.
    Box {
        /// Advance width.
        width: f64,
        /// What the box shows.
        content: BoxContent,
    },
    /// Flexible space; a legal break when it follows a box.
    Glue {
        /// Natural width.
        width: f64,
        /// Maximum extra width.
        stretch: f64,
        /// Maximum width reduction.
        shrink: f64,
    },
    /// Break opportunity with a cost.
    Penalty {
        /// Break cost.
        cost: f64,
        /// Width added to the line when breaking here (hyphen).
        width: f64,
        /// Flagged breaks (hyphens) are discouraged on consecutive lines.
        flagged: bool,
    },
}

impl Item {
    /// Blank box of the given width.
    pub fn empty_box(width: f64) -> Self {
        Self::Box {
            width,
            content: BoxContent::Empty,
        }
    }

    /// Box holding measured text.
    pub fn text_box(text: TextBox) -> Self {
        Self::Box {
            width: text.metrics.width,
            content: BoxContent::Text(text),
        }
    }

    /// Glue item.
    pub fn glue(width: f64, stretch: f64, shrink: f64) -> Self {
        Self::Glue {
            width,
            stretch,
            shrink,
        }
    }

    /// Penalty item.
    pub fn penalty(cost: f64, width: f64, flagged: bool) -> Self {
        Self::Penalty {
            cost,
            width,
            flagged,
        }
    }

    /// Zero-width glue that absorbs the slack of a closing line.
    pub fn fill() -> Self {
        Self::glue(0.0, INFINITY, 0.0)
    }

    /// Mandatory break.
    pub fn forced_break() -> Self {
        Self::penalty(-INFINITY, 0.0, true)
    }

    /// Natural width. Penalty widths only count when the line breaks there.
    pub fn width(&self) -> f64 {
        match self {
            Self::Box { width, .. } | Self::Glue { width, .. } => *width,
            Self::Penalty { .. } => 0.0,
        }
    }

    /// Stretchability; zero for boxes and penalties.
    pub fn stretch(&self) -> f64 {
        match self {
            Self::Glue { stretch, .. } => *stretch,
            _ => 0.0,
        }
    }

    /// Shrinkability; zero for boxes and penalties.
    pub fn shrink(&self) -> f64 {
        match self {
            Self::Glue { shrink, .. } => *shrink,
            _ => 0.0,
        }
    }

    /// Whether this is a box.
    pub fn is_box(&self) -> bool {
        matches!(self, Self::Box { .. })
    }

    /// Whether this is glue.
    pub fn is_glue(&self) -> bool {
        matches!(self, Self::Glue { .. })
    }

    /// Penalty cost, `None` for boxes and glue.
    pub fn penalty_cost(&self) -> Option<f64> {
        match self {
            Self::Penalty { cost, .. } => Some(*cost),
            _ => None,
        }
    }

    /// Width added when breaking at this penalty.
    pub fn break_width(&self) -> f64 {
        match self {
            Self::Penalty { width, .. } => *width,
            _ => 0.0,
        }
    }

    /// Mandatory break penalty.
    pub fn is_mandatory_break(&self) -> bool {
        self.penalty_cost() == Some(-INFINITY)
    }

    /// Penalty that forbids breaking.
    pub fn is_forbidden_break(&self) -> bool {
        self.penalty_cost() == Some(INFINITY)
    }

    /// Flagged penalty.
    pub fn is_flagged(&self) -> bool {
        matches!(self, Self::Penalty { flagged: true, .. })
    }

    /// Text box payload.
    pub fn as_text(&self) -> Option<&TextBox> {
        match self {
            Self::Box {
                content: BoxContent::Text(text),
                ..
            } => Some(text),
            _ => None,
        }
    }

    /// Footnote mark payload.
    pub fn as_footnote_mark(&self) -> Option<&FootNoteMark> {
        match self {
            Self::Box {
                content: BoxContent::FootNoteMark(mark),
                ..
            } => Some(mark),
            _ => None,
        }
    }
}
