//! Font metrics seam and a heuristic default supplier.

use smallvec::SmallVec;

use crate::document::NodeId;
use crate::error::MeasurementError;
use crate::style::{FontSpec, NodeStyle};

/// Node and resolved style a measurement is made for.
#[derive(Clone, Copy, Debug)]
pub struct MeasureContext<'a> {
    /// Node owning the text.
    pub node: NodeId,
    /// Resolved style of that node.
    pub style: &'a NodeStyle,
}

impl<'a> MeasureContext<'a> {
    /// Pair a node with its style.
    pub fn new(node: NodeId, style: &'a NodeStyle) -> Self {
        Self { node, style }
    }

    /// Font the text is set in.
    pub fn font(&self) -> &'a FontSpec {
        &self.style.font
    }
}

/// Measured extent of a string.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StringMetrics {
    /// Advance width including kerning.
    pub width: f64,
    /// Ascent plus descent.
    pub height: f64,
    /// Distance from the top of the run to its baseline.
    pub baseline: f64,
    /// Font size used.
    pub font_size: f64,
    /// Per-glyph kerning deltas, the first relative to the preceding char.
    pub kerning_adjustments: SmallVec<[f64; 8]>,
}

impl StringMetrics {
    /// Zero-sized metrics for content that occupies no space.
    pub fn placeholder() -> Self {
        Self::default()
    }
}

/// Text measurement supplier.
pub trait FontMetrics {
    /// Measure `text`, optionally kerned against the char that precedes it.
    fn measure_string(
        &self,
        cx: MeasureContext<'_>,
        preceding: Option<char>,
        text: &str,
    ) -> Result<StringMetrics, MeasurementError>;

    /// Natural interword space.
    fn space_width(&self, cx: MeasureContext<'_>) -> Result<f64, MeasurementError> {
        Ok(self.measure_string(cx, None, " ")?.width)
    }
}

/// Glyph-class width model usable without font files.
///
/// Widths come from a per-character em table scaled by family, weight and
/// style. A small pair table produces kerning adjustments. When constructed
/// with [`HeuristicMetrics::strict`] unknown families are rejected, which is
/// how tests exercise measurement failures.
#[derive(Clone, Debug, Default)]
pub struct HeuristicMetrics {
    known_families: Option<Vec<String>>,
}

impl HeuristicMetrics {
    /// Accept every family.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept only the listed families (case-insensitive).
    pub fn strict<I, S>(families: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            known_families: Some(
                families
                    .into_iter()
                    .map(|family| family.as_ref().to_ascii_lowercase())
                    .collect(),
            ),
        }
    }

    fn check_family(&self, font: &FontSpec, text: &str) -> Result<(), MeasurementError> {
        let Some(known) = &self.known_families else {
            return Ok(());
        };
        let family = font.family.to_ascii_lowercase();
        if known.iter().any(|candidate| *candidate == family) {
            Ok(())
        } else {
            Err(MeasurementError::new(
                font.family.as_ref(),
                text,
                "font family is not registered",
            ))
        }
    }
}

impl FontMetrics for HeuristicMetrics {
    fn measure_string(
        &self,
        cx: MeasureContext<'_>,
        preceding: Option<char>,
        text: &str,
    ) -> Result<StringMetrics, MeasurementError> {
        let font = cx.font();
        self.check_family(font, text)?;
        if !(font.size.is_finite() && font.size > 0.0) {
            return Err(MeasurementError::new(
                font.family.as_ref(),
                text,
                format!("invalid font size {}", font.size),
            ));
        }
        let mut kerning_adjustments = SmallVec::new();
        let mut previous = preceding;
        for ch in text.chars() {
            let delta = previous.map_or(0.0, |prev| kerning_pair_em(prev, ch) * font.size);
            kerning_adjustments.push(delta);
            previous = Some(ch);
        }
        let kerning: f64 = kerning_adjustments.iter().sum();
        Ok(StringMetrics {
            width: (heuristic_measure_text(text, font) + kerning).max(0.0),
            height: font.size,
            baseline: font.size * 0.78,
            font_size: font.size,
            kerning_adjustments,
        })
    }
}

fn heuristic_measure_text(text: &str, font: &FontSpec) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    let proportional = !font.is_monospace();
    let mut em_sum = 0.0f64;
    for ch in text.chars() {
        em_sum += if proportional {
            proportional_glyph_em_width(ch)
        } else {
            0.6
        };
    }

    let family = font.family.to_ascii_lowercase();
    let mut family_scale = if family.contains("sans") {
        0.99
    } else if family.contains("serif") {
        1.03
    } else {
        1.00
    };
    if font.weight >= 700 {
        family_scale += 0.03;
    }
    if font.italic {
        family_scale += 0.01;
    }
    em_sum * font.size * family_scale
}

fn proportional_glyph_em_width(ch: char) -> f64 {
    match ch {
        ' ' | '\u{00A0}' => 0.32,
        '\t' => 1.28,
        'i' | 'l' | 'I' | '|' | '!' => 0.24,
        '.' | ',' | ':' | ';' | '\'' | '"' | '`' => 0.23,
        '-' | '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' => 0.34,
        '(' | ')' | '[' | ']' | '{' | '}' => 0.30,
        'f' | 't' | 'j' | 'r' => 0.34,
        'm' | 'w' | 'M' | 'W' | '@' | '%' | '&' | '#' => 0.74,
        c if c.is_ascii_digit() => 0.52,
        c if c.is_ascii_uppercase() => 0.64,
        c if c.is_ascii_lowercase() => 0.52,
        c if c.is_whitespace() => 0.32,
        c if c.is_ascii_punctuation() => 0.42,
        _ => 0.56,
    }
}

fn kerning_pair_em(left: char, right: char) -> f64 {
    match (left, right) {
        ('A', 'V') | ('V', 'A') | ('A', 'W') | ('W', 'A') => -0.08,
        ('T', 'o') | ('T', 'a') | ('T', 'e') | ('Y', 'o') => -0.07,
        ('L', 'T') | ('P', '.') | ('F', '.') => -0.06,
        ('r', '.') | ('r', ',') => -0.03,
        _ => 0.0,
    }
}
