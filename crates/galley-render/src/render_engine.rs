use std::collections::BTreeMap;
use std::sync::Arc;

use galley::{
    ConvertError, ConvertOptions, Document, DocumentBuilder, Emphasis, EnglishHyphenator,
    FontMetrics, FootNoteRef, HeuristicMetrics, Hyphenator, Insets, MeasurementError, NodeId,
    NodeKind, ParagraphConverter, ParagraphFlow, ParagraphKind, ReferenceTable, Size,
    SpacingPolicy, StyleLookup, StyleSheet,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::line_breaking::{BreakingParams, DuplicatePolicy, NoFeasibleSolution};
use crate::object_layout::{MathLayouter, SourceMathLayouter};
use crate::render_ir::{Element, Page};
use crate::render_layout::{
    HandlerRegistry, InlineRun, LayoutOutput, LayoutServices, NestedTypesetter, PageGeometry,
    ParagraphHandler, TypesetContext,
};

/// Height of the scratch page used for nested typesetting.
const NESTED_PAGE_HEIGHT: f64 = 1.0e7;

/// Typesetting configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypesetConfig {
    /// Page size.
    pub page_size: Size,
    /// Page margins; the content area lies inside them.
    pub page_insets: Insets,
    /// First-line indent; `None` uses 5% of the page width.
    pub first_line_indent: Option<f64>,
    /// Skip the first-line indent right after a heading.
    pub suppress_indent_after_heading: bool,
    /// Left inset per list nesting level.
    pub list_indent: f64,
    /// Line-breaking tolerance at quality level 0.
    pub base_tolerance: f64,
    /// Tolerance added per quality level.
    pub tolerance_step: f64,
    /// Preferred deviation from the optimal line count.
    pub looseness: i32,
    /// Demerit added for consecutive flagged breaks.
    pub flagged_demerit: f64,
    /// Demerit added for fitness class jumps.
    pub fitness_demerit: f64,
    /// Handling of duplicate candidate breakpoints.
    pub duplicate_policy: DuplicatePolicy,
    /// Quality levels tried before giving up.
    pub max_attempts: u32,
    /// Layout passes run to settle table-of-contents page numbers.
    pub max_toc_passes: usize,
    /// Render headers and footers.
    pub allow_headers_and_footers: bool,
    /// Added to page indices to form displayed page numbers.
    pub page_number_offset: usize,
    /// Space above the footnote area, holding the separator rule.
    pub footnote_separator_gap: f64,
    /// Gap between a footnote number and its body.
    pub footnote_number_gap: f64,
    /// Distance of headers and footers from the content area.
    pub chrome_gap: f64,
    /// Cell padding of tables.
    pub table_cell_padding: f64,
    /// Indent per table-of-contents level.
    pub toc_indent: f64,
    /// Minimum gap between a TOC label and its page number.
    pub toc_page_gap: f64,
    /// Free-form string properties (`image.caption.prefix`, `table.caption.prefix`).
    pub properties: BTreeMap<String, String>,
}

impl Default for TypesetConfig {
    fn default() -> Self {
        Self {
            page_size: Size::new(210.0, 297.0),
            page_insets: Insets::uniform(30.0),
            first_line_indent: None,
            suppress_indent_after_heading: true,
            list_indent: 6.0,
            base_tolerance: 1.0,
            tolerance_step: 1.0,
            looseness: 0,
            flagged_demerit: 100.0,
            fitness_demerit: 100.0,
            duplicate_policy: DuplicatePolicy::FirstFound,
            max_attempts: 10,
            max_toc_passes: 3,
            allow_headers_and_footers: true,
            page_number_offset: 0,
            footnote_separator_gap: 3.0,
            footnote_number_gap: 1.5,
            chrome_gap: 8.0,
            table_cell_padding: 1.0,
            toc_indent: 5.0,
            toc_page_gap: 4.0,
            properties: BTreeMap::new(),
        }
    }
}

impl TypesetConfig {
    /// Defaults for a page of the given size.
    pub fn for_page(width: f64, height: f64) -> Self {
        Self {
            page_size: Size::new(width, height),
            ..Self::default()
        }
    }

    /// Replace the page margins.
    pub fn with_insets(mut self, insets: Insets) -> Self {
        self.page_insets = insets;
        self
    }

    /// Set a string property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// String property by key.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(ConfigError::Json)?;
        config.validate()?;
        Ok(config)
    }

    /// Effective first-line indent.
    pub fn first_line_indent(&self) -> f64 {
        self.first_line_indent
            .unwrap_or(self.page_size.width * 0.05)
    }

    /// Check values the layout cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };
        let geometry = PageGeometry::new(self.page_size, self.page_insets);
        if !(self.page_size.width.is_finite() && self.page_size.height.is_finite()) {
            return invalid("page_size", "must be finite");
        }
        let insets = self.page_insets;
        if [insets.top, insets.right, insets.bottom, insets.left]
            .iter()
            .any(|edge| !edge.is_finite() || *edge < 0.0)
        {
            return invalid("page_insets", "must be finite and non-negative");
        }
        if geometry.content_width() <= 0.0 || geometry.content_height() <= 0.0 {
            return invalid("page_insets", "leave no content area");
        }
        if self.max_attempts == 0 {
            return invalid("max_attempts", "must be at least 1");
        }
        if self.max_toc_passes == 0 {
            return invalid("max_toc_passes", "must be at least 1");
        }
        if self.base_tolerance.is_nan() || self.base_tolerance < 0.0 {
            return invalid("base_tolerance", "must be non-negative");
        }
        if self.tolerance_step.is_nan() || self.tolerance_step < 0.0 {
            return invalid("tolerance_step", "must be non-negative");
        }
        Ok(())
    }

    /// Line-breaking parameters for `quality`.
    pub fn breaking_params(&self, quality: QualityLevel) -> BreakingParams {
        BreakingParams {
            tolerance: quality.tolerance(self),
            looseness: self.looseness,
            flagged_demerit: self.flagged_demerit,
            fitness_demerit: self.fitness_demerit,
            duplicate_policy: self.duplicate_policy,
        }
    }

    fn convert_options(&self, page_number: Option<usize>) -> ConvertOptions {
        ConvertOptions {
            first_line_indent: self.first_line_indent(),
            suppress_indent_after_heading: self.suppress_indent_after_heading,
            list_indent: self.list_indent,
            page_number,
            ..ConvertOptions::default()
        }
    }
}

/// Invalid configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// JSON could not be parsed.
    Json(serde_json::Error),
    /// A field holds an unusable value.
    Invalid {
        /// Field name.
        field: &'static str,
        /// What is wrong.
        reason: String,
    },
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "invalid config json: {}", err),
            Self::Invalid { field, reason } => write!(f, "invalid config field {}: {}", field, reason),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

/// Relaxation step of the layout. Level 0 is the strictest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualityLevel(pub u32);

impl QualityLevel {
    /// Line-breaking tolerance at this level.
    pub fn tolerance(self, config: &TypesetConfig) -> f64 {
        config.base_tolerance + f64::from(self.0) * config.tolerance_step
    }

    /// Interword stretch multiplier at this level.
    pub fn stretch_factor(self) -> f64 {
        1.0 + f64::from(self.0)
    }
}

/// Typesetting failure.
#[derive(Debug)]
pub enum TypesetError {
    /// A paragraph cannot be broken within tolerance. Retried at a relaxed level.
    NoFeasibleSolution(NoFeasibleSolution),
    /// Text measurement failed.
    Measure(MeasurementError),
    /// Document conversion failed.
    Convert(ConvertError),
    /// No handler is registered for a paragraph kind.
    MissingHandler(ParagraphKind),
    /// A handler received a paragraph it cannot lay out.
    Precondition {
        /// Paragraph owner.
        node: NodeId,
        /// What was wrong.
        message: String,
    },
    /// Display math could not be laid out.
    Math {
        /// Owning node, when known.
        node: Option<NodeId>,
        /// What was wrong.
        message: String,
    },
    /// Every quality level failed.
    QualityExhausted {
        /// Levels tried.
        attempts: u32,
        /// Failure of the last level.
        last: Box<TypesetError>,
    },
    /// Invalid configuration.
    Config(ConfigError),
}

impl TypesetError {
    /// Handler precondition failure.
    pub fn precondition(node: NodeId, message: impl Into<String>) -> Self {
        Self::Precondition {
            node,
            message: message.into(),
        }
    }

    /// Attach `node` to errors that lack one.
    pub fn with_node(self, node: NodeId) -> Self {
        match self {
            Self::Math { node: None, message } => Self::Math {
                node: Some(node),
                message,
            },
            Self::NoFeasibleSolution(err) if err.node.is_none() => {
                Self::NoFeasibleSolution(err.with_node(node))
            }
            other => other,
        }
    }

    /// Whether a more relaxed quality level may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NoFeasibleSolution(_))
    }
}

impl core::fmt::Display for TypesetError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoFeasibleSolution(err) => write!(f, "{}", err),
            Self::Measure(err) => write!(f, "measurement failed: {}", err),
            Self::Convert(err) => write!(f, "conversion failed: {}", err),
            Self::MissingHandler(kind) => write!(f, "no handler for {} paragraphs", kind),
            Self::Precondition { node, message } => {
                write!(f, "paragraph {}: {}", node, message)
            }
            Self::Math { node, message } => match node {
                Some(node) => write!(f, "math layout failed for {}: {}", node, message),
                None => write!(f, "math layout failed: {}", message),
            },
            Self::QualityExhausted { attempts, last } => write!(
                f,
                "layout failed at all {} quality levels; last error: {}",
                attempts, last
            ),
            Self::Config(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for TypesetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NoFeasibleSolution(err) => Some(err),
            Self::Measure(err) => Some(err),
            Self::Convert(err) => Some(err),
            Self::QualityExhausted { last, .. } => Some(last.as_ref()),
            Self::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NoFeasibleSolution> for TypesetError {
    fn from(value: NoFeasibleSolution) -> Self {
        Self::NoFeasibleSolution(value)
    }
}

impl From<MeasurementError> for TypesetError {
    fn from(value: MeasurementError) -> Self {
        Self::Measure(value)
    }
}

impl From<ConvertError> for TypesetError {
    fn from(value: ConvertError) -> Self {
        Self::Convert(value)
    }
}

impl From<ConfigError> for TypesetError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// Result of [`TypesetEngine::typeset_document`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypesetOutput {
    /// Laid-out pages.
    pub pages: Vec<Page>,
    /// Page number of every heading.
    pub anchors: BTreeMap<NodeId, usize>,
    /// Quality level the final pass succeeded at.
    pub quality: QualityLevel,
    /// Layout passes run.
    pub passes: usize,
}

/// Document to pages orchestration with quality relaxation.
pub struct TypesetEngine {
    config: TypesetConfig,
    metrics: Arc<dyn FontMetrics>,
    hyphenator: Arc<dyn Hyphenator>,
    styles: Arc<dyn StyleLookup>,
    math: Arc<dyn MathLayouter>,
    handlers: HandlerRegistry,
}

impl core::fmt::Debug for TypesetEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TypesetEngine")
            .field("config", &self.config)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl Default for TypesetEngine {
    fn default() -> Self {
        Self::new(TypesetConfig::default())
    }
}

impl TypesetEngine {
    /// Engine with heuristic metrics, English hyphenation and the default style sheet.
    pub fn new(config: TypesetConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(HeuristicMetrics::new()),
            hyphenator: Arc::new(EnglishHyphenator::default()),
            styles: Arc::new(StyleSheet::default()),
            math: Arc::new(SourceMathLayouter),
            handlers: HandlerRegistry::standard(),
        }
    }

    /// Use a custom text measurer.
    pub fn with_metrics(mut self, metrics: Arc<dyn FontMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Use a custom hyphenator.
    pub fn with_hyphenator(mut self, hyphenator: Arc<dyn Hyphenator>) -> Self {
        self.hyphenator = hyphenator;
        self
    }

    /// Use a custom style lookup.
    pub fn with_styles(mut self, styles: Arc<dyn StyleLookup>) -> Self {
        self.styles = styles;
        self
    }

    /// Use a custom math layouter.
    pub fn with_math(mut self, math: Arc<dyn MathLayouter>) -> Self {
        self.math = math;
        self
    }

    /// Replace the handler registry.
    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Add or replace one paragraph handler.
    pub fn register_handler(&mut self, handler: impl ParagraphHandler + 'static) {
        self.handlers.register(handler);
    }

    /// Active configuration.
    pub fn config(&self) -> &TypesetConfig {
        &self.config
    }

    /// Lay `document` out into pages.
    pub fn typeset(&self, document: &Document) -> Result<Vec<Page>, TypesetError> {
        Ok(self.typeset_document(document)?.pages)
    }

    /// Lay `document` out, reporting the quality level and pass count.
    ///
    /// Documents with a table of contents are laid out again while heading
    /// page numbers keep moving, up to `max_toc_passes` passes.
    pub fn typeset_document(&self, document: &Document) -> Result<TypesetOutput, TypesetError> {
        self.config.validate()?;
        let passes = if document.has_table_of_contents() {
            self.config.max_toc_passes
        } else {
            1
        };
        let mut output = TypesetOutput::default();
        for pass in 1..=passes {
            let (layout, quality) = self.typeset_with_retries(document, &output.anchors)?;
            let stable = layout.anchors == output.anchors;
            output = TypesetOutput {
                pages: layout.pages,
                anchors: layout.anchors,
                quality,
                passes: pass,
            };
            if stable {
                break;
            }
            if pass < passes {
                debug!("heading pages moved in pass {}; laying out again", pass);
            } else if passes > 1 {
                warn!(
                    "table of contents did not settle after {} passes",
                    passes
                );
            }
        }
        Ok(output)
    }

    fn typeset_with_retries(
        &self,
        document: &Document,
        anchors: &BTreeMap<NodeId, usize>,
    ) -> Result<(LayoutOutput, QualityLevel), TypesetError> {
        let mut last = None;
        for level in 0..self.config.max_attempts {
            let quality = QualityLevel(level);
            let attempt = Attempt::new(self, quality);
            match attempt.run(document, anchors) {
                Ok(layout) => {
                    if level > 0 {
                        debug!("layout succeeded at relaxed quality level {}", level);
                    }
                    return Ok((layout, quality));
                }
                Err(err) if err.is_recoverable() => {
                    debug!("quality level {} failed: {}", level, err);
                    last = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        let last = last.ok_or(ConfigError::Invalid {
            field: "max_attempts",
            reason: "must be at least 1".to_string(),
        })?;
        Err(TypesetError::QualityExhausted {
            attempts: self.config.max_attempts,
            last: Box::new(last),
        })
    }
}

/// One layout attempt at a fixed quality level.
struct Attempt<'e> {
    engine: &'e TypesetEngine,
    quality: QualityLevel,
    glue: SpacingPolicy,
    breaking: BreakingParams,
}

impl<'e> Attempt<'e> {
    fn new(engine: &'e TypesetEngine, quality: QualityLevel) -> Self {
        Self {
            engine,
            quality,
            glue: SpacingPolicy::default().with_stretch_factor(quality.stretch_factor()),
            breaking: engine.config.breaking_params(quality),
        }
    }

    fn converter<'d>(
        &'d self,
        document: &'d Document,
        page_number: Option<usize>,
    ) -> ParagraphConverter<'d> {
        ParagraphConverter::new(
            document,
            self.engine.styles.as_ref(),
            self.engine.metrics.as_ref(),
            self.engine.hyphenator.as_ref(),
            &self.glue,
        )
        .with_options(self.engine.config.convert_options(page_number))
    }

    fn services<'s>(
        &'s self,
        document: &'s Document,
        footnotes: &'s [FootNoteRef],
        anchors: &'s BTreeMap<NodeId, usize>,
        chrome: bool,
    ) -> LayoutServices<'s> {
        LayoutServices {
            document,
            config: &self.engine.config,
            styles: self.engine.styles.as_ref(),
            metrics: self.engine.metrics.as_ref(),
            math: self.engine.math.as_ref(),
            nested: self,
            breaking: self.breaking,
            quality: self.quality,
            footnotes,
            previous_anchors: anchors,
            chrome,
        }
    }

    fn run(
        &self,
        document: &Document,
        anchors: &BTreeMap<NodeId, usize>,
    ) -> Result<LayoutOutput, TypesetError> {
        let config = &self.engine.config;
        let mut references = document.references().clone();
        let flow = self
            .converter(document, None)
            .convert(document.root(), &mut references)?;
        let services = self.services(
            document,
            &flow.footnotes,
            anchors,
            config.allow_headers_and_footers,
        );
        let geometry = PageGeometry::new(config.page_size, config.page_insets);
        let mut ctx = TypesetContext::new(services, geometry, 1 + config.page_number_offset);
        for group in &flow.groups {
            for paragraph in group {
                self.engine.handlers.dispatch(paragraph, &mut ctx)?;
            }
            ctx.push_page()?;
        }
        ctx.finish()
    }

    fn layout_nested(
        &self,
        document: &Document,
        flow: &ParagraphFlow,
        width: f64,
    ) -> Result<Vec<Page>, TypesetError> {
        let anchors = BTreeMap::new();
        let services = self.services(document, &[], &anchors, false);
        let geometry = PageGeometry::new(Size::new(width, NESTED_PAGE_HEIGHT), Insets::default());
        let mut ctx = TypesetContext::new(services, geometry, 1);
        for paragraph in flow.paragraphs() {
            self.engine.handlers.dispatch(paragraph, &mut ctx)?;
        }
        Ok(ctx.finish()?.pages)
    }
}

impl NestedTypesetter for Attempt<'_> {
    fn typeset_node(
        &self,
        document: &Document,
        node: NodeId,
        width: f64,
    ) -> Result<Vec<Page>, TypesetError> {
        let mut references = document.references().clone();
        let flow = self
            .converter(document, None)
            .convert(node, &mut references)?;
        self.layout_nested(document, &flow, width)
    }

    fn typeset_runs(
        &self,
        owner: NodeId,
        runs: &[InlineRun],
        class: Option<&str>,
        width: f64,
    ) -> Result<Vec<Page>, TypesetError> {
        let mut builder = DocumentBuilder::new();
        let block = builder.append(builder.root(), NodeKind::Caption);
        if let Some(class) = class {
            builder.set_class(block, class);
        }
        for run in runs {
            match run {
                InlineRun::Plain(text) => builder.text(block, text.as_str()),
                InlineRun::Strong(text) => builder.formatted(block, Emphasis::Strong, text.as_str()),
            };
        }
        let document = builder.build();
        let mut references = ReferenceTable::default();
        let flow = self
            .converter(&document, None)
            .convert(document.root(), &mut references)?;
        let mut pages = self.layout_nested(&document, &flow, width)?;
        for element in pages.iter_mut().flat_map(|page| page.content.iter_mut()) {
            match element {
                Element::Text(text) => text.node = owner,
                Element::Image(image) => image.node = owner,
                Element::Rule(_) => {}
            }
        }
        Ok(pages)
    }

    fn typeset_chrome(
        &self,
        document: &Document,
        node: NodeId,
        width: f64,
        page_number: usize,
    ) -> Result<Vec<Page>, TypesetError> {
        let mut references = document.references().clone();
        let flow = self
            .converter(document, Some(page_number))
            .convert(node, &mut references)?;
        self.layout_nested(document, &flow, width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galley::{NoHyphenation, PageRange, StringMetrics};

    fn engine(config: TypesetConfig) -> TypesetEngine {
        TypesetEngine::new(config).with_hyphenator(Arc::new(NoHyphenation))
    }

    #[test]
    fn default_config_follows_a4_layout() {
        let config = TypesetConfig::default();
        assert_eq!(config.page_size, Size::new(210.0, 297.0));
        assert_eq!(config.page_insets, Insets::uniform(30.0));
        assert!((config.first_line_indent() - 10.5).abs() < 1e-9);
        assert_eq!(config.max_attempts, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_config_fills_missing_fields_with_defaults() {
        let config = TypesetConfig::from_json_str(
            r#"{"page_size":{"width":100.0,"height":150.0},"max_attempts":3,
                "properties":{"image.caption.prefix":"Abbildung"}}"#,
        )
        .unwrap_or_default();
        assert_eq!(config.page_size, Size::new(100.0, 150.0));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_tolerance, 1.0);
        assert_eq!(config.property("image.caption.prefix"), Some("Abbildung"));
        assert!((config.first_line_indent() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(matches!(
            TypesetConfig::from_json_str("{\"max_attempts\":"),
            Err(ConfigError::Json(_))
        ));
        let no_attempts = TypesetConfig {
            max_attempts: 0,
            ..TypesetConfig::default()
        };
        assert!(matches!(
            no_attempts.validate(),
            Err(ConfigError::Invalid {
                field: "max_attempts",
                ..
            })
        ));
        let no_room = TypesetConfig::for_page(50.0, 50.0).with_insets(Insets::uniform(25.0));
        assert!(no_room.validate().is_err());
        let engine = TypesetEngine::new(no_attempts);
        let document = DocumentBuilder::new().build();
        assert!(matches!(
            engine.typeset(&document),
            Err(TypesetError::Config(_))
        ));
    }

    #[test]
    fn quality_levels_relax_tolerance_and_stretch() {
        let config = TypesetConfig {
            base_tolerance: 1.0,
            tolerance_step: 0.5,
            ..TypesetConfig::default()
        };
        assert_eq!(QualityLevel(0).tolerance(&config), 1.0);
        assert_eq!(QualityLevel(4).tolerance(&config), 3.0);
        assert_eq!(QualityLevel(0).stretch_factor(), 1.0);
        assert_eq!(QualityLevel(2).stretch_factor(), 3.0);
        assert_eq!(config.breaking_params(QualityLevel(2)).tolerance, 2.0);
    }

    #[test]
    fn only_infeasible_breaks_are_recoverable() {
        let infeasible = TypesetError::from(NoFeasibleSolution {
            items: 3,
            node: None,
            quality: Some(0),
        });
        assert!(infeasible.is_recoverable());
        assert!(!TypesetError::MissingHandler(ParagraphKind::Math).is_recoverable());
        let measure = TypesetError::from(MeasurementError::new("serif", "x", "broken"));
        assert!(!measure.is_recoverable());
        let exhausted = TypesetError::QualityExhausted {
            attempts: 2,
            last: Box::new(infeasible),
        };
        assert!(!exhausted.is_recoverable());
        assert!(exhausted.to_string().contains("all 2 quality levels"));
    }

    #[test]
    fn with_node_fills_missing_math_node() {
        let node = DocumentBuilder::new().root();
        let err = TypesetError::Math {
            node: None,
            message: "bad".to_string(),
        }
        .with_node(node);
        assert!(matches!(err, TypesetError::Math { node: Some(_), .. }));
    }

    #[test]
    fn empty_document_yields_no_pages() {
        let document = DocumentBuilder::new().build();
        let pages = TypesetEngine::default().typeset(&document).unwrap_or_default();
        assert!(pages.is_empty());
    }

    #[test]
    fn page_breaks_split_groups_and_number_pages() {
        let mut builder = DocumentBuilder::new();
        let root = builder.root();
        let first = builder.block(root);
        builder.text(first, "First page.");
        builder.append(root, NodeKind::PageBreak);
        let second = builder.block(root);
        builder.text(second, "Second page.");
        let document = builder.build();

        let config = TypesetConfig {
            page_number_offset: 4,
            ..TypesetConfig::default()
        };
        let pages = engine(config).typeset(&document).unwrap_or_default();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_number, 5);
        assert_eq!(pages[1].page_number, 6);
        assert_eq!(pages[0].content_text(), "First page.");
        assert_eq!(pages[1].content_text(), "Second page.");
    }

    #[test]
    fn footer_shows_page_number() {
        let mut builder = DocumentBuilder::new();
        let block = builder.block(builder.root());
        builder.text(block, "Body text.");
        let footer = builder.footer(PageRange::all());
        builder.text(footer, "Page ");
        builder.append(footer, NodeKind::PageNumber);
        let document = builder.build();

        let pages = engine(TypesetConfig::default())
            .typeset(&document)
            .unwrap_or_default();
        assert_eq!(pages.len(), 1);
        let chrome: Vec<&str> = pages[0]
            .chrome
            .iter()
            .filter_map(Element::as_text)
            .map(|text| text.text.as_str())
            .collect();
        assert_eq!(chrome, vec!["Page", "1"]);
        let below_content = pages[0]
            .chrome
            .iter()
            .all(|element| element.bounds().1 >= 297.0 - 30.0);
        assert!(below_content);

        let mut hidden = TypesetConfig::default();
        hidden.allow_headers_and_footers = false;
        let pages = engine(hidden).typeset(&document).unwrap_or_default();
        assert!(pages[0].chrome.is_empty());
    }

    struct FailingMetrics;

    impl FontMetrics for FailingMetrics {
        fn measure_string(
            &self,
            cx: galley::MeasureContext<'_>,
            _preceding: Option<char>,
            text: &str,
        ) -> Result<StringMetrics, MeasurementError> {
            Err(MeasurementError::new(
                cx.font().family.as_ref(),
                text,
                "no glyphs",
            ))
        }
    }

    #[test]
    fn measurement_failure_is_fatal_without_retries() {
        let mut builder = DocumentBuilder::new();
        let block = builder.block(builder.root());
        builder.text(block, "text");
        let document = builder.build();
        let engine = TypesetEngine::default().with_metrics(Arc::new(FailingMetrics));
        let err = engine.typeset(&document).err();
        assert!(matches!(err, Some(TypesetError::Convert(_))));
    }
}
