use core::fmt;

use crate::document::NodeId;

/// Processing phase where a conversion error originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorPhase {
    /// Reading an interchange form into a [`Document`](crate::Document).
    Load,
    /// Resolving styles for a node.
    Style,
    /// Measuring text through a [`FontMetrics`](crate::FontMetrics) supplier.
    Measure,
    /// Turning document nodes into paragraphs and items.
    Convert,
}

impl fmt::Display for ErrorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Style => "style",
            Self::Measure => "measure",
            Self::Convert => "convert",
        };
        f.write_str(name)
    }
}

/// Failure reported by a font metrics supplier.
///
/// Measurement failures are never retried: the same text measured at another
/// quality level fails the same way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeasurementError {
    /// Font family that could not measure the text.
    pub family: Box<str>,
    /// Text that was being measured.
    pub text: Box<str>,
    /// Supplier-provided reason.
    pub reason: Box<str>,
}

impl MeasurementError {
    /// Create a measurement error.
    pub fn new(
        family: impl Into<String>,
        text: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            family: family.into().into_boxed_str(),
            text: text.into().into_boxed_str(),
            reason: reason.into().into_boxed_str(),
        }
    }
}

impl fmt::Display for MeasurementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot measure {:?} with font family '{}': {}",
            self.text, self.family, self.reason
        )
    }
}

impl std::error::Error for MeasurementError {}

/// Structured error for document loading and paragraph conversion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertError {
    /// Processing phase where this error originated.
    pub phase: ErrorPhase,
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: Box<str>,
    /// Node being processed when the error occurred.
    pub node: Option<NodeId>,
    /// Optional source context (element name, collaborator name).
    pub source: Option<Box<str>>,
    /// Optional byte offset into a loaded interchange document.
    pub offset: Option<usize>,
    /// Underlying measurement failure, when there was one.
    pub measurement: Option<Box<MeasurementError>>,
}

impl ConvertError {
    /// Create an error in the [`ErrorPhase::Convert`] phase.
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            phase: ErrorPhase::Convert,
            code,
            message: message.into().into_boxed_str(),
            node: None,
            source: None,
            offset: None,
            measurement: None,
        }
    }

    /// Replace the phase.
    pub fn with_phase(mut self, phase: ErrorPhase) -> Self {
        self.phase = phase;
        self
    }

    /// Attach the node being processed.
    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    /// Attach source context.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into().into_boxed_str());
        self
    }

    /// Attach a byte offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.phase, self.code, self.message)?;
        if let Some(node) = self.node {
            write!(f, " [node={}]", node)?;
        }
        if let Some(source) = self.source.as_deref() {
            write!(f, " [source={}]", source)?;
        }
        if let Some(offset) = self.offset {
            write!(f, " [offset={}]", offset)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.measurement
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

impl From<MeasurementError> for ConvertError {
    fn from(err: MeasurementError) -> Self {
        let mut out = ConvertError::new(
            "CONVERT_MEASUREMENT_FAILED",
            format!("could not convert the document into line-breaking items: {}", err),
        )
        .with_phase(ErrorPhase::Measure)
        .with_source(err.family.to_string());
        out.measurement = Some(Box::new(err));
        out
    }
}
