//! Small XML vocabulary loaded into a [`Document`].
//!
//! ```xml
//! <document>
//!   <header pages="2-"><page-number/></header>
//!   <heading level="1" label="intro">Introduction</heading>
//!   <p>Plain, <em>emphasized</em> and <strong>bold</strong> text<footnote>A note.</footnote>.</p>
//!   <list ordered="true"><item>first</item><item>second</item></list>
//!   <image src="fig.png" width="0.5" align="left" float="true" caption="A figure"/>
//!   <codeblock lang="rust">fn main() {}</codeblock>
//!   <table header-rows="1"><row><cell>a</cell><cell>b</cell></row></table>
//!   <math label="eq">E = mc^2</math>
//!   <toc/><pagebreak/>
//! </document>
//! ```
//!
//! Whitespace in running text collapses to single spaces; code and math keep
//! their text verbatim.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::document::{
    Document, DocumentBuilder, Emphasis, ImageSpec, NodeId, NodeKind, PageRange, TableSpec,
};
use crate::error::{ConvertError, ErrorPhase};
use crate::style::{Alignment, Size};

enum Frame {
    Container(NodeId),
    Inline(Emphasis),
    Code {
        language: Option<String>,
        label: Option<String>,
        text: String,
    },
    Math {
        label: Option<String>,
        text: String,
    },
    Table {
        spec: TableSpec,
        label: Option<String>,
    },
    Row,
    Cell(String),
    /// Element whose text content is dropped.
    Skip,
}

enum TextTarget {
    Node(NodeId),
    Capture(usize),
}

struct Attrs(Vec<(String, String)>);

impl Attrs {
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some("true" | "yes" | "1"))
    }
}

struct Loader<'x> {
    reader: Reader<&'x [u8]>,
    builder: DocumentBuilder,
    stack: Vec<Frame>,
    pending: String,
}

/// Parse an XML document into a [`Document`].
pub fn parse_document(xml: &str) -> Result<Document, ConvertError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(false);
    let builder = DocumentBuilder::new();
    let root = builder.root();
    let mut loader = Loader {
        reader,
        builder,
        stack: vec![Frame::Container(root)],
        pending: String::new(),
    };
    loader.run()?;
    let document = loader.builder.build();
    log::debug!("loaded XML document with {} nodes", document.len());
    Ok(document)
}

impl Loader<'_> {
    fn offset(&self) -> usize {
        usize::try_from(self.reader.buffer_position()).unwrap_or(usize::MAX)
    }

    fn error(&self, code: &'static str, message: impl Into<String>) -> ConvertError {
        ConvertError::new(code, message)
            .with_phase(ErrorPhase::Load)
            .with_offset(self.offset())
    }

    fn run(&mut self) -> Result<(), ConvertError> {
        let mut buf = Vec::with_capacity(64);
        let mut entity_buf = String::with_capacity(16);
        loop {
            match self.reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let (tag, attrs) = self.decode_start(&e)?;
                    self.flush_text()?;
                    self.open(&tag, attrs, false)?;
                }
                Ok(Event::Empty(e)) => {
                    let (tag, attrs) = self.decode_start(&e)?;
                    self.flush_text()?;
                    self.open(&tag, attrs, true)?;
                }
                Ok(Event::End(e)) => {
                    let tag = self.decode_name(e.name().as_ref())?;
                    self.flush_text()?;
                    self.close(&tag)?;
                }
                Ok(Event::Text(e)) => {
                    let text = e.decode().map_err(|err| {
                        self.error("LOAD_DECODE_ERROR", format!("text decode: {:?}", err))
                    })?;
                    self.pending.push_str(&text);
                }
                Ok(Event::CData(e)) => {
                    let text = self.reader.decoder().decode(&e).map_err(|err| {
                        self.error("LOAD_DECODE_ERROR", format!("cdata decode: {:?}", err))
                    })?;
                    self.pending.push_str(&text);
                }
                Ok(Event::GeneralRef(e)) => {
                    let name = e.decode().map_err(|err| {
                        self.error("LOAD_DECODE_ERROR", format!("entity decode: {:?}", err))
                    })?;
                    entity_buf.clear();
                    entity_buf.push('&');
                    entity_buf.push_str(&name);
                    entity_buf.push(';');
                    let resolved = quick_xml::escape::unescape(&entity_buf).map_err(|err| {
                        self.error("LOAD_DECODE_ERROR", format!("entity unescape: {:?}", err))
                    })?;
                    self.pending.push_str(&resolved);
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    return Err(self
                        .error("LOAD_XML_ERROR", format!("{:?}", err))
                        .with_source("xml tokenizer"));
                }
            }
            buf.clear();
        }
        self.flush_text()?;
        if self.stack.len() > 1 {
            return Err(self.error("LOAD_UNCLOSED_ELEMENT", "document ended inside an element"));
        }
        Ok(())
    }

    fn decode_name(&self, raw: &[u8]) -> Result<String, ConvertError> {
        let decoded = self.reader.decoder().decode(raw).map_err(|err| {
            self.error("LOAD_DECODE_ERROR", format!("tag name decode: {:?}", err))
        })?;
        Ok(decoded.to_ascii_lowercase())
    }

    fn decode_start(&self, e: &BytesStart<'_>) -> Result<(String, Attrs), ConvertError> {
        let tag = self.decode_name(e.name().as_ref())?;
        let mut attrs = Vec::new();
        for attr in e.attributes().flatten() {
            let Ok(key) = self.reader.decoder().decode(attr.key.as_ref()) else {
                continue;
            };
            let Ok(raw) = self.reader.decoder().decode(&attr.value) else {
                continue;
            };
            let value = quick_xml::escape::unescape(&raw)
                .map(|value| value.into_owned())
                .unwrap_or_else(|_| raw.to_string());
            attrs.push((key.to_ascii_lowercase(), value));
        }
        Ok((tag, Attrs(attrs)))
    }

    fn container(&self) -> Option<NodeId> {
        self.stack.iter().rev().find_map(|frame| match frame {
            Frame::Container(node) => Some(*node),
            _ => None,
        })
    }

    fn require_container(&self, tag: &str) -> Result<NodeId, ConvertError> {
        match self.stack.last() {
            Some(Frame::Container(node)) => Ok(*node),
            Some(Frame::Inline(_)) => self
                .container()
                .ok_or_else(|| self.error("LOAD_MISPLACED_ELEMENT", "no enclosing block")),
            _ => Err(self
                .error(
                    "LOAD_MISPLACED_ELEMENT",
                    format!("<{}> is not allowed here", tag),
                )
                .with_source(tag.to_string())),
        }
    }

    fn open(&mut self, tag: &str, attrs: Attrs, empty: bool) -> Result<(), ConvertError> {
        match tag {
            "document" => {
                let root = self.builder.root();
                self.push_or_close(Frame::Container(root), empty);
                Ok(())
            }
            "p" | "heading" | "list" | "item" => {
                let parent = self.require_container(tag)?;
                let kind = match tag {
                    "p" => NodeKind::Block,
                    "heading" => {
                        let level = attrs
                            .get("level")
                            .and_then(|level| level.parse::<u8>().ok())
                            .unwrap_or(1)
                            .clamp(1, 6);
                        NodeKind::Heading { level }
                    }
                    "list" => NodeKind::Enumeration {
                        ordered: attrs.flag("ordered"),
                    },
                    _ => NodeKind::EnumerationItem,
                };
                let node = self.builder.append(parent, kind);
                self.apply_common(node, &attrs);
                self.push_or_close(Frame::Container(node), empty);
                Ok(())
            }
            "em" | "strong" | "code" => {
                self.require_container(tag)?;
                let emphasis = match tag {
                    "em" => Emphasis::Emphasis,
                    "strong" => Emphasis::Strong,
                    _ => Emphasis::Code,
                };
                self.push_or_close(Frame::Inline(emphasis), empty);
                Ok(())
            }
            "footnote" => {
                let parent = self.require_container(tag)?;
                let nodes = self.builder.footnote(parent);
                self.push_or_close(Frame::Container(nodes.body), empty);
                Ok(())
            }
            "header" | "footer" => {
                let range = match attrs.get("pages") {
                    Some(pages) => PageRange::parse(pages).ok_or_else(|| {
                        self.error(
                            "LOAD_BAD_ATTRIBUTE",
                            format!("invalid page range '{}'", pages),
                        )
                        .with_source(tag.to_string())
                    })?,
                    None => PageRange::all(),
                };
                let node = if tag == "header" {
                    self.builder.header(range)
                } else {
                    self.builder.footer(range)
                };
                self.push_or_close(Frame::Container(node), empty);
                Ok(())
            }
            "image" => {
                let parent = self.require_container(tag)?;
                let spec = self.image_spec(&attrs)?;
                let node = self.builder.append(parent, NodeKind::Image(spec));
                self.apply_common(node, &attrs);
                self.push_or_close(Frame::Skip, empty);
                Ok(())
            }
            "codeblock" => {
                self.require_container(tag)?;
                let frame = Frame::Code {
                    language: attrs.get("lang").map(str::to_string),
                    label: attrs.get("label").map(str::to_string),
                    text: String::new(),
                };
                self.push_frame(frame, empty)
            }
            "math" => {
                self.require_container(tag)?;
                let frame = Frame::Math {
                    label: attrs.get("label").map(str::to_string),
                    text: String::new(),
                };
                self.push_frame(frame, empty)
            }
            "table" => {
                self.require_container(tag)?;
                let frame = Frame::Table {
                    spec: TableSpec {
                        rows: Vec::new(),
                        header_rows: attrs
                            .get("header-rows")
                            .and_then(|rows| rows.parse().ok())
                            .unwrap_or(0),
                    },
                    label: attrs.get("label").map(str::to_string),
                };
                self.push_frame(frame, empty)
            }
            "row" => {
                let Some(Frame::Table { spec, .. }) = self.stack.last_mut() else {
                    return Err(self.misplaced(tag));
                };
                spec.rows.push(Vec::new());
                self.push_or_close(Frame::Row, empty);
                Ok(())
            }
            "cell" => {
                if !matches!(self.stack.last(), Some(Frame::Row)) {
                    return Err(self.misplaced(tag));
                }
                self.push_frame(Frame::Cell(String::new()), empty)
            }
            "toc" | "pagebreak" | "br" | "page-number" => {
                let parent = self.require_container(tag)?;
                let kind = match tag {
                    "toc" => NodeKind::TableOfContents,
                    "pagebreak" => NodeKind::PageBreak,
                    "br" => NodeKind::LineBreak,
                    _ => NodeKind::PageNumber,
                };
                self.builder.append(parent, kind);
                self.push_or_close(Frame::Skip, empty);
                Ok(())
            }
            _ => Err(self
                .error("LOAD_UNKNOWN_ELEMENT", format!("unknown element <{}>", tag))
                .with_source(tag.to_string())),
        }
    }

    fn misplaced(&self, tag: &str) -> ConvertError {
        self.error(
            "LOAD_MISPLACED_ELEMENT",
            format!("<{}> is not allowed here", tag),
        )
        .with_source(tag.to_string())
    }

    fn push_or_close(&mut self, frame: Frame, empty: bool) {
        if !empty {
            self.stack.push(frame);
        }
    }

    /// Capture frames still produce their node when written as empty elements.
    fn push_frame(&mut self, frame: Frame, empty: bool) -> Result<(), ConvertError> {
        self.stack.push(frame);
        if empty {
            self.finish_frame()?;
        }
        Ok(())
    }

    fn close(&mut self, tag: &str) -> Result<(), ConvertError> {
        if self.stack.len() <= 1 {
            return Err(self
                .error("LOAD_UNBALANCED_ELEMENT", format!("unexpected </{}>", tag))
                .with_source(tag.to_string()));
        }
        self.finish_frame()
    }

    fn finish_frame(&mut self) -> Result<(), ConvertError> {
        let Some(frame) = self.stack.pop() else {
            return Ok(());
        };
        match frame {
            Frame::Code {
                language,
                label,
                text,
            } => {
                let parent = self.require_container("codeblock")?;
                let text = trim_code(&text);
                let node = self
                    .builder
                    .append(parent, NodeKind::Code { text, language });
                if let Some(label) = label {
                    self.builder.set_label(node, label);
                }
            }
            Frame::Math { label, text } => {
                let parent = self.require_container("math")?;
                let node = self.builder.append(
                    parent,
                    NodeKind::Math {
                        expression: text.trim().to_string(),
                    },
                );
                if let Some(label) = label {
                    self.builder.set_label(node, label);
                }
            }
            Frame::Table { spec, label } => {
                let parent = self.require_container("table")?;
                let node = self.builder.append(parent, NodeKind::Table(spec));
                if let Some(label) = label {
                    self.builder.set_label(node, label);
                }
            }
            Frame::Cell(text) => {
                let text = collapse_whitespace(&text).trim().to_string();
                let row = self.stack.iter_mut().rev().find_map(|frame| match frame {
                    Frame::Table { spec, .. } => spec.rows.last_mut(),
                    _ => None,
                });
                if let Some(row) = row {
                    row.push(text);
                }
            }
            Frame::Container(_) | Frame::Inline(_) | Frame::Row | Frame::Skip => {}
        }
        Ok(())
    }

    fn flush_text(&mut self) -> Result<(), ConvertError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let text = core::mem::take(&mut self.pending);
        let mut emphasis = None;
        let mut target = None;
        for (index, frame) in self.stack.iter().enumerate().rev() {
            match frame {
                Frame::Inline(kind) => {
                    emphasis.get_or_insert(*kind);
                }
                Frame::Container(parent) => {
                    target = Some(TextTarget::Node(*parent));
                    break;
                }
                Frame::Code { .. } | Frame::Math { .. } | Frame::Cell(_) => {
                    target = Some(TextTarget::Capture(index));
                    break;
                }
                Frame::Skip => return Ok(()),
                Frame::Table { .. } | Frame::Row => {
                    if text.trim().is_empty() {
                        return Ok(());
                    }
                    return Err(self.error(
                        "LOAD_UNEXPECTED_TEXT",
                        "text inside a table must be placed in a cell",
                    ));
                }
            }
        }
        match target {
            Some(TextTarget::Node(parent)) => {
                let text = collapse_whitespace(&text);
                match emphasis {
                    Some(emphasis) => self.builder.formatted(parent, emphasis, text),
                    None => self.builder.text(parent, text),
                };
            }
            Some(TextTarget::Capture(index)) => {
                if let Some(
                    Frame::Code { text: captured, .. }
                    | Frame::Math { text: captured, .. }
                    | Frame::Cell(captured),
                ) = self.stack.get_mut(index)
                {
                    captured.push_str(&text);
                }
            }
            None => {}
        }
        Ok(())
    }

    fn apply_common(&mut self, node: NodeId, attrs: &Attrs) {
        if let Some(label) = attrs.get("label") {
            self.builder.set_label(node, label);
        }
        if let Some(class) = attrs.get("class") {
            self.builder.set_class(node, class);
        }
    }

    fn image_spec(&self, attrs: &Attrs) -> Result<ImageSpec, ConvertError> {
        let src = attrs.get("src").ok_or_else(|| {
            self.error("LOAD_MISSING_ATTRIBUTE", "<image> requires a src attribute")
                .with_source("image")
        })?;
        let mut spec = ImageSpec::new(src);
        if let Some(width) = attrs.get("width").and_then(|w| w.parse::<f64>().ok()) {
            if width > 0.0 && width <= 1.0 {
                spec.width_ratio = width;
            }
        }
        spec.alignment = match attrs.get("align") {
            Some("left") => Alignment::Left,
            Some("right") => Alignment::Right,
            _ => Alignment::Center,
        };
        spec.floating = attrs.flag("float");
        spec.caption = attrs.get("caption").map(str::to_string);
        spec.caption_prefix = attrs.get("prefix").map(str::to_string);
        spec.counter = attrs.get("counter").map(str::to_string);
        let pixels = |key: &str| attrs.get(key).and_then(|v| v.parse::<f64>().ok());
        if let (Some(width), Some(height)) = (pixels("px-width"), pixels("px-height")) {
            spec.intrinsic_size = Some(Size::new(width, height));
        }
        Ok(spec)
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() && ch != '\u{00A0}' {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out
}

fn trim_code(text: &str) -> String {
    let text = text.strip_prefix('\n').unwrap_or(text);
    text.trim_end().to_string()
}
