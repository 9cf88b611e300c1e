use galley::{FontSpec, NodeId};
use serde::{Deserialize, Serialize};

/// Iterator over merged page layers in content/footnote/chrome order.
pub struct MergedElementIter<'a> {
    inner: core::iter::Chain<
        core::iter::Chain<core::slice::Iter<'a, Element>, core::slice::Iter<'a, Element>>,
        core::slice::Iter<'a, Element>,
    >,
}

impl<'a> Iterator for MergedElementIter<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Semantic role of a positioned text run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextRole {
    /// Running body text.
    #[default]
    Body,
    /// Superscript footnote reference in the body.
    FootNoteMark,
    /// Footnote number or body at the page bottom.
    FootNote,
    /// Figure caption.
    Caption,
    /// Code listing line.
    Code,
    /// Table cell text.
    TableCell,
    /// Display math.
    Math,
    /// Table-of-contents entry.
    TableOfContents,
    /// Header or footer text.
    Chrome,
}

/// Positioned text run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextElement {
    /// Left x.
    pub x: f64,
    /// Top y of the run box.
    pub y: f64,
    /// Advance width.
    pub width: f64,
    /// Run height.
    pub height: f64,
    /// Baseline offset from `y`.
    pub baseline: f64,
    /// Content.
    pub text: String,
    /// Font the run is set in.
    pub font: FontSpec,
    /// Source node.
    pub node: NodeId,
    /// Semantic role.
    pub role: TextRole,
}

/// Positioned image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageElement {
    /// Left x.
    pub x: f64,
    /// Top y.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
    /// Image source reference.
    pub src: String,
    /// Source node.
    pub node: NodeId,
}

/// Horizontal rule.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleElement {
    /// Start x.
    pub x: f64,
    /// Y of the rule centre.
    pub y: f64,
    /// Length.
    pub width: f64,
    /// Stroke thickness.
    pub thickness: f64,
}

/// Positioned page content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Element {
    /// Text run.
    Text(TextElement),
    /// Image.
    Image(ImageElement),
    /// Rule.
    Rule(RuleElement),
}

impl Element {
    /// Move the element by `(dx, dy)`.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        let (x, y) = match self {
            Self::Text(text) => (&mut text.x, &mut text.y),
            Self::Image(image) => (&mut image.x, &mut image.y),
            Self::Rule(rule) => (&mut rule.x, &mut rule.y),
        };
        *x += dx;
        *y += dy;
    }

    /// Bounding box as `(x, y, width, height)`.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        match self {
            Self::Text(text) => (text.x, text.y, text.width, text.height),
            Self::Image(image) => (image.x, image.y, image.width, image.height),
            Self::Rule(rule) => (
                rule.x,
                rule.y - rule.thickness / 2.0,
                rule.width,
                rule.thickness,
            ),
        }
    }

    /// Text payload.
    pub fn as_text(&self) -> Option<&TextElement> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Per-page layout statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetrics {
    /// Text lines placed in the content layer.
    pub line_count: usize,
    /// Y reached by body content.
    pub content_bottom: f64,
    /// Height reserved for footnotes.
    pub footnote_height: f64,
    /// Quality level the page was produced at.
    pub quality: u32,
}

/// One laid-out page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based displayed page number.
    pub page_number: usize,
    /// Body content in placement order.
    pub content: Vec<Element>,
    /// Footnote area at the page bottom.
    pub footnotes: Vec<Element>,
    /// Header and footer.
    pub chrome: Vec<Element>,
    /// Layout statistics.
    pub metrics: PageMetrics,
}

impl Page {
    const INITIAL_CONTENT_CAPACITY: usize = 32;
    const INITIAL_FOOTNOTE_CAPACITY: usize = 4;
    const INITIAL_CHROME_CAPACITY: usize = 2;

    /// Create an empty page.
    pub fn new(page_number: usize) -> Self {
        Self {
            page_number,
            // Layers allocate on first push.
            content: Vec::with_capacity(0),
            footnotes: Vec::with_capacity(0),
            chrome: Vec::with_capacity(0),
            metrics: PageMetrics::default(),
        }
    }

    /// Push a content-layer element.
    pub fn push_content(&mut self, element: Element) {
        if self.content.capacity() == 0 {
            self.content.reserve(Self::INITIAL_CONTENT_CAPACITY);
        }
        self.content.push(element);
    }

    /// Push a footnote-layer element.
    pub fn push_footnote(&mut self, element: Element) {
        if self.footnotes.capacity() == 0 {
            self.footnotes.reserve(Self::INITIAL_FOOTNOTE_CAPACITY);
        }
        self.footnotes.push(element);
    }

    /// Push a chrome-layer element.
    pub fn push_chrome(&mut self, element: Element) {
        if self.chrome.capacity() == 0 {
            self.chrome.reserve(Self::INITIAL_CHROME_CAPACITY);
        }
        self.chrome.push(element);
    }

    /// Whether the content and footnote layers are empty.
    ///
    /// Chrome alone does not make a page worth emitting.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.footnotes.is_empty()
    }

    /// All elements in content, footnote, chrome order.
    pub fn elements(&self) -> MergedElementIter<'_> {
        MergedElementIter {
            inner: self
                .content
                .iter()
                .chain(self.footnotes.iter())
                .chain(self.chrome.iter()),
        }
    }

    /// Text runs across all layers.
    pub fn texts(&self) -> impl Iterator<Item = &TextElement> {
        self.elements().filter_map(Element::as_text)
    }

    /// Space-joined text of the content layer, in placement order.
    pub fn content_text(&self) -> String {
        let mut out = String::new();
        for text in self.content.iter().filter_map(Element::as_text) {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&text.text);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(x: f64, y: f64, content: &str) -> Element {
        Element::Text(TextElement {
            x,
            y,
            width: 10.0,
            height: 4.0,
            baseline: 3.0,
            text: content.to_string(),
            font: FontSpec::new("serif", 4.0),
            node: galley::DocumentBuilder::new().root(),
            role: TextRole::Body,
        })
    }

    #[test]
    fn merged_iteration_orders_layers() {
        let mut page = Page::new(1);
        page.push_chrome(text(0.0, 0.0, "chrome"));
        page.push_footnote(text(0.0, 0.0, "note"));
        page.push_content(text(0.0, 0.0, "body"));
        let order: Vec<&str> = page.texts().map(|t| t.text.as_str()).collect();
        assert_eq!(order, vec!["body", "note", "chrome"]);
        assert_eq!(page.elements().size_hint(), (3, Some(3)));
    }

    #[test]
    fn chrome_only_page_is_empty() {
        let mut page = Page::new(2);
        assert!(page.is_empty());
        page.push_chrome(text(0.0, 0.0, "header"));
        assert!(page.is_empty());
        page.push_content(text(0.0, 0.0, "body"));
        assert!(!page.is_empty());
    }

    #[test]
    fn translate_moves_bounds() {
        let mut element = text(1.0, 2.0, "x");
        element.translate(3.0, 4.0);
        assert_eq!(element.bounds(), (4.0, 6.0, 10.0, 4.0));
        let mut rule = Element::Rule(RuleElement {
            x: 0.0,
            y: 10.0,
            width: 50.0,
            thickness: 0.4,
        });
        rule.translate(0.0, -5.0);
        let (_, y, width, _) = rule.bounds();
        assert!((y - 4.8).abs() < 1e-9);
        assert_eq!(width, 50.0);
    }
}
