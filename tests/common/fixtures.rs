use galley::{Document, DocumentBuilder, Emphasis, ImageSpec, NodeKind, PageRange, Size, TableSpec};

const SENTENCES: &[&str] = &[
    "The compositor arranges every line so that the spacing stays even across the paragraph.",
    "Long words are split at syllable boundaries when no better break is available.",
    "A page is finished once the next line no longer fits above the footnote area.",
    "Tables, listings and formulas are placed between the paragraphs of running text.",
    "Readers rarely notice good spacing, but they always notice bad spacing.",
];

/// Running text of `sentences` sentences taken round-robin from a fixed pool.
pub fn prose(seed: usize, sentences: usize) -> String {
    (0..sentences)
        .map(|offset| SENTENCES[(seed + offset) % SENTENCES.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

/// XML book with `chapters` chapters using every element of the vocabulary.
pub fn sample_xml(chapters: usize) -> String {
    let mut xml = String::from(
        "<document><header pages=\"2-\">Sample book</header>\
         <footer>Page <page-number/></footer><toc/><pagebreak/>",
    );
    for chapter in 1..=chapters {
        xml.push_str(&format!(
            "<heading level=\"1\" label=\"ch{chapter}\">Chapter {chapter}</heading>"
        ));
        xml.push_str(&format!(
            "<p>{} <em>Emphasis</em> and <strong>weight</strong> mix freely\
             <footnote>{}</footnote>.</p>",
            prose(chapter, 4),
            prose(chapter + 1, 1)
        ));
        xml.push_str(
            "<list ordered=\"true\"><item>first point</item><item>second point</item></list>",
        );
        xml.push_str(&format!(
            "<image src=\"fig{chapter}.png\" width=\"0.5\" px-width=\"800\" px-height=\"600\" caption=\"Figure of chapter {chapter}\"/>"
        ));
        xml.push_str(&format!("<p>{}</p>", prose(chapter + 2, 6)));
        xml.push_str(
            "<codeblock lang=\"rust\">fn main() {\n\tprintln!(\"hello\");\n}</codeblock>",
        );
        xml.push_str(
            "<table header-rows=\"1\"><row><cell>Name</cell><cell>Value</cell></row>\
             <row><cell>width</cell><cell>150</cell></row></table>",
        );
        xml.push_str(&format!("<math label=\"eq{chapter}\">a^2 + b^2 = c^2</math>"));
        xml.push_str(&format!("<p>{}</p>", prose(chapter + 3, 3)));
    }
    xml.push_str("</document>");
    xml
}

/// Same content as [`sample_xml`], built without the XML loader.
pub fn sample_document(chapters: usize) -> Document {
    let mut builder = DocumentBuilder::new();
    let root = builder.root();
    let footer = builder.footer(PageRange::all());
    builder.text(footer, "Page ");
    builder.append(footer, NodeKind::PageNumber);
    for chapter in 1..=chapters {
        let heading = builder.heading(root, 1);
        builder.text(heading, format!("Chapter {chapter}"));

        let block = builder.block(root);
        builder.text(block, prose(chapter, 4));
        builder.formatted(block, Emphasis::Strong, " weight");
        let note = builder.footnote(block);
        builder.text(note.body, prose(chapter + 1, 1));

        let mut image = ImageSpec::new(format!("fig{chapter}.png"));
        image.intrinsic_size = Some(Size::new(800.0, 600.0));
        image.width_ratio = 0.5;
        image.caption = Some(format!("Figure of chapter {chapter}"));
        let image = builder.append(root, NodeKind::Image(image));
        builder.set_label(image, format!("fig{chapter}"));

        let block = builder.block(root);
        builder.text(block, prose(chapter + 2, 6));
        builder.append(
            root,
            NodeKind::Table(TableSpec {
                rows: vec![
                    vec!["Name".to_string(), "Value".to_string()],
                    vec!["width".to_string(), "150".to_string()],
                ],
                header_rows: 1,
            }),
        );
    }
    builder.build()
}
