use galley::{
    DocumentBuilder, EnglishHyphenator, HeuristicMetrics, Item, ParagraphConverter,
    SpacingPolicy, StyleSheet, SOFT_HYPHEN,
};
use proptest::prelude::*;

fn word() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,12}",
        "[A-Z][a-z]{2,10}[.,;]?",
        "[a-z]{2,6}-[a-z]{2,6}",
        "[a-z]{3,6}".prop_map(|w| format!("{w}{SOFT_HYPHEN}{w}")),
    ]
}

fn text() -> impl Strategy<Value = String> {
    prop::collection::vec(word(), 1..40).prop_map(|words| words.join(" "))
}

fn convert(text: &str) -> Vec<Vec<Item>> {
    let mut builder = DocumentBuilder::new();
    let block = builder.block(builder.root());
    builder.text(block, text);
    let document = builder.build();
    let styles = StyleSheet::default();
    let metrics = HeuristicMetrics::new();
    let hyphenator = EnglishHyphenator::default();
    let glue = SpacingPolicy::default();
    let mut references = document.references().clone();
    let flow = ParagraphConverter::new(&document, &styles, &metrics, &hyphenator, &glue)
        .convert(document.root(), &mut references)
        .unwrap_or_else(|e| panic!("convert: {e}"));
    flow.paragraphs()
        .filter_map(|paragraph| paragraph.as_text())
        .map(|paragraph| paragraph.items().to_vec())
        .collect()
}

proptest! {
    #[test]
    fn paragraphs_end_with_fill_and_forced_break(text in text()) {
        let paragraphs = convert(&text);
        prop_assert_eq!(paragraphs.len(), 1);
        let items = &paragraphs[0];
        prop_assert!(items.len() >= 3);
        prop_assert!(items[items.len() - 1].is_mandatory_break());
        let fill = &items[items.len() - 2];
        prop_assert!(fill.is_glue() && fill.stretch().is_infinite());
        let mandatory = items.iter().filter(|item| item.is_mandatory_break()).count();
        prop_assert_eq!(mandatory, 1);
    }

    #[test]
    fn glue_never_repeats_and_boxes_are_non_negative(text in text()) {
        for items in convert(&text) {
            for pair in items.windows(2) {
                prop_assert!(!(pair[0].is_glue() && pair[1].is_glue()));
            }
            for item in &items {
                prop_assert!(item.width() >= 0.0);
                if item.is_glue() {
                    prop_assert!(item.shrink() >= 0.0 && item.stretch() >= 0.0);
                }
            }
        }
    }

    #[test]
    fn boxes_keep_every_visible_character(text in text()) {
        let expected: String = text
            .chars()
            .filter(|ch| !ch.is_whitespace() && *ch != SOFT_HYPHEN)
            .collect();
        let mut seen = String::new();
        for items in convert(&text) {
            for item in &items {
                if let Some(text) = item.as_text() {
                    seen.extend(text.text.chars().filter(|ch| *ch != SOFT_HYPHEN));
                }
            }
        }
        prop_assert_eq!(seen, expected);
    }
}
