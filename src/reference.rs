use std::collections::BTreeMap;

use crate::document::NodeId;

/// Counter used for footnote markers.
pub const FOOTNOTE_COUNTER: &str = "_footnote";
/// Default counter for captioned or labelled images.
pub const IMAGE_COUNTER: &str = "image";
/// Counter for labelled tables.
pub const TABLE_COUNTER: &str = "table";
/// Counter for labelled display math.
pub const EQUATION_COUNTER: &str = "equation";
/// Counter for labelled headings and blocks.
pub const SECTION_COUNTER: &str = "section";

/// Citation numbering shared by the converter and the handlers.
pub trait ReferenceModel {
    /// Assign the next number of `counter` to `node` and return it.
    ///
    /// Registering the same node twice returns the number it already has.
    fn set_reference_number(&mut self, counter: &str, node: NodeId) -> u32;

    /// Number previously assigned to `node`.
    fn reference_number(&self, node: NodeId) -> Option<u32>;
}

/// Per-counter sequential numbering.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceTable {
    counters: BTreeMap<String, u32>,
    numbers: BTreeMap<NodeId, u32>,
}

impl ReferenceTable {
    /// Current value of a counter (0 before first use).
    pub fn counter(&self, counter: &str) -> u32 {
        self.counters.get(counter).copied().unwrap_or(0)
    }

    /// Number of numbered nodes.
    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    /// Whether nothing has been numbered.
    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }
}

impl ReferenceModel for ReferenceTable {
    fn set_reference_number(&mut self, counter: &str, node: NodeId) -> u32 {
        if let Some(existing) = self.numbers.get(&node) {
            return *existing;
        }
        let next = self.counters.entry(counter.to_string()).or_insert(0);
        *next += 1;
        self.numbers.insert(node, *next);
        *next
    }

    fn reference_number(&self, node: NodeId) -> Option<u32> {
        self.numbers.get(&node).copied()
    }
}
