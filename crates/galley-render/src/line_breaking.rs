//! Knuth-Plass total-fit line breaking.
//!
//! Every legal breakpoint is evaluated against the set of active nodes;
//! feasible lines become candidate nodes stored in an arena and linked to
//! their predecessor. The cheapest terminal node is traced back to recover
//! the breaks. Prefix sums make every line measurement O(1).

use core::fmt;
use core::ops::Range;

use galley::{Item, NodeId, MIN_FINITE_PENALTY};
use serde::{Deserialize, Serialize};

/// Line tightness class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fitness {
    /// Shrunk by more than half its shrinkability.
    Tight,
    /// Adjustment ratio within `[-0.5, 0.5]`.
    #[default]
    Normal,
    /// Stretched up to its full stretchability.
    Loose,
    /// Stretched beyond its stretchability.
    VeryLoose,
}

impl Fitness {
    /// Class of a line with adjustment ratio `ratio`.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < -0.5 {
            Self::Tight
        } else if ratio <= 0.5 {
            Self::Normal
        } else if ratio <= 1.0 {
            Self::Loose
        } else {
            Self::VeryLoose
        }
    }

    fn rank(self) -> i32 {
        match self {
            Self::Tight => 0,
            Self::Normal => 1,
            Self::Loose => 2,
            Self::VeryLoose => 3,
        }
    }
}

/// Dense index into the breakpoint arena of one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BreakPointId(usize);

impl BreakPointId {
    /// Arena slot.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Chosen or candidate break.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BreakPoint {
    /// Item the line ends at.
    pub item_index: usize,
    /// 1-based number of the line ending here; 0 for the start marker.
    pub line_number: usize,
    /// Tightness of that line.
    pub fitness: Fitness,
    /// Demerits accumulated along the path up to and including this line.
    pub total_demerits: f64,
    /// Adjustment ratio of the line ending here.
    pub ratio: f64,
    /// Predecessor in the arena; `None` only for the start marker.
    pub previous: Option<BreakPointId>,
}

impl BreakPoint {
    fn start() -> Self {
        Self {
            item_index: 0,
            line_number: 0,
            fitness: Fitness::Normal,
            total_demerits: 0.0,
            ratio: 0.0,
            previous: None,
        }
    }
}

/// How candidates with an equal `(line, item, fitness)` key are merged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// Keep whichever candidate was inserted first.
    #[default]
    FirstFound,
    /// Keep the candidate with the lowest total demerits.
    LowestDemerits,
}

/// Tunables of one line-breaking run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BreakingParams {
    /// Largest acceptable adjustment ratio.
    pub tolerance: f64,
    /// Preferred line-count delta relative to the optimum.
    pub looseness: i32,
    /// Extra demerits for two consecutive flagged breaks.
    pub flagged_demerit: f64,
    /// Extra demerits for adjacent lines more than one fitness class apart.
    pub fitness_demerit: f64,
    /// Duplicate candidate handling.
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for BreakingParams {
    fn default() -> Self {
        Self {
            tolerance: 1.0,
            looseness: 0,
            flagged_demerit: 100.0,
            fitness_demerit: 100.0,
            duplicate_policy: DuplicatePolicy::FirstFound,
        }
    }
}

/// Target width of each line.
pub trait LineWidths {
    /// Width of the line with 0-based index `line`.
    fn line_width(&self, line: usize) -> f64;
}

impl LineWidths for f64 {
    fn line_width(&self, _line: usize) -> f64 {
        *self
    }
}

/// Lines beyond the slice reuse its last width.
impl LineWidths for [f64] {
    fn line_width(&self, line: usize) -> f64 {
        self.get(line)
            .or_else(|| self.last())
            .copied()
            .unwrap_or(0.0)
    }
}

impl LineWidths for Vec<f64> {
    fn line_width(&self, line: usize) -> f64 {
        self.as_slice().line_width(line)
    }
}

/// No break sequence keeps every line within tolerance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoFeasibleSolution {
    /// Items in the paragraph.
    pub items: usize,
    /// Paragraph owner, when known.
    pub node: Option<NodeId>,
    /// Quality level of the failed attempt, when known.
    pub quality: Option<u32>,
}

impl NoFeasibleSolution {
    /// Attach the paragraph owner.
    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    /// Attach the quality level.
    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = Some(quality);
        self
    }
}

impl fmt::Display for NoFeasibleSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no feasible line breaks for {} items", self.items)?;
        if let Some(node) = self.node {
            write!(f, " in paragraph {}", node)?;
        }
        if let Some(quality) = self.quality {
            write!(f, " at quality {}", quality)?;
        }
        Ok(())
    }
}

impl std::error::Error for NoFeasibleSolution {}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Totals {
    width: f64,
    stretch: f64,
    shrink: f64,
    /// Count of infinitely stretchable glues.
    fil: u32,
}

/// Prefix sums and targets shared by every evaluation of one run.
struct LineBreakingContext<'a, W: ?Sized> {
    items: &'a [Item],
    sums: Vec<Totals>,
    widths: &'a W,
}

impl<'a, W: LineWidths + ?Sized> LineBreakingContext<'a, W> {
    fn new(items: &'a [Item], widths: &'a W) -> Self {
        let mut sums = Vec::with_capacity(items.len() + 1);
        let mut running = Totals::default();
        sums.push(running);
        for item in items {
            running.width += item.width();
            let stretch = item.stretch();
            if stretch.is_infinite() {
                running.fil += 1;
            } else {
                running.stretch += stretch;
            }
            running.shrink += item.shrink();
            sums.push(running);
        }
        Self {
            items,
            sums,
            widths,
        }
    }

    fn is_legal(&self, index: usize) -> bool {
        match &self.items[index] {
            Item::Box { .. } => false,
            Item::Glue { .. } => index > 0 && self.items[index - 1].is_box(),
            Item::Penalty { cost, .. } => *cost != f64::INFINITY,
        }
    }

    fn ratio(&self, start: usize, end: usize, line: usize) -> f64 {
        let from = self.sums[start];
        let to = self.sums[end];
        let natural = to.width - from.width + self.items[end].break_width();
        let target = self.widths.line_width(line);
        if natural < target {
            if to.fil > from.fil {
                0.0
            } else {
                let stretch = to.stretch - from.stretch;
                if stretch > 0.0 {
                    (target - natural) / stretch
                } else {
                    f64::INFINITY
                }
            }
        } else if natural > target {
            let shrink = to.shrink - from.shrink;
            if shrink > 0.0 {
                (target - natural) / shrink
            } else {
                f64::NEG_INFINITY
            }
        } else {
            0.0
        }
    }
}

/// First item of the line that follows a break at `node`.
fn node_line_start(items: &[Item], node: &BreakPoint) -> usize {
    if node.previous.is_none() {
        0
    } else {
        line_start_after(items, node.item_index)
    }
}

/// First item of a line that follows a break at `break_index`.
///
/// Glue and optional penalties after a break are discarded.
pub fn line_start_after(items: &[Item], break_index: usize) -> usize {
    let mut index = break_index + 1;
    while let Some(item) = items.get(index) {
        let discardable = item.is_glue()
            || (item.penalty_cost().is_some() && !item.is_mandatory_break());
        if !discardable {
            break;
        }
        index += 1;
    }
    index
}

/// Item ranges of the lines ending at `breaks`, break items excluded.
pub fn line_ranges(items: &[Item], breaks: &[BreakPoint]) -> Vec<Range<usize>> {
    let mut ranges = Vec::with_capacity(breaks.len());
    let mut start = 0;
    for bp in breaks {
        ranges.push(start..bp.item_index.max(start));
        start = line_start_after(items, bp.item_index);
    }
    ranges
}

fn line_demerits(ratio: f64, cost: f64) -> f64 {
    let base = 1.0 + 100.0 * ratio.abs().powi(3);
    if cost >= 0.0 {
        (base + cost).powi(2)
    } else if cost > MIN_FINITE_PENALTY {
        base.powi(2) - cost.powi(2)
    } else {
        base.powi(2)
    }
}

/// Insert `candidate` into `active`, keeping it ordered by line number.
fn insert_candidate(
    arena: &mut Vec<BreakPoint>,
    active: &mut Vec<BreakPointId>,
    candidate: BreakPoint,
    policy: DuplicatePolicy,
) {
    let duplicate = active.iter().copied().find(|id| {
        let node = &arena[id.0];
        node.line_number == candidate.line_number
            && node.item_index == candidate.item_index
            && node.fitness == candidate.fitness
    });
    if let Some(existing) = duplicate {
        if policy == DuplicatePolicy::LowestDemerits
            && candidate.total_demerits < arena[existing.0].total_demerits
        {
            arena[existing.0] = candidate;
        }
        return;
    }
    let id = BreakPointId(arena.len());
    arena.push(candidate);
    let position = active
        .iter()
        .position(|other| arena[other.0].line_number > candidate.line_number)
        .unwrap_or(active.len());
    active.insert(position, id);
}

/// Optimal-fit line breaker.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LineBreaker {
    params: BreakingParams,
}

impl LineBreaker {
    /// Breaker with the given parameters.
    pub fn new(params: BreakingParams) -> Self {
        Self { params }
    }

    /// Parameters in effect.
    pub fn params(&self) -> &BreakingParams {
        &self.params
    }

    /// Choose the breaks of a paragraph.
    ///
    /// The returned breakpoints are in order, exclude the start marker, and
    /// the last one sits on the final item.
    pub fn find_breakpoints<W>(
        &self,
        items: &[Item],
        widths: &W,
    ) -> Result<Vec<BreakPoint>, NoFeasibleSolution>
    where
        W: LineWidths + ?Sized,
    {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let infeasible = || NoFeasibleSolution {
            items: items.len(),
            node: None,
            quality: None,
        };
        let cx = LineBreakingContext::new(items, widths);
        let params = &self.params;
        let mut arena = vec![BreakPoint::start()];
        let mut active = vec![BreakPointId(0)];
        let mut deactivated = Vec::new();
        let mut candidates = Vec::new();

        for index in 0..items.len() {
            if !cx.is_legal(index) {
                continue;
            }
            let item = &items[index];
            let mandatory = item.is_mandatory_break();
            let cost = item.penalty_cost().unwrap_or(0.0);
            deactivated.clear();
            candidates.clear();

            for &id in &active {
                let node = &arena[id.0];
                let start = node_line_start(items, node);
                if start > index {
                    continue;
                }
                let ratio = cx.ratio(start, index, node.line_number);
                if ratio < -1.0 || mandatory {
                    deactivated.push(id);
                }
                if (-1.0..=params.tolerance).contains(&ratio) {
                    let fitness = Fitness::from_ratio(ratio);
                    let mut demerits = line_demerits(ratio, cost);
                    let previous_flagged = node.previous.is_some()
                        && items[node.item_index].is_flagged();
                    if item.is_flagged() && previous_flagged {
                        demerits += params.flagged_demerit;
                    }
                    if (fitness.rank() - node.fitness.rank()).abs() > 1 {
                        demerits += params.fitness_demerit;
                    }
                    candidates.push(BreakPoint {
                        item_index: index,
                        line_number: node.line_number + 1,
                        fitness,
                        total_demerits: node.total_demerits + demerits,
                        ratio,
                        previous: Some(id),
                    });
                }
            }

            active.retain(|id| !deactivated.contains(id));
            for candidate in candidates.drain(..) {
                insert_candidate(&mut arena, &mut active, candidate, params.duplicate_policy);
            }
            if active.is_empty() {
                log::trace!(
                    "line breaking failed at item {} of {} (tolerance {})",
                    index,
                    items.len(),
                    params.tolerance
                );
                return Err(infeasible());
            }
        }

        let last = items.len() - 1;
        let terminal: Vec<BreakPointId> = active
            .iter()
            .copied()
            .filter(|id| arena[id.0].item_index == last && arena[id.0].previous.is_some())
            .collect();
        let best = terminal.iter().copied().reduce(|best, id| {
            if arena[id.0].total_demerits < arena[best.0].total_demerits {
                id
            } else {
                best
            }
        });
        let Some(best) = best else {
            return Err(infeasible());
        };
        let chosen = if params.looseness == 0 {
            best
        } else {
            self.apply_looseness(&arena, &terminal, best)
        };

        let mut breaks = Vec::with_capacity(arena[chosen.0].line_number);
        let mut cursor = Some(chosen);
        while let Some(id) = cursor {
            let node = arena[id.0];
            if node.previous.is_none() {
                break;
            }
            breaks.push(node);
            cursor = node.previous;
        }
        breaks.reverse();
        log::trace!(
            "broke {} items into {} lines ({} nodes explored)",
            items.len(),
            breaks.len(),
            arena.len()
        );
        Ok(breaks)
    }

    fn apply_looseness(
        &self,
        arena: &[BreakPoint],
        terminal: &[BreakPointId],
        best: BreakPointId,
    ) -> BreakPointId {
        let looseness = i64::from(self.params.looseness);
        let best_lines = arena[best.0].line_number as i64;
        let mut chosen = best;
        let mut chosen_delta = 0i64;
        for &id in terminal {
            let node = &arena[id.0];
            let delta = node.line_number as i64 - best_lines;
            let within = if looseness > 0 {
                (0..=looseness).contains(&delta)
            } else {
                (looseness..=0).contains(&delta)
            };
            if !within {
                continue;
            }
            let closer = delta.abs() > chosen_delta.abs();
            let cheaper = delta == chosen_delta
                && node.total_demerits < arena[chosen.0].total_demerits;
            if closer || cheaper {
                chosen = id;
                chosen_delta = delta;
            }
        }
        chosen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(width: f64) -> Item {
        Item::empty_box(width)
    }

    fn paragraph(words: &[f64], glue: (f64, f64, f64)) -> Vec<Item> {
        let mut items = Vec::new();
        for (i, width) in words.iter().enumerate() {
            if i > 0 {
                items.push(Item::glue(glue.0, glue.1, glue.2));
            }
            items.push(word(*width));
        }
        items.push(Item::fill());
        items.push(Item::forced_break());
        items
    }

    #[test]
    fn short_paragraph_is_one_line() {
        let items = paragraph(&[5.0, 5.0, 5.0, 5.0], (1.0, 0.5, 0.33));
        let breaks = LineBreaker::default().find_breakpoints(&items, &100.0).unwrap();
        assert_eq!(breaks.len(), 1);
        assert_eq!(breaks[0].item_index, items.len() - 1);
        assert_eq!(breaks[0].line_number, 1);
        assert_eq!(breaks[0].ratio, 0.0);
    }

    #[test]
    fn breaks_where_lines_fit_exactly() {
        let items = paragraph(&[10.0; 6], (2.0, 1.0, 1.0));
        let breaks = LineBreaker::default().find_breakpoints(&items, &34.0).unwrap();
        let indices: Vec<usize> = breaks.iter().map(|bp| bp.item_index).collect();
        assert_eq!(indices, vec![5, 12]);
        assert_eq!(breaks[0].ratio, 0.0);
        assert_eq!(breaks[1].line_number, 2);
        assert_eq!(line_ranges(&items, &breaks), vec![0..5, 6..12]);
    }

    #[test]
    fn overlong_box_is_infeasible() {
        let items = vec![word(50.0), Item::fill(), Item::forced_break()];
        let err = LineBreaker::default()
            .find_breakpoints(&items, &30.0)
            .unwrap_err();
        assert_eq!(err.items, 3);
        assert_eq!(
            err.with_quality(2).to_string(),
            "no feasible line breaks for 3 items at quality 2"
        );
    }

    #[test]
    fn mandatory_break_ends_line() {
        let mut items = vec![word(5.0), Item::fill(), Item::forced_break()];
        items.extend(paragraph(&[5.0], (1.0, 1.0, 1.0)));
        let breaks = LineBreaker::default().find_breakpoints(&items, &50.0).unwrap();
        let indices: Vec<usize> = breaks.iter().map(|bp| bp.item_index).collect();
        assert_eq!(indices, vec![2, 5]);
        assert_eq!(line_ranges(&items, &breaks), vec![0..2, 3..5]);
    }

    #[test]
    fn glue_after_glue_is_not_a_break() {
        let items = vec![
            word(5.0),
            Item::glue(1.0, 1.0, 1.0),
            Item::glue(1.0, 1.0, 1.0),
            word(5.0),
        ];
        let cx = LineBreakingContext::new(&items, &10.0);
        assert!(cx.is_legal(1));
        assert!(!cx.is_legal(2));
        assert!(!cx.is_legal(0));
    }

    #[test]
    fn looseness_prefers_more_lines_when_possible() {
        let items = paragraph(&[10.0; 6], (2.0, 20.0, 1.0));
        let tight = LineBreaker::default().find_breakpoints(&items, &34.0).unwrap();
        assert_eq!(tight.len(), 2);

        let loose = LineBreaker::new(BreakingParams {
            looseness: 1,
            ..BreakingParams::default()
        })
        .find_breakpoints(&items, &34.0)
        .unwrap();
        assert_eq!(loose.len(), 3);

        let shorter = LineBreaker::new(BreakingParams {
            looseness: -1,
            ..BreakingParams::default()
        })
        .find_breakpoints(&items, &34.0)
        .unwrap();
        assert_eq!(shorter.len(), 2);
    }

    #[test]
    fn demerit_bands() {
        assert_eq!(line_demerits(0.0, 0.0), 1.0);
        assert_eq!(line_demerits(0.0, 50.0), 51.0 * 51.0);
        assert_eq!(line_demerits(0.0, -5.0), 1.0 - 25.0);
        assert_eq!(line_demerits(0.0, MIN_FINITE_PENALTY), 1.0);
        assert_eq!(line_demerits(1.0, f64::NEG_INFINITY), 101.0 * 101.0);
    }

    #[test]
    fn fitness_classes() {
        assert_eq!(Fitness::from_ratio(-0.8), Fitness::Tight);
        assert_eq!(Fitness::from_ratio(0.5), Fitness::Normal);
        assert_eq!(Fitness::from_ratio(0.9), Fitness::Loose);
        assert_eq!(Fitness::from_ratio(1.5), Fitness::VeryLoose);
    }

    #[test]
    fn duplicate_policy_controls_replacement() {
        let node = |total: f64| BreakPoint {
            item_index: 4,
            line_number: 1,
            fitness: Fitness::Normal,
            total_demerits: total,
            ratio: 0.0,
            previous: Some(BreakPointId(0)),
        };
        for (policy, expected) in [
            (DuplicatePolicy::FirstFound, 50.0),
            (DuplicatePolicy::LowestDemerits, 10.0),
        ] {
            let mut arena = vec![BreakPoint::start()];
            let mut active = vec![BreakPointId(0)];
            insert_candidate(&mut arena, &mut active, node(50.0), policy);
            insert_candidate(&mut arena, &mut active, node(10.0), policy);
            assert_eq!(active.len(), 2);
            assert_eq!(arena[active[1].0].total_demerits, expected);
        }
    }

    #[test]
    fn active_nodes_stay_ordered_by_line() {
        let mut arena = vec![BreakPoint::start()];
        let mut active = vec![BreakPointId(0)];
        let at = |line: usize, item: usize| BreakPoint {
            item_index: item,
            line_number: line,
            ..BreakPoint::start()
        };
        insert_candidate(&mut arena, &mut active, at(2, 7), DuplicatePolicy::FirstFound);
        insert_candidate(&mut arena, &mut active, at(1, 7), DuplicatePolicy::FirstFound);
        let lines: Vec<usize> = active.iter().map(|id| arena[id.0].line_number).collect();
        assert_eq!(lines, vec![0, 1, 2]);
    }

    #[test]
    fn slice_widths_repeat_last_entry() {
        let widths = vec![10.0, 20.0];
        assert_eq!(widths.line_width(0), 10.0);
        assert_eq!(widths.line_width(5), 20.0);
        let empty: Vec<f64> = Vec::new();
        assert_eq!(empty.line_width(0), 0.0);
    }
}
