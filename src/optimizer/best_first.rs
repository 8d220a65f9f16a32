//! `BestFirst`: priority-queue-driven construction of permutations prefix by
//! prefix (spec §4.6).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::filter::FilterTable;
use crate::partial_order::PartialOrder;
use crate::permutation::{make_valid_perm, Permutation};
use crate::stats::{Evaluation, StatsTracker};

use super::{is_valid_partial_perm, Optimizer, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Visit,
    Expand,
    Done,
}

/// One queued prefix, ordered so the heap's max is the best candidate:
/// lowest expected cost first, then highest summed merit, then earliest
/// insertion order (spec §10, §4.6).
struct HeapEntry {
    expected_cost: f64,
    merit: i64,
    seq: u64,
    perm: Permutation,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.expected_cost == other.expected_cost && self.merit == other.merit && self.seq == other.seq
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // expected_cost is always finite (sums of finite ticks weighted by
        // selectivities in [0, 1]); lower cost must compare as "greater" so
        // BinaryHeap::pop returns it first.
        match other
            .expected_cost
            .partial_cmp(&self.expected_cost)
            .unwrap_or(Ordering::Equal)
        {
            Ordering::Equal => match self.merit.cmp(&other.merit) {
                Ordering::Equal => other.seq.cmp(&self.seq),
                ord => ord,
            },
            ord => ord,
        }
    }
}

/// Best-first search optimizer: an INIT/VISIT/EXPAND/DONE state machine
/// over a max-heap of partially-built permutations (spec §4.6).
pub struct BestFirst {
    heap: BinaryHeap<HeapEntry>,
    pending: Option<Permutation>,
    state: State,
    next_seq: u64,
}

impl Default for BestFirst {
    fn default() -> Self {
        BestFirst::new()
    }
}

impl BestFirst {
    pub fn new() -> Self {
        BestFirst {
            heap: BinaryHeap::new(),
            pending: None,
            state: State::Init,
            next_seq: 0,
        }
    }

    fn push(&mut self, perm: Permutation, expected_cost: f64, merit: i64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(HeapEntry {
            expected_cost,
            merit,
            seq,
            perm,
        });
    }

    /// INIT: seed the queue with every length-1 prefix starting at a
    /// `po.is_min` filter (spec §4.6).
    fn initialize(&mut self, table: &FilterTable, po: &PartialOrder, stats: &StatsTracker) {
        self.heap.clear();
        self.next_seq = 0;
        let n = table.len();
        for f in 0..n {
            if !po.is_min(f) {
                continue;
            }
            let mut perm = Permutation::new(n);
            perm.append_to_prefix(f);
            if let Evaluation::Scored { expected_cost, merit } = stats.evaluate(&perm, table) {
                self.push(perm, expected_cost, merit);
            }
            // A `NeedsData` min-filter is skipped here rather than returned
            // immediately: other min-filters may already have enough
            // samples, and the caller only needs one improving direction to
            // make progress. If the heap ends up empty, `step` surfaces a
            // `NeedsData` for this filter once VISIT is reached.
        }
        self.state = State::Visit;
    }
}

impl Optimizer for BestFirst {
    fn seed(&mut self, _current: &Permutation, _table: &FilterTable, _po: &PartialOrder, _stats: &StatsTracker) {
        // BestFirst always restarts its search from the minimal filters
        // rather than the driver's current permutation (spec §4.6, INIT).
        self.heap.clear();
        self.pending = None;
        self.state = State::Init;
        self.next_seq = 0;
    }

    fn step(
        &mut self,
        table: &FilterTable,
        po: &PartialOrder,
        stats: &StatsTracker,
        max_steps: usize,
    ) -> Outcome {
        let n = table.len();
        if n == 0 {
            return Outcome::Complete(Permutation::new(0));
        }
        if n == 1 {
            return Outcome::Complete(Permutation::identity(1));
        }

        if self.state == State::Init {
            self.initialize(table, po, stats);
        }

        for _ in 0..max_steps.max(1) {
            match self.state {
                State::Visit => match self.heap.pop() {
                    Some(entry) if entry.perm.prefix_size() == n => {
                        self.state = State::Done;
                        return Outcome::Complete(entry.perm);
                    }
                    Some(entry) => {
                        self.pending = Some(entry.perm);
                        self.state = State::Expand;
                    }
                    None => {
                        // No full permutation was reachable - every seed
                        // candidate needed more data, or the table admits
                        // no valid prefix (shouldn't happen for an acyclic
                        // `po`). Ask for more data on filter 0's order.
                        self.state = State::Done;
                        // `identity(n)` marks its whole range as a fixed
                        // prefix, which would make `make_valid_perm` a
                        // no-op; start from nothing placed so the tail
                        // actually gets topologically sorted.
                        let mut fallback = Permutation::new(n);
                        make_valid_perm(&mut fallback, po);
                        return Outcome::NeedsData(fallback);
                    }
                },
                State::Expand => {
                    let parent = self.pending.take().expect("Expand requires pending");
                    let mut placed = vec![false; n];
                    for &f in parent.prefix() {
                        placed[f] = true;
                    }
                    for j in 0..n {
                        if placed[j] {
                            continue;
                        }
                        let mut child = Permutation::new(n);
                        child.copy_with_tail(&parent);
                        child.append_to_prefix(j);
                        if !is_valid_partial_perm(&child, po) {
                            continue;
                        }
                        match stats.evaluate(&child, table) {
                            Evaluation::NeedsData(_) => {
                                // The tail past `prefix_size` is inherited
                                // unsorted from the parent - `is_valid_partial_perm`
                                // only checked prefix-vs-tail edges, never
                                // tail-internal ones, so it can still hold a
                                // REQUIRES violation between two unplaced
                                // filters. Finish the tail topologically
                                // before handing it back (the driver runs
                                // this candidate as-is to gather samples).
                                let mut child = child;
                                make_valid_perm(&mut child, po);
                                return Outcome::NeedsData(child);
                            }
                            Evaluation::Scored { expected_cost, merit } => {
                                self.push(child, expected_cost, merit);
                            }
                        }
                    }
                    self.state = State::Visit;
                }
                State::Done => {
                    self.initialize(table, po, stats);
                }
                State::Init => unreachable!("initialize transitions state away from Init"),
            }
        }

        // Step budget exhausted before a full permutation was reached:
        // report the best candidate seen so far, completed deterministically
        // over its unplaced tail.
        match self.heap.peek() {
            Some(entry) => {
                let mut best = entry.perm.clone();
                make_valid_perm(&mut best, po);
                Outcome::Complete(best)
            }
            None => {
                let mut fallback = Permutation::new(n);
                make_valid_perm(&mut fallback, po);
                Outcome::Complete(fallback)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_spec;

    fn seed_stats(stats: &StatsTracker, filter: usize, passed_ratio: f64, cost: u64, samples: u64) {
        let passed = (samples as f64 * passed_ratio).round() as u64;
        for i in 0..samples {
            stats.record(filter, i < passed, cost);
        }
    }

    #[test]
    fn single_filter_is_a_no_op() {
        let table = parse_spec("FILTER A\nTHRESHOLD 0\n").unwrap();
        let po = PartialOrder::from_table(&table).unwrap();
        let stats = StatsTracker::new(1);
        let mut bf = BestFirst::new();
        bf.seed(&Permutation::identity(1), &table, &po, &stats);
        match bf.step(&table, &po, &stats, 100) {
            Outcome::Complete(perm) => assert_eq!(perm.as_slice(), &[0]),
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn picks_the_cheaper_first_filter() {
        let table = parse_spec("FILTER A\nTHRESHOLD 0\nFILTER B\nTHRESHOLD 0\n").unwrap();
        let po = PartialOrder::from_table(&table).unwrap();
        let (a, b) = (table.id_of("A").unwrap(), table.id_of("B").unwrap());
        let stats = StatsTracker::with_config(2, 5, 10.0);
        seed_stats(&stats, a, 0.9, 10, 20);
        seed_stats(&stats, b, 0.1, 10, 20);

        let mut bf = BestFirst::new();
        bf.seed(&Permutation::identity(2), &table, &po, &stats);
        match bf.step(&table, &po, &stats, 1000) {
            Outcome::Complete(perm) => assert_eq!(perm.as_slice(), &[b, a]),
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn respects_requires_ordering() {
        let table = parse_spec(
            "FILTER A\nTHRESHOLD 0\nFILTER B\nTHRESHOLD 0\nREQUIRES A\nFILTER C\nTHRESHOLD 0\nREQUIRES B\n",
        )
        .unwrap();
        let po = PartialOrder::from_table(&table).unwrap();
        let (a, b, c) = (
            table.id_of("A").unwrap(),
            table.id_of("B").unwrap(),
            table.id_of("C").unwrap(),
        );
        let stats = StatsTracker::with_config(3, 5, 10.0);
        seed_stats(&stats, a, 0.1, 10, 20);
        seed_stats(&stats, b, 0.5, 10, 20);
        seed_stats(&stats, c, 0.5, 10, 20);

        let mut bf = BestFirst::new();
        bf.seed(&Permutation::identity(3), &table, &po, &stats);
        match bf.step(&table, &po, &stats, 1000) {
            Outcome::Complete(perm) => {
                assert!(perm.is_topologically_valid(&po));
                assert_eq!(perm.as_slice(), &[a, b, c]);
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn needs_data_candidate_has_a_topologically_valid_tail() {
        // A, B, C mutually incomparable; U REQUIRES V. A is cheapest and
        // scored (pops first), B is scored but pricier, C is unscored. The
        // EXPAND child that appends C next (prefix [A, C]) is returned as
        // NeedsData with tail [B, U, V] - U precedes V there, a REQUIRES
        // violation `is_valid_partial_perm` doesn't catch since it only
        // checks prefix-vs-tail edges, never tail-internal ones.
        let table = parse_spec(
            "FILTER A\nTHRESHOLD 0\nFILTER B\nTHRESHOLD 0\nFILTER C\nTHRESHOLD 0\n\
             FILTER U\nTHRESHOLD 0\nREQUIRES V\nFILTER V\nTHRESHOLD 0\n",
        )
        .unwrap();
        let po = PartialOrder::from_table(&table).unwrap();
        let (a, b, c, u, v) = (
            table.id_of("A").unwrap(),
            table.id_of("B").unwrap(),
            table.id_of("C").unwrap(),
            table.id_of("U").unwrap(),
            table.id_of("V").unwrap(),
        );
        let stats = StatsTracker::with_config(table.len(), 5, 10.0);
        seed_stats(&stats, a, 1.0, 1, 10); // scored, cheapest - popped first
        seed_stats(&stats, b, 1.0, 100, 10); // scored, pricier than A
        seed_stats(&stats, c, 1.0, 1, 2); // below min_samples - forces NeedsData

        let mut bf = BestFirst::new();
        bf.seed(&Permutation::identity(table.len()), &table, &po, &stats);
        match bf.step(&table, &po, &stats, 10) {
            Outcome::NeedsData(perm) => {
                assert!(
                    perm.is_topologically_valid(&po),
                    "NeedsData candidate must respect REQUIRES (V before U): {}",
                    perm.print()
                );
                let (pu, pv) = (perm.position_of(u).unwrap(), perm.position_of(v).unwrap());
                assert!(pv < pu, "V must precede U in the repaired tail");
            }
            other => panic!("expected NeedsData, got {other:?}"),
        }
    }

    #[test]
    fn needs_data_before_any_sample_is_taken() {
        let table = parse_spec("FILTER A\nTHRESHOLD 0\nFILTER B\nTHRESHOLD 0\n").unwrap();
        let po = PartialOrder::from_table(&table).unwrap();
        let stats = StatsTracker::new(2);
        let mut bf = BestFirst::new();
        bf.seed(&Permutation::identity(2), &table, &po, &stats);
        match bf.step(&table, &po, &stats, 100) {
            Outcome::NeedsData(_) => {}
            other => panic!("expected NeedsData, got {other:?}"),
        }
    }

    #[test]
    fn second_call_with_no_new_samples_is_idempotent() {
        let table = parse_spec("FILTER A\nTHRESHOLD 0\nFILTER B\nTHRESHOLD 0\n").unwrap();
        let po = PartialOrder::from_table(&table).unwrap();
        let (a, b) = (table.id_of("A").unwrap(), table.id_of("B").unwrap());
        let stats = StatsTracker::with_config(2, 5, 10.0);
        seed_stats(&stats, a, 0.9, 10, 20);
        seed_stats(&stats, b, 0.1, 10, 20);

        let mut bf = BestFirst::new();
        bf.seed(&Permutation::identity(2), &table, &po, &stats);
        let first = match bf.step(&table, &po, &stats, 1000) {
            Outcome::Complete(perm) => perm,
            other => panic!("expected Complete, got {other:?}"),
        };
        bf.seed(&Permutation::identity(2), &table, &po, &stats);
        let second = match bf.step(&table, &po, &stats, 1000) {
            Outcome::Complete(perm) => perm,
            other => panic!("expected Complete, got {other:?}"),
        };
        assert!(first.equal(&second));
    }
}
