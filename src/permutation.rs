//! `Permutation`: a fixed-capacity ordering of filter indices with an
//! optional prefix length denoting a partial ordering under construction
//! (spec §3, §4.3).

use crate::filter::FilterId;
use crate::partial_order::{PartialOrder, Relation};

/// An ordering of `{0..n-1}` plus a `prefix_size` marking how many leading
/// positions are fixed. Positions `[prefix_size, n)` are a "tail" the
/// `BestFirst` optimizer preserves across expansion (spec §4.3, §4.6,
/// `copy_with_tail`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    elements: Vec<FilterId>,
    prefix_size: usize,
}

impl Permutation {
    /// Identity permutation `0..n-1` with the whole thing marked as a fixed
    /// prefix (a fully-determined total order).
    pub fn identity(n: usize) -> Self {
        Permutation {
            elements: (0..n).collect(),
            prefix_size: n,
        }
    }

    /// An empty ordering over `n` slots with `prefix_size = 0`, used by
    /// `BestFirst` as the seed before anything has been placed.
    pub fn new(n: usize) -> Self {
        Permutation {
            elements: (0..n).collect(),
            prefix_size: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn prefix_size(&self) -> usize {
        self.prefix_size
    }

    pub fn set_size(&mut self, k: usize) {
        debug_assert!(k <= self.elements.len());
        self.prefix_size = k;
    }

    pub fn as_slice(&self) -> &[FilterId] {
        &self.elements
    }

    pub fn prefix(&self) -> &[FilterId] {
        &self.elements[..self.prefix_size]
    }

    pub fn get(&self, i: usize) -> FilterId {
        self.elements[i]
    }

    pub fn position_of(&self, filter: FilterId) -> Option<usize> {
        self.elements.iter().position(|&f| f == filter)
    }

    pub fn swap(&mut self, i: usize, j: usize) {
        self.elements.swap(i, j);
    }

    /// Copy only the prefix from `other` (positions past `prefix_size` are
    /// left untouched).
    pub fn copy(&mut self, other: &Permutation) {
        self.elements[..other.prefix_size].copy_from_slice(&other.elements[..other.prefix_size]);
        self.prefix_size = other.prefix_size;
    }

    /// Copy the entire buffer, including positions past `prefix_size` - the
    /// "tail" of filters not yet placed in the prefix. This is what lets a
    /// `BestFirst` child permutation inherit a consistent ordering for the
    /// filters it hasn't committed to yet, so a later `make_valid_perm` pass
    /// over the tail has something sane to topologically sort (spec §9,
    /// `pmCopyAll`/`copy_with_tail`).
    pub fn copy_with_tail(&mut self, other: &Permutation) {
        self.elements.copy_from_slice(&other.elements);
        self.prefix_size = other.prefix_size;
    }

    pub fn dup(&self) -> Permutation {
        self.clone()
    }

    pub fn equal(&self, other: &Permutation) -> bool {
        self.elements == other.elements
    }

    /// Append `filter` to the prefix by swapping it into position
    /// `prefix_size`, then incrementing `prefix_size` (spec §4.6, EXPAND).
    pub fn append_to_prefix(&mut self, filter: FilterId) {
        let pos = self
            .position_of(filter)
            .expect("filter must exist in permutation");
        let target = self.prefix_size;
        self.elements.swap(pos, target);
        self.prefix_size += 1;
    }

    /// True iff all elements are distinct and within range - the structural
    /// invariant checked by property tests (spec §8).
    pub fn is_valid_permutation(&self) -> bool {
        let n = self.elements.len();
        let mut seen = vec![false; n];
        for &e in &self.elements {
            if e >= n || seen[e] {
                return false;
            }
            seen[e] = true;
        }
        true
    }

    /// True iff, for every `i < j < prefix_size` and every `k >= j`, no `GT`
    /// edge points from the later position back to the earlier one - the
    /// topological validity invariant of spec §3.
    pub fn is_topologically_valid(&self, po: &PartialOrder) -> bool {
        let prefix_size = self.prefix_size.min(self.elements.len());
        for i in 0..prefix_size {
            for j in (i + 1)..self.elements.len() {
                if matches!(po.get(self.elements[i], self.elements[j]), Relation::Gt) {
                    return false;
                }
            }
        }
        true
    }

    /// True iff no filter still in the tail is required to run before a
    /// filter already committed to the prefix (spec §4.6,
    /// `is_valid_partial_perm`).
    pub fn is_valid_partial(&self, po: &PartialOrder) -> bool {
        for i in 0..self.prefix_size {
            for j in self.prefix_size..self.elements.len() {
                if matches!(po.get(self.elements[i], self.elements[j]), Relation::Gt) {
                    return false;
                }
            }
        }
        true
    }

    pub fn print(&self) -> String {
        format!(
            "[{}|{}]",
            self.elements[..self.prefix_size]
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
            self.elements[self.prefix_size..]
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        )
    }
}

/// Complete a partial permutation into a valid total order by running a
/// bubble-sort-like topological pass over the tail `[prefix_size, n)`: for
/// each pair `i < j` in the tail, if `po[perm[i]][perm[j]] = GT`, swap them
/// (spec §4.6, `make_valid_perm`).
pub fn make_valid_perm(perm: &mut Permutation, po: &PartialOrder) {
    let n = perm.len();
    let start = perm.prefix_size();
    for i in start..n {
        for j in (i + 1)..n {
            if matches!(po.get(perm.get(i), perm.get(j)), Relation::Gt) {
                perm.swap(i, j);
            }
        }
    }
    perm.set_size(n);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_spec;

    #[test]
    fn identity_is_valid_and_full_prefix() {
        let p = Permutation::identity(4);
        assert_eq!(p.as_slice(), &[0, 1, 2, 3]);
        assert_eq!(p.prefix_size(), 4);
        assert!(p.is_valid_permutation());
    }

    #[test]
    fn copy_with_tail_preserves_unplaced_positions() {
        let mut seed = Permutation::identity(4);
        seed.swap(0, 3);
        seed.set_size(1); // only position 0 ("3") is fixed

        let mut target = Permutation::new(4);
        target.copy_with_tail(&seed);

        assert_eq!(target.as_slice(), seed.as_slice());
        assert_eq!(target.prefix_size(), 1);
    }

    #[test]
    fn make_valid_perm_resolves_tail_ordering() {
        let table = parse_spec(
            "FILTER A\nTHRESHOLD 0\nFILTER B\nTHRESHOLD 0\nREQUIRES A\nFILTER C\nTHRESHOLD 0\nREQUIRES B\n",
        )
        .unwrap();
        let po = PartialOrder::from_table(&table).unwrap();
        let (a, b, c) = (table.id_of("A").unwrap(), table.id_of("B").unwrap(), table.id_of("C").unwrap());

        // Deliberately reversed tail: C, B, A - all unplaced (prefix_size 0).
        let mut perm = Permutation::new(3);
        for (slot, filter) in [c, b, a].into_iter().enumerate() {
            perm.elements[slot] = filter;
        }
        make_valid_perm(&mut perm, &po);

        assert!(perm.is_topologically_valid(&po));
        assert_eq!(perm.as_slice(), &[a, b, c]);
    }

    #[test]
    fn append_to_prefix_extends_and_swaps() {
        let mut perm = Permutation::new(3);
        perm.append_to_prefix(2);
        assert_eq!(perm.prefix_size(), 1);
        assert_eq!(perm.get(0), 2);
        assert!(perm.is_valid_permutation());
    }
}
