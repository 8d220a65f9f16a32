//! `PartialOrder`: the GT/LT/EQ/incomparable relation over filter indices,
//! derived from `REQUIRES` edges and closed transitively (spec §4.2).

use crate::error::EngineError;
use crate::filter::{FilterId, FilterTable};

/// Relation between two filters under the partial order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Lt,
    Gt,
    Eq,
    Incomparable,
}

impl Relation {
    fn inverse(self) -> Relation {
        match self {
            Relation::Lt => Relation::Gt,
            Relation::Gt => Relation::Lt,
            Relation::Eq => Relation::Eq,
            Relation::Incomparable => Relation::Incomparable,
        }
    }
}

/// Dense n×n relation matrix over filter indices (spec §3, §4.2).
#[derive(Debug, Clone)]
pub struct PartialOrder {
    n: usize,
    matrix: Vec<Relation>,
}

impl PartialOrder {
    fn index(&self, u: FilterId, v: FilterId) -> usize {
        u * self.n + v
    }

    /// Set `po[u][v] = rel` (and its inverse at `po[v][u]`), failing if a
    /// different relation already holds between the pair - that is exactly
    /// the "both LT and GT derivable" contradiction spec §4.2 calls out as
    /// a cycle witness.
    fn try_set(&mut self, u: FilterId, v: FilterId, rel: Relation) -> Result<(), EngineError> {
        let existing = self.get(u, v);
        if !matches!(existing, Relation::Incomparable) && existing != rel {
            return Err(EngineError::InvalidSpec {
                line: 0,
                message: format!(
                    "REQUIRES cycle detected: contradictory order between filters {u} and {v}"
                ),
            });
        }
        let idx = self.index(u, v);
        self.matrix[idx] = rel;
        let inv_idx = self.index(v, u);
        self.matrix[inv_idx] = rel.inverse();
        Ok(())
    }

    /// `po[u][v]`. Callers must not query `u == v`; that entry is left as
    /// `Incomparable` and carries no meaning (spec §4.2).
    pub fn get(&self, u: FilterId, v: FilterId) -> Relation {
        self.matrix[self.index(u, v)]
    }

    pub fn comparable(&self, u: FilterId, v: FilterId) -> bool {
        !matches!(self.get(u, v), Relation::Incomparable)
    }

    pub fn incomparable(&self, u: FilterId, v: FilterId) -> bool {
        matches!(self.get(u, v), Relation::Incomparable)
    }

    /// True if `u` has no `GT` predecessor, i.e. nothing must run before it.
    pub fn is_min(&self, u: FilterId) -> bool {
        (0..self.n).all(|v| v == u || !matches!(self.get(u, v), Relation::Gt))
    }

    /// Build a `PartialOrder` from the `REQUIRES` edges of a `FilterTable`
    /// and close it transitively. `a REQUIRES b` means `b` must run before
    /// `a`, i.e. `po[b][a] = LT` (b is less-than / precedes a).
    pub fn from_table(table: &FilterTable) -> Result<Self, EngineError> {
        let n = table.len();
        let mut po = PartialOrder {
            n,
            matrix: vec![Relation::Incomparable; n * n],
        };

        for (a, filter) in table.iter().enumerate() {
            for dep_name in &filter.requires {
                let b = table
                    .id_of(dep_name)
                    .expect("dependency existence already validated by the parser");
                po.try_set(b, a, Relation::Lt)?;
            }
        }

        po.close()?;
        Ok(po)
    }

    /// Warshall-style transitive closure (spec §4.2): for every k, i, j, if
    /// `po[i][j] = INCOMPARABLE` and `po[i][k] = po[k][j] != INCOMPARABLE`,
    /// set `po[i][j] = po[i][k]`. A mismatch against an already-set value
    /// for `(i, j)` is the cycle contradiction.
    fn close(&mut self) -> Result<(), EngineError> {
        for k in 0..self.n {
            for i in 0..self.n {
                if i == k {
                    continue;
                }
                for j in 0..self.n {
                    if j == i || j == k {
                        continue;
                    }
                    let ik = self.get(i, k);
                    let kj = self.get(k, j);
                    if matches!(ik, Relation::Incomparable) || ik != kj {
                        continue;
                    }
                    self.try_set(i, j, ik)?;
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }
}
