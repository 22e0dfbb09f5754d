//! DNF requirement algebra.
//!
//! A requirement is a set of AND-clauses of conditions, read as their OR:
//! `[[a, b], [c]]` means "(a and b) or c". The empty requirement is never
//! satisfiable; the requirement containing one empty clause is always
//! satisfiable. Builders keep clause sets minimal by dropping any clause
//! implied by an existing one.

use serde::{Deserialize, Serialize};

use crate::tile::TileId;

/// A single flag, item, or derived capability. Negative values denote
/// conditions assumed unset under the static configuration.
pub type Condition = i32;

/// An immutable, normalized DNF requirement. Clauses and conditions are
/// sorted and duplicate-free, and no clause subsumes another.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement(Vec<Vec<Condition>>);

impl Requirement {
    /// A requirement that's always met.
    pub fn open() -> Requirement {
        Requirement(vec![Vec::new()])
    }

    /// A requirement that's never met.
    pub fn closed() -> Requirement {
        Requirement(Vec::new())
    }

    /// A single-clause requirement: all of `conds` together.
    pub fn single(conds: impl IntoIterator<Item = Condition>) -> Requirement {
        let mut clause: Vec<Condition> = conds.into_iter().collect();
        clause.sort_unstable();
        clause.dedup();
        Requirement(vec![clause])
    }

    /// Normalizes an arbitrary clause list.
    pub fn from_clauses(clauses: impl IntoIterator<Item = Vec<Condition>>) -> Requirement {
        let mut builder = RequirementBuilder::new();
        for clause in clauses {
            builder.add_clause(&clause);
        }
        builder.freeze()
    }

    pub fn is_open(&self) -> bool {
        self.0.len() == 1 && self.0[0].is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clauses(&self) -> &[Vec<Condition>] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vec<Condition>> {
        self.0.iter()
    }

    /// Logical AND, distributed clause-wise over both sides.
    pub fn meet(&self, other: &Requirement) -> Requirement {
        let mut builder = RequirementBuilder::new();
        for left in &self.0 {
            for right in &other.0 {
                let mut clause = left.clone();
                clause.extend_from_slice(right);
                builder.add_clause(&clause);
            }
        }
        builder.freeze()
    }

    /// Logical OR: the normalized union of both clause sets.
    pub fn or(&self, other: &Requirement) -> Requirement {
        let mut builder = RequirementBuilder::new();
        for clause in self.0.iter().chain(other.0.iter()) {
            builder.add_clause(clause);
        }
        builder.freeze()
    }
}

/// True if every element of `sub` appears in `sup`. Both slices sorted.
fn is_subset(sub: &[Condition], sup: &[Condition]) -> bool {
    if sub.len() > sup.len() {
        return false;
    }
    let mut it = sup.iter();
    'outer: for c in sub {
        for s in it.by_ref() {
            if s == c {
                continue 'outer;
            }
            if s > c {
                return false;
            }
        }
        return false;
    }
    true
}

/// Mutable requirement under construction. Insertion is subsumption-aware:
/// a clause implied by an existing one is dropped, and inserting a clause
/// that implies existing ones removes them first, so the frozen form is
/// always minimal.
#[derive(Clone, Debug, Default)]
pub struct RequirementBuilder {
    clauses: Vec<Vec<Condition>>,
}

impl RequirementBuilder {
    pub fn new() -> RequirementBuilder {
        RequirementBuilder::default()
    }

    /// Inserts one AND-clause; returns whether the content changed.
    pub fn add_clause(&mut self, conds: &[Condition]) -> bool {
        let mut clause = conds.to_vec();
        clause.sort_unstable();
        clause.dedup();
        for existing in &self.clauses {
            if is_subset(existing, &clause) {
                return false; // already implied by a weaker clause
            }
        }
        self.clauses.retain(|existing| !is_subset(&clause, existing));
        self.clauses.push(clause);
        true
    }

    /// Joins a whole requirement in place; returns whether anything changed.
    pub fn add_all(&mut self, requirement: &Requirement) -> bool {
        let mut changed = false;
        for clause in requirement.iter() {
            changed |= self.add_clause(clause);
        }
        changed
    }

    pub fn add_route(&mut self, route: &Route) -> bool {
        self.add_clause(&route.deps)
    }

    /// Meets this requirement in place with `r`. This is the explicit
    /// pruning point against clause explosion when many small requirements
    /// are merged: callers restrict by the common mandatory conditions
    /// instead of letting every combination survive.
    pub fn restrict(&mut self, r: &Requirement) {
        let old = std::mem::take(&mut self.clauses);
        for left in &old {
            for right in r.iter() {
                let mut clause = left.clone();
                clause.extend_from_slice(right);
                self.add_clause(&clause);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[Vec<Condition>] {
        &self.clauses
    }

    /// Converts to the immutable form, with clauses sorted so that equal
    /// builders freeze to identical requirements regardless of insertion
    /// order.
    pub fn freeze(&self) -> Requirement {
        let mut clauses = self.clauses.clone();
        clauses.sort();
        Requirement(clauses)
    }
}

/// A transient propagation message: `target` is reachable if all of `deps`
/// hold. Never stored long-term outside the route solver.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Route {
    pub target: TileId,
    pub deps: Vec<Condition>,
}

impl Route {
    pub fn new(target: TileId, deps: impl IntoIterator<Item = Condition>) -> Route {
        let mut deps: Vec<Condition> = deps.into_iter().collect();
        deps.sort_unstable();
        deps.dedup();
        Route { target, deps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsumption() {
        let mut b = RequirementBuilder::new();
        assert!(b.add_clause(&[1, 2]));
        // Implied by [1, 2]'s weaker sibling? No: [1] is weaker, replaces it.
        assert!(b.add_clause(&[1]));
        assert_eq!(b.clauses(), &[vec![1]]);
        // [1, 3] is implied by [1]:
        assert!(!b.add_clause(&[1, 3]));
        assert!(b.add_clause(&[2, 3]));
        let r = b.freeze();
        assert_eq!(r.clauses(), &[vec![1], vec![2, 3]]);
    }

    #[test]
    fn test_duplicate_clause_is_no_change() {
        let mut b = RequirementBuilder::new();
        assert!(b.add_clause(&[3, 1]));
        assert!(!b.add_clause(&[1, 3]));
        assert!(!b.add_clause(&[3, 1, 1]));
    }

    #[test]
    fn test_minimality() {
        let mut b = RequirementBuilder::new();
        b.add_clause(&[1, 2, 3]);
        b.add_clause(&[2, 3]);
        b.add_clause(&[4]);
        b.add_clause(&[2, 4]);
        let r = b.freeze();
        for (i, x) in r.clauses().iter().enumerate() {
            for (j, y) in r.clauses().iter().enumerate() {
                if i != j {
                    assert!(!is_subset(x, y), "{x:?} subsumes {y:?}");
                }
            }
        }
    }

    #[test]
    fn test_meet_distributes() {
        let a = Requirement::from_clauses([vec![1], vec![2]]);
        let b = Requirement::from_clauses([vec![3], vec![4]]);
        let m = a.meet(&b);
        assert_eq!(
            m.clauses(),
            &[vec![1, 3], vec![1, 4], vec![2, 3], vec![2, 4]]
        );
    }

    #[test]
    fn test_open_closed_absorption() {
        let r = Requirement::from_clauses([vec![1, 2], vec![3]]);
        assert_eq!(r.meet(&Requirement::closed()), Requirement::closed());
        assert_eq!(r.meet(&Requirement::open()), r);
        assert!(r.or(&Requirement::open()).is_open());
        assert_eq!(r.or(&Requirement::closed()), r);
    }

    #[test]
    fn test_restrict() {
        let mut b = RequirementBuilder::new();
        b.add_clause(&[1]);
        b.add_clause(&[2]);
        b.restrict(&Requirement::single([9]));
        assert_eq!(b.freeze().clauses(), &[vec![1, 9], vec![2, 9]]);
    }

    #[test]
    fn test_freeze_is_order_independent() {
        let mut a = RequirementBuilder::new();
        a.add_clause(&[5, 6]);
        a.add_clause(&[7]);
        let mut b = RequirementBuilder::new();
        b.add_clause(&[7]);
        b.add_clause(&[6, 5]);
        assert_eq!(a.freeze(), b.freeze());
    }
}
