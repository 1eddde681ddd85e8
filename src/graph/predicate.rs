//! A DNF (disjunction-of-conjunctions) predicate over generic factor tokens.
//!
//! Grounded in `backend/predicate.h`. Each `Term` is an ordered conjunction
//! of `(factor, polarity)` pairs (a "falsified" term is a conjunction that
//! contains some factor with both polarities, i.e. is unsatisfiable); a
//! `Predicate` is a disjunction (OR) of terms.

use std::collections::BTreeMap;

/// A single conjunction: an ordered map from factor to required polarity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Term<T: Ord + Clone> {
    pub factors: BTreeMap<T, bool>,
    pub falsified: bool,
}

impl<T: Ord + Clone> Term<T> {
    pub fn tautology() -> Self {
        Term {
            factors: BTreeMap::new(),
            falsified: false,
        }
    }

    pub fn is_tautology(&self) -> bool {
        !self.falsified && self.factors.is_empty()
    }

    pub fn and_with(&self, factor: T, polarity: bool) -> Term<T> {
        let mut t = self.clone();
        if t.falsified {
            return t;
        }
        match t.factors.get(&factor) {
            Some(&existing) if existing != polarity => {
                t.falsified = true;
            }
            _ => {
                t.factors.insert(factor, polarity);
            }
        }
        t
    }

    /// Attempts to OR two terms together as a single term. This is possible
    /// in exactly the cases the original's `Term::OrWith` handles:
    /// - one side's factor set is a superset of the other's and they agree
    ///   on shared factors -> the more general (subset) term subsumes;
    /// - the two terms differ in exactly one factor's polarity and agree on
    ///   every other factor -> that factor cancels (A|~A -> true over the
    ///   remaining shared factors).
    /// Returns `None` when the two terms cannot be merged into one (the
    /// caller then keeps both terms in the resulting `Predicate`).
    pub fn or_with(&self, other: &Term<T>) -> Option<Term<T>> {
        if self.falsified {
            return Some(other.clone());
        }
        if other.falsified {
            return Some(self.clone());
        }

        // Case: one side's factor set is empty -> it subsumes (drop the
        // more specific side).
        if self.factors.is_empty() {
            return Some(self.clone());
        }
        if other.factors.is_empty() {
            return Some(other.clone());
        }

        // Determine the factors unique to each side and the shared factors'
        // agreement.
        let mut only_self = Vec::new();
        let mut only_other = Vec::new();
        let mut differing_shared = Vec::new();
        for (f, &pol) in &self.factors {
            match other.factors.get(f) {
                None => only_self.push(f.clone()),
                Some(&opol) if opol != pol => differing_shared.push(f.clone()),
                Some(_) => {}
            }
        }
        for (f, _) in &other.factors {
            if !self.factors.contains_key(f) {
                only_other.push(f.clone());
            }
        }

        // Both empty of unique factors and no differing shared factor ->
        // identical terms.
        if only_self.is_empty() && only_other.is_empty() && differing_shared.is_empty() {
            return Some(self.clone());
        }

        // Exactly one differing factor, no unique factors on either side ->
        // that single factor cancels (A&rest | ~A&rest -> rest).
        if differing_shared.len() == 1 && only_self.is_empty() && only_other.is_empty() {
            let mut t = self.clone();
            t.factors.remove(&differing_shared[0]);
            return Some(t);
        }

        // Subsumption: self has no factors that other lacks (self subset of
        // other) and all shared factors agree -> self (the more general
        // term) subsumes other.
        if only_self.is_empty() && differing_shared.is_empty() {
            return Some(self.clone());
        }
        if only_other.is_empty() && differing_shared.is_empty() {
            return Some(other.clone());
        }

        None
    }
}

/// A disjunction of `Term`s. The `backedge` flag is a pure priority hint
/// used by mux-tree selection in if-conversion; it is cleared by every
/// `and_with`/`or_with` call (mirroring the original's `p.backedge = false;`
/// after every compose) and must be re-applied via `set_backedge` by the
/// caller that wants it to stick.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Predicate<T: Ord + Clone> {
    pub terms: Vec<Term<T>>,
    pub backedge: bool,
}

impl<T: Ord + Clone> Predicate<T> {
    pub fn new_true() -> Self {
        Predicate {
            terms: vec![Term::tautology()],
            backedge: false,
        }
    }

    pub fn new_false() -> Self {
        Predicate {
            terms: Vec::new(),
            backedge: false,
        }
    }

    pub fn is_false(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn is_true(&self) -> bool {
        self.terms.len() == 1 && self.terms[0].is_tautology()
    }

    pub fn set_backedge(mut self) -> Self {
        self.backedge = true;
        self
    }

    pub fn and_with(&self, factor: T, polarity: bool) -> Predicate<T> {
        let mut terms: Vec<Term<T>> = self
            .terms
            .iter()
            .map(|t| t.and_with(factor.clone(), polarity))
            .collect();
        terms.retain(|t| !t.falsified);
        terms.sort();
        terms.dedup();
        Predicate {
            terms,
            backedge: false,
        }
    }

    pub fn or_with(&self, other: &Predicate<T>) -> Predicate<T> {
        let mut terms = self.terms.clone();
        terms.extend(other.terms.iter().cloned());
        let mut p = Predicate {
            terms,
            backedge: false,
        };
        p.simplify();
        p
    }

    pub fn negate_factor(factor: T) -> Predicate<T> {
        Predicate::new_true().and_with(factor, false)
    }

    /// Removes falsified terms, collapses to a single `True` if any term is
    /// tautological, merges pairwise-mergeable terms (cancellation,
    /// subsumption), and canonicalizes via sorting + dedup. Note this is
    /// *not* a full DNF minimizer: two predicates that are logically
    /// equivalent but not syntactically reducible to the same term set will
    /// not compare equal (SPEC_FULL.md §9).
    pub fn simplify(&mut self) {
        self.terms.retain(|t| !t.falsified);
        if self.terms.iter().any(|t| t.is_tautology()) {
            self.terms = vec![Term::tautology()];
            return;
        }
        self.terms.sort();
        self.terms.dedup();

        // Repeatedly try to merge pairs of terms until no merge applies.
        loop {
            let mut merged = false;
            'outer: for i in 0..self.terms.len() {
                for j in (i + 1)..self.terms.len() {
                    if let Some(m) = self.terms[i].or_with(&self.terms[j]) {
                        let mut new_terms = Vec::with_capacity(self.terms.len() - 1);
                        for (k, t) in self.terms.iter().enumerate() {
                            if k != i && k != j {
                                new_terms.push(t.clone());
                            }
                        }
                        new_terms.push(m);
                        self.terms = new_terms;
                        merged = true;
                        break 'outer;
                    }
                }
            }
            if !merged {
                break;
            }
        }

        if self.terms.iter().any(|t| t.is_tautology()) {
            self.terms = vec![Term::tautology()];
            return;
        }
        self.terms.sort();
        self.terms.dedup();
    }
}

impl<T: Ord + Clone> Default for Predicate<T> {
    fn default() -> Self {
        Predicate::new_false()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn true_and_false_are_distinct() {
        let t: Predicate<i32> = Predicate::new_true();
        let f: Predicate<i32> = Predicate::new_false();
        assert!(t.is_true());
        assert!(f.is_false());
        assert_ne!(t, f);
    }

    #[test]
    fn and_then_cancel_is_false() {
        // p.and_with(x,true).and_with(x,false) simplifies to False.
        let p: Predicate<i32> = Predicate::new_true();
        let mut result = p.and_with(5, true).and_with(5, false);
        result.simplify();
        assert!(result.is_false());
    }

    #[test]
    fn or_of_complementary_ands_is_original() {
        // p.or_with(p.and_with(x,true)).or_with(p.and_with(x,false))
        // simplifies to `p` (here, p = True).
        let p: Predicate<i32> = Predicate::new_true();
        let a = p.and_with(7, true);
        let b = p.and_with(7, false);
        let mut result = a.or_with(&b);
        result.simplify();
        assert!(result.is_true());
    }

    #[test]
    fn subsumption_keeps_more_general_term() {
        // (A) | (A & B) == A
        let p: Predicate<i32> = Predicate::new_true();
        let a = p.and_with(1, true);
        let a_and_b = a.and_with(2, true);
        let mut result = a.or_with(&a_and_b);
        result.simplify();
        assert_eq!(result, a);
    }

    #[test]
    fn simplify_is_idempotent() {
        let p: Predicate<i32> = Predicate::new_true();
        let a = p.and_with(1, true);
        let b = p.and_with(1, false);
        let c = p.and_with(2, true);
        let mut combined = a.or_with(&b).or_with(&c);
        combined.simplify();
        let mut twice = combined.clone();
        twice.simplify();
        assert_eq!(combined, twice);
    }

    #[test]
    fn backedge_flag_cleared_by_compose() {
        let p: Predicate<i32> = Predicate::new_true().set_backedge();
        assert!(p.backedge);
        let composed = p.and_with(1, true);
        assert!(!composed.backedge);
    }
}
