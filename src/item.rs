//! LR items and item sets.
//!
//! A `RulePtr` is a production index, a dot position and an optional
//! lookahead terminal; LR(0) items simply carry no lookahead. An `ItemSet`
//! is identified by its sorted kernel alone (the closure is derived data)
//! and states are keyed in the state map by the canonical text of that
//! kernel.

use std::collections::BTreeSet;

use crate::grammar::Grammar;
use crate::symbol::Symbol;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RulePtr {
    production: usize,
    dot: usize,
    lookahead: Option<Symbol>,
}

impl RulePtr {
    pub fn new(production: usize, dot: usize) -> Self {
        Self {
            production,
            dot,
            lookahead: None,
        }
    }

    pub fn with_lookahead(production: usize, dot: usize, lookahead: Symbol) -> Self {
        Self {
            production,
            dot,
            lookahead: Some(lookahead),
        }
    }

    pub fn production(&self) -> usize {
        self.production
    }

    pub fn dot(&self) -> usize {
        self.dot
    }

    pub fn lookahead(&self) -> Option<&Symbol> {
        self.lookahead.as_ref()
    }

    /// The (production, dot) pair without the lookahead.
    pub fn core(&self) -> (usize, usize) {
        (self.production, self.dot)
    }

    pub fn advanced(&self) -> RulePtr {
        Self {
            production: self.production,
            dot: self.dot + 1,
            lookahead: self.lookahead.clone(),
        }
    }

    pub fn next_symbol<'g>(&self, grammar: &'g Grammar) -> Option<&'g Symbol> {
        grammar.production(self.production).body().get(self.dot)
    }

    /// Dot at the end of the body.
    pub fn is_satisfied(&self, grammar: &Grammar) -> bool {
        self.dot >= grammar.production(self.production).len()
    }

    pub fn is_kernel(&self, grammar: &Grammar) -> bool {
        self.dot > 0 || grammar.production(self.production).head().is_augment()
    }

    /// The body symbols after the one the dot sits on.
    pub fn rhs_tail<'g>(&self, grammar: &'g Grammar) -> &'g [Symbol] {
        grammar.production(self.production).body().tail(self.dot + 1)
    }

    /// Canonical text form, `<H : α · β, a>`.
    pub fn text(&self, grammar: &Grammar) -> String {
        let production = grammar.production(self.production);
        let mut string = format!("<{} :", production.head());
        for (index, symbol) in production.body().iter().enumerate() {
            if index == self.dot {
                string += " .";
            }
            string += &format!(" {}", symbol);
        }
        if self.dot >= production.len() {
            string += " .";
        }
        if let Some(lookahead) = &self.lookahead {
            string += &format!(", {}", lookahead);
        }
        string += ">";
        string
    }
}

/// A state of the LR automaton: an immutable sorted kernel plus the closure
/// derived from it. Two item sets are the same state iff their kernels are
/// equal; the uuid is assigned in BFS insertion order.
#[derive(Debug, Clone)]
pub struct ItemSet {
    kernel: Vec<RulePtr>,
    closure: BTreeSet<RulePtr>,
    uuid: u32,
}

impl ItemSet {
    pub fn from_kernel(mut kernel: Vec<RulePtr>) -> Self {
        kernel.sort();
        kernel.dedup();
        Self {
            kernel,
            closure: BTreeSet::new(),
            uuid: 0,
        }
    }

    pub fn kernel(&self) -> &[RulePtr] {
        &self.kernel
    }

    pub fn closure(&self) -> &BTreeSet<RulePtr> {
        &self.closure
    }

    pub fn uuid(&self) -> u32 {
        self.uuid
    }

    pub(crate) fn set_closure(&mut self, closure: BTreeSet<RulePtr>) {
        self.closure = closure;
    }

    pub(crate) fn set_uuid(&mut self, uuid: u32) {
        self.uuid = uuid;
    }

    /// The state-map key: the sorted kernel items' canonical texts.
    pub fn canonical_name(&self, grammar: &Grammar) -> String {
        let parts: Vec<String> = self.kernel.iter().map(|item| item.text(grammar)).collect();
        parts.join("|")
    }

    /// Every distinct symbol that appears right after a dot in the closure.
    pub fn symbols_after_dot(&self, grammar: &Grammar) -> BTreeSet<String> {
        self.closure
            .iter()
            .filter_map(|item| item.next_symbol(grammar))
            .map(|symbol| symbol.name().to_string())
            .collect()
    }

    /// Satisfied closure items, the reduce candidates of the state.
    pub fn satisfied_items<'a>(
        &'a self,
        grammar: &'a Grammar,
    ) -> impl Iterator<Item = &'a RulePtr> {
        self.closure.iter().filter(|item| item.is_satisfied(grammar))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_grammar;

    #[test]
    fn item_text_and_identity() {
        let grammar = read_grammar("%token id\nE : E '+' id | id ;")
            .unwrap()
            .augmented()
            .unwrap();
        let item = RulePtr::with_lookahead(1, 1, Symbol::end());
        assert_eq!(item.text(&grammar), "<E : E . '+' id, $>");
        assert_eq!(item.advanced().text(&grammar), "<E : E '+' . id, $>");
        assert!(!item.is_satisfied(&grammar));
        assert!(item.advanced().advanced().is_satisfied(&grammar));
        assert!(item.is_kernel(&grammar));
        assert!(RulePtr::new(0, 0).is_kernel(&grammar));
        assert!(!RulePtr::new(1, 0).is_kernel(&grammar));
    }

    #[test]
    fn kernels_are_sorted_and_deduped() {
        let grammar = read_grammar("%token id\nE : E '+' id | id ;")
            .unwrap()
            .augmented()
            .unwrap();
        let a = RulePtr::new(2, 1);
        let b = RulePtr::new(1, 1);
        let set = ItemSet::from_kernel(vec![a.clone(), b.clone(), a.clone()]);
        assert_eq!(set.kernel(), &[b, a]);
        let name = set.canonical_name(&grammar);
        assert_eq!(name, "<E : E . '+' id>|<E : id .>");
    }
}
