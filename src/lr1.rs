//! Canonical LR(1) construction, plus the lookahead-free LR(0) skeleton the
//! LALR and LR(0)/SLR paths reuse.
//!
//! States are discovered breadth first from the initial kernel; identity is
//! by kernel, transitions live in an arena-indexed `link` table with the
//! inverse kept in `backlink`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use thiserror::Error;

use crate::analyzer::{Analysis, FIXPOINT_CAP};
use crate::grammar::Grammar;
use crate::item::{ItemSet, RulePtr};
use crate::symbol::Symbol;

#[derive(Debug, Error)]
pub enum ConstructError {
    #[error("non-terminal \"{0}\" has no productions (encountered during closure)")]
    UndefinedNonTerminal(String),
    #[error("internal: {0} did not converge")]
    Runaway(&'static str),
}

/// The LR automaton: states plus the transition table and its inverse,
/// keyed by state uuid and symbol name.
#[derive(Debug)]
pub struct StateGraph {
    pub states: Vec<ItemSet>,
    pub link: Vec<BTreeMap<String, u32>>,
    pub backlink: Vec<BTreeMap<String, BTreeSet<u32>>>,
}

impl StateGraph {
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn target(&self, state: u32, symbol: &str) -> Option<u32> {
        self.link[state as usize].get(symbol).copied()
    }
}

/// CLOSURE for LR(1) items: for `[A → α · Bβ, a]` add `[B → · γ, b]` for
/// every production of B and every b ∈ FIRST(βa), until stable.
pub fn closure_lr1(
    grammar: &Grammar,
    analysis: &Analysis,
    kernel: &[RulePtr],
) -> Result<BTreeSet<RulePtr>, ConstructError> {
    let mut set: BTreeSet<RulePtr> = kernel.iter().cloned().collect();
    for _ in 0..FIXPOINT_CAP {
        let mut additions: Vec<RulePtr> = vec![];
        for item in &set {
            let next = match item.next_symbol(grammar) {
                Some(symbol) if symbol.is_non_terminal() => symbol,
                _ => continue,
            };
            let rules = grammar.rules_for(next.name());
            if rules.is_empty() {
                return Err(ConstructError::UndefinedNonTerminal(next.name().to_string()));
            }
            let lookahead = item.lookahead().expect("LR(1) items carry lookaheads");
            let firsts = analysis.first_of_with(item.rhs_tail(grammar), lookahead);
            for &production in rules {
                for symbol in firsts.iter() {
                    let candidate = RulePtr::with_lookahead(production, 0, symbol.clone());
                    if !set.contains(&candidate) {
                        additions.push(candidate);
                    }
                }
            }
        }
        if additions.is_empty() {
            return Ok(set);
        }
        set.extend(additions);
    }
    Err(ConstructError::Runaway("LR(1) closure"))
}

/// CLOSURE for LR(0) items.
pub fn closure_lr0(
    grammar: &Grammar,
    kernel: &[RulePtr],
) -> Result<BTreeSet<RulePtr>, ConstructError> {
    let mut set: BTreeSet<RulePtr> = kernel.iter().cloned().collect();
    for _ in 0..FIXPOINT_CAP {
        let mut additions: Vec<RulePtr> = vec![];
        for item in &set {
            let next = match item.next_symbol(grammar) {
                Some(symbol) if symbol.is_non_terminal() => symbol,
                _ => continue,
            };
            let rules = grammar.rules_for(next.name());
            if rules.is_empty() {
                return Err(ConstructError::UndefinedNonTerminal(next.name().to_string()));
            }
            for &production in rules {
                let candidate = RulePtr::new(production, 0);
                if !set.contains(&candidate) {
                    additions.push(candidate);
                }
            }
        }
        if additions.is_empty() {
            return Ok(set);
        }
        set.extend(additions);
    }
    Err(ConstructError::Runaway("LR(0) closure"))
}

/// GOTO kernel: every item with the dot before `symbol`, advanced.
pub fn goto_kernel(
    grammar: &Grammar,
    closure: &BTreeSet<RulePtr>,
    symbol: &str,
) -> Vec<RulePtr> {
    closure
        .iter()
        .filter(|item| {
            item.next_symbol(grammar)
                .map(|s| s.name() == symbol)
                .unwrap_or(false)
        })
        .map(|item| item.advanced())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClosureMode {
    Lr0,
    Lr1,
}

/// Canonical LR(1) state graph from `[S^ → · S, $]`.
pub fn build_lr1(grammar: &Grammar, analysis: &Analysis) -> Result<StateGraph, ConstructError> {
    let start = RulePtr::with_lookahead(0, 0, Symbol::end());
    expand(grammar, analysis, vec![start], ClosureMode::Lr1)
}

/// LR(0) state graph from `[S^ → · S]`.
pub fn build_lr0(grammar: &Grammar, analysis: &Analysis) -> Result<StateGraph, ConstructError> {
    let start = RulePtr::new(0, 0);
    expand(grammar, analysis, vec![start], ClosureMode::Lr0)
}

fn expand(
    grammar: &Grammar,
    analysis: &Analysis,
    start_kernel: Vec<RulePtr>,
    mode: ClosureMode,
) -> Result<StateGraph, ConstructError> {
    let close = |kernel: &[RulePtr]| -> Result<BTreeSet<RulePtr>, ConstructError> {
        match mode {
            ClosureMode::Lr0 => closure_lr0(grammar, kernel),
            ClosureMode::Lr1 => closure_lr1(grammar, analysis, kernel),
        }
    };

    let mut states: Vec<ItemSet> = vec![];
    let mut link: Vec<BTreeMap<String, u32>> = vec![];
    let mut backlink: Vec<BTreeMap<String, BTreeSet<u32>>> = vec![];
    let mut names: BTreeMap<String, u32> = BTreeMap::new();
    let mut queue: VecDeque<u32> = VecDeque::new();

    let mut initial = ItemSet::from_kernel(start_kernel);
    initial.set_closure(close(initial.kernel())?);
    names.insert(initial.canonical_name(grammar), 0);
    states.push(initial);
    link.push(BTreeMap::new());
    backlink.push(BTreeMap::new());
    queue.push_back(0);

    while let Some(state) = queue.pop_front() {
        let symbols = states[state as usize].symbols_after_dot(grammar);
        for symbol in symbols {
            let kernel = goto_kernel(grammar, states[state as usize].closure(), &symbol);
            let mut item_set = ItemSet::from_kernel(kernel);
            let name = item_set.canonical_name(grammar);
            let target = match names.get(&name) {
                Some(&target) => target,
                None => {
                    let target = states.len() as u32;
                    item_set.set_uuid(target);
                    item_set.set_closure(close(item_set.kernel())?);
                    names.insert(name, target);
                    states.push(item_set);
                    link.push(BTreeMap::new());
                    backlink.push(BTreeMap::new());
                    queue.push_back(target);
                    target
                }
            };
            link[state as usize].insert(symbol.clone(), target);
            backlink[target as usize]
                .entry(symbol)
                .or_default()
                .insert(state);
        }
    }

    Ok(StateGraph {
        states,
        link,
        backlink,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_grammar;

    // The dragon-book grammar whose SLR table has a conflict LR(1) avoids.
    const SLR_TRAP: &str = "%token id\nS : L '=' R | R ;\nL : '*' R | id ;\nR : L ;";

    fn build(source: &str) -> (Grammar, Analysis) {
        let grammar = read_grammar(source).unwrap().augmented().unwrap();
        let analysis = Analysis::analyze(&grammar).unwrap();
        (grammar, analysis)
    }

    #[test]
    fn closure_expands_nonterminals_with_lookaheads() {
        let (grammar, analysis) = build(SLR_TRAP);
        let start = RulePtr::with_lookahead(0, 0, Symbol::end());
        let closure = closure_lr1(&grammar, &analysis, &[start]).unwrap();
        // S' -> .S plus S, L, R expansions with both $ and '=' lookaheads.
        assert_eq!(closure.len(), 8);
    }

    #[test]
    fn lr0_and_lr1_graphs_are_deterministic() {
        let (grammar, analysis) = build(SLR_TRAP);
        let lr0_a = build_lr0(&grammar, &analysis).unwrap();
        let lr0_b = build_lr0(&grammar, &analysis).unwrap();
        assert_eq!(lr0_a.state_count(), lr0_b.state_count());
        for (a, b) in lr0_a.states.iter().zip(lr0_b.states.iter()) {
            assert_eq!(a.canonical_name(&grammar), b.canonical_name(&grammar));
        }
        assert_eq!(lr0_a.link, lr0_b.link);

        let lr1 = build_lr1(&grammar, &analysis).unwrap();
        assert!(lr1.state_count() >= lr0_a.state_count());
    }

    #[test]
    fn transitions_are_recorded_both_ways() {
        let (grammar, analysis) = build(SLR_TRAP);
        let graph = build_lr0(&grammar, &analysis).unwrap();
        for (state, row) in graph.link.iter().enumerate() {
            for (symbol, &target) in row {
                assert!(graph.backlink[target as usize]
                    .get(symbol)
                    .map(|sources| sources.contains(&(state as u32)))
                    .unwrap_or(false));
            }
        }
    }

    #[test]
    fn undefined_nonterminal_in_closure_is_fatal() {
        // A is used but never defined; construction is reached only when the
        // caller skips the analyzer gate, and must still fail loudly.
        let grammar = read_grammar("%token id\nS : A id ;")
            .unwrap()
            .augmented()
            .unwrap();
        let analysis = Analysis::analyze(&grammar).unwrap();
        assert!(matches!(
            build_lr0(&grammar, &analysis),
            Err(ConstructError::UndefinedNonTerminal(name)) if name == "A"
        ));
    }
}
