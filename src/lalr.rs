//! LALR(1) construction.
//!
//! Instead of the full canonical LR(1) graph: build the LR(0) skeleton,
//! then discover lookaheads per kernel item by closing `[A → α · β, #]`
//! with the sentinel `#`. A non-sentinel lookahead reaching a successor
//! kernel item is spontaneous; the sentinel marks a propagation link. After
//! seeding `$` on the start item, lookaheads flow along the links with a
//! dirty work-set until stable, and the kernel items are materialized into
//! LR(1) states that reuse the LR(0) transitions verbatim.

use std::collections::{BTreeMap, VecDeque};

use crate::analyzer::{Analysis, FIXPOINT_CAP};
use crate::grammar::Grammar;
use crate::item::{ItemSet, RulePtr};
use crate::lr1::{build_lr0, closure_lr1, ConstructError, StateGraph};
use crate::symbol::{Symbol, SymbolSet};

pub fn build_lalr(grammar: &Grammar, analysis: &Analysis) -> Result<StateGraph, ConstructError> {
    let skeleton = build_lr0(grammar, analysis)?;

    let kernels: Vec<Vec<RulePtr>> = skeleton
        .states
        .iter()
        .map(|state| state.kernel().to_vec())
        .collect();
    let positions: Vec<BTreeMap<(usize, usize), usize>> = kernels
        .iter()
        .map(|kernel| {
            kernel
                .iter()
                .enumerate()
                .map(|(index, item)| (item.core(), index))
                .collect()
        })
        .collect();
    let mut lookaheads: Vec<Vec<SymbolSet>> = kernels
        .iter()
        .map(|kernel| vec![SymbolSet::new(); kernel.len()])
        .collect();
    let mut links: BTreeMap<(usize, usize), Vec<(usize, usize)>> = BTreeMap::new();

    // Discovery: one sentinel closure per kernel item.
    let sentinel = Symbol::sentinel();
    for (state, kernel) in kernels.iter().enumerate() {
        for (index, item) in kernel.iter().enumerate() {
            if item.is_satisfied(grammar) {
                continue;
            }
            let probe = RulePtr::with_lookahead(item.production(), item.dot(), sentinel.clone());
            let closure = closure_lr1(grammar, analysis, &[probe])?;
            for closed in &closure {
                let symbol = match closed.next_symbol(grammar) {
                    Some(symbol) => symbol,
                    None => continue,
                };
                let target = skeleton
                    .target(state as u32, symbol.name())
                    .ok_or_else(|| {
                        ConstructError::Runaway("LALR discovery: missing skeleton transition")
                    })? as usize;
                let advanced = (closed.production(), closed.dot() + 1);
                let slot = *positions[target]
                    .get(&advanced)
                    .expect("advanced item is a kernel item of the target state");
                let lookahead = closed.lookahead().expect("sentinel closure carries lookaheads");
                if lookahead.is_sentinel() {
                    links.entry((state, index)).or_default().push((target, slot));
                } else {
                    lookaheads[target][slot].insert(lookahead);
                }
            }
        }
    }

    // Seed: the start item of state 0 sees end-of-input.
    let start_slot = *positions[0]
        .get(&(0, 0))
        .expect("state 0 holds the start kernel item");
    lookaheads[0][start_slot].insert(&Symbol::end());

    // Propagation to fixpoint over the link graph, iterative by design.
    let mut queue: VecDeque<(usize, usize)> = links.keys().copied().collect();
    let mut budget = FIXPOINT_CAP
        .saturating_mul(kernels.iter().map(|k| k.len()).sum::<usize>().max(1));
    while let Some(source) = queue.pop_front() {
        if budget == 0 {
            return Err(ConstructError::Runaway("LALR lookahead propagation"));
        }
        budget -= 1;
        let outgoing = match links.get(&source) {
            Some(targets) => targets.clone(),
            None => continue,
        };
        let source_set = lookaheads[source.0][source.1].clone();
        for (state, slot) in outgoing {
            if lookaheads[state][slot].absorb(&source_set) {
                queue.push_back((state, slot));
            }
        }
    }

    // Materialize: expand each kernel item per final lookahead, close, and
    // reuse the LR(0) transitions and uuids untouched.
    let mut states: Vec<ItemSet> = Vec::with_capacity(kernels.len());
    for (state, kernel) in kernels.iter().enumerate() {
        let mut expanded: Vec<RulePtr> = vec![];
        for (index, item) in kernel.iter().enumerate() {
            for lookahead in lookaheads[state][index].iter() {
                expanded.push(RulePtr::with_lookahead(
                    item.production(),
                    item.dot(),
                    lookahead.clone(),
                ));
            }
        }
        let mut item_set = ItemSet::from_kernel(expanded);
        item_set.set_uuid(state as u32);
        let closure = closure_lr1(grammar, analysis, item_set.kernel())?;
        item_set.set_closure(closure);
        states.push(item_set);
    }

    Ok(StateGraph {
        states,
        link: skeleton.link,
        backlink: skeleton.backlink,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lr1::build_lr1;
    use crate::reader::read_grammar;

    const EXPR: &str =
        "%token number\nE : E '+' T | T ;\nT : T '*' F | F ;\nF : number | '(' E ')' ;";

    // The textbook grammar where LALR merging actually collapses states.
    const SLR_TRAP: &str = "%token id\nS : L '=' R | R ;\nL : '*' R | id ;\nR : L ;";

    fn build(source: &str) -> (Grammar, Analysis) {
        let grammar = read_grammar(source).unwrap().augmented().unwrap();
        let analysis = Analysis::analyze(&grammar).unwrap();
        (grammar, analysis)
    }

    #[test]
    fn lalr_state_count_equals_lr0_and_is_at_most_lr1() {
        for source in [EXPR, SLR_TRAP] {
            let (grammar, analysis) = build(source);
            let lr0 = build_lr0(&grammar, &analysis).unwrap();
            let lalr = build_lalr(&grammar, &analysis).unwrap();
            let lr1 = build_lr1(&grammar, &analysis).unwrap();
            assert_eq!(lalr.state_count(), lr0.state_count());
            assert!(lalr.state_count() <= lr1.state_count());
        }
        // The trap grammar is the one where canonical LR(1) really is bigger.
        let (grammar, analysis) = build(SLR_TRAP);
        let lalr = build_lalr(&grammar, &analysis).unwrap();
        let lr1 = build_lr1(&grammar, &analysis).unwrap();
        assert!(lalr.state_count() < lr1.state_count());
    }

    #[test]
    fn discovered_lookaheads_distinguish_contexts() {
        let (grammar, analysis) = build(SLR_TRAP);
        let lalr = build_lalr(&grammar, &analysis).unwrap();
        // The state holding R → L · must exist with a propagated $
        // lookahead; the '=' discovered for S → L · = R stays off it.
        let mut found = false;
        for state in &lalr.states {
            for item in state.closure() {
                let production = grammar.production(item.production());
                if format!("{}", production) == "R: L" && item.is_satisfied(&grammar) {
                    found = true;
                }
            }
        }
        assert!(found);
    }

    #[test]
    fn lalr_transitions_reuse_the_skeleton() {
        let (grammar, analysis) = build(EXPR);
        let lr0 = build_lr0(&grammar, &analysis).unwrap();
        let lalr = build_lalr(&grammar, &analysis).unwrap();
        assert_eq!(lr0.link, lalr.link);
    }
}
