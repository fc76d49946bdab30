//! ACTION/GOTO table assembly.
//!
//! Rows are indexed by state uuid and keyed by symbol name; terminal cells
//! hold shift/reduce/accept actions, nonterminal cells are the GOTO
//! entries. Cells accumulate action sets during construction so conflicts
//! stay observable; the conflict solver collapses each cell to one action.

use std::fmt;

use std::collections::BTreeMap;

use crate::analyzer::Analysis;
use crate::grammar::Grammar;
use crate::lr1::StateGraph;
use crate::symbol::END_MARK;
use crate::Algorithm;

/// One parsing action. Reduce and Error carry the production they came
/// from for diagnostics; equality is by variant and target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Shift(u32),
    Reduce(usize),
    Accept,
    /// An explicit error cell, the residue of a `%nonassoc` tie.
    Error(usize),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Action::Shift(state) => write!(f, "shift {}", state),
            Action::Reduce(production) => write!(f, "reduce {}", production),
            Action::Accept => write!(f, "accept"),
            Action::Error(_) => write!(f, "error"),
        }
    }
}

/// A table cell: a set of actions during construction, exactly one after
/// conflict resolution. Insertion order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionCell {
    actions: Vec<Action>,
}

impl ActionCell {
    pub fn push(&mut self, action: Action) {
        if !self.actions.contains(&action) {
            self.actions.push(action);
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn is_resolved(&self) -> bool {
        self.actions.len() == 1
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// The single action of a resolved cell.
    pub fn action(&self) -> &Action {
        debug_assert!(self.is_resolved());
        &self.actions[0]
    }

    pub(crate) fn resolve_to(&mut self, action: Action) {
        self.actions = vec![action];
    }
}

/// The assembled parsing table.
#[derive(Debug, PartialEq, Eq)]
pub struct LRTable {
    rows: Vec<BTreeMap<String, ActionCell>>,
    algorithm: Algorithm,
}

impl LRTable {
    pub fn state_count(&self) -> usize {
        self.rows.len()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn cell(&self, state: u32, symbol: &str) -> Option<&ActionCell> {
        self.rows.get(state as usize)?.get(symbol)
    }

    /// The resolved action of a cell, if the cell exists and is resolved.
    pub fn action(&self, state: u32, symbol: &str) -> Option<&Action> {
        let cell = self.cell(state, symbol)?;
        if cell.is_resolved() {
            Some(cell.action())
        } else {
            None
        }
    }

    pub fn rows(&self) -> &[BTreeMap<String, ActionCell>] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [BTreeMap<String, ActionCell>] {
        &mut self.rows
    }

    fn insert(&mut self, state: u32, symbol: &str, action: Action) {
        self.rows[state as usize]
            .entry(symbol.to_string())
            .or_default()
            .push(action);
    }

    /// The terminal names a state can act on, for syntax-error messages.
    pub fn expected_in(&self, state: u32, grammar: &Grammar) -> Vec<String> {
        self.rows
            .get(state as usize)
            .map(|row| {
                row.keys()
                    .filter(|name| {
                        name.as_str() == END_MARK || grammar.is_terminal(name)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Structural invariants from the construction: one action per cell,
    /// shift targets consistent with the transition graph, and exactly one
    /// accept, sitting under `$` in the state reached by reading the start
    /// symbol from state 0.
    pub fn validate(&self, grammar: &Grammar, graph: &StateGraph) -> Result<(), String> {
        let mut accepts: Vec<(u32, String)> = vec![];
        for (state, row) in self.rows.iter().enumerate() {
            for (symbol, cell) in row {
                if !cell.is_resolved() {
                    return Err(format!(
                        "cell ({}, {}) holds {} actions",
                        state,
                        symbol,
                        cell.len()
                    ));
                }
                match cell.action() {
                    Action::Shift(target) => {
                        if graph.target(state as u32, symbol) != Some(*target) {
                            return Err(format!(
                                "cell ({}, {}) shifts to {} but the graph disagrees",
                                state, symbol, target
                            ));
                        }
                    }
                    Action::Accept => accepts.push((state as u32, symbol.clone())),
                    _ => {}
                }
            }
        }
        if accepts.len() != 1 {
            return Err(format!("{} accept actions in the table", accepts.len()));
        }
        let start_name = grammar.production(0).body()[0].name();
        let accept_state = graph
            .target(0, start_name)
            .ok_or_else(|| "no transition over the start symbol".to_string())?;
        if accepts[0] != (accept_state, END_MARK.to_string()) {
            return Err(format!(
                "accept at ({}, {}), expected ({}, $)",
                accepts[0].0, accepts[0].1, accept_state
            ));
        }
        Ok(())
    }
}

impl fmt::Display for LRTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (state, row) in self.rows.iter().enumerate() {
            writeln!(f, "State<{}>:", state)?;
            for (symbol, cell) in row {
                let actions: Vec<String> =
                    cell.actions().iter().map(|a| a.to_string()).collect();
                writeln!(f, "    {}: {}", symbol, actions.join(" / "))?;
            }
        }
        Ok(())
    }
}

/// Assembles the table for one constructed state graph.
///
/// Reduce lookaheads per algorithm: the item's own lookahead for
/// LR(1)/LALR, FOLLOW(head) for SLR, every terminal plus `$` for LR(0).
/// The accepting item `S^ → S ·` turns into Accept under `$`.
pub fn build_table(
    grammar: &Grammar,
    analysis: &Analysis,
    graph: &StateGraph,
    algorithm: Algorithm,
) -> LRTable {
    let mut table = LRTable {
        rows: (0..graph.state_count()).map(|_| BTreeMap::new()).collect(),
        algorithm,
    };
    for (state, item_set) in graph.states.iter().enumerate() {
        let state = state as u32;
        for item in item_set.closure() {
            if item.is_satisfied(grammar) {
                let production = item.production();
                if grammar.production(production).head().is_augment() {
                    table.insert(state, END_MARK, Action::Accept);
                    continue;
                }
                match algorithm {
                    Algorithm::Lr1 | Algorithm::Lalr => {
                        let lookahead = item.lookahead().expect("LR(1) item");
                        table.insert(state, lookahead.name(), Action::Reduce(production));
                    }
                    Algorithm::Slr => {
                        let head = grammar.production(production).head().name();
                        for symbol in analysis.follow(head).iter() {
                            table.insert(state, symbol.name(), Action::Reduce(production));
                        }
                    }
                    Algorithm::Lr0 => {
                        let terminals: Vec<String> =
                            grammar.terminals().map(|t| t.to_string()).collect();
                        for name in terminals {
                            table.insert(state, &name, Action::Reduce(production));
                        }
                        table.insert(state, END_MARK, Action::Reduce(production));
                    }
                }
            } else {
                let symbol = item.next_symbol(grammar).expect("unsatisfied item");
                let target = graph
                    .target(state, symbol.name())
                    .expect("transition recorded during expansion");
                table.insert(state, symbol.name(), Action::Shift(target));
            }
        }
    }
    table
}
