//! Grammar analysis: ε classification, FIRST, FOLLOW and SELECT sets to
//! fixpoint, plus the reachability and productivity checks that gate table
//! construction. All fixpoints run on finite monotone lattices; an
//! emergency iteration cap turns a non-converging loop into an error
//! instead of a hang.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use lazy_static::lazy_static;
use thiserror::Error;

use crate::diag::Diagnostics;
use crate::grammar::Grammar;
use crate::symbol::{Symbol, SymbolSet};

pub(crate) const FIXPOINT_CAP: usize = 10_000;

lazy_static! {
    static ref EMPTY_SET: SymbolSet = SymbolSet::new();
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{0} non-terminal(s) used but not defined")]
    UndefinedNonTerminals(u32),
    #[error("start symbol \"{0}\" cannot derive a terminal string")]
    UnproductiveStart(String),
    #[error("internal: {0} computation failed to converge")]
    FixpointRunaway(&'static str),
    #[error("internal: FIRST/nullable integrity check failed for \"{0}\"")]
    Integrity(String),
}

/// Tri-state ε flags: `is_epsilon` means every production of the symbol
/// derives ε, `has_epsilon` that at least one does. `None` is "not
/// classified yet".
#[derive(Debug, Clone, Copy, Default)]
pub struct EpsilonFlags {
    pub is_epsilon: Option<bool>,
    pub has_epsilon: Option<bool>,
}

/// The computed sets for one grammar. Build once with `analyze`; the
/// grammar must not change afterwards.
#[derive(Debug)]
pub struct Analysis {
    epsilon: BTreeMap<String, EpsilonFlags>,
    first: BTreeMap<String, SymbolSet>,
    follow: BTreeMap<String, SymbolSet>,
    select: Vec<SymbolSet>,
}

impl Analysis {
    pub fn analyze(grammar: &Grammar) -> Result<Analysis, AnalysisError> {
        let epsilon = classify_epsilon(grammar)?;
        let first = compute_first(grammar)?;
        let follow = compute_follow(grammar, &first)?;
        let select = compute_select(grammar, &first, &follow);
        let analysis = Analysis {
            epsilon,
            first,
            follow,
            select,
        };
        analysis.integrity_check(grammar)?;
        Ok(analysis)
    }

    /// ε ∈ FIRST(N) iff N is nullable, for every nonterminal.
    fn integrity_check(&self, grammar: &Grammar) -> Result<(), AnalysisError> {
        for symbol in grammar.symbols().filter(|s| s.is_non_terminal()) {
            let nullable = self.nullable(symbol.name());
            let has_epsilon = self.first(symbol.name()).contains_epsilon();
            if nullable != has_epsilon {
                return Err(AnalysisError::Integrity(symbol.name().to_string()));
            }
        }
        Ok(())
    }

    pub fn nullable(&self, name: &str) -> bool {
        self.epsilon
            .get(name)
            .and_then(|flags| flags.has_epsilon)
            .unwrap_or(false)
    }

    pub fn epsilon_flags(&self, name: &str) -> EpsilonFlags {
        self.epsilon.get(name).copied().unwrap_or_default()
    }

    pub fn first(&self, name: &str) -> &SymbolSet {
        self.first.get(name).unwrap_or(&EMPTY_SET)
    }

    pub fn follow(&self, name: &str) -> &SymbolSet {
        self.follow.get(name).unwrap_or(&EMPTY_SET)
    }

    pub fn select(&self, production: usize) -> &SymbolSet {
        &self.select[production]
    }

    /// FIRST of a symbol string.
    pub fn first_of(&self, symbols: &[Symbol]) -> SymbolSet {
        first_of_slice(&self.first, symbols)
    }

    /// FIRST(βa): FIRST of the string with a trailing lookahead terminal.
    pub fn first_of_with(&self, symbols: &[Symbol], lookahead: &Symbol) -> SymbolSet {
        let mut set = first_of_slice(&self.first, symbols);
        if set.contains_epsilon() {
            let epsilon = Symbol::epsilon();
            set.remove(&epsilon);
            set.insert(lookahead);
        }
        set
    }

    /// A grammar is LL(1) iff SELECT sets are pairwise disjoint per head.
    pub fn is_ll1(&self, grammar: &Grammar) -> bool {
        for symbol in grammar.symbols().filter(|s| s.is_non_terminal()) {
            let rules = grammar.rules_for(symbol.name());
            for (i, &a) in rules.iter().enumerate() {
                for &b in &rules[i + 1..] {
                    if !self.select[a].is_disjoint(&self.select[b]) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Reachability, productivity and definedness sweeps. Warnings are
    /// non-fatal; undefined nonterminals and an unproductive start abort
    /// generation after the full sweep so every diagnostic surfaces.
    pub fn check(&self, grammar: &Grammar, diags: &mut Diagnostics) -> Result<(), AnalysisError> {
        let mut undefined = 0;
        for symbol in grammar.symbols().filter(|s| s.is_non_terminal()) {
            if grammar.rules_for(symbol.name()).is_empty() {
                diags.error(
                    format!("non-terminal \"{}\" is used but not defined", symbol),
                    None,
                );
                undefined += 1;
            }
        }

        let start = grammar.start().expect("updated grammar has a start");
        let mut reached: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        reached.insert(start.name().to_string());
        queue.push_back(start.name().to_string());
        while let Some(name) = queue.pop_front() {
            for &index in grammar.rules_for(&name) {
                for symbol in grammar.production(index).body().iter() {
                    if reached.insert(symbol.name().to_string()) && symbol.is_non_terminal() {
                        queue.push_back(symbol.name().to_string());
                    }
                }
            }
        }
        for symbol in grammar.symbols() {
            if reached.contains(symbol.name()) {
                continue;
            }
            if symbol.is_non_terminal() && !grammar.rules_for(symbol.name()).is_empty() {
                diags.warning(format!("non-terminal \"{}\" is unreachable", symbol), None);
            } else if symbol.is_terminal() {
                diags.warning(format!("terminal \"{}\" is not used", symbol), None);
            }
        }

        let productive = self.productive_symbols(grammar)?;
        if !productive.contains(start.name()) {
            diags.error(format!("start symbol \"{}\" is unproductive", start), None);
            if undefined == 0 {
                return Err(AnalysisError::UnproductiveStart(start.name().to_string()));
            }
        }
        if undefined > 0 {
            return Err(AnalysisError::UndefinedNonTerminals(undefined));
        }
        Ok(())
    }

    fn productive_symbols(&self, grammar: &Grammar) -> Result<BTreeSet<String>, AnalysisError> {
        let mut productive: BTreeSet<String> = BTreeSet::new();
        for _ in 0..FIXPOINT_CAP {
            let mut changed = false;
            for production in grammar.productions() {
                if productive.contains(production.head().name()) {
                    continue;
                }
                let ok = production
                    .body()
                    .iter()
                    .all(|s| s.is_terminal() || productive.contains(s.name()));
                if ok {
                    productive.insert(production.head().name().to_string());
                    changed = true;
                }
            }
            if !changed {
                return Ok(productive);
            }
        }
        Err(AnalysisError::FixpointRunaway("productivity"))
    }
}

fn combine_and(flags: impl Iterator<Item = Option<bool>>) -> Option<bool> {
    let mut all_true = true;
    for flag in flags {
        match flag {
            Some(false) => return Some(false),
            Some(true) => {}
            None => all_true = false,
        }
    }
    if all_true {
        Some(true)
    } else {
        None
    }
}

fn classify_epsilon(grammar: &Grammar) -> Result<BTreeMap<String, EpsilonFlags>, AnalysisError> {
    let mut flags: BTreeMap<String, EpsilonFlags> = BTreeMap::new();
    for symbol in grammar.symbols() {
        let entry = flags.entry(symbol.name().to_string()).or_default();
        if symbol.is_terminal() {
            entry.is_epsilon = Some(false);
            entry.has_epsilon = Some(false);
        }
    }

    let lookup = |flags: &BTreeMap<String, EpsilonFlags>, symbol: &Symbol| -> EpsilonFlags {
        if symbol.is_terminal() {
            EpsilonFlags {
                is_epsilon: Some(false),
                has_epsilon: Some(false),
            }
        } else {
            flags.get(symbol.name()).copied().unwrap_or_default()
        }
    };

    for _ in 0..FIXPOINT_CAP {
        let mut changed = false;
        for symbol in grammar.symbols().filter(|s| s.is_non_terminal()) {
            let rules = grammar.rules_for(symbol.name());
            // A production derives ε iff its whole body can; a nonterminal
            // has ε iff some rule derives it and is ε iff all rules do.
            let mut any_has: Option<bool> = Some(false);
            let mut all_is: Option<bool> = if rules.is_empty() {
                Some(false)
            } else {
                Some(true)
            };
            for &index in rules {
                let body = grammar.production(index).body();
                let p_has = combine_and(body.iter().map(|s| lookup(&flags, s).has_epsilon));
                let p_is = combine_and(body.iter().map(|s| lookup(&flags, s).is_epsilon));
                any_has = match (any_has, p_has) {
                    (_, Some(true)) | (Some(true), _) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                };
                all_is = match (all_is, p_is) {
                    (_, Some(false)) | (Some(false), _) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                };
            }
            let entry = flags.entry(symbol.name().to_string()).or_default();
            if entry.has_epsilon.is_none() && any_has.is_some() {
                entry.has_epsilon = any_has;
                changed = true;
            }
            if entry.is_epsilon.is_none() && all_is.is_some() {
                entry.is_epsilon = all_is;
                changed = true;
            }
        }
        if !changed {
            // Whatever is still unclassified sits on a derivation cycle that
            // never reaches ε; resolve it downward.
            for entry in flags.values_mut() {
                entry.has_epsilon.get_or_insert(false);
                entry.is_epsilon.get_or_insert(false);
            }
            return Ok(flags);
        }
    }
    Err(AnalysisError::FixpointRunaway("epsilon classification"))
}

fn first_of_slice(first: &BTreeMap<String, SymbolSet>, symbols: &[Symbol]) -> SymbolSet {
    let mut result = SymbolSet::new();
    let mut all_nullable = true;
    for symbol in symbols {
        if symbol.is_terminal() {
            result.insert(symbol);
            all_nullable = false;
            break;
        }
        let set = match first.get(symbol.name()) {
            Some(set) => set,
            None => {
                all_nullable = false;
                break;
            }
        };
        result |= &set.without_epsilon();
        if !set.contains_epsilon() {
            all_nullable = false;
            break;
        }
    }
    if all_nullable {
        result.insert(&Symbol::epsilon());
    }
    result
}

fn compute_first(grammar: &Grammar) -> Result<BTreeMap<String, SymbolSet>, AnalysisError> {
    let mut first: BTreeMap<String, SymbolSet> = BTreeMap::new();
    for symbol in grammar.symbols() {
        let mut set = SymbolSet::new();
        if symbol.is_terminal() {
            set.insert(symbol);
        }
        first.insert(symbol.name().to_string(), set);
    }
    for special in [Symbol::end(), Symbol::sentinel()] {
        let mut set = SymbolSet::new();
        set.insert(&special);
        first.insert(special.name().to_string(), set);
    }
    let mut epsilon_set = SymbolSet::new();
    epsilon_set.insert(&Symbol::epsilon());
    first.insert(String::new(), epsilon_set);

    for _ in 0..FIXPOINT_CAP {
        let mut changed = false;
        for production in grammar.productions() {
            let body_first = first_of_slice(&first, production.body().as_slice());
            let entry = first
                .get_mut(production.head().name())
                .expect("head symbol is registered");
            if entry.absorb(&body_first) {
                changed = true;
            }
        }
        if !changed {
            return Ok(first);
        }
    }
    Err(AnalysisError::FixpointRunaway("FIRST"))
}

fn compute_follow(
    grammar: &Grammar,
    first: &BTreeMap<String, SymbolSet>,
) -> Result<BTreeMap<String, SymbolSet>, AnalysisError> {
    let mut follow: BTreeMap<String, SymbolSet> = BTreeMap::new();
    for symbol in grammar.symbols().filter(|s| s.is_non_terminal()) {
        follow.insert(symbol.name().to_string(), SymbolSet::new());
    }
    let start = grammar.start().expect("updated grammar has a start");
    follow
        .get_mut(start.name())
        .expect("start is registered")
        .insert(&Symbol::end());

    for _ in 0..FIXPOINT_CAP {
        let mut changed = false;
        for production in grammar.productions() {
            let head_follow = follow
                .get(production.head().name())
                .cloned()
                .unwrap_or_default();
            let body = production.body();
            for (position, symbol) in body.iter().enumerate() {
                if !symbol.is_non_terminal() {
                    continue;
                }
                let tail = body.tail(position + 1);
                let tail_first = first_of_slice(first, tail);
                let entry = follow
                    .get_mut(symbol.name())
                    .expect("body symbol is registered");
                if entry.absorb(&tail_first.without_epsilon()) {
                    changed = true;
                }
                if (tail.is_empty() || tail_first.contains_epsilon())
                    && entry.absorb(&head_follow)
                {
                    changed = true;
                }
            }
        }
        if !changed {
            return Ok(follow);
        }
    }
    Err(AnalysisError::FixpointRunaway("FOLLOW"))
}

fn compute_select(
    grammar: &Grammar,
    first: &BTreeMap<String, SymbolSet>,
    follow: &BTreeMap<String, SymbolSet>,
) -> Vec<SymbolSet> {
    grammar
        .productions()
        .iter()
        .map(|production| {
            let body_first = first_of_slice(first, production.body().as_slice());
            if !body_first.contains_epsilon() {
                body_first
            } else {
                let mut set = body_first.without_epsilon();
                if let Some(head_follow) = follow.get(production.head().name()) {
                    set |= head_follow;
                }
                set
            }
        })
        .collect()
}
