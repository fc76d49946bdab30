use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Index;

use thiserror::Error;

use crate::symbol::{Associativity, Precedence, Symbol, AUGMENT_MARK};

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("grammar has no productions")]
    Empty,
    #[error("start symbol \"{0}\" is a terminal")]
    StartIsTerminal(String),
    #[error("start symbol \"{0}\" has no productions")]
    StartUndefined(String),
}

/// An ordered sequence of symbols with ε stripped on construction. An
/// all-ε body collapses to the empty sequence. Immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vector(Vec<Symbol>);

impl Vector {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Self(symbols.into_iter().filter(|s| !s.is_epsilon()).collect())
    }

    pub fn empty() -> Self {
        Self(vec![])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Symbol> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<Symbol> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Symbol] {
        &self.0
    }

    pub fn tail(&self, from: usize) -> &[Symbol] {
        &self.0[from.min(self.0.len())..]
    }
}

impl Index<usize> for Vector {
    type Output = Symbol;

    fn index(&self, index: usize) -> &Symbol {
        &self.0[index]
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<empty>")
        } else {
            let names: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
            write!(f, "{}", names.join(" "))
        }
    }
}

/// A semantic action reference attached to a production position. `offset`
/// is the number of attribute-stack slots the action may address to its
/// left: the body length for end-of-rule actions, the count of symbols left
/// of the marker for lifted mid-rule actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub tag: String,
    pub offset: usize,
}

impl ActionSpec {
    pub fn new(tag: &str, offset: usize) -> Self {
        Self {
            tag: tag.to_string(),
            offset,
        }
    }
}

/// One grammar rule: head, body, stable index, precedence tag and the
/// position-keyed semantic actions. Actions at one position fire in
/// insertion order.
#[derive(Debug, Clone)]
pub struct Production {
    head: Symbol,
    body: Vector,
    index: usize,
    precedence_tag: Option<String>,
    explicit_precedence: bool,
    actions: BTreeMap<usize, Vec<ActionSpec>>,
}

impl Production {
    pub fn new(head: Symbol, body: Vector) -> Self {
        Self {
            head,
            body,
            index: 0,
            precedence_tag: None,
            explicit_precedence: false,
            actions: BTreeMap::new(),
        }
    }

    pub fn head(&self) -> &Symbol {
        &self.head
    }

    pub fn body(&self) -> &Vector {
        &self.body
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn precedence_tag(&self) -> Option<&str> {
        self.precedence_tag.as_deref()
    }

    pub fn has_explicit_precedence(&self) -> bool {
        self.explicit_precedence
    }

    pub fn set_precedence_tag(&mut self, tag: &str) {
        self.precedence_tag = Some(tag.to_string());
        self.explicit_precedence = true;
    }

    pub(crate) fn clear_precedence_tag(&mut self) {
        self.precedence_tag = None;
        self.explicit_precedence = false;
    }

    pub fn add_action(&mut self, position: usize, spec: ActionSpec) {
        debug_assert!(position <= self.body.len());
        self.actions.entry(position).or_default().push(spec);
    }

    pub fn actions(&self) -> &BTreeMap<usize, Vec<ActionSpec>> {
        &self.actions
    }

    pub fn actions_at(&self, position: usize) -> &[ActionSpec] {
        self.actions
            .get(&position)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// True when some action sits strictly before the end of the body and
    /// therefore needs lifting to a marker production.
    pub fn has_mid_actions(&self) -> bool {
        self.actions.keys().any(|&pos| pos < self.body.len())
    }

    pub(crate) fn replace_body(&mut self, body: Vector, actions: BTreeMap<usize, Vec<ActionSpec>>) {
        self.body = body;
        self.actions = actions;
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    pub(crate) fn sync_symbols(&mut self, terminals: &BTreeSet<String>) {
        self.head.set_terminal(terminals.contains(self.head.name()));
        let body: Vec<Symbol> = self
            .body
            .0
            .iter()
            .map(|symbol| {
                let mut symbol = symbol.clone();
                symbol.set_terminal(terminals.contains(symbol.name()));
                symbol
            })
            .collect();
        self.body = Vector(body);
    }

    /// The default precedence tag source: the rightmost terminal of the body.
    pub fn rightmost_terminal(&self) -> Option<&Symbol> {
        self.body.iter().rev().find(|s| s.is_terminal())
    }
}

impl fmt::Display for Production {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.head, self.body)
    }
}

/// Inline lexer instructions collected from the grammar text, in source
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanDirective {
    Ignore { pattern: String },
    Match { name: String, pattern: String },
    MatchTagged { tag: String, pattern: String },
    Import { name: String, alias: Option<String> },
}

/// The in-memory grammar: productions, symbol and terminal registries, the
/// head → rules index, precedence declarations, start symbol and scanner
/// directives. `update` re-establishes every cross-registry invariant.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    productions: Vec<Production>,
    symbols: BTreeMap<String, Symbol>,
    terminals: BTreeSet<String>,
    rules: BTreeMap<String, Vec<usize>>,
    precedence: BTreeMap<String, Precedence>,
    precedence_levels: u16,
    start: Option<Symbol>,
    directives: Vec<ScanDirective>,
    anchors: BTreeMap<usize, rexlex::Location>,
    marker_seq: u32,
}

impl Grammar {
    pub fn new() -> Self {
        Grammar::default()
    }

    /// Registers `name` and returns its symbol, terminal status per the
    /// terminal registry and the literal rule.
    pub fn intern(&mut self, name: &str) -> Symbol {
        let terminal = self.terminals.contains(name);
        let symbol = self
            .symbols
            .entry(name.to_string())
            .or_insert_with(|| Symbol::new(name));
        if terminal {
            symbol.set_terminal(true);
        }
        symbol.clone()
    }

    pub fn declare_terminal(&mut self, name: &str) {
        self.terminals.insert(name.to_string());
        if let Some(symbol) = self.symbols.get_mut(name) {
            symbol.set_terminal(true);
        }
    }

    pub fn declare_precedence(&mut self, associativity: Associativity, names: &[String]) {
        self.precedence_levels += 1;
        let level = self.precedence_levels;
        for name in names {
            self.precedence.insert(
                name.clone(),
                Precedence {
                    level,
                    associativity,
                },
            );
        }
    }

    pub fn precedence_of(&self, name: &str) -> Option<Precedence> {
        self.precedence.get(name).copied()
    }

    pub fn has_precedence(&self, name: &str) -> bool {
        self.precedence.contains_key(name)
    }

    pub fn set_start(&mut self, name: &str) {
        self.start = Some(self.intern(name));
    }

    pub fn start(&self) -> Option<&Symbol> {
        self.start.as_ref()
    }

    pub fn add_directive(&mut self, directive: ScanDirective) {
        self.directives.push(directive);
    }

    pub fn directives(&self) -> &[ScanDirective] {
        &self.directives
    }

    pub fn push_production(&mut self, production: Production, anchor: Option<rexlex::Location>) {
        let index = self.productions.len();
        if let Some(location) = anchor {
            self.anchors.insert(index, location);
        }
        self.productions.push(production);
    }

    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    pub fn production(&self, index: usize) -> &Production {
        &self.productions[index]
    }

    pub(crate) fn production_mut(&mut self, index: usize) -> &mut Production {
        &mut self.productions[index]
    }

    /// Swaps in a rewritten production list. The caller runs `update`
    /// afterwards to refresh indices and registries.
    pub(crate) fn replace_productions(&mut self, productions: Vec<Production>) {
        self.productions = productions;
        self.anchors.clear();
    }

    pub fn rules_for(&self, head: &str) -> &[usize] {
        self.rules.get(head).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn has_rules_entry(&self, head: &str) -> bool {
        self.rules.contains_key(head)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn terminals(&self) -> impl Iterator<Item = &str> {
        self.terminals.iter().map(|s| s.as_str())
    }

    pub fn is_terminal(&self, name: &str) -> bool {
        self.terminals.contains(name)
    }

    pub fn anchor(&self, index: usize) -> Option<&rexlex::Location> {
        self.anchors.get(&index)
    }

    /// A fresh `M@k` marker nonterminal for a lifted mid-rule action.
    pub(crate) fn fresh_marker(&mut self) -> Symbol {
        self.marker_seq += 1;
        let name = format!("M@{}", self.marker_seq);
        self.intern(&name)
    }

    /// A fresh nonterminal derived from `base` for grammar rewrites, with
    /// as many `'` suffixes as needed to avoid a clash.
    pub(crate) fn fresh_non_terminal(&mut self, base: &str) -> Symbol {
        let mut name = format!("{}'", base);
        while self.symbols.contains_key(&name) {
            name.push('\'');
        }
        self.intern(&name)
    }

    /// Re-establishes the model invariants: every symbol's terminal bit
    /// matches the terminal registry, every nonterminal has a (possibly
    /// empty) rule-map entry, production indices are positional, literal
    /// body symbols are registered as terminals, and productions without an
    /// explicit precedence tag default to their rightmost terminal.
    pub fn update(&mut self) -> Result<(), GrammarError> {
        if self.productions.is_empty() {
            return Err(GrammarError::Empty);
        }

        // Literals seen only in bodies still belong in the terminal registry.
        let mut literals: Vec<String> = vec![];
        for production in &self.productions {
            for symbol in production.body().iter() {
                if symbol.is_literal() {
                    literals.push(symbol.name().to_string());
                }
            }
        }
        for name in literals {
            self.terminals.insert(name);
        }

        for (name, symbol) in self.symbols.iter_mut() {
            symbol.set_terminal(self.terminals.contains(name));
        }

        let terminals = self.terminals.clone();
        self.rules.clear();
        for (index, production) in self.productions.iter_mut().enumerate() {
            production.set_index(index);
            production.sync_symbols(&terminals);
            self.rules
                .entry(production.head().name().to_string())
                .or_default()
                .push(index);
        }
        for (name, symbol) in self.symbols.iter() {
            if symbol.is_non_terminal() && !symbol.is_epsilon() {
                self.rules.entry(name.clone()).or_default();
            }
        }

        for production in self.productions.iter_mut() {
            if production.precedence_tag.is_none() {
                if let Some(terminal) = production.rightmost_terminal() {
                    let tag = terminal.name().to_string();
                    production.precedence_tag = Some(tag);
                }
            }
        }

        let start = match &self.start {
            Some(symbol) => self
                .symbols
                .get(symbol.name())
                .cloned()
                .unwrap_or_else(|| symbol.clone()),
            None => self.productions[0].head().clone(),
        };
        if start.is_terminal() {
            return Err(GrammarError::StartIsTerminal(start.name().to_string()));
        }
        if self.rules_for(start.name()).is_empty() {
            return Err(GrammarError::StartUndefined(start.name().to_string()));
        }
        self.start = Some(start);
        Ok(())
    }

    /// Returns the augmented grammar: `S^ → S` prepended as production 0,
    /// with `S^` as the new start symbol. User production indices shift up
    /// by one and are stable afterwards.
    pub fn augmented(&self) -> Result<Grammar, GrammarError> {
        let mut grammar = self.clone();
        let start = grammar.start.clone().ok_or(GrammarError::Empty)?;
        let augment = Symbol::non_terminal(AUGMENT_MARK);
        grammar
            .symbols
            .insert(AUGMENT_MARK.to_string(), augment.clone());
        let accept = Production::new(augment.clone(), Vector::new(vec![start]));
        let mut productions = Vec::with_capacity(grammar.productions.len() + 1);
        productions.push(accept);
        productions.append(&mut grammar.productions);
        grammar.productions = productions;
        let anchors = std::mem::take(&mut grammar.anchors);
        grammar.anchors = anchors.into_iter().map(|(k, v)| (k + 1, v)).collect();
        grammar.start = Some(augment);
        grammar.update()?;
        Ok(grammar)
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Productions:")?;
        for production in &self.productions {
            writeln!(f, "  {}: {}", production.index(), production)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(names: &[&str]) -> Vec<Symbol> {
        names.iter().map(|n| Symbol::new(n)).collect()
    }

    #[test]
    fn vector_strips_epsilon() {
        let body = Vector::new(vec![Symbol::epsilon(), Symbol::new("x"), Symbol::epsilon()]);
        assert_eq!(body.len(), 1);
        let all_epsilon = Vector::new(vec![Symbol::epsilon()]);
        assert!(all_epsilon.is_empty());
        assert_eq!(format!("{}", all_epsilon), "<empty>");
    }

    #[test]
    fn update_fills_registries_and_precedence_tags() {
        let mut grammar = Grammar::new();
        grammar.declare_terminal("number");
        let expr = grammar.intern("expr");
        let body = Vector::new(symbols(&["expr", "'+'", "number"]));
        grammar.push_production(Production::new(expr.clone(), body), None);
        let body = Vector::new(symbols(&["number"]));
        grammar.push_production(Production::new(expr, body), None);
        grammar.update().unwrap();

        assert!(grammar.is_terminal("'+'"));
        assert_eq!(grammar.rules_for("expr"), &[0, 1]);
        assert_eq!(grammar.start().unwrap().name(), "expr");
        assert_eq!(grammar.production(0).precedence_tag(), Some("number"));
        assert_eq!(grammar.production(1).precedence_tag(), Some("number"));
        assert!(grammar.production(0).body()[1].is_terminal());
    }

    #[test]
    fn augmentation_prepends_the_accept_production() {
        let mut grammar = Grammar::new();
        let s = grammar.intern("s");
        grammar.push_production(Production::new(s, Vector::new(symbols(&["'x'"]))), None);
        grammar.update().unwrap();
        let augmented = grammar.augmented().unwrap();
        assert_eq!(augmented.productions().len(), 2);
        assert_eq!(augmented.production(0).head().name(), AUGMENT_MARK);
        assert_eq!(augmented.production(0).body()[0].name(), "s");
        assert_eq!(augmented.start().unwrap().name(), AUGMENT_MARK);
        assert_eq!(augmented.production(1).index(), 1);
    }

    #[test]
    fn later_precedence_declarations_outrank_earlier() {
        let mut grammar = Grammar::new();
        grammar.declare_precedence(Associativity::Left, &["'+'".to_string()]);
        grammar.declare_precedence(Associativity::Left, &["'*'".to_string()]);
        let plus = grammar.precedence_of("'+'").unwrap();
        let times = grammar.precedence_of("'*'").unwrap();
        assert!(times.level > plus.level);
        assert_eq!(plus.associativity, Associativity::Left);
    }

    #[test]
    fn start_must_be_a_nonterminal_with_rules() {
        let mut grammar = Grammar::new();
        grammar.declare_terminal("id");
        let s = grammar.intern("s");
        grammar.push_production(Production::new(s, Vector::new(symbols(&["id"]))), None);
        grammar.set_start("id");
        assert!(matches!(
            grammar.update(),
            Err(GrammarError::StartIsTerminal(_))
        ));
    }
}
