//! The push-down parse driver.
//!
//! Three parallel stacks (state, symbol, attribute) seeded with
//! `(0, $, default)`. Shift pushes the token's attribute; reduce hands each
//! end-of-rule action a window of `offset + 1` attributes whose element 0
//! is the value below the window, pops the handle and pushes the GOTO
//! state. Actions lifted from mid-rule positions fire when their ε marker
//! reduces, which happens before the next shift. The first error stops the
//! driver.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::grammar::{Grammar, Production};
use crate::symbol::Symbol;
use crate::table::{Action, LRTable};

use rexlex::{Location, Scanner, TagActions, Token};

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ActionError {
    pub message: String,
}

impl ActionError {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Lexical Error: unexpected text {lexeme:?} at: {location}.")]
    Lexical { lexeme: String, location: Location },
    #[error("Syntax Error: expected: {expected} found: {found} at: {location}.")]
    Syntax {
        found: String,
        expected: String,
        location: Location,
    },
    #[error("semantic action \"{tag}\" is not registered")]
    MissingAction { tag: String },
    #[error("semantic action \"{tag}\" failed: {source}")]
    Action {
        tag: String,
        #[source]
        source: ActionError,
    },
    #[error("internal: {0}")]
    Internal(String),
}

/// "a, b or c" rendering for expected-token lists.
fn format_alternatives(items: &[String]) -> String {
    let mut string = String::new();
    let last = items.len().saturating_sub(1);
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            string += if index == last { " or " } else { ", " };
        }
        string += item;
    }
    string
}

/// A parse-value type. `from_token` converts a shifted token; `branch` is
/// the default reduction value used when a production carries no actions: a
/// node holding the head name and the handle's values.
pub trait Attribute: Clone + fmt::Debug + Default {
    fn from_token(token: &Token) -> Self;
    fn branch(head: &str, children: Vec<Self>) -> Self;
}

/// The generic tree attribute: what a parse builds when the caller
/// registers no semantic actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeValue {
    Empty,
    Leaf { name: String, value: String },
    Node { head: String, children: Vec<TreeValue> },
}

impl Default for TreeValue {
    fn default() -> Self {
        TreeValue::Empty
    }
}

impl Attribute for TreeValue {
    fn from_token(token: &Token) -> Self {
        TreeValue::Leaf {
            name: token.name().to_string(),
            value: token.value().to_string(),
        }
    }

    fn branch(head: &str, children: Vec<Self>) -> Self {
        TreeValue::Node {
            head: head.to_string(),
            children,
        }
    }
}

impl fmt::Display for TreeValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TreeValue::Empty => write!(f, "()"),
            TreeValue::Leaf { value, .. } => write!(f, "{}", value),
            TreeValue::Node { head, children } => {
                write!(f, "({}", head)?;
                for child in children {
                    write!(f, " {}", child)?;
                }
                write!(f, ")")
            }
        }
    }
}

pub type SemanticAction<A> = Box<dyn Fn(&Production, &[A]) -> Result<A, ActionError>>;

/// Named semantic callbacks, looked up by the `{tag}` written in the
/// grammar. Registration happens at parser-creation time; the engine
/// rejects grammars that reference unregistered tags.
pub struct SemanticActions<A> {
    map: BTreeMap<String, SemanticAction<A>>,
}

impl<A> Default for SemanticActions<A> {
    fn default() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }
}

impl<A> fmt::Debug for SemanticActions<A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let tags: Vec<&String> = self.map.keys().collect();
        write!(f, "SemanticActions({:?})", tags)
    }
}

impl<A> SemanticActions<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, tag: &str, action: F) -> &mut Self
    where
        F: Fn(&Production, &[A]) -> Result<A, ActionError> + 'static,
    {
        self.map.insert(tag.to_string(), Box::new(action));
        self
    }

    /// Builder-style registration.
    pub fn with<F>(mut self, tag: &str, action: F) -> Self
    where
        F: Fn(&Production, &[A]) -> Result<A, ActionError> + 'static,
    {
        self.register(tag, action);
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.map.contains_key(tag)
    }

    fn get(&self, tag: &str) -> Option<&SemanticAction<A>> {
        self.map.get(tag)
    }
}

/// A ready-to-run parser: augmented grammar, resolved table, compiled
/// scanner and the action registries, with the build diagnostics kept for
/// inspection.
pub struct ParserEngine<A: Attribute> {
    pub(crate) grammar: Grammar,
    pub(crate) table: LRTable,
    pub(crate) scanner: Scanner,
    pub(crate) actions: SemanticActions<A>,
    pub(crate) lexer_actions: TagActions,
    pub(crate) diagnostics: crate::diag::Diagnostics,
}

impl<A: Attribute> ParserEngine<A> {
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn table(&self) -> &LRTable {
        &self.table
    }

    pub fn state_count(&self) -> usize {
        self.table.state_count()
    }

    pub fn diagnostics(&self) -> &crate::diag::Diagnostics {
        &self.diagnostics
    }

    /// Parses `text` and returns the accepted parse's semantic value.
    pub fn parse(&self, text: &str) -> Result<A, ParseError> {
        self.parse_labeled(text, "")
    }

    /// As `parse`, with a label carried into token locations.
    pub fn parse_labeled(&self, text: &str, label: &str) -> Result<A, ParseError> {
        let mut tokens = self.scanner.token_stream(text, label, &self.lexer_actions);
        let mut states: Vec<u32> = vec![0];
        let mut symbols: Vec<Symbol> = vec![Symbol::end()];
        let mut values: Vec<A> = vec![A::default()];

        let mut lookahead = match tokens.next() {
            Some(token) => token,
            None => return Err(ParseError::Internal("empty token stream".to_string())),
        };

        loop {
            let state = *states.last().expect("stack never empties");
            if lookahead.is_mismatch() {
                return Err(ParseError::Lexical {
                    lexeme: lookahead.lexeme().to_string(),
                    location: lookahead.location().clone(),
                });
            }
            let action = self.table.action(state, lookahead.name());
            match action {
                Some(Action::Shift(target)) => {
                    states.push(*target);
                    symbols.push(Symbol::terminal(lookahead.name()));
                    values.push(A::from_token(&lookahead));
                    lookahead = match tokens.next() {
                        Some(token) => token,
                        None => {
                            return Err(ParseError::Internal(
                                "token stream ended before $".to_string(),
                            ))
                        }
                    };
                }
                Some(Action::Reduce(production)) => {
                    self.reduce(*production, &mut states, &mut symbols, &mut values)?;
                }
                Some(Action::Accept) => {
                    return Ok(values.last().expect("accepting stack has a value").clone());
                }
                Some(Action::Error(_)) | None => {
                    return Err(self.syntax_error(state, &lookahead));
                }
            }
        }
    }

    fn syntax_error(&self, state: u32, token: &Token) -> ParseError {
        let expected = self.table.expected_in(state, &self.grammar);
        ParseError::Syntax {
            found: token.to_string(),
            expected: format_alternatives(&expected),
            location: token.location().clone(),
        }
    }

    fn reduce(
        &self,
        production_index: usize,
        states: &mut Vec<u32>,
        symbols: &mut Vec<Symbol>,
        values: &mut Vec<A>,
    ) -> Result<(), ParseError> {
        let production = self.grammar.production(production_index);
        let body_len = production.len();
        let end_actions = production.actions_at(body_len);

        let value = if end_actions.is_empty() {
            let window_start = values.len() - body_len;
            let children: Vec<A> = values[window_start..].to_vec();
            A::branch(production.head().name(), children)
        } else {
            let mut last: Option<A> = None;
            for spec in end_actions {
                let window = spec.offset + 1;
                if window > values.len() {
                    return Err(ParseError::Internal(format!(
                        "action \"{}\" window exceeds the value stack",
                        spec.tag
                    )));
                }
                let args = &values[values.len() - window..];
                let callback = self
                    .actions
                    .get(&spec.tag)
                    .ok_or_else(|| ParseError::MissingAction {
                        tag: spec.tag.clone(),
                    })?;
                let result = callback(production, args).map_err(|source| ParseError::Action {
                    tag: spec.tag.clone(),
                    source,
                })?;
                last = Some(result);
            }
            last.expect("at least one action ran")
        };

        states.truncate(states.len() - body_len);
        symbols.truncate(symbols.len() - body_len);
        values.truncate(values.len() - body_len);

        let state = *states.last().expect("stack never empties");
        let head = production.head();
        let target = match self.table.action(state, head.name()) {
            Some(Action::Shift(target)) => *target,
            _ => {
                return Err(ParseError::Internal(format!(
                    "missing GOTO for ({}, {})",
                    state,
                    head.name()
                )))
            }
        };
        states.push(target);
        symbols.push(head.clone());
        values.push(value);
        Ok(())
    }
}

impl<A: Attribute> fmt::Debug for ParserEngine<A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "ParserEngine(states: {}, algorithm: {})",
            self.table.state_count(),
            self.table.algorithm()
        )
    }
}
