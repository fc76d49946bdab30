//! A bottom-up parser generator.
//!
//! Given a BNF-like grammar text (productions with embedded `{tag}`
//! semantic actions, `%token` declarations, precedence directives and an
//! inline lexer specification) the library builds a deterministic
//! shift/reduce table under one of four algorithms (`lr0`, `slr`, `lr1`,
//! `lalr`) and wires it to a regex scanner and a push-down driver.
//!
//! ```
//! use lalrgen::{create_parser, Algorithm, SemanticActions, TreeValue};
//!
//! let source = r"
//!     %token number
//!     @import NUMBER as number
//!     @ignore {WHITESPACE}
//!     E : E '+' T | T ;
//!     T : number ;
//! ";
//! let parser = create_parser::<TreeValue>(
//!     source,
//!     SemanticActions::new(),
//!     lalrgen::TagActions::new(),
//!     Algorithm::Lalr,
//! )
//! .unwrap();
//! let tree = parser.parse("1 + 2 + 3").unwrap();
//! assert_eq!(format!("{}", tree).contains("1"), true);
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub mod analyzer;
pub mod conflict;
pub mod diag;
pub mod grammar;
pub mod item;
pub mod lalr;
pub mod lr1;
pub mod parser;
pub mod reader;
pub mod rewrite;
pub mod symbol;
pub mod table;

pub use analyzer::{Analysis, AnalysisError};
pub use diag::{Diagnostic, Diagnostics, Severity};
pub use grammar::{ActionSpec, Grammar, GrammarError, Production, ScanDirective, Vector};
pub use lr1::{ConstructError, StateGraph};
pub use parser::{
    ActionError, Attribute, ParseError, ParserEngine, SemanticActions, TreeValue,
};
pub use reader::{read_grammar, ReadError};
pub use symbol::{Associativity, Precedence, Symbol, SymbolSet};
pub use table::{Action, ActionCell, LRTable};

pub use rexlex::{Location, PatternBook, ScanError, Scanner, TagAction, TagActions, Token};

/// Which reduce-lookahead policy the table is built under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Lr0,
    Slr,
    Lr1,
    Lalr,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Algorithm::Lr0 => write!(f, "lr0"),
            Algorithm::Slr => write!(f, "slr"),
            Algorithm::Lr1 => write!(f, "lr1"),
            Algorithm::Lalr => write!(f, "lalr"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = BuildError;

    fn from_str(text: &str) -> Result<Self, BuildError> {
        match text {
            "lr0" => Ok(Algorithm::Lr0),
            "slr" => Ok(Algorithm::Slr),
            "lr1" => Ok(Algorithm::Lr1),
            "lalr" => Ok(Algorithm::Lalr),
            other => Err(BuildError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Build configuration. The expected-conflict budgets mirror the generated
/// table's defaulted resolutions: when set, a mismatch fails the build
/// instead of warning.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub algorithm: Algorithm,
    pub expected_sr_conflicts: Option<u32>,
    pub expected_rr_conflicts: Option<u32>,
}

impl BuildOptions {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            expected_sr_conflicts: None,
            expected_rr_conflicts: None,
        }
    }

    pub fn expect_sr_conflicts(mut self, count: u32) -> Self {
        self.expected_sr_conflicts = Some(count);
        self
    }

    pub fn expect_rr_conflicts(mut self, count: u32) -> Self {
        self.expected_rr_conflicts = Some(count);
        self
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::new(Algorithm::Lalr)
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Construct(#[from] ConstructError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("unknown algorithm \"{0}\"")]
    UnknownAlgorithm(String),
    #[error("expected {expected} shift/reduce conflict(s), found {found}")]
    UnexpectedSRConflicts { found: u32, expected: u32 },
    #[error("expected {expected} reduce/reduce conflict(s), found {found}")]
    UnexpectedRRConflicts { found: u32, expected: u32 },
    #[error("semantic action \"{0}\" is not registered")]
    MissingAction(String),
    #[error("lexer action \"{0}\" is not registered")]
    MissingLexerAction(String),
    #[error("internal: generated table failed validation: {0}")]
    TableInvalid(String),
}

/// Builds a parser from grammar text: read, lift mid-rule actions,
/// augment, analyze, construct the chosen automaton, assemble and resolve
/// the table, then wire in the scanner and the action registries.
pub fn create_parser<A: Attribute>(
    source: &str,
    actions: SemanticActions<A>,
    lexer_actions: TagActions,
    algorithm: Algorithm,
) -> Result<ParserEngine<A>, BuildError> {
    create_parser_with(source, actions, lexer_actions, BuildOptions::new(algorithm))
}

pub fn create_parser_with<A: Attribute>(
    source: &str,
    actions: SemanticActions<A>,
    lexer_actions: TagActions,
    options: BuildOptions,
) -> Result<ParserEngine<A>, BuildError> {
    let mut grammar = reader::read_grammar(source)?;
    rewrite::lift_mid_actions(&mut grammar)?;
    let grammar = grammar.augmented()?;
    engine_from_grammar(grammar, actions, lexer_actions, options)
}

/// As `create_parser_with`, starting from an already augmented grammar.
pub fn engine_from_grammar<A: Attribute>(
    grammar: Grammar,
    actions: SemanticActions<A>,
    lexer_actions: TagActions,
    options: BuildOptions,
) -> Result<ParserEngine<A>, BuildError> {
    let analysis = Analysis::analyze(&grammar)?;
    let mut diagnostics = Diagnostics::new();
    analysis.check(&grammar, &mut diagnostics)?;

    let graph = match options.algorithm {
        Algorithm::Lr1 => lr1::build_lr1(&grammar, &analysis)?,
        Algorithm::Lalr => lalr::build_lalr(&grammar, &analysis)?,
        Algorithm::Slr | Algorithm::Lr0 => lr1::build_lr0(&grammar, &analysis)?,
    };
    let mut table = table::build_table(&grammar, &analysis, &graph, options.algorithm);
    let (sr_conflicts, rr_conflicts) = conflict::resolve(&mut table, &grammar, &mut diagnostics);
    if let Some(expected) = options.expected_sr_conflicts {
        if sr_conflicts != expected {
            return Err(BuildError::UnexpectedSRConflicts {
                found: sr_conflicts,
                expected,
            });
        }
    }
    if let Some(expected) = options.expected_rr_conflicts {
        if rr_conflicts != expected {
            return Err(BuildError::UnexpectedRRConflicts {
                found: rr_conflicts,
                expected,
            });
        }
    }
    table
        .validate(&grammar, &graph)
        .map_err(BuildError::TableInvalid)?;

    for production in grammar.productions() {
        for specs in production.actions().values() {
            for spec in specs {
                if !actions.contains(&spec.tag) {
                    return Err(BuildError::MissingAction(spec.tag.clone()));
                }
            }
        }
    }
    for directive in grammar.directives() {
        if let ScanDirective::MatchTagged { tag, .. } = directive {
            if !lexer_actions.contains_key(tag) {
                return Err(BuildError::MissingLexerAction(tag.clone()));
            }
        }
    }

    let scanner = build_scanner(&grammar)?;
    Ok(ParserEngine {
        grammar,
        table,
        scanner,
        actions,
        lexer_actions,
        diagnostics,
    })
}

/// Compiles the grammar's scanner directives and literal terminals into a
/// `rexlex` scanner. `@import` injects a predefined pattern as a token
/// rule under the imported (or aliased) name.
fn build_scanner(grammar: &Grammar) -> Result<Scanner, ScanError> {
    let mut builder = Scanner::builder();
    for name in grammar.terminals() {
        if name.starts_with('\'') || name.starts_with('"') {
            let owned = name.to_string();
            builder.literal(&reader::unquote(&owned), &owned);
        }
    }
    for directive in grammar.directives() {
        match directive {
            ScanDirective::Ignore { pattern } => {
                builder.ignore(pattern);
            }
            ScanDirective::Match { name, pattern } => {
                builder.token(name, pattern);
            }
            ScanDirective::MatchTagged { tag, pattern } => {
                builder.tagged(tag, pattern);
            }
            ScanDirective::Import { name, alias } => {
                let key = alias.as_deref().unwrap_or(name);
                builder.token(key, &format!("{{{}}}", name));
            }
        }
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithms_parse_from_their_names() {
        assert_eq!(Algorithm::from_str("lr0").unwrap(), Algorithm::Lr0);
        assert_eq!(Algorithm::from_str("slr").unwrap(), Algorithm::Slr);
        assert_eq!(Algorithm::from_str("lr1").unwrap(), Algorithm::Lr1);
        assert_eq!(Algorithm::from_str("lalr").unwrap(), Algorithm::Lalr);
        assert!(matches!(
            Algorithm::from_str("glr"),
            Err(BuildError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn unregistered_semantic_tags_fail_at_creation() {
        let source = "%token number\n@import NUMBER as number\nE : number {num} ;";
        let result = create_parser::<TreeValue>(
            source,
            SemanticActions::new(),
            TagActions::new(),
            Algorithm::Lalr,
        );
        assert!(matches!(result, Err(BuildError::MissingAction(tag)) if tag == "num"));
    }

    #[test]
    fn unregistered_lexer_tags_fail_at_creation() {
        let source = "%token word\n@match {w} {NAME}\nS : word ;";
        let result = create_parser::<TreeValue>(
            source,
            SemanticActions::new(),
            TagActions::new(),
            Algorithm::Lalr,
        );
        assert!(matches!(result, Err(BuildError::MissingLexerAction(tag)) if tag == "w"));
    }

    #[test]
    fn default_tree_building_needs_no_actions() {
        let source = "%token number\n@import NUMBER as number\n@ignore {WHITESPACE}\nS : number ;";
        let parser = create_parser::<TreeValue>(
            source,
            SemanticActions::new(),
            TagActions::new(),
            Algorithm::Lr1,
        )
        .unwrap();
        let tree = parser.parse("42").unwrap();
        assert_eq!(format!("{}", tree), "(S 42)");
    }

    #[test]
    fn conflict_budgets_gate_the_build() {
        let source = "%token number\n@import NUMBER as number\nE : E '+' E | number ;";
        let result = create_parser_with::<TreeValue>(
            source,
            SemanticActions::new(),
            TagActions::new(),
            BuildOptions::new(Algorithm::Lr1).expect_sr_conflicts(0),
        );
        assert!(matches!(
            result,
            Err(BuildError::UnexpectedSRConflicts { .. })
        ));
        // Declaring the observed count admits the grammar: the lone
        // conflicted state folds one shift/reduce pair on '+'.
        let ok = create_parser_with::<TreeValue>(
            source,
            SemanticActions::new(),
            TagActions::new(),
            BuildOptions::new(Algorithm::Lr1).expect_sr_conflicts(1),
        );
        assert!(ok.is_ok());
    }
}
