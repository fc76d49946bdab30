//! Grammar-text loader.
//!
//! Turns the BNF-like surface form into an in-memory `Grammar`: top-level
//! `%` directives, `@` scanner directives, and productions of the form
//! `HEAD : body ( '|' body )* ';'` with inline `{tag}` actions, `%prec`
//! overrides and `%empty` markers. `#`, `//` and `/* … */` comments are
//! recognized. The loader's only contract is "produce the in-memory
//! grammar"; all language analysis happens downstream.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::grammar::{ActionSpec, Grammar, GrammarError, Production, ScanDirective, Vector};
use crate::symbol::{Associativity, Symbol};

use rexlex::Location;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("{location}: unknown directive \"%{name}\"")]
    UnknownDirective { name: String, location: Location },
    #[error("{location}: malformed \"{directive}\" directive: {reason}")]
    BadDirective {
        directive: String,
        reason: String,
        location: Location,
    },
    #[error("{location}: unexpected \"{found}\"")]
    UnexpectedToken { found: String, location: Location },
    #[error("grammar text ended inside a production")]
    UnexpectedEnd,
    #[error("{location}: unterminated literal")]
    UnterminatedLiteral { location: Location },
    #[error("{location}: unterminated action tag")]
    UnterminatedAction { location: Location },
    #[error("unterminated block comment starting at {location}")]
    UnterminatedComment { location: Location },
    #[error("{location}: production head \"{name}\" is a declared terminal")]
    HeadIsTerminal { name: String, location: Location },
    #[error("{location}: \"{name}\" already has a precedence level")]
    DuplicatePrecedence { name: String, location: Location },
    #[error(transparent)]
    Grammar(#[from] GrammarError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RawKind {
    Name,
    Literal,
    Action,
    Marker,
    Colon,
    Bar,
    Semi,
    Prec,
}

#[derive(Debug, Clone)]
struct RawToken {
    kind: RawKind,
    text: String,
    location: Location,
}

lazy_static! {
    static ref DIRECTIVE_CRE: Regex = Regex::new(r"^%([a-z]+)\b\s*(.*?)\s*$").unwrap();
    static ref SCAN_CRE: Regex = Regex::new(r"^@([a-z]+)\b\s*(.*?)\s*$").unwrap();
    static ref MATCH_CRE: Regex =
        Regex::new(r"^(?:\{(\w+)\}|(\w+))\s+(\S.*)$").unwrap();
    static ref IMPORT_CRE: Regex = Regex::new(r"^(\w+)(?:\s+as\s+(\w+))?$").unwrap();
}

const TOP_DIRECTIVES: &[&str] = &["token", "left", "right", "nonassoc", "precedence", "start"];

/// Reads grammar text into an updated `Grammar`.
pub fn read_grammar(source: &str) -> Result<Grammar, ReadError> {
    let mut grammar = Grammar::new();
    let mut tokens: Vec<RawToken> = vec![];
    let mut in_block_comment: Option<Location> = None;
    let mut start_name: Option<String> = None;

    for (line_index, line) in source.lines().enumerate() {
        let line_no = line_index + 1;
        let stripped = strip_comments(line, line_no, &mut in_block_comment);
        let trimmed = stripped.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        let indent = stripped.len() - trimmed.len();
        let location = Location::new(line_no, indent + 1, "");
        if let Some(caps) = DIRECTIVE_CRE.captures(trimmed) {
            let keyword = &caps[1];
            if TOP_DIRECTIVES.contains(&keyword) {
                apply_directive(
                    &mut grammar,
                    keyword,
                    &caps[2],
                    &location,
                    &mut start_name,
                )?;
                continue;
            }
            if !matches!(keyword, "prec" | "empty" | "e" | "epsilon") {
                return Err(ReadError::UnknownDirective {
                    name: keyword.to_string(),
                    location,
                });
            }
        }
        if trimmed.starts_with('@') {
            apply_scan_directive(&mut grammar, trimmed, &location)?;
            continue;
        }
        tokenize_line(&stripped, line_no, &mut tokens)?;
    }
    if let Some(location) = in_block_comment {
        return Err(ReadError::UnterminatedComment { location });
    }

    parse_productions(&mut grammar, &tokens)?;
    if let Some(name) = start_name {
        grammar.set_start(&name);
    }
    grammar.update()?;
    Ok(grammar)
}

/// Blanks comments out of one line, preserving byte positions so token
/// columns still point into the original text.
fn strip_comments(line: &str, line_no: usize, in_block: &mut Option<Location>) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out: Vec<char> = Vec::with_capacity(chars.len());
    let mut quote: Option<char> = None;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if in_block.is_some() {
            if c == '*' && chars.get(i + 1) == Some(&'/') {
                *in_block = None;
                out.push(' ');
                out.push(' ');
                i += 2;
            } else {
                out.push(' ');
                i += 1;
            }
            continue;
        }
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            '#' => break,
            '/' if chars.get(i + 1) == Some(&'/') => break,
            '/' if chars.get(i + 1) == Some(&'*') => {
                *in_block = Some(Location::new(line_no, i + 1, ""));
                out.push(' ');
                out.push(' ');
                i += 2;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out.into_iter().collect()
}

fn apply_directive(
    grammar: &mut Grammar,
    keyword: &str,
    rest: &str,
    location: &Location,
    start_name: &mut Option<String>,
) -> Result<(), ReadError> {
    let bad = |reason: &str| ReadError::BadDirective {
        directive: format!("%{}", keyword),
        reason: reason.to_string(),
        location: location.clone(),
    };
    match keyword {
        "token" => {
            if rest.is_empty() {
                return Err(bad("expected one or more token names"));
            }
            for name in rest.split_whitespace() {
                if !is_name(name) {
                    return Err(bad(&format!("\"{}\" is not a valid token name", name)));
                }
                grammar.declare_terminal(name);
            }
        }
        "left" | "right" | "nonassoc" | "precedence" => {
            let associativity = match keyword {
                "left" => Associativity::Left,
                "right" => Associativity::Right,
                "nonassoc" => Associativity::NonAssoc,
                _ => Associativity::Unspecified,
            };
            let names = split_symbol_list(rest).ok_or_else(|| bad("expected symbol names"))?;
            if names.is_empty() {
                return Err(bad("expected symbol names"));
            }
            for name in &names {
                if grammar.has_precedence(name) {
                    return Err(ReadError::DuplicatePrecedence {
                        name: name.clone(),
                        location: location.clone(),
                    });
                }
            }
            grammar.declare_precedence(associativity, &names);
        }
        "start" => {
            if !is_name(rest) {
                return Err(bad("expected a nonterminal name"));
            }
            *start_name = Some(rest.to_string());
        }
        _ => {
            return Err(ReadError::UnknownDirective {
                name: keyword.to_string(),
                location: location.clone(),
            })
        }
    }
    Ok(())
}

fn apply_scan_directive(
    grammar: &mut Grammar,
    line: &str,
    location: &Location,
) -> Result<(), ReadError> {
    let caps = SCAN_CRE.captures(line).ok_or_else(|| ReadError::BadDirective {
        directive: line.to_string(),
        reason: "unrecognized scanner directive".to_string(),
        location: location.clone(),
    })?;
    let keyword = caps[1].to_string();
    let rest = caps[2].to_string();
    let bad = |reason: &str| ReadError::BadDirective {
        directive: format!("@{}", keyword),
        reason: reason.to_string(),
        location: location.clone(),
    };
    match keyword.as_str() {
        "ignore" | "skip" => {
            if rest.is_empty() {
                return Err(bad("expected a pattern"));
            }
            grammar.add_directive(ScanDirective::Ignore { pattern: rest });
        }
        "match" => {
            let caps = MATCH_CRE.captures(&rest).ok_or_else(|| {
                bad("expected \"NAME PATTERN\" or \"{TAG} PATTERN\"")
            })?;
            let pattern = caps[3].to_string();
            if let Some(tag) = caps.get(1) {
                grammar.add_directive(ScanDirective::MatchTagged {
                    tag: tag.as_str().to_string(),
                    pattern,
                });
            } else {
                let name = caps[2].to_string();
                grammar.declare_terminal(&name);
                grammar.add_directive(ScanDirective::Match { name, pattern });
            }
        }
        "import" => {
            let caps = IMPORT_CRE
                .captures(&rest)
                .ok_or_else(|| bad("expected \"NAME\" or \"NAME as ALIAS\""))?;
            let name = caps[1].to_string();
            let alias = caps.get(2).map(|m| m.as_str().to_string());
            grammar.declare_terminal(alias.as_deref().unwrap_or(&name));
            grammar.add_directive(ScanDirective::Import { name, alias });
        }
        _ => {
            return Err(bad("unrecognized scanner directive"));
        }
    }
    Ok(())
}

fn is_name(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Splits a precedence directive's argument list; items are names or quoted
/// literals.
fn split_symbol_list(text: &str) -> Option<Vec<String>> {
    let mut names = vec![];
    let mut rest = text.trim();
    while !rest.is_empty() {
        if rest.starts_with('\'') || rest.starts_with('"') {
            let quote = rest.chars().next().unwrap();
            let mut end = None;
            let chars: Vec<char> = rest.chars().collect();
            let mut i = 1;
            while i < chars.len() {
                if chars[i] == '\\' {
                    i += 2;
                    continue;
                }
                if chars[i] == quote {
                    end = Some(i);
                    break;
                }
                i += 1;
            }
            let end = end?;
            let literal: String = chars[..=end].iter().collect();
            names.push(literal);
            rest = rest[chars[..=end].iter().map(|c| c.len_utf8()).sum::<usize>()..].trim_start();
        } else {
            let split = rest
                .find(char::is_whitespace)
                .unwrap_or(rest.len());
            let name = &rest[..split];
            if !is_name(name) {
                return None;
            }
            names.push(name.to_string());
            rest = rest[split..].trim_start();
        }
    }
    Some(names)
}

fn tokenize_line(line: &str, line_no: usize, tokens: &mut Vec<RawToken>) -> Result<(), ReadError> {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let location = Location::new(line_no, i + 1, "");
        match c {
            ' ' | '\t' | '\r' => {
                i += 1;
            }
            ':' => {
                tokens.push(RawToken {
                    kind: RawKind::Colon,
                    text: ":".to_string(),
                    location,
                });
                i += 1;
            }
            '|' => {
                tokens.push(RawToken {
                    kind: RawKind::Bar,
                    text: "|".to_string(),
                    location,
                });
                i += 1;
            }
            ';' => {
                tokens.push(RawToken {
                    kind: RawKind::Semi,
                    text: ";".to_string(),
                    location,
                });
                i += 1;
            }
            '\'' | '"' => {
                let mut j = i + 1;
                let mut closed = false;
                while j < chars.len() {
                    if chars[j] == '\\' {
                        j += 2;
                        continue;
                    }
                    if chars[j] == c {
                        closed = true;
                        break;
                    }
                    j += 1;
                }
                if !closed {
                    return Err(ReadError::UnterminatedLiteral { location });
                }
                let text: String = chars[i..=j].iter().collect();
                tokens.push(RawToken {
                    kind: RawKind::Literal,
                    text,
                    location,
                });
                i = j + 1;
            }
            '{' => {
                let mut j = i + 1;
                while j < chars.len() && chars[j] != '}' {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(ReadError::UnterminatedAction { location });
                }
                let tag: String = chars[i + 1..j].iter().collect::<String>().trim().to_string();
                if !is_name(&tag) {
                    return Err(ReadError::UnexpectedToken {
                        found: format!("{{{}}}", tag),
                        location,
                    });
                }
                tokens.push(RawToken {
                    kind: RawKind::Action,
                    text: tag,
                    location,
                });
                i = j + 1;
            }
            '%' => {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                let word: String = chars[i + 1..j].iter().collect();
                let kind = match word.as_str() {
                    "empty" | "e" | "epsilon" => RawKind::Marker,
                    "prec" => RawKind::Prec,
                    _ => {
                        return Err(ReadError::UnexpectedToken {
                            found: format!("%{}", word),
                            location,
                        })
                    }
                };
                tokens.push(RawToken {
                    kind,
                    text: word,
                    location,
                });
                i = j;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                let text: String = chars[i..j].iter().collect();
                tokens.push(RawToken {
                    kind: RawKind::Name,
                    text,
                    location,
                });
                i = j;
            }
            _ => {
                return Err(ReadError::UnexpectedToken {
                    found: c.to_string(),
                    location,
                });
            }
        }
    }
    Ok(())
}

fn parse_productions(grammar: &mut Grammar, tokens: &[RawToken]) -> Result<(), ReadError> {
    let mut i = 0;
    while i < tokens.len() {
        let head_token = &tokens[i];
        if head_token.kind != RawKind::Name {
            return Err(ReadError::UnexpectedToken {
                found: head_token.text.clone(),
                location: head_token.location.clone(),
            });
        }
        if grammar.is_terminal(&head_token.text) {
            return Err(ReadError::HeadIsTerminal {
                name: head_token.text.clone(),
                location: head_token.location.clone(),
            });
        }
        let head = grammar.intern(&head_token.text);
        let anchor = head_token.location.clone();
        i += 1;
        match tokens.get(i) {
            Some(token) if token.kind == RawKind::Colon => i += 1,
            Some(token) => {
                return Err(ReadError::UnexpectedToken {
                    found: token.text.clone(),
                    location: token.location.clone(),
                })
            }
            None => return Err(ReadError::UnexpectedEnd),
        }
        loop {
            let (production, next, last) = parse_body(grammar, &head, tokens, i)?;
            grammar.push_production(production, Some(anchor.clone()));
            i = next;
            if last {
                break;
            }
        }
    }
    Ok(())
}

/// Parses one alternative up to `|` or `;`. Returns the production, the
/// index after the separator, and whether the separator was `;`.
fn parse_body(
    grammar: &mut Grammar,
    head: &Symbol,
    tokens: &[RawToken],
    mut i: usize,
) -> Result<(Production, usize, bool), ReadError> {
    let mut body: Vec<Symbol> = vec![];
    let mut actions: Vec<(usize, String)> = vec![];
    let mut precedence_tag: Option<String> = None;
    loop {
        let token = tokens.get(i).ok_or(ReadError::UnexpectedEnd)?;
        match token.kind {
            RawKind::Name => {
                body.push(grammar.intern(&token.text));
                i += 1;
            }
            RawKind::Literal => {
                body.push(grammar.intern(&token.text));
                i += 1;
            }
            RawKind::Marker => {
                body.push(Symbol::epsilon());
                i += 1;
            }
            RawKind::Action => {
                let position = body.iter().filter(|s| !s.is_epsilon()).count();
                actions.push((position, token.text.clone()));
                i += 1;
            }
            RawKind::Prec => {
                let target = tokens.get(i + 1).ok_or(ReadError::UnexpectedEnd)?;
                match target.kind {
                    RawKind::Name | RawKind::Literal => {
                        precedence_tag = Some(target.text.clone());
                        i += 2;
                    }
                    _ => {
                        return Err(ReadError::UnexpectedToken {
                            found: target.text.clone(),
                            location: target.location.clone(),
                        })
                    }
                }
            }
            RawKind::Bar | RawKind::Semi => {
                let last = token.kind == RawKind::Semi;
                let mut production = Production::new(head.clone(), Vector::new(body));
                for (position, tag) in actions {
                    production.add_action(position, ActionSpec::new(&tag, position));
                }
                if let Some(tag) = precedence_tag {
                    production.set_precedence_tag(&tag);
                }
                return Ok((production, i + 1, last));
            }
            RawKind::Colon => {
                return Err(ReadError::UnexpectedToken {
                    found: token.text.clone(),
                    location: token.location.clone(),
                })
            }
        }
    }
}

/// Strips the quotes off a literal symbol name and resolves the usual
/// backslash escapes.
pub fn unquote(literal: &str) -> String {
    let chars: Vec<char> = literal.chars().collect();
    if chars.len() < 2 {
        return literal.to_string();
    }
    let quote = chars[0];
    if (quote != '\'' && quote != '"') || chars[chars.len() - 1] != quote {
        return literal.to_string();
    }
    let mut out = String::new();
    let mut i = 1;
    while i < chars.len() - 1 {
        if chars[i] == '\\' && i + 1 < chars.len() - 1 {
            match chars[i + 1] {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                other => out.push(other),
            }
            i += 2;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPR: &str = r#"
        # expression grammar
        %token number
        %left '+'
        %left '*'
        @import NUMBER as number
        @ignore {WHITESPACE}

        E : E '+' E {add}   // addition
          | E '*' E {mul}
          | number {num}
          ;
    "#;

    #[test]
    fn reads_directives_rules_and_actions() {
        let grammar = read_grammar(EXPR).unwrap();
        assert_eq!(grammar.productions().len(), 3);
        assert_eq!(grammar.start().unwrap().name(), "E");
        assert!(grammar.is_terminal("number"));
        assert!(grammar.is_terminal("'+'"));
        let plus = grammar.precedence_of("'+'").unwrap();
        let times = grammar.precedence_of("'*'").unwrap();
        assert!(times.level > plus.level);
        let add = grammar.production(0);
        assert_eq!(add.actions_at(3), &[ActionSpec::new("add", 3)]);
        assert_eq!(add.precedence_tag(), Some("'+'"));
        assert_eq!(grammar.directives().len(), 2);
    }

    #[test]
    fn reads_mid_rule_actions_and_empty_bodies() {
        let source = "A : 'x' {tag} 'y' | %empty {fin} ;";
        let grammar = read_grammar(source).unwrap();
        let first = grammar.production(0);
        assert_eq!(first.len(), 2);
        assert_eq!(first.actions_at(1), &[ActionSpec::new("tag", 1)]);
        assert!(first.has_mid_actions());
        let second = grammar.production(1);
        assert!(second.is_empty());
        assert_eq!(second.actions_at(0), &[ActionSpec::new("fin", 0)]);
    }

    #[test]
    fn percent_prec_overrides_the_tag() {
        let source = "%token id\nE : E '-' E %prec '*' | id ;";
        let grammar = read_grammar(source).unwrap();
        assert_eq!(grammar.production(0).precedence_tag(), Some("'*'"));
        assert!(grammar.production(0).has_explicit_precedence());
    }

    #[test]
    fn block_comments_span_lines() {
        let source = "A : 'x' /* comment\n   more comment */ 'y' ;";
        let grammar = read_grammar(source).unwrap();
        assert_eq!(grammar.production(0).len(), 2);
    }

    #[test]
    fn start_directive_and_errors() {
        let source = "%start B\nA : 'x' ;\nB : A ;";
        let grammar = read_grammar(source).unwrap();
        assert_eq!(grammar.start().unwrap().name(), "B");

        assert!(matches!(
            read_grammar("%token A\nA : 'x' ;"),
            Err(ReadError::HeadIsTerminal { .. })
        ));
        assert!(matches!(
            read_grammar("%bogus x\nA : 'x' ;"),
            Err(ReadError::UnknownDirective { .. })
        ));
        assert!(matches!(read_grammar(""), Err(ReadError::Grammar(_))));
        assert!(matches!(
            read_grammar("A : 'x ;"),
            Err(ReadError::UnterminatedLiteral { .. })
        ));
    }

    #[test]
    fn unquote_resolves_escapes() {
        assert_eq!(unquote("'+'"), "+");
        assert_eq!(unquote(r#""if""#), "if");
        assert_eq!(unquote(r"'\n'"), "\n");
        assert_eq!(unquote(r"'\''"), "'");
    }
}
