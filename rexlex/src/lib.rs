//! Regex based scanner for grammar-driven parsers.
//!
//! A `Scanner` compiles literal terminals and named rules into a single
//! anchored alternation with one capture group per rule. `{NAME}` references
//! inside patterns are substituted from a `PatternBook`. Token locations are
//! derived from a precomputed table of line starts.

use std::collections::BTreeMap;
use std::fmt;

pub mod error;
pub mod matcher;

pub use error::ScanError;
pub use matcher::{PatternBook, ScannerBuilder};

use matcher::GroupInfo;

/// Name of the end-of-input token appended to every stream.
pub const END_TOKEN: &str = "$";
/// Name given to a token covering input no rule matched.
pub const MISMATCH_TOKEN: &str = "MISMATCH";

/// A point in the scanned text, for error messages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    line: usize,
    column: usize,
    label: String,
}

impl Location {
    pub fn new(line: usize, column: usize, label: &str) -> Self {
        Self {
            line,
            column,
            label: label.to_string(),
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for Location {
    fn fmt(&self, dest: &mut fmt::Formatter) -> fmt::Result {
        if self.label.is_empty() {
            write!(dest, "{}:{}", self.line, self.column)
        } else {
            write!(dest, "{}:{}:{}", self.label, self.line, self.column)
        }
    }
}

/// A scanned token. `lexeme` is the matched text; `value` is the cooked
/// form, which differs from the lexeme only when a tagged rule's callback
/// rewrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    name: String,
    lexeme: String,
    value: String,
    location: Location,
}

impl Token {
    pub fn new(name: &str, lexeme: &str, location: Location) -> Self {
        Self {
            name: name.to_string(),
            lexeme: lexeme.to_string(),
            value: lexeme.to_string(),
            location,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lexeme(&self) -> &str {
        &self.lexeme
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn is_end(&self) -> bool {
        self.name == END_TOKEN
    }

    pub fn is_mismatch(&self) -> bool {
        self.name == MISMATCH_TOKEN
    }
}

impl fmt::Display for Token {
    fn fmt(&self, dest: &mut fmt::Formatter) -> fmt::Result {
        write!(dest, "{}({:?})", self.name, self.lexeme)
    }
}

/// Callback for `@match {TAG} pattern` rules: matched text in, token
/// `(name, value)` out.
pub type TagAction = Box<dyn Fn(&str) -> (String, String)>;
pub type TagActions = BTreeMap<String, TagAction>;

/// A compiled scanner. Built by `ScannerBuilder`.
#[derive(Debug)]
pub struct Scanner {
    pub(crate) master: regex::Regex,
    pub(crate) groups: Vec<GroupInfo>,
    pub(crate) literal_names: BTreeMap<String, String>,
}

impl Scanner {
    pub fn builder() -> ScannerBuilder {
        ScannerBuilder::new(PatternBook::standard())
    }

    pub fn token_stream<'a>(
        &'a self,
        text: &'a str,
        label: &str,
        actions: &'a TagActions,
    ) -> TokenStream<'a> {
        let mut line_starts = vec![0];
        for (index, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(index + 1);
            }
        }
        TokenStream {
            scanner: self,
            text,
            label: label.to_string(),
            actions,
            line_starts,
            index: 0,
            done: false,
        }
    }
}

/// Iterator over the tokens of one input text. Yields a final `$` token at
/// end of input, then `None`. Unmatched input comes out as one-character
/// `MISMATCH` tokens rather than an error.
pub struct TokenStream<'a> {
    scanner: &'a Scanner,
    text: &'a str,
    label: String,
    actions: &'a TagActions,
    line_starts: Vec<usize>,
    index: usize,
    done: bool,
}

impl<'a> TokenStream<'a> {
    fn location_at(&self, index: usize) -> Location {
        let line = self.line_starts.partition_point(|&start| start <= index);
        let column = index - self.line_starts[line - 1] + 1;
        Location::new(line, column, &self.label)
    }

    fn mismatch(&mut self) -> Token {
        let start = self.index;
        let width = self.text[start..]
            .chars()
            .next()
            .map(|c| c.len_utf8())
            .unwrap_or(1);
        self.index = start + width;
        Token::new(
            MISMATCH_TOKEN,
            &self.text[start..start + width],
            self.location_at(start),
        )
    }
}

impl<'a> Iterator for TokenStream<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.done {
            return None;
        }
        loop {
            if self.index >= self.text.len() {
                self.done = true;
                return Some(Token::new(END_TOKEN, "", self.location_at(self.index)));
            }
            let start = self.index;
            let caps = match self.scanner.master.captures(&self.text[start..]) {
                Some(caps) => caps,
                None => return Some(self.mismatch()),
            };
            let (group, matched) = {
                let mut found = None;
                for (index, info) in self.scanner.groups.iter().enumerate() {
                    if let Some(m) = caps.name(&format!("g{}", index)) {
                        found = Some((info, m));
                        break;
                    }
                }
                match found {
                    Some(pair) => pair,
                    None => return Some(self.mismatch()),
                }
            };
            if matched.range().is_empty() {
                // A rule that matches nothing cannot make progress.
                return Some(self.mismatch());
            }
            let lexeme = matched.as_str();
            let location = self.location_at(start + matched.start());
            self.index = start + matched.end();
            match group {
                GroupInfo::Skip => continue,
                GroupInfo::Literal(text) => {
                    let name = self
                        .scanner
                        .literal_names
                        .get(text)
                        .cloned()
                        .unwrap_or_else(|| lexeme.to_string());
                    return Some(Token::new(&name, lexeme, location));
                }
                GroupInfo::Named(name) => {
                    return Some(Token::new(name, lexeme, location));
                }
                GroupInfo::Tagged(tag) => match self.actions.get(tag) {
                    Some(action) => {
                        let (name, value) = action(lexeme);
                        let mut token = Token::new(&name, lexeme, location);
                        token.value = value;
                        return Some(token);
                    }
                    None => {
                        let mut token = Token::new(MISMATCH_TOKEN, lexeme, location);
                        token.value = tag.clone();
                        return Some(token);
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(scanner: &Scanner, text: &str) -> Vec<(String, String)> {
        let actions = TagActions::new();
        scanner
            .token_stream(text, "test", &actions)
            .map(|t| (t.name().to_string(), t.lexeme().to_string()))
            .collect()
    }

    #[test]
    fn literals_beat_rules_and_keywords_do_not_clip_names() {
        let mut builder = Scanner::builder();
        builder
            .literal("if", "'if'")
            .literal("+", "'+'")
            .token("NAME", "{NAME}")
            .ignore("{WHITESPACE}");
        let scanner = builder.build().unwrap();
        let tokens = scan(&scanner, "if iffy + x");
        assert_eq!(
            tokens,
            vec![
                ("'if'".to_string(), "if".to_string()),
                ("NAME".to_string(), "iffy".to_string()),
                ("'+'".to_string(), "+".to_string()),
                ("NAME".to_string(), "x".to_string()),
                (END_TOKEN.to_string(), "".to_string()),
            ]
        );
    }

    #[test]
    fn unmatched_input_becomes_mismatch_tokens() {
        let mut builder = Scanner::builder();
        builder.token("NUMBER", "{NUMBER}").ignore("{SPACE}");
        let scanner = builder.build().unwrap();
        let tokens = scan(&scanner, "1 ? 2");
        assert_eq!(tokens[1].0, MISMATCH_TOKEN);
        assert_eq!(tokens[1].1, "?");
        assert_eq!(tokens.last().unwrap().0, END_TOKEN);
    }

    #[test]
    fn locations_come_from_line_starts() {
        let mut builder = Scanner::builder();
        builder.token("NAME", "{NAME}").ignore("{WHITESPACE}");
        let scanner = builder.build().unwrap();
        let actions = TagActions::new();
        let tokens: Vec<Token> = scanner
            .token_stream("one\n  two", "input", &actions)
            .collect();
        assert_eq!(tokens[0].location().line(), 1);
        assert_eq!(tokens[0].location().column(), 1);
        assert_eq!(tokens[1].location().line(), 2);
        assert_eq!(tokens[1].location().column(), 3);
        assert_eq!(format!("{}", tokens[1].location()), "input:2:3");
    }

    #[test]
    fn tagged_rules_dispatch_to_callbacks() {
        let mut builder = Scanner::builder();
        builder.tagged("num", "{NUMBER}").ignore("{SPACE}");
        let scanner = builder.build().unwrap();
        let mut actions = TagActions::new();
        actions.insert(
            "num".to_string(),
            Box::new(|text: &str| ("NUMBER".to_string(), format!("<{}>", text))),
        );
        let tokens: Vec<Token> = scanner.token_stream("42", "t", &actions).collect();
        assert_eq!(tokens[0].name(), "NUMBER");
        assert_eq!(tokens[0].lexeme(), "42");
        assert_eq!(tokens[0].value(), "<42>");
    }

    #[test]
    fn end_token_is_emitted_once() {
        let mut builder = Scanner::builder();
        builder.ignore("{WHITESPACE}");
        let scanner = builder.build().unwrap();
        let tokens = scan(&scanner, "   ");
        assert_eq!(tokens, vec![(END_TOKEN.to_string(), "".to_string())]);
    }
}
