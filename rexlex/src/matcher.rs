use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ScanError;

lazy_static! {
    static ref MACRO_CRE: Regex = Regex::new(r"\{([A-Za-z_][A-Za-z_0-9]*)\}").unwrap();
}

/// Named regex fragments usable as `{NAME}` inside scanner patterns.
///
/// `standard()` supplies the common lexemes; grammars extend the book via
/// `@import` or by defining their own entries.
#[derive(Debug, Clone)]
pub struct PatternBook {
    patterns: BTreeMap<String, String>,
}

impl Default for PatternBook {
    fn default() -> Self {
        Self::standard()
    }
}

impl PatternBook {
    pub fn empty() -> Self {
        Self {
            patterns: BTreeMap::new(),
        }
    }

    pub fn standard() -> Self {
        let mut book = Self::empty();
        book.define("NAME", r"[A-Za-z_][A-Za-z_0-9]*");
        book.define("INTEGER", r"[0-9]+");
        book.define("FLOAT", r"[0-9]+\.[0-9]+");
        book.define("HEX", r"0[xX][0-9a-fA-F]+");
        book.define("NUMBER", r"[0-9]+(?:\.[0-9]+)?");
        book.define("STRING", r#""(?:\\.|[^"\\])*"|'(?:\\.|[^'\\])*'"#);
        book.define("COMMENT1", r"#[^\n]*");
        book.define("COMMENT2", r"//[^\n]*");
        book.define("COMMENT3", r"/\*(?s:.)*?\*/");
        book.define("WHITESPACE", r"[ \t\r\n]+");
        book.define("SPACE", r"[ \t]+");
        book.define("CRLF", r"\r?\n");
        book
    }

    pub fn define(&mut self, name: &str, pattern: &str) {
        self.patterns.insert(name.to_string(), pattern.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.patterns.get(name).map(|s| s.as_str())
    }

    /// Substitutes `{NAME}` references, transitively. The expansion depth is
    /// bounded so a cyclic definition surfaces as an error instead of a hang.
    pub fn expand(&self, pattern: &str) -> Result<String, ScanError> {
        const MAX_DEPTH: usize = 8;
        let mut current = pattern.to_string();
        for _ in 0..MAX_DEPTH {
            if !MACRO_CRE.is_match(&current) {
                return Ok(current);
            }
            let mut expanded = String::with_capacity(current.len());
            let mut tail = 0;
            for caps in MACRO_CRE.captures_iter(&current) {
                let whole = caps.get(0).expect("regex capture 0");
                let name = &caps[1];
                let body = self
                    .patterns
                    .get(name)
                    .ok_or_else(|| ScanError::UnknownMacro(name.to_string()))?;
                expanded.push_str(&current[tail..whole.start()]);
                expanded.push_str("(?:");
                expanded.push_str(body);
                expanded.push(')');
                tail = whole.end();
            }
            expanded.push_str(&current[tail..]);
            current = expanded;
        }
        let name = MACRO_CRE
            .captures(&current)
            .map(|caps| caps[1].to_string())
            .unwrap_or_default();
        Err(ScanError::MacroCycle(name))
    }
}

/// What a master-pattern group stands for.
#[derive(Debug, Clone)]
pub(crate) enum GroupInfo {
    /// A literal terminal; the payload is the grammar's quoted spelling.
    Literal(String),
    /// A named token rule.
    Named(String),
    /// A rule dispatched through a user callback keyed by tag.
    Tagged(String),
    /// Matched text is dropped.
    Skip,
}

#[derive(Debug, Clone)]
enum RawRule {
    Named(String, String),
    Tagged(String, String),
    Skip(String),
}

/// Assembles literals and rules into a single anchored alternation.
///
/// Alternation order decides ties: literals first (longest first, word-like
/// literals guarded with `\b`), then the declared rules in insertion order.
#[derive(Debug)]
pub struct ScannerBuilder {
    book: PatternBook,
    literals: Vec<(String, String)>,
    rules: Vec<RawRule>,
}

impl ScannerBuilder {
    pub fn new(book: PatternBook) -> Self {
        Self {
            book,
            literals: vec![],
            rules: vec![],
        }
    }

    /// Registers a literal terminal. `text` is the raw lexeme, `name` the
    /// quoted spelling the token is renamed to after a match.
    pub fn literal(&mut self, text: &str, name: &str) -> &mut Self {
        if !self.literals.iter().any(|(t, _)| t == text) {
            self.literals.push((text.to_string(), name.to_string()));
        }
        self
    }

    pub fn ignore(&mut self, pattern: &str) -> &mut Self {
        self.rules.push(RawRule::Skip(pattern.to_string()));
        self
    }

    pub fn token(&mut self, name: &str, pattern: &str) -> &mut Self {
        self.rules
            .push(RawRule::Named(name.to_string(), pattern.to_string()));
        self
    }

    pub fn tagged(&mut self, tag: &str, pattern: &str) -> &mut Self {
        self.rules
            .push(RawRule::Tagged(tag.to_string(), pattern.to_string()));
        self
    }

    pub fn book_mut(&mut self) -> &mut PatternBook {
        &mut self.book
    }

    pub fn build(self) -> Result<super::Scanner, ScanError> {
        let mut names: Vec<String> = vec![];
        let mut groups: Vec<GroupInfo> = vec![];
        let mut alternatives: Vec<String> = vec![];
        let mut literal_names: BTreeMap<String, String> = BTreeMap::new();

        let mut literals = self.literals;
        literals.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        for (text, name) in &literals {
            if text.is_empty() {
                return Err(ScanError::EmptyPattern(name.clone()));
            }
            let mut pattern = regex::escape(text);
            if text.ends_with(|c: char| c.is_alphanumeric() || c == '_') {
                pattern.push_str(r"\b");
            }
            literal_names.insert(text.clone(), name.clone());
            groups.push(GroupInfo::Literal(text.clone()));
            alternatives.push(pattern);
        }

        for rule in &self.rules {
            let (info, raw, label) = match rule {
                RawRule::Named(name, pattern) => {
                    (GroupInfo::Named(name.clone()), pattern, name.as_str())
                }
                RawRule::Tagged(tag, pattern) => {
                    (GroupInfo::Tagged(tag.clone()), pattern, tag.as_str())
                }
                RawRule::Skip(pattern) => (GroupInfo::Skip, pattern, "@ignore"),
            };
            if raw.is_empty() {
                return Err(ScanError::EmptyPattern(label.to_string()));
            }
            if let GroupInfo::Named(name) = &info {
                if names.contains(name) {
                    return Err(ScanError::DuplicateRule(name.clone()));
                }
                names.push(name.clone());
            }
            groups.push(info);
            alternatives.push(self.book.expand(raw)?);
        }

        let mut master = String::from(r"\A(?:");
        for (index, alternative) in alternatives.iter().enumerate() {
            if index > 0 {
                master.push('|');
            }
            master.push_str(&format!("(?P<g{}>{})", index, alternative));
        }
        master.push(')');
        let master = Regex::new(&master)?;

        Ok(super::Scanner {
            master,
            groups,
            literal_names,
        })
    }
}
