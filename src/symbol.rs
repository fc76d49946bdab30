use std::cmp::Ordering;
use std::collections::{btree_set, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;
use std::ops::BitOrAssign;

/// Name of the end-of-input terminal.
pub const END_MARK: &str = "$";
/// Name of the LALR lookahead discovery sentinel. Never appears in a user
/// grammar.
pub const SENTINEL_MARK: &str = "#";
/// Name of the synthetic start symbol of an augmented grammar.
pub const AUGMENT_MARK: &str = "S^";

/// Operator grouping direction used when a shift/reduce tie must be broken.
/// `Unspecified` is what `%precedence` declares: a level with no grouping
/// rule attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
    NonAssoc,
    Unspecified,
}

impl Default for Associativity {
    fn default() -> Self {
        Associativity::Unspecified
    }
}

impl fmt::Display for Associativity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Associativity::Left => write!(f, "left"),
            Associativity::Right => write!(f, "right"),
            Associativity::NonAssoc => write!(f, "nonassoc"),
            Associativity::Unspecified => write!(f, "precedence"),
        }
    }
}

/// A declared precedence: level plus associativity. Levels count up from 1;
/// later declarations outrank earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Precedence {
    pub level: u16,
    pub associativity: Associativity,
}

/// A grammar symbol: a name and a terminal flag.
///
/// Equality, ordering and hashing are by name only; the terminal flag is
/// bookkeeping that `Grammar::update` keeps consistent with the terminal
/// registry. The empty name is the ε symbol. A name that starts with a quote
/// is a literal and terminal by construction.
#[derive(Debug, Clone, Default)]
pub struct Symbol {
    name: String,
    terminal: bool,
}

impl Symbol {
    pub fn new(name: &str) -> Self {
        let terminal = name.starts_with('\'')
            || name.starts_with('"')
            || name == END_MARK
            || name == SENTINEL_MARK;
        Self {
            name: name.to_string(),
            terminal,
        }
    }

    pub fn terminal(name: &str) -> Self {
        Self {
            name: name.to_string(),
            terminal: true,
        }
    }

    pub fn non_terminal(name: &str) -> Self {
        Self {
            name: name.to_string(),
            terminal: false,
        }
    }

    pub fn epsilon() -> Self {
        Self {
            name: String::new(),
            terminal: false,
        }
    }

    pub fn end() -> Self {
        Self::terminal(END_MARK)
    }

    pub fn sentinel() -> Self {
        Self::terminal(SENTINEL_MARK)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn is_non_terminal(&self) -> bool {
        !self.terminal
    }

    pub fn is_epsilon(&self) -> bool {
        self.name.is_empty()
    }

    pub fn is_literal(&self) -> bool {
        self.name.starts_with('\'') || self.name.starts_with('"')
    }

    pub fn is_end(&self) -> bool {
        self.name == END_MARK
    }

    pub fn is_sentinel(&self) -> bool {
        self.name == SENTINEL_MARK
    }

    pub fn is_augment(&self) -> bool {
        self.name == AUGMENT_MARK
    }

    pub(crate) fn set_terminal(&mut self, terminal: bool) {
        self.terminal = terminal;
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Symbol {}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_epsilon() {
            write!(f, "%empty")
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// An ordered set of symbols with the set-algebra surface the analyzer and
/// constructors need.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SymbolSet(BTreeSet<Symbol>);

impl SymbolSet {
    pub fn new() -> Self {
        SymbolSet::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.0.contains(symbol)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.0.iter().any(|s| s.name() == name)
    }

    pub fn contains_epsilon(&self) -> bool {
        self.0.iter().any(|s| s.is_epsilon())
    }

    pub fn insert(&mut self, symbol: &Symbol) -> bool {
        self.0.insert(symbol.clone())
    }

    pub fn remove(&mut self, symbol: &Symbol) -> bool {
        self.0.remove(symbol)
    }

    pub fn iter(&self) -> btree_set::Iter<Symbol> {
        self.0.iter()
    }

    pub fn without_epsilon(&self) -> SymbolSet {
        self.0
            .iter()
            .filter(|s| !s.is_epsilon())
            .cloned()
            .collect()
    }

    /// Unions `other` in; reports whether anything was added.
    pub fn absorb(&mut self, other: &SymbolSet) -> bool {
        let before = self.0.len();
        for symbol in other.iter() {
            self.0.insert(symbol.clone());
        }
        self.0.len() > before
    }

    pub fn intersection(&self, other: &SymbolSet) -> SymbolSet {
        self.0.intersection(&other.0).cloned().collect()
    }

    pub fn is_disjoint(&self, other: &SymbolSet) -> bool {
        self.0.is_disjoint(&other.0)
    }

    pub fn is_subset(&self, other: &SymbolSet) -> bool {
        self.0.is_subset(&other.0)
    }
}

impl BitOrAssign<&SymbolSet> for SymbolSet {
    fn bitor_assign(&mut self, rhs: &SymbolSet) {
        self.absorb(rhs);
    }
}

impl FromIterator<Symbol> for SymbolSet {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Symbol>,
    {
        Self(BTreeSet::from_iter(iter))
    }
}

impl fmt::Display for SymbolSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut string = "{".to_string();
        for (index, item) in self.iter().enumerate() {
            if index > 0 {
                string += ", ";
            }
            string += &item.to_string();
        }
        string += "}";
        write!(f, "{}", string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_by_name() {
        let a = Symbol::terminal("x");
        let b = Symbol::non_terminal("x");
        assert_eq!(a, b);
        let mut set = SymbolSet::new();
        assert!(set.insert(&a));
        assert!(!set.insert(&b));
    }

    #[test]
    fn literals_are_terminal_by_construction() {
        assert!(Symbol::new("'+'").is_terminal());
        assert!(Symbol::new("\"if\"").is_terminal());
        assert!(Symbol::new("expr").is_non_terminal());
        assert!(Symbol::new(END_MARK).is_terminal());
        assert!(Symbol::new(SENTINEL_MARK).is_terminal());
    }

    #[test]
    fn set_algebra() {
        let mut a: SymbolSet = ["'+'", "'-'"].iter().map(|n| Symbol::new(n)).collect();
        let b: SymbolSet = ["'-'", "'*'"].iter().map(|n| Symbol::new(n)).collect();
        assert!(a.absorb(&b));
        assert!(!a.absorb(&b));
        assert_eq!(a.len(), 3);
        assert_eq!(a.intersection(&b).len(), 2);
        let epsilonish: SymbolSet = [Symbol::epsilon(), Symbol::new("'x'")]
            .into_iter()
            .collect();
        assert!(epsilonish.contains_epsilon());
        assert!(!epsilonish.without_epsilon().contains_epsilon());
        assert_eq!(format!("{}", epsilonish), "{%empty, 'x'}");
    }
}
