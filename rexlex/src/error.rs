use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("pattern macro {{{0}}} is not defined")]
    UnknownMacro(String),
    #[error("pattern macro expansion did not terminate at {{{0}}}")]
    MacroCycle(String),
    #[error("empty pattern for \"{0}\"")]
    EmptyPattern(String),
    #[error("duplicate scanner rule \"{0}\"")]
    DuplicateRule(String),
    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),
}
