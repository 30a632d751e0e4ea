/// Represents an error that occurred while parsing shell source.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The input did not match the shell grammar. Carries the failure
    /// location reported by the PEG engine.
    #[error("syntax error at {}", .0.location)]
    Syntax(#[from] peg::error::ParseError<peg::str::LineCol>),

    /// An error occurred while reading the input stream.
    #[error("failed to read input")]
    Io(#[from] std::io::Error),
}
