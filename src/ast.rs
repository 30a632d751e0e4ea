//! Defines the abstract syntax tree (AST) for shell programs.
//!
//! The tree is a uniform tagged structure: every [`Node`] carries a
//! [`NodeKind`], an ordered list of children (nested nodes or primitive
//! captures), and optional annotations controlled by
//! [`ParserOptions`](crate::ParserOptions). It serializes to a generic
//! tagged-tree form where primitive captures appear as plain strings and
//! numbers.

/// Identifies the syntactic construct a [`Node`] represents.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum NodeKind {
    /// The root of a parsed script.
    Program,
    /// A top-level command list joined by `&` or `;`.
    CompleteCommand,
    /// A short-circuit `&&` chain; right-associative.
    AndList,
    /// A short-circuit `||` chain; right-associative.
    OrList,
    /// A pipeline wrapper. Reserved; the parser re-emits the inner
    /// command instead of producing a one-child wrapper.
    Pipeline,
    /// A `!`-negated pipeline.
    Not,
    /// Two or more commands joined by `|`.
    PipeSequence,
    /// A `name() ...` function definition.
    FunctionDefinition,
    /// A parenthesized subshell.
    Subshell,
    /// A `{ ...; }` group.
    BraceGroup,
    /// A `for` loop.
    ForClause,
    /// A `case` conditional.
    CaseClause,
    /// One pattern arm of a `case` conditional.
    CaseItem,
    /// The `|`-separated patterns of a case item.
    Pattern,
    /// An `if`/`elif`/`else` conditional.
    IfClause,
    /// A `while` loop.
    WhileClause,
    /// An `until` loop.
    UntilClause,
    /// A simple command: assignments, redirections, name, arguments.
    SimpleCommand,
    /// The command word of a simple command.
    CmdName,
    /// An argument word of a simple command.
    CmdArgument,
    /// A `name=value` assignment.
    Assignment,
    /// A file redirection such as `2> err.log`.
    IORedirectFile,
    /// A here-document redirection; carries the captured body.
    IOHereDoc,
    /// An identifier.
    Name,
    /// A shell word composed of quoted and unquoted segments.
    Word,
    /// A `#` comment; only present when comment capture is enabled.
    Comment,
}

impl NodeKind {
    /// Returns the kind's canonical name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Program => "Program",
            Self::CompleteCommand => "CompleteCommand",
            Self::AndList => "AndList",
            Self::OrList => "OrList",
            Self::Pipeline => "Pipeline",
            Self::Not => "Not",
            Self::PipeSequence => "PipeSequence",
            Self::FunctionDefinition => "FunctionDefinition",
            Self::Subshell => "Subshell",
            Self::BraceGroup => "BraceGroup",
            Self::ForClause => "ForClause",
            Self::CaseClause => "CaseClause",
            Self::CaseItem => "CaseItem",
            Self::Pattern => "Pattern",
            Self::IfClause => "IfClause",
            Self::WhileClause => "WhileClause",
            Self::UntilClause => "UntilClause",
            Self::SimpleCommand => "SimpleCommand",
            Self::CmdName => "CmdName",
            Self::CmdArgument => "CmdArgument",
            Self::Assignment => "Assignment",
            Self::IORedirectFile => "IORedirectFile",
            Self::IOHereDoc => "IOHereDoc",
            Self::Name => "Name",
            Self::Word => "Word",
            Self::Comment => "Comment",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A child of a [`Node`]: either a nested node or a primitive capture.
///
/// Primitive captures are strings (names, quoted text, comment bodies,
/// redirection operator symbols, here-document bodies) or integers
/// (io-numbers). They serialize untagged, as plain JSON strings and
/// numbers.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Child {
    /// A nested node.
    Node(Node),
    /// A string capture.
    Str(String),
    /// An integer capture.
    Num(u32),
}

impl std::fmt::Display for Child {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node(node) => write!(f, "{node}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Num(n) => write!(f, "{n}"),
        }
    }
}

/// A node in the parsed syntax tree.
///
/// Positions are 1-based byte offsets into the parsed input; `endpos` is
/// one past the last byte of the node's span. Annotation fields are only
/// populated when the corresponding parse option is set.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    /// The construct this node represents.
    pub kind: NodeKind,
    /// Start of the node's span.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<usize>,
    /// One past the end of the node's span.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpos: Option<usize>,
    /// 1-based line of the node's start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// 1-based column of the node's start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col: Option<usize>,
    /// 1-based line of the node's end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    /// 1-based column of the node's end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_col: Option<usize>,
    /// The literal input text spanned by this node. Never present on the
    /// root node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Child nodes and primitive captures, in input order.
    pub children: Vec<Child>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, pos: usize, endpos: usize, children: Vec<Child>) -> Self {
        Self {
            kind,
            pos: Some(pos),
            endpos: Some(endpos),
            line: None,
            col: None,
            end_line: None,
            end_col: None,
            source: None,
            children,
        }
    }

    /// Concatenates the primitive captures beneath this node, depth first.
    ///
    /// For a `Word` node this yields the word's text with quoting and
    /// escapes already resolved.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Child::Node(node) => node.collect_text(out),
                Child::Str(s) => out.push_str(s),
                Child::Num(n) => out.push_str(&n.to_string()),
            }
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if self.children.is_empty() {
            return Ok(());
        }
        f.write_str("(")?;
        for (i, child) in self.children.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{child}")?;
        }
        f.write_str(")")
    }
}
