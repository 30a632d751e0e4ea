//! Parser entry points and syntax-tree assembly.

use std::io::BufRead;

use bon::Builder;

use crate::ast::{Child, Node, NodeKind};
use crate::error::ParseError;
use crate::grammar::{self, ParseState};

/// Options used to control the behavior of the parser.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct ParserOptions {
    /// Whether or not to include `Comment` nodes in the output tree.
    pub comments: bool,
    /// Whether or not to attach `pos`/`endpos` byte offsets to every node.
    pub loc: bool,
    /// Whether or not to attach line/column information in addition to
    /// byte offsets; a superset of `loc`.
    pub loc2: bool,
    /// Whether or not to attach the literal source substring to every
    /// non-root node.
    pub source: bool,
    /// Whether or not to emit diagnostic trace events while parsing.
    pub trace: bool,
}

/// Parses shell source text into its syntax tree.
///
/// Returns the root `Program` node on success. Failure is coarse: the
/// input either matches the grammar in full or a syntax error is
/// returned; there is no partial tree and no recovery.
///
/// # Arguments
///
/// * `source` - The shell source text to parse.
/// * `options` - The options to use when parsing.
pub fn parse(source: &str, options: &ParserOptions) -> Result<Node, ParseError> {
    let state = ParseState::new(options.trace);

    if options.trace {
        tracing::debug!(target: "parse", len = source.len(), "parsing");
    }

    match grammar::shell::program(source, source, &state) {
        Ok(mut root) => {
            if options.comments {
                for (start, end, text) in state.take_comments() {
                    let comment =
                        Node::new(NodeKind::Comment, start + 1, end + 1, vec![Child::Str(text)]);
                    insert_comment(&mut root, comment);
                }
            }
            annotate(&mut root, source, options);

            if options.trace {
                tracing::debug!(target: "parse", "parse succeeded");
            }

            Ok(root)
        }
        Err(inner) => {
            if options.trace {
                tracing::debug!(target: "parse", error = %inner, "parse failed");
            }

            Err(ParseError::Syntax(inner))
        }
    }
}

/// Reads shell source from a [`BufRead`] and parses it.
#[derive(Builder)]
pub struct Parser<R: BufRead> {
    /// The reader to use for input.
    reader: R,
    /// Parsing options.
    #[builder(default)]
    options: ParserOptions,
}

impl<R: BufRead> Parser<R> {
    /// Returns a new parser instance.
    ///
    /// # Arguments
    ///
    /// * `reader` - The reader to use for input.
    /// * `options` - The options to use when parsing.
    pub fn new(reader: R, options: &ParserOptions) -> Self {
        Self {
            reader,
            options: options.clone(),
        }
    }

    /// Reads the input to its end and parses it into a syntax tree.
    pub fn parse_program(&mut self) -> Result<Node, ParseError> {
        let mut text = String::new();
        self.reader.read_to_string(&mut text)?;
        parse(&text, &self.options)
    }
}

/// Inserts `comment` into the deepest node whose span contains it, at the
/// sibling position that keeps child spans ordered.
fn insert_comment(parent: &mut Node, comment: Node) {
    let (Some(pos), Some(endpos)) = (comment.pos, comment.endpos) else {
        return;
    };

    let containing = parent.children.iter().position(|child| {
        matches!(child, Child::Node(n)
            if n.pos.is_some_and(|p| p <= pos) && n.endpos.is_some_and(|e| endpos <= e))
    });
    if let Some(index) = containing {
        if let Child::Node(inner) = &mut parent.children[index] {
            insert_comment(inner, comment);
        }
        return;
    }

    let index = parent
        .children
        .iter()
        .position(|child| matches!(child, Child::Node(n) if n.pos.is_some_and(|p| p > pos)))
        .unwrap_or(parent.children.len());
    parent.children.insert(index, Child::Node(comment));
}

/// Applies the location/source options to the finished tree. Spans are
/// tracked unconditionally during the parse and stripped here when no
/// location option asks for them.
fn annotate(root: &mut Node, source: &str, options: &ParserOptions) {
    let starts = options.loc2.then(|| line_starts(source));
    annotate_node(root, true, source, starts.as_deref(), options);
}

fn annotate_node(
    node: &mut Node,
    is_root: bool,
    source: &str,
    starts: Option<&[usize]>,
    options: &ParserOptions,
) {
    if let (Some(pos), Some(endpos)) = (node.pos, node.endpos) {
        if options.source && !is_root {
            node.source = Some(source[pos - 1..endpos - 1].to_owned());
        }
        if let Some(starts) = starts {
            let (line, col) = line_col(starts, pos - 1);
            let (end_line, end_col) = line_col(starts, endpos - 1);
            node.line = Some(line);
            node.col = Some(col);
            node.end_line = Some(end_line);
            node.end_col = Some(end_col);
        }
    }
    if !options.loc && !options.loc2 {
        node.pos = None;
        node.endpos = None;
    }
    for child in &mut node.children {
        if let Child::Node(inner) = child {
            annotate_node(inner, false, source, starts, options);
        }
    }
}

fn line_starts(source: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (offset, byte) in source.bytes().enumerate() {
        if byte == b'\n' {
            starts.push(offset + 1);
        }
    }
    starts
}

fn line_col(starts: &[usize], offset: usize) -> (usize, usize) {
    let line = starts.partition_point(|&start| start <= offset);
    (line, offset - starts[line - 1] + 1)
}
