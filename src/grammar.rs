//! The PEG grammar for POSIX shell.
//!
//! The grammar operates directly on the source text. Ordered choice makes
//! longest-match a discipline rather than a given: wherever two operators
//! share a prefix (`>>` vs `>`, `<<-` vs `<<` vs `<`), the longer lexeme
//! is listed first, and single-character operators refuse to match when
//! doubling them would form a longer operator. Reserved words are only
//! recognized when followed by a word boundary, and are excluded from
//! command-name positions by negative lookahead.
//!
//! Here-documents are the one place the parser keeps mutable state: the
//! [`ParseState`] threaded through the grammar records each captured body
//! range when a heredoc delimiter word is reduced, and every consumed
//! newline is followed by a skip that walks the parser past any recorded
//! body it would otherwise descend into.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::ast::{Child, Node, NodeKind};
use crate::heredoc::HeredocTracker;

/// Mutable context for a single parse: the here-document tracker plus the
/// comments encountered along the way.
pub(crate) struct ParseState {
    pub(crate) heredocs: HeredocTracker,
    comments: RefCell<BTreeMap<usize, (usize, String)>>,
    trace: bool,
}

impl ParseState {
    pub(crate) fn new(trace: bool) -> Self {
        Self {
            heredocs: HeredocTracker::new(trace),
            comments: RefCell::new(BTreeMap::new()),
            trace,
        }
    }

    /// Records a comment spanning `[start, end)` (0-based, excluding the
    /// terminating newline). Keyed by start offset, so a comment re-read
    /// under backtracking is recorded once.
    fn record_comment(&self, start: usize, end: usize, text: &str) {
        if self.trace {
            tracing::debug!(target: "parse", start, end, "captured comment");
        }
        self.comments
            .borrow_mut()
            .insert(start, (end, text.to_owned()));
    }

    /// Comments seen during the parse, in input order, excluding any that
    /// ended up inside a captured here-document body.
    pub(crate) fn take_comments(&self) -> Vec<(usize, usize, String)> {
        let comments = std::mem::take(&mut *self.comments.borrow_mut());
        comments
            .into_iter()
            .filter(|(start, _)| !self.heredocs.in_body(*start))
            .map(|(start, (end, text))| (start, end, text))
            .collect()
    }
}

const fn is_operator_char(c: char) -> bool {
    matches!(c, '&' | '|' | ';' | '<' | '>' | '(' | ')')
}

const fn is_unquoted_char(c: char) -> bool {
    !matches!(c, ' ' | '\t' | '\n' | '\'' | '"' | '\\') && !is_operator_char(c)
}

/// `#` opens a comment only at the start of input or after whitespace, a
/// newline, `;`, or `&`.
fn comment_can_start(src: &str, pos: usize) -> bool {
    pos == 0 || matches!(src.as_bytes()[pos - 1], b' ' | b'\t' | b'\n' | b';' | b'&')
}

/// Builds a node over the 0-based span `[start, end)`, stored 1-based.
fn node(kind: NodeKind, start: usize, end: usize, children: Vec<Child>) -> Node {
    Node::new(kind, start + 1, end + 1, children)
}

peg::parser! {
    pub(crate) grammar shell(src: &str, state: &super::ParseState) for str {
        pub(crate) rule program() -> Node =
            s:position!() linebreak() commands:(complete_command() ** newline_list()) linebreak() comment()? e:position!() eof() {
                node(NodeKind::Program, s, e, commands.into_iter().map(Child::Node).collect())
            }

        rule complete_command() -> Node =
            s:position!() first:and_or() rest:(ws() separator_op() ws() a:and_or() { a })* (ws() separator_op())? e:position!() {
                let mut children = vec![Child::Node(first)];
                children.extend(rest.into_iter().map(Child::Node));
                node(NodeKind::CompleteCommand, s, e, children)
            }

        // The pipeline stands on its own when no `&&`/`||` follows; an
        // AndList/OrList node wraps it otherwise. Right-associative.
        rule and_or() -> Node =
            s:position!() p:pipeline() rest:(ws() kind:and_or_op() linebreak() r:and_or() { (kind, r) })? e:position!() {
                match rest {
                    Some((kind, rhs)) => node(kind, s, e, vec![Child::Node(p), Child::Node(rhs)]),
                    None => p,
                }
            }

        rule and_or_op() -> NodeKind =
            "&&" { NodeKind::AndList } /
            "||" { NodeKind::OrList }

        rule pipeline() -> Node =
            s:position!() "!" word_boundary() ws() seq:pipe_sequence() e:position!() {
                node(NodeKind::Not, s, e, vec![Child::Node(seq)])
            } /
            pipe_sequence()

        // A lone command stands for itself rather than being wrapped.
        rule pipe_sequence() -> Node =
            s:position!() first:command() rest:(ws() pipe() linebreak() c:command() { c })* e:position!() {
                if rest.is_empty() {
                    first
                } else {
                    let mut children = vec![Child::Node(first)];
                    children.extend(rest.into_iter().map(Child::Node));
                    node(NodeKind::PipeSequence, s, e, children)
                }
            }

        rule command() -> Node =
            function_definition() /
            compound_command_with_redirects() /
            simple_command() /
            expected!("command")

        rule function_definition() -> Node =
            s:position!() !reserved_word() n:name() ws() "(" ws() ")" linebreak() body:compound_command() redirects:(ws() r:io_redirect() { r })* e:position!() {
                let mut children = vec![Child::Node(n), Child::Node(body)];
                children.extend(redirects.into_iter().map(Child::Node));
                node(NodeKind::FunctionDefinition, s, e, children)
            }

        // Trailing redirections fold into the compound node itself; there
        // is no wrapper kind for them.
        rule compound_command_with_redirects() -> Node =
            c:compound_command() redirects:(ws() r:io_redirect() { r })* e:position!() {
                let mut c = c;
                if !redirects.is_empty() {
                    c.endpos = Some(e + 1);
                    c.children.extend(redirects.into_iter().map(Child::Node));
                }
                c
            }

        rule compound_command() -> Node =
            brace_group() /
            subshell() /
            for_clause() /
            case_clause() /
            if_clause() /
            while_clause() /
            until_clause()

        rule brace_group() -> Node =
            s:position!() "{" word_boundary() body:compound_list() ws() "}" e:position!() {
                node(NodeKind::BraceGroup, s, e, body)
            }

        rule subshell() -> Node =
            s:position!() "(" body:compound_list() ws() ")" e:position!() {
                node(NodeKind::Subshell, s, e, body)
            }

        rule compound_list() -> Vec<Child> =
            linebreak() first:and_or() rest:(separator() a:and_or() { a })* separator()? {
                let mut items = vec![Child::Node(first)];
                items.extend(rest.into_iter().map(Child::Node));
                items
            }

        rule for_clause() -> Node =
            s:position!() "for" word_boundary() ws() n:name() linebreak() "in" word_boundary() words:(ws() w:word() { w })* sequential_sep() body:do_group() e:position!() {
                let mut children = vec![Child::Node(n)];
                children.extend(words.into_iter().map(Child::Node));
                children.extend(body);
                node(NodeKind::ForClause, s, e, children)
            } /
            s:position!() "for" word_boundary() ws() n:name() sequential_sep()? body:do_group() e:position!() {
                let mut children = vec![Child::Node(n)];
                children.extend(body);
                node(NodeKind::ForClause, s, e, children)
            }

        rule do_group() -> Vec<Child> =
            ws() "do" word_boundary() body:compound_list() ws() "done" word_boundary() { body }

        rule case_clause() -> Node =
            s:position!() "case" word_boundary() ws() w:word() linebreak() "in" word_boundary() items:case_item()* last:case_item_ns()? linebreak() "esac" word_boundary() e:position!() {
                let mut children = vec![Child::Node(w)];
                children.extend(items.into_iter().map(Child::Node));
                if let Some(last) = last {
                    children.push(Child::Node(last));
                }
                node(NodeKind::CaseClause, s, e, children)
            }

        rule case_item() -> Node =
            linebreak() s:position!() p:case_patterns() ws() ")" linebreak() ";;" e:position!() {
                node(NodeKind::CaseItem, s, e, vec![Child::Node(p)])
            } /
            linebreak() s:position!() p:case_patterns() ws() ")" body:compound_list() ws() ";;" e:position!() {
                let mut children = vec![Child::Node(p)];
                children.extend(body);
                node(NodeKind::CaseItem, s, e, children)
            }

        rule case_item_ns() -> Node =
            linebreak() s:position!() p:case_patterns() ws() ")" body:compound_list() e:position!() {
                let mut children = vec![Child::Node(p)];
                children.extend(body);
                node(NodeKind::CaseItem, s, e, children)
            } /
            linebreak() s:position!() p:case_patterns() ws() ")" linebreak() e:position!() {
                node(NodeKind::CaseItem, s, e, vec![Child::Node(p)])
            }

        // An unparenthesized item must not begin with `esac`; that word
        // closes the whole clause.
        rule case_patterns() -> Node =
            "(" ws() p:pattern() { p } /
            !("esac" word_boundary()) p:pattern() { p }

        rule pattern() -> Node =
            s:position!() first:word() rest:(ws() "|" ws() w:word() { w })* e:position!() {
                let mut children = vec![Child::Node(first)];
                children.extend(rest.into_iter().map(Child::Node));
                node(NodeKind::Pattern, s, e, children)
            }

        rule if_clause() -> Node =
            s:position!() "if" word_boundary() body:if_body() ws() "fi" word_boundary() e:position!() {
                node(NodeKind::IfClause, s, e, body)
            }

        rule if_body() -> Vec<Child> =
            condition:compound_list() ws() "then" word_boundary() consequence:compound_list() tail:if_tail()? {
                let mut items = condition;
                items.extend(consequence);
                if let Some(tail) = tail {
                    items.extend(tail);
                }
                items
            }

        // `elif` desugars into a nested IfClause occupying the else
        // position of its parent.
        rule if_tail() -> Vec<Child> =
            ws() s:position!() "elif" word_boundary() body:if_body() e:position!() {
                vec![Child::Node(node(NodeKind::IfClause, s, e, body))]
            } /
            ws() "else" word_boundary() body:compound_list() { body }

        rule while_clause() -> Node =
            s:position!() "while" word_boundary() condition:compound_list() body:do_group() e:position!() {
                let mut children = condition;
                children.extend(body);
                node(NodeKind::WhileClause, s, e, children)
            }

        rule until_clause() -> Node =
            s:position!() "until" word_boundary() condition:compound_list() body:do_group() e:position!() {
                let mut children = condition;
                children.extend(body);
                node(NodeKind::UntilClause, s, e, children)
            }

        rule simple_command() -> Node =
            s:position!() first:prefix_item() rest:(ws() i:prefix_item() { i })* tail:(ws() n:cmd_name() suffix:(ws() i:suffix_item() { i })* { (n, suffix) })? e:position!() {
                let mut children = vec![Child::Node(first)];
                children.extend(rest.into_iter().map(Child::Node));
                if let Some((name, suffix)) = tail {
                    children.push(Child::Node(name));
                    children.extend(suffix.into_iter().map(Child::Node));
                }
                node(NodeKind::SimpleCommand, s, e, children)
            } /
            s:position!() n:cmd_name() suffix:(ws() i:suffix_item() { i })* e:position!() {
                let mut children = vec![Child::Node(n)];
                children.extend(suffix.into_iter().map(Child::Node));
                node(NodeKind::SimpleCommand, s, e, children)
            } /
            expected!("simple command")

        rule prefix_item() -> Node =
            io_redirect() /
            assignment()

        rule suffix_item() -> Node =
            io_redirect() /
            s:position!() w:word() e:position!() {
                node(NodeKind::CmdArgument, s, e, vec![Child::Node(w)])
            }

        rule cmd_name() -> Node =
            s:position!() !reserved_word() w:word() e:position!() {
                node(NodeKind::CmdName, s, e, vec![Child::Node(w)])
            }

        rule assignment() -> Node =
            s:position!() n:name() "=" w:word()? e:position!() {
                let mut children = vec![Child::Node(n)];
                if let Some(w) = w {
                    children.push(Child::Node(w));
                }
                node(NodeKind::Assignment, s, e, children)
            }

        rule io_redirect() -> Node =
            io_here_doc() /
            io_redirect_file() /
            expected!("I/O redirect")

        rule io_redirect_file() -> Node =
            s:position!() n:io_number()? op:file_operator() ws() target:word() e:position!() {
                let mut children = vec![];
                if let Some(n) = n {
                    children.push(Child::Num(n));
                }
                children.push(Child::Str(op.to_owned()));
                children.push(Child::Node(target));
                node(NodeKind::IORedirectFile, s, e, children)
            }

        rule file_operator() -> &'static str =
            ">|" { ">|" } /
            ">>" { ">>" } /
            ">&" { ">&" } /
            "<&" { "<&" } /
            "<>" { "<>" } /
            ">" !">" { ">" } /
            "<" !"<" { "<" }

        // The capture hook: runs as soon as the delimiter word has been
        // reduced, consuming no input.
        rule io_here_doc() -> Node =
            s:position!() n:io_number()? op:here_operator() ws() delimiter:word() e:position!() {
                let body = state.heredocs.capture(src, &delimiter.text(), op == "<<-", e);
                let mut children = vec![];
                if let Some(n) = n {
                    children.push(Child::Num(n));
                }
                children.push(Child::Str(op.to_owned()));
                children.push(Child::Node(delimiter));
                children.push(Child::Str(body));
                node(NodeKind::IOHereDoc, s, e, children)
            }

        rule here_operator() -> &'static str =
            "<<-" { "<<-" } /
            "<<" !"<" { "<<" }

        // Only digits immediately preceding a redirection operator.
        rule io_number() -> u32 =
            digits:$(['0'..='9']+) &['<' | '>'] {? digits.parse().or(Err("io number")) }

        rule name() -> Node =
            s:position!() text:$(['A'..='Z' | 'a'..='z' | '_'] ['A'..='Z' | 'a'..='z' | '0'..='9' | '_']*) e:position!() {
                node(NodeKind::Name, s, e, vec![Child::Str(text.to_owned())])
            }

        rule word() -> Node =
            s:position!() !"#" segments:word_segment()+ e:position!() {
                node(NodeKind::Word, s, e, segments.into_iter().map(Child::Str).collect())
            }

        rule word_segment() -> String =
            double_quoted() /
            single_quoted() /
            unquoted()

        rule double_quoted() -> String =
            "\"" parts:double_quoted_part()* "\"" { parts.concat() }

        rule double_quoted_part() -> String =
            escaped() /
            part:$([c if c != '"' && c != '\\']+) { part.to_owned() }

        // No escapes inside single quotes.
        rule single_quoted() -> String =
            "'" text:$([c if c != '\'']*) "'" { text.to_owned() }

        rule unquoted() -> String =
            parts:unquoted_part()+ { parts.concat() }

        rule unquoted_part() -> String =
            escaped() /
            part:$([c if is_unquoted_char(c)]+) { part.to_owned() }

        // An escaped newline is a line continuation and yields nothing.
        rule escaped() -> String =
            "\\" "\n" { String::new() } /
            "\\" c:[_] { c.to_string() }

        rule comment() =
            s:position!() comment_gate() "#" text:$([c if c != '\n']*) e:position!() {
                state.record_comment(s, e, text);
            }

        rule comment_gate() =
            p:position!() {? if comment_can_start(src, p) { Ok(()) } else { Err("comment") } }

        rule reserved_word() =
            quiet!{ (
                "case" / "done" / "do" / "elif" / "else" / "esac" / "fi" / "for" /
                "if" / "in" / "then" / "until" / "while" / "!" / "{" / "}"
            ) word_boundary() }

        rule word_boundary() =
            &[' ' | '\t' | '\n'] /
            &[c if is_operator_char(c)] /
            ![_]

        rule separator_op() =
            "&" !"&" /
            ";" !";"

        rule separator() =
            quiet!{ ws() separator_op() linebreak() } /
            newline_list()

        rule sequential_sep() =
            quiet!{ ws() ";" !";" linebreak() } /
            newline_list()

        rule pipe() = "|" !"|"

        rule newline_list() =
            quiet!{ ws() (comment()? newline() ws())+ }

        rule linebreak() =
            quiet!{ ws() (comment()? newline() ws())* }

        // Every consumed newline is followed by the heredoc skip hook.
        rule newline() =
            "\n" heredoc_skip()

        rule heredoc_skip() =
            (in_heredoc_body() [_])*

        rule in_heredoc_body() =
            p:position!() {? if state.heredocs.in_body(p) { Ok(()) } else { Err("heredoc body") } }

        rule ws() = quiet!{ [' ' | '\t']* }

        rule eof() = ![_]
    }
}
