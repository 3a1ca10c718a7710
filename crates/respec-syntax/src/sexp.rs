// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Reader for the S-expression AST dump.
//!
//! The dump is the `parser` gem's S-expression form extended with byte ranges:
//!
//! ```text
//! <node>     := "(" <type> [<range>] [<heredoc>] <child>* ")"
//! <range>    := "@" <uint> ".." <uint>
//! <heredoc>  := "~" <uint> ".." <uint>
//! <child>    := <node> | "nil" | "true" | "false" | <int> | <float>
//!             | ":" (<bare-symbol> | <string>) | <string>
//! <string>   := JSON string literal
//! ```
//!
//! Example for `user.should be_valid`:
//!
//! ```text
//! (send @0..20 (send @0..4 nil :user) :should (send @12..20 nil :be_valid))
//! ```
//!
//! A node without a range gets an empty span at offset 0. Ranges are checked
//! against the source when the tree is built.
//!
//! Nodes may nest at most [`MAX_NESTING`] levels deep. The reader recurses
//! once per level, so deeper dumps are rejected before parsing starts.

use respec_core::patch::Span;
use tracing::debug;
use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, delimited, opt, preceded, repeat, separated_pair};
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::token::{any, take_while};
use winnow::ModalResult;

use crate::error::{SyntaxError, SyntaxResult};
use crate::tree::{Child, Literal, NodeId, Tree, TreeBuilder};

/// Deepest node nesting a dump may have.
pub const MAX_NESTING: usize = 200;

/// Node as read from the dump, before ids are assigned.
#[derive(Debug)]
struct RawNode {
    kind: String,
    range: Option<(usize, usize)>,
    heredoc: Option<(usize, usize)>,
    children: Vec<RawChild>,
}

#[derive(Debug)]
enum RawChild {
    Node(RawNode),
    Literal(Literal),
}

/// Read a dump of `source` into a [`Tree`].
///
/// # Errors
///
/// `SyntaxError::Malformed` for text that does not match the grammar, and
/// `SyntaxError::InvalidRange` for ranges that do not fit `source`.
pub fn parse_sexp(path: &str, source: &str, dump: &str) -> SyntaxResult<Tree> {
    check_nesting(dump)?;
    let raw = delimited(multispace0, parse_node, multispace0)
        .parse(dump)
        .map_err(|e| {
            SyntaxError::malformed(format!("at byte {} of dump: {:?}", e.offset(), e.inner()))
        })?;

    let mut builder = TreeBuilder::new(path, source);
    let root = build(&mut builder, raw)?;
    let tree = builder.finish(root)?;
    debug!(path, nodes = tree.len(), "read AST dump");
    Ok(tree)
}

/// Reject dumps nested deeper than [`MAX_NESTING`]. Parentheses inside string
/// literals do not count.
fn check_nesting(dump: &str) -> SyntaxResult<()> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in dump.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(SyntaxError::malformed(format!(
                        "at byte {} of dump: nodes nested deeper than {} levels",
                        offset, MAX_NESTING
                    )));
                }
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

fn to_span((begin, end): (usize, usize)) -> SyntaxResult<Span> {
    if begin > end {
        return Err(SyntaxError::malformed(format!(
            "range {}..{} ends before it begins",
            begin, end
        )));
    }
    Ok(Span::new(begin, end))
}

fn build(builder: &mut TreeBuilder, raw: RawNode) -> SyntaxResult<NodeId> {
    let range = match raw.range {
        Some(pair) => to_span(pair)?,
        None => Span::point(0),
    };
    let heredoc = raw.heredoc.map(to_span).transpose()?;

    let mut children = Vec::with_capacity(raw.children.len());
    for child in raw.children {
        children.push(match child {
            RawChild::Node(node) => Child::Node(build(builder, node)?),
            RawChild::Literal(lit) => Child::Literal(lit),
        });
    }
    builder.push(raw.kind, range, heredoc, children)
}

// ============================================================================
// Parser implementation using winnow
// ============================================================================

fn parse_node(input: &mut &str) -> ModalResult<RawNode> {
    let _ = '('.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    let kind: &str =
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)?;
    let range = opt(preceded((multispace0, '@'), parse_uint_pair)).parse_next(input)?;
    let heredoc = opt(preceded((multispace0, '~'), parse_uint_pair)).parse_next(input)?;
    let children: Vec<RawChild> =
        repeat(0.., preceded(multispace0, parse_child)).parse_next(input)?;
    let _ = (multispace0, ')').parse_next(input)?;

    Ok(RawNode {
        kind: kind.to_string(),
        range,
        heredoc,
        children,
    })
}

/// `<uint> ".." <uint>`
fn parse_uint_pair(input: &mut &str) -> ModalResult<(usize, usize)> {
    separated_pair(parse_uint, "..", parse_uint).parse_next(input)
}

fn parse_uint(input: &mut &str) -> ModalResult<usize> {
    digit1.try_map(str::parse::<usize>).parse_next(input)
}

fn parse_child(input: &mut &str) -> ModalResult<RawChild> {
    alt((
        parse_node.map(RawChild::Node),
        parse_literal.map(RawChild::Literal),
    ))
    .parse_next(input)
}

fn parse_literal(input: &mut &str) -> ModalResult<Literal> {
    alt((
        parse_symbol,
        parse_string.map(Literal::Str),
        parse_number,
        parse_keyword,
    ))
    .parse_next(input)
}

fn parse_keyword(input: &mut &str) -> ModalResult<Literal> {
    let checkpoint = *input;
    let word: &str = take_while(1.., |c: char| c.is_ascii_alphabetic()).parse_next(input)?;
    match word {
        "nil" => Ok(Literal::Nil),
        "true" => Ok(Literal::Bool(true)),
        "false" => Ok(Literal::Bool(false)),
        _ => {
            *input = checkpoint;
            Err(ErrMode::from_input(input))
        }
    }
}

fn parse_symbol(input: &mut &str) -> ModalResult<Literal> {
    let _ = ':'.parse_next(input)?;
    alt((
        parse_string,
        take_while(1.., |c: char| !c.is_whitespace() && c != '(' && c != ')')
            .map(|s: &str| s.to_string()),
    ))
    .map(Literal::Symbol)
    .parse_next(input)
}

fn parse_number(input: &mut &str) -> ModalResult<Literal> {
    let checkpoint = *input;
    let text: &str = (
        opt('-'),
        digit1,
        take_while(0.., |c: char| {
            c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+')
        }),
    )
        .take()
        .parse_next(input)?;

    if let Ok(value) = text.parse::<i64>() {
        return Ok(Literal::Integer(value));
    }
    if let Ok(value) = text.parse::<f64>() {
        return Ok(Literal::Float(value));
    }
    *input = checkpoint;
    Err(ErrMode::from_input(input))
}

/// A JSON string literal, unescaped.
fn parse_string(input: &mut &str) -> ModalResult<String> {
    let checkpoint = *input;
    let raw: &str = ('"', repeat::<_, _, (), _, _>(0.., string_piece), '"')
        .take()
        .parse_next(input)?;
    match serde_json::from_str::<String>(raw) {
        Ok(value) => Ok(value),
        Err(_) => {
            *input = checkpoint;
            Err(ErrMode::from_input(input))
        }
    }
}

fn string_piece(input: &mut &str) -> ModalResult<()> {
    alt((
        preceded('\\', any).void(),
        take_while(1.., |c: char| c != '"' && c != '\\').void(),
    ))
    .parse_next(input)
}

// ============================================================================
// Tests
// ============================================================================
