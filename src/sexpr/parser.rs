use crate::error::{Location, ParseError};

use super::{
    lexer::{Token, TokenIter, TokenKind},
    Atom, List, SExpr, Tree,
};

/// Single pass parser. Open lists live on an explicit stack, so nesting depth is bounded by
/// memory rather than by the call stack.
pub(super) struct Parser<'a> {
    input: &'a str,
    iter: TokenIter<'a>,
    stack: Vec<List>,
}

impl<'a> Parser<'a> {
    pub(super) fn new(input: &'a str) -> Self {
        Self {
            input,
            iter: TokenIter::new(input),
            stack: Vec::new(),
        }
    }

    fn location(&self, offset: usize) -> Location {
        Location::from_offset(self.input, offset)
    }

    pub(super) fn parse(mut self) -> Result<Tree, ParseError> {
        let mut root: Option<List> = None;
        let mut pending: Option<&'a str> = None;

        while let Some(Token { kind, span }) = self.iter.next() {
            let text = &self.input[span.clone()];
            if kind == TokenKind::Whitespace {
                pending = Some(text);
                continue;
            }
            let lead: Option<Box<str>> = Some(pending.take().unwrap_or("").into());

            match kind {
                TokenKind::LParen => {
                    if root.is_some() {
                        return Err(ParseError::TrailingContent {
                            at: self.location(span.start),
                        });
                    }
                    self.stack.push(List {
                        items: Vec::new(),
                        lead,
                        tail: None,
                        offset: Some(span.start),
                    });
                }
                TokenKind::RParen => {
                    let Some(mut list) = self.stack.pop() else {
                        return Err(ParseError::UnbalancedClose {
                            at: self.location(span.start),
                        });
                    };
                    list.tail = lead;
                    match self.stack.last_mut() {
                        Some(parent) => parent.items.push(SExpr::List(list)),
                        None => root = Some(list),
                    }
                }
                TokenKind::String | TokenKind::Number | TokenKind::Symbol => {
                    let mut atom = atom(kind, text);
                    atom.set_lead(lead);
                    match self.stack.last_mut() {
                        Some(parent) => parent.items.push(atom),
                        None if root.is_some() => {
                            return Err(ParseError::TrailingContent {
                                at: self.location(span.start),
                            })
                        }
                        None => {
                            return Err(ParseError::ExpectedList {
                                at: self.location(span.start),
                            })
                        }
                    }
                }
                TokenKind::UnterminatedString => {
                    return Err(ParseError::UnterminatedString {
                        at: self.location(span.start),
                    })
                }
                TokenKind::Error | TokenKind::Whitespace => {
                    return Err(ParseError::InvalidToken {
                        found: text.to_owned(),
                        at: self.location(span.start),
                    })
                }
            }
        }

        if let Some(open) = self.stack.last() {
            let offset = open.offset.unwrap_or(self.input.len());
            return Err(ParseError::UnclosedList {
                at: self.location(offset),
            });
        }

        let root = root.ok_or(ParseError::Empty)?;
        Ok(Tree {
            root,
            epilogue: Some(pending.unwrap_or("").into()),
            indent: super::writer::DEFAULT_INDENT.into(),
        })
    }
}

fn atom(kind: TokenKind, text: &str) -> SExpr {
    match kind {
        TokenKind::String => SExpr::String(Atom {
            value: unescape(&text[1..text.len() - 1]),
            raw: Some(text.into()),
            lead: None,
        }),
        TokenKind::Number => match text.parse::<f64>() {
            Ok(value) => SExpr::Number(Atom {
                value,
                raw: Some(text.into()),
                lead: None,
            }),
            Err(_) => SExpr::symbol(text),
        },
        _ => SExpr::symbol(text),
    }
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
