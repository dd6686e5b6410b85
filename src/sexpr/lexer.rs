use logos::{Logos, SpannedIter};

pub(super) struct Token {
    pub(super) kind: TokenKind,
    pub(super) span: logos::Span,
}

pub(super) struct TokenIter<'a> {
    iter: SpannedIter<'a, LogosTokenKind>,
}

impl<'a> TokenIter<'a> {
    pub(super) fn new(input: &'a str) -> Self {
        Self {
            iter: LogosTokenKind::lexer(input).spanned(),
        }
    }
}

impl<'a> Iterator for TokenIter<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        let (kind, span) = self.iter.next()?;
        let kind = match kind {
            Ok(LogosTokenKind::LParen) => TokenKind::LParen,
            Ok(LogosTokenKind::RParen) => TokenKind::RParen,
            Ok(LogosTokenKind::QuotedString) => TokenKind::String,
            Ok(LogosTokenKind::UnterminatedString) => TokenKind::UnterminatedString,
            Ok(LogosTokenKind::Number) => TokenKind::Number,
            Ok(LogosTokenKind::Symbol) => TokenKind::Symbol,
            Ok(LogosTokenKind::WS) => TokenKind::Whitespace,
            Err(_) => TokenKind::Error,
        };
        Some(Token { kind, span })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum TokenKind {
    LParen,
    RParen,
    /// Quoted string, span includes the quotes
    String,
    UnterminatedString,
    Number,
    Symbol,
    Whitespace,
    Error,
}

#[derive(Logos, Clone, Copy, Debug, PartialEq, Eq)]
enum LogosTokenKind {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[regex(r#""([^"\\]|\\.)*""#)]
    QuotedString,
    #[regex(r#""([^"\\]|\\.)*"#)]
    UnterminatedString,
    #[regex(r"-?[0-9]+(\.[0-9]+)?", priority = 3)]
    Number,
    #[regex(r#"[^"() \t\r\f\n]+"#)]
    Symbol,
    #[regex(r"[ \t\r\f\n]+")]
    WS,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<(TokenKind, &str)> {
        TokenIter::new(input)
            .map(|token| (token.kind, &input[token.span]))
            .collect()
    }

    #[test]
    fn test() {
        let input = "(a \"b\" \"\" \n)";
        let expected = vec![
            (TokenKind::LParen, "("),
            (TokenKind::Symbol, "a"),
            (TokenKind::Whitespace, " "),
            (TokenKind::String, "\"b\""),
            (TokenKind::Whitespace, " "),
            (TokenKind::String, "\"\""),
            (TokenKind::Whitespace, " \n"),
            (TokenKind::RParen, ")"),
        ];
        assert_eq!(lex(input), expected);
    }

    #[test]
    fn numbers_and_symbols() {
        let input = "(at -1.27 10 0e4a-11)";
        let kinds: Vec<_> = lex(input)
            .into_iter()
            .filter(|(kind, _)| *kind != TokenKind::Whitespace)
            .collect();
        assert_eq!(
            kinds,
            vec![
                (TokenKind::LParen, "("),
                (TokenKind::Symbol, "at"),
                (TokenKind::Number, "-1.27"),
                (TokenKind::Number, "10"),
                (TokenKind::Symbol, "0e4a-11"),
                (TokenKind::RParen, ")"),
            ]
        );
    }

    #[test]
    fn escaped_quotes_stay_inside_string() {
        let input = r#""say \"hi\"""#;
        assert_eq!(lex(input), vec![(TokenKind::String, input)]);
    }

    #[test]
    fn unterminated_string() {
        let input = "\"abc";
        assert_eq!(lex(input), vec![(TokenKind::UnterminatedString, input)]);
    }
}
