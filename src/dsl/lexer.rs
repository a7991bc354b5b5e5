//! Lexer/tokenizer for filter expressions.

use winnow::ascii::multispace0;
use winnow::combinator::{alt, delimited};
use winnow::prelude::*;
use winnow::token::take_while;

use super::error::FilterError;

/// Lexeme classes of the expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Boolean operators
    And, // AND
    Or,  // OR

    // Comparators; `<=` and `>=` arrive as two tokens and are joined by the parser
    Equals,      // =
    NotEquals,   // <>
    Like,        // LIKE
    LessThan,    // <
    GreaterThan, // >

    // Punctuation
    LeftParen,  // (
    RightParen, // )

    // Operands
    Identifier, // bareword
    Literal,    // 'quoted'

    // End of input
    Eof,
}

impl TokenKind {
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::Equals => "'='",
            TokenKind::NotEquals => "'<>'",
            TokenKind::Like => "LIKE",
            TokenKind::LessThan => "'<'",
            TokenKind::GreaterThan => "'>'",
            TokenKind::LeftParen => "'('",
            TokenKind::RightParen => "')'",
            TokenKind::Identifier => "identifier",
            TokenKind::Literal => "literal",
            TokenKind::Eof => "end of input",
        }
    }
}

/// A lexeme with its byte offset in the source. For literals `text` holds
/// the content between the quotes.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
    pub text: String,
}

// Manually define PResult for resilience against winnow version changes
type PResult<T> = Result<T, winnow::error::ErrMode<winnow::error::ContextError>>;

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '[' | ']' | '\\' | ':')
}

/// Lex a bareword. Keywords are only recognized as whole words, so
/// `ORDER` stays an identifier.
fn lex_word(input: &mut &str) -> PResult<(TokenKind, String)> {
    let word = take_while(1.., is_word_char).parse_next(input)?;
    let kind = match word {
        "AND" => TokenKind::And,
        "OR" => TokenKind::Or,
        "LIKE" => TokenKind::Like,
        _ => TokenKind::Identifier,
    };
    Ok((kind, word.to_string()))
}

/// Lex a single-quoted, non-empty literal.
fn lex_literal(input: &mut &str) -> PResult<(TokenKind, String)> {
    let text = delimited('\'', take_while(1.., |c: char| c != '\''), '\'').parse_next(input)?;
    Ok((TokenKind::Literal, text.to_string()))
}

/// Lex an operator or parenthesis. `<>` must be tried before `<`.
fn lex_symbol(input: &mut &str) -> PResult<(TokenKind, String)> {
    let (kind, text) = alt((
        "<>".value((TokenKind::NotEquals, "<>")),
        "=".value((TokenKind::Equals, "=")),
        "<".value((TokenKind::LessThan, "<")),
        ">".value((TokenKind::GreaterThan, ">")),
        "(".value((TokenKind::LeftParen, "(")),
        ")".value((TokenKind::RightParen, ")")),
    ))
    .parse_next(input)?;
    Ok((kind, text.to_string()))
}

fn skip_whitespace(input: &mut &str) -> PResult<()> {
    multispace0.void().parse_next(input)
}

/// Tokenize the entire input. The returned sequence always ends with an
/// `Eof` token positioned at the end of the source.
pub fn tokenize(source: &str) -> Result<Vec<Token>, FilterError> {
    let mut remaining = source;
    let mut tokens = Vec::new();

    loop {
        skip_whitespace(&mut remaining).map_err(|_| FilterError::Lex {
            offset: source.len() - remaining.len(),
        })?;
        if remaining.is_empty() {
            break;
        }

        let offset = source.len() - remaining.len();
        match alt((lex_symbol, lex_literal, lex_word)).parse_next(&mut remaining) {
            Ok((kind, text)) => tokens.push(Token { kind, offset, text }),
            Err(_) => return Err(FilterError::Lex { offset }),
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        offset: source.len(),
        text: String::new(),
    });
    Ok(tokens)
}
