// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Lexer for the Cypher query language
//!
//! Words are read whole and only then classified, so keywords are recognized
//! at word boundaries only: `returned_value` is an identifier, never
//! `RETURN` followed by junk. A word that follows `:` or `.` with no
//! whitespace in between is always an identifier, which keeps labels such as
//! `(n:Return)` and property keys such as `n.order` working.
//!
//! Every parser function in this module either consumes input or returns an
//! error. The main loop additionally refuses to make a step without progress.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, recognize, value},
    sequence::{pair, tuple},
    IResult,
};

/// Reserved and contextual words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Match,
    Optional,
    Where,
    Return,
    With,
    Create,
    Merge,
    On,
    Set,
    Remove,
    Delete,
    Detach,
    Unwind,
    As,
    Foreach,
    In,
    Call,
    Yield,
    Union,
    All,
    Distinct,
    Order,
    By,
    Asc,
    Ascending,
    Desc,
    Descending,
    Skip,
    Limit,
    And,
    Or,
    Xor,
    Not,
    Is,
    Null,
    True,
    False,
    Case,
    When,
    Then,
    Else,
    End,
    Starts,
    Ends,
    Contains,
    Exists,
    // Contextual words: valid variable names outside their clauses
    Index,
    Indexes,
    Constraint,
    Constraints,
    For,
    Require,
    Assert,
    Unique,
    Drop,
    If,
    Show,
    Fulltext,
    Vector,
    Each,
    Options,
    Explain,
    Profile,
    Begin,
    Commit,
    Rollback,
    Transaction,
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("MATCH", Keyword::Match),
    ("OPTIONAL", Keyword::Optional),
    ("WHERE", Keyword::Where),
    ("RETURN", Keyword::Return),
    ("WITH", Keyword::With),
    ("CREATE", Keyword::Create),
    ("MERGE", Keyword::Merge),
    ("ON", Keyword::On),
    ("SET", Keyword::Set),
    ("REMOVE", Keyword::Remove),
    ("DELETE", Keyword::Delete),
    ("DETACH", Keyword::Detach),
    ("UNWIND", Keyword::Unwind),
    ("AS", Keyword::As),
    ("FOREACH", Keyword::Foreach),
    ("IN", Keyword::In),
    ("CALL", Keyword::Call),
    ("YIELD", Keyword::Yield),
    ("UNION", Keyword::Union),
    ("ALL", Keyword::All),
    ("DISTINCT", Keyword::Distinct),
    ("ORDER", Keyword::Order),
    ("BY", Keyword::By),
    ("ASC", Keyword::Asc),
    ("ASCENDING", Keyword::Ascending),
    ("DESC", Keyword::Desc),
    ("DESCENDING", Keyword::Descending),
    ("SKIP", Keyword::Skip),
    ("LIMIT", Keyword::Limit),
    ("AND", Keyword::And),
    ("OR", Keyword::Or),
    ("XOR", Keyword::Xor),
    ("NOT", Keyword::Not),
    ("IS", Keyword::Is),
    ("NULL", Keyword::Null),
    ("TRUE", Keyword::True),
    ("FALSE", Keyword::False),
    ("CASE", Keyword::Case),
    ("WHEN", Keyword::When),
    ("THEN", Keyword::Then),
    ("ELSE", Keyword::Else),
    ("END", Keyword::End),
    ("STARTS", Keyword::Starts),
    ("ENDS", Keyword::Ends),
    ("CONTAINS", Keyword::Contains),
    ("EXISTS", Keyword::Exists),
    ("INDEX", Keyword::Index),
    ("INDEXES", Keyword::Indexes),
    ("CONSTRAINT", Keyword::Constraint),
    ("CONSTRAINTS", Keyword::Constraints),
    ("FOR", Keyword::For),
    ("REQUIRE", Keyword::Require),
    ("ASSERT", Keyword::Assert),
    ("UNIQUE", Keyword::Unique),
    ("DROP", Keyword::Drop),
    ("IF", Keyword::If),
    ("SHOW", Keyword::Show),
    ("FULLTEXT", Keyword::Fulltext),
    ("VECTOR", Keyword::Vector),
    ("EACH", Keyword::Each),
    ("OPTIONS", Keyword::Options),
    ("EXPLAIN", Keyword::Explain),
    ("PROFILE", Keyword::Profile),
    ("BEGIN", Keyword::Begin),
    ("COMMIT", Keyword::Commit),
    ("ROLLBACK", Keyword::Rollback),
    ("TRANSACTION", Keyword::Transaction),
];

impl Keyword {
    pub fn from_word(word: &str) -> Option<Keyword> {
        KEYWORDS
            .iter()
            .find(|(text, _)| text.eq_ignore_ascii_case(word))
            .map(|(_, keyword)| *keyword)
    }

    pub fn as_str(&self) -> &'static str {
        KEYWORDS
            .iter()
            .find(|(_, keyword)| keyword == self)
            .map(|(text, _)| *text)
            .unwrap_or("?")
    }

    /// Reserved words can never name a variable
    pub fn is_reserved(&self) -> bool {
        !matches!(
            self,
            Keyword::Index
                | Keyword::Indexes
                | Keyword::Constraint
                | Keyword::Constraints
                | Keyword::For
                | Keyword::Require
                | Keyword::Assert
                | Keyword::Unique
                | Keyword::Drop
                | Keyword::If
                | Keyword::Show
                | Keyword::Fulltext
                | Keyword::Vector
                | Keyword::Each
                | Keyword::Options
                | Keyword::Explain
                | Keyword::Profile
                | Keyword::Begin
                | Keyword::Commit
                | Keyword::Rollback
                | Keyword::Transaction
        )
    }

    /// Literal words keep their meaning even right after a colon
    fn is_literal(&self) -> bool {
        matches!(self, Keyword::True | Keyword::False | Keyword::Null)
    }
}

/// Token types for Cypher
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Keyword(Keyword),
    Identifier(String),
    /// `$name`
    Parameter(String),
    Integer(i64),
    Float(f64),
    String(String),
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Colon,
    Semicolon,
    Dot,
    DotDot,
    Pipe,
    Plus,
    PlusEqual,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    RegexMatch,
    EOF,
}

impl Token {
    /// Human readable form used in error messages
    pub fn describe(&self) -> String {
        match self {
            Token::Keyword(k) => k.as_str().to_string(),
            Token::Identifier(name) => format!("identifier '{}'", name),
            Token::Parameter(name) => format!("parameter ${}", name),
            Token::Integer(n) => format!("integer {}", n),
            Token::Float(f) => format!("float {}", f),
            Token::String(s) => format!("string '{}'", s),
            Token::EOF => "end of input".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Token::LeftParen => "(",
            Token::RightParen => ")",
            Token::LeftBracket => "[",
            Token::RightBracket => "]",
            Token::LeftBrace => "{",
            Token::RightBrace => "}",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Semicolon => ";",
            Token::Dot => ".",
            Token::DotDot => "..",
            Token::Pipe => "|",
            Token::Plus => "+",
            Token::PlusEqual => "+=",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Caret => "^",
            Token::Equal => "=",
            Token::NotEqual => "<>",
            Token::LessThan => "<",
            Token::LessEqual => "<=",
            Token::GreaterThan => ">",
            Token::GreaterEqual => ">=",
            Token::RegexMatch => "=~",
            _ => "",
        }
    }
}

/// A token with its position in the source
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    /// Source text of the token
    pub text: String,
    /// 1-based line
    pub line: usize,
    /// 1-based column in characters
    pub column: usize,
    /// Byte offset
    pub offset: usize,
    /// Whitespace or a comment separates this token from the previous one
    pub space_before: bool,
}

/// Failure to tokenize the input
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at line {line}, column {column}")]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub found: String,
}

/// Position tracking across the consumed input
struct Cursor {
    line: usize,
    column: usize,
    offset: usize,
}

impl Cursor {
    fn advance(&mut self, consumed: &str) {
        for c in consumed.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.offset += consumed.len();
    }
}

/// Tokenize `input`. The result always ends with `Token::EOF`.
pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>, LexError> {
    let mut remaining = input;
    let mut tokens: Vec<SpannedToken> = Vec::new();
    let mut cursor = Cursor {
        line: 1,
        column: 1,
        offset: 0,
    };
    let mut space_before = false;

    while !remaining.is_empty() {
        match trivia(remaining) {
            Ok((rest, skipped)) => {
                cursor.advance(skipped);
                remaining = rest;
                space_before = true;
                continue;
            }
            Err(nom::Err::Failure(e)) => {
                return Err(lex_error(&cursor, remaining, e.input, e.code));
            }
            Err(_) => {}
        }

        let (rest, mut token) = match token(remaining) {
            Ok(result) => result,
            Err(nom::Err::Failure(e)) | Err(nom::Err::Error(e)) => {
                return Err(lex_error(&cursor, remaining, e.input, e.code));
            }
            Err(nom::Err::Incomplete(_)) => {
                return Err(lex_error(
                    &cursor,
                    remaining,
                    remaining,
                    nom::error::ErrorKind::Eof,
                ));
            }
        };
        if rest.len() == remaining.len() {
            return Err(lex_error(
                &cursor,
                remaining,
                remaining,
                nom::error::ErrorKind::Verify,
            ));
        }

        // A word glued to a preceding ':' or '.' names a label, type or key
        if let Token::Keyword(keyword) = &token {
            let glued = !space_before
                && matches!(
                    tokens.last().map(|t| &t.token),
                    Some(Token::Colon) | Some(Token::Dot)
                );
            if glued && !keyword.is_literal() {
                token = Token::Identifier(remaining[..remaining.len() - rest.len()].to_string());
            }
        }

        let text = &remaining[..remaining.len() - rest.len()];
        tokens.push(SpannedToken {
            token,
            text: text.to_string(),
            line: cursor.line,
            column: cursor.column,
            offset: cursor.offset,
            space_before,
        });
        cursor.advance(text);
        remaining = rest;
        space_before = false;
    }

    tokens.push(SpannedToken {
        token: Token::EOF,
        text: String::new(),
        line: cursor.line,
        column: cursor.column,
        offset: cursor.offset,
        space_before,
    });
    Ok(tokens)
}

fn lex_error(
    cursor: &Cursor,
    remaining: &str,
    failed_at: &str,
    code: nom::error::ErrorKind,
) -> LexError {
    // Report the position where the failing parser gave up
    let skipped = &remaining[..remaining.len().saturating_sub(failed_at.len())];
    let mut position = Cursor {
        line: cursor.line,
        column: cursor.column,
        offset: cursor.offset,
    };
    position.advance(skipped);
    let found: String = failed_at.chars().take(12).collect();
    let message = match code {
        nom::error::ErrorKind::Char | nom::error::ErrorKind::Eof if failed_at.is_empty() => {
            "Unterminated literal".to_string()
        }
        nom::error::ErrorKind::TakeUntil => "Unterminated comment".to_string(),
        nom::error::ErrorKind::MapRes => "Invalid number literal".to_string(),
        _ => format!(
            "Unexpected character '{}'",
            failed_at.chars().next().unwrap_or(' ')
        ),
    };
    LexError {
        message,
        line: position.line,
        column: position.column,
        found,
    }
}

/// Whitespace or a comment
fn trivia(input: &str) -> IResult<&str, &str> {
    alt((
        take_while1(|c: char| c.is_whitespace()),
        recognize(pair(tag("//"), take_while(|c| c != '\n'))),
        block_comment,
    ))(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    let (rest, _) = tag("/*")(input)?;
    match take_until::<_, _, nom::error::Error<&str>>("*/")(rest) {
        Ok((after, _)) => {
            let consumed = input.len() - after.len() + 2;
            Ok((&input[consumed..], &input[..consumed]))
        }
        Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::TakeUntil,
        ))),
    }
}

/// Parse a single token
///
/// Order matters: numbers before punctuation so `.` inside `1.5` is not a
/// dot, multi-character operators before their single-character prefixes.
fn token(input: &str) -> IResult<&str, Token> {
    alt((
        map(parameter, |name| Token::Parameter(name.to_string())),
        number,
        map(string_literal, Token::String),
        map(backtick_identifier, Token::Identifier),
        word,
        operator,
        punctuation,
    ))(input)
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Identifier or keyword, read up to the next word boundary
fn word(input: &str) -> IResult<&str, Token> {
    let (rest, text) = recognize(pair(
        take_while1(is_word_start),
        take_while(is_word_char),
    ))(input)?;
    let token = match Keyword::from_word(text) {
        Some(keyword) => Token::Keyword(keyword),
        None => Token::Identifier(text.to_string()),
    };
    Ok((rest, token))
}

/// `$name` or `$0`
fn parameter(input: &str) -> IResult<&str, &str> {
    let (rest, _) = char('$')(input)?;
    alt((
        recognize(pair(take_while1(is_word_start), take_while(is_word_char))),
        digit1,
    ))(rest)
}

fn number(input: &str) -> IResult<&str, Token> {
    let exponent = || tuple((one_of("eE"), opt(one_of("+-")), digit1));
    let float_text: IResult<&str, &str> = alt((
        recognize(tuple((digit1, char('.'), digit1, opt(exponent())))),
        recognize(pair(digit1, exponent())),
    ))(input);
    if let Ok((rest, text)) = float_text {
        return match text.parse::<f64>() {
            Ok(f) => Ok((rest, Token::Float(f))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::MapRes,
            ))),
        };
    }
    let (rest, digits) = digit1(input)?;
    match digits.parse::<i64>() {
        Ok(n) => Ok((rest, Token::Integer(n))),
        Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::MapRes,
        ))),
    }
}

/// Quoted string with backslash escapes
fn string_literal(input: &str) -> IResult<&str, String> {
    let quote = match input.chars().next() {
        Some(c @ ('\'' | '"')) => c,
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Char,
            )))
        }
    };
    let mut result = String::new();
    let mut chars = input.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        if c == quote {
            return Ok((&input[i + c.len_utf8()..], result));
        }
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some((_, 'n')) => result.push('\n'),
            Some((_, 't')) => result.push('\t'),
            Some((_, 'r')) => result.push('\r'),
            Some((_, 'b')) => result.push('\u{8}'),
            Some((_, 'f')) => result.push('\u{c}'),
            Some((_, '0')) => result.push('\0'),
            Some((j, 'u')) => {
                let hex = input.get(j + 1..j + 5).unwrap_or("");
                match u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == 4 => {
                        result.push(decoded);
                        for _ in 0..4 {
                            chars.next();
                        }
                    }
                    _ => {
                        return Err(nom::Err::Failure(nom::error::Error::new(
                            &input[j..],
                            nom::error::ErrorKind::Escaped,
                        )))
                    }
                }
            }
            Some((_, other)) => result.push(other),
            None => break,
        }
    }
    Err(nom::Err::Failure(nom::error::Error::new(
        "",
        nom::error::ErrorKind::Char,
    )))
}

/// Backtick-delimited identifier; a doubled backtick escapes itself
fn backtick_identifier(input: &str) -> IResult<&str, String> {
    let (mut rest, _) = char('`')(input)?;
    let mut result = String::new();
    loop {
        match rest.find('`') {
            Some(pos) => {
                result.push_str(&rest[..pos]);
                let after = &rest[pos + 1..];
                if let Some(stripped) = after.strip_prefix('`') {
                    result.push('`');
                    rest = stripped;
                } else {
                    return Ok((after, result));
                }
            }
            None => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    "",
                    nom::error::ErrorKind::Char,
                )))
            }
        }
    }
}

/// Multi-character operators
fn operator(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::DotDot, tag("..")),
        value(Token::PlusEqual, tag("+=")),
        value(Token::NotEqual, tag("<>")),
        value(Token::NotEqual, tag("!=")),
        value(Token::LessEqual, tag("<=")),
        value(Token::GreaterEqual, tag(">=")),
        value(Token::RegexMatch, tag("=~")),
    ))(input)
}

/// Single-character punctuation. Arrows are left to the parser so `<-`
/// inside `x<-1` stays a comparison with a negative number.
fn punctuation(input: &str) -> IResult<&str, Token> {
    alt((
        alt((
            value(Token::LeftParen, char('(')),
            value(Token::RightParen, char(')')),
            value(Token::LeftBracket, char('[')),
            value(Token::RightBracket, char(']')),
            value(Token::LeftBrace, char('{')),
            value(Token::RightBrace, char('}')),
            value(Token::Comma, char(',')),
            value(Token::Colon, char(':')),
            value(Token::Semicolon, char(';')),
            value(Token::Dot, char('.')),
        )),
        alt((
            value(Token::Pipe, char('|')),
            value(Token::Plus, char('+')),
            value(Token::Minus, char('-')),
            value(Token::Star, char('*')),
            value(Token::Slash, char('/')),
            value(Token::Percent, char('%')),
            value(Token::Caret, char('^')),
            value(Token::Equal, char('=')),
            value(Token::LessThan, char('<')),
            value(Token::GreaterThan, char('>')),
        )),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_keywords_only_at_word_boundaries() {
        assert_eq!(
            kinds("RETURN returned_value"),
            vec![
                Token::Keyword(Keyword::Return),
                Token::Identifier("returned_value".to_string()),
                Token::EOF
            ]
        );
        assert_eq!(kinds("return")[0], Token::Keyword(Keyword::Return));
    }

    #[test]
    fn test_word_after_colon_or_dot_is_identifier() {
        let tokens = kinds("(n:Return) WHERE n.order > 1");
        assert_eq!(tokens[3], Token::Identifier("Return".to_string()));
        assert_eq!(tokens[8], Token::Identifier("order".to_string()));

        // Literals survive after a colon
        assert_eq!(kinds("{a:true}")[3], Token::Keyword(Keyword::True));
        // With whitespace the colon separates a map key from its value
        assert_eq!(
            kinds("{a: NOT b}")[3],
            Token::Keyword(Keyword::Not)
        );
    }

    #[test]
    fn test_numbers_and_ranges() {
        assert_eq!(
            kinds("*1..3"),
            vec![
                Token::Star,
                Token::Integer(1),
                Token::DotDot,
                Token::Integer(3),
                Token::EOF
            ]
        );
        assert_eq!(kinds("2.5e2")[0], Token::Float(250.0));
        assert_eq!(kinds("$limit")[0], Token::Parameter("limit".to_string()));
    }

    #[test]
    fn test_strings_and_comments() {
        let tokens = kinds("'it\\'s' // trailing\n \"a\\u0041\" /* block */ `odd name`");
        assert_eq!(tokens[0], Token::String("it's".to_string()));
        assert_eq!(tokens[1], Token::String("aA".to_string()));
        assert_eq!(tokens[2], Token::Identifier("odd name".to_string()));
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("MATCH (n)\nRETURN n").unwrap();
        let ret = tokens
            .iter()
            .find(|t| t.token == Token::Keyword(Keyword::Return))
            .unwrap();
        assert_eq!((ret.line, ret.column), (2, 1));
        assert!(ret.space_before);
    }

    #[test]
    fn test_errors() {
        let err = tokenize("RETURN 'abc").unwrap_err();
        assert_eq!(err.message, "Unterminated literal");
        let err = tokenize("RETURN 1 # 2").unwrap_err();
        assert_eq!((err.line, err.column), (1, 10));
        assert!(tokenize("/* open").is_err());
    }
}
