// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Parser for the Cypher query language using nom parsers over tokens
//!
//! The input is the token stream produced by the lexer. Each primitive that
//! fails records what it expected at its position; the failure that got
//! furthest into the input is reported, with the line and column of the
//! offending token.

use std::cell::RefCell;

use log::{debug, log_enabled, Level};
use nom::{
    branch::alt,
    combinator::{map, opt},
    error::{ErrorKind, ParseError},
    multi::{many0, many1, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use super::ast::*;
use super::lexer::{tokenize, Keyword, LexError, SpannedToken, Token};
use super::pretty_printer::pretty_print_ast;

/// Parser error type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParserError {
    #[error("{message} (line {line}, column {column})")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
        found: String,
        expected: String,
    },
}

impl From<LexError> for ParserError {
    fn from(e: LexError) -> Self {
        ParserError::Syntax {
            message: e.message.clone(),
            line: e.line,
            column: e.column,
            found: e.found,
            expected: "a valid token".to_string(),
        }
    }
}

pub type Tokens<'a> = &'a [SpannedToken];
type PResult<'a, T> = IResult<Tokens<'a>, T, TokenError>;

/// Failure at a token position, identified by how many tokens remained
#[derive(Debug, Clone, PartialEq)]
pub struct TokenError {
    remaining: usize,
    expected: Vec<String>,
}

impl TokenError {
    fn merge(&mut self, other: &TokenError) {
        for expected in &other.expected {
            if !self.expected.contains(expected) {
                self.expected.push(expected.clone());
            }
        }
    }

    fn furthest(mut self, other: TokenError) -> TokenError {
        if other.remaining < self.remaining {
            other
        } else {
            if other.remaining == self.remaining {
                self.merge(&other);
            }
            self
        }
    }
}

impl<'a> ParseError<Tokens<'a>> for TokenError {
    fn from_error_kind(input: Tokens<'a>, _kind: ErrorKind) -> Self {
        TokenError {
            remaining: input.len(),
            expected: Vec::new(),
        }
    }

    fn append(_input: Tokens<'a>, _kind: ErrorKind, other: Self) -> Self {
        other
    }

    fn or(self, other: Self) -> Self {
        self.furthest(other)
    }
}

thread_local! {
    static FURTHEST: RefCell<Option<TokenError>> = const { RefCell::new(None) };
}

fn record(error: &TokenError) {
    FURTHEST.with(|cell| {
        let mut furthest = cell.borrow_mut();
        *furthest = Some(match furthest.take() {
            Some(current) => current.furthest(error.clone()),
            None => error.clone(),
        });
    });
}

fn fail<'a, T>(input: Tokens<'a>, expected: &str) -> PResult<'a, T> {
    let error = TokenError {
        remaining: input.len(),
        expected: vec![expected.to_string()],
    };
    record(&error);
    Err(nom::Err::Error(error))
}

/// Parse a Cypher statement into an AST Document
pub fn parse_query(input: &str) -> Result<Document, ParserError> {
    debug!("Parsing query: {}", input.trim());
    let tokens = tokenize(input)?;
    FURTHEST.with(|cell| *cell.borrow_mut() = None);
    let result = document(&tokens);
    let furthest = FURTHEST.with(|cell| cell.borrow_mut().take());

    match result {
        Ok((_, statement)) => {
            let document = Document {
                statement,
                location: Location {
                    line: 1,
                    column: 1,
                    offset: 0,
                },
            };
            if log_enabled!(Level::Debug) {
                pretty_print_ast(&document);
            }
            Ok(document)
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let error = match furthest {
                Some(furthest) => furthest.furthest(e),
                None => e,
            };
            Err(syntax_error(&tokens, error))
        }
        Err(nom::Err::Incomplete(_)) => Err(syntax_error(
            &tokens,
            TokenError {
                remaining: 1,
                expected: Vec::new(),
            },
        )),
    }
}

/// Parse a standalone expression
#[cfg(test)]
pub fn parse_expression(input: &str) -> Result<Expression, ParserError> {
    let tokens = tokenize(input)?;
    FURTHEST.with(|cell| *cell.borrow_mut() = None);
    let result = terminated(expression, symbol(Token::EOF))(&tokens);
    let furthest = FURTHEST.with(|cell| cell.borrow_mut().take());
    match result {
        Ok((_, expression)) => Ok(expression),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let error = furthest.map(|f| f.furthest(e.clone())).unwrap_or(e);
            Err(syntax_error(&tokens, error))
        }
        Err(nom::Err::Incomplete(_)) => Err(syntax_error(
            &tokens,
            TokenError {
                remaining: 1,
                expected: Vec::new(),
            },
        )),
    }
}

fn syntax_error(tokens: &[SpannedToken], error: TokenError) -> ParserError {
    let index = tokens.len().saturating_sub(error.remaining.max(1));
    let token = &tokens[index.min(tokens.len() - 1)];
    let found = match token.token {
        Token::EOF => "end of input".to_string(),
        _ => token.text.clone(),
    };
    let mut expected = error.expected;
    expected.sort();
    expected.dedup();
    let expected = match expected.len() {
        0 => "a valid query".to_string(),
        1 => expected.remove(0),
        _ => format!("one of {}", expected.join(", ")),
    };
    ParserError::Syntax {
        message: format!("Invalid input '{}': expected {}", found, expected),
        line: token.line,
        column: token.column,
        found,
        expected,
    }
}

// ==============================================================================
// PRIMITIVES
// ==============================================================================

fn peek(input: Tokens) -> &Token {
    input.first().map(|t| &t.token).unwrap_or(&Token::EOF)
}

fn location(input: Tokens) -> Location {
    input
        .first()
        .map(|t| Location {
            line: t.line,
            column: t.column,
            offset: t.offset,
        })
        .unwrap_or_default()
}

/// Reassemble source text of consumed tokens
fn source_text(tokens: Tokens) -> String {
    let mut text = String::new();
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 && token.space_before {
            text.push(' ');
        }
        text.push_str(&token.text);
    }
    text
}

fn consumed<'a>(before: Tokens<'a>, after: Tokens<'a>) -> Tokens<'a> {
    &before[..before.len() - after.len()]
}

fn symbol<'a>(expected: Token) -> impl Fn(Tokens<'a>) -> PResult<'a, ()> {
    move |input: Tokens<'a>| match input.first() {
        Some(t) if t.token == expected => Ok((&input[1..], ())),
        _ => fail(input, &expected.describe()),
    }
}

fn keyword<'a>(expected: Keyword) -> impl Fn(Tokens<'a>) -> PResult<'a, ()> {
    move |input: Tokens<'a>| match input.first() {
        Some(SpannedToken {
            token: Token::Keyword(k),
            ..
        }) if *k == expected => Ok((&input[1..], ())),
        _ => fail(input, expected.as_str()),
    }
}

/// An identifier spelled `word`, ignoring case
fn soft_word<'a>(word: &'static str) -> impl Fn(Tokens<'a>) -> PResult<'a, ()> {
    move |input: Tokens<'a>| match input.first() {
        Some(SpannedToken {
            token: Token::Identifier(text),
            ..
        }) if text.eq_ignore_ascii_case(word) => Ok((&input[1..], ())),
        _ => fail(input, word),
    }
}

/// Label, type, property key or map key: any identifier or keyword
fn name(input: Tokens) -> PResult<String> {
    match input.first() {
        Some(SpannedToken {
            token: Token::Identifier(text),
            ..
        }) => Ok((&input[1..], text.clone())),
        Some(t @ SpannedToken {
            token: Token::Keyword(_),
            ..
        }) => Ok((&input[1..], t.text.clone())),
        _ => fail(input, "a name"),
    }
}

/// A variable: an identifier or a contextual keyword
fn variable_name(input: Tokens) -> PResult<String> {
    match input.first() {
        Some(SpannedToken {
            token: Token::Identifier(text),
            ..
        }) => Ok((&input[1..], text.clone())),
        Some(t @ SpannedToken {
            token: Token::Keyword(k),
            ..
        }) if !k.is_reserved() => Ok((&input[1..], t.text.clone())),
        _ => fail(input, "a variable name"),
    }
}

/// A schema object name; only plain identifiers so clause words stay free
fn schema_name(input: Tokens) -> PResult<String> {
    match input.first() {
        Some(SpannedToken {
            token: Token::Identifier(text),
            ..
        }) => Ok((&input[1..], text.clone())),
        _ => fail(input, "an index or constraint name"),
    }
}

fn unsigned_integer(input: Tokens) -> PResult<u64> {
    match input.first() {
        Some(SpannedToken {
            token: Token::Integer(n),
            ..
        }) if *n >= 0 => Ok((&input[1..], *n as u64)),
        _ => fail(input, "an integer"),
    }
}

// ==============================================================================
// STATEMENTS
// ==============================================================================

fn document(input: Tokens) -> PResult<Statement> {
    terminated(
        terminated(statement, opt(symbol(Token::Semicolon))),
        symbol(Token::EOF),
    )(input)
}

fn statement(input: Tokens) -> PResult<Statement> {
    alt((
        map(preceded(keyword(Keyword::Explain), statement), |s| {
            Statement::Explain(Box::new(s))
        }),
        map(preceded(keyword(Keyword::Profile), statement), |s| {
            Statement::Profile(Box::new(s))
        }),
        map(transaction_command, Statement::Transaction),
        map(schema_command, Statement::Schema),
        map(query, Statement::Query),
    ))(input)
}

fn transaction_command(input: Tokens) -> PResult<TransactionCommand> {
    let (input, command) = alt((
        map(keyword(Keyword::Begin), |_| TransactionCommand::Begin),
        map(keyword(Keyword::Commit), |_| TransactionCommand::Commit),
        map(keyword(Keyword::Rollback), |_| TransactionCommand::Rollback),
    ))(input)?;
    let (input, _) = opt(keyword(Keyword::Transaction))(input)?;
    Ok((input, command))
}

fn query(input: Tokens) -> PResult<Query> {
    let (input, first) = single_query(input)?;
    let (input, unions) = many0(map(
        tuple((
            keyword(Keyword::Union),
            opt(keyword(Keyword::All)),
            single_query,
        )),
        |(_, all, query)| UnionPart {
            all: all.is_some(),
            query,
        },
    ))(input)?;
    Ok((input, Query { first, unions }))
}

fn single_query(input: Tokens) -> PResult<SingleQuery> {
    map(many1(clause), |clauses| SingleQuery { clauses })(input)
}

fn clause(input: Tokens) -> PResult<Clause> {
    alt((
        map(match_clause, Clause::Match),
        map(unwind_clause, Clause::Unwind),
        map(with_clause, Clause::With),
        map(return_clause, Clause::Return),
        map(call_clause, Clause::Call),
        updating_clause,
    ))(input)
}

fn updating_clause(input: Tokens) -> PResult<Clause> {
    alt((
        map(create_clause, Clause::Create),
        map(merge_clause, Clause::Merge),
        map(set_clause, Clause::Set),
        map(remove_clause, Clause::Remove),
        map(delete_clause, Clause::Delete),
        map(foreach_clause, Clause::Foreach),
    ))(input)
}

fn where_clause(input: Tokens) -> PResult<Expression> {
    preceded(keyword(Keyword::Where), expression)(input)
}

fn match_clause(input: Tokens) -> PResult<MatchClause> {
    let location = location(input);
    let (input, optional) = opt(keyword(Keyword::Optional))(input)?;
    let (input, _) = keyword(Keyword::Match)(input)?;
    let (input, patterns) = separated_list1(symbol(Token::Comma), path_pattern)(input)?;
    let (input, where_clause) = opt(where_clause)(input)?;
    Ok((
        input,
        MatchClause {
            optional: optional.is_some(),
            patterns,
            where_clause,
            location,
        },
    ))
}

fn create_clause(input: Tokens) -> PResult<CreateClause> {
    let location = location(input);
    let (input, _) = keyword(Keyword::Create)(input)?;
    let (input, patterns) = separated_list1(symbol(Token::Comma), path_pattern)(input)?;
    Ok((input, CreateClause { patterns, location }))
}

fn merge_clause(input: Tokens) -> PResult<MergeClause> {
    let location = location(input);
    let (input, _) = keyword(Keyword::Merge)(input)?;
    let (mut input, pattern) = path_pattern(input)?;
    let mut on_create = Vec::new();
    let mut on_match = Vec::new();
    loop {
        let action = tuple((
            keyword(Keyword::On),
            alt((
                map(keyword(Keyword::Create), |_| true),
                map(keyword(Keyword::Match), |_| false),
            )),
            keyword(Keyword::Set),
            separated_list1(symbol(Token::Comma), set_item),
        ))(input);
        match action {
            Ok((rest, (_, true, _, items))) => {
                on_create.extend(items);
                input = rest;
            }
            Ok((rest, (_, false, _, items))) => {
                on_match.extend(items);
                input = rest;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((
        input,
        MergeClause {
            pattern,
            on_create,
            on_match,
            location,
        },
    ))
}

fn set_clause(input: Tokens) -> PResult<SetClause> {
    let location = location(input);
    let (input, _) = keyword(Keyword::Set)(input)?;
    let (input, items) = separated_list1(symbol(Token::Comma), set_item)(input)?;
    Ok((input, SetClause { items, location }))
}

fn set_item(input: Tokens) -> PResult<SetItem> {
    alt((
        map(
            tuple((
                variable_name,
                symbol(Token::Dot),
                name,
                symbol(Token::Equal),
                expression,
            )),
            |(variable, _, key, _, value)| SetItem::Property {
                variable,
                key,
                value,
            },
        ),
        map(
            tuple((variable_name, symbol(Token::Equal), expression)),
            |(variable, _, value)| SetItem::Replace { variable, value },
        ),
        map(
            tuple((variable_name, symbol(Token::PlusEqual), expression)),
            |(variable, _, value)| SetItem::Merge { variable, value },
        ),
        map(pair(variable_name, label_list), |(variable, labels)| {
            SetItem::Labels { variable, labels }
        }),
    ))(input)
}

fn label_list(input: Tokens) -> PResult<Vec<String>> {
    many1(preceded(symbol(Token::Colon), name))(input)
}

fn remove_clause(input: Tokens) -> PResult<RemoveClause> {
    let location = location(input);
    let (input, _) = keyword(Keyword::Remove)(input)?;
    let (input, items) = separated_list1(
        symbol(Token::Comma),
        alt((
            map(
                tuple((variable_name, symbol(Token::Dot), name)),
                |(variable, _, key)| RemoveItem::Property { variable, key },
            ),
            map(pair(variable_name, label_list), |(variable, labels)| {
                RemoveItem::Labels { variable, labels }
            }),
        )),
    )(input)?;
    Ok((input, RemoveClause { items, location }))
}

fn delete_clause(input: Tokens) -> PResult<DeleteClause> {
    let location = location(input);
    let (input, detach) = opt(keyword(Keyword::Detach))(input)?;
    let (input, _) = keyword(Keyword::Delete)(input)?;
    let (input, expressions) = separated_list1(symbol(Token::Comma), expression)(input)?;
    Ok((
        input,
        DeleteClause {
            detach: detach.is_some(),
            expressions,
            location,
        },
    ))
}

fn unwind_clause(input: Tokens) -> PResult<UnwindClause> {
    let location = location(input);
    let (input, (_, expression, _, variable)) = tuple((
        keyword(Keyword::Unwind),
        expression,
        keyword(Keyword::As),
        variable_name,
    ))(input)?;
    Ok((
        input,
        UnwindClause {
            expression,
            variable,
            location,
        },
    ))
}

fn foreach_clause(input: Tokens) -> PResult<ForeachClause> {
    let location = location(input);
    let (input, (_, _, variable, _, list, _, body, _)) = tuple((
        keyword(Keyword::Foreach),
        symbol(Token::LeftParen),
        variable_name,
        keyword(Keyword::In),
        expression,
        symbol(Token::Pipe),
        many1(updating_clause),
        symbol(Token::RightParen),
    ))(input)?;
    Ok((
        input,
        ForeachClause {
            variable,
            list,
            body,
            location,
        },
    ))
}

fn with_clause(input: Tokens) -> PResult<ProjectionClause> {
    let location = location(input);
    let (input, _) = keyword(Keyword::With)(input)?;
    let (input, mut projection) = projection_body(input)?;
    let (input, where_clause) = opt(where_clause)(input)?;
    projection.where_clause = where_clause;
    projection.location = location;
    Ok((input, projection))
}

fn return_clause(input: Tokens) -> PResult<ProjectionClause> {
    let location = location(input);
    let (input, _) = keyword(Keyword::Return)(input)?;
    let (input, mut projection) = projection_body(input)?;
    projection.location = location;
    Ok((input, projection))
}

fn projection_body(input: Tokens) -> PResult<ProjectionClause> {
    let (input, distinct) = opt(keyword(Keyword::Distinct))(input)?;
    let (input, (star, items)) = alt((
        map(
            pair(
                symbol(Token::Star),
                opt(preceded(
                    symbol(Token::Comma),
                    separated_list1(symbol(Token::Comma), projection_item),
                )),
            ),
            |(_, items)| (true, items.unwrap_or_default()),
        ),
        map(
            separated_list1(symbol(Token::Comma), projection_item),
            |items| (false, items),
        ),
    ))(input)?;
    let (input, order_by) = opt(preceded(
        pair(keyword(Keyword::Order), keyword(Keyword::By)),
        separated_list1(symbol(Token::Comma), sort_item),
    ))(input)?;
    let (input, skip) = opt(preceded(keyword(Keyword::Skip), expression))(input)?;
    let (input, limit) = opt(preceded(keyword(Keyword::Limit), expression))(input)?;
    Ok((
        input,
        ProjectionClause {
            distinct: distinct.is_some(),
            star,
            items,
            order_by: order_by.unwrap_or_default(),
            skip,
            limit,
            where_clause: None,
            location: Location::default(),
        },
    ))
}

fn projection_item(input: Tokens) -> PResult<ProjectionItem> {
    let start = input;
    let (input, expression) = expression(input)?;
    let text = source_text(consumed(start, input));
    let (input, alias) = opt(preceded(keyword(Keyword::As), variable_name))(input)?;
    Ok((
        input,
        ProjectionItem {
            expression,
            alias,
            text,
        },
    ))
}

fn sort_item(input: Tokens) -> PResult<SortItem> {
    let (input, expression) = expression(input)?;
    let (input, direction) = opt(alt((
        map(keyword(Keyword::Asc), |_| false),
        map(keyword(Keyword::Ascending), |_| false),
        map(keyword(Keyword::Desc), |_| true),
        map(keyword(Keyword::Descending), |_| true),
    )))(input)?;
    Ok((
        input,
        SortItem {
            expression,
            descending: direction.unwrap_or(false),
        },
    ))
}

fn call_clause(input: Tokens) -> PResult<CallClause> {
    let location = location(input);
    let (input, _) = keyword(Keyword::Call)(input)?;
    let (input, procedure) = dotted_name(input)?;
    let (input, arguments) = opt(delimited(
        symbol(Token::LeftParen),
        separated_list0(symbol(Token::Comma), expression),
        symbol(Token::RightParen),
    ))(input)?;
    let (input, yield_items) = opt(preceded(
        keyword(Keyword::Yield),
        alt((
            map(symbol(Token::Star), |_| YieldItems::All),
            map(
                separated_list1(
                    symbol(Token::Comma),
                    map(
                        pair(name, opt(preceded(keyword(Keyword::As), variable_name))),
                        |(field, alias)| YieldItem { field, alias },
                    ),
                ),
                YieldItems::Items,
            ),
        )),
    ))(input)?;
    let (input, where_clause) = if yield_items.is_some() {
        opt(where_clause)(input)?
    } else {
        (input, None)
    };
    Ok((
        input,
        CallClause {
            procedure,
            arguments: arguments.unwrap_or_default(),
            yield_items,
            where_clause,
            location,
        },
    ))
}

fn dotted_name(input: Tokens) -> PResult<String> {
    let (input, first) = name(input)?;
    let (input, rest) = many0(preceded(symbol(Token::Dot), name))(input)?;
    let mut full = first;
    for part in rest {
        full.push('.');
        full.push_str(&part);
    }
    Ok((input, full))
}

// ==============================================================================
// SCHEMA COMMANDS
// ==============================================================================

fn schema_command(input: Tokens) -> PResult<SchemaCommand> {
    alt((
        create_index,
        create_fulltext_index,
        create_vector_index,
        create_constraint,
        drop_index,
        drop_constraint,
        show_command,
    ))(input)
}

fn if_not_exists(input: Tokens) -> PResult<bool> {
    map(
        opt(tuple((
            keyword(Keyword::If),
            keyword(Keyword::Not),
            keyword(Keyword::Exists),
        ))),
        |found| found.is_some(),
    )(input)
}

fn if_exists(input: Tokens) -> PResult<bool> {
    map(
        opt(pair(keyword(Keyword::If), keyword(Keyword::Exists))),
        |found| found.is_some(),
    )(input)
}

/// `(n:Label)`
fn label_target(input: Tokens) -> PResult<String> {
    map(
        tuple((
            symbol(Token::LeftParen),
            variable_name,
            symbol(Token::Colon),
            name,
            symbol(Token::RightParen),
        )),
        |(_, _, _, label, _)| label,
    )(input)
}

/// `n.prop`
fn property_ref(input: Tokens) -> PResult<String> {
    map(
        tuple((variable_name, symbol(Token::Dot), name)),
        |(_, _, key)| key,
    )(input)
}

fn create_index(input: Tokens) -> PResult<SchemaCommand> {
    let (input, _) = pair(keyword(Keyword::Create), keyword(Keyword::Index))(input)?;
    let (input, index_name) = opt(schema_name)(input)?;
    let (input, if_not_exists) = if_not_exists(input)?;
    let (input, (label, properties)) = alt((
        map(
            tuple((
                keyword(Keyword::For),
                label_target,
                keyword(Keyword::On),
                delimited(
                    symbol(Token::LeftParen),
                    separated_list1(symbol(Token::Comma), property_ref),
                    symbol(Token::RightParen),
                ),
            )),
            |(_, label, _, properties)| (label, properties),
        ),
        // Legacy form: ON :Label(prop, ...)
        map(
            tuple((
                keyword(Keyword::On),
                symbol(Token::Colon),
                name,
                delimited(
                    symbol(Token::LeftParen),
                    separated_list1(symbol(Token::Comma), name),
                    symbol(Token::RightParen),
                ),
            )),
            |(_, _, label, properties)| (label, properties),
        ),
    ))(input)?;
    Ok((
        input,
        SchemaCommand::CreateIndex {
            name: index_name,
            if_not_exists,
            label,
            properties,
        },
    ))
}

fn create_fulltext_index(input: Tokens) -> PResult<SchemaCommand> {
    let (input, _) = tuple((
        keyword(Keyword::Create),
        keyword(Keyword::Fulltext),
        keyword(Keyword::Index),
    ))(input)?;
    let (input, name) = schema_name(input)?;
    let (input, if_not_exists) = if_not_exists(input)?;
    let (input, (_, label, _, _, properties)) = tuple((
        keyword(Keyword::For),
        label_target,
        keyword(Keyword::On),
        keyword(Keyword::Each),
        delimited(
            symbol(Token::LeftBracket),
            separated_list1(symbol(Token::Comma), property_ref),
            symbol(Token::RightBracket),
        ),
    ))(input)?;
    Ok((
        input,
        SchemaCommand::CreateFulltextIndex {
            name,
            if_not_exists,
            label,
            properties,
        },
    ))
}

fn create_vector_index(input: Tokens) -> PResult<SchemaCommand> {
    let (input, _) = tuple((
        keyword(Keyword::Create),
        keyword(Keyword::Vector),
        keyword(Keyword::Index),
    ))(input)?;
    let (input, name) = schema_name(input)?;
    let (input, if_not_exists) = if_not_exists(input)?;
    let (input, (_, label, _, property)) = tuple((
        keyword(Keyword::For),
        label_target,
        keyword(Keyword::On),
        delimited(
            symbol(Token::LeftParen),
            property_ref,
            symbol(Token::RightParen),
        ),
    ))(input)?;
    let (input, options) = opt(preceded(keyword(Keyword::Options), map_literal))(input)?;
    Ok((
        input,
        SchemaCommand::CreateVectorIndex {
            name,
            if_not_exists,
            label,
            property,
            options,
        },
    ))
}

fn create_constraint(input: Tokens) -> PResult<SchemaCommand> {
    let (input, _) = pair(keyword(Keyword::Create), keyword(Keyword::Constraint))(input)?;
    let (input, name) = opt(schema_name)(input)?;
    let (input, if_not_exists) = if_not_exists(input)?;
    let (input, (label, property)) = alt((
        map(
            tuple((
                keyword(Keyword::For),
                label_target,
                keyword(Keyword::Require),
                property_ref,
            )),
            |(_, label, _, property)| (label, property),
        ),
        map(
            tuple((
                keyword(Keyword::On),
                label_target,
                keyword(Keyword::Assert),
                property_ref,
            )),
            |(_, label, _, property)| (label, property),
        ),
    ))(input)?;
    let (input, _) = pair(keyword(Keyword::Is), keyword(Keyword::Unique))(input)?;
    Ok((
        input,
        SchemaCommand::CreateConstraint {
            name,
            if_not_exists,
            label,
            property,
        },
    ))
}

fn drop_index(input: Tokens) -> PResult<SchemaCommand> {
    map(
        tuple((
            keyword(Keyword::Drop),
            keyword(Keyword::Index),
            schema_name,
            if_exists,
        )),
        |(_, _, name, if_exists)| SchemaCommand::DropIndex { name, if_exists },
    )(input)
}

fn drop_constraint(input: Tokens) -> PResult<SchemaCommand> {
    map(
        tuple((
            keyword(Keyword::Drop),
            keyword(Keyword::Constraint),
            schema_name,
            if_exists,
        )),
        |(_, _, name, if_exists)| SchemaCommand::DropConstraint { name, if_exists },
    )(input)
}

fn show_command(input: Tokens) -> PResult<SchemaCommand> {
    preceded(
        keyword(Keyword::Show),
        alt((
            map(
                alt((keyword(Keyword::Indexes), keyword(Keyword::Index))),
                |_| SchemaCommand::ShowIndexes,
            ),
            map(
                alt((
                    keyword(Keyword::Constraints),
                    keyword(Keyword::Constraint),
                )),
                |_| SchemaCommand::ShowConstraints,
            ),
        )),
    )(input)
}

// ==============================================================================
// PATTERNS
// ==============================================================================

fn path_pattern(input: Tokens) -> PResult<PathPattern> {
    let (input, variable) = opt(terminated(variable_name, symbol(Token::Equal)))(input)?;
    let (input, (kind, element)) = alt((
        map(
            tuple((
                alt((
                    map(soft_word("shortestPath"), |_| PathKind::Shortest),
                    map(soft_word("allShortestPaths"), |_| PathKind::AllShortest),
                )),
                symbol(Token::LeftParen),
                pattern_element,
                symbol(Token::RightParen),
            )),
            |(kind, _, element, _)| (kind, element),
        ),
        map(pattern_element, |element| (PathKind::Simple, element)),
    ))(input)?;
    Ok((
        input,
        PathPattern {
            variable,
            kind,
            element,
        },
    ))
}

fn pattern_element(input: Tokens) -> PResult<PatternElement> {
    let (input, start) = node_pattern(input)?;
    let (input, chain) = many0(pair(relationship_pattern, node_pattern))(input)?;
    Ok((input, PatternElement { start, chain }))
}

fn properties(input: Tokens) -> PResult<Expression> {
    alt((map_literal, parameter))(input)
}

fn node_pattern(input: Tokens) -> PResult<NodePattern> {
    let (input, _) = symbol(Token::LeftParen)(input)?;
    let (input, variable) = opt(variable_name)(input)?;
    let (input, labels) = many0(preceded(symbol(Token::Colon), name))(input)?;
    let (input, properties) = opt(properties)(input)?;
    let (input, _) = symbol(Token::RightParen)(input)?;
    Ok((
        input,
        NodePattern {
            variable,
            labels,
            properties,
        },
    ))
}

struct RelationshipDetail {
    variable: Option<String>,
    types: Vec<String>,
    length: Option<LengthRange>,
    properties: Option<Expression>,
}

fn relationship_pattern(input: Tokens) -> PResult<RelationshipPattern> {
    let (input, left) = opt(symbol(Token::LessThan))(input)?;
    let (input, _) = symbol(Token::Minus)(input)?;
    let (input, detail) = opt(relationship_detail)(input)?;
    let (input, _) = symbol(Token::Minus)(input)?;
    let (input, right) = opt(symbol(Token::GreaterThan))(input)?;
    let direction = match (left.is_some(), right.is_some()) {
        (false, true) => Direction::Outgoing,
        (true, false) => Direction::Incoming,
        _ => Direction::Both,
    };
    let detail = detail.unwrap_or(RelationshipDetail {
        variable: None,
        types: Vec::new(),
        length: None,
        properties: None,
    });
    Ok((
        input,
        RelationshipPattern {
            variable: detail.variable,
            types: detail.types,
            direction,
            properties: detail.properties,
            length: detail.length,
        },
    ))
}

fn relationship_detail(input: Tokens) -> PResult<RelationshipDetail> {
    let (input, _) = symbol(Token::LeftBracket)(input)?;
    let (input, variable) = opt(variable_name)(input)?;
    let (input, types) = opt(preceded(
        symbol(Token::Colon),
        separated_list1(
            pair(symbol(Token::Pipe), opt(symbol(Token::Colon))),
            name,
        ),
    ))(input)?;
    let (input, length) = opt(length_range)(input)?;
    let (input, properties) = opt(properties)(input)?;
    let (input, _) = symbol(Token::RightBracket)(input)?;
    Ok((
        input,
        RelationshipDetail {
            variable,
            types: types.unwrap_or_default(),
            length,
            properties,
        },
    ))
}

/// `*`, `*n`, `*a..b`, `*..b`, `*a..`
fn length_range(input: Tokens) -> PResult<LengthRange> {
    let (input, _) = symbol(Token::Star)(input)?;
    let (input, min) = opt(unsigned_integer)(input)?;
    let (input, upper) = opt(preceded(symbol(Token::DotDot), opt(unsigned_integer)))(input)?;
    let range = match upper {
        None => LengthRange { min, max: min },
        Some(max) => LengthRange { min, max },
    };
    Ok((input, range))
}

// ==============================================================================
// EXPRESSIONS
// ==============================================================================

pub(crate) fn expression(input: Tokens) -> PResult<Expression> {
    or_expression(input)
}

fn left_assoc<'a>(
    input: Tokens<'a>,
    operand: fn(Tokens<'a>) -> PResult<'a, Expression>,
    operator: fn(Tokens<'a>) -> PResult<'a, BinaryOperator>,
) -> PResult<'a, Expression> {
    let (mut input, mut left) = operand(input)?;
    loop {
        let (rest, op) = match operator(input) {
            Ok(found) => found,
            Err(nom::Err::Error(_)) => return Ok((input, left)),
            Err(e) => return Err(e),
        };
        let (rest, right) = operand(rest)?;
        left = Expression::binary(op, left, right);
        input = rest;
    }
}

fn or_expression(input: Tokens) -> PResult<Expression> {
    left_assoc(input, xor_expression, |i| {
        map(keyword(Keyword::Or), |_| BinaryOperator::Or)(i)
    })
}

fn xor_expression(input: Tokens) -> PResult<Expression> {
    left_assoc(input, and_expression, |i| {
        map(keyword(Keyword::Xor), |_| BinaryOperator::Xor)(i)
    })
}

fn and_expression(input: Tokens) -> PResult<Expression> {
    left_assoc(input, not_expression, |i| {
        map(keyword(Keyword::And), |_| BinaryOperator::And)(i)
    })
}

fn not_expression(input: Tokens) -> PResult<Expression> {
    alt((
        map(preceded(keyword(Keyword::Not), not_expression), |e| {
            Expression::Unary(UnaryOperator::Not, Box::new(e))
        }),
        comparison_expression,
    ))(input)
}

fn comparison_operator(input: Tokens) -> PResult<BinaryOperator> {
    let op = match peek(input) {
        Token::Equal => BinaryOperator::Equal,
        Token::NotEqual => BinaryOperator::NotEqual,
        Token::LessThan => BinaryOperator::LessThan,
        Token::LessEqual => BinaryOperator::LessEqual,
        Token::GreaterThan => BinaryOperator::GreaterThan,
        Token::GreaterEqual => BinaryOperator::GreaterEqual,
        Token::RegexMatch => BinaryOperator::RegexMatch,
        _ => return fail(input, "a comparison operator"),
    };
    Ok((&input[1..], op))
}

/// `a < b < c` means `a < b AND b < c`
fn comparison_expression(input: Tokens) -> PResult<Expression> {
    let (input, first) = predicate_expression(input)?;
    let (input, rest) = many0(pair(comparison_operator, predicate_expression))(input)?;
    if rest.is_empty() {
        return Ok((input, first));
    }
    let mut left = first;
    let mut combined: Option<Expression> = None;
    for (op, right) in rest {
        let comparison = Expression::binary(op, left, right.clone());
        combined = Some(match combined {
            None => comparison,
            Some(previous) => Expression::binary(BinaryOperator::And, previous, comparison),
        });
        left = right;
    }
    Ok((input, combined.unwrap_or(left)))
}

enum PredicateSuffix {
    Binary(BinaryOperator, Expression),
    IsNull(bool),
}

fn predicate_suffix(input: Tokens) -> PResult<PredicateSuffix> {
    alt((
        map(
            preceded(pair(keyword(Keyword::Starts), keyword(Keyword::With)), additive_expression),
            |e| PredicateSuffix::Binary(BinaryOperator::StartsWith, e),
        ),
        map(
            preceded(pair(keyword(Keyword::Ends), keyword(Keyword::With)), additive_expression),
            |e| PredicateSuffix::Binary(BinaryOperator::EndsWith, e),
        ),
        map(
            preceded(keyword(Keyword::Contains), additive_expression),
            |e| PredicateSuffix::Binary(BinaryOperator::Contains, e),
        ),
        map(preceded(keyword(Keyword::In), additive_expression), |e| {
            PredicateSuffix::Binary(BinaryOperator::In, e)
        }),
        map(
            tuple((
                keyword(Keyword::Is),
                opt(keyword(Keyword::Not)),
                keyword(Keyword::Null),
            )),
            |(_, not, _)| PredicateSuffix::IsNull(not.is_some()),
        ),
    ))(input)
}

fn predicate_expression(input: Tokens) -> PResult<Expression> {
    let (input, mut expression) = additive_expression(input)?;
    let (input, suffixes) = many0(predicate_suffix)(input)?;
    for suffix in suffixes {
        expression = match suffix {
            PredicateSuffix::Binary(op, right) => Expression::binary(op, expression, right),
            PredicateSuffix::IsNull(negated) => Expression::IsNull {
                expression: Box::new(expression),
                negated,
            },
        };
    }
    Ok((input, expression))
}

fn additive_expression(input: Tokens) -> PResult<Expression> {
    left_assoc(input, multiplicative_expression, |i| {
        let op = match peek(i) {
            Token::Plus => BinaryOperator::Add,
            Token::Minus => BinaryOperator::Subtract,
            _ => return fail(i, "'+' or '-'"),
        };
        Ok((&i[1..], op))
    })
}

fn multiplicative_expression(input: Tokens) -> PResult<Expression> {
    left_assoc(input, power_expression, |i| {
        let op = match peek(i) {
            Token::Star => BinaryOperator::Multiply,
            Token::Slash => BinaryOperator::Divide,
            Token::Percent => BinaryOperator::Modulo,
            _ => return fail(i, "an arithmetic operator"),
        };
        Ok((&i[1..], op))
    })
}

fn power_expression(input: Tokens) -> PResult<Expression> {
    left_assoc(input, unary_expression, |i| {
        map(symbol(Token::Caret), |_| BinaryOperator::Power)(i)
    })
}

fn unary_expression(input: Tokens) -> PResult<Expression> {
    match peek(input) {
        Token::Minus => {
            let (input, operand) = unary_expression(&input[1..])?;
            let negated = match operand {
                Expression::Literal(Literal::Integer(n)) => {
                    Expression::Literal(Literal::Integer(n.wrapping_neg()))
                }
                Expression::Literal(Literal::Float(f)) => Expression::Literal(Literal::Float(-f)),
                other => Expression::Unary(UnaryOperator::Minus, Box::new(other)),
            };
            Ok((input, negated))
        }
        Token::Plus => {
            let (input, operand) = unary_expression(&input[1..])?;
            Ok((input, Expression::Unary(UnaryOperator::Plus, Box::new(operand))))
        }
        _ => postfix_expression(input),
    }
}

enum Postfix {
    Property(String),
    Index(Expression),
    Slice(Option<Expression>, Option<Expression>),
    Labels(Vec<String>),
}

fn postfix_operator(input: Tokens) -> PResult<Postfix> {
    alt((
        map(preceded(symbol(Token::Dot), name), Postfix::Property),
        map(label_list, Postfix::Labels),
        bracket_postfix,
    ))(input)
}

/// `[index]` or `[from..to]`
fn bracket_postfix(input: Tokens) -> PResult<Postfix> {
    let (input, _) = symbol(Token::LeftBracket)(input)?;
    let (input, from) = opt(expression)(input)?;
    if let Ok((input, _)) = symbol(Token::DotDot)(input) {
        let (input, to) = opt(expression)(input)?;
        let (input, _) = symbol(Token::RightBracket)(input)?;
        return Ok((input, Postfix::Slice(from, to)));
    }
    match from {
        Some(index) => {
            let (input, _) = symbol(Token::RightBracket)(input)?;
            Ok((input, Postfix::Index(index)))
        }
        None => fail(input, "an expression"),
    }
}

fn postfix_expression(input: Tokens) -> PResult<Expression> {
    let (input, mut expression) = atom(input)?;
    let (input, operators) = many0(postfix_operator)(input)?;
    for operator in operators {
        expression = match operator {
            Postfix::Property(key) => Expression::Property(Box::new(expression), key),
            Postfix::Index(index) => Expression::Index(Box::new(expression), Box::new(index)),
            Postfix::Slice(from, to) => Expression::Slice {
                target: Box::new(expression),
                from: from.map(Box::new),
                to: to.map(Box::new),
            },
            Postfix::Labels(labels) => Expression::HasLabels(Box::new(expression), labels),
        };
    }
    Ok((input, expression))
}

fn atom(input: Tokens) -> PResult<Expression> {
    alt((
        alt((
            literal,
            parameter,
            case_expression,
            count_star,
            subquery_expression,
            exists_function,
            quantified_expression,
        )),
        alt((
            list_comprehension,
            list_literal,
            map_literal,
            map(pattern_predicate, |element| {
                Expression::PatternPredicate(Box::new(element))
            }),
            delimited(
                symbol(Token::LeftParen),
                expression,
                symbol(Token::RightParen),
            ),
            function_call,
            map_projection,
            map(variable_name, Expression::Variable),
        )),
    ))(input)
}

fn literal(input: Tokens) -> PResult<Expression> {
    let literal = match peek(input) {
        Token::Integer(n) => Literal::Integer(*n),
        Token::Float(f) => Literal::Float(*f),
        Token::String(s) => Literal::String(s.clone()),
        Token::Keyword(Keyword::True) => Literal::Boolean(true),
        Token::Keyword(Keyword::False) => Literal::Boolean(false),
        Token::Keyword(Keyword::Null) => Literal::Null,
        _ => return fail(input, "a literal"),
    };
    Ok((&input[1..], Expression::Literal(literal)))
}

fn parameter(input: Tokens) -> PResult<Expression> {
    match peek(input) {
        Token::Parameter(name) => Ok((&input[1..], Expression::Parameter(name.clone()))),
        _ => fail(input, "a parameter"),
    }
}

fn case_expression(input: Tokens) -> PResult<Expression> {
    let (input, _) = keyword(Keyword::Case)(input)?;
    let (input, operand) = opt(expression)(input)?;
    let (input, alternatives) = many1(pair(
        preceded(keyword(Keyword::When), expression),
        preceded(keyword(Keyword::Then), expression),
    ))(input)?;
    let (input, default) = opt(preceded(keyword(Keyword::Else), expression))(input)?;
    let (input, _) = keyword(Keyword::End)(input)?;
    Ok((
        input,
        Expression::Case {
            operand: operand.map(Box::new),
            alternatives,
            default: default.map(Box::new),
        },
    ))
}

fn count_star(input: Tokens) -> PResult<Expression> {
    map(
        tuple((
            soft_word("count"),
            symbol(Token::LeftParen),
            symbol(Token::Star),
            symbol(Token::RightParen),
        )),
        |_| Expression::CountStar,
    )(input)
}

/// `EXISTS { ... }` and `COUNT { ... }`
fn subquery_expression(input: Tokens) -> PResult<Expression> {
    let (input, is_count) = alt((
        map(keyword(Keyword::Exists), |_| false),
        map(soft_word("count"), |_| true),
    ))(input)?;
    let (input, body) = delimited(
        symbol(Token::LeftBrace),
        subquery_body,
        symbol(Token::RightBrace),
    )(input)?;
    let expression = if is_count {
        Expression::CountSubquery(Box::new(body))
    } else {
        Expression::Exists(Box::new(body))
    };
    Ok((input, expression))
}

fn subquery_body(input: Tokens) -> PResult<Query> {
    alt((
        query,
        map(
            pair(
                separated_list1(symbol(Token::Comma), path_pattern),
                opt(where_clause),
            ),
            |(patterns, where_clause)| {
                Query::single(SingleQuery {
                    clauses: vec![Clause::Match(MatchClause {
                        optional: false,
                        patterns,
                        where_clause,
                        location: Location::default(),
                    })],
                })
            },
        ),
    ))(input)
}

/// `exists(pattern)` or `exists(n.prop)`
fn exists_function(input: Tokens) -> PResult<Expression> {
    let (input, argument) = preceded(
        keyword(Keyword::Exists),
        delimited(
            symbol(Token::LeftParen),
            expression,
            symbol(Token::RightParen),
        ),
    )(input)?;
    let expression = match argument {
        Expression::PatternPredicate(element) => Expression::PatternPredicate(element),
        other => Expression::IsNull {
            expression: Box::new(other),
            negated: true,
        },
    };
    Ok((input, expression))
}

fn quantified_expression(input: Tokens) -> PResult<Expression> {
    let (input, quantifier) = alt((
        map(keyword(Keyword::All), |_| Quantifier::All),
        map(soft_word("any"), |_| Quantifier::Any),
        map(soft_word("none"), |_| Quantifier::None),
        map(soft_word("single"), |_| Quantifier::Single),
    ))(input)?;
    let (input, (_, variable, _, list, _, predicate, _)) = tuple((
        symbol(Token::LeftParen),
        variable_name,
        keyword(Keyword::In),
        expression,
        keyword(Keyword::Where),
        expression,
        symbol(Token::RightParen),
    ))(input)?;
    Ok((
        input,
        Expression::Quantified {
            quantifier,
            variable,
            list: Box::new(list),
            predicate: Box::new(predicate),
        },
    ))
}

fn list_comprehension(input: Tokens) -> PResult<Expression> {
    let (input, (_, variable, _, list)) = tuple((
        symbol(Token::LeftBracket),
        variable_name,
        keyword(Keyword::In),
        expression,
    ))(input)?;
    let (input, predicate) = opt(where_clause)(input)?;
    let (input, projection) = opt(preceded(symbol(Token::Pipe), expression))(input)?;
    let (input, _) = symbol(Token::RightBracket)(input)?;
    Ok((
        input,
        Expression::ListComprehension {
            variable,
            list: Box::new(list),
            predicate: predicate.map(Box::new),
            projection: projection.map(Box::new),
        },
    ))
}

fn list_literal(input: Tokens) -> PResult<Expression> {
    map(
        delimited(
            symbol(Token::LeftBracket),
            separated_list0(symbol(Token::Comma), expression),
            symbol(Token::RightBracket),
        ),
        Expression::List,
    )(input)
}

fn map_literal(input: Tokens) -> PResult<Expression> {
    map(
        delimited(
            symbol(Token::LeftBrace),
            separated_list0(
                symbol(Token::Comma),
                map(tuple((name, symbol(Token::Colon), expression)), |(k, _, v)| (k, v)),
            ),
            symbol(Token::RightBrace),
        ),
        Expression::Map,
    )(input)
}

/// A pattern with at least one relationship, used as a predicate
fn pattern_predicate(input: Tokens) -> PResult<PatternElement> {
    let (input, start) = node_pattern(input)?;
    let (input, chain) = many1(pair(relationship_pattern, node_pattern))(input)?;
    Ok((input, PatternElement { start, chain }))
}

fn function_call(input: Tokens) -> PResult<Expression> {
    let (input, first) = variable_name(input)?;
    let (input, rest) = many0(preceded(symbol(Token::Dot), name))(input)?;
    let (input, _) = symbol(Token::LeftParen)(input)?;
    let (input, distinct) = opt(keyword(Keyword::Distinct))(input)?;
    let (input, arguments) = separated_list0(symbol(Token::Comma), expression)(input)?;
    let (input, _) = symbol(Token::RightParen)(input)?;
    let mut name = first;
    for part in rest {
        name.push('.');
        name.push_str(&part);
    }
    Ok((
        input,
        Expression::FunctionCall {
            name,
            distinct: distinct.is_some(),
            arguments,
        },
    ))
}

fn map_projection_item(input: Tokens) -> PResult<MapProjectionItem> {
    alt((
        map(
            pair(symbol(Token::Dot), symbol(Token::Star)),
            |_| MapProjectionItem::AllProperties,
        ),
        map(preceded(symbol(Token::Dot), name), MapProjectionItem::Property),
        map(
            tuple((name, symbol(Token::Colon), expression)),
            |(key, _, value)| MapProjectionItem::Literal(key, value),
        ),
        map(variable_name, MapProjectionItem::Variable),
    ))(input)
}

fn map_projection(input: Tokens) -> PResult<Expression> {
    map(
        pair(
            variable_name,
            delimited(
                symbol(Token::LeftBrace),
                separated_list0(symbol(Token::Comma), map_projection_item),
                symbol(Token::RightBrace),
            ),
        ),
        |(variable, items)| Expression::MapProjection { variable, items },
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(query: &str) -> Statement {
        parse_query(query)
            .unwrap_or_else(|e| panic!("failed to parse {}: {}", query, e))
            .statement
    }

    fn single(query: &str) -> SingleQuery {
        match parse(query) {
            Statement::Query(q) => q.first,
            other => panic!("expected query, got {:?}", other),
        }
    }

    #[test]
    fn test_match_with_relationships() {
        let q = single("MATCH (a:Person {name: 'Ann'})-[r:KNOWS|LIKES*1..3]->(b) RETURN b");
        let Clause::Match(m) = &q.clauses[0] else {
            panic!("expected MATCH")
        };
        let element = &m.patterns[0].element;
        assert_eq!(element.start.labels, vec!["Person"]);
        let (rel, _) = &element.chain[0];
        assert_eq!(rel.types, vec!["KNOWS", "LIKES"]);
        assert_eq!(rel.direction, Direction::Outgoing);
        assert_eq!(
            rel.length,
            Some(LengthRange {
                min: Some(1),
                max: Some(3)
            })
        );
    }

    #[test]
    fn test_length_forms() {
        let range = |q: &str| {
            let q = single(q);
            let Clause::Match(m) = &q.clauses[0] else {
                panic!()
            };
            m.patterns[0].element.chain[0].0.length
        };
        assert_eq!(
            range("MATCH (a)-[*]-(b) RETURN a"),
            Some(LengthRange { min: None, max: None })
        );
        assert_eq!(
            range("MATCH (a)-[*2]-(b) RETURN a"),
            Some(LengthRange {
                min: Some(2),
                max: Some(2)
            })
        );
        assert_eq!(
            range("MATCH (a)<-[*..4]-(b) RETURN a"),
            Some(LengthRange {
                min: None,
                max: Some(4)
            })
        );
        assert_eq!(
            range("MATCH (a)-[*3..]-(b) RETURN a"),
            Some(LengthRange {
                min: Some(3),
                max: None
            })
        );
    }

    #[test]
    fn test_keyword_named_labels_and_properties() {
        let q = single("MATCH (n:Return) WHERE n.order > 1 RETURN n.order AS returned_value");
        let Clause::Match(m) = &q.clauses[0] else {
            panic!()
        };
        assert_eq!(m.patterns[0].element.start.labels, vec!["Return"]);
        let ret = q.return_clause().unwrap();
        assert_eq!(ret.items[0].column_name(), "returned_value");
    }

    #[test]
    fn test_function_call_whitespace_and_column_text() {
        let q = single("MATCH (n) RETURN count (n), count(*), n.name");
        let ret = q.return_clause().unwrap();
        assert!(matches!(
            &ret.items[0].expression,
            Expression::FunctionCall { name, .. } if name == "count"
        ));
        assert_eq!(ret.items[0].text, "count (n)");
        assert!(matches!(ret.items[1].expression, Expression::CountStar));
        assert_eq!(ret.items[2].column_name(), "n.name");
    }

    #[test]
    fn test_operator_precedence() {
        let e = parse_expression("1 + 2 * 3 = 7 AND NOT false").unwrap();
        let Expression::Binary(BinaryOperator::And, left, right) = e else {
            panic!("expected AND")
        };
        assert!(matches!(*left, Expression::Binary(BinaryOperator::Equal, _, _)));
        assert!(matches!(*right, Expression::Unary(UnaryOperator::Not, _)));

        let chained = parse_expression("1 < x <= 3").unwrap();
        assert!(matches!(
            chained,
            Expression::Binary(BinaryOperator::And, _, _)
        ));
        assert!(matches!(
            parse_expression("-5").unwrap(),
            Expression::Literal(Literal::Integer(-5))
        ));
    }

    #[test]
    fn test_expression_forms() {
        assert!(matches!(
            parse_expression("[x IN range(1, 5) WHERE x % 2 = 0 | x * 10]").unwrap(),
            Expression::ListComprehension { .. }
        ));
        assert!(matches!(
            parse_expression("n {.name, .*, total: 1, m}").unwrap(),
            Expression::MapProjection { ref items, .. } if items.len() == 4
        ));
        assert!(matches!(
            parse_expression("CASE WHEN a > 1 THEN 'x' ELSE 'y' END").unwrap(),
            Expression::Case { operand: None, .. }
        ));
        assert!(matches!(
            parse_expression("all(x IN xs WHERE x > 0)").unwrap(),
            Expression::Quantified {
                quantifier: Quantifier::All,
                ..
            }
        ));
        assert!(matches!(
            parse_expression("n.name STARTS WITH 'A'").unwrap(),
            Expression::Binary(BinaryOperator::StartsWith, _, _)
        ));
        assert!(matches!(
            parse_expression("n.x IS NOT NULL").unwrap(),
            Expression::IsNull { negated: true, .. }
        ));
        assert!(matches!(
            parse_expression("list[1..2]").unwrap(),
            Expression::Slice { .. }
        ));
        assert!(matches!(
            parse_expression("vector.similarity.cosine(a, b)").unwrap(),
            Expression::FunctionCall { ref name, .. } if name == "vector.similarity.cosine"
        ));
    }

    #[test]
    fn test_subqueries_and_pattern_predicates() {
        assert!(matches!(
            parse_expression("EXISTS { (a)-[:KNOWS]->(b) WHERE b.age > 3 }").unwrap(),
            Expression::Exists(_)
        ));
        assert!(matches!(
            parse_expression("COUNT { MATCH (a)-->(b) RETURN b }").unwrap(),
            Expression::CountSubquery(_)
        ));
        assert!(matches!(
            parse_expression("NOT (a)-[:KNOWS]-(b)").unwrap(),
            Expression::Unary(UnaryOperator::Not, _)
        ));
        assert!(matches!(
            parse_expression("(a) - (b)").unwrap(),
            Expression::Binary(BinaryOperator::Subtract, _, _)
        ));
    }

    #[test]
    fn test_updating_clauses() {
        let q = single(
            "MATCH (a), (b) CREATE (a)-[:KNOWS {since: 2020}]->(b) \
             SET a.x = 1, a += {y: 2}, a:Tagged REMOVE a.z, a:Old DETACH DELETE b",
        );
        assert_eq!(q.clauses.len(), 5);
        let Clause::Set(set) = &q.clauses[2] else {
            panic!()
        };
        assert!(matches!(set.items[1], SetItem::Merge { .. }));
        assert!(matches!(set.items[2], SetItem::Labels { .. }));
        let Clause::Delete(delete) = &q.clauses[4] else {
            panic!()
        };
        assert!(delete.detach);
    }

    #[test]
    fn test_merge_actions_and_foreach() {
        let q = single(
            "MERGE (n:User {id: 1}) ON CREATE SET n.created = true ON MATCH SET n.seen = true \
             FOREACH (x IN [1, 2] | CREATE (:Item {v: x}))",
        );
        let Clause::Merge(merge) = &q.clauses[0] else {
            panic!()
        };
        assert_eq!(merge.on_create.len(), 1);
        assert_eq!(merge.on_match.len(), 1);
        assert!(matches!(q.clauses[1], Clause::Foreach(_)));
    }

    #[test]
    fn test_union_call_and_shortest_path() {
        let Statement::Query(q) = parse("MATCH (a) RETURN a.x AS x UNION ALL MATCH (b) RETURN b.x AS x")
        else {
            panic!()
        };
        assert!(q.unions[0].all);

        let q = single("CALL db.labels() YIELD label WHERE label <> 'X' RETURN label");
        let Clause::Call(call) = &q.clauses[0] else {
            panic!()
        };
        assert_eq!(call.procedure, "db.labels");
        assert!(call.where_clause.is_some());

        let q = single("MATCH p = shortestPath((a)-[*]-(b)) RETURN p");
        let Clause::Match(m) = &q.clauses[0] else {
            panic!()
        };
        assert_eq!(m.patterns[0].kind, PathKind::Shortest);
        assert_eq!(m.patterns[0].variable.as_deref(), Some("p"));
    }

    #[test]
    fn test_schema_and_transaction_commands() {
        assert!(matches!(
            parse("CREATE INDEX person_name IF NOT EXISTS FOR (n:Person) ON (n.name, n.age)"),
            Statement::Schema(SchemaCommand::CreateIndex { if_not_exists: true, ref properties, .. })
                if properties.len() == 2
        ));
        assert!(matches!(
            parse("CREATE CONSTRAINT FOR (n:Person) REQUIRE n.email IS UNIQUE"),
            Statement::Schema(SchemaCommand::CreateConstraint { name: None, .. })
        ));
        assert!(matches!(
            parse("CREATE FULLTEXT INDEX docs FOR (d:Doc) ON EACH [d.title, d.body]"),
            Statement::Schema(SchemaCommand::CreateFulltextIndex { .. })
        ));
        assert!(matches!(
            parse("CREATE VECTOR INDEX emb FOR (d:Doc) ON (d.embedding) OPTIONS {indexConfig: {`vector.dimensions`: 3}}"),
            Statement::Schema(SchemaCommand::CreateVectorIndex { options: Some(_), .. })
        ));
        assert!(matches!(
            parse("DROP INDEX emb IF EXISTS"),
            Statement::Schema(SchemaCommand::DropIndex { if_exists: true, .. })
        ));
        assert!(matches!(
            parse("SHOW INDEXES"),
            Statement::Schema(SchemaCommand::ShowIndexes)
        ));
        assert!(matches!(
            parse("BEGIN"),
            Statement::Transaction(TransactionCommand::Begin)
        ));
        assert!(parse("EXPLAIN MATCH (n) RETURN n;").is_explain());
    }

    #[test]
    fn test_syntax_error_position() {
        let err = parse_query("MATCH (n)\nRETRN n").unwrap_err();
        let ParserError::Syntax {
            line,
            column,
            found,
            expected,
            ..
        } = err;
        assert_eq!((line, column), (2, 1));
        assert_eq!(found, "RETRN");
        assert!(expected.contains("RETURN"));

        let err = parse_query("MATCH (n:Person RETURN n").unwrap_err();
        let ParserError::Syntax { found, expected, .. } = err;
        assert_eq!(found, "RETURN");
        assert!(expected.contains("')'"));

        let err = parse_query("MATCH (n) WHERE n.age > RETURN n").unwrap_err();
        let ParserError::Syntax { column, .. } = err;
        assert_eq!(column, 25);
    }
}
