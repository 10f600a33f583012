// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Pretty printer for AST nodes with debug logging
//!
//! The `Display` impls render expressions and patterns back to Cypher text.
//! Plan descriptions use them for operator details.

use std::fmt::{self, Display, Formatter};

use log::debug;

use crate::ast::ast::*;

/// Log the clause tree of a document at debug level
pub fn pretty_print_ast(document: &Document) {
    debug!("Document");
    print_statement(&document.statement, 1);
}

fn print_statement(statement: &Statement, indent: usize) {
    match statement {
        Statement::Query(query) => {
            debug!("{}Query", get_indent(indent));
            for (i, part) in query.parts().enumerate() {
                if i > 0 {
                    let all = query.unions[i - 1].all;
                    debug!(
                        "{}{}",
                        get_indent(indent + 1),
                        if all { "UNION ALL" } else { "UNION" }
                    );
                }
                for clause in &part.clauses {
                    print_clause(clause, indent + 1);
                }
            }
        }
        Statement::Explain(inner) => {
            debug!("{}Explain", get_indent(indent));
            print_statement(inner, indent + 1);
        }
        Statement::Profile(inner) => {
            debug!("{}Profile", get_indent(indent));
            print_statement(inner, indent + 1);
        }
        Statement::Schema(command) => {
            debug!("{}Schema {:?}", get_indent(indent), command);
        }
        Statement::Transaction(command) => {
            debug!("{}Transaction {:?}", get_indent(indent), command);
        }
    }
}

fn print_clause(clause: &Clause, indent: usize) {
    let pad = get_indent(indent);
    match clause {
        Clause::Match(m) => {
            debug!("{}{} {}", pad, clause.name(), join(&m.patterns, ", "));
            if let Some(predicate) = &m.where_clause {
                debug!("{}  WHERE {}", pad, predicate);
            }
        }
        Clause::Create(c) => debug!("{}CREATE {}", pad, join(&c.patterns, ", ")),
        Clause::Merge(m) => debug!(
            "{}MERGE {} (on create: {}, on match: {})",
            pad,
            m.pattern,
            m.on_create.len(),
            m.on_match.len()
        ),
        Clause::Set(s) => debug!("{}SET {} items", pad, s.items.len()),
        Clause::Remove(r) => debug!("{}REMOVE {} items", pad, r.items.len()),
        Clause::Delete(d) => debug!(
            "{}{}DELETE {}",
            pad,
            if d.detach { "DETACH " } else { "" },
            join(&d.expressions, ", ")
        ),
        Clause::With(p) | Clause::Return(p) => {
            debug!(
                "{}{}{} {}",
                pad,
                clause.name(),
                if p.distinct { " DISTINCT" } else { "" },
                projection_summary(p)
            );
        }
        Clause::Unwind(u) => debug!("{}UNWIND {} AS {}", pad, u.expression, u.variable),
        Clause::Foreach(f) => {
            debug!("{}FOREACH {} IN {}", pad, f.variable, f.list);
            for inner in &f.body {
                print_clause(inner, indent + 1);
            }
        }
        Clause::Call(c) => debug!("{}CALL {}({})", pad, c.procedure, join(&c.arguments, ", ")),
    }
}

/// Comma separated column list of a projection
pub fn projection_summary(projection: &ProjectionClause) -> String {
    let mut parts: Vec<String> = Vec::new();
    if projection.star {
        parts.push("*".to_string());
    }
    for item in &projection.items {
        match &item.alias {
            Some(alias) => parts.push(format!("{} AS {}", item.expression, alias)),
            None => parts.push(item.expression.to_string()),
        }
    }
    parts.join(", ")
}

fn get_indent(level: usize) -> String {
    "  ".repeat(level)
}

pub fn join<T: Display>(items: &[T], separator: &str) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

fn write_name(f: &mut Formatter<'_>, name: &str) -> fmt::Result {
    let plain = name
        .chars()
        .next()
        .map(|c| c.is_alphabetic() || c == '_')
        .unwrap_or(false)
        && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    if plain {
        write!(f, "{}", name)
    } else {
        write!(f, "`{}`", name.replace('`', "``"))
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(x) => {
                if x.fract() == 0.0 && x.is_finite() {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Literal::String(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(literal) => write!(f, "{}", literal),
            Expression::Parameter(name) => write!(f, "${}", name),
            Expression::Variable(name) => write_name(f, name),
            Expression::Property(target, key) => {
                write!(f, "{}.", target)?;
                write_name(f, key)
            }
            Expression::Index(target, index) => write!(f, "{}[{}]", target, index),
            Expression::Slice { target, from, to } => {
                write!(f, "{}[", target)?;
                if let Some(from) = from {
                    write!(f, "{}", from)?;
                }
                write!(f, "..")?;
                if let Some(to) = to {
                    write!(f, "{}", to)?;
                }
                write!(f, "]")
            }
            Expression::List(items) => write!(f, "[{}]", join(items, ", ")),
            Expression::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_name(f, key)?;
                    write!(f, ": {}", value)?;
                }
                write!(f, "}}")
            }
            Expression::Unary(UnaryOperator::Not, operand) => write!(f, "NOT {}", operand),
            Expression::Unary(UnaryOperator::Minus, operand) => write!(f, "-{}", operand),
            Expression::Unary(UnaryOperator::Plus, operand) => write!(f, "+{}", operand),
            Expression::Binary(op, left, right) => {
                write!(f, "{} {} {}", Parenthesized(left), op.symbol(), Parenthesized(right))
            }
            Expression::IsNull {
                expression,
                negated,
            } => write!(
                f,
                "{} IS {}NULL",
                expression,
                if *negated { "NOT " } else { "" }
            ),
            Expression::HasLabels(target, labels) => {
                write!(f, "{}", target)?;
                for label in labels {
                    write!(f, ":")?;
                    write_name(f, label)?;
                }
                Ok(())
            }
            Expression::FunctionCall {
                name,
                distinct,
                arguments,
            } => write!(
                f,
                "{}({}{})",
                name,
                if *distinct { "DISTINCT " } else { "" },
                join(arguments, ", ")
            ),
            Expression::CountStar => write!(f, "count(*)"),
            Expression::Case {
                operand,
                alternatives,
                default,
            } => {
                write!(f, "CASE")?;
                if let Some(operand) = operand {
                    write!(f, " {}", operand)?;
                }
                for (when, then) in alternatives {
                    write!(f, " WHEN {} THEN {}", when, then)?;
                }
                if let Some(default) = default {
                    write!(f, " ELSE {}", default)?;
                }
                write!(f, " END")
            }
            Expression::ListComprehension {
                variable,
                list,
                predicate,
                projection,
            } => {
                write!(f, "[{} IN {}", variable, list)?;
                if let Some(predicate) = predicate {
                    write!(f, " WHERE {}", predicate)?;
                }
                if let Some(projection) = projection {
                    write!(f, " | {}", projection)?;
                }
                write!(f, "]")
            }
            Expression::Quantified {
                quantifier,
                variable,
                list,
                predicate,
            } => {
                let name = match quantifier {
                    Quantifier::Any => "any",
                    Quantifier::All => "all",
                    Quantifier::None => "none",
                    Quantifier::Single => "single",
                };
                write!(f, "{}({} IN {} WHERE {})", name, variable, list, predicate)
            }
            Expression::MapProjection { variable, items } => {
                write!(f, "{} {{", variable)?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match item {
                        MapProjectionItem::Property(key) => write!(f, ".{}", key)?,
                        MapProjectionItem::AllProperties => write!(f, ".*")?,
                        MapProjectionItem::Literal(key, value) => write!(f, "{}: {}", key, value)?,
                        MapProjectionItem::Variable(name) => write!(f, "{}", name)?,
                    }
                }
                write!(f, "}}")
            }
            Expression::PatternPredicate(element) => write!(f, "{}", element),
            Expression::Exists(_) => write!(f, "EXISTS {{ ... }}"),
            Expression::CountSubquery(_) => write!(f, "COUNT {{ ... }}"),
        }
    }
}

/// Wraps nested binary operations in parentheses
struct Parenthesized<'a>(&'a Expression);

impl Display for Parenthesized<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.0 {
            Expression::Binary(..) => write!(f, "({})", self.0),
            other => write!(f, "{}", other),
        }
    }
}

impl Display for NodePattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        if let Some(variable) = &self.variable {
            write_name(f, variable)?;
        }
        for label in &self.labels {
            write!(f, ":")?;
            write_name(f, label)?;
        }
        if let Some(properties) = &self.properties {
            write!(f, " {}", properties)?;
        }
        write!(f, ")")
    }
}

impl Display for LengthRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "*")?;
        match (self.min, self.max) {
            (None, None) => Ok(()),
            (Some(min), Some(max)) if min == max => write!(f, "{}", min),
            (min, max) => {
                if let Some(min) = min {
                    write!(f, "{}", min)?;
                }
                write!(f, "..")?;
                if let Some(max) = max {
                    write!(f, "{}", max)?;
                }
                Ok(())
            }
        }
    }
}

impl Display for RelationshipPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.direction == Direction::Incoming {
            write!(f, "<")?;
        }
        write!(f, "-")?;
        let detailed = self.variable.is_some()
            || !self.types.is_empty()
            || self.length.is_some()
            || self.properties.is_some();
        if detailed {
            write!(f, "[")?;
            if let Some(variable) = &self.variable {
                write_name(f, variable)?;
            }
            for (i, rel_type) in self.types.iter().enumerate() {
                write!(f, "{}", if i == 0 { ":" } else { "|" })?;
                write_name(f, rel_type)?;
            }
            if let Some(length) = &self.length {
                write!(f, "{}", length)?;
            }
            if let Some(properties) = &self.properties {
                write!(f, " {}", properties)?;
            }
            write!(f, "]")?;
        }
        write!(f, "-")?;
        if self.direction == Direction::Outgoing {
            write!(f, ">")?;
        }
        Ok(())
    }
}

impl Display for PatternElement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)?;
        for (relationship, node) in &self.chain {
            write!(f, "{}{}", relationship, node)?;
        }
        Ok(())
    }
}

impl Display for PathPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(variable) = &self.variable {
            write!(f, "{} = ", variable)?;
        }
        match self.kind {
            PathKind::Simple => write!(f, "{}", self.element),
            PathKind::Shortest => write!(f, "shortestPath({})", self.element),
            PathKind::AllShortest => write!(f, "allShortestPaths({})", self.element),
        }
    }
}
