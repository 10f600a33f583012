// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Abstract Syntax Tree (AST) structures for the Cypher query language

use serde::{Deserialize, Serialize};

/// Location information for AST nodes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

/// Main AST node representing one parsed statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub statement: Statement,
    pub location: Location,
}

/// Top-level statement types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
    Query(Query),
    Explain(Box<Statement>),
    Profile(Box<Statement>),
    Schema(SchemaCommand),
    Transaction(TransactionCommand),
}

impl Statement {
    /// Statement with any EXPLAIN/PROFILE prefix removed
    pub fn inner(&self) -> &Statement {
        match self {
            Statement::Explain(inner) | Statement::Profile(inner) => inner.inner(),
            other => other,
        }
    }

    pub fn is_explain(&self) -> bool {
        matches!(self, Statement::Explain(_))
    }

    pub fn is_profile(&self) -> bool {
        matches!(self, Statement::Profile(_))
    }
}

/// BEGIN / COMMIT / ROLLBACK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionCommand {
    Begin,
    Commit,
    Rollback,
}

/// A query, optionally combined with further queries through UNION
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub first: SingleQuery,
    pub unions: Vec<UnionPart>,
}

impl Query {
    pub fn single(query: SingleQuery) -> Self {
        Self {
            first: query,
            unions: Vec::new(),
        }
    }

    /// All single queries in order
    pub fn parts(&self) -> impl Iterator<Item = &SingleQuery> {
        std::iter::once(&self.first).chain(self.unions.iter().map(|u| &u.query))
    }

    /// True if any clause writes to the graph
    pub fn is_updating(&self) -> bool {
        self.parts().any(|part| part.clauses.iter().any(Clause::is_updating))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnionPart {
    /// UNION ALL keeps duplicates
    pub all: bool,
    pub query: SingleQuery,
}

/// A linear sequence of clauses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleQuery {
    pub clauses: Vec<Clause>,
}

impl SingleQuery {
    /// The terminating RETURN clause, if any
    pub fn return_clause(&self) -> Option<&ProjectionClause> {
        match self.clauses.last() {
            Some(Clause::Return(projection)) => Some(projection),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Clause {
    Match(MatchClause),
    Create(CreateClause),
    Merge(MergeClause),
    Set(SetClause),
    Remove(RemoveClause),
    Delete(DeleteClause),
    With(ProjectionClause),
    Return(ProjectionClause),
    Unwind(UnwindClause),
    Foreach(ForeachClause),
    Call(CallClause),
}

impl Clause {
    pub fn is_updating(&self) -> bool {
        match self {
            Clause::Create(_)
            | Clause::Merge(_)
            | Clause::Set(_)
            | Clause::Remove(_)
            | Clause::Delete(_)
            | Clause::Foreach(_) => true,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Clause::Match(m) if m.optional => "OPTIONAL MATCH",
            Clause::Match(_) => "MATCH",
            Clause::Create(_) => "CREATE",
            Clause::Merge(_) => "MERGE",
            Clause::Set(_) => "SET",
            Clause::Remove(_) => "REMOVE",
            Clause::Delete(_) => "DELETE",
            Clause::With(_) => "WITH",
            Clause::Return(_) => "RETURN",
            Clause::Unwind(_) => "UNWIND",
            Clause::Foreach(_) => "FOREACH",
            Clause::Call(_) => "CALL",
        }
    }
}

/// MATCH or OPTIONAL MATCH
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchClause {
    pub optional: bool,
    pub patterns: Vec<PathPattern>,
    pub where_clause: Option<Expression>,
    pub location: Location,
}

/// How a path pattern is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathKind {
    Simple,
    Shortest,
    AllShortest,
}

/// `[p =] [shortestPath(...)] (a)-[r]->(b)...`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathPattern {
    pub variable: Option<String>,
    pub kind: PathKind,
    pub element: PatternElement,
}

/// Alternating chain of node and relationship patterns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternElement {
    pub start: NodePattern,
    pub chain: Vec<(RelationshipPattern, NodePattern)>,
}

impl PatternElement {
    pub fn nodes(&self) -> impl Iterator<Item = &NodePattern> {
        std::iter::once(&self.start).chain(self.chain.iter().map(|(_, n)| n))
    }

    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipPattern> {
        self.chain.iter().map(|(r, _)| r)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePattern {
    pub variable: Option<String>,
    pub labels: Vec<String>,
    /// Inline property map: a map literal or a parameter
    pub properties: Option<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// `-->`
    Outgoing,
    /// `<--`
    Incoming,
    /// `--`
    Both,
}

/// Bounds of a variable-length relationship; `None` means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthRange {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipPattern {
    pub variable: Option<String>,
    /// Alternative types, any of which matches; empty matches all
    pub types: Vec<String>,
    pub direction: Direction,
    pub properties: Option<Expression>,
    /// Present for `*` patterns
    pub length: Option<LengthRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClause {
    pub patterns: Vec<PathPattern>,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeClause {
    pub pattern: PathPattern,
    pub on_create: Vec<SetItem>,
    pub on_match: Vec<SetItem>,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetClause {
    pub items: Vec<SetItem>,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SetItem {
    /// `n.p = expr`
    Property {
        variable: String,
        key: String,
        value: Expression,
    },
    /// `n = {map}`
    Replace { variable: String, value: Expression },
    /// `n += {map}`
    Merge { variable: String, value: Expression },
    /// `n:Label:Other`
    Labels { variable: String, labels: Vec<String> },
}

impl SetItem {
    pub fn variable(&self) -> &str {
        match self {
            SetItem::Property { variable, .. }
            | SetItem::Replace { variable, .. }
            | SetItem::Merge { variable, .. }
            | SetItem::Labels { variable, .. } => variable,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveClause {
    pub items: Vec<RemoveItem>,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RemoveItem {
    Property { variable: String, key: String },
    Labels { variable: String, labels: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteClause {
    pub detach: bool,
    pub expressions: Vec<Expression>,
    pub location: Location,
}

/// Shared shape of WITH and RETURN
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionClause {
    pub distinct: bool,
    /// `*` projects every variable in scope
    pub star: bool,
    pub items: Vec<ProjectionItem>,
    pub order_by: Vec<SortItem>,
    pub skip: Option<Expression>,
    pub limit: Option<Expression>,
    /// Only valid on WITH
    pub where_clause: Option<Expression>,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionItem {
    pub expression: Expression,
    pub alias: Option<String>,
    /// Source text of the expression, used as the column name
    pub text: String,
}

impl ProjectionItem {
    pub fn column_name(&self) -> &str {
        match (&self.alias, &self.expression) {
            (Some(alias), _) => alias,
            (None, Expression::Variable(name)) => name,
            (None, _) => &self.text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortItem {
    pub expression: Expression,
    pub descending: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnwindClause {
    pub expression: Expression,
    pub variable: String,
    pub location: Location,
}

/// `FOREACH (x IN list | updating clauses)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeachClause {
    pub variable: String,
    pub list: Expression,
    pub body: Vec<Clause>,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallClause {
    /// Dotted procedure name, e.g. `db.labels`
    pub procedure: String,
    pub arguments: Vec<Expression>,
    pub yield_items: Option<YieldItems>,
    pub where_clause: Option<Expression>,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum YieldItems {
    All,
    Items(Vec<YieldItem>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldItem {
    pub field: String,
    pub alias: Option<String>,
}

impl YieldItem {
    pub fn variable(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.field)
    }
}

/// Index and constraint management
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SchemaCommand {
    CreateIndex {
        name: Option<String>,
        if_not_exists: bool,
        label: String,
        properties: Vec<String>,
    },
    CreateFulltextIndex {
        name: String,
        if_not_exists: bool,
        label: String,
        properties: Vec<String>,
    },
    CreateVectorIndex {
        name: String,
        if_not_exists: bool,
        label: String,
        property: String,
        options: Option<Expression>,
    },
    CreateConstraint {
        name: Option<String>,
        if_not_exists: bool,
        label: String,
        property: String,
    },
    DropIndex {
        name: String,
        if_exists: bool,
    },
    DropConstraint {
        name: String,
        if_exists: bool,
    },
    ShowIndexes,
    ShowConstraints,
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Or,
    Xor,
    And,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    RegexMatch,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    In,
    StartsWith,
    EndsWith,
    Contains,
}

impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Or => "OR",
            BinaryOperator::Xor => "XOR",
            BinaryOperator::And => "AND",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::RegexMatch => "=~",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "^",
            BinaryOperator::In => "IN",
            BinaryOperator::StartsWith => "STARTS WITH",
            BinaryOperator::EndsWith => "ENDS WITH",
            BinaryOperator::Contains => "CONTAINS",
        }
    }
}

/// `any`, `all`, `none` and `single` list predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantifier {
    Any,
    All,
    None,
    Single,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MapProjectionItem {
    /// `.name`
    Property(String),
    /// `.*`
    AllProperties,
    /// `key: expr`
    Literal(String, Expression),
    /// `var` copies a variable under its own name
    Variable(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expression {
    Literal(Literal),
    Parameter(String),
    Variable(String),
    Property(Box<Expression>, String),
    Index(Box<Expression>, Box<Expression>),
    Slice {
        target: Box<Expression>,
        from: Option<Box<Expression>>,
        to: Option<Box<Expression>>,
    },
    List(Vec<Expression>),
    Map(Vec<(String, Expression)>),
    Unary(UnaryOperator, Box<Expression>),
    Binary(BinaryOperator, Box<Expression>, Box<Expression>),
    IsNull {
        expression: Box<Expression>,
        negated: bool,
    },
    /// `n:Label` used as a predicate
    HasLabels(Box<Expression>, Vec<String>),
    FunctionCall {
        name: String,
        distinct: bool,
        arguments: Vec<Expression>,
    },
    CountStar,
    Case {
        operand: Option<Box<Expression>>,
        alternatives: Vec<(Expression, Expression)>,
        default: Option<Box<Expression>>,
    },
    ListComprehension {
        variable: String,
        list: Box<Expression>,
        predicate: Option<Box<Expression>>,
        projection: Option<Box<Expression>>,
    },
    Quantified {
        quantifier: Quantifier,
        variable: String,
        list: Box<Expression>,
        predicate: Box<Expression>,
    },
    MapProjection {
        variable: String,
        items: Vec<MapProjectionItem>,
    },
    /// A relationship pattern used as a predicate
    PatternPredicate(Box<PatternElement>),
    /// `EXISTS { ... }`
    Exists(Box<Query>),
    /// `COUNT { ... }`
    CountSubquery(Box<Query>),
}

impl Expression {
    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable(name.into())
    }

    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary(op, Box::new(left), Box::new(right))
    }

    /// True if the expression itself is an aggregate call at any depth
    /// outside of subqueries
    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if e.is_aggregate_call() {
                found = true;
            }
        });
        found
    }

    pub fn is_aggregate_call(&self) -> bool {
        match self {
            Expression::CountStar => true,
            Expression::FunctionCall { name, .. } => is_aggregate_function(name),
            _ => false,
        }
    }

    /// Pre-order traversal that does not descend into subqueries
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expression)) {
        visit(self);
        match self {
            Expression::Literal(_)
            | Expression::Parameter(_)
            | Expression::Variable(_)
            | Expression::CountStar
            | Expression::MapProjection { .. }
            | Expression::PatternPredicate(_)
            | Expression::Exists(_)
            | Expression::CountSubquery(_) => {}
            Expression::Property(target, _) | Expression::HasLabels(target, _) => {
                target.walk(visit)
            }
            Expression::Index(target, index) => {
                target.walk(visit);
                index.walk(visit);
            }
            Expression::Slice { target, from, to } => {
                target.walk(visit);
                if let Some(from) = from {
                    from.walk(visit);
                }
                if let Some(to) = to {
                    to.walk(visit);
                }
            }
            Expression::List(items) => items.iter().for_each(|e| e.walk(visit)),
            Expression::Map(entries) => entries.iter().for_each(|(_, e)| e.walk(visit)),
            Expression::Unary(_, inner) => inner.walk(visit),
            Expression::Binary(_, left, right) => {
                left.walk(visit);
                right.walk(visit);
            }
            Expression::IsNull { expression, .. } => expression.walk(visit),
            Expression::FunctionCall { arguments, .. } => {
                arguments.iter().for_each(|e| e.walk(visit))
            }
            Expression::Case {
                operand,
                alternatives,
                default,
            } => {
                if let Some(operand) = operand {
                    operand.walk(visit);
                }
                for (when, then) in alternatives {
                    when.walk(visit);
                    then.walk(visit);
                }
                if let Some(default) = default {
                    default.walk(visit);
                }
            }
            Expression::ListComprehension {
                list,
                predicate,
                projection,
                ..
            } => {
                list.walk(visit);
                if let Some(predicate) = predicate {
                    predicate.walk(visit);
                }
                if let Some(projection) = projection {
                    projection.walk(visit);
                }
            }
            Expression::Quantified {
                list, predicate, ..
            } => {
                list.walk(visit);
                predicate.walk(visit);
            }
        }
    }
}

/// Names of the aggregate functions
pub const AGGREGATE_FUNCTIONS: &[&str] = &["count", "sum", "avg", "min", "max", "collect", "stdev"];

pub fn is_aggregate_function(name: &str) -> bool {
    AGGREGATE_FUNCTIONS
        .iter()
        .any(|f| f.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_aggregate() {
        let expr = Expression::binary(
            BinaryOperator::Add,
            Expression::FunctionCall {
                name: "COUNT".to_string(),
                distinct: false,
                arguments: vec![Expression::variable("n")],
            },
            Expression::Literal(Literal::Integer(1)),
        );
        assert!(expr.contains_aggregate());
        assert!(!Expression::variable("n").contains_aggregate());
    }
}
