// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Validator for Cypher AST structures
//!
//! Runs after parsing and before execution. Nothing here touches data.
//!
//! # Validation Categories
//!
//! ## 1. Structural Validations
//! - **Clause Order**: RETURN only at the end of a query part, a standalone
//!   CALL only at the end, and a query part must end in RETURN, an updating
//!   clause or a procedure call
//! - **WITH Aliases**: projected expressions other than plain variables need `AS`
//! - **UNION**: parts must return the same columns and may not mix `UNION`
//!   with `UNION ALL`
//! - **Relationship Creation**: CREATE and MERGE need exactly one type and a
//!   fixed length; CREATE also needs a direction
//!
//! ## 2. Semantic Validations
//! - **Variable Scope**: every variable must be bound by an earlier clause;
//!   WITH and RETURN replace the scope with their projections
//! - **Function Existence**: called functions must be known
//! - **Parameters**: every `$name` must be supplied by the caller
//! - **Aggregates**: not allowed inside WHERE

use std::collections::HashSet;

use super::ast::*;

/// Validation error with context
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
    pub location: Option<Location>,
    pub error_type: ValidationErrorType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorType {
    Structural,
    Semantic,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.location {
            Some(loc) if loc.line > 0 => write!(
                f,
                "{} (line {}, column {})",
                self.message, loc.line, loc.column
            ),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// What the validator needs to know about the surrounding engine
pub struct ValidationSettings<'a> {
    pub is_known_function: &'a dyn Fn(&str) -> bool,
    pub is_known_procedure: &'a dyn Fn(&str) -> bool,
    /// Names of the parameters supplied with the query; `None` skips the check
    pub parameters: Option<&'a HashSet<String>>,
}

type Scope = HashSet<String>;

struct ValidationContext<'a> {
    settings: &'a ValidationSettings<'a>,
    errors: Vec<ValidationError>,
    /// Location of the clause being checked
    location: Option<Location>,
}

impl<'a> ValidationContext<'a> {
    fn structural(&mut self, message: impl Into<String>) {
        self.errors.push(ValidationError {
            message: message.into(),
            location: self.location,
            error_type: ValidationErrorType::Structural,
        });
    }

    fn semantic(&mut self, message: impl Into<String>) {
        self.errors.push(ValidationError {
            message: message.into(),
            location: self.location,
            error_type: ValidationErrorType::Semantic,
        });
    }
}

/// Validate a parsed statement
pub fn validate_statement(
    statement: &Statement,
    settings: &ValidationSettings,
) -> Result<(), Vec<ValidationError>> {
    let mut ctx = ValidationContext {
        settings,
        errors: Vec::new(),
        location: None,
    };
    match statement {
        Statement::Explain(inner) => {
            // EXPLAIN never evaluates, so parameters need not be supplied
            let relaxed = ValidationSettings {
                is_known_function: settings.is_known_function,
                is_known_procedure: settings.is_known_procedure,
                parameters: None,
            };
            return validate_statement(inner, &relaxed);
        }
        Statement::Profile(inner) => return validate_statement(inner, settings),
        Statement::Query(query) => {
            validate_query(&mut ctx, query, &Scope::new(), false);
        }
        Statement::Schema(SchemaCommand::CreateVectorIndex {
            options: Some(options),
            ..
        }) => validate_expression(&mut ctx, options, &Scope::new()),
        Statement::Schema(_) | Statement::Transaction(_) => {}
    }
    if ctx.errors.is_empty() {
        Ok(())
    } else {
        Err(ctx.errors)
    }
}

fn validate_query(ctx: &mut ValidationContext, query: &Query, outer: &Scope, subquery: bool) {
    let first_columns = validate_single_query(ctx, &query.first, outer, subquery);
    if query.unions.is_empty() {
        return;
    }
    let first_all = query.unions[0].all;
    if query.unions.iter().any(|u| u.all != first_all) {
        ctx.structural("Invalid combination of UNION and UNION ALL");
    }
    for part in &query.unions {
        let columns = validate_single_query(ctx, &part.query, outer, subquery);
        if columns != first_columns {
            ctx.structural("All sub queries in an UNION must have the same return column names");
        }
    }
}

/// Validates one query part and returns its result columns
fn validate_single_query(
    ctx: &mut ValidationContext,
    query: &SingleQuery,
    outer: &Scope,
    subquery: bool,
) -> Vec<String> {
    let mut scope = outer.clone();
    let mut columns = Vec::new();
    let count = query.clauses.len();

    for (i, clause) in query.clauses.iter().enumerate() {
        let last = i + 1 == count;
        match clause {
            Clause::Return(projection) => {
                ctx.location = Some(projection.location);
                if !last {
                    ctx.structural("RETURN can only be used at the end of the query");
                }
                let (projected, names) = validate_projection(ctx, projection, &scope, false);
                columns = names;
                scope = projected;
            }
            Clause::With(projection) => {
                ctx.location = Some(projection.location);
                let (projected, _) = validate_projection(ctx, projection, &scope, true);
                scope = projected;
                if let Some(predicate) = &projection.where_clause {
                    validate_predicate(ctx, predicate, &scope);
                }
            }
            Clause::Call(call) => {
                ctx.location = Some(call.location);
                validate_call(ctx, call, &mut scope, last || subquery);
            }
            other => validate_clause(ctx, other, &mut scope),
        }
    }

    if !subquery {
        if let Some(last) = query.clauses.last() {
            let concludes = matches!(last, Clause::Return(_) | Clause::Call(_)) || last.is_updating();
            if !concludes {
                ctx.structural(format!(
                    "Query cannot conclude with {} (must be a RETURN clause, an update clause or a procedure call)",
                    last.name()
                ));
            }
        }
    }
    columns
}

fn validate_clause(ctx: &mut ValidationContext, clause: &Clause, scope: &mut Scope) {
    match clause {
        Clause::Match(m) => {
            ctx.location = Some(m.location);
            for pattern in &m.patterns {
                bind_path_pattern(scope, pattern);
            }
            for pattern in &m.patterns {
                validate_pattern_element(ctx, &pattern.element, scope);
                if pattern.kind != PathKind::Simple && pattern.element.chain.len() != 1 {
                    ctx.structural("shortestPath requires a pattern with exactly one relationship");
                }
            }
            if let Some(predicate) = &m.where_clause {
                validate_predicate(ctx, predicate, scope);
            }
        }
        Clause::Create(create) => {
            ctx.location = Some(create.location);
            for pattern in &create.patterns {
                check_creatable(ctx, &pattern.element, true);
                bind_path_pattern(scope, pattern);
            }
            for pattern in &create.patterns {
                validate_pattern_element(ctx, &pattern.element, scope);
            }
        }
        Clause::Merge(merge) => {
            ctx.location = Some(merge.location);
            check_creatable(ctx, &merge.pattern.element, false);
            bind_path_pattern(scope, &merge.pattern);
            validate_pattern_element(ctx, &merge.pattern.element, scope);
            for item in merge.on_create.iter().chain(&merge.on_match) {
                validate_set_item(ctx, item, scope);
            }
        }
        Clause::Set(set) => {
            ctx.location = Some(set.location);
            for item in &set.items {
                validate_set_item(ctx, item, scope);
            }
        }
        Clause::Remove(remove) => {
            ctx.location = Some(remove.location);
            for item in &remove.items {
                let variable = match item {
                    RemoveItem::Property { variable, .. } | RemoveItem::Labels { variable, .. } => {
                        variable
                    }
                };
                require_variable(ctx, variable, scope);
            }
        }
        Clause::Delete(delete) => {
            ctx.location = Some(delete.location);
            for expression in &delete.expressions {
                validate_expression(ctx, expression, scope);
            }
        }
        Clause::Unwind(unwind) => {
            ctx.location = Some(unwind.location);
            validate_expression(ctx, &unwind.expression, scope);
            scope.insert(unwind.variable.clone());
        }
        Clause::Foreach(foreach) => {
            ctx.location = Some(foreach.location);
            validate_expression(ctx, &foreach.list, scope);
            let mut inner = scope.clone();
            inner.insert(foreach.variable.clone());
            for clause in &foreach.body {
                if !clause.is_updating() {
                    ctx.structural(format!(
                        "{} is not allowed inside FOREACH; only updating clauses are",
                        clause.name()
                    ));
                    continue;
                }
                validate_clause(ctx, clause, &mut inner);
            }
        }
        Clause::Return(_) | Clause::With(_) | Clause::Call(_) => {}
    }
}

fn check_creatable(ctx: &mut ValidationContext, element: &PatternElement, directed: bool) {
    for relationship in element.relationships() {
        if relationship.types.len() != 1 {
            ctx.structural("Exactly one relationship type must be specified for CREATE and MERGE");
        }
        if relationship.length.is_some() {
            ctx.structural("Variable length relationships cannot be used in CREATE and MERGE");
        }
        if directed && relationship.direction == Direction::Both {
            ctx.structural("Only directed relationships are supported in CREATE");
        }
    }
}

fn bind_path_pattern(scope: &mut Scope, pattern: &PathPattern) {
    if let Some(path) = &pattern.variable {
        scope.insert(path.clone());
    }
    bind_pattern_element(scope, &pattern.element);
}

fn bind_pattern_element(scope: &mut Scope, element: &PatternElement) {
    for node in element.nodes() {
        if let Some(variable) = &node.variable {
            scope.insert(variable.clone());
        }
    }
    for relationship in element.relationships() {
        if let Some(variable) = &relationship.variable {
            scope.insert(variable.clone());
        }
    }
}

fn validate_pattern_element(ctx: &mut ValidationContext, element: &PatternElement, scope: &Scope) {
    for node in element.nodes() {
        if let Some(properties) = &node.properties {
            validate_expression(ctx, properties, scope);
        }
    }
    for relationship in element.relationships() {
        if let Some(properties) = &relationship.properties {
            validate_expression(ctx, properties, scope);
        }
        if let Some(LengthRange {
            min: Some(min),
            max: Some(max),
        }) = relationship.length
        {
            if min > max {
                ctx.structural(format!(
                    "Invalid variable length range *{}..{}: lower bound exceeds upper bound",
                    min, max
                ));
            }
        }
    }
}

fn validate_set_item(ctx: &mut ValidationContext, item: &SetItem, scope: &Scope) {
    require_variable(ctx, item.variable(), scope);
    match item {
        SetItem::Property { value, .. }
        | SetItem::Replace { value, .. }
        | SetItem::Merge { value, .. } => validate_expression(ctx, value, scope),
        SetItem::Labels { .. } => {}
    }
}

fn require_variable(ctx: &mut ValidationContext, variable: &str, scope: &Scope) {
    if !scope.contains(variable) {
        ctx.semantic(format!("Variable `{}` not defined", variable));
    }
}

/// Returns the scope after the projection and its column names
fn validate_projection(
    ctx: &mut ValidationContext,
    projection: &ProjectionClause,
    scope: &Scope,
    is_with: bool,
) -> (Scope, Vec<String>) {
    let mut projected = Scope::new();
    let mut columns = Vec::new();
    if projection.star {
        if scope.is_empty() {
            ctx.structural("RETURN * is not allowed when there are no variables in scope");
        }
        let mut names: Vec<&String> = scope.iter().collect();
        names.sort();
        for name in names {
            projected.insert(name.clone());
            columns.push(name.clone());
        }
    }
    for item in &projection.items {
        validate_expression(ctx, &item.expression, scope);
        if is_with
            && item.alias.is_none()
            && !matches!(item.expression, Expression::Variable(_))
        {
            ctx.structural(format!(
                "Expression in WITH must be aliased (use AS): {}",
                item.text
            ));
        }
        let name = item.column_name().to_string();
        if columns.contains(&name) {
            ctx.structural(format!(
                "Multiple result columns with the same name `{}` are not supported",
                name
            ));
        }
        projected.insert(name.clone());
        columns.push(name);
    }

    // ORDER BY sees both the projection and the incoming scope
    let mut sort_scope = scope.clone();
    sort_scope.extend(projected.iter().cloned());
    for sort in &projection.order_by {
        validate_expression(ctx, &sort.expression, &sort_scope);
    }
    for bound in projection.skip.iter().chain(projection.limit.iter()) {
        validate_expression(ctx, bound, &Scope::new());
    }
    (projected, columns)
}

fn validate_call(ctx: &mut ValidationContext, call: &CallClause, scope: &mut Scope, last: bool) {
    if !(ctx.settings.is_known_procedure)(&call.procedure) {
        ctx.semantic(format!(
            "There is no procedure with the name `{}` registered",
            call.procedure
        ));
    }
    for argument in &call.arguments {
        validate_expression(ctx, argument, scope);
    }
    match &call.yield_items {
        None if !last => {
            ctx.structural(format!(
                "Procedure call inside a query does not support naming results implicitly (add YIELD to CALL {})",
                call.procedure
            ));
        }
        None => {}
        Some(YieldItems::All) => {}
        Some(YieldItems::Items(items)) => {
            for item in items {
                scope.insert(item.variable().to_string());
            }
        }
    }
    if let Some(predicate) = &call.where_clause {
        validate_predicate(ctx, predicate, scope);
    }
}

fn validate_predicate(ctx: &mut ValidationContext, predicate: &Expression, scope: &Scope) {
    if predicate.contains_aggregate() {
        ctx.semantic("Invalid use of aggregating function in this context (WHERE)");
    }
    validate_expression(ctx, predicate, scope);
}

fn validate_expression(ctx: &mut ValidationContext, expression: &Expression, scope: &Scope) {
    match expression {
        Expression::Literal(_) | Expression::CountStar => {}
        Expression::Parameter(name) => {
            if let Some(parameters) = ctx.settings.parameters {
                if !parameters.contains(name) {
                    ctx.semantic(format!("Expected parameter(s): {}", name));
                }
            }
        }
        Expression::Variable(name) => require_variable(ctx, name, scope),
        Expression::Property(target, _) | Expression::HasLabels(target, _) => {
            validate_expression(ctx, target, scope)
        }
        Expression::Index(target, index) => {
            validate_expression(ctx, target, scope);
            validate_expression(ctx, index, scope);
        }
        Expression::Slice { target, from, to } => {
            validate_expression(ctx, target, scope);
            for bound in from.iter().chain(to.iter()) {
                validate_expression(ctx, bound, scope);
            }
        }
        Expression::List(items) => {
            for item in items {
                validate_expression(ctx, item, scope);
            }
        }
        Expression::Map(entries) => {
            for (_, value) in entries {
                validate_expression(ctx, value, scope);
            }
        }
        Expression::Unary(_, operand) => validate_expression(ctx, operand, scope),
        Expression::Binary(_, left, right) => {
            validate_expression(ctx, left, scope);
            validate_expression(ctx, right, scope);
        }
        Expression::IsNull { expression, .. } => validate_expression(ctx, expression, scope),
        Expression::FunctionCall {
            name, arguments, ..
        } => {
            if !is_aggregate_function(name) && !(ctx.settings.is_known_function)(name) {
                ctx.semantic(format!("Unknown function '{}'", name));
            }
            if is_aggregate_function(name)
                && arguments.iter().any(|a| a.contains_aggregate())
            {
                ctx.semantic("Can't use aggregate functions inside of aggregate functions");
            }
            for argument in arguments {
                validate_expression(ctx, argument, scope);
            }
        }
        Expression::Case {
            operand,
            alternatives,
            default,
        } => {
            if let Some(operand) = operand {
                validate_expression(ctx, operand, scope);
            }
            for (when, then) in alternatives {
                validate_expression(ctx, when, scope);
                validate_expression(ctx, then, scope);
            }
            if let Some(default) = default {
                validate_expression(ctx, default, scope);
            }
        }
        Expression::ListComprehension {
            variable,
            list,
            predicate,
            projection,
        } => {
            validate_expression(ctx, list, scope);
            let mut inner = scope.clone();
            inner.insert(variable.clone());
            for e in predicate.iter().chain(projection.iter()) {
                validate_expression(ctx, e, &inner);
            }
        }
        Expression::Quantified {
            variable,
            list,
            predicate,
            ..
        } => {
            validate_expression(ctx, list, scope);
            let mut inner = scope.clone();
            inner.insert(variable.clone());
            validate_expression(ctx, predicate, &inner);
        }
        Expression::MapProjection { variable, items } => {
            require_variable(ctx, variable, scope);
            for item in items {
                match item {
                    MapProjectionItem::Literal(_, value) => validate_expression(ctx, value, scope),
                    MapProjectionItem::Variable(name) => require_variable(ctx, name, scope),
                    MapProjectionItem::Property(_) | MapProjectionItem::AllProperties => {}
                }
            }
        }
        Expression::PatternPredicate(element) => {
            // Unbound pattern variables are matched existentially
            let mut inner = scope.clone();
            bind_pattern_element(&mut inner, element);
            validate_pattern_element(ctx, element, &inner);
        }
        Expression::Exists(query) | Expression::CountSubquery(query) => {
            let location = ctx.location;
            validate_query(ctx, query, scope, true);
            ctx.location = location;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::parse_query;

    fn known_function(name: &str) -> bool {
        ["toUpper", "size", "coalesce", "range"]
            .iter()
            .any(|f| f.eq_ignore_ascii_case(name))
    }

    fn known_procedure(name: &str) -> bool {
        name == "db.labels"
    }

    fn check(query: &str, parameters: Option<&HashSet<String>>) -> Result<(), Vec<ValidationError>> {
        let document = parse_query(query).unwrap();
        let settings = ValidationSettings {
            is_known_function: &known_function,
            is_known_procedure: &known_procedure,
            parameters,
        };
        validate_statement(&document.statement, &settings)
    }

    fn first_error(query: &str) -> ValidationError {
        check(query, None).unwrap_err().remove(0)
    }

    #[test]
    fn test_valid_queries() {
        for query in [
            "MATCH (a)-[r:KNOWS]->(b) WHERE a.x > 1 RETURN a, r, b",
            "MATCH (n) WITH n, count(*) AS c WHERE c > 1 RETURN n ORDER BY n.name",
            "UNWIND [1, 2] AS x RETURN [y IN range(1, x) WHERE y > 0 | y * 2] AS ys",
            "MATCH (a) WHERE EXISTS { (a)-[:KNOWS]->(b) WHERE b.age > a.age } RETURN a",
            "MATCH (a) WHERE (a)-->(:Person) RETURN a {.name, extra: 1}",
            "CREATE (a:Person {name: 'A'})-[:KNOWS]->(b:Person) RETURN a, b",
            "MATCH (a) FOREACH (x IN [1] | SET a.v = x)",
            "CALL db.labels()",
            "CALL db.labels() YIELD label RETURN label",
            "MATCH (n) RETURN n.a AS a UNION MATCH (m) RETURN m.b AS a",
        ] {
            assert!(check(query, None).is_ok(), "expected valid: {}", query);
        }
    }

    #[test]
    fn test_unbound_variable() {
        let err = first_error("MATCH (a) RETURN b");
        assert_eq!(err.error_type, ValidationErrorType::Semantic);
        assert!(err.message.contains("`b` not defined"));

        // WITH replaces the scope
        let err = first_error("MATCH (a), (b) WITH a RETURN b");
        assert!(err.message.contains("`b`"));
    }

    #[test]
    fn test_unknown_function_and_procedure() {
        let err = first_error("RETURN noSuchFn(1) AS x");
        assert!(err.message.contains("Unknown function 'noSuchFn'"));
        let err = first_error("CALL db.nothing()");
        assert!(err.message.contains("db.nothing"));
    }

    #[test]
    fn test_structure_rules() {
        assert!(first_error("MATCH (n) RETURN n MATCH (m) RETURN m")
            .message
            .contains("RETURN can only be used at the end"));
        assert!(first_error("MATCH (n) WITH n.name RETURN 1 AS one")
            .message
            .contains("must be aliased"));
        assert!(first_error("MATCH (n)").message.contains("cannot conclude with MATCH"));
        assert!(first_error("CREATE (a)-[:R|S]->(b)")
            .message
            .contains("Exactly one relationship type"));
        assert!(first_error("CREATE (a)-[:R]-(b)")
            .message
            .contains("directed"));
        assert!(first_error("MATCH (n) WHERE count(n) > 1 RETURN n")
            .message
            .contains("aggregating"));
        assert!(
            first_error("MATCH (n) RETURN n.a AS a UNION MATCH (m) RETURN m.a AS b")
                .message
                .contains("same return column names")
        );
    }

    #[test]
    fn test_parameters() {
        let mut supplied = HashSet::new();
        supplied.insert("name".to_string());
        assert!(check("MATCH (n {name: $name}) RETURN n", Some(&supplied)).is_ok());
        let errors = check("MATCH (n) WHERE n.age > $age RETURN n", Some(&supplied)).unwrap_err();
        assert!(errors[0].message.contains("age"));

        // EXPLAIN does not need parameter values
        assert!(check("EXPLAIN MATCH (n) WHERE n.age > $age RETURN n", Some(&supplied)).is_ok());
    }

    #[test]
    fn test_error_carries_clause_location() {
        let err = first_error("MATCH (a)\nRETURN b");
        assert_eq!(err.location.map(|l| (l.line, l.column)), Some((2, 1)));
    }
}
