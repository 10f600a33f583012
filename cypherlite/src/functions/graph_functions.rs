// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph-specific functions
//!
//! This module implements the entity functions: id, elementId, labels, type,
//! properties, keys, startNode, endNode, nodes, relationships and length.
//! startNode and endNode resolve the endpoint through the graph view, so they
//! see nodes created earlier in the same transaction.

use std::collections::BTreeMap;

use super::function_trait::{Function, FunctionContext, FunctionError, FunctionResult};
use crate::storage::Value;

// ==============================================================================
// ID / ELEMENTID FUNCTIONS
// ==============================================================================

/// id and elementId - the entity identifier as a string
#[derive(Debug)]
pub struct IdFunction {
    name: &'static str,
}

impl IdFunction {
    pub fn id() -> Self {
        Self { name: "id" }
    }

    pub fn element_id() -> Self {
        Self { name: "elementId" }
    }
}

impl Function for IdFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Returns the identifier of a node or relationship"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn return_type(&self) -> &str {
        "String"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        match context.get_argument(0)? {
            Value::Null => Ok(Value::Null),
            Value::Node(node) => Ok(Value::String(node.id.clone())),
            Value::Edge(edge) => Ok(Value::String(edge.id.clone())),
            other => Err(FunctionError::argument_type(
                self.name,
                "a node or relationship",
                other,
            )),
        }
    }
}

// ==============================================================================
// LABELS FUNCTION
// ==============================================================================

/// labels function - returns list of node labels
#[derive(Debug)]
pub struct LabelsFunction;

impl LabelsFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for LabelsFunction {
    fn name(&self) -> &str {
        "labels"
    }

    fn description(&self) -> &str {
        "Returns a list of labels for a node"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn return_type(&self) -> &str {
        "List<String>"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        match context.get_argument(0)? {
            Value::Null => Ok(Value::Null),
            Value::Node(node) => Ok(Value::List(
                node.labels.iter().cloned().map(Value::String).collect(),
            )),
            other => Err(FunctionError::argument_type(self.name(), "a node", other)),
        }
    }
}

// ==============================================================================
// TYPE FUNCTION
// ==============================================================================

/// type function - returns the relationship type
#[derive(Debug)]
pub struct TypeFunction;

impl TypeFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for TypeFunction {
    fn name(&self) -> &str {
        "type"
    }

    fn description(&self) -> &str {
        "Returns the type of a relationship"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn return_type(&self) -> &str {
        "String"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        match context.get_argument(0)? {
            Value::Null => Ok(Value::Null),
            Value::Edge(edge) => Ok(Value::String(edge.rel_type.clone())),
            other => Err(FunctionError::argument_type(
                self.name(),
                "a relationship",
                other,
            )),
        }
    }
}

// ==============================================================================
// PROPERTIES / KEYS FUNCTIONS
// ==============================================================================

fn property_map(function: &str, value: &Value) -> FunctionResult<Option<BTreeMap<String, Value>>> {
    match value {
        Value::Null => Ok(None),
        Value::Node(node) => Ok(Some(
            node.properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )),
        Value::Edge(edge) => Ok(Some(
            edge.properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )),
        Value::Map(map) => Ok(Some(map.clone())),
        other => Err(FunctionError::argument_type(
            function,
            "a node, relationship or map",
            other,
        )),
    }
}

/// properties function - returns the property map of an entity
#[derive(Debug)]
pub struct PropertiesFunction;

impl PropertiesFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for PropertiesFunction {
    fn name(&self) -> &str {
        "properties"
    }

    fn description(&self) -> &str {
        "Returns a map containing all properties of a node or relationship"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn return_type(&self) -> &str {
        "Map"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        Ok(property_map(self.name(), context.get_argument(0)?)?
            .map(Value::Map)
            .unwrap_or(Value::Null))
    }
}

/// keys function - returns sorted property names
#[derive(Debug)]
pub struct KeysFunction;

impl KeysFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for KeysFunction {
    fn name(&self) -> &str {
        "keys"
    }

    fn description(&self) -> &str {
        "Returns the property names of a node, relationship or map"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn return_type(&self) -> &str {
        "List<String>"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        Ok(property_map(self.name(), context.get_argument(0)?)?
            .map(|map| Value::List(map.into_keys().map(Value::String).collect()))
            .unwrap_or(Value::Null))
    }
}

// ==============================================================================
// STARTNODE / ENDNODE FUNCTIONS
// ==============================================================================

/// startNode and endNode - resolve a relationship endpoint
#[derive(Debug)]
pub struct EndpointFunction {
    start: bool,
}

impl EndpointFunction {
    pub fn start_node() -> Self {
        Self { start: true }
    }

    pub fn end_node() -> Self {
        Self { start: false }
    }
}

impl Function for EndpointFunction {
    fn name(&self) -> &str {
        if self.start {
            "startNode"
        } else {
            "endNode"
        }
    }

    fn description(&self) -> &str {
        "Returns the start or end node of a relationship"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn return_type(&self) -> &str {
        "Node"
    }

    fn graph_context_required(&self) -> bool {
        true
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        let edge = match context.get_argument(0)? {
            Value::Null => return Ok(Value::Null),
            Value::Edge(edge) => edge,
            other => {
                return Err(FunctionError::argument_type(
                    self.name(),
                    "a relationship",
                    other,
                ))
            }
        };
        let graph = context.graph.ok_or_else(|| FunctionError::ExecutionError {
            message: format!("{}() requires a graph context", self.name()),
        })?;
        let node_id = if self.start {
            &edge.from_node
        } else {
            &edge.to_node
        };
        Ok(graph
            .node(node_id)
            .map(|node| Value::Node(node.clone()))
            .unwrap_or(Value::Null))
    }
}

// ==============================================================================
// PATH FUNCTIONS
// ==============================================================================

/// nodes(path) - the nodes along a path
#[derive(Debug)]
pub struct NodesFunction;

impl NodesFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for NodesFunction {
    fn name(&self) -> &str {
        "nodes"
    }

    fn description(&self) -> &str {
        "Returns the nodes of a path in order"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn return_type(&self) -> &str {
        "List<Node>"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        match context.get_argument(0)? {
            Value::Null => Ok(Value::Null),
            Value::Path(path) => Ok(Value::List(
                path.nodes.iter().cloned().map(Value::Node).collect(),
            )),
            other => Err(FunctionError::argument_type(self.name(), "a path", other)),
        }
    }
}

/// relationships(path) - the relationships along a path
#[derive(Debug)]
pub struct RelationshipsFunction;

impl RelationshipsFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for RelationshipsFunction {
    fn name(&self) -> &str {
        "relationships"
    }

    fn description(&self) -> &str {
        "Returns the relationships of a path in order"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn return_type(&self) -> &str {
        "List<Relationship>"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        match context.get_argument(0)? {
            Value::Null => Ok(Value::Null),
            Value::Path(path) => Ok(Value::List(
                path.edges.iter().cloned().map(Value::Edge).collect(),
            )),
            other => Err(FunctionError::argument_type(self.name(), "a path", other)),
        }
    }
}

/// length(path) - number of relationships in a path
#[derive(Debug)]
pub struct LengthFunction;

impl LengthFunction {
    pub fn new() -> Self {
        Self
    }
}

impl Function for LengthFunction {
    fn name(&self) -> &str {
        "length"
    }

    fn description(&self) -> &str {
        "Returns the number of relationships in a path"
    }

    fn argument_count(&self) -> usize {
        1
    }

    fn return_type(&self) -> &str {
        "Integer"
    }

    fn execute(&self, context: &FunctionContext) -> FunctionResult<Value> {
        match context.get_argument(0)? {
            Value::Null => Ok(Value::Null),
            Value::Path(path) => Ok(Value::Integer(path.length() as i64)),
            Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
            Value::List(items) => Ok(Value::Integer(items.len() as i64)),
            other => Err(FunctionError::argument_type(self.name(), "a path", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Edge, Node, PathValue};

    fn person(id: &str) -> Node {
        let mut node = Node::with_labels(id.to_string(), vec!["Person".to_string()]);
        node.set_property("name".to_string(), Value::from(id));
        node.set_property("age".to_string(), Value::Integer(30));
        node
    }

    fn call(function: &dyn Function, args: Vec<Value>) -> FunctionResult<Value> {
        function.execute(&FunctionContext::new(args))
    }

    #[test]
    fn test_entity_accessors() {
        let node = Value::Node(person("a"));
        assert_eq!(call(&IdFunction::id(), vec![node.clone()]).unwrap(), Value::from("a"));
        assert_eq!(
            call(&LabelsFunction::new(), vec![node.clone()]).unwrap(),
            Value::List(vec![Value::from("Person")])
        );
        assert_eq!(
            call(&KeysFunction::new(), vec![node.clone()]).unwrap(),
            Value::List(vec![Value::from("age"), Value::from("name")])
        );
        let edge = Edge::new("e1".into(), "a".into(), "b".into(), "KNOWS".into());
        assert_eq!(
            call(&TypeFunction::new(), vec![Value::Edge(edge)]).unwrap(),
            Value::from("KNOWS")
        );
        assert!(call(&TypeFunction::new(), vec![node]).is_err());
    }

    #[test]
    fn test_path_functions() {
        let mut path = PathValue::new(person("a"));
        path.push(
            Edge::new("e1".into(), "a".into(), "b".into(), "KNOWS".into()),
            person("b"),
        );
        let path = Value::Path(path);
        assert_eq!(call(&LengthFunction::new(), vec![path.clone()]).unwrap(), Value::Integer(1));
        assert_eq!(
            call(&NodesFunction::new(), vec![path.clone()])
                .unwrap()
                .as_list()
                .map(Vec::len),
            Some(2)
        );
        assert_eq!(
            call(&RelationshipsFunction::new(), vec![path])
                .unwrap()
                .as_list()
                .map(Vec::len),
            Some(1)
        );
    }

    #[test]
    fn test_endpoint_requires_graph() {
        let edge = Value::Edge(Edge::new("e1".into(), "a".into(), "b".into(), "KNOWS".into()));
        assert!(call(&EndpointFunction::start_node(), vec![edge]).is_err());
        assert_eq!(
            call(&EndpointFunction::end_node(), vec![Value::Null]).unwrap(),
            Value::Null
        );
    }
}
