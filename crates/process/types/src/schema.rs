//! Attribute schema engine
//!
//! Resolves a model's flat [`AttributeDefinition`] list into a [`SchemaTree`]
//! and validates instance data against it.
//!
//! Nested fields form a containment graph that must be acyclic. References
//! may point back at an enclosing record to describe recursive data, but only
//! when the cycle goes through exactly one reference; longer reference cycles
//! are rejected.

use crate::{
    AttributeDefinition, AttributeId, AttributeKind, AttributeValue, SchemaError,
    SchemaViolation, ViolationReason,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Default maximum nesting depth for schemas and values
pub const DEFAULT_MAX_DEPTH: usize = 8;

static NULL: AttributeValue = AttributeValue::Null;

/// Limits applied when building and validating schemas
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaPolicy {
    /// Deepest allowed nesting, counting the root attribute as level 1
    pub max_depth: usize,
}

impl Default for SchemaPolicy {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// A resolved attribute schema tree
#[derive(Clone, Debug, Default, Serialize)]
pub struct SchemaTree {
    roots: Vec<AttributeId>,
    nodes: BTreeMap<AttributeId, AttributeDefinition>,
    max_depth: usize,
}

impl SchemaTree {
    /// Top-level attributes: those not contained as a field of any record
    pub fn roots(&self) -> &[AttributeId] {
        &self.roots
    }

    pub fn get(&self, id: &AttributeId) -> Option<&AttributeDefinition> {
        self.nodes.get(id)
    }

    pub fn is_root(&self, id: &AttributeId) -> bool {
        self.roots.contains(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Expanded view of the tree for task listings. Recursive references are
    /// shown once and marked instead of being expanded again.
    pub fn describe(&self) -> Vec<SchemaNode> {
        let mut path = Vec::new();
        self.roots
            .iter()
            .filter_map(|id| self.describe_node(id, &mut path))
            .collect()
    }

    fn describe_node(&self, id: &AttributeId, path: &mut Vec<AttributeId>) -> Option<SchemaNode> {
        let def = self.nodes.get(id)?;
        let mut node = SchemaNode {
            id: def.id.clone(),
            name: def.name.clone(),
            kind: def.kind.clone(),
            required: def.required,
            read_only: def.read_only,
            children: Vec::new(),
            recursive: false,
        };

        path.push(id.clone());
        match &def.kind {
            AttributeKind::Simple(_) => {}
            AttributeKind::Nested { fields } => {
                node.children = fields
                    .iter()
                    .filter_map(|f| self.describe_node(f, path))
                    .collect();
            }
            AttributeKind::Reference { target } => {
                if path.contains(target) {
                    node.recursive = true;
                } else if let Some(child) = self.describe_node(target, path) {
                    node.children.push(child);
                }
            }
        }
        path.pop();

        Some(node)
    }
}

/// One node of an expanded schema tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaNode {
    pub id: AttributeId,
    pub name: String,
    pub kind: AttributeKind,
    pub required: bool,
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SchemaNode>,
    /// Reference back to an enclosing record
    #[serde(default)]
    pub recursive: bool,
}

/// Edge kinds walked while expanding the tree
#[derive(Clone, Copy, PartialEq, Eq)]
enum Edge {
    Field,
    Reference,
}

/// Builds schema trees and validates instance data against them
#[derive(Clone, Debug, Default)]
pub struct AttributeSchemaEngine {
    policy: SchemaPolicy,
}

impl AttributeSchemaEngine {
    pub fn new(policy: SchemaPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SchemaPolicy {
        &self.policy
    }

    /// Resolve attribute definitions into a tree.
    pub fn build(&self, definitions: &[AttributeDefinition]) -> Result<SchemaTree, SchemaError> {
        let mut nodes = BTreeMap::new();
        for def in definitions {
            if nodes.insert(def.id.clone(), def.clone()).is_some() {
                return Err(SchemaError::DuplicateAttribute(def.id.clone()));
            }
        }

        for def in definitions {
            match &def.kind {
                AttributeKind::Simple(_) => {}
                AttributeKind::Nested { fields } => {
                    if let Some(missing) = fields.iter().find(|f| !nodes.contains_key(*f)) {
                        return Err(SchemaError::UnresolvedReference {
                            attribute: def.id.clone(),
                            target: missing.clone(),
                        });
                    }
                }
                AttributeKind::Reference { target } => {
                    if !nodes.contains_key(target) {
                        return Err(SchemaError::UnresolvedReference {
                            attribute: def.id.clone(),
                            target: target.clone(),
                        });
                    }
                    if target == &def.id {
                        return Err(SchemaError::CyclicReference(vec![def.id.clone()]));
                    }
                }
            }
        }

        check_nesting(definitions, &nodes)?;

        let contained: HashSet<&AttributeId> = definitions
            .iter()
            .filter_map(|d| match &d.kind {
                AttributeKind::Nested { fields } => Some(fields.iter()),
                _ => None,
            })
            .flatten()
            .collect();
        let roots: Vec<AttributeId> = definitions
            .iter()
            .filter(|d| !contained.contains(&d.id))
            .map(|d| d.id.clone())
            .collect();

        let tree = SchemaTree {
            roots,
            nodes,
            max_depth: self.policy.max_depth,
        };

        // Walk every root so reference cycles and depth are checked
        let mut nodes_on_path = Vec::new();
        let mut edges_on_path = Vec::new();
        for root in &tree.roots {
            self.expand(&tree, root, 1, &mut nodes_on_path, &mut edges_on_path)?;
        }

        Ok(tree)
    }

    fn expand(
        &self,
        tree: &SchemaTree,
        id: &AttributeId,
        depth: usize,
        nodes_on_path: &mut Vec<AttributeId>,
        edges_on_path: &mut Vec<Edge>,
    ) -> Result<(), SchemaError> {
        if depth > self.policy.max_depth {
            return Err(SchemaError::DepthExceeded {
                attribute: id.clone(),
                depth,
                limit: self.policy.max_depth,
            });
        }
        let Some(def) = tree.nodes.get(id) else {
            return Ok(());
        };

        let children: Vec<(&AttributeId, Edge)> = match &def.kind {
            AttributeKind::Simple(_) => Vec::new(),
            AttributeKind::Nested { fields } => fields.iter().map(|f| (f, Edge::Field)).collect(),
            AttributeKind::Reference { target } => vec![(target, Edge::Reference)],
        };

        nodes_on_path.push(id.clone());
        for (child, edge) in children {
            if let Some(pos) = nodes_on_path.iter().position(|n| n == child) {
                // Back edge: the cycle is nodes_on_path[pos..] plus this edge
                let references = edges_on_path[pos..]
                    .iter()
                    .chain(std::iter::once(&edge))
                    .filter(|e| **e == Edge::Reference)
                    .count();
                if references == 1 {
                    continue;
                }
                let mut cycle = nodes_on_path[pos..].to_vec();
                cycle.push(child.clone());
                nodes_on_path.pop();
                return Err(SchemaError::CyclicReference(cycle));
            }

            edges_on_path.push(edge);
            let result = self.expand(tree, child, depth + 1, nodes_on_path, edges_on_path);
            edges_on_path.pop();
            if let Err(e) = result {
                nodes_on_path.pop();
                return Err(e);
            }
        }
        nodes_on_path.pop();

        Ok(())
    }

    /// Validate candidate instance data.
    ///
    /// `candidate` is the full data after applying updates; `previous` is the
    /// committed data before them, used for read-only checks. Every violation
    /// found is returned.
    pub fn validate(
        &self,
        tree: &SchemaTree,
        candidate: &BTreeMap<AttributeId, AttributeValue>,
        previous: &BTreeMap<AttributeId, AttributeValue>,
    ) -> Result<(), Vec<SchemaViolation>> {
        let mut violations = Vec::new();

        for key in candidate.keys() {
            if !tree.is_root(key) {
                violations.push(SchemaViolation::new(
                    key.clone(),
                    ViolationReason::UnknownAttribute,
                ));
            }
        }

        for root in &tree.roots {
            let value = candidate.get(root).unwrap_or(&NULL);
            self.check(tree, root, value, previous.get(root), 1, &mut violations);
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    fn check(
        &self,
        tree: &SchemaTree,
        id: &AttributeId,
        value: &AttributeValue,
        previous: Option<&AttributeValue>,
        depth: usize,
        out: &mut Vec<SchemaViolation>,
    ) {
        let Some(def) = tree.get(id) else {
            out.push(SchemaViolation::new(id.clone(), ViolationReason::UnknownAttribute));
            return;
        };
        if depth > self.policy.max_depth {
            if !value.is_null() {
                out.push(SchemaViolation::new(
                    id.clone(),
                    ViolationReason::DepthExceeded(self.policy.max_depth),
                ));
            }
            return;
        }

        if def.read_only {
            if let Some(prev) = previous.filter(|p| !p.is_null()) {
                if prev != value {
                    out.push(SchemaViolation::new(id.clone(), ViolationReason::ReadOnly));
                    return;
                }
            }
        }

        if value.is_null() {
            if def.required {
                out.push(SchemaViolation::new(id.clone(), ViolationReason::Required));
            }
            return;
        }

        self.check_shape(tree, id, &def.kind, value, previous, depth, out);
    }

    /// Check a non-null value against `kind`, reporting under `id`.
    /// References are followed to their target's shape.
    #[allow(clippy::too_many_arguments)]
    fn check_shape(
        &self,
        tree: &SchemaTree,
        id: &AttributeId,
        kind: &AttributeKind,
        value: &AttributeValue,
        previous: Option<&AttributeValue>,
        depth: usize,
        out: &mut Vec<SchemaViolation>,
    ) {
        match kind {
            AttributeKind::Simple(expected) => match value {
                AttributeValue::Scalar(s) if s.conforms_to(*expected) => {}
                other => out.push(SchemaViolation::new(
                    id.clone(),
                    ViolationReason::TypeMismatch {
                        expected: *expected,
                        actual: other.shape(),
                    },
                )),
            },
            AttributeKind::Nested { fields } => {
                let AttributeValue::Record(record) = value else {
                    out.push(SchemaViolation::new(
                        id.clone(),
                        ViolationReason::NotARecord(value.shape()),
                    ));
                    return;
                };
                let previous_record = match previous {
                    Some(AttributeValue::Record(r)) => Some(r),
                    _ => None,
                };

                for key in record.keys().filter(|k| !fields.contains(k)) {
                    out.push(SchemaViolation::new(
                        key.clone(),
                        ViolationReason::UnknownAttribute,
                    ));
                }
                for field in fields {
                    let child = record.get(field).unwrap_or(&NULL);
                    let prev = previous_record.and_then(|r| r.get(field));
                    self.check(tree, field, child, prev, depth + 1, out);
                }
            }
            AttributeKind::Reference { target } => {
                if depth + 1 > self.policy.max_depth {
                    out.push(SchemaViolation::new(
                        id.clone(),
                        ViolationReason::DepthExceeded(self.policy.max_depth),
                    ));
                    return;
                }
                let Some(target_def) = tree.get(target) else {
                    out.push(SchemaViolation::new(
                        target.clone(),
                        ViolationReason::UnknownAttribute,
                    ));
                    return;
                };
                self.check_shape(tree, id, &target_def.kind, value, previous, depth + 1, out);
            }
        }
    }
}

/// Containment (nested field) edges must be acyclic
fn check_nesting(
    definitions: &[AttributeDefinition],
    nodes: &BTreeMap<AttributeId, AttributeDefinition>,
) -> Result<(), SchemaError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        id: &'a AttributeId,
        nodes: &'a BTreeMap<AttributeId, AttributeDefinition>,
        marks: &mut HashMap<&'a AttributeId, Mark>,
    ) -> Result<(), SchemaError> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(SchemaError::CyclicNesting(id.clone())),
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        if let Some(AttributeKind::Nested { fields }) = nodes.get(id).map(|d| &d.kind) {
            for field in fields {
                visit(field, nodes, marks)?;
            }
        }
        marks.insert(id, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    for def in definitions {
        visit(&def.id, nodes, &mut marks)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScalarType;

    fn engine() -> AttributeSchemaEngine {
        AttributeSchemaEngine::default()
    }

    fn data(pairs: Vec<(&str, AttributeValue)>) -> BTreeMap<AttributeId, AttributeValue> {
        pairs
            .into_iter()
            .map(|(k, v)| (AttributeId::new(k), v))
            .collect()
    }

    fn person_schema() -> Vec<AttributeDefinition> {
        vec![
            AttributeDefinition::nested("person", ["full_name", "manager"]),
            AttributeDefinition::simple("full_name", ScalarType::Text).required(),
            AttributeDefinition::reference("manager", "person"),
        ]
    }

    #[test]
    fn test_roots_exclude_nested_fields() {
        let defs = vec![
            AttributeDefinition::simple("amount", ScalarType::Number),
            AttributeDefinition::nested("trip", ["from", "to"]),
            AttributeDefinition::simple("from", ScalarType::Text),
            AttributeDefinition::simple("to", ScalarType::Text),
        ];
        let tree = engine().build(&defs).unwrap();
        assert_eq!(tree.roots(), &[AttributeId::new("amount"), AttributeId::new("trip")]);
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        let defs = vec![
            AttributeDefinition::simple("a", ScalarType::Text),
            AttributeDefinition::simple("a", ScalarType::Integer),
        ];
        assert_eq!(
            engine().build(&defs).unwrap_err(),
            SchemaError::DuplicateAttribute(AttributeId::new("a"))
        );
    }

    #[test]
    fn test_unresolved_field_rejected() {
        let defs = vec![AttributeDefinition::nested("trip", ["from"])];
        assert_eq!(
            engine().build(&defs).unwrap_err(),
            SchemaError::UnresolvedReference {
                attribute: AttributeId::new("trip"),
                target: AttributeId::new("from"),
            }
        );
    }

    #[test]
    fn test_cyclic_nesting_rejected() {
        let defs = vec![
            AttributeDefinition::nested("a", ["b"]),
            AttributeDefinition::nested("b", ["a"]),
        ];
        assert!(matches!(
            engine().build(&defs),
            Err(SchemaError::CyclicNesting(_))
        ));
    }

    #[test]
    fn test_single_reference_recursion_allowed() {
        let tree = engine().build(&person_schema()).unwrap();
        assert_eq!(tree.roots(), &[AttributeId::new("person")]);

        let described = tree.describe();
        let manager = &described[0].children[1];
        assert_eq!(manager.id, AttributeId::new("manager"));
        assert!(manager.recursive);
        assert!(manager.children.is_empty());
    }

    #[test]
    fn test_reference_chain_cycle_rejected() {
        let defs = vec![
            AttributeDefinition::reference("a", "b"),
            AttributeDefinition::reference("b", "a"),
        ];
        assert!(matches!(
            engine().build(&defs),
            Err(SchemaError::CyclicReference(cycle)) if cycle.len() == 3
        ));
    }

    #[test]
    fn test_self_reference_rejected() {
        let defs = vec![AttributeDefinition::reference("a", "a")];
        assert_eq!(
            engine().build(&defs).unwrap_err(),
            SchemaError::CyclicReference(vec![AttributeId::new("a")])
        );
    }

    #[test]
    fn test_depth_limit_enforced() {
        let defs = vec![
            AttributeDefinition::nested("l1", ["l2"]),
            AttributeDefinition::nested("l2", ["l3"]),
            AttributeDefinition::simple("l3", ScalarType::Text),
        ];
        let shallow = AttributeSchemaEngine::new(SchemaPolicy { max_depth: 2 });
        assert_eq!(
            shallow.build(&defs).unwrap_err(),
            SchemaError::DepthExceeded {
                attribute: AttributeId::new("l3"),
                depth: 3,
                limit: 2,
            }
        );
        assert!(engine().build(&defs).is_ok());
    }

    #[test]
    fn test_validate_collects_all_violations() {
        let defs = vec![
            AttributeDefinition::simple("amount", ScalarType::Number).required(),
            AttributeDefinition::simple("approved", ScalarType::Boolean),
            AttributeDefinition::simple("ref", ScalarType::Text).read_only(),
        ];
        let tree = engine().build(&defs).unwrap();
        let previous = data(vec![("ref", AttributeValue::text("T-1"))]);
        let candidate = data(vec![
            ("approved", AttributeValue::text("yes")),
            ("extra", AttributeValue::integer(1)),
            ("ref", AttributeValue::text("T-2")),
        ]);

        let violations = engine()
            .validate(&tree, &candidate, &previous)
            .unwrap_err();
        assert_eq!(violations.len(), 4);
        assert!(violations.contains(&SchemaViolation::new(
            AttributeId::new("ref"),
            ViolationReason::ReadOnly
        )));
        assert!(violations.contains(&SchemaViolation::new(
            AttributeId::new("amount"),
            ViolationReason::Required
        )));
        assert!(violations.contains(&SchemaViolation::new(
            AttributeId::new("extra"),
            ViolationReason::UnknownAttribute
        )));
        assert!(violations.contains(&SchemaViolation::new(
            AttributeId::new("approved"),
            ViolationReason::TypeMismatch {
                expected: ScalarType::Boolean,
                actual: "text".into(),
            }
        )));
    }

    #[test]
    fn test_read_only_cannot_change_once_set() {
        let defs = vec![AttributeDefinition::simple("ref", ScalarType::Text).read_only()];
        let tree = engine().build(&defs).unwrap();
        let previous = data(vec![("ref", AttributeValue::text("T-1"))]);

        assert!(engine().validate(&tree, &previous, &previous).is_ok());
        assert!(engine()
            .validate(&tree, &previous, &BTreeMap::new())
            .is_ok());

        let changed = data(vec![("ref", AttributeValue::text("T-2"))]);
        let violations = engine().validate(&tree, &changed, &previous).unwrap_err();
        assert_eq!(
            violations,
            vec![SchemaViolation::new(
                AttributeId::new("ref"),
                ViolationReason::ReadOnly
            )]
        );
    }

    #[test]
    fn test_recursive_value_validated_through_reference() {
        let tree = engine().build(&person_schema()).unwrap();
        let boss = AttributeValue::record([("full_name", AttributeValue::text("Ada"))]);
        let employee = AttributeValue::record([
            ("full_name", AttributeValue::text("Grace")),
            ("manager", boss),
        ]);
        let candidate = data(vec![("person", employee)]);
        assert!(engine()
            .validate(&tree, &candidate, &BTreeMap::new())
            .is_ok());

        let nameless_boss = AttributeValue::record([
            ("full_name", AttributeValue::text("Grace")),
            ("manager", AttributeValue::record(Vec::<(&str, _)>::new())),
        ]);
        let candidate = data(vec![("person", nameless_boss)]);
        let violations = engine()
            .validate(&tree, &candidate, &BTreeMap::new())
            .unwrap_err();
        assert_eq!(
            violations,
            vec![SchemaViolation::new(
                AttributeId::new("full_name"),
                ViolationReason::Required
            )]
        );
    }

    #[test]
    fn test_value_depth_limited() {
        let tree = AttributeSchemaEngine::new(SchemaPolicy { max_depth: 4 })
            .build(&person_schema())
            .unwrap();
        let mut value = AttributeValue::record([("full_name", AttributeValue::text("root"))]);
        for i in 0..4 {
            value = AttributeValue::record([
                ("full_name", AttributeValue::text(format!("level {i}"))),
                ("manager", value),
            ]);
        }
        let candidate = data(vec![("person", value)]);
        let violations = AttributeSchemaEngine::new(SchemaPolicy { max_depth: 4 })
            .validate(&tree, &candidate, &BTreeMap::new())
            .unwrap_err();
        assert!(violations
            .iter()
            .all(|v| matches!(v.reason, ViolationReason::DepthExceeded(4))));
    }

    #[test]
    fn test_scalar_where_record_expected() {
        let defs = vec![
            AttributeDefinition::nested("trip", ["from"]),
            AttributeDefinition::simple("from", ScalarType::Text),
        ];
        let tree = engine().build(&defs).unwrap();
        let candidate = data(vec![("trip", AttributeValue::text("Berlin"))]);
        let violations = engine()
            .validate(&tree, &candidate, &BTreeMap::new())
            .unwrap_err();
        assert_eq!(
            violations,
            vec![SchemaViolation::new(
                AttributeId::new("trip"),
                ViolationReason::NotARecord("text".into())
            )]
        );
    }
}
