//! Folding joined rows into entity trees.
//!
//! A join-based `$expand` returns one row per parent/child combination, so
//! the same parent shows up on many consecutive rows. An
//! [`ExpandAccumulator`] wraps one entity and collects the expanded
//! entities seen alongside it, deduplicated by identity key, into buckets
//! named by the child's fully-qualified type name.

use crate::entity::{map_to_json, IdentityKey, ResultSetEntity};
use crate::error::{ODataError, ODataResult};
use serde_json::{Map, Value};

/// One entity plus the expanded entities accumulated under it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandAccumulator {
    entity: ResultSetEntity,
    // Insertion-ordered; an entity type rarely expands into more than a few buckets.
    buckets: Vec<(String, Vec<ExpandAccumulator>)>,
}

impl ExpandAccumulator {
    /// Creates an accumulator for `entity` with no children.
    pub fn new(entity: ResultSetEntity) -> Self {
        Self {
            entity,
            buckets: Vec::new(),
        }
    }

    /// Returns the wrapped entity.
    pub fn entity(&self) -> &ResultSetEntity {
        &self.entity
    }

    /// Returns the identity key of the wrapped entity.
    pub fn key(&self) -> &IdentityKey {
        self.entity.key()
    }

    /// Returns true if `entity` has the same identity as the wrapped one.
    pub fn is_accumulator_for(&self, entity: &ResultSetEntity) -> bool {
        self.entity.key() == entity.key()
    }

    /// Returns the children in a bucket, in first-seen order.
    pub fn children(&self, bucket: &str) -> &[ExpandAccumulator] {
        self.buckets
            .iter()
            .find(|(name, _)| name == bucket)
            .map_or(&[], |(_, nodes)| nodes.as_slice())
    }

    /// Returns the bucket names, in first-seen order.
    pub fn bucket_names(&self) -> impl Iterator<Item = &str> {
        self.buckets.iter().map(|(name, _)| name.as_str())
    }

    fn bucket_mut(&mut self, name: String) -> &mut Vec<ExpandAccumulator> {
        let index = match self.buckets.iter().position(|(n, _)| *n == name) {
            Some(index) => index,
            None => {
                self.buckets.push((name, Vec::new()));
                self.buckets.len() - 1
            }
        };
        &mut self.buckets[index].1
    }

    /// Adds an expanded entity.
    ///
    /// With no `parents` the entity becomes a direct child, unless a child
    /// with the same identity already exists. Otherwise the entity is added
    /// below the chain of already accumulated `parents`, outermost first.
    ///
    /// # Errors
    ///
    /// Fails if a parent in the chain has not been accumulated.
    pub fn add_expand_entity(&mut self, entity: ResultSetEntity, parents: &[&ResultSetEntity]) -> ODataResult<()> {
        match parents.split_first() {
            None => {
                let bucket = self.bucket_mut(entity.entity_type().fqn());
                // Consecutive rows of one group hit the last node.
                if bucket.last().is_some_and(|last| last.is_accumulator_for(&entity)) {
                    return Ok(());
                }
                if !bucket.iter().any(|node| node.is_accumulator_for(&entity)) {
                    bucket.push(ExpandAccumulator::new(entity));
                }
                Ok(())
            }
            Some((parent, rest)) => {
                let fqn = parent.entity_type().fqn();
                let node = self
                    .buckets
                    .iter_mut()
                    .filter(|(name, _)| *name == fqn)
                    .flat_map(|(_, nodes)| nodes.iter_mut())
                    .rev()
                    .find(|node| node.is_accumulator_for(parent))
                    .ok_or_else(|| {
                        ODataError::Internal(format!(
                            "unsupported expand case: parent {fqn}{} not accumulated under {}",
                            parent.key(),
                            self.entity.key()
                        ))
                    })?;
                node.add_expand_entity(entity, rest)
            }
        }
    }

    /// Renders the tree as nested JSON.
    ///
    /// The entity's properties come first; each bucket is added under its
    /// type name as an array of rendered children.
    pub fn render_for_expand(&self) -> Map<String, Value> {
        let mut rendered = map_to_json(self.entity.data());
        for (name, nodes) in &self.buckets {
            let children = nodes
                .iter()
                .map(|node| Value::Object(node.render_for_expand()))
                .collect();
            rendered.insert(name.clone(), Value::Array(children));
        }
        rendered
    }
}
