//! Ordered groups of models
//!
//! A `Collection` is what hasMany getters and schema queries return. Typed
//! collections hold one model type; polymorphic ones may mix types.

use crate::model::Model;
use decoy_core::{ModelKey, OrmResult};
use serde_json::Value;
use std::cmp::Ordering;

/// An ordered list of models
#[derive(Debug, Clone, Default)]
pub struct Collection {
    model_name: Option<String>,
    models: Vec<Model>,
}

impl Collection {
    /// A collection of one model type
    pub fn new(model_name: impl Into<String>, models: Vec<Model>) -> Self {
        Self {
            model_name: Some(model_name.into()),
            models,
        }
    }

    /// A collection that may mix model types
    pub fn polymorphic(models: Vec<Model>) -> Self {
        Self {
            model_name: None,
            models,
        }
    }

    /// Model type, or `None` when polymorphic
    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    pub fn is_polymorphic(&self) -> bool {
        self.model_name.is_none()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn into_models(self) -> Vec<Model> {
        self.models
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Model> {
        self.models.iter()
    }

    pub fn first(&self) -> Option<&Model> {
        self.models.first()
    }

    pub fn get(&self, index: usize) -> Option<&Model> {
        self.models.get(index)
    }

    /// Whether an equal model (same handle, or same type and id) is present
    pub fn includes(&self, model: &Model) -> bool {
        self.models.iter().any(|m| m == model)
    }

    /// Ids of the saved models, in order
    pub fn model_ids(&self) -> Vec<String> {
        self.models.iter().filter_map(|m| m.id()).collect()
    }

    /// `(type, id)` keys of the saved models, in order
    pub fn keys(&self) -> Vec<ModelKey> {
        self.models.iter().filter_map(|m| m.key()).collect()
    }

    // ========================================================================
    // Transformations
    // ========================================================================

    /// Append a model
    pub fn add(mut self, model: Model) -> Self {
        self.models.push(model);
        self
    }

    /// Drop every model equal to this one
    pub fn remove(mut self, model: &Model) -> Self {
        self.models.retain(|m| m != model);
        self
    }

    pub fn filter(&self, predicate: impl Fn(&Model) -> bool) -> Self {
        Self {
            model_name: self.model_name.clone(),
            models: self.models.iter().filter(|m| predicate(m)).cloned().collect(),
        }
    }

    pub fn sort_by(&self, compare: impl FnMut(&Model, &Model) -> Ordering) -> Self {
        let mut models = self.models.clone();
        models.sort_by(compare);
        Self {
            model_name: self.model_name.clone(),
            models,
        }
    }

    /// Models in `start..end`, clamped to the collection
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.models.len());
        let start = start.min(end);
        Self {
            model_name: self.model_name.clone(),
            models: self.models[start..end].to_vec(),
        }
    }

    /// Append another collection; mixing types yields a polymorphic collection
    pub fn merge(mut self, other: Collection) -> Self {
        if self.model_name != other.model_name {
            self.model_name = None;
        }
        self.models.extend(other.models);
        self
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Set an attribute on every model and save each
    pub fn update(&self, key: &str, value: impl Into<Value>) -> OrmResult<()> {
        let value = value.into();
        for model in &self.models {
            model.update(key, value.clone())?;
        }
        Ok(())
    }

    pub fn save(&self) -> OrmResult<()> {
        self.models.iter().try_for_each(Model::save)
    }

    pub fn destroy(&self) -> OrmResult<()> {
        self.models.iter().try_for_each(Model::destroy)
    }

    pub fn reload(&self) -> OrmResult<()> {
        self.models.iter().try_for_each(Model::reload)
    }

    /// Attribute snapshots of every model
    pub fn to_json(&self) -> Value {
        Value::Array(self.models.iter().map(Model::to_json).collect())
    }
}

impl IntoIterator for Collection {
    type Item = Model;
    type IntoIter = std::vec::IntoIter<Model>;

    fn into_iter(self) -> Self::IntoIter {
        self.models.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Model;
    type IntoIter = std::slice::Iter<'a, Model>;

    fn into_iter(self) -> Self::IntoIter {
        self.models.iter()
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<String> = self
            .models
            .iter()
            .map(|m| m.id().unwrap_or_else(|| "new".to_string()))
            .collect();
        write!(
            f,
            "collection:{}({})",
            self.model_name.as_deref().unwrap_or("polymorphic"),
            ids.join(",")
        )
    }
}
