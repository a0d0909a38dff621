//! The schema: registry, record store and query entry point
//!
//! `Schema` is a cheap clonable handle. Every model built from it shares the
//! same record store and association registry.

use crate::association::ResolvedAssociation;
use crate::attrs::Attrs;
use crate::collection::Collection;
use crate::definition::{ModelDefinition, SchemaDefinition};
use crate::model::Model;
use crate::resolver::{AssociationResolver, ModelClass};
use decoy_core::{ModelKey, OrmError, OrmResult, Record, Validatable};
use decoy_db::Db;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::path::Path;
use std::rc::Rc;

// ============================================================================
// Schema
// ============================================================================

/// Shared handle to a set of model types and their record store
#[derive(Clone)]
pub struct Schema {
    inner: Rc<SchemaInner>,
}

struct SchemaInner {
    db: RefCell<Db>,
    resolver: RefCell<AssociationResolver>,
    /// Models whose save is in progress
    saving: RefCell<HashSet<ModelKey>>,
}

impl Schema {
    /// Create a schema with no model types over the given store
    pub fn new(db: Db) -> Self {
        Self {
            inner: Rc::new(SchemaInner {
                db: RefCell::new(db),
                resolver: RefCell::new(AssociationResolver::new()),
                saving: RefCell::new(HashSet::new()),
            }),
        }
    }

    /// Register every model of a definition and validate the result
    pub fn from_definition(definition: &SchemaDefinition, db: Db) -> OrmResult<Self> {
        definition.validate()?;
        let schema = Self::new(db);
        for model in &definition.models {
            schema.register_model(model)?;
        }
        schema.validate()?;
        Ok(schema)
    }

    /// Register a model type and create its collection
    pub fn register_model(&self, definition: &ModelDefinition) -> OrmResult<()> {
        let collection_name = self
            .inner
            .resolver
            .borrow_mut()
            .register(definition)?
            .collection_name
            .clone();
        self.inner.db.borrow_mut().create_collection(&collection_name);
        tracing::info!(
            model = %definition.name,
            collection = %collection_name,
            "registered model"
        );
        Ok(())
    }

    /// Check that every association targets a registered type and every
    /// explicit inverse resolves
    pub fn validate(&self) -> OrmResult<()> {
        self.inner.resolver.borrow().validate()
    }

    // ========================================================================
    // Registry
    // ========================================================================

    pub fn model_names(&self) -> Vec<String> {
        self.inner.resolver.borrow().model_names()
    }

    pub fn has_model(&self, model_name: &str) -> bool {
        self.inner.resolver.borrow().contains(model_name)
    }

    pub fn model_class(&self, model_name: &str) -> OrmResult<ModelClass> {
        self.inner.resolver.borrow().model(model_name).cloned()
    }

    /// Collection holding a model type's rows (`blogPost` -> `blogPosts`)
    pub fn collection_name_for(&self, model_name: &str) -> OrmResult<String> {
        Ok(self
            .inner
            .resolver
            .borrow()
            .model(model_name)?
            .collection_name
            .clone())
    }

    pub fn associations_for(&self, model_name: &str) -> OrmResult<Vec<ResolvedAssociation>> {
        Ok(self
            .inner
            .resolver
            .borrow()
            .model(model_name)?
            .associations
            .clone())
    }

    pub fn association_for(
        &self,
        model_name: &str,
        association_name: &str,
    ) -> OrmResult<ResolvedAssociation> {
        self.inner
            .resolver
            .borrow()
            .association_for(model_name, association_name)
            .cloned()
    }

    /// The association on `requesting_model` that is the inverse of `association`
    pub fn inverse_for(
        &self,
        association: &ResolvedAssociation,
        requesting_model: &str,
    ) -> OrmResult<Option<ResolvedAssociation>> {
        self.inner
            .resolver
            .borrow()
            .inverse_for(association, requesting_model)
    }

    /// Every association whose foreign keys can reference rows of `model_name`
    pub fn dependent_associations_for(&self, model_name: &str) -> Vec<ResolvedAssociation> {
        self.inner
            .resolver
            .borrow()
            .dependent_associations_for(model_name)
    }

    // ========================================================================
    // Record Store
    // ========================================================================

    /// Borrow the record store
    pub fn db(&self) -> Ref<'_, Db> {
        self.inner.db.borrow()
    }

    /// Mutably borrow the record store
    ///
    /// Writing rows directly bypasses inverse maintenance.
    pub fn db_mut(&self) -> RefMut<'_, Db> {
        self.inner.db.borrow_mut()
    }

    /// Load a fixture file into the record store
    pub fn load_fixtures(&self, path: impl AsRef<Path>) -> OrmResult<()> {
        decoy_db::load_fixtures_into(&mut self.db_mut(), path)
    }

    /// Write the record store to a JSON file
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> OrmResult<()> {
        decoy_db::save_snapshot(&self.db(), path)
    }

    pub(crate) fn read_record(&self, model_name: &str, id: &str) -> OrmResult<Option<Record>> {
        let collection = self.collection_name_for(model_name)?;
        Ok(self.db().collection(&collection)?.find(id))
    }

    pub(crate) fn update_record(
        &self,
        model_name: &str,
        id: &str,
        attrs: &Record,
    ) -> OrmResult<Record> {
        let collection = self.collection_name_for(model_name)?;
        self.db_mut()
            .collection_mut(&collection)?
            .update_one(id, attrs)
    }

    // ========================================================================
    // Save Tracking
    // ========================================================================

    pub(crate) fn is_saving(&self, key: &ModelKey) -> bool {
        self.inner.saving.borrow().contains(key)
    }

    pub(crate) fn begin_saving(&self, key: &ModelKey) {
        self.inner.saving.borrow_mut().insert(key.clone());
    }

    pub(crate) fn end_saving(&self, key: &ModelKey) {
        self.inner.saving.borrow_mut().remove(key);
    }

    // ========================================================================
    // Models
    // ========================================================================

    /// Build an unsaved model
    pub fn new_model(&self, model_name: &str, attrs: impl Into<Attrs>) -> OrmResult<Model> {
        Model::build(self.clone(), model_name, attrs.into())
    }

    /// Build and save a model
    pub fn create(&self, model_name: &str, attrs: impl Into<Attrs>) -> OrmResult<Model> {
        let model = self.new_model(model_name, attrs)?;
        model.save()?;
        Ok(model)
    }

    /// Find a saved model by id
    pub fn find(&self, model_name: &str, id: &str) -> OrmResult<Option<Model>> {
        Ok(self
            .read_record(model_name, id)?
            .map(|record| Model::from_record(self.clone(), model_name, record)))
    }

    /// Find several saved models, failing if any id is missing
    pub fn find_many<I, S>(&self, model_name: &str, ids: I) -> OrmResult<Collection>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        let collection = self.collection_name_for(model_name)?;
        let records = self.db().collection(&collection)?.find_many(&ids);

        if records.len() != ids.len() {
            let found: HashSet<String> =
                records.iter().filter_map(decoy_core::record_id).collect();
            let missing = ids.iter().filter(|id| !found.contains(*id)).cloned().collect();
            return Err(OrmError::RecordsNotFound {
                model: model_name.to_string(),
                ids,
                missing,
            });
        }
        Ok(self.to_collection(model_name, records))
    }

    /// Every saved model of a type
    pub fn all(&self, model_name: &str) -> OrmResult<Collection> {
        let collection = self.collection_name_for(model_name)?;
        let records = self.db().collection(&collection)?.all();
        Ok(self.to_collection(model_name, records))
    }

    /// An empty collection of a type
    pub fn none(&self, model_name: &str) -> OrmResult<Collection> {
        self.collection_name_for(model_name)?;
        Ok(Collection::new(model_name, Vec::new()))
    }

    /// First saved model of a type
    pub fn first(&self, model_name: &str) -> OrmResult<Option<Model>> {
        Ok(self.all(model_name)?.into_models().into_iter().next())
    }

    /// Saved models whose attributes match every plain value in the query
    pub fn where_attrs(&self, model_name: &str, query: impl Into<Attrs>) -> OrmResult<Collection> {
        let collection = self.collection_name_for(model_name)?;
        let records = self
            .db()
            .collection(&collection)?
            .where_attrs(&query.into().plain_values());
        Ok(self.to_collection(model_name, records))
    }

    /// Saved models accepted by a predicate over their rows
    pub fn where_fn(
        &self,
        model_name: &str,
        predicate: impl Fn(&Record) -> bool,
    ) -> OrmResult<Collection> {
        let collection = self.collection_name_for(model_name)?;
        let records = self.db().collection(&collection)?.where_fn(predicate);
        Ok(self.to_collection(model_name, records))
    }

    /// First saved model matching the query
    pub fn find_by(&self, model_name: &str, query: impl Into<Attrs>) -> OrmResult<Option<Model>> {
        let collection = self.collection_name_for(model_name)?;
        let record = self
            .db()
            .collection(&collection)?
            .find_by(&query.into().plain_values());
        Ok(record.map(|r| Model::from_record(self.clone(), model_name, r)))
    }

    /// First saved model matching the query, or a newly created one
    pub fn find_or_create_by(&self, model_name: &str, attrs: impl Into<Attrs>) -> OrmResult<Model> {
        let attrs = attrs.into();
        match self.find_by(model_name, attrs.clone())? {
            Some(model) => Ok(model),
            None => self.create(model_name, attrs),
        }
    }

    fn to_collection(&self, model_name: &str, records: Vec<Record>) -> Collection {
        let models = records
            .into_iter()
            .map(|r| Model::from_record(self.clone(), model_name, r))
            .collect();
        Collection::new(model_name, models)
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("models", &self.model_names())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
