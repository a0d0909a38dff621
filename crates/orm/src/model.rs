//! Model instances
//!
//! A `Model` is a handle to one record of a registered type. Cloning the
//! handle shares state, so every clone sees the same unsaved changes.
//!
//! A saved model reads through to its stored row. Plain attributes set on
//! the handle overlay that row until `save` writes just those keys, so
//! separate handles on one row never undo each other's saves. Association
//! and foreign key assignments are held as pending associations and are
//! written, together with the inverse side of every affected associate,
//! when the model is saved:
//!
//! ```rust,ignore
//! let post = schema.new_model("post", json!({ "title": "Lorem" }))?;
//! post.set_one("author", Some(&author))?;
//! post.save()?;
//! assert!(author.many("posts")?.includes(&post));
//! ```
//!
//! Pending associations hold saved associates by key and only keep unsaved
//! ones by handle. The associate sees the assignment through a weak
//! reference to the assigning model, which lapses once that model saves,
//! reloads, reassigns or is dropped.

use crate::association::ResolvedAssociation;
use crate::attrs::{AttrValue, Attrs};
use crate::collection::Collection;
use crate::resolver::ModelClass;
use crate::schema::Schema;
use decoy_core::{
    AssociationKind, ModelKey, OrmError, OrmResult, PolymorphicId, Record, normalize_id,
    record_id,
};
use decoy_db::Target;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

// ============================================================================
// State
// ============================================================================

/// One side of a pending assignment
#[derive(Debug, Clone)]
enum Associate {
    /// Looked up in the record store when read
    Saved(ModelKey),
    Draft(Model),
}

impl Associate {
    fn of(model: &Model) -> Self {
        match model.key() {
            Some(key) if model.is_saved() => Associate::Saved(key),
            _ => Associate::Draft(model.clone()),
        }
    }

    fn key(&self) -> Option<ModelKey> {
        match self {
            Associate::Saved(key) => Some(key.clone()),
            Associate::Draft(model) => model.key(),
        }
    }

    fn is(&self, model: &Model) -> bool {
        match self {
            Associate::Saved(key) => model.key().as_ref() == Some(key),
            Associate::Draft(draft) => draft == model,
        }
    }
}

#[derive(Debug, Clone)]
enum Pending {
    One(Option<Associate>),
    Many(Vec<Associate>),
}

impl Pending {
    fn includes(&self, model: &Model) -> bool {
        match self {
            Pending::One(associate) => associate.as_ref().is_some_and(|a| a.is(model)),
            Pending::Many(associates) => associates.iter().any(|a| a.is(model)),
        }
    }

    fn into_associates(self) -> Vec<Associate> {
        match self {
            Pending::One(associate) => associate.into_iter().collect(),
            Pending::Many(associates) => associates,
        }
    }
}

/// An assignment made on `owner` that includes this model
#[derive(Clone)]
struct Implied {
    owner: Weak<RefCell<ModelState>>,
    /// Association name on the owner
    association: String,
}

struct ModelState {
    model_name: String,
    attrs: Record,
    /// Plain attributes set since the last save or reload
    changed: BTreeSet<String>,
    /// Whether the row was inserted (or read) by this handle
    persisted: bool,
    destroyed: bool,
    /// Keyed by association name
    pending: BTreeMap<String, Pending>,
    /// Keyed by the association name on this model
    implied: BTreeMap<String, Vec<Implied>>,
}

// ============================================================================
// Model
// ============================================================================

/// A handle to one record of a registered model type
#[derive(Clone)]
pub struct Model {
    schema: Schema,
    state: Rc<RefCell<ModelState>>,
}

impl Model {
    fn wrap(schema: Schema, model_name: &str, attrs: Record, persisted: bool) -> Self {
        Self {
            schema,
            state: Rc::new(RefCell::new(ModelState {
                model_name: model_name.to_string(),
                attrs,
                changed: BTreeSet::new(),
                persisted,
                destroyed: false,
                pending: BTreeMap::new(),
                implied: BTreeMap::new(),
            })),
        }
    }

    /// Wrap a row read from the record store
    pub(crate) fn from_record(schema: Schema, model_name: &str, record: Record) -> Self {
        Self::wrap(schema, model_name, record, true)
    }

    /// Build an unsaved model
    ///
    /// Every foreign key starts empty (`null` or `[]`). Foreign keys are
    /// applied before association values, so `with_one("author", ..)` wins
    /// over `authorId` when both are given.
    pub(crate) fn build(schema: Schema, model_name: &str, attrs: Attrs) -> OrmResult<Self> {
        let class = schema.model_class(model_name)?;
        let record = class
            .associations
            .iter()
            .map(|a| (a.foreign_key.clone(), a.kind.empty_foreign_key()))
            .collect();
        let model = Self::wrap(schema, model_name, record, false);
        model.apply(&class, attrs)?;
        Ok(model)
    }

    fn apply(&self, class: &ModelClass, attrs: Attrs) -> OrmResult<()> {
        let mut foreign_keys = Vec::new();
        let mut associates = Vec::new();

        for (key, value) in attrs {
            if let Some(association) = class.association(&key) {
                associates.push((association.clone(), value));
                continue;
            }
            match value {
                AttrValue::Value(value) => {
                    if let Some(association) = class.association_for_foreign_key(&key) {
                        foreign_keys.push((association.clone(), value));
                    } else if key == "id" {
                        self.set_id(value)?;
                    } else {
                        self.set_plain(key, value);
                    }
                }
                other => {
                    return Err(OrmError::UndefinedAssociationKey {
                        model: class.name.clone(),
                        key,
                        value: other.describe(),
                    });
                }
            }
        }

        for (association, value) in foreign_keys {
            self.set_foreign_key(&association, value)?;
        }
        for (association, value) in associates {
            self.assign(&association, value)?;
        }
        Ok(())
    }

    // ========================================================================
    // Identity and Attributes
    // ========================================================================

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn model_name(&self) -> String {
        self.state.borrow().model_name.clone()
    }

    pub fn id(&self) -> Option<String> {
        record_id(&self.state.borrow().attrs)
    }

    /// `(type, id)` key, once the model has an id
    pub fn key(&self) -> Option<ModelKey> {
        let state = self.state.borrow();
        record_id(&state.attrs).map(|id| ModelKey::new(state.model_name.clone(), id))
    }

    /// Whether this model has been persisted and its row still exists
    pub fn is_saved(&self) -> bool {
        self.stored_row().is_some()
    }

    fn stored_row(&self) -> Option<Record> {
        if !self.state.borrow().persisted {
            return None;
        }
        let key = self.key()?;
        self.schema
            .read_record(&key.model_name, &key.id)
            .ok()
            .flatten()
    }

    pub fn is_new(&self) -> bool {
        !self.is_saved()
    }

    fn is_destroyed(&self) -> bool {
        self.state.borrow().destroyed
    }

    /// Snapshot of every attribute
    ///
    /// A saved model starts from its stored row and overlays the plain
    /// attributes set since the last save. Foreign keys reflect unsaved
    /// assignments on either side.
    pub fn attrs(&self) -> Record {
        let mut attrs = match self.stored_row() {
            Some(mut row) => {
                let state = self.state.borrow();
                for key in &state.changed {
                    if let Some(value) = state.attrs.get(key) {
                        row.insert(key.clone(), value.clone());
                    }
                }
                row
            }
            None => self.state.borrow().attrs.clone(),
        };

        if let Ok(class) = self.class() {
            for association in &class.associations {
                if let Ok(Some(associates)) = self.unsaved_associates(association) {
                    attrs.insert(
                        association.foreign_key.clone(),
                        foreign_key_value(association, &associates),
                    );
                }
            }
        }
        attrs
    }

    /// One attribute, `null` when absent
    pub fn attr(&self, key: &str) -> Value {
        self.attrs().remove(key).unwrap_or(Value::Null)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.attrs())
    }

    /// Set an attribute locally
    ///
    /// Foreign keys look up the referenced records immediately and behave
    /// like the matching association setter. Association names only accept
    /// `null` here; use `set_one` / `set_many` for models.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> OrmResult<()> {
        let value = value.into();
        if key == "id" {
            return self.set_id(value);
        }

        let class = self.class()?;
        if let Some(association) = class.association_for_foreign_key(key) {
            return self.set_foreign_key(association, value);
        }
        if let Some(association) = class.association(key) {
            return self.assign(association, AttrValue::Value(value));
        }
        self.set_plain(key.to_string(), value);
        Ok(())
    }

    fn set_plain(&self, key: String, value: Value) {
        let mut state = self.state.borrow_mut();
        state.changed.insert(key.clone());
        state.attrs.insert(key, value);
    }

    fn set_id(&self, value: Value) -> OrmResult<()> {
        let model_name = self.model_name();
        let requested = if value.is_null() {
            None
        } else {
            Some(normalize_id(&value).ok_or_else(|| {
                OrmError::invalid_value(&model_name, "id", format!("{} is not a valid id", value))
            })?)
        };

        if self.is_saved() {
            let current = self.id();
            if requested != current {
                return Err(OrmError::ImmutableId {
                    model: model_name,
                    id: current.unwrap_or_default(),
                });
            }
            return Ok(());
        }

        let mut state = self.state.borrow_mut();
        match requested {
            Some(id) => state.attrs.insert("id".to_string(), Value::String(id)),
            None => state.attrs.remove("id"),
        };
        Ok(())
    }

    // ========================================================================
    // Associations
    // ========================================================================

    pub fn associations(&self) -> OrmResult<Vec<ResolvedAssociation>> {
        self.schema.associations_for(&self.model_name())
    }

    pub fn association_for(&self, name: &str) -> OrmResult<ResolvedAssociation> {
        self.schema.association_for(&self.model_name(), name)
    }

    /// The association on this model's type that is the inverse of `association`
    pub fn inverse_for(
        &self,
        association: &ResolvedAssociation,
    ) -> OrmResult<Option<ResolvedAssociation>> {
        self.schema.inverse_for(association, &self.model_name())
    }

    pub fn has_inverse_for(&self, association: &ResolvedAssociation) -> OrmResult<bool> {
        Ok(self.inverse_for(association)?.is_some())
    }

    /// The associate of a belongsTo association
    pub fn one(&self, name: &str) -> OrmResult<Option<Model>> {
        let association = self.association_for(name)?;
        if !association.is_belongs_to() {
            return Err(self.wrong_kind(&association, "many"));
        }
        self.current_one(&association)
    }

    /// The associates of a hasMany association
    ///
    /// Dangling ids are skipped.
    pub fn many(&self, name: &str) -> OrmResult<Collection> {
        let association = self.association_for(name)?;
        if !association.is_has_many() {
            return Err(self.wrong_kind(&association, "one"));
        }
        let models = self.current_many(&association)?;
        Ok(if association.polymorphic {
            Collection::polymorphic(models)
        } else {
            Collection::new(association.model_name.clone(), models)
        })
    }

    /// Point a belongsTo association at a model, or clear it
    pub fn set_one(&self, name: &str, model: Option<&Model>) -> OrmResult<()> {
        let association = self.association_for(name)?;
        if !association.is_belongs_to() {
            return Err(self.wrong_kind(&association, "set_many"));
        }
        self.set_one_resolved(&association, model)
    }

    /// Replace the associates of a hasMany association
    pub fn set_many(&self, name: &str, models: impl IntoIterator<Item = Model>) -> OrmResult<()> {
        let association = self.association_for(name)?;
        if !association.is_has_many() {
            return Err(self.wrong_kind(&association, "set_one"));
        }
        self.set_many_resolved(&association, models.into_iter().collect())
    }

    fn wrong_kind(&self, association: &ResolvedAssociation, method: &str) -> OrmError {
        OrmError::invalid_value(
            &association.owner_model_name,
            &association.name,
            format!("is a {} association; use {}()", association.kind, method),
        )
    }

    fn assign(&self, association: &ResolvedAssociation, value: AttrValue) -> OrmResult<()> {
        match (association.kind, value) {
            (AssociationKind::BelongsTo, AttrValue::One(model)) => {
                self.set_one_resolved(association, model.as_ref())
            }
            (AssociationKind::HasMany, AttrValue::Many(models)) => {
                self.set_many_resolved(association, models)
            }
            (AssociationKind::BelongsTo, AttrValue::Value(Value::Null)) => {
                self.set_one_resolved(association, None)
            }
            (AssociationKind::HasMany, AttrValue::Value(Value::Null)) => {
                self.set_many_resolved(association, Vec::new())
            }
            (_, other) => Err(OrmError::invalid_value(
                &association.owner_model_name,
                &association.name,
                format!(
                    "{} is not valid for a {} association",
                    other.describe(),
                    association.kind
                ),
            )),
        }
    }

    fn check_type(&self, association: &ResolvedAssociation, model: &Model) -> OrmResult<()> {
        let given = model.model_name();
        if !association.accepts(&given) {
            return Err(OrmError::AssociationTypeMismatch {
                model: association.owner_model_name.clone(),
                association: association.name.clone(),
                expected: association.model_name.clone(),
                given,
            });
        }
        Ok(())
    }

    fn set_one_resolved(
        &self,
        association: &ResolvedAssociation,
        model: Option<&Model>,
    ) -> OrmResult<()> {
        let inverse = match model {
            Some(model) => {
                self.check_type(association, model)?;
                model.inverse_for(association)?
            }
            None => None,
        };

        self.set_pending(association, Pending::One(model.map(Associate::of)));
        if let (Some(model), Some(inverse)) = (model, inverse) {
            model.imply(self, &inverse, association);
        }
        Ok(())
    }

    fn set_many_resolved(
        &self,
        association: &ResolvedAssociation,
        models: Vec<Model>,
    ) -> OrmResult<()> {
        let mut unique: Vec<Model> = Vec::with_capacity(models.len());
        for model in models {
            self.check_type(association, &model)?;
            if !unique.contains(&model) {
                unique.push(model);
            }
        }
        let inverses = unique
            .iter()
            .map(|m| m.inverse_for(association))
            .collect::<OrmResult<Vec<_>>>()?;

        self.set_pending(
            association,
            Pending::Many(unique.iter().map(Associate::of).collect()),
        );
        for (model, inverse) in unique.iter().zip(inverses) {
            if let Some(inverse) = inverse {
                model.imply(self, &inverse, association);
            }
        }
        Ok(())
    }

    /// Show `owner`'s assignment through `via` on this model's side
    fn imply(&self, owner: &Model, association: &ResolvedAssociation, via: &ResolvedAssociation) {
        let owner_state = Rc::downgrade(&owner.state);
        let mut state = self.state.borrow_mut();
        let entries = state.implied.entry(association.name.clone()).or_default();
        entries.retain(|entry| {
            entry.owner.strong_count() > 0
                && !(entry.association == via.name && entry.owner.ptr_eq(&owner_state))
        });
        entries.push(Implied {
            owner: owner_state,
            association: via.name.clone(),
        });
    }

    /// Models whose pending assignments currently include this model
    fn implying_owners(&self, association: &ResolvedAssociation) -> Vec<Model> {
        let implied = self
            .state
            .borrow()
            .implied
            .get(&association.name)
            .cloned()
            .unwrap_or_default();

        implied
            .into_iter()
            .filter_map(|entry| {
                let owner = Model {
                    schema: self.schema.clone(),
                    state: entry.owner.upgrade()?,
                };
                let live = owner
                    .state
                    .borrow()
                    .pending
                    .get(&entry.association)
                    .is_some_and(|p| p.includes(self));
                live.then_some(owner)
            })
            .collect()
    }

    fn set_pending(&self, association: &ResolvedAssociation, value: Pending) {
        self.state
            .borrow_mut()
            .pending
            .insert(association.name.clone(), value);
    }

    fn pending_value(&self, association: &ResolvedAssociation) -> Option<Pending> {
        self.state
            .borrow()
            .pending
            .get(&association.name)
            .cloned()
    }

    /// What `save` would write for `association`, if anything is unsaved
    fn unsaved_associates(
        &self,
        association: &ResolvedAssociation,
    ) -> OrmResult<Option<Vec<Associate>>> {
        if let Some(pending) = self.pending_value(association) {
            return Ok(Some(pending.into_associates()));
        }
        let owners = self.implying_owners(association);
        if owners.is_empty() {
            return Ok(None);
        }
        let associates = match association.kind {
            AssociationKind::BelongsTo => owners.last().map(Associate::of).into_iter().collect(),
            AssociationKind::HasMany => self
                .current_many(association)?
                .iter()
                .map(Associate::of)
                .collect(),
        };
        Ok(Some(associates))
    }

    fn set_foreign_key(&self, association: &ResolvedAssociation, value: Value) -> OrmResult<()> {
        match association.kind {
            AssociationKind::BelongsTo => {
                let associate = if value.is_null() {
                    None
                } else {
                    Some(self.lookup(association, &value)?)
                };
                self.set_one_resolved(association, associate.as_ref())
            }
            AssociationKind::HasMany => {
                let items = match value {
                    Value::Null => Vec::new(),
                    Value::Array(items) => items,
                    other => {
                        return Err(OrmError::invalid_value(
                            &association.owner_model_name,
                            &association.foreign_key,
                            format!("expected an array of ids, got {}", other),
                        ));
                    }
                };
                let models = if association.polymorphic {
                    items
                        .iter()
                        .map(|item| self.lookup(association, item))
                        .collect::<OrmResult<Vec<_>>>()?
                } else {
                    let ids = items
                        .iter()
                        .map(|item| self.parse_id(association, item))
                        .collect::<OrmResult<Vec<_>>>()?;
                    self.schema
                        .find_many(&association.model_name, ids)?
                        .into_models()
                };
                self.set_many_resolved(association, models)
            }
        }
    }

    fn parse_id(&self, association: &ResolvedAssociation, value: &Value) -> OrmResult<String> {
        normalize_id(value).ok_or_else(|| {
            OrmError::invalid_value(
                &association.owner_model_name,
                &association.foreign_key,
                format!("{} is not a valid id", value),
            )
        })
    }

    /// Find the record a single foreign key value references
    fn lookup(&self, association: &ResolvedAssociation, value: &Value) -> OrmResult<Model> {
        let key = if association.polymorphic {
            let pair = PolymorphicId::from_value(value).ok_or_else(|| {
                OrmError::invalid_value(
                    &association.owner_model_name,
                    &association.foreign_key,
                    format!("expected {{ id, type }}, got {}", value),
                )
            })?;
            ModelKey::new(pair.type_name, pair.id)
        } else {
            ModelKey::new(&association.model_name, self.parse_id(association, value)?)
        };
        self.schema
            .find(&key.model_name, &key.id)?
            .ok_or_else(|| OrmError::not_found(key.model_name, key.id))
    }

    /// Foreign key as last persisted, falling back to the local value
    fn stored_foreign_key(&self, association: &ResolvedAssociation) -> Value {
        let stored = self
            .stored_row()
            .and_then(|mut row| row.remove(&association.foreign_key));
        stored
            .or_else(|| self.state.borrow().attrs.get(&association.foreign_key).cloned())
            .unwrap_or(Value::Null)
    }

    fn current_one(&self, association: &ResolvedAssociation) -> OrmResult<Option<Model>> {
        if let Some(Pending::One(associate)) = self.pending_value(association) {
            return match associate {
                Some(associate) => self.resolve_associate(associate),
                None => Ok(None),
            };
        }
        if let Some(owner) = self.implying_owners(association).pop() {
            return Ok(Some(owner));
        }
        let keys = referenced_keys(association, &self.stored_foreign_key(association));
        Ok(self.resolve_keys(keys)?.into_iter().next())
    }

    fn current_many(&self, association: &ResolvedAssociation) -> OrmResult<Vec<Model>> {
        if let Some(Pending::Many(associates)) = self.pending_value(association) {
            let mut models = Vec::with_capacity(associates.len());
            for associate in associates {
                models.extend(self.resolve_associate(associate)?);
            }
            return Ok(models);
        }
        let keys = referenced_keys(association, &self.stored_foreign_key(association));
        let mut models = self.resolve_keys(keys)?;
        for owner in self.implying_owners(association) {
            if !models.contains(&owner) {
                models.push(owner);
            }
        }
        Ok(models)
    }

    fn resolve_associate(&self, associate: Associate) -> OrmResult<Option<Model>> {
        match associate {
            Associate::Saved(key) => self.schema.find(&key.model_name, &key.id),
            Associate::Draft(model) if model.is_destroyed() => Ok(None),
            Associate::Draft(model) => Ok(Some(model)),
        }
    }

    fn resolve_keys(&self, keys: Vec<ModelKey>) -> OrmResult<Vec<Model>> {
        let mut models = Vec::with_capacity(keys.len());
        for key in keys {
            match self.schema.find(&key.model_name, &key.id)? {
                Some(model) => models.push(model),
                None => tracing::warn!(owner = %self, missing = %key, "skipping dangling reference"),
            }
        }
        Ok(models)
    }

    // ========================================================================
    // Related Models
    // ========================================================================

    /// Build an unsaved associate and attach it
    pub fn new_related(&self, name: &str, attrs: impl Into<Attrs>) -> OrmResult<Model> {
        let association = self.monomorphic_association(name)?;
        let child = self.schema.new_model(&association.model_name, attrs)?;
        self.add_related(&association, &child)?;
        Ok(child)
    }

    /// Build an unsaved associate of the given type for a polymorphic association
    pub fn new_related_as(
        &self,
        name: &str,
        model_name: &str,
        attrs: impl Into<Attrs>,
    ) -> OrmResult<Model> {
        let association = self.association_for(name)?;
        let child = self.schema.new_model(model_name, attrs)?;
        self.add_related(&association, &child)?;
        Ok(child)
    }

    /// Create an associate, attach it and save this model
    pub fn create_related(&self, name: &str, attrs: impl Into<Attrs>) -> OrmResult<Model> {
        let association = self.monomorphic_association(name)?;
        self.create_related_resolved(&association, &association.model_name, attrs.into())
    }

    /// Create an associate of the given type for a polymorphic association
    pub fn create_related_as(
        &self,
        name: &str,
        model_name: &str,
        attrs: impl Into<Attrs>,
    ) -> OrmResult<Model> {
        let association = self.association_for(name)?;
        self.create_related_resolved(&association, model_name, attrs.into())
    }

    fn create_related_resolved(
        &self,
        association: &ResolvedAssociation,
        model_name: &str,
        attrs: Attrs,
    ) -> OrmResult<Model> {
        let child = self.schema.create(model_name, attrs)?;
        self.add_related(association, &child)?;
        self.save()?;
        child.reload()?;
        Ok(child)
    }

    fn monomorphic_association(&self, name: &str) -> OrmResult<ResolvedAssociation> {
        let association = self.association_for(name)?;
        if association.polymorphic {
            return Err(OrmError::invalid_value(
                &association.owner_model_name,
                &association.name,
                "is polymorphic; pass the model type explicitly",
            ));
        }
        Ok(association)
    }

    fn add_related(&self, association: &ResolvedAssociation, child: &Model) -> OrmResult<()> {
        match association.kind {
            AssociationKind::BelongsTo => self.set_one_resolved(association, Some(child)),
            AssociationKind::HasMany => {
                let mut models = self.current_many(association)?;
                models.push(child.clone());
                self.set_many_resolved(association, models)
            }
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Set one attribute and save
    pub fn update(&self, key: &str, value: impl Into<Value>) -> OrmResult<()> {
        self.set(key, value)?;
        self.save()
    }

    /// Apply attributes and associations, then save
    pub fn update_attrs(&self, attrs: impl Into<Attrs>) -> OrmResult<()> {
        let class = self.class()?;
        self.apply(&class, attrs.into())?;
        self.save()
    }

    /// Persist this model and every pending association
    ///
    /// A saved model only writes the plain attributes set since its last
    /// save. Unsaved associates are saved first, foreign keys are written on
    /// both sides, and records that are no longer associated have their
    /// reference to this model removed.
    pub fn save(&self) -> OrmResult<()> {
        let class = self.class()?;

        if self.is_saved() {
            let id = self.require_key()?.id;
            let changed: Record = {
                let state = self.state.borrow();
                state
                    .changed
                    .iter()
                    .filter(|k| !class.is_foreign_key(k))
                    .filter_map(|k| state.attrs.get(k).map(|v| (k.clone(), v.clone())))
                    .collect()
            };
            if !changed.is_empty() {
                self.schema.update_record(&class.name, &id, &changed)?;
            }
        } else {
            let attrs = self.state.borrow().attrs.clone();
            let stored = self
                .schema
                .db_mut()
                .collection_mut(&class.collection_name)?
                .insert(attrs)?;
            let mut state = self.state.borrow_mut();
            state.attrs = stored;
            state.persisted = true;
            state.destroyed = false;
        }

        let key = self.require_key()?;
        self.schema.begin_saving(&key);
        let result = self.save_associations(&class, &key);
        self.schema.end_saving(&key);
        result?;

        if let Some(row) = self.schema.read_record(&key.model_name, &key.id)? {
            let mut state = self.state.borrow_mut();
            state.attrs = row;
            state.changed.clear();
        }
        tracing::debug!(model = %key, "saved");
        Ok(())
    }

    /// Write every unsaved assignment, dropping each only once it is stored
    fn save_associations(&self, class: &ModelClass, key: &ModelKey) -> OrmResult<()> {
        let mut unsaved = Vec::new();
        for association in class.associations_in_save_order() {
            if let Some(associates) = self.unsaved_associates(&association)? {
                unsaved.push((association, associates));
            }
        }

        for (association, associates) in unsaved {
            self.save_pending(key, &association, associates)?;
            let mut state = self.state.borrow_mut();
            state.pending.remove(&association.name);
            state.implied.remove(&association.name);
        }
        Ok(())
    }

    fn save_pending(
        &self,
        key: &ModelKey,
        association: &ResolvedAssociation,
        associates: Vec<Associate>,
    ) -> OrmResult<()> {
        // Release records that are no longer associated
        let wanted: Vec<ModelKey> = associates.iter().filter_map(Associate::key).collect();
        for previous in referenced_keys(association, &self.stored_foreign_key(association)) {
            if !wanted.contains(&previous) {
                self.release(key, association, &previous)?;
            }
        }

        // Destroyed associates drop out; unsaved ones are saved first
        let mut stored: Vec<(ModelKey, Option<Model>)> = Vec::with_capacity(associates.len());
        for associate in associates {
            match associate {
                Associate::Saved(associate_key) => {
                    if self
                        .schema
                        .read_record(&associate_key.model_name, &associate_key.id)?
                        .is_some()
                    {
                        stored.push((associate_key, None));
                    }
                }
                Associate::Draft(model) => {
                    if model.is_destroyed() {
                        continue;
                    }
                    let in_progress = Rc::ptr_eq(&model.state, &self.state)
                        || model.key().is_some_and(|k| self.schema.is_saving(&k));
                    if !in_progress && model.is_new() {
                        model.save()?;
                    }
                    if let Some(associate_key) = model.key() {
                        stored.push((associate_key, Some(model)));
                    }
                }
            }
        }

        let references: Vec<Value> = stored
            .iter()
            .map(|(k, _)| reference_value(k, association.polymorphic))
            .collect();
        let value = match association.kind {
            AssociationKind::BelongsTo => references.into_iter().next().unwrap_or(Value::Null),
            AssociationKind::HasMany => Value::Array(references),
        };
        self.schema
            .update_record(&key.model_name, &key.id, &single(&association.foreign_key, value.clone()))?;
        self.state
            .borrow_mut()
            .attrs
            .insert(association.foreign_key.clone(), value);

        for (associate_key, handle) in &stored {
            if let Some(inverse) = self.schema.inverse_for(association, &associate_key.model_name)? {
                self.attach(key, &inverse, associate_key, handle.as_ref())?;
            }
        }
        Ok(())
    }

    /// Remove `key` from the inverse foreign key of a former associate
    fn release(
        &self,
        key: &ModelKey,
        association: &ResolvedAssociation,
        previous: &ModelKey,
    ) -> OrmResult<()> {
        let Some(inverse) = self.schema.inverse_for(association, &previous.model_name)? else {
            return Ok(());
        };
        let Some(row) = self.schema.read_record(&previous.model_name, &previous.id)? else {
            return Ok(());
        };
        let current = row.get(&inverse.foreign_key).unwrap_or(&Value::Null);
        if !references(current, key, inverse.polymorphic) {
            return Ok(());
        }
        let value = without_reference(current, key, inverse.polymorphic);
        self.schema.update_record(
            &previous.model_name,
            &previous.id,
            &single(&inverse.foreign_key, value),
        )?;
        tracing::trace!(owner = %key, released = %previous, "released associate");
        Ok(())
    }

    /// Write this model into the inverse foreign key of an associate
    ///
    /// An associate that pointed at another model through a belongsTo
    /// inverse is removed from that model's side.
    fn attach(
        &self,
        key: &ModelKey,
        inverse: &ResolvedAssociation,
        associate_key: &ModelKey,
        associate: Option<&Model>,
    ) -> OrmResult<()> {
        let Some(row) = self
            .schema
            .read_record(&associate_key.model_name, &associate_key.id)?
        else {
            return Ok(());
        };
        let current = row.get(&inverse.foreign_key).cloned().unwrap_or(Value::Null);

        let reference = reference_value(key, inverse.polymorphic);
        let value = match inverse.kind {
            AssociationKind::BelongsTo => {
                for displaced in referenced_keys(inverse, &current) {
                    if displaced != *key {
                        self.release(associate_key, inverse, &displaced)?;
                    }
                }
                reference
            }
            AssociationKind::HasMany => {
                let mut items = match current {
                    Value::Array(items) => items,
                    _ => Vec::new(),
                };
                if !items.iter().any(|item| is_reference(item, key, inverse.polymorphic)) {
                    items.push(reference);
                }
                Value::Array(items)
            }
        };
        let updated = self.schema.update_record(
            &associate_key.model_name,
            &associate_key.id,
            &single(&inverse.foreign_key, value),
        )?;
        if let Some(associate) = associate {
            associate.sync_inverse(inverse, &updated, self);
        }
        Ok(())
    }

    /// Adopt a freshly written inverse foreign key
    fn sync_inverse(&self, inverse: &ResolvedAssociation, row: &Record, owner: &Model) {
        let materialized = matches!(
            self.pending_value(inverse),
            Some(Pending::One(Some(ref associate))) if associate.is(owner)
        );
        let mut state = self.state.borrow_mut();
        if let Some(value) = row.get(&inverse.foreign_key) {
            state.attrs.insert(inverse.foreign_key.clone(), value.clone());
        }
        if materialized {
            state.pending.remove(&inverse.name);
        }
    }

    /// Delete this model's row and every reference to it
    ///
    /// Unsaved models are left untouched.
    pub fn destroy(&self) -> OrmResult<()> {
        let Some(key) = self.key() else {
            return Ok(());
        };

        for association in self.schema.dependent_associations_for(&key.model_name) {
            release_references(&self.schema, &association, &key)?;
        }
        let collection = self.schema.collection_name_for(&key.model_name)?;
        self.schema
            .db_mut()
            .collection_mut(&collection)?
            .remove(&Target::id(key.id.clone()));
        {
            let mut state = self.state.borrow_mut();
            state.pending.clear();
            state.implied.clear();
            state.changed.clear();
            state.persisted = false;
            state.destroyed = true;
        }

        tracing::debug!(model = %key, "destroyed");
        Ok(())
    }

    /// Replace local attributes with the stored row and drop unsaved changes
    pub fn reload(&self) -> OrmResult<()> {
        let Some(key) = self.key() else {
            return Ok(());
        };
        let row = self
            .schema
            .read_record(&key.model_name, &key.id)?
            .ok_or_else(|| OrmError::not_found(&key.model_name, &key.id))?;

        {
            let mut state = self.state.borrow_mut();
            state.attrs = row;
            state.changed.clear();
            state.pending.clear();
            state.implied.clear();
        }
        tracing::debug!(model = %key, "reloaded");
        Ok(())
    }

    fn class(&self) -> OrmResult<ModelClass> {
        self.schema.model_class(&self.model_name())
    }

    fn require_key(&self) -> OrmResult<ModelKey> {
        self.key()
            .ok_or_else(|| OrmError::internal(format!("{} has no id after insert", self)))
    }
}

// ============================================================================
// Foreign Key Values
// ============================================================================

fn single(key: &str, value: Value) -> Record {
    let mut record = Record::new();
    record.insert(key.to_string(), value);
    record
}

fn reference_value(key: &ModelKey, polymorphic: bool) -> Value {
    if polymorphic {
        PolymorphicId::from(key.clone()).to_value()
    } else {
        Value::String(key.id.clone())
    }
}

/// The foreign key a list of associates is stored as; drafts without an id are left out
fn foreign_key_value(association: &ResolvedAssociation, associates: &[Associate]) -> Value {
    let mut references = associates
        .iter()
        .filter_map(Associate::key)
        .map(|key| reference_value(&key, association.polymorphic));
    match association.kind {
        AssociationKind::BelongsTo => references.next().unwrap_or(Value::Null),
        AssociationKind::HasMany => Value::Array(references.collect()),
    }
}

fn is_reference(item: &Value, key: &ModelKey, polymorphic: bool) -> bool {
    if polymorphic {
        PolymorphicId::from_value(item)
            .is_some_and(|p| p.type_name == key.model_name && p.id == key.id)
    } else {
        normalize_id(item).as_deref() == Some(key.id.as_str())
    }
}

/// Whether a foreign key value (single or array) references `key`
fn references(value: &Value, key: &ModelKey, polymorphic: bool) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|item| is_reference(item, key, polymorphic)),
        other => is_reference(other, key, polymorphic),
    }
}

fn without_reference(value: &Value, key: &ModelKey, polymorphic: bool) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|item| !is_reference(item, key, polymorphic))
                .cloned()
                .collect(),
        ),
        _ => Value::Null,
    }
}

/// Keys referenced by a stored foreign key value
fn referenced_keys(association: &ResolvedAssociation, value: &Value) -> Vec<ModelKey> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    };
    items
        .into_iter()
        .filter_map(|item| {
            if association.polymorphic {
                PolymorphicId::from_value(item).map(|p| ModelKey::new(p.type_name, p.id))
            } else {
                normalize_id(item).map(|id| ModelKey::new(&association.model_name, id))
            }
        })
        .collect()
}

/// Clear every stored reference to `target` held under `association`
fn release_references(
    schema: &Schema,
    association: &ResolvedAssociation,
    target: &ModelKey,
) -> OrmResult<usize> {
    let collection = schema.collection_name_for(&association.owner_model_name)?;
    let fk = association.foreign_key.as_str();
    let mut db = schema.db_mut();
    let holders = db.collection(&collection)?.where_fn(|r| {
        references(r.get(fk).unwrap_or(&Value::Null), target, association.polymorphic)
    });

    for holder in &holders {
        let Some(id) = record_id(holder) else {
            continue;
        };
        let value = without_reference(
            holder.get(fk).unwrap_or(&Value::Null),
            target,
            association.polymorphic,
        );
        db.collection_mut(&collection)?
            .update_one(&id, &single(fk, value))?;
    }
    if !holders.is_empty() {
        tracing::debug!(
            association = %association,
            target = %target,
            count = holders.len(),
            "released references"
        );
    }
    Ok(holders.len())
}

// ============================================================================
// Equality and Display
// ============================================================================

/// Same handle, or same type with equal ids
impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        if Rc::ptr_eq(&self.state, &other.state) {
            return true;
        }
        match (self.key(), other.key()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        match record_id(&state.attrs) {
            Some(id) => write!(f, "model:{}({})", state.model_name, id),
            None => write!(f, "model:{}(new)", state.model_name),
        }
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::Association;
    use crate::definition::{ModelDefinition, SchemaDefinition};
    use decoy_db::Db;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn blog() -> Schema {
        let definition = SchemaDefinition::new()
            .model(ModelDefinition::new("author").has_many("posts"))
            .model(ModelDefinition::new("post").belongs_to("author").has_many("tags"))
            .model(ModelDefinition::new("tag").has_many("posts"));
        Schema::from_definition(&definition, Db::new()).unwrap()
    }

    fn stored(schema: &Schema, collection: &str, id: &str) -> Value {
        Value::Object(schema.db().collection(collection).unwrap().find(id).unwrap())
    }

    #[test]
    fn test_new_model_defaults() {
        let schema = blog();
        let post = schema.new_model("post", json!({ "title": "Lorem" })).unwrap();

        assert!(post.is_new());
        assert_eq!(post.id(), None);
        assert_eq!(post.to_json(), json!({ "title": "Lorem", "authorId": null, "tagIds": [] }));
        assert_eq!(post.to_string(), "model:post(new)");
        assert!(schema.all("post").unwrap().is_empty());
    }

    #[test]
    fn test_save_assigns_id() {
        let schema = blog();
        let post = schema.new_model("post", json!({ "title": "Lorem" })).unwrap();
        post.save().unwrap();

        assert!(post.is_saved());
        assert_eq!(post.to_string(), "model:post(1)");
        assert_eq!(
            stored(&schema, "posts", "1"),
            json!({ "id": "1", "title": "Lorem", "authorId": null, "tagIds": [] })
        );
    }

    #[test]
    fn test_id_is_immutable_once_saved() {
        let schema = blog();
        let post = schema.new_model("post", json!({ "id": 5 })).unwrap();
        post.set("id", "6").unwrap();
        post.save().unwrap();
        assert_eq!(post.id(), Some("6".to_string()));

        assert!(post.set("id", 6).is_ok());
        let err = post.set("id", "7").unwrap_err();
        assert!(err.is_immutability());
    }

    #[test]
    fn test_undefined_association_key() {
        let schema = blog();
        let author = schema.create("author", Attrs::new()).unwrap();
        let err = schema
            .new_model("post", Attrs::new().with_one("editor", &author))
            .unwrap_err();
        assert!(matches!(err, OrmError::UndefinedAssociationKey { .. }));
    }

    #[test]
    fn test_type_mismatch() {
        let schema = blog();
        let tag = schema.create("tag", Attrs::new()).unwrap();
        let post = schema.create("post", Attrs::new()).unwrap();
        let err = post.set_one("author", Some(&tag)).unwrap_err();
        assert!(matches!(err, OrmError::AssociationTypeMismatch { .. }));
    }

    #[test]
    fn test_wrong_getter_kind() {
        let schema = blog();
        let post = schema.create("post", Attrs::new()).unwrap();
        assert!(post.many("author").is_err());
        assert!(post.one("tags").is_err());
        assert!(post.set("tags", json!([1])).is_err());
    }

    #[test]
    fn test_foreign_key_lookup_errors() {
        let schema = blog();
        let post = schema.create("post", Attrs::new()).unwrap();

        assert!(post.set("authorId", "9").unwrap_err().is_lookup());
        assert!(post.set("tagIds", json!(["1"])).unwrap_err().is_lookup());
        assert!(matches!(
            post.set("tagIds", json!("1")),
            Err(OrmError::InvalidAssociationValue { .. })
        ));
    }

    #[test]
    fn test_setters_are_local_until_save() {
        let schema = blog();
        let author = schema.create("author", Attrs::new()).unwrap();
        let post = schema.create("post", json!({ "title": "Lorem" })).unwrap();

        post.set("title", "Ipsum").unwrap();
        post.set_one("author", Some(&author)).unwrap();
        assert_eq!(post.attr("authorId"), json!("1"));
        assert_eq!(stored(&schema, "posts", "1")["authorId"], json!(null));
        assert_eq!(stored(&schema, "posts", "1")["title"], json!("Lorem"));

        post.save().unwrap();
        assert_eq!(stored(&schema, "posts", "1")["authorId"], json!("1"));
        assert_eq!(stored(&schema, "authors", "1")["postIds"], json!(["1"]));
    }

    #[test]
    fn test_setting_foreign_key_updates_inverse() {
        let schema = blog();
        schema.create("author", Attrs::new()).unwrap();
        let post = schema.create("post", Attrs::new()).unwrap();

        post.update("authorId", "1").unwrap();
        let author = post.one("author").unwrap().unwrap();
        assert_eq!(author.attr("postIds"), json!(["1"]));
    }

    #[test]
    fn test_reassignment_releases_previous_associate() {
        let schema = blog();
        let first = schema.create("author", Attrs::new()).unwrap();
        let second = schema.create("author", Attrs::new()).unwrap();
        let post = schema
            .create("post", Attrs::new().with_one("author", &first))
            .unwrap();
        assert_eq!(first.attr("postIds"), json!(["1"]));

        post.set_one("author", Some(&second)).unwrap();
        post.save().unwrap();

        assert_eq!(first.attr("postIds"), json!([]));
        assert_eq!(second.attr("postIds"), json!(["1"]));
        assert!(first.many("posts").unwrap().is_empty());
    }

    #[test]
    fn test_many_to_many_both_sides() {
        let schema = blog();
        let red = schema.create("tag", json!({ "name": "red" })).unwrap();
        let blue = schema.create("tag", json!({ "name": "blue" })).unwrap();
        let post = schema
            .create("post", Attrs::new().with_many("tags", vec![red.clone(), blue.clone()]))
            .unwrap();

        assert_eq!(post.attr("tagIds"), json!(["1", "2"]));
        assert_eq!(red.attr("postIds"), json!(["1"]));
        assert_eq!(blue.attr("postIds"), json!(["1"]));

        post.set_many("tags", vec![blue.clone()]).unwrap();
        post.save().unwrap();
        assert_eq!(red.attr("postIds"), json!([]));
        assert_eq!(blue.many("posts").unwrap().model_ids(), vec!["1"]);
    }

    #[test]
    fn test_unsaved_associates_are_saved_with_owner() {
        let schema = blog();
        let author = schema.new_model("author", json!({ "name": "Zelda" })).unwrap();
        let post = schema
            .new_model("post", Attrs::new().with_one("author", &author))
            .unwrap();
        assert!(author.many("posts").unwrap().includes(&post));

        post.save().unwrap();
        assert!(author.is_saved());
        assert_eq!(post.attr("authorId"), json!("1"));
        assert_eq!(author.attr("postIds"), json!(["1"]));
    }

    #[test]
    fn test_new_related_is_not_saved() {
        let schema = blog();
        let author = schema.create("author", Attrs::new()).unwrap();
        let post = author.new_related("posts", json!({ "title": "Draft" })).unwrap();

        assert!(post.is_new());
        assert_eq!(post.one("author").unwrap(), Some(author.clone()));
        assert_eq!(author.many("posts").unwrap().len(), 1);
        assert!(schema.all("post").unwrap().is_empty());
    }

    #[test]
    fn test_create_related_belongs_to() {
        let schema = blog();
        let post = schema.create("post", Attrs::new()).unwrap();
        let author = post.create_related("author", json!({ "name": "Link" })).unwrap();

        assert_eq!(post.attr("authorId"), json!("1"));
        assert_eq!(author.attr("postIds"), json!(["1"]));
    }

    #[test]
    fn test_dangling_ids_are_skipped() {
        let schema = blog();
        schema
            .db_mut()
            .load_data(json!({ "authors": [{ "id": "1", "postIds": ["4"] }] }).as_object().unwrap())
            .unwrap();
        let author = schema.find("author", "1").unwrap().unwrap();
        assert!(author.many("posts").unwrap().is_empty());
    }

    #[test]
    fn test_destroy_clears_references() {
        let schema = blog();
        let author = schema.create("author", Attrs::new()).unwrap();
        let post = author.create_related("posts", Attrs::new()).unwrap();
        let tag = schema
            .create("tag", Attrs::new().with_many("posts", vec![post.clone()]))
            .unwrap();

        post.destroy().unwrap();
        assert!(post.is_new());
        assert_eq!(author.attr("postIds"), json!([]));
        assert_eq!(tag.attr("postIds"), json!([]));

        author.destroy().unwrap();
        assert!(schema.all("author").unwrap().is_empty());
    }

    #[test]
    fn test_reload_discards_local_changes() {
        let schema = blog();
        let author = schema.create("author", Attrs::new()).unwrap();
        let post = schema.create("post", json!({ "title": "Lorem" })).unwrap();

        post.set("title", "Changed").unwrap();
        post.set_one("author", Some(&author)).unwrap();
        post.reload().unwrap();

        assert_eq!(post.attr("title"), json!("Lorem"));
        assert_eq!(post.one("author").unwrap(), None);

        let draft = schema.new_model("post", Attrs::new()).unwrap();
        assert!(draft.reload().is_ok());

        post.destroy().unwrap();
        assert!(post.reload().unwrap_err().is_lookup());
    }

    #[test]
    fn test_update_attrs() {
        let schema = blog();
        let author = schema.create("author", Attrs::new()).unwrap();
        let post = schema.create("post", Attrs::new()).unwrap();

        post.update_attrs(Attrs::new().set("title", "Lorem").with_one("author", &author))
            .unwrap();
        assert_eq!(
            stored(&schema, "posts", "1"),
            json!({ "id": "1", "title": "Lorem", "authorId": "1", "tagIds": [] })
        );
    }

    #[test]
    fn test_one_way_association_leaves_target_alone() {
        let definition = SchemaDefinition::new()
            .model(ModelDefinition::new("user").has_many("posts"))
            .model(
                ModelDefinition::new("post")
                    .with(Association::belongs_to("editor").model("user").no_inverse()),
            );
        let schema = Schema::from_definition(&definition, Db::new()).unwrap();
        let user = schema.create("user", Attrs::new()).unwrap();
        let post = schema
            .create("post", Attrs::new().with_one("editor", &user))
            .unwrap();

        assert_eq!(post.attr("editorId"), json!("1"));
        assert_eq!(user.attr("postIds"), json!([]));
    }

    #[test]
    fn test_equality() {
        let schema = blog();
        let a = schema.create("post", Attrs::new()).unwrap();
        let b = schema.find("post", "1").unwrap().unwrap();
        let tag = schema.create("tag", Attrs::new()).unwrap();
        let draft = schema.new_model("post", Attrs::new()).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, tag);
        assert_ne!(draft, schema.new_model("post", Attrs::new()).unwrap());
        assert_eq!(draft, draft.clone());
    }

    #[test]
    fn test_handles_on_one_row_stay_in_step() {
        let schema = blog();
        schema
            .create("post", json!({ "title": "Lorem", "body": "Ipsum" }))
            .unwrap();
        let a = schema.find("post", "1").unwrap().unwrap();
        let b = schema.find("post", "1").unwrap().unwrap();

        a.update("title", "Changed").unwrap();
        assert_eq!(b.attr("title"), json!("Changed"));

        b.save().unwrap();
        assert_eq!(stored(&schema, "posts", "1")["title"], json!("Changed"));

        // Each handle writes only what it changed
        b.set("body", "Dolor").unwrap();
        a.update("title", "Again").unwrap();
        assert_eq!(b.attr("title"), json!("Again"));
        assert_eq!(b.attr("body"), json!("Dolor"));
        b.save().unwrap();
        assert_eq!(
            stored(&schema, "posts", "1"),
            json!({ "id": "1", "title": "Again", "body": "Dolor", "authorId": null, "tagIds": [] })
        );
    }

    #[test]
    fn test_local_change_wins_until_reload() {
        let schema = blog();
        schema.create("post", json!({ "title": "Lorem" })).unwrap();
        let a = schema.find("post", "1").unwrap().unwrap();
        let b = schema.find("post", "1").unwrap().unwrap();

        b.set("title", "Local").unwrap();
        a.update("title", "Remote").unwrap();
        assert_eq!(b.attr("title"), json!("Local"));

        b.reload().unwrap();
        assert_eq!(b.attr("title"), json!("Remote"));
    }

    #[test]
    fn test_foreign_keys_follow_other_handles() {
        let schema = blog();
        let author = schema.create("author", Attrs::new()).unwrap();
        schema.create("post", Attrs::new()).unwrap();
        let a = schema.find("post", "1").unwrap().unwrap();
        let b = schema.find("post", "1").unwrap().unwrap();

        a.set_one("author", Some(&author)).unwrap();
        a.save().unwrap();
        assert_eq!(b.attr("authorId"), json!("1"));
        assert_eq!(b.one("author").unwrap(), Some(author.clone()));
    }

    #[test]
    fn test_destroyed_associates_drop_out_on_save() {
        let schema = blog();
        let author = schema.create("author", Attrs::new()).unwrap();
        let post = schema.create("post", Attrs::new()).unwrap();

        post.set_one("author", Some(&author)).unwrap();
        post.destroy().unwrap();
        author.save().unwrap();
        assert_eq!(author.attr("postIds"), json!([]));
        assert!(schema.all("post").unwrap().is_empty());

        let draft = author.new_related("posts", Attrs::new()).unwrap();
        draft.save().unwrap();
        draft.destroy().unwrap();
        author.save().unwrap();
        assert_eq!(author.attr("postIds"), json!([]));

        let third = schema.create("post", Attrs::new()).unwrap();
        author.set_many("posts", vec![third.clone()]).unwrap();
        third.destroy().unwrap();
        author.save().unwrap();
        assert_eq!(author.attr("postIds"), json!([]));
    }

    #[test]
    fn test_failed_save_keeps_pending_assignments() {
        let schema = blog();
        schema.create("author", Attrs::new()).unwrap();
        let tag = schema.create("tag", Attrs::new()).unwrap();
        let post = schema.create("post", Attrs::new()).unwrap();
        let clash = schema.new_model("author", json!({ "id": "1" })).unwrap();

        post.set_one("author", Some(&clash)).unwrap();
        post.set_many("tags", vec![tag.clone()]).unwrap();
        assert!(post.save().unwrap_err().is_identity());
        assert_eq!(post.attr("tagIds"), json!(["1"]));
        assert_eq!(stored(&schema, "posts", "1")["tagIds"], json!([]));

        clash.set("id", "2").unwrap();
        post.save().unwrap();
        assert_eq!(stored(&schema, "posts", "1")["authorId"], json!("2"));
        assert_eq!(stored(&schema, "authors", "2")["postIds"], json!(["1"]));
        assert_eq!(tag.attr("postIds"), json!(["1"]));
    }

    #[test]
    fn test_saved_associates_are_held_by_key() {
        let schema = blog();
        let author = schema.create("author", Attrs::new()).unwrap();
        let post = schema.create("post", Attrs::new()).unwrap();

        post.set_one("author", Some(&author)).unwrap();
        author.set_many("posts", vec![post.clone()]).unwrap();
        assert_eq!(Rc::strong_count(&author.state), 1);
        assert_eq!(Rc::strong_count(&post.state), 1);
    }

    #[test]
    fn test_dropped_draft_assignment_lapses() {
        let schema = blog();
        let author = schema.create("author", Attrs::new()).unwrap();
        {
            let draft = schema
                .new_model("post", Attrs::new().with_one("author", &author))
                .unwrap();
            assert!(author.many("posts").unwrap().includes(&draft));
            assert_eq!(Rc::strong_count(&draft.state), 1);
        }

        assert!(author.many("posts").unwrap().is_empty());
        author.save().unwrap();
        assert_eq!(author.attr("postIds"), json!([]));
    }
}
