//! Association registry and inverse resolution
//!
//! The resolver owns the registered model types, each with its resolved
//! associations, and answers "which association on type M is the inverse of
//! association A?".
//!
//! Resolution rules for association `A` (declared on owner type `O`) asked
//! from type `M`:
//!
//! 1. `A` declared one-way: no inverse.
//! 2. `A` names its inverse: that association on `M` must exist, point back
//!    at `O` (or be polymorphic) and must not name a different inverse.
//! 3. Otherwise the candidates are the associations on `M` targeting `O`
//!    that are not one-way and do not name some other inverse. One that
//!    explicitly names `A` wins; zero candidates means no inverse; more than
//!    one is ambiguous.
//!
//! Resolution is symmetric: a pair is only returned when neither side has a
//! competing implicit candidate. The explicit claim in rule 3 is the one
//! exception: asked from the claimed side, `A` resolves even though `M` has
//! other candidates, while those other candidates stay ambiguous when asked
//! from `O`. Successful results are memoized per
//! `(owner, association, requesting type)` until the next registration.

use crate::association::{InverseSpec, ResolvedAssociation};
use crate::definition::ModelDefinition;
use decoy_core::inflector::pluralize;
use decoy_core::{OrmError, OrmResult, Validatable};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// ModelClass
// ============================================================================

/// A registered model type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelClass {
    pub name: String,
    /// Record store collection holding this type's rows
    pub collection_name: String,
    pub associations: Vec<ResolvedAssociation>,
}

impl ModelClass {
    /// Resolve a definition into a model type
    pub fn from_definition(definition: &ModelDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            collection_name: pluralize(&definition.name),
            associations: definition
                .associations
                .iter()
                .map(|a| a.resolve(&definition.name))
                .collect(),
        }
    }

    /// Association by property name
    pub fn association(&self, name: &str) -> Option<&ResolvedAssociation> {
        self.associations.iter().find(|a| a.name == name)
    }

    /// Association stored under a foreign key
    pub fn association_for_foreign_key(&self, key: &str) -> Option<&ResolvedAssociation> {
        self.associations.iter().find(|a| a.foreign_key == key)
    }

    /// Whether the attribute is one of this type's foreign keys
    pub fn is_foreign_key(&self, key: &str) -> bool {
        self.association_for_foreign_key(key).is_some()
    }

    /// belongsTo associations first, then hasMany, each in declaration order
    pub fn associations_in_save_order(&self) -> Vec<ResolvedAssociation> {
        let (mut ordered, many): (Vec<_>, Vec<_>) = self
            .associations
            .iter()
            .cloned()
            .partition(|a| a.is_belongs_to());
        ordered.extend(many);
        ordered
    }
}

// ============================================================================
// AssociationResolver
// ============================================================================

type InverseKey = (String, String, String);

/// Registered model types plus the inverse memo
#[derive(Debug, Default)]
pub struct AssociationResolver {
    models: BTreeMap<String, ModelClass>,
    inverses: RefCell<HashMap<InverseKey, Option<ResolvedAssociation>>>,
}

impl AssociationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model type
    ///
    /// Clears the inverse memo, since a new type can change any answer.
    pub fn register(&mut self, definition: &ModelDefinition) -> OrmResult<&ModelClass> {
        definition.validate()?;
        if self.models.contains_key(&definition.name) {
            return Err(OrmError::DuplicateModel(definition.name.clone()));
        }

        self.inverses.borrow_mut().clear();
        let class = ModelClass::from_definition(definition);
        tracing::debug!(
            model = %class.name,
            collection = %class.collection_name,
            associations = class.associations.len(),
            "registered model type"
        );
        Ok(&*self.models.entry(definition.name.clone()).or_insert(class))
    }

    /// Whether a model type is registered
    pub fn contains(&self, model_name: &str) -> bool {
        self.models.contains_key(model_name)
    }

    /// Registered type names, sorted
    pub fn model_names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// Look up a registered model type
    pub fn model(&self, model_name: &str) -> OrmResult<&ModelClass> {
        self.models
            .get(model_name)
            .ok_or_else(|| OrmError::UnknownModel(model_name.to_string()))
    }

    /// Look up one association of a model type
    pub fn association_for(
        &self,
        model_name: &str,
        association_name: &str,
    ) -> OrmResult<&ResolvedAssociation> {
        self.model(model_name)?
            .association(association_name)
            .ok_or_else(|| OrmError::unknown_association(model_name, association_name))
    }

    /// Every association, on any type, whose foreign keys can reference `model_name`
    pub fn dependent_associations_for(&self, model_name: &str) -> Vec<ResolvedAssociation> {
        self.models
            .values()
            .flat_map(|class| class.associations.iter())
            .filter(|a| a.accepts(model_name))
            .cloned()
            .collect()
    }

    // ========================================================================
    // Inverse Resolution
    // ========================================================================

    /// The association on `requesting_model` that is the inverse of `association`
    pub fn inverse_for(
        &self,
        association: &ResolvedAssociation,
        requesting_model: &str,
    ) -> OrmResult<Option<ResolvedAssociation>> {
        let key = (
            association.owner_model_name.clone(),
            association.name.clone(),
            requesting_model.to_string(),
        );
        if let Some(cached) = self.inverses.borrow().get(&key) {
            return Ok(cached.clone());
        }

        let resolved = self.resolve_inverse(association, requesting_model)?;
        tracing::debug!(
            association = %association,
            requesting = %requesting_model,
            inverse = ?resolved.as_ref().map(|a| a.to_string()),
            "resolved inverse"
        );
        self.inverses.borrow_mut().insert(key, resolved.clone());
        Ok(resolved)
    }

    fn resolve_inverse(
        &self,
        association: &ResolvedAssociation,
        requesting_model: &str,
    ) -> OrmResult<Option<ResolvedAssociation>> {
        if association.inverse == InverseSpec::Disabled {
            return Ok(None);
        }
        let target = self.model(requesting_model)?;
        self.check_explicit_claims(association, target)?;

        if let InverseSpec::Named(name) = &association.inverse {
            return self.explicit_inverse(association, target, name).map(Some);
        }

        let candidates = implicit_candidates(association, target);
        if let Some(claimed) = candidates
            .iter()
            .find(|c| c.inverse.name() == Some(association.name.as_str()))
        {
            return Ok(Some((*claimed).clone()));
        }

        match candidates.as_slice() {
            [] => Ok(None),
            [candidate] => {
                // The reverse direction must be just as unambiguous
                let owner = self.model(&association.owner_model_name)?;
                if implicit_candidates(candidate, owner).len() > 1 {
                    return Err(OrmError::AmbiguousInverse {
                        model: owner.name.clone(),
                        owner: candidate.owner_model_name.clone(),
                        association: candidate.name.clone(),
                    });
                }
                Ok(Some((*candidate).clone()))
            }
            _ => Err(OrmError::AmbiguousInverse {
                model: target.name.clone(),
                owner: association.owner_model_name.clone(),
                association: association.name.clone(),
            }),
        }
    }

    fn check_explicit_claims(
        &self,
        association: &ResolvedAssociation,
        target: &ModelClass,
    ) -> OrmResult<()> {
        let claims = target
            .associations
            .iter()
            .filter(|c| c.accepts(&association.owner_model_name))
            .filter(|c| c.inverse.name() == Some(association.name.as_str()))
            .count();
        if claims > 1 {
            return Err(OrmError::MultipleExplicitInverses {
                model: target.name.clone(),
                owner: association.owner_model_name.clone(),
                association: association.name.clone(),
            });
        }
        Ok(())
    }

    fn explicit_inverse(
        &self,
        association: &ResolvedAssociation,
        target: &ModelClass,
        name: &str,
    ) -> OrmResult<ResolvedAssociation> {
        let mismatch = |message: String| {
            OrmError::inverse_mismatch(&association.owner_model_name, &association.name, message)
        };

        let candidate = target.association(name).ok_or_else(|| {
            mismatch(format!(
                "the '{}' model has no association named '{}'",
                target.name, name
            ))
        })?;

        if !candidate.accepts(&association.owner_model_name) {
            return Err(mismatch(format!(
                "'{}' points at '{}', not '{}'",
                candidate, candidate.model_name, association.owner_model_name
            )));
        }

        match &candidate.inverse {
            InverseSpec::Named(back) if *back != association.name => Err(mismatch(format!(
                "'{}' names '{}' as its inverse",
                candidate, back
            ))),
            InverseSpec::Disabled => Err(mismatch(format!("'{}' is declared one-way", candidate))),
            _ => Ok(candidate.clone()),
        }
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Check every association against the registered types
    ///
    /// Non-polymorphic targets must be registered and explicit inverses must
    /// resolve.
    pub fn validate(&self) -> OrmResult<()> {
        for class in self.models.values() {
            for association in &class.associations {
                if association.polymorphic {
                    continue;
                }
                if !self.contains(&association.model_name) {
                    return Err(OrmError::InvalidDefinition(format!(
                        "'{}' targets '{}', which is not a registered model",
                        association, association.model_name
                    )));
                }
                if !association.inverse.is_implicit() {
                    self.inverse_for(association, &association.model_name)?;
                }
            }
        }
        Ok(())
    }
}

/// Associations on `target` that could implicitly be the inverse of `association`
fn implicit_candidates<'a>(
    association: &ResolvedAssociation,
    target: &'a ModelClass,
) -> Vec<&'a ResolvedAssociation> {
    target
        .associations
        .iter()
        .filter(|c| !c.polymorphic && c.model_name == association.owner_model_name)
        .filter(|c| match &c.inverse {
            InverseSpec::Implicit => true,
            InverseSpec::Named(name) => *name == association.name,
            InverseSpec::Disabled => false,
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::Association;
    use pretty_assertions::assert_eq;

    fn resolver(definitions: Vec<ModelDefinition>) -> AssociationResolver {
        let mut resolver = AssociationResolver::new();
        for definition in &definitions {
            resolver.register(definition).unwrap();
        }
        resolver
    }

    fn inverse_name(resolver: &AssociationResolver, model: &str, name: &str, from: &str) -> Option<String> {
        let association = resolver.association_for(model, name).unwrap().clone();
        resolver
            .inverse_for(&association, from)
            .unwrap()
            .map(|a| a.name)
    }

    #[test]
    fn test_model_class_names() {
        let resolver = resolver(vec![ModelDefinition::new("blogPost").belongs_to("author")]);
        let class = resolver.model("blogPost").unwrap();
        assert_eq!(class.collection_name, "blogPosts");
        assert!(class.is_foreign_key("authorId"));
        assert!(!class.is_foreign_key("author"));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut resolver = resolver(vec![ModelDefinition::new("post")]);
        let err = resolver.register(&ModelDefinition::new("post")).unwrap_err();
        assert!(matches!(err, OrmError::DuplicateModel(_)));
    }

    #[test]
    fn test_unknown_association() {
        let resolver = resolver(vec![ModelDefinition::new("post")]);
        let err = resolver.association_for("post", "author").unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(
            resolver.association_for("ghost", "author"),
            Err(OrmError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_implicit_one_to_many() {
        let resolver = resolver(vec![
            ModelDefinition::new("author").has_many("posts"),
            ModelDefinition::new("post").belongs_to("author"),
        ]);
        assert_eq!(inverse_name(&resolver, "author", "posts", "post"), Some("author".into()));
        assert_eq!(inverse_name(&resolver, "post", "author", "author"), Some("posts".into()));
    }

    #[test]
    fn test_one_way_declarations() {
        let resolver = resolver(vec![
            ModelDefinition::new("user").has_many("posts"),
            ModelDefinition::new("post")
                .belongs_to("user")
                .with(Association::belongs_to("editor").model("user").no_inverse()),
        ]);
        assert_eq!(inverse_name(&resolver, "post", "editor", "user"), None);
        // The one-way editor is not a candidate either
        assert_eq!(inverse_name(&resolver, "user", "posts", "post"), Some("user".into()));
    }

    #[test]
    fn test_explicit_pairs() {
        let resolver = resolver(vec![
            ModelDefinition::new("user")
                .with(Association::has_many("authoredPosts").model("post").inverse("author"))
                .with(Association::has_many("editedPosts").model("post").inverse("editor")),
            ModelDefinition::new("post")
                .with(Association::belongs_to("author").model("user").inverse("authoredPosts"))
                .with(Association::belongs_to("editor").model("user").inverse("editedPosts")),
        ]);
        assert_eq!(
            inverse_name(&resolver, "user", "authoredPosts", "post"),
            Some("author".into())
        );
        assert_eq!(
            inverse_name(&resolver, "post", "editor", "user"),
            Some("editedPosts".into())
        );
        assert!(resolver.validate().is_ok());
    }

    #[test]
    fn test_explicit_claim_beats_implicit_candidates() {
        let resolver = resolver(vec![
            ModelDefinition::new("user").has_many("posts"),
            ModelDefinition::new("post")
                .with(Association::belongs_to("author").model("user").inverse("posts"))
                .with(Association::belongs_to("editor").model("user")),
        ]);
        assert_eq!(inverse_name(&resolver, "user", "posts", "post"), Some("author".into()));

        // The unclaimed side still sees two candidates for `posts`
        let editor = resolver.association_for("post", "editor").unwrap().clone();
        assert!(resolver.inverse_for(&editor, "user").unwrap_err().is_ambiguous_inverse());
    }

    #[test]
    fn test_ambiguous_inverse_from_both_sides() {
        let resolver = resolver(vec![
            ModelDefinition::new("post")
                .with(Association::has_many("authors").model("user"))
                .with(Association::has_many("editors").model("user")),
            ModelDefinition::new("user").belongs_to("post"),
        ]);

        let belongs_to = resolver.association_for("user", "post").unwrap().clone();
        let err = resolver.inverse_for(&belongs_to, "post").unwrap_err();
        assert!(err.is_ambiguous_inverse());

        for name in ["authors", "editors"] {
            let has_many = resolver.association_for("post", name).unwrap().clone();
            let err = resolver.inverse_for(&has_many, "user").unwrap_err();
            assert!(err.is_ambiguous_inverse());
        }
    }

    #[test]
    fn test_missing_explicit_inverse() {
        let resolver = resolver(vec![
            ModelDefinition::new("user").has_many("posts"),
            ModelDefinition::new("post").with(Association::belongs_to("user").inverse("articles")),
        ]);
        let association = resolver.association_for("post", "user").unwrap().clone();
        let err = resolver.inverse_for(&association, "user").unwrap_err();
        assert!(matches!(err, OrmError::InverseMismatch { .. }));
        assert!(resolver.validate().is_err());
    }

    #[test]
    fn test_explicit_inverse_must_point_back() {
        let resolver = resolver(vec![
            ModelDefinition::new("user")
                .with(Association::has_many("posts").inverse("writer"))
                .has_many("comments"),
            ModelDefinition::new("post")
                .with(Association::belongs_to("author").model("user").inverse("posts"))
                .with(Association::belongs_to("writer").model("user").inverse("comments")),
            ModelDefinition::new("comment").belongs_to("user"),
        ]);
        let author = resolver.association_for("post", "author").unwrap().clone();
        let err = resolver.inverse_for(&author, "user").unwrap_err();
        assert!(err.to_string().contains("names 'writer' as its inverse"));
    }

    #[test]
    fn test_multiple_explicit_inverses() {
        let resolver = resolver(vec![
            ModelDefinition::new("user").has_many("posts"),
            ModelDefinition::new("post")
                .with(Association::belongs_to("author").model("user").inverse("posts"))
                .with(Association::belongs_to("editor").model("user").inverse("posts")),
        ]);
        let posts = resolver.association_for("user", "posts").unwrap().clone();
        let err = resolver.inverse_for(&posts, "post").unwrap_err();
        assert!(matches!(err, OrmError::MultipleExplicitInverses { .. }));
    }

    #[test]
    fn test_reflexive_association_is_its_own_inverse() {
        let resolver = resolver(vec![
            ModelDefinition::new("user").with(Association::has_many("friends").model("user")),
        ]);
        assert_eq!(inverse_name(&resolver, "user", "friends", "user"), Some("friends".into()));
    }

    #[test]
    fn test_self_pointing_one_way() {
        let resolver = resolver(vec![ModelDefinition::new("user").with(
            Association::belongs_to("representative").model("user").no_inverse(),
        )]);
        assert_eq!(inverse_name(&resolver, "user", "representative", "user"), None);
    }

    #[test]
    fn test_polymorphic_inverses() {
        let resolver = resolver(vec![
            ModelDefinition::new("post").with(Association::has_many("comments").inverse("commentable")),
            ModelDefinition::new("comment").with(Association::belongs_to("commentable").polymorphic()),
        ]);
        assert_eq!(
            inverse_name(&resolver, "comment", "commentable", "post"),
            Some("comments".into())
        );
        assert_eq!(
            inverse_name(&resolver, "post", "comments", "comment"),
            Some("commentable".into())
        );
        assert!(resolver.validate().is_ok());
    }

    #[test]
    fn test_registration_clears_memo() {
        let mut resolver = resolver(vec![
            ModelDefinition::new("author").has_many("posts"),
            ModelDefinition::new("post").belongs_to("author"),
        ]);
        let posts = resolver.association_for("author", "posts").unwrap().clone();
        assert!(resolver.inverse_for(&posts, "post").unwrap().is_some());
        assert_eq!(resolver.inverses.borrow().len(), 1);

        resolver.register(&ModelDefinition::new("tag")).unwrap();
        assert!(resolver.inverses.borrow().is_empty());
    }

    #[test]
    fn test_dependent_associations() {
        let resolver = resolver(vec![
            ModelDefinition::new("author").has_many("posts"),
            ModelDefinition::new("post").belongs_to("author"),
            ModelDefinition::new("comment").with(Association::belongs_to("commentable").polymorphic()),
        ]);
        let names: Vec<String> = resolver
            .dependent_associations_for("post")
            .iter()
            .map(|a| a.to_string())
            .collect();
        assert_eq!(names, vec!["author.posts", "comment.commentable"]);
    }

    #[test]
    fn test_validate_unregistered_target() {
        let resolver = resolver(vec![ModelDefinition::new("post").belongs_to("author")]);
        let err = resolver.validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_save_order() {
        let resolver = resolver(vec![
            ModelDefinition::new("post")
                .has_many("tags")
                .belongs_to("author")
                .has_many("comments")
                .belongs_to("editor"),
        ]);
        let order: Vec<String> = resolver
            .model("post")
            .unwrap()
            .associations_in_save_order()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(order, vec!["author", "editor", "tags", "comments"]);
    }
}
