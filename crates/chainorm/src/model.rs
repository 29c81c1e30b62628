//! Model definitions and the relation registry.
//!
//! Models are declared with [`ModelDef`] and frozen into a [`Registry`]. Building the
//! registry resolves every declared relation against its target model (default keys,
//! pivot table candidates), so the relation graph is immutable for the registry's lifetime.
//! The only interior mutability is the write-once pivot-name cell on [`Pivot`].
//!
//! ```ignore
//! let registry = Registry::builder()
//!     .register(ModelDef::new("user").table("users").has_many("posts", "post"))
//!     .register(ModelDef::new("post").table("posts").belongs_to("author", "user"))
//!     .build()?;
//! ```

use crate::error::{OrmError, OrmResult};
use crate::naming::singular;
use crate::row::Row;
use crate::schema::{SchemaModel, SchemaProvider};
use crate::state::ModelClauses;
use crate::validate::SchemaValidator;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Relation cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
    BelongsToMany,
}

impl RelationKind {
    /// `true` when loaded children are spliced in as an array.
    pub fn is_collection(self) -> bool {
        matches!(self, RelationKind::HasMany | RelationKind::BelongsToMany)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelationKind::HasOne => "hasOne",
            RelationKind::HasMany => "hasMany",
            RelationKind::BelongsTo => "belongsTo",
            RelationKind::BelongsToMany => "belongsToMany",
        })
    }
}

/// Declared relation keys. Anything left unset is inferred when the registry is built.
#[derive(Debug, Clone, Default)]
pub struct RelationDescriptor {
    target: String,
    local_key: Option<String>,
    foreign_key: Option<String>,
    pivot_table: Option<String>,
    pivot_owner_key: Option<String>,
    pivot_target_key: Option<String>,
}

impl RelationDescriptor {
    /// Relation pointing at the model registered as `target`.
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// Column on the owner's rows that holds the join value.
    pub fn local_key(mut self, column: impl Into<String>) -> Self {
        self.local_key = Some(column.into());
        self
    }

    /// Column on the target's rows matched against the local key.
    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    /// Explicit pivot table (belongsToMany only); disables pivot-name probing.
    pub fn pivot(mut self, table: impl Into<String>) -> Self {
        self.pivot_table = Some(table.into());
        self
    }

    /// Pivot columns pointing at the owner and at the target.
    pub fn pivot_keys(mut self, owner_key: impl Into<String>, target_key: impl Into<String>) -> Self {
        self.pivot_owner_key = Some(owner_key.into());
        self.pivot_target_key = Some(target_key.into());
        self
    }
}

impl From<&str> for RelationDescriptor {
    fn from(target: &str) -> Self {
        Self::to(target)
    }
}

impl From<String> for RelationDescriptor {
    fn from(target: String) -> Self {
        Self::to(target)
    }
}

/// Pivot table of a belongsToMany relation.
#[derive(Debug)]
pub struct Pivot {
    candidates: Vec<String>,
    /// Pivot column holding the owner's key.
    pub owner_key: String,
    /// Pivot column holding the target's key.
    pub target_key: String,
    resolved: OnceLock<String>,
}

impl Pivot {
    fn explicit(table: String, owner_key: String, target_key: String) -> Self {
        let resolved = OnceLock::new();
        let _ = resolved.set(table.clone());
        Self {
            candidates: vec![table],
            owner_key,
            target_key,
            resolved,
        }
    }

    fn inferred(owner: &str, target: &str, owner_key: String, target_key: String) -> Self {
        Self {
            candidates: vec![format!("{owner}_{target}"), format!("{target}_{owner}")],
            owner_key,
            target_key,
            resolved: OnceLock::new(),
        }
    }

    /// Table names to probe, in probing order.
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// The cached table name, once resolved.
    pub fn resolved(&self) -> Option<&str> {
        self.resolved.get().map(String::as_str)
    }

    /// The resolved name, or the first candidate when nothing was probed yet.
    pub fn table(&self) -> &str {
        self.resolved()
            .or_else(|| self.candidates.first().map(String::as_str))
            .unwrap_or_default()
    }

    /// Cache `table` as the pivot name. The first resolution wins.
    pub(crate) fn resolve(&self, table: &str) -> &str {
        self.resolved.get_or_init(|| table.to_string())
    }
}

/// A resolved relation of one model.
#[derive(Debug)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    /// Registered name of the target model.
    pub target: String,
    /// Column on the owner's rows.
    pub local_key: String,
    /// Column on the target's rows.
    pub foreign_key: String,
    pub pivot: Option<Pivot>,
}

/// Hook invoked after a model's results are finalized.
///
/// Failures abort the call and surface as [`OrmError::Observer`].
pub trait ModelObserver: Send + Sync {
    fn after_read(&self, model: &Model, rows: &[Row]) -> OrmResult<()> {
        let _ = (model, rows);
        Ok(())
    }

    fn after_insert(&self, model: &Model, rows: &[Row]) -> OrmResult<()> {
        let _ = (model, rows);
        Ok(())
    }

    fn after_update(&self, model: &Model, affected: u64) -> OrmResult<()> {
        let _ = (model, affected);
        Ok(())
    }

    fn after_delete(&self, model: &Model, affected: u64) -> OrmResult<()> {
        let _ = (model, affected);
        Ok(())
    }
}

/// Builder for one model.
pub struct ModelDef {
    name: String,
    table: Option<String>,
    primary_key: String,
    soft_delete_column: Option<String>,
    created_at_column: Option<String>,
    updated_at_column: Option<String>,
    uuid_primary_key: bool,
    hidden: Vec<String>,
    schema: Option<SchemaModel>,
    validator: Option<Arc<dyn SchemaValidator>>,
    validate_with_schema: bool,
    observers: Vec<Arc<dyn ModelObserver>>,
    relations: Vec<(String, RelationKind, RelationDescriptor)>,
}

impl ModelDef {
    /// A model registered as `name`; its table defaults to the same name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            primary_key: "id".to_string(),
            soft_delete_column: None,
            created_at_column: None,
            updated_at_column: None,
            uuid_primary_key: false,
            hidden: Vec::new(),
            schema: None,
            validator: None,
            validate_with_schema: false,
            observers: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Enable soft deletes on `column` (usually `deleted_at`).
    pub fn soft_deletes(mut self, column: impl Into<String>) -> Self {
        self.soft_delete_column = Some(column.into());
        self
    }

    /// Maintain `created_at` / `updated_at` on writes.
    pub fn timestamps(self) -> Self {
        self.timestamp_columns("created_at", "updated_at")
    }

    pub fn timestamp_columns(
        mut self,
        created_at: impl Into<String>,
        updated_at: impl Into<String>,
    ) -> Self {
        self.created_at_column = Some(created_at.into());
        self.updated_at_column = Some(updated_at.into());
        self
    }

    /// Fill the primary key with a UUID v4 on insert when the caller leaves it out.
    pub fn uuid_primary_key(mut self) -> Self {
        self.uuid_primary_key = true;
        self
    }

    /// Columns stripped from every result row.
    pub fn hidden<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hidden.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn schema(mut self, schema: SchemaModel) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Validate writes with a custom hook.
    pub fn validator<V: SchemaValidator + 'static>(mut self, validator: V) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Validate writes against the model's schema.
    pub fn validate_with_schema(mut self) -> Self {
        self.validate_with_schema = true;
        self
    }

    pub fn observer<O: ModelObserver + 'static>(mut self, observer: O) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn has_one(self, name: impl Into<String>, descriptor: impl Into<RelationDescriptor>) -> Self {
        self.relation(name, RelationKind::HasOne, descriptor)
    }

    pub fn has_many(self, name: impl Into<String>, descriptor: impl Into<RelationDescriptor>) -> Self {
        self.relation(name, RelationKind::HasMany, descriptor)
    }

    pub fn belongs_to(
        self,
        name: impl Into<String>,
        descriptor: impl Into<RelationDescriptor>,
    ) -> Self {
        self.relation(name, RelationKind::BelongsTo, descriptor)
    }

    pub fn belongs_to_many(
        self,
        name: impl Into<String>,
        descriptor: impl Into<RelationDescriptor>,
    ) -> Self {
        self.relation(name, RelationKind::BelongsToMany, descriptor)
    }

    pub fn relation(
        mut self,
        name: impl Into<String>,
        kind: RelationKind,
        descriptor: impl Into<RelationDescriptor>,
    ) -> Self {
        self.relations.push((name.into(), kind, descriptor.into()));
        self
    }

    fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }
}

/// A registered model.
pub struct Model {
    name: String,
    table: String,
    primary_key: String,
    soft_delete_column: Option<String>,
    created_at_column: Option<String>,
    updated_at_column: Option<String>,
    uuid_primary_key: bool,
    hidden: Vec<String>,
    schema: Option<SchemaModel>,
    validator: Option<Arc<dyn SchemaValidator>>,
    observers: Vec<Arc<dyn ModelObserver>>,
    relations: Vec<Relation>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("soft_delete_column", &self.soft_delete_column)
            .field("relations", &self.relations)
            .field("has_validator", &self.validator.is_some())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl Model {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn soft_delete_column(&self) -> Option<&str> {
        self.soft_delete_column.as_deref()
    }

    pub fn hidden(&self) -> &[String] {
        &self.hidden
    }

    pub fn schema(&self) -> Option<&SchemaModel> {
        self.schema.as_ref()
    }

    pub fn validator(&self) -> Option<&dyn SchemaValidator> {
        self.validator.as_deref()
    }

    pub fn observers(&self) -> &[Arc<dyn ModelObserver>] {
        &self.observers
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Model-only clause values a fresh query starts with.
    pub fn clauses(&self) -> ModelClauses {
        ModelClauses {
            soft_delete_column: self.soft_delete_column.clone(),
            created_at_column: self.created_at_column.clone(),
            updated_at_column: self.updated_at_column.clone(),
            uuid_column: self.uuid_primary_key.then(|| self.primary_key.clone()),
            scope: Default::default(),
        }
    }
}

impl SchemaProvider for Model {
    fn schema_model(&self) -> Option<&SchemaModel> {
        self.schema.as_ref()
    }
}

/// Immutable set of registered models.
#[derive(Debug, Default)]
pub struct Registry {
    models: HashMap<String, Arc<Model>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Model>> {
        self.models.get(name)
    }

    /// Look up a model, failing with a configuration error when it is not registered.
    pub fn model(&self, name: &str) -> OrmResult<&Arc<Model>> {
        self.get(name)
            .ok_or_else(|| OrmError::configuration(format!("unknown model `{name}`")))
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<Model>> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Collects [`ModelDef`]s and resolves their relations.
#[derive(Default)]
pub struct RegistryBuilder {
    defs: Vec<ModelDef>,
}

impl RegistryBuilder {
    pub fn register(mut self, def: ModelDef) -> Self {
        self.defs.push(def);
        self
    }

    pub fn build(self) -> OrmResult<Registry> {
        let mut seen = HashSet::new();
        for def in &self.defs {
            if !seen.insert(def.name.as_str()) {
                return Err(OrmError::configuration(format!(
                    "model `{}` is registered twice",
                    def.name
                )));
            }
        }
        let index: HashMap<&str, &ModelDef> =
            self.defs.iter().map(|d| (d.name.as_str(), d)).collect();

        let mut resolved = Vec::with_capacity(self.defs.len());
        for def in &self.defs {
            let mut relations: Vec<Relation> = Vec::with_capacity(def.relations.len());
            for (name, kind, descriptor) in &def.relations {
                if relations.iter().any(|r| r.name == *name) {
                    return Err(OrmError::configuration(format!(
                        "relation `{name}` is declared twice on model `{}`",
                        def.name
                    )));
                }
                let target = index.get(descriptor.target.as_str()).ok_or_else(|| {
                    OrmError::configuration(format!(
                        "relation `{}.{name}` targets unknown model `{}`",
                        def.name, descriptor.target
                    ))
                })?;
                relations.push(resolve_relation(def, target, name, *kind, descriptor)?);
            }
            resolved.push(relations);
        }

        let models = self
            .defs
            .into_iter()
            .zip(resolved)
            .map(|(def, relations)| {
                let table = def.table_name().to_string();
                let validator = match (def.validator, def.validate_with_schema, &def.schema) {
                    (Some(v), _, _) => Some(v),
                    (None, true, Some(schema)) => {
                        Some(Arc::new(schema.clone()) as Arc<dyn SchemaValidator>)
                    }
                    _ => None,
                };
                let model = Model {
                    name: def.name.clone(),
                    table,
                    primary_key: def.primary_key,
                    soft_delete_column: def.soft_delete_column,
                    created_at_column: def.created_at_column,
                    updated_at_column: def.updated_at_column,
                    uuid_primary_key: def.uuid_primary_key,
                    hidden: def.hidden,
                    schema: def.schema,
                    validator,
                    observers: def.observers,
                    relations,
                };
                (def.name, Arc::new(model))
            })
            .collect();
        Ok(Registry { models })
    }
}

fn resolve_relation(
    owner: &ModelDef,
    target: &ModelDef,
    name: &str,
    kind: RelationKind,
    descriptor: &RelationDescriptor,
) -> OrmResult<Relation> {
    let owner_singular = singular(owner.table_name());
    let target_singular = singular(target.table_name());

    if kind != RelationKind::BelongsToMany
        && (descriptor.pivot_table.is_some() || descriptor.pivot_owner_key.is_some())
    {
        return Err(OrmError::configuration(format!(
            "relation `{}.{name}` is {kind} and cannot declare a pivot table",
            owner.name
        )));
    }

    let (local_key, foreign_key) = match kind {
        RelationKind::HasOne | RelationKind::HasMany => (
            owner.primary_key.clone(),
            format!("{owner_singular}_id"),
        ),
        RelationKind::BelongsTo => (
            format!("{target_singular}_id"),
            target.primary_key.clone(),
        ),
        RelationKind::BelongsToMany => (owner.primary_key.clone(), target.primary_key.clone()),
    };
    let local_key = descriptor.local_key.clone().unwrap_or(local_key);
    let foreign_key = descriptor.foreign_key.clone().unwrap_or(foreign_key);

    let pivot = (kind == RelationKind::BelongsToMany).then(|| {
        let owner_key = descriptor
            .pivot_owner_key
            .clone()
            .unwrap_or_else(|| format!("{owner_singular}_id"));
        let target_key = descriptor
            .pivot_target_key
            .clone()
            .unwrap_or_else(|| format!("{target_singular}_id"));
        match &descriptor.pivot_table {
            Some(table) => Pivot::explicit(table.clone(), owner_key, target_key),
            None => Pivot::inferred(&owner_singular, &target_singular, owner_key, target_key),
        }
    });

    Ok(Relation {
        name: name.to_string(),
        kind,
        target: target.name.clone(),
        local_key,
        foreign_key,
        pivot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::builder()
            .register(
                ModelDef::new("user")
                    .table("users")
                    .has_many("posts", "post")
                    .has_one("profile", "profile")
                    .belongs_to_many("roles", "role"),
            )
            .register(
                ModelDef::new("post")
                    .table("posts")
                    .belongs_to("user", "user")
                    .belongs_to("editor", RelationDescriptor::to("user").local_key("edited_by")),
            )
            .register(ModelDef::new("profile").table("profiles"))
            .register(ModelDef::new("role").table("roles"))
            .build()
            .unwrap()
    }

    #[test]
    fn default_keys_follow_table_singulars() {
        let registry = registry();
        let user = registry.model("user").unwrap();
        let posts = user.relation("posts").unwrap();
        assert_eq!((posts.local_key.as_str(), posts.foreign_key.as_str()), ("id", "user_id"));
        assert!(posts.kind.is_collection());

        let post = registry.model("post").unwrap();
        let author = post.relation("user").unwrap();
        assert_eq!((author.local_key.as_str(), author.foreign_key.as_str()), ("user_id", "id"));
        let editor = post.relation("editor").unwrap();
        assert_eq!(editor.local_key, "edited_by");
    }

    #[test]
    fn pivot_candidates_probe_both_orders() {
        let registry = registry();
        let roles = registry.model("user").unwrap().relation("roles").unwrap();
        let pivot = roles.pivot.as_ref().unwrap();
        assert_eq!(pivot.candidates(), ["user_role", "role_user"]);
        assert_eq!((pivot.owner_key.as_str(), pivot.target_key.as_str()), ("user_id", "role_id"));
        assert_eq!(pivot.resolved(), None);
        assert_eq!(pivot.table(), "user_role");

        assert_eq!(pivot.resolve("role_user"), "role_user");
        assert_eq!(pivot.resolve("user_role"), "role_user");
    }

    #[test]
    fn explicit_pivot_is_pre_resolved() {
        let registry = Registry::builder()
            .register(
                ModelDef::new("post")
                    .belongs_to_many("tags", RelationDescriptor::to("tag").pivot("taggings")),
            )
            .register(ModelDef::new("tag"))
            .build()
            .unwrap();
        let tags = registry.model("post").unwrap().relation("tags").unwrap();
        assert_eq!(tags.pivot.as_ref().unwrap().resolved(), Some("taggings"));
    }

    #[test]
    fn malformed_declarations_are_configuration_errors() {
        let err = Registry::builder()
            .register(ModelDef::new("user").has_many("posts", "post"))
            .build()
            .unwrap_err();
        assert!(err.is_configuration());

        let err = Registry::builder()
            .register(ModelDef::new("user").has_many("x", "user").has_one("x", "user"))
            .build()
            .unwrap_err();
        assert!(err.is_configuration());

        let err = Registry::builder()
            .register(ModelDef::new("user").has_many("x", RelationDescriptor::to("user").pivot("p")))
            .build()
            .unwrap_err();
        assert!(err.is_configuration());

        assert!(registry().model("ghost").unwrap_err().is_configuration());
    }

    #[test]
    fn uuid_models_carry_the_uuid_column() {
        let registry = Registry::builder()
            .register(ModelDef::new("token").primary_key("key").uuid_primary_key())
            .build()
            .unwrap();
        let clauses = registry.model("token").unwrap().clauses();
        assert_eq!(clauses.uuid_column.as_deref(), Some("key"));
    }
}
