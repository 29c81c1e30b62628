use super::Query;
use crate::condition::and_over_all;
use crate::error::{OrmError, OrmResult};
use crate::model::RelationKind;
use crate::state::SoftDeleteScope;
use std::fmt;
use std::sync::Arc;

/// How a requested relation is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelationVariant {
    /// Children honouring the target's soft-delete filter.
    #[default]
    Default,
    /// Children including soft-deleted ones.
    All,
    /// A scalar child count instead of rows.
    Count,
    /// Only soft-deleted children.
    Trashed,
    /// Keep parents that have at least one child; nothing is loaded.
    Exists,
    /// Keep parents without children; nothing is loaded.
    NotExists,
}

impl RelationVariant {
    /// Variants applied to the parent's WHERE instead of loading rows.
    pub fn is_existence(self) -> bool {
        matches!(self, RelationVariant::Exists | RelationVariant::NotExists)
    }

    /// Soft-delete scope forced on the child query, if any.
    pub(crate) fn scope(self) -> Option<SoftDeleteScope> {
        match self {
            RelationVariant::All => Some(SoftDeleteScope::Include),
            RelationVariant::Trashed => Some(SoftDeleteScope::Only),
            _ => None,
        }
    }
}

/// Callback narrowing the target query of one relation.
pub type Narrow = Arc<dyn Fn(Query) -> Query + Send + Sync>;

/// One relation requested on a query, with its nested requests.
#[derive(Clone)]
pub struct RelationRequest {
    pub(crate) name: String,
    pub(crate) variant: RelationVariant,
    pub(crate) narrow: Option<Narrow>,
    pub(crate) nested: Vec<RelationRequest>,
}

impl fmt::Debug for RelationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationRequest")
            .field("name", &self.name)
            .field("variant", &self.variant)
            .field("narrowed", &self.narrow.is_some())
            .field("nested", &self.nested)
            .finish()
    }
}

impl RelationRequest {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            variant: RelationVariant::Default,
            narrow: None,
            nested: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant(&self) -> RelationVariant {
        self.variant
    }

    pub fn nested(&self) -> &[RelationRequest] {
        &self.nested
    }

    /// Apply the variant's soft-delete scope and the narrowing callback.
    pub(crate) fn narrow_query(&self, mut query: Query) -> Query {
        if let Some(scope) = self.variant.scope() {
            if let Some(model) = query.state.model_clauses_mut() {
                model.scope = scope;
            }
        }
        match &self.narrow {
            Some(narrow) => narrow(query),
            None => query,
        }
    }
}

impl Query {
    // ==================== RELATION REQUESTS ====================

    /// Eager-load a relation; dotted paths load nested relations (`posts.comments`).
    pub fn with(mut self, path: &str) -> Self {
        self.record("with");
        self.request_relation("with", path, RelationVariant::Default, None);
        self
    }

    /// Eager-load a relation whose target query is narrowed by `narrow`.
    ///
    /// ```ignore
    /// db.model("user")?.with_callback("posts", |q| q.where_("published", true))
    /// ```
    pub fn with_callback<F>(mut self, path: &str, narrow: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync + 'static,
    {
        self.record("with_callback");
        self.request_relation("with_callback", path, RelationVariant::Default, Some(Arc::new(narrow)));
        self
    }

    /// Attach the child count under the relation name instead of the rows.
    pub fn with_count(mut self, path: &str) -> Self {
        self.record("with_count");
        self.request_relation("with_count", path, RelationVariant::Count, None);
        self
    }

    /// Keep only parents with at least one related row.
    pub fn with_exists(mut self, name: &str) -> Self {
        self.record("with_exists");
        self.request_relation("with_exists", name, RelationVariant::Exists, None);
        self
    }

    /// Keep only parents without related rows.
    pub fn with_not_exists(mut self, name: &str) -> Self {
        self.record("with_not_exists");
        self.request_relation("with_not_exists", name, RelationVariant::NotExists, None);
        self
    }

    /// Load only the soft-deleted children.
    pub fn with_trashed_relation(mut self, path: &str) -> Self {
        self.record("with_trashed_relation");
        self.request_relation("with_trashed_relation", path, RelationVariant::Trashed, None);
        self
    }

    /// Load children regardless of soft deletes.
    pub fn with_all_relation(mut self, path: &str) -> Self {
        self.record("with_all_relation");
        self.request_relation("with_all_relation", path, RelationVariant::All, None);
        self
    }

    /// Request a relation with an explicit variant and optional narrowing callback.
    pub fn with_relation<F>(mut self, path: &str, variant: RelationVariant, narrow: F) -> Self
    where
        F: Fn(Query) -> Query + Send + Sync + 'static,
    {
        self.record("with");
        self.request_relation("with", path, variant, Some(Arc::new(narrow)));
        self
    }

    /// Validate `path` against the registry and merge it into the request tree.
    ///
    /// Requesting the same leaf twice replaces its variant and callback.
    fn request_relation(
        &mut self,
        method: &str,
        path: &str,
        variant: RelationVariant,
        narrow: Option<Narrow>,
    ) {
        if !self.require_model(method) {
            return;
        }
        let segments: Vec<&str> = path.split('.').map(str::trim).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return self.fail(OrmError::validation(format!(
                "{method}() got a malformed relation path `{path}`"
            )));
        }
        if variant.is_existence() && segments.len() > 1 {
            return self.fail(OrmError::validation(format!(
                "{method}() takes a single relation name, got `{path}`"
            )));
        }
        if let Err(err) = self.check_relation_path(&segments) {
            return self.fail(err);
        }

        let mut level = &mut self.relations;
        let last = segments.len() - 1;
        for (depth, segment) in segments.into_iter().enumerate() {
            let idx = match level.iter().position(|r| r.name == segment) {
                Some(idx) => idx,
                None => {
                    level.push(RelationRequest::new(segment));
                    level.len() - 1
                }
            };
            let entry = &mut level[idx];
            if depth == last {
                entry.variant = variant;
                entry.narrow = narrow.clone();
            }
            level = &mut entry.nested;
        }
    }

    fn check_relation_path(&self, segments: &[&str]) -> OrmResult<()> {
        let Some(mut model) = self.model.clone() else {
            return Ok(());
        };
        for segment in segments {
            let relation = model.relation(segment).ok_or_else(|| {
                OrmError::configuration(format!(
                    "model `{}` has no relation `{segment}`",
                    model.name()
                ))
            })?;
            model = self.registry.model(&relation.target)?.clone();
        }
        Ok(())
    }

    /// Correlated `EXISTS` / `NOT EXISTS` predicates for existence requests.
    pub(crate) fn existence_predicates(&self) -> OrmResult<Vec<String>> {
        let Some(owner) = self.model.as_deref() else {
            return Ok(Vec::new());
        };
        let mut predicates = Vec::new();
        for request in self.relations.iter().filter(|r| r.variant.is_existence()) {
            let relation = owner.relation(&request.name).ok_or_else(|| {
                OrmError::configuration(format!(
                    "model `{}` has no relation `{}`",
                    owner.name(),
                    request.name
                ))
            })?;

            let mut target = self.related(&relation.target)?;
            if target.state.qualifier() == self.state.qualifier() {
                // self-referencing: the inner rows need their own name to correlate
                target = target.alias(format!("{}_sub", relation.name));
            }
            let mut sub = request.narrow_query(target);
            sub.check()?;
            sub.state.clauses.columns = vec!["1".to_string()];
            let owner_key = self.qualify(&relation.local_key);

            let correlation = match (&relation.kind, &relation.pivot) {
                (RelationKind::BelongsToMany, Some(pivot)) => {
                    let table = pivot.table();
                    let target_key = sub.qualify(&relation.foreign_key);
                    let pivot_target = self.compiler.identifier(&format!("{table}.{}", pivot.target_key));
                    let pivot_owner = self.compiler.identifier(&format!("{table}.{}", pivot.owner_key));
                    sub.state.clauses.joins.push(format!(
                        "INNER JOIN {} ON {pivot_target} = {target_key}",
                        self.compiler.identifier(table)
                    ));
                    format!("{pivot_owner} = {owner_key}")
                }
                _ => format!("{} = {owner_key}", sub.qualify(&relation.foreign_key)),
            };
            and_over_all(&mut sub.state.clauses.wheres, correlation);

            let keyword = match request.variant {
                RelationVariant::NotExists => "NOT EXISTS",
                _ => "EXISTS",
            };
            predicates.push(format!("{keyword} ({})", sub.to_sql()?));
        }
        Ok(predicates)
    }
}
