use crate::naming::NamingPattern;

/// Behavior knobs shared by every builder created from one [`crate::Db`] handle.
#[derive(Debug, Clone)]
pub struct OrmConfig {
    /// Client field ⇄ database column name translation.
    pub naming: NamingPattern,
    /// Whether missing columns/tables are repaired from schema metadata and the statement retried.
    pub schema_repair: bool,
    /// Maximum repair attempts per statement before the error is re-raised.
    pub max_repair_attempts: u32,
    /// Page size used by `paginate` when the caller passes `0`.
    pub default_per_page: u64,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            naming: NamingPattern::Preserve,
            schema_repair: true,
            max_repair_attempts: 2,
            default_per_page: 10,
        }
    }
}

impl OrmConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the naming pattern.
    pub fn with_naming(mut self, naming: NamingPattern) -> Self {
        self.naming = naming;
        self
    }

    /// Enable schema repair.
    pub fn enable_schema_repair(mut self) -> Self {
        self.schema_repair = true;
        self
    }

    /// Disable schema repair; schema-mismatch errors propagate unchanged.
    pub fn disable_schema_repair(mut self) -> Self {
        self.schema_repair = false;
        self
    }

    /// Set the maximum number of repair attempts.
    pub fn with_max_repair_attempts(mut self, attempts: u32) -> Self {
        self.max_repair_attempts = attempts;
        self
    }

    /// Set the default page size.
    pub fn with_default_per_page(mut self, per_page: u64) -> Self {
        self.default_per_page = per_page.max(1);
        self
    }
}
