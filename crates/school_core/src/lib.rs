//! Generic persistence and validation core.
//! Entity contract, soft-deleting repository, mapping service and the
//! property validation engine shared by every entity type.

pub mod config;
pub mod db;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod repo;
pub mod scope;
pub mod service;
pub mod validation;

pub use config::CoreConfig;
pub use db::{
    open_db, open_db_in_memory, open_db_with, Audit, DbError, DbOptions, SaveOutcome, Session,
    StoreError, Visibility,
};
pub use logging::{
    default_log_level, init_from_config, init_logging, logging_status, LoggingError,
};
pub use mapping::{JsonMapper, MapError, Mapper};
pub use model::entity::{
    predicate, ConcurrencyToken, Entity, KeyGeneration, Predicate, Record, StaticEntity,
};
pub use model::key::EntityKey;
pub use model::relation::{Cardinality, Relation, RelationKind};
pub use repo::{Commit, RepoError, RepoResult, Repository, SqliteRepository};
pub use scope::RequestScope;
pub use service::{EntityService, ServiceError, ServiceResult, ValidationFailure};
pub use validation::{RuleRegistry, RuleSet};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
