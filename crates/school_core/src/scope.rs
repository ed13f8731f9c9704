//! Per-operation request context.
//!
//! # Responsibility
//! - Bind the session, caller identity, tenant and mapper for one operation.
//!
//! # Invariants
//! - Audit stamps are always attributed to `user_id` of the active scope.

use crate::db::{Audit, Session};
use crate::mapping::Mapper;
use std::sync::Arc;

pub struct RequestScope {
    session: Arc<Session>,
    user_id: String,
    tenant_id: Option<i64>,
    mapper: Arc<dyn Mapper>,
}

impl RequestScope {
    pub fn new(session: Arc<Session>, user_id: impl Into<String>, mapper: Arc<dyn Mapper>) -> Self {
        Self {
            session,
            user_id: user_id.into(),
            tenant_id: None,
            mapper,
        }
    }

    pub fn with_tenant(mut self, tenant_id: i64) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn tenant_id(&self) -> Option<i64> {
        self.tenant_id
    }

    pub fn mapper(&self) -> &dyn Mapper {
        self.mapper.as_ref()
    }

    /// Audit stamp for a write happening now.
    pub fn audit(&self) -> Audit {
        Audit::now(self.user_id.as_str())
    }
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("user_id", &self.user_id)
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::RequestScope;
    use crate::db::{open_db_in_memory, Session};
    use crate::mapping::JsonMapper;
    use std::sync::Arc;

    #[test]
    fn audit_is_attributed_to_the_scope_user() {
        let session = Arc::new(Session::try_new(open_db_in_memory().unwrap()).unwrap());
        let scope = RequestScope::new(session, "registrar", Arc::new(JsonMapper::new()))
            .with_tenant(7);

        assert_eq!(scope.user_id(), "registrar");
        assert_eq!(scope.tenant_id(), Some(7));
        assert_eq!(scope.audit().user_id, "registrar");
        assert_eq!(scope.session().pending_changes(), 0);
    }
}
