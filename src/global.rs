//! Opt-in process-wide handle
//!
//! The service never reads this. Callers that want a "current instance"
//! install one at startup and resolve it where passing it around is awkward.

use crate::services::AuthorityService;
use once_cell::sync::OnceCell;

static AUTHORITY: OnceCell<AuthorityService> = OnceCell::new();

/// Installs the process-wide service. Returns the service back if one is
/// already installed.
pub fn install(service: AuthorityService) -> Result<(), AuthorityService> {
    AUTHORITY.set(service)
}

pub fn current() -> Option<&'static AuthorityService> {
    AUTHORITY.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_install_once() {
        let service = AuthorityService::new(Arc::new(InMemoryStore::new()));
        assert!(install(service.clone()).is_ok());
        assert!(install(service).is_err());
        assert_eq!(current().map(|s| s.backend_name()), Some("memory"));
    }
}
