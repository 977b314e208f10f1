use ulid::Ulid;

use crate::model::Role;

/// Resolved identity attached to every mutating call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Ulid,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: Ulid, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// Maps an authenticated subject (an email address) to a `Caller`.
///
/// The engine implements this over its own user registry; a request layer
/// can substitute its own resolver without touching booking logic.
#[async_trait::async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, subject: &str) -> Option<Caller>;
}

#[async_trait::async_trait]
impl IdentityResolver for crate::engine::Engine {
    async fn resolve(&self, subject: &str) -> Option<Caller> {
        let user_id = *self.emails.get(subject)?.value();
        let role = self.users.get(&user_id)?.role;
        Some(Caller { user_id, role })
    }
}
