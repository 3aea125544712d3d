//! Who a cart request acts for.

use crate::ids::{SessionId, UserId};
use serde::{Deserialize, Serialize};

/// Identity state of a visitor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "owner", rename_all = "snake_case")]
pub enum Identity {
    /// Not logged in. The cart lives in the session.
    #[default]
    Anonymous,
    /// Logged in. The cart lives in durable storage.
    Owner(UserId),
}

/// Explicit request context passed to every engine call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Carrier {
    /// The visit.
    pub session_id: SessionId,
    /// Who is making the request.
    pub identity: Identity,
}

impl Carrier {
    /// An anonymous visitor.
    pub fn anonymous(session_id: SessionId) -> Self {
        Self {
            session_id,
            identity: Identity::Anonymous,
        }
    }

    /// A logged-in visitor.
    pub fn owner(session_id: SessionId, owner: UserId) -> Self {
        Self {
            session_id,
            identity: Identity::Owner(owner),
        }
    }

    /// The same visit, now authenticated as `owner`.
    pub fn upgrade(self, owner: UserId) -> Self {
        Self::owner(self.session_id, owner)
    }

    /// The owning identity, if logged in.
    pub fn owner_id(&self) -> Option<&UserId> {
        match &self.identity {
            Identity::Owner(owner) => Some(owner),
            Identity::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.owner_id().is_some()
    }
}
