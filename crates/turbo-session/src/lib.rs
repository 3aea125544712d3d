//! Per-visit session storage for TurboCommerce.
//!
//! Sessions live in a versioned in-process key-value store with automatic
//! JSON serialization. Writes go through compare-and-set, so concurrent
//! requests on the same visit never overwrite each other blindly.
//!
//! # Example
//!
//! ```rust,ignore
//! use turbo_session::{SessionId, SessionStore};
//!
//! let sessions = SessionStore::in_memory();
//! let id = SessionId::generate();
//!
//! sessions.update(&id, |attrs| attrs.insert("locale", &"fr"))?;
//! let locale: Option<String> = sessions.get_or_create(&id)?.get("locale")?;
//! ```

mod attributes;
mod error;
mod kv;
mod session;

pub use attributes::{Attributes, SessionStore};
pub use error::SessionError;
pub use kv::KvStore;
pub use session::{Session, SessionConfig, SessionData, SessionId, DEFAULT_SESSION_TTL_SECS};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{Attributes, KvStore, Session, SessionConfig, SessionError, SessionId, SessionStore};
}
