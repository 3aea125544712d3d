//! Identity transition hook.

use crate::cart::carrier::Carrier;
use crate::cart::durable::DurableCartStore;
use crate::cart::engine::CartEngine;
use crate::cart::model::MergeReport;
use crate::catalog::CatalogLookup;
use crate::ids::UserId;

/// Result of a login as seen by the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    /// The visit, now acting for the owner.
    pub carrier: Carrier,
    /// The merge result, `None` if the merge failed.
    pub merge: Option<MergeReport>,
}

/// Runs the guest-to-account merge exactly once per successful login.
///
/// A failed merge never blocks the login. The guest cart is left in place
/// and the failure is logged.
#[derive(Debug)]
pub struct LoginTransition<'e, S, C> {
    engine: &'e CartEngine<S, C>,
}

impl<'e, S, C> LoginTransition<'e, S, C>
where
    S: DurableCartStore,
    C: CatalogLookup,
{
    pub fn new(engine: &'e CartEngine<S, C>) -> Self {
        Self { engine }
    }

    /// Upgrade `carrier` to `owner` and merge its guest cart.
    pub fn on_login_success(&self, carrier: Carrier, owner: UserId) -> LoginOutcome {
        let carrier = carrier.upgrade(owner);
        let merge = match self.engine.merge_anonymous_into_durable(&carrier) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(
                    session = %carrier.session_id,
                    error = %e,
                    "guest cart merge failed at login"
                );
                None
            }
        };
        LoginOutcome { carrier, merge }
    }
}
