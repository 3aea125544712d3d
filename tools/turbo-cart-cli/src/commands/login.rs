//! Login command.

use anyhow::Result;
use serde_json::json;
use turbo_cart::cart::LoginTransition;
use turbo_cart::UserId;

use super::LoginArgs;
use crate::context::Context;

/// Log the visit in and merge its guest cart into the owner's cart.
pub fn run(args: LoginArgs, ctx: &Context) -> Result<()> {
    let runtime = ctx.open()?;
    let owner = UserId::new(args.owner);
    let outcome = LoginTransition::new(&runtime.engine).on_login_success(ctx.carrier(), owner.clone());
    runtime.save_sessions()?;

    if ctx.output.is_json() {
        ctx.output.json(&json!({
            "session": ctx.session,
            "owner": owner,
            "merge": outcome.merge,
        }));
        return Ok(());
    }

    ctx.output.success(&format!("Session {} logged in as {}", ctx.session, owner));
    match outcome.merge {
        Some(report) if report.is_noop() => ctx.output.info("No guest cart to merge"),
        Some(report) => {
            ctx.output.info(&format!("Merged {} guest line(s)", report.merged));
            for product in &report.skipped {
                ctx.output
                    .warn(&format!("Dropped {}: no longer in the catalog", product));
            }
        }
        None => ctx
            .output
            .warn("Guest cart could not be merged; it is kept for the next login"),
    }
    ctx.output
        .debug(&format!("Run later commands with --user {} to act as the owner", owner));
    Ok(())
}
