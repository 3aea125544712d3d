//! Durable cart listing.

use anyhow::{bail, Result};
use turbo_cart::cart::DurableCartStore;
use turbo_cart::UserId;

use super::CartsArgs;
use crate::context::Context;
use crate::output::{format_timestamp, status_badge};

/// List an owner's OPEN carts, most recently updated first.
pub fn run(args: CartsArgs, ctx: &Context) -> Result<()> {
    let owner = match (args.owner, &ctx.user) {
        (Some(user), _) => UserId::new(user),
        (None, Some(user)) => user.clone(),
        (None, None) => bail!("Name an owner, or pass --user"),
    };

    let runtime = ctx.open()?;
    let store = runtime.engine.durable();
    let carts = store.find_open_carts(&owner)?.into_vec();

    if ctx.output.is_json() {
        ctx.output.json(&carts);
        return Ok(());
    }

    ctx.output.header(&format!("OPEN carts of {}", owner));
    if carts.is_empty() {
        ctx.output.info("None");
        return Ok(());
    }
    if carts.len() > 1 {
        ctx.output.warn(&format!(
            "{} OPEN carts; the next access or `turbo-cart normalize` folds them",
            carts.len()
        ));
    }

    for cart in &carts {
        let lines = store.lines(&cart.id)?;
        ctx.output.list_item(&format!(
            "{} {} v{}",
            cart.id,
            status_badge(cart.status),
            cart.version.0
        ));
        ctx.output.kv("created", &format_timestamp(cart.created_at));
        ctx.output.kv("updated", &format_timestamp(cart.updated_at));
        for line in &lines {
            ctx.output
                .kv(line.product_id.as_str(), &format!("x{}", line.quantity));
        }
    }
    Ok(())
}
