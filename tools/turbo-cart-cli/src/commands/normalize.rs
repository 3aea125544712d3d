//! Duplicate OPEN cart sweep.

use anyhow::Result;
use dialoguer::Confirm;
use serde_json::json;
use turbo_cart::cart::DurableCartStore;

use super::NormalizeArgs;
use crate::context::Context;

/// Fold every owner's duplicate OPEN carts and install the uniqueness index.
pub fn run(args: NormalizeArgs, ctx: &Context) -> Result<()> {
    let runtime = ctx.open()?;
    let owners = runtime.engine.durable().owners_with_duplicate_open_carts()?;

    if args.dry_run {
        if ctx.output.is_json() {
            ctx.output.json(&json!({ "owners": owners }));
            return Ok(());
        }
        if owners.is_empty() {
            ctx.output.success("No owner holds more than one OPEN cart");
        } else {
            ctx.output.header("Owners with duplicate OPEN carts");
            for owner in &owners {
                ctx.output.list_item(owner.as_str());
            }
        }
        return Ok(());
    }

    if !owners.is_empty() && !args.yes && !ctx.output.is_json() {
        ctx.output
            .warn(&format!("{} owner(s) hold duplicate OPEN carts", owners.len()));
        let confirmed = Confirm::new()
            .with_prompt("Fold them into each owner's latest cart?")
            .default(false)
            .interact()?;

        if !confirmed {
            ctx.output.info("Normalization cancelled");
            return Ok(());
        }
    }

    let spinner = ctx.output.spinner("Folding duplicate carts...");
    let report = runtime.engine.normalize_all();
    spinner.finish_and_clear();
    let report = report?;

    if ctx.output.is_json() {
        let folds: Vec<_> = report
            .folds
            .iter()
            .map(|fold| {
                json!({
                    "owner": fold.keeper.owner_id,
                    "keeper": fold.keeper.id,
                    "folded": fold.folded,
                    "lines_moved": fold.lines_moved,
                })
            })
            .collect();
        ctx.output.json(&json!({
            "folds": folds,
            "index_installed": report.index_installed,
        }));
        return Ok(());
    }

    for fold in &report.folds {
        ctx.output.list_item(&format!(
            "{}: kept {}, folded {} cart(s), {} line(s) moved",
            fold.keeper.owner_id,
            fold.keeper.id,
            fold.folded.len(),
            fold.lines_moved
        ));
    }
    ctx.output
        .success(&format!("Normalized {} owner(s)", report.folds.len()));
    if report.index_installed {
        ctx.output.info("One-OPEN-cart-per-owner constraint is in place");
    } else {
        ctx.output
            .warn("Constraint not installed; enable store.enforce_single_open_cart");
    }
    Ok(())
}
