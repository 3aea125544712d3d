//! Cart commands acting for the current visit.

use anyhow::Result;
use serde_json::json;
use turbo_cart::cart::{QuantityChange, UpdateOutcome};
use turbo_cart::{CartView, ProductId};

use super::{AddArgs, RemoveArgs, UpdateArgs};
use crate::context::Context;

/// Add a product.
pub fn add(args: AddArgs, ctx: &Context) -> Result<()> {
    let runtime = ctx.open()?;
    let product = ProductId::new(args.product);
    let outcome = runtime.engine.add(&ctx.carrier(), &product, args.quantity)?;
    runtime.save_sessions()?;

    if ctx.output.is_json() {
        ctx.output.json(&json!({ "product_id": product, "quantity": outcome.quantity }));
    } else {
        ctx.output
            .success(&format!("{} now at quantity {}", product, outcome.quantity));
    }
    Ok(())
}

/// Apply a signed delta to a line.
pub fn update(args: UpdateArgs, ctx: &Context) -> Result<()> {
    let product = ProductId::new(args.product);
    apply(ctx, &product, QuantityChange::Delta(args.delta))
}

/// Remove a line.
pub fn remove(args: RemoveArgs, ctx: &Context) -> Result<()> {
    let product = ProductId::new(args.product);
    apply(ctx, &product, QuantityChange::Remove)
}

fn apply(ctx: &Context, product: &ProductId, change: QuantityChange) -> Result<()> {
    let runtime = ctx.open()?;
    let outcome = runtime.engine.update_quantity(&ctx.carrier(), product, change)?;
    runtime.save_sessions()?;

    if ctx.output.is_json() {
        ctx.output.json(&outcome);
        return Ok(());
    }
    match outcome {
        UpdateOutcome::Updated { quantity } => {
            ctx.output.success(&format!("{} now at quantity {}", product, quantity))
        }
        UpdateOutcome::Removed => ctx.output.success(&format!("Removed {}", product)),
        UpdateOutcome::Missing => ctx.output.warn(&format!("{} is not in the cart", product)),
    }
    Ok(())
}

/// Show the cart.
pub fn view(ctx: &Context) -> Result<()> {
    let runtime = ctx.open()?;
    let view = runtime.engine.current_view(&ctx.carrier())?;

    if ctx.output.is_json() {
        ctx.output.json(&view);
        return Ok(());
    }
    print_view(ctx, &view);
    Ok(())
}

/// Show the item count.
pub fn count(ctx: &Context) -> Result<()> {
    let runtime = ctx.open()?;
    let count = runtime.engine.item_count(&ctx.carrier())?;

    if ctx.output.is_json() {
        ctx.output.json(&json!({ "count": count }));
    } else {
        println!("{}", count);
    }
    Ok(())
}

/// Show the checkout snapshot.
pub fn checkout(ctx: &Context) -> Result<()> {
    let runtime = ctx.open()?;
    let view = runtime.engine.current_view(&ctx.carrier())?;
    let items = view.checkout_items();

    if ctx.output.is_json() {
        ctx.output.json(&items);
        return Ok(());
    }
    if items.is_empty() {
        ctx.output.warn("Nothing to check out");
        return Ok(());
    }

    ctx.output.header("Checkout");
    for item in &items {
        ctx.output.list_item(&format!(
            "{} x{} @ {} minor units",
            item.name, item.quantity, item.unit_amount_minor
        ));
    }
    ctx.output.kv("total", &view.total_amount.display());
    Ok(())
}

fn print_view(ctx: &Context, view: &CartView) {
    let who = match &ctx.user {
        Some(owner) => format!("Cart of {}", owner),
        None => format!("Guest cart of {}", ctx.session),
    };
    ctx.output.header(&who);

    if view.is_empty() {
        ctx.output.info("Cart is empty");
        return;
    }

    let widths = [12, 24, 10, 5, 12];
    ctx.output
        .table_row(&["PRODUCT", "NAME", "PRICE", "QTY", "TOTAL"], &widths);
    for line in &view.lines {
        ctx.output.table_row(
            &[
                line.product_id.as_str(),
                &line.product_name,
                &line.unit_price.display(),
                &line.quantity.to_string(),
                &line.line_total.display(),
            ],
            &widths,
        );
    }
    println!();
    ctx.output.kv("items", &view.total_items.to_string());
    ctx.output.kv("total", &view.total_amount.display());
}
