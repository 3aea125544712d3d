//! Catalog management commands.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context as _, Result};
use turbo_cart::catalog::SqliteCatalog;
use turbo_cart::{CatalogEntry, CatalogLookup, Currency, Money, ProductId};

use super::{CatalogArgs, CatalogCommand};
use crate::context::Context;

/// Run the catalog command.
pub fn run(args: CatalogArgs, ctx: &Context) -> Result<()> {
    let runtime = ctx.open()?;
    let catalog = runtime.engine.catalog();

    match args.command {
        CatalogCommand::Add {
            id,
            name,
            price_minor,
            currency,
        } => add(ctx, catalog, ProductId::new(id), name, price_minor, currency),
        CatalogCommand::Show { id } => show(ctx, catalog, &ProductId::new(id)),
        CatalogCommand::Remove { id } => remove(ctx, catalog, &ProductId::new(id)),
        CatalogCommand::Import { file } => import(ctx, catalog, &ctx.resolve_path(&file)),
    }
}

fn add(
    ctx: &Context,
    catalog: &SqliteCatalog,
    id: ProductId,
    name: String,
    price_minor: i64,
    currency: Option<String>,
) -> Result<()> {
    if price_minor < 0 {
        bail!("Price must not be negative");
    }
    let currency = match currency {
        Some(code) => Currency::from_code(&code).ok_or_else(|| anyhow!("Unknown currency: {}", code))?,
        None => ctx.config.engine.currency,
    };
    ensure_engine_currency(ctx, &id, currency)?;
    let entry = CatalogEntry::new(name, Money::new(price_minor, currency));
    catalog.upsert(&id, &entry)?;

    if ctx.output.is_json() {
        ctx.output.json(&entry);
    } else {
        ctx.output
            .success(&format!("{} = {} at {}", id, entry.name, entry.unit_price.display()));
    }
    Ok(())
}

fn show(ctx: &Context, catalog: &SqliteCatalog, id: &ProductId) -> Result<()> {
    let entry = catalog
        .resolve(id)?
        .ok_or_else(|| anyhow!("Product not found: {}", id))?;

    if ctx.output.is_json() {
        ctx.output.json(&entry);
    } else {
        ctx.output.header(id.as_str());
        ctx.output.kv("name", &entry.name);
        ctx.output.kv("price", &entry.unit_price.display());
    }
    Ok(())
}

fn remove(ctx: &Context, catalog: &SqliteCatalog, id: &ProductId) -> Result<()> {
    if catalog.delete(id)? {
        ctx.output.success(&format!("Removed {}", id));
    } else {
        ctx.output.warn(&format!("{} was not in the catalog", id));
    }
    Ok(())
}

fn import(ctx: &Context, catalog: &SqliteCatalog, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let entries: BTreeMap<ProductId, CatalogEntry> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse catalog file {}", file.display()))?;

    for (id, entry) in &entries {
        ensure_engine_currency(ctx, id, entry.unit_price.currency)?;
    }

    let progress = ctx.output.spinner("Importing products...");
    for (id, entry) in &entries {
        progress.set_message(format!("Importing {}", id));
        catalog.upsert(id, entry)?;
    }
    progress.finish_and_clear();

    ctx.output
        .success(&format!("Imported {} product(s)", entries.len()));
    Ok(())
}

/// Carts are priced in one currency; a foreign price would never show.
fn ensure_engine_currency(ctx: &Context, id: &ProductId, currency: Currency) -> Result<()> {
    let expected = ctx.config.engine.currency;
    if currency != expected {
        bail!("{} is priced in {}, but carts are priced in {}", id, currency, expected);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliConfig;
    use crate::output::Output;
    use turbo_cart::{SessionId, UserId};

    fn context() -> Context {
        Context {
            config: CliConfig::default(),
            output: Output::new(false, true),
            cwd: std::env::temp_dir(),
            session: SessionId::new("cli"),
            user: None::<UserId>,
            config_path: None,
        }
    }

    #[test]
    fn test_foreign_currency_rejected() {
        let ctx = context();
        let id = ProductId::new("9");
        assert!(ensure_engine_currency(&ctx, &id, Currency::USD).is_ok());
        let err = ensure_engine_currency(&ctx, &id, Currency::EUR).unwrap_err();
        assert!(err.to_string().contains("EUR"));
    }
}
