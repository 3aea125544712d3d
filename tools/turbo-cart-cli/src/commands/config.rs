//! Configuration management commands.

use anyhow::{bail, Result};

use super::{ConfigArgs, ConfigCommand};
use crate::config::generate_default_config;
use crate::context::Context;

const DEFAULT_CONFIG_FILE: &str = "turbo-cart.toml";

/// Run the config command.
pub fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Init { force } => init_config(force, ctx),
        ConfigCommand::Show => show_config(ctx),
        ConfigCommand::Path => show_path(ctx),
    }
}

fn init_config(force: bool, ctx: &Context) -> Result<()> {
    let path = ctx.cwd.join(DEFAULT_CONFIG_FILE);
    if path.exists() && !force {
        bail!("{} already exists. Use --force to overwrite.", path.display());
    }

    std::fs::write(&path, generate_default_config())?;
    ctx.output.success(&format!("Created {}", path.display()));
    Ok(())
}

fn show_config(ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    let config = &ctx.config;
    ctx.output.header("Current Configuration");

    ctx.output.info("[database]");
    let db_path = config
        .database
        .path
        .as_ref()
        .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string());
    ctx.output.kv("path", &db_path);
    ctx.output
        .kv("busy_timeout_ms", &config.database.busy_timeout_ms.to_string());
    ctx.output
        .kv("journal_mode", config.database.journal_mode.pragma_value());

    ctx.output.info("[session]");
    ctx.output.kv("file", &config.session.file.display().to_string());
    ctx.output.kv("ttl_secs", &config.session.ttl_secs.to_string());

    ctx.output.info("[engine]");
    ctx.output.kv("max_attempts", &config.engine.max_attempts.to_string());
    ctx.output
        .kv("retry_backoff_ms", &config.engine.retry_backoff_ms.to_string());
    ctx.output.kv("currency", config.engine.currency.code());

    ctx.output.info("[store]");
    ctx.output.kv(
        "enforce_single_open_cart",
        &config.store.enforce_single_open_cart.to_string(),
    );

    ctx.output.info("[logging]");
    ctx.output.kv("level", &config.logging.level);
    ctx.output.kv("format", &format!("{:?}", config.logging.format).to_lowercase());
    Ok(())
}

fn show_path(ctx: &Context) -> Result<()> {
    match &ctx.config_path {
        Some(path) => println!("{}", path.display()),
        None => ctx.output.info("No config file found; using defaults"),
    }
    Ok(())
}
