//! Turbo Cart CLI - operate on TurboCommerce carts from the shell.
//!
//! Commands:
//! - `turbo-cart add` / `update` / `remove` - Change a cart
//! - `turbo-cart view` / `count` - Inspect a cart
//! - `turbo-cart login` - Log a visit in and merge its guest cart
//! - `turbo-cart carts` - List an owner's OPEN carts
//! - `turbo-cart normalize` - Fold duplicate OPEN carts
//! - `turbo-cart catalog` - Manage catalog entries
//! - `turbo-cart config` - Manage configuration

mod commands;
mod config;
mod context;
mod logging;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    AddArgs, CartsArgs, CatalogArgs, ConfigArgs, LoginArgs, NormalizeArgs, RemoveArgs, UpdateArgs,
};

/// Turbo Cart - inspect and reconcile shopping carts
#[derive(Parser)]
#[command(name = "turbo-cart")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Session id of the visit to act for
    #[arg(short, long, global = true, default_value = "cli")]
    session: String,

    /// Act as this logged-in owner instead of the anonymous visitor
    #[arg(short, long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a product to the cart
    Add(AddArgs),

    /// Change a line's quantity by a signed delta
    Update(UpdateArgs),

    /// Remove a line regardless of its quantity
    Remove(RemoveArgs),

    /// Show the cart with prices and totals
    View,

    /// Show the number of items in the cart
    Count,

    /// Show the line items a payment session would receive
    Checkout,

    /// Log the visit in and merge its guest cart
    Login(LoginArgs),

    /// List an owner's OPEN carts
    Carts(CartsArgs),

    /// Fold duplicate OPEN carts for every owner
    Normalize(NormalizeArgs),

    /// Manage catalog entries
    Catalog(CatalogArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup output formatting
    let output = output::Output::new(cli.verbose, cli.json);

    // Load config
    let config_path = cli.config.as_deref();
    let ctx = context::Context::load(config_path, output, cli.session, cli.user)?;
    logging::init(&ctx.config.logging, cli.verbose);

    // Execute command
    let result = match cli.command {
        Commands::Add(args) => commands::cart::add(args, &ctx),
        Commands::Update(args) => commands::cart::update(args, &ctx),
        Commands::Remove(args) => commands::cart::remove(args, &ctx),
        Commands::View => commands::cart::view(&ctx),
        Commands::Count => commands::cart::count(&ctx),
        Commands::Checkout => commands::cart::checkout(&ctx),
        Commands::Login(args) => commands::login::run(args, &ctx),
        Commands::Carts(args) => commands::carts::run(args, &ctx),
        Commands::Normalize(args) => commands::normalize::run(args, &ctx),
        Commands::Catalog(args) => commands::catalog::run(args, &ctx),
        Commands::Config(args) => commands::config::run(args, &ctx),
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
