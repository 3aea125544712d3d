//! CLI command implementations.

pub mod cart;
pub mod carts;
pub mod catalog;
pub mod config;
pub mod login;
pub mod normalize;

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Arguments for the add command.
#[derive(Args)]
pub struct AddArgs {
    /// Product id.
    pub product: String,

    /// Quantity to add. Values below one add a single unit.
    #[arg(short, long, default_value_t = 1, allow_hyphen_values = true)]
    pub quantity: i64,
}

/// Arguments for the update command.
#[derive(Args)]
pub struct UpdateArgs {
    /// Product id.
    pub product: String,

    /// Signed change to apply, e.g. `2` or `-1`.
    #[arg(allow_hyphen_values = true)]
    pub delta: i64,
}

/// Arguments for the remove command.
#[derive(Args)]
pub struct RemoveArgs {
    /// Product id.
    pub product: String,
}

/// Arguments for the login command.
#[derive(Args)]
pub struct LoginArgs {
    /// Owner the visit logs in as.
    pub owner: String,
}

/// Arguments for the carts command.
#[derive(Args)]
pub struct CartsArgs {
    /// Owner to list. Defaults to `--user`.
    pub owner: Option<String>,
}

/// Arguments for the normalize command.
#[derive(Args)]
pub struct NormalizeArgs {
    /// Skip confirmation.
    #[arg(short, long)]
    pub yes: bool,

    /// Only list the owners that hold duplicates.
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the catalog command.
#[derive(Args)]
pub struct CatalogArgs {
    #[command(subcommand)]
    pub command: CatalogCommand,
}

/// Catalog subcommands.
#[derive(Subcommand)]
pub enum CatalogCommand {
    /// Add or replace a product
    Add {
        /// Product id.
        id: String,
        /// Display name.
        name: String,
        /// Unit price in minor units (cents).
        price_minor: i64,
        /// ISO currency code. Defaults to the engine currency.
        #[arg(long)]
        currency: Option<String>,
    },

    /// Show a product
    Show {
        /// Product id.
        id: String,
    },

    /// Remove a product
    Remove {
        /// Product id.
        id: String,
    },

    /// Load products from a JSON file
    Import {
        /// File holding a map of product id to entry.
        file: PathBuf,
    },
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Write a default turbo-cart.toml
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Show,

    /// Print the config file in use
    Path,
}
