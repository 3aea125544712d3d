//! CLI execution context.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use turbo_cart::cart::{AnonymousCartStore, SqliteCartStore};
use turbo_cart::catalog::SqliteCatalog;
use turbo_cart::{CartEngine, Carrier, SessionId, UserId};
use turbo_db::{Db, DbConfig};
use turbo_session::{KvStore, SessionStore};

use crate::config::CliConfig;
use crate::output::Output;

/// Config file names searched from the working directory upwards.
const CONFIG_NAMES: [&str; 3] = ["turbo-cart.toml", ".turbo-cart.toml", "turbo-cart.json"];

/// Engine as wired by the CLI.
pub type Engine = CartEngine<SqliteCartStore, SqliteCatalog>;

/// Execution context for CLI commands.
pub struct Context {
    /// CLI configuration.
    pub config: CliConfig,
    /// Output handler.
    pub output: Output,
    /// Working directory.
    pub cwd: PathBuf,
    /// Visit the command acts for.
    pub session: SessionId,
    /// Logged-in owner, if any.
    pub user: Option<UserId>,
    /// File the configuration came from.
    pub config_path: Option<PathBuf>,
}

impl Context {
    /// Load context from config file.
    pub fn load(
        config_path: Option<&str>,
        output: Output,
        session: String,
        user: Option<String>,
    ) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let (config, config_path) = match config_path {
            Some(path) => (CliConfig::load(path)?, Some(PathBuf::from(path))),
            None => match Self::find_config(&cwd) {
                Some((config, path)) => (config, Some(path)),
                None => (CliConfig::default(), None),
            },
        };

        Ok(Self {
            config,
            output,
            cwd,
            session: SessionId::new(session),
            user: user.map(UserId::new),
            config_path,
        })
    }

    /// Find config file in directory tree.
    fn find_config(start: &Path) -> Option<(CliConfig, PathBuf)> {
        let mut current = start.to_path_buf();
        loop {
            for name in &CONFIG_NAMES {
                let candidate = current.join(name);
                if candidate.exists() {
                    if let Ok(config) = CliConfig::load(candidate.to_str()?) {
                        return Some((config, candidate));
                    }
                }
            }

            if !current.pop() {
                break;
            }
        }

        None
    }

    /// The visit as the engine sees it.
    pub fn carrier(&self) -> Carrier {
        match &self.user {
            Some(owner) => Carrier::owner(self.session.clone(), owner.clone()),
            None => Carrier::anonymous(self.session.clone()),
        }
    }

    /// Resolve a path relative to the working directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }

    /// Open the database and session file and wire an engine over them.
    pub fn open(&self) -> Result<Runtime> {
        let db_config = DbConfig {
            path: self.config.database.path.as_deref().map(|p| self.resolve_path(p)),
            ..self.config.database.clone()
        };
        let db_path = db_config.path.clone();
        let db = Arc::new(Db::open(db_config).with_context(|| match &db_path {
            Some(path) => format!("Failed to open database {}", path.display()),
            None => "Failed to open in-memory database".to_string(),
        })?);

        let durable = SqliteCartStore::open(Arc::clone(&db), self.config.store.clone())
            .context("Failed to prepare cart tables")?;
        let catalog = SqliteCatalog::open(Arc::clone(&db)).context("Failed to prepare catalog table")?;

        let sessions_path = self.resolve_path(&self.config.session.file);
        let kv = Arc::new(load_sessions(&sessions_path)?);
        let sessions = SessionStore::new(Arc::clone(&kv), self.config.session.lifetime());

        let engine = CartEngine::new(
            durable,
            AnonymousCartStore::new(sessions),
            catalog,
            self.config.engine.clone(),
        );
        tracing::debug!(sessions = %sessions_path.display(), "runtime opened");

        Ok(Runtime {
            engine,
            kv,
            sessions_path,
        })
    }
}

/// Everything a command needs to touch carts.
pub struct Runtime {
    pub engine: Engine,
    kv: Arc<KvStore>,
    sessions_path: PathBuf,
}

impl Runtime {
    /// Drop expired sessions and write the rest back to the session file.
    pub fn save_sessions(&self) -> Result<()> {
        self.engine
            .anonymous()
            .sessions()
            .purge_expired()
            .context("Failed to purge expired sessions")?;
        let snapshot = self.kv.snapshot().context("Failed to snapshot sessions")?;
        if let Some(parent) = self.sessions_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(&self.sessions_path, content)
            .with_context(|| format!("Failed to write {}", self.sessions_path.display()))
    }
}

fn load_sessions(path: &Path) -> Result<KvStore> {
    if !path.exists() {
        return Ok(KvStore::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let snapshot: BTreeMap<String, serde_json::Value> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse session file {}", path.display()))?;
    KvStore::restore(snapshot).context("Failed to restore sessions")
}
