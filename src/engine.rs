//! Entry point for the presentation layer.

use crate::commands::{Command, CommandContext, History};
use crate::config::{Config, Tunables};
use crate::db::Database;
use crate::error::Result;
use tracing::info;

/// Owns the store handle, the resolved tunables and the undo history.
pub struct Engine {
    db: Database,
    config: Config,
    tunables: Tunables,
    history: History,
}

impl Engine {
    /// Compose the core over an open database.
    pub fn new(db: Database, config: Config) -> Result<Self> {
        let tunables = Tunables::resolve(&db, &config)?;
        let history = History::new(tunables.undo_max_size);
        Ok(Self {
            db,
            config,
            tunables,
            history,
        })
    }

    /// Open the database named by the config and compose the core over it.
    pub fn open(config: Config) -> Result<Self> {
        config.ensure_db_dir()?;
        let db = Database::open(&config.storage.db_path)?;
        info!(path = %config.storage.db_path.display(), "opened task database");
        Self::new(db, config)
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Re-read stored settings, e.g. after the settings dialog saved them.
    pub fn reload_tunables(&mut self) -> Result<()> {
        self.tunables = Tunables::resolve(&self.db, &self.config)?;
        self.history.set_max_size(self.tunables.undo_max_size);
        Ok(())
    }

    pub fn execute(&mut self, command: Command) -> Result<()> {
        let ctx = CommandContext {
            db: &self.db,
            tunables: &self.tunables,
        };
        self.history.execute(&ctx, command)
    }

    pub fn undo(&mut self) -> Result<bool> {
        let ctx = CommandContext {
            db: &self.db,
            tunables: &self.tunables,
        };
        self.history.undo(&ctx)
    }

    pub fn redo(&mut self) -> Result<bool> {
        let ctx = CommandContext {
            db: &self.db,
            tunables: &self.tunables,
        };
        self.history.redo(&ctx)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.history.undo_description()
    }

    pub fn redo_description(&self) -> Option<String> {
        self.history.redo_description()
    }
}
