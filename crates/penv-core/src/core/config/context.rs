use std::path::PathBuf;

use anyhow::Result;

use crate::config::{Config, EnvSnapshot, GlobalOptions};
use crate::effects::{self, SharedEffects};
use crate::CommandGroup;

#[derive(Clone, Copy, Debug)]
pub struct CommandInfo {
    pub group: CommandGroup,
    pub name: &'static str,
}

impl CommandInfo {
    #[must_use]
    pub const fn new(group: CommandGroup, name: &'static str) -> Self {
        Self { group, name }
    }
}

pub struct CommandContext<'a> {
    pub global: &'a GlobalOptions,
    config: Config,
    effects: SharedEffects,
}

impl<'a> CommandContext<'a> {
    /// Creates a new command context with the provided global options.
    ///
    /// # Errors
    /// Returns an error if the environment snapshot or configuration cannot be prepared.
    pub fn new(global: &'a GlobalOptions, effects: SharedEffects) -> Result<Self> {
        let env = EnvSnapshot::capture();
        let config = Config::from_snapshot(&env, global, dirs_next::home_dir());
        Ok(Self {
            global,
            config,
            effects,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_config(
        global: &'a GlobalOptions,
        config: Config,
        effects: SharedEffects,
    ) -> Self {
        Self {
            global,
            config,
            effects,
        }
    }

    pub fn process(&self) -> &dyn effects::ProcessRunner {
        self.effects.process()
    }

    pub fn http(&self) -> &dyn effects::HttpClient {
        self.effects.http()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Environment root resolved from the captured configuration.
    ///
    /// # Errors
    /// Returns an error when neither `PENV_DIR` nor a home directory is available.
    pub fn environment_root(&self) -> Result<PathBuf> {
        self.config.paths().environment_root()
    }
}
