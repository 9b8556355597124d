//! Config command - inspect and edit `config.ini`.
//!
//! Every edit goes through [`ConfigKey::set`] and is then checked as a whole
//! engine configuration, so a saved file always loads and runs.

use std::path::Path;

use clap::Subcommand;
use partfetch::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print one value, e.g. `download.segment_size`
    Get { key: String },

    /// Change one value; sizes accept units such as 20MB
    Set { key: String, value: String },

    /// Restore one value to its default
    Unset { key: String },

    /// Print every value, marking those that differ from the defaults
    List {
        /// Only print values that differ from the defaults
        #[arg(long)]
        changed: bool,
    },

    /// Print where the file lives
    Path,
}

pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    let path = config_file_path();
    match command {
        ConfigCommands::Get { key } => {
            let config = load_at(&path)?;
            println!("{}", display_value(&lookup(&key)?.get(&config)));
        }
        ConfigCommands::Set { key, value } => {
            let change = edit_at(&path, lookup(&key)?, Some(&value))?;
            println!("{}", change);
        }
        ConfigCommands::Unset { key } => {
            let change = edit_at(&path, lookup(&key)?, None)?;
            println!("{}", change);
        }
        ConfigCommands::List { changed } => {
            let config = load_at(&path)?;
            println!("# {}", path.display());
            for line in listing(&config, changed) {
                println!("{}", line);
            }
        }
        ConfigCommands::Path => println!("{}", path.display()),
    }
    Ok(())
}

fn lookup(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        let known: Vec<String> = ConfigKey::all().iter().map(ConfigKey::name).collect();
        CliError::Config(format!(
            "unknown key '{}'; known keys: {}",
            key,
            known.join(", ")
        ))
    })
}

/// The file at `path`, or defaults when it does not exist yet.
fn load_at(path: &Path) -> Result<ConfigFile, CliError> {
    if path.exists() {
        Ok(ConfigFile::load_from(path)?)
    } else {
        Ok(ConfigFile::default())
    }
}

/// A saved change to one key.
#[derive(Debug, PartialEq, Eq)]
struct Change {
    key: String,
    before: String,
    after: String,
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.before == self.after {
            write!(f, "{} unchanged: {}", self.key, display_value(&self.after))
        } else {
            write!(
                f,
                "{}: {} -> {}",
                self.key,
                display_value(&self.before),
                display_value(&self.after)
            )
        }
    }
}

/// Set `key` to `value` (or its default when `None`) in the file at `path`.
///
/// Nothing is written unless the edited file still forms a valid engine
/// configuration.
fn edit_at(path: &Path, key: ConfigKey, value: Option<&str>) -> Result<Change, CliError> {
    let mut config = load_at(path)?;
    let before = key.get(&config);

    let value = match value {
        Some(value) => value.to_string(),
        None => key.get(&ConfigFile::default()),
    };
    key.set(&mut config, &value)?;
    config
        .to_fetch_config()
        .validate()
        .map_err(|e| CliError::Config(format!("{} = {}: {}", key.name(), value, e)))?;

    config.save_to(path)?;
    Ok(Change {
        key: key.name(),
        before,
        after: key.get(&config),
    })
}

/// `section.key = value` lines, with `(default: ..)` on changed values.
fn listing(config: &ConfigFile, changed_only: bool) -> Vec<String> {
    let defaults = ConfigFile::default();
    ConfigKey::all()
        .iter()
        .filter_map(|key| {
            let value = key.get(config);
            let default = key.get(&defaults);
            match (value == default, changed_only) {
                (true, true) => None,
                (true, false) => Some(format!("{} = {}", key.name(), display_value(&value))),
                (false, _) => Some(format!(
                    "{} = {}  (default: {})",
                    key.name(),
                    display_value(&value),
                    display_value(&default)
                )),
            }
        })
        .collect()
}

fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}
