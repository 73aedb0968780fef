// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! INI-style configuration: sections in brackets, `key = value` pairs,
//! `#`/`;` comments, and a `[DEFAULT]` section inherited by every other
//! section.
//!
//! Multiple files merge in order with last-wins. A `[brim]`
//! `additional_confs` option pulls in further files; inclusion is capped at
//! 50 files to stop recursive includes. Unreadable files are treated as
//! absent; check [`Conf::files`] to see what was actually read.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// The str values that equate to true, all lowercase.
pub const TRUE_VALUES: &[&str] = &["1", "on", "t", "true", "y", "yes"];

/// The str values that equate to false, all lowercase.
pub const FALSE_VALUES: &[&str] = &["0", "f", "false", "n", "no", "off"];

/// The maximum number of conf files a single load may read.
const MAX_CONF_FILES: usize = 50;

/// Configuration errors. All of these are fatal before any listener binds.
#[derive(Debug, Error)]
pub enum ConfError {
    #[error("Configuration value [{section}] {option} of '{value}' cannot be converted to {kind}.")]
    Conversion { section: String, option: String, value: String, kind: &'static str },

    #[error(
        "Tried to read more than 50 conf files. \
         Recursion with [brim] additional_confs? Files read so far: {0}"
    )]
    TooManyFiles(String),

    #[error("Could not parse {path} line {line}: {text}")]
    Parse { path: PathBuf, line: usize, text: String },

    #[error("No configuration found.")]
    NoConfiguration,

    #[error("{0}")]
    Invalid(String),
}

/// A parsed configuration: section name -> option name -> value.
///
/// Option names are lowercased at parse time; section names are kept as
/// written. Empty values are treated as unset by the `get` accessors.
#[derive(Debug, Clone, Default)]
pub struct Conf {
    store: HashMap<String, HashMap<String, String>>,
    files: Vec<PathBuf>,
}

impl Conf {
    /// Construct directly from a store, mainly for tests and handlers that
    /// build configuration programmatically.
    pub fn new(store: HashMap<String, HashMap<String, String>>) -> Self {
        Self { store, files: Vec::new() }
    }

    /// The conf files that were actually read, in order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Set a single value, creating the section as needed.
    pub fn set(&mut self, section: &str, option: &str, value: &str) {
        self.store
            .entry(section.to_string())
            .or_default()
            .insert(option.to_lowercase(), value.to_string());
    }

    /// The value of section/option, or None when the section or option is
    /// missing or the value is empty.
    pub fn get(&self, section: &str, option: &str) -> Option<&str> {
        self.store
            .get(section)
            .and_then(|s| s.get(&option.to_lowercase()))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Like [`Conf::get`] but returning `default` when unset.
    pub fn get_default<'a>(&'a self, section: &str, option: &str, default: &'a str) -> &'a str {
        self.get(section, option).unwrap_or(default)
    }

    pub fn get_int(&self, section: &str, option: &str, default: i64) -> Result<i64, ConfError> {
        match self.get(section, option) {
            None => Ok(default),
            Some(v) => v.trim().parse().map_err(|_| ConfError::Conversion {
                section: section.to_string(),
                option: option.to_string(),
                value: v.to_string(),
                kind: "int",
            }),
        }
    }

    pub fn get_float(&self, section: &str, option: &str, default: f64) -> Result<f64, ConfError> {
        match self.get(section, option) {
            None => Ok(default),
            Some(v) => v.trim().parse().map_err(|_| ConfError::Conversion {
                section: section.to_string(),
                option: option.to_string(),
                value: v.to_string(),
                kind: "float",
            }),
        }
    }

    pub fn get_bool(&self, section: &str, option: &str, default: bool) -> Result<bool, ConfError> {
        match self.get(section, option) {
            None => Ok(default),
            Some(v) => {
                let lower = v.to_lowercase();
                if TRUE_VALUES.contains(&lower.as_str()) {
                    Ok(true)
                } else if FALSE_VALUES.contains(&lower.as_str()) {
                    Ok(false)
                } else {
                    Err(ConfError::Conversion {
                        section: section.to_string(),
                        option: option.to_string(),
                        value: v.to_string(),
                        kind: "boolean",
                    })
                }
            }
        }
    }
}

/// Read and merge the given conf files, following `[brim] additional_confs`
/// includes.
///
/// Files that cannot be read are skipped as if they did not exist; callers
/// that require configuration should check [`Conf::files`] afterwards.
pub fn read_conf<P: AsRef<Path>>(conf_files: &[P]) -> Result<Conf, ConfError> {
    let mut loader = Loader::default();
    for conf_file in conf_files {
        loader.load(conf_file.as_ref())?;
    }
    Ok(loader.finish())
}

#[derive(Default)]
struct Loader {
    store: HashMap<String, HashMap<String, String>>,
    defaults: HashMap<String, String>,
    files_read: Vec<PathBuf>,
}

impl Loader {
    fn load(&mut self, path: &Path) -> Result<(), ConfError> {
        if self.files_read.len() >= MAX_CONF_FILES {
            let read = self
                .files_read
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" ");
            return Err(ConfError::TooManyFiles(read));
        }
        let expanded = expand_user(path);
        let text = match std::fs::read_to_string(&expanded) {
            Ok(text) => text,
            Err(_) => return Ok(()),
        };
        self.files_read.push(expanded.clone());
        self.parse(&text, &expanded)?;
        // The include option is consumed so it never leaks into `get`;
        // a later file may set it again and trigger another round.
        let additional = self
            .store
            .get_mut("brim")
            .and_then(|brim| brim.remove("additional_confs"));
        if let Some(additional) = additional {
            for include in split_quoted(&additional) {
                self.load(Path::new(&include))?;
            }
        }
        Ok(())
    }

    fn parse(&mut self, text: &str, path: &Path) -> Result<(), ConfError> {
        let mut section: Option<String> = None;
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = Some(name.trim().to_string());
                if name.trim() != "DEFAULT" {
                    self.store.entry(name.trim().to_string()).or_default();
                }
                continue;
            }
            let Some((key, value)) = split_option(line) else {
                return Err(ConfError::Parse {
                    path: path.to_path_buf(),
                    line: lineno + 1,
                    text: raw.to_string(),
                });
            };
            match section.as_deref() {
                None => {
                    return Err(ConfError::Parse {
                        path: path.to_path_buf(),
                        line: lineno + 1,
                        text: raw.to_string(),
                    })
                }
                Some("DEFAULT") => {
                    self.defaults.insert(key, value);
                }
                Some(name) => {
                    self.store.entry(name.to_string()).or_default().insert(key, value);
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Conf {
        let Loader { mut store, defaults, files_read } = self;
        if !defaults.is_empty() {
            for options in store.values_mut() {
                for (key, value) in &defaults {
                    options.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
        }
        Conf { store, files: files_read }
    }
}

/// Split a `key = value` (or `key : value`) line. Option names lowercase.
fn split_option(line: &str) -> Option<(String, String)> {
    let idx = line.find(['=', ':'])?;
    let key = line[..idx].trim();
    if key.is_empty() {
        return None;
    }
    let value = line[idx + 1..].trim();
    Some((key.to_lowercase(), value.to_string()))
}

/// Space-separated splitting with double-quote grouping, for
/// `additional_confs = a.conf "b with space.conf"`.
fn split_quoted(value: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in value.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Expand a leading `~` to the current user's home directory.
fn expand_user(path: &Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if s == "~" {
        return dirs::home_dir().unwrap_or_else(|| path.to_path_buf());
    }
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
#[path = "conf_tests.rs"]
mod tests;
