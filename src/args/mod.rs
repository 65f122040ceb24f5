//! Command-line interpretation.
//!
//! The updater is launched by installers, by the product it updates and by previous instances of
//! itself, each of which spells flags slightly differently. Parsing is therefore lenient and
//! **never fails**: unknown or malformed tokens are ignored.
//!
//! # Grammar
//!
//! - `-name`, `--name` (and `/name` on Windows) introduce a flag
//! - `-name=value`, `-name:value` attach a value; surrounding quotes are stripped
//! - `name=value` without a prefix is accepted as well
//! - a bare token directly after a flag that has no value becomes that flag's value
//! - names are case-insensitive
//!
//! A flag given without a value is *present* with no value, which is different from a flag given
//! with an empty value (`-server=`), and both differ from an absent flag.
//!
//! # Examples
//!
//! ```rust
//! use updraft_cli::args::Arguments;
//!
//! let args = Arguments::parse(["-autoupdate", "-cdata=client.wyc", "-s"]);
//! assert!(args.contains("autoupdate"));
//! assert_eq!(args.value("cdata"), Some("client.wyc"));
//! assert_eq!(args.value("s"), None);
//! assert!(!args.contains("uninstall"));
//! ```

mod client_file;
mod updater_args;

pub use client_file::{ClientFileLocation, PathProbe, RealFs};
pub use updater_args::{QuickCheck, UpdaterArgs};

use std::collections::BTreeMap;

/// Flag names understood by [`UpdaterArgs`].
pub mod flags {
    /// Path to the self-update record left by the previous process
    pub const SELF_UPDATE_FILE: &str = "supdf";
    /// Unattended update run
    pub const AUTO_UPDATE: &str = "autoupdate";
    /// This process is the continuation of a handoff
    pub const NEW_SELF: &str = "ns";
    /// Silent check-only run
    pub const QUICK_CHECK: &str = "quickcheck";
    /// Suppress the error frame of a quick check
    pub const NO_ERROR: &str = "noerr";
    /// Explicit client metadata path
    pub const CLIENT_DATA: &str = "cdata";
    /// Base install directory override
    pub const BASE_DIR: &str = "basedir";
    /// Working directory override
    pub const TEMP_DIR: &str = "tempdir";
    /// Uninstall the product
    pub const UNINSTALL: &str = "uninstall";
    /// Server metadata source override
    pub const SERVER: &str = "server";
    /// Silent (honoured with `uninstall` only)
    pub const SILENT: &str = "s";
}

/// Immutable flag name → optional value mapping produced once from the raw process arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    flags: BTreeMap<String, Option<String>>,
}

impl Arguments {
    /// Tokenize raw arguments (without the program name).
    pub fn parse<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut flags: BTreeMap<String, Option<String>> = BTreeMap::new();
        // Flag still waiting for a value from the next bare token.
        let mut pending: Option<String> = None;

        for token in raw {
            let token = token.as_ref().trim();
            if token.is_empty() {
                continue;
            }

            if let Some(body) = strip_flag_prefix(token) {
                pending = None;
                let (name, value) = split_name_value(body);
                let Some(name) = normalize_name(name) else {
                    continue;
                };
                if value.is_none() {
                    pending = Some(name.clone());
                }
                flags.insert(name, value);
            } else if let Some(name) = pending.take() {
                flags.insert(name, Some(unquote(token).to_string()));
            } else if token.contains('=') {
                let (name, value) = split_name_value(token);
                if let Some(name) = normalize_name(name) {
                    flags.insert(name, value);
                }
            }
        }

        Self { flags }
    }

    /// Whether the flag was given, with or without a value.
    pub fn contains(&self, name: &str) -> bool {
        self.flags.contains_key(&name.to_ascii_lowercase())
    }

    /// The flag's value; `None` when absent or given without a value.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.flags.get(&name.to_ascii_lowercase()).and_then(|v| v.as_deref())
    }

    /// The flag's value when present and not empty.
    pub fn non_empty_value(&self, name: &str) -> Option<&str> {
        self.value(name).filter(|v| !v.trim().is_empty())
    }

    /// Names of all flags given, including ones the updater does not understand.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.flags.keys().map(String::as_str)
    }

    /// Renders flags back into tokens this parser reads identically.
    pub fn to_tokens(&self) -> Vec<String> {
        self.flags
            .iter()
            .map(|(name, value)| match value {
                Some(value) => format!("-{name}={value}"),
                None => format!("-{name}"),
            })
            .collect()
    }
}

fn strip_flag_prefix(token: &str) -> Option<&str> {
    if let Some(rest) = token.strip_prefix("--") {
        return Some(rest);
    }
    if let Some(rest) = token.strip_prefix('-') {
        return Some(rest);
    }
    if cfg!(windows) {
        return token.strip_prefix('/');
    }
    None
}

fn split_name_value(body: &str) -> (&str, Option<String>) {
    match body.find(['=', ':']) {
        Some(idx) => (&body[..idx], Some(unquote(&body[idx + 1..]).to_string())),
        None => (body, None),
    }
}

fn normalize_name(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return None;
    }
    Some(name.to_ascii_lowercase())
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value)
}
