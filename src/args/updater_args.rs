//! Typed view of the recognized flags.

use super::client_file::{ClientFileLocation, PathProbe};
use super::{Arguments, flags};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Quick check options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickCheck {
    /// Close silently instead of showing the Error frame (`noerr`)
    pub suppress_errors: bool,
}

/// Configuration derived from [`Arguments`].
///
/// When `supdf` is given the run continues a handoff, and every flag except `ns` is ignored: the
/// self-update record carries the rest of the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdaterArgs {
    pub self_update_file: Option<PathBuf>,
    /// Declared continuation of a handoff (`ns`)
    pub new_self: bool,
    pub auto_update: bool,
    pub quick_check: Option<QuickCheck>,
    pub client_file: ClientFileLocation,
    pub base_dir: PathBuf,
    /// Working directory supplied on the command line
    pub temp_dir: Option<PathBuf>,
    pub uninstall: bool,
    pub server_override: Option<String>,
    /// Silent uninstall, no window
    pub silent: bool,
}

impl UpdaterArgs {
    /// Derive the typed configuration.
    ///
    /// `install_dir` is the directory holding the updater executable; it is both the default
    /// base directory and the directory probed for the client file.
    pub fn from_arguments(args: &Arguments, install_dir: &Path, fs: &impl PathProbe) -> Self {
        let mut typed = Self {
            self_update_file: args.non_empty_value(flags::SELF_UPDATE_FILE).map(PathBuf::from),
            new_self: args.contains(flags::NEW_SELF),
            auto_update: false,
            quick_check: None,
            client_file: ClientFileLocation::probe(install_dir, fs),
            base_dir: install_dir.to_path_buf(),
            temp_dir: None,
            uninstall: false,
            server_override: None,
            silent: false,
        };

        if typed.self_update_file.is_some() {
            return typed;
        }

        typed.auto_update = args.contains(flags::AUTO_UPDATE);

        if args.contains(flags::QUICK_CHECK) {
            typed.quick_check = Some(QuickCheck {
                suppress_errors: args.contains(flags::NO_ERROR),
            });
        }

        if let Some(path) = args.non_empty_value(flags::CLIENT_DATA) {
            typed.client_file = ClientFileLocation::explicit(path);
        }

        if let Some(dir) = existing_dir(args, flags::BASE_DIR, fs) {
            typed.base_dir = dir;
        }

        typed.temp_dir = existing_dir(args, flags::TEMP_DIR, fs);

        typed.uninstall = args.contains(flags::UNINSTALL);
        typed.silent = typed.uninstall && args.contains(flags::SILENT);

        typed.server_override = args.non_empty_value(flags::SERVER).map(str::to_string);

        typed
    }

    /// Whether this process declared itself the continuation of a handoff.
    pub const fn is_continuation(&self) -> bool {
        self.new_self
    }
}

fn existing_dir(args: &Arguments, name: &str, fs: &impl PathProbe) -> Option<PathBuf> {
    let value = args.non_empty_value(name)?;
    let path = PathBuf::from(value);
    if fs.is_dir(&path) {
        Some(path)
    } else {
        warn!("Ignoring -{name}: {} is not an existing directory", path.display());
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::RealFs;
    use crate::metadata::ClientFileFormat;
    use tempfile::TempDir;

    fn typed(raw: &[&str], install_dir: &Path) -> UpdaterArgs {
        UpdaterArgs::from_arguments(&Arguments::parse(raw), install_dir, &RealFs)
    }

    #[test]
    fn test_defaults() {
        let temp = TempDir::new().unwrap();
        let args = typed(&[], temp.path());
        assert_eq!(args.base_dir, temp.path());
        assert!(args.self_update_file.is_none());
        assert!(!args.auto_update && !args.uninstall && !args.silent);
        assert_eq!(args.client_file.format, ClientFileFormat::PreRc2);
    }

    #[test]
    fn test_self_update_file_masks_other_flags() {
        let temp = TempDir::new().unwrap();
        let args = typed(&["-supdf=state.json", "-autoupdate", "-uninstall", "-ns"], temp.path());
        assert_eq!(args.self_update_file, Some(PathBuf::from("state.json")));
        assert!(args.new_self);
        assert!(!args.auto_update);
        assert!(!args.uninstall);
    }

    #[test]
    fn test_silent_requires_uninstall() {
        let temp = TempDir::new().unwrap();
        assert!(!typed(&["-s"], temp.path()).silent);
        assert!(typed(&["-uninstall", "-s"], temp.path()).silent);
        assert!(!typed(&["-uninstall"], temp.path()).silent);
    }

    #[test]
    fn test_dirs_must_exist() {
        let temp = TempDir::new().unwrap();
        let existing = temp.path().join("base");
        std::fs::create_dir(&existing).unwrap();
        let missing = temp.path().join("missing");

        let basedir = format!("-basedir={}", existing.display());
        let tempdir = format!("-tempdir={}", missing.display());

        let args = typed(&[basedir.as_str(), tempdir.as_str()], temp.path());
        assert_eq!(args.base_dir, existing);
        assert!(args.temp_dir.is_none());
    }

    #[test]
    fn test_quick_check_and_noerr() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            typed(&["-quickcheck", "-noerr"], temp.path()).quick_check,
            Some(QuickCheck { suppress_errors: true })
        );
        assert!(typed(&["-noerr"], temp.path()).quick_check.is_none());
    }

    #[test]
    fn test_explicit_client_and_server() {
        let temp = TempDir::new().unwrap();
        let args = typed(&["-cdata=legacy.iucz", "-server=https://mirror/s.json"], temp.path());
        assert_eq!(args.client_file.format, ClientFileFormat::Rc2);
        assert_eq!(args.server_override.as_deref(), Some("https://mirror/s.json"));
    }
}
