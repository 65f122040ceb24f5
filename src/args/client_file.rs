//! Client file location and probing.

use crate::metadata::ClientFileFormat;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Well-known client file names, in probing order.
const PROBE_ORDER: [(&str, ClientFileFormat); 3] = [
    ("client.wyc", ClientFileFormat::Final),
    ("iuclient.iucz", ClientFileFormat::Rc2),
    ("iuclient.iuc", ClientFileFormat::PreRc2),
];

/// Filesystem existence checks, so probing can run against a stub.
pub trait PathProbe {
    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool {
        self.exists(path)
    }
}

/// [`PathProbe`] backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFs;

impl PathProbe for RealFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

/// Where the client metadata lives and how it is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientFileLocation {
    pub path: PathBuf,
    pub format: ClientFileFormat,
}

impl ClientFileLocation {
    /// An explicit path, with the variant inferred from its extension.
    pub fn explicit(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = ClientFileFormat::from_path(&path);
        Self { path, format }
    }

    /// Probe `dir` for the well-known file names.
    ///
    /// The first existing name wins. When none exists the oldest variant is assumed, so the
    /// subsequent load reports a missing client file against that path.
    pub fn probe(dir: &Path, fs: &impl PathProbe) -> Self {
        for (name, format) in PROBE_ORDER {
            let path = dir.join(name);
            if fs.exists(&path) {
                debug!("Found client file {} ({:?})", path.display(), format);
                return Self { path, format };
            }
        }

        let (name, format) = PROBE_ORDER[PROBE_ORDER.len() - 1];
        debug!("No client file found in {}, defaulting to {}", dir.display(), name);
        Self {
            path: dir.join(name),
            format,
        }
    }
}
