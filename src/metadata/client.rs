//! Client metadata file.
//!
//! | variant | extension | encoding |
//! |---|---|---|
//! | [`ClientFileFormat::Final`] | anything else (`client.wyc`) | JSON document |
//! | [`ClientFileFormat::Rc2`] | `.iucz` | zip archive holding `client.json` |
//! | [`ClientFileFormat::PreRc2`] | `.iuc` | TOML with the legacy key names |

use crate::core::UpdraftError;
use crate::utils::fs::atomic_write;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

/// Entry name of the JSON document inside an `.iucz` archive.
const RC2_ENTRY: &str = "client.json";

/// Encoding of the client metadata file, inferred from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientFileFormat {
    /// Current format
    Final,
    /// Compressed compatibility format
    Rc2,
    /// Oldest compatibility format, read with the obsolete loader
    PreRc2,
}

impl ClientFileFormat {
    /// Infer the variant from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("iuc") => Self::PreRc2,
            Some("iucz") => Self::Rc2,
            _ => Self::Final,
        }
    }
}

/// Opaque layout hints handed to the presenter untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_image_align: Option<String>,
    #[serde(default)]
    pub header_text_indent: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_text_color: Option<String>,
    #[serde(default)]
    pub hide_header_divider: bool,
}

/// Description of the installed product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    /// Product display name, also the name of its long-lived data directory
    pub product_name: String,
    /// Installed version (semver, a leading `v` is tolerated)
    pub installed_version: String,
    /// Locations tried in order when fetching the server file
    #[serde(default)]
    pub server_files: Vec<String>,
    #[serde(default)]
    pub presentation: PresentationHints,
}

/// Field names used by the oldest client files.
#[derive(Debug, Deserialize, Serialize)]
struct LegacyClientFile {
    product: String,
    version: String,
    #[serde(default)]
    server: Vec<String>,
}

impl ClientMetadata {
    /// Load the client file with the loader matching `format`.
    pub fn load(path: &Path, format: ClientFileFormat) -> Result<Self, UpdraftError> {
        let corrupt = |reason: String| UpdraftError::ClientMetadataCorrupt {
            path: path.display().to_string(),
            reason,
        };

        let bytes = fs::read(path).map_err(|e| corrupt(e.to_string()))?;

        let metadata: Self = match format {
            ClientFileFormat::Final => {
                serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?
            }
            ClientFileFormat::Rc2 => {
                let json = read_rc2_document(&bytes).map_err(corrupt)?;
                serde_json::from_slice(&json).map_err(|e| corrupt(e.to_string()))?
            }
            ClientFileFormat::PreRc2 => {
                let text = String::from_utf8(bytes).map_err(|e| corrupt(e.to_string()))?;
                let legacy: LegacyClientFile =
                    toml::from_str(&text).map_err(|e| corrupt(e.to_string()))?;
                Self {
                    product_name: legacy.product,
                    installed_version: legacy.version,
                    server_files: legacy.server,
                    presentation: PresentationHints::default(),
                }
            }
        };

        if metadata.product_name.trim().is_empty() {
            return Err(corrupt("product name is empty".to_string()));
        }

        Ok(metadata)
    }

    /// Write the client file in the given variant, atomically.
    pub fn save(&self, path: &Path, format: ClientFileFormat) -> anyhow::Result<()> {
        let bytes = match format {
            ClientFileFormat::Final => serde_json::to_vec_pretty(self)?,
            ClientFileFormat::Rc2 => {
                let json = serde_json::to_vec_pretty(self)?;
                let mut buffer = std::io::Cursor::new(Vec::new());
                {
                    let mut zip = zip::ZipWriter::new(&mut buffer);
                    zip.start_file(RC2_ENTRY, zip::write::SimpleFileOptions::default())?;
                    zip.write_all(&json)?;
                    zip.finish()?;
                }
                buffer.into_inner()
            }
            ClientFileFormat::PreRc2 => toml::to_string(&LegacyClientFile {
                product: self.product_name.clone(),
                version: self.installed_version.clone(),
                server: self.server_files.clone(),
            })?
            .into_bytes(),
        };
        atomic_write(path, &bytes)
    }
}

fn read_rc2_document(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let mut entry = archive.by_name(RC2_ENTRY).map_err(|e| e.to_string())?;
    let mut json = Vec::new();
    entry.read_to_end(&mut json).map_err(|e| e.to_string())?;
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> ClientMetadata {
        ClientMetadata {
            product_name: "Acme Editor".to_string(),
            installed_version: "1.2.0".to_string(),
            server_files: vec!["https://updates.example.com/acme.json".to_string()],
            presentation: PresentationHints::default(),
        }
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ClientFileFormat::from_path(Path::new("iuclient.iuc")),
            ClientFileFormat::PreRc2
        );
        assert_eq!(ClientFileFormat::from_path(Path::new("iuclient.IUCZ")), ClientFileFormat::Rc2);
        assert_eq!(ClientFileFormat::from_path(Path::new("client.wyc")), ClientFileFormat::Final);
        assert_eq!(ClientFileFormat::from_path(Path::new("client")), ClientFileFormat::Final);
    }

    #[test]
    fn test_each_variant_loads_what_was_saved() {
        let temp = TempDir::new().unwrap();
        for (name, format) in [
            ("client.wyc", ClientFileFormat::Final),
            ("iuclient.iucz", ClientFileFormat::Rc2),
            ("iuclient.iuc", ClientFileFormat::PreRc2),
        ] {
            let path = temp.path().join(name);
            sample().save(&path, format).unwrap();
            let loaded = ClientMetadata::load(&path, format).unwrap();
            assert_eq!(loaded, sample(), "variant {format:?}");
        }
    }

    #[test]
    fn test_corrupt_file_reports_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("client.wyc");
        fs::write(&path, "{ not json").unwrap();

        let err = ClientMetadata::load(&path, ClientFileFormat::Final).unwrap_err();
        match err {
            UpdraftError::ClientMetadataCorrupt { reason, .. } => assert!(!reason.is_empty()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_corrupt_client() {
        let temp = TempDir::new().unwrap();
        let err = ClientMetadata::load(&temp.path().join("client.wyc"), ClientFileFormat::Final)
            .unwrap_err();
        assert!(matches!(err, UpdraftError::ClientMetadataCorrupt { .. }));
    }

    #[test]
    fn test_rc2_without_entry_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("iuclient.iucz");
        fs::write(&path, b"PK not really").unwrap();

        assert!(ClientMetadata::load(&path, ClientFileFormat::Rc2).is_err());
    }
}
