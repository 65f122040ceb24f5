//! On-disk fixture of an installed product and its published release.
//!
//! ```text
//! <root>/
//!   app/                 base directory
//!     client.wyc         client file pointing at release/server.json
//!     bin/tool           "v1"
//!   release/
//!     server.json
//!     payload.zip        bin/tool = "v2", NEW.txt
//!   data/  tmp/          configured data and temp roots
//! ```

use crate::collab::verification::ChecksumVerifier;
use crate::config::UpdaterConfig;
use crate::metadata::{
    ClientFileFormat, ClientMetadata, OperationKind, SelfServerMetadata, ServerMetadata,
    UpdatePackage,
};
use anyhow::Result;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

pub const PRODUCT_NAME: &str = "Acme";

pub struct ReleaseFixture {
    temp: TempDir,
    server: ServerMetadata,
}

impl ReleaseFixture {
    /// Product at `installed`, release `published` with a single user-files package.
    pub fn new(installed: &str, published: &str) -> Result<Self> {
        let temp = TempDir::new()?;
        let root = temp.path();
        for dir in ["app/bin", "release", "data", "tmp"] {
            std::fs::create_dir_all(root.join(dir))?;
        }
        std::fs::write(root.join("app/bin/tool"), b"v1")?;

        let archive = root.join("release/payload.zip");
        let mut writer = zip::ZipWriter::new(File::create(&archive)?);
        writer.start_file("bin/tool", SimpleFileOptions::default())?;
        writer.write_all(b"v2")?;
        writer.start_file("NEW.txt", SimpleFileOptions::default())?;
        writer.write_all(b"added in the release")?;
        writer.finish()?;

        let server = ServerMetadata {
            new_version: published.to_string(),
            changes: format!("What's new in {published}"),
            packages: vec![UpdatePackage {
                name: "payload.zip".to_string(),
                url: archive.display().to_string(),
                sha256: ChecksumVerifier::compute_sha256(&archive)?,
                operations: vec![OperationKind::UserFiles],
            }],
            updater: None,
        };

        let fixture = Self {
            temp,
            server,
        };
        fixture.write_server()?;

        let client = ClientMetadata {
            product_name: PRODUCT_NAME.to_string(),
            installed_version: installed.to_string(),
            server_files: vec![fixture.server_file().display().to_string()],
            presentation: Default::default(),
        };
        client.save(&fixture.client_file(), ClientFileFormat::Final)?;
        Ok(fixture)
    }

    /// Publish a newer updater binary alongside the release.
    pub fn with_updater(mut self, version: &str) -> Result<Self> {
        let binary = self.root().join("release/updraft-next");
        std::fs::write(&binary, format!("updater {version}"))?;
        self.server.updater = Some(SelfServerMetadata {
            version: version.to_string(),
            url: binary.display().to_string(),
            sha256: ChecksumVerifier::compute_sha256(&binary)?,
            executable: "updraft-next".to_string(),
        });
        self.write_server()?;
        Ok(self)
    }

    /// Mark every package as touching system files.
    pub fn with_system_operations(mut self) -> Result<Self> {
        for package in &mut self.server.packages {
            package.operations = vec![OperationKind::SystemFiles];
        }
        self.write_server()?;
        Ok(self)
    }

    fn write_server(&self) -> Result<()> {
        std::fs::write(self.server_file(), serde_json::to_vec_pretty(&self.server)?)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn base_dir(&self) -> PathBuf {
        self.root().join("app")
    }

    pub fn client_file(&self) -> PathBuf {
        self.base_dir().join("client.wyc")
    }

    pub fn server_file(&self) -> PathBuf {
        self.root().join("release/server.json")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root().join("data")
    }

    pub fn temp_root(&self) -> PathBuf {
        self.root().join("tmp")
    }

    /// Product directory used by unattended runs.
    pub fn product_dir(&self) -> PathBuf {
        self.data_dir().join(PRODUCT_NAME)
    }

    /// Configuration rooted in the fixture, with no protected install roots.
    pub fn config(&self) -> UpdaterConfig {
        UpdaterConfig {
            data_dir: Some(self.data_dir()),
            temp_root: Some(self.temp_root()),
            protected_roots: Some(Vec::new()),
            ..UpdaterConfig::default()
        }
    }

    pub fn installed_version(&self) -> Result<String> {
        Ok(ClientMetadata::load(&self.client_file(), ClientFileFormat::Final)?.installed_version)
    }

    /// Entries left under the temp root.
    pub fn working_dirs(&self) -> Result<Vec<PathBuf>> {
        Ok(std::fs::read_dir(self.temp_root())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect())
    }
}
