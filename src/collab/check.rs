use super::transport::{Transport, TransferError};
use super::{CheckReport, CheckRequest, UpdateChecker};
use crate::core::UpdraftError;
use crate::metadata::ServerMetadata;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fetches the server file from the first reachable location.
#[derive(Debug, Clone)]
pub struct ServerFileChecker {
    transport: Transport,
}

impl ServerFileChecker {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
        }
    }
}

impl UpdateChecker for ServerFileChecker {
    fn check(
        &self,
        request: &CheckRequest,
        cancel: &CancellationToken,
    ) -> Result<CheckReport, UpdraftError> {
        let mut last_failure = None;

        for source in &request.sources {
            match self.transport.fetch(source, &request.destination, cancel) {
                Ok(()) => {
                    last_failure = None;
                    break;
                }
                Err(TransferError::Cancelled) => return Err(UpdraftError::Cancelled),
                Err(TransferError::Failed(reason)) => {
                    warn!("Server file location {} unreachable: {}", source, reason);
                    last_failure = Some((source.clone(), reason));
                }
            }
        }

        if request.sources.is_empty() {
            last_failure =
                Some(("(none)".to_string(), "no server file locations configured".to_string()));
        }
        if let Some((location, reason)) = last_failure {
            return Err(UpdraftError::ServerMetadataUnreachable {
                location,
                reason,
            });
        }

        let server = ServerMetadata::load(&request.destination)?;
        let update_available = server.is_newer_than(&request.installed_version);
        let self_update = if update_available {
            server.updater.clone().filter(|u| u.is_newer_than(&request.updater_version))
        } else {
            None
        };

        if update_available {
            info!("Update available: {} -> {}", request.installed_version, server.new_version);
        } else {
            debug!("Installed version {} is current", request.installed_version);
        }

        Ok(CheckReport {
            server_file: request.destination.clone(),
            server,
            update_available,
            self_update,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn request(temp: &TempDir, sources: Vec<String>) -> CheckRequest {
        CheckRequest {
            sources,
            destination: temp.path().join("work").join("server.json"),
            installed_version: "1.0.0".to_string(),
            updater_version: "0.5.0".to_string(),
        }
    }

    fn write_server(temp: &TempDir, value: serde_json::Value) -> String {
        let path = temp.path().join("published.json");
        std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
        path.display().to_string()
    }

    fn checker() -> ServerFileChecker {
        ServerFileChecker::new(Transport::new(5, "test".to_string()))
    }

    #[test]
    fn test_falls_back_to_next_location() {
        let temp = TempDir::new().unwrap();
        let published = write_server(
            &temp,
            json!({
                "new_version": "1.1.0",
                "updater": {"version": "0.6.0", "url": "u", "sha256": "s", "executable": "updraft"}
            }),
        );
        let missing = temp.path().join("missing.json").display().to_string();

        let report = checker()
            .check(&request(&temp, vec![missing, published]), &CancellationToken::new())
            .unwrap();
        assert!(report.update_available);
        assert_eq!(report.self_update.unwrap().version, "0.6.0");
        assert!(report.server_file.exists());
    }

    #[test]
    fn test_current_version_reports_no_update() {
        let temp = TempDir::new().unwrap();
        let published = write_server(&temp, json!({"new_version": "1.0.0"}));

        let report =
            checker().check(&request(&temp, vec![published]), &CancellationToken::new()).unwrap();
        assert!(!report.update_available);
        assert!(report.self_update.is_none());
    }

    #[test]
    fn test_unreachable_and_corrupt() {
        let temp = TempDir::new().unwrap();
        let err = checker().check(&request(&temp, vec![]), &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, UpdraftError::ServerMetadataUnreachable { .. }));

        let path = temp.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        let err = checker()
            .check(&request(&temp, vec![path.display().to_string()]), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, UpdraftError::ServerMetadataCorrupt { .. }));
    }
}
