use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// A process to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Start with administrator rights
    pub elevated: bool,
}

/// Starts detached processes. Returns the process id.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, command: &LaunchCommand) -> std::io::Result<u32>;
}

/// Launcher backed by [`std::process::Command`].
///
/// Elevated launches are prefixed with the configured elevation command (for example
/// `["sudo", "-E"]`). Without one the process starts unprivileged and will report the denied
/// elevation itself.
#[derive(Debug, Clone, Default)]
pub struct SystemLauncher {
    elevation_command: Vec<String>,
}

impl SystemLauncher {
    pub fn new(elevation_command: Vec<String>) -> Self {
        Self {
            elevation_command,
        }
    }

    fn command(&self, launch: &LaunchCommand) -> Command {
        match self.elevation_command.split_first() {
            Some((program, prefix)) if launch.elevated => {
                let mut command = Command::new(program);
                command.args(prefix).arg(&launch.program).args(&launch.args);
                command
            }
            _ => {
                if launch.elevated {
                    warn!("No elevation command configured; launching without elevation");
                }
                let mut command = Command::new(&launch.program);
                command.args(&launch.args);
                command
            }
        }
    }
}

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, launch: &LaunchCommand) -> std::io::Result<u32> {
        let mut command = self.command(launch);
        command.stdin(Stdio::inherit()).stdout(Stdio::inherit()).stderr(Stdio::inherit());
        debug!("Launching {:?}", command);
        let child = command.spawn()?;
        Ok(child.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch(elevated: bool) -> LaunchCommand {
        LaunchCommand {
            program: PathBuf::from("/opt/acme/updraft"),
            args: vec!["-ns".to_string()],
            elevated,
        }
    }

    #[test]
    fn test_elevated_launch_uses_prefix() {
        let launcher = SystemLauncher::new(vec!["sudo".to_string(), "-E".to_string()]);
        let command = launcher.command(&launch(true));
        assert_eq!(command.get_program(), "sudo");
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["-E", "/opt/acme/updraft", "-ns"]);
    }

    #[test]
    fn test_plain_launch_ignores_prefix() {
        let launcher = SystemLauncher::new(vec!["sudo".to_string()]);
        let command = launcher.command(&launch(false));
        assert_eq!(command.get_program(), "/opt/acme/updraft");
    }

    #[test]
    fn test_spawn_missing_program_fails() {
        let mut missing = launch(false);
        missing.program = PathBuf::from("/definitely/not/here/updraft");
        assert!(SystemLauncher::default().launch(&missing).is_err());
    }
}
