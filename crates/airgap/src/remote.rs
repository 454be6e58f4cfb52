//! SSH primitive.
//!
//! Remote work goes through the system `ssh` and `scp` binaries in batch
//! mode, so key agents, `~/.ssh/config` and known hosts behave exactly as
//! they do for the operator's own shell.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SshTarget {
    /// Hostname or IP address.
    pub host: String,
    /// Login user.
    pub user: String,
    /// SSH port.
    pub port: u16,
    /// Private key file, if not using the agent or ssh config.
    pub key_file: Option<PathBuf>,
}

impl SshTarget {
    /// Target on port 22 without explicit key.
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port: 22,
            key_file: None,
        }
    }

    /// Use a non-default port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Use an explicit private key.
    #[must_use]
    pub fn with_key_file(mut self, key_file: impl Into<PathBuf>) -> Self {
        self.key_file = Some(key_file.into());
        self
    }

    /// `user@host`.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Whether commands run as root without sudo.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.user == "root"
    }
}

impl fmt::Display for SshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Output of a remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status (-1 if killed by a signal).
    pub status: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Fail with the command's stderr unless it succeeded.
    pub fn check(self, target: &str, what: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            let detail = self.stderr.trim();
            Err(Error::remote(
                target,
                format!(
                    "{} failed (exit {}){}",
                    what,
                    self.status,
                    if detail.is_empty() {
                        String::new()
                    } else {
                        format!(": {}", detail)
                    }
                ),
            ))
        }
    }
}

/// An open session on one host.
pub trait RemoteSession: Send {
    /// Run a shell command.
    fn run(&mut self, command: &str) -> Result<CommandOutput>;

    /// Copy a local file to a remote path.
    fn upload(&mut self, local: &Path, remote: &str) -> Result<()>;
}

/// Opens sessions.
pub trait Connector: Send + Sync {
    /// Connect to a target.
    fn connect(&self, target: &SshTarget) -> Result<Box<dyn RemoteSession>>;
}

/// Quote a string for a POSIX shell.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Connector using the system OpenSSH client.
#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
}

impl SshConnector {
    /// Create a connector with a 10 second connect timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Change the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for SshConnector {
    fn connect(&self, target: &SshTarget) -> Result<Box<dyn RemoteSession>> {
        let ssh = which::which("ssh")
            .map_err(|_| Error::remote(target.host.clone(), "ssh not found in PATH"))?;
        let scp = which::which("scp")
            .map_err(|_| Error::remote(target.host.clone(), "scp not found in PATH"))?;

        let mut session = SshSession {
            target: target.clone(),
            ssh,
            scp,
            connect_timeout: self.connect_timeout,
        };
        session
            .run("true")?
            .check(&target.host, "connection check")?;
        log::debug!("Connected to {}", target);
        Ok(Box::new(session))
    }
}

struct SshSession {
    target: SshTarget,
    ssh: PathBuf,
    scp: PathBuf,
    connect_timeout: Duration,
}

impl SshSession {
    fn common_options(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ];
        if let Some(key) = &self.target.key_file {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args
    }

    fn output(&self, mut cmd: Command, what: &str) -> Result<CommandOutput> {
        log::trace!("{}: {:?}", self.target.host, cmd);
        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::remote(self.target.host.clone(), format!("{}: {}", what, e)))?;
        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl RemoteSession for SshSession {
    fn run(&mut self, command: &str) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.ssh);
        cmd.args(self.common_options())
            .arg("-p")
            .arg(self.target.port.to_string())
            .arg(self.target.destination())
            .arg(command);
        let output = self.output(cmd, "ssh")?;
        // 255 is ssh's own failure, not the remote command's
        if output.status == 255 {
            return Err(Error::remote(
                self.target.host.clone(),
                format!("ssh failed: {}", output.stderr.trim()),
            ));
        }
        Ok(output)
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<()> {
        let mut cmd = Command::new(&self.scp);
        cmd.args(self.common_options())
            .arg("-q")
            .arg("-P")
            .arg(self.target.port.to_string())
            .arg(local)
            .arg(format!("{}:{}", self.target.destination(), remote));
        self.output(cmd, "scp")?
            .check(&self.target.host, "upload")
            .map(|_| ())
    }
}

/// Recorded remote activity of a [`MockConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    /// A command ran on a host.
    Run {
        /// Host.
        host: String,
        /// Command line.
        command: String,
    },
    /// A file was uploaded to a host.
    Upload {
        /// Host.
        host: String,
        /// Remote path.
        remote: String,
    },
}

/// In-memory connector for tests.
///
/// Hosts can be made unreachable or made to fail any command containing a
/// given fragment. Peak concurrency is tracked across sessions.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    events: Arc<Mutex<Vec<MockEvent>>>,
    unreachable: Arc<Mutex<HashSet<String>>>,
    failing: Arc<Mutex<Vec<(String, String)>>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay: Duration,
}

impl MockConnector {
    /// Create a connector where every host works.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every upload for `delay`, to make overlap observable.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Refuse connections to `host`.
    pub fn set_unreachable(&self, host: &str) {
        self.unreachable.lock().unwrap().insert(host.to_string());
    }

    /// Fail commands on `host` that contain `fragment`.
    pub fn fail_command(&self, host: &str, fragment: &str) {
        self.failing
            .lock()
            .unwrap()
            .push((host.to_string(), fragment.to_string()));
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<MockEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Commands run on `host`, in order.
    #[must_use]
    pub fn commands_for(&self, host: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::Run { host: h, command } if h == host => Some(command),
                _ => None,
            })
            .collect()
    }

    /// Highest number of simultaneously open sessions.
    #[must_use]
    pub fn peak_sessions(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn connect(&self, target: &SshTarget) -> Result<Box<dyn RemoteSession>> {
        if self.unreachable.lock().unwrap().contains(&target.host) {
            return Err(Error::remote(
                target.host.clone(),
                "ssh: connect to host port 22: Connection refused",
            ));
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            host: target.host.clone(),
            connector: self.clone(),
        }))
    }
}

struct MockSession {
    host: String,
    connector: MockConnector,
}

impl RemoteSession for MockSession {
    fn run(&mut self, command: &str) -> Result<CommandOutput> {
        self.connector.events.lock().unwrap().push(MockEvent::Run {
            host: self.host.clone(),
            command: command.to_string(),
        });
        let fails = self
            .connector
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|(host, fragment)| *host == self.host && command.contains(fragment.as_str()));
        Ok(if fails {
            CommandOutput {
                status: 1,
                stdout: String::new(),
                stderr: "Error: no space left on device".to_string(),
            }
        } else {
            CommandOutput::default()
        })
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<()> {
        if !local.exists() {
            return Err(Error::remote(
                self.host.clone(),
                format!("{}: No such file or directory", local.display()),
            ));
        }
        if !self.connector.delay.is_zero() {
            std::thread::sleep(self.connector.delay);
        }
        self.connector.events.lock().unwrap().push(MockEvent::Upload {
            host: self.host.clone(),
            remote: remote.to_string(),
        });
        Ok(())
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.connector.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/tmp/a b"), "'/tmp/a b'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_ssh_target() {
        let target = SshTarget::new("10.0.0.5", "fog").with_port(2222);
        assert_eq!(target.destination(), "fog@10.0.0.5");
        assert_eq!(target.to_string(), "fog@10.0.0.5:2222");
        assert!(!target.is_root());
        assert!(SshTarget::new("h", "root").is_root());
    }

    #[test]
    fn test_command_output_check() {
        let ok = CommandOutput::default();
        assert!(ok.check("edge-1", "load").is_ok());

        let failed = CommandOutput {
            status: 125,
            stdout: String::new(),
            stderr: "permission denied\n".to_string(),
        };
        let err = failed.check("edge-1", "load").unwrap_err();
        assert_eq!(
            err.to_string(),
            "edge-1: load failed (exit 125): permission denied"
        );
    }

    #[test]
    fn test_ssh_options_include_key() {
        let session = SshSession {
            target: SshTarget::new("h", "u").with_key_file("/keys/id"),
            ssh: PathBuf::from("ssh"),
            scp: PathBuf::from("scp"),
            connect_timeout: Duration::from_secs(5),
        };
        let options = session.common_options();
        assert!(options.contains(&"BatchMode=yes".to_string()));
        assert!(options.contains(&"ConnectTimeout=5".to_string()));
        assert_eq!(&options[options.len() - 2..], ["-i", "/keys/id"]);
    }

    #[test]
    fn test_mock_connector_records_and_fails() {
        let connector = MockConnector::new();
        connector.set_unreachable("down");
        connector.fail_command("edge", "load");

        assert!(connector.connect(&SshTarget::new("down", "fog")).is_err());

        let mut session = connector.connect(&SshTarget::new("edge", "fog")).unwrap();
        assert!(session.run("mkdir -p /tmp/x").unwrap().success());
        assert!(!session.run("docker load -i x").unwrap().success());
        assert_eq!(connector.commands_for("edge").len(), 2);
        assert_eq!(connector.peak_sessions(), 1);
    }
}
