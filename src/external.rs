use crate::command::{ExitCode, Glyph};
use crate::error::UNKNOWN_COMMAND_STATUS;
use crate::session::Session;
use anyhow::{Context, Result};
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use tracing::debug;

/// Host shells reachable through the shell bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    PowerShell,
    Cmd,
    Posix,
}

impl ShellKind {
    /// Candidate executables, most preferred first.
    fn programs(self) -> &'static [&'static str] {
        match self {
            ShellKind::PowerShell => &["pwsh", "powershell"],
            ShellKind::Cmd => &["cmd"],
            ShellKind::Posix => &["sh"],
        }
    }

    fn command_args(self) -> &'static [&'static str] {
        match self {
            ShellKind::PowerShell => &["-NoProfile", "-Command"],
            ShellKind::Cmd => &["/C"],
            ShellKind::Posix => &["-c"],
        }
    }
}

impl fmt::Display for ShellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShellKind::PowerShell => "powershell",
            ShellKind::Cmd => "cmd",
            ShellKind::Posix => "sh",
        })
    }
}

/// What the executor asks a host shell to do.
#[derive(Debug, Clone, Default)]
pub struct ShellRequest {
    /// Command string; `None` starts the shell interactively.
    pub command: Option<String>,
    pub cwd: PathBuf,
    /// Exported Sigil variables.
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutcome {
    pub status: ExitCode,
    /// Captured output; empty for interactive sessions.
    pub output: String,
}

/// Hands command strings to a host shell.
pub trait ShellBridge {
    fn execute(&mut self, kind: ShellKind, request: &ShellRequest) -> Result<ShellOutcome>;
}

/// Bridge that spawns the real shell found on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct ProcessBridge {
    search_path: Option<OsString>,
}

impl ProcessBridge {
    /// Look shells up in `search_path` instead of the process `PATH`.
    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }

    fn locate(&self, kind: ShellKind) -> Option<PathBuf> {
        let search_path = self
            .search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"))?;
        kind.programs().iter().find_map(|program| {
            find_command_path(&search_path, Path::new(program)).map(Cow::into_owned)
        })
    }
}

impl ShellBridge for ProcessBridge {
    fn execute(&mut self, kind: ShellKind, request: &ShellRequest) -> Result<ShellOutcome> {
        let Some(program) = self.locate(kind) else {
            return Ok(ShellOutcome {
                status: UNKNOWN_COMMAND_STATUS,
                output: format!("{kind}: interpreter not found\n"),
            });
        };
        debug!(shell = %kind, program = %program.display(), "shell bridge");

        let mut cmd = Command::new(&program);
        cmd.current_dir(&request.cwd)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        match &request.command {
            Some(command) => {
                let output = cmd
                    .args(kind.command_args())
                    .arg(command)
                    .stdin(Stdio::null())
                    .output()
                    .with_context(|| format!("{kind}: failed to run {}", program.display()))?;
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                Ok(ShellOutcome {
                    status: status_code(output.status),
                    output: text,
                })
            }
            None => {
                let status = cmd
                    .status()
                    .with_context(|| format!("{kind}: failed to start {}", program.display()))?;
                Ok(ShellOutcome {
                    status: status_code(status),
                    output: String::new(),
                })
            }
        }
    }
}

/// A plugin command backed by an executable file.
pub struct ExternalGlyph {
    name: String,
    program: PathBuf,
    summary: String,
}

impl ExternalGlyph {
    pub fn new(name: impl Into<String>, program: PathBuf, summary: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program,
            summary: summary.into(),
        }
    }
}

impl Glyph for ExternalGlyph {
    fn name(&self) -> &str {
        &self.name
    }

    fn summary(&self) -> &str {
        &self.summary
    }

    fn invoke(&self, args: &[String], session: &mut Session) -> Result<ExitCode> {
        let output = Command::new(&self.program)
            .args(args)
            .envs(session.env().exported())
            .current_dir(session.cwd())
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("can't run {}", self.program.display()))?;
        session.output().write_all(&output.stdout)?;
        session.errors().write_all(&output.stderr)?;
        Ok(status_code(output.status))
    }
}

fn status_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(code) => code,
        None => terminated_by_signal(status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> ExitCode {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Relative with multiple components (e.g., `bin/sh`): returns it if it exists.
/// - `./foo` on Unix or any `./`-prefixed path on other platforms: returns it if it exists.
/// - Single path component: search each directory in `search_paths` and return the first
///   existing match (also trying `.exe` on Windows).
/// - Empty path: returns `None`.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let search_in_current_dir = cfg!(not(unix)) || path.starts_with("./");
    if search_in_current_dir && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, None) => None,
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        let path = dir.join(cmd);
        if path.is_file() {
            return Some(path);
        }
        if cfg!(windows) {
            let exe = path.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    #[test]
    #[cfg(unix)]
    fn absolute_existing_true() {
        let path = Path::new("/bin/sh");
        let found = find_command_path(osstr("/bin"), path).expect("absolute /bin/sh");
        assert_eq!(found.as_ref(), path);
    }

    #[test]
    #[cfg(unix)]
    fn absolute_nonexisting() {
        let path = Path::new("/bin/nonexisting");
        assert!(find_command_path(osstr("/bin"), path).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn single_component_found_in_path() {
        let found = find_command_path(osstr("/nowhere:/bin"), Path::new("sh"))
            .expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found.as_ref(), Path::new("/bin/sh"));
    }

    #[test]
    #[cfg(unix)]
    fn multiple_components_relative_to_process_dir() {
        assert!(find_command_path(osstr("/bin"), Path::new("no/such/tool")).is_none());
    }

    #[test]
    fn empty_path_is_none() {
        assert!(find_command_path(OsStr::new("/bin"), Path::new("")).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn bridge_captures_output_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut bridge = ProcessBridge::default();
        let request = ShellRequest {
            command: Some("echo \"$GREETING\" && pwd && exit 3".to_string()),
            cwd: dir.path().to_path_buf(),
            env: vec![("GREETING".to_string(), "hi".to_string())],
        };
        let outcome = bridge.execute(ShellKind::Posix, &request).unwrap();
        assert_eq!(outcome.status, 3);
        let mut lines = outcome.output.lines();
        assert_eq!(lines.next(), Some("hi"));
        let pwd = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(
            std::fs::canonicalize(lines.next().unwrap()).unwrap(),
            pwd
        );
    }

    #[test]
    fn bridge_reports_missing_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let mut bridge = ProcessBridge::with_search_path(dir.path().as_os_str());
        let request = ShellRequest {
            command: Some("Get-Date".to_string()),
            cwd: dir.path().to_path_buf(),
            env: Vec::new(),
        };
        let outcome = bridge.execute(ShellKind::PowerShell, &request).unwrap();
        assert_eq!(outcome.status, UNKNOWN_COMMAND_STATUS);
        assert!(outcome.output.contains("not found"));
    }
}
