use crate::command::ExitCode;
use crate::config::Config;
use crate::env::Environment;
use crate::error::Result;
use crate::external::{ProcessBridge, ShellBridge, ShellKind, ShellOutcome, ShellRequest};
use crate::journal::Journal;
use crate::profile::{Profile, ProfileStore};
use indexmap::IndexMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Execution context handed to every glyph.
///
/// Owns the active profile (variables, aliases, settings), the journal, the working
/// directory, the script arguments and the IO handles. Nothing here is global: two
/// sessions in one process never observe each other.
pub struct Session {
    config: Config,
    profile: Profile,
    profiles: ProfileStore,
    journal: Journal,
    cwd: PathBuf,
    args: Vec<String>,
    shell: Box<dyn ShellBridge>,
    input: Box<dyn BufRead>,
    output: Box<dyn Write>,
    errors: Box<dyn Write>,
    interrupt: Arc<AtomicBool>,
}

impl Session {
    /// Create a session on the process stdio, loading the configured profile.
    pub fn new(config: Config) -> Result<Self> {
        let profiles = ProfileStore::new(config.profiles_dir());
        let profile = profiles.load(&config.profile)?;
        let journal = Journal::new(&config.stash_dir, config.undo_limit);
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Ok(Self {
            config,
            profile,
            profiles,
            journal,
            cwd,
            args: Vec::new(),
            shell: Box::new(ProcessBridge::default()),
            input: Box::new(io::BufReader::new(io::stdin())),
            output: Box::new(io::stdout()),
            errors: Box::new(io::stderr()),
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_input(mut self, input: impl BufRead + 'static) -> Self {
        self.input = Box::new(input);
        self
    }

    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    pub fn with_errors(mut self, errors: impl Write + 'static) -> Self {
        self.errors = Box::new(errors);
        self
    }

    pub fn with_shell(mut self, shell: impl ShellBridge + 'static) -> Self {
        self.shell = Box::new(shell);
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn env(&self) -> &Environment {
        &self.profile.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.profile.env
    }

    pub fn last(&self) -> ExitCode {
        self.profile.env.last()
    }

    pub fn set_last(&mut self, code: ExitCode) {
        self.profile.env.set_last(code);
    }

    pub fn aliases(&self) -> &IndexMap<String, String> {
        &self.profile.aliases
    }

    pub fn aliases_mut(&mut self) -> &mut IndexMap<String, String> {
        &mut self.profile.aliases
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Make `profile` the active one. The previous profile is dropped unsaved.
    pub fn set_profile(&mut self, profile: Profile) {
        self.profile = profile;
    }

    pub fn settings_mut(&mut self) -> &mut IndexMap<String, String> {
        &mut self.profile.settings
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn journal_mut(&mut self) -> &mut Journal {
        &mut self.journal
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn set_cwd(&mut self, cwd: PathBuf) {
        self.cwd = cwd;
    }

    /// Interpret `path` relative to the working directory.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }

    /// Arguments of the running script.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Install the arguments of a nested script and return the caller's.
    pub fn replace_args(&mut self, args: Vec<String>) -> Vec<String> {
        std::mem::replace(&mut self.args, args)
    }

    pub fn output(&mut self) -> &mut dyn Write {
        &mut *self.output
    }

    pub fn errors(&mut self) -> &mut dyn Write {
        &mut *self.errors
    }

    /// Print `prompt` and read one line of input without its line ending.
    ///
    /// Returns `None` at end of input.
    pub fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        if !prompt.is_empty() {
            write!(self.output, "{prompt}")?;
            self.output.flush()?;
        }
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    /// Run `command` (or an interactive shell) through the shell bridge.
    pub fn run_shell(
        &mut self,
        kind: ShellKind,
        command: Option<String>,
    ) -> anyhow::Result<ShellOutcome> {
        let request = ShellRequest {
            command,
            cwd: self.cwd.clone(),
            env: self.profile.env.exported(),
        };
        self.output.flush()?;
        self.shell.execute(kind, &request)
    }

    /// Flag set asynchronously (Ctrl-C) to stop the running script.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    pub fn clear_interrupt(&self) {
        self.interrupt.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_adapters::{MemReader, MemWriter};
    use crate::value::Value;

    fn session(home: &Path) -> Session {
        Session::new(Config::with_home(home)).unwrap()
    }

    #[test]
    fn test_read_line_strips_newline_and_prints_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let out = MemWriter::new();
        let mut s = session(dir.path())
            .with_input(MemReader::new("Ada\r\nrest"))
            .with_output(out.clone());
        assert_eq!(s.read_line("Name? ").unwrap(), Some("Ada".to_string()));
        assert_eq!(s.read_line("").unwrap(), Some("rest".to_string()));
        assert_eq!(s.read_line("").unwrap(), None);
        assert_eq!(out.contents(), "Name? ");
    }

    #[test]
    fn test_loads_configured_profile() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("profiles"));
        let mut profile = Profile::new("default");
        profile.env.assign("colour", Value::Str("teal".into())).unwrap();
        store.save(&profile).unwrap();

        let s = session(dir.path());
        assert_eq!(s.env().get("colour"), Some(Value::Str("teal".into())));
    }

    #[test]
    fn test_resolve_path_against_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path()).with_cwd(dir.path());
        assert_eq!(s.resolve_path("a.txt"), dir.path().join("a.txt"));
        assert_eq!(s.resolve_path("/abs"), PathBuf::from("/abs"));
    }

    #[test]
    fn test_args_are_swapped_for_nested_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        s.replace_args(vec!["outer".into()]);
        let saved = s.replace_args(vec!["inner".into()]);
        assert_eq!(s.args(), ["inner".to_string()]);
        s.replace_args(saved);
        assert_eq!(s.args(), ["outer".to_string()]);
    }
}
