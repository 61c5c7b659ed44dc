use crate::command::{ExitCode, Glyph};
use crate::error::SigilError;
use crate::external::ShellKind;
use crate::journal::JournalError;
use crate::registry::{GlyphRegistry, Origin};
use crate::session::Session;
use anyhow::{Context, Result, anyhow, bail};
use argh::{EarlyExit, FromArgs};
use std::fs;
use std::io::Write;
use std::marker::PhantomData;
use std::path::Path;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

/// Glyphs implemented in Rust with arguments parsed by [`argh`].
///
/// Parsing failures and `--help` are answered with argh's own text and never reach
/// [`BuiltinGlyph::run`].
pub(crate) trait BuiltinGlyph: Sized + FromArgs {
    /// Canonical name, e.g. "mk" or "cd".
    fn name() -> &'static str;

    /// Additional names the glyph answers to.
    fn aliases() -> &'static [&'static str] {
        &[]
    }

    fn summary() -> &'static str;

    fn run(self, session: &mut Session) -> Result<ExitCode>;
}

/// Adapts a [`BuiltinGlyph`] type to the object-safe [`Glyph`] interface.
pub(crate) struct Builtin<T> {
    _phantom: PhantomData<T>,
}

impl<T> Default for Builtin<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: BuiltinGlyph> Glyph for Builtin<T> {
    fn name(&self) -> &str {
        T::name()
    }

    fn summary(&self) -> &str {
        T::summary()
    }

    fn invoke(&self, args: &[String], session: &mut Session) -> Result<ExitCode> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match T::from_args(&[T::name()], &args) {
            Ok(glyph) => glyph.run(session),
            Err(EarlyExit { output, status }) => match status {
                Ok(()) => {
                    writeln!(session.output(), "{}", output.trim_end())?;
                    Ok(0)
                }
                Err(()) => {
                    writeln!(session.errors(), "{}", output.trim_end())?;
                    Ok(1)
                }
            },
        }
    }
}

fn register<T: BuiltinGlyph + 'static>(registry: &mut GlyphRegistry) -> crate::error::Result<()> {
    let glyph: Rc<dyn Glyph> = Rc::new(Builtin::<T>::default());
    registry.register(T::name(), Rc::clone(&glyph), Origin::Builtin)?;
    for alias in T::aliases() {
        registry.register(alias, Rc::clone(&glyph), Origin::Builtin)?;
    }
    Ok(())
}

/// Register every built-in glyph.
pub(crate) fn register_builtins(registry: &mut GlyphRegistry) -> crate::error::Result<()> {
    register::<Mk>(registry)?;
    register::<Cpy>(registry)?;
    register::<Dlt>(registry)?;
    register::<Move>(registry)?;
    register::<Renm>(registry)?;
    register::<Fmt>(registry)?;
    register::<Undo>(registry)?;
    register::<Redo>(registry)?;
    register::<Cd>(registry)?;
    register::<Pwd>(registry)?;
    register::<Dirlook>(registry)?;
    register::<Siz>(registry)?;
    register::<Exists>(registry)?;
    register::<Wait>(registry)?;
    register::<Arg>(registry)?;
    register::<Var>(registry)?;
    register::<Unset>(registry)?;
    register::<Export>(registry)?;
    for (name, kind) in [
        ("ps", ShellKind::PowerShell),
        ("cmd", ShellKind::Cmd),
        ("cp", ShellKind::Cmd),
        ("sh", ShellKind::Posix),
    ] {
        registry.register(name, Rc::new(ShellGlyph { name, kind }), Origin::Builtin)?;
    }
    Ok(())
}

#[derive(FromArgs)]
/// create a directory or a file.
pub struct Mk {
    #[argh(subcommand)]
    target: MkTarget,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum MkTarget {
    Dir(MkDir),
    File(MkFile),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "dir")]
/// create a directory; an existing one is left alone.
struct MkDir {
    #[argh(positional)]
    /// directory to create, relative to the working directory.
    path: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "file")]
/// create a file, replacing any existing one.
struct MkFile {
    #[argh(positional)]
    /// file to create, relative to the working directory.
    path: String,

    #[argh(positional, greedy)]
    /// text written to the file, separated by spaces.
    content: Vec<String>,
}

impl BuiltinGlyph for Mk {
    fn name() -> &'static str {
        "mk"
    }

    fn summary() -> &'static str {
        "mk dir <path> | mk file <path> [text...]: create a directory or file"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        match self.target {
            MkTarget::Dir(MkDir { path }) => {
                let path = session.resolve_path(path);
                session.journal_mut().create_dir(&path)?;
            }
            MkTarget::File(MkFile { path, content }) => {
                let path = session.resolve_path(path);
                session
                    .journal_mut()
                    .create_file(&path, content.join(" ").into_bytes())?;
            }
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// copy a file or directory; an existing destination is replaced.
pub struct Cpy {
    #[argh(positional)]
    /// file or directory to copy.
    from: String,

    #[argh(positional)]
    /// destination path.
    to: String,
}

impl BuiltinGlyph for Cpy {
    fn name() -> &'static str {
        "cpy"
    }

    fn summary() -> &'static str {
        "cpy <from> <to>: copy a file or directory"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        let from = session.resolve_path(&self.from);
        let to = session.resolve_path(&self.to);
        session.journal_mut().copy(&from, &to)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// delete a file or directory (undoable).
pub struct Dlt {
    #[argh(positional)]
    /// file or directory to delete.
    path: String,
}

impl BuiltinGlyph for Dlt {
    fn name() -> &'static str {
        "dlt"
    }

    fn summary() -> &'static str {
        "dlt <path>: delete a file or directory"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        let path = session.resolve_path(&self.path);
        session.journal_mut().delete(&path)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// move a file or directory.
pub struct Move {
    #[argh(subcommand)]
    target: MoveTarget,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum MoveTarget {
    File(MoveFile),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "file")]
/// move a file or directory; an existing destination is replaced.
struct MoveFile {
    #[argh(positional)]
    /// path to move.
    from: String,

    #[argh(positional)]
    /// new location.
    to: String,
}

impl BuiltinGlyph for Move {
    fn name() -> &'static str {
        "move"
    }

    fn summary() -> &'static str {
        "move file <from> <to>: move a file or directory"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        let MoveTarget::File(MoveFile { from, to }) = self.target;
        let from = session.resolve_path(from);
        let to = session.resolve_path(to);
        session.journal_mut().rename(&from, &to)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// rename a file or directory.
pub struct Renm {
    #[argh(positional)]
    /// current name.
    old: String,

    #[argh(positional)]
    /// new name.
    new: String,
}

impl BuiltinGlyph for Renm {
    fn name() -> &'static str {
        "renm"
    }

    fn aliases() -> &'static [&'static str] {
        &["rename"]
    }

    fn summary() -> &'static str {
        "renm <old> <new>: rename a file or directory"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        let old = session.resolve_path(&self.old);
        let new = session.resolve_path(&self.new);
        session.journal_mut().rename(&old, &new)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// normalize a script in place: trailing blanks and trailing empty lines are removed.
pub struct Fmt {
    #[argh(positional)]
    /// script file to format.
    path: String,
}

/// Strip trailing whitespace from every line and end the text with one newline.
fn format_source(source: &str) -> String {
    let lines: Vec<&str> = source.lines().map(str::trim_end).collect();
    let mut text = lines.join("\n").trim_end().to_string();
    text.push('\n');
    text
}

impl BuiltinGlyph for Fmt {
    fn name() -> &'static str {
        "fmt"
    }

    fn summary() -> &'static str {
        "fmt <file>: normalize whitespace of a script (undoable)"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        let path = session.resolve_path(&self.path);
        let source = fs::read_to_string(&path)
            .with_context(|| format!("can't read {}", path.display()))?;
        let formatted = format_source(&source);
        if formatted == source {
            writeln!(session.output(), "already formatted: {}", path.display())?;
            return Ok(0);
        }
        session
            .journal_mut()
            .create_file(&path, formatted.into_bytes())?;
        writeln!(session.output(), "formatted: {}", path.display())?;
        Ok(0)
    }
}

/// Report an empty journal stack as a plain status, not an error.
fn journal_step(
    session: &mut Session,
    step: fn(&mut crate::journal::Journal) -> Result<crate::journal::Operation, JournalError>,
    verb: &str,
) -> Result<ExitCode> {
    match step(session.journal_mut()) {
        Ok(operation) => {
            writeln!(session.output(), "{verb}: {operation}")?;
            Ok(0)
        }
        Err(err @ (JournalError::NothingToUndo | JournalError::NothingToRedo)) => {
            writeln!(session.output(), "{err}")?;
            Ok(1)
        }
        Err(err) => Err(err.into()),
    }
}

#[derive(FromArgs)]
/// revert the most recent file operation.
pub struct Undo {}

impl BuiltinGlyph for Undo {
    fn name() -> &'static str {
        "undo"
    }

    fn summary() -> &'static str {
        "undo: revert the most recent file operation"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        journal_step(session, crate::journal::Journal::undo, "undone")
    }
}

#[derive(FromArgs)]
/// apply the most recently undone file operation again.
pub struct Redo {}

impl BuiltinGlyph for Redo {
    fn name() -> &'static str {
        "redo"
    }

    fn summary() -> &'static str {
        "redo: re-apply the most recently undone operation"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        journal_step(session, crate::journal::Journal::redo, "redone")
    }
}

#[derive(FromArgs)]
/// change the working directory; without a target, print it.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    target: Option<String>,
}

impl BuiltinGlyph for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn summary() -> &'static str {
        "cd [dir]: change (or show) the working directory"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        let Some(target) = self.target.filter(|t| !t.is_empty()) else {
            let cwd = session.cwd().display().to_string();
            writeln!(session.output(), "{cwd}")?;
            return Ok(0);
        };
        let new_dir = session.resolve_path(target);
        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("can't canonicalize {}", new_dir.display()))?;
        if !canonical.is_dir() {
            bail!("not a directory: {}", canonical.display());
        }
        session.set_cwd(canonical);
        Ok(0)
    }
}

#[derive(FromArgs)]
/// print the working directory.
pub struct Pwd {}

impl BuiltinGlyph for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn summary() -> &'static str {
        "pwd: print the working directory"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        let cwd = session.cwd().display().to_string();
        writeln!(session.output(), "{cwd}")?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// list a directory, directories first.
pub struct Dirlook {
    #[argh(positional)]
    /// directory to list; defaults to the working directory.
    path: Option<String>,
}

impl BuiltinGlyph for Dirlook {
    fn name() -> &'static str {
        "dirlook"
    }

    fn summary() -> &'static str {
        "dirlook [dir]: list directory contents"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        let dir = match &self.path {
            Some(path) => session.resolve_path(path),
            None => session.cwd().to_path_buf(),
        };
        let mut entries: Vec<(bool, String)> = fs::read_dir(&dir)
            .with_context(|| format!("can't list {}", dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| {
                let is_dir = e.path().is_dir();
                (!is_dir, e.file_name().to_string_lossy().into_owned())
            })
            .collect();
        entries.sort();
        let out = session.output();
        for (is_file, name) in entries {
            if is_file {
                writeln!(out, "{name}")?;
            } else {
                writeln!(out, "{name}/")?;
            }
        }
        Ok(0)
    }
}

fn total_size(path: &Path) -> std::io::Result<u64> {
    let metadata = fs::symlink_metadata(path)?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        total += total_size(&entry?.path())?;
    }
    Ok(total)
}

#[derive(FromArgs)]
/// print the size in bytes of a file or directory tree.
pub struct Siz {
    #[argh(positional)]
    /// file or directory to measure.
    path: String,
}

impl BuiltinGlyph for Siz {
    fn name() -> &'static str {
        "siz"
    }

    fn aliases() -> &'static [&'static str] {
        &["size"]
    }

    fn summary() -> &'static str {
        "siz <path>: size in bytes of a file or directory"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        let path = session.resolve_path(&self.path);
        let size = total_size(&path).with_context(|| format!("not found: {}", path.display()))?;
        writeln!(session.output(), "{size}")?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// print yes when a path exists and no otherwise.
pub struct Exists {
    #[argh(positional)]
    /// path to test.
    path: String,
}

impl BuiltinGlyph for Exists {
    fn name() -> &'static str {
        "exists"
    }

    fn summary() -> &'static str {
        "exists <path>: yes/no, status 0/1"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        let found = session.resolve_path(&self.path).exists();
        writeln!(session.output(), "{}", if found { "yes" } else { "no" })?;
        Ok(if found { 0 } else { 1 })
    }
}

#[derive(FromArgs)]
/// pause for a number of seconds.
pub struct Wait {
    #[argh(positional)]
    /// seconds to wait; fractions are allowed.
    seconds: f64,
}

impl BuiltinGlyph for Wait {
    fn name() -> &'static str {
        "wait"
    }

    fn aliases() -> &'static [&'static str] {
        &["sleep"]
    }

    fn summary() -> &'static str {
        "wait <seconds>: pause execution"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        if !self.seconds.is_finite() || self.seconds < 0.0 {
            bail!("invalid duration: {}", self.seconds);
        }
        let deadline = Duration::try_from_secs_f64(self.seconds)
            .ok()
            .and_then(|wait| Instant::now().checked_add(wait))
            .ok_or_else(|| anyhow!("duration too long: {}", self.seconds))?;
        session.output().flush()?;
        while !session.is_interrupted() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(50)));
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// print a script argument (1-based) or the argument count.
pub struct Arg {
    #[argh(positional)]
    /// argument index, or `count`.
    which: String,
}

impl BuiltinGlyph for Arg {
    fn name() -> &'static str {
        "arg"
    }

    fn summary() -> &'static str {
        "arg <n> | arg count: script arguments"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        if self.which.eq_ignore_ascii_case("count") {
            let count = session.args().len();
            writeln!(session.output(), "{count}")?;
            return Ok(0);
        }
        let index: usize = self
            .which
            .parse()
            .map_err(|_| anyhow!("invalid argument index `{}`", self.which))?;
        let value = index
            .checked_sub(1)
            .and_then(|i| session.args().get(i))
            .cloned();
        match value {
            Some(value) => {
                writeln!(session.output(), "{value}")?;
                Ok(0)
            }
            None => {
                writeln!(session.output())?;
                Ok(1)
            }
        }
    }
}

#[derive(FromArgs)]
/// list visible variables with their flags.
pub struct Var {}

impl BuiltinGlyph for Var {
    fn name() -> &'static str {
        "var"
    }

    fn summary() -> &'static str {
        "var: list variables"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        let vars = session.env().visible();
        let out = session.output();
        if vars.is_empty() {
            writeln!(out, "no variables defined")?;
            return Ok(1);
        }
        for (name, var) in vars {
            let readonly = if var.readonly { " (readonly)" } else { "" };
            let exported = if var.exported { " (exported)" } else { "" };
            writeln!(out, "{name} = {}{readonly}{exported}", var.value)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// remove variables (and their export).
pub struct Unset {
    #[argh(positional, greedy)]
    /// variables to remove.
    names: Vec<String>,
}

impl BuiltinGlyph for Unset {
    fn name() -> &'static str {
        "unset"
    }

    fn summary() -> &'static str {
        "unset <name...>: remove variables"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        if self.names.is_empty() {
            return Err(SigilError::Usage("unset <name...>").into());
        }
        for name in &self.names {
            session.env_mut().unset(name)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// pass variables to shell commands and plugin executables.
pub struct Export {
    #[argh(positional, greedy)]
    /// variables to export.
    names: Vec<String>,
}

impl BuiltinGlyph for Export {
    fn name() -> &'static str {
        "export"
    }

    fn summary() -> &'static str {
        "export <name...>: export variables to child processes"
    }

    fn run(self, session: &mut Session) -> Result<ExitCode> {
        if self.names.is_empty() {
            return Err(SigilError::Usage("export <name...>").into());
        }
        for name in &self.names {
            session.env_mut().export(name)?;
        }
        Ok(0)
    }
}

/// `ps`, `cmd`/`cp` and `sh`: hand the raw argument text to a host shell.
///
/// Arguments are passed through untouched, so these glyphs do not go through argh.
struct ShellGlyph {
    name: &'static str,
    kind: ShellKind,
}

impl Glyph for ShellGlyph {
    fn name(&self) -> &str {
        self.name
    }

    fn summary(&self) -> &str {
        match self.kind {
            ShellKind::PowerShell => "ps [command]: run PowerShell",
            ShellKind::Cmd => "cmd [command]: run the Windows command interpreter",
            ShellKind::Posix => "sh [command]: run the POSIX shell",
        }
    }

    fn invoke(&self, args: &[String], session: &mut Session) -> Result<ExitCode> {
        let command = (!args.is_empty()).then(|| args.join(" "));
        let outcome = session.run_shell(self.kind, command)?;
        session.output().write_all(outcome.output.as_bytes())?;
        Ok(outcome.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::external::{ShellBridge, ShellOutcome, ShellRequest};
    use crate::io_adapters::MemWriter;
    use crate::value::Value;
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        session: Session,
        registry: GlyphRegistry,
        out: MemWriter,
        err: MemWriter,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let out = MemWriter::new();
            let err = MemWriter::new();
            let session = Session::new(Config::with_home(dir.path().join("home")))
                .unwrap()
                .with_cwd(dir.path())
                .with_output(out.clone())
                .with_errors(err.clone());
            let mut registry = GlyphRegistry::new();
            register_builtins(&mut registry).unwrap();
            Self {
                dir,
                session,
                registry,
                out,
                err,
            }
        }

        fn call(&mut self, name: &str, args: &[&str]) -> Result<ExitCode> {
            let glyph = self.registry.get(name).expect("glyph is registered");
            let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
            glyph.invoke(&args, &mut self.session)
        }

        fn path(&self, name: &str) -> std::path::PathBuf {
            self.dir.path().join(name)
        }
    }

    #[test]
    fn test_mk_file_and_undo_redo() {
        let mut h = Harness::new();
        assert_eq!(h.call("mk", &["file", "a.txt", "hello", "world"]).unwrap(), 0);
        assert_eq!(fs::read_to_string(h.path("a.txt")).unwrap(), "hello world");

        assert_eq!(h.call("undo", &[]).unwrap(), 0);
        assert!(!h.path("a.txt").exists());
        assert_eq!(h.call("redo", &[]).unwrap(), 0);
        assert!(h.path("a.txt").exists());
        assert!(h.out.contents().contains("undone: create file"));
    }

    #[test]
    fn test_undo_on_empty_journal() {
        let mut h = Harness::new();
        assert_eq!(h.call("undo", &[]).unwrap(), 1);
        assert_eq!(h.out.take(), "Nothing to undo\n");
        assert_eq!(h.call("redo", &[]).unwrap(), 1);
        assert_eq!(h.out.take(), "Nothing to redo\n");
    }

    #[test]
    fn test_copy_move_delete_round() {
        let mut h = Harness::new();
        fs::write(h.path("src.txt"), "data").unwrap();
        h.call("cpy", &["src.txt", "copy.txt"]).unwrap();
        h.call("move", &["file", "copy.txt", "moved.txt"]).unwrap();
        h.call("rename", &["moved.txt", "final.txt"]).unwrap();
        h.call("dlt", &["src.txt"]).unwrap();
        assert!(!h.path("src.txt").exists());
        assert_eq!(fs::read_to_string(h.path("final.txt")).unwrap(), "data");

        for _ in 0..4 {
            h.call("undo", &[]).unwrap();
        }
        assert!(h.path("src.txt").exists());
        assert!(!h.path("copy.txt").exists());
        assert!(!h.path("final.txt").exists());
    }

    #[test]
    fn test_failed_operation_is_an_error_and_records_nothing() {
        let mut h = Harness::new();
        assert!(h.call("dlt", &["missing.txt"]).is_err());
        assert_eq!(h.session.journal().undo_len(), 0);
    }

    #[test]
    fn test_bad_arguments_print_usage() {
        let mut h = Harness::new();
        assert_eq!(h.call("cpy", &["only-one"]).unwrap(), 1);
        assert!(h.err.contents().contains("Required positional arguments not provided"));
        assert_eq!(h.call("dlt", &["--help"]).unwrap(), 0);
        assert!(h.out.contents().contains("Usage: dlt"));
    }

    #[test]
    fn test_fmt_is_undoable() {
        let mut h = Harness::new();
        fs::write(h.path("s.sig"), "say hi   \n\n\n").unwrap();
        h.call("fmt", &["s.sig"]).unwrap();
        assert_eq!(fs::read_to_string(h.path("s.sig")).unwrap(), "say hi\n");
        h.call("undo", &[]).unwrap();
        assert_eq!(fs::read_to_string(h.path("s.sig")).unwrap(), "say hi   \n\n\n");
    }

    #[test]
    fn test_cd_and_pwd() {
        let mut h = Harness::new();
        fs::create_dir(h.path("sub")).unwrap();
        h.call("cd", &["sub"]).unwrap();
        h.call("pwd", &[]).unwrap();
        let printed = h.out.take();
        assert_eq!(
            fs::canonicalize(printed.trim()).unwrap(),
            fs::canonicalize(h.path("sub")).unwrap()
        );
        assert!(h.call("cd", &["nowhere"]).is_err());
    }

    #[test]
    fn test_dirlook_siz_exists() {
        let mut h = Harness::new();
        fs::create_dir(h.path("d")).unwrap();
        fs::write(h.path("d/one"), "12345").unwrap();
        fs::write(h.path("b.txt"), "xy").unwrap();

        h.call("dirlook", &[]).unwrap();
        assert_eq!(h.out.take(), "d/\nb.txt\n");
        h.call("size", &["d"]).unwrap();
        assert_eq!(h.out.take(), "5\n");
        assert_eq!(h.call("exists", &["b.txt"]).unwrap(), 0);
        assert_eq!(h.call("exists", &["c.txt"]).unwrap(), 1);
        assert_eq!(h.out.take(), "yes\nno\n");
    }

    #[test]
    fn test_arg_and_variables() {
        let mut h = Harness::new();
        h.session.replace_args(vec!["first".into(), "second".into()]);
        h.call("arg", &["count"]).unwrap();
        h.call("arg", &["2"]).unwrap();
        assert_eq!(h.call("arg", &["3"]).unwrap(), 1);
        assert_eq!(h.out.take(), "2\nsecond\n\n");

        assert_eq!(h.call("var", &[]).unwrap(), 1);
        h.out.take();
        h.session.env_mut().assign("x", Value::Number(1.0)).unwrap();
        h.call("export", &["x"]).unwrap();
        h.call("var", &[]).unwrap();
        assert_eq!(h.out.take(), "x = 1 (exported)\n");
        h.call("unset", &["x"]).unwrap();
        assert!(h.session.env().get("x").is_none());
        assert!(h.call("unset", &["x"]).is_err());
    }

    #[test]
    fn test_wait_accepts_fractions() {
        let mut h = Harness::new();
        assert_eq!(h.call("sleep", &["0.01"]).unwrap(), 0);
        assert_eq!(h.call("wait", &["soon"]).unwrap(), 1);
    }

    #[test]
    fn test_wait_rejects_durations_out_of_range() {
        let mut h = Harness::new();
        let err = h.call("wait", &["1e20"]).unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[derive(Clone, Default)]
    struct RecordingShell {
        calls: Rc<RefCell<Vec<(ShellKind, Option<String>)>>>,
    }

    impl ShellBridge for RecordingShell {
        fn execute(&mut self, kind: ShellKind, request: &ShellRequest) -> Result<ShellOutcome> {
            self.calls.borrow_mut().push((kind, request.command.clone()));
            Ok(ShellOutcome {
                status: 7,
                output: "shell says hi\n".to_string(),
            })
        }
    }

    #[test]
    fn test_shell_glyphs_use_bridge() {
        let mut h = Harness::new();
        let shell = RecordingShell::default();
        let calls = shell.calls.clone();
        h.session = Session::new(Config::with_home(h.dir.path().join("home")))
            .unwrap()
            .with_cwd(h.dir.path())
            .with_output(h.out.clone())
            .with_shell(shell);

        assert_eq!(h.call("ps", &["Get-Date", "-Format", "o"]).unwrap(), 7);
        assert_eq!(h.call("cp", &["dir"]).unwrap(), 7);
        assert_eq!(h.call("sh", &[]).unwrap(), 7);
        assert_eq!(
            *calls.borrow(),
            vec![
                (ShellKind::PowerShell, Some("Get-Date -Format o".to_string())),
                (ShellKind::Cmd, Some("dir".to_string())),
                (ShellKind::Posix, None),
            ]
        );
        assert!(h.out.contents().contains("shell says hi"));
    }

    #[test]
    fn test_format_source() {
        assert_eq!(format_source("a  \r\nb\t\n\n"), "a\nb\n");
        assert_eq!(format_source(""), "\n");
    }
}
