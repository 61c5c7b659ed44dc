use crate::arith;
use crate::builtin::register_builtins;
use crate::command::{ExitCode, Glyph};
use crate::config::Config;
use crate::env::{SCRIPT_VARS, Variable};
use crate::error::{FATAL_STATUS, Result, SigilError};
use crate::help;
use crate::lexer::Word;
use crate::parser::{
    self, Branch, CommandCall, Condition, Expr, RepeatCount, Statement, StatementKind,
    SyntaxErrorKind,
};
use crate::plugin;
use crate::registry::{GlyphRegistry, Origin};
use crate::session::Session;
use crate::value::{self, Value};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{debug, trace, warn};

/// Maximum nesting of `include`, `run` and alias expansion.
pub const MAX_DEPTH: usize = 64;

/// Status of a context stopped by an interrupt.
pub const INTERRUPTED_STATUS: ExitCode = 130;

const DEFAULT_PROMPT: &str = "sigil> ";
const CONTINUATION_PROMPT: &str = "...> ";

/// How a statement left its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit(ExitCode),
}

/// Tree-walking executor for Sigil scripts.
///
/// Owns the [`Session`] and the [`GlyphRegistry`]. Commands are resolved through the
/// alias table first, then the session commands handled here, then registered glyphs.
///
/// Example
/// ```
/// use sigil_engine::{Config, Interpreter, MemWriter, Session};
/// let out = MemWriter::new();
/// let home = std::env::temp_dir().join("sigil-doc-home");
/// let session = Session::new(Config::with_home(home)).unwrap().with_output(out.clone());
/// let mut sigil = Interpreter::new(session).unwrap();
/// sigil.eval("let x = add 2 3\nsay x").unwrap();
/// assert_eq!(out.contents(), "5\n");
/// ```
pub struct Interpreter {
    session: Session,
    registry: GlyphRegistry,
    depth: usize,
    alias_stack: Vec<String>,
}

impl Interpreter {
    /// Create an interpreter with the built-in glyphs and every installed plugin.
    pub fn new(session: Session) -> Result<Self> {
        let mut registry = GlyphRegistry::new();
        register_builtins(&mut registry)?;
        if let Err(err) = plugin::load_all(&mut registry, &session.config().plugins_dir()) {
            warn!("failed to load plugins: {err}");
        }
        Ok(Self {
            session,
            registry,
            depth: 0,
            alias_stack: Vec::new(),
        })
    }

    /// Create an interpreter on the process stdio.
    pub fn from_config(config: Config) -> Result<Self> {
        Self::new(Session::new(config)?)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn registry(&self) -> &GlyphRegistry {
        &self.registry
    }

    /// Register an in-process glyph on behalf of `owner`.
    pub fn register_glyph(&mut self, owner: &str, glyph: Rc<dyn Glyph>) -> Result<()> {
        let name = glyph.name().to_string();
        self.registry
            .register(&name, glyph, Origin::Plugin(owner.to_string()))
    }

    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.session.interrupt_flag()
    }

    /// Parse and run `source` in the current context.
    ///
    /// Returns `Some(code)` when the code called `exit` (or was interrupted), `None`
    /// when it ran to the end. Fatal errors are returned without being reported.
    pub fn eval(&mut self, source: &str) -> Result<Option<ExitCode>> {
        let statements = parser::parse_script(source)?;
        match self.execute_block(&statements)? {
            Flow::Continue => Ok(None),
            Flow::Exit(code) => Ok(Some(code)),
        }
    }

    /// Run top-level code (`sigil -c`) and return the process exit status.
    pub fn run_code(&mut self, source: &str) -> ExitCode {
        let result = self.eval(source);
        self.finish_top_level(result)
    }

    /// Run a script file as the top-level context and return the process exit status.
    pub fn run_script(&mut self, path: &Path, args: Vec<String>) -> ExitCode {
        let path = self.session.resolve_path(path);
        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(err) => {
                let _ = writeln!(self.session.errors(), "{}: {err}", path.display());
                return FATAL_STATUS;
            }
        };
        define_script_vars(&mut self.session, &path);
        self.session.replace_args(args);
        let result = self.eval(&source);
        self.finish_top_level(result)
    }

    fn finish_top_level(&mut self, result: Result<Option<ExitCode>>) -> ExitCode {
        let _ = self.session.output().flush();
        match result {
            Ok(None) => 0,
            Ok(Some(code)) => process_status(code),
            Err(err) => {
                self.report(None, &err);
                FATAL_STATUS
            }
        }
    }

    /// Interactive loop. Returns the status of a top-level `exit`, or 0 at end of input.
    pub fn repl(&mut self) -> rustyline::Result<ExitCode> {
        let mut rl = DefaultEditor::new()?;
        let history = self.session.config().history_file();
        if rl.load_history(&history).is_err() {
            debug!(path = %history.display(), "no history loaded");
        }

        let mut pending = String::new();
        let mut status = 0;
        loop {
            let prompt = if pending.is_empty() {
                self.session
                    .profile()
                    .setting("prompt")
                    .unwrap_or(DEFAULT_PROMPT)
                    .to_string()
            } else {
                CONTINUATION_PROMPT.to_string()
            };

            match rl.readline(&prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    pending.push_str(&line);
                    pending.push('\n');
                    let statements = match parser::parse_script(&pending) {
                        Err(err) if err.kind == SyntaxErrorKind::UnclosedBlock => continue,
                        Err(err) => {
                            pending.clear();
                            self.report(None, &SigilError::from(err));
                            self.session.set_last(FATAL_STATUS);
                            continue;
                        }
                        Ok(statements) => statements,
                    };
                    pending.clear();

                    let result = self.execute_block(&statements);
                    let interrupted = self.session.is_interrupted();
                    self.session.clear_interrupt();
                    let _ = self.session.output().flush();
                    match result {
                        Ok(Flow::Exit(_)) if interrupted => {
                            let _ = writeln!(self.session.errors(), "interrupted");
                        }
                        Ok(Flow::Exit(code)) => {
                            status = process_status(code);
                            break;
                        }
                        Ok(Flow::Continue) => {}
                        Err(err) => {
                            self.report(None, &err);
                            self.session.set_last(FATAL_STATUS);
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    pending.clear();
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    let _ = writeln!(self.session.errors(), "Error: {err:?}");
                    break;
                }
            }
        }

        if let Some(dir) = history.parent() {
            let _ = fs::create_dir_all(dir);
        }
        if let Err(err) = rl.save_history(&history) {
            warn!(path = %history.display(), "failed to save history: {err}");
        }
        Ok(status)
    }

    fn report(&mut self, line: Option<usize>, err: &SigilError) {
        let errors = self.session.errors();
        let _ = match (line, err) {
            (_, SigilError::Syntax(_)) | (None, _) => writeln!(errors, "error: {err}"),
            (Some(line), _) => writeln!(errors, "line {line}: {err}"),
        };
    }

    fn execute_block(&mut self, statements: &[Statement]) -> Result<Flow> {
        for statement in statements {
            if let Flow::Exit(code) = self.execute(statement)? {
                return Ok(Flow::Exit(code));
            }
        }
        Ok(Flow::Continue)
    }

    /// Run one statement. Recoverable failures are reported here and only set `last`.
    fn execute(&mut self, statement: &Statement) -> Result<Flow> {
        if self.session.is_interrupted() {
            self.session.set_last(INTERRUPTED_STATUS);
            return Ok(Flow::Exit(INTERRUPTED_STATUS));
        }
        trace!(line = statement.line, "execute {:?}", statement.kind);
        match self.execute_kind(statement) {
            Ok(flow) => Ok(flow),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                self.report(Some(statement.line), &err);
                self.session.set_last(err.status());
                Ok(Flow::Continue)
            }
        }
    }

    fn execute_kind(&mut self, statement: &Statement) -> Result<Flow> {
        match &statement.kind {
            StatementKind::Let {
                name,
                readonly,
                value,
            } => {
                self.execute_let(name, *readonly, value)?;
            }
            StatementKind::Say(words) => {
                let env = self.session.env();
                let text = words
                    .iter()
                    .map(|w| env.resolve_text(w))
                    .collect::<Vec<_>>()
                    .join(" ");
                writeln!(self.session.output(), "{text}")?;
                self.session.set_last(0);
            }
            StatementKind::Ask { name, prompt } => {
                let value = self.ask(name, prompt)?;
                self.session.env_mut().assign(name, value)?;
            }
            StatementKind::If {
                condition,
                then,
                otherwise,
            } => {
                if self.condition(condition) {
                    return self.branch(then);
                } else if let Some(otherwise) = otherwise {
                    return self.branch(otherwise);
                }
            }
            StatementKind::RepeatInline { count, body } => {
                return self.repeat(count, |this| this.execute(body));
            }
            StatementKind::RepeatBlock { count, body } => {
                return self.repeat(count, |this| this.execute_block(body));
            }
            StatementKind::Command(call) => return self.dispatch(call),
            StatementKind::Arith { op, operands } => {
                let result = arith::evaluate(*op, operands, self.session.env())?;
                writeln!(self.session.output(), "{result}")?;
                self.session.set_last(0);
            }
            StatementKind::Try { body, otherwise } => {
                self.session.set_last(0);
                if let Flow::Exit(code) = self.execute(body)? {
                    return Ok(Flow::Exit(code));
                }
                match otherwise {
                    Some(otherwise) if self.session.last() != 0 => return self.execute(otherwise),
                    _ => {}
                }
            }
            StatementKind::Exit(code) => {
                let code = match code {
                    Some(word) => self.integer(word).unwrap_or_else(|err| {
                        self.report(Some(statement.line), &err);
                        1
                    }),
                    None => 0,
                };
                self.session.set_last(code);
                return Ok(Flow::Exit(code));
            }
            StatementKind::Include(path) => return self.include(path),
            StatementKind::Run { path, args } => self.run(path, args)?,
            StatementKind::Alias { name, template } => {
                self.alias(name.as_deref(), template.as_deref())?
            }
            StatementKind::Unalias(name) => {
                let name = self.session.env().interpolate(name);
                if self.session.aliases_mut().shift_remove(&name).is_some() {
                    self.session.set_last(0);
                } else {
                    writeln!(self.session.errors(), "no alias named `{name}`")?;
                    self.session.set_last(1);
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// Evaluate and assign. `last` is 0 afterwards unless `ask` hit end of input.
    fn execute_let(&mut self, name: &str, readonly: bool, expr: &Expr) -> Result<()> {
        let value = match expr {
            Expr::Empty => Value::Empty,
            Expr::Words(words) => self.words_value(words),
            Expr::Ask(prompt) => self.ask(name, prompt)?,
            Expr::Arith { op, operands } => arith::evaluate(*op, operands, self.session.env())?,
        };
        let env = self.session.env_mut();
        if readonly {
            env.assign_readonly(name, value)?;
        } else {
            env.assign(name, value)?;
        }
        if !matches!(expr, Expr::Ask(_)) {
            self.session.set_last(0);
        }
        Ok(())
    }

    /// A lone word keeps its resolved value; several words are joined and inferred.
    fn words_value(&self, words: &[Word]) -> Value {
        let env = self.session.env();
        match words {
            [word] => env.resolve(word),
            _ => {
                let text = words
                    .iter()
                    .map(|w| env.resolve_text(w))
                    .collect::<Vec<_>>()
                    .join(" ");
                Value::infer(&text)
            }
        }
    }

    /// Read a line for `name`. Sets `last` to 1 at end of input.
    fn ask(&mut self, name: &str, prompt: &[Word]) -> Result<Value> {
        if self
            .session
            .env()
            .variable(name)
            .is_some_and(|v| v.readonly)
        {
            return Err(SigilError::ReadonlyViolation(name.to_string()));
        }
        let env = self.session.env();
        let mut prompt = prompt
            .iter()
            .map(|w| env.interpolate(w))
            .collect::<Vec<_>>()
            .join(" ");
        if !prompt.is_empty() && !prompt.ends_with(char::is_whitespace) {
            prompt.push(' ');
        }
        match self.session.read_line(&prompt)? {
            Some(line) => {
                self.session.set_last(0);
                Ok(Value::infer(&line))
            }
            None => {
                self.session.set_last(1);
                Ok(Value::Empty)
            }
        }
    }

    fn condition(&self, condition: &Condition) -> bool {
        let env = self.session.env();
        match condition {
            Condition::Exists(word) => self.session.resolve_path(env.interpolate(word)).exists(),
            Condition::Compare { lhs, op, rhs } => {
                let lhs = env.resolve(lhs);
                let rhs = self.words_value(rhs);
                value::compare(&lhs, *op, &rhs)
            }
            Condition::Truthy(word) => env.resolve(word).is_truthy(),
        }
    }

    fn branch(&mut self, branch: &Branch) -> Result<Flow> {
        match branch {
            Branch::Inline(statement) => self.execute(statement),
            Branch::Block(statements) => self.execute_block(statements),
        }
    }

    fn integer(&self, word: &Word) -> Result<ExitCode> {
        let value = self.session.env().resolve(word);
        match value.as_number() {
            Some(n) if n.fract() == 0.0 && n.abs() <= ExitCode::MAX as f64 => Ok(n as ExitCode),
            _ => Err(SigilError::NotNumeric(value.to_string())),
        }
    }

    fn repeat(
        &mut self,
        count: &RepeatCount,
        mut body: impl FnMut(&mut Self) -> Result<Flow>,
    ) -> Result<Flow> {
        let times = match count {
            RepeatCount::Forever => None,
            RepeatCount::Times(word) => {
                let value = self.session.env().resolve(word);
                match value.as_number() {
                    Some(n) if n >= 0.0 && n.fract() == 0.0 => Some(n as u64),
                    _ if is_forever(&value) => None,
                    _ => return Err(SigilError::Usage("rpt <count|inf>: count must be a whole number")),
                }
            }
        };

        let mut done = 0u64;
        while times.is_none_or(|n| done < n) {
            if self.session.is_interrupted() {
                self.session.set_last(INTERRUPTED_STATUS);
                return Ok(Flow::Exit(INTERRUPTED_STATUS));
            }
            if let Flow::Exit(code) = body(self)? {
                return Ok(Flow::Exit(code));
            }
            done += 1;
        }
        Ok(Flow::Continue)
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= MAX_DEPTH {
            return Err(SigilError::DepthExceeded(MAX_DEPTH));
        }
        self.depth += 1;
        Ok(())
    }

    fn read_script(&self, word: &Word) -> Result<(PathBuf, String)> {
        let path = self.session.resolve_path(self.session.env().interpolate(word));
        let source = fs::read_to_string(&path)
            .map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", path.display())))?;
        Ok((path, source))
    }

    /// Run another script inside the current frame; its `exit` ends the includer too.
    fn include(&mut self, word: &Word) -> Result<Flow> {
        let (path, source) = self.read_script(word)?;
        debug!(path = %path.display(), "include");
        let statements = parser::parse_script(&source)?;
        self.enter()?;
        let result = self.execute_block(&statements);
        self.depth -= 1;
        result
    }

    /// Run a script in a child frame and store its final status in `last`.
    fn run(&mut self, word: &Word, args: &[Word]) -> Result<()> {
        let (path, source) = self.read_script(word)?;
        debug!(path = %path.display(), "run");
        let statements = match parser::parse_script(&source) {
            Ok(statements) => statements,
            Err(err) => {
                writeln!(self.session.errors(), "{}: {err}", path.display())?;
                self.session.set_last(FATAL_STATUS);
                return Ok(());
            }
        };
        let args: Vec<String> = args
            .iter()
            .map(|w| self.session.env().interpolate(w))
            .collect();

        self.enter()?;
        self.session.env_mut().push_frame();
        define_script_vars(&mut self.session, &path);
        let caller_args = self.session.replace_args(args);
        let result = self.execute_block(&statements);
        self.session.replace_args(caller_args);
        let child_last = self.session.env_mut().pop_frame();
        self.depth -= 1;

        let status = match result {
            Ok(Flow::Continue) => child_last,
            Ok(Flow::Exit(code)) => code,
            Err(err @ SigilError::DepthExceeded(_)) => return Err(err),
            Err(err) => {
                writeln!(self.session.errors(), "{}: {err}", path.display())?;
                FATAL_STATUS
            }
        };
        self.session.set_last(status);
        Ok(())
    }

    fn alias(&mut self, name: Option<&str>, template: Option<&str>) -> Result<()> {
        match (name, template) {
            (None, _) => {
                let aliases = self.session.aliases().clone();
                let out = self.session.output();
                if aliases.is_empty() {
                    writeln!(out, "no aliases defined")?;
                }
                for (name, template) in &aliases {
                    writeln!(out, "{name} = {template}")?;
                }
            }
            (Some(name), None) => match self.session.aliases().get(name).cloned() {
                Some(template) => writeln!(self.session.output(), "{name} = {template}")?,
                None => {
                    writeln!(self.session.errors(), "no alias named `{name}`")?;
                    self.session.set_last(1);
                    return Ok(());
                }
            },
            (Some(name), Some(template)) => {
                if crate::registry::KEYWORDS.contains(&name) {
                    return Err(SigilError::Usage("alia <name> <command...>: name cannot be a keyword"));
                }
                self.session
                    .aliases_mut()
                    .insert(name.to_string(), template.to_string());
            }
        }
        self.session.set_last(0);
        Ok(())
    }

    fn dispatch(&mut self, call: &CommandCall) -> Result<Flow> {
        let name = self.session.env().interpolate(&call.name);
        if let Some(template) = self.session.aliases().get(&name).cloned() {
            return self.expand_alias(name, &template, &call.raw_args);
        }

        let env = self.session.env();
        let args: Vec<String> = call.args.iter().map(|w| env.interpolate(w)).collect();
        if self.session_command(&name, &args)? {
            return Ok(Flow::Continue);
        }

        let Some(glyph) = self.registry.get(&name) else {
            return Err(SigilError::UnknownCommand(name));
        };
        debug!(glyph = %name, ?args, "invoke");
        match glyph.invoke(&args, &mut self.session) {
            Ok(code) => self.session.set_last(code),
            Err(err) => {
                writeln!(self.session.errors(), "{name}: {err:#}")?;
                self.session.set_last(1);
            }
        }
        Ok(Flow::Continue)
    }

    /// Substitute the alias text, append the call's raw arguments and run the result.
    fn expand_alias(&mut self, name: String, template: &str, raw_args: &str) -> Result<Flow> {
        if self.alias_stack.contains(&name) {
            let mut cycle = self.alias_stack.clone();
            cycle.push(name);
            return Err(SigilError::AliasCycle(cycle));
        }
        let source = if raw_args.is_empty() {
            template.to_string()
        } else {
            format!("{template} {raw_args}")
        };
        trace!(alias = %name, %source, "expand alias");
        let statements = parser::parse_script(&source)?;

        self.enter()?;
        self.alias_stack.push(name);
        let result = self.execute_block(&statements);
        self.alias_stack.pop();
        self.depth -= 1;
        result
    }

    /// Handle commands that need the interpreter itself. Returns false for other names.
    fn session_command(&mut self, name: &str, args: &[String]) -> Result<bool> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let status = match (name, args.as_slice()) {
            ("help", []) => self.help_overview()?,
            ("help", [topic]) => self.help_topic(topic)?,
            ("schk", [file]) => self.syntax_check(file)?,
            ("pse", message) => {
                let message = message.join(" ");
                let message = message.trim_matches('"');
                let prompt = if message.is_empty() {
                    "(press Enter to continue) ".to_string()
                } else {
                    format!("{message} (press Enter to continue) ")
                };
                self.session.read_line(&prompt)?;
                0
            }
            ("prof", args) => self.profile_command(args)?,
            ("svrc", []) => {
                self.session.profiles().save(self.session.profile())?;
                let name = self.session.profile().name.clone();
                writeln!(self.session.output(), "saved profile {name}")?;
                0
            }
            ("rrc", []) => {
                if self.session.env().depth() > 1 {
                    return Err(SigilError::Profile(
                        "profiles cannot be reloaded inside `run`".to_string(),
                    ));
                }
                let name = self.session.profile().name.clone();
                let profile = self.session.profiles().load(&name)?;
                self.session.set_profile(profile);
                writeln!(self.session.output(), "reloaded profile {name}")?;
                0
            }
            ("pin", []) => self.list_plugins()?,
            ("pin", [dir]) => {
                let source = self.session.resolve_path(dir);
                let plugins_dir = self.session.config().plugins_dir();
                let installed = plugin::install(&mut self.registry, &plugins_dir, &source)?;
                let commands: Vec<_> = installed.manifest.commands.keys().cloned().collect();
                writeln!(
                    self.session.output(),
                    "installed {} {} ({})",
                    installed.manifest.name,
                    installed.manifest.version,
                    commands.join(", ")
                )?;
                0
            }
            ("prv", [plugin_name]) => {
                let plugins_dir = self.session.config().plugins_dir();
                let removed = plugin::remove(&mut self.registry, &plugins_dir, plugin_name)?;
                writeln!(
                    self.session.output(),
                    "removed {plugin_name} ({})",
                    removed.join(", ")
                )?;
                0
            }
            (name, _) if crate::registry::SESSION_COMMANDS.contains(&name) => {
                return Err(SigilError::Usage(help::topic(name).unwrap_or("see help")));
            }
            _ => return Ok(false),
        };
        self.session.set_last(status);
        Ok(true)
    }

    fn help_overview(&mut self) -> Result<ExitCode> {
        let mut text = String::from("Statements:\n");
        for (_, line) in help::STATEMENTS {
            text.push_str(&format!("  {line}\n"));
        }
        text.push_str("Session:\n");
        for (_, line) in help::SESSION_COMMANDS {
            text.push_str(&format!("  {line}\n"));
        }
        text.push_str("Glyphs:\n");
        for (name, registration) in self.registry.iter() {
            let summary = registration.glyph.summary();
            match &registration.origin {
                Origin::Builtin if summary.starts_with(name) => {
                    text.push_str(&format!("  {summary}\n"))
                }
                Origin::Builtin => text.push_str(&format!("  {name}: {summary}\n")),
                Origin::Plugin(plugin) => {
                    text.push_str(&format!("  {name}: {summary} [{plugin}]\n"))
                }
            }
        }
        self.session.output().write_all(text.as_bytes())?;
        Ok(0)
    }

    fn help_topic(&mut self, topic: &str) -> Result<ExitCode> {
        let text = if let Some(line) = help::topic(topic) {
            line.to_string()
        } else if let Some(glyph) = self.registry.get(topic) {
            format!("{topic}: {}", glyph.summary())
        } else if let Some(template) = self.session.aliases().get(topic) {
            format!("{topic}: alias for `{template}`")
        } else {
            writeln!(self.session.errors(), "no help for `{topic}`")?;
            return Ok(1);
        };
        writeln!(self.session.output(), "{text}")?;
        Ok(0)
    }

    /// Parse a script without running it and flag commands nothing would handle.
    fn syntax_check(&mut self, file: &str) -> Result<ExitCode> {
        let path = self.session.resolve_path(file);
        let source = fs::read_to_string(&path)?;
        let statements = match parser::parse_script(&source) {
            Ok(statements) => statements,
            Err(err) => {
                writeln!(self.session.output(), "{}: {err}", path.display())?;
                return Ok(1);
            }
        };
        let mut unknown = Vec::new();
        collect_commands(&statements, &mut |line: usize, name: &str| {
            let known = self.registry.contains(name)
                || self.session.aliases().contains_key(name)
                || crate::registry::SESSION_COMMANDS.contains(&name);
            if !known {
                unknown.push((line, name.to_string()));
            }
        });
        let out = self.session.output();
        if unknown.is_empty() {
            writeln!(out, "{}: ok", path.display())?;
            return Ok(0);
        }
        for (line, name) in &unknown {
            writeln!(out, "{}: line {line}: unknown glyph `{name}`", path.display())?;
        }
        Ok(1)
    }

    fn profile_command(&mut self, args: &[&str]) -> Result<ExitCode> {
        match args {
            [] => {
                let active = self.session.profile().name.clone();
                let mut names = self.session.profiles().list()?;
                if !names.contains(&active) {
                    names.push(active.clone());
                    names.sort();
                }
                let out = self.session.output();
                for name in names {
                    let marker = if name == active { "*" } else { " " };
                    writeln!(out, "{marker} {name}")?;
                }
            }
            ["show"] => {
                let profile = self.session.profile().clone();
                let out = self.session.output();
                writeln!(out, "profile {}", profile.name)?;
                writeln!(out, "variables: {}", profile.env.root_variables().len())?;
                for (name, template) in &profile.aliases {
                    writeln!(out, "alias {name} = {template}")?;
                }
                for (key, value) in &profile.settings {
                    writeln!(out, "setting {key} = {value}")?;
                }
            }
            ["new", name] => {
                self.session.profiles().create(name)?;
                writeln!(self.session.output(), "created profile {name}")?;
            }
            ["del", name] => {
                if *name == self.session.profile().name {
                    return Err(SigilError::Profile(
                        "the active profile cannot be deleted".to_string(),
                    ));
                }
                self.session.profiles().delete(name)?;
                writeln!(self.session.output(), "deleted profile {name}")?;
            }
            ["set", key, value @ ..] => {
                let value = value.join(" ");
                self.session.settings_mut().insert(key.to_string(), value);
            }
            [name] => {
                if self.session.env().depth() > 1 {
                    return Err(SigilError::Profile(
                        "profiles cannot be switched inside `run`".to_string(),
                    ));
                }
                let profile = self.session.profiles().load(name)?;
                self.session.set_profile(profile);
                writeln!(self.session.output(), "switched to profile {name}")?;
            }
            _ => return Err(SigilError::Usage(help::topic("prof").unwrap_or("prof"))),
        }
        Ok(0)
    }

    fn list_plugins(&mut self) -> Result<ExitCode> {
        let plugins = plugin::discover(&self.session.config().plugins_dir())?;
        let out = self.session.output();
        if plugins.is_empty() {
            writeln!(out, "no plugins installed")?;
        }
        for installed in plugins {
            let manifest = installed.manifest;
            let commands: Vec<_> = manifest.commands.keys().cloned().collect();
            match &manifest.description {
                Some(description) => writeln!(
                    out,
                    "{} {} - {description} ({})",
                    manifest.name,
                    manifest.version,
                    commands.join(", ")
                )?,
                None => writeln!(
                    out,
                    "{} {} ({})",
                    manifest.name,
                    manifest.version,
                    commands.join(", ")
                )?,
            }
        }
        Ok(0)
    }
}

/// Process status for a top-level `exit` code. Non-zero codes stay non-zero and 255 is
/// left to parse and host failures.
fn process_status(code: ExitCode) -> ExitCode {
    match code {
        0 => 0,
        code => code.clamp(1, FATAL_STATUS - 1),
    }
}

fn is_forever(value: &Value) -> bool {
    matches!(
        value.to_string().to_ascii_lowercase().as_str(),
        "inf" | "forever" | "infinite"
    )
}

/// Set the readonly `script.file` / `script.dir` of the innermost frame.
fn define_script_vars(session: &mut Session, path: &Path) {
    let dir = path.parent().unwrap_or(Path::new("."));
    let readonly = |text: String| Variable {
        value: Value::Str(text),
        readonly: true,
        exported: false,
    };
    let [file_var, dir_var] = SCRIPT_VARS;
    let env = session.env_mut();
    env.define(file_var, readonly(path.display().to_string()));
    env.define(dir_var, readonly(dir.display().to_string()));
}

/// Visit the bare command names of `statements`, nested ones included.
fn collect_commands(statements: &[Statement], visit: &mut dyn FnMut(usize, &str)) {
    for statement in statements {
        collect_statement(statement, visit);
    }
}

fn collect_branch(branch: &Branch, visit: &mut dyn FnMut(usize, &str)) {
    match branch {
        Branch::Inline(statement) => collect_statement(statement, visit),
        Branch::Block(body) => collect_commands(body, visit),
    }
}

fn collect_statement(statement: &Statement, visit: &mut dyn FnMut(usize, &str)) {
    match &statement.kind {
        StatementKind::Command(call) => {
            if let Some(name) = call.name.as_bare() {
                visit(statement.line, name);
            }
        }
        StatementKind::If {
            then, otherwise, ..
        } => {
            collect_branch(then, visit);
            if let Some(otherwise) = otherwise {
                collect_branch(otherwise, visit);
            }
        }
        StatementKind::RepeatInline { body, .. } => collect_statement(body, visit),
        StatementKind::RepeatBlock { body, .. } => collect_commands(body, visit),
        StatementKind::Try { body, otherwise } => {
            collect_statement(body, visit);
            if let Some(otherwise) = otherwise {
                collect_statement(otherwise, visit);
            }
        }
        _ => {}
    }
}
