use crate::command::ExitCode;
use crate::error::{Result, SigilError};
use crate::lexer::{Word, WordPart};
use crate::value::Value;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env as stdenv;
use std::sync::LazyLock;

static NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("name pattern is valid")
});

/// Names that read the current frame's status and can never be assigned.
pub const STATUS_NAMES: [&str; 3] = ["last", "LAST", "LAST_EXIT"];

/// Readonly variables describing the running script. Never saved with a profile.
pub const SCRIPT_VARS: [&str; 2] = ["script.file", "script.dir"];

/// Whether `name` can be used as a variable name.
pub fn is_valid_name(name: &str) -> bool {
    NAME.is_match(name)
}

fn is_status_name(name: &str) -> bool {
    STATUS_NAMES.contains(&name)
}

/// A named value plus its flags.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Variable {
    pub value: Value,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub exported: bool,
}

impl Variable {
    pub fn new(value: Value) -> Self {
        Variable {
            value,
            ..Default::default()
        }
    }

    fn visible_from_child(&self) -> bool {
        self.readonly || self.exported
    }
}

#[derive(Debug, Clone, Default)]
struct Frame {
    vars: IndexMap<String, Variable>,
    last: ExitCode,
}

/// Variable scopes of one interpreter.
///
/// The bottom frame belongs to the REPL or top-level script; `run` pushes a child frame.
/// A child sees the readonly and exported variables of its callers (and assigns exported
/// ones in place) while plain caller variables stay hidden. Names introduced by a child
/// disappear when its frame is popped.
#[derive(Debug, Clone)]
pub struct Environment {
    frames: Vec<Frame>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
        }
    }

    /// Create an environment whose root frame holds `vars`.
    pub fn from_variables(vars: IndexMap<String, Variable>) -> Self {
        Self {
            frames: vec![Frame { vars, last: 0 }],
        }
    }

    /// Variables of the root frame, in insertion order.
    pub fn root_variables(&self) -> &IndexMap<String, Variable> {
        &self.frames[0].vars
    }

    /// Number of frames, 1 when no `run` child is active.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Frame::default());
    }

    /// Pop the innermost frame and return its final status.
    ///
    /// The root frame is never popped.
    pub fn pop_frame(&mut self) -> ExitCode {
        if self.frames.len() > 1 {
            self.frames.pop().map(|f| f.last).unwrap_or_default()
        } else {
            self.last()
        }
    }

    fn top(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let index = self.frames.len() - 1;
        &mut self.frames[index]
    }

    pub fn last(&self) -> ExitCode {
        self.top().last
    }

    pub fn set_last(&mut self, code: ExitCode) {
        self.top_mut().last = code;
    }

    /// Index of the frame whose `name` is visible from the innermost frame.
    fn locate(&self, name: &str) -> Option<usize> {
        let top = self.frames.len() - 1;
        if self.frames[top].vars.contains_key(name) {
            return Some(top);
        }
        (0..top).rev().find(|&i| {
            self.frames[i]
                .vars
                .get(name)
                .is_some_and(Variable::visible_from_child)
        })
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.locate(name).and_then(|i| self.frames[i].vars.get(name))
    }

    fn variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        let index = self.locate(name)?;
        self.frames[index].vars.get_mut(name)
    }

    /// Value of a visible variable; status names read the current `last`.
    pub fn get(&self, name: &str) -> Option<Value> {
        if is_status_name(name) {
            return Some(Value::Number(self.last() as f64));
        }
        self.variable(name).map(|v| v.value.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Assign `value` to `name`, creating it in the innermost frame if it is not visible.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<()> {
        self.store(name, value, false)
    }

    /// Assign and mark readonly (`let -r`). An existing readonly name is still rejected.
    pub fn assign_readonly(&mut self, name: &str, value: Value) -> Result<()> {
        self.store(name, value, true)
    }

    fn store(&mut self, name: &str, value: Value, readonly: bool) -> Result<()> {
        if is_status_name(name) {
            return Err(SigilError::ReadonlyViolation(name.to_string()));
        }
        match self.variable_mut(name) {
            Some(var) if var.readonly => Err(SigilError::ReadonlyViolation(name.to_string())),
            Some(var) => {
                var.value = value;
                var.readonly = readonly;
                Ok(())
            }
            None => {
                self.top_mut().vars.insert(
                    name.to_string(),
                    Variable {
                        value,
                        readonly,
                        exported: false,
                    },
                );
                Ok(())
            }
        }
    }

    /// Place `variable` in the innermost frame, shadowing any outer one.
    pub fn define(&mut self, name: &str, variable: Variable) {
        self.top_mut().vars.insert(name.to_string(), variable);
    }

    pub fn export(&mut self, name: &str) -> Result<()> {
        match self.variable_mut(name) {
            Some(var) => {
                var.exported = true;
                Ok(())
            }
            None => Err(SigilError::UndefinedVariable(name.to_string())),
        }
    }

    pub fn unset(&mut self, name: &str) -> Result<()> {
        if is_status_name(name) {
            return Err(SigilError::ReadonlyViolation(name.to_string()));
        }
        let Some(index) = self.locate(name) else {
            return Err(SigilError::UndefinedVariable(name.to_string()));
        };
        let vars = &mut self.frames[index].vars;
        if vars.get(name).is_some_and(|v| v.readonly) {
            return Err(SigilError::ReadonlyViolation(name.to_string()));
        }
        vars.shift_remove(name);
        Ok(())
    }

    /// All variables visible from the innermost frame, outermost first.
    pub fn visible(&self) -> IndexMap<String, Variable> {
        let top = self.frames.len() - 1;
        let mut out = IndexMap::new();
        for (i, frame) in self.frames.iter().enumerate() {
            for (name, var) in &frame.vars {
                if i == top || var.visible_from_child() {
                    out.insert(name.clone(), var.clone());
                }
            }
        }
        out
    }

    /// Exported variables as `(name, text)` pairs for child processes.
    pub fn exported(&self) -> Vec<(String, String)> {
        self.visible()
            .into_iter()
            .filter(|(_, v)| v.exported)
            .map(|(name, v)| (name, v.value.to_string()))
            .collect()
    }

    /// Text of a variable for interpolation: the environment first, then the process
    /// environment.
    fn lookup_text(&self, name: &str) -> Option<String> {
        self.get(name)
            .map(|v| v.to_string())
            .or_else(|| stdenv::var(name).ok())
    }

    /// Resolve the interpolations of `word` into text.
    ///
    /// Unresolved `$name` / `${name}` are kept verbatim; unresolved `'name'` yields `name`.
    pub fn interpolate(&self, word: &Word) -> String {
        let mut out = String::new();
        for part in &word.parts {
            match part {
                WordPart::Literal(s) => out.push_str(s),
                WordPart::Var { name, braced } => match self.lookup_text(name) {
                    Some(text) => out.push_str(&text),
                    None if *braced => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                    None => {
                        out.push('$');
                        out.push_str(name);
                    }
                },
                WordPart::Shorthand(name) => match self.lookup_text(name) {
                    Some(text) => out.push_str(&text),
                    None => out.push_str(name),
                },
            }
        }
        out
    }

    /// Resolve a word used as a value.
    ///
    /// A bare word naming a variable yields that variable's value, as does a word made of
    /// a single reference. Other quoted words are strings; other unquoted words are
    /// inferred from their text.
    pub fn resolve(&self, word: &Word) -> Value {
        if let Some(name) = word.as_bare() {
            return self.get(name).unwrap_or_else(|| Value::infer(name));
        }
        if let [WordPart::Var { name, .. } | WordPart::Shorthand(name)] = word.parts.as_slice() {
            if let Some(value) = self.get(name) {
                return value;
            }
        }
        let text = self.interpolate(word);
        if word.quoted {
            Value::Str(text)
        } else {
            Value::infer(&text)
        }
    }

    /// Resolve a word as display text with bare-identifier substitution (`say`).
    pub fn resolve_text(&self, word: &Word) -> String {
        match word.as_bare() {
            Some(name) => self
                .get(name)
                .map(|v| v.to_string())
                .unwrap_or_else(|| name.to_string()),
            None => self.interpolate(word),
        }
    }
}
