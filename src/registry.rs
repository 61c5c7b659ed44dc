use crate::command::Glyph;
use crate::error::{Result, SigilError};
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Statement keywords; never available as glyph names.
pub const KEYWORDS: &[&str] = &[
    "let", "say", "ask", "if", "then", "else", "rpt", "endrpt", "try", "exit", "inc",
    "include", "run", "alia", "unalia", "add", "sub", "mul", "div",
];

/// Commands the executor handles itself.
pub const SESSION_COMMANDS: &[&str] = &["help", "schk", "pse", "prof", "svrc", "rrc", "pin", "prv"];

/// Who provided a glyph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Builtin,
    Plugin(String),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Builtin => f.write_str("a built-in"),
            Origin::Plugin(name) => write!(f, "plugin `{name}`"),
        }
    }
}

#[derive(Clone)]
pub struct Registration {
    pub glyph: Rc<dyn Glyph>,
    pub origin: Origin,
}

/// Name → glyph table consulted after aliases and session commands.
#[derive(Default)]
pub struct GlyphRegistry {
    glyphs: IndexMap<String, Registration>,
}

impl GlyphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_reserved(name: &str) -> bool {
        KEYWORDS.contains(&name) || SESSION_COMMANDS.contains(&name)
    }

    /// Add `glyph` under `name`. Reserved and taken names are refused.
    pub fn register(&mut self, name: &str, glyph: Rc<dyn Glyph>, origin: Origin) -> Result<()> {
        if Self::is_reserved(name) {
            return Err(SigilError::GlyphConflict {
                name: name.to_string(),
                owner: "the language".to_string(),
            });
        }
        if let Some(existing) = self.glyphs.get(name) {
            return Err(SigilError::GlyphConflict {
                name: name.to_string(),
                owner: existing.origin.to_string(),
            });
        }
        debug!(glyph = name, origin = %origin, "registered glyph");
        self.glyphs
            .insert(name.to_string(), Registration { glyph, origin });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn Glyph>> {
        self.glyphs.get(name).map(|r| Rc::clone(&r.glyph))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.glyphs.contains_key(name)
    }

    pub fn origin(&self, name: &str) -> Option<&Origin> {
        self.glyphs.get(name).map(|r| &r.origin)
    }

    /// Remove every glyph contributed by `plugin` and return their names.
    pub fn unregister_plugin(&mut self, plugin: &str) -> Vec<String> {
        let mut removed = Vec::new();
        self.glyphs.retain(|name, registration| {
            let owned = matches!(&registration.origin, Origin::Plugin(p) if p == plugin);
            if owned {
                removed.push(name.clone());
            }
            !owned
        });
        removed
    }

    /// Registered glyphs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Registration)> {
        self.glyphs.iter().map(|(name, r)| (name.as_str(), r))
    }
}
