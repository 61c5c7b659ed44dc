use crate::session::Session;
use anyhow::Result;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// Object-safe capability shared by built-in glyphs and plugin commands.
///
/// A glyph receives its already-resolved argument words and the session it runs in,
/// writes whatever it prints to the session's output and returns its status. Errors
/// are reported by the executor as `name: error` and leave `last = 1`.
pub trait Glyph {
    /// Name the glyph was registered under.
    fn name(&self) -> &str;

    /// One-line description for `help`.
    fn summary(&self) -> &str {
        ""
    }

    fn invoke(&self, args: &[String], session: &mut Session) -> Result<ExitCode>;
}
