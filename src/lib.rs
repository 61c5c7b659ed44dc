//! Execution core of the Sigil scripting language.
//!
//! Sigil scripts are line oriented: one statement per line, blocks closed with `endrpt`.
//! This crate provides the lexer and parser, the scoped variable environment, the
//! control-flow executor, an undo/redo journal for file operations and a registry of
//! glyphs (commands) that plugins can extend with external executables.
//!
//! The main entry point is [`Interpreter`], which owns a [`Session`] (I/O streams,
//! working directory, active profile, journal) and runs source text, script files or an
//! interactive loop. The [`command`] module exposes the [`Glyph`] trait for adding
//! commands implemented in Rust.

pub mod arith;
mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
mod external;
mod help;
mod interpreter;
mod io_adapters;
pub mod journal;
pub mod lexer;
pub mod parser;
mod plugin;
pub mod profile;
pub mod registry;
mod session;
pub mod value;

pub use command::{ExitCode, Glyph};
pub use config::Config;
pub use error::SigilError;
pub use external::{ProcessBridge, ShellBridge, ShellKind, ShellOutcome, ShellRequest};
pub use interpreter::{INTERRUPTED_STATUS, Interpreter, MAX_DEPTH};
pub use io_adapters::{MemReader, MemWriter};
pub use session::Session;
