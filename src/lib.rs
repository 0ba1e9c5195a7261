//! rshell: an interactive shell built around a small command-execution
//! engine.
//!
//! A line goes through [`parser::parse`] into a [`command::Command`], which
//! [`interpreter::run`] executes block by block. Each pipeline is handed to
//! [`pipes::execute`], which wires the stages together and registers
//! background and stopped work with the [`jobs::JobManager`].

pub mod builtins;
pub mod command;
pub mod config;
pub mod editor;
pub mod error;
pub mod history;
pub mod interpreter;
pub mod jobs;
pub mod lexer;
pub mod logging;
pub mod parser;
pub mod pipes;
pub mod prompt;
pub mod redirects;
pub mod shell;
pub mod signal_handler;
pub mod state;
pub mod streams;
pub mod variables;

/// Process exit status as the shell reports it, always in `0..=255`.
pub type ExitCode = i32;
