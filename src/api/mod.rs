//! Outer surfaces: the command-line driver and the web front-end.

pub mod cli;
pub mod web;

pub use cli::{run, Cli, Command};
pub use web::{router, serve, AppState, WebApp};
