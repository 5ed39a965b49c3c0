//! Process CLI (spec.md §6): `<binary> -f <config-path>`; a missing `-f`
//! is a fatal startup error, which `clap`'s `required` enforces for us.

use clap::Parser;
use std::path::PathBuf;

/// Rate-limit decision engine gateway.
#[derive(Debug, Parser)]
#[command(name = "ratewarden-gateway")]
pub struct Cli {
    /// Path to the gateway's `key = value` configuration file.
    #[arg(short = 'f', long = "config", required = true)]
    pub config: PathBuf,
}
