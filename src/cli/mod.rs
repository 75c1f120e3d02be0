//! CLI module - Command-line interface for Sesame
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sesame - session authentication service
#[derive(Parser)]
#[command(name = "sesame")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config.toml (defaults to the usual search locations)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API until interrupted
    #[command(alias = "daemon")]
    Serve,

    /// Create default config file
    Init,

    /// Create an account
    Register {
        username: String,
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Rotate an account's session token, signing out every session
    ResetToken {
        /// Username or email
        credential: String,
    },
}

pub use commands::*;
