//! Command-line interface for bistro.
//!
//! This module provides the CLI structure for the `bistro` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

pub use commands::{
    AuthCommand, ConfigCommand, FavoriteCommand, FeedbackCommand, ListCommand, RecipeChanges,
    RecipeCommand, RecipeForm, SettingsCommand, StatusCommand, Switch, ThemeArg,
};

/// bistro - Keep your recipes and favorites in one place
///
/// Browse the shared recipe collection, add your own recipes, and keep a
/// list of favorites. Everything is stored locally.
#[derive(Debug, Parser)]
#[command(name = "bistro")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in, sign out and manage accounts
    #[command(subcommand)]
    Auth(AuthCommand),

    /// Browse and edit recipes
    #[command(subcommand)]
    Recipe(RecipeCommand),

    /// Manage favorite recipes
    #[command(subcommand)]
    Favorite(FavoriteCommand),

    /// Send feedback
    #[command(subcommand)]
    Feedback(FeedbackCommand),

    /// View or change local settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Show session and store status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }
}
