//! # LRS CLI Module
//!
//! This module implements the CLI interface for the record store.
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new database
//! - `status` - Show record counts
//! - `statement store|get|voided|list` - Store and query statements
//! - `state put|get|list|rm` - Manage state records
//! - `document put|get|rm` - Manage state documents
//! - `activity get` - Show an activity seen in stored statements
//! - `person get` - Show every identity known for an agent

mod commands;

use crate::config::{LrsConfig, Overrides};
use clap::{Args, Parser, Subcommand};
use lrs_core::LrsError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// LRS - learning record store
///
/// Stores xAPI statements, state records and state documents in a local
/// database.
#[derive(Parser, Debug)]
#[command(name = "lrs")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the database (default: lrs.redb)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: "redb" (ACID database) or "memory" (volatile)
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<String>,

    /// Path to a TOML config file (default: lrs.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: "text" or "json"
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Settings given as flags, for layering over env and file config.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            database: self.database.clone(),
            backend: self.backend.clone(),
            log_format: self.log_format.clone(),
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show record counts
    Status,

    /// Store and query statements
    Statement {
        #[command(subcommand)]
        action: StatementCommand,
    },

    /// Manage state records
    State {
        #[command(subcommand)]
        action: StateCommand,
    },

    /// Manage state documents
    Document {
        #[command(subcommand)]
        action: DocumentCommand,
    },

    /// Inspect activities
    Activity {
        #[command(subcommand)]
        action: ActivityCommand,
    },

    /// Inspect people
    Person {
        #[command(subcommand)]
        action: PersonCommand,
    },
}

/// Statement subcommands.
#[derive(Subcommand, Debug)]
pub enum StatementCommand {
    /// Store one statement or a JSON array of statements
    Store {
        /// Path to the statement JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show a statement that is neither voided nor voiding
    Get {
        /// Statement id
        id: String,

        /// Only return it if stored under this authority
        #[arg(long)]
        authority: Option<String>,
    },

    /// Show a voided or voiding statement
    Voided {
        /// Statement id
        id: String,

        /// Only return it if stored under this authority
        #[arg(long)]
        authority: Option<String>,
    },

    /// List statements matching a filter
    List(ListArgs),
}

/// Statement listing filter.
#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Agent (mailto:ADDRESS, sha1:HEX, openid:URI, account:HOMEPAGE|NAME)
    #[arg(long)]
    pub agent: Option<String>,

    /// Verb IRI
    #[arg(long)]
    pub verb: Option<String>,

    /// Activity IRI
    #[arg(long)]
    pub activity: Option<String>,

    /// Registration UUID
    #[arg(long)]
    pub registration: Option<String>,

    /// Earliest timestamp, inclusive (RFC 3339)
    #[arg(long)]
    pub since: Option<String>,

    /// Latest timestamp, exclusive (RFC 3339)
    #[arg(long)]
    pub until: Option<String>,

    /// Match the activity against context activities too
    #[arg(long)]
    pub related_activities: bool,

    /// Match the agent against every agent a statement names
    #[arg(long)]
    pub related_agents: bool,

    /// Maximum number of statements (0 = no limit)
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Newest first
    #[arg(long)]
    pub descending: bool,

    /// Only statements stored under this authority
    #[arg(long)]
    pub authority: Option<String>,
}

/// Activity and agent a state belongs to.
#[derive(Args, Debug, Clone)]
pub struct ScopeArgs {
    /// Activity IRI
    #[arg(long)]
    pub activity: String,

    /// Agent (mailto:ADDRESS, sha1:HEX, openid:URI, account:HOMEPAGE|NAME)
    #[arg(long)]
    pub agent: String,

    /// Registration UUID
    #[arg(long)]
    pub registration: Option<String>,
}

/// Full key of one state record.
#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// State id
    #[arg(short, long)]
    pub state_id: String,
}

/// State subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommand {
    /// Insert or replace a state from a file
    Put {
        #[command(flatten)]
        key: KeyArgs,

        /// Path to the payload file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show one state
    Get {
        #[command(flatten)]
        key: KeyArgs,
    },

    /// List states for an activity and agent
    List {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Remove a state
    Rm {
        #[command(flatten)]
        key: KeyArgs,
    },
}

/// State document subcommands.
#[derive(Subcommand, Debug)]
pub enum DocumentCommand {
    /// Insert or replace one or more documents from files
    Put {
        #[command(flatten)]
        scope: ScopeArgs,

        /// STATE_ID=PATH pairs, committed in order
        #[arg(required = true)]
        entries: Vec<String>,

        /// Content type recorded with every document
        #[arg(long, default_value = lrs_core::primitives::DEFAULT_CONTENT_TYPE)]
        content_type: String,
    },

    /// Show one document
    Get {
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Delete a document
    Rm {
        #[command(flatten)]
        key: KeyArgs,
    },
}

/// Activity subcommands.
#[derive(Subcommand, Debug)]
pub enum ActivityCommand {
    /// Show an activity by IRI
    Get {
        /// Activity IRI
        id: String,
    },
}

/// Person subcommands.
#[derive(Subcommand, Debug)]
pub enum PersonCommand {
    /// Show every identity recorded for an agent
    Get {
        /// Agent (mailto:ADDRESS, sha1:HEX, openid:URI, account:HOMEPAGE|NAME)
        agent: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments and resolved configuration.
pub fn execute(cli: Cli, config: &LrsConfig) -> Result<(), LrsError> {
    let json_mode = cli.json;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(config, force),
        Some(Commands::Status) => cmd_status(config, json_mode),
        Some(Commands::Statement { action }) => match action {
            StatementCommand::Store { file } => cmd_statement_store(config, json_mode, &file),
            StatementCommand::Get { id, authority } => {
                cmd_statement_get(config, json_mode, &id, authority.as_deref(), false)
            }
            StatementCommand::Voided { id, authority } => {
                cmd_statement_get(config, json_mode, &id, authority.as_deref(), true)
            }
            StatementCommand::List(args) => cmd_statement_list(config, json_mode, &args),
        },
        Some(Commands::State { action }) => match action {
            StateCommand::Put { key, file } => cmd_state_put(config, &key, &file),
            StateCommand::Get { key } => cmd_state_get(config, json_mode, &key),
            StateCommand::List { scope } => cmd_state_list(config, json_mode, &scope),
            StateCommand::Rm { key } => cmd_state_rm(config, &key),
        },
        Some(Commands::Document { action }) => match action {
            DocumentCommand::Put {
                scope,
                entries,
                content_type,
            } => cmd_document_put(config, &scope, &entries, &content_type),
            DocumentCommand::Get { key } => cmd_document_get(config, json_mode, &key),
            DocumentCommand::Rm { key } => cmd_document_rm(config, &key),
        },
        Some(Commands::Activity {
            action: ActivityCommand::Get { id },
        }) => cmd_activity_get(config, json_mode, &id),
        Some(Commands::Person {
            action: PersonCommand::Get { agent },
        }) => cmd_person_get(config, json_mode, &agent),
        None => {
            // No subcommand - show status by default
            cmd_status(config, json_mode)
        }
    }
}
