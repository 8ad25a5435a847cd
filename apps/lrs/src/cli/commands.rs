//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::{KeyArgs, ListArgs, ScopeArgs};
use crate::config::{BackendKind, LrsConfig};
use chrono::{DateTime, Utc};
use lrs_core::{
    Account, ActivityRepository, Actor, Agent, DocumentData, InverseFunctionalIdentifier, Iri,
    LrsError, PersonRepository, Repository, State, StateDocument, StateDocumentRepository,
    StateDocumentsFilter, StateKey, StateRepository, Statement, StatementId, StatementObject,
    StatementRepository, StatementsFilter, StorageBackend, primitives::MAX_DOCUMENT_SIZE,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum statement file size (100 MB).
///
/// This prevents memory exhaustion from malicious or accidental large files.
const MAX_STATEMENT_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum payload file size, matching the store's document limit.
const MAX_PAYLOAD_FILE_SIZE: u64 = MAX_DOCUMENT_SIZE as u64;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), LrsError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| LrsError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(LrsError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Validate an input file path.
///
/// Canonicalizes the path (resolving symlinks and "..") and ensures it names
/// an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, LrsError> {
    let canonical = path.canonicalize().map_err(|e| {
        LrsError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(LrsError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Read a validated input file.
fn read_input(path: &Path, max_size: u64) -> Result<Vec<u8>, LrsError> {
    let validated_path = validate_file_path(path)?;
    validate_file_size(&validated_path, max_size)?;
    std::fs::read(&validated_path).map_err(|e| LrsError::IoError(format!("Read file: {}", e)))
}

// =============================================================================
// ARGUMENT PARSING
// =============================================================================

/// Parse an agent given on the command line.
///
/// Accepted forms: `mailto:ADDRESS` (or a bare address), `sha1:HEX`,
/// `openid:URI`, `account:HOMEPAGE|NAME`.
pub fn parse_agent(value: &str) -> Result<Agent, LrsError> {
    let value = value.trim();
    let invalid = || {
        LrsError::InvalidIdentifier(format!(
            "Unrecognized agent '{}'. Use: mailto:ADDRESS, sha1:HEX, openid:URI, account:HOMEPAGE|NAME",
            value
        ))
    };

    let ifi = if let Some(uri) = value.strip_prefix("openid:") {
        InverseFunctionalIdentifier::OpenId(non_empty(uri).ok_or_else(invalid)?.to_string())
    } else if let Some(hex) = value.strip_prefix("sha1:") {
        InverseFunctionalIdentifier::MboxSha1Sum(
            non_empty(hex).ok_or_else(invalid)?.to_ascii_lowercase(),
        )
    } else if let Some(account) = value.strip_prefix("account:") {
        let (home_page, name) = account.split_once('|').ok_or_else(invalid)?;
        InverseFunctionalIdentifier::Account(Account::new(
            non_empty(home_page).ok_or_else(invalid)?,
            non_empty(name).ok_or_else(invalid)?,
        ))
    } else if value.starts_with("mailto:") || value.contains('@') {
        InverseFunctionalIdentifier::mbox(value)
    } else {
        return Err(invalid());
    };
    Ok(Agent::new(ifi))
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

/// Parse an optional registration UUID.
pub fn parse_registration(registration: Option<&str>) -> Result<Option<Uuid>, LrsError> {
    registration
        .map(|r| {
            Uuid::parse_str(r.trim())
                .map_err(|e| LrsError::InvalidIdentifier(format!("registration {}: {}", r, e)))
        })
        .transpose()
}

/// Parse an RFC 3339 timestamp.
pub fn parse_time(value: &str) -> Result<DateTime<Utc>, LrsError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LrsError::InvalidFilter(format!("timestamp '{}': {}", value, e)))
}

fn parse_authority(authority: Option<&str>) -> Result<Option<Actor>, LrsError> {
    authority
        .map(|a| parse_agent(a).map(Actor::from))
        .transpose()
}

impl ScopeArgs {
    /// Key with an empty state id, for listing a scope.
    pub fn to_scope_key(&self) -> Result<StateKey, LrsError> {
        Ok(StateKey::new(
            Iri::new(self.activity.as_str())?,
            parse_agent(&self.agent)?,
            "",
            parse_registration(self.registration.as_deref())?,
        ))
    }
}

impl KeyArgs {
    pub fn to_key(&self) -> Result<StateKey, LrsError> {
        let scope = self.scope.to_scope_key()?;
        Ok(StateKey {
            state_id: self.state_id.clone(),
            ..scope
        })
    }
}

impl ListArgs {
    /// Build the statement filter these arguments describe.
    pub fn to_filter(&self) -> Result<StatementsFilter, LrsError> {
        let mut filter = StatementsFilter::new();
        if let Some(agent) = &self.agent {
            filter = filter.by_agent(parse_agent(agent)?);
        }
        if let Some(verb) = &self.verb {
            filter = filter.by_verb(Iri::new(verb.as_str())?);
        }
        if let Some(activity) = &self.activity {
            filter = filter.by_activity(Iri::new(activity.as_str())?);
        }
        if let Some(registration) = parse_registration(self.registration.as_deref())? {
            filter = filter.by_registration(registration);
        }
        if let Some(since) = &self.since {
            filter = filter.since(parse_time(since)?);
        }
        if let Some(until) = &self.until {
            filter = filter.until(parse_time(until)?);
        }
        if self.related_activities {
            filter = filter.include_related_activities();
        }
        if self.related_agents {
            filter = filter.include_related_agents();
        }
        if let Some(limit) = self.limit {
            filter = filter.limit(limit);
        }
        if self.descending {
            filter = filter.descending();
        }
        Ok(filter)
    }
}

/// Parse a `STATE_ID=PATH` document entry.
pub fn parse_entry(entry: &str) -> Result<(String, PathBuf), LrsError> {
    match entry.split_once('=') {
        Some((state_id, path)) if !state_id.is_empty() && !path.is_empty() => {
            Ok((state_id.to_string(), PathBuf::from(path)))
        }
        _ => Err(LrsError::InvalidIdentifier(format!(
            "Document entry '{}' must be STATE_ID=PATH",
            entry
        ))),
    }
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), LrsError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| LrsError::SerializationError(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

/// Payload as JSON when it parses, otherwise as (lossy) text.
fn payload_value(data: &DocumentData) -> serde_json::Value {
    data.to_json::<serde_json::Value>().unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(data.as_bytes()).into_owned())
    })
}

fn actor_label(actor: &Actor) -> String {
    match (actor.name(), actor.ifi()) {
        (Some(name), Some(ifi)) => format!("{} <{}>", name, ifi.key()),
        (None, Some(ifi)) => ifi.key(),
        (Some(name), None) => name.to_string(),
        (None, None) => "anonymous group".to_string(),
    }
}

fn object_label(object: &StatementObject) -> String {
    match object {
        StatementObject::Activity(activity) => activity.id.to_string(),
        StatementObject::Agent(agent) => actor_label(&Actor::Agent(agent.clone())),
        StatementObject::Group(group) => actor_label(&Actor::Group(group.clone())),
        StatementObject::StatementRef(id) => format!("statement {}", id),
    }
}

fn id_label(statement: &Statement) -> String {
    statement
        .id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string())
}

// =============================================================================
// REPOSITORY ACCESS
// =============================================================================

/// Open the repository the configuration points at.
pub fn open_repository(config: &LrsConfig) -> Result<Repository<StorageBackend>, LrsError> {
    let backend = match config.backend {
        BackendKind::Memory => StorageBackend::default(),
        BackendKind::Redb => StorageBackend::open_redb(&config.database)?,
    };
    tracing::debug!(
        "Opened {} backend (database: {:?})",
        config.backend,
        config.database
    );
    Repository::open(backend)
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize new database.
pub fn cmd_init(config: &LrsConfig, force: bool) -> Result<(), LrsError> {
    if config.backend == BackendKind::Memory {
        println!("The memory backend keeps no database file; nothing to initialize");
        return Ok(());
    }

    if config.database.exists() {
        if !force {
            return Err(LrsError::ConfigError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&config.database)
            .map_err(|e| LrsError::IoError(format!("Remove database: {}", e)))?;
        tracing::info!("Removed existing database {:?}", config.database);
    }

    let _repo = open_repository(config)?;
    println!("Initialized new redb database at {:?}", config.database);
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show record counts.
pub fn cmd_status(config: &LrsConfig, json_mode: bool) -> Result<(), LrsError> {
    let repo = open_repository(config)?;
    let stats = repo.stats()?;

    if json_mode {
        let output = serde_json::json!({
            "database": config.database.to_string_lossy(),
            "backend": config.backend,
            "stats": stats,
        });
        return print_json(&output);
    }

    println!("LRS Status");
    println!("==========");
    println!("Database: {:?}", config.database);
    println!("Backend:  {}", config.backend);
    println!();
    println!("Statements:      {}", stats.statements);
    println!("Voided:          {}", stats.voided);
    println!("States:          {}", stats.states);
    println!("State Documents: {}", stats.state_documents);
    println!("Activities:      {}", stats.activities);
    println!("Agents:          {}", stats.agents);

    Ok(())
}

// =============================================================================
// STATEMENT COMMANDS
// =============================================================================

/// A statement file holds one statement or an array of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatementInput {
    Batch(Vec<Statement>),
    Single(Box<Statement>),
}

/// Store statements from a file.
///
/// Statements are queued in file order and the last one flushes the queue,
/// so the whole file reaches the database in one batch.
pub fn cmd_statement_store(config: &LrsConfig, json_mode: bool, file: &Path) -> Result<(), LrsError> {
    tracing::info!("Storing statements from {:?}", file);

    let contents = read_input(file, MAX_STATEMENT_FILE_SIZE)?;
    let input: StatementInput = serde_json::from_slice(&contents)
        .map_err(|e| LrsError::DeserializationError(e.to_string()))?;
    let statements = match input {
        StatementInput::Batch(statements) => statements,
        StatementInput::Single(statement) => vec![*statement],
    };
    if statements.is_empty() {
        return Err(LrsError::InvalidStatement(
            "input holds no statements".to_string(),
        ));
    }

    let mut repo = open_repository(config)?;
    let last = statements.len() - 1;
    let mut ids = Vec::with_capacity(statements.len());
    for (i, statement) in statements.iter().enumerate() {
        ids.push(repo.store_statement(statement, i == last)?);
    }

    if json_mode {
        return print_json(&serde_json::json!({ "stored": ids }));
    }

    println!("Stored {} statement(s)", ids.len());
    for id in &ids {
        println!("  {}", id);
    }
    Ok(())
}

/// Show one statement from the regular or voided view.
pub fn cmd_statement_get(
    config: &LrsConfig,
    json_mode: bool,
    id: &str,
    authority: Option<&str>,
    voided: bool,
) -> Result<(), LrsError> {
    let id: StatementId = id.parse()?;
    let authority = parse_authority(authority)?;
    let repo = open_repository(config)?;

    let statement = if voided {
        repo.find_voided_statement_by_id(id, authority.as_ref())?
    } else {
        repo.find_statement_by_id(id, authority.as_ref())?
    };

    if json_mode {
        return print_json(&statement);
    }

    println!("Statement {}", id_label(&statement));
    if voided {
        if let Some(voider) = repo.voided_by(id) {
            println!("  Voided By: {}", voider);
        }
    }
    println!("  Actor:     {}", actor_label(&statement.actor));
    println!("  Verb:      {}", statement.verb.id);
    println!("  Object:    {}", object_label(&statement.object));
    if let Some(registration) = statement.registration() {
        println!("  Registration: {}", registration);
    }
    match statement.timestamp {
        Some(timestamp) => println!("  Timestamp: {}", timestamp.to_rfc3339()),
        None => println!("  Timestamp: -"),
    }
    if let Some(authority) = &statement.authority {
        println!("  Authority: {}", actor_label(authority));
    }
    Ok(())
}

/// List statements matching a filter.
pub fn cmd_statement_list(config: &LrsConfig, json_mode: bool, args: &ListArgs) -> Result<(), LrsError> {
    let filter = args.to_filter()?;
    let authority = parse_authority(args.authority.as_deref())?;
    let repo = open_repository(config)?;
    let statements = repo.find_statements_by(&filter, authority.as_ref())?;

    if json_mode {
        return print_json(&statements);
    }

    for statement in &statements {
        println!(
            "{}  {}  {}  {}",
            id_label(statement),
            actor_label(&statement.actor),
            statement.verb.id,
            object_label(&statement.object)
        );
    }
    println!("{} statement(s)", statements.len());
    Ok(())
}

// =============================================================================
// STATE COMMANDS
// =============================================================================

/// JSON view of a state or document.
#[derive(Debug, Serialize)]
struct RecordView<'a> {
    activity: &'a Iri,
    agent: String,
    state_id: &'a str,
    registration: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated: Option<DateTime<Utc>>,
    data: serde_json::Value,
}

impl<'a> RecordView<'a> {
    fn of_state(state: &'a State) -> Self {
        Self {
            data: payload_value(&state.data),
            ..Self::of_state_key(&state.key)
        }
    }

    fn of_document(document: &'a StateDocument) -> Self {
        Self {
            content_type: Some(&document.content_type),
            updated: Some(document.updated),
            data: payload_value(&document.data),
            ..Self::of_state_key(&document.key)
        }
    }

    fn of_state_key(key: &'a StateKey) -> Self {
        Self {
            activity: &key.activity,
            agent: key.agent.ifi.key(),
            state_id: &key.state_id,
            registration: key.registration,
            content_type: None,
            updated: None,
            data: serde_json::Value::Null,
        }
    }

    fn print_text(&self) {
        println!("State {}", self.state_id);
        println!("  Activity:     {}", self.activity);
        println!("  Agent:        {}", self.agent);
        if let Some(registration) = self.registration {
            println!("  Registration: {}", registration);
        }
        if let Some(content_type) = self.content_type {
            println!("  Content Type: {}", content_type);
        }
        if let Some(updated) = self.updated {
            println!("  Updated:      {}", updated.to_rfc3339());
        }
        println!("  Data:         {}", self.data);
    }
}

/// Insert or replace a state.
pub fn cmd_state_put(config: &LrsConfig, key: &KeyArgs, file: &Path) -> Result<(), LrsError> {
    let key = key.to_key()?;
    let data = read_input(file, MAX_PAYLOAD_FILE_SIZE)?;
    let mut repo = open_repository(config)?;
    repo.store_state(&State::new(key.clone(), DocumentData::new(data)), true)?;
    println!("Stored state {:?}", key.state_id);
    Ok(())
}

/// Show one state.
pub fn cmd_state_get(config: &LrsConfig, json_mode: bool, key: &KeyArgs) -> Result<(), LrsError> {
    let key = key.to_key()?;
    let repo = open_repository(config)?;
    let state = repo.find_state(&key)?;

    match (&state, json_mode) {
        (Some(state), true) => print_json(&RecordView::of_state(state)),
        (None, true) => print_json(&serde_json::Value::Null),
        (Some(state), false) => {
            RecordView::of_state(state).print_text();
            Ok(())
        }
        (None, false) => {
            println!("State {:?} not found", key.state_id);
            Ok(())
        }
    }
}

/// List every state in a scope.
pub fn cmd_state_list(config: &LrsConfig, json_mode: bool, scope: &ScopeArgs) -> Result<(), LrsError> {
    let key = scope.to_scope_key()?;
    let repo = open_repository(config)?;
    let states = repo.find_states(&key)?;

    if json_mode {
        let views: Vec<_> = states.iter().map(RecordView::of_state).collect();
        return print_json(&views);
    }

    for state in &states {
        println!(
            "{}  {}",
            state.key.state_id,
            state
                .key
                .registration
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }
    println!("{} state(s)", states.len());
    Ok(())
}

/// Remove a state.
pub fn cmd_state_rm(config: &LrsConfig, key: &KeyArgs) -> Result<(), LrsError> {
    let key = key.to_key()?;
    let mut repo = open_repository(config)?;
    repo.remove_state(&key, true)?;
    println!("Removed state {:?}", key.state_id);
    Ok(())
}

// =============================================================================
// DOCUMENT COMMANDS
// =============================================================================

/// Insert or replace documents, one per `STATE_ID=PATH` entry.
///
/// Every file is read and buffered first, then a single commit writes them
/// in order. A failed commit reports how many documents were written.
pub fn cmd_document_put(
    config: &LrsConfig,
    scope: &ScopeArgs,
    entries: &[String],
    content_type: &str,
) -> Result<(), LrsError> {
    let scope_key = scope.to_scope_key()?;
    let mut documents = Vec::with_capacity(entries.len());
    for entry in entries {
        let (state_id, path) = parse_entry(entry)?;
        let data = read_input(&path, MAX_PAYLOAD_FILE_SIZE)?;
        let key = StateKey {
            state_id,
            ..scope_key.clone()
        };
        documents.push(
            StateDocument::new(key, DocumentData::new(data)).with_content_type(content_type),
        );
    }

    let mut repo = open_repository(config)?;
    for document in &documents {
        repo.save_deferred(document);
    }
    if let Err(e) = repo.commit() {
        let written = documents.len() - repo.pending();
        tracing::warn!(
            "Commit stopped after {} of {} document(s)",
            written,
            documents.len()
        );
        return Err(e);
    }

    println!("Saved {} document(s)", documents.len());
    Ok(())
}

/// Show one document.
pub fn cmd_document_get(config: &LrsConfig, json_mode: bool, key: &KeyArgs) -> Result<(), LrsError> {
    let key = key.to_key()?;
    let repo = open_repository(config)?;
    let document = repo.find(&key.state_id, &StateDocumentsFilter::for_key(&key))?;

    match (&document, json_mode) {
        (Some(document), true) => print_json(&RecordView::of_document(document)),
        (None, true) => print_json(&serde_json::Value::Null),
        (Some(document), false) => {
            RecordView::of_document(document).print_text();
            Ok(())
        }
        (None, false) => {
            println!("Document {:?} not found", key.state_id);
            Ok(())
        }
    }
}

/// Delete a document.
pub fn cmd_document_rm(config: &LrsConfig, key: &KeyArgs) -> Result<(), LrsError> {
    let key = key.to_key()?;
    let mut repo = open_repository(config)?;
    repo.delete(&StateDocument::new(key.clone(), DocumentData::default()))?;
    println!("Deleted document {:?}", key.state_id);
    Ok(())
}

// =============================================================================
// ACTIVITY AND PERSON COMMANDS
// =============================================================================

/// Show an activity.
pub fn cmd_activity_get(config: &LrsConfig, json_mode: bool, id: &str) -> Result<(), LrsError> {
    let id = Iri::new(id)?;
    let repo = open_repository(config)?;
    let activity = repo.find_activity_by_id(&id)?;

    if json_mode {
        return print_json(&activity);
    }

    println!("Activity {}", activity.id);
    match &activity.definition {
        Some(definition) => {
            for (language, name) in &definition.name {
                println!("  Name [{}]: {}", language, name);
            }
            for (language, description) in &definition.description {
                println!("  Description [{}]: {}", language, description);
            }
            if let Some(kind) = &definition.activity_type {
                println!("  Type: {}", kind);
            }
        }
        None => println!("  (no definition recorded)"),
    }
    Ok(())
}

/// Show every identity recorded for an agent.
pub fn cmd_person_get(config: &LrsConfig, json_mode: bool, agent: &str) -> Result<(), LrsError> {
    let agent = parse_agent(agent)?;
    let repo = open_repository(config)?;
    let person = repo.find_related_person_to(&agent)?;

    if json_mode {
        return print_json(&person);
    }

    println!("Person");
    println!("  Names:          {}", person.names.join(", "));
    println!("  Mboxes:         {}", person.mboxes.join(", "));
    println!("  Mbox SHA1 Sums: {}", person.mbox_sha1_sums.join(", "));
    println!("  OpenIDs:        {}", person.openids.join(", "));
    for account in &person.accounts {
        println!("  Account:        {} ({})", account.name, account.home_page);
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
