//! End-to-end tests for CLI parsing and commands against a temporary database.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use clap::Parser;
use lrs::cli::{self, Cli, Commands, KeyArgs, ListArgs, ScopeArgs, StatementCommand};
use lrs::config::{BackendKind, LogFormat, LrsConfig};
use lrs_core::{
    Activity, Agent, InverseFunctionalIdentifier, Iri, LrsError, StateDocumentRepository,
    StateDocumentsFilter, StateRepository, Statement, StatementObject, StatementRepository,
    StatementsFilter, Verb,
};
use tempfile::TempDir;

// =============================================================================
// FIXTURES
// =============================================================================

const LESSON: &str = "http://example.com/activities/lesson";
const LEARNER: &str = "learner@example.com";

fn redb_config(dir: &TempDir) -> LrsConfig {
    LrsConfig {
        database: dir.path().join("lrs.redb"),
        backend: BackendKind::Redb,
        log_format: LogFormat::Text,
    }
}

fn attempted() -> Statement {
    Statement::new(
        Agent::named("Learner", InverseFunctionalIdentifier::mbox(LEARNER)),
        Verb::new(Iri::new("http://adlnet.gov/expapi/verbs/attempted").unwrap()),
        StatementObject::Activity(Activity::new(Iri::new(LESSON).unwrap())),
    )
}

fn write_json<T: serde::Serialize>(dir: &TempDir, name: &str, value: &T) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
    path
}

fn key_args(state_id: &str) -> KeyArgs {
    KeyArgs {
        scope: scope_args(),
        state_id: state_id.to_string(),
    }
}

fn scope_args() -> ScopeArgs {
    ScopeArgs {
        activity: LESSON.to_string(),
        agent: LEARNER.to_string(),
        registration: None,
    }
}

fn open(config: &LrsConfig) -> lrs_core::Repository<lrs_core::StorageBackend> {
    cli::open_repository(config).unwrap()
}

// =============================================================================
// PARSING TESTS
// =============================================================================

#[test]
fn test_global_flags_parse_anywhere() {
    let parsed = Cli::try_parse_from([
        "lrs",
        "statement",
        "get",
        "0f0e0d0c-0b0a-4988-8776-655443322110",
        "-D",
        "custom.redb",
        "--json",
    ])
    .unwrap();
    assert!(parsed.json);
    assert_eq!(
        parsed.overrides().database,
        Some(std::path::PathBuf::from("custom.redb"))
    );
    assert!(matches!(
        parsed.command,
        Some(Commands::Statement {
            action: StatementCommand::Get { .. }
        })
    ));
}

#[test]
fn test_document_put_requires_entries() {
    let result = Cli::try_parse_from([
        "lrs",
        "document",
        "put",
        "--activity",
        LESSON,
        "--agent",
        LEARNER,
    ]);
    assert!(result.is_err());
}

#[test]
fn test_no_subcommand_is_allowed() {
    let parsed = Cli::try_parse_from(["lrs", "--quiet"]).unwrap();
    assert!(parsed.command.is_none());
    assert!(parsed.quiet);
}

// =============================================================================
// INIT TESTS
// =============================================================================

#[test]
fn test_init_refuses_existing_database_without_force() {
    let dir = tempfile::tempdir().unwrap();
    let config = redb_config(&dir);

    cli::cmd_init(&config, false).unwrap();
    assert!(config.database.exists());
    assert!(matches!(
        cli::cmd_init(&config, false),
        Err(LrsError::ConfigError(_))
    ));
}

#[test]
fn test_init_force_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let config = redb_config(&dir);
    let file = write_json(&dir, "one.json", &attempted());
    cli::cmd_statement_store(&config, false, &file).unwrap();

    cli::cmd_init(&config, true).unwrap();
    assert_eq!(open(&config).stats().unwrap().statements, 0);
}

// =============================================================================
// STATEMENT TESTS
// =============================================================================

#[test]
fn test_store_single_and_batch_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = redb_config(&dir);

    let single = write_json(&dir, "single.json", &attempted());
    let batch = write_json(&dir, "batch.json", &vec![attempted(), attempted()]);
    cli::cmd_statement_store(&config, true, &single).unwrap();
    cli::cmd_statement_store(&config, false, &batch).unwrap();

    let repo = open(&config);
    let listed = repo
        .find_statements_by(&StatementsFilter::new(), None)
        .unwrap();
    assert_eq!(listed.len(), 3);
    assert!(listed.iter().all(|s| s.id.is_some()));
    assert_eq!(repo.pending_writes(), 0);
}

#[test]
fn test_rejected_batch_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = redb_config(&dir);

    let unresolvable = Statement::new(
        Agent::new(InverseFunctionalIdentifier::mbox(LEARNER)),
        Verb::voided(),
        StatementObject::Activity(Activity::new(Iri::new(LESSON).unwrap())),
    );
    let batch = write_json(&dir, "batch.json", &vec![attempted(), unresolvable]);
    assert!(matches!(
        cli::cmd_statement_store(&config, false, &batch),
        Err(LrsError::InvalidStatement(_))
    ));
    assert_eq!(open(&config).stats().unwrap().statements, 0);
}

#[test]
fn test_empty_batch_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = redb_config(&dir);
    let empty = write_json(&dir, "empty.json", &Vec::<Statement>::new());
    assert!(matches!(
        cli::cmd_statement_store(&config, false, &empty),
        Err(LrsError::InvalidStatement(_))
    ));
}

#[test]
fn test_get_and_voided_views() {
    let dir = tempfile::tempdir().unwrap();
    let config = redb_config(&dir);
    let id = {
        let mut repo = open(&config);
        repo.store_statement(&attempted(), true).unwrap()
    };
    let id_text = id.to_string();

    cli::cmd_statement_get(&config, false, &id_text, None, false).unwrap();
    assert!(matches!(
        cli::cmd_statement_get(&config, false, &id_text, None, true),
        Err(LrsError::NotFound(_))
    ));

    let voider_text = "0f0e0d0c-0b0a-4988-8776-655443322110";
    let voiding = Statement::voiding(
        Agent::new(InverseFunctionalIdentifier::mbox("admin@example.com")),
        id,
    )
    .with_id(Some(voider_text.parse().unwrap()));
    let file = write_json(&dir, "void.json", &voiding);
    cli::cmd_statement_store(&config, false, &file).unwrap();

    cli::cmd_statement_get(&config, true, &id_text, None, true).unwrap();
    assert!(matches!(
        cli::cmd_statement_get(&config, false, &id_text, None, false),
        Err(LrsError::NotFound(_))
    ));

    cli::cmd_statement_get(&config, false, voider_text, None, true).unwrap();
    assert!(matches!(
        cli::cmd_statement_get(&config, false, voider_text, None, false),
        Err(LrsError::NotFound(_))
    ));
}

#[test]
fn test_malformed_id_is_invalid_identifier() {
    let dir = tempfile::tempdir().unwrap();
    let config = redb_config(&dir);
    assert!(matches!(
        cli::cmd_statement_get(&config, false, "not-a-uuid", None, false),
        Err(LrsError::InvalidIdentifier(_))
    ));
}

#[test]
fn test_list_with_filter_and_bad_time() {
    let dir = tempfile::tempdir().unwrap();
    let config = redb_config(&dir);
    let file = write_json(&dir, "batch.json", &vec![attempted(), attempted()]);
    cli::cmd_statement_store(&config, false, &file).unwrap();

    let args = ListArgs {
        agent: Some(LEARNER.to_string()),
        limit: Some(1),
        ..ListArgs::default()
    };
    cli::cmd_statement_list(&config, true, &args).unwrap();

    let bad = ListArgs {
        since: Some("last week".to_string()),
        ..ListArgs::default()
    };
    assert!(matches!(
        cli::cmd_statement_list(&config, false, &bad),
        Err(LrsError::InvalidFilter(_))
    ));
}

// =============================================================================
// STATE AND DOCUMENT TESTS
// =============================================================================

#[test]
fn test_state_put_get_list_rm() {
    let dir = tempfile::tempdir().unwrap();
    let config = redb_config(&dir);
    let payload = write_json(&dir, "state.json", &serde_json::json!({"page": 3}));

    cli::cmd_state_put(&config, &key_args("bookmark"), &payload).unwrap();
    cli::cmd_state_put(&config, &key_args("attempts"), &payload).unwrap();
    cli::cmd_state_get(&config, true, &key_args("bookmark")).unwrap();
    cli::cmd_state_list(&config, false, &scope_args()).unwrap();

    let key = key_args("bookmark").to_key().unwrap();
    assert_eq!(open(&config).find_states(&key).unwrap().len(), 2);

    cli::cmd_state_rm(&config, &key_args("bookmark")).unwrap();
    assert_eq!(open(&config).find_state(&key).unwrap(), None);
    cli::cmd_state_get(&config, false, &key_args("bookmark")).unwrap();
}

#[test]
fn test_document_put_commits_every_entry() {
    let dir = tempfile::tempdir().unwrap();
    let config = redb_config(&dir);
    let one = write_json(&dir, "one.json", &serde_json::json!({"n": 1}));
    let two = write_json(&dir, "two.json", &serde_json::json!({"n": 2}));
    let entries = vec![
        format!("one={}", one.display()),
        format!("two={}", two.display()),
    ];

    cli::cmd_document_put(&config, &scope_args(), &entries, "application/json").unwrap();

    let filter = StateDocumentsFilter::for_key(&key_args("one").to_key().unwrap());
    let ids: Vec<_> = open(&config)
        .find_by(&filter)
        .unwrap()
        .into_iter()
        .map(|d| d.key.state_id)
        .collect();
    assert_eq!(ids, vec!["one".to_string(), "two".to_string()]);

    cli::cmd_document_get(&config, false, &key_args("two")).unwrap();
    cli::cmd_document_rm(&config, &key_args("two")).unwrap();
    assert_eq!(open(&config).find("two", &filter).unwrap(), None);
}

#[test]
fn test_document_put_with_missing_file_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = redb_config(&dir);
    let one = write_json(&dir, "one.json", &serde_json::json!({"n": 1}));
    let entries = vec![
        format!("one={}", one.display()),
        format!("two={}", dir.path().join("absent.json").display()),
    ];

    assert!(matches!(
        cli::cmd_document_put(&config, &scope_args(), &entries, "application/json"),
        Err(LrsError::IoError(_))
    ));
    let filter = StateDocumentsFilter::for_key(&key_args("one").to_key().unwrap());
    assert!(open(&config).find_by(&filter).unwrap().is_empty());
}

// =============================================================================
// DERIVED VIEW TESTS
// =============================================================================

#[test]
fn test_activity_and_person_views() {
    let dir = tempfile::tempdir().unwrap();
    let config = redb_config(&dir);
    let file = write_json(&dir, "one.json", &attempted());
    cli::cmd_statement_store(&config, false, &file).unwrap();

    cli::cmd_activity_get(&config, true, LESSON).unwrap();
    assert!(matches!(
        cli::cmd_activity_get(&config, false, "http://example.com/unknown"),
        Err(LrsError::NotFound(_))
    ));
    cli::cmd_person_get(&config, false, LEARNER).unwrap();
    cli::cmd_person_get(&config, true, "openid:http://id.example.com/nobody").unwrap();
}

#[test]
fn test_memory_backend_status() {
    let config = LrsConfig {
        backend: BackendKind::Memory,
        ..LrsConfig::default()
    };
    cli::cmd_init(&config, false).unwrap();
    cli::cmd_status(&config, true).unwrap();
    assert!(!config.database.exists());
}
