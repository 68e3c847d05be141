use acr::auth::{AuthFailure, AuthSession, FirebaseAuth};
use acr::config::{Config, ConfigError};
use acr::format::{format_date, format_duration};
use acr::processing::{AcrClient, AcrError, ProcessingProgress};
use acr::recordings::{
    CachedRepository, FirestoreRepository, ObjectStoreManager, RecordRepository, Recording,
    RepositoryError, StorageError,
};
use std::env;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

const DEFAULT_LIMIT: usize = 20;

#[derive(Error, Debug)]
enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Sign-in failed: {0}")]
    Auth(#[from] AuthFailure),
    #[error("{0}")]
    Repository(#[from] RepositoryError),
    #[error("Object store error: {0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Acr(#[from] AcrError),
    #[error("Recording {0} not found")]
    NotFound(String),
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    fn user_message(&self) -> String {
        match self {
            CliError::Auth(e) => e.user_message().to_string(),
            CliError::Repository(e) => e.user_message().to_string(),
            CliError::Acr(e) => e.user_message().to_string(),
            other => other.to_string(),
        }
    }
}

enum Command {
    List { limit: usize },
    Show { id: String },
    Search { term: String, limit: usize },
    ProcessAll,
    Poll { token: Option<String> },
}

fn parse_limit(raw: Option<&String>) -> Result<usize, CliError> {
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|_| CliError::Usage(format!("Invalid limit: {}", raw))),
        None => Ok(DEFAULT_LIMIT),
    }
}

fn parse_command(args: &[String]) -> Result<Command, CliError> {
    let missing = |what: &str| CliError::Usage(format!("Missing {}", what));
    match args.get(1).map(String::as_str) {
        Some("list") => Ok(Command::List {
            limit: parse_limit(args.get(2))?,
        }),
        Some("show") => Ok(Command::Show {
            id: args.get(2).cloned().ok_or_else(|| missing("recording id"))?,
        }),
        Some("search") => Ok(Command::Search {
            term: args.get(2).cloned().ok_or_else(|| missing("search term"))?,
            limit: parse_limit(args.get(3))?,
        }),
        Some("process-all") => Ok(Command::ProcessAll),
        Some("poll") => Ok(Command::Poll {
            token: args.get(2).cloned(),
        }),
        Some(other) => Err(CliError::Usage(format!("Unknown command: {}", other))),
        None => Err(missing("command")),
    }
}

/// Signs in anonymously when an API key is configured, so document reads
/// carry an ID token
async fn connect(config: &Config) -> Result<CachedRepository, CliError> {
    let project_id = config.require_project_id()?;

    let id_token = match &config.firebase.api_key {
        Some(api_key) => {
            let session = AuthSession::new(Arc::new(FirebaseAuth::new(api_key.clone())));
            session.sign_in_anonymously().await?;
            session.id_token()
        }
        None => None,
    };

    let object_store = match (&config.s3, &config.firebase.storage_bucket) {
        (Some(s3), _) => Some(ObjectStoreManager::s3(s3.clone()).await?),
        (None, Some(bucket)) => Some(ObjectStoreManager::firebase(
            bucket.clone(),
            id_token.clone(),
        )),
        (None, None) => None,
    };

    let mut repository = FirestoreRepository::new(project_id).with_id_token(id_token);
    if let Some(store) = object_store {
        repository = repository.with_object_store(store);
    }
    Ok(CachedRepository::new(Arc::new(repository)))
}

fn print_row(recording: &Recording) {
    println!(
        "{}\t{}\t{}\t{}\t{}",
        recording.id,
        recording.phone_number,
        format_date(&recording.recorded_at),
        format_duration(recording.duration),
        recording.status.label()
    );
}

fn print_recording(recording: &Recording) {
    println!("ID:       {}", recording.id);
    println!("電話番号: {}", recording.phone_number);
    println!("録音日時: {}", format_date(&recording.recorded_at));
    println!("長さ:     {}", format_duration(recording.duration));
    println!("状態:     {}", recording.status.label());
    println!("ファイル: {}", recording.file_name);
    println!(
        "音声:     {}",
        recording.audio_url.as_deref().unwrap_or("音声ファイルがありません")
    );
    println!();
    println!("文字起こし:");
    println!(
        "{}",
        recording.transcript.as_deref().unwrap_or("文字起こしがありません")
    );
    println!();
    println!("要約:");
    println!("{}", recording.summary.as_deref().unwrap_or("要約がありません"));
}

async fn run(command: Command, config: Config) -> Result<(), CliError> {
    match command {
        Command::List { limit } => {
            let repository = connect(&config).await?;
            let recordings = repository.list_recent(limit).await?;
            if recordings.is_empty() {
                println!("録音データがありません");
            }
            recordings.iter().for_each(print_row);
        }
        Command::Show { id } => {
            let repository = connect(&config).await?;
            let recording = repository
                .get_by_id(&id)
                .await?
                .ok_or(CliError::NotFound(id))?;
            print_recording(&recording);
        }
        Command::Search { term, limit } => {
            let repository = connect(&config).await?;
            let recordings = repository.search_by_phone_prefix(&term, limit).await?;
            if recordings.is_empty() {
                println!("検索結果が見つかりませんでした");
            }
            recordings.iter().for_each(print_row);
        }
        Command::ProcessAll => {
            let client = AcrClient::new(&config.api_base_url, config.request_timeout);
            let progress = ProcessingProgress::from(client.process_all().await?);
            println!(
                "処理開始: {}/{}件 ({}%)",
                progress.processed,
                progress.to_process,
                progress.percent()
            );
        }
        Command::Poll { token } => {
            let client = AcrClient::new(&config.api_base_url, config.request_timeout);
            let response = client.poll(token.as_deref()).await?;
            println!("{}件の録音データを更新しました", response.polled);
            if let Some(token) = response.start_page_token {
                println!("startPageToken: {}", token);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Use RUST_LOG env var if set, otherwise default to info level
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("acr");

    let command = match parse_command(&args) {
        Ok(command) => command,
        Err(e) => {
            error!("{}", e);
            print_usage(program);
            std::process::exit(1);
        }
    };

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Using processing API at {}", config.api_base_url);

    if let Err(e) = run(command, config).await {
        error!("{}", e);
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

fn print_usage(program_name: &str) {
    eprintln!("Usage:");
    eprintln!("  {} list [limit]", program_name);
    eprintln!("  {} show <id>", program_name);
    eprintln!("  {} search <phone-prefix> [limit]", program_name);
    eprintln!("  {} process-all", program_name);
    eprintln!("  {} poll [start-page-token]", program_name);
}
