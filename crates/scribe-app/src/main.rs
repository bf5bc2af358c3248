//! Scribe application binary - composition root.
//!
//! 1. Load configuration from TOML and apply CLI overrides
//! 2. Load the corpus into the document store
//! 3. Wire the answering and embedding services into the synthesizer
//! 4. Run an interactive text session on stdin/stdout
//!
//! The binary has no audio devices, so spoken playback reports itself
//! unavailable when enabled.

mod cli;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use scribe_chat::{
    ChatError, DynAnsweringService, MockAnsweringService, OpenAiAnsweringService,
    ResponseSynthesizer, TurnController,
};
use scribe_core::config::{RetrievalStrategy, ScribeConfig};
use scribe_core::events::{EventBus, SessionEvent};
use scribe_core::types::{ConversationMode, DocumentChunk, Role};
use scribe_retrieval::{DocumentStore, DynEmbeddingService, OpenAiEmbeddingService, Retriever};
use scribe_speech::{InMemoryPreference, PlaybackPreference, SpeechPlayback};
use tokio::io::{AsyncBufReadExt, BufReader};

use cli::CliArgs;

const HELP: &str = "Commands:
  /mode study|quiz   start a new session in another mode
  /advanced on|off   answer with embedding retrieval
  /speak on|off      read replies aloud
  /history           show the transcript
  /quit              leave the session";

/// Corpus used when no corpus file is configured.
fn admin_corpus() -> Vec<DocumentChunk> {
    vec![
        DocumentChunk::new(
            "admin-welcome-0",
            "Welcome to the vocal knowledge scribe. This knowledge base is curated by the administrator.",
            "admin-welcome.txt",
            0,
        ),
        DocumentChunk::new(
            "admin-info-1",
            "You can ask questions about the provided documents, but uploading new documents has been disabled for regular users.",
            "admin-info.txt",
            0,
        ),
    ]
}

fn load_store(path: Option<&Path>) -> Result<DocumentStore, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            let store = DocumentStore::from_json(&json)?;
            tracing::info!(path = %path.display(), chunks = store.count(), "Corpus loaded");
            Ok(store)
        }
        None => {
            tracing::info!("No corpus file configured, using the administrator corpus");
            Ok(DocumentStore::load(admin_corpus())?)
        }
    }
}

fn answering_service(config: &ScribeConfig) -> Arc<dyn DynAnsweringService> {
    match OpenAiAnsweringService::from_env(&config.answering) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            tracing::warn!(error = %e, "Answering service unavailable, replies will quote retrieved context");
            Arc::new(MockAnsweringService::echoing())
        }
    }
}

fn embedding_service(config: &ScribeConfig) -> Option<Arc<dyn DynEmbeddingService>> {
    match OpenAiEmbeddingService::from_env(&config.embedding) {
        Ok(service) => Some(Arc::new(service)),
        Err(e) => {
            tracing::info!(error = %e, "Embedding service not configured");
            None
        }
    }
}

/// Print notifications as they arrive.
fn spawn_notice_printer(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(SessionEvent::Notification { notice }) => println!("! {}", notice.message),
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Notice printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn parse_switch(arg: &str) -> Option<bool> {
    match arg.trim() {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

/// Handle one slash command. Returns `false` when the session should end.
async fn run_command(
    line: &str,
    controller: &TurnController,
    embedder: Option<&Arc<dyn DynEmbeddingService>>,
) -> bool {
    let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "/quit" | "/exit" => return false,
        "/help" => println!("{HELP}"),
        "/history" => {
            for turn in controller.transcript() {
                let who = match turn.role {
                    Role::User => "you",
                    Role::Assistant => "scribe",
                };
                println!("[{}] {}: {}", turn.created_at.format("%H:%M:%S"), who, turn.text);
            }
        }
        "/mode" => match arg.parse::<ConversationMode>() {
            Ok(mode) => match controller.set_mode(mode) {
                Ok(()) => println!("{}", controller.welcome_message()),
                Err(e) => println!("{e}"),
            },
            Err(e) => println!("{e}"),
        },
        "/advanced" => match parse_switch(arg) {
            Some(true) => {
                let synthesizer = controller.synthesizer();
                if !synthesizer.is_advanced_ready() {
                    match embedder {
                        Some(embedder) => {
                            if let Err(e) = synthesizer.initialize_embeddings(embedder.clone()).await {
                                tracing::warn!(error = %e, "Advanced retrieval initialization failed");
                                println!("Advanced retrieval could not be initialized.");
                            }
                        }
                        None => println!("No embedding service is configured."),
                    }
                }
                controller.set_use_advanced(true);
                println!("{}", controller.welcome_message());
            }
            Some(false) => {
                controller.set_use_advanced(false);
                println!("Advanced retrieval off.");
            }
            None => println!("Usage: /advanced on|off"),
        },
        "/speak" => match parse_switch(arg) {
            Some(enabled) => controller.preference().set_speak_replies(enabled),
            None => println!("Usage: /speak on|off"),
        },
        _ => println!("Unknown command. {HELP}"),
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config is read before tracing so its log level can seed the filter.
    let config_file = args.resolve_config_path();
    let loaded = ScribeConfig::load(&config_file);
    let mut config = loaded.as_ref().cloned().unwrap_or_default();

    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .init();

    tracing::info!("Starting Scribe v{}", env!("CARGO_PKG_VERSION"));
    match &loaded {
        Ok(_) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Err(e) => tracing::warn!(path = %config_file.display(), error = %e, "Using default configuration"),
    }

    config.conversation.mode = args.resolve_mode(config.conversation.mode);
    if args.advanced {
        config.retrieval.strategy = RetrievalStrategy::Embedding;
        config.conversation.use_advanced = true;
    }

    // Corpus.
    let corpus_path = args.resolve_corpus_path(config.general.corpus_path.as_deref());
    let store = Arc::new(load_store(corpus_path.as_deref())?);

    // Services.
    let answering = answering_service(&config);
    let embedder = match config.retrieval.strategy {
        RetrievalStrategy::Embedding => embedding_service(&config),
        RetrievalStrategy::Lexical => None,
    };

    let mut synthesizer = ResponseSynthesizer::new(store.clone(), answering, &config);
    let retriever = Retriever::from_config(&config.retrieval, store, embedder.clone()).await;
    tracing::info!(strategy = ?retriever.strategy(), "Retriever ready");
    if let Retriever::Embedding(retriever) = retriever {
        synthesizer = synthesizer.with_embedding(retriever);
    }

    // Session.
    let events = EventBus::default();
    spawn_notice_printer(&events);
    let playback = Arc::new(SpeechPlayback::unavailable(config.playback.clone()).with_events(events.clone()));
    let controller = TurnController::builder(Arc::new(synthesizer), &config)
        .events(events)
        .playback(
            playback,
            Arc::new(InMemoryPreference::new(config.playback.speak_replies)),
        )
        .build();

    println!("{}", controller.welcome_message());
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('/') {
            if !run_command(line, &controller, embedder.as_ref()).await {
                break;
            }
            continue;
        }

        match controller.ask_text(line).await {
            Ok(reply) => println!("{}", reply.text),
            // Already surfaced through the notice printer.
            Err(ChatError::Engine(e)) => tracing::debug!(error = %e, "Turn failed"),
            Err(e) => println!("{e}"),
        }
    }

    tracing::info!(turns = controller.transcript().len(), "Session ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_corpus_is_loadable() {
        let store = load_store(None).unwrap();
        assert_eq!(store.count(), 2);
        assert!(store.get("admin-welcome-0").is_some());
        assert!(store.get("admin-info-1").is_some());
    }

    #[test]
    fn test_corpus_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        let json = r#"[{"id":"bio-0","content":"ATP stores energy.","metadata":{"source_name":"bio.txt","chunk_index":0}}]"#;
        std::fs::write(&path, json).unwrap();

        let store = load_store(Some(&path)).unwrap();
        assert_eq!(store.count(), 1);
        assert_eq!(store.all()[0].metadata.source_name, "bio.txt");
    }

    #[test]
    fn test_duplicate_corpus_ids_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        let json = r#"[
            {"id":"a","content":"x","metadata":{"source_name":"s","chunk_index":0}},
            {"id":"a","content":"y","metadata":{"source_name":"s","chunk_index":1}}
        ]"#;
        std::fs::write(&path, json).unwrap();
        assert!(load_store(Some(&path)).is_err());
    }

    #[test]
    fn test_parse_switch() {
        assert_eq!(parse_switch("on"), Some(true));
        assert_eq!(parse_switch(" off"), Some(false));
        assert_eq!(parse_switch("maybe"), None);
    }

    #[tokio::test]
    async fn test_commands_update_controller() {
        let config = ScribeConfig::default();
        let store = Arc::new(load_store(None).unwrap());
        let synthesizer = Arc::new(ResponseSynthesizer::new(
            store,
            Arc::new(MockAnsweringService::replying("ok")),
            &config,
        ));
        let controller = TurnController::new(synthesizer, &config);

        controller.ask_text("hello").await.unwrap();
        assert!(run_command("/mode quiz", &controller, None).await);
        assert_eq!(controller.mode(), ConversationMode::Quiz);
        assert!(controller.transcript().is_empty());
        assert!(run_command("/advanced on", &controller, None).await);
        assert!(controller.use_advanced());
        assert!(run_command("/speak on", &controller, None).await);
        assert!(controller.preference().speak_replies());
        assert!(!run_command("/quit", &controller, None).await);
    }
}
