//! rag-chat: one-shot terminal client for the RAG chat backend.
//! Reads config, submits the question from argv or stdin as a new
//! conversation, prints the streamed answer, then sources and citations.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use rag_chat_client::config;
use rag_chat_client::{ApiClient, QuerySessionManager, StreamHandlers};

fn resolve_config_path() -> PathBuf {
    // 1. --config <path> flag
    let args: Vec<String> = std::env::args().collect();
    if let Some(pos) = args.iter().position(|a| a == "--config") {
        if let Some(path) = args.get(pos + 1) {
            return PathBuf::from(path);
        }
    }
    // 2. RAG_CHAT_CONFIG env var
    if let Ok(val) = std::env::var("RAG_CHAT_CONFIG") {
        return PathBuf::from(val);
    }
    // 3. Default path (~/.rag-chat/config.yaml)
    config::default_config_path().unwrap_or_else(|| {
        eprintln!("Error: unable to determine config path (set --config or RAG_CHAT_CONFIG)");
        process::exit(1);
    })
}

/// First positional argument that is not the --config flag or its value.
fn question_from_args() -> Option<String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--config" {
            skip_next = true;
            continue;
        }
        if !arg.starts_with("--") {
            return Some(arg);
        }
    }
    None
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config_path = resolve_config_path();
    let cfg = match config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "Error: failed to load config from {}: {}",
                config_path.display(),
                e
            );
            process::exit(1);
        }
    };

    // Question from argv, falling back to the first non-empty stdin line.
    let question = question_from_args().unwrap_or_else(|| {
        let stdin = io::stdin();
        let mut line = String::new();
        stdin.lock().read_line(&mut line).unwrap_or(0);
        line.trim().to_string()
    });

    if question.is_empty() {
        eprintln!("Error: no question provided");
        process::exit(1);
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to create runtime: {}", e);
            process::exit(1);
        });

    rt.block_on(async {
        let api = ApiClient::new(&cfg.api_base_url());
        let timeout = Duration::from_millis(cfg.stream.timeout_ms.unwrap_or(0));
        // One-shot process: title generation is requested inline below
        // instead of through the manager's background task.
        let manager = QuerySessionManager::new(api, &cfg.stream_url())
            .with_stream_timeout(timeout)
            .with_auto_title(false, Duration::ZERO);

        let session_id = manager.start_conversation();

        // Fallback answers are synthesized without TOKEN frames; remember
        // whether anything was streamed so they still get printed.
        let streamed = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let streamed_flag = streamed.clone();
        let mut handlers = StreamHandlers::new();
        handlers.on_token = Some(Box::new(move |token: &str| {
            streamed_flag.store(true, std::sync::atomic::Ordering::SeqCst);
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let _ = write!(out, "{}", token);
            let _ = out.flush();
        }));

        let result = match manager.submit(&session_id, &question, handlers).await {
            Ok(result) => result,
            Err(e) => {
                eprintln!("Error: query failed: {}", e);
                process::exit(1);
            }
        };

        let stdout = io::stdout();
        let mut out = stdout.lock();
        if streamed.load(std::sync::atomic::Ordering::SeqCst) {
            // Newline after the streamed answer.
            let _ = writeln!(out);
        } else {
            let _ = writeln!(out, "{}", result.answer);
        }

        if !result.chunks.is_empty() {
            let _ = writeln!(out, "\nSources:");
            for chunk in &result.chunks {
                let _ = writeln!(out, "  {} (score {:.2})", chunk.document, chunk.score);
            }
        }
        if !result.citations.is_empty() {
            let _ = writeln!(out, "\nCitations:");
            for citation in &result.citations {
                let _ = writeln!(
                    out,
                    "  [{}] {} (score {:.2})",
                    citation.chunk_index, citation.doc_title, citation.relevance_score
                );
            }
        }
        drop(out);

        if cfg.title.auto {
            // First (and only) turn of this session; give the backend a
            // moment to persist it before asking for a title.
            let delay = Duration::from_millis(cfg.title.delay_ms.unwrap_or(3000));
            tokio::time::sleep(delay).await;
            if let Err(e) = manager.api().generate_title(&session_id).await {
                tracing::warn!(error = %e, "title generation failed");
            }
        }
    });
}
