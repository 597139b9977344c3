mod logging;
mod native_messaging;
mod protocol;

use std::io::{stdin, stdout};

use anyhow::Context;
use serde_json::Value;

use kb_rag::completion::{build_messages, ChatMessage, CompletionProvider};
use kb_rag::config;
use kb_rag::openai::OpenAiClient;
use kb_rag::{KnowledgeBase, MemoryCache, Settings, SnapshotCache, SqliteCache};

struct HostState {
    settings: Settings,
    kb: Option<KnowledgeBase>,
    chat: Option<OpenAiClient>,
}

impl HostState {
    fn new() -> Self {
        Self {
            settings: Settings::default(),
            kb: None,
            chat: None,
        }
    }
}

fn main() {
    if let Err(e) = real_main() {
        // Keep stderr noisy for bug reports; logs also go to file.
        eprintln!("[KB RAG] fatal error: {e:?}");
        log::error!("Fatal error: {:?}", e);
        std::process::exit(1);
    }
}

fn real_main() -> anyhow::Result<()> {
    logging::init_logging()?;

    log::info!("=== KB RAG Host Started ===");

    let mut state = HostState::new();
    let mut in_stream = stdin();
    let mut out_stream = stdout();

    let mut message_count: u64 = 0;
    loop {
        let req = match native_messaging::read_message(&mut in_stream) {
            Ok(Some(r)) => r,
            Ok(None) => {
                log::info!("No more messages after {} messages, exiting", message_count);
                break;
            }
            Err(e) => {
                log::error!("Error reading message: {:?}", e);
                break;
            }
        };

        message_count += 1;
        log::info!(
            "Processing message #{}: {} (id: {})",
            message_count,
            req.method,
            req.id
        );

        let resp = match handle_request(&mut state, &req.method, &req.id, &req.params) {
            Ok(v) => v,
            Err(e) => {
                log::error!("Handler error: {:?}", e);
                protocol::err(&req.id, format!("{e:#}"))
            }
        };
        if let Err(e) = native_messaging::write_json(&mut out_stream, &resp) {
            log::error!("Error sending response: {:?}", e);
            break;
        }
    }

    log::info!("=== KB RAG Host Stopped ===");
    Ok(())
}

fn handle_request(state: &mut HostState, method: &str, msg_id: &str, params: &Value) -> anyhow::Result<Value> {
    match method {
        "hello" => handle_hello(msg_id),
        "init" => handle_init(state, msg_id, params),
        "retrieve" => handle_retrieve(state, msg_id, params),
        "ask" => handle_ask(state, msg_id, params),
        "stats" => handle_stats(state, msg_id),
        "refresh" => handle_refresh(state, msg_id),
        "invalidate" => handle_invalidate(state, msg_id),
        "clear" => handle_clear(state, msg_id),
        _ => Ok(protocol::err(msg_id, format!("Unknown method: {method}"))),
    }
}

fn require_kb(state: &HostState) -> anyhow::Result<&KnowledgeBase> {
    state.kb.as_ref().context("Knowledge base not initialized. Call 'init' first.")
}

fn require_kb_mut(state: &mut HostState) -> anyhow::Result<&mut KnowledgeBase> {
    state.kb.as_mut().context("Knowledge base not initialized. Call 'init' first.")
}

fn handle_hello(msg_id: &str) -> anyhow::Result<Value> {
    protocol::ok(
        msg_id,
        serde_json::json!({
            "type": "hello-response",
            "hostImpl": "rust",
            "hostVersion": config::HOST_VERSION
        }),
    )
}

fn handle_init(state: &mut HostState, msg_id: &str, params: &Value) -> anyhow::Result<Value> {
    let settings = Settings::from_params(params).context("invalid init parameters")?;
    log::info!("Initializing knowledge base from {}", settings.knowledge_dir.display());

    let cache: Box<dyn SnapshotCache> = match &settings.cache_path {
        Some(path) => Box::new(SqliteCache::open(path)?),
        None => Box::new(MemoryCache::new()),
    };
    let client = OpenAiClient::from_env(&settings.base_url);

    // Blocks until every fragment is embedded (or reused from cache).
    let kb = KnowledgeBase::open(&settings, Box::new(client.clone()), cache)?;
    let stats = kb.stats();
    log::info!(
        "Knowledge base ready: {} fragments ({} embedded, {} absent)",
        stats.fragments,
        stats.embedded,
        stats.absent
    );

    state.settings = settings;
    state.kb = Some(kb);
    state.chat = Some(client);

    protocol::ok(msg_id, serde_json::json!({ "ok": true, "stats": stats }))
}

fn handle_retrieve(state: &mut HostState, msg_id: &str, params: &Value) -> anyhow::Result<Value> {
    let q = params.get("q").and_then(|v| v.as_str()).context("Missing required parameters: q")?;
    let top_k = match params.get("topK") {
        None | Some(Value::Null) => state.settings.top_k,
        Some(v) => v
            .as_u64()
            .and_then(|k| usize::try_from(k).ok())
            .with_context(|| format!("topK must be a non-negative integer, got {v}"))?,
    };

    let kb = require_kb(state)?;
    let ctx = kb.retrieve_top(q, top_k)?;
    protocol::ok(msg_id, ctx)
}

fn handle_ask(state: &mut HostState, msg_id: &str, params: &Value) -> anyhow::Result<Value> {
    let q = params.get("q").and_then(|v| v.as_str()).context("Missing required parameters: q")?;
    let history: Vec<ChatMessage> = match params.get("history") {
        Some(v) if !v.is_null() => serde_json::from_value(v.clone()).context("history must be a list of {role, content}")?,
        _ => Vec::new(),
    };

    let kb = require_kb(state)?;
    let chat = state.chat.as_ref().context("Completion client not initialized. Call 'init' first.")?;

    let ctx = kb.retrieve(q)?;
    let messages = build_messages(&state.settings.context_preamble, &ctx, &history, q);
    let answer = chat.complete(&state.settings.completion_model, &messages)?;

    protocol::ok(
        msg_id,
        serde_json::json!({
            "answer": answer,
            "model": state.settings.completion_model,
            "context": ctx
        }),
    )
}

fn handle_stats(state: &mut HostState, msg_id: &str) -> anyhow::Result<Value> {
    let kb = require_kb(state)?;
    protocol::ok(msg_id, kb.stats())
}

fn handle_refresh(state: &mut HostState, msg_id: &str) -> anyhow::Result<Value> {
    let kb = require_kb_mut(state)?;
    let changed = kb.refresh()?;
    protocol::ok(msg_id, serde_json::json!({ "ok": true, "changed": changed, "stats": kb.stats() }))
}

fn handle_invalidate(state: &mut HostState, msg_id: &str) -> anyhow::Result<Value> {
    let kb = require_kb_mut(state)?;
    let removed = kb.invalidate()?;
    protocol::ok(msg_id, serde_json::json!({ "ok": true, "removed": removed }))
}

fn handle_clear(state: &mut HostState, msg_id: &str) -> anyhow::Result<Value> {
    let kb = require_kb_mut(state)?;
    kb.clear_cache()?;
    protocol::ok(msg_id, serde_json::json!({ "ok": true }))
}
