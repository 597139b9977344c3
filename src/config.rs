// IMPORTANT:
// Keep ALL numeric values centralized here (repo rule: no hardcoded numeric values scattered around).

// NOTE: HOST_VERSION must stay in sync with the `version` field in Cargo.toml.
pub const HOST_VERSION: &str = "0.1.0";

/// Snapshot cache schema version: bump when the on-disk cache layout or the
/// content-key derivation changes (old rows then become unreachable).
pub const CACHE_SCHEMA_VERSION: u32 = 2;

pub mod logging {
    pub const LOG_DIR_REL: &str = ".kb-rag/logs";
    // Overrides LOG_DIR_REL when set.
    pub const LOG_DIR_ENV: &str = "KB_RAG_LOG_DIR";
    pub const LOG_FILE_NAME: &str = "kb_rag_host.log";

    pub const LOG_ROTATE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
    pub const LOG_ROTATE_KEEP_FILES: usize = 5;

    // Longest fragment/query prefix echoed into log lines.
    pub const LOG_TEXT_PREVIEW_CHARS: usize = 80;
}

pub mod native_messaging {
    pub const MAX_MESSAGE_SIZE_BYTES: u32 = 16 * 1024 * 1024;
}

pub mod corpus {
    pub const DEFAULT_KNOWLEDGE_DIR: &str = "knowledge";

    // Compared case-insensitively against the file extension.
    pub const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

    pub const FRAGMENT_SEPARATOR: &str = "\n\n";
}

pub mod embedding {
    pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

    // Fragments whose trimmed length (chars) is at or below this are never embedded.
    pub const MIN_FRAGMENT_CHARS: usize = 20;

    pub const CACHE_FILE_NAME: &str = "snapshots.db";
}

pub mod retrieval {
    pub const DEFAULT_TOP_K: usize = 3;

    // Lower than any valid cosine value; assigned to fragments without an embedding.
    pub const ABSENT_SCORE: f32 = -1.0;

    pub const CONTEXT_SEPARATOR: &str = "\n\n";
}

pub mod completion {
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

    pub const DEFAULT_CONTEXT_PREAMBLE: &str = "Reference material from the knowledge base:";
}

pub mod http {
    pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
    pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

    pub const REQUEST_TIMEOUT_SECS: u64 = 60;
}

pub mod sqlite {
    pub const PRAGMA_BUSY_TIMEOUT_MS: i64 = 2000;
}
