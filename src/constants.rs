// =================================================
// Provider identity
// =================================================
pub const PROVIDER_IDENTIFIER: &str = "experimental-ollama";

// =================================================
// Server defaults
// =================================================
pub const DEFAULT_SERVER_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "codellama:7b-code";

// Local models are slow to produce the first token, so both timeouts are
// generous compared to hosted providers.
pub const DEFAULT_TIMEOUT_MS: u64 = 50_000;
pub const FIRST_COMPLETION_TIMEOUT_MS: u64 = 30_000;

// =================================================
// Context size hints
// =================================================
// Prompt evaluation is the bottleneck on local hardware. A long, stable
// prefix is reused from the server's cache across requests, while every
// character after the cursor is re-evaluated on each keystroke.
pub const CONTEXT_TOTAL_CHARS: usize = 0;
pub const CONTEXT_PREFIX_CHARS: usize = 10_000;
pub const CONTEXT_SUFFIX_CHARS: usize = 100;

// =================================================
// Environment overrides
// =================================================
pub const ENV_CONTEXT_SNIPPETS: &str = "OLLAMA_CONTEXT_SNIPPETS";
pub const ENV_HOST: &str = "OLLAMA_HOST";
pub const ENV_MODEL: &str = "OLLAMA_MODEL";
