use anyhow::{anyhow, bail};
use clap::Parser;
use futures::StreamExt;
use rust_i18n::t;
use std::path::{Path, PathBuf};

use ollama_complete_lib::logger::setup_logger;
use ollama_complete_lib::{
    CancelReason, CancelScope, CompletionConfig, ContextSnippet,
    DocumentContext, LocalCompletionProvider, ProviderConfig,
};

rust_i18n::i18n!("i18n", fallback = "en");

/// Requests code completions for a cursor position from a local Ollama server
/// and prints every snapshot of the completion slots as a JSON line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file (serverEndpoint, model, parameters, timeoutMs, ...)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source file to complete
    #[arg(long)]
    file: PathBuf,

    /// Cursor byte offset in the file. Defaults to the end of the file.
    #[arg(long)]
    cursor: Option<usize>,

    /// Language id of the file. Guessed from the extension when omitted.
    #[arg(long)]
    language: Option<String>,

    /// Related file included as prompt context, most relevant first
    #[arg(long = "snippet")]
    snippets: Vec<PathBuf>,

    /// Number of completions to request. Defaults to one, as the editor
    /// host schedules this provider.
    #[arg(short = 'n')]
    n: Option<usize>,

    /// Per-completion timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Complete a whole block instead of a single line
    #[arg(long)]
    multiline: bool,

    /// Also write info logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Show debug logs on stderr
    #[arg(long)]
    verbose: bool,
}

fn language_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or_default() {
        "rs" => "rust",
        "py" => "python",
        "ts" => "typescript",
        "tsx" => "typescriptreact",
        "js" => "javascript",
        "jsx" => "javascriptreact",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cc" | "cpp" | "hpp" => "cpp",
        "rb" => "ruby",
        "sh" => "shellscript",
        "lua" => "lua",
        _ => "plaintext",
    }
}

fn read_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        anyhow!(t!(
            "main.failed_to_read_file",
            path = path.display().to_string(),
            error = e.to_string()
        )
        .to_string())
    })
}

fn document_uri(path: &Path) -> String {
    std::fs::canonicalize(path)
        .ok()
        .and_then(|abs| url::Url::from_file_path(abs).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logger(args.log_file.as_deref(), args.verbose)?;

    let mut config = CompletionConfig::load(args.config.as_deref())?;
    if let Some(timeout_ms) = args.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    config.multiline |= args.multiline;

    let text = read_file(&args.file)?;
    let cursor = args.cursor.unwrap_or(text.len());
    if cursor > text.len() {
        bail!(t!(
            "main.cursor_out_of_range",
            cursor = cursor.to_string(),
            path = args.file.display().to_string(),
            len = text.len().to_string()
        )
        .to_string());
    }

    let language = args
        .language
        .clone()
        .unwrap_or_else(|| language_for(&args.file).to_string());
    let provider_config = ProviderConfig::create(&config);
    let hints = provider_config.context_size_hints;
    let document = DocumentContext::from_text(
        document_uri(&args.file),
        language,
        &text,
        cursor,
        hints.prefix_chars,
        hints.suffix_chars,
    );

    let mut snippets = Vec::with_capacity(args.snippets.len());
    for path in &args.snippets {
        snippets.push(ContextSnippet {
            identifier: path.display().to_string(),
            uri: document_uri(path),
            content: read_file(path)?,
        });
    }

    let provider = LocalCompletionProvider::from_config(&config)?;
    let scope = CancelScope::new();

    let interrupt = scope.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, cancelling completions");
            interrupt.cancel(CancelReason::Caller);
        }
    });

    let mut params = provider_config.completion_params(document, config.multiline);
    if let Some(n) = args.n {
        params.n = n;
    }
    let mut snapshots = provider.generate_completions(params, &snippets, &scope);

    while let Some(snapshot) = snapshots.next().await {
        println!("{}", serde_json::to_string(&snapshot)?);
        if snapshot.iter().all(|slot| slot.state().is_terminal()) {
            for slot in &snapshot {
                if let Some(error) = slot.state().error() {
                    log::warn!("Completion {} did not finish: {}", slot.index, error);
                }
            }
        }
    }

    Ok(())
}
