use super::network::OllamaOptions;
use super::prompt::PromptContext;

/// Model-family specific prompt formatting.
///
/// The server is asked to echo the prompt verbatim (see
/// [`PROMPT_TEMPLATE`](super::request::PROMPT_TEMPLATE)), so every infill
/// marker has to be rendered here.
pub trait ModelHelper: Send + Sync {
    fn name(&self) -> &'static str;

    /// Renders the full prompt string.
    fn prompt(&self, ctx: &PromptContext) -> String;

    /// Model specific stop tokens, appended after the line based ones.
    fn stop_sequences(&self) -> &'static [&'static str] {
        &[]
    }

    /// Default sampling options.
    ///
    /// Single-line completions stop at the first newline, multiline ones at
    /// the first blank line.
    fn request_options(&self, multiline: bool) -> OllamaOptions {
        let line_stop = if multiline { "\n\n" } else { "\n" };
        let stop = std::iter::once(line_stop)
            .chain(self.stop_sequences().iter().copied())
            .map(String::from)
            .collect();

        OllamaOptions {
            stop: Some(stop),
            temperature: Some(0.2),
            top_k: Some(-1),
            top_p: Some(-1.0),
            num_predict: Some(256),
            ..Default::default()
        }
    }
}

/// Snippets block followed by a blank line, or nothing.
fn context_block(ctx: &PromptContext) -> String {
    let snippets = ctx.serialized_snippets();
    if snippets.is_empty() {
        snippets
    } else {
        snippets + "\n\n"
    }
}

/// `{context}{file header}{prefix}`
fn linear_prompt(ctx: &PromptContext) -> String {
    format!(
        "{}{}{}",
        context_block(ctx),
        ctx.current_file_name_comment,
        ctx.prefix
    )
}

pub struct DefaultModel;

impl ModelHelper for DefaultModel {
    fn name(&self) -> &'static str {
        "default"
    }

    fn prompt(&self, ctx: &PromptContext) -> String {
        linear_prompt(ctx)
    }
}

pub struct CodeLlama;

impl ModelHelper for CodeLlama {
    fn name(&self) -> &'static str {
        "codellama"
    }

    fn prompt(&self, ctx: &PromptContext) -> String {
        if ctx.is_infill {
            format!(
                "<PRE> {}{}{} <SUF>{} <MID>",
                context_block(ctx),
                ctx.current_file_name_comment,
                ctx.prefix,
                ctx.suffix
            )
        } else {
            linear_prompt(ctx)
        }
    }

    fn stop_sequences(&self) -> &'static [&'static str] {
        &["<PRE>", "<SUF>", "<MID>", "<EOT>"]
    }
}

pub struct DeepseekCoder;

impl ModelHelper for DeepseekCoder {
    fn name(&self) -> &'static str {
        "deepseek-coder"
    }

    fn prompt(&self, ctx: &PromptContext) -> String {
        if ctx.is_infill {
            format!(
                "<｜fim▁begin｜>{}{}{}<｜fim▁hole｜>{}<｜fim▁end｜>",
                context_block(ctx),
                ctx.current_file_name_comment,
                ctx.prefix,
                ctx.suffix
            )
        } else {
            linear_prompt(ctx)
        }
    }

    fn stop_sequences(&self) -> &'static [&'static str] {
        &[
            "<｜fim▁begin｜>",
            "<｜fim▁hole｜>",
            "<｜fim▁end｜>",
            "<|eos_token|>",
        ]
    }
}

pub struct StarCoder;

impl ModelHelper for StarCoder {
    fn name(&self) -> &'static str {
        "starcoder"
    }

    fn prompt(&self, ctx: &PromptContext) -> String {
        if ctx.is_infill {
            format!(
                "<fim_prefix>{}{}{}<fim_suffix>{}<fim_middle>",
                context_block(ctx),
                ctx.current_file_name_comment,
                ctx.prefix,
                ctx.suffix
            )
        } else {
            linear_prompt(ctx)
        }
    }

    fn stop_sequences(&self) -> &'static [&'static str] {
        &[
            "<fim_prefix>",
            "<fim_suffix>",
            "<fim_middle>",
            "<|endoftext|>",
            "<file_sep>",
        ]
    }
}

/// Picks the helper for an Ollama model tag such as `codellama:7b-code`.
pub fn helper_for_model(model: &str) -> Box<dyn ModelHelper> {
    let family = model.split(':').next().unwrap_or_default().to_lowercase();

    if family.starts_with("codellama") {
        Box::new(CodeLlama)
    } else if family.starts_with("deepseek-coder") {
        Box::new(DeepseekCoder)
    } else if family.starts_with("starcoder") || family.starts_with("stable-code") {
        Box::new(StarCoder)
    } else {
        Box::new(DefaultModel)
    }
}
