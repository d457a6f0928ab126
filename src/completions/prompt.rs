use phf::phf_map;
use serde::{Deserialize, Serialize};
use url::Url;

use super::model::ModelHelper;

/// Upper bound for the serialized prompt when context snippets are enabled.
pub const MAX_PROMPT_CHARS: usize = 1234;

/// Line comment token used when the language is unknown.
pub const DEFAULT_COMMENT_START: &str = "//";

/// Line comment tokens keyed by editor language identifier.
static COMMENT_STARTS: phf::Map<&'static str, &'static str> = phf_map! {
    "c" => "//",
    "cpp" => "//",
    "csharp" => "//",
    "dart" => "//",
    "go" => "//",
    "java" => "//",
    "javascript" => "//",
    "javascriptreact" => "//",
    "kotlin" => "//",
    "php" => "//",
    "rust" => "//",
    "scala" => "//",
    "swift" => "//",
    "typescript" => "//",
    "typescriptreact" => "//",
    "zig" => "//",
    "dockerfile" => "#",
    "elixir" => "#",
    "makefile" => "#",
    "perl" => "#",
    "powershell" => "#",
    "python" => "#",
    "r" => "#",
    "ruby" => "#",
    "shellscript" => "#",
    "toml" => "#",
    "yaml" => "#",
    "elm" => "--",
    "haskell" => "--",
    "lua" => "--",
    "sql" => "--",
    "clojure" => ";;",
    "lisp" => ";;",
    "erlang" => "%",
    "latex" => "%",
    "matlab" => "%",
    "vb" => "'",
};

/// Returns the line comment token for `language_id`.
pub fn comment_start(language_id: &str) -> &'static str {
    COMMENT_STARTS
        .get(language_id)
        .copied()
        .unwrap_or(DEFAULT_COMMENT_START)
}

/// Turns a document identifier into a path for display. `file://` URIs are
/// reduced to their path, anything else is shown as given.
pub fn display_path(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| url.path().to_string()),
        _ => uri.to_string(),
    }
}

/// `"{comment} Path: {path}\n"`
pub fn file_name_line(uri: &str, comment: &str) -> String {
    format!("{} Path: {}\n", comment, display_path(uri))
}

/// Keeps the suffix up to and including its first newline.
pub fn suffix_through_first_newline(suffix: &str) -> &str {
    match suffix.find('\n') {
        Some(pos) => &suffix[..=pos],
        None => suffix,
    }
}

/// A bounded excerpt of related source supplied as extra prompt context.
/// Relevance is implied by position: most relevant first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnippet {
    pub identifier: String,
    pub uri: String,
    pub content: String,
}

/// Raw document text around the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentContext {
    pub uri: String,
    pub language_id: String,
    pub prefix: String,
    pub suffix: String,
}

impl DocumentContext {
    /// Splits `text` at the byte offset `cursor`, keeping at most
    /// `prefix_chars` characters before it and `suffix_chars` after it.
    ///
    /// Offsets that fall inside a UTF-8 sequence are moved back to the
    /// previous character boundary.
    pub fn from_text(
        uri: impl Into<String>,
        language_id: impl Into<String>,
        text: &str,
        cursor: usize,
        prefix_chars: usize,
        suffix_chars: usize,
    ) -> Self {
        let mut cursor = cursor.min(text.len());
        while !text.is_char_boundary(cursor) {
            cursor -= 1;
        }
        let (before, after) = text.split_at(cursor);

        let skip = before.chars().count().saturating_sub(prefix_chars);
        let prefix: String = before.chars().skip(skip).collect();
        let suffix: String = after.chars().take(suffix_chars).collect();

        Self {
            uri: uri.into(),
            language_id: language_id.into(),
            prefix,
            suffix,
        }
    }

    /// Infill is used only when there is something after the cursor.
    pub fn wants_infill(&self) -> bool {
        !self.suffix.trim().is_empty()
    }

    /// Indentation of the line that opens the block being completed: the
    /// last prefix line with any non-whitespace text, the cursor line
    /// included. `None` when the prefix is blank.
    pub fn block_indent(&self) -> Option<usize> {
        self.prefix
            .rsplit('\n')
            .find(|line| !line.trim().is_empty())
            .map(|line| line.chars().take_while(|c| *c == ' ' || *c == '\t').count())
    }
}

/// Everything a model helper needs to render a prompt. Built once per
/// generation call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub uri: String,
    pub language_id: String,
    pub prefix: String,
    /// Suffix truncated after its first newline.
    pub suffix: String,
    /// Snippets that made it into the prompt, in input order.
    pub snippets: Vec<ContextSnippet>,
    pub current_file_name_comment: String,
    pub is_infill: bool,
    comment: &'static str,
}

impl PromptContext {
    /// Used snippets serialized as commented blocks, each headed by its file
    /// path, separated by a blank line.
    pub fn serialized_snippets(&self) -> String {
        self.snippets
            .iter()
            .map(|snippet| serialize_snippet(snippet, self.comment))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn serialize_snippet(snippet: &ContextSnippet, comment: &str) -> String {
    let body = snippet
        .content
        .split('\n')
        .map(|line| format!("{} {}", comment, line))
        .collect::<Vec<_>>()
        .join("\n");
    file_name_line(&snippet.uri, comment) + &body
}

/// Builds [`PromptContext`]s from document context and ranked snippets.
#[derive(Debug, Clone, Copy)]
pub struct PromptAssembler {
    context_snippets: bool,
}

impl PromptAssembler {
    /// `context_snippets` gates snippet inclusion entirely; when it is off
    /// the prompt carries only the current file.
    pub fn new(context_snippets: bool) -> Self {
        Self { context_snippets }
    }

    /// Assembles the prompt context.
    ///
    /// Snippets are taken greedily in input order while the prompt rendered
    /// by `helper` stays within the character budget. The first snippet that
    /// would overflow it stops the scan.
    pub fn assemble(
        &self,
        document: &DocumentContext,
        snippets: &[ContextSnippet],
        is_infill: bool,
        helper: &dyn ModelHelper,
    ) -> PromptContext {
        let comment = comment_start(&document.language_id);

        let mut prompt = PromptContext {
            uri: document.uri.clone(),
            language_id: document.language_id.clone(),
            prefix: document.prefix.clone(),
            suffix: suffix_through_first_newline(&document.suffix).to_string(),
            snippets: Vec::new(),
            current_file_name_comment: file_name_line(&document.uri, comment),
            is_infill,
            comment,
        };

        if !self.context_snippets {
            return prompt;
        }

        for snippet in snippets {
            prompt.snippets.push(snippet.clone());
            let length = helper.prompt(&prompt).chars().count();

            if length > MAX_PROMPT_CHARS {
                prompt.snippets.pop();
                log::debug!(
                    "Snippet {} would grow the prompt to {} chars, stopping at {} snippets",
                    snippet.identifier,
                    length,
                    prompt.snippets.len()
                );
                break;
            }
        }

        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completions::model::helper_for_model;

    fn document(prefix: &str, suffix: &str) -> DocumentContext {
        DocumentContext {
            uri: "file:///workspace/src/main.py".to_string(),
            language_id: "python".to_string(),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        }
    }

    fn snippet(n: usize, content: &str) -> ContextSnippet {
        ContextSnippet {
            identifier: format!("snippet-{}", n),
            uri: format!("file:///workspace/src/lib{}.py", n),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_comment_start_lookup() {
        assert_eq!(comment_start("python"), "#");
        assert_eq!(comment_start("rust"), "//");
        assert_eq!(comment_start("haskell"), "--");
        assert_eq!(comment_start("brainfuck"), DEFAULT_COMMENT_START);
    }

    #[test]
    fn test_file_name_line_for_unknown_language() {
        assert_eq!(file_name_line("file:///x", comment_start("brainfuck")), "// Path: /x\n");
        assert_eq!(file_name_line("file:///x.py", comment_start("python")), "# Path: /x.py\n");
    }

    #[test]
    fn test_display_path() {
        assert_eq!(
            display_path("file:///workspace/src/main.py"),
            "/workspace/src/main.py"
        );
        assert_eq!(display_path("untitled:Untitled-1"), "untitled:Untitled-1");
        assert_eq!(display_path("src/main.py"), "src/main.py");
    }

    #[test]
    fn test_suffix_truncation() {
        assert_eq!(suffix_through_first_newline(") + 1\nreturn x\n"), ") + 1\n");
        assert_eq!(suffix_through_first_newline("\nfoo"), "\n");
        assert_eq!(suffix_through_first_newline("no newline"), "no newline");
        assert_eq!(suffix_through_first_newline(""), "");
    }

    #[test]
    fn test_document_from_text_respects_hints() {
        let text = "0123456789\nabcdef";
        let doc = DocumentContext::from_text("u", "rust", text, 11, 4, 3);
        assert_eq!(doc.prefix, "789\n");
        assert_eq!(doc.suffix, "abc");

        // Offsets inside a multi-byte char move back to a boundary
        let doc = DocumentContext::from_text("u", "rust", "héllo", 2, 100, 100);
        assert_eq!(doc.prefix, "h");
        assert_eq!(doc.suffix, "éllo");
    }

    #[test]
    fn test_infill_and_indent() {
        assert!(document("x = ", "  1\n").wants_infill());
        assert!(!document("x = ", " \n\t").wants_infill());
        assert_eq!(document("def f():\n    return", "").block_indent(), Some(4));
        assert_eq!(document("x", "").block_indent(), Some(0));
        assert_eq!(document("\n  \n", "").block_indent(), None);
    }

    #[test]
    fn test_block_indent_skips_blank_cursor_line() {
        // Cursor on an empty indented line inside the body
        assert_eq!(document("def f():\n    ", "").block_indent(), Some(0));
        assert_eq!(
            document("class A:\n    def f(self):\n        x = 1\n\n        ", "").block_indent(),
            Some(8)
        );
    }

    #[test]
    fn test_assemble_truncates_suffix_and_builds_header() {
        let helper = helper_for_model("codellama:7b-code");
        let prompt = PromptAssembler::new(false).assemble(
            &document("def add(a, b):\n    return ", "a + b\n\nprint(add(1, 2))\n"),
            &[snippet(1, "x = 1")],
            true,
            helper.as_ref(),
        );

        assert_eq!(prompt.suffix, "a + b\n");
        assert_eq!(
            prompt.current_file_name_comment,
            "# Path: /workspace/src/main.py\n"
        );
        assert!(prompt.is_infill);
        // Flag disabled: no snippets at all
        assert!(prompt.snippets.is_empty());
    }

    #[test]
    fn test_snippet_serialization() {
        let helper = helper_for_model("codellama:7b-code");
        let prompt = PromptAssembler::new(true).assemble(
            &document("x", ""),
            &[snippet(1, "a = 1\nb = 2"), snippet(2, "c = 3")],
            false,
            helper.as_ref(),
        );

        assert_eq!(
            prompt.serialized_snippets(),
            "# Path: /workspace/src/lib1.py\n# a = 1\n# b = 2\n\n# Path: /workspace/src/lib2.py\n# c = 3"
        );
    }

    #[test]
    fn test_snippet_budget_takes_longest_fitting_prefix() {
        let helper = helper_for_model("codellama:7b-code");
        let doc = document("def main():\n    ", "");
        let snippets: Vec<ContextSnippet> =
            (0..10).map(|n| snippet(n, &"y = 2\n".repeat(20))).collect();

        let assembler = PromptAssembler::new(true);
        let prompt = assembler.assemble(&doc, &snippets, false, helper.as_ref());

        let used = prompt.snippets.len();
        assert!(used > 0 && used < snippets.len());
        assert_eq!(prompt.snippets, snippets[..used].to_vec());
        assert!(helper.prompt(&prompt).chars().count() <= MAX_PROMPT_CHARS);

        let mut one_more = prompt.clone();
        one_more.snippets.push(snippets[used].clone());
        assert!(helper.prompt(&one_more).chars().count() > MAX_PROMPT_CHARS);
    }

    #[test]
    fn test_snippet_budget_stops_at_first_overflow() {
        let helper = helper_for_model("codellama:7b-code");
        let doc = document("x", "");
        let snippets = vec![
            snippet(0, "small"),
            snippet(1, &"z".repeat(2000)),
            // Would fit on its own, but the scan has already stopped
            snippet(2, "tiny"),
        ];

        let prompt = PromptAssembler::new(true).assemble(&doc, &snippets, false, helper.as_ref());
        assert_eq!(prompt.snippets, vec![snippets[0].clone()]);
    }
}
