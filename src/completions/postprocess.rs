use serde::Serialize;
use std::sync::Arc;

/// Shapes the accumulated completion text before it is exposed.
///
/// Implementations must be pure: the same input always yields the same
/// output, and nothing is remembered between calls.
pub trait TextShaper: Send + Sync {
    fn shape(&self, text: &str) -> String;
}

/// Trims leading and trailing whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimShaper;

impl TextShaper for TrimShaper {
    fn shape(&self, text: &str) -> String {
        text.trim().to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityShaper;

impl TextShaper for IdentityShaper {
    fn shape(&self, text: &str) -> String {
        text.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CompletionMode {
    SingleLine,
    Multiline,
}

/// Text produced so far for one slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletionCandidate {
    pub text: String,
    /// The text is a usable completion as it stands.
    pub finalized: bool,
}

/// Incrementally turns raw deltas of one stream into candidate updates.
pub struct PostProcessor {
    mode: CompletionMode,
    shaper: Arc<dyn TextShaper>,
    base_indent: Option<usize>,
    raw: String,
    candidate: CompletionCandidate,
    complete: bool,
}

impl PostProcessor {
    pub fn new(mode: CompletionMode, shaper: Arc<dyn TextShaper>) -> Self {
        Self {
            mode,
            shaper,
            base_indent: None,
            raw: String::new(),
            candidate: CompletionCandidate::default(),
            complete: false,
        }
    }

    /// Indentation of the line that opens the block, usually
    /// [`DocumentContext::block_indent`]. When unset, the first non-blank
    /// line of the completion defines the block's indentation.
    ///
    /// [`DocumentContext::block_indent`]: super::prompt::DocumentContext::block_indent
    pub fn with_base_indent(mut self, indent: usize) -> Self {
        self.base_indent = Some(indent);
        self
    }

    pub fn candidate(&self) -> &CompletionCandidate {
        &self.candidate
    }

    /// True once no further input can change the candidate.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Feeds one delta. Returns the new candidate when it changed.
    pub fn push(&mut self, delta: &str) -> Option<CompletionCandidate> {
        if self.complete || delta.is_empty() {
            return None;
        }
        self.raw.push_str(delta);

        let next = match self.mode {
            CompletionMode::SingleLine => {
                let first_line = self.raw.split('\n').next().unwrap_or_default();
                self.complete = self.raw.contains('\n');
                CompletionCandidate {
                    text: self.shaper.shape(first_line),
                    finalized: true,
                }
            }
            CompletionMode::Multiline => match find_block_end(&self.raw, self.base_indent) {
                Some(end) => {
                    self.complete = true;
                    CompletionCandidate {
                        text: self.shaper.shape(&self.raw[..end]),
                        finalized: true,
                    }
                }
                None => {
                    // Only fully received lines are exposed while streaming
                    let received = self.raw.rfind('\n').map_or(0, |pos| pos + 1);
                    CompletionCandidate {
                        text: self.shaper.shape(&self.raw[..received]),
                        finalized: false,
                    }
                }
            },
        };

        if next == self.candidate {
            return None;
        }
        self.candidate = next;
        Some(self.candidate.clone())
    }

    /// Freezes the candidate with everything received so far. Used for every
    /// terminal state so partial text survives timeouts and failures.
    pub fn finish(&mut self) -> CompletionCandidate {
        if !self.complete {
            let text = match self.mode {
                CompletionMode::SingleLine => self.raw.split('\n').next().unwrap_or_default(),
                CompletionMode::Multiline => self.raw.as_str(),
            };
            self.candidate = CompletionCandidate {
                text: self.shaper.shape(text),
                finalized: true,
            };
            self.complete = true;
        }
        self.candidate.clone()
    }
}

fn indentation(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

fn is_closing_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| matches!(c, '}' | ')' | ']' | ';' | ','))
}

/// Finds where the block started by the completion ends.
///
/// The first line continues the cursor line and never ends the block. A
/// later complete, non-blank line indented no deeper than the base ends it:
/// closing-bracket lines are kept, anything else is cut off. Returns the byte
/// offset to truncate at.
fn find_block_end(text: &str, base_indent: Option<usize>) -> Option<usize> {
    let received = text.rfind('\n')? + 1;
    let mut base = base_indent;
    let mut offset = 0;

    for (index, line) in text[..received].split_inclusive('\n').enumerate() {
        let start = offset;
        offset += line.len();

        let content = line.trim_end_matches(['\n', '\r']);
        if content.trim().is_empty() {
            continue;
        }

        let indent = indentation(content);
        let base_indent = match (base, index) {
            (Some(b), i) if i > 0 => b,
            _ => {
                base.get_or_insert(indent);
                continue;
            }
        };

        if indent <= base_indent {
            return Some(if is_closing_line(content) { offset } else { start });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(mode: CompletionMode) -> PostProcessor {
        PostProcessor::new(mode, Arc::new(TrimShaper))
    }

    #[test]
    fn test_multiline_waits_for_block_boundary() {
        let mut p = processor(CompletionMode::Multiline);

        let first = p.push("def f(\n").unwrap();
        assert!(!first.finalized);
        assert_eq!(first.text, "def f(");

        let second = p.push("    pass\n").unwrap();
        assert!(!second.finalized);
        assert_eq!(second.text, "def f(\n    pass");
        assert!(!p.is_complete());

        // A dedented line closes the block and is not part of it
        let third = p.push("print(f)\n").unwrap();
        assert!(third.finalized);
        assert_eq!(third.text, "def f(\n    pass");
        assert!(p.is_complete());
        assert_eq!(p.push("more\n"), None);
    }

    #[test]
    fn test_multiline_keeps_closing_bracket() {
        let mut p = PostProcessor::new(CompletionMode::Multiline, Arc::new(IdentityShaper))
            .with_base_indent(4);

        assert!(p.push("if (x) {\n        y();\n").is_some());
        let done = p.push("    }\n    z();\n").unwrap();
        assert!(done.finalized);
        assert_eq!(done.text, "if (x) {\n        y();\n    }\n");
    }

    #[test]
    fn test_multiline_body_lines_deeper_than_opening_line() {
        // Cursor on a blank indented line right after `def f():`
        let mut p = processor(CompletionMode::Multiline).with_base_indent(0);

        assert!(p.push("x = 1\n").is_some());
        let body = p.push("    return x\n").unwrap();
        assert!(!p.is_complete());
        assert_eq!(body.text, "x = 1\n    return x");

        let done = p.push("\nprint(f())\n").unwrap();
        assert!(done.finalized);
        assert_eq!(done.text, "x = 1\n    return x");
    }

    #[test]
    fn test_multiline_partial_line_is_not_a_boundary() {
        let mut p = processor(CompletionMode::Multiline);
        p.push("x = [\n    1,\n");
        // No newline yet: could still be "]" or more items
        assert_eq!(p.push("retu"), None);
        assert!(!p.is_complete());
    }

    #[test]
    fn test_single_line_finalizes_every_delta() {
        let mut p = processor(CompletionMode::SingleLine);

        let a = p.push("  return a").unwrap();
        assert!(a.finalized);
        assert_eq!(a.text, "return a");

        let b = p.push(" + b").unwrap();
        assert!(b.finalized);
        assert_eq!(b.text, "return a + b");
        assert!(!p.is_complete());

        assert_eq!(p.push("\n"), None);
        assert!(p.is_complete());
        assert_eq!(p.candidate().text, "return a + b");
    }

    #[test]
    fn test_finish_keeps_partial_text() {
        let mut p = processor(CompletionMode::Multiline);
        p.push("for i in range(3):\n    prin");

        let frozen = p.finish();
        assert!(frozen.finalized);
        assert_eq!(frozen.text, "for i in range(3):\n    prin");
        assert_eq!(p.push("t(i)\n"), None);
    }

    #[test]
    fn test_updates_are_append_only_until_final() {
        let mut p = processor(CompletionMode::Multiline);
        let mut last = String::new();
        for delta in ["fn a() {\n", "    let x = 1;\n", "    x\n"] {
            if let Some(c) = p.push(delta) {
                assert!(c.text.starts_with(&last));
                last = c.text;
            }
        }
    }
}
