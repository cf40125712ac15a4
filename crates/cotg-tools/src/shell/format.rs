use super::result::ShellCommandResult;

/// Longest body, in characters, passed through without truncation.
pub const MAX_FORMATTED_OUTPUT_CHARS: usize = 8_192;

const HEAD_CHARS: usize = MAX_FORMATTED_OUTPUT_CHARS / 2;
const TAIL_CHARS: usize = MAX_FORMATTED_OUTPUT_CHARS / 2;

/// Bounded, model-facing rendering of a command result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedOutput {
    pub text: String,
    pub truncated: bool,
}

/// Render `result` for the assistant, keeping the head and tail of oversized
/// output around an omission marker.
#[must_use]
pub fn format(result: &ShellCommandResult) -> FormattedOutput {
    let body = body(result);
    let total = body.chars().count();
    if total <= MAX_FORMATTED_OUTPUT_CHARS {
        return FormattedOutput {
            text: body,
            truncated: false,
        };
    }

    let omitted = total - HEAD_CHARS - TAIL_CHARS;
    let head: String = body.chars().take(HEAD_CHARS).collect();
    let tail: String = body.chars().skip(total - TAIL_CHARS).collect();
    FormattedOutput {
        text: format!("{head}\n\n... [{omitted} chars omitted] ...\n\n{tail}"),
        truncated: true,
    }
}

fn body(result: &ShellCommandResult) -> String {
    if result.is_sandbox_failure() {
        let message = result.sandbox_failure.as_deref().unwrap_or_default();
        return format!("failed in sandbox: {message}");
    }

    let mut text = String::with_capacity(result.stdout.len() + result.stderr.len());
    text.push_str(&result.stdout);
    text.push_str(&result.stderr);

    if let Some(cancellation) = result.cancellation {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push('[');
        text.push_str(&cancellation.to_string());
        text.push(']');
    }
    text
}
