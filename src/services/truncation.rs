//! Prompt shortening for retried model calls.
//!
//! Prompts grow with the ledger, so a retry after a failure may be sent a
//! shorter version of the request. The system prompt carries the output
//! contract and is kept whole when it fits in half the budget; the user
//! prompt gives up its middle, keeping the opening (the article) and the
//! end (the most recent evidence and instructions).

use std::borrow::Cow;

use crate::domain::ports::CompletionRequest;

/// Inserted where text was cut out.
pub const TRUNCATION_MARKER: &str = "\n... [middle truncated] ...\n";

/// Least user prompt kept, however long the system prompt is.
const MIN_USER_CHARS: usize = 100;

/// Cut the middle out of `text` so that at most `max_chars` characters of it
/// remain, split evenly between head and tail. Text within the limit is
/// borrowed unchanged.
pub fn truncate_middle(text: &str, max_chars: usize) -> Cow<'_, str> {
    let total = text.chars().count();
    if total <= max_chars {
        return Cow::Borrowed(text);
    }

    let head_chars = max_chars / 2;
    let tail_chars = max_chars - head_chars;
    let head_end = byte_offset(text, head_chars);
    let tail_start = byte_offset(text, total - tail_chars);

    let mut shortened = String::with_capacity(head_end + (text.len() - tail_start) + TRUNCATION_MARKER.len());
    shortened.push_str(&text[..head_end]);
    shortened.push_str(TRUNCATION_MARKER);
    shortened.push_str(&text[tail_start..]);
    Cow::Owned(shortened)
}

/// Byte offset of the `chars`-th character.
fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map_or(text.len(), |(idx, _)| idx)
}

/// A copy of `request` whose prompts fit in `max_chars`, or `None` when the
/// request already fits.
pub fn fit_request(request: &CompletionRequest, max_chars: usize) -> Option<CompletionRequest> {
    let system_chars = request.system.chars().count();
    let user_chars = request.user.chars().count();
    if system_chars + user_chars <= max_chars {
        return None;
    }

    let system = truncate_middle(&request.system, max_chars / 2);
    let user_budget = max_chars
        .saturating_sub(system.chars().count())
        .max(MIN_USER_CHARS);
    let user = truncate_middle(&request.user, user_budget);

    Some(CompletionRequest {
        task: request.task,
        system: system.into_owned(),
        user: user.into_owned(),
        temperature: request.temperature,
    })
}
