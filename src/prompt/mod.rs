//! Prompt composition: turns a title, a description, and diff chunks into
//! the ordered segments of a review conversation.
//!
//! The order is fixed because conversational backends treat each segment
//! as a new turn that builds on the previous one:
//!
//! 1. task instructions and the change title
//! 2. the author's description
//! 3. one segment per diff chunk, in file order
//! 4. the closing instruction that asks for the review
//!
//! Every segment but the last tells the model to hold its answer.

use crate::diff::Chunks;
use crate::diff::chunker::fit_to_ceiling;
use crate::models::prompt::{Prompt, PromptSegment, SegmentKind};

/// System message for backends that accept one.
pub const SYSTEM_MESSAGE: &str = "You are a programming code change reviewer, provide feedback on the code changes given. Do not introduce yourselves.";

/// Final segment that triggers the review.
pub const CLOSING_INSTRUCTION: &str = "All code changes have been provided. Please provide me with your code review based on all the changes, context & title provided";

/// Warning rendered under the review when any segment was cut to `ceiling`
/// characters.
///
/// The token figure assumes 4 characters per token plus the 1000-character
/// margin the default ceiling is derived from.
pub fn truncation_warning(ceiling: usize) -> String {
    let tokens = (ceiling + 1000) / 4;
    format!(
        "Some parts of your patch were truncated as it was larger than {tokens} tokens or {ceiling} characters. The review might not be as complete."
    )
}

fn instructions(title: &str) -> String {
    format!(
        "The change has the following title: {title}.

Your task is:
- Review the code changes and provide feedback.
- If there are any bugs, highlight them.
- Provide details on missed use of best-practices.
- Does the code do what it says in the commit messages?
- Do not highlight minor issues and nitpicks.
- Use bullet points if you have multiple comments.
- Provide security recommendations if there are any.

You are provided with the code changes (diffs) in a unidiff format.
Do not provide feedback yet. I will follow-up with a description of the change in a new message."
    )
}

fn description_segment(description: &str) -> String {
    format!(
        "A description was given to help you assist in understand why these changes were made.
The description was provided in a markdown format. Do not provide feedback yet. I will follow-up with the code changes in diff format in a new message.

{description}"
    )
}

/// Compose the multi-turn segment sequence.
///
/// Produces `2 + chunks.texts.len() + 1` segments. An empty description is
/// rendered as an empty body, not an error. Title and description segments
/// are held to the same `ceiling` as the chunks.
pub fn compose(title: &str, description: &str, chunks: &Chunks, ceiling: usize) -> Prompt {
    let mut truncated = chunks.truncated;
    let mut segments = Vec::with_capacity(chunks.texts.len() + 3);

    let mut push = |kind: SegmentKind, text: String| {
        let (text, cut) = cap(text, ceiling);
        truncated |= cut;
        let continues_previous = !segments.is_empty();
        segments.push(PromptSegment {
            kind,
            text,
            continues_previous,
        });
    };

    push(SegmentKind::Instructions, instructions(title.trim()));
    push(SegmentKind::Description, description_segment(description.trim()));
    for chunk in &chunks.texts {
        push(SegmentKind::Diff, chunk.clone());
    }
    push(SegmentKind::Closing, CLOSING_INSTRUCTION.to_string());

    Prompt { segments, truncated }
}

/// Join all segments into one prompt for backends without multi-turn
/// support, keeping the order and marking each part's position.
pub fn compose_single(segments: &[PromptSegment]) -> String {
    let total = segments.len();
    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| format!("[Part {} of {total}]\n{}", i + 1, segment.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Cut free text to the ceiling at a character boundary. Diff chunks come
/// in already fitted, so they pass through untouched.
fn cap(text: String, ceiling: usize) -> (String, bool) {
    if text.chars().count() <= ceiling {
        return (text, false);
    }
    if text.starts_with("```diff") {
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        return fit_to_ceiling(&lines, ceiling);
    }
    (text.chars().take(ceiling).collect(), true)
}
