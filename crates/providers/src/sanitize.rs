//! Model output sanitisation.
//!
//! Some models leak reasoning scaffolding (`<thinking>…</thinking>` and
//! friends) into their visible output. Strip it before persisting, while
//! preserving sentence and paragraph structure — the interruption engine
//! and transcript both depend on punctuation surviving intact.

use regex::Regex;

/// Tags whose entire content is internal scaffolding.
const REASONING_TAGS: &[&str] = &[
    "thinking",
    "think",
    "reflection",
    "reasoning",
    "internal",
    "scratchpad",
    "analysis",
];

/// Strip reasoning tags and tidy whitespace from a model response.
pub fn sanitize_response(response: &str) -> String {
    let mut result = response.to_string();

    for tag in REASONING_TAGS {
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>");
        if let Ok(re) = Regex::new(&pattern) {
            result = re.replace_all(&result, "").to_string();
        }
    }

    // Orphaned opening/closing tags left behind by truncated streams.
    if let Ok(re) = Regex::new(r"</?[A-Za-z][\w-]*[^>]*>") {
        result = re.replace_all(&result, "").to_string();
    }

    // Collapse runs of spaces/tabs; keep newlines so paragraph breaks and
    // sentence boundaries survive.
    if let Ok(re) = Regex::new(r"[ \t]{2,}") {
        result = re.replace_all(&result, " ").to_string();
    }
    if let Ok(re) = Regex::new(r"\n{3,}") {
        result = re.replace_all(&result, "\n\n").to_string();
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_thinking_block() {
        let input = "<thinking>weigh both sides…</thinking>The answer is clear.";
        assert_eq!(sanitize_response(input), "The answer is clear.");
    }

    #[test]
    fn strips_multiline_reasoning() {
        let input = "<reasoning>\nstep 1\nstep 2\n</reasoning>Final position here.";
        assert_eq!(sanitize_response(input), "Final position here.");
    }

    #[test]
    fn removes_orphan_tags() {
        let input = "Start <em>emphasis</em> end";
        assert_eq!(sanitize_response(input), "Start emphasis end");
    }

    #[test]
    fn preserves_sentences_and_paragraphs() {
        let input = "First point.  Second point.\n\n\n\nNew paragraph.";
        assert_eq!(
            sanitize_response(input),
            "First point. Second point.\n\nNew paragraph."
        );
    }

    #[test]
    fn plain_text_untouched() {
        let input = "No tags here, just a position statement.";
        assert_eq!(sanitize_response(input), input);
    }
}
