//! Heuristic separation of a buffered model reply into an optional
//! "thinking" segment and the final answer.
//!
//! This is a best-effort text classifier, not a parser: reasoning models
//! do not always mark their reasoning, so line-level indicator patterns are
//! used and a wrong split is acceptable. It never fails; at worst the whole
//! input lands in the final answer.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedResponse {
    pub final_answer: String,
    pub thinking: Option<String>,
}

fn thinking_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(thinking\b|let me think\b|first,|(the|this|since|because|however|actually)\b)")
            .unwrap()
    })
}

fn answer_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(answer\b|here's\b|here is\b|hello\b|hi\b|greetings\b|in summary\b|to summarize\b)")
            .unwrap()
    })
}

fn reasoning_verb_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(think|thinking|consider|wonder|maybe|perhaps|might|possibly|not sure|let me)\b")
            .unwrap()
    })
}

/// Split a raw completion into thinking and final-answer segments.
pub fn process(raw: &str) -> ProcessedResponse {
    // Explicit tags from reasoning models take precedence over heuristics.
    if let Some(split) = split_think_tags(raw) {
        return split;
    }

    let (thinking_lines, answer_lines) = classify_lines(raw);

    let thinking = if thinking_lines.is_empty() {
        None
    } else {
        Some(thinking_lines.join("\n").trim().to_string())
    };
    ProcessedResponse {
        final_answer: answer_lines.join("\n").trim().to_string(),
        thinking,
    }
}

/// Route each line to either the thinking or the answer bucket. Every input
/// line lands in exactly one bucket, in original order.
fn classify_lines(raw: &str) -> (Vec<&str>, Vec<&str>) {
    let mut thinking_lines = Vec::new();
    let mut answer_lines = Vec::new();
    let mut in_thinking = false;

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if in_thinking {
                thinking_lines.push(line);
            } else {
                answer_lines.push(line);
            }
            continue;
        }

        if in_thinking {
            if answer_start_re().is_match(trimmed) || closes_thinking(trimmed) {
                in_thinking = false;
                answer_lines.push(line);
            } else {
                thinking_lines.push(line);
            }
        } else if thinking_start_re().is_match(trimmed) {
            in_thinking = true;
            thinking_lines.push(line);
        } else {
            answer_lines.push(line);
        }
    }

    (thinking_lines, answer_lines)
}

/// Inside thinking mode, a capitalized sentence with terminal punctuation
/// and no reasoning verb reads like the start of the actual answer.
fn closes_thinking(line: &str) -> bool {
    let starts_upper = line.chars().next().is_some_and(|c| c.is_uppercase());
    let terminal = line.ends_with(['.', '!', '?']);
    starts_upper && terminal && !reasoning_verb_re().is_match(line)
}

/// DeepSeek-style replies wrap reasoning in `<think> ... </think>` tags;
/// when both tags are present, split on them directly.
fn split_think_tags(raw: &str) -> Option<ProcessedResponse> {
    let start = raw.find("<think>")?;
    let end = raw.find("</think>")?;
    if end < start {
        return None;
    }

    let thinking = raw[start + "<think>".len()..end].trim();
    let mut answer = String::new();
    answer.push_str(&raw[..start]);
    answer.push_str(&raw[end + "</think>".len()..]);

    Some(ProcessedResponse {
        final_answer: answer.trim().to_string(),
        thinking: if thinking.is_empty() {
            None
        } else {
            Some(thinking.to_string())
        },
    })
}
