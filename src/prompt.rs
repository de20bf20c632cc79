//! Prompt composition.
//!
//! The composed prompt is also the answer-cache key, so the exact layout
//! (tags, separators, blank lines) is part of the cache format. Changing it
//! invalidates every cached answer.

use crate::models::{Chunk, Source};

pub const PREAMBLE: &str = "Use the following information to answer the question:\n\n";

/// Render the selected chunks and the user question into one prompt.
///
/// ```
/// use portfolio_companion::models::{Chunk, Source};
/// use portfolio_companion::prompt::build_prompt;
///
/// let chunk = Chunk {
///     source: Source::Github,
///     section: None,
///     title: "repo1".into(),
///     content: "demo | Language: Go".into(),
/// };
/// let prompt = build_prompt([&chunk], "What is repo1?");
/// assert_eq!(
///     prompt,
///     "Use the following information to answer the question:\n\n\
///      [GitHub] repo1: demo | Language: Go\n\n\
///      Question: What is repo1?\nAnswer:"
/// );
/// ```
pub fn build_prompt<'a>(chunks: impl IntoIterator<Item = &'a Chunk>, query: &str) -> String {
    let mut prompt = String::from(PREAMBLE);
    for chunk in chunks {
        prompt.push_str(&format!(
            "[{}] {}: {}\n\n",
            source_tag(chunk),
            chunk.title,
            chunk.content
        ));
    }
    prompt.push_str(&format!("Question: {}\nAnswer:", query));
    prompt
}

fn source_tag(chunk: &Chunk) -> String {
    match chunk.source {
        Source::Db => "DB".to_string(),
        Source::Github => "GitHub".to_string(),
        Source::Resume => format!("Resume - {}", chunk.section.as_deref().unwrap_or_default()),
    }
}

/// Prefix `prompt` with the conversation memory, when there is any.
///
/// Blank memory leaves the prompt unchanged.
pub fn with_memory(memory: Option<&str>, prompt: String) -> String {
    match memory {
        Some(memory) if !memory.trim().is_empty() => format!("MEMORY:\n{}\n\n{}", memory, prompt),
        _ => prompt,
    }
}

pub const FOLLOW_UP_SYSTEM: &str =
    "You are an assistant that suggests follow-up questions to continue the conversation.";

pub const MEMORY_SYSTEM: &str =
    "You are a helpful assistant that maintains a brief memory of the conversation.";

pub const REWRITE_SYSTEM: &str =
    "You rewrite chat questions into standalone search queries for a portfolio knowledge base.";

/// Prompt asking the model for three follow-up questions.
pub fn follow_up_prompt(query: &str, answer: &str) -> String {
    format!(
        "The user asked: \"{}\"\nYou answered: \"{}\".\nNow suggest 3 brief intelligent follow-up questions the user might ask next.",
        query, answer
    )
}

/// Prompt folding one exchange into a 2-3 sentence conversation memory.
pub fn memory_update_prompt(previous: &str, query: &str, answer: &str) -> String {
    let previous = if previous.trim().is_empty() {
        "(none)"
    } else {
        previous
    };
    format!(
        "Previous memory: {}\nUser just asked: \"{}\"\nAssistant answered: \"{}\"\nUpdate the conversation memory to include this exchange, in 2-3 sentences.",
        previous, query, answer
    )
}

/// Prompt rewriting `query` into a standalone search query using `memory`.
pub fn optimize_query_prompt(memory: &str, query: &str) -> String {
    format!(
        "Conversation memory: {}\nLatest question: \"{}\"\nRewrite the latest question as a standalone search query that resolves references to earlier turns. Reply with the query only.",
        memory, query
    )
}

/// Clean a rewritten query: first non-blank line, surrounding quotes removed.
pub fn clean_rewrite(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let cleaned = line.trim_matches(|c| c == '"' || c == '\'').trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Split a model's follow-up reply into at most three clean questions,
/// dropping list markers such as `1.`, `2)` or `-`.
pub fn parse_suggestions(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| {
            line.trim_start_matches(|c: char| {
                c.is_ascii_digit() || matches!(c, '-' | '.' | ')') || c.is_whitespace()
            })
            .trim()
            .to_string()
        })
        .filter(|s| !s.is_empty())
        .take(3)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: Source, section: Option<&str>, title: &str, content: &str) -> Chunk {
        Chunk {
            source,
            section: section.map(str::to_string),
            title: title.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_prompt_layout() {
        let chunks = vec![
            chunk(Source::Db, Some("projectTable"), "Chatbot", "AI Built with search."),
            chunk(Source::Resume, Some("SKILLS"), "SKILLS", "Python, Go"),
        ];
        let prompt = build_prompt(&chunks, "search?");
        assert!(prompt.starts_with("Use the following information to answer the question:\n\n"));
        assert!(prompt.contains("[DB] Chatbot: AI Built with search.\n\n"));
        assert!(prompt.contains("[Resume - SKILLS] SKILLS: Python, Go\n\n"));
        assert!(prompt.ends_with("Question: search?\nAnswer:"));
    }

    #[test]
    fn test_prompt_without_context() {
        let prompt = build_prompt(&Vec::<Chunk>::new(), "hello");
        assert_eq!(
            prompt,
            "Use the following information to answer the question:\n\nQuestion: hello\nAnswer:"
        );
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let chunks = vec![chunk(Source::Github, None, "r", "c")];
        assert_eq!(build_prompt(&chunks, "q"), build_prompt(&chunks, "q"));
    }

    #[test]
    fn test_parse_suggestions_strips_markers() {
        let raw = "1. What stack?\n2) Any demos?\n\n- Who funded it?\n4. Extra?";
        assert_eq!(
            parse_suggestions(raw),
            vec!["What stack?", "Any demos?", "Who funded it?"]
        );
    }

    #[test]
    fn test_memory_prefixes_prompt() {
        let prompt = build_prompt(&Vec::<Chunk>::new(), "and its stack?");
        let with = with_memory(Some("User asked about Chatbot."), prompt.clone());
        assert!(with.starts_with("MEMORY:\nUser asked about Chatbot.\n\nUse the following"));
        assert!(with.ends_with("Question: and its stack?\nAnswer:"));
        assert_eq!(with_memory(Some("  "), prompt.clone()), prompt);
        assert_eq!(with_memory(None, prompt.clone()), prompt);
    }

    #[test]
    fn test_memory_update_prompt_without_previous() {
        let prompt = memory_update_prompt("", "What is Chatbot?", "An AI project.");
        assert!(prompt.starts_with("Previous memory: (none)\n"));
        assert!(prompt.contains("User just asked: \"What is Chatbot?\""));
        assert!(prompt.ends_with("in 2-3 sentences."));
    }

    #[test]
    fn test_clean_rewrite() {
        assert_eq!(
            clean_rewrite("\n \"Chatbot tech stack\"\nextra").as_deref(),
            Some("Chatbot tech stack")
        );
        assert_eq!(clean_rewrite(" '' \n"), None);
        assert_eq!(clean_rewrite(""), None);
    }
}
