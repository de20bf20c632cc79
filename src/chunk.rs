//! Snapshot chunker.
//!
//! Turns the three source snapshots into a flat list of [`Chunk`]s. The
//! output is a pure function of the inputs: db chunks first (collection
//! order, then record order), then github chunks (array order), then resume
//! chunks (heading discovery order). Indexing ids are positional, so this
//! ordering must stay stable between cycles.
//!
//! Profile records are schema-less, so title and body fields are located by
//! substring match on key names (see [`find_key_containing`]).

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::models::{Chunk, Source};

/// Section label for resume lines that appear before the first heading.
const DEFAULT_RESUME_SECTION: &str = "General";

/// Chunk all three snapshots. Malformed or empty snapshots contribute zero
/// chunks instead of failing.
pub fn chunk_snapshots(db: &Value, github: &Value, resume: &Value) -> Vec<Chunk> {
    let mut chunks = chunk_db(db);
    chunks.extend(chunk_github(github));
    chunks.extend(chunk_resume(resume));
    tracing::debug!(count = chunks.len(), "chunked snapshots");
    chunks
}

/// Returns the first key (in record order) whose lowercased name contains
/// `needle`.
///
/// This is a deliberate heuristic: the profile collections use prefixed
/// field names (`projectTitle`, `experienceTitle`, `honorsExperienceTagline`,
/// ...) with no shared schema, so a substring match is the only thing they
/// have in common. `needle` is expected in lowercase.
pub fn find_key_containing<'a>(record: &'a Map<String, Value>, needle: &str) -> Option<&'a str> {
    record
        .keys()
        .find(|k| k.to_lowercase().contains(needle))
        .map(String::as_str)
}

/// One chunk per element of every top-level array in the db snapshot.
pub fn chunk_db(db: &Value) -> Vec<Chunk> {
    let Some(collections) = db.as_object() else {
        return Vec::new();
    };

    let empty = Map::new();
    let mut chunks = Vec::new();
    for (table, entries) in collections {
        let Some(entries) = entries.as_array() else {
            continue;
        };
        for entry in entries {
            let record = entry.as_object().unwrap_or(&empty);
            chunks.push(Chunk {
                source: Source::Db,
                section: Some(table.clone()),
                title: find_key_containing(record, "title")
                    .map(|k| value_text(&record[k]))
                    .unwrap_or_default(),
                content: db_content(record),
            });
        }
    }
    chunks
}

fn db_content(record: &Map<String, Value>) -> String {
    let mut parts = Vec::new();

    if let Some(key) = find_key_containing(record, "tagline") {
        if is_truthy(&record[key]) {
            parts.push(value_text(&record[key]));
        }
    }
    if let Some(key) = find_key_containing(record, "paragraphs") {
        if let Some(paragraphs) = record[key].as_array() {
            parts.extend(paragraphs.iter().map(value_text));
        }
    }

    if parts.is_empty() {
        for key in ["description", "skillDescription"] {
            if let Some(v) = record.get(key).filter(|v| is_truthy(v)) {
                parts.push(value_text(v));
            }
        }
    }

    parts.join(" ")
}

/// One chunk per repository in the github snapshot array.
pub fn chunk_github(github: &Value) -> Vec<Chunk> {
    let Some(repos) = github.as_array() else {
        return Vec::new();
    };

    repos
        .iter()
        .map(|repo| {
            let field = |name: &str| repo.get(name).filter(|v| is_truthy(v)).map(value_text);

            let title = field("name").or_else(|| field("full_name")).unwrap_or_default();
            let mut parts = Vec::new();
            if let Some(description) = field("description") {
                parts.push(description);
            }
            if let Some(language) = field("language") {
                parts.push(format!("Language: {}", language));
            }

            Chunk {
                source: Source::Github,
                section: None,
                title,
                content: parts.join(" | "),
            }
        })
        .collect()
}

/// One chunk per non-empty heading section of `resume_text`.
pub fn chunk_resume(resume: &Value) -> Vec<Chunk> {
    let Some(text) = resume.get("resume_text").and_then(Value::as_str) else {
        return Vec::new();
    };

    // Ordered by first appearance; a repeated heading restarts its section in place.
    let mut sections: Vec<(String, Vec<&str>)> =
        vec![(DEFAULT_RESUME_SECTION.to_string(), Vec::new())];
    let mut current = 0;

    for line in text.split('\n').map(str::trim).filter(|l| !l.is_empty()) {
        if is_section_heading(line) {
            current = match sections.iter().position(|(name, _)| name == line) {
                Some(pos) => {
                    sections[pos].1.clear();
                    pos
                }
                None => {
                    sections.push((line.to_string(), Vec::new()));
                    sections.len() - 1
                }
            };
        } else {
            sections[current].1.push(line);
        }
    }

    sections
        .into_iter()
        .filter(|(_, lines)| !lines.is_empty())
        .map(|(heading, lines)| Chunk {
            source: Source::Resume,
            section: Some(heading.clone()),
            title: heading,
            content: lines.join(" "),
        })
        .collect()
}

/// An uppercase letter followed by at least one uppercase letter, digit,
/// space, `&` or `-`.
pub fn is_section_heading(line: &str) -> bool {
    let mut chars = line.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() => {}
        _ => return false,
    }
    let rest = chars.as_str();
    !rest.is_empty()
        && rest
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, ' ' | '&' | '-'))
}

/// SHA-256 over the serialized chunk list. Equal fingerprints mean the
/// index built from them is identical.
pub fn fingerprint(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        // Serializing a plain struct of strings cannot fail.
        let line = serde_json::to_vec(chunk).unwrap_or_default();
        hasher.update(&line);
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_find_key_containing_case_insensitive() {
        let r = record(json!({"id": 1, "projectTitle": "A", "subTitleNote": "B"}));
        assert_eq!(find_key_containing(&r, "title"), Some("projectTitle"));
    }

    #[test]
    fn test_find_key_containing_missing() {
        let r = record(json!({"name": "x", "summary": "y"}));
        assert_eq!(find_key_containing(&r, "title"), None);
        assert_eq!(find_key_containing(&Map::new(), "title"), None);
    }

    #[test]
    fn test_find_key_containing_first_in_record_order() {
        let r = record(json!({"TITLEBAR": 1, "title": 2}));
        assert_eq!(find_key_containing(&r, "title"), Some("TITLEBAR"));
    }

    #[test]
    fn test_db_tagline_and_paragraphs() {
        let db = json!({"projectTable": [{
            "projectTitle": "Chatbot",
            "projectTagline": "AI",
            "projectParagraphs": ["Built with search.", "Deployed."]
        }]});
        let chunks = chunk_db(&db);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section.as_deref(), Some("projectTable"));
        assert_eq!(chunks[0].title, "Chatbot");
        assert_eq!(chunks[0].content, "AI Built with search. Deployed.");
    }

    #[test]
    fn test_db_description_fallback() {
        let db = json!({"skillsTable": [
            {"skillTitle": "Rust", "description": "systems", "skillDescription": "fast"},
            {"skillTitle": "Go", "skillTagline": "", "skillDescription": "simple"}
        ]});
        let chunks = chunk_db(&db);
        assert_eq!(chunks[0].content, "systems fast");
        assert_eq!(chunks[1].content, "simple");
    }

    #[test]
    fn test_db_missing_keys_yield_empty_fields() {
        let db = json!({"honorsExperienceTable": [{"awardedBy": "x"}, 42]});
        let chunks = chunk_db(&db);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.title.is_empty() && c.content.is_empty()));
    }

    #[test]
    fn test_db_chunk_count_matches_list_elements() {
        let db = json!({
            "a": [{}, {}, {}],
            "b": [],
            "c": [{"cTitle": "x"}],
            "meta": {"not": "a list"},
            "count": 3
        });
        assert_eq!(chunk_db(&db).len(), 4);
    }

    #[test]
    fn test_db_preserves_collection_order() {
        let db: Value =
            serde_json::from_str(r#"{"zeta":[{"t_title":"z"}],"alpha":[{"t_title":"a"}]}"#).unwrap();
        let titles: Vec<_> = chunk_db(&db).into_iter().map(|c| c.title).collect();
        assert_eq!(titles, vec!["z", "a"]);
    }

    #[test]
    fn test_github_chunks() {
        let gh = json!([
            {"name": "repo1", "description": "demo", "language": "Go"},
            {"full_name": "me/repo2", "language": "Rust"},
            {"name": "repo3"}
        ]);
        let chunks = chunk_github(&gh);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content, "demo | Language: Go");
        assert_eq!(chunks[0].section, None);
        assert_eq!(chunks[1].title, "me/repo2");
        assert_eq!(chunks[1].content, "Language: Rust");
        assert_eq!(chunks[2].content, "");
    }

    #[test]
    fn test_github_non_array_is_empty() {
        assert!(chunk_github(&json!({})).is_empty());
    }

    #[test]
    fn test_section_heading_pattern() {
        assert!(is_section_heading("SKILLS"));
        assert!(is_section_heading("WORK EXPERIENCE"));
        assert!(is_section_heading("AWARDS & HONORS"));
        assert!(is_section_heading("K-12 OUTREACH"));
        assert!(!is_section_heading("S"));
        assert!(!is_section_heading("Skills"));
        assert!(!is_section_heading("1ST PLACE"));
        assert!(!is_section_heading("PYTHON, GO"));
    }

    #[test]
    fn test_resume_sections() {
        let resume = json!({"resume_text": "Jane Doe\n\n  EDUCATION \nState University\nB.S. CS\nSKILLS\nPython, Go\nEMPTY\n"});
        let chunks = chunk_resume(&resume);
        let got: Vec<_> = chunks
            .iter()
            .map(|c| (c.title.as_str(), c.content.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("General", "Jane Doe"),
                ("EDUCATION", "State University B.S. CS"),
                ("SKILLS", "Python, Go"),
            ]
        );
        assert_eq!(chunks[1].section.as_deref(), Some("EDUCATION"));
    }

    #[test]
    fn test_resume_repeated_heading_restarts_in_place() {
        let resume = json!({"resume_text": "SKILLS\nold\nPROJECTS\np\nSKILLS\nnew"});
        let chunks = chunk_resume(&resume);
        assert_eq!(chunks[0].title, "SKILLS");
        assert_eq!(chunks[0].content, "new");
        assert_eq!(chunks[1].title, "PROJECTS");
    }

    #[test]
    fn test_resume_without_text_field() {
        assert!(chunk_resume(&json!({})).is_empty());
        assert!(chunk_resume(&json!({"resume_text": ""})).is_empty());
    }

    #[test]
    fn test_chunk_snapshots_scenario() {
        let db = json!({"projectTable":[{"projectTitle":"Chatbot","projectTagline":"AI","projectParagraphs":["Built with search."]}]});
        let gh = json!([{"name":"repo1","description":"demo","language":"Go"}]);
        let resume = json!({"resume_text":"SKILLS\nPython, Go"});
        let chunks = chunk_snapshots(&db, &gh, &resume);
        assert_eq!(
            chunks,
            vec![
                Chunk {
                    source: Source::Db,
                    section: Some("projectTable".into()),
                    title: "Chatbot".into(),
                    content: "AI Built with search.".into(),
                },
                Chunk {
                    source: Source::Github,
                    section: None,
                    title: "repo1".into(),
                    content: "demo | Language: Go".into(),
                },
                Chunk {
                    source: Source::Resume,
                    section: Some("SKILLS".into()),
                    title: "SKILLS".into(),
                    content: "Python, Go".into(),
                },
            ]
        );
    }

    #[test]
    fn test_deterministic_fingerprint() {
        let db = json!({"t": [{"aTitle": "x", "description": "y"}]});
        let gh = json!([{"name": "r"}]);
        let resume = json!({"resume_text": "SKILLS\nRust"});
        let a = chunk_snapshots(&db, &gh, &resume);
        let b = chunk_snapshots(&db, &gh, &resume);
        assert_eq!(a, b);
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&a[1..]));
    }
}
