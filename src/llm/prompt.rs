//! Prompt construction for the generation and refinement stages.
//!
//! Both prompts pin the model to a line-oriented response grammar: every
//! statement on its own line behind [`SQL_SENTINEL`], or a single
//! [`REASON_SENTINEL`] line when the question cannot be answered.

use crate::pipeline::{Question, SchemaSnapshot};

/// Prefix tagging a line that carries one SQL statement.
pub const SQL_SENTINEL: &str = "SQLQUERY:";

/// Prefix tagging a rejection reason.
pub const REASON_SENTINEL: &str = "REASON:";

/// Header that precedes the candidate statements in the refinement prompt.
pub const CANDIDATES_HEADER: &str = "CANDIDATE QUERIES:";

const GENERATION_TEMPLATE: &str = r#"You are a data analyst writing SQLite3 queries for a reporting dashboard.

DATABASE SCHEMA:
{schema}

QUESTION:
{question}

INSTRUCTIONS:
- Write one or more SQLite3 queries that answer the question.
- Prefer queries whose results are useful for reports and charts (aggregates, groupings, trends).
- Always write explicit JOIN clauses with full table names; never abbreviate table names with aliases.
- Do not return several queries that would yield identical results.
- If the question is vague, still return the most reasonable queries instead of refusing.
- Only refuse when the question is inappropriate or cannot be related to the schema at all.

OUTPUT FORMAT:
- Put each query on a single line that starts with {sql_sentinel}
- If you refuse, return exactly one line that starts with {reason_sentinel} followed by a short reason.
- Never combine {sql_sentinel} lines and a {reason_sentinel} line in one response.
- Do not add explanations, numbering or markdown."#;

const REFINEMENT_TEMPLATE: &str = r#"You are reviewing SQLite3 queries written by another assistant.

DATABASE SCHEMA:
{schema}

ORIGINAL QUESTION:
{question}

INSTRUCTIONS:
- Fix syntax errors and logic errors so each query runs on SQLite3 against the schema above.
- Remove any query that references tables or columns missing from the schema.
- Keep the remaining queries in their original order.
- Keep each query on a single line that starts with {sql_sentinel}
- Return only those lines. No explanations, no commentary, no markdown.

{candidates_header}
{candidates}"#;

/// Builds the prompt for the generation stage.
pub fn build_generation_prompt(schema: &SchemaSnapshot, question: &Question) -> String {
    render(
        GENERATION_TEMPLATE,
        &[
            ("schema", schema.as_str()),
            ("question", question.as_str()),
            ("sql_sentinel", SQL_SENTINEL),
            ("reason_sentinel", REASON_SENTINEL),
        ],
    )
}

/// Builds the prompt for the refinement stage.
///
/// `candidates` is the raw, unparsed generation output.
pub fn build_refinement_prompt(
    schema: &SchemaSnapshot,
    question: &Question,
    candidates: &str,
) -> String {
    render(
        REFINEMENT_TEMPLATE,
        &[
            ("schema", schema.as_str()),
            ("question", question.as_str()),
            ("sql_sentinel", SQL_SENTINEL),
            ("candidates_header", CANDIDATES_HEADER),
            ("candidates", candidates.trim()),
        ],
    )
}

/// Fills `{name}` placeholders in a single pass over the template.
///
/// Inserted values are never scanned again, so braces inside schema text or
/// a question stay literal. Unknown placeholders are kept as written.
fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let extra: usize = vars.iter().map(|(_, value)| value.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
