//! Prompt builders for every reasoning call the router makes.
//!
//! Kept here, free of any client, so the exact text a collaborator sees is
//! testable. Context and row data are embedded verbatim: nothing in this
//! module truncates.

use crate::models::QueryKind;

/// Context used when semantic retrieval finds nothing.
pub const NO_CONTEXT: &str = "No GST rules found.";

/// Data context used when the structured path returns no rows.
pub const NO_DATA: &str = "No data found";

/// Output budget for classification calls.
pub const CLASSIFY_MAX_TOKENS: u32 = 100;
/// Output budget for the semantic answer.
pub const ANSWER_MAX_TOKENS: u32 = 300;
/// Output budget for the hybrid conclusion.
pub const HYBRID_MAX_TOKENS: u32 = 400;

pub fn classification_prompt(query: &str) -> String {
    format!(
        "Role: You are a query router for a GST & Invoice Analysis System.\n\
         \n\
         Categories:\n\
         1. {}: SQL/data queries over invoices and line items\n\
         2. {}: GST rules, notices and compliance questions\n\
         3. {}: needs both invoice data and rule analysis\n\
         \n\
         User Query: \"{}\"\n\
         \n\
         Task: Return ONLY the category name in uppercase.",
        QueryKind::Structured.token(),
        QueryKind::Unstructured.token(),
        QueryKind::Hybrid.token(),
        query
    )
}

/// Join retrieved texts in rank order, separated by blank lines.
///
/// Returns [`NO_CONTEXT`] when nothing was retrieved.
pub fn join_context<S: AsRef<str>>(texts: &[S]) -> String {
    if texts.is_empty() {
        return NO_CONTEXT.to_string();
    }
    texts
        .iter()
        .map(|t| t.as_ref())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn semantic_answer_prompt(context: &str, query: &str) -> String {
    format!(
        "Rule Context:\n{}\n\n\
         User Query: \"{}\"\n\n\
         Task: Answer strictly using the provided context.\n\
         If insufficient info, say so. Explain simply.",
        context, query
    )
}

pub fn sql_generation_prompt(schema: &str, question: &str) -> String {
    format!(
        "Convert the user question into a valid SQLite SQL query.\n\n\
         Database Schema:\n{}\n\n\
         User Question: \"{}\"\n\n\
         Rules:\n\
         - Output ONLY SQL\n\
         - A single read-only SELECT statement\n\
         - No explanations\n\
         - No markdown",
        schema, question
    )
}

pub fn sql_summary_prompt(question: &str, sql: &str, rows: &str) -> String {
    format!(
        "User Question: {}\nSQL Executed: {}\nSQL Result: {}\n\nAnswer clearly and concisely.",
        question, sql, rows
    )
}

/// Final synthesis prompt for a hybrid query.
///
/// `data` is the structured rows rendered as text (or [`NO_DATA`]),
/// `context` the retrieved rule passages and `rule_answer` the semantic
/// path's answer. All three are inserted unchanged.
pub fn hybrid_prompt(
    query: &str,
    generated_query: &str,
    data: &str,
    context: &str,
    rule_answer: &str,
) -> String {
    format!(
        "You are a Hybrid Compliance Auditor.\n\n\
         User Query: \"{query}\"\n\n\
         1. Data Retrieved (SQL): \"{generated_query}\"\n\
         Data Result:\n{data}\n\n\
         2. GST Rules (retrieved passages):\n{context}\n\n\
         3. Rule Analysis:\n{rule_answer}\n\n\
         Task: Combine data + rules to answer the query.\n\
         Output final conclusion."
    )
}
