//! Mapping free-text oracle output onto [`QueryKind`].
//!
//! The reasoning oracle is untrusted: it may wrap the category in prose,
//! lowercase it, emit several categories, or return nothing useful.
//! [`parse_classification`] accepts an answer only when exactly one
//! category token appears as a whole word. Callers fall back to
//! [`QueryKind::Hybrid`] on `None`, since that runs both retrieval paths.

use crate::models::QueryKind;

/// Find the single category token in `output`, if there is exactly one.
///
/// Matching is case-insensitive and word-bounded, so `UNSTRUCTURED_QUERY`
/// does not also count as `STRUCTURED_QUERY`. Repeating the same token is
/// not ambiguous; naming two different categories is.
pub fn parse_classification(output: &str) -> Option<QueryKind> {
    let upper = output.to_uppercase();
    let mut found = QueryKind::ALL
        .into_iter()
        .filter(|kind| contains_token(&upper, kind.token()));

    let first = found.next()?;
    if found.next().is_some() {
        return None;
    }
    Some(first)
}

fn contains_token(haystack: &str, token: &str) -> bool {
    haystack.match_indices(token).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + token.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_tokens() {
        assert_eq!(parse_classification("STRUCTURED_QUERY"), Some(QueryKind::Structured));
        assert_eq!(
            parse_classification("UNSTRUCTURED_QUERY"),
            Some(QueryKind::Unstructured)
        );
        assert_eq!(parse_classification("HYBRID_QUERY"), Some(QueryKind::Hybrid));
    }

    #[test]
    fn test_token_inside_prose() {
        assert_eq!(
            parse_classification("I believe this is a STRUCTURED_QUERY case"),
            Some(QueryKind::Structured)
        );
        assert_eq!(
            parse_classification("Category: unstructured_query."),
            Some(QueryKind::Unstructured)
        );
    }

    #[test]
    fn test_unstructured_does_not_match_structured() {
        assert_eq!(
            parse_classification("  UNSTRUCTURED_QUERY\n"),
            Some(QueryKind::Unstructured)
        );
    }

    #[test]
    fn test_multiple_categories_is_ambiguous() {
        let out = "Either STRUCTURED_QUERY or UNSTRUCTURED_QUERY";
        assert_eq!(parse_classification(out), None);
    }

    #[test]
    fn test_repeated_single_category() {
        assert_eq!(
            parse_classification("STRUCTURED_QUERY. Final: STRUCTURED_QUERY"),
            Some(QueryKind::Structured)
        );
    }

    #[test]
    fn test_garbage_has_no_category() {
        for out in ["", "   ", "structured", "SQL please", "STRUCTURED_QUERYX", "\u{1F600}"] {
            assert_eq!(parse_classification(out), None, "output: {:?}", out);
        }
    }
}
