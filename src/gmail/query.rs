//! Natural-language to Gmail query translation
//!
//! A best-effort heuristic, not a parser: rules are checked top to bottom
//! and the first one that applies decides the whole query. Input that no
//! rule recognizes is passed to Gmail unchanged.

/// What a rule matches on
#[derive(Debug, Clone, Copy)]
enum Trigger {
    /// Any of the keywords appears (case-insensitive)
    Keywords(&'static [&'static str]),
    /// A `name:value` operator appears; the value runs to the next whitespace
    Operator(&'static str),
}

/// What a matching rule produces
#[derive(Debug, Clone, Copy)]
enum Rewrite {
    Fixed(&'static str),
    /// Re-emit the operator with the captured value
    Passthrough,
}

#[derive(Debug, Clone, Copy)]
struct QueryRule {
    trigger: Trigger,
    rewrite: Rewrite,
}

const RULES: &[QueryRule] = &[
    QueryRule {
        trigger: Trigger::Keywords(&["unread", "未讀"]),
        rewrite: Rewrite::Fixed("is:unread"),
    },
    QueryRule {
        trigger: Trigger::Keywords(&["important", "重要"]),
        rewrite: Rewrite::Fixed("is:important"),
    },
    QueryRule {
        trigger: Trigger::Keywords(&["starred", "星標"]),
        rewrite: Rewrite::Fixed("is:starred"),
    },
    QueryRule {
        trigger: Trigger::Operator("from:"),
        rewrite: Rewrite::Passthrough,
    },
    QueryRule {
        trigger: Trigger::Operator("to:"),
        rewrite: Rewrite::Passthrough,
    },
    QueryRule {
        trigger: Trigger::Operator("subject:"),
        rewrite: Rewrite::Passthrough,
    },
    QueryRule {
        trigger: Trigger::Keywords(&["revolut", "receipt"]),
        rewrite: Rewrite::Fixed("from:revolut OR subject:receipt"),
    },
    QueryRule {
        trigger: Trigger::Keywords(&["today"]),
        rewrite: Rewrite::Fixed("newer_than:1d"),
    },
    QueryRule {
        trigger: Trigger::Keywords(&["yesterday"]),
        rewrite: Rewrite::Fixed("newer_than:2d older_than:1d"),
    },
];

/// Translate a natural-language request into Gmail search syntax
pub fn parse_natural_language_query(query: &str) -> String {
    let lower = query.to_lowercase();

    for rule in RULES {
        let rewritten = match (rule.trigger, rule.rewrite) {
            (Trigger::Keywords(words), Rewrite::Fixed(out)) => words
                .iter()
                .any(|w| lower.contains(w))
                .then(|| out.to_string()),
            (Trigger::Operator(op), Rewrite::Passthrough) => {
                operator_value(query, op).map(|value| format!("{}{}", op, value))
            }
            (Trigger::Operator(op), Rewrite::Fixed(out)) => {
                operator_value(query, op).map(|_| out.to_string())
            }
            (Trigger::Keywords(_), Rewrite::Passthrough) => None,
        };

        if let Some(rewritten) = rewritten {
            return rewritten;
        }
    }

    query.to_string()
}

/// Value following the first ASCII-case-insensitive occurrence of `op`
fn operator_value<'a>(query: &'a str, op: &str) -> Option<&'a str> {
    let start = query.char_indices().map(|(i, _)| i).find(|&i| {
        query
            .get(i..i + op.len())
            .map_or(false, |s| s.eq_ignore_ascii_case(op))
    })?;

    let rest = &query[start + op.len()..];
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let value = &rest[..end];
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_rules() {
        assert_eq!(parse_natural_language_query("show me UNREAD mail"), "is:unread");
        assert_eq!(parse_natural_language_query("重要的郵件"), "is:important");
        assert_eq!(parse_natural_language_query("starred stuff"), "is:starred");
        assert_eq!(parse_natural_language_query("my Revolut payments"), "from:revolut OR subject:receipt");
        assert_eq!(parse_natural_language_query("mail from today"), "newer_than:1d");
        assert_eq!(parse_natural_language_query("yesterday"), "newer_than:2d older_than:1d");
    }

    #[test]
    fn test_operator_rules_keep_original_case_of_value() {
        assert_eq!(parse_natural_language_query("emails From:Alice@Example.com please"), "from:Alice@Example.com");
        assert_eq!(parse_natural_language_query("to:bob@example.com"), "to:bob@example.com");
        assert_eq!(parse_natural_language_query("subject:invoice 2024"), "subject:invoice");
    }

    #[test]
    fn test_rules_apply_in_order() {
        // "unread" outranks every later rule.
        assert_eq!(parse_natural_language_query("unread from:alice today"), "is:unread");
        // An operator outranks date keywords.
        assert_eq!(parse_natural_language_query("from:alice today"), "from:alice");
    }

    #[test]
    fn test_operator_without_value_falls_through() {
        assert_eq!(parse_natural_language_query("from: today"), "newer_than:1d");
    }

    #[test]
    fn test_unrecognized_query_is_unchanged() {
        assert_eq!(parse_natural_language_query("label:work has:attachment"), "label:work has:attachment");
    }
}
