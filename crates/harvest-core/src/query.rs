//! JQL predicate construction for hierarchy levels.
//!
//! Every function here is pure: it turns a hierarchy level plus filter values
//! into a [`Predicate`] string and performs no I/O. All literal values are
//! emitted as double-quoted JQL strings with `\` and `"` escaped, so keys,
//! type names and labels containing spaces or quotes cannot break the query.

use std::fmt;

/// A rendered JQL query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Predicate(String);

impl Predicate {
    /// Wraps an already-rendered query string.
    pub fn new(jql: impl Into<String>) -> Self {
        Self(jql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Checks that quotes and parentheses are balanced.
    ///
    /// Backslash escapes inside quoted strings are honoured, and parentheses
    /// inside quoted strings are ignored.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.0.trim().is_empty() {
            return Err(QueryError::Empty);
        }
        let mut in_quote = false;
        let mut escaped = false;
        let mut depth: i32 = 0;
        for c in self.0.chars() {
            if in_quote {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_quote = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '"' => in_quote = true,
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(QueryError::UnbalancedParentheses(self.0.clone()));
                    }
                }
                _ => {}
            }
        }
        if in_quote {
            return Err(QueryError::UnbalancedQuotes(self.0.clone()));
        }
        if depth != 0 {
            return Err(QueryError::UnbalancedParentheses(self.0.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Predicate {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors from building or validating a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("query is empty")]
    Empty,

    #[error("unbalanced quotes in query: {0}")]
    UnbalancedQuotes(String),

    #[error("unbalanced parentheses in query: {0}")]
    UnbalancedParentheses(String),

    /// The root criteria name no issue types to search for.
    #[error("root criteria must name at least one issue type")]
    NoRootTypes,
}

/// Filter values for the top level of the hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootCriteria {
    /// Project keys to search (empty = any project).
    pub projects: Vec<String>,
    /// Names of the root issue types.
    pub type_names: Vec<String>,
    /// Labels a root must carry (empty = no label filter).
    pub labels: Vec<String>,
}

/// Builds predicates for each level of a harvest.
pub struct QueryBuilder;

impl QueryBuilder {
    /// Predicate selecting the top-level issues of a harvest.
    pub fn root_predicate(criteria: &RootCriteria) -> Result<Predicate, QueryError> {
        if criteria.type_names.is_empty() {
            return Err(QueryError::NoRootTypes);
        }
        let mut clauses = Vec::with_capacity(3);
        if !criteria.projects.is_empty() {
            clauses.push(format!("project in ({})", quote_list(&criteria.projects)));
        }
        clauses.push(format!("type in ({})", quote_list(&criteria.type_names)));
        if let Some(clause) = label_clause(&criteria.labels) {
            clauses.push(clause);
        }
        Ok(Predicate(clauses.join(" AND ")))
    }

    /// Predicate selecting the direct children of `parent_key` restricted to
    /// the given type names. Returns `None` when there are no child types,
    /// since such a level can never match anything.
    pub fn child_predicate<S: AsRef<str>>(
        parent_key: &str,
        child_type_names: &[S],
    ) -> Option<Predicate> {
        if child_type_names.is_empty() {
            return None;
        }
        Some(Predicate(format!(
            "parent = {} AND type in ({})",
            quote(parent_key),
            quote_list(child_type_names)
        )))
    }

    /// Predicate selecting the issues assigned to one team member.
    pub fn assignee_predicate<S: AsRef<str>>(assignee: &str, labels: &[S]) -> Predicate {
        let mut jql = format!("assignee = {}", quote(assignee));
        if let Some(clause) = label_clause(labels) {
            jql.push_str(" AND ");
            jql.push_str(&clause);
        }
        Predicate(jql)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Renders `value` as a double-quoted JQL string literal.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn quote_list<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|v| quote(v.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn label_clause<S: AsRef<str>>(labels: &[S]) -> Option<String> {
    match labels {
        [] => None,
        [one] => Some(format!("labels = {}", quote(one.as_ref()))),
        many => Some(format!("labels in ({})", quote_list(many))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn root_predicate_full() {
        let criteria = RootCriteria {
            projects: vec!["PV".into(), "OPS".into()],
            type_names: vec!["Product Version".into()],
            labels: vec!["cpa".into()],
        };
        let p = QueryBuilder::root_predicate(&criteria).unwrap();
        insta::assert_snapshot!(
            p.as_str(),
            @r#"project in ("PV", "OPS") AND type in ("Product Version") AND labels = "cpa""#
        );
        p.validate().unwrap();
    }

    #[test]
    fn root_predicate_without_projects_or_labels() {
        let criteria = RootCriteria {
            type_names: vec!["Initiative".into()],
            ..Default::default()
        };
        let p = QueryBuilder::root_predicate(&criteria).unwrap();
        assert_eq!(p.as_str(), r#"type in ("Initiative")"#);
    }

    #[test]
    fn root_predicate_requires_types() {
        let err = QueryBuilder::root_predicate(&RootCriteria::default()).unwrap_err();
        assert_eq!(err, QueryError::NoRootTypes);
    }

    #[test]
    fn child_predicate_lists_types() {
        let p = QueryBuilder::child_predicate("PV-1", &["Feature", "Customer Adoption"]).unwrap();
        insta::assert_snapshot!(
            p.as_str(),
            @r#"parent = "PV-1" AND type in ("Feature", "Customer Adoption")"#
        );
    }

    #[test]
    fn child_predicate_empty_types_is_none() {
        let none: [&str; 0] = [];
        assert!(QueryBuilder::child_predicate("PV-1", &none).is_none());
    }

    #[test]
    fn assignee_predicate_with_labels() {
        let p = QueryBuilder::assignee_predicate("alice@example.com", &["a", "b"]);
        assert_eq!(
            p.as_str(),
            r#"assignee = "alice@example.com" AND labels in ("a", "b")"#
        );
        let none: [&str; 0] = [];
        let p = QueryBuilder::assignee_predicate("bob", &none);
        assert_eq!(p.as_str(), r#"assignee = "bob""#);
    }

    #[test]
    fn values_are_escaped() {
        assert_eq!(quote(r#"say "hi""#), r#""say \"hi\"""#);
        assert_eq!(quote(r"back\slash"), r#""back\\slash""#);

        let p = QueryBuilder::child_predicate(r#"X" OR project = "Y"#, &["Ta(sk"]).unwrap();
        assert_eq!(
            p.as_str(),
            r#"parent = "X\" OR project = \"Y" AND type in ("Ta(sk")"#
        );
        p.validate().unwrap();
    }

    #[test]
    fn validate_detects_imbalance() {
        assert_eq!(Predicate::new("   ").validate(), Err(QueryError::Empty));
        assert!(matches!(
            Predicate::new(r#"parent = "X"#).validate(),
            Err(QueryError::UnbalancedQuotes(_))
        ));
        assert!(matches!(
            Predicate::new(r#"type in ("A""#).validate(),
            Err(QueryError::UnbalancedParentheses(_))
        ));
        assert!(matches!(
            Predicate::new(r#"type in "A")"#).validate(),
            Err(QueryError::UnbalancedParentheses(_))
        ));
        Predicate::new(r#"summary ~ "a \" ( b""#).validate().unwrap();
    }
}
