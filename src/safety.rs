use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Verdict on a candidate catalog query. Anything that is not provably a
/// single read-only SELECT over the listings relation is Blocked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Safe,
    Blocked(String),
}

impl Verdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Verdict::Safe)
    }
}

/// Statement kinds and auxiliary keywords that can mutate data, alter the
/// schema, or escape the listings relation. Matched on word boundaries
/// after literals and comments have been stripped.
static FORBIDDEN_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "insert", "update", "delete", "drop", "alter", "truncate", "create", "grant", "revoke",
        "copy", "vacuum", "merge", "call", "do", "execute", "set", "into", "comment", "lock",
        "listen", "notify", "reindex", "cluster", "analyze", "prepare", "deallocate",
    ]
    .into_iter()
    .collect()
});

/// Keywords that terminate the relation list of a FROM clause.
static RELATION_LIST_TERMINATORS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "where", "group", "order", "limit", "offset", "having", "on", "union", "intersect",
        "except", "inner", "left", "right", "full", "cross", "join", "as", "using", "natural",
    ]
    .into_iter()
    .collect()
});

const ALLOWED_RELATION: &str = "properties";

/// Classify a candidate query as Safe or Blocked.
///
/// The classifier is lexical and deliberately conservative: it strips string
/// literals and comments, then requires a single statement that starts with
/// SELECT (or WITH ... SELECT), contains no mutating keyword, and reads only
/// from the `properties` relation (CTE names introduced by the query itself
/// are also allowed). Any ambiguity results in Blocked.
pub fn classify(sql: &str) -> Verdict {
    let stripped = strip_literals_and_comments(sql);
    let trimmed = stripped.trim().trim_end_matches(';').trim();

    if trimmed.is_empty() {
        return Verdict::Blocked("empty query".to_string());
    }

    // A ';' after stripping trailing ones means a second statement follows.
    if trimmed.contains(';') {
        return Verdict::Blocked("multiple statements".to_string());
    }

    let tokens = tokenize(trimmed);
    let Some(first) = tokens.first() else {
        return Verdict::Blocked("empty query".to_string());
    };

    match first.as_str() {
        "select" | "with" => {}
        other => {
            return Verdict::Blocked(format!("statement must be a SELECT, found '{}'", other));
        }
    }

    for token in &tokens {
        if FORBIDDEN_KEYWORDS.contains(token.as_str()) {
            return Verdict::Blocked(format!("forbidden keyword '{}'", token));
        }
    }

    check_relations(&tokens)
}

/// Replace string literals and comments with spaces so smuggled keywords
/// inside them neither trigger nor mask a verdict.
fn strip_literals_and_comments(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            // Single-quoted literal, '' is an escaped quote.
            '\'' => {
                out.push(' ');
                i += 1;
                while i < chars.len() {
                    if chars[i] == '\'' {
                        if i + 1 < chars.len() && chars[i + 1] == '\'' {
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            // Line comment.
            '-' if i + 1 < chars.len() && chars[i + 1] == '-' => {
                out.push(' ');
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            // Block comment. Unterminated comments swallow the rest.
            '/' if i + 1 < chars.len() && chars[i + 1] == '*' => {
                out.push(' ');
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Lowercased word and punctuation tokens in source order. Double-quoted
/// identifiers come out as plain words so quoting cannot hide a relation.
fn tokenize(sql: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    for c in sql.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.' {
            word.push(c.to_ascii_lowercase());
        } else {
            if !word.is_empty() {
                tokens.push(std::mem::take(&mut word));
            }
            if matches!(c, '(' | ')' | ',') {
                tokens.push(c.to_string());
            }
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }

    tokens
}

/// Every relation named after FROM or JOIN must be the listings table or a
/// CTE defined by the query itself. Comma-separated FROM lists are walked
/// so no relation slips in behind the first one.
fn check_relations(tokens: &[String]) -> Verdict {
    // CTE names: word followed by "as" followed by "(".
    let mut cte_names: HashSet<&str> = HashSet::new();
    for window in tokens.windows(3) {
        if window[1] == "as" && window[2] == "(" {
            cte_names.insert(window[0].as_str());
        }
    }

    let relation_allowed = |name: &str| {
        name == ALLOWED_RELATION
            || name == "public.properties"
            || cte_names.contains(name)
    };

    let mut i = 0;
    while i < tokens.len() {
        if tokens[i] == "from" || tokens[i] == "join" {
            let mut j = i + 1;
            // Walk the comma-separated relation list.
            loop {
                match tokens.get(j).map(|t| t.as_str()) {
                    // Subquery: its own FROM is validated by the outer scan.
                    Some("(") => break,
                    Some(name) if !RELATION_LIST_TERMINATORS.contains(name) => {
                        if !relation_allowed(name) {
                            return Verdict::Blocked(format!(
                                "query may only read the '{}' relation, found '{}'",
                                ALLOWED_RELATION, name
                            ));
                        }
                        j += 1;
                        // Skip an optional bare alias.
                        if let Some(next) = tokens.get(j) {
                            if next != ","
                                && next != "("
                                && next != ")"
                                && !RELATION_LIST_TERMINATORS.contains(next.as_str())
                                && next != "from"
                                && next != "join"
                            {
                                j += 1;
                            }
                        }
                        if tokens.get(j).map(|t| t.as_str()) == Some(",") {
                            j += 1;
                            continue;
                        }
                        break;
                    }
                    _ => break,
                }
            }
            i = j;
        } else {
            i += 1;
        }
    }

    Verdict::Safe
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_select_is_safe() {
        assert!(classify("SELECT * FROM properties WHERE price < 3000000 LIMIT 12").is_safe());
    }

    #[test]
    fn select_with_trailing_semicolon_is_safe() {
        assert!(classify("select location, price from properties;").is_safe());
    }

    #[test]
    fn cte_over_properties_is_safe() {
        let sql = "WITH cheap AS (SELECT * FROM properties WHERE price < 1000000) \
                   SELECT location, price FROM cheap ORDER BY price";
        assert!(classify(sql).is_safe());
    }

    #[test]
    fn aliased_table_is_safe() {
        assert!(classify("SELECT p.location FROM properties p WHERE p.bedrooms >= 2").is_safe());
    }

    #[test]
    fn mutating_statements_are_blocked() {
        for sql in [
            "DROP TABLE properties",
            "DELETE FROM properties",
            "UPDATE properties SET price = 0",
            "INSERT INTO properties VALUES (1)",
            "TRUNCATE properties",
            "ALTER TABLE properties ADD COLUMN x int",
            "CREATE TABLE evil (id int)",
        ] {
            assert!(!classify(sql).is_safe(), "should block: {}", sql);
        }
    }

    #[test]
    fn second_statement_is_blocked() {
        let sql = "SELECT * FROM properties; DELETE FROM properties";
        assert!(!classify(sql).is_safe());
    }

    #[test]
    fn keyword_hidden_by_case_is_blocked() {
        assert!(!classify("DeLeTe FROM properties").is_safe());
        assert!(!classify("select * from properties; dRoP table properties").is_safe());
    }

    #[test]
    fn keyword_inside_string_literal_is_allowed() {
        let sql = "SELECT * FROM properties WHERE location = 'drop table users'";
        assert!(classify(sql).is_safe());
    }

    #[test]
    fn comment_cannot_mask_a_second_statement() {
        // The comment is stripped; the DELETE after the newline still counts.
        let sql = "SELECT * FROM properties -- harmless\n; DELETE FROM properties";
        assert!(!classify(sql).is_safe());
    }

    #[test]
    fn select_into_is_blocked() {
        assert!(!classify("SELECT * INTO backup FROM properties").is_safe());
    }

    #[test]
    fn foreign_relation_is_blocked() {
        assert!(!classify("SELECT * FROM users").is_safe());
        assert!(!classify("SELECT * FROM properties JOIN users ON true").is_safe());
        assert!(!classify("SELECT * FROM properties, pg_shadow").is_safe());
    }

    #[test]
    fn union_with_foreign_relation_is_blocked() {
        let sql = "SELECT location FROM properties UNION SELECT usename FROM pg_user";
        assert!(!classify(sql).is_safe());
    }

    #[test]
    fn empty_and_non_select_are_blocked() {
        assert!(!classify("").is_safe());
        assert!(!classify("   ;  ").is_safe());
        assert!(!classify("EXPLAIN SELECT * FROM properties").is_safe());
    }

    #[test]
    fn smuggling_attempts_never_pass() {
        // Mutation keywords wrapped in every disguise we strip must still
        // block when they sit outside a literal, and never unblock writes.
        let attempts = [
            "SELECT * FROM properties WHERE id = 1; drop table properties --",
            "/* DELETE */ DELETE FROM properties",
            "WITH x AS (DELETE FROM properties RETURNING *) SELECT * FROM x",
            "SELECT * FROM properties WHERE location = 'x'; TRUNCATE properties",
            "select * from properties union all select * from admin_users",
        ];
        for sql in attempts {
            assert!(!classify(sql).is_safe(), "should block: {}", sql);
        }
    }
}
