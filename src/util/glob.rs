//! Wildcard glob matcher for cache key patterns: `*` matches any run of
//! characters, `?` matches exactly one character. Not a filesystem glob —
//! see the `glob` crate (used by the filesystem config loader) for that.

#[must_use]
pub fn matches(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    matches_from(&pattern, &candidate)
}

fn matches_from(pattern: &[char], candidate: &[char]) -> bool {
    match pattern.split_first() {
        None => candidate.is_empty(),
        Some(('*', rest)) => {
            if matches_from(rest, candidate) {
                return true;
            }
            !candidate.is_empty() && matches_from(pattern, &candidate[1..])
        }
        Some(('?', rest)) => !candidate.is_empty() && matches_from(rest, &candidate[1..]),
        Some((c, rest)) => {
            candidate.first() == Some(c) && matches_from(rest, &candidate[1..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_any_run() {
        assert!(matches("user:*", "user:42:profile"));
        assert!(matches("user:42:*", "user:42:profile"));
        assert!(!matches("user:42:*", "user:43:profile"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        assert!(matches("a?c", "abc"));
        assert!(!matches("a?c", "abbc"));
    }

    #[test]
    fn exact_match_with_no_wildcards() {
        assert!(matches("exact", "exact"));
        assert!(!matches("exact", "exacts"));
    }
}
