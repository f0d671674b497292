//! `${name:default}` environment substitution for database connection URLs.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:([^}]*))?\}")
        .expect("placeholder regex is valid");
}

/// Resolves every `${NAME:default}` (or `${NAME}`) occurrence in `input` against
/// the process environment, falling back to the literal default text when the
/// variable is unset. A variable with neither an environment value nor a
/// default is left substituted with an empty string.
pub fn substitute(input: &str) -> String {
    PLACEHOLDER
        .replace_all(input, |caps: &regex::Captures| {
            let name = &caps[1];
            let default = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            std::env::var(name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_from_environment() {
        std::env::set_var("CORDAL_TEST_HOST", "db.example.com");
        let resolved = substitute("postgres://${CORDAL_TEST_HOST:localhost}/app");
        assert_eq!(resolved, "postgres://db.example.com/app");
        std::env::remove_var("CORDAL_TEST_HOST");
    }

    #[test]
    fn falls_back_to_default_when_unset() {
        std::env::remove_var("CORDAL_TEST_UNSET");
        let resolved = substitute("postgres://${CORDAL_TEST_UNSET:localhost}/app");
        assert_eq!(resolved, "postgres://localhost/app");
    }

    #[test]
    fn leaves_non_placeholder_text_untouched() {
        assert_eq!(substitute("no placeholders here"), "no placeholders here");
    }

    #[test]
    fn missing_default_resolves_to_empty_string() {
        std::env::remove_var("CORDAL_TEST_NO_DEFAULT");
        assert_eq!(substitute("${CORDAL_TEST_NO_DEFAULT}"), "");
    }
}
