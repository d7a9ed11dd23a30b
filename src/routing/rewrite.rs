//! Path rewriting.
//!
//! A pure function applying a rule's ordered `(match_expr, replacement)`
//! regex substitutions to a path. Captured parameters (including `:version`
//! for dynamic rules) are substituted into both the expression and the
//! replacement before each step runs, so the same inputs always yield the
//! same rewritten path.

use std::collections::HashMap;

use regex::Regex;

/// Apply the rewrite steps to `path`, in order.
///
/// Each step substitutes the first regex match, mirroring the single-shot
/// substitution semantics of the rule tables. Captured values are treated
/// as literals on both sides: regex-escaped in the expression, `$`-escaped
/// in the replacement, so a path segment can never inject pattern syntax
/// or a capture reference. An expression that fails to compile skips that
/// step; static expressions are compile-checked by config validation.
pub fn rewrite(path: &str, steps: &[(String, String)], params: &HashMap<String, String>) -> String {
    let mut current = path.to_string();
    for (expr, replacement) in steps {
        let expr = substitute_params(expr, params, |v| regex::escape(v));
        let replacement = substitute_params(replacement, params, |v| v.replace('$', "$$"));
        match Regex::new(&expr) {
            Ok(re) => {
                current = re.replace(&current, replacement.as_str()).into_owned();
            }
            Err(e) => {
                tracing::warn!(expr = %expr, error = %e, "Skipping invalid rewrite step");
            }
        }
    }
    current
}

/// Replace every `:name` occurrence with its captured value, run through
/// `escape` so the value lands as a literal in its target context.
///
/// Longer names are substituted first so `:version` is never clobbered by a
/// shorter parameter that happens to prefix it.
fn substitute_params(
    template: &str,
    params: &HashMap<String, String>,
    escape: impl Fn(&str) -> String,
) -> String {
    if params.is_empty() || !template.contains(':') {
        return template.to_string();
    }

    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort_by_key(|k| std::cmp::Reverse(k.len()));

    let mut result = template.to_string();
    for key in keys {
        result = result.replace(&format!(":{key}"), &escape(&params[key]));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_params() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn empty_steps_leave_path_untouched() {
        assert_eq!(rewrite("/api/v1/companies", &[], &no_params()), "/api/v1/companies");
    }

    #[test]
    fn steps_apply_in_order() {
        let steps = vec![
            ("^/api/v1".to_string(), "/internal".to_string()),
            ("/internal/companies".to_string(), "/internal/orgs".to_string()),
        ];
        assert_eq!(
            rewrite("/api/v1/companies", &steps, &no_params()),
            "/internal/orgs"
        );
    }

    #[test]
    fn params_substitute_into_both_sides() {
        let mut params = HashMap::new();
        params.insert("version".to_string(), "v2".to_string());
        params.insert("id".to_string(), "42".to_string());

        let steps = vec![(
            "^/api/:version/persons/:id$".to_string(),
            "/persons-service/:version/:id".to_string(),
        )];
        assert_eq!(
            rewrite("/api/v2/persons/42", &steps, &params),
            "/persons-service/v2/42"
        );
    }

    #[test]
    fn capture_group_references_work() {
        let steps = vec![("^/api/v1/(.*)$".to_string(), "/v1/$1".to_string())];
        assert_eq!(
            rewrite("/api/v1/companies/7", &steps, &no_params()),
            "/v1/companies/7"
        );
    }

    #[test]
    fn rewrite_is_a_pure_function() {
        let mut params = HashMap::new();
        params.insert("version".to_string(), "v3".to_string());
        let steps = vec![("^/api/:version".to_string(), "/:version".to_string())];

        let first = rewrite("/api/v3/foo", &steps, &params);
        let second = rewrite("/api/v3/foo", &steps, &params);
        assert_eq!(first, second);
        assert_eq!(first, "/v3/foo");
    }

    #[test]
    fn param_values_with_regex_metacharacters_stay_literal() {
        let mut params = HashMap::new();
        params.insert("version".to_string(), "v1(".to_string());

        let steps = vec![("^/api/:version".to_string(), "/:version".to_string())];
        assert_eq!(rewrite("/api/v1(/foo", &steps, &params), "/v1(/foo");
    }

    #[test]
    fn dollar_in_param_value_is_not_a_capture_reference() {
        let mut params = HashMap::new();
        params.insert("name".to_string(), "$1".to_string());

        let steps = vec![("^/files/:name$".to_string(), "/:name".to_string())];
        assert_eq!(rewrite("/files/$1", &steps, &params), "/$1");
    }

    #[test]
    fn longer_param_names_substitute_first() {
        let mut params = HashMap::new();
        params.insert("v".to_string(), "SHORT".to_string());
        params.insert("version".to_string(), "v2".to_string());

        let steps = vec![("^/api/:version/x$".to_string(), "/:version".to_string())];
        assert_eq!(rewrite("/api/v2/x", &steps, &params), "/v2");
    }
}
