//! `${{ expr }}` substitution

use regex::{Captures, Regex};
use std::sync::OnceLock;

fn expression_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\$\{\{\s*(.*?)\s*\}\}").expect("expression regex is valid")
    })
}

/// Source of values for expressions such as `matrix.python`
pub trait ExpressionResolver {
    /// Resolve a trimmed expression, None when it is unknown
    fn resolve(&self, expr: &str) -> Option<String>;
}

/// Replace every `${{ expr }}` in `template`.
///
/// Unknown expressions render as empty strings and are reported through
/// `on_unknown`.
pub fn render<R, F>(template: &str, resolver: &R, mut on_unknown: F) -> String
where
    R: ExpressionResolver + ?Sized,
    F: FnMut(&str),
{
    expression_regex()
        .replace_all(template, |caps: &Captures| {
            let expr = caps[1].trim();
            match resolver.resolve(expr) {
                Some(value) => value,
                None => {
                    on_unknown(expr);
                    String::new()
                }
            }
        })
        .into_owned()
}

/// Split `root.rest` into its parts, e.g. `matrix.python` → (`matrix`, `python`)
pub fn split_path(expr: &str) -> Option<(&str, &str)> {
    expr.split_once('.')
        .map(|(root, rest)| (root.trim(), rest.trim()))
}
