//! Ingredient text cleanup shared by the scrapers and the trim pass.

use std::sync::LazyLock;

use regex::Regex;

/// Innermost parenthesized group, e.g. `(about 2 cups)`.
static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^()]*\)").expect("valid regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Remove parenthesized details and everything after the first comma.
///
/// `"2 cups flour (all purpose), sifted"` becomes `"2 cups flour"`.
/// Entries left empty are dropped.
pub fn strip_details<S: AsRef<str>>(ingredients: &[S]) -> Vec<String> {
    ingredients
        .iter()
        .filter_map(|raw| strip_one(raw.as_ref()))
        .collect()
}

fn strip_one(raw: &str) -> Option<String> {
    let no_parens = PARENTHESIZED.replace_all(raw, "");
    // First non-empty comma-separated run, so ", to taste" style leftovers still yield text.
    let head = no_parens.split(',').find(|s| !s.is_empty())?;
    let cleaned = WHITESPACE.replace_all(head.trim(), " ").into_owned();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Generate a URL-safe slug from a title.
pub fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Collapse an element's text nodes into one whitespace-normalized string.
pub(crate) fn squash_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let joined = parts.collect::<Vec<_>>().join(" ");
    WHITESPACE.replace_all(joined.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_parentheses_and_trailing_clauses() {
        let raw = [
            "2 cups flour (all purpose), sifted",
            "1 cup (240ml) milk",
            "salt",
            "1 onion, diced, (about 1 cup)",
        ];
        assert_eq!(
            strip_details(&raw),
            vec!["2 cups flour", "1 cup milk", "salt", "1 onion"]
        );
    }

    #[test]
    fn leading_parenthetical_keeps_following_text() {
        assert_eq!(strip_details(&["(optional), red pepper flakes"]), vec!["red pepper flakes"]);
    }

    #[test]
    fn empty_results_are_dropped() {
        assert!(strip_details(&["(garnish)", ",,", "   "]).is_empty());
    }

    #[test]
    fn nested_parentheses_lose_inner_group_only() {
        assert_eq!(strip_details(&["beans (canned (drained))"]), vec!["beans (canned )"]);
    }

    #[test]
    fn slugify_titles() {
        assert_eq!(slugify("Easy Chili"), "easy-chili");
        assert_eq!(slugify("Crispy Scallion & Asparagus Pizza!"), "crispy-scallion-asparagus-pizza");
    }

    #[test]
    fn squash_text_normalizes_whitespace() {
        let parts = ["  Kale\n", "\t Chips "];
        assert_eq!(squash_text(parts.into_iter()), "Kale Chips");
    }
}
