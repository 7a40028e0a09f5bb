//! Built-in recipe site tag maps and the registry that resolves them.
//!
//! Each site is described by a [`SiteTags`] selector map. Presets cover the
//! sites Localvore knows out of the box; `[[sites]]` entries from the config
//! are layered on top and replace a preset with the same name.

use localvore_shared::{LocalvoreError, Result, SiteTags};

/// BudgetBytes (WP Recipe Maker markup). Recipe URLs are `root/<slugified title>`.
pub fn budgetbytes() -> SiteTags {
    SiteTags {
        name: "BB".into(),
        root_url: "https://www.budgetbytes.com".into(),
        index_path: "/category/recipes/page/{page}".into(),
        pagination: None,
        nav_title: "h4.title".into(),
        title: "h1.title".into(),
        ingredients: "span.wprm-recipe-ingredient-name".into(),
        category: Some("span.wprm-recipe-course".into()),
        full_recipe: None,
        instructions: Some("div.wprm-recipe-instruction-text".into()),
        notes: Some("div.wprm-recipe-notes".into()),
        keywords: Some("span.wprm-recipe-keyword".into()),
        cost: Some("span.wprm-recipe-recipe_cost".into()),
        rating: Some("div.wprm-recipe-rating-details".into()),
    }
}

/// Naturally Ella (Tasty Recipes markup).
pub fn naturallyella() -> SiteTags {
    SiteTags {
        name: "NE".into(),
        root_url: "https://naturallyella.com".into(),
        index_path: "/recipes/page/{page}/".into(),
        pagination: Some(2),
        nav_title: "h2.entry-title".into(),
        title: "h1.entry-title".into(),
        ingredients: "div.tasty-recipes-ingredients li".into(),
        category: Some("span.tasty-recipes-category".into()),
        full_recipe: Some("div.tasty-recipes-entry-content".into()),
        instructions: Some("div.tasty-recipes-instructions li".into()),
        notes: Some("div.tasty-recipes-notes".into()),
        keywords: Some("em".into()),
        cost: None,
        rating: None,
    }
}

/// Preset aliases, so `scrape budgetbytes` and `scrape BB` both work.
const ALIASES: &[(&str, &str)] = &[("budgetbytes", "BB"), ("naturallyella", "NE")];

/// Holds known site tag maps: presets first, then config overrides.
pub struct SiteRegistry {
    sites: Vec<SiteTags>,
}

impl SiteRegistry {
    /// Create a registry from the built-in presets plus `overrides` from config.
    pub fn new(overrides: &[SiteTags]) -> Self {
        let mut sites = vec![budgetbytes(), naturallyella()];
        for site in overrides {
            match sites.iter_mut().find(|s| s.name == site.name) {
                Some(existing) => *existing = site.clone(),
                None => sites.push(site.clone()),
            }
        }
        Self { sites }
    }

    /// Resolve a site by collection name or preset alias (case-insensitive).
    pub fn get(&self, name: &str) -> Result<&SiteTags> {
        let wanted = ALIASES
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
            .map(|(_, target)| *target)
            .unwrap_or(name);

        self.sites
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                LocalvoreError::validation(format!(
                    "unknown site '{name}': known sites are {}",
                    self.names().join(", ")
                ))
            })
    }

    /// All site names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.sites.iter().map(|s| s.name.as_str()).collect()
    }

    /// All registered sites.
    pub fn sites(&self) -> &[SiteTags] {
        &self.sites
    }
}

impl Default for SiteRegistry {
    fn default() -> Self {
        Self::new(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_presets_by_alias_and_name() {
        let registry = SiteRegistry::default();
        assert_eq!(registry.get("budgetbytes").unwrap().name, "BB");
        assert_eq!(registry.get("bb").unwrap().name, "BB");
        assert_eq!(registry.get("NaturallyElla").unwrap().pagination, Some(2));
    }

    #[test]
    fn config_entry_replaces_preset() {
        let mut custom = naturallyella();
        custom.pagination = Some(5);
        let registry = SiteRegistry::new(&[custom]);
        assert_eq!(registry.get("NE").unwrap().pagination, Some(5));
        assert_eq!(registry.names(), vec!["BB", "NE"]);
    }

    #[test]
    fn unknown_site_lists_known_names() {
        let registry = SiteRegistry::default();
        let err = registry.get("epicurious").unwrap_err();
        assert!(err.to_string().contains("BB, NE"));
    }

    #[test]
    fn preset_index_urls() {
        assert_eq!(
            budgetbytes().index_url(3),
            "https://www.budgetbytes.com/category/recipes/page/3"
        );
        assert_eq!(
            naturallyella().index_url(1),
            "https://naturallyella.com/recipes/page/1/"
        );
    }
}
