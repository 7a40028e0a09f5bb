//! Seasonal guide client, recipe site scrapers, and ingredient text cleanup.
//!
//! This crate provides:
//! - [`seasonal`]: vegetables in season for a state and half-month
//! - [`sites`]: built-in site tag maps and the [`SiteRegistry`]
//! - [`extract`]: selector-driven link and post extraction
//! - [`engine`]: concurrent [`RecipeScraper`]
//! - [`text`]: [`strip_details`] and slug helpers

pub mod engine;
pub mod extract;
pub mod seasonal;
pub mod sites;
pub mod text;

pub use engine::{
    FetchedRecipe, NoProgress, RecipeScraper, ScrapeProgress, ScrapeResult, USER_AGENT,
    compute_hash, page_path,
};
pub use extract::{CompiledTags, slug_of};
pub use seasonal::{SeasonalGuide, parse_veggies, season_slug, state_slug};
pub use sites::{SiteRegistry, budgetbytes, naturallyella};
pub use text::{slugify, strip_details};

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    #[test]
    fn budgetbytes_index_fixture_yields_slug_urls() {
        let tags = CompiledTags::new(&budgetbytes()).unwrap();
        let page = Url::parse(&budgetbytes().index_url(1)).unwrap();
        let links = tags.recipe_links(&load_fixture("bb_index.html"), &page);
        let urls: Vec<&str> = links.iter().map(Url::as_str).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.budgetbytes.com/one-pot-chili-mac",
                "https://www.budgetbytes.com/roasted-cabbage-steaks",
            ]
        );
    }

    #[test]
    fn budgetbytes_recipe_fixture() {
        let tags = CompiledTags::new(&budgetbytes()).unwrap();
        let url = Url::parse("https://www.budgetbytes.com/one-pot-chili-mac").unwrap();
        let post = tags.make_post(&load_fixture("bb_recipe.html"), &url).unwrap();

        assert_eq!(post.title, "One Pot Chili Mac");
        assert_eq!(post.url, url.as_str());
        assert_eq!(post.ingredients, vec!["olive oil", "onion", "kale", "elbow macaroni"]);
        assert_eq!(post.keywords, vec!["chili mac", "one pot"]);
        assert_eq!(post.category.as_deref(), Some("Main Course"));
        assert_eq!(post.cost.as_deref(), Some("$7.52 recipe / $1.25 serving"));
        assert_eq!(post.rating.as_deref(), Some("4.86 from 49 votes"));
        assert_eq!(post.notes.as_deref(), Some("Freezes well."));
    }

    #[test]
    fn naturallyella_index_fixture_strips_fragments() {
        let tags = CompiledTags::new(&naturallyella()).unwrap();
        let page = Url::parse(&naturallyella().index_url(1)).unwrap();
        let links = tags.recipe_links(&load_fixture("ne_index.html"), &page);
        assert_eq!(links.len(), 3);
        assert_eq!(
            links[1].as_str(),
            "https://naturallyella.com/kale-salad-with-strawberries/"
        );
    }

    #[test]
    fn registry_tags_compile() {
        let registry = SiteRegistry::default();
        for site in registry.sites() {
            CompiledTags::new(site).unwrap();
        }
    }
}
