//! Selector-driven extraction of recipe links and recipe posts from HTML.

use std::collections::HashSet;

use localvore_shared::{LocalvoreError, RecipePost, Result, SiteTags};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::text::{slugify, squash_text, strip_details};

/// A [`SiteTags`] map with every selector parsed once up front.
#[derive(Debug, Clone)]
pub struct CompiledTags {
    pub tags: SiteTags,
    root: Url,
    nav_title: Selector,
    title: Selector,
    ingredients: Selector,
    category: Option<Selector>,
    full_recipe: Option<Selector>,
    instructions: Option<Selector>,
    notes: Option<Selector>,
    keywords: Option<Selector>,
    cost: Option<Selector>,
    rating: Option<Selector>,
}

impl CompiledTags {
    /// Parse every selector in `tags`; any invalid selector is a parse error.
    pub fn new(tags: &SiteTags) -> Result<Self> {
        let root = Url::parse(&tags.root_url).map_err(|e| {
            LocalvoreError::config(format!("site '{}' root_url: {e}", tags.name))
        })?;

        Ok(Self {
            tags: tags.clone(),
            root,
            nav_title: selector(&tags.nav_title)?,
            title: selector(&tags.title)?,
            ingredients: selector(&tags.ingredients)?,
            category: optional_selector(tags.category.as_deref())?,
            full_recipe: optional_selector(tags.full_recipe.as_deref())?,
            instructions: optional_selector(tags.instructions.as_deref())?,
            notes: optional_selector(tags.notes.as_deref())?,
            keywords: optional_selector(tags.keywords.as_deref())?,
            cost: optional_selector(tags.cost.as_deref())?,
            rating: optional_selector(tags.rating.as_deref())?,
        })
    }

    /// Site root URL.
    pub fn root(&self) -> &Url {
        &self.root
    }

    /// Recipe URLs listed on an index page, in page order without duplicates.
    ///
    /// Each `nav_title` match yields its own `href` when it is an anchor, else the
    /// first descendant anchor, else the slugified entry text under the site root.
    pub fn recipe_links(&self, html: &str, page_url: &Url) -> Vec<Url> {
        let doc = Html::parse_document(html);
        let anchor = Selector::parse("a[href]").expect("valid selector");
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for entry in doc.select(&self.nav_title) {
            let href = if entry.value().name() == "a" {
                entry.value().attr("href")
            } else {
                entry
                    .select(&anchor)
                    .next()
                    .and_then(|a| a.value().attr("href"))
            };

            let resolved = match href {
                Some(href) if !href.starts_with('#') && !href.starts_with("javascript:") => {
                    page_url.join(href).ok()
                }
                Some(_) => None,
                None => {
                    let slug = slugify(&squash_text(entry.text()));
                    if slug.is_empty() {
                        None
                    } else {
                        self.root.join(&format!("/{slug}")).ok()
                    }
                }
            };

            if let Some(mut url) = resolved {
                url.set_fragment(None);
                if seen.insert(url.to_string()) {
                    links.push(url);
                }
            }
        }

        links
    }

    /// Build a post from a recipe page. Returns `None` when no ingredients are found.
    pub fn make_post(&self, html: &str, url: &Url) -> Option<RecipePost> {
        let doc = Html::parse_document(html);
        let root = doc.root_element();
        // Recipe-card fields are looked up inside the full-recipe container when present.
        let card = self
            .full_recipe
            .as_ref()
            .and_then(|sel| doc.select(sel).next())
            .unwrap_or(root);

        let raw_ingredients: Vec<String> = card
            .select(&self.ingredients)
            .map(|el| squash_text(el.text()))
            .filter(|s| !s.is_empty())
            .collect();
        let ingredients = strip_details(&raw_ingredients);
        if ingredients.is_empty() {
            return None;
        }

        let title = first_text(root, &self.title)
            .or_else(|| {
                let sel = Selector::parse("title").expect("valid selector");
                first_text(root, &sel)
            })
            .unwrap_or_else(|| slug_of(url));

        let keywords = self
            .keywords
            .as_ref()
            .and_then(|sel| first_text(card, sel))
            .map(|text| {
                text.split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let instructions = self.instructions.as_ref().and_then(|sel| {
            let steps: Vec<String> = card
                .select(sel)
                .map(|el| squash_text(el.text()))
                .filter(|s| !s.is_empty())
                .collect();
            (!steps.is_empty()).then(|| steps.join("\n"))
        });

        Some(RecipePost {
            title,
            url: url.to_string(),
            ingredients,
            keywords,
            category: self.category.as_ref().and_then(|sel| first_text(root, sel)),
            cost: self.cost.as_ref().and_then(|sel| first_text(root, sel)),
            rating: self.rating.as_ref().and_then(|sel| first_text(root, sel)),
            instructions,
            notes: self.notes.as_ref().and_then(|sel| first_text(card, sel)),
        })
    }
}

/// Last non-empty path segment of a URL, without an `.html` suffix.
pub fn slug_of(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(|s| s.trim_end_matches(".html").trim_end_matches(".htm").to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "index".to_string())
}

fn first_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope
        .select(sel)
        .map(|el| squash_text(el.text()))
        .find(|s| !s.is_empty())
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| LocalvoreError::parse(format!("invalid selector '{css}': {e}")))
}

fn optional_selector(css: Option<&str>) -> Result<Option<Selector>> {
    css.map(selector).transpose()
}
