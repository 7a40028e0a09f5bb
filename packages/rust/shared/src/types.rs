//! Core domain types for Localvore recipe collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RecipeId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for recipe document identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipeId(pub Uuid);

impl RecipeId {
    /// Generate a new time-sortable recipe identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RecipeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecipeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecipeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Recipe
// ---------------------------------------------------------------------------

/// A recipe document as stored in a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    /// Unique document identifier.
    pub id: RecipeId,
    /// Owning collection (e.g. `BB`, `recipe1M`, `Epi`).
    pub collection: String,
    /// Identifier from the upstream dataset, if any (Recipe1M `id`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Recipe title.
    pub title: String,
    /// Page the recipe was scraped from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Cleaned ingredient names.
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Average word vector of the ingredient list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recipe {
    /// Create an empty document in `collection` with the given title.
    pub fn new(collection: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RecipeId::new(),
            collection: collection.into(),
            source_id: None,
            title: title.into(),
            url: None,
            ingredients: Vec::new(),
            categories: Vec::new(),
            keywords: Vec::new(),
            cost: None,
            rating: None,
            instructions: None,
            notes: None,
            vector: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a document from a scraped post.
    pub fn from_post(collection: impl Into<String>, post: RecipePost) -> Self {
        let mut recipe = Self::new(collection, post.title);
        recipe.url = Some(post.url);
        recipe.ingredients = post.ingredients;
        recipe.keywords = post.keywords;
        recipe.categories = post.category.into_iter().collect();
        recipe.cost = post.cost;
        recipe.rating = post.rating;
        recipe.instructions = post.instructions;
        recipe.notes = post.notes;
        recipe
    }
}

// ---------------------------------------------------------------------------
// RecipePost
// ---------------------------------------------------------------------------

/// Fields extracted from a single recipe page, before storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipePost {
    pub title: String,
    pub url: String,
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// TermField
// ---------------------------------------------------------------------------

/// Which list field of a recipe a term query matches against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermField {
    #[default]
    Ingredients,
    Categories,
    Keywords,
}

impl TermField {
    /// Stable name used in the database term index.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingredients => "ingredient",
            Self::Categories => "category",
            Self::Keywords => "keyword",
        }
    }
}

impl std::fmt::Display for TermField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TermField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ingredients" | "ingredient" => Ok(Self::Ingredients),
            "categories" | "category" => Ok(Self::Categories),
            "keywords" | "keyword" => Ok(Self::Keywords),
            other => Err(format!(
                "unknown field '{other}': expected ingredients, categories, or keywords"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// SiteTags
// ---------------------------------------------------------------------------

/// CSS selector map describing how to scrape one recipe site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteTags {
    /// Site name; also the collection posts are written to.
    pub name: String,
    /// Site root, e.g. `https://naturallyella.com`.
    pub root_url: String,
    /// Index page template relative to the root; `{page}` is replaced by the page number.
    #[serde(default = "default_index_path")]
    pub index_path: String,
    /// Last index page to visit. Unbounded (until a 404) when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<u32>,
    /// Selector of recipe entries on an index page.
    pub nav_title: String,
    /// Selector of the recipe title on a recipe page.
    pub title: String,
    /// Selector of each ingredient on a recipe page.
    pub ingredients: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_recipe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
}

fn default_index_path() -> String {
    "/recipes/page/{page}/".into()
}

impl SiteTags {
    /// URL of index page `page` (1-based).
    pub fn index_url(&self, page: u32) -> String {
        let path = self.index_path.replace("{page}", &page.to_string());
        format!("{}{}", self.root_url.trim_end_matches('/'), path)
    }
}
