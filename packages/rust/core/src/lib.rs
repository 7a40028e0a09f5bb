//! Core pipelines and domain logic for Localvore.
//!
//! This crate ties the scraper and the document store together into
//! end-to-end workflows: the Recipe1M ETL, ingredient cleanup,
//! vectorization, nearest-neighbour recommendation, DBSCAN menus, and the
//! HTTP menu API.

pub mod api;
pub mod clustering;
pub mod etl;
pub mod pipeline;
pub mod text;
pub mod vectorize;

pub use clustering::{NearestNeighbors, Sample, create_samples, dbscan};
pub use pipeline::{
    ClusterParams, MenuRequest, ProgressReporter, SilentProgress, backend_query, cluster_menu,
    export_query, recommend, scrape_site,
};
pub use vectorize::{HashingVectorizer, Vectorizer, WordVectors, load_vectorizer};
