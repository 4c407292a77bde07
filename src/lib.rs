//! MovieLens loader library - shared modules for the ETL binary.

pub mod cache;
pub mod input;
pub mod models;
pub mod normalize;
pub mod omdb;
pub mod pipeline;
pub mod progress;
pub mod safety;
pub mod store;
