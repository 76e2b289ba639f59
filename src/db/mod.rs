pub mod helpers;
pub mod index;
mod migrations;
pub mod models;
pub mod repositories;
pub mod sqlite;

pub use index::{IndexDocument, IndexStore, StorageIndexStore, INDEX_VERSION};
pub use repositories::{BaselineRepository, ImageMetadata};
pub use sqlite::SqliteIndexStore;
