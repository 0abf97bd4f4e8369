//! kbqa-vector
//!
//! LanceDB-backed vector index: collection management, a batch writer that
//! fills a collection from the corpus, and nearest-neighbour search.

pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use search::LanceVectorIndex;
pub use table::{get_or_create_collection, open_collection, open_db};
pub use writer::LanceCorpusWriter;
