pub mod history;
pub mod surreal;

pub use history::{HistoryStore, InMemoryHistoryStore};
pub use surreal::SurrealHistoryStore;
