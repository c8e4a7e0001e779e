pub mod store;

pub use store::SqliteTaskStore;
