pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod memory_adapters;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod types;
pub mod validate;

pub use config::*;
pub use coordinator::*;
pub use error::*;
pub use events::*;
pub use memory_adapters::*;
pub use protocol::*;
pub use registry::*;
pub use router::*;
pub use types::*;
pub use validate::*;
