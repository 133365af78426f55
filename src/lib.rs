pub mod config;
pub mod core;
pub mod manager;

// Re-export main components for easy access
pub use config::CacheConfig;
pub use self::core::*;
pub use manager::{CacheError, CacheManager};
