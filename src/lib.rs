pub mod artifacts;
pub mod browser;
pub mod core;
pub mod notify;
pub mod probe;

// --- Primary core exports ---
pub use self::core::config;
pub use self::core::types;
pub use self::core::types::*;
