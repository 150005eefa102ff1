pub mod truth;
pub mod validity;

// Re-export types for convenience.
pub use crate::types::truth::Truth;
pub use crate::types::validity::Validity;
