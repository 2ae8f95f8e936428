//! Módulo de hashing, canonicalización JSON y derivación de sub-semillas.

pub mod canonical_json;
pub mod hash;
pub mod seed;

pub use canonical_json::to_canonical_json;
pub use hash::{hash_str, hash_value};
pub use seed::sub_seed;
