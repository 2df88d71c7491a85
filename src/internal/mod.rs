//! Internal utility modules
//!
//! Pure helpers shared by the acquisition, archive and provider layers.

pub mod cache_key;
pub mod fs_utils;
pub mod hash;
pub mod progress;
pub mod wildcard;
