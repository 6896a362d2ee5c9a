//! Exposes the resources deimos owns or borrows: images used as attachments, and a cache for
//! resources shared between several owners.

pub mod image;
pub mod shared_cache;
