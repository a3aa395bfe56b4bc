//! # tmws-storage
//!
//! Persistence for TMWS. Owns the SQLite connection; exposes typed,
//! transactional operations only; callers never pass query fragments.
//! Embeddings are stored as little-endian `f32` BLOBs and ranked by
//! cosine similarity at query time.

pub mod agents;
pub mod memories;
pub mod store;

pub use memories::RecallOrder;
pub use store::MemoryStore;
