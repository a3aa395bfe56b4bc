//! # tmws-service
//!
//! The memory service façade: orchestrates validation, embedding,
//! persistence, access control, and rate limiting behind the tool
//! surface.

pub mod requests;
pub mod service;

pub use requests::{
    CreateMemoryRequest, DeleteMemoryRequest, RecallMemoriesRequest, SearchMemoriesRequest,
    ShareMemoryRequest, UpdateMemoryRequest,
};
pub use service::MemoryService;
