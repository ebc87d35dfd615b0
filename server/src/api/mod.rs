//! # HTTP Layer
//!
//! The API surface of the server:
//!
//! ```text
//! api/
//! ├── dto.rs        - Request/response shapes (+ validation rules)
//! ├── extractors.rs - Bearer-session extractor with permission helpers
//! ├── handlers.rs   - Route handlers (thin; logic lives in services)
//! └── routes.rs     - URL table
//! ```

pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod routes;
