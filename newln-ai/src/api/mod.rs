//! HTTP API handlers for newln-ai
//!
//! Thin wrapper over the generation pipeline: material submission, lookup,
//! listing, editing and deletion, status polling, an SSE progress stream and
//! tutor chat.

pub mod chat;
pub mod health;
pub mod materials;
pub mod sse;

pub use chat::chat_routes;
pub use health::health_routes;
pub use materials::material_routes;
pub use sse::material_event_stream;
