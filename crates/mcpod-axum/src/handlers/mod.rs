//! HTTP request handlers for the gateway.
//!
//! Handlers are thin wrappers that delegate to `McpService` or the catalog
//! repository.

pub mod catalog;
pub mod events;
pub mod proxy;
pub mod servers;
