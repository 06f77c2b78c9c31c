//! Direct messaging between two users of the marketplace.
//!
//! Messages are durable rows in PostgreSQL. New rows are announced on a
//! change feed, and every open [`session::ConversationSession`] keeps a
//! gap-free, duplicate-free view of one conversation by reconciling history,
//! its own sends and live deliveries.

pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod reconciler;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
