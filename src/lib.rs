pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod handlers;
pub mod maintenance;
pub mod models;
pub mod orders;
pub mod payment;
pub mod provisioning;
pub mod replies;
pub mod session_store;
pub mod trial;
