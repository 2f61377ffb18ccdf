//! # Storefront payment server
//! This crate hosts the HTTP face of the storefront payment engine. It is responsible for:
//! * Starting mobile-money checkouts on behalf of authenticated shoppers.
//! * Receiving payment confirmations from the gateway callback and the SMS relay, and handing them to the
//!   reconciliation engine.
//! * Answering payment status polls, order queries, coupon checks and store settings requests.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Identity
//! Shoppers are authenticated by an upstream proxy, which passes the user id in the `X-User-Id` header and any roles in
//! `X-User-Roles`. See [auth](auth/index.html).
pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
