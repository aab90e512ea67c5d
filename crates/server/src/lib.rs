//! Shopgate server library.
//!
//! Request authentication and encrypted credential storage for a multi-tenant
//! Shopify app backend, exposed as a library so the binary, the CLI and the
//! integration tests share one implementation.
//!
//! # Security
//!
//! - Every inbound request is verified under the trust protocol its route
//!   declares before any handler runs ([`auth`])
//! - Platform access tokens are stored only as AES-256-GCM ciphertext
//!   ([`vault`])
//! - Secrets are held in `secrecy` wrappers and redacted from `Debug`

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod error_log;
pub mod flags;
pub mod relay;
pub mod request_id;
pub mod routes;
pub mod shopify;
pub mod state;
pub mod tenant;
pub mod vault;
