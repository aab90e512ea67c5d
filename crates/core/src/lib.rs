//! Shopgate Core - Shared types library.
//!
//! This crate provides the types shared by every Shopgate component:
//! - `server` - Request authentication, credential vault and HTTP surface
//! - `cli` - Operator tooling for migrations, key generation and signing
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Canonical shop domains, tenant identities and trust protocols

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
