//! Core types for Shopgate.
//!
//! This module provides type-safe wrappers for tenant and protocol concepts.

pub mod protocol;
pub mod shop;
pub mod tenant;

pub use protocol::{Protocol, ProtocolParseError};
pub use shop::{STOREFRONT_SUFFIX, ShopDomain, ShopDomainError};
pub use tenant::TenantIdentity;
