//! Hostgate - A subdomain-routing reverse proxy with name registration
//!
//! This library provides a name-based reverse proxy that:
//! - Routes HTTP traffic by the subdomain of the effective Host header to
//!   statically configured backend targets
//! - Intercepts requests addressed to the registered top-level domain itself
//!   and serves an admin API to add, remove, and list routable subdomains
//! - Keeps a local hosts file in sync with the registered subdomains so they
//!   resolve to this machine, merging edits made outside the process
//! - Uses connection pooling for efficient backend communication
//!
//! Admin add/remove mutate name resolution only; the routing table is built
//! once from configuration and stays read-only for the life of the process.

pub mod admin;
pub mod config;
pub mod error;
pub mod forward;
pub mod hosts;
pub mod proxy;
pub mod registry;
pub mod routes;
