//! AccessChain - a permissioned ledger of door-lock access keys
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, integrity stamps, chain validation and lookups
//! - [`transaction`] - Membership and access-key transactions
//! - [`ledger`] - Block creation, broadcast, reconciliation and reliability votes
//!
//! ## Cryptography & Identity
//! - [`crypto`] - RSA-OAEP primitives and key fingerprints
//! - [`keys`] - The node's network and transaction keypairs
//!
//! ## Membership & State
//! - [`registry`] - Known peers and their keys
//! - [`membership`] - Join protocol and peer list maintenance
//! - [`persistence`] - Chain and registry documents
//!
//! ## Networking & Integration
//! - [`network`] - Outbound peer transport
//! - [`sync`] - Fan-out helpers and integrity timers
//! - [`api`] - HTTP wire protocol (feature `api`)
//! - [`node`] - Process orchestration
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod ledger;
pub mod transaction;

// ============================================================================
// Cryptography & Identity
// ============================================================================
pub mod crypto;
pub mod keys;

// ============================================================================
// Membership & State
// ============================================================================
pub mod membership;
pub mod persistence;
pub mod registry;

// ============================================================================
// Networking
// ============================================================================
pub mod network;
pub mod node;
pub mod sync;

// ============================================================================
// Integration
// ============================================================================
#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
