//! emberchain - a UTXO blockchain ledger engine with pluggable consensus
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Chain manager, UTXO/STXO index and validation
//! - [`transaction`] - Transaction, output and input value objects
//! - [`mempool`] - Unconfirmed transaction pool
//!
//! ## Policy Boundaries
//! - [`consensus`] - Pluggable consensus adapter
//! - [`contract`] - Script evaluation adapter
//! - [`economics`] - Block subsidy schedule
//!
//! ## Cryptography
//! - [`crypto`] - Key pairs and signature verification (secp256k1)
//! - [`ids`] - Hash-derived numeric identifiers
//!
//! ## State Management
//! - [`storage`] - Transactional key/value store (SQLite or in-memory)
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Policy Boundaries
// ============================================================================
pub mod consensus;
pub mod contract;
pub mod economics;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;
pub mod ids;

// ============================================================================
// State Management
// ============================================================================
pub mod storage;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
