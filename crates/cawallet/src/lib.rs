//! Contract-account (CA) wallet toolkit for aelf-style chains.
//!
//! A manager key signs `ManagerForwardCall` transactions on the CA contract, which then acts
//! as the CA holder on any other contract. On top of that sit token transfers (including the
//! two-step cross-chain flow), guardian management and an encrypted per-network keystore.
//! [`toolkit::Toolkit`] is the surface the CLI and the MCP server drive.

#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

pub mod api;
pub mod chain;
pub mod chain_info;
pub mod cli_output;
pub mod config;
pub mod errors;
pub mod forward;
pub mod fsutil;
pub mod guardian;
pub mod journal;
pub mod keystore;
pub mod paths;
pub mod poll;
pub mod rpc;
pub mod schema;
pub mod store;
pub mod toolkit;
pub mod transfer;
pub mod wallet;
