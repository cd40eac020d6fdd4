//! BETALERT — Sports-Betting Arbitrage Decision Engine
//!
//! Library crate exposing all modules for use by integration tests
//! and embedding applications. The embedder supplies the network-facing
//! collaborators (alert polling, bookmaker execution adapter) and
//! drives `engine::BetEngine::notify`.

pub mod book;
pub mod config;
pub mod engine;
pub mod feed;
pub mod logging;
pub mod pricing;
pub mod types;
