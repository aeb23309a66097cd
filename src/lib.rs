//! Dukkan Sync - Offline-first synchronization engine for the Dukkan
//! business suite
//!
//! The Dukkan apps (stock, production, HR, orders) are edited on whatever
//! device is at hand, connected or not. This crate is the layer that makes
//! that safe: it reconciles local and remote copies of every collection
//! with per-record last-write-wins merging, buffers mutations made while
//! offline in a durable replay queue, and keeps local persistence writable
//! under hard device quotas through staged data shedding.
//!
//! The UI, transport endpoints, authentication and screen-level business
//! logic live in the host applications; they reach the engine through
//! [`sync::SyncOrchestrator`], [`sync::OperationQueue`] and
//! [`sync::BackgroundScheduler`], and supply the remote transport behind
//! [`sync::RemoteStore`] plus a [`sync::MutationExecutor`] for queue
//! replay.

pub mod db;
pub mod sync;

pub use db::{Database, DbError, DbResult};
