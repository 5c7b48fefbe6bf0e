//! # Engine Module
//!
//! Internal ECS engine implementation.
//!
//! This module contains all core building blocks:
//! - Identifier types and hashing
//! - Component pools and families
//! - Entity records and handles
//! - Message and event dispatch
//! - View traversal and the job queue
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod bitfield;
pub mod family;
pub mod pool;
pub mod handle;
pub mod entity;
pub mod system;
pub mod message;
pub mod event;
pub mod view;
pub mod jobs;
