//! A core Rust library for keeping a paired messaging session alive and delivering
//! one-time passwords through it.
//!
//! This crate provides the building blocks for the OTP relay service: durable
//! storage of the session's cryptographic material and a lifecycle controller that
//! owns the transport connection, reacts to its events and reconnects with backoff.
//!
//! # Key Components
//!
//! *   [`storage::AuthStore`]: the persistence contract for opaque, keyed auth records.
//! *   [`auth_state`]: adapts an `AuthStore` into the key-material and credential storage
//!     a transport reads and writes.
//! *   [`controller::ConnectionController`]: the single owner of the live session. It runs
//!     as a background task and is driven through a clonable [`controller::ControllerHandle`].
//! *   [`transport`]: the traits a chat-protocol implementation must provide.
pub mod address;
pub mod auth_state;
/// Defines configuration structures for the connector.
pub mod config;
/// The connection lifecycle controller and its handle.
pub mod controller;
pub mod error;
/// Updates emitted by a transport session.
pub mod events;
/// A trait for persistent auth-state storage.
pub mod storage;
pub mod transport;
