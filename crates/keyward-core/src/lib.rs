//! # keyward-core
//!
//! Account lifecycle management for an authentication subsystem.
//!
//! This crate provides:
//! - An authoritative, concurrent in-memory account index
//! - Password rotation with a bounded reuse history (Argon2id hashes)
//! - A background daemon that flags expired accounts
//! - Synchronisation with an identity directory and a snapshot store

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod config;
pub mod daemon;
pub mod directory;
mod error;
mod manager;
mod service;
pub mod store;

pub use account::{Account, PasswordPolicy, ValidationError, ValidationResult, validate_new_account};
pub use config::{HashingConfig, LifecycleConfig, MAX_EXPIRATION_DAYS, TimeUnit};
pub use daemon::{DaemonHandle, DaemonState, ExpirationDaemon, MIN_SWEEP_PERIOD};
pub use directory::{DirectoryError, DirectoryRecord, IdentityDirectory, InMemoryDirectory};
pub use error::{Error, ErrorKind, Result};
pub use manager::{AccountManager, SweepReport};
pub use service::Service;
pub use store::{JsonFileStore, MemoryStore, PersistenceError, PersistenceProvider, SqliteStore};
