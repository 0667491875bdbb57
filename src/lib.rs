#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # Submission Pipeline
//!
//! Batches tax-return submissions arriving from an intake channel, archives
//! and bundles each closed batch, transmits the bundle to an external
//! acceptance system, and reports per-submission confirmations or failures
//! on an outbound notification channel.
//!
//! ## Architecture
//!
//! All durable state lives in an object store. A batch is a key prefix;
//! rotation is decided from the listing (member count and age), never from
//! in-memory counters, so a restarted process picks up where the last one
//! stopped.
//!
//! ```text
//! intake ─▶ BatchAssembler ─▶ BatchRepository (object store)
//!                 │ rotation
//!                 ▼
//!           ActionQueue ─▶ ProcessingLoop ─▶ stage handlers ─▶ acceptance system
//!            (in-progress                          │
//!             before new)                          └─▶ notifications
//! ```
//!
//! ## Module Organization
//!
//! - [`batching`] - batch layout, rotation policy, repository and assembler
//! - [`pipeline`] - action queue, offline gate, processing loop, stage handlers
//! - [`transmission`] - acceptance-system session client
//! - [`messaging`] - versioned intake and notification envelopes
//! - [`orchestration`] - bootstrap, startup reconciliation, health gate
//! - [`storage`] - object store abstraction and backends
//! - [`config`] - layered TOML + environment configuration
//! - [`error`] - structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use submission_pipeline::config::ConfigManager;
//! use submission_pipeline::messaging::{InMemoryNotificationPublisher, IntakeConsumer};
//! use submission_pipeline::orchestration::{BootstrapConfig, PipelineCollaborators, PipelineSystem};
//! use submission_pipeline::transmission::SimulatedAcceptanceSystem;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config_manager = ConfigManager::load()?;
//! let collaborators = PipelineCollaborators::from_config(
//!     &config_manager.config().storage,
//!     Arc::new(SimulatedAcceptanceSystem::new()),
//!     Arc::new(InMemoryNotificationPublisher::new()),
//! );
//! let handle =
//!     PipelineSystem::bootstrap(config_manager, collaborators, BootstrapConfig::default()).await?;
//!
//! let body = br#"{"headers":{"version":"1.0"},"payload":{}}"#;
//! let ack = handle.intake().handle_message(body).await;
//! println!("intake ack: {ack:?}");
//!
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod batching;
pub mod config;
pub mod constants;
pub mod control_year;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod pipeline;
pub mod storage;
pub mod transmission;
pub mod utils;

pub use config::{ConfigManager, PipelineConfig};
pub use constants::{ActionChannel, NotificationEventType};
pub use error::{PipelineError, Result};
pub use models::{Batch, Bundle, Submission, UserContext};
pub use orchestration::{BootstrapConfig, PipelineCollaborators, PipelineHandle, PipelineSystem};
pub use pipeline::{Action, Stage};
