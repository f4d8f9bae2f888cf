//! Transfer Notification Core Library
//!
//! This library coordinates the externally visible lifecycle of
//! interruptible transfers: it keeps one durable status record per
//! transfer, drives the host's notification surface through a strict state
//! machine, and schedules automatic resumption of interrupted transfers
//! through a host-provided deferred-execution facility.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`store`] - Durable status records and schedule state
//! - [`notify`] - Notification dispatcher and state machine
//! - [`resume`] - Resumption scheduling and trigger handling
//! - [`lifecycle`] - Host lifecycle signal fan-out
//! - [`coordinator`] - Process-wide wiring of the above
//!
//! Host adapters implement the seams in [`notify::Presenter`],
//! [`engine::TransferEngine`], [`engine::TransferManager`], and
//! [`resume::DeferredExecutor`]; everything else is owned here.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod coordinator;
pub mod db;
pub mod engine;
pub mod lifecycle;
pub mod model;
pub mod notify;
pub mod resume;
pub mod store;

// Re-export commonly used types
pub use coordinator::Coordinator;
pub use db::{Database, DatabaseOptions};
pub use engine::{TransferEngine, TransferManager};
pub use lifecycle::{LifecycleObserver, LifecycleRegistry, ObserverId};
pub use model::{
    DirectoryKind, DirectoryOption, FailReason, IconHandle, NotificationStatus, PendingReason,
    TransferId, TransferInfo,
};
pub use notify::{
    DispatchError, DispatchOutcome, NotificationDispatcher, PresentError, Presenter,
    RenderedStatus,
};
pub use resume::{
    CancelOutcome, DeferredExecutor, ExecutorError, ResumptionScheduler, ScheduleOutcome,
    StopSignal, TriggerConstraints, TriggerHandler, TriggerParams,
};
pub use store::{RecordStore, ScheduleState, StatusRecord, StoreDbErrorKind, StoreError};
