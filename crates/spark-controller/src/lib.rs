//! SparkApplication reconciliation engine
//!
//! Submits SparkApplications through `spark-submit`, follows their driver
//! and executor pods, and reconciles what it observes into each
//! application's status. Three independent event streams (submission
//! outcomes, driver pods, executor pods) are folded into a shared registry
//! of tracked applications; every status write goes through
//! [`status::update_application_with_retries`] while the registry lock is
//! held.
//!
//! Applications whose driver terminates are resubmitted according to their
//! restart policy, each attempt under a fresh appID.

#![deny(missing_docs)]

pub mod app_id;
pub mod client;
pub mod config;
pub mod controller;
mod dispatcher;
pub mod informer;
pub mod pod_monitor;
pub mod reducers;
pub mod registry;
pub mod restart;
pub mod runner;
pub mod status;
pub mod submission;
pub mod ui_service;
pub mod updates;

pub use client::{SparkKubeClient, SparkKubeClientImpl};
pub use config::ControllerConfig;
pub use controller::{ensure_crd_installed, start, ControllerTasks, SparkApplicationController};
pub use registry::ApplicationRegistry;
pub use status::{update_application_with_retries, MAX_UPDATE_ATTEMPTS};
pub use updates::{AppStateUpdate, DriverStateUpdate, ExecutorStateUpdate, PodPhase};
