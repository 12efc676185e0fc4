//! VisionFlow - concurrent image algorithm services
//!
//! This library provides the scheduling core for running expensive image
//! algorithms behind long-lived background services: bounded worker pools
//! with credit-based admission, submission deduplication by content
//! fingerprint, promise-based result delivery, and multi-stage ensemble
//! orchestration.
//!
//! # High-Level API
//!
//! ```ignore
//! use std::sync::Arc;
//! use visionflow::config::{Device, PoolSize, ServiceSettings};
//! use visionflow::service::AlgorithmService;
//!
//! let settings = ServiceSettings::new("face-detection", "Face detection")
//!     .with_workers(PoolSize::Fixed(4))
//!     .with_device(Device::Cpu);
//! let service = Arc::new(AlgorithmService::from_settings(&settings, &registry)?);
//! service.start();
//!
//! let promise = service.submit(resource, None).await;
//! let result = promise.wait().await;
//! ```

pub mod algorithm;
pub mod config;
pub mod ensemble;
pub mod logging;
pub mod resource;
pub mod service;

/// Version of the VisionFlow library.
///
/// Defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
