//! Configuration types for analysis services.
//!
//! These are pure data types a configuration collaborator fills in; file
//! parsing lives outside this crate. Each [`ServiceSettings`] value describes
//! one service: which registered algorithm it runs, how many workers its pool
//! gets, and which device the algorithm constructor is handed.

use std::fmt;

/// Fallback worker count when parallelism cannot be detected.
pub const FALLBACK_POOL_SIZE: usize = 4;

/// Number of workers for a pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PoolSize {
    /// Use the platform's available parallelism.
    #[default]
    Auto,
    /// A fixed number of workers, at least 1.
    Fixed(usize),
}

impl PoolSize {
    /// Resolves to a concrete worker count.
    pub fn resolve(&self) -> usize {
        match self {
            Self::Auto => std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(FALLBACK_POOL_SIZE),
            Self::Fixed(n) => (*n).max(1),
        }
    }
}

impl fmt::Display for PoolSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Fixed(n) => write!(f, "{n}"),
        }
    }
}

/// Compute device handed opaquely to the algorithm constructor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
    Gpu(u32),
}

impl Device {
    /// Maps the conventional device integer: -1 means CPU, >= 0 a GPU index.
    pub fn from_index(index: i32) -> Self {
        if index < 0 {
            Self::Cpu
        } else {
            Self::Gpu(index as u32)
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Gpu(index) => write!(f, "gpu{index}"),
        }
    }
}

/// Definition of one analysis service.
#[derive(Clone, Debug)]
pub struct ServiceSettings {
    /// Registry key of the algorithm this service runs.
    pub algorithm: String,
    /// Name the service is exposed under.
    pub public_name: String,
    /// Human description for service listings.
    pub description: String,
    /// Worker pool size.
    pub workers: PoolSize,
    /// Device forwarded to the algorithm constructor.
    pub device: Device,
    /// Whether this service is the default for its stage.
    pub default: bool,
}

impl ServiceSettings {
    pub fn new(algorithm: impl Into<String>, public_name: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            public_name: public_name.into(),
            description: String::new(),
            workers: PoolSize::Auto,
            device: Device::Cpu,
            default: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_workers(mut self, workers: PoolSize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }
}
