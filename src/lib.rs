//! soglb-gen - Registry-driven OpenGL binding generator
//!
//! Reads the Khronos XML registry and emits, per enabled API, a declarations
//! header and a forwarding implementation. Every symbol is wrapped in the
//! feature-level guards under which it exists.
//!
//! # Guarantees
//! 1. Residency is replayed in numeric version order
//! 2. Each symbol lands in exactly one guard region
//! 3. Identical registry and configuration give identical bytes
//! 4. Validation runs before emission

pub mod config;
pub mod dom;
pub mod registry;
pub mod resolve;
pub mod guard;
pub mod naming;
pub mod types;
pub mod patches;
pub mod binding;
pub mod emit;
pub mod validation;
pub mod fetch;
pub mod hashing;
pub mod pipeline;

pub use config::{ConfigError, FailureMode, GeneratorConfig, NamingRules};
pub use registry::{Registry, RegistryError};
pub use resolve::{resolve, Availability, ResolveError, ResolvedApi};
pub use emit::{emit_api, ApiArtifacts};
pub use validation::{ValidationResult, ValidationRule, ValidationViolation, ViolationSeverity};
pub use hashing::{canonical_json, compute_manifest_hash, compute_run_hash};
pub use pipeline::{GenerationManifest, GenerationPipeline, PipelineError};

pub const GENERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");
