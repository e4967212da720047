//! Generation Pipeline - Single Entry Point
//!
//! load -> resolve -> bind -> validate -> emit -> write. Validation always
//! runs before emission; with `failureMode: block` an error stops the run
//! before any artifact is written.

use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::binding::build_bindings;
use crate::config::{ConfigError, FailureMode, GeneratorConfig};
use crate::emit::{emit_api, ApiArtifacts};
use crate::fetch::{ensure_registry, FetchError};
use crate::guard::level_guards;
use crate::hashing::{compute_manifest_hash, compute_run_hash, sha256_hex};
use crate::patches::COMMAND_PATCHES;
use crate::registry::{Registry, RegistryError};
use crate::resolve::{resolve, Availability, ResolveError};
use crate::validation::{ValidationContext, ValidationResult, ValidationViolation, Validator, ViolationSeverity};
use crate::GENERATOR_VERSION;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Emission error: {0}")]
    Emit(#[source] io::Error),

    #[error("Validation blocked generation of {api}: {messages}")]
    ValidationBlocked { api: String, messages: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One generated file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub path: PathBuf,
    pub bytes: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiManifest {
    pub api: String,
    pub feature_levels: Vec<String>,
    pub artifacts: Vec<ArtifactRecord>,
    /// `valid` reflects only pre-emission rules; `enumerator_conflict`
    /// errors found while emitting are appended afterwards and never block.
    pub validation: ValidationResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationManifest {
    pub generator_version: String,
    pub generated_at: DateTime<Utc>,
    pub registry_hash: String,
    pub run_hash: String,
    pub apis: Vec<ApiManifest>,
    pub manifest_hash: String,
}

/// In-memory result for one API, before anything touches the disk.
#[derive(Debug, Clone)]
pub struct ApiGeneration {
    pub artifacts: ApiArtifacts,
    pub feature_levels: Vec<String>,
    pub validation: ValidationResult,
}

/// A loaded registry and the digest of the bytes it was parsed from.
#[derive(Debug)]
pub struct LoadedRegistry {
    pub registry: Registry,
    pub sha256: String,
}

pub struct GenerationPipeline {
    config: GeneratorConfig,
    validator: Validator,
}

impl GenerationPipeline {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config,
            validator: Validator::new(),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Downloads the registry when it is not cached yet, then parses it.
    pub fn load_registry(&self) -> Result<LoadedRegistry, PipelineError> {
        let path = &self.config.registry_path;
        ensure_registry(path, &self.config.registry_url)?;

        info!("Loading registry {}", path.display());
        let bytes = fs::read(path).map_err(|source| PipelineError::Read { path: path.clone(), source })?;
        Ok(LoadedRegistry {
            sha256: sha256_hex(&bytes),
            registry: Registry::from_bytes(&bytes)?,
        })
    }

    pub fn resolve(&self, registry: &Registry) -> Result<Availability, PipelineError> {
        Ok(resolve(registry, &self.config)?)
    }

    /// Resolves, validates and emits every enabled API in memory.
    ///
    /// This ALWAYS validates before emitting. No bypass.
    pub fn generate(&self, registry: &Registry) -> Result<Vec<ApiGeneration>, PipelineError> {
        let availability = self.resolve(registry)?;
        let bindings = build_bindings(registry, &self.config.naming, COMMAND_PATCHES)?;

        for missing in self.config.enabled_apis.iter().filter(|name| availability.api(name).is_none()) {
            warn!("API {} not found in registry", missing);
        }

        let mut generated = Vec::new();
        for api in availability.apis.values().filter(|a| self.config.is_api_enabled(&a.name)) {
            let api_name = &api.name;
            let ctx = ValidationContext {
                registry,
                api,
                bindings: &bindings,
                config: &self.config,
            };
            let mut validation = self.validator.validate(&ctx);
            self.report(&validation.violations);

            if !validation.valid {
                let messages: Vec<_> = validation
                    .errors()
                    .map(|v| format!("{}: {}", v.rule, v.message))
                    .collect();
                return Err(PipelineError::ValidationBlocked {
                    api: api_name.clone(),
                    messages: messages.join("; "),
                });
            }

            info!("Generating {}", api_name);
            let mut artifacts = emit_api(registry, api, &bindings, &self.config).map_err(PipelineError::Emit)?;
            validation.violations.append(&mut artifacts.violations);

            generated.push(ApiGeneration {
                feature_levels: level_guards(api, &self.config.guard_prefix),
                artifacts,
                validation,
            });
        }
        Ok(generated)
    }

    /// Writes `{api}.hpp` and `{api}.cpp` into the output directory.
    pub fn write_artifacts(&self, artifacts: &ApiArtifacts) -> Result<Vec<ArtifactRecord>, PipelineError> {
        let dir = &self.config.output_dir;
        fs::create_dir_all(dir).map_err(|source| PipelineError::Write { path: dir.clone(), source })?;

        let files = [
            (format!("{}.hpp", artifacts.api), &artifacts.declarations),
            (format!("{}.cpp", artifacts.api), &artifacts.implementation),
        ];
        let mut records = Vec::with_capacity(files.len());
        for (file_name, text) in files {
            let path = dir.join(file_name);
            fs::write(&path, text).map_err(|source| PipelineError::Write { path: path.clone(), source })?;
            info!("Wrote {}", path.display());
            records.push(ArtifactRecord {
                bytes: text.len(),
                sha256: sha256_hex(text.as_bytes()),
                path,
            });
        }
        Ok(records)
    }

    /// Full run: load, generate, write, and describe the result.
    pub fn run(&self) -> Result<GenerationManifest, PipelineError> {
        let loaded = self.load_registry()?;
        let generated = self.generate(&loaded.registry)?;

        let mut apis = Vec::with_capacity(generated.len());
        for generation in generated {
            let artifacts = self.write_artifacts(&generation.artifacts)?;
            apis.push(ApiManifest {
                api: generation.artifacts.api,
                feature_levels: generation.feature_levels,
                artifacts,
                validation: generation.validation,
            });
        }

        let mut manifest = GenerationManifest {
            generator_version: GENERATOR_VERSION.to_string(),
            generated_at: Utc::now(),
            run_hash: compute_run_hash(&loaded.sha256, &self.config, GENERATOR_VERSION)?,
            registry_hash: loaded.sha256,
            apis,
            manifest_hash: String::new(), // Computed after
        };
        manifest.manifest_hash = compute_manifest_hash(&manifest)?;

        Ok(manifest)
    }

    fn report(&self, violations: &[ValidationViolation]) {
        if self.config.failure_mode == FailureMode::Log {
            for v in violations {
                info!("{}: {} {}", v.rule, v.message, v.symbol.as_deref().unwrap_or(""));
            }
            return;
        }
        for v in violations {
            let symbol = v.symbol.as_deref().unwrap_or("");
            match v.severity {
                ViolationSeverity::Error => error!("{}: {} {}", v.rule, v.message, symbol),
                ViolationSeverity::Warning => warn!("{}: {} {}", v.rule, v.message, symbol),
                ViolationSeverity::Info => info!("{}: {} {}", v.rule, v.message, symbol),
            }
        }
    }
}

impl Default for GenerationPipeline {
    fn default() -> Self {
        Self::new(GeneratorConfig::default())
    }
}
