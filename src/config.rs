//! Generator Configuration
//!
//! Allow-lists and the feature-level filter are fixed per generation run.
//! They are read from a JSON document, never from command-line flags.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Invalid config {0}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorConfig {
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,
    #[serde(default = "default_registry_url")]
    pub registry_url: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_enabled_apis")]
    pub enabled_apis: Vec<String>,
    #[serde(default = "default_enabled_extensions")]
    pub enabled_extensions: Vec<String>,
    #[serde(default = "default_api_level_filter")]
    pub api_level_filter: Option<String>,
    #[serde(default = "default_guard_prefix")]
    pub guard_prefix: String,
    #[serde(default = "default_ignored_extension_apis")]
    pub ignored_extension_apis: Vec<String>,
    #[serde(default = "default_core_header")]
    pub core_header: String,
    #[serde(default)]
    pub naming: NamingRules,
    #[serde(default)]
    pub failure_mode: FailureMode,
}

fn default_registry_path() -> PathBuf { PathBuf::from("api").join("gl.xml") }
fn default_registry_url() -> String {
    "https://raw.githubusercontent.com/KhronosGroup/OpenGL-Registry/master/xml/gl.xml".to_string()
}
fn default_output_dir() -> PathBuf { PathBuf::from("api") }
fn default_enabled_apis() -> Vec<String> { vec!["gl".to_string()] }
fn default_enabled_extensions() -> Vec<String> {
    [
        "GL_ARB_bindless_texture",
        "GL_ARB_texture_filter_anisotropic",
        "GL_EXT_texture_filter_anisotropic",
        "GL_ARB_sync",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_api_level_filter() -> Option<String> { Some("API_LEVEL_GL_VERSION_4_5_core".to_string()) }
fn default_guard_prefix() -> String { "API_LEVEL".to_string() }
fn default_ignored_extension_apis() -> Vec<String> { vec!["glcore".to_string()] }
fn default_core_header() -> String { "soglb_core.hpp".to_string() }

/// Prefixes and suffixes stripped while normalizing native names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamingRules {
    #[serde(default = "default_constant_prefix")]
    pub constant_prefix: String,
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    #[serde(default = "default_extension_suffixes")]
    pub extension_suffixes: Vec<String>,
}

fn default_constant_prefix() -> String { "GL_".to_string() }
fn default_command_prefix() -> String { "gl".to_string() }
fn default_extension_suffixes() -> Vec<String> { vec!["ARB".to_string()] }

impl Default for NamingRules {
    fn default() -> Self {
        Self {
            constant_prefix: default_constant_prefix(),
            command_prefix: default_command_prefix(),
            extension_suffixes: default_extension_suffixes(),
        }
    }
}

/// What to do with error-severity validation findings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    Block,
    #[default]
    Warn,
    Log,
}

impl GeneratorConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    pub fn is_api_enabled(&self, api: &str) -> bool {
        self.enabled_apis.iter().any(|a| a == api)
    }

    pub fn is_extension_enabled(&self, extension: &str) -> bool {
        self.enabled_extensions.iter().any(|e| e == extension)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            registry_path: default_registry_path(),
            registry_url: default_registry_url(),
            output_dir: default_output_dir(),
            enabled_apis: default_enabled_apis(),
            enabled_extensions: default_enabled_extensions(),
            api_level_filter: default_api_level_filter(),
            guard_prefix: default_guard_prefix(),
            ignored_extension_apis: default_ignored_extension_apis(),
            core_header: default_core_header(),
            naming: NamingRules::default(),
            failure_mode: FailureMode::default(),
        }
    }
}
