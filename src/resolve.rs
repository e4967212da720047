//! Availability Resolver
//!
//! Replays each API's requirement deltas in version order and freezes one
//! resident set per (version, profile). Enabled extensions are merged into
//! every feature level of the APIs they target.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::GeneratorConfig;
use crate::registry::{Api, Delta, DeltaOp, Extension, Reference, Registry, Version, VersionNumber};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Cannot remove {kind} {symbol} from {api} {version} (profile {profile}): not present")]
    RemoveAbsent {
        api: String,
        version: String,
        profile: String,
        kind: &'static str,
        symbol: String,
    },
}

/// `None` is the unscoped default profile.
pub type ProfileKey = Option<String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResidentSet {
    pub constants: BTreeSet<String>,
    pub commands: BTreeSet<String>,
}

impl ResidentSet {
    fn add(&mut self, reference: &Reference) {
        match reference {
            Reference::Constant(name) => {
                self.constants.insert(name.clone());
            }
            Reference::Command(name) => {
                self.commands.insert(name.clone());
            }
            Reference::Type(_) => {}
        }
    }

    fn remove(&mut self, reference: &Reference) -> Result<(), (&'static str, String)> {
        let (kind, set, name) = match reference {
            Reference::Constant(name) => ("constant", &mut self.constants, name),
            Reference::Command(name) => ("command", &mut self.commands, name),
            Reference::Type(_) => return Ok(()),
        };
        if set.remove(name) {
            Ok(())
        } else {
            Err((kind, name.clone()))
        }
    }

    fn merge(&mut self, other: &ResidentSet) {
        self.constants.extend(other.constants.iter().cloned());
        self.commands.extend(other.commands.iter().cloned());
    }
}

/// Frozen state of one version of an API.
#[derive(Debug, Clone)]
pub struct ResolvedVersion {
    pub name: String,
    pub number: VersionNumber,
    pub profiles: BTreeMap<ProfileKey, ResidentSet>,
}

/// One selectable (version, profile) combination.
#[derive(Debug, Clone, Copy)]
pub struct FeatureLevel<'a> {
    pub version: &'a str,
    pub profile: Option<&'a str>,
    pub symbols: &'a ResidentSet,
}

#[derive(Debug, Clone)]
pub struct ResolvedApi {
    pub name: String,
    pub versions: Vec<ResolvedVersion>,
}

impl ResolvedApi {
    /// Every feature level in version order, profiles sorted by name.
    pub fn levels(&self) -> impl Iterator<Item = FeatureLevel<'_>> {
        self.versions.iter().flat_map(|version| {
            version.profiles.iter().map(move |(profile, symbols)| FeatureLevel {
                version: &version.name,
                profile: profile.as_deref(),
                symbols,
            })
        })
    }

    pub fn level_count(&self) -> usize {
        self.versions.iter().map(|v| v.profiles.len()).sum()
    }
}

/// Per-extension contribution, kept for the summary log and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ExtensionSummary {
    pub name: String,
    pub enabled: bool,
    pub apis: BTreeMap<String, BTreeMap<String, ResidentSet>>,
}

#[derive(Debug, Clone)]
pub struct Availability {
    pub apis: BTreeMap<String, ResolvedApi>,
    pub extensions: Vec<ExtensionSummary>,
}

impl Availability {
    pub fn api(&self, name: &str) -> Option<&ResolvedApi> {
        self.apis.get(name)
    }
}

pub fn resolve(registry: &Registry, config: &GeneratorConfig) -> Result<Availability, ResolveError> {
    info!("Loading APIs");
    let mut apis = BTreeMap::new();
    for api in registry.apis.values() {
        info!("Loading API {}", api.name);
        apis.insert(api.name.clone(), resolve_api(api)?);
    }

    info!("Loading extensions");
    let mut extensions = Vec::new();
    for extension in &registry.extensions {
        let summary = summarize_extension(extension, config);
        if summary.enabled {
            for (api_name, profiles) in &summary.apis {
                if let Some(resolved) = apis.get_mut(api_name) {
                    merge_extension(resolved, profiles);
                }
            }
        }
        extensions.push(summary);
    }

    let availability = Availability { apis, extensions };
    log_summary(&availability);
    Ok(availability)
}

pub fn resolve_api(api: &Api) -> Result<ResolvedApi, ResolveError> {
    let mut ordered: Vec<&Version> = api.versions.iter().collect();
    ordered.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.name.cmp(&b.name)));

    let mut state: BTreeMap<ProfileKey, ResidentSet> = BTreeMap::from([(None, ResidentSet::default())]);
    let mut versions = Vec::with_capacity(ordered.len());

    for version in ordered {
        info!("  Loading API version {}", version.name);
        state = replay_version(state, &api.name, version)?;

        let mut profiles = state.clone();
        if profiles.len() > 1 {
            profiles.remove(&None);
        }
        versions.push(ResolvedVersion {
            name: version.name.clone(),
            number: version.number.clone(),
            profiles,
        });
    }

    Ok(ResolvedApi { name: api.name.clone(), versions })
}

/// Applies one version's deltas: new profiles fork from the default state,
/// then all adds, then all removes.
fn replay_version(
    mut state: BTreeMap<ProfileKey, ResidentSet>,
    api: &str,
    version: &Version,
) -> Result<BTreeMap<ProfileKey, ResidentSet>, ResolveError> {
    let deltas: Vec<&Delta> = version.deltas.iter().filter(|d| d.applies_to_api(api)).collect();

    for delta in &deltas {
        if let Some(profile) = &delta.profile {
            let key = Some(profile.clone());
            if !state.contains_key(&key) {
                let seed = state.get(&None).cloned().unwrap_or_default();
                state.insert(key, seed);
            }
        }
    }

    for delta in deltas.iter().filter(|d| d.op == DeltaOp::Add) {
        for (_, set) in targets(&mut state, &delta.profile) {
            for reference in &delta.references {
                set.add(reference);
            }
        }
    }

    for delta in deltas.iter().filter(|d| d.op == DeltaOp::Remove) {
        for (profile, set) in targets(&mut state, &delta.profile) {
            for reference in &delta.references {
                set.remove(reference).map_err(|(kind, symbol)| ResolveError::RemoveAbsent {
                    api: api.to_string(),
                    version: version.name.clone(),
                    profile: profile.clone().unwrap_or_else(|| "*".to_string()),
                    kind,
                    symbol,
                })?;
            }
        }
    }

    Ok(state)
}

fn targets<'a>(
    state: &'a mut BTreeMap<ProfileKey, ResidentSet>,
    profile: &'a ProfileKey,
) -> impl Iterator<Item = (&'a ProfileKey, &'a mut ResidentSet)> + 'a {
    state
        .iter_mut()
        .filter(move |(key, _)| profile.is_none() || *key == profile)
}

/// Groups an extension's requirements by target API and profile
/// (`"*"` for unscoped requirements).
fn summarize_extension(extension: &Extension, config: &GeneratorConfig) -> ExtensionSummary {
    let mut apis: BTreeMap<String, BTreeMap<String, ResidentSet>> = BTreeMap::new();

    for require in &extension.requires {
        let targets: BTreeSet<&str> = match &require.api {
            Some(api) => BTreeSet::from([api.as_str()]),
            None => extension.supported.iter().map(String::as_str).collect(),
        };
        let profile = require.profile.clone().unwrap_or_else(|| "*".to_string());

        for api in targets {
            if config.ignored_extension_apis.iter().any(|ignored| ignored == api) {
                continue;
            }
            let set = apis
                .entry(api.to_string())
                .or_default()
                .entry(profile.clone())
                .or_default();
            for reference in &require.references {
                set.add(reference);
            }
        }
    }

    ExtensionSummary {
        name: extension.name.clone(),
        enabled: config.is_extension_enabled(&extension.name),
        apis,
    }
}

/// Extensions are unversioned: an unscoped contribution lands in every
/// profile of every version, a scoped one only where that profile exists.
fn merge_extension(api: &mut ResolvedApi, contributions: &BTreeMap<String, ResidentSet>) {
    for (profile, contribution) in contributions {
        for version in &mut api.versions {
            for (key, set) in version.profiles.iter_mut() {
                if profile == "*" || key.as_deref() == Some(profile.as_str()) {
                    set.merge(contribution);
                }
            }
        }
    }
}

fn log_summary(availability: &Availability) {
    info!("APIs summary");
    for api in availability.apis.values() {
        info!("  API {}", api.name);
        for version in &api.versions {
            info!("    API version {} ({})", version.name, version.number);
            for (profile, set) in &version.profiles {
                info!(
                    "      profile {}: {} constants, {} commands",
                    profile.as_deref().unwrap_or("*"),
                    set.constants.len(),
                    set.commands.len()
                );
            }
        }
    }

    info!("Extensions summary");
    for extension in &availability.extensions {
        info!("  Extension {}{}", extension.name, if extension.enabled { " (enabled)" } else { "" });
        for (api, profiles) in &extension.apis {
            info!("    API {}", api);
            for (profile, set) in profiles {
                info!(
                    "      profile {}: {} constants, {} commands",
                    profile,
                    set.constants.len(),
                    set.commands.len()
                );
            }
        }
    }
}
