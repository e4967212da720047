//! Guard Builder
//!
//! Inverts level residency twice: symbol -> guard ids, then sorted guard
//! tuple -> symbols. Symbols sharing a tuple share one conditional region.

use std::collections::{BTreeMap, BTreeSet};

use crate::registry::{ConstantTable, EnumGroup};
use crate::resolve::{FeatureLevel, ResidentSet, ResolvedApi};

/// Sorted guard identifiers.
pub type GuardTuple = Vec<String>;

/// Feature-level identifier, e.g. `API_LEVEL_GL_VERSION_3_3_core`.
pub fn level_guard(prefix: &str, version: &str, profile: Option<&str>) -> String {
    match profile {
        Some(profile) => format!("{}_{}_{}", prefix, version, profile),
        None => format!("{}_{}", prefix, version),
    }
}

/// Preprocessor condition for a tuple.
pub fn guard_expression(tuple: &[String]) -> String {
    let mut sorted: Vec<&String> = tuple.iter().collect();
    sorted.sort();
    sorted
        .iter()
        .map(|g| format!("defined({})", g))
        .collect::<Vec<_>>()
        .join(" || ")
}

pub fn level_guards(api: &ResolvedApi, prefix: &str) -> Vec<String> {
    api.levels()
        .map(|level| level_guard(prefix, level.version, level.profile))
        .collect()
}

/// Tuple -> symbols. Iterates tuples in lexical order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardMap {
    regions: BTreeMap<GuardTuple, BTreeSet<String>>,
}

impl GuardMap {
    pub fn from_symbol_guards(symbol_guards: BTreeMap<String, BTreeSet<String>>) -> Self {
        let mut regions: BTreeMap<GuardTuple, BTreeSet<String>> = BTreeMap::new();
        for (symbol, guards) in symbol_guards {
            regions.entry(guards.into_iter().collect()).or_default().insert(symbol);
        }
        Self { regions }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GuardTuple, &BTreeSet<String>)> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, tuple: &[String]) -> Option<&BTreeSet<String>> {
        self.regions.get(tuple)
    }

    /// The only region, when there is exactly one.
    pub fn single(&self) -> Option<(&GuardTuple, &BTreeSet<String>)> {
        if self.regions.len() == 1 {
            self.regions.iter().next()
        } else {
            None
        }
    }

    pub fn symbols(&self) -> BTreeSet<&str> {
        self.regions.values().flatten().map(String::as_str).collect()
    }
}

fn collect_guards<'a, F>(api: &'a ResolvedApi, prefix: &str, mut visit: F) -> BTreeMap<String, BTreeSet<String>>
where
    F: FnMut(FeatureLevel<'a>) -> Vec<&'a str>,
{
    let mut symbol_guards: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for level in api.levels() {
        let guard = level_guard(prefix, level.version, level.profile);
        for symbol in visit(level) {
            symbol_guards.entry(symbol.to_string()).or_default().insert(guard.clone());
        }
    }
    symbol_guards
}

pub fn build_guarded_commands(api: &ResolvedApi, prefix: &str) -> GuardMap {
    GuardMap::from_symbol_guards(collect_guards(api, prefix, |level| {
        level.symbols.commands.iter().map(String::as_str).collect()
    }))
}

/// Guards for one enum group's constants. Members absent from the constant
/// table are left out; `group_members` validation reports them.
/// `None` when no member is resident at any level.
pub fn build_guarded_constants(
    api: &ResolvedApi,
    prefix: &str,
    group: &EnumGroup,
    constants: &ConstantTable,
) -> Option<GuardMap> {
    let members: Vec<&str> = group
        .members
        .iter()
        .filter(|name| constants.get(name, &api.name).is_some())
        .map(String::as_str)
        .collect();

    let symbol_guards = collect_guards(api, prefix, |level| resident_members(&members, level.symbols));
    (!symbol_guards.is_empty()).then(|| GuardMap::from_symbol_guards(symbol_guards))
}

fn resident_members<'a>(members: &[&'a str], symbols: &ResidentSet) -> Vec<&'a str> {
    members
        .iter()
        .copied()
        .filter(|m| symbols.constants.contains(*m))
        .collect()
}

/// How a region is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Region {
    /// Filtered out.
    Omit,
    Unconditional,
    Conditional(String),
}

/// Decides region rendering for one API.
#[derive(Debug, Clone)]
pub struct GuardScope {
    total_levels: usize,
    filter: Option<String>,
}

impl GuardScope {
    pub fn new(api: &ResolvedApi, filter: Option<&str>) -> Self {
        Self {
            total_levels: api.level_count(),
            filter: filter.map(str::to_string),
        }
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn is_universal(&self, tuple: &[String]) -> bool {
        tuple.len() == self.total_levels
    }

    pub fn region(&self, tuple: &[String]) -> Region {
        match &self.filter {
            Some(filter) if tuple.iter().any(|g| g == filter) => Region::Unconditional,
            Some(_) => Region::Omit,
            None if self.is_universal(tuple) => Region::Unconditional,
            None => Region::Conditional(guard_expression(tuple)),
        }
    }
}
