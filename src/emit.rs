//! Emitter
//!
//! Renders one API into a declarations artifact and a forwarding
//! implementation artifact. Regions are written in guard-tuple order and
//! symbols by name, so identical input gives identical bytes.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

use tracing::{debug, error, warn};

use crate::binding::CommandBinding;
use crate::config::GeneratorConfig;
use crate::guard::{build_guarded_commands, build_guarded_constants, level_guard, GuardScope, Region};
use crate::naming::{normalize_constant_name, strip_ext_suffix};
use crate::registry::{EnumGroup, Registry, SPECIAL_NUMBERS_GROUP};
use crate::resolve::ResolvedApi;
use crate::validation::{ValidationViolation, ViolationSeverity};

const INDENT: &str = "    ";

/// Generated text for one API.
#[derive(Debug, Clone)]
pub struct ApiArtifacts {
    pub api: String,
    pub declarations: String,
    pub implementation: String,
    pub violations: Vec<ValidationViolation>,
}

pub fn emit_api(
    registry: &Registry,
    api: &ResolvedApi,
    bindings: &BTreeMap<String, CommandBinding>,
    config: &GeneratorConfig,
) -> io::Result<ApiArtifacts> {
    let mut emitter = Emitter::new(registry, api, bindings, config);

    let mut declarations = Vec::new();
    emitter.write_declarations(&mut declarations)?;
    let mut implementation = Vec::new();
    emitter.write_implementation(&mut implementation)?;

    Ok(ApiArtifacts {
        api: api.name.clone(),
        declarations: into_text(declarations)?,
        implementation: into_text(implementation)?,
        violations: emitter.into_violations(),
    })
}

fn into_text(bytes: Vec<u8>) -> io::Result<String> {
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Outcome of offering an enumerator to a block.
#[derive(Debug, PartialEq, Eq)]
enum Admission {
    Write,
    Duplicate,
    Conflict { first_value: String },
}

/// Enumerators already written in one block, first value wins.
#[derive(Debug, Default)]
struct EnumeratorLedger {
    written: Vec<(String, String)>,
}

impl EnumeratorLedger {
    fn admit(&mut self, name: &str, value: &str) -> Admission {
        match self.written.iter().find(|(n, _)| n == name) {
            Some((_, v)) if v == value => Admission::Duplicate,
            Some((_, v)) => Admission::Conflict { first_value: v.clone() },
            None => {
                self.written.push((name.to_string(), value.to_string()));
                Admission::Write
            }
        }
    }
}

pub struct Emitter<'a> {
    registry: &'a Registry,
    api: &'a ResolvedApi,
    bindings: &'a BTreeMap<String, CommandBinding>,
    config: &'a GeneratorConfig,
    scope: GuardScope,
    violations: Vec<ValidationViolation>,
}

impl<'a> Emitter<'a> {
    pub fn new(
        registry: &'a Registry,
        api: &'a ResolvedApi,
        bindings: &'a BTreeMap<String, CommandBinding>,
        config: &'a GeneratorConfig,
    ) -> Self {
        Self {
            registry,
            api,
            bindings,
            config,
            scope: GuardScope::new(api, config.api_level_filter.as_deref()),
            violations: Vec::new(),
        }
    }

    pub fn into_violations(self) -> Vec<ValidationViolation> {
        self.violations
    }

    pub fn write_declarations<W: Write>(&mut self, dest: &mut W) -> io::Result<()> {
        writeln!(dest, "#pragma once")?;
        writeln!(dest, "#include \"{}\" // IWYU pragma: export", self.config.core_header)?;
        writeln!(dest, "namespace {}::api", self.api.name)?;
        writeln!(dest, "{{")?;

        match self.scope.filter() {
            None => {
                writeln!(dest, "// API feature levels")?;
                for level in self.api.levels() {
                    let guard = level_guard(&self.config.guard_prefix, level.version, level.profile);
                    writeln!(dest, "// #define {}", guard)?;
                }
            }
            Some(filter) => writeln!(dest, "// API feature level: {}", filter)?,
        }
        writeln!(dest)?;

        let registry = self.registry;
        writeln!(dest, "// special numbers")?;
        if let Some(group) = registry.group(SPECIAL_NUMBERS_GROUP) {
            self.write_special_numbers(dest, group)?;
        }
        writeln!(dest)?;

        writeln!(dest, "// enums")?;
        for group in registry.groups.values().filter(|g| g.name != SPECIAL_NUMBERS_GROUP) {
            self.write_enum(dest, group)?;
        }

        writeln!(dest, "// commands")?;
        self.write_commands(dest, CommandBinding::declaration)?;
        writeln!(dest, "}}")
    }

    pub fn write_implementation<W: Write>(&self, dest: &mut W) -> io::Result<()> {
        writeln!(dest, "#include \"{}.hpp\"", self.api.name)?;
        writeln!(dest, "#include \"{}_api_provider.hpp\"", self.api.name)?;
        writeln!(dest, "namespace {}::api", self.api.name)?;
        writeln!(dest, "{{")?;
        self.write_commands(dest, CommandBinding::definition)?;
        writeln!(dest, "}}")
    }

    fn write_special_numbers<W: Write>(&mut self, dest: &mut W, group: &EnumGroup) -> io::Result<()> {
        debug!("special numbers");
        let guards = build_guarded_constants(self.api, &self.config.guard_prefix, group, &self.registry.constants);
        let Some(map) = guards else {
            warn!("Skipping {} - no members", group.name);
            return Ok(());
        };

        let mut ledger = EnumeratorLedger::default();
        for (tuple, members) in map.iter() {
            let region = self.scope.region(tuple);
            if region == Region::Omit {
                continue;
            }
            open_region(dest, &region)?;
            for (name, value) in self.enumerators(&group.name, members, &mut ledger) {
                writeln!(dest, "constexpr auto {} = {};", name, value)?;
            }
            close_region(dest, &region)?;
        }
        Ok(())
    }

    fn write_enum<W: Write>(&mut self, dest: &mut W, group: &EnumGroup) -> io::Result<()> {
        let enum_name = strip_ext_suffix(&group.name, &self.config.naming).to_string();
        debug!("enum {}", enum_name);

        let guards = build_guarded_constants(self.api, &self.config.guard_prefix, group, &self.registry.constants);
        let Some(map) = guards else {
            warn!("Skipping {} - no members", enum_name);
            return Ok(());
        };

        let mut ledger = EnumeratorLedger::default();
        if let Some((tuple, members)) = map.single() {
            // one tuple for every member: guard the whole declaration
            let region = self.scope.region(tuple);
            if region == Region::Omit {
                return Ok(());
            }
            open_region(dest, &region)?;
            writeln!(dest, "enum class {} : core::EnumType", enum_name)?;
            writeln!(dest, "{{")?;
            for (name, value) in self.enumerators(&group.name, members, &mut ledger) {
                writeln!(dest, "{}{} = {},", INDENT, name, value)?;
            }
            writeln!(dest, "}};")?;
            if group.is_bitmask {
                write_bitmask_combinator(dest, &enum_name)?;
            }
            close_region(dest, &region)?;
        } else {
            let regions: Vec<(Region, &BTreeSet<String>)> = map
                .iter()
                .map(|(tuple, members)| (self.scope.region(tuple), members))
                .filter(|(region, _)| *region != Region::Omit)
                .collect();
            if regions.is_empty() {
                return Ok(());
            }

            writeln!(dest, "enum class {} : core::EnumType", enum_name)?;
            writeln!(dest, "{{")?;
            for (region, members) in regions {
                open_region(dest, &region)?;
                for (name, value) in self.enumerators(&group.name, members, &mut ledger) {
                    writeln!(dest, "{}{} = {},", INDENT, name, value)?;
                }
                close_region(dest, &region)?;
            }
            writeln!(dest, "}};")?;
            if group.is_bitmask {
                write_bitmask_combinator(dest, &enum_name)?;
            }
        }
        writeln!(dest)
    }

    /// Normalized `(name, literal)` pairs admitted by `ledger`, in member order.
    fn enumerators(
        &mut self,
        group: &str,
        members: &BTreeSet<String>,
        ledger: &mut EnumeratorLedger,
    ) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for member in members {
            let Some(constant) = self.registry.constants.get(member, &self.api.name) else {
                continue;
            };
            let name = normalize_constant_name(member, &self.config.naming);
            let literal = format!("{}{}", constant.value, constant.type_suffix);
            match ledger.admit(&name, &literal) {
                Admission::Write => out.push((name, literal)),
                Admission::Duplicate => {}
                Admission::Conflict { first_value } => {
                    error!("Conflicting value for enumerator {}", name);
                    self.violations.push(ValidationViolation {
                        rule: "enumerator_conflict".to_string(),
                        severity: ViolationSeverity::Error,
                        message: format!("{} in {} normalizes to an existing enumerator", member, group),
                        symbol: Some(name),
                        expected: Some(first_value),
                        actual: Some(literal),
                    });
                }
            }
        }
        out
    }

    fn write_commands<W: Write>(&self, dest: &mut W, render: fn(&CommandBinding) -> String) -> io::Result<()> {
        let map = build_guarded_commands(self.api, &self.config.guard_prefix);
        for (tuple, names) in map.iter() {
            let region = self.scope.region(tuple);
            if region == Region::Omit {
                continue;
            }
            open_region(dest, &region)?;
            for binding in names.iter().filter_map(|name| self.bindings.get(name)) {
                write!(dest, "{}", render(binding))?;
            }
            close_region(dest, &region)?;
        }
        Ok(())
    }
}

fn open_region<W: Write>(dest: &mut W, region: &Region) -> io::Result<()> {
    if let Region::Conditional(condition) = region {
        writeln!(dest, "#if {}", condition)?;
    }
    Ok(())
}

fn close_region<W: Write>(dest: &mut W, region: &Region) -> io::Result<()> {
    if let Region::Conditional(_) = region {
        writeln!(dest, "#endif")?;
    }
    Ok(())
}

fn write_bitmask_combinator<W: Write>(dest: &mut W, enum_name: &str) -> io::Result<()> {
    writeln!(
        dest,
        "constexpr core::Bitfield<{0}> operator|({0} left, {0} right) {{ return core::Bitfield<{0}>(left) | right;}}",
        enum_name
    )
}
