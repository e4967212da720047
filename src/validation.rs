//! Validation System - Rule/Policy Separation
//!
//! Rules produce structured violations for recoverable registry defects.
//! Policy decides whether error-severity findings stop generation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::binding::CommandBinding;
use crate::config::{FailureMode, GeneratorConfig};
use crate::guard::level_guards;
use crate::registry::{Registry, SPECIAL_NUMBERS_GROUP};
use crate::resolve::ResolvedApi;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    pub symbol: Option<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub api: String,
    pub violations: Vec<ValidationViolation>,
}

impl ValidationResult {
    pub fn success(api: &str) -> Self {
        Self { valid: true, api: api.to_string(), violations: vec![] }
    }

    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(|v| v.severity == ViolationSeverity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationViolation> {
        self.violations.iter().filter(|v| v.severity == ViolationSeverity::Error)
    }
}

/// Everything a rule may inspect for one API.
pub struct ValidationContext<'a> {
    pub registry: &'a Registry,
    pub api: &'a ResolvedApi,
    pub bindings: &'a BTreeMap<String, CommandBinding>,
    pub config: &'a GeneratorConfig,
}

pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationViolation>;
}

// --- Concrete Rules ---

/// Group members missing from the constant table.
pub struct GroupMembersRule;

impl ValidationRule for GroupMembersRule {
    fn name(&self) -> &'static str { "group_members" }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationViolation> {
        ctx.registry
            .groups
            .values()
            .flat_map(|group| {
                group
                    .members
                    .iter()
                    .filter(|m| ctx.registry.constants.get(m, &ctx.api.name).is_none())
                    .map(move |m| ValidationViolation {
                        rule: self.name().to_string(),
                        severity: ViolationSeverity::Warning,
                        message: format!("Enum {} references an undefined constant", group.name),
                        symbol: Some(m.clone()),
                        expected: Some("constant defined in <enums>".to_string()),
                        actual: None,
                    })
            })
            .collect()
    }
}

/// Groups with no member resident at any level are not emitted.
pub struct EmptyGroupRule;

impl ValidationRule for EmptyGroupRule {
    fn name(&self) -> &'static str { "empty_group" }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationViolation> {
        ctx.registry
            .groups
            .values()
            .filter(|group| group.name != SPECIAL_NUMBERS_GROUP)
            .filter(|group| {
                !ctx.api
                    .levels()
                    .any(|level| group.members.iter().any(|m| level.symbols.constants.contains(m)))
            })
            .map(|group| ValidationViolation {
                rule: self.name().to_string(),
                severity: ViolationSeverity::Info,
                message: "Enum skipped - no members".to_string(),
                symbol: Some(group.name.clone()),
                expected: None,
                actual: None,
            })
            .collect()
    }
}

/// Resident commands without a usable definition.
pub struct UnboundCommandRule;

impl ValidationRule for UnboundCommandRule {
    fn name(&self) -> &'static str { "unbound_commands" }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationViolation> {
        let mut resident: Vec<&String> = ctx
            .api
            .levels()
            .flat_map(|level| level.symbols.commands.iter())
            .collect();
        resident.sort();
        resident.dedup();

        resident
            .into_iter()
            .filter(|name| !ctx.bindings.contains_key(*name))
            .map(|name| ValidationViolation {
                rule: self.name().to_string(),
                severity: ViolationSeverity::Warning,
                message: if ctx.registry.commands.contains_key(name) {
                    "Command excluded by patch".to_string()
                } else {
                    "Command referenced but not defined".to_string()
                },
                symbol: Some(name.clone()),
                expected: None,
                actual: None,
            })
            .collect()
    }
}

/// The configured level filter must name a feature level of the API.
pub struct LevelFilterRule;

impl ValidationRule for LevelFilterRule {
    fn name(&self) -> &'static str { "level_filter" }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationViolation> {
        let Some(filter) = ctx.config.api_level_filter.as_deref() else {
            return vec![];
        };
        let levels = level_guards(ctx.api, &ctx.config.guard_prefix);
        if levels.iter().any(|l| l == filter) {
            return vec![];
        }
        vec![ValidationViolation {
            rule: self.name().to_string(),
            severity: ViolationSeverity::Error,
            message: format!("Level filter matches no feature level of API {}", ctx.api.name),
            symbol: Some(filter.to_string()),
            expected: Some(levels.join(", ")),
            actual: Some(filter.to_string()),
        }]
    }
}

/// Validator orchestrates rules and applies policy
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(GroupMembersRule),
                Box::new(EmptyGroupRule),
                Box::new(UnboundCommandRule),
                Box::new(LevelFilterRule),
            ],
        }
    }

    pub fn validate(&self, ctx: &ValidationContext<'_>) -> ValidationResult {
        let violations: Vec<_> = self.rules.iter().flat_map(|rule| rule.validate(ctx)).collect();
        let mut result = ValidationResult::success(&ctx.api.name);

        result.valid = match ctx.config.failure_mode {
            FailureMode::Block => !violations.iter().any(|v| v.severity == ViolationSeverity::Error),
            // never block, just record
            FailureMode::Warn | FailureMode::Log => true,
        };
        result.violations = violations;
        result
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::build_bindings;
    use crate::patches::COMMAND_PATCHES;
    use crate::resolve::resolve;

    const DOC: &str = r#"<registry>
  <enums namespace="X">
    <enum value="1" name="X_A" group="Used"/>
    <enum value="2" name="X_B" group="Unused"/>
  </enums>
  <groups><group name="Used"><enum name="X_MISSING"/></group></groups>
  <commands>
    <command><proto>void <name>xDoThing</name></proto></command>
  </commands>
  <feature api="x" name="X_VERSION_1_0" number="1.0">
    <require><enum name="X_A"/><command name="xDoThing"/><command name="xGhost"/></require>
  </feature>
</registry>"#;

    fn validate(config: GeneratorConfig) -> ValidationResult {
        let registry = Registry::from_bytes(DOC.as_bytes()).unwrap();
        let availability = resolve(&registry, &config).unwrap();
        let bindings = build_bindings(&registry, &config.naming, COMMAND_PATCHES).unwrap();
        let ctx = ValidationContext {
            registry: &registry,
            api: availability.api("x").unwrap(),
            bindings: &bindings,
            config: &config,
        };
        Validator::new().validate(&ctx)
    }

    fn by_rule<'a>(result: &'a ValidationResult, rule: &str) -> Vec<&'a ValidationViolation> {
        result.violations.iter().filter(|v| v.rule == rule).collect()
    }

    #[test]
    fn test_recoverable_findings() {
        let config = GeneratorConfig { api_level_filter: None, ..Default::default() };
        let result = validate(config);
        assert!(result.valid);
        assert!(!result.has_errors());

        let missing = by_rule(&result, "group_members");
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].symbol.as_deref(), Some("X_MISSING"));

        let empty = by_rule(&result, "empty_group");
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].symbol.as_deref(), Some("Unused"));

        let unbound = by_rule(&result, "unbound_commands");
        assert_eq!(unbound.len(), 1);
        assert_eq!(unbound[0].symbol.as_deref(), Some("xGhost"));
    }

    #[test]
    fn test_unknown_filter_blocks_only_in_block_mode() {
        let warn = GeneratorConfig {
            api_level_filter: Some("API_LEVEL_X_VERSION_9_9".to_string()),
            ..Default::default()
        };
        let result = validate(warn.clone());
        assert!(result.valid);
        assert!(result.has_errors());

        let block = GeneratorConfig { failure_mode: FailureMode::Block, ..warn };
        let result = validate(block);
        assert!(!result.valid);
        assert_eq!(result.errors().count(), 1);
    }
}
