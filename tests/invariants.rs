//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use std::collections::BTreeSet;
use std::fs;

use pretty_assertions::assert_eq;
use soglb_gen::{
    binding::build_bindings,
    config::{GeneratorConfig, NamingRules},
    emit::{emit_api, ApiArtifacts},
    guard::{build_guarded_commands, build_guarded_constants, guard_expression},
    naming::normalize_fn_name,
    patches::COMMAND_PATCHES,
    registry::Registry,
    resolve::resolve,
    GenerationPipeline, ViolationSeverity,
};

const X_REGISTRY: &str = r#"<registry>
  <enums namespace="X">
    <enum value="1" name="X_A" group="Letters"/>
    <enum value="2" name="X_B" group="Letters"/>
    <enum value="3" name="X_EXTRA_VALUE" group="Extra"/>
  </enums>
  <enums namespace="X" group="Flags" type="bitmask">
    <enum value="0x1" name="X_FLAG_ONE" group="Flags"/>
    <enum value="0x2" name="X_FLAG_TWO" group="Flags"/>
  </enums>
  <commands namespace="X">
    <command><proto>void <name>xDoThing</name></proto>
      <param><ptype>GLint</ptype> <name>value</name></param></command>
    <command><proto>void <name>xDoOtherThing</name></proto>
      <param><ptype>GLfloat</ptype> <name>value</name></param></command>
    <command><proto>void <name>xExtra</name></proto></command>
  </commands>
  <feature api="x" name="X_VERSION_1_0" number="1.0">
    <require><enum name="X_A"/><enum name="X_B"/><command name="xDoThing"/></require>
  </feature>
  <feature api="x" name="X_VERSION_2_0" number="2.0">
    <require><enum name="X_FLAG_ONE"/><enum name="X_FLAG_TWO"/><command name="xDoOtherThing"/></require>
    <remove><enum name="X_A"/></remove>
  </feature>
  <extensions>
    <extension name="X_EXT_extra" supported="x">
      <require><enum name="X_EXTRA_VALUE"/><command name="xExtra"/></require>
    </extension>
  </extensions>
</registry>"#;

const LEVEL_1_0: &str = "API_LEVEL_X_VERSION_1_0";
const LEVEL_2_0: &str = "API_LEVEL_X_VERSION_2_0";

fn x_rules(extension_suffixes: &[&str]) -> NamingRules {
    NamingRules {
        constant_prefix: "X_".to_string(),
        command_prefix: "x".to_string(),
        extension_suffixes: extension_suffixes.iter().map(|s| s.to_string()).collect(),
    }
}

fn x_config(filter: Option<&str>) -> GeneratorConfig {
    GeneratorConfig {
        enabled_apis: vec!["x".to_string()],
        enabled_extensions: vec![],
        api_level_filter: filter.map(str::to_string),
        naming: x_rules(&[]),
        ..Default::default()
    }
}

fn generate(doc: &str, config: &GeneratorConfig) -> ApiArtifacts {
    let registry = Registry::from_bytes(doc.as_bytes()).unwrap();
    let availability = resolve(&registry, config).unwrap();
    let bindings = build_bindings(&registry, &config.naming, COMMAND_PATCHES).unwrap();
    emit_api(&registry, availability.api("x").unwrap(), &bindings, config).unwrap()
}

fn strings(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn invariant_guard_map_partitions_symbols() {
    let registry = Registry::from_bytes(X_REGISTRY.as_bytes()).unwrap();
    let availability = resolve(&registry, &x_config(None)).unwrap();
    let api = availability.api("x").unwrap();

    let map = build_guarded_commands(api, "API_LEVEL");
    let resident: BTreeSet<&str> = api
        .levels()
        .flat_map(|level| level.symbols.commands.iter().map(String::as_str))
        .collect();

    let mut seen = BTreeSet::new();
    for (_, symbols) in map.iter() {
        for symbol in symbols {
            assert!(seen.insert(symbol.as_str()), "{} in two regions", symbol);
        }
    }
    assert_eq!(seen, resident);
    assert_eq!(map.symbols(), resident);
}

#[test]
fn invariant_scenario_without_filter() {
    let artifacts = generate(X_REGISTRY, &x_config(None));

    let expected_declarations = "#pragma once
#include \"soglb_core.hpp\" // IWYU pragma: export
namespace x::api
{
// API feature levels
// #define API_LEVEL_X_VERSION_1_0
// #define API_LEVEL_X_VERSION_2_0

// special numbers

// enums
#if defined(API_LEVEL_X_VERSION_2_0)
enum class Flags : core::EnumType
{
    FlagOne = 0x1,
    FlagTwo = 0x2,
};
constexpr core::Bitfield<Flags> operator|(Flags left, Flags right) { return core::Bitfield<Flags>(left) | right;}
#endif

enum class Letters : core::EnumType
{
#if defined(API_LEVEL_X_VERSION_1_0)
    A = 1,
#endif
    B = 2,
};

// commands
extern void doThing(int32_t value);
#if defined(API_LEVEL_X_VERSION_2_0)
extern void doOtherThing(float value);
#endif
}
";
    assert_eq!(artifacts.declarations, expected_declarations);

    let expected_implementation = "#include \"x.hpp\"
#include \"x_api_provider.hpp\"
namespace x::api
{
void doThing(int32_t value)
{
    return xDoThing(static_cast<GLint>(value));
}
#if defined(API_LEVEL_X_VERSION_2_0)
void doOtherThing(float value)
{
    return xDoOtherThing(static_cast<GLfloat>(value));
}
#endif
}
";
    assert_eq!(artifacts.implementation, expected_implementation);
    assert!(artifacts.violations.is_empty());
}

#[test]
fn invariant_scenario_with_filter() {
    let artifacts = generate(X_REGISTRY, &x_config(Some(LEVEL_1_0)));
    let text = &artifacts.declarations;

    assert!(text.contains("// API feature level: API_LEVEL_X_VERSION_1_0\n"));
    assert!(!text.contains("#if"));
    assert!(text.contains("enum class Letters : core::EnumType\n{\n    A = 1,\n    B = 2,\n};\n"));
    assert!(text.contains("extern void doThing(int32_t value);\n"));
    assert!(!text.contains("doOtherThing"));
    // every member of Flags arrives in 2.0, so the whole enum is filtered out
    assert!(!text.contains("Flags"));
    assert!(!artifacts.implementation.contains("#if"));
}

#[test]
fn invariant_removed_symbol_unreachable_from_later_level() {
    let registry = Registry::from_bytes(X_REGISTRY.as_bytes()).unwrap();
    let availability = resolve(&registry, &x_config(None)).unwrap();
    let api = availability.api("x").unwrap();

    let letters = registry.group("Letters").unwrap();
    let map = build_guarded_constants(api, "API_LEVEL", letters, &registry.constants).unwrap();
    assert_eq!(map.get(&[LEVEL_1_0.to_string()]), Some(&strings(&["X_A"])));
    assert_eq!(
        map.get(&[LEVEL_1_0.to_string(), LEVEL_2_0.to_string()]),
        Some(&strings(&["X_B"]))
    );
    for (tuple, symbols) in map.iter() {
        if tuple.iter().any(|g| g == LEVEL_2_0) {
            assert!(!symbols.contains("X_A"));
        }
    }
}

#[test]
fn invariant_monotonic_replay_is_repeatable() {
    let doc = r#"<registry>
  <enums><enum value="1" name="X_A"/><enum value="2" name="X_B"/></enums>
  <feature api="x" name="X_VERSION_1_0" number="1.0"><require><enum name="X_A"/></require></feature>
  <feature api="x" name="X_VERSION_1_1" number="1.1"><require><enum name="X_B"/></require></feature>
  <feature api="x" name="X_VERSION_1_2" number="1.2"><remove><enum name="X_A"/></remove></feature>
</registry>"#;
    let registry = Registry::from_bytes(doc.as_bytes()).unwrap();
    let config = x_config(None);

    let first = resolve(&registry, &config).unwrap();
    let second = resolve(&registry, &config).unwrap();
    for availability in [&first, &second] {
        let last = availability.api("x").unwrap().versions.last().unwrap();
        assert_eq!(last.profiles[&None].constants, strings(&["X_B"]));
    }
}

#[test]
fn invariant_disabled_extension_contributes_nothing() {
    let registry = Registry::from_bytes(X_REGISTRY.as_bytes()).unwrap();

    let disabled = resolve(&registry, &x_config(None)).unwrap();
    for level in disabled.api("x").unwrap().levels() {
        assert!(!level.symbols.constants.contains("X_EXTRA_VALUE"));
        assert!(!level.symbols.commands.contains("xExtra"));
    }

    let config = GeneratorConfig {
        enabled_extensions: vec!["X_EXT_extra".to_string()],
        ..x_config(None)
    };
    let enabled = resolve(&registry, &config).unwrap();
    for level in enabled.api("x").unwrap().levels() {
        assert!(level.symbols.constants.contains("X_EXTRA_VALUE"));
        assert!(level.symbols.commands.contains("xExtra"));
    }

    // resident at every level, so no conditional
    let artifacts = generate(X_REGISTRY, &config);
    assert!(artifacts
        .declarations
        .contains("enum class Extra : core::EnumType\n{\n    ExtraValue = 3,\n};\n"));
    assert!(artifacts.declarations.contains("// commands\nextern void doThing(int32_t value);\nextern void extra();\n"));
}

#[test]
fn invariant_promotion_keeps_members_and_condition() {
    let registry = Registry::from_bytes(X_REGISTRY.as_bytes()).unwrap();
    let config = x_config(None);
    let availability = resolve(&registry, &config).unwrap();
    let api = availability.api("x").unwrap();

    let flags = registry.group("Flags").unwrap();
    let map = build_guarded_constants(api, "API_LEVEL", flags, &registry.constants).unwrap();
    let (tuple, members) = map.single().unwrap();
    assert_eq!(members, &strings(&["X_FLAG_ONE", "X_FLAG_TWO"]));

    let artifacts = generate(X_REGISTRY, &config);
    let promoted = format!("#if {}\nenum class Flags : core::EnumType\n{{\n", guard_expression(tuple));
    let start = artifacts.declarations.find(&promoted).unwrap();
    let block = &artifacts.declarations[start..];
    let block = &block[..block.find("#endif").unwrap()];

    let emitted: Vec<&str> = block
        .lines()
        .filter(|line| line.starts_with("    "))
        .map(str::trim)
        .collect();
    assert_eq!(emitted, vec!["FlagOne = 0x1,", "FlagTwo = 0x2,"]);
    // no member-level conditional inside a promoted block
    assert_eq!(block.matches("#if").count(), 1);

    // filtering on the shared level emits the same members unconditionally
    let filtered = generate(X_REGISTRY, &x_config(Some(LEVEL_2_0)));
    assert!(filtered
        .declarations
        .contains("enum class Flags : core::EnumType\n{\n    FlagOne = 0x1,\n    FlagTwo = 0x2,\n};\n"));
}

#[test]
fn invariant_naming_is_deterministic() {
    let rules = x_rules(&[]);
    assert_eq!(normalize_fn_name("xGetFloatv", &rules), normalize_fn_name("xGetFloatv", &rules));
    assert_eq!(normalize_fn_name("xGetFloatv", &rules), "getFloat");
    assert_eq!(normalize_fn_name("xDeleteBuffers", &rules), "deleteBuffers");
}

const COLLISION_REGISTRY: &str = r#"<registry>
  <enums namespace="X">
    <enum value="7" name="X_FOO" group="Dup"/>
    <enum value="VALUE" name="X_FOO_EXT" group="Dup"/>
  </enums>
  <feature api="x" name="X_VERSION_1_0" number="1.0">
    <require><enum name="X_FOO"/><enum name="X_FOO_EXT"/></require>
  </feature>
</registry>"#;

fn collision_config() -> GeneratorConfig {
    GeneratorConfig {
        naming: x_rules(&["_EXT"]),
        ..x_config(None)
    }
}

#[test]
fn invariant_equal_collision_is_written_once() {
    let doc = COLLISION_REGISTRY.replace("VALUE", "7");
    let artifacts = generate(&doc, &collision_config());

    assert_eq!(artifacts.declarations.matches("    Foo = 7,\n").count(), 1);
    assert!(artifacts.violations.is_empty());
}

#[test]
fn invariant_conflicting_collision_keeps_first_value() {
    let doc = COLLISION_REGISTRY.replace("VALUE", "8");
    let artifacts = generate(&doc, &collision_config());

    assert_eq!(artifacts.declarations.matches("    Foo = ").count(), 1);
    assert!(artifacts.declarations.contains("    Foo = 7,\n"));
    assert_eq!(artifacts.violations.len(), 1);
    let conflict = &artifacts.violations[0];
    assert_eq!(conflict.rule, "enumerator_conflict");
    assert_eq!(conflict.severity, ViolationSeverity::Error);
    assert_eq!(conflict.expected.as_deref(), Some("7"));
    assert_eq!(conflict.actual.as_deref(), Some("8"));
}

#[test]
fn invariant_pipeline_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let registry_path = dir.path().join("x.xml");
    fs::write(&registry_path, X_REGISTRY).unwrap();
    let config = GeneratorConfig {
        registry_path,
        output_dir: dir.path().join("out"),
        ..x_config(None)
    };
    let pipeline = GenerationPipeline::new(config);

    let first = pipeline.run().unwrap();
    let header = fs::read(dir.path().join("out").join("x.hpp")).unwrap();
    let source = fs::read(dir.path().join("out").join("x.cpp")).unwrap();

    let second = pipeline.run().unwrap();
    assert_eq!(fs::read(dir.path().join("out").join("x.hpp")).unwrap(), header);
    assert_eq!(fs::read(dir.path().join("out").join("x.cpp")).unwrap(), source);

    assert_eq!(first.run_hash, second.run_hash);
    assert_eq!(first.registry_hash, second.registry_hash);
    let hashes = |m: &soglb_gen::GenerationManifest| {
        m.apis[0].artifacts.iter().map(|a| a.sha256.clone()).collect::<Vec<_>>()
    };
    assert_eq!(hashes(&first), hashes(&second));
}

const PROFILE_REGISTRY: &str = r#"<registry>
  <enums namespace="X" group="SpecialNumbers">
    <enum value="0xFFFFFFFFFFFFFFFF" name="X_TIMEOUT_IGNORED" group="SpecialNumbers" type="ull"/>
  </enums>
  <enums namespace="X">
    <enum value="1" name="X_A" group="Letters"/>
    <enum value="2" name="X_B" group="Letters"/>
    <enum value="3" name="X_C" group="Letters"/>
  </enums>
  <groups>
    <group name="Letters"><enum name="X_GONE"/></group>
  </groups>
  <commands namespace="X">
    <command><proto>void <name>xBase</name></proto></command>
    <command><proto>void <name>xExt</name></proto></command>
  </commands>
  <feature api="x" name="X_VERSION_1_0" number="1.0">
    <require><enum name="X_TIMEOUT_IGNORED"/><enum name="X_A"/><enum name="X_B"/><command name="xBase"/></require>
  </feature>
  <feature api="x" name="X_VERSION_2_0" number="2.0">
    <require profile="compat"><enum name="X_C"/></require>
    <remove profile="core"><enum name="X_B"/></remove>
  </feature>
  <extensions>
    <extension name="X_EXT_core_only" supported="x">
      <require profile="core"><command name="xExt"/></require>
    </extension>
  </extensions>
</registry>"#;

#[test]
fn invariant_profiles_and_special_numbers() {
    let config = GeneratorConfig {
        enabled_extensions: vec!["X_EXT_core_only".to_string()],
        ..x_config(None)
    };

    let registry = Registry::from_bytes(PROFILE_REGISTRY.as_bytes()).unwrap();
    let availability = resolve(&registry, &config).unwrap();
    let api = availability.api("x").unwrap();
    let levels: Vec<(&str, Option<&str>)> = api.levels().map(|l| (l.version, l.profile)).collect();
    assert_eq!(
        levels,
        vec![
            ("X_VERSION_1_0", None),
            ("X_VERSION_2_0", Some("compat")),
            ("X_VERSION_2_0", Some("core")),
        ]
    );
    // the scoped extension requirement lands in the core profile only
    for level in api.levels() {
        assert_eq!(level.symbols.commands.contains("xExt"), level.profile == Some("core"));
    }

    let artifacts = generate(PROFILE_REGISTRY, &config);
    let expected_declarations = "#pragma once
#include \"soglb_core.hpp\" // IWYU pragma: export
namespace x::api
{
// API feature levels
// #define API_LEVEL_X_VERSION_1_0
// #define API_LEVEL_X_VERSION_2_0_compat
// #define API_LEVEL_X_VERSION_2_0_core

// special numbers
constexpr auto TimeoutIgnored = 0xFFFFFFFFFFFFFFFFull;

// enums
enum class Letters : core::EnumType
{
#if defined(API_LEVEL_X_VERSION_1_0) || defined(API_LEVEL_X_VERSION_2_0_compat)
    B = 2,
#endif
    A = 1,
#if defined(API_LEVEL_X_VERSION_2_0_compat)
    C = 3,
#endif
};

// commands
extern void base();
#if defined(API_LEVEL_X_VERSION_2_0_core)
extern void ext();
#endif
}
";
    assert_eq!(artifacts.declarations, expected_declarations);
    assert!(!artifacts.declarations.contains("Gone"));
}
