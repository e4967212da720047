//! Name normalization for generated declarations.
//!
//! `GL_DEPTH_BUFFER_BIT` becomes `DepthBufferBit`, `glUniform4fv` becomes
//! `uniform4`.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::NamingRules;

/// Endings that are words, not element-type codes.
const SEMANTIC_ENDINGS: &[&str] = &[
    "buffers", "elements", "shaders", "textures", "status", "arrays", "attrib", "instanced",
    "enabled", "queries", "indexed", "indexedv",
];

/// Array-query endings that keep their base word but lose the trailing `v`.
const VECTOR_ENDINGS: &[&str] = &[
    "booleanv", "doublev", "floatv", "integerv", "integer64v", "pointerv", "createshaderprogramv",
    "arrayv", "indexedv",
];

/// Names that look like they carry a type suffix but don't.
const SUFFIX_EXEMPT_PREFIXES: &[&str] = &["getQueryBufferObject"];

fn type_suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([1-9]?)(u?(b|s|i|i64)|f|d)(v?)$").expect("type suffix pattern is valid")
    })
}

pub fn strip_ext_suffix<'a>(name: &'a str, rules: &NamingRules) -> &'a str {
    rules
        .extension_suffixes
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix.as_str()))
        .unwrap_or(name)
}

pub fn normalize_constant_name(name: &str, rules: &NamingRules) -> String {
    let name = name.strip_prefix(rules.constant_prefix.as_str()).unwrap_or(name);
    let name = strip_ext_suffix(name, rules).trim_end_matches('_');

    let pascal: String = name.split('_').map(capitalize_segment).collect();
    prefix_leading_digit(pascal)
}

pub fn normalize_fn_name(name: &str, rules: &NamingRules) -> String {
    let name = name.strip_prefix(rules.command_prefix.as_str()).unwrap_or(name);
    let lowered = lower_first(name);
    let mut name = strip_ext_suffix(&lowered, rules).to_string();

    let lower = name.to_lowercase();
    let semantic = SEMANTIC_ENDINGS.iter().any(|ending| lower.ends_with(ending));
    let exempt = SUFFIX_EXEMPT_PREFIXES.iter().any(|prefix| name.starts_with(prefix));
    if !semantic && !exempt {
        name = type_suffix_pattern().replace(&name, "${1}").into_owned();
    }

    let lower = name.to_lowercase();
    if VECTOR_ENDINGS.iter().any(|ending| lower.ends_with(ending)) {
        name.pop();
    }

    let lower = name.to_lowercase();
    if lower.ends_with("i_v") {
        name.truncate(name.len() - 3);
        name.push('I');
    } else if lower.ends_with("i64_v") {
        name.truncate(name.len() - 5);
        name.push('I');
    }

    prefix_leading_digit(name)
}

fn capitalize_segment(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn prefix_leading_digit(name: String) -> String {
    if name.chars().next().map_or(false, |c| c.is_ascii_digit()) {
        format!("_{}", name)
    } else {
        name
    }
}
