//! Native pseudo-types to host types, and the call-site expressions that
//! convert host values back for the native entry point.

use crate::config::NamingRules;
use crate::naming::strip_ext_suffix;

/// Native types with a fixed host equivalent.
const HOST_TYPES: &[(&str, &str)] = &[
    ("GLboolean", "bool"),
    ("GLubyte", "uint8_t"),
    ("GLushort", "uint16_t"),
    ("GLuint", "uint32_t"),
    ("GLuint64", "uint64_t"),
    ("GLuint64EXT", "uint64_t"),
    ("GLbyte", "int8_t"),
    ("GLshort", "int16_t"),
    ("GLint", "int32_t"),
    ("GLint64", "int64_t"),
    ("GLint64EXT", "int64_t"),
    ("GLfloat", "float"),
    ("GLdouble", "double"),
    ("GLvoid", "void"),
    ("GLchar", "char"),
    ("GLcharARB", "char"),
    ("GLsizei", "core::SizeType"),
    ("GLfixed", "core::Fixed"),
    ("GLhalf", "core::Half"),
    ("GLhalfNV", "core::Half"),
    ("GLintptr", "std::intptr_t"),
    ("GLintptrARB", "std::intptr_t"),
    ("GLsizeiptr", "std::size_t"),
    ("GLsizeiptrARB", "std::size_t"),
    ("GLclampf", "core::ClampedFloat"),
    ("GLclampd", "core::ClampedDouble"),
    ("GLhandleARB", "core::Handle"),
    ("GLsync", "core::Sync"),
];

const CALLBACK_TYPES: &[&str] = &["GLDEBUGPROC", "GLDEBUGPROCARB", "GLDEBUGPROCKHR", "GLDEBUGPROCAMD"];
const CALLBACK_HOST_TYPE: &str = "core::DebugProc";

const BITFIELD: &str = "GLbitfield";
const ENUM: &str = "GLenum";
const GENERIC_ENUM_TYPE: &str = "core::EnumType";
const RAW_BITFIELD_TYPE: &str = "uint32_t";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeMapping {
    /// Host type converted with a value cast.
    Semantic { host: String },
    /// `core::Bitfield<Group>`; the raw bits come from `.value()`.
    Bitmask { host: String },
    /// Host alias that must be reinterpreted, never value-cast.
    Callback { host: String },
    /// No host type; the native type is used as declared.
    Native,
}

impl TypeMapping {
    pub fn host_type(&self) -> Option<&str> {
        match self {
            TypeMapping::Semantic { host } | TypeMapping::Bitmask { host } | TypeMapping::Callback { host } => {
                Some(host)
            }
            TypeMapping::Native => None,
        }
    }

    /// Whether results of this type are cast back from the native call.
    pub fn is_castable(&self) -> bool {
        matches!(self, TypeMapping::Semantic { .. } | TypeMapping::Bitmask { .. })
    }
}

/// Maps a native pseudo-type. `group` is the enum-group tag, already
/// filtered to groups the registry knows.
pub fn map_native_type(ptype: &str, group: Option<&str>, rules: &NamingRules) -> TypeMapping {
    match ptype {
        BITFIELD => match group {
            Some(group) => TypeMapping::Bitmask {
                host: format!("core::Bitfield<{}>", strip_ext_suffix(group, rules)),
            },
            None => TypeMapping::Semantic { host: RAW_BITFIELD_TYPE.to_string() },
        },
        ENUM => TypeMapping::Semantic {
            host: group
                .map(|g| strip_ext_suffix(g, rules).to_string())
                .unwrap_or_else(|| GENERIC_ENUM_TYPE.to_string()),
        },
        t if CALLBACK_TYPES.contains(&t) => TypeMapping::Callback { host: CALLBACK_HOST_TYPE.to_string() },
        t => HOST_TYPES
            .iter()
            .find(|(native, _)| *native == t)
            .map(|(_, host)| TypeMapping::Semantic { host: host.to_string() })
            .unwrap_or(TypeMapping::Native),
    }
}

/// Expression passing parameter `name` to the native entry point.
/// `native_type` is the parameter's declared native type text.
pub fn call_argument(name: &str, native_type: &str, mapping: &TypeMapping) -> String {
    let pointer = native_type.contains('*');
    match mapping {
        TypeMapping::Bitmask { .. } => format!("{}.value()", name),
        TypeMapping::Semantic { .. } if pointer => {
            format!("detail::constAway(reinterpret_cast<{}>({}))", native_type, name)
        }
        TypeMapping::Semantic { .. } => format!("static_cast<{}>({})", native_type, name),
        TypeMapping::Native if pointer => format!("detail::constAway({})", name),
        TypeMapping::Callback { .. } => format!("reinterpret_cast<{}>({})", native_type, name),
        TypeMapping::Native => name.to_string(),
    }
}
