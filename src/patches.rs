//! Per-command corrections for registry metadata errors.
//!
//! Applied to a copy of the command before any type or name normalization.
//! New irregularities are new table rows.

use crate::registry::{Command, RegistryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchAction {
    /// Force the native type of the parameter tagged `group`.
    /// Fatal when the command has no such parameter.
    ForceParamType { group: &'static str, ptype: &'static str },
    /// Re-tag every parameter tagged `from`. Zero matches is allowed.
    RetagParamGroup { from: &'static str, to: &'static str },
    /// Leave the command out of the generated binding.
    Exclude,
}

#[derive(Debug, Clone, Copy)]
pub struct SymbolPatch {
    pub command: &'static str,
    pub action: PatchAction,
}

pub const COMMAND_PATCHES: &[SymbolPatch] = &[
    SymbolPatch {
        command: "glTexImage2D",
        action: PatchAction::ForceParamType { group: "InternalFormat", ptype: "GLenum" },
    },
    SymbolPatch {
        command: "glTexImage3D",
        action: PatchAction::ForceParamType { group: "InternalFormat", ptype: "GLenum" },
    },
    SymbolPatch {
        command: "glNamedBufferData",
        action: PatchAction::RetagParamGroup { from: "VertexBufferObjectUsage", to: "BufferUsageARB" },
    },
    SymbolPatch {
        command: "glCopyImageSubData",
        action: PatchAction::RetagParamGroup { from: "CopyBufferSubDataTarget", to: "TextureTarget" },
    },
    // no shader binary formats are defined, so its format enum is never generated
    SymbolPatch { command: "glShaderBinary", action: PatchAction::Exclude },
];

/// Returns the patched command, or `None` when a patch excludes it.
pub fn apply_patches(command: &Command, patches: &[SymbolPatch]) -> Result<Option<Command>, RegistryError> {
    let mut patched = command.clone();

    for patch in patches.iter().filter(|p| p.command == command.name()) {
        match patch.action {
            PatchAction::Exclude => return Ok(None),
            PatchAction::ForceParamType { group, ptype } => {
                let param = patched
                    .params
                    .iter_mut()
                    .find(|p| p.group.as_deref() == Some(group) && p.ptype.is_some())
                    .ok_or_else(|| RegistryError::UnresolvedPatch {
                        command: patch.command.to_string(),
                        target: format!("parameter with group {}", group),
                    })?;
                param.ptype = Some(ptype.to_string());
            }
            PatchAction::RetagParamGroup { from, to } => {
                for param in patched.params.iter_mut().filter(|p| p.group.as_deref() == Some(from)) {
                    param.group = Some(to.to_string());
                }
            }
        }
    }

    Ok(Some(patched))
}
