//! Per-command declaration and forwarding definition.

use std::collections::BTreeMap;

use crate::config::NamingRules;
use crate::naming::normalize_fn_name;
use crate::patches::{apply_patches, SymbolPatch};
use crate::registry::{Command, Declarator, Registry, RegistryError};
use crate::types::{call_argument, map_native_type, TypeMapping};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBinding {
    pub native_name: String,
    pub name: String,
    pub comment: Option<String>,
    /// Return type text as written before the name, e.g. `const uint8_t *`.
    pub return_prefix: String,
    /// Host return type when the native result must be cast back.
    pub return_cast: Option<String>,
    pub params: Vec<String>,
    pub call_args: Vec<String>,
}

impl CommandBinding {
    pub fn new(command: &Command, registry: &Registry, rules: &NamingRules) -> Self {
        let (return_decl, return_mapping) = host_declarator(&command.proto, registry, rules);
        let return_prefix = declarator_prefix(&return_decl);
        let return_cast = return_mapping
            .is_castable()
            .then(|| return_prefix.trim().to_string());

        let mut params = Vec::with_capacity(command.params.len());
        let mut call_args = Vec::with_capacity(command.params.len());
        for param in &command.params {
            let (host, mapping) = host_declarator(param, registry, rules);
            call_args.push(call_argument(&param.name, &param.type_text(), &mapping));
            params.push(host.render());
        }

        Self {
            native_name: command.name().to_string(),
            name: normalize_fn_name(command.name(), rules),
            comment: command.comment.clone(),
            return_prefix,
            return_cast,
            params,
            call_args,
        }
    }

    fn signature(&self) -> String {
        format!("{}{}({})", self.return_prefix, self.name, self.params.join(", "))
    }

    pub fn declaration(&self) -> String {
        let mut out = self.comment_line();
        out.push_str(&format!("extern {};\n", self.signature()));
        out
    }

    pub fn definition(&self) -> String {
        let call = format!("{}({})", self.native_name, self.call_args.join(", "));
        let body = match &self.return_cast {
            Some(host) => format!("static_cast<{}>({})", host, call),
            None => call,
        };
        let mut out = self.comment_line();
        out.push_str(&format!("{}\n{{\n    return {};\n}}\n", self.signature(), body));
        out
    }

    fn comment_line(&self) -> String {
        self.comment
            .as_ref()
            .map(|c| format!("// {}\n", c))
            .unwrap_or_default()
    }
}

/// Builds bindings for every command, patches applied first.
/// Excluded commands are absent from the result.
pub fn build_bindings(
    registry: &Registry,
    rules: &NamingRules,
    patches: &[SymbolPatch],
) -> Result<BTreeMap<String, CommandBinding>, RegistryError> {
    let mut bindings = BTreeMap::new();
    for (name, command) in &registry.commands {
        if let Some(patched) = apply_patches(command, patches)? {
            bindings.insert(name.clone(), CommandBinding::new(&patched, registry, rules));
        }
    }
    Ok(bindings)
}

/// Copy of `declarator` with its native type replaced by the host type.
fn host_declarator(declarator: &Declarator, registry: &Registry, rules: &NamingRules) -> (Declarator, TypeMapping) {
    let Some(ptype) = declarator.ptype.as_deref() else {
        return (declarator.clone(), TypeMapping::Native);
    };
    let group = declarator
        .group
        .as_deref()
        .filter(|g| registry.is_known_group(g));
    let mapping = map_native_type(ptype, group, rules);

    let mut host = declarator.clone();
    if let Some(host_type) = mapping.host_type() {
        host.ptype = Some(host_type.to_string());
    }
    (host, mapping)
}

fn declarator_prefix(declarator: &Declarator) -> String {
    format!(
        "{}{}{}",
        declarator.leading,
        declarator.ptype.as_deref().unwrap_or(""),
        declarator.trailing
    )
}
