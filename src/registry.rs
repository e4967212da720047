//! Registry Loader
//!
//! Parses the API registry document into immutable tables: per-API versions
//! with their requirement/removal deltas, extensions, constants, enum groups
//! and commands. No semantic validation happens here beyond structure.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Read;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::dom::{self, Element, Node};

/// Group whose members are emitted as plain named constants.
pub const SPECIAL_NUMBERS_GROUP: &str = "SpecialNumbers";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Malformed registry document: {0}")]
    Xml(#[from] xml::reader::Error),

    #[error("Registry document has no root element")]
    EmptyDocument,

    #[error("<{element}> is missing attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },

    #[error("<{element}> in {context} is missing child <{child}>")]
    MissingElement { element: String, child: String, context: String },

    #[error("Unexpected tag <{tag}> in {context}")]
    UnknownReference { tag: String, context: String },

    #[error("Duplicate constant {0}")]
    DuplicateConstant(String),

    #[error("Duplicate command {0}")]
    DuplicateCommand(String),

    #[error("Invalid version number '{number}' for feature {feature}")]
    InvalidVersion { feature: String, number: String },

    #[error("Patch for {command} references missing {target}")]
    UnresolvedPatch { command: String, target: String },
}

/// Orderable version key of a feature, e.g. `4.5`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VersionNumber(semver::Version);

impl VersionNumber {
    pub fn parse(number: &str) -> Option<Self> {
        let dots = number.matches('.').count();
        let padded = match dots {
            0 => format!("{}.0.0", number),
            1 => format!("{}.0", number),
            _ => number.to_string(),
        };
        semver::Version::parse(&padded).ok().map(Self)
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0.major, self.0.minor)?;
        if self.0.patch != 0 {
            write!(f, ".{}", self.0.patch)?;
        }
        Ok(())
    }
}

/// One entry of a requirement block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Constant(String),
    Command(String),
    Type(String),
}

impl Reference {
    fn from_element(element: &Element, context: &str) -> Result<Self, RegistryError> {
        let name = || require_attr(element, "name").map(str::to_string);
        match element.name.as_str() {
            "enum" => Ok(Reference::Constant(name()?)),
            "command" => Ok(Reference::Command(name()?)),
            "type" => Ok(Reference::Type(name()?)),
            other => Err(RegistryError::UnknownReference {
                tag: other.to_string(),
                context: context.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOp {
    Add,
    Remove,
}

/// A `<require>` or `<remove>` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub op: DeltaOp,
    /// `None` applies to every profile, including ones discovered later.
    pub profile: Option<String>,
    pub api: Option<String>,
    pub references: Vec<Reference>,
}

impl Delta {
    pub fn applies_to_api(&self, api: &str) -> bool {
        self.api.as_deref().map_or(true, |a| a == api)
    }
}

#[derive(Debug, Clone)]
pub struct Version {
    pub name: String,
    pub number: VersionNumber,
    pub deltas: Vec<Delta>,
}

#[derive(Debug, Clone)]
pub struct Api {
    pub name: String,
    /// Document order; the resolver sorts by `number`.
    pub versions: Vec<Version>,
}

#[derive(Debug, Clone)]
pub struct Extension {
    pub name: String,
    pub supported: BTreeSet<String>,
    pub requires: Vec<Delta>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    pub name: String,
    pub value: String,
    /// Literal suffix such as `u` or `ull`.
    pub type_suffix: String,
    pub api: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumGroup {
    pub name: String,
    pub members: BTreeSet<String>,
    pub is_bitmask: bool,
}

/// Text around a `<ptype>` and `<name>`: `const <ptype>GLuint</ptype> *<name>v</name>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarator {
    pub leading: String,
    pub ptype: Option<String>,
    pub trailing: String,
    pub name: String,
    pub after: String,
    pub group: Option<String>,
}

impl Declarator {
    fn from_element(element: &Element, command: &str) -> Result<Self, RegistryError> {
        let mut declarator = Declarator {
            group: element.attr("group").map(str::to_string),
            ..Default::default()
        };
        let mut seen_ptype = false;
        let mut seen_name = false;

        for node in &element.children {
            match node {
                Node::Text(text) if seen_name => declarator.after.push_str(text),
                Node::Text(text) if seen_ptype => declarator.trailing.push_str(text),
                Node::Text(text) => declarator.leading.push_str(text),
                Node::Element(e) if e.name == "ptype" => {
                    declarator.ptype = Some(e.text().trim().to_string());
                    seen_ptype = true;
                }
                Node::Element(e) if e.name == "name" => {
                    declarator.name = e.text().trim().to_string();
                    seen_name = true;
                }
                Node::Element(e) => {
                    let text = e.text();
                    if seen_name {
                        declarator.after.push_str(&text);
                    } else if seen_ptype {
                        declarator.trailing.push_str(&text);
                    } else {
                        declarator.leading.push_str(&text);
                    }
                }
            }
        }

        if !seen_name {
            return Err(RegistryError::MissingElement {
                element: element.name.clone(),
                child: "name".to_string(),
                context: command.to_string(),
            });
        }
        Ok(declarator)
    }

    /// The declarator without its name, e.g. `const GLuint *`.
    pub fn type_text(&self) -> String {
        format!(
            "{}{}{}{}",
            self.leading,
            self.ptype.as_deref().unwrap_or(""),
            self.trailing,
            self.after
        )
        .trim()
        .to_string()
    }

    pub fn render(&self) -> String {
        format!(
            "{}{}{}{}{}",
            self.leading,
            self.ptype.as_deref().unwrap_or(""),
            self.trailing,
            self.name,
            self.after
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub proto: Declarator,
    pub params: Vec<Declarator>,
    pub comment: Option<String>,
    /// Informational only.
    pub aliases: BTreeSet<String>,
}

impl Command {
    pub fn name(&self) -> &str {
        &self.proto.name
    }

    fn from_element(element: &Element) -> Result<Self, RegistryError> {
        let proto = element.child("proto").ok_or_else(|| RegistryError::MissingElement {
            element: "command".to_string(),
            child: "proto".to_string(),
            context: "commands".to_string(),
        })?;
        let proto = Declarator::from_element(proto, "commands")?;
        let params = element
            .elements_named("param")
            .map(|p| Declarator::from_element(p, &proto.name))
            .collect::<Result<Vec<_>, _>>()?;
        let aliases = element
            .elements_named("alias")
            .filter_map(|a| a.attr("name").map(str::to_string))
            .collect();

        Ok(Self {
            proto,
            params,
            comment: element.attr("comment").map(str::to_string),
            aliases,
        })
    }
}

/// Constants keyed by name, one entry per distinct `api` attribute.
#[derive(Debug, Clone, Default)]
pub struct ConstantTable {
    entries: BTreeMap<String, Vec<Constant>>,
}

impl ConstantTable {
    pub fn insert(&mut self, constant: Constant) -> Result<(), RegistryError> {
        let slot = self.entries.entry(constant.name.clone()).or_default();
        if slot.iter().any(|c| c.api == constant.api) {
            return Err(RegistryError::DuplicateConstant(constant.name));
        }
        slot.push(constant);
        Ok(())
    }

    /// Prefers the entry tagged with `api`, then the untagged one.
    pub fn get(&self, name: &str, api: &str) -> Option<&Constant> {
        let slot = self.entries.get(name)?;
        slot.iter()
            .find(|c| c.api.as_deref() == Some(api))
            .or_else(|| slot.iter().find(|c| c.api.is_none()))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub apis: BTreeMap<String, Api>,
    pub extensions: Vec<Extension>,
    pub constants: ConstantTable,
    pub groups: BTreeMap<String, EnumGroup>,
    pub commands: BTreeMap<String, Command>,
}

impl Registry {
    pub fn from_reader<R: Read>(source: R) -> Result<Self, RegistryError> {
        let root = dom::parse(source)?.ok_or(RegistryError::EmptyDocument)?;
        Self::from_element(&root)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RegistryError> {
        Self::from_reader(bytes)
    }

    fn from_element(root: &Element) -> Result<Self, RegistryError> {
        let mut registry = Registry::default();
        let mut bitmask_groups = BTreeSet::new();

        for child in root.elements() {
            match child.name.as_str() {
                "enums" => registry.load_enums(child, &mut bitmask_groups)?,
                "groups" => registry.load_legacy_groups(child)?,
                "commands" => registry.load_commands(child)?,
                "feature" => registry.load_feature(child)?,
                "extensions" => registry.load_extensions(child)?,
                other => debug!("Skipping registry section <{}>", other),
            }
        }

        for name in bitmask_groups {
            if let Some(group) = registry.groups.get_mut(&name) {
                group.is_bitmask = true;
            }
        }

        Ok(registry)
    }

    pub fn group(&self, name: &str) -> Option<&EnumGroup> {
        self.groups.get(name)
    }

    /// A group is known when the registry lists at least one member for it.
    pub fn is_known_group(&self, name: &str) -> bool {
        self.groups.get(name).map_or(false, |g| !g.members.is_empty())
    }

    fn load_enums(
        &mut self,
        block: &Element,
        bitmask_groups: &mut BTreeSet<String>,
    ) -> Result<(), RegistryError> {
        let block_is_bitmask = block.attr("type") == Some("bitmask");
        if block_is_bitmask {
            bitmask_groups.extend(split_list(block.attr("group"), ','));
        }

        for entry in block.elements_named("enum") {
            let name = require_attr(entry, "name")?.to_string();
            let constant = Constant {
                name: name.clone(),
                value: require_attr(entry, "value")?.to_string(),
                type_suffix: entry.attr("type").unwrap_or("").to_string(),
                api: entry.attr("api").map(str::to_string),
            };
            self.constants.insert(constant)?;

            for group_name in split_list(entry.attr("group"), ',') {
                if block_is_bitmask {
                    bitmask_groups.insert(group_name.clone());
                }
                self.group_entry(&group_name).members.insert(name.clone());
            }
        }
        Ok(())
    }

    fn load_legacy_groups(&mut self, block: &Element) -> Result<(), RegistryError> {
        for group in block.elements_named("group") {
            let group_name = require_attr(group, "name")?.to_string();
            let entry = self.group_entry(&group_name);
            for member in group.elements_named("enum") {
                entry.members.insert(require_attr(member, "name")?.to_string());
            }
        }
        Ok(())
    }

    fn group_entry(&mut self, name: &str) -> &mut EnumGroup {
        self.groups.entry(name.to_string()).or_insert_with(|| EnumGroup {
            name: name.to_string(),
            ..Default::default()
        })
    }

    fn load_commands(&mut self, block: &Element) -> Result<(), RegistryError> {
        for element in block.elements_named("command") {
            let command = Command::from_element(element)?;
            if self.commands.contains_key(command.name()) {
                return Err(RegistryError::DuplicateCommand(command.name().to_string()));
            }
            self.commands.insert(command.name().to_string(), command);
        }
        Ok(())
    }

    fn load_feature(&mut self, feature: &Element) -> Result<(), RegistryError> {
        let api_name = require_attr(feature, "api")?.to_string();
        let name = require_attr(feature, "name")?.to_string();
        let number_text = require_attr(feature, "number")?;
        let number = VersionNumber::parse(number_text).ok_or_else(|| RegistryError::InvalidVersion {
            feature: name.clone(),
            number: number_text.to_string(),
        })?;

        let mut deltas = Vec::new();
        for block in feature.elements() {
            let op = match block.name.as_str() {
                "require" => DeltaOp::Add,
                "remove" => DeltaOp::Remove,
                other => {
                    return Err(RegistryError::UnknownReference {
                        tag: other.to_string(),
                        context: name.clone(),
                    })
                }
            };
            deltas.push(parse_delta(block, op, &name)?);
        }

        self.apis
            .entry(api_name.clone())
            .or_insert_with(|| Api { name: api_name, versions: Vec::new() })
            .versions
            .push(Version { name, number, deltas });
        Ok(())
    }

    fn load_extensions(&mut self, block: &Element) -> Result<(), RegistryError> {
        for extension in block.elements_named("extension") {
            let name = require_attr(extension, "name")?.to_string();
            let supported = split_list(extension.attr("supported"), '|').collect();
            let mut requires = Vec::new();
            for child in extension.elements() {
                if child.name != "require" {
                    return Err(RegistryError::UnknownReference {
                        tag: child.name.clone(),
                        context: name.clone(),
                    });
                }
                requires.push(parse_delta(child, DeltaOp::Add, &name)?);
            }
            self.extensions.push(Extension { name, supported, requires });
        }
        Ok(())
    }
}

fn parse_delta(block: &Element, op: DeltaOp, context: &str) -> Result<Delta, RegistryError> {
    let references = block
        .elements()
        .map(|e| Reference::from_element(e, context))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Delta {
        op,
        profile: block.attr("profile").map(str::to_string),
        api: block.attr("api").map(str::to_string),
        references,
    })
}

fn require_attr<'a>(element: &'a Element, attribute: &str) -> Result<&'a str, RegistryError> {
    element.attr(attribute).ok_or_else(|| RegistryError::MissingAttribute {
        element: element.name.clone(),
        attribute: attribute.to_string(),
    })
}

fn split_list(value: Option<&str>, separator: char) -> impl Iterator<Item = String> + '_ {
    value
        .into_iter()
        .flat_map(move |v| v.split(separator))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
