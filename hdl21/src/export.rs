//!
//! # Elaborated Designs and Exporters
//!
//! [Elaborated] is the sole output of elaboration, and the sole input to exporters.
//! Its constructor is private to this crate: holding one guarantees the design within
//! is generator-free, bundle-free, port-reference-free, and fully validated.
//!

// Std-Lib
use std::collections::{HashMap, HashSet};

// Crates.io
use indexmap::IndexMap;
use schemars::{schema::RootSchema, schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

// Local imports
use crate::data::{Connection, Design, Module, ModuleKey, Of, Signal};
use crate::error::{ElabError, ElabResult};
use crate::utils::SerdeFile;

/// # Elaborated Design
#[derive(Debug, Clone, PartialEq)]
pub struct Elaborated {
    design: Design,
    root: ModuleKey,
    order: Vec<ModuleKey>,
}
impl Elaborated {
    pub(crate) fn new(design: Design, root: ModuleKey, order: Vec<ModuleKey>) -> Self {
        Self {
            design,
            root,
            order,
        }
    }
    /// Key of the root module
    pub fn root(&self) -> ModuleKey {
        self.root
    }
    /// The root module
    pub fn top(&self) -> &Module {
        // Elaboration guarantees the root is in the design
        &self.design.modules[self.root]
    }
    pub fn module(&self, key: ModuleKey) -> Option<&Module> {
        self.design.modules.get(key)
    }
    /// Module keys in dependency order, children before parents, ending with the root
    pub fn order(&self) -> &[ModuleKey] {
        &self.order
    }
    /// Iterate over modules in dependency order
    pub fn modules(&self) -> impl Iterator<Item = (ModuleKey, &Module)> + '_ {
        self.order
            .iter()
            .filter_map(move |k| self.design.modules.get(*k).map(|m| (*k, m)))
    }
    /// Underlying design, including only modules reachable from the root
    pub fn design(&self) -> &Design {
        &self.design
    }
    pub fn into_design(self) -> Design {
        self.design
    }
    /// Export with `exporter`
    pub fn export<E: Exporter>(&self, exporter: &mut E) -> Result<E::Output, E::Error> {
        exporter.export(self)
    }
}

/// # Exporter Trait
///
/// Consumer of [Elaborated] designs, e.g. netlisters and serializers.
pub trait Exporter {
    type Output;
    type Error;
    fn export(&mut self, elab: &Elaborated) -> Result<Self::Output, Self::Error>;
}

/// # Design Snapshot
///
/// Serializable, name-based rendition of an [Elaborated] design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Snapshot {
    /// Name of the root module
    pub top: String,
    /// Modules, in dependency order
    pub modules: Vec<ModuleSnapshot>,
}
impl SerdeFile for Snapshot {}
impl Snapshot {
    /// Get the JSON-Schema of the snapshot format
    pub fn schema() -> RootSchema {
        schema_for!(Snapshot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ModuleSnapshot {
    pub name: String,
    /// Parameter values of primitive devices
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub params: IndexMap<String, String>,
    pub ports: Vec<PortSnapshot>,
    pub signals: Vec<Signal>,
    pub instances: Vec<InstanceSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PortSnapshot {
    pub name: String,
    pub width: usize,
    /// Direction, as one of `input`, `output`, `inout`, or `none`
    pub dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InstanceSnapshot {
    pub name: String,
    /// Target module name
    pub module: String,
    /// Connections, from child-port to parent-signal name
    pub conns: IndexMap<String, String>,
}

/// # Snapshot Exporter
///
/// Converts an [Elaborated] design to a [Snapshot].
/// Module names must be unique, as they become the references between modules.
#[derive(Debug, Default)]
pub struct SnapshotExporter;

impl Exporter for SnapshotExporter {
    type Output = Snapshot;
    type Error = ElabError;

    fn export(&mut self, elab: &Elaborated) -> ElabResult<Snapshot> {
        let mut names: HashMap<ModuleKey, &str> = HashMap::new();
        let mut used = HashSet::new();
        for (key, module) in elab.modules() {
            if !used.insert(module.name.as_str()) {
                return Err(ElabError::Export(format!(
                    "duplicate module name `{}`",
                    module.name
                )));
            }
            names.insert(key, &module.name);
        }
        let mut modules = Vec::with_capacity(names.len());
        for (_, module) in elab.modules() {
            modules.push(self.export_module(module, &names)?);
        }
        Ok(Snapshot {
            top: elab.top().name.clone(),
            modules,
        })
    }
}
impl SnapshotExporter {
    fn export_module(
        &self,
        module: &Module,
        names: &HashMap<ModuleKey, &str>,
    ) -> ElabResult<ModuleSnapshot> {
        let ports = module
            .ports
            .values()
            .map(|p| PortSnapshot {
                name: p.name.clone(),
                width: p.width,
                dir: p.dir.to_string(),
            })
            .collect();
        let mut instances = Vec::new();
        for site in module.sites() {
            let target = match site.of {
                Of::Module(k) => names.get(k).copied(),
                Of::Call(_) => None,
            };
            let target = target.ok_or_else(|| {
                ElabError::Export(format!(
                    "instance `{}` of `{}` has no elaborated target",
                    site.name, module.name
                ))
            })?;
            let mut conns = IndexMap::new();
            for (port, conn) in site.conns.iter() {
                match conn {
                    Connection::Signal(sig) => {
                        conns.insert(port.clone(), sig.clone());
                    }
                    _ => {
                        return Err(ElabError::Export(format!(
                            "unresolved connection to `{}.{}`",
                            site.name, port
                        )))
                    }
                }
            }
            instances.push(InstanceSnapshot {
                name: site.name,
                module: target.to_string(),
                conns,
            });
        }
        Ok(ModuleSnapshot {
            name: module.name.clone(),
            params: module.params.clone(),
            ports,
            signals: module.signals.values().cloned().collect(),
            instances,
        })
    }
}
