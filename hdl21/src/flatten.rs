//!
//! # Hierarchical Flattening
//!
//! Produces a single-level module of leaf instances from an elaborated module.
//! Flattened instance and signal names join their hierarchical paths with the
//! hierarchy separator, e.g. instance `buf1:inv2:nmos` and signal `buf1:inv1_out`.
//! Only signals connected to some leaf survive flattening.
//!

// Std-Lib
use std::iter::once;

// Crates.io
use indexmap::IndexMap;
use log::debug;

// Local imports
use crate::config::ElabOptions;
use crate::data::{Connection, Instance, Module, ModuleKey, Of, Signal};
use crate::error::{ElabError, ElabResult};
use crate::export::Elaborated;
use crate::utils::Path;

/// Boolean indication of whether module `key` instantiates only leaf modules
pub fn is_flat(elab: &Elaborated, key: ModuleKey) -> bool {
    elab.module(key).map_or(false, |module| {
        module.targets().iter().all(|(_, of)| match of {
            Of::Module(k) => elab.module(*k).map_or(false, Module::is_leaf),
            Of::Call(_) => false,
        })
    })
}

/// Flatten module `key` of `elab`.
/// Ports are retained unchanged. The result is named with a `_flat` suffix,
/// unless the module is already flat, in which case it is returned as-is.
pub fn flatten(elab: &Elaborated, key: ModuleKey, opts: &ElabOptions) -> ElabResult<Module> {
    let module = elab.module(key).ok_or_else(|| ElabError::InvalidReference {
        path: Path::new(),
        detail: "module is not part of this elaborated design".into(),
    })?;
    if is_flat(elab, key) {
        return Ok(module.clone());
    }
    // At the top level, every port and signal maps to itself
    let top: Nets = module
        .ports
        .values()
        .map(|p| (p.name.clone(), Net::new(&p.name, p.width)))
        .chain(
            module
                .signals
                .values()
                .map(|s| (s.name.clone(), Net::new(&s.name, s.width))),
        )
        .collect();
    let mut flattener = Flattener {
        elab,
        sep: &opts.hierarchy_separator,
        leaves: Vec::new(),
    };
    flattener.walk(module, &[], &top)?;

    let mut rv = Module::new(format!("{}_flat", module.name));
    rv.ports = module.ports.clone();
    for leaf in flattener.leaves.iter() {
        for net in leaf.conns.values() {
            if !rv.ports.contains_key(&net.name) && !rv.signals.contains_key(&net.name) {
                rv.add_signal(Signal::new(&net.name, net.width));
            }
        }
    }
    for leaf in flattener.leaves {
        let mut inst = Instance::new(leaf.path.join(&opts.hierarchy_separator), leaf.of);
        for (port, net) in leaf.conns {
            inst.conns.insert(port, Connection::Signal(net.name));
        }
        rv.instances.push(inst);
    }
    debug!(
        "Flattened `{}` into {} leaf instances",
        module.name,
        rv.instances.len()
    );
    Ok(rv)
}

/// Flattened signal, by name and width
#[derive(Debug, Clone)]
struct Net {
    name: String,
    width: usize,
}
impl Net {
    fn new(name: &str, width: usize) -> Self {
        Self {
            name: name.to_string(),
            width,
        }
    }
}

/// Mapping from a module's local port and signal names to flattened nets
type Nets = IndexMap<String, Net>;

/// Leaf instance, with its hierarchical path and flattened connections
struct Leaf {
    path: Vec<String>,
    of: ModuleKey,
    conns: Nets,
}

struct Flattener<'e> {
    elab: &'e Elaborated,
    sep: &'e str,
    leaves: Vec<Leaf>,
}
impl Flattener<'_> {
    /// Walk the sites of `module`, whose hierarchical path is `parents`,
    /// and whose local names map to flattened nets via `nets`.
    fn walk(&mut self, module: &Module, parents: &[String], nets: &Nets) -> ElabResult<()> {
        let mpath = Path::module(&module.name);
        for site in module.sites() {
            let ipath = mpath.instance(&site.name);
            let mut conns = Nets::new();
            for (port, conn) in site.conns.iter() {
                let local = match conn {
                    Connection::Signal(s) => s,
                    _ => {
                        return Err(ElabError::InvalidReference {
                            path: ipath.port(port),
                            detail: "unresolved connection".into(),
                        })
                    }
                };
                let net = match nets.get(local) {
                    Some(net) => net.clone(),
                    None => {
                        // Internal signal, renamed by its hierarchical path
                        let width = module.width_of(local).ok_or_else(|| {
                            ElabError::InvalidReference {
                                path: ipath.port(port),
                                detail: format!("no such signal `{}`", local),
                            }
                        })?;
                        let name = parents
                            .iter()
                            .map(String::as_str)
                            .chain(once(local.as_str()))
                            .collect::<Vec<_>>()
                            .join(self.sep);
                        Net { name, width }
                    }
                };
                conns.insert(port.clone(), net);
            }
            let mut path = parents.to_vec();
            path.push(site.name.clone());

            let elab = self.elab;
            let key = site.of.module().ok_or_else(|| ElabError::InvalidReference {
                path: ipath.clone(),
                detail: "instance target was never expanded".into(),
            })?;
            let child = elab.module(key).ok_or_else(|| ElabError::InvalidReference {
                path: ipath.clone(),
                detail: "module is not part of this elaborated design".into(),
            })?;
            match child.is_leaf() {
                true => self.leaves.push(Leaf {
                    path,
                    of: key,
                    conns,
                }),
                false => self.walk(child, &path, &conns)?,
            }
        }
        Ok(())
    }
}
