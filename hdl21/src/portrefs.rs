//!
//! # Port-Reference Resolution
//!
//! Replaces each connection to another instance's port, e.g. `inv2.inp = inv1.out`,
//! with a connection to a parent-level signal or bundle.
//! If the referenced port is already connected, its connection is shared.
//! Otherwise an implicit signal named `{inst}_{port}` is created and connected to both.
//!

// Std-Lib
use std::collections::HashSet;

// Crates.io
use log::trace;

// Local imports
use crate::config::ElabOptions;
use crate::data::{BundleInstance, Connection, Design, Module, ModuleKey, Of, Signal};
use crate::error::{ElabError, ElabResult, Violation, ViolationKind};
use crate::utils::Path;

/// Resolve port-references in each module of `order`
pub(crate) fn resolve(design: &mut Design, order: &[ModuleKey], opts: &ElabOptions) -> ElabResult<()> {
    let mut violations = Vec::new();
    for key in order.iter() {
        let resolved = {
            let module = match design.modules.get(*key) {
                Some(m) => m,
                None => continue,
            };
            if !has_port_refs(module) {
                continue;
            }
            let mut resolver = Resolver {
                design,
                sep: &opts.portref_separator,
                violations: &mut violations,
            };
            resolver.resolve(module)
        };
        if let Some(module) = design.modules.get_mut(*key) {
            *module = resolved;
        }
    }
    if !violations.is_empty() {
        return Err(ElabError::Validation { violations });
    }
    Ok(())
}

fn has_port_refs(module: &Module) -> bool {
    module.sites().iter().any(|site| {
        site.conns
            .values()
            .any(|c| matches!(c, Connection::PortRef { .. }))
    })
}

/// Single-module resolver
struct Resolver<'a> {
    design: &'a Design,
    sep: &'a str,
    violations: &'a mut Vec<Violation>,
}
impl Resolver<'_> {
    /// Produce a copy of `module` with its port-references resolved
    fn resolve(&mut self, module: &Module) -> Module {
        let path = Path::module(&module.name);
        let mut rv = module.clone();
        let mut implicit = HashSet::new();

        // Collect (site, port, referenced-instance, referenced-port) quads
        let refs: Vec<(String, String, String, String)> = module
            .sites()
            .iter()
            .flat_map(|site| {
                site.conns.iter().filter_map(move |(port, conn)| match conn {
                    Connection::PortRef { inst, port: other } => Some((
                        site.name.clone(),
                        port.clone(),
                        inst.clone(),
                        other.clone(),
                    )),
                    _ => None,
                })
            })
            .collect();

        for (site, port, inst, other) in refs {
            let conn = match self.target(module, &mut rv, &mut implicit, &inst, &other) {
                Ok(conn) => conn,
                Err(kind) => {
                    self.violations.push(Violation {
                        path: path.instance(&site).port(&port),
                        kind,
                    });
                    continue;
                }
            };
            trace!("Resolved {}.{} = {}.{}", site, port, inst, other);
            if let Some(conns) = rv.site_conns_mut(&site) {
                conns.insert(port, conn);
            }
        }
        rv
    }
    /// Get the parent-level connection for port `port` of instance `inst`,
    /// creating an implicit signal or bundle if it is not yet connected.
    /// References to ports which are themselves connected by reference are rejected,
    /// as authored in `module`, regardless of the order in which they are resolved.
    fn target(
        &self,
        module: &Module,
        rv: &mut Module,
        implicit: &mut HashSet<String>,
        inst: &str,
        port: &str,
    ) -> Result<Connection, ViolationKind> {
        let chained = module
            .sites()
            .iter()
            .any(|s| s.name == inst && matches!(s.conns.get(port), Some(Connection::PortRef { .. })));
        if chained {
            return Err(ViolationKind::UnresolvedConnection);
        }
        let (of, existing) = {
            let sites = rv.sites();
            let site = sites
                .iter()
                .find(|s| s.name == inst)
                .ok_or_else(|| ViolationKind::UnknownInstance { name: inst.into() })?;
            (site.of.clone(), site.conns.get(port).cloned())
        };
        if let Some(conn) = existing {
            return Ok(conn);
        }
        let child = match of {
            Of::Module(k) => self.design.modules.get(k).ok_or(ViolationKind::Unexpanded)?,
            Of::Call(_) => return Err(ViolationKind::Unexpanded),
        };
        let name = format!("{}{}{}", inst, self.sep, port);
        if !implicit.contains(&name) && rv.has_name(&name) {
            return Err(ViolationKind::DuplicateName { name });
        }
        let conn = if let Some(p) = child.ports.get(port) {
            rv.add_signal(Signal::new(&name, p.width));
            Connection::Signal(name.clone())
        } else if let Some(bp) = child.bundle_ports.get(port) {
            rv.bundles.insert(
                name.clone(),
                BundleInstance {
                    name: name.clone(),
                    of: bp.of,
                    flipped: bp.flipped,
                },
            );
            Connection::Bundle(name.clone())
        } else {
            return Err(ViolationKind::UnknownPort);
        };
        implicit.insert(name);
        if let Some(conns) = rv.site_conns_mut(inst) {
            conns.insert(port.to_string(), conn.clone());
        }
        Ok(conn)
    }
}
