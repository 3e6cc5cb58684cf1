//!
//! # Connectivity Validation
//!
//! Final checks over a generator-free, bundle-free design.
//! All violations across all modules are collected, and reported together.
//!

// Std-Lib
use std::collections::HashSet;

// Crates.io
use indexmap::{IndexMap, IndexSet};
use log::debug;

// Local imports
use crate::config::ElabOptions;
use crate::data::{Connection, Design, Module, ModuleKey, Of, PortDir, Site};
use crate::error::{ElabError, ElabResult, Violation, ViolationKind};
use crate::utils::{ErrorContext, Path};

/// Validate each module of `order`
pub(crate) fn validate(design: &Design, order: &[ModuleKey], opts: &ElabOptions) -> ElabResult<()> {
    let mut validator = Validator {
        design,
        opts,
        violations: Vec::new(),
    };
    for key in order.iter() {
        if let Some(module) = design.modules.get(*key) {
            validator.validate_module(module);
        }
    }
    if !validator.violations.is_empty() {
        return Err(ElabError::Validation {
            violations: validator.violations,
        });
    }
    debug!("Validated {} modules", order.len());
    Ok(())
}

/// Check the authored namespace of each module of `order`, before bundles are flattened away.
/// Every port, signal, bundle-port, bundle, instance, and array name must be unique.
pub(crate) fn check_names(design: &Design, order: &[ModuleKey]) -> ElabResult<()> {
    let mut violations = Vec::new();
    for module in order.iter().filter_map(|k| design.modules.get(*k)) {
        let path = Path::module(&module.name);
        let names = module
            .ports
            .keys()
            .map(|n| ErrorContext::Port(n.clone()))
            .chain(module.signals.keys().map(|n| ErrorContext::Signal(n.clone())))
            .chain(module.bundle_ports.keys().map(|n| ErrorContext::Port(n.clone())))
            .chain(module.bundles.keys().map(|n| ErrorContext::Bundle(n.clone())))
            .chain(module.instances.iter().map(|i| ErrorContext::Instance(i.name.clone())))
            .chain(module.arrays.iter().map(|a| ErrorContext::Instance(a.name.clone())));
        let mut seen = HashSet::new();
        let dupes = names
            .filter(|ctx| !seen.insert(ctx.name().to_string()))
            .chain(module.redeclared.iter().cloned());
        for ctx in dupes {
            let name = ctx.name().to_string();
            violations.push(Violation {
                path: path.with(ctx),
                kind: ViolationKind::DuplicateName { name },
            });
        }
    }
    if !violations.is_empty() {
        return Err(ElabError::Validation { violations });
    }
    Ok(())
}

/// Per-module tally of signal drivers and readers
#[derive(Debug, Default)]
struct Tally {
    /// Strong drivers, with their locations
    drivers: IndexMap<String, Vec<Path>>,
    /// Weakly driven (inout or undirected) signals
    weak: HashSet<String>,
    /// Signals read by instance inputs
    readers: IndexSet<String>,
    /// Widths of unconnected instance outputs
    dangling: HashSet<usize>,
}

struct Validator<'d> {
    design: &'d Design,
    opts: &'d ElabOptions,
    violations: Vec<Violation>,
}
impl Validator<'_> {
    fn push(&mut self, path: Path, kind: ViolationKind) {
        self.violations.push(Violation { path, kind });
    }
    fn validate_module(&mut self, module: &Module) {
        let path = Path::module(&module.name);
        self.check_widths(module, &path);

        let mut tally = Tally::default();
        for port in module.ports.values() {
            match port.dir {
                PortDir::Input => tally
                    .drivers
                    .entry(port.name.clone())
                    .or_default()
                    .push(path.port(&port.name)),
                PortDir::Inout | PortDir::NoDir => {
                    tally.weak.insert(port.name.clone());
                }
                PortDir::Output => (),
            }
        }
        for site in module.sites() {
            self.check_site(module, &path, &site, &mut tally);
        }
        for (name, drivers) in tally.drivers.iter() {
            if drivers.len() > 1 {
                self.push(
                    context(module, &path, name),
                    ViolationKind::MultipleDrivers {
                        drivers: drivers.clone(),
                    },
                );
            }
        }
        // Leaf modules have no internal drivers to check
        if !self.opts.require_drivers || module.is_leaf() {
            return;
        }
        let required: IndexSet<&String> = module
            .ports
            .values()
            .filter(|p| p.dir == PortDir::Output)
            .map(|p| &p.name)
            .chain(tally.readers.iter())
            .collect();
        for name in required {
            if tally.drivers.contains_key(name) || tally.weak.contains(name) {
                continue;
            }
            // Signals which an unconnected instance output could have driven
            // are covered by its `UnconnectedPort` violation
            let width = module.width_of(name).unwrap_or_default();
            if !tally.dangling.contains(&width) {
                self.push(context(module, &path, name), ViolationKind::Undriven);
            }
        }
    }
    /// Check for zero-width ports and signals
    fn check_widths(&mut self, module: &Module, path: &Path) {
        for port in module.ports.values().filter(|p| p.width == 0) {
            self.push(path.port(&port.name), ViolationKind::ZeroWidth);
        }
        for signal in module.signals.values().filter(|s| s.width == 0) {
            self.push(path.signal(&signal.name), ViolationKind::ZeroWidth);
        }
    }
    /// Check the connections of a single instance site
    fn check_site(&mut self, module: &Module, path: &Path, site: &Site, tally: &mut Tally) {
        let ipath = path.instance(&site.name);
        let design = self.design;
        let target = match site.of {
            Of::Module(k) => match design.modules.get(*k) {
                Some(m) => m,
                None => return self.push(ipath, ViolationKind::Unexpanded),
            },
            Of::Call(_) => return self.push(ipath, ViolationKind::Unexpanded),
        };
        for port in target.ports.values() {
            if !site.conns.contains_key(&port.name) {
                if port.dir == PortDir::Output {
                    tally.dangling.insert(port.width);
                }
                self.push(ipath.port(&port.name), ViolationKind::UnconnectedPort);
            }
        }
        for (pname, conn) in site.conns.iter() {
            let ppath = ipath.port(pname);
            let port = match target.ports.get(pname) {
                Some(p) => p,
                None => {
                    self.push(ppath, ViolationKind::UnknownPort);
                    continue;
                }
            };
            let sig = match conn {
                Connection::Signal(s) => s,
                _ => {
                    self.push(ppath, ViolationKind::UnresolvedConnection);
                    continue;
                }
            };
            let width = match module.width_of(sig) {
                Some(w) => w,
                None => {
                    self.push(ppath, ViolationKind::UnknownSignal { name: sig.clone() });
                    continue;
                }
            };
            if width != port.width {
                self.push(
                    ppath.clone(),
                    ViolationKind::ArityMismatch {
                        port_width: port.width,
                        signal_width: width,
                    },
                );
            }
            match port.dir {
                PortDir::Output => tally.drivers.entry(sig.clone()).or_default().push(ppath),
                PortDir::Input => {
                    tally.readers.insert(sig.clone());
                }
                PortDir::Inout | PortDir::NoDir => {
                    tally.weak.insert(sig.clone());
                }
            }
        }
    }
}

/// Get the path of port or signal `name`
fn context(module: &Module, path: &Path, name: &str) -> Path {
    match module.ports.contains_key(name) {
        true => path.port(name),
        false => path.signal(name),
    }
}
