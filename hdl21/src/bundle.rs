//!
//! # Bundle Flattening
//!
//! Replaces every bundle-valued port, internal bundle, and bundle connection
//! with its scalar constituents. Nested roles are joined with the bundle separator,
//! so that role `reset` of nested bundle `clk_rst` of bundle-port `spi`
//! becomes scalar port `spi_clk_rst_reset`.
//!
//! Each bundle connection is checked for structural compatibility first.
//! Violations are collected across the whole design and reported together.
//!

// Std-Lib
use std::collections::HashMap;

// Crates.io
use log::debug;
use slotmap::SlotMap;

// Local imports
use crate::config::ElabOptions;
use crate::data::{
    Bundle, BundleInstance, BundleKey, Connection, Conns, Design, Instance, InstanceArray, Module,
    ModuleKey, Of, Port, PortDir, Role, Signal,
};
use crate::error::{BundleViolation, BundleViolationKind, ElabError, ElabResult, MismatchKind};
use crate::utils::Path;

/// # Leaf Role
///
/// Scalar signal role of a (potentially nested) bundle,
/// with the direction it takes in a given orientation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafRole {
    /// Role names, outermost first
    pub path: Vec<String>,
    pub width: usize,
    pub dir: PortDir,
}

/// Get the leaf roles of bundle `key`, in orientation `flipped`.
/// Leaves are in depth-first declaration order.
pub fn leaves(
    bundles: &SlotMap<BundleKey, Bundle>,
    key: BundleKey,
    flipped: bool,
) -> Result<Vec<LeafRole>, MismatchKind> {
    let mut rv = Vec::new();
    collect(bundles, key, flipped, &mut Vec::new(), &mut Vec::new(), &mut rv)?;
    Ok(rv)
}
fn collect(
    bundles: &SlotMap<BundleKey, Bundle>,
    key: BundleKey,
    flipped: bool,
    prefix: &mut Vec<String>,
    stack: &mut Vec<BundleKey>,
    rv: &mut Vec<LeafRole>,
) -> Result<(), MismatchKind> {
    if stack.contains(&key) {
        return Err(MismatchKind::RecursiveDefinition);
    }
    let def = bundles.get(key).ok_or(MismatchKind::UndefinedBundle)?;
    stack.push(key);
    for (name, role) in def.roles.iter() {
        prefix.push(name.clone());
        match role {
            Role::Signal { width, dir } => rv.push(LeafRole {
                path: prefix.clone(),
                width: *width,
                dir: dir.flipped_if(flipped),
            }),
            Role::Bundle { of, flipped: f } => {
                collect(bundles, *of, flipped ^ *f, prefix, stack, rv)?
            }
        }
        prefix.pop();
    }
    stack.pop();
    Ok(())
}

/// Key for memoized contract checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ContractKey {
    child: BundleKey,
    child_flipped: bool,
    parent: BundleKey,
    parent_flipped: bool,
    passthrough: bool,
}

/// Relation between the directions of a child bundle port and an internal parent bundle.
/// Fixed by the first pair of strictly-directed leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    Identical,
    Mirrored,
}

/// Violations relative to a connection, as (role-path, kind) pairs
type Findings = Vec<(Vec<String>, BundleViolationKind)>;

/// # Bundle Shape Cache
///
/// Memoizes leaf-shapes per (definition, orientation)
/// and contract findings per [ContractKey].
struct Shapes<'d> {
    bundles: &'d SlotMap<BundleKey, Bundle>,
    shapes: HashMap<(BundleKey, bool), Result<Vec<LeafRole>, MismatchKind>>,
    contracts: HashMap<ContractKey, Findings>,
}
impl<'d> Shapes<'d> {
    fn new(bundles: &'d SlotMap<BundleKey, Bundle>) -> Self {
        Self {
            bundles,
            shapes: HashMap::new(),
            contracts: HashMap::new(),
        }
    }
    fn shape(&mut self, key: BundleKey, flipped: bool) -> Result<Vec<LeafRole>, MismatchKind> {
        let bundles = self.bundles;
        self.shapes
            .entry((key, flipped))
            .or_insert_with(|| leaves(bundles, key, flipped))
            .clone()
    }
    fn contract(&mut self, key: ContractKey) -> Findings {
        if let Some(findings) = self.contracts.get(&key) {
            return findings.clone();
        }
        let mut checker = ContractCheck {
            bundles: self.bundles,
            passthrough: key.passthrough,
            relation: None,
            prefix: Vec::new(),
            stack: Vec::new(),
            findings: Vec::new(),
        };
        checker.compare(key.child, key.child_flipped, key.parent, key.parent_flipped);
        self.contracts.insert(key, checker.findings.clone());
        checker.findings
    }
}

/// Recursive role-by-role comparison of a child bundle port and its connected parent bundle
struct ContractCheck<'d> {
    bundles: &'d SlotMap<BundleKey, Bundle>,
    passthrough: bool,
    relation: Option<Relation>,
    prefix: Vec<String>,
    stack: Vec<(BundleKey, BundleKey)>,
    findings: Findings,
}
impl ContractCheck<'_> {
    fn push(&mut self, kind: BundleViolationKind) {
        self.findings.push((self.prefix.clone(), kind));
    }
    fn compare(&mut self, child: BundleKey, cflip: bool, parent: BundleKey, pflip: bool) {
        if self.stack.contains(&(child, parent)) {
            return self.push(BundleViolationKind::BundleMismatch(
                MismatchKind::RecursiveDefinition,
            ));
        }
        let bundles = self.bundles;
        let (cdef, pdef) = match (bundles.get(child), bundles.get(parent)) {
            (Some(c), Some(p)) => (c, p),
            _ => {
                return self.push(BundleViolationKind::BundleMismatch(
                    MismatchKind::UndefinedBundle,
                ))
            }
        };
        self.stack.push((child, parent));
        for (name, crole) in cdef.roles.iter() {
            self.prefix.push(name.clone());
            match (crole, pdef.roles.get(name)) {
                (_, None) => self.push(BundleViolationKind::BundleMismatch(
                    MismatchKind::MissingRole,
                )),
                (
                    Role::Signal { width: cw, dir: cd },
                    Some(Role::Signal { width: pw, dir: pd }),
                ) => {
                    if cw != pw {
                        self.push(BundleViolationKind::WidthMismatch {
                            child: *cw,
                            parent: *pw,
                        });
                    }
                    self.directions(cd.flipped_if(cflip), pd.flipped_if(pflip));
                }
                (
                    Role::Bundle { of: co, flipped: cf },
                    Some(Role::Bundle { of: po, flipped: pf }),
                ) => self.compare(*co, cflip ^ *cf, *po, pflip ^ *pf),
                _ => self.push(BundleViolationKind::BundleMismatch(
                    MismatchKind::KindMismatch,
                )),
            }
            self.prefix.pop();
        }
        for name in pdef.roles.keys() {
            if !cdef.roles.contains_key(name) {
                self.prefix.push(name.clone());
                self.push(BundleViolationKind::BundleMismatch(MismatchKind::ExtraRole));
                self.prefix.pop();
            }
        }
        self.stack.pop();
    }
    /// Check the effective directions of a leaf pair
    fn directions(&mut self, child: PortDir, parent: PortDir) {
        let expected = match self.passthrough {
            // Pass-through to a parent bundle port: same directions
            true => parent,
            // Internal parent bundle: consistently identical or mirrored
            false => {
                if self.relation.is_none() && child.is_directed() && parent.is_directed() {
                    self.relation = Some(match child == parent {
                        true => Relation::Identical,
                        false => Relation::Mirrored,
                    });
                }
                parent.flipped_if(self.relation == Some(Relation::Mirrored))
            }
        };
        if child.opposes(expected) {
            self.push(BundleViolationKind::DirectionConflict { child, parent });
        }
    }
}

/// # Bundle Flattener
pub(crate) struct BundleFlattener<'d> {
    design: &'d Design,
    opts: &'d ElabOptions,
    shapes: Shapes<'d>,
    violations: Vec<BundleViolation>,
}
impl<'d> BundleFlattener<'d> {
    /// Produce a copy of `design` in which each module in `order` is bundle-free
    pub(crate) fn flatten(
        design: &'d Design,
        order: &[ModuleKey],
        opts: &'d ElabOptions,
    ) -> ElabResult<Design> {
        let mut this = Self {
            design,
            opts,
            shapes: Shapes::new(&design.bundles),
            violations: Vec::new(),
        };
        let mut rv = design.clone();
        for key in order.iter() {
            let module = design
                .modules
                .get(*key)
                .ok_or_else(|| ElabError::InvalidReference {
                    path: Path::new(),
                    detail: "module is not defined in this design".into(),
                })?;
            let flat = this.flatten_module(module);
            if let Some(slot) = rv.modules.get_mut(*key) {
                *slot = flat;
            }
        }
        if !this.violations.is_empty() {
            return Err(ElabError::Bundle {
                violations: this.violations,
            });
        }
        debug!("Flattened bundles of {} modules", order.len());
        Ok(rv)
    }
    fn push(&mut self, path: Path, kind: BundleViolationKind) {
        self.violations.push(BundleViolation { path, kind });
    }
    /// Join `base` with nested role-names `roles`
    fn join(&self, base: &str, roles: &[String]) -> String {
        let mut rv = base.to_string();
        for role in roles.iter() {
            rv.push_str(&self.opts.bundle_separator);
            rv.push_str(role);
        }
        rv
    }
    fn flatten_module(&mut self, module: &Module) -> Module {
        let path = Path::module(&module.name);
        let mut flat = Module {
            name: module.name.clone(),
            ports: module.ports.clone(),
            signals: module.signals.clone(),
            params: module.params.clone(),
            ..Default::default()
        };
        for bp in module.bundle_ports.values() {
            let ppath = path.port(&bp.name);
            for leaf in self.leaves_of(bp, &ppath) {
                let name = self.join(&bp.name, &leaf.path);
                if taken(module, &flat, &name) {
                    self.push(
                        ppath.clone(),
                        BundleViolationKind::BundleMismatch(MismatchKind::NameCollision { name }),
                    );
                    continue;
                }
                flat.add_port(Port::new(name, leaf.width, leaf.dir));
            }
        }
        for b in module.bundles.values() {
            let bpath = path.bundle(&b.name);
            for leaf in self.leaves_of(b, &bpath) {
                let name = self.join(&b.name, &leaf.path);
                if taken(module, &flat, &name) {
                    self.push(
                        bpath.clone(),
                        BundleViolationKind::BundleMismatch(MismatchKind::NameCollision { name }),
                    );
                    continue;
                }
                flat.add_signal(Signal::new(name, leaf.width));
            }
        }
        for inst in module.instances.iter() {
            let conns = self.flatten_conns(module, &path.instance(&inst.name), &inst.of, &inst.conns);
            flat.instances.push(Instance {
                name: inst.name.clone(),
                of: inst.of.clone(),
                conns,
            });
        }
        for arr in module.arrays.iter() {
            let mut elements = Vec::with_capacity(arr.len());
            for (idx, conns) in arr.elements.iter().enumerate() {
                let ipath = path.instance(arr.element_name(idx));
                elements.push(self.flatten_conns(module, &ipath, &arr.of, conns));
            }
            flat.arrays.push(InstanceArray {
                name: arr.name.clone(),
                of: arr.of.clone(),
                elements,
            });
        }
        flat
    }
    fn leaves_of(&mut self, b: &BundleInstance, path: &Path) -> Vec<LeafRole> {
        match self.shapes.shape(b.of, b.flipped) {
            Ok(leaves) => leaves,
            Err(kind) => {
                self.push(path.clone(), BundleViolationKind::BundleMismatch(kind));
                Vec::new()
            }
        }
    }
    /// Flatten the connections of a single instance (or array element) of `parent`
    fn flatten_conns(&mut self, parent: &Module, path: &Path, of: &Of, conns: &Conns) -> Conns {
        let design = self.design;
        let child = match of {
            Of::Module(k) => match design.modules.get(*k) {
                Some(m) => m,
                None => return conns.clone(),
            },
            Of::Call(_) => return conns.clone(),
        };
        let mut rv = Conns::new();
        for (port, conn) in conns.iter() {
            let ppath = path.port(port);
            match (child.bundle_ports.get(port), conn) {
                (Some(bp), Connection::Bundle(name)) => {
                    let (target, passthrough) = match parent.bundle_ports.get(name) {
                        Some(b) => (b, true),
                        None => match parent.bundles.get(name) {
                            Some(b) => (b, false),
                            None => {
                                self.push(
                                    ppath,
                                    BundleViolationKind::BundleMismatch(
                                        MismatchKind::UnknownBundle { name: name.clone() },
                                    ),
                                );
                                continue;
                            }
                        },
                    };
                    let findings = self.shapes.contract(ContractKey {
                        child: bp.of,
                        child_flipped: bp.flipped,
                        parent: target.of,
                        parent_flipped: target.flipped,
                        passthrough,
                    });
                    if !findings.is_empty() {
                        for (roles, kind) in findings {
                            self.push(ppath.roles(&roles), kind);
                        }
                        continue;
                    }
                    for leaf in self.leaves_of(bp, &ppath) {
                        rv.insert(
                            self.join(port, &leaf.path),
                            Connection::Signal(self.join(name, &leaf.path)),
                        );
                    }
                }
                (Some(_), _) => {
                    self.push(ppath, BundleViolationKind::BundleMismatch(MismatchKind::NotABundle))
                }
                (None, Connection::Bundle(_)) if child.ports.contains_key(port) => {
                    self.push(ppath, BundleViolationKind::BundleMismatch(MismatchKind::ScalarPort))
                }
                _ => {
                    rv.insert(port.clone(), conn.clone());
                }
            }
        }
        rv
    }
}

/// Boolean indication of whether `name` is already in use,
/// either in the original `module` or among the flattened names so far
fn taken(module: &Module, flat: &Module, name: &str) -> bool {
    module.has_name(name) || flat.ports.contains_key(name) || flat.signals.contains_key(name)
}
