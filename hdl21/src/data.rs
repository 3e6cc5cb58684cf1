//!
//! # Circuit Data Model
//!
//! Defines the primary structures for representation of hierarchical circuits,
//! including [Design], [Module], [Instance], [Signal], [Port], and [Bundle].
//!
//! Modules and bundle definitions are stored in [SlotMap] arenas owned by a [Design],
//! and referred to by their keys. Instances hold keys to their target modules,
//! which many instances commonly share.
//!

// Std-Lib
use std::ops::Index;

// Crates.io
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

// Local Imports
use crate::generator::GeneratorCall;
use crate::utils::{enumstr, ErrorContext};

// Create key-types for each internal type stored in [SlotMap]s
new_key_type! {
    /// Keys for [Module] entries
    pub struct ModuleKey;
    /// Keys for [Bundle] definition entries
    pub struct BundleKey;
}

enumstr!(
    /// # Port Direction
    ///
    /// Includes the "undirected" `NoDir` for analog nodes.
    PortDir {
        Input: "input",
        Output: "output",
        Inout: "inout",
        NoDir: "none",
    }
);
impl PortDir {
    /// Get the mirror-image direction. Inputs become outputs and vice versa.
    pub fn flip(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
            other => other,
        }
    }
    /// Flip if `flipped` is true
    pub fn flipped_if(self, flipped: bool) -> Self {
        match flipped {
            true => self.flip(),
            false => self,
        }
    }
    /// Boolean indication of a strict input/output direction
    pub fn is_directed(self) -> bool {
        matches!(self, Self::Input | Self::Output)
    }
    /// Boolean indication of whether `self` and `other` are opposing strict directions
    pub fn opposes(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::Input, Self::Output) | (Self::Output, Self::Input)
        )
    }
}
impl Default for PortDir {
    fn default() -> Self {
        Self::NoDir
    }
}

/// # Signal
///
/// A scalar electrical node of `width` bits, owned by a single [Module].
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Signal {
    /// Signal Name, unique within its module
    pub name: String,
    /// Bit-width
    pub width: usize,
    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}
impl Signal {
    /// Create a new [Signal]
    pub fn new(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            width,
            desc: None,
        }
    }
}

/// # Port
///
/// A [Signal] exposed at its module's boundary, with a direction.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    /// Port Name
    pub name: String,
    /// Bit-width
    pub width: usize,
    /// Direction
    pub dir: PortDir,
}
impl Port {
    /// Create a new [Port]
    pub fn new(name: impl Into<String>, width: usize, dir: PortDir) -> Self {
        Self {
            name: name.into(),
            width,
            dir,
        }
    }
    /// Get the [Signal] underlying this port
    pub fn signal(&self) -> Signal {
        Signal::new(&self.name, self.width)
    }
}

/// # Bundle Role
///
/// Either a scalar signal or a nested bundle.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Scalar Signal, with width and direction
    Signal { width: usize, dir: PortDir },
    /// Nested Bundle, optionally mirrored
    Bundle { of: BundleKey, flipped: bool },
}

/// # Bundle Definition
///
/// Named, ordered set of roles connected together as a unit, e.g. a multi-wire interface.
/// Bundles are matched *structurally*: any two definitions with the same role-shape are interchangeable.
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    /// Bundle Name
    pub name: String,
    /// Roles, in declaration order
    pub roles: IndexMap<String, Role>,
}
impl Bundle {
    /// Create a new and initially empty [Bundle]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: IndexMap::new(),
        }
    }
    /// Add a scalar-signal role
    pub fn signal(mut self, name: impl Into<String>, width: usize, dir: PortDir) -> Self {
        self.roles.insert(name.into(), Role::Signal { width, dir });
        self
    }
    /// Add a nested-bundle role
    pub fn bundle(mut self, name: impl Into<String>, of: BundleKey, flipped: bool) -> Self {
        self.roles.insert(name.into(), Role::Bundle { of, flipped });
        self
    }
}

/// # Bundle Instance
///
/// Use of a [Bundle] definition inside a [Module],
/// either as a bundle-typed port or as an internal bundle.
/// The `flipped` orientation mirrors the directions of all its roles.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInstance {
    /// Instance Name
    pub name: String,
    /// Bundle Definition
    pub of: BundleKey,
    /// Mirrored orientation
    pub flipped: bool,
}

/// # Connection
///
/// The parent-side object connected to an instance's port.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    /// Parent Signal or Port
    Signal(String),
    /// Parent Bundle or Bundle-Port
    Bundle(String),
    /// Port of another instance in the same parent
    PortRef { inst: String, port: String },
}
impl Connection {
    pub fn signal(name: impl Into<String>) -> Self {
        Self::Signal(name.into())
    }
    pub fn bundle(name: impl Into<String>) -> Self {
        Self::Bundle(name.into())
    }
    pub fn port_ref(inst: impl Into<String>, port: impl Into<String>) -> Self {
        Self::PortRef {
            inst: inst.into(),
            port: port.into(),
        }
    }
}
impl From<&str> for Connection {
    fn from(s: &str) -> Self {
        Self::Signal(s.to_string())
    }
}
impl From<String> for Connection {
    fn from(s: String) -> Self {
        Self::Signal(s)
    }
}

/// Connections of an instance, keyed by child-port name
pub type Conns = IndexMap<String, Connection>;

/// # Instance Target
///
/// Either a concrete [Module], or a not-yet-expanded [GeneratorCall].
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Of {
    Module(ModuleKey),
    Call(GeneratorCall),
}
impl Of {
    /// Get the module-key, if expanded
    pub fn module(&self) -> Option<ModuleKey> {
        match self {
            Self::Module(k) => Some(*k),
            Self::Call(_) => None,
        }
    }
}
impl From<ModuleKey> for Of {
    fn from(k: ModuleKey) -> Self {
        Self::Module(k)
    }
}
impl From<GeneratorCall> for Of {
    fn from(c: GeneratorCall) -> Self {
        Self::Call(c)
    }
}

/// Instance of another Module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Instance Name
    pub name: String,
    /// Target Module or Generator Call
    pub of: Of,
    /// Port Connections
    pub conns: Conns,
}
impl Instance {
    /// Create a new and initially unconnected [Instance]
    pub fn new(name: impl Into<String>, of: impl Into<Of>) -> Self {
        Self {
            name: name.into(),
            of: of.into(),
            conns: Conns::new(),
        }
    }
    /// Connect child-port `port` to `conn`.
    /// Consumes and returns `self` to enable chaining.
    pub fn connect(mut self, port: impl Into<String>, conn: impl Into<Connection>) -> Self {
        self.conns.insert(port.into(), conn.into());
        self
    }
}

/// # Instance Array
///
/// Ordered set of instances of a single target, each with its own connections.
/// Element `i` is named `name[i]`.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceArray {
    /// Array Name
    pub name: String,
    /// Target Module or Generator Call, shared by all elements
    pub of: Of,
    /// Per-Element Connections
    pub elements: Vec<Conns>,
}
impl InstanceArray {
    /// Create a new array of `len` unconnected elements
    pub fn new(name: impl Into<String>, of: impl Into<Of>, len: usize) -> Self {
        Self {
            name: name.into(),
            of: of.into(),
            elements: vec![Conns::new(); len],
        }
    }
    /// Connect port `port` of element `idx` to `conn`.
    /// Grows the array if `idx` is beyond its current length.
    pub fn connect(
        mut self,
        idx: usize,
        port: impl Into<String>,
        conn: impl Into<Connection>,
    ) -> Self {
        if idx >= self.elements.len() {
            self.elements.resize(idx + 1, Conns::new());
        }
        self.elements[idx].insert(port.into(), conn.into());
        self
    }
    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
    /// Name of element `idx`
    pub fn element_name(&self, idx: usize) -> String {
        format!("{}[{}]", self.name, idx)
    }
    /// Get element `idx` as a [Site]
    pub fn element(&self, idx: usize) -> Option<Site<'_>> {
        let conns = self.elements.get(idx)?;
        Some(Site {
            name: self.element_name(idx),
            of: &self.of,
            conns,
        })
    }
}
impl Index<usize> for InstanceArray {
    type Output = Conns;
    fn index(&self, idx: usize) -> &Conns {
        &self.elements[idx]
    }
}

/// # Instance Site
///
/// Shared view of either an [Instance] or a single [InstanceArray] element.
#[derive(Debug, Clone)]
pub struct Site<'m> {
    pub name: String,
    pub of: &'m Of,
    pub conns: &'m Conns,
}

/// # Module
///
/// The primary unit of hardware re-use.
/// A named collection of ports, signals, bundles, and instances of other modules.
///
/// All names (ports, signals, bundle-ports, bundles, instances, and arrays)
/// share a single namespace, in which each must be unique.
/// The builder methods never replace an existing entry: a port, signal, or bundle
/// declared under a name already in use is recorded in `redeclared`,
/// and reported as a duplicate when elaborated.
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    /// Module Name
    pub name: String,
    /// Scalar Ports
    pub ports: IndexMap<String, Port>,
    /// Internal Signals
    pub signals: IndexMap<String, Signal>,
    /// Bundle-Typed Ports
    pub bundle_ports: IndexMap<String, BundleInstance>,
    /// Internal Bundles
    pub bundles: IndexMap<String, BundleInstance>,
    /// Instances
    pub instances: Vec<Instance>,
    /// Instance Arrays
    pub arrays: Vec<InstanceArray>,
    /// Parameter values, rendered as strings. Set on primitive devices.
    pub params: IndexMap<String, String>,
    /// Declarations rejected for reuse of an existing name
    pub redeclared: Vec<ErrorContext>,
}
impl Module {
    /// Create a new and initially empty [Module]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
    /// Add a port. Consumes and returns `self` to enable chaining.
    pub fn port(mut self, name: impl Into<String>, width: usize, dir: PortDir) -> Self {
        self.add_port(Port::new(name, width, dir));
        self
    }
    pub fn input(self, name: impl Into<String>, width: usize) -> Self {
        self.port(name, width, PortDir::Input)
    }
    pub fn output(self, name: impl Into<String>, width: usize) -> Self {
        self.port(name, width, PortDir::Output)
    }
    pub fn inout(self, name: impl Into<String>, width: usize) -> Self {
        self.port(name, width, PortDir::Inout)
    }
    /// Add an undirected port
    pub fn analog(self, name: impl Into<String>, width: usize) -> Self {
        self.port(name, width, PortDir::NoDir)
    }
    /// Add an internal signal
    pub fn signal(mut self, name: impl Into<String>, width: usize) -> Self {
        self.add_signal(Signal::new(name, width));
        self
    }
    /// Add a bundle-typed port
    pub fn bundle_port(mut self, name: impl Into<String>, of: BundleKey, flipped: bool) -> Self {
        let name = name.into();
        if self.has_name(&name) {
            self.redeclared.push(ErrorContext::Port(name));
            return self;
        }
        self.bundle_ports
            .insert(name.clone(), BundleInstance { name, of, flipped });
        self
    }
    /// Add an internal bundle
    pub fn bundle(mut self, name: impl Into<String>, of: BundleKey, flipped: bool) -> Self {
        let name = name.into();
        if self.has_name(&name) {
            self.redeclared.push(ErrorContext::Bundle(name));
            return self;
        }
        self.bundles
            .insert(name.clone(), BundleInstance { name, of, flipped });
        self
    }
    /// Add an [Instance]
    pub fn instance(mut self, inst: Instance) -> Self {
        self.instances.push(inst);
        self
    }
    /// Add an [InstanceArray]
    pub fn array(mut self, arr: InstanceArray) -> Self {
        self.arrays.push(arr);
        self
    }
    /// Add a [Port], in-place
    pub fn add_port(&mut self, port: Port) {
        if self.has_name(&port.name) {
            return self.redeclared.push(ErrorContext::Port(port.name));
        }
        self.ports.insert(port.name.clone(), port);
    }
    /// Add a [Signal], in-place
    pub fn add_signal(&mut self, signal: Signal) {
        if self.has_name(&signal.name) {
            return self.redeclared.push(ErrorContext::Signal(signal.name));
        }
        self.signals.insert(signal.name.clone(), signal);
    }
    /// Boolean indication of a leaf module, i.e. one with no instances of its own
    pub fn is_leaf(&self) -> bool {
        self.instances.is_empty() && self.arrays.iter().all(|a| a.is_empty())
    }
    /// Get the width of scalar port or signal `name`
    pub fn width_of(&self, name: &str) -> Option<usize> {
        if let Some(p) = self.ports.get(name) {
            return Some(p.width);
        }
        self.signals.get(name).map(|s| s.width)
    }
    /// Boolean indication of whether `name` is used anywhere in our namespace
    pub fn has_name(&self, name: &str) -> bool {
        self.ports.contains_key(name)
            || self.signals.contains_key(name)
            || self.bundle_ports.contains_key(name)
            || self.bundles.contains_key(name)
            || self.instances.iter().any(|i| i.name == name)
            || self.arrays.iter().any(|a| a.name == name)
    }
    /// Get all instance [Site]s, instances first, then array elements
    pub fn sites(&self) -> Vec<Site<'_>> {
        let mut rv: Vec<Site> = self
            .instances
            .iter()
            .map(|i| Site {
                name: i.name.clone(),
                of: &i.of,
                conns: &i.conns,
            })
            .collect();
        for arr in self.arrays.iter() {
            for (idx, conns) in arr.elements.iter().enumerate() {
                rv.push(Site {
                    name: arr.element_name(idx),
                    of: &arr.of,
                    conns,
                });
            }
        }
        rv
    }
    /// Get mutable access to the connections of site `name`
    pub fn site_conns_mut(&mut self, name: &str) -> Option<&mut Conns> {
        if let Some(inst) = self.instances.iter_mut().find(|i| i.name == name) {
            return Some(&mut inst.conns);
        }
        for arr in self.arrays.iter_mut() {
            for (idx, conns) in arr.elements.iter_mut().enumerate() {
                if format!("{}[{}]", arr.name, idx) == name {
                    return Some(conns);
                }
            }
        }
        None
    }
    /// Get each instance and array target, paired with its name
    pub fn targets(&self) -> Vec<(&str, &Of)> {
        self.instances
            .iter()
            .map(|i| (i.name.as_str(), &i.of))
            .chain(self.arrays.iter().map(|a| (a.name.as_str(), &a.of)))
            .collect()
    }
    /// Get mutable access to each target, in the same order as [Module::targets]
    pub fn targets_mut(&mut self) -> impl Iterator<Item = &mut Of> {
        self.instances
            .iter_mut()
            .map(|i| &mut i.of)
            .chain(self.arrays.iter_mut().map(|a| &mut a.of))
    }
}

/// # Design
///
/// Owner of a set of [Module] and [Bundle] definitions.
///
#[derive(Debug, Clone, Default)]
pub struct Design {
    /// Design Name
    pub name: String,
    /// Module Definitions
    pub modules: SlotMap<ModuleKey, Module>,
    /// Bundle Definitions
    pub bundles: SlotMap<BundleKey, Bundle>,
}
impl Design {
    /// Create a new and initially empty [Design]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
    /// Add a [Module], returning its key
    pub fn add_module(&mut self, module: Module) -> ModuleKey {
        self.modules.insert(module)
    }
    /// Add a [Bundle] definition, returning its key
    pub fn add_bundle(&mut self, bundle: Bundle) -> BundleKey {
        self.bundles.insert(bundle)
    }
    pub fn module(&self, key: ModuleKey) -> Option<&Module> {
        self.modules.get(key)
    }
    pub fn module_mut(&mut self, key: ModuleKey) -> Option<&mut Module> {
        self.modules.get_mut(key)
    }
    pub fn bundle(&self, key: BundleKey) -> Option<&Bundle> {
        self.bundles.get(key)
    }
    /// Find the first module named `name`
    pub fn find_module(&self, name: &str) -> Option<ModuleKey> {
        self.modules
            .iter()
            .find(|(_, m)| m.name == name)
            .map(|(k, _)| k)
    }
}
impl PartialEq for Design {
    /// Designs are equal if they have equal content under equal keys
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.modules.len() == other.modules.len()
            && self.bundles.len() == other.bundles.len()
            && self.modules.iter().all(|(k, m)| other.modules.get(k) == Some(m))
            && self.bundles.iter().all(|(k, b)| other.bundles.get(k) == Some(b))
    }
}
