//!
//! # Elaboration Errors
//!

// Std-Lib
use std::fmt;

// Crates.io
use thiserror::Error;

// Local imports
use crate::data::PortDir;
use crate::generator::BoxError;
use crate::utils::{ser, Path};

/// # Enumerated Elaboration Errors
#[derive(Debug, Error)]
pub enum ElabError {
    /// A generator call (or mutually-recursive set of calls) requires its own result
    #[error("cyclic generator reference: {}", .cycle.join(" -> "))]
    CyclicGeneratorReference { cycle: Vec<String> },
    /// A module transitively instantiates itself
    #[error("instantiation cycle: {}", .cycle.join(" -> "))]
    InstantiationCycle { cycle: Vec<String> },
    /// A generator function returned an error
    #[error("generator `{generator}` failed with parameters {params}: {source}")]
    Generator {
        generator: String,
        params: String,
        #[source]
        source: BoxError,
    },
    /// Bundle connection violations, collected across the whole design
    #[error("{} bundle connection error(s):{}", .violations.len(), listing(.violations))]
    Bundle { violations: Vec<BundleViolation> },
    /// Connectivity violations, collected across the whole design
    #[error("{} connectivity violation(s):{}", .violations.len(), listing(.violations))]
    Validation { violations: Vec<Violation> },
    /// Reference to a module or other object absent from the design
    #[error("invalid reference at `{path}`: {detail}")]
    InvalidReference { path: Path, detail: String },
    /// Failure to produce an output representation
    #[error("export failed: {0}")]
    Export(String),
    #[error(transparent)]
    Serialization(#[from] ser::Error),
}
impl ElabError {
    /// Get the connectivity violations, if any
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Validation { violations } => violations,
            _ => &[],
        }
    }
    /// Get the bundle violations, if any
    pub fn bundle_violations(&self) -> &[BundleViolation] {
        match self {
            Self::Bundle { violations } => violations,
            _ => &[],
        }
    }
}

/// Elaboration Result Type
pub type ElabResult<T> = Result<T, ElabError>;

/// Render a violation list, one per line
fn listing<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(|v| format!("\n  {}", v)).collect()
}

/// # Connectivity Violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Location, e.g. `Top.inv1.inp`
    pub path: Path,
    pub kind: ViolationKind,
}
impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

/// # Enumerated Connectivity Violations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// Child port with no connection
    UnconnectedPort,
    /// Signal with more than one strong driver
    MultipleDrivers { drivers: Vec<Path> },
    /// Signal which is read, but never driven
    Undriven,
    /// Port and connected-signal widths differ
    ArityMismatch { port_width: usize, signal_width: usize },
    /// Connection to a port the target module does not have
    UnknownPort,
    /// Connection to a parent signal which does not exist
    UnknownSignal { name: String },
    /// Port-reference to an instance which does not exist
    UnknownInstance { name: String },
    /// Connection left unresolved after elaboration, e.g. a chained port-reference
    UnresolvedConnection,
    /// Name used more than once in a module's namespace
    DuplicateName { name: String },
    /// Signal or port of zero width
    ZeroWidth,
    /// Instance target which was never expanded into a module
    Unexpanded,
}
impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnconnectedPort => write!(f, "unconnected port"),
            Self::MultipleDrivers { drivers } => {
                let drivers: Vec<String> = drivers.iter().map(|d| d.to_string()).collect();
                write!(f, "multiple drivers: {}", drivers.join(", "))
            }
            Self::Undriven => write!(f, "signal is read but never driven"),
            Self::ArityMismatch {
                port_width,
                signal_width,
            } => write!(
                f,
                "width mismatch: port is {} bits, signal is {} bits",
                port_width, signal_width
            ),
            Self::UnknownPort => write!(f, "no such port on the target module"),
            Self::UnknownSignal { name } => write!(f, "no such signal `{}`", name),
            Self::UnknownInstance { name } => write!(f, "no such instance `{}`", name),
            Self::UnresolvedConnection => write!(f, "unresolved connection"),
            Self::DuplicateName { name } => write!(f, "duplicate name `{}`", name),
            Self::ZeroWidth => write!(f, "zero-width signal"),
            Self::Unexpanded => write!(f, "instance target was never expanded"),
        }
    }
}

/// # Bundle Connection Violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleViolation {
    /// Location, including nested roles, e.g. `Top.inst1.clk_rst.reset`
    pub path: Path,
    pub kind: BundleViolationKind,
}
impl fmt::Display for BundleViolation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

/// # Enumerated Bundle Violations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleViolationKind {
    /// Structural mismatch between the two sides
    BundleMismatch(MismatchKind),
    /// Same-named signal roles of differing widths
    WidthMismatch { child: usize, parent: usize },
    /// Same-named signal roles of incompatible directions
    DirectionConflict { child: PortDir, parent: PortDir },
}
impl fmt::Display for BundleViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BundleMismatch(kind) => write!(f, "bundle mismatch: {}", kind),
            Self::WidthMismatch { child, parent } => {
                write!(f, "width mismatch: {} vs {} bits", child, parent)
            }
            Self::DirectionConflict { child, parent } => {
                write!(f, "direction conflict: {} vs {}", child, parent)
            }
        }
    }
}

/// # Structural Bundle Mismatches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchKind {
    /// Role present on the child side, absent on the parent side
    MissingRole,
    /// Role present on the parent side, absent on the child side
    ExtraRole,
    /// Same-named roles, one a signal and the other a bundle
    KindMismatch,
    /// Connection to a parent bundle which does not exist
    UnknownBundle { name: String },
    /// Bundle port connected to something other than a bundle
    NotABundle,
    /// Scalar port connected to a bundle
    ScalarPort,
    /// Bundle definition which (transitively) contains itself
    RecursiveDefinition,
    /// Bundle definition absent from the design
    UndefinedBundle,
    /// Flattened name collides with an existing name
    NameCollision { name: String },
}
impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MissingRole => write!(f, "role missing from the connected bundle"),
            Self::ExtraRole => write!(f, "extra role on the connected bundle"),
            Self::KindMismatch => write!(f, "signal role connected to bundle role"),
            Self::UnknownBundle { name } => write!(f, "no such bundle `{}`", name),
            Self::NotABundle => write!(f, "bundle port connected to a non-bundle"),
            Self::ScalarPort => write!(f, "scalar port connected to a bundle"),
            Self::RecursiveDefinition => write!(f, "recursive bundle definition"),
            Self::UndefinedBundle => write!(f, "bundle definition is not in this design"),
            Self::NameCollision { name } => write!(f, "flattened name `{}` is already in use", name),
        }
    }
}
