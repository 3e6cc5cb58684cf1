//!
//! # Primitive Devices
//!
//! Leaf modules for the common circuit elements,
//! each with undirected, single-bit ports.
//!
//! Primitives are parametric. Each is instantiated through a [GeneratorCall]
//! created by a [PrimitiveLibrary], and elaborated like any other generator:
//! equal parameters share a single module, named e.g. `IdealResistor(r=1k)`,
//! and each module's parameter values are recorded in its `params`.
//!

// Std-Lib
use std::fmt;

// Crates.io
use serde::{Deserialize, Serialize};

// Local imports
use crate::data::{Module, PortDir};
use crate::generator::{param_values, Generator, GeneratorCall, Param};
use crate::utils::{enumstr, EnumStr};

enumstr!(
    /// # Enumerated Primitive Devices
    Primitive {
        Mos: "Mos",
        IdealResistor: "IdealResistor",
        IdealCapacitor: "IdealCapacitor",
        IdealInductor: "IdealInductor",
        DcVoltageSource: "DcVoltageSource",
        CurrentSource: "CurrentSource",
        Diode: "Diode",
        Bipolar: "Bipolar",
    }
);
impl Primitive {
    /// Port names, in order
    pub fn port_names(&self) -> &'static [&'static str] {
        match self {
            Self::Mos => &["d", "g", "s", "b"],
            Self::Bipolar => &["c", "b", "e"],
            _ => &["p", "n"],
        }
    }
    /// Create the (unparameterized) leaf [Module] of this primitive
    pub fn module(&self) -> Module {
        let mut rv = Module::new(self.to_str());
        for name in self.port_names() {
            rv = rv.port(*name, 1, PortDir::NoDir);
        }
        rv
    }
}

/// # Scalar Parameter Value
///
/// Numeric literal or SI-prefixed value, e.g. `1k` or `10n`, kept in its authored form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scalar(pub String);
impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self(s)
    }
}
impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Self(i.to_string())
    }
}
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

enumstr!(
    /// # MOS Type
    MosType {
        Nmos: "NMOS",
        Pmos: "PMOS",
    }
);
enumstr!(
    /// # MOS Threshold Flavor
    MosVth {
        Std: "STD",
        Low: "LOW",
        High: "HIGH",
        UltraLow: "ULTRA_LOW",
        Zero: "ZERO",
        Native: "NATIVE",
    }
);
enumstr!(
    /// # Bipolar Type
    BipolarType {
        Npn: "NPN",
        Pnp: "PNP",
    }
);

/// # MOS Transistor Parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MosParams {
    /// Width, in resolution units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<Scalar>,
    /// Length, in resolution units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l: Option<Scalar>,
    /// Number of parallel fingers
    pub npar: u32,
    /// Multiplier
    pub mult: u32,
    pub tp: MosType,
    pub vth: MosVth,
    /// Model name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}
impl Default for MosParams {
    fn default() -> Self {
        Self {
            w: None,
            l: None,
            npar: 1,
            mult: 1,
            tp: MosType::Nmos,
            vth: MosVth::Std,
            model: None,
        }
    }
}
impl MosParams {
    pub fn nmos() -> Self {
        Self::default()
    }
    pub fn pmos() -> Self {
        Self {
            tp: MosType::Pmos,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResistorParams {
    /// Resistance (Ohms)
    pub r: Scalar,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapacitorParams {
    /// Capacitance (F)
    pub c: Scalar,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InductorParams {
    /// Inductance (H)
    pub l: Scalar,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DcVoltageSourceParams {
    /// DC Value (V)
    pub dc: Scalar,
    /// AC Amplitude (V)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ac: Option<Scalar>,
}
impl Default for DcVoltageSourceParams {
    fn default() -> Self {
        Self {
            dc: Scalar::from(0),
            ac: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrentSourceParams {
    /// DC Value (A)
    pub dc: Scalar,
}
impl Default for CurrentSourceParams {
    fn default() -> Self {
        Self { dc: Scalar::from(0) }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiodeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BipolarParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l: Option<Scalar>,
    pub tp: BipolarType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mult: Option<Scalar>,
}
impl Default for BipolarParams {
    fn default() -> Self {
        Self {
            w: None,
            l: None,
            tp: BipolarType::Npn,
            model: None,
            mult: None,
        }
    }
}

///
/// # Primitive Parameter Record
///
/// Implemented by the parameter type of each [Primitive],
/// pairing it with its device and its generator in a [PrimitiveLibrary].
///
pub trait PrimitiveParams: Param + Serialize + Sized {
    const PRIMITIVE: Primitive;
    fn generator(lib: &PrimitiveLibrary) -> &Generator<Self>;
}

macro_rules! primitive_params {
    ( $( $params:ident => $prim:ident, $field:ident ;)* ) => {
        $(
            impl PrimitiveParams for $params {
                const PRIMITIVE: Primitive = Primitive::$prim;
                fn generator(lib: &PrimitiveLibrary) -> &Generator<Self> {
                    &lib.$field
                }
            }
        )*
        ///
        /// # Primitive Library
        ///
        /// One generator per [Primitive].
        /// Calls made through the same library share generator identity,
        /// so equal parameters elaborate into a single shared module.
        ///
        #[derive(Debug, Clone)]
        pub struct PrimitiveLibrary {
            $( $field: Generator<$params>, )*
        }
        impl PrimitiveLibrary {
            pub fn new() -> Self {
                Self {
                    $( $field: generator::<$params>(), )*
                }
            }
        }
    };
}
primitive_params! {
    MosParams => Mos, mos;
    ResistorParams => IdealResistor, resistor;
    CapacitorParams => IdealCapacitor, capacitor;
    InductorParams => IdealInductor, inductor;
    DcVoltageSourceParams => DcVoltageSource, vsource;
    CurrentSourceParams => CurrentSource, isource;
    DiodeParams => Diode, diode;
    BipolarParams => Bipolar, bipolar;
}

impl PrimitiveLibrary {
    /// Create a [GeneratorCall] of the primitive parameterized by `params`,
    /// for use as an instance target
    pub fn call<P: PrimitiveParams>(&self, params: P) -> GeneratorCall {
        P::generator(self).call(params)
    }
}
impl Default for PrimitiveLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the generator of primitive `P::PRIMITIVE`
fn generator<P: PrimitiveParams>() -> Generator<P> {
    Generator::from_fn(P::PRIMITIVE.to_str(), |p: &P| {
        let mut module = P::PRIMITIVE.module();
        module.params = param_values(p);
        Ok(module)
    })
}
