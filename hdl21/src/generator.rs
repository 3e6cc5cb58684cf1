//!
//! # Generators
//!
//! Parametric functions from a parameter-record to a [Module].
//! Generator calls are written into the design as instance targets ([GeneratorCall]),
//! and expanded during elaboration. Each distinct (generator, parameters) pair
//! is run at most once per elaboration, and its resulting module shared by every
//! instance which calls it.
//!

// Std-Lib
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

// Crates.io
use indexmap::IndexMap;
use log::{debug, trace};
use serde::Serialize;
use serde_json::Value;

// Local imports
use crate::data::{Module, ModuleKey};
use crate::error::{ElabError, ElabResult};
use crate::utils::Shared;

/// Boxed, thread-safe error type, as returned by generator functions
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Generator Function Result Type
pub type GeneratorResult = Result<Module, BoxError>;

///
/// # Generator Parameter Record
///
/// Object-safe view of a parameter value, supporting hashing, equality,
/// and conversion to a deterministic name-suffix.
///
/// Implemented for any type with the `Debug + Eq + Hash + Serialize` combination.
/// Equality is by value, and never matches across differing types.
///
pub trait Param: Any + fmt::Debug + Send + Sync {
    /// Dynamic value equality
    fn dyn_eq(&self, other: &dyn Param) -> bool;
    /// Dynamic value hashing
    fn dyn_hash(&self, state: &mut dyn Hasher);
    /// Upcast to [Any], for downcasting to the concrete type
    fn as_any(&self) -> &dyn Any;
    /// Deterministic name-suffix, e.g. `width=4,depth=2`
    fn unique_name(&self) -> String;
}
impl<T> Param for T
where
    T: Any + fmt::Debug + Eq + Hash + Serialize + Send + Sync,
{
    fn dyn_eq(&self, other: &dyn Param) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| other == self)
    }
    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn unique_name(&self) -> String {
        unique_name(self)
    }
}

/// Create a deterministic name-suffix from parameter-record `params`.
/// Struct-like records produce `k=v` pairs; unit records produce an empty string.
fn unique_name<T: Serialize + fmt::Debug>(params: &T) -> String {
    match serde_json::to_value(params) {
        Ok(Value::Null) => String::new(),
        Ok(Value::Object(fields)) => fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, render(v)))
            .collect::<Vec<_>>()
            .join(","),
        Ok(other) => render(&other),
        Err(_) => format!("{:?}", params),
    }
}
/// Get the field-values of struct-like parameter-record `params`, rendered as strings
pub(crate) fn param_values<T: Serialize>(params: &T) -> IndexMap<String, String> {
    match serde_json::to_value(params) {
        Ok(Value::Object(fields)) => fields.iter().map(|(k, v)| (k.clone(), render(v))).collect(),
        _ => IndexMap::new(),
    }
}
fn render(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

///
/// # Generator Implementation Trait
///
/// Implemented by user types which produce modules from parameters.
/// Generators are expected to be pure: equal parameters produce equal modules.
///
pub trait Generate: Send + Sync + 'static {
    type Params: Param;
    fn generate(&self, params: &Self::Params) -> GeneratorResult;
}

/// Adapter from a closure `Fn(&P) -> GeneratorResult` to [Generate]
struct FnGenerate<P, F> {
    func: F,
    _params: PhantomData<fn(&P)>,
}
impl<P, F> Generate for FnGenerate<P, F>
where
    P: Param,
    F: Fn(&P) -> GeneratorResult + Send + Sync + 'static,
{
    type Params = P;
    fn generate(&self, params: &P) -> GeneratorResult {
        (self.func)(params)
    }
}

/// Type-erased generator, invoked with a dynamic [Param]
trait DynGenerate: Send + Sync {
    fn generate_dyn(&self, params: &dyn Param) -> GeneratorResult;
}
impl<G: Generate> DynGenerate for G {
    fn generate_dyn(&self, params: &dyn Param) -> GeneratorResult {
        match params.as_any().downcast_ref::<G::Params>() {
            Some(p) => self.generate(p),
            None => Err(format!("invalid parameter type: {:?}", params).into()),
        }
    }
}

/// Shared internals of a [Generator]
struct GeneratorInner {
    name: String,
    func: Box<dyn DynGenerate>,
}
impl fmt::Debug for GeneratorInner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Generator({})", self.name)
    }
}

///
/// # Generator
///
/// Named, parametric module-producing function, typed by its parameter-record `P`.
/// Clones share identity: two [Generator]s are equal only if cloned from the same original.
///
pub struct Generator<P> {
    inner: Shared<GeneratorInner>,
    _params: PhantomData<fn(&P)>,
}
impl<P: Param> Generator<P> {
    /// Create a new [Generator] from an implementer of [Generate]
    pub fn new<G: Generate<Params = P>>(name: impl Into<String>, gen: G) -> Self {
        let inner = GeneratorInner {
            name: name.into(),
            func: Box::new(gen),
        };
        Self {
            inner: Shared::new(inner),
            _params: PhantomData,
        }
    }
    /// Create a new [Generator] from a closure
    pub fn from_fn<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&P) -> GeneratorResult + Send + Sync + 'static,
    {
        Self::new(
            name,
            FnGenerate {
                func,
                _params: PhantomData,
            },
        )
    }
    /// Generator name
    pub fn name(&self) -> &str {
        &self.inner.name
    }
    /// Create a [GeneratorCall] with parameters `params`, for use as an instance target.
    /// The generator itself is not run until elaboration.
    pub fn call(&self, params: P) -> GeneratorCall {
        GeneratorCall {
            gen: self.inner.clone(),
            params: Arc::new(params),
        }
    }
}
impl<P> Clone for Generator<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _params: PhantomData,
        }
    }
}
impl<P> PartialEq for Generator<P> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}
impl<P> Eq for Generator<P> {}
impl<P> fmt::Debug for Generator<P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.inner)
    }
}

///
/// # Generator Call
///
/// A [Generator] paired with a parameter value.
/// Equal and hashed by the pair of generator-identity and parameter-value,
/// which serves as the elaboration cache key.
///
#[derive(Clone)]
pub struct GeneratorCall {
    gen: Shared<GeneratorInner>,
    params: Arc<dyn Param>,
}
impl GeneratorCall {
    /// Name of the called generator
    pub fn generator_name(&self) -> &str {
        &self.gen.name
    }
    /// Parameter value
    pub fn params(&self) -> &dyn Param {
        &*self.params
    }
    /// Name of the resulting module, e.g. `Inverter(width=4)`
    pub fn name(&self) -> String {
        let suffix = self.params.unique_name();
        match suffix.is_empty() {
            true => self.gen.name.clone(),
            false => format!("{}({})", self.gen.name, suffix),
        }
    }
    /// Invoke the generator function
    fn run(&self) -> GeneratorResult {
        self.gen.func.generate_dyn(&*self.params)
    }
}
impl PartialEq for GeneratorCall {
    fn eq(&self, other: &Self) -> bool {
        self.gen == other.gen && self.params.dyn_eq(&*other.params)
    }
}
impl Eq for GeneratorCall {}
impl Hash for GeneratorCall {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.gen.hash(state);
        self.params.dyn_hash(state);
    }
}
impl fmt::Debug for GeneratorCall {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "GeneratorCall({}, {:?})", self.gen.name, self.params)
    }
}

///
/// # Generator Cache
///
/// Maps each completed [GeneratorCall] to its resulting module,
/// and tracks the stack of calls in progress, to detect cyclic references.
/// Scoped to a single elaboration.
///
#[derive(Debug, Default)]
pub(crate) struct GeneratorCache {
    done: HashMap<GeneratorCall, ModuleKey>,
    pending: Vec<GeneratorCall>,
}
impl GeneratorCache {
    /// Get the result of a previously completed call
    pub(crate) fn get(&self, call: &GeneratorCall) -> Option<ModuleKey> {
        let rv = self.done.get(call).copied();
        if rv.is_some() {
            trace!("Generator cache hit: {}", call.name());
        }
        rv
    }
    /// Mark `call` as in progress.
    /// Fails if it is already in progress, i.e. if it requires its own result.
    pub(crate) fn begin(&mut self, call: &GeneratorCall) -> ElabResult<()> {
        if let Some(pos) = self.pending.iter().position(|c| c == call) {
            let mut cycle: Vec<String> = self.pending[pos..].iter().map(|c| c.name()).collect();
            cycle.push(call.name());
            return Err(ElabError::CyclicGeneratorReference { cycle });
        }
        self.pending.push(call.clone());
        Ok(())
    }
    /// Run the generator function of `call`, and name its resulting module
    pub(crate) fn run(&self, call: &GeneratorCall) -> ElabResult<Module> {
        debug!("Running generator {}", call.name());
        let mut module = call.run().map_err(|source| ElabError::Generator {
            generator: call.generator_name().to_string(),
            params: format!("{:?}", call.params()),
            source,
        })?;
        if module.name.is_empty() {
            module.name = call.generator_name().to_string();
        }
        let suffix = call.params().unique_name();
        if !suffix.is_empty() {
            module.name = format!("{}({})", module.name, suffix);
        }
        Ok(module)
    }
    /// Record the result of (in progress) `call`
    pub(crate) fn finish(&mut self, call: &GeneratorCall, key: ModuleKey) {
        self.pending.retain(|c| c != call);
        self.done.insert(call.clone(), key);
    }
    /// Number of completed calls
    pub(crate) fn len(&self) -> usize {
        self.done.len()
    }
}
