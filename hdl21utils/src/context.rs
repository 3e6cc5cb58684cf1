//!
//! # Hierarchical Diagnostic Contexts
//!

// Std-lib
use std::fmt;

/// Enumerated hierarchy contexts
/// Generally used for error reporting
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorContext {
    Module(String),
    Instance(String),
    Port(String),
    Signal(String),
    Bundle(String),
    Role(String),
    Generator(String),
}
impl ErrorContext {
    /// Name of the referenced item, regardless of its kind
    pub fn name(&self) -> &str {
        match self {
            Self::Module(s)
            | Self::Instance(s)
            | Self::Port(s)
            | Self::Signal(s)
            | Self::Bundle(s)
            | Self::Role(s)
            | Self::Generator(s) => s,
        }
    }
}

///
/// # Hierarchical Path
///
/// Ordered stack of [ErrorContext]s, outermost first,
/// e.g. module -> instance -> port -> role.
/// Displays as its dot-separated names, e.g. `Top.inst1.clk_rst.reset`.
///
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<ErrorContext>);

impl Path {
    /// Create a new and empty [Path]
    pub fn new() -> Self {
        Self(Vec::new())
    }
    /// Create a [Path] rooted at module `name`
    pub fn module(name: impl Into<String>) -> Self {
        Self(vec![ErrorContext::Module(name.into())])
    }
    /// Push a context onto the end of the path
    pub fn push(&mut self, ctx: ErrorContext) {
        self.0.push(ctx);
    }
    /// Return a copy of this path extended by `ctx`
    pub fn with(&self, ctx: ErrorContext) -> Self {
        let mut rv = self.clone();
        rv.0.push(ctx);
        rv
    }
    /// Shorthands for the common extensions
    pub fn instance(&self, name: impl Into<String>) -> Self {
        self.with(ErrorContext::Instance(name.into()))
    }
    pub fn port(&self, name: impl Into<String>) -> Self {
        self.with(ErrorContext::Port(name.into()))
    }
    pub fn signal(&self, name: impl Into<String>) -> Self {
        self.with(ErrorContext::Signal(name.into()))
    }
    pub fn bundle(&self, name: impl Into<String>) -> Self {
        self.with(ErrorContext::Bundle(name.into()))
    }
    /// Extend by a sequence of nested bundle roles
    pub fn roles<S: AsRef<str>>(&self, roles: &[S]) -> Self {
        let mut rv = self.clone();
        for role in roles {
            rv.0.push(ErrorContext::Role(role.as_ref().to_string()));
        }
        rv
    }
    /// Get our context-segments, outermost first
    pub fn segments(&self) -> &[ErrorContext] {
        &self.0
    }
    /// Get our segment-names, outermost first
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|c| c.name()).collect()
    }
    /// Get the innermost segment
    pub fn last(&self) -> Option<&ErrorContext> {
        self.0.last()
    }
}
impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.names().join("."))
    }
}
impl From<Vec<ErrorContext>> for Path {
    fn from(v: Vec<ErrorContext>) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path() {
        let p = Path::module("Top").instance("inst1").port("clk_rst");
        let p = p.roles(&["reset"]);
        assert_eq!(p.to_string(), "Top.inst1.clk_rst.reset");
        assert_eq!(p.segments().len(), 4);
        assert_eq!(p.last(), Some(&ErrorContext::Role("reset".into())));
    }
}
