//!
//! # Elaboration
//!
//! Transforms a user-authored [Design] into an [Elaborated] one, in a sequence of passes:
//!
//! * Walk the hierarchy below the root, expanding generator calls and ordering modules
//! * Check each module's namespace for duplicate names
//! * Resolve port-references into parent-level signals and bundles
//! * Flatten bundles into scalar ports, signals, and connections
//! * Validate connectivity
//!
//! The input design is never modified. Each pass produces a new version of the working copy.
//!

// Std-Lib
use std::collections::HashSet;

// Crates.io
use log::{debug, info};

// Local imports
use crate::bundle::BundleFlattener;
use crate::config::ElabOptions;
use crate::data::{Design, Module, ModuleKey};
use crate::error::{ElabError, ElabResult};
use crate::export::Elaborated;
use crate::hierarchy::Walker;
use crate::utils::Path;
use crate::{flatten, portrefs, validate};

/// Elaborate module `root` of `design`, with default [ElabOptions]
pub fn elaborate(design: &Design, root: ModuleKey) -> ElabResult<Elaborated> {
    Elaborator::default().elaborate(design, root)
}

/// # Elaborator
#[derive(Debug, Clone, Default)]
pub struct Elaborator {
    pub opts: ElabOptions,
}
impl Elaborator {
    pub fn new(opts: ElabOptions) -> Self {
        Self { opts }
    }
    /// Elaborate module `root` of `design`
    pub fn elaborate(&self, design: &Design, root: ModuleKey) -> ElabResult<Elaborated> {
        let top = design
            .module(root)
            .ok_or_else(|| ElabError::InvalidReference {
                path: Path::new(),
                detail: "root module is not defined in this design".into(),
            })?;
        info!("Elaborating `{}` of design `{}`", top.name, design.name);

        let mut working = design.clone();
        let order = Walker::walk(&mut working, root)?;

        // Drop everything unreachable from the root
        let reachable: HashSet<ModuleKey> = order.iter().copied().collect();
        working.modules.retain(|key, _| reachable.contains(&key));
        debug!("{} modules reachable from `{}`", order.len(), top.name);

        validate::check_names(&working, &order)?;
        portrefs::resolve(&mut working, &order, &self.opts)?;
        let working = BundleFlattener::flatten(&working, &order, &self.opts)?;
        validate::validate(&working, &order, &self.opts)?;

        info!("Elaborated `{}`", top.name);
        Ok(Elaborated::new(working, root, order))
    }
    /// Hierarchically flatten module `key` of `elab`
    pub fn flatten(&self, elab: &Elaborated, key: ModuleKey) -> ElabResult<Module> {
        flatten::flatten(elab, key, &self.opts)
    }
}
