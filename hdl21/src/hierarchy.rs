//!
//! # Hierarchy Walker
//!
//! Depth-first traversal of the instance hierarchy below a root module,
//! expanding generator calls into modules as they are encountered,
//! and producing a dependency order (children before parents).
//!

// Crates.io
use log::debug;

// Local imports
use crate::data::{Design, Module, ModuleKey, Of};
use crate::error::{ElabError, ElabResult};
use crate::generator::{GeneratorCache, GeneratorCall};
use crate::utils::{DepOrder, DepOrderer, Path};

/// # Hierarchy Walker
///
/// Mutates its [Design] as it goes: each generated module is added to the design,
/// and each expanded generator-call target is replaced by the key of its module.
pub(crate) struct Walker<'d> {
    design: &'d mut Design,
    cache: GeneratorCache,
}
impl<'d> Walker<'d> {
    /// Walk the hierarchy below `root`, returning its dependency order
    pub(crate) fn walk(design: &'d mut Design, root: ModuleKey) -> ElabResult<Vec<ModuleKey>> {
        let mut this = Self {
            design,
            cache: GeneratorCache::default(),
        };
        let order = this.order(&[root])?;
        debug!(
            "Ordered {} modules, {} of them generated",
            order.len(),
            this.cache.len()
        );
        Ok(order)
    }
    fn module(&self, key: ModuleKey) -> ElabResult<&Module> {
        self.design
            .modules
            .get(key)
            .ok_or_else(|| ElabError::InvalidReference {
                path: Path::new(),
                detail: "module is not defined in this design".into(),
            })
    }
    /// Expand generator-call `call`, or get its previously-generated module
    fn expand(
        &mut self,
        call: &GeneratorCall,
        orderer: &mut DepOrderer<Self>,
    ) -> ElabResult<ModuleKey> {
        if let Some(key) = self.cache.get(call) {
            return Ok(key);
        }
        self.cache.begin(call)?;
        let module = self.cache.run(call)?;
        let key = self.design.add_module(module);
        // Complete the generated module's own hierarchy while `call` is still pending,
        // so that calls which require their own result are detected
        orderer.push(self, &key)?;
        self.cache.finish(call, key);
        Ok(key)
    }
}
impl DepOrder for Walker<'_> {
    type Item = ModuleKey;
    type Error = ElabError;

    /// Resolve and push each of `key`'s instance targets,
    /// then write back the resolved keys.
    fn process(&mut self, key: &ModuleKey, orderer: &mut DepOrderer<Self>) -> ElabResult<()> {
        let (name, targets) = {
            let module = self.module(*key)?;
            let targets: Vec<(String, Of)> = module
                .targets()
                .into_iter()
                .map(|(name, of)| (name.to_string(), of.clone()))
                .collect();
            (module.name.clone(), targets)
        };
        let mut resolved = Vec::with_capacity(targets.len());
        for (inst, of) in targets.iter() {
            let child = match of {
                Of::Module(k) => {
                    if !self.design.modules.contains_key(*k) {
                        return Err(ElabError::InvalidReference {
                            path: Path::module(&name).instance(inst),
                            detail: "instance of a module that is not in this design".into(),
                        });
                    }
                    *k
                }
                Of::Call(call) => self.expand(call, orderer)?,
            };
            orderer.push(self, &child)?;
            resolved.push(child);
        }
        let module = self
            .design
            .modules
            .get_mut(*key)
            .ok_or_else(|| ElabError::InvalidReference {
                path: Path::module(&name),
                detail: "module is not defined in this design".into(),
            })?;
        for (of, child) in module.targets_mut().zip(resolved) {
            *of = Of::Module(child);
        }
        Ok(())
    }
    fn fail(&mut self, cycle: Vec<ModuleKey>) -> ElabResult<()> {
        let cycle = cycle
            .iter()
            .map(|k| {
                self.design
                    .modules
                    .get(*k)
                    .map(|m| m.name.clone())
                    .unwrap_or_default()
            })
            .collect();
        Err(ElabError::InstantiationCycle { cycle })
    }
}
