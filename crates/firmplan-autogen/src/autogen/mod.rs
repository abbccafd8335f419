//! Build contexts: a platform for one arch, a module inside it, and the workspace pass tying
//! them together.
mod module;
mod platform;
mod workspace;

pub use module::ModuleAutoGen;
pub use platform::PlatformAutoGen;
pub use workspace::WorkspaceAutoGen;

use crate::errors::AutoGenResult;
use crate::meta_file::MetaFile;
use crate::package::PackageData;
use fxhash::FxHashMap;
use std::cell::RefCell;
use std::hash::Hash;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoGenKind {
    Platform,
    Module,
    Packages,
}

/// Identity of a build context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AutoGenKey {
    pub kind: AutoGenKind,
    pub target: String,
    pub toolchain: String,
    pub arch: String,
    pub file: MetaFile,
}

impl AutoGenKey {
    pub fn new(kind: AutoGenKind, target: &str, toolchain: &str, arch: &str, file: &MetaFile) -> Self {
        AutoGenKey {
            kind,
            target: target.to_string(),
            toolchain: toolchain.to_string(),
            arch: arch.to_string(),
            file: file.clone(),
        }
    }
}

type Slot<T> = RefCell<FxHashMap<AutoGenKey, Rc<T>>>;

/// Hands out exactly one build context per [`AutoGenKey`].
#[derive(Default)]
pub struct AutoGenCache {
    platforms: Slot<PlatformAutoGen>,
    modules: Slot<ModuleAutoGen>,
    packages: Slot<Vec<Rc<PackageData>>>,
}

fn get_or_build<T>(
    slot: &Slot<T>,
    key: AutoGenKey,
    build: impl FnOnce() -> AutoGenResult<T>,
) -> AutoGenResult<Rc<T>> {
    if let Some(existing) = slot.borrow().get(&key) {
        return Ok(existing.clone());
    }
    // Building may recurse into the cache, so no borrow is held meanwhile
    let built = Rc::new(build()?);
    Ok(slot.borrow_mut().entry(key).or_insert(built).clone())
}

impl AutoGenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn platform(
        &self,
        key: AutoGenKey,
        build: impl FnOnce() -> AutoGenResult<PlatformAutoGen>,
    ) -> AutoGenResult<Rc<PlatformAutoGen>> {
        get_or_build(&self.platforms, key, build)
    }

    pub fn module(
        &self,
        key: AutoGenKey,
        build: impl FnOnce() -> AutoGenResult<ModuleAutoGen>,
    ) -> AutoGenResult<Rc<ModuleAutoGen>> {
        get_or_build(&self.modules, key, build)
    }

    pub fn packages(
        &self,
        key: AutoGenKey,
        build: impl FnOnce() -> AutoGenResult<Vec<Rc<PackageData>>>,
    ) -> AutoGenResult<Rc<Vec<Rc<PackageData>>>> {
        get_or_build(&self.packages, key, build)
    }

    pub fn get_module(&self, key: &AutoGenKey) -> Option<Rc<ModuleAutoGen>> {
        self.modules.borrow().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.platforms.borrow().len() + self.modules.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
