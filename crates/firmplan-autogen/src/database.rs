use crate::errors::{AutoGenError, AutoGenResult};
use crate::meta_file::MetaFile;
use crate::module::ModuleData;
use crate::package::PackageData;
use crate::platform::PlatformData;
use crate::record::RecordStore;
use fxhash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

type Cache<T> = RefCell<FxHashMap<(MetaFile, String), Rc<T>>>;

/// Typed views of descriptors, resolved once per `(file, arch)` and shared afterwards.
///
/// The same descriptor requested twice for the same arch yields the same `Rc`, which library
/// ordering relies on.
pub struct BuildDatabase<'s> {
    store: &'s dyn RecordStore,
    packages: Cache<PackageData>,
    modules: Cache<ModuleData>,
    platforms: Cache<PlatformData>,
}

impl<'s> BuildDatabase<'s> {
    pub fn new(store: &'s dyn RecordStore) -> Self {
        BuildDatabase {
            store,
            packages: RefCell::default(),
            modules: RefCell::default(),
            platforms: RefCell::default(),
        }
    }

    pub fn store(&self) -> &'s dyn RecordStore {
        self.store
    }

    fn check(&self, file: &MetaFile, ext: &str) -> AutoGenResult<()> {
        file.validate(ext)?;
        if !self.store.contains(file) {
            return Err(AutoGenError::file_not_found(format!("File [{}] is not found", file)));
        }
        Ok(())
    }

    pub fn package(&self, file: &MetaFile, arch: &str) -> AutoGenResult<Rc<PackageData>> {
        let key = (file.clone(), arch.to_string());
        if let Some(package) = self.packages.borrow().get(&key) {
            return Ok(package.clone());
        }

        self.check(file, ".dec")?;
        debug!(%file, arch, "resolving package");
        let package = Rc::new(PackageData::resolve(self.store, file, arch)?);
        self.packages.borrow_mut().insert(key, package.clone());
        Ok(package)
    }

    pub fn module(&self, file: &MetaFile, arch: &str) -> AutoGenResult<Rc<ModuleData>> {
        let key = (file.clone(), arch.to_string());
        if let Some(module) = self.modules.borrow().get(&key) {
            return Ok(module.clone());
        }

        self.check(file, ".inf")?;
        debug!(%file, arch, "resolving module");
        let module = Rc::new(ModuleData::resolve(self, file, arch)?);
        self.modules.borrow_mut().insert(key, module.clone());
        Ok(module)
    }

    /// A platform is cached per SKU as well, since the SKU selects PCD values.
    pub fn platform(
        &self,
        file: &MetaFile,
        arch: &str,
        sku_id: Option<&str>,
    ) -> AutoGenResult<Rc<PlatformData>> {
        let key = (file.clone(), format!("{}:{}", arch, sku_id.unwrap_or("")));
        if let Some(platform) = self.platforms.borrow().get(&key) {
            return Ok(platform.clone());
        }

        self.check(file, ".dsc")?;
        debug!(%file, arch, "resolving platform");
        let platform = Rc::new(PlatformData::resolve(self, file, arch, sku_id)?);
        self.platforms.borrow_mut().insert(key, platform.clone());
        Ok(platform)
    }
}

#[cfg(test)]
mod test {
    use super::BuildDatabase;
    use crate::errors::ErrorCode;
    use crate::meta_file::MetaFile;
    use crate::record::InMemoryRecordStore;
    use std::rc::Rc;

    #[test]
    fn same_key_same_instance() {
        let dec = MetaFile::new("Pkg/Pkg.dec");
        let mut store = InMemoryRecordStore::new();
        store.define(&dec, "PACKAGE_NAME", "Pkg");
        store.define(&dec, "PACKAGE_GUID", "11111111-2222-3333-4444-555555555555");

        let db = BuildDatabase::new(&store);
        let a = db.package(&dec, "X64").unwrap();
        let b = db.package(&MetaFile::new("Pkg/./Pkg.dec"), "X64").unwrap();
        let c = db.package(&dec, "IA32").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert!(!Rc::ptr_eq(&a, &c));
    }

    #[test]
    fn missing_file() {
        let store = InMemoryRecordStore::new();
        let db = BuildDatabase::new(&store);
        let err = db.module(&MetaFile::new("Pkg/Missing.inf"), "X64").unwrap_err();
        assert_eq!(err.code(), ErrorCode::FileNotFound);
    }
}
