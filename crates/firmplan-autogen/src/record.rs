//! The row-record interface between descriptor ingestion and resolution.
//!
//! Descriptor parsers turn DEC/INF/DSC text into [`Record`]s. Resolution only ever reads them
//! back through [`RecordStore::query`].
use crate::meta_file::MetaFile;
use crate::types::ARCH_COMMON;
use indexmap::IndexMap;

/// Section a PCD record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PcdModel {
    FixedAtBuild,
    PatchableInModule,
    FeatureFlag,
    /// Generic dynamic section. In a module this leaves the final type to the platform.
    Dynamic,
    DynamicDefault,
    DynamicHii,
    DynamicVpd,
    DynamicEx,
    DynamicExDefault,
    DynamicExHii,
    DynamicExVpd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// `[Defines]` entry: `[name, value]`
    Header,
    /// `[Packages]`: `[dec path]`
    Package,
    /// DEC `[name, header]`, INF `[name, optional instance]`, DSC `[name, instance]`
    LibraryClass,
    /// Legacy library reference: INF `[name]`, DSC `[inf path]`
    LibraryInstance,
    /// DEC `[name, guid value]`, INF `[name]`
    Protocol,
    Ppi,
    Guid,
    /// `[path]`
    Include,
    /// `[path, tool chain family, tag, tool code, feature flag]`
    SourceFile,
    /// `[file type, path, target]`
    BinaryFile,
    /// `[token space, token name, setting]`
    Pcd(PcdModel),
    /// `[expression]`, one line of a whitespace separated dependency expression
    Depex,
    /// `[family, key, option]`
    BuildOption,
    /// `[id number, name]`
    SkuId,
    /// `[inf path]`
    Component,
    /// `[path]`
    ComponentSourceOverridePath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub values: Vec<String>,
    pub arch: String,
    /// Module type, SKU name, or build-option style depending on the kind.
    pub scope: String,
    /// Component record id for module-scoped entries inside a platform descriptor.
    pub owner: Option<u32>,
    pub id: u32,
    pub line: u32,
}

impl Record {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Record {
            values: values.into_iter().map(Into::into).collect(),
            arch: ARCH_COMMON.to_string(),
            scope: ARCH_COMMON.to_string(),
            owner: None,
            id: 0,
            line: 0,
        }
    }

    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn owner(mut self, owner: u32) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    pub fn line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    /// Value column `index`, or empty when the column is absent.
    pub fn value(&self, index: usize) -> &str {
        self.values.get(index).map(String::as_str).unwrap_or("")
    }
}

pub trait RecordStore {
    /// Records of `kind` in `file` whose arch is `arch` or COMMON (every arch when `arch` is
    /// `None`), restricted to records owned by component `owner` (or to global records when
    /// `owner` is `None`). Insertion order is preserved.
    fn query(&self, file: &MetaFile, kind: RecordKind, arch: Option<&str>, owner: Option<u32>)
    -> Vec<Record>;

    fn contains(&self, file: &MetaFile) -> bool;
}

/// Record store held entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRecordStore {
    files: IndexMap<MetaFile, Vec<(RecordKind, Record)>>,
    next_id: u32,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `file` even if it ends up holding no records.
    pub fn add_file(&mut self, file: &MetaFile) {
        self.files.entry(file.clone()).or_default();
    }

    /// Add a record. Records without an explicit id get a store-unique one, which is returned.
    pub fn push(&mut self, file: &MetaFile, kind: RecordKind, mut record: Record) -> u32 {
        if record.id == 0 {
            self.next_id += 1;
            record.id = self.next_id;
        }
        let id = record.id;
        self.files.entry(file.clone()).or_default().push((kind, record));
        id
    }

    /// Shorthand for a COMMON-arch, unscoped record.
    pub fn add<I, S>(&mut self, file: &MetaFile, kind: RecordKind, values: I) -> u32
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(file, kind, Record::new(values))
    }

    pub fn define(&mut self, file: &MetaFile, name: &str, value: &str) {
        self.add(file, RecordKind::Header, [name, value]);
    }
}

impl RecordStore for InMemoryRecordStore {
    fn query(
        &self,
        file: &MetaFile,
        kind: RecordKind,
        arch: Option<&str>,
        owner: Option<u32>,
    ) -> Vec<Record> {
        let Some(records) = self.files.get(file) else {
            return vec![];
        };

        records
            .iter()
            .filter(|(k, _)| *k == kind)
            .filter(|(_, r)| r.owner == owner)
            .filter(|(_, r)| match arch {
                None => true,
                Some(arch) => r.arch.eq_ignore_ascii_case(arch) || r.arch == ARCH_COMMON,
            })
            .map(|(_, r)| r.clone())
            .collect()
    }

    fn contains(&self, file: &MetaFile) -> bool {
        self.files.contains_key(file)
    }
}

#[cfg(test)]
mod test {
    use super::{InMemoryRecordStore, Record, RecordKind, RecordStore};
    use crate::meta_file::MetaFile;
    use pretty_assertions::assert_eq;

    #[test]
    fn query_filters_arch_and_owner() {
        let file = MetaFile::new("Pkg/Pkg.dsc");
        let mut store = InMemoryRecordStore::new();
        store.push(&file, RecordKind::LibraryClass, Record::new(["A", "a.inf"]));
        store.push(
            &file,
            RecordKind::LibraryClass,
            Record::new(["B", "b.inf"]).arch("IA32"),
        );
        store.push(
            &file,
            RecordKind::LibraryClass,
            Record::new(["C", "c.inf"]).owner(7),
        );

        let names = |records: Vec<Record>| -> Vec<String> {
            records.into_iter().map(|r| r.values[0].clone()).collect()
        };

        assert_eq!(
            names(store.query(&file, RecordKind::LibraryClass, Some("X64"), None)),
            vec!["A"]
        );
        assert_eq!(
            names(store.query(&file, RecordKind::LibraryClass, None, None)),
            vec!["A", "B"]
        );
        assert_eq!(
            names(store.query(&file, RecordKind::LibraryClass, Some("X64"), Some(7))),
            vec!["C"]
        );
        assert!(store.query(&file, RecordKind::Header, None, None).is_empty());
    }

    #[test]
    fn empty_descriptor_is_known() {
        let file = MetaFile::new("Pkg/Empty.inf");
        let mut store = InMemoryRecordStore::new();
        assert!(!store.contains(&file));
        store.add_file(&file);
        assert!(store.contains(&file));
        assert!(store.query(&file, RecordKind::Header, None, None).is_empty());
    }
}
