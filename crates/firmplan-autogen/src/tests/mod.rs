mod build_options;
mod pcds;

use crate::config::{BuildConfigBuilder, ToolsDef};
use crate::meta_file::MetaFile;
use crate::record::{InMemoryRecordStore, PcdModel, Record, RecordKind};
use std::path::Path;

pub(crate) const TOKEN_SPACE: &str = "gTestTokenSpaceGuid";
pub(crate) const TEST_PROTOCOL: &str = "{0x5a1f9bd2, 0x1c3e, 0x4a7b, {0x9f, 0x01, 0x2d, 0x44, 0x6e, 0x80, 0x11, 0x3a}}";
pub(crate) const LIB_PROTOCOL: &str = "{0x8e3b0c77, 0x2d10, 0x4f5c, {0xa3, 0x5e, 0x71, 0x09, 0xcc, 0x42, 0x18, 0xd6}}";
pub(crate) const VPD_TOOL_GUID: &str = "8C3D856A-9BE6-468E-850A-24F7A8D38E08";

pub(crate) const TOOLS: &str = "
*_GCC5_*_*_FAMILY    = GCC
*_GCC5_*_*_BUILDRULEFAMILY = GCC
*_GCC5_X64_CC_PATH   = gcc
*_GCC5_X64_CC_FLAGS  = -Os
*_GCC5_IA32_CC_PATH  = gcc
*_GCC5_IA32_CC_FLAGS = -m32
*_GCC5_*_MAKE_PATH   = make
*_*_*_VPDTOOL_GUID   = 8C3D856A-9BE6-468E-850A-24F7A8D38E08
*_*_*_VPDTOOL_PATH   = BPDG
";

/// A platform `TestPkg/TestPkg.dsc` with one package `TestPkg/TestPkg.dec`, grown by each test.
pub(crate) struct Fixture {
    pub store: InMemoryRecordStore,
    pub dsc: MetaFile,
    pub dec: MetaFile,
    modules: u32,
}

impl Fixture {
    pub fn new() -> Self {
        let dsc = MetaFile::new("TestPkg/TestPkg.dsc");
        let dec = MetaFile::new("TestPkg/TestPkg.dec");
        let mut store = InMemoryRecordStore::new();

        store.define(&dsc, "PLATFORM_NAME", "TestPkg");
        store.define(&dsc, "PLATFORM_GUID", "E2A4D7C1-0B9F-4E55-8B32-7F0C6A1D9E44");
        store.define(&dsc, "PLATFORM_VERSION", "0.1");
        store.define(&dsc, "OUTPUT_DIRECTORY", "Build/TestPkg");
        store.define(&dsc, "SUPPORTED_ARCHITECTURES", "IA32|X64");

        store.define(&dec, "PACKAGE_NAME", "TestPkg");
        store.define(&dec, "PACKAGE_GUID", "0D3C7E1B-66A2-4F83-9C58-2B4E17A0F6D9");
        store.add(&dec, RecordKind::Include, ["Include"]);
        store.add(&dec, RecordKind::Guid, [TOKEN_SPACE, "{0x2a7c, 0x1, 0x2, {0x3}}"]);
        store.add(&dec, RecordKind::Guid, ["gTestVariableGuid", "{0x7e57, 0x4, 0x5, {0x6}}"]);
        store.add(&dec, RecordKind::Protocol, ["gTestProtocolGuid", TEST_PROTOCOL]);
        store.add(&dec, RecordKind::Protocol, ["gLibProtocolGuid", LIB_PROTOCOL]);

        Fixture {
            store,
            dsc,
            dec,
            modules: 0,
        }
    }

    pub fn module(&mut self, path: &str, module_type: &str) -> MetaFile {
        let inf = MetaFile::new(path);
        self.modules += 1;
        let guid = format!("{:08X}-1111-2222-3333-444444444444", self.modules);
        self.store.define(&inf, "INF_VERSION", "0x00010005");
        self.store.define(&inf, "BASE_NAME", inf.base_name());
        self.store.define(&inf, "FILE_GUID", &guid);
        self.store.define(&inf, "MODULE_TYPE", module_type);
        self.store.add(&inf, RecordKind::Package, [self.dec.path()]);
        inf
    }

    /// A BASE library instance declaring `LIBRARY_CLASS = class`.
    pub fn library(&mut self, path: &str, class: &str, constructor: bool) -> MetaFile {
        let inf = self.module(path, "BASE");
        self.store.define(&inf, "LIBRARY_CLASS", class);
        if constructor {
            let name = format!("{}Constructor", inf.base_name());
            self.store.define(&inf, "CONSTRUCTOR", &name);
        }
        inf
    }

    pub fn uses(&mut self, inf: &MetaFile, class: &str) {
        self.store.add(inf, RecordKind::LibraryClass, [class]);
    }

    pub fn depex(&mut self, inf: &MetaFile, expression: &str) {
        self.store.add(inf, RecordKind::Depex, [expression]);
    }

    pub fn source(&mut self, inf: &MetaFile, file: &str) {
        self.store.add(inf, RecordKind::SourceFile, [file, "", "", ""]);
    }

    pub fn bind(&mut self, class: &str, instance: &MetaFile) {
        self.store
            .add(&self.dsc, RecordKind::LibraryClass, [class, instance.path()]);
    }

    pub fn component(&mut self, inf: &MetaFile) -> u32 {
        self.store.add(&self.dsc, RecordKind::Component, [inf.path()])
    }

    pub fn declare(&mut self, model: PcdModel, name: &str, setting: &str) {
        self.store
            .add(&self.dec, RecordKind::Pcd(model), [TOKEN_SPACE, name, setting]);
    }

    pub fn use_pcd(&mut self, inf: &MetaFile, model: PcdModel, name: &str) {
        self.store
            .add(inf, RecordKind::Pcd(model), [TOKEN_SPACE, name, ""]);
    }

    pub fn set_pcd(&mut self, model: PcdModel, name: &str, setting: &str) {
        self.store
            .add(&self.dsc, RecordKind::Pcd(model), [TOKEN_SPACE, name, setting]);
    }

    pub fn set_component_pcd(&mut self, component: u32, model: PcdModel, name: &str, setting: &str) {
        self.store.push(
            &self.dsc,
            RecordKind::Pcd(model),
            Record::new([TOKEN_SPACE, name, setting]).owner(component),
        );
    }

    pub fn config(&self, workspace: &Path, arches: &[&str]) -> BuildConfigBuilder {
        let mut builder = BuildConfigBuilder::default();
        builder
            .workspace_dir(workspace)
            .active_platform(self.dsc.clone())
            .target("DEBUG")
            .toolchain("GCC5")
            .arch_list(arches.iter().map(|a| a.to_string()).collect::<Vec<_>>())
            .tools_def(ToolsDef::parse_str(TOOLS).unwrap());
        builder
    }
}
