use firmplan_autogen::record::PcdModel;
use firmplan_autogen::{
    BuildConfigBuilder, ErrorCode, InMemoryRecordStore, MetaFile, Record, RecordKind, ToolsDef,
    WorkspaceAutoGen,
};
use maplit::hashmap;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::path::PathBuf;

const SPACE: &str = "gDemoTokenSpaceGuid";

struct Demo {
    store: InMemoryRecordStore,
    dsc: MetaFile,
    dec: MetaFile,
}

impl Demo {
    fn new() -> Self {
        let dsc = MetaFile::new("DemoPkg/DemoPkg.dsc");
        let dec = MetaFile::new("DemoPkg/DemoPkg.dec");
        let mut store = InMemoryRecordStore::new();
        store.define(&dsc, "PLATFORM_NAME", "Demo");
        store.define(&dsc, "PLATFORM_GUID", "6E9E4F32-5A8B-4C17-9D0E-3B21C7F4A850");
        store.define(&dsc, "OUTPUT_DIRECTORY", "Build/Demo");
        store.define(&dec, "PACKAGE_NAME", "DemoPkg");
        store.define(&dec, "PACKAGE_GUID", "1F0B6C2A-77D3-4E9B-8A51-0C6E2D9F3B47");
        store.add(&dec, RecordKind::Include, ["Include"]);
        store.add(&dec, RecordKind::Guid, [SPACE, "{0x1, 0x2, 0x3, {0x4}}"]);
        store.add(
            &dec,
            RecordKind::Pcd(PcdModel::FixedAtBuild),
            [SPACE, "PcdDebugLevel", "0x1|UINT32|0x00000001"],
        );
        store.add(
            &dec,
            RecordKind::Pcd(PcdModel::Dynamic),
            [SPACE, "PcdBootMode", "0x0|UINT8|0x00000002"],
        );
        Demo { store, dsc, dec }
    }

    fn inf(&mut self, path: &str, module_type: &str, guid: &str) -> MetaFile {
        let inf = MetaFile::new(path);
        self.store.define(&inf, "INF_VERSION", "0x00010017");
        self.store.define(&inf, "BASE_NAME", inf.base_name());
        self.store.define(&inf, "FILE_GUID", guid);
        self.store.define(&inf, "MODULE_TYPE", module_type);
        self.store.add(&inf, RecordKind::Package, [self.dec.path()]);
        let source = format!("{}.c", inf.base_name());
        self.store
            .add(&inf, RecordKind::SourceFile, [source.as_str(), "", "", ""]);
        inf
    }
}

fn tools() -> ToolsDef {
    let mut tools = ToolsDef::new();
    tools.insert("*_GCC5_*_*_FAMILY", "GCC");
    tools.insert("*_GCC5_*_CC_PATH", "gcc");
    tools.insert("*_GCC5_*_MAKE_PATH", "make");
    tools
}

#[test_log::test]
fn two_arch_build() {
    let mut demo = Demo::new();
    let debug_lib = demo.inf(
        "DemoPkg/Library/DebugLib/DebugLib.inf",
        "BASE",
        "0C3F1E8A-9B24-4D6C-A7E5-2F8D1B0C6A93",
    );
    demo.store.define(&debug_lib, "LIBRARY_CLASS", "DebugLib");
    demo.store.add(
        &debug_lib,
        RecordKind::Pcd(PcdModel::FixedAtBuild),
        [SPACE, "PcdDebugLevel", ""],
    );

    let shell = demo.inf(
        "DemoPkg/Shell/Shell.inf",
        "UEFI_APPLICATION",
        "8D4B2E6F-1A3C-4F5E-B7D9-0E2C4A6B8D1F",
    );
    demo.store.add(&shell, RecordKind::LibraryClass, ["DebugLib"]);
    demo.store.add(&shell, RecordKind::Pcd(PcdModel::Dynamic), [SPACE, "PcdBootMode", ""]);

    let dsc = demo.dsc.clone();
    demo.store.add(&dsc, RecordKind::LibraryClass, ["DebugLib", debug_lib.path()]);
    demo.store.add(&dsc, RecordKind::Component, [shell.path()]);
    demo.store.push(
        &dsc,
        RecordKind::Pcd(PcdModel::FixedAtBuild),
        Record::new([SPACE, "PcdDebugLevel", "0x2F"]).arch("X64"),
    );

    let config = BuildConfigBuilder::default()
        .workspace_dir("/work")
        .active_platform(dsc)
        .target("RELEASE")
        .toolchain("GCC5")
        .arch_list(vec!["IA32".to_string(), "X64".to_string()])
        .tools_def(tools())
        .build()
        .unwrap();
    let workspace = WorkspaceAutoGen::new(&demo.store, config).unwrap();

    assert_eq!(workspace.name(), "Demo");
    assert_eq!(
        workspace.build_dir(),
        Some(&PathBuf::from("/work/Build/Demo/RELEASE_GCC5"))
    );
    assert_eq!(workspace.platforms().len(), 2);

    let levels: HashMap<String, String> = ["IA32", "X64"]
        .into_iter()
        .map(|arch| {
            let libraries = workspace.library_autogens(arch).unwrap();
            assert_eq!(libraries.len(), 1);
            let shell = &workspace.module_autogens(arch).unwrap()[0];
            let level = shell
                .pcds()
                .find(|p| p.name == "PcdDebugLevel")
                .map(|p| p.default_value.clone())
                .unwrap();
            (arch.to_string(), level)
        })
        .collect();
    assert_eq!(
        levels,
        hashmap! {
            "IA32".to_string() => "0x1".to_string(),
            "X64".to_string() => "0x2F".to_string(),
        }
    );

    let packages = workspace.package_list("X64").unwrap();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].name, "DemoPkg");

    assert_eq!(workspace.token_number("PcdBootMode", SPACE), Some(1));
    assert_eq!(workspace.token_number("PcdDebugLevel", SPACE), Some(2));
}

#[test_log::test]
fn unsupported_module_type_is_reported() {
    let mut demo = Demo::new();
    let bogus = demo.inf(
        "DemoPkg/Bogus/Bogus.inf",
        "SMM_DRIVER",
        "3A5C7E9B-2D4F-4618-8B0A-C1E3F5A7B9D2",
    );
    let dsc = demo.dsc.clone();
    demo.store.add(&dsc, RecordKind::Component, [bogus.path()]);

    let config = BuildConfigBuilder::default()
        .workspace_dir("/work")
        .active_platform(dsc)
        .target("DEBUG")
        .toolchain("GCC5")
        .arch_list(vec!["X64".to_string()])
        .tools_def(tools())
        .build()
        .unwrap();
    let err = WorkspaceAutoGen::new(&demo.store, config).err().unwrap();
    assert_eq!(err.code(), ErrorCode::FormatNotSupported);
    assert!(err.to_string().contains("SMM_DRIVER"));
}
