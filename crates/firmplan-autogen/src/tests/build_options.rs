use super::Fixture;
use crate::autogen::WorkspaceAutoGen;
use crate::record::{Record, RecordKind};
use pretty_assertions::assert_eq;
use std::path::Path;

fn platform_option(f: &mut Fixture, family: &str, key: &str, value: &str) {
    f.store.add(&f.dsc, RecordKind::BuildOption, [family, key, value]);
}

#[test_log::test]
fn family_and_arch_select_options() {
    let mut f = Fixture::new();
    let app = f.module("TestPkg/App/App.inf", "UEFI_APPLICATION");
    f.component(&app);
    platform_option(&mut f, "GCC", "*_*_*_CC_FLAGS", "-DMODERN");
    platform_option(&mut f, "MSFT", "*_*_*_CC_FLAGS", "/Od");
    platform_option(&mut f, "GCC", "RELEASE_*_*_CC_FLAGS", "-DNDEBUG");

    let config = f.config(Path::new("/ws"), &["IA32", "X64"]).build().unwrap();
    let workspace = WorkspaceAutoGen::new(&f.store, config).unwrap();

    let flags = |arch: &str| {
        let module = workspace.module_autogen(&app, arch).unwrap().unwrap();
        module.build_options["CC"]["FLAGS"].clone()
    };
    assert_eq!(flags("IA32"), "-m32 -DMODERN");
    assert_eq!(flags("X64"), "-Os -DMODERN");
}

#[test_log::test]
fn more_specific_override_shadows_the_other() {
    let mut f = Fixture::new();
    let app = f.module("TestPkg/App/App.inf", "UEFI_APPLICATION");
    f.component(&app);
    platform_option(&mut f, "GCC", "DEBUG_*_*_CC_FLAGS", "=-O0");
    platform_option(&mut f, "GCC", "*_*_*_CC_FLAGS", "=-O1");

    let config = f.config(Path::new("/ws"), &["X64"]).build().unwrap();
    let workspace = WorkspaceAutoGen::new(&f.store, config).unwrap();
    let module = workspace.module_autogen(&app, "X64").unwrap().unwrap();
    assert_eq!(module.build_options["CC"]["FLAGS"], "-O0");
}

#[test_log::test]
fn component_replaces_what_came_before() {
    let mut f = Fixture::new();
    let app = f.module("TestPkg/App/App.inf", "UEFI_APPLICATION");
    f.store
        .add(&app, RecordKind::BuildOption, ["GCC", "*_*_*_CC_FLAGS", "-DMODULE"]);
    let id = f.component(&app);
    platform_option(&mut f, "GCC", "*_*_*_CC_FLAGS", "-DPLATFORM");
    f.store.push(
        &f.dsc,
        RecordKind::BuildOption,
        Record::new(["GCC", "*_*_*_CC_FLAGS", "=-DONLY"]).owner(id),
    );

    let config = f.config(Path::new("/ws"), &["X64"]).build().unwrap();
    let workspace = WorkspaceAutoGen::new(&f.store, config).unwrap();
    let module = workspace.module_autogen(&app, "X64").unwrap().unwrap();
    assert_eq!(module.build_options["CC"]["FLAGS"], "-DONLY");
    assert_eq!(module.build_options["CC"]["PATH"], "gcc");
}

#[test_log::test]
fn legacy_modules_get_their_own_options() {
    let mut f = Fixture::new();
    let app = f.module("TestPkg/App/App.inf", "UEFI_APPLICATION");
    let legacy = f.module("TestPkg/Legacy/Legacy.inf", "UEFI_APPLICATION");
    f.store.define(&legacy, "INF_VERSION", "0x00010000");
    f.store.define(&legacy, "COMPONENT_TYPE", "APPLICATION");
    f.component(&app);
    f.component(&legacy);
    platform_option(&mut f, "GCC", "*_*_*_CC_FLAGS", "-DMODERN");
    f.store.push(
        &f.dsc,
        RecordKind::BuildOption,
        Record::new(["GCC", "*_*_*_CC_FLAGS", "-DLEGACY"]).scope("EDK"),
    );

    let config = f
        .config(Path::new("/ws"), &["X64"])
        .uni_flag("-c".to_string())
        .build()
        .unwrap();
    let workspace = WorkspaceAutoGen::new(&f.store, config).unwrap();

    let modern = workspace.module_autogen(&app, "X64").unwrap().unwrap();
    assert_eq!(modern.build_options["CC"]["FLAGS"], "-Os -DMODERN");
    assert!(!modern.build_options.contains_key("BUILD"));

    let old = workspace.module_autogen(&legacy, "X64").unwrap().unwrap();
    assert!(old.module.is_legacy());
    assert_eq!(old.build_options["CC"]["FLAGS"], "-Os -DLEGACY");
    assert_eq!(old.build_options["BUILD"]["FLAGS"], "-c");
}

#[test_log::test]
fn tool_definition_fragment() {
    let mut f = Fixture::new();
    let app = f.module("TestPkg/App/App.inf", "UEFI_APPLICATION");
    f.component(&app);
    platform_option(&mut f, "GCC", "*_*_*_CC_FLAGS", "-Wall");

    let config = f.config(Path::new("/ws"), &["X64"]).build().unwrap();
    let workspace = WorkspaceAutoGen::new(&f.store, config).unwrap();
    let platform = workspace.platform_autogen("X64").unwrap();

    let text = platform.tool_def_text();
    assert!(text.contains("CC = gcc\nCC_FLAGS = -Os -Wall\n"));
    assert!(!text.contains("MAKE"));
    assert_eq!(
        platform.tool_def_file(),
        Path::new("/ws/Build/TestPkg/DEBUG_GCC5/X64/TOOLS_DEF.X64")
    );
}
