use super::{Fixture, TOKEN_SPACE};
use crate::autogen::WorkspaceAutoGen;
use crate::errors::ErrorCode;
use crate::meta_file::MetaFile;
use crate::pcd_db::Phase;
use crate::record::{PcdModel, RecordKind};
use crate::types::PcdType;
use pretty_assertions::assert_eq;
use std::path::Path;

fn app(f: &mut Fixture) -> MetaFile {
    let app = f.module("TestPkg/App/App.inf", "UEFI_APPLICATION");
    f.component(&app);
    app
}

#[test_log::test]
fn tokens_follow_phase_then_fixed() {
    let mut f = Fixture::new();
    f.declare(PcdModel::Dynamic, "PcdPei", "0x1|UINT32|0x00000001");
    f.declare(PcdModel::Dynamic, "PcdDxe", "0x2|UINT32|0x00000002");
    f.declare(PcdModel::FixedAtBuild, "PcdFixed", "0x3|UINT32|0x00000003");

    let dxe = f.module("TestPkg/App/App.inf", "UEFI_APPLICATION");
    f.use_pcd(&dxe, PcdModel::Dynamic, "PcdDxe");
    f.use_pcd(&dxe, PcdModel::FixedAtBuild, "PcdFixed");
    f.component(&dxe);
    let pei = f.module("TestPkg/Pei/Pei.inf", "PEIM");
    f.depex(&pei, "TRUE");
    f.use_pcd(&pei, PcdModel::Dynamic, "PcdPei");
    f.component(&pei);

    let config = f.config(Path::new("/ws"), &["X64"]).build().unwrap();
    let workspace = WorkspaceAutoGen::new(&f.store, config).unwrap();

    assert_eq!(workspace.token_number("PcdPei", TOKEN_SPACE), Some(1));
    assert_eq!(workspace.token_number("PcdDxe", TOKEN_SPACE), Some(2));
    assert_eq!(workspace.token_number("PcdFixed", TOKEN_SPACE), Some(3));
    assert_eq!(workspace.token_number("PcdNone", TOKEN_SPACE), None);

    let phases: Vec<(&str, Phase)> = workspace
        .dynamic_pcds()
        .iter()
        .map(|d| (d.pcd.name.as_str(), d.phase))
        .collect();
    assert_eq!(phases, vec![("PcdDxe", Phase::Dxe), ("PcdPei", Phase::Pei)]);
    assert_eq!(workspace.non_dynamic_pcds().len(), 1);
}

#[test_log::test]
fn opaque_sizes_are_derived() {
    let mut f = Fixture::new();
    f.declare(PcdModel::FixedAtBuild, "PcdUnicode", "L\"Setup\"|VOID*|0x00000001");
    f.declare(PcdModel::FixedAtBuild, "PcdArray", "{1,2,3}|VOID*|0x00000002");
    f.declare(PcdModel::FixedAtBuild, "PcdAscii", "\"abc\"|VOID*|0x00000003");
    f.declare(PcdModel::FixedAtBuild, "PcdSized", "\"abc\"|VOID*|0x00000004");
    let app = app(&mut f);
    for name in ["PcdUnicode", "PcdArray", "PcdAscii", "PcdSized"] {
        f.use_pcd(&app, PcdModel::FixedAtBuild, name);
    }
    f.set_pcd(PcdModel::FixedAtBuild, "PcdSized", "\"abc\"|VOID*|32");

    let config = f.config(Path::new("/ws"), &["X64"]).build().unwrap();
    let workspace = WorkspaceAutoGen::new(&f.store, config).unwrap();
    let module = workspace.module_autogen(&app, "X64").unwrap().unwrap();

    let sizes: Vec<(&str, Option<&str>)> = module
        .module_pcds
        .iter()
        .map(|p| (p.name.as_str(), p.max_datum_size.as_deref()))
        .collect();
    assert_eq!(
        sizes,
        vec![
            ("PcdUnicode", Some("16")),
            ("PcdArray", Some("3")),
            ("PcdAscii", Some("5")),
            ("PcdSized", Some("32")),
        ]
    );
}

#[test_log::test]
fn component_setting_overrides_platform() {
    let mut f = Fixture::new();
    f.declare(PcdModel::FixedAtBuild, "PcdValue", "0x1|UINT8|0x00000001");
    let first = f.module("TestPkg/First/First.inf", "UEFI_APPLICATION");
    let second = f.module("TestPkg/Second/Second.inf", "UEFI_APPLICATION");
    f.use_pcd(&first, PcdModel::FixedAtBuild, "PcdValue");
    f.use_pcd(&second, PcdModel::FixedAtBuild, "PcdValue");
    f.component(&first);
    let id = f.component(&second);
    f.set_pcd(PcdModel::FixedAtBuild, "PcdValue", "0x7");
    f.set_component_pcd(id, PcdModel::FixedAtBuild, "PcdValue", "0x9");

    let config = f.config(Path::new("/ws"), &["X64"]).build().unwrap();
    let workspace = WorkspaceAutoGen::new(&f.store, config).unwrap();

    let value = |inf: &MetaFile| {
        let module = workspace.module_autogen(inf, "X64").unwrap().unwrap();
        let pcd = &module.module_pcds[0];
        (pcd.default_value.clone(), pcd.inf_default_value.clone())
    };
    assert_eq!(value(&first), ("0x7".to_string(), String::new()));
    assert_eq!(value(&second), ("0x9".to_string(), String::new()));
}

#[test_log::test]
fn out_of_range_platform_value() {
    let mut f = Fixture::new();
    f.declare(PcdModel::FixedAtBuild, "PcdValue", "0x1|UINT8|0x00000001");
    let app = app(&mut f);
    f.use_pcd(&app, PcdModel::FixedAtBuild, "PcdValue");
    f.set_pcd(PcdModel::FixedAtBuild, "PcdValue", "0x100");

    let config = f.config(Path::new("/ws"), &["X64"]).build().unwrap();
    let err = WorkspaceAutoGen::new(&f.store, config).err().unwrap();
    assert_eq!(err.code(), ErrorCode::FormatInvalid);
}

#[test_log::test]
fn hii_variable_guid_is_resolved() {
    let mut f = Fixture::new();
    f.declare(PcdModel::Dynamic, "PcdHii", "0x0|UINT8|0x00000001");
    let app = app(&mut f);
    f.use_pcd(&app, PcdModel::Dynamic, "PcdHii");
    f.set_pcd(PcdModel::DynamicHii, "PcdHii", "L\"Setup\"|gTestVariableGuid|0x10|0x1");

    let config = f.config(Path::new("/ws"), &["X64"]).build().unwrap();
    let workspace = WorkspaceAutoGen::new(&f.store, config).unwrap();
    let module = workspace.module_autogen(&app, "X64").unwrap().unwrap();

    let pcd = &module.module_pcds[0];
    assert_eq!(pcd.pcd_type, Some(PcdType::DynamicHii));
    let sku = &pcd.sku_info["DEFAULT"];
    assert_eq!(sku.variable_name, "L\"Setup\"");
    assert_eq!(sku.variable_offset, "0x10");
    assert_eq!(sku.variable_guid_value, "{0x7e57, 0x4, 0x5, {0x6}}");
}

#[test_log::test]
fn hii_variable_guid_from_another_component_package() {
    let mut f = Fixture::new();
    let other = MetaFile::new("OtherPkg/OtherPkg.dec");
    f.store.define(&other, "PACKAGE_NAME", "OtherPkg");
    f.store.define(&other, "PACKAGE_GUID", "5B0E2C71-3D8A-4F16-A942-7C1E0D6B3F25");
    f.store
        .add(&other, RecordKind::Guid, ["gOtherVariableGuid", "{0x0e7e, 0x7, 0x8, {0x9}}"]);

    f.declare(PcdModel::Dynamic, "PcdHii", "0x0|UINT8|0x00000001");
    let app = app(&mut f);
    f.use_pcd(&app, PcdModel::Dynamic, "PcdHii");
    let app2 = f.module("OtherPkg/App2/App2.inf", "UEFI_APPLICATION");
    f.store.add(&app2, RecordKind::Package, [other.path()]);
    f.component(&app2);
    f.set_pcd(PcdModel::DynamicHii, "PcdHii", "L\"Setup\"|gOtherVariableGuid|0x10|0x1");

    let config = f.config(Path::new("/ws"), &["X64"]).build().unwrap();
    let workspace = WorkspaceAutoGen::new(&f.store, config).unwrap();
    let module = workspace.module_autogen(&app, "X64").unwrap().unwrap();
    let sku = &module.module_pcds[0].sku_info["DEFAULT"];
    assert_eq!(sku.variable_guid_value, "{0x0e7e, 0x7, 0x8, {0x9}}");
    assert!(module.derived_packages.iter().all(|p| p.name != "OtherPkg"));
}

#[test_log::test]
fn hii_variable_guid_must_be_declared() {
    let mut f = Fixture::new();
    f.declare(PcdModel::Dynamic, "PcdHii", "0x0|UINT8|0x00000001");
    let app = app(&mut f);
    f.use_pcd(&app, PcdModel::Dynamic, "PcdHii");
    f.set_pcd(PcdModel::DynamicHii, "PcdHii", "L\"Setup\"|gNowhereGuid|0x10|0x1");

    let config = f.config(Path::new("/ws"), &["X64"]).build().unwrap();
    let err = WorkspaceAutoGen::new(&f.store, config).err().unwrap();
    assert_eq!(err.code(), ErrorCode::ResourceNotAvailable);
}

#[test_log::test]
fn shared_token_value() {
    let mut f = Fixture::new();
    f.declare(PcdModel::FixedAtBuild, "PcdA", "0x0|UINT8|0x00000001");
    f.declare(PcdModel::FixedAtBuild, "PcdB", "0x0|UINT8|1");
    app(&mut f);

    let config = f.config(Path::new("/ws"), &["X64"]).build().unwrap();
    let err = WorkspaceAutoGen::new(&f.store, config).err().unwrap();
    assert_eq!(err.code(), ErrorCode::FormatInvalid);
    assert!(err.to_string().contains("is conflict with"));
}

#[test_log::test]
fn one_pcd_two_token_values() {
    let mut f = Fixture::new();
    f.declare(PcdModel::Dynamic, "PcdA", "0x0|UINT8|0x00000001");
    f.declare(PcdModel::DynamicEx, "PcdA", "0x0|UINT8|0x00000002");
    app(&mut f);

    let config = f.config(Path::new("/ws"), &["X64"]).build().unwrap();
    let err = WorkspaceAutoGen::new(&f.store, config).err().unwrap();
    assert_eq!(err.code(), ErrorCode::FormatInvalid);
    assert!(err.to_string().contains("defined in two places"));
}

#[test_log::test]
fn platform_type_must_match_declaration() {
    let mut f = Fixture::new();
    f.declare(PcdModel::Dynamic, "PcdA", "0x0|UINT8|0x00000001");
    app(&mut f);
    f.set_pcd(PcdModel::FixedAtBuild, "PcdA", "0x1");

    let config = f.config(Path::new("/ws"), &["X64"]).build().unwrap();
    let err = WorkspaceAutoGen::new(&f.store, config).err().unwrap();
    assert_eq!(err.code(), ErrorCode::FormatInvalid);
}

#[test_log::test]
fn undeclared_platform_setting_only_warns() {
    let mut f = Fixture::new();
    app(&mut f);
    f.set_pcd(PcdModel::FixedAtBuild, "PcdGhost", "0x1");

    let config = f.config(Path::new("/ws"), &["X64"]).build().unwrap();
    assert!(WorkspaceAutoGen::new(&f.store, config).is_ok());
}
