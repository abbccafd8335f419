//! Merging of a module's PCDs with the settings its platform gives them.
use crate::errors::{AutoGenError, AutoGenResult};
use crate::meta_file::MetaFile;
use crate::package::PackageData;
use crate::pcd::{check_datum, derive_max_datum_size, Pcd, PcdId, SkuInfo};
use crate::platform::PlatformData;
use crate::types::{DatumType, PcdType, SKU_DEFAULT};
use indexmap::IndexMap;
use itertools::Itertools;
use std::rc::Rc;
use tracing::{debug, trace};

/// Refine `to` with whatever `from` sets.
///
/// Fields are replaced one at a time, only where `from` carries a value, so applying the same
/// override twice gives the same item as applying it once.
pub fn override_pcd(
    platform: &PlatformData,
    to: &mut Pcd,
    from: Option<&Pcd>,
    module: &MetaFile,
) -> AutoGenResult<()> {
    if let Some(from) = from {
        match (to.pcd_type, from.pcd_type) {
            (_, None) => {}
            (None, Some(ty)) => to.pcd_type = Some(ty),
            (Some(_), Some(ty)) if to.pending => to.pcd_type = Some(ty),
            (Some(mine), Some(theirs)) if mine != theirs => {
                if theirs.as_str().contains(mine.as_str()) {
                    // Only DynamicEx narrows to its HII/VPD/Default flavour; other contained
                    // names keep the module's type
                    if mine == PcdType::DynamicEx {
                        to.pcd_type = Some(theirs);
                    }
                } else {
                    return Err(AutoGenError::option_conflict("Mismatched PCD type")
                        .in_file(&platform.meta_file)
                        .with_extra(format!(
                            "{}.{} is defined as [{}] in module {}, but as [{}] in platform.",
                            to.token_space, to.name, mine, module, theirs
                        )));
                }
            }
            _ => {}
        }

        if let Some(size) = from.max_datum_size.as_ref().filter(|s| !s.is_empty()) {
            to.max_datum_size = Some(size.clone());
        }
        if !from.default_value.is_empty() {
            to.default_value = from.default_value.clone();
        }
        if !from.token_value.is_empty() {
            to.token_value = from.token_value.clone();
        }
        if from.datum_type.is_some() {
            to.datum_type = from.datum_type;
        }
        if !from.sku_info.is_empty() {
            to.sku_info = from.sku_info.clone();
        }

        if let Some(datum_type) = to.datum_type {
            check_datum(datum_type, &to.default_value).map_err(|cause| {
                AutoGenError::format_invalid(cause)
                    .in_file(&platform.meta_file)
                    .with_extra(to.full_name())
            })?;
        }
    }

    if to.datum_type == Some(DatumType::Void) && to.max_datum_size.as_deref().unwrap_or("").is_empty() {
        debug!("No MaxDatumSize specified for PCD {}", to.full_name());
        to.max_datum_size = Some(derive_max_datum_size(&to.default_value).to_string());
    }

    if to.is_dynamic() && to.sku_info.is_empty() {
        let sku_name = if platform.sku_ids.contains_key(&platform.sku_name) {
            platform.sku_name.as_str()
        } else {
            SKU_DEFAULT
        };
        let sku_id = platform.sku_ids.get(sku_name).map(String::as_str).unwrap_or("0");
        to.sku_info.insert(
            sku_name.to_string(),
            SkuInfo::with_default(sku_name, sku_id, &to.default_value),
        );
    }

    Ok(())
}

/// Final PCD list for `module`: each item merged with the platform-wide setting, then with the
/// setting the platform gives this component alone.
pub fn apply_pcd_setting(
    platform: &PlatformData,
    module: &MetaFile,
    mut pcds: IndexMap<PcdId, Pcd>,
    packages: &[Rc<PackageData>],
) -> AutoGenResult<Vec<Pcd>> {
    for (id, pcd) in pcds.iter_mut() {
        override_pcd(platform, pcd, platform.pcds.get(id), module)?;

        for sku in pcd.sku_info.values_mut() {
            if sku.variable_guid.is_empty() {
                continue;
            }
            sku.variable_guid_value = packages
                .iter()
                .find_map(|p| p.guid_value(&sku.variable_guid))
                .map(String::from)
                .ok_or_else(|| {
                    AutoGenError::resource_not_available(format!(
                        "Value of GUID [{}] is not found in",
                        sku.variable_guid
                    ))
                    .in_file(&platform.meta_file)
                    .with_extra(format!(
                        "{}\n\t(used with {}.{} from module {})",
                        packages.iter().map(|p| p.meta_file.to_string()).join("\n\t"),
                        id.1,
                        id.0,
                        module
                    ))
                })?;
        }
    }

    if let Some(component) = platform.modules.get(module) {
        for (id, setting) in &component.pcds {
            if let Some(pcd) = pcds.get_mut(id) {
                trace!(pcd = %pcd.full_name(), %module, "applying component override");
                override_pcd(platform, pcd, Some(setting), module)?;
            }
        }
    }

    Ok(pcds.into_values().collect())
}

#[cfg(test)]
mod test {
    use super::override_pcd;
    use crate::autogen::WorkspaceAutoGen;
    use crate::pcd::PcdId;
    use crate::record::PcdModel;
    use crate::tests::{Fixture, TOKEN_SPACE};
    use crate::types::PcdType;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    #[test_log::test]
    fn applying_a_setting_twice_changes_nothing() {
        let mut f = Fixture::new();
        f.declare(PcdModel::DynamicEx, "PcdHiiEx", "0x0|UINT8|0x00000001");
        f.declare(PcdModel::FixedAtBuild, "PcdName", "L\"\"|VOID*|0x00000002");
        let app = f.module("TestPkg/App/App.inf", "UEFI_APPLICATION");
        f.use_pcd(&app, PcdModel::DynamicEx, "PcdHiiEx");
        f.use_pcd(&app, PcdModel::FixedAtBuild, "PcdName");
        f.component(&app);
        f.set_pcd(PcdModel::DynamicExHii, "PcdHiiEx", "L\"Setup\"|gTestVariableGuid|0x10|0x1");
        f.set_pcd(PcdModel::FixedAtBuild, "PcdName", "L\"abc\"");

        let config = f.config(Path::new("/ws"), &["X64"]).build().unwrap();
        let workspace = WorkspaceAutoGen::new(&f.store, config).unwrap();
        let platform = workspace.platform_autogen("X64").unwrap().platform.clone();
        let module = workspace.module_autogen(&app, "X64").unwrap().unwrap();

        for name in ["PcdHiiEx", "PcdName"] {
            let id: PcdId = (name.to_string(), TOKEN_SPACE.to_string());
            let setting = platform.pcds.get(&id);
            let mut once = module.module.pcds[&id].clone();
            override_pcd(&platform, &mut once, setting, &app).unwrap();
            let mut twice = once.clone();
            override_pcd(&platform, &mut twice, setting, &app).unwrap();
            assert_eq!(twice, once);
        }

        let id: PcdId = ("PcdHiiEx".to_string(), TOKEN_SPACE.to_string());
        let mut narrowed = module.module.pcds[&id].clone();
        override_pcd(&platform, &mut narrowed, platform.pcds.get(&id), &app).unwrap();
        assert_eq!(narrowed.pcd_type, Some(PcdType::DynamicExHii));
    }
}
