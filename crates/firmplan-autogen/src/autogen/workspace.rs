use super::{AutoGenCache, AutoGenKey, AutoGenKind, ModuleAutoGen, PlatformAutoGen};
use crate::config::BuildConfig;
use crate::database::BuildDatabase;
use crate::library::linked_libraries;
use crate::errors::{AutoGenError, AutoGenResult};
use crate::meta_file::MetaFile;
use crate::package::PackageData;
use crate::pcd::{check_token_value, Pcd, PcdId};
use crate::pcd_db::{DynamicPcd, PcdCollector};
use crate::platform::PlatformData;
use crate::record::RecordStore;
use crate::types::{DatumType, PcdType};
use crate::vpd::{OffsetFixupTool, ProcessFixupTool, VpdInfoFile, AUTO_OFFSET};
use firmplan_util::index_map::group_ordered;
use indexmap::IndexMap;
use itertools::Itertools;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{debug, info, warn};

const BPDG_NOT_FOUND: &str = "Fail to find third-party BPDG tool to process VPD PCDs. BPDG Guid tool need to be defined in tools_def.txt and VPD_TOOL_GUID need to be provided in DSC file.";

/// One build of the active platform for every requested arch.
///
/// Creating it resolves every platform, module and library context, collects the platform's
/// PCDs, stages VPD items and allocates token numbers. Contexts are cached and can be fetched
/// afterwards.
pub struct WorkspaceAutoGen<'s> {
    config: BuildConfig,
    db: BuildDatabase<'s>,
    cache: AutoGenCache,
    platforms: Vec<Rc<PlatformAutoGen>>,
    dynamic_pcds: Vec<DynamicPcd>,
    non_dynamic_pcds: Vec<Pcd>,
    token_numbers: IndexMap<PcdId, u32>,
}

impl<'s> WorkspaceAutoGen<'s> {
    pub fn new(store: &'s dyn RecordStore, config: BuildConfig) -> AutoGenResult<Self> {
        Self::with_fixup_tool(store, config, &ProcessFixupTool)
    }

    pub fn with_fixup_tool(
        store: &'s dyn RecordStore,
        config: BuildConfig,
        tool: &dyn OffsetFixupTool,
    ) -> AutoGenResult<Self> {
        info!(platform = %config.active_platform, target = %config.target, toolchain = %config.toolchain, arches = ?config.arch_list, "workspace autogen");

        let mut workspace = WorkspaceAutoGen {
            config,
            db: BuildDatabase::new(store),
            cache: AutoGenCache::new(),
            platforms: vec![],
            dynamic_pcds: vec![],
            non_dynamic_pcds: vec![],
            token_numbers: IndexMap::new(),
        };

        let mut collector = PcdCollector::new();
        let mut platforms = vec![];
        for (index, arch) in workspace.config.arch_list.iter().enumerate() {
            let platform = workspace.platform_autogen(arch)?;
            for file in platform.platform.modules.keys() {
                let module = workspace.module_in(&platform, file)?;
                collector.collect(file, module.module_type(), module.pcds());
            }
            collector.check(platform.meta_file())?;

            if index + 1 == workspace.config.arch_list.len() {
                workspace.stage_vpd_pcds(&platform, &mut collector, tool)?;
                collector.order_for_layout();
            }
            platforms.push(platform);
        }
        workspace.platforms = platforms;

        workspace.check_token_value_conflicts()?;
        workspace.check_pcd_types()?;

        workspace.token_numbers = collector.token_numbers();
        workspace.dynamic_pcds = collector.dynamic().to_vec();
        workspace.non_dynamic_pcds = collector.non_dynamic().to_vec();
        Ok(workspace)
    }

    pub(crate) fn database(&self) -> &BuildDatabase<'s> {
        &self.db
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    fn key(&self, kind: AutoGenKind, arch: &str, file: &MetaFile) -> AutoGenKey {
        AutoGenKey::new(kind, &self.config.target, &self.config.toolchain, arch, file)
    }

    /// Platform context for `arch`, with the flash layout's PCD values merged in.
    pub fn platform_autogen(&self, arch: &str) -> AutoGenResult<Rc<PlatformAutoGen>> {
        let file = &self.config.active_platform;
        self.cache.platform(self.key(AutoGenKind::Platform, arch, file), || {
            let mut platform = self.db.platform(file, arch, self.config.sku_id.as_deref())?;
            if !self.config.flash_pcds.is_empty() {
                let mut with_flash = PlatformData::clone(&platform);
                for ((name, space), value) in &self.config.flash_pcds {
                    with_flash.add_pcd(name, space, value);
                }
                platform = Rc::new(with_flash);
            }
            PlatformAutoGen::new(&self.config, platform)
        })
    }

    fn module_in(&self, platform: &PlatformAutoGen, file: &MetaFile) -> AutoGenResult<Rc<ModuleAutoGen>> {
        self.cache.module(self.key(AutoGenKind::Module, &platform.arch, file), || {
            let module = self.db.module(file, &platform.arch)?;
            ModuleAutoGen::new(self, platform, module)
        })
    }

    pub(crate) fn library_autogen(
        &self,
        platform: &PlatformAutoGen,
        file: &MetaFile,
    ) -> AutoGenResult<Rc<ModuleAutoGen>> {
        self.module_in(platform, file)
    }

    /// Packages any component of `platform`, or a library one links against, depends on.
    pub(crate) fn platform_packages(&self, platform: &PlatformAutoGen) -> AutoGenResult<Rc<Vec<Rc<PackageData>>>> {
        let key = self.key(AutoGenKind::Packages, &platform.arch, platform.meta_file());
        self.cache.packages(key, || {
            let mut packages: Vec<Rc<PackageData>> = vec![];
            for file in platform.platform.modules.keys() {
                let module = self.db.module(file, &platform.arch)?;
                let libraries = linked_libraries(&self.db, &platform.platform, &module)?;
                for package in std::iter::once(&module)
                    .chain(libraries.iter())
                    .flat_map(|m| m.packages.iter())
                {
                    if !packages.iter().any(|p| p.meta_file == package.meta_file) {
                        packages.push(package.clone());
                    }
                }
            }
            debug!(arch = %platform.arch, count = packages.len(), "platform packages");
            Ok(packages)
        })
    }

    /// Context of `file` built for `arch`, or `None` if the platform neither lists it as a
    /// component nor uses it as a library instance.
    pub fn module_autogen(&self, file: &MetaFile, arch: &str) -> AutoGenResult<Option<Rc<ModuleAutoGen>>> {
        let platform = self.platform_autogen(arch)?;
        let known = platform.valid_module(file)
            || platform.platform.library_instances.contains(file)
            || self.cache.get_module(&self.key(AutoGenKind::Module, arch, file)).is_some();
        if !known {
            debug!(module = %file, %arch, "not part of the platform");
            return Ok(None);
        }
        self.module_in(&platform, file).map(Some)
    }

    pub fn platforms(&self) -> &[Rc<PlatformAutoGen>] {
        &self.platforms
    }

    /// Contexts of the platform's components for `arch`, in component order.
    pub fn module_autogens(&self, arch: &str) -> AutoGenResult<Vec<Rc<ModuleAutoGen>>> {
        let platform = self.platform_autogen(arch)?;
        platform
            .platform
            .modules
            .keys()
            .map(|file| self.module_in(&platform, file))
            .collect()
    }

    /// Contexts of every library instance the components of `arch` link against.
    pub fn library_autogens(&self, arch: &str) -> AutoGenResult<Vec<Rc<ModuleAutoGen>>> {
        let mut libraries: IndexMap<MetaFile, Rc<ModuleAutoGen>> = IndexMap::new();
        for module in self.module_autogens(arch)? {
            for library in &module.library_autogens {
                libraries
                    .entry(library.meta_file().clone())
                    .or_insert_with(|| library.clone());
            }
        }
        Ok(libraries.into_values().collect())
    }

    /// Packages any component or library of `arch` depends on.
    pub fn package_list(&self, arch: &str) -> AutoGenResult<Vec<Rc<PackageData>>> {
        let mut packages: Vec<Rc<PackageData>> = vec![];
        let modules = self.module_autogens(arch)?;
        let libraries = self.library_autogens(arch)?;
        for package in modules
            .iter()
            .chain(libraries.iter())
            .flat_map(|m| m.module.packages.iter())
        {
            if !packages.iter().any(|p| p.meta_file == package.meta_file) {
                packages.push(package.clone());
            }
        }
        Ok(packages)
    }

    pub fn name(&self) -> String {
        self.platforms
            .first()
            .map(|p| p.platform.name.clone())
            .unwrap_or_default()
    }

    pub fn build_dir(&self) -> Option<&PathBuf> {
        self.platforms.first().map(|p| &p.build_dir)
    }

    pub fn build_command(&self) -> &[String] {
        self.platforms
            .first()
            .map(|p| p.build_command.as_slice())
            .unwrap_or_default()
    }

    /// Dynamic PCDs in database layout order.
    pub fn dynamic_pcds(&self) -> &[DynamicPcd] {
        &self.dynamic_pcds
    }

    pub fn non_dynamic_pcds(&self) -> &[Pcd] {
        &self.non_dynamic_pcds
    }

    pub fn token_numbers(&self) -> &IndexMap<PcdId, u32> {
        &self.token_numbers
    }

    pub fn token_number(&self, name: &str, space: &str) -> Option<u32> {
        self.token_numbers
            .get(&(name.to_string(), space.to_string()))
            .copied()
    }

    /// Hand every VPD item to the offset fixup tool and write the offsets it picks back into the
    /// collected PCDs.
    fn stage_vpd_pcds(
        &self,
        platform: &PlatformAutoGen,
        collector: &mut PcdCollector,
        tool: &dyn OffsetFixupTool,
    ) -> AutoGenResult<()> {
        let data = &platform.platform;
        let mut vpd = VpdInfoFile::new();
        let mut need_map = false;

        let ids = data
            .pcds
            .iter()
            .filter(|(_, pcd)| pcd.pcd_type.is_some_and(|t| t.is_vpd()))
            .map(|(id, _)| id.clone())
            .sorted()
            .collect_vec();

        for id in &ids {
            let Some(item) = collector.dynamic_mut().iter_mut().find(|d| d.pcd.id() == *id) else {
                continue;
            };
            let pcd = &mut item.pcd;
            let max_datum_size = pcd.max_datum_size.clone();
            let full_name = pcd.full_name();
            let non_opaque = pcd.datum_type.is_some_and(|t| t != DatumType::Void);
            let Some(sku) = pcd.sku_info.values_mut().next() else {
                continue;
            };
            sku.vpd_offset = sku.vpd_offset.trim().to_string();

            // `Offset|Value` lands the value where the size would be
            if non_opaque {
                if sku.default_value.is_empty() {
                    sku.default_value = max_datum_size.unwrap_or_default();
                    pcd.max_datum_size = None;
                } else {
                    return Err(AutoGenError::autogen("PCD setting error")
                        .in_file(&data.meta_file)
                        .with_extra(format!(
                            "\n\tPCD: {} format incorrect in DSC: {}\n\t\t\n",
                            full_name, data.meta_file
                        )));
                }
            }

            let offset = pcd.sku_info.values().next().map(|s| s.vpd_offset.clone()).unwrap_or_default();
            vpd.add(pcd, &offset);
            if offset == AUTO_OFFSET && !need_map {
                need_map = true;
                if data.vpd_tool_guid.is_none() {
                    return Err(AutoGenError::file_not_found(BPDG_NOT_FOUND));
                }
            }
        }

        if data.vpd_tool_guid.is_some() {
            let packages = self.package_list(&platform.arch)?;
            for id in &ids {
                if vpd.contains(id) {
                    continue;
                }
                let mut pcd = data.pcds[id].clone();
                for declared in packages
                    .iter()
                    .flat_map(|p| p.pcds.values())
                    .filter(|declared| declared.id() == *id)
                {
                    warn!(pcd = %pcd.full_name(), "Unreferenced vpd pcd used!");
                    pcd.datum_type = declared.datum_type;
                    pcd.default_value = declared.default_value.clone();
                    if let Some(sku) = pcd.sku_info.values_mut().next() {
                        if sku.default_value.is_empty() {
                            sku.default_value = declared.default_value.clone();
                        }
                    }
                }
                let offset = pcd.sku_info.values().next().map(|s| s.vpd_offset.trim().to_string()).unwrap_or_default();
                vpd.add(&pcd, &offset);
                if offset == AUTO_OFFSET {
                    need_map = true;
                }
            }
        }

        if vpd.count() == 0 {
            return Ok(());
        }
        if platform.flash_definition.is_none() {
            return Err(AutoGenError::attribute_not_available(format!(
                "Fail to get FLASH_DEFINITION definition in DSC file {} which is required when DSC contains VPD PCD.",
                data.meta_file
            )));
        }

        let fv_dir = platform.build_dir.join("FV");
        fs::create_dir_all(&fv_dir).map_err(|_| {
            AutoGenError::file_write_failure(format!(
                "Fail to create FV folder under {}",
                platform.build_dir.display()
            ))
        })?;

        let guid = data
            .vpd_tool_guid
            .as_deref()
            .ok_or_else(|| AutoGenError::file_not_found(BPDG_NOT_FOUND))?;
        let txt = fv_dir.join(format!("{}.txt", guid));
        vpd.write(&txt)?;

        let fixup = platform
            .tool_definition
            .iter()
            .find(|(_, attributes)| attributes.get("GUID").is_some_and(|g| g == guid));
        let Some((name, attributes)) = fixup else {
            return Err(AutoGenError::file_not_found(BPDG_NOT_FOUND));
        };
        let path = attributes.get("PATH").ok_or_else(|| {
            AutoGenError::attribute_not_available(format!(
                "PATH attribute was not provided for BPDG guid tool {} in tools_def.txt",
                name
            ))
        })?;
        tool.run(path, &txt)?;

        if need_map {
            let map = fv_dir.join(format!("{}.map", guid));
            if !map.exists() {
                return Err(AutoGenError::file_read_failure(format!(
                    "Can not find VPD map file {} to fix up VPD offset.",
                    map.display()
                )));
            }
            vpd.read(&map)?;
            let map_file = MetaFile::new(map.to_string_lossy());
            for item in collector.dynamic_mut() {
                let id = item.pcd.id();
                // The map lists one offset per SKU, in SKU order
                for (index, sku) in item.pcd.sku_info.values_mut().enumerate() {
                    if sku.vpd_offset.trim() != AUTO_OFFSET {
                        continue;
                    }
                    let offset = vpd.offset(&id, index).ok_or_else(|| {
                        AutoGenError::format_invalid(format!(
                            "VPD map file gives no offset for PCD [{}.{}] (SKU {})",
                            id.1, id.0, sku.sku_name
                        ))
                        .in_file(&map_file)
                    })?;
                    debug!(pcd = %id.0, sku = %sku.sku_name, %offset, "VPD offset assigned");
                    sku.vpd_offset = offset.to_string();
                }
            }
        }
        Ok(())
    }

    /// Within a token space, no two PCDs share a token value, and the same PCD declared twice
    /// keeps its token value.
    fn check_token_value_conflicts(&self) -> AutoGenResult<()> {
        for platform in &self.platforms {
            for package in self.package_list(&platform.arch)? {
                // Numerically equal spellings are the same token value
                let token = |pcd: &Pcd| {
                    check_token_value(&pcd.token_value)
                        .map(|v| v.to_string())
                        .unwrap_or_else(|_| pcd.token_value.clone())
                };
                let by_space = package
                    .pcds
                    .values()
                    .into_group_map_by(|pcd| pcd.token_space.clone());

                for (_, mut pcds) in by_space.into_iter().sorted_by(|a, b| a.0.cmp(&b.0)) {
                    pcds.sort_by(|a, b| token(*a).cmp(&token(*b)).then(a.name.cmp(&b.name)));
                    for (item, next) in pcds.iter().tuple_windows() {
                        if token(*item) == token(*next) && item.name != next.name {
                            return Err(AutoGenError::format_invalid(format!(
                                "The TokenValue [{}] of PCD [{}.{}] is conflict with: [{}.{}] in {}",
                                item.token_value,
                                item.token_space,
                                item.name,
                                next.token_space,
                                next.name,
                                package.meta_file
                            )));
                        }
                    }

                    pcds.sort_by(|a, b| a.name.cmp(&b.name).then(token(*a).cmp(&token(*b))));
                    for (item, next) in pcds.iter().tuple_windows() {
                        if item.name == next.name && token(*item) != token(*next) {
                            return Err(AutoGenError::format_invalid(format!(
                                "The TokenValue [{}] of PCD [{}.{}] in {} defined in two places should be same as well.",
                                item.token_value, item.token_space, item.name, package.meta_file
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Every typed DSC PCD must be declared with a type of the same family. Undeclared ones are
    /// reported once with every arch they appear in.
    fn check_pcd_types(&self) -> AutoGenResult<()> {
        let mut unused: Vec<(PcdId, String)> = vec![];
        for platform in &self.platforms {
            let packages = self.package_list(&platform.arch)?;
            for (id, pcd) in &platform.platform.pcds {
                let Some(pcd_type) = pcd.pcd_type else {
                    continue;
                };
                let family = pcd_type.family();
                let (name, space) = (id.0.as_str(), id.1.as_str());

                let mut found = false;
                for package in &packages {
                    if package.pcd(name, space, family).is_some() {
                        found = true;
                        break;
                    }
                    if let Some(declared) = PcdType::DECLARATION_ORDER
                        .into_iter()
                        .find(|t| package.pcd(name, space, *t).is_some())
                    {
                        return Err(AutoGenError::format_invalid(format!(
                            "Type [{}] of PCD [{}.{}] in DSC file doesn't match the type [{}] defined in DEC file.",
                            pcd_type, space, name, declared
                        ))
                        .in_file(platform.meta_file()));
                    }
                }
                if !found {
                    unused.push((id.clone(), platform.arch.clone()));
                }
            }
        }

        for ((name, space), arches) in group_ordered(unused) {
            warn!(
                file = %self.config.active_platform,
                "The PCD was not specified by any INF module in the platform for the given architecture.\n\tPCD: [{}.{}]\n\tPlatform: [{}]\n\tArch: {:?}",
                space, name, self.config.active_platform, arches
            );
        }
        Ok(())
    }
}
