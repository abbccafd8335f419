use crate::database::BuildDatabase;
use crate::errors::{AutoGenError, AutoGenResult};
use crate::meta_file::MetaFile;
use crate::package::pcd_settings;
use crate::pcd::{
    analyze_hii_setting, analyze_pcd_setting, analyze_vpd_setting, parse_datum_type, Pcd, PcdId,
    SkuInfo,
};
use crate::record::{PcdModel, Record, RecordKind};
use crate::types::{ModuleType, PcdType, ARCH_COMMON, NULL_LIBRARY_CLASS, SKU_DEFAULT};
use firmplan_util::split::split_value_list;
use firmplan_util::TieredMap;
use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;
use tracing::debug;

static GUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("valid regex")
});

/// Which conventions a build option in the platform targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleStyle {
    Edk,
    EdkII,
}

impl FromStr for ModuleStyle {
    type Err = AutoGenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EDK" => Ok(ModuleStyle::Edk),
            "EDKII" | "" | ARCH_COMMON => Ok(ModuleStyle::EdkII),
            other => Err(AutoGenError::option_unknown(format!(
                "Unknown build option style [{}]",
                other
            ))),
        }
    }
}

/// A `[Components]` entry with its private settings.
#[derive(Debug, Clone)]
pub struct PlatformModule {
    pub meta_file: MetaFile,
    pub component_id: u32,
    pub source_override_path: Option<MetaFile>,
    pub library_classes: IndexMap<String, MetaFile>,
    pub pcds: IndexMap<PcdId, Pcd>,
    pub build_options: IndexMap<(String, String), String>,
}

/// A platform descriptor (DSC) resolved for one architecture and SKU.
#[derive(Debug, Clone)]
pub struct PlatformData {
    pub meta_file: MetaFile,
    pub arch: String,
    pub name: String,
    pub guid: String,
    pub version: String,
    pub dsc_specification: String,
    pub output_directory: String,
    pub supported_arches: Vec<String>,
    pub build_targets: Vec<String>,
    pub sku_name: String,
    /// SKU name → SKU id
    pub sku_ids: IndexMap<String, String>,
    pub flash_definition: Option<MetaFile>,
    pub vpd_tool_guid: Option<String>,
    pub modules: IndexMap<MetaFile, PlatformModule>,
    pub library_instances: Vec<MetaFile>,
    library_classes: TieredMap<MetaFile, 3>,
    library_class_names: IndexSet<String>,
    /// Legacy library instances by base name.
    pub legacy_libraries: IndexMap<String, MetaFile>,
    pub pcds: IndexMap<PcdId, Pcd>,
    build_options: IndexMap<(String, String, ModuleStyle), String>,
}

impl PlatformData {
    pub fn resolve(
        db: &BuildDatabase,
        file: &MetaFile,
        arch: &str,
        sku_id: Option<&str>,
    ) -> AutoGenResult<Self> {
        let store = db.store();

        let mut platform = PlatformData {
            meta_file: file.clone(),
            arch: arch.to_string(),
            name: String::new(),
            guid: String::new(),
            version: String::new(),
            dsc_specification: String::new(),
            output_directory: String::new(),
            supported_arches: vec![],
            build_targets: vec!["DEBUG".into(), "RELEASE".into()],
            sku_name: SKU_DEFAULT.to_string(),
            sku_ids: IndexMap::new(),
            flash_definition: None,
            vpd_tool_guid: None,
            modules: IndexMap::new(),
            library_instances: vec![],
            library_classes: TieredMap::new(),
            library_class_names: IndexSet::new(),
            legacy_libraries: IndexMap::new(),
            pcds: IndexMap::new(),
            build_options: IndexMap::new(),
        };

        let mut sku_identifier = None;
        for record in store.query(file, RecordKind::Header, Some(arch), None) {
            let value = record.value(1).trim();
            match record.value(0) {
                "PLATFORM_NAME" => platform.name = value.to_string(),
                "PLATFORM_GUID" => platform.guid = value.to_string(),
                "PLATFORM_VERSION" => platform.version = value.to_string(),
                "DSC_SPECIFICATION" => platform.dsc_specification = value.to_string(),
                "OUTPUT_DIRECTORY" => {
                    if value.contains(' ') {
                        return Err(AutoGenError::format_not_supported(
                            "No space is allowed in OUTPUT_DIRECTORY",
                        )
                        .at(file, record.line)
                        .with_extra(value));
                    }
                    platform.output_directory = value.replace('\\', "/");
                }
                "FLASH_DEFINITION" => {
                    let fdf = MetaFile::new(value);
                    fdf.validate(".fdf").map_err(|e| e.at(file, record.line))?;
                    platform.flash_definition = Some(fdf);
                }
                "SUPPORTED_ARCHITECTURES" => {
                    platform.supported_arches = split_value_list(value, '|')
                        .into_iter()
                        .filter(|a| !a.is_empty())
                        .collect();
                }
                "BUILD_TARGETS" => {
                    platform.build_targets = split_value_list(value, '|')
                        .into_iter()
                        .filter(|t| !t.is_empty())
                        .collect();
                }
                "SKUID_IDENTIFIER" => sku_identifier = Some(value.to_string()),
                "VPD_TOOL_GUID" => {
                    if !GUID_RE.is_match(value) {
                        return Err(AutoGenError::format_invalid(
                            "Invalid GUID format for VPD_TOOL_GUID",
                        )
                        .at(file, record.line));
                    }
                    platform.vpd_tool_guid = Some(value.to_string());
                }
                _ => {}
            }
        }

        if platform.name.is_empty() {
            return Err(AutoGenError::attribute_not_available("No PLATFORM_NAME").in_file(file));
        }
        if platform.guid.is_empty() {
            return Err(AutoGenError::attribute_not_available("No FILE_GUID").in_file(file));
        }
        if platform.output_directory.is_empty() {
            platform.output_directory = format!("Build/{}", platform.name);
        }

        for record in store.query(file, RecordKind::SkuId, None, None) {
            if record.value(0).is_empty() {
                return Err(AutoGenError::format_invalid("No Sku ID number").at(file, record.line));
            }
            if record.value(1).is_empty() {
                return Err(AutoGenError::format_invalid("No Sku ID name").at(file, record.line));
            }
            platform
                .sku_ids
                .insert(record.value(1).to_string(), record.value(0).to_string());
        }
        if !platform.sku_ids.contains_key(SKU_DEFAULT) {
            platform.sku_ids.insert(SKU_DEFAULT.to_string(), "0".to_string());
        }

        // An explicitly selected SKU wins over the descriptor's own choice, if it exists
        platform.sku_name = [sku_id.map(String::from), sku_identifier]
            .into_iter()
            .flatten()
            .find(|sku| platform.sku_ids.contains_key(sku))
            .unwrap_or_else(|| SKU_DEFAULT.to_string());

        let mut null_library_number = 0u32;
        platform.resolve_library_classes(db, &mut null_library_number)?;
        platform.resolve_modules(db, &mut null_library_number)?;
        platform.resolve_pcds(db)?;

        for record in store.query(file, RecordKind::BuildOption, Some(arch), None) {
            let style = record.scope.parse::<ModuleStyle>().map_err(|e| e.at(file, record.line))?;
            platform.build_options.insert(
                (record.value(0).to_string(), record.value(1).to_string(), style),
                record.value(2).to_string(),
            );
        }

        Ok(platform)
    }

    fn next_null_class(counter: &mut u32) -> String {
        *counter += 1;
        format!("{}{}", NULL_LIBRARY_CLASS, counter)
    }

    fn validated_inf(&self, record: &Record, index: usize) -> AutoGenResult<MetaFile> {
        let inf = MetaFile::new(record.value(index));
        inf.validate(".inf")
            .map_err(|e| e.at(&self.meta_file, record.line))?;
        Ok(inf)
    }

    fn resolve_library_classes(&mut self, db: &BuildDatabase, null_number: &mut u32) -> AutoGenResult<()> {
        let file = self.meta_file.clone();
        let arch = self.arch.clone();

        for record in db.store().query(&file, RecordKind::LibraryClass, Some(&arch), None) {
            let mut class = record.value(0).to_string();
            let instance = self.validated_inf(&record, 1)?;
            if class.is_empty() || class == NULL_LIBRARY_CLASS {
                class = Self::next_null_class(null_number);
                debug!(arch = %record.arch, %instance, %class, "found forced library");
            }

            if record.scope != ARCH_COMMON && record.scope.parse::<ModuleType>().is_err() {
                return Err(AutoGenError::option_unknown(format!(
                    "Unknown module type [{}]",
                    record.scope
                ))
                .at(&file, record.line)
                .with_extra(instance.to_string()));
            }

            self.library_classes
                .insert([record.arch.as_str(), record.scope.as_str(), class.as_str()], instance.clone());
            self.library_class_names.insert(class);
            if !self.library_instances.contains(&instance) {
                self.library_instances.push(instance);
            }
        }

        for record in db.store().query(&file, RecordKind::LibraryInstance, Some(&arch), None) {
            let instance = self.validated_inf(&record, 0)?;
            if !self.library_instances.contains(&instance) {
                self.library_instances.push(instance.clone());
            }
            // Legacy libraries are looked up by their module name
            let library = db.module(&instance, &arch)?;
            self.legacy_libraries.insert(library.base_name.clone(), instance);
        }
        Ok(())
    }

    fn resolve_modules(&mut self, db: &BuildDatabase, null_number: &mut u32) -> AutoGenResult<()> {
        let store = db.store();
        let file = self.meta_file.clone();
        let arch = self.arch.clone();

        for record in store.query(&file, RecordKind::Component, Some(&arch), None) {
            let inf = self.validated_inf(&record, 0)?;
            if self.modules.contains_key(&inf) {
                return Err(AutoGenError::file_duplicated(format!(
                    "Module [{}] is listed more than once",
                    inf
                ))
                .at(&file, record.line)
                .with_extra(inf.to_string()));
            }

            let id = record.id;
            let mut module = PlatformModule {
                meta_file: inf.clone(),
                component_id: id,
                source_override_path: None,
                library_classes: IndexMap::new(),
                pcds: IndexMap::new(),
                build_options: IndexMap::new(),
            };

            module.source_override_path = store
                .query(&file, RecordKind::ComponentSourceOverridePath, Some(&arch), Some(id))
                .first()
                .map(|r| MetaFile::new(r.value(0)));

            for lib in store.query(&file, RecordKind::LibraryClass, Some(&arch), Some(id)) {
                let instance = self.validated_inf(&lib, 1)?;
                let mut class = lib.value(0).to_string();
                if class.is_empty() || class == NULL_LIBRARY_CLASS {
                    class = Self::next_null_class(null_number);
                    debug!(module = %inf, %instance, %class, "found forced library");
                }
                module.library_classes.insert(class, instance.clone());
                if !self.library_instances.contains(&instance) {
                    self.library_instances.push(instance);
                }
            }

            for model in [
                PcdModel::FixedAtBuild,
                PcdModel::PatchableInModule,
                PcdModel::FeatureFlag,
                PcdModel::Dynamic,
                PcdModel::DynamicEx,
            ] {
                for pcd in store.query(&file, RecordKind::Pcd(model), Some(&arch), Some(id)) {
                    let fields = split_value_list(pcd.value(2), '|');
                    let max_datum_size = fields.get(1).filter(|s| !s.is_empty()).cloned();
                    let value = Pcd {
                        pcd_type: Some(PcdType::from_model(model)),
                        default_value: fields[0].clone(),
                        max_datum_size,
                        ..Pcd::new(pcd.value(1), pcd.value(0))
                    };
                    module.pcds.insert(value.id(), value);
                }
            }

            for option in store.query(&file, RecordKind::BuildOption, Some(&arch), Some(id)) {
                let value = option.value(2);
                module
                    .build_options
                    .entry((option.value(0).to_string(), option.value(1).to_string()))
                    .and_modify(|existing| {
                        existing.push(' ');
                        existing.push_str(value);
                    })
                    .or_insert_with(|| value.to_string());
            }

            self.modules.insert(inf, module);
        }
        Ok(())
    }

    fn resolve_pcds(&mut self, db: &BuildDatabase) -> AutoGenResult<()> {
        let store = db.store();
        let file = self.meta_file.clone();
        let arch = self.arch.clone();
        let sku_name = self.sku_name.clone();
        let sku_id = self.sku_ids.get(&sku_name).cloned().unwrap_or_default();

        for model in [
            PcdModel::FixedAtBuild,
            PcdModel::PatchableInModule,
            PcdModel::FeatureFlag,
        ] {
            let records = store.query(&file, RecordKind::Pcd(model), Some(&arch), None);
            for ((name, space), (setting, line)) in pcd_settings(&records, &arch) {
                let [value, datum_type, max_datum_size] =
                    analyze_pcd_setting(&setting).map_err(|e| e.at(&file, line))?;
                let pcd = Pcd {
                    pcd_type: Some(PcdType::from_model(model)),
                    datum_type: parse_datum_type(&datum_type).map_err(|e| e.at(&file, line))?,
                    default_value: value,
                    max_datum_size: Some(max_datum_size).filter(|s| !s.is_empty()),
                    ..Pcd::new(&name, &space)
                };
                self.pcds.insert(pcd.id(), pcd);
            }
        }

        for model in [
            PcdModel::DynamicDefault,
            PcdModel::DynamicHii,
            PcdModel::DynamicVpd,
            PcdModel::DynamicExDefault,
            PcdModel::DynamicExHii,
            PcdModel::DynamicExVpd,
        ] {
            let pcd_type = PcdType::from_model(model);
            let records = store.query(&file, RecordKind::Pcd(model), Some(&arch), None);

            let mut ids = IndexSet::new();
            let mut settings = TieredMap::new();
            for record in &records {
                let (space, name) = (record.value(0), record.value(1));
                settings.insert(
                    [record.arch.as_str(), record.scope.as_str(), name, space],
                    (record.value(2).to_string(), record.line),
                );
                ids.insert((name.to_string(), space.to_string()));
            }

            for (name, space) in ids {
                let Some((setting, line)) = settings.resolve([&arch, &sku_name, &name, &space]) else {
                    continue;
                };
                let mut sku = SkuInfo {
                    sku_name: sku_name.clone(),
                    sku_id: sku_id.clone(),
                    ..Default::default()
                };
                let mut pcd = Pcd {
                    pcd_type: Some(pcd_type),
                    ..Pcd::new(&name, &space)
                };

                match model {
                    PcdModel::DynamicHii | PcdModel::DynamicExHii => {
                        let [variable_name, variable_guid, offset, default] =
                            analyze_hii_setting(setting).map_err(|e| e.at(&file, *line))?;
                        pcd.default_value = default.clone();
                        sku.variable_name = variable_name;
                        sku.variable_guid = variable_guid;
                        sku.variable_offset = offset;
                        sku.hii_default_value = default;
                    }
                    PcdModel::DynamicVpd | PcdModel::DynamicExVpd => {
                        // The datum type is unknown until the package is consulted, so the
                        // optional fields are kept as written
                        let [offset, max_datum_size, initial] =
                            analyze_vpd_setting(setting).map_err(|e| e.at(&file, *line))?;
                        pcd.max_datum_size = Some(max_datum_size).filter(|s| !s.is_empty());
                        sku.vpd_offset = offset;
                        sku.default_value = initial;
                    }
                    _ => {
                        let [value, datum_type, max_datum_size] =
                            analyze_pcd_setting(setting).map_err(|e| e.at(&file, *line))?;
                        pcd.datum_type =
                            parse_datum_type(&datum_type).map_err(|e| e.at(&file, *line))?;
                        pcd.default_value = value.clone();
                        pcd.max_datum_size = Some(max_datum_size).filter(|s| !s.is_empty());
                        sku.default_value = value;
                    }
                }

                pcd.sku_info.insert(sku_name.clone(), sku);
                self.pcds.insert(pcd.id(), pcd);
            }
        }
        Ok(())
    }

    /// Instance bound to `class` for modules of `module_type`.
    pub fn library_instance(&self, class: &str, module_type: ModuleType) -> Option<&MetaFile> {
        self.library_classes
            .resolve([self.arch.as_str(), module_type.as_str(), class])
    }

    /// Every library class name the platform binds, in declaration order.
    pub fn library_class_names(&self) -> impl Iterator<Item = &str> {
        self.library_class_names.iter().map(String::as_str)
    }

    /// Build options for modules written in `style`, or of every style.
    pub fn build_options(&self, style: Option<ModuleStyle>) -> IndexMap<(String, String), String> {
        self.build_options
            .iter()
            .filter(|((_, _, s), _)| style.map_or(true, |style| *s == style))
            .map(|((family, key, _), value)| ((family.clone(), key.clone()), value.clone()))
            .collect()
    }

    /// Value a flash layout assigns to a PCD. The item stays untyped so the module's type
    /// prevails.
    pub fn add_pcd(&mut self, name: &str, space: &str, value: &str) {
        self.pcds
            .entry((name.to_string(), space.to_string()))
            .or_insert_with(|| Pcd::new(name, space))
            .default_value = value.to_string();
    }
}
