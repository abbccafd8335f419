use crate::database::BuildDatabase;
use crate::errors::{AutoGenError, AutoGenResult};
use crate::meta_file::MetaFile;
use crate::package::{pcd_settings, PackageData};
use crate::pcd::{analyze_pcd_setting, check_token_value, Pcd, PcdId};
use crate::record::{PcdModel, Record, RecordKind};
use crate::types::{hex_version, parse_int, ModuleType, PcdType, DEPEX_OPCODES, EDKII_INF_VERSION};
use firmplan_util::split::{split_upper_words, split_value_list};
use firmplan_util::TieredMap;
use indexmap::IndexMap;
use itertools::Itertools;
use std::rc::Rc;
use tracing::warn;

pub const ZERO_GUID: &str = "00000000-0000-0000-0000-000000000000";

/// `LIBRARY_CLASS = Name|TYPE TYPE ...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryClassDecl {
    pub name: String,
    pub supported: Vec<ModuleType>,
}

impl LibraryClassDecl {
    pub fn supports(&self, module_type: ModuleType) -> bool {
        self.supported.contains(&module_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub file: MetaFile,
    pub family: String,
    pub tag: String,
    pub tool_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFile {
    pub file_type: String,
    pub file: MetaFile,
    pub target: String,
}

/// A module descriptor (INF) resolved for one architecture.
#[derive(Debug, Clone)]
pub struct ModuleData {
    pub meta_file: MetaFile,
    pub arch: String,
    pub base_name: String,
    pub guid: String,
    pub module_type: ModuleType,
    pub component_type: String,
    pub build_type: String,
    pub autogen_version: u32,
    pub version: String,
    pub pcd_is_driver: String,
    pub shadow: bool,
    pub specification: IndexMap<String, String>,
    pub library_class: Vec<LibraryClassDecl>,
    pub entry_points: Vec<String>,
    pub unload_images: Vec<String>,
    pub constructors: Vec<String>,
    pub destructors: Vec<String>,
    pub custom_makefile: IndexMap<String, MetaFile>,
    pub dxs_file: Option<MetaFile>,
    pub defines: IndexMap<String, String>,
    pub sources: Vec<SourceFile>,
    pub binaries: Vec<BinaryFile>,
    pub packages: Vec<Rc<PackageData>>,
    /// Library classes used, with the instance the module itself suggests.
    pub library_classes: IndexMap<String, Option<MetaFile>>,
    /// Legacy library names.
    pub libraries: Vec<String>,
    pub protocols: IndexMap<String, String>,
    pub ppis: IndexMap<String, String>,
    pub guids: IndexMap<String, String>,
    pub includes: Vec<MetaFile>,
    pub pcds: IndexMap<PcdId, Pcd>,
    pub build_options: IndexMap<(String, String), String>,
    /// `[arch, module type]` → GUID-valued token lists, one per depex record group.
    pub depex: TieredMap<Vec<String>, 2>,
    /// Same keys, expression kept as written.
    pub depex_expression: TieredMap<String, 2>,
}

/// `[Defines]` entries this resolver understands.
enum ModuleDefine {
    BaseName,
    FileGuid,
    ModuleType,
    InfVersion,
    ComponentType,
    Version,
    PcdIsDriver,
    Shadow,
    Specification(&'static str),
    LibraryClass,
    EntryPoint,
    UnloadImage,
    Constructor,
    Destructor,
    CustomMakefile,
    DpxSource,
    Other,
}

impl ModuleDefine {
    fn parse(name: &str) -> ModuleDefine {
        match name {
            "BASE_NAME" => ModuleDefine::BaseName,
            "FILE_GUID" => ModuleDefine::FileGuid,
            "MODULE_TYPE" => ModuleDefine::ModuleType,
            "INF_VERSION" => ModuleDefine::InfVersion,
            "COMPONENT_TYPE" => ModuleDefine::ComponentType,
            "VERSION_STRING" | "VERSION_NUMBER" | "VERSION" => ModuleDefine::Version,
            "PCD_IS_DRIVER" => ModuleDefine::PcdIsDriver,
            "SHADOW" => ModuleDefine::Shadow,
            "EFI_SPECIFICATION_VERSION" | "UEFI_SPECIFICATION_VERSION" => {
                ModuleDefine::Specification("UEFI_SPECIFICATION_VERSION")
            }
            "PI_SPECIFICATION_VERSION" => ModuleDefine::Specification("PI_SPECIFICATION_VERSION"),
            "EDK_RELEASE_VERSION" => ModuleDefine::Specification("EDK_RELEASE_VERSION"),
            "LIBRARY_CLASS" => ModuleDefine::LibraryClass,
            "ENTRY_POINT" => ModuleDefine::EntryPoint,
            "UNLOAD_IMAGE" => ModuleDefine::UnloadImage,
            "CONSTRUCTOR" => ModuleDefine::Constructor,
            "DESTRUCTOR" => ModuleDefine::Destructor,
            "CUSTOM_MAKEFILE" => ModuleDefine::CustomMakefile,
            "DPX_SOURCE" => ModuleDefine::DpxSource,
            _ => ModuleDefine::Other,
        }
    }
}

impl ModuleData {
    pub fn is_library(&self) -> bool {
        !self.library_class.is_empty()
    }

    pub fn is_legacy(&self) -> bool {
        self.autogen_version < EDKII_INF_VERSION
    }

    pub fn resolve(db: &BuildDatabase, file: &MetaFile, arch: &str) -> AutoGenResult<Self> {
        let store = db.store();
        let module_dir = file.dir().to_string();

        let mut module = ModuleData {
            meta_file: file.clone(),
            arch: arch.to_string(),
            base_name: String::new(),
            guid: ZERO_GUID.to_string(),
            module_type: ModuleType::Base,
            component_type: String::new(),
            build_type: String::new(),
            autogen_version: 0x0001_0000,
            version: "0.0".to_string(),
            pcd_is_driver: String::new(),
            shadow: false,
            specification: IndexMap::new(),
            library_class: vec![],
            entry_points: vec![],
            unload_images: vec![],
            constructors: vec![],
            destructors: vec![],
            custom_makefile: IndexMap::new(),
            dxs_file: None,
            defines: IndexMap::new(),
            sources: vec![],
            binaries: vec![],
            packages: vec![],
            library_classes: IndexMap::new(),
            libraries: vec![],
            protocols: IndexMap::new(),
            ppis: IndexMap::new(),
            guids: IndexMap::new(),
            includes: vec![],
            pcds: IndexMap::new(),
            build_options: IndexMap::new(),
            depex: TieredMap::new(),
            depex_expression: TieredMap::new(),
        };

        let mut module_type_text = None;
        let mut module_type_line = 0;
        for record in store.query(file, RecordKind::Header, Some(arch), None) {
            let value = record.value(1).trim();
            match ModuleDefine::parse(record.value(0)) {
                ModuleDefine::BaseName => module.base_name = value.to_string(),
                ModuleDefine::FileGuid => module.guid = value.to_string(),
                ModuleDefine::ModuleType => {
                    module_type_text = Some(value.to_string());
                    module_type_line = record.line;
                }
                ModuleDefine::InfVersion => {
                    module.autogen_version = parse_int(value)
                        .and_then(|v| u32::try_from(v).ok())
                        .ok_or_else(|| {
                            AutoGenError::format_invalid(format!("Invalid INF_VERSION [{}]", value))
                                .at(file, record.line)
                        })?;
                }
                ModuleDefine::ComponentType => module.component_type = value.to_string(),
                ModuleDefine::Version => module.version = value.to_string(),
                ModuleDefine::PcdIsDriver => module.pcd_is_driver = value.to_string(),
                ModuleDefine::Shadow => module.shadow = value.eq_ignore_ascii_case("TRUE"),
                ModuleDefine::Specification(name) => {
                    let version = hex_version(value).ok_or_else(|| {
                        AutoGenError::format_not_supported(format!(
                            "'{}' format is not supported for {}",
                            value, name
                        ))
                        .at(file, record.line)
                    })?;
                    module.specification.insert(name.to_string(), version);
                }
                ModuleDefine::LibraryClass => {
                    module.library_class.push(parse_library_class(value, file, &record));
                }
                ModuleDefine::EntryPoint => module.entry_points.push(value.to_string()),
                ModuleDefine::UnloadImage if !value.is_empty() => {
                    module.unload_images.push(value.to_string())
                }
                ModuleDefine::Constructor if !value.is_empty() => {
                    module.constructors.push(value.to_string())
                }
                ModuleDefine::Destructor if !value.is_empty() => {
                    module.destructors.push(value.to_string())
                }
                ModuleDefine::UnloadImage | ModuleDefine::Constructor | ModuleDefine::Destructor => {}
                ModuleDefine::CustomMakefile => {
                    let tokens = split_value_list(value, '|');
                    if tokens.len() < 2 {
                        let makefile = MetaFile::in_dir(&module_dir, &tokens[0]);
                        module.custom_makefile.insert("MSFT".into(), makefile.clone());
                        module.custom_makefile.insert("GCC".into(), makefile);
                    } else {
                        if tokens[0] != "MSFT" && tokens[0] != "GCC" {
                            return Err(AutoGenError::format_not_supported(format!(
                                "No supported family [{}]",
                                tokens[0]
                            ))
                            .at(file, record.line));
                        }
                        module
                            .custom_makefile
                            .insert(tokens[0].clone(), MetaFile::in_dir(&module_dir, &tokens[1]));
                    }
                }
                ModuleDefine::DpxSource => {
                    module.dxs_file = Some(MetaFile::in_dir(&module_dir, value));
                }
                ModuleDefine::Other => {
                    module.defines.insert(record.value(0).to_string(), value.to_string());
                }
            }
        }

        if module.base_name.is_empty() {
            return Err(AutoGenError::attribute_not_available("No BASE_NAME name").in_file(file));
        }

        if !module.is_legacy() {
            let text = module_type_text
                .filter(|t| !t.is_empty())
                .ok_or_else(|| AutoGenError::attribute_not_available("MODULE_TYPE is not given").in_file(file))?;
            module.module_type = text.parse().map_err(|_| {
                AutoGenError::format_not_supported(format!(
                    "MODULE_TYPE {} is not supported for EDK II, valid values are:\n {}",
                    text,
                    ModuleType::ALL.iter().map(ModuleType::as_str).join(" ")
                ))
                .at(file, module_type_line)
            })?;

            let pi_version = module
                .specification
                .get("PI_SPECIFICATION_VERSION")
                .and_then(|v| parse_int(v))
                .unwrap_or(0);
            if module.module_type == ModuleType::SmmCore && pi_version < 0x0001_000A {
                return Err(AutoGenError::format_not_supported(
                    "SMM_CORE module type can't be used in the module with PI_SPECIFICATION_VERSION less than 0x0001000A",
                )
                .in_file(file));
            }

            module.build_type = if ["PCI_DEVICE_ID", "PCI_VENDOR_ID", "PCI_CLASS_CODE"]
                .iter()
                .all(|d| module.defines.contains_key(*d))
            {
                "UEFI_OPTIONROM".to_string()
            } else if module
                .defines
                .get("UEFI_HII_RESOURCE_SECTION")
                .is_some_and(|v| v == "TRUE")
            {
                "UEFI_HII".to_string()
            } else {
                module.module_type.to_string()
            };
        } else {
            if module.component_type.is_empty() {
                return Err(AutoGenError::attribute_not_available("COMPONENT_TYPE is not given").in_file(file));
            }
            module.build_type = module.component_type.to_uppercase();
            module.module_type = match module_type_text {
                Some(text) => text.parse().unwrap_or(ModuleType::UserDefined),
                None => ModuleType::from_component_type(&module.component_type)
                    .unwrap_or(ModuleType::UserDefined),
            };
            if module.component_type.eq_ignore_ascii_case("LIBRARY") {
                module.library_class = vec![LibraryClassDecl {
                    name: module.base_name.clone(),
                    supported: ModuleType::ALL.to_vec(),
                }];
            }
        }

        for record in store.query(file, RecordKind::Package, Some(arch), None) {
            let dec = MetaFile::new(record.value(0));
            dec.validate(".dec").map_err(|e| e.at(file, record.line))?;
            module.packages.push(db.package(&dec, arch)?);
        }

        for record in store.query(file, RecordKind::SourceFile, Some(arch), None) {
            module.sources.push(SourceFile {
                file: MetaFile::in_dir(&module_dir, record.value(0)),
                family: record.value(1).to_string(),
                tag: record.value(2).to_string(),
                tool_code: record.value(3).to_string(),
            });
        }

        for record in store.query(file, RecordKind::BinaryFile, Some(arch), None) {
            let target = split_value_list(record.value(2), '|')
                .into_iter()
                .next()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "COMMON".to_string());
            module.binaries.push(BinaryFile {
                file_type: record.value(0).to_string(),
                file: MetaFile::in_dir(&module_dir, record.value(1)),
                target,
            });
        }

        for record in store.query(file, RecordKind::LibraryClass, Some(arch), None) {
            let instance = Some(record.value(1))
                .filter(|i| !i.is_empty())
                .map(MetaFile::new);
            module
                .library_classes
                .insert(record.value(0).to_string(), instance);
        }

        for record in store.query(file, RecordKind::LibraryInstance, Some(arch), None) {
            let name = MetaFile::new(record.value(0));
            let name = name.base_name().to_string();
            if !module.libraries.contains(&name) {
                module.libraries.push(name);
            }
        }

        for (kind, what) in [
            (RecordKind::Protocol, "Protocol"),
            (RecordKind::Ppi, "PPI"),
            (RecordKind::Guid, "Guid"),
        ] {
            for record in store.query(file, kind, Some(arch), None) {
                let name = record.value(0);
                let value = symbol_value(&module.packages, kind, name).ok_or_else(|| {
                    AutoGenError::resource_not_available(format!(
                        "Value of {} [{}] is not found under [{}s] section in",
                        what, name, what
                    ))
                    .at(file, record.line)
                    .with_extra(package_list(&module.packages))
                })?;
                let table = match kind {
                    RecordKind::Protocol => &mut module.protocols,
                    RecordKind::Ppi => &mut module.ppis,
                    _ => &mut module.guids,
                };
                table.insert(name.to_string(), value);
            }
        }

        let include_records = store.query(file, RecordKind::Include, Some(arch), None);
        if !module.is_legacy() {
            if let Some(first) = include_records.first() {
                return Err(AutoGenError::format_not_supported("No [include] section allowed")
                    .at(file, first.line));
            }
        }
        for record in include_records {
            let include = MetaFile::in_dir(&module_dir, &record.value(0).replace("$(PROCESSOR)", arch));
            if !module.includes.contains(&include) {
                module.includes.push(include);
            }
        }

        module.resolve_pcds(db, arch)?;

        for record in store.query(file, RecordKind::BuildOption, Some(arch), None) {
            let key = (record.value(0).to_string(), record.value(1).to_string());
            let option = record.value(2);
            module
                .build_options
                .entry(key)
                .and_modify(|existing| {
                    existing.push(' ');
                    existing.push_str(option);
                })
                .or_insert_with(|| option.to_string());
        }

        module.resolve_depex(db, arch)?;

        Ok(module)
    }

    fn resolve_pcds(&mut self, db: &BuildDatabase, arch: &str) -> AutoGenResult<()> {
        let store = db.store();
        let file = self.meta_file.clone();

        for model in [
            PcdModel::FixedAtBuild,
            PcdModel::PatchableInModule,
            PcdModel::FeatureFlag,
            PcdModel::Dynamic,
            PcdModel::DynamicEx,
        ] {
            let records = store.query(&file, RecordKind::Pcd(model), Some(arch), None);
            for record in &records {
                let space = record.value(0);
                if self.guids.contains_key(space) {
                    continue;
                }
                let value = symbol_value(&self.packages, RecordKind::Guid, space).ok_or_else(|| {
                    AutoGenError::resource_not_available(format!(
                        "Value of Guid [{}] is not found under [Guids] section in",
                        space
                    ))
                    .at(&file, record.line)
                    .with_extra(package_list(&self.packages))
                })?;
                self.guids.insert(space.to_string(), value);
            }

            for ((name, space), (setting, line)) in pcd_settings(&records, arch) {
                let [default_value, _, _] =
                    analyze_pcd_setting(&setting).map_err(|e| e.at(&file, line))?;
                let pcd = self.pcd_from_packages(model, &name, &space, default_value, line)?;
                self.pcds.insert((name, space), pcd);
            }
        }
        Ok(())
    }

    fn pcd_from_packages(
        &self,
        model: PcdModel,
        name: &str,
        space: &str,
        default_value: String,
        line: u32,
    ) -> AutoGenResult<Pcd> {
        let file = &self.meta_file;
        let mut pcd = Pcd {
            default_value,
            pending: model == PcdModel::Dynamic,
            ..Pcd::new(name, space)
        };

        for package in &self.packages {
            // A generic dynamic section takes the lowest type the package declares
            let pcd_type = if model == PcdModel::Dynamic {
                PcdType::DECLARATION_ORDER
                    .into_iter()
                    .find(|t| package.pcd(name, space, *t).is_some())
                    .unwrap_or(PcdType::Dynamic)
            } else {
                PcdType::from_model(model)
            };

            let Some(declared) = package.pcd(name, space, pcd_type) else {
                continue;
            };

            pcd.pcd_type = Some(pcd_type);
            pcd.token_value = declared.token_value.clone();
            check_token_value(&pcd.token_value).map_err(|message| {
                AutoGenError::format_invalid(format!(
                    "{} of PCD [{}.{}] in [{}]",
                    message, space, name, package.meta_file
                ))
                .at(file, line)
            })?;
            pcd.datum_type = declared.datum_type;
            pcd.max_datum_size = declared.max_datum_size.clone();
            pcd.inf_default_value = pcd.default_value.clone();
            if pcd.default_value.is_empty() {
                pcd.default_value = declared.default_value.clone();
            }
            return Ok(pcd);
        }

        // Declared, but not with the type this module uses it as
        if model != PcdModel::Dynamic {
            let wanted = PcdType::from_model(model);
            if let Some((package, declared)) = self.packages.iter().find_map(|p| {
                p.declared_types(name, space).first().map(|t| (p, *t))
            }) {
                return Err(AutoGenError::option_conflict(format!(
                    "PCD [{}.{}] is used as [{}] in module {}, but declared as [{}] in package {}",
                    space, name, wanted, file, declared, package.meta_file
                ))
                .at(file, line));
            }
        }

        Err(AutoGenError::format_invalid(format!(
            "PCD [{}.{}] in [{}] is not found in dependent packages:",
            space, name, file
        ))
        .at(file, line)
        .with_extra(format!("\t{}", package_list(&self.packages))))
    }

    fn resolve_depex(&mut self, db: &BuildDatabase, arch: &str) -> AutoGenResult<()> {
        let file = self.meta_file.clone();
        let records = db.store().query(&file, RecordKind::Depex, Some(arch), None);

        // Binary-only modules carry their depex prebuilt
        if self.sources.is_empty() && !self.binaries.is_empty() {
            return Ok(());
        }

        if self.library_class.is_empty() && records.is_empty() && self.module_type.requires_depex() {
            return Err(AutoGenError::resource_not_available(format!(
                "No [Depex] section or no valid expression in [Depex] section for [{}] module",
                self.module_type
            ))
            .in_file(&file));
        }

        let mut tokens: IndexMap<(String, String), Vec<String>> = IndexMap::new();
        let mut expressions: IndexMap<(String, String), String> = IndexMap::new();
        for record in &records {
            let key = (record.arch.clone(), record.scope.clone());
            let list = tokens.entry(key.clone()).or_default();
            let expression = expressions.entry(key).or_default();

            for token in record.value(0).split_whitespace() {
                expression.push_str(token);
                expression.push(' ');

                if DEPEX_OPCODES.contains(&token) {
                    list.push(token.to_string());
                } else if token.ends_with(".inf") {
                    let dependency = db.module(&MetaFile::new(token), arch).map_err(|_| {
                        AutoGenError::resource_not_available("Module is not found in active platform")
                            .at(&file, record.line)
                            .with_extra(token)
                    })?;
                    list.push(dependency.guid.clone());
                } else {
                    let value = symbol_value(&self.packages, RecordKind::Protocol, token)
                        .or_else(|| symbol_value(&self.packages, RecordKind::Ppi, token))
                        .or_else(|| symbol_value(&self.packages, RecordKind::Guid, token))
                        .ok_or_else(|| {
                            AutoGenError::resource_not_available(format!(
                                "Value of [{}] is not found in",
                                token
                            ))
                            .at(&file, record.line)
                            .with_extra(package_list(&self.packages))
                        })?;
                    list.push(value);
                }
            }
        }

        for ((arch, scope), list) in tokens {
            self.depex.insert([arch.as_str(), scope.as_str()], list);
        }
        for ((arch, scope), expression) in expressions {
            self.depex_expression.insert([arch.as_str(), scope.as_str()], expression);
        }
        Ok(())
    }
}

fn parse_library_class(value: &str, file: &MetaFile, record: &Record) -> LibraryClassDecl {
    let fields = split_value_list(value, '|');
    let supported = match fields.get(1).filter(|types| !types.is_empty()) {
        None => ModuleType::ALL.to_vec(),
        Some(types) => split_upper_words(types)
            .into_iter()
            .filter_map(|t| match t.parse::<ModuleType>() {
                Ok(t) => Some(t),
                Err(_) => {
                    warn!(%file, line = record.line, "ignoring unknown module type [{}] in LIBRARY_CLASS", t);
                    None
                }
            })
            .collect(),
    };

    LibraryClassDecl {
        name: fields[0].clone(),
        supported,
    }
}

fn symbol_value(packages: &[Rc<PackageData>], kind: RecordKind, name: &str) -> Option<String> {
    packages.iter().find_map(|p| {
        let table = match kind {
            RecordKind::Protocol => &p.protocols,
            RecordKind::Ppi => &p.ppis,
            _ => &p.guids,
        };
        table.get(name).cloned()
    })
}

fn package_list(packages: &[Rc<PackageData>]) -> String {
    packages.iter().map(|p| p.meta_file.to_string()).join("\n\t")
}
