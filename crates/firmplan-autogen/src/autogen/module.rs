use super::{PlatformAutoGen, WorkspaceAutoGen};
use crate::build_option::ToolOptions;
use crate::depex::{merge_depex, merge_depex_expression};
use crate::errors::AutoGenResult;
use crate::library::linked_libraries;
use crate::meta_file::MetaFile;
use crate::module::{BinaryFile, ModuleData, SourceFile};
use crate::override_chain::apply_pcd_setting;
use crate::package::PackageData;
use crate::pcd::{Pcd, PcdId};
use crate::platform::PlatformData;
use crate::types::{ModuleType, ARCH_COMMON};
use indexmap::IndexMap;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{debug, trace};

/// A module built inside one platform context. Libraries get a context of their own, with no
/// libraries of their own.
#[derive(Debug)]
pub struct ModuleAutoGen {
    pub module: Rc<ModuleData>,
    pub platform: Rc<PlatformData>,
    pub workspace_dir: PathBuf,
    pub target: String,
    pub toolchain: String,
    pub toolchain_family: String,
    pub arch: String,
    /// `<platform build dir>/<arch>/<module dir>/<base name>`
    pub build_dir: PathBuf,
    pub output_dir: PathBuf,
    pub debug_dir: PathBuf,
    pub source_override_dir: Option<PathBuf>,
    /// Make flavour (`nmake`, `gmake`) → custom makefile.
    pub custom_makefile: IndexMap<&'static str, PathBuf>,
    pub macros: IndexMap<&'static str, String>,
    /// Library instances in link order.
    pub libraries: Vec<Rc<ModuleData>>,
    pub library_autogens: Vec<Rc<ModuleAutoGen>>,
    pub derived_packages: Vec<Rc<PackageData>>,
    pub module_pcds: Vec<Pcd>,
    /// PCDs only the libraries use.
    pub library_pcds: Vec<Pcd>,
    pub guids: IndexMap<String, String>,
    pub protocols: IndexMap<String, String>,
    pub ppis: IndexMap<String, String>,
    pub include_paths: Vec<PathBuf>,
    pub sources: Vec<SourceFile>,
    pub binaries: Vec<BinaryFile>,
    pub depex: IndexMap<ModuleType, Vec<String>>,
    pub depex_expression: IndexMap<ModuleType, String>,
    pub build_options: ToolOptions,
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

impl ModuleAutoGen {
    pub(crate) fn new(
        workspace: &WorkspaceAutoGen,
        platform: &PlatformAutoGen,
        module: Rc<ModuleData>,
    ) -> AutoGenResult<Self> {
        let arch = platform.arch.clone();
        let file = module.meta_file.clone();
        debug!(module = %file, %arch, "module autogen");

        let workspace_dir = platform.workspace_dir.clone();
        let build_dir = platform
            .build_dir
            .join(&arch)
            .join(file.dir())
            .join(module.base_name.as_str());
        let output_dir = build_dir.join("OUTPUT");
        let debug_dir = build_dir.join("DEBUG");

        let source_override_dir = platform
            .platform
            .modules
            .get(&file)
            .and_then(|component| component.source_override_path.as_ref())
            .map(|path| path.to_path(&workspace_dir));

        let mut custom_makefile = IndexMap::new();
        for (family, makefile) in &module.custom_makefile {
            let flavour = match family.as_str() {
                "GCC" => "gmake",
                _ => "nmake",
            };
            let overridden = source_override_dir
                .as_ref()
                .map(|dir| dir.join(makefile.file_name()))
                .filter(|path| path.exists());
            custom_makefile.insert(flavour, overridden.unwrap_or_else(|| makefile.to_path(&workspace_dir)));
        }

        let libraries = linked_libraries(workspace.database(), &platform.platform, &module)?;

        let mut library_autogens = Vec::with_capacity(libraries.len());
        for library in &libraries {
            library_autogens.push(workspace.library_autogen(platform, &library.meta_file)?);
        }

        let mut derived_packages: Vec<Rc<PackageData>> = vec![];
        for package in std::iter::once(&module)
            .chain(libraries.iter())
            .flat_map(|m| m.packages.iter())
        {
            if !derived_packages.iter().any(|p| p.meta_file == package.meta_file) {
                derived_packages.push(package.clone());
            }
        }

        // HII variable GUIDs may come from any package of the platform
        let platform_packages = workspace.platform_packages(platform)?;
        let module_pcds = apply_pcd_setting(&platform.platform, &file, module.pcds.clone(), &platform_packages)?;

        let mut library_only: IndexMap<PcdId, Pcd> = IndexMap::new();
        for library in &libraries {
            for (id, pcd) in &library.pcds {
                if module.pcds.contains_key(id) || library_only.contains_key(id) {
                    continue;
                }
                library_only.insert(id.clone(), pcd.clone());
            }
        }
        let library_pcds = apply_pcd_setting(&platform.platform, &file, library_only, &platform_packages)?;

        let mut guids = module.guids.clone();
        let mut protocols = module.protocols.clone();
        let mut ppis = module.ppis.clone();
        for library in &libraries {
            guids.extend(library.guids.clone());
            protocols.extend(library.protocols.clone());
            ppis.extend(library.ppis.clone());
        }

        let mut include_paths = vec![];
        if module.is_legacy() {
            for include in &module.includes {
                let include = include.to_path(&workspace_dir);
                let arch_include = include.join(capitalize(&arch));
                include_paths.push(include);
                if arch_include.exists() {
                    include_paths.push(arch_include);
                }
            }
        } else {
            include_paths.push(workspace_dir.join(file.dir()));
        }
        include_paths.push(debug_dir.clone());
        for package in &derived_packages {
            let package_dir = workspace_dir.join(package.meta_file.dir());
            for path in std::iter::once(package_dir).chain(package.includes.iter().map(|i| i.to_path(&workspace_dir))) {
                if !include_paths.contains(&path) {
                    include_paths.push(path);
                }
            }
        }

        let mut sources = vec![];
        for source in &module.sources {
            if !["", "*", platform.toolchain.as_str()].contains(&source.tag.as_str()) {
                trace!(file = %source.file, tag = %source.tag, "source skipped for tag");
                continue;
            }
            if !["", "*", platform.toolchain_family.as_str()].contains(&source.family.as_str()) {
                trace!(file = %source.file, family = %source.family, "source skipped for family");
                continue;
            }
            if !module.is_legacy() {
                let dir = workspace_dir.join(source.file.dir());
                if !include_paths.contains(&dir) {
                    include_paths.insert(0, dir);
                }
            }
            sources.push(source.clone());
        }

        let binaries = module
            .binaries
            .iter()
            .filter(|b| [ARCH_COMMON, "*", platform.target.as_str()].contains(&b.target.as_str()))
            .cloned()
            .collect();

        let depex = merge_depex(&module, &libraries, &arch);
        let depex_expression = merge_depex_expression(&module, &libraries, &arch);
        let build_options = platform.apply_build_option(&module)?;

        let mut autogen = ModuleAutoGen {
            platform: platform.platform.clone(),
            workspace_dir,
            target: platform.target.clone(),
            toolchain: platform.toolchain.clone(),
            toolchain_family: platform.toolchain_family.clone(),
            arch,
            build_dir,
            output_dir,
            debug_dir,
            source_override_dir,
            custom_makefile,
            macros: IndexMap::new(),
            libraries,
            library_autogens,
            derived_packages,
            module_pcds,
            library_pcds,
            guids,
            protocols,
            ppis,
            include_paths,
            sources,
            binaries,
            depex,
            depex_expression,
            build_options,
            module,
        };
        autogen.macros = autogen.build_macros(platform);
        Ok(autogen)
    }

    fn build_macros(&self, platform: &PlatformAutoGen) -> IndexMap<&'static str, String> {
        let module = &self.module;
        let path = |p: &std::path::Path| p.to_string_lossy().into_owned();
        let bin_dir = platform.build_dir.join(&self.arch);

        let mut macros = IndexMap::new();
        macros.insert("WORKSPACE", path(&self.workspace_dir));
        macros.insert("MODULE_NAME", module.base_name.clone());
        macros.insert("MODULE_GUID", module.guid.clone());
        macros.insert("MODULE_VERSION", module.version.clone());
        macros.insert("MODULE_TYPE", module.module_type.to_string());
        macros.insert("MODULE_FILE", path(&module.meta_file.to_path(&self.workspace_dir)));
        macros.insert("MODULE_DIR", path(&self.workspace_dir.join(module.meta_file.dir())));
        macros.insert("BASE_NAME", module.base_name.clone());
        macros.insert("ARCH", self.arch.clone());
        macros.insert("TOOLCHAIN", self.toolchain.clone());
        macros.insert("TOOLCHAIN_TAG", self.toolchain.clone());
        macros.insert("TARGET", self.target.clone());
        macros.insert("BUILD_DIR", path(&platform.build_dir));
        macros.insert("BIN_DIR", path(&bin_dir));
        macros.insert("LIB_DIR", path(&bin_dir));
        macros.insert("MODULE_BUILD_DIR", path(&self.build_dir));
        macros.insert("OUTPUT_DIR", path(&self.output_dir));
        macros.insert("DEBUG_DIR", path(&self.debug_dir));
        macros.extend(platform.macros());
        macros
    }

    pub fn meta_file(&self) -> &MetaFile {
        &self.module.meta_file
    }

    pub fn name(&self) -> &str {
        &self.module.base_name
    }

    pub fn guid(&self) -> &str {
        &self.module.guid
    }

    pub fn module_type(&self) -> ModuleType {
        self.module.module_type
    }

    pub fn is_library(&self) -> bool {
        self.module.is_library()
    }

    /// Module PCDs followed by library-only PCDs.
    pub fn pcds(&self) -> impl Iterator<Item = &Pcd> {
        self.module_pcds.iter().chain(self.library_pcds.iter())
    }
}
