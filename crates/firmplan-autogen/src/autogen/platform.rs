use crate::build_option::{layer_options, BuildOptions, OptionContext, ToolOptions};
use crate::config::BuildConfig;
use crate::errors::{AutoGenError, AutoGenResult};
use crate::meta_file::MetaFile;
use crate::module::ModuleData;
use crate::platform::{ModuleStyle, PlatformData};
use indexmap::IndexMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info};

/// A platform built for one `(target, toolchain, arch)`.
#[derive(Debug)]
pub struct PlatformAutoGen {
    pub platform: Rc<PlatformData>,
    pub workspace_dir: PathBuf,
    pub target: String,
    pub toolchain: String,
    pub arch: String,
    pub toolchain_family: String,
    pub build_rule_family: String,
    pub flash_definition: Option<MetaFile>,
    /// `$(OUTPUT_DIRECTORY)/<target>_<toolchain>`
    pub build_dir: PathBuf,
    /// `<build_dir>/<arch>`
    pub make_file_dir: PathBuf,
    /// Tool → attribute → value, for exactly this target, toolchain and arch.
    pub tool_definition: ToolOptions,
    pub dll_paths: Vec<String>,
    pub build_command: Vec<String>,
    uni_flag: Option<String>,
    /// Platform options expanded for modules of either style, and of both.
    edk_build_options: ToolOptions,
    edkii_build_options: ToolOptions,
    all_build_options: ToolOptions,
}

impl PlatformAutoGen {
    pub fn new(config: &BuildConfig, platform: Rc<PlatformData>) -> AutoGenResult<Self> {
        let arch = platform.arch.clone();
        info!(platform = %platform.meta_file, %arch, target = %config.target, toolchain = %config.toolchain, "platform autogen");

        let output = Path::new(&platform.output_directory);
        let output = if output.is_absolute() {
            output.to_path_buf()
        } else {
            config.workspace_dir.join(output)
        };
        let build_dir = output.join(format!("{}_{}", config.target, config.toolchain));
        let make_file_dir = build_dir.join(&arch);

        if config.tools_def.is_empty() {
            return Err(AutoGenError::resource_not_available("No tools found in configuration")
                .with_extra("[platform]"));
        }

        let mut tool_definition = ToolOptions::new();
        let mut dll_paths = vec![];
        for (tool, attribute, value) in config
            .tools_def
            .entries_for(&config.target, &config.toolchain, &arch)
        {
            if attribute == "DLL" {
                dll_paths.push(value);
                continue;
            }
            tool_definition.entry(tool).or_default().insert(attribute, value);
        }

        let mut build_command = vec![];
        if let Some(make) = tool_definition.get("MAKE") {
            if let Some(path) = make.get("PATH") {
                build_command.extend(path.split_whitespace().map(String::from));
                if let Some(flags) = make.get("FLAGS") {
                    build_command.push(flags.clone());
                }
            }
        }

        let mut autogen = PlatformAutoGen {
            toolchain_family: config.tools_def.family(&config.toolchain),
            build_rule_family: config.tools_def.build_rule_family(&config.toolchain),
            flash_definition: config
                .flash_definition
                .clone()
                .or_else(|| platform.flash_definition.clone()),
            workspace_dir: config.workspace_dir.clone(),
            target: config.target.clone(),
            toolchain: config.toolchain.clone(),
            arch,
            build_dir,
            make_file_dir,
            tool_definition,
            dll_paths,
            build_command,
            uni_flag: config.uni_flag.clone(),
            edk_build_options: ToolOptions::new(),
            edkii_build_options: ToolOptions::new(),
            all_build_options: ToolOptions::new(),
            platform,
        };

        autogen.edk_build_options =
            autogen.expand_build_options(&autogen.platform.build_options(Some(ModuleStyle::Edk)))?;
        autogen.edkii_build_options =
            autogen.expand_build_options(&autogen.platform.build_options(Some(ModuleStyle::EdkII)))?;
        autogen.all_build_options = autogen.expand_build_options(&autogen.platform.build_options(None))?;
        Ok(autogen)
    }

    pub fn meta_file(&self) -> &MetaFile {
        &self.platform.meta_file
    }

    pub fn option_context(&self) -> OptionContext<'_> {
        OptionContext {
            target: &self.target,
            toolchain: &self.toolchain,
            arch: &self.arch,
            build_rule_family: &self.build_rule_family,
            tool_definition: &self.tool_definition,
        }
    }

    pub fn expand_build_options(&self, options: &BuildOptions) -> AutoGenResult<ToolOptions> {
        self.option_context().expand(options)
    }

    /// Platform options for modules of `style`, already expanded.
    pub fn build_options(&self, style: Option<ModuleStyle>) -> &ToolOptions {
        match style {
            Some(ModuleStyle::Edk) => &self.edk_build_options,
            Some(ModuleStyle::EdkII) => &self.edkii_build_options,
            None => &self.all_build_options,
        }
    }

    /// Whether `file` is one of the platform's components.
    pub fn valid_module(&self, file: &MetaFile) -> bool {
        self.platform.modules.contains_key(file)
    }

    /// Options for `module`: tool defaults, then the module's own options, then the platform's,
    /// then those the platform gives this component alone.
    pub fn apply_build_option(&self, module: &ModuleData) -> AutoGenResult<ToolOptions> {
        let module_options = self.expand_build_options(&module.build_options)?;
        let style = if module.is_legacy() {
            ModuleStyle::Edk
        } else {
            ModuleStyle::EdkII
        };
        let component_options = match self.platform.modules.get(&module.meta_file) {
            Some(component) => self.expand_build_options(&component.build_options)?,
            None => ToolOptions::new(),
        };

        let mut options = layer_options(&[
            &self.tool_definition,
            &module_options,
            self.build_options(Some(style)),
            &component_options,
        ]);

        if module.is_legacy() {
            if let Some(flag) = &self.uni_flag {
                options
                    .entry("BUILD".to_string())
                    .or_default()
                    .insert("FLAGS".to_string(), flag.clone());
            }
        }
        Ok(options)
    }

    /// `<make_file_dir>/TOOLS_DEF.<arch>`
    pub fn tool_def_file(&self) -> PathBuf {
        self.make_file_dir.join(format!("TOOLS_DEF.{}", self.arch))
    }

    /// Contents of the tools definition makefile fragment: `TOOL = path` and
    /// `TOOL_ATTRIBUTE = value` per tool, with platform options folded in.
    pub fn tool_def_text(&self) -> String {
        let mut text = String::new();
        for (tool, attributes) in &self.tool_definition {
            if tool == "MAKE" {
                continue;
            }
            for (attribute, value) in attributes {
                let mut value = value.clone();
                if let Some(option) = self
                    .all_build_options
                    .get(tool)
                    .and_then(|options| options.get(attribute))
                {
                    match option.strip_prefix('=') {
                        Some(replacement) => value = replacement.to_string(),
                        None => {
                            value.push(' ');
                            value.push_str(option);
                        }
                    }
                }
                if attribute == "PATH" {
                    let _ = writeln!(text, "{} = {}", tool, value);
                } else {
                    let _ = writeln!(text, "{}_{} = {}", tool, attribute, value);
                }
            }
            text.push('\n');
        }
        text
    }

    /// Environment a build of this platform runs with.
    pub fn macros(&self) -> IndexMap<&'static str, String> {
        let platform = &self.platform;
        let mut macros = IndexMap::new();
        macros.insert("PLATFORM_NAME", platform.name.clone());
        macros.insert("PLATFORM_GUID", platform.guid.clone());
        macros.insert("PLATFORM_VERSION", platform.version.clone());
        macros.insert("PLATFORM_RELATIVE_DIR", platform.meta_file.dir().to_string());
        macros.insert(
            "PLATFORM_DIR",
            self.workspace_dir
                .join(platform.meta_file.dir())
                .to_string_lossy()
                .into_owned(),
        );
        macros.insert("PLATFORM_OUTPUT_DIR", platform.output_directory.clone());
        debug!(platform = %platform.meta_file, "platform macros ready");
        macros
    }
}
