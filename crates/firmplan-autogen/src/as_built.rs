//! Binary ("as built") module descriptors, written after a module is compiled so it can be
//! shipped without its sources.
use crate::autogen::ModuleAutoGen;
use crate::types::{ModuleType, PcdType};
use std::fmt::Write as _;

const AS_BUILT_INF_VERSION: &str = "0x00010016";

fn block(out: &mut String, prefix: &str, items: &[String]) {
    for item in items {
        out.push_str(prefix);
        out.push_str(item);
    }
}

impl ModuleAutoGen {
    /// Binary descriptor of this module given the files its build produced, or `None` for
    /// libraries, legacy modules and modules that are binary already.
    pub fn as_built_inf(&self, outputs: &[String], depex_generated: bool) -> Option<String> {
        let module = &self.module;
        if module.is_library() || module.is_legacy() || self.sources.is_empty() || !self.binaries.is_empty() {
            return None;
        }

        let dynamic_ex: Vec<_> = self
            .pcds()
            .filter(|pcd| pcd.pcd_type.is_some_and(|t| t.is_dynamic_ex()))
            .collect();

        let packages: Vec<String> = self
            .derived_packages
            .iter()
            .filter(|package| {
                dynamic_ex.iter().any(|pcd| {
                    package.pcd(&pcd.name, &pcd.token_space, PcdType::DynamicEx).is_some()
                        || package.pcd(&pcd.name, &pcd.token_space, PcdType::Dynamic).is_some()
                })
            })
            .map(|package| package.meta_file.to_string())
            .collect();

        let module_type = match module.module_type {
            ModuleType::UefiDriver if depex_generated => ModuleType::DxeDriver,
            other => other,
        };

        let mut binaries = vec![];
        for output in outputs {
            let ext = output
                .rfind('.')
                .map(|i| output[i..].to_ascii_lowercase())
                .unwrap_or_default();
            let item = match module.module_type {
                ModuleType::Base | ModuleType::UserDefined => match ext.as_str() {
                    ".aml" => format!("ASL|{}", output),
                    ".acpi" => format!("ACPI|{}", output),
                    _ => format!("BIN|{}", output),
                },
                _ if ext == ".efi" => format!("PE32|{}.efi", module.base_name),
                _ => format!("BIN|{}", output),
            };
            binaries.push(item);
        }
        if depex_generated {
            let depex = match module.module_type {
                ModuleType::Peim => Some("PEI_DEPEX"),
                ModuleType::DxeDriver
                | ModuleType::DxeRuntimeDriver
                | ModuleType::DxeSalDriver
                | ModuleType::UefiDriver => Some("DXE_DEPEX"),
                ModuleType::DxeSmmDriver => Some("SMM_DEPEX"),
                _ => None,
            };
            if let Some(kind) = depex {
                binaries.push(format!("{}|{}.depex", kind, module.base_name));
            }
        }

        let pcds: Vec<String> = dynamic_ex.iter().map(|pcd| pcd.full_name()).collect();

        let flags: Vec<String> = self
            .build_options
            .iter()
            .filter_map(|(tool, attributes)| {
                let value = attributes.get("FLAGS")?;
                Some(format!(
                    "{}:{}_{}_{}_{}_FLAGS = {}",
                    self.toolchain_family,
                    self.target,
                    self.toolchain,
                    self.arch,
                    tool,
                    value.trim()
                ))
            })
            .collect();

        let name = &module.base_name;
        let mut out = String::new();
        let _ = write!(
            out,
            "## @file\n# {name}\n#\n# DO NOT EDIT\n# FILE auto-generated Binary INF\n#\n##\n\n\
             [Defines]\n\
             \x20 INF_VERSION                = {AS_BUILT_INF_VERSION}\n\
             \x20 BASE_NAME                  = {name}\n\
             \x20 FILE_GUID                  = {}\n\
             \x20 MODULE_TYPE                = {}\n\
             \x20 VERSION_STRING             = {}",
            module.guid, module_type, module.version
        );
        if let Some(version) = module.specification.get("UEFI_SPECIFICATION_VERSION") {
            let _ = write!(out, "\n  UEFI_SPECIFICATION_VERSION = {}", version);
        }
        if let Some(version) = module.specification.get("PI_SPECIFICATION_VERSION") {
            let _ = write!(out, "\n  PI_SPECIFICATION_VERSION   = {}", version);
        }

        out.push_str("\n\n[Packages]");
        block(&mut out, "\n  ", &packages);
        let _ = write!(out, "\n\n[Binaries.{}]", self.arch);
        block(&mut out, "\n  ", &binaries);
        out.push_str("\n\n[PcdEx]");
        block(&mut out, "\n  ", &pcds);
        out.push_str("\n\n## @AsBuilt");
        block(&mut out, "\n##   ", &flags);
        out.push('\n');
        Some(out)
    }
}
