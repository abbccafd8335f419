//! Inputs of a workspace pass.
use crate::errors::{AutoGenError, AutoGenResult};
use crate::meta_file::MetaFile;
use crate::pcd::PcdId;
use derive_builder::Builder;
use firmplan_util::split::split_fields;
use indexmap::{IndexMap, IndexSet};
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_FAMILY: &str = "MSFT";

/// Tool definitions as `TARGET_TOOLCHAIN_ARCH_TOOL_ATTRIBUTE = value` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolsDef {
    entries: IndexMap<String, String>,
}

impl ToolsDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `KEY = VALUE` lines. `#` starts a comment, blank lines are ignored.
    pub fn parse_str(text: &str) -> AutoGenResult<Self> {
        let mut tools = ToolsDef::new();
        for (number, line) in text.lines().enumerate() {
            let line = match line.find('#') {
                Some(comment) => &line[..comment],
                None => line,
            }
            .trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(AutoGenError::format_invalid(format!(
                    "Expected KEY = VALUE at line {}: {}",
                    number + 1,
                    line
                )));
            };
            let key = key.trim();
            if split_fields::<5>(key, '_').is_none() {
                return Err(AutoGenError::format_invalid(format!(
                    "Tool definition key [{}] at line {} is not TARGET_TOOLCHAIN_ARCH_TOOL_ATTRIBUTE",
                    key,
                    number + 1
                )));
            }
            tools.insert(key, value.trim());
        }
        Ok(tools)
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries applying to the concrete `(target, toolchain, arch)`, as
    /// `(tool, attribute, value)`. A concrete key field beats a `*` one, and a `*` tool stands
    /// for every tool the table names.
    pub fn entries_for(&self, target: &str, toolchain: &str, arch: &str) -> Vec<(String, String, String)> {
        let tools: IndexSet<&str> = self
            .entries
            .keys()
            .filter_map(|key| key.split('_').nth(3))
            .filter(|tool| *tool != "*")
            .collect();

        let mut matched: Vec<(usize, &str, &str, &str)> = vec![];
        for (key, value) in &self.entries {
            let Some([t, tc, a, tool, attr]) = split_fields(key, '_') else {
                continue;
            };
            let Some(specificity) = [(t, target), (tc, toolchain), (a, arch)]
                .iter()
                .try_fold(0, |acc, (field, wanted)| match *field {
                    "*" => Some(acc),
                    f if f == *wanted => Some(acc + 2),
                    _ => None,
                })
            else {
                continue;
            };
            if tool == "*" {
                matched.extend(tools.iter().map(|tool| (specificity, *tool, attr, value.as_str())));
            } else {
                matched.push((specificity + 1, tool, attr, value.as_str()));
            }
        }
        matched.sort_by_key(|(specificity, ..)| *specificity);

        let mut resolved: IndexMap<(String, String), String> = IndexMap::new();
        for (_, tool, attr, value) in matched {
            resolved.insert((tool.to_string(), attr.to_string()), value.to_string());
        }
        resolved
            .into_iter()
            .map(|((tool, attr), value)| (tool, attr, value))
            .collect()
    }

    fn toolchain_attribute(&self, toolchain: &str, attribute: &str) -> Option<&str> {
        self.entries.iter().find_map(|(key, value)| {
            match split_fields(key, '_') {
                Some([_, tc, _, _, attr]) if tc == toolchain && attr == attribute && !value.is_empty() => {
                    Some(value.as_str())
                }
                _ => None,
            }
        })
    }

    /// `FAMILY` of `toolchain`, `MSFT` when none is configured.
    pub fn family(&self, toolchain: &str) -> String {
        self.toolchain_attribute(toolchain, "FAMILY")
            .map(String::from)
            .unwrap_or_else(|| {
                debug!("No tool chain family found in configuration for {}. Default to MSFT.", toolchain);
                DEFAULT_FAMILY.to_string()
            })
    }

    /// `BUILDRULEFAMILY` of `toolchain`, `MSFT` when none is configured.
    pub fn build_rule_family(&self, toolchain: &str) -> String {
        self.toolchain_attribute(toolchain, "BUILDRULEFAMILY")
            .map(String::from)
            .unwrap_or_else(|| {
                debug!("No build rule family found in configuration for {}. Default to MSFT.", toolchain);
                DEFAULT_FAMILY.to_string()
            })
    }
}

/// Everything a workspace pass needs besides the descriptors themselves.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct BuildConfig {
    pub workspace_dir: PathBuf,
    pub active_platform: MetaFile,
    pub target: String,
    pub toolchain: String,
    pub arch_list: Vec<String>,
    /// SKU selected on the command line; the platform's own choice otherwise.
    #[builder(default)]
    pub sku_id: Option<String>,
    #[builder(default)]
    pub tools_def: ToolsDef,
    #[builder(default)]
    pub flash_definition: Option<MetaFile>,
    /// PCD values the flash layout assigns.
    #[builder(default)]
    pub flash_pcds: IndexMap<PcdId, String>,
    /// `BUILD` tool flags forced on legacy modules.
    #[builder(default)]
    pub uni_flag: Option<String>,
}

#[cfg(test)]
mod test {
    use super::{BuildConfigBuilder, ToolsDef};
    use crate::meta_file::MetaFile;
    use pretty_assertions::assert_eq;

    const TOOLS: &str = "
# comment
*_GCC5_*_*_FAMILY          = GCC
*_GCC5_*_*_BUILDRULEFAMILY = GNU
*_GCC5_X64_CC_PATH         = gcc
DEBUG_GCC5_X64_CC_PATH     = gcc-debug   # trailing comment
*_GCC5_X64_CC_FLAGS        = -Os
*_GCC5_IA32_CC_FLAGS       = -m32
";

    #[test]
    fn parse_and_select() {
        let tools = ToolsDef::parse_str(TOOLS).unwrap();
        assert_eq!(tools.family("GCC5"), "GCC");
        assert_eq!(tools.build_rule_family("GCC5"), "GNU");
        assert_eq!(tools.family("VS2019"), "MSFT");

        let entries = tools.entries_for("DEBUG", "GCC5", "X64");
        assert!(entries.contains(&("CC".into(), "PATH".into(), "gcc-debug".into())));
        assert!(entries.contains(&("CC".into(), "FLAGS".into(), "-Os".into())));
        assert!(!entries.iter().any(|(_, _, v)| v == "-m32"));
        assert!(entries.contains(&("CC".into(), "FAMILY".into(), "GCC".into())));
    }

    #[test]
    fn bad_lines() {
        assert!(ToolsDef::parse_str("NOT A DEFINITION").is_err());
        assert!(ToolsDef::parse_str("A_B = c").is_err());
    }

    #[test]
    fn builder_defaults() {
        let config = BuildConfigBuilder::default()
            .workspace_dir("/ws")
            .active_platform(MetaFile::new("Pkg/Pkg.dsc"))
            .target("DEBUG")
            .toolchain("GCC5")
            .arch_list(vec!["X64".to_string()])
            .build()
            .unwrap();
        assert_eq!(config.sku_id, None);
        assert!(config.tools_def.is_empty());
        assert!(BuildConfigBuilder::default().build().is_err());
    }
}
