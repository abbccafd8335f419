//! Arbitration of wildcarded build options.
//!
//! Options are keyed `(family, TARGET_TOOLCHAIN_ARCH_COMMANDTYPE_ATTRIBUTE)` where any of the five
//! fields may be `*`. Expansion turns them into `tool -> attribute -> value` for one concrete
//! build context.
use crate::errors::{AutoGenError, AutoGenResult};
use firmplan_util::split::split_fields;
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

/// `tool -> attribute -> value`
pub type ToolOptions = IndexMap<String, IndexMap<String, String>>;

/// `(family, key) -> value`
pub type BuildOptions = IndexMap<(String, String), String>;

const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionKey<'a> {
    pub target: &'a str,
    pub toolchain: &'a str,
    pub arch: &'a str,
    pub command_type: &'a str,
    pub attribute: &'a str,
}

impl<'a> OptionKey<'a> {
    pub fn parse(key: &'a str) -> AutoGenResult<Self> {
        let Some([target, toolchain, arch, command_type, attribute]) = split_fields(key, '_') else {
            return Err(AutoGenError::format_invalid(format!(
                "Build option key [{}] is not TARGET_TOOLCHAIN_ARCH_COMMANDTYPE_ATTRIBUTE",
                key
            )));
        };
        Ok(OptionKey {
            target,
            toolchain,
            arch,
            command_type,
            attribute,
        })
    }

    /// 1 (only the attribute given) to 16 (every field given). Among keys naming the same number
    /// of fields the command type weighs most and the target least. A wildcard attribute has no
    /// priority at all.
    pub fn priority(&self) -> u8 {
        if self.attribute == WILDCARD {
            return 0;
        }
        let bit = |field: &str| u8::from(field != WILDCARD);
        bit(self.command_type) * 8 + bit(self.arch) * 4 + bit(self.toolchain) * 2 + bit(self.target) + 1
    }

    fn field_matches(a: &str, b: &str) -> bool {
        a == b || a == WILDCARD || b == WILDCARD
    }

    /// Whether some concrete key is matched by both.
    pub fn overlaps(&self, other: &OptionKey) -> bool {
        Self::field_matches(self.target, other.target)
            && Self::field_matches(self.toolchain, other.toolchain)
            && Self::field_matches(self.arch, other.arch)
            && Self::field_matches(self.command_type, other.command_type)
            && Self::field_matches(self.attribute, other.attribute)
    }
}

/// Concrete build context options are expanded for.
#[derive(Debug, Clone, Copy)]
pub struct OptionContext<'a> {
    pub target: &'a str,
    pub toolchain: &'a str,
    pub arch: &'a str,
    pub build_rule_family: &'a str,
    pub tool_definition: &'a ToolOptions,
}

impl OptionContext<'_> {
    fn selects(&self, key: &OptionKey) -> bool {
        (key.target == WILDCARD || key.target == self.target)
            && (key.toolchain == WILDCARD || key.toolchain == self.toolchain)
            && (key.arch == WILDCARD || key.arch == self.arch)
    }

    fn tool_attribute(&self, tool: &str, attribute: &str) -> &str {
        self.tool_definition
            .get(tool)
            .and_then(|attrs| attrs.get(attribute))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Of two overlapping `=` overrides for the build rule family, only the higher-priority one
    /// survives.
    fn drop_shadowed_overrides(&self, options: &mut BuildOptions) -> AutoGenResult<()> {
        let mut overrides: IndexSet<&str> = IndexSet::new();
        for ((family, key), value) in options.iter() {
            if family != self.build_rule_family || !value.starts_with('=') {
                continue;
            }
            if self.selects(&OptionKey::parse(key)?) {
                overrides.shift_remove(key.as_str());
                overrides.insert(key);
            }
        }
        if overrides.len() < 2 {
            return Ok(());
        }

        let overrides: Vec<String> = overrides.into_iter().map(String::from).collect();
        let mut dropped = vec![];
        for (index, now) in overrides.iter().enumerate() {
            let now_key = OptionKey::parse(now)?;
            for next in &overrides[index + 1..] {
                let next_key = OptionKey::parse(next)?;
                if !now_key.overlaps(&next_key) {
                    continue;
                }
                let (winner, loser) = if now_key.priority() > next_key.priority() {
                    (now, next)
                } else {
                    (next, now)
                };
                trace!(%winner, %loser, "override shadowed");
                dropped.push(loser.clone());
            }
        }
        for key in dropped {
            options.shift_remove(&(self.build_rule_family.to_string(), key));
        }
        Ok(())
    }

    fn merge(expanded: &mut ToolOptions, tool: &str, attribute: &str, value: &str) {
        let attrs = expanded.entry(tool.to_string()).or_default();
        match attrs.get_mut(attribute) {
            Some(existing) if attribute == "FLAGS" => {
                existing.push(' ');
                existing.push_str(value);
            }
            _ => {
                attrs.insert(attribute.to_string(), value.to_string());
            }
        }
    }

    /// Expand wildcarded `options` for this context.
    ///
    /// The first pass only keeps options whose family matches the tool's. If no option named a
    /// family for a known tool, or any of them matched, that is the result; otherwise a second pass
    /// adds options matching the tool's plain family.
    pub fn expand(&self, options: &BuildOptions) -> AutoGenResult<ToolOptions> {
        let mut options = options.clone();
        self.drop_shadowed_overrides(&mut options)?;

        let mut expanded = ToolOptions::new();
        let mut family_match = false;
        let mut family_is_null = true;

        for ((family, key), value) in &options {
            let key = OptionKey::parse(key)?;
            let tool = key.command_type;
            if self.tool_definition.contains_key(tool) && !family.is_empty() {
                family_is_null = false;
                let rule_family = self.tool_attribute(tool, "BUILDRULEFAMILY");
                let wanted = if rule_family.is_empty() {
                    self.tool_attribute(tool, "FAMILY")
                } else {
                    rule_family
                };
                if family != wanted {
                    continue;
                }
                family_match = true;
            }
            if self.selects(&key) {
                Self::merge(&mut expanded, tool, key.attribute, value);
            }
        }

        if family_match || family_is_null {
            return Ok(expanded);
        }

        debug!(arch = self.arch, "no build option matched a tool's family, retrying with FAMILY");
        for ((family, key), value) in &options {
            let key = OptionKey::parse(key)?;
            let tool = key.command_type;
            if !self.tool_definition.contains_key(tool) || family.is_empty() {
                continue;
            }
            if family != self.tool_attribute(tool, "FAMILY") {
                continue;
            }
            if self.selects(&key) {
                Self::merge(&mut expanded, tool, key.attribute, value);
            }
        }
        Ok(expanded)
    }
}

/// Layer expanded option sets over each other, first to last. A value starting with `=` replaces
/// what the earlier layers gave, anything else is appended.
pub fn layer_options(layers: &[&ToolOptions]) -> ToolOptions {
    let mut tools: IndexSet<&str> = IndexSet::new();
    for layer in layers {
        tools.extend(layer.keys().map(String::as_str));
    }

    let mut result = ToolOptions::new();
    for tool in tools {
        let attrs = result.entry(tool.to_string()).or_default();
        for layer in layers {
            let Some(options) = layer.get(tool) else {
                continue;
            };
            for (attribute, value) in options {
                let current = attrs.entry(attribute.clone()).or_default();
                if let Some(replacement) = value.strip_prefix('=') {
                    *current = replacement.to_string();
                } else if current.is_empty() {
                    *current = value.clone();
                } else {
                    current.push(' ');
                    current.push_str(value);
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod test {
    use super::{layer_options, BuildOptions, OptionContext, OptionKey, ToolOptions};
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    fn key(k: &str) -> OptionKey<'_> {
        OptionKey::parse(k).unwrap()
    }

    #[test]
    fn priorities() {
        assert_eq!(key("DEBUG_GCC5_X64_CC_FLAGS").priority(), 16);
        assert_eq!(key("*_GCC5_X64_CC_FLAGS").priority(), 15);
        assert_eq!(key("DEBUG_*_X64_CC_FLAGS").priority(), 14);
        assert_eq!(key("DEBUG_GCC5_*_CC_FLAGS").priority(), 12);
        assert_eq!(key("DEBUG_*_*_CC_FLAGS").priority(), 10);
        assert_eq!(key("*_*_*_CC_FLAGS").priority(), 9);
        assert_eq!(key("DEBUG_GCC5_X64_*_FLAGS").priority(), 8);
        assert_eq!(key("*_*_*_*_FLAGS").priority(), 1);
        assert_eq!(key("*_*_*_*_*").priority(), 0);
        assert!(OptionKey::parse("DEBUG_CC_FLAGS").is_err());
    }

    fn tool_definition() -> ToolOptions {
        let mut cc = IndexMap::new();
        cc.insert("PATH".to_string(), "gcc".to_string());
        cc.insert("FAMILY".to_string(), "GCC".to_string());
        let mut tools = ToolOptions::new();
        tools.insert("CC".to_string(), cc);
        tools
    }

    fn options(entries: &[(&str, &str, &str)]) -> BuildOptions {
        entries
            .iter()
            .map(|(f, k, v)| ((f.to_string(), k.to_string()), v.to_string()))
            .collect()
    }

    #[test]
    fn concrete_override_wins() {
        let tools = tool_definition();
        let context = OptionContext {
            target: "DEBUG",
            toolchain: "GCC5",
            arch: "X64",
            build_rule_family: "GCC",
            tool_definition: &tools,
        };
        let expanded = context
            .expand(&options(&[
                ("GCC", "*_*_*_CC_FLAGS", "=A"),
                ("GCC", "DEBUG_*_*_CC_FLAGS", "=B"),
            ]))
            .unwrap();
        assert_eq!(expanded["CC"]["FLAGS"], "=B");

        let layered = layer_options(&[&tools, &expanded]);
        assert_eq!(layered["CC"]["FLAGS"], "B");
        assert_eq!(layered["CC"]["PATH"], "gcc");
    }

    #[test]
    fn flags_accumulate_other_attributes_replace() {
        let tools = tool_definition();
        let context = OptionContext {
            target: "RELEASE",
            toolchain: "GCC5",
            arch: "X64",
            build_rule_family: "GCC",
            tool_definition: &tools,
        };
        let expanded = context
            .expand(&options(&[
                ("GCC", "*_*_*_CC_FLAGS", "-O2"),
                ("GCC", "*_*_X64_CC_FLAGS", "-m64"),
                ("GCC", "DEBUG_*_*_CC_FLAGS", "-g"),
                ("GCC", "*_*_*_CC_PATH", "cc1"),
                ("GCC", "*_*_*_CC_PATH", "cc2"),
                ("", "*_*_*_DLINK_FLAGS", "--gc-sections"),
            ]))
            .unwrap();
        assert_eq!(expanded["CC"]["FLAGS"], "-O2 -m64");
        assert_eq!(expanded["CC"]["PATH"], "cc2");
        assert_eq!(expanded["DLINK"]["FLAGS"], "--gc-sections");
    }

    #[test]
    fn family_fallback() {
        let mut tools = tool_definition();
        tools["CC"].insert("BUILDRULEFAMILY".to_string(), "GNU".to_string());
        let context = OptionContext {
            target: "DEBUG",
            toolchain: "GCC5",
            arch: "X64",
            build_rule_family: "GNU",
            tool_definition: &tools,
        };

        // Nothing matches BUILDRULEFAMILY, so FAMILY is tried
        let expanded = context
            .expand(&options(&[("GCC", "*_*_*_CC_FLAGS", "-Wall"), ("MSFT", "*_*_*_CC_FLAGS", "/W4")]))
            .unwrap();
        assert_eq!(expanded["CC"]["FLAGS"], "-Wall");

        let expanded = context
            .expand(&options(&[("GNU", "*_*_*_CC_FLAGS", "-Wextra"), ("GCC", "*_*_*_CC_FLAGS", "-Wall")]))
            .unwrap();
        assert_eq!(expanded["CC"]["FLAGS"], "-Wextra");
    }

    #[test]
    fn layering() {
        let layer = |value: &str| -> ToolOptions {
            let mut attrs = IndexMap::new();
            attrs.insert("FLAGS".to_string(), value.to_string());
            let mut tools = ToolOptions::new();
            tools.insert("CC".to_string(), attrs);
            tools
        };
        let (a, b, c) = (layer("-O1"), layer("-g"), layer("=-Os"));
        assert_eq!(layer_options(&[&a, &b])["CC"]["FLAGS"], "-O1 -g");
        assert_eq!(layer_options(&[&a, &c, &b])["CC"]["FLAGS"], "-Os -g");
    }
}
