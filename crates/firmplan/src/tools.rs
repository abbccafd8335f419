//! Tool definition and build option resolution for a single build context, without a platform.
use anyhow::{bail, Context, Result};
use firmplan_autogen::build_option::{layer_options, BuildOptions, OptionContext, ToolOptions};
use firmplan_autogen::ToolsDef;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::debug;

/// What a build of `target`/`toolchain`/`arch` would run its tools with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolsReport {
    pub family: String,
    pub build_rule_family: String,
    pub tool_definition: ToolOptions,
    /// The given options arbitrated for this context, `None` when none were given.
    pub build_options: Option<ToolOptions>,
}

pub fn load_tools_def(path: &Path) -> Result<ToolsDef> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read tool definitions from {}", path.display()))?;
    ToolsDef::parse_str(&text).with_context(|| format!("invalid tool definitions in {}", path.display()))
}

/// Parse `FAMILY:KEY=VALUE`. The family is optional; `KEY==VALUE` keeps the leading `=` that
/// marks a replacing option.
pub fn parse_option(text: &str) -> Result<((String, String), String)> {
    let Some((lhs, value)) = text.split_once('=') else {
        bail!("build option [{}] is not FAMILY:KEY=VALUE", text);
    };
    let (family, key) = match lhs.split_once(':') {
        Some((family, key)) => (family.trim(), key.trim()),
        None => ("", lhs.trim()),
    };
    if key.split('_').count() != 5 {
        bail!("build option key [{}] is not TARGET_TOOLCHAIN_ARCH_TOOL_ATTRIBUTE", key);
    }
    Ok(((family.to_string(), key.to_string()), value.trim().to_string()))
}

pub fn resolve(
    tools_def: &ToolsDef,
    target: &str,
    toolchain: &str,
    arch: &str,
    options: &BuildOptions,
) -> Result<ToolsReport> {
    let mut tool_definition = ToolOptions::new();
    for (tool, attribute, value) in tools_def.entries_for(target, toolchain, arch) {
        tool_definition.entry(tool).or_default().insert(attribute, value);
    }
    if tool_definition.is_empty() {
        bail!("no tools defined for {}_{}_{}", target, toolchain, arch);
    }

    let family = tools_def.family(toolchain);
    let build_rule_family = tools_def.build_rule_family(toolchain);
    debug!(%family, %build_rule_family, tools = tool_definition.len(), "tool definition resolved");

    let build_options = if options.is_empty() {
        None
    } else {
        let context = OptionContext {
            target,
            toolchain,
            arch,
            build_rule_family: &build_rule_family,
            tool_definition: &tool_definition,
        };
        let expanded = context.expand(options).context("failed to arbitrate build options")?;
        Some(layer_options(&[&tool_definition, &expanded]))
    };

    Ok(ToolsReport {
        family,
        build_rule_family,
        tool_definition,
        build_options,
    })
}

fn render_table(out: &mut String, table: &ToolOptions) {
    for (tool, attributes) in table {
        let _ = writeln!(out, "[{}]", tool);
        for (attribute, value) in attributes {
            let _ = writeln!(out, "  {:<16} = {}", attribute, value);
        }
    }
}

pub fn render(report: &ToolsReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "FAMILY           = {}", report.family);
    let _ = writeln!(out, "BUILDRULEFAMILY  = {}", report.build_rule_family);
    out.push('\n');
    render_table(&mut out, &report.tool_definition);
    if let Some(options) = &report.build_options {
        out.push_str("\n# with build options\n");
        render_table(&mut out, options);
    }
    out
}
