//! Staging of flash-offset (VPD) PCDs for the external offset fixup tool.
//!
//! The tool reads a text file of `Space.Name|Offset|Size|Value` rows, where an offset of `*`
//! asks it to pick one, and writes a `.map` file of the same shape with every offset filled in.
use crate::errors::{AutoGenError, AutoGenResult};
use crate::meta_file::MetaFile;
use crate::pcd::{Pcd, PcdId};
use firmplan_util::split::split_value_list;
use indexmap::IndexMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// Offset the fixup tool is asked to choose.
pub const AUTO_OFFSET: &str = "*";

const FILE_HEADER: &str = "## @file
#
#  THIS IS AUTO-GENERATED FILE BY BUILD TOOLS AND PLEASE DO NOT MAKE MODIFICATION.
#
#  This file lists all VPD information for a platform collected by build.exe.
#

";

#[derive(Debug, Clone, Default)]
pub struct VpdInfoFile {
    entries: IndexMap<PcdId, (Pcd, Vec<String>)>,
    /// Offsets read back from a map file.
    resolved: IndexMap<PcdId, Vec<String>>,
}

impl VpdInfoFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pcd: &Pcd, offset: &str) {
        let (_, offsets) = self
            .entries
            .entry(pcd.id())
            .or_insert_with(|| (pcd.clone(), vec![]));
        if !offsets.iter().any(|o| o == offset) {
            offsets.push(offset.to_string());
        }
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, id: &PcdId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn render(&self) -> String {
        let mut content = FILE_HEADER.to_string();
        for (pcd, offsets) in self.entries.values() {
            let value = match pcd.first_sku_value().trim() {
                "" => pcd.default_value.as_str(),
                value => value,
            };
            // Fixed-width items go without a MaxDatumSize
            let size = pcd
                .max_datum_size
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .or_else(|| pcd.datum_type.and_then(|t| t.size()).map(|s| s.to_string()))
                .unwrap_or_default();
            for offset in offsets {
                let _ = writeln!(
                    content,
                    "{}|{}|{}|{}",
                    pcd.full_name(),
                    offset.trim(),
                    size,
                    value
                );
            }
        }
        content
    }

    pub fn write(&self, path: &Path) -> AutoGenResult<()> {
        debug!(path = %path.display(), count = self.count(), "writing VPD information");
        fs::write(path, self.render()).map_err(|e| {
            AutoGenError::file_write_failure(format!(
                "Fail to write VPD information file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Read offsets back from a map file produced by the fixup tool.
    pub fn read(&mut self, path: &Path) -> AutoGenResult<()> {
        let text = fs::read_to_string(path).map_err(|e| {
            AutoGenError::file_read_failure(format!(
                "Can not read VPD map file {}: {}",
                path.display(),
                e
            ))
        })?;
        self.parse_map(&text, path)
    }

    fn parse_map(&mut self, text: &str, path: &Path) -> AutoGenResult<()> {
        let map_file = MetaFile::new(path.to_string_lossy());
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields = split_value_list(line, '|');
            let [name, offset, _size, _value] = &fields[..] else {
                return Err(AutoGenError::format_invalid("Wrong VPD line format")
                    .at(&map_file, index as u32 + 1)
                    .with_extra(line));
            };
            let Some((space, name)) = name.split_once('.') else {
                return Err(AutoGenError::format_invalid(format!("Invalid PCD name [{}]", name))
                    .at(&map_file, index as u32 + 1));
            };
            self.resolved
                .entry((name.to_string(), space.to_string()))
                .or_default()
                .push(offset.to_string());
        }
        Ok(())
    }

    /// Offset the map file gave the `index`-th SKU of `id`.
    pub fn offset(&self, id: &PcdId, index: usize) -> Option<&str> {
        self.resolved
            .get(id)
            .and_then(|offsets| offsets.get(index))
            .map(String::as_str)
    }
}

/// The external tool that assigns `*` offsets.
pub trait OffsetFixupTool {
    /// Process `input`, leaving `<input stem>.map` next to it.
    fn run(&self, tool: &str, input: &Path) -> AutoGenResult<()>;
}

/// Runs the tool as a child process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessFixupTool;

impl OffsetFixupTool for ProcessFixupTool {
    fn run(&self, tool: &str, input: &Path) -> AutoGenResult<()> {
        let base = input.with_extension("");
        let base = base.to_string_lossy();
        info!(%tool, input = %input.display(), "running VPD fixup tool");

        let output = Command::new(tool)
            .arg("-o")
            .arg(format!("{}.bin", base))
            .arg("-m")
            .arg(format!("{}.map", base))
            .arg("-q")
            .arg("-f")
            .arg(input)
            .output()
            .map_err(|e| AutoGenError::file_not_found(format!("Fail to run VPD tool [{}]: {}", tool, e)))?;

        if !output.status.success() {
            return Err(AutoGenError::autogen(format!(
                "Fail to call VPD tool [{}]",
                tool
            ))
            .with_extra(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        Ok(())
    }
}
