use crate::errors::{AutoGenError, AutoGenResult};
use derive_more::Display;
use std::path::{Path, PathBuf};

/// Workspace-relative descriptor path. Equality and hashing use the normalized form, so
/// `Pkg\\Foo\\.\\Foo.inf` and `Pkg/Foo/Foo.inf` are the same file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{path}")]
pub struct MetaFile {
    path: String,
}

impl MetaFile {
    pub fn new(path: impl AsRef<str>) -> Self {
        MetaFile {
            path: normalize(path.as_ref()),
        }
    }

    /// `relative` interpreted inside `dir`.
    pub fn in_dir(dir: &str, relative: &str) -> Self {
        if dir.is_empty() {
            MetaFile::new(relative)
        } else {
            MetaFile::new(format!("{}/{}", dir, relative))
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Directory part, empty for files at the workspace root.
    pub fn dir(&self) -> &str {
        self.path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit_once('/').map(|(_, name)| name).unwrap_or(&self.path)
    }

    /// File name without extension.
    pub fn base_name(&self) -> &str {
        let name = self.file_name();
        name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
    }

    /// Extension including the leading dot, or empty.
    pub fn ext(&self) -> &str {
        let name = self.file_name();
        name.rfind('.').map(|i| &name[i..]).unwrap_or("")
    }

    pub fn to_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.path)
    }

    pub fn validate(&self, expected_ext: &str) -> AutoGenResult<()> {
        if self.path.is_empty() {
            return Err(AutoGenError::file_not_found("Empty file path"));
        }
        if !self.ext().eq_ignore_ascii_case(expected_ext) {
            return Err(AutoGenError::format_invalid(format!(
                "Invalid file type [{}], expected [{}]",
                self.ext(),
                expected_ext
            ))
            .in_file(self));
        }
        Ok(())
    }
}

impl From<&str> for MetaFile {
    fn from(value: &str) -> Self {
        MetaFile::new(value)
    }
}

fn normalize(input: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in input.trim().split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod test {
    use super::MetaFile;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalized_identity() {
        let a = MetaFile::new(r"MdePkg\Library\.\BaseLib\BaseLib.inf");
        let b = MetaFile::new("MdePkg/Library/Foo/../BaseLib/BaseLib.inf");
        assert_eq!(a, b);
        assert_eq!(a.dir(), "MdePkg/Library/BaseLib");
        assert_eq!(a.base_name(), "BaseLib");
        assert_eq!(a.ext(), ".inf");
    }

    #[test]
    fn in_dir_root() {
        assert_eq!(MetaFile::in_dir("", "Foo.dec").path(), "Foo.dec");
        assert_eq!(MetaFile::in_dir("Pkg", "Include").path(), "Pkg/Include");
    }

    #[test]
    fn validate_extension() {
        assert!(MetaFile::new("Pkg/A.INF").validate(".inf").is_ok());
        assert!(MetaFile::new("Pkg/A.dec").validate(".inf").is_err());
    }
}
