use crate::meta_file::MetaFile;
use std::fmt;
use std::io;
use thiserror::Error;

/// Failure classes reported to the build driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FormatInvalid,
    FormatNotSupported,
    AttributeNotAvailable,
    ResourceNotAvailable,
    OptionConflict,
    OptionMissing,
    OptionUnknown,
    FileNotFound,
    FileDuplicated,
    FileWriteFailure,
    FileReadFailure,
    BuildError,
    AutoGenError,
    Io,
}

/// Where an error was found. Every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub file: Option<MetaFile>,
    pub line: Option<u32>,
    pub extra: Option<String>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, " [{}({})]", file, line)?,
            (Some(file), None) => write!(f, " [{}]", file)?,
            _ => {}
        }
        if let Some(extra) = &self.extra {
            write!(f, "\n\t{}", extra)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum AutoGenError {
    #[error("{message}{location}")]
    FormatInvalid { message: String, location: Location },

    #[error("{message}{location}")]
    FormatNotSupported { message: String, location: Location },

    #[error("{message}{location}")]
    AttributeNotAvailable { message: String, location: Location },

    #[error("{message}{location}")]
    ResourceNotAvailable { message: String, location: Location },

    #[error("{message}{location}")]
    OptionConflict { message: String, location: Location },

    #[error("{message}{location}")]
    OptionMissing { message: String, location: Location },

    #[error("{message}{location}")]
    OptionUnknown { message: String, location: Location },

    #[error("{message}{location}")]
    FileNotFound { message: String, location: Location },

    #[error("{message}{location}")]
    FileDuplicated { message: String, location: Location },

    #[error("{message}{location}")]
    FileWriteFailure { message: String, location: Location },

    #[error("{message}{location}")]
    FileReadFailure { message: String, location: Location },

    /// Structural problem in the resolved graph, e.g. a constructor cycle.
    #[error("{message}{location}")]
    BuildError { message: String, location: Location },

    /// Inconsistent settings discovered while assembling the platform.
    #[error("{message}{location}")]
    AutoGen { message: String, location: Location },

    #[error("I/O error")]
    Io {
        #[from]
        source: io::Error,
    },
}

macro_rules! constructors {
    ($($fn_name:ident => $variant:ident),* $(,)?) => {
        impl AutoGenError {
            $(
                pub fn $fn_name(message: impl Into<String>) -> Self {
                    AutoGenError::$variant {
                        message: message.into(),
                        location: Location::default(),
                    }
                }
            )*
        }
    };
}

constructors! {
    format_invalid => FormatInvalid,
    format_not_supported => FormatNotSupported,
    attribute_not_available => AttributeNotAvailable,
    resource_not_available => ResourceNotAvailable,
    option_conflict => OptionConflict,
    option_missing => OptionMissing,
    option_unknown => OptionUnknown,
    file_not_found => FileNotFound,
    file_duplicated => FileDuplicated,
    file_write_failure => FileWriteFailure,
    file_read_failure => FileReadFailure,
    build_error => BuildError,
    autogen => AutoGen,
}

impl AutoGenError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AutoGenError::FormatInvalid { .. } => ErrorCode::FormatInvalid,
            AutoGenError::FormatNotSupported { .. } => ErrorCode::FormatNotSupported,
            AutoGenError::AttributeNotAvailable { .. } => ErrorCode::AttributeNotAvailable,
            AutoGenError::ResourceNotAvailable { .. } => ErrorCode::ResourceNotAvailable,
            AutoGenError::OptionConflict { .. } => ErrorCode::OptionConflict,
            AutoGenError::OptionMissing { .. } => ErrorCode::OptionMissing,
            AutoGenError::OptionUnknown { .. } => ErrorCode::OptionUnknown,
            AutoGenError::FileNotFound { .. } => ErrorCode::FileNotFound,
            AutoGenError::FileDuplicated { .. } => ErrorCode::FileDuplicated,
            AutoGenError::FileWriteFailure { .. } => ErrorCode::FileWriteFailure,
            AutoGenError::FileReadFailure { .. } => ErrorCode::FileReadFailure,
            AutoGenError::BuildError { .. } => ErrorCode::BuildError,
            AutoGenError::AutoGen { .. } => ErrorCode::AutoGenError,
            AutoGenError::Io { .. } => ErrorCode::Io,
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            AutoGenError::FormatInvalid { location, .. }
            | AutoGenError::FormatNotSupported { location, .. }
            | AutoGenError::AttributeNotAvailable { location, .. }
            | AutoGenError::ResourceNotAvailable { location, .. }
            | AutoGenError::OptionConflict { location, .. }
            | AutoGenError::OptionMissing { location, .. }
            | AutoGenError::OptionUnknown { location, .. }
            | AutoGenError::FileNotFound { location, .. }
            | AutoGenError::FileDuplicated { location, .. }
            | AutoGenError::FileWriteFailure { location, .. }
            | AutoGenError::FileReadFailure { location, .. }
            | AutoGenError::BuildError { location, .. }
            | AutoGenError::AutoGen { location, .. } => Some(location),
            AutoGenError::Io { .. } => None,
        }
    }

    fn location_mut(&mut self) -> Option<&mut Location> {
        match self {
            AutoGenError::FormatInvalid { location, .. }
            | AutoGenError::FormatNotSupported { location, .. }
            | AutoGenError::AttributeNotAvailable { location, .. }
            | AutoGenError::ResourceNotAvailable { location, .. }
            | AutoGenError::OptionConflict { location, .. }
            | AutoGenError::OptionMissing { location, .. }
            | AutoGenError::OptionUnknown { location, .. }
            | AutoGenError::FileNotFound { location, .. }
            | AutoGenError::FileDuplicated { location, .. }
            | AutoGenError::FileWriteFailure { location, .. }
            | AutoGenError::FileReadFailure { location, .. }
            | AutoGenError::BuildError { location, .. }
            | AutoGenError::AutoGen { location, .. } => Some(location),
            AutoGenError::Io { .. } => None,
        }
    }

    pub fn in_file(mut self, file: &MetaFile) -> Self {
        if let Some(location) = self.location_mut() {
            location.file = Some(file.clone());
        }
        self
    }

    pub fn at(mut self, file: &MetaFile, line: u32) -> Self {
        if let Some(location) = self.location_mut() {
            location.file = Some(file.clone());
            location.line = Some(line);
        }
        self
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        if let Some(location) = self.location_mut() {
            location.extra = Some(extra.into());
        }
        self
    }
}

pub type AutoGenResult<T> = Result<T, AutoGenError>;
