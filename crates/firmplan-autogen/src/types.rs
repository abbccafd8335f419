use crate::errors::AutoGenError;
use crate::record::PcdModel;
use derive_more::Display;
use std::str::FromStr;

pub const ARCH_COMMON: &str = "COMMON";

/// Modules described with an `INF_VERSION` below this use the legacy (EDK) conventions.
pub const EDKII_INF_VERSION: u32 = 0x0001_0005;

pub const SKU_DEFAULT: &str = "DEFAULT";

pub const DEPEX_OPCODES: &[&str] = &[
    "BEFORE", "AFTER", "PUSH", "AND", "OR", "NOT", "END", "SOR", "TRUE", "FALSE", "(", ")",
];

pub const NULL_LIBRARY_CLASS: &str = "NULL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum ModuleType {
    #[display("BASE")]
    Base,
    #[display("SEC")]
    Sec,
    #[display("PEI_CORE")]
    PeiCore,
    #[display("PEIM")]
    Peim,
    #[display("DXE_CORE")]
    DxeCore,
    #[display("DXE_DRIVER")]
    DxeDriver,
    #[display("DXE_RUNTIME_DRIVER")]
    DxeRuntimeDriver,
    #[display("DXE_SAL_DRIVER")]
    DxeSalDriver,
    #[display("DXE_SMM_DRIVER")]
    DxeSmmDriver,
    #[display("UEFI_DRIVER")]
    UefiDriver,
    #[display("UEFI_APPLICATION")]
    UefiApplication,
    #[display("USER_DEFINED")]
    UserDefined,
    #[display("SMM_CORE")]
    SmmCore,
}

impl ModuleType {
    pub const ALL: [ModuleType; 13] = [
        ModuleType::Base,
        ModuleType::Sec,
        ModuleType::PeiCore,
        ModuleType::Peim,
        ModuleType::DxeCore,
        ModuleType::DxeDriver,
        ModuleType::DxeRuntimeDriver,
        ModuleType::DxeSalDriver,
        ModuleType::DxeSmmDriver,
        ModuleType::UefiDriver,
        ModuleType::UefiApplication,
        ModuleType::UserDefined,
        ModuleType::SmmCore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleType::Base => "BASE",
            ModuleType::Sec => "SEC",
            ModuleType::PeiCore => "PEI_CORE",
            ModuleType::Peim => "PEIM",
            ModuleType::DxeCore => "DXE_CORE",
            ModuleType::DxeDriver => "DXE_DRIVER",
            ModuleType::DxeRuntimeDriver => "DXE_RUNTIME_DRIVER",
            ModuleType::DxeSalDriver => "DXE_SAL_DRIVER",
            ModuleType::DxeSmmDriver => "DXE_SMM_DRIVER",
            ModuleType::UefiDriver => "UEFI_DRIVER",
            ModuleType::UefiApplication => "UEFI_APPLICATION",
            ModuleType::UserDefined => "USER_DEFINED",
            ModuleType::SmmCore => "SMM_CORE",
        }
    }

    /// Module type implied by a legacy `COMPONENT_TYPE`.
    pub fn from_component_type(component_type: &str) -> Option<ModuleType> {
        Some(match component_type.to_uppercase().as_str() {
            "LIBRARY" | "LOGO" => ModuleType::Base,
            "SECURITY_CORE" => ModuleType::Sec,
            "PEI_CORE" => ModuleType::PeiCore,
            "COMBINED_PEIM_DRIVER" | "PIC_PEIM" | "RELOCATABLE_PEIM" | "PE32_PEIM" => {
                ModuleType::Peim
            }
            "BS_DRIVER" => ModuleType::DxeDriver,
            "RT_DRIVER" => ModuleType::DxeRuntimeDriver,
            "SAL_RT_DRIVER" => ModuleType::DxeSalDriver,
            "DXE_SMM_DRIVER" => ModuleType::DxeSmmDriver,
            "APPLICATION" => ModuleType::UefiApplication,
            _ => return None,
        })
    }

    /// PEI-phase modules put their dynamic PCDs into the PEI database.
    pub fn is_pei_phase(&self) -> bool {
        matches!(self, ModuleType::Peim | ModuleType::PeiCore)
    }

    /// Driver types that cannot be dispatched without a dependency expression.
    pub fn requires_depex(&self) -> bool {
        matches!(
            self,
            ModuleType::DxeDriver
                | ModuleType::Peim
                | ModuleType::DxeSmmDriver
                | ModuleType::DxeSalDriver
                | ModuleType::DxeRuntimeDriver
        )
    }
}

impl FromStr for ModuleType {
    type Err = AutoGenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleType::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| AutoGenError::format_not_supported(format!("Unknown module type [{}]", s)))
    }
}

/// Resolved PCD access type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum PcdType {
    FixedAtBuild,
    PatchableInModule,
    FeatureFlag,
    Dynamic,
    DynamicHii,
    DynamicVpd,
    DynamicEx,
    DynamicExHii,
    DynamicExVpd,
}

impl PcdType {
    /// Order in which a module's generic dynamic section looks the type up in its packages.
    pub const DECLARATION_ORDER: [PcdType; 5] = [
        PcdType::FixedAtBuild,
        PcdType::PatchableInModule,
        PcdType::FeatureFlag,
        PcdType::Dynamic,
        PcdType::DynamicEx,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PcdType::FixedAtBuild => "FixedAtBuild",
            PcdType::PatchableInModule => "PatchableInModule",
            PcdType::FeatureFlag => "FeatureFlag",
            PcdType::Dynamic => "Dynamic",
            PcdType::DynamicHii => "DynamicHii",
            PcdType::DynamicVpd => "DynamicVpd",
            PcdType::DynamicEx => "DynamicEx",
            PcdType::DynamicExHii => "DynamicExHii",
            PcdType::DynamicExVpd => "DynamicExVpd",
        }
    }

    pub fn from_model(model: PcdModel) -> PcdType {
        match model {
            PcdModel::FixedAtBuild => PcdType::FixedAtBuild,
            PcdModel::PatchableInModule => PcdType::PatchableInModule,
            PcdModel::FeatureFlag => PcdType::FeatureFlag,
            PcdModel::Dynamic | PcdModel::DynamicDefault => PcdType::Dynamic,
            PcdModel::DynamicHii => PcdType::DynamicHii,
            PcdModel::DynamicVpd => PcdType::DynamicVpd,
            PcdModel::DynamicEx | PcdModel::DynamicExDefault => PcdType::DynamicEx,
            PcdModel::DynamicExHii => PcdType::DynamicExHii,
            PcdModel::DynamicExVpd => PcdType::DynamicExVpd,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.as_str().starts_with("Dynamic")
    }

    pub fn is_dynamic_ex(&self) -> bool {
        self.as_str().starts_with("DynamicEx")
    }

    pub fn is_vpd(&self) -> bool {
        matches!(self, PcdType::DynamicVpd | PcdType::DynamicExVpd)
    }

    /// The type a package declares for this access type: storage sub-kinds collapse onto
    /// `Dynamic`/`DynamicEx`.
    pub fn family(&self) -> PcdType {
        if self.is_dynamic_ex() {
            PcdType::DynamicEx
        } else if self.is_dynamic() {
            PcdType::Dynamic
        } else {
            *self
        }
    }
}

impl FromStr for PcdType {
    type Err = AutoGenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "FixedAtBuild" => PcdType::FixedAtBuild,
            "PatchableInModule" => PcdType::PatchableInModule,
            "FeatureFlag" => PcdType::FeatureFlag,
            "Dynamic" | "DynamicDefault" => PcdType::Dynamic,
            "DynamicHii" => PcdType::DynamicHii,
            "DynamicVpd" => PcdType::DynamicVpd,
            "DynamicEx" | "DynamicExDefault" => PcdType::DynamicEx,
            "DynamicExHii" => PcdType::DynamicExHii,
            "DynamicExVpd" => PcdType::DynamicExVpd,
            other => {
                return Err(AutoGenError::format_invalid(format!(
                    "Unknown PCD type [{}]",
                    other
                )));
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum DatumType {
    #[display("BOOLEAN")]
    Boolean,
    #[display("UINT8")]
    Uint8,
    #[display("UINT16")]
    Uint16,
    #[display("UINT32")]
    Uint32,
    #[display("UINT64")]
    Uint64,
    #[display("VOID*")]
    Void,
}

impl DatumType {
    /// Largest value an integer datum can hold.
    pub fn max_value(&self) -> Option<u64> {
        match self {
            DatumType::Boolean => Some(1),
            DatumType::Uint8 => Some(u8::MAX as u64),
            DatumType::Uint16 => Some(u16::MAX as u64),
            DatumType::Uint32 => Some(u32::MAX as u64),
            DatumType::Uint64 => Some(u64::MAX),
            DatumType::Void => None,
        }
    }

    /// Byte size of fixed-width types.
    pub fn size(&self) -> Option<u32> {
        match self {
            DatumType::Boolean | DatumType::Uint8 => Some(1),
            DatumType::Uint16 => Some(2),
            DatumType::Uint32 => Some(4),
            DatumType::Uint64 => Some(8),
            DatumType::Void => None,
        }
    }
}

impl FromStr for DatumType {
    type Err = AutoGenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "BOOLEAN" => DatumType::Boolean,
            "UINT8" => DatumType::Uint8,
            "UINT16" => DatumType::Uint16,
            "UINT32" => DatumType::Uint32,
            "UINT64" => DatumType::Uint64,
            "VOID*" => DatumType::Void,
            other => {
                return Err(AutoGenError::format_invalid(format!(
                    "Invalid PCD datum type [{}]",
                    other
                )));
            }
        })
    }
}

/// Parse a C-style integer: `0x` hex or decimal.
pub fn parse_int(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

/// Normalize a specification version to `0xMMMMmmmm`. Accepts `0x...` hex or `major.minor`.
pub fn hex_version(value: &str) -> Option<String> {
    let value = value.trim();
    if value.starts_with("0x") || value.starts_with("0X") {
        return parse_int(value).map(|v| format!("0x{:08x}", v));
    }
    match value.split_once('.') {
        Some((major, minor)) => {
            let major: u16 = major.parse().ok()?;
            let minor: u16 = minor.parse().ok()?;
            Some(format!("0x{:04x}{:04x}", major, minor))
        }
        None => value.parse::<u16>().ok().map(|major| format!("0x{:04x}0000", major)),
    }
}
