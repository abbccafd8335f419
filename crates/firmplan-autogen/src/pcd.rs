use crate::errors::{AutoGenError, AutoGenResult};
use crate::types::{parse_int, DatumType, PcdType};
use firmplan_util::split::split_value_list;
use indexmap::IndexMap;

/// `(TokenName, TokenSpaceGuidName)`
pub type PcdId = (String, String);

/// Per-SKU settings of a dynamic PCD.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkuInfo {
    pub sku_name: String,
    pub sku_id: String,
    pub variable_name: String,
    pub variable_guid: String,
    pub variable_guid_value: String,
    pub variable_offset: String,
    pub hii_default_value: String,
    pub vpd_offset: String,
    pub default_value: String,
}

impl SkuInfo {
    pub fn with_default(sku_name: &str, sku_id: &str, default_value: &str) -> Self {
        SkuInfo {
            sku_name: sku_name.to_string(),
            sku_id: sku_id.to_string(),
            default_value: default_value.to_string(),
            ..Default::default()
        }
    }
}

/// A configuration item as declared by a package and refined by platform and module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pcd {
    pub name: String,
    pub token_space: String,
    /// `None` for values coming from the flash layout, whose type the module decides.
    pub pcd_type: Option<PcdType>,
    pub datum_type: Option<DatumType>,
    pub default_value: String,
    /// Default given by the module descriptor itself, before any package default.
    pub inf_default_value: String,
    pub token_value: String,
    pub max_datum_size: Option<String>,
    pub sku_info: IndexMap<String, SkuInfo>,
    /// The module used a generic dynamic section and lets the platform pick the exact type.
    pub pending: bool,
}

impl Pcd {
    pub fn new(name: &str, token_space: &str) -> Self {
        Pcd {
            name: name.to_string(),
            token_space: token_space.to_string(),
            ..Default::default()
        }
    }

    pub fn id(&self) -> PcdId {
        (self.name.clone(), self.token_space.clone())
    }

    /// `Space.Name`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.token_space, self.name)
    }

    pub fn is_dynamic(&self) -> bool {
        self.pcd_type.is_some_and(|t| t.is_dynamic())
    }

    /// Value of the first SKU, or the plain default for items without SKUs.
    pub fn first_sku_value(&self) -> &str {
        self.sku_info
            .values()
            .next()
            .map(|sku| sku.default_value.as_str())
            .unwrap_or(&self.default_value)
    }
}

fn split_setting<const N: usize>(setting: &str, what: &str) -> AutoGenResult<[String; N]> {
    let mut fields = split_value_list(setting, '|');
    if fields.len() > N {
        return Err(AutoGenError::format_invalid(format!(
            "Too many fields in {} setting [{}]",
            what, setting
        )));
    }
    fields.resize(N, String::new());
    fields.try_into().map_err(|_| {
        AutoGenError::format_invalid(format!("Invalid {} setting [{}]", what, setting))
    })
}

/// `Value|DatumType|Size`, where the meaning of the third field depends on the descriptor:
/// TokenValue in a package, MaxDatumSize in a platform.
pub fn analyze_pcd_setting(setting: &str) -> AutoGenResult<[String; 3]> {
    split_setting(setting, "PCD")
}

/// `VariableName|VariableGuid|VariableOffset|DefaultValue`
pub fn analyze_hii_setting(setting: &str) -> AutoGenResult<[String; 4]> {
    split_setting(setting, "HII PCD")
}

/// `VpdOffset|MaxDatumSize|InitialValue`
pub fn analyze_vpd_setting(setting: &str) -> AutoGenResult<[String; 3]> {
    split_setting(setting, "VPD PCD")
}

pub fn parse_datum_type(value: &str) -> AutoGenResult<Option<DatumType>> {
    if value.trim().is_empty() {
        Ok(None)
    } else {
        value.parse().map(Some)
    }
}

/// Check that `value` is representable as `datum_type`.
pub fn check_datum(datum_type: DatumType, value: &str) -> Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(());
    }

    match datum_type {
        DatumType::Void => {
            if (value.starts_with("L\"") || value.starts_with('"')) && value.ends_with('"') && value.len() >= 2
            {
                Ok(())
            } else if value.starts_with('{') && value.ends_with('}') {
                for item in value[1..value.len() - 1].split(',') {
                    let item = item.trim();
                    if item.is_empty() {
                        continue;
                    }
                    match parse_int(item) {
                        Some(v) if v <= 0xFF => {}
                        _ => return Err(format!("Invalid byte [{}] in array value {}", item, value)),
                    }
                }
                Ok(())
            } else {
                Err(format!(
                    "Invalid value [{}] of type [VOID*]; must be in the form of {{...}} for array, \"...\" for ASCII string, or L\"...\" for unicode string",
                    value
                ))
            }
        }
        DatumType::Boolean => {
            if value.eq_ignore_ascii_case("TRUE") || value.eq_ignore_ascii_case("FALSE") {
                return Ok(());
            }
            match parse_int(value) {
                Some(0) | Some(1) => Ok(()),
                _ => Err(format!("Invalid value [{}] of type [BOOLEAN]", value)),
            }
        }
        int_type => {
            let max = int_type.max_value().unwrap_or(u64::MAX);
            match parse_int(value) {
                Some(v) if v <= max => Ok(()),
                Some(_) => Err(format!("Too large PCD value [{}] for type [{}]", value, int_type)),
                None => Err(format!("Invalid value [{}] of type [{}]", value, int_type)),
            }
        }
    }
}

/// Size an opaque-blob value occupies when nothing declares it.
pub fn derive_max_datum_size(value: &str) -> u32 {
    if value.is_empty() {
        1
    } else if value.starts_with('L') {
        // The whole literal is counted, marker and quotes included, two bytes per character
        (value.chars().count() * 2) as u32
    } else if value.starts_with('{') {
        value.split(',').count() as u32
    } else {
        value.chars().count() as u32
    }
}

/// A token value is a 32-bit number written as `0x` hex (at most 8 digits) or decimal.
pub fn check_token_value(token_value: &str) -> Result<u32, String> {
    let value = token_value.trim();
    if value.is_empty() {
        return Err("No TokenValue".to_string());
    }

    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        if hex.is_empty() || hex.len() > 8 {
            return Err(format!("The format of TokenValue [{}] is invalid", value));
        }
        return u32::from_str_radix(hex, 16)
            .map_err(|_| format!("The format of TokenValue [{}] is invalid", value));
    }

    match value.parse::<u64>() {
        Ok(v) if v <= u32::MAX as u64 => Ok(v as u32),
        Ok(_) => Err(format!("The format of TokenValue [{}] is invalid, as a decimal it should be between 0 - 4294967295", value)),
        Err(_) => Err(format!("The format of TokenValue [{}] is invalid", value)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn max_datum_size_derivation() {
        assert_eq!(derive_max_datum_size(""), 1);
        assert_eq!(derive_max_datum_size("{1,2,3}"), 3);
        assert_eq!(derive_max_datum_size("\"abcd\""), 6);
        assert_eq!(derive_max_datum_size("L\"ab\""), 10);
    }

    #[test]
    fn datum_checks() {
        assert!(check_datum(DatumType::Uint8, "0xFF").is_ok());
        assert!(check_datum(DatumType::Uint8, "256").is_err());
        assert!(check_datum(DatumType::Boolean, "true").is_ok());
        assert!(check_datum(DatumType::Boolean, "2").is_err());
        assert!(check_datum(DatumType::Void, "L\"Setup\"").is_ok());
        assert!(check_datum(DatumType::Void, "{0x1, 0x2}").is_ok());
        assert!(check_datum(DatumType::Void, "{0x100}").is_err());
        assert!(check_datum(DatumType::Void, "Setup").is_err());
    }

    #[test]
    fn token_values() {
        assert_eq!(check_token_value("0x0001000A"), Ok(0x1000a));
        assert_eq!(check_token_value("42"), Ok(42));
        assert!(check_token_value("0x").is_err());
        assert!(check_token_value("0x123456789").is_err());
        assert!(check_token_value("4294967296").is_err());
        assert!(check_token_value("0xZZ").is_err());
    }

    #[test]
    fn settings() {
        assert_eq!(
            analyze_pcd_setting("L\"a|b\"|VOID*").unwrap(),
            ["L\"a|b\"".to_string(), "VOID*".to_string(), String::new()]
        );
        assert!(analyze_pcd_setting("1|2|3|4").is_err());
        assert_eq!(analyze_hii_setting("L\"Setup\"|gGuid|0x10").unwrap()[2], "0x10");
    }
}
