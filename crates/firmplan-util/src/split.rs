use itertools::Itertools;

/// Split a `|`-style value list, leaving separators inside double quotes alone. Each item is
/// trimmed.
///
/// # Example
///
/// ```
/// use firmplan_util::split::split_value_list;
/// assert_eq!(
///     split_value_list(r#"L"a|b"|VOID*|10"#, '|'),
///     vec![r#"L"a|b""#, "VOID*", "10"]
/// );
/// ```
pub fn split_value_list(input: &str, separator: char) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut escaped = false;

    for c in input.chars() {
        if in_quote {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quote = false;
            }
            continue;
        }

        if c == '"' {
            in_quote = true;
            current.push(c);
        } else if c == separator {
            items.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(c);
        }
    }
    items.push(current.trim().to_string());
    items
}

/// Split `input` into exactly `N` fields, or `None` if the field count differs.
///
/// ```
/// use firmplan_util::split::split_fields;
/// assert_eq!(split_fields::<3>("DEBUG_GCC5_X64", '_'), Some(["DEBUG", "GCC5", "X64"]));
/// assert_eq!(split_fields::<2>("DEBUG_GCC5_X64", '_'), None);
/// ```
pub fn split_fields<const N: usize>(input: &str, separator: char) -> Option<[&str; N]> {
    let parts: Vec<&str> = input.split(separator).collect();
    parts.try_into().ok()
}

/// Whitespace-separated words, uppercased and deduplicated.
pub fn split_upper_words(input: &str) -> Vec<String> {
    input
        .split_whitespace()
        .map(str::to_uppercase)
        .unique()
        .collect()
}
