use crate::module::ModuleData;
use crate::types::ModuleType;
use indexmap::IndexMap;
use std::rc::Rc;
use tracing::debug;

const END: &str = "END";

fn is_ordering(token: &str) -> bool {
    token == "BEFORE" || token == "AFTER"
}

/// Modules that bring their own depex, and libraries, get nothing merged.
fn needs_merge(module: &ModuleData) -> bool {
    module.dxs_file.is_none()
        && !module.is_library()
        && !module
            .sources
            .iter()
            .any(|s| s.file.ext().eq_ignore_ascii_case(".dxs"))
}

/// The module's dependency expression AND'ed with those of its libraries, per module type.
/// Stops at the first BEFORE/AFTER expression since those cannot be combined.
pub fn merge_depex(
    module: &ModuleData,
    libraries: &[Rc<ModuleData>],
    arch: &str,
) -> IndexMap<ModuleType, Vec<String>> {
    let mut merged = IndexMap::new();
    if !needs_merge(module) {
        return merged;
    }

    let module_type = module.module_type;
    let mut tokens: Vec<String> = vec![];
    for m in std::iter::once(module).chain(libraries.iter().map(Rc::as_ref)) {
        let mut inherited = false;
        for expression in m.depex.resolve_all([arch, module_type.as_str()]) {
            if !tokens.is_empty() {
                tokens.push("AND".to_string());
            }
            tokens.push("(".to_string());
            tokens.extend(expression.iter().cloned());
            if tokens.last().is_some_and(|t| t == END) {
                tokens.pop();
            }
            tokens.push(")".to_string());
            inherited = true;
        }
        if inherited {
            debug!("DEPEX[{}] (+{}) = {:?}", module.base_name, m.base_name, tokens);
        }
        if tokens.iter().any(|t| is_ordering(t)) {
            break;
        }
    }
    merged.insert(module_type, tokens);
    merged
}

/// Same as [`merge_depex`], on the expressions as written rather than resolved to GUIDs.
pub fn merge_depex_expression(
    module: &ModuleData,
    libraries: &[Rc<ModuleData>],
    arch: &str,
) -> IndexMap<ModuleType, String> {
    let mut merged = IndexMap::new();
    if !needs_merge(module) {
        return merged;
    }

    let module_type = module.module_type;
    let mut expression = String::new();
    for m in std::iter::once(module).chain(libraries.iter().map(Rc::as_ref)) {
        for written in m.depex_expression.resolve_all([arch, module_type.as_str()]) {
            if !expression.is_empty() {
                expression.push_str(" AND ");
            }
            let written = written.trim();
            let written = written.strip_suffix(END).unwrap_or(written).trim_end();
            expression.push('(');
            expression.push_str(written);
            expression.push(')');
        }
        if expression.contains("BEFORE") || expression.contains("AFTER") {
            break;
        }
    }
    merged.insert(module_type, expression);
    merged
}
