//! Platform-wide collection of PCDs and their token numbers.
use crate::errors::{AutoGenError, AutoGenResult};
use crate::meta_file::MetaFile;
use crate::pcd::{Pcd, PcdId};
use crate::types::{DatumType, ModuleType};
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use tracing::{debug, trace};

/// Firmware phase whose PCD database holds an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Phase {
    #[display("PEI")]
    Pei,
    #[display("DXE")]
    Dxe,
}

impl Phase {
    pub fn of(module_type: ModuleType) -> Phase {
        if module_type.is_pei_phase() {
            Phase::Pei
        } else {
            Phase::Dxe
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicPcd {
    pub pcd: Pcd,
    pub phase: Phase,
}

/// Gathers the PCDs of every module across every arch of a platform.
#[derive(Debug, Clone, Default)]
pub struct PcdCollector {
    dynamic: Vec<DynamicPcd>,
    non_dynamic: Vec<Pcd>,
    missing_max_size: IndexSet<String>,
}

impl PcdCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the PCDs used by `module`, a module of type `module_type`.
    pub fn collect<'a>(
        &mut self,
        module: &MetaFile,
        module_type: ModuleType,
        pcds: impl IntoIterator<Item = &'a Pcd>,
    ) {
        let phase = Phase::of(module_type);
        for pcd in pcds {
            if pcd.datum_type == Some(DatumType::Void) && pcd.max_datum_size.is_none() {
                self.missing_max_size
                    .insert(format!("{} [{}]", pcd.full_name(), module));
            }

            if pcd.is_dynamic() {
                let item = DynamicPcd {
                    pcd: pcd.clone(),
                    phase,
                };
                match self.dynamic.iter().position(|d| d.pcd.id() == pcd.id()) {
                    None => self.dynamic.push(item),
                    // A PCD any PEI module uses lives in the PEI database
                    Some(index) if phase == Phase::Pei => self.dynamic[index] = item,
                    Some(_) => {}
                }
            } else if !self.non_dynamic.iter().any(|p| p.id() == pcd.id()) {
                self.non_dynamic.push(pcd.clone());
            }
        }
    }

    /// Error out if any opaque PCD went without a size.
    pub fn check(&self, platform: &MetaFile) -> AutoGenResult<()> {
        if self.missing_max_size.is_empty() {
            return Ok(());
        }
        Err(AutoGenError::autogen("PCD setting error")
            .in_file(platform)
            .with_extra(format!(
                "\n\tPCD(s) without MaxDatumSize:\n\t\t{}\n",
                self.missing_max_size.iter().join("\n\t\t")
            )))
    }

    pub fn dynamic(&self) -> &[DynamicPcd] {
        &self.dynamic
    }

    pub fn dynamic_mut(&mut self) -> &mut [DynamicPcd] {
        &mut self.dynamic
    }

    pub fn non_dynamic(&self) -> &[Pcd] {
        &self.non_dynamic
    }

    /// Reorder the dynamic PCDs as the string table wants them: unicode strings first so they
    /// stay two-byte aligned, then HII items, then the rest.
    pub fn order_for_layout(&mut self) {
        let (mut unicode, mut hii, mut other) = (vec![], vec![], vec![]);
        for item in self.dynamic.drain(..) {
            let sku = item.pcd.sku_info.values().next();
            let value = sku.map(|s| s.default_value.as_str()).unwrap_or("");
            if item.pcd.datum_type == Some(DatumType::Void) && value.starts_with('L') {
                unicode.push(item);
            } else if sku.is_some_and(|s| !s.variable_name.is_empty()) {
                hii.push(item);
            } else {
                other.push(item);
            }
        }
        debug!(
            unicode = unicode.len(),
            hii = hii.len(),
            other = other.len(),
            "ordered dynamic PCDs"
        );
        self.dynamic.extend(unicode);
        self.dynamic.extend(hii);
        self.dynamic.extend(other);
    }

    /// Token numbers from 1: PEI dynamic PCDs, then DXE dynamic PCDs, then everything else.
    pub fn token_numbers(&self) -> IndexMap<PcdId, u32> {
        let mut numbers = IndexMap::new();
        let ordered = self
            .dynamic
            .iter()
            .filter(|d| d.phase == Phase::Pei)
            .chain(self.dynamic.iter().filter(|d| d.phase == Phase::Dxe))
            .map(|d| (&d.pcd, Some(d.phase)))
            .chain(self.non_dynamic.iter().map(|p| (p, None)));

        for (number, (pcd, phase)) in (1u32..).zip(ordered) {
            trace!(pcd = %pcd.full_name(), ?phase, number, "token number");
            numbers.insert(pcd.id(), number);
        }
        numbers
    }
}

#[cfg(test)]
mod test {
    use super::{PcdCollector, Phase};
    use crate::meta_file::MetaFile;
    use crate::pcd::{Pcd, SkuInfo};
    use crate::types::{DatumType, ModuleType, PcdType};
    use pretty_assertions::assert_eq;

    fn pcd(name: &str, pcd_type: PcdType, value: &str) -> Pcd {
        let mut pcd = Pcd {
            pcd_type: Some(pcd_type),
            datum_type: Some(DatumType::Void),
            max_datum_size: Some("8".into()),
            default_value: value.into(),
            ..Pcd::new(name, "gSpace")
        };
        if pcd_type.is_dynamic() {
            pcd.sku_info
                .insert("DEFAULT".into(), SkuInfo::with_default("DEFAULT", "0", value));
        }
        pcd
    }

    fn names(collector: &PcdCollector) -> Vec<String> {
        collector.dynamic().iter().map(|d| d.pcd.name.clone()).collect()
    }

    #[test]
    fn pei_wins_and_numbers_follow_phases() {
        let dxe = MetaFile::new("Dxe/Dxe.inf");
        let pei = MetaFile::new("Pei/Pei.inf");
        let mut collector = PcdCollector::new();

        let a = pcd("A", PcdType::Dynamic, "1");
        let b = pcd("B", PcdType::Dynamic, "2");
        let f = pcd("F", PcdType::FixedAtBuild, "3");
        collector.collect(&dxe, ModuleType::DxeDriver, [&a, &b, &f]);
        collector.collect(&pei, ModuleType::Peim, [&b]);
        collector.collect(&dxe, ModuleType::DxeDriver, [&b, &f]);

        assert_eq!(collector.dynamic()[1].phase, Phase::Pei);
        assert_eq!(collector.non_dynamic().len(), 1);

        let numbers: Vec<(String, u32)> = collector
            .token_numbers()
            .into_iter()
            .map(|((name, _), n)| (name, n))
            .collect();
        assert_eq!(
            numbers,
            vec![("B".into(), 1), ("A".into(), 2), ("F".into(), 3)]
        );
    }

    #[test]
    fn layout_order() {
        let module = MetaFile::new("M/M.inf");
        let mut collector = PcdCollector::new();
        let plain = pcd("Plain", PcdType::Dynamic, "{0x1}");
        let mut hii = pcd("Hii", PcdType::DynamicHii, "");
        hii.sku_info["DEFAULT"].variable_name = "L\"Setup\"".into();
        let unicode = pcd("Unicode", PcdType::Dynamic, "L\"abc\"");
        collector.collect(&module, ModuleType::DxeDriver, [&plain, &hii, &unicode]);

        collector.order_for_layout();
        assert_eq!(names(&collector), vec!["Unicode", "Hii", "Plain"]);
    }

    #[test]
    fn missing_size_reported() {
        let module = MetaFile::new("M/M.inf");
        let mut collector = PcdCollector::new();
        let mut p = pcd("P", PcdType::FixedAtBuild, "\"x\"");
        p.max_datum_size = None;
        collector.collect(&module, ModuleType::DxeDriver, [&p]);
        assert!(collector.check(&MetaFile::new("P/P.dsc")).is_err());
    }
}
