use crate::errors::{AutoGenError, AutoGenResult};
use crate::meta_file::MetaFile;
use crate::pcd::{analyze_pcd_setting, parse_datum_type, Pcd};
use crate::record::{PcdModel, Record, RecordKind, RecordStore};
use crate::types::PcdType;
use firmplan_util::TieredMap;
use indexmap::{IndexMap, IndexSet};
use tracing::trace;

/// `(TokenName, TokenSpaceGuidName, Type)`
pub type PcdDeclKey = (String, String, PcdType);

/// A package declaration (DEC) resolved for one architecture.
#[derive(Debug, Clone)]
pub struct PackageData {
    pub meta_file: MetaFile,
    pub arch: String,
    pub name: String,
    pub guid: String,
    pub version: String,
    pub protocols: IndexMap<String, String>,
    pub ppis: IndexMap<String, String>,
    pub guids: IndexMap<String, String>,
    /// Public include directories, package-relative paths already joined.
    pub includes: Vec<MetaFile>,
    pub library_classes: IndexMap<String, MetaFile>,
    pub pcds: IndexMap<PcdDeclKey, Pcd>,
}

/// Build a name → value table. Names keep their first-seen order; values come from the most
/// specific arch.
pub(crate) fn symbol_table(
    store: &dyn RecordStore,
    file: &MetaFile,
    kind: RecordKind,
    arch: &str,
) -> IndexMap<String, String> {
    let mut names = IndexSet::new();
    let mut values = TieredMap::new();
    for record in store.query(file, kind, Some(arch), None) {
        let name = record.value(0);
        values.insert([record.arch.as_str(), name], record.value(1).to_string());
        names.insert(name.to_string());
    }

    names
        .into_iter()
        .filter_map(|name| {
            let value = values.resolve([arch, name.as_str()])?.clone();
            Some((name, value))
        })
        .collect()
}

/// `(name, space) → setting` for one PCD section, resolved through the arch tiers.
pub(crate) fn pcd_settings(
    records: &[Record],
    arch: &str,
) -> IndexMap<(String, String), (String, u32)> {
    let mut ids = IndexSet::new();
    let mut settings = TieredMap::new();
    for record in records {
        let (space, name) = (record.value(0), record.value(1));
        settings.insert(
            [record.arch.as_str(), name, space],
            (record.value(2).to_string(), record.line),
        );
        ids.insert((name.to_string(), space.to_string()));
    }

    ids.into_iter()
        .filter_map(|(name, space)| {
            let setting = settings.resolve([arch, &name, &space])?.clone();
            Some(((name, space), setting))
        })
        .collect()
}

impl PackageData {
    pub fn resolve(store: &dyn RecordStore, file: &MetaFile, arch: &str) -> AutoGenResult<Self> {
        let mut name = None;
        let mut guid = None;
        let mut version = String::new();
        for record in store.query(file, RecordKind::Header, Some(arch), None) {
            match record.value(0) {
                "PACKAGE_NAME" => name = Some(record.value(1).to_string()),
                "PACKAGE_GUID" => guid = Some(record.value(1).to_string()),
                "PACKAGE_VERSION" => version = record.value(1).to_string(),
                _ => {}
            }
        }

        let name = name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AutoGenError::attribute_not_available("No PACKAGE_NAME").in_file(file))?;
        let guid = guid
            .filter(|g| !g.is_empty())
            .ok_or_else(|| AutoGenError::attribute_not_available("No PACKAGE_GUID").in_file(file))?;

        let package_dir = file.dir();
        let mut includes = Vec::new();
        for record in store.query(file, RecordKind::Include, Some(arch), None) {
            let include = MetaFile::in_dir(package_dir, record.value(0));
            if !includes.contains(&include) {
                includes.push(include);
            }
        }

        let library_classes = symbol_table(store, file, RecordKind::LibraryClass, arch)
            .into_iter()
            .map(|(class, header)| (class, MetaFile::in_dir(package_dir, &header)))
            .collect();

        let mut pcds = IndexMap::new();
        for model in [
            PcdModel::FixedAtBuild,
            PcdModel::PatchableInModule,
            PcdModel::FeatureFlag,
            PcdModel::Dynamic,
            PcdModel::DynamicEx,
        ] {
            let pcd_type = PcdType::from_model(model);
            let records = store.query(file, RecordKind::Pcd(model), Some(arch), None);
            for ((pcd_name, space), (setting, line)) in pcd_settings(&records, arch) {
                let [default_value, datum_type, token_value] =
                    analyze_pcd_setting(&setting).map_err(|e| e.at(file, line))?;

                trace!(package = %name, pcd = %format!("{}.{}", space, pcd_name), %pcd_type, "declared");
                let pcd = Pcd {
                    pcd_type: Some(pcd_type),
                    datum_type: parse_datum_type(&datum_type).map_err(|e| e.at(file, line))?,
                    default_value,
                    token_value,
                    ..Pcd::new(&pcd_name, &space)
                };
                pcds.insert((pcd_name, space, pcd_type), pcd);
            }
        }

        Ok(PackageData {
            meta_file: file.clone(),
            arch: arch.to_string(),
            name,
            guid,
            version,
            protocols: symbol_table(store, file, RecordKind::Protocol, arch),
            ppis: symbol_table(store, file, RecordKind::Ppi, arch),
            guids: symbol_table(store, file, RecordKind::Guid, arch),
            includes,
            library_classes,
            pcds,
        })
    }

    pub fn pcd(&self, name: &str, space: &str, pcd_type: PcdType) -> Option<&Pcd> {
        self.pcds
            .get(&(name.to_string(), space.to_string(), pcd_type))
    }

    /// Types this package declares `(name, space)` with, in declaration order.
    pub fn declared_types(&self, name: &str, space: &str) -> Vec<PcdType> {
        self.pcds
            .keys()
            .filter(|(n, s, _)| n == name && s == space)
            .map(|(_, _, t)| *t)
            .collect()
    }

    /// Value of a GUID, protocol or PPI name, looked up in that order.
    pub fn guid_value(&self, name: &str) -> Option<&str> {
        self.guids
            .get(name)
            .or_else(|| self.protocols.get(name))
            .or_else(|| self.ppis.get(name))
            .map(String::as_str)
    }
}
