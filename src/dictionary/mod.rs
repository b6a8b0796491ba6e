//! Diameter dictionary: parses `.dia` files (RFC 6733 CCF grammar plus the
//! 3GPP sectioning conventions in spec.md §4.1), resolves cross-application
//! inheritance, and serves `Directory`-wide lookups by name, `(code,
//! vendor)`, and `(appid, code, is_request)`.

pub mod grammar;
pub mod model;

pub use model::{Application, Avp, DataType, Message, QualifiedAvp, Semantics};

use crate::error::{DictionaryError, Error, Result};
use grammar::{RawQualifiedAvp, RawSection};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn to_qualified_avp(raw: RawQualifiedAvp) -> QualifiedAvp {
    QualifiedAvp {
        name: raw.name,
        semantics: raw.semantics,
        multiple: raw.multiple,
        min: raw.min,
        max: raw.max,
        resolved: None,
    }
}

/// Resolve every non-wildcard `QualifiedAvp.name` in `avps` against `scope`
/// (spec.md §4.1 resolution step 7). `scope` is searched by name; ambiguous
/// or missing names are hard errors.
fn resolve_against<'a>(
    avps: &mut [QualifiedAvp],
    scope: impl Iterator<Item = &'a Avp> + Clone,
    on_missing: impl Fn(&str) -> DictionaryError,
    on_ambiguous: impl Fn(&str, usize) -> DictionaryError,
) -> Result<()> {
    for qa in avps.iter_mut() {
        if qa.name == "AVP" {
            continue;
        }
        let matches: Vec<&Avp> = scope.clone().filter(|a| a.name == qa.name).collect();
        match matches.len() {
            0 => return Err(on_missing(&qa.name).into()),
            1 => qa.resolved = Some(matches[0].identity()),
            n => return Err(on_ambiguous(&qa.name, n).into()),
        }
    }
    Ok(())
}

struct ParsedAvpType {
    name: String,
    code: u32,
    datatype: DataType,
    mandatory: bool,
    vendor_specific: bool,
    protected: bool,
}

fn parse_flags(flags: &str) -> Result<(bool, bool, bool)> {
    if flags == "-" {
        return Ok((false, false, false));
    }
    if flags.chars().any(|c| !matches!(c, 'M' | 'V' | 'P')) {
        return Err(DictionaryError::InvalidAvpFlags(flags.to_string()).into());
    }
    Ok((
        flags.contains('M'),
        flags.contains('V'),
        flags.contains('P'),
    ))
}

fn parse_avp_types_body(body: &str) -> Result<Vec<ParsedAvpType>> {
    let mut out = Vec::new();
    for line in grammar::tokenize(body) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(DictionaryError::AvpTypeInvalidLine(line).into());
        }
        let (name, code, datatype_str, flags_str) = (fields[0], fields[1], fields[2], fields[3]);
        let code = grammar::parse_u32_literal(code)
            .ok_or_else(|| DictionaryError::AvpTypeInvalidLine(line.clone()))?;
        let datatype = DataType::parse(datatype_str)
            .ok_or_else(|| DictionaryError::InvalidAvpType(datatype_str.to_string()))?;
        let (mandatory, vendor_specific, protected) = parse_flags(flags_str)?;

        out.push(ParsedAvpType {
            name: name.to_string(),
            code,
            datatype,
            mandatory,
            vendor_specific,
            protected,
        });
    }
    Ok(out)
}

/// Loads and resolves `.dia` files, memoizing modules loaded for
/// `@inherits` by canonical path (spec.md §4.1 resolution step 2).
pub struct Loader {
    pub search_path: Vec<PathBuf>,
    cache: HashMap<PathBuf, Arc<Application>>,
}

impl Loader {
    pub fn new(search_path: Vec<PathBuf>) -> Loader {
        Loader {
            search_path,
            cache: HashMap::new(),
        }
    }

    fn find_module(&self, name: &str) -> Option<PathBuf> {
        for dir in &self.search_path {
            let candidate = dir.join(format!("{name}.dia"));
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }

    /// Load and fully resolve one application from a `.dia` file.
    pub fn load(&mut self, path: &Path) -> Result<Arc<Application>> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if let Some(cached) = self.cache.get(&canonical) {
            return Ok(Arc::clone(cached));
        }

        let whole = fs::read_to_string(path).map_err(|source| DictionaryError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let app = self.parse_and_resolve(path, &whole)?;
        let app = Arc::new(app);
        self.cache.insert(canonical, Arc::clone(&app));
        Ok(app)
    }

    fn parse_and_resolve(&mut self, path: &Path, whole: &str) -> Result<Application> {
        let sections = grammar::split_sections(whole);

        let mut id: Option<u32> = None;
        let mut name: Option<String> = None;
        let mut version: Option<String> = None;
        let mut default_vendor_id: Option<u32> = None;
        let mut avp_vendors: Vec<(u32, Vec<String>)> = Vec::new();
        let mut inherits: Vec<(String, Vec<String>)> = Vec::new();
        let mut avps: Vec<Avp> = Vec::new();
        let mut raw_msgs: Vec<(grammar::RawCcfHeader, Vec<RawQualifiedAvp>)> = Vec::new();
        let mut raw_grouped: Vec<(grammar::RawGavHeader, Vec<RawQualifiedAvp>)> = Vec::new();
        let mut raw_enums: Vec<(String, Vec<(String, i64)>)> = Vec::new();

        for RawSection { name: sec, args, body } in &sections {
            match sec.as_str() {
                "id" => {
                    if id.is_some() {
                        return Err(DictionaryError::InvalidSectionOccurrence {
                            section: "id".into(),
                            path: path.to_path_buf(),
                        }
                        .into());
                    }
                    if args.len() != 1 {
                        return Err(DictionaryError::InvalidSectionArguments {
                            section: "id".into(),
                            path: path.to_path_buf(),
                            detail: "expected exactly one argument".into(),
                        }
                        .into());
                    }
                    id = Some(grammar::parse_u32_literal(&args[0]).ok_or_else(|| {
                        DictionaryError::InvalidSectionArguments {
                            section: "id".into(),
                            path: path.to_path_buf(),
                            detail: format!("{:?} is not a u32", args[0]),
                        }
                    })?);
                }
                "name" => {
                    if name.is_some() {
                        return Err(DictionaryError::InvalidSectionOccurrence {
                            section: "name".into(),
                            path: path.to_path_buf(),
                        }
                        .into());
                    }
                    if args.is_empty() || args.len() > 2 {
                        return Err(DictionaryError::InvalidSectionArguments {
                            section: "name".into(),
                            path: path.to_path_buf(),
                            detail: "expected one or two arguments".into(),
                        }
                        .into());
                    }
                    name = Some(args[0].clone());
                    if args.len() == 2 {
                        version = Some(args[1].clone());
                    }
                }
                "vendor" => {
                    if default_vendor_id.is_some() {
                        return Err(DictionaryError::InvalidSectionOccurrence {
                            section: "vendor".into(),
                            path: path.to_path_buf(),
                        }
                        .into());
                    }
                    if args.len() != 2 {
                        return Err(DictionaryError::InvalidSectionArguments {
                            section: "vendor".into(),
                            path: path.to_path_buf(),
                            detail: "expected <u32> <name>".into(),
                        }
                        .into());
                    }
                    default_vendor_id =
                        Some(grammar::parse_u32_literal(&args[0]).ok_or_else(|| {
                            DictionaryError::InvalidSectionArguments {
                                section: "vendor".into(),
                                path: path.to_path_buf(),
                                detail: format!("{:?} is not a u32", args[0]),
                            }
                        })?);
                }
                "avp_vendor_id" => {
                    if args.len() != 1 {
                        return Err(DictionaryError::InvalidSectionArguments {
                            section: "avp_vendor_id".into(),
                            path: path.to_path_buf(),
                            detail: "expected exactly one argument".into(),
                        }
                        .into());
                    }
                    let vendor_id: u32 =
                        grammar::parse_u32_literal(&args[0]).ok_or_else(|| {
                            DictionaryError::InvalidSectionArguments {
                                section: "avp_vendor_id".into(),
                                path: path.to_path_buf(),
                                detail: format!("{:?} is not a u32", args[0]),
                            }
                        })?;
                    avp_vendors.push((vendor_id, grammar::tokenize(body)));
                }
                "inherits" => {
                    if args.len() != 1 {
                        return Err(DictionaryError::InvalidSectionArguments {
                            section: "inherits".into(),
                            path: path.to_path_buf(),
                            detail: "expected exactly one module name".into(),
                        }
                        .into());
                    }
                    inherits.push((args[0].clone(), grammar::tokenize(body)));
                }
                "avp_types" => {
                    for parsed in parse_avp_types_body(body)? {
                        if avps.iter().any(|a| a.code == parsed.code) {
                            return Err(
                                DictionaryError::AvpDefinedMultipleTimes(parsed.name).into()
                            );
                        }
                        avps.push(Avp {
                            name: parsed.name,
                            code: parsed.code,
                            vendor_id: 0,
                            datatype: parsed.datatype,
                            mandatory: parsed.mandatory,
                            vendor_specific: parsed.vendor_specific,
                            protected: parsed.protected,
                            value_to_desc: HashMap::new(),
                            desc_to_value: HashMap::new(),
                            grouped: Vec::new(),
                        });
                    }
                }
                "messages" => {
                    for (header, qavps) in
                        grammar::parse_blocks(path, body, grammar::parse_ccf_header)?
                    {
                        if raw_msgs.iter().any(|(h, _)| h.name == header.name) {
                            return Err(
                                DictionaryError::MessageDefinedMultipleTimes(header.name).into()
                            );
                        }
                        raw_msgs.push((header, qavps));
                    }
                }
                "grouped" => {
                    raw_grouped
                        .extend(grammar::parse_blocks(path, body, grammar::parse_gav_header)?);
                }
                "enum" => {
                    if args.len() != 1 {
                        return Err(DictionaryError::InvalidSectionArguments {
                            section: "enum".into(),
                            path: path.to_path_buf(),
                            detail: "expected exactly one AVP name".into(),
                        }
                        .into());
                    }
                    let mut entries = Vec::new();
                    for line in grammar::tokenize(body) {
                        let fields: Vec<&str> = line.split_whitespace().collect();
                        if fields.len() != 2 {
                            return Err(DictionaryError::AvpTypeInvalidLine(line).into());
                        }
                        let value = grammar::parse_int_literal(fields[1])
                            .ok_or_else(|| DictionaryError::AvpTypeInvalidLine(line.clone()))?;
                        entries.push((fields[0].to_string(), value));
                    }
                    raw_enums.push((args[0].clone(), entries));
                }
                "prefix" | "custom_types" | "codecs" | "end" => {
                    log::debug!("ignoring section @{sec} in {}", path.display());
                }
                other => {
                    log::debug!("ignoring unrecognised section @{other} in {}", path.display());
                }
            }
        }

        // step 1: @id is required if @messages exist; stamp appid
        if !raw_msgs.is_empty() && id.is_none() {
            return Err(DictionaryError::MissingId {
                path: path.to_path_buf(),
            }
            .into());
        }
        for (header, _) in &raw_msgs {
            if let (Some(declared), Some(expected)) = (header.appid, id) {
                if declared != expected {
                    return Err(DictionaryError::MessageContainsInvalidId {
                        msg: header.name.clone(),
                        found: declared,
                        expected,
                    }
                    .into());
                }
            }
        }

        let name = name.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        });

        let mut msgs: Vec<Message> = raw_msgs
            .into_iter()
            .map(|(header, qavps)| Message {
                name: header.name,
                code: header.code,
                appid: id.unwrap_or(0),
                request: header.request,
                proxyable: header.proxyable,
                error: header.error,
                avps: qavps.into_iter().map(to_qualified_avp).collect(),
            })
            .collect();

        let mut inherited_avps: Vec<Arc<Avp>> = Vec::new();
        let mut inherited_msgs: Vec<Arc<Message>> = Vec::new();

        // step 2: resolve @inherits
        for (module, wanted) in &inherits {
            let modpath = self.find_module(module).ok_or_else(|| {
                DictionaryError::InheritedModuleMissing {
                    module: module.clone(),
                    path: path.to_path_buf(),
                }
            })?;
            let parent = self.load(&modpath)?;

            if wanted.is_empty() {
                inherited_avps.extend(parent.find_avps_by(|_| true).into_iter().cloned());
            } else {
                for avp_name in wanted {
                    let matches = parent.find_avps_by(|a| &a.name == avp_name);
                    if matches.len() != 1 {
                        log::warn!(
                            "several AVPs named {avp_name:?} found while inheriting from {module:?}"
                        );
                    }
                    inherited_avps.extend(matches.into_iter().cloned());
                }
            }

            inherited_msgs.extend(parent.find_msgs_by(|_| true).into_iter().cloned());
        }

        // step 3: @enum attachment
        for (avp_name, entries) in raw_enums {
            let matches: Vec<usize> = avps
                .iter()
                .enumerate()
                .filter(|(_, a)| a.name == avp_name)
                .map(|(i, _)| i)
                .collect();
            if matches.len() != 1 {
                return Err(DictionaryError::EnumDefinitionForUnknownAvp(avp_name).into());
            }
            let avp = &mut avps[matches[0]];
            for (desc, value) in entries {
                if avp.desc_to_value.contains_key(&desc) {
                    return Err(DictionaryError::EnumDuplicatedDesc {
                        avp: avp_name.clone(),
                        desc,
                    }
                    .into());
                }
                if avp.value_to_desc.contains_key(&value) {
                    return Err(DictionaryError::EnumDuplicatedValue {
                        avp: avp_name.clone(),
                        value,
                    }
                    .into());
                }
                avp.value_to_desc.insert(value, desc.clone());
                avp.desc_to_value.insert(desc, value);
            }
        }

        // step 4: @grouped attachment
        for (header, qavps) in raw_grouped {
            let matches: Vec<usize> = avps
                .iter()
                .enumerate()
                .filter(|(_, a)| a.name == header.name)
                .map(|(i, _)| i)
                .collect();
            if matches.is_empty() {
                return Err(DictionaryError::GroupedDefinitionForUnknownAvp(header.name).into());
            }
            avps[matches[0]].grouped = qavps.into_iter().map(to_qualified_avp).collect();
        }

        // step 5: @avp_vendor_id stamping
        for (vendor_id, names) in &avp_vendors {
            for a in avps.iter_mut() {
                if names.contains(&a.name) {
                    a.vendor_id = *vendor_id;
                }
            }
        }

        // step 6: default vendor id for V-flagged AVPs without one
        for a in avps.iter_mut() {
            if a.vendor_specific && a.vendor_id == 0 {
                let default =
                    default_vendor_id.ok_or_else(|| DictionaryError::MissingDefaultVendorId {
                        name: a.name.clone(),
                        path: path.to_path_buf(),
                    })?;
                a.vendor_id = default;
            }
        }

        // step 7: verification + reference resolution
        for a in &avps {
            if a.datatype == DataType::Enumerated && a.value_to_desc.is_empty() {
                return Err(DictionaryError::EnumeratedAvpNotValued(a.name.clone()).into());
            }
            if a.datatype == DataType::Grouped && a.grouped.is_empty() {
                return Err(DictionaryError::GroupedAvpNotDefined(a.name.clone()).into());
            }
        }

        let scope: Vec<Avp> = avps
            .iter()
            .cloned()
            .chain(inherited_avps.iter().map(|a| (**a).clone()))
            .collect();

        for msg in msgs.iter_mut() {
            let msg_name = msg.name.clone();
            resolve_against(
                &mut msg.avps,
                scope.iter(),
                |missing| DictionaryError::MsgUsesUndefinedAvp {
                    msg: msg_name.clone(),
                    avp: missing.to_string(),
                },
                |name, _count| DictionaryError::AmbiguousAvpNaming(name.to_string()),
            )?;
        }

        for a in avps.iter_mut() {
            if a.datatype != DataType::Grouped {
                continue;
            }
            let group_name = a.name.clone();
            resolve_against(
                &mut a.grouped,
                scope.iter(),
                |missing| DictionaryError::AvpUsesUndefinedAvp {
                    group: group_name.clone(),
                    avp: missing.to_string(),
                },
                |name, count| DictionaryError::MultipleDefinitionFound {
                    name: name.to_string(),
                    count,
                },
            )?;
        }

        Ok(Application {
            id,
            name,
            version,
            default_vendor_id,
            avps: avps.into_iter().map(Arc::new).collect(),
            msgs: msgs.into_iter().map(Arc::new).collect(),
            inherited_avps,
            inherited_msgs,
            source_path: Some(path.to_path_buf()),
        })
    }
}

/// A process-wide collection of resolved [`Application`]s with the indices
/// spec.md §3 names: `appid -> [Application]` and `(vendor, code) -> [AVP]`.
pub struct Directory {
    pub apps: Vec<Arc<Application>>,
    by_appid: HashMap<u32, Vec<Arc<Application>>>,
}

impl Directory {
    /// Load a list of top-level `.dia` files using `search_path` for
    /// `@inherits` resolution.
    pub fn load(entry_paths: &[PathBuf], search_path: Vec<PathBuf>) -> Result<Directory> {
        let mut loader = Loader::new(search_path);
        let mut apps = Vec::new();
        for path in entry_paths {
            apps.push(loader.load(path)?);
        }
        Ok(Directory::from_apps(apps))
    }

    fn from_apps(apps: Vec<Arc<Application>>) -> Directory {
        let mut by_appid: HashMap<u32, Vec<Arc<Application>>> = HashMap::new();
        for app in &apps {
            if let Some(id) = app.id {
                by_appid.entry(id).or_default().push(Arc::clone(app));
            }
        }
        Directory { apps, by_appid }
    }

    pub fn find_msgs(&self, appid: u32, code: u32, is_request: bool) -> Result<Vec<Arc<Message>>> {
        let apps = self
            .by_appid
            .get(&appid)
            .ok_or(DictionaryError::UnknownApplicationId(appid))?;
        Ok(apps
            .iter()
            .flat_map(|app| {
                app.find_msgs_by(|m| m.appid == appid && m.code == code && m.request == is_request)
                    .into_iter()
                    .cloned()
            })
            .collect())
    }

    pub fn find_avps(&self, vendor: u32, code: u32) -> Vec<Arc<Avp>> {
        let mut seen = Vec::new();
        for app in &self.apps {
            let matches = if vendor == 0 {
                app.find_avps_by(|a| !a.vendor_specific && a.code == code)
            } else {
                app.find_avps_by(|a| a.vendor_specific && a.vendor_id == vendor && a.code == code)
            };
            for a in matches {
                if !seen.iter().any(|s: &Arc<Avp>| Arc::ptr_eq(s, a)) {
                    seen.push(Arc::clone(a));
                }
            }
        }
        seen
    }

    /// Look up a dictionary AVP definition anywhere in the directory by its
    /// resolved identity, used by the tagger to dereference a
    /// `QualifiedAvp::resolved` tuple.
    pub fn avp_by_identity(&self, code: u32, vendor_id: u32) -> Option<Arc<Avp>> {
        self.find_avps(vendor_id, code).into_iter().next()
    }

    /// Load like [`Directory::load`], consulting a [`DirectoryCache`]
    /// snapshot at `cache_path` to report whether the dictionary files have
    /// changed since the last run. The cache only records entry paths and
    /// mtimes, not the parsed `Application` graph itself, so a fresh cache
    /// does not skip parsing here; callers that run as long-lived processes
    /// can use the returned flag to skip their own downstream rebuild work
    /// instead. Returns `(directory, was_fresh)`; always writes a fresh
    /// snapshot back to `cache_path` on success.
    pub fn load_cached(
        entry_paths: &[PathBuf],
        search_path: Vec<PathBuf>,
        cache_path: &Path,
    ) -> Result<(Directory, bool)> {
        let was_fresh = DirectoryCache::load(cache_path)
            .map(|cache| {
                cache.is_fresh()
                    && cache.entry_paths.as_slice() == entry_paths
                    && cache.search_path.as_slice() == search_path.as_slice()
            })
            .unwrap_or(false);

        let directory = Directory::load(entry_paths, search_path.clone())?;
        DirectoryCache::capture(entry_paths, &search_path)?.save(cache_path)?;
        Ok((directory, was_fresh))
    }
}

/// Persisted, serializable snapshot of a [`Directory`] used to skip
/// re-parsing `.dia` files on every run (spec.md §4.1 "Directory cache").
#[derive(serde::Serialize, serde::Deserialize)]
pub struct DirectoryCache {
    pub entry_paths: Vec<PathBuf>,
    pub search_path: Vec<PathBuf>,
    pub mtimes: Vec<(PathBuf, std::time::SystemTime)>,
}

impl DirectoryCache {
    pub fn load(cache_path: &Path) -> Result<DirectoryCache> {
        let bytes = fs::read(cache_path).map_err(|source| DictionaryError::Io {
            path: cache_path.to_path_buf(),
            source,
        })?;
        bincode::deserialize(&bytes)
            .map_err(|e| Error::Dictionary(DictionaryError::Cache(e.to_string())))
    }

    pub fn save(&self, cache_path: &Path) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| Error::Dictionary(DictionaryError::Cache(e.to_string())))?;
        fs::write(cache_path, bytes).map_err(|source| DictionaryError::Io {
            path: cache_path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// True when every entry file's mtime still matches what was recorded.
    pub fn is_fresh(&self) -> bool {
        self.mtimes.iter().all(|(path, recorded)| {
            fs::metadata(path).and_then(|m| m.modified()).ok().as_ref() == Some(recorded)
        })
    }

    fn capture(entry_paths: &[PathBuf], search_path: &[PathBuf]) -> Result<DirectoryCache> {
        let mtimes = entry_paths
            .iter()
            .map(|path| {
                let modified = fs::metadata(path)
                    .and_then(|m| m.modified())
                    .map_err(|source| DictionaryError::Io {
                        path: path.clone(),
                        source,
                    })?;
                Ok((path.clone(), modified))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(DirectoryCache {
            entry_paths: entry_paths.to_vec(),
            search_path: search_path.to_vec(),
            mtimes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_cached_reports_stale_then_fresh_across_two_runs() {
        let dir = tempfile::tempdir().unwrap();
        let dia_path = dir.path().join("base.dia");
        fs::write(
            &dia_path,
            "@id 0\n@name Base\n@avp_types\nSession-Id 263 UTF8String M\n",
        )
        .unwrap();
        let cache_path = dir.path().join("cache.bin");

        let (directory, fresh) =
            Directory::load_cached(&[dia_path.clone()], Vec::new(), &cache_path).unwrap();
        assert!(!fresh, "no prior cache snapshot exists yet");
        assert_eq!(directory.find_avps(0, 263).len(), 1);

        let (_, fresh) =
            Directory::load_cached(&[dia_path], Vec::new(), &cache_path).unwrap();
        assert!(fresh, "file untouched since the snapshot was written");
    }
}
