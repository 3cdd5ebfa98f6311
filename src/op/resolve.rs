//! Resolve Packaging Conflicts
//!
//! The `resolve` operation collects the candidates of all sources of an
//! Android platform, resolves them according to the packaging rules, and
//! reports the outcome. Optionally, the surviving files are staged into an
//! output directory, laid out like the final archive, ready to be picked up
//! by the packager.
//!
//! A conflict aborts the operation before anything is staged.

/// Resolve Errors
///
/// This is the exhaustive list of possible errors raised by the resolve
/// operation. See each error for details.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No platform with the specified ID exists in the manifest.
    #[error("no platform '{0}' in manifest")]
    Platform(String),
    /// Specified key required but missing in manifest.
    #[error("manifest configuration missing '{0}'")]
    ManifestKey(&'static str),
    /// The manifest content is invalid.
    #[error(transparent)]
    Manifest(#[from] crate::manifest::Error),
    /// The specified source identifier is used more than once.
    #[error("duplicate source '{0}'")]
    DuplicateSource(String),
    /// The specified source identifier is not a valid identifier.
    #[error("invalid source identifier {0:?}")]
    SourceId(String),
    /// Collecting candidates failed.
    #[error(transparent)]
    Collect(#[from] crate::packaging::collect::CollectError),
    /// An archive path is in conflict.
    #[error(transparent)]
    Conflict(#[from] crate::packaging::resolve::ConflictError),
    /// The output path exists but is not a directory.
    #[error("output {0:?} is not a directory")]
    OutputDirectory(std::ffi::OsString),
    /// Creation of the directory at the specified path failed.
    #[error("cannot create directory {0:?}")]
    DirectoryCreation(std::ffi::OsString),
    /// Updating the file at the specified path failed with the given error.
    #[error("cannot update {0:?}: {1}")]
    FileUpdate(std::ffi::OsString, std::io::Error),
    /// Removing the file at the specified path failed with the given error.
    #[error("cannot remove {0:?}: {1}")]
    FileRemoval(std::ffi::OsString, std::io::Error),
}

impl Error {
    fn from_check(error: crate::op::check::Error) -> Self {
        match error {
            crate::op::check::Error::Platform(v) => Self::Platform(v),
            crate::op::check::Error::ManifestKey(v) => Self::ManifestKey(v),
            crate::op::check::Error::Manifest(v) => Self::Manifest(v),
        }
    }
}

/// Resolve Options
pub struct Options<'a> {
    /// ID of the platform to resolve, or `None` for the first Android
    /// platform.
    pub platform: Option<&'a str>,
    /// Directory source paths of the manifest are relative to.
    pub base: &'a std::path::Path,
    /// Sources in addition to the sources of the manifest.
    pub sources: &'a [crate::packaging::collect::Source],
    /// Directory to stage the surviving files into, if any.
    pub output: Option<&'a std::path::Path>,
}

/// Report Entry
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportEntry {
    pub path: String,
    pub source: String,
    pub abi: Option<crate::platform::android::Abi>,
    pub size: usize,
    pub sha256: String,
    /// Whether the packager may compress the file.
    pub compress: bool,
    pub decision: &'static str,
    /// Pattern of the deciding pick-first rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Sources whose candidates were dropped in favor of this one.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub others: Vec<String>,
}

/// Report Exclusion
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportExclusion {
    pub path: String,
    pub pattern: String,
    pub sources: Vec<String>,
}

/// Resolution Report
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Report {
    pub platform: String,
    pub candidates: usize,
    pub entries: Vec<ReportEntry>,
    pub excluded: Vec<ReportExclusion>,
    /// Number of surviving native libraries per ABI.
    pub abis: std::collections::BTreeMap<crate::platform::android::Abi, usize>,
    /// Directory the files were staged into, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staged: Option<String>,
}

// Ensure directory exists
//
// Make sure the directory at the given path exists. Create the directory and
// its parent directories if necessary.
fn ensure_dir(
    path: &std::path::Path,
) -> Result<(), Error> {
    std::fs::create_dir_all(path)
        .map_err(
            |_| Error::DirectoryCreation(path.as_os_str().to_os_string())
        )
}

// Update a file if required
//
// This writes the given content to the specified file, but only if the file
// content does not already match the new content. Thus, the file timestamp
// is only modified if the content really changed, and packagers tracking
// timestamps do not needlessly repack.
fn update_file(
    path: &std::path::Path,
    content: &[u8],
) -> Result<(), Error> {
    match std::fs::read(path) {
        Ok(old) if old == content => return Ok(()),
        Ok(_) => {},
        Err(v) if v.kind() == std::io::ErrorKind::NotFound => {},
        Err(v) => return Err(Error::FileUpdate(path.as_os_str().to_os_string(), v)),
    }

    std::fs::write(path, content).map_err(
        |v| Error::FileUpdate(path.as_os_str().to_os_string(), v),
    )
}

// Unlink file if it exists
//
// Unlink the file at the specified path, but only if it exists. This is
// effectively like `std::fs::remove_file()`, but ignores errors about missing
// files.
fn unlink_file(path: &std::path::Path) -> Result<(), Error> {
    match std::fs::remove_file(path) {
        Err(v) if v.kind() != std::io::ErrorKind::NotFound => {
            Err(Error::FileRemoval(path.as_os_str().to_os_string(), v))
        },
        _ => {
            Ok(())
        }
    }
}

// Remove stale staged files
//
// Walk the staging directory and unlink every file that is not part of the
// resolution, so leftovers of earlier runs never reach the packager.
// Directories left empty are removed as well, except for the staging root.
// `prefix` holds the archive path of `dir`.
fn prune(
    dir: &std::path::Path,
    prefix: &str,
    resolution: &crate::packaging::resolve::Resolution,
) -> Result<(), Error> {
    let entries = std::fs::read_dir(dir)
        .and_then(|v| v.collect::<Result<Vec<_>, _>>())
        .map_err(
            |v| Error::FileRemoval(dir.as_os_str().to_os_string(), v),
        )?;

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let archive_path = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };

        let kind = entry.file_type().map_err(
            |v| Error::FileRemoval(path.as_os_str().to_os_string(), v),
        )?;

        if kind.is_dir() {
            prune(&path, &archive_path, resolution)?;

            let empty = std::fs::read_dir(&path)
                .map(|mut v| v.next().is_none())
                .map_err(
                    |v| Error::FileRemoval(path.as_os_str().to_os_string(), v),
                )?;
            if empty {
                tracing::debug!(path = archive_path.as_str(), "removing empty staged directory");
                std::fs::remove_dir(&path).map_err(
                    |v| Error::FileRemoval(path.as_os_str().to_os_string(), v),
                )?;
            }
        } else if !resolution.contains(&archive_path) {
            tracing::debug!(path = archive_path.as_str(), "removing stale staged file");
            unlink_file(&path)?;
        }
    }

    Ok(())
}

// Stage resolution
//
// Write every surviving file to its archive path below `output`, and remove
// files left over from earlier runs.
fn stage(
    output: &std::path::Path,
    resolution: &crate::packaging::resolve::Resolution,
) -> Result<(), Error> {
    match std::fs::metadata(output) {
        Ok(v) => {
            if !v.is_dir() {
                return Err(Error::OutputDirectory(output.as_os_str().to_os_string()));
            }
        },
        Err(v) => {
            if v.kind() != std::io::ErrorKind::NotFound {
                return Err(Error::OutputDirectory(output.as_os_str().to_os_string()));
            }
        },
    }
    ensure_dir(output)?;

    for (archive_path, entry) in resolution.entries() {
        let path = output.join(archive_path);
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        update_file(&path, entry.file.content.as_bytes())?;
    }

    prune(output, "", resolution)
}

/// Resolve packaging conflicts
///
/// Collect all sources of the selected Android platform plus the extra
/// sources of `options`, resolve them according to the packaging rules of
/// the platform, and return a report of the resolution. If an output
/// directory is given, the surviving files are staged into it.
pub fn resolve(
    manifest: &crate::manifest::Manifest,
    options: &Options<'_>,
) -> Result<Report, Error> {
    let (platform, android) = crate::op::check::select(manifest, options.platform)
        .map_err(Error::from_check)?;
    let default = crate::manifest::RawPackaging::default();
    let packaging = android.packaging.as_ref().unwrap_or(&default);

    let rules = packaging.rules()?;
    let no_compress = packaging.no_compress();

    // Extra sources must not shadow manifest sources, otherwise their
    // candidates could not be told apart in the report.
    let mut sources = packaging.sources(options.base);
    for source in options.sources.iter() {
        if !crate::manifest::Manifest::is_identifier(&source.id) {
            return Err(Error::SourceId(source.id.clone()));
        }
        if sources.iter().any(|v| v.id == source.id) {
            return Err(Error::DuplicateSource(source.id.clone()));
        }
        sources.push(source.clone());
    }

    let candidates = crate::packaging::collect::collect(&sources)?;
    let n_candidates = candidates.len();

    let resolution = crate::packaging::resolve::resolve(&rules, candidates)?;

    let mut abis = std::collections::BTreeMap::new();
    let mut entries = Vec::with_capacity(resolution.len());
    for (path, entry) in resolution.entries() {
        let abi = entry.file.abi();
        if let Some(v) = abi {
            *abis.entry(v).or_insert(0) += 1;
        }

        let (pattern, others) = match &entry.decision {
            crate::packaging::resolve::Decision::Unique => (None, Vec::new()),
            crate::packaging::resolve::Decision::PickFirst { pattern, rejected } => {
                (Some(pattern.clone()), rejected.clone())
            },
            crate::packaging::resolve::Decision::Identical { duplicates } => {
                (None, duplicates.clone())
            },
        };

        entries.push(
            ReportEntry {
                path: path.to_string(),
                source: entry.file.source.clone(),
                abi: abi,
                size: entry.file.content.len(),
                sha256: entry.file.content.digest(),
                compress: !no_compress.matches(path),
                decision: entry.decision.label(),
                pattern: pattern,
                others: others,
            }
        );
    }

    let excluded = resolution.excluded().map(
        |(path, v)| ReportExclusion {
            path: path.to_string(),
            pattern: v.pattern.clone(),
            sources: v.sources.clone(),
        }
    ).collect();

    let staged = match options.output {
        Some(output) => {
            stage(output, &resolution)?;
            Some(output.display().to_string())
        },
        None => None,
    };

    tracing::info!(
        platform = platform.id.as_str(),
        candidates = n_candidates,
        entries = entries.len(),
        "packaging conflicts resolved"
    );

    Ok(
        Report {
            platform: platform.id.clone(),
            candidates: n_candidates,
            entries: entries,
            excluded: excluded,
            abis: abis,
            staged: staged,
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &std::path::Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    const MANIFEST: &str = "
        version = 1
        [[platform]]
        id = \"android\"
        [platform.android.packaging]
        excludes = [\"META-INF/*\"]
        pick-firsts = [\"lib/*/libjni.so\"]
        no-compress = [\"tflite\"]
        [[platform.android.packaging.source]]
        id = \"cpu\"
        path = \"cpu\"
    ";

    // Verify resolution and staging
    //
    // Resolve a manifest source plus an extra source, stage the result, and
    // verify stale files are pruned from the staging directory.
    #[test]
    fn resolve_stage() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "cpu/lib/x86/libjni.so", "cpu-x86");
        write(dir.path(), "cpu/META-INF/LICENSE", "cpu");
        write(dir.path(), "cpu/assets/model.tflite", "model");
        write(dir.path(), "gpu/lib/x86/libjni.so", "gpu-x86");
        write(dir.path(), "gpu/lib/x86/libgpu.so", "gpu");
        write(dir.path(), "gpu/META-INF/LICENSE", "gpu");
        write(dir.path(), "out/stale/file.txt", "stale");

        let m = crate::manifest::Manifest::parse_str(MANIFEST).unwrap();
        let sources = [crate::packaging::collect::Source::new("gpu", dir.path().join("gpu"))];
        let output = dir.path().join("out");
        let options = Options {
            platform: None,
            base: dir.path(),
            sources: &sources,
            output: Some(output.as_path()),
        };

        let report = resolve(&m, &options).unwrap();

        assert_eq!(report.candidates, 6);
        let paths: Vec<&str> = report.entries.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, ["assets/model.tflite", "lib/x86/libgpu.so", "lib/x86/libjni.so"]);
        assert!(!report.entries[0].compress);
        assert!(report.entries[1].compress);
        assert_eq!(report.entries[2].source, "cpu");
        assert_eq!(report.entries[2].decision, "pick-first");
        assert_eq!(report.entries[2].others, ["gpu"]);
        assert_eq!(report.excluded[0].path, "META-INF/LICENSE");
        assert_eq!(report.abis.get(&crate::platform::android::Abi::X86), Some(&2));

        assert_eq!(std::fs::read(output.join("lib/x86/libjni.so")).unwrap(), b"cpu-x86");
        assert!(!output.join("META-INF/LICENSE").exists());
        assert!(!output.join("stale/file.txt").exists());
        assert!(!output.join("stale").exists());
        assert!(output.join("lib/x86").is_dir());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["entries"][2]["abi"], "x86");
        assert_eq!(json["abis"]["x86"], 2);

        // Once the last file of a directory is gone, the directory goes too.
        std::fs::remove_file(dir.path().join("cpu/assets/model.tflite")).unwrap();
        resolve(&m, &options).unwrap();
        assert!(!output.join("assets").exists());
        assert!(output.is_dir());
    }

    // Verify conflicts abort before staging
    #[test]
    fn resolve_conflict() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "cpu/res/a.txt", "a");
        write(dir.path(), "gpu/res/a.txt", "b");

        let m = crate::manifest::Manifest::parse_str(MANIFEST).unwrap();
        let sources = [crate::packaging::collect::Source::new("gpu", dir.path().join("gpu"))];
        let output = dir.path().join("out");
        let options = Options {
            platform: None,
            base: dir.path(),
            sources: &sources,
            output: Some(output.as_path()),
        };

        match resolve(&m, &options) {
            Err(Error::Conflict(v)) => {
                assert_eq!(v.path, "res/a.txt");
                assert_eq!(v.sources, ["cpu", "gpu"]);
            },
            v => panic!("unexpected result: {:?}", v),
        }
        assert!(!output.exists());
    }

    // Verify duplicate sources are refused
    #[test]
    fn resolve_duplicate_source() {
        let dir = tempfile::tempdir().unwrap();
        let m = crate::manifest::Manifest::parse_str(MANIFEST).unwrap();
        let sources = [crate::packaging::collect::Source::new("cpu", dir.path())];
        let options = Options {
            platform: None,
            base: dir.path(),
            sources: &sources,
            output: None,
        };

        assert!(matches!(resolve(&m, &options), Err(Error::DuplicateSource(v)) if v == "cpu"));
    }

    // Verify extra source identifiers follow the manifest identifier rule
    #[test]
    fn resolve_source_id() {
        let dir = tempfile::tempdir().unwrap();
        let m = crate::manifest::Manifest::parse_str(MANIFEST).unwrap();

        for id in ["", "gpu\"", "gpu\n", "a b"] {
            let sources = [crate::packaging::collect::Source::new(id, dir.path())];
            let options = Options {
                platform: None,
                base: dir.path(),
                sources: &sources,
                output: None,
            };

            assert!(matches!(resolve(&m, &options), Err(Error::SourceId(v)) if v == id));
        }
    }
}
