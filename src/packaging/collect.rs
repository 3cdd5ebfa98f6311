//! Candidate Collection
//!
//! Sources are directories laid out like the archive they contribute to,
//! for instance an extracted Android library or the `jniLibs` directory of
//! a native dependency. Collection walks such a directory and turns every
//! regular file into a candidate, with the archive path being the path of
//! the file relative to the source root.
//!
//! Collection is the only part of packaging that touches the file system.
//! All file content is read into memory, so the resolver can operate on a
//! fully materialized candidate set.

use crate::packaging::candidate::CandidateFile;

/// Collection Errors
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// Reading the directory or file at the specified path failed.
    #[error("cannot read {path:?}: {error}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        error: std::io::Error,
    },
    /// The file name at the specified path is not valid UTF-8, and thus
    /// cannot be used as archive path.
    #[error("path {0:?} is not valid UTF-8")]
    NonUnicode(std::path::PathBuf),
}

/// Candidate Source
///
/// A contributing source, identified by `id`, with its content located in
/// the directory at `path`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Source {
    pub id: String,
    pub path: std::path::PathBuf,
}

impl Source {
    /// Create a new source.
    pub fn new(id: impl Into<String>, path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}

// Walk a directory recursively
//
// `prefix` holds the archive path segments of `dir`. Entries are visited in
// file name order so the candidate order is reproducible. Symlinks and
// other non-regular files are skipped.
fn walk(
    source: &str,
    dir: &std::path::Path,
    prefix: &mut Vec<String>,
    files: &mut Vec<CandidateFile>,
) -> Result<(), CollectError> {
    let mut entries = std::fs::read_dir(dir)
        .and_then(|v| v.collect::<Result<Vec<_>, _>>())
        .map_err(
            |v| CollectError::Io { path: dir.to_path_buf(), error: v },
        )?;
    entries.sort_by_key(|v| v.file_name());

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name().into_string().map_err(
            |_| CollectError::NonUnicode(path.clone()),
        )?;
        let kind = entry.file_type().map_err(
            |v| CollectError::Io { path: path.clone(), error: v },
        )?;

        if kind.is_dir() {
            prefix.push(name);
            walk(source, &path, prefix, files)?;
            prefix.pop();
        } else if kind.is_file() {
            let content = std::fs::read(&path).map_err(
                |v| CollectError::Io { path: path.clone(), error: v },
            )?;
            prefix.push(name);
            files.push(CandidateFile::new(prefix.join("/"), source, content));
            prefix.pop();
        } else {
            tracing::warn!(source, path = ?path, "skipping non-regular file");
        }
    }

    Ok(())
}

/// Collect a single source directory
///
/// Read all regular files below `root` into candidates of the source
/// `source`. Candidates are returned in archive path order.
pub fn collect_dir(
    source: &str,
    root: &std::path::Path,
) -> Result<Vec<CandidateFile>, CollectError> {
    let mut files = Vec::new();
    let mut prefix = Vec::new();

    walk(source, root, &mut prefix, &mut files)?;

    // File name order of the walk is not archive path order, since `/`
    // sorts after characters like `-`.
    files.sort_by(|a, b| a.path.cmp(&b.path));

    tracing::debug!(source, root = ?root, files = files.len(), "source collected");

    Ok(files)
}

/// Collect all sources
///
/// Collect every source via `collect_dir()` and concatenate the results.
pub fn collect(sources: &[Source]) -> Result<Vec<CandidateFile>, CollectError> {
    let mut files = Vec::new();

    for source in sources.iter() {
        files.extend(collect_dir(&source.id, &source.path)?);
    }

    Ok(files)
}
