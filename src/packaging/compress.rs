//! Uncompressed Storage
//!
//! Some files must be stored uncompressed in the archive, so the runtime
//! can map them into memory directly. Inference models (`.tflite`) are the
//! typical example. The application lists the affected file extensions and
//! the packager stores every matching archive path without compression.

/// No-Compress Policy
///
/// A list of file extensions, matched case-insensitively against the end of
/// the final segment of an archive path.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NoCompress {
    suffixes: Vec<String>,
}

impl NoCompress {
    /// Create policy
    ///
    /// Create the policy from a list of extensions. A leading `.` on an
    /// extension is optional.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            suffixes: extensions
                .into_iter()
                .map(|v| format!(".{}", v.as_ref().trim_start_matches('.').to_ascii_lowercase()))
                .collect(),
        }
    }

    /// Iterate the configured extensions, without leading `.`.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.suffixes.iter().map(|v| &v[1..])
    }

    /// Check whether the file at `path` must be stored uncompressed.
    pub fn matches(&self, path: &str) -> bool {
        let name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();
        self.suffixes.iter().any(|v| name.ends_with(v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Verify extension matching
    //
    // Matching is case-insensitive and only considers the file name, never
    // directory names.
    #[test]
    fn no_compress_matches() {
        let v = NoCompress::new(["tflite", ".Bin"]);

        assert!(v.matches("assets/model.tflite"));
        assert!(v.matches("assets/MODEL.TFLITE"));
        assert!(v.matches("data.bin"));
        assert!(!v.matches("assets.tflite/model.json"));
        assert!(!v.matches("assets/tflite"));
        assert_eq!(v.extensions().collect::<Vec<_>>(), ["tflite", "bin"]);

        assert!(!NoCompress::default().matches("assets/model.tflite"));
    }
}
