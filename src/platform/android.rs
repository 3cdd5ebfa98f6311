//! Android Platform Packaging
//!
//! This module documents how Android application packages are laid out, as
//! far as packaging conflict resolution is concerned, and provides the
//! architecture identifiers used for native libraries.
//!
//! An Android application package (APK, or the base module of an app bundle)
//! is a ZIP archive. The Android Gradle Plugin assembles it from the
//! compiled application, its resources, and every Java resource and native
//! library contributed by the dependencies of the application. Each
//! contributed file has an archive path, and each archive path can only be
//! present once in the final archive. If two dependencies ship a file with
//! the same archive path, the packager has to be told which one to keep, or
//! whether to drop the path entirely. Otherwise, the build fails.
//!
//! The most common offenders are license files and service descriptors in
//! `META-INF/`, and native libraries bundled by more than one dependency
//! (for instance, the JNI glue of an inference runtime pulled in by both
//! its CPU and GPU flavour):
//!
//! ```text
//! <package>.apk
//! ├── AndroidManifest.xml
//! ├── classes.dex
//! ├── META-INF/
//! │   ├── LICENSE
//! │   └── ...
//! ├── assets/
//! │   └── model.tflite
//! ├── lib/
//! │   ├── armeabi-v7a/
//! │   │   └── libtensorflowlite_jni.so
//! │   ├── arm64-v8a/
//! │   │   └── libtensorflowlite_jni.so
//! │   ├── x86/
//! │   │   └── libtensorflowlite_jni.so
//! │   └── x86_64/
//! │       └── libtensorflowlite_jni.so
//! └── res/
//!     └── ...
//! ```
//!
//! Native libraries live in `lib/<abi>/`, one directory per supported CPU
//! architecture (ABI). Files in different ABI directories never conflict
//! with each other, even if their file names are equal, since the device
//! only ever loads the libraries of a single ABI. Conflicts are always
//! between files of the same ABI, and a rule naming an ABI-qualified path
//! only ever affects that ABI.

/// Native Library Directory
///
/// Name of the top-level archive directory holding the per-ABI native
/// library directories.
pub const LIB_DIR: &str = "lib";

/// Android ABI Identifier
///
/// This enum is an enumeration of the CPU architectures supported by the
/// Android NDK. It implements `FromStr` to allow creation from the ABI
/// directory names. Use `as_str()` to get a static string-representation
/// back.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Abi {
    ArmeabiV7a,
    Arm64V8a,
    X86,
    X86_64,
}

impl Abi {
    /// All ABIs
    ///
    /// Every supported ABI in the order the NDK lists them.
    pub const ALL: [Abi; 4] = [
        Abi::ArmeabiV7a,
        Abi::Arm64V8a,
        Abi::X86,
        Abi::X86_64,
    ];

    /// Get string representation
    ///
    /// Return the ABI directory name. This is guaranteed to be parsable by
    /// the `FromStr` implementation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Abi::ArmeabiV7a => "armeabi-v7a",
            Abi::Arm64V8a => "arm64-v8a",
            Abi::X86 => "x86",
            Abi::X86_64 => "x86_64",
        }
    }

    /// Detect ABI of an archive path
    ///
    /// Return the ABI an archive path belongs to, if it is located in a
    /// native library directory (`lib/<abi>/...`). Paths directly in `lib/`,
    /// paths in unknown ABI directories, and all other paths yield `None`.
    pub fn from_archive_path(path: &str) -> Option<Self> {
        let mut segments = path.trim_start_matches('/').split('/');

        if segments.next() != Some(LIB_DIR) {
            return None;
        }

        let abi = segments.next()?;

        // Require at least one segment below the ABI directory, otherwise
        // this is not a file in the ABI directory.
        match segments.next() {
            Some(v) if !v.is_empty() => abi.parse().ok(),
            _ => None,
        }
    }
}

impl std::fmt::Display for Abi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Parse ABI identifiers from strings
//
// ABI directory names are case-sensitive on the device, so unlike the
// platform identifiers of the manifest, this uses exact matching.
impl std::str::FromStr for Abi {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Abi::ALL.iter().copied().find(|v| v.as_str() == s).ok_or(())
    }
}

impl serde::Serialize for Abi {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
