//! Packaging Manifest
//!
//! This is a rust implementation of the Osiris Packaging Manifest Format.
//! Applications use this manifest to describe their Android platform
//! integration, the sources contributing files to their package, and the
//! rules used to resolve packaging conflicts between those sources.
//!
//! The manifest is TOML-formatted and usually called
//! `osiris-packaging.toml`. Packaging configuration is placed in the
//! `packaging` table of an Android platform:
//!
//! ```toml
//! version = 1
//!
//! [[platform]]
//! id = "android"
//!
//! [platform.android]
//! application-id = "com.example.test"
//!
//! [platform.android.packaging]
//! excludes = ["META-INF/*"]
//! pick-firsts = ["lib/arm64-v8a/libtensorflowlite_jni.so"]
//! no-compress = ["tflite"]
//!
//! [[platform.android.packaging.rule]]
//! pattern = "lib/*/libc++_shared.so"
//! verdict = "pick-first"
//! prefer = ["tensorflow-lite"]
//!
//! [[platform.android.packaging.source]]
//! id = "tensorflow-lite"
//! path = "deps/tensorflow-lite"
//! ```
//!
//! Rules are taken in order: all `rule` tables, followed by `excludes`,
//! followed by `pick-firsts`. Declaration order only matters to break ties
//! between pick-first rules of equal specificity.

use serde;
use toml;

use crate::packaging::{collect, compress, pattern, rule};

/// Manifest Errors
///
/// This is the exhaustive list of reasons a manifest is refused.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The manifest file could not be read.
    #[error("cannot read manifest: {0}")]
    Io(#[from] std::io::Error),
    /// The manifest is not valid TOML, or does not fit the manifest types.
    #[error("cannot parse manifest: {0}")]
    Toml(#[from] toml::de::Error),
    /// The manifest version is not supported.
    #[error("unsupported manifest version {0}")]
    Version(u32),
    /// The value of the specified key is invalid.
    #[error("invalid value for '{0}'")]
    Invalid(&'static str),
    /// A pattern of the specified packaging key is invalid.
    #[error("invalid pattern in '{key}': {error}")]
    Pattern {
        key: &'static str,
        #[source]
        error: pattern::PatternError,
    },
    /// The specified source identifier is used more than once.
    #[error("duplicate source '{0}'")]
    DuplicateSource(String),
}

/// Raw Manifest Application Table
///
/// Sub-type of `Raw` representing the `Application` table. This contains all
/// configuration regarding the application itself.
#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawApplication {
    /// Identifier of the application. Only alphanumeric and `-`, `_`
    /// allowed.
    pub id: Option<String>,
    /// Human-readable name of the application.
    pub name: Option<String>,
}

/// Packaging Rule Table
///
/// Sub-type of `RawPackaging` describing a single rule, including its
/// optional source preferences.
#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawRule {
    pub pattern: String,
    pub verdict: rule::Verdict,
    /// Source identifiers in order of preference.
    #[serde(default)]
    pub prefer: Vec<String>,
}

/// Packaging Source Table
///
/// Sub-type of `RawPackaging` describing a contributing source directory.
#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawSource {
    pub id: String,
    /// Path to the source directory relative from the manifest.
    pub path: String,
}

/// Packaging Table
///
/// Sub-type of `RawPlatformAndroid` with the packaging options. `excludes`,
/// `pick-firsts` and `no-compress` are one-to-one mappings of their
/// equivalents in the Android Gradle Plugin.
#[derive(Default, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawPackaging {
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub pick_firsts: Vec<String>,
    #[serde(default)]
    pub no_compress: Vec<String>,

    #[serde(default)]
    pub rule: Vec<RawRule>,
    #[serde(default)]
    pub source: Vec<RawSource>,
}

/// Android-Platform Table
///
/// Sub-type of `RawPlatform` defining the Android platform options. The
/// identity and SDK options are one-to-one mappings of their equivalents in
/// the Android Application SDK. They are validated and reported, but have
/// no influence on packaging.
#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawPlatformAndroid {
    pub application_id: Option<String>,
    pub namespace: Option<String>,

    pub compile_sdk: Option<u32>,
    pub min_sdk: Option<u32>,
    pub target_sdk: Option<u32>,

    pub version_code: Option<u32>,
    pub version_name: Option<String>,

    pub packaging: Option<RawPackaging>,
}

/// Raw Manifest Platform Table
///
/// Sub-type of `Raw` representing the `Platform` table. This contains all
/// configuration of a platform integration.
#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawPlatform {
    /// Custom ID of the platform integration.
    pub id: String,

    /// Android specific configuration. Tables of other platforms are
    /// ignored.
    pub android: Option<RawPlatformAndroid>,
}

/// Raw Manifest Content
///
/// This type contains the raw manifest content as parsed by `toml` and
/// converted into rust types via `serde`.
///
/// Note that content of the type is not verified other than for syntactic
/// correctness required by the given types. Semantic correctness needs to
/// be verified by the caller.
#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Raw {
    /// Version of the manifest format. Only version `1` is currently
    /// supported.
    pub version: u32,

    /// Application table specifying properties of the application itself.
    pub application: Option<RawApplication>,
    /// Platform table specifying all properties of the platform integration.
    #[serde(default)]
    pub platform: Vec<RawPlatform>,
}

/// Manifest Abstraction
///
/// This type represents a valid and verified manifest. The manifest content
/// can be directly accessed via the `raw` field. The data is verified for
/// semantic correctness (unlike the `Raw` type). In particular, all
/// packaging patterns are known to compile.
pub struct Manifest {
    /// Raw manifest content as parsed by the TOML module.
    pub raw: Raw,
}

impl RawPackaging {
    /// Compile packaging rules
    ///
    /// Compile all rules of the table into a rule set. The rules are taken
    /// in manifest order, see the module documentation.
    pub fn rules(&self) -> Result<rule::RuleSet, Error> {
        let mut rules = Vec::new();

        for v in self.rule.iter() {
            let pattern = pattern::Pattern::new(&v.pattern).map_err(
                |error| Error::Pattern { key: "packaging.rule.pattern", error: error },
            )?;
            rules.push(
                rule::Rule {
                    pattern: pattern,
                    verdict: v.verdict,
                    prefer: v.prefer.clone(),
                }
            );
        }

        for v in self.excludes.iter() {
            rules.push(
                rule::Rule::parse(rule::Verdict::Exclude, v).map_err(
                    |error| Error::Pattern { key: "packaging.excludes", error: error },
                )?
            );
        }

        for v in self.pick_firsts.iter() {
            rules.push(
                rule::Rule::parse(rule::Verdict::PickFirst, v).map_err(
                    |error| Error::Pattern { key: "packaging.pick-firsts", error: error },
                )?
            );
        }

        Ok(rule::RuleSet::new(rules))
    }

    /// Return the no-compress policy of the table.
    pub fn no_compress(&self) -> compress::NoCompress {
        compress::NoCompress::new(self.no_compress.iter())
    }

    /// Return sources
    ///
    /// Return all sources of the table, with their paths resolved relative
    /// to `base`, usually the directory of the manifest.
    pub fn sources(&self, base: &std::path::Path) -> Vec<collect::Source> {
        self.source.iter().map(
            |v| collect::Source::new(v.id.clone(), base.join(&v.path))
        ).collect()
    }
}

impl RawPlatform {
    /// Return Android Configuration
    ///
    /// Return a reference to the embedded android configuration, or `None`,
    /// depending on whether the platform configuration is for Android.
    pub fn android(&self) -> Option<&RawPlatformAndroid> {
        self.android.as_ref()
    }
}

impl Raw {
    fn parse_str(content: &str) -> Result<Self, Error> {
        Ok(toml::from_str(content)?)
    }

    /// Find matching platform entry
    ///
    /// Search the platform entries for the first entry matching the specified
    /// platform ID.
    pub fn platform_by_id(&self, id: &str) -> Option<&RawPlatform> {
        self.platform.iter().find(
            |v| v.id == id
        )
    }

    /// Select Android platform entry
    ///
    /// Return the platform entry with the given ID, or the first platform
    /// entry with Android configuration if no ID is given.
    pub fn platform_android(&self, id: Option<&str>) -> Option<&RawPlatform> {
        match id {
            Some(v) => self.platform_by_id(v),
            None => self.platform.iter().find(|v| v.android().is_some()),
        }
    }
}

impl Manifest {
    /// Check whether a string is a valid identifier
    ///
    /// This verifies that the given string consists of only alphanumeric
    /// characters plus `-`, `_`, `.`. Empty identifiers are rejected. The
    /// same rule applies to source identifiers given outside of the
    /// manifest.
    ///
    /// Any unicode alpha/numeric character is allowed.
    pub fn is_identifier(s: &str) -> bool {
        !s.is_empty() && s.chars().all(
            |v| v.is_alphanumeric() || v == '-' || v == '_' || v == '.'
        )
    }

    // Check whether a string contains no quotes or escapes
    //
    // This verifies that a string does not contain quotes or backslashes, nor
    // any control characters. Such strings can be reported verbatim in any
    // output format.
    fn is_quotable(s: &str) -> bool {
        s.chars().all(
            |v| !v.is_control()
                && v != '\\'
                && v != '\''
                && v != '"'
        )
    }

    fn verify_packaging(packaging: &RawPackaging) -> Result<(), Error> {
        // Compile all rules once, to refuse malformed patterns before any
        // resolution starts. The rule set is recompiled on use.
        packaging.rules()?;

        for rule in packaging.rule.iter() {
            if !rule.prefer.iter().all(|v| Self::is_identifier(v)) {
                return Err(Error::Invalid("packaging.rule.prefer"));
            }
        }

        // Extensions must be non-empty and must not span directories.
        for v in packaging.no_compress.iter() {
            let ext = v.trim_start_matches('.');
            if ext.is_empty() || ext.contains('/') || !Self::is_quotable(ext) {
                return Err(Error::Invalid("packaging.no-compress"));
            }
        }

        let mut ids = std::collections::BTreeSet::new();
        for source in packaging.source.iter() {
            if !Self::is_identifier(&source.id) {
                return Err(Error::Invalid("packaging.source.id"));
            }
            if !ids.insert(source.id.as_str()) {
                return Err(Error::DuplicateSource(source.id.clone()));
            }

            // Verify that source paths do not contain control characters.
            if source.path.is_empty() || source.path.chars().any(|v| v.is_control()) {
                return Err(Error::Invalid("packaging.source.path"));
            }
        }

        Ok(())
    }

    /// Parse manifest from raw
    ///
    /// Take a raw representation of the manifest and perform post-parsing
    /// validation, ensuring the final manifest will not contain invalid
    /// entries.
    fn parse_raw(raw: Raw) -> Result<Self, Error> {
        // We only support version '1'. Any other version number is explicitly
        // defined to be incompatible, so fail parsing.
        //
        // Note that we do support unknown-fields. Hence, it is valid to add
        // more fields to version '1' without breaking backwards compatibility.
        // However, they will be silently ignored by older implementations.
        if raw.version != 1 {
            return Err(Error::Version(raw.version));
        }

        if let Some(application) = &raw.application {
            if let Some(v) = &application.id {
                if !Self::is_identifier(v) {
                    return Err(Error::Invalid("application.id"));
                }
            }

            if let Some(v) = &application.name {
                if !Self::is_quotable(v) {
                    return Err(Error::Invalid("application.name"));
                }
            }
        }

        for platform in raw.platform.iter() {
            if !Self::is_identifier(&platform.id) {
                return Err(Error::Invalid("platform.id"));
            }

            if let Some(android) = platform.android() {
                if let Some(v) = &android.application_id {
                    if !Self::is_quotable(v) {
                        return Err(Error::Invalid("application-id"));
                    }
                }

                if let Some(v) = &android.namespace {
                    if !Self::is_quotable(v) {
                        return Err(Error::Invalid("namespace"));
                    }
                }

                if let Some(v) = &android.version_name {
                    if !Self::is_quotable(v) {
                        return Err(Error::Invalid("version-name"));
                    }
                }

                // An SDK level below the minimum SDK cannot be satisfied.
                if let (Some(min), Some(target)) = (android.min_sdk, android.target_sdk) {
                    if target < min {
                        return Err(Error::Invalid("target-sdk"));
                    }
                }

                if let Some(packaging) = &android.packaging {
                    Self::verify_packaging(packaging)?;
                }
            }
        }

        Ok(
            Self {
                raw: raw,
            }
        )
    }

    /// Parse manifest from string
    ///
    /// Parse the given string as a literal manifest in TOML representation.
    /// Content is verified and invalid manifests are refused.
    pub fn parse_str(content: &str) -> Result<Self, Error> {
        Raw::parse_str(content).and_then(Self::parse_raw)
    }

    /// Parse manifest from file-system
    ///
    /// Open the specified file and parse it as a manifest. The content is
    /// verified and invalid manifests are refused. The file is completely
    /// parsed into memory and then closed again before the function returns.
    pub fn parse_path(path: &std::path::Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content)
    }
}
