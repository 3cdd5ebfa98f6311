//! Check Packaging Configuration
//!
//! The `check` operation validates the manifest and summarizes the
//! packaging configuration of an Android platform, with all rules listed in
//! the precedence the resolver applies them in. Nothing is read other than
//! the manifest, so this is cheap enough to run before every build.

/// Check Errors
///
/// This is the exhaustive list of possible errors raised by the check
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
}

/// Rule Summary
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuleSummary {
    pub pattern: String,
    pub verdict: crate::packaging::rule::Verdict,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub prefer: Vec<String>,
}

/// Source Summary
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceSummary {
    pub id: String,
    pub path: String,
}

/// Packaging Configuration Summary
///
/// The Android identity and SDK keys of the selected platform, followed by
/// its packaging configuration.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Summary {
    pub platform: String,

    pub application_id: Option<String>,
    pub namespace: Option<String>,
    pub compile_sdk: Option<u32>,
    pub min_sdk: Option<u32>,
    pub target_sdk: Option<u32>,
    pub version_code: Option<u32>,
    pub version_name: Option<String>,

    /// Rules in precedence order.
    pub rules: Vec<RuleSummary>,
    pub no_compress: Vec<String>,
    pub sources: Vec<SourceSummary>,
}

/// Select Android platform
///
/// Find the platform entry with the given ID, or the first Android
/// platform if no ID is given, and return it with its Android table.
pub fn select<'a>(
    manifest: &'a crate::manifest::Manifest,
    platform: Option<&str>,
) -> Result<(&'a crate::manifest::RawPlatform, &'a crate::manifest::RawPlatformAndroid), Error> {
    let v = manifest.raw.platform_android(platform).ok_or_else(
        || match platform {
            Some(id) => Error::Platform(id.to_string()),
            None => Error::ManifestKey("platform.android"),
        },
    )?;
    let android = v.android().ok_or(Error::ManifestKey("platform.android"))?;

    Ok((v, android))
}

/// Check packaging configuration
///
/// Select the Android platform and summarize its configuration. Source
/// paths are reported relative to `base`, the manifest directory.
pub fn check(
    manifest: &crate::manifest::Manifest,
    platform: Option<&str>,
    base: &std::path::Path,
) -> Result<Summary, Error> {
    let (platform, android) = select(manifest, platform)?;
    let default = crate::manifest::RawPackaging::default();
    let packaging = android.packaging.as_ref().unwrap_or(&default);

    let rules = packaging.rules()?;
    let rules: Vec<RuleSummary> = rules.iter().map(
        |v| RuleSummary {
            pattern: v.pattern.as_str().to_string(),
            verdict: v.verdict,
            prefer: v.prefer.clone(),
        }
    ).collect();

    let sources: Vec<SourceSummary> = packaging.sources(base).into_iter().map(
        |v| SourceSummary {
            id: v.id,
            path: v.path.display().to_string(),
        }
    ).collect();

    tracing::info!(
        platform = platform.id.as_str(),
        rules = rules.len(),
        sources = sources.len(),
        "packaging configuration valid"
    );

    Ok(
        Summary {
            platform: platform.id.clone(),
            application_id: android.application_id.clone(),
            namespace: android.namespace.clone(),
            compile_sdk: android.compile_sdk,
            min_sdk: android.min_sdk,
            target_sdk: android.target_sdk,
            version_code: android.version_code,
            version_name: android.version_name.clone(),
            rules: rules,
            no_compress: packaging.no_compress().extensions().map(String::from).collect(),
            sources: sources,
        }
    )
}
