//! Packaging Conflict Resolution
//!
//! The resolver takes the rules of the application and the candidate files
//! contributed by all sources, and decides which file ends up at each
//! archive path. For every archive path:
//!
//!  1. If an exclusion rule matches, the path is dropped, no matter how many
//!     sources contribute it.
//!  2. If only a single candidate exists, it is kept.
//!  3. If a pick-first rule matches, the most specific such rule picks one
//!     candidate. The first of its preferred sources that contributed the
//!     path wins. Without preferences, the lexicographically smallest
//!     source identifier wins.
//!  4. If all candidates carry identical content, the first one is kept.
//!  5. Otherwise, the path is in conflict and resolution fails.
//!
//! Candidates of a path are sorted by source and content before any
//! decision is made. Therefore, the outcome never depends on the order the
//! candidates were collected in.
//!
//! Archive paths are resolved independently of each other and in parallel.
//! Each path is handled by exactly one task, and the results are merged in
//! path order once all tasks finished.

use rayon::prelude::*;

use crate::packaging::candidate::{CandidateFile, Content};
use crate::packaging::rule::RuleSet;

/// Conflict Error
///
/// An archive path is contributed by multiple sources with differing
/// content, and no rule resolves it. This is fatal for the current build.
/// Retrying cannot help, a rule has to be added.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("path '{path}' is contributed with differing content by: {}", .sources.join(", "))]
pub struct ConflictError {
    /// Archive path in conflict.
    pub path: String,
    /// Sorted identifiers of all contributing sources.
    pub sources: Vec<String>,
}

/// Resolution Decision
///
/// Records why a file ended up in the resolution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Decision {
    /// Only a single source contributed the path.
    Unique,
    /// A pick-first rule chose this file. `rejected` lists the sources of
    /// all other candidates.
    PickFirst {
        pattern: String,
        rejected: Vec<String>,
    },
    /// Multiple sources contributed byte-identical content. `duplicates`
    /// lists the sources of all other candidates.
    Identical {
        duplicates: Vec<String>,
    },
}

impl Decision {
    /// Short human-readable label for reports and logging.
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Unique => "unique",
            Decision::PickFirst { .. } => "pick-first",
            Decision::Identical { .. } => "identical",
        }
    }
}

/// Resolved Entry
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    pub file: CandidateFile,
    pub decision: Decision,
}

/// Excluded Path
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Exclusion {
    /// Pattern of the most specific exclusion rule matching the path.
    pub pattern: String,
    /// Sorted identifiers of all sources that contributed the path.
    pub sources: Vec<String>,
}

/// Resolution Result
///
/// Maps every surviving archive path to exactly one file, and records all
/// paths dropped by exclusion rules. Both are ordered by archive path.
#[derive(Clone, Debug, Default)]
pub struct Resolution {
    entries: std::collections::BTreeMap<String, Entry>,
    excluded: std::collections::BTreeMap<String, Exclusion>,
}

impl Resolution {
    /// Return the number of surviving archive paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether no archive path survived.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the resolved entry of an archive path.
    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    /// Look up the content that ends up at an archive path.
    pub fn content(&self, path: &str) -> Option<&Content> {
        self.entries.get(path).map(|v| &v.file.content)
    }

    /// Check whether an archive path survived.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Iterate surviving entries in archive path order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate excluded paths in archive path order.
    pub fn excluded(&self) -> impl Iterator<Item = (&str, &Exclusion)> {
        self.excluded.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Look up why an archive path was excluded, if it was.
    pub fn exclusion(&self, path: &str) -> Option<&Exclusion> {
        self.excluded.get(path)
    }

    /// Consume the resolution and return the surviving files in archive
    /// path order.
    pub fn into_files(self) -> Vec<CandidateFile> {
        self.entries.into_values().map(|v| v.file).collect()
    }
}

enum Outcome {
    Keep(Entry),
    Exclude(Exclusion),
    Conflict(ConflictError),
}

// Sorted, de-duplicated source identifiers of a sorted candidate group.
fn sources_of(group: &[CandidateFile]) -> Vec<String> {
    let mut v: Vec<String> = group.iter().map(|c| c.source.clone()).collect();
    v.dedup();
    v
}

// Resolve a single archive path
//
// `group` holds all candidates of `path`, sorted by source and content. It
// is never empty.
fn resolve_path(rules: &RuleSet, path: &str, mut group: Vec<CandidateFile>) -> Outcome {
    if let Some(rule) = rules.exclusion(path) {
        tracing::debug!(
            path,
            pattern = rule.pattern.as_str(),
            candidates = group.len(),
            "path excluded"
        );
        return Outcome::Exclude(
            Exclusion {
                pattern: rule.pattern.as_str().to_string(),
                sources: sources_of(&group),
            }
        );
    }

    if group.len() == 1 {
        return Outcome::Keep(
            Entry {
                file: group.remove(0),
                decision: Decision::Unique,
            }
        );
    }

    if let Some(rule) = rules.pick_first(path) {
        let index = rule.prefer.iter()
            .find_map(|s| group.iter().position(|c| &c.source == s))
            .unwrap_or(0);
        let file = group.remove(index);

        tracing::debug!(
            path,
            pattern = rule.pattern.as_str(),
            source = file.source.as_str(),
            candidates = group.len() + 1,
            "path picked"
        );

        return Outcome::Keep(
            Entry {
                file: file,
                decision: Decision::PickFirst {
                    pattern: rule.pattern.as_str().to_string(),
                    rejected: sources_of(&group),
                },
            }
        );
    }

    let first = &group[0].content;
    if group.iter().all(|c| &c.content == first) {
        let file = group.remove(0);

        tracing::debug!(
            path,
            source = file.source.as_str(),
            candidates = group.len() + 1,
            "identical duplicates merged"
        );

        return Outcome::Keep(
            Entry {
                file: file,
                decision: Decision::Identical {
                    duplicates: sources_of(&group),
                },
            }
        );
    }

    Outcome::Conflict(
        ConflictError {
            path: path.to_string(),
            sources: sources_of(&group),
        }
    )
}

/// Resolve packaging conflicts
///
/// Resolve the candidates contributed by all sources according to the rule
/// set. See the module documentation for the exact procedure. An empty
/// candidate set yields an empty resolution.
///
/// If multiple archive paths are in conflict, the error names the first of
/// them in archive path order.
pub fn resolve<I>(rules: &RuleSet, candidates: I) -> Result<Resolution, ConflictError>
where
    I: IntoIterator<Item = CandidateFile>,
{
    let mut groups: std::collections::BTreeMap<String, Vec<CandidateFile>> =
        std::collections::BTreeMap::new();
    for candidate in candidates {
        groups.entry(candidate.path.clone()).or_default().push(candidate);
    }

    // Collect into a `Vec` so the parallel iterator is indexed and `collect`
    // preserves path order.
    let groups: Vec<(String, Vec<CandidateFile>)> = groups.into_iter().collect();
    let outcomes: Vec<(String, Outcome)> = groups
        .into_par_iter()
        .map(|(path, mut group)| {
            group.sort_by(
                |a, b| a.source.cmp(&b.source).then_with(|| a.content.cmp(&b.content))
            );
            let outcome = resolve_path(rules, &path, group);
            (path, outcome)
        })
        .collect();

    let mut resolution = Resolution::default();
    for (path, outcome) in outcomes {
        match outcome {
            Outcome::Keep(entry) => {
                resolution.entries.insert(path, entry);
            },
            Outcome::Exclude(exclusion) => {
                resolution.excluded.insert(path, exclusion);
            },
            Outcome::Conflict(error) => {
                tracing::debug!(
                    path = error.path.as_str(),
                    sources = ?error.sources,
                    "unresolved conflict"
                );
                return Err(error);
            },
        }
    }

    tracing::debug!(
        entries = resolution.entries.len(),
        excluded = resolution.excluded.len(),
        "resolution complete"
    );

    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packaging::rule::{Rule, Verdict};

    fn rules(v: &[(Verdict, &str)]) -> RuleSet {
        RuleSet::new(v.iter().map(|(verdict, pattern)| Rule::parse(*verdict, pattern).unwrap()))
    }

    // Verify empty input
    //
    // No candidates is a valid input and must yield an empty resolution.
    #[test]
    fn resolve_empty() {
        let r = resolve(&RuleSet::default(), Vec::<CandidateFile>::new()).unwrap();

        assert!(r.is_empty());
        assert_eq!(r.excluded().count(), 0);
    }

    // Verify pass-through of unique paths
    //
    // Without collisions, every candidate is returned unchanged, no matter
    // which pick-first rules exist.
    #[test]
    fn resolve_unique() {
        let candidates = vec![
            CandidateFile::new("res/a.png", "s1", "blobA"),
            CandidateFile::new("lib/x86/libx.so", "s1", "x86"),
            CandidateFile::new("lib/arm64-v8a/libx.so", "s2", "arm64"),
        ];
        let set = rules(&[(Verdict::PickFirst, "lib/**")]);

        let r = resolve(&set, candidates.clone()).unwrap();

        assert_eq!(r.len(), 3);
        assert_eq!(r.content("res/a.png").unwrap(), &Content::from("blobA"));
        assert_eq!(r.get("res/a.png").unwrap().decision, Decision::Unique);
        assert_eq!(r.into_files().len(), candidates.len());
    }

    // Verify exclusion
    //
    // Excluded paths never survive, for single and multiple candidates, and
    // adding more candidates does not change that.
    #[test]
    fn resolve_exclude() {
        let set = rules(&[(Verdict::Exclude, "META-INF/*")]);
        let mut candidates = vec![
            CandidateFile::new("META-INF/LICENSE", "sourceA", "blobX"),
            CandidateFile::new("META-INF/LICENSE", "sourceB", "blobY"),
            CandidateFile::new("META-INF/services/foo", "sourceA", "only"),
            CandidateFile::new("classes.dex", "app", "dex"),
        ];

        let r = resolve(&set, candidates.clone()).unwrap();
        assert!(!r.contains("META-INF/LICENSE"));
        assert!(!r.contains("META-INF/services/foo"));
        assert!(r.contains("classes.dex"));
        assert_eq!(
            r.exclusion("META-INF/LICENSE").unwrap(),
            &Exclusion {
                pattern: "META-INF/*".to_string(),
                sources: vec!["sourceA".to_string(), "sourceB".to_string()],
            },
        );

        candidates.push(CandidateFile::new("META-INF/LICENSE", "sourceC", "blobZ"));
        let r = resolve(&set, candidates).unwrap();
        assert!(!r.contains("META-INF/LICENSE"));
        assert_eq!(r.len(), 1);
    }

    // Verify exclusion wins over pick-first
    #[test]
    fn resolve_exclude_before_pick_first() {
        let set = rules(&[
            (Verdict::PickFirst, "META-INF/LICENSE"),
            (Verdict::Exclude, "META-INF/*"),
        ]);
        let candidates = vec![
            CandidateFile::new("META-INF/LICENSE", "a", "1"),
            CandidateFile::new("META-INF/LICENSE", "b", "2"),
        ];

        let r = resolve(&set, candidates).unwrap();
        assert!(r.is_empty());
        assert!(r.exclusion("META-INF/LICENSE").is_some());
    }

    // Verify pick-first determinism
    //
    // The chosen candidate must be the same for repeated runs and for any
    // order of the input candidates.
    #[test]
    fn resolve_pick_first() {
        let set = rules(&[(Verdict::PickFirst, "lib/arm64-v8a/libx.so")]);
        let candidates = vec![
            CandidateFile::new("lib/arm64-v8a/libx.so", "sourceB", "blob2"),
            CandidateFile::new("lib/arm64-v8a/libx.so", "sourceA", "blob1"),
        ];
        let mut reversed = candidates.clone();
        reversed.reverse();

        let r1 = resolve(&set, candidates.clone()).unwrap();
        let r2 = resolve(&set, candidates).unwrap();
        let r3 = resolve(&set, reversed).unwrap();

        assert_eq!(r1.len(), 1);
        let e = r1.get("lib/arm64-v8a/libx.so").unwrap();
        assert_eq!(e.file.source, "sourceA");
        assert_eq!(e.file.content, Content::from("blob1"));
        assert_eq!(
            e.decision,
            Decision::PickFirst {
                pattern: "lib/arm64-v8a/libx.so".to_string(),
                rejected: vec!["sourceB".to_string()],
            },
        );
        assert_eq!(r2.get("lib/arm64-v8a/libx.so"), Some(e));
        assert_eq!(r3.get("lib/arm64-v8a/libx.so"), Some(e));
    }

    // Verify preferred sources
    //
    // The most specific rule decides, and its first present preferred
    // source wins over lexicographic order. Absent preferred sources are
    // skipped.
    #[test]
    fn resolve_pick_first_prefer() {
        let set = RuleSet::new(vec![
            Rule::parse(Verdict::PickFirst, "lib/*/libc++_shared.so").unwrap()
                .with_prefer(["missing", "zeta"]),
            Rule::parse(Verdict::PickFirst, "lib/x86/libc++_shared.so").unwrap()
                .with_prefer(["missing"]),
        ]);
        let candidates = vec![
            CandidateFile::new("lib/arm64-v8a/libc++_shared.so", "alpha", "a"),
            CandidateFile::new("lib/arm64-v8a/libc++_shared.so", "zeta", "z"),
            CandidateFile::new("lib/x86/libc++_shared.so", "alpha", "a"),
            CandidateFile::new("lib/x86/libc++_shared.so", "zeta", "z"),
        ];

        let r = resolve(&set, candidates).unwrap();

        assert_eq!(r.get("lib/arm64-v8a/libc++_shared.so").unwrap().file.source, "zeta");
        assert_eq!(r.get("lib/x86/libc++_shared.so").unwrap().file.source, "alpha");
    }

    // Verify identical duplicates
    //
    // Byte-identical content from several sources is no conflict.
    #[test]
    fn resolve_identical() {
        let candidates = vec![
            CandidateFile::new("x.txt", "s2", "same"),
            CandidateFile::new("x.txt", "s1", "same"),
        ];

        let r = resolve(&RuleSet::default(), candidates).unwrap();
        let e = r.get("x.txt").unwrap();

        assert_eq!(e.file.content, Content::from("same"));
        assert_eq!(
            e.decision,
            Decision::Identical { duplicates: vec!["s2".to_string()] },
        );
        assert_eq!(e.decision.label(), "identical");
    }

    // Verify conflicts
    //
    // Differing content without a rule fails closed, naming the path and
    // all sources. With several conflicts, the first path is reported.
    #[test]
    fn resolve_conflict() {
        let candidates = vec![
            CandidateFile::new("x.txt", "s2", "blob2"),
            CandidateFile::new("x.txt", "s1", "blob1"),
            CandidateFile::new("y.txt", "s1", "blob1"),
            CandidateFile::new("y.txt", "s3", "blob3"),
        ];

        let e = resolve(&RuleSet::default(), candidates).unwrap_err();

        assert_eq!(
            e,
            ConflictError {
                path: "x.txt".to_string(),
                sources: vec!["s1".to_string(), "s2".to_string()],
            },
        );
        assert_eq!(
            e.to_string(),
            "path 'x.txt' is contributed with differing content by: s1, s2",
        );
    }

    // Verify ABI separation
    //
    // Equal file names in different ABI directories never conflict, and
    // an ABI-qualified rule only affects its own ABI.
    #[test]
    fn resolve_abi() {
        let set = rules(&[(Verdict::PickFirst, "lib/x86/libx.so")]);
        let candidates = vec![
            CandidateFile::new("lib/x86/libx.so", "a", "1"),
            CandidateFile::new("lib/x86/libx.so", "b", "2"),
            CandidateFile::new("lib/x86_64/libx.so", "a", "3"),
        ];

        let r = resolve(&set, candidates.clone()).unwrap();
        assert_eq!(r.len(), 2);

        let mut candidates = candidates;
        candidates.push(CandidateFile::new("lib/x86_64/libx.so", "b", "4"));
        let e = resolve(&set, candidates).unwrap_err();
        assert_eq!(e.path, "lib/x86_64/libx.so");
    }
}
