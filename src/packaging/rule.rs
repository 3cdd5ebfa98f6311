//! Packaging Rules
//!
//! Rules tell the resolver what to do with archive paths contributed by
//! more than one source. Every rule pairs a pattern with a verdict. The rule
//! set orders rules explicitly, rather than relying on declaration order:
//! exclusions are always consulted before pick-first rules, and within each
//! verdict the most specific pattern takes precedence.

use crate::packaging::pattern::{Pattern, PatternError};

/// Rule Verdict
///
/// The action taken for archive paths matched by a rule.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    /// Drop the path from the package, regardless of how many sources
    /// contribute it.
    Exclude,
    /// Keep exactly one of the contributed files, chosen deterministically.
    PickFirst,
}

impl Verdict {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Exclude => "exclude",
            Verdict::PickFirst => "pick-first",
        }
    }
}

/// Packaging Rule
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rule {
    pub pattern: Pattern,
    pub verdict: Verdict,
    /// Source identifiers in order of preference. Only meaningful for
    /// `PickFirst`. If empty, or if none of the sources contributed the
    /// path, the lexicographically smallest source identifier wins.
    pub prefer: Vec<String>,
}

impl Rule {
    /// Create an exclusion rule.
    pub fn exclude(pattern: Pattern) -> Self {
        Self {
            pattern: pattern,
            verdict: Verdict::Exclude,
            prefer: Vec::new(),
        }
    }

    /// Create a pick-first rule without source preferences.
    pub fn pick_first(pattern: Pattern) -> Self {
        Self {
            pattern: pattern,
            verdict: Verdict::PickFirst,
            prefer: Vec::new(),
        }
    }

    /// Compile a rule
    ///
    /// Convenience helper that compiles the pattern and creates a rule
    /// with the given verdict and no source preferences.
    pub fn parse(verdict: Verdict, pattern: &str) -> Result<Self, PatternError> {
        let pattern = Pattern::new(pattern)?;
        Ok(
            match verdict {
                Verdict::Exclude => Self::exclude(pattern),
                Verdict::PickFirst => Self::pick_first(pattern),
            }
        )
    }

    /// Set the preferred sources of this rule.
    pub fn with_prefer<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefer = sources.into_iter().map(Into::into).collect();
        self
    }
}

/// Ordered Rule Set
///
/// An immutable set of rules, split by verdict and sorted by decreasing
/// specificity. Rules of equal specificity retain their declaration order.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    excludes: Vec<Rule>,
    pick_firsts: Vec<Rule>,
}

impl RuleSet {
    /// Create rule set
    ///
    /// Take an ordered sequence of rules and sort them into their final
    /// precedence.
    pub fn new<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = Rule>,
    {
        let (mut excludes, mut pick_firsts): (Vec<Rule>, Vec<Rule>) = rules
            .into_iter()
            .partition(|v| v.verdict == Verdict::Exclude);

        // `sort_by` is stable, so equal specificity keeps declaration order.
        excludes.sort_by(|a, b| b.pattern.specificity().cmp(&a.pattern.specificity()));
        pick_firsts.sort_by(|a, b| b.pattern.specificity().cmp(&a.pattern.specificity()));

        Self {
            excludes: excludes,
            pick_firsts: pick_firsts,
        }
    }

    /// Return the number of rules in the set.
    pub fn len(&self) -> usize {
        self.excludes.len() + self.pick_firsts.len()
    }

    /// Check whether the set has no rules.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate all rules in precedence order
    ///
    /// Exclusions come first, followed by pick-first rules, each sorted from
    /// most to least specific.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.excludes.iter().chain(self.pick_firsts.iter())
    }

    /// Find the most specific exclusion rule matching `path`.
    pub fn exclusion(&self, path: &str) -> Option<&Rule> {
        self.excludes.iter().find(|v| v.pattern.matches(path))
    }

    /// Find the most specific pick-first rule matching `path`.
    pub fn pick_first(&self, path: &str) -> Option<&Rule> {
        self.pick_firsts.iter().find(|v| v.pattern.matches(path))
    }
}
