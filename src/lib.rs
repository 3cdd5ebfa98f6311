//! Osiris Packaging Conflict Resolution
//!
//! The osiris packaging module decides which files end up in the package of
//! an Android application, when several dependencies contribute files with
//! the same archive path. It is a standalone module, usable from build
//! scripts, from other osiris tooling, or via the `osiris-packaging`
//! command-line tool.
//!
//! Android packages are assembled from the compiled application plus every
//! Java resource and native library of its dependencies. Dependencies
//! frequently ship the same file: license files in `META-INF/`, or the JNI
//! glue of a native runtime bundled by both its CPU and its GPU flavour.
//! Since every archive path can only be present once, the application has
//! to declare how such duplicates are resolved. Undeclared duplicates with
//! differing content abort the build, rather than silently shipping an
//! arbitrary variant.
//!
//! Model
//! -----
//!
//! Resolution operates on two inputs:
//!
//!  * The **rules** of the application, an ordered list of patterns each
//!    paired with a verdict: `exclude` drops a path, `pick-first` keeps
//!    exactly one of its candidates. Exclusions always take precedence over
//!    pick-first rules, and specific patterns take precedence over general
//!    ones. See [`packaging::pattern`] for the pattern language.
//!
//!  * The **candidates**, every file contributed by every source, with its
//!    archive path, the identifier of its source, and its opaque content.
//!
//! The output is a [`packaging::resolve::Resolution`], mapping every
//! surviving archive path to exactly one file, or a
//! [`packaging::resolve::ConflictError`] naming the first path that no rule
//! resolves. Resolution is deterministic: the same inputs always yield the
//! same output, regardless of the order candidates were collected in.
//!
//! The resolver itself performs no I/O. Sources are collected from
//! directories by [`packaging::collect`], and the operations in [`op`]
//! combine collection, resolution, reporting and staging, driven by the
//! packaging manifest.
//!
//! Manifest
//! --------
//!
//! Rules and sources are configured in the Osiris Packaging Manifest, a
//! TOML-formatted file usually called `osiris-packaging.toml` placed in the
//! application repository. See [`manifest`] for its format.

pub mod manifest;

/// Packaging Operations
///
/// The `op` module is a collection of all operations that can be performed via
/// the command-line interface. Each operation is implemented in a submodule
/// and can be used independently.
pub mod op {
    pub mod check;
    pub mod resolve;
}

/// Packaging Conflict Resolution
///
/// The `packaging` module implements the resolver and everything it
/// operates on: patterns, rules, candidates, and their collection from
/// source directories.
pub mod packaging {
    pub mod candidate;
    pub mod collect;
    pub mod compress;
    pub mod pattern;
    pub mod resolve;
    pub mod rule;
}

/// Platform Integration
///
/// The `platform` module documents the package layout of each supported
/// platform.
pub mod platform {
    pub mod android;
}
