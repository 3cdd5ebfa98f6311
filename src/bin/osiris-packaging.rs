//! Osiris Packaging Tooling
//!
//! This is the entry-point of `osiris-packaging`, a command-line tool to
//! resolve packaging conflicts of Android applications. Its main input is
//! the `osiris-packaging.toml` manifest, which specifies the packaging rules
//! and the sources contributing files to the package. This tool reads the
//! manifest, validates it, resolves the candidates of all sources and
//! optionally stages the result for the packager.
//!
//! See the documentation of the `osiris-packaging` library for details on
//! the manifest, the resolution rules, as well as the different supported
//! operations.
//!
//! This CLI is mainly a dispatcher of all the operations available in
//! `osiris_packaging::op::*`. It is a simple clap-based CLI that forwards the
//! arguments to `osiris_packaging` and visualizes the results. Logs are
//! written to STDERR, results to STDOUT.

use clap;
use osiris_packaging;

struct Cli {
    cmd: clap::Command,
}

fn arg_source(
    s: &str,
) -> Result<osiris_packaging::packaging::collect::Source, clap::error::Error> {
    match s.split_once('=') {
        Some((id, path))
            if osiris_packaging::manifest::Manifest::is_identifier(id) && !path.is_empty() =>
        {
            Ok(osiris_packaging::packaging::collect::Source::new(id, path))
        },
        Some((_, path)) if !path.is_empty() => {
            Err(clap::error::Error::raw(
                clap::error::ErrorKind::ValueValidation,
                "Invalid source ID, only alphanumerics, '-', '_' and '.' allowed",
            ))
        },
        _ => {
            Err(clap::error::Error::raw(
                clap::error::ErrorKind::ValueValidation,
                "Invalid source, expected ID=PATH",
            ))
        },
    }
}

fn arg_platform() -> clap::Arg {
    clap::Arg::new("platform")
        .long("platform")
        .value_name("ID")
        .help("ID of the platform to operate on (defaults to the first Android platform)")
}

fn arg_format() -> clap::Arg {
    clap::Arg::new("format")
        .long("format")
        .value_name("FORMAT")
        .help("Output format of the result")
        .default_value("text")
        .value_parser(clap::builder::PossibleValuesParser::new(["text", "json"]))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), u8> {
    match serde_json::to_string_pretty(value) {
        Ok(v) => {
            println!("{}", v);
            Ok(())
        },
        Err(e) => {
            eprintln!("Cannot serialize result: {}", e);
            Err(1)
        },
    }
}

impl Cli {
    fn new() -> Self {
        let mut cmd;

        cmd = clap::Command::new("osiris-packaging")
            .propagate_version(true)
            .subcommand_required(true)
            .about("Osiris Packaging Tooling")
            .long_about("Resolve packaging conflicts of Android applications")
            .version(clap::crate_version!());

        cmd = cmd.arg(
            clap::Arg::new("manifest")
                .long("manifest")
                .value_name("PATH")
                .help("Path to the packaging manifest relative to the working directory")
                .default_value("./osiris-packaging.toml")
                .global(true)
                .value_parser(clap::builder::ValueParser::os_string())
        );

        cmd = cmd.arg(
            clap::Arg::new("log-level")
                .long("log-level")
                .value_name("FILTER")
                .help("Log filter directive, for instance `info` or `osiris_packaging=debug`")
                .default_value("warn")
                .global(true)
        );

        cmd = cmd.subcommand(
            clap::Command::new("check")
                .about("Validate the manifest and summarize the packaging configuration")
                .arg(arg_platform())
                .arg(arg_format())
        );

        cmd = cmd.subcommand(
            clap::Command::new("resolve")
                .about("Resolve packaging conflicts of all sources")
                .arg(arg_platform())
                .arg(
                    clap::Arg::new("source")
                        .long("source")
                        .value_name("ID=PATH")
                        .help("Additional source directory, may be given multiple times")
                        .action(clap::ArgAction::Append)
                        .value_parser(arg_source)
                )
                .arg(
                    clap::Arg::new("output")
                        .long("output")
                        .value_name("DIR")
                        .help("Directory to stage the surviving files into")
                        .value_parser(clap::builder::ValueParser::os_string())
                )
                .arg(arg_format())
        );

        Self {
            cmd: cmd,
        }
    }

    fn init_tracing(&self, m: &clap::ArgMatches) {
        let level = m.get_one::<String>("log-level").map(String::as_str).unwrap_or("warn");
        let filter = tracing_subscriber::EnvFilter::try_new(level)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    fn manifest(
        &self,
        m: &clap::ArgMatches,
    ) -> Result<(osiris_packaging::manifest::Manifest, std::path::PathBuf), u8> {
        let manifest_path = std::path::PathBuf::from(
            m.get_one::<std::ffi::OsString>("manifest").expect("Cannot acquire manifest path"),
        );

        // Source paths in the manifest are relative to its directory.
        let base = match manifest_path.parent() {
            Some(v) if !v.as_os_str().is_empty() => v.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };

        match osiris_packaging::manifest::Manifest::parse_path(&manifest_path) {
            Err(e) => {
                eprintln!("Cannot parse packaging manifest {:?}: {}", manifest_path, e);
                Err(1)
            },
            Ok(v) => {
                Ok((v, base))
            },
        }
    }

    fn op_check(
        &self,
        m: &clap::ArgMatches,
        m_op: &clap::ArgMatches,
    ) -> Result<(), u8> {
        let (manifest, base) = self.manifest(m)?;
        let platform = m_op.get_one::<String>("platform").map(String::as_str);
        let format = m_op.get_one::<String>("format").expect("Format-flag lacks a value");

        let summary = match osiris_packaging::op::check::check(&manifest, platform, &base) {
            Err(e) => {
                eprintln!("Cannot check packaging configuration: {}", e);
                return Err(1);
            },
            Ok(v) => v,
        };

        if format == "json" {
            return print_json(&summary);
        }

        println!("platform: {}", summary.platform);
        for (key, value) in [
            ("application-id", &summary.application_id),
            ("namespace", &summary.namespace),
            ("version-name", &summary.version_name),
        ] {
            if let Some(v) = value {
                println!("{}: {}", key, v);
            }
        }
        for (key, value) in [
            ("compile-sdk", summary.compile_sdk),
            ("min-sdk", summary.min_sdk),
            ("target-sdk", summary.target_sdk),
            ("version-code", summary.version_code),
        ] {
            if let Some(v) = value {
                println!("{}: {}", key, v);
            }
        }

        println!("rules:");
        for rule in summary.rules.iter() {
            if rule.prefer.is_empty() {
                println!("  {:<10}  {}", rule.verdict.as_str(), rule.pattern);
            } else {
                println!(
                    "  {:<10}  {} (prefer: {})",
                    rule.verdict.as_str(),
                    rule.pattern,
                    rule.prefer.join(", "),
                );
            }
        }

        if !summary.no_compress.is_empty() {
            println!("no-compress: {}", summary.no_compress.join(", "));
        }

        println!("sources:");
        for source in summary.sources.iter() {
            println!("  {}  {}", source.id, source.path);
        }

        Ok(())
    }

    fn op_resolve(
        &self,
        m: &clap::ArgMatches,
        m_op: &clap::ArgMatches,
    ) -> Result<(), u8> {
        let (manifest, base) = self.manifest(m)?;
        let platform = m_op.get_one::<String>("platform").map(String::as_str);
        let format = m_op.get_one::<String>("format").expect("Format-flag lacks a value");
        let sources: Vec<osiris_packaging::packaging::collect::Source> = m_op
            .get_many::<osiris_packaging::packaging::collect::Source>("source")
            .map(|v| v.cloned().collect())
            .unwrap_or_default();
        let output = m_op.get_one::<std::ffi::OsString>("output").map(std::path::PathBuf::from);

        let options = osiris_packaging::op::resolve::Options {
            platform: platform,
            base: &base,
            sources: &sources,
            output: output.as_deref(),
        };

        let report = match osiris_packaging::op::resolve::resolve(&manifest, &options) {
            Err(osiris_packaging::op::resolve::Error::Conflict(e)) => {
                eprintln!("Cannot resolve packaging conflicts: {}", e);
                eprintln!(
                    "Add an 'excludes' or 'pick-firsts' entry for '{}' to the packaging table",
                    e.path,
                );
                return Err(1);
            },
            Err(e) => {
                eprintln!("Cannot resolve packaging conflicts: {}", e);
                return Err(1);
            },
            Ok(v) => v,
        };

        if format == "json" {
            return print_json(&report);
        }

        for entry in report.entries.iter() {
            println!("{:<10}  {}  <- {}", entry.decision, entry.path, entry.source);
        }
        for exclusion in report.excluded.iter() {
            println!("{:<10}  {}  ({})", "excluded", exclusion.path, exclusion.pattern);
        }
        println!(
            "{} candidates, {} entries, {} excluded",
            report.candidates,
            report.entries.len(),
            report.excluded.len(),
        );
        if let Some(v) = &report.staged {
            println!("staged into {}", v);
        }

        Ok(())
    }

    fn run(mut self) -> Result<(), u8> {
        let (m, r);

        r = self.cmd.try_get_matches_from_mut(
            std::env::args_os(),
        );

        match r {
            Ok(v) => m = v,
            Err(e) => {
                return match e.kind() {
                    clap::error::ErrorKind::DisplayHelp |
                    clap::error::ErrorKind::DisplayVersion => {
                        e.print().expect("Cannot write to STDERR");
                        Ok(())
                    },
                    _ => {
                        e.print().expect("Cannot write to STDERR");
                        Err(2)
                    }
                }
            }
        }

        self.init_tracing(&m);

        match m.subcommand() {
            Some(("check", m_op)) => self.op_check(&m, m_op),
            Some(("resolve", m_op)) => self.op_resolve(&m, m_op),
            _ => std::unreachable!(),
        }
    }
}

fn main() -> std::process::ExitCode {
    match Cli::new().run() {
        Ok(()) => 0.into(),
        Err(v) => v.into(),
    }
}
