// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The opaque RPM boundary
//!
//! Everything that touches the host RPM stack goes through here: reading
//! package headers, querying the installed set, and executing install/erase
//! transactions. Header parsing is in-process; transactions drive the
//! system `rpm` executable with `--percent` output parsed into a typed
//! event stream, so callers never see the tool underneath.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::dependency::Capability;
use crate::evr::{Evr, Nevra};
use crate::package::Meta;

/// Read the header of an on-disk `.rpm` without signature checking
pub fn read_header(path: &Path) -> Result<Meta, Error> {
    let pkg = rpm::Package::open(path)?;
    let md = &pkg.metadata;

    let name = md.get_name()?.to_owned();
    let epoch = u64::from(md.get_epoch().unwrap_or_default());
    let version = md.get_version()?.to_owned();
    let release = md.get_release()?.to_owned();
    let arch = md.get_arch()?.to_owned();

    let mut meta = Meta::new(Nevra::new(name, Evr::new(epoch, version, release), arch));
    meta.size = md.get_installed_size().unwrap_or_default();
    meta.summary = md.get_summary().unwrap_or_default().to_owned();
    meta.provides = convert_deps(md.get_provides().unwrap_or_default());
    meta.requires = convert_deps(md.get_requires().unwrap_or_default());
    meta.recommends = convert_deps(md.get_recommends().unwrap_or_default());
    meta.suggests = convert_deps(md.get_suggests().unwrap_or_default());
    meta.conflicts = convert_deps(md.get_conflicts().unwrap_or_default());
    meta.obsoletes = convert_deps(md.get_obsoletes().unwrap_or_default());

    Ok(meta)
}

fn convert_deps(deps: Vec<rpm::Dependency>) -> Vec<Capability> {
    use rpm::DependencyFlags;

    deps.into_iter()
        .filter(|dep| !dep.name.starts_with("rpmlib("))
        .map(|dep| {
            if dep.version.is_empty() {
                return Capability::unversioned(dep.name);
            }
            let op = match (
                dep.flags.contains(DependencyFlags::LESS),
                dep.flags.contains(DependencyFlags::GREATER),
                dep.flags.contains(DependencyFlags::EQUAL),
            ) {
                (true, _, true) => crate::dependency::Op::LessEq,
                (true, _, false) => crate::dependency::Op::Less,
                (_, true, true) => crate::dependency::Op::GreaterEq,
                (_, true, false) => crate::dependency::Op::Greater,
                _ => crate::dependency::Op::Equal,
            };
            match Evr::parse(&dep.version) {
                Ok(evr) => Capability::versioned(dep.name, op, evr),
                Err(_) => Capability::unversioned(dep.name),
            }
        })
        .collect()
}

/// Record framing for the installed-set query format
const QUERY_FORMAT: &str = "=PKG=%{NAME}|%{EPOCHNUM}|%{VERSION}|%{RELEASE}|%{ARCH}|%{SIZE}\\n\
[=PRV=%{PROVIDENEVRS}\\n][=REQ=%{REQUIRENEVRS}\\n][=REC=%{RECOMMENDNEVRS}\\n]\
[=SUG=%{SUGGESTNEVRS}\\n][=CON=%{CONFLICTNEVRS}\\n][=OBS=%{OBSOLETENEVRS}\\n]";

/// Handle on the host RPM stack for one root
#[derive(Debug, Clone)]
pub struct Rpmdb {
    program: PathBuf,
    root: PathBuf,
}

impl Rpmdb {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from("rpm"),
            root: root.into(),
        }
    }

    /// Point at a different `rpm` executable, primarily for tests
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Query the full installed set with capabilities
    pub fn query_installed(&self) -> Result<Vec<Meta>, Error> {
        let output = Command::new(&self.program)
            .arg("--root")
            .arg(&self.root)
            .args(["-qa", "--queryformat", QUERY_FORMAT])
            .output()
            .map_err(Error::Spawn)?;
        if !output.status.success() {
            return Err(Error::Query(
                String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            ));
        }
        parse_installed(&output.stdout)
    }

    /// Check whether a package name is currently installed
    pub fn is_installed(&self, name: &str) -> Result<bool, Error> {
        let status = Command::new(&self.program)
            .arg("--root")
            .arg(&self.root)
            .args(["-q", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(Error::Spawn)?;
        Ok(status.success())
    }

    /// Dependency check: dry-run the install, stderr lines are the problems
    pub fn check_install(&self, paths: &[PathBuf], opts: &InstallFlags) -> Result<Vec<String>, Error> {
        let output = self
            .install_command(paths, opts, true)
            .output()
            .map_err(Error::Spawn)?;
        if output.status.success() {
            return Ok(Vec::new());
        }
        Ok(stderr_problems(&output.stderr))
    }

    /// Run the install transaction, streaming per-package events
    pub fn run_install(
        &self,
        paths: &[PathBuf],
        opts: &InstallFlags,
        on_event: &mut dyn FnMut(TransactionEvent),
    ) -> Result<Outcome, Error> {
        let mut child = self
            .install_command(paths, opts, opts.test)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(Error::Spawn)?;

        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let stderr_thread =
            std::thread::spawn(move || collect_stderr(BufReader::new(stderr)));

        parse_percent_stream(BufReader::new(stdout), on_event)?;

        let status = child.wait().map_err(Error::Spawn)?;
        let (problems, extraction_error) = stderr_thread.join().unwrap_or_default();
        if extraction_error {
            on_event(TransactionEvent::ExtractionError);
        }

        Ok(Outcome {
            problems: if status.success() { Vec::new() } else { nonempty(problems) },
            extraction_error,
        })
    }

    /// Erase installed packages by name
    pub fn run_erase(
        &self,
        names: &[String],
        opts: &EraseFlags,
        on_event: &mut dyn FnMut(TransactionEvent),
    ) -> Result<Outcome, Error> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--root").arg(&self.root).arg("-e");
        if opts.force {
            cmd.arg("--nodeps");
        }
        if opts.noscripts {
            cmd.arg("--noscripts");
        }
        if opts.test {
            cmd.arg("--test");
        }
        cmd.args(names);

        // rpm -e has no per-package progress stream; events are synthesised
        // around the single invocation
        for name in names {
            on_event(TransactionEvent::PackageStart(name.clone()));
        }

        let output = cmd.output().map_err(Error::Spawn)?;

        if output.status.success() {
            for name in names {
                on_event(TransactionEvent::PackageDone(name.clone()));
            }
            Ok(Outcome::default())
        } else {
            Ok(Outcome {
                problems: nonempty(stderr_problems(&output.stderr)),
                extraction_error: false,
            })
        }
    }

    fn install_command(&self, paths: &[PathBuf], opts: &InstallFlags, test: bool) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--root").arg(&self.root).arg("-U").arg("--percent");
        if !opts.verify_signatures {
            cmd.arg("--nosignature");
        }
        if opts.force {
            cmd.args(["--force", "--nodeps"]);
        }
        if opts.reinstall {
            cmd.arg("--replacepkgs");
        }
        if opts.noscripts {
            cmd.arg("--noscripts");
        }
        if test {
            cmd.arg("--test");
        }
        cmd.args(paths);
        cmd
    }
}

/// Flag set for install transactions
#[derive(Debug, Clone, Default)]
pub struct InstallFlags {
    pub verify_signatures: bool,
    pub force: bool,
    pub test: bool,
    pub reinstall: bool,
    pub noscripts: bool,
}

/// Flag set for erase transactions
#[derive(Debug, Clone, Default)]
pub struct EraseFlags {
    pub force: bool,
    pub test: bool,
    pub noscripts: bool,
}

/// Per-package callbacks surfaced while a transaction runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionEvent {
    PackageStart(String),
    PackageDone(String),
    /// cpio/unpack failure observed; suppresses optimistic early-release
    ExtractionError,
}

/// Terminal state of one transaction
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub problems: Vec<String>,
    pub extraction_error: bool,
}

/// `--percent` output: each package is announced on its own line, followed
/// by `%% <value>` progress lines up to 100.
fn parse_percent_stream(
    reader: impl BufRead,
    on_event: &mut dyn FnMut(TransactionEvent),
) -> Result<(), Error> {
    let mut current: Option<String> = None;

    for line in reader.lines() {
        let line = line.map_err(Error::Pipe)?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(value) = line.strip_prefix("%% ") {
            let done = value
                .parse::<f64>()
                .map(|pct| pct >= 100.0)
                .unwrap_or(false);
            if done {
                if let Some(name) = current.take() {
                    on_event(TransactionEvent::PackageDone(name));
                }
            }
        } else {
            // A new package line closes any still-open predecessor
            if let Some(name) = current.take() {
                on_event(TransactionEvent::PackageDone(name));
            }
            let name = package_name_of(line);
            current = Some(name.clone());
            on_event(TransactionEvent::PackageStart(name));
        }
    }
    if let Some(name) = current.take() {
        on_event(TransactionEvent::PackageDone(name));
    }
    Ok(())
}

/// `--percent` announces packages by nevra or payload path; reduce either
/// to the bare package name
fn package_name_of(line: &str) -> String {
    let base = line.rsplit('/').next().unwrap_or(line);
    let base = base.strip_suffix(".rpm").unwrap_or(base);
    match Nevra::parse(base) {
        Ok(nevra) => nevra.name,
        Err(_) => base.to_owned(),
    }
}

fn collect_stderr(reader: impl BufRead) -> (Vec<String>, bool) {
    let mut lines = Vec::new();
    let mut extraction_error = false;
    for line in reader.lines().map_while(Result::ok) {
        let lower = line.to_lowercase();
        if lower.contains("cpio") || lower.contains("unpack") {
            extraction_error = true;
        }
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    (lines, extraction_error)
}

fn stderr_problems(stderr: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn nonempty(problems: Vec<String>) -> Vec<String> {
    if problems.is_empty() {
        vec!["transaction failed".to_owned()]
    } else {
        problems
    }
}

fn parse_installed(stdout: &[u8]) -> Result<Vec<Meta>, Error> {
    let mut packages = Vec::new();
    let mut current: Option<Meta> = None;

    for line in String::from_utf8_lossy(stdout).lines() {
        if let Some(fields) = line.strip_prefix("=PKG=") {
            if let Some(meta) = current.take() {
                packages.push(meta);
            }
            let mut parts = fields.split('|');
            let (name, epoch, version, release, arch, size) = (
                parts.next().unwrap_or_default(),
                parts.next().unwrap_or("0"),
                parts.next().unwrap_or_default(),
                parts.next().unwrap_or_default(),
                parts.next().unwrap_or_default(),
                parts.next().unwrap_or("0"),
            );
            let epoch = epoch.parse().unwrap_or(0);
            let mut meta = Meta::new(Nevra::new(
                name,
                Evr::new(epoch, version, release),
                arch,
            ));
            meta.size = size.parse().unwrap_or(0);
            current = Some(meta);
        } else if let Some(meta) = current.as_mut() {
            let (list, cap) = match line.split_at_checked(5) {
                Some(("=PRV=", cap)) => (&mut meta.provides, cap),
                Some(("=REQ=", cap)) => (&mut meta.requires, cap),
                Some(("=REC=", cap)) => (&mut meta.recommends, cap),
                Some(("=SUG=", cap)) => (&mut meta.suggests, cap),
                Some(("=CON=", cap)) => (&mut meta.conflicts, cap),
                Some(("=OBS=", cap)) => (&mut meta.obsoletes, cap),
                _ => continue,
            };
            if cap.starts_with("rpmlib(") || cap.is_empty() {
                continue;
            }
            if let Ok(parsed) = cap.parse() {
                list.push(parsed);
            }
        }
    }
    if let Some(meta) = current.take() {
        packages.push(meta);
    }
    Ok(packages)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("rpm header: {0}")]
    Header(#[from] rpm::Error),
    #[error("spawning rpm: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("reading rpm output: {0}")]
    Pipe(#[source] std::io::Error),
    #[error("querying rpmdb: {0}")]
    Query(String),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn percent_stream_events() {
        let output = "\
wget-1.21-1.mga9.x86_64\n\
%% 0.000000\n\
%% 55.000000\n\
%% 100.000000\n\
curl-8.6.0-1.mga10.x86_64\n\
%% 100.000000\n";
        let mut events = Vec::new();
        parse_percent_stream(output.as_bytes(), &mut |e| events.push(e)).unwrap();
        assert_eq!(
            events,
            vec![
                TransactionEvent::PackageStart("wget".into()),
                TransactionEvent::PackageDone("wget".into()),
                TransactionEvent::PackageStart("curl".into()),
                TransactionEvent::PackageDone("curl".into()),
            ]
        );
    }

    #[test]
    fn percent_stream_closes_trailing_package() {
        // Output truncated before the final 100% line
        let output = "foo-1.0-1.noarch\n%% 10.0\n";
        let mut events = Vec::new();
        parse_percent_stream(output.as_bytes(), &mut |e| events.push(e)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], TransactionEvent::PackageDone("foo".into()));
    }

    #[test]
    fn package_name_reduction() {
        assert_eq!(package_name_of("wget-1.21-1.mga9.x86_64"), "wget");
        assert_eq!(
            package_name_of("/var/cache/urpm/medias/official/core/wget-1.21-1.mga9.x86_64.rpm"),
            "wget"
        );
        assert_eq!(package_name_of("not a nevra"), "not a nevra");
    }

    #[test]
    fn installed_set_parsing() {
        let out = "\
=PKG=bash|0|5.2.21|1.mga10|x86_64|7340032\n\
=PRV=bash = 5.2.21-1.mga10\n\
=PRV=/bin/sh\n\
=REQ=libc.so.6\n\
=REQ=rpmlib(CompressedFileNames) <= 3.0.4-1\n\
=PKG=filesystem|1|3.1|2.mga10|x86_64|1024\n\
=OBS=oldfs < 3.0\n";
        let metas = parse_installed(out.as_bytes()).unwrap();
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0].name(), "bash");
        assert_eq!(metas[0].size, 7340032);
        assert_eq!(metas[0].provides.len(), 2);
        assert_eq!(metas[0].requires.len(), 1, "rpmlib() deps are dropped");
        assert_eq!(metas[1].evr().epoch, 1);
        assert_eq!(metas[1].obsoletes[0].to_string(), "oldfs < 3.0");
    }
}
