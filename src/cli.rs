//! CLI argument definitions for the `lsif-link` and `lsif-validate`
//! binaries (§6), plus the post-parse path validation the teacher's own
//! `Args::canonicalize_paths` performed.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Component, Path, PathBuf};

use structopt::StructOpt;

use crate::error::LinkError;

#[derive(Clone, Debug, StructOpt)]
#[structopt(name = "lsif-link", about = "Link monikers, shard documents, and validate an LSIF dump")]
pub struct LinkArgs {
    /// Path to the package manifest used to resolve export/import monikers.
    #[structopt(long, parse(from_os_str), default_value = "./package.json")]
    pub package: PathBuf,

    /// Root of the project being indexed; defaults to the manifest's directory.
    #[structopt(long = "projectRoot", parse(from_os_str))]
    pub project_root: Option<PathBuf>,

    /// Read the dump from this file instead of stdin.
    #[structopt(long, parse(from_os_str))]
    pub r#in: Option<PathBuf>,

    /// Read the dump from stdin.
    #[structopt(long)]
    pub stdin: bool,

    /// Write the linked dump to this file instead of stdout.
    #[structopt(long, parse(from_os_str))]
    pub out: Option<PathBuf>,

    /// Write the linked dump to stdout.
    #[structopt(long)]
    pub stdout: bool,
}

impl LinkArgs {
    pub fn resolve_project_root(&self) -> PathBuf {
        self.project_root.clone().unwrap_or_else(|| {
            self.package
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }

    pub fn input(&self) -> anyhow::Result<Box<dyn BufRead>> {
        resolve_input(self.r#in.as_deref(), self.stdin)
    }

    pub fn output(&self) -> anyhow::Result<Box<dyn Write + Send>> {
        resolve_output(self.out.as_deref(), self.stdout)
    }
}

#[derive(Clone, Debug, StructOpt)]
#[structopt(name = "lsif-validate", about = "Validate an LSIF dump's wire schema and stream invariants")]
pub struct ValidateArgs {
    /// Read the dump from this file instead of stdin.
    #[structopt(long, parse(from_os_str))]
    pub r#in: Option<PathBuf>,

    /// Read the dump from stdin.
    #[structopt(long)]
    pub stdin: bool,
}

impl ValidateArgs {
    pub fn input(&self) -> anyhow::Result<Box<dyn BufRead>> {
        resolve_input(self.r#in.as_deref(), self.stdin)
    }
}

fn resolve_input(path: Option<&Path>, stdin: bool) -> anyhow::Result<Box<dyn BufRead>> {
    match (path, stdin) {
        (Some(_), true) => Err(LinkError::config("`--in` and `--stdin` are mutually exclusive").into()),
        (Some(path), false) => Ok(Box::new(BufReader::new(File::open(path).map_err(|e| {
            LinkError::config(format!("cannot open input `{}`: {}", path.display(), e))
        })?))),
        (None, true) => Ok(Box::new(BufReader::new(io::stdin()))),
        (None, false) => Err(LinkError::config("one of `--in <file>` or `--stdin` is required").into()),
    }
}

fn resolve_output(path: Option<&Path>, stdout: bool) -> anyhow::Result<Box<dyn Write + Send>> {
    match (path, stdout) {
        (Some(_), true) => Err(LinkError::config("`--out` and `--stdout` are mutually exclusive").into()),
        (Some(path), false) => Ok(Box::new(File::create(path).map_err(|e| {
            LinkError::config(format!("cannot create output `{}`: {}", path.display(), e))
        })?)),
        (None, true) => Ok(Box::new(io::stdout())),
        (None, false) => Err(LinkError::config("one of `--out <file>` or `--stdout` is required").into()),
    }
}

/// Fails with a `ConfigError` if `--in` and `--out` resolve to the same
/// absolute path (§6).
pub fn check_distinct_paths(input: Option<&Path>, output: Option<&Path>) -> anyhow::Result<()> {
    if let (Some(input), Some(output)) = (input, output) {
        let cwd = std::env::current_dir()?;
        let input_abs = normalize_path(&cwd.join(input));
        let output_abs = normalize_path(&cwd.join(output));
        if input_abs == output_abs {
            return Err(LinkError::config(format!(
                "`--in` and `--out` both resolve to {}",
                input_abs.display()
            ))
            .into());
        }
    }
    Ok(())
}

/// Same as `std::path::Path::canonicalize`, but does not require that the given path exists.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = path.components().peekable();
    let mut ret = if let Some(c @ Component::Prefix(..)) = components.peek().cloned() {
        components.next();
        PathBuf::from(c.as_os_str())
    } else {
        PathBuf::new()
    };

    for component in components {
        match component {
            Component::Prefix(..) => unreachable!(),
            Component::RootDir => {
                ret.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                ret.pop();
            }
            Component::Normal(c) => {
                ret.push(c);
            }
        }
    }
    ret
}
