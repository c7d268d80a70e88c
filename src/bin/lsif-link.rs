//! `lsif-link`: the full Linker + DocumentAssembler + Validator
//! pipeline (§6).

use anyhow::Result;
use structopt::StructOpt;

use lsif_link::cli::{check_distinct_paths, LinkArgs};
use lsif_link::driver::{Driver, DriverOptions};
use lsif_link::error::LinkError;
use lsif_link::validator::{Diagnostic, DiagnosticSink, LoggingSink, Severity};
use lsif_link::writer::Writer;

struct TrackingSink {
    inner: LoggingSink,
    had_errors: bool,
}

impl DiagnosticSink for TrackingSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Error {
            self.had_errors = true;
        }
        self.inner.report(diagnostic);
    }
}

fn main() {
    env_logger::init();
    match run() {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(-1),
        Err(err) => {
            eprintln!("lsif-link: {:#}", err);
            std::process::exit(-1);
        }
    }
}

/// Returns `Ok(true)` on a clean run, `Ok(false)` if the stream parsed
/// and wrote successfully but the validator reported an error.
fn run() -> Result<bool> {
    let args = LinkArgs::from_args();
    check_distinct_paths(args.r#in.as_deref(), args.out.as_deref())?;

    let project_root = args.resolve_project_root();
    let input = args.input()?;
    let output = args.output()?;

    let mut driver = Driver::new(DriverOptions {
        project_root,
        package_manifest_path: args.package.clone(),
    });
    let mut sink = TrackingSink {
        inner: LoggingSink,
        had_errors: false,
    };

    let writer = Writer::spawn(output);
    let run_result = driver.run(input, &mut sink, |element| {
        let line = serde_json::to_string(element)
            .map_err(|e| LinkError::Writer(format!("failed to serialize element {}: {}", element.id, e)))?;
        writer.write_line(line)
    });
    let close_result = writer.close();
    run_result?;
    close_result?;

    Ok(!sink.had_errors)
}
