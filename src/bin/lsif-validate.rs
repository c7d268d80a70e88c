//! `lsif-validate`: Validator only, no linking or output dump (§6).

use std::path::PathBuf;

use anyhow::Result;
use structopt::StructOpt;

use lsif_link::cli::ValidateArgs;
use lsif_link::driver::{Driver, DriverOptions};
use lsif_link::validator::{CollectingSink, Severity};

fn main() {
    env_logger::init();
    match run() {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(-1),
        Err(err) => {
            eprintln!("lsif-validate: {:#}", err);
            std::process::exit(-1);
        }
    }
}

fn run() -> Result<bool> {
    let args = ValidateArgs::from_args();
    let input = args.input()?;

    let mut driver = Driver::new(DriverOptions {
        project_root: std::env::current_dir()?,
        package_manifest_path: PathBuf::from("package.json"),
    });
    let mut sink = CollectingSink::default();
    driver.run(input, &mut sink, |_| Ok(()))?;

    for diagnostic in &sink.diagnostics {
        match diagnostic.severity {
            Severity::Error => log::error!("{} (element {})", diagnostic.message, diagnostic.element_id),
            Severity::Warn => log::warn!("{} (element {})", diagnostic.message, diagnostic.element_id),
            Severity::Info => log::info!("{} (element {})", diagnostic.message, diagnostic.element_id),
        }
    }

    Ok(!sink.has_errors())
}
