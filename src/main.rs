use anyhow::Result;
use env_logger::{Env, Target};
use log::{error, info};

use attendload::attendance::loader::AttendanceLoader;
use attendload::config::Config;
use attendload::data;
use attendload::sqlite::{SqliteClassifier, SqliteConnector};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stdout)
        .init();

    if let Err(err) = run() {
        error!("{:#}", err);
        return Err(err);
    }

    Ok(())
}

fn run() -> Result<()> {
    let config = Config::from_env()?;

    let input_file = data::todays_input_file();
    info!("input file name: {}", input_file);

    let loader = AttendanceLoader::new(SqliteConnector::new(config), SqliteClassifier);
    let summary = data::ingest_file(&loader, &input_file)?;
    info!(
        "run complete: {} records stored, {} skipped",
        summary.committed(),
        summary.skipped()
    );

    Ok(())
}
