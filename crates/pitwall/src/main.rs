//! `pitwall` - CLI for the Formula 1 data preparation pipeline
//!
//! This binary fetches the raw dataset, runs the cleaning, enrichment and
//! feature stages, and reports on past runs.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::Context;
use clap::Parser;

use pitwall::cli::{
    Cli, Command, ConfigCommand, FetchCommand, HistoryCommand, PreviewCommand, RunCommand,
    SeasonArgs,
};
use pitwall::config::SourceKind;
use pitwall::dataset::list_csv_files;
use pitwall::{init_logging, Config, Pipeline, PipelineReport, Stage, Storage, Table};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    let result = dispatch(cli).await;
    if let Some(hint) = result
        .as_ref()
        .err()
        .and_then(|e| e.downcast_ref::<pitwall::Error>())
        .and_then(pitwall::Error::hint)
    {
        eprintln!("hint: {hint}");
    }
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load_from(cli.config.clone()).context("loading configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.data.root.clone_from(dir);
    }

    match cli.command {
        Command::Fetch(cmd) => handle_fetch(config, cmd).await,
        Command::List(cmd) => handle_list(&config, cmd.processed),
        Command::Preview(cmd) => handle_preview(&config, &cmd),
        Command::Clean(cmd) => {
            apply_seasons(&mut config, &cmd.seasons)?;
            let report = Pipeline::new(config).run(&[Stage::Clean]).await?;
            print_filters(&report);
            Ok(())
        }
        Command::Enrich => {
            let report = Pipeline::new(config).run(&[Stage::Enrich]).await?;
            for path in &report.enriched {
                println!("enriched  {}", path.display());
            }
            Ok(())
        }
        Command::Features => {
            let report = Pipeline::new(config).run(&[Stage::Features]).await?;
            print_features(&report);
            Ok(())
        }
        Command::Run(cmd) => handle_run(config, &cmd).await,
        Command::History(cmd) => handle_history(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn apply_seasons(config: &mut Config, seasons: &SeasonArgs) -> anyhow::Result<()> {
    if let Some(year) = seasons.start_year {
        config.seasons.start_year = year;
    }
    if let Some(year) = seasons.end_year {
        config.seasons.end_year = year;
    }
    config.validate().context("invalid season window")?;
    Ok(())
}

async fn handle_fetch(mut config: Config, cmd: FetchCommand) -> anyhow::Result<()> {
    if let Some(source) = cmd.source {
        config.dataset.source = source.into();
    }
    if let Some(dir) = cmd.from {
        config.dataset.source = SourceKind::Directory;
        config.dataset.source_dir = Some(dir);
    }
    config.validate().context("invalid dataset source")?;

    let report = Pipeline::new(config).fetch().await?;
    println!(
        "Fetched {} files ({} bytes) from {} into {}",
        report.files.len(),
        report.bytes,
        report.source,
        report.destination.display()
    );
    for file in &report.files {
        println!("  {file}");
    }
    Ok(())
}

fn handle_list(config: &Config, processed: bool) -> anyhow::Result<()> {
    let dir = if processed {
        config.processed_dir()
    } else {
        config.raw_dir()
    };
    let files = list_csv_files(&dir)?;
    if files.is_empty() {
        println!("No CSV files in {}", dir.display());
        return Ok(());
    }

    println!("{} ({} files)", dir.display(), files.len());
    for path in files {
        if let Some(name) = path.file_name() {
            println!("  {}", name.to_string_lossy());
        }
    }
    Ok(())
}

fn handle_preview(config: &Config, cmd: &PreviewCommand) -> anyhow::Result<()> {
    let dir = if cmd.processed {
        config.processed_dir()
    } else {
        config.raw_dir()
    };
    let file = if std::path::Path::new(&cmd.file)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
    {
        cmd.file.clone()
    } else {
        format!("{}.csv", cmd.file)
    };
    let path = dir.join(&file);
    let table = Table::read(&path).with_context(|| format!("previewing {}", path.display()))?;
    let head = table.head(cmd.rows);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&head.to_json())?);
    } else {
        println!("{file}: {} rows, {} columns", table.len(), table.headers().len());
        println!();
        println!("{}", head.render());
    }
    Ok(())
}

async fn handle_run(mut config: Config, cmd: &RunCommand) -> anyhow::Result<()> {
    apply_seasons(&mut config, &cmd.seasons)?;

    let stages: Vec<Stage> = Stage::ALL
        .into_iter()
        .filter(|stage| !(cmd.skip_fetch && *stage == Stage::Fetch))
        .collect();
    let report = Pipeline::new(config).run(&stages).await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Pipeline finished for seasons {}-{}",
        report.start_year, report.end_year
    );
    if let Some(id) = report.run_id {
        println!("Run id: {id}");
    }
    if let Some(fetch) = &report.fetch {
        println!(
            "fetch     {} files from {}",
            fetch.files.len(),
            fetch.source
        );
    }
    print_filters(&report);
    for path in &report.enriched {
        println!("enriched  {}", path.display());
    }
    print_features(&report);
    println!();
    for timing in &report.timings {
        println!("{:<9} {} ms", timing.stage.as_str(), timing.duration_ms);
    }
    println!("{:<9} {} ms", "total", report.total_duration_ms());
    Ok(())
}

fn print_filters(report: &PipelineReport) {
    for filter in &report.filters {
        println!(
            "cleaned   {:<24} {:>7} of {:>7} rows",
            filter.table, filter.kept, filter.total
        );
    }
}

fn print_features(report: &PipelineReport) {
    for feature in &report.features {
        println!("feature   {:<36} {:>7} rows", feature.table, feature.rows);
    }
}

fn handle_history(config: &Config, cmd: &HistoryCommand) -> anyhow::Result<()> {
    let storage = Storage::open(config.database_path()).context("opening run history")?;
    let runs = storage.recent_runs(cmd.limit)?;

    if cmd.json {
        let entries = runs
            .iter()
            .map(|run| {
                Ok(serde_json::json!({
                    "run": run,
                    "outputs": storage.outputs_for(run.id)?,
                }))
            })
            .collect::<pitwall::Result<Vec<_>>>()?;
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("No runs recorded in {}", storage.path().display());
        return Ok(());
    }

    let stats = storage.stats()?;
    println!(
        "{} runs ({} succeeded, {} failed), {} outputs",
        stats.total_runs, stats.succeeded_runs, stats.failed_runs, stats.total_outputs
    );
    println!();
    for run in &runs {
        println!(
            "#{:<5} {}  {:<9} {}-{}  [{}]",
            run.id,
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.status.as_str(),
            run.start_year,
            run.end_year,
            run.stages
        );
        if let Some(error) = &run.error {
            println!("        error: {error}");
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Data]");
                println!("  Root:               {}", config.data.root.display());
                println!("  Raw directory:      {}", config.raw_dir().display());
                println!("  Processed dir:      {}", config.processed_dir().display());
                println!();
                println!("[Seasons]");
                println!("  Start year:         {}", config.seasons.start_year);
                println!("  End year:           {}", config.seasons.end_year);
                println!();
                println!("[Dataset]");
                println!("  Handle:             {}", config.dataset.handle);
                println!("  Source:             {}", config.dataset.source);
                println!("  Timeout (secs):     {}", config.dataset.timeout_secs);
                println!();
                println!("[Storage]");
                println!("  History:            {}", config.storage.history_enabled);
                println!("  Database path:      {}", config.database_path().display());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
