//! End-to-end pipeline orchestration.
//!
//! A run executes the requested stages in their fixed order (fetch, clean,
//! enrich, features) and stops at the first failure. When history is
//! enabled the run is recorded in [`Storage`] together with a checksum of
//! every file it produced.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clean::{Cleaner, FilterReport};
use crate::config::Config;
use crate::dataset::{list_csv_files, DataLayout};
use crate::enrich::Enricher;
use crate::error::{Error, Result};
use crate::features::{FeatureBuilder, FeatureReport};
use crate::fetch::{source_from_config, DatasetSource, FetchReport};
use crate::storage::Storage;
use crate::table::Table;

/// A pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Copy or download the raw dataset.
    Fetch,
    /// Filter to the season window.
    Clean,
    /// Add circuit, race and status metadata.
    Enrich,
    /// Build the feature tables.
    Features,
}

impl Stage {
    /// Every stage in order.
    pub const ALL: [Stage; 4] = [Self::Fetch, Self::Clean, Self::Enrich, Self::Features];

    /// Stage name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Clean => "clean",
            Self::Enrich => "enrich",
            Self::Features => "features",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock time spent in one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageTiming {
    /// The stage.
    pub stage: Stage,
    /// Elapsed milliseconds.
    pub duration_ms: u64,
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    /// History id, when history is enabled.
    pub run_id: Option<i64>,
    /// First season kept.
    pub start_year: i32,
    /// Last season kept.
    pub end_year: i32,
    /// Fetch outcome.
    pub fetch: Option<FetchReport>,
    /// One report per cleaned table.
    pub filters: Vec<FilterReport>,
    /// Files rewritten by enrichment.
    pub enriched: Vec<PathBuf>,
    /// One report per feature table.
    pub features: Vec<FeatureReport>,
    /// Time per executed stage.
    pub timings: Vec<StageTiming>,
}

impl PipelineReport {
    fn new(start_year: i32, end_year: i32) -> Self {
        Self {
            run_id: None,
            start_year,
            end_year,
            fetch: None,
            filters: Vec::new(),
            enriched: Vec::new(),
            features: Vec::new(),
            timings: Vec::new(),
        }
    }

    /// Sum of stage durations.
    #[must_use]
    pub fn total_duration_ms(&self) -> u64 {
        self.timings.iter().map(|t| t.duration_ms).sum()
    }

    /// Files written by the run as `(table, path, rows)`.
    ///
    /// # Errors
    ///
    /// Returns an error if an enriched file not covered by a filter report
    /// cannot be read to count its rows.
    pub fn outputs(&self) -> Result<Vec<(String, PathBuf, usize)>> {
        let mut outputs: Vec<(String, PathBuf, usize)> = self
            .filters
            .iter()
            .map(|f| (format!("{}_cleaned", f.table), f.output.clone(), f.kept))
            .collect();
        for path in &self.enriched {
            if outputs.iter().any(|(_, p, _)| p == path) {
                continue;
            }
            let table = Table::read(path)?;
            outputs.push((table.name().to_string(), path.clone(), table.len()));
        }
        outputs.extend(
            self.features
                .iter()
                .map(|f| (f.table.clone(), f.output.clone(), f.rows)),
        );
        Ok(outputs)
    }
}

/// The data preparation pipeline.
#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    layout: DataLayout,
    source: Option<Box<dyn DatasetSource>>,
}

impl Pipeline {
    /// Create a pipeline for `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let layout = DataLayout::from_config(&config);
        Self {
            config,
            layout,
            source: None,
        }
    }

    /// Use `source` instead of the configured dataset source.
    #[must_use]
    pub fn with_source(mut self, source: Box<dyn DatasetSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The data layout in use.
    #[must_use]
    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Place the raw dataset in the raw directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is misconfigured or finds no files.
    pub async fn fetch(&self) -> Result<FetchReport> {
        let dest = self.layout.raw_dir();
        match &self.source {
            Some(source) => source.fetch(dest).await,
            None => source_from_config(&self.config)?.fetch(dest).await,
        }
    }

    /// Filter the raw dataset to the configured season window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatasetNotFound`] if the raw directory holds no CSV
    /// files, or the first filter error.
    pub fn clean(&self) -> Result<Vec<FilterReport>> {
        let raw_dir = self.layout.raw_dir();
        let raw_files = list_csv_files(raw_dir)?;
        if raw_files.is_empty() {
            return Err(Error::DatasetNotFound {
                source_name: "raw directory",
                message: format!("{} contains no CSV files", raw_dir.display()),
            });
        }
        info!(files = raw_files.len(), dir = %raw_dir.display(), "raw files found");
        self.layout.ensure_processed_dir()?;

        let seasons = &self.config.seasons;
        let cleaner = Cleaner::new(self.layout.clone());

        let mut reports = vec![cleaner.filter_races_by_year(seasons.start_year, seasons.end_year)?];
        let race_ids = cleaner.race_ids()?;
        if race_ids.is_empty() {
            warn!(
                start_year = seasons.start_year,
                end_year = seasons.end_year,
                "no races in season window"
            );
        }
        reports.extend(cleaner.filter_race_tables(&race_ids)?);
        reports.extend(cleaner.filter_dimensions()?);
        Ok(reports)
    }

    /// Enrich the cleaned tables.
    ///
    /// # Errors
    ///
    /// Returns the first enrichment error.
    pub fn enrich(&self) -> Result<Vec<PathBuf>> {
        Enricher::new(self.layout.clone()).enrich_all()
    }

    /// Build every feature table.
    ///
    /// # Errors
    ///
    /// Returns the first feature error.
    pub fn features(&self) -> Result<Vec<FeatureReport>> {
        FeatureBuilder::new(self.layout.clone()).build_all()
    }

    /// Run `stages` in pipeline order, recording the run when history is
    /// enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stage`] wrapping the first stage failure, or an
    /// error if the history database cannot be written.
    pub async fn run(&self, stages: &[Stage]) -> Result<PipelineReport> {
        let seasons = &self.config.seasons;
        let mut report = PipelineReport::new(seasons.start_year, seasons.end_year);

        let history = if self.config.storage.history_enabled {
            Some(Storage::open(self.config.database_path())?)
        } else {
            None
        };
        let stage_list = ordered(stages)
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",");
        report.run_id = history
            .as_ref()
            .map(|storage| storage.begin_run(seasons.start_year, seasons.end_year, &stage_list))
            .transpose()?;

        let outcome = self.execute(stages, &mut report).await;

        if let (Some(storage), Some(run_id)) = (&history, report.run_id) {
            match &outcome {
                Ok(()) => complete_run(storage, run_id, &report)?,
                Err(err) => storage.finish_run(run_id, Some(&err.to_string()))?,
            }
        }

        outcome.map(|()| {
            info!(
                stages = %stage_list,
                total_ms = report.total_duration_ms(),
                "pipeline finished"
            );
            report
        })
    }

    async fn execute(&self, stages: &[Stage], report: &mut PipelineReport) -> Result<()> {
        for stage in ordered(stages) {
            info!(%stage, "stage started");
            let started = Instant::now();

            let result = match stage {
                Stage::Fetch => self.fetch().await.map(|r| report.fetch = Some(r)),
                Stage::Clean => self.clean().map(|r| report.filters = r),
                Stage::Enrich => self.enrich().map(|r| report.enriched = r),
                Stage::Features => self.features().map(|r| report.features = r),
            };
            result.map_err(|e| Error::in_stage(stage.as_str(), e))?;

            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            info!(%stage, duration_ms, "stage finished");
            report.timings.push(StageTiming { stage, duration_ms });
        }
        Ok(())
    }
}

/// Distinct stages in execution order.
fn ordered(stages: &[Stage]) -> Vec<Stage> {
    stages
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Record the outputs of a successful run and mark it succeeded. If an
/// output cannot be recorded the run is marked failed instead.
fn complete_run(storage: &Storage, run_id: i64, report: &PipelineReport) -> Result<()> {
    let recorded = report.outputs().and_then(|outputs| {
        for (table, path, rows) in outputs {
            storage.record_output(run_id, &table, &path, rows)?;
        }
        Ok(())
    });
    match recorded {
        Ok(()) => storage.finish_run(run_id, None),
        Err(err) => {
            storage.finish_run(run_id, Some(&format!("recording outputs failed: {err}")))?;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.data.root = root.join("data");
        config.storage.database_path = Some(root.join("history.db"));
        config
    }

    #[test]
    fn test_ordered_dedups_and_sorts() {
        assert_eq!(
            ordered(&[Stage::Features, Stage::Clean, Stage::Features]),
            vec![Stage::Clean, Stage::Features]
        );
        assert_eq!(ordered(&Stage::ALL), Stage::ALL.to_vec());
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(Stage::Enrich.to_string(), "enrich");
        assert_eq!(serde_json::to_string(&Stage::Fetch).unwrap(), "\"fetch\"");
    }

    #[test]
    fn test_clean_without_raw_files() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(test_config(dir.path()));
        let err = pipeline.clean().unwrap_err();
        assert!(matches!(err, Error::DatasetNotFound { .. }));
    }

    #[tokio::test]
    async fn test_failed_run_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let db = config.database_path();
        let pipeline = Pipeline::new(config);

        let err = pipeline.run(&[Stage::Clean]).await.unwrap_err();
        assert!(err.to_string().starts_with("clean stage failed"));

        let storage = Storage::open(db).unwrap();
        let runs = storage.recent_runs(5).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, crate::storage::RunStatus::Failed);
        assert_eq!(runs[0].stages, "clean");
        assert!(runs[0].error.as_deref().unwrap().contains("no dataset files"));
    }

    #[tokio::test]
    async fn test_run_without_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.storage.history_enabled = false;
        let pipeline = Pipeline::new(config);

        let report = pipeline.run(&[]).await.unwrap();
        assert!(report.run_id.is_none());
        assert!(report.timings.is_empty());
        assert!(!dir.path().join("history.db").exists());
    }

    const RAW_FILES: &[(&str, &str)] = &[
        (
            "races.csv",
            "raceId,year,round,circuitId,name,date,time,url\n\
             1000,2019,6,6,Monaco Grand Prix,2019-05-26,13:10:00,http://x\n\
             1030,2020,1,70,Austrian Grand Prix,2020-07-05,13:10:00,http://x\n\
             1052,2021,5,6,Monaco Grand Prix,2021-05-23,13:00:00,http://x\n",
        ),
        (
            "results.csv",
            "resultId,raceId,driverId,constructorId,number,grid,position,positionText,positionOrder,points,laps,time,statusId\n\
             1,1000,1,131,44,1,1,1,1,25,78,1:43:28.437,1\n\
             2,1030,1,131,44,5,1,1,1,25,71,1:30:55.739,1\n\
             3,1030,830,9,33,3,2,2,2,18,71,+2.700,1\n\
             4,1030,815,9,11,6,\\N,R,20,0,10,\\N,4\n\
             5,1052,830,9,33,1,1,1,1,25,78,1:38:56.820,1\n\
             6,1052,1,131,44,7,2,2,2,18,78,+8.968,1\n\
             7,1052,815,9,11,9,\\N,R,18,0,30,\\N,5\n",
        ),
        (
            "sprint_results.csv",
            "resultId,raceId,driverId,constructorId,number,grid,position,positionText,positionOrder,points,laps,time,statusId\n\
             1,1052,830,9,33,2,1,1,1,3,17,25:38.426,1\n",
        ),
        (
            "qualifying.csv",
            "qualifyId,raceId,driverId,constructorId,number,position,q1,q2,q3\n\
             1,1000,1,131,44,1,1:11.562,1:10.701,1:10.166\n\
             2,1030,830,9,33,3,1:04.000,1:03.500,1:03.200\n\
             3,1052,815,9,11,9,1:12.000,\\N,\\N\n",
        ),
        (
            "pit_stops.csv",
            "raceId,driverId,stop,lap,time,duration,milliseconds\n\
             1030,1,1,26,14:22:00,22.1,22100\n\
             1052,830,1,30,15:05:00,23.4,23400\n",
        ),
        (
            "lap_times.csv",
            "raceId,driverId,lap,position,time,milliseconds\n\
             1000,1,1,1,1:20.000,80000\n\
             1030,1,1,1,1:10.000,70000\n",
        ),
        (
            "constructor_results.csv",
            "constructorResultsId,raceId,constructorId,points,status\n\
             1,1000,131,25,\\N\n\
             2,1030,9,18,\\N\n",
        ),
        (
            "constructor_standings.csv",
            "constructorStandingsId,raceId,constructorId,points,position,positionText,wins\n\
             1,1000,131,25,1,1,1\n\
             2,1052,9,43,1,1,1\n",
        ),
        (
            "driver_standings.csv",
            "driverStandingsId,raceId,driverId,points,position,positionText,wins\n\
             1,1000,1,25,1,1,1\n\
             2,1052,830,43,1,1,1\n",
        ),
        (
            "circuits.csv",
            "circuitId,circuitRef,name,location,country,lat,lng,alt,url\n\
             6,monaco,Circuit de Monaco,Monte-Carlo,Monaco,43.7347,7.42056,7,http://x\n\
             14,monza,Autodromo Nazionale di Monza,Monza,Italy,45.6156,9.28111,162,http://x\n\
             70,red_bull_ring,Red Bull Ring,Spielberg,Austria,47.2197,14.7647,678,http://x\n",
        ),
        (
            "constructors.csv",
            "constructorId,constructorRef,name,nationality,url\n\
             6,ferrari,Ferrari,Italian,http://x\n\
             9,red_bull,Red Bull,Austrian,http://x\n\
             131,mercedes,Mercedes,German,http://x\n",
        ),
        (
            "drivers.csv",
            "driverId,driverRef,number,code,forename,surname,dob,nationality,url\n\
             1,hamilton,44,HAM,Lewis,Hamilton,1985-01-07,British,http://x\n\
             4,alonso,14,ALO,Fernando,Alonso,1981-07-29,Spanish,http://x\n\
             815,perez,11,PER,Sergio,Pérez,1990-01-26,Mexican,http://x\n\
             830,max_verstappen,33,VER,Max,Verstappen,1997-09-30,Dutch,http://x\n",
        ),
        (
            "seasons.csv",
            "year,url\n2019,http://x\n2020,http://x\n2021,http://x\n",
        ),
        (
            "status.csv",
            "statusId,status\n1,Finished\n4,Collision\n5,Engine\n11,+1 Lap\n",
        ),
    ];

    fn write_raw_dataset(dir: &std::path::Path) {
        std::fs::create_dir_all(dir).unwrap();
        for (name, content) in RAW_FILES {
            std::fs::write(dir.join(name), content).unwrap();
        }
    }

    fn full_pipeline(root: &std::path::Path) -> Pipeline {
        let source = root.join("download");
        write_raw_dataset(&source);
        let mut config = test_config(root);
        config.seasons.start_year = 2020;
        config.seasons.end_year = 2021;
        Pipeline::new(config).with_source(Box::new(crate::fetch::DirectorySource::new(source)))
    }

    #[test]
    fn test_raw_fixture_covers_known_files() {
        let mut names: Vec<&str> = RAW_FILES.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        assert_eq!(names, crate::dataset::known_files());
    }

    #[tokio::test]
    async fn test_full_run() {
        crate::logging::init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let pipeline = full_pipeline(dir.path());
        let layout = pipeline.layout().clone();

        let report = pipeline.run(&Stage::ALL).await.unwrap();
        assert_eq!(report.timings.len(), 4);
        assert_eq!(report.fetch.as_ref().unwrap().files.len(), 14);

        let kept: Vec<(&str, usize, usize)> = report
            .filters
            .iter()
            .map(|f| (f.table.as_str(), f.kept, f.total))
            .collect();
        assert!(kept.contains(&("races", 2, 3)));
        assert!(kept.contains(&("results", 6, 7)));
        assert!(kept.contains(&("circuits", 2, 3)));
        assert!(kept.contains(&("drivers", 3, 4)));
        assert!(kept.contains(&("constructors", 2, 3)));
        assert!(kept.contains(&("seasons", 2, 3)));
        assert!(kept.contains(&("status", 3, 4)));

        let races = Table::read(layout.cleaned("races")).unwrap();
        let distances: Vec<&str> = races
            .iter()
            .map(|row| row.get("race_distance_km").unwrap())
            .collect();
        assert_eq!(distances, ["307.146", "260.286"]);

        let constructors =
            Table::read(layout.processed(crate::features::output::CONSTRUCTORS_PERFORMANCE))
                .unwrap();
        let red_bull = constructors
            .iter()
            .find(|row| row.i64("constructorId") == Some(9))
            .unwrap();
        assert_eq!(red_bull.i64("total_dnf"), Some(2));
        assert_eq!(red_bull.i64("mechanical_dnf"), Some(1));
        assert_eq!(red_bull.i64("crash_dnf"), Some(1));
        assert_eq!(red_bull.f64("reliability_rate"), Some(0.5));

        let joined =
            Table::read(layout.processed(crate::features::output::RACES_DRIVERS_FEATURES)).unwrap();
        assert_eq!(joined.len(), 6);

        let storage = Storage::open(pipeline.config().database_path()).unwrap();
        let run = storage.get_run(report.run_id.unwrap()).unwrap().unwrap();
        assert_eq!(run.status, crate::storage::RunStatus::Succeeded);
        assert_eq!(run.stages, "fetch,clean,enrich,features");
        let outputs = storage.outputs_for(run.id).unwrap();
        assert_eq!(outputs.len(), report.outputs().unwrap().len());
        assert!(outputs.iter().any(|o| o.table == "races_drivers_features" && o.rows == 6));
    }

    #[tokio::test]
    async fn test_rerun_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = full_pipeline(dir.path());

        let first = pipeline.run(&Stage::ALL).await.unwrap();
        let second = pipeline.run(&Stage::ALL).await.unwrap();

        let storage = Storage::open(pipeline.config().database_path()).unwrap();
        let checksums = |run_id: i64| -> Vec<(String, String)> {
            storage
                .outputs_for(run_id)
                .unwrap()
                .into_iter()
                .map(|o| (o.table, o.checksum))
                .collect()
        };
        let first_sums = checksums(first.run_id.unwrap());
        assert!(!first_sums.is_empty());
        assert_eq!(first_sums, checksums(second.run_id.unwrap()));
    }

    #[tokio::test]
    async fn test_stage_run_after_clean() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = full_pipeline(dir.path());

        pipeline.run(&[Stage::Fetch, Stage::Clean]).await.unwrap();
        let enriched = pipeline.run(&[Stage::Enrich]).await.unwrap();
        assert_eq!(enriched.enriched.len(), 3);
        assert!(enriched.filters.is_empty());

        let report = pipeline.run(&[Stage::Features]).await.unwrap();
        assert_eq!(report.features.len(), 8);

        let storage = Storage::open(pipeline.config().database_path()).unwrap();
        let runs = storage.recent_runs(10).unwrap();
        let stages: Vec<&str> = runs.iter().map(|r| r.stages.as_str()).collect();
        assert_eq!(stages, ["features", "enrich", "fetch,clean"]);
    }

    #[test]
    fn test_report_outputs_skip_duplicate_enriched_files() {
        let dir = tempfile::tempdir().unwrap();
        let status = dir.path().join("status_cleaned.csv");
        std::fs::write(&status, "statusId,status\n1,Finished\n").unwrap();

        let mut report = PipelineReport::new(2020, 2025);
        report.filters.push(FilterReport {
            table: "status".to_string(),
            output: status.clone(),
            kept: 1,
            total: 10,
        });
        report.enriched.push(status);

        let outputs = report.outputs().unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].0, "status_cleaned");
    }

    #[test]
    fn test_unrecordable_output_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("history.db")).unwrap();
        let run_id = storage.begin_run(2020, 2025, "enrich").unwrap();

        let mut report = PipelineReport::new(2020, 2025);
        report.enriched.push(dir.path().join("circuits_cleaned.csv"));

        let err = complete_run(&storage, run_id, &report).unwrap_err();
        assert!(err.is_missing_input());

        let run = storage.get_run(run_id).unwrap().unwrap();
        assert_eq!(run.status, crate::storage::RunStatus::Failed);
        assert!(run.error.as_deref().unwrap().starts_with("recording outputs failed"));
        assert!(storage.outputs_for(run_id).unwrap().is_empty());
    }
}
