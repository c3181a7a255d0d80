//! End-to-end runs over temp directories: batching, fault isolation, skip/force/append.

use anyhow::{Result, bail};
use batchqc::engine::{StepParams, StepRegistry};
use batchqc::error::RunError;
use batchqc::utils::PipelineConfig;
use batchqc::{ItemState, OverwritePolicy, RunConfig, RunMetadata, RunSummary, process_items};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    data: PathBuf,
    out: PathBuf,
}

fn fixture(names: &[&str]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    let out = dir.path().join("out");
    std::fs::create_dir_all(&data).unwrap();
    for name in names {
        std::fs::write(data.join(name), format!("content of {name}")).unwrap();
    }
    Fixture {
        _dir: dir,
        data,
        out,
    }
}

fn items(f: &Fixture, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|n| f.data.join(n).canonicalize().unwrap())
        .collect()
}

fn config(steps: &[&str]) -> PipelineConfig {
    PipelineConfig::from_parts(steps.iter().map(|s| s.to_string()).collect(), BTreeMap::new())
}

fn run_config(out: &Path, steps: &[&str]) -> RunConfig {
    let meta = RunMetadata::new(
        steps.iter().map(|s| s.to_string()).collect(),
        out,
        None,
        "batchqc test".to_string(),
    );
    RunConfig::new(out, meta)
}

fn mark(state: &mut ItemState, _: &StepParams) -> Result<()> {
    state.set_output("marked", "yes");
    Ok(())
}

/// Registry with the built-in loader plus test steps. `counter` counts `Test.count` calls.
fn registry(counter: Arc<AtomicUsize>) -> StepRegistry {
    let mut registry = StepRegistry::with_builtins();
    registry
        .register_step("Test.mark", mark)
        .register_step(
            "Test.count",
            move |state: &mut ItemState, _: &StepParams| -> Result<()> {
                counter.fetch_add(1, Ordering::SeqCst);
                state.set_output("counted", "1");
                Ok(())
            },
        )
        .register_step(
            "Test.failOnA",
            |state: &mut ItemState, _: &StepParams| -> Result<()> {
                if state.file_name() == "A" {
                    bail!("cannot analyze A");
                }
                Ok(())
            },
        )
        .register_step(
            "Test.panicOnA",
            |state: &mut ItemState, _: &StepParams| -> Result<()> {
                if state.file_name() == "A" {
                    panic!("step panicked on A");
                }
                Ok(())
            },
        )
        .register_step(
            "Test.extraOnB",
            |state: &mut ItemState, _: &StepParams| -> Result<()> {
                if state.file_name() == "B" {
                    state.set_output("extra", "b-only");
                }
                Ok(())
            },
        )
        .register_step(
            "Test.writeMask",
            |state: &mut ItemState, _: &StepParams| -> Result<()> {
                std::fs::write(
                    state.outdir.join("mask.png"),
                    state.path.display().to_string(),
                )?;
                Ok(())
            },
        )
        .register_step(
            "Test.staggered",
            |state: &mut ItemState, _: &StepParams| -> Result<()> {
                // s1 finishes last, s5 first
                let rank: u64 = state
                    .file_name()
                    .trim_start_matches('s')
                    .trim_end_matches(".svs")
                    .parse()?;
                std::thread::sleep(Duration::from_millis((6 - rank) * 40));
                state.set_output("rank", rank);
                Ok(())
            },
        )
        .register_step(
            "Test.sleep",
            |_: &mut ItemState, _: &StepParams| -> Result<()> {
                std::thread::sleep(Duration::from_millis(1500));
                Ok(())
            },
        );
    registry
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn data_rows(lines: &[String]) -> Vec<&String> {
    lines.iter().filter(|l| !l.starts_with('#')).collect()
}

fn run(
    f: &Fixture,
    names: &[&str],
    steps: &[&str],
    tweak: impl FnOnce(&mut RunConfig),
    counter: Arc<AtomicUsize>,
) -> Result<RunSummary> {
    let mut rc = run_config(&f.out, steps);
    tweak(&mut rc);
    process_items(&items(f, names), &config(steps), &registry(counter), &rc)
}

#[test]
fn three_items_batch_two_gives_two_report_files() {
    let f = fixture(&["s1.svs", "s2.svs", "s3.svs"]);
    let steps = ["Test.mark"];
    let summary = run(
        &f,
        &["s1.svs", "s2.svs", "s3.svs"],
        &steps,
        |rc| rc.batch_size = NonZeroUsize::new(2),
        Arc::default(),
    )
    .unwrap();

    assert_eq!(summary.reported, 3);
    assert_eq!(
        summary.report_files,
        vec![f.out.join("results_1.tsv"), f.out.join("results_2.tsv")]
    );

    let first = read_lines(&f.out.join("results_1.tsv"));
    let second = read_lines(&f.out.join("results_2.tsv"));
    for (lines, rows) in [(&first, 2), (&second, 1)] {
        assert_eq!(data_rows(lines).len(), rows);
        assert_eq!(
            lines.iter().filter(|l| l.starts_with("#dataset:")).count(),
            1
        );
        assert!(lines[0].starts_with("#pipeline: Test.mark"));
    }
}

#[test]
fn batch_files_do_not_depend_on_completion_order() {
    let names = ["s1.svs", "s2.svs", "s3.svs", "s4.svs", "s5.svs"];
    let f = fixture(&names);
    let steps = ["Test.staggered"];
    let summary = run(
        &f,
        &names,
        &steps,
        |rc| {
            rc.batch_size = NonZeroUsize::new(2);
            rc.workers = 3;
        },
        Arc::default(),
    )
    .unwrap();

    assert_eq!(summary.reported, 5);
    assert_eq!(summary.report_files.len(), 3);
    let mut all_rows = Vec::new();
    for (file, rows) in [("results_1.tsv", 2), ("results_2.tsv", 2), ("results_3.tsv", 1)] {
        let lines = read_lines(&f.out.join(file));
        assert_eq!(data_rows(&lines).len(), rows, "{file}");
        assert_eq!(
            lines.iter().filter(|l| l.starts_with("#dataset:")).count(),
            1,
            "{file}"
        );
        all_rows.extend(data_rows(&lines).into_iter().cloned());
    }
    all_rows.sort();
    assert_eq!(all_rows.len(), 5);
    assert!(all_rows[0].starts_with("s1.svs\t"));
}

#[test]
fn rows_have_one_column_per_field_plus_warnings() {
    let f = fixture(&["a.svs", "b.svs"]);
    let steps = ["BasicModule.getBasicStats", "Test.mark"];
    run(&f, &["a.svs", "b.svs"], &steps, |_| {}, Arc::default()).unwrap();

    let lines = read_lines(&f.out.join("results.tsv"));
    let header = lines
        .iter()
        .find(|l| l.starts_with("#dataset:"))
        .unwrap()
        .trim_start_matches("#dataset:");
    let columns: Vec<&str> = header.split('\t').collect();
    assert_eq!(
        columns,
        vec![
            "filename",
            "outdir",
            "file_size",
            "extension",
            "mtime",
            "marked",
            "warnings"
        ]
    );
    let rows = data_rows(&lines);
    assert_eq!(rows.len(), 2);
    for row in rows {
        assert_eq!(row.split('\t').count(), columns.len());
    }
}

#[test]
fn failing_step_only_drops_that_item() {
    let f = fixture(&["A", "B"]);
    let steps = ["Test.mark", "Test.failOnA", "Test.count"];
    let counter = Arc::new(AtomicUsize::new(0));
    let summary = run(
        &f,
        &["A", "B"],
        &steps,
        |rc| rc.workers = 2,
        counter.clone(),
    )
    .unwrap();

    assert_eq!(summary.reported, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].path.file_name().unwrap(), "A");
    assert_eq!(summary.failures[0].step, "Test.failOnA");
    assert!(summary.failures[0].description.contains("cannot analyze A"));
    // step 3 never ran for A
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let rows_owned = read_lines(&f.out.join("results.tsv"));
    let rows = data_rows(&rows_owned);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].starts_with("B\t"));
}

#[test]
fn panicking_step_is_isolated() {
    let f = fixture(&["A", "B"]);
    let steps = ["Test.panicOnA", "Test.mark"];
    let summary = run(&f, &["A", "B"], &steps, |_| {}, Arc::default()).unwrap();
    assert_eq!(summary.reported, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].step, "Test.panicOnA");
    assert!(summary.failures[0].description.contains("step panicked on A"));
}

#[test]
fn loader_failure_names_the_loader() {
    let f = fixture(&["ok.svs"]);
    let steps = ["Test.mark"];
    let mut rc = run_config(&f.out, &steps);
    rc.workers = 1;
    let mut paths = items(&f, &["ok.svs"]);
    paths.push(f.data.join("missing.svs"));
    let summary =
        process_items(&paths, &config(&steps), &registry(Arc::default()), &rc).unwrap();
    assert_eq!(summary.reported, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].step, "BaseImage.BaseImage");
}

#[test]
fn mismatched_output_fields_are_rejected() {
    let f = fixture(&["A", "B"]);
    let steps = ["Test.mark", "Test.extraOnB"];
    let summary = run(&f, &["A", "B"], &steps, |_| {}, Arc::default()).unwrap();
    assert_eq!(summary.reported, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].path.file_name().unwrap(), "B");
    assert_eq!(summary.failures[0].step, "report");
}

#[test]
fn skip_never_reruns_and_force_always_recomputes() {
    let f = fixture(&["a.svs", "b.svs"]);
    let steps = ["Test.count"];
    let names = ["a.svs", "b.svs"];
    let counter = Arc::new(AtomicUsize::new(0));

    run(&f, &names, &steps, |_| {}, counter.clone()).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    let stale = f.out.join("a.svs").join("stale.txt");
    std::fs::write(&stale, "old").unwrap();

    let summary = run(&f, &names, &steps, |_| {}, counter.clone()).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.reported, 0);
    assert!(stale.exists());

    let summary = run(
        &f,
        &names,
        &steps,
        |rc| rc.policy = OverwritePolicy::Force,
        counter.clone(),
    )
    .unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 4);
    assert_eq!(summary.reported, 2);
    assert!(!stale.exists());
    assert!(f.out.join("a.svs").is_dir());
}

fn same_basename_fixture() -> (Fixture, Vec<PathBuf>) {
    let f = fixture(&[]);
    let mut paths = Vec::new();
    for sub in ["d1", "d2"] {
        let dir = f.data.join(sub);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("x.svs"), sub).unwrap();
        paths.push(dir.join("x.svs").canonicalize().unwrap());
    }
    (f, paths)
}

#[test]
fn same_basename_items_do_not_share_an_output_directory() {
    for policy in [OverwritePolicy::Skip, OverwritePolicy::Force] {
        let (f, paths) = same_basename_fixture();
        let steps = ["Test.writeMask"];
        let mut rc = run_config(&f.out, &steps);
        rc.policy = policy;
        rc.workers = 2;
        let summary =
            process_items(&paths, &config(&steps), &registry(Arc::default()), &rc).unwrap();

        assert_eq!(summary.reported, 1, "{policy}");
        assert_eq!(summary.skipped, 0, "{policy}");
        assert_eq!(summary.failures.len(), 1, "{policy}");
        let failure = &summary.failures[0];
        assert_eq!(failure.path, paths[1]);
        assert_eq!(failure.step, "output directory");
        assert!(failure.description.contains(&paths[0].display().to_string()));

        let mask = std::fs::read_to_string(f.out.join("x.svs").join("mask.png")).unwrap();
        assert_eq!(mask, paths[0].display().to_string(), "{policy}");
    }
}

#[test]
fn append_adds_rows_without_a_second_header() {
    let f = fixture(&["a.svs", "b.svs", "c.svs"]);
    let steps = ["Test.mark"];
    run(&f, &["a.svs", "b.svs"], &steps, |_| {}, Arc::default()).unwrap();
    assert!(batchqc::pipeline::previous_report_exists(&f.out));

    let summary = run(
        &f,
        &["a.svs", "b.svs", "c.svs"],
        &steps,
        |rc| rc.policy = OverwritePolicy::Append,
        Arc::default(),
    )
    .unwrap();
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.reported, 1);

    let lines = read_lines(&f.out.join("results.tsv"));
    assert_eq!(data_rows(&lines).len(), 3);
    assert_eq!(
        lines.iter().filter(|l| l.starts_with("#dataset:")).count(),
        1
    );
}

#[test]
fn duplicates_are_flagged_through_the_shared_map() {
    let f = fixture(&["one.bin", "two.bin", "other.bin"]);
    std::fs::write(f.data.join("two.bin"), "content of one.bin").unwrap();
    let steps = ["HashModule.blake3Digest", "DuplicateModule.flagDuplicates"];
    let summary = run(
        &f,
        &["one.bin", "two.bin", "other.bin"],
        &steps,
        |rc| rc.workers = 3,
        Arc::default(),
    )
    .unwrap();
    assert_eq!(summary.reported, 3);

    let lines = read_lines(&f.out.join("results.tsv"));
    let flagged = data_rows(&lines)
        .into_iter()
        .filter(|r| r.contains("duplicate content of"))
        .count();
    assert_eq!(flagged, 1);
}

#[test]
fn unknown_step_is_a_configuration_error() {
    let f = fixture(&["a.svs"]);
    let steps = ["Nope.missing"];
    let err = run(&f, &["a.svs"], &steps, |_| {}, Arc::default()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RunError>(),
        Some(RunError::Configuration(_))
    ));
    assert!(!f.out.exists());
}

#[test]
fn waiting_past_the_bound_aborts_the_run() {
    let f = fixture(&["slow.svs"]);
    let steps = ["Test.sleep"];
    let err = run(
        &f,
        &["slow.svs"],
        &steps,
        |rc| rc.task_timeout = Duration::from_millis(100),
        Arc::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RunError>(),
        Some(RunError::Timeout(..))
    ));
}

#[test]
fn fault_log_is_copied_into_outdir() {
    let f = fixture(&["a.svs"]);
    let log = f.data.join("error.log");
    std::fs::write(&log, "2026-01-01 - ERROR - something\n").unwrap();
    let steps = ["Test.mark"];
    run(
        &f,
        &["a.svs"],
        &steps,
        |rc| rc.fault_log = Some(log.clone()),
        Arc::default(),
    )
    .unwrap();
    assert_eq!(
        std::fs::read_to_string(f.out.join("error.log")).unwrap(),
        "2026-01-01 - ERROR - something\n"
    );
}

#[cfg(unix)]
#[test]
fn discovery_link_points_at_outdir() {
    let f = fixture(&["a.svs"]);
    let link_dir = f.data.join("links");
    let steps = ["Test.mark"];
    run(
        &f,
        &["a.svs"],
        &steps,
        |rc| rc.link_dir = Some(link_dir.clone()),
        Arc::default(),
    )
    .unwrap();
    let link = link_dir.join("out");
    assert_eq!(
        std::fs::read_link(&link).unwrap(),
        f.out.canonicalize().unwrap()
    );

    // A second run cannot create the same link; that is logged, not fatal.
    run(
        &f,
        &["a.svs"],
        &steps,
        |rc| rc.link_dir = Some(link_dir.clone()),
        Arc::default(),
    )
    .unwrap();
}
