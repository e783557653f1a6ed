#[macro_use]
extern crate log;

use bughunter::breakpad;
use bughunter::report::CrashReport;
use bughunter::signature::{dedup_signatures, RuleSet};

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgGroup, Command};
use rayon::prelude::*;
use simplelog::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Read crash reports from input files.
///
/// # Arguments
///
/// * `paths` - input files
///
/// * `is_log` - inputs are test logs with embedded reports
///
/// # Return value
///
/// Report texts paired with the file they came from
fn read_reports(paths: &[PathBuf], is_log: bool) -> Result<Vec<(PathBuf, String)>> {
    let mut reports = Vec::new();
    for path in paths {
        let content = fs::read(path)
            .with_context(|| format!("Couldn't read input file: {}", path.display()))?;
        let text = String::from_utf8_lossy(&content);
        if is_log {
            let found = breakpad::extract_reports(&text);
            if found.is_empty() {
                warn!("No crash reports in log: {}", path.display());
            }
            reports.extend(found.into_iter().map(|report| (path.clone(), report)));
        } else {
            reports.push((path.clone(), text.into_owned()));
        }
    }
    Ok(reports)
}

fn main() -> Result<()> {
    let matches = Command::new("bughunter-sig")
        .version("0.3.0")
        .about("Compute Socorro-style crash signatures for minidump_stackwalk reports")
        .term_width(90)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .short('l')
                .takes_value(true)
                .default_value("info")
                .possible_values(["info", "debug"])
                .help("Logging level"),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .takes_value(true)
                .multiple_values(true)
                .required(true)
                .value_name("FILE")
                .help("Crash report files (or test logs with --log)"),
        )
        .arg(
            Arg::new("log")
                .long("log")
                .help("Inputs are test logs, extract every embedded crash report"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .value_name("FILE")
                .help("Path to save parsed reports in JSON format"),
        )
        .arg(
            Arg::new("stdout")
                .long("stdout")
                .help("Print parsed reports to stdout"),
        )
        .group(
            ArgGroup::new("out")
                .args(&["stdout", "output"])
                .required(true),
        )
        .arg(
            Arg::new("rules")
                .long("rules")
                .takes_value(true)
                .value_name("FILE")
                .help("File with IRRELEVANT, PREFIX and SENTINELS sections extending the default signature rules"),
        )
        .arg(
            Arg::new("dedup")
                .long("dedup")
                .help("Keep only the first report for each crash signature"),
        )
        .arg(
            Arg::new("jobs")
                .short('j')
                .long("jobs")
                .takes_value(true)
                .value_name("N")
                .help("Number of parallel jobs (default: half of the CPUs)"),
        )
        .get_matches();

    // Init log.
    let log_level = if matches.value_of("log-level") == Some("debug") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = TermLogger::init(
        log_level,
        ConfigBuilder::new().set_time_to_local(true).build(),
        TerminalMode::Stderr,
    );

    let jobs = if let Some(jobs) = matches.value_of("jobs") {
        let Ok(jobs) = jobs.parse::<usize>() else {
            bail!("Invalid number of jobs: {jobs}");
        };
        jobs.max(1)
    } else {
        (num_cpus::get() / 2).max(1)
    };

    let custom_rules;
    let rules = if let Some(path) = matches.value_of("rules") {
        custom_rules = RuleSet::from_file(Path::new(path))
            .with_context(|| format!("Couldn't load signature rules: {path}"))?;
        &custom_rules
    } else {
        RuleSet::default_rules()
    };

    let paths: Vec<PathBuf> = matches
        .values_of("input")
        .map(|values| values.map(PathBuf::from).collect())
        .unwrap_or_default();
    let texts = read_reports(&paths, matches.is_present("log"))?;
    info!("Processing {} crash reports with {jobs} jobs...", texts.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .context("Couldn't create thread pool")?;
    let mut reports: Vec<CrashReport> = pool.install(|| {
        texts
            .par_iter()
            .map(|(path, text)| {
                let report = CrashReport::from_breakpad_with_rules(text, rules);
                let errors = report
                    .messages
                    .iter()
                    .filter(|msg| msg.starts_with("error state"))
                    .count();
                if errors > 0 {
                    debug!("{}: {errors} unexpected lines", path.display());
                }
                info!("{}: {}", path.display(), report.signature());
                report
            })
            .collect()
    });

    if matches.is_present("dedup") {
        let signatures: Vec<String> = reports
            .iter()
            .map(|report| report.signature().to_string())
            .collect();
        let mut keep = dedup_signatures(&signatures).into_iter();
        let before = reports.len();
        reports.retain(|_| keep.next().unwrap_or(true));
        info!("Unique crash signatures: {}/{before}", reports.len());
    }

    let repstr = serde_json::to_string_pretty(&reports)?;
    if matches.is_present("stdout") {
        println!("{repstr}\n");
    }
    if let Some(output) = matches.value_of("output") {
        fs::write(output, repstr)
            .with_context(|| format!("Couldn't write report file: {output}"))?;
        info!("Reports saved to {output}");
    }

    Ok(())
}
