//! Knowledge-base report.
//!
//! Prints fact coverage and the largest category buckets of a knowledge
//! base, and optionally the best-scoring songs for a survey profile.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tastekb::{
    FactStore, Profile, Relation, RuleSet, Scorer, TasteResult, WeightConfig, WeightVector,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

struct Config {
    kb_path: PathBuf,
    profile_path: Option<PathBuf>,
    top: usize,
    buckets: usize,
    lenient: bool,
}

fn usage() {
    println!("kb-report - knowledge base statistics and profile scoring");
    println!();
    println!("USAGE:");
    println!("    kb-report <KB_JSON> [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -p, --profile <FILE>      Survey answers to score songs against");
    println!("    -n, --top <N>             Songs to list for the profile [default: 10]");
    println!("    -b, --buckets <N>         Category buckets to list [default: 10]");
    println!("        --lenient             Skip malformed facts instead of failing");
    println!("    -h, --help                Print help information");
}

fn value_of<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    args.get(i + 1).map_or_else(
        || {
            eprintln!("error: {flag} requires a value");
            std::process::exit(1);
        },
        String::as_str,
    )
}

fn count_of(args: &[String], i: usize, flag: &str) -> usize {
    let raw = value_of(args, i, flag);
    raw.parse().unwrap_or_else(|_| {
        eprintln!("error: invalid count for {flag}: {raw}");
        std::process::exit(1);
    })
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut kb_path = None;
    let mut config = Config {
        kb_path: PathBuf::new(),
        profile_path: None,
        top: 10,
        buckets: 10,
        lenient: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--profile" | "-p" => {
                config.profile_path = Some(PathBuf::from(value_of(&args, i, "--profile")));
                i += 2;
            }
            "--top" | "-n" => {
                config.top = count_of(&args, i, "--top");
                i += 2;
            }
            "--buckets" | "-b" => {
                config.buckets = count_of(&args, i, "--buckets");
                i += 2;
            }
            "--lenient" => {
                config.lenient = true;
                i += 1;
            }
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("error: unknown option: {other}");
                std::process::exit(1);
            }
            path => {
                kb_path = Some(PathBuf::from(path));
                i += 1;
            }
        }
    }

    let Some(kb_path) = kb_path else {
        usage();
        std::process::exit(1);
    };
    config.kb_path = kb_path;
    config
}

fn load_store(config: &Config) -> TasteResult<FactStore> {
    if !config.lenient {
        return FactStore::open(&config.kb_path);
    }
    let json = std::fs::read_to_string(&config.kb_path)?;
    let (store, rejected) = FactStore::from_json_str_lenient(&json)?;
    if !rejected.is_empty() {
        info!(skipped = rejected.len(), "loaded with skipped facts");
    }
    Ok(store)
}

fn print_stats(store: &FactStore, buckets: usize) {
    let stats = store.stats();
    println!("songs: {}", stats.entities);
    println!();
    println!("{:<20} {:>8} {:>9} {:>9}", "relation", "facts", "coverage", "distinct");
    for row in &stats.relations {
        let distinct = row.distinct_values.map_or_else(|| "-".to_string(), |n| n.to_string());
        println!(
            "{:<20} {:>8} {:>8.1}% {:>9}",
            row.relation.name(),
            row.facts,
            row.coverage * 100.0,
            distinct
        );
    }

    for relation in [Relation::Tempo, Relation::Loudness, Relation::Duration] {
        if let Some(summary) = store.numeric_summary(relation) {
            println!(
                "{relation}: min {:.1}, max {:.1}, mean {:.1} over {} songs",
                summary.min, summary.max, summary.mean, summary.count
            );
        }
    }

    for relation in [Relation::Genre, Relation::Mood] {
        let top = store.top_values(relation, buckets);
        if top.is_empty() {
            continue;
        }
        println!();
        println!("top {relation}:");
        for (label, count) in top {
            println!("  {label:<24} {count}");
        }
    }
}

fn print_rankings(store: &FactStore, profile_path: &Path, top: usize) -> TasteResult<()> {
    let profile = Profile::from_survey_str(&std::fs::read_to_string(profile_path)?, store)?;
    let rules = RuleSet::from_profile(&profile);
    let weights = WeightVector::initial(&rules, &WeightConfig::default());
    let scorer = Scorer::new(store, &rules, &weights);

    println!();
    println!("top {top} songs for {} rules:", rules.len());
    for (rank, scored) in scorer.score_all(store.entities()).into_iter().take(top).enumerate() {
        let song = store.song(&scored.entity).cloned().unwrap_or_default();
        println!(
            "{:>3}. {:>6.3}  {}  [{}]",
            rank + 1,
            scorer.normalized_score(&scored.entity),
            song,
            scored.entity
        );
    }
    Ok(())
}

fn run(config: &Config) -> TasteResult<()> {
    let store = load_store(config)?;
    print_stats(&store, config.buckets);
    if let Some(profile_path) = &config.profile_path {
        print_rankings(&store, profile_path, config.top)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = parse_args();
    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "kb-report failed");
            ExitCode::FAILURE
        }
    }
}
