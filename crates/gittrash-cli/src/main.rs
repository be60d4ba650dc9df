use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use gittrash_core::{
	load_patterns, EventOutcome, ExtractionConfig, ExtractionEngine, ExtractionProgress,
	FailurePolicy, GitRepository, HashAlgorithm, MatchMode, ResolveMode, WalkOptions,
};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser, Debug)]
#[command(
	name = "gittrash",
	version,
	about = "Recover files deleted from git history and copy them to an output folder"
)]
struct Cli {
	/// Path to the git repository
	#[arg(short, long)]
	repository: PathBuf,
	/// File containing patterns to search for (default: .gitignore in the repository)
	#[arg(short, long)]
	file: Option<PathBuf>,
	/// Output folder for recovered files
	#[arg(short, long, default_value = "extracted")]
	output: PathBuf,
	/// Recover every deleted file, ignoring patterns
	#[arg(short, long)]
	all: bool,
	/// Print each recovered file as it is found
	#[arg(short, long)]
	verbose: bool,
	/// Hash used to detect identical content
	#[arg(long, value_enum, default_value_t = HashArg::Sha256)]
	hash: HashArg,
	/// How pre-deletion content is located
	#[arg(long, value_enum, default_value_t = ResolveArg::Auto)]
	resolve: ResolveArg,
	/// Which per-file failures stop the run
	#[arg(long, value_enum, default_value_t = PolicyArg::Tolerant)]
	failure_policy: PolicyArg,
	/// Also walk commits only reachable from reflogs
	#[arg(long)]
	reflog: bool,
	/// Treat renames as renames instead of delete plus add
	#[arg(long)]
	detect_renames: bool,
	/// Disable the progress bar
	#[arg(long)]
	no_progress: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum HashArg {
	Md5,
	Sha1,
	Sha256,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ResolveArg {
	/// Blob handle first, tree walk as fallback
	Auto,
	Direct,
	TreeWalk,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum PolicyArg {
	/// Log and skip files that cannot be recovered
	Tolerant,
	/// Abort when a recovered file cannot be written
	StrictWrites,
	/// Abort on any per-file failure
	Strict,
}

impl From<HashArg> for HashAlgorithm {
	fn from(arg: HashArg) -> Self {
		match arg {
			HashArg::Md5 => HashAlgorithm::Md5,
			HashArg::Sha1 => HashAlgorithm::Sha1,
			HashArg::Sha256 => HashAlgorithm::Sha256,
		}
	}
}

impl From<ResolveArg> for ResolveMode {
	fn from(arg: ResolveArg) -> Self {
		match arg {
			ResolveArg::Auto => ResolveMode::Auto,
			ResolveArg::Direct => ResolveMode::DirectOnly,
			ResolveArg::TreeWalk => ResolveMode::TreeWalkOnly,
		}
	}
}

impl From<PolicyArg> for FailurePolicy {
	fn from(arg: PolicyArg) -> Self {
		match arg {
			PolicyArg::Tolerant => FailurePolicy::Tolerant,
			PolicyArg::StrictWrites => FailurePolicy::StrictWrites,
			PolicyArg::Strict => FailurePolicy::Strict,
		}
	}
}

fn build_config(cli: &Cli) -> Result<ExtractionConfig> {
	// Patterns are irrelevant in --all mode, so a missing .gitignore is fine there
	let match_mode = if cli.all {
		MatchMode::All
	} else {
		MatchMode::Patterns(load_patterns(&cli.repository, cli.file.as_deref())?)
	};

	Ok(ExtractionConfig {
		output_dir: cli.output.clone(),
		match_mode,
		hash_algorithm: cli.hash.into(),
		resolve_mode: cli.resolve.into(),
		failure_policy: cli.failure_policy.into(),
		write_hash_manifest: true,
		walk: WalkOptions {
			include_reflog: cli.reflog,
			detect_renames: cli.detect_renames,
		},
	})
}

fn progress_bar(hidden: bool) -> Result<ProgressBar> {
	if hidden {
		return Ok(ProgressBar::hidden());
	}
	let bar = ProgressBar::new(0);
	bar.set_style(
		ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} commits {msg}")?
			.progress_chars("=> "),
	);
	Ok(bar)
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	// Initialize tracing
	let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
	tracing_subscriber::fmt()
		.with_max_level(level)
		.with_writer(std::io::stderr)
		.init();

	let config = build_config(&cli)?;
	let repo = GitRepository::open(&cli.repository)?;
	let bar = progress_bar(cli.no_progress)?;
	let verbose = cli.verbose;

	let mut engine = ExtractionEngine::new(&repo, config);
	engine.set_repository_path(&cli.repository);
	engine.set_progress_callback(|progress| match progress {
		ExtractionProgress::WalkStarted { total_commits } => {
			bar.set_length(*total_commits as u64);
		}
		ExtractionProgress::EventFinished(record) if verbose => match &record.outcome {
			EventOutcome::Written(_) => {
				bar.println(format!("{} {}", record.event.commit, record.event.path));
			}
			EventOutcome::Duplicate => {
				bar.println(format!(
					"{} {} (already recovered)",
					record.event.commit, record.event.path
				));
			}
			outcome if outcome.is_failure() => {
				bar.println(format!(
					"{} {} (not recovered)",
					record.event.commit, record.event.path
				));
			}
			_ => {}
		},
		ExtractionProgress::EventFinished(_) => {}
		ExtractionProgress::CommitFinished { commit, .. } => {
			bar.set_message(commit.short().to_string());
			bar.inc(1);
		}
	});

	let result = engine
		.run()
		.with_context(|| format!("Extraction from {} failed", cli.repository.display()))?;
	bar.finish_and_clear();

	let stats = &result.statistics;
	println!(
		"🔍 Walked {} commits, {} deletions, {} matching files found",
		stats.commits_walked,
		stats.deletion_events,
		stats.files_found()
	);

	print!("{}", result.summary.render());
	if let Some(path) = &result.manifest_path {
		println!("📄 Manifest: {}", path.display());
	}

	let failed = result
		.records
		.iter()
		.filter(|record| record.outcome.is_failure())
		.count();
	if failed > 0 {
		println!("⚠️  {} deleted files could not be recovered (see log output)", failed);
	}

	Ok(())
}
