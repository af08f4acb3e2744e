use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pshharvest::{
    count_lines, cut_datasets, extract_authors_info, extract_features_file, from_iso, index_author_dump, index_from_file,
    init_tracing_with_log_file, load_author_dump, match_authors, merge_files, now_epoch, obtain_authors,
    obtain_usernames, read_records, read_scale_queries, read_usernames, run_query_file, sample_authors_file,
    sort_file, sort_file_by_key, write_csv, write_records, write_usernames, ArchivePostSource, AuthorDirectory,
    AuthorRecord, Fetcher, HarvestOptions, IndexedAuthors, KeyExtractor, KeywordSets, MatchConfig,
    MemoryAuthorDirectory, PostSource, PushshiftClient, ReferenceConfig, SearchClient, SheetLayout,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "pshharvest", version, about = "Collect, sample and match Reddit posts and authors")]
struct Cli {
    /// Historical search API root (overrides PSH_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Search engine root (overrides PSH_SEARCH_URL)
    #[arg(long, global = true)]
    search_url: Option<String>,

    /// Directory for post backups (overrides PSH_BACKUPS_DIR)
    #[arg(long, global = true)]
    backups_dir: Option<PathBuf>,

    /// Directory for author lists and samples (overrides PSH_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Where harvest.log is appended
    #[arg(long, global = true, default_value = "./logs")]
    logs_dir: PathBuf,

    /// Answer API queries from a local JSONL dump instead of the network
    #[arg(long, global = true)]
    archive: Option<PathBuf>,

    /// Per-request HTTP timeout, seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Posts requested per API page (1..=1000)
    #[arg(long, global = true)]
    page_size: Option<usize>,

    /// Pause between API pages, milliseconds
    #[arg(long, global = true)]
    delay_ms: Option<u64>,

    #[arg(long, global = true, default_value_t = false)]
    no_progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct DirectoryArgs {
    /// Accounts dump (.csv, .csv.gz or .jsonl) used as the author directory
    #[arg(long, conflicts_with = "index")]
    dump: Option<PathBuf>,

    /// Search engine index of accounts used as the author directory
    #[arg(long)]
    index: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Download every submission of a subreddit older than --before
    Historic {
        subreddit: String,
        /// ISO-8601 upper bound (default: now)
        #[arg(long)]
        before: Option<String>,
    },
    /// Sample random posts shadowing the time distribution of a historic backup
    Reference {
        historic: PathBuf,
        #[arg(long, default_value_t = 1000)]
        block_size: usize,
        #[arg(long, default_value_t = 100)]
        posts_per_block: usize,
        /// ISO-8601 cutoff (default: now)
        #[arg(long)]
        cutoff: Option<String>,
        /// Tag sampled posts with random-baseline parameters
        #[arg(long, default_value_t = false)]
        params: bool,
        #[arg(long)]
        exclude_subreddit: Option<String>,
    },
    /// Run every query of a scale sheet (CSV export)
    Scales {
        sheet: PathBuf,
        #[arg(long, default_value_t = 1000)]
        max_posts: usize,
    },
    /// Distinct authors of a posts backup, one per line
    Usernames {
        posts: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Case and reference author lists from two backups
    Authors {
        subreddit_posts: PathBuf,
        reference_posts: PathBuf,
        #[arg(long, default_value_t = false)]
        exclude_bots: bool,
    },
    /// Look up account metadata for a usernames list
    AuthorsInfo {
        usernames: PathBuf,
        #[command(flatten)]
        directory: DirectoryArgs,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Systematic sample of an authors-info file
    Sample {
        authors_info: PathBuf,
        #[arg(long)]
        size: usize,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Find a control account for every sampled author
    Match {
        sample: PathBuf,
        #[command(flatten)]
        directory: DirectoryArgs,
        /// Usernames (one per line) that may not be controls; at least the case authors' list
        #[arg(long, required = true)]
        exclude: Vec<PathBuf>,
        #[arg(long, default_value_t = 30)]
        days: i64,
        #[arg(long, default_value_t = 0.1)]
        karma_pct: f64,
        #[arg(long, default_value_t = 100)]
        candidates: usize,
    },
    /// Bulk-index a JSONL file
    Index {
        file: PathBuf,
        index: String,
        #[arg(long, default_value_t = 500)]
        batch: usize,
    },
    /// Bulk-index an accounts dump, keyed by account id
    IndexAuthors {
        dump: PathBuf,
        index: String,
        #[arg(long, default_value_t = 5000)]
        batch: usize,
    },
    /// Run a stored query file and print each response
    Query { file: PathBuf, index: String },
    Count { path: PathBuf },
    /// Sort a file's lines, optionally by a JSON key (author, id, created_utc, acc_id or a /pointer)
    Sort {
        path: PathBuf,
        #[arg(long)]
        key: Option<String>,
    },
    /// Append SRC to DEST
    Merge { dest: PathBuf, src: PathBuf },
    /// Cut every dataset under a directory into a training-sized sample
    Cut {
        dir: PathBuf,
        #[arg(long)]
        size_training: usize,
        #[arg(long, default_value_t = 0.5)]
        split: f64,
    },
    /// Pronoun, keyword and posting-time features per post
    Features {
        posts: PathBuf,
        out: PathBuf,
        #[arg(long)]
        topic_keywords: Option<PathBuf>,
        #[arg(long)]
        swearing: Option<PathBuf>,
    },
}

fn options(cli: &Cli) -> HarvestOptions {
    let mut opts = HarvestOptions::from_env().with_progress(!cli.no_progress);
    if let Some(u) = &cli.api_url { opts = opts.with_api_url(u); }
    if let Some(u) = &cli.search_url { opts = opts.with_search_url(u); }
    if let Some(d) = &cli.backups_dir { opts = opts.with_backups_dir(d); }
    if let Some(d) = &cli.data_dir { opts = opts.with_data_dir(d); }
    if let Some(t) = cli.timeout { opts = opts.with_request_timeout(Duration::from_secs(t)); }
    if let Some(n) = cli.page_size { opts = opts.with_page_size(n); }
    if let Some(d) = cli.delay_ms { opts = opts.with_request_delay(Duration::from_millis(d)); }
    opts
}

fn post_source(cli: &Cli, opts: &HarvestOptions) -> Result<Box<dyn PostSource>> {
    let source: Box<dyn PostSource> = match &cli.archive {
        Some(path) => Box::new(ArchivePostSource::open(path)?),
        None => Box::new(PushshiftClient::new(opts)?),
    };
    Ok(source)
}

fn iso_or_now(s: Option<&str>) -> Result<i64> {
    match s {
        Some(s) => from_iso(s).with_context(|| format!("invalid date {s:?}")),
        None => Ok(now_epoch()),
    }
}

fn with_directory<T>(args: &DirectoryArgs, opts: &HarvestOptions, f: impl FnOnce(&dyn AuthorDirectory) -> Result<T>) -> Result<T> {
    match (&args.dump, &args.index) {
        (Some(dump), _) => {
            let dir = MemoryAuthorDirectory::new(load_author_dump(dump)?);
            tracing::info!(accounts = dir.len(), "author directory loaded");
            f(&dir)
        }
        (None, Some(index)) => {
            let client = SearchClient::new(opts)?;
            f(&IndexedAuthors::new(&client, index.as_str()))
        }
        (None, None) => bail!("either --dump or --index is required"),
    }
}

fn data_path(opts: &HarvestOptions, given: &Option<PathBuf>, default_name: &str) -> PathBuf {
    given.clone().unwrap_or_else(|| opts.data_dir.join(default_name))
}

fn stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "out".into())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing_with_log_file(&cli.logs_dir);
    let opts = options(&cli);

    match &cli.command {
        Command::Historic { subreddit, before } => {
            let fetcher = Fetcher::new(post_source(&cli, &opts)?, opts.clone());
            let stats = fetcher.extract_historic_for_subreddit(subreddit, iso_or_now(before.as_deref())?)?;
            println!("{} posts written to {}", stats.written, stats.path.display());
        }
        Command::Reference { historic, block_size, posts_per_block, cutoff, params, exclude_subreddit } => {
            if *block_size == 0 {
                bail!("--block-size must be positive");
            }
            let cfg = ReferenceConfig {
                block_size: *block_size,
                posts_per_block: *posts_per_block,
                cutoff: iso_or_now(cutoff.as_deref())?,
                params: *params,
                exclude_subreddit: exclude_subreddit.clone(),
            };
            let fetcher = Fetcher::new(post_source(&cli, &opts)?, opts.clone());
            let summary = fetcher.obtain_reference_collection(historic, &cfg)?;
            println!("{} posts in {} windows written to {}", summary.written, summary.windows, summary.path.display());
        }
        Command::Scales { sheet, max_posts } => {
            let scales = read_scale_queries(sheet, SheetLayout::default())?;
            let fetcher = Fetcher::new(post_source(&cli, &opts)?, opts.clone());
            let summary = fetcher.extract_posts_from_scales(&scales, *max_posts)?;
            for failed in &summary.failed_queries {
                println!("{failed}");
            }
            println!("{} posts written to {} files", summary.written, summary.files.len());
        }
        Command::Usernames { posts, out } => {
            let mut names: Vec<String> = obtain_usernames(posts)?.into_iter().collect();
            names.sort();
            let out = data_path(&opts, out, &format!("{}_usernames.txt", stem(posts)));
            write_usernames(&out, &names)?;
            println!("{} usernames written to {}", names.len(), out.display());
        }
        Command::Authors { subreddit_posts, reference_posts, exclude_bots } => {
            let (case, reference) = obtain_authors(subreddit_posts, reference_posts, *exclude_bots)?;
            let case_out = opts.data_dir.join(format!("{}_authors.txt", stem(subreddit_posts)));
            let ref_out = opts.data_dir.join(format!("{}_authors.txt", stem(reference_posts)));
            write_usernames(&case_out, &case)?;
            write_usernames(&ref_out, &reference)?;
            println!("{} case authors, {} reference authors", case.len(), reference.len());
        }
        Command::AuthorsInfo { usernames, directory, out } => {
            let names = read_usernames(usernames)?;
            let out = data_path(&opts, out, &format!("{}_info.jsonl", stem(usernames)));
            let found = with_directory(directory, &opts, |dir| extract_authors_info(&names, dir, &out))?;
            println!("{} of {} authors found, written to {}", found.len(), names.len(), out.display());
        }
        Command::Sample { authors_info, size, seed, out, csv } => {
            let mut rng = match seed {
                Some(s) => StdRng::seed_from_u64(*s),
                None => StdRng::from_entropy(),
            };
            let out = data_path(&opts, out, &format!("{}_sample_{}.jsonl", stem(authors_info), size));
            let selected = sample_authors_file(authors_info, *size, &out, csv.as_deref(), &mut rng)?;
            println!("{} authors sampled into {}", selected.len(), out.display());
        }
        Command::Match { sample, directory, exclude, days, karma_pct, candidates } => {
            let sampled: Vec<AuthorRecord> = read_records(sample)?;
            let mut excluded = Vec::new();
            for path in exclude {
                excluded.extend(read_usernames(path)?);
            }
            if excluded.is_empty() {
                tracing::warn!("exclusion lists are empty, case authors outside the sample may become controls");
            }
            let cfg = MatchConfig { days: *days, karma_pct: *karma_pct, candidates: *candidates };
            let outcome = with_directory(directory, &opts, |dir| Ok(match_authors(&sampled, dir, &excluded, &cfg)))?;

            let base = stem(sample);
            let (cases, controls) = (outcome.cases(), outcome.controls());
            write_records(&opts.data_dir.join(format!("{base}_cases.jsonl")), &cases)?;
            write_records(&opts.data_dir.join(format!("{base}_controls.jsonl")), &controls)?;
            write_csv(&opts.data_dir.join(format!("{base}_cases.csv")), &cases)?;
            write_csv(&opts.data_dir.join(format!("{base}_controls.csv")), &controls)?;
            let unmatched: Vec<String> = outcome.unmatched.iter().map(|a| a.username.clone()).collect();
            write_usernames(&opts.data_dir.join(format!("{base}_unmatched.txt")), &unmatched)?;
            println!("{} pairs matched, {} authors without a control", outcome.pairs.len(), outcome.unmatched.len());
        }
        Command::Index { file, index, batch } => {
            let client = SearchClient::new(&opts)?;
            let s = index_from_file(&client, file, index, *batch, opts.progress)?;
            println!("{} of {} documents indexed into {index}", s.indexed, s.read);
        }
        Command::IndexAuthors { dump, index, batch } => {
            let client = SearchClient::new(&opts)?;
            let s = index_author_dump(&client, dump, index, *batch, opts.progress)?;
            println!("{} of {} accounts indexed into {index}", s.indexed, s.read);
        }
        Command::Query { file, index } => {
            let client = SearchClient::new(&opts)?;
            for (desc, resp) in run_query_file(&client, file, index)? {
                println!("# {desc}");
                println!("{}", serde_json::to_string_pretty(&resp)?);
            }
        }
        Command::Count { path } => println!("{}", count_lines(path)?),
        Command::Sort { path, key } => match key {
            Some(name) => {
                let Some(k) = KeyExtractor::from_name(name) else { bail!("unknown sort key {name:?}") };
                sort_file_by_key(path, &k)?;
            }
            None => sort_file(path)?,
        },
        Command::Merge { dest, src } => {
            if !merge_files(dest, src) {
                bail!("could not merge {} into {}", src.display(), dest.display());
            }
        }
        Command::Cut { dir, size_training, split } => {
            let written = cut_datasets(dir, *size_training, *split)?;
            println!("{} datasets cut", written.len());
        }
        Command::Features { posts, out, topic_keywords, swearing } => {
            let keywords = KeywordSets::from_files(topic_keywords.as_deref(), swearing.as_deref())?;
            let n = extract_features_file(posts, out, &keywords)?;
            println!("features for {n} posts written to {}", out.display());
        }
    }
    Ok(())
}
