mod config;
mod date;
mod util;
mod progress;

mod json_utils;
mod ndjson;
mod key_extractor;
mod files;

mod pushshift;
mod blocks;
mod sheets;
mod fetcher;

mod authors;
mod matcher;
mod sampling;

mod search;
mod indexer;
mod features;

pub use crate::config::{HarvestOptions, SortOrder};
pub use crate::date::{add_days, days_between, from_iso, hour_and_month, now_epoch, sub_days, to_iso};

// Historical-search API access, live and offline.
pub use crate::pushshift::{ArchivePostSource, PostSource, PushshiftClient, SubmissionQuery};

pub use crate::blocks::{plan_blocks, Block, BlockConfig, BlockGenerator, BlockStats};
pub use crate::sheets::{read_scale_queries, write_csv, ScaleQueries, ScaleQuery, SheetLayout};
pub use crate::fetcher::{convert_response, FetchStats, Fetcher, Post, ReferenceConfig, ReferenceSummary, ScalesSummary, POST_FIELDS};

// export author utilities, matching and sampling
pub use crate::authors::{
    extract_authors_info, for_each_author_in_dump, link_comments_and_submissions, list_excluded_subreddits,
    load_author_dump, obtain_authors, obtain_usernames, read_usernames, sort_by_acc_id, write_usernames, AuthorRecord,
    MAX_LOOKUP_CHUNK,
};
pub use crate::matcher::{match_authors, AuthorDirectory, MatchConfig, MatchCriteria, MatchOutcome, MatchPair, MemoryAuthorDirectory, Range};
pub use crate::sampling::{sample_authors_file, systematic_indices, systematic_sample};

// search engine client, bulk indexing and stored queries
pub use crate::search::{candidates_query, first_hit, hit_sources, BulkDoc, BulkOutcome, IndexedAuthors, SearchClient};
pub use crate::indexer::{index_author_dump, index_from_file, run_query_file, IndexSummary};

pub use crate::features::{
    count_keywords, extract_features_file, pre_process, pronoun_proportions, tokenize, KeywordSets, PostFeatures,
    PronounProportions,
};

// export file manager operations
pub use crate::files::{
    clear_dir, clear_file, count_lines, create_subdir, cut_datasets, files_in_dir, merge_files, remove_file, sort_file,
    sort_file_by_key,
};

// export NDJSON helpers
pub use crate::ndjson::{append_record, read_records, write_records, NdjsonReader, NdjsonWriter};

// export KeyExtractor abstraction
pub use crate::key_extractor::{KeyExtractor, SortKey};

pub use crate::json_utils::{author_lower, created_utc, lenient_i64, subreddit_lower};
pub use crate::progress::{make_count_progress, make_spinner, ProgressScope};

//export robust file ops and logging setup from util so binaries can import from crate root.
pub use crate::util::{
    create_with_backoff, default_bot_authors, init_tracing_once, init_tracing_with_log_file, is_pseudo_user,
    normalize_str, open_with_backoff, remove_with_backoff, replace_file_atomic_backoff,
};
