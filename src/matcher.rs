//! Case/control matching: for each sampled author find a similar account
//! (creation date within N days, karma within a percentage) that is not excluded.

use crate::authors::AuthorRecord;
use crate::date::{add_days, sub_days};
use ahash::{AHashMap, AHashSet};
use anyhow::Result;

/// Inclusive numeric range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Range {
    pub lo: i64,
    pub hi: i64,
}

impl Range {
    #[inline]
    pub fn contains(&self, v: i64) -> bool {
        self.lo <= v && v <= self.hi
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MatchConfig {
    /// Allowed distance in days between account creation dates.
    pub days: i64,
    /// Allowed relative karma deviation, e.g. `0.1` for ±10 %.
    pub karma_pct: f64,
    /// Eligible candidates requested per lookup; also the search engine page size.
    pub candidates: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self { days: 30, karma_pct: 0.1, candidates: 100 }
    }
}

/// Ranges a control account must fall into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchCriteria {
    pub created: Range,
    pub comment_karma: Range,
    pub link_karma: Range,
}

fn karma_range(k: i64, pct: f64) -> Range {
    let delta = k.unsigned_abs() as f64 * pct;
    Range { lo: (k as f64 - delta).floor() as i64, hi: (k as f64 + delta).ceil() as i64 }
}

impl MatchCriteria {
    pub fn for_author(a: &AuthorRecord, cfg: &MatchConfig) -> Self {
        let pct = cfg.karma_pct.abs();
        Self {
            created: Range { lo: sub_days(a.created, cfg.days), hi: add_days(a.created, cfg.days) },
            comment_karma: karma_range(a.comment_karma, pct),
            link_karma: karma_range(a.link_karma, pct),
        }
    }

    pub fn accepts(&self, a: &AuthorRecord) -> bool {
        self.created.contains(a.created) && self.comment_karma.contains(a.comment_karma) && self.link_karma.contains(a.link_karma)
    }
}

/// An index of "all users" that can be searched by username or by similarity ranges.
pub trait AuthorDirectory {
    /// Records for the given usernames (those that exist).
    fn lookup_usernames(&self, usernames: &[String]) -> Result<Vec<AuthorRecord>>;
    /// Up to `limit` accounts satisfying `criteria` whose lowercased username is not in
    /// `excluded`, in a stable order. Excluded accounts never use up the limit.
    fn find_candidates(
        &self,
        criteria: &MatchCriteria,
        excluded: &AHashSet<String>,
        limit: usize,
    ) -> Result<Vec<AuthorRecord>>;
}

/// Directory held in memory, e.g. loaded from a JSONL or CSV accounts dump.
/// Candidates come back in `acc_id` order.
pub struct MemoryAuthorDirectory {
    authors: Vec<AuthorRecord>,
    by_username: AHashMap<String, usize>,
}

impl MemoryAuthorDirectory {
    pub fn new(mut authors: Vec<AuthorRecord>) -> Self {
        crate::authors::sort_by_acc_id(&mut authors);
        let by_username = authors.iter().enumerate().map(|(i, a)| (a.username.to_lowercase(), i)).collect();
        Self { authors, by_username }
    }

    pub fn len(&self) -> usize { self.authors.len() }
    pub fn is_empty(&self) -> bool { self.authors.is_empty() }
}

impl AuthorDirectory for MemoryAuthorDirectory {
    fn lookup_usernames(&self, usernames: &[String]) -> Result<Vec<AuthorRecord>> {
        Ok(usernames
            .iter()
            .filter_map(|u| self.by_username.get(&u.to_lowercase()))
            .map(|&i| self.authors[i].clone())
            .collect())
    }

    fn find_candidates(
        &self,
        criteria: &MatchCriteria,
        excluded: &AHashSet<String>,
        limit: usize,
    ) -> Result<Vec<AuthorRecord>> {
        Ok(self
            .authors
            .iter()
            .filter(|a| criteria.accepts(a) && !excluded.contains(&a.username.to_lowercase()))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchPair {
    pub case: AuthorRecord,
    pub control: AuthorRecord,
}

#[derive(Clone, Debug, Default)]
pub struct MatchOutcome {
    pub pairs: Vec<MatchPair>,
    pub unmatched: Vec<AuthorRecord>,
}

impl MatchOutcome {
    pub fn cases(&self) -> Vec<AuthorRecord> { self.pairs.iter().map(|p| p.case.clone()).collect() }
    pub fn controls(&self) -> Vec<AuthorRecord> { self.pairs.iter().map(|p| p.control.clone()).collect() }
}

/// Match every sampled author against `directory`.
///
/// `excluded` (case-insensitive) seeds the exclusion set; each accepted control joins
/// it, so a control is never used twice. Sampled authors are excluded from being their
/// own or each other's control. Lookups that fail count as unmatched.
pub fn match_authors<I, S>(
    sample: &[AuthorRecord],
    directory: &dyn AuthorDirectory,
    excluded: I,
    cfg: &MatchConfig,
) -> MatchOutcome
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut excluded: AHashSet<String> = excluded.into_iter().map(|s| s.as_ref().to_lowercase()).collect();
    excluded.extend(sample.iter().map(|a| a.username.to_lowercase()));

    let mut out = MatchOutcome::default();
    for author in sample {
        let criteria = MatchCriteria::for_author(author, cfg);
        let found = match directory.find_candidates(&criteria, &excluded, cfg.candidates.max(1)) {
            Ok(cands) => cands.into_iter().find(|c| !excluded.contains(&c.username.to_lowercase())),
            Err(e) => {
                tracing::error!(author=%author.username, error=%format!("{e:#}"), "candidate lookup failed");
                None
            }
        };
        match found {
            Some(control) => {
                excluded.insert(control.username.to_lowercase());
                out.pairs.push(MatchPair { case: author.clone(), control });
            }
            None => {
                tracing::debug!(author=%author.username, "no control found");
                out.unmatched.push(author.clone());
            }
        }
    }
    tracing::info!(matched=out.pairs.len(), unmatched=out.unmatched.len(), "matching finished");
    out
}
