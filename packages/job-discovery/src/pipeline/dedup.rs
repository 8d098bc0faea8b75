//! Deduplication of normalized jobs across batches.
//!
//! Records collapse when their ids match or when a [`DuplicatePolicy`]
//! calls them the same posting. Grouping uses connected components over the
//! whole input, and each component is merged from its original records, so
//! the result does not depend on input order or on how records were batched.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::types::job::{Job, JobId};

/// Decides which jobs are the same posting beyond an exact id match.
///
/// Only jobs that share a `block` key are compared. `is_duplicate` must be
/// symmetric.
pub trait DuplicatePolicy: Send + Sync + fmt::Debug {
    /// Comparison bucket for a job. `None` opts the job out of similarity matching.
    fn block(&self, job: &Job) -> Option<String>;

    fn is_duplicate(&self, a: &Job, b: &Job) -> bool;
}

/// Same company, same title and same link host, within one source.
///
/// Catches one posting listed twice by a board under different native ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameSourceListing;

impl DuplicatePolicy for SameSourceListing {
    fn block(&self, job: &Job) -> Option<String> {
        Some(format!("{}\u{1f}{}", job.source.as_str(), listing_key(job)))
    }

    fn is_duplicate(&self, a: &Job, b: &Job) -> bool {
        a.source == b.source && same_listing(a, b)
    }
}

/// Like [`SameSourceListing`] but across sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossSourceListing;

impl DuplicatePolicy for CrossSourceListing {
    fn block(&self, job: &Job) -> Option<String> {
        Some(listing_key(job))
    }

    fn is_duplicate(&self, a: &Job, b: &Job) -> bool {
        same_listing(a, b)
    }
}

fn normalized_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn normalized_company(company: &str) -> String {
    company.trim().to_lowercase()
}

fn listing_key(job: &Job) -> String {
    format!(
        "{}\u{1f}{}",
        normalized_company(&job.company_name),
        normalized_title(&job.title)
    )
}

fn same_listing(a: &Job, b: &Job) -> bool {
    if normalized_company(&a.company_name) != normalized_company(&b.company_name) {
        return false;
    }
    if normalized_title(&a.title) != normalized_title(&b.title) {
        return false;
    }
    match (a.link_host(), b.link_host()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Output of one deduplication pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupOutcome {
    /// Unique jobs ordered by id
    pub jobs: Vec<Job>,
    pub duplicates_merged: usize,
}

/// Collapses duplicate postings.
#[derive(Debug)]
pub struct Deduplicator {
    policy: Box<dyn DuplicatePolicy>,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(SameSourceListing)
    }
}

impl Deduplicator {
    pub fn new(policy: impl DuplicatePolicy + 'static) -> Self {
        Self {
            policy: Box::new(policy),
        }
    }

    pub fn deduplicate(&self, jobs: Vec<Job>) -> DedupOutcome {
        let input = jobs.len();
        let mut sets = DisjointSet::new(input);

        {
            let mut first_by_id: HashMap<&JobId, usize> = HashMap::new();
            let mut blocks: HashMap<String, Vec<usize>> = HashMap::new();

            for (i, job) in jobs.iter().enumerate() {
                match first_by_id.entry(&job.id) {
                    Entry::Occupied(first) => sets.union(*first.get(), i),
                    Entry::Vacant(slot) => {
                        slot.insert(i);
                    }
                }
                if let Some(key) = self.policy.block(job) {
                    blocks.entry(key).or_default().push(i);
                }
            }

            for members in blocks.values() {
                for (pos, &i) in members.iter().enumerate() {
                    for &j in &members[pos + 1..] {
                        if sets.find(i) != sets.find(j)
                            && self.policy.is_duplicate(&jobs[i], &jobs[j])
                        {
                            sets.union(i, j);
                        }
                    }
                }
            }
        }

        let mut clusters: HashMap<usize, Vec<Job>> = HashMap::new();
        for (i, job) in jobs.into_iter().enumerate() {
            clusters.entry(sets.find(i)).or_default().push(job);
        }

        let mut merged: Vec<Job> = clusters
            .into_values()
            .filter_map(|cluster| {
                let refs: Vec<&Job> = cluster.iter().collect();
                refs.split_first()
                    .map(|(head, rest)| merge_cluster(head, rest))
            })
            .collect();
        merged.sort_by(|a, b| a.id.cmp(&b.id));

        let duplicates_merged = input - merged.len();
        debug!(input, unique = merged.len(), duplicates_merged, "Deduplicated jobs");

        DedupOutcome {
            jobs: merged,
            duplicates_merged,
        }
    }
}

/// Merge every original record of one posting.
///
/// - identity (`id`, `source`, `source_id`) comes from the smallest id
/// - scalar fields come from the newest record
/// - skills are unioned
/// - visa sponsorship and the salary range come from the newest record that
///   has them; the salary range is never split across records
///
/// Every choice is a maximum under a total order, so the result depends
/// only on the set of records: not on their order, on which one is `head`,
/// or on a record appearing twice. Always pass the original records; a
/// merged job no longer knows which record its visa or salary came from,
/// so merging merged jobs again can pick a different value.
pub fn merge_cluster(head: &Job, rest: &[&Job]) -> Job {
    let all = || std::iter::once(head).chain(rest.iter().copied());

    let identity = all().fold(head, |best, job| {
        if identity_key(job) < identity_key(best) {
            job
        } else {
            best
        }
    });
    let newest = all().fold(head, |best, job| newer(job, best));
    let visa = all()
        .filter(|job| job.visa_sponsorship.is_some())
        .reduce(newer)
        .and_then(|job| job.visa_sponsorship);
    let salary = all()
        .filter(|job| !job.salary_unspecified())
        .reduce(newer)
        .map(|job| (job.salary_min, job.salary_max))
        .unwrap_or((None, None));

    let mut merged = newest.clone();
    merged.id = identity.id.clone();
    merged.source = identity.source.clone();
    merged.source_id = identity.source_id.clone();
    merged.skills = all().flat_map(|job| job.skills.iter().cloned()).collect();
    merged.visa_sponsorship = visa;
    (merged.salary_min, merged.salary_max) = salary;
    merged
}

fn identity_key(job: &Job) -> (&JobId, &str, &str) {
    (&job.id, job.source_id.as_str(), job.source.as_str())
}

fn newer<'a>(a: &'a Job, b: &'a Job) -> &'a Job {
    if recency_cmp(a, b) == Ordering::Greater {
        a
    } else {
        b
    }
}

/// Total order: scrape time, then id, then field values. Records that
/// compare equal agree on every field a merge copies.
fn recency_cmp(a: &Job, b: &Job) -> Ordering {
    a.scraped_at
        .cmp(&b.scraped_at)
        .then_with(|| a.id.cmp(&b.id))
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.company_name.cmp(&b.company_name))
        .then_with(|| a.location.cmp(&b.location))
        .then_with(|| a.work_mode.cmp(&b.work_mode))
        .then_with(|| a.description.cmp(&b.description))
        .then_with(|| a.application_link.cmp(&b.application_link))
        .then_with(|| a.posted_date.cmp(&b.posted_date))
        .then_with(|| a.expires_at.cmp(&b.expires_at))
        .then_with(|| a.status.cmp(&b.status))
        .then_with(|| a.visa_sponsorship.cmp(&b.visa_sponsorship))
        .then_with(|| (a.salary_min, a.salary_max).cmp(&(b.salary_min, b.salary_max)))
        .then_with(|| score_cmp(a.match_score, b.match_score))
}

fn score_cmp(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (x, y) => x.is_some().cmp(&y.is_some()),
    }
}

/// Union-find with path halving.
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            Ordering::Less => self.parent[ra] = rb,
            Ordering::Greater => self.parent[rb] = ra,
            Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::JobFixture;
    use crate::types::job::Source;
    use proptest::prelude::*;

    fn indeed(native: &str, hour: u32) -> JobFixture {
        JobFixture::new(Source::Indeed, native)
            .with_company("Acme")
            .with_title("Data Engineer")
            .with_link(&format!("https://www.indeed.com/viewjob?jk={native}"))
            .with_scraped_hour(hour)
    }

    #[test]
    fn test_cross_listing_merges_into_one() {
        let a = indeed("1", 8).with_skills(["python"]).build();
        let b = indeed("2", 9).with_skills(["sql"]).build();

        let outcome = Deduplicator::default().deduplicate(vec![b, a]);

        assert_eq!(outcome.jobs.len(), 1);
        assert_eq!(outcome.duplicates_merged, 1);
        let job = &outcome.jobs[0];
        assert_eq!(job.id.as_str(), "indeed_1");
        assert_eq!(job.source_id, "1");
        assert!(job.skills.contains("python") && job.skills.contains("sql"));
    }

    #[test]
    fn test_same_id_prefers_newer_but_keeps_known_values() {
        let older = indeed("7", 8)
            .with_title("Data Engineer")
            .with_visa(Some(true))
            .with_salary(Some(100_000), Some(120_000))
            .build();
        let newer_copy = indeed("7", 10)
            .with_location("Denver, CO")
            .with_salary(None, Some(130_000))
            .build();

        let merged = merge_cluster(&older, &[&newer_copy]);

        assert_eq!(merged.location, "Denver, CO");
        assert_eq!(merged.scraped_at, newer_copy.scraped_at);
        assert_eq!(merged.expires_at, newer_copy.expires_at);
        assert_eq!(merged.visa_sponsorship, Some(true));
        assert_eq!((merged.salary_min, merged.salary_max), (None, Some(130_000)));
        assert_eq!(merged, merge_cluster(&newer_copy, &[&older]));
    }

    #[test]
    fn test_company_case_is_folded_beyond_ascii() {
        let a = indeed("1", 8).with_company("ÉCOLE Numérique").build();
        let b = indeed("2", 9).with_company("école numérique").build();

        let outcome = Deduplicator::default().deduplicate(vec![a, b]);
        assert_eq!(outcome.jobs.len(), 1);
        assert_eq!(outcome.duplicates_merged, 1);
    }

    #[test]
    fn test_merging_merged_jobs_can_lose_provenance() {
        let a = indeed("1", 10).build();
        let b = indeed("1", 8).with_visa(Some(true)).build();
        let c = indeed("1", 9).with_visa(Some(false)).build();

        let merged = merge_cluster(&a, &[&b, &c]);
        assert_eq!(merged.visa_sponsorship, Some(false));

        let refolded = merge_cluster(&merge_cluster(&a, &[&b]), &[&c]);
        assert_eq!(refolded.visa_sponsorship, Some(true));
    }

    #[test]
    fn test_different_hosts_stay_apart() {
        let a = indeed("1", 8).build();
        let b = indeed("2", 8).with_link("https://careers.acme.com/2").build();

        let outcome = Deduplicator::default().deduplicate(vec![a, b]);
        assert_eq!(outcome.jobs.len(), 2);
        assert_eq!(outcome.duplicates_merged, 0);
    }

    #[test]
    fn test_policy_scope_for_cross_source() {
        let a = JobFixture::new(Source::Indeed, "1")
            .with_link("https://careers.acme.com/jobs/1")
            .build();
        let b = JobFixture::new(Source::Linkedin, "99")
            .with_link("https://careers.acme.com/jobs/1")
            .build();

        let default = Deduplicator::default().deduplicate(vec![a.clone(), b.clone()]);
        assert_eq!(default.jobs.len(), 2);

        let cross = Deduplicator::new(CrossSourceListing).deduplicate(vec![a, b]);
        assert_eq!(cross.jobs.len(), 1);
        assert_eq!(cross.jobs[0].id.as_str(), "indeed_1");
    }

    #[test]
    fn test_transitive_matches_form_one_cluster() {
        let a = indeed("3", 8).build();
        let b = indeed("1", 9).build();
        let c = indeed("2", 7).build();
        let d = indeed("3", 11).with_title("Senior Data Engineer").build();

        let outcome = Deduplicator::default().deduplicate(vec![a, b, c, d]);
        assert_eq!(outcome.jobs.len(), 1);
        assert_eq!(outcome.jobs[0].id.as_str(), "indeed_1");
        assert_eq!(outcome.jobs[0].title, "Senior Data Engineer");
    }

    #[test]
    fn test_output_is_sorted_by_id() {
        let jobs = vec![
            JobFixture::new(Source::Indeed, "b").with_company("B").build(),
            JobFixture::new(Source::Indeed, "a").with_company("A").build(),
            JobFixture::new(Source::Glassdoor, "c").with_company("C").build(),
        ];
        let ids: Vec<_> = Deduplicator::default()
            .deduplicate(jobs)
            .jobs
            .into_iter()
            .map(|j| j.id.to_string())
            .collect();
        assert_eq!(ids, vec!["glassdoor_c", "indeed_a", "indeed_b"]);
    }

    fn arb_job() -> impl Strategy<Value = Job> {
        (
            0..4u8,
            0..3u8,
            0..4u32,
            proptest::option::of(any::<bool>()),
            proptest::option::of(60_000i64..200_000),
            proptest::collection::btree_set("[a-d]", 0..3),
            0..2u8,
        )
            .prop_map(|(native, title, hour, visa, salary, skills, host)| {
                JobFixture::new(Source::Indeed, &native.to_string())
                    .with_title(&format!("Role {title}"))
                    .with_link(&format!("https://host{host}.example.com/{native}"))
                    .with_scraped_hour(hour)
                    .with_visa(visa)
                    .with_salary(salary, salary.map(|s| s + 10_000))
                    .with_skills(skills)
                    .build()
            })
    }

    proptest! {
        #[test]
        fn prop_merge_is_commutative(a in arb_job(), b in arb_job()) {
            prop_assert_eq!(merge_cluster(&a, &[&b]), merge_cluster(&b, &[&a]));
        }

        #[test]
        fn prop_cluster_merge_ignores_grouping(a in arb_job(), b in arb_job(), c in arb_job()) {
            let abc = merge_cluster(&a, &[&b, &c]);
            prop_assert_eq!(&abc, &merge_cluster(&c, &[&a, &b]));
            prop_assert_eq!(&abc, &merge_cluster(&b, &[&c, &a]));
        }

        #[test]
        fn prop_cluster_merge_depends_only_on_the_record_set(
            (jobs, shuffled) in proptest::collection::vec(arb_job(), 1..8)
                .prop_flat_map(|jobs| (Just(jobs.clone()), Just(jobs).prop_shuffle())),
            repeat in 0..8usize,
        ) {
            let refs: Vec<&Job> = jobs.iter().collect();
            let merged = merge_cluster(refs[0], &refs[1..]);

            let mut again: Vec<&Job> = shuffled.iter().collect();
            again.push(&jobs[repeat % jobs.len()]);
            prop_assert_eq!(&merged, &merge_cluster(again[0], &again[1..]));
        }

        #[test]
        fn prop_deduplicate_is_order_independent(
            (jobs, shuffled) in proptest::collection::vec(arb_job(), 0..10)
                .prop_flat_map(|jobs| (Just(jobs.clone()), Just(jobs).prop_shuffle()))
        ) {
            let dedup = Deduplicator::default();
            let input = jobs.len();
            let first = dedup.deduplicate(jobs);
            let second = dedup.deduplicate(shuffled);

            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.jobs.len() + first.duplicates_merged, input);

            let mut ids: Vec<_> = first.jobs.iter().map(|j| j.id.clone()).collect();
            ids.dedup();
            prop_assert_eq!(ids.len(), first.jobs.len());
        }
    }
}
