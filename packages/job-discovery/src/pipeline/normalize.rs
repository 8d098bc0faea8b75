//! Normalizer - raw source records into canonical jobs.
//!
//! Pure apart from the clock, which callers pass in. Optional fields degrade
//! to defaults; identity fields (native id, title, company, link, posted
//! date) are required because a job without them cannot be deduplicated.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use regex::Regex;
use serde_json::Value;

use crate::error::{MalformedRecord, NormalizeResult, PipelineError, Result};
use crate::pipeline::skills::{fold_skill, SkillMatcher};
use crate::types::config::NormalizerConfig;
use crate::types::job::{Job, JobId, JobStatus, Source, WorkMode};
use crate::types::raw::RawRecord;

const ID_KEYS: &[&str] = &["id", "job_id", "jobId", "job_key", "jk", "source_id"];
const TITLE_KEYS: &[&str] = &["title", "job_title", "jobTitle", "positionName"];
const COMPANY_KEYS: &[&str] = &["company", "company_name", "companyName"];
const LINK_KEYS: &[&str] = &[
    "link",
    "application_link",
    "applicationLink",
    "url",
    "applyUrl",
    "job_url",
];
const POSTED_KEYS: &[&str] = &["posted_date", "postedDate", "datePosted", "posted_at", "date"];
const LOCATION_KEYS: &[&str] = &["location", "job_location", "jobLocation"];
const WORK_MODE_KEYS: &[&str] = &["work_mode", "workMode", "remote_type", "workplaceType"];
const DESCRIPTION_KEYS: &[&str] = &["description", "job_description", "jobDescription"];
const SKILL_KEYS: &[&str] = &["skills"];
const SALARY_MIN_KEYS: &[&str] = &["salaryMin", "salary_min"];
const SALARY_MAX_KEYS: &[&str] = &["salaryMax", "salary_max"];
const SALARY_TEXT_KEYS: &[&str] = &["salary"];
const CURRENCY_KEYS: &[&str] = &["currency", "salary_currency"];
const PERIOD_KEYS: &[&str] = &["salary_period", "salaryPeriod"];
const VISA_KEYS: &[&str] = &["visa", "visa_sponsorship", "visaSponsorship"];
const SCRAPED_KEYS: &[&str] = &["scraped_at", "scrapedAt"];

const UNKNOWN_LOCATION: &str = "Unknown";

static RELATIVE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\+?\s*(minute|min|hour|hr|day|week|month)s?\s+ago$").unwrap()
});

static SALARY_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d[\d,]*(?:\.\d+)?)\s*(k\b)?").unwrap());

static VISA_POSITIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(visa sponsor|visa sponsorship available|h1b sponsor|h-1b sponsor|work authorization support|visa support|sponsorship available|will sponsor)",
    )
    .unwrap()
});

static VISA_NEGATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(no (?:visa )?sponsorship|without (?:visa )?sponsorship|not (?:offer(?:ing)?|provid(?:e|ing)) (?:visa )?sponsorship|(?:unable|not able) to (?:offer|provide) (?:visa )?sponsorship|not sponsor|cannot sponsor|can't sponsor|unable to sponsor|no visa support|us citizens? only|citizenship required|must be authorized)",
    )
    .unwrap()
});

/// Pay period of a salary figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayPeriod {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl PayPeriod {
    /// Multiplier to an annual figure.
    pub fn annual_factor(&self) -> f64 {
        match self {
            PayPeriod::Hour => 2080.0,
            PayPeriod::Day => 260.0,
            PayPeriod::Week => 52.0,
            PayPeriod::Month => 12.0,
            PayPeriod::Year => 1.0,
        }
    }

    /// Detect a period word in salary text.
    pub fn detect(text: &str) -> Option<Self> {
        let text = text.to_lowercase();
        if text.contains("hour") || text.contains("/hr") || text.contains("hourly") || text.ends_with("/h") {
            Some(PayPeriod::Hour)
        } else if text.contains("day") || text.contains("daily") {
            Some(PayPeriod::Day)
        } else if text.contains("week") {
            Some(PayPeriod::Week)
        } else if text.contains("month") || text.contains("/mo") {
            Some(PayPeriod::Month)
        } else if text.contains("year") || text.contains("annual") || text.contains("/yr") || text.contains("annum") {
            Some(PayPeriod::Year)
        } else {
            None
        }
    }
}

/// Annual salary bounds in USD.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SalaryRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

/// Converts raw records of any source into canonical jobs.
#[derive(Debug)]
pub struct Normalizer {
    matcher: Option<SkillMatcher>,
    currency_rates: BTreeMap<String, f64>,
    retention: Duration,
}

impl Normalizer {
    /// Build a normalizer. `retention` must be positive so that
    /// `expires_at > scraped_at` holds for every job.
    pub fn new(config: &NormalizerConfig, retention: Duration) -> Result<Self> {
        if retention <= Duration::zero() {
            return Err(PipelineError::Config(
                "retention window must be positive".into(),
            ));
        }
        let matcher = config
            .extract_skills_from_description
            .then(|| SkillMatcher::new(config.skill_vocabulary.iter().map(String::as_str)))
            .filter(|m| !m.is_empty());

        Ok(Self {
            matcher,
            currency_rates: config
                .currency_rates
                .iter()
                .map(|(code, rate)| (code.to_uppercase(), *rate))
                .collect(),
            retention,
        })
    }

    /// Normalize one record from `source`, stamping `now` where the record
    /// carries no scrape time of its own.
    pub fn normalize(
        &self,
        raw: &RawRecord,
        source: &Source,
        now: DateTime<Utc>,
    ) -> NormalizeResult<Job> {
        if raw.fields().is_none() {
            return Err(MalformedRecord::NotAnObject);
        }

        let native_id = required(raw, ID_KEYS, "id")?;
        let title = required(raw, TITLE_KEYS, "title")?;
        let company_name = required(raw, COMPANY_KEYS, "company")?;
        let application_link = parse_link(&required(raw, LINK_KEYS, "application_link")?)?;
        let posted_date = match raw.lookup(POSTED_KEYS) {
            Some(value) => parse_posted_value(value, now)?,
            None => return Err(MalformedRecord::MissingField { field: "posted_date" }),
        };

        let description = raw.lookup_text(DESCRIPTION_KEYS).unwrap_or_default();
        let location = raw
            .lookup_text(LOCATION_KEYS)
            .unwrap_or_else(|| UNKNOWN_LOCATION.to_string());

        let work_mode = raw
            .lookup_text(WORK_MODE_KEYS)
            .and_then(|m| WorkMode::parse_loose(&m))
            .unwrap_or_else(|| detect_work_mode(&description, &location));

        let mut skills = raw
            .lookup(SKILL_KEYS)
            .map(skills_from_value)
            .unwrap_or_default();
        if let Some(matcher) = &self.matcher {
            skills.extend(matcher.find_in(&description));
        }

        let salary = self.salary(raw)?;

        let visa_sponsorship = match raw.lookup(VISA_KEYS) {
            Some(value) => parse_visa_value(value),
            None => detect_visa_sponsorship(&description),
        };

        // Stores keep millisecond timestamps
        let scraped_at = raw
            .lookup_text(SCRAPED_KEYS)
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now)
            .trunc_subsecs(3);
        let expires_at = scraped_at
            .checked_add_signed(self.retention)
            .ok_or_else(|| MalformedRecord::UnparsableDate {
                value: scraped_at.to_rfc3339(),
            })?;

        Ok(Job {
            id: JobId::derive(source, &native_id),
            source: source.clone(),
            source_id: native_id,
            company_name,
            title,
            location,
            work_mode,
            skills,
            salary_min: salary.min,
            salary_max: salary.max,
            visa_sponsorship,
            description,
            application_link,
            posted_date,
            scraped_at,
            status: JobStatus::New,
            match_score: None,
            expires_at,
        })
    }

    /// Salary bounds from numeric fields or free text, in annual USD.
    fn salary(&self, raw: &RawRecord) -> NormalizeResult<SalaryRange> {
        let min_value = raw.lookup(SALARY_MIN_KEYS);
        let max_value = raw.lookup(SALARY_MAX_KEYS);
        let text = raw.lookup_text(SALARY_TEXT_KEYS);

        if min_value.is_none() && max_value.is_none() && text.is_none() {
            return Ok(SalaryRange::default());
        }

        let explicit_period = raw.lookup_text(PERIOD_KEYS);
        let explicit_currency = raw.lookup_text(CURRENCY_KEYS);

        let (min, max, hint) = if min_value.is_some() || max_value.is_some() {
            let min = min_value.map(parse_amount_value).transpose()?;
            let max = max_value.map(parse_amount_value).transpose()?;
            (min, max, String::new())
        } else {
            let text = text.unwrap_or_default();
            let (min, max) = parse_salary_text(&text)?;
            (min, max, text)
        };

        let period = explicit_period
            .as_deref()
            .and_then(PayPeriod::detect)
            .or_else(|| PayPeriod::detect(&hint))
            .unwrap_or(PayPeriod::Year);

        let currency = match explicit_currency {
            Some(code) => code.to_uppercase(),
            None => detect_currency(&hint).to_string(),
        };
        let rate = *self
            .currency_rates
            .get(&currency)
            .ok_or_else(|| MalformedRecord::UnparsableSalary {
                value: format!("unsupported currency {currency}"),
            })?;

        let to_annual_usd = |amount: f64| (amount * period.annual_factor() * rate).round() as i64;
        let (min, max) = match (min.map(to_annual_usd), max.map(to_annual_usd)) {
            (Some(lo), Some(hi)) if lo > hi => (Some(hi), Some(lo)),
            other => other,
        };

        Ok(SalaryRange { min, max })
    }
}

fn required(raw: &RawRecord, keys: &[&str], field: &'static str) -> NormalizeResult<String> {
    raw.lookup_text(keys)
        .ok_or(MalformedRecord::MissingField { field })
}

fn parse_link(link: &str) -> NormalizeResult<String> {
    let invalid = || MalformedRecord::InvalidLink {
        value: link.to_string(),
    };
    let url = url::Url::parse(link).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid());
    }
    Ok(url.to_string())
}

/// Posted date from a JSON value: text forms, or epoch seconds/millis.
fn parse_posted_value(value: &Value, now: DateTime<Utc>) -> NormalizeResult<NaiveDate> {
    match value {
        Value::String(text) => parse_posted_date(text, now),
        Value::Number(n) => {
            let unparsable = || MalformedRecord::UnparsableDate {
                value: n.to_string(),
            };
            let raw = n.as_i64().ok_or_else(unparsable)?;
            // Millisecond timestamps are past 1e11
            let magnitude = raw.checked_abs().ok_or_else(unparsable)?;
            let secs = if magnitude > 100_000_000_000 { raw / 1000 } else { raw };
            DateTime::from_timestamp(secs, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(unparsable)
        }
        other => Err(MalformedRecord::UnparsableDate {
            value: other.to_string(),
        }),
    }
}

/// Parse the date forms job boards publish, resolving relative phrases
/// against `now`.
pub fn parse_posted_date(text: &str, now: DateTime<Utc>) -> NormalizeResult<NaiveDate> {
    let trimmed = text.trim();
    let unparsable = || MalformedRecord::UnparsableDate {
        value: text.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.date());
    }
    for format in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }

    let mut phrase = trimmed
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    for prefix in ["posted", "employer", "active"] {
        if let Some(rest) = phrase.strip_prefix(prefix) {
            phrase = rest.trim_start().to_string();
        }
    }

    let today = now.date_naive();
    match phrase.as_str() {
        "today" | "just posted" | "just now" | "new" => return Ok(today),
        "yesterday" => return today.pred_opt().ok_or_else(unparsable),
        _ => {}
    }

    let caps = RELATIVE_DATE.captures(&phrase).ok_or_else(unparsable)?;
    let amount: i64 = caps[1].parse().map_err(|_| unparsable())?;
    let ago = match &caps[2] {
        "minute" | "min" => Duration::try_minutes(amount),
        "hour" | "hr" => Duration::try_hours(amount),
        "day" => Duration::try_days(amount),
        "week" => Duration::try_weeks(amount),
        "month" => amount.checked_mul(30).and_then(Duration::try_days),
        _ => None,
    }
    .ok_or_else(unparsable)?;
    now.checked_sub_signed(ago)
        .map(|dt| dt.date_naive())
        .ok_or_else(unparsable)
}

/// Parse a salary bound given as a number or numeric text.
fn parse_amount_value(value: &Value) -> NormalizeResult<f64> {
    let unparsable = || MalformedRecord::UnparsableSalary {
        value: value.to_string(),
    };
    match value {
        Value::Number(n) => n.as_f64().filter(|v| *v >= 0.0).ok_or_else(unparsable),
        Value::String(s) => {
            let amounts = salary_amounts(s);
            amounts.first().copied().ok_or_else(unparsable)
        }
        _ => Err(unparsable()),
    }
}

/// Numeric amounts in salary text, with `k` suffixes expanded.
fn salary_amounts(text: &str) -> Vec<f64> {
    let lower = text.to_lowercase();
    SALARY_AMOUNT
        .captures_iter(&lower)
        .filter_map(|caps| {
            let number: f64 = caps[1].replace(',', "").parse().ok()?;
            Some(if caps.get(2).is_some() { number * 1000.0 } else { number })
        })
        .collect()
}

/// Bounds from free salary text like `"$120,000 - $150,000 a year"`.
///
/// A single figure sets both bounds unless it reads "up to" (max only) or
/// "from"/"starting at" (min only).
pub fn parse_salary_text(text: &str) -> NormalizeResult<(Option<f64>, Option<f64>)> {
    let amounts = salary_amounts(text);
    let lower = text.to_lowercase();
    match amounts.as_slice() {
        [] => Err(MalformedRecord::UnparsableSalary {
            value: text.to_string(),
        }),
        [single] if lower.contains("up to") => Ok((None, Some(*single))),
        [single] if lower.contains("from") || lower.contains("starting at") => {
            Ok((Some(*single), None))
        }
        [single] => Ok((Some(*single), Some(*single))),
        [first, second, ..] => Ok((Some(*first), Some(*second))),
    }
}

/// Currency code implied by symbols or codes in salary text. Defaults to USD.
fn detect_currency(text: &str) -> &'static str {
    let upper = text.to_uppercase();
    if upper.contains("CA$") || upper.contains("C$") || upper.contains("CAD") {
        "CAD"
    } else if upper.contains("A$") || upper.contains("AUD") {
        "AUD"
    } else if text.contains('€') || upper.contains("EUR") {
        "EUR"
    } else if text.contains('£') || upper.contains("GBP") {
        "GBP"
    } else if text.contains('₹') || upper.contains("INR") {
        "INR"
    } else {
        "USD"
    }
}

/// Skills from an array of strings or a comma-separated string.
fn skills_from_value(value: &Value) -> std::collections::BTreeSet<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(fold_skill)
            .collect(),
        Value::String(list) => list.split(',').filter_map(fold_skill).collect(),
        _ => Default::default(),
    }
}

/// Explicit visa field. Unrecognized values mean unknown.
fn parse_visa_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "available" | "sponsored" => Some(true),
            "false" | "no" | "n" | "none" | "not available" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Sponsorship stance stated in a description. Negative phrasing wins.
pub fn detect_visa_sponsorship(text: &str) -> Option<bool> {
    if VISA_NEGATIVE.is_match(text) {
        Some(false)
    } else if VISA_POSITIVE.is_match(text) {
        Some(true)
    } else {
        None
    }
}

fn detect_work_mode(description: &str, location: &str) -> WorkMode {
    let text = format!("{} {}", description, location).to_lowercase();
    if text.contains("remote") || text.contains("work from home") {
        WorkMode::Remote
    } else if text.contains("hybrid") {
        WorkMode::Hybrid
    } else {
        WorkMode::Onsite
    }
}
