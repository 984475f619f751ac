//! Per-type answer normalization and scoring.
//!
//! Entry answers and settlement outcomes go through the same `normalize`, so a
//! stored answer and an outcome compare equal exactly when they mean the same
//! thing (`"Yes"`, `"yes"` and `"YES"` all become `"yes"`).

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate};

use crate::error::{AppError, Result};
use crate::types::{MatchMode, WagerKind};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A validated answer in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Binary label (lower-cased) or multiple-choice option (canonical casing).
    Choice(String),
    Integer(i64),
    Day(NaiveDate),
    /// Short answer, trimmed. Compared case-insensitively.
    Text(String),
    Ranking(Vec<String>),
}

impl Answer {
    /// Storage form. Rankings are JSON arrays, dates ISO `YYYY-MM-DD`.
    pub fn encode(&self) -> String {
        match self {
            Answer::Choice(s) | Answer::Text(s) => s.clone(),
            Answer::Integer(n) => n.to_string(),
            Answer::Day(d) => d.format(DATE_FORMAT).to_string(),
            Answer::Ranking(items) => {
                serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
            }
        }
    }

    /// Equal for two answers exactly when they mean the same outcome.
    /// Short answers fold case; every other form is already canonical.
    pub fn comparison_key(&self) -> String {
        match self {
            Answer::Text(s) => s.to_lowercase(),
            other => other.encode(),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration checks
// ---------------------------------------------------------------------------

/// Reject type configurations no answer could ever satisfy.
pub fn validate_kind(kind: &WagerKind) -> Result<()> {
    match kind {
        WagerKind::Binary { labels } => {
            let [a, b] = labels;
            if a.trim().is_empty() || b.trim().is_empty() {
                return Err(config_err("binary labels must not be empty"));
            }
            if a.trim().to_lowercase() == b.trim().to_lowercase() {
                return Err(config_err("binary labels must differ"));
            }
        }
        WagerKind::MultipleChoice { options } => {
            if options.len() < 2 {
                return Err(config_err("multiple choice needs at least two options"));
            }
            check_distinct_options(options)?;
        }
        WagerKind::Numeric { min, max, .. } => {
            if let (Some(lo), Some(hi)) = (min, max) {
                if lo > hi {
                    return Err(config_err("numeric min exceeds max"));
                }
            }
        }
        WagerKind::Date { earliest, latest, .. } => {
            if let (Some(lo), Some(hi)) = (earliest, latest) {
                if lo > hi {
                    return Err(config_err("earliest date is after latest date"));
                }
            }
        }
        WagerKind::ShortAnswer { max_length } => {
            if *max_length == 0 {
                return Err(config_err("short answer max length must be at least 1"));
            }
        }
        WagerKind::TopNRanking { options, n } => {
            check_distinct_options(options)?;
            if *n == 0 || *n > options.len() {
                return Err(config_err(&format!(
                    "ranking size {n} must be between 1 and {}",
                    options.len()
                )));
            }
        }
    }
    Ok(())
}

fn check_distinct_options(options: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for opt in options {
        let key = opt.trim().to_lowercase();
        if key.is_empty() {
            return Err(config_err("options must not be empty"));
        }
        if !seen.insert(key) {
            return Err(config_err(&format!("duplicate option {opt:?}")));
        }
    }
    Ok(())
}

fn config_err(msg: &str) -> AppError {
    AppError::InvalidWagerConfig(msg.to_string())
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

pub fn normalize(kind: &WagerKind, raw: &str) -> Result<Answer> {
    let trimmed = raw.trim();
    match kind {
        WagerKind::Binary { labels } => labels
            .iter()
            .find(|l| l.trim().to_lowercase() == trimmed.to_lowercase())
            .map(|l| Answer::Choice(l.trim().to_lowercase()))
            .ok_or_else(|| {
                invalid(format!("{trimmed:?} is not one of {:?} / {:?}", labels[0], labels[1]))
            }),
        WagerKind::MultipleChoice { options } => canonical_option(options, trimmed)
            .map(Answer::Choice)
            .ok_or_else(|| invalid(format!("{trimmed:?} is not one of the options"))),
        WagerKind::Numeric { min, max, .. } => {
            let n = parse_plain_integer(trimmed)?;
            if min.map_or(false, |lo| n < lo) || max.map_or(false, |hi| n > hi) {
                return Err(invalid(format!("{n} is outside the allowed range")));
            }
            Ok(Answer::Integer(n))
        }
        WagerKind::Date { earliest, latest, .. } => {
            let day = parse_day(trimmed)?;
            if earliest.map_or(false, |lo| day < lo) || latest.map_or(false, |hi| day > hi) {
                return Err(invalid(format!("{day} is outside the allowed range")));
            }
            Ok(Answer::Day(day))
        }
        WagerKind::ShortAnswer { max_length } => {
            if trimmed.is_empty() {
                return Err(invalid("answer is empty".to_string()));
            }
            let len = trimmed.chars().count();
            if len > *max_length {
                return Err(invalid(format!("answer is {len} characters, max is {max_length}")));
            }
            Ok(Answer::Text(trimmed.to_string()))
        }
        WagerKind::TopNRanking { options, n } => {
            let items: Vec<String> = serde_json::from_str(trimmed)
                .map_err(|_| invalid("ranking must be a JSON array of strings".to_string()))?;
            if items.len() != *n {
                return Err(invalid(format!("ranking needs exactly {n} values, got {}", items.len())));
            }
            let mut seen = HashSet::new();
            let mut ranked = Vec::with_capacity(items.len());
            for item in &items {
                let canonical = canonical_option(options, item.trim())
                    .ok_or_else(|| invalid(format!("{item:?} is not one of the options")))?;
                if !seen.insert(canonical.clone()) {
                    return Err(invalid(format!("{canonical:?} is ranked twice")));
                }
                ranked.push(canonical);
            }
            Ok(Answer::Ranking(ranked))
        }
    }
}

fn canonical_option(options: &[String], value: &str) -> Option<String> {
    options
        .iter()
        .find(|o| o.trim().to_lowercase() == value.to_lowercase())
        .map(|o| o.trim().to_string())
}

/// Digits with an optional leading minus. No decimals, exponents or `+`.
fn parse_plain_integer(s: &str) -> Result<i64> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(format!("{s:?} is not a whole number")));
    }
    s.parse::<i64>()
        .map_err(|_| invalid(format!("{s:?} is out of range")))
}

/// `YYYY-MM-DD`, or an RFC 3339 timestamp reduced to its date.
fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.date_naive()))
        .map_err(|_| invalid(format!("{s:?} is not a calendar date")))
}

fn invalid(msg: String) -> AppError {
    AppError::InvalidAnswer(msg)
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// How one answer measures against the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Match(bool),
    /// Absolute distance; days for date wagers.
    Distance(i64),
    /// Positions where the ranking agrees with the outcome.
    Hits(usize),
}

pub fn score(answer: &Answer, outcome: &Answer) -> Score {
    match (answer, outcome) {
        (Answer::Choice(a), Answer::Choice(b)) => Score::Match(a == b),
        (Answer::Text(_), Answer::Text(_)) => {
            Score::Match(answer.comparison_key() == outcome.comparison_key())
        }
        (Answer::Integer(a), Answer::Integer(b)) => {
            Score::Distance(i64::try_from(a.abs_diff(*b)).unwrap_or(i64::MAX))
        }
        (Answer::Day(a), Answer::Day(b)) => Score::Distance((*a - *b).num_days().abs()),
        (Answer::Ranking(a), Answer::Ranking(b)) => {
            Score::Hits(a.iter().zip(b).filter(|(x, y)| x == y).count())
        }
        _ => Score::Match(false),
    }
}

/// Winners of a settlement plus per-entry distances for distance-based wagers.
/// No winners means every entry is refunded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgement {
    pub winners: Vec<usize>,
    pub distances: Vec<Option<i64>>,
}

impl Judgement {
    pub fn refund_all(&self) -> bool {
        self.winners.is_empty()
    }
}

pub fn judge(kind: &WagerKind, answers: &[Answer], outcome: &Answer) -> Judgement {
    let scores: Vec<Score> = answers.iter().map(|a| score(a, outcome)).collect();
    let distances = scores
        .iter()
        .map(|s| match s {
            Score::Distance(d) => Some(*d),
            _ => None,
        })
        .collect();

    let winners = match kind {
        WagerKind::Numeric { mode, .. } | WagerKind::Date { mode, .. } => {
            let best = scores
                .iter()
                .filter_map(|s| match s {
                    Score::Distance(d) => Some(*d),
                    _ => None,
                })
                .min();
            let target = match (mode, best) {
                (MatchMode::Exact, _) => Some(0),
                (MatchMode::Closest, best) => best,
            };
            indices_where(&scores, |s| Some(*s) == target.map(Score::Distance))
        }
        WagerKind::TopNRanking { .. } => {
            let best = scores
                .iter()
                .filter_map(|s| match s {
                    Score::Hits(h) => Some(*h),
                    _ => None,
                })
                .max()
                .unwrap_or(0);
            if best == 0 {
                Vec::new()
            } else {
                indices_where(&scores, |s| *s == Score::Hits(best))
            }
        }
        WagerKind::Binary { .. } | WagerKind::MultipleChoice { .. } | WagerKind::ShortAnswer { .. } => {
            indices_where(&scores, |s| *s == Score::Match(true))
        }
    };

    Judgement { winners, distances }
}

fn indices_where<F>(scores: &[Score], pred: F) -> Vec<usize>
where
    F: Fn(&Score) -> bool,
{
    scores
        .iter()
        .enumerate()
        .filter(|(_, s)| pred(s))
        .map(|(i, _)| i)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
