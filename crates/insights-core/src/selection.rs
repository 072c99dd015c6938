//! Attempt windows and cohort halves: the subsets an analysis runs on.
//!
//! Selection only drops records. Kept records stay in primary-key order, so
//! a selected table is a valid table without re-sorting.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParamError;
use crate::model::{ScoreTable, SocraticLong};

/// Which attempts enter the analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptWindow {
    #[default]
    All,
    /// Attempts `1..=n`.
    First(u32),
    /// The last `n` attempts, counted back from the latest attempt present.
    Recent(u32),
}

impl AttemptWindow {
    pub fn validate(&self) -> Result<(), ParamError> {
        match self {
            AttemptWindow::First(0) | AttemptWindow::Recent(0) => {
                Err(ParamError::EmptyAttemptWindow(self.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Whether `attempt` falls inside the window when `latest` is the
    /// highest attempt in the table.
    pub fn contains(&self, attempt: u32, latest: u32) -> bool {
        match *self {
            AttemptWindow::All => true,
            AttemptWindow::First(n) => attempt <= n,
            AttemptWindow::Recent(n) => attempt > latest.saturating_sub(n),
        }
    }

    pub fn is_all(&self) -> bool {
        *self == AttemptWindow::All
    }
}

impl fmt::Display for AttemptWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptWindow::All => write!(f, "all"),
            AttemptWindow::First(n) => write!(f, "first:{n}"),
            AttemptWindow::Recent(n) => write!(f, "recent:{n}"),
        }
    }
}

impl FromStr for AttemptWindow {
    type Err = String;

    /// Parse `all`, `first:N` or `recent:N`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(AttemptWindow::All);
        }
        let (kind, n) = s
            .split_once(':')
            .ok_or_else(|| format!("invalid attempt window '{s}' (expected all, first:N or recent:N)"))?;
        let n: u32 = n
            .trim()
            .parse()
            .map_err(|_| format!("invalid attempt count in window '{s}'"))?;
        let window = match kind.trim().to_ascii_lowercase().as_str() {
            "first" => AttemptWindow::First(n),
            "recent" => AttemptWindow::Recent(n),
            other => return Err(format!("unknown attempt window kind '{other}'")),
        };
        window.validate().map_err(|e| e.to_string())?;
        Ok(window)
    }
}

/// A half of the cohort, split on sorted student ids.
///
/// With `n` students the first `n / 2` form the undergraduate half and the
/// rest the graduate half, so an odd student lands with the graduates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortSplit {
    #[default]
    All,
    Undergrad,
    Graduate,
}

impl CohortSplit {
    /// The slice of `students` (sorted ids) that belongs to this half.
    pub fn students<'a>(&self, students: &'a [String]) -> &'a [String] {
        let half = students.len() / 2;
        match self {
            CohortSplit::All => students,
            CohortSplit::Undergrad => &students[..half],
            CohortSplit::Graduate => &students[half..],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CohortSplit::All => "All students",
            CohortSplit::Undergrad => "Undergrad",
            CohortSplit::Graduate => "Graduate",
        }
    }
}

impl fmt::Display for CohortSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CohortSplit::All => "all",
            CohortSplit::Undergrad => "undergrad",
            CohortSplit::Graduate => "graduate",
        })
    }
}

impl FromStr for CohortSplit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(CohortSplit::All),
            "undergrad" => Ok(CohortSplit::Undergrad),
            "graduate" => Ok(CohortSplit::Graduate),
            other => Err(format!("unknown cohort '{other}' (expected all, undergrad or graduate)")),
        }
    }
}

/// Keep the records inside `window` whose student belongs to `cohort`.
///
/// The window is resolved against the full table before the cohort split,
/// so `recent:N` means the same attempts for both halves.
pub fn select_scores(scores: &ScoreTable, window: AttemptWindow, cohort: CohortSplit) -> ScoreTable {
    if window.is_all() && cohort == CohortSplit::All {
        return scores.clone();
    }
    let latest = scores.records().iter().map(|r| r.attempt).max().unwrap_or(0);
    let ids = scores.student_ids();
    let members: BTreeSet<&str> = cohort.students(&ids).iter().map(String::as_str).collect();
    let records = scores
        .records()
        .iter()
        .filter(|r| window.contains(r.attempt, latest) && members.contains(r.student_id.as_str()))
        .cloned()
        .collect();
    ScoreTable::from_sorted(scores.taxonomy().clone(), records)
}

/// Keep the Socratic records inside `window`, restricted to `students` when
/// given.
pub fn select_socratic(
    socratic: &SocraticLong,
    window: AttemptWindow,
    students: Option<&BTreeSet<String>>,
) -> SocraticLong {
    if window.is_all() && students.is_none() {
        return socratic.clone();
    }
    let latest = socratic.records().iter().map(|r| r.attempt).max().unwrap_or(0);
    let records = socratic
        .records()
        .iter()
        .filter(|r| window.contains(r.attempt, latest))
        .filter(|r| students.map_or(true, |keep| keep.contains(&r.student_id)))
        .cloned()
        .collect();
    SocraticLong::from_sorted(socratic.metrics().to_vec(), records)
}
