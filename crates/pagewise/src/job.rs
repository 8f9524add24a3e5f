//! Job domain types: identity, status, page selection and prompt composition.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::export::Destination;

/// Opaque job identifier (a UUID v4 string for jobs created here).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status. Transitions only move forward:
/// `ready -> running -> {completed, error}`, plus `ready -> error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Ready,
    Running,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Ready => "ready",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    /// Completed and errored jobs accept no more pages.
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Statuses from which a job may move into `self`.
    pub fn predecessors(self) -> &'static [JobStatus] {
        match self {
            JobStatus::Ready => &[],
            JobStatus::Running => &[JobStatus::Ready],
            JobStatus::Completed => &[JobStatus::Running],
            JobStatus::Error => &[JobStatus::Ready, JobStatus::Running],
        }
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        next.predecessors().contains(&self)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(JobStatus::Ready),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "error" => Ok(JobStatus::Error),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Canned selections offered alongside explicit page lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickSelection {
    All,
    Odd,
    Even,
    FirstHalf,
    SecondHalf,
}

impl QuickSelection {
    pub fn pages(self, page_count: u32) -> Vec<u32> {
        let half = page_count.div_ceil(2);
        match self {
            QuickSelection::All => (1..=page_count).collect(),
            QuickSelection::Odd => (1..=page_count).filter(|p| p % 2 == 1).collect(),
            QuickSelection::Even => (1..=page_count).filter(|p| p % 2 == 0).collect(),
            QuickSelection::FirstHalf => (1..=half).collect(),
            QuickSelection::SecondHalf => (half + 1..=page_count).collect(),
        }
    }
}

impl FromStr for QuickSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(QuickSelection::All),
            "odd" => Ok(QuickSelection::Odd),
            "even" => Ok(QuickSelection::Even),
            "first-half" => Ok(QuickSelection::FirstHalf),
            "second-half" => Ok(QuickSelection::SecondHalf),
            other => Err(format!("unknown quick selection '{}'", other)),
        }
    }
}

/// A validated, sorted, duplicate-free set of 1-based page numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct PageSelection(Vec<u32>);

impl PageSelection {
    /// Sorts and dedups `pages`, rejecting empty input and page 0.
    pub fn new(mut pages: Vec<u32>) -> Result<Self, ValidationError> {
        if pages.is_empty() {
            return Err(ValidationError::EmptySelection);
        }
        pages.sort_unstable();
        pages.dedup();
        if pages[0] == 0 {
            return Err(ValidationError::PageZero);
        }
        Ok(Self(pages))
    }

    /// Like [`PageSelection::new`], and also checks every page against the
    /// document's page count.
    pub fn within(pages: Vec<u32>, page_count: u32) -> Result<Self, ValidationError> {
        let selection = Self::new(pages)?;
        if let Some(&page) = selection.0.iter().find(|&&p| p > page_count) {
            return Err(ValidationError::PageOutOfRange { page, page_count });
        }
        Ok(selection)
    }

    /// Parses `"1-3,7,10-12"` or a quick selection name (`"odd"`, ...).
    pub fn parse(input: &str, page_count: u32) -> Result<Self, ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidSelection {
            input: input.to_string(),
            reason,
        };

        let trimmed = input.trim();
        if let Ok(quick) = trimmed.parse::<QuickSelection>() {
            return Self::within(quick.pages(page_count), page_count);
        }

        let mut pages = Vec::new();
        for part in trimmed.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('-') {
                Some((start, end)) => {
                    let start: u32 = start
                        .trim()
                        .parse()
                        .map_err(|_| invalid(format!("bad range start '{}'", start)))?;
                    let end: u32 = end
                        .trim()
                        .parse()
                        .map_err(|_| invalid(format!("bad range end '{}'", end)))?;
                    if start > end {
                        return Err(invalid(format!("range {}-{} is reversed", start, end)));
                    }
                    if end > page_count {
                        return Err(ValidationError::PageOutOfRange {
                            page: end,
                            page_count,
                        });
                    }
                    pages.extend(start..=end);
                }
                None => {
                    let page: u32 = part
                        .parse()
                        .map_err(|_| invalid(format!("bad page number '{}'", part)))?;
                    pages.push(page);
                }
            }
        }

        Self::within(pages, page_count)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, page: u32) -> bool {
        self.0.binary_search(&page).is_ok()
    }

    /// The numeric maximum; processing it completes the job.
    pub fn last(&self) -> u32 {
        self.0.last().copied().unwrap_or(0)
    }

    pub fn is_last(&self, page: u32) -> bool {
        !self.0.is_empty() && page == self.last()
    }
}

impl TryFrom<Vec<u32>> for PageSelection {
    type Error = ValidationError;

    fn try_from(pages: Vec<u32>) -> Result<Self, Self::Error> {
        Self::new(pages)
    }
}

impl From<PageSelection> for Vec<u32> {
    fn from(selection: PageSelection) -> Self {
        selection.0
    }
}

/// The five caller-facing prompt sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptFields {
    pub role: String,
    pub task: String,
    pub context: String,
    pub format: String,
    pub constraints: String,
}

impl PromptFields {
    /// Joins the non-empty sections as labelled blocks separated by blank lines.
    pub fn compose(&self) -> String {
        let sections = [
            ("Role", &self.role),
            ("Task", &self.task),
            ("Context", &self.context),
            ("Format", &self.format),
            ("Constraints", &self.constraints),
        ];

        sections
            .iter()
            .filter(|(_, body)| !body.trim().is_empty())
            .map(|(label, body)| format!("{}:\n{}", label, body.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.compose().is_empty()
    }
}

/// Caller input for [`crate::Engine::create_job`].
#[derive(Debug, Clone)]
pub struct NewJob {
    /// File id the document normalizer resolves.
    pub source_ref: String,
    pub model: String,
    pub prompt: PromptFields,
    pub pages: Vec<u32>,
    pub destination: Destination,
    /// Falls back to `source_ref` when absent.
    pub original_filename: Option<String>,
}

/// A persisted job.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub source_ref: String,
    pub model: String,
    pub prompt: String,
    pub pages: PageSelection,
    pub destination: Destination,
    pub status: JobStatus,
    pub error: Option<String>,
    pub original_filename: String,
    pub filename_stem: String,
    pub is_batch: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
}

/// Derives the stem used in export labels and file names.
///
/// Drops the directory and extension and replaces characters that are
/// unsafe in file names with `_`. Never returns an empty string.
pub fn filename_stem(original_filename: &str) -> String {
    let stem = Path::new(original_filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let cleaned: String = stem
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('_').is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}
