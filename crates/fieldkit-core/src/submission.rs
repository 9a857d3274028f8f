//! Submissions and the closed set of task response values

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::audit::AuditInfo;
use crate::geometry::{Geometry, Point};
use crate::survey::TaskType;

/// Option ids picked for a multiple-choice task, in pick order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipleChoiceSelection {
    pub option_ids: Vec<String>,
}

impl MultipleChoiceSelection {
    /// Returns `None` for an empty selection
    pub fn from_ids(option_ids: Vec<String>) -> Option<Self> {
        if option_ids.is_empty() {
            None
        } else {
            Some(Self { option_ids })
        }
    }
}

/// Result of a capture-location task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureLocationResult {
    pub location: Point,
    /// Meters above sea level
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in meters
    pub accuracy: Option<f64>,
}

/// A task response
///
/// Each variant corresponds to one or more [`TaskType`]s; see
/// [`Value::is_compatible_with`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Time(NaiveTime),
    MultipleChoice(MultipleChoiceSelection),
    Geometry(Geometry),
    CaptureLocation(CaptureLocationResult),
}

impl Value {
    /// Trimmed text; blank input is no value
    pub fn text(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Value::Text(trimmed.to_string()))
        }
    }

    /// Finite numbers only
    pub fn number(n: f64) -> Option<Self> {
        n.is_finite().then_some(Value::Number(n))
    }

    /// Whether this value may be stored under a task of `task_type`
    pub fn is_compatible_with(&self, task_type: &TaskType) -> bool {
        match (self, task_type) {
            (Value::Text(_), TaskType::Text | TaskType::Photo) => true,
            (Value::Number(_), TaskType::Number) => true,
            (Value::Date(_), TaskType::Date) => true,
            (Value::Time(_), TaskType::Time) => true,
            (Value::MultipleChoice(_), TaskType::MultipleChoice) => true,
            (Value::Geometry(Geometry::Point(_)), TaskType::DropPin) => true,
            (Value::Geometry(Geometry::Polygon(_)), TaskType::DrawArea) => true,
            (Value::CaptureLocation(_), TaskType::CaptureLocation) => true,
            _ => false,
        }
    }
}

/// Responses keyed by task id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionData(BTreeMap<String, Value>);

impl SubmissionData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: &str) -> Option<&Value> {
        self.0.get(task_id)
    }

    pub fn insert(&mut self, task_id: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(task_id.into(), value)
    }

    pub fn remove(&mut self, task_id: &str) -> Option<Value> {
        self.0.remove(task_id)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.0.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl FromIterator<(String, Value)> for SubmissionData {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One completed pass through a job's tasks for a specific LOI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub survey_id: String,
    pub loi_id: String,
    /// Always equal to the owning LOI's job id
    pub job_id: String,
    pub created: AuditInfo,
    pub last_modified: AuditInfo,
    pub data: SubmissionData,
}
