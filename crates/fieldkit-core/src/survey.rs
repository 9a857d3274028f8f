//! Survey definitions: surveys, jobs, tasks and multiple-choice specs

use std::collections::BTreeMap;

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Top-level unit of data collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survey {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Jobs keyed by job id
    pub jobs: BTreeMap<String, Job>,
}

impl Survey {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            jobs: BTreeMap::new(),
        }
    }

    /// Add a job, replacing any job with the same id
    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.insert(job.id.clone(), job);
        self
    }

    pub fn job(&self, job_id: &str) -> Option<&Job> {
        self.jobs.get(job_id)
    }
}

/// How LOIs for a job come into existence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataCollectionStrategy {
    /// LOIs are only imported by survey organizers
    #[default]
    Predefined,
    /// Data collectors add LOIs in the field
    AdHoc,
    /// Both of the above
    Mixed,
}

/// A named, ordered set of tasks applied to LOIs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    /// Tasks ordered by [`Task::index`]
    pub tasks: Vec<Task>,
    pub strategy: DataCollectionStrategy,
}

impl Job {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tasks: Vec::new(),
            strategy: DataCollectionStrategy::default(),
        }
    }

    /// Append a task; its index becomes its position
    pub fn with_task(mut self, mut task: Task) -> Self {
        task.index = self.tasks.len();
        self.tasks.push(task);
        self
    }

    pub fn with_strategy(mut self, strategy: DataCollectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    /// Whether data collectors may create LOIs for this job
    pub fn allows_ad_hoc_lois(&self) -> bool {
        matches!(
            self.strategy,
            DataCollectionStrategy::AdHoc | DataCollectionStrategy::Mixed
        )
    }
}

/// The declared response type of a task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum TaskType {
    #[display("text")]
    Text,
    #[display("photo")]
    Photo,
    #[display("number")]
    Number,
    #[display("date")]
    Date,
    #[display("time")]
    Time,
    #[display("multiple_choice")]
    MultipleChoice,
    #[display("drop_pin")]
    DropPin,
    #[display("draw_area")]
    DrawArea,
    #[display("capture_location")]
    CaptureLocation,
    /// A type tag this build does not recognize
    #[display("{_0}")]
    Unknown(String),
}

impl TaskType {
    /// Map a wire type tag to a task type
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "text" => TaskType::Text,
            "photo" => TaskType::Photo,
            "number" => TaskType::Number,
            "date" => TaskType::Date,
            "time" => TaskType::Time,
            "multiple_choice" => TaskType::MultipleChoice,
            "drop_pin" => TaskType::DropPin,
            "draw_area" => TaskType::DrawArea,
            "capture_location" => TaskType::CaptureLocation,
            other => TaskType::Unknown(other.to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, TaskType::Unknown(_))
    }
}

/// A single question or data-capture step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Position within the owning job
    pub index: usize,
    pub task_type: TaskType,
    pub label: String,
    pub required: bool,
    pub multiple_choice: Option<MultipleChoice>,
}

impl Task {
    pub fn new(id: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            id: id.into(),
            index: 0,
            task_type,
            label: String::new(),
            required: false,
            multiple_choice: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_multiple_choice(mut self, multiple_choice: MultipleChoice) -> Self {
        self.multiple_choice = Some(multiple_choice);
        self
    }
}

/// Whether one or many options may be picked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    #[default]
    SelectOne,
    SelectMany,
}

/// One choice of a multiple-choice task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOption {
    pub id: String,
    pub code: String,
    pub label: String,
}

impl TaskOption {
    pub fn new(id: impl Into<String>, code: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            label: label.into(),
        }
    }
}

/// Pre-defined options for a multiple-choice task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipleChoice {
    pub options: Vec<TaskOption>,
    pub cardinality: Cardinality,
}

impl MultipleChoice {
    pub fn new(options: Vec<TaskOption>, cardinality: Cardinality) -> Self {
        Self {
            options,
            cardinality,
        }
    }

    pub fn option_by_id(&self, id: &str) -> Option<&TaskOption> {
        self.options.iter().find(|o| o.id == id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.options.iter().position(|o| o.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_tags() {
        assert_eq!(TaskType::from_tag("drop_pin"), TaskType::DropPin);
        assert_eq!(TaskType::from_tag("multiple_choice").to_string(), "multiple_choice");
        let unknown = TaskType::from_tag("hologram");
        assert!(!unknown.is_known());
        assert_eq!(unknown.to_string(), "hologram");
    }

    #[test]
    fn test_job_task_indexing() {
        let job = Job::new("job-1", "Trees")
            .with_task(Task::new("t1", TaskType::Text))
            .with_task(Task::new("t2", TaskType::Number));
        assert_eq!(job.task("t2").map(|t| t.index), Some(1));
        assert!(job.task("missing").is_none());
    }

    #[test]
    fn test_ad_hoc_strategy() {
        let job = Job::new("job-1", "Trees");
        assert!(!job.allows_ad_hoc_lois());
        assert!(job.clone().with_strategy(DataCollectionStrategy::Mixed).allows_ad_hoc_lois());
        assert!(job.with_strategy(DataCollectionStrategy::AdHoc).allows_ad_hoc_lois());
    }

    #[test]
    fn test_multiple_choice_lookup() {
        let mc = MultipleChoice::new(
            vec![TaskOption::new("a", "A", "Alpha"), TaskOption::new("b", "B", "Beta")],
            Cardinality::SelectMany,
        );
        assert_eq!(mc.option_by_id("b").map(|o| o.label.as_str()), Some("Beta"));
        assert_eq!(mc.index_of("a"), Some(0));
        assert_eq!(mc.index_of("z"), None);
    }
}
