//! Survey, job and task definition decoding

use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue, json};
use tracing::{debug, warn};

use fieldkit_core::{
    Cardinality, DataCollectionStrategy, DocumentError, Job, MultipleChoice, RemoteDocument,
    Survey, Task, TaskOption, TaskType,
};

const TITLE: &str = "title";
const DESCRIPTION: &str = "description";
const JOBS: &str = "jobs";
const NAME: &str = "name";
const TASKS: &str = "tasks";
const STRATEGY: &str = "strategy";
const TASK_ID: &str = "id";
const TASK_TYPE: &str = "type";
const LABEL: &str = "label";
const REQUIRED: &str = "required";
const MULTIPLE_CHOICE: &str = "multipleChoice";
const OPTIONS: &str = "options";
const CARDINALITY: &str = "cardinality";
const OPTION_CODE: &str = "code";

const SELECT_ONE: &str = "select_one";
const SELECT_MULTIPLE: &str = "select_multiple";

fn strategy_from_tag(tag: &str) -> Option<DataCollectionStrategy> {
    match tag {
        "PREDEFINED" => Some(DataCollectionStrategy::Predefined),
        "AD_HOC" => Some(DataCollectionStrategy::AdHoc),
        "MIXED" => Some(DataCollectionStrategy::Mixed),
        _ => None,
    }
}

fn strategy_tag(strategy: DataCollectionStrategy) -> &'static str {
    match strategy {
        DataCollectionStrategy::Predefined => "PREDEFINED",
        DataCollectionStrategy::AdHoc => "AD_HOC",
        DataCollectionStrategy::Mixed => "MIXED",
    }
}

fn str_field<'a>(map: &'a Map<String, JsonValue>, field: &str) -> Option<&'a str> {
    map.get(field).and_then(JsonValue::as_str)
}

/// Decode the survey document: title, optional description, and its jobs
///
/// Jobs that fail to decode are logged and left out.
pub fn survey_from_document(doc: &RemoteDocument) -> Result<Survey, DocumentError> {
    let title = doc
        .get_str(TITLE)
        .ok_or_else(|| DocumentError::missing(&doc.id, TITLE))?;

    let jobs = match doc.get(JOBS) {
        None => BTreeMap::new(),
        Some(JsonValue::Object(jobs)) => jobs
            .iter()
            .filter_map(|(job_id, raw)| match job_from_wire(job_id, raw) {
                Ok(job) => Some((job_id.clone(), job)),
                Err(e) => {
                    warn!(survey_id = %doc.id, job_id = %job_id, error = %e, "Skipping malformed job");
                    None
                }
            })
            .collect(),
        Some(_) => return Err(DocumentError::invalid(&doc.id, JOBS, "expected a map of jobs")),
    };

    debug!(survey_id = %doc.id, jobs = jobs.len(), "Decoded survey");
    Ok(Survey {
        id: doc.id.clone(),
        title: title.to_string(),
        description: doc.get_str(DESCRIPTION).unwrap_or_default().to_string(),
        jobs,
    })
}

/// Decode one job doc; task order in the list becomes the task index
pub fn job_from_wire(job_id: &str, raw: &JsonValue) -> Result<Job, DocumentError> {
    let map = raw
        .as_object()
        .ok_or_else(|| DocumentError::invalid(job_id, "job", "expected a map"))?;
    let name = str_field(map, NAME).ok_or_else(|| DocumentError::missing(job_id, NAME))?;

    let strategy = match str_field(map, STRATEGY) {
        None => DataCollectionStrategy::default(),
        Some(tag) => strategy_from_tag(tag).ok_or_else(|| {
            DocumentError::invalid(job_id, STRATEGY, format!("unknown strategy '{tag}'"))
        })?,
    };

    let task_docs = match map.get(TASKS) {
        None | Some(JsonValue::Null) => &[][..],
        Some(JsonValue::Array(tasks)) => tasks.as_slice(),
        Some(_) => return Err(DocumentError::invalid(job_id, TASKS, "expected a list")),
    };

    let job = task_docs
        .iter()
        .filter_map(|raw| match task_from_wire(job_id, raw) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Skipping malformed task");
                None
            }
        })
        .fold(Job::new(job_id, name), Job::with_task)
        .with_strategy(strategy);
    Ok(job)
}

fn task_from_wire(job_id: &str, raw: &JsonValue) -> Result<Task, DocumentError> {
    let map = raw
        .as_object()
        .ok_or_else(|| DocumentError::invalid(job_id, TASKS, "task is not a map"))?;
    let id = str_field(map, TASK_ID).ok_or_else(|| DocumentError::missing(job_id, TASK_ID))?;
    let tag = str_field(map, TASK_TYPE).ok_or_else(|| DocumentError::missing(id, TASK_TYPE))?;
    let task_type = TaskType::from_tag(tag);
    if !task_type.is_known() {
        debug!(task_id = %id, type_name = %tag, "Task has an unrecognized type");
    }

    let mut task = Task::new(id, task_type);
    if let Some(label) = str_field(map, LABEL) {
        task = task.with_label(label);
    }
    if map.get(REQUIRED).and_then(JsonValue::as_bool).unwrap_or(false) {
        task = task.required();
    }
    if let Some(mc) = map.get(MULTIPLE_CHOICE).filter(|v| !v.is_null()) {
        task = task.with_multiple_choice(multiple_choice_from_wire(id, mc)?);
    }
    Ok(task)
}

fn multiple_choice_from_wire(task_id: &str, raw: &JsonValue) -> Result<MultipleChoice, DocumentError> {
    let map = raw
        .as_object()
        .ok_or_else(|| DocumentError::invalid(task_id, MULTIPLE_CHOICE, "expected a map"))?;

    let cardinality = match str_field(map, CARDINALITY) {
        None | Some(SELECT_ONE) => Cardinality::SelectOne,
        Some(SELECT_MULTIPLE) => Cardinality::SelectMany,
        Some(other) => {
            return Err(DocumentError::invalid(
                task_id,
                CARDINALITY,
                format!("unknown cardinality '{other}'"),
            ));
        }
    };

    let options = map
        .get(OPTIONS)
        .and_then(JsonValue::as_array)
        .map(|options| {
            options
                .iter()
                .map(|option| {
                    let option = option.as_object().ok_or_else(|| {
                        DocumentError::invalid(task_id, OPTIONS, "option is not a map")
                    })?;
                    let id = str_field(option, TASK_ID)
                        .ok_or_else(|| DocumentError::missing(task_id, TASK_ID))?;
                    Ok(TaskOption::new(
                        id,
                        str_field(option, OPTION_CODE).unwrap_or_default(),
                        str_field(option, LABEL).unwrap_or_default(),
                    ))
                })
                .collect::<Result<Vec<_>, DocumentError>>()
        })
        .transpose()?
        .unwrap_or_default();

    Ok(MultipleChoice::new(options, cardinality))
}

pub fn job_to_wire(job: &Job) -> JsonValue {
    let tasks: Vec<JsonValue> = job.tasks.iter().map(task_to_wire).collect();
    json!({
        NAME: job.name,
        STRATEGY: strategy_tag(job.strategy),
        TASKS: tasks,
    })
}

fn task_to_wire(task: &Task) -> JsonValue {
    let mut map = Map::new();
    map.insert(TASK_ID.to_string(), json!(task.id));
    map.insert(TASK_TYPE.to_string(), json!(task.task_type.to_string()));
    if !task.label.is_empty() {
        map.insert(LABEL.to_string(), json!(task.label));
    }
    map.insert(REQUIRED.to_string(), json!(task.required));
    if let Some(mc) = &task.multiple_choice {
        let options: Vec<JsonValue> = mc
            .options
            .iter()
            .map(|o| json!({TASK_ID: o.id, OPTION_CODE: o.code, LABEL: o.label}))
            .collect();
        let cardinality = match mc.cardinality {
            Cardinality::SelectOne => SELECT_ONE,
            Cardinality::SelectMany => SELECT_MULTIPLE,
        };
        map.insert(
            MULTIPLE_CHOICE.to_string(),
            json!({OPTIONS: options, CARDINALITY: cardinality}),
        );
    }
    JsonValue::Object(map)
}

/// Encode a survey definition; the id is the document key, not a field
pub fn survey_to_wire(survey: &Survey) -> JsonValue {
    let jobs: Map<String, JsonValue> = survey
        .jobs
        .iter()
        .map(|(id, job)| (id.clone(), job_to_wire(job)))
        .collect();
    json!({
        TITLE: survey.title,
        DESCRIPTION: survey.description,
        JOBS: jobs,
    })
}
