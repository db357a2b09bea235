//! Job and job-schema definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A unit of work routed by schema name.
///
/// Jobs are immutable after creation: the cluster records lifecycle in a
/// separate status store and never mutates the job itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Globally unique job id. Assigned at creation, or by the backend on
    /// publish when empty.
    #[serde(default)]
    pub id: String,

    /// Routing key: the name of the schema this job conforms to.
    pub schema_name: String,

    /// Opaque payload matching the schema's declared input shape.
    #[serde(default)]
    pub payload: Value,

    /// Creation timestamp.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Creates a new job with a fresh id.
    pub fn new(schema_name: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            schema_name: schema_name.into(),
            payload,
            created_at: Utc::now(),
        }
    }

    /// Returns true if this job still needs an id assigned.
    pub fn needs_id(&self) -> bool {
        self.id.is_empty()
    }
}

/// A declared job type with input and output shapes.
///
/// The shapes are descriptive JSON values; validation of payloads against
/// them is the concern of the endpoint that consumes the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSchema {
    /// Unique schema name. Doubles as the queue name when registered.
    pub name: String,

    /// Input shape.
    #[serde(default)]
    pub input: Value,

    /// Output shape.
    #[serde(default)]
    pub output: Value,
}

impl JobSchema {
    /// Creates a schema with empty shapes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: Value::Null,
            output: Value::Null,
        }
    }
}

/// Builds a concrete job from a schema and an input payload.
pub fn job_from_schema(schema: &JobSchema, payload: Value) -> Job {
    Job::new(schema.name.clone(), payload)
}

/// What callers may hand to `Orchestrator::publish`: either a concrete job,
/// or a schema reference that is resolved against the registered mapping.
#[derive(Debug, Clone)]
pub enum JobSpec {
    /// A fully-formed job.
    Job(Job),
    /// A reference to a registered schema plus the input payload.
    Reference { schema_name: String, payload: Value },
}

impl From<Job> for JobSpec {
    fn from(job: Job) -> Self {
        JobSpec::Job(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_job_has_unique_id() {
        let a = Job::new("echo", json!({"message": "hi"}));
        let b = Job::new("echo", json!({"message": "hi"}));
        assert_ne!(a.id, b.id);
        assert!(!a.needs_id());
    }

    #[test]
    fn test_job_round_trips_through_json() {
        let job = Job::new("resize", json!({"width": 64}));
        let body = serde_json::to_vec(&job).unwrap();
        let restored: Job = serde_json::from_slice(&body).unwrap();
        assert_eq!(job, restored);
    }

    #[test]
    fn test_job_without_id_deserializes() {
        let restored: Job =
            serde_json::from_str(r#"{"schema_name": "echo", "payload": {}}"#).unwrap();
        assert!(restored.needs_id());
    }

    #[test]
    fn test_job_from_schema() {
        let schema = JobSchema::new("echo");
        let job = job_from_schema(&schema, json!({"message": "hello"}));
        assert_eq!(job.schema_name, "echo");
        assert_eq!(job.payload["message"], "hello");
    }
}
