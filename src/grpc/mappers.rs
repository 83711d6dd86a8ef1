use crate::core::{
    domain::{ExecutionResult, Submission},
    pipeline::PipelineEvent,
};
use crate::grpc::models::{self, Empty, chrono_to_prost, submit_event};

const MAX_ID_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid id: {reason}")]
    InvalidId { reason: String },
    #[error("Invalid {field}: {value}")]
    InvalidLimit { field: String, value: String },
    #[error("Too many inputs: {count}")]
    TooManyInputs { count: usize },
}

fn validate_id(id: &str) -> Result<(), ConversionError> {
    let reason = if id.is_empty() {
        "must not be empty".to_string()
    } else if id.chars().count() > MAX_ID_LEN {
        format!("longer than {} characters", MAX_ID_LEN)
    } else if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        "only letters, digits, '-' and '_' are allowed".to_string()
    } else {
        return Ok(());
    };

    Err(ConversionError::InvalidId { reason })
}

fn time_limit(value: f64) -> Result<Option<f64>, ConversionError> {
    if !value.is_finite() {
        return Err(ConversionError::InvalidLimit {
            field: "time_limit".to_string(),
            value: value.to_string(),
        });
    }
    Ok((value >= 0.0).then_some(value))
}

fn memory_limit(value: i64) -> Option<u64> {
    u64::try_from(value).ok()
}

impl TryFrom<models::SubmitRequest> for Submission {
    type Error = ConversionError;

    fn try_from(req: models::SubmitRequest) -> Result<Self, ConversionError> {
        validate_id(&req.id)?;
        if u32::try_from(req.input.len()).is_err() {
            return Err(ConversionError::TooManyInputs {
                count: req.input.len(),
            });
        }

        Ok(Self {
            id: req.id,
            source: req.src,
            language: req.language,
            time_limit: time_limit(req.time_limit)?,
            memory_limit: memory_limit(req.memory_limit),
            inputs: req.input,
        })
    }
}

impl From<ExecutionResult> for models::RunResult {
    fn from(result: ExecutionResult) -> Self {
        Self {
            stdout: result.stdout,
            stderr: result.stderr,
            status: result.status.code().to_string(),
            time: result.time,
            memory: result.memory,
            exit_code: result.exit_code,
        }
    }
}

pub fn event_to_grpc(id: &str, event: PipelineEvent) -> models::SubmitEvent {
    let (task, result) = match event {
        PipelineEvent::Build(result) => (submit_event::Task::Build(Empty {}), result),
        PipelineEvent::Run { index, result } => (submit_event::Task::Run(index as u32), result),
    };

    models::SubmitEvent {
        id: id.to_string(),
        task: Some(task),
        result: Some(result.into()),
        finished_at: Some(chrono_to_prost(chrono::Utc::now())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::Status;

    fn create_request() -> models::SubmitRequest {
        models::SubmitRequest {
            id: "t1".to_string(),
            src: "print(1)".to_string(),
            language: "py".to_string(),
            time_limit: 2.0,
            memory_limit: 65536,
            input: vec![String::new(), String::new()],
        }
    }

    #[test]
    fn test_valid_request() {
        let submission: Submission = create_request().try_into().unwrap();

        assert_eq!(submission.id, "t1");
        assert_eq!(submission.source, "print(1)");
        assert_eq!(submission.language, "py");
        assert_eq!(submission.time_limit, Some(2.0));
        assert_eq!(submission.memory_limit, Some(65536));
        assert_eq!(submission.inputs.len(), 2);
    }

    #[test]
    fn test_negative_limits_are_unbounded() {
        let mut req = create_request();
        req.time_limit = -1.0;
        req.memory_limit = -1;

        let submission: Submission = req.try_into().unwrap();

        assert_eq!(submission.time_limit, None);
        assert_eq!(submission.memory_limit, None);
    }

    #[test]
    fn test_non_finite_time_limit_rejected() {
        let mut req = create_request();
        req.time_limit = f64::NAN;

        let result: Result<Submission, _> = req.try_into();
        assert!(matches!(result, Err(ConversionError::InvalidLimit { .. })));
    }

    #[test]
    fn test_invalid_ids() {
        let too_long = "a".repeat(65);
        for id in ["", "has space", "semi;colon", too_long.as_str()] {
            let mut req = create_request();
            req.id = id.to_string();

            let result: Result<Submission, _> = req.try_into();
            assert!(
                matches!(result, Err(ConversionError::InvalidId { .. })),
                "id {:?} should be rejected",
                id
            );
        }
    }

    #[test]
    fn test_digit_only_id_accepted() {
        let mut req = create_request();
        req.id = "123".to_string();

        let submission: Submission = req.try_into().unwrap();
        assert_eq!(submission.id, "123");
    }

    #[test]
    fn test_id_at_max_length_accepted() {
        let mut req = create_request();
        req.id = "a-_".repeat(21) + "z";
        assert_eq!(req.id.len(), 64);

        let result: Result<Submission, _> = req.try_into();
        assert!(result.is_ok());
    }

    #[test]
    fn test_event_mapping() {
        let result = ExecutionResult {
            stdout: "1\n".to_string(),
            stderr: String::new(),
            status: Status::TimeLimitExceeded,
            time: 2.5,
            memory: 1024,
            exit_code: 0,
        };

        let build = event_to_grpc("t1", PipelineEvent::Build(result.clone()));
        assert_eq!(build.id, "t1");
        assert_eq!(build.task, Some(submit_event::Task::Build(Empty {})));
        assert!(build.finished_at.is_some());

        let run = event_to_grpc("t1", PipelineEvent::Run { index: 4, result });
        assert_eq!(run.task, Some(submit_event::Task::Run(4)));
        let run_result = run.result.unwrap();
        assert_eq!(run_result.status, "TLE");
        assert_eq!(run_result.stdout, "1\n");
        assert_eq!(run_result.memory, 1024);
    }
}
