use std::collections::HashMap;

use crate::core::domain::Status;

/// Key/value pairs isolate writes to its `-M` meta file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    entries: HashMap<String, String>,
}

impl Metadata {
    /// Parses `key:value` lines. Blank lines are skipped and the value is
    /// everything after the first colon.
    pub fn parse(raw: &str) -> Self {
        let entries = raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();

        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Status reported by the sandbox, `None` when it reported nothing.
    pub fn status(&self) -> Option<Status> {
        self.get("status").map(Status::from_code)
    }

    pub fn time(&self) -> f64 {
        self.get("time")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0)
    }

    pub fn max_rss(&self) -> u64 {
        self.get("max-rss")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// A missing exit code counts as a failure.
    pub fn exit_code(&self) -> i32 {
        self.get("exitcode")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
    }
}
