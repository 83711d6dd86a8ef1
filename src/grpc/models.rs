use std::time::SystemTime;

use chrono::{DateTime, Utc};

#[derive(Clone, PartialEq, prost::Message)]
pub struct SubmitRequest {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub src: String,
    #[prost(string, tag = "3")]
    pub language: String,
    /// Seconds per run, negative for no limit.
    #[prost(double, tag = "4")]
    pub time_limit: f64,
    /// Kilobytes per run, negative for no limit.
    #[prost(int64, tag = "5")]
    pub memory_limit: i64,
    #[prost(string, repeated, tag = "6")]
    pub input: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Empty {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RunResult {
    #[prost(string, tag = "1")]
    pub stdout: String,
    #[prost(string, tag = "2")]
    pub stderr: String,
    #[prost(string, tag = "3")]
    pub status: String,
    #[prost(double, tag = "4")]
    pub time: f64,
    #[prost(uint64, tag = "5")]
    pub memory: u64,
    #[prost(int32, tag = "6")]
    pub exit_code: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SubmitEvent {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(oneof = "submit_event::Task", tags = "2, 3")]
    pub task: Option<submit_event::Task>,
    #[prost(message, optional, tag = "4")]
    pub result: Option<RunResult>,
    #[prost(message, optional, tag = "5")]
    pub finished_at: Option<prost_types::Timestamp>,
}

pub mod submit_event {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Task {
        #[prost(message, tag = "2")]
        Build(super::Empty),
        /// Index of the input this result belongs to.
        #[prost(uint32, tag = "3")]
        Run(u32),
    }
}

include!(concat!(env!("OUT_DIR"), "/boxrunner.Runner.rs"));

pub fn chrono_to_prost(dt: DateTime<Utc>) -> prost_types::Timestamp {
    let dt: SystemTime = dt.into();
    let dt: prost_types::Timestamp = dt.into();
    dt
}
