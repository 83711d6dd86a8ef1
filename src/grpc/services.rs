use std::sync::Arc;

use tokio::sync::mpsc::channel;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::{
    constants::STREAM_TX_ERR,
    core::{
        domain::Submission,
        pipeline::{Pipeline, PipelineEvent},
    },
    grpc::{
        mappers::{ConversionError, event_to_grpc},
        models::{SubmitEvent, SubmitRequest, runner_server::Runner},
    },
};

#[derive(Clone, Debug)]
pub struct RunnerServiceImpl {
    pipeline: Arc<Pipeline>,
}

impl RunnerServiceImpl {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

#[tonic::async_trait]
impl Runner for RunnerServiceImpl {
    type SubmitStream = ReceiverStream<Result<SubmitEvent, Status>>;

    #[tracing::instrument(skip(self, request))]
    async fn submit(
        &self,
        request: Request<SubmitRequest>,
    ) -> Result<Response<Self::SubmitStream>, Status> {
        let submission: Result<Submission, ConversionError> = request.into_inner().try_into();
        let submission = submission.map_err(|e| {
            tracing::debug!(error = %e, "Rejected submission");
            Status::invalid_argument(e.to_string())
        })?;

        if self.pipeline.registry().scripts(&submission.language).is_none() {
            tracing::debug!(language = %submission.language, "Rejected submission");
            return Err(Status::invalid_argument("Unrecognised language"));
        }

        tracing::info!(
            id = %submission.id,
            language = %submission.language,
            inputs = submission.inputs.len(),
            "Accepted submission"
        );

        let (stream_tx, stream_rx) = channel::<Result<SubmitEvent, Status>>(128);
        let (events_tx, mut events_rx) = channel::<PipelineEvent>(128);
        let pipeline = self.pipeline.clone();
        let id = submission.id.clone();

        tokio::spawn(async move {
            let forward = async {
                while let Some(event) = events_rx.recv().await {
                    if stream_tx.send(Ok(event_to_grpc(&id, event))).await.is_err() {
                        tracing::debug!(id = %id, "{}", STREAM_TX_ERR);
                    }
                }
            };

            let (outcome, ()) = tokio::join!(pipeline.run(submission, events_tx), forward);
            if let Err(e) = outcome {
                let _ = stream_tx.send(Err(Status::internal(e.to_string()))).await;
            }
        });

        Ok(Response::new(ReceiverStream::new(stream_rx)))
    }
}
