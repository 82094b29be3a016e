//! In-memory transport for unit tests.

use crate::network::{Transport, TransportFailure, TransportRequest, TransportResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One scripted outcome.
pub(crate) enum Step {
    Reply(Result<TransportResponse, TransportFailure>),
    /// Reply after a delay, so tests can cancel mid-call.
    Delayed(Duration, Result<TransportResponse, TransportFailure>),
}

/// Replays queued outcomes in order and records every request.
///
/// When the queue runs dry the fallback outcome (if any) is repeated;
/// without a fallback the transport answers 599.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    fallback: Mutex<Option<Result<TransportResponse, TransportFailure>>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: Result<TransportResponse, TransportFailure>) -> &Self {
        self.steps.lock().unwrap().push_back(Step::Reply(outcome));
        self
    }

    pub fn push_json(&self, status: u16, body: serde_json::Value) -> &Self {
        self.push(Ok(TransportResponse::json_body(status, &body)))
    }

    pub fn push_delayed(&self, delay: Duration, outcome: Result<TransportResponse, TransportFailure>) -> &Self {
        self.steps.lock().unwrap().push_back(Step::Delayed(delay, outcome));
        self
    }

    pub fn always(&self, outcome: Result<TransportResponse, TransportFailure>) -> &Self {
        *self.fallback.lock().unwrap() = Some(outcome);
        self
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportFailure> {
        self.requests.lock().unwrap().push(request);

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(outcome)) => outcome,
            Some(Step::Delayed(delay, outcome)) => {
                tokio::time::sleep(delay).await;
                outcome
            }
            None => self
                .fallback
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok(TransportResponse::new(599))),
        }
    }
}
