//! # Build Dispatch Queue
//!
//! Routes build requests and responses to the queue pair of their data
//! standard. Delivery is at-least-once, as provided by the backing service.

use super::errors::MessagingResult;
use super::message::{BuildRequest, BuildResponse, QueueMessage};
use super::service::{MessageId, MessagingService};
use crate::config::QueuesConfig;
use crate::logging::log_queue_operation;
use crate::models::DataStandard;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct BuildDispatchQueue {
    service: Arc<dyn MessagingService>,
    queues: QueuesConfig,
}

impl BuildDispatchQueue {
    pub fn new(service: Arc<dyn MessagingService>, queues: QueuesConfig) -> Self {
        Self { service, queues }
    }

    pub fn service(&self) -> &Arc<dyn MessagingService> {
        &self.service
    }

    pub fn request_queue(&self, data_standard: DataStandard) -> String {
        self.queues.request_queue(data_standard)
    }

    pub fn response_queue(&self, data_standard: DataStandard) -> String {
        self.queues.response_queue(data_standard)
    }

    /// Create the request and response queue of every data standard
    pub async fn ensure_queues(&self) -> MessagingResult<()> {
        for data_standard in DataStandard::ALL {
            self.service
                .ensure_queue(&self.request_queue(data_standard))
                .await?;
            self.service
                .ensure_queue(&self.response_queue(data_standard))
                .await?;
        }
        Ok(())
    }

    #[instrument(skip(self, request), fields(job_id = %request.job_id, data_standard = %request.data_standard))]
    pub async fn enqueue_request(&self, request: &BuildRequest) -> MessagingResult<MessageId> {
        let queue = self.request_queue(request.data_standard);
        self.enqueue(&queue, request, request.job_id.as_str()).await
    }

    #[instrument(skip(self, response), fields(job_id = %response.job_id, data_standard = %response.data_standard))]
    pub async fn enqueue_response(&self, response: &BuildResponse) -> MessagingResult<MessageId> {
        let queue = self.response_queue(response.data_standard);
        self.enqueue(&queue, response, response.job_id.as_str()).await
    }

    /// Serialize and send any queue message to a named queue
    pub async fn enqueue<M: QueueMessage>(
        &self,
        queue: &str,
        message: &M,
        job_id: &str,
    ) -> MessagingResult<MessageId> {
        let payload = message.to_bytes()?;
        let message_id = self.service.send(queue, payload).await?;
        log_queue_operation(
            "enqueue",
            queue,
            Some(job_id),
            "sent",
            Some(&format!("message_id={message_id}")),
        );
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryMessagingService;
    use crate::models::{BatchId, JobId};
    use chrono::Utc;

    fn request(data_standard: DataStandard) -> BuildRequest {
        BuildRequest {
            job_id: JobId::new("J1").unwrap(),
            data_standard,
            timestamp: Utc::now(),
            batch_id: BatchId::none(),
            products: vec!["101GB001".to_string()],
            filter: None,
            correlation_id: "corr-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_requests_route_to_their_standard() {
        let service = Arc::new(InMemoryMessagingService::new());
        let dispatch = BuildDispatchQueue::new(service.clone(), QueuesConfig::default());
        dispatch.ensure_queues().await.unwrap();

        dispatch.enqueue_request(&request(DataStandard::S57)).await.unwrap();

        assert_eq!(service.queue_length("s57-build-requests").await.unwrap(), 1);
        assert_eq!(service.queue_length("s100-build-requests").await.unwrap(), 0);
        assert_eq!(service.queue_length("s57-build-responses").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_response_goes_to_response_queue() {
        let service = Arc::new(InMemoryMessagingService::new());
        let dispatch = BuildDispatchQueue::new(service.clone(), QueuesConfig::default());
        dispatch.ensure_queues().await.unwrap();

        let response = BuildResponse::success(&request(DataStandard::S63), BatchId::new("B1").unwrap());
        dispatch.enqueue_response(&response).await.unwrap();

        let received = service.peek("s63-build-responses", 10).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(BuildResponse::from_bytes(&received[0].payload).unwrap(), response);
    }

    #[tokio::test]
    async fn test_enqueue_without_queues_fails() {
        let dispatch = BuildDispatchQueue::new(
            Arc::new(InMemoryMessagingService::new()),
            QueuesConfig::default(),
        );
        assert!(dispatch.enqueue_request(&request(DataStandard::S100)).await.is_err());
    }
}
