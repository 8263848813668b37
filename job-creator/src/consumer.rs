//! AMQP consumer loop: binds to the scheduled-jobs queue, decodes each
//! delivery as a [`JobRequest`], hands it to the [`Dispatcher`], and
//! acknowledges it regardless of outcome.
//!
//! Grounded in `queue_consumer.py::connect_to_broker`/`start_consuming`: a
//! durable direct exchange bound to a durable quorum queue, consumed with a
//! bounded wait per iteration so a heartbeat file can be refreshed even when
//! no message arrives.

use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use jobcontroller_core::model::JobRequest;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Connection, ConnectionProperties, Consumer, ExchangeKind};
use tracing::{error, warn};

use crate::config::CreatorConfig;
use crate::dispatcher::{self, Dispatcher};

const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(5);
const HEARTBEAT_PATH: &str = "/tmp/heartbeat";

/// Connects to the broker described by `config` and declares the exchange,
/// quorum queue, and binding the job creator consumes from.
pub async fn connect(config: &CreatorConfig) -> Result<Consumer, lapin::Error> {
    let uri = format!(
        "amqp://{}:{}@{}",
        config.queue_user, config.queue_password, config.queue_host
    );
    let connection = Connection::connect(&uri, ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;

    channel
        .exchange_declare(
            &config.queue_name,
            ExchangeKind::Direct,
            ExchangeDeclareOptions { durable: true, ..Default::default() },
            FieldTable::default(),
        )
        .await?;

    let mut quorum_args = FieldTable::default();
    quorum_args.insert("x-queue-type".into(), AMQPValue::LongString("quorum".into()));

    channel
        .queue_declare(
            &config.queue_name,
            QueueDeclareOptions { durable: true, ..Default::default() },
            quorum_args,
        )
        .await?;

    channel
        .queue_bind(
            &config.queue_name,
            &config.queue_name,
            &config.queue_name,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    channel
        .basic_consume(
            &config.queue_name,
            "job-creator",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
}

/// Consumes deliveries until the connection closes. Every iteration refreshes
/// the heartbeat file, whether or not a delivery arrived within the
/// inactivity window, so a liveness probe reading it stays accurate.
pub async fn run(mut consumer: Consumer, dispatcher: Dispatcher) {
    loop {
        touch_heartbeat();

        let next = tokio::time::timeout(INACTIVITY_TIMEOUT, consumer.next()).await;
        let delivery = match next {
            Ok(Some(Ok(delivery))) => delivery,
            Ok(Some(Err(error))) => {
                error!(%error, "error reading from the job queue");
                continue;
            }
            Ok(None) => {
                warn!("job queue consumer stream ended, stopping");
                return;
            }
            Err(_timeout) => continue,
        };

        let request = match serde_json::from_slice::<JobRequest>(&delivery.data) {
            Ok(request) => request,
            Err(error) => {
                warn!(%error, "dropping message that does not match any known job type");
                ack(&delivery).await;
                continue;
            }
        };

        if let Err(error) = dispatcher.dispatch(request).await {
            dispatcher::log_and_drop(&error);
        }
        ack(&delivery).await;
    }
}

async fn ack(delivery: &lapin::message::Delivery) {
    if let Err(error) = delivery.ack(BasicAckOptions::default()).await {
        error!(%error, "failed to ack job queue message");
    }
}

fn touch_heartbeat() {
    if let Err(error) = std::fs::write(PathBuf::from(HEARTBEAT_PATH), chrono::Utc::now().to_rfc3339()) {
        warn!(%error, "failed to write heartbeat file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_path_is_a_well_known_location() {
        assert_eq!(HEARTBEAT_PATH, "/tmp/heartbeat");
    }

    #[test]
    fn unroutable_job_type_fails_to_decode_into_job_request() {
        let body = br#"{"job_type": "not-a-real-type"}"#;
        assert!(serde_json::from_slice::<JobRequest>(body).is_err());
    }
}
