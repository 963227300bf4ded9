use crate::stages::StageHandler;
use errors::TransportError;
use hcp_core::MessageConsumer;
use std::convert::Infallible;
use tracing::{debug, info};

/// Receive, handle, settle, forever.
///
/// Every delivery gets exactly one disposition before the next receive.
/// The loop only ends on a broker failure; a failed downstream publish
/// leaves the current delivery unsettled so the broker hands it out again.
pub async fn run_consumer(
    mut consumer: Box<dyn MessageConsumer>,
    handler: &dyn StageHandler
) -> Result<Infallible, TransportError> {
    info!(queue = %consumer.queue(), worker = handler.name(), "Waiting for messages");

    loop {
        let delivery = consumer.receive().await?;
        debug!(
            tag = %delivery.tag,
            redelivered = delivery.redelivered,
            body = %String::from_utf8_lossy(&delivery.body),
            "Message received"
        );

        let disposition = handler.handle(&delivery.body).await?;
        consumer.settle(delivery.tag, disposition).await?;

        metrics::counter!(
            "hcp_sync_messages_total",
            "stage" => handler.name(),
            "outcome" => disposition.label()
        )
        .increment(1);
    }
}
