use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt};
use poolfeed_hub::Delivery;
use poolfeed_protocol::Envelope;

/// Send one delivery as a `{"data": [...]}` text frame.
pub async fn envelope<S>(tx: &mut S, delivery: &Delivery) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
{
    let json = Envelope::from_records(&delivery.records).to_json();
    tx.send(Message::Text(json.into())).await
}
