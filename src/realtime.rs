use rocket::response::stream::{Event, EventStream};
use rocket::State;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct Broadcaster {
	inner: Arc<broadcast::Sender<serde_json::Value>>,
}

impl Broadcaster {
	pub fn new() -> Self {
		let (tx, _rx) = broadcast::channel(1024);
		Self { inner: Arc::new(tx) }
	}

	pub fn publish(&self, payload: serde_json::Value) {
		// no subscribers is fine
		let _ = self.inner.send(payload);
	}

	pub fn subscribe(&self) -> broadcast::Receiver<serde_json::Value> {
		self.inner.subscribe()
	}
}

#[get("/prices/stream")]
pub async fn price_stream(bc: &State<Broadcaster>) -> EventStream![] {
	let mut rx = bc.subscribe();
	EventStream! {
		loop {
			match rx.recv().await {
				Ok(msg) => yield Event::json(&msg),
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					tracing::debug!(skipped, "price stream subscriber lagged");
				}
				Err(broadcast::error::RecvError::Closed) => break,
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn subscribers_receive_published_payloads() {
		let bc = Broadcaster::new();
		let mut rx = bc.subscribe();
		bc.publish(serde_json::json!({"type": "price_tick"}));
		let got = rx.recv().await.unwrap();
		assert_eq!(got["type"], "price_tick");
	}
}
