//! Carrier media-stream WebSocket

use super::webhook_handler::AppState;
use crate::application::CallOrchestrator;
use crate::infrastructure::carrier::{CarrierFrame, OutboundFrame};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::SplitStream;
use futures::{future, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, info, warn};

pub async fn media_stream_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let orchestrator = state.orchestrator.clone();
    ws.on_upgrade(move |socket| handle_media_stream(socket, orchestrator))
}

async fn handle_media_stream(socket: WebSocket, orchestrator: Arc<CallOrchestrator>) {
    let (mut sender, receiver) = socket.split();
    let mut frames = carrier_frames(receiver);

    let start = loop {
        match frames.next().await {
            Some(CarrierFrame::Start(start)) => break start,
            Some(other) => debug!("Media stream frame before start: {:?}", other),
            None => {
                debug!("Media stream closed before start");
                return;
            }
        }
    };
    info!("Media stream {} started", start.stream_sid);

    let (out_tx, mut out_rx) = unbounded_channel::<OutboundFrame>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if sender.send(Message::Text(frame.to_json())).await.is_err() {
                debug!("Carrier media socket closed");
                break;
            }
        }
        let _ = sender.close().await;
    });

    let stream_sid = start.stream_sid.clone();
    match orchestrator.run_media_stream(start, frames, out_tx).await {
        Ok(exit) => info!("Media stream {} ended: {}", stream_sid, exit.as_str()),
        Err(e) => warn!("Media stream {} aborted: {}", stream_sid, e),
    }

    if let Err(e) = writer.await {
        warn!("Media stream writer for {} died: {}", stream_sid, e);
    }
}

/// Parsed carrier frames until the socket closes; non-text and non-JSON
/// frames are dropped
fn carrier_frames(
    receiver: SplitStream<WebSocket>,
) -> Pin<Box<dyn Stream<Item = CarrierFrame> + Send>> {
    Box::pin(
        receiver
            .take_while(|message| {
                future::ready(matches!(message, Ok(m) if !matches!(m, Message::Close(_))))
            })
            .filter_map(|message| {
                future::ready(match message {
                    Ok(Message::Text(text)) => match CarrierFrame::parse(&text) {
                        Ok(frame) => Some(frame),
                        Err(e) => {
                            debug!("Skipping non-JSON media frame: {}", e);
                            None
                        }
                    },
                    _ => None,
                })
            }),
    )
}
