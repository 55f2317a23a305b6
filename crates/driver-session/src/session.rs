use std::sync::Arc;
use std::time::Duration;

use geo_index::GeoIndex;
use ride_types::Coordinate;
use session_task::{ChildTask, ShutdownSignal};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::frame::{parse_client_frame, ClientFrame, FrameError, ServerFrame};
use crate::transport::{FrameReader, FrameWriter};

const QUEUE_CAPACITY: usize = 256;

/// Default per-call deadline for a GeoIndex call made on behalf of one inbound frame.
pub const DEFAULT_CALL_DEADLINE: Duration = Duration::from_secs(5);

/// Runs one authenticated driver's connection to completion.
///
/// Two bounded queues (`in`, `out`, 256 slots each) decouple three cooperating activities: a
/// reader draining the socket into `in`, a writer draining `out` to the socket, and this function,
/// the dispatcher, which drains `in` strictly in arrival order. A session belongs to exactly one
/// authenticated driver, so in-order dispatch here already *is* the per-driver single-slot
/// pipeline the ordering guarantee calls for: there is no second driver whose frames could ever
/// interleave with this one's GeoIndex calls, so no separate keyed-dispatch machinery is needed.
pub async fn run_session(
    driver_id: i64,
    reader: Box<dyn FrameReader>,
    writer: Box<dyn FrameWriter>,
    geo: Arc<dyn GeoIndex>,
    mut shutdown_signal: ShutdownSignal,
    call_deadline: Duration,
) -> anyhow::Result<()> {
    let (in_tx, mut in_rx) = mpsc::channel::<String>(QUEUE_CAPACITY);
    let (out_tx, out_rx) = mpsc::channel::<ServerFrame>(QUEUE_CAPACITY);

    let reader_task = ChildTask::spawn(run_reader(driver_id, reader, in_tx));
    let writer_task = ChildTask::spawn(run_writer(driver_id, writer, out_rx));

    loop {
        tokio::select! {
            _ = shutdown_signal.wait() => {
                info!(driver_id, "driver session shutting down");
                break;
            }
            maybe_text = in_rx.recv() => {
                match maybe_text {
                    Some(text) => {
                        if !handle_frame(driver_id, &text, geo.as_ref(), &out_tx, call_deadline).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    geo.remove(driver_id).await.ok();
    drop(out_tx);
    reader_task.abort();
    let _ = writer_task.join().await;

    Ok(())
}

async fn run_reader(driver_id: i64, mut reader: Box<dyn FrameReader>, in_tx: mpsc::Sender<String>) {
    loop {
        match reader.recv().await {
            Some(Ok(text)) => {
                if in_tx.send(text).await.is_err() {
                    break;
                }
            }
            Some(Err(err)) => {
                warn!(driver_id, error = %err, "session read failed, ending session");
                break;
            }
            None => break,
        }
    }
}

async fn run_writer(driver_id: i64, mut writer: Box<dyn FrameWriter>, mut out_rx: mpsc::Receiver<ServerFrame>) {
    while let Some(frame) = out_rx.recv().await {
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(err) => {
                warn!(driver_id, error = %err, "failed to encode outbound frame");
                continue;
            }
        };
        if let Err(err) = writer.send(text).await {
            warn!(driver_id, error = %err, "session write failed");
            break;
        }
    }
}

/// Handles one inbound frame. Returns `false` when the session should end.
async fn handle_frame(
    driver_id: i64,
    text: &str,
    geo: &dyn GeoIndex,
    out_tx: &mpsc::Sender<ServerFrame>,
    call_deadline: Duration,
) -> bool {
    let frame = match parse_client_frame(text) {
        Ok(frame) => frame,
        Err(FrameError::Malformed(err)) => {
            warn!(driver_id, error = %err, "dropping malformed frame");
            return true;
        }
        Err(FrameError::Unknown(ty)) => {
            warn!(driver_id, frame_type = %ty, "dropping unrecognized frame type");
            return true;
        }
    };

    match frame {
        ClientFrame::DriverHello => {
            let _ = out_tx.send(ServerFrame::DriverHello).await;
            true
        }
        ClientFrame::DriverLocation { lat, lon } => {
            let position = Coordinate::new(lat, lon);
            match timeout(call_deadline, geo.save(driver_id, position)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => send_error(out_tx, "driver_location", 500, err.to_string()).await,
                Err(_) => send_error(out_tx, "driver_location", 500, "geo index call timed out".to_owned()).await,
            }
            true
        }
        ClientFrame::DriverGoodbye => {
            match timeout(call_deadline, geo.remove(driver_id)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => send_error(out_tx, "driver_goodbye", 500, err.to_string()).await,
                Err(_) => send_error(out_tx, "driver_goodbye", 500, "geo index call timed out".to_owned()).await,
            }
            false
        }
        ClientFrame::DriverRequest { pickup_lat, pickup_lng, drop_lat, drop_lng } => {
            info!(driver_id, pickup_lat, pickup_lng, drop_lat, drop_lng, "driver_request observed");
            true
        }
    }
}

async fn send_error(out_tx: &mpsc::Sender<ServerFrame>, original_message_type: &str, code: u16, reason: String) {
    let _ = out_tx
        .send(ServerFrame::DriverError {
            original_message_type: original_message_type.to_owned(),
            code,
            reason,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use geo_index::InMemoryGeoIndex;
    use std::sync::Mutex as StdMutex;

    struct ScriptedReader {
        lines: std::vec::IntoIter<String>,
    }

    #[async_trait]
    impl FrameReader for ScriptedReader {
        async fn recv(&mut self) -> Option<Result<String, crate::transport::TransportError>> {
            self.lines.next().map(Ok)
        }
    }

    struct CapturingWriter {
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl FrameWriter for CapturingWriter {
        async fn send(&mut self, text: String) -> Result<(), crate::transport::TransportError> {
            self.sent.lock().unwrap().push(text);
            Ok(())
        }
    }

    #[tokio::test]
    async fn location_update_saves_into_geo_index_and_goodbye_removes_it() {
        let geo: Arc<dyn GeoIndex> = Arc::new(InMemoryGeoIndex::new());
        let sent = Arc::new(StdMutex::new(Vec::new()));

        let reader = Box::new(ScriptedReader {
            lines: vec![
                r#"{"type":"driver_hello"}"#.to_owned(),
                r#"{"type":"driver_location","lat":1.0,"lon":2.0}"#.to_owned(),
                r#"{"type":"driver_goodbye"}"#.to_owned(),
            ]
            .into_iter(),
        });
        let writer = Box::new(CapturingWriter { sent: sent.clone() });

        let (_handle, signal) = session_task::ShutdownHandle::new();
        run_session(7, reader, writer, geo.clone(), signal, Duration::from_secs(1))
            .await
            .expect("session runs to completion");

        assert_eq!(geo.nearby(Coordinate::new(1.0, 2.0), 0.01).await.unwrap(), Vec::<i64>::new());
        assert!(sent.lock().unwrap().iter().any(|frame| frame.contains("driver_hello")));
    }
}
