//! Per-connection control channel: descriptor handshake, then a loop of
//! request/reply envelopes until the peer disconnects.
//!
//! Grounded on `source/ControlClient.cpp`'s generic read-dispatch-reply
//! connection loop shape; the admin/CDS-specific handler bodies in that
//! file are out of this system's domain and are not used as grounding
//! (spec.md §4.3's action list is authoritative for what a control
//! connection can ask for).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio::sync::watch;
use tokio_util::codec::Framed;

use tkm_protocol::{Envelope, FrameCodec, FrameKind, Message, Recipient};

use crate::dispatcher::DispatcherHandle;
use crate::error::CollectorError;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);

pub async fn handle(
    stream: UnixStream,
    dispatcher: DispatcherHandle,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), CollectorError> {
    let mut framed = Framed::new(stream, FrameCodec::new(FrameKind::DescriptorPadded));

    let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, framed.next()).await;
    match handshake {
        Ok(Some(Ok(Envelope { message: Message::Descriptor { id }, .. }))) => {
            tracing::debug!(peer = %id, "control client identified");
        }
        Ok(Some(Ok(_))) => {
            tracing::warn!("control client sent a non-descriptor frame first");
            return Ok(());
        }
        Ok(Some(Err(err))) => return Err(err.into()),
        Ok(None) => return Ok(()),
        // connection closed before identifying; nothing to report
        Err(_) => {
            tracing::warn!("control client did not complete the descriptor handshake in time");
            return Ok(());
        }
    }

    let mut framed = framed.map_codec(|_| FrameCodec::new(FrameKind::Varint));

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            frame = framed.next() => {
                match frame {
                    Some(Ok(Envelope { message: Message::Request(request), .. })) => {
                        let reply = dispatcher.dispatch(request).await;
                        let envelope = Envelope::new(Recipient::Collector, Recipient::Control, reply);
                        if framed.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {
                        tracing::debug!("ignoring non-request envelope on control channel");
                    }
                    Some(Err(err)) => return Err(err.into()),
                    None => break,
                }
            }
        }
    }
    Ok(())
}
