//! Per-slot stream runner.
//!
//! Applies the events of one admitted stream to the store in delivery order
//! and reports how the stream ended back to the controller.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::Handle;
use crate::state::LiveStateStore;
use crate::stream::StreamEvent;

/// How an admitted stream stopped on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SlotSignalKind {
    StreamEnded,
    Disconnected(Option<String>),
}

/// Message from a runner to the controller about the slot it serves.
#[derive(Debug, Clone)]
pub(crate) struct SlotSignal {
    pub handle: Handle,
    pub slot_id: u64,
    pub kind: SlotSignalKind,
}

pub(crate) async fn run_slot(
    handle: Handle,
    slot_id: u64,
    mut events: mpsc::Receiver<StreamEvent>,
    closer: CancellationToken,
    store: Arc<LiveStateStore>,
    signals: mpsc::UnboundedSender<SlotSignal>,
) {
    let kind = loop {
        tokio::select! {
            biased;

            _ = closer.cancelled() => {
                debug!(handle = %handle, slot_id, "Slot closed");
                return;
            }

            event = events.recv() => {
                match event {
                    Some(StreamEvent::StreamEnded) => break SlotSignalKind::StreamEnded,
                    Some(StreamEvent::Disconnected { reason }) => {
                        break SlotSignalKind::Disconnected(reason);
                    }
                    Some(event) => {
                        store.apply_event(&handle, event);
                    }
                    None => break SlotSignalKind::Disconnected(None),
                }
            }
        }
    };

    // The controller may have stopped; nothing left to report to.
    let _ = signals.send(SlotSignal {
        handle,
        slot_id,
        kind,
    });
}
