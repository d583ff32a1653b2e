use std::sync::Arc;

use laura_frame::{Channel, ReassemblyBuffer, ReassemblyConfig};
use laura_transport::Notifications;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::decoder::decode_message;
use crate::dispatch::EventDispatcher;

/// Counters a listener returns when its notification stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerReport {
    pub fragments: u64,
    pub dropped_fragments: u64,
    pub messages: u64,
    pub undecodable: u64,
}

/// Spawn the listener task for one subscribed channel.
///
/// The task owns the channel's reassembly buffer outright, so fragments of
/// one channel are always processed in arrival order by a single writer.
pub fn spawn_listener(
    channel: Channel,
    notifications: Notifications,
    dispatcher: Arc<EventDispatcher>,
    config: ReassemblyConfig,
) -> JoinHandle<ListenerReport> {
    tokio::spawn(run_listener(channel, notifications, dispatcher, config))
}

async fn run_listener(
    channel: Channel,
    mut notifications: Notifications,
    dispatcher: Arc<EventDispatcher>,
    config: ReassemblyConfig,
) -> ListenerReport {
    let mut buffer = ReassemblyBuffer::with_config(config);
    let mut report = ListenerReport::default();

    while let Some(fragment) = notifications.recv().await {
        report.fragments += 1;
        match buffer.push(&fragment) {
            Ok(false) => {}
            Ok(true) => {
                let Some(message) = buffer.take() else {
                    continue;
                };
                report.messages += 1;
                match decode_message(channel, &message) {
                    Some(event) => {
                        let delivered = dispatcher.publish(&event);
                        trace!(channel = %channel, event = event.kind(), delivered, "event published");
                    }
                    None => report.undecodable += 1,
                }
            }
            Err(err) => {
                report.dropped_fragments += 1;
                warn!(channel = %channel, error = %err, "fragment dropped");
            }
        }
    }

    debug!(
        channel = %channel,
        fragments = report.fragments,
        messages = report.messages,
        "notification stream closed"
    );
    report
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::decoder::{DecodedEvent, StatusValue};
    use crate::dispatch::ObserverError;

    fn collecting_dispatcher() -> (Arc<EventDispatcher>, mpsc::UnboundedReceiver<DecodedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(Arc::new(
            move |event: &DecodedEvent| -> Result<(), ObserverError> {
                tx.send(event.clone())?;
                Ok(())
            },
        ));
        (Arc::new(dispatcher), rx)
    }

    #[tokio::test]
    async fn fragmented_status_is_published() {
        let (dispatcher, mut events) = collecting_dispatcher();
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_listener(Channel::Query, rx, dispatcher, ReassemblyConfig::default());

        tx.send(Bytes::from_static(&[0x06, 0x13, 0x00, 0x0A, 0x01]))
            .await
            .expect("listener should be running");
        tx.send(Bytes::from_static(&[0x80, 0x01, 0x55]))
            .await
            .expect("listener should be running");
        drop(tx);

        let event = events.recv().await.expect("snapshot should be published");
        match event {
            DecodedEvent::StatusSnapshot { statuses } => {
                assert_eq!(statuses["recording_status"], StatusValue::Bool(true));
            }
            other => panic!("unexpected event {other:?}"),
        }

        let report = handle.await.expect("listener should not panic");
        assert_eq!(report.fragments, 2);
        assert_eq!(report.messages, 1);
        assert_eq!(report.dropped_fragments, 0);
    }

    #[tokio::test]
    async fn bad_fragments_are_counted_not_fatal() {
        let (dispatcher, mut events) = collecting_dispatcher();
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_listener(Channel::Command, rx, dispatcher, ReassemblyConfig::default());

        for fragment in [
            &[0x81, 0x00][..],
            &[0x62][..],
            &[0x01, 0x01][..],
            &[0x02, 0x01, 0x00][..],
        ] {
            tx.send(Bytes::copy_from_slice(fragment))
                .await
                .expect("listener should be running");
        }
        drop(tx);

        assert!(matches!(
            events.recv().await,
            Some(DecodedEvent::CommandResult { code: 0x01, .. })
        ));
        let report = handle.await.expect("listener should not panic");
        assert_eq!(report.dropped_fragments, 2);
        assert_eq!(report.undecodable, 1);
        assert_eq!(report.messages, 2);
    }
}
