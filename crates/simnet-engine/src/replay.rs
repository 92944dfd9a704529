//! Background reader that drains the journal into a topology view.

use std::sync::Arc;
use std::time::Duration;

use simnet_core::view::TopologyView;
use simnet_events::{Journal, JournalError};
use tracing::{debug, info, warn};

/// Read the journal until it closes, applying every entry to a fresh view.
///
/// Each round waits up to `wait` for at least one unread entry. A timeout
/// just starts the next round; the loop ends once the journal has closed
/// and every remaining entry has been read.
pub async fn replay(journal: Arc<Journal>, wait: Duration) -> TopologyView {
    let mut view = TopologyView::new();
    loop {
        match journal.wait_entries_timeout(1, wait).await {
            Ok(()) => match journal.read(|ev| view.apply(ev)) {
                Ok(read) => debug!(read, cursor = journal.cursor(), "Journal drained"),
                Err(e) => {
                    warn!(error = %e, "Journal read failed, stopping replay");
                    break;
                }
            },
            Err(JournalError::Timeout { timeout_ms, .. }) => {
                debug!(timeout_ms, "No new journal entries");
            }
            Err(JournalError::Closed { .. }) => break,
            Err(e) => {
                warn!(error = %e, "Journal wait failed, stopping replay");
                break;
            }
        }
    }
    info!(
        applied = view.applied(),
        redundant = view.redundant(),
        nodes = view.node_count(),
        conns = view.conn_count(),
        "Journal replay finished"
    );
    view
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use simnet_core::driver::{ToggleTopology, TopologyDriver};
    use simnet_events::{EventMux, JournalConfig};
    use simnet_types::EventType;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn replays_until_closed() {
        let mux = EventMux::new();
        let journal = Journal::new(&mux, &EventType::ALL, JournalConfig::default()).unwrap();
        let reader = tokio::spawn(replay(Arc::clone(&journal), Duration::from_millis(50)));

        let mut driver = ToggleTopology::from_rng(&mut StdRng::seed_from_u64(8));
        for tick in 0..4 {
            driver.step(tick, &mux).unwrap();
            tokio::time::sleep(Duration::from_millis(120)).await;
        }
        journal.close();

        let view = reader.await.unwrap();
        assert_eq!(view.applied(), 3);
        assert_eq!(view.node_count(), 2);
        assert!(view.is_conn_on(&driver.conn()));
        assert_eq!(journal.new_entries(), 0);
    }
}
