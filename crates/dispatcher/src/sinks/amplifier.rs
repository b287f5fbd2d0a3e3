//! AmplifierSink - forwards triggers to the recording amplifier

use std::time::Instant;

use amplifier::{AmplifierError, AmplifierLink, SyncReport};
use contracts::{AmplifierConfig, ContractError, TriggerEvent, TriggerSink};
use tracing::{info, instrument};

/// Sink owning the amplifier link
///
/// Connecting also synchronizes the clocks, so every trigger this sink sends
/// is relative to a fresh sync epoch.
pub struct AmplifierSink {
    name: String,
    link: AmplifierLink,
    last_sync: SyncReport,
}

impl AmplifierSink {
    /// Connect, handshake, and synchronize
    #[instrument(name = "amplifier_sink_connect", skip(config), fields(address = %config.address()))]
    pub async fn connect(config: &AmplifierConfig) -> Result<Self, AmplifierError> {
        let mut link = AmplifierLink::connect(config).await?;
        let last_sync = link.synch().await?;

        info!(
            diff_ms = last_sync.diff_ms(),
            rounds = last_sync.rounds,
            "time difference between amplifier and local clock: {} ms",
            last_sync.diff_ms()
        );

        Ok(Self {
            name: "amplifier".to_string(),
            link,
            last_sync,
        })
    }

    /// Result of the most recent synchronization
    pub fn last_sync(&self) -> SyncReport {
        self.last_sync
    }

    /// Re-run clock synchronization; moves the sync epoch
    pub async fn resync(&mut self) -> Result<SyncReport, AmplifierError> {
        self.last_sync = self.link.synch().await?;
        Ok(self.last_sync)
    }

    /// Zero-reference of the timestamps this sink sends
    pub fn sync_epoch(&self) -> Instant {
        self.link.sync_epoch()
    }
}

impl TriggerSink for AmplifierSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn trigger(&mut self, event: TriggerEvent) -> Result<(), ContractError> {
        let ts_ms = self
            .link
            .trigger(i32::from(event.code), event.timestamp)
            .await?;
        info!(code = event.code, ts_ms, "Trigger {} sent at {} ms", event.code, ts_ms);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.link.close().await?;
        Ok(())
    }
}
