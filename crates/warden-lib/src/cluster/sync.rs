//! Cluster dispatch and report rounds
//!
//! Receives envelopes from the transport, drops self-originated traffic,
//! and dispatches per kind. Report collection is round-based: a round
//! tracks which peers have answered the outstanding `ReportRequest` and
//! accumulates their snapshots until the aggregator collects them.

use super::protocol::{Envelope, MessageKind, ProtocolError};
use crate::config::ConfigHandle;
use crate::models::OwnerReport;
use crate::observability::{WardenLogger, WardenMetrics};
use crate::store::RuntimeStore;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Opaque peer-messaging capability supplied by the host.
///
/// The underlying transport resets specific-peer addressing on settings
/// and override traffic, so those are broadcast and filtered on receive.
/// Inbound delivery happens by the host calling
/// [`ClusterSync::handle_inbound`].
pub trait ClusterTransport: Send + Sync {
    fn send_to(&self, node_id: u64, payload: Vec<u8>);
    fn broadcast(&self, payload: Vec<u8>);
    /// Known peer nodes, excluding this one
    fn peers(&self) -> Vec<u64>;
}

/// Transport for a node without peers; every send is dropped
#[derive(Debug, Default)]
pub struct LoopbackTransport;

impl ClusterTransport for LoopbackTransport {
    fn send_to(&self, _node_id: u64, _payload: Vec<u8>) {}

    fn broadcast(&self, _payload: Vec<u8>) {}

    fn peers(&self) -> Vec<u64> {
        Vec::new()
    }
}

/// Peer responses collected for one in-flight report request
struct ResponseRound {
    started: Instant,
    responded: HashSet<u64>,
    reports: Vec<OwnerReport>,
}

impl ResponseRound {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            responded: HashSet::new(),
            reports: Vec::new(),
        }
    }
}

/// Per-node endpoint of the cluster sync protocol
pub struct ClusterSync {
    config: Arc<ConfigHandle>,
    store: Arc<RuntimeStore>,
    transport: Arc<dyn ClusterTransport>,
    round: Mutex<Option<ResponseRound>>,
    metrics: WardenMetrics,
    logger: WardenLogger,
}

impl ClusterSync {
    pub fn new(
        config: Arc<ConfigHandle>,
        store: Arc<RuntimeStore>,
        transport: Arc<dyn ClusterTransport>,
        metrics: WardenMetrics,
        logger: WardenLogger,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            round: Mutex::new(None),
            metrics,
            logger,
        }
    }

    pub fn node_id(&self) -> u64 {
        self.config.snapshot().node_id
    }

    pub fn peer_count(&self) -> usize {
        self.transport.peers().len()
    }

    /// Entry point for every inbound transport payload.
    ///
    /// Malformed traffic is logged and dropped; a failure never crosses
    /// this boundary.
    pub fn handle_inbound(&self, bytes: &[u8]) {
        let envelope = match Envelope::decode(bytes) {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, "Discarding malformed cluster payload");
                self.metrics.inc_cluster_discarded();
                return;
            }
        };

        if envelope.from_node == self.node_id() {
            debug!("Ignoring self-originated cluster message");
            self.metrics.inc_cluster_discarded();
            return;
        }

        self.metrics.inc_cluster_message(envelope.kind.key());

        let result = match envelope.kind {
            MessageKind::SettingsPush => self.on_settings_push(&envelope),
            MessageKind::PrivilegedOwnerPush => self.on_override_push(&envelope),
            MessageKind::ReportRequest => self.on_report_request(&envelope),
            MessageKind::ReportResponse => self.on_report_response(&envelope),
        };

        if let Err(e) = result {
            warn!(
                kind = envelope.kind.key(),
                from_node = envelope.from_node,
                error = %e,
                "Discarding cluster message"
            );
            self.metrics.inc_cluster_discarded();
        }
    }

    fn on_settings_push(&self, envelope: &Envelope) -> Result<(), ProtocolError> {
        if !self.config.snapshot().accept_pushed_settings {
            self.logger.log_push_rejected(envelope.from_node, "settings");
            return Ok(());
        }
        let pushed: crate::config::WardenConfig = envelope.payload_as()?;
        self.config.replace(pushed);
        self.logger.log_settings_applied(envelope.from_node);
        Ok(())
    }

    fn on_override_push(&self, envelope: &Envelope) -> Result<(), ProtocolError> {
        let record: crate::config::PrivilegedOverride = envelope.payload_as()?;
        if record.owner_id == 0 {
            debug!("Dropping override push with sentinel owner id");
            return Ok(());
        }
        if !self.config.snapshot().accept_pushed_overrides {
            self.logger
                .log_push_rejected(envelope.from_node, "privileged override");
            return Ok(());
        }
        debug!(
            owner_id = record.owner_id,
            from_node = envelope.from_node,
            "Applying pushed privileged override"
        );
        self.config.upsert_override(record);
        Ok(())
    }

    fn on_report_request(&self, envelope: &Envelope) -> Result<(), ProtocolError> {
        let node_id = self.node_id();
        let reports = self.store.snapshot_owners(node_id, &self.config);
        let response = Envelope::report_response(node_id, &reports)?;
        self.transport
            .send_to(envelope.from_node, response.encode()?);
        Ok(())
    }

    fn on_report_response(&self, envelope: &Envelope) -> Result<(), ProtocolError> {
        let reports: Vec<OwnerReport> = envelope.payload_as()?;
        let mut guard = self.round.lock().expect("round lock");
        match guard.as_mut() {
            Some(round) => {
                round.reports.extend(reports);
                round.responded.insert(envelope.from_node);
            }
            None => {
                debug!(
                    from_node = envelope.from_node,
                    "Report response with no round in flight"
                );
            }
        }
        Ok(())
    }

    /// Broadcast the current configuration to all peers
    pub fn push_settings(&self) -> Result<(), ProtocolError> {
        let cfg = self.config.snapshot();
        let envelope = Envelope::settings_push(cfg.node_id, &cfg)?;
        self.transport.broadcast(envelope.encode()?);
        Ok(())
    }

    /// Broadcast one privileged override to all peers. Returns false when
    /// the owner has no override.
    pub fn push_override(&self, owner_id: u64) -> Result<bool, ProtocolError> {
        let Some(record) = self.config.override_for(owner_id) else {
            return Ok(false);
        };
        let envelope = Envelope::override_push(self.node_id(), &record)?;
        self.transport.broadcast(envelope.encode()?);
        Ok(true)
    }

    /// Open a fresh response round, dropping any stale one
    pub fn begin_round(&self) {
        *self.round.lock().expect("round lock") = Some(ResponseRound::new());
    }

    /// Ask every known peer for its snapshot
    pub fn request_reports(&self) -> Result<(), ProtocolError> {
        let request = Envelope::report_request(self.node_id());
        let bytes = request.encode()?;
        for peer in self.transport.peers() {
            self.transport.send_to(peer, bytes.clone());
        }
        Ok(())
    }

    /// Peers that have answered the in-flight round so far
    pub fn round_responded(&self) -> usize {
        self.round
            .lock()
            .expect("round lock")
            .as_ref()
            .map(|r| r.responded.len())
            .unwrap_or(0)
    }

    /// Close the round and take everything it accumulated
    pub fn finish_round(&self) -> (Vec<OwnerReport>, usize) {
        match self.round.lock().expect("round lock").take() {
            Some(round) => (round.reports, round.responded.len()),
            None => (Vec::new(), 0),
        }
    }

    /// Drop a round nobody collected; driven by the maintenance timer
    pub fn purge_stale_round(&self, max_age: Duration) {
        let mut guard = self.round.lock().expect("round lock");
        if let Some(round) = guard.as_ref() {
            if round.started.elapsed() > max_age {
                debug!("Purging stale report round");
                *guard = None;
            }
        }
    }
}
