// Controller Module
// "One quarry at a time"

use chrono::NaiveDateTime;
use std::fmt;
use std::mem;
use tracing::{debug, info, warn};

use crate::api::CampaignBackend;
use crate::campaign::{
    apply, export, export_now, Campaign, CampaignStatus, ExportedFile, StreamingMessage,
};
use crate::channel::{ChannelConnector, ChannelEvent, StreamingChannel};
use crate::error::{KestrelError, KestrelResult};
use crate::log_error;
use crate::query::{validate_query, ValidationError};
use crate::targets::SelectedTargets;

/// Controller state. The channel only exists while running.
pub enum RunState {
    Idle { campaign: Option<Campaign> },
    Running {
        channel: Box<dyn StreamingChannel>,
        campaign: Campaign,
    },
}

impl Default for RunState {
    fn default() -> Self {
        RunState::Idle { campaign: None }
    }
}

impl fmt::Debug for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle { campaign } => f
                .debug_struct("Idle")
                .field("campaign", &campaign.as_ref().map(|c| c.id))
                .finish(),
            RunState::Running { channel, campaign } => f
                .debug_struct("Running")
                .field("campaign", &campaign.id)
                .field("channel_closed", &channel.is_closed())
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
}

/// How the last run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The backend reported `finished`
    Finished,
    /// The user stopped the run
    Stopped,
    /// The channel went away before `finished`; the results may be partial
    Incomplete { reason: String },
}

/// Outcome of handling one channel event
#[derive(Debug)]
pub enum RunEvent {
    Updated,
    Duplicate,
    Finished,
    /// Arrived while idle or for a campaign that is no longer current
    Ignored,
    Incomplete(KestrelError),
}

/// Drives a single query run from `start` to `finished`, `stop` or `reset`.
pub struct QueryRunController<B, C> {
    backend: B,
    connector: C,
    state: RunState,
    completion: Option<Completion>,
}

impl<B, C> QueryRunController<B, C>
where
    B: CampaignBackend,
    C: ChannelConnector,
{
    pub fn new(backend: B, connector: C) -> Self {
        Self {
            backend,
            connector,
            state: RunState::default(),
            completion: None,
        }
    }

    /// Start a new run, replacing any run in flight.
    ///
    /// Validation happens before anything else is touched. Returns the new
    /// campaign id.
    pub async fn start(&mut self, query: &str, selected: SelectedTargets) -> KestrelResult<u64> {
        validate_query(query)?;
        if selected.is_empty() {
            return Err(ValidationError::NoTargetsSelected.into());
        }

        self.discard();

        let mut campaign = match self.backend.create_campaign(query, &selected).await {
            Ok(campaign) => campaign,
            Err(e) => {
                log_error!(e, "Campaign creation rejected");
                return Err(e);
            }
        };

        let channel = match self.connector.open(campaign.id).await {
            Ok(channel) => channel,
            Err(e) => {
                let error = if matches!(e, KestrelError::Channel { .. }) {
                    e
                } else {
                    KestrelError::channel(format!(
                        "failed to open results channel for campaign {}: {e}",
                        campaign.id
                    ))
                };
                log_error!(error, campaign_id = campaign.id, "Results channel unavailable");
                return Err(error);
            }
        };

        campaign.status = CampaignStatus::Running;
        let campaign_id = campaign.id;
        info!(
            campaign_id,
            hosts = selected.hosts.len(),
            labels = selected.labels.len(),
            "Query run started"
        );
        self.state = RunState::Running { channel, campaign };
        Ok(campaign_id)
    }

    /// Stop the run in flight, keeping its results. No-op while idle.
    pub fn stop(&mut self) {
        match mem::take(&mut self.state) {
            RunState::Running {
                mut channel,
                campaign,
            } => {
                channel.close();
                info!(
                    campaign_id = campaign.id,
                    rows = campaign.row_count(),
                    "Query run stopped"
                );
                self.state = RunState::Idle {
                    campaign: Some(campaign),
                };
                self.completion = Some(Completion::Stopped);
            }
            idle => self.state = idle,
        }
    }

    /// Close any channel and drop the current campaign.
    pub fn reset(&mut self) {
        self.discard();
        debug!("Query run controller reset");
    }

    fn discard(&mut self) {
        if let RunState::Running { channel, campaign } = &mut self.state {
            channel.close();
            debug!(campaign_id = campaign.id, "Discarding previous run");
        }
        self.state = RunState::Idle { campaign: None };
        self.completion = None;
    }

    /// Apply one message. Messages are ignored unless a run is in flight for
    /// `campaign_id`.
    pub fn deliver(&mut self, campaign_id: u64, message: StreamingMessage) -> RunEvent {
        let RunState::Running { campaign, .. } = &mut self.state else {
            debug!(campaign_id, "Message arrived while idle; ignoring");
            return RunEvent::Ignored;
        };
        if campaign.id != campaign_id {
            debug!(
                campaign_id,
                current = campaign.id,
                "Message for a replaced campaign; ignoring"
            );
            return RunEvent::Ignored;
        }

        let previous = mem::take(campaign);
        let duplicate = previous.last_message.as_ref() == Some(&message);
        *campaign = apply(previous, &message);

        if duplicate {
            return RunEvent::Duplicate;
        }
        debug!(
            campaign_id,
            rows = message.row_count(),
            total_rows = campaign.row_count(),
            "Applied streaming message"
        );

        if campaign.is_finished() {
            self.finish();
            return RunEvent::Finished;
        }
        RunEvent::Updated
    }

    fn finish(&mut self) {
        if let RunState::Running {
            mut channel,
            campaign,
        } = mem::take(&mut self.state)
        {
            channel.close();
            info!(
                campaign_id = campaign.id,
                summary = %campaign,
                "Query run finished"
            );
            self.state = RunState::Idle {
                campaign: Some(campaign),
            };
            self.completion = Some(Completion::Finished);
        }
    }

    fn abandon(&mut self, reason: String) -> RunEvent {
        match mem::take(&mut self.state) {
            RunState::Running {
                mut channel,
                campaign,
            } => {
                channel.close();
                warn!(
                    campaign_id = campaign.id,
                    rows = campaign.row_count(),
                    %reason,
                    "Results channel ended before the campaign finished"
                );
                self.state = RunState::Idle {
                    campaign: Some(campaign),
                };
                self.completion = Some(Completion::Incomplete {
                    reason: reason.clone(),
                });
                RunEvent::Incomplete(KestrelError::channel(reason))
            }
            idle => {
                self.state = idle;
                RunEvent::Ignored
            }
        }
    }

    /// Wait for the next channel event and apply it. `None` once idle.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        let RunState::Running { channel, campaign } = &mut self.state else {
            return None;
        };
        let campaign_id = campaign.id;

        let received = channel.recv().await;
        let event = match received {
            Some(ChannelEvent::Message(message)) => self.deliver(campaign_id, message),
            Some(ChannelEvent::Failed(reason)) => self.abandon(reason),
            None => self.abandon("channel closed".to_string()),
        };
        Some(event)
    }

    /// Pump events until the run ends.
    pub async fn run_to_completion(&mut self) -> Option<&Completion> {
        while self.next_event().await.is_some() {}
        self.completion.as_ref()
    }

    pub fn state(&self) -> RunPhase {
        match self.state {
            RunState::Idle { .. } => RunPhase::Idle,
            RunState::Running { .. } => RunPhase::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunPhase::Running
    }

    /// The current or most recent campaign
    pub fn campaign(&self) -> Option<&Campaign> {
        match &self.state {
            RunState::Idle { campaign } => campaign.as_ref(),
            RunState::Running { campaign, .. } => Some(campaign),
        }
    }

    pub fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    /// Export the current results, stamped with local time.
    pub fn export(&self, filename_base: &str) -> KestrelResult<ExportedFile> {
        let campaign = self.campaign().ok_or_else(KestrelError::no_active_campaign)?;
        export_now(campaign, filename_base)
    }

    pub fn export_at(
        &self,
        filename_base: &str,
        timestamp: NaiveDateTime,
    ) -> KestrelResult<ExportedFile> {
        let campaign = self.campaign().ok_or_else(KestrelError::no_active_campaign)?;
        export(campaign, filename_base, timestamp)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}
