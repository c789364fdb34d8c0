//! Folds streaming messages into a campaign's running state.

use tracing::debug;

use super::{Campaign, CampaignStatus, StreamingMessage};

/// Apply one message to `campaign` and return the updated campaign.
///
/// A message equal to the previously applied one is a no-op. Rows are only
/// ever appended in arrival order, neither `hosts_count.total` nor the status
/// ever moves backwards, and a finished campaign is returned untouched.
pub fn apply(mut campaign: Campaign, message: &StreamingMessage) -> Campaign {
    if campaign.is_finished() {
        return campaign;
    }

    if campaign.last_message.as_ref() == Some(message) {
        debug!(campaign_id = campaign.id, "Skipping duplicate streaming message");
        return campaign;
    }

    match message {
        StreamingMessage::Batch {
            hosts_count,
            query_results,
        } => {
            campaign.query_results.extend(query_results.iter().cloned());
            if let Some(hosts_count) = hosts_count {
                let total = hosts_count.total.max(campaign.hosts_count.total);
                campaign.hosts_count = *hosts_count;
                campaign.hosts_count.total = total;
            }
            mark_running(&mut campaign);
        }
        StreamingMessage::HostResult { rows, error, .. } => {
            campaign.query_results.extend(rows.iter().cloned());
            match error {
                Some(error) => {
                    campaign.hosts_count.failed += 1;
                    campaign.errors.push(error.clone());
                }
                None => campaign.hosts_count.successful += 1,
            }
            let responded = campaign.hosts_count.responded();
            if responded > campaign.hosts_count.total {
                campaign.hosts_count.total = responded;
            }
            mark_running(&mut campaign);
        }
        StreamingMessage::Totals(totals) => {
            campaign.totals = Some(*totals);
            campaign.hosts_count.total = campaign.hosts_count.total.max(totals.count);
            mark_running(&mut campaign);
        }
        StreamingMessage::Status(status) => {
            campaign.status = campaign.status.max(*status);
        }
        StreamingMessage::Error(error) => {
            campaign.errors.push(error.clone());
        }
    }

    if !message.is_terminal() {
        campaign.last_message = Some(message.clone());
    }

    campaign
}

fn mark_running(campaign: &mut Campaign) {
    if campaign.status == CampaignStatus::Pending {
        campaign.status = CampaignStatus::Running;
    }
}
