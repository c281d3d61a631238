//! # Vote Pipeline
//!
//! Connects the feed connector to the interpreter and the tally applier:
//! decode the framed payload, classify it, raise operator alerts, apply votes.
//! Store failures are logged and counted here as lost updates; they never
//! reach the connector.

use async_trait::async_trait;

use crate::ingestors::streamloots_sse::LineHandler;
use crate::parsers::alert_payload::AlertPayload;
use crate::parsers::interpreter::{interpret, Interpretation};
use crate::tally::applier::{TallyApplier, TallyUpdate};
use crate::tally::store::TallyStore;

/// Receiver of operator-facing notices raised by the vote pipeline.
pub trait OperatorAlerts: Send + Sync {
    /// A vote alert arrived without the structure needed to extract it.
    fn schema_drift(&self, context: &str);

    /// A subscription alert arrived; `message` is the alert text.
    fn subscription(&self, message: &str);
}

/// What happened to one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Applied(TallyUpdate),
    /// The vote was written but the resort failed.
    AppliedUnsorted { game_id: String },
    Ignored,
    Subscription,
    SchemaDrift,
    /// The vote never reached the store.
    LostUpdate { game_id: String, votes: u32 },
}

/// Running counts of [`LineOutcome`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub applied: u64,
    pub unsorted: u64,
    pub ignored: u64,
    pub subscriptions: u64,
    pub schema_drift: u64,
    pub lost_updates: u64,
}

impl PipelineStats {
    fn record(&mut self, outcome: &LineOutcome) {
        let counter = match outcome {
            LineOutcome::Applied(_) => &mut self.applied,
            LineOutcome::AppliedUnsorted { .. } => &mut self.unsorted,
            LineOutcome::Ignored => &mut self.ignored,
            LineOutcome::Subscription => &mut self.subscriptions,
            LineOutcome::SchemaDrift => &mut self.schema_drift,
            LineOutcome::LostUpdate { .. } => &mut self.lost_updates,
        };
        *counter += 1;
    }
}

/// Handles feed payloads end to end.
pub struct VotePipeline<S, A> {
    applier: TallyApplier<S>,
    alerts: A,
    stats: PipelineStats,
}

impl<S: TallyStore, A: OperatorAlerts> VotePipeline<S, A> {
    pub fn new(applier: TallyApplier<S>, alerts: A) -> Self {
        Self {
            applier,
            alerts,
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn applier(&self) -> &TallyApplier<S> {
        &self.applier
    }

    pub fn alerts(&self) -> &A {
        &self.alerts
    }

    /// Processes one framed payload.
    ///
    /// # Errors
    /// Malformed payloads (bad JSON, unusable vote alerts). Store failures are
    /// not errors here; they come back as [`LineOutcome::LostUpdate`].
    pub async fn process(&mut self, payload: &str) -> anyhow::Result<LineOutcome> {
        let alert = AlertPayload::from_line(payload)?;
        let outcome = match interpret(&alert)? {
            Interpretation::Ignored => LineOutcome::Ignored,
            Interpretation::Subscription(message) => {
                self.alerts.subscription(&message);
                LineOutcome::Subscription
            }
            Interpretation::SchemaDrift(context) => {
                self.alerts.schema_drift(&context);
                LineOutcome::SchemaDrift
            }
            Interpretation::Vote(intent) => match self.applier.apply(&intent).await {
                Ok(update) => LineOutcome::Applied(update),
                Err(err) if !err.is_lost_update() => {
                    log::error!("{err}");
                    LineOutcome::AppliedUnsorted {
                        game_id: intent.game_id,
                    }
                }
                Err(err) => {
                    log::error!(
                        "Failed to update NextList - game id: {}, votes: {}, user: {}. {} Full message: {}",
                        intent.game_id,
                        intent.votes,
                        intent.username,
                        err,
                        payload
                    );
                    LineOutcome::LostUpdate {
                        game_id: intent.game_id,
                        votes: intent.votes,
                    }
                }
            },
        };
        self.stats.record(&outcome);
        Ok(outcome)
    }
}

#[async_trait]
impl<S, A> LineHandler for VotePipeline<S, A>
where
    S: TallyStore,
    A: OperatorAlerts,
{
    async fn handle_line(&mut self, payload: &str) -> anyhow::Result<()> {
        let outcome = self.process(payload).await?;
        log::debug!("Feed message outcome: {outcome:?}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tally::store::MemorySheet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAlerts {
        drift: Mutex<Vec<String>>,
        subscriptions: Mutex<Vec<String>>,
    }

    impl OperatorAlerts for RecordingAlerts {
        fn schema_drift(&self, context: &str) {
            self.drift.lock().unwrap().push(context.to_string());
        }

        fn subscription(&self, message: &str) {
            self.subscriptions.lock().unwrap().push(message.to_string());
        }
    }

    fn pipeline(sheet: MemorySheet) -> VotePipeline<MemorySheet, RecordingAlerts> {
        VotePipeline::new(TallyApplier::new(sheet, "Votes", "Name"), RecordingAlerts::default())
    }

    fn sheet() -> MemorySheet {
        MemorySheet::from_rows(vec![
            vec!["Id", "Name", "Votes"],
            vec!["#003", "Contra", "12"],
            vec!["#007", "GoldenEye", "10"],
        ])
    }

    const VOTE: &str = r##"{"data":{"description":"5 votes next list","redeemFields":[{"label":"Message","value":"go #7 go"}],"fields":[{"name":"username","value":"alice"}]}}"##;

    #[tokio::test]
    async fn applies_vote_alerts() {
        let mut pipeline = pipeline(sheet());
        let outcome = pipeline.process(VOTE).await.unwrap();

        let LineOutcome::Applied(update) = outcome else {
            panic!("expected an applied vote, got {outcome:?}");
        };
        assert_eq!(update.game_id, "#007");
        assert_eq!(update.username, "alice");
        assert_eq!(update.new_total, 15);
        assert_eq!(pipeline.applier().store().rows()[1][0], "#007");
        assert_eq!(pipeline.stats().applied, 1);
    }

    #[tokio::test]
    async fn schema_drift_raises_an_alert_not_an_error() {
        let mut pipeline = pipeline(sheet());
        let outcome = pipeline
            .process(r#"{"data":{"description":"5 votes next list"}}"#)
            .await
            .unwrap();

        assert_eq!(outcome, LineOutcome::SchemaDrift);
        assert_eq!(pipeline.alerts().drift.lock().unwrap().len(), 1);
        assert!(pipeline.applier().store().writes().is_empty());
    }

    #[tokio::test]
    async fn retyped_optional_fields_keep_the_vote() {
        let mut pipeline = pipeline(sheet());
        let line = r##"{"data":{"description":"5 votes next list","redeemFields":[{"label":"Message","value":"go #7 go"}],"fields":{"username":"alice"}}}"##;
        let LineOutcome::Applied(update) = pipeline.process(line).await.unwrap() else {
            panic!("expected an applied vote");
        };
        assert_eq!(update.new_total, 15);
        assert_eq!(update.username, "");
        assert_eq!(pipeline.applier().store().writes().len(), 1);
    }

    #[tokio::test]
    async fn non_list_redeem_fields_are_schema_drift() {
        let mut pipeline = pipeline(sheet());
        let line = r##"{"data":{"description":"5 votes next list","redeemFields":{"Message":"go #7 go"}}}"##;
        assert_eq!(pipeline.process(line).await.unwrap(), LineOutcome::SchemaDrift);
        assert_eq!(pipeline.alerts().drift.lock().unwrap().len(), 1);
        assert!(pipeline.applier().store().writes().is_empty());
    }

    #[tokio::test]
    async fn subscription_alerts_are_surfaced() {
        let mut pipeline = pipeline(sheet());
        let line = r#"{"data":{"message":"new sub!","settings":{"data":{"isSubscriptionAlert":true}}}}"#;
        assert_eq!(pipeline.process(line).await.unwrap(), LineOutcome::Subscription);
        assert_eq!(*pipeline.alerts().subscriptions.lock().unwrap(), vec!["new sub!".to_string()]);
    }

    #[tokio::test]
    async fn store_failures_count_as_lost_updates() {
        let mut pipeline = pipeline(sheet().fail_writes());
        let outcome = pipeline.process(VOTE).await.unwrap();
        assert_eq!(
            outcome,
            LineOutcome::LostUpdate {
                game_id: "#007".to_string(),
                votes: 5
            }
        );

        assert_eq!(pipeline.stats().lost_updates, 1);
    }

    #[tokio::test]
    async fn unknown_game_is_a_lost_update() {
        let mut pipeline = pipeline(sheet());
        let unknown = VOTE.replace("#7", "#99");
        assert!(matches!(
            pipeline.process(&unknown).await.unwrap(),
            LineOutcome::LostUpdate { .. }
        ));
        assert!(pipeline.applier().store().writes().is_empty());
    }

    #[tokio::test]
    async fn malformed_payloads_are_errors() {
        let mut pipeline = pipeline(sheet());
        assert!(pipeline.handle_line("not json").await.is_err());
        let no_message = r##"{"data":{"description":"1 next list","redeemFields":[{"label":"Other","value":"#7"}]}}"##;
        assert!(pipeline.handle_line(no_message).await.is_err());
        assert!(pipeline.handle_line(r#"{"data":{"description":"opened a pack"}}"#).await.is_ok());
        assert_eq!(pipeline.stats().ignored, 1);
    }
}
