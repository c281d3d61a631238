//! # Alert Interpreter
//!
//! Classifies a decoded [`AlertPayload`] and extracts NextList vote intents.
//!
//! Interpretation is pure: the same payload always yields the same
//! [`Interpretation`]. Side effects (operator alerts, store writes) belong to the
//! caller, which branches on the returned tag.

use super::alert_payload::{AlertPayload, InterpretError};

/// Trigger phrase, compared after removing whitespace and lowercasing.
const TRIGGER: &str = "nextlist";
/// Redeem field holding the viewer's free text with the `#id` in it.
const MESSAGE_LABEL: &str = "Message";
/// Digits in a canonical game id.
const GAME_ID_WIDTH: usize = 3;

/// A parsed instruction to add `votes` to the tally of `game_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VoteIntent {
    /// Canonical `#NNN` form.
    pub game_id: String,
    pub votes: u32,
    /// Redeeming viewer, possibly empty.
    pub username: String,
}

/// Outcome of interpreting one alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpretation {
    /// A NextList vote.
    Vote(VoteIntent),
    /// A subscription alert; carries the alert's `message` text.
    Subscription(String),
    /// Looked like a vote but the structure it needs is gone upstream.
    SchemaDrift(String),
    /// Nothing to do.
    Ignored,
}

/// Interprets one alert payload.
///
/// # Errors
/// Returns [`InterpretError`] for malformed vote alerts: no `Message` redeem
/// field, or a vote count that does not fit in a `u32`.
pub fn interpret(payload: &AlertPayload) -> Result<Interpretation, InterpretError> {
    let Some(description) = payload.description.as_deref() else {
        if payload.is_subscription_alert() {
            return Ok(Interpretation::Subscription(
                payload.message.clone().unwrap_or_default(),
            ));
        }
        return Ok(Interpretation::Ignored);
    };

    if !is_vote_description(description) {
        return Ok(Interpretation::Ignored);
    }

    let redeems = match payload.redeem_fields.as_deref() {
        Some(redeems) if !redeems.is_empty() => redeems,
        _ => {
            return Ok(Interpretation::SchemaDrift(format!(
                "NextList vote alert without redeemFields, description: {description:?}"
            )));
        }
    };

    let message = redeems
        .iter()
        .find(|field| field.label.as_deref() == Some(MESSAGE_LABEL))
        .ok_or(InterpretError::MissingMessageField)?;
    let raw_game_id = message
        .value
        .as_deref()
        .unwrap_or_default()
        .split(' ')
        .find(|token| token.starts_with('#'))
        .unwrap_or_default();

    Ok(Interpretation::Vote(VoteIntent {
        game_id: canonical_game_id(raw_game_id),
        votes: leading_vote_count(description)?,
        username: payload.username(),
    }))
}

/// Whether a description carries the NextList trigger phrase, ignoring case and
/// whitespace ("Next List", "NEXTLIST", "next  list").
pub fn is_vote_description(description: &str) -> bool {
    let squashed: String = description
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    squashed.contains(TRIGGER)
}

/// Vote count from the first whitespace-delimited token of the description,
/// keeping only its digits. No digits means zero votes.
fn leading_vote_count(description: &str) -> Result<u32, InterpretError> {
    let digits: String = description
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return Ok(0);
    }
    digits.parse().map_err(|_| InterpretError::VoteOverflow(digits))
}

/// Canonical `#NNN` form: drop a leading `#`, left-pad with zeros to three
/// characters, prefix `#` again.
///
/// Longer ids are kept whole (`#1234` stays `#1234`) and non-numeric ids are
/// padded as-is (`#ab` becomes `#0ab`); such ids fail later at row lookup.
pub fn canonical_game_id(raw: &str) -> String {
    let bare = raw.strip_prefix('#').unwrap_or(raw);
    let width = bare.chars().count();
    let padding = "0".repeat(GAME_ID_WIDTH.saturating_sub(width));
    format!("#{padding}{bare}")
}
