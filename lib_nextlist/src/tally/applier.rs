//! # Tally Applier
//!
//! Applies [`VoteIntent`]s to the NextList worksheet: locate the game's row,
//! add the votes to its tally, then resort every data row by votes (descending)
//! and name (ascending).
//!
//! The read and the write of a tally are separate store calls. That is safe only
//! with a single writer, which is how the feed pipeline runs.

use thiserror::Error;

use super::store::{RowRange, SortKey, SortOrder, StoreError, TallyStore};
use crate::parsers::interpreter::VoteIntent;

/// Header row holding the column labels.
const HEADER_ROW: usize = 1;

/// Failures while applying a vote. Every variant except [`TallyError::SortFailed`]
/// means the vote was not recorded.
#[derive(Debug, Error)]
pub enum TallyError {
    #[error("Unable to read the NextList header row: {0}")]
    Header(#[source] StoreError),

    #[error("Unable to find a column labelled {label:?} in the NextList header row.")]
    ColumnNotFound { label: String },

    #[error("Unable to search the NextList for game {game_id}: {source}")]
    Lookup {
        game_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Unable to locate row for game {game_id}.")]
    RowNotFound { game_id: String },

    #[error("Failed to pull prior votes for game {game_id} on row {row}, column {col}: {source}")]
    ReadFailed {
        game_id: String,
        row: usize,
        col: usize,
        #[source]
        source: StoreError,
    },

    #[error("Unable to update NextList for game {game_id} on row {row}. Error: {source}")]
    WriteFailed {
        game_id: String,
        row: usize,
        #[source]
        source: StoreError,
    },

    #[error("Updated game {game_id} but failed to resort the NextList: {source}")]
    SortFailed {
        game_id: String,
        #[source]
        source: StoreError,
    },
}

impl TallyError {
    /// Whether the vote behind this error never reached the store.
    pub fn is_lost_update(&self) -> bool {
        !matches!(self, TallyError::SortFailed { .. })
    }
}

/// A recorded tally change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyUpdate {
    pub game_id: String,
    pub username: String,
    pub row: usize,
    pub prior: i64,
    pub votes: u32,
    pub new_total: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    votes: usize,
    name: usize,
}

/// Applies vote intents to a [`TallyStore`].
///
/// Column positions are looked up in the header row on first use and cached for
/// the applier's lifetime.
pub struct TallyApplier<S> {
    store: S,
    vote_label: String,
    name_label: String,
    columns: Option<Columns>,
}

impl<S: TallyStore> TallyApplier<S> {
    /// Wraps an opened store. `vote_label` and `name_label` are the header texts
    /// of the tally and name columns.
    pub fn new(store: S, vote_label: impl Into<String>, name_label: impl Into<String>) -> Self {
        Self {
            store,
            vote_label: vote_label.into(),
            name_label: name_label.into(),
            columns: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Adds `intent.votes` to the game's tally and resorts the sheet.
    ///
    /// # Errors
    /// See [`TallyError`]. Missing columns and rows are never retried.
    pub async fn apply(&mut self, intent: &VoteIntent) -> Result<TallyUpdate, TallyError> {
        let columns = self.columns().await?;
        let row = self.locate_row(&intent.game_id).await?;
        let prior = self.prior_votes(&intent.game_id, row, columns.votes).await?;
        let new_total = prior.saturating_add(i64::from(intent.votes));

        self.store
            .set_cell(row, columns.votes, &new_total.to_string())
            .await
            .map_err(|source| TallyError::WriteFailed {
                game_id: intent.game_id.clone(),
                row,
                source,
            })?;

        log::info!(
            "Updated game {} for {} from {} by {} to {}.",
            intent.game_id,
            intent.username,
            prior,
            intent.votes,
            new_total
        );

        self.resort(columns)
            .await
            .map_err(|source| TallyError::SortFailed {
                game_id: intent.game_id.clone(),
                source,
            })?;

        Ok(TallyUpdate {
            game_id: intent.game_id.clone(),
            username: intent.username.clone(),
            row,
            prior,
            votes: intent.votes,
            new_total,
        })
    }

    async fn columns(&mut self) -> Result<Columns, TallyError> {
        if let Some(columns) = self.columns {
            return Ok(columns);
        }

        let header = self
            .store
            .row_values(HEADER_ROW)
            .await
            .map_err(TallyError::Header)?;
        let position = |label: &str| {
            header
                .iter()
                .position(|cell| cell == label)
                .map(|index| index + 1)
                .ok_or_else(|| TallyError::ColumnNotFound {
                    label: label.to_string(),
                })
        };
        let columns = Columns {
            votes: position(&self.vote_label)?,
            name: position(&self.name_label)?,
        };

        log::debug!(
            "NextList columns: {:?} -> {}, {:?} -> {}",
            self.vote_label,
            columns.votes,
            self.name_label,
            columns.name
        );
        self.columns = Some(columns);
        Ok(columns)
    }

    async fn locate_row(&self, game_id: &str) -> Result<usize, TallyError> {
        match self.store.find_cell(game_id).await {
            Ok(Some(cell)) => Ok(cell.row),
            Ok(None) => Err(TallyError::RowNotFound {
                game_id: game_id.to_string(),
            }),
            Err(source) => Err(TallyError::Lookup {
                game_id: game_id.to_string(),
                source,
            }),
        }
    }

    async fn prior_votes(&self, game_id: &str, row: usize, col: usize) -> Result<i64, TallyError> {
        let text = self
            .store
            .get_cell(row, col)
            .await
            .map_err(|source| TallyError::ReadFailed {
                game_id: game_id.to_string(),
                row,
                col,
                source,
            })?;
        let text = text.trim();
        Ok(text.parse().unwrap_or_else(|_| {
            if !text.is_empty() {
                log::debug!("Non-numeric tally {text:?} for game {game_id}, counting from 0");
            }
            0
        }))
    }

    async fn resort(&mut self, columns: Columns) -> Result<(), StoreError> {
        let last = self.store.last_row().await?;
        if last <= HEADER_ROW {
            return Ok(());
        }
        let keys = [
            SortKey {
                col: columns.votes,
                order: SortOrder::Descending,
            },
            SortKey {
                col: columns.name,
                order: SortOrder::Ascending,
            },
        ];
        self.store
            .sort(RowRange { first: HEADER_ROW + 1, last }, &keys)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tally::store::{CellRef, MemorySheet};

    fn sheet() -> MemorySheet {
        MemorySheet::from_rows(vec![
            vec!["Id", "Name", "Platform", "Votes"],
            vec!["#003", "Contra", "NES", "12"],
            vec!["#007", "GoldenEye", "N64", "10"],
            vec!["#010", "Metroid", "NES", "11"],
            vec!["#011", "Bomberman", "SNES", ""],
        ])
    }

    fn intent(game_id: &str, votes: u32) -> VoteIntent {
        VoteIntent {
            game_id: game_id.to_string(),
            votes,
            username: "alice".to_string(),
        }
    }

    #[tokio::test]
    async fn adds_votes_and_resorts_data_rows() {
        let mut applier = TallyApplier::new(sheet(), "Votes", "Name");
        let update = applier.apply(&intent("#007", 5)).await.unwrap();

        assert_eq!(update.prior, 10);
        assert_eq!(update.new_total, 15);
        assert_eq!(update.row, 3);

        let store = applier.store();
        assert_eq!(store.writes(), &[(CellRef { row: 3, col: 4 }, "15".to_string())]);
        assert_eq!(store.sorts().len(), 1);
        let (range, keys) = &store.sorts()[0];
        assert_eq!(*range, RowRange { first: 2, last: 5 });
        assert_eq!(keys[0], SortKey { col: 4, order: SortOrder::Descending });
        assert_eq!(keys[1], SortKey { col: 2, order: SortOrder::Ascending });

        let order: Vec<&str> = store.rows()[1..].iter().map(|row| row[0].as_str()).collect();
        assert_eq!(order, vec!["#007", "#003", "#010", "#011"]);
    }

    #[tokio::test]
    async fn blank_tally_counts_from_zero() {
        let mut applier = TallyApplier::new(sheet(), "Votes", "Name");
        let update = applier.apply(&intent("#011", 2)).await.unwrap();
        assert_eq!(update.prior, 0);
        assert_eq!(update.new_total, 2);
    }

    #[tokio::test]
    async fn unknown_game_is_not_written() {
        let mut applier = TallyApplier::new(sheet(), "Votes", "Name");
        let err = applier.apply(&intent("#999", 5)).await.unwrap_err();
        assert!(matches!(err, TallyError::RowNotFound { ref game_id } if game_id == "#999"));
        assert!(err.is_lost_update());
        assert!(applier.store().writes().is_empty());
        assert!(applier.store().sorts().is_empty());
    }

    #[tokio::test]
    async fn missing_header_column_fails_immediately() {
        let mut applier = TallyApplier::new(sheet(), "Tally", "Name");
        let err = applier.apply(&intent("#007", 1)).await.unwrap_err();
        assert!(matches!(err, TallyError::ColumnNotFound { ref label } if label == "Tally"));
        assert!(applier.store().writes().is_empty());
    }

    #[tokio::test]
    async fn write_failure_leaves_sheet_unsorted() {
        let mut applier = TallyApplier::new(sheet().fail_writes(), "Votes", "Name");
        let err = applier.apply(&intent("#007", 5)).await.unwrap_err();
        match &err {
            TallyError::WriteFailed { game_id, row, .. } => {
                assert_eq!(game_id, "#007");
                assert_eq!(*row, 3);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("on row 3"));
        assert!(applier.store().sorts().is_empty());
        assert_eq!(applier.store().rows()[2][3], "10");
    }

    #[tokio::test]
    async fn header_is_read_once() {
        let mut applier = TallyApplier::new(sheet(), "Votes", "Name");
        applier.apply(&intent("#007", 1)).await.unwrap();

        // A relabelled header would fail lookup if it were read again.
        applier.store_mut().set_cell(1, 4, "Tally").await.unwrap();
        applier.store_mut().set_cell(1, 2, "Title").await.unwrap();
        let update = applier.apply(&intent("#007", 1)).await.unwrap();

        assert_eq!(update.prior, 11);
        assert_eq!(update.new_total, 12);
        assert_eq!(applier.store().writes().last(), Some(&(CellRef { row: 3, col: 4 }, "12".to_string())));
    }

    #[tokio::test]
    async fn sequential_votes_accumulate() {
        let mut applier = TallyApplier::new(sheet(), "Votes", "Name");
        applier.apply(&intent("#010", 1)).await.unwrap();
        let update = applier.apply(&intent("#010", 3)).await.unwrap();
        assert_eq!(update.prior, 12);
        assert_eq!(update.new_total, 15);
        // Contra (12) now trails Metroid (15).
        assert_eq!(applier.store().rows()[1][0], "#010");
    }
}
