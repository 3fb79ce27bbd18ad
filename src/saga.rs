// Unit of work for multi-record writes that the store cannot commit as one
// transaction.
//
// Steps run in order. When one fails, every completed step is undone in
// reverse order (a written match is deleted, a stats row is put back), then
// the original error is returned. Compensations are best effort: a failing
// compensation is logged as an inconsistency and not retried.

use crate::db::{MatchRecord, NewMatch, PlayerStats};
use crate::error::StoreError;
use crate::metrics;
use crate::store::RatingStore;

#[derive(Debug)]
enum Step {
    InsertMatch(NewMatch),
    ReplaceStats {
        current: PlayerStats,
        next: PlayerStats,
    },
}

#[derive(Debug)]
enum Done {
    Match(MatchRecord),
    Stats {
        before: PlayerStats,
        stored: PlayerStats,
    },
}

/// Records written by a successful saga, in step order.
#[derive(Debug, Default)]
pub struct SagaOutput {
    pub matches: Vec<MatchRecord>,
    pub stats: Vec<PlayerStats>,
}

#[derive(Debug, Default)]
pub struct Saga {
    steps: Vec<Step>,
}

impl Saga {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_match(mut self, m: NewMatch) -> Self {
        self.steps.push(Step::InsertMatch(m));
        self
    }

    pub fn replace_stats(mut self, current: PlayerStats, next: PlayerStats) -> Self {
        self.steps.push(Step::ReplaceStats { current, next });
        self
    }

    pub async fn run<S: RatingStore + ?Sized>(self, store: &S) -> Result<SagaOutput, StoreError> {
        let mut done = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.into_iter().enumerate() {
            let result = match step {
                Step::InsertMatch(m) => store.insert_match(&m).await.map(Done::Match),
                Step::ReplaceStats { current, next } => store
                    .replace_stats(&current, &next)
                    .await
                    .map(|stored| Done::Stats {
                        before: current,
                        stored,
                    }),
            };

            match result {
                Ok(d) => done.push(d),
                Err(e) => {
                    tracing::warn!(step = index, "write failed, rolling back {} step(s): {e}", done.len());
                    compensate(store, done).await;
                    return Err(e);
                }
            }
        }

        let mut output = SagaOutput::default();
        for d in done {
            match d {
                Done::Match(m) => output.matches.push(m),
                Done::Stats { stored, .. } => output.stats.push(stored),
            }
        }
        Ok(output)
    }
}

async fn compensate<S: RatingStore + ?Sized>(store: &S, done: Vec<Done>) {
    for d in done.into_iter().rev() {
        let outcome = match &d {
            Done::Match(m) => match store.delete_match(m.id).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(format!("match {} was already gone", m.id)),
                Err(e) => Err(e.to_string()),
            },
            Done::Stats { before, stored } => store
                .replace_stats(stored, before)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
        };

        match outcome {
            Ok(()) => {
                metrics::COMPENSATIONS_TOTAL.with_label_values(&["applied"]).inc();
            }
            Err(reason) => {
                metrics::COMPENSATIONS_TOTAL.with_label_values(&["failed"]).inc();
                tracing::error!(?d, "inconsistency: compensation failed: {reason}");
            }
        }
    }
}
