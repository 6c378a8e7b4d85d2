//! All-settled fan-out publishing
//!
//! Every attempt of a plan runs concurrently and runs to completion; one
//! attempt failing or succeeding never cancels another.

use super::plan::{PublishAttempt, PublishPlan};
use crate::transport::{PublishError, Publisher};
use futures::future::join_all;

/// Settled outcome of one publish attempt
#[derive(Debug)]
pub struct AttemptOutcome {
    pub topic: String,
    pub best_effort: bool,
    pub result: Result<(), PublishError>,
}

/// Settled outcomes of every attempt in a plan, in plan order
#[derive(Debug, Default)]
pub struct FanoutReport {
    pub outcomes: Vec<AttemptOutcome>,
}

impl FanoutReport {
    /// At least one attempt reached the bus
    pub fn delivered(&self) -> bool {
        self.outcomes.iter().any(|o| o.result.is_ok())
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &AttemptOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// `topic: error` for each failed attempt, joined with `; `
    pub fn failure_message(&self) -> String {
        self.failures()
            .filter_map(|o| {
                let e = o.result.as_ref().err()?;
                Some(format!("{}: {}", o.topic, e.reason()))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Publish every attempt of `plan` concurrently and wait for all of them
pub async fn publish_all(publisher: &dyn Publisher, plan: &PublishPlan) -> FanoutReport {
    let outcomes = join_all(plan.attempts.iter().map(|attempt| settle(publisher, attempt))).await;
    FanoutReport { outcomes }
}

async fn settle(publisher: &dyn Publisher, attempt: &PublishAttempt) -> AttemptOutcome {
    let result = publisher
        .publish(&attempt.topic, attempt.payload.clone())
        .await;
    AttemptOutcome {
        topic: attempt.topic.clone(),
        best_effort: attempt.best_effort,
        result,
    }
}
