//! Decreasing-gap local search over the people ordering.
//!
//! # Summary
//!
//! Starting from the parsed ordering, the optimizer swaps the people at `i` and
//! `i + span` for every `i`, keeps a swap whenever the layout tool reports strictly
//! fewer crossings, and then halves `span`. Large spans move people across the whole
//! chart cheaply; small spans refine locally. A chart with `n` people costs
//! `1 + Σ (n - span)` evaluations over `span` in `2^k, 2^(k-1), ..., 1`.
use std::fmt::Display;
use std::time::{Duration, Instant};

use tracing::{event, Level};

use crate::document::Document;
use crate::error::Error;
use crate::evaluator::{Crossings, Evaluate};
use crate::interrupt::Interrupt;

/// Largest power of two strictly less than `n`, or 0 when `n < 2`.
pub fn initial_span(n: usize) -> usize {
    if n < 2 {
        0
    } else {
        1 << (usize::BITS - 1 - (n - 1).leading_zeros())
    }
}

/// Per-trial wall-clock times.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Timings {
    pub count: u32,
    pub total: Duration,
    pub longest: Duration,
    pub shortest: Option<Duration>,
}

impl Timings {
    pub fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.longest = self.longest.max(elapsed);
        self.shortest = Some(self.shortest.map_or(elapsed, |s| s.min(elapsed)));
    }

    pub fn average(&self) -> Option<Duration> {
        (self.count > 0).then(|| self.total / self.count)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OptimizationState<'s> {
    pub best_ordering: Vec<&'s str>,
    /// Only ever replaced by a strictly smaller reported count.
    pub best: Crossings,
    pub original: Crossings,
    pub span: usize,
    pub iterations: usize,
    pub timings: Timings,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Completed,
    Cancelled,
}

pub struct Optimizer<'d, 's, E> {
    document: &'d Document<'s>,
    evaluator: E,
    state: OptimizationState<'s>,
    started: Instant,
}

impl<'d, 's, E: Evaluate> Optimizer<'d, 's, E> {
    /// Score the unmodified document. Without that baseline there is nothing to improve
    /// on, so an evaluator failure here is returned.
    pub fn new(document: &'d Document<'s>, mut evaluator: E) -> Result<Self, Error> {
        let started = Instant::now();
        let original = evaluator.crossings(&document.assemble())?;
        let people = document.people.len();
        let span = initial_span(people);
        event!(Level::INFO, %people, %span, %original, "INITIAL");
        Ok(Self {
            document,
            evaluator,
            state: OptimizationState {
                best_ordering: document.people.clone(),
                best: original,
                original,
                span,
                iterations: 0,
                timings: Timings::default(),
            },
            started,
        })
    }

    /// Measure the reported runtime from `started` instead of from [Optimizer::new].
    pub fn started_at(mut self, started: Instant) -> Self {
        self.started = started;
        self
    }

    pub fn document(&self) -> &'d Document<'s> {
        self.document
    }

    pub fn state(&self) -> &OptimizationState<'s> {
        &self.state
    }

    /// A copy of the state between trials; never reflects an unscored candidate.
    pub fn snapshot(&self) -> OptimizationState<'s> {
        self.state.clone()
    }

    pub fn evaluator_mut(&mut self) -> &mut E {
        &mut self.evaluator
    }

    pub fn into_evaluator(self) -> E {
        self.evaluator
    }

    fn solved(&self) -> bool {
        self.state.best.is_reported() && self.state.best.count() == 0
    }

    /// Search until every span is exhausted, zero crossings are reported, or `interrupt`
    /// is raised. The interrupt is only consulted before a trial starts.
    pub fn run(&mut self, interrupt: &Interrupt) -> Outcome {
        let n = self.state.best_ordering.len();
        while self.state.span >= 1 && !self.solved() {
            let span = self.state.span;
            for i in 0..n - span {
                if interrupt.is_raised() {
                    event!(Level::INFO, iterations = self.state.iterations, %span, %i, "CANCELLED");
                    return Outcome::Cancelled;
                }
                self.trial(i, span);
                if self.solved() {
                    event!(Level::INFO, iterations = self.state.iterations, "NO CROSSINGS LEFT");
                    break;
                }
            }
            self.state.span /= 2;
        }
        Outcome::Completed
    }

    fn trial(&mut self, i: usize, span: usize) {
        let started = Instant::now();

        let mut candidate = self.state.best_ordering.clone();
        candidate.swap(i, i + span);
        let text = self.document.assemble_with(&candidate);

        let scored = match self.evaluator.crossings(&text) {
            Ok(crossings) => Some(crossings),
            Err(error) => {
                event!(Level::WARN, %error, %span, %i, "evaluation failed; discarding candidate");
                None
            }
        };

        // Missing counts are never accepted: they would pose as a perfect score.
        if let Some(crossings) = scored.filter(|c| c.is_reported()) {
            if crossings.count() < self.state.best.count() {
                self.state.best = crossings;
                self.state.best_ordering = candidate;
            }
        }

        let elapsed = started.elapsed();
        self.state.timings.record(elapsed);
        self.state.iterations += 1;
        event!(
            Level::INFO,
            iterations = self.state.iterations,
            %span,
            %i,
            best = %self.state.best,
            candidate = ?scored,
            ?elapsed,
            "TRIAL"
        );
    }

    pub fn report(&self) -> Report {
        Report {
            original: self.state.original,
            best: self.state.best,
            runtime: self.started.elapsed(),
            iterations: self.state.iterations,
            timings: self.state.timings,
        }
    }
}

/// A summary of a run, printed when the artifacts are written.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Report {
    pub original: Crossings,
    pub best: Crossings,
    pub runtime: Duration,
    pub iterations: usize,
    pub timings: Timings,
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Crossings reduced from {} to {}, runtime={:.3} seconds, iterations={}",
            self.original,
            self.best,
            self.runtime.as_secs_f64(),
            self.iterations,
        )?;
        match (self.timings.average(), self.timings.shortest) {
            (Some(average), Some(shortest)) => write!(
                f,
                "Average iteration time={:.3} seconds, longest iteration time={:.3} seconds, shortest iteration time={:.3} seconds",
                average.as_secs_f64(),
                self.timings.longest.as_secs_f64(),
                shortest.as_secs_f64(),
            ),
            _ => write!(f, "No iterations were run"),
        }
    }
}
