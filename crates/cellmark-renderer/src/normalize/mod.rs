//! Repairs Markdown text captured from sloppy sources before it is parsed.
//!
//! The normalizer runs a fixed list of text passes in order and repeats the
//! whole list until the text stops changing, so `normalize(normalize(x))`
//! equals `normalize(x)`. A pass that panics is skipped for that round and
//! its input flows on unchanged; normalization never fails.

pub mod lines;
mod passes;

use std::panic::{AssertUnwindSafe, catch_unwind};

use cellmark_common::RenderConfig;

pub use passes::{
    canonicalize_bullets, canonicalize_ordered_markers, decode_entities, isolate_alerts,
    separate_blocks, unify_line_endings,
};

/// A single repair pass.
pub type Pass = fn(&str) -> String;

/// The passes in the order they run.
pub const PASSES: &[(&str, Pass)] = &[
    ("decode_entities", decode_entities),
    ("unify_line_endings", unify_line_endings),
    ("canonicalize_bullets", canonicalize_bullets),
    ("canonicalize_ordered_markers", canonicalize_ordered_markers),
    ("separate_blocks", separate_blocks),
    ("isolate_alerts", isolate_alerts),
];

const DEFAULT_MAX_ROUNDS: usize = 8;

#[derive(Debug, Clone)]
pub struct Normalizer {
    passes: Vec<(&'static str, Pass)>,
    max_rounds: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            passes: PASSES.to_vec(),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl Normalizer {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self::default().max_rounds(config.max_normalize_rounds)
    }

    pub fn max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds.max(1);
        self
    }

    /// Replace the pass list. Mostly useful for exercising the fail-open
    /// behaviour.
    pub fn with_passes(mut self, passes: Vec<(&'static str, Pass)>) -> Self {
        self.passes = passes;
        self
    }

    #[tracing::instrument(level = "trace", skip_all, fields(len = raw.len()))]
    pub fn normalize(&self, raw: &str) -> String {
        let mut current = raw.to_owned();
        for round in 1..=self.max_rounds {
            let next = self.round(&current);
            if next == current {
                return next;
            }
            tracing::trace!(round, "normalizer round changed the text");
            current = next;
        }
        tracing::debug!(
            rounds = self.max_rounds,
            "normalizer stopped before reaching a fixed point"
        );
        current
    }

    fn round(&self, input: &str) -> String {
        self.passes
            .iter()
            .fold(input.to_owned(), |text, (name, pass)| {
                run_pass(name, *pass, text)
            })
    }
}

fn run_pass(name: &str, pass: Pass, input: String) -> String {
    match catch_unwind(AssertUnwindSafe(|| pass(&input))) {
        Ok(output) => output,
        Err(_) => {
            tracing::warn!(pass = name, "normalizer pass panicked, keeping its input");
            input
        }
    }
}

/// Normalize with the default pass list.
pub fn normalize(raw: &str) -> String {
    Normalizer::default().normalize(raw)
}

/// Normalize a stored cell value. Anything that isn't a string is treated
/// as empty.
pub fn normalize_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => normalize(text),
        _ => String::new(),
    }
}
