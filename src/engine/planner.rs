//! Dependency-ordered batch planning for multi-application releases.
//!
//! Each selected mode is placed after the deepest wave of its dependencies,
//! and its own batches occupy consecutive waves from there. Modes that do
//! not depend on each other share waves, so independent parts of a release
//! roll out together.

use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

use crate::upstream::{ApplicationReleaseSummary, Mode};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("mode {0} does not exist in release modes")]
    UnknownMode(String),

    #[error("mode dependency cycle detected at mode {0}")]
    Cycle(String),
}

pub type Wave = Vec<ApplicationReleaseSummary>;

struct Planner<'a> {
    modes: &'a BTreeMap<String, Mode>,
    visited: HashMap<String, i64>,
    in_progress: HashSet<String>,
    waves: Vec<Wave>,
}

impl<'a> Planner<'a> {
    /// Index of the last wave occupied by `name`'s own batches.
    fn height(&mut self, name: &str) -> Result<i64, PlanError> {
        let mode = self
            .modes
            .get(name)
            .ok_or_else(|| PlanError::UnknownMode(name.to_string()))?;

        if !self.in_progress.insert(name.to_string()) {
            return Err(PlanError::Cycle(name.to_string()));
        }

        let mut height: i64 = -1;
        for dep in &mode.depend_on {
            let dep_height = match self.visited.get(dep) {
                Some(h) => *h,
                None => self.height(dep)?,
            };
            height = height.max(dep_height);
        }

        for batch in &mode.batches {
            height += 1;
            let slot = height as usize;
            if self.waves.len() <= slot {
                self.waves.resize_with(slot + 1, Vec::new);
            }
            self.waves[slot].extend(batch.iter().cloned());
        }

        self.in_progress.remove(name);
        self.visited.insert(name.to_string(), height);
        Ok(height)
    }
}

/// Build the leveled wave list for the selected modes.
pub fn plan(selected: &[String], modes: &BTreeMap<String, Mode>) -> Result<Vec<Wave>, PlanError> {
    let mut planner = Planner {
        modes,
        visited: HashMap::new(),
        in_progress: HashSet::new(),
        waves: Vec::new(),
    };

    for name in selected {
        if !planner.visited.contains_key(name) {
            planner.height(name)?;
        }
    }

    Ok(planner.waves)
}

/// Release ids per wave, the form persisted on the order.
pub fn release_ids(waves: &[Wave]) -> Vec<Vec<String>> {
    waves
        .iter()
        .map(|wave| wave.iter().map(|r| r.release_id.clone()).collect())
        .collect()
}
