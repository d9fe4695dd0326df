use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::paths;
use super::strategy::Strategy;
use crate::domain::{FileDescriptor, Hashes, Operation};
use crate::matching::Identification;

/// One proposed file operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub source: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_path: Option<String>,
    pub destination: PathBuf,
    pub operation: Operation,
    pub size: u64,
    pub hashes: Hashes,
    pub game_name: String,
    pub catalog_id: String,
}

impl PlannedAction {
    pub fn source_display(&self) -> String {
        match &self.container_path {
            Some(inner) => format!("{}|{}", self.source.display(), inner),
            None => self.source.display().to_string(),
        }
    }
}

/// A destination claimed by more than one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanConflict {
    pub destination: PathBuf,
    /// Indices into `OrganizePlan::actions`, in plan order.
    pub actions: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizePlan {
    pub strategy_id: String,
    pub output_root: PathBuf,
    pub actions: Vec<PlannedAction>,
    pub conflicts: Vec<PlanConflict>,
    pub generated_at: DateTime<Utc>,
}

impl OrganizePlan {
    pub fn file_count(&self) -> usize {
        self.actions.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.actions.iter().map(|a| a.size).sum()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Conflict that involves the given action, if any.
    pub fn conflict_for(&self, action: usize) -> Option<&PlanConflict> {
        self.conflicts.iter().find(|c| c.actions.contains(&action))
    }
}

fn operation_for(descriptor: &FileDescriptor, requested: Operation) -> Operation {
    if descriptor.is_in_container() {
        Operation::Extract
    } else if requested == Operation::Extract {
        Operation::Copy
    } else {
        requested
    }
}

/// Compute the plan with an explicit timestamp. Pure: touches no files.
pub fn plan_at(
    identified: &[Identification],
    strategy: &Strategy,
    output_root: &Path,
    operation: Operation,
    region_priority: &[String],
    generated_at: DateTime<Utc>,
) -> OrganizePlan {
    let mut actions: Vec<PlannedAction> = strategy
        .select(identified, region_priority)
        .into_iter()
        .map(|ident| PlannedAction {
            source: ident.descriptor.path.clone(),
            container_path: ident.descriptor.container_path.clone(),
            destination: paths::destination(
                output_root,
                &strategy.directories(ident),
                &ident.entry.rom_name,
            ),
            operation: operation_for(&ident.descriptor, operation),
            size: ident.descriptor.size,
            hashes: ident.descriptor.hashes.clone(),
            game_name: ident.entry.game_name.clone(),
            catalog_id: ident.catalog_id.clone(),
        })
        .collect();

    actions.sort_by(|a, b| {
        a.destination
            .cmp(&b.destination)
            .then_with(|| a.source_display().cmp(&b.source_display()))
    });

    let mut claims: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, action) in actions.iter().enumerate() {
        claims
            .entry(paths::conflict_key(&action.destination))
            .or_default()
            .push(i);
    }
    let mut conflicts: Vec<PlanConflict> = claims
        .into_values()
        .filter(|claimants| claimants.len() > 1)
        .map(|claimants| PlanConflict {
            destination: actions[claimants[0]].destination.clone(),
            actions: claimants,
        })
        .collect();
    conflicts.sort_by_key(|c| c.actions[0]);

    OrganizePlan {
        strategy_id: strategy.id(),
        output_root: output_root.to_path_buf(),
        actions,
        conflicts,
        generated_at,
    }
}

/// Compute the plan stamped with the current time.
pub fn plan(
    identified: &[Identification],
    strategy: &Strategy,
    output_root: &Path,
    operation: Operation,
    region_priority: &[String],
) -> OrganizePlan {
    let plan = plan_at(
        identified,
        strategy,
        output_root,
        operation,
        region_priority,
        Utc::now(),
    );
    tracing::debug!(
        strategy = %plan.strategy_id,
        actions = plan.actions.len(),
        conflicts = plan.conflicts.len(),
        "generated plan"
    );
    plan
}
