mod conditions;
mod rules;

use serde::{Deserialize, Serialize};

use super::catalog::CatalogSnapshot;
use super::domain::{EligibilityProfile, Scheme, SchemeEligibilityCriteria};

#[cfg(test)]
pub(crate) use conditions::evaluate_condition;

/// One of the five independent predicate families a scheme can constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionGroup {
    Age,
    State,
    Gender,
    Income,
    Custom,
}

/// Outcome of a single labelled check, kept so explanations can be audited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriterionCheck {
    pub group: CriterionGroup,
    pub label: String,
    pub satisfied: bool,
}

/// Explanation of a verdict for "why am I (not) eligible" messaging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EligibilityExplanation {
    pub eligible: bool,
    pub matched_criteria: Vec<String>,
    pub unmatched_criteria: Vec<String>,
    pub checks: Vec<CriterionCheck>,
}

/// Stateless evaluator; every entry point is a pure function of profile and criteria.
#[derive(Debug, Clone, Copy, Default)]
pub struct EligibilityEngine;

impl EligibilityEngine {
    pub fn new() -> Self {
        Self
    }

    /// Conjunctive verdict, bailing out on the first failing group.
    pub fn evaluate(
        &self,
        profile: &EligibilityProfile,
        criteria: &SchemeEligibilityCriteria,
    ) -> bool {
        rules::GROUPS
            .iter()
            .all(|group| rules::group_satisfied(*group, profile, criteria))
    }

    /// Runs every group and records labels; `eligible` always agrees with `evaluate`.
    pub fn explain(
        &self,
        profile: &EligibilityProfile,
        criteria: &SchemeEligibilityCriteria,
    ) -> EligibilityExplanation {
        let checks: Vec<CriterionCheck> = rules::GROUPS
            .iter()
            .flat_map(|group| rules::group_checks(*group, profile, criteria))
            .collect();

        let mut matched_criteria = Vec::new();
        let mut unmatched_criteria = Vec::new();
        for check in &checks {
            if check.satisfied {
                matched_criteria.push(check.label.clone());
            } else {
                unmatched_criteria.push(check.label.clone());
            }
        }

        EligibilityExplanation {
            eligible: unmatched_criteria.is_empty(),
            matched_criteria,
            unmatched_criteria,
            checks,
        }
    }

    /// Filter a catalog snapshot down to the schemes the profile qualifies for, in catalog order.
    pub fn eligible_schemes<'a>(
        &self,
        profile: &EligibilityProfile,
        catalog: &'a CatalogSnapshot,
    ) -> Vec<&'a Scheme> {
        catalog
            .schemes()
            .iter()
            .filter(|scheme| self.evaluate(profile, &scheme.criteria))
            .collect()
    }
}
