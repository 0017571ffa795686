use std::collections::BTreeSet;
use std::fmt::Display;

use super::super::domain::{EligibilityProfile, SchemeEligibilityCriteria};
use super::conditions::condition_holds;
use super::{CriterionCheck, CriterionGroup};

/// Every group must pass. Order only affects how early `evaluate` bails out.
pub(crate) const GROUPS: [CriterionGroup; 5] = [
    CriterionGroup::Age,
    CriterionGroup::State,
    CriterionGroup::Gender,
    CriterionGroup::Income,
    CriterionGroup::Custom,
];

pub(crate) fn group_satisfied(
    group: CriterionGroup,
    profile: &EligibilityProfile,
    criteria: &SchemeEligibilityCriteria,
) -> bool {
    match group {
        CriterionGroup::Age => age_within(profile.age, criteria),
        CriterionGroup::State => member_or_unconstrained(&criteria.states, &profile.state),
        CriterionGroup::Gender => member_or_unconstrained(&criteria.genders, &profile.gender),
        CriterionGroup::Income => {
            member_or_unconstrained(&criteria.income_brackets, &profile.income_bracket)
        }
        CriterionGroup::Custom => criteria
            .custom_conditions
            .iter()
            .all(|condition| condition_holds(condition, profile)),
    }
}

/// Checks for one group without short-circuiting; custom conditions report individually.
pub(crate) fn group_checks(
    group: CriterionGroup,
    profile: &EligibilityProfile,
    criteria: &SchemeEligibilityCriteria,
) -> Vec<CriterionCheck> {
    match group {
        CriterionGroup::Custom if !criteria.custom_conditions.is_empty() => criteria
            .custom_conditions
            .iter()
            .map(|condition| CriterionCheck {
                group,
                label: condition.label(),
                satisfied: condition_holds(condition, profile),
            })
            .collect(),
        _ => vec![CriterionCheck {
            group,
            label: group_label(group, criteria),
            satisfied: group_satisfied(group, profile, criteria),
        }],
    }
}

fn age_within(age: u8, criteria: &SchemeEligibilityCriteria) -> bool {
    criteria.age_min.map_or(true, |min| age >= min)
        && criteria.age_max.map_or(true, |max| age <= max)
}

// An empty set is treated like an absent one; ingest normalizes these away.
fn member_or_unconstrained<T: Ord>(allowed: &Option<BTreeSet<T>>, value: &T) -> bool {
    match allowed {
        Some(set) if !set.is_empty() => set.contains(value),
        _ => true,
    }
}

fn group_label(group: CriterionGroup, criteria: &SchemeEligibilityCriteria) -> String {
    match group {
        CriterionGroup::Age => match (criteria.age_min, criteria.age_max) {
            (Some(min), Some(max)) => format!("age between {min} and {max}"),
            (Some(min), None) => format!("age {min} or above"),
            (None, Some(max)) => format!("age {max} or below"),
            (None, None) => "open to all ages".to_string(),
        },
        CriterionGroup::State => match constrained(&criteria.states) {
            Some(states) => format!("resident of {}", one_of(states)),
            None => "available nationwide".to_string(),
        },
        CriterionGroup::Gender => match constrained(&criteria.genders) {
            Some(genders) => format!("gender is {}", one_of(genders)),
            None => "open to all genders".to_string(),
        },
        CriterionGroup::Income => match constrained(&criteria.income_brackets) {
            Some(brackets) => format!("income bracket is {}", one_of(brackets)),
            None => "no income limit".to_string(),
        },
        CriterionGroup::Custom => "no additional conditions".to_string(),
    }
}

fn constrained<T>(set: &Option<BTreeSet<T>>) -> Option<&BTreeSet<T>> {
    set.as_ref().filter(|set| !set.is_empty())
}

fn one_of<T: Display>(values: &BTreeSet<T>) -> String {
    let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
    if rendered.len() == 1 {
        rendered.join("")
    } else {
        format!("one of {}", rendered.join(", "))
    }
}
