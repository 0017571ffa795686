use tracing::warn;

use super::super::domain::{
    ConditionValue, CustomCondition, EligibilityProfile, MalformedCriterion, ProfileValue,
};

/// Evaluate one custom condition. Comparisons that cannot be made fail the condition only.
pub(crate) fn condition_holds(condition: &CustomCondition, profile: &EligibilityProfile) -> bool {
    match evaluate_condition(condition, profile) {
        Ok(holds) => holds,
        Err(error) => {
            warn!(
                user_id = %profile.user_id,
                field = condition.field(),
                operator = condition.operator(),
                %error,
                "custom condition treated as unmet"
            );
            false
        }
    }
}

pub(crate) fn evaluate_condition(
    condition: &CustomCondition,
    profile: &EligibilityProfile,
) -> Result<bool, MalformedCriterion> {
    let Some(actual) = profile.field(condition.field()) else {
        return Ok(false);
    };

    match condition {
        CustomCondition::Equals { field, value } => equals(field, &actual, value),
        CustomCondition::Contains { field, value } => match &actual {
            ProfileValue::Text(text) => Ok(text.contains(value.as_str())),
            ProfileValue::List(items) => Ok(items.iter().any(|item| item == value)),
            other => Err(incomparable(field, condition.operator(), other)),
        },
        CustomCondition::GreaterThan { field, value } => {
            Ok(numeric(field, condition.operator(), &actual)? > *value)
        }
        CustomCondition::LessThan { field, value } => {
            Ok(numeric(field, condition.operator(), &actual)? < *value)
        }
    }
}

fn equals(
    field: &str,
    actual: &ProfileValue,
    expected: &ConditionValue,
) -> Result<bool, MalformedCriterion> {
    match (actual, expected) {
        (ProfileValue::Text(actual), ConditionValue::Text(expected)) => Ok(actual == expected),
        (ProfileValue::Number(actual), ConditionValue::Number(expected)) => Ok(actual == expected),
        (ProfileValue::Flag(actual), ConditionValue::Flag(expected)) => Ok(actual == expected),
        (ProfileValue::Text(_), ConditionValue::Number(expected)) => {
            Ok(numeric(field, "equals", actual)? == *expected)
        }
        (other, _) => Err(incomparable(field, "equals", other)),
    }
}

fn numeric(
    field: &str,
    operator: &'static str,
    actual: &ProfileValue,
) -> Result<f64, MalformedCriterion> {
    match actual {
        ProfileValue::Number(number) => Ok(*number),
        ProfileValue::Text(text) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .ok_or_else(|| incomparable(field, operator, actual)),
        other => Err(incomparable(field, operator, other)),
    }
}

fn incomparable(field: &str, operator: &'static str, found: &ProfileValue) -> MalformedCriterion {
    MalformedCriterion::IncomparableField {
        field: field.to_string(),
        operator,
        found: found.kind(),
    }
}
