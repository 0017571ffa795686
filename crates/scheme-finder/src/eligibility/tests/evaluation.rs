use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use proptest::sample::select;

use super::common::*;
use crate::eligibility::catalog::{CatalogSnapshot, CatalogVersion};
use crate::eligibility::domain::{
    ConditionValue, CustomCondition, EligibilityProfile, Gender, IncomeBracket,
    MalformedCriterion, ProfileValue, SchemeEligibilityCriteria, SchemeLevel, StateCode,
};
use crate::eligibility::evaluation::{evaluate_condition, CriterionGroup, EligibilityEngine};

fn farmer_profile() -> EligibilityProfile {
    EligibilityProfile::try_from(&gujarat_farmer("citizen-1")).expect("complete profile")
}

fn all_groups_criteria() -> SchemeEligibilityCriteria {
    let mut criteria = farmer_scheme().compile().expect("compiles").criteria;
    criteria.genders = Some(BTreeSet::from([Gender::Male]));
    criteria.custom_conditions.push(CustomCondition::Equals {
        field: "occupation".to_string(),
        value: ConditionValue::Text("farmer".to_string()),
    });
    criteria
}

fn with_attribute(
    mut profile: EligibilityProfile,
    key: &str,
    value: ProfileValue,
) -> EligibilityProfile {
    profile.attributes.insert(key.to_string(), value);
    profile
}

#[test]
fn eligibility_requires_every_group() {
    let engine = EligibilityEngine::new();
    let criteria = all_groups_criteria();
    let breakers: [fn(&mut EligibilityProfile); 5] = [
        |profile| profile.age = 70,
        |profile| profile.state = StateCode::Maharashtra,
        |profile| profile.gender = Gender::Female,
        |profile| profile.income_bracket = IncomeBracket::AboveTenLakh,
        |profile| {
            profile.attributes.insert(
                "occupation".to_string(),
                ProfileValue::Text("weaver".to_string()),
            );
        },
    ];

    for mask in 0u32..(1 << breakers.len()) {
        let mut profile = farmer_profile();
        for (index, breaker) in breakers.iter().enumerate() {
            if mask & (1 << index) != 0 {
                breaker(&mut profile);
            }
        }

        let eligible = engine.evaluate(&profile, &criteria);
        assert_eq!(eligible, mask == 0, "mask {mask:05b}");

        let explanation = engine.explain(&profile, &criteria);
        assert_eq!(explanation.eligible, eligible);
        assert_eq!(
            explanation.unmatched_criteria.len(),
            mask.count_ones() as usize,
            "mask {mask:05b}"
        );
    }
}

#[test]
fn age_bounds_are_inclusive() {
    let engine = EligibilityEngine::new();
    let criteria = SchemeEligibilityCriteria {
        age_min: Some(18),
        age_max: Some(60),
        ..SchemeEligibilityCriteria::default()
    };
    let at = |age| {
        eligibility_profile(age, StateCode::Bihar, Gender::Other, IncomeBracket::FiveToTenLakh)
    };

    assert!(engine.evaluate(&at(18), &criteria));
    assert!(engine.evaluate(&at(60), &criteria));
    assert!(!engine.evaluate(&at(17), &criteria));
    assert!(!engine.evaluate(&at(61), &criteria));
}

#[test]
fn nationwide_schemes_admit_every_state() {
    let engine = EligibilityEngine::new();
    let unscoped = senior_scheme().compile().expect("compiles");
    let mut central = farmer_scheme();
    central.level = SchemeLevel::Central;
    let central = central.compile().expect("compiles");

    for state in StateCode::ALL {
        let profile =
            eligibility_profile(65, *state, Gender::Female, IncomeBracket::BelowOneLakh);
        assert!(engine.evaluate(&profile, &unscoped.criteria), "{state}");

        let profile =
            eligibility_profile(45, *state, Gender::Female, IncomeBracket::BelowOneLakh);
        assert!(engine.evaluate(&profile, &central.criteria), "{state}");
    }

    // Ladakh appears in no scheme of the sample catalog.
    let profile =
        eligibility_profile(70, StateCode::Ladakh, Gender::Male, IncomeBracket::AboveTenLakh);
    assert!(engine.evaluate(&profile, &unscoped.criteria));
}

#[test]
fn sample_catalog_yields_only_the_farmer_scheme() {
    let engine = EligibilityEngine::new();
    let (snapshot, report) = CatalogSnapshot::build(CatalogVersion(1), sample_catalog());
    assert!(report.rejected.is_empty());

    let names: Vec<&str> = engine
        .eligible_schemes(&farmer_profile(), &snapshot)
        .into_iter()
        .map(|scheme| scheme.name.as_str())
        .collect();

    assert_eq!(names, vec!["Farmer Scheme"]);
}

#[test]
fn explanation_labels_each_group() {
    let engine = EligibilityEngine::new();
    let scheme = women_scheme().compile().expect("compiles");

    let explanation = engine.explain(&farmer_profile(), &scheme.criteria);

    assert!(!explanation.eligible);
    assert_eq!(explanation.unmatched_criteria, vec!["gender is Female"]);
    assert!(explanation
        .matched_criteria
        .contains(&"available nationwide".to_string()));
    assert_eq!(explanation.checks.len(), 5);
    assert!(explanation
        .checks
        .iter()
        .any(|check| check.group == CriterionGroup::Gender && !check.satisfied));
}

#[test]
fn custom_conditions_coerce_and_fail_closed() {
    let engine = EligibilityEngine::new();
    let profile = with_attribute(
        with_attribute(
            farmer_profile(),
            "land_acres",
            ProfileValue::Text("2.5".to_string()),
        ),
        "documents",
        ProfileValue::List(vec!["aadhaar".to_string(), "ration_card".to_string()]),
    );

    let holds = |condition: CustomCondition| {
        let criteria = SchemeEligibilityCriteria {
            custom_conditions: vec![condition],
            ..SchemeEligibilityCriteria::default()
        };
        engine.evaluate(&profile, &criteria)
    };

    assert!(holds(CustomCondition::LessThan {
        field: "land_acres".to_string(),
        value: 5.0,
    }));
    assert!(holds(CustomCondition::Contains {
        field: "documents".to_string(),
        value: "ration_card".to_string(),
    }));
    assert!(holds(CustomCondition::Contains {
        field: "occupation".to_string(),
        value: "farm".to_string(),
    }));
    assert!(holds(CustomCondition::GreaterThan {
        field: "age".to_string(),
        value: 40.0,
    }));
    assert!(!holds(CustomCondition::GreaterThan {
        field: "occupation".to_string(),
        value: 1.0,
    }));
    assert!(!holds(CustomCondition::Equals {
        field: "disability_percent".to_string(),
        value: ConditionValue::Number(40.0),
    }));
}

#[test]
fn incomparable_fields_report_malformed_criterion() {
    let profile = farmer_profile();
    let condition = CustomCondition::LessThan {
        field: "occupation".to_string(),
        value: 3.0,
    };

    match evaluate_condition(&condition, &profile) {
        Err(MalformedCriterion::IncomparableField { field, found, .. }) => {
            assert_eq!(field, "occupation");
            assert_eq!(found, "text");
        }
        other => panic!("expected incomparable field, got {other:?}"),
    }

    let absent = CustomCondition::Equals {
        field: "caste_category".to_string(),
        value: ConditionValue::Text("SC".to_string()),
    };
    assert_eq!(evaluate_condition(&absent, &profile), Ok(false));
}

fn profile_strategy() -> impl Strategy<Value = EligibilityProfile> {
    (
        1u8..=120,
        select(StateCode::ALL),
        select(Gender::ALL),
        select(IncomeBracket::ALL),
        select(vec!["farmer", "student", "artisan", "42"]),
        proptest::option::of(0.0f64..20.0),
    )
        .prop_map(|(age, state, gender, income_bracket, occupation, land)| {
            let mut attributes = BTreeMap::new();
            attributes.insert(
                "occupation".to_string(),
                ProfileValue::Text(occupation.to_string()),
            );
            if let Some(acres) = land {
                attributes.insert("land_acres".to_string(), ProfileValue::Number(acres));
            }
            EligibilityProfile {
                user_id: user_id("generated"),
                age,
                state,
                gender,
                income_bracket,
                attributes,
            }
        })
}

fn condition_strategy() -> impl Strategy<Value = CustomCondition> {
    prop_oneof![
        select(vec!["farmer", "student", "42"]).prop_map(|value| CustomCondition::Equals {
            field: "occupation".to_string(),
            value: ConditionValue::Text(value.to_string()),
        }),
        (0.0f64..100.0).prop_map(|value| CustomCondition::Equals {
            field: "occupation".to_string(),
            value: ConditionValue::Number(value),
        }),
        select(vec!["arm", "stud", "x"]).prop_map(|value| CustomCondition::Contains {
            field: "occupation".to_string(),
            value: value.to_string(),
        }),
        (0.0f64..20.0).prop_map(|value| CustomCondition::LessThan {
            field: "land_acres".to_string(),
            value,
        }),
        (1.0f64..120.0).prop_map(|value| CustomCondition::GreaterThan {
            field: "age".to_string(),
            value,
        }),
        Just(CustomCondition::GreaterThan {
            field: "occupation".to_string(),
            value: 10.0,
        }),
    ]
}

fn criteria_strategy() -> impl Strategy<Value = SchemeEligibilityCriteria> {
    (
        proptest::option::of(1u8..=120),
        proptest::option::of(1u8..=120),
        proptest::option::of(proptest::collection::btree_set(select(StateCode::ALL), 0..5)),
        proptest::option::of(proptest::collection::btree_set(select(Gender::ALL), 0..3)),
        proptest::option::of(proptest::collection::btree_set(
            select(IncomeBracket::ALL),
            0..4,
        )),
        proptest::collection::vec(condition_strategy(), 0..3),
    )
        .prop_map(
            |(age_min, age_max, states, genders, income_brackets, custom_conditions)| {
                SchemeEligibilityCriteria {
                    age_min,
                    age_max,
                    states,
                    genders,
                    income_brackets,
                    custom_conditions,
                }
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn explain_agrees_with_evaluate(
        profile in profile_strategy(),
        criteria in criteria_strategy(),
    ) {
        let engine = EligibilityEngine::new();
        let explanation = engine.explain(&profile, &criteria);
        prop_assert_eq!(explanation.eligible, engine.evaluate(&profile, &criteria));
        prop_assert_eq!(
            explanation.matched_criteria.len() + explanation.unmatched_criteria.len(),
            explanation.checks.len()
        );
    }

    #[test]
    fn unconstrained_criteria_admit_every_profile(profile in profile_strategy()) {
        let engine = EligibilityEngine::new();
        prop_assert!(engine.evaluate(&profile, &SchemeEligibilityCriteria::default()));
    }
}
