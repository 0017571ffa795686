use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_AGE: u8 = 1;
pub const MAX_AGE: u8 = 120;

/// Identifier wrapper for the owner of a profile.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for catalog schemes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemeId(pub String);

impl fmt::Display for SchemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! region_codes {
    ($($variant:ident => $code:literal, $name:literal;)+) => {
        /// Indian states and union territories, serialized by their two letter code.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum StateCode {
            $(
                #[serde(rename = $code)]
                $variant,
            )+
        }

        impl StateCode {
            pub const ALL: &'static [StateCode] = &[$(StateCode::$variant),+];

            pub const fn code(self) -> &'static str {
                match self {
                    $(StateCode::$variant => $code,)+
                }
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $(StateCode::$variant => $name,)+
                }
            }
        }

        impl FromStr for StateCode {
            type Err = UnknownEnumValue;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_ascii_uppercase().as_str() {
                    $($code => Ok(StateCode::$variant),)+
                    _ => Err(UnknownEnumValue::new("state", value)),
                }
            }
        }
    };
}

region_codes! {
    AndhraPradesh => "AP", "Andhra Pradesh";
    ArunachalPradesh => "AR", "Arunachal Pradesh";
    Assam => "AS", "Assam";
    Bihar => "BR", "Bihar";
    Chhattisgarh => "CG", "Chhattisgarh";
    Goa => "GA", "Goa";
    Gujarat => "GJ", "Gujarat";
    Haryana => "HR", "Haryana";
    HimachalPradesh => "HP", "Himachal Pradesh";
    Jharkhand => "JH", "Jharkhand";
    Karnataka => "KA", "Karnataka";
    Kerala => "KL", "Kerala";
    MadhyaPradesh => "MP", "Madhya Pradesh";
    Maharashtra => "MH", "Maharashtra";
    Manipur => "MN", "Manipur";
    Meghalaya => "ML", "Meghalaya";
    Mizoram => "MZ", "Mizoram";
    Nagaland => "NL", "Nagaland";
    Odisha => "OD", "Odisha";
    Punjab => "PB", "Punjab";
    Rajasthan => "RJ", "Rajasthan";
    Sikkim => "SK", "Sikkim";
    TamilNadu => "TN", "Tamil Nadu";
    Telangana => "TS", "Telangana";
    Tripura => "TR", "Tripura";
    UttarPradesh => "UP", "Uttar Pradesh";
    Uttarakhand => "UK", "Uttarakhand";
    WestBengal => "WB", "West Bengal";
    AndamanNicobar => "AN", "Andaman and Nicobar Islands";
    Chandigarh => "CH", "Chandigarh";
    DadraNagarHaveliDamanDiu => "DH", "Dadra and Nagar Haveli and Daman and Diu";
    Delhi => "DL", "Delhi";
    JammuKashmir => "JK", "Jammu and Kashmir";
    Ladakh => "LA", "Ladakh";
    Lakshadweep => "LD", "Lakshadweep";
    Puducherry => "PY", "Puducherry";
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub const ALL: &'static [Gender] = &[Gender::Male, Gender::Female, Gender::Other];

    pub const fn label(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl FromStr for Gender {
    type Err = UnknownEnumValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            _ => Err(UnknownEnumValue::new("gender", value)),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Annual household income band, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IncomeBracket {
    #[serde(rename = "BELOW_1_LAKH")]
    BelowOneLakh,
    #[serde(rename = "1_TO_2_5_LAKH")]
    OneToTwoHalfLakh,
    #[serde(rename = "2_5_TO_5_LAKH")]
    TwoHalfToFiveLakh,
    #[serde(rename = "5_TO_10_LAKH")]
    FiveToTenLakh,
    #[serde(rename = "ABOVE_10_LAKH")]
    AboveTenLakh,
}

impl IncomeBracket {
    pub const ALL: &'static [IncomeBracket] = &[
        IncomeBracket::BelowOneLakh,
        IncomeBracket::OneToTwoHalfLakh,
        IncomeBracket::TwoHalfToFiveLakh,
        IncomeBracket::FiveToTenLakh,
        IncomeBracket::AboveTenLakh,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            IncomeBracket::BelowOneLakh => "BELOW_1_LAKH",
            IncomeBracket::OneToTwoHalfLakh => "1_TO_2_5_LAKH",
            IncomeBracket::TwoHalfToFiveLakh => "2_5_TO_5_LAKH",
            IncomeBracket::FiveToTenLakh => "5_TO_10_LAKH",
            IncomeBracket::AboveTenLakh => "ABOVE_10_LAKH",
        }
    }
}

impl FromStr for IncomeBracket {
    type Err = UnknownEnumValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        IncomeBracket::ALL
            .iter()
            .copied()
            .find(|bracket| bracket.label() == normalized)
            .ok_or_else(|| UnknownEnumValue::new("income bracket", value))
    }
}

impl fmt::Display for IncomeBracket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownEnumValue {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownEnumValue {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Loosely typed profile attribute targeted by custom scheme conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileValue {
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl ProfileValue {
    pub const fn kind(&self) -> &'static str {
        match self {
            ProfileValue::Flag(_) => "a flag",
            ProfileValue::Number(_) => "a number",
            ProfileValue::Text(_) => "text",
            ProfileValue::List(_) => "a list",
        }
    }
}

/// Eligibility-relevant fixed profile fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Age,
    State,
    Gender,
    IncomeBracket,
}

impl ProfileField {
    pub const fn label(self) -> &'static str {
        match self {
            ProfileField::Age => "age",
            ProfileField::State => "state",
            ProfileField::Gender => "gender",
            ProfileField::IncomeBracket => "income_bracket",
        }
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Profile validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("profile is missing {}", join_fields(.missing))]
    Incomplete { missing: Vec<ProfileField> },
    #[error("age {0} is outside the supported range 1-120")]
    AgeOutOfRange(u8),
}

fn join_fields(fields: &[ProfileField]) -> String {
    fields
        .iter()
        .map(|field| field.label())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Stored profile as captured by the profile form; fixed fields stay optional until completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub age: Option<u8>,
    pub state: Option<StateCode>,
    pub gender: Option<Gender>,
    pub income_bracket: Option<IncomeBracket>,
    #[serde(default)]
    pub attributes: BTreeMap<String, ProfileValue>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            age: None,
            state: None,
            gender: None,
            income_bracket: None,
            attributes: BTreeMap::new(),
            updated_at: None,
        }
    }

    pub fn missing_fields(&self) -> Vec<ProfileField> {
        let mut missing = Vec::new();
        if self.age.is_none() {
            missing.push(ProfileField::Age);
        }
        if self.state.is_none() {
            missing.push(ProfileField::State);
        }
        if self.gender.is_none() {
            missing.push(ProfileField::Gender);
        }
        if self.income_bracket.is_none() {
            missing.push(ProfileField::IncomeBracket);
        }
        missing
    }

    /// Apply a partial update and report whether any eligibility input changed.
    pub fn apply(&mut self, update: ProfileUpdate) -> Result<bool, ProfileError> {
        if let Some(age) = update.age {
            validate_age(age)?;
        }

        let mut changed = false;
        changed |= replace_if_some(&mut self.age, update.age);
        changed |= replace_if_some(&mut self.state, update.state);
        changed |= replace_if_some(&mut self.gender, update.gender);
        changed |= replace_if_some(&mut self.income_bracket, update.income_bracket);

        if let Some(attributes) = update.attributes {
            for (key, value) in attributes {
                match value {
                    Some(value) => {
                        if self.attributes.get(&key) != Some(&value) {
                            self.attributes.insert(key, value);
                            changed = true;
                        }
                    }
                    None => changed |= self.attributes.remove(&key).is_some(),
                }
            }
        }

        self.updated_at = Some(Utc::now());
        Ok(changed)
    }
}

fn replace_if_some<T: PartialEq>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match value {
        Some(value) if slot.as_ref() != Some(&value) => {
            *slot = Some(value);
            true
        }
        _ => false,
    }
}

fn validate_age(age: u8) -> Result<(), ProfileError> {
    if (MIN_AGE..=MAX_AGE).contains(&age) {
        Ok(())
    } else {
        Err(ProfileError::AgeOutOfRange(age))
    }
}

/// Partial profile mutation; `None` leaves a field untouched. A `null` attribute removes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub state: Option<StateCode>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub income_bracket: Option<IncomeBracket>,
    #[serde(default)]
    pub attributes: Option<BTreeMap<String, Option<ProfileValue>>>,
}

/// Complete, validated snapshot of a profile that the engine evaluates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilityProfile {
    pub user_id: UserId,
    pub age: u8,
    pub state: StateCode,
    pub gender: Gender,
    pub income_bracket: IncomeBracket,
    pub attributes: BTreeMap<String, ProfileValue>,
}

impl EligibilityProfile {
    /// Resolve a field by name; fixed fields are addressable alongside free-form attributes.
    pub fn field(&self, name: &str) -> Option<ProfileValue> {
        match name {
            "age" => Some(ProfileValue::Number(f64::from(self.age))),
            "state" => Some(ProfileValue::Text(self.state.code().to_string())),
            "gender" => Some(ProfileValue::Text(self.gender.label().to_string())),
            "income_bracket" | "incomeBracket" => {
                Some(ProfileValue::Text(self.income_bracket.label().to_string()))
            }
            other => self.attributes.get(other).cloned(),
        }
    }
}

impl TryFrom<&UserProfile> for EligibilityProfile {
    type Error = ProfileError;

    fn try_from(profile: &UserProfile) -> Result<Self, Self::Error> {
        match (
            profile.age,
            profile.state,
            profile.gender,
            profile.income_bracket,
        ) {
            (Some(age), Some(state), Some(gender), Some(income_bracket)) => {
                validate_age(age)?;
                Ok(Self {
                    user_id: profile.user_id.clone(),
                    age,
                    state,
                    gender,
                    income_bracket,
                    attributes: profile.attributes.clone(),
                })
            }
            _ => Err(ProfileError::Incomplete {
                missing: profile.missing_fields(),
            }),
        }
    }
}

/// Distinguishes nationwide programs from region-scoped ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchemeLevel {
    Central,
    #[default]
    State,
}

/// Operand of an `equals` condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionValue::Flag(flag) => write!(f, "{flag}"),
            ConditionValue::Number(number) => write!(f, "{number}"),
            ConditionValue::Text(text) => write!(f, "\"{text}\""),
        }
    }
}

/// Typed custom condition; each operator carries the operand kind it compares with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operator", rename_all = "camelCase")]
pub enum CustomCondition {
    Equals { field: String, value: ConditionValue },
    Contains { field: String, value: String },
    GreaterThan { field: String, value: f64 },
    LessThan { field: String, value: f64 },
}

impl CustomCondition {
    pub fn field(&self) -> &str {
        match self {
            CustomCondition::Equals { field, .. }
            | CustomCondition::Contains { field, .. }
            | CustomCondition::GreaterThan { field, .. }
            | CustomCondition::LessThan { field, .. } => field,
        }
    }

    pub const fn operator(&self) -> &'static str {
        match self {
            CustomCondition::Equals { .. } => "equals",
            CustomCondition::Contains { .. } => "contains",
            CustomCondition::GreaterThan { .. } => "greaterThan",
            CustomCondition::LessThan { .. } => "lessThan",
        }
    }

    pub fn label(&self) -> String {
        match self {
            CustomCondition::Equals { field, value } => format!("{field} equals {value}"),
            CustomCondition::Contains { field, value } => format!("{field} contains \"{value}\""),
            CustomCondition::GreaterThan { field, value } => {
                format!("{field} greater than {value}")
            }
            CustomCondition::LessThan { field, value } => format!("{field} less than {value}"),
        }
    }
}

/// Eligibility rules attached 1:1 to a scheme. Absent constraints never exclude.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemeEligibilityCriteria {
    pub age_min: Option<u8>,
    pub age_max: Option<u8>,
    pub states: Option<BTreeSet<StateCode>>,
    pub genders: Option<BTreeSet<Gender>>,
    pub income_brackets: Option<BTreeSet<IncomeBracket>>,
    pub custom_conditions: Vec<CustomCondition>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scheme {
    pub id: SchemeId,
    pub name: String,
    pub level: SchemeLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub criteria: SchemeEligibilityCriteria,
}

/// Criterion problems caught at catalog ingest or while comparing a profile field.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedCriterion {
    #[error("unknown operator '{operator}' on field '{field}'")]
    UnknownOperator { field: String, operator: String },
    #[error("operator '{operator}' on field '{field}' cannot use operand {operand}")]
    InvalidOperand {
        field: String,
        operator: String,
        operand: String,
    },
    #[error("field '{field}' holds {found}, which '{operator}' cannot compare")]
    IncomparableField {
        field: String,
        operator: &'static str,
        found: &'static str,
    },
    #[error("operator '{operator}' is missing a field name")]
    MissingField { operator: String },
    #[error("scheme has neither an id nor a name to derive one from")]
    MissingId,
    #[error("age bounds {min}-{max} can never be satisfied")]
    InvertedAgeRange { min: u8, max: u8 },
    #[error("unrecognized {0}")]
    UnknownValue(#[from] UnknownEnumValue),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial_profile() -> UserProfile {
        let mut profile = UserProfile::new(UserId("u-1".to_string()));
        profile.age = Some(30);
        profile.state = Some(StateCode::Kerala);
        profile
    }

    #[test]
    fn state_codes_cover_states_and_territories() {
        assert_eq!(StateCode::ALL.len(), 36);
        assert_eq!("gj".parse::<StateCode>(), Ok(StateCode::Gujarat));
        assert!("ZZ".parse::<StateCode>().is_err());
    }

    #[test]
    fn income_brackets_are_ordered_and_parse_labels() {
        assert!(IncomeBracket::BelowOneLakh < IncomeBracket::AboveTenLakh);
        assert_eq!(
            "2_5_to_5_lakh".parse::<IncomeBracket>(),
            Ok(IncomeBracket::TwoHalfToFiveLakh)
        );
        let json = serde_json::to_string(&IncomeBracket::OneToTwoHalfLakh).expect("serializes");
        assert_eq!(json, "\"1_TO_2_5_LAKH\"");
    }

    #[test]
    fn snapshot_reports_every_missing_field() {
        match EligibilityProfile::try_from(&partial_profile()) {
            Err(ProfileError::Incomplete { missing }) => {
                assert_eq!(missing, vec![ProfileField::Gender, ProfileField::IncomeBracket]);
            }
            other => panic!("expected incomplete profile, got {other:?}"),
        }
    }

    #[test]
    fn apply_rejects_out_of_range_age_without_mutating() {
        let mut profile = partial_profile();
        let update = ProfileUpdate {
            age: Some(121),
            state: Some(StateCode::Goa),
            ..ProfileUpdate::default()
        };

        assert_eq!(profile.apply(update), Err(ProfileError::AgeOutOfRange(121)));
        assert_eq!(profile.state, Some(StateCode::Kerala));
    }

    #[test]
    fn apply_reports_only_real_changes() {
        let mut profile = partial_profile();
        let unchanged = ProfileUpdate {
            age: Some(30),
            ..ProfileUpdate::default()
        };
        assert_eq!(profile.apply(unchanged), Ok(false));

        let mut attributes = BTreeMap::new();
        attributes.insert(
            "occupation".to_string(),
            Some(ProfileValue::Text("farmer".to_string())),
        );
        let changed = ProfileUpdate {
            attributes: Some(attributes),
            ..ProfileUpdate::default()
        };
        assert_eq!(profile.apply(changed), Ok(true));

        let mut removal = BTreeMap::new();
        removal.insert("occupation".to_string(), None);
        let removed = ProfileUpdate {
            attributes: Some(removal),
            ..ProfileUpdate::default()
        };
        assert_eq!(profile.apply(removed), Ok(true));
        assert!(profile.attributes.is_empty());
    }

    #[test]
    fn fixed_fields_resolve_by_name() {
        let mut profile = partial_profile();
        profile.gender = Some(Gender::Female);
        profile.income_bracket = Some(IncomeBracket::BelowOneLakh);
        let snapshot = EligibilityProfile::try_from(&profile).expect("complete profile");

        assert_eq!(snapshot.field("age"), Some(ProfileValue::Number(30.0)));
        assert_eq!(
            snapshot.field("state"),
            Some(ProfileValue::Text("KL".to_string()))
        );
        assert_eq!(snapshot.field("occupation"), None);
    }
}
