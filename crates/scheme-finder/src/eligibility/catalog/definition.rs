use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::super::domain::{
    ConditionValue, CustomCondition, MalformedCriterion, Scheme, SchemeEligibilityCriteria,
    SchemeId, SchemeLevel, UnknownEnumValue,
};

/// Scheme as supplied by a catalog source, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeDefinition {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub level: SchemeLevel,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "ageMin")]
    pub age_min: Option<u8>,
    #[serde(default, alias = "ageMax")]
    pub age_max: Option<u8>,
    #[serde(default)]
    pub states: Option<Vec<String>>,
    #[serde(default)]
    pub genders: Option<Vec<String>>,
    #[serde(default, alias = "incomeBrackets")]
    pub income_brackets: Option<Vec<String>>,
    #[serde(default, alias = "customConditions")]
    pub custom_conditions: Vec<RawCustomCondition>,
}

/// Untyped `(field, operator, value)` triple as stored by catalog authors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCustomCondition {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

/// One entry of a catalog as read from its source.
///
/// Entries that fail to decode keep whatever identity could be recovered so ingest can
/// report them alongside the schemes that did load.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEntry {
    Definition(SchemeDefinition),
    Unreadable {
        scheme_id: SchemeId,
        name: String,
        reason: String,
    },
}

impl CatalogEntry {
    /// Decode one element of a JSON catalog array; `position` is 1-based.
    pub fn from_value(value: Value, position: usize) -> Self {
        let id = value.get("id").and_then(Value::as_str).map(str::to_string);
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match serde_json::from_value::<SchemeDefinition>(value) {
            Ok(definition) => Self::Definition(definition),
            Err(error) => Self::unreadable(id.as_deref(), name, position, error.to_string()),
        }
    }

    pub fn unreadable(
        id: Option<&str>,
        name: impl Into<String>,
        position: usize,
        reason: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let scheme_id = match id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => match slugify(&name) {
                slug if slug.is_empty() => format!("entry-{position}"),
                slug => slug,
            },
        };

        Self::Unreadable {
            scheme_id: SchemeId(scheme_id),
            name,
            reason: reason.into(),
        }
    }

    pub fn definition(&self) -> Option<&SchemeDefinition> {
        match self {
            Self::Definition(definition) => Some(definition),
            Self::Unreadable { .. } => None,
        }
    }
}

impl From<SchemeDefinition> for CatalogEntry {
    fn from(definition: SchemeDefinition) -> Self {
        Self::Definition(definition)
    }
}

impl SchemeDefinition {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            level: SchemeLevel::default(),
            category: None,
            age_min: None,
            age_max: None,
            states: None,
            genders: None,
            income_brackets: None,
            custom_conditions: Vec::new(),
        }
    }

    pub fn scheme_id(&self) -> SchemeId {
        match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => SchemeId(id.to_string()),
            _ => SchemeId(slugify(&self.name)),
        }
    }

    /// Validate and type every constraint so evaluation never sees an unknown operator.
    pub fn compile(&self) -> Result<Scheme, MalformedCriterion> {
        let id = self.scheme_id();
        if id.0.is_empty() {
            return Err(MalformedCriterion::MissingId);
        }

        if let (Some(min), Some(max)) = (self.age_min, self.age_max) {
            if min > max {
                return Err(MalformedCriterion::InvertedAgeRange { min, max });
            }
        }

        let mut states = parse_set(self.states.as_deref())?;
        if self.level == SchemeLevel::Central && states.is_some() {
            debug!(scheme_id = %id, "dropping state scope from central scheme");
            states = None;
        }

        let custom_conditions = self
            .custom_conditions
            .iter()
            .map(RawCustomCondition::compile)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Scheme {
            id,
            name: self.name.trim().to_string(),
            level: self.level,
            category: self.category.clone(),
            criteria: SchemeEligibilityCriteria {
                age_min: self.age_min,
                age_max: self.age_max,
                states,
                genders: parse_set(self.genders.as_deref())?,
                income_brackets: parse_set(self.income_brackets.as_deref())?,
                custom_conditions,
            },
        })
    }
}

impl RawCustomCondition {
    pub fn compile(&self) -> Result<CustomCondition, MalformedCriterion> {
        let field = self.field.trim().to_string();
        if field.is_empty() {
            return Err(MalformedCriterion::MissingField {
                operator: self.operator.clone(),
            });
        }

        match normalize_operator(&self.operator).as_str() {
            "equals" => {
                let value = match &self.value {
                    Value::String(text) => ConditionValue::Text(text.clone()),
                    Value::Bool(flag) => ConditionValue::Flag(*flag),
                    Value::Number(number) => match number.as_f64() {
                        Some(number) => ConditionValue::Number(number),
                        None => return Err(self.invalid_operand()),
                    },
                    _ => return Err(self.invalid_operand()),
                };
                Ok(CustomCondition::Equals { field, value })
            }
            "contains" => match &self.value {
                Value::String(text) => Ok(CustomCondition::Contains {
                    field,
                    value: text.clone(),
                }),
                _ => Err(self.invalid_operand()),
            },
            "greaterthan" => Ok(CustomCondition::GreaterThan {
                field,
                value: self.numeric_operand()?,
            }),
            "lessthan" => Ok(CustomCondition::LessThan {
                field,
                value: self.numeric_operand()?,
            }),
            _ => Err(MalformedCriterion::UnknownOperator {
                field,
                operator: self.operator.clone(),
            }),
        }
    }

    fn numeric_operand(&self) -> Result<f64, MalformedCriterion> {
        let number = match &self.value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        number
            .filter(|number| number.is_finite())
            .ok_or_else(|| self.invalid_operand())
    }

    fn invalid_operand(&self) -> MalformedCriterion {
        MalformedCriterion::InvalidOperand {
            field: self.field.clone(),
            operator: self.operator.clone(),
            operand: self.value.to_string(),
        }
    }
}

fn normalize_operator(operator: &str) -> String {
    operator
        .trim()
        .chars()
        .filter(|ch| *ch != '_')
        .collect::<String>()
        .to_ascii_lowercase()
}

// Empty sets mean "unconstrained", so they collapse to `None`.
fn parse_set<T>(values: Option<&[String]>) -> Result<Option<BTreeSet<T>>, MalformedCriterion>
where
    T: FromStr<Err = UnknownEnumValue> + Ord,
{
    let Some(values) = values else {
        return Ok(None);
    };

    let parsed = values
        .iter()
        .filter(|value| !value.trim().is_empty())
        .map(|value| value.parse::<T>())
        .collect::<Result<BTreeSet<T>, _>>()?;

    Ok(if parsed.is_empty() { None } else { Some(parsed) })
}

// Non-ASCII letters and combining marks are kept as written.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() || !(ch.is_ascii() || ch.is_whitespace() || is_separator(ch)) {
            slug.extend(ch.to_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

fn is_separator(ch: char) -> bool {
    matches!(ch, '\u{0964}' | '\u{0965}' | '\u{2010}'..='\u{2015}' | '\u{2018}'..='\u{201F}')
}
