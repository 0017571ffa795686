use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::super::domain::SchemeLevel;
use super::definition::{CatalogEntry, RawCustomCondition, SchemeDefinition};
use super::CatalogIngestError;

/// Loads scheme definitions from JSON arrays or flat CSV exports.
///
/// Only an unreadable container fails the import. Each array element or CSV row is decoded
/// on its own and comes back as [`CatalogEntry::Unreadable`] when it does not fit.
pub struct CatalogImporter;

impl CatalogImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<CatalogEntry>, CatalogIngestError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let file = std::fs::File::open(path)?;
        match extension.as_str() {
            "json" => Self::from_json_reader(file),
            "csv" => Self::from_csv_reader(file),
            other => Err(CatalogIngestError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<Vec<CatalogEntry>, CatalogIngestError> {
        let values: Vec<Value> = serde_json::from_reader(reader)?;
        Ok(Self::from_json_values(values))
    }

    pub fn from_json_values(values: Vec<Value>) -> Vec<CatalogEntry> {
        values
            .into_iter()
            .enumerate()
            .map(|(index, value)| CatalogEntry::from_value(value, index + 1))
            .collect()
    }

    /// One scheme per row. Set columns are `;` separated and custom conditions are written
    /// as `field|operator|value` entries, also `;` separated.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Vec<CatalogEntry>, CatalogIngestError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let headers = csv_reader.headers()?.clone();
        let mut entries = Vec::new();

        for (index, record) in csv_reader.byte_records().enumerate() {
            let position = index + 1;
            let entry = match StringRecord::from_byte_record(record?) {
                Ok(record) => match record.deserialize::<CatalogRow>(Some(&headers)) {
                    Ok(row) => CatalogEntry::Definition(row.into_definition()),
                    Err(error) => CatalogEntry::unreadable(
                        column(&headers, &record, "id"),
                        column(&headers, &record, "name").unwrap_or_default(),
                        position,
                        error.to_string(),
                    ),
                },
                Err(error) => CatalogEntry::unreadable(None, "", position, error.to_string()),
            };
            entries.push(entry);
        }

        Ok(entries)
    }
}

fn column<'r>(headers: &StringRecord, record: &'r StringRecord, name: &str) -> Option<&'r str> {
    headers
        .iter()
        .position(|header| header == name)
        .and_then(|index| record.get(index))
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    id: Option<String>,
    name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    level: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    category: Option<String>,
    #[serde(default)]
    age_min: Option<u8>,
    #[serde(default)]
    age_max: Option<u8>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    states: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    genders: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    income_brackets: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    conditions: Option<String>,
}

impl CatalogRow {
    fn into_definition(self) -> SchemeDefinition {
        let level = match self.level.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("central") => SchemeLevel::Central,
            _ => SchemeLevel::State,
        };

        SchemeDefinition {
            id: self.id,
            name: self.name,
            level,
            category: self.category,
            age_min: self.age_min,
            age_max: self.age_max,
            states: self.states.as_deref().map(split_list),
            genders: self.genders.as_deref().map(split_list),
            income_brackets: self.income_brackets.as_deref().map(split_list),
            custom_conditions: self
                .conditions
                .as_deref()
                .map(parse_conditions)
                .unwrap_or_default(),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

// Entries with a missing part keep an empty operator so ingest rejects the scheme.
fn parse_conditions(raw: &str) -> Vec<RawCustomCondition> {
    split_list(raw)
        .into_iter()
        .map(|entry| {
            let mut parts = entry.splitn(3, '|').map(str::trim);
            let field = parts.next().unwrap_or_default().to_string();
            let operator = parts.next().unwrap_or_default().to_string();
            let value = parts.next().map(cell_value).unwrap_or(Value::Null);
            RawCustomCondition {
                field,
                operator,
                value,
            }
        })
        .collect()
}

fn cell_value(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
