//! Raw records as returned by the page database, and the typed property
//! values decoded from them.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while decoding a record's property blocks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    /// The remote schema grew a property type we do not model.
    #[error("field `{field}` has unmodeled property type `{kind}`")]
    SchemaDrift { field: String, kind: String },

    #[error("field `{field}` is missing")]
    MissingField { field: String },

    #[error("field `{field}` is malformed: {reason}")]
    Malformed { field: String, reason: String },
}

/// Container-level metadata for a database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerMetadata {
    pub last_edited_time: String,
}

/// One page of a database listing, before any interpretation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawRecord {
    pub id: String,
    pub last_edited_time: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub in_trash: bool,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl RawRecord {
    /// Trashed or archived records are treated as if they did not exist.
    pub fn is_hidden(&self) -> bool {
        self.archived || self.in_trash
    }

    /// Decode every property block. Any unmodeled type fails the whole record.
    pub fn decode(&self) -> Result<Properties, PropertyError> {
        let mut fields = BTreeMap::new();
        for (name, value) in &self.properties {
            fields.insert(name.clone(), PropertyValue::decode(name, value)?);
        }
        Ok(Properties { fields })
    }
}

/// A file attached to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub name: String,
    pub url: String,
}

impl FileRef {
    /// Extension taken from the uploaded file name, as-is.
    pub fn extension(&self) -> Option<&str> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
    }
}

/// Typed value of one property block, keyed by its declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Title(Option<String>),
    RichText(Option<String>),
    Select(Option<String>),
    Status(Option<String>),
    Url(Option<String>),
    Email(Option<String>),
    PhoneNumber(Option<String>),
    Date {
        start: Option<String>,
        end: Option<String>,
    },
    Relation(Vec<String>),
    Files(Vec<FileRef>),
    LastEditedTime(String),
}

// Wire shapes for the individual property bodies.

#[derive(Debug, Deserialize)]
struct RichTextSegment {
    #[serde(default)]
    plain_text: String,
}

#[derive(Debug, Deserialize)]
struct SelectOption {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DateRange {
    start: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelationRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    name: String,
    #[serde(flatten)]
    source: FileSource,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum FileSource {
    File { file: HostedFile },
    External { external: HostedFile },
}

#[derive(Debug, Deserialize)]
struct HostedFile {
    url: String,
}

impl PropertyValue {
    pub fn decode(field: &str, value: &Value) -> Result<Self, PropertyError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| PropertyError::Malformed {
                field: field.to_string(),
                reason: "missing `type` tag".to_string(),
            })?;
        let body = value.get(kind).unwrap_or(&Value::Null);

        let decoded = match kind {
            "title" => PropertyValue::Title(join_segments(parse_body(field, body)?)),
            "rich_text" => PropertyValue::RichText(join_segments(parse_body(field, body)?)),
            "select" => {
                let option: Option<SelectOption> = parse_body(field, body)?;
                PropertyValue::Select(option.map(|o| o.name))
            }
            "status" => {
                let option: Option<SelectOption> = parse_body(field, body)?;
                PropertyValue::Status(option.map(|o| o.name))
            }
            "url" => PropertyValue::Url(parse_body(field, body)?),
            "email" => PropertyValue::Email(parse_body(field, body)?),
            "phone_number" => PropertyValue::PhoneNumber(parse_body(field, body)?),
            "date" => {
                let range: Option<DateRange> = parse_body(field, body)?;
                match range {
                    Some(range) => PropertyValue::Date {
                        start: range.start,
                        end: range.end,
                    },
                    None => PropertyValue::Date {
                        start: None,
                        end: None,
                    },
                }
            }
            "relation" => {
                let refs: Vec<RelationRef> = parse_body(field, body)?;
                PropertyValue::Relation(refs.into_iter().map(|r| r.id).collect())
            }
            "files" => {
                let files: Vec<RawFile> = parse_body(field, body)?;
                PropertyValue::Files(
                    files
                        .into_iter()
                        .map(|f| FileRef {
                            name: f.name,
                            url: match f.source {
                                FileSource::File { file } => file.url,
                                FileSource::External { external } => external.url,
                            },
                        })
                        .collect(),
                )
            }
            "last_edited_time" => PropertyValue::LastEditedTime(parse_body(field, body)?),
            other => {
                return Err(PropertyError::SchemaDrift {
                    field: field.to_string(),
                    kind: other.to_string(),
                })
            }
        };
        Ok(decoded)
    }

    fn kind(&self) -> &'static str {
        match self {
            PropertyValue::Title(_) => "title",
            PropertyValue::RichText(_) => "rich_text",
            PropertyValue::Select(_) => "select",
            PropertyValue::Status(_) => "status",
            PropertyValue::Url(_) => "url",
            PropertyValue::Email(_) => "email",
            PropertyValue::PhoneNumber(_) => "phone_number",
            PropertyValue::Date { .. } => "date",
            PropertyValue::Relation(_) => "relation",
            PropertyValue::Files(_) => "files",
            PropertyValue::LastEditedTime(_) => "last_edited_time",
        }
    }
}

fn parse_body<T: DeserializeOwned>(field: &str, body: &Value) -> Result<T, PropertyError> {
    T::deserialize(body).map_err(|e| PropertyError::Malformed {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

fn join_segments(segments: Option<Vec<RichTextSegment>>) -> Option<String> {
    let text: String = segments
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.plain_text)
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Decoded property blocks of a single record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    fields: BTreeMap<String, PropertyValue>,
}

impl Properties {
    fn get(&self, field: &str) -> Result<&PropertyValue, PropertyError> {
        self.fields.get(field).ok_or_else(|| PropertyError::MissingField {
            field: field.to_string(),
        })
    }

    fn unexpected(field: &str, expected: &str, found: &PropertyValue) -> PropertyError {
        PropertyError::Malformed {
            field: field.to_string(),
            reason: format!("expected {}, found {}", expected, found.kind()),
        }
    }

    /// Scalar text of a title, rich text, select, status, url, email, phone
    /// number or last-edited field.
    pub fn text(&self, field: &str) -> Result<Option<String>, PropertyError> {
        match self.get(field)? {
            PropertyValue::Title(v)
            | PropertyValue::RichText(v)
            | PropertyValue::Select(v)
            | PropertyValue::Status(v)
            | PropertyValue::Url(v)
            | PropertyValue::Email(v)
            | PropertyValue::PhoneNumber(v) => Ok(v.clone()),
            PropertyValue::LastEditedTime(v) => Ok(Some(v.clone())),
            other => Err(Self::unexpected(field, "a text field", other)),
        }
    }

    /// Like [`Properties::text`], but a column that does not exist reads as
    /// empty instead of failing.
    pub fn optional_text(&self, field: &str) -> Result<Option<String>, PropertyError> {
        if self.fields.contains_key(field) {
            self.text(field)
        } else {
            Ok(None)
        }
    }

    pub fn date(&self, field: &str) -> Result<(Option<String>, Option<String>), PropertyError> {
        match self.get(field)? {
            PropertyValue::Date { start, end } => Ok((start.clone(), end.clone())),
            other => Err(Self::unexpected(field, "a date", other)),
        }
    }

    pub fn relation(&self, field: &str) -> Result<&[String], PropertyError> {
        match self.get(field)? {
            PropertyValue::Relation(ids) => Ok(ids),
            other => Err(Self::unexpected(field, "a relation", other)),
        }
    }

    pub fn files(&self, field: &str) -> Result<&[FileRef], PropertyError> {
        match self.get(field)? {
            PropertyValue::Files(files) => Ok(files),
            other => Err(Self::unexpected(field, "a file list", other)),
        }
    }
}
