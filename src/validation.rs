//! Validation of the `file` form part.
//!
//! Validation runs before anything touches the disk or the database, so a
//! failed check never leaves state behind.

use crate::storage::{SUFFIX_LEN, UPLOAD_DIR, split_name};
use sanitize_filename::sanitize;
use serde::ser::{Serialize, SerializeMap, Serializer};

pub const FILE_FIELD: &str = "file";

/// Key for errors that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Longest accepted filename, matching the `file` column width.
pub const MAX_NAME_LENGTH: usize = 100;

/// A `file` part as it came off the wire, before any checks.
#[derive(Debug, Clone, Default)]
pub struct FilePart {
    /// `None` when the part had no `filename` parameter, i.e. a plain text field.
    pub filename: Option<String>,
    pub data: Vec<u8>,
    /// Set when reading stopped because the upload limit was crossed.
    pub exceeded_limit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidFile {
    pub name: String,
    pub data: Vec<u8>,
}

/// Ordered field/message pairs. Serializes as `{"field": ["msg", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<(String, String)>);

impl ValidationErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.push((field.to_string(), message.into()));
    }

    pub fn messages(&self, field: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(f, _)| f == field)
            .map(|(_, m)| m.as_str())
            .collect()
    }
}

impl Serialize for ValidationErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut fields: Vec<&str> = Vec::new();
        for (field, _) in &self.0 {
            if !fields.contains(&field.as_str()) {
                fields.push(field);
            }
        }
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for field in fields {
            map.serialize_entry(field, &self.messages(field))?;
        }
        map.end()
    }
}

/// Turns a client supplied filename into something safe to store.
///
/// Only the last path component survives, whitespace becomes `_` and
/// characters that are reserved on common filesystems are dropped.
pub fn clean_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let spaced: String = base
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    sanitize(spaced)
}

/// Whether `uploads/<stem>_<suffix><ext>` can hold at least one character of
/// the stem, so a clash can always be resolved within the column width.
fn fits_upload_dir(name: &str) -> bool {
    let (_, ext) = split_name(name);
    UPLOAD_DIR.len() + 1 + 1 + 1 + SUFFIX_LEN + ext.chars().count() <= MAX_NAME_LENGTH
}

pub fn validate_upload(part: Option<FilePart>, max_upload_size: usize) -> Result<ValidFile, ValidationErrors> {
    let part = part.ok_or_else(|| ValidationErrors::single(FILE_FIELD, "No file was submitted."))?;
    let raw_name = match part.filename {
        // Browsers send an empty filename when no file was picked.
        Some(name) if name.is_empty() => {
            return Err(ValidationErrors::single(FILE_FIELD, "No file was submitted."));
        }
        Some(name) => name,
        None => {
            return Err(ValidationErrors::single(
                FILE_FIELD,
                "The submitted data was not a file. Check the encoding type on the form.",
            ));
        }
    };

    let name = clean_filename(&raw_name);
    if name.is_empty() {
        return Err(ValidationErrors::single(FILE_FIELD, "No filename could be determined."));
    }
    if part.data.is_empty() && !part.exceeded_limit {
        return Err(ValidationErrors::single(FILE_FIELD, "The submitted file is empty."));
    }
    let name_len = name.chars().count();
    if name_len > MAX_NAME_LENGTH {
        return Err(ValidationErrors::single(
            FILE_FIELD,
            format!("Ensure this filename has at most {MAX_NAME_LENGTH} characters (it has {name_len})."),
        ));
    }
    if part.exceeded_limit || part.data.len() > max_upload_size {
        return Err(ValidationErrors::single(
            FILE_FIELD,
            format!("Ensure this file is at most {max_upload_size} bytes."),
        ));
    }
    if !fits_upload_dir(&name) {
        return Err(ValidationErrors::single(
            FILE_FIELD,
            format!(
                "Storage can not find an available filename for \"{UPLOAD_DIR}/{name}\". \
                 Please make sure that the corresponding file field allows sufficient \"max_length\"."
            ),
        ));
    }

    Ok(ValidFile { name, data: part.data })
}
