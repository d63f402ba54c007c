use super::domain::{RawFields, Submission, SubmissionKind};

/// One schema column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub required: bool,
}

impl FieldSpec {
    pub fn required(name: &str) -> Self {
        Self {
            name: name.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str) -> Self {
        Self {
            name: name.to_string(),
            required: false,
        }
    }
}

/// Ordered column list for a submission kind. Column order is the row order
/// written to the record sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionSchema {
    pub kind: SubmissionKind,
    pub columns: Vec<FieldSpec>,
    pub requires_attachment: bool,
}

impl SubmissionSchema {
    pub fn contact() -> Self {
        Self {
            kind: SubmissionKind::Contact,
            columns: vec![
                FieldSpec::required("name"),
                FieldSpec::required("email"),
                FieldSpec::required("phone"),
                FieldSpec::optional("service"),
                FieldSpec::required("message"),
            ],
            requires_attachment: false,
        }
    }

    pub fn enquiry() -> Self {
        Self {
            kind: SubmissionKind::Enquiry,
            columns: vec![
                FieldSpec::required("name"),
                FieldSpec::required("email"),
                FieldSpec::required("phone"),
                FieldSpec::optional("subject"),
            ],
            requires_attachment: true,
        }
    }

    /// Replace the required set. Columns not named become optional; names the
    /// schema does not know yet are appended as required columns.
    pub fn with_required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect();

        for column in &mut self.columns {
            column.required = names.contains(&column.name);
        }
        for name in names {
            if !self.columns.iter().any(|column| column.name == name) {
                self.columns.push(FieldSpec::required(&name));
            }
        }
        self
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|column| column.required)
            .map(|column| column.name.as_str())
    }

    /// Check raw fields against the schema. Reports every missing required
    /// field in column order rather than stopping at the first.
    pub fn validate(&self, raw: &RawFields) -> Result<Submission, ValidationError> {
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut missing_fields = Vec::new();

        for column in &self.columns {
            let value = raw
                .get(&column.name)
                .map(|value| value.trim())
                .unwrap_or("");
            if column.required && value.is_empty() {
                missing_fields.push(column.name.clone());
            }
            fields.push((column.name.clone(), value.to_string()));
        }

        if missing_fields.is_empty() {
            Ok(Submission::new(self.kind, fields))
        } else {
            Err(ValidationError { missing_fields })
        }
    }
}

/// Schema registry keyed by submission kind.
#[derive(Debug, Clone)]
pub struct Validator {
    contact: SubmissionSchema,
    enquiry: SubmissionSchema,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(SubmissionSchema::contact(), SubmissionSchema::enquiry())
    }
}

impl Validator {
    pub fn new(contact: SubmissionSchema, enquiry: SubmissionSchema) -> Self {
        Self { contact, enquiry }
    }

    pub fn schema(&self, kind: SubmissionKind) -> &SubmissionSchema {
        match kind {
            SubmissionKind::Contact => &self.contact,
            SubmissionKind::Enquiry => &self.enquiry,
        }
    }

    pub fn validate(
        &self,
        kind: SubmissionKind,
        raw: &RawFields,
    ) -> Result<Submission, ValidationError> {
        self.schema(kind).validate(raw)
    }
}

/// Submission is missing one or more required fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing required fields: {}", .missing_fields.join(", "))]
pub struct ValidationError {
    pub missing_fields: Vec<String>,
}
