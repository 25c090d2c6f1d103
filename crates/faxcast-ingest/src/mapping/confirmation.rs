//! Editable column mappings that the user confirms before a list is processed.

use super::classifier::{classify, classify_block_list};
use crate::error::{IngestError, Result};
use crate::types::{ColumnMapping, HeaderSet};
use serde::{Deserialize, Serialize};

/// Fields of a recipient mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingField {
    /// Required.
    FaxNumber,
    /// Optional; unset means the column is ignored.
    ToHeader,
}

impl MappingField {
    pub fn label(&self) -> &'static str {
        match self {
            Self::FaxNumber => "fax_number",
            Self::ToHeader => "to_header",
        }
    }
}

/// A frozen recipient mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedMapping {
    pub mapping: ColumnMapping,
    pub has_international: bool,
}

/// Mapping form for a recipient list.
#[derive(Debug, Clone)]
pub struct MappingForm {
    headers: HeaderSet,
    fax_number: Option<String>,
    to_header: Option<String>,
    has_international: bool,
    auto_mapped: bool,
}

impl MappingForm {
    /// New form pre-filled by the header classifier.
    pub fn seeded(headers: HeaderSet) -> Self {
        let guess = classify(&headers);
        let auto_mapped = guess.has_fax_number();
        Self {
            fax_number: guess.has_fax_number().then_some(guess.fax_number),
            to_header: guess.to_header,
            has_international: false,
            auto_mapped,
            headers,
        }
    }

    /// Re-open a confirmed mapping for editing. The classifier is not consulted.
    pub fn reopen(headers: HeaderSet, confirmed: &ConfirmedMapping) -> Self {
        let mapping = &confirmed.mapping;
        Self {
            fax_number: mapping.has_fax_number().then(|| mapping.fax_number.clone()),
            to_header: mapping.to_header.clone(),
            has_international: confirmed.has_international,
            auto_mapped: false,
            headers,
        }
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    /// Assign `field` to a header, or clear it with `None`.
    pub fn set_column(&mut self, field: MappingField, header: Option<&str>) -> Result<()> {
        let value = match header {
            Some(name) if !self.headers.contains(name) => {
                return Err(IngestError::ColumnNotFound(name.to_string()));
            }
            Some(name) => Some(name.to_string()),
            None => None,
        };
        match field {
            MappingField::FaxNumber => self.fax_number = value,
            MappingField::ToHeader => self.to_header = value,
        }
        Ok(())
    }

    pub fn column(&self, field: MappingField) -> Option<&str> {
        match field {
            MappingField::FaxNumber => self.fax_number.as_deref(),
            MappingField::ToHeader => self.to_header.as_deref(),
        }
    }

    pub fn toggle_international(&mut self, has_international: bool) {
        self.has_international = has_international;
    }

    pub fn has_international(&self) -> bool {
        self.has_international
    }

    /// True when the classifier found the fax column on its own.
    pub fn auto_mapped(&self) -> bool {
        self.auto_mapped
    }

    pub fn confirm(&self) -> Result<ConfirmedMapping> {
        let fax_number = self
            .fax_number
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                IngestError::MissingRequiredField(MappingField::FaxNumber.label().to_string())
            })?;

        Ok(ConfirmedMapping {
            mapping: ColumnMapping::new(fax_number, self.to_header.clone()),
            has_international: self.has_international,
        })
    }
}

/// Single-field mapping form for block lists.
#[derive(Debug, Clone)]
pub struct BlockListMappingForm {
    headers: HeaderSet,
    fax_number: Option<String>,
}

impl BlockListMappingForm {
    pub fn seeded(headers: HeaderSet) -> Self {
        let fax_number = classify_block_list(&headers);
        Self {
            headers,
            fax_number,
        }
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    pub fn fax_column(&self) -> Option<&str> {
        self.fax_number.as_deref()
    }

    pub fn set_fax_column(&mut self, header: Option<&str>) -> Result<()> {
        if let Some(name) = header
            && !self.headers.contains(name)
        {
            return Err(IngestError::ColumnNotFound(name.to_string()));
        }
        self.fax_number = header.map(str::to_string);
        Ok(())
    }

    pub fn confirm(&self) -> Result<ColumnMapping> {
        match self.fax_number.as_deref() {
            Some(name) if !name.is_empty() => Ok(ColumnMapping::fax_only(name)),
            _ => Err(IngestError::MissingRequiredField(
                MappingField::FaxNumber.label().to_string(),
            )),
        }
    }
}
