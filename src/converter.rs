use crate::dax::{self, source_tables, DaxError, Token, Translation, Validator};
use crate::metric_view::{DimensionDescriptor, WindowDescriptor};
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;

/// Placeholder shown in place of a mapped expression for rejected measures.
pub const NOT_SUPPORTED: &str = "[NOT_SUPPORTED]";

/// A named DAX measure as entered by the user or read back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasureDefinition {
    pub name: String,
    pub expression: String,
}

impl MeasureDefinition {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

/// Parses `name: expression` lines. Lines without a colon are skipped; only
/// the first colon separates the name.
pub fn parse_measure_lines(input: &str) -> Vec<MeasureDefinition> {
    input
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(name, expression)| MeasureDefinition::new(name.trim(), expression.trim()))
        .filter(|definition| !definition.name.is_empty())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConversionStatus {
    Converted,
    #[serde(rename = "Not Converted")]
    NotConverted,
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionStatus::Converted => f.write_str("Converted"),
            ConversionStatus::NotConverted => f.write_str("Not Converted"),
        }
    }
}

/// Outcome of running one measure through validation and translation.
#[derive(Debug, Clone)]
pub struct MeasureConversion {
    pub definition: MeasureDefinition,
    pub tokens: Vec<Token>,
    /// Candidate source tables in first-seen order.
    pub source_tables: Vec<String>,
    pub result: Result<Translation, DaxError>,
}

impl MeasureConversion {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Translation that can be emitted: supported and non-empty.
    pub fn translation(&self) -> Option<&Translation> {
        self.result
            .as_ref()
            .ok()
            .filter(|t| t.supported && !t.expression.is_empty())
    }

    pub fn is_converted(&self) -> bool {
        self.translation().is_some()
    }

    pub fn expression(&self) -> Option<&str> {
        self.translation().map(|t| t.expression.as_str())
    }

    pub fn dimension(&self) -> Option<&DimensionDescriptor> {
        self.translation().and_then(Translation::dimension)
    }

    pub fn window(&self) -> Option<&WindowDescriptor> {
        self.translation().and_then(Translation::window)
    }

    /// The table the measure is attributed to when several are referenced.
    pub fn primary_source(&self) -> Option<&str> {
        self.source_tables.first().map(String::as_str)
    }

    pub fn status(&self) -> ConversionStatus {
        if self.is_converted() {
            ConversionStatus::Converted
        } else {
            ConversionStatus::NotConverted
        }
    }

    /// Rejection reason, or a note when the window could not be derived.
    pub fn reason(&self) -> Option<String> {
        match &self.result {
            Err(e) => Some(e.to_string()),
            Ok(translation) => match &translation.time_shift {
                dax::TimeShift::Unavailable { reason } => {
                    Some(format!("partial: window unavailable ({})", reason))
                }
                _ => None,
            },
        }
    }

    pub fn status_record(&self) -> StatusRecord {
        StatusRecord {
            measure_name: self.definition.name.clone(),
            expression: self.definition.expression.clone(),
            tokens: self
                .tokens
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            mapped_expression: self.expression().unwrap_or(NOT_SUPPORTED).to_string(),
            source: self.primary_source().unwrap_or_default().to_string(),
            status: self.status(),
            reason: self.reason().unwrap_or_default(),
        }
    }
}

/// Per-measure row of the conversion report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRecord {
    #[serde(rename = "Measure Name")]
    pub measure_name: String,
    #[serde(rename = "DAX")]
    pub expression: String,
    #[serde(rename = "Tokens")]
    pub tokens: String,
    #[serde(rename = "Mapped Expression")]
    pub mapped_expression: String,
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Status")]
    pub status: ConversionStatus,
    #[serde(rename = "Reason")]
    pub reason: String,
}

/// Runs measures through the validator and then the translator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Converter {
    validator: Validator,
}

impl Converter {
    pub fn new(validator: Validator) -> Self {
        Self { validator }
    }

    pub fn convert(&self, definition: &MeasureDefinition) -> MeasureConversion {
        let tokens = dax::tokenize(&definition.expression);
        let source_tables = source_tables(&tokens);

        let result = self
            .validator
            .validate(&definition.expression)
            .and_then(|()| {
                let translation = dax::translate(&definition.expression);
                if translation.supported && !translation.expression.is_empty() {
                    Ok(translation)
                } else {
                    Err(DaxError::UnsupportedExpression(
                        definition.expression.trim().to_string(),
                    ))
                }
            });

        match &result {
            Ok(translation) => debug!(
                "Measure {} translated to {}",
                definition.name, translation.expression
            ),
            Err(e) => warn!("Measure {} not converted: {}", definition.name, e),
        }

        MeasureConversion {
            definition: definition.clone(),
            tokens,
            source_tables,
            result,
        }
    }

    /// Converts every measure; a failing measure never stops the others.
    pub fn convert_all(&self, definitions: &[MeasureDefinition]) -> Vec<MeasureConversion> {
        let conversions: Vec<MeasureConversion> =
            definitions.iter().map(|d| self.convert(d)).collect();
        let converted = conversions.iter().filter(|c| c.is_converted()).count();
        info!(
            "{} of {} measure(s) converted, {} skipped",
            converted,
            conversions.len(),
            conversions.len() - converted
        );
        conversions
    }
}
