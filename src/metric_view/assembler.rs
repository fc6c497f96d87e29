use super::model::{MeasureOutput, MetricDocument, TableRef};
use super::MetricViewError;
use crate::converter::MeasureConversion;
use log::{debug, warn};
use std::fmt;
use std::str::FromStr;

/// How measures referencing different tables are grouped into documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourcePolicy {
    /// One document; its source is the first table resolved across all
    /// measures, and measures on other tables are folded into it.
    #[default]
    FirstSeen,
    /// One document per distinct table, in first-seen order.
    PerTable,
}

impl FromStr for SourcePolicy {
    type Err = MetricViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first-seen" | "first_seen" => Ok(SourcePolicy::FirstSeen),
            "per-table" | "per_table" => Ok(SourcePolicy::PerTable),
            _ => Err(MetricViewError::UnknownSourcePolicy(s.to_string())),
        }
    }
}

impl fmt::Display for SourcePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourcePolicy::FirstSeen => f.write_str("first-seen"),
            SourcePolicy::PerTable => f.write_str("per-table"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    pub documents: Vec<MetricDocument>,
    /// Sources of emitted measures that differ from their document's source.
    pub folded_sources: Vec<String>,
    pub converted: usize,
    pub skipped: usize,
}

/// Builds metric documents from converted measures.
///
/// Source tables are qualified with the assembler's catalog and schema.
#[derive(Debug, Clone)]
pub struct DocumentAssembler {
    catalog: String,
    schema: String,
    policy: SourcePolicy,
    fallback_source: Option<String>,
}

impl DocumentAssembler {
    pub fn new(catalog: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            schema: schema.into(),
            policy: SourcePolicy::default(),
            fallback_source: None,
        }
    }

    /// Source used when no measure names a table, e.g. `TODAY()` alone.
    pub fn with_fallback_source(mut self, source: Option<&TableRef>) -> Self {
        self.fallback_source = source.map(ToString::to_string);
        self
    }

    pub fn with_policy(mut self, policy: SourcePolicy) -> Self {
        self.policy = policy;
        self
    }

    fn resolve(&self, conversion: &MeasureConversion) -> Option<String> {
        conversion
            .primary_source()
            .map(|table| format!("{}.{}.{}", self.catalog, self.schema, table))
    }

    pub fn assemble(&self, conversions: &[MeasureConversion]) -> Result<Assembly, MetricViewError> {
        let included: Vec<&MeasureConversion> =
            conversions.iter().filter(|c| c.is_converted()).collect();
        let converted = included.len();
        let skipped = conversions.len() - converted;
        if included.is_empty() {
            return Err(MetricViewError::NoConvertibleMeasures);
        }

        let first_source = conversions
            .iter()
            .find_map(|c| self.resolve(c))
            .or_else(|| self.fallback_source.clone())
            .ok_or(MetricViewError::UnresolvedSource)?;

        // (source, members) in first-seen order
        let mut groups: Vec<(String, Vec<&MeasureConversion>)> = Vec::new();
        let mut folded_sources: Vec<String> = Vec::new();
        for conversion in included {
            let source = self.resolve(conversion);
            let key = match (self.policy, &source) {
                (SourcePolicy::PerTable, Some(source)) => source.clone(),
                (SourcePolicy::PerTable, None) => groups
                    .first()
                    .map(|(source, _)| source.clone())
                    .unwrap_or_else(|| first_source.clone()),
                (SourcePolicy::FirstSeen, _) => first_source.clone(),
            };
            if let Some(source) = source {
                if source != key && !folded_sources.contains(&source) {
                    warn!(
                        "Measure {} reads {} but is emitted into the document for {}",
                        conversion.name(),
                        source,
                        key
                    );
                    folded_sources.push(source);
                }
            }
            match groups.iter_mut().find(|(source, _)| *source == key) {
                Some((_, members)) => members.push(conversion),
                None => groups.push((key, vec![conversion])),
            }
        }

        let documents = groups
            .into_iter()
            .map(|(source, members)| build_document(source, &members))
            .collect();

        Ok(Assembly {
            documents,
            folded_sources,
            converted,
            skipped,
        })
    }
}

fn build_document(source: String, members: &[&MeasureConversion]) -> MetricDocument {
    let mut document = MetricDocument::new(source);
    for conversion in members {
        let Some(translation) = conversion.translation() else {
            continue;
        };
        if let Some(dimension) = translation.dimension() {
            document.push_dimension(dimension.clone());
        }
        document.push_measure(MeasureOutput {
            name: conversion.name().to_string(),
            expr: translation.expression.clone(),
            window: translation.window().map(|window| vec![window.clone()]),
        });
    }
    debug!(
        "Document for {} has {} measure(s) and {} dimension(s)",
        document.source,
        document.measures.len(),
        document.dimensions.len()
    );
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{Converter, MeasureDefinition};
    use rstest::{fixture, rstest};

    fn convert(measures: &[(&str, &str)]) -> Vec<MeasureConversion> {
        let definitions: Vec<MeasureDefinition> = measures
            .iter()
            .map(|(name, expression)| MeasureDefinition::new(*name, *expression))
            .collect();
        Converter::default().convert_all(&definitions)
    }

    #[fixture]
    fn assembler() -> DocumentAssembler {
        DocumentAssembler::new("main", "sales")
    }

    #[rstest]
    fn test_single_document(assembler: DocumentAssembler) {
        let conversions = convert(&[
            ("total_sales", "CALCULATE(SUM(Sales[Amount]))"),
            ("rank", "RANKX(Sales, Sales[Amount])"),
            (
                "rolling_sales",
                "CALCULATE(SUM(Sales[Amount]), DATEADD(Calendar[Date], -30, DAY))",
            ),
        ]);
        let assembly = assembler.assemble(&conversions).unwrap();
        assert_eq!(assembly.converted, 2);
        assert_eq!(assembly.skipped, 1);
        assert!(assembly.folded_sources.is_empty());
        assert_eq!(assembly.documents.len(), 1);

        let document = &assembly.documents[0];
        assert_eq!(document.version, 0.1);
        assert_eq!(document.source, "main.sales.Sales");
        assert_eq!(document.dimensions.len(), 1);
        assert_eq!(document.dimensions[0].name, "Calendar_Date");
        let names: Vec<&str> = document.measures.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["total_sales", "rolling_sales"]);
        assert!(document.measures[0].window.is_none());
        assert_eq!(document.measures[1].window.as_ref().unwrap().len(), 1);
    }

    #[rstest]
    fn test_measure_count_matches_converted(assembler: DocumentAssembler) {
        let conversions = convert(&[
            ("a", "SUM(Sales[Amount])"),
            ("b", "IF(Sales[Amount] > 1, 1, 0)"),
            ("c", "CALCULATE(AVERAGE(Sales[Price]))"),
            ("d", "COUNTROWS(Sales)"),
            ("e", "TODAY()"),
        ]);
        let expected = conversions.iter().filter(|c| c.is_converted()).count();
        let assembly = assembler.assemble(&conversions).unwrap();
        let emitted: usize = assembly.documents.iter().map(|d| d.measures.len()).sum();
        assert_eq!(emitted, expected);
        assert_eq!(expected, 3);
    }

    #[rstest]
    fn test_shared_time_shift_dimension_is_deduplicated(assembler: DocumentAssembler) {
        let conversions = convert(&[
            ("a", "CALCULATE(SUM(Sales[Amount]), DATEADD(Calendar[Date], -30, DAY))"),
            ("b", "CALCULATE(MAX(Sales[Amount]), DATEADD(Calendar[Date], 7, DAY))"),
            ("c", "CALCULATE(MIN(Sales[Amount]), DATEADD(Calendar[Date], -1, MONTH))"),
        ]);
        let document = &assembler.assemble(&conversions).unwrap().documents[0];
        let exprs: Vec<&str> = document.dimensions.iter().map(|d| d.expr.as_str()).collect();
        assert_eq!(
            exprs,
            vec!["date_trunc('DAY', Date)", "date_trunc('MONTH', Date)"]
        );
    }

    #[rstest]
    fn test_first_seen_folds_other_tables(assembler: DocumentAssembler) {
        let conversions = convert(&[
            ("bad", "RANKX(Returns, Returns[Amount])"),
            ("sales", "SUM(Sales[Amount])"),
            ("returns", "SUM(Returns[Amount])"),
        ]);
        let assembly = assembler.assemble(&conversions).unwrap();
        assert_eq!(assembly.documents.len(), 1);
        assert_eq!(assembly.documents[0].source, "main.sales.Returns");
        assert_eq!(assembly.documents[0].measures.len(), 2);
        assert_eq!(assembly.folded_sources, vec!["main.sales.Sales"]);
    }

    #[rstest]
    fn test_per_table_policy(assembler: DocumentAssembler) {
        let conversions = convert(&[
            ("sales", "SUM(Sales[Amount])"),
            ("returns", "SUM(Returns[Amount])"),
            ("today", "TODAY()"),
            ("avg_sales", "AVERAGE(Sales[Amount])"),
        ]);
        let assembly = assembler
            .with_policy(SourcePolicy::PerTable)
            .assemble(&conversions)
            .unwrap();
        assert!(assembly.folded_sources.is_empty());
        let layout: Vec<(&str, Vec<&str>)> = assembly
            .documents
            .iter()
            .map(|d| {
                (
                    d.source.as_str(),
                    d.measures.iter().map(|m| m.name.as_str()).collect(),
                )
            })
            .collect();
        assert_eq!(
            layout,
            vec![
                ("main.sales.Sales", vec!["sales", "today", "avg_sales"]),
                ("main.sales.Returns", vec!["returns"]),
            ]
        );
    }

    #[rstest]
    fn test_nothing_convertible(assembler: DocumentAssembler) {
        let conversions = convert(&[("rank", "RANKX(Sales, Sales[Amount])")]);
        assert_eq!(
            assembler.assemble(&conversions),
            Err(MetricViewError::NoConvertibleMeasures)
        );
    }

    #[rstest]
    fn test_unresolved_source(assembler: DocumentAssembler) {
        let conversions = convert(&[("now", "NOW()")]);
        assert_eq!(
            assembler.assemble(&conversions),
            Err(MetricViewError::UnresolvedSource)
        );
    }

    #[rstest]
    fn test_fallback_source_when_no_table_named(assembler: DocumentAssembler) {
        let conversions = convert(&[("now", "NOW()"), ("today", "TODAY()")]);
        let orders: TableRef = "main.sales.orders".parse().unwrap();
        let assembly = assembler
            .with_fallback_source(Some(&orders))
            .assemble(&conversions)
            .unwrap();
        assert_eq!(assembly.converted, 2);
        assert_eq!(assembly.documents.len(), 1);
        assert_eq!(assembly.documents[0].source, "main.sales.orders");
        assert_eq!(assembly.documents[0].measures.len(), 2);
    }

    #[rstest]
    fn test_named_table_beats_fallback(assembler: DocumentAssembler) {
        let conversions = convert(&[("now", "NOW()"), ("sales", "SUM(Sales[Amount])")]);
        let orders: TableRef = "main.sales.orders".parse().unwrap();
        let assembly = assembler
            .with_fallback_source(Some(&orders))
            .assemble(&conversions)
            .unwrap();
        assert_eq!(assembly.documents[0].source, "main.sales.Sales");
    }

    #[rstest]
    fn test_assembly_is_idempotent(assembler: DocumentAssembler) {
        let measures = [
            ("a", "CALCULATE(SUM(Sales[Amount]), DATEADD(Calendar[Date], -30, DAY))"),
            ("b", "SUM(Returns[Amount])"),
            ("c", "MAX(Sales[Amount])"),
        ];
        let first = assembler.assemble(&convert(&measures)).unwrap();
        let second = assembler.assemble(&convert(&measures)).unwrap();
        assert_eq!(
            first.documents[0].to_yaml().unwrap(),
            second.documents[0].to_yaml().unwrap()
        );
    }

    #[rstest]
    #[case::dash("first-seen", SourcePolicy::FirstSeen)]
    #[case::underscore("PER_TABLE", SourcePolicy::PerTable)]
    fn test_policy_from_str(#[case] input: &str, #[case] expected: SourcePolicy) {
        assert_eq!(input.parse::<SourcePolicy>().unwrap(), expected);
        assert_eq!(expected.to_string().parse::<SourcePolicy>().unwrap(), expected);
    }

    #[test]
    fn test_policy_rejects_unknown() {
        assert!("grouped".parse::<SourcePolicy>().is_err());
    }
}
