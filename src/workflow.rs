//! Steps of a conversion run. Each step takes the [`Session`] explicitly;
//! keeping it between steps is up to the caller.

use crate::config::Config;
use crate::converter::{parse_measure_lines, Converter, MeasureDefinition, StatusRecord};
use crate::data_store::{DataStoreClient, DataStoreError, Dialect, Row, Statement};
use crate::metric_view::{
    DocumentAssembler, MetricDocument, MetricViewError, SourcePolicy, TableRef,
};
use log::{debug, info, warn};
use rand::Rng;
use thiserror::Error;

const MEASURE_ID_RANGE: std::ops::Range<i32> = 10_000..100_000;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Failed to query table {table}: {source}")]
    Preview {
        table: TableRef,
        source: DataStoreError,
    },

    #[error("Insertion failed: {0}")]
    Insert(#[source] DataStoreError),

    #[error("Failed to read DAX measures from {table}: {source}")]
    ReadMeasures {
        table: TableRef,
        source: DataStoreError,
    },

    #[error("Failed to create metric view {view}: {source}")]
    CreateView {
        view: TableRef,
        source: DataStoreError,
    },

    #[error("No source table has been validated")]
    NoSourceTable,

    #[error("No DAX expressions found in {0}")]
    NoMeasures(TableRef),

    #[error("No metric view has been generated")]
    NothingToCreate,

    #[error("{0} does not support metric views, use a Databricks data store")]
    MetricViewsUnsupported(Dialect),

    #[error(transparent)]
    MetricView(#[from] MetricViewError),

    #[error("Failed to serialize metric view: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// State carried between steps.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Source table, set once its preview succeeded.
    pub source_table: Option<TableRef>,
    /// Where entered measures are stored.
    pub measures_table: Option<TableRef>,
    /// Views produced by the last generation, awaiting registration.
    pub pending_views: Vec<PendingView>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingView {
    pub view: TableRef,
    pub document: MetricDocument,
    pub yaml: String,
}

/// Destination of the generated metric view(s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewTarget {
    pub view: TableRef,
    pub policy: SourcePolicy,
}

impl ViewTarget {
    pub fn new(view: TableRef, policy: SourcePolicy) -> Self {
        Self { view, policy }
    }

    /// A single document takes the view name as is; each of several is
    /// suffixed with its source table.
    fn view_for(&self, document: &MetricDocument, count: usize) -> Result<TableRef, MetricViewError> {
        if count == 1 {
            return Ok(self.view.clone());
        }
        self.view
            .sibling(&format!("{}_{}", self.view.table, document.source_table()))
    }
}

#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub statuses: Vec<StatusRecord>,
    pub views: Vec<PendingView>,
    pub folded_sources: Vec<String>,
    pub converted: usize,
    pub skipped: usize,
    /// Why no view was generated, when none was.
    pub notice: Option<String>,
}

impl GenerationReport {
    /// Status table as pretty JSON, one object per measure.
    pub fn status_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.statuses)
    }

    /// Human readable summary followed by the YAML of every view.
    pub fn render(&self) -> Result<String, serde_json::Error> {
        let mut out = self.status_json()?;
        out.push_str(&format!(
            "\n\n{} of {} expression(s) converted\n",
            self.converted,
            self.converted + self.skipped
        ));
        if let Some(notice) = &self.notice {
            out.push_str(notice);
            out.push('\n');
        }
        for pending in &self.views {
            out.push_str(&format!("\n# {}\n{}", pending.view, pending.yaml));
        }
        Ok(out)
    }
}

pub struct Workflow<D> {
    store: D,
    converter: Converter,
    measures_table_name: String,
}

impl<D> Workflow<D>
where
    D: DataStoreClient,
{
    pub fn new(store: D, converter: Converter, measures_table_name: impl Into<String>) -> Self {
        Self {
            store,
            converter,
            measures_table_name: measures_table_name.into(),
        }
    }

    pub fn from_config(store: D, config: &Config) -> Self {
        Self::new(store, config.converter(), config.measures_table.clone())
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    /// Fetches sample rows from `table`; on success the table becomes the
    /// session's source.
    pub async fn validate_table(
        &self,
        session: &mut Session,
        table: &TableRef,
    ) -> Result<Vec<Row>, WorkflowError> {
        session.source_table = None;
        let rows = self
            .store
            .run_query(&Statement::sample_rows(table))
            .await
            .map_err(|source| WorkflowError::Preview {
                table: table.clone(),
                source,
            })?;

        info!("Successfully connected to table: {}", table);
        session.measures_table = Some(table.sibling(&self.measures_table_name)?);
        session.source_table = Some(table.clone());
        Ok(rows)
    }

    /// Stores `name: expression` lines and returns the stored measure rows.
    pub async fn insert_measures(
        &self,
        session: &mut Session,
        input: &str,
    ) -> Result<Vec<Row>, WorkflowError> {
        let table = session
            .measures_table
            .clone()
            .ok_or(WorkflowError::NoSourceTable)?;
        let definitions = parse_measure_lines(input);

        self.store
            .execute(&Statement::CreateMeasureTable {
                table: table.clone(),
            })
            .await
            .map_err(WorkflowError::Insert)?;

        for definition in &definitions {
            let id = rand::rng().random_range(MEASURE_ID_RANGE);
            self.store
                .execute(&Statement::InsertMeasure {
                    table: table.clone(),
                    id,
                    name: definition.name.clone(),
                    expression: definition.expression.clone(),
                })
                .await
                .map_err(WorkflowError::Insert)?;
        }
        info!("{} DAX measure(s) inserted into {}", definitions.len(), table);

        self.store
            .run_query(&Statement::SelectMeasures { table })
            .await
            .map_err(WorkflowError::Insert)
    }

    /// Rebuilds the metric view document(s) from every stored measure.
    ///
    /// When nothing converts the report has no views and the session's
    /// pending views are cleared.
    pub async fn generate(
        &self,
        session: &mut Session,
        target: &ViewTarget,
    ) -> Result<GenerationReport, WorkflowError> {
        session.pending_views.clear();
        let table = session
            .measures_table
            .clone()
            .ok_or(WorkflowError::NoSourceTable)?;

        let rows = self
            .store
            .run_query(&Statement::SelectMeasures {
                table: table.clone(),
            })
            .await
            .map_err(|source| WorkflowError::ReadMeasures {
                table: table.clone(),
                source,
            })?;
        if rows.is_empty() {
            return Err(WorkflowError::NoMeasures(table));
        }

        let definitions: Vec<MeasureDefinition> = rows.iter().map(definition_from_row).collect();
        let conversions = self.converter.convert_all(&definitions);
        let statuses: Vec<StatusRecord> =
            conversions.iter().map(|c| c.status_record()).collect();

        let assembler = DocumentAssembler::new(&target.view.catalog, &target.view.schema)
            .with_policy(target.policy)
            .with_fallback_source(session.source_table.as_ref());
        let assembly = match assembler.assemble(&conversions) {
            Ok(assembly) => assembly,
            Err(
                e @ (MetricViewError::NoConvertibleMeasures | MetricViewError::UnresolvedSource),
            ) => {
                info!("No metric view generated: {}", e);
                let converted = conversions.iter().filter(|c| c.is_converted()).count();
                return Ok(GenerationReport {
                    statuses,
                    views: Vec::new(),
                    folded_sources: Vec::new(),
                    converted,
                    skipped: conversions.len() - converted,
                    notice: Some(e.to_string()),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let count = assembly.documents.len();
        let mut views = Vec::with_capacity(count);
        for document in assembly.documents {
            let view = target.view_for(&document, count)?;
            let yaml = document.to_yaml()?;
            views.push(PendingView {
                view,
                document,
                yaml,
            });
        }
        info!(
            "{} measure(s) converted, {} skipped, {} view(s) generated",
            assembly.converted, assembly.skipped, count
        );

        session.pending_views = views.clone();
        Ok(GenerationReport {
            statuses,
            views,
            folded_sources: assembly.folded_sources,
            converted: assembly.converted,
            skipped: assembly.skipped,
            notice: None,
        })
    }

    /// Registers every pending view. Stops at the first failure; stores
    /// whose dialect has no metric views are refused up front.
    pub async fn create_views(&self, session: &Session) -> Result<Vec<TableRef>, WorkflowError> {
        if session.pending_views.is_empty() {
            return Err(WorkflowError::NothingToCreate);
        }
        let dialect = self.store.dialect();
        if !dialect.supports_metric_views() {
            return Err(WorkflowError::MetricViewsUnsupported(dialect));
        }

        let mut created = Vec::with_capacity(session.pending_views.len());
        for pending in &session.pending_views {
            self.store
                .execute(&Statement::CreateMetricView {
                    view: pending.view.clone(),
                    yaml: pending.yaml.clone(),
                })
                .await
                .map_err(|source| WorkflowError::CreateView {
                    view: pending.view.clone(),
                    source,
                })?;
            info!("Metric View '{}' created successfully", pending.view);
            created.push(pending.view.clone());
        }
        Ok(created)
    }

    /// Runs every step for `config`: preview the source, store the measures
    /// from `measures_input` when given, generate, and optionally register.
    pub async fn run(
        &self,
        config: &Config,
        measures_input: Option<&str>,
    ) -> Result<(Session, GenerationReport), WorkflowError> {
        let mut session = Session::default();
        let source = config.source()?;
        let preview = self.validate_table(&mut session, &source).await?;
        info!("Preview of {} returned {} row(s)", source, preview.len());
        debug!(
            "Sample rows: {}",
            serde_json::to_string(&preview).unwrap_or_default()
        );

        match measures_input {
            Some(input) => {
                let stored = self.insert_measures(&mut session, input).await?;
                info!("{} measure row(s) stored", stored.len());
            }
            None => info!("No measures entered, using stored measures"),
        }

        let target = config.view_target()?;
        let report = self.generate(&mut session, &target).await?;
        if !report.folded_sources.is_empty() {
            warn!(
                "Measures on {} were folded into a single document",
                report.folded_sources.join(", ")
            );
        }

        if config.create_view && !report.views.is_empty() {
            self.create_views(&session).await?;
        }
        Ok((session, report))
    }
}

fn definition_from_row(row: &Row) -> MeasureDefinition {
    let text = |column: &str| row.get(column).map(ToString::to_string).unwrap_or_default();
    MeasureDefinition::new(text("measure"), text("dax"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ConversionStatus;
    use crate::data_store::{LocalDataStore, Value};
    use rstest::{fixture, rstest};

    fn source() -> TableRef {
        "main.sales.orders".parse().unwrap()
    }

    fn target() -> ViewTarget {
        ViewTarget::new(
            "main.sales.my_metric_view".parse().unwrap(),
            SourcePolicy::FirstSeen,
        )
    }

    #[fixture]
    fn workflow() -> Workflow<LocalDataStore> {
        let row = Row::new(vec!["order_id".to_string()], vec![Value::Int(1)]);
        let store = LocalDataStore::new().with_table(&source(), vec![row]);
        Workflow::new(store, Converter::default(), "dax_measures")
    }

    #[rstest]
    #[tokio::test]
    async fn test_validate_table_sets_session(workflow: Workflow<LocalDataStore>) {
        let mut session = Session::default();
        let rows = workflow.validate_table(&mut session, &source()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(session.source_table, Some(source()));
        assert_eq!(
            session.measures_table.unwrap().to_string(),
            "main.sales.dax_measures"
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_validate_missing_table_clears_session(workflow: Workflow<LocalDataStore>) {
        let mut session = Session {
            source_table: Some(source()),
            ..Session::default()
        };
        let missing: TableRef = "main.sales.missing".parse().unwrap();
        let result = workflow.validate_table(&mut session, &missing).await;
        assert!(matches!(result, Err(WorkflowError::Preview { .. })));
        assert_eq!(session.source_table, None);
    }

    #[rstest]
    #[tokio::test]
    async fn test_steps_require_source(workflow: Workflow<LocalDataStore>) {
        let mut session = Session::default();
        assert!(matches!(
            workflow.insert_measures(&mut session, "a: SUM(Sales[Amount])").await,
            Err(WorkflowError::NoSourceTable)
        ));
        assert!(matches!(
            workflow.generate(&mut session, &target()).await,
            Err(WorkflowError::NoSourceTable)
        ));
        assert!(matches!(
            workflow.create_views(&session).await,
            Err(WorkflowError::NothingToCreate)
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_insert_and_generate(workflow: Workflow<LocalDataStore>) {
        let mut session = Session::default();
        workflow.validate_table(&mut session, &source()).await.unwrap();

        let stored = workflow
            .insert_measures(
                &mut session,
                "total_sales: CALCULATE(SUM(Sales[Amount]))\n\
                 skipped line\n\
                 rank: RANKX(Sales, Sales[Amount])\n\
                 rolling: CALCULATE(SUM(Sales[Amount]), DATEADD(Calendar[Date], -30, DAY))",
            )
            .await
            .unwrap();
        assert_eq!(stored.len(), 3);

        let report = workflow.generate(&mut session, &target()).await.unwrap();
        assert_eq!(report.converted, 2);
        assert_eq!(report.skipped, 1);
        let statuses: Vec<ConversionStatus> = report.statuses.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                ConversionStatus::Converted,
                ConversionStatus::NotConverted,
                ConversionStatus::Converted
            ]
        );

        assert_eq!(report.views.len(), 1);
        let view = &report.views[0];
        assert_eq!(view.view.to_string(), "main.sales.my_metric_view");
        assert_eq!(view.document.source, "main.sales.Sales");
        assert!(view.yaml.contains("trailing 30 DAY"));
        assert_eq!(session.pending_views, report.views);
    }

    #[rstest]
    #[tokio::test]
    async fn test_generate_without_stored_rows(workflow: Workflow<LocalDataStore>) {
        let mut session = Session::default();
        workflow.validate_table(&mut session, &source()).await.unwrap();
        workflow.insert_measures(&mut session, "").await.unwrap();
        assert!(matches!(
            workflow.generate(&mut session, &target()).await,
            Err(WorkflowError::NoMeasures(_))
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_generate_with_nothing_convertible(workflow: Workflow<LocalDataStore>) {
        let mut session = Session::default();
        workflow.validate_table(&mut session, &source()).await.unwrap();
        workflow
            .insert_measures(&mut session, "rank: RANKX(Sales, Sales[Amount])")
            .await
            .unwrap();
        let report = workflow.generate(&mut session, &target()).await.unwrap();
        assert!(report.views.is_empty());
        assert_eq!(report.skipped, 1);
        assert_eq!(report.notice.as_deref(), Some("No convertible expressions found"));
        assert!(session.pending_views.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn test_tableless_measures_use_source_table(workflow: Workflow<LocalDataStore>) {
        let mut session = Session::default();
        workflow.validate_table(&mut session, &source()).await.unwrap();
        workflow
            .insert_measures(&mut session, "today: TODAY()\nnow: NOW()")
            .await
            .unwrap();
        let report = workflow.generate(&mut session, &target()).await.unwrap();
        assert_eq!(report.converted, 2);
        assert_eq!(report.notice, None);
        assert_eq!(report.views.len(), 1);
        assert_eq!(report.views[0].document.source, "main.sales.orders");
        assert_eq!(report.views[0].document.measures[0].expr, "current_date()");
    }

    #[rstest]
    #[tokio::test]
    async fn test_unresolved_source_keeps_report(workflow: Workflow<LocalDataStore>) {
        let mut session = Session::default();
        workflow.validate_table(&mut session, &source()).await.unwrap();
        workflow
            .insert_measures(&mut session, "today: TODAY()\nbroken: FOO(1)")
            .await
            .unwrap();
        session.source_table = None;

        let report = workflow.generate(&mut session, &target()).await.unwrap();
        assert!(report.views.is_empty());
        assert_eq!(report.converted, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.statuses.len(), 2);
        assert_eq!(report.statuses[0].mapped_expression, "current_date()");
        assert_eq!(
            report.notice.as_deref(),
            Some("No source table could be inferred from the measures")
        );
        assert!(report
            .render()
            .unwrap()
            .contains("No source table could be inferred from the measures"));
        assert!(session.pending_views.is_empty());
    }

    #[rstest]
    #[case::postgres(Dialect::Postgres)]
    #[case::snowflake(Dialect::Snowflake)]
    #[tokio::test]
    async fn test_create_views_needs_metric_view_support(#[case] dialect: Dialect) {
        let row = Row::new(vec!["order_id".to_string()], vec![Value::Int(1)]);
        let store = LocalDataStore::new()
            .with_dialect(dialect)
            .with_table(&source(), vec![row]);
        let workflow = Workflow::new(store, Converter::default(), "dax_measures");

        let mut session = Session::default();
        workflow.validate_table(&mut session, &source()).await.unwrap();
        workflow
            .insert_measures(&mut session, "total: SUM(Sales[Amount])")
            .await
            .unwrap();
        workflow.generate(&mut session, &target()).await.unwrap();

        let before = workflow.store().statements().len();
        let error = workflow.create_views(&session).await.unwrap_err();
        assert!(matches!(error, WorkflowError::MetricViewsUnsupported(d) if d == dialect));
        assert_eq!(workflow.store().statements().len(), before);
    }

    #[rstest]
    #[tokio::test]
    async fn test_per_table_views_are_suffixed(workflow: Workflow<LocalDataStore>) {
        let mut session = Session::default();
        workflow.validate_table(&mut session, &source()).await.unwrap();
        workflow
            .insert_measures(
                &mut session,
                "sales: SUM(Sales[Amount])\nreturns: SUM(Returns[Amount])",
            )
            .await
            .unwrap();
        let target = ViewTarget::new(
            "main.sales.metrics".parse().unwrap(),
            SourcePolicy::PerTable,
        );
        let report = workflow.generate(&mut session, &target).await.unwrap();
        let views: Vec<String> = report.views.iter().map(|v| v.view.to_string()).collect();
        assert_eq!(
            views,
            vec!["main.sales.metrics_Sales", "main.sales.metrics_Returns"]
        );

        let created = workflow.create_views(&session).await.unwrap();
        assert_eq!(created.len(), 2);
        assert!(workflow.store().view(&created[1]).unwrap().contains("returns"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_report_rendering(workflow: Workflow<LocalDataStore>) {
        let mut session = Session::default();
        workflow.validate_table(&mut session, &source()).await.unwrap();
        workflow
            .insert_measures(&mut session, "total: SUM(Sales[Amount])")
            .await
            .unwrap();
        let report = workflow.generate(&mut session, &target()).await.unwrap();
        let rendered = report.render().unwrap();
        assert!(rendered.contains("\"Measure Name\": \"total\""));
        assert!(rendered.contains("\"Mapped Expression\": \"sum(Amount)\""));
        assert!(rendered.contains("1 of 1 expression(s) converted"));
        assert!(rendered.contains("# main.sales.my_metric_view\nversion: 0.1"));
    }

    #[test_log::test(tokio::test)]
    async fn test_external_failure_is_terminal() {
        let workflow = Workflow::new(LocalDataStore::offline(), Converter::default(), "dax_measures");
        let mut session = Session::default();
        let error = workflow
            .validate_table(&mut session, &source())
            .await
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "Failed to query table main.sales.orders: Connection error: local data store is offline"
        );
    }
}
