use crate::converter::Converter;
use crate::dax::validator::Validator;
use crate::metric_view::{MetricViewError, SourcePolicy, TableRef};
use crate::workflow::ViewTarget;
use envconfig::Envconfig;
use log::debug;
use std::num::NonZeroUsize;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "SOURCE_CATALOG")]
    pub source_catalog: String,

    #[envconfig(from = "SOURCE_SCHEMA")]
    pub source_schema: String,

    #[envconfig(from = "SOURCE_TABLE")]
    pub source_table: String,

    /// Table, next to the source table, that stores the entered measures.
    #[envconfig(from = "MEASURES_TABLE", default = "dax_measures")]
    pub measures_table: String,

    /// File with one `name: expression` measure per line. When unset, the
    /// measures already stored are used as they are.
    #[envconfig(from = "MEASURES_FILE")]
    pub measures_file: Option<String>,

    #[envconfig(from = "VIEW_CATALOG")]
    pub view_catalog: Option<String>,

    #[envconfig(from = "VIEW_SCHEMA")]
    pub view_schema: Option<String>,

    #[envconfig(from = "METRIC_VIEW_NAME", default = "my_metric_view")]
    pub metric_view_name: String,

    /// Zero is rejected at load time.
    #[envconfig(from = "MAX_EXPRESSION_LENGTH", default = "4096")]
    pub max_expression_length: NonZeroUsize,

    #[envconfig(from = "SOURCE_POLICY", default = "first-seen")]
    pub source_policy: SourcePolicy,

    #[envconfig(from = "CREATE_VIEW", default = "false")]
    pub create_view: bool,
}

impl Config {
    pub fn new() -> Result<Self, envconfig::Error> {
        let config = Self::init_from_env()?;
        debug!(
            "Config loaded: source={}.{}.{}, measures_table={}, measures_file={:?}, view={:?}.{:?}.{}, max_expression_length={}, source_policy={}, create_view={}",
            config.source_catalog,
            config.source_schema,
            config.source_table,
            config.measures_table,
            config.measures_file,
            config.view_catalog,
            config.view_schema,
            config.metric_view_name,
            config.max_expression_length,
            config.source_policy,
            config.create_view
        );
        Ok(config)
    }

    /// Contents of `MEASURES_FILE`, if one is configured.
    pub fn measures_input(&self) -> std::io::Result<Option<String>> {
        self.measures_file
            .as_deref()
            .map(std::fs::read_to_string)
            .transpose()
    }

    pub fn source(&self) -> Result<TableRef, MetricViewError> {
        TableRef::new(&self.source_catalog, &self.source_schema, &self.source_table)
    }

    /// View destination; catalog and schema default to the source's.
    pub fn view_target(&self) -> Result<ViewTarget, MetricViewError> {
        let catalog = self.view_catalog.as_deref().unwrap_or(&self.source_catalog);
        let schema = self.view_schema.as_deref().unwrap_or(&self.source_schema);
        let view = TableRef::new(catalog, schema, &self.metric_view_name)?;
        Ok(ViewTarget::new(view, self.source_policy))
    }

    pub fn converter(&self) -> Converter {
        Converter::new(Validator::new(self.max_expression_length.get()))
    }
}

#[derive(Envconfig, Clone)]
pub struct PostgresConfig {
    #[envconfig(from = "POSTGRES_USER", default = "postgres")]
    pub user: String,
    #[envconfig(from = "POSTGRES_PASSWORD", default = "postgres")]
    pub password: String,
    #[envconfig(from = "POSTGRES_HOST", default = "localhost:5432")]
    pub host: String,
    #[envconfig(from = "POSTGRES_DB", default = "main")]
    pub dbname: String,
}

impl PostgresConfig {
    pub fn new() -> Result<Self, envconfig::Error> {
        let config = Self::init_from_env()?;
        debug!(
            "PostgresConfig loaded: user={}, host={}, dbname={}",
            config.user, config.host, config.dbname
        );
        Ok(config)
    }
}

#[derive(Envconfig, Clone)]
pub struct SnowflakeConfig {
    #[envconfig(from = "SNOWFLAKE_ACCOUNT")]
    pub account: String,

    #[envconfig(from = "SNOWFLAKE_USER")]
    pub user: String,

    #[envconfig(from = "SNOWFLAKE_PASSWORD")]
    pub password: String,

    #[envconfig(from = "SNOWFLAKE_WAREHOUSE")]
    pub warehouse: Option<String>,

    #[envconfig(from = "SNOWFLAKE_DATABASE")]
    pub database: Option<String>,

    #[envconfig(from = "SNOWFLAKE_SCHEMA")]
    pub schema: Option<String>,

    #[envconfig(from = "SNOWFLAKE_ROLE")]
    pub role: Option<String>,

    /// Query timeout in seconds.
    #[envconfig(from = "SNOWFLAKE_TIMEOUT")]
    pub timeout: Option<u64>,
}

impl SnowflakeConfig {
    pub fn new() -> Result<Self, envconfig::Error> {
        let config = Self::init_from_env()?;
        debug!(
            "SnowflakeConfig loaded: account={}, user={}, warehouse={:?}, database={:?}, schema={:?}, role={:?}, timeout={:?}",
            config.account,
            config.user,
            config.warehouse,
            config.database,
            config.schema,
            config.role,
            config.timeout
        );
        Ok(config)
    }
}

#[derive(Envconfig, Clone)]
pub struct DatabricksConfig {
    /// Workspace URL, e.g. `https://adb-123.azuredatabricks.net`.
    #[envconfig(from = "DATABRICKS_HOST")]
    pub host: String,

    #[envconfig(from = "DATABRICKS_TOKEN")]
    pub token: String,

    #[envconfig(from = "DATABRICKS_WAREHOUSE_ID")]
    pub warehouse_id: String,

    /// Seconds the server waits inline before the statement is polled, 5 to 50.
    #[envconfig(from = "DATABRICKS_WAIT_TIMEOUT", default = "30")]
    pub wait_timeout: u64,

    #[envconfig(from = "DATABRICKS_POLL_INTERVAL_MS", default = "500")]
    pub poll_interval_ms: u64,

    #[envconfig(from = "DATABRICKS_MAX_POLLS", default = "120")]
    pub max_polls: u32,
}

impl DatabricksConfig {
    pub fn new() -> Result<Self, envconfig::Error> {
        let config = Self::init_from_env()?;
        debug!(
            "DatabricksConfig loaded: host={}, warehouse_id={}, wait_timeout={}, poll_interval_ms={}, max_polls={}",
            config.host,
            config.warehouse_id,
            config.wait_timeout,
            config.poll_interval_ms,
            config.max_polls
        );
        Ok(config)
    }
}
