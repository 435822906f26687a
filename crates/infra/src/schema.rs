//! Relational schema for the Postgres target.
//!
//! Tables are described with [`TableDefinition`] and rendered to DDL with the
//! configured table prefix. Foreign keys and extra indexes are emitted as
//! separate statements after the `CREATE TABLE`, so a table's statements must
//! run in order.

use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use stockor_core::Configuration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    String,
    Text,
    Boolean,
    Date,
    DateTime,
    Decimal { precision: u8, scale: u8 },
}

impl ColumnType {
    fn sql(&self) -> String {
        match self {
            ColumnType::Integer => "integer".to_string(),
            ColumnType::String => "character varying".to_string(),
            ColumnType::Text => "text".to_string(),
            ColumnType::Boolean => "boolean".to_string(),
            ColumnType::Date => "date".to_string(),
            ColumnType::DateTime => "timestamp without time zone".to_string(),
            ColumnType::Decimal { precision, scale } => format!("numeric({precision},{scale})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<String>,
}

/// What happens to referencing rows when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependent {
    Nullify,
    Delete,
    Restrict,
}

impl Dependent {
    fn sql(&self) -> &'static str {
        match self {
            Dependent::Nullify => "ON DELETE SET NULL",
            Dependent::Delete => "ON DELETE CASCADE",
            Dependent::Restrict => "ON DELETE RESTRICT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub to_table: String,
    pub column: String,
    pub dependent: Option<Dependent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraIndex {
    pub column: String,
    /// Index an expression instead of the bare column.
    pub function: Option<String>,
}

/// Columns, references and indexes of one table, before prefixing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    name: String,
    columns: Vec<Column>,
    foreign_keys: Vec<ForeignKey>,
    extra_indexes: Vec<ExtraIndex>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            extra_indexes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    pub fn column(mut self, name: impl Into<String>, ty: ColumnType, nullable: bool) -> Self {
        self.columns.push(Column {
            name: name.into(),
            ty,
            nullable,
            default: None,
        });
        self
    }

    /// Column with a literal SQL default.
    pub fn column_with_default(
        mut self,
        name: impl Into<String>,
        ty: ColumnType,
        nullable: bool,
        default: impl Into<String>,
    ) -> Self {
        self.columns.push(Column {
            name: name.into(),
            ty,
            nullable,
            default: Some(default.into()),
        });
        self
    }

    /// Required `code` column with a plain index.
    pub fn code_identifier(self) -> Self {
        let mut table = self.column("code", ColumnType::String, false);
        table.extra_indexes.push(ExtraIndex {
            column: "code".into(),
            function: None,
        });
        table
    }

    /// Required `visible_id`, indexed as text so prefix searches can use it.
    pub fn visible_id(self) -> Self {
        let mut table = self.column("visible_id", ColumnType::Integer, false);
        table.extra_indexes.push(ExtraIndex {
            column: "visible_id".into(),
            function: Some("CAST(visible_id AS VARCHAR)".into()),
        });
        table
    }

    /// `created_at` / `created_by_id`, plus the `updated_*` pair unless
    /// `create_only`.
    pub fn track_modifications(self, create_only: bool) -> Self {
        let table = self
            .column("created_at", ColumnType::DateTime, false)
            .column("created_by_id", ColumnType::Integer, false);
        if create_only {
            table
        } else {
            table
                .column("updated_at", ColumnType::DateTime, false)
                .column("updated_by_id", ColumnType::Integer, false)
        }
    }

    pub fn currency(self, name: impl Into<String>, nullable: bool) -> Self {
        self.column(
            name,
            ColumnType::Decimal {
                precision: 15,
                scale: 2,
            },
            nullable,
        )
    }

    /// Integer reference column backed by a foreign key. The column defaults
    /// to `{to_table}_id`.
    pub fn reference(
        mut self,
        to_table: impl Into<String>,
        column: Option<&str>,
        nullable: bool,
        dependent: Option<Dependent>,
    ) -> Self {
        let to_table = to_table.into();
        let column = column.map(str::to_string).unwrap_or_else(|| format!("{to_table}_id"));
        self.foreign_keys.push(ForeignKey {
            to_table,
            column: column.clone(),
            dependent,
        });
        self.column(column, ColumnType::Integer, nullable)
    }

    /// `CREATE TABLE` followed by the foreign key and index statements.
    pub fn create_table_sql(&self, config: &Configuration) -> Vec<String> {
        let prefix = config.table_prefix();
        let table = format!("{prefix}{}", self.name);

        let mut defs = vec!["\"id\" serial PRIMARY KEY".to_string()];
        defs.extend(self.columns.iter().map(column_sql));
        let mut statements = vec![format!("CREATE TABLE \"{table}\" ({})", defs.join(", "))];

        for fk in &self.foreign_keys {
            let mut sql = format!(
                "ALTER TABLE \"{table}\" ADD CONSTRAINT \"{table}_{column}_fk\" FOREIGN KEY (\"{column}\") REFERENCES \"{prefix}{to}\"(id)",
                column = fk.column,
                to = fk.to_table,
            );
            if let Some(dependent) = fk.dependent {
                sql.push(' ');
                sql.push_str(dependent.sql());
            }
            statements.push(sql);
        }

        for index in &self.extra_indexes {
            statements.push(match &index.function {
                Some(function) => format!("CREATE INDEX {table}indx_{} ON {table}({function})", index.column),
                None => format!(
                    "CREATE INDEX \"index_{table}_on_{column}\" ON \"{table}\" (\"{column}\")",
                    column = index.column
                ),
            });
        }
        statements
    }

    pub fn drop_table_sql(&self, config: &Configuration) -> String {
        format!("DROP TABLE \"{}{}\"", config.table_prefix(), self.name)
    }
}

fn column_sql(column: &Column) -> String {
    let mut sql = format!("\"{}\" {}", column.name, column.ty.sql());
    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(default);
    }
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    sql
}

/// A named, reversible schema change.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: &'static str,
    pub table: TableDefinition,
}

impl Migration {
    pub fn up(&self, config: &Configuration) -> Vec<String> {
        self.table.create_table_sql(config)
    }

    pub fn down(&self, config: &Configuration) -> Vec<String> {
        vec![self.table.drop_table_sql(config)]
    }
}

pub fn payment_terms() -> TableDefinition {
    TableDefinition::new("payment_terms")
        .code_identifier()
        .column_with_default("days", ColumnType::Integer, false, "0")
        .column("description", ColumnType::String, false)
        .column("discount_days", ColumnType::Integer, true)
        .column("discount_amount", ColumnType::String, true)
        .track_modifications(false)
}

/// Migrations in the order they must be applied.
pub fn migrations() -> Vec<Migration> {
    vec![Migration {
        version: "20140213040608",
        table: payment_terms(),
    }]
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("migration {version} failed: {source}")]
    Migration {
        version: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// Applies migrations to Postgres, one transaction per migration.
#[derive(Debug, Clone)]
pub struct PgMigrator {
    pool: PgPool,
}

impl PgMigrator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, config, migrations), fields(count = migrations.len()))]
    pub async fn up(&self, config: &Configuration, migrations: &[Migration]) -> Result<(), SchemaError> {
        for migration in migrations {
            self.execute(migration.version, migration.up(config)).await?;
            tracing::info!(version = migration.version, table = migration.table.name(), "migrated");
        }
        Ok(())
    }

    /// Reverts in reverse order.
    #[instrument(skip(self, config, migrations), fields(count = migrations.len()))]
    pub async fn down(&self, config: &Configuration, migrations: &[Migration]) -> Result<(), SchemaError> {
        for migration in migrations.iter().rev() {
            self.execute(migration.version, migration.down(config)).await?;
            tracing::info!(version = migration.version, table = migration.table.name(), "reverted");
        }
        Ok(())
    }

    async fn execute(&self, version: &'static str, statements: Vec<String>) -> Result<(), SchemaError> {
        let wrap = |source| SchemaError::Migration { version, source };
        let mut tx = self.pool.begin().await.map_err(wrap)?;
        for statement in &statements {
            sqlx::query(statement).execute(&mut *tx).await.map_err(wrap)?;
        }
        tx.commit().await.map_err(wrap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_terms_table_matches_the_migration() {
        let config = Configuration::default();
        let sql = payment_terms().create_table_sql(&config);

        assert_eq!(sql.len(), 2);
        assert_eq!(
            sql[0],
            "CREATE TABLE \"skr_payment_terms\" (\"id\" serial PRIMARY KEY, \
             \"code\" character varying NOT NULL, \
             \"days\" integer DEFAULT 0 NOT NULL, \
             \"description\" character varying NOT NULL, \
             \"discount_days\" integer, \
             \"discount_amount\" character varying, \
             \"created_at\" timestamp without time zone NOT NULL, \
             \"created_by_id\" integer NOT NULL, \
             \"updated_at\" timestamp without time zone NOT NULL, \
             \"updated_by_id\" integer NOT NULL)"
        );
        assert_eq!(
            sql[1],
            "CREATE INDEX \"index_skr_payment_terms_on_code\" ON \"skr_payment_terms\" (\"code\")"
        );
    }

    #[test]
    fn references_emit_foreign_keys_with_delete_rules() {
        let mut config = Configuration::default();
        config.set_table_prefix("inv_");
        let sql = TableDefinition::new("sku_locs")
            .reference("skus", Some("sku_id"), false, Some(Dependent::Delete))
            .reference("locations", Some("location_id"), true, Some(Dependent::Nullify))
            .reference("customers", None, false, None)
            .create_table_sql(&config);

        assert!(sql[0].contains("\"sku_id\" integer NOT NULL"));
        assert!(sql[0].contains("\"location_id\" integer,") || sql[0].contains("\"location_id\" integer)"));
        assert_eq!(
            sql[1],
            "ALTER TABLE \"inv_sku_locs\" ADD CONSTRAINT \"inv_sku_locs_sku_id_fk\" \
             FOREIGN KEY (\"sku_id\") REFERENCES \"inv_skus\"(id) ON DELETE CASCADE"
        );
        assert!(sql[2].ends_with("REFERENCES \"inv_locations\"(id) ON DELETE SET NULL"));
        assert!(sql[3].ends_with("FOREIGN KEY (\"customers_id\") REFERENCES \"inv_customers\"(id)"));
    }

    #[test]
    fn visible_id_is_indexed_through_a_cast() {
        let sql = TableDefinition::new("sales_orders")
            .visible_id()
            .currency("total", true)
            .track_modifications(true)
            .create_table_sql(&Configuration::default());

        assert!(sql[0].contains("\"total\" numeric(15,2)"));
        assert!(sql[0].contains("\"created_by_id\" integer NOT NULL"));
        assert!(!sql[0].contains("updated_at"));
        assert_eq!(
            sql[1],
            "CREATE INDEX skr_sales_ordersindx_visible_id ON skr_sales_orders(CAST(visible_id AS VARCHAR))"
        );
    }

    #[test]
    fn migrations_drop_their_tables() {
        let config = Configuration::default();
        let down: Vec<String> = migrations().iter().flat_map(|m| m.down(&config)).collect();
        assert_eq!(down, vec!["DROP TABLE \"skr_payment_terms\"".to_string()]);
    }
}
