//! A reference [`QueryBuilder`] for SQLite.
//!
//! Maps entity types onto tables through a [`TableMapping`] and renders
//! plain SQL: selects with left joins for expansions, `LIMIT/OFFSET`
//! paging, and single-row inserts, updates and deletes.
//!
//! Result columns are aliased `<TYPE>_<PROPERTY>` in upper case, e.g.
//! `CAR_MAKE`. Columns of a complex property `Size` with member `Length`
//! are stored as `SIZE_LENGTH` and read back as `<COMPLEXTYPE>_LENGTH`.

use crate::filter::{translate_filter, translate_order_by};
use odsql_core::{
    EntityType, IdentityKey, ODataEntry, ODataError, ODataResult, Property, PropertyMap, PropertyValue, QueryBuilder,
    SqlContext, Statement, StatementBuilder, StatementKind, UriInfo, DEFAULT_SERVER_PAGING_SIZE,
};
use odsql_datasource::{SqlType, SqlValue, StatementParam};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Returns the result column alias of `property` of the type named `type_fqn`.
pub fn column_alias(type_fqn: &str, property: &str) -> String {
    let name = type_fqn.rsplit('.').next().unwrap_or(type_fqn);
    format!("{name}_{property}").to_ascii_uppercase()
}

/// How one entity type is stored.
#[derive(Debug, Clone)]
pub struct TableBinding {
    table: String,
    columns: BTreeMap<String, String>,
    transient: BTreeSet<String>,
    generated_key: bool,
    page_size: Option<u32>,
}

impl TableBinding {
    /// Binds to a table. Columns default to the upper-cased property name.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: BTreeMap::new(),
            transient: BTreeSet::new(),
            generated_key: false,
            page_size: None,
        }
    }

    /// Maps a property to a differently named column.
    #[must_use]
    pub fn with_column(mut self, property: impl Into<String>, column: impl Into<String>) -> Self {
        self.columns.insert(property.into(), column.into());
        self
    }

    /// Marks a property as having no column.
    #[must_use]
    pub fn with_transient(mut self, property: impl Into<String>) -> Self {
        self.transient.insert(property.into());
        self
    }

    /// Declares that the database generates the key.
    #[must_use]
    pub fn with_generated_key(mut self) -> Self {
        self.generated_key = true;
        self
    }

    /// Overrides the server page size for this type.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Returns the table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the column of a property.
    pub fn column(&self, property: &str) -> String {
        self.columns
            .get(property)
            .cloned()
            .unwrap_or_else(|| property.to_ascii_uppercase())
    }

    /// Returns true if the property has no column.
    pub fn is_transient(&self, property: &str) -> bool {
        self.transient.contains(property)
    }
}

/// Table bindings by entity type name.
#[derive(Debug, Clone, Default)]
pub struct TableMapping {
    bindings: HashMap<String, TableBinding>,
}

impl TableMapping {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the entity type named `type_fqn`.
    #[must_use]
    pub fn bind(mut self, type_fqn: impl Into<String>, binding: TableBinding) -> Self {
        self.bindings.insert(type_fqn.into(), binding);
        self
    }

    /// Looks up the binding of a type.
    ///
    /// # Errors
    ///
    /// Fails if the type is not bound.
    pub fn binding(&self, type_fqn: &str) -> ODataResult<&TableBinding> {
        self.bindings
            .get(type_fqn)
            .ok_or_else(|| ODataError::Internal(format!("no table bound to {type_fqn}")))
    }
}

/// Paging behavior of the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Rows per page when server-side paging applies.
    pub page_size: u32,
    /// Whether the server limits pages on its own.
    pub serverside_paging: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_SERVER_PAGING_SIZE,
            serverside_paging: true,
        }
    }
}

impl BuilderConfig {
    /// Sets the page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Enables or disables server-side paging.
    #[must_use]
    pub const fn with_serverside_paging(mut self, enabled: bool) -> Self {
        self.serverside_paging = enabled;
        self
    }
}

/// Creates [`SqliteStatement`]s.
#[derive(Debug, Clone)]
pub struct SqliteQueryBuilder {
    mapping: Arc<TableMapping>,
    config: BuilderConfig,
}

impl SqliteQueryBuilder {
    /// Creates a builder over a mapping with default paging.
    pub fn new(mapping: TableMapping) -> Self {
        Self {
            mapping: Arc::new(mapping),
            config: BuilderConfig::default(),
        }
    }

    /// Sets the paging configuration.
    #[must_use]
    pub fn with_config(mut self, config: BuilderConfig) -> Self {
        self.config = config;
        self
    }

    fn statement(&self, kind: StatementKind, uri: &UriInfo) -> SqliteStatement {
        SqliteStatement {
            kind,
            mapping: Arc::clone(&self.mapping),
            config: self.config,
            uri: uri.clone(),
            pinned: Vec::new(),
            entry: None,
            keys: PropertyMap::new(),
            merge: false,
        }
    }
}

impl QueryBuilder for SqliteQueryBuilder {
    fn select_entity(&self, uri: &UriInfo) -> ODataResult<Box<dyn StatementBuilder>> {
        Ok(Box::new(self.statement(StatementKind::SelectEntity, uri)))
    }

    fn select_entity_set(&self, uri: &UriInfo, pinned: &[IdentityKey]) -> ODataResult<Box<dyn StatementBuilder>> {
        let mut statement = self.statement(StatementKind::SelectEntitySet, uri);
        statement.pinned = pinned.to_vec();
        Ok(Box::new(statement))
    }

    fn select_keys(&self, uri: &UriInfo) -> ODataResult<Box<dyn StatementBuilder>> {
        Ok(Box::new(self.statement(StatementKind::SelectKeys, uri)))
    }

    fn select_count(&self, uri: &UriInfo) -> ODataResult<Box<dyn StatementBuilder>> {
        Ok(Box::new(self.statement(StatementKind::Count, uri)))
    }

    fn insert(&self, uri: &UriInfo, entry: &ODataEntry) -> ODataResult<Box<dyn StatementBuilder>> {
        let mut statement = self.statement(StatementKind::Insert, uri);
        statement.entry = Some(entry.clone());
        Ok(Box::new(statement))
    }

    fn update(
        &self,
        uri: &UriInfo,
        entry: &ODataEntry,
        keys: &PropertyMap,
        merge: bool,
    ) -> ODataResult<Box<dyn StatementBuilder>> {
        let mut statement = self.statement(StatementKind::Update, uri);
        statement.entry = Some(entry.clone());
        statement.keys = keys.clone();
        statement.merge = merge;
        Ok(Box::new(statement))
    }

    fn delete(&self, uri: &UriInfo, keys: &PropertyMap) -> ODataResult<Box<dyn StatementBuilder>> {
        let mut statement = self.statement(StatementKind::Delete, uri);
        statement.keys = keys.clone();
        Ok(Box::new(statement))
    }
}

/// One SQLite statement of any kind.
#[derive(Debug, Clone)]
pub struct SqliteStatement {
    kind: StatementKind,
    mapping: Arc<TableMapping>,
    config: BuilderConfig,
    uri: UriInfo,
    pinned: Vec<IdentityKey>,
    entry: Option<ODataEntry>,
    keys: PropertyMap,
    merge: bool,
}

impl SqliteStatement {
    /// Keyed root selects are never paged; pinned selects are paged by their keys query.
    fn is_paged(&self) -> bool {
        match self.kind {
            StatementKind::SelectKeys => true,
            StatementKind::SelectEntitySet => self.pinned.is_empty(),
            _ => false,
        }
    }

    /// Returns the effective limit and whether server-side paging imposed it.
    fn paging(&self) -> (Option<u32>, bool) {
        if !self.is_paged() {
            return (None, false);
        }
        let page_size = self.page_size(self.uri.target_type());
        if self.config.serverside_paging && self.uri.top.map_or(true, |top| top > page_size) {
            (Some(page_size), true)
        } else {
            (self.uri.top, false)
        }
    }

    fn entity_columns(&self, ty: &EntityType, binding: &TableBinding, table: &str, out: &mut Vec<String>) {
        for property in &ty.properties {
            match property {
                Property::Simple(p) if !binding.is_transient(&p.name) => {
                    out.push(format!(
                        "{table}.{} AS {}",
                        binding.column(&p.name),
                        column_alias(&ty.fqn(), &p.name)
                    ));
                }
                Property::Simple(_) => {}
                Property::Complex(c) => {
                    let complex_fqn = c.complex_type.fqn();
                    for member in &c.complex_type.properties {
                        if let Property::Simple(m) = member {
                            out.push(format!(
                                "{table}.{} AS {}",
                                complex_column(&c.name, &m.name),
                                column_alias(&complex_fqn, &m.name)
                            ));
                        }
                    }
                }
            }
        }
        if ty.is_keyless() {
            out.push(format!("ROW_NUMBER() OVER () AS {}", self.row_number_alias(ty)));
        }
    }

    fn key_columns(&self, ty: &EntityType, binding: &TableBinding, table: &str, out: &mut Vec<String>) {
        if ty.is_keyless() {
            out.push(format!("ROW_NUMBER() OVER () AS {}", self.row_number_alias(ty)));
            return;
        }
        for key in &ty.keys {
            out.push(format!("{table}.{} AS {}", binding.column(key), column_alias(&ty.fqn(), key)));
        }
    }

    fn build_select(&self) -> ODataResult<Statement> {
        let root = self.uri.target_type();
        let binding = self.mapping.binding(&root.fqn())?;
        let mut columns = Vec::new();
        let mut joins = Vec::new();
        let mut conditions = Vec::new();
        let mut params = Vec::new();
        let mut order = Vec::new();
        let mut child_order = Vec::new();

        if self.kind == StatementKind::SelectKeys {
            self.key_columns(root, binding, "T0", &mut columns);
        } else {
            self.entity_columns(root, binding, "T0", &mut columns);
            let mut joined: Vec<String> = Vec::new();
            for path in &self.uri.expand {
                let mut parent_table = "T0".to_string();
                let mut parent_binding = binding;
                let mut prefix = String::new();
                for segment in path.segments() {
                    prefix.push('/');
                    prefix.push_str(&segment.navigation.name);
                    let target_binding = self.mapping.binding(&segment.target.fqn())?;
                    let table = match joined.iter().position(|p| *p == prefix) {
                        Some(index) => format!("T{}", index + 1),
                        None => {
                            joined.push(prefix.clone());
                            let table = format!("T{}", joined.len());
                            let constraint = &segment.navigation.constraint;
                            joins.push(format!(
                                "LEFT JOIN {} {table} ON {parent_table}.{} = {table}.{}",
                                target_binding.table,
                                parent_binding.column(&constraint.source_property),
                                target_binding.column(&constraint.target_property)
                            ));
                            self.entity_columns(&segment.target, target_binding, &table, &mut columns);
                            for key in &segment.target.keys {
                                child_order.push(format!("{table}.{}", target_binding.column(key)));
                            }
                            table
                        }
                    };
                    parent_table = table;
                    parent_binding = target_binding;
                }
            }
        }

        if let Some(filter) = &self.uri.filter {
            let (sql, filter_params) = translate_filter(filter, root, |p| format!("T0.{}", binding.column(p)))?;
            conditions.push(format!("({sql})"));
            params.extend(filter_params);
        }
        if self.kind == StatementKind::SelectEntity {
            let keys = self.uri.key_values()?;
            self.key_conditions(root, binding, "T0.", &keys, &mut conditions, &mut params)?;
        }
        if !self.pinned.is_empty() {
            conditions.push(self.pinned_condition(root, binding, &mut params)?);
        }

        if let Some(order_by) = &self.uri.order_by {
            order.extend(translate_order_by(order_by, root, |p| format!("T0.{}", binding.column(p)))?);
        }
        for key in &root.keys {
            order.push(format!("T0.{}", binding.column(key)));
        }
        order.extend(child_order);

        let mut sql = format!("SELECT {} FROM {} T0", columns.join(", "), binding.table);
        for join in joins {
            sql.push(' ');
            sql.push_str(&join);
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        if self.is_paged() {
            let skip = self.uri.effective_skip();
            match self.paging().0 {
                Some(limit) => {
                    sql.push_str(" LIMIT ? OFFSET ?");
                    params.push(StatementParam::new(i64::from(limit), SqlType::Integer));
                    params.push(StatementParam::new(i64::from(skip), SqlType::Integer));
                }
                None if skip > 0 => {
                    sql.push_str(" LIMIT -1 OFFSET ?");
                    params.push(StatementParam::new(i64::from(skip), SqlType::Integer));
                }
                None => {}
            }
        }
        Ok(Statement::new(sql, params))
    }

    fn pinned_condition(
        &self,
        root: &EntityType,
        binding: &TableBinding,
        params: &mut Vec<StatementParam>,
    ) -> ODataResult<String> {
        if root.is_keyless() {
            return Err(ODataError::NotImplemented(format!(
                "expanding keyless entity set of {}",
                root.fqn()
            )));
        }
        let keys: Vec<_> = root.key_properties().collect();
        if let [key] = keys.as_slice() {
            let placeholders = vec!["?"; self.pinned.len()].join(", ");
            for identity in &self.pinned {
                let value = identity.values().first().cloned().unwrap_or(SqlValue::Null);
                params.push(StatementParam::new(value, key.edm_type.sql_type()));
            }
            return Ok(format!("T0.{} IN ({placeholders})", binding.column(&key.name)));
        }
        let mut alternatives = Vec::with_capacity(self.pinned.len());
        for identity in &self.pinned {
            let mut parts = Vec::with_capacity(keys.len());
            for (key, value) in keys.iter().zip(identity.values()) {
                parts.push(format!("T0.{} = ?", binding.column(&key.name)));
                params.push(StatementParam::new(value.clone(), key.edm_type.sql_type()));
            }
            alternatives.push(format!("({})", parts.join(" AND ")));
        }
        Ok(format!("({})", alternatives.join(" OR ")))
    }

    fn key_conditions(
        &self,
        ty: &EntityType,
        binding: &TableBinding,
        qualifier: &str,
        keys: &PropertyMap,
        conditions: &mut Vec<String>,
        params: &mut Vec<StatementParam>,
    ) -> ODataResult<()> {
        for key in ty.key_properties() {
            let value = match keys.get(&key.name) {
                Some(PropertyValue::Simple(v)) => v.clone(),
                _ => return Err(ODataError::BadRequest(format!("missing key property {}", key.name))),
            };
            conditions.push(format!("{qualifier}{} = ?", binding.column(&key.name)));
            params.push(StatementParam::new(value, key.edm_type.sql_type()));
        }
        Ok(())
    }

    /// Flattens submitted properties into column assignments.
    ///
    /// With `full` set, properties absent from `values` are assigned `NULL`.
    fn assignments(
        &self,
        ty: &EntityType,
        binding: &TableBinding,
        values: &PropertyMap,
        full: bool,
        skip_keys: bool,
    ) -> ODataResult<Vec<(String, StatementParam)>> {
        let mut out = Vec::new();
        for property in &ty.properties {
            if skip_keys && ty.keys.iter().any(|k| k == property.name()) {
                continue;
            }
            match property {
                Property::Simple(p) => {
                    if binding.is_transient(&p.name) {
                        continue;
                    }
                    let value = match values.get(&p.name) {
                        Some(PropertyValue::Simple(v)) => v.clone(),
                        Some(PropertyValue::Complex(_)) => {
                            return Err(ODataError::BadRequest(format!("{} is not a complex property", p.name)))
                        }
                        None if full => SqlValue::Null,
                        None => continue,
                    };
                    out.push((binding.column(&p.name), StatementParam::new(value, p.edm_type.sql_type())));
                }
                Property::Complex(c) => {
                    let members = match values.get(&c.name) {
                        Some(PropertyValue::Complex(map)) => Some(map),
                        Some(PropertyValue::Simple(v)) if v.is_null() => None,
                        Some(PropertyValue::Simple(_)) => {
                            return Err(ODataError::BadRequest(format!("{} is a complex property", c.name)))
                        }
                        None if full => None,
                        None => continue,
                    };
                    for member in &c.complex_type.properties {
                        let Property::Simple(m) = member else {
                            continue;
                        };
                        let value = match members.and_then(|map| map.get(&m.name)) {
                            Some(PropertyValue::Simple(v)) => v.clone(),
                            _ => SqlValue::Null,
                        };
                        out.push((complex_column(&c.name, &m.name), StatementParam::new(value, m.edm_type.sql_type())));
                    }
                }
            }
        }
        Ok(out)
    }

    fn entry(&self) -> ODataResult<&ODataEntry> {
        self.entry
            .as_ref()
            .ok_or_else(|| ODataError::Internal(format!("{:?} statement without an entry", self.kind)))
    }

    fn build_insert(&self) -> ODataResult<Statement> {
        let ty = self.uri.target_type();
        let binding = self.mapping.binding(&ty.fqn())?;
        let assignments = self.assignments(ty, binding, &self.entry()?.properties, false, false)?;
        if assignments.is_empty() {
            return Ok(Statement::new(format!("INSERT INTO {} DEFAULT VALUES", binding.table), Vec::new()));
        }
        let (columns, params): (Vec<String>, Vec<StatementParam>) = assignments.into_iter().unzip();
        let placeholders = vec!["?"; columns.len()].join(", ");
        Ok(Statement::new(
            format!("INSERT INTO {} ({}) VALUES ({placeholders})", binding.table, columns.join(", ")),
            params,
        ))
    }

    fn build_update(&self) -> ODataResult<Statement> {
        let ty = self.uri.target_type();
        let binding = self.mapping.binding(&ty.fqn())?;
        let assignments = self.assignments(ty, binding, &self.entry()?.properties, !self.merge, true)?;
        let mut params = Vec::new();
        let set = if assignments.is_empty() {
            let first = ty
                .keys
                .first()
                .ok_or_else(|| ODataError::BadRequest(format!("cannot update keyless {}", ty.fqn())))?;
            let column = binding.column(first);
            format!("{column} = {column}")
        } else {
            let mut set = Vec::with_capacity(assignments.len());
            for (column, param) in assignments {
                set.push(format!("{column} = ?"));
                params.push(param);
            }
            set.join(", ")
        };
        let mut conditions = Vec::new();
        self.key_conditions(ty, binding, "", &self.keys, &mut conditions, &mut params)?;
        Ok(Statement::new(
            format!("UPDATE {} SET {set} WHERE {}", binding.table, conditions.join(" AND ")),
            params,
        ))
    }

    fn build_delete(&self) -> ODataResult<Statement> {
        let ty = self.uri.target_type();
        let binding = self.mapping.binding(&ty.fqn())?;
        let mut conditions = Vec::new();
        let mut params = Vec::new();
        self.key_conditions(ty, binding, "", &self.keys, &mut conditions, &mut params)?;
        if conditions.is_empty() {
            return Err(ODataError::BadRequest(format!("cannot delete keyless {}", ty.fqn())));
        }
        Ok(Statement::new(
            format!("DELETE FROM {} WHERE {}", binding.table, conditions.join(" AND ")),
            params,
        ))
    }

    fn build_count(&self) -> ODataResult<Statement> {
        let ty = self.uri.target_type();
        let binding = self.mapping.binding(&ty.fqn())?;
        let mut sql = format!("SELECT COUNT(*) AS ROW_COUNT FROM {} T0", binding.table);
        let mut params = Vec::new();
        if let Some(filter) = &self.uri.filter {
            let (condition, filter_params) = translate_filter(filter, ty, |p| format!("T0.{}", binding.column(p)))?;
            sql.push_str(" WHERE ");
            sql.push_str(&condition);
            params = filter_params;
        }
        Ok(Statement::new(sql, params))
    }
}

fn complex_column(property: &str, member: &str) -> String {
    format!("{property}_{member}").to_ascii_uppercase()
}

impl StatementBuilder for SqliteStatement {
    fn kind(&self) -> StatementKind {
        self.kind
    }

    fn build(&self, _context: &SqlContext) -> ODataResult<Statement> {
        match self.kind {
            StatementKind::SelectEntity | StatementKind::SelectEntitySet | StatementKind::SelectKeys => {
                self.build_select()
            }
            StatementKind::Count => self.build_count(),
            StatementKind::Insert => self.build_insert(),
            StatementKind::Update => self.build_update(),
            StatementKind::Delete => self.build_delete(),
        }
    }

    fn column_alias(&self, type_fqn: &str, property: &str) -> ODataResult<String> {
        Ok(column_alias(type_fqn, property))
    }

    fn is_transient(&self, type_fqn: &str, property: &str) -> bool {
        self.mapping
            .binding(type_fqn)
            .is_ok_and(|binding| binding.is_transient(property))
    }

    fn has_server_generated_key(&self, ty: &EntityType) -> bool {
        self.mapping.binding(&ty.fqn()).is_ok_and(|binding| binding.generated_key)
    }

    fn is_serverside_paging(&self) -> bool {
        self.paging().1
    }

    fn top(&self) -> Option<u32> {
        self.paging().0
    }

    fn page_size(&self, ty: &EntityType) -> u32 {
        self.mapping
            .binding(&ty.fqn())
            .ok()
            .and_then(|binding| binding.page_size)
            .unwrap_or(self.config.page_size)
    }
}
