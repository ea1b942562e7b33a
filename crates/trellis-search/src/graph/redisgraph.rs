//! Redis-family graph dialect (GRAPH.QUERY).
//!
//! The dialect has no parameter binding: every literal is escaped inline
//! through [`super::escape`]. Assembled queries are bounded in size;
//! over-length queries are rewritten with a lean projection that drops
//! non-essential presentation properties, and oversized inline arrays are
//! truncated, both recorded in a per-query skip list surfaced through
//! telemetry.
//!
//! Vector queries yield cosine *distance*; this module converts to
//! similarity (`1 - distance`) so the rest of the core sees one
//! convention.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::backend::GraphBackend;
use super::error::{GraphError, GraphResult};
use super::escape::{float_array, quoted, quoted_list};
use super::pool::ConnectionPool;
use super::records::{
    parse_attributes, parse_datetime, parse_optional_datetime, parse_uuid, parse_uuid_list,
    render_datetime,
};
use crate::constants::{MAX_INLINE_ARRAY_LEN, MAX_INLINE_QUERY_BYTES};
use crate::model::{Community, Edge, Episode, EpisodeSource, Node, SearchFilter};

const NODE_LABEL: &str = "Entity";
const EPISODE_LABEL: &str = "Episodic";
const COMMUNITY_LABEL: &str = "Community";
const EDGE_RELATION: &str = "RELATES_TO";

const NODE_VECTOR_ATTR: &str = "name_embedding";
const EDGE_VECTOR_ATTR: &str = "fact_embedding";
const COMMUNITY_VECTOR_ATTR: &str = "name_embedding";

const SHORTEST_PATH_BOUND: u32 = 10;

const NODE_PROJECTION: &str = "n.uuid AS uuid, n.name AS name, labels(n) AS labels, \
     n.summary AS summary, n.group_id AS group_id, n.created_at AS created_at, \
     n.attributes AS attributes";

/// Lean variant used when the assembled query blows the size bound.
const NODE_PROJECTION_LEAN: &str = "n.uuid AS uuid, n.name AS name, labels(n) AS labels, \
     '' AS summary, n.group_id AS group_id, n.created_at AS created_at, NULL AS attributes";

const EDGE_PROJECTION: &str = "r.uuid AS uuid, startNode(r).uuid AS source_node_uuid, \
     endNode(r).uuid AS target_node_uuid, type(r) AS name, r.fact AS fact, \
     r.episodes AS episodes, r.group_id AS group_id, r.created_at AS created_at, \
     r.valid_at AS valid_at, r.invalid_at AS invalid_at, r.expired_at AS expired_at";

const EDGE_PROJECTION_LEAN: &str = "r.uuid AS uuid, startNode(r).uuid AS source_node_uuid, \
     endNode(r).uuid AS target_node_uuid, type(r) AS name, r.fact AS fact, \
     NULL AS episodes, r.group_id AS group_id, r.created_at AS created_at, \
     r.valid_at AS valid_at, r.invalid_at AS invalid_at, r.expired_at AS expired_at";

const EPISODE_PROJECTION: &str = "e.uuid AS uuid, e.name AS name, e.content AS content, \
     e.source AS source, e.source_description AS source_description, e.group_id AS group_id, \
     e.created_at AS created_at, e.valid_at AS valid_at, e.entity_edges AS entity_edges";

const COMMUNITY_PROJECTION: &str = "c.uuid AS uuid, c.name AS name, c.summary AS summary, \
     c.group_id AS group_id, c.created_at AS created_at";

/// GRAPH.QUERY-backed [`GraphBackend`].
pub struct RedisGraphBackend {
    pool: ConnectionPool<MultiplexedConnection>,
    graph_name: String,
    url: String,
}

impl std::fmt::Debug for RedisGraphBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisGraphBackend")
            .field("url", &self.url)
            .field("graph_name", &self.graph_name)
            .field("pool", &self.pool)
            .finish()
    }
}

impl RedisGraphBackend {
    /// Connects and fills the bounded pool. Each pooled slot is its own
    /// multiplexed connection; concurrent retrievals never share one.
    pub async fn connect(
        url: &str,
        graph_name: &str,
        pool_size: usize,
        acquire_timeout: Duration,
    ) -> GraphResult<Self> {
        let client = redis::Client::open(url).map_err(|e| GraphError::ConnectionFailed {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let mut connections = Vec::with_capacity(pool_size);
        for _ in 0..pool_size.max(1) {
            let conn = client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| {
                    if e.kind() == redis::ErrorKind::AuthenticationFailed {
                        GraphError::AuthFailed {
                            message: e.to_string(),
                        }
                    } else {
                        GraphError::ConnectionFailed {
                            url: url.to_string(),
                            message: e.to_string(),
                        }
                    }
                })?;
            connections.push(conn);
        }

        Ok(Self {
            pool: ConnectionPool::new(connections, acquire_timeout),
            graph_name: graph_name.to_string(),
            url: url.to_string(),
        })
    }

    async fn execute(&self, query_text: &str) -> GraphResult<ResultTable> {
        let mut conn = self.pool.acquire().await?;
        let value: redis::Value = redis::cmd("GRAPH.QUERY")
            .arg(&self.graph_name)
            .arg(query_text)
            .query_async(&mut *conn)
            .await
            .map_err(|e| {
                if e.is_connection_refusal() || e.is_io_error() {
                    GraphError::ConnectionFailed {
                        url: self.url.clone(),
                        message: e.to_string(),
                    }
                } else {
                    GraphError::QueryFailed {
                        message: e.to_string(),
                    }
                }
            })?;
        ResultTable::parse(value)
    }

    /// Picks the full projection unless the assembled query exceeds the
    /// byte bound, in which case the lean variant is used and recorded.
    fn bounded_query<F>(&self, make: F, full: &str, lean: &str) -> String
    where
        F: Fn(&str) -> String,
    {
        let query = make(full);
        if query.len() <= MAX_INLINE_QUERY_BYTES {
            return query;
        }
        let reduced = make(lean);
        warn!(
            original_bytes = query.len(),
            reduced_bytes = reduced.len(),
            skipped = "summary,attributes,episodes",
            "query over size bound, dropping non-essential properties"
        );
        reduced
    }
}

/// Parsed GRAPH.QUERY reply: column names plus scalar cells.
struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Cell>),
}

impl Cell {
    fn from_value(value: redis::Value) -> Cell {
        match value {
            redis::Value::Nil => Cell::Null,
            redis::Value::Int(i) => Cell::Int(i),
            redis::Value::Double(d) => Cell::Float(d),
            redis::Value::BulkString(bytes) => {
                Cell::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
            redis::Value::SimpleString(s) => Cell::Text(s),
            redis::Value::Array(items) => {
                Cell::List(items.into_iter().map(Cell::from_value).collect())
            }
            _ => Cell::Null,
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Cell::Text(s) => Some(s.clone()),
            Cell::Int(i) => Some(i.to_string()),
            Cell::Float(f) => Some(f.to_string()),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Float(f) => Some(*f),
            Cell::Int(i) => Some(*i as f64),
            Cell::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_text_list(&self) -> Vec<String> {
        match self {
            Cell::List(items) => items.iter().filter_map(Cell::as_text).collect(),
            _ => Vec::new(),
        }
    }

    fn as_f32_list(&self) -> Option<Vec<f32>> {
        match self {
            Cell::List(items) => items
                .iter()
                .map(|c| c.as_f64().map(|v| v as f32))
                .collect(),
            _ => None,
        }
    }
}

impl ResultTable {
    fn parse(value: redis::Value) -> GraphResult<ResultTable> {
        let redis::Value::Array(mut sections) = value else {
            return Err(GraphError::QueryFailed {
                message: "unexpected GRAPH.QUERY reply shape".to_string(),
            });
        };

        // Write-only replies carry just the statistics section.
        if sections.len() < 2 {
            return Ok(ResultTable {
                columns: Vec::new(),
                rows: Vec::new(),
            });
        }

        let rows_value = sections.remove(1);
        let header_value = sections.remove(0);

        let columns = match header_value {
            redis::Value::Array(entries) => entries
                .into_iter()
                .map(|entry| match Cell::from_value(entry) {
                    Cell::Text(name) => name,
                    // Compact header entries are [type, name] pairs.
                    Cell::List(parts) => parts
                        .last()
                        .and_then(Cell::as_text)
                        .unwrap_or_default(),
                    _ => String::new(),
                })
                .collect(),
            _ => Vec::new(),
        };

        let rows = match rows_value {
            redis::Value::Array(raw_rows) => raw_rows
                .into_iter()
                .map(|raw| match raw {
                    redis::Value::Array(cells) => {
                        cells.into_iter().map(Cell::from_value).collect()
                    }
                    other => vec![Cell::from_value(other)],
                })
                .collect(),
            _ => Vec::new(),
        };

        Ok(ResultTable { columns, rows })
    }

    fn cell<'a>(&self, row: &'a [Cell], column: &str) -> Option<&'a Cell> {
        let idx = self.columns.iter().position(|c| c == column)?;
        row.get(idx)
    }

    fn req_text(&self, row: &[Cell], column: &str) -> GraphResult<String> {
        self.cell(row, column)
            .and_then(Cell::as_text)
            .ok_or_else(|| GraphError::MalformedRecord {
                message: format!("missing column '{column}'"),
            })
    }

    fn opt_text(&self, row: &[Cell], column: &str) -> Option<String> {
        match self.cell(row, column) {
            Some(Cell::Null) | None => None,
            Some(cell) => cell.as_text(),
        }
    }

    fn req_f64(&self, row: &[Cell], column: &str) -> GraphResult<f64> {
        self.cell(row, column)
            .and_then(Cell::as_f64)
            .ok_or_else(|| GraphError::MalformedRecord {
                message: format!("missing numeric column '{column}'"),
            })
    }

    fn text_list(&self, row: &[Cell], column: &str) -> Vec<String> {
        self.cell(row, column)
            .map(Cell::as_text_list)
            .unwrap_or_default()
    }
}

fn node_from_row(table: &ResultTable, row: &[Cell]) -> GraphResult<Node> {
    let mut labels = table.text_list(row, "labels");
    labels.retain(|l| l != NODE_LABEL);
    Ok(Node {
        uuid: parse_uuid(&table.req_text(row, "uuid")?)?,
        name: table.req_text(row, "name")?,
        labels,
        summary: table.opt_text(row, "summary").unwrap_or_default(),
        embedding: None,
        group_id: table.req_text(row, "group_id")?,
        created_at: parse_datetime(&table.req_text(row, "created_at")?)?,
        attributes: parse_attributes(table.opt_text(row, "attributes").as_deref()),
    })
}

fn edge_from_row(table: &ResultTable, row: &[Cell]) -> GraphResult<Edge> {
    Ok(Edge {
        uuid: parse_uuid(&table.req_text(row, "uuid")?)?,
        source_node_uuid: parse_uuid(&table.req_text(row, "source_node_uuid")?)?,
        target_node_uuid: parse_uuid(&table.req_text(row, "target_node_uuid")?)?,
        name: table.req_text(row, "name")?,
        fact: table.opt_text(row, "fact").unwrap_or_default(),
        embedding: None,
        episodes: parse_uuid_list(&table.text_list(row, "episodes"))?,
        group_id: table.req_text(row, "group_id")?,
        created_at: parse_datetime(&table.req_text(row, "created_at")?)?,
        valid_at: parse_optional_datetime(table.opt_text(row, "valid_at").as_deref())?,
        invalid_at: parse_optional_datetime(table.opt_text(row, "invalid_at").as_deref())?,
        expired_at: parse_optional_datetime(table.opt_text(row, "expired_at").as_deref())?,
    })
}

fn episode_from_row(table: &ResultTable, row: &[Cell]) -> GraphResult<Episode> {
    let source = match table.opt_text(row, "source").as_deref() {
        Some("message") => EpisodeSource::Message,
        Some("structured") | Some("json") => EpisodeSource::Structured,
        _ => EpisodeSource::Text,
    };
    Ok(Episode {
        uuid: parse_uuid(&table.req_text(row, "uuid")?)?,
        name: table.req_text(row, "name")?,
        content: table.req_text(row, "content")?,
        source,
        source_description: table.opt_text(row, "source_description").unwrap_or_default(),
        group_id: table.req_text(row, "group_id")?,
        created_at: parse_datetime(&table.req_text(row, "created_at")?)?,
        valid_at: parse_datetime(&table.req_text(row, "valid_at")?)?,
        entity_edges: parse_uuid_list(&table.text_list(row, "entity_edges"))?,
    })
}

fn community_from_row(table: &ResultTable, row: &[Cell]) -> GraphResult<Community> {
    Ok(Community {
        uuid: parse_uuid(&table.req_text(row, "uuid")?)?,
        name: table.req_text(row, "name")?,
        summary: table.opt_text(row, "summary").unwrap_or_default(),
        embedding: None,
        group_id: table.req_text(row, "group_id")?,
        created_at: parse_datetime(&table.req_text(row, "created_at")?)?,
    })
}

/// Inline list with the array-size bound applied; overflow is truncated
/// and named in the caller's skip list.
fn bounded_quoted_list(values: &[String], field: &'static str, skipped: &mut Vec<&'static str>) -> String {
    if values.len() > MAX_INLINE_ARRAY_LEN {
        skipped.push(field);
        quoted_list(&values[..MAX_INLINE_ARRAY_LEN])
    } else {
        quoted_list(values)
    }
}

fn node_filter_clauses(filter: &SearchFilter, var: &str, skipped: &mut Vec<&'static str>) -> Vec<String> {
    let mut clauses = Vec::new();
    if !filter.group_ids.is_empty() {
        let groups = bounded_quoted_list(&filter.sorted_group_ids(), "group_ids", skipped);
        clauses.push(format!("{var}.group_id IN {groups}"));
    }
    if !filter.node_labels.is_empty() {
        let labels = bounded_quoted_list(&filter.node_labels, "node_labels", skipped);
        clauses.push(format!(
            "any(label IN labels({var}) WHERE label IN {labels})"
        ));
    }
    clauses
}

fn edge_filter_clauses(filter: &SearchFilter, var: &str, skipped: &mut Vec<&'static str>) -> Vec<String> {
    let mut clauses = Vec::new();
    if !filter.group_ids.is_empty() {
        let groups = bounded_quoted_list(&filter.sorted_group_ids(), "group_ids", skipped);
        clauses.push(format!("{var}.group_id IN {groups}"));
    }
    if !filter.include_invalidated {
        clauses.push(format!("{var}.invalid_at IS NULL"));
    }
    if let Some(after) = filter.valid_after {
        clauses.push(format!(
            "{var}.valid_at >= {}",
            quoted(&render_datetime(&after))
        ));
    }
    if let Some(before) = filter.valid_before {
        clauses.push(format!(
            "{var}.valid_at <= {}",
            quoted(&render_datetime(&before))
        ));
    }
    clauses
}

fn group_filter_clauses(filter: &SearchFilter, var: &str, skipped: &mut Vec<&'static str>) -> Vec<String> {
    let mut clauses = Vec::new();
    if !filter.group_ids.is_empty() {
        let groups = bounded_quoted_list(&filter.sorted_group_ids(), "group_ids", skipped);
        clauses.push(format!("{var}.group_id IN {groups}"));
    }
    clauses
}

fn render_where(clauses: &[String], leading_where: bool) -> String {
    if clauses.is_empty() {
        return String::new();
    }
    let joined = clauses.join(" AND ");
    if leading_where {
        format!(" WHERE {joined}")
    } else {
        format!(" AND {joined}")
    }
}

fn uuid_literals(uuids: &[Uuid]) -> Vec<String> {
    uuids.iter().map(Uuid::to_string).collect()
}

fn log_skipped(skipped: &[&'static str]) {
    if !skipped.is_empty() {
        warn!(skipped = ?skipped, "inline values over array bound, truncated");
    }
}

#[async_trait]
impl GraphBackend for RedisGraphBackend {
    #[instrument(skip(self, query_text, filter))]
    async fn fulltext_nodes(
        &self,
        query_text: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Node, f64)>> {
        let mut skipped = Vec::new();
        let clauses = node_filter_clauses(filter, "n", &mut skipped);
        let where_clause = render_where(&clauses, true);
        let escaped_query = quoted(query_text);

        let text = self.bounded_query(
            |projection| {
                format!(
                    "CALL db.idx.fulltext.queryNodes('{NODE_LABEL}', {escaped_query}) \
                     YIELD node AS n, score{where_clause} \
                     RETURN {projection}, score \
                     ORDER BY score DESC, n.uuid ASC LIMIT {limit}"
                )
            },
            NODE_PROJECTION,
            NODE_PROJECTION_LEAN,
        );
        log_skipped(&skipped);

        let table = self.execute(&text).await?;
        table
            .rows
            .iter()
            .map(|row| Ok((node_from_row(&table, row)?, table.req_f64(row, "score")?)))
            .collect()
    }

    #[instrument(skip(self, query_text, filter))]
    async fn fulltext_edges(
        &self,
        query_text: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Edge, f64)>> {
        let mut skipped = Vec::new();
        let clauses = edge_filter_clauses(filter, "r", &mut skipped);
        let where_clause = render_where(&clauses, true);
        let escaped_query = quoted(query_text);

        let text = self.bounded_query(
            |projection| {
                format!(
                    "CALL db.idx.fulltext.queryRelationships('{EDGE_RELATION}', {escaped_query}) \
                     YIELD relationship AS r, score{where_clause} \
                     RETURN {projection}, score \
                     ORDER BY score DESC, r.uuid ASC LIMIT {limit}"
                )
            },
            EDGE_PROJECTION,
            EDGE_PROJECTION_LEAN,
        );
        log_skipped(&skipped);

        let table = self.execute(&text).await?;
        table
            .rows
            .iter()
            .map(|row| Ok((edge_from_row(&table, row)?, table.req_f64(row, "score")?)))
            .collect()
    }

    #[instrument(skip(self, query_text, filter))]
    async fn fulltext_episodes(
        &self,
        query_text: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Episode, f64)>> {
        let mut skipped = Vec::new();
        let clauses = group_filter_clauses(filter, "e", &mut skipped);
        let where_clause = render_where(&clauses, true);
        let escaped_query = quoted(query_text);

        let text = format!(
            "CALL db.idx.fulltext.queryNodes('{EPISODE_LABEL}', {escaped_query}) \
             YIELD node AS e, score{where_clause} \
             RETURN {EPISODE_PROJECTION}, score \
             ORDER BY score DESC, e.uuid ASC LIMIT {limit}"
        );
        log_skipped(&skipped);

        let table = self.execute(&text).await?;
        table
            .rows
            .iter()
            .map(|row| Ok((episode_from_row(&table, row)?, table.req_f64(row, "score")?)))
            .collect()
    }

    #[instrument(skip(self, query_text, filter))]
    async fn fulltext_communities(
        &self,
        query_text: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Community, f64)>> {
        let mut skipped = Vec::new();
        let clauses = group_filter_clauses(filter, "c", &mut skipped);
        let where_clause = render_where(&clauses, true);
        let escaped_query = quoted(query_text);

        let text = format!(
            "CALL db.idx.fulltext.queryNodes('{COMMUNITY_LABEL}', {escaped_query}) \
             YIELD node AS c, score{where_clause} \
             RETURN {COMMUNITY_PROJECTION}, score \
             ORDER BY score DESC, c.uuid ASC LIMIT {limit}"
        );
        log_skipped(&skipped);

        let table = self.execute(&text).await?;
        table
            .rows
            .iter()
            .map(|row| Ok((community_from_row(&table, row)?, table.req_f64(row, "score")?)))
            .collect()
    }

    #[instrument(skip(self, vector, filter))]
    async fn similar_nodes(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
        min_score: f64,
    ) -> GraphResult<Vec<(Node, f64)>> {
        let mut skipped = Vec::new();
        let clauses = node_filter_clauses(filter, "n", &mut skipped);
        let and_clause = render_where(&clauses, false);
        let embedding = float_array(vector);

        let text = self.bounded_query(
            |projection| {
                format!(
                    "CALL db.idx.vector.queryNodes('{NODE_LABEL}', '{NODE_VECTOR_ATTR}', {limit}, \
                     vecf32({embedding})) YIELD node AS n, score \
                     WITH n, (1 - score) AS similarity \
                     WHERE similarity >= {min_score}{and_clause} \
                     RETURN {projection}, similarity AS score \
                     ORDER BY score DESC, n.uuid ASC LIMIT {limit}"
                )
            },
            NODE_PROJECTION,
            NODE_PROJECTION_LEAN,
        );
        log_skipped(&skipped);

        let table = self.execute(&text).await?;
        table
            .rows
            .iter()
            .map(|row| Ok((node_from_row(&table, row)?, table.req_f64(row, "score")?)))
            .collect()
    }

    #[instrument(skip(self, vector, filter))]
    async fn similar_edges(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
        min_score: f64,
    ) -> GraphResult<Vec<(Edge, f64)>> {
        let mut skipped = Vec::new();
        let clauses = edge_filter_clauses(filter, "r", &mut skipped);
        let and_clause = render_where(&clauses, false);
        let embedding = float_array(vector);

        let text = self.bounded_query(
            |projection| {
                format!(
                    "CALL db.idx.vector.queryRelationships('{EDGE_RELATION}', '{EDGE_VECTOR_ATTR}', \
                     {limit}, vecf32({embedding})) YIELD relationship AS r, score \
                     WITH r, (1 - score) AS similarity \
                     WHERE similarity >= {min_score}{and_clause} \
                     RETURN {projection}, similarity AS score \
                     ORDER BY score DESC, r.uuid ASC LIMIT {limit}"
                )
            },
            EDGE_PROJECTION,
            EDGE_PROJECTION_LEAN,
        );
        log_skipped(&skipped);

        let table = self.execute(&text).await?;
        table
            .rows
            .iter()
            .map(|row| Ok((edge_from_row(&table, row)?, table.req_f64(row, "score")?)))
            .collect()
    }

    #[instrument(skip(self, vector, filter))]
    async fn similar_communities(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
        min_score: f64,
    ) -> GraphResult<Vec<(Community, f64)>> {
        let mut skipped = Vec::new();
        let clauses = group_filter_clauses(filter, "c", &mut skipped);
        let and_clause = render_where(&clauses, false);
        let embedding = float_array(vector);

        let text = format!(
            "CALL db.idx.vector.queryNodes('{COMMUNITY_LABEL}', '{COMMUNITY_VECTOR_ATTR}', {limit}, \
             vecf32({embedding})) YIELD node AS c, score \
             WITH c, (1 - score) AS similarity \
             WHERE similarity >= {min_score}{and_clause} \
             RETURN {COMMUNITY_PROJECTION}, similarity AS score \
             ORDER BY score DESC, c.uuid ASC LIMIT {limit}"
        );
        log_skipped(&skipped);

        let table = self.execute(&text).await?;
        table
            .rows
            .iter()
            .map(|row| Ok((community_from_row(&table, row)?, table.req_f64(row, "score")?)))
            .collect()
    }

    #[instrument(skip(self, origins, filter))]
    async fn bfs_nodes(
        &self,
        origins: &[Uuid],
        max_depth: u32,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Node, u32)>> {
        if origins.is_empty() || max_depth == 0 {
            return Ok(Vec::new());
        }
        let mut skipped = Vec::new();
        let origin_list = bounded_quoted_list(&uuid_literals(origins), "bfs_origins", &mut skipped);
        let clauses = node_filter_clauses(filter, "n", &mut skipped);
        let where_clause = render_where(&clauses, true);

        let text = self.bounded_query(
            |projection| {
                format!(
                    "MATCH (origin:{NODE_LABEL}) WHERE origin.uuid IN {origin_list} \
                     MATCH path = (origin)-[*1..{max_depth}]-(n:{NODE_LABEL}) \
                     WITH n, min(length(path)) AS depth{where_clause} \
                     RETURN {projection}, depth \
                     ORDER BY depth ASC, n.uuid ASC LIMIT {limit}"
                )
            },
            NODE_PROJECTION,
            NODE_PROJECTION_LEAN,
        );
        log_skipped(&skipped);

        let table = self.execute(&text).await?;
        table
            .rows
            .iter()
            .map(|row| {
                Ok((
                    node_from_row(&table, row)?,
                    table.req_f64(row, "depth")? as u32,
                ))
            })
            .collect()
    }

    #[instrument(skip(self, origins, filter))]
    async fn bfs_edges(
        &self,
        origins: &[Uuid],
        max_depth: u32,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Edge, u32)>> {
        if origins.is_empty() || max_depth == 0 {
            return Ok(Vec::new());
        }
        let mut skipped = Vec::new();
        let origin_list = bounded_quoted_list(&uuid_literals(origins), "bfs_origins", &mut skipped);
        let clauses = edge_filter_clauses(filter, "r", &mut skipped);
        let where_clause = render_where(&clauses, true);

        let text = self.bounded_query(
            |projection| {
                format!(
                    "MATCH (origin:{NODE_LABEL}) WHERE origin.uuid IN {origin_list} \
                     MATCH path = (origin)-[*1..{max_depth}]-(:{NODE_LABEL}) \
                     WITH last(relationships(path)) AS r, length(path) AS path_depth \
                     WITH r, min(path_depth) AS depth{where_clause} \
                     RETURN {projection}, depth \
                     ORDER BY depth ASC, r.uuid ASC LIMIT {limit}"
                )
            },
            EDGE_PROJECTION,
            EDGE_PROJECTION_LEAN,
        );
        log_skipped(&skipped);

        let table = self.execute(&text).await?;
        table
            .rows
            .iter()
            .map(|row| {
                Ok((
                    edge_from_row(&table, row)?,
                    table.req_f64(row, "depth")? as u32,
                ))
            })
            .collect()
    }

    async fn node_embeddings(&self, uuids: &[Uuid]) -> GraphResult<HashMap<Uuid, Vec<f32>>> {
        self.fetch_embeddings(
            &format!("MATCH (x:{NODE_LABEL})"),
            NODE_VECTOR_ATTR,
            uuids,
        )
        .await
    }

    async fn edge_embeddings(&self, uuids: &[Uuid]) -> GraphResult<HashMap<Uuid, Vec<f32>>> {
        self.fetch_embeddings(
            &format!("MATCH ()-[x:{EDGE_RELATION}]->()"),
            EDGE_VECTOR_ATTR,
            uuids,
        )
        .await
    }

    async fn community_embeddings(&self, uuids: &[Uuid]) -> GraphResult<HashMap<Uuid, Vec<f32>>> {
        self.fetch_embeddings(
            &format!("MATCH (x:{COMMUNITY_LABEL})"),
            COMMUNITY_VECTOR_ATTR,
            uuids,
        )
        .await
    }

    #[instrument(skip(self, uuids))]
    async fn distances_from(
        &self,
        center: Uuid,
        uuids: &[Uuid],
    ) -> GraphResult<HashMap<Uuid, u32>> {
        if uuids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut skipped = Vec::new();
        let uuid_list = bounded_quoted_list(&uuid_literals(uuids), "distance_targets", &mut skipped);
        let center_literal = quoted(&center.to_string());

        let text = format!(
            "MATCH (c:{NODE_LABEL} {{uuid: {center_literal}}}) \
             UNWIND {uuid_list} AS uid \
             MATCH (n:{NODE_LABEL} {{uuid: uid}}) \
             MATCH p = shortestPath((c)-[*0..{SHORTEST_PATH_BOUND}]-(n)) \
             RETURN uid, length(p) AS distance"
        );
        log_skipped(&skipped);

        let table = self.execute(&text).await?;
        let mut distances = HashMap::with_capacity(table.rows.len());
        for row in &table.rows {
            let uid = parse_uuid(&table.req_text(row, "uid")?)?;
            let distance = table.req_f64(row, "distance")? as u32;
            distances.insert(uid, distance);
        }
        Ok(distances)
    }

    async fn ping(&self) -> GraphResult<()> {
        let table = self.execute("RETURN 1").await?;
        if table.rows.is_empty() {
            return Err(GraphError::QueryFailed {
                message: "ping returned no rows".to_string(),
            });
        }
        Ok(())
    }
}

impl RedisGraphBackend {
    async fn fetch_embeddings(
        &self,
        match_clause: &str,
        attribute: &str,
        uuids: &[Uuid],
    ) -> GraphResult<HashMap<Uuid, Vec<f32>>> {
        if uuids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut skipped = Vec::new();
        let uuid_list = bounded_quoted_list(&uuid_literals(uuids), "embedding_targets", &mut skipped);
        let text = format!(
            "{match_clause} WHERE x.uuid IN {uuid_list} \
             RETURN x.uuid AS uuid, x.{attribute} AS embedding"
        );
        log_skipped(&skipped);

        let table = self.execute(&text).await?;
        let mut embeddings = HashMap::with_capacity(table.rows.len());
        for row in &table.rows {
            let uuid = parse_uuid(&table.req_text(row, "uuid")?)?;
            if let Some(vector) = table.cell(row, "embedding").and_then(Cell::as_f32_list) {
                embeddings.insert(uuid, vector);
            }
        }
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> redis::Value {
        redis::Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_result_table_parse_basic() {
        let reply = redis::Value::Array(vec![
            redis::Value::Array(vec![bulk("uuid"), bulk("score")]),
            redis::Value::Array(vec![
                redis::Value::Array(vec![bulk("abc"), redis::Value::Double(1.5)]),
                redis::Value::Array(vec![bulk("def"), redis::Value::Int(2)]),
            ]),
            redis::Value::Array(vec![bulk("Query internal execution time: 0.1 ms")]),
        ]);

        let table = ResultTable::parse(reply).unwrap();
        assert_eq!(table.columns, vec!["uuid", "score"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.req_text(&table.rows[0], "uuid").unwrap(), "abc");
        assert_eq!(table.req_f64(&table.rows[0], "score").unwrap(), 1.5);
        assert_eq!(table.req_f64(&table.rows[1], "score").unwrap(), 2.0);
    }

    #[test]
    fn test_result_table_stats_only() {
        let reply = redis::Value::Array(vec![redis::Value::Array(vec![bulk("ok")])]);
        let table = ResultTable::parse(reply).unwrap();
        assert!(table.rows.is_empty());
    }

    #[test]
    fn test_result_table_compact_header() {
        let reply = redis::Value::Array(vec![
            redis::Value::Array(vec![redis::Value::Array(vec![
                redis::Value::Int(1),
                bulk("name"),
            ])]),
            redis::Value::Array(vec![redis::Value::Array(vec![bulk("Alice")])]),
            redis::Value::Array(vec![]),
        ]);
        let table = ResultTable::parse(reply).unwrap();
        assert_eq!(table.columns, vec!["name"]);
        assert_eq!(table.req_text(&table.rows[0], "name").unwrap(), "Alice");
    }

    #[test]
    fn test_cell_numeric_coercions() {
        assert_eq!(Cell::Text("3.5".to_string()).as_f64(), Some(3.5));
        assert_eq!(Cell::Int(4).as_f64(), Some(4.0));
        assert_eq!(Cell::Null.as_f64(), None);
        assert_eq!(
            Cell::List(vec![Cell::Float(0.25), Cell::Int(1)]).as_f32_list(),
            Some(vec![0.25f32, 1.0])
        );
    }

    #[test]
    fn test_bounded_quoted_list_truncates() {
        let values: Vec<String> = (0..150).map(|i| format!("g{i}")).collect();
        let mut skipped = Vec::new();
        let rendered = bounded_quoted_list(&values, "group_ids", &mut skipped);
        assert_eq!(skipped, vec!["group_ids"]);
        assert!(rendered.matches(',').count() < 101);
        assert!(rendered.starts_with("['g0'"));
    }

    #[test]
    fn test_filter_clauses_escape_literals() {
        let filter = SearchFilter {
            group_ids: vec!["g'1".to_string()],
            ..Default::default()
        };
        let mut skipped = Vec::new();
        let clauses = edge_filter_clauses(&filter, "r", &mut skipped);
        assert!(clauses[0].contains("\\'"));
        assert!(clauses.iter().any(|c| c.contains("invalid_at IS NULL")));
    }

    #[test]
    fn test_invalidated_opt_in_drops_clause() {
        let filter = SearchFilter {
            include_invalidated: true,
            ..Default::default()
        };
        let mut skipped = Vec::new();
        let clauses = edge_filter_clauses(&filter, "r", &mut skipped);
        assert!(!clauses.iter().any(|c| c.contains("invalid_at")));
    }
}
