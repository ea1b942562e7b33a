//! Cypher-family dialect over Bolt.
//!
//! Parameters are bound for every literal; only structurally-validated
//! integers (limits, depth bounds) are interpolated, since the dialect
//! cannot parameterize them. Results are projected as scalar columns and
//! normalized through [`super::records`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use neo4rs::{Graph, Query, Row, query};
use tracing::instrument;
use uuid::Uuid;

use super::backend::GraphBackend;
use super::error::{GraphError, GraphResult};
use super::pool::ConnectionPool;
use super::records::{
    parse_attributes, parse_datetime, parse_optional_datetime, parse_uuid, parse_uuid_list,
};
use crate::model::{Community, Edge, Episode, EpisodeSource, Node, SearchFilter};

const NODE_FULLTEXT_INDEX: &str = "node_name_and_summary";
const EDGE_FULLTEXT_INDEX: &str = "edge_name_and_fact";
const EPISODE_FULLTEXT_INDEX: &str = "episode_content";
const COMMUNITY_FULLTEXT_INDEX: &str = "community_name";

const NODE_VECTOR_INDEX: &str = "node_name_embedding";
const EDGE_VECTOR_INDEX: &str = "edge_fact_embedding";
const COMMUNITY_VECTOR_INDEX: &str = "community_name_embedding";

const SHORTEST_PATH_BOUND: u32 = 10;

const NODE_PROJECTION: &str = "n.uuid AS uuid, n.name AS name, labels(n) AS labels, \
     coalesce(n.summary, '') AS summary, n.group_id AS group_id, \
     n.created_at AS created_at, n.attributes AS attributes";

const EDGE_PROJECTION: &str = "r.uuid AS uuid, startNode(r).uuid AS source_node_uuid, \
     endNode(r).uuid AS target_node_uuid, type(r) AS name, coalesce(r.fact, '') AS fact, \
     coalesce(r.episodes, []) AS episodes, r.group_id AS group_id, r.created_at AS created_at, \
     r.valid_at AS valid_at, r.invalid_at AS invalid_at, r.expired_at AS expired_at";

const EPISODE_PROJECTION: &str = "e.uuid AS uuid, e.name AS name, e.content AS content, \
     coalesce(e.source, 'text') AS source, coalesce(e.source_description, '') AS source_description, \
     e.group_id AS group_id, e.created_at AS created_at, e.valid_at AS valid_at, \
     coalesce(e.entity_edges, []) AS entity_edges";

const COMMUNITY_PROJECTION: &str = "c.uuid AS uuid, c.name AS name, \
     coalesce(c.summary, '') AS summary, c.group_id AS group_id, c.created_at AS created_at";

/// Bolt-backed [`GraphBackend`].
pub struct CypherBackend {
    pool: ConnectionPool<Graph>,
    url: String,
}

impl std::fmt::Debug for CypherBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CypherBackend")
            .field("url", &self.url)
            .field("pool", &self.pool)
            .finish()
    }
}

impl CypherBackend {
    /// Connects and fills the bounded pool.
    pub async fn connect(
        url: &str,
        user: Option<&str>,
        password: Option<&str>,
        pool_size: usize,
        acquire_timeout: Duration,
    ) -> GraphResult<Self> {
        let user = user.unwrap_or("neo4j");
        let password = password.unwrap_or("");

        let mut connections = Vec::with_capacity(pool_size);
        for _ in 0..pool_size.max(1) {
            let graph = Graph::new(url, user, password).await.map_err(|e| {
                let message = e.to_string();
                if message.to_ascii_lowercase().contains("auth") {
                    GraphError::AuthFailed { message }
                } else {
                    GraphError::ConnectionFailed {
                        url: url.to_string(),
                        message,
                    }
                }
            })?;
            connections.push(graph);
        }

        Ok(Self {
            pool: ConnectionPool::new(connections, acquire_timeout),
            url: url.to_string(),
        })
    }

    async fn run_query(&self, q: Query) -> GraphResult<Vec<Row>> {
        let conn = self.pool.acquire().await?;
        let mut stream = conn
            .execute(q)
            .await
            .map_err(|e| GraphError::QueryFailed {
                message: e.to_string(),
            })?;

        let mut rows = Vec::new();
        loop {
            match stream.next().await {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => break,
                Err(e) => {
                    return Err(GraphError::QueryFailed {
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(rows)
    }
}

// Row accessors: every projection names its columns, so a decode failure
// means the store and the core disagree about the schema.

fn req_str(row: &Row, col: &str) -> GraphResult<String> {
    row.get::<String>(col).map_err(|e| GraphError::MalformedRecord {
        message: format!("column '{col}': {e}"),
    })
}

fn opt_str(row: &Row, col: &str) -> Option<String> {
    row.get::<Option<String>>(col).ok().flatten()
}

fn req_f64(row: &Row, col: &str) -> GraphResult<f64> {
    if let Ok(value) = row.get::<f64>(col) {
        return Ok(value);
    }
    row.get::<i64>(col)
        .map(|v| v as f64)
        .map_err(|e| GraphError::MalformedRecord {
            message: format!("column '{col}': {e}"),
        })
}

fn str_list(row: &Row, col: &str) -> Vec<String> {
    row.get::<Vec<String>>(col).unwrap_or_default()
}

fn node_from_row(row: &Row) -> GraphResult<Node> {
    let mut labels = str_list(row, "labels");
    labels.retain(|l| l != "Entity");
    Ok(Node {
        uuid: parse_uuid(&req_str(row, "uuid")?)?,
        name: req_str(row, "name")?,
        labels,
        summary: req_str(row, "summary")?,
        embedding: None,
        group_id: req_str(row, "group_id")?,
        created_at: parse_datetime(&req_str(row, "created_at")?)?,
        attributes: parse_attributes(opt_str(row, "attributes").as_deref()),
    })
}

fn edge_from_row(row: &Row) -> GraphResult<Edge> {
    Ok(Edge {
        uuid: parse_uuid(&req_str(row, "uuid")?)?,
        source_node_uuid: parse_uuid(&req_str(row, "source_node_uuid")?)?,
        target_node_uuid: parse_uuid(&req_str(row, "target_node_uuid")?)?,
        name: req_str(row, "name")?,
        fact: req_str(row, "fact")?,
        embedding: None,
        episodes: parse_uuid_list(&str_list(row, "episodes"))?,
        group_id: req_str(row, "group_id")?,
        created_at: parse_datetime(&req_str(row, "created_at")?)?,
        valid_at: parse_optional_datetime(opt_str(row, "valid_at").as_deref())?,
        invalid_at: parse_optional_datetime(opt_str(row, "invalid_at").as_deref())?,
        expired_at: parse_optional_datetime(opt_str(row, "expired_at").as_deref())?,
    })
}

fn episode_from_row(row: &Row) -> GraphResult<Episode> {
    let source = match req_str(row, "source")?.as_str() {
        "message" => EpisodeSource::Message,
        "structured" | "json" => EpisodeSource::Structured,
        _ => EpisodeSource::Text,
    };
    Ok(Episode {
        uuid: parse_uuid(&req_str(row, "uuid")?)?,
        name: req_str(row, "name")?,
        content: req_str(row, "content")?,
        source,
        source_description: req_str(row, "source_description")?,
        group_id: req_str(row, "group_id")?,
        created_at: parse_datetime(&req_str(row, "created_at")?)?,
        valid_at: parse_datetime(&req_str(row, "valid_at")?)?,
        entity_edges: parse_uuid_list(&str_list(row, "entity_edges"))?,
    })
}

fn community_from_row(row: &Row) -> GraphResult<Community> {
    Ok(Community {
        uuid: parse_uuid(&req_str(row, "uuid")?)?,
        name: req_str(row, "name")?,
        summary: req_str(row, "summary")?,
        embedding: None,
        group_id: req_str(row, "group_id")?,
        created_at: parse_datetime(&req_str(row, "created_at")?)?,
    })
}

/// WHERE fragments plus their bound parameters.
struct FilterClauses {
    clauses: Vec<String>,
    group_ids: Option<Vec<String>>,
    node_labels: Option<Vec<String>>,
    valid_after: Option<String>,
    valid_before: Option<String>,
}

impl FilterClauses {
    fn for_nodes(filter: &SearchFilter, var: &str) -> Self {
        let mut clauses = Vec::new();
        let group_ids = if filter.group_ids.is_empty() {
            None
        } else {
            clauses.push(format!("{var}.group_id IN $group_ids"));
            Some(filter.sorted_group_ids())
        };
        let node_labels = if filter.node_labels.is_empty() {
            None
        } else {
            clauses.push(format!(
                "any(label IN labels({var}) WHERE label IN $node_labels)"
            ));
            Some(filter.node_labels.clone())
        };
        Self {
            clauses,
            group_ids,
            node_labels,
            valid_after: None,
            valid_before: None,
        }
    }

    fn for_edges(filter: &SearchFilter, var: &str) -> Self {
        let mut clauses = Vec::new();
        let group_ids = if filter.group_ids.is_empty() {
            None
        } else {
            clauses.push(format!("{var}.group_id IN $group_ids"));
            Some(filter.sorted_group_ids())
        };
        if !filter.include_invalidated {
            clauses.push(format!("{var}.invalid_at IS NULL"));
        }
        let valid_after = filter.valid_after.map(|t| {
            clauses.push(format!("{var}.valid_at >= $valid_after"));
            super::records::render_datetime(&t)
        });
        let valid_before = filter.valid_before.map(|t| {
            clauses.push(format!("{var}.valid_at <= $valid_before"));
            super::records::render_datetime(&t)
        });
        Self {
            clauses,
            group_ids,
            node_labels: None,
            valid_after,
            valid_before,
        }
    }

    fn for_groups_only(filter: &SearchFilter, var: &str) -> Self {
        let mut clauses = Vec::new();
        let group_ids = if filter.group_ids.is_empty() {
            None
        } else {
            clauses.push(format!("{var}.group_id IN $group_ids"));
            Some(filter.sorted_group_ids())
        };
        Self {
            clauses,
            group_ids,
            node_labels: None,
            valid_after: None,
            valid_before: None,
        }
    }

    /// `AND c1 AND c2 …` (the caller opens with its own predicate), or
    /// `WHERE c1 AND c2 …` when it is the whole clause.
    fn render(&self, leading_where: bool) -> String {
        if self.clauses.is_empty() {
            return String::new();
        }
        let joined = self.clauses.join(" AND ");
        if leading_where {
            format!(" WHERE {joined}")
        } else {
            format!(" AND {joined}")
        }
    }

    fn bind(&self, mut q: Query) -> Query {
        if let Some(groups) = &self.group_ids {
            q = q.param("group_ids", groups.clone());
        }
        if let Some(labels) = &self.node_labels {
            q = q.param("node_labels", labels.clone());
        }
        if let Some(after) = &self.valid_after {
            q = q.param("valid_after", after.clone());
        }
        if let Some(before) = &self.valid_before {
            q = q.param("valid_before", before.clone());
        }
        q
    }
}

fn vector_param(vector: &[f32]) -> Vec<f64> {
    vector.iter().map(|v| *v as f64).collect()
}

fn uuid_strings(uuids: &[Uuid]) -> Vec<String> {
    uuids.iter().map(Uuid::to_string).collect()
}

#[async_trait]
impl GraphBackend for CypherBackend {
    #[instrument(skip(self, query_text, filter))]
    async fn fulltext_nodes(
        &self,
        query_text: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Node, f64)>> {
        let clauses = FilterClauses::for_nodes(filter, "n");
        let text = format!(
            "CALL db.index.fulltext.queryNodes('{NODE_FULLTEXT_INDEX}', $query) \
             YIELD node AS n, score{} \
             RETURN {NODE_PROJECTION}, score \
             ORDER BY score DESC, n.uuid ASC LIMIT {limit}",
            clauses.render(true)
        );
        let q = clauses.bind(query(&text).param("query", query_text.to_string()));

        let rows = self.run_query(q).await?;
        rows.iter()
            .map(|row| Ok((node_from_row(row)?, req_f64(row, "score")?)))
            .collect()
    }

    #[instrument(skip(self, query_text, filter))]
    async fn fulltext_edges(
        &self,
        query_text: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Edge, f64)>> {
        let clauses = FilterClauses::for_edges(filter, "r");
        let text = format!(
            "CALL db.index.fulltext.queryRelationships('{EDGE_FULLTEXT_INDEX}', $query) \
             YIELD relationship AS r, score{} \
             RETURN {EDGE_PROJECTION}, score \
             ORDER BY score DESC, r.uuid ASC LIMIT {limit}",
            clauses.render(true)
        );
        let q = clauses.bind(query(&text).param("query", query_text.to_string()));

        let rows = self.run_query(q).await?;
        rows.iter()
            .map(|row| Ok((edge_from_row(row)?, req_f64(row, "score")?)))
            .collect()
    }

    #[instrument(skip(self, query_text, filter))]
    async fn fulltext_episodes(
        &self,
        query_text: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Episode, f64)>> {
        let clauses = FilterClauses::for_groups_only(filter, "e");
        let text = format!(
            "CALL db.index.fulltext.queryNodes('{EPISODE_FULLTEXT_INDEX}', $query) \
             YIELD node AS e, score{} \
             RETURN {EPISODE_PROJECTION}, score \
             ORDER BY score DESC, e.uuid ASC LIMIT {limit}",
            clauses.render(true)
        );
        let q = clauses.bind(query(&text).param("query", query_text.to_string()));

        let rows = self.run_query(q).await?;
        rows.iter()
            .map(|row| Ok((episode_from_row(row)?, req_f64(row, "score")?)))
            .collect()
    }

    #[instrument(skip(self, query_text, filter))]
    async fn fulltext_communities(
        &self,
        query_text: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Community, f64)>> {
        let clauses = FilterClauses::for_groups_only(filter, "c");
        let text = format!(
            "CALL db.index.fulltext.queryNodes('{COMMUNITY_FULLTEXT_INDEX}', $query) \
             YIELD node AS c, score{} \
             RETURN {COMMUNITY_PROJECTION}, score \
             ORDER BY score DESC, c.uuid ASC LIMIT {limit}",
            clauses.render(true)
        );
        let q = clauses.bind(query(&text).param("query", query_text.to_string()));

        let rows = self.run_query(q).await?;
        rows.iter()
            .map(|row| Ok((community_from_row(row)?, req_f64(row, "score")?)))
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
        let clauses = FilterClauses::for_nodes(filter, "n");
        let text = format!(
            "CALL db.index.vector.queryNodes('{NODE_VECTOR_INDEX}', {limit}, $embedding) \
             YIELD node AS n, score \
             WHERE score >= $min_score{} \
             RETURN {NODE_PROJECTION}, score \
             ORDER BY score DESC, n.uuid ASC LIMIT {limit}",
            clauses.render(false)
        );
        let q = clauses.bind(
            query(&text)
                .param("embedding", vector_param(vector))
                .param("min_score", min_score),
        );

        let rows = self.run_query(q).await?;
        rows.iter()
            .map(|row| Ok((node_from_row(row)?, req_f64(row, "score")?)))
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
        let clauses = FilterClauses::for_edges(filter, "r");
        let text = format!(
            "CALL db.index.vector.queryRelationships('{EDGE_VECTOR_INDEX}', {limit}, $embedding) \
             YIELD relationship AS r, score \
             WHERE score >= $min_score{} \
             RETURN {EDGE_PROJECTION}, score \
             ORDER BY score DESC, r.uuid ASC LIMIT {limit}",
            clauses.render(false)
        );
        let q = clauses.bind(
            query(&text)
                .param("embedding", vector_param(vector))
                .param("min_score", min_score),
        );

        let rows = self.run_query(q).await?;
        rows.iter()
            .map(|row| Ok((edge_from_row(row)?, req_f64(row, "score")?)))
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
        let clauses = FilterClauses::for_groups_only(filter, "c");
        let text = format!(
            "CALL db.index.vector.queryNodes('{COMMUNITY_VECTOR_INDEX}', {limit}, $embedding) \
             YIELD node AS c, score \
             WHERE score >= $min_score{} \
             RETURN {COMMUNITY_PROJECTION}, score \
             ORDER BY score DESC, c.uuid ASC LIMIT {limit}",
            clauses.render(false)
        );
        let q = clauses.bind(
            query(&text)
                .param("embedding", vector_param(vector))
                .param("min_score", min_score),
        );

        let rows = self.run_query(q).await?;
        rows.iter()
            .map(|row| Ok((community_from_row(row)?, req_f64(row, "score")?)))
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
        let clauses = FilterClauses::for_nodes(filter, "n");
        let text = format!(
            "MATCH (origin:Entity) WHERE origin.uuid IN $origins \
             MATCH path = (origin)-[*1..{max_depth}]-(n:Entity) \
             WITH n, min(length(path)) AS depth{} \
             RETURN {NODE_PROJECTION}, depth \
             ORDER BY depth ASC, n.uuid ASC LIMIT {limit}",
            clauses.render(true)
        );
        let q = clauses.bind(query(&text).param("origins", uuid_strings(origins)));

        let rows = self.run_query(q).await?;
        rows.iter()
            .map(|row| Ok((node_from_row(row)?, req_f64(row, "depth")? as u32)))
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
        let clauses = FilterClauses::for_edges(filter, "r");
        let text = format!(
            "MATCH (origin:Entity) WHERE origin.uuid IN $origins \
             MATCH path = (origin)-[*1..{max_depth}]-(:Entity) \
             WITH last(relationships(path)) AS r, length(path) AS path_depth \
             WITH r, min(path_depth) AS depth{} \
             RETURN {EDGE_PROJECTION}, depth \
             ORDER BY depth ASC, r.uuid ASC LIMIT {limit}",
            clauses.render(true)
        );
        let q = clauses.bind(query(&text).param("origins", uuid_strings(origins)));

        let rows = self.run_query(q).await?;
        rows.iter()
            .map(|row| Ok((edge_from_row(row)?, req_f64(row, "depth")? as u32)))
            .collect()
    }

    async fn node_embeddings(&self, uuids: &[Uuid]) -> GraphResult<HashMap<Uuid, Vec<f32>>> {
        self.fetch_embeddings("MATCH (x:Entity) WHERE x.uuid IN $uuids", "name_embedding", uuids)
            .await
    }

    async fn edge_embeddings(&self, uuids: &[Uuid]) -> GraphResult<HashMap<Uuid, Vec<f32>>> {
        self.fetch_embeddings(
            "MATCH ()-[x:RELATES_TO]->() WHERE x.uuid IN $uuids",
            "fact_embedding",
            uuids,
        )
        .await
    }

    async fn community_embeddings(&self, uuids: &[Uuid]) -> GraphResult<HashMap<Uuid, Vec<f32>>> {
        self.fetch_embeddings(
            "MATCH (x:Community) WHERE x.uuid IN $uuids",
            "name_embedding",
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
        let text = format!(
            "MATCH (c:Entity {{uuid: $center}}) \
             UNWIND $uuids AS uid \
             MATCH (n:Entity {{uuid: uid}}) \
             MATCH p = shortestPath((c)-[*0..{SHORTEST_PATH_BOUND}]-(n)) \
             RETURN uid, length(p) AS distance"
        );
        let q = query(&text)
            .param("center", center.to_string())
            .param("uuids", uuid_strings(uuids));

        let rows = self.run_query(q).await?;
        let mut distances = HashMap::with_capacity(rows.len());
        for row in &rows {
            let uid = parse_uuid(&req_str(row, "uid")?)?;
            let distance = req_f64(row, "distance")? as u32;
            distances.insert(uid, distance);
        }
        Ok(distances)
    }

    async fn ping(&self) -> GraphResult<()> {
        let rows = self.run_query(query("RETURN 1 AS one")).await?;
        if rows.is_empty() {
            return Err(GraphError::QueryFailed {
                message: "ping returned no rows".to_string(),
            });
        }
        Ok(())
    }
}

impl CypherBackend {
    async fn fetch_embeddings(
        &self,
        match_clause: &str,
        property: &str,
        uuids: &[Uuid],
    ) -> GraphResult<HashMap<Uuid, Vec<f32>>> {
        if uuids.is_empty() {
            return Ok(HashMap::new());
        }
        let text =
            format!("{match_clause} RETURN x.uuid AS uuid, x.{property} AS embedding");
        let q = query(&text).param("uuids", uuid_strings(uuids));

        let rows = self.run_query(q).await?;
        let mut embeddings = HashMap::with_capacity(rows.len());
        for row in &rows {
            let uuid = parse_uuid(&req_str(row, "uuid")?)?;
            if let Ok(Some(vector)) = row.get::<Option<Vec<f64>>>("embedding") {
                embeddings.insert(uuid, vector.into_iter().map(|v| v as f32).collect());
            }
        }
        Ok(embeddings)
    }
}
