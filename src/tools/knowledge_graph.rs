//! Knowledge graph question answering over Neo4j
//!
//! A question is answered in two model calls: the first turns the question
//! into Cypher using the introspected schema, the second phrases an answer
//! from the returned rows.

use super::{parse_input, Tool, ToolContext, ToolError, ToolOutput, GRAPH_TOOL_NAME};
use crate::llm::{complete_text, LlmService};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Rows handed to the answering prompt
const TOP_K: usize = 5;

pub const DEFAULT_DATABASE: &str = "neo4j";

/// A graph that executes Cypher
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Run one statement, returning each row as column name -> value
    async fn query(&self, cypher: &str) -> Result<Vec<Map<String, Value>>, ToolError>;

    /// Release the connection. Later queries fail.
    async fn close(&self);
}

// ============================================================================
// Neo4j over the HTTP transactional endpoint
// ============================================================================

/// Map a driver URI (`bolt://`, `neo4j://`, `neo4j+s://`, ...) to the HTTP API base URL
pub fn http_base_from_uri(uri: &str) -> Result<String, ToolError> {
    let (scheme, rest) = uri
        .trim()
        .split_once("://")
        .ok_or_else(|| ToolError::InvalidInput(format!("Graph URI has no scheme: {uri}")))?;
    let authority = rest.split('/').next().unwrap_or_default();
    if authority.is_empty() {
        return Err(ToolError::InvalidInput(format!("Graph URI has no host: {uri}")));
    }
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => (host, Some(port)),
        _ => (authority, None),
    };

    match scheme {
        "http" | "https" => Ok(format!("{scheme}://{authority}")),
        "bolt" | "neo4j" => {
            let port = match port {
                None | Some("7687") => "7474",
                Some(other) => other,
            };
            Ok(format!("http://{host}:{port}"))
        }
        // Encrypted schemes front the HTTP API on the default https port
        "bolt+s" | "bolt+ssc" | "neo4j+s" | "neo4j+ssc" => Ok(format!("https://{host}")),
        other => Err(ToolError::InvalidInput(format!("Unsupported graph URI scheme: {other}"))),
    }
}

#[derive(Serialize)]
struct StatementsRequest<'a> {
    statements: [Statement<'a>; 1],
}

#[derive(Serialize)]
struct Statement<'a> {
    statement: &'a str,
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    data: Vec<RowData>,
}

#[derive(Debug, Deserialize)]
struct RowData {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Neo4jError {
    code: String,
    message: String,
}

/// Neo4j reached through `POST /db/{database}/tx/commit`
pub struct Neo4jHttpGraph {
    client: Client,
    endpoint: String,
    username: String,
    password: String,
    closed: AtomicBool,
}

impl Neo4jHttpGraph {
    /// Build the client and verify connectivity with a trivial statement
    pub async fn connect(
        uri: &str,
        username: &str,
        password: &str,
        database: &str,
    ) -> Result<Self, ToolError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        let graph = Self {
            client,
            endpoint: format!("{}/db/{database}/tx/commit", http_base_from_uri(uri)?),
            username: username.to_string(),
            password: password.to_string(),
            closed: AtomicBool::new(false),
        };

        graph.query("RETURN 1 AS ok").await?;
        tracing::info!(endpoint = %graph.endpoint, "Connected to Neo4j");
        Ok(graph)
    }
}

#[async_trait]
impl GraphStore for Neo4jHttpGraph {
    async fn query(&self, cypher: &str) -> Result<Vec<Map<String, Value>>, ToolError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ToolError::Query("Neo4j connection closed".to_string()));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .json(&StatementsRequest {
                statements: [Statement { statement: cypher }],
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Upstream {
                service: "Neo4j",
                status: status.as_u16(),
                body,
            });
        }

        let body: TransactionResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Decode(e.to_string()))?;

        if let Some(error) = body.errors.first() {
            return Err(ToolError::Query(format!("{}: {}", error.code, error.message)));
        }

        let Some(result) = body.results.into_iter().next() else {
            return Ok(vec![]);
        };
        Ok(result
            .data
            .into_iter()
            .map(|data| result.columns.iter().cloned().zip(data.row).collect())
            .collect())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(endpoint = %self.endpoint, "Neo4j connection closed");
        }
    }
}

// ============================================================================
// Question answering chain
// ============================================================================

/// Natural language question answering over a [`GraphStore`]
pub struct GraphQa {
    llm: Arc<dyn LlmService>,
    graph: Arc<dyn GraphStore>,
    schema: String,
    fence: Regex,
}

impl GraphQa {
    /// Introspect the schema once; every question is answered against it
    pub async fn new(llm: Arc<dyn LlmService>, graph: Arc<dyn GraphStore>) -> Result<Self, ToolError> {
        let schema = introspect_schema(graph.as_ref()).await?;
        tracing::debug!(%schema, "Graph schema loaded");
        Ok(Self {
            llm,
            graph,
            schema,
            fence: Regex::new(r"(?s)```(?:cypher|Cypher)?\s*(.*?)```")?,
        })
    }

    fn extract_cypher(&self, generated: &str) -> String {
        self.fence
            .captures(generated)
            .and_then(|c| c.get(1))
            .map_or(generated, |m| m.as_str())
            .trim()
            .to_string()
    }

    pub async fn ask(&self, question: &str) -> Result<String, ToolError> {
        let generated = complete_text(self.llm.as_ref(), cypher_generation_prompt(&self.schema, question)).await?;
        let cypher = self.extract_cypher(&generated);
        tracing::info!(%cypher, "Generated Cypher");

        let mut rows = self.graph.query(&cypher).await?;
        rows.truncate(TOP_K);
        let context = serde_json::to_string(&rows).map_err(|e| ToolError::Decode(e.to_string()))?;

        Ok(complete_text(self.llm.as_ref(), graph_answer_prompt(&context, question)).await?)
    }
}

const NODE_PROPERTIES_QUERY: &str = "CALL db.schema.nodeTypeProperties() \
     YIELD nodeLabels, propertyName, propertyTypes \
     RETURN nodeLabels, propertyName, propertyTypes";

const RELATIONSHIP_PROPERTIES_QUERY: &str = "CALL db.schema.relTypeProperties() \
     YIELD relType, propertyName, propertyTypes \
     RETURN relType, propertyName, propertyTypes";

const RELATIONSHIP_PATTERNS_QUERY: &str =
    "MATCH (a)-[r]->(b) RETURN DISTINCT labels(a) AS start, type(r) AS type, labels(b) AS end";

/// Render the schema as node properties per label, relationship properties
/// per type and the directed relationship patterns.
async fn introspect_schema(graph: &dyn GraphStore) -> Result<String, ToolError> {
    let node_rows = graph.query(NODE_PROPERTIES_QUERY).await?;
    let relationship_rows = graph.query(RELATIONSHIP_PROPERTIES_QUERY).await?;
    let pattern_rows = graph.query(RELATIONSHIP_PATTERNS_QUERY).await?;

    let nodes = group_properties(&node_rows, |row| {
        let labels = string_list(row.get("nodeLabels"));
        (!labels.is_empty()).then(|| labels.join(":"))
    });
    // relType comes back as ":`TYPE`"
    let relationships = group_properties(&relationship_rows, |row| {
        row.get("relType")
            .and_then(Value::as_str)
            .map(|t| t.trim_start_matches(':').trim_matches('`').to_string())
    });
    let patterns: BTreeSet<String> = pattern_rows
        .iter()
        .filter_map(|row| {
            let start = string_list(row.get("start")).join(":");
            let end = string_list(row.get("end")).join(":");
            let kind = row.get("type").and_then(Value::as_str)?;
            Some(format!("(:{start})-[:{kind}]->(:{end})"))
        })
        .collect();

    let mut schema = String::from("Node properties:\n");
    write_properties(&mut schema, &nodes);
    schema.push_str("Relationship properties:\n");
    write_properties(&mut schema, &relationships);
    schema.push_str("The relationships:\n");
    for pattern in &patterns {
        schema.push_str(pattern);
        schema.push('\n');
    }
    Ok(schema.trim_end().to_string())
}

fn string_list(value: Option<&Value>) -> Vec<&str> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// Group `propertyName`/`propertyTypes` rows under the owner each row names
fn group_properties(
    rows: &[Map<String, Value>],
    owner: impl Fn(&Map<String, Value>) -> Option<String>,
) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in rows {
        let Some(owner) = owner(row) else { continue };
        let properties = grouped.entry(owner).or_default();
        // Owners without properties yield a single row with a null name
        if let Some(name) = row.get("propertyName").and_then(Value::as_str) {
            let types = string_list(row.get("propertyTypes")).join("|");
            properties.push(format!("{name}: {types}"));
        }
    }
    grouped
}

fn write_properties(out: &mut String, grouped: &BTreeMap<String, Vec<String>>) {
    for (owner, properties) in grouped.iter().filter(|(_, p)| !p.is_empty()) {
        let _ = writeln!(out, "{owner} {{{}}}", properties.join(", "));
    }
}

fn cypher_generation_prompt(schema: &str, question: &str) -> String {
    format!(
        "Task: Generate a Cypher statement to query a graph database.\n\
         Instructions:\n\
         Use only the provided node labels, relationship types and properties in the schema.\n\
         Do not use any other relationship types or properties that are not provided.\n\
         Schema:\n{schema}\n\n\
         Do not include any explanations or apologies in your response.\n\
         Do not respond to any questions that might ask anything else than for you to construct a Cypher statement.\n\
         Do not include any text except the generated Cypher statement.\n\n\
         The question is:\n{question}"
    )
}

fn graph_answer_prompt(context: &str, question: &str) -> String {
    format!(
        "You are an assistant that helps to form nice and human understandable answers.\n\
         The information part contains the provided information that you must use to construct an answer.\n\
         The provided information is authoritative, never doubt it or try to use your internal knowledge to correct it.\n\
         Make the answer sound as a response to the question. Do not mention that you based the result on the given information.\n\
         If the provided information is empty, say that you don't know the answer.\n\
         Information:\n{context}\n\n\
         Question: {question}\n\
         Helpful Answer:"
    )
}

// ============================================================================
// Tool
// ============================================================================

#[derive(Debug, Deserialize)]
struct GraphQuestion {
    question: String,
}

/// Knowledge graph tool. Registered even when the graph is unreachable so the
/// manifest stays fixed; in that case every call reports the missing connection.
pub struct KnowledgeGraphTool {
    qa: Option<GraphQa>,
}

impl KnowledgeGraphTool {
    pub fn new(qa: GraphQa) -> Self {
        Self { qa: Some(qa) }
    }

    pub fn uninitialized() -> Self {
        Self { qa: None }
    }
}

#[async_trait]
impl Tool for KnowledgeGraphTool {
    fn name(&self) -> &str {
        GRAPH_TOOL_NAME
    }

    fn description(&self) -> String {
        "Query the Neo4j pharmaceutical knowledge graph with natural language questions. Returns an answer based on the graph data.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["question"],
            "properties": {
                "question": {
                    "type": "string",
                    "description": "Natural language question about the knowledge graph"
                }
            }
        })
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> ToolOutput {
        let Some(qa) = &self.qa else {
            return ToolOutput::error("Error: Neo4j tool not initialized");
        };

        let question = match parse_input::<GraphQuestion>(input) {
            Ok(q) => q.question,
            Err(e) => return ToolOutput::error(format!("Error querying Neo4j: {e}")),
        };

        match qa.ask(&question).await {
            Ok(answer) => ToolOutput::success(answer),
            Err(e) => {
                tracing::warn!(error = %e, "Graph question failed");
                ToolOutput::error(format!("Error: {e}"))
            }
        }
    }
}
