//! openFDA adverse event lookup
//!
//! Queries the drug adverse event endpoint and reduces each safety report to
//! the handful of fields the agent reasons over. Reports are best-effort:
//! every missing field falls back to [`NOT_AVAILABLE`] instead of failing the
//! whole lookup.

use super::{parse_input, Tool, ToolContext, ToolError, ToolOutput, FDA_TOOL_NAME};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_OPENFDA_BASE_URL: &str = "https://api.fda.gov";

const NOT_AVAILABLE: &str = "N/A";
const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 100;

/// One safety report reduced to its essentials
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdverseEventRecord {
    pub report_date: String,
    pub report_id: String,
    /// Drug entries of the report whose name contains the searched drug
    pub drug_names: Vec<String>,
    pub reactions: Vec<String>,
    pub outcomes: Vec<String>,
}

impl AdverseEventRecord {
    fn from_report(report: &Value, drug_name: &str) -> Self {
        let needle = drug_name.to_uppercase();
        let patient = report.get("patient");

        let drug_names = patient
            .and_then(|p| p.get("drug"))
            .and_then(Value::as_array)
            .map(|drugs| {
                drugs
                    .iter()
                    .map(|d| field_or_na(d, "medicinalproduct"))
                    .filter(|name| name.to_uppercase().contains(&needle))
                    .collect()
            })
            .unwrap_or_default();

        let reactions = patient
            .and_then(|p| p.get("reaction"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        Self {
            report_date: normalize_date(&field_or_na(report, "receivedate")),
            report_id: field_or_na(report, "safetyreportid"),
            drug_names,
            reactions: reactions.iter().map(|r| field_or_na(r, "reactionmeddrapt")).collect(),
            outcomes: reactions.iter().map(|r| field_or_na(r, "reactionoutcome")).collect(),
        }
    }
}

fn field_or_na(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// `YYYYMMDD` becomes `YYYY-MM-DD`; anything else is kept as-is
fn normalize_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Client for the openFDA drug event endpoint
#[derive(Clone)]
pub struct OpenFdaClient {
    client: Client,
    base_url: String,
}

impl OpenFdaClient {
    pub fn new(base_url: &str) -> Result<Self, ToolError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Most recent reports mentioning `drug_name`, newest first
    pub async fn adverse_events(
        &self,
        drug_name: &str,
        limit: u32,
    ) -> Result<Vec<AdverseEventRecord>, ToolError> {
        let term = if drug_name.contains(char::is_whitespace) {
            format!("\"{drug_name}\"")
        } else {
            drug_name.to_string()
        };

        let response = self
            .client
            .get(format!("{}/drug/event.json", self.base_url))
            .query(&[
                ("search", format!("patient.drug.medicinalproduct:{term}")),
                ("limit", limit.to_string()),
                ("sort", "receivedate:desc".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        // openFDA answers "No matches found!" with a 404
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(drug = %drug_name, "No adverse event reports found");
            return Ok(vec![]);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Upstream {
                service: "openFDA",
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Decode(e.to_string()))?;

        Ok(body
            .get("results")
            .and_then(Value::as_array)
            .map(|reports| {
                reports
                    .iter()
                    .map(|r| AdverseEventRecord::from_report(r, drug_name))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct AdverseEventsInput {
    drug_name: String,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

/// Adverse event lookup exposed to the model
pub struct AdverseEventsTool {
    client: OpenFdaClient,
}

impl AdverseEventsTool {
    pub fn new(client: OpenFdaClient) -> Self {
        Self { client }
    }

    async fn lookup(&self, input: Value) -> Result<String, ToolError> {
        let input: AdverseEventsInput = parse_input(input)?;
        let drug_name = input.drug_name.trim();
        if drug_name.is_empty() {
            return Err(ToolError::InvalidInput("drug_name must not be empty".to_string()));
        }

        let records = self
            .client
            .adverse_events(drug_name, input.limit.clamp(1, MAX_LIMIT))
            .await?;
        tracing::info!(drug = %drug_name, records = records.len(), "Fetched adverse events");

        serde_json::to_string_pretty(&records).map_err(|e| ToolError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Tool for AdverseEventsTool {
    fn name(&self) -> &str {
        FDA_TOOL_NAME
    }

    fn description(&self) -> String {
        "Get adverse events data for a specific drug from the FDA database. Returns a JSON array of the most recent safety reports with report date, report id, matching drug names, reactions and outcomes.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["drug_name"],
            "properties": {
                "drug_name": {
                    "type": "string",
                    "description": "The name of the drug to search for (e.g., \"TRAMADOL\")"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default: 10)"
                }
            }
        })
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> ToolOutput {
        match self.lookup(input).await {
            Ok(output) => ToolOutput::success(output),
            Err(e) => ToolOutput::error(format!("Error retrieving FDA data: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx() -> ToolContext {
        ToolContext::new(CancellationToken::new(), "test-turn")
    }

    fn tramadol_reports() -> Value {
        json!({
            "results": [
                {
                    "receivedate": "20240315",
                    "safetyreportid": "10001",
                    "patient": {
                        "drug": [
                            {"medicinalproduct": "TRAMADOL HYDROCHLORIDE"},
                            {"medicinalproduct": "ASPIRIN"}
                        ],
                        "reaction": [
                            {"reactionmeddrapt": "Nausea", "reactionoutcome": "1"},
                            {"reactionmeddrapt": "Dizziness"}
                        ]
                    }
                },
                {
                    "safetyreportid": 10002
                }
            ]
        })
    }

    #[test]
    fn test_record_extraction() {
        let report = &tramadol_reports()["results"][0];
        let record = AdverseEventRecord::from_report(report, "tramadol");

        assert_eq!(record.report_date, "2024-03-15");
        assert_eq!(record.report_id, "10001");
        assert_eq!(record.drug_names, vec!["TRAMADOL HYDROCHLORIDE"]);
        assert_eq!(record.reactions, vec!["Nausea", "Dizziness"]);
        assert_eq!(record.outcomes, vec!["1", "N/A"]);
    }

    #[test]
    fn test_malformed_record_degrades() {
        let record = AdverseEventRecord::from_report(&json!({"patient": "garbage"}), "TRAMADOL");
        assert_eq!(record.report_date, "N/A");
        assert_eq!(record.report_id, "N/A");
        assert!(record.drug_names.is_empty());
        assert!(record.reactions.is_empty());
    }

    #[test]
    fn test_unparseable_date_kept() {
        assert_eq!(normalize_date("2024-03"), "2024-03");
        assert_eq!(normalize_date("N/A"), "N/A");
    }

    #[tokio::test]
    async fn test_lookup_query_and_output() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drug/event.json"))
            .and(query_param("search", "patient.drug.medicinalproduct:TRAMADOL"))
            .and(query_param("limit", "2"))
            .and(query_param("sort", "receivedate:desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tramadol_reports()))
            .expect(1)
            .mount(&server)
            .await;

        let tool = AdverseEventsTool::new(OpenFdaClient::new(&server.uri()).unwrap());
        let output = tool
            .run(json!({"drug_name": "TRAMADOL", "limit": 2}), ctx())
            .await;

        assert!(output.success, "{}", output.output);
        let records: Value = serde_json::from_str(&output.output).unwrap();
        assert_eq!(records.as_array().unwrap().len(), 2);
        assert_eq!(records[0]["report_id"], "10001");
        assert_eq!(records[1]["report_id"], "10002");
        assert_eq!(records[1]["report_date"], "N/A");
    }

    #[tokio::test]
    async fn test_not_found_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drug/event.json"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": "NOT_FOUND", "message": "No matches found!"}
            })))
            .mount(&server)
            .await;

        let tool = AdverseEventsTool::new(OpenFdaClient::new(&server.uri()).unwrap());
        let output = tool.run(json!({"drug_name": "NOSUCHDRUG"}), ctx()).await;

        assert!(output.success);
        assert_eq!(output.output, "[]");
    }

    #[tokio::test]
    async fn test_server_error_is_error_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let tool = AdverseEventsTool::new(OpenFdaClient::new(&server.uri()).unwrap());
        let output = tool.run(json!({"drug_name": "TRAMADOL"}), ctx()).await;

        assert!(!output.success);
        assert!(output.output.starts_with("Error retrieving FDA data"));
        assert!(output.output.contains("500"));
    }

    #[tokio::test]
    async fn test_missing_drug_name_is_error_text() {
        let tool = AdverseEventsTool::new(OpenFdaClient::new("http://127.0.0.1:1").unwrap());
        let output = tool.run(json!({"limit": 3}), ctx()).await;
        assert!(!output.success);
        assert!(output.output.contains("Invalid input"));
    }
}
