use super::{CompanionStore, StoreResult};
use crate::companion::{CompanionRecord, NewCompanion, SessionHistoryEntry, SessionRow};
use crate::error::StoreError;
use crate::query::{Predicate, RowRange};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;

const COMPANIONS: &str = "companions";
const SESSION_HISTORY: &str = "session_history";
// Inner join: history rows whose companion is gone are left out.
const SESSION_SELECT: &str = "*,companions!inner(*)";

pub struct PostgrestConfig {
    base_url: String,
    api_key: SecretString,
}

impl PostgrestConfig {
    /// `base_url` is the REST root, e.g. `https://<project>.supabase.co/rest/v1`.
    pub fn new(base_url: &str, api_key: SecretString) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }
}

/// A `CompanionStore` backed by a PostgREST endpoint (e.g. Supabase).
///
/// PostgREST has no conditional insert, so the capped insert uses the
/// count-then-insert default and the cap is advisory.
pub struct PostgrestStore {
    client: Client,
    config: PostgrestConfig,
}

#[derive(Serialize)]
struct CompanionInsert<'a> {
    #[serde(flatten)]
    input: &'a NewCompanion,
    author: &'a str,
}

#[derive(Serialize)]
struct SessionInsert<'a> {
    companion_id: &'a str,
    user_id: &'a str,
}

impl PostgrestStore {
    pub fn new(config: PostgrestConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn request(&self, method: reqwest::Method, table: &str) -> RequestBuilder {
        let key = self.config.api_key().expose_secret();
        self.client
            .request(method, format!("{}/{}", self.config.base_url(), table))
            .header("apikey", key)
            .bearer_auth(key)
    }

    async fn rows<T: DeserializeOwned>(request: RequestBuilder) -> StoreResult<Vec<T>> {
        let response = Self::check(request.send().await?).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn check(response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!("store request failed with {}: {}", status, body);
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Quotes a value for use inside a PostgREST logic tree, e.g. `or=(...)`.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// A substring pattern for `needle`. `%`, `_` and `\` are escaped for
/// LIKE. PostgREST reads every `*` as `%`, so a literal `*` becomes the
/// single-character wildcard `_`, the closest match it can express.
fn ilike_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('*');
    for c in needle.chars() {
        match c {
            '\\' | '%' | '_' => {
                pattern.push('\\');
                pattern.push(c);
            }
            '*' => pattern.push('_'),
            c => pattern.push(c),
        }
    }
    pattern.push('*');
    pattern
}

/// Renders a predicate as a condition inside a logic tree.
fn condition(predicate: &Predicate) -> Option<String> {
    match predicate {
        Predicate::MatchAll => None,
        Predicate::Contains { column, needle } => Some(format!(
            "{}.ilike.{}",
            column.as_str(),
            quote(&ilike_pattern(needle))
        )),
        Predicate::Or(parts) => group("or", parts),
        Predicate::And(parts) => group("and", parts),
    }
}

fn group(op: &str, parts: &[Predicate]) -> Option<String> {
    let inner: Vec<String> = parts.iter().filter_map(condition).collect();
    if inner.is_empty() {
        None
    } else {
        Some(format!("{}({})", op, inner.join(",")))
    }
}

/// Translates a predicate into PostgREST query parameters.
///
/// Top-level conjunctions become separate parameters, which PostgREST ANDs.
pub fn predicate_params(predicate: &Predicate) -> Vec<(String, String)> {
    match predicate {
        Predicate::MatchAll => vec![],
        Predicate::Contains { column, needle } => vec![(
            column.as_str().to_string(),
            format!("ilike.{}", ilike_pattern(needle)),
        )],
        Predicate::Or(parts) => {
            let inner: Vec<String> = parts.iter().filter_map(condition).collect();
            if inner.is_empty() {
                vec![]
            } else {
                vec![("or".to_string(), format!("({})", inner.join(",")))]
            }
        }
        Predicate::And(parts) => parts.iter().flat_map(predicate_params).collect(),
    }
}

pub fn session_params(user_id: Option<&str>, limit: usize) -> Vec<(String, String)> {
    let mut params = vec![
        ("select".to_string(), SESSION_SELECT.to_string()),
        ("order".to_string(), "created_at.desc".to_string()),
        ("limit".to_string(), limit.to_string()),
    ];
    if let Some(user_id) = user_id {
        params.push(("user_id".to_string(), format!("eq.{user_id}")));
    }
    params
}

pub fn range_params(range: RowRange) -> Vec<(String, String)> {
    vec![
        ("offset".to_string(), range.start.to_string()),
        ("limit".to_string(), range.count().to_string()),
    ]
}

/// Reads the total from a `Content-Range` header such as `0-9/42` or `*/0`.
pub fn parse_content_range_total(header: &str) -> StoreResult<usize> {
    header
        .rsplit_once('/')
        .and_then(|(_, total)| total.parse().ok())
        .ok_or_else(|| StoreError::InvalidResponse(format!("bad Content-Range: {header}")))
}

#[async_trait]
impl CompanionStore for PostgrestStore {
    async fn select_companions(
        &self,
        predicate: &Predicate,
        range: RowRange,
    ) -> StoreResult<Vec<CompanionRecord>> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(predicate_params(predicate));
        params.extend(range_params(range));
        tracing::debug!("selecting companions: {:?}", params);
        Self::rows(self.request(reqwest::Method::GET, COMPANIONS).query(&params)).await
    }

    async fn select_companion(&self, id: &str) -> StoreResult<Vec<CompanionRecord>> {
        let params = [("select", "*".to_string()), ("id", format!("eq.{id}"))];
        Self::rows(self.request(reqwest::Method::GET, COMPANIONS).query(&params)).await
    }

    async fn count_companions_by_author(&self, author: &str) -> StoreResult<usize> {
        let params = [("select", "id".to_string()), ("author", format!("eq.{author}"))];
        let response = self
            .request(reqwest::Method::HEAD, COMPANIONS)
            .query(&params)
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = Self::check(response).await?;
        let header = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StoreError::InvalidResponse("missing Content-Range".into()))?;
        parse_content_range_total(header)
    }

    async fn insert_companion(
        &self,
        input: NewCompanion,
        author: &str,
    ) -> StoreResult<Vec<CompanionRecord>> {
        let body = CompanionInsert {
            input: &input,
            author,
        };
        Self::rows(
            self.request(reqwest::Method::POST, COMPANIONS)
                .header("Prefer", "return=representation")
                .json(&body),
        )
        .await
    }

    async fn insert_session(
        &self,
        companion_id: &str,
        user_id: &str,
    ) -> StoreResult<Vec<SessionHistoryEntry>> {
        let body = SessionInsert {
            companion_id,
            user_id,
        };
        Self::rows(
            self.request(reqwest::Method::POST, SESSION_HISTORY)
                .header("Prefer", "return=representation")
                .json(&body),
        )
        .await
    }

    async fn select_sessions(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<SessionRow>> {
        let params = session_params(user_id, limit);
        Self::rows(self.request(reqwest::Method::GET, SESSION_HISTORY).query(&params)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{build_filter_query, paginate};

    fn p(key: &str, value: &str) -> (String, String) {
        (key.to_string(), value.to_string())
    }

    #[test]
    fn test_subject_only_params() {
        let params = predicate_params(&build_filter_query(Some("math"), None));
        assert_eq!(params, vec![p("subject", "ilike.*math*")]);
    }

    #[test]
    fn test_topic_only_params() {
        let params = predicate_params(&build_filter_query(None, Some("cells")));
        assert_eq!(
            params,
            vec![p("or", r#"(topic.ilike."*cells*",name.ilike."*cells*")"#)]
        );
    }

    #[test]
    fn test_subject_and_topic_params() {
        let params = predicate_params(&build_filter_query(Some("math"), Some("a,b")));
        assert_eq!(
            params,
            vec![
                p("subject", "ilike.*math*"),
                p("or", r#"(topic.ilike."*a,b*",name.ilike."*a,b*")"#),
            ]
        );
    }

    #[test]
    fn test_match_all_has_no_params() {
        assert!(predicate_params(&Predicate::MatchAll).is_empty());
    }

    #[test]
    fn test_quote_escapes_reserved_characters() {
        assert_eq!(quote(r#"say "hi""#), r#""say \"hi\"""#);
    }

    #[test]
    fn test_search_text_wildcards_are_escaped() {
        let params = predicate_params(&build_filter_query(Some("100%_sure"), None));
        assert_eq!(params, vec![p("subject", r"ilike.*100\%\_sure*")]);

        let params = predicate_params(&build_filter_query(None, Some(r"a*b\c")));
        assert_eq!(
            params,
            vec![p("or", r#"(topic.ilike."*a_b\\\\c*",name.ilike."*a_b\\\\c*")"#)]
        );
    }

    #[test]
    fn test_session_params_use_inner_join() {
        assert_eq!(
            session_params(Some("u1"), 2),
            vec![
                p("select", "*,companions!inner(*)"),
                p("order", "created_at.desc"),
                p("limit", "2"),
                p("user_id", "eq.u1"),
            ]
        );
        assert_eq!(session_params(None, 10).len(), 3);
    }

    #[test]
    fn test_range_params() {
        let params = range_params(paginate(Some(3), Some(5)));
        assert_eq!(params, vec![p("offset", "10"), p("limit", "5")]);
    }

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("0-9/42").unwrap(), 42);
        assert_eq!(parse_content_range_total("*/0").unwrap(), 0);
        assert!(parse_content_range_total("0-9/*").is_err());
    }

    #[test]
    fn test_companion_insert_body_carries_author() {
        let input = NewCompanion::new("Neura", "science", "Cells", "female", "casual");
        let body = serde_json::to_value(CompanionInsert {
            input: &input,
            author: "u1",
        })
        .unwrap();
        assert_eq!(body["author"], "u1");
        assert_eq!(body["name"], "Neura");
        assert_eq!(body["duration"], 15);
    }
}
