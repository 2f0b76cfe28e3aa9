//! Wikibase client over the MediaWiki action API.
//!
//! Entity JSON is decoded into the typed model of [`super::model`] right here;
//! nothing past this module sees raw datavalues. Writes are authenticated with
//! an OAuth bearer token, carry a CSRF token fetched once per client, and are
//! flagged as bot edits.

use super::model::{Claim, ClaimId, ClaimValue, Item, ItemId, Property, Snak};
use super::rank::Rank;
use super::{EditGroup, KnowledgeBase};
use crate::BoxFuture;
use crate::error::{Result, SyncError};
use chrono::NaiveDate;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const WIKIDATA_API_URL: &str = "https://www.wikidata.org/w/api.php";

/// Proleptic Gregorian calendar.
const GREGORIAN_CALENDAR: &str = "http://www.wikidata.org/entity/Q1985727";

/// Day precision for time values.
const PRECISION_DAY: u8 = 11;

/// Replication lag (seconds) above which the API should refuse our writes.
const MAX_LAG: u64 = 5;

const MAX_ATTEMPTS: u32 = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct WikibaseClient {
    http: Client,
    api_url: String,
    token: Option<String>,
    csrf: Mutex<Option<String>>,
}

impl WikibaseClient {
    /// Creates a client for the `api.php` endpoint at `api_url`.
    ///
    /// ## Errors
    ///
    /// Returns `SyncError::Http` if the HTTP client cannot be built.
    pub fn new(api_url: impl Into<String>, user_agent: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            token: None,
            csrf: Mutex::new(None),
        })
    }

    /// OAuth 2 access token sent as a bearer token.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    async fn call<T: DeserializeOwned>(&self, method: Method, params: &[(&str, String)]) -> Result<T> {
        let mut request = if method == Method::GET {
            self.http.get(&self.api_url).query(params)
        } else {
            self.http.post(&self.api_url).form(params)
        };
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SyncError::UnexpectedStatus {
                status: status.as_u16(),
                url: self.api_url.clone(),
                body: body.chars().take(200).collect(),
            });
        }

        let envelope: ErrorEnvelope = serde_json::from_str(&body)?;
        if let Some(error) = envelope.error {
            return Err(error.into());
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn csrf_token(&self) -> Result<String> {
        let mut cached = self.csrf.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let response: TokenResponse = self
            .call(
                Method::GET,
                &[
                    ("action", "query".to_string()),
                    ("meta", "tokens".to_string()),
                    ("type", "csrf".to_string()),
                    ("format", "json".to_string()),
                ],
            )
            .await?;
        let token = response.query.tokens.csrftoken;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// POSTs a write action, refreshing a stale CSRF token and waiting out
    /// replication lag.
    async fn edit<T: DeserializeOwned>(
        &self,
        action: &str,
        mut params: Vec<(&'static str, String)>,
        edit: &EditGroup,
    ) -> Result<T> {
        params.extend([
            ("action", action.to_string()),
            ("summary", edit.summary()),
            ("bot", "1".to_string()),
            ("maxlag", MAX_LAG.to_string()),
            ("format", "json".to_string()),
        ]);

        let mut attempt = 1;
        loop {
            let mut signed = params.clone();
            signed.push(("token", self.csrf_token().await?));

            match self.call(Method::POST, &signed).await {
                Err(e) if api_code(&e) == Some("badtoken") && attempt < MAX_ATTEMPTS => {
                    debug!(action, "CSRF token expired, fetching a new one");
                    *self.csrf.lock().await = None;
                }
                Err(e) if api_code(&e) == Some("maxlag") && attempt < MAX_ATTEMPTS => {
                    warn!(action, attempt, "Replication lag too high, waiting");
                    tokio::time::sleep(Duration::from_secs(MAX_LAG)).await;
                }
                result => return result,
            }
            attempt += 1;
        }
    }
}

fn api_code(error: &SyncError) -> Option<&str> {
    match error {
        SyncError::KnowledgeBase { code, .. } => Some(code),
        _ => None,
    }
}

impl KnowledgeBase for WikibaseClient {
    fn get_item<'a>(&'a self, id: &'a ItemId) -> BoxFuture<'a, Result<Item>> {
        Box::pin(async move {
            let response: EntitiesResponse = self
                .call(
                    Method::GET,
                    &[
                        ("action", "wbgetentities".to_string()),
                        ("ids", id.to_string()),
                        ("props", "info|claims".to_string()),
                        ("format", "json".to_string()),
                    ],
                )
                .await?;
            let entity = response
                .entities
                .into_iter()
                .find_map(|(key, entity)| (key == id.as_str()).then_some(entity))
                .filter(|entity| entity.missing.is_none())
                .ok_or_else(|| SyncError::NotFound(format!("item {}", id)))?;
            Ok(entity.into_item(id))
        })
    }

    fn create_claim<'a>(
        &'a self,
        item: &'a ItemId,
        property: Property,
        value: &'a ClaimValue,
        edit: &'a EditGroup,
    ) -> BoxFuture<'a, Result<ClaimId>> {
        Box::pin(async move {
            let (_, encoded) = encode_value(value)?;
            let response: ClaimResponse = self
                .edit(
                    "wbcreateclaim",
                    vec![
                        ("entity", item.to_string()),
                        ("property", property.id().to_string()),
                        ("snaktype", "value".to_string()),
                        ("value", encoded.to_string()),
                    ],
                    edit,
                )
                .await?;
            Ok(ClaimId::new(response.claim.id))
        })
    }

    fn add_qualifier<'a>(
        &'a self,
        claim: &'a ClaimId,
        property: Property,
        value: &'a ClaimValue,
        edit: &'a EditGroup,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let (_, encoded) = encode_value(value)?;
            let _: Value = self
                .edit(
                    "wbsetqualifier",
                    vec![
                        ("claim", claim.to_string()),
                        ("property", property.id().to_string()),
                        ("snaktype", "value".to_string()),
                        ("value", encoded.to_string()),
                    ],
                    edit,
                )
                .await?;
            Ok(())
        })
    }

    fn add_sources<'a>(
        &'a self,
        claim: &'a ClaimId,
        sources: &'a [Snak],
        edit: &'a EditGroup,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut snaks: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
            let mut order: Vec<&str> = Vec::new();
            for source in sources {
                let (kind, encoded) = encode_value(&source.value)?;
                if !order.contains(&source.property.as_str()) {
                    order.push(&source.property);
                }
                snaks.entry(&source.property).or_default().push(json!({
                    "snaktype": "value",
                    "property": source.property,
                    "datavalue": { "type": kind, "value": encoded },
                }));
            }

            let _: Value = self
                .edit(
                    "wbsetreference",
                    vec![
                        ("statement", claim.to_string()),
                        ("snaks", serde_json::to_string(&snaks)?),
                        ("snaks-order", serde_json::to_string(&order)?),
                    ],
                    edit,
                )
                .await?;
            Ok(())
        })
    }

    fn set_rank<'a>(
        &'a self,
        claim: &'a ClaimId,
        rank: Rank,
        base_revision: Option<u64>,
        edit: &'a EditGroup,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            // wbsetclaim replaces the whole statement, so start from the live one.
            let response: ClaimsResponse = self
                .call(
                    Method::GET,
                    &[
                        ("action", "wbgetclaims".to_string()),
                        ("claim", claim.to_string()),
                        ("format", "json".to_string()),
                    ],
                )
                .await?;
            let mut statement = response
                .claims
                .into_values()
                .flatten()
                .find(Value::is_object)
                .ok_or_else(|| SyncError::NotFound(format!("claim {}", claim)))?;
            if let Some(fields) = statement.as_object_mut() {
                fields.insert("rank".to_string(), Value::String(rank.as_str().to_string()));
            }

            let mut params = vec![("claim", statement.to_string())];
            if let Some(revision) = base_revision {
                params.push(("baserevid", revision.to_string()));
            }
            let _: Value = self.edit("wbsetclaim", params, edit).await?;
            Ok(())
        })
    }
}

/// Splits a value into its datavalue type and JSON payload.
fn encode_value(value: &ClaimValue) -> Result<(&'static str, Value)> {
    Ok(match value {
        ClaimValue::String(s) | ClaimValue::Url(s) => ("string", json!(s)),
        ClaimValue::Item(id) => {
            let numeric: u64 = id.as_str()[1..]
                .parse()
                .map_err(|_| SyncError::UnsupportedValue(id.to_string()))?;
            (
                "wikibase-entityid",
                json!({ "entity-type": "item", "numeric-id": numeric, "id": id.as_str() }),
            )
        }
        ClaimValue::Date(date) => (
            "time",
            json!({
                "time": format!("+{}T00:00:00Z", date.format("%Y-%m-%d")),
                "timezone": 0,
                "before": 0,
                "after": 0,
                "precision": PRECISION_DAY,
                "calendarmodel": GREGORIAN_CALENDAR,
            }),
        ),
        ClaimValue::MonolingualText { text, language } => (
            "monolingualtext",
            json!({ "text": text, "language": language }),
        ),
        ClaimValue::Unsupported(kind) => return Err(SyncError::UnsupportedValue(kind.clone())),
    })
}

/// Parses a Wikibase time string (`+2023-03-01T00:00:00Z`). Coarser
/// precisions zero the month or day; those become the first of the period.
fn parse_time(raw: &str) -> Option<NaiveDate> {
    let date = raw.strip_prefix('+')?.split('T').next()?;
    let mut parts = date.splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month.max(1), day.max(1))
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    info: String,
    #[serde(default)]
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    name: String,
}

impl From<ApiError> for SyncError {
    fn from(error: ApiError) -> Self {
        SyncError::KnowledgeBase {
            code: error.code,
            info: error.info,
            messages: error.messages.into_iter().map(|m| m.name).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    query: TokenQuery,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    tokens: Tokens,
}

#[derive(Debug, Deserialize)]
struct Tokens {
    csrftoken: String,
}

#[derive(Debug, Deserialize)]
struct ClaimResponse {
    claim: CreatedClaim,
}

#[derive(Debug, Deserialize)]
struct CreatedClaim {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ClaimsResponse {
    #[serde(default)]
    claims: BTreeMap<String, Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct EntitiesResponse {
    entities: BTreeMap<String, RawEntity>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    missing: Option<String>,
    lastrevid: Option<u64>,
    #[serde(default)]
    claims: BTreeMap<String, Vec<RawStatement>>,
}

impl RawEntity {
    fn into_item(self, id: &ItemId) -> Item {
        let mut item = Item::new(id);
        item.revision = self.lastrevid;
        for (property, statements) in self.claims {
            let claims = statements
                .into_iter()
                .map(|statement| statement.into_claim(&property))
                .collect();
            item.claims.insert(property, claims);
        }
        item
    }
}

#[derive(Debug, Deserialize)]
struct RawStatement {
    id: String,
    mainsnak: RawSnak,
    rank: String,
    #[serde(default)]
    qualifiers: BTreeMap<String, Vec<RawSnak>>,
    #[serde(default)]
    references: Vec<RawReference>,
}

impl RawStatement {
    fn into_claim(self, property: &str) -> Claim {
        Claim {
            id: ClaimId::new(self.id),
            property: property.to_string(),
            rank: Rank::parse(&self.rank).unwrap_or(Rank::Normal),
            value: self.mainsnak.into_snak().value,
            qualifiers: self
                .qualifiers
                .into_values()
                .flatten()
                .map(RawSnak::into_snak)
                .collect(),
            references: self
                .references
                .into_iter()
                .map(|reference| {
                    reference
                        .snaks
                        .into_values()
                        .flatten()
                        .map(RawSnak::into_snak)
                        .collect()
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawReference {
    #[serde(default)]
    snaks: BTreeMap<String, Vec<RawSnak>>,
}

#[derive(Debug, Deserialize)]
struct RawSnak {
    snaktype: String,
    property: String,
    datatype: Option<String>,
    datavalue: Option<RawDataValue>,
}

#[derive(Debug, Deserialize)]
struct RawDataValue {
    #[serde(rename = "type")]
    kind: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
struct MonolingualValue {
    text: String,
    language: String,
}

impl RawSnak {
    fn into_snak(self) -> Snak {
        let value = match (self.snaktype.as_str(), self.datavalue) {
            ("value", Some(datavalue)) => decode_value(datavalue, self.datatype.as_deref()),
            (snaktype, _) => ClaimValue::Unsupported(snaktype.to_string()),
        };
        Snak {
            property: self.property,
            value,
        }
    }
}

fn decode_value(datavalue: RawDataValue, datatype: Option<&str>) -> ClaimValue {
    let decoded = match datavalue.kind.as_str() {
        "string" => datavalue.value.as_str().map(|s| {
            if datatype == Some("url") {
                ClaimValue::Url(s.to_string())
            } else {
                ClaimValue::String(s.to_string())
            }
        }),
        "wikibase-entityid" => datavalue
            .value
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| ItemId::parse(id).ok())
            .map(ClaimValue::Item),
        "time" => datavalue
            .value
            .get("time")
            .and_then(Value::as_str)
            .and_then(parse_time)
            .map(ClaimValue::Date),
        "monolingualtext" => serde_json::from_value::<MonolingualValue>(datavalue.value.clone())
            .ok()
            .map(|m| ClaimValue::MonolingualText {
                text: m.text,
                language: m.language,
            }),
        _ => None,
    };
    decoded.unwrap_or(ClaimValue::Unsupported(datavalue.kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn q(id: &str) -> ItemId {
        ItemId::parse(id).unwrap()
    }

    async fn client(server: &MockServer) -> WikibaseClient {
        WikibaseClient::new(format!("{}/w/api.php", server.uri()), "relsync-test")
            .unwrap()
            .with_token(Some("secret".to_string()))
    }

    async fn mount_token(server: &MockServer, expected: u64) {
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("action", "query"))
            .and(query_param("meta", "tokens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "batchcomplete": "",
                "query": { "tokens": { "csrftoken": "abc+\\" } }
            })))
            .expect(expected)
            .mount(server)
            .await;
    }

    fn entity_json() -> Value {
        json!({
            "entities": {
                "Q1": {
                    "type": "item",
                    "id": "Q1",
                    "lastrevid": 2045113519u64,
                    "claims": {
                        "P348": [{
                            "id": "Q1$AAA",
                            "type": "statement",
                            "rank": "preferred",
                            "mainsnak": {
                                "snaktype": "value",
                                "property": "P348",
                                "datatype": "string",
                                "datavalue": { "type": "string", "value": "2.0" }
                            },
                            "qualifiers": {
                                "P548": [{
                                    "snaktype": "value",
                                    "property": "P548",
                                    "datatype": "wikibase-item",
                                    "datavalue": {
                                        "type": "wikibase-entityid",
                                        "value": { "entity-type": "item", "numeric-id": 15726348, "id": "Q15726348" }
                                    }
                                }],
                                "P577": [{
                                    "snaktype": "value",
                                    "property": "P577",
                                    "datatype": "time",
                                    "datavalue": {
                                        "type": "time",
                                        "value": {
                                            "time": "+2023-03-01T00:00:00Z",
                                            "timezone": 0, "before": 0, "after": 0, "precision": 11,
                                            "calendarmodel": GREGORIAN_CALENDAR
                                        }
                                    }
                                }]
                            },
                            "references": [{
                                "hash": "deadbeef",
                                "snaks": {
                                    "P854": [{
                                        "snaktype": "value",
                                        "property": "P854",
                                        "datatype": "url",
                                        "datavalue": { "type": "string", "value": "https://github.com/o/p/releases/tag/v2.0" }
                                    }],
                                    "P1476": [{
                                        "snaktype": "value",
                                        "property": "P1476",
                                        "datatype": "monolingualtext",
                                        "datavalue": { "type": "monolingualtext", "value": { "text": "Release 2.0", "language": "en" } }
                                    }]
                                },
                                "snaks-order": ["P854", "P1476"]
                            }]
                        }, {
                            "id": "Q1$BBB",
                            "type": "statement",
                            "rank": "normal",
                            "mainsnak": { "snaktype": "somevalue", "property": "P348", "datatype": "string" }
                        }]
                    }
                }
            }
        })
    }

    #[tokio::test]
    async fn test_get_item_decodes_claims() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("action", "wbgetentities"))
            .and(query_param("ids", "Q1"))
            .and(query_param("props", "info|claims"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(entity_json()))
            .mount(&server)
            .await;

        let item = client(&server).await.get_item(&q("Q1")).await.unwrap();
        assert_eq!(item.revision, Some(2045113519));
        let claims = item.claims_for(Property::SoftwareVersion);
        assert_eq!(claims.len(), 2);

        let latest = &claims[0];
        assert_eq!(latest.id.as_str(), "Q1$AAA");
        assert_eq!(latest.rank, Rank::Preferred);
        assert_eq!(latest.value, ClaimValue::string("2.0"));
        assert!(latest.has_item_qualifier(Property::VersionType, &[q("Q15726348")]));
        assert!(latest.qualifiers.contains(&Snak::new(
            Property::PublicationDate,
            ClaimValue::Date(NaiveDate::from_ymd_opt(2023, 3, 1).unwrap())
        )));
        assert_eq!(latest.references.len(), 1);
        assert!(latest.references[0].contains(&Snak::new(
            Property::ReferenceUrl,
            ClaimValue::Url("https://github.com/o/p/releases/tag/v2.0".to_string())
        )));
        assert!(latest.references[0].contains(&Snak::new(
            Property::Title,
            ClaimValue::MonolingualText {
                text: "Release 2.0".to_string(),
                language: "en".to_string()
            }
        )));

        assert_eq!(claims[1].value, ClaimValue::Unsupported("somevalue".to_string()));
    }

    #[tokio::test]
    async fn test_missing_item_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("action", "wbgetentities"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entities": { "Q9": { "id": "Q9", "missing": "" } }
            })))
            .mount(&server)
            .await;

        let err = client(&server).await.get_item(&q("Q9")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_claim_posts_signed_bot_edit() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/w/api.php"))
            .and(body_string_contains("action=wbcreateclaim"))
            .and(body_string_contains("entity=Q1"))
            .and(body_string_contains("property=P348"))
            .and(body_string_contains("bot=1"))
            .and(body_string_contains("editgroups%2Fb%2FCB%2Fabc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": 1,
                "claim": { "id": "Q1$NEW", "rank": "normal" }
            })))
            .expect(2)
            .mount(&server)
            .await;

        let kb = client(&server).await;
        let edit = EditGroup::new("abc123");
        let id = kb
            .create_claim(&q("Q1"), Property::SoftwareVersion, &ClaimValue::string("1.0"), &edit)
            .await
            .unwrap();
        assert_eq!(id.as_str(), "Q1$NEW");

        // The CSRF token is cached across edits.
        kb.create_claim(&q("Q1"), Property::SoftwareVersion, &ClaimValue::string("1.1"), &edit)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_bad_token_is_refreshed() {
        let server = MockServer::start().await;
        mount_token(&server, 2).await;
        Mock::given(method("POST"))
            .and(body_string_contains("action=wbsetqualifier"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": { "code": "badtoken", "info": "Invalid CSRF token." }
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("action=wbsetqualifier"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        let kb = client(&server).await;
        kb.add_qualifier(
            &ClaimId::new("Q1$AAA"),
            Property::VersionType,
            &ClaimValue::Item(q("Q2804309")),
            &EditGroup::new("abc"),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_set_rank_conflict_is_reported() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(query_param("action", "wbgetclaims"))
            .and(query_param("claim", "Q1$AAA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "claims": { "P348": [{ "id": "Q1$AAA", "rank": "preferred", "type": "statement" }] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("action=wbsetclaim"))
            .and(body_string_contains("%22rank%22%3A%22normal%22"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {
                    "code": "failed-save",
                    "info": "The save has failed.",
                    "messages": [
                        { "name": "wikibase-api-failed-save", "parameters": [] },
                        { "name": "edit-conflict", "parameters": [] }
                    ]
                }
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .set_rank(&ClaimId::new("Q1$AAA"), Rank::Normal, Some(41), &EditGroup::new("abc"))
            .await
            .unwrap_err();
        assert!(err.is_edit_conflict());
    }

    #[tokio::test]
    async fn test_set_rank_sends_base_revision() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(query_param("action", "wbgetclaims"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "claims": { "P348": [{ "id": "Q1$AAA", "rank": "normal", "type": "statement" }] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("action=wbsetclaim"))
            .and(body_string_contains("baserevid=2045113519"))
            .and(body_string_contains("%22rank%22%3A%22preferred%22"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .await
            .set_rank(
                &ClaimId::new("Q1$AAA"),
                Rank::Preferred,
                Some(2045113519),
                &EditGroup::new("abc"),
            )
            .await
            .unwrap();
    }

    #[test]
    fn test_encode_values() {
        let (kind, value) = encode_value(&ClaimValue::Item(q("Q2804309"))).unwrap();
        assert_eq!(kind, "wikibase-entityid");
        assert_eq!(value["numeric-id"], 2804309);

        let (kind, value) =
            encode_value(&ClaimValue::Date(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())).unwrap();
        assert_eq!(kind, "time");
        assert_eq!(value["time"], "+2024-01-05T00:00:00Z");
        assert_eq!(value["precision"], 11);

        assert!(encode_value(&ClaimValue::Unsupported("globecoordinate".to_string())).is_err());
    }

    #[test]
    fn test_parse_time_precisions() {
        assert_eq!(parse_time("+2023-03-01T00:00:00Z"), NaiveDate::from_ymd_opt(2023, 3, 1));
        assert_eq!(parse_time("+2023-00-00T00:00:00Z"), NaiveDate::from_ymd_opt(2023, 1, 1));
        assert_eq!(parse_time("-0044-03-15T00:00:00Z"), None);
    }
}
