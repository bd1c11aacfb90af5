//! One request through one action: validate, describe the query, render.
//!
//! The host owns routing and persistence. It hands over a [`RawRequest`],
//! gets back a [`RequestOutcome`], applies it to its own [`Queryable`], then
//! asks the endpoint to render whatever rows it fetched.

use anyhow::{anyhow, bail};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::api::Api;
use crate::capability::Capability;
use crate::contract::{Action, ActionOn, CompiledContract, HttpMethod, ResponseBody};
use crate::error::ConfigResult;
use crate::ir::Param;
use crate::issue::{ErrorResponse, Issue, IssueCode, PathSegment};
use crate::capability::Operator;
use crate::query::{MemoryCollection, Predicate, Queryable};
use crate::render::Renderer;
use crate::validate::{ValidationResult, Validator};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRequest {
    pub path_params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub body: Option<Value>,
}

impl RawRequest {
    pub fn new() -> Self { Self::default() }

    /// Decode a bracket-notation query string.
    pub fn with_query_string(mut self, query: &str) -> Self {
        if let Value::Object(map) = crate::query_string::parse(query) {
            self.query = map;
        }
        self
    }

    pub fn with_query(mut self, query: Map<String, Value>) -> Self {
        self.query = query;
        self
    }

    pub fn with_path_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.path_params.insert(key.to_owned(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Validated, canonical-cased request sections plus every issue found.
///
/// `dropped` holds issues for clauses that were removed from the query
/// (unknown filter operators). They are reported but do not fail the request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub path: Value,
    pub query: Value,
    pub body: Option<Value>,
    pub issues: Vec<Issue>,
    pub dropped: Vec<Issue>,
}

impl RequestOutcome {
    pub fn is_valid(&self) -> bool { self.issues.is_empty() }

    /// Blocking issues first, then dropped clauses.
    pub fn all_issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().chain(&self.dropped)
    }

    fn capability_params(&self, key: Option<&str>) -> Option<&Value> {
        key.and_then(|k| self.query.get(k))
    }
}

/// What a host would send back.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Copy)]
pub struct Endpoint<'a> {
    api: &'a Api,
    contract: &'a CompiledContract,
    action: &'a Action,
}

impl<'a> Endpoint<'a> {
    pub(crate) fn new(api: &'a Api, contract: &'a CompiledContract, action: &'a Action) -> Self {
        Self { api, contract, action }
    }

    pub fn action(&self) -> &'a Action { self.action }
    pub fn contract(&self) -> &'a CompiledContract { self.contract }

    fn capabilities(&self) -> impl Iterator<Item = &'a dyn Capability> + 'a {
        let (method, on) = (self.action.method, self.action.on);
        self.contract.capabilities().iter().map(|c| c.as_ref()).filter(move |c| c.applies_to(method, on))
    }

    fn validator(&self) -> Validator<'a> {
        Validator::new(self.api.graph(), self.api.config().limits)
    }

    // ---- inbound ----

    pub fn validate(&self, request: RawRequest) -> ConfigResult<RequestOutcome> {
        let scope = self.contract.scope();
        let mut issues = Vec::new();

        // 1) wire casing → canonical
        let mut query = Value::Object(request.query);
        let mut body = request.body;
        for cap in self.capabilities() {
            query = cap.transform_inbound(query);
            body = body.map(|b| cap.transform_inbound(b));
        }

        // 2) capability slices are cleaned before shape validation
        if let Value::Object(map) = &mut query {
            for cap in self.capabilities() {
                let Some(key) = cap.query_key() else { continue };
                if let Some(raw) = map.get(key) {
                    let cleaned = cap.extract(raw, &[PathSegment::from(key)], &mut issues);
                    map.insert(key.to_owned(), cleaned);
                }
            }
        }

        // 3) shapes
        let validator = self.validator();
        let path = match &self.action.path_params {
            Some(param) => {
                let raw = Value::Object(request.path_params);
                let r = validator.validate(param, Some(&raw), scope)?;
                issues.extend(r.issues);
                r.params
            }
            None => json!({}),
        };
        let query = match &self.action.query {
            Some(param) => {
                let r = validator.validate(param, Some(&query), scope)?;
                issues.extend(r.issues);
                r.params
            }
            None => json!({}),
        };
        let body = match &self.action.body {
            Some(param) => {
                let r = validator.validate(param, body.as_ref(), scope)?;
                issues.extend(r.issues);
                Some(r.params)
            }
            None => None,
        };

        let (dropped, issues): (Vec<Issue>, Vec<Issue>) = issues.into_iter().partition(|i| i.code.drops_clause());
        debug!(action = %self.action.name, issues = issues.len(), dropped = dropped.len(), "request validated");
        Ok(RequestOutcome { path, query, body, issues, dropped })
    }

    /// Let every capability describe its clauses on `query`.
    pub fn apply(&self, outcome: &RequestOutcome, query: &mut dyn Queryable) -> anyhow::Result<()> {
        for cap in self.capabilities() {
            cap.apply(outcome.capability_params(cap.query_key()), query)?;
        }
        Ok(())
    }

    // ---- outbound ----

    fn outbound(&self, value: Value) -> Value {
        self.capabilities().fold(value, |v, cap| cap.transform_outbound(v))
    }

    fn response_param(&self) -> anyhow::Result<&'a Param> {
        match &self.action.response {
            ResponseBody::Body(param) => Ok(param),
            ResponseBody::NoContent => bail!("action `{}` answers with no content", self.action.name),
        }
    }

    fn schema_roots(&self) -> anyhow::Result<(&'a str, &'a str)> {
        let name = self
            .contract
            .schema_name()
            .ok_or_else(|| anyhow!("contract `{}` has no resource schema", self.contract.name()))?;
        let schema = self.api.schema(name).ok_or_else(|| anyhow!("unknown schema `{name}`"))?;
        Ok((schema.singular_root(), schema.plural_root()))
    }

    /// Project an already enveloped body through the response shape and case
    /// its keys for the wire.
    pub fn render(&self, body: &Value) -> anyhow::Result<Value> {
        let param = self.response_param()?;
        let renderer = Renderer::new(self.api.graph(), self.api.schemas());
        let projected = renderer.project(param, body, self.contract.scope())?;
        Ok(self.outbound(projected))
    }

    /// `{ <plural>: [...], pagination: {...} }` from fetched rows.
    pub fn render_collection(
        &self,
        outcome: &RequestOutcome,
        mut rows: Vec<Value>,
        query: &dyn Queryable,
    ) -> anyhow::Result<Value> {
        let (_, plural) = self.schema_roots()?;
        let mut blocks = Vec::new();
        for cap in self.capabilities() {
            if let Some(block) = cap.finalize(outcome.capability_params(cap.query_key()), query, &mut rows)? {
                blocks.push(block);
            }
        }
        let mut envelope = Map::new();
        envelope.insert(plural.to_owned(), Value::Array(rows));
        for (key, block) in blocks {
            envelope.insert(key.to_owned(), block);
        }
        let mut rendered = self.render(&Value::Object(envelope))?;
        if !outcome.dropped.is_empty() {
            let case = self.contract.key_case();
            if let Value::Object(map) = &mut rendered {
                let issues = serde_json::to_value(self.wire_issues(outcome.dropped.clone()))?;
                map.insert(case.to_wire("meta"), json!({ (case.to_wire("issues")): issues }));
            }
        }
        Ok(rendered)
    }

    /// `{ <singular>: {...} }` for one record.
    pub fn render_record(&self, record: &Value) -> anyhow::Result<Value> {
        let (singular, _) = self.schema_roots()?;
        self.render(&json!({ singular: record }))
    }

    /// Contract-layer error envelope with issue paths in wire casing.
    pub fn render_error(&self, issues: Vec<Issue>) -> Value {
        serde_json::to_value(ErrorResponse::contract(self.wire_issues(issues))).unwrap_or(Value::Null)
    }

    fn wire_issues(&self, issues: Vec<Issue>) -> Vec<Issue> {
        let case = self.contract.key_case();
        issues.into_iter().map(|issue| issue.map_keys(|k| case.to_wire(k))).collect()
    }

    /// Check a canonical response body against the declared response. A
    /// no-content action accepts only an absent body.
    pub fn validate_response(&self, body: Option<&Value>) -> ConfigResult<ValidationResult> {
        match &self.action.response {
            ResponseBody::NoContent => {
                let issues = match body {
                    None | Some(Value::Null) => Vec::new(),
                    Some(_) => vec![Issue::new(IssueCode::BodyNotAllowed, Vec::new(), "no content expected")],
                };
                Ok(ValidationResult { params: Value::Null, issues })
            }
            ResponseBody::Body(_) if body.is_none() => Ok(ValidationResult {
                params: Value::Null,
                issues: vec![Issue::new(IssueCode::Required, Vec::new(), "response body is required")],
            }),
            ResponseBody::Body(param) => self.validator().validate(param, body, self.contract.scope()),
        }
    }

    // ---- in-memory runner ----

    /// Serve a request against an in-memory collection. Writes are not
    /// persisted: the validated payload is echoed through the response shape.
    pub fn run(&self, request: RawRequest, records: &MemoryCollection) -> anyhow::Result<Response> {
        let outcome = self.validate(request)?;
        if !outcome.is_valid() {
            return Ok(Response { status: 422, body: Some(self.render_error(outcome.issues)) });
        }
        if self.action.response.is_no_content() {
            return Ok(Response { status: self.action.status, body: None });
        }
        let mut query = records.clone();
        self.apply(&outcome, &mut query)?;
        let body = match (self.action.method, self.action.on) {
            (HttpMethod::Get, ActionOn::Collection) if self.contract.schema_name().is_some() => {
                let rows = query.fetch();
                self.render_collection(&outcome, rows, &query)?
            }
            (HttpMethod::Get, ActionOn::Member) if self.contract.schema_name().is_some() => {
                let id = outcome.path.get("id").cloned().unwrap_or(Value::Null);
                let pk = self
                    .contract
                    .schema_name()
                    .and_then(|s| self.api.schema(s))
                    .map_or("id", |s| s.primary_key_name());
                query.filter(Predicate::compare(pk, Operator::Eq, id));
                match query.fetch().first() {
                    Some(record) => self.render_record(record)?,
                    None => {
                        let error = ErrorResponse::http(IssueCode::NotFound, "record not found");
                        return Ok(Response { status: 404, body: Some(serde_json::to_value(error)?) });
                    }
                }
            }
            _ => self.render(outcome.body.as_ref().unwrap_or(&Value::Null))?,
        };
        Ok(Response { status: self.action.status, body: Some(body) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiBuilder, ApiConfig};
    use crate::capability::KeyCase;
    use crate::contract::{ActionDecl, ContractDecl};
    use crate::schema::{Attribute, ResourceSchema};

    fn api(key_case: KeyCase) -> Api {
        let mut b = ApiBuilder::new(ApiConfig { key_case, ..Default::default() });
        b.schema(
            ResourceSchema::new("post")
                .attribute(Attribute::integer("id").sortable().filterable())
                .attribute(Attribute::string("title").writable().required().filterable().sortable())
                .attribute(Attribute::datetime("published_at").writable().nullable().filterable()),
        )
        .contract(
            ContractDecl::new("posts")
                .schema("post")
                .resources()
                .action(ActionDecl::new("archive").method(HttpMethod::Post).member()),
        );
        b.seal().unwrap()
    }

    fn records() -> MemoryCollection {
        MemoryCollection::new(
            (1..=45)
                .map(|i| json!({ "id": i, "title": format!("post {i}"), "published_at": null, "secret": "x" }))
                .collect(),
        )
    }

    #[test]
    fn index_paginates_and_projects() {
        let api = api(KeyCase::None);
        let ep = api.endpoint("posts", "index").unwrap();
        let res = ep.run(RawRequest::new().with_query_string("page[number]=3&page[size]=20"), &records()).unwrap();
        assert_eq!(res.status, 200);
        let body = res.body.unwrap();
        assert_eq!(body["posts"].as_array().unwrap().len(), 5);
        assert_eq!(body["pagination"], json!({ "current": 3, "next": null, "prev": 2, "total": 3, "items": 45 }));
        assert!(body["posts"][0].get("secret").is_none());
    }

    #[test]
    fn create_reports_every_issue_in_wire_casing() {
        let api = api(KeyCase::CamelizeLower);
        let ep = api.endpoint("posts", "create").unwrap();
        let res = ep
            .run(RawRequest::new().with_body(json!({ "post": { "publishedAt": "yesterday" } })), &records())
            .unwrap();
        assert_eq!(res.status, 422);
        let body = res.body.unwrap();
        assert_eq!(body["layer"], json!("contract"));
        let paths: Vec<_> = body["issues"].as_array().unwrap().iter().map(|i| i["path"].clone()).collect();
        assert_eq!(paths, vec![json!(["post", "title"]), json!(["post", "publishedAt"])]);
    }

    #[test]
    fn show_finds_by_path_id() {
        let api = api(KeyCase::CamelizeLower);
        let ep = api.endpoint("posts", "show").unwrap();
        let res = ep.run(RawRequest::new().with_path_param("id", "7"), &records()).unwrap();
        assert_eq!(res.body.unwrap(), json!({ "post": { "id": 7, "title": "post 7", "publishedAt": null } }));
        let missing = ep.run(RawRequest::new().with_path_param("id", 99), &records()).unwrap();
        assert_eq!(missing.status, 404);
    }

    #[test]
    fn filter_operator_issue_is_partial() {
        let api = api(KeyCase::None);
        let ep = api.endpoint("posts", "index").unwrap();
        let outcome = ep
            .validate(RawRequest::new().with_query_string("filter[title][bogus]=x&filter[published_at][null]=true"))
            .unwrap();
        assert!(outcome.is_valid());
        assert_eq!(outcome.dropped.len(), 1);
        assert_eq!(outcome.dropped[0].code, IssueCode::OperatorInvalid);
        assert!(outcome.query["filter"].get("title").is_none());
        assert_eq!(outcome.query["filter"]["published_at"], json!({ "null": true }));
    }

    #[test]
    fn dropped_clause_still_serves_the_valid_ones() {
        let api = api(KeyCase::CamelizeLower);
        let ep = api.endpoint("posts", "index").unwrap();
        let res = ep
            .run(RawRequest::new().with_query_string("filter[title][bogus]=x&filter[id][eq]=2"), &records())
            .unwrap();
        assert_eq!(res.status, 200);
        let body = res.body.unwrap();
        let ids: Vec<_> = body["posts"].as_array().unwrap().iter().map(|p| p["id"].clone()).collect();
        assert_eq!(ids, [json!(2)]);
        let issue = &body["meta"]["issues"][0];
        assert_eq!(issue["code"], json!("operator_invalid"));
        assert_eq!(issue["field"], json!("title"));
        assert_eq!(issue["path"], json!(["filter", "title"]));
    }

    #[test]
    fn no_content_response_validation() {
        let api = api(KeyCase::None);
        let destroy = api.endpoint("posts", "destroy").unwrap();
        assert!(destroy.validate_response(None).unwrap().is_valid());
        let r = destroy.validate_response(Some(&json!({}))).unwrap();
        assert_eq!(r.issues[0].code, IssueCode::BodyNotAllowed);

        let show = api.endpoint("posts", "show").unwrap();
        let r = show.validate_response(None).unwrap();
        assert_eq!(r.issues[0].code, IssueCode::Required);

        let archive = api.endpoint("posts", "archive").unwrap();
        let res = archive.run(RawRequest::new().with_path_param("id", 1), &records()).unwrap();
        assert_eq!(res, Response { status: 204, body: None });
    }
}
