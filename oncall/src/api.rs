use crate::metrics_defs::REQUESTS;
use crate::resolver::{OnCallResolver, OnCallUser};
use crate::schedule::ScheduleId;
use http::HeaderMap;
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use serde::Serialize;
use shared::counter;
use shared::http::make_boxed_json_response;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::Instrument;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Body of every response. Callers tell the variants apart by the presence
/// of the `error` field; the status code is always 200.
#[derive(Serialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum ApiResponse {
    OnCall(OnCallUser),
    Error { error: String },
}

impl ApiResponse {
    fn error(err: impl ToString) -> Self {
        ApiResponse::Error {
            error: err.to_string(),
        }
    }

    /// JSON encoding followed by a newline.
    pub fn to_body(&self) -> Result<Bytes, serde_json::Error> {
        let mut body = serde_json::to_vec(self)?;
        body.push(b'\n');
        Ok(Bytes::from(body))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("response serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct Handler {
    resolver: OnCallResolver,
}

impl Handler {
    pub fn new(resolver: OnCallResolver) -> Self {
        Handler { resolver }
    }

    /// Validates the schedule parameter and resolves who is on call for it.
    /// Invalid input never reaches the resolver.
    pub async fn handle(&self, schedule_param: Option<&str>) -> ApiResponse {
        let schedule = match ScheduleId::parse(schedule_param.unwrap_or_default()) {
            Ok(schedule) => schedule,
            Err(e) => {
                tracing::error!("Received invalid schedule");
                counter!(REQUESTS, "outcome" => "invalid").increment(1);
                return ApiResponse::error(e);
            }
        };

        match self.resolver.whos_on_call(&schedule).await {
            Ok(user) => {
                counter!(REQUESTS, "outcome" => "ok").increment(1);
                ApiResponse::OnCall(user)
            }
            Err(e) => {
                counter!(REQUESTS, "outcome" => "error").increment(1);
                ApiResponse::error(e)
            }
        }
    }
}

/// HTTP front end for `Handler`. Serves every path; the schedule comes from
/// the `schedule` query parameter.
pub struct OnCallService {
    handler: Arc<Handler>,
}

impl OnCallService {
    pub fn new(handler: Arc<Handler>) -> Self {
        OnCallService { handler }
    }
}

impl Service<Request<Incoming>> for OnCallService {
    type Response = Response<BoxBody<Bytes, Self::Error>>;
    type Error = ServiceError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let handler = self.handler.clone();
        let schedule = schedule_param(req.uri().query());
        let span = tracing::info_span!(
            "request",
            request_id = %request_id(req.headers()),
            schedule = schedule.as_deref().unwrap_or_default(),
        );

        Box::pin(
            async move {
                let response = handler.handle(schedule.as_deref()).await;
                let body = response.to_body().inspect_err(|e| {
                    tracing::error!(error = %e, "Unable to serialize response");
                })?;
                Ok(make_boxed_json_response(body))
            }
            .instrument(span),
        )
    }
}

fn schedule_param(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "schedule")
        .map(|(_, value)| value.into_owned())
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|id| format!("Req{id}"))
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
