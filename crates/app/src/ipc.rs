//! Bridge between the UI process and the IPC handlers.
//!
//! The renderer posts `{ "method": "<channel>", "params": { ... } }` to
//! `/ipc`. Known channels always answer `200` with the `{status, message,
//! data}` envelope, failures included; only requests that cannot be routed
//! get a problem document.

use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use farmhand_core::types::RequestContext;
use farmhand_core::IpcReply;
use farmhand_util::AuditDefaults;

use crate::problem::ProblemResponse;
use crate::router::AppState;

/// Body of an IPC call.
#[derive(Debug, Deserialize)]
pub struct IpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Channels served by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    CreateWorker,
    GetWorker,
    DeleteWorker,
    BulkDeleteWorkers,
    DashboardSummary,
}

impl Channel {
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "worker:create" => Some(Self::CreateWorker),
            "worker:getById" => Some(Self::GetWorker),
            "worker:delete" => Some(Self::DeleteWorker),
            "worker:bulkDelete" => Some(Self::BulkDeleteWorkers),
            "dashboard:getSummary" => Some(Self::DashboardSummary),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateWorker => "worker:create",
            Self::GetWorker => "worker:getById",
            Self::DeleteWorker => "worker:delete",
            Self::BulkDeleteWorkers => "worker:bulkDelete",
            Self::DashboardSummary => "dashboard:getSummary",
        }
    }
}

pub async fn handle(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<IpcRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let problem = ProblemResponse::from(rejection);
            warn!(stage = "ipc", status = %problem.status(), "rejected malformed IPC request");
            return problem.into_response();
        }
    };

    let Some(channel) = Channel::parse(&request.method) else {
        counter!("ipc_requests_total", "method" => "unknown", "status" => "unknown_method")
            .increment(1);
        warn!(stage = "ipc", method = %request.method, "unknown IPC method");
        return ProblemResponse::unknown_method(&request.method).into_response();
    };

    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    let context = request_context(state.audit_defaults(), peer, &headers);
    debug!(stage = "ipc", method = channel.as_str(), ip = %context.ip_address, "dispatching IPC call");

    match channel {
        Channel::CreateWorker => match parse_params(request.params) {
            Ok(params) => {
                let reply = state.workers().create_worker(&params, &context, None).await;
                respond(channel, reply)
            }
            Err(reply) => respond(channel, reply),
        },
        Channel::GetWorker => match parse_params(request.params) {
            Ok(params) => respond(channel, state.workers().get_worker(&params).await),
            Err(reply) => respond(channel, reply),
        },
        Channel::DeleteWorker => match parse_params(request.params) {
            Ok(params) => {
                let reply = state.workers().delete_worker(&params, &context, None).await;
                respond(channel, reply)
            }
            Err(reply) => respond(channel, reply),
        },
        Channel::BulkDeleteWorkers => match parse_params(request.params) {
            Ok(params) => respond(channel, state.workers().bulk_delete(&params, &context).await),
            Err(reply) => respond(channel, reply),
        },
        Channel::DashboardSummary => respond(channel, state.dashboard().summary().await),
    }
}

/// Decodes channel parameters; a missing `params` is treated as `{}`.
fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, IpcReply<Value>> {
    let params = match params {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(params)
        .map_err(|err| IpcReply::validation(format!("Invalid parameters: {err}")))
}

fn respond<T: Serialize>(channel: Channel, reply: IpcReply<T>) -> Response {
    counter!(
        "ipc_requests_total",
        "method" => channel.as_str(),
        "status" => reply.status_label()
    )
    .increment(1);
    Json(reply).into_response()
}

/// Resolves where a call came from, falling back to configured defaults.
pub fn request_context(
    defaults: &AuditDefaults,
    peer: Option<SocketAddr>,
    headers: &HeaderMap,
) -> RequestContext {
    let ip_address = peer
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| defaults.ip_address.clone());
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| defaults.user_agent.clone());

    RequestContext {
        ip_address,
        user_agent,
    }
}
