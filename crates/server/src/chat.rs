use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Json, Router,
};
use brewline_agent::AgentRuntime;
use brewline_core::{ApplicationError, InterfaceError, Message};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct ChatState {
    runtime: Arc<AgentRuntime>,
}

impl ChatState {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub correlation_id: String,
}

pub fn router(state: ChatState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/stream", post(chat_stream))
        .with_state(state)
}

pub async fn chat(
    State(state): State<ChatState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Message>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let span = info_span!("chat", correlation_id = %correlation_id);

    async {
        info!(
            event_name = "http.chat.received",
            correlation_id = %correlation_id,
            message_count = request.messages.len(),
            "chat request received"
        );
        state
            .runtime
            .handle(&request.messages)
            .await
            .map(Json)
            .map_err(|error| ApiError::from_runtime(&error, &correlation_id))
    }
    .instrument(span)
    .await
}

/// Server-sent events, one JSON `StreamEvent` per `data:` line. A failure
/// mid-stream emits a single `error` event and ends the stream.
pub async fn chat_stream(
    State(state): State<ChatState>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let correlation_id = Uuid::new_v4().to_string();
    info!(
        event_name = "http.chat_stream.received",
        correlation_id = %correlation_id,
        message_count = request.messages.len(),
        "streaming chat request received"
    );

    let mut events = state.runtime.clone().handle_stream(request.messages);
    let body = async_stream::stream! {
        while let Some(next) = events.next().await {
            let encoded = next
                .map_err(|error| ApiError::from_runtime(&error, &correlation_id))
                .and_then(|event| {
                    Event::default().json_data(&event).map_err(|error| {
                        let message = format!("stream event did not encode: {error}");
                        ApiError::internal(message, &correlation_id)
                    })
                });

            match encoded {
                Ok(event) => {
                    yield Ok::<_, Infallible>(event);
                }
                Err(api_error) => {
                    yield Ok::<_, Infallible>(api_error.into_event());
                    break;
                }
            }
        }
    };

    Sse::new(body).keep_alive(KeepAlive::default())
}

/// HTTP rendering of an [`InterfaceError`].
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn from_runtime(error: &anyhow::Error, correlation_id: &str) -> Self {
        let interface = match error.downcast_ref::<ApplicationError>() {
            Some(application) => application.clone().into_interface(correlation_id),
            None => InterfaceError::Internal {
                message: format!("{error:#}"),
                correlation_id: correlation_id.to_string(),
            },
        };

        error!(
            event_name = "http.chat.failed",
            correlation_id = %correlation_id,
            error = %interface,
            "chat turn failed"
        );
        Self(interface)
    }

    fn internal(message: String, correlation_id: &str) -> Self {
        error!(
            event_name = "http.chat.failed",
            correlation_id = %correlation_id,
            error = %message,
            "chat turn failed"
        );
        Self(InterfaceError::Internal { message, correlation_id: correlation_id.to_string() })
    }

    fn status(&self) -> StatusCode {
        match self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.0.user_message(),
            correlation_id: self.0.correlation_id().to_string(),
        }
    }

    fn into_event(self) -> Event {
        let body = self.body();
        Event::default()
            .event("error")
            .json_data(&body)
            .unwrap_or_else(|_| Event::default().event("error").data(body.error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use brewline_agent::testing::ScriptedOracle;
    use brewline_agent::StaticRetriever;
    use brewline_core::{AffinityTable, PopularityTable, RecommendationEngine};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{router, ChatState};
    use crate::bootstrap::compose;

    fn app(oracle: Arc<ScriptedOracle>) -> axum::Router {
        let engine = RecommendationEngine::new(AffinityTable::default(), PopularityTable::default());
        let runtime = compose(Arc::new(engine), oracle, Arc::new(StaticRetriever::default()), 5)
            .expect("runtime should compose");
        router(ChatState::new(Arc::new(runtime)))
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build")
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body should read");
        String::from_utf8(bytes.to_vec()).expect("body should be utf-8")
    }

    fn allow_and_route(oracle: &ScriptedOracle, tag: &str) {
        oracle.push_decision(
            "guard_decision",
            json!({"chain_of_thought": "", "decision": "allowed", "message": ""}),
        );
        oracle.push_decision(
            "classification_decision",
            json!({"chain_of_thought": "", "decision": tag, "message": ""}),
        );
    }

    #[tokio::test]
    async fn chat_returns_agent_reply_with_memory() {
        let oracle = Arc::new(ScriptedOracle::new());
        allow_and_route(&oracle, "details_agent");
        oracle.push_completion("We open at 7am.");

        let response = app(oracle)
            .oneshot(post(
                "/chat",
                json!({"messages": [{"role": "user", "content": "when do you open?"}]}),
            ))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::OK);
        let payload: Value =
            serde_json::from_str(&body_text(response).await).expect("json payload");
        assert_eq!(
            payload,
            json!({
                "role": "assistant",
                "content": "We open at 7am.",
                "memory": {"agent": "details_agent"}
            })
        );
    }

    #[tokio::test]
    async fn empty_conversation_is_a_bad_request() {
        let oracle = Arc::new(ScriptedOracle::new());
        let response = app(oracle.clone())
            .oneshot(post("/chat", json!({"messages": []})))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload: Value =
            serde_json::from_str(&body_text(response).await).expect("json payload");
        assert!(payload["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(oracle.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_agent_tag_is_an_internal_error() {
        let oracle = Arc::new(ScriptedOracle::new());
        allow_and_route(&oracle, "barista_agent");

        let response = app(oracle)
            .oneshot(post("/chat", json!({"messages": [{"role": "user", "content": "hi"}]})))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn oracle_outage_is_service_unavailable() {
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push_decision_failure("guard_decision", "connection refused");

        let response = app(oracle)
            .oneshot(post("/chat", json!({"messages": [{"role": "user", "content": "hi"}]})))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let payload: Value =
            serde_json::from_str(&body_text(response).await).expect("json payload");
        assert_eq!(
            payload["error"],
            "The assistant is temporarily unavailable. Please retry shortly."
        );
    }

    #[tokio::test]
    async fn stream_emits_token_then_memory_events() {
        let oracle = Arc::new(ScriptedOracle::new());
        allow_and_route(&oracle, "recommendation_agent");
        oracle.push_decision(
            "recommendation_classification",
            json!({"chain_of_thought": "", "recommendation_type": "popular", "parameters": []}),
        );

        let response = app(oracle)
            .oneshot(post(
                "/chat/stream",
                json!({"messages": [{"role": "user", "content": "what's popular?"}]}),
            ))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        let events = text
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str::<Value>(data).expect("event json"))
            .collect::<Vec<_>>();

        assert_eq!(
            events,
            vec![
                json!({
                    "type": "token",
                    "content": "Sorry, I couldn't find any recommendations for you."
                }),
                json!({"type": "memory", "content": {"agent": "recommendation_agent"}}),
            ]
        );
    }

    #[tokio::test]
    async fn stream_failure_ends_with_error_event() {
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push_decision_failure("guard_decision", "connection refused");

        let response = app(oracle)
            .oneshot(post(
                "/chat/stream",
                json!({"messages": [{"role": "user", "content": "hi"}]}),
            ))
            .await
            .expect("request should complete");

        let text = body_text(response).await;
        assert!(text.contains("event: error"));
        assert!(text.contains("correlation_id"));
        assert!(!text.contains("\"type\""));
    }
}
