//! Mock implementations for testing
//!
//! These mocks enable runtime testing without real I/O.

use super::{start, ChatHandle};
use crate::api::{ApiError, ByteStream, CompanionApi};
use crate::protocol::{ActiveConversation, ClearResponse, SendRequest};
use crate::store::{ChatContext, ChatState, ViewUpdate};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Mock Companion API
// ============================================================================

/// How a queued send exchange behaves
pub enum StreamScript {
    /// Deliver these fragments, then close
    Fragments(Vec<Result<Vec<u8>, ApiError>>),
    /// Fail to open
    Fail(ApiError),
    /// Deliver whatever the test pushes, until the sender is dropped
    Channel(mpsc::Receiver<Result<Vec<u8>, ApiError>>),
}

/// Mock service that replays queued streams and clear responses
#[allow(dead_code)]
pub struct MockCompanionApi {
    streams: Mutex<VecDeque<StreamScript>>,
    clears: Mutex<VecDeque<Result<ClearResponse, ApiError>>>,
    active: Mutex<Option<ActiveConversation>>,
    /// Record of all send requests made
    pub requests: Mutex<Vec<SendRequest>>,
    clear_calls: Mutex<usize>,
}

#[allow(dead_code)]
impl MockCompanionApi {
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(VecDeque::new()),
            clears: Mutex::new(VecDeque::new()),
            active: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            clear_calls: Mutex::new(0),
        }
    }

    /// Queue a stream made of complete frames
    pub fn queue_frames(&self, frames: &[&str]) {
        let fragments = frames.iter().map(|json| Ok(frame(json))).collect();
        self.queue_stream(StreamScript::Fragments(fragments));
    }

    pub fn queue_stream(&self, script: StreamScript) {
        self.streams.lock().unwrap().push_back(script);
    }

    /// Queue a stream the test feeds by hand
    pub fn queue_channel(&self) -> mpsc::Sender<Result<Vec<u8>, ApiError>> {
        let (tx, rx) = mpsc::channel(16);
        self.queue_stream(StreamScript::Channel(rx));
        tx
    }

    pub fn queue_clear(&self, response: Result<ClearResponse, ApiError>) {
        self.clears.lock().unwrap().push_back(response);
    }

    pub fn set_active(&self, active: ActiveConversation) {
        *self.active.lock().unwrap() = Some(active);
    }

    pub fn recorded_requests(&self) -> Vec<SendRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) -> usize {
        *self.clear_calls.lock().unwrap()
    }
}

impl Default for MockCompanionApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompanionApi for MockCompanionApi {
    async fn open_stream(&self, request: &SendRequest) -> Result<ByteStream, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self.streams.lock().unwrap().pop_front();
        match script {
            Some(StreamScript::Fragments(fragments)) => Ok(stream::iter(fragments).boxed()),
            Some(StreamScript::Fail(error)) => Err(error),
            Some(StreamScript::Channel(rx)) => Ok(ReceiverStream::new(rx).boxed()),
            None => Err(ApiError::network("No mock stream queued")),
        }
    }

    async fn clear_conversation(&self) -> Result<ClearResponse, ApiError> {
        *self.clear_calls.lock().unwrap() += 1;
        self.clears
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::network("No mock clear response queued")))
    }

    async fn active_conversation(&self) -> Result<ActiveConversation, ApiError> {
        Ok(self.active.lock().unwrap().clone().unwrap_or_default())
    }
}

/// One `data:` frame with its blank separator line
pub fn frame(json: &str) -> Vec<u8> {
    format!("data: {json}\n\n").into_bytes()
}

// ============================================================================
// Test Runtime
// ============================================================================

/// Running runtime wired to a [`MockCompanionApi`]
pub struct TestRuntime {
    pub handle: ChatHandle,
    pub api: Arc<MockCompanionApi>,
    pub updates: broadcast::Receiver<ViewUpdate>,
    pub join: JoinHandle<()>,
}

impl TestRuntime {
    pub fn start(api: MockCompanionApi) -> Self {
        Self::with_context(api, ChatContext::default())
    }

    pub fn with_context(api: MockCompanionApi, context: ChatContext) -> Self {
        let api = Arc::new(api);
        let (handle, join) = start(context, Arc::clone(&api));
        let updates = handle.subscribe();
        Self {
            handle,
            api,
            updates,
            join,
        }
    }

    /// Wait for the first update matching `predicate`
    pub async fn wait_for_update<F>(&mut self, mut predicate: F) -> ViewUpdate
    where
        F: FnMut(&ViewUpdate) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, self.updates.recv()).await {
                Ok(Ok(update)) if predicate(&update) => return update,
                Ok(Ok(_) | Err(broadcast::error::RecvError::Lagged(_))) => {}
                Ok(Err(broadcast::error::RecvError::Closed)) => panic!("runtime stopped"),
                Err(_) => panic!("timed out waiting for update"),
            }
        }
    }

    /// Wait until the exchange in flight has settled
    pub async fn wait_until_idle(&mut self) {
        self.wait_for_update(|u| {
            matches!(
                u,
                ViewUpdate::Busy {
                    sending: false,
                    clearing: false
                }
            )
        })
        .await;
    }

    pub fn state(&self) -> ChatState {
        self.handle.snapshot()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiErrorKind;
    use crate::protocol::Phase;
    use crate::store::{ConversationMeta, NoticeKind, Role};

    const METADATA: &str = r#"{"type":"metadata","conversation_id":1,"phase":"emotional","round_count":1,"is_privacy":false,"is_complex":false}"#;
    const END: &str = r#"{"type":"end"}"#;

    fn chunk(text: &str) -> String {
        format!(r#"{{"type":"chunk","content":"{text}"}}"#)
    }

    /// Run one full exchange so there is a conversation on screen
    async fn settle_exchange(test: &mut TestRuntime) {
        let first = chunk("I hear you.");
        test.api.queue_frames(&[METADATA, first.as_str(), END]);
        test.handle.send("I feel anxious today").await.unwrap();
        test.wait_until_idle().await;
    }

    #[tokio::test]
    async fn test_send_streams_reply() {
        let mut test = TestRuntime::start(MockCompanionApi::new());
        let first = chunk("I hear you.");
        let second = chunk(" Tell me more.");
        test.api.queue_frames(&[METADATA, first.as_str(), second.as_str(), END]);

        test.handle.send("I feel anxious today").await.unwrap();
        test.wait_until_idle().await;

        let state = test.state();
        let messages = state.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "I feel anxious today");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].phase, Some(Phase::Emotional));
        assert_eq!(messages[1].content, "I hear you. Tell me more.");
        assert_eq!(
            state.meta(),
            &ConversationMeta {
                conversation_id: Some(1),
                phase: Phase::Emotional,
                round_count: 1,
                is_privacy: false,
                is_complex: false,
            }
        );
        assert!(!state.is_sending());

        let requests = test.api.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].conversation_id, None);
    }

    #[tokio::test]
    async fn test_crisis_between_chunks() {
        let mut test = TestRuntime::start(MockCompanionApi::new());
        let first = chunk("I hear you.");
        let second = chunk(" Tell me more.");
        let crisis = r#"{"type":"crisis","content":"Please reach out for help."}"#;
        test.api.queue_frames(&[METADATA, first.as_str(), crisis, second.as_str(), END]);

        test.handle.send("I feel anxious today").await.unwrap();
        test.wait_until_idle().await;

        let state = test.state();
        let messages = state.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content, "I hear you. Tell me more.");
        assert!(messages[2].is_crisis);
        assert_eq!(messages[2].role, Role::System);
        assert_eq!(messages[2].content, "Please reach out for help.");
    }

    #[tokio::test]
    async fn test_open_failure_rolls_back() {
        let mut test = TestRuntime::start(MockCompanionApi::new());
        test.api
            .queue_stream(StreamScript::Fail(ApiError::network("connection refused")));

        test.handle.send("I feel anxious today").await.unwrap();
        let notice = test
            .wait_for_update(|u| matches!(u, ViewUpdate::Notice(_)))
            .await;
        let ViewUpdate::Notice(notice) = notice else {
            unreachable!()
        };
        assert_eq!(notice.kind, NoticeKind::SendFailed);
        assert!(notice.message.contains("connection refused"));

        let state = test.state();
        assert!(state.messages().is_empty());
        assert!(!state.is_sending());
        assert_eq!(state.meta(), &ConversationMeta::default());
    }

    #[tokio::test]
    async fn test_transport_error_restores_conversation() {
        let mut test = TestRuntime::start(MockCompanionApi::new());
        settle_exchange(&mut test).await;
        let before = test.state();

        let advanced = r#"{"type":"metadata","conversation_id":1,"phase":"rational","round_count":2,"is_privacy":true,"is_complex":false}"#;
        let partial = chunk("partial");
        test.api.queue_stream(StreamScript::Fragments(vec![
            Ok(frame(advanced)),
            Ok(frame(&partial)),
            Err(ApiError::network("connection reset")),
        ]));

        test.handle.send("hello").await.unwrap();
        test.wait_until_idle().await;

        let state = test.state();
        assert_eq!(state.messages(), before.messages());
        assert_eq!(state.meta(), before.meta());
        assert!(!state.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_with_farewell_wipes_after_delay() {
        let mut test = TestRuntime::start(MockCompanionApi::new());
        settle_exchange(&mut test).await;
        assert!(!test.state().is_clearing());

        test.api.queue_clear(Ok(ClearResponse {
            success: true,
            message: Some("Take care of yourself.".to_string()),
        }));
        test.handle.clear(true).await.unwrap();

        test.wait_for_update(|u| matches!(u, ViewUpdate::Appended(m) if m.is_resolution))
            .await;
        let shown_at = tokio::time::Instant::now();
        let state = test.state();
        assert!(state.is_clearing());
        let farewell = state.log().last().unwrap();
        assert_eq!(farewell.content, "Take care of yourself.");
        assert_eq!(farewell.role, Role::Assistant);

        tokio::time::sleep(Duration::from_millis(2999)).await;
        let state = test.state();
        assert!(state.is_clearing());
        assert!(state.log().last().is_some_and(|m| m.is_resolution));

        test.wait_for_update(|u| matches!(u, ViewUpdate::Cleared)).await;
        assert_eq!(shown_at.elapsed(), Duration::from_millis(3000));

        let state = test.state();
        assert!(state.messages().is_empty());
        assert_eq!(state.meta(), &ConversationMeta::default());
        assert!(!state.is_clearing());
    }

    #[tokio::test]
    async fn test_clear_without_farewell_wipes_immediately() {
        let mut test = TestRuntime::start(MockCompanionApi::new());
        settle_exchange(&mut test).await;

        test.api.queue_clear(Ok(ClearResponse {
            success: true,
            message: None,
        }));
        test.handle.clear(true).await.unwrap();
        test.wait_for_update(|u| matches!(u, ViewUpdate::Cleared)).await;

        let state = test.state();
        assert!(state.messages().is_empty());
        assert!(!state.is_clearing());
    }

    #[tokio::test]
    async fn test_clear_declined_keeps_conversation() {
        let mut test = TestRuntime::start(MockCompanionApi::new());
        settle_exchange(&mut test).await;
        let before = test.state();

        test.api.queue_clear(Ok(ClearResponse {
            success: false,
            message: None,
        }));
        test.handle.clear(true).await.unwrap();
        test.wait_for_update(|u| {
            matches!(u, ViewUpdate::Notice(n) if n.kind == NoticeKind::ClearFailed)
        })
        .await;

        let state = test.state();
        assert_eq!(state.messages(), before.messages());
        assert_eq!(state.meta(), before.meta());
        assert!(!state.is_clearing());
    }

    #[tokio::test]
    async fn test_clear_request_failure_releases_flag() {
        let mut test = TestRuntime::start(MockCompanionApi::new());
        settle_exchange(&mut test).await;

        test.api
            .queue_clear(Err(ApiError::server_error("Service unavailable: HTTP 503")));
        test.handle.clear(true).await.unwrap();
        test.wait_until_idle().await;

        let state = test.state();
        assert_eq!(state.messages().len(), 2);
        assert!(!state.is_clearing());
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let mut test = TestRuntime::start(MockCompanionApi::new());
        let first = chunk("I hear you.");
        let second = chunk(" Tell me more.");
        test.api.queue_stream(StreamScript::Fragments(vec![
            Ok(frame(METADATA)),
            Ok(frame(&first)),
            Ok(b"data: {\"type\":\"chunk\",\"content\":\n\n".to_vec()),
            Ok(frame(&second)),
            Ok(frame(END)),
        ]));

        test.handle.send("I feel anxious today").await.unwrap();
        test.wait_until_idle().await;

        let state = test.state();
        assert_eq!(state.messages().len(), 2);
        assert_eq!(state.messages()[1].content, "I hear you. Tell me more.");
    }

    #[tokio::test]
    async fn test_second_send_rejected_while_streaming() {
        let mut test = TestRuntime::start(MockCompanionApi::new());
        let body = test.api.queue_channel();

        test.handle.send("first").await.unwrap();
        test.wait_for_update(|u| matches!(u, ViewUpdate::Busy { sending: true, .. }))
            .await;
        test.handle.send("second").await.unwrap();
        test.handle.clear(true).await.unwrap();

        body.send(Ok(frame(METADATA))).await.unwrap();
        body.send(Ok(frame(&chunk("ok")))).await.unwrap();
        body.send(Ok(frame(END))).await.unwrap();
        test.wait_until_idle().await;

        let state = test.state();
        let users: Vec<_> = state
            .messages()
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(users, vec!["first"]);
        assert_eq!(test.api.recorded_requests().len(), 1);
        assert_eq!(test.api.clear_calls(), 0);
    }

    #[tokio::test]
    async fn test_followup_send_carries_conversation_id() {
        let mut test = TestRuntime::start(MockCompanionApi::new());
        settle_exchange(&mut test).await;

        let metadata = r#"{"type":"metadata","conversation_id":1,"phase":"rational","round_count":2,"is_privacy":false,"is_complex":false}"#;
        test.api.queue_frames(&[metadata, END]);
        test.handle.send("It's about work").await.unwrap();
        test.wait_until_idle().await;

        let requests = test.api.recorded_requests();
        assert_eq!(requests[1].conversation_id, Some(1));
        assert_eq!(test.state().meta().round_count, 2);
        assert_eq!(test.state().meta().phase, Phase::Rational);
    }

    #[tokio::test]
    async fn test_resume_continues_active_conversation() {
        let api = MockCompanionApi::new();
        api.set_active(ActiveConversation {
            conversation_id: Some(5),
            phase: Some(Phase::Solution),
            round_count: 4,
            status: Some("active".to_string()),
        });
        let mut test = TestRuntime::start(api);

        test.handle.resume().await.unwrap();
        test.wait_for_update(|u| matches!(u, ViewUpdate::Meta(m) if m.conversation_id == Some(5)))
            .await;

        let metadata = r#"{"type":"metadata","conversation_id":5,"phase":"solution","round_count":5,"is_privacy":false,"is_complex":false}"#;
        test.api.queue_frames(&[metadata, END]);
        test.handle.send("I'm back").await.unwrap();
        test.wait_until_idle().await;

        assert_eq!(test.api.recorded_requests()[0].conversation_id, Some(5));
        assert_eq!(test.state().meta().round_count, 5);
    }

    #[tokio::test]
    async fn test_server_error_frame_surfaces_notice() {
        let mut test = TestRuntime::start(MockCompanionApi::new());
        let error = r#"{"type":"error","content":"model timeout"}"#;
        test.api.queue_frames(&[METADATA, error, END]);

        test.handle.send("hello").await.unwrap();
        let update = test
            .wait_for_update(|u| matches!(u, ViewUpdate::Notice(_)))
            .await;
        assert!(matches!(
            update,
            ViewUpdate::Notice(n) if n.kind == NoticeKind::ServerError && n.message == "model timeout"
        ));
        test.wait_until_idle().await;
        assert_eq!(test.state().messages()[0].content, "hello");
    }

    #[tokio::test]
    async fn test_shutdown_cancels_open_stream() {
        let mut test = TestRuntime::start(MockCompanionApi::new());
        let body = test.api.queue_channel();

        test.handle.send("hello").await.unwrap();
        test.wait_for_update(|u| matches!(u, ViewUpdate::Busy { sending: true, .. }))
            .await;
        test.handle.shutdown().await.unwrap();
        (&mut test.join).await.unwrap();

        tokio::time::timeout(WAIT, body.closed()).await.unwrap();
        assert_eq!(test.handle.send("again").await, Err(crate::runtime::RuntimeError::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_wipe() {
        let mut test = TestRuntime::start(MockCompanionApi::new());
        settle_exchange(&mut test).await;

        test.api.queue_clear(Ok(ClearResponse {
            success: true,
            message: Some("Take care.".to_string()),
        }));
        test.handle.clear(true).await.unwrap();
        test.wait_for_update(|u| matches!(u, ViewUpdate::Appended(m) if m.is_resolution))
            .await;

        test.handle.shutdown().await.unwrap();
        (&mut test.join).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5000)).await;

        let state = test.state();
        assert!(state.log().last().is_some_and(|m| m.is_resolution));
        assert!(state.is_clearing());
    }

    #[tokio::test]
    async fn test_mock_api_without_queue_fails() {
        let api = MockCompanionApi::new();
        let request = SendRequest {
            message: "hi".to_string(),
            conversation_id: None,
        };
        let error = match api.open_stream(&request).await {
            Ok(_) => panic!("expected failure"),
            Err(e) => e,
        };
        assert_eq!(error.kind, ApiErrorKind::Network);
        assert!(api.clear_conversation().await.is_err());
        assert_eq!(api.active_conversation().await.unwrap(), ActiveConversation::default());
        assert_eq!(api.clear_calls(), 1);
    }
}
