//! Integration tests for the mecenas client against a mock backend.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{Value, json};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use mecenas::chat::{
        ChatConfig, ChatObserver, ChatSession, ErrorCategory, FALLBACK_RESPONSE, Notice,
        NoticeLevel, TurnOutcome,
    };
    use mecenas::{
        AssistantClient, ChatRequest, Error, FeedbackType, FileStore, SessionStorage,
        SourceMetadata, StreamCallbacks,
    };

    const ANSWER: &str = concat!(
        "{\"type\":\"start\",\"messageId\":\"m-1\"}\n",
        "{\"type\":\"delta\",\"content\":\"Okres wypowiedzenia \"}\n",
        "{\"type\":\"metadata\",\"sources\":[{\"title\":\"Kodeks pracy\",\"article\":\"art. 36\"}]}\n",
        "{\"type\":\"delta\",\"content\":\"zależy od stażu pracy.\"}\n",
        "{\"type\":\"complete\"}\n",
    );

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl StreamCallbacks for Recorder {
        fn on_message_start(&mut self) {
            self.calls.push("start".to_string());
        }

        fn on_content_delta(&mut self, accumulated: &str) {
            self.calls.push(format!("delta:{accumulated}"));
        }

        fn on_source_metadata(&mut self, metadata: &SourceMetadata) {
            self.calls.push(format!("metadata:{}", metadata.sources[0].title));
        }

        fn on_message_complete(&mut self, content: &str) {
            self.calls.push(format!("complete:{content}"));
        }

        fn on_error(&mut self, error: &Error) {
            self.calls.push(format!("error:{error}"));
        }
    }

    #[derive(Default)]
    struct Notices(Vec<Notice>);

    impl ChatObserver for Notices {
        fn notify(&mut self, notice: &Notice) {
            self.0.push(notice.clone());
        }
    }

    fn client(server: &MockServer) -> AssistantClient {
        AssistantClient::with_options(
            Some("anon-key".to_string()),
            Some(server.uri()),
            Some(Duration::from_secs(5)),
        )
        .expect("client")
    }

    fn config(server: &MockServer) -> ChatConfig {
        ChatConfig::new()
            .with_api_url(server.uri())
            .with_retries(3, Duration::from_millis(10))
            .with_feedback_retry_steps(vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(30),
            ])
    }

    fn ndjson(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "application/x-ndjson")
            .set_body_string(body)
    }

    async fn mount_answer(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ndjson(ANSWER))
            .mount(server)
            .await;
    }

    async fn bodies(server: &MockServer, endpoint: &str) -> Vec<Value> {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == endpoint)
            .map(|r| serde_json::from_slice(&r.body).expect("json body"))
            .collect()
    }

    #[tokio::test]
    async fn test_streams_ndjson_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer anon-key"))
            .and(body_partial_json(json!({
                "message": "Jaki jest okres wypowiedzenia?",
                "sessionId": "s-1",
                "usePremiumModel": false
            })))
            .respond_with(ndjson(ANSWER))
            .mount(&server)
            .await;

        let request = ChatRequest::new("Jaki jest okres wypowiedzenia?", "s-1", "m-1");
        let mut recorder = Recorder::default();
        let outcome = client(&server).stream_message(&request, &mut recorder).await;

        assert_eq!(
            outcome.into_result().unwrap(),
            "Okres wypowiedzenia zależy od stażu pracy."
        );
        assert_eq!(
            recorder.calls,
            vec![
                "start",
                "delta:Okres wypowiedzenia ",
                "metadata:Kodeks pracy",
                "delta:Okres wypowiedzenia zależy od stażu pracy.",
                "complete:Okres wypowiedzenia zależy od stażu pracy.",
            ]
        );
    }

    #[tokio::test]
    async fn test_error_status_reaches_on_error_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"error": "model unavailable"})),
            )
            .mount(&server)
            .await;

        let request = ChatRequest::new("x", "s-1", "m-1");
        let mut recorder = Recorder::default();
        let outcome = client(&server).stream_message(&request, &mut recorder).await;

        let err = outcome.into_result().unwrap_err();
        assert!(err.is_server_error());
        assert_eq!(recorder.calls.len(), 1);
        assert!(recorder.calls[0].contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_rate_limited_turn_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(json!({"error": "Too many requests"})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_answer(&server).await;

        let mut session =
            ChatSession::new(client(&server), config(&server), SessionStorage::in_memory());
        let mut observer = Notices::default();
        let outcome = session
            .send_message("Jaki jest okres wypowiedzenia?", None, &mut observer)
            .await
            .unwrap();

        assert!(outcome.is_completed());
        assert!(observer.0.is_empty());
        assert_eq!(bodies(&server, "/chat").await.len(), 2);
        let answer = &session.messages()[1];
        assert_eq!(answer.content, "Okres wypowiedzenia zależy od stażu pracy.");
        assert_eq!(answer.metadata.as_ref().unwrap().sources.len(), 1);
    }

    #[tokio::test]
    async fn test_server_failure_shows_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let mut session =
            ChatSession::new(client(&server), config(&server), SessionStorage::in_memory());
        let mut observer = Notices::default();
        let outcome = session.send_message("x", None, &mut observer).await.unwrap();

        match outcome {
            TurnOutcome::Failed { category, .. } => assert_eq!(category, ErrorCategory::Server),
            TurnOutcome::Completed { .. } => panic!("turn should have failed"),
        }
        assert_eq!(bodies(&server, "/chat").await.len(), 1);
        assert_eq!(session.messages()[1].content, FALLBACK_RESPONSE);
        assert_eq!(observer.0.len(), 1);
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_pending_feedback_is_retried() {
        let server = MockServer::start().await;
        mount_answer(&server).await;
        Mock::given(method("POST"))
            .and(path("/feedback"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "pending"})))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/feedback"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let mut session =
            ChatSession::new(client(&server), config(&server), SessionStorage::in_memory());
        let mut observer = Notices::default();
        let outcome = session.send_message("x", None, &mut observer).await.unwrap();
        session
            .submit_feedback(outcome.message_id(), FeedbackType::Positive, &mut observer)
            .await
            .unwrap();

        let levels: Vec<NoticeLevel> = observer.0.iter().map(|n| n.level).collect();
        assert_eq!(levels, vec![NoticeLevel::Info, NoticeLevel::Success]);
        let feedback = bodies(&server, "/feedback").await;
        assert_eq!(feedback.len(), 3);
        assert_eq!(
            feedback[0],
            json!({"messageId": outcome.message_id(), "feedbackType": "positive"})
        );
    }

    #[tokio::test]
    async fn test_accepted_feedback_counts_as_pending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/feedback"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let response = client(&server)
            .submit_feedback(&mecenas::FeedbackRequest {
                message_id: "m-1".to_string(),
                feedback_type: FeedbackType::Negative,
            })
            .await
            .unwrap();
        assert!(response.is_pending());
    }

    #[tokio::test]
    async fn test_share_round_trip_and_expiry() {
        let server = MockServer::start().await;
        mount_answer(&server).await;
        Mock::given(method("POST"))
            .and(path("/share"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"shareId": "abc"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/share/old"))
            .respond_with(ResponseTemplate::new(410).set_body_json(json!({"error": "expired"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/share/nope"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "not found"})))
            .mount(&server)
            .await;

        let mut session =
            ChatSession::new(client(&server), config(&server), SessionStorage::in_memory());
        let mut observer = Notices::default();
        session.send_message("x", None, &mut observer).await.unwrap();
        assert_eq!(session.share().await.unwrap(), "abc");
        let shared = bodies(&server, "/share").await;
        assert_eq!(shared[0]["messages"].as_array().unwrap().len(), 2);

        assert!(session.open_shared("old").await.unwrap_err().is_expired());
        assert!(session.open_shared("nope").await.unwrap_err().is_not_found());
        assert_eq!(session.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_session_id_survives_restart() {
        let server = MockServer::start().await;
        mount_answer(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");

        for _ in 0..2 {
            let storage = SessionStorage::new(FileStore::open(&state).unwrap());
            let mut session = ChatSession::new(client(&server), config(&server), storage);
            let mut observer = Notices::default();
            session.send_message("x", None, &mut observer).await.unwrap();
        }

        let chats = bodies(&server, "/chat").await;
        assert_eq!(chats.len(), 2);
        assert!(chats[0]["sessionId"].as_str().is_some_and(|s| !s.is_empty()));
        assert_eq!(chats[0]["sessionId"], chats[1]["sessionId"]);
    }
}
