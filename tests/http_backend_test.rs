//! Backend HTTP API Integration Tests
//!
//! Verifies the Init/SignPart/Complete/Abort wire contract against a mock
//! upload service.

#[cfg(test)]
mod tests {
    use kata_uploadr::backend::{
        AbortRequest, BackendConfig, BearerToken, CompleteRequest, CompletedPart, HttpBackend,
        InitRequest, RequestError, SignPartRequest, StorageBackend,
    };
    use kata_uploadr::upload::DeviceClass;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Helper to create a backend client for testing
    fn create_backend(server: &MockServer) -> HttpBackend {
        HttpBackend::new(BackendConfig {
            base_url: format!("{}/api/uploads/", server.uri()),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn token() -> BearerToken {
        BearerToken::new("session-token").unwrap()
    }

    #[tokio::test]
    async fn test_init_sends_metadata_with_bearer_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/uploads/init"))
            .and(header("authorization", "Bearer session-token"))
            .and(body_json(json!({
                "filename": "lesson.mp4",
                "contentType": "video/mp4",
                "fileSize": 27262976u64,
                "deviceClass": "standard"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uploadId": "upload-42",
                "objectKey": "videos/lesson.mp4",
                "partSize": 8388608u64,
                "partCount": 4
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let backend = create_backend(&mock_server);
        let response = backend
            .init(
                &token(),
                &InitRequest {
                    filename: "lesson.mp4".into(),
                    content_type: "video/mp4".into(),
                    file_size: 27262976,
                    device_class: DeviceClass::Standard,
                },
            )
            .await
            .unwrap();

        assert_eq!(response.upload_id, "upload-42");
        assert_eq!(response.object_key, "videos/lesson.mp4");
        assert_eq!(response.part_size, Some(8388608));
        assert_eq!(response.part_count, Some(4));
    }

    #[tokio::test]
    async fn test_sign_part_returns_url() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/uploads/sign-part"))
            .and(body_json(json!({
                "objectKey": "videos/lesson.mp4",
                "uploadId": "upload-42",
                "partNumber": 3
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"url": "https://storage.example.com/p3?sig=abc"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let backend = create_backend(&mock_server);
        let signed = backend
            .sign_part(
                &token(),
                &SignPartRequest {
                    object_key: "videos/lesson.mp4".into(),
                    upload_id: "upload-42".into(),
                    part_number: 3,
                },
            )
            .await
            .unwrap();

        assert_eq!(signed.url, "https://storage.example.com/p3?sig=abc");
    }

    #[tokio::test]
    async fn test_complete_sends_part_list() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/uploads/complete"))
            .and(body_json(json!({
                "objectKey": "videos/lesson.mp4",
                "uploadId": "upload-42",
                "parts": [
                    {"partNumber": 1, "integrityTag": "\"e1\""},
                    {"partNumber": 2, "integrityTag": "\"e2\""}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "finalObjectLocator": "https://cdn.example.com/videos/lesson.mp4"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let backend = create_backend(&mock_server);
        let response = backend
            .complete(
                &token(),
                &CompleteRequest {
                    object_key: "videos/lesson.mp4".into(),
                    upload_id: "upload-42".into(),
                    parts: vec![
                        CompletedPart {
                            part_number: 1,
                            integrity_tag: "\"e1\"".into(),
                        },
                        CompletedPart {
                            part_number: 2,
                            integrity_tag: "\"e2\"".into(),
                        },
                    ],
                },
            )
            .await
            .unwrap();

        assert_eq!(
            response.final_object_locator,
            "https://cdn.example.com/videos/lesson.mp4"
        );
    }

    #[tokio::test]
    async fn test_abort_accepts_no_content() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/uploads/abort"))
            .and(header("authorization", "Bearer session-token"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let backend = create_backend(&mock_server);
        backend
            .abort(
                &token(),
                &AbortRequest {
                    object_key: "videos/lesson.mp4".into(),
                    upload_id: "upload-42".into(),
                },
            )
            .await
            .unwrap();
    }

    async fn init_with_status(status: u16) -> RequestError {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/uploads/init"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&mock_server)
            .await;

        create_backend(&mock_server)
            .init(
                &token(),
                &InitRequest {
                    filename: "lesson.mp4".into(),
                    content_type: "video/mp4".into(),
                    file_size: 1,
                    device_class: DeviceClass::Standard,
                },
            )
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn test_error_classification() {
        assert!(matches!(
            init_with_status(500).await,
            RequestError::Server { status: 500, .. }
        ));
        assert!(matches!(
            init_with_status(401).await,
            RequestError::Client { status: 401, .. }
        ));
        assert!(matches!(init_with_status(408).await, RequestError::Timeout));

        let throttled = init_with_status(429).await;
        assert!(matches!(throttled, RequestError::Server { status: 429, .. }));
        assert!(throttled.is_retryable());
    }

    #[tokio::test]
    async fn test_client_error_carries_body() {
        match init_with_status(403).await {
            RequestError::Client { message, .. } => assert_eq!(message, "nope"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/uploads/sign-part"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&mock_server)
            .await;

        let err = create_backend(&mock_server)
            .sign_part(
                &token(),
                &SignPartRequest {
                    object_key: "k".into(),
                    upload_id: "u".into(),
                    part_number: 1,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RequestError::InvalidResponse(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let backend = HttpBackend::new(BackendConfig {
            base_url: "http://127.0.0.1:1".into(),
            request_timeout: Duration::from_secs(2),
        })
        .unwrap();

        let err = backend
            .abort(
                &token(),
                &AbortRequest {
                    object_key: "k".into(),
                    upload_id: "u".into(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RequestError::Network(_)));
        assert!(err.is_retryable());
    }
}
