//! Routing, lookup failures and access control.

#[cfg(test)]
mod tests {
    use crate::{TestGateway, header};

    #[tokio::test]
    async fn test_should_stream_by_message_reference() {
        let gw = TestGateway::start().await;
        let resp = gw
            .get("/stream/by-msg/42?chat=%40music", Some("bytes=10-19"))
            .await;

        assert_eq!(resp.status(), 206);
        let body = resp.bytes().await.expect("body");
        assert_eq!(body.as_ref(), &gw.data[10..20]);
        assert_eq!(gw.upstream.joins(), vec!["music".to_owned()]);
    }

    #[tokio::test]
    async fn test_should_hide_forbidden_channel_behind_404() {
        let gw = TestGateway::start().await;
        gw.upstream.add_document("private", 1, vec![1u8; 10], None);
        gw.upstream.forbid_channel("private");

        let forbidden = gw.get("/stream/by-msg/1?chat=private", None).await;
        let missing = gw.get("/stream/by-msg/1?chat=nowhere", None).await;

        assert_eq!(forbidden.status(), 404);
        assert_eq!(missing.status(), 404);
        let forbidden: serde_json::Value = forbidden.json().await.expect("json");
        let missing: serde_json::Value = missing.json().await.expect("json");
        assert_eq!(forbidden, missing);
    }

    #[tokio::test]
    async fn test_should_return_404_for_unknown_file_id() {
        let gw = TestGateway::start().await;
        let resp = gw
            .get(&format!("/stream/{}", uuid::Uuid::new_v4()), None)
            .await;
        assert_eq!(resp.status(), 404);

        let resp = gw.get("/stream/not-a-uuid", None).await;
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_should_return_404_for_message_without_document() {
        let gw = TestGateway::start().await;
        gw.upstream.add_plain_message("music", 43);

        let resp = gw.get("/stream/by-msg/43?chat=music", None).await;
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_should_reject_malformed_message_routes() {
        let gw = TestGateway::start().await;
        assert_eq!(gw.get("/stream/by-msg/42", None).await.status(), 400);
        assert_eq!(gw.get("/stream/by-msg/x?chat=music", None).await.status(), 400);
    }

    #[tokio::test]
    async fn test_should_reject_unsupported_methods() {
        let gw = TestGateway::start().await;
        let resp = gw
            .client()
            .post(gw.url(&gw.stream_path()))
            .send()
            .await
            .expect("request");

        assert_eq!(resp.status(), 405);
        assert_eq!(header(&resp, "allow"), Some("GET, HEAD"));
    }

    #[tokio::test]
    async fn test_should_tag_every_response_with_request_id() {
        let gw = TestGateway::start().await;
        let ok = gw.get("/health", None).await;
        let missing = gw.get("/nothing/here", None).await;

        assert_eq!(ok.status(), 200);
        assert_eq!(missing.status(), 404);
        assert!(header(&ok, "x-request-id").is_some());
        assert!(header(&missing, "x-request-id").is_some());
        assert_eq!(header(&ok, "server"), Some("RangeGate"));
    }
}
