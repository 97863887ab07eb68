//! Downloads, HEAD probes and play logging.

#[cfg(test)]
mod tests {
    use rangegate_core::upstream::memory::MemoryUpstream;

    use crate::{TestGateway, header};

    #[tokio::test]
    async fn test_should_name_download_attachment() {
        let gw = TestGateway::start().await;
        let resp = gw
            .get(&format!("/download/{}", gw.file_id), Some("bytes=0-1023"))
            .await;

        assert_eq!(resp.status(), 206);
        let disposition = header(&resp, "content-disposition").expect("disposition");
        assert!(disposition.starts_with("attachment; filename=\"Alpha, Beta - Night Drive.mp3\""));
        assert!(disposition.contains("filename*=UTF-8''"));
        assert_eq!(resp.bytes().await.expect("body").len(), 1024);
    }

    #[tokio::test]
    async fn test_should_not_set_disposition_on_inline_stream() {
        let gw = TestGateway::start().await;
        let resp = gw.get(&gw.stream_path(), Some("bytes=0-9")).await;
        assert!(header(&resp, "content-disposition").is_none());
        assert_eq!(header(&resp, "cache-control"), Some("no-transform"));
        assert_eq!(header(&resp, "content-encoding"), Some("identity"));
    }

    #[tokio::test]
    async fn test_should_answer_head_without_fetching_chunks() {
        let gw = TestGateway::start().await;
        let resp = gw.head(&gw.stream_path()).await;

        assert_eq!(resp.status(), 200);
        assert_eq!(header(&resp, "accept-ranges"), Some("bytes"));
        assert!(gw.upstream.chunk_calls().is_empty());
    }

    #[tokio::test]
    async fn test_should_record_play_for_trusted_caller() {
        let gw = TestGateway::start_with(MemoryUpstream::with_user_session(), true).await;
        let resp = gw
            .client()
            .get(gw.url(&gw.stream_path()))
            .header("Range", "bytes=0-0")
            .header("x-debug-user-id", "31337")
            .send()
            .await
            .expect("request");
        let _ = resp.bytes().await.expect("body");

        for _ in 0..50 {
            if !gw.usage.plays().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(gw.usage.plays(), vec![(31337, gw.file_id)]);
    }

    #[tokio::test]
    async fn test_should_ignore_debug_caller_when_not_allowed() {
        let gw = TestGateway::start().await;
        let resp = gw
            .client()
            .get(gw.url(&gw.stream_path()))
            .header("Range", "bytes=0-0")
            .header("x-debug-user-id", "31337")
            .send()
            .await
            .expect("request");
        let _ = resp.bytes().await.expect("body");

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(gw.usage.plays().is_empty());
    }
}
