//! Chunk alignment, retries and idempotence seen through the HTTP surface.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rangegate_core::CHUNK_SIZE;
    use rangegate_core::upstream::memory::{Fault, MemoryUpstream, UpstreamOp};

    use crate::{SERVICE_TOKEN, TestGateway, header};

    const CHUNK: u64 = CHUNK_SIZE as u64;

    #[tokio::test]
    async fn test_should_fetch_single_aligned_chunk_for_mid_file_range() {
        let gw = TestGateway::start().await;
        let resp = gw
            .get(&gw.stream_path(), Some("bytes=1048576-1052671"))
            .await;

        assert_eq!(resp.status(), 206);
        assert_eq!(header(&resp, "content-length"), Some("4096"));
        assert_eq!(
            header(&resp, "content-range"),
            Some("bytes 1048576-1052671/2000000")
        );
        let body = resp.bytes().await.expect("body");
        assert_eq!(body.as_ref(), &gw.data[1_048_576..=1_052_671]);

        let calls = gw.upstream.chunk_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].offset, 1_048_576);
        assert_eq!(u64::from(calls[0].limit), CHUNK);
    }

    #[tokio::test]
    async fn test_should_trim_first_chunk_for_leading_range() {
        let gw = TestGateway::start().await;
        let resp = gw.get(&gw.stream_path(), Some("bytes=0-1023")).await;

        assert_eq!(header(&resp, "content-length"), Some("1024"));
        let body = resp.bytes().await.expect("body");
        assert_eq!(body.as_ref(), &gw.data[..1024]);
        assert_eq!(gw.upstream.chunk_calls()[0].offset, 0);
    }

    #[tokio::test]
    async fn test_should_drop_leading_bytes_of_aligned_chunk() {
        let gw = TestGateway::start().await;
        let resp = gw.get(&gw.stream_path(), Some("bytes=1000-2000")).await;

        assert_eq!(header(&resp, "content-length"), Some("1001"));
        let body = resp.bytes().await.expect("body");
        assert_eq!(body.as_ref(), &gw.data[1000..=2000]);

        let calls = gw.upstream.chunk_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].offset, 0);
    }

    #[tokio::test]
    async fn test_should_align_first_fetch_for_any_start() {
        let gw = TestGateway::start().await;
        for start in [1u64, 524_287, 524_288, 524_289, 1_500_000, 1_999_999] {
            let before = gw.upstream.chunk_calls().len();
            let resp = gw
                .get(&gw.stream_path(), Some(&format!("bytes={start}-")))
                .await;
            let _ = resp.bytes().await.expect("body");

            let calls = gw.upstream.chunk_calls();
            assert_eq!(calls[before].offset, start - start % CHUNK, "start {start}");
            for pair in calls[before..].windows(2) {
                assert_eq!(pair[1].offset, pair[0].offset + CHUNK);
            }
        }
    }

    #[tokio::test]
    async fn test_should_retry_transient_chunk_failure_without_duplicating_bytes() {
        let gw = TestGateway::start().await;
        gw.upstream
            .inject_fault(UpstreamOp::GetFileChunk, Fault::Rpc("INTERNAL"));
        gw.upstream
            .inject_fault(UpstreamOp::GetFileChunk, Fault::Disconnect);

        let resp = gw.get(&gw.stream_path(), Some("bytes=1000-600000")).await;
        assert_eq!(resp.status(), 206);
        let body = resp.bytes().await.expect("body");
        assert_eq!(body.as_ref(), &gw.data[1000..=600_000]);

        let offsets: Vec<u64> = gw.upstream.chunk_calls().iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 0, 0, CHUNK]);
    }

    #[tokio::test]
    async fn test_should_absorb_rate_limit_on_chunk() {
        let gw = TestGateway::start().await;
        gw.upstream.inject_fault(
            UpstreamOp::GetFileChunk,
            Fault::RateLimited(Some(Duration::from_millis(5))),
        );

        let resp = gw.get(&gw.stream_path(), Some("bytes=0-99")).await;
        assert_eq!(resp.status(), 206);
        let body = resp.bytes().await.expect("body");
        assert_eq!(body.as_ref(), &gw.data[..100]);
    }

    #[tokio::test]
    async fn test_should_return_identical_bodies_for_repeated_requests() {
        let gw = TestGateway::start().await;
        let first = gw
            .get(&gw.stream_path(), Some("bytes=123456-987654"))
            .await
            .bytes()
            .await
            .expect("body");
        let second = gw
            .get(&gw.stream_path(), Some("bytes=123456-987654"))
            .await
            .bytes()
            .await
            .expect("body");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_should_abort_body_after_retry_budget_is_spent() {
        let gw = TestGateway::start().await;
        for _ in 0..3 {
            gw.upstream
                .inject_fault(UpstreamOp::GetFileChunk, Fault::Rpc("INTERNAL"));
        }

        let resp = gw.get(&gw.stream_path(), Some("bytes=0-99")).await;
        assert_eq!(resp.status(), 206);
        assert!(resp.bytes().await.is_err());
    }

    #[tokio::test]
    async fn test_should_surface_unabsorbed_rate_limit_as_429() {
        let gw = TestGateway::start().await;
        for _ in 0..3 {
            gw.upstream.inject_fault(
                UpstreamOp::GetDocument,
                Fault::RateLimited(Some(Duration::from_millis(1))),
            );
        }

        let resp = gw.get(&gw.stream_path(), None).await;
        assert_eq!(resp.status(), 429);
        assert!(header(&resp, "retry-after").is_some());
        assert!(gw.upstream.chunk_calls().is_empty());
    }

    #[tokio::test]
    async fn test_should_return_502_when_resolution_keeps_failing() {
        let gw = TestGateway::start().await;
        for _ in 0..3 {
            gw.upstream
                .inject_fault(UpstreamOp::GetDocument, Fault::Rpc("INTERNAL"));
        }

        let resp = gw.get(&gw.stream_path(), None).await;
        assert_eq!(resp.status(), 502);
    }

    #[tokio::test]
    async fn test_should_sign_in_as_service_and_skip_joins() {
        let gw = TestGateway::start_with(MemoryUpstream::with_service_token(SERVICE_TOKEN), false).await;
        let resp = gw.get(&gw.stream_path(), Some("bytes=0-9")).await;

        assert_eq!(resp.status(), 206);
        assert_eq!(resp.bytes().await.expect("body").as_ref(), &gw.data[..10]);
        assert!(gw.upstream.joins().is_empty());
    }
}
