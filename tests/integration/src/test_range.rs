//! Range semantics over HTTP.

#[cfg(test)]
mod tests {
    use crate::{FILE_SIZE, TestGateway, header};

    #[tokio::test]
    async fn test_should_return_exact_bytes_for_explicit_ranges() {
        let gw = TestGateway::start().await;
        let cases = [
            (0usize, 0usize),
            (0, 1023),
            (1000, 2000),
            (524_287, 524_288),
            (1_048_576, 1_052_671),
            (300_000, 1_700_000),
            (FILE_SIZE - 1, FILE_SIZE - 1),
        ];

        for (start, end) in cases {
            let resp = gw
                .get(&gw.stream_path(), Some(&format!("bytes={start}-{end}")))
                .await;
            assert_eq!(resp.status(), 206, "range {start}-{end}");
            let expected_len = (end - start + 1).to_string();
            assert_eq!(header(&resp, "content-length"), Some(expected_len.as_str()));
            let expected_range = format!("bytes {start}-{end}/{FILE_SIZE}");
            assert_eq!(header(&resp, "content-range"), Some(expected_range.as_str()));

            let body = resp.bytes().await.expect("body");
            assert_eq!(body.as_ref(), &gw.data[start..=end], "range {start}-{end}");
        }
    }

    #[tokio::test]
    async fn test_should_return_full_file_without_range_header() {
        let gw = TestGateway::start().await;
        let resp = gw.get(&gw.stream_path(), None).await;

        assert_eq!(resp.status(), 200);
        assert_eq!(header(&resp, "content-length"), Some("2000000"));
        assert_eq!(header(&resp, "accept-ranges"), Some("bytes"));
        assert_eq!(header(&resp, "content-type"), Some("audio/mpeg"));
        assert!(header(&resp, "content-range").is_none());

        let body = resp.bytes().await.expect("body");
        assert_eq!(body.as_ref(), gw.data.as_slice());
    }

    #[tokio::test]
    async fn test_should_answer_full_covering_range_with_206() {
        let gw = TestGateway::start().await;
        let resp = gw.get(&gw.stream_path(), Some("bytes=0-")).await;

        assert_eq!(resp.status(), 206);
        assert_eq!(header(&resp, "content-range"), Some("bytes 0-1999999/2000000"));
        assert_eq!(resp.bytes().await.expect("body").len(), FILE_SIZE);
    }

    #[tokio::test]
    async fn test_should_serve_suffix_range() {
        let gw = TestGateway::start().await;
        let resp = gw.get(&gw.stream_path(), Some("bytes=-500")).await;

        assert_eq!(resp.status(), 206);
        assert_eq!(
            header(&resp, "content-range"),
            Some("bytes 1999500-1999999/2000000")
        );
        let body = resp.bytes().await.expect("body");
        assert_eq!(body.as_ref(), &gw.data[FILE_SIZE - 500..]);
    }

    #[tokio::test]
    async fn test_should_reject_range_beyond_end_with_416() {
        let gw = TestGateway::start().await;
        let resp = gw.get(&gw.stream_path(), Some("bytes=2000000-")).await;

        assert_eq!(resp.status(), 416);
        assert_eq!(header(&resp, "content-range"), Some("bytes */2000000"));
        assert!(gw.upstream.chunk_calls().is_empty());
    }

    #[tokio::test]
    async fn test_should_reject_multi_range_with_416() {
        let gw = TestGateway::start().await;
        let resp = gw.get(&gw.stream_path(), Some("bytes=0-10,20-30")).await;

        assert_eq!(resp.status(), 416);
        let json: serde_json::Value = resp.json().await.expect("json");
        assert_eq!(json["code"], "RangeUnsupported");
        assert!(gw.upstream.chunk_calls().is_empty());
    }
}
