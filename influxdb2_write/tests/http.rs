use std::{io::Write, iter, sync::Arc, time::Duration};

use assert_matches::assert_matches;
use flate2::{Compression, write::GzEncoder};
use hyper::{Body, Request, StatusCode, header::CONTENT_ENCODING, header::HeaderValue};
use influxdb2_lp::DecodeError;
use influxdb2_tenant::{
    TenantError, TenantResolver,
    mem::{Lookup, MemDirectory},
};
use influxdb2_tsm::BlockType;
use influxdb2_types::{
    Bucket, Organization,
    time::{MockProvider, Time},
};
use influxdb2_write::{
    PointsWriter, PointsWriterError, WriteError, WriteService,
    http::{Error, ErrorCode, HttpDelegate},
    mock::{MockPointsWriter, MockPointsWriterCall},
    storage::{BlockKey, BlockStore},
};
use tokio_util::sync::CancellationToken;

const MAX_BYTES: usize = 1024;
const NOW: i64 = 1_600_000_000_000_000_000;

struct Fixture {
    dir: Arc<MemDirectory>,
    org: Organization,
    bucket: Bucket,
    delegate: HttpDelegate,
}

impl Fixture {
    fn new(writer: Arc<dyn PointsWriter>) -> Self {
        Self::with_timeout(writer, Duration::from_secs(10))
    }

    fn with_timeout(writer: Arc<dyn PointsWriter>, write_timeout: Duration) -> Self {
        let dir = Arc::new(MemDirectory::default());
        let org = dir.create_organization("bananas");
        let bucket = dir.create_bucket(org.id, "test");
        dir.create_dbrp_mapping("mydb", "autogen", org.id, bucket.id);

        let resolver = TenantResolver::new(
            Arc::clone(&dir) as _,
            Arc::clone(&dir) as _,
            Arc::clone(&dir) as _,
        );
        let service = WriteService::new(resolver, writer, MAX_BYTES)
            .with_time_provider(Arc::new(MockProvider::new(Time::from_timestamp_nanos(NOW))));
        let delegate = HttpDelegate::new(MAX_BYTES, write_timeout, service);

        Self {
            dir,
            org,
            bucket,
            delegate,
        }
    }
}

fn gzip(body: &[u8]) -> Vec<u8> {
    let mut e = GzEncoder::new(Vec::new(), Compression::default());
    e.write_all(body).unwrap();
    e.finish().expect("failed to compress test body")
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .body(body.into())
        .unwrap()
}

async fn json_body(response: hyper::Response<Body>) -> serde_json::Value {
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

// Generate two write handler tests - one for a plain request and one with a
// gzip-encoded body (and appropriate header), asserting the handler return
// value & the points handed to the writer.
macro_rules! test_write_handler {
    (
        $name:ident,
        query_string = $query_string:expr,      // Request URI query string
        body = $body:expr,                      // Request body content
        writer_return = $writer_return:expr,    // Points writer response (if called)
        want_result = $want_result:pat,         // Expected handler return value (as pattern)
        want_status = $want_status:expr,        // Expected response status code
        want_writes = $($want_writes:tt )+      // assert_matches slice pattern for expected writes
    ) => {
        test_write_handler!(
            $name,
            encoding = plain,
            query_string = $query_string,
            body = $body,
            writer_return = $writer_return,
            want_result = $want_result,
            want_status = $want_status,
            want_writes = $($want_writes)+
        );
        test_write_handler!(
            $name,
            encoding = gzip,
            query_string = $query_string,
            body = $body,
            writer_return = $writer_return,
            want_result = $want_result,
            want_status = $want_status,
            want_writes = $($want_writes)+
        );
    };
    // Actual test body generator.
    (
        $name:ident,
        encoding = $encoding:tt,
        query_string = $query_string:expr,
        body = $body:expr,
        writer_return = $writer_return:expr,
        want_result = $want_result:pat,
        want_status = $want_status:expr,
        want_writes = $($want_writes:tt )+
    ) => {
        paste::paste! {
            #[test_log::test(tokio::test)]
            async fn [<test_write_handler_ $name _ $encoding>]() {
                let body = $body;

                // Optionally generate a fragment of code to encode the body
                let body = test_write_handler!(encoding=$encoding, body);

                #[allow(unused_mut)]
                let mut request = post(
                    &format!("https://bananas.example/api/v2/write{}", $query_string),
                    body,
                );

                // Optionally modify request to account for the desired
                // encoding
                test_write_handler!(encoding_header=$encoding, request);

                let writer = Arc::new(
                    MockPointsWriter::default().with_write_return($writer_return)
                );
                let f = Fixture::new(Arc::clone(&writer) as _);

                let got = f.delegate.route(request).await;
                let status = match &got {
                    Ok(resp) => resp.status(),
                    Err(e) => e.as_status_code(),
                };
                assert_matches!(got, $want_result);
                assert_eq!(status, $want_status);

                let calls = writer.calls();
                for call in &calls {
                    assert_eq!(call.org_id, f.org.id);
                    assert_eq!(call.bucket_id, f.bucket.id);
                }
                assert_matches!(calls.as_slice(), $($want_writes)+);
            }
        }
    };
    (encoding=plain, $body:ident) => {
        $body.to_vec()
    };
    (encoding=gzip, $body:ident) => {
        gzip(&$body)
    };
    (encoding_header=plain, $request:ident) => {};
    (encoding_header=gzip, $request:ident) => {{
        // Set the gzip content encoding
        $request
            .headers_mut()
            .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    }};
}

test_write_handler!(
    ok,
    query_string = "?org=bananas&bucket=test",
    body = "platanos,tag1=A,tag2=B val=42i 123456".as_bytes(),
    writer_return = [Ok(())],
    want_result = Ok(_),
    want_status = StatusCode::NO_CONTENT,
    want_writes = [MockPointsWriterCall { points, .. }] => {
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].series_key(), "platanos,tag1=A,tag2=B");
        assert_eq!(points[0].timestamp, 123456);
    }
);

test_write_handler!(
    org_and_bucket_ids,
    query_string = "?org_id=05c19117091a1000&bucket=05c19117091a1001",
    body = "platanos val=42i".as_bytes(),
    writer_return = [Ok(())],
    want_result = Ok(_),
    want_status = StatusCode::NO_CONTENT,
    want_writes = [MockPointsWriterCall { points, .. }] => {
        assert_eq!(points[0].timestamp, NOW);
    }
);

test_write_handler!(
    legacy_dbrp,
    query_string = "?db=mydb&rp=autogen",
    body = "platanos val=42i".as_bytes(),
    writer_return = [Ok(())],
    want_result = Ok(_),
    want_status = StatusCode::NO_CONTENT,
    want_writes = [_]
);

test_write_handler!(
    precision_scales_timestamps,
    query_string = "?org=bananas&bucket=test&precision=ms",
    body = "platanos val=42i 5".as_bytes(),
    writer_return = [Ok(())],
    want_result = Ok(_),
    want_status = StatusCode::NO_CONTENT,
    want_writes = [MockPointsWriterCall { points, .. }] => {
        assert_eq!(points[0].timestamp, 5_000_000);
    }
);

test_write_handler!(
    empty_body,
    query_string = "?org=bananas&bucket=test",
    body = "".as_bytes(),
    writer_return = [Ok(())],
    want_result = Ok(_),
    want_status = StatusCode::OK,
    want_writes = []
);

test_write_handler!(
    no_query_params,
    query_string = "",
    body = "platanos,tag1=A,tag2=B val=42i 123456".as_bytes(),
    writer_return = [Ok(())],
    want_result = Err(Error::Write(WriteError::TenantResolution(TenantError::MissingOrganization))),
    want_status = StatusCode::BAD_REQUEST,
    want_writes = [] // None
);

test_write_handler!(
    empty_org_bucket,
    query_string = "?org=&bucket=",
    body = "platanos,tag1=A,tag2=B val=42i 123456".as_bytes(),
    writer_return = [Ok(())],
    want_result = Err(Error::Write(WriteError::TenantResolution(TenantError::MissingOrganization))),
    want_status = StatusCode::BAD_REQUEST,
    want_writes = [] // None
);

test_write_handler!(
    missing_bucket,
    query_string = "?org=bananas",
    body = "platanos val=42i".as_bytes(),
    writer_return = [Ok(())],
    want_result = Err(Error::Write(WriteError::TenantResolution(TenantError::MissingBucket))),
    want_status = StatusCode::BAD_REQUEST,
    want_writes = [] // None
);

test_write_handler!(
    unknown_bucket,
    query_string = "?org=bananas&bucket=nope",
    body = "platanos val=42i".as_bytes(),
    writer_return = [Ok(())],
    want_result = Err(Error::Write(WriteError::TenantResolution(TenantError::Bucket { .. }))),
    want_status = StatusCode::NOT_FOUND,
    want_writes = [] // None
);

test_write_handler!(
    invalid_precision,
    query_string = "?org=bananas&bucket=test&precision=xs",
    body = "platanos val=42i".as_bytes(),
    writer_return = [Ok(())],
    want_result = Err(Error::Write(WriteError::InvalidPrecision(_))),
    want_status = StatusCode::BAD_REQUEST,
    want_writes = [] // None
);

test_write_handler!(
    invalid_line_protocol,
    query_string = "?org=bananas&bucket=test",
    body = "not line protocol".as_bytes(),
    writer_return = [Ok(())],
    want_result = Err(Error::Write(WriteError::Decode(DecodeError::ParseFailed { .. }))),
    want_status = StatusCode::BAD_REQUEST,
    want_writes = [] // None
);

test_write_handler!(
    non_utf8_body,
    query_string = "?org=bananas&bucket=test",
    body = vec![0xc3, 0x28],
    writer_return = [Ok(())],
    want_result = Err(Error::Write(WriteError::Decode(DecodeError::NonUtf8Body(_)))),
    want_status = StatusCode::BAD_REQUEST,
    want_writes = [] // None
);

test_write_handler!(
    max_request_size_truncation,
    query_string = "?org=bananas&bucket=test",
    body = {
        // Generate a LP string in the form of:
        //
        //  bananas,A=AAAAAAAAAA(repeated)... B=42
        //                                  ^
        //                                  |
        //                         MAX_BYTES boundary
        //
        // So that reading MAX_BYTES number of bytes produces the string:
        //
        //  bananas,A=AAAAAAAAAA(repeated)...
        //
        // Effectively trimming off the " B=42" suffix.
        let body = "bananas,A=";
        iter::once(body)
            .chain(iter::repeat_n("A", MAX_BYTES - body.len()))
            .chain(iter::once(" B=42\n"))
            .flat_map(|s| s.bytes())
            .collect::<Vec<u8>>()
    },
    writer_return = [Ok(())],
    want_result = Err(
        Error::RequestSizeExceeded(MAX_BYTES)
            | Error::Write(WriteError::Decode(DecodeError::RequestSizeExceeded(MAX_BYTES)))
    ),
    want_status = StatusCode::PAYLOAD_TOO_LARGE,
    want_writes = [] // None
);

test_write_handler!(
    writer_error,
    query_string = "?org=bananas&bucket=test",
    body = "platanos,tag1=A,tag2=B val=42i 123456".as_bytes(),
    writer_return = [Err(PointsWriterError::Internal("💣".into()))],
    want_result = Err(Error::Write(WriteError::Dispatch(PointsWriterError::Internal(_)))),
    want_status = StatusCode::INTERNAL_SERVER_ERROR,
    want_writes = [MockPointsWriterCall { .. }]
);

test_write_handler!(
    field_type_conflict,
    query_string = "?org=bananas&bucket=test",
    body = "platanos val=42i".as_bytes(),
    writer_return = [Err(PointsWriterError::FieldTypeConflict {
        series: "platanos".to_string(),
        field: "val".to_string(),
        existing: BlockType::Float,
        attempted: BlockType::Integer,
    })],
    want_result = Err(Error::Write(WriteError::Dispatch(PointsWriterError::FieldTypeConflict { .. }))),
    want_status = StatusCode::BAD_REQUEST,
    want_writes = [_]
);

#[tokio::test]
async fn v1_write_path() {
    let writer = Arc::new(MockPointsWriter::default());
    let f = Fixture::new(Arc::clone(&writer) as _);

    let got = f
        .delegate
        .route(post(
            "https://bananas.example/write?db=mydb&rp=autogen&precision=s",
            "platanos val=1i 2",
        ))
        .await
        .unwrap();
    assert_eq!(got.status(), StatusCode::NO_CONTENT);
    assert_matches!(writer.calls().as_slice(), [MockPointsWriterCall { points, .. }] => {
        assert_eq!(points[0].timestamp, 2_000_000_000);
    });
}

#[tokio::test]
async fn not_found() {
    let f = Fixture::new(Arc::new(MockPointsWriter::default()));

    let req = Request::builder()
        .uri("https://bananas.example/wat")
        .body(Body::empty())
        .unwrap();
    assert_matches!(f.delegate.route(req).await, Err(Error::NoHandler));

    let req = Request::builder()
        .uri("https://bananas.example/api/v2/write?org=bananas&bucket=test")
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let resp = f.delegate.handle(req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        json_body(resp).await,
        serde_json::json!({"code": "not found", "message": "not found"})
    );
}

#[tokio::test]
async fn health() {
    let f = Fixture::new(Arc::new(MockPointsWriter::default()));

    let req = Request::builder()
        .uri("https://bananas.example/health")
        .body(Body::empty())
        .unwrap();
    let resp = f.delegate.route(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "pass");
}

#[tokio::test]
async fn error_body_format() {
    let f = Fixture::new(Arc::new(MockPointsWriter::default()));

    let resp = f
        .delegate
        .handle(post("https://bananas.example/api/v2/write?bucket=test", "m v=1i"))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(resp).await,
        serde_json::json!({
            "code": "invalid",
            "message": "failed to resolve tenant: missing org or org_id parameter",
        })
    );

    let resp = f
        .delegate
        .handle(post(
            "https://bananas.example/api/v2/write?org=bananas&bucket=test",
            vec![b'#'; MAX_BYTES + 1],
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(resp).await["code"], "request too large");
}

#[tokio::test]
async fn unsupported_content_encoding() {
    let f = Fixture::new(Arc::new(MockPointsWriter::default()));

    let mut req = post("https://bananas.example/api/v2/write?org=bananas&bucket=test", "m v=1i");
    req.headers_mut()
        .insert(CONTENT_ENCODING, HeaderValue::from_static("br"));

    let err = f.delegate.route(req).await.unwrap_err();
    assert_matches!(
        &err,
        Error::Write(WriteError::Decode(DecodeError::InvalidContentEncoding(v))) => {
            assert_eq!(v, "br");
        }
    );
    assert_eq!(err.as_status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_gzip() {
    let writer = Arc::new(MockPointsWriter::default());
    let f = Fixture::new(Arc::clone(&writer) as _);

    let mut req = post(
        "https://bananas.example/api/v2/write?org=bananas&bucket=test",
        "not gzip",
    );
    req.headers_mut()
        .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));

    assert_matches!(
        f.delegate.route(req).await,
        Err(Error::Write(WriteError::Decode(DecodeError::InvalidGzip(_))))
    );
    assert!(writer.calls().is_empty());
}

#[test_log::test(tokio::test)]
async fn write_timeout_cancels_lookups() {
    let writer = Arc::new(MockPointsWriter::default());
    let f = Fixture::with_timeout(Arc::clone(&writer) as _, Duration::from_millis(10));
    f.dir.set_latency(Some(Duration::from_secs(60)));

    let err = f
        .delegate
        .route(post(
            "https://bananas.example/api/v2/write?org=bananas&bucket=test",
            "m v=1i",
        ))
        .await
        .unwrap_err();
    assert!(matches!(&err, Error::Write(e) if e.is_cancelled()));
    assert_eq!(err.code(), ErrorCode::Unavailable);
    assert_eq!(err.as_status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(writer.calls().is_empty());
}

#[test_log::test(tokio::test)]
async fn write_timeout_bounds_body_read() {
    let writer = Arc::new(MockPointsWriter::default());
    let f = Fixture::with_timeout(Arc::clone(&writer) as _, Duration::from_millis(10));

    // Send one chunk and then stall without finishing the body.
    let (mut tx, body) = Body::channel();
    tx.send_data("m v=1i\n".into()).await.unwrap();

    let err = f
        .delegate
        .route(post(
            "https://bananas.example/api/v2/write?org=bananas&bucket=test",
            body,
        ))
        .await
        .unwrap_err();
    assert_matches!(&err, Error::Write(WriteError::Cancelled));
    assert_eq!(err.as_status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(writer.calls().is_empty());
    assert_eq!(f.dir.lookup_count(Lookup::Organization), 0);
    drop(tx);
}

#[tokio::test]
async fn shutdown_cancels_writes() {
    let writer = Arc::new(MockPointsWriter::default());
    let shutdown = CancellationToken::new();
    let Fixture { dir, delegate, .. } = Fixture::new(Arc::clone(&writer) as _);
    let delegate = delegate.with_shutdown(shutdown.clone());
    dir.set_latency(Some(Duration::from_secs(60)));
    shutdown.cancel();

    let err = delegate
        .route(post(
            "https://bananas.example/api/v2/write?org=bananas&bucket=test",
            "m v=1i",
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unavailable);
    assert!(writer.calls().is_empty());
}

#[tokio::test]
async fn end_to_end_block_store() {
    const URI: &str = "https://bananas.example/api/v2/write?org=bananas&bucket=test";

    let store = Arc::new(BlockStore::new());
    let f = Fixture::new(Arc::clone(&store) as _);

    for body in [
        "cpu,host=a usage=0.5 2\ncpu,host=a usage=0.25 1",
        "cpu,host=a usage=1.0 3",
    ] {
        let resp = f.delegate.handle(post(URI, body)).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    let key = BlockKey {
        org_id: f.org.id,
        bucket_id: f.bucket.id,
        series: "cpu,host=a".to_string(),
        field: "usage".to_string(),
    };
    let mut cursor = store.cursor::<f64>(&key).unwrap();
    let mut samples = vec![];
    while let Some(block) = cursor.next_block() {
        samples.extend(block.unwrap().iter().map(|(ts, v)| (ts, *v)));
    }
    assert_eq!(samples, vec![(1, 0.25), (2, 0.5), (3, 1.0)]);

    let resp = f.delegate.handle(post(URI, "cpu,host=a usage=1i 4")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["code"], "invalid");
}
