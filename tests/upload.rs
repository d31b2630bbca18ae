mod common;

use common::{fixture, ntriples, quad, NQ, NT};
use quadgate::action::RequestDescriptor;
use quadgate::memory::Capability;
use quadgate::response::ResponseSink;

const BOUNDARY: &str = "XyZzY";

fn form(parts: &[(&str, Option<&str>, &str)]) -> String {
    let mut body = String::new();
    for (file_name, content_type, data) in parts {
        body.push_str(&format!("--{BOUNDARY}\r\n"));
        body.push_str(&format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n"
        ));
        if let Some(ct) = content_type {
            body.push_str(&format!("Content-Type: {ct}\r\n"));
        }
        body.push_str("\r\n");
        body.push_str(data);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body
}

fn multipart(path: &str, body: String) -> RequestDescriptor {
    RequestDescriptor::post(path)
        .with_content_type(&format!("multipart/form-data; boundary={BOUNDARY}"))
        .with_body_bytes(body)
}

#[test]
fn form_upload_of_several_files_into_the_dataset() {
    for capability in [Capability::Full, Capability::NoAbort, Capability::NonTransactional] {
        let fx = fixture(capability);
        let quads = "<http://example/s> <http://example/p> \"q\" <http://example/h> .\n";
        let body = form(&[
            ("a.nt", Some(NT), &ntriples("http://example/s", 2, "a")),
            ("b.nq", Some(NQ), quads),
        ]);
        let res = fx.send(multipart("/ds/upload", body));
        assert_eq!(res.status().as_u16(), 200, "{capability:?}: {}", res.body_text());
        let outcome: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(outcome["tripleCount"], 2);
        assert_eq!(outcome["quadCount"], 1);
        assert_eq!(fx.store.contents().default_graph().len(), 2);
        assert_eq!(fx.graph("http://example/h").len(), 1);
    }
}

#[test]
fn form_upload_into_a_named_graph_merges() {
    let fx = fixture(Capability::Full);
    fx.store.load([quad(Some("http://example/g"), "http://example/s", "kept")]).unwrap();
    let body = form(&[("data.nt", Some(NT), &ntriples("http://example/s", 3, "new"))]);
    let res = fx.send(multipart("/ds/upload?graph=http://example/g", body));
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(fx.graph("http://example/g").len(), 4);
}

#[test]
fn generic_part_types_fall_back_to_the_file_extension() {
    let fx = fixture(Capability::Full);
    let body = form(&[
        ("one.nt", Some("application/octet-stream"), &ntriples("http://example/s", 1, "x")),
        ("two.NT", None, &ntriples("http://example/s", 1, "y")),
    ]);
    let res = fx.send(multipart("/ds/upload", body));
    assert_eq!(res.status().as_u16(), 200, "{}", res.body_text());
    assert_eq!(fx.quad_count(), 2);
}

#[test]
fn unrecognised_file_is_rejected_without_loading_anything() {
    for capability in [Capability::Full, Capability::NoAbort, Capability::NonTransactional] {
        let fx = fixture(capability);
        let body = form(&[
            ("good.nt", Some(NT), &ntriples("http://example/s", 1, "x")),
            ("mystery.bin", None, "???"),
        ]);
        let res = fx.send(multipart("/ds/upload", body));
        assert_eq!(res.status().as_u16(), 400, "{capability:?}");
        assert_eq!(fx.quad_count(), 0, "{capability:?}");
    }
}

#[test]
fn broken_second_file_leaves_the_dataset_unchanged() {
    for capability in [Capability::Full, Capability::NoAbort, Capability::NonTransactional] {
        let fx = fixture(capability);
        let body = form(&[
            ("good.nt", Some(NT), &ntriples("http://example/s", 3, "x")),
            ("bad.nt", Some(NT), "<http://example/s> oops .\n"),
        ]);
        let res = fx.send(multipart("/ds/upload", body));
        assert_eq!(res.status().as_u16(), 400, "{capability:?}");
        assert_eq!(fx.quad_count(), 0, "{capability:?}");
    }
}

#[test]
fn plain_body_upload() {
    let fx = fixture(Capability::Full);
    let res = fx.send(
        RequestDescriptor::post("/ds/upload")
            .with_content_type(NT)
            .with_body_bytes(ntriples("http://example/s", 2, "x")),
    );
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(fx.quad_count(), 2);
}

#[test]
fn content_type_problems() {
    let fx = fixture(Capability::Full);

    let res = fx.send(RequestDescriptor::post("/ds/upload").with_body_bytes("x"));
    assert_eq!(res.status().as_u16(), 400, "no content type");

    let res = fx.send(
        RequestDescriptor::post("/ds/upload")
            .with_content_type("application/x-unknown")
            .with_body_bytes("x"),
    );
    assert_eq!(res.status().as_u16(), 400, "unknown content type");

    let res = fx.send(
        RequestDescriptor::post("/ds/upload")
            .with_content_type("multipart/mixed; boundary=abc")
            .with_body_bytes("x"),
    );
    assert_eq!(res.status().as_u16(), 415, "not form data");

    let res = fx.send(
        RequestDescriptor::post("/ds/upload")
            .with_content_type("multipart/form-data")
            .with_body_bytes("x"),
    );
    assert_eq!(res.status().as_u16(), 400, "no boundary");

    let res = fx.send(RequestDescriptor::post("/ds/upload").with_content_type(NT));
    assert_eq!(res.status().as_u16(), 400, "empty body");

    assert_eq!(fx.quad_count(), 0);
}

#[test]
fn upload_errors_are_counted() {
    let fx = fixture(Capability::Full);
    let res = fx.send(
        RequestDescriptor::post("/ds/upload")
            .with_content_type(NT)
            .with_body_bytes("not rdf\n"),
    );
    assert_eq!(res.status().as_u16(), 400);
    let endpoint = fx.dataset().endpoints_named("upload")[0];
    assert_eq!(
        endpoint.counters().value(quadgate::counters::CounterName::UploadErrors),
        Some(1)
    );
}
