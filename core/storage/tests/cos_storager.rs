use std::io::Cursor;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use tokio::io::AsyncReadExt;

use polystore_storage::cos::{self, MemoryConnector};
use polystore_storage::pairs::{
    with_checksum, with_credential, with_dir_func, with_file_func, with_location, with_name,
    with_object_func, with_offset, with_read_callback_func, with_size, with_storager_func,
    with_work_dir,
};
use polystore_storage::{
    Context, Copier, Error, ErrorCategory, Mover, Object, ObjectType, Op, Provider, Reader,
    Servicer, Storager,
};

const BUCKET: &str = "photos-1250000000";
const REGION: &str = "ap-guangzhou";

fn connector() -> MemoryConnector {
    MemoryConnector::new().with_bucket(BUCKET, REGION).unwrap()
}

fn open(connector: &MemoryConnector, work_dir: &str) -> (cos::Service, cos::Storage) {
    cos::new(
        Arc::new(connector.clone()),
        vec![
            with_credential(Provider::hmac("id", "key")),
            with_name(BUCKET),
            with_location(REGION),
            with_work_dir(work_dir),
        ],
    )
    .unwrap()
}

fn body(data: &[u8]) -> Reader {
    Box::new(Cursor::new(data.to_vec()))
}

async fn put(s: &cos::Storage, path: &str, data: &[u8]) {
    s.write(path, body(data), vec![with_size(data.len() as u64)])
        .await
        .unwrap();
}

async fn read(s: &cos::Storage, path: &str, pairs: Vec<polystore_storage::Pair>) -> String {
    let mut r = s.read(path, pairs).await.unwrap();
    let mut out = String::new();
    r.read_to_string(&mut out).await.unwrap();
    out
}

fn collector() -> (Arc<Mutex<Vec<Object>>>, impl FnMut(Object) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |o| sink.lock().unwrap().push(o))
}

#[tokio::test]
async fn test_write_stat_read() {
    let c = connector();
    let (_, s) = open(&c, "/backup/");

    put(&s, "a.txt", b"0123456789").await;

    let o = s.stat("a.txt", vec![]).await.unwrap();
    assert_eq!(o.id, "backup/a.txt");
    assert_eq!(o.name, "a.txt");
    assert_eq!(o.object_type, ObjectType::File);
    assert_eq!(o.size, 10);
    assert!(o.updated_at.is_some());
    assert_eq!(o.meta.content_type(), Some("application/octet-stream"));
    assert!(o.meta.etag().is_some());
    assert_eq!(cos::storage_class(&o.meta), Some("STANDARD"));

    assert_eq!(read(&s, "a.txt", vec![]).await, "0123456789");
    assert_eq!(read(&s, "a.txt", vec![with_offset(3)]).await, "3456789");
    assert_eq!(read(&s, "a.txt", vec![with_size(4)]).await, "0123");
    assert_eq!(
        read(&s, "a.txt", vec![with_offset(2), with_size(3)]).await,
        "234"
    );
    assert_eq!(read(&s, "a.txt", vec![with_size(0)]).await, "");
}

#[tokio::test]
async fn test_write_requires_size() {
    let c = connector();
    let (_, s) = open(&c, "/");

    let err = s.write("a", body(b"abc"), vec![]).await.unwrap_err();
    assert_eq!(err.op, Op::Write);
    assert_eq!(err.category(), ErrorCategory::Option);
    assert!(matches!(err.error(), Error::PairRequired("size")));
}

#[tokio::test]
async fn test_write_short_body_fails() {
    let c = connector();
    let (_, s) = open(&c, "/");

    let err = s
        .write("a", body(b"abc"), vec![with_size(10)])
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Backend);
    assert!(s.stat("a", vec![]).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_write_callback_observes_bytes() {
    let c = connector();
    let (_, s) = open(&c, "/");

    let total = Arc::new(Mutex::new(0usize));
    let counter = total.clone();
    s.write(
        "big",
        body(&vec![3u8; 70_000]),
        vec![
            with_size(70_000),
            with_read_callback_func(move |chunk| *counter.lock().unwrap() += chunk.len()),
        ],
    )
    .await
    .unwrap();

    assert_eq!(*total.lock().unwrap(), 70_000);
    assert_eq!(s.stat("big", vec![]).await.unwrap().size, 70_000);
}

#[tokio::test]
async fn test_write_with_storage_class_and_checksum() {
    let c = connector();
    let (_, s) = open(&c, "/");

    s.write(
        "cold",
        body(b"zz"),
        vec![
            with_size(2),
            with_checksum("md5"),
            cos::with_storage_class("ARCHIVE"),
        ],
    )
    .await
    .unwrap();

    let o = s.stat("cold", vec![]).await.unwrap();
    assert_eq!(cos::storage_class(&o.meta), Some("ARCHIVE"));
}

#[tokio::test]
async fn test_unsupported_pair_rejected_before_backend() {
    let c = connector();
    let (_, s) = open(&c, "/");

    let err = s
        .list_dir("", vec![with_object_func(|_| {})])
        .await
        .unwrap_err();
    assert!(matches!(err.error(), Error::PairUnsupported("object_func")));
    assert_eq!(c.list_requests().unwrap(), 0);
}

#[tokio::test]
async fn test_stat_missing_is_not_found() {
    let c = connector();
    let (_, s) = open(&c, "/");

    let err = s.stat("nope", vec![]).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.op, Op::Stat);
    assert_eq!(err.path, vec!["nope".to_string()]);
    assert!(err.backend.contains(BUCKET));
}

#[tokio::test]
async fn test_list_dir_paginates() {
    let c = connector();
    let (_, s) = open(&c, "/data/");

    for i in 0..450 {
        put(&s, &format!("f{:04}", i), b"x").await;
    }
    put(&s, "sub/inner", b"x").await;

    let (dirs, on_dir) = collector();
    let (files, on_file) = collector();
    s.list_dir("", vec![with_dir_func(on_dir), with_file_func(on_file)])
        .await
        .unwrap();

    let files = files.lock().unwrap();
    assert_eq!(files.len(), 450);
    assert_eq!(files[0].name, "f0000");
    assert_eq!(files[449].name, "f0449");
    assert!(files.iter().all(|o| o.id.starts_with("data/")));

    let dirs = dirs.lock().unwrap();
    assert_eq!(dirs.len(), 1);
    assert_eq!(dirs[0].name, "sub/");
    assert_eq!(dirs[0].object_type, ObjectType::Dir);

    // 451 entries at 200 per page.
    assert_eq!(c.list_requests().unwrap(), 3);
}

#[tokio::test]
async fn test_list_prefix_recurses() {
    let c = connector().with_max_page(2).unwrap();
    let (_, s) = open(&c, "/");

    for path in ["logs/a", "logs/b/c", "logs/b/d", "logs2/x", "other"] {
        put(&s, path, b"x").await;
    }

    let (seen, on_object) = collector();
    s.list_prefix("logs/", vec![with_object_func(on_object)])
        .await
        .unwrap();

    let names: Vec<_> = seen.lock().unwrap().iter().map(|o| o.name.clone()).collect();
    assert_eq!(names, vec!["logs/a", "logs/b/c", "logs/b/d"]);
}

#[tokio::test]
async fn test_delete() {
    let c = connector();
    let (_, s) = open(&c, "/");

    put(&s, "gone", b"x").await;
    s.delete("gone", vec![]).await.unwrap();
    assert!(s.stat("gone", vec![]).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_copy_and_move() {
    let c = connector();
    let (_, s) = open(&c, "/");
    put(&s, "src", b"payload").await;

    s.copier().unwrap().copy("src", "copy", vec![]).await.unwrap();
    assert_eq!(read(&s, "copy", vec![]).await, "payload");

    s.mover().unwrap().rename("src", "moved", vec![]).await.unwrap();
    assert_eq!(read(&s, "moved", vec![]).await, "payload");
    assert!(s.stat("src", vec![]).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_move_keeps_both_copies_when_delete_fails() {
    let c = connector();
    let (_, s) = open(&c, "/");
    put(&s, "src", b"payload").await;

    c.deny_deletes(true).unwrap();
    let err = s
        .mover()
        .unwrap()
        .rename("src", "dst", vec![])
        .await
        .unwrap_err();
    assert_eq!(err.op, Op::Move);
    assert_eq!(err.path, vec!["src".to_string(), "dst".to_string()]);

    assert_eq!(read(&s, "src", vec![]).await, "payload");
    assert_eq!(read(&s, "dst", vec![]).await, "payload");
}

#[tokio::test]
async fn test_cancelled_context() {
    let c = connector();
    let (_, s) = open(&c, "/");

    let ctx = Context::new();
    ctx.cancel();
    let err = s
        .list_dir_with_context(ctx, "", vec![])
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Cancellation);
    assert_eq!(c.list_requests().unwrap(), 0);
}

#[tokio::test]
async fn test_service_bucket_lifecycle() {
    let c = connector();
    let (service, _) = open(&c, "/");

    let created = service
        .create("logs-1250000000", vec![with_location("ap-beijing")])
        .await
        .unwrap();
    let meta = created.metadata(vec![]).await.unwrap();
    assert_eq!(meta.name, "logs-1250000000");
    assert_eq!(meta.meta.get("location").map(String::as_str), Some("ap-beijing"));

    let err = service
        .create("logs-1250000000", vec![with_location("ap-beijing")])
        .await
        .unwrap_err();
    assert_eq!(err.op, Op::ServiceCreate);

    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = names.clone();
    service
        .list(vec![with_storager_func(move |s| {
            sink.lock().unwrap().push(s.to_string())
        })])
        .await
        .unwrap();
    assert_eq!(names.lock().unwrap().len(), 2);

    let got = service
        .get(BUCKET, vec![with_location(REGION)])
        .await
        .unwrap();
    assert!(got.to_string().contains(BUCKET));

    service
        .delete("logs-1250000000", vec![with_location("ap-beijing")])
        .await
        .unwrap();
    let err = service
        .delete("logs-1250000000", vec![with_location("ap-beijing")])
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_service_ops_require_location() {
    let c = connector();
    let (service, _) = open(&c, "/");

    let err = service.get(BUCKET, vec![]).await.unwrap_err();
    assert!(matches!(err.error(), Error::PairRequired("location")));

    let err = service.list(vec![]).await.unwrap_err();
    assert!(matches!(err.error(), Error::PairRequired("storager_func")));
}

#[test]
fn test_unsupported_credential() {
    let err = cos::Service::new(
        Arc::new(connector()),
        vec![with_credential(Provider::api_key("k"))],
    )
    .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Config);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_listing_sees_every_key_once(count in 0usize..60, page in 1usize..7) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let names = rt.block_on(async {
            let c = connector().with_max_page(page).unwrap();
            let (_, s) = open(&c, "/");
            for i in 0..count {
                let path = if i % 3 == 0 {
                    format!("d{}/f", i)
                } else {
                    format!("f{:03}", i)
                };
                put(&s, &path, b"x").await;
            }

            let (seen, on_object) = collector();
            s.list_prefix("", vec![with_object_func(on_object)]).await.unwrap();
            let names: Vec<_> = seen.lock().unwrap().iter().map(|o| o.name.clone()).collect();
            names
        });

        prop_assert_eq!(names.len(), count);
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(sorted, names);
    }
}
