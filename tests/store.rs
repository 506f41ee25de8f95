use std::fs;
use std::path::PathBuf;

use buckstore::api::request::{OpKind, Request, dispatch, dispatch_json};
use buckstore::codec::record as codec;
use buckstore::core::config::Config;
use buckstore::core::error::Result;
use buckstore::core::types::Record;
use buckstore::query::predicate::Predicate;
use buckstore::store::record_store::RecordStore;

fn open_store(dir: &tempfile::TempDir, bucket_capacity: usize) -> RecordStore {
    RecordStore::open(Config {
        data_dir: dir.path().to_path_buf(),
        bucket_capacity,
        ..Config::default()
    })
    .unwrap()
}

fn person(id: &str, name: &str) -> Record {
    Record::with_fields(vec![
        ("id".to_string(), id.to_string()),
        ("name".to_string(), name.to_string()),
    ])
}

fn collection_file(dir: &tempfile::TempDir, collection: &str) -> PathBuf {
    dir.path().join(collection)
}

fn read_all(store: &RecordStore, collection: &str, predicate: &Predicate) -> Vec<Record> {
    store
        .read(collection, predicate)
        .unwrap()
        .collect::<Result<Vec<Record>>>()
        .unwrap()
}

#[test]
fn worked_example() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, 4096);

    let report = store
        .create("person", vec![person("1", "Ann"), person("2", "Bo")])
        .unwrap();
    assert_eq!((report.committed, report.skipped), (2, 0));

    let by_id = Predicate::empty().equals("id", "1");
    assert_eq!(read_all(&store, "person", &by_id), vec![person("1", "Ann")]);

    let report = store.create("person", vec![person("1", "Ann")]).unwrap();
    assert_eq!((report.committed, report.skipped), (0, 1));

    let report = store.delete("person", vec![person("2", "Bo")]).unwrap();
    assert_eq!((report.committed, report.skipped), (1, 0));

    assert_eq!(
        read_all(&store, "person", &Predicate::empty()),
        vec![person("1", "Ann")]
    );
}

#[test]
fn duplicate_keys_within_one_batch_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, 4096);

    let report = store
        .create("person", vec![person("1", "Ann"), person("1", "Ann")])
        .unwrap();
    assert_eq!((report.committed, report.skipped), (1, 1));
    assert_eq!(
        read_all(&store, "person", &Predicate::empty()),
        vec![person("1", "Ann")]
    );
}

#[test]
fn modify_of_absent_key_leaves_bytes_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, 4096);
    store.create("person", vec![person("1", "Ann")]).unwrap();

    let before = fs::read(collection_file(&dir, "person")).unwrap();
    let report = store.modify("person", vec![person("9", "Zed")]).unwrap();
    assert_eq!((report.committed, report.skipped), (0, 1));
    assert_eq!(fs::read(collection_file(&dir, "person")).unwrap(), before);
}

#[test]
fn modify_with_equal_length_rewrites_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, 4096);
    store
        .create("person", vec![person("1", "Ann"), person("2", "Bo")])
        .unwrap();
    let len_before = fs::metadata(collection_file(&dir, "person")).unwrap().len();

    // "Ann" and "Joe" serialize to the same length
    let report = store.modify("person", vec![person("1", "Joe")]).unwrap();
    assert_eq!((report.committed, report.skipped), (1, 0));
    assert_eq!(
        fs::metadata(collection_file(&dir, "person")).unwrap().len(),
        len_before
    );
    // in-place: file order is unchanged
    assert_eq!(
        read_all(&store, "person", &Predicate::empty()),
        vec![person("1", "Joe"), person("2", "Bo")]
    );
}

#[test]
fn modify_with_different_length_moves_the_record_to_the_tail() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, 4096);
    store
        .create("person", vec![person("1", "Ann"), person("2", "Bo")])
        .unwrap();

    let old_len = fs::metadata(collection_file(&dir, "person")).unwrap().len();
    let old_record_len = codec::serialize(&person("1", "Ann")).len() as u64;
    let new_record_len = codec::serialize(&person("1", "Annabelle")).len() as u64;

    let report = store
        .modify("person", vec![person("1", "Annabelle")])
        .unwrap();
    assert_eq!((report.committed, report.skipped), (1, 0));
    assert_eq!(
        fs::metadata(collection_file(&dir, "person")).unwrap().len(),
        old_len - old_record_len + new_record_len
    );
    assert_eq!(
        read_all(&store, "person", &Predicate::empty().equals("id", "1")),
        vec![person("1", "Annabelle")]
    );
    // delete-then-reinsert: the rewritten record now sits at the tail
    assert_eq!(
        read_all(&store, "person", &Predicate::empty()),
        vec![person("2", "Bo"), person("1", "Annabelle")]
    );
}

#[test]
fn read_returns_matches_in_file_order_across_buckets() {
    let dir = tempfile::tempdir().unwrap();
    // tiny buckets so eight records span several of them
    let store = open_store(&dir, 48);

    let ids = ["01", "02", "03", "04", "05", "06", "07", "08"];
    let records: Vec<Record> = ids.iter().map(|id| person(id, "row")).collect();
    let report = store.create("person", records.clone()).unwrap();
    assert_eq!(report.committed, 8);

    assert_eq!(read_all(&store, "person", &Predicate::empty()), records);
    assert_eq!(
        read_all(&store, "person", &Predicate::empty().equals("id", "05")),
        vec![person("05", "row")]
    );
    assert!(store.stats("person").unwrap().bucket_count > 1);
}

#[test]
fn delete_decreases_file_length_by_exactly_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, 48);
    store
        .create(
            "person",
            vec![person("1", "Ann"), person("2", "Bo"), person("3", "Cy")],
        )
        .unwrap();

    let len_before = fs::metadata(collection_file(&dir, "person")).unwrap().len();
    let victim_len = codec::serialize(&person("2", "Bo")).len() as u64;

    let report = store.delete("person", vec![person("2", "Bo")]).unwrap();
    assert_eq!((report.committed, report.skipped), (1, 0));
    assert_eq!(
        fs::metadata(collection_file(&dir, "person")).unwrap().len(),
        len_before - victim_len
    );
    // every remaining record is still individually parseable, in order
    assert_eq!(
        read_all(&store, "person", &Predicate::empty()),
        vec![person("1", "Ann"), person("3", "Cy")]
    );
}

#[test]
fn delete_matches_whole_records_not_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, 4096);
    store.create("person", vec![person("1", "Ann")]).unwrap();

    // same key, different fields: no match, no change
    let report = store.delete("person", vec![person("1", "Bo")]).unwrap();
    assert_eq!((report.committed, report.skipped), (0, 1));
    assert_eq!(
        read_all(&store, "person", &Predicate::empty()),
        vec![person("1", "Ann")]
    );

    // field order differs, fields are equal: matches
    let reordered = Record::with_fields(vec![
        ("name".to_string(), "Ann".to_string()),
        ("id".to_string(), "1".to_string()),
    ]);
    let report = store.delete("person", vec![reordered]).unwrap();
    assert_eq!((report.committed, report.skipped), (1, 0));
}

#[test]
fn pattern_predicates_filter_without_implicit_anchors() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, 4096);
    let records: Vec<Record> = (1..=9).map(|i| person(&i.to_string(), "row")).collect();
    store.create("person", records).unwrap();

    let over_five = store.predicate("id: ^[6-9][0-9]*$").unwrap();
    let matched = read_all(&store, "person", &over_five);
    let ids: Vec<&str> = matched.iter().filter_map(|r| r.get("id")).collect();
    assert_eq!(ids, vec!["6", "7", "8", "9"]);
}

#[test]
fn reads_on_a_missing_collection_are_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, 4096);
    assert!(read_all(&store, "ghost", &Predicate::empty()).is_empty());
}

#[test]
fn operations_on_other_collections_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, 4096);
    store.create("person", vec![person("1", "Ann")]).unwrap();
    store.create("order", vec![person("1", "Widget")]).unwrap();

    store.delete("order", vec![person("1", "Widget")]).unwrap();
    assert_eq!(
        read_all(&store, "person", &Predicate::empty()),
        vec![person("1", "Ann")]
    );
    assert!(read_all(&store, "order", &Predicate::empty()).is_empty());
}

#[test]
fn reopened_store_rebuilds_the_index_from_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let records: Vec<Record> = (0..20)
        .map(|i| person(&format!("{i:02}"), "row"))
        .collect();
    {
        let store = open_store(&dir, 64);
        store.create("person", records.clone()).unwrap();
    }

    let store = open_store(&dir, 64);
    assert_eq!(read_all(&store, "person", &Predicate::empty()), records);
    assert_eq!(
        read_all(&store, "person", &Predicate::empty().equals("id", "07")),
        vec![person("07", "row")]
    );
    let stats = store.stats("person").unwrap();
    assert_eq!(stats.record_count, 20);
    assert!(stats.bucket_count > 1);
}

#[test]
fn invalid_collection_names_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, 4096);
    let err = store
        .create("../escape", vec![person("1", "Ann")])
        .unwrap_err();
    assert_eq!(err.committed, 0);
    assert_eq!(
        err.source.kind,
        buckstore::core::error::ErrorKind::InvalidInput
    );
}

#[test]
fn dispatch_serves_the_four_operations() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, 4096);

    let reply = dispatch(
        &store,
        &Request {
            op: OpKind::Create,
            collection: "person".to_string(),
            records: Some("id: 1\nname: Ann\n\nid: 2\nname: Bo\n\n".to_string()),
            predicate: None,
        },
    );
    assert_eq!((reply.committed, reply.skipped), (2, 0));
    assert_eq!(reply.error, None);

    let reply = dispatch(
        &store,
        &Request {
            op: OpKind::Read,
            collection: "person".to_string(),
            records: None,
            predicate: Some("id: 1".to_string()),
        },
    );
    assert_eq!(reply.records, vec![person("1", "Ann")]);

    let reply = dispatch(
        &store,
        &Request {
            op: OpKind::Modify,
            collection: "person".to_string(),
            records: Some("id: 2\nname: Joe\n\n".to_string()),
            predicate: None,
        },
    );
    assert_eq!((reply.committed, reply.skipped), (1, 0));

    let reply = dispatch(
        &store,
        &Request {
            op: OpKind::Delete,
            collection: "person".to_string(),
            records: Some("id: 1\nname: Ann\n\n".to_string()),
            predicate: None,
        },
    );
    assert_eq!((reply.committed, reply.skipped), (1, 0));

    let reply = dispatch(
        &store,
        &Request {
            op: OpKind::Read,
            collection: "person".to_string(),
            records: None,
            predicate: None,
        },
    );
    assert_eq!(reply.records, vec![person("2", "Joe")]);
}

#[test]
fn dispatch_counts_malformed_payload_as_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, 4096);

    let reply = dispatch(
        &store,
        &Request {
            op: OpKind::Create,
            collection: "person".to_string(),
            records: Some("id: 1\nname: Ann\n\nthis is not a record\n\n".to_string()),
            predicate: None,
        },
    );
    assert_eq!((reply.committed, reply.skipped), (1, 1));
    assert_eq!(reply.error, None);
}

#[test]
fn dispatch_json_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, 4096);

    let reply = dispatch_json(
        &store,
        r#"{"op":"create","collection":"person","records":"id: 1\nname: Ann\n\n"}"#,
    );
    let parsed: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(parsed["committed"], 1);
    assert_eq!(parsed["skipped"], 0);

    let reply = dispatch_json(
        &store,
        r#"{"op":"read","collection":"person","predicate":"id: 1"}"#,
    );
    let parsed: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(parsed["records"][0]["fields"][0][1], "1");

    let reply = dispatch_json(&store, "not json at all");
    let parsed: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert!(
        parsed["error"]
            .as_str()
            .unwrap()
            .starts_with("unreadable request")
    );
}

#[test]
fn early_drop_of_a_scan_is_clean() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir, 48);
    let records: Vec<Record> = (0..12)
        .map(|i| person(&format!("{i:02}"), "row"))
        .collect();
    store.create("person", records).unwrap();

    let mut scan = store.read("person", &Predicate::empty()).unwrap();
    let first = scan.next().unwrap().unwrap();
    assert_eq!(first, person("00", "row"));
    drop(scan);

    // the store is still fully usable after an abandoned scan
    let report = store.create("person", vec![person("99", "new")]).unwrap();
    assert_eq!(report.committed, 1);
}
