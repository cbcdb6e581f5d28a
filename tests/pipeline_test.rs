// tests/pipeline_test.rs

//! Feed pipeline integration: unzip, parse, insert driven end to end
//! against a scaffolded feed directory, with manifest bookkeeping and
//! ingest retry behavior verified on disk.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use gridfeed::feed::{Feed, FeedManifest, Stage};
use gridfeed::observe::TracingObserver;
use rusqlite::Connection;

const REPORT_XML: &str = r#"<Report xmlns="urn:example:report">
  <Header><Source>OASIS</Source></Header>
  <Payload>
    <Item><opr_date>2018-02-24</opr_date><value>2426.9</value></Item>
    <Item><opr_date>2018-02-25</opr_date><value>3.5</value></Item>
  </Payload>
</Report>"#;

fn sample_manifest(name: &str) -> FeedManifest {
    FeedManifest {
        name: name.to_string(),
        url: "http://example.com/zip?start=_START_&end=_END_".to_string(),
        start_date: [2018, 2, 24],
        download_delay_secs: 0,
        xml_namespace: "urn:example:report".to_string(),
        pk_exclusions: vec!["value".to_string()],
    }
}

fn make_feed(root: &Path, name: &str) -> Feed {
    let feed = Feed::new(root, name);
    feed.create(&sample_manifest(name)).unwrap();
    feed
}

fn make_zip(dir: &Path, zip_name: &str, items: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(zip_name);
    let file = File::create(&path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, contents) in items {
        writer
            .start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
    path
}

fn db_row_count(db: &Path, table: &str) -> i64 {
    let conn = Connection::open(db).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn unzip_parse_insert_lands_rows() {
    let root = tempfile::tempdir().unwrap();
    let feed = make_feed(root.path(), "caiso_sample");
    make_zip(
        &feed.stage_dir(Stage::Download),
        "day1.zip",
        &[("report_day1.xml", REPORT_XML)],
    );

    let outcomes = feed
        .run(&[Stage::Unzip, Stage::Parse, Stage::Insert], &TracingObserver)
        .unwrap();
    assert_eq!(outcomes.len(), 3);
    for (_, outcome) in &outcomes {
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.failed, 0);
    }

    assert!(feed.stage_dir(Stage::Unzip).join("report_day1.xml").is_file());
    assert!(feed.stage_dir(Stage::Parse).join("report_day1.sql").is_file());

    let db = feed.stage_dir(Stage::Insert).join("caiso_sample_00.db");
    assert!(db.is_file());
    assert_eq!(db_row_count(&db, "item"), 2);
    assert_eq!(db_row_count(&db, "header"), 1);

    // every stage manifest recorded its input
    for (stage, entry) in [
        (Stage::Unzip, "day1.zip"),
        (Stage::Parse, "report_day1.xml"),
        (Stage::Insert, "report_day1.sql"),
    ] {
        let manifest = fs::read_to_string(feed.stage_manifest_path(stage)).unwrap();
        assert_eq!(manifest, format!("{entry}\n"), "stage {stage:?}");
    }
}

#[test]
fn second_run_changes_nothing() {
    let root = tempfile::tempdir().unwrap();
    let feed = make_feed(root.path(), "f");
    make_zip(
        &feed.stage_dir(Stage::Download),
        "day1.zip",
        &[("r.xml", REPORT_XML)],
    );

    let stages = [Stage::Unzip, Stage::Parse, Stage::Insert];
    feed.run(&stages, &TracingObserver).unwrap();

    let db = feed.stage_dir(Stage::Insert).join("f_00.db");
    let rows_before = db_row_count(&db, "item");
    let manifests_before: Vec<String> = stages
        .iter()
        .map(|s| fs::read_to_string(feed.stage_manifest_path(*s)).unwrap())
        .collect();

    let outcomes = feed.run(&stages, &TracingObserver).unwrap();
    for (_, outcome) in &outcomes {
        assert_eq!(outcome.processed, 0);
        assert_eq!(outcome.skipped, 1);
    }

    assert_eq!(db_row_count(&db, "item"), rows_before);
    let manifests_after: Vec<String> = stages
        .iter()
        .map(|s| fs::read_to_string(feed.stage_manifest_path(*s)).unwrap())
        .collect();
    assert_eq!(manifests_before, manifests_after);
}

#[test]
fn corrupt_database_is_retried_at_next_depth() {
    let root = tempfile::tempdir().unwrap();
    let feed = make_feed(root.path(), "f");
    fs::write(
        feed.stage_dir(Stage::Unzip).join("r.xml"),
        REPORT_XML,
    )
    .unwrap();
    // depth-0 database is not SQLite at all
    fs::write(feed.stage_dir(Stage::Insert).join("f_00.db"), "garbage").unwrap();

    feed.run(&[Stage::Parse, Stage::Insert], &TracingObserver)
        .unwrap();

    let retry_db = feed.stage_dir(Stage::Insert).join("f_01.db");
    assert!(retry_db.is_file());
    assert_eq!(db_row_count(&retry_db, "item"), 2);

    // recorded exactly once despite the retry
    let manifest = fs::read_to_string(feed.stage_manifest_path(Stage::Insert)).unwrap();
    assert_eq!(manifest, "r.sql\n");
}

#[test]
fn bad_xml_is_skipped_and_rest_continues() {
    let root = tempfile::tempdir().unwrap();
    let feed = make_feed(root.path(), "f");
    fs::write(feed.stage_dir(Stage::Unzip).join("bad.xml"), "<r><oops></r>").unwrap();
    fs::write(feed.stage_dir(Stage::Unzip).join("good.xml"), REPORT_XML).unwrap();

    let outcomes = feed
        .run(&[Stage::Parse], &TracingObserver)
        .unwrap();
    assert_eq!(outcomes[0].1.processed, 1);
    assert_eq!(outcomes[0].1.failed, 1);

    let manifest = fs::read_to_string(feed.stage_manifest_path(Stage::Parse)).unwrap();
    assert_eq!(manifest, "good.xml\n");
    assert!(feed.stage_dir(Stage::Parse).join("good.sql").is_file());
    assert!(!feed.stage_dir(Stage::Parse).join("bad.sql").exists());

    // the failed file is picked up once it is fixed
    fs::write(feed.stage_dir(Stage::Unzip).join("bad.xml"), REPORT_XML).unwrap();
    let outcomes = feed.run(&[Stage::Parse], &TracingObserver).unwrap();
    assert_eq!(outcomes[0].1.processed, 1);
}

#[test]
fn partially_extracted_archive_completes() {
    let root = tempfile::tempdir().unwrap();
    let feed = make_feed(root.path(), "f");
    make_zip(
        &feed.stage_dir(Stage::Download),
        "two.zip",
        &[("a.xml", REPORT_XML), ("b.xml", REPORT_XML)],
    );
    // a.xml was extracted by an interrupted earlier run
    fs::write(feed.stage_dir(Stage::Unzip).join("a.xml"), "partial").unwrap();

    feed.run(&[Stage::Unzip], &TracingObserver).unwrap();

    // existing item untouched, missing item extracted
    assert_eq!(
        fs::read_to_string(feed.stage_dir(Stage::Unzip).join("a.xml")).unwrap(),
        "partial"
    );
    assert_eq!(
        fs::read_to_string(feed.stage_dir(Stage::Unzip).join("b.xml")).unwrap(),
        REPORT_XML
    );
}
