use anyhow::Result;
use places_ranker::apis::FixturePlaceSource;
use places_ranker::config::ConfigResolver;
use places_ranker::error::{LoadError, PipelineError, TransformError};
use places_ranker::pipeline::rank::{load_and_rank, RankSettings};
use places_ranker::pipeline::transform::{transform_file, TransformSettings};
use places_ranker::pipeline::{CrawlOptions, Pipeline, PipelineOptions};
use places_ranker::types::{PlaceSource, RankMode, RankedPlaceRow, RawPlaceRecord};
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write_raw(path: &Path, records: serde_json::Value) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(&records)?)?;
    Ok(())
}

fn read_ranked(path: &Path) -> Result<Vec<RankedPlaceRow>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in rdr.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

struct Artifacts {
    clean: PathBuf,
    db: PathBuf,
    ranked: PathBuf,
    top: PathBuf,
}

impl Artifacts {
    fn in_dir(dir: &Path) -> Self {
        Self {
            clean: dir.join("clean.csv"),
            db: dir.join("places.db"),
            ranked: dir.join("ranked.csv"),
            top: dir.join("top.csv"),
        }
    }
}

fn rank_settings(mode: RankMode) -> RankSettings {
    RankSettings::from_config(&ConfigResolver::defaults(), Some(mode), None).expect("default rank settings")
}

/// Transform + load + rank a raw payload, returning the ranked rows.
fn run_stages(dir: &Path, raw: serde_json::Value, mode: RankMode) -> Result<Vec<RankedPlaceRow>> {
    let raw_path = dir.join("raw.json");
    write_raw(&raw_path, raw)?;
    let out = Artifacts::in_dir(dir);
    transform_file(&raw_path, &out.clean, &TransformSettings::default())?;
    load_and_rank(&out.clean, &out.db, &out.ranked, &out.top, &rank_settings(mode))?;
    read_ranked(&out.ranked)
}

fn place(id: &str, rating: f64, reviews: u64, types: &str) -> serde_json::Value {
    json!({
        "place_id": id,
        "name": format!("Place {}", id),
        "rating": rating,
        "user_ratings_total": reviews,
        "types": types,
        "address": "1 Main St",
    })
}

#[test]
fn test_transform_is_idempotent() -> Result<()> {
    let dir = tempdir()?;
    let raw_path = dir.path().join("raw.json");
    write_raw(
        &raw_path,
        json!([
            {"place_id": "p1", "name": "A", "rating": 4.5, "user_ratings_total": 10,
             "geometry": {"lat": 10.77, "lng": 106.7}, "types": ["bar", "restaurant"]},
            {"place_id": "p2", "name": "B"}
        ]),
    )?;
    let clean = dir.path().join("clean.csv");

    let first = transform_file(&raw_path, &clean, &TransformSettings::default())?;
    let first_bytes = fs::read(&clean)?;
    let second = transform_file(&raw_path, &clean, &TransformSettings::default())?;
    let second_bytes = fs::read(&clean)?;

    assert_eq!(first.digest, second.digest);
    assert_eq!(first_bytes, second_bytes);
    Ok(())
}

#[test]
fn test_transform_keeps_every_record_and_applies_defaults() -> Result<()> {
    let dir = tempdir()?;
    let raw_path = dir.path().join("raw.json");
    write_raw(
        &raw_path,
        json!([
            {"place_id": "p1", "name": "A", "rating": 4.5, "user_ratings_total": 10},
            {"place_id": "p2"},
            {"place_id": "p3", "rating": null, "user_ratings_total": null}
        ]),
    )?;
    let clean = dir.path().join("clean.csv");
    let settings = TransformSettings {
        default_rating: 3.0,
        default_user_ratings_total: 7,
    };

    let outcome = transform_file(&raw_path, &clean, &settings)?;
    assert_eq!(outcome.records.len(), 3);
    assert_eq!(outcome.stats.missing_ratings, 2);
    assert_eq!(outcome.stats.missing_reviews, 2);

    let p2 = &outcome.records[1];
    assert_eq!(p2.rating, 3.0);
    assert_eq!(p2.user_ratings_total, 7);
    assert_eq!(p2.name, "Unknown");
    assert_eq!(p2.address, "Unknown");

    let lines = fs::read_to_string(&clean)?;
    // header plus one line per record
    assert_eq!(lines.lines().count(), 4);
    Ok(())
}

#[test]
fn test_missing_coordinates_are_empty_fields() -> Result<()> {
    let dir = tempdir()?;
    let raw_path = dir.path().join("raw.json");
    write_raw(
        &raw_path,
        json!([
            {"place_id": "p1", "name": "A", "geometry": {"lat": 1.5}},
            {"place_id": "p2", "name": "B", "geometry": {"location": {"lat": 10.0, "lng": 20.0}}}
        ]),
    )?;
    let clean = dir.path().join("clean.csv");
    transform_file(&raw_path, &clean, &TransformSettings::default())?;

    let mut rdr = csv::Reader::from_path(&clean)?;
    let rows: Vec<csv::StringRecord> = rdr.records().collect::<std::result::Result<_, _>>()?;
    assert_eq!(&rows[0][4], "");
    assert_eq!(&rows[0][5], "");
    assert_eq!(&rows[1][4], "10.0");
    assert_eq!(&rows[1][5], "20.0");
    Ok(())
}

#[test]
fn test_odd_reviews_and_names_do_not_fail_the_batch() -> Result<()> {
    let dir = tempdir()?;
    let raw_path = dir.path().join("raw.json");
    fs::write(
        &raw_path,
        r#"[{"place_id":"p1","name":"A","rating":4.5,"reviews":null},{"place_id":"p2","name":12345,"address":7}]"#,
    )?;
    let clean = dir.path().join("clean.csv");

    let outcome = transform_file(&raw_path, &clean, &TransformSettings::default())?;
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.records[0].name, "A");
    assert_eq!(outcome.records[1].name, "12345");
    assert_eq!(outcome.records[1].address, "7");
    Ok(())
}

#[test]
fn test_unreadable_raw_artifact_is_transform_error() -> Result<()> {
    let dir = tempdir()?;
    let raw_path = dir.path().join("raw.json");
    fs::write(&raw_path, "{ not json")?;

    let err = transform_file(&raw_path, &dir.path().join("clean.csv"), &TransformSettings::default())
        .unwrap_err();
    assert!(matches!(err, TransformError::InputUnreadable { .. }));
    assert!(!dir.path().join("clean.csv").exists());
    Ok(())
}

#[test]
fn test_gapped_and_gapless_ties() -> Result<()> {
    let raw = json!([
        place("c1", 4.8, 10, "cafe"),
        place("c2", 4.8, 20, "cafe"),
        place("c3", 4.5, 30, "cafe"),
    ]);

    let dir = tempdir()?;
    let gapped = run_stages(dir.path(), raw.clone(), RankMode::Gapped)?;
    let ranks: HashMap<_, _> = gapped.iter().map(|r| (r.place_id.clone(), r.rating_rank)).collect();
    assert_eq!(ranks["c1"], 1);
    assert_eq!(ranks["c2"], 1);
    assert_eq!(ranks["c3"], 3);

    let dir = tempdir()?;
    let gapless = run_stages(dir.path(), raw, RankMode::Gapless)?;
    let ranks: HashMap<_, _> = gapless.iter().map(|r| (r.place_id.clone(), r.rating_rank)).collect();
    assert_eq!(ranks["c3"], 2);
    Ok(())
}

#[test]
fn test_categories_rank_independently() -> Result<()> {
    let cafes = [place("c1", 4.8, 10, "cafe"), place("c2", 4.1, 5, "cafe")];

    let dir = tempdir()?;
    let before = run_stages(
        dir.path(),
        json!([cafes[0].clone(), cafes[1].clone(), place("s1", 3.0, 2, "spa")]),
        RankMode::Gapped,
    )?;
    let dir = tempdir()?;
    let after = run_stages(
        dir.path(),
        json!([cafes[0].clone(), cafes[1].clone(), place("s1", 5.0, 2, "spa")]),
        RankMode::Gapped,
    )?;

    let cafe_ranks = |rows: &[RankedPlaceRow]| -> Vec<(String, u64)> {
        rows.iter()
            .filter(|r| r.category.as_deref() == Some("cafe"))
            .map(|r| (r.place_id.clone(), r.rating_rank))
            .collect()
    };
    assert_eq!(cafe_ranks(&before), cafe_ranks(&after));
    assert_eq!(cafe_ranks(&after), vec![("c1".to_string(), 1), ("c2".to_string(), 2)]);
    Ok(())
}

#[test]
fn test_category_derived_from_type_list() -> Result<()> {
    let dir = tempdir()?;
    let rows = run_stages(
        dir.path(),
        json!([{"place_id": "b1", "name": "Bar", "rating": 4.0, "types": ["bar", "restaurant"]}]),
        RankMode::Gapless,
    )?;
    assert_eq!(rows[0].category.as_deref(), Some("bar, restaurant"));
    Ok(())
}

#[test]
fn test_each_place_ranked_exactly_once() -> Result<()> {
    let dir = tempdir()?;
    let raw = json!([
        place("a", 4.0, 1, "cafe"),
        place("b", 4.0, 1, "bar"),
        place("c", 3.0, 1, "cafe"),
        {"place_id": "d", "name": "No type"},
    ]);
    let rows = run_stages(dir.path(), raw, RankMode::Gapless)?;

    let mut ids: Vec<_> = rows.iter().map(|r| r.place_id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["a", "b", "c", "d"]);
    Ok(())
}

#[test]
fn test_billiard_halls_end_to_end() -> Result<()> {
    let dir = tempdir()?;
    let raw = json!([
        {"place_id": "A", "name": "Hall A", "rating": 4.9, "user_ratings_total": 120,
         "geometry": {"lat": 10.78, "lng": 106.69}, "types": ["billiard"], "address": "District 1"},
        {"place_id": "B", "name": "Hall B", "rating": 4.9, "user_ratings_total": 80,
         "geometry": {"lat": 10.79, "lng": 106.70}, "types": ["billiard"], "address": "District 3"},
        {"place_id": "C", "name": "Hall C", "rating": 4.2, "user_ratings_total": 50,
         "geometry": {"lat": 10.80, "lng": 106.71}, "types": ["billiard"], "address": "District 5"}
    ]);
    let rows = run_stages(dir.path(), raw, RankMode::Gapped)?;

    let order: Vec<(&str, u64)> = rows.iter().map(|r| (r.place_id.as_str(), r.rating_rank)).collect();
    assert_eq!(order, vec![("A", 1), ("B", 1), ("C", 3)]);
    assert!(rows.iter().all(|r| r.category.as_deref() == Some("billiard")));
    Ok(())
}

#[test]
fn test_schema_mismatch_leaves_no_ranked_artifact() -> Result<()> {
    let dir = tempdir()?;
    let out = Artifacts::in_dir(dir.path());
    fs::write(&out.clean, "place_id,title,rating\np1,A,4.5\n")?;

    let err = load_and_rank(&out.clean, &out.db, &out.ranked, &out.top, &rank_settings(RankMode::Gapped))
        .unwrap_err();
    assert!(matches!(err, LoadError::SchemaMismatch { .. }));
    assert!(!out.ranked.exists());
    assert!(!out.top.exists());
    Ok(())
}

fn pipeline_config(dir: &Path) -> Result<ConfigResolver> {
    let toml = format!(
        r#"
[paths]
raw_data_dir = "{raw}"
clean_data_dir = "{clean}"
output_dir = "{out}"

[sql]
use_dense_rank = false
ranking_limit = 1
"#,
        raw = dir.join("raw").display(),
        clean = dir.join("clean").display(),
        out = dir.join("output").display(),
    );
    Ok(ConfigResolver::from_toml_str(&toml)?)
}

fn fixture_records() -> Vec<RawPlaceRecord> {
    let raw = json!([
        place("A", 4.9, 120, "billiard"),
        place("B", 4.9, 80, "billiard"),
        place("C", 4.2, 50, "billiard"),
        place("K", 4.4, 9, "karaoke"),
    ]);
    serde_json::from_value(raw).expect("fixture records")
}

#[tokio::test]
async fn test_full_pipeline_with_fixture_source() -> Result<()> {
    let dir = tempdir()?;
    let config = pipeline_config(dir.path())?;
    let options = PipelineOptions {
        crawl: Some(CrawlOptions {
            query: "billiard, Ho Chi Minh City".to_string(),
            max_crawled_places: Some(10),
            max_reviews: None,
        }),
        ..Default::default()
    };
    let pipeline = Pipeline::new(&config, options)?;
    let source = FixturePlaceSource::new(fixture_records());
    let source: &dyn PlaceSource = &source;

    let report = pipeline.run(Some(source)).await?;
    assert_eq!(report.extracted, Some(4));
    assert_eq!(report.ranked, Some(4));
    assert_eq!(report.categories, Some(2));

    let paths = pipeline.paths();
    assert!(paths.raw_json.starts_with(dir.path().join("raw")));
    assert!(paths.database.exists());

    let ranked = read_ranked(&paths.ranked_csv)?;
    let billiard: Vec<u64> = ranked
        .iter()
        .filter(|r| r.category.as_deref() == Some("billiard"))
        .map(|r| r.rating_rank)
        .collect();
    assert_eq!(billiard, vec![1, 1, 3]);

    // ranking_limit = 1 keeps one row per category
    let top = read_ranked(&paths.top_csv)?;
    assert_eq!(top.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_skip_crawl_reuses_raw_artifact() -> Result<()> {
    let dir = tempdir()?;
    let config = pipeline_config(dir.path())?;
    let raw_path = dir.path().join("existing.json");
    write_raw(&raw_path, serde_json::to_value(fixture_records())?)?;

    let mut options = PipelineOptions::default();
    options.paths.raw_path = Some(raw_path);
    let pipeline = Pipeline::new(&config, options)?;
    assert!(!pipeline.needs_source());

    let report = pipeline.run(None).await?;
    assert_eq!(report.extracted, None);
    assert_eq!(report.transformed.map(|s| s.processed), Some(4));
    Ok(())
}

#[tokio::test]
async fn test_pipeline_failure_is_stage_labeled() -> Result<()> {
    let dir = tempdir()?;
    let config = pipeline_config(dir.path())?;
    let options = PipelineOptions {
        crawl: Some(CrawlOptions {
            query: "nothing here".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };
    let pipeline = Pipeline::new(&config, options)?;

    let empty = FixturePlaceSource::default();
    let source: &dyn PlaceSource = &empty;
    let err = pipeline.run(Some(source)).await.unwrap_err();
    assert!(matches!(err, PipelineError::Extraction(_)));
    assert!(err.to_string().starts_with("extract: "));
    assert!(!pipeline.paths().raw_json.exists());
    assert!(!pipeline.paths().clean_csv.exists());
    Ok(())
}
