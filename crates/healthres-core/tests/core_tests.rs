use std::fs;
use std::path::Path;
use tempfile::TempDir;

use healthres_core::config::{expand_path, resolve_with_base, Config, EmbeddingProvider, StoreProvider};
use healthres_core::corpus::{load_corpus, CorpusLoader};
use healthres_core::types::{Metric, Truncate};
use healthres_core::Error;

const HEADER: &str = ",Abstract,Authors,Publication Year,Summary\n";

fn write_csv(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("data.csv");
    fs::write(&path, format!("{HEADER}{body}")).unwrap();
    path
}

#[test]
fn load_drops_summary_and_incomplete_rows() {
    let tmp = TempDir::new().unwrap();
    let path = write_csv(
        tmp.path(),
        "0,Sleep and memory,Smith J,2019,s1\n\
         1,,Doe A,2020,s2\n\
         2,Gut microbiome,NaN,2021,s3\n\
         3,Exercise in older adults,Lee K,2018.0,\n",
    );

    let (corpus, report) = load_corpus(&path).expect("load");

    assert_eq!(report.raw_rows, 4);
    assert_eq!(report.raw_columns, 4);
    assert_eq!(report.columns, 3, "summary column is dropped");
    assert_eq!(report.rows, 2);
    assert_eq!(report.dropped_rows, 2);
    // A missing summary does not drop the row: the column is gone before cleaning.
    let years: Vec<i32> = corpus.iter().map(|d| d.meta.publication_year).collect();
    assert_eq!(years, vec![2019, 2018]);
    let ids: Vec<usize> = corpus.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![0, 1], "ids are renumbered after cleaning");
    for doc in corpus.iter() {
        assert!(!doc.meta.abstract_text.is_empty());
        assert!(!doc.meta.authors.is_empty());
    }
}

#[test]
fn unreadable_year_drops_only_that_row() {
    let csv = format!("{HEADER}0,Sleep and memory,Smith J,2019,s\n1,Diet and mood,Roe P,circa 2018,s\n2,Gut flora,Kim H,2021,s\n");
    let (corpus, report) = CorpusLoader::new().load_reader(csv.as_bytes()).expect("load");
    assert_eq!(report.raw_rows, 3);
    assert_eq!(report.dropped_rows, 1);
    let abstracts: Vec<&str> = corpus.iter().map(|d| d.meta.abstract_text.as_str()).collect();
    assert_eq!(abstracts, vec!["Sleep and memory", "Gut flora"]);
}

#[test]
fn load_missing_file_is_data_load_error() {
    let tmp = TempDir::new().unwrap();
    let err = load_corpus(&tmp.path().join("absent.csv")).unwrap_err();
    assert!(matches!(err, Error::DataLoad(_)));
}

#[test]
fn load_missing_column_is_data_load_error() {
    let csv = ",Abstract,Authors,Publication Year\n0,a,b,2000\n";
    let err = CorpusLoader::new().load_reader(csv.as_bytes()).unwrap_err();
    match err {
        Error::DataLoad(msg) => assert!(msg.contains("Summary"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn header_only_file_yields_empty_corpus() {
    let (corpus, report) = CorpusLoader::new().load_reader(HEADER.as_bytes()).expect("load");
    assert!(corpus.is_empty());
    assert_eq!(report.rows, 0);
}

#[test]
fn semicolon_delimiter_is_supported() {
    let csv = ";Abstract;Authors;Publication Year;Summary\n7;Vitamin D;Roe P;2015;x\n";
    let (corpus, _) = CorpusLoader::new().with_delimiter(b';').load_reader(csv.as_bytes()).expect("load");
    assert_eq!(corpus.len(), 1);
    assert_eq!(corpus.get(0).unwrap().meta.authors, "Roe P");
}

#[test]
fn settings_defaults_without_files() {
    figment::Jail::expect_with(|_jail| {
        let settings = Config::load_for_env("test").map_err(|e| e.to_string())?.settings().map_err(|e| e.to_string())?;
        assert_eq!(settings.embedding.model, "multilingual-22-12");
        assert_eq!(settings.embedding.provider, EmbeddingProvider::Cohere);
        assert_eq!(settings.embedding.query_truncate, Truncate::End);
        assert_eq!(settings.local_index.expansion_add, 100);
        assert_eq!(settings.local_index.connectivity, 16);
        assert_eq!(settings.local_index.metric, Metric::Angular);
        assert_eq!(settings.remote.index_name, "mh");
        assert_eq!(settings.remote.batch_size, 128);
        assert_eq!(settings.remote.metric, Metric::Cosine);
        assert_eq!(settings.retrieval.top_k, 5);
        Ok(())
    });
}

#[test]
fn env_file_and_prefixed_vars_layer_in_order() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
            [remote]
            provider = "lance"
            index_name = "papers"

            [retrieval]
            top_k = 3
            "#,
        )?;
        jail.create_file("config.test.toml", "[retrieval]\ntop_k = 7\n")?;
        jail.set_env("APP_EMBEDDING__PROVIDER", "fake");
        jail.set_env("APP_LOCAL_INDEX__TREES", "12");

        let config = Config::load_for_env("test").map_err(|e| e.to_string())?;
        let settings = config.settings().map_err(|e| e.to_string())?;
        assert_eq!(settings.remote.provider, StoreProvider::Lance);
        assert_eq!(settings.remote.index_name, "papers");
        assert_eq!(settings.retrieval.top_k, 7);
        assert_eq!(settings.embedding.provider, EmbeddingProvider::Fake);
        assert_eq!(settings.local_index.expansion_add, 12, "legacy `trees` key still sets build effort");

        let top_k: usize = config.get("retrieval.top_k").map_err(|e| e.to_string())?;
        assert_eq!(top_k, 7);
        Ok(())
    });
}

#[test]
fn invalid_settings_are_rejected() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[local_index]\nmetric = \"dotproduct\"\n")?;
        let config = Config::load_for_env("prod").map_err(|e| e.to_string())?;
        assert!(matches!(config.settings(), Err(Error::InvalidConfig(_))));
        Ok(())
    });
}

#[test]
fn path_helpers_expand_and_resolve() {
    std::env::set_var("HEALTHRES_TEST_DIR", "/tmp/healthres");
    assert_eq!(expand_path("${HEALTHRES_TEST_DIR}/data.csv"), Path::new("/tmp/healthres/data.csv"));
    let base = Path::new("/srv/app");
    assert_eq!(resolve_with_base(base, "data/data.csv"), Path::new("/srv/app/data/data.csv"));
    assert_eq!(resolve_with_base(base, "/abs/x.ann"), Path::new("/abs/x.ann"));
}
