use figment::Jail;

use ragdb_core::config::{expand_path, Config, EmbeddingBackend, IndexKind, Settings};
use ragdb_core::{BoundaryPolicy, Error};

#[test]
fn defaults_apply_without_any_source() {
    Jail::expect_with(|_jail| {
        let settings = Config::load().map_err(|e| e.to_string())?.settings().map_err(|e| e.to_string())?;
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.chunking.chunk_size, 1000);
        assert_eq!(settings.chunking.chunk_overlap, 200);
        assert_eq!(settings.retrieval.k, 5);
        assert_eq!(settings.embedding.backend, EmbeddingBackend::Hash);
        Ok(())
    });
}

#[test]
fn file_env_file_and_env_vars_layer_in_order() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
            [chunking]
            chunk_size = 500
            chunk_overlap = 50
            boundary = "whitespace"

            [retrieval]
            k = 8

            [index]
            kind = "ivf"
            nprobe = 4
            "#,
        )?;
        jail.create_file("config.test.toml", "[retrieval]\nk = 9\n")?;
        jail.set_env("RUST_ENV", "test");
        jail.set_env("APP_RETRIEVAL__SCORE_THRESHOLD", "0.25");
        jail.set_env("APP_EMBEDDING__BACKEND", "bge-m3");

        let config = Config::load().map_err(|e| e.to_string())?;
        let settings = config.settings().map_err(|e| e.to_string())?;
        assert_eq!(settings.chunking.chunk_size, 500);
        assert_eq!(settings.chunking.boundary, BoundaryPolicy::Whitespace);
        assert_eq!(settings.retrieval.k, 9);
        assert!((settings.retrieval.score_threshold - 0.25).abs() < f32::EPSILON);
        assert_eq!(settings.embedding.backend, EmbeddingBackend::BgeM3);
        assert_eq!(settings.index.kind, IndexKind::Ivf);
        assert_eq!(settings.index.nprobe, 4);
        // untouched sections keep their defaults
        assert_eq!(settings.generation.max_attempts, 3);

        let k: usize = config.get("retrieval.k").map_err(|e| e.to_string())?;
        assert_eq!(k, 9);
        Ok(())
    });
}

#[test]
fn inconsistent_chunking_is_rejected() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[chunking]\nchunk_size = 100\nchunk_overlap = 100\n")?;
        let err = Config::load().map_err(|e| e.to_string())?.settings().unwrap_err();
        assert!(matches!(err, Error::InvalidChunkConfig(_)), "{err}");
        Ok(())
    });
}

#[test]
fn out_of_range_threshold_is_rejected() {
    let mut settings = Settings::default();
    settings.retrieval.score_threshold = 1.5;
    assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));

    let mut settings = Settings::default();
    settings.retrieval.max_chunks_per_doc = Some(0);
    assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));

    let mut settings = Settings::default();
    settings.embedding.batch_size = 0;
    assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));
}

#[test]
fn missing_key_reports_its_name() {
    Jail::expect_with(|_jail| {
        let config = Config::load().map_err(|e| e.to_string())?;
        let err = config.get::<String>("nope.missing").unwrap_err();
        assert!(err.to_string().contains("nope.missing"));
        Ok(())
    });
}

#[test]
fn paths_expand_env_vars() {
    Jail::expect_with(|jail| {
        jail.set_env("RAGDB_TEST_ROOT", "/srv/ragdb");
        assert_eq!(expand_path("${RAGDB_TEST_ROOT}/index"), std::path::PathBuf::from("/srv/ragdb/index"));
        assert_eq!(expand_path("/abs/dir"), std::path::PathBuf::from("/abs/dir"));
        Ok(())
    });
}
