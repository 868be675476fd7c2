//! Datastore DDL, executed in order at connect time. Statements are
//! idempotent so a restart against an existing file is a no-op.

pub const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS publications (
        identifier_key TEXT PRIMARY KEY,
        pmid           TEXT,
        doi            TEXT,
        pmc_id         TEXT,
        arxiv_id       TEXT,
        title          TEXT NOT NULL,
        authors        TEXT NOT NULL DEFAULT '[]',
        journal        TEXT,
        year           INTEGER,
        abstract_text  TEXT,
        metadata       TEXT NOT NULL DEFAULT '{}',
        created_at     TEXT NOT NULL,
        updated_at     TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_publications_pmid ON publications(pmid)",
    "CREATE INDEX IF NOT EXISTS idx_publications_doi ON publications(doi)",
    r#"
    CREATE TABLE IF NOT EXISTS geo_datasets (
        geo_id         TEXT PRIMARY KEY,
        title          TEXT,
        summary        TEXT,
        organism       TEXT,
        platform       TEXT,
        sample_count   INTEGER,
        original_pmids TEXT NOT NULL DEFAULT '[]',
        metadata       TEXT NOT NULL DEFAULT '{}',
        created_at     TEXT NOT NULL,
        updated_at     TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS geo_publications (
        geo_id         TEXT NOT NULL,
        identifier_key TEXT NOT NULL,
        relationship   TEXT NOT NULL,
        strategy       TEXT,
        discovered_at  TEXT NOT NULL,
        UNIQUE(geo_id, identifier_key)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_geo_publications_geo ON geo_publications(geo_id)",
    "CREATE INDEX IF NOT EXISTS idx_geo_publications_key ON geo_publications(identifier_key)",
    r#"
    CREATE TABLE IF NOT EXISTS publication_urls (
        identifier_key TEXT NOT NULL,
        url            TEXT NOT NULL,
        url_type       TEXT NOT NULL,
        source         TEXT NOT NULL,
        priority       INTEGER NOT NULL,
        confidence     REAL NOT NULL DEFAULT 0.5,
        requires_auth  INTEGER NOT NULL DEFAULT 0,
        metadata       TEXT NOT NULL DEFAULT '{}',
        discovered_at  TEXT NOT NULL,
        UNIQUE(identifier_key, url)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_publication_urls_key ON publication_urls(identifier_key)",
    "CREATE INDEX IF NOT EXISTS idx_publication_urls_type ON publication_urls(url_type)",
    r#"
    CREATE TABLE IF NOT EXISTS cached_pdfs (
        identifier_key TEXT PRIMARY KEY,
        file_path      TEXT NOT NULL,
        file_hash      TEXT NOT NULL UNIQUE,
        file_size      INTEGER NOT NULL,
        source         TEXT NOT NULL,
        downloaded_at  TEXT NOT NULL,
        last_accessed  TEXT NOT NULL,
        access_count   INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_cached_pdfs_hash ON cached_pdfs(file_hash)",
    r#"
    CREATE TABLE IF NOT EXISTS parsed_content (
        identifier_key TEXT PRIMARY KEY,
        has_fulltext   INTEGER NOT NULL DEFAULT 0,
        has_tables     INTEGER NOT NULL DEFAULT 0,
        has_figures    INTEGER NOT NULL DEFAULT 0,
        word_count     INTEGER NOT NULL DEFAULT 0,
        table_count    INTEGER NOT NULL DEFAULT 0,
        figure_count   INTEGER NOT NULL DEFAULT 0,
        section_count  INTEGER NOT NULL DEFAULT 0,
        quality_score  REAL NOT NULL DEFAULT 0.0,
        parser_version TEXT NOT NULL,
        content_path   TEXT,
        parsed_at      TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS download_history (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        identifier_key TEXT NOT NULL,
        url            TEXT NOT NULL,
        source         TEXT NOT NULL,
        status         TEXT NOT NULL,
        error_message  TEXT,
        attempt_number INTEGER NOT NULL,
        file_path      TEXT,
        file_size      INTEGER,
        downloaded_at  TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_download_history_key ON download_history(identifier_key)",
    r#"
    CREATE TABLE IF NOT EXISTS citation_discovery_cache (
        cache_key  TEXT PRIMARY KEY,
        geo_id     TEXT NOT NULL,
        strategy   TEXT NOT NULL,
        result_json TEXT NOT NULL,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        hit_count  INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS not_found_cache (
        api        TEXT NOT NULL,
        lookup_key TEXT NOT NULL,
        cached_at  TEXT NOT NULL,
        UNIQUE(api, lookup_key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ai_analysis (
        identifier_key TEXT NOT NULL,
        analysis_type  TEXT NOT NULL,
        prompt_hash    TEXT NOT NULL,
        response       TEXT NOT NULL,
        model          TEXT NOT NULL,
        tokens         INTEGER NOT NULL DEFAULT 0,
        created_at     TEXT NOT NULL,
        UNIQUE(identifier_key, analysis_type, prompt_hash)
    )
    "#,
];
