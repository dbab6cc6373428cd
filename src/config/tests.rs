use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        public_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn cache_defaults_match_cache_config() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    let cache = CacheConfig::from(&settings.cache);
    let defaults = CacheConfig::default();

    assert_eq!(cache.key_prefix, defaults.key_prefix);
    assert_eq!(cache.query_ttl_secs, 300);
    assert_eq!(cache.max_page_size, 10_000);
    assert_eq!(cache.max_unpaginated_rows, 1_000);
    assert!(cache.redis_url.is_none());
    assert!(cache.response_cache_enabled());
}

#[test]
fn resource_ttls_default_and_merge() {
    let mut raw = RawSettings::default();
    raw.cache
        .resource_ttl_secs
        .insert("blogs".to_string(), 120);
    raw.cache
        .resource_ttl_secs
        .insert("links".to_string(), 60);

    let settings = Settings::from_raw(raw).expect("valid settings");
    let ttls = &settings.cache.resource_ttl_secs;

    assert_eq!(ttls.get(&Resource::Skills), Some(&1800));
    assert_eq!(ttls.get(&Resource::Settings), Some(&3600));
    assert_eq!(ttls.get(&Resource::Links), Some(&60));
    assert_eq!(ttls.get(&Resource::Blogs), Some(&120));
    assert_eq!(ttls.get(&Resource::Projects), None);
}

#[test]
fn unknown_resource_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache
        .resource_ttl_secs
        .insert("widgets".to_string(), 60);

    let err = Settings::from_raw(raw).expect_err("unknown resource");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.resource_ttl_secs",
            ..
        }
    ));
}

#[test]
fn oversized_ttls_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.query_ttl_secs = Some(u64::MAX);
    let err = Settings::from_raw(raw).expect_err("query ttl too large");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.query_ttl_secs",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.cache
        .resource_ttl_secs
        .insert("blogs".to_string(), MAX_TTL_SECS + 1);
    let err = Settings::from_raw(raw).expect_err("resource ttl too large");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.resource_ttl_secs",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.cache.response_ttl_secs = Some(MAX_TTL_SECS);
    assert!(Settings::from_raw(raw).is_ok());
}

#[test]
fn zero_limits_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.max_unpaginated_rows = Some(0);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.cache.query_ttl_secs = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn blank_urls_are_treated_as_absent() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());
    raw.cache.redis_url = Some(String::new());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
    assert!(settings.cache.redis_url.is_none());
}

#[test]
fn listeners_must_not_collide() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(9000);
    raw.server.admin_port = Some(9000);

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn cache_overrides_from_cli() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        cache_enabled: Some(false),
        cache_redis_url: Some("redis://cache:6379/1".to_string()),
        cache_max_page_size: Some(50),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(!settings.cache.enabled);
    assert_eq!(
        settings.cache.redis_url.as_deref(),
        Some("redis://cache:6379/1")
    );
    assert_eq!(settings.cache.max_page_size.get(), 50);
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["folio"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_invalidate_arguments() {
    let args = CliArgs::parse_from([
        "folio",
        "invalidate",
        "blogs",
        "--redis-url",
        "redis://localhost",
    ]);

    match args.command.expect("invalidate command") {
        Command::Invalidate(invalidate) => {
            assert_eq!(invalidate.resource, "blogs");
            assert_eq!(invalidate.redis_url.as_deref(), Some("redis://localhost"));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_migrate_arguments() {
    let args = CliArgs::parse_from(["folio", "migrate", "--database-url", "postgres://example"]);

    match args.command.expect("migrate command") {
        Command::Migrate(migrate) => {
            assert_eq!(
                migrate.database.database_url.as_deref(),
                Some("postgres://example")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}
