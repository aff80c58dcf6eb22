use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal_macros::dec;
use tempfile::TempDir;
use tufe_core::fetch::{SessionSnapshot, SessionStatus, SourceAttempt};
use tufe_core::models::{
    AuthRequirement, AutoConfig, CachedEntry, HealthStatus, InflationReading, NewSource,
    PayloadFormat, Period, RateBudget, Source,
};
use tufe_core::store::{AutoConfigStore, CacheStore, FetchStores, SessionStore, SourceStore};
use tufe_core::FetchError;

use super::open_stores;

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 9, 30, 0).unwrap()
}

fn stores() -> (TempDir, FetchStores) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tufe.db");
    let stores = open_stores(path.to_str().unwrap()).unwrap();
    (dir, stores)
}

fn evds_source() -> Source {
    Source::new(
        NewSource {
            id: Some("tcmb_evds".to_string()),
            provider_id: "TCMB_EVDS".to_string(),
            name: "TCMB EVDS".to_string(),
            endpoint: "https://evds2.tcmb.gov.tr/service/evds".to_string(),
            series_code: "TP.FG.J0".to_string(),
            format: PayloadFormat::Json,
            auth: AuthRequirement::ApiKey,
            rate_budget: RateBudget::per_minute(30),
            priority: 1,
        },
        at(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_source_upsert_and_reload() {
    let (_dir, stores) = stores();
    let mut source = evds_source();
    source.failure_count = 3;
    source.health_status = HealthStatus::Failed;
    source.last_error = Some("HTTP 503".to_string());
    source.rate_budget.remaining = Some(0);
    source.rate_budget.reset_at = Some(at() + Duration::minutes(5));
    stores.sources.save_source(&source).await.unwrap();

    let loaded = stores.sources.load_sources().await.unwrap();
    assert_eq!(loaded, vec![source.clone()]);

    source.last_error = None;
    source.rate_budget.remaining = None;
    source.rate_budget.reset_at = None;
    source.health_status = HealthStatus::Degraded;
    stores.sources.save_source(&source).await.unwrap();

    let loaded = stores.sources.load_sources().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].last_error, None);
    assert_eq!(loaded[0].rate_budget.reset_at, None);
    assert_eq!(loaded[0].health_status, HealthStatus::Degraded);
}

fn session(id: &str, period: Period, created_at: DateTime<Utc>) -> SessionSnapshot {
    SessionSnapshot {
        id: id.to_string(),
        period,
        status: SessionStatus::InProgress,
        created_at,
        started_at: Some(created_at),
        completed_at: None,
        attempts: Vec::new(),
        final_source: None,
        retry_count: 0,
        error: None,
    }
}

#[tokio::test]
async fn test_session_attempts_survive_storage() {
    let (_dir, stores) = stores();
    let march = Period::monthly(2024, 3).unwrap();
    let mut snapshot = session("s1", march, at());
    stores.sessions.save_session(&snapshot).await.unwrap();

    snapshot.attempts.push(SourceAttempt {
        source_id: "tcmb_evds".to_string(),
        source_name: "TCMB EVDS".to_string(),
        attempted_at: at(),
        success: false,
        response_time_ms: 120,
        error: Some("Timeout: TCMB EVDS after 10000ms".to_string()),
    });
    snapshot.status = SessionStatus::Failed;
    snapshot.completed_at = Some(at() + Duration::seconds(1));
    snapshot.error = Some("All sources failed".to_string());
    stores.sessions.save_session(&snapshot).await.unwrap();

    let loaded = stores.sessions.get_session("s1").await.unwrap().unwrap();
    assert_eq!(loaded, snapshot);
    assert!(stores.sessions.get_session("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_sessions_newest_first() {
    let (_dir, stores) = stores();
    let march = Period::monthly(2024, 3).unwrap();
    let annual = Period::annual(2023).unwrap();
    stores
        .sessions
        .save_session(&session("old", march, at()))
        .await
        .unwrap();
    stores
        .sessions
        .save_session(&session("new", march, at() + Duration::hours(1)))
        .await
        .unwrap();
    stores
        .sessions
        .save_session(&session("other", annual, at() + Duration::hours(2)))
        .await
        .unwrap();

    let all = stores.sessions.list_sessions(None, 10).await.unwrap();
    let ids: Vec<_> = all.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["other", "new", "old"]);

    let march_only = stores.sessions.list_sessions(Some(&march), 1).await.unwrap();
    assert_eq!(march_only.len(), 1);
    assert_eq!(march_only[0].id, "new");
}

#[tokio::test]
async fn test_cache_entries_overwrite_and_delete() {
    let (_dir, stores) = stores();
    let march = Period::monthly(2024, 3).unwrap();
    let reading = InflationReading::new(march, dec!(68.50), "TCMB EVDS", "TP.FG.J0", at())
        .with_monthly_rate(dec!(3.16));
    let first = CachedEntry::from_reading(reading.clone(), 0.9, true, Duration::hours(24), at());
    stores.cache.save_cached_entry(&first).await.unwrap();

    let mut second = first.clone();
    second.rate = dec!(68.46);
    second.quality_score = 1.0;
    stores.cache.save_cached_entry(&second).await.unwrap();

    let loaded = stores.cache.load_cached_entries().await.unwrap();
    assert_eq!(loaded, vec![second]);

    stores.cache.delete_cached_entry(&march).await.unwrap();
    assert!(stores.cache.load_cached_entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_auto_config_insert_is_unique() {
    let (_dir, stores) = stores();
    assert!(stores
        .auto_config
        .get_auto_config("default")
        .await
        .unwrap()
        .is_none());

    let config = AutoConfig::zero_config(
        "default",
        vec!["TCMB_EVDS".to_string(), "WORLD_BANK".to_string()],
        at(),
    )
    .unwrap();
    stores.auto_config.insert_auto_config(&config).await.unwrap();
    let duplicate = stores.auto_config.insert_auto_config(&config).await;
    assert!(matches!(duplicate, Err(FetchError::Storage(_))));

    let mut updated = config.clone();
    updated.cache_ttl_hours = 48;
    updated.discovery_enabled = false;
    stores.auto_config.update_auto_config(&updated).await.unwrap();

    let loaded = stores
        .auto_config
        .get_auto_config("default")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded, updated);
    assert_eq!(loaded.default_priority_order, vec!["TCMB_EVDS", "WORLD_BANK"]);
}
