use super::*;
use listing_watch::utils::error::AppError;

#[tokio::test]
async fn test_start_creates_inactive_session_once() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(1)).await?;

    let reply = app.handler.dispatch(1, Command::Start { chat_id: 100 }).await?;
    assert!(reply.text.starts_with("Welcome"));

    let session = app.db.sessions().get(1).await?.unwrap();
    assert_eq!(session.chat_id, 100);
    assert!(!session.is_active);
    assert_eq!(session.polling_interval_secs, POLLING_INTERVAL_SECS);
    assert!(session.last_synced_at.is_none());

    let reply = app.handler.dispatch(1, Command::Start { chat_id: 999 }).await?;
    assert_eq!(reply.text, "You already have a session.");
    assert_eq!(app.db.sessions().get(1).await?.unwrap().chat_id, 100);
    Ok(())
}

#[tokio::test]
async fn test_commands_require_a_session() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(1)).await?;

    for command in [
        Command::Run,
        Command::ShowSettings,
        Command::SyncNow,
        Command::Stop,
        Command::SetSearchQuery { url: SEARCH_URL.to_string() },
    ] {
        let result = app.handler.dispatch(1, command.clone()).await;
        assert!(
            matches!(result, Err(AppError::NotFound { .. })),
            "{:?} should fail without a session",
            command
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_search_query_validation() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(1)).await?;
    app.handler.dispatch(1, Command::Start { chat_id: 100 }).await?;

    for url in [
        "not a url",
        "ftp://www.funda.nl/zoeken/koop",
        "https://www.example.com/zoeken/koop",
        "https://funda.nl.example.com/zoeken",
    ] {
        let result = app
            .handler
            .dispatch(1, Command::SetSearchQuery { url: url.to_string() })
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))), "{} should be rejected", url);
    }
    assert!(app.db.search_queries().get(1).await?.is_none());

    app.handler
        .dispatch(1, Command::SetSearchQuery { url: format!("  {}  ", SEARCH_URL) })
        .await?;
    let query = app.db.search_queries().get(1).await?.unwrap();
    assert_eq!(query.raw_url, SEARCH_URL);
    Ok(())
}

#[tokio::test]
async fn test_new_search_query_clears_stored_listings() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(3)).await?;
    app.active_user(1).await?;
    app.handler.dispatch(1, Command::SyncNow).await?;
    assert_eq!(app.db.listings().count(1).await?, 3);

    app.handler
        .dispatch(
            1,
            Command::SetSearchQuery {
                url: "https://www.funda.nl/zoeken/huur?selected_area=utrecht".to_string(),
            },
        )
        .await?;

    assert_eq!(app.db.listings().count(1).await?, 0);
    assert_eq!(app.db.sessions().get(1).await?.unwrap().sync_count_since_last_change, 0);
    Ok(())
}

#[tokio::test]
async fn test_polling_interval() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(1)).await?;
    app.handler.dispatch(1, Command::Start { chat_id: 100 }).await?;

    let reply = app
        .handler
        .dispatch(1, Command::SetPollingInterval { interval: "1h30m".to_string() })
        .await?;
    assert_eq!(reply.text, "Polling interval set to 1h30m0s.");
    assert_eq!(app.db.sessions().get(1).await?.unwrap().polling_interval_secs, 5400);

    for interval in ["30s", "0m", "soon", ""] {
        let result = app
            .handler
            .dispatch(1, Command::SetPollingInterval { interval: interval.to_string() })
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))), "{:?} should be rejected", interval);
    }
    assert_eq!(app.db.sessions().get(1).await?.unwrap().polling_interval_secs, 5400);
    Ok(())
}

#[tokio::test]
async fn test_location_filters() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(1)).await?;
    app.handler.dispatch(1, Command::Start { chat_id: 100 }).await?;

    let reply = app
        .handler
        .dispatch(1, Command::SetCities { cities: " Utrecht, Zeist ,,".to_string() })
        .await?;
    assert_eq!(reply.text, "Cities set to: Utrecht, Zeist");

    app.handler
        .dispatch(1, Command::SetRegions { regions: "Noord-Holland".to_string() })
        .await?;

    let session = app.db.sessions().get(1).await?.unwrap();
    assert_eq!(session.cities, vec!["Utrecht", "Zeist"]);
    assert_eq!(session.regions, vec!["Noord-Holland"]);

    let reply = app
        .handler
        .dispatch(1, Command::SetCities { cities: String::new() })
        .await?;
    assert_eq!(reply.text, "Cities set to: any");
    assert!(app.db.sessions().get(1).await?.unwrap().cities.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_run_and_pause() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(1)).await?;
    app.handler.dispatch(1, Command::Start { chat_id: 100 }).await?;

    app.handler.dispatch(1, Command::Run).await?;
    assert!(app.db.sessions().get(1).await?.unwrap().is_active);
    assert_eq!(app.db.sessions().list(true).await?.len(), 1);

    app.handler.dispatch(1, Command::Pause).await?;
    assert!(!app.db.sessions().get(1).await?.unwrap().is_active);
    assert!(app.db.sessions().list(true).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_do_not_disturb_settings() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(1)).await?;
    app.handler.dispatch(1, Command::Start { chat_id: 100 }).await?;

    let reply = app
        .handler
        .dispatch(1, Command::SetDndSchedule { schedule: "22:30,06:45".to_string() })
        .await?;
    assert_eq!(reply.text, "Do-not-disturb window set to 22:30 - 06:45 UTC.");
    app.handler.dispatch(1, Command::DndActivate).await?;

    let session = app.db.sessions().get(1).await?.unwrap();
    assert!(session.dnd_active);
    assert_eq!(session.dnd_start_minute, 22 * 60 + 30);
    assert_eq!(session.dnd_end_minute, 6 * 60 + 45);

    let result = app
        .handler
        .dispatch(1, Command::SetDndSchedule { schedule: "08:00,08:00".to_string() })
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    app.handler.dispatch(1, Command::DndDeactivate).await?;
    let session = app.db.sessions().get(1).await?.unwrap();
    assert!(!session.dnd_active);
    assert_eq!(session.dnd_start_minute, 22 * 60 + 30);
    Ok(())
}

#[tokio::test]
async fn test_show_settings() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(1)).await?;
    app.handler.dispatch(1, Command::Start { chat_id: 100 }).await?;

    let reply = app.handler.dispatch(1, Command::ShowSettings).await?;
    assert!(reply.text.contains("Active: no"));
    assert!(reply.text.contains("Polling interval: 15m0s"));
    assert!(reply.text.contains("Search query: not set"));

    app.active_user(1).await?;
    let reply = app.handler.dispatch(1, Command::ShowSettings).await?;
    assert!(reply.text.contains("Active: yes"));
    assert!(reply.text.contains(SEARCH_URL));
    Ok(())
}

#[tokio::test]
async fn test_show_listings() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(2)).await?;
    app.active_user(1).await?;

    let reply = app.handler.dispatch(1, Command::ShowListings { only_new: false }).await?;
    assert_eq!(reply.text, "No listings stored yet.");
    assert!(!reply.rich_formatting);

    app.handler.dispatch(1, Command::SyncNow).await?;
    let reply = app.handler.dispatch(1, Command::ShowListings { only_new: true }).await?;
    assert!(reply.rich_formatting);
    assert!(reply.text.starts_with("*2 listing\\(s\\)*"));

    // Most expensive first
    let second = reply.text.find("huis\\-2").unwrap();
    let first = reply.text.find("huis\\-1").unwrap();
    assert!(second < first);

    app.handler.dispatch(1, Command::SyncNow).await?;
    let reply = app.handler.dispatch(1, Command::ShowListings { only_new: true }).await?;
    assert_eq!(reply.text, "No new listings.");
    Ok(())
}

#[tokio::test]
async fn test_stop_deletes_everything() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(2)).await?;
    app.active_user(1).await?;
    app.active_user(2).await?;
    app.handler.dispatch(1, Command::SyncNow).await?;
    app.handler.dispatch(2, Command::SyncNow).await?;

    let reply = app.handler.dispatch(1, Command::Stop).await?;
    assert_eq!(reply.text, "All your data has been deleted.");

    assert!(app.db.sessions().get(1).await?.is_none());
    assert!(app.db.search_queries().get(1).await?.is_none());
    assert_eq!(app.db.listings().count(1).await?, 0);

    // Other users keep their data
    assert!(app.db.sessions().get(2).await?.is_some());
    assert_eq!(app.db.listings().count(2).await?, 2);

    let result = app.handler.dispatch(1, Command::Stop).await;
    assert!(matches!(result, Err(AppError::NotFound { .. })));
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_users_are_rejected() -> anyhow::Result<()> {
    let mut config = get_test_config();
    config.notifications.telegram.authorized_users = vec![1];
    let app = create_test_app_with_config(FakeSite::utrecht(1), config).await?;

    app.handler.dispatch(1, Command::Start { chat_id: 100 }).await?;

    let result = app.handler.dispatch(2, Command::Start { chat_id: 200 }).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(app.db.sessions().get(2).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_remove_favorite() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(2)).await?;
    app.active_user(1).await?;
    app.handler.dispatch(1, Command::SyncNow).await?;

    let url = FakeListing::new("utrecht/huis-2", "Utrecht", 302_000.0).url();
    app.handler.dispatch(1, Command::AddFavorite { url: url.clone() }).await?;
    assert_eq!(app.db.favorites().list(1).await?.len(), 1);

    let reply = app.handler.dispatch(1, Command::RemoveFavorite { url: format!(" {} ", url) }).await?;
    assert_eq!(reply.text, "Removed from your favorites.");
    assert!(app.db.favorites().list(1).await?.is_empty());

    let result = app.handler.dispatch(1, Command::RemoveFavorite { url }).await;
    assert!(matches!(result, Err(AppError::NotFound { .. })));

    let reply = app.handler.dispatch(1, Command::ShowFavorites).await?;
    assert_eq!(reply.text, "No favorites yet.");
    Ok(())
}
