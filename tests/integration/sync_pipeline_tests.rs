use super::*;
use listing_watch::scraper::HttpFetcher;
use listing_watch::utils::error::AppError;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_first_sync_stores_everything_as_new() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(5)).await?;

    let delta = app.engine().run(&CancellationToken::new(), 1, SEARCH_URL).await?;

    assert_eq!(delta.added.len(), 5);
    assert!(delta.removed.is_empty());
    assert!(delta.leftover.is_empty());

    let stored = app.db.listings().list(1, false).await?;
    assert_eq!(stored.len(), 5);
    assert!(stored.iter().all(|l| l.is_new && l.user_id == 1));
    assert_eq!(stored[0].price, 305_000.0, "listings come back most expensive first");
    assert_eq!(stored[0].locality, "Utrecht");
    assert_eq!(stored[0].price_currency, "EUR");

    // 3 result pages, 1 empty page and 5 detail pages
    assert_eq!(app.site.requests(), 9);
    Ok(())
}

#[tokio::test]
async fn test_unchanged_site_turns_everything_into_leftovers() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(3)).await?;
    let cancel = CancellationToken::new();

    let first = app.engine().run(&cancel, 1, SEARCH_URL).await?;
    let ids: HashSet<String> = first.added.iter().map(|l| l.id.clone()).collect();

    let second = app.engine().run(&cancel, 1, SEARCH_URL).await?;
    assert!(!second.has_changes());
    assert_eq!(second.leftover.len(), 3);

    let stored = app.db.listings().list(1, false).await?;
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|l| !l.is_new));
    assert!(stored.iter().all(|l| ids.contains(&l.id)), "leftovers keep their ids");
    assert!(app.db.listings().list(1, true).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_second_sync_applies_additions_and_removals() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(3)).await?;
    let cancel = CancellationToken::new();
    app.engine().run(&cancel, 1, SEARCH_URL).await?;

    app.site.remove("utrecht/huis-2");
    app.site.add(FakeListing::new("zeist/villa-1", "Zeist", 950_000.0));

    let delta = app.engine().run(&cancel, 1, SEARCH_URL).await?;
    assert_eq!(delta.added.len(), 1);
    assert_eq!(delta.added[0].url, "https://www.funda.nl/koop/zeist/villa-1/");
    assert_eq!(delta.removed.len(), 1);
    assert_eq!(delta.removed[0].url, "https://www.funda.nl/koop/utrecht/huis-2/");
    assert_eq!(delta.leftover.len(), 2);

    let fresh = app.db.listings().list(1, true).await?;
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].locality, "Zeist");
    assert_eq!(app.db.listings().count(1).await?, 3);
    Ok(())
}

#[tokio::test]
async fn test_failed_detail_fetch_commits_nothing() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(3)).await?;
    let cancel = CancellationToken::new();
    app.engine().run(&cancel, 1, SEARCH_URL).await?;

    app.site.add(FakeListing::new("utrecht/huis-9", "Utrecht", 410_000.0));
    app.site.remove("utrecht/huis-1");
    app.site.fail_url("https://www.funda.nl/koop/utrecht/huis-9/");

    let result = app.engine().run(&cancel, 1, SEARCH_URL).await;
    assert!(matches!(result, Err(AppError::Fetch { .. })));

    // The stored snapshot is exactly what the first sync left behind
    let stored = app.db.listings().list(1, false).await?;
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|l| l.is_new));
    assert!(stored.iter().any(|l| l.url.ends_with("/huis-1/")));
    Ok(())
}

#[tokio::test]
async fn test_failed_result_page_commits_nothing() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(2)).await?;
    app.site.fail_url(SEARCH_URL);

    let result = app.engine().run(&CancellationToken::new(), 1, SEARCH_URL).await;
    assert!(matches!(result, Err(AppError::Fetch { .. })));
    assert_eq!(app.db.listings().count(1).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_crawl_stops_when_a_page_repeats() -> anyhow::Result<()> {
    let site = FakeSite::utrecht(4);
    site.repeat_last_page();
    let app = create_test_app(site).await?;

    let delta = app.engine().run(&CancellationToken::new(), 1, SEARCH_URL).await?;
    assert_eq!(delta.added.len(), 4);

    // Pages 1, 2 and a repeat of 2, then 4 detail pages
    assert_eq!(app.site.requests(), 7);
    Ok(())
}

#[tokio::test]
async fn test_snapshots_are_kept_per_user() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(2)).await?;
    let cancel = CancellationToken::new();

    app.engine().run(&cancel, 1, SEARCH_URL).await?;
    app.engine().run(&cancel, 2, SEARCH_URL).await?;

    assert_eq!(app.db.listings().count(1).await?, 2);
    assert_eq!(app.db.listings().count(2).await?, 2);
    assert_eq!(app.db.listings().list(2, true).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_sync_commits_nothing() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(2)).await?;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = app.engine().run(&cancel, 1, SEARCH_URL).await;
    assert!(matches!(result, Err(AppError::Cancelled)));
    assert_eq!(app.db.listings().count(1).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_sync_over_http() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let uri = server.uri();

    let listings = [
        FakeListing::new("amersfoort/huis-1", "Amersfoort", 400_000.0),
        FakeListing::new("amersfoort/huis-2", "Amersfoort", 500_000.0),
    ];

    let items = format!(
        r#"{{"position":1,"url":"{uri}/koop/amersfoort/huis-1/"}},{{"position":2,"url":"{uri}/koop/amersfoort/huis-2/"}}"#
    );
    let page = |items: &str| {
        format!(
            r#"<script type="application/ld+json" data-hid="result-list-metadata">{{"itemListElement":[{}]}}</script>"#,
            items
        )
    };

    Mock::given(method("GET"))
        .and(path("/zoeken/koop"))
        .and(query_param("search_result", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&items)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/zoeken/koop"))
        .and(query_param("search_result", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page("")))
        .expect(1)
        .mount(&server)
        .await;

    for listing in &listings {
        // The detail JSON names the real site; records keep the url the result page linked
        Mock::given(method("GET"))
            .and(path(format!("/koop/{}/", listing.slug)))
            .respond_with(ResponseTemplate::new(200).set_body_string(detail_html(listing)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let config = get_test_config();
    let db = Database::in_memory().await?;
    let fetcher = Arc::new(HttpFetcher::new(&config.scraper)?);
    let engine = SyncEngine::new(fetcher, db.listings(), &config.scraper);

    let search_url = format!("{}/zoeken/koop?selected_area=amersfoort", uri);
    let delta = engine.run(&CancellationToken::new(), 7, &search_url).await?;

    assert_eq!(delta.added.len(), 2);
    let stored = db.listings().list(7, false).await?;
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].price, 500_000.0);
    assert_eq!(stored[0].url, format!("{}/koop/amersfoort/huis-2/", uri));
    assert_eq!(stored[1].image_url, "https://cloud.funda.nl/amersfoort/huis-1.jpg");
    Ok(())
}
