use livedash::application::account_query::AccountQueryService;
use livedash::application::client::NoticeLevel;
use livedash::application::market_data::feed_client::FeedState;
use livedash::application::order_execution::OrderExecutionService;
use livedash::application::system::{Dashboard, Services};
use livedash::config::Config;
use livedash::domain::errors::DashboardError;
use livedash::domain::market::timeframe::Timeframe;
use livedash::domain::trading::portfolio::{HistoryPeriod, PortfolioHistoryPoint, Position};
use livedash::domain::trading::symbol::Symbol;
use livedash::domain::trading::types::{OrderForm, OrderSide, OrderType, TimeInForce};
use livedash::infrastructure::mock::{MockBrokerage, MockPriceFeed};
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn position(symbol: &str, qty: Decimal, price: Decimal, entry: Decimal) -> Position {
    Position {
        symbol: Symbol::parse(symbol).unwrap(),
        quantity: qty,
        market_value: qty * price,
        cost_basis: qty * entry,
        unrealized_pl: qty * (price - entry),
        avg_entry_price: entry,
        current_price: Some(price),
    }
}

fn three_positions() -> Vec<Position> {
    vec![
        position("AAPL", dec!(10), dec!(191.10), dec!(182.50)),
        position("MSFT", dec!(5), dec!(408.75), dec!(412.00)),
        position("NVDA", dec!(8), dec!(125.44), dec!(118.30)),
    ]
}

fn test_config(vars: &[(&str, &str)]) -> Config {
    let mut all: Vec<(String, String)> = vec![
        ("MODE".into(), "mock".into()),
        ("SYMBOLS".into(), "AAPL,MSFT".into()),
        ("REQUEST_TIMEOUT_MS".into(), "1000".into()),
        ("FEED_RECONNECT".into(), "false".into()),
    ];
    all.extend(vars.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    Config::from_lookup(move |key| {
        all.iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .unwrap()
}

fn dashboard_with(broker: Arc<MockBrokerage>, feed: MockPriceFeed, config: Config) -> Dashboard {
    Dashboard::with_services(
        config,
        Services {
            account: broker.clone(),
            execution: broker,
            connector: Arc::new(feed),
        },
    )
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ===== Account queries =====

#[tokio::test]
async fn test_positions_are_returned_in_brokerage_order() {
    let broker = Arc::new(MockBrokerage::new().with_positions(three_positions()));
    let service = AccountQueryService::new(broker.clone(), Duration::from_secs(1));

    let positions = assert_ok!(service.list_positions().await);

    assert_eq!(positions, three_positions());
    let names: Vec<&str> = positions.iter().map(|p| p.symbol.as_str()).collect();
    assert_eq!(names, vec!["AAPL", "MSFT", "NVDA"]);
    assert_eq!(positions[1].unrealized_pl, dec!(-16.25));
}

#[tokio::test]
async fn test_list_positions_is_repeatable() {
    let broker = Arc::new(MockBrokerage::new().with_positions(three_positions()));
    let service = AccountQueryService::new(broker.clone(), Duration::from_secs(1));

    let first = assert_ok!(service.list_positions().await);
    let second = assert_ok!(service.list_positions().await);

    assert_eq!(first, second);
    assert_eq!(broker.calls().list_positions, 2);
}

#[tokio::test]
async fn test_slow_brokerage_times_out_as_remote_error() {
    let broker = Arc::new(MockBrokerage::new().with_delay(Duration::from_secs(5)));
    let service = AccountQueryService::new(broker, Duration::from_millis(50));

    let err = assert_err!(service.list_positions().await);
    assert!(err.is_remote());
    assert!(err.to_string().contains("timed out"));

    let err = assert_err!(
        service
            .equity_history(HistoryPeriod::one_month(), Timeframe::OneDay)
            .await
    );
    assert!(err.is_remote());
}

#[tokio::test]
async fn test_refresh_fills_both_sections() {
    let t = |d| Utc.with_ymd_and_hms(2026, 9, d, 20, 0, 0).unwrap();
    let broker = Arc::new(
        MockBrokerage::new()
            .with_positions(three_positions())
            .with_history(vec![
                PortfolioHistoryPoint {
                    time: t(2),
                    equity: dec!(100250),
                },
                PortfolioHistoryPoint {
                    time: t(1),
                    equity: dec!(100000),
                },
            ]),
    );
    let dashboard = dashboard_with(broker.clone(), MockPriceFeed::new(), test_config(&[]));

    let view = dashboard.client.refresh().await;

    assert_eq!(view.positions.len(), 3);
    assert_eq!(view.equity_curve.len(), 2);
    assert!(view.equity_curve[0].time < view.equity_curve[1].time);
    assert!(view.notices.is_empty());
    assert_eq!(broker.calls().portfolio_history, 1);

    dashboard.shutdown().await;
}

#[tokio::test]
async fn test_refresh_reports_failures_as_notices() {
    let broker = Arc::new(MockBrokerage::new().failing_queries("service unavailable"));
    let dashboard = dashboard_with(broker, MockPriceFeed::new(), test_config(&[]));

    let view = dashboard.client.refresh().await;

    assert!(view.positions.is_empty());
    assert!(view.equity_curve.is_empty());
    assert_eq!(view.notices.len(), 2);
    assert!(view.notices.iter().all(|n| n.level == NoticeLevel::Error));
    assert!(view.notices[0].message.contains("service unavailable"));

    dashboard.shutdown().await;
}

#[tokio::test]
async fn test_refresh_times_out_instead_of_hanging() {
    let broker = Arc::new(
        MockBrokerage::new()
            .with_positions(three_positions())
            .with_delay(Duration::from_secs(5)),
    );
    let config = test_config(&[("REQUEST_TIMEOUT_MS", "50")]);
    let dashboard = dashboard_with(broker, MockPriceFeed::new(), config);

    let view = assert_ok!(
        tokio::time::timeout(Duration::from_secs(2), dashboard.client.refresh()).await
    );
    assert!(view.positions.is_empty());
    assert_eq!(view.notices.len(), 2);
    assert!(view.notices.iter().all(|n| n.message.contains("timed out")));

    dashboard.shutdown().await;
}

// ===== Order execution =====

#[tokio::test]
async fn test_non_positive_quantity_never_reaches_brokerage() {
    let broker = Arc::new(MockBrokerage::new());
    let service = OrderExecutionService::new(broker.clone(), Duration::from_secs(1));

    for qty in [0, -1, -100] {
        let err = assert_err!(service.place_order(OrderForm::market("AAPL", qty, "buy")).await);
        assert!(err.is_validation(), "qty {} gave {:?}", qty, err);
    }
    assert_eq!(broker.calls().submit_order, 0);
}

#[tokio::test]
async fn test_unknown_side_is_rejected_before_dispatch() {
    let broker = Arc::new(MockBrokerage::new());
    let service = OrderExecutionService::new(broker.clone(), Duration::from_secs(1));

    let err = assert_err!(service.place_order(OrderForm::market("AAPL", 3, "hold")).await);
    assert!(matches!(err, DashboardError::Validation { .. }));
    assert!(err.to_string().contains("hold"));
    assert_eq!(broker.calls().submit_order, 0);
}

#[tokio::test]
async fn test_limit_order_needs_positive_price() {
    let broker = Arc::new(MockBrokerage::new());
    let service = OrderExecutionService::new(broker.clone(), Duration::from_secs(1));

    let mut form = OrderForm::market("AAPL", 1, "buy");
    form.order_type = "limit".into();
    assert!(assert_err!(service.place_order(form).await).is_validation());

    let zero = OrderForm::limit("AAPL", 1, "buy", Decimal::ZERO);
    assert!(assert_err!(service.place_order(zero).await).is_validation());
    assert_eq!(broker.calls().submit_order, 0);

    let ok = OrderForm::limit("AAPL", 1, "buy", dec!(180.5));
    let result = assert_ok!(service.place_order(ok).await);
    assert_eq!(result.order_type, "limit");
    assert_eq!(
        broker.submitted_orders()[0].order_type,
        OrderType::Limit { limit_price: dec!(180.5) }
    );
}

#[tokio::test]
async fn test_market_order_is_good_till_cancelled() {
    let broker = Arc::new(MockBrokerage::new());
    let dashboard = dashboard_with(broker.clone(), MockPriceFeed::new(), test_config(&[]));

    let notice = dashboard
        .client
        .place_order(OrderForm::market("aapl", 3, "Buy"))
        .await;

    assert_eq!(notice.level, NoticeLevel::Success);
    assert_eq!(
        notice.message,
        "Buy order placed for 3 shares of AAPL. Order ID: mock-order-1"
    );
    assert_eq!(notice.order_id.as_deref(), Some("mock-order-1"));

    let sent = broker.submitted_orders();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].symbol.as_str(), "AAPL");
    assert_eq!(sent[0].quantity, 3);
    assert_eq!(sent[0].side, OrderSide::Buy);
    assert_eq!(sent[0].order_type, OrderType::Market);
    assert_eq!(sent[0].time_in_force, TimeInForce::GoodTillCancelled);

    dashboard.shutdown().await;
}

#[tokio::test]
async fn test_every_submit_reaches_the_brokerage() {
    let broker = Arc::new(MockBrokerage::new());
    let service = OrderExecutionService::new(broker.clone(), Duration::from_secs(1));

    let first = assert_ok!(service.place_order(OrderForm::market("AAPL", 1, "sell")).await);
    let second = assert_ok!(service.place_order(OrderForm::market("AAPL", 1, "sell")).await);

    assert_ne!(first.order_id, second.order_id);
    assert_eq!(broker.calls().submit_order, 2);
}

#[tokio::test]
async fn test_rejected_order_surfaces_remote_message() {
    let broker = Arc::new(MockBrokerage::new().rejecting_orders(403, "insufficient buying power"));
    let dashboard = dashboard_with(broker.clone(), MockPriceFeed::new(), test_config(&[]));

    let notice = dashboard
        .client
        .place_order(OrderForm::market("AAPL", 1000, "buy"))
        .await;

    assert!(notice.is_error());
    assert_eq!(
        notice.message,
        "Error placing order: Brokerage request failed: insufficient buying power"
    );
    assert_eq!(notice.order_id, None);
    assert_eq!(notice.status, Some(403));
    assert_eq!(broker.calls().submit_order, 1);

    dashboard.shutdown().await;
}

#[tokio::test]
async fn test_invalid_order_notice_names_the_problem() {
    let broker = Arc::new(MockBrokerage::new());
    let dashboard = dashboard_with(broker.clone(), MockPriceFeed::new(), test_config(&[]));

    let notice = dashboard
        .client
        .place_order(OrderForm::market("AAPL", 0, "buy"))
        .await;

    assert!(notice.is_error());
    assert!(notice.message.starts_with("Error placing order: Invalid input"));
    assert_eq!(broker.calls().submit_order, 0);

    dashboard.shutdown().await;
}

#[tokio::test]
async fn test_cancel_order() {
    let broker = Arc::new(MockBrokerage::new());
    let dashboard = dashboard_with(broker.clone(), MockPriceFeed::new(), test_config(&[]));

    let blank = dashboard.client.cancel_order("   ").await;
    assert!(blank.is_error());
    let traversal = dashboard.client.cancel_order("../positions").await;
    assert!(traversal.is_error());
    assert_eq!(traversal.status, None);
    assert_eq!(broker.calls().cancel_order, 0);
    assert_eq!(broker.calls().close_all_positions, 0);

    let notice = dashboard.client.cancel_order(" order-42 ").await;
    assert_eq!(notice.message, "Order order-42 cancelled.");
    assert_eq!(broker.cancelled_orders(), vec!["order-42".to_string()]);

    dashboard.shutdown().await;
}

#[tokio::test]
async fn test_liquidation_failure_is_reported_not_raised() {
    let broker = Arc::new(
        MockBrokerage::new()
            .with_positions(three_positions())
            .failing_liquidation("market is closed"),
    );
    let service = OrderExecutionService::new(broker.clone(), Duration::from_secs(1));
    let err = assert_err!(service.liquidate_all().await);
    assert!(matches!(err, DashboardError::RemoteService { .. }));

    let dashboard = dashboard_with(broker.clone(), MockPriceFeed::new(), test_config(&[]));
    let notice = dashboard.client.liquidate_all().await;
    assert!(notice.is_error());
    assert_eq!(
        notice.message,
        "Error liquidating positions: Brokerage request failed: market is closed"
    );

    // Positions untouched; the client keeps working afterwards.
    let view = dashboard.client.refresh().await;
    assert_eq!(view.positions.len(), 3);

    dashboard.shutdown().await;
}

#[tokio::test]
async fn test_liquidate_all_closes_everything() {
    let broker = Arc::new(MockBrokerage::new().with_positions(three_positions()));
    let dashboard = dashboard_with(broker.clone(), MockPriceFeed::new(), test_config(&[]));

    let notice = dashboard.client.liquidate_all().await;
    assert_eq!(notice.level, NoticeLevel::Success);
    assert_eq!(notice.message, "All positions liquidated.");

    let view = dashboard.client.refresh().await;
    assert!(view.positions.is_empty());
    assert_eq!(broker.calls().close_all_positions, 1);

    dashboard.shutdown().await;
}

// ===== Live prices through the client =====

#[tokio::test]
async fn test_live_view_is_fresh_while_streaming() {
    let feed = MockPriceFeed::new();
    let dashboard = dashboard_with(Arc::new(MockBrokerage::new()), feed.clone(), test_config(&[]));
    let client = &dashboard.client;

    wait_until("streaming", || client.feed().state().is_streaming()).await;
    assert!(client.live_prices().stale, "no prices yet");

    feed.push("AAPL", dec!(191.10));
    wait_until("AAPL price", || dashboard.store.get("AAPL").is_some()).await;

    let view = client.live_prices();
    assert!(!view.stale);
    assert!(view.stale_symbols.is_empty());
    assert_eq!(view.snapshot.price("AAPL"), Some(dec!(191.10)));
    assert!(view.snapshot.last_updated().is_some());

    dashboard.shutdown().await;
}

#[tokio::test]
async fn test_interrupted_feed_marks_view_stale() {
    let feed = MockPriceFeed::new();
    let dashboard = dashboard_with(Arc::new(MockBrokerage::new()), feed.clone(), test_config(&[]));
    let client = &dashboard.client;

    wait_until("streaming", || client.feed().state().is_streaming()).await;
    feed.push("MSFT", dec!(408.75));
    wait_until("MSFT price", || dashboard.store.get("MSFT").is_some()).await;

    feed.disconnect();
    wait_until("interrupted", || {
        matches!(client.feed().state(), FeedState::Interrupted { .. })
    })
    .await;

    let view = client.live_prices();
    assert!(view.stale);
    assert_eq!(view.snapshot.price("MSFT"), Some(dec!(408.75)));

    // Orders still work without a feed.
    let notice = client.place_order(OrderForm::market("MSFT", 1, "sell")).await;
    assert!(!notice.is_error());

    dashboard.shutdown().await;
}

#[tokio::test]
async fn test_watch_symbols_resubscribes_live_feed() {
    let feed = MockPriceFeed::new();
    let dashboard = dashboard_with(Arc::new(MockBrokerage::new()), feed.clone(), test_config(&[]));
    let client = &dashboard.client;
    wait_until("streaming", || client.feed().state().is_streaming()).await;

    let bad = client.watch_symbols(" , ").await;
    assert!(bad.is_error());

    let notice = client.watch_symbols("msft, tsla").await;
    assert_eq!(notice.message, "Watching MSFT, TSLA.");
    wait_until("TSLA subscribed", || {
        feed.subscribed().iter().any(|s| s.as_str() == "TSLA")
    })
    .await;

    assert_eq!(feed.connect_count(), 1);
    assert_eq!(feed.unsubscribe_calls().len(), 1);
    assert_eq!(feed.unsubscribe_calls()[0][0].as_str(), "AAPL");

    dashboard.shutdown().await;
    assert_eq!(feed.close_count(), 1);
}
