use std::sync::Arc;

use chrono::Local;
use dotenvy::dotenv;
use tokio::sync::mpsc;
use tracing::info;
use tracing_appender::rolling;

use hrm_attendance::config::Config;
use hrm_attendance::db::init_db;
use hrm_attendance::engine::metrics::format_duration;
use hrm_attendance::engine::ReconciliationEngine;
use hrm_attendance::feed::{ConnectionState, FeedMessage};
use hrm_attendance::store::{MySqlAttendanceStore, MySqlNotificationSink, MySqlRoster};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env();

    // Rolling daily log
    let file_appender = rolling::daily("logs", "attendance.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .pretty()
        .init();

    info!("Attendance engine starting...");

    let pool = init_db(&config.database_url).await;

    let roster = Arc::new(MySqlRoster::new(pool.clone()));
    let store = Arc::new(MySqlAttendanceStore::new(pool.clone()));
    let sink = Arc::new(MySqlNotificationSink::new(pool));

    let tick = config.tick_interval;
    let engine = ReconciliationEngine::new(roster, store, sink, config);

    // Without a live change feed wired in, the engine treats the repository as
    // poll-only: Disconnected engages the periodic full reload.
    let (feed_tx, feed_rx) = mpsc::channel(64);
    let _handles = engine.run(feed_rx);
    feed_tx
        .send(FeedMessage::Connection(ConnectionState::Disconnected))
        .await?;

    engine.warmup().await?;
    engine.set_viewed_date(Local::now().date_naive()).await?;

    loop {
        tokio::time::sleep(tick).await;

        let date = engine.viewed_date().await;
        let metrics = engine.metrics().await;
        let rows = engine.merged_view().await.len();
        let avg = format_duration(chrono::Duration::seconds(
            (metrics.average_working_hours * 3600.0) as i64,
        ));

        info!(
            %date,
            present = metrics.present,
            absent = metrics.absent,
            late = metrics.late,
            rate = metrics.attendance_rate,
            avg = %avg,
            rows,
            state = %engine.connection_state(),
            "attendance snapshot"
        );
    }
}
