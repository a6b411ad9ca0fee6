mod broadcast;
mod config;
mod database;
mod error;
mod ingest;
mod logger;
mod mqtt;
mod query;
mod server;
mod types;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use dotenv::dotenv;
use log::{error, info, warn};

use broadcast::Broadcaster;
use config::AppConfig;
use database::{DatabaseManager, SampleStore, StoreHandle};
use ingest::{AlertEvaluator, IngestPipeline, LatestCache, RateGate};
use query::QueryService;
use server::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok(); // 加载 .env 文件
    logger::init_logger();
    info!("IMU hub starting");

    let config = AppConfig::load()?;
    info!(
        "Gate interval {}ms, alert threshold {}, history limit {}",
        config.ingest.min_interval_ms, config.ingest.alert_threshold, config.query.history_limit
    );

    let shutdown_signal = Arc::new(AtomicBool::new(false));

    // 数据库连接交给独立线程，其余组件只持有句柄
    let db_manager = DatabaseManager::open(config.get_database_path(), config.database.auto_create_dir)?;
    let (store_handle, db_thread) = StoreHandle::spawn(
        db_manager,
        config.database.task_channel_capacity,
        Arc::clone(&shutdown_signal),
    )?;
    let store: Arc<dyn SampleStore> = Arc::new(store_handle);

    let cache = Arc::new(LatestCache::new());
    let broadcaster = Arc::new(Broadcaster::new(config.broadcast.subscriber_buffer));
    let evaluator = AlertEvaluator::new(config.ingest.alert_threshold);

    let pipeline = Arc::new(IngestPipeline::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        Arc::clone(&broadcaster),
        evaluator,
        RateGate::new(config.ingest.min_interval()),
    ));
    let query = QueryService::new(store, cache, evaluator, config.query.history_limit);

    if config.ingest.warm_cache_on_start {
        match query.warm_cache() {
            Ok(Some(sample)) => info!("Latest value restored from {}", sample.timestamp()),
            Ok(None) => info!("Store is empty, waiting for first reading"),
            Err(e) => warn!("Could not restore latest value: {}", e),
        }
    }

    let mqtt_thread = if config.mqtt.enabled {
        let mqtt_config = config.mqtt.clone();
        let mqtt_pipeline = Arc::clone(&pipeline);
        let mqtt_shutdown = Arc::clone(&shutdown_signal);
        Some(thread::Builder::new().name("imu-mqtt".to_string()).spawn(move || {
            if let Err(e) = mqtt::run_mqtt_client(mqtt_config, mqtt_pipeline, mqtt_shutdown) {
                error!("MQTT thread failed: {}", e);
            }
        })?)
    } else {
        info!("MQTT ingest disabled");
        None
    };

    let state = AppState {
        pipeline,
        query,
        broadcaster,
    };
    let server_result = server::run_server(&config.bind_address(), state, wait_for_ctrl_c()).await;

    info!("Shutting down, signaling worker threads");
    shutdown_signal.store(true, Ordering::Relaxed);

    if db_thread.join().is_err() {
        error!("Database handler thread panicked");
    }

    // MQTT 线程在下一个事件（最迟一个 keep-alive 周期）才会看到关闭信号
    if let Some(handle) = mqtt_thread {
        if handle.is_finished() {
            if handle.join().is_err() {
                error!("MQTT thread panicked");
            }
        } else {
            warn!("MQTT thread still waiting on broker, not joining");
        }
    }

    server_result?;
    info!("IMU hub stopped");
    Ok(())
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received");
}
