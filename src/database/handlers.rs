use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{error, info, warn};

use super::manager::DatabaseManager;
use super::SampleStore;
use crate::error::StoreError;
use crate::types::{DatabaseTask, Sample, StoreRecord};

/// 数据库线程主循环：DuckDB 连接只在这个线程里使用，所有读写按到达顺序串行执行
pub fn run_database_handler(
    db_manager: DatabaseManager,
    task_receiver: Receiver<DatabaseTask>,
    shutdown_signal: Arc<AtomicBool>,
) {
    info!("Database handler thread started");

    while !shutdown_signal.load(Ordering::Relaxed) {
        match task_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(task) => handle_task(&db_manager, task),
            Err(RecvTimeoutError::Timeout) => {
                // 超时，继续循环检查关闭信号
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                info!("Database handler: all store handles dropped, exiting");
                break;
            }
        }
    }

    info!("Database handler thread stopped");
}

fn handle_task(db_manager: &DatabaseManager, task: DatabaseTask) {
    let name = task.name();

    let delivered = match task {
        DatabaseTask::Append { sample, response_sender } => {
            let result = db_manager.append(&sample);
            if let Err(e) = &result {
                error!("Database handler: failed to insert sample: {}", e);
            }
            response_sender.try_send(result).is_ok()
        }
        DatabaseTask::Recent { limit, response_sender } => {
            response_sender.try_send(db_manager.recent(limit)).is_ok()
        }
        DatabaseTask::All { response_sender } => response_sender.try_send(db_manager.all()).is_ok(),
        DatabaseTask::Count { response_sender } => response_sender.try_send(db_manager.count()).is_ok(),
    };

    if !delivered {
        warn!("Database handler: failed to send {} result, requester is gone", name);
    }
}

/// Cloneable front end of the database thread.
#[derive(Clone)]
pub struct StoreHandle {
    task_sender: Sender<DatabaseTask>,
}

impl StoreHandle {
    /// Moves `db_manager` onto a dedicated thread and returns a handle to it.
    pub fn spawn(
        db_manager: DatabaseManager,
        channel_capacity: usize,
        shutdown_signal: Arc<AtomicBool>,
    ) -> std::io::Result<(Self, JoinHandle<()>)> {
        let (task_sender, task_receiver) = crossbeam_channel::bounded(channel_capacity);

        let handle = thread::Builder::new()
            .name("imu-store".to_string())
            .spawn(move || run_database_handler(db_manager, task_receiver, shutdown_signal))?;

        Ok((Self { task_sender }, handle))
    }

    fn request<T>(
        &self,
        build: impl FnOnce(Sender<Result<T, StoreError>>) -> DatabaseTask,
    ) -> Result<T, StoreError> {
        let (response_sender, response_receiver) = crossbeam_channel::bounded(1);

        self.task_sender
            .send(build(response_sender))
            .map_err(|_| StoreError::Unavailable)?;

        response_receiver.recv().map_err(|_| StoreError::Unavailable)?
    }
}

impl SampleStore for StoreHandle {
    fn append(&self, sample: &Sample) -> Result<i64, StoreError> {
        let sample = sample.clone();
        self.request(|response_sender| DatabaseTask::Append { sample, response_sender })
    }

    fn recent(&self, limit: usize) -> Result<Vec<StoreRecord>, StoreError> {
        self.request(|response_sender| DatabaseTask::Recent { limit, response_sender })
    }

    fn all(&self) -> Result<Vec<StoreRecord>, StoreError> {
        self.request(|response_sender| DatabaseTask::All { response_sender })
    }

    fn count(&self) -> Result<usize, StoreError> {
        self.request(|response_sender| DatabaseTask::Count { response_sender })
    }
}
