//! Pipeline orchestrator: bounded download/upload worker pools over shared
//! FIFO queues.
//!
//! Workers are long-lived tasks; the semaphores bound concurrent in-flight
//! items per stage. Items flow discover → download → upload; the store is
//! updated by the engines only after a stage fully completes.

pub mod dashboard;
mod progress;

pub use progress::{PipelineSnapshot, Stage, WorkProgress};

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::download::DownloadEngine;
use crate::logging::EventLog;
use crate::models::Video;
use crate::repository::VideoRepository;
use crate::upload::DeliveryUploader;

/// Idle poll interval for workers with an empty queue.
const IDLE_POLL: Duration = Duration::from_millis(500);
/// Grace period for joining workers on stop.
const STOP_GRACE: Duration = Duration::from_secs(10);

struct Inner {
    engine: DownloadEngine,
    uploader: Option<DeliveryUploader>,
    videos: Arc<VideoRepository>,
    event_log: Arc<EventLog>,

    download_queue: Mutex<VecDeque<Video>>,
    upload_queue: Mutex<VecDeque<String>>,
    download_sem: Semaphore,
    upload_sem: Semaphore,

    download_progress: StdRwLock<HashMap<String, WorkProgress>>,
    upload_progress: StdRwLock<HashMap<String, WorkProgress>>,
    completed_downloads: StdMutex<Vec<String>>,
    completed_uploads: StdMutex<Vec<String>>,
    status_line: StdRwLock<String>,
    in_flight: AtomicUsize,

    download_workers: usize,
    upload_workers: usize,
    cancel: CancellationToken,
    started_at: Instant,
}

/// The concurrent ingestion pipeline.
pub struct Pipeline {
    inner: Arc<Inner>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    pub fn new(
        engine: DownloadEngine,
        uploader: Option<DeliveryUploader>,
        videos: Arc<VideoRepository>,
        event_log: Arc<EventLog>,
        download_workers: usize,
        upload_workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        let upload_workers = if uploader.is_some() { upload_workers } else { 0 };
        Self {
            inner: Arc::new(Inner {
                engine,
                uploader,
                videos,
                event_log,
                download_queue: Mutex::new(VecDeque::new()),
                upload_queue: Mutex::new(VecDeque::new()),
                download_sem: Semaphore::new(download_workers),
                upload_sem: Semaphore::new(upload_workers.max(1)),
                download_progress: StdRwLock::new(HashMap::new()),
                upload_progress: StdRwLock::new(HashMap::new()),
                completed_downloads: StdMutex::new(Vec::new()),
                completed_uploads: StdMutex::new(Vec::new()),
                status_line: StdRwLock::new(String::new()),
                in_flight: AtomicUsize::new(0),
                download_workers,
                upload_workers,
                cancel,
                started_at: Instant::now(),
            }),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the download workers, upload workers, and the dashboard.
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            return;
        }
        for worker in 0..self.inner.download_workers {
            let inner = self.inner.clone();
            handles.push(tokio::spawn(download_worker(inner, worker)));
        }
        for worker in 0..self.inner.upload_workers {
            let inner = self.inner.clone();
            handles.push(tokio::spawn(upload_worker(inner, worker)));
        }
        let inner = self.inner.clone();
        handles.push(tokio::spawn(dashboard_worker(inner)));
        info!(
            downloads = self.inner.download_workers,
            uploads = self.inner.upload_workers,
            "pipeline workers started"
        );
    }

    /// Append items to the download queue. Non-blocking; URLs already
    /// queued or in flight are skipped.
    pub async fn enqueue(&self, items: Vec<Video>) -> usize {
        let mut queue = self.inner.download_queue.lock().await;
        let mut added = 0;
        for video in items {
            let queued = queue.iter().any(|v| v.url == video.url);
            let downloading = self
                .inner
                .download_progress
                .read()
                .unwrap()
                .contains_key(&video.url);
            let uploading = self
                .inner
                .upload_progress
                .read()
                .unwrap()
                .contains_key(&video.url);
            if queued || downloading || uploading {
                continue;
            }
            queue.push_back(video);
            added += 1;
        }
        added
    }

    /// Enqueue and wait until both queues are drained and no worker is
    /// mid-item.
    pub async fn process_blocking(&self, items: Vec<Video>) {
        self.enqueue(items).await;
        loop {
            if self.inner.cancel.is_cancelled() {
                return;
            }
            let downloads_queued = self.inner.download_queue.lock().await.len();
            let uploads_queued = self.inner.upload_queue.lock().await.len();
            if downloads_queued == 0
                && uploads_queued == 0
                && self.inner.in_flight.load(Ordering::SeqCst) == 0
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    /// Set the dashboard's current-activity line. Last writer wins.
    pub fn update_status(&self, text: &str) {
        *self.inner.status_line.write().unwrap() = text.to_string();
        self.inner.event_log.log(text);
    }

    /// Cancel the token and join all workers within the grace period.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        let mut handles = self.handles.lock().await;
        let joins = futures::future::join_all(handles.drain(..));
        if tokio::time::timeout(STOP_GRACE, joins).await.is_err() {
            warn!("pipeline workers did not stop within grace period");
        }
        info!("pipeline stopped");
    }

    /// Point-in-time view for the dashboard and status commands.
    pub fn snapshot(&self) -> PipelineSnapshot {
        snapshot_of(&self.inner)
    }

    /// Queue depths: (download, upload). Test and status helper.
    pub async fn queue_depths(&self) -> (usize, usize) {
        (
            self.inner.download_queue.lock().await.len(),
            self.inner.upload_queue.lock().await.len(),
        )
    }
}

fn snapshot_of(inner: &Inner) -> PipelineSnapshot {
    let downloads_active: Vec<(String, WorkProgress)> = inner
        .download_progress
        .read()
        .unwrap()
        .iter()
        .map(|(url, p)| (url.clone(), p.clone()))
        .collect();
    let uploads_active: Vec<(String, WorkProgress)> = inner
        .upload_progress
        .read()
        .unwrap()
        .iter()
        .map(|(url, p)| (url.clone(), p.clone()))
        .collect();

    PipelineSnapshot {
        status_line: inner.status_line.read().unwrap().clone(),
        downloads_active,
        uploads_active,
        downloads_queued: inner.download_queue.try_lock().map(|q| q.len()).unwrap_or(0),
        uploads_queued: inner.upload_queue.try_lock().map(|q| q.len()).unwrap_or(0),
        downloads_completed: inner.completed_downloads.lock().unwrap().len(),
        uploads_completed: inner.completed_uploads.lock().unwrap().len(),
        download_workers: inner.download_workers,
        upload_workers: inner.upload_workers,
        uploads_enabled: inner.uploader.is_some(),
        elapsed_secs: inner.started_at.elapsed().as_secs(),
    }
}

async fn download_worker(inner: Arc<Inner>, worker: usize) {
    loop {
        if inner.cancel.is_cancelled() {
            break;
        }
        let item = inner.download_queue.lock().await.pop_front();
        let Some(video) = item else {
            tokio::select! {
                _ = inner.cancel.cancelled() => break,
                _ = tokio::time::sleep(IDLE_POLL) => {}
            }
            continue;
        };

        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let permit = match inner.download_sem.acquire().await {
            Ok(p) => p,
            Err(_) => {
                inner.in_flight.fetch_sub(1, Ordering::SeqCst);
                break;
            }
        };

        inner.download_progress.write().unwrap().insert(
            video.url.clone(),
            WorkProgress::new(Stage::Download, worker, &video.title),
        );

        let progress_map = &inner.download_progress;
        let url_key = video.url.clone();
        let on_chunk = move |read: u64, total: Option<u64>| {
            if let Some(entry) = progress_map.write().unwrap().get_mut(&url_key) {
                entry.bytes_read = read;
                entry.bytes_total = total;
                entry.status = "downloading".to_string();
            }
        };

        let result = inner.engine.download(&video, &on_chunk).await;
        inner.download_progress.write().unwrap().remove(&video.url);

        match result {
            Ok(path) => {
                inner
                    .completed_downloads
                    .lock()
                    .unwrap()
                    .push(video.url.clone());
                inner
                    .event_log
                    .log(&format!("downloaded {} -> {}", video.url, path.display()));
                if inner.uploader.is_some() {
                    inner.upload_queue.lock().await.push_back(video.url.clone());
                }
            }
            Err(e) => {
                error!(worker, url = %video.url, error = %e, "download failed");
                inner
                    .event_log
                    .log(&format!("download failed {}: {}", video.url, e));
            }
        }

        drop(permit);
        inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn upload_worker(inner: Arc<Inner>, worker: usize) {
    let Some(uploader) = inner.uploader.as_ref() else {
        return;
    };
    loop {
        if inner.cancel.is_cancelled() {
            break;
        }
        let item = inner.upload_queue.lock().await.pop_front();
        let Some(url) = item else {
            tokio::select! {
                _ = inner.cancel.cancelled() => break,
                _ = tokio::time::sleep(IDLE_POLL) => {}
            }
            continue;
        };

        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let permit = match inner.upload_sem.acquire().await {
            Ok(p) => p,
            Err(_) => {
                inner.in_flight.fetch_sub(1, Ordering::SeqCst);
                break;
            }
        };

        // Reload: the download stage has persisted the final path by now.
        let video = match inner.videos.get(&url) {
            Ok(Some(v)) => v,
            Ok(None) => {
                warn!(worker, %url, "upload item vanished from store");
                drop(permit);
                inner.in_flight.fetch_sub(1, Ordering::SeqCst);
                continue;
            }
            Err(e) => {
                error!(worker, %url, error = %e, "store read failed, skipping item");
                drop(permit);
                inner.in_flight.fetch_sub(1, Ordering::SeqCst);
                continue;
            }
        };

        inner.upload_progress.write().unwrap().insert(
            url.clone(),
            WorkProgress::new(Stage::Upload, worker, &video.title),
        );

        let result = uploader.upload(&video).await;
        inner.upload_progress.write().unwrap().remove(&url);

        match result {
            Ok(()) => {
                inner.completed_uploads.lock().unwrap().push(url.clone());
                inner.event_log.log(&format!("uploaded {}", url));
            }
            Err(e) => {
                error!(worker, %url, error = %e, "upload failed");
                inner.event_log.log(&format!("upload failed {}: {}", url, e));
            }
        }

        drop(permit);
        inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn dashboard_worker(inner: Arc<Inner>) {
    let mut state = dashboard::DashboardState::new();
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = tokio::time::sleep(dashboard::TICK) => {}
        }

        let snapshot = snapshot_of(&inner);
        let body = dashboard::render_body(&snapshot);
        if state.should_emit(&body) {
            let block = dashboard::render_block(&snapshot);
            println!("{}", block);
            inner.event_log.log(&block);
        }
    }
}
