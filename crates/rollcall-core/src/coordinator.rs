//! Shared access to the notification channel
//!
//! One lock guards the thread map and every append, so concurrent
//! supervisors never create two threads for the same key and never
//! interleave their posts.

use rollcall_adapter_api::MessagingService;
use rollcall_api::{AttendanceLog, NotificationThread, ThreadKey};
use rollcall_util::ChannelId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::CoreResult;

pub struct Coordinator {
    messaging: Arc<dyn MessagingService>,
    channel: ChannelId,
    threads: Mutex<HashMap<ThreadKey, NotificationThread>>,
}

impl Coordinator {
    pub fn new(messaging: Arc<dyn MessagingService>, channel: ChannelId) -> Self {
        Self {
            messaging,
            channel,
            threads: Mutex::new(HashMap::new()),
        }
    }

    /// Find or create the thread for `key`.
    ///
    /// The lock is held from the cache lookup through `create_thread`, so
    /// `create_thread` runs at most once per key for the lifetime of the
    /// coordinator.
    pub async fn thread_for(&self, key: &ThreadKey) -> CoreResult<NotificationThread> {
        let mut threads = self.threads.lock().await;
        if let Some(thread) = threads.get(key) {
            return Ok(thread.clone());
        }

        let thread = match self.messaging.find_thread(&self.channel, key).await? {
            Some(existing) => {
                debug!(key = %key, thread_id = %existing.thread_id, "Found existing thread");
                existing
            }
            None => {
                let created = self.messaging.create_thread(&self.channel, key).await?;
                info!(key = %key, thread_id = %created.thread_id, "Created notification thread");
                created
            }
        };

        threads.insert(key.clone(), thread.clone());
        Ok(thread)
    }

    /// Append `text` to `thread`, serialized with every other thread operation
    pub async fn append(&self, thread: &NotificationThread, text: &str) -> CoreResult<()> {
        let _guard = self.threads.lock().await;
        self.messaging
            .append_to_thread(&thread.channel_id, &thread.thread_id, text)
            .await?;
        Ok(())
    }

    /// Post an attendance log; failures are logged and reported as `false`
    pub async fn post_attendance(&self, thread: &NotificationThread, log: &AttendanceLog) -> bool {
        match self.append(thread, &log.render()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    thread_id = %thread.thread_id,
                    error = %e,
                    "Failed to post attendance"
                );
                false
            }
        }
    }

    /// Threads resolved so far
    pub async fn known_threads(&self) -> usize {
        self.threads.lock().await.len()
    }
}
