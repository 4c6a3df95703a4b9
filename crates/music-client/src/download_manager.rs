//! Download monitor for server-side (NAS) tasks.
//!
//! Mirrors `nas/tasks` and `nas/batches` into a [`TaskBoard`] and runs the
//! two mutually exclusive background loops:
//! - the task-list poll, active while the tasks tab is shown;
//! - the badge poll, which only tracks how many tasks are still active and
//!   stops itself once that count reaches zero.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use music_proto::config::Config;
use music_proto::protocol::{Batch, DownloadTask};
use tracing::{debug, info};

use crate::action::{UiEvent, UiSink};
use crate::error::ClientError;
use crate::gateway::{ApiRequest, CallMode, RequestGateway};
use crate::polling::{ErrorPolicy, PollLoop, StartPolicy, TickOutcome};

/// Client mirror of the server's task and batch lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskBoard {
    tasks: Vec<DownloadTask>,
    batches: Vec<Batch>,
}

impl TaskBoard {
    /// Replace the task list with a new snapshot.
    ///
    /// A task whose incoming status is not a forward move from the one
    /// already seen keeps the previous status and progress: a late snapshot
    /// never moves a task backwards or out of a terminal status.
    pub fn merge_tasks(&mut self, incoming: Vec<DownloadTask>) {
        let previous: HashMap<String, DownloadTask> = std::mem::take(&mut self.tasks)
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();

        self.tasks = incoming
            .into_iter()
            .map(|mut task| {
                if let Some(prev) = previous.get(&task.id) {
                    if !prev.status.can_move_to(task.status) {
                        debug!(
                            "task {}: ignoring regression {} -> {}",
                            task.id,
                            prev.status.label(),
                            task.status.label()
                        );
                        task.status = prev.status;
                        task.progress = task.progress.max(prev.progress);
                    }
                }
                task
            })
            .collect();
    }

    pub fn set_batches(&mut self, batches: Vec<Batch>) {
        self.batches = batches;
    }

    pub fn tasks(&self) -> &[DownloadTask] {
        &self.tasks
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn task(&self, id: &str) -> Option<&DownloadTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Tasks still pending or running.
    pub fn active_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.status.is_active()).count()
    }
}

struct Inner {
    gateway: RequestGateway,
    ui: UiSink,
    board: Mutex<TaskBoard>,
    task_poll: PollLoop,
    badge_poll: PollLoop,
    task_interval: Duration,
    badge_interval: Duration,
}

#[derive(Clone)]
pub struct DownloadMonitor {
    inner: Arc<Inner>,
}

impl DownloadMonitor {
    pub fn new(gateway: RequestGateway, ui: UiSink, config: &Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                ui,
                board: Mutex::new(TaskBoard::default()),
                task_poll: PollLoop::new("tasks", StartPolicy::KeepRunning, ErrorPolicy::Ignore),
                badge_poll: PollLoop::new("badge", StartPolicy::KeepRunning, ErrorPolicy::Ignore),
                task_interval: config.polling.task_interval(),
                badge_interval: config.polling.badge_interval(),
            }),
        }
    }

    pub fn board(&self) -> TaskBoard {
        self.lock_board().clone()
    }

    pub fn active_count(&self) -> usize {
        self.lock_board().active_count()
    }

    pub fn is_task_polling(&self) -> bool {
        self.inner.task_poll.is_running()
    }

    pub fn is_badge_polling(&self) -> bool {
        self.inner.badge_poll.is_running()
    }

    /// The tasks tab became visible: the full list replaces the badge.
    pub fn enter_tasks_tab(&self) {
        self.inner.badge_poll.stop();
        let me = self.clone();
        self.inner.task_poll.start(self.inner.task_interval, move || {
            let me = me.clone();
            async move {
                me.refresh_tasks().await?;
                Ok(TickOutcome::Continue)
            }
        });
    }

    /// The tasks tab was left: fall back to the badge if work is still active.
    pub fn leave_tasks_tab(&self) {
        self.inner.task_poll.stop();
        if self.active_count() > 0 {
            self.start_badge();
        } else {
            debug!("no active downloads, badge stays off");
        }
    }

    /// Start the badge poll.  Does nothing while the task list is polled,
    /// since that loop already keeps the count current.
    pub fn start_badge(&self) -> bool {
        if self.inner.task_poll.is_running() {
            debug!("task list is polled, badge not started");
            return false;
        }
        let me = self.clone();
        self.inner.badge_poll.start(self.inner.badge_interval, move || {
            let me = me.clone();
            async move { me.refresh_badge().await }
        })
    }

    pub fn stop_all(&self) {
        self.inner.task_poll.stop();
        self.inner.badge_poll.stop();
    }

    /// Fetch tasks and batches and publish the new board.
    pub async fn refresh_tasks(&self) -> Result<(), ClientError> {
        let gateway = &self.inner.gateway;
        let (tasks, batches) = tokio::join!(
            gateway.call_list::<DownloadTask>(ApiRequest::get("nas/tasks"), CallMode::Silent),
            gateway.call_list::<Batch>(ApiRequest::get("nas/batches"), CallMode::Silent),
        );
        let (tasks, batches) = (tasks?, batches?);

        let board = {
            let mut board = self.lock_board();
            board.merge_tasks(tasks);
            board.set_batches(batches);
            board.clone()
        };
        debug!(
            "task board: {} tasks ({} active), {} batches",
            board.tasks().len(),
            board.active_count(),
            board.batches().len()
        );

        self.inner.ui.emit(UiEvent::Badge(board.active_count()));
        self.inner.ui.emit(UiEvent::Tasks {
            tasks: board.tasks,
            batches: board.batches,
        });
        Ok(())
    }

    /// One badge tick: refresh the count and stop once nothing is active.
    pub async fn refresh_badge(&self) -> Result<TickOutcome, ClientError> {
        let tasks: Vec<DownloadTask> = self
            .inner
            .gateway
            .call_list(ApiRequest::get("nas/tasks"), CallMode::Silent)
            .await?;

        let active = {
            let mut board = self.lock_board();
            board.merge_tasks(tasks);
            board.active_count()
        };
        self.inner.ui.emit(UiEvent::Badge(active));

        if active == 0 {
            info!("all downloads settled, badge poll done");
            Ok(TickOutcome::Stop)
        } else {
            Ok(TickOutcome::Continue)
        }
    }

    fn lock_board(&self) -> MutexGuard<'_, TaskBoard> {
        self.inner.board.lock().unwrap_or_else(|e| e.into_inner())
    }
}
