//! Registry service: the merged `records` property, the `update` method and
//! the debounced property-changed signal.
//!
//! Each registry runs as one actor task. Client requests, watch events and
//! the debounce deadline are multiplexed on that task, so they are handled
//! strictly one after another and the debouncer needs no locking. File I/O
//! is pushed to the blocking pool so a slow disk stalls only this registry.

use crate::config::RegistryConfig;
use crate::core::{
    AttributeMap, ChangeNotification, Fragment, FragmentError, MergedView, RegistryError, Result,
    UpdateRequest, merge_attributes,
};
use crate::storage::{build_view, is_plain_file_name, read_fragment, write_fragment};
use crate::watch::{Debouncer, DirectoryWatcher, RawEvent, sleep_until_deadline};
use notify::Event;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

const COMMAND_CAPACITY: usize = 64;

enum Command {
    Records {
        reply: oneshot::Sender<Result<MergedView>>,
    },
    Update {
        request: UpdateRequest,
        reply: oneshot::Sender<Result<()>>,
    },
    Touch {
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running registry.
#[derive(Clone)]
pub struct RegistryService {
    directory: Arc<PathBuf>,
    commands: mpsc::Sender<Command>,
    // Only the actor holds the sender, so subscribers see the stream close
    // once it stops.
    notifications: Arc<broadcast::Receiver<ChangeNotification>>,
}

impl RegistryService {
    /// Starts the registry actor for `config.directory`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: &RegistryConfig) -> Result<Self> {
        let directory = std::path::absolute(&config.directory).map_err(|source| {
            RegistryError::Io {
                path: config.directory.clone(),
                source,
            }
        })?;

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (notifications, subscriptions) = broadcast::channel(config.notification_capacity);

        let (watcher, events) = if config.watch {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let watcher = DirectoryWatcher::new(&directory, events_tx)?;
            (Some(watcher), Some(events_rx))
        } else {
            (None, None)
        };

        let actor = RegistryActor {
            directory: directory.clone(),
            debouncer: Debouncer::new(config.debounce),
            watcher,
            events,
            commands: commands_rx,
            notifications,
            serial: 0,
        };
        tokio::spawn(actor.run());

        info!(
            directory = %directory.display(),
            debounce_ms = config.debounce.as_millis() as u64,
            watch = config.watch,
            "Registry service started"
        );

        Ok(Self {
            directory: Arc::new(directory),
            commands: commands_tx,
            notifications: Arc::new(subscriptions),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Reads the merged view from the live directory contents.
    pub async fn records(&self) -> Result<MergedView> {
        self.request(|reply| Command::Records { reply }).await
    }

    /// Merges `attributes` into `record` of fragment `filename`.
    ///
    /// A missing fragment is created. A fragment that exists but does not
    /// parse is left untouched and the call fails with
    /// [`RegistryError::CorruptFragment`].
    pub async fn update(
        &self,
        filename: &str,
        record: &str,
        attributes: AttributeMap,
    ) -> Result<()> {
        let request = UpdateRequest::new(filename, record, attributes);
        self.request(|reply| Command::Update { request, reply })
            .await
    }

    /// Feeds an external "identity changed" event into the debouncer.
    pub async fn touch(&self) -> Result<()> {
        self.request(|reply| Command::Touch { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.notifications.resubscribe()
    }

    /// Stops the actor. A pending notification is discarded and every
    /// subscription ends. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        let (done, stopped) = oneshot::channel();
        if self.commands.send(Command::Shutdown { done }).await.is_err() {
            return Ok(());
        }
        let _ = stopped.await;
        Ok(())
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| RegistryError::ServiceStopped)?;
        response.await.map_err(|_| RegistryError::ServiceStopped)?
    }
}

struct RegistryActor {
    directory: PathBuf,
    debouncer: Debouncer,
    watcher: Option<DirectoryWatcher>,
    events: Option<mpsc::UnboundedReceiver<notify::Result<Event>>>,
    commands: mpsc::Receiver<Command>,
    notifications: broadcast::Sender<ChangeNotification>,
    serial: u64,
}

impl RegistryActor {
    async fn run(mut self) {
        loop {
            let deadline = self.debouncer.deadline();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle(command).await {
                            return;
                        }
                    }
                    None => {
                        self.stop();
                        return;
                    }
                },
                Some(event) = next_event(&mut self.events) => self.on_watch_event(event),
                () = sleep_until_deadline(deadline) => self.on_deadline(),
            }
        }
    }

    /// Returns `false` once the actor has stopped.
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Records { reply } => {
                let directory = self.directory.clone();
                let result = tokio::task::spawn_blocking(move || build_view(&directory))
                    .await
                    .map_err(RegistryError::from);
                let _ = reply.send(result);
            }
            Command::Update { request, reply } => {
                let directory = self.directory.clone();
                let result =
                    match tokio::task::spawn_blocking(move || update_fragment(&directory, request))
                        .await
                    {
                        Ok(result) => result,
                        Err(err) => Err(err.into()),
                    };
                if result.is_ok() {
                    self.raise("update");
                }
                let _ = reply.send(result);
            }
            Command::Touch { reply } => {
                self.raise("identity changed");
                let _ = reply.send(Ok(()));
            }
            Command::Shutdown { done } => {
                self.stop();
                let _ = done.send(());
                return false;
            }
        }
        true
    }

    fn on_watch_event(&mut self, event: notify::Result<Event>) {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                warn!(directory = %self.directory.display(), error = %err, "Directory watch error");
                self.raise("watch error");
                return;
            }
        };

        let Some(watcher) = self.watcher.as_mut() else {
            return;
        };

        match watcher.classify(&event) {
            Some(RawEvent::IdentityChanged) => {
                debug!(
                    directory = %self.directory.display(),
                    "Registry directory identity changed"
                );
                if let Err(err) = watcher.rearm() {
                    warn!(
                        directory = %self.directory.display(),
                        error = %err,
                        "Unable to re-arm directory watch"
                    );
                }
                self.raise("identity changed");
            }
            Some(RawEvent::Entry { change, name }) => {
                trace!(?change, name = name.as_deref().unwrap_or(""), "Fragment entry changed");
                self.raise("entry changed");
            }
            None => {}
        }
    }

    fn raise(&mut self, source: &'static str) {
        if self.debouncer.trigger(Instant::now()) {
            debug!(
                source,
                window_ms = self.debouncer.window().as_millis() as u64,
                "Change notification scheduled"
            );
        }
    }

    fn on_deadline(&mut self) {
        if !self.debouncer.fire(Instant::now()) {
            return;
        }

        self.serial += 1;
        let receivers = self
            .notifications
            .send(ChangeNotification::records_changed(self.serial))
            .unwrap_or(0);
        debug!(serial = self.serial, receivers, "Records changed");
    }

    fn stop(&mut self) {
        if self.debouncer.cancel() {
            debug!("Pending change notification cancelled");
        }
        self.watcher = None;
        self.events = None;
        info!(directory = %self.directory.display(), "Registry service stopped");
    }
}

async fn next_event(
    events: &mut Option<mpsc::UnboundedReceiver<notify::Result<Event>>>,
) -> Option<notify::Result<Event>> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

/// Read-modify-write of one fragment.
fn update_fragment(directory: &Path, request: UpdateRequest) -> Result<()> {
    let UpdateRequest {
        filename,
        record,
        attributes,
    } = request;

    if !is_plain_file_name(&filename) {
        return Err(RegistryError::InvalidFilename(filename));
    }

    let path = directory.join(&filename);
    let mut fragment = match read_fragment(&path) {
        Ok(fragment) => fragment,
        Err(FragmentError::NotFound(_)) => Fragment::new(),
        Err(FragmentError::Parse { source, .. }) => {
            warn!(
                file = %path.display(),
                error = %source,
                "Refusing to replace corrupted fragment"
            );
            return Err(RegistryError::CorruptFragment {
                filename,
                reason: source.to_string(),
            });
        }
        Err(err) => return Err(err.into()),
    };

    merge_attributes(&mut fragment, &record, attributes);

    fs::create_dir_all(directory).map_err(|source| RegistryError::Io {
        path: directory.to_path_buf(),
        source,
    })?;
    write_fragment(&path, &fragment)?;

    debug!(file = %path.display(), record = %record, "Fragment updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn attrs(value: serde_json::Value) -> AttributeMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn update_creates_directory_and_file() {
        let temp = TempDir::new().unwrap();
        let directory = temp.path().join("nested").join("machines.d");

        update_fragment(
            &directory,
            UpdateRequest::new("hosts.json", "host1", attrs(json!({"x": 1}))),
        )
        .unwrap();

        let fragment = read_fragment(&directory.join("hosts.json")).unwrap();
        assert_eq!(json!(fragment), json!({"host1": {"x": 1}}));
    }

    #[test]
    fn update_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        let err = update_fragment(
            temp.path(),
            UpdateRequest::new("../outside.json", "host1", AttributeMap::new()),
        )
        .unwrap_err();

        assert!(matches!(err, RegistryError::InvalidFilename(_)));
        assert!(!temp.path().parent().unwrap().join("outside.json").exists());
    }

    #[test]
    fn update_keeps_other_records() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("hosts.json"),
            json!({"a": {"k": 1}, "b": {"k": 2}}).to_string(),
        )
        .unwrap();

        update_fragment(
            temp.path(),
            UpdateRequest::new("hosts.json", "b", attrs(json!({"j": 3}))),
        )
        .unwrap();

        let fragment = read_fragment(&temp.path().join("hosts.json")).unwrap();
        assert_eq!(json!(fragment), json!({"a": {"k": 1}, "b": {"k": 2, "j": 3}}));
    }
}
