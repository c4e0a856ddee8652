//! Store watcher: filesystem events under the store root become
//! [`ChangeNotifier::notify`] calls.

use std::sync::Arc;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use pharsync_core::{FileStore, Identity};

use crate::coalescer::ChangeNotifier;
use crate::error::DaemonError;

/// A registered recursive watch on the store root.
///
/// The watch is live once [`StoreWatcher::start`] returns. Events that land
/// before [`StoreWatcher::run`] is polled are buffered, not lost.
pub(crate) struct StoreWatcher {
    store: Arc<FileStore>,
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl StoreWatcher {
    /// Registers the watch. The root must exist.
    pub(crate) fn start(store: Arc<FileStore>) -> Result<Self, DaemonError> {
        let (event_tx, events) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        })?;
        watcher.watch(store.root(), RecursiveMode::Recursive)?;
        tracing::info!(path = %store.root().display(), "watching plugin store");
        Ok(Self {
            store,
            _watcher: watcher,
            events,
        })
    }

    /// Forwards store changes to `notifier` until shutdown.
    pub(crate) async fn run(
        mut self,
        notifier: ChangeNotifier,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), DaemonError> {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    let event = match event {
                        Ok(event) => event,
                        Err(err) => {
                            tracing::warn!(error = %err, "watcher event error");
                            continue;
                        }
                    };
                    for identity in identities_for_event(&self.store, &event) {
                        tracing::debug!(identity = %identity, kind = ?event.kind, "plugin changed");
                        notifier.notify(identity);
                    }
                }
            }
        }

        Ok(())
    }
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Identities touched by `event`. Temp files, directories and foreign files
/// map to nothing.
pub(crate) fn identities_for_event(store: &FileStore, event: &Event) -> Vec<Identity> {
    if !is_relevant_event_kind(&event.kind) {
        return Vec::new();
    }
    let mut identities = Vec::new();
    for path in &event.paths {
        match store.identity_for_path(path) {
            Some(identity) if !identities.contains(&identity) => identities.push(identity),
            Some(_) => {}
            None => tracing::trace!(path = %path.display(), "ignoring store event"),
        }
    }
    identities
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind, RenameMode};
    use std::path::PathBuf;
    use std::time::Duration;

    fn store() -> FileStore {
        FileStore::new("/srv/store")
    }

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn create_modify_remove_map_to_identities() {
        for kind in [
            EventKind::Create(CreateKind::File),
            EventKind::Modify(ModifyKind::Any),
            EventKind::Remove(RemoveKind::File),
        ] {
            let ids = identities_for_event(&store(), &event(kind, &["/srv/store/survival/econ.yaml"]));
            assert_eq!(ids, vec![Identity::new("survival", "econ")], "kind {kind:?}");
        }
    }

    #[test]
    fn atomic_rename_reports_only_the_final_file() {
        let ids = identities_for_event(
            &store(),
            &event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &[
                    "/srv/store/survival/econ.yaml.tmp",
                    "/srv/store/survival/econ.yaml",
                ],
            ),
        );
        assert_eq!(ids, vec![Identity::new("survival", "econ")]);
    }

    #[test]
    fn access_events_and_foreign_paths_are_ignored() {
        let access = event(
            EventKind::Access(AccessKind::Any),
            &["/srv/store/survival/econ.yaml"],
        );
        assert!(identities_for_event(&store(), &access).is_empty());

        let foreign = event(
            EventKind::Create(CreateKind::Any),
            &[
                "/srv/store/survival",
                "/srv/store/survival/notes.txt",
                "/elsewhere/survival/econ.yaml",
            ],
        );
        assert!(identities_for_event(&store(), &foreign).is_empty());
    }

    #[tokio::test]
    async fn writes_under_root_reach_the_coalescer() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = std::fs::canonicalize(tmp.path()).unwrap();
        std::fs::create_dir_all(root.join("survival")).unwrap();
        let store = Arc::new(FileStore::new(&root));
        let (notifier, mut coalescer) = crate::coalescer::channel();
        let (shutdown_tx, _) = broadcast::channel::<()>(4);

        let watcher = StoreWatcher::start(store).unwrap();
        let task = tokio::spawn(watcher.run(notifier, shutdown_tx.subscribe()));

        std::fs::write(root.join("survival/econ.yaml"), b"spec: {}\n").unwrap();

        let woke = tokio::time::timeout(Duration::from_secs(5), coalescer.wait())
            .await
            .expect("no change notification");
        assert!(woke);
        assert!(coalescer.drain().contains(&Identity::new("survival", "econ")));

        shutdown_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn changes_after_start_are_kept_until_the_loop_runs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = std::fs::canonicalize(tmp.path()).unwrap();
        std::fs::create_dir_all(root.join("lobby")).unwrap();
        let store = Arc::new(FileStore::new(&root));
        let (notifier, mut coalescer) = crate::coalescer::channel();
        let (shutdown_tx, _) = broadcast::channel::<()>(4);

        // Registered here, before anything lists the store.
        let watcher = StoreWatcher::start(store).unwrap();
        std::fs::write(root.join("lobby/portal.yaml"), b"spec: {}\n").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let task = tokio::spawn(watcher.run(notifier, shutdown_tx.subscribe()));
        let woke = tokio::time::timeout(Duration::from_secs(5), coalescer.wait())
            .await
            .expect("change before the loop started was dropped");
        assert!(woke);
        assert!(coalescer.drain().contains(&Identity::new("lobby", "portal")));

        shutdown_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[test]
    fn start_fails_for_missing_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(FileStore::new(tmp.path().join("absent")));
        assert!(matches!(
            StoreWatcher::start(store),
            Err(DaemonError::Notify(_))
        ));
    }
}
