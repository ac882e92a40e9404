//! The reconciliation engine
//!
//! `Containers` is the plain configuration record parsed from YAML;
//! `build` validates it and returns the `Engine` handle, which is the
//! only type exposing `check_current_state` and `execute`. The split
//! forces validation before any host is touched.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::container::HostConfiguredContainer;
use crate::diff;
use crate::error::CoreError;
use crate::factory::SessionFactory;
use crate::state::ContainersState;

/// Persisted orchestration document
///
/// Two optional slots: the state persisted after the last run and the
/// user-defined desired state. Unknown top-level fields are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Containers {
    /// State of the containers after the last run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<ContainersState>,
    /// Containers that should exist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_state: Option<ContainersState>,
}

impl Containers {
    /// Parse a document from YAML
    pub fn from_yaml(content: &str) -> Result<Self, CoreError> {
        serde_yaml::from_str(content).map_err(|e| CoreError::Parse(e.to_string()))
    }

    /// Serialize the document to YAML
    pub fn to_yaml(&self) -> Result<String, CoreError> {
        serde_yaml::to_string(self).map_err(|e| CoreError::Serialize(e.to_string()))
    }

    /// Check the configuration without performing any I/O
    pub fn validate(&self) -> Result<(), CoreError> {
        let previous = self.previous_state.as_ref();
        let desired = self.desired_state.as_ref();

        if previous.is_none_or(ContainersState::is_empty)
            && desired.is_none_or(ContainersState::is_empty)
        {
            return Err(CoreError::Validation(vec![
                "either previous state or desired state must have containers defined".to_string(),
            ]));
        }

        let mut problems = Vec::new();
        if let Some(state) = previous {
            problems.extend(state.validate());
        }
        if let Some(state) = desired {
            problems.extend(state.validate());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(problems))
        }
    }

    /// Validate the configuration and return the executable engine
    pub fn build(self, factory: Arc<dyn SessionFactory>) -> Result<Engine, CoreError> {
        self.validate()?;

        Ok(Engine {
            previous: self.previous_state.unwrap_or_default(),
            current: None,
            desired: self.desired_state.unwrap_or_default(),
            factory,
            cancel: CancellationToken::new(),
        })
    }
}

/// Validated, executable reconciliation engine
pub struct Engine {
    /// State from the last run; consumed on the first state check
    previous: ContainersState,
    /// What actually exists; `None` until `check_current_state` ran
    current: Option<ContainersState>,
    /// What should exist
    desired: ContainersState,
    factory: Arc<dyn SessionFactory>,
    cancel: CancellationToken,
}

impl Engine {
    /// Attach a caller-supplied cancellation token
    ///
    /// When tripped, the in-flight remote call reports canceled, no
    /// further work is launched and partial progress stays reflected in
    /// the current state.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Refresh the current state against what the hosts report
    ///
    /// The first call takes ownership of the previous state as the
    /// initial guess; every call re-probes each container's status and
    /// re-reads its config files. Safe to call repeatedly; must be
    /// called at least once before `execute`.
    pub async fn check_current_state(&mut self) -> Result<(), CoreError> {
        let cancel = self.cancel.clone();
        let factory = Arc::clone(&self.factory);

        let current = self
            .current
            .get_or_insert_with(|| std::mem::take(&mut self.previous));

        with_cancel(&cancel, current.check_state(&factory)).await
    }

    /// Drive the containers toward the desired state
    ///
    /// Three ordered passes: prune ghosts and revive stopped containers,
    /// configure and create missing ones, then update changed ones and
    /// remove those no longer desired. Fails fast on the first error;
    /// completed transitions are not rolled back and remain visible in
    /// the exported state.
    pub async fn execute(&mut self) -> Result<(), CoreError> {
        if self.current.is_none() {
            return Err(CoreError::PreconditionsNotMet);
        }

        info!("checking for stopped and missing containers");

        self.prune_and_restart().await?;

        info!("configuring and creating new containers");

        for name in self.desired.names() {
            self.ensure_configured(&name).await?;
            self.ensure_exists(&name).await?;
        }

        info!("updating existing containers");

        let cancel = self.cancel.clone();
        let factory = Arc::clone(&self.factory);

        for name in self.current_ref()?.names() {
            if self.updatable(&name) {
                // This can move containers between hosts, but not the data.
                self.ensure_host(&name).await?;
                self.ensure_configured(&name).await?;
                self.ensure_container(&name).await?;
            }

            // Removals come last so the earlier steps see a consistent view.
            if !self.desired.contains(&name) {
                let current = self.current_mut()?;
                with_cancel(&cancel, current.remove_container(&name, &factory)).await?;
            }
        }

        Ok(())
    }

    /// Refresh current state, then execute
    pub async fn deploy(&mut self) -> Result<(), CoreError> {
        self.check_current_state().await?;
        self.execute().await
    }

    /// Exported document: the containers the engine believes exist, plus
    /// the desired state it was built with
    #[must_use]
    pub fn to_exported(&self) -> Containers {
        let previous = self
            .current
            .clone()
            .unwrap_or_else(|| self.previous.clone());

        Containers {
            previous_state: non_empty(previous),
            desired_state: non_empty(self.desired.clone()),
        }
    }

    /// Serialize only the previous-state slot, for minimal persistence
    pub fn current_state_to_yaml(&self) -> Result<String, CoreError> {
        let exported = Containers {
            previous_state: self.to_exported().previous_state,
            desired_state: None,
        };
        exported.to_yaml()
    }

    fn current_ref(&self) -> Result<&ContainersState, CoreError> {
        self.current.as_ref().ok_or(CoreError::PreconditionsNotMet)
    }

    fn current_mut(&mut self) -> Result<&mut ContainersState, CoreError> {
        self.current.as_mut().ok_or(CoreError::PreconditionsNotMet)
    }

    /// A name can be updated only when present in both current and
    /// desired state; otherwise it is created or removed instead.
    fn updatable(&self, name: &str) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| current.contains(name))
            && self.desired.contains(name)
    }

    /// Pass 1: drop entries the host no longer knows, start stopped ones
    async fn prune_and_restart(&mut self) -> Result<(), CoreError> {
        let cancel = self.cancel.clone();
        let factory = Arc::clone(&self.factory);
        let current = self.current_mut()?;

        for name in current.names() {
            let (exists, running) = match current.get(&name) {
                Some(entry) => (entry.container.exists(), entry.container.is_running()),
                None => continue,
            };

            if !exists {
                info!(container = %name, "dropping container unknown to its host");
                current.forget(&name);
                continue;
            }

            if !running {
                info!(container = %name, "starting stopped container");
                with_cancel(&cancel, current.start_container(&name, &factory)).await?;
            }
        }

        Ok(())
    }

    /// Make sure the named container's config files match the desired
    /// content, writing exactly the drifted set
    async fn ensure_configured(&mut self, name: &str) -> Result<(), CoreError> {
        // Not desired means the container goes away anyway.
        let Some(desired) = self.desired.get(name).cloned() else {
            return Ok(());
        };

        let files = files_to_update(&desired, self.current_ref()?.get(name));

        if !files.is_empty() {
            let cancel = self.cancel.clone();
            let factory = Arc::clone(&self.factory);
            with_cancel(&cancel, self.desired.configure(name, &files, &factory)).await?;
        }

        let current = self.current_mut()?;
        let entry = current.entry_or_insert(name, desired.clone());
        entry.config_files = desired.config_files;

        Ok(())
    }

    /// Make sure the named container exists, creating it from desired
    /// state when the host does not have it
    async fn ensure_exists(&mut self, name: &str) -> Result<(), CoreError> {
        if self
            .current_ref()?
            .get(name)
            .is_some_and(|entry| entry.container.exists())
        {
            return Ok(());
        }

        info!(container = %name, "creating new container");

        let cancel = self.cancel.clone();
        let factory = Arc::clone(&self.factory);
        with_cancel(&cancel, self.desired.create_and_start(name, &factory)).await?;

        self.publish_desired(name)
    }

    /// Make sure the named container runs on the right host; any host
    /// change removes the old container and creates a new one
    async fn ensure_host(&mut self, name: &str) -> Result<(), CoreError> {
        let (Some(current), Some(desired)) = (self.current_ref()?.get(name), self.desired.get(name))
        else {
            return Ok(());
        };

        let Some(drift) = diff::diff(&current.host, &desired.host) else {
            return Ok(());
        };

        info!(container = %name, diff = %drift, "host configuration drift detected");

        self.recreate(name).await
    }

    /// Make sure the named container's runtime spec is up to date; any
    /// spec change removes the old container and creates a new one
    async fn ensure_container(&mut self, name: &str) -> Result<(), CoreError> {
        let (Some(current), Some(desired)) = (self.current_ref()?.get(name), self.desired.get(name))
        else {
            return Ok(());
        };

        let Some(drift) = diff::diff(&current.container.config, &desired.container.config) else {
            return Ok(());
        };

        info!(container = %name, diff = %drift, "container configuration drift detected");

        self.recreate(name).await
    }

    /// Remove the current container and create the desired one
    async fn recreate(&mut self, name: &str) -> Result<(), CoreError> {
        let cancel = self.cancel.clone();
        let factory = Arc::clone(&self.factory);

        let current = self.current_mut()?;
        with_cancel(&cancel, current.remove_container(name, &factory)).await?;

        with_cancel(&cancel, self.desired.create_and_start(name, &factory)).await?;

        self.publish_desired(name)
    }

    /// Copy the desired entry, carrying its freshly observed status,
    /// into the current state
    fn publish_desired(&mut self, name: &str) -> Result<(), CoreError> {
        let desired = self
            .desired
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownContainer(name.to_string()))?;

        self.current_mut()?.insert(name, desired);

        Ok(())
    }
}

/// Paths whose desired content is absent from or differs from the
/// current state, with a drift report per file
fn files_to_update(
    desired: &HostConfiguredContainer,
    current: Option<&HostConfiguredContainer>,
) -> Vec<String> {
    // Without a current entry every file needs to be written.
    let Some(current) = current else {
        return desired.config_files.keys().cloned().collect();
    };

    let mut files = Vec::new();

    for (path, content) in &desired.config_files {
        let existing = current.config_files.get(path);
        if existing != Some(content) {
            info!(
                path = %path,
                current = existing.map_or("<absent>", String::as_str),
                desired = %content,
                "configuration file drift detected"
            );
            files.push(path.clone());
        }
    }

    files
}

async fn with_cancel<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = Result<T, CoreError>>,
) -> Result<T, CoreError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(CoreError::Canceled),
        result = operation => result,
    }
}

fn non_empty(state: ContainersState) -> Option<ContainersState> {
    if state.is_empty() { None } else { Some(state) }
}
