//! Container state map
//!
//! A `ContainersState` maps a stable, user-chosen name to one
//! `HostConfiguredContainer`. The bulk operations here are the only
//! place the engine touches transports and runtimes.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use berth_exec::ExecError;

use crate::container::HostConfiguredContainer;
use crate::error::CoreError;
use crate::factory::SessionFactory;

/// Mapping from container name to its definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainersState(BTreeMap<String, HostConfiguredContainer>);

impl ContainersState {
    /// Whether the state holds no containers
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of containers in the state
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the state contains the given name
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Look up a container by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HostConfiguredContainer> {
        self.0.get(name)
    }

    /// Look up a container by name, mutably
    pub fn get_mut(&mut self, name: &str) -> Option<&mut HostConfiguredContainer> {
        self.0.get_mut(name)
    }

    /// Insert or replace a container
    pub fn insert(&mut self, name: impl Into<String>, container: HostConfiguredContainer) {
        self.0.insert(name.into(), container);
    }

    /// Drop a container entry without touching the host
    pub fn forget(&mut self, name: &str) {
        self.0.remove(name);
    }

    /// Insert the given container if the name is absent, then return the entry
    pub fn entry_or_insert(
        &mut self,
        name: &str,
        container: HostConfiguredContainer,
    ) -> &mut HostConfiguredContainer {
        self.0.entry(name.to_string()).or_insert(container)
    }

    /// Snapshot of the names in the state
    ///
    /// Iteration while mutating the map goes through this snapshot.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    /// Iterate over name/container pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &HostConfiguredContainer)> {
        self.0.iter()
    }

    /// Check every container's definition, returning all problems found
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (name, container) in &self.0 {
            if name.is_empty() {
                problems.push("container name must not be empty".to_string());
            }
            for problem in container.validate() {
                problems.push(format!("container '{name}': {problem}"));
            }
        }

        problems
    }

    /// Refresh every container's status and re-read its config files
    ///
    /// After this call, each entry's status reflects what the daemon
    /// reports and its file map holds the content actually present on
    /// the host; files missing on the host are dropped from the map so
    /// drift comparison sees them as absent.
    pub async fn check_state(&mut self, factory: &Arc<dyn SessionFactory>) -> Result<(), CoreError> {
        for (name, container) in &mut self.0 {
            let runtime = factory
                .runtime(&container.host)
                .await
                .map_err(|e| transport(name, e))?;

            let status = runtime
                .inspect(&container.container.config.name)
                .await
                .map_err(|source| CoreError::Runtime {
                    name: name.clone(),
                    source,
                })?;

            debug!(
                container = %name,
                exists = status.exists,
                running = status.running,
                "container status refreshed"
            );

            container.container.status = Some(status);

            let session = factory
                .session(&container.host)
                .await
                .map_err(|e| transport(name, e))?;

            let mut observed = BTreeMap::new();
            for path in container.config_files.keys() {
                let content =
                    session
                        .read(path)
                        .await
                        .map_err(|source| CoreError::DriftCheck {
                            name: name.clone(),
                            path: path.clone(),
                            source,
                        })?;

                if let Some(bytes) = content {
                    observed.insert(path.clone(), String::from_utf8_lossy(&bytes).to_string());
                }
            }
            container.config_files = observed;
        }

        Ok(())
    }

    /// Write the listed config files of the named container to its host
    pub async fn configure(
        &self,
        name: &str,
        paths: &[String],
        factory: &Arc<dyn SessionFactory>,
    ) -> Result<(), CoreError> {
        let container = self
            .0
            .get(name)
            .ok_or_else(|| CoreError::UnknownContainer(name.to_string()))?;

        let session = factory
            .session(&container.host)
            .await
            .map_err(|e| transport(name, e))?;

        for path in paths {
            let Some(content) = container.config_files.get(path) else {
                continue;
            };

            session
                .copy(path, content.as_bytes())
                .await
                .map_err(|e| transport(name, e))?;

            info!(container = %name, path = %path, "configuration file written");
        }

        Ok(())
    }

    /// Materialize the named container on its host
    ///
    /// Pushes the config files, creates and starts the container and
    /// records the freshly observed status on the entry.
    pub async fn create_and_start(
        &mut self,
        name: &str,
        factory: &Arc<dyn SessionFactory>,
    ) -> Result<(), CoreError> {
        let container = self
            .0
            .get_mut(name)
            .ok_or_else(|| CoreError::UnknownContainer(name.to_string()))?;

        let session = factory
            .session(&container.host)
            .await
            .map_err(|e| transport(name, e))?;

        for (path, content) in &container.config_files {
            session
                .copy(path, content.as_bytes())
                .await
                .map_err(|e| transport(name, e))?;
        }

        let runtime = factory
            .runtime(&container.host)
            .await
            .map_err(|e| transport(name, e))?;

        let id = runtime
            .create(&container.container.config)
            .await
            .map_err(|source| CoreError::Runtime {
                name: name.to_string(),
                source,
            })?;

        runtime
            .start(&id)
            .await
            .map_err(|source| CoreError::Runtime {
                name: name.to_string(),
                source,
            })?;

        let status = runtime
            .inspect(&container.container.config.name)
            .await
            .map_err(|source| CoreError::Runtime {
                name: name.to_string(),
                source,
            })?;

        container.container.status = Some(status);

        Ok(())
    }

    /// Start the named container if the daemon knows it
    pub async fn start_container(
        &mut self,
        name: &str,
        factory: &Arc<dyn SessionFactory>,
    ) -> Result<(), CoreError> {
        let container = self
            .0
            .get_mut(name)
            .ok_or_else(|| CoreError::UnknownContainer(name.to_string()))?;

        let runtime = factory
            .runtime(&container.host)
            .await
            .map_err(|e| transport(name, e))?;

        let id = container
            .container
            .status
            .as_ref()
            .and_then(|s| s.id.clone())
            .unwrap_or_else(|| container.container.config.name.clone());

        runtime
            .start(&id)
            .await
            .map_err(|source| CoreError::Runtime {
                name: name.to_string(),
                source,
            })?;

        let status = runtime
            .inspect(&container.container.config.name)
            .await
            .map_err(|source| CoreError::Runtime {
                name: name.to_string(),
                source,
            })?;

        container.container.status = Some(status);

        Ok(())
    }

    /// Tear the named container down and drop it from the state
    ///
    /// Stops it if running, removes it from the daemon, deletes the
    /// config files it owns. A container the daemon no longer knows is
    /// only cleaned up; removing an absent name is a no-op.
    pub async fn remove_container(
        &mut self,
        name: &str,
        factory: &Arc<dyn SessionFactory>,
    ) -> Result<(), CoreError> {
        let Some(container) = self.0.get(name) else {
            return Ok(());
        };

        if let Some(status) = &container.container.status
            && status.exists
            && let Some(id) = &status.id
        {
            let runtime = factory
                .runtime(&container.host)
                .await
                .map_err(|e| transport(name, e))?;

            if status.running {
                runtime
                    .stop(id)
                    .await
                    .map_err(|source| CoreError::Runtime {
                        name: name.to_string(),
                        source,
                    })?;
            }

            runtime
                .remove(id)
                .await
                .map_err(|source| CoreError::Runtime {
                    name: name.to_string(),
                    source,
                })?;
        }

        let session = factory
            .session(&container.host)
            .await
            .map_err(|e| transport(name, e))?;

        for path in container.config_files.keys() {
            let result = session
                .run(&["rm".to_string(), "-f".to_string(), path.clone()])
                .await
                .map_err(|e| transport(name, e))?;

            if !result.success() {
                return Err(transport(
                    name,
                    ExecError::CommandFailed {
                        status: result.status,
                        stderr: result.stderr,
                    },
                ));
            }
        }

        info!(container = %name, "container removed");

        self.0.remove(name);

        Ok(())
    }
}

fn transport(name: &str, source: ExecError) -> CoreError {
    CoreError::Transport {
        name: name.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use berth_runtime::ContainerConfig;

    fn state_with(names: &[&str]) -> ContainersState {
        let mut state = ContainersState::default();
        for name in names {
            state.insert(
                *name,
                HostConfiguredContainer {
                    host: berth_exec::Host::default(),
                    container: Container {
                        config: ContainerConfig {
                            name: (*name).to_string(),
                            image: "img".to_string(),
                            ..Default::default()
                        },
                        status: None,
                    },
                    config_files: BTreeMap::new(),
                },
            );
        }
        state
    }

    #[test]
    fn test_names_snapshot() {
        let state = state_with(&["b", "a"]);
        assert_eq!(state.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_validate_attributes_name() {
        let mut state = state_with(&["a"]);
        state.get_mut("a").unwrap().container.config.image = String::new();

        let problems = state.validate();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("container 'a':"));
    }

    #[test]
    fn test_serde_transparent_roundtrip() {
        let state = state_with(&["a"]);
        let yaml = serde_yaml::to_string(&state).unwrap();
        assert!(yaml.starts_with("a:"));

        let back: ContainersState = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, state);
    }
}
