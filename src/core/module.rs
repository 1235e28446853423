//! Declarative modules and their initialization order.
use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;

use crate::{
    config::manager::ConfigurationDefinition,
    core::{
        container::{Container, Provider},
        error::{KernelError, KernelResult},
        route::ControllerDefinition,
    },
};

/// A unit of providers, configuration and hooks. Identified by its keyname.
#[async_trait]
pub trait Module: Send + Sync {
    /// Unique name. A module is instantiated at most once per kernel.
    fn keyname(&self) -> &str;

    /// Modules that must be fully initialized before this one.
    fn imports(&self) -> Vec<Arc<dyn Module>> {
        Vec::new()
    }

    fn providers(&self) -> Vec<Provider> {
        Vec::new()
    }

    fn configuration_definitions(&self) -> Vec<ConfigurationDefinition> {
        Vec::new()
    }

    /// Route declarations for the controllers this module provides.
    fn controllers(&self) -> Vec<ControllerDefinition> {
        Vec::new()
    }

    /// Runs right after this module's providers are registered, before configuration exists.
    async fn on_init(&self, _container: &mut Container) -> KernelResult<()> {
        Ok(())
    }

    /// Runs once configuration is loaded and the router is built.
    async fn after_init(&self, _container: &Container) -> KernelResult<()> {
        Ok(())
    }
}

/// Flatten the import graph rooted at `root` into initialization order.
///
/// Imports come before their importer, the first encounter of a keyname wins and later
/// encounters are skipped, so diamond imports initialize their shared module once. A module
/// that transitively imports itself is a [`KernelError::KernelInitialization`].
pub fn resolve_initialization_order(root: Arc<dyn Module>) -> KernelResult<Vec<Arc<dyn Module>>> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut in_progress = Vec::new();

    visit(root, &mut order, &mut visited, &mut in_progress)?;
    Ok(order)
}

fn visit(
    module: Arc<dyn Module>,
    order: &mut Vec<Arc<dyn Module>>,
    visited: &mut HashSet<String>,
    in_progress: &mut Vec<String>,
) -> KernelResult<()> {
    let keyname = module.keyname().to_string();
    if visited.contains(&keyname) {
        return Ok(());
    }

    if in_progress.contains(&keyname) {
        in_progress.push(keyname);
        return Err(KernelError::KernelInitialization(format!(
            "circular module import: {}",
            in_progress.join(" -> ")
        )));
    }

    in_progress.push(keyname.clone());
    for import in module.imports() {
        visit(import, order, visited, in_progress)?;
    }
    in_progress.pop();

    visited.insert(keyname);
    order.push(module);
    Ok(())
}
