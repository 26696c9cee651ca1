//! Service lifecycle coordination
//!
//! Every long-lived component of the pipeline (price oracle, subscription
//! manager, dispatcher, maintenance) runs as a `Service` registered with the
//! `ServiceManager`. The manager starts services in dependency + priority
//! order, hands each one the shared shutdown `Notify`, and stops them in
//! reverse order with a bounded wait per task handle.

mod health;
pub mod implementations;

pub use health::ServiceHealth;

use crate::logger::{log, LogTag};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Core service trait that all services must implement
#[async_trait]
pub trait Service: Send + Sync {
    /// Unique service identifier
    fn name(&self) -> &'static str;

    /// Service priority (lower = starts earlier, stops later)
    fn priority(&self) -> i32 {
        100
    }

    /// Services this service depends on
    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }

    /// Initialize the service
    async fn initialize(&mut self) -> Result<(), String> {
        Ok(())
    }

    /// Start the service
    async fn start(&mut self, shutdown: Arc<Notify>) -> Result<Vec<JoinHandle<()>>, String>;

    /// Stop the service
    async fn stop(&mut self) -> Result<(), String> {
        Ok(())
    }

    /// Check service health
    async fn health(&self) -> ServiceHealth {
        ServiceHealth::Healthy
    }
}

pub struct ServiceManager {
    services: HashMap<&'static str, Box<dyn Service>>,
    handles: HashMap<&'static str, Vec<JoinHandle<()>>>,
    shutdown: Arc<Notify>,
}

impl ServiceManager {
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
            handles: HashMap::new(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Register a service
    pub fn register(&mut self, service: Box<dyn Service>) {
        let name = service.name();
        self.services.insert(name, service);
    }

    /// Start all services in dependency and priority order
    pub async fn start_all(&mut self) -> Result<(), String> {
        log(LogTag::System, "INFO", "Starting all services...");

        let names: Vec<&'static str> = self.services.keys().copied().collect();
        let ordered = self.resolve_startup_order(&names)?;

        log(
            LogTag::System,
            "INFO",
            &format!("Service startup order: {:?}", ordered),
        );

        for service_name in ordered {
            if let Some(service) = self.services.get_mut(service_name) {
                service.initialize().await?;

                let handles = service.start(self.shutdown.clone()).await?;
                self.handles.insert(service_name, handles);

                log(
                    LogTag::System,
                    "SUCCESS",
                    &format!("✅ Service started: {}", service_name),
                );
            }
        }

        log(LogTag::System, "SUCCESS", "✅ All services started");
        Ok(())
    }

    /// Stop all services in reverse startup order
    pub async fn stop_all(&mut self) -> Result<(), String> {
        log(LogTag::System, "INFO", "Stopping all services...");

        // Signal shutdown to every task first
        self.shutdown.notify_waiters();

        let running: Vec<&'static str> = self.handles.keys().copied().collect();
        let mut ordered = self.resolve_startup_order(&running)?;
        ordered.reverse();

        for service_name in ordered {
            if let Some(service) = self.services.get_mut(service_name) {
                if let Err(e) = service.stop().await {
                    log(
                        LogTag::System,
                        "WARN",
                        &format!("Service stop error for {}: {}", service_name, e),
                    );
                }

                if let Some(handles) = self.handles.remove(service_name) {
                    for handle in handles {
                        let _ = tokio::time::timeout(
                            tokio::time::Duration::from_secs(35),
                            handle,
                        )
                        .await;
                    }
                }

                log(
                    LogTag::System,
                    "INFO",
                    &format!("Service stopped: {}", service_name),
                );
            }
        }

        log(LogTag::System, "SUCCESS", "✅ All services stopped");
        Ok(())
    }

    /// Resolve service startup order (dependencies first, then priority)
    fn resolve_startup_order(
        &self,
        services: &[&'static str],
    ) -> Result<Vec<&'static str>, String> {
        use std::collections::HashSet;

        let mut ordered = Vec::new();
        let mut visited = HashSet::new();
        let mut visiting = HashSet::new();

        fn visit(
            name: &'static str,
            services: &HashMap<&'static str, Box<dyn Service>>,
            ordered: &mut Vec<&'static str>,
            visited: &mut HashSet<&'static str>,
            visiting: &mut HashSet<&'static str>,
        ) -> Result<(), String> {
            if visited.contains(name) {
                return Ok(());
            }

            if visiting.contains(name) {
                return Err(format!("Circular dependency detected for service: {}", name));
            }

            visiting.insert(name);

            if let Some(service) = services.get(name) {
                for dep in service.dependencies() {
                    visit(dep, services, ordered, visited, visiting)?;
                }
            }

            visiting.remove(name);
            visited.insert(name);
            ordered.push(name);

            Ok(())
        }

        for &service_name in services {
            visit(
                service_name,
                &self.services,
                &mut ordered,
                &mut visited,
                &mut visiting,
            )?;
        }

        ordered.sort_by_key(|name| {
            self.services
                .get(name)
                .map(|s| s.priority())
                .unwrap_or(100)
        });

        Ok(ordered)
    }

    /// Health status of every registered service
    pub async fn get_health(&self) -> HashMap<&'static str, ServiceHealth> {
        let mut health = HashMap::new();
        for (name, service) in &self.services {
            health.insert(*name, service.health().await);
        }
        health
    }
}
