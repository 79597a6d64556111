//! Waiter - Poll an object until it reaches a target status

use std::future::Future;
use std::time::Duration;

use crate::provider::{ProviderError, ProviderResult};

/// Refresh result: the raw object and its current status, or `None` when
/// the object does not exist
pub type Refreshed = Option<(serde_json::Value, String)>;

/// Status transition to wait for
///
/// An empty `target` means "wait until the object is gone".
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    pub pending: Vec<String>,
    pub target: Vec<String>,
    /// Wait before the first refresh
    pub delay: Duration,
    /// Wait between refreshes
    pub min_timeout: Duration,
    pub timeout: Duration,
    /// Consecutive not-found results tolerated before failing
    pub not_found_checks: u32,
}

impl Default for StateChangeConf {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            target: Vec::new(),
            delay: Duration::from_secs(1),
            min_timeout: Duration::from_secs(1),
            timeout: Duration::from_secs(600),
            not_found_checks: 20,
        }
    }
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str]) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    pub fn with_not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    /// Poll `refresh` until a target status (or disappearance, for an
    /// empty target) is observed
    pub async fn wait<F, Fut>(&self, mut refresh: F) -> ProviderResult<serde_json::Value>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<Refreshed>>,
    {
        let poll = async {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut not_found = 0;
            loop {
                match refresh().await? {
                    None if self.target.is_empty() => return Ok(serde_json::Value::Null),
                    None => {
                        not_found += 1;
                        if not_found > self.not_found_checks {
                            return Err(ProviderError::new(format!(
                                "Object not found after {} checks while waiting for {:?}",
                                not_found - 1,
                                self.target
                            )));
                        }
                    }
                    Some((object, status)) => {
                        not_found = 0;
                        if self.target.contains(&status) {
                            return Ok(object);
                        }
                        if !self.pending.contains(&status) {
                            return Err(ProviderError::new(format!(
                                "Unexpected status '{}', wanted {:?}",
                                status, self.target
                            )));
                        }
                        log::debug!("waiting: status '{}' still pending", status);
                    }
                }
                tokio::time::sleep(self.min_timeout).await;
            }
        };

        match tokio::time::timeout(self.timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::new(format!(
                "Timeout after {:?} waiting for status {:?}",
                self.timeout, self.target
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    fn scripted(steps: Vec<Refreshed>) -> Arc<Mutex<VecDeque<Refreshed>>> {
        Arc::new(Mutex::new(steps.into()))
    }

    fn status(s: &str) -> Refreshed {
        Some((json!({ "State": s }), s.to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn waits_through_pending_states() {
        let steps = scripted(vec![status("creating"), status("creating"), status("active")]);
        let conf = StateChangeConf::new(&["creating"], &["active"]);

        let object = conf
            .wait(|| {
                let steps = steps.clone();
                async move { Ok(steps.lock().unwrap().pop_front().flatten()) }
            })
            .await
            .unwrap();

        assert_eq!(object, json!({ "State": "active" }));
        assert!(steps.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_status_fails() {
        let steps = scripted(vec![status("error")]);
        let conf = StateChangeConf::new(&["creating"], &["active"]);
        let err = conf
            .wait(|| {
                let steps = steps.clone();
                async move { Ok(steps.lock().unwrap().pop_front().flatten()) }
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unexpected status 'error'"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_target_waits_for_disappearance() {
        let steps = scripted(vec![status("deleting"), None]);
        let conf = StateChangeConf::new(&["deleting"], &[]);
        let object = conf
            .wait(|| {
                let steps = steps.clone();
                async move { Ok(steps.lock().unwrap().pop_front().flatten()) }
            })
            .await
            .unwrap();
        assert!(object.is_null());
    }

    #[tokio::test(start_paused = true)]
    async fn too_many_not_found_results_fail() {
        let conf = StateChangeConf::new(&["creating"], &["active"]).with_not_found_checks(2);
        let err = conf
            .wait(|| async { Ok(None) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found after 2 checks"));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_while_pending() {
        let conf = StateChangeConf::new(&["creating"], &["active"])
            .with_timeout(Duration::from_secs(5));
        let err = conf
            .wait(|| async { Ok(status("creating")) })
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Timeout"));
    }
}
