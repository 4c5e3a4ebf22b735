//! Acceptance test harness
//!
//! Drives the apply engine through rendered documents, the same way an
//! operator would, and checks what ends up in state and on the manager.
//! Runs against a live NSX Manager ([`crate::nsx::client::NsxClient`]) or
//! against [`crate::nsx::memory::InMemoryNsx`].
//!
//! Every scenario finishes by destroying what it created and verifying that
//! nothing named after the test is left behind.

use crate::apply::{self, Document};
use crate::nsx::LoadBalancerApi;
use crate::provider::Provider;
use crate::resource::{LbL4MonitorController, Protocol, ResourceAddress, StateEntry, StateFile};
use anyhow::{anyhow, bail, Context, Result};

pub const TEST_DISPLAY_NAME: &str = "test-nsx-monitor";
const TEST_RESOURCE_NAME: &str = "test";

/// Full monitor template; every attribute is set explicitly
#[allow(clippy::too_many_arguments)]
pub fn render_monitor_config(
    protocol: Protocol,
    name: &str,
    count: u32,
    interval: u32,
    port: u16,
    timeout: u32,
    send: &str,
    receive: &str,
) -> String {
    format!(
        r#"resources:
  - type: {kind}
    name: {resource}
    config:
      description: "test description"
      display_name: "{name}"
      fall_count: "{count}"
      interval: "{interval}"
      monitor_port: "{port}"
      rise_count: "{count}"
      timeout: "{timeout}"
      send: "{send}"
      receive: "{receive}"
      tag:
        - scope: "scope1"
          tag: "tag1"
"#,
        kind = protocol.resource_kind(),
        resource = TEST_RESOURCE_NAME,
    )
}

/// Minimal template; everything else is left to defaults
pub fn render_trivial_config(protocol: Protocol) -> String {
    format!(
        r#"resources:
  - type: {kind}
    name: {resource}
    config:
      description: "test description"
      send: "Client hello"
      receive: "Server hello"
"#,
        kind = protocol.resource_kind(),
        resource = TEST_RESOURCE_NAME,
    )
}

/// Assertion run after an apply step
#[derive(Debug, Clone)]
pub enum Check {
    /// The object behind `address` answers a GET with this display name
    Exists {
        address: ResourceAddress,
        display_name: String,
    },
    /// A flattened state attribute has exactly this value
    Attr {
        address: ResourceAddress,
        key: String,
        expected: String,
    },
}

impl Check {
    pub fn attr(address: &ResourceAddress, key: &str, expected: impl ToString) -> Self {
        Self::Attr {
            address: address.clone(),
            key: key.to_string(),
            expected: expected.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TestStep {
    Apply { config: String, checks: Vec<Check> },
    /// Import the applied object into a fresh entry and compare attributes
    ImportVerify { address: ResourceAddress },
}

#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub protocol: Protocol,
    pub steps: Vec<TestStep>,
    /// Display name that must not survive the destroy step
    pub destroy_check: String,
}

/// Create, check, update, check (`TestAccResourceNsxtLb*Monitor_basic`)
pub fn basic(protocol: Protocol) -> TestCase {
    let address = ResourceAddress::new(protocol.resource_kind(), TEST_RESOURCE_NAME);
    let updated_name = format!("{}-update", TEST_DISPLAY_NAME);
    let (send, receive) = ("Client hello", "Server hello");
    let (interval, timeout) = (9, 12);

    let step = |name: &str, count: u32, port: u16| TestStep::Apply {
        config: render_monitor_config(protocol, name, count, interval, port, timeout, send, receive),
        checks: vec![
            Check::Exists {
                address: address.clone(),
                display_name: name.to_string(),
            },
            Check::attr(&address, "display_name", name),
            Check::attr(&address, "description", "test description"),
            Check::attr(&address, "fall_count", count),
            Check::attr(&address, "rise_count", count),
            Check::attr(&address, "interval", interval),
            Check::attr(&address, "timeout", timeout),
            Check::attr(&address, "monitor_port", port),
            Check::attr(&address, "send", send),
            Check::attr(&address, "receive", receive),
            Check::attr(&address, "tag.#", 1),
        ],
    };

    TestCase {
        name: format!("lb_{}_monitor_basic", protocol),
        protocol,
        steps: vec![step(TEST_DISPLAY_NAME, 2, 7887), step(&updated_name, 5, 8778)],
        destroy_check: TEST_DISPLAY_NAME.to_string(),
    }
}

/// Trivial create followed by import verification
pub fn import_basic(protocol: Protocol) -> TestCase {
    let address = ResourceAddress::new(protocol.resource_kind(), TEST_RESOURCE_NAME);

    TestCase {
        name: format!("lb_{}_monitor_import_basic", protocol),
        protocol,
        steps: vec![
            TestStep::Apply {
                config: render_trivial_config(protocol),
                checks: Vec::new(),
            },
            TestStep::ImportVerify { address },
        ],
        destroy_check: TEST_DISPLAY_NAME.to_string(),
    }
}

/// Runs test cases against one provider
pub struct Harness<A> {
    provider: Provider<A>,
}

impl<A: LoadBalancerApi + Clone> Harness<A> {
    pub fn new(api: A) -> Self {
        Self {
            provider: Provider::new(api),
        }
    }

    /// Run all steps, then destroy and run the destroy check
    ///
    /// The destroy step runs even when a step failed; the step error wins.
    pub async fn run(&self, case: &TestCase) -> Result<()> {
        tracing::info!("Running acceptance case {}", case.name);
        let mut state = StateFile::new();

        let steps = self.run_steps(case, &mut state).await;

        let snapshot: Vec<StateEntry> = state.resources.values().cloned().collect();
        let destroyed = apply::destroy(&self.provider, &mut state)
            .await
            .with_context(|| format!("{}: destroy failed", case.name));

        steps?;
        destroyed?;
        self.check_destroy(case, &snapshot)
            .await
            .with_context(|| format!("{}: destroy check failed", case.name))?;

        tracing::info!("Acceptance case {} passed", case.name);
        Ok(())
    }

    async fn run_steps(&self, case: &TestCase, state: &mut StateFile) -> Result<()> {
        for (index, step) in case.steps.iter().enumerate() {
            let label = format!("{} step {}", case.name, index + 1);
            match step {
                TestStep::Apply { config, checks } => {
                    let document = Document::parse(config).with_context(|| label.clone())?;
                    let plan = apply::plan(&self.provider, &document, state)
                        .await
                        .with_context(|| format!("{}: plan failed", label))?;
                    apply::apply(&self.provider, &plan, state)
                        .await
                        .with_context(|| format!("{}: apply failed", label))?;

                    for check in checks {
                        self.check(check, state)
                            .await
                            .with_context(|| format!("{}: check failed", label))?;
                    }
                }
                TestStep::ImportVerify { address } => {
                    self.import_verify(address, state)
                        .await
                        .with_context(|| format!("{}: import verification failed", label))?;
                }
            }
        }
        Ok(())
    }

    async fn check(&self, check: &Check, state: &StateFile) -> Result<()> {
        match check {
            Check::Exists {
                address,
                display_name,
            } => {
                let entry = state
                    .get(address)
                    .ok_or_else(|| anyhow!("{} not found in state", address))?;
                if entry.id.is_empty() {
                    bail!("{} has no id in state", address);
                }

                let controller = LbL4MonitorController::new(self.provider.api().clone(), entry.protocol()?);
                let monitor = controller
                    .read(&entry.id)
                    .await
                    .with_context(|| format!("Error while checking if {} exists", address))?;
                if monitor.display_name != *display_name {
                    bail!(
                        "LB {} monitor {} wasn't found (display name is {:?})",
                        controller.protocol(),
                        display_name,
                        monitor.display_name
                    );
                }
                Ok(())
            }
            Check::Attr {
                address,
                key,
                expected,
            } => {
                let entry = state
                    .get(address)
                    .ok_or_else(|| anyhow!("{} not found in state", address))?;
                match entry.attribute(key) {
                    Some(actual) if actual == *expected => Ok(()),
                    Some(actual) => bail!(
                        "{}: attribute '{}' expected {:?}, got {:?}",
                        address,
                        key,
                        expected,
                        actual
                    ),
                    None => bail!("{}: attribute '{}' not set, expected {:?}", address, key, expected),
                }
            }
        }
    }

    async fn import_verify(&self, address: &ResourceAddress, state: &StateFile) -> Result<()> {
        let applied = state
            .get(address)
            .ok_or_else(|| anyhow!("{} not found in state", address))?;

        let mut fresh = StateFile::new();
        apply::import(&self.provider, &mut fresh, address, &applied.id).await?;
        let imported = fresh
            .get(address)
            .ok_or_else(|| anyhow!("{} missing after import", address))?;

        if imported.id != applied.id {
            bail!("imported id {} differs from {}", imported.id, applied.id);
        }
        for key in applied.attributes.keys().chain(imported.attributes.keys()) {
            let (expected, actual) = (applied.attributes.get(key), imported.attributes.get(key));
            if expected != actual {
                bail!(
                    "{}: imported attribute '{}' is {:?}, applied state has {:?}",
                    address,
                    key,
                    actual,
                    expected
                );
            }
        }
        Ok(())
    }

    /// Every monitor of the case's kind must be gone or renamed
    async fn check_destroy(&self, case: &TestCase, entries: &[StateEntry]) -> Result<()> {
        let controller = LbL4MonitorController::new(self.provider.api().clone(), case.protocol);

        for entry in entries.iter().filter(|e| e.kind == case.protocol.resource_kind()) {
            match controller.read(&entry.id).await {
                Ok(monitor) if monitor.display_name == case.destroy_check => {
                    bail!("LB {} monitor {} still exists", case.protocol, case.destroy_check);
                }
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Error while retrieving LB {} monitor with ID {}", case.protocol, entry.id)
                    })
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nsx::memory::InMemoryNsx;

    #[test]
    fn test_rendered_configs_parse() {
        for protocol in [Protocol::Tcp, Protocol::Udp] {
            let full = render_monitor_config(protocol, "m", 2, 9, 7887, 12, "a", "b");
            let document = Document::parse(&full).unwrap();
            assert_eq!(document.resources[0].kind, protocol.resource_kind());
            assert_eq!(document.resources[0].config["monitor_port"], "7887");

            assert!(Document::parse(&render_trivial_config(protocol)).is_ok());
        }
    }

    #[tokio::test]
    async fn test_failed_check_still_destroys() {
        let nsx = InMemoryNsx::new();
        let harness = Harness::new(nsx.clone());
        let address = ResourceAddress::new("nsxt_lb_tcp_monitor", TEST_RESOURCE_NAME);

        let case = TestCase {
            name: "wrong_port".to_string(),
            protocol: Protocol::Tcp,
            steps: vec![TestStep::Apply {
                config: render_trivial_config(Protocol::Tcp),
                checks: vec![Check::attr(&address, "monitor_port", 80)],
            }],
            destroy_check: TEST_DISPLAY_NAME.to_string(),
        };

        let err = harness.run(&case).await.unwrap_err();
        assert!(format!("{:#}", err).contains("monitor_port"));
        assert!(nsx.is_empty().await);
    }

    #[tokio::test]
    async fn test_destroy_check_surfaces_transport_errors() {
        let nsx = InMemoryNsx::new();
        let harness = Harness::new(nsx.clone());
        let entry = {
            let provider = Provider::new(nsx.clone());
            let address = ResourceAddress::new("nsxt_lb_udp_monitor", TEST_RESOURCE_NAME);
            let raw = serde_json::json!({"display_name": TEST_DISPLAY_NAME});
            provider
                .create(&address, raw.as_object().unwrap())
                .await
                .unwrap()
        };

        let case = import_basic(Protocol::Udp);
        assert!(harness.check_destroy(&case, &[entry.clone()]).await.is_err());

        nsx.set_offline(true);
        let err = harness.check_destroy(&case, &[entry]).await.unwrap_err();
        assert!(format!("{:#}", err).contains("network error"));
    }
}
