//! Watches over services.
//!
//! `inform_service_ready` returns immediately and leaves a detached task
//! polling the service. The task reports back exactly once over the inform
//! channel; the session loop prints it before the next prompt.
//!
//! `watch_services` holds the turn instead: it echoes change events until the
//! user interrupts, then hands back a short closing line.

use super::capability::{CapabilityDescriptor, CapabilityError, CapabilityHandler, NoInput, TextInput};
use super::environment_scope;
use crate::context::ContextStore;
use crate::platform::PlatformClient;
use crate::text;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const WATCH_TIMEOUT: Duration = Duration::from_secs(180);

/// Asynchronous notification for the user, produced outside of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inform(pub String);

pub struct InformServiceReady {
    client: PlatformClient,
    sender: UnboundedSender<Inform>,
    poll_interval: Duration,
    timeout: Duration,
}

impl InformServiceReady {
    pub fn new(client: PlatformClient, sender: UnboundedSender<Inform>) -> Self {
        Self {
            client,
            sender,
            poll_interval: POLL_INTERVAL,
            timeout: WATCH_TIMEOUT,
        }
    }

    pub fn with_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.timeout = timeout;
        self
    }
}

fn is_ready(service: &Value) -> bool {
    service
        .pointer("/status/summaryStatus")
        .and_then(Value::as_str)
        == Some("Ready")
}

async fn watch_until_ready(
    client: PlatformClient,
    sender: UnboundedSender<Inform>,
    project_id: String,
    environment_id: String,
    service: String,
    poll_interval: Duration,
    timeout: Duration,
) {
    let started = Instant::now();
    loop {
        tokio::time::sleep(poll_interval).await;
        if started.elapsed() > timeout {
            info!("Gave up watching service {}", service);
            let _ = sender.send(Inform(text::service_watch_timeout(
                &service,
                timeout.as_secs(),
            )));
            return;
        }
        match client.get_service(&project_id, &environment_id, &service).await {
            Ok(value) if is_ready(&value) => {
                info!("Service {} is ready", service);
                // The session may already be gone; nothing left to do then.
                let _ = sender.send(Inform(text::service_ready(&service)));
                return;
            }
            Ok(_) => debug!("Service {} not ready yet", service),
            Err(e) => debug!("Polling service {} failed: {}", service, e),
        }
    }
}

#[async_trait]
impl CapabilityHandler for InformServiceReady {
    type Input = TextInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "inform_service_ready",
            "Inform the user when a service becomes ready. Input should be the name or id of a service.",
        )
        .with_direct_output()
    }

    async fn call(&self, input: TextInput, context: &ContextStore) -> Result<String, CapabilityError> {
        if input.is_empty() {
            return Err(CapabilityError::Failed("service name is empty".to_string()));
        }
        let (project_id, environment_id) = environment_scope(&context.get())?;
        tokio::spawn(watch_until_ready(
            self.client.clone(),
            self.sender.clone(),
            project_id,
            environment_id,
            input.0,
            self.poll_interval,
            self.timeout,
        ));
        Ok(text::INFORM_READY_START.to_string())
    }
}

/// Where streamed watch events are written.
pub type EventSink = Arc<dyn Fn(&str) + Send + Sync>;

pub fn stdout_sink() -> EventSink {
    Arc::new(|line: &str| println!("{}", line))
}

/// What ends a streaming watch.
#[derive(Clone)]
pub enum StopSignal {
    CtrlC,
    Notify(Arc<Notify>),
}

impl StopSignal {
    pub async fn wait(&self) {
        match self {
            StopSignal::CtrlC => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    // Without a handler only the stream's end stops the watch.
                    warn!("Cannot listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
            StopSignal::Notify(notify) => notify.notified().await,
        }
    }
}

pub struct WatchServices {
    client: PlatformClient,
    output: EventSink,
    stop: StopSignal,
}

impl WatchServices {
    pub fn new(client: PlatformClient) -> Self {
        Self {
            client,
            output: stdout_sink(),
            stop: StopSignal::CtrlC,
        }
    }

    pub fn with_output(mut self, output: EventSink) -> Self {
        self.output = output;
        self
    }

    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }
}

#[async_trait]
impl CapabilityHandler for WatchServices {
    type Input = NoInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "watch_services",
            "Watch service changes in current environment.",
        )
        .with_direct_output()
    }

    async fn call(
        &self,
        _input: NoInput,
        context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let (project_id, environment_id) = environment_scope(&context.get())?;
        (self.output)(text::WATCH_NOTE);

        let output = self.output.clone();
        let stream = self
            .client
            .watch_services(&project_id, &environment_id, move |line| output(line));
        tokio::select! {
            result = stream => {
                result?;
                debug!("Service watch stream closed by the platform");
            }
            _ = self.stop.wait() => info!("Service watch halted"),
        }
        Ok(text::WATCH_ENDING.to_string())
    }
}
