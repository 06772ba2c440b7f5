//! Console-side capabilities that do not touch the platform.

use super::capability::{
    CapabilityDescriptor, CapabilityError, CapabilityHandler, NoInput, TextInput,
};
use crate::context::ContextStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::Command;
use tracing::info;

/// Flip the shared show-reasoning flag.
pub struct SetReasoningOutput {
    flag: Arc<AtomicBool>,
    show: bool,
}

impl SetReasoningOutput {
    pub fn show(flag: Arc<AtomicBool>) -> Self {
        Self { flag, show: true }
    }

    pub fn hide(flag: Arc<AtomicBool>) -> Self {
        Self { flag, show: false }
    }
}

#[async_trait]
impl CapabilityHandler for SetReasoningOutput {
    type Input = NoInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        if self.show {
            CapabilityDescriptor::new("show_reasoning_output", "Show the assistant's reasoning output.")
        } else {
            CapabilityDescriptor::new("hide_reasoning_output", "Hide the assistant's reasoning output.")
        }
    }

    async fn call(&self, _input: NoInput, _context: &ContextStore) -> Result<String, CapabilityError> {
        self.flag.store(self.show, Ordering::SeqCst);
        info!("Reasoning output {}", if self.show { "shown" } else { "hidden" });
        Ok("succeed.".to_string())
    }
}

/// Opens a URL with the platform's default handler.
pub struct OpenUrlInBrowser;

fn opener_command(url: &str) -> Command {
    if cfg!(target_os = "macos") {
        let mut cmd = Command::new("open");
        cmd.arg(url);
        cmd
    } else if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", "", url]);
        cmd
    } else {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(url);
        cmd
    }
}

#[async_trait]
impl CapabilityHandler for OpenUrlInBrowser {
    type Input = TextInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new("open_url_in_browser", "Open a URL in browser. Input is a URL.")
    }

    async fn call(&self, input: TextInput, _context: &ContextStore) -> Result<String, CapabilityError> {
        let url = input.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CapabilityError::InvalidInput {
                capability: "open_url_in_browser".to_string(),
                message: format!("not an http(s) URL: {}", url),
            });
        }
        // The opener detaches on its own; the child handle is dropped.
        opener_command(url)
            .spawn()
            .map_err(|e| CapabilityError::Failed(format!("cannot open browser: {}", e)))?;
        Ok("The URL is opened in browser.".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::capability::{Capability, Registered};

    #[tokio::test]
    async fn toggles_share_one_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let show = Registered::new(SetReasoningOutput::show(flag.clone()));
        let hide = Registered::new(SetReasoningOutput::hide(flag.clone()));
        let ctx = ContextStore::default();

        assert_eq!(show.descriptor().name, "show_reasoning_output");
        show.invoke("", &ctx).await.unwrap();
        assert!(flag.load(Ordering::SeqCst));
        hide.invoke("ignored", &ctx).await.unwrap();
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let err = Registered::new(OpenUrlInBrowser)
            .invoke("file:///etc/passwd", &ContextStore::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidInput { .. }));
    }
}
